use anyhow::Result;
use crossterm::{
    event::{self, DisableMouseCapture, EnableMouseCapture, Event, KeyCode, KeyEvent, KeyEventKind},
    execute,
    terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
};
use ratatui::{
    prelude::*,
    text::Line,
    widgets::{Block, Borders, Cell, Clear, Paragraph, Row, Table},
};
use rsi_screener::signals::{ScanResult, Signal, SignalRecord, Thresholds};
use rsi_screener::time_utils::{DisplayZone, Interval};
use rsi_screener::{ListingError, Scanner};
use std::io;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::info;

// --- App State ---

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SignalFilter {
    All,
    BuyOnly,
    SellOnly,
}

impl SignalFilter {
    const ALL: [SignalFilter; 3] = [
        SignalFilter::All,
        SignalFilter::BuyOnly,
        SignalFilter::SellOnly,
    ];

    fn label(&self) -> &'static str {
        match self {
            SignalFilter::All => "All signals",
            SignalFilter::BuyOnly => "BUY (oversold)",
            SignalFilter::SellOnly => "SELL (overbought)",
        }
    }

    fn matches(&self, signal: Signal) -> bool {
        match self {
            SignalFilter::All => true,
            SignalFilter::BuyOnly => signal == Signal::Buy,
            SignalFilter::SellOnly => signal == Signal::Sell,
        }
    }
}

enum Status {
    Idle,
    Ready(ScanResult),
    Failed(String),
}

struct App {
    status: Status,
    is_refreshing: bool,
    selected_filter_index: usize,
    zone: DisplayZone,
    quote_asset: String,
    interval: Interval,
}

impl App {
    fn new(zone: DisplayZone, quote_asset: String, interval: Interval) -> Self {
        Self {
            status: Status::Idle,
            is_refreshing: false,
            selected_filter_index: 0,
            zone,
            quote_asset,
            interval,
        }
    }

    fn filter(&self) -> SignalFilter {
        SignalFilter::ALL[self.selected_filter_index % SignalFilter::ALL.len()]
    }

    fn visible_signals(&self) -> Vec<&SignalRecord> {
        match &self.status {
            Status::Ready(result) => result
                .signals
                .iter()
                .filter(|r| self.filter().matches(r.signal))
                .collect(),
            _ => Vec::new(),
        }
    }

    fn set_result(&mut self, result: Result<ScanResult, ListingError>) {
        self.status = match result {
            Ok(result) => Status::Ready(result),
            Err(e) => Status::Failed(e.to_string()),
        };
        self.is_refreshing = false;
    }

    fn status_line(&self) -> String {
        match &self.status {
            Status::Idle => "Press F5 or s to generate RSI signals".to_string(),
            Status::Ready(result) if result.is_empty() => format!(
                "No valid RSI signals for the latest candle (as of {})",
                self.zone.format(result.generated_at)
            ),
            Status::Ready(result) => format!(
                "{} RSI signals as of {} ({} of {} pairs fresh)",
                result.len(),
                self.zone.format(result.generated_at),
                result.accepted,
                result.universe
            ),
            Status::Failed(reason) => format!("Scan failed: {}", reason),
        }
    }
}

// --- TUI ---

pub async fn run_tui(
    scanner: Arc<Scanner>,
    zone: DisplayZone,
    thresholds: Thresholds,
    quote_asset: String,
) -> Result<()> {
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let res = run_app(&mut terminal, scanner, zone, thresholds, quote_asset).await;

    disable_raw_mode()?;
    execute!(
        terminal.backend_mut(),
        LeaveAlternateScreen,
        DisableMouseCapture
    )?;
    terminal.show_cursor()?;
    res
}

async fn run_app<B: Backend>(
    terminal: &mut Terminal<B>,
    scanner: Arc<Scanner>,
    zone: DisplayZone,
    thresholds: Thresholds,
    quote_asset: String,
) -> Result<()> {
    let (data_tx, mut data_rx) = mpsc::channel::<Result<ScanResult, ListingError>>(1);
    let mut app = App::new(zone, quote_asset, scanner.settings().interval);

    loop {
        terminal.draw(|f| ui(f, &app, &thresholds))?;

        if let Ok(result) = data_rx.try_recv() {
            app.set_result(result);
        }

        if event::poll(Duration::from_millis(50))? {
            if let Event::Key(key) = event::read()? {
                if key.kind == KeyEventKind::Press
                    && !handle_key_event(key, &mut app, &scanner, &data_tx)
                {
                    info!("quit requested");
                    return Ok(());
                }
            }
            // Resize events need nothing: the next draw picks up the new size.
        }
    }
}

fn handle_key_event(
    key: KeyEvent,
    app: &mut App,
    scanner: &Arc<Scanner>,
    tx: &mpsc::Sender<Result<ScanResult, ListingError>>,
) -> bool {
    match key.code {
        KeyCode::Char('q') | KeyCode::Esc => return false,
        KeyCode::F(5) | KeyCode::Char('s') if !app.is_refreshing => {
            app.is_refreshing = true;
            let tx_clone = tx.clone();
            let scanner = scanner.clone();
            tokio::spawn(async move {
                let result = scanner.run_scan().await;
                let _ = tx_clone.send(result).await;
            });
        }
        KeyCode::Up => {
            app.selected_filter_index = app
                .selected_filter_index
                .checked_sub(1)
                .unwrap_or(SignalFilter::ALL.len() - 1);
        }
        KeyCode::Down => {
            app.selected_filter_index = (app.selected_filter_index + 1) % SignalFilter::ALL.len();
        }
        KeyCode::Char(c) => {
            if let Some(digit) = c.to_digit(10) {
                if digit > 0 && digit as usize <= SignalFilter::ALL.len() {
                    app.selected_filter_index = digit as usize - 1;
                }
            }
        }
        _ => {}
    }
    true
}

fn ui(f: &mut Frame, app: &App, thresholds: &Thresholds) {
    let main_layout = Layout::horizontal([Constraint::Percentage(20), Constraint::Percentage(80)])
        .split(f.size());
    let right_chunks =
        Layout::vertical([Constraint::Length(3), Constraint::Min(0)]).split(main_layout[1]);

    // Sidebar: filters + key help
    let sidebar_block = Block::default()
        .borders(Borders::ALL)
        .title("Filter")
        .title_alignment(Alignment::Center);
    let inner_sidebar_area = sidebar_block.inner(main_layout[0]);
    f.render_widget(sidebar_block, main_layout[0]);

    let sidebar_chunks =
        Layout::vertical([Constraint::Min(1), Constraint::Length(2)]).split(inner_sidebar_area);

    let filter_lines: Vec<Line> = SignalFilter::ALL
        .iter()
        .enumerate()
        .map(|(i, filter)| {
            let line = Line::from(format!("{}. {}", i + 1, filter.label()));
            if i == app.selected_filter_index {
                line.style(Style::default().fg(Color::Yellow).bg(Color::DarkGray))
            } else {
                line
            }
        })
        .collect();
    f.render_widget(Paragraph::new(filter_lines), sidebar_chunks[0]);
    f.render_widget(
        Paragraph::new("F5/s scan, q quit").alignment(Alignment::Center),
        sidebar_chunks[1],
    );

    f.render_widget(
        Paragraph::new(app.status_line()).block(
            Block::default()
                .borders(Borders::ALL)
                .title(format!("CoinDCX RSI Screener ({})", app.interval))
                .title_alignment(Alignment::Center),
        ),
        right_chunks[0],
    );

    let header = Row::new([
        Cell::from("Rank"),
        Cell::from("Pair"),
        Cell::from("Candle Time"),
        Cell::from("RSI"),
        Cell::from("Signal"),
    ])
    .style(Style::default().bg(Color::DarkGray));

    let rows = app.visible_signals().into_iter().enumerate().map(|(i, record)| {
        let ratio = crate::comfy_table::get_visibility_ratio(record, thresholds);
        let level = (255.0 * ratio) as u8;
        let gray_val = (150.0 * ratio) as u8;
        let signal_color = match record.signal {
            Signal::Buy => Color::Rgb(0, level, 0),
            Signal::Sell => Color::Rgb(level, 0, 0),
            Signal::Neutral => Color::DarkGray,
        };

        Row::new([
            Cell::from(format!("{}", i + 1)).style(Style::default().fg(Color::DarkGray)),
            Cell::from(record.symbol.clone())
                .style(Style::default().fg(Color::Rgb(0, level, level))),
            Cell::from(record.display_time(&app.zone))
                .style(Style::default().fg(Color::Rgb(gray_val, gray_val, gray_val))),
            Cell::from(
                record
                    .rsi
                    .map(|v| format!("{:.2}", v))
                    .unwrap_or_else(|| "N/A".to_string()),
            )
            .style(Style::default().fg(signal_color)),
            Cell::from(record.signal.as_str()).style(Style::default().fg(signal_color)),
        ])
        .height(1)
    });

    f.render_widget(
        Table::new(
            rows,
            [
                Constraint::Length(6),
                Constraint::Percentage(25),
                Constraint::Percentage(35),
                Constraint::Percentage(15),
                Constraint::Percentage(15),
            ],
        )
        .header(header)
        .block(Block::default().borders(Borders::ALL).title(app.filter().label())),
        right_chunks[1],
    );

    if app.is_refreshing {
        let area = centered_rect(60, 20, main_layout[1]);
        f.render_widget(Clear, area);
        f.render_widget(
            Paragraph::new(format!(
                "Fetching RSI data for all {} pairs...\nPlease wait.",
                app.quote_asset
            ))
                .block(Block::default().title("Scanning").borders(Borders::ALL))
                .alignment(Alignment::Center),
            area,
        );
    }
}

fn centered_rect(percent_x: u16, percent_y: u16, r: Rect) -> Rect {
    let popup_layout = Layout::vertical([
        Constraint::Percentage((100 - percent_y) / 2),
        Constraint::Percentage(percent_y),
        Constraint::Percentage((100 - percent_y) / 2),
    ])
    .split(r);
    Layout::horizontal([
        Constraint::Percentage((100 - percent_x) / 2),
        Constraint::Percentage(percent_x),
        Constraint::Percentage((100 - percent_x) / 2),
    ])
    .split(popup_layout[1])[1]
}
