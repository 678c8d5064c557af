use comfy_table::{
    Attribute, Cell, CellAlignment, Color, ContentArrangement, Table, modifiers::UTF8_ROUND_CORNERS,
    presets::UTF8_BORDERS_ONLY,
};
use rsi_screener::signals::{ScanResult, Signal, SignalRecord, Thresholds};
use rsi_screener::time_utils::DisplayZone;

/// How far past its threshold a reading is, mapped to [0.4, 1.0].
pub fn get_visibility_ratio(record: &SignalRecord, thresholds: &Thresholds) -> f64 {
    let Some(rsi) = record.rsi else {
        return 0.4;
    };
    let depth = match record.signal {
        Signal::Buy if thresholds.oversold > 0.0 => {
            (thresholds.oversold - rsi) / thresholds.oversold
        }
        Signal::Sell if thresholds.overbought < 100.0 => {
            (rsi - thresholds.overbought) / (100.0 - thresholds.overbought)
        }
        Signal::Buy | Signal::Sell => 1.0,
        Signal::Neutral => 0.0,
    };
    (0.4 + 0.6 * depth).clamp(0.4, 1.0)
}

pub fn headline(result: &ScanResult, zone: &DisplayZone) -> String {
    format!(
        "{} RSI signals found as of {} ({} of {} pairs fresh)",
        result.len(),
        zone.format(result.generated_at),
        result.accepted,
        result.universe
    )
}

pub fn build_table(result: &ScanResult, zone: &DisplayZone, thresholds: &Thresholds) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_BORDERS_ONLY)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec![
            Cell::new("Rank").add_attribute(Attribute::Bold),
            Cell::new("Pair").add_attribute(Attribute::Bold),
            Cell::new("Candle Time").add_attribute(Attribute::Bold),
            Cell::new("RSI")
                .add_attribute(Attribute::Bold)
                .set_alignment(CellAlignment::Right),
            Cell::new("Signal").add_attribute(Attribute::Bold),
        ]);

    for (i, record) in result.signals.iter().enumerate() {
        let ratio = get_visibility_ratio(record, thresholds);
        let level = (255.0 * ratio) as u8;
        let gray_val = (150.0 * ratio) as u8;

        let signal_color = match record.signal {
            Signal::Buy => Color::Rgb { r: 0, g: level, b: 0 },
            Signal::Sell => Color::Rgb { r: level, g: 0, b: 0 },
            Signal::Neutral => Color::DarkGrey,
        };

        let rsi_text = record
            .rsi
            .map(|v| format!("{:.2}", v))
            .unwrap_or_else(|| "N/A".to_string());

        table.add_row(vec![
            Cell::new(i + 1).fg(Color::DarkGrey),
            Cell::new(&record.symbol).fg(Color::Rgb {
                r: 0,
                g: level,
                b: level,
            }),
            Cell::new(record.display_time(zone)).fg(Color::Rgb {
                r: gray_val,
                g: gray_val,
                b: gray_val,
            }),
            Cell::new(rsi_text)
                .fg(signal_color)
                .set_alignment(CellAlignment::Right),
            Cell::new(record.signal.as_str())
                .fg(signal_color)
                .add_attribute(Attribute::Bold),
        ]);
    }

    table
}

pub fn run(result: &ScanResult, zone: &DisplayZone, thresholds: &Thresholds) {
    if result.is_empty() {
        println!(
            "No valid RSI signals for the latest candle ({} of {} pairs fresh, as of {}).",
            result.accepted,
            result.universe,
            zone.format(result.generated_at)
        );
        return;
    }

    println!("\n{}\n{}", headline(result, zone), build_table(result, zone, thresholds));
}
