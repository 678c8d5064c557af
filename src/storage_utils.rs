use serde::{Serialize, de::DeserializeOwned};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::info;

// STORAGE MANAGER
// Only configuration lives here; scan results are never written to disk.

pub struct AsyncStorageManager {
    // Absolute path to the storage directory (e.g., ".../target/debug/storage")
    pub base_dir: PathBuf,
}

impl AsyncStorageManager {
    /// **Constructor: new_relative**
    /// Resolves `relative_path` against the directory holding the running
    /// executable and creates it if needed.
    pub async fn new_relative<P: AsRef<Path>>(relative_path: P) -> anyhow::Result<Self> {
        let exe_path = std::env::current_exe()?;
        let base_dir = exe_path
            .parent()
            .ok_or_else(|| anyhow::anyhow!("Could not find binary directory"))?
            .join(relative_path);
        Self::new_in(base_dir).await
    }

    /// Uses `base_dir` as-is, creating it up front so later saves never have
    /// to check for it.
    pub async fn new_in<P: Into<PathBuf>>(base_dir: P) -> anyhow::Result<Self> {
        let base_dir = base_dir.into();
        if !base_dir.exists() {
            fs::create_dir_all(&base_dir).await?;
        }
        Ok(Self { base_dir })
    }

    pub fn path_for(&self, file_name: &str) -> PathBuf {
        self.base_dir.join(file_name)
    }

    /// **Generic Save Function**
    /// Writes `<filename>.json` through a `.tmp` file and a rename so a crash
    /// mid-write leaves the previous file intact.
    pub async fn save<T: Serialize>(&self, filename: &str, data: &T) -> anyhow::Result<()> {
        let file_name = format!("{}.json", filename);
        let final_path = self.base_dir.join(&file_name);
        let tmp_path = self.base_dir.join(format!("{}.tmp", file_name));

        let json_bytes = serde_json::to_vec_pretty(data)?;
        fs::write(&tmp_path, json_bytes).await?;
        fs::rename(tmp_path, final_path).await?;

        Ok(())
    }

    /// **Generic Load Function**
    /// Reads raw bytes; serde_json validates UTF-8 while parsing anyway.
    pub async fn load<T: DeserializeOwned>(&self, filename: &str) -> anyhow::Result<T> {
        let path = self.base_dir.join(format!("{}.json", filename));
        let content = fs::read(path).await?;
        let data = serde_json::from_slice(&content)?;
        Ok(data)
    }

    /// Loads `<filename>.json`, writing `T::default()` there first when the
    /// file does not exist yet. A file that exists but fails to parse is an error.
    pub async fn load_or_init<T>(&self, filename: &str) -> anyhow::Result<T>
    where
        T: DeserializeOwned + Serialize + Default,
    {
        let path = self.base_dir.join(format!("{}.json", filename));
        if fs::try_exists(&path).await? {
            return self.load(filename).await;
        }
        let data = T::default();
        self.save(filename, &data).await?;
        info!(path = %path.display(), "wrote default {}", filename);
        Ok(data)
    }
}
