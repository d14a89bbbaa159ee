use std::{
    fs::{self, OpenOptions},
    io::{BufRead, BufReader, ErrorKind, Write},
    path::{Path, PathBuf},
    sync::Arc,
};

use chrono::{DateTime, Days, NaiveDate, TimeZone, Utc};
use chrono_tz::Tz;
use tokio::sync::Mutex;
use tracing::{info, warn};

use coop_common::{
    HistoryRow, HistoryStore, PersistenceError, PersistenceStore, RuntimeConfig, SettingsSnapshot,
    SettingsStore,
};

/// Files under the controller data directory.
#[derive(Clone)]
pub struct AppStore {
    data_dir: Arc<PathBuf>,
    runtime_path: Arc<PathBuf>,
    lock: Arc<Mutex<()>>,
}

impl AppStore {
    pub fn new() -> Self {
        let data_dir = std::env::var("COOP_DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("./.coop"));
        Self::at(data_dir)
    }

    pub fn at(data_dir: impl Into<PathBuf>) -> Self {
        let data_dir = data_dir.into();
        Self {
            runtime_path: Arc::new(data_dir.join("runtime.json")),
            data_dir: Arc::new(data_dir),
            lock: Arc::new(Mutex::new(())),
        }
    }

    pub async fn load_runtime_config(&self) -> anyhow::Result<RuntimeConfig> {
        let _guard = self.lock.lock().await;
        match tokio::fs::read(self.runtime_path.as_ref()).await {
            Ok(raw) => Ok(serde_json::from_slice::<RuntimeConfig>(&raw)?),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(RuntimeConfig::default()),
            Err(err) => Err(err.into()),
        }
    }

    pub async fn save_runtime_config(&self, runtime: &RuntimeConfig) -> anyhow::Result<()> {
        let _guard = self.lock.lock().await;
        let path = self.runtime_path.as_ref().clone();
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let payload = serde_json::to_vec_pretty(runtime)?;
        tokio::fs::write(path, payload).await?;
        Ok(())
    }

    /// Loads and sanitizes the runtime config. The sanitized config is
    /// written back only when the file was readable or absent; a file that
    /// fails to parse is left untouched for the user to fix.
    pub async fn load_or_default_runtime(&self) -> RuntimeConfig {
        let (mut runtime, writable) = match self.load_runtime_config().await {
            Ok(runtime) => (runtime, true),
            Err(err) => {
                warn!("failed to load runtime config from store: {err:#}");
                (RuntimeConfig::default(), false)
            }
        };
        runtime.sanitize();

        if writable {
            if let Err(err) = self.save_runtime_config(&runtime).await {
                warn!("failed to write runtime config: {err:#}");
            }
        }
        runtime
    }

    /// Opens the device settings store. Unreadable settings are moved aside
    /// and the store starts from `current`.
    pub fn open_settings(
        &self,
        current: SettingsSnapshot,
    ) -> (SettingsStore<JsonSettingsStore>, Option<SettingsSnapshot>) {
        match SettingsStore::open(self.settings_store(), current.clone()) {
            Ok(opened) => opened,
            Err(err) => {
                warn!("failed to load device settings, starting from defaults: {err}");
                let persistence = self.settings_store();
                match persistence.set_aside() {
                    Ok(Some(moved)) => info!(path = %moved.display(), "unreadable settings moved aside"),
                    Ok(None) => {}
                    Err(err) => warn!("failed to move unreadable settings aside: {err}"),
                }
                (SettingsStore::seeded(persistence, current), None)
            }
        }
    }

    pub fn settings_store(&self) -> JsonSettingsStore {
        JsonSettingsStore::new(self.data_dir.join("settings.json"))
    }

    pub fn history(&self, timezone: Tz) -> JsonlHistory {
        JsonlHistory::new(self.data_dir.join("history"), timezone)
    }
}

/// Device settings as one pretty-printed JSON document.
#[derive(Debug)]
pub struct JsonSettingsStore {
    path: PathBuf,
}

impl JsonSettingsStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Renames the settings file to `settings.json.corrupt-<utc time>`.
    /// Returns `None` when there is no file.
    pub fn set_aside(&self) -> std::io::Result<Option<PathBuf>> {
        let stamp = Utc::now().format("%Y%m%d%H%M%S");
        let target = self.path.with_extension(format!("json.corrupt-{stamp}"));
        match fs::rename(&self.path, &target) {
            Ok(()) => Ok(Some(target)),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err),
        }
    }
}

impl PersistenceStore for JsonSettingsStore {
    fn load_snapshot(&self) -> Result<Option<SettingsSnapshot>, PersistenceError> {
        match fs::read(&self.path) {
            Ok(raw) => Ok(Some(serde_json::from_slice(&raw)?)),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    fn save_snapshot(&mut self, snapshot: &SettingsSnapshot) -> Result<(), PersistenceError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        // Write then rename so a crash never leaves a truncated file behind.
        let staging = self.path.with_extension("json.tmp");
        fs::write(&staging, serde_json::to_vec_pretty(snapshot)?)?;
        fs::rename(&staging, &self.path)?;
        Ok(())
    }
}

/// History rows as JSON lines, one file per local day.
#[derive(Debug)]
pub struct JsonlHistory {
    dir: PathBuf,
    timezone: Tz,
}

impl JsonlHistory {
    pub fn new(dir: impl Into<PathBuf>, timezone: Tz) -> Self {
        Self {
            dir: dir.into(),
            timezone,
        }
    }

    fn local_date(&self, timestamp: i64) -> Option<NaiveDate> {
        let utc: DateTime<Utc> = DateTime::from_timestamp(timestamp, 0)?;
        Some(self.timezone.from_utc_datetime(&utc.naive_utc()).date_naive())
    }

    pub fn file_for(&self, date: NaiveDate) -> PathBuf {
        self.dir
            .join(format!("coop_{}.jsonl", date.format("%Y%m%d")))
    }

    fn read_file(&self, path: &Path, rows: &mut Vec<HistoryRow>) -> Result<(), PersistenceError> {
        let file = match fs::File::open(path) {
            Ok(file) => file,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(()),
            Err(err) => return Err(err.into()),
        };

        for (index, line) in BufReader::new(file).lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<HistoryRow>(&line) {
                Ok(row) => rows.push(row),
                Err(err) => warn!(
                    path = %path.display(),
                    line = index + 1,
                    "skipping unreadable history row: {err}"
                ),
            }
        }
        Ok(())
    }
}

impl HistoryStore for JsonlHistory {
    fn append(&mut self, row: &HistoryRow) -> Result<(), PersistenceError> {
        let Some(date) = self.local_date(row.timestamp) else {
            return Err(std::io::Error::new(
                ErrorKind::InvalidInput,
                format!("timestamp {} out of range", row.timestamp),
            )
            .into());
        };

        fs::create_dir_all(&self.dir)?;
        let mut line = serde_json::to_vec(row)?;
        line.push(b'\n');
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.file_for(date))?;
        file.write_all(&line)?;
        Ok(())
    }

    fn query(&self, from: i64, to: i64) -> Result<Vec<HistoryRow>, PersistenceError> {
        if from >= to {
            return Ok(Vec::new());
        }
        let (Some(first), Some(last)) = (self.local_date(from), self.local_date(to - 1)) else {
            return Ok(Vec::new());
        };

        let mut rows = Vec::new();
        let mut date = first;
        while date <= last {
            self.read_file(&self.file_for(date), &mut rows)?;
            let Some(next) = date.checked_add_days(Days::new(1)) else {
                break;
            };
            date = next;
        }

        rows.retain(|row| (from..to).contains(&row.timestamp));
        rows.sort_by_key(|row| row.timestamp);
        Ok(rows)
    }
}
