use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::{fs, path::PathBuf, sync::RwLock};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineSettings {
    /// Seconds of idle pause before the resume reminder fires.
    pub reminder_delay_secs: u64,
    /// Whether the scheduler should keep re-firing the reminder until it
    /// is cancelled.
    pub reminder_repeats: bool,
    /// Snapshot publication interval while running.
    pub tick_interval_ms: u64,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            reminder_delay_secs: 300,
            reminder_repeats: false,
            tick_interval_ms: 1000,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct UserSettings {
    engine: EngineSettings,
}

pub struct SettingsStore {
    path: PathBuf,
    data: RwLock<UserSettings>,
}

impl SettingsStore {
    pub fn new(path: PathBuf) -> Result<Self> {
        let data = if path.exists() {
            let contents = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read settings from {}", path.display()))?;
            serde_json::from_str(&contents).unwrap_or_default()
        } else {
            UserSettings::default()
        };

        Ok(Self {
            path,
            data: RwLock::new(data),
        })
    }

    pub fn engine(&self) -> EngineSettings {
        self.data.read().unwrap().engine.clone()
    }

    pub fn update_engine(&self, settings: EngineSettings) -> Result<()> {
        let mut guard = self.data.write().unwrap();
        guard.engine = settings;
        self.persist(&guard)?;
        Ok(())
    }

    fn persist(&self, data: &UserSettings) -> Result<()> {
        let serialized = serde_json::to_string_pretty(data)?;
        fs::write(&self.path, serialized)
            .with_context(|| format!("Failed to write settings to {}", self.path.display()))
    }

    pub fn reload(&self) -> Result<()> {
        let contents = fs::read_to_string(&self.path)?;
        let data: UserSettings = serde_json::from_str(&contents)?;
        let mut guard = self.data.write().unwrap();
        *guard = data;
        Ok(())
    }
}
