/// File-backed alert cooldowns.
///
/// One JSON object for all sites: `{ "MN": "2024-01-05 08:00:00", ... }`.
/// Workers for different sites share the file, so read-modify-write happens
/// under a lock.

use chrono::NaiveDateTime;
use std::collections::BTreeMap;
use std::fs;
use std::io::ErrorKind;
use std::path::PathBuf;
use std::sync::Mutex;

use crate::error::IcingError;
use crate::model::{AlertCooldownRecord, TIMESTAMP_FORMAT};

use super::file::write_atomic;
use super::CooldownStore;

pub struct FileCooldownStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl FileCooldownStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into(), lock: Mutex::new(()) }
    }

    fn read_map(&self) -> Result<BTreeMap<String, String>, IcingError> {
        match fs::read_to_string(&self.path) {
            Ok(text) if text.trim().is_empty() => Ok(BTreeMap::new()),
            Ok(text) => serde_json::from_str(&text)
                .map_err(|e| IcingError::persistence(format!("{}: {}", self.path.display(), e))),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(BTreeMap::new()),
            Err(e) => Err(IcingError::persistence(format!("{}: {}", self.path.display(), e))),
        }
    }
}

impl CooldownStore for FileCooldownStore {
    fn load_cooldown(&self, site_id: &str) -> Result<Option<AlertCooldownRecord>, IcingError> {
        let _guard = self.lock.lock().map_err(|_| IcingError::persistence("cooldown lock poisoned"))?;
        let Some(text) = self.read_map()?.remove(site_id) else {
            return Ok(None);
        };
        let last_alert = NaiveDateTime::parse_from_str(&text, TIMESTAMP_FORMAT)
            .map_err(|_| IcingError::UnparsableTimestamp(text.clone()))?;
        Ok(Some(AlertCooldownRecord { site_id: site_id.to_string(), last_alert }))
    }

    fn save_cooldown(&self, record: &AlertCooldownRecord) -> Result<(), IcingError> {
        let _guard = self.lock.lock().map_err(|_| IcingError::persistence("cooldown lock poisoned"))?;
        let mut map = self.read_map()?;
        map.insert(record.site_id.clone(), record.last_alert.format(TIMESTAMP_FORMAT).to_string());
        let json = serde_json::to_vec_pretty(&map).map_err(IcingError::persistence)?;
        write_atomic(&self.path, &json)
    }
}
