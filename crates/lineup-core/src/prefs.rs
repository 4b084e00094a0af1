use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, anyhow};
use chrono::NaiveDate;
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

use crate::datetime;
use crate::event::EventId;

/// Persistent key-value store for the day-filter and favorites maps.
///
/// Reads are best-effort: a missing, empty, or corrupt file is "no prior
/// preference", never an error. Writes are synchronous and atomic, so a
/// crash between a toggle and the next redraw loses the redraw, not the
/// preference.
#[derive(Debug)]
pub struct PrefStore {
    pub data_dir: PathBuf,
    days_path: PathBuf,
    favorites_path: PathBuf,
}

impl PrefStore {
    #[tracing::instrument(skip(data_dir))]
    pub fn open(data_dir: &Path) -> anyhow::Result<Self> {
        let data_dir = data_dir.to_path_buf();
        fs::create_dir_all(&data_dir)
            .with_context(|| format!("failed to create {}", data_dir.display()))?;

        let days_path = data_dir.join("days.json");
        let favorites_path = data_dir.join("favorites.json");

        if !days_path.exists() {
            fs::write(&days_path, "{}")?;
        }
        if !favorites_path.exists() {
            fs::write(&favorites_path, "{}")?;
        }

        info!(
            data_dir = %data_dir.display(),
            days = %days_path.display(),
            favorites = %favorites_path.display(),
            "opened preference store"
        );

        Ok(Self {
            data_dir,
            days_path,
            favorites_path,
        })
    }

    #[tracing::instrument(skip(self))]
    pub fn load_day_filters(&self) -> BTreeMap<NaiveDate, bool> {
        let raw = load_flag_map(&self.days_path);
        let mut out = BTreeMap::new();
        for (key, active) in raw {
            match datetime::parse_day(&key) {
                Some(date) => {
                    out.insert(date, active);
                }
                None => {
                    warn!(key = %key, "skipping unparsable day key in stored preferences");
                }
            }
        }
        out
    }

    #[tracing::instrument(skip(self, days))]
    pub fn save_day_filters(&self, days: &BTreeMap<NaiveDate, bool>) -> anyhow::Result<()> {
        let keyed: BTreeMap<String, bool> = days
            .iter()
            .map(|(&date, &active)| (datetime::format_day(date), active))
            .collect();
        save_flag_map_atomic(&self.days_path, &keyed).context("failed to save days.json")
    }

    #[tracing::instrument(skip(self))]
    pub fn load_favorites(&self) -> BTreeMap<EventId, bool> {
        load_flag_map(&self.favorites_path)
            .into_iter()
            .map(|(key, marked)| (EventId::new(key), marked))
            .collect()
    }

    #[tracing::instrument(skip(self, favorites))]
    pub fn save_favorites(&self, favorites: &BTreeMap<EventId, bool>) -> anyhow::Result<()> {
        let keyed: BTreeMap<String, bool> = favorites
            .iter()
            .map(|(id, &marked)| (id.as_str().to_string(), marked))
            .collect();
        save_flag_map_atomic(&self.favorites_path, &keyed).context("failed to save favorites.json")
    }
}

fn load_flag_map(path: &Path) -> BTreeMap<String, bool> {
    let raw = match fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(err) => {
            warn!(file = %path.display(), error = %err, "unreadable preference file; using empty map");
            return BTreeMap::new();
        }
    };

    if raw.trim().is_empty() {
        return BTreeMap::new();
    }

    match serde_json::from_str(&raw) {
        Ok(map) => map,
        Err(err) => {
            warn!(file = %path.display(), error = %err, "corrupt preference file; using empty map");
            BTreeMap::new()
        }
    }
}

fn save_flag_map_atomic(path: &Path, map: &BTreeMap<String, bool>) -> anyhow::Result<()> {
    debug!(file = %path.display(), count = map.len(), "saving preferences atomically");

    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let mut temp = NamedTempFile::new_in(dir)?;
    let serialized = serde_json::to_string(map)?;
    temp.write_all(serialized.as_bytes())?;
    temp.flush()?;

    temp.persist(path)
        .map_err(|err| anyhow!("failed to persist {}: {}", path.display(), err))?;

    Ok(())
}
