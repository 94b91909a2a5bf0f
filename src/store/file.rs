/// JSON file store: `{data_dir}/{site_id}/{table}.json`.
///
/// Writes go to a sibling temp file that is then renamed over the target, so
/// a crash mid-write leaves the previous document intact. `store_all` writes
/// every temp file before renaming any of them, in the order given.

use serde::{Deserialize, Serialize};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::error::IcingError;
use crate::model::Series;

use super::{rows_to_series, series_to_rows, SeriesStore, SeriesTable, StoredRow};

#[derive(Debug, Serialize, Deserialize)]
struct SeriesDocument {
    site_id: String,
    table: String,
    rows: Vec<StoredRow>,
}

#[derive(Debug, Clone)]
pub struct FileStore {
    root: PathBuf,
}

impl FileStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn path_for(&self, site_id: &str, table: SeriesTable) -> PathBuf {
        self.root.join(site_id).join(format!("{}.json", table.name()))
    }

    fn document(site_id: &str, table: SeriesTable, series: &Series) -> Result<Vec<u8>, IcingError> {
        let doc = SeriesDocument {
            site_id: site_id.to_string(),
            table: table.name().to_string(),
            rows: series_to_rows(series),
        };
        serde_json::to_vec_pretty(&doc).map_err(IcingError::persistence)
    }
}

fn temp_path(path: &Path) -> PathBuf {
    path.with_extension("json.tmp")
}

fn discard(temps: &[(PathBuf, PathBuf)]) {
    for (tmp, _) in temps {
        let _ = fs::remove_file(tmp);
    }
}

/// Writes `contents` to `path` via a temp file and rename.
pub(crate) fn write_atomic(path: &Path, contents: &[u8]) -> Result<(), IcingError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .map_err(|e| IcingError::persistence(format!("{}: {}", parent.display(), e)))?;
    }
    let tmp = temp_path(path);
    fs::write(&tmp, contents).map_err(|e| IcingError::persistence(format!("{}: {}", tmp.display(), e)))?;
    fs::rename(&tmp, path).map_err(|e| IcingError::persistence(format!("{}: {}", path.display(), e)))
}

impl SeriesStore for FileStore {
    fn load(&self, site_id: &str, table: SeriesTable) -> Result<Option<Series>, IcingError> {
        let path = self.path_for(site_id, table);
        let text = match fs::read_to_string(&path) {
            Ok(t) => t,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(IcingError::persistence(format!("{}: {}", path.display(), e))),
        };
        let doc: SeriesDocument = serde_json::from_str(&text)
            .map_err(|e| IcingError::persistence(format!("{}: {}", path.display(), e)))?;
        Ok(Some(rows_to_series(doc.rows)?))
    }

    fn store_all(&self, site_id: &str, tables: &[(SeriesTable, &Series)]) -> Result<(), IcingError> {
        let dir = self.root.join(site_id);
        fs::create_dir_all(&dir).map_err(|e| IcingError::persistence(format!("{}: {}", dir.display(), e)))?;

        // Stage every document first; nothing is replaced until all are on disk
        let mut staged: Vec<(PathBuf, PathBuf)> = Vec::with_capacity(tables.len());
        for (table, series) in tables {
            let path = self.path_for(site_id, *table);
            let tmp = temp_path(&path);
            let written = Self::document(site_id, *table, series).and_then(|json| {
                fs::write(&tmp, json).map_err(|e| IcingError::persistence(format!("{}: {}", tmp.display(), e)))
            });
            if let Err(e) = written {
                discard(&staged);
                return Err(e);
            }
            staged.push((tmp, path));
        }

        for (i, (tmp, path)) in staged.iter().enumerate() {
            if let Err(e) = fs::rename(tmp, path) {
                discard(&staged[i..]);
                return Err(IcingError::persistence(format!("{}: {}", path.display(), e)));
            }
        }

        for (table, series) in tables {
            debug!(site = site_id, %table, rows = series.len(), "series stored");
        }
        Ok(())
    }
}
