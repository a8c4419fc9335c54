//! Durable convoy records.
//!
//! One JSON file per convoy under the town root:
//!
//! ```text
//! <town>/.gastown/convoys/
//!   hq-cv-a1b2c.json
//!   hq-cv-x9y8z.json
//! ```

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::convoy::Convoy;
use crate::error::{Error, Result};

pub const LEDGER_DIR: &str = ".gastown/convoys";

pub trait ConvoyLedger {
    fn load(&self, id: &str) -> Result<Convoy>;
    fn save(&self, convoy: &Convoy) -> Result<()>;
    /// Every convoy, oldest first.
    fn list(&self) -> Result<Vec<Convoy>>;
}

#[derive(Debug, Clone)]
pub struct FileLedger {
    root: PathBuf,
}

impl FileLedger {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn for_town(town_root: &Path) -> Self {
        Self::new(town_root.join(LEDGER_DIR))
    }

    fn path_for(&self, id: &str) -> Result<PathBuf> {
        if id.is_empty() || id.contains(['/', '\\']) || id.starts_with('.') {
            return Err(Error::Validation(format!("invalid convoy id {id:?}")));
        }
        Ok(self.root.join(format!("{id}.json")))
    }
}

impl ConvoyLedger for FileLedger {
    fn load(&self, id: &str) -> Result<Convoy> {
        let path = self.path_for(id)?;
        let json = match fs::read_to_string(&path) {
            Ok(json) => json,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(Error::not_found("convoy", id));
            }
            Err(e) => return Err(Error::io(&path, e)),
        };
        Ok(serde_json::from_str(&json)?)
    }

    fn save(&self, convoy: &Convoy) -> Result<()> {
        let path = self.path_for(&convoy.id)?;
        write_json_atomic(&path, convoy)
    }

    fn list(&self) -> Result<Vec<Convoy>> {
        let mut convoys = Vec::new();
        let entries = match fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(convoys),
            Err(e) => return Err(Error::io(&self.root, e)),
        };
        for entry in entries {
            let path = entry.map_err(|e| Error::io(&self.root, e))?.path();
            if path.extension().is_some_and(|ext| ext == "json") {
                let json = fs::read_to_string(&path).map_err(|e| Error::io(&path, e))?;
                convoys.push(serde_json::from_str::<Convoy>(&json)?);
            }
        }
        convoys.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(convoys)
    }
}

/// Write pretty JSON to `path` via a sibling temp file and rename, so a
/// reader sees either the old record or the new one.
pub(crate) fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let dir = path
        .parent()
        .ok_or_else(|| Error::Other(format!("{} has no parent directory", path.display())))?;
    fs::create_dir_all(dir).map_err(|e| Error::io(dir, e))?;
    let json = serde_json::to_string_pretty(value)?;
    let mut tmp = tempfile::NamedTempFile::new_in(dir).map_err(|e| Error::io(dir, e))?;
    tmp.write_all(json.as_bytes())
        .and_then(|()| tmp.as_file().sync_all())
        .map_err(|e| Error::io(tmp.path(), e))?;
    tmp.persist(path).map_err(|e| Error::io(path, e.error))?;
    Ok(())
}
