//! The optional root-level ordering file.
//!
//! ```yaml
//! deployment.default.web:
//!   - configmap.default.web-config
//!   - release.default.db
//! release.default.db: ~
//! ```

use std::collections::BTreeMap;
use std::path::Path;

use kgs_core::keys::DEPENDS_FILE;

use crate::error::{io_err, SyncError};

/// Identity to the identities it waits for.
pub type Declared = BTreeMap<String, Vec<String>>;

/// Read `<root>/depends.yaml`; a missing or empty file declares nothing.
pub fn read_depends(root: &Path) -> Result<Declared, SyncError> {
    let path = root.join(DEPENDS_FILE);
    let text = match std::fs::read_to_string(&path) {
        Ok(text) => text,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Declared::new()),
        Err(e) => return Err(io_err(&path, e)),
    };
    parse_depends(&path, &text)
}

pub fn parse_depends(path: &Path, text: &str) -> Result<Declared, SyncError> {
    if text.trim().is_empty() {
        return Ok(Declared::new());
    }
    let raw: Option<BTreeMap<String, Option<Vec<String>>>> =
        serde_yaml::from_str(text).map_err(|source| SyncError::Depends {
            path: path.to_path_buf(),
            source,
        })?;
    Ok(raw
        .unwrap_or_default()
        .into_iter()
        .map(|(id, prereqs)| (id, prereqs.unwrap_or_default()))
        .collect())
}
