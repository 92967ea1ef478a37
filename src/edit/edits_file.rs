//! Edit lists stored on disk.
//!
//! Either a bare list of edits or a document with an `edits` key, as JSON
//! (`.json`) or YAML (anything else).

use std::fs;
use std::path::Path;

use log::debug;
use serde::Deserialize;

use super::error::{EditError, Result};
use super::types::TextEdit;

#[derive(Deserialize)]
#[serde(untagged)]
enum EditList {
    Bare(Vec<TextEdit>),
    Wrapped { edits: Vec<TextEdit> },
}

impl From<EditList> for Vec<TextEdit> {
    fn from(list: EditList) -> Self {
        match list {
            EditList::Bare(edits) | EditList::Wrapped { edits } => edits,
        }
    }
}

pub fn load_edits(path: &Path) -> Result<Vec<TextEdit>> {
    let failed = |detail: String| EditError::EditList {
        path: path.to_path_buf(),
        detail,
    };

    let content = fs::read_to_string(path).map_err(|e| failed(e.to_string()))?;
    let is_json = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));

    let list: EditList = if is_json {
        serde_json::from_str(&content).map_err(|e| failed(e.to_string()))?
    } else {
        serde_yaml::from_str(&content).map_err(|e| failed(e.to_string()))?
    };

    let edits: Vec<TextEdit> = list.into();
    debug!("Loaded {} edits from {path:?}", edits.len());
    Ok(edits)
}
