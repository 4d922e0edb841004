//! Reading `composer.json` out of zipballs.

use indexmap::IndexMap;
use repertoire_core::{Error, Result, json};
use sonic_rs::Value;
use std::io::{Cursor, Read, Write};
use tracing::debug;
use zip::ZipArchive;
use zip::write::SimpleFileOptions;

const COMPOSER_JSON: &str = "composer.json";

/// Extract the `composer.json` object of a zipball.
///
/// The manifest is looked up at the archive root first, then one directory
/// deep, which is where GitHub-style zipballs put it.
///
/// # Errors
/// Returns [`Error::Archive`] if the payload is not a zip, has no manifest or
/// the manifest is not a JSON object.
pub fn extract_composer_json(payload: &[u8]) -> Result<IndexMap<String, Value>> {
    let mut zip = ZipArchive::new(Cursor::new(payload)).map_err(|e| Error::Archive(e.to_string()))?;

    let mut best: Option<(usize, usize)> = None;
    for i in 0..zip.len() {
        let entry = zip.by_index(i).map_err(|e| Error::Archive(e.to_string()))?;
        if entry.is_dir() {
            continue;
        }
        let name = entry.name();
        let depth = name.matches('/').count();
        let is_manifest = name == COMPOSER_JSON
            || (depth == 1 && name.ends_with(&format!("/{COMPOSER_JSON}")));
        if is_manifest && best.is_none_or(|(_, d)| depth < d) {
            best = Some((i, depth));
        }
    }

    let (index, _) = best.ok_or_else(|| Error::Archive("composer.json not found".to_string()))?;
    let mut entry = zip
        .by_index(index)
        .map_err(|e| Error::Archive(e.to_string()))?;
    let mut data = Vec::with_capacity(entry.size() as usize);
    entry
        .read_to_end(&mut data)
        .map_err(|e| Error::Archive(e.to_string()))?;

    debug!(entry = entry.name(), size = data.len(), "read composer.json");
    json::from_json_slice(&data)
        .map_err(|e| Error::Archive(format!("invalid composer.json: {e}")))
}

/// Build an in-memory zip archive from `(name, contents)` entries.
///
/// # Errors
/// Returns [`Error::Archive`] if writing fails.
pub fn create_zip(entries: &[(&str, &[u8])]) -> Result<Vec<u8>> {
    let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default();

    for (name, contents) in entries {
        writer
            .start_file(*name, options)
            .map_err(|e| Error::Archive(e.to_string()))?;
        writer
            .write_all(contents)
            .map_err(|e| Error::Archive(e.to_string()))?;
    }

    let cursor = writer
        .finish()
        .map_err(|e| Error::Archive(e.to_string()))?;
    Ok(cursor.into_inner())
}
