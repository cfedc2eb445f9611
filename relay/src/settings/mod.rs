//! Settings extraction
//!
//! Flattens the JSON files of a theme into `(file, section, block, setting,
//! value)` rows. Three file shapes are understood:
//!
//! ```text
//! config/settings_data.json   current.* payloads, sections, root scalars
//! locales/*.json              arbitrarily nested translation keys
//! everything else             sections -> settings / blocks -> settings
//! ```
//!
//! Records come out in document order (keys keep their source order), depth
//! first, so the same input always yields the same sequence.

mod locale;
mod settings_data;
mod template;

use crate::metrics_defs::{EXTRACTION_FAILURES, RECORDS_EXTRACTED};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use shared::counter;
use storefront::types::ThemeFile;

pub const SETTINGS_DATA_PATH: &str = "config/settings_data.json";

/// One flattened setting.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SettingRecord {
    #[serde(rename = "fileName")]
    pub file: String,
    #[serde(rename = "sectionName")]
    pub section: String,
    /// Empty for section level settings.
    #[serde(rename = "blockName", default)]
    pub block: String,
    #[serde(rename = "settingName")]
    pub setting: String,
    #[serde(rename = "settingValue")]
    pub value: Value,
}

#[derive(thiserror::Error, Debug)]
pub enum ParseError {
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// Traversal strategy, derived from the file path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    SettingsData,
    Locale,
    Template,
}

impl FileKind {
    pub fn from_path(path: &str) -> Self {
        if path == SETTINGS_DATA_PATH {
            FileKind::SettingsData
        } else if path.starts_with("locales/") && path.ends_with(".json") {
            FileKind::Locale
        } else {
            FileKind::Template
        }
    }
}

/// Collects records for a single file.
struct Emitter<'a> {
    file: &'a str,
    records: Vec<SettingRecord>,
}

impl<'a> Emitter<'a> {
    fn new(file: &'a str) -> Self {
        Emitter {
            file,
            records: Vec::new(),
        }
    }

    fn emit(&mut self, section: &str, block: &str, setting: &str, value: &Value) {
        if section.is_empty() && setting.is_empty() {
            tracing::debug!(file = self.file, "Skipping setting without section or name");
            return;
        }

        self.records.push(SettingRecord {
            file: self.file.to_string(),
            section: section.to_string(),
            block: block.to_string(),
            setting: setting.to_string(),
            value: value.clone(),
        });
    }
}

/// Strips a leading block comment and anything after the last closing brace,
/// then parses what is left.
pub fn parse_document(content: &str) -> Result<Value, ParseError> {
    let mut json = content;

    if json.starts_with("/*")
        && let Some(end) = json.find("*/")
    {
        json = json[end + 2..].trim();
    }

    if let Some(last_brace) = json.rfind('}') {
        json = &json[..=last_brace];
    }

    Ok(serde_json::from_str(json)?)
}

/// Extracts every setting of one theme file.
///
/// Malformed content is logged and yields no records; it never fails the
/// caller.
pub fn extract(content: &str, file_path: &str) -> Vec<SettingRecord> {
    let document = match parse_document(content) {
        Ok(document) => document,
        Err(e) => {
            tracing::warn!(file = file_path, error = %e, "Failed to parse theme file");
            counter!(EXTRACTION_FAILURES).increment(1);
            return Vec::new();
        }
    };

    let Some(root) = document.as_object() else {
        tracing::debug!(file = file_path, "Theme file is not a JSON object");
        return Vec::new();
    };

    let kind = FileKind::from_path(file_path);
    let mut out = Emitter::new(file_path);
    match kind {
        FileKind::SettingsData => settings_data::extract(&mut out, root),
        FileKind::Locale => locale::extract(&mut out, root),
        FileKind::Template => template::extract(&mut out, root),
    }

    tracing::debug!(
        file = file_path,
        kind = ?kind,
        records = out.records.len(),
        "Extracted settings"
    );
    out.records
}

/// Extracts a batch of fetched files in order. Files without text content
/// are skipped.
pub fn extract_files(files: &[ThemeFile]) -> Vec<SettingRecord> {
    let mut records = Vec::new();

    for file in files {
        match &file.content {
            Some(content) => records.extend(extract(content, &file.filename)),
            None => tracing::warn!(file = %file.filename, "No content found for file"),
        }
    }

    counter!(RECORDS_EXTRACTED).increment(records.len() as u64);
    records
}
