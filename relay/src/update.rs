//! Writes a single setting back to a theme file.
//!
//! The reverse of extraction for template shaped files: the row's section and
//! optional block locate the `settings` object the value is written to. The
//! file is re-read right before the write so concurrent edits to other
//! settings are kept.

use crate::config::{BranchConfig, Credentials};
use crate::metrics_defs::THEME_UPDATES;
use crate::settings::{FileKind, ParseError, SettingRecord, parse_document};
use crate::sync::ThemeSource;
use serde::Serialize;
use serde_json::{Map, Value};
use shared::counter;
use std::sync::Arc;
use storefront::client::StorefrontError;
use storefront::resolver::{ResolveError, ThemeResolver};
use storefront::types::ThemeCandidate;

#[derive(thiserror::Error, Debug, PartialEq)]
pub enum ApplyError {
    #[error("{0} is not a template file, settings can only be written to sections")]
    UnsupportedFile(String),
    #[error("section {0} not found")]
    SectionNotFound(String),
    #[error("block {block} not found in section {section}")]
    BlockNotFound { section: String, block: String },
    #[error("settings of {0} are not an object")]
    MalformedSettings(String),
}

#[derive(thiserror::Error, Debug)]
pub enum UpdateError {
    #[error("no access token for store {0}")]
    UnknownStore(String),
    #[error(transparent)]
    Storefront(#[from] StorefrontError),
    #[error(transparent)]
    Resolve(#[from] ResolveError),
    #[error("file {0} not found or has no content")]
    MissingFile(String),
    #[error("could not parse {file}: {source}")]
    Parse { file: String, source: ParseError },
    #[error(transparent)]
    Apply(#[from] ApplyError),
    #[error("could not serialize the updated file: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Sets `record.setting` to `record.value` inside `document`.
///
/// Returns the value that was replaced, if any. A missing `settings` object
/// is created; a missing section or block is an error.
pub fn apply_setting(
    document: &mut Value,
    record: &SettingRecord,
) -> Result<Option<Value>, ApplyError> {
    if FileKind::from_path(&record.file) != FileKind::Template {
        return Err(ApplyError::UnsupportedFile(record.file.clone()));
    }

    let section = document
        .get_mut("sections")
        .and_then(|sections| sections.get_mut(&record.section))
        .and_then(Value::as_object_mut)
        .ok_or_else(|| ApplyError::SectionNotFound(record.section.clone()))?;

    let owner = if record.block.is_empty() {
        section
    } else {
        section
            .get_mut("blocks")
            .and_then(|blocks| blocks.get_mut(&record.block))
            .and_then(Value::as_object_mut)
            .ok_or_else(|| ApplyError::BlockNotFound {
                section: record.section.clone(),
                block: record.block.clone(),
            })?
    };

    let settings = owner
        .entry("settings")
        .or_insert_with(|| Value::Object(Map::new()))
        .as_object_mut()
        .ok_or_else(|| ApplyError::MalformedSettings(record.section.clone()))?;

    Ok(settings.insert(record.setting.clone(), record.value.clone()))
}

/// Outcome of one write-back.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateReport {
    pub store_name: String,
    pub theme: ThemeCandidate,
    pub file: String,
    pub previous: Option<Value>,
    pub value: Value,
    /// False when the theme already held the value; nothing is written then.
    pub changed: bool,
    pub written: Vec<String>,
}

pub struct Updater {
    source: Arc<dyn ThemeSource>,
    credentials: Arc<Credentials>,
    resolver: ThemeResolver,
}

impl Updater {
    pub fn new(source: Arc<dyn ThemeSource>, credentials: Arc<Credentials>) -> Self {
        Updater {
            source,
            credentials,
            resolver: ThemeResolver::default(),
        }
    }

    /// Writes `record` to the theme `target` resolves to.
    pub async fn update(
        &self,
        target: &BranchConfig,
        record: &SettingRecord,
    ) -> Result<UpdateReport, UpdateError> {
        let result = self.run(target, record).await;

        let outcome = match &result {
            Ok(report) if report.changed => "written",
            Ok(_) => "unchanged",
            Err(_) => "error",
        };
        counter!(THEME_UPDATES, "outcome" => outcome).increment(1);

        result
    }

    async fn run(
        &self,
        target: &BranchConfig,
        record: &SettingRecord,
    ) -> Result<UpdateReport, UpdateError> {
        let store = self
            .credentials
            .store_access(&target.shopify_domain)
            .ok_or_else(|| UpdateError::UnknownStore(target.shopify_domain.clone()))?;

        let candidates = self.source.list_themes(&store).await?;
        let theme = self
            .resolver
            .resolve(&candidates, &target.theme_name)?
            .clone();

        let content = self
            .source
            .fetch_files(&store, &theme.id, std::slice::from_ref(&record.file))
            .await?
            .into_iter()
            .find(|file| file.filename == record.file)
            .and_then(|file| file.content)
            .ok_or_else(|| UpdateError::MissingFile(record.file.clone()))?;

        let mut document = parse_document(&content).map_err(|source| UpdateError::Parse {
            file: record.file.clone(),
            source,
        })?;
        let previous = apply_setting(&mut document, record)?;
        let changed = previous.as_ref() != Some(&record.value);

        let written = if changed {
            let updated = serde_json::to_string_pretty(&document)?;
            self.source
                .upsert_file(&store, &theme.id, &record.file, &updated)
                .await?
        } else {
            Vec::new()
        };

        tracing::info!(
            store = %store.domain,
            theme = %theme,
            file = %record.file,
            section = %record.section,
            block = %record.block,
            setting = %record.setting,
            changed,
            "Updated theme setting"
        );

        Ok(UpdateReport {
            store_name: target.store_name.clone(),
            theme,
            file: record.file.clone(),
            previous,
            value: record.value.clone(),
            changed,
            written,
        })
    }
}
