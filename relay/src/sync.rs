use crate::config::{BranchConfig, Credentials};
use crate::metrics_defs::SYNC_DURATION;
use crate::settings::extract_files;
use crate::sink::{DeliveryReport, RecordSink};
use async_trait::async_trait;
use serde::Serialize;
use shared::histogram;
use std::sync::Arc;
use std::time::{Duration, Instant};
use storefront::client::{StorefrontClient, StorefrontError};
use storefront::resolver::{ResolveError, ThemeResolver};
use storefront::types::{StoreAccess, ThemeCandidate, ThemeFile};

#[derive(thiserror::Error, Debug)]
pub enum SyncError {
    #[error("no access token for store {0}")]
    UnknownStore(String),
    #[error(transparent)]
    Storefront(#[from] StorefrontError),
    #[error(transparent)]
    Resolve(#[from] ResolveError),
}

/// Where theme listings and file contents come from.
#[async_trait]
pub trait ThemeSource: Send + Sync {
    async fn list_themes(&self, store: &StoreAccess)
    -> Result<Vec<ThemeCandidate>, StorefrontError>;

    async fn fetch_files(
        &self,
        store: &StoreAccess,
        theme_id: &str,
        filenames: &[String],
    ) -> Result<Vec<ThemeFile>, StorefrontError>;

    async fn upsert_file(
        &self,
        store: &StoreAccess,
        theme_id: &str,
        filename: &str,
        content: &str,
    ) -> Result<Vec<String>, StorefrontError>;
}

#[async_trait]
impl ThemeSource for StorefrontClient {
    async fn list_themes(
        &self,
        store: &StoreAccess,
    ) -> Result<Vec<ThemeCandidate>, StorefrontError> {
        StorefrontClient::list_themes(self, store).await
    }

    async fn fetch_files(
        &self,
        store: &StoreAccess,
        theme_id: &str,
        filenames: &[String],
    ) -> Result<Vec<ThemeFile>, StorefrontError> {
        StorefrontClient::fetch_files(self, store, theme_id, filenames).await
    }

    async fn upsert_file(
        &self,
        store: &StoreAccess,
        theme_id: &str,
        filename: &str,
        content: &str,
    ) -> Result<Vec<String>, StorefrontError> {
        StorefrontClient::upsert_file(self, store, theme_id, filename, content).await
    }
}

/// Summary of one sync, returned to the webhook caller.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncReport {
    pub branch: String,
    pub store_name: String,
    pub theme: ThemeCandidate,
    pub theme_files: Vec<String>,
    pub record_count: usize,
    /// `None` when no sheet is configured.
    pub delivery: Option<DeliveryReport>,
}

pub struct Syncer {
    source: Arc<dyn ThemeSource>,
    sink: Option<Arc<dyn RecordSink>>,
    credentials: Arc<Credentials>,
    resolver: ThemeResolver,
    fetch_delay: Duration,
}

impl Syncer {
    pub fn new(
        source: Arc<dyn ThemeSource>,
        sink: Option<Arc<dyn RecordSink>>,
        credentials: Arc<Credentials>,
        fetch_delay: Duration,
    ) -> Self {
        Syncer {
            source,
            sink,
            credentials,
            resolver: ThemeResolver::default(),
            fetch_delay,
        }
    }

    pub fn has_sink(&self) -> bool {
        self.sink.is_some()
    }

    /// Syncs `files` of `branch` to the sheet.
    ///
    /// `files` must already be filtered down to theme paths.
    pub async fn sync(
        &self,
        branch: &str,
        target: &BranchConfig,
        files: &[String],
    ) -> Result<SyncReport, SyncError> {
        let start = Instant::now();
        let result = self.run(branch, target, files).await;

        let outcome = if result.is_ok() { "ok" } else { "error" };
        histogram!(SYNC_DURATION, "outcome" => outcome).record(start.elapsed().as_secs_f64());

        result
    }

    async fn run(
        &self,
        branch: &str,
        target: &BranchConfig,
        files: &[String],
    ) -> Result<SyncReport, SyncError> {
        let store = self
            .credentials
            .store_access(&target.shopify_domain)
            .ok_or_else(|| SyncError::UnknownStore(target.shopify_domain.clone()))?;

        let candidates = self.source.list_themes(&store).await?;
        let theme = self
            .resolver
            .resolve(&candidates, &target.theme_name)?
            .clone();

        tracing::info!(
            branch,
            store = %store.domain,
            theme = %theme,
            theme_id = %theme.id,
            files = files.len(),
            "Resolved theme, waiting before fetching files"
        );
        if !self.fetch_delay.is_zero() {
            tokio::time::sleep(self.fetch_delay).await;
        }

        let contents = self.source.fetch_files(&store, &theme.id, files).await?;
        let records = extract_files(&contents);

        let delivery = match &self.sink {
            Some(sink) => Some(sink.deliver(&target.store_name, &theme, &records).await),
            None => {
                tracing::info!(
                    branch,
                    records = records.len(),
                    "No sheet configured, records not delivered"
                );
                None
            }
        };

        Ok(SyncReport {
            branch: branch.to_string(),
            store_name: target.store_name.clone(),
            theme,
            theme_files: files.to_vec(),
            record_count: records.len(),
            delivery,
        })
    }
}
