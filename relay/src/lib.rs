//! Webhook relay: receives pushes to a theme repository, resolves the theme
//! each branch targets, extracts the settings of the changed files and
//! delivers them to the sheet.

pub mod config;
pub mod errors;
pub mod metrics_defs;
pub mod push;
pub mod router;
pub mod settings;
pub mod signature;
pub mod sink;
pub mod sync;
pub mod update;

use crate::config::{Config, Credentials};
use crate::errors::RelayError;
use crate::router::{Router, with_cors};
use crate::sink::{RecordSink, SheetSink};
use crate::sync::Syncer;
use crate::update::Updater;
use http_body_util::{BodyExt, LengthLimitError, Limited, combinators::BoxBody};
use hyper::body::{Bytes, Incoming};
use hyper::service::Service;
use hyper::{Request, Response, StatusCode};
use shared::admin_service::AdminService;
use shared::http::{make_boxed_error_response, run_http_service};
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use storefront::client::StorefrontClient;

/// Builds the sync pipeline described by `config`.
pub fn build_syncer(config: &Config, credentials: Arc<Credentials>) -> Result<Syncer, RelayError> {
    let source = StorefrontClient::new(
        &config.storefront.api_version,
        Duration::from_secs(config.storefront.timeout_secs),
    )?;

    let sink: Option<Arc<dyn RecordSink>> = match &config.sheet {
        Some(sheet) => Some(Arc::new(SheetSink::new(sheet)?)),
        None => None,
    };

    Ok(Syncer::new(
        Arc::new(source),
        sink,
        credentials,
        config.fetch_delay(),
    ))
}

/// Builds the theme write-back path, unless `config` switches it off.
pub fn build_updater(config: &Config, credentials: Arc<Credentials>) -> Result<Updater, RelayError> {
    if !config.theme_updates_enabled {
        return Err(RelayError::UpdatesDisabled);
    }

    let source = StorefrontClient::new(
        &config.storefront.api_version,
        Duration::from_secs(config.storefront.timeout_secs),
    )?;
    Ok(Updater::new(Arc::new(source), credentials))
}

pub async fn run(config: Config, credentials: Credentials) -> Result<(), RelayError> {
    config.validate()?;

    if credentials.github_secret.is_none() {
        tracing::warn!("No webhook secret configured, every webhook will be rejected");
    }
    if config.sheet.is_none() {
        tracing::warn!("No sheet configured, records will not be delivered");
    }
    if !config.sync_enabled {
        tracing::warn!("Webhook sync is disabled, pushes will only be acknowledged");
    }

    let credentials = Arc::new(credentials);
    let syncer = build_syncer(&config, credentials.clone())?;
    let router = Router::new(config.branches.clone(), credentials, syncer)
        .with_sync_enabled(config.sync_enabled);

    let relay_service = RelayService {
        router: Arc::new(router),
        max_body_bytes: config.max_body_bytes,
    };
    let relay_task = run_http_service(&config.listener.host, config.listener.port, relay_service);

    let admin_service = AdminService::<_, RelayError>::new(|| true);
    let admin_task = run_http_service(
        &config.admin_listener.host,
        config.admin_listener.port,
        admin_service,
    );

    tracing::info!(
        branches = config.branches.len(),
        stores = config.stores.len(),
        "Starting relay"
    );
    tokio::try_join!(relay_task, admin_task)?;
    Ok(())
}

struct RelayService {
    router: Arc<Router>,
    max_body_bytes: usize,
}

impl Service<Request<Incoming>> for RelayService {
    type Response = Response<BoxBody<Bytes, Self::Error>>;
    type Error = RelayError;
    type Future =
        Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send + 'static>>;

    fn call(&self, req: Request<Incoming>) -> Self::Future {
        let router = self.router.clone();
        let max_body_bytes = self.max_body_bytes;

        Box::pin(async move {
            tracing::debug!(method = %req.method(), path = %req.uri().path(), "Received request");

            // Signature checks need the raw body, so it is buffered up front
            let (parts, body) = req.into_parts();
            let body = match Limited::new(body, max_body_bytes).collect().await {
                Ok(collected) => collected.to_bytes(),
                Err(e) if e.is::<LengthLimitError>() => {
                    tracing::warn!(limit = max_body_bytes, "Request body too large");
                    return Ok(with_cors(make_boxed_error_response(
                        StatusCode::PAYLOAD_TOO_LARGE,
                    )));
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Failed to read request body");
                    return Ok(with_cors(make_boxed_error_response(StatusCode::BAD_REQUEST)));
                }
            };

            Ok(router.route(Request::from_parts(parts, body)).await)
        })
    }
}
