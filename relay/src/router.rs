use crate::config::{BranchConfig, Credentials};
use crate::errors::RelayError;
use crate::metrics_defs::WEBHOOK_REQUESTS;
use crate::push::{self, EVENT_HEADER, PushEvent};
use crate::signature::{self, SIGNATURE_HEADER};
use crate::sync::{SyncError, Syncer};
use http_body_util::combinators::BoxBody;
use http::header::{
    ACCESS_CONTROL_ALLOW_HEADERS, ACCESS_CONTROL_ALLOW_METHODS, ACCESS_CONTROL_ALLOW_ORIGIN,
    ALLOW, HeaderValue,
};
use http::{Method, Request, Response, StatusCode};
use hyper::body::Bytes;
use indexmap::IndexMap;
use serde::Serialize;
use serde_json::json;
use shared::counter;
use shared::http::{full_body, make_json_response};
use std::sync::Arc;
use storefront::resolver::ResolveError;

const ALLOWED_METHODS: &str = "GET, POST, OPTIONS";
const ALLOWED_HEADERS: &str = "Content-Type, X-Hub-Signature-256, X-GitHub-Event";

type RelayResponse = Response<BoxBody<Bytes, RelayError>>;

/// Endpoints of the main listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Endpoint {
    Health,
    Config,
    Webhook,
}

impl Endpoint {
    fn from_path(path: &str) -> Option<Self> {
        match path {
            "/" | "/health" => Some(Endpoint::Health),
            "/config" => Some(Endpoint::Config),
            "/webhook" => Some(Endpoint::Webhook),
            _ => None,
        }
    }

    fn method(&self) -> Method {
        match self {
            Endpoint::Health | Endpoint::Config => Method::GET,
            Endpoint::Webhook => Method::POST,
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct BranchSummary<'a> {
    branch: &'a str,
    store_name: &'a str,
    shopify_domain: &'a str,
    theme_name: &'a str,
}

/// Adds the CORS origin header every response of the main listener carries.
pub fn with_cors<B>(mut response: Response<B>) -> Response<B> {
    response
        .headers_mut()
        .insert(ACCESS_CONTROL_ALLOW_ORIGIN, HeaderValue::from_static("*"));
    response
}

/// Routes requests of the main listener and runs the push flow.
pub struct Router {
    branches: IndexMap<String, BranchConfig>,
    credentials: Arc<Credentials>,
    syncer: Arc<Syncer>,
    sync_enabled: bool,
}

impl Router {
    pub fn new(
        branches: IndexMap<String, BranchConfig>,
        credentials: Arc<Credentials>,
        syncer: Syncer,
    ) -> Self {
        Router {
            branches,
            credentials,
            syncer: Arc::new(syncer),
            sync_enabled: true,
        }
    }

    /// Turns webhook syncing on or off. Disabled pushes are still verified
    /// and then acknowledged without syncing.
    pub fn with_sync_enabled(mut self, enabled: bool) -> Self {
        self.sync_enabled = enabled;
        self
    }

    pub async fn route(&self, req: Request<Bytes>) -> RelayResponse {
        with_cors(self.dispatch(req).await)
    }

    async fn dispatch(&self, req: Request<Bytes>) -> RelayResponse {
        if req.method() == Method::OPTIONS {
            let mut response = Response::new(full_body(Bytes::new()));
            let headers = response.headers_mut();
            headers.insert(
                ACCESS_CONTROL_ALLOW_METHODS,
                HeaderValue::from_static(ALLOWED_METHODS),
            );
            headers.insert(
                ACCESS_CONTROL_ALLOW_HEADERS,
                HeaderValue::from_static(ALLOWED_HEADERS),
            );
            return response;
        }

        let Some(endpoint) = Endpoint::from_path(req.uri().path()) else {
            tracing::debug!(method = %req.method(), path = %req.uri().path(), "No route matched");
            return make_json_response(StatusCode::NOT_FOUND, &json!({"error": "Not found"}));
        };

        if req.method() != endpoint.method() {
            let mut response = make_json_response(
                StatusCode::METHOD_NOT_ALLOWED,
                &json!({"error": "Method not allowed", "method": req.method().as_str()}),
            );
            if let Ok(allow) = HeaderValue::from_str(endpoint.method().as_str()) {
                response.headers_mut().insert(ALLOW, allow);
            }
            return response;
        }

        match endpoint {
            Endpoint::Health => {
                make_json_response(StatusCode::OK, &json!({"status": "healthy"}))
            }
            Endpoint::Config => self.handle_config(),
            Endpoint::Webhook => self.handle_webhook(req).await,
        }
    }

    fn handle_config(&self) -> RelayResponse {
        let branches: Vec<BranchSummary> = self
            .branches
            .iter()
            .map(|(branch, target)| BranchSummary {
                branch,
                store_name: &target.store_name,
                shopify_domain: &target.shopify_domain,
                theme_name: &target.theme_name,
            })
            .collect();

        make_json_response(
            StatusCode::OK,
            &json!({
                "branches": branches,
                "hasGitHubSecret": self.credentials.github_secret.is_some(),
                "sheetConfigured": self.syncer.has_sink(),
                "syncEnabled": self.sync_enabled,
            }),
        )
    }

    async fn handle_webhook(&self, req: Request<Bytes>) -> RelayResponse {
        let (outcome, response) = self.process_push(req).await;
        counter!(WEBHOOK_REQUESTS, "outcome" => outcome).increment(1);
        response
    }

    async fn process_push(&self, req: Request<Bytes>) -> (&'static str, RelayResponse) {
        let headers = req.headers();
        let event = headers.get(EVENT_HEADER).and_then(|v| v.to_str().ok());

        if event != Some("push") {
            tracing::info!(event, "Ignoring non-push event");
            return (
                "ignored",
                make_json_response(
                    StatusCode::OK,
                    &json!({"status": "ignored", "reason": "Not a push event", "event": event}),
                ),
            );
        }

        let signature = headers.get(SIGNATURE_HEADER).and_then(|v| v.to_str().ok());
        if let Err(e) = signature::verify(
            self.credentials.github_secret.as_deref(),
            signature,
            req.body(),
        ) {
            tracing::warn!(error = %e, "Rejecting webhook");
            return (
                "unauthorized",
                make_json_response(
                    StatusCode::UNAUTHORIZED,
                    &json!({"error": "Unauthorized - Invalid signature"}),
                ),
            );
        }

        if !self.sync_enabled {
            tracing::info!("Webhook sync is disabled, ignoring push");
            return (
                "disabled",
                make_json_response(
                    StatusCode::OK,
                    &json!({"status": "disabled", "message": "Webhook sync is currently disabled"}),
                ),
            );
        }

        let push: PushEvent = match serde_json::from_slice(req.body()) {
            Ok(push) => push,
            Err(e) => {
                tracing::warn!(error = %e, "Invalid push payload");
                return (
                    "bad_request",
                    make_json_response(
                        StatusCode::BAD_REQUEST,
                        &json!({"error": "Invalid request body"}),
                    ),
                );
            }
        };

        let branch = push.branch();
        let Some((branch, target)) = branch.and_then(|b| self.branches.get_key_value(b)) else {
            tracing::info!(branch, "Branch not configured for sync");
            return (
                "ignored",
                make_json_response(
                    StatusCode::OK,
                    &json!({
                        "status": "ignored",
                        "reason": "Branch not configured for sync",
                        "branch": branch,
                    }),
                ),
            );
        };

        let changed = push.changed_files();
        let changed_count = changed.len();
        let theme_files = push::filter_theme_files(changed);

        tracing::info!(
            repository = push.repository_name(),
            head_commit = push.head_commit_id(),
            branch = %branch,
            store = %target.store_name,
            changed = changed_count,
            theme_files = theme_files.len(),
            "Received push"
        );

        if theme_files.is_empty() {
            return (
                "no_theme_files",
                make_json_response(
                    StatusCode::OK,
                    &json!({
                        "status": "success",
                        "message": "No theme files to sync",
                        "branch": branch,
                        "storeName": target.store_name,
                    }),
                ),
            );
        }

        // The sync runs on its own task so a caller hanging up cannot cancel
        // it between chunks. The response still waits for the result.
        let syncer = self.syncer.clone();
        let branch = branch.clone();
        let target = target.clone();
        let task = tokio::spawn(async move {
            let result = syncer.sync(&branch, &target, &theme_files).await;
            match &result {
                Ok(report) => tracing::info!(
                    branch = %report.branch,
                    theme = %report.theme,
                    records = report.record_count,
                    "Sync finished"
                ),
                Err(e) => tracing::error!(branch = %branch, error = %e, "Sync failed"),
            }
            result
        });

        match task.await {
            Ok(Ok(report)) => (
                "synced",
                make_json_response(
                    StatusCode::OK,
                    &json!({"status": "success", "message": "Theme files synced", "sync": report}),
                ),
            ),
            Ok(Err(e)) => sync_error_response(&e),
            Err(e) => {
                tracing::error!(error = %e, "Sync task did not complete");
                (
                    "error",
                    make_json_response(
                        StatusCode::INTERNAL_SERVER_ERROR,
                        &json!({"error": "Sync did not complete"}),
                    ),
                )
            }
        }
    }
}

fn sync_error_response(error: &SyncError) -> (&'static str, RelayResponse) {
    match error {
        SyncError::Resolve(ResolveError::NotFound { target, candidates }) => (
            "theme_not_found",
            make_json_response(
                StatusCode::NOT_FOUND,
                &json!({
                    "error": error.to_string(),
                    "themeName": target,
                    "availableThemes": candidates,
                }),
            ),
        ),
        SyncError::Storefront(_) => (
            "storefront_error",
            make_json_response(
                StatusCode::BAD_GATEWAY,
                &json!({"error": error.to_string()}),
            ),
        ),
        SyncError::UnknownStore(_) => (
            "error",
            make_json_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                &json!({"error": error.to_string()}),
            ),
        ),
    }
}
