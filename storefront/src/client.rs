use crate::metrics_defs::ADMIN_API_REQUESTS;
use crate::types::{StoreAccess, ThemeCandidate, ThemeFile};
use reqwest::StatusCode;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::json;
use shared::counter;
use std::collections::HashMap;
use std::time::Duration;

pub const DEFAULT_API_VERSION: &str = "2025-01";

/// The files connection is requested with `first: 50`, larger path lists are
/// split into several queries.
const FILES_PAGE_SIZE: usize = 50;

const THEMES_QUERY: &str = r#"
query getThemes {
  themes(first: 50) {
    nodes {
      id
      name
      role
    }
  }
}
"#;

const THEME_FILES_QUERY: &str = r#"
query GetThemeFileContent($themeId: ID!, $filenames: [String!]!) {
  theme(id: $themeId) {
    id
    files(filenames: $filenames, first: 50) {
      nodes {
        filename
        body {
          ... on OnlineStoreThemeFileBodyText {
            content
          }
        }
      }
    }
  }
}
"#;

const THEME_FILES_UPSERT_MUTATION: &str = r#"
mutation themeFilesUpsert($files: [OnlineStoreThemeFilesUpsertFileInput!]!, $themeId: ID!) {
  themeFilesUpsert(files: $files, themeId: $themeId) {
    upsertedThemeFiles {
      filename
    }
    userErrors {
      field
      message
    }
  }
}
"#;

#[derive(thiserror::Error, Debug)]
pub enum StorefrontError {
    #[error("HTTP client error: {0}")]
    ReqwestError(#[from] reqwest::Error),
    #[error("Admin API request to {domain} failed with status {status}")]
    Status { domain: String, status: StatusCode },
    #[error("Admin API GraphQL errors: {0}")]
    GraphQl(String),
    #[error("Admin API response contained no data")]
    MissingData,
    #[error("theme {0} not found")]
    ThemeNotFound(String),
    #[error("theme file upsert rejected: {0}")]
    UserErrors(String),
}

#[derive(Deserialize)]
struct GraphQlResponse<T> {
    data: Option<T>,
    errors: Option<Vec<GraphQlError>>,
}

#[derive(Deserialize)]
struct GraphQlError {
    message: String,
}

#[derive(Deserialize)]
struct Nodes<T> {
    nodes: Vec<T>,
}

#[derive(Deserialize)]
struct ThemesData {
    themes: Nodes<ThemeCandidate>,
}

#[derive(Deserialize)]
struct ThemeFilesData {
    theme: Option<ThemeFiles>,
}

#[derive(Deserialize)]
struct ThemeFiles {
    files: Nodes<FileNode>,
}

#[derive(Deserialize)]
struct FileNode {
    filename: String,
    body: Option<FileBody>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct UpsertData {
    theme_files_upsert: Option<UpsertPayload>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct UpsertPayload {
    #[serde(default)]
    upserted_theme_files: Option<Vec<UpsertedFile>>,
    #[serde(default)]
    user_errors: Vec<GraphQlError>,
}

#[derive(Deserialize)]
struct UpsertedFile {
    filename: String,
}

// Non-text bodies come back as an empty object.
#[derive(Deserialize)]
struct FileBody {
    #[serde(default)]
    content: Option<String>,
}

/// Client for the storefront Admin GraphQL API.
#[derive(Clone)]
pub struct StorefrontClient {
    client: reqwest::Client,
    api_version: String,
    scheme: &'static str,
}

impl StorefrontClient {
    pub fn new(api_version: &str, timeout: Duration) -> Result<Self, StorefrontError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;

        Ok(StorefrontClient {
            client,
            api_version: api_version.to_string(),
            scheme: "https",
        })
    }

    /// Talks plain HTTP to the store domain. Only useful against local mock servers.
    pub fn with_insecure_http(mut self) -> Self {
        self.scheme = "http";
        self
    }

    fn endpoint(&self, domain: &str) -> String {
        format!(
            "{}://{}/admin/api/{}/graphql.json",
            self.scheme, domain, self.api_version
        )
    }

    async fn query<T: DeserializeOwned>(
        &self,
        store: &StoreAccess,
        operation: &'static str,
        query: &str,
        variables: serde_json::Value,
    ) -> Result<T, StorefrontError> {
        let result = self.send_query(store, query, variables).await;
        let outcome = if result.is_ok() { "ok" } else { "error" };
        counter!(ADMIN_API_REQUESTS, "operation" => operation, "outcome" => outcome).increment(1);
        result
    }

    async fn send_query<T: DeserializeOwned>(
        &self,
        store: &StoreAccess,
        query: &str,
        variables: serde_json::Value,
    ) -> Result<T, StorefrontError> {
        let response = self
            .client
            .post(self.endpoint(&store.domain))
            .header("X-Shopify-Access-Token", &store.access_token)
            .json(&json!({ "query": query, "variables": variables }))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(StorefrontError::Status {
                domain: store.domain.clone(),
                status: response.status(),
            });
        }

        let body = response.json::<GraphQlResponse<T>>().await?;

        if let Some(errors) = body.errors.filter(|errors| !errors.is_empty()) {
            let messages: Vec<String> = errors.into_iter().map(|e| e.message).collect();
            return Err(StorefrontError::GraphQl(messages.join("; ")));
        }

        body.data.ok_or(StorefrontError::MissingData)
    }

    /// Lists the themes of a store in the order the API returns them.
    pub async fn list_themes(
        &self,
        store: &StoreAccess,
    ) -> Result<Vec<ThemeCandidate>, StorefrontError> {
        let data: ThemesData = self
            .query(store, "list_themes", THEMES_QUERY, json!({}))
            .await?;

        tracing::debug!(
            domain = %store.domain,
            themes = data.themes.nodes.len(),
            "Listed themes"
        );
        Ok(data.themes.nodes)
    }

    /// Fetches the text content of `filenames` from a theme.
    ///
    /// The result has one entry per requested filename, in request order.
    /// Files the theme does not have, or that have no text body, come back
    /// with `content: None`.
    pub async fn fetch_files(
        &self,
        store: &StoreAccess,
        theme_id: &str,
        filenames: &[String],
    ) -> Result<Vec<ThemeFile>, StorefrontError> {
        let mut contents: HashMap<String, Option<String>> = HashMap::new();

        for page in filenames.chunks(FILES_PAGE_SIZE) {
            let data: ThemeFilesData = self
                .query(
                    store,
                    "fetch_files",
                    THEME_FILES_QUERY,
                    json!({ "themeId": theme_id, "filenames": page }),
                )
                .await?;

            let theme = data
                .theme
                .ok_or_else(|| StorefrontError::ThemeNotFound(theme_id.to_string()))?;

            for node in theme.files.nodes {
                contents.insert(node.filename, node.body.and_then(|body| body.content));
            }
        }

        tracing::debug!(
            domain = %store.domain,
            theme_id,
            requested = filenames.len(),
            returned = contents.len(),
            "Fetched theme files"
        );

        Ok(filenames
            .iter()
            .map(|filename| ThemeFile {
                filename: filename.clone(),
                content: contents.remove(filename).flatten(),
            })
            .collect())
    }

    /// Replaces the text content of one theme file and returns the filenames
    /// the API reports as written.
    pub async fn upsert_file(
        &self,
        store: &StoreAccess,
        theme_id: &str,
        filename: &str,
        content: &str,
    ) -> Result<Vec<String>, StorefrontError> {
        let data: UpsertData = self
            .query(
                store,
                "upsert_file",
                THEME_FILES_UPSERT_MUTATION,
                json!({
                    "themeId": theme_id,
                    "files": [{
                        "filename": filename,
                        "body": {"type": "TEXT", "value": content},
                    }],
                }),
            )
            .await?;

        let payload = data
            .theme_files_upsert
            .ok_or(StorefrontError::MissingData)?;

        if !payload.user_errors.is_empty() {
            let messages: Vec<String> = payload.user_errors.into_iter().map(|e| e.message).collect();
            return Err(StorefrontError::UserErrors(messages.join("; ")));
        }

        let written: Vec<String> = payload
            .upserted_theme_files
            .unwrap_or_default()
            .into_iter()
            .map(|file| file.filename)
            .collect();

        tracing::info!(
            domain = %store.domain,
            theme_id,
            filename,
            bytes = content.len(),
            "Upserted theme file"
        );
        Ok(written)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ThemeRole;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const GRAPHQL_PATH: &str = "/admin/api/2025-01/graphql.json";

    fn test_client() -> StorefrontClient {
        StorefrontClient::new(DEFAULT_API_VERSION, Duration::from_secs(5))
            .unwrap()
            .with_insecure_http()
    }

    fn store(server: &MockServer) -> StoreAccess {
        StoreAccess {
            domain: server.address().to_string(),
            access_token: "shpat_test".into(),
        }
    }

    #[tokio::test]
    async fn test_list_themes() {
        let mock_server = MockServer::start().await;

        let response_body = r#"{
            "data": {
                "themes": {
                    "nodes": [
                        {"id": "gid://shopify/OnlineStoreTheme/1", "name": "tt-ca/US_Live", "role": "MAIN"},
                        {"id": "gid://shopify/OnlineStoreTheme/2", "name": "tt-ca/US_Live copy", "role": "UNPUBLISHED"}
                    ]
                }
            }
        }"#;

        Mock::given(method("POST"))
            .and(path(GRAPHQL_PATH))
            .and(header("X-Shopify-Access-Token", "shpat_test"))
            .respond_with(ResponseTemplate::new(200).set_body_string(response_body))
            .mount(&mock_server)
            .await;

        let themes = test_client().list_themes(&store(&mock_server)).await.unwrap();
        assert_eq!(themes.len(), 2);
        assert_eq!(themes[0].name, "tt-ca/US_Live");
        assert_eq!(themes[0].role, ThemeRole::Main);
        assert_eq!(themes[1].role, ThemeRole::Unpublished);
    }

    #[tokio::test]
    async fn test_fetch_files_keeps_request_order() {
        let mock_server = MockServer::start().await;

        // The API answers in its own order and omits unknown files
        let response_body = r#"{
            "data": {
                "theme": {
                    "id": "gid://shopify/OnlineStoreTheme/1",
                    "files": {
                        "nodes": [
                            {"filename": "assets/logo.png", "body": {}},
                            {"filename": "templates/index.json", "body": {"content": "{\"sections\":{}}"}}
                        ]
                    }
                }
            }
        }"#;

        Mock::given(method("POST"))
            .and(path(GRAPHQL_PATH))
            .and(body_partial_json(serde_json::json!({
                "variables": {"themeId": "gid://shopify/OnlineStoreTheme/1"}
            })))
            .respond_with(ResponseTemplate::new(200).set_body_string(response_body))
            .mount(&mock_server)
            .await;

        let filenames = vec![
            "templates/index.json".to_string(),
            "sections/missing.json".to_string(),
            "assets/logo.png".to_string(),
        ];
        let files = test_client()
            .fetch_files(
                &store(&mock_server),
                "gid://shopify/OnlineStoreTheme/1",
                &filenames,
            )
            .await
            .unwrap();

        assert_eq!(
            files,
            vec![
                ThemeFile {
                    filename: "templates/index.json".into(),
                    content: Some("{\"sections\":{}}".into()),
                },
                ThemeFile {
                    filename: "sections/missing.json".into(),
                    content: None,
                },
                ThemeFile {
                    filename: "assets/logo.png".into(),
                    content: None,
                },
            ]
        );
    }

    #[tokio::test]
    async fn test_fetch_files_unknown_theme() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path(GRAPHQL_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"data": {"theme": null}}"#))
            .mount(&mock_server)
            .await;

        let result = test_client()
            .fetch_files(&store(&mock_server), "gid://x", &["layout/theme.liquid".into()])
            .await;
        assert!(matches!(result, Err(StorefrontError::ThemeNotFound(id)) if id == "gid://x"));
    }

    #[tokio::test]
    async fn test_graphql_errors() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path(GRAPHQL_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"{"errors": [{"message": "Access denied"}, {"message": "Throttled"}]}"#,
            ))
            .mount(&mock_server)
            .await;

        let result = test_client().list_themes(&store(&mock_server)).await;
        match result {
            Err(StorefrontError::GraphQl(message)) => assert_eq!(message, "Access denied; Throttled"),
            other => panic!("unexpected result: {:?}", other.map(|t| t.len())),
        }
    }

    #[tokio::test]
    async fn test_http_error_status() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path(GRAPHQL_PATH))
            .respond_with(ResponseTemplate::new(401))
            .mount(&mock_server)
            .await;

        let result = test_client().list_themes(&store(&mock_server)).await;
        let err = result.unwrap_err();
        assert!(matches!(
            err,
            StorefrontError::Status { status: StatusCode::UNAUTHORIZED, .. }
        ));
        assert!(err.to_string().contains("401"));
    }

    #[tokio::test]
    async fn test_upsert_file() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path(GRAPHQL_PATH))
            .and(body_partial_json(serde_json::json!({
                "variables": {
                    "themeId": "gid://shopify/OnlineStoreTheme/2",
                    "files": [{
                        "filename": "templates/index.json",
                        "body": {"type": "TEXT", "value": "{}"}
                    }]
                }
            })))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"{"data": {"themeFilesUpsert": {
                    "upsertedThemeFiles": [{"filename": "templates/index.json"}],
                    "userErrors": []
                }}}"#,
            ))
            .expect(1)
            .mount(&mock_server)
            .await;

        let written = test_client()
            .upsert_file(
                &store(&mock_server),
                "gid://shopify/OnlineStoreTheme/2",
                "templates/index.json",
                "{}",
            )
            .await
            .unwrap();
        assert_eq!(written, vec!["templates/index.json".to_string()]);
    }

    #[tokio::test]
    async fn test_upsert_file_user_errors() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path(GRAPHQL_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"{"data": {"themeFilesUpsert": {
                    "upsertedThemeFiles": null,
                    "userErrors": [
                        {"field": ["files", "0", "body"], "message": "Invalid JSON"},
                        {"field": null, "message": "Theme is locked"}
                    ]
                }}}"#,
            ))
            .mount(&mock_server)
            .await;

        let result = test_client()
            .upsert_file(&store(&mock_server), "gid://x", "templates/index.json", "{")
            .await;
        assert!(matches!(
            result,
            Err(StorefrontError::UserErrors(message)) if message == "Invalid JSON; Theme is locked"
        ));
    }
}
