use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque theme identifier as issued by the Admin API,
/// e.g. `gid://shopify/OnlineStoreTheme/123`.
pub type ThemeId = String;

/// Publication state of a theme.
///
/// Roles the platform may add later are kept verbatim in `Other` so they can
/// still be printed in diagnostics.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ThemeRole {
    Main,
    Published,
    Unpublished,
    Development,
    Demo,
    Locked,
    Archived,
    Other(String),
}

impl ThemeRole {
    pub fn as_str(&self) -> &str {
        match self {
            ThemeRole::Main => "MAIN",
            ThemeRole::Published => "PUBLISHED",
            ThemeRole::Unpublished => "UNPUBLISHED",
            ThemeRole::Development => "DEVELOPMENT",
            ThemeRole::Demo => "DEMO",
            ThemeRole::Locked => "LOCKED",
            ThemeRole::Archived => "ARCHIVED",
            ThemeRole::Other(role) => role,
        }
    }
}

impl From<String> for ThemeRole {
    fn from(role: String) -> Self {
        match role.to_ascii_uppercase().as_str() {
            "MAIN" => ThemeRole::Main,
            "PUBLISHED" => ThemeRole::Published,
            "UNPUBLISHED" => ThemeRole::Unpublished,
            "DEVELOPMENT" => ThemeRole::Development,
            "DEMO" => ThemeRole::Demo,
            "LOCKED" => ThemeRole::Locked,
            "ARCHIVED" => ThemeRole::Archived,
            _ => ThemeRole::Other(role),
        }
    }
}

impl From<&str> for ThemeRole {
    fn from(role: &str) -> Self {
        ThemeRole::from(role.to_string())
    }
}

impl From<ThemeRole> for String {
    fn from(role: ThemeRole) -> Self {
        role.as_str().to_string()
    }
}

impl fmt::Display for ThemeRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A theme as returned by the theme listing query.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThemeCandidate {
    pub id: ThemeId,
    pub name: String,
    pub role: ThemeRole,
}

impl ThemeCandidate {
    pub fn new<I, N, R>(id: I, name: N, role: R) -> Self
    where
        I: Into<String>,
        N: Into<String>,
        R: Into<ThemeRole>,
    {
        ThemeCandidate {
            id: id.into(),
            name: name.into(),
            role: role.into(),
        }
    }
}

impl fmt::Display for ThemeCandidate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "\"{}\" ({})", self.name, self.role)
    }
}

/// Text content of one theme file. `content` is `None` for files without a
/// text body (images, fonts) and for files the theme does not contain.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ThemeFile {
    pub filename: String,
    pub content: Option<String>,
}

/// Domain and credential for one store's Admin API.
#[derive(Clone, PartialEq, Eq)]
pub struct StoreAccess {
    pub domain: String,
    pub access_token: String,
}

impl fmt::Debug for StoreAccess {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoreAccess")
            .field("domain", &self.domain)
            .field("access_token", &"<redacted>")
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_parsing() {
        assert_eq!(ThemeRole::from("MAIN"), ThemeRole::Main);
        assert_eq!(ThemeRole::from("main"), ThemeRole::Main);
        assert_eq!(ThemeRole::from("unpublished"), ThemeRole::Unpublished);
        assert_eq!(
            ThemeRole::from("SANDBOX"),
            ThemeRole::Other("SANDBOX".to_string())
        );
        assert_eq!(ThemeRole::Other("SANDBOX".into()).to_string(), "SANDBOX");
    }

    #[test]
    fn test_candidate_deserialization() {
        let candidate: ThemeCandidate = serde_json::from_str(
            r#"{"id": "gid://shopify/OnlineStoreTheme/1", "name": "Dawn", "role": "DEVELOPMENT"}"#,
        )
        .unwrap();
        assert_eq!(
            candidate,
            ThemeCandidate::new("gid://shopify/OnlineStoreTheme/1", "Dawn", "DEVELOPMENT")
        );
        assert_eq!(candidate.to_string(), "\"Dawn\" (DEVELOPMENT)");
    }

    #[test]
    fn test_store_access_debug_hides_token() {
        let access = StoreAccess {
            domain: "shop.myshopify.com".into(),
            access_token: "shpat_secret".into(),
        };
        assert!(!format!("{access:?}").contains("shpat_secret"));
    }
}
