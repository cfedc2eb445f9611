use thiserror::Error;

/// Errors that stop the relay from starting or serving
#[derive(Error, Debug)]
pub enum RelayError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(#[from] crate::config::ValidationError),

    #[error("Missing credentials: {0}")]
    Credentials(#[from] crate::config::CredentialsError),

    #[error("Storefront client error: {0}")]
    Storefront(#[from] storefront::client::StorefrontError),

    #[error("Sheet client error: {0}")]
    Sink(#[from] crate::sink::SinkError),

    #[error("Unknown branch: {0}")]
    UnknownBranch(String),

    #[error("Sync failed: {0}")]
    Sync(#[from] crate::sync::SyncError),

    #[error("Theme updates are disabled")]
    UpdatesDisabled,

    #[error("Theme update failed: {0}")]
    Update(#[from] crate::update::UpdateError),
}
