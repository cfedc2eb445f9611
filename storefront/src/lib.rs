//! Access to the storefront platform that hosts the themes: listing themes,
//! picking the one a branch targets, and reading theme file contents.

pub mod client;
pub mod metrics_defs;
pub mod resolver;
pub mod types;
