//! Metrics definitions for the storefront client.

use shared::metrics_defs::{MetricDef, MetricType};

pub const ADMIN_API_REQUESTS: MetricDef = MetricDef {
    name: "storefront.admin_api.requests",
    metric_type: MetricType::Counter,
    description: "Admin API requests. Tagged with operation, outcome.",
};

pub const THEME_RESOLUTIONS: MetricDef = MetricDef {
    name: "storefront.theme_resolution",
    metric_type: MetricType::Counter,
    description: "Theme resolutions. Tagged with the matcher that succeeded, or not_found.",
};

pub const ALL_METRICS: &[MetricDef] = &[ADMIN_API_REQUESTS, THEME_RESOLUTIONS];
