use shared::metrics_defs::{MetricDef, MetricType};

pub const WEBHOOK_REQUESTS: MetricDef = MetricDef {
    name: "relay.webhook.requests",
    metric_type: MetricType::Counter,
    description: "Webhook deliveries received. Tagged with outcome.",
};

pub const RECORDS_EXTRACTED: MetricDef = MetricDef {
    name: "relay.settings.records_extracted",
    metric_type: MetricType::Counter,
    description: "Setting records extracted from theme files",
};

pub const EXTRACTION_FAILURES: MetricDef = MetricDef {
    name: "relay.settings.extraction_failures",
    metric_type: MetricType::Counter,
    description: "Theme files that could not be parsed",
};

pub const CHUNKS_DELIVERED: MetricDef = MetricDef {
    name: "relay.sheet.chunks_delivered",
    metric_type: MetricType::Counter,
    description: "Record chunks accepted by the sheet",
};

pub const CHUNKS_FAILED: MetricDef = MetricDef {
    name: "relay.sheet.chunks_failed",
    metric_type: MetricType::Counter,
    description: "Record chunks dropped after a permanent error or exhausted retries",
};

pub const SYNC_DURATION: MetricDef = MetricDef {
    name: "relay.sync.duration",
    metric_type: MetricType::Histogram,
    description: "Sync duration in seconds, fetch delay included. Tagged with outcome.",
};

pub const THEME_UPDATES: MetricDef = MetricDef {
    name: "relay.theme.updates",
    metric_type: MetricType::Counter,
    description: "Settings written back to a theme. Tagged with outcome.",
};

pub const ALL_METRICS: &[MetricDef] = &[
    WEBHOOK_REQUESTS,
    RECORDS_EXTRACTED,
    EXTRACTION_FAILURES,
    CHUNKS_DELIVERED,
    CHUNKS_FAILED,
    SYNC_DURATION,
    THEME_UPDATES,
];
