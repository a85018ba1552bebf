//! Metrics definitions for machine configuration access.

use shared::metrics_defs::{MetricDef, MetricType};

pub const CLIENT_FALLBACK_ENDPOINT: MetricDef = MetricDef {
    name: "client.connect.fallback",
    metric_type: MetricType::Counter,
    description: "Number of client creations that had to use the fallback endpoint",
};

pub const CLIENT_CONNECT_FAILED: MetricDef = MetricDef {
    name: "client.connect.failed",
    metric_type: MetricType::Counter,
    description: "Number of client creations where both endpoints failed",
};

pub const CONFIG_PARSE_DEGRADED: MetricDef = MetricDef {
    name: "config.parse.degraded",
    metric_type: MetricType::Counter,
    description: "Number of stored part configs that could not be parsed and were treated as empty",
};

pub const EVENT_MANAGER_SAVED: MetricDef = MetricDef {
    name: "event_manager.save.success",
    metric_type: MetricType::Counter,
    description: "Number of event manager definitions written to a machine",
};

pub const EVENT_MANAGER_SAVE_FAILED: MetricDef = MetricDef {
    name: "event_manager.save.failed",
    metric_type: MetricType::Counter,
    description: "Number of event manager saves that failed",
};

pub const EVENT_MANAGER_SAVE_DURATION: MetricDef = MetricDef {
    name: "event_manager.save.duration",
    metric_type: MetricType::Histogram,
    description: "Time to complete an event manager read-modify-write in seconds",
};

// Described at startup by the binary; keep in sync with the definitions above.
pub const ALL_METRICS: &[MetricDef] = &[
    CLIENT_FALLBACK_ENDPOINT,
    CLIENT_CONNECT_FAILED,
    CONFIG_PARSE_DEGRADED,
    EVENT_MANAGER_SAVED,
    EVENT_MANAGER_SAVE_FAILED,
    EVENT_MANAGER_SAVE_DURATION,
];
