pub mod sink;
pub mod metrics;
pub mod layer;

#[cfg(feature = "tracing-basic")]
pub mod tracing;

#[cfg(feature = "metrics")]
pub mod prometheus;

pub use sink::{MetricsSink, NoopMetrics};
pub use metrics::{LiveMetrics, JobTypeMetrics, MetricsSnapshot};
pub use layer::ObservabilityLayer;

#[cfg(feature = "tracing-basic")]
pub use self::tracing::{init_tracing, LogFormat};

#[cfg(feature = "metrics")]
pub use self::prometheus::PrometheusMetrics;
