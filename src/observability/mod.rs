//! Observability for the feed client
//!
//! Structured logging setup and per-session metrics.

pub mod logging;
pub mod metrics;

pub use logging::{init_default_logging, init_logging, LogFormat};
pub use metrics::{MetricsSnapshot, SessionMetrics};

// Span macros for structured logging
pub use logging::{session_span, transport_span};
