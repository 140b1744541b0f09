//! # relaycast-observability
//!
//! Structured Logging fuer den Relaycast-Client via tracing-subscriber.
//! Text- oder JSON-Ausgabe auf stderr, Filter per `RC_LOG_LEVEL`.

pub mod logging;

pub use logging::{logging_initialisieren, LogFormat, LoggingConfig, LoggingError};
