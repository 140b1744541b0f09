//! relaycast-api – HTTP-Clients fuer die Relaycast-Services
//!
//! - `AuthClient`: Registrierung, Anmeldung, Namens- und Passwortwechsel
//! - `HistoryClient`/`HistoryView`: Verlauf beendeter Uebertragungen

pub mod auth;
pub mod error;
pub mod history;
mod http;

pub use auth::{AuthClient, UsernameChange};
pub use error::{ApiError, ApiResult};
pub use history::{HistoryClient, HistoryView, StreamPage, StreamRecord, STANDARD_SEITE};
pub use http::STANDARD_TIMEOUT;
