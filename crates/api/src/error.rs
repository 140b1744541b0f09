//! Fehler der HTTP-Clients

use relaycast_core::RelaycastError;
use thiserror::Error;

pub type ApiResult<T> = std::result::Result<T, ApiError>;

#[derive(Debug, Error)]
pub enum ApiError {
    /// Netzwerk, Timeout oder unlesbare Antwort
    #[error("HTTP-Fehler: {0}")]
    Http(#[from] reqwest::Error),

    /// Der Service hat die Anfrage abgelehnt (`{detail}`)
    #[error("Abgelehnt ({status}): {detail}")]
    Rejected { status: u16, detail: String },

    #[error("Ungueltige Basis-URL: {0}")]
    Url(String),

    #[error(transparent)]
    Ungueltig(#[from] RelaycastError),
}

impl ApiError {
    /// Text fuer die UI. Nur `detail` des Services wird unveraendert gezeigt.
    pub fn fuer_ui(&self) -> String {
        match self {
            Self::Rejected { detail, .. } => detail.clone(),
            andere => andere.to_string(),
        }
    }

    /// Baut den Fehler aus dem Body einer abgelehnten Antwort
    pub(crate) fn aus_antwort(status: u16, body: &str) -> Self {
        let detail = serde_json::from_str::<serde_json::Value>(body)
            .ok()
            .and_then(|wert| wert.get("detail").cloned())
            .map(|detail| match detail {
                serde_json::Value::String(s) => s,
                andere => andere.to_string(),
            })
            .unwrap_or_else(|| {
                if body.trim().is_empty() {
                    format!("HTTP {}", status)
                } else {
                    body.trim().to_string()
                }
            });
        Self::Rejected { status, detail }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detail_als_text() {
        let e = ApiError::aus_antwort(400, r#"{"detail":"Username already registered"}"#);
        assert!(matches!(e, ApiError::Rejected { status: 400, .. }));
        assert_eq!(e.fuer_ui(), "Username already registered");
    }

    #[test]
    fn detail_als_liste() {
        let e = ApiError::aus_antwort(422, r#"{"detail":[{"msg":"field required"}]}"#);
        assert!(e.fuer_ui().contains("field required"));
    }

    #[test]
    fn ohne_json_body() {
        assert_eq!(ApiError::aus_antwort(502, "Bad Gateway").fuer_ui(), "Bad Gateway");
        assert_eq!(ApiError::aus_antwort(500, "").fuer_ui(), "HTTP 500");
    }
}
