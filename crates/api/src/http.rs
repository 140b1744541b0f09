//! Gemeinsame HTTP-Basis fuer alle Service-Clients

use reqwest::{Client, RequestBuilder, Response};
use std::time::Duration;

use crate::error::{ApiError, ApiResult};

/// Standard-Timeout pro Anfrage
pub const STANDARD_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone)]
pub(crate) struct Basis {
    url: String,
    client: Client,
}

impl Basis {
    pub(crate) fn neu(base_url: &str) -> ApiResult<Self> {
        let url = base_url.trim().trim_end_matches('/').to_string();
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(ApiError::Url(base_url.to_string()));
        }
        let client = Client::builder().timeout(STANDARD_TIMEOUT).build()?;
        Ok(Self { url, client })
    }

    pub(crate) fn url(&self, pfad: &str) -> String {
        format!("{}/{}", self.url, pfad.trim_start_matches('/'))
    }

    pub(crate) fn get(&self, pfad: &str) -> RequestBuilder {
        self.client.get(self.url(pfad))
    }

    pub(crate) fn post(&self, pfad: &str) -> RequestBuilder {
        self.client.post(self.url(pfad))
    }
}

/// Gibt die Antwort zurueck wenn sie erfolgreich war, sonst `Rejected`
pub(crate) async fn pruefen(antwort: Response) -> ApiResult<Response> {
    let status = antwort.status();
    if status.is_success() {
        return Ok(antwort);
    }
    let body = antwort.text().await.unwrap_or_default();
    let fehler = ApiError::aus_antwort(status.as_u16(), &body);
    tracing::debug!(status = status.as_u16(), fehler = %fehler, "Anfrage abgelehnt");
    Err(fehler)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn url_ohne_doppelte_slashes() {
        let basis = Basis::neu("http://localhost:8000/").unwrap();
        assert_eq!(basis.url("/token"), "http://localhost:8000/token");
        assert_eq!(basis.url("streams/ended"), "http://localhost:8000/streams/ended");
    }

    #[test]
    fn url_ohne_schema_abgelehnt() {
        let err = Basis::neu("localhost:8000").unwrap_err();
        assert!(matches!(err, ApiError::Url(_)));
    }
}
