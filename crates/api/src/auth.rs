//! Client fuer den Auth-Service
//!
//! Alle Anfragen sind form-kodiert. Das Token aus `login` wird als
//! `Bearer` mitgeschickt und ist gleichzeitig der Schluessel fuer den
//! Relay-Kanal (`/ws/{token}`).

use relaycast_core::{Identity, Session};
use serde::Deserialize;

use crate::error::ApiResult;
use crate::http::{pruefen, Basis};

#[derive(Debug, Clone, Deserialize)]
struct TokenAntwort {
    access_token: String,
    #[serde(default)]
    token_type: Option<String>,
}

/// Ergebnis einer Umbenennung
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct UsernameChange {
    pub username: String,
    /// Neues Token falls der Service eines ausstellt
    #[serde(default)]
    pub access_token: Option<String>,
}

#[derive(Debug, Clone)]
pub struct AuthClient {
    basis: Basis,
}

impl AuthClient {
    pub fn neu(base_url: &str) -> ApiResult<Self> {
        Ok(Self {
            basis: Basis::neu(base_url)?,
        })
    }

    pub async fn register(&self, username: &str, password: &str) -> ApiResult<()> {
        let antwort = self
            .basis
            .post("/register")
            .form(&[("username", username), ("password", password)])
            .send()
            .await?;
        pruefen(antwort).await?;
        tracing::info!(username, "Konto registriert");
        Ok(())
    }

    /// Meldet an und liefert Token plus eigene Identitaet
    pub async fn login(&self, username: &str, password: &str) -> ApiResult<Session> {
        let identity = Identity::parse(username)?;
        let antwort = self
            .basis
            .post("/token")
            .form(&[("username", identity.as_str()), ("password", password)])
            .send()
            .await?;
        let token: TokenAntwort = pruefen(antwort).await?.json().await?;
        tracing::info!(
            identity = %identity,
            token_type = token.token_type.as_deref().unwrap_or("bearer"),
            "Angemeldet"
        );
        Ok(Session::new(token.access_token, identity))
    }

    pub async fn change_username(
        &self,
        token: &str,
        new_username: &str,
        password: &str,
    ) -> ApiResult<UsernameChange> {
        let neu = Identity::parse(new_username)?;
        let antwort = self
            .basis
            .post("/users/change-username")
            .bearer_auth(token)
            .form(&[("new_username", neu.as_str()), ("password", password)])
            .send()
            .await?;
        let ergebnis: UsernameChange = pruefen(antwort).await?.json().await?;
        tracing::info!(username = %ergebnis.username, neues_token = ergebnis.access_token.is_some(), "Benutzername geaendert");
        Ok(ergebnis)
    }

    pub async fn change_password(
        &self,
        token: &str,
        old_password: &str,
        new_password: &str,
    ) -> ApiResult<()> {
        let antwort = self
            .basis
            .post("/users/change-password")
            .bearer_auth(token)
            .form(&[
                ("old_password", old_password),
                ("new_password", new_password),
            ])
            .send()
            .await?;
        pruefen(antwort).await?;
        tracing::info!("Passwort geaendert");
        Ok(())
    }
}
