//! Domain query facade.
//!
//! Maps the four read-only lookups onto authenticated Helix dispatches.
//! Resource absence and per-resource HTTP failures resolve to `None`,
//! never an error; only credential and transport failures during token
//! acquisition propagate.

use std::sync::Arc;

use reqwest::Method;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use crate::dispatch::Transport;
use crate::error::HelixError;
use crate::models::{DataEnvelope, Stream, User, Video};
use crate::store::TokenStore;
use crate::token::{BearerAuth, TokenManager};

/// Base URL for Helix resource endpoints.
pub const HELIX_BASE_URL: &str = "https://api.twitch.tv/helix";

/// Authenticated client for the Helix read-only resources.
pub struct HelixClient {
    tokens: TokenManager,
    transport: Arc<dyn Transport>,
}

impl HelixClient {
    pub fn new(
        store: Arc<dyn TokenStore>,
        transport: Arc<dyn Transport>,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
    ) -> Self {
        Self {
            tokens: TokenManager::new(store, Arc::clone(&transport), client_id, client_secret),
            transport,
        }
    }

    pub fn with_namespace(
        store: Arc<dyn TokenStore>,
        transport: Arc<dyn Transport>,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        namespace: impl Into<String>,
    ) -> Self {
        Self {
            tokens: TokenManager::with_namespace(
                store,
                Arc::clone(&transport),
                client_id,
                client_secret,
                namespace,
            ),
            transport,
        }
    }

    /// Update the credentials; a changed pair invalidates the cached
    /// token. See [`TokenManager::set_credentials`].
    pub async fn set_credentials(
        &self,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
    ) -> Result<(), HelixError> {
        self.tokens.set_credentials(client_id, client_secret).await
    }

    /// Probe whether the configured credentials are accepted by the
    /// provider. Never errors; failures are logged and reported `false`.
    pub async fn validate_credentials(&self) -> bool {
        self.tokens.validate_credentials().await
    }

    /// Look up a user profile by login name.
    pub async fn get_user(&self, login: &str) -> Result<Option<User>, HelixError> {
        let url = format!(
            "{HELIX_BASE_URL}/users?login={}",
            urlencoding::encode(login)
        );
        self.lookup("users", &url).await
    }

    /// Look up the live stream for a login name. `None` is the
    /// canonical "not live" signal.
    pub async fn get_stream(&self, login: &str) -> Result<Option<Stream>, HelixError> {
        let url = format!(
            "{HELIX_BASE_URL}/streams?user_login={}",
            urlencoding::encode(login)
        );
        self.lookup("streams", &url).await
    }

    /// Whether the login is currently live. Never errors: any failure,
    /// including token acquisition, reads as offline.
    pub async fn is_live(&self, login: &str) -> bool {
        match self.get_stream(login).await {
            Ok(stream) => stream.is_some(),
            Err(e) => {
                warn!(login, error = %e, "liveness check failed; reporting offline");
                false
            }
        }
    }

    /// Look up a single video by id.
    pub async fn get_vod(&self, id: &str) -> Result<Option<Video>, HelixError> {
        let url = format!("{HELIX_BASE_URL}/videos?id={}", urlencoding::encode(id));
        self.lookup("videos", &url).await
    }

    /// Most recent archived broadcast for a login name.
    ///
    /// Resolves the user first; an unknown login short-circuits to
    /// `None` without touching the video endpoint.
    pub async fn get_last_archive_vod(&self, login: &str) -> Result<Option<Video>, HelixError> {
        let Some(user) = self.get_user(login).await? else {
            debug!(login, "no such user; skipping video lookup");
            return Ok(None);
        };

        let url = format!(
            "{HELIX_BASE_URL}/videos?user_id={}&first=1&sort=time&type=archive",
            urlencoding::encode(&user.id)
        );
        self.lookup("videos", &url).await
    }

    async fn lookup<T: DeserializeOwned>(
        &self,
        resource: &'static str,
        url: &str,
    ) -> Result<Option<T>, HelixError> {
        let BearerAuth { token, client_id } = self.tokens.ensure_valid_token().await?;
        let response = self
            .transport
            .dispatch(resource, url, Method::GET, true, Some(token), &client_id)
            .await?;

        if !response.is_success() {
            warn!(resource, status = %response.status, "lookup failed; treating as not found");
            return Ok(None);
        }

        match serde_json::from_str::<DataEnvelope<T>>(&response.body) {
            Ok(envelope) => Ok(envelope.data.into_iter().next()),
            Err(e) => {
                warn!(resource, error = %e, "lookup body failed to parse; treating as not found");
                Ok(None)
            }
        }
    }
}
