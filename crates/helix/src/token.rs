//! App access token lifecycle.
//!
//! The manager owns the client credentials and the cached token, decides
//! when a refresh is due, and performs the OAuth client-credentials
//! exchange through the dispatcher. The persisted [`TokenRecord`] is the
//! durable source of truth; the in-memory token only mirrors it.

use std::sync::Arc;

use chrono::Utc;
use reqwest::Method;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::dispatch::{RawResponse, Transport};
use crate::error::HelixError;
use crate::models::TokenResponse;
use crate::store::{StoreError, TokenStore};

/// Default storage namespace for the persisted record.
pub const DEFAULT_STORAGE_NAMESPACE: &str = "twapi";

/// OAuth client-credentials endpoint.
pub const OAUTH_TOKEN_URL: &str = "https://id.twitch.tv/oauth2/token";

/// Subtracted from the provider expiry so a token is never adopted when
/// it would expire mid-flight.
const SAFETY_MARGIN_MS: i64 = 60_000;

/// Persisted representation of a cached app access token and its
/// validity window. Replaced wholesale on refresh, never mutated.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenRecord {
    pub client_id: String,
    pub access_token: String,
    /// Epoch milliseconds after which the token must not be used.
    pub expiration_date_ms: i64,
}

impl TokenRecord {
    /// A record is usable only for the credentials that produced it and
    /// only before its expiry.
    pub fn is_usable(&self, client_id: &str, now_ms: i64) -> bool {
        self.client_id == client_id && self.expiration_date_ms > now_ms
    }
}

/// Token plus the client id that produced it, handed to authenticated
/// dispatches.
#[derive(Debug, Clone)]
pub struct BearerAuth {
    pub token: String,
    pub client_id: String,
}

#[derive(Debug, Default)]
struct TokenState {
    client_id: String,
    client_secret: String,
    access_token: Option<String>,
}

/// Owns credential state and the cached token.
///
/// All state sits behind one async mutex held for the whole refresh
/// critical section, so concurrent cold-cache callers on the same
/// manager serialize into a single exchange.
pub struct TokenManager {
    store: Arc<dyn TokenStore>,
    transport: Arc<dyn Transport>,
    namespace: String,
    state: Mutex<TokenState>,
}

impl TokenManager {
    pub fn new(
        store: Arc<dyn TokenStore>,
        transport: Arc<dyn Transport>,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
    ) -> Self {
        Self::with_namespace(
            store,
            transport,
            client_id,
            client_secret,
            DEFAULT_STORAGE_NAMESPACE,
        )
    }

    pub fn with_namespace(
        store: Arc<dyn TokenStore>,
        transport: Arc<dyn Transport>,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        namespace: impl Into<String>,
    ) -> Self {
        Self {
            store,
            transport,
            namespace: namespace.into(),
            state: Mutex::new(TokenState {
                client_id: client_id.into(),
                client_secret: client_secret.into(),
                access_token: None,
            }),
        }
    }

    fn storage_key(&self) -> String {
        format!("{}:tokenData", self.namespace)
    }

    /// Update the credentials.
    ///
    /// Comparison is on the raw values: if either actually changed, the
    /// in-memory token is dropped and the persisted record deleted, so
    /// the next [`ensure_valid_token`](Self::ensure_valid_token) starts
    /// from a cold cache. Unchanged values are a no-op.
    pub async fn set_credentials(
        &self,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
    ) -> Result<(), HelixError> {
        let client_id = client_id.into();
        let client_secret = client_secret.into();

        let mut state = self.state.lock().await;
        if state.client_id == client_id && state.client_secret == client_secret {
            debug!("credentials unchanged; keeping cached token");
            return Ok(());
        }

        state.client_id = client_id;
        state.client_secret = client_secret;
        state.access_token = None;
        self.store.delete(&self.storage_key()).await?;
        info!("credentials updated; cached token discarded");
        Ok(())
    }

    /// Guarantee a valid bearer token, refreshing through the OAuth
    /// endpoint only when the persisted record is absent, malformed,
    /// expired, or tied to different credentials.
    pub async fn ensure_valid_token(&self) -> Result<BearerAuth, HelixError> {
        let mut state = self.state.lock().await;

        check_credential(&state.client_id, "client id")?;
        check_credential(&state.client_secret, "client secret")?;

        let key = self.storage_key();
        let now = now_ms();

        if let Some(raw) = self.store.get(&key).await? {
            match serde_json::from_str::<TokenRecord>(&raw) {
                Ok(record) if record.is_usable(&state.client_id, now) => {
                    debug!("cached token still valid; skipping exchange");
                    state.access_token = Some(record.access_token.clone());
                    return Ok(BearerAuth {
                        token: record.access_token,
                        client_id: state.client_id.clone(),
                    });
                }
                Ok(record) => {
                    if record.client_id != state.client_id {
                        info!("stored token belongs to a different client id; discarding");
                    } else {
                        info!("stored token expired; requesting a new one");
                    }
                    self.store.delete(&key).await?;
                }
                Err(e) => {
                    warn!(error = %e, "stored token record failed to parse; discarding");
                    self.store.delete(&key).await?;
                }
            }
        } else {
            info!("no token found in storage; requesting a new one");
        }

        state.access_token = None;

        let response = self
            .exchange(&state.client_id, &state.client_secret)
            .await?;
        if !response.is_success() {
            warn!(status = %response.status, "token endpoint rejected the exchange");
            self.store.delete(&key).await?;
            return Err(HelixError::TokenRequest {
                status: response.status,
            });
        }

        let (token, expires_in) = parse_token_response(&response.body)?;
        let record = TokenRecord {
            client_id: state.client_id.clone(),
            access_token: token.clone(),
            expiration_date_ms: now + expires_in * 1000 - SAFETY_MARGIN_MS,
        };
        let raw = serde_json::to_string(&record).map_err(StoreError::from)?;
        self.store.set(&key, &raw).await?;
        state.access_token = Some(token.clone());
        info!("token exchange complete; new token cached");

        Ok(BearerAuth {
            token,
            client_id: state.client_id.clone(),
        })
    }

    /// The token currently held in memory, if any. The persisted record
    /// stays the durable source of truth; this is only the last token
    /// adopted by [`ensure_valid_token`](Self::ensure_valid_token).
    pub async fn active_token(&self) -> Option<String> {
        self.state.lock().await.access_token.clone()
    }

    /// Probe whether the current credentials are accepted by the
    /// provider, without touching the cache. Every failure is logged and
    /// reported as `false`; this never propagates an error.
    pub async fn validate_credentials(&self) -> bool {
        let (client_id, client_secret) = {
            let state = self.state.lock().await;
            (state.client_id.clone(), state.client_secret.clone())
        };
        if client_id.trim().is_empty() || client_secret.trim().is_empty() {
            warn!("credential check skipped: client id or secret is blank");
            return false;
        }

        match self.exchange(&client_id, &client_secret).await {
            Ok(response) if response.is_success() => {
                match parse_token_response(&response.body) {
                    Ok(_) => true,
                    Err(e) => {
                        warn!(error = %e, "credential check got a malformed token payload");
                        false
                    }
                }
            }
            Ok(response) => {
                warn!(status = %response.status, "credential check rejected by the provider");
                false
            }
            Err(e) => {
                warn!(error = %e, "credential check failed");
                false
            }
        }
    }

    /// Issue the client-credentials exchange. No auth headers: this call
    /// precedes token existence.
    async fn exchange(
        &self,
        client_id: &str,
        client_secret: &str,
    ) -> Result<RawResponse, HelixError> {
        let url = format!(
            "{OAUTH_TOKEN_URL}?client_id={}&client_secret={}&grant_type=client_credentials",
            urlencoding::encode(client_id),
            urlencoding::encode(client_secret),
        );
        self.transport
            .dispatch("oauth2/token", &url, Method::POST, false, None, client_id)
            .await
    }
}

fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

fn check_credential(value: &str, name: &'static str) -> Result<(), HelixError> {
    if value.trim().is_empty() {
        warn!("no {name} configured for the Twitch API");
        return Err(HelixError::MissingCredentials(name));
    }
    Ok(())
}

fn parse_token_response(body: &str) -> Result<(String, i64), HelixError> {
    let parsed: TokenResponse = serde_json::from_str(body)
        .map_err(|e| HelixError::InvalidTokenResponse(format!("unparsable body: {e}")))?;
    let token = parsed
        .access_token
        .filter(|t| !t.is_empty())
        .ok_or_else(|| HelixError::InvalidTokenResponse("missing access_token".into()))?;
    let expires_in = parsed
        .expires_in
        .ok_or_else(|| HelixError::InvalidTokenResponse("missing expires_in".into()))?;
    Ok((token, expires_in))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::MockTransport;
    use crate::store::MemoryTokenStore;
    use reqwest::StatusCode;

    fn token_body(token: &str, expires_in: i64) -> String {
        format!(r#"{{"access_token":"{token}","expires_in":{expires_in},"token_type":"bearer"}}"#)
    }

    fn ok_response(body: String) -> RawResponse {
        RawResponse {
            status: StatusCode::OK,
            body,
        }
    }

    async fn seed_record(store: &MemoryTokenStore, record: &TokenRecord) {
        store
            .set("twapi:tokenData", &serde_json::to_string(record).unwrap())
            .await
            .unwrap();
    }

    fn manager(store: Arc<MemoryTokenStore>, transport: MockTransport) -> TokenManager {
        TokenManager::new(store, Arc::new(transport), "abc", "secret")
    }

    #[tokio::test]
    async fn valid_record_skips_the_exchange() {
        let store = Arc::new(MemoryTokenStore::new());
        seed_record(
            &store,
            &TokenRecord {
                client_id: "abc".into(),
                access_token: "tok".into(),
                expiration_date_ms: now_ms() + 100_000,
            },
        )
        .await;

        // No expectations: any dispatch panics the mock.
        let manager = manager(Arc::clone(&store), MockTransport::new());
        assert!(manager.active_token().await.is_none());

        let auth = manager.ensure_valid_token().await.unwrap();
        assert_eq!(auth.token, "tok");
        assert_eq!(auth.client_id, "abc");
        assert_eq!(manager.active_token().await.as_deref(), Some("tok"));
    }

    #[tokio::test]
    async fn expired_record_triggers_one_exchange_and_persists_the_window() {
        let store = Arc::new(MemoryTokenStore::new());
        seed_record(
            &store,
            &TokenRecord {
                client_id: "abc".into(),
                access_token: "old".into(),
                expiration_date_ms: now_ms() - 1,
            },
        )
        .await;

        let mut transport = MockTransport::new();
        transport
            .expect_dispatch()
            .times(1)
            .withf(|resource, url, method, attach_auth, token, _| {
                resource == "oauth2/token"
                    && url.starts_with(OAUTH_TOKEN_URL)
                    && url.contains("client_id=abc")
                    && url.contains("grant_type=client_credentials")
                    && *method == Method::POST
                    && !*attach_auth
                    && token.is_none()
            })
            .returning(|_, _, _, _, _, _| Ok(ok_response(token_body("fresh", 3600))));

        let before = now_ms();
        let manager = manager(Arc::clone(&store), transport);
        let auth = manager.ensure_valid_token().await.unwrap();
        let after = now_ms();
        assert_eq!(auth.token, "fresh");

        let raw = store.get("twapi:tokenData").await.unwrap().unwrap();
        let record: TokenRecord = serde_json::from_str(&raw).unwrap();
        assert_eq!(record.client_id, "abc");
        assert_eq!(record.access_token, "fresh");
        assert!(record.expiration_date_ms >= before + 3600 * 1000 - 60_000);
        assert!(record.expiration_date_ms <= after + 3600 * 1000 - 60_000);
    }

    #[tokio::test]
    async fn client_id_mismatch_discards_and_refreshes() {
        let store = Arc::new(MemoryTokenStore::new());
        seed_record(
            &store,
            &TokenRecord {
                client_id: "someone-else".into(),
                access_token: "theirs".into(),
                expiration_date_ms: now_ms() + 100_000,
            },
        )
        .await;

        let mut transport = MockTransport::new();
        transport
            .expect_dispatch()
            .times(1)
            .returning(|_, _, _, _, _, _| Ok(ok_response(token_body("mine", 3600))));

        let manager = manager(Arc::clone(&store), transport);
        let auth = manager.ensure_valid_token().await.unwrap();
        assert_eq!(auth.token, "mine");

        let raw = store.get("twapi:tokenData").await.unwrap().unwrap();
        let record: TokenRecord = serde_json::from_str(&raw).unwrap();
        assert_eq!(record.client_id, "abc");
    }

    #[tokio::test]
    async fn malformed_record_self_heals() {
        let store = Arc::new(MemoryTokenStore::new());
        store.set("twapi:tokenData", "{garbage").await.unwrap();

        let mut transport = MockTransport::new();
        transport
            .expect_dispatch()
            .times(1)
            .returning(|_, _, _, _, _, _| Ok(ok_response(token_body("fresh", 3600))));

        let manager = manager(Arc::clone(&store), transport);
        assert!(manager.ensure_valid_token().await.is_ok());
    }

    #[tokio::test]
    async fn rejected_exchange_deletes_the_record_and_errors() {
        let store = Arc::new(MemoryTokenStore::new());
        seed_record(
            &store,
            &TokenRecord {
                client_id: "abc".into(),
                access_token: "old".into(),
                expiration_date_ms: now_ms() - 1,
            },
        )
        .await;

        let mut transport = MockTransport::new();
        transport.expect_dispatch().times(1).returning(|_, _, _, _, _, _| {
            Ok(RawResponse {
                status: StatusCode::FORBIDDEN,
                body: String::new(),
            })
        });

        let manager = manager(Arc::clone(&store), transport);
        let err = manager.ensure_valid_token().await.unwrap_err();
        match err {
            HelixError::TokenRequest { status } => assert_eq!(status, StatusCode::FORBIDDEN),
            other => panic!("expected TokenRequest, got {other:?}"),
        }
        assert!(store.get("twapi:tokenData").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn success_with_missing_fields_is_invalid() {
        let store = Arc::new(MemoryTokenStore::new());
        let mut transport = MockTransport::new();
        transport
            .expect_dispatch()
            .times(1)
            .returning(|_, _, _, _, _, _| Ok(ok_response(r#"{"token_type":"bearer"}"#.into())));

        let manager = manager(Arc::clone(&store), transport);
        let err = manager.ensure_valid_token().await.unwrap_err();
        assert!(matches!(err, HelixError::InvalidTokenResponse(_)));
        assert!(store.get("twapi:tokenData").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn blank_credentials_fail_without_io() {
        let store = Arc::new(MemoryTokenStore::new());
        let manager = TokenManager::new(
            Arc::clone(&store) as Arc<dyn TokenStore>,
            Arc::new(MockTransport::new()),
            "  ",
            "secret",
        );
        let err = manager.ensure_valid_token().await.unwrap_err();
        assert!(matches!(err, HelixError::MissingCredentials("client id")));
    }

    #[tokio::test]
    async fn changed_credentials_invalidate_the_cache() {
        let store = Arc::new(MemoryTokenStore::new());
        seed_record(
            &store,
            &TokenRecord {
                client_id: "abc".into(),
                access_token: "tok".into(),
                expiration_date_ms: now_ms() + 100_000,
            },
        )
        .await;

        let manager = manager(Arc::clone(&store), MockTransport::new());
        manager.set_credentials("other", "secret").await.unwrap();
        assert!(store.get("twapi:tokenData").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn unchanged_credentials_are_a_noop() {
        let store = Arc::new(MemoryTokenStore::new());
        seed_record(
            &store,
            &TokenRecord {
                client_id: "abc".into(),
                access_token: "tok".into(),
                expiration_date_ms: now_ms() + 100_000,
            },
        )
        .await;

        let manager = manager(Arc::clone(&store), MockTransport::new());
        manager.set_credentials("abc", "secret").await.unwrap();
        assert!(store.get("twapi:tokenData").await.unwrap().is_some());

        // The kept record still satisfies the next call without I/O.
        let auth = manager.ensure_valid_token().await.unwrap();
        assert_eq!(auth.token, "tok");
    }

    #[tokio::test]
    async fn validate_credentials_never_touches_the_cache() {
        let store = Arc::new(MemoryTokenStore::new());
        let mut transport = MockTransport::new();
        transport
            .expect_dispatch()
            .times(1)
            .returning(|_, _, _, _, _, _| Ok(ok_response(token_body("probe", 3600))));

        let manager = manager(Arc::clone(&store), transport);
        assert!(manager.validate_credentials().await);
        assert!(store.get("twapi:tokenData").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn validate_credentials_swallows_failures() {
        let store = Arc::new(MemoryTokenStore::new());
        let mut transport = MockTransport::new();
        transport.expect_dispatch().times(1).returning(|_, _, _, _, _, _| {
            Ok(RawResponse {
                status: StatusCode::UNAUTHORIZED,
                body: String::new(),
            })
        });

        let manager = manager(Arc::clone(&store), transport);
        assert!(!manager.validate_credentials().await);
    }

    #[tokio::test]
    async fn concurrent_cold_cache_calls_share_one_exchange() {
        let store = Arc::new(MemoryTokenStore::new());
        let mut transport = MockTransport::new();
        transport
            .expect_dispatch()
            .times(1)
            .returning(|_, _, _, _, _, _| Ok(ok_response(token_body("fresh", 3600))));

        let manager = Arc::new(manager(Arc::clone(&store), transport));
        let (a, b) = tokio::join!(manager.ensure_valid_token(), manager.ensure_valid_token());
        assert_eq!(a.unwrap().token, "fresh");
        assert_eq!(b.unwrap().token, "fresh");
    }
}
