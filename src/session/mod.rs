//! Session: a single HTTP client bound to one fingerprint, one cookie jar,
//! and one token store, with a creation time used for staleness.
//!
//! Bootstrap is modeled explicitly as a state machine
//! (`Uninitialized -> Challenge -> Extract -> Ready`) rather than a chain of
//! conditionals, per the Design Notes: each state's handler returns the next
//! state, and the driving loop in [`bootstrap`] just keeps calling it until
//! `Ready` or a terminal error.

mod bootstrap;
mod token_store;

pub use bootstrap::bootstrap;
pub use token_store::TokenStore;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use reqwest::Client;
use tokio::sync::RwLock;

use crate::constants::MAX_SESSION_AGE_SECS;
use crate::errors::{AppError, AppResult};
use crate::fingerprint::FingerprintBundle;

/// The bootstrap state machine's explicit states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Uninitialized,
    Challenge,
    Extract,
    Ready,
}

/// Mutable bootstrap fields, held independently of the request counter so
/// readers of `__req` never contend with a refresh in progress.
struct SessionInner {
    state: SessionState,
    fingerprint: FingerprintBundle,
    tokens: TokenStore,
    created_at: Instant,
    consecutive_refresh_failures: u32,
}

/// One collector's session: HTTP client, fingerprint, cookie jar (held
/// inside `client` via reqwest's cookie store), and token store.
///
/// Owned by exactly one collector, never shared, per the concurrency
/// model's "Session + token store" note.
pub struct Session {
    pub client: Client,
    base_url: String,
    inner: RwLock<SessionInner>,
    req_counter: AtomicU64,
    max_refresh_attempts: u32,
}

impl Session {
    pub(crate) fn new(
        client: Client,
        base_url: impl Into<String>,
        fingerprint: FingerprintBundle,
        max_refresh_attempts: u32,
    ) -> Self {
        Self {
            client,
            base_url: base_url.into(),
            inner: RwLock::new(SessionInner {
                state: SessionState::Uninitialized,
                fingerprint,
                tokens: TokenStore::default(),
                created_at: Instant::now(),
                consecutive_refresh_failures: 0,
            }),
            req_counter: AtomicU64::new(0),
            max_refresh_attempts,
        }
    }

    /// Origin every bootstrap and GraphQL request is issued against.
    /// Overridable (see [`crate::config::CollectorConfig::base_url`]) so
    /// tests can point a session at a mock server.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub async fn is_ready(&self) -> bool {
        self.inner.read().await.state == SessionState::Ready
    }

    pub async fn is_stale(&self) -> bool {
        self.inner.read().await.created_at.elapsed() > Duration::from_secs(MAX_SESSION_AGE_SECS)
    }

    pub async fn tokens(&self) -> TokenStore {
        self.inner.read().await.tokens.clone()
    }

    pub async fn fingerprint(&self) -> FingerprintBundle {
        self.inner.read().await.fingerprint.clone()
    }

    /// Base-36 rendering of the next monotonically increasing `__req`
    /// counter value.
    pub fn next_req(&self) -> String {
        let value = self.req_counter.fetch_add(1, Ordering::SeqCst);
        to_base36(value)
    }

    pub(crate) async fn mark_ready(&self, tokens: TokenStore) {
        let mut inner = self.inner.write().await;
        inner.tokens = tokens;
        inner.state = SessionState::Ready;
        inner.created_at = Instant::now();
        inner.consecutive_refresh_failures = 0;
    }

    /// Record one failed refresh attempt. Returns `SessionExpired` once the
    /// configured cap is exceeded, at which point the session is
    /// permanently unusable.
    pub(crate) async fn record_refresh_failure(&self) -> AppResult<()> {
        let mut inner = self.inner.write().await;
        inner.consecutive_refresh_failures += 1;
        if inner.consecutive_refresh_failures > self.max_refresh_attempts {
            return Err(AppError::SessionExpired {
                consecutive_failures: inner.consecutive_refresh_failures,
            });
        }
        Ok(())
    }

    pub(crate) async fn set_state(&self, state: SessionState) {
        self.inner.write().await.state = state;
    }

    pub(crate) async fn state(&self) -> SessionState {
        self.inner.read().await.state
    }
}

fn to_base36(mut value: u64) -> String {
    const DIGITS: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";
    if value == 0 {
        return "0".to_string();
    }
    let mut buf = Vec::new();
    while value > 0 {
        buf.push(DIGITS[(value % 36) as usize]);
        value /= 36;
    }
    buf.reverse();
    String::from_utf8(buf).unwrap()
}

/// Shared handle to a session, cheaply cloneable across the pipeline and
/// collector.
pub type SharedSession = Arc<Session>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base36_rendering() {
        assert_eq!(to_base36(0), "0");
        assert_eq!(to_base36(35), "z");
        assert_eq!(to_base36(36), "10");
        assert_eq!(to_base36(71), "1z");
    }

    #[tokio::test]
    async fn fresh_session_is_uninitialized_and_not_ready() {
        let client = Client::new();
        let fingerprint = crate::fingerprint::BuiltinFingerprintSource::new();
        use crate::fingerprint::FingerprintSource;
        let bundle = fingerprint.next_bundle().await;
        let session = Session::new(client, "https://example.test", bundle, 3);
        assert!(!session.is_ready().await);
        assert_eq!(session.state().await, SessionState::Uninitialized);
    }

    #[tokio::test]
    async fn refresh_failures_past_cap_expire_the_session() {
        let client = Client::new();
        let fingerprint = crate::fingerprint::BuiltinFingerprintSource::new();
        use crate::fingerprint::FingerprintSource;
        let bundle = fingerprint.next_bundle().await;
        let session = Session::new(client, "https://example.test", bundle, 2);
        session.record_refresh_failure().await.unwrap();
        session.record_refresh_failure().await.unwrap();
        let result = session.record_refresh_failure().await;
        assert!(matches!(result, Err(AppError::SessionExpired { consecutive_failures: 3 })));
    }

    #[tokio::test]
    async fn req_counter_is_monotonic() {
        let client = Client::new();
        let fingerprint = crate::fingerprint::BuiltinFingerprintSource::new();
        use crate::fingerprint::FingerprintSource;
        let bundle = fingerprint.next_bundle().await;
        let session = Session::new(client, "https://example.test", bundle, 3);
        let a = session.next_req();
        let b = session.next_req();
        assert_ne!(a, b);
    }
}
