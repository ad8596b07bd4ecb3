//! Session store — opaque cookie identifiers mapped to token bundles
//!
//! Sessions are created lazily: any request without a recognized identifier
//! gets a fresh 128-bit random id and an empty entry. Entries are only
//! removed by [`SessionStore::invalidate`]; logout clears token fields but
//! keeps the identifier valid. There is no expiry and no size bound, so the
//! store grows with distinct visitors for the life of the process.

use dashmap::DashMap;
use rand::RngExt;

/// Name of the cookie carrying the session identifier
pub const SESSION_COOKIE: &str = "sessionId";

/// Per-visitor token bundle
#[derive(Debug, Clone, Default)]
pub struct Session {
    /// Access token from the code exchange
    pub access_token: Option<String>,
    /// Refresh token from the code exchange (never used to refresh; kept
    /// for parity with the token endpoint response)
    pub refresh_token: Option<String>,
    /// OIDC ID token from the code exchange
    pub id_token: Option<String>,
}

impl Session {
    /// A session counts as authenticated only when an access token is
    /// present, regardless of the ID token.
    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.access_token.is_some()
    }
}

/// Process-wide mapping from session id to [`Session`], shared by all
/// requests.
#[derive(Debug, Default)]
pub struct SessionStore {
    inner: DashMap<String, Session>,
}

impl SessionStore {
    /// Create an empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve a session id, creating a new empty session when the id is
    /// absent or unknown. Returns the id and whether it was freshly created
    /// so the caller can issue a cookie.
    pub fn resolve(&self, session_id: Option<&str>) -> (String, bool) {
        if let Some(id) = session_id {
            if self.inner.contains_key(id) {
                return (id.to_string(), false);
            }
        }

        let id = new_session_id();
        self.inner.insert(id.clone(), Session::default());
        (id, true)
    }

    /// Snapshot of the session for `id`, if it exists
    #[must_use]
    pub fn get(&self, id: &str) -> Option<Session> {
        self.inner.get(id).map(|entry| entry.clone())
    }

    /// Mutate the session for `id` through the store. Returns `false` when
    /// the id is unknown.
    pub fn with_session<F>(&self, id: &str, f: F) -> bool
    where
        F: FnOnce(&mut Session),
    {
        match self.inner.get_mut(id) {
            Some(mut entry) => {
                f(&mut entry);
                true
            }
            None => false,
        }
    }

    /// Logout semantics: remove all token fields but keep the entry, so the
    /// identifier (and its cookie) stays valid.
    pub fn clear_tokens(&self, id: &str) -> bool {
        self.with_session(id, |session| {
            session.access_token = None;
            session.refresh_token = None;
            session.id_token = None;
        })
    }

    /// Remove the mapping entirely
    pub fn invalidate(&self, id: &str) {
        self.inner.remove(id);
    }

    /// Number of live sessions
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    /// Whether the store holds no sessions
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

/// 128 bits of entropy, hex-encoded — collision probability is negligible.
fn new_session_id() -> String {
    let bytes: [u8; 16] = rand::rng().random();
    hex::encode(bytes)
}
