use parking_lot::Mutex;
use std::time::{Duration, Instant};

#[derive(Debug, Clone)]
struct CachedToken {
    token: String,
    expires_at: Instant,
}

/// Single-slot bearer token cache.
///
/// `get_token` only ever returns a token while `now < expiry`; `set_token` swaps token and
/// expiry together under one lock.
#[derive(Debug, Default)]
pub struct TokenCache {
    slot: Mutex<Option<CachedToken>>,
}

impl TokenCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn get_token(&self) -> Option<String> {
        let guard = self.slot.lock();
        let entry = guard.as_ref()?;
        if Instant::now() >= entry.expires_at {
            return None;
        }
        Some(entry.token.clone())
    }

    pub fn set_token(&self, token: impl Into<String>, expires_in: Duration) {
        let entry = CachedToken {
            token: token.into(),
            expires_at: Instant::now() + expires_in,
        };
        *self.slot.lock() = Some(entry);
    }

    pub fn clear(&self) {
        *self.slot.lock() = None;
    }
}
