use bytes::Bytes;
use std::time::{Duration, Instant};

/// A buffered HTTP response held by the cache.
#[derive(Clone, Debug)]
pub struct CachedPage {
    pub status: u16,
    pub content_type: Option<String>,
    pub body: Bytes,
    pub inserted_at: Instant,
}

impl CachedPage {
    /// Capture a response, stamping it with the current time.
    pub fn new(status: u16, content_type: Option<String>, body: Bytes) -> Self {
        Self {
            status,
            content_type,
            body,
            inserted_at: Instant::now(),
        }
    }

    /// Whether `ttl` has fully elapsed since insertion, as seen at `now`.
    #[inline]
    pub fn is_expired_at(&self, ttl: Duration, now: Instant) -> bool {
        now.saturating_duration_since(self.inserted_at) >= ttl
    }

    pub fn is_expired(&self, ttl: Duration) -> bool {
        self.is_expired_at(ttl, Instant::now())
    }

    /// Instant after which this entry must no longer be served.
    pub fn expires_at(&self, ttl: Duration) -> Instant {
        self.inserted_at + ttl
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_entry_is_live() {
        let page = CachedPage::new(200, None, Bytes::from_static(b"{}"));
        assert!(!page.is_expired(Duration::from_secs(60)));
    }

    #[test]
    fn expires_exactly_at_ttl_boundary() {
        let page = CachedPage::new(200, None, Bytes::new());
        let ttl = Duration::from_secs(60);
        let deadline = page.expires_at(ttl);

        assert!(!page.is_expired_at(ttl, deadline - Duration::from_millis(1)));
        assert!(page.is_expired_at(ttl, deadline));
    }

    #[test]
    fn clock_before_insertion_counts_as_live() {
        let page = CachedPage::new(200, None, Bytes::new());
        let earlier = page.inserted_at - Duration::from_secs(5);
        assert!(!page.is_expired_at(Duration::from_secs(1), earlier));
    }
}
