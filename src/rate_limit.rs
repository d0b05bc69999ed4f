use std::{
    net::SocketAddr,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
    time::{Duration, Instant},
};

use axum::{
    extract::{ConnectInfo, Request, State},
    middleware::Next,
    response::Response,
};
use dashmap::DashMap;
use tracing::warn;

use crate::{config::RateLimitConfig, error::ApiError, state::AppState};

const MAX_TRACKED_CLIENTS: usize = 10_000;
/// Idle clients are swept at most once per this many checks.
const PURGE_EVERY: usize = 1_000;

/// Sliding-window limiter keyed by client address. Process local.
#[derive(Clone)]
pub struct RateLimiter {
    requests: Arc<DashMap<String, Vec<Instant>>>,
    checks: Arc<AtomicUsize>,
    max_requests: usize,
    window: Duration,
    max_tracked: usize,
    purge_every: usize,
}

impl RateLimiter {
    pub fn new(max_requests: usize, window: Duration) -> Self {
        Self {
            requests: Arc::new(DashMap::new()),
            checks: Arc::new(AtomicUsize::new(0)),
            max_requests,
            window,
            max_tracked: MAX_TRACKED_CLIENTS,
            purge_every: PURGE_EVERY,
        }
    }

    /// Returns true if allowed, false if limited.
    pub fn check(&self, key: &str) -> bool {
        self.check_at(key, Instant::now())
    }

    fn check_at(&self, key: &str, now: Instant) -> bool {
        let n = self.checks.fetch_add(1, Ordering::Relaxed) + 1;
        if n % self.purge_every == 0 && self.requests.len() > self.max_tracked {
            self.purge_idle_at(now);
        }

        let mut entry = self.requests.entry(key.to_string()).or_default();
        entry.retain(|&t| now.duration_since(t) < self.window);
        if entry.len() >= self.max_requests {
            return false;
        }
        entry.push(now);
        true
    }

    /// Drops clients with no request inside the window.
    pub fn purge_idle(&self) {
        self.purge_idle_at(Instant::now());
    }

    fn purge_idle_at(&self, now: Instant) {
        self.requests.retain(|_, stamps| {
            stamps.retain(|&t| now.duration_since(t) < self.window);
            !stamps.is_empty()
        });
    }
}

impl From<&RateLimitConfig> for RateLimiter {
    fn from(cfg: &RateLimitConfig) -> Self {
        Self::new(cfg.max_requests, Duration::from_secs(cfg.window_secs))
    }
}

fn client_key(req: &Request) -> String {
    req.extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

pub async fn rate_limit(
    State(state): State<AppState>,
    req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let client = client_key(&req);
    if !state.limiter.check(&client) {
        warn!(%client, "rate limit exceeded");
        return Err(ApiError::TooManyRequests("too many requests".into()));
    }
    Ok(next.run(req).await)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allows_up_to_limit_inside_window() {
        let rl = RateLimiter::new(3, Duration::from_secs(30));
        for _ in 0..3 {
            assert!(rl.check("10.0.0.1"));
        }
        assert!(!rl.check("10.0.0.1"));
        assert!(rl.check("10.0.0.2"));
    }

    #[test]
    fn window_slides() {
        let rl = RateLimiter::new(2, Duration::from_secs(30));
        let start = Instant::now();
        assert!(rl.check_at("c", start));
        assert!(rl.check_at("c", start + Duration::from_secs(10)));
        assert!(!rl.check_at("c", start + Duration::from_secs(20)));
        // first request has left the window
        assert!(rl.check_at("c", start + Duration::from_secs(31)));
        assert!(!rl.check_at("c", start + Duration::from_secs(32)));
    }

    #[test]
    fn purge_drops_idle_clients() {
        let rl = RateLimiter::new(5, Duration::from_millis(1));
        rl.check("c");
        std::thread::sleep(Duration::from_millis(5));
        rl.purge_idle();
        assert!(rl.requests.is_empty());
    }

    #[test]
    fn oversized_table_is_swept_only_on_interval() {
        let rl = RateLimiter {
            max_tracked: 2,
            purge_every: 4,
            ..RateLimiter::new(5, Duration::from_secs(30))
        };
        let start = Instant::now();
        for client in ["a", "b", "c"] {
            assert!(rl.check_at(client, start));
        }
        assert_eq!(rl.requests.len(), 3);

        // fourth check sweeps the three idle clients before recording "d"
        let later = start + Duration::from_secs(60);
        assert!(rl.check_at("d", later));
        assert_eq!(rl.requests.len(), 1);

        // active clients over the cap are left alone between sweeps
        for client in ["e", "f", "g"] {
            assert!(rl.check_at(client, later));
        }
        assert_eq!(rl.requests.len(), 4);
        assert!(rl.check_at("h", later));
        assert_eq!(rl.requests.len(), 5);
    }
}
