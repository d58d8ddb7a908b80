//! Per-IP request rate limiter for the `/api` routes.

use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use axum::extract::{ConnectInfo, Request, State};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use tracing::{debug, warn};

use crate::error::ApiError;
use crate::state::GatewayState;

const WINDOW: Duration = Duration::from_secs(60);

type Hits = Arc<Mutex<HashMap<IpAddr, Vec<Instant>>>>;

/// Sliding one-minute window per client IP.
pub struct RateLimiter {
    max_requests_per_minute: u32,
    hits: Hits,
}

fn lock(hits: &Hits) -> MutexGuard<'_, HashMap<IpAddr, Vec<Instant>>> {
    hits.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl RateLimiter {
    /// Create a limiter and spawn its background pruning task.
    pub fn new(max_requests_per_minute: u32) -> Self {
        let limiter = Self {
            max_requests_per_minute,
            hits: Arc::new(Mutex::new(HashMap::new())),
        };

        let hits = limiter.hits.clone();
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(WINDOW).await;
                let mut map = lock(&hits);
                let cutoff = Instant::now() - WINDOW;
                map.retain(|_, stamps| {
                    stamps.retain(|t| *t > cutoff);
                    !stamps.is_empty()
                });
                debug!(entries = map.len(), "Rate limiter cleanup");
            }
        });

        limiter
    }

    /// Record a request from `ip`. Returns false when over the limit.
    pub fn check(&self, ip: IpAddr) -> bool {
        let mut map = lock(&self.hits);
        let now = Instant::now();
        let cutoff = now - WINDOW;

        let stamps = map.entry(ip).or_default();
        stamps.retain(|t| *t > cutoff);

        if stamps.len() >= self.max_requests_per_minute as usize {
            warn!(%ip, count = stamps.len(), limit = self.max_requests_per_minute,
                "Rate limited: too many requests from IP");
            return false;
        }

        stamps.push(now);
        true
    }
}

/// Middleware rejecting over-limit clients with 429.
///
/// Requests without peer info (e.g. a router driven in-process) pass through.
pub async fn enforce(
    State(state): State<Arc<GatewayState>>,
    request: Request,
    next: Next,
) -> Response {
    if let Some(limiter) = &state.rate_limiter {
        let peer = request
            .extensions()
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| addr.ip());
        if let Some(ip) = peer {
            if !limiter.check(ip) {
                return ApiError::RateLimited.into_response();
            }
        }
    }
    next.run(request).await
}
