//! Sliding-window upload quota per client.
//!
//! Each client identifier (usually the remote IP) owns an ordered list of the
//! instants at which its uploads were admitted. Entries older than the window
//! are pruned before every check, so they never count toward the quota.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use std::time::{Duration, Instant};

/// Configuration for rate limiting.
#[derive(Debug, Clone, Copy)]
pub struct RateLimitConfig {
    /// Maximum admitted uploads in the time window.
    pub max_actions: u32,
    /// Time window for counting uploads.
    pub window: Duration,
}

impl RateLimitConfig {
    /// Create a new rate limit configuration.
    pub fn new(max_actions: u32, window_secs: u64) -> Self {
        Self {
            max_actions,
            window: Duration::from_secs(window_secs),
        }
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_actions: 100,
            window: Duration::from_secs(3600),
        }
    }
}

/// Result of a rate limit check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RateLimitResult {
    /// Upload is allowed and has been recorded.
    Allowed {
        /// Uploads left in the current window.
        remaining: u32,
    },
    /// Upload is denied due to rate limit.
    Denied {
        /// Time until the oldest upload leaves the window.
        retry_after: Duration,
    },
}

impl RateLimitResult {
    /// Check if the upload is allowed.
    pub fn is_allowed(&self) -> bool {
        matches!(self, RateLimitResult::Allowed { .. })
    }
}

/// Admitted upload instants for one client, oldest first.
#[derive(Debug, Default)]
struct ClientWindow {
    timestamps: VecDeque<Instant>,
}

impl ClientWindow {
    /// Drop timestamps that fell out of the window ending at `now`.
    fn prune(&mut self, now: Instant, window: Duration) {
        let Some(cutoff) = now.checked_sub(window) else {
            return;
        };
        while self.timestamps.front().is_some_and(|&t| t <= cutoff) {
            self.timestamps.pop_front();
        }
    }

    fn admit(&mut self, now: Instant, config: &RateLimitConfig) -> RateLimitResult {
        self.prune(now, config.window);

        if self.timestamps.len() >= config.max_actions as usize {
            let retry_after = self
                .timestamps
                .front()
                .map(|&oldest| (oldest + config.window).saturating_duration_since(now))
                .unwrap_or(Duration::ZERO);
            return RateLimitResult::Denied { retry_after };
        }

        self.timestamps.push_back(now);
        RateLimitResult::Allowed {
            remaining: config
                .max_actions
                .saturating_sub(self.timestamps.len() as u32),
        }
    }
}

fn lock(window: &Mutex<ClientWindow>) -> MutexGuard<'_, ClientWindow> {
    window.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Upload quota tracker.
///
/// Every client has its own lock, so concurrent uploads from one client are
/// serialized while different clients never wait on each other. The outer map
/// lock is only taken for writing when a client is first seen or when idle
/// clients are swept.
///
/// # Example
///
/// ```
/// use storehouse::rate_limit::{RateLimitConfig, UploadRateLimiter};
///
/// let limiter = UploadRateLimiter::new(RateLimitConfig::new(2, 3600));
///
/// assert!(limiter.admit("10.0.0.1").is_allowed());
/// assert!(limiter.admit("10.0.0.1").is_allowed());
/// assert!(!limiter.admit("10.0.0.1").is_allowed());
/// ```
#[derive(Debug)]
pub struct UploadRateLimiter {
    config: RateLimitConfig,
    clients: RwLock<HashMap<String, Arc<Mutex<ClientWindow>>>>,
}

impl UploadRateLimiter {
    /// Create a new rate limiter with the given configuration.
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            clients: RwLock::new(HashMap::new()),
        }
    }

    /// The configuration this limiter enforces.
    pub fn config(&self) -> RateLimitConfig {
        self.config
    }

    /// Check the quota for a client and record the upload when allowed.
    pub fn admit(&self, client_id: &str) -> RateLimitResult {
        self.admit_at(client_id, Instant::now())
    }

    /// Same as [`admit`](Self::admit) with an explicit current instant.
    pub fn admit_at(&self, client_id: &str, now: Instant) -> RateLimitResult {
        // The read guard stays alive while the client lock is held so a
        // concurrent sweep cannot detach the window being updated.
        {
            let clients = self.clients.read().unwrap_or_else(PoisonError::into_inner);
            if let Some(window) = clients.get(client_id) {
                return lock(window).admit(now, &self.config);
            }
        }

        let mut clients = self.clients.write().unwrap_or_else(PoisonError::into_inner);
        let window = clients
            .entry(client_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(ClientWindow::default())))
            .clone();
        let result = lock(&window).admit(now, &self.config);
        result
    }

    /// Number of uploads from a client still inside the window.
    pub fn recent_count(&self, client_id: &str) -> usize {
        self.recent_count_at(client_id, Instant::now())
    }

    /// Same as [`recent_count`](Self::recent_count) with an explicit current instant.
    pub fn recent_count_at(&self, client_id: &str, now: Instant) -> usize {
        let clients = self.clients.read().unwrap_or_else(PoisonError::into_inner);
        clients.get(client_id).map_or(0, |window| {
            let mut window = lock(window);
            window.prune(now, self.config.window);
            window.timestamps.len()
        })
    }

    /// Get the number of remaining uploads for a client.
    pub fn remaining(&self, client_id: &str) -> u32 {
        self.config
            .max_actions
            .saturating_sub(self.recent_count(client_id) as u32)
    }

    /// Number of client identifiers currently tracked.
    pub fn tracked_clients(&self) -> usize {
        self.clients
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Forget all recorded uploads.
    pub fn reset(&self) {
        self.clients
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    /// Forget the recorded uploads of one client.
    pub fn reset_client(&self, client_id: &str) {
        self.clients
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(client_id);
    }

    /// Prune every client and drop those with no uploads left in the window.
    ///
    /// Returns the number of clients removed.
    pub fn cleanup(&self) -> usize {
        self.cleanup_at(Instant::now())
    }

    /// Same as [`cleanup`](Self::cleanup) with an explicit current instant.
    pub fn cleanup_at(&self, now: Instant) -> usize {
        let mut clients = self.clients.write().unwrap_or_else(PoisonError::into_inner);
        let before = clients.len();
        clients.retain(|_, window| {
            let mut window = lock(window);
            window.prune(now, self.config.window);
            !window.timestamps.is_empty()
        });
        before - clients.len()
    }

    /// Start a background task that sweeps idle clients periodically.
    pub fn start_cleanup_task(self: Arc<Self>, interval: Duration) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            // Skip the first immediate tick
            ticker.tick().await;

            loop {
                ticker.tick().await;
                let removed = self.cleanup();
                if removed > 0 {
                    tracing::debug!(removed, "Swept idle rate limit entries");
                }
            }
        })
    }
}

impl Default for UploadRateLimiter {
    fn default() -> Self {
        Self::new(RateLimitConfig::default())
    }
}
