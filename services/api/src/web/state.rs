//! services/api/src/web/state.rs
//!
//! Defines the application's shared state.

use crate::adapters::TokenIssuer;
use crate::config::Config;
use pastebin_core::{BinRepository, StatsAggregator, UserRepository};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::{CancellationToken, DropGuard};

//=========================================================================================
// AppState (Shared Across All Requests)
//=========================================================================================

/// The shared application state, created once at startup and passed to all handlers.
#[derive(Clone)]
pub struct AppState {
    pub bins: BinRepository,
    pub users: UserRepository,
    pub stats: StatsAggregator,
    pub tokens: Arc<TokenIssuer>,
    pub config: Arc<Config>,
}

impl AppState {
    pub fn new(
        bins: BinRepository,
        users: UserRepository,
        tokens: TokenIssuer,
        config: Arc<Config>,
    ) -> Self {
        Self {
            stats: StatsAggregator::new(bins.clone()),
            bins,
            users,
            tokens: Arc::new(tokens),
            config,
        }
    }

    /// A cancellation token for one full-population scan.
    ///
    /// It fires when the configured scan timeout elapses or when the returned
    /// guard is dropped, which happens when the handler finishes or the client
    /// goes away.
    pub fn scan_deadline(&self) -> (CancellationToken, DropGuard) {
        deadline(self.config.scan_timeout)
    }
}

fn deadline(timeout: Duration) -> (CancellationToken, DropGuard) {
    let token = CancellationToken::new();
    let timer = token.clone();
    tokio::spawn(async move {
        tokio::select! {
            _ = tokio::time::sleep(timeout) => timer.cancel(),
            _ = timer.cancelled() => {}
        }
    });
    let guard = token.clone().drop_guard();
    (token, guard)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn deadline_fires_after_the_timeout() {
        let (token, _guard) = deadline(Duration::from_secs(5));
        tokio::time::sleep(Duration::from_secs(4)).await;
        assert!(!token.is_cancelled());
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert!(token.is_cancelled());
    }

    #[tokio::test]
    async fn dropping_the_guard_cancels() {
        let (token, guard) = deadline(Duration::from_secs(60));
        drop(guard);
        assert!(token.is_cancelled());
    }
}
