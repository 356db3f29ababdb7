//! crates/pastebin_core/src/stats.rs
//!
//! Usage statistics, recomputed from the live bin population on every call.

use tokio_util::sync::CancellationToken;

use crate::bins::BinRepository;
use crate::domain::{BinClicks, Statistics};
use crate::ports::PortResult;

#[derive(Clone)]
pub struct StatsAggregator {
    bins: BinRepository,
}

impl StatsAggregator {
    pub fn new(bins: BinRepository) -> Self {
        Self { bins }
    }

    /// One full scan; fails with whatever error the scan fails with.
    pub async fn get_stats(&self, cancel: &CancellationToken) -> PortResult<Statistics> {
        let bins = self.bins.get_all_bins(cancel).await?;
        let clicks_by_bin: Vec<BinClicks> = bins
            .into_iter()
            .map(|bin| BinClicks {
                bin_id: bin.id,
                clicks: bin.clic,
            })
            .collect();

        Ok(Statistics {
            bin_count: clicks_by_bin.len(),
            clicks_by_bin,
        })
    }
}
