//! Discovery stage: fan a company search out across disjoint date slices of
//! the requested window, then merge, dedup and order the candidates.
//!
//! Google News caps results per query, so slicing the window multiplies the
//! total yield. A failed slice is absorbed with a warning; only a fully
//! failed fan-out escalates.

use std::collections::HashSet;

use anyhow::Result;
use chrono::NaiveDate;
use futures::future::join_all;
use tracing::{info, warn};

use gnews_client::GoogleNewsClient;
use newsgauge_common::{ArticleCandidate, TimeWindow};

/// Number of disjoint sub-windows each search fans out across.
const WINDOW_SLICES: u32 = 5;

/// Split `[start, end]` into `slices` disjoint sub-ranges: each slice starts
/// the day after the previous one ends, and the last slice absorbs any
/// remainder so the full range is always covered.
pub(crate) fn slice_window(
    start: NaiveDate,
    end: NaiveDate,
    slices: u32,
) -> Vec<(NaiveDate, NaiveDate)> {
    let total_days = (end - start).num_days().max(0);
    let slices = slices.max(1).min(total_days.max(1) as u32);
    let step = total_days / slices as i64;

    let mut out = Vec::with_capacity(slices as usize);
    for i in 0..slices as i64 {
        let slice_start = if i == 0 {
            start
        } else {
            start + chrono::Duration::days(i * step + 1)
        };
        let slice_end = if i == slices as i64 - 1 {
            end
        } else {
            start + chrono::Duration::days((i + 1) * step)
        };
        out.push((slice_start, slice_end));
    }
    out
}

pub struct NewsDiscovery {
    client: GoogleNewsClient,
}

impl NewsDiscovery {
    pub fn new(client: GoogleNewsClient) -> Self {
        Self { client }
    }

    /// Discover candidates for `company` over the trailing `window`,
    /// deduplicated by `(title, source_link)` and sorted by publish date.
    pub async fn discover(
        &self,
        company: &str,
        window: TimeWindow,
    ) -> Result<Vec<ArticleCandidate>> {
        let today = chrono::Utc::now().date_naive();
        let (start, end) = window.date_range(today);
        self.discover_range(company, start, end).await
    }

    pub async fn discover_range(
        &self,
        company: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<ArticleCandidate>> {
        let slices = slice_window(start, end, WINDOW_SLICES);
        info!(company, %start, %end, slices = slices.len(), "Discovering articles");

        let searches = slices
            .iter()
            .map(|(s, e)| self.client.search(company, *s, *e));
        let outcomes = join_all(searches).await;

        let mut merged = Vec::new();
        let mut errors = 0usize;
        for (slice, outcome) in slices.iter().zip(outcomes) {
            match outcome {
                Ok(articles) => merged.extend(articles),
                Err(e) => {
                    errors += 1;
                    warn!(start = %slice.0, end = %slice.1, error = %e, "Slice search failed");
                }
            }
        }

        // Every slice failing means the collaborator itself is down, which is
        // a stage-level condition rather than a thin result.
        if errors == slices.len() && errors > 0 {
            anyhow::bail!("all {errors} discovery slices failed");
        }

        let mut seen = HashSet::new();
        let mut candidates: Vec<ArticleCandidate> = merged
            .into_iter()
            .filter(|c| seen.insert((c.title.clone(), c.source_link.clone())))
            .collect();
        candidates.sort_by(|a, b| {
            a.published_date
                .cmp(&b.published_date)
                .then_with(|| a.title.cmp(&b.title))
        });

        info!(company, candidates = candidates.len(), "Discovery complete");
        Ok(candidates)
    }
}
