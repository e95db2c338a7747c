//! Qualifying-round resolution.
//!
//! Ergast has no "latest round with published qualifying" endpoint, so the
//! round is discovered by probing `current/{round}/qualifying.json` upward
//! from the round before the next race until a probe fails or comes back
//! without races. Runs once at startup.

use chrono::{DateTime, Utc};
use serde_json::Value;
use std::sync::Arc;

use crate::services::fetcher::{JsonFetcher, FETCH_TIMEOUT};
use crate::services::schedule::{find_next_race, race_entries};

/// Placeholder substituted with the round number in the URL template.
const ROUND_PLACEHOLDER: &str = "{round}";

/// Round used when nothing better can be determined.
pub const FALLBACK_ROUND: u32 = 1;

#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum ProbeError {
    #[error("no published qualifying found from round {start_round} to {max_round}")]
    Exhausted { start_round: u32, max_round: u32 },
}

/// How to probe for qualifying results.
#[derive(Debug, Clone)]
pub struct QualifyingProbe {
    /// URL containing `{round}`, e.g. `.../current/{round}/qualifying.json`.
    pub url_template: String,
    /// Highest round number probed (maximum plausible season length).
    pub max_round: u32,
}

impl QualifyingProbe {
    pub fn new(f1_api_base_url: &str, max_round: u32) -> Self {
        Self {
            url_template: format!("{}/current/{}/qualifying.json", f1_api_base_url, ROUND_PLACEHOLDER),
            max_round,
        }
    }

    pub fn url_for(&self, round: u32) -> String {
        self.url_template
            .replace(ROUND_PLACEHOLDER, &round.to_string())
    }
}

/// Round to start probing from: the round before the next race, or round 1
/// when there is no upcoming race (season over, empty or absent schedule).
pub fn start_round(schedule: Option<&Value>, now: DateTime<Utc>) -> u32 {
    match find_next_race(schedule, now) {
        Some(race) => race
            .round_number()
            .map(|round| round.saturating_sub(1))
            .unwrap_or(FALLBACK_ROUND)
            .max(FALLBACK_ROUND),
        None => FALLBACK_ROUND,
    }
}

/// Probe rounds `start_round..=max_round` and return the last one that
/// returned at least one race. Probing stops at the first failed fetch or
/// empty race list.
pub async fn probe_latest_round(
    fetcher: &dyn JsonFetcher,
    probe: &QualifyingProbe,
    start_round: u32,
) -> Result<u32, ProbeError> {
    let mut latest_valid = None;

    for round in start_round..=probe.max_round {
        let url = probe.url_for(round);
        match fetcher.fetch(&url, FETCH_TIMEOUT).await {
            Ok(payload) if !race_entries(&payload).is_empty() => {
                tracing::debug!("Qualifying data found for round {}", round);
                latest_valid = Some(round);
            }
            Ok(_) => {
                tracing::debug!("No qualifying data for round {}, stopping probe", round);
                break;
            }
            Err(e) => {
                tracing::warn!("Qualifying probe for round {} failed: {}", round, e);
                break;
            }
        }
    }

    latest_valid.ok_or(ProbeError::Exhausted {
        start_round,
        max_round: probe.max_round,
    })
}

/// Resolve the qualifying round to follow. Never fails: an exhausted probe
/// falls back to [`FALLBACK_ROUND`].
pub async fn resolve_qualifying_round(
    fetcher: Arc<dyn JsonFetcher>,
    probe: &QualifyingProbe,
    schedule: Option<&Value>,
    now: DateTime<Utc>,
) -> u32 {
    let start = start_round(schedule, now);
    match probe_latest_round(fetcher.as_ref(), probe, start).await {
        Ok(round) => {
            tracing::info!("Following qualifying results of round {}", round);
            round
        }
        Err(e) => {
            tracing::warn!("{}; falling back to round {}", e, FALLBACK_ROUND);
            FALLBACK_ROUND
        }
    }
}
