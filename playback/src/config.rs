//! Engine configuration.
//!
//! Defaults match the pacing of the original viewer (2 s stage delays,
//! 500 ms reveal ticks, 3 s then 5 s polling). Environment variables seed the
//! defaults; a TOML file can override any field.
//!
//! ```toml
//! [api]
//! base_url = "http://localhost:5002"
//!
//! [timings]
//! reveal_tick_ms = 300
//! seed = 7
//!
//! [polling]
//! budget_ms = 120000
//! ```

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{PlaybackError, PlaybackResult};
use crate::record::Candidate;

const DEFAULT_API_URL: &str = "http://localhost:5002";

/// Top-level engine configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct PlaybackConfig {
    pub api: ApiConfig,
    pub timings: PlaybackTimings,
    pub polling: PollPolicy,
}

/// Evaluation service endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    /// Base URL of the evaluation service (no trailing path).
    pub base_url: String,
    /// Upper bound for a single submit/fetch round trip.
    pub request_timeout_ms: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: std::env::var("EVALUATION_API_URL")
                .unwrap_or_else(|_| DEFAULT_API_URL.into()),
            request_timeout_ms: 10_000,
        }
    }
}

impl ApiConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

/// Pacing of the staged playback.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaybackTimings {
    /// Delay spent in `Parsing` before `Analyzing`.
    pub parsing_delay_ms: u64,
    /// Delay spent in `Analyzing` before the tree is revealed.
    pub analyzing_delay_ms: u64,
    /// Reveal tick at normal speed (+1 node per tick).
    pub reveal_tick_ms: u64,
    /// Reveal tick at fast-forward speed (+2 nodes per tick).
    pub fast_reveal_tick_ms: u64,
    /// Fraction of the tree shown at once when the record is already decided.
    pub fast_forward_fraction: f64,
    /// Simulated vote tick.
    pub vote_tick_ms: u64,
    /// How long simulated voting runs before a winner is declared.
    pub vote_duration_ms: u64,
    /// Probability that a simulated vote goes to candidate B.
    pub vote_bias_b: f64,
    /// Winner declared by simulated voting when the tally is tied.
    pub fallback_winner: Candidate,
    /// Seed for the simulated vote RNG; entropy when absent.
    pub seed: Option<u64>,
}

impl Default for PlaybackTimings {
    fn default() -> Self {
        Self {
            parsing_delay_ms: 2_000,
            analyzing_delay_ms: 2_000,
            reveal_tick_ms: 500,
            fast_reveal_tick_ms: 150,
            fast_forward_fraction: 0.7,
            vote_tick_ms: 200,
            vote_duration_ms: 3_000,
            vote_bias_b: 0.6,
            fallback_winner: Candidate::B,
            seed: None,
        }
    }
}

impl PlaybackTimings {
    pub fn parsing_delay(&self) -> Duration {
        Duration::from_millis(self.parsing_delay_ms)
    }

    pub fn analyzing_delay(&self) -> Duration {
        Duration::from_millis(self.analyzing_delay_ms)
    }

    pub fn reveal_tick(&self, fast: bool) -> Duration {
        if fast {
            Duration::from_millis(self.fast_reveal_tick_ms)
        } else {
            Duration::from_millis(self.reveal_tick_ms)
        }
    }

    pub fn vote_tick(&self) -> Duration {
        Duration::from_millis(self.vote_tick_ms)
    }

    pub fn vote_duration(&self) -> Duration {
        Duration::from_millis(self.vote_duration_ms)
    }
}

/// Two-tier polling policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PollPolicy {
    /// Interval used while inside the initial window.
    pub initial_interval_ms: u64,
    /// Length of the initial fast-polling window.
    pub initial_window_ms: u64,
    /// Interval used after the initial window.
    pub steady_interval_ms: u64,
    /// Wall-clock budget after which polling gives up.
    pub budget_ms: u64,
    /// Poll ticks are skipped while this many fetches are outstanding.
    pub max_in_flight: usize,
}

impl Default for PollPolicy {
    fn default() -> Self {
        let budget_ms = std::env::var("EVALUATION_POLL_BUDGET_SECS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .map(|secs| secs * 1_000)
            .unwrap_or(600_000);
        Self {
            initial_interval_ms: 3_000,
            initial_window_ms: 30_000,
            steady_interval_ms: 5_000,
            budget_ms,
            max_in_flight: 2,
        }
    }
}

impl PollPolicy {
    /// Interval to wait before the next poll, given time since polling began.
    pub fn interval_after(&self, elapsed: Duration) -> Duration {
        if elapsed < Duration::from_millis(self.initial_window_ms) {
            Duration::from_millis(self.initial_interval_ms)
        } else {
            Duration::from_millis(self.steady_interval_ms)
        }
    }

    pub fn budget(&self) -> Duration {
        Duration::from_millis(self.budget_ms)
    }
}

impl PlaybackConfig {
    /// Parse a TOML document, filling unspecified fields from defaults.
    pub fn from_toml_str(raw: &str) -> PlaybackResult<Self> {
        let config: Self = toml::from_str(raw)
            .map_err(|e| PlaybackError::config(format!("invalid TOML: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Load a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> PlaybackResult<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .map_err(|e| PlaybackError::config(format!("{}: {e}", path.display())))?;
        Self::from_toml_str(&raw)
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.api.base_url = base_url.into();
        self
    }

    /// Reject values that would stall or break playback.
    pub fn validate(&self) -> PlaybackResult<()> {
        reqwest::Url::parse(&self.api.base_url).map_err(|e| {
            PlaybackError::config(format!("base_url {:?}: {e}", self.api.base_url))
        })?;

        let t = &self.timings;
        if t.reveal_tick_ms == 0 || t.fast_reveal_tick_ms == 0 || t.vote_tick_ms == 0 {
            return Err(PlaybackError::config("tick intervals must be non-zero"));
        }
        if !(0.0..=1.0).contains(&t.fast_forward_fraction) {
            return Err(PlaybackError::config(
                "fast_forward_fraction must be within [0, 1]",
            ));
        }
        if !(0.0..=1.0).contains(&t.vote_bias_b) {
            return Err(PlaybackError::config("vote_bias_b must be within [0, 1]"));
        }

        let p = &self.polling;
        if p.initial_interval_ms == 0 || p.steady_interval_ms == 0 {
            return Err(PlaybackError::config("poll intervals must be non-zero"));
        }
        if p.max_in_flight == 0 {
            return Err(PlaybackError::config("max_in_flight must be at least 1"));
        }
        Ok(())
    }
}
