//! # Runtime and site configuration.
//!
//! [`Config`] centralizes the tunables of the runtime (poll cadences, crossing budget,
//! proximity thresholds). [`SiteConfig`] describes one site: its shared spaces and
//! optional per-site overrides, loaded from JSON.
//!
//! ## Sentinel values
//! - `exit_poll = None` → exit detection runs at the request-poll cadence
//! - `tick_timeout = 0s` → overrunning ticks are not reported
//!
//! ## Example
//! ```
//! use spacevisor::{Config, SiteConfig};
//!
//! let site = SiteConfig::from_json(r#"{
//!     "site": "dc-east",
//!     "spaces": [{ "id": "fire-door-3", "ownerFleet": "amr" }],
//!     "crossingBudgetMs": 45000
//! }"#).unwrap();
//!
//! let cfg = site.apply(Config::default());
//! assert_eq!(cfg.crossing_budget.as_secs(), 45);
//! ```

use std::collections::HashSet;
use std::time::Duration;

use serde::Deserialize;

use crate::error::ConfigError;
use crate::geometry::APPROACH_THRESHOLD_M;
use crate::model::SharedSpace;
use crate::policies::JitterPolicy;

/// Default slack around the recorded entry point before a lock holder counts as gone.
///
/// Independent from [`APPROACH_THRESHOLD_M`] even though both default to 2.
pub const REENTRY_RADIUS: f64 = 2.0;

/// Global configuration for the arbitration runtime.
///
/// ## Field semantics
/// - `arbiter_period`: cadence of the arbiter's site-wide tick
/// - `request_poll`: cadence of each adapter's request-detection tick
/// - `exit_poll`: cadence of each adapter's exit-detection tick (`None` = `request_poll`)
/// - `crossing_budget`: time a lock holder gets before a timeout is reported
/// - `request_ttl`: lifetime of pending requests and (refreshed on grant) of locks
/// - `approach_threshold`: proximity (m) that turns a waiting robot into a requester
/// - `reentry_radius`: distance from the entry point still treated as "entering"
/// - `vendor_timeout`: network timeout applied to every vendor call
/// - `tick_timeout`: overrun report per tick; the tick still completes (`0s` = none)
/// - `bus_capacity`: event bus ring buffer size (min 1)
/// - `start_jitter`: phase randomization of each ticker's first tick
#[derive(Clone, Debug)]
pub struct Config {
    pub arbiter_period: Duration,
    pub request_poll: Duration,
    pub exit_poll: Option<Duration>,
    pub crossing_budget: Duration,
    pub request_ttl: Duration,
    pub approach_threshold: f64,
    pub reentry_radius: f64,
    pub vendor_timeout: Duration,
    pub tick_timeout: Duration,
    pub bus_capacity: usize,
    pub start_jitter: JitterPolicy,
}

impl Config {
    /// Cadence of the exit-detection tick.
    #[inline]
    pub fn exit_poll_or_default(&self) -> Duration {
        self.exit_poll.unwrap_or(self.request_poll)
    }

    /// Per-tick timeout as an `Option` (`None` = no timeout).
    #[inline]
    pub fn tick_timeout(&self) -> Option<Duration> {
        if self.tick_timeout == Duration::ZERO {
            None
        } else {
            Some(self.tick_timeout)
        }
    }

    /// Bus capacity clamped to a minimum of 1.
    #[inline]
    pub fn bus_capacity_clamped(&self) -> usize {
        self.bus_capacity.max(1)
    }
}

impl Default for Config {
    /// - 1s arbiter/request/exit cadence
    /// - 120s crossing budget, 1 day request TTL
    /// - 2.0 approach threshold, 2.0 re-entry radius
    /// - 5s vendor timeout, no tick timeout, no jitter
    fn default() -> Self {
        Self {
            arbiter_period: Duration::from_secs(1),
            request_poll: Duration::from_secs(1),
            exit_poll: None,
            crossing_budget: Duration::from_secs(120),
            request_ttl: Duration::from_secs(24 * 60 * 60),
            approach_threshold: APPROACH_THRESHOLD_M,
            reentry_radius: REENTRY_RADIUS,
            vendor_timeout: Duration::from_secs(5),
            tick_timeout: Duration::ZERO,
            bus_capacity: 1024,
            start_jitter: JitterPolicy::None,
        }
    }
}

/// One shared space as declared in site configuration.
#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SpaceConfig {
    pub id: String,
    pub owner_fleet: String,
}

/// Site description: the spaces arbitrated by one arbiter plus optional overrides.
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SiteConfig {
    pub site: String,
    pub spaces: Vec<SpaceConfig>,
    #[serde(default)]
    pub arbiter_period_ms: Option<u64>,
    #[serde(default)]
    pub request_poll_ms: Option<u64>,
    #[serde(default)]
    pub exit_poll_ms: Option<u64>,
    #[serde(default)]
    pub crossing_budget_ms: Option<u64>,
    #[serde(default)]
    pub request_ttl_secs: Option<u64>,
    #[serde(default)]
    pub approach_threshold_m: Option<f64>,
    #[serde(default)]
    pub reentry_radius: Option<f64>,
    #[serde(default)]
    pub vendor_timeout_ms: Option<u64>,
}

impl SiteConfig {
    /// A site with the given spaces and no overrides.
    pub fn new(site: impl Into<String>, spaces: Vec<SpaceConfig>) -> Self {
        Self {
            site: site.into(),
            spaces,
            arbiter_period_ms: None,
            request_poll_ms: None,
            exit_poll_ms: None,
            crossing_budget_ms: None,
            request_ttl_secs: None,
            approach_threshold_m: None,
            reentry_radius: None,
            vendor_timeout_ms: None,
        }
    }

    /// Parses and validates a JSON site document.
    pub fn from_json(raw: &str) -> Result<Self, ConfigError> {
        let cfg: SiteConfig =
            serde_json::from_str(raw).map_err(|e| ConfigError::Parse(e.to_string()))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Checks the constraints serde cannot express.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.site.trim().is_empty() {
            return Err(ConfigError::Invalid("site name is empty".into()));
        }
        let mut seen = HashSet::new();
        for space in &self.spaces {
            if space.id.trim().is_empty() {
                return Err(ConfigError::Invalid("space id is empty".into()));
            }
            if space.owner_fleet.trim().is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "space '{}' has no owner fleet",
                    space.id
                )));
            }
            if !seen.insert(space.id.as_str()) {
                return Err(ConfigError::Invalid(format!(
                    "space '{}' declared twice",
                    space.id
                )));
            }
        }
        for (name, value) in [
            ("approachThresholdM", self.approach_threshold_m),
            ("reentryRadius", self.reentry_radius),
        ] {
            if value.is_some_and(|v| !v.is_finite() || v < 0.0) {
                return Err(ConfigError::Invalid(format!("{name} must be >= 0")));
            }
        }
        Ok(())
    }

    /// Layers the site overrides on top of `base`.
    pub fn apply(&self, mut base: Config) -> Config {
        if let Some(ms) = self.arbiter_period_ms {
            base.arbiter_period = Duration::from_millis(ms.max(1));
        }
        if let Some(ms) = self.request_poll_ms {
            base.request_poll = Duration::from_millis(ms.max(1));
        }
        if let Some(ms) = self.exit_poll_ms {
            base.exit_poll = Some(Duration::from_millis(ms.max(1)));
        }
        if let Some(ms) = self.crossing_budget_ms {
            base.crossing_budget = Duration::from_millis(ms);
        }
        if let Some(secs) = self.request_ttl_secs {
            base.request_ttl = Duration::from_secs(secs);
        }
        if let Some(m) = self.approach_threshold_m {
            base.approach_threshold = m;
        }
        if let Some(r) = self.reentry_radius {
            base.reentry_radius = r;
        }
        if let Some(ms) = self.vendor_timeout_ms {
            base.vendor_timeout = Duration::from_millis(ms);
        }
        base
    }

    /// Spaces as arbiter-side model objects (no geometry).
    pub fn shared_spaces(&self) -> Vec<SharedSpace> {
        self.spaces
            .iter()
            .map(|s| SharedSpace::new(&s.id, &s.owner_fleet))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_keep_thresholds_independent() {
        let cfg = Config::default();
        assert_eq!(cfg.approach_threshold, 2.0);
        assert_eq!(cfg.reentry_radius, 2.0);
        assert_eq!(cfg.exit_poll_or_default(), cfg.request_poll);
        assert!(cfg.tick_timeout().is_none());
        assert_eq!(cfg.request_ttl, Duration::from_secs(86_400));
    }

    #[test]
    fn overrides_apply_over_defaults() {
        let site = SiteConfig::from_json(
            r#"{
                "site": "dc-east",
                "spaces": [
                    { "id": "door-1", "ownerFleet": "amr" },
                    { "id": "aisle-9", "ownerFleet": "forklifts" }
                ],
                "exitPollMs": 250,
                "reentryRadius": 0.5
            }"#,
        )
        .unwrap();
        let cfg = site.apply(Config::default());
        assert_eq!(cfg.exit_poll_or_default(), Duration::from_millis(250));
        assert_eq!(cfg.reentry_radius, 0.5);
        assert_eq!(cfg.approach_threshold, 2.0);

        let spaces = site.shared_spaces();
        assert_eq!(spaces.len(), 2);
        assert_eq!(spaces[1].owner_fleet_id, "forklifts");
        assert!(!spaces[0].is_configured());
    }

    #[test]
    fn duplicate_spaces_are_rejected() {
        let err = SiteConfig::from_json(
            r#"{ "site": "x", "spaces": [
                { "id": "d", "ownerFleet": "a" },
                { "id": "d", "ownerFleet": "b" }
            ] }"#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn malformed_json_is_a_parse_error() {
        let err = SiteConfig::from_json("{ not json").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn negative_radius_is_rejected() {
        let mut site = SiteConfig::new("s", vec![]);
        site.reentry_radius = Some(-1.0);
        assert!(site.validate().is_err());
    }
}
