//! CircuitBreaker (spec §4.12): per-domain closed/open/half-open failure
//! tracker guarding Scout/Router fetches. State transitions are monotone
//! in time within a state (spec §8): closed→open requires the failure
//! threshold, half-open→closed requires the success threshold.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

use crate::config::CircuitConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

/// Per-domain record (spec §3 `CircuitRecord`): state, consecutive
/// failures, half-open successes, when it opened, and a bounded ring of
/// the last 10 failure reasons.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CircuitRecord {
    pub state: CircuitState,
    pub consecutive_failures: u32,
    pub half_open_successes: u32,
    pub opened_at: Option<DateTime<Utc>>,
    pub last_failure_at: Option<DateTime<Utc>>,
    pub last_failure_reasons: VecDeque<String>,
    /// Half-open allows exactly one in-flight probe at a time.
    half_open_probe_in_flight: bool,
}

impl Default for CircuitRecord {
    fn default() -> Self {
        Self {
            state: CircuitState::Closed,
            consecutive_failures: 0,
            half_open_successes: 0,
            opened_at: None,
            last_failure_at: None,
            last_failure_reasons: VecDeque::new(),
            half_open_probe_in_flight: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CheckResult {
    pub allowed: bool,
    pub state: CircuitState,
    /// Seconds remaining until an open circuit becomes eligible for a
    /// half-open probe; `0` once eligible or when not open.
    pub time_until_half_open: i64,
}

pub struct CircuitBreaker {
    config: CircuitConfig,
    domains: DashMap<String, CircuitRecord>,
}

impl CircuitBreaker {
    pub fn new(config: CircuitConfig) -> Self {
        Self {
            config,
            domains: DashMap::new(),
        }
    }

    /// Whether a request to `domain` may proceed right now. Transitions
    /// `open` → `half_open` as a side effect once the recovery window has
    /// elapsed, consuming the single half-open probe slot.
    pub fn check(&self, domain: &str) -> CheckResult {
        let mut record = self.domains.entry(domain.to_string()).or_default();

        if record.state == CircuitState::Open {
            let opened_at = record.opened_at.unwrap_or_else(Utc::now);
            let elapsed = Utc::now().signed_duration_since(opened_at).num_seconds();
            let recovery = self.config.recovery_seconds;
            if elapsed >= recovery {
                if !record.half_open_probe_in_flight {
                    record.state = CircuitState::HalfOpen;
                    record.half_open_probe_in_flight = true;
                    return CheckResult {
                        allowed: true,
                        state: CircuitState::HalfOpen,
                        time_until_half_open: 0,
                    };
                }
                return CheckResult {
                    allowed: false,
                    state: CircuitState::Open,
                    time_until_half_open: 0,
                };
            }
            return CheckResult {
                allowed: false,
                state: CircuitState::Open,
                time_until_half_open: recovery - elapsed,
            };
        }

        if record.state == CircuitState::HalfOpen {
            // Only the one in-flight probe is allowed through at a time.
            return CheckResult {
                allowed: !record.half_open_probe_in_flight,
                state: CircuitState::HalfOpen,
                time_until_half_open: 0,
            };
        }

        CheckResult {
            allowed: true,
            state: CircuitState::Closed,
            time_until_half_open: 0,
        }
    }

    pub fn record_success(&self, domain: &str) {
        let mut record = self.domains.entry(domain.to_string()).or_default();
        match record.state {
            CircuitState::Closed => {
                record.consecutive_failures = 0;
            }
            CircuitState::HalfOpen => {
                record.half_open_successes += 1;
                record.half_open_probe_in_flight = false;
                if record.half_open_successes >= self.config.half_open_success_threshold {
                    record.state = CircuitState::Closed;
                    record.consecutive_failures = 0;
                    record.half_open_successes = 0;
                    record.opened_at = None;
                }
            }
            CircuitState::Open => {}
        }
    }

    pub fn record_failure(&self, domain: &str, reason: impl Into<String>) {
        let mut record = self.domains.entry(domain.to_string()).or_default();
        record.last_failure_at = Some(Utc::now());
        record.last_failure_reasons.push_back(reason.into());
        if record.last_failure_reasons.len() > 10 {
            record.last_failure_reasons.pop_front();
        }

        match record.state {
            CircuitState::Closed => {
                record.consecutive_failures += 1;
                if record.consecutive_failures >= self.config.failure_threshold {
                    record.state = CircuitState::Open;
                    record.opened_at = Some(Utc::now());
                }
            }
            CircuitState::HalfOpen => {
                // Any half-open failure reopens and resets the timer.
                record.state = CircuitState::Open;
                record.opened_at = Some(Utc::now());
                record.half_open_successes = 0;
                record.half_open_probe_in_flight = false;
            }
            CircuitState::Open => {}
        }
    }

    pub fn blocked_domains(&self) -> Vec<(String, CircuitRecord)> {
        self.domains
            .iter()
            .filter(|entry| entry.state != CircuitState::Closed)
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect()
    }

    /// Domains with no failure/success activity in the last
    /// `cleanup_inactive_seconds` are eligible for removal (spec §4.12).
    pub fn cleanup_inactive(&self) {
        let now = Utc::now();
        self.domains.retain(|_, record| {
            let last_activity = record.last_failure_at.or(record.opened_at);
            match last_activity {
                Some(at) => {
                    now.signed_duration_since(at).num_seconds()
                        < self.config.cleanup_inactive_seconds
                }
                None => true,
            }
        });
    }
}
