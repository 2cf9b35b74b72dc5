//! Resource governance: per-domain rate limiting, global concurrency
//! caps, and the blind-domain circuit breaker.
//!
//! Rate limiting is keyed on `(eTLD+1, profile)` so sibling subdomains of
//! one publisher share a budget. The circuit breaker counts consecutive
//! extractions that produced zero usable content for a domain; once open,
//! requests fail fast until a cooldown elapses and a single probe is let
//! through.

use std::collections::HashMap;
use std::num::NonZeroU32;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use nonzero_ext::nonzero;
use tokio::sync::Semaphore;

use crate::error::ScrapeError;
use crate::http::RequestProfile;

type DirectLimiter = DefaultDirectRateLimiter;

const DEFAULT_COOLDOWN: Duration = Duration::from_secs(600);
const MAX_CONCURRENCY_PER_PROFILE: usize = 20;

/// Per-profile requests-per-second budgets for one eTLD+1.
#[derive(Debug, Clone, Copy)]
pub struct RateConfig {
    pub html_rps: f64,
    pub api_rps: f64,
    pub rss_rps: f64,
    /// Consecutive empty extractions before a domain's circuit opens.
    pub circuit_threshold: u32,
}

impl Default for RateConfig {
    fn default() -> Self {
        Self {
            html_rps: 1.5,
            api_rps: 3.0,
            rss_rps: 2.0,
            circuit_threshold: 8,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

#[derive(Debug)]
struct DomainCircuit {
    state: CircuitState,
    consecutive_failures: u32,
    opened_at: Option<Instant>,
    probe_in_flight: bool,
}

impl DomainCircuit {
    fn new() -> Self {
        Self {
            state: CircuitState::Closed,
            consecutive_failures: 0,
            opened_at: None,
            probe_in_flight: false,
        }
    }
}

/// Process-wide request governor shared by all providers and runs.
pub struct RateGovernor {
    config: RateConfig,
    cooldown: Duration,
    limiters: Mutex<HashMap<(RequestProfile, String), Arc<DirectLimiter>>>,
    html_permits: Arc<Semaphore>,
    api_permits: Arc<Semaphore>,
    rss_permits: Arc<Semaphore>,
    circuits: Mutex<HashMap<String, DomainCircuit>>,
}

impl RateGovernor {
    #[must_use]
    pub fn new(config: RateConfig) -> Self {
        Self::with_cooldown(config, DEFAULT_COOLDOWN)
    }

    /// Constructor with an explicit breaker cooldown, for tests.
    #[must_use]
    pub fn with_cooldown(config: RateConfig, cooldown: Duration) -> Self {
        Self {
            config,
            cooldown,
            limiters: Mutex::new(HashMap::new()),
            html_permits: Arc::new(Semaphore::new(MAX_CONCURRENCY_PER_PROFILE)),
            api_permits: Arc::new(Semaphore::new(MAX_CONCURRENCY_PER_PROFILE)),
            rss_permits: Arc::new(Semaphore::new(MAX_CONCURRENCY_PER_PROFILE)),
            circuits: Mutex::new(HashMap::new()),
        }
    }

    fn profile_rps(&self, profile: RequestProfile) -> f64 {
        let rps = match profile {
            RequestProfile::Html => self.config.html_rps,
            RequestProfile::Api => self.config.api_rps,
            RequestProfile::Rss => self.config.rss_rps,
        };
        rps.max(0.01)
    }

    fn limiter(&self, profile: RequestProfile, etld1: &str) -> Arc<DirectLimiter> {
        let key = (profile, etld1.to_string());
        let mut limiters = self.limiters.lock().expect("limiter registry poisoned");
        Arc::clone(limiters.entry(key).or_insert_with(|| {
            // One token per 1/rps seconds; burst of one keeps the
            // steady-state rate within 10% of the configured rps.
            let period = Duration::from_secs_f64(1.0 / self.profile_rps(profile));
            let quota = Quota::with_period(period)
                .unwrap_or_else(|| Quota::per_second(nonzero!(1u32)))
                .allow_burst(NonZeroU32::new(1).expect("1 is non-zero"));
            Arc::new(RateLimiter::direct(quota))
        }))
    }

    /// Wait for a rate token for `(profile, etld1)`.
    ///
    /// Suspends the caller until the bucket has capacity. Cancellation
    /// propagates naturally: dropping the future releases nothing because
    /// the token is only consumed on completion.
    pub async fn throttle(&self, profile: RequestProfile, etld1: &str) {
        let limiter = self.limiter(profile, etld1);
        limiter.until_ready().await;
    }

    /// The global in-flight permit pool for a profile.
    #[must_use]
    pub fn permits(&self, profile: RequestProfile) -> Arc<Semaphore> {
        match profile {
            RequestProfile::Html => Arc::clone(&self.html_permits),
            RequestProfile::Api => Arc::clone(&self.api_permits),
            RequestProfile::Rss => Arc::clone(&self.rss_permits),
        }
    }

    // -----------------------------------------------------------------
    // Circuit breaker
    // -----------------------------------------------------------------

    /// Check whether requests to `domain` may proceed.
    ///
    /// # Errors
    ///
    /// Returns [`ScrapeError::CircuitOpen`] while the domain's circuit is
    /// open (or half-open with a probe already in flight).
    pub fn check_circuit(&self, domain: &str) -> Result<(), ScrapeError> {
        let mut circuits = self.circuits.lock().expect("circuit registry poisoned");
        let circuit = circuits
            .entry(domain.to_string())
            .or_insert_with(DomainCircuit::new);

        match circuit.state {
            CircuitState::Closed => Ok(()),
            CircuitState::Open => {
                let elapsed = circuit
                    .opened_at
                    .map_or(Duration::ZERO, |at| at.elapsed());
                if elapsed >= self.cooldown {
                    circuit.state = CircuitState::HalfOpen;
                    circuit.probe_in_flight = true;
                    tracing::info!(domain, "circuit half-open, allowing probe");
                    Ok(())
                } else {
                    Err(ScrapeError::CircuitOpen {
                        domain: domain.to_string(),
                    })
                }
            }
            CircuitState::HalfOpen => {
                if circuit.probe_in_flight {
                    Err(ScrapeError::CircuitOpen {
                        domain: domain.to_string(),
                    })
                } else {
                    circuit.probe_in_flight = true;
                    Ok(())
                }
            }
        }
    }

    /// Record a successful (non-empty) extraction for `domain`.
    pub fn record_success(&self, domain: &str) {
        let mut circuits = self.circuits.lock().expect("circuit registry poisoned");
        if let Some(circuit) = circuits.get_mut(domain) {
            if circuit.state != CircuitState::Closed {
                tracing::info!(domain, "circuit closed after successful probe");
            }
            circuit.state = CircuitState::Closed;
            circuit.consecutive_failures = 0;
            circuit.opened_at = None;
            circuit.probe_in_flight = false;
        }
    }

    /// Record an extraction that produced zero usable content for `domain`.
    pub fn record_failure(&self, domain: &str) {
        let mut circuits = self.circuits.lock().expect("circuit registry poisoned");
        let circuit = circuits
            .entry(domain.to_string())
            .or_insert_with(DomainCircuit::new);

        match circuit.state {
            CircuitState::HalfOpen => {
                circuit.state = CircuitState::Open;
                circuit.opened_at = Some(Instant::now());
                circuit.probe_in_flight = false;
                tracing::warn!(domain, "probe failed, circuit reopened");
            }
            CircuitState::Closed => {
                circuit.consecutive_failures += 1;
                if circuit.consecutive_failures >= self.config.circuit_threshold {
                    circuit.state = CircuitState::Open;
                    circuit.opened_at = Some(Instant::now());
                    tracing::warn!(
                        domain,
                        failures = circuit.consecutive_failures,
                        "circuit opened after consecutive empty extractions"
                    );
                }
            }
            CircuitState::Open => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn governor_with(threshold: u32, cooldown: Duration) -> RateGovernor {
        RateGovernor::with_cooldown(
            RateConfig {
                circuit_threshold: threshold,
                ..RateConfig::default()
            },
            cooldown,
        )
    }

    #[test]
    fn circuit_stays_closed_below_threshold() {
        let governor = governor_with(3, DEFAULT_COOLDOWN);
        governor.record_failure("example.com");
        governor.record_failure("example.com");
        assert!(governor.check_circuit("example.com").is_ok());
    }

    #[test]
    fn circuit_opens_at_threshold_and_fails_fast() {
        let governor = governor_with(3, DEFAULT_COOLDOWN);
        for _ in 0..3 {
            governor.record_failure("example.com");
        }
        let result = governor.check_circuit("example.com");
        assert!(
            matches!(result, Err(ScrapeError::CircuitOpen { ref domain }) if domain == "example.com"),
            "expected CircuitOpen, got: {result:?}"
        );
    }

    #[test]
    fn failures_are_tracked_per_domain() {
        let governor = governor_with(2, DEFAULT_COOLDOWN);
        governor.record_failure("a.com");
        governor.record_failure("a.com");
        assert!(governor.check_circuit("a.com").is_err());
        assert!(governor.check_circuit("b.com").is_ok());
    }

    #[test]
    fn success_resets_the_failure_count() {
        let governor = governor_with(2, DEFAULT_COOLDOWN);
        governor.record_failure("example.com");
        governor.record_success("example.com");
        governor.record_failure("example.com");
        assert!(governor.check_circuit("example.com").is_ok());
    }

    #[test]
    fn cooldown_allows_single_probe_then_blocks() {
        let governor = governor_with(1, Duration::ZERO);
        governor.record_failure("example.com");

        // Cooldown of zero: first check transitions to half-open and allows
        // one probe; the second check must fail fast while it is in flight.
        assert!(governor.check_circuit("example.com").is_ok());
        assert!(governor.check_circuit("example.com").is_err());
    }

    #[test]
    fn successful_probe_closes_failed_probe_reopens() {
        let governor = governor_with(1, Duration::ZERO);

        governor.record_failure("a.com");
        assert!(governor.check_circuit("a.com").is_ok());
        governor.record_success("a.com");
        assert!(governor.check_circuit("a.com").is_ok());

        governor.record_failure("b.com");
        assert!(governor.check_circuit("b.com").is_ok());
        governor.record_failure("b.com");
        // Reopened with zero cooldown: next check becomes the new probe.
        assert!(governor.check_circuit("b.com").is_ok());
        assert!(governor.check_circuit("b.com").is_err());
    }

    #[tokio::test]
    async fn throttle_spaces_requests_to_the_configured_rate() {
        let governor = RateGovernor::new(RateConfig {
            html_rps: 50.0,
            ..RateConfig::default()
        });

        let started = Instant::now();
        for _ in 0..5 {
            governor.throttle(RequestProfile::Html, "example.com").await;
        }
        // 5 tokens at 50 rps: the 4 waits after the initial token need
        // at least ~80ms minus scheduler slop.
        assert!(
            started.elapsed() >= Duration::from_millis(60),
            "5 acquisitions at 50rps completed too fast: {:?}",
            started.elapsed()
        );
    }

    #[tokio::test]
    async fn separate_domains_do_not_share_buckets() {
        let governor = RateGovernor::new(RateConfig {
            html_rps: 1.0,
            ..RateConfig::default()
        });

        let started = Instant::now();
        governor.throttle(RequestProfile::Html, "a.com").await;
        governor.throttle(RequestProfile::Html, "b.com").await;
        // Both first tokens are free; no cross-domain serialization.
        assert!(started.elapsed() < Duration::from_millis(500));
    }

    #[test]
    fn permits_are_per_profile() {
        let governor = RateGovernor::new(RateConfig::default());
        let html = governor.permits(RequestProfile::Html);
        let api = governor.permits(RequestProfile::Api);
        assert_eq!(html.available_permits(), MAX_CONCURRENCY_PER_PROFILE);
        assert!(!Arc::ptr_eq(&html, &api));
    }
}
