//! Decay laws for pheromone dynamics, and jittered backoff for effector
//! retries.
//!
//! This crate has two independent halves, grouped together because both are
//! "a number shrinks/grows over discrete steps according to a configured
//! law."
//!
//! - [`DecayLaw`]/[`decay_intensity`]/[`decay_inhibition`]: the exponential
//!   evaporation the decay engine (C4) applies once per tick (§4.2).
//! - [`BackoffStrategy`]/[`calculate_delay`]: bounded exponential backoff
//!   with jitter for the language-model effector's retry policy (§6.2).

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Decay law selectable at configuration time for task intensity (§4.2).
/// Inhibition always decays exponentially; only intensity has a choice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecayLaw {
    #[default]
    Exponential,
    Linear,
}

/// Apply one tick of decay to a task's intensity.
///
/// `rate` is ρ. Exponential: `intensity * e^(-rho)`. Linear: `max(0,
/// intensity - rho)`. The result is clamped into `[floor, ceiling]`
/// afterward by the caller (the intensity clamp is a store-level concern,
/// §6.1 `task_intensity_clamp`), not here.
pub fn decay_intensity(intensity: f64, law: DecayLaw, rate: f64) -> f64 {
    match law {
        DecayLaw::Exponential => intensity * (-rate).exp(),
        DecayLaw::Linear => (intensity - rate).max(0.0),
    }
}

/// Apply one tick of exponential decay to the inhibition field γ (§4.2).
pub fn decay_inhibition(inhibition: f64, k_gamma: f64) -> f64 {
    inhibition * (-k_gamma).exp()
}

/// Strategy for calculating effector retry delay (§6.2: "bounded exponential
/// backoff with jitter").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackoffStrategy {
    Immediate,
    #[default]
    Exponential,
    Linear,
    Constant,
}

/// Configuration for an effector's retry backoff.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackoffConfig {
    #[serde(default)]
    pub strategy: BackoffStrategy,
    #[serde(default = "default_base_delay")]
    #[serde(with = "humantime_serde")]
    pub base_delay: Duration,
    #[serde(default = "default_max_delay")]
    #[serde(with = "humantime_serde")]
    pub max_delay: Duration,
    #[serde(default = "default_jitter")]
    pub jitter: f64,
}

fn default_base_delay() -> Duration {
    Duration::from_secs(1)
}

fn default_max_delay() -> Duration {
    Duration::from_secs(60)
}

fn default_jitter() -> f64 {
    0.3
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            strategy: BackoffStrategy::Exponential,
            base_delay: default_base_delay(),
            max_delay: default_max_delay(),
            jitter: default_jitter(),
        }
    }
}

/// Calculate the delay before the next retry attempt (1-indexed).
pub fn calculate_delay(config: &BackoffConfig, attempt: u32) -> Duration {
    let delay = match config.strategy {
        BackoffStrategy::Immediate => Duration::ZERO,
        BackoffStrategy::Exponential => {
            let pow = attempt.saturating_sub(1).min(16);
            config.base_delay.saturating_mul(2_u32.saturating_pow(pow))
        }
        BackoffStrategy::Linear => config.base_delay.saturating_mul(attempt),
        BackoffStrategy::Constant => config.base_delay,
    };

    let capped = delay.min(config.max_delay);

    if config.jitter > 0.0 {
        apply_jitter(capped, config.jitter)
    } else {
        capped
    }
}

fn apply_jitter(delay: Duration, jitter: f64) -> Duration {
    use rand::Rng;

    let jitter_range = 2.0 * jitter;
    let mut rng = rand::thread_rng();
    let random_value: f64 = rng.gen();
    let random_factor = 1.0 - jitter + (random_value * jitter_range);
    let millis = (delay.as_millis() as f64 * random_factor).round().max(0.0) as u64;
    Duration::from_millis(millis)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exponential_decay_matches_closed_form() {
        let rho = 0.05;
        let mut intensity = 1.0;
        for _ in 0..10 {
            intensity = decay_intensity(intensity, DecayLaw::Exponential, rho);
        }
        let expected = 1.0 * (-rho * 10.0_f64).exp();
        assert!((intensity - expected).abs() < 1e-9);
    }

    #[test]
    fn linear_decay_floors_at_zero() {
        let result = decay_intensity(0.03, DecayLaw::Linear, 0.05);
        assert_eq!(result, 0.0);
    }

    #[test]
    fn linear_decay_subtracts_rate() {
        let result = decay_intensity(0.5, DecayLaw::Linear, 0.05);
        assert!((result - 0.45).abs() < 1e-9);
    }

    #[test]
    fn inhibition_decay_matches_closed_form() {
        let k_gamma = 0.08;
        let mut inhibition = 0.5;
        for _ in 0..20 {
            inhibition = decay_inhibition(inhibition, k_gamma);
        }
        let expected = 0.5 * (-k_gamma * 20.0_f64).exp();
        assert!((inhibition - expected).abs() < 1e-9);
        // k_gamma=0.08 should decay inhibition under 0.1 (the default
        // resume threshold) within ~20 ticks.
        assert!(inhibition < 0.1);
    }

    #[test]
    fn calculate_delay_exponential_doubles() {
        let config = BackoffConfig {
            strategy: BackoffStrategy::Exponential,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
            jitter: 0.0,
        };
        assert_eq!(calculate_delay(&config, 1), Duration::from_secs(1));
        assert_eq!(calculate_delay(&config, 2), Duration::from_secs(2));
        assert_eq!(calculate_delay(&config, 3), Duration::from_secs(4));
    }

    #[test]
    fn calculate_delay_caps_at_max() {
        let config = BackoffConfig {
            strategy: BackoffStrategy::Exponential,
            base_delay: Duration::from_secs(10),
            max_delay: Duration::from_secs(30),
            jitter: 0.0,
        };
        assert_eq!(calculate_delay(&config, 10), Duration::from_secs(30));
    }

    #[test]
    fn calculate_delay_immediate_is_zero() {
        let config = BackoffConfig {
            strategy: BackoffStrategy::Immediate,
            ..Default::default()
        };
        assert_eq!(calculate_delay(&config, 1), Duration::ZERO);
        assert_eq!(calculate_delay(&config, 5), Duration::ZERO);
    }

    #[test]
    fn jitter_stays_within_bounds() {
        let config = BackoffConfig {
            strategy: BackoffStrategy::Constant,
            base_delay: Duration::from_secs(10),
            max_delay: Duration::from_secs(60),
            jitter: 0.5,
        };
        for _ in 0..50 {
            let delay = calculate_delay(&config, 1);
            assert!(delay >= Duration::from_millis(5000));
            assert!(delay <= Duration::from_millis(15000));
        }
    }
}
