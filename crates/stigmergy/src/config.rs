//! Layered run configuration, loaded from TOML with code-level defaults.
//!
//! A nested struct per concern, each field carrying
//! `#[serde(default = "default_xxx")]` so a config file only needs to
//! mention what it's overriding.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use stigmergy_decay::DecayLaw;

/// Decay engine tuning (C4, §4.2).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecayConfig {
    #[serde(default)]
    pub law: DecayLaw,
    /// ρ: per-tick intensity decay rate.
    #[serde(default = "default_rho")]
    pub rho: f64,
    /// k_γ: per-tick inhibition decay rate.
    #[serde(default = "default_k_gamma")]
    pub k_gamma: f64,
    /// Intensity is clamped into `[floor, ceiling]` after every deposit and
    /// decay step (§6.1).
    #[serde(default = "default_intensity_floor")]
    pub intensity_floor: f64,
    #[serde(default = "default_intensity_ceiling")]
    pub intensity_ceiling: f64,
}

fn default_rho() -> f64 {
    0.05
}

fn default_k_gamma() -> f64 {
    0.08
}

fn default_intensity_floor() -> f64 {
    0.0
}

fn default_intensity_ceiling() -> f64 {
    1.0
}

impl Default for DecayConfig {
    fn default() -> Self {
        Self {
            law: DecayLaw::default(),
            rho: default_rho(),
            k_gamma: default_k_gamma(),
            intensity_floor: default_intensity_floor(),
            intensity_ceiling: default_intensity_ceiling(),
        }
    }
}

/// Guardrail tuning (C5, §4.3).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GuardrailConfig {
    /// Ticks a scope lock may be held before the orchestrator treats its
    /// owner as dead and releases it back to `pending`.
    #[serde(default = "default_scope_lock_ttl")]
    pub scope_lock_ttl: u64,
    /// Retries allowed before a file is routed to `skipped` instead of
    /// `retry` (the anti-loop ceiling).
    #[serde(default = "default_max_retry_count")]
    pub max_retry_count: u32,
    /// Confidence at or above which Validate may mark a file `validated`
    /// without escalation.
    #[serde(default = "default_confidence_high")]
    pub confidence_high: f64,
    /// Confidence at or below which Validate routes a file to
    /// `needs_review` instead of `retry`.
    #[serde(default = "default_confidence_low")]
    pub confidence_low: f64,
    /// Minimum task intensity a pending file must carry before Transform
    /// will claim it (§4.7b).
    #[serde(default = "default_intensity_min")]
    pub intensity_min: f64,
    /// Transform will not claim a file whose status inhibition is at or
    /// above this threshold — the anti-oscillation brake that blocks a
    /// repeatedly-failing file from being retried immediately (§4.7b).
    #[serde(default = "default_inhibition_threshold")]
    pub inhibition_threshold: f64,
}

fn default_scope_lock_ttl() -> u64 {
    3
}

fn default_max_retry_count() -> u32 {
    3
}

fn default_confidence_high() -> f64 {
    0.8
}

fn default_confidence_low() -> f64 {
    0.5
}

fn default_intensity_min() -> f64 {
    0.2
}

fn default_inhibition_threshold() -> f64 {
    0.1
}

impl Default for GuardrailConfig {
    fn default() -> Self {
        Self {
            scope_lock_ttl: default_scope_lock_ttl(),
            max_retry_count: default_max_retry_count(),
            confidence_high: default_confidence_high(),
            confidence_low: default_confidence_low(),
            intensity_min: default_intensity_min(),
            inhibition_threshold: default_inhibition_threshold(),
        }
    }
}

/// Resource ceilings (§4.3, §6.3).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BudgetConfig {
    #[serde(default = "default_max_tokens_total")]
    pub max_tokens_total: u64,
    /// `0.0` disables the monetary ceiling.
    #[serde(default = "default_max_budget_usd")]
    pub max_budget_usd: f64,
}

fn default_max_tokens_total() -> u64 {
    2_000_000
}

fn default_max_budget_usd() -> f64 {
    50.0
}

impl Default for BudgetConfig {
    fn default() -> Self {
        Self {
            max_tokens_total: default_max_tokens_total(),
            max_budget_usd: default_max_budget_usd(),
        }
    }
}

/// Stop conditions beyond budget exhaustion and all-terminal (§4.6 step 5).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StopConfig {
    #[serde(default = "default_max_ticks")]
    pub max_ticks: u64,
    /// Consecutive ticks with no role acting before the run is declared
    /// starved and stopped.
    #[serde(default = "default_max_idle_cycles")]
    pub max_idle_cycles: u64,
}

fn default_max_ticks() -> u64 {
    10_000
}

fn default_max_idle_cycles() -> u64 {
    25
}

impl Default for StopConfig {
    fn default() -> Self {
        Self {
            max_ticks: default_max_ticks(),
            max_idle_cycles: default_max_idle_cycles(),
        }
    }
}

/// The complete run configuration, layered: code defaults, then an
/// optional TOML file, then CLI overrides (applied by `stigmergy-cli`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Directory the pheromone store, audit log, and run artifacts persist
    /// under.
    #[serde(default = "default_state_dir")]
    pub state_dir: PathBuf,
    #[serde(default)]
    pub decay: DecayConfig,
    #[serde(default)]
    pub guardrails: GuardrailConfig,
    #[serde(default)]
    pub budgets: BudgetConfig,
    #[serde(default)]
    pub stop: StopConfig,
    #[serde(default = "default_model_id")]
    pub model_id: String,
    #[serde(default)]
    pub seed: u64,
}

fn default_state_dir() -> PathBuf {
    PathBuf::from(".stigmergy")
}

fn default_model_id() -> String {
    "unspecified".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            state_dir: default_state_dir(),
            decay: DecayConfig::default(),
            guardrails: GuardrailConfig::default(),
            budgets: BudgetConfig::default(),
            stop: StopConfig::default(),
            model_id: default_model_id(),
            seed: 0,
        }
    }
}

impl Config {
    /// Load a config layering a TOML file on top of defaults. Missing
    /// fields in the file fall back to the `#[serde(default = ...)]`
    /// values above.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("failed to read config {}: {e}", path.display()))?;
        let config: Config = toml::from_str(&text)
            .map_err(|e| anyhow::anyhow!("failed to parse config {}: {e}", path.display()))?;
        Ok(config)
    }

    /// A stable hash of the effective configuration, recorded in the run
    /// manifest so two runs can be compared for reproducibility (§3.5).
    pub fn config_hash(&self) -> String {
        use std::collections::hash_map::DefaultHasher;
        use std::hash::{Hash, Hasher};

        let json = serde_json::to_string(self).unwrap_or_default();
        let mut hasher = DefaultHasher::new();
        json.hash(&mut hasher);
        format!("{:016x}", hasher.finish())
    }

    /// Stable run identifier derived from the effective configuration, so
    /// the same config always resumes the same run's artifacts (§3.5,
    /// §6.4).
    pub fn run_id(&self) -> String {
        format!("run-{}", self.config_hash())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_matches_spec_defaults() {
        let config = Config::default();
        assert_eq!(config.guardrails.scope_lock_ttl, 3);
        assert_eq!(config.guardrails.max_retry_count, 3);
        assert_eq!(config.guardrails.confidence_high, 0.8);
        assert_eq!(config.guardrails.confidence_low, 0.5);
        assert_eq!(config.guardrails.intensity_min, 0.2);
        assert_eq!(config.guardrails.inhibition_threshold, 0.1);
    }

    #[test]
    fn partial_toml_falls_back_to_defaults() {
        let toml_text = r#"
            model_id = "gpt-test"

            [guardrails]
            max_retry_count = 5
        "#;
        let config: Config = toml::from_str(toml_text).expect("parse");
        assert_eq!(config.model_id, "gpt-test");
        assert_eq!(config.guardrails.max_retry_count, 5);
        assert_eq!(config.guardrails.scope_lock_ttl, 3);
        assert_eq!(config.decay.rho, 0.05);
    }

    #[test]
    fn config_hash_is_stable_for_equal_configs() {
        let a = Config::default();
        let b = Config::default();
        assert_eq!(a.config_hash(), b.config_hash());
    }

    #[test]
    fn config_hash_differs_on_change() {
        let a = Config::default();
        let mut b = Config::default();
        b.seed = 42;
        assert_ne!(a.config_hash(), b.config_hash());
    }
}
