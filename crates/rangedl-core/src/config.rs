//! Engine configuration, loaded from `~/.config/rangedl/config.toml`.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use crate::client::ClientConfig;
use crate::task::{MAX_THREAD_COUNT, MIN_THREAD_COUNT};

/// Tunable knobs for the download engine. Everything here has a sensible
/// default matching the permissive posture of the system this engine
/// replaces; all of it is overridable via the config file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RangedlConfig {
    /// Lower bound the engine will clamp a task's requested thread count to.
    pub min_threads: u32,
    /// Upper bound the engine will clamp a task's requested thread count to.
    pub max_threads: u32,
    /// Maximum redirect chain length for the HEAD probe and each segment worker.
    pub max_redirects: u32,
    /// Skip TLS peer/host verification. Matches the permissive default this
    /// engine inherited; see the Open Questions note in DESIGN.md.
    pub insecure_tls: bool,
    pub connect_timeout_secs: u64,
    pub request_timeout_secs: u64,
    /// `0` disables the low-speed abort check.
    pub low_speed_limit_bytes: u32,
    pub low_speed_time_secs: u64,
}

impl Default for RangedlConfig {
    fn default() -> Self {
        Self {
            min_threads: MIN_THREAD_COUNT,
            max_threads: MAX_THREAD_COUNT,
            max_redirects: 5,
            insecure_tls: true,
            connect_timeout_secs: 15,
            request_timeout_secs: 30,
            low_speed_limit_bytes: 0,
            low_speed_time_secs: 0,
        }
    }
}

impl RangedlConfig {
    /// Builds the HTTP facade configuration from these settings.
    pub fn client_config(&self) -> ClientConfig {
        ClientConfig {
            insecure_tls: self.insecure_tls,
            max_redirects: self.max_redirects,
            connect_timeout: Duration::from_secs(self.connect_timeout_secs),
            request_timeout: Duration::from_secs(self.request_timeout_secs),
            low_speed_limit_bytes: self.low_speed_limit_bytes,
            low_speed_time: Duration::from_secs(self.low_speed_time_secs),
        }
    }

    /// Clamps a requested thread count into `[min_threads, max_threads]`,
    /// itself bounded by the engine-wide `[1, 10]` (spec §3, §4.4).
    pub fn clamp_thread_count(&self, requested: u32) -> u32 {
        let lo = self.min_threads.max(MIN_THREAD_COUNT);
        let hi = self.max_threads.min(MAX_THREAD_COUNT).max(lo);
        requested.clamp(lo, hi)
    }
}

pub fn config_path() -> Result<PathBuf> {
    let xdg_dirs = xdg::BaseDirectories::with_prefix("rangedl")?;
    Ok(xdg_dirs.place_config_file("config.toml")?)
}

/// Load configuration from disk, creating a default file if none exists.
pub fn load_or_init() -> Result<RangedlConfig> {
    let path = config_path()?;
    if !path.exists() {
        let default_cfg = RangedlConfig::default();
        let toml = toml::to_string_pretty(&default_cfg)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, toml)?;
        tracing::info!("created default config at {}", path.display());
        return Ok(default_cfg);
    }

    let data = fs::read_to_string(&path)?;
    let cfg: RangedlConfig = toml::from_str(&data)?;
    Ok(cfg)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_values() {
        let cfg = RangedlConfig::default();
        assert_eq!(cfg.min_threads, 1);
        assert_eq!(cfg.max_threads, 10);
        assert_eq!(cfg.max_redirects, 5);
        assert!(cfg.insecure_tls);
    }

    #[test]
    fn config_toml_roundtrip() {
        let cfg = RangedlConfig::default();
        let toml = toml::to_string_pretty(&cfg).unwrap();
        let parsed: RangedlConfig = toml::from_str(&toml).unwrap();
        assert_eq!(parsed.max_threads, cfg.max_threads);
        assert_eq!(parsed.max_redirects, cfg.max_redirects);
    }

    #[test]
    fn config_toml_partial_uses_defaults() {
        let toml = "max_threads = 6\n";
        let cfg: RangedlConfig = toml::from_str(toml).unwrap();
        assert_eq!(cfg.max_threads, 6);
        assert_eq!(cfg.min_threads, 1);
        assert_eq!(cfg.max_redirects, 5);
    }

    #[test]
    fn clamp_thread_count_respects_config_bounds() {
        let mut cfg = RangedlConfig::default();
        cfg.min_threads = 2;
        cfg.max_threads = 8;
        assert_eq!(cfg.clamp_thread_count(1), 2);
        assert_eq!(cfg.clamp_thread_count(20), 8);
        assert_eq!(cfg.clamp_thread_count(4), 4);
    }

    #[test]
    fn clamp_thread_count_never_exceeds_engine_wide_bounds() {
        let mut cfg = RangedlConfig::default();
        cfg.max_threads = 50;
        assert_eq!(cfg.clamp_thread_count(50), MAX_THREAD_COUNT);
    }
}
