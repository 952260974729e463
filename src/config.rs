//! Service configuration (`prodsched.toml`).
//!
//! Every field has a default, so an empty file (or no file) is valid.
//! `PRODSCHED_HOST` and `PRODSCHED_PORT` override the listen address.
//!
//! ```toml
//! [server]
//! host = "0.0.0.0"
//! port = 5000
//!
//! [solver]
//! time_limit_seconds = 30
//! granularity_minutes = 60
//! horizon_days = 7
//! workers = 4
//! dispatch_rules = ["priority", "edd", "spt"]
//! max_slots = 50000
//! max_batches = 20000
//! max_lane_slots = 20000000
//!
//! [sandbox]
//! interpreter = "python3"
//! timeout_seconds = 30
//! ```

use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::sandbox::SandboxConfig;
use crate::solver::{SolverConfig, DEFAULT_DISPATCH_RULES};

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub server: ServerConfig,
    pub solver: SolverSettings,
    pub sandbox: SandboxConfig,
}

/// HTTP listener.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 5000,
        }
    }
}

/// Solver defaults; requests may override the time limit, horizon,
/// granularity and seed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SolverSettings {
    pub time_limit_seconds: f64,
    /// Requests asking for more are clamped to this.
    pub max_time_limit_seconds: f64,
    pub granularity_minutes: u32,
    pub horizon_days: u32,
    pub workers: usize,
    /// Mutations per search worker.
    pub max_iterations: u64,
    pub seed: u64,
    pub dispatch_rules: Vec<String>,
    /// Longest accepted timeline, in slots.
    pub max_slots: usize,
    /// Most batches one request may expand to.
    pub max_batches: usize,
    /// Cap on (employees + resources) times slots.
    pub max_lane_slots: usize,
}

impl Default for SolverSettings {
    fn default() -> Self {
        Self {
            time_limit_seconds: 30.0,
            max_time_limit_seconds: 300.0,
            granularity_minutes: 60,
            horizon_days: 7,
            workers: 4,
            max_iterations: 400,
            seed: 42,
            dispatch_rules: DEFAULT_DISPATCH_RULES.iter().map(|r| r.to_string()).collect(),
            max_slots: 50_000,
            max_batches: 20_000,
            max_lane_slots: 20_000_000,
        }
    }
}

impl SolverSettings {
    /// Effective time limit for a request asking for `requested` seconds.
    pub fn time_limit(&self, requested: Option<f64>) -> Duration {
        let secs = requested
            .filter(|s| s.is_finite() && *s > 0.0)
            .unwrap_or(self.time_limit_seconds)
            .min(self.max_time_limit_seconds);
        Duration::try_from_secs_f64(secs).unwrap_or(Duration::from_secs(30))
    }

    /// Solver configuration for one call.
    pub fn solver_config(&self, time_limit: Duration, seed: Option<u64>) -> SolverConfig {
        SolverConfig {
            time_limit,
            workers: self.workers.max(1),
            max_iterations: self.max_iterations,
            seed: seed.unwrap_or(self.seed),
            dispatch_rules: self.dispatch_rules.clone(),
        }
    }
}

impl ServiceConfig {
    /// Parses a TOML document.
    pub fn from_toml(content: &str) -> anyhow::Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Reads a TOML file.
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Loads `path` (or the defaults) and applies environment overrides.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let mut config = match path {
            Some(p) => Self::from_file(p)?,
            None => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Applies `PRODSCHED_HOST` / `PRODSCHED_PORT` from `lookup`.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<()> {
        if let Some(host) = lookup("PRODSCHED_HOST") {
            self.server.host = host;
        }
        if let Some(port) = lookup("PRODSCHED_PORT") {
            self.server.port = port
                .parse()
                .map_err(|e| anyhow::anyhow!("invalid PRODSCHED_PORT '{port}': {e}"))?;
        }
        Ok(())
    }

    /// Listen address.
    pub fn bind_addr(&self) -> anyhow::Result<SocketAddr> {
        Ok(format!("{}:{}", self.server.host, self.server.port).parse()?)
    }

    pub fn to_toml_string(&self) -> anyhow::Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = ServiceConfig::default();
        assert_eq!(config.server.port, 5000);
        assert_eq!(config.solver.granularity_minutes, 60);
        assert_eq!(config.solver.horizon_days, 7);
        assert_eq!(config.solver.max_slots, 50_000);
        assert_eq!(config.sandbox.interpreter, "python3");
        assert_eq!(config.bind_addr().unwrap().to_string(), "0.0.0.0:5000");
    }

    #[test]
    fn test_partial_toml() {
        let config = ServiceConfig::from_toml(
            r#"
            [server]
            port = 8080

            [solver]
            time_limit_seconds = 5
            dispatch_rules = ["edd"]
            "#,
        )
        .unwrap();
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.solver.time_limit_seconds, 5.0);
        assert_eq!(config.solver.dispatch_rules, vec!["edd"]);
        assert_eq!(config.solver.workers, 4);
    }

    #[test]
    fn test_roundtrip_file() {
        let mut config = ServiceConfig::default();
        config.sandbox.timeout_seconds = 3;
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(config.to_toml_string().unwrap().as_bytes()).unwrap();
        assert_eq!(ServiceConfig::from_file(file.path()).unwrap(), config);
    }

    #[test]
    fn test_env_overrides() {
        let mut config = ServiceConfig::default();
        config
            .apply_env(|key| match key {
                "PRODSCHED_HOST" => Some("127.0.0.1".into()),
                "PRODSCHED_PORT" => Some("9000".into()),
                _ => None,
            })
            .unwrap();
        assert_eq!(config.bind_addr().unwrap().to_string(), "127.0.0.1:9000");

        let bad = config.apply_env(|key| (key == "PRODSCHED_PORT").then(|| "http".to_string()));
        assert!(bad.is_err());
    }

    #[test]
    fn test_time_limit_clamped() {
        let settings = SolverSettings::default();
        assert_eq!(settings.time_limit(None), Duration::from_secs(30));
        assert_eq!(settings.time_limit(Some(2.0)), Duration::from_secs(2));
        assert_eq!(settings.time_limit(Some(10_000.0)), Duration::from_secs(300));
        assert_eq!(settings.time_limit(Some(-1.0)), Duration::from_secs(30));
    }

    #[test]
    fn test_solver_config() {
        let settings = SolverSettings::default();
        let cfg = settings.solver_config(Duration::from_secs(1), Some(9));
        assert_eq!(cfg.seed, 9);
        assert_eq!(cfg.workers, 4);
        assert_eq!(cfg.dispatch_rules.len(), 3);
    }
}
