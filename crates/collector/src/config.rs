//! TOML config file loading, environment overrides and validation for the
//! collector service.

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::net::{IpAddr, SocketAddr};
use std::path::Path;

// ---------------------------------------------------------------------------
// Config file structures
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    pub bind_addr: String,
    pub web_port: u16,
    pub db_url: String,
    pub default_history_hours: u32,
    pub max_history_hours: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0".to_string(),
            web_port: 5000,
            db_url: "sqlite:biogas.db?mode=rwc".to_string(),
            default_history_hours: 24,
            max_history_hours: 8760,
        }
    }
}

impl Config {
    /// Only meaningful after `validate()` has passed.
    pub fn listen_addr(&self) -> Result<SocketAddr> {
        let ip: IpAddr = self
            .bind_addr
            .parse()
            .with_context(|| format!("invalid bind_addr: {:?}", self.bind_addr))?;
        Ok(SocketAddr::new(ip, self.web_port))
    }

    /// Apply `WEB_PORT` and `DB_URL`.  `get` is `std::env::var` in
    /// production.
    pub fn apply_overrides(&mut self, get: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(v) = get("WEB_PORT") {
            self.web_port = v
                .trim()
                .parse()
                .with_context(|| format!("invalid WEB_PORT: {v:?}"))?;
        }
        if let Some(url) = get("DB_URL") {
            self.db_url = url;
        }
        Ok(())
    }

    /// Validate the whole config, reporting every violation at once.
    pub fn validate(&self) -> Result<()> {
        let mut errors: Vec<String> = Vec::new();

        if self.bind_addr.parse::<IpAddr>().is_err() {
            errors.push(format!("bind_addr {:?} is not an IP address", self.bind_addr));
        }
        if self.web_port == 0 {
            errors.push("web_port must be positive".to_string());
        }
        if !self.db_url.starts_with("sqlite:") {
            errors.push(format!("db_url {:?} must start with sqlite:", self.db_url));
        }
        if self.max_history_hours == 0 {
            errors.push("max_history_hours must be positive".to_string());
        }
        if self.default_history_hours > self.max_history_hours {
            errors.push(format!(
                "default_history_hours ({}) exceeds max_history_hours ({})",
                self.default_history_hours, self.max_history_hours
            ));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            bail!(
                "config validation failed ({} error{}):\n  - {}",
                errors.len(),
                if errors.len() == 1 { "" } else { "s" },
                errors.join("\n  - ")
            );
        }
    }
}

// ---------------------------------------------------------------------------
// Load
// ---------------------------------------------------------------------------

/// Read `path` (defaults if it does not exist), apply environment
/// overrides, and validate.
pub fn load(path: &str) -> Result<Config> {
    let mut config = if Path::new(path).exists() {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config: {path}"))?;
        toml::from_str(&contents).with_context(|| format!("failed to parse config: {path}"))?
    } else {
        tracing::info!(path, "no config file, using defaults");
        Config::default()
    };

    config.apply_overrides(|key| std::env::var(key).ok())?;
    config
        .validate()
        .with_context(|| format!("invalid config: {path}"))?;
    Ok(config)
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn assert_validation_err(cfg: &Config, needle: &str) {
        let err = cfg.validate().unwrap_err();
        let msg = format!("{err:#}");
        assert!(
            msg.contains(needle),
            "expected error containing {needle:?}, got: {msg}"
        );
    }

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |k: &str| map.get(k).cloned()
    }

    // -- Parsing ----------------------------------------------------------

    #[test]
    fn parse_empty_config_gives_defaults() {
        let cfg: Config = toml::from_str("").unwrap();
        assert_eq!(cfg.bind_addr, "0.0.0.0");
        assert_eq!(cfg.web_port, 5000);
        assert_eq!(cfg.db_url, "sqlite:biogas.db?mode=rwc");
        assert_eq!(cfg.default_history_hours, 24);
        assert_eq!(cfg.max_history_hours, 8760);
        cfg.validate().unwrap();
    }

    #[test]
    fn parse_partial_config() {
        let cfg: Config = toml::from_str(
            r#"
bind_addr = "127.0.0.1"
web_port = 8080
max_history_hours = 48
"#,
        )
        .unwrap();
        assert_eq!(cfg.listen_addr().unwrap(), "127.0.0.1:8080".parse().unwrap());
        assert_eq!(cfg.max_history_hours, 48);
        assert_eq!(cfg.default_history_hours, 24);
    }

    #[test]
    fn unknown_type_is_a_parse_error() {
        assert!(toml::from_str::<Config>("web_port = \"five thousand\"").is_err());
    }

    // -- Overrides --------------------------------------------------------

    #[test]
    fn env_overrides_file_values() {
        let mut cfg = Config::default();
        cfg.apply_overrides(env(&[("WEB_PORT", "8081"), ("DB_URL", "sqlite::memory:")]))
            .unwrap();
        assert_eq!(cfg.web_port, 8081);
        assert_eq!(cfg.db_url, "sqlite::memory:");
    }

    #[test]
    fn bad_port_override_is_an_error() {
        let mut cfg = Config::default();
        let err = cfg.apply_overrides(env(&[("WEB_PORT", "http")])).unwrap_err();
        assert!(format!("{err:#}").contains("WEB_PORT"));
    }

    // -- Validation -------------------------------------------------------

    #[test]
    fn bind_addr_must_be_ip() {
        let cfg = Config {
            bind_addr: "localhost".into(),
            ..Config::default()
        };
        assert_validation_err(&cfg, "bind_addr");
    }

    #[test]
    fn zero_port_rejected() {
        let cfg = Config {
            web_port: 0,
            ..Config::default()
        };
        assert_validation_err(&cfg, "web_port must be positive");
    }

    #[test]
    fn non_sqlite_url_rejected() {
        let cfg = Config {
            db_url: "postgres://localhost/biogas".into(),
            ..Config::default()
        };
        assert_validation_err(&cfg, "must start with sqlite:");
    }

    #[test]
    fn default_window_cannot_exceed_cap() {
        let cfg = Config {
            default_history_hours: 100,
            max_history_hours: 48,
            ..Config::default()
        };
        assert_validation_err(&cfg, "exceeds max_history_hours");
    }

    #[test]
    fn multiple_errors_collected() {
        let cfg = Config {
            bind_addr: "nope".into(),
            web_port: 0,
            max_history_hours: 0,
            ..Config::default()
        };
        let msg = format!("{:#}", cfg.validate().unwrap_err());
        // max 0 also trips default > max
        assert!(msg.contains("4 errors"), "got: {msg}");
    }

    #[test]
    fn load_missing_file_uses_defaults() {
        let cfg = load("/nonexistent/collector.toml").unwrap();
        assert_eq!(cfg.max_history_hours, 8760);
    }
}
