use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{var}: cannot parse {value:?}")]
    Invalid { var: &'static str, value: String },
    #[error("REELTIME_BACKEND=http needs REELTIME_API_URL")]
    MissingApiUrl,
    #[error("unknown backend {0:?} (expected \"local\" or \"http\")")]
    UnknownBackend(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendConfig {
    /// Journaled in-process store under `data_dir`.
    Local { data_dir: PathBuf, compact_threshold: u64 },
    /// REST console backend.
    Http {
        base_url: String,
        token: Option<String>,
        timeout: Duration,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub backend: BackendConfig,
    /// Period of the voucher re-evaluation timer.
    pub tick: Duration,
    pub metrics_port: Option<u16>,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Build from any variable source. `from_env` passes the process
    /// environment.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let tick = Duration::from_secs(parsed(&lookup, "REELTIME_TICK_SECS")?.unwrap_or(60));
        let metrics_port = parsed(&lookup, "REELTIME_METRICS_PORT")?;

        let kind = lookup("REELTIME_BACKEND").unwrap_or_else(|| "local".into());
        let backend = match kind.as_str() {
            "local" => BackendConfig::Local {
                data_dir: lookup("REELTIME_DATA_DIR")
                    .unwrap_or_else(|| "./data".into())
                    .into(),
                compact_threshold: parsed(&lookup, "REELTIME_COMPACT_THRESHOLD")?.unwrap_or(1000),
            },
            "http" => BackendConfig::Http {
                base_url: lookup("REELTIME_API_URL").ok_or(ConfigError::MissingApiUrl)?,
                token: lookup("REELTIME_API_TOKEN").filter(|t| !t.is_empty()),
                timeout: Duration::from_secs(
                    parsed(&lookup, "REELTIME_HTTP_TIMEOUT_SECS")?.unwrap_or(30),
                ),
            },
            _ => return Err(ConfigError::UnknownBackend(kind)),
        };

        Ok(Self {
            backend,
            tick,
            metrics_port,
        })
    }
}

fn parsed<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    var: &'static str,
) -> Result<Option<T>, ConfigError> {
    match lookup(var) {
        None => Ok(None),
        Some(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::Invalid { var, value }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> Result<Config, ConfigError> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|var| map.get(var).cloned())
    }

    #[test]
    fn defaults_to_local_store() {
        let cfg = config(&[]).unwrap();
        assert_eq!(cfg.tick, Duration::from_secs(60));
        assert_eq!(cfg.metrics_port, None);
        assert_eq!(
            cfg.backend,
            BackendConfig::Local {
                data_dir: PathBuf::from("./data"),
                compact_threshold: 1000,
            }
        );
    }

    #[test]
    fn http_backend() {
        let cfg = config(&[
            ("REELTIME_BACKEND", "http"),
            ("REELTIME_API_URL", "https://console.example/api"),
            ("REELTIME_API_TOKEN", "secret"),
            ("REELTIME_HTTP_TIMEOUT_SECS", "5"),
            ("REELTIME_TICK_SECS", "10"),
            ("REELTIME_METRICS_PORT", "9100"),
        ])
        .unwrap();
        assert_eq!(cfg.tick, Duration::from_secs(10));
        assert_eq!(cfg.metrics_port, Some(9100));
        assert_eq!(
            cfg.backend,
            BackendConfig::Http {
                base_url: "https://console.example/api".into(),
                token: Some("secret".into()),
                timeout: Duration::from_secs(5),
            }
        );
    }

    #[test]
    fn bad_values_are_reported() {
        assert!(matches!(
            config(&[("REELTIME_TICK_SECS", "soon")]),
            Err(ConfigError::Invalid { var: "REELTIME_TICK_SECS", .. })
        ));
        assert!(matches!(config(&[("REELTIME_BACKEND", "http")]), Err(ConfigError::MissingApiUrl)));
        assert!(matches!(
            config(&[("REELTIME_BACKEND", "sql")]),
            Err(ConfigError::UnknownBackend(_))
        ));
    }
}
