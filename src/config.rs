use crate::application::DestinationConfig;
use crate::domain::entities::Route;
use crate::domain::value_objects::{LevelLegacy, LevelM20};
use anyhow::{anyhow, bail, Context};
use serde::Deserialize;
use std::time::Duration;

#[derive(Debug, Deserialize, Clone, Default, PartialEq, Eq)]
pub struct Instrumentation {
    /// Carbon endpoint for the relay's own metrics (disabled when empty)
    pub graphite_addr: String,
    /// Reporting interval in milliseconds
    pub graphite_interval: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    // Listeners
    pub listen_addr: String,
    pub pickle_addr: Option<String>,
    pub admin_addr: String,
    pub http_addr: String,

    // Process
    pub spool_dir: String,
    pub max_procs: usize,
    pub instance: String,
    pub log_level: String,
    pub pid_file: Option<String>,

    // Routing
    pub first_only: bool,
    pub routes: Vec<Route>,
    pub init: Vec<String>,

    // Instrumentation
    pub instrumentation: Instrumentation,

    // Validation
    pub bad_metrics_max_age: String,
    pub validation_level_legacy: LevelLegacy,
    pub validation_level_m20: LevelM20,
    pub validate_order: bool,

    // Destination connections
    pub flush_interval_ms: u64,
    pub reconnect_interval_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:2003".to_string(),
            pickle_addr: None,
            admin_addr: "0.0.0.0:2004".to_string(),
            http_addr: "0.0.0.0:8081".to_string(),
            spool_dir: "spool".to_string(),
            max_procs: 0,
            instance: "default".to_string(),
            log_level: "info".to_string(),
            pid_file: None,
            first_only: false,
            routes: Vec::new(),
            init: Vec::new(),
            instrumentation: Instrumentation::default(),
            bad_metrics_max_age: "24h".to_string(),
            validation_level_legacy: LevelLegacy::default(),
            validation_level_m20: LevelM20::default(),
            validate_order: false,
            flush_interval_ms: 1000,
            reconnect_interval_ms: 10_000,
        }
    }
}

impl Config {
    /// Max tracing level for `log_level`.
    pub fn tracing_level(&self) -> anyhow::Result<tracing::Level> {
        self.log_level
            .trim()
            .parse::<tracing::Level>()
            .map_err(|_| anyhow!("invalid log level {:?}", self.log_level))
    }

    /// Maximum age of a metric before it counts as too old to relay.
    pub fn bad_metrics_max_age(&self) -> anyhow::Result<Duration> {
        parse_duration(&self.bad_metrics_max_age)
            .with_context(|| format!("invalid bad_metrics_max_age {:?}", self.bad_metrics_max_age))
    }

    /// Connection settings shared by every destination.
    pub fn destination_config(&self) -> DestinationConfig {
        DestinationConfig {
            flush_interval: Duration::from_millis(self.flush_interval_ms.max(1)),
            reconnect_interval: Duration::from_millis(self.reconnect_interval_ms.max(1)),
            ..Default::default()
        }
    }
}

/// Parse durations like `24h`, `1h30m`, `90s` or `250ms`.
pub fn parse_duration(s: &str) -> anyhow::Result<Duration> {
    let s = s.trim();
    if s.is_empty() {
        bail!("empty duration");
    }

    let mut total = Duration::ZERO;
    let mut rest = s;
    while !rest.is_empty() {
        let digits = rest.find(|c: char| !c.is_ascii_digit()).unwrap_or(rest.len());
        if digits == 0 {
            bail!("expected a number at {:?}", rest);
        }
        let value: u64 = rest[..digits].parse()?;
        rest = &rest[digits..];

        let unit_len = rest.find(|c: char| c.is_ascii_digit()).unwrap_or(rest.len());
        let part = match &rest[..unit_len] {
            "ms" => Some(Duration::from_millis(value)),
            "s" => Some(Duration::from_secs(value)),
            "m" => value.checked_mul(60).map(Duration::from_secs),
            "h" => value.checked_mul(3600).map(Duration::from_secs),
            "" => bail!("missing unit after {}", value),
            unit => bail!("unknown unit {:?}", unit),
        };
        total = match part.and_then(|part| total.checked_add(part)) {
            Some(total) => total,
            None => bail!("duration {:?} is too large", s),
        };
        rest = &rest[unit_len..];
    }
    Ok(total)
}

pub fn load_config() -> anyhow::Result<Config> {
    load_config_from(|name| std::env::var(name).ok())
}

/// Build a config from any variable lookup (the environment in production).
pub fn load_config_from<F>(var: F) -> anyhow::Result<Config>
where
    F: Fn(&str) -> Option<String>,
{
    let defaults = Config::default();

    let string = |name: &str, default: &str| var(name).unwrap_or_else(|| default.to_string());
    let flag = |name: &str| {
        var(name)
            .map(|v| v == "1" || v.to_lowercase() == "true")
            .unwrap_or(false)
    };
    let number = |name: &str, default: u64| {
        var(name)
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or(default)
    };

    let routes = match var("RELAY_ROUTES") {
        Some(raw) if !raw.trim().is_empty() => {
            serde_json::from_str::<Vec<Route>>(&raw).context("invalid RELAY_ROUTES")?
        }
        _ => Vec::new(),
    };

    let init = var("RELAY_INIT")
        .map(|v| {
            v.split(';')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect()
        })
        .unwrap_or_default();

    let validation_level_legacy = match var("RELAY_VALIDATION_LEVEL_LEGACY") {
        Some(v) => LevelLegacy::parse(&v)
            .ok_or_else(|| anyhow!("invalid RELAY_VALIDATION_LEVEL_LEGACY {:?}", v))?,
        None => defaults.validation_level_legacy,
    };

    let validation_level_m20 = match var("RELAY_VALIDATION_LEVEL_M20") {
        Some(v) => LevelM20::parse(&v)
            .ok_or_else(|| anyhow!("invalid RELAY_VALIDATION_LEVEL_M20 {:?}", v))?,
        None => defaults.validation_level_m20,
    };

    Ok(Config {
        listen_addr: string("RELAY_LISTEN_ADDR", &defaults.listen_addr),
        pickle_addr: var("RELAY_PICKLE_ADDR").filter(|v| !v.is_empty()),
        admin_addr: string("RELAY_ADMIN_ADDR", &defaults.admin_addr),
        http_addr: string("RELAY_HTTP_ADDR", &defaults.http_addr),
        spool_dir: string("RELAY_SPOOL_DIR", &defaults.spool_dir),
        max_procs: number("RELAY_MAX_PROCS", defaults.max_procs as u64) as usize,
        instance: string("RELAY_INSTANCE", &defaults.instance),
        log_level: string("RELAY_LOG_LEVEL", &defaults.log_level),
        pid_file: var("RELAY_PID_FILE").filter(|v| !v.is_empty()),
        first_only: flag("RELAY_FIRST_ONLY"),
        routes,
        init,
        instrumentation: Instrumentation {
            graphite_addr: string("RELAY_GRAPHITE_ADDR", ""),
            graphite_interval: number("RELAY_GRAPHITE_INTERVAL", 1000),
        },
        bad_metrics_max_age: string("RELAY_BAD_METRICS_MAX_AGE", &defaults.bad_metrics_max_age),
        validation_level_legacy,
        validation_level_m20,
        validate_order: flag("RELAY_VALIDATE_ORDER"),
        flush_interval_ms: number("RELAY_FLUSH_INTERVAL_MS", defaults.flush_interval_ms),
        reconnect_interval_ms: number(
            "RELAY_RECONNECT_INTERVAL_MS",
            defaults.reconnect_interval_ms,
        ),
    })
}
