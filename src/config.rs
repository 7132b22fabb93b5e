use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use chrono::{FixedOffset, NaiveDateTime, NaiveTime, Offset, Utc};

/// Application-level constants
pub const APP_NAME: &str = "Sidiya";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default bind address for the HTTP service.
pub const DEFAULT_BIND_ADDR: &str = "127.0.0.1:8080";
/// Patients are in IST unless configured otherwise.
pub const DEFAULT_UTC_OFFSET_MINUTES: i32 = 330;
/// The original deployment ran the missed-action check every 30 minutes.
pub const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 1800;

/// Get the application data directory
/// ~/Sidiya/ on all platforms, falling back to the working directory.
pub fn app_data_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_NAME)
}

/// Default SQLite database path.
pub fn default_db_path() -> PathBuf {
    app_data_dir().join("sidiya.db")
}

/// Log filter used when RUST_LOG is unset.
pub fn default_log_filter() -> &'static str {
    "info,sidiya_lib=debug,tower_http=info"
}

/// Tunables for escalation detection.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EscalationConfig {
    /// A dose is missed once this long has passed its scheduled time without an ack.
    pub medication_grace: chrono::Duration,
    /// A day's weight is missed once the patient-local clock passes this time.
    pub weight_deadline: NaiveTime,
    pub red_zone_match: RedZoneMatch,
}

/// How reported symptoms are compared with the red-zone list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RedZoneMatch {
    /// Case-insensitive; matches when either string contains the other.
    #[default]
    Contains,
    /// Case-insensitive whole-string equality after trimming.
    Exact,
}

pub const DEFAULT_MEDICATION_GRACE_MINUTES: i64 = 60;

/// End of day: the weight obligation runs until the day is over.
pub fn default_weight_deadline() -> NaiveTime {
    NaiveTime::from_hms_opt(23, 59, 0).unwrap_or(NaiveTime::MIN)
}

impl Default for EscalationConfig {
    fn default() -> Self {
        Self {
            medication_grace: chrono::Duration::minutes(DEFAULT_MEDICATION_GRACE_MINUTES),
            weight_deadline: default_weight_deadline(),
            red_zone_match: RedZoneMatch::Contains,
        }
    }
}

/// Runtime configuration for the service, read from `SIDIYA_*` variables.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub db_path: PathBuf,
    pub bind_addr: SocketAddr,
    /// Offset of the patients' local clock from UTC.
    pub utc_offset: FixedOffset,
    /// Zero disables the background sweep.
    pub sweep_interval: Duration,
    pub escalation: EscalationConfig,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 8080)),
            utc_offset: offset_from_minutes(DEFAULT_UTC_OFFSET_MINUTES),
            sweep_interval: Duration::from_secs(DEFAULT_SWEEP_INTERVAL_SECS),
            escalation: EscalationConfig::default(),
        }
    }
}

impl ServiceConfig {
    /// Read configuration from the process environment.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup. Invalid values fall back to defaults with a warning.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(path) = lookup("SIDIYA_DB_PATH").filter(|p| !p.trim().is_empty()) {
            config.db_path = PathBuf::from(path);
        }
        if let Some(addr) = parse_var(&lookup, "SIDIYA_BIND_ADDR", |v| v.parse::<SocketAddr>().ok()) {
            config.bind_addr = addr;
        }
        if let Some(minutes) = parse_var(&lookup, "SIDIYA_UTC_OFFSET_MINUTES", |v| {
            v.parse::<i32>().ok().filter(|m| m.abs() < 24 * 60)
        }) {
            config.utc_offset = offset_from_minutes(minutes);
        }
        if let Some(secs) = parse_var(&lookup, "SIDIYA_SWEEP_INTERVAL_SECS", |v| v.parse::<u64>().ok()) {
            config.sweep_interval = Duration::from_secs(secs);
        }
        if let Some(minutes) = parse_var(&lookup, "SIDIYA_MED_GRACE_MINUTES", |v| {
            v.parse::<i64>().ok().filter(|m| (0..=24 * 60).contains(m))
        }) {
            config.escalation.medication_grace = chrono::Duration::minutes(minutes);
        }
        if let Some(deadline) = parse_var(&lookup, "SIDIYA_WEIGHT_DEADLINE", |v| {
            crate::models::parse_clock_time(v)
        }) {
            config.escalation.weight_deadline = deadline;
        }
        if let Some(mode) = parse_var(&lookup, "SIDIYA_RED_ZONE_MATCH", |v| {
            match v.trim().to_ascii_lowercase().as_str() {
                "contains" => Some(RedZoneMatch::Contains),
                "exact" => Some(RedZoneMatch::Exact),
                _ => None,
            }
        }) {
            config.escalation.red_zone_match = mode;
        }

        config
    }

    /// Wall clock in the patients' local time. Only the API layer and the
    /// scheduler call this; engine operations take `as_of` as a parameter.
    pub fn local_now(&self) -> NaiveDateTime {
        Utc::now().with_timezone(&self.utc_offset).naive_local()
    }
}

fn parse_var<F, T, P>(lookup: &F, key: &str, parse: P) -> Option<T>
where
    F: Fn(&str) -> Option<String>,
    P: Fn(&str) -> Option<T>,
{
    let raw = lookup(key)?;
    let parsed = parse(raw.trim());
    if parsed.is_none() {
        tracing::warn!(key, value = %raw, "Ignoring invalid configuration value");
    }
    parsed
}

fn offset_from_minutes(minutes: i32) -> FixedOffset {
    FixedOffset::east_opt(minutes * 60).unwrap_or_else(|| Utc.fix())
}
