use std::env;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};

use tracing::{Level, warn};

use crate::optimizer::{GroupingConfig, OversizePolicy};

const LOG_LEVEL_VAR: &str = "BOX_BUNDLER_LOG_LEVEL";

/// Complete application configuration, loaded from environment variables or default values.
#[derive(Clone, Debug)]
pub struct AppConfig {
    pub api: ApiConfig,
    pub grouping: GroupingSettings,
}

impl AppConfig {
    /// Creates a configuration from the currently available environment variables.
    pub fn from_env() -> Self {
        Self {
            api: ApiConfig::from_env(),
            grouping: GroupingSettings::from_env(),
        }
    }
}

/// Reads the tracing level; falls back to `INFO`.
///
/// Called before the subscriber is installed, so problems are reported on stderr.
pub fn log_level_from_env() -> Level {
    match env::var(LOG_LEVEL_VAR) {
        Ok(raw) if !raw.trim().is_empty() => match raw.trim().parse::<Level>() {
            Ok(level) => level,
            Err(err) => {
                eprintln!(
                    "⚠️ Could not parse {} ('{}'): {}. Using info.",
                    LOG_LEVEL_VAR,
                    raw.trim(),
                    err
                );
                Level::INFO
            }
        },
        _ => Level::INFO,
    }
}

/// Configuration for the API server.
#[derive(Clone, Debug)]
pub struct ApiConfig {
    bind_ip: IpAddr,
    display_host: String,
    port: u16,
}

impl ApiConfig {
    const DEFAULT_HOST: &'static str = "0.0.0.0";
    const DEFAULT_PORT: u16 = 8080;

    fn from_env() -> Self {
        let host_value =
            env_string("BOX_BUNDLER_API_HOST").unwrap_or_else(|| Self::DEFAULT_HOST.to_string());
        let (bind_ip, effective_host) = match host_value.parse::<IpAddr>() {
            Ok(ip) => (ip, host_value),
            Err(err) => {
                warn!(
                    value = %host_value,
                    error = %err,
                    "Could not parse BOX_BUNDLER_API_HOST, using {}",
                    Self::DEFAULT_HOST
                );
                (
                    IpAddr::V4(Ipv4Addr::UNSPECIFIED),
                    Self::DEFAULT_HOST.to_string(),
                )
            }
        };

        let port = match env_string("BOX_BUNDLER_API_PORT") {
            Some(raw) => match raw.parse::<u16>() {
                Ok(value) if value != 0 => value,
                Ok(_) => {
                    warn!(
                        "BOX_BUNDLER_API_PORT must not be 0, using {}",
                        Self::DEFAULT_PORT
                    );
                    Self::DEFAULT_PORT
                }
                Err(err) => {
                    warn!(
                        value = %raw,
                        error = %err,
                        "Could not parse BOX_BUNDLER_API_PORT, using {}",
                        Self::DEFAULT_PORT
                    );
                    Self::DEFAULT_PORT
                }
            },
            None => Self::DEFAULT_PORT,
        };

        Self {
            bind_ip,
            display_host: effective_host,
            port,
        }
    }

    /// Socket address to bind the server to.
    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind_ip, self.port)
    }

    /// Visible hostname for logging and hints.
    pub fn display_host(&self) -> &str {
        &self.display_host
    }

    /// Configured port.
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Indicates whether binding to all interfaces.
    pub fn binds_to_all_interfaces(&self) -> bool {
        match self.bind_ip {
            IpAddr::V4(addr) => addr == Ipv4Addr::UNSPECIFIED,
            IpAddr::V6(addr) => addr == Ipv6Addr::UNSPECIFIED,
        }
    }

    /// Checks whether the hostname matches the default value.
    pub fn uses_default_host(&self) -> bool {
        self.display_host == Self::DEFAULT_HOST
    }
}

/// Default grouping parameters applied to every request.
#[derive(Clone, Debug)]
pub struct GroupingSettings {
    grouping: GroupingConfig,
}

impl GroupingSettings {
    const TOLERANCE_VAR: &'static str = "BOX_BUNDLER_TOLERANCE";
    const BUNDLE_CAP_VAR: &'static str = "BOX_BUNDLER_BUNDLE_WEIGHT_CAP";
    const BATCH_CAP_VAR: &'static str = "BOX_BUNDLER_BATCH_WEIGHT_CAP";
    const ALLOWANCE_VAR: &'static str = "BOX_BUNDLER_PACK_ALLOWANCE_PERCENT";
    const REJECT_OVERSIZED_VAR: &'static str = "BOX_BUNDLER_REJECT_OVERSIZED";
    const MAX_UNITS_VAR: &'static str = "BOX_BUNDLER_MAX_UNITS";

    fn from_env() -> Self {
        let tolerance = load_f64_with_warning(
            Self::TOLERANCE_VAR,
            GroupingConfig::DEFAULT_TOLERANCE,
            |value| value >= 0.0,
            "must not be negative",
            "Adjusted tolerance changes which items count as similar",
        );

        let bundle_weight_cap = load_f64_with_warning(
            Self::BUNDLE_CAP_VAR,
            GroupingConfig::DEFAULT_BUNDLE_WEIGHT_CAP,
            |value| value > 0.0,
            "must be greater than 0",
            "Adjusted bundle weight cap in use",
        );

        // The batch cap follows the bundle cap unless set explicitly.
        let batch_weight_cap = load_f64_with_warning(
            Self::BATCH_CAP_VAR,
            bundle_weight_cap,
            |value| value > 0.0,
            "must be greater than 0",
            "Batch weight cap differs from the bundle weight cap",
        );

        let pack_allowance_percent = load_f64_with_warning(
            Self::ALLOWANCE_VAR,
            GroupingConfig::DEFAULT_PACK_ALLOWANCE_PERCENT,
            |value| (0.0..=100.0).contains(&value),
            "must be between 0 and 100",
            "Adjusted pack allowance changes the reported weight per pack",
        );

        let max_units = parse_usize_with_default(
            Self::MAX_UNITS_VAR,
            env_string(Self::MAX_UNITS_VAR).as_deref(),
            GroupingConfig::DEFAULT_MAX_UNITS,
        );

        let oversize_policy = match env_string(Self::REJECT_OVERSIZED_VAR)
            .and_then(|raw| parse_bool(&raw, Self::REJECT_OVERSIZED_VAR))
        {
            Some(true) => OversizePolicy::Reject,
            _ => OversizePolicy::Accept,
        };

        let grouping = GroupingConfig::builder()
            .tolerance(tolerance)
            .bundle_weight_cap(bundle_weight_cap)
            .batch_weight_cap(batch_weight_cap)
            .pack_allowance_percent(pack_allowance_percent)
            .oversize_policy(oversize_policy)
            .max_units(max_units)
            .build();

        Self { grouping }
    }

    pub fn new(grouping: GroupingConfig) -> Self {
        Self { grouping }
    }

    /// Returns the configured GroupingConfig.
    pub fn grouping_config(&self) -> GroupingConfig {
        self.grouping
    }
}

fn env_string(name: &str) -> Option<String> {
    match env::var(name) {
        Ok(value) => {
            let trimmed = value.trim();
            if trimmed.is_empty() {
                None
            } else {
                Some(trimmed.to_owned())
            }
        }
        Err(env::VarError::NotPresent) => None,
        Err(err) => {
            warn!(var = name, error = %err, "Access failed, using default value");
            None
        }
    }
}

fn parse_bool(raw: &str, var_name: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "y" | "on" => Some(true),
        "0" | "false" | "no" | "n" | "off" => Some(false),
        other => {
            warn!(
                var = var_name,
                value = other,
                "Could not interpret value as boolean, using default value"
            );
            None
        }
    }
}

fn parse_f64_with_default(
    var_name: &str,
    raw: Option<&str>,
    default: f64,
    validator: impl Fn(f64) -> bool,
    invalid_hint: &str,
    notice: &str,
) -> f64 {
    let Some(raw) = raw else {
        return default;
    };

    match raw.parse::<f64>() {
        Ok(value) if value.is_finite() && validator(value) => {
            let tolerance = (default.abs().max(1.0)) * 1e-9;
            if (value - default).abs() > tolerance {
                warn!(var = var_name, value, "{}", notice);
            }
            value
        }
        Ok(_) => {
            warn!(
                var = var_name,
                value = raw,
                "Invalid value: {}. Using {}",
                invalid_hint,
                default
            );
            default
        }
        Err(err) => {
            warn!(
                var = var_name,
                value = raw,
                error = %err,
                "Could not parse as number, using {}",
                default
            );
            default
        }
    }
}

fn parse_usize_with_default(var_name: &str, raw: Option<&str>, default: usize) -> usize {
    let Some(raw) = raw else {
        return default;
    };

    match raw.parse::<usize>() {
        Ok(0) => {
            warn!(
                var = var_name,
                "Invalid value: must be greater than 0. Using {}", default
            );
            default
        }
        Ok(value) => {
            if value != default {
                warn!(var = var_name, value, "Adjusted unit limit in use");
            }
            value
        }
        Err(err) => {
            warn!(
                var = var_name,
                value = raw,
                error = %err,
                "Could not parse as unsigned integer, using {}",
                default
            );
            default
        }
    }
}

fn load_f64_with_warning(
    var_name: &str,
    default: f64,
    validator: impl Fn(f64) -> bool,
    invalid_hint: &str,
    notice: &str,
) -> f64 {
    let raw = env_string(var_name);
    parse_f64_with_default(
        var_name,
        raw.as_deref(),
        default,
        validator,
        invalid_hint,
        notice,
    )
}
