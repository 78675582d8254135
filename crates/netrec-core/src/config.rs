//! Environment Configuration Loader
//!
//! Loads environment variables from the canonical location: `/etc/netrec/environment`
//! and builds the [`ReconcilerConfig`] shared by the reconciliation crates.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use netrec_core::config::{load_environment, ReconcilerConfig};
//!
//! load_environment();
//! let config = ReconcilerConfig::from_env().expect("valid configuration");
//! ```

use std::fs;
use std::path::Path;

use ipnetwork::Ipv6Network;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{Error, Result};

/// Default path for the environment file
pub const DEFAULT_ENV_FILE: &str = "/etc/netrec/environment";

/// Paths to check (in order of priority)
pub const ENV_FILE_PATHS: &[&str] = &["/etc/netrec/environment", "/etc/netrec.env", ".env"];

pub const DEFAULT_IPV6_TENANT_RANGE: &str = "fdd6:a1fa:cfa8::/48";
pub const DEFAULT_IPV6_PREFIX_LENGTH: u8 = 64;
pub const DEFAULT_IPV6_ASSIGNMENT_ATTEMPTS: u32 = 1000;
pub const DEFAULT_ROUTER_NAME_PREFIX: &str = "ak-";
pub const DEFAULT_PLATFORM_TENANT: &str = "platform";
pub const DEFAULT_PORTALIAS_QUOTA: u32 = 10;

/// Load environment variables from the canonical configuration file.
///
/// Checks `$NETREC_ENV_FILE` first, then [`ENV_FILE_PATHS`] in order.
/// Existing environment variables are never overridden.
///
/// Returns the path that was loaded, or None if no file was found.
pub fn load_environment() -> Option<String> {
    if let Ok(custom_path) = std::env::var("NETREC_ENV_FILE") {
        if let Some(path) = try_load_env_file(&custom_path) {
            return Some(path);
        }
    }

    for path in ENV_FILE_PATHS {
        if let Some(loaded_path) = try_load_env_file(path) {
            return Some(loaded_path);
        }
    }

    debug!("No environment file found, using existing environment");
    None
}

/// Try to load an environment file from the given path.
fn try_load_env_file(path: &str) -> Option<String> {
    let path_obj = Path::new(path);

    if !path_obj.exists() {
        return None;
    }

    match fs::read_to_string(path_obj) {
        Ok(content) => {
            let mut loaded_count = 0;
            let mut skipped_count = 0;

            for line in content.lines() {
                let line = line.trim();

                if line.is_empty() || line.starts_with('#') {
                    continue;
                }

                if let Some((key, value)) = parse_env_line(line) {
                    if std::env::var(&key).is_err() {
                        std::env::set_var(&key, &value);
                        loaded_count += 1;
                        debug!("Loaded: {}={}", key, value);
                    } else {
                        skipped_count += 1;
                        debug!("Skipped (already set): {}", key);
                    }
                }
            }

            info!(
                "Loaded {} environment variables from {} ({} skipped - already set)",
                loaded_count, path, skipped_count
            );

            Some(path.to_string())
        }
        Err(e) => {
            warn!("Failed to read environment file {}: {}", path, e);
            None
        }
    }
}

/// Parse a single environment line into key-value pair.
fn parse_env_line(line: &str) -> Option<(String, String)> {
    // Handle: KEY=VALUE, KEY="VALUE", KEY='VALUE'
    let mut parts = line.splitn(2, '=');
    let key = parts.next()?.trim();
    let value = parts.next()?.trim();

    if key.is_empty() {
        return None;
    }

    let value = value
        .strip_prefix('"')
        .and_then(|v| v.strip_suffix('"'))
        .or_else(|| value.strip_prefix('\'').and_then(|v| v.strip_suffix('\'')))
        .unwrap_or(value);

    Some((key.to_string(), value.to_string()))
}

/// Get a configuration value with a default.
pub fn get_config(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Get a boolean configuration value, failing on unrecognized input.
pub fn get_config_bool(key: &str, default: bool) -> Result<bool> {
    match std::env::var(key) {
        Ok(v) if !v.trim().is_empty() => match v.trim().to_lowercase().as_str() {
            "true" | "1" | "yes" | "on" => Ok(true),
            "false" | "0" | "no" | "off" => Ok(false),
            _ => Err(Error::config(format!("{key} is not a valid boolean: {v}"))),
        },
        _ => Ok(default),
    }
}

/// Get a numeric configuration value, failing on unparsable input.
fn get_config_num<T: std::str::FromStr>(key: &str, default: T) -> Result<T> {
    match std::env::var(key) {
        Ok(v) if !v.trim().is_empty() => v
            .trim()
            .parse()
            .map_err(|_| Error::config(format!("{key} is not a valid number: {v}"))),
        _ => Ok(default),
    }
}

/// Settings for IPv6 provisioning, router attachment and alias seeding
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconcilerConfig {
    /// Range tenant IPv6 subnets are drawn from
    pub ipv6_tenant_range: Ipv6Network,
    /// Prefix length of each tenant IPv6 subnet
    pub ipv6_prefix_length: u8,
    /// Random draws before giving up on a unique IPv6 CIDR
    pub ipv6_assignment_attempts: u32,
    /// Provision an IPv6 subnet for every new tenant network
    pub auto_ipv6: bool,
    /// Seed system port aliases on tenant network creation
    pub auto_add_resources: bool,
    /// Name prefix of routers created on behalf of a tenant
    pub router_name_prefix: String,
    /// Tenant owning system aliases
    pub platform_tenant: String,
    /// Per-tenant limit for the `portalias` quota resource
    pub portalias_quota: u32,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            ipv6_tenant_range: DEFAULT_IPV6_TENANT_RANGE
                .parse()
                .expect("default IPv6 tenant range is valid"),
            ipv6_prefix_length: DEFAULT_IPV6_PREFIX_LENGTH,
            ipv6_assignment_attempts: DEFAULT_IPV6_ASSIGNMENT_ATTEMPTS,
            auto_ipv6: true,
            auto_add_resources: true,
            router_name_prefix: DEFAULT_ROUTER_NAME_PREFIX.to_string(),
            platform_tenant: DEFAULT_PLATFORM_TENANT.to_string(),
            portalias_quota: DEFAULT_PORTALIAS_QUOTA,
        }
    }
}

impl ReconcilerConfig {
    /// Build the configuration from `NETREC_*` environment variables
    pub fn from_env() -> Result<Self> {
        let range = get_config("NETREC_IPV6_TENANT_RANGE", DEFAULT_IPV6_TENANT_RANGE);
        let ipv6_tenant_range = range
            .parse::<Ipv6Network>()
            .map_err(|e| Error::config(format!("NETREC_IPV6_TENANT_RANGE {range}: {e}")))?;

        let config = Self {
            ipv6_tenant_range,
            ipv6_prefix_length: get_config_num(
                "NETREC_IPV6_PREFIX_LENGTH",
                DEFAULT_IPV6_PREFIX_LENGTH,
            )?,
            ipv6_assignment_attempts: get_config_num(
                "NETREC_IPV6_ASSIGNMENT_ATTEMPTS",
                DEFAULT_IPV6_ASSIGNMENT_ATTEMPTS,
            )?,
            auto_ipv6: get_config_bool("NETREC_AUTO_IPV6", true)?,
            auto_add_resources: get_config_bool("NETREC_AUTO_ADD_RESOURCES", true)?,
            router_name_prefix: get_config("NETREC_ROUTER_NAME_PREFIX", DEFAULT_ROUTER_NAME_PREFIX),
            platform_tenant: get_config("NETREC_PLATFORM_TENANT", DEFAULT_PLATFORM_TENANT),
            portalias_quota: get_config_num("NETREC_PORTALIAS_QUOTA", DEFAULT_PORTALIAS_QUOTA)?,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.ipv6_prefix_length < self.ipv6_tenant_range.prefix() {
            return Err(Error::config(format!(
                "IPv6 prefix length /{} must be longer than the tenant range {}",
                self.ipv6_prefix_length, self.ipv6_tenant_range
            )));
        }
        if self.ipv6_assignment_attempts == 0 {
            return Err(Error::config("IPv6 assignment attempts must be positive"));
        }
        if self.platform_tenant.is_empty() {
            return Err(Error::config("platform tenant must not be empty"));
        }
        Ok(())
    }
}
