/*
 * This file is part of Thermarb.
 *
 * Copyright (C) 2025 Thermarb contributors
 *
 * Thermarb is free software: you can redistribute it and/or modify
 * it under the terms of the GNU General Public License as published by
 * the Free Software Foundation, either version 3 of the License, or
 * (at your option) any later version.
 *
 * Thermarb is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
 * GNU General Public License for more details.
 *
 * You should have received a copy of the GNU General Public License
 * along with Thermarb. If not, see <https://www.gnu.org/licenses/>.
 */

//! Engine configuration
//!
//! Loaded once at startup from `thermarb.json`. The file is looked up via
//! `THERMARB_CONFIG`, then `/etc/thermarb/thermarb.json`, then the user
//! configuration directory. A missing file yields the defaults: nothing
//! whitelisted and no domains.

use std::collections::{BTreeMap, HashSet};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::constants::{limits, paths};
use crate::error::{Result, ThermarbError};
use tarb_protocol::{GamingMode, PowerLimitType, ScenarioMode};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ThermarbConfig {
    /// Scenario modes this platform may enter
    #[serde(default)]
    pub supported_scenario_modes: Vec<ScenarioMode>,
    /// Gaming modes this platform may enter
    #[serde(default)]
    pub supported_gaming_modes: Vec<GamingMode>,
    #[serde(default)]
    pub domains: Vec<DomainConfig>,
}

/// One participant domain and the controls it exposes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DomainConfig {
    pub name: String,
    #[serde(default)]
    pub fan: Option<FanConfig>,
    #[serde(default)]
    pub performance: Option<PerformanceConfig>,
    #[serde(default)]
    pub power_limits: BTreeMap<PowerLimitType, PowerLimitRange>,
}

/// Presence marker for an active cooling control
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FanConfig {}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PerformanceConfig {
    /// Number of entries in the performance control set
    pub control_set_depth: u32,
}

/// Widest permitted bounds of one power limit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PowerLimitRange {
    pub min_mw: u32,
    pub max_mw: u32,
}

// ============================================================================
// Path Resolution
// ============================================================================

fn system_config_path() -> PathBuf {
    Path::new(paths::CONFIG_DIR).join(paths::CONFIG_FILE)
}

fn user_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join(paths::APP_DIR).join(paths::CONFIG_FILE))
}

/// Path the configuration is read from.
///
/// `THERMARB_CONFIG` wins when set. Otherwise the first existing file of the
/// system and user locations is used, falling back to the system path.
pub fn get_config_path() -> PathBuf {
    if let Ok(path) = env::var(paths::CONFIG_ENV) {
        if !path.is_empty() {
            return PathBuf::from(path);
        }
    }

    let system = system_config_path();
    if system.exists() {
        return system;
    }
    match user_config_path() {
        Some(user) if user.exists() => user,
        _ => system,
    }
}

// ============================================================================
// Loading
// ============================================================================

pub fn load_config() -> Result<ThermarbConfig> {
    load_config_from(&get_config_path())
}

pub fn load_config_from(path: &Path) -> Result<ThermarbConfig> {
    if !path.exists() {
        info!(path = %path.display(), "No configuration file, using defaults");
        return Ok(ThermarbConfig::default());
    }

    validate_file_size(path)?;

    let content = fs::read_to_string(path).map_err(|source| ThermarbError::FileRead {
        path: path.to_path_buf(),
        source,
    })?;
    let config: ThermarbConfig = serde_json::from_str(&content)?;
    validate_config(&config)?;

    debug!(
        path = %path.display(),
        domains = config.domains.len(),
        "Loaded configuration"
    );
    Ok(config)
}

fn validate_file_size(path: &Path) -> Result<()> {
    let metadata = fs::metadata(path).map_err(|source| ThermarbError::FileRead {
        path: path.to_path_buf(),
        source,
    })?;

    if metadata.len() > limits::MAX_CONFIG_SIZE {
        return Err(ThermarbError::FileTooLarge {
            path: path.to_path_buf(),
            size: metadata.len(),
            max_size: limits::MAX_CONFIG_SIZE,
        });
    }
    Ok(())
}

// ============================================================================
// Validation
// ============================================================================

pub fn validate_config(config: &ThermarbConfig) -> Result<()> {
    if config.supported_scenario_modes.contains(&ScenarioMode::Invalid) {
        return Err(ThermarbError::invalid_config(
            "supported_scenario_modes",
            "Invalid is not a selectable mode",
        ));
    }
    if config.supported_gaming_modes.contains(&GamingMode::Invalid) {
        return Err(ThermarbError::invalid_config(
            "supported_gaming_modes",
            "Invalid is not a selectable mode",
        ));
    }

    if config.domains.len() > limits::MAX_DOMAINS {
        return Err(ThermarbError::invalid_config(
            "domains",
            format!("too many domains (max {})", limits::MAX_DOMAINS),
        ));
    }

    let mut seen = HashSet::new();
    for domain in &config.domains {
        validate_domain(domain)?;
        if !seen.insert(domain.name.as_str()) {
            return Err(ThermarbError::invalid_config(
                "domains",
                format!("duplicate domain name '{}'", domain.name),
            ));
        }
    }
    Ok(())
}

fn validate_domain(domain: &DomainConfig) -> Result<()> {
    let name = domain.name.trim();
    if name.is_empty() {
        return Err(ThermarbError::invalid_config("domains.name", "name cannot be empty"));
    }
    if domain.name.len() > limits::MAX_DOMAIN_NAME_LENGTH {
        return Err(ThermarbError::invalid_config(
            "domains.name",
            format!("'{}' exceeds {} characters", domain.name, limits::MAX_DOMAIN_NAME_LENGTH),
        ));
    }

    if let Some(perf) = &domain.performance {
        if perf.control_set_depth == 0 || perf.control_set_depth > limits::MAX_CONTROL_SET_DEPTH {
            return Err(ThermarbError::invalid_config(
                format!("{}.performance.control_set_depth", domain.name),
                format!(
                    "must be between 1 and {}, got {}",
                    limits::MAX_CONTROL_SET_DEPTH,
                    perf.control_set_depth
                ),
            ));
        }
    }

    for (limit_type, range) in &domain.power_limits {
        if range.min_mw > range.max_mw {
            return Err(ThermarbError::invalid_config(
                format!("{}.power_limits.{}", domain.name, limit_type),
                format!("min_mw {} exceeds max_mw {}", range.min_mw, range.max_mw),
            ));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::io::Write;
    use tempfile::{NamedTempFile, TempDir};

    fn write_config(json: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(json.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_missing_file_yields_defaults() {
        let dir = TempDir::new().unwrap();
        let config = load_config_from(&dir.path().join("absent.json")).unwrap();
        assert_eq!(config, ThermarbConfig::default());
    }

    #[test]
    fn test_load_full_config() {
        let file = write_config(
            r#"{
                "supported_scenario_modes": ["gaming", "collaboration"],
                "supported_gaming_modes": ["max_performance"],
                "domains": [
                    {"name": "cpu", "performance": {"control_set_depth": 8},
                     "power_limits": {"pl1": {"min_mw": 5000, "max_mw": 28000}}},
                    {"name": "fan0", "fan": {}}
                ]
            }"#,
        );
        let config = load_config_from(file.path()).unwrap();
        assert_eq!(config.supported_scenario_modes.len(), 2);
        assert_eq!(config.domains.len(), 2);
        assert_eq!(
            config.domains[0].power_limits[&PowerLimitType::Pl1],
            PowerLimitRange { min_mw: 5000, max_mw: 28000 }
        );
        assert!(config.domains[1].fan.is_some());
    }

    #[test]
    fn test_unknown_field_rejected() {
        let file = write_config(r#"{"supported_gaming_modes": [], "turbo": true}"#);
        assert!(matches!(
            load_config_from(file.path()),
            Err(ThermarbError::JsonParse(_))
        ));
    }

    #[test]
    fn test_oversized_file_rejected() {
        let mut file = NamedTempFile::new().unwrap();
        let padding = vec![b' '; (limits::MAX_CONFIG_SIZE + 1) as usize];
        file.write_all(&padding).unwrap();
        assert!(matches!(
            load_config_from(file.path()),
            Err(ThermarbError::FileTooLarge { .. })
        ));
    }

    #[test]
    fn test_validation_rejects_bad_domains() {
        let dup = ThermarbConfig {
            domains: vec![
                DomainConfig { name: "cpu".into(), fan: None, performance: None, power_limits: BTreeMap::new() },
                DomainConfig { name: "cpu".into(), fan: None, performance: None, power_limits: BTreeMap::new() },
            ],
            ..Default::default()
        };
        assert!(validate_config(&dup).is_err());

        let empty = ThermarbConfig {
            domains: vec![DomainConfig { name: " ".into(), fan: None, performance: None, power_limits: BTreeMap::new() }],
            ..Default::default()
        };
        assert!(validate_config(&empty).is_err());

        let zero_depth = ThermarbConfig {
            domains: vec![DomainConfig {
                name: "gpu".into(),
                fan: None,
                performance: Some(PerformanceConfig { control_set_depth: 0 }),
                power_limits: BTreeMap::new(),
            }],
            ..Default::default()
        };
        assert!(validate_config(&zero_depth).is_err());

        let mut limits = BTreeMap::new();
        limits.insert(PowerLimitType::Pl2, PowerLimitRange { min_mw: 9000, max_mw: 1000 });
        let inverted = ThermarbConfig {
            domains: vec![DomainConfig { name: "soc".into(), fan: None, performance: None, power_limits: limits }],
            ..Default::default()
        };
        assert!(validate_config(&inverted).is_err());
    }

    #[test]
    fn test_invalid_mode_not_whitelistable() {
        let config = ThermarbConfig {
            supported_scenario_modes: vec![ScenarioMode::Invalid],
            ..Default::default()
        };
        assert!(validate_config(&config).is_err());
    }

    #[test]
    #[serial]
    fn test_env_override_path() {
        let file = write_config(r#"{"supported_scenario_modes": ["gaming"]}"#);
        env::set_var(paths::CONFIG_ENV, file.path());
        assert_eq!(get_config_path(), file.path());
        let config = load_config().unwrap();
        env::remove_var(paths::CONFIG_ENV);
        assert_eq!(config.supported_scenario_modes, vec![ScenarioMode::Gaming]);
    }
}
