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

//! Constants and defaults for Thermarb
//!
//! Paths, limits and arbitration defaults live here so the rest of the
//! crate never hard-codes them.

/// Configuration locations
pub mod paths {
    /// Environment variable that overrides the configuration path
    pub const CONFIG_ENV: &str = "THERMARB_CONFIG";

    /// System-wide configuration directory
    pub const CONFIG_DIR: &str = "/etc/thermarb";

    /// Configuration file name, both system-wide and per-user
    pub const CONFIG_FILE: &str = "thermarb.json";

    /// Directory name under the user configuration directory
    pub const APP_DIR: &str = "thermarb";
}

/// Size and count limits
pub mod limits {
    /// Largest configuration file accepted (256 KiB)
    pub const MAX_CONFIG_SIZE: u64 = 256 * 1024;

    /// Most domains a configuration may declare
    pub const MAX_DOMAINS: usize = 64;

    /// Longest domain name accepted
    pub const MAX_DOMAIN_NAME_LENGTH: usize = 64;

    /// Deepest performance control set accepted
    pub const MAX_CONTROL_SET_DEPTH: u32 = 256;
}

/// Arbitration defaults applied while no policy has an opinion
pub mod defaults {
    use crate::types::Percentage;

    /// Fan speed with no requests
    pub const FAN_SPEED: Percentage = Percentage::ZERO;

    /// Lowest permitted fan speed cap
    pub const FAN_MIN_CAP: Percentage = Percentage::ZERO;

    /// Highest permitted fan speed cap
    pub const FAN_MAX_CAP: Percentage = Percentage::FULL;

    /// Log prefix carried by every mode publisher line
    pub const MODE_LOG_PREFIX: &str = "[ScenarioMode]";
}
