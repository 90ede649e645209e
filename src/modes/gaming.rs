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

//! Gaming mode resolution
//!
//! Priority, first match wins:
//!
//! 1. `MaxPerformance` when whitelisted, application optimization is active
//!    and the platform runs on AC
//! 2. `EnduranceGaming` when whitelisted, endurance gaming is on and the
//!    platform runs on DC
//! 3. `Invalid` otherwise

use std::collections::BTreeSet;

use serde::Serialize;

use super::rules::{evaluate, Rule};
use super::SupportedModeSet;
use tarb_protocol::{EnduranceGamingStatus, EventKind, GamingMode, PowerSource};

const RULES: &[Rule<GamingModeResolver, GamingMode>] = &[
    Rule {
        name: "max_performance",
        applies: max_performance_applies,
        mode: GamingMode::MaxPerformance,
    },
    Rule {
        name: "endurance_gaming",
        applies: endurance_gaming_applies,
        mode: GamingMode::EnduranceGaming,
    },
];

fn max_performance_applies(r: &GamingModeResolver) -> bool {
    r.supported.contains(GamingMode::MaxPerformance)
        && r.application_optimization_active
        && r.power_source == PowerSource::Ac
}

fn endurance_gaming_applies(r: &GamingModeResolver) -> bool {
    r.supported.contains(GamingMode::EnduranceGaming)
        && r.endurance_gaming.is_active()
        && r.power_source == PowerSource::Dc
}

#[derive(Debug, Clone)]
pub struct GamingModeResolver {
    supported: SupportedModeSet<GamingMode>,
    power_source: PowerSource,
    application_optimization_active: bool,
    endurance_gaming: EnduranceGamingStatus,
}

#[derive(Debug, Clone, Serialize)]
pub struct GamingModeStatus {
    pub supported_modes: SupportedModeSet<GamingMode>,
    pub power_source: PowerSource,
    pub application_optimization_active: bool,
    pub endurance_gaming: EnduranceGamingStatus,
    pub resolved: GamingMode,
}

impl GamingModeResolver {
    /// Signals start neutral: unknown power source, everything inactive
    pub fn new(supported: SupportedModeSet<GamingMode>) -> Self {
        Self {
            supported,
            power_source: PowerSource::Invalid,
            application_optimization_active: false,
            endurance_gaming: EnduranceGamingStatus::Off,
        }
    }

    pub fn supported_modes(&self) -> &SupportedModeSet<GamingMode> {
        &self.supported
    }

    pub fn update_power_source(&mut self, source: PowerSource) {
        self.power_source = source;
    }

    pub fn update_application_optimization(&mut self, active: bool) {
        self.application_optimization_active = active;
    }

    pub fn update_endurance_gaming(&mut self, status: EnduranceGamingStatus) {
        self.endurance_gaming = status;
    }

    pub fn resolve(&self) -> GamingMode {
        evaluate(RULES, self, GamingMode::Invalid)
    }

    /// Events whose signals can influence the result under this whitelist
    pub fn required_events(&self) -> BTreeSet<EventKind> {
        let mut events = BTreeSet::new();
        if self.supported.is_empty() {
            return events;
        }
        events.insert(EventKind::PowerSourceChanged);
        if self.supported.contains(GamingMode::MaxPerformance) {
            events.insert(EventKind::ApplicationOptimizationChanged);
        }
        if self.supported.contains(GamingMode::EnduranceGaming) {
            events.insert(EventKind::EnduranceGamingStatus);
        }
        events
    }

    pub fn status(&self) -> GamingModeStatus {
        GamingModeStatus {
            supported_modes: self.supported.clone(),
            power_source: self.power_source,
            application_optimization_active: self.application_optimization_active,
            endurance_gaming: self.endurance_gaming,
            resolved: self.resolve(),
        }
    }
}
