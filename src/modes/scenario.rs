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

//! Scenario mode resolution
//!
//! Priority, first match wins:
//!
//! 1. `Gaming` when whitelisted and the gaming mode is not `Invalid`
//! 2. `Collaboration` when whitelisted and collaboration is enabled
//! 3. `EwpCoolAndQuiet` / `EwpPerformance` when whitelisted and the workload
//!    prediction matches
//! 4. `Invalid` otherwise
//!
//! The gaming mode is an input here, fed in by the publisher before every
//! evaluation. Nothing flows back into the gaming resolver.

use std::collections::BTreeSet;

use serde::Serialize;

use super::rules::{evaluate, Rule};
use super::SupportedModeSet;
use tarb_protocol::{EventKind, GamingMode, ScenarioMode, WorkloadPrediction};

const RULES: &[Rule<ScenarioModeResolver, ScenarioMode>] = &[
    Rule {
        name: "gaming",
        applies: |r| r.supported.contains(ScenarioMode::Gaming) && r.gaming_mode != GamingMode::Invalid,
        mode: ScenarioMode::Gaming,
    },
    Rule {
        name: "collaboration",
        applies: |r| r.supported.contains(ScenarioMode::Collaboration) && r.collaboration_enabled,
        mode: ScenarioMode::Collaboration,
    },
    Rule {
        name: "ewp_cool_and_quiet",
        applies: |r| {
            r.supported.contains(ScenarioMode::EwpCoolAndQuiet)
                && r.workload_prediction == WorkloadPrediction::CoolAndQuiet
        },
        mode: ScenarioMode::EwpCoolAndQuiet,
    },
    Rule {
        name: "ewp_performance",
        applies: |r| {
            r.supported.contains(ScenarioMode::EwpPerformance)
                && r.workload_prediction == WorkloadPrediction::Performance
        },
        mode: ScenarioMode::EwpPerformance,
    },
];

#[derive(Debug, Clone)]
pub struct ScenarioModeResolver {
    supported: SupportedModeSet<ScenarioMode>,
    collaboration_enabled: bool,
    workload_prediction: WorkloadPrediction,
    gaming_mode: GamingMode,
}

#[derive(Debug, Clone, Serialize)]
pub struct ScenarioModeStatus {
    pub supported_modes: SupportedModeSet<ScenarioMode>,
    pub collaboration_enabled: bool,
    pub workload_prediction: WorkloadPrediction,
    pub gaming_mode: GamingMode,
    pub resolved: ScenarioMode,
}

impl ScenarioModeResolver {
    pub fn new(supported: SupportedModeSet<ScenarioMode>) -> Self {
        Self {
            supported,
            collaboration_enabled: false,
            workload_prediction: WorkloadPrediction::Unknown,
            gaming_mode: GamingMode::Invalid,
        }
    }

    pub fn supported_modes(&self) -> &SupportedModeSet<ScenarioMode> {
        &self.supported
    }

    pub fn update_collaboration(&mut self, enabled: bool) {
        self.collaboration_enabled = enabled;
    }

    pub fn update_workload_prediction(&mut self, prediction: WorkloadPrediction) {
        self.workload_prediction = prediction;
    }

    pub fn update_gaming_mode(&mut self, mode: GamingMode) {
        self.gaming_mode = mode;
    }

    pub fn resolve(&self) -> ScenarioMode {
        evaluate(RULES, self, ScenarioMode::Invalid)
    }

    /// Events feeding this resolver's own signals under this whitelist
    pub fn required_events(&self) -> BTreeSet<EventKind> {
        let mut events = BTreeSet::new();
        if self.supported.contains(ScenarioMode::Collaboration) {
            events.insert(EventKind::CollaborationChanged);
        }
        if self.supported.contains(ScenarioMode::EwpCoolAndQuiet)
            || self.supported.contains(ScenarioMode::EwpPerformance)
        {
            events.insert(EventKind::WorkloadPredictionChanged);
        }
        events
    }

    pub fn status(&self) -> ScenarioModeStatus {
        ScenarioModeStatus {
            supported_modes: self.supported.clone(),
            collaboration_enabled: self.collaboration_enabled,
            workload_prediction: self.workload_prediction,
            gaming_mode: self.gaming_mode,
            resolved: self.resolve(),
        }
    }
}
