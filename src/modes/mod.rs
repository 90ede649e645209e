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

//! Mode resolution
//!
//! Two resolvers derive one enumerated operating mode each from a handful of
//! independently updated signals:
//!
//! - [`GamingModeResolver`]: power source, application optimization and
//!   endurance gaming status
//! - [`ScenarioModeResolver`]: collaboration, workload prediction and the
//!   live gaming mode
//!
//! Both only resolve to modes present in their [`SupportedModeSet`], fixed at
//! startup from configuration.

pub mod gaming;
pub mod rules;
pub mod scenario;

use std::collections::BTreeSet;
use std::fmt;

use serde::Serialize;

pub use gaming::{GamingModeResolver, GamingModeStatus};
pub use rules::Rule;
pub use scenario::{ScenarioModeResolver, ScenarioModeStatus};

/// Whitelist of modes a resolver may produce; immutable once built
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct SupportedModeSet<M: Ord> {
    modes: BTreeSet<M>,
}

impl<M: Ord + Copy> SupportedModeSet<M> {
    pub fn contains(&self, mode: M) -> bool {
        self.modes.contains(&mode)
    }

    pub fn is_empty(&self) -> bool {
        self.modes.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = M> + '_ {
        self.modes.iter().copied()
    }
}

impl<M: Ord> FromIterator<M> for SupportedModeSet<M> {
    fn from_iter<I: IntoIterator<Item = M>>(iter: I) -> Self {
        Self {
            modes: iter.into_iter().collect(),
        }
    }
}

impl<M: Ord + fmt::Display> fmt::Display for SupportedModeSet<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.modes.is_empty() {
            return f.write_str("None");
        }
        for (i, mode) in self.modes.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{}", mode)?;
        }
        Ok(())
    }
}
