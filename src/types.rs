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

//! Core value types shared by the arbitrators and domain controls.

use std::cmp::Ordering;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Result, ThermarbError};

/// Identifies one registered policy instance for its lifetime.
///
/// Only used as a map key; the caller owns assignment and retirement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PolicyId(pub u32);

impl fmt::Display for PolicyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "policy{}", self.0)
    }
}

impl From<u32> for PolicyId {
    fn from(v: u32) -> Self {
        PolicyId(v)
    }
}

/// Fan speed or duty cycle in percent (0.0 - 100.0)
///
/// Always finite and never negative zero, which makes the total order below
/// agree with equality.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "f32", into = "f32")]
pub struct Percentage(f32);

impl Percentage {
    pub const ZERO: Percentage = Percentage(0.0);
    pub const FULL: Percentage = Percentage(100.0);

    pub fn new(value: f32) -> Result<Self> {
        if !value.is_finite() || !(0.0..=100.0).contains(&value) {
            return Err(ThermarbError::InvalidPercentage { value });
        }
        // -0.0 passes the range check; store it as +0.0
        Ok(Percentage(if value == 0.0 { 0.0 } else { value }))
    }

    pub fn value(self) -> f32 {
        self.0
    }
}

impl Eq for Percentage {}

impl PartialOrd for Percentage {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Percentage {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.total_cmp(&other.0)
    }
}

impl TryFrom<f32> for Percentage {
    type Error = ThermarbError;

    fn try_from(value: f32) -> Result<Self> {
        Percentage::new(value)
    }
}

impl From<Percentage> for f32 {
    fn from(p: Percentage) -> f32 {
        p.0
    }
}

impl fmt::Display for Percentage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.0}%", self.0)
    }
}

/// Power limit in milliwatts
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Milliwatts(pub u32);

impl fmt::Display for Milliwatts {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}mW", self.0)
    }
}

/// Time window in milliseconds
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Milliseconds(pub u32);

impl fmt::Display for Milliseconds {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}ms", self.0)
    }
}

/// Index into a domain's performance control set.
///
/// Index 0 is the most permissive (highest performance) state. The ordering
/// is inverted so that a *greater* `PerformanceIndex` means *more*
/// performance, which lets the generic bounded-range reduction treat
/// `(lower_limit_index, upper_limit_index)` as an ordinary `(min, max)` pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PerformanceIndex(pub u32);

impl PerformanceIndex {
    pub fn index(self) -> u32 {
        self.0
    }
}

impl PartialOrd for PerformanceIndex {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for PerformanceIndex {
    fn cmp(&self, other: &Self) -> Ordering {
        other.0.cmp(&self.0)
    }
}

impl fmt::Display for PerformanceIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "P{}", self.0)
    }
}

/// A control a domain may or may not have.
#[derive(Debug, Clone, PartialEq)]
pub enum Capability<T> {
    Present(T),
    Absent,
}

impl<T> Capability<T> {
    pub fn is_present(&self) -> bool {
        matches!(self, Capability::Present(_))
    }

    pub fn as_ref(&self) -> Capability<&T> {
        match self {
            Capability::Present(t) => Capability::Present(t),
            Capability::Absent => Capability::Absent,
        }
    }

    /// Borrow the control, or reject `operation` if the domain lacks it
    pub fn present(&self, operation: &str, control: &str) -> Result<&T> {
        match self {
            Capability::Present(t) => Ok(t),
            Capability::Absent => Err(ThermarbError::rejected(
                operation,
                format!("{} control not present", control),
            )),
        }
    }

    pub fn present_mut(&mut self, operation: &str, control: &str) -> Result<&mut T> {
        match self {
            Capability::Present(t) => Ok(t),
            Capability::Absent => Err(ThermarbError::rejected(
                operation,
                format!("{} control not present", control),
            )),
        }
    }
}

impl<T> From<Option<T>> for Capability<T> {
    fn from(opt: Option<T>) -> Self {
        match opt {
            Some(t) => Capability::Present(t),
            None => Capability::Absent,
        }
    }
}

/// Arbitrated value before and after a commit
///
/// Returned by every domain setter so the owner of the hardware knows
/// whether it has to be reprogrammed.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ArbitrationChange<T> {
    pub previous: T,
    pub current: T,
}

impl<T: PartialEq> ArbitrationChange<T> {
    pub fn new(previous: T, current: T) -> Self {
        Self { previous, current }
    }

    pub fn changed(&self) -> bool {
        self.previous != self.current
    }
}
