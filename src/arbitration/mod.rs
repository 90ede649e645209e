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

//! Conflict-resolution primitives
//!
//! # Features
//!
//! - **Max value**: the highest request wins (fan speed)
//! - **Min value**: the lowest request wins (power limit, time window and
//!   duty cycle)
//! - **Bounded range**: tightest common interval, clamped to a single point
//!   when requests do not overlap (speed caps, power limit caps)
//! - **Lock**: logical OR over per-policy lock flags
//! - **Capability bounds**: bounded range over a performance control set
//!   plus its lock
//!
//! Every arbitrator keeps its requests in a [`RequestLedger`](crate::ledger::RequestLedger),
//! recomputes its arbitrated value on demand and offers a side-effect free
//! `dry_run` for "what would happen if" queries.

pub mod bounded_range;
pub mod capabilities;
pub mod lock;
pub mod max_value;
pub mod min_value;

use serde::Serialize;

use crate::types::PolicyId;

pub use bounded_range::{BoundedRangeArbitrator, Bounds, RangeRequest, RangeStatus};
pub use capabilities::{
    CapabilityBounds, CapabilityBoundsArbitrator, CapabilityBoundsStatus, CapabilityRequest,
};
pub use lock::{LockArbitrator, LockStatus};
pub use max_value::{MaxValueArbitrator, MaxValueStatus};
pub use min_value::{MinValueArbitrator, MinValueStatus};

/// One policy's request as shown in diagnostics
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PolicyRequest<T> {
    pub policy: PolicyId,
    pub request: T,
}
