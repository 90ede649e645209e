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

//! Performance capability bounds
//!
//! Performance states are addressed by index into the domain's control set,
//! index 0 being the most permissive. A policy caps the set with an
//! `upper_limit_index` (the most permissive state it allows) and a
//! `lower_limit_index` (the least permissive). After arbitration
//! `upper_limit_index <= lower_limit_index` always holds.

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::bounded_range::{BoundedRangeArbitrator, Bounds, RangeRequest, RangeStatus};
use super::lock::{LockArbitrator, LockStatus};
use crate::error::{Result, ThermarbError};
use crate::types::{ArbitrationChange, PerformanceIndex, PolicyId};

/// Arbitrated capability window over a control set
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapabilityBounds {
    pub upper_limit_index: u32,
    pub lower_limit_index: u32,
}

impl From<Bounds<PerformanceIndex>> for CapabilityBounds {
    fn from(b: Bounds<PerformanceIndex>) -> Self {
        // max is the most permissive end, i.e. the upper limit
        Self {
            upper_limit_index: b.max.index(),
            lower_limit_index: b.min.index(),
        }
    }
}

/// One policy's capability request; unset limits default to the widest
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CapabilityRequest {
    pub upper_limit_index: Option<u32>,
    pub lower_limit_index: Option<u32>,
}

impl CapabilityRequest {
    fn to_range(self) -> RangeRequest<PerformanceIndex> {
        RangeRequest::new(
            self.lower_limit_index.map(PerformanceIndex),
            self.upper_limit_index.map(PerformanceIndex),
        )
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CapabilityBoundsStatus {
    pub control_set_depth: u32,
    pub bounds: RangeStatus<PerformanceIndex>,
    pub arbitrated: CapabilityBounds,
    pub lock: LockStatus,
}

#[derive(Debug, Clone)]
pub struct CapabilityBoundsArbitrator {
    depth: u32,
    bounds: BoundedRangeArbitrator<PerformanceIndex>,
    lock: LockArbitrator,
}

impl CapabilityBoundsArbitrator {
    /// Arbitrator for a control set with `depth` entries (at least one)
    pub fn new(depth: u32) -> Result<Self> {
        if depth == 0 {
            return Err(ThermarbError::invalid_config(
                "control_set_depth",
                "control set must have at least one entry",
            ));
        }
        let widest = Bounds::new(PerformanceIndex(depth - 1), PerformanceIndex(0));
        Ok(Self {
            depth,
            bounds: BoundedRangeArbitrator::new(widest),
            lock: LockArbitrator::new(),
        })
    }

    pub fn depth(&self) -> u32 {
        self.depth
    }

    fn check(&self, request: &CapabilityRequest) -> Result<()> {
        for index in [request.upper_limit_index, request.lower_limit_index].into_iter().flatten() {
            if index >= self.depth {
                return Err(ThermarbError::InvalidControlIndex {
                    index,
                    depth: self.depth,
                });
            }
        }
        Ok(())
    }

    pub fn commit_bounds(
        &mut self,
        id: PolicyId,
        request: CapabilityRequest,
    ) -> Result<ArbitrationChange<CapabilityBounds>> {
        self.check(&request)?;
        let change = self.bounds.commit(id, request.to_range());
        let change = ArbitrationChange::new(change.previous.into(), change.current.into());
        if change.changed() {
            debug!(policy = %id, ?request, arbitrated = ?change.current, "Capability bounds changed");
        }
        Ok(change)
    }

    pub fn remove_bounds(&mut self, id: PolicyId) -> ArbitrationChange<CapabilityBounds> {
        let change = self.bounds.remove(id);
        ArbitrationChange::new(change.previous.into(), change.current.into())
    }

    pub fn commit_lock(&mut self, id: PolicyId, lock: bool) -> ArbitrationChange<bool> {
        self.lock.commit(id, lock)
    }

    pub fn remove_lock(&mut self, id: PolicyId) -> ArbitrationChange<bool> {
        self.lock.remove(id)
    }

    /// Withdraw both the bounds and the lock request of `id`
    pub fn remove_policy(&mut self, id: PolicyId) {
        self.bounds.remove(id);
        self.lock.remove(id);
    }

    pub fn arbitrated_bounds(&self) -> CapabilityBounds {
        self.bounds.arbitrated_value().into()
    }

    pub fn arbitrated_lock(&self) -> bool {
        self.lock.arbitrated_value()
    }

    pub fn dry_run_bounds(&self, id: PolicyId, request: CapabilityRequest) -> Result<CapabilityBounds> {
        self.check(&request)?;
        Ok(self.bounds.dry_run(id, request.to_range()).into())
    }

    pub fn dry_run_lock(&self, id: PolicyId, lock: bool) -> bool {
        self.lock.dry_run(id, lock)
    }

    pub fn status(&self) -> CapabilityBoundsStatus {
        CapabilityBoundsStatus {
            control_set_depth: self.depth,
            bounds: self.bounds.status(),
            arbitrated: self.arbitrated_bounds(),
            lock: self.lock.status(),
        }
    }
}
