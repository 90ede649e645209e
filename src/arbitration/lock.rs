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

//! Logical-OR lock arbitration

use serde::Serialize;

use super::PolicyRequest;
use crate::ledger::RequestLedger;
use crate::types::{ArbitrationChange, PolicyId};

/// Locked while at least one policy asks for the lock.
///
/// The flag is only reported; refusing to reprogram a locked control is up
/// to whoever drives the hardware.
#[derive(Debug, Clone, Default)]
pub struct LockArbitrator {
    requests: RequestLedger<bool>,
}

#[derive(Debug, Clone, Serialize)]
pub struct LockStatus {
    pub requests: Vec<PolicyRequest<bool>>,
    pub locked: bool,
}

impl LockArbitrator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn commit(&mut self, id: PolicyId, lock: bool) -> ArbitrationChange<bool> {
        let previous = self.arbitrated_value();
        self.requests.commit(id, lock);
        ArbitrationChange::new(previous, self.arbitrated_value())
    }

    pub fn remove(&mut self, id: PolicyId) -> ArbitrationChange<bool> {
        let previous = self.arbitrated_value();
        self.requests.remove(id);
        ArbitrationChange::new(previous, self.arbitrated_value())
    }

    pub fn arbitrated_value(&self) -> bool {
        self.requests.snapshot().values().any(|locked| locked)
    }

    pub fn dry_run(&self, id: PolicyId, candidate: bool) -> bool {
        self.requests
            .snapshot()
            .values_with(id, candidate)
            .any(|locked| locked)
    }

    pub fn request(&self, id: PolicyId) -> bool {
        self.requests.snapshot().get(id).copied().unwrap_or(false)
    }

    pub fn status(&self) -> LockStatus {
        LockStatus {
            requests: self
                .requests
                .snapshot()
                .iter()
                .map(|(policy, locked)| PolicyRequest { policy, request: *locked })
                .collect(),
            locked: self.arbitrated_value(),
        }
    }
}
