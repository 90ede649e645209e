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

//! Lowest-request-wins arbitration

use serde::Serialize;
use tracing::trace;

use super::PolicyRequest;
use crate::ledger::RequestLedger;
use crate::types::{ArbitrationChange, PolicyId};

/// Reduces all committed requests to their minimum.
///
/// Until some policy asks for a value there is nothing to arbitrate and the
/// result is `None`; the owner decides what an unrequested control means.
#[derive(Debug, Clone)]
pub struct MinValueArbitrator<T> {
    requests: RequestLedger<T>,
}

#[derive(Debug, Clone, Serialize)]
pub struct MinValueStatus<T> {
    pub requests: Vec<PolicyRequest<T>>,
    pub arbitrated: Option<T>,
}

impl<T> Default for MinValueArbitrator<T> {
    fn default() -> Self {
        Self {
            requests: RequestLedger::new(),
        }
    }
}

impl<T: Copy + Ord + std::fmt::Debug> MinValueArbitrator<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn commit(&mut self, id: PolicyId, value: T) -> ArbitrationChange<Option<T>> {
        let previous = self.arbitrated_value();
        self.requests.commit(id, value);
        let current = self.arbitrated_value();
        trace!(policy = %id, request = ?value, arbitrated = ?current, "Committed min-value request");
        ArbitrationChange::new(previous, current)
    }

    pub fn remove(&mut self, id: PolicyId) -> ArbitrationChange<Option<T>> {
        let previous = self.arbitrated_value();
        self.requests.remove(id);
        ArbitrationChange::new(previous, self.arbitrated_value())
    }

    pub fn arbitrated_value(&self) -> Option<T> {
        self.requests.snapshot().values().min()
    }

    /// Arbitrated value if `id` committed `candidate`; nothing is stored
    pub fn dry_run(&self, id: PolicyId, candidate: T) -> Option<T> {
        self.requests.snapshot().values_with(id, candidate).min()
    }

    pub fn request(&self, id: PolicyId) -> Option<T> {
        self.requests.snapshot().get(id).copied()
    }

    pub fn status(&self) -> MinValueStatus<T> {
        MinValueStatus {
            requests: self
                .requests
                .snapshot()
                .iter()
                .map(|(policy, v)| PolicyRequest { policy, request: *v })
                .collect(),
            arbitrated: self.arbitrated_value(),
        }
    }
}
