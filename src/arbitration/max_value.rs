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

//! Highest-request-wins arbitration

use serde::Serialize;
use tracing::trace;

use super::PolicyRequest;
use crate::ledger::RequestLedger;
use crate::types::{ArbitrationChange, PolicyId};

/// Reduces all committed requests to their maximum.
///
/// With no requests the configured default applies (0% for fan speed).
/// Equal requests from different policies are not a conflict.
#[derive(Debug, Clone)]
pub struct MaxValueArbitrator<T> {
    requests: RequestLedger<T>,
    default: T,
}

#[derive(Debug, Clone, Serialize)]
pub struct MaxValueStatus<T> {
    pub default: T,
    pub requests: Vec<PolicyRequest<T>>,
    pub arbitrated: T,
}

impl<T: Copy + Ord + std::fmt::Debug> MaxValueArbitrator<T> {
    pub fn new(default: T) -> Self {
        Self {
            requests: RequestLedger::new(),
            default,
        }
    }

    pub fn commit(&mut self, id: PolicyId, value: T) -> ArbitrationChange<T> {
        let previous = self.arbitrated_value();
        self.requests.commit(id, value);
        let current = self.arbitrated_value();
        trace!(policy = %id, request = ?value, arbitrated = ?current, "Committed max-value request");
        ArbitrationChange::new(previous, current)
    }

    pub fn remove(&mut self, id: PolicyId) -> ArbitrationChange<T> {
        let previous = self.arbitrated_value();
        self.requests.remove(id);
        ArbitrationChange::new(previous, self.arbitrated_value())
    }

    pub fn arbitrated_value(&self) -> T {
        reduce(self.requests.snapshot().values(), self.default)
    }

    /// Arbitrated value if `id` committed `candidate`; nothing is stored
    pub fn dry_run(&self, id: PolicyId, candidate: T) -> T {
        reduce(self.requests.snapshot().values_with(id, candidate), self.default)
    }

    pub fn request(&self, id: PolicyId) -> Option<T> {
        self.requests.snapshot().get(id).copied()
    }

    pub fn status(&self) -> MaxValueStatus<T> {
        MaxValueStatus {
            default: self.default,
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

fn reduce<T: Ord>(values: impl Iterator<Item = T>, default: T) -> T {
    values.max().unwrap_or(default)
}
