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

//! Tightest-common-interval arbitration
//!
//! Each policy may request a lower bound, an upper bound, or both. Bounds are
//! kept per field: a commit only replaces the fields it sets, and a field the
//! policy never set stands for the widest permitted bound. The arbitrated interval is
//! the highest of all lower bounds and the lowest of all upper bounds. When
//! the requests do not overlap the upper bound is pulled down onto the lower
//! bound, so the result is always a valid interval.

use serde::{Deserialize, Serialize};
use tracing::trace;

use super::PolicyRequest;
use crate::ledger::RequestLedger;
use crate::types::{ArbitrationChange, PolicyId};

/// One policy's requested interval; `None` means "no opinion" on that side
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RangeRequest<T> {
    pub min: Option<T>,
    pub max: Option<T>,
}

impl<T> RangeRequest<T> {
    pub fn new(min: Option<T>, max: Option<T>) -> Self {
        Self { min, max }
    }

    pub fn is_empty(&self) -> bool {
        self.min.is_none() && self.max.is_none()
    }
}

impl<T: Copy> RangeRequest<T> {
    /// Overlay the fields `newer` sets onto this request
    pub fn updated_with(self, newer: RangeRequest<T>) -> Self {
        Self {
            min: newer.min.or(self.min),
            max: newer.max.or(self.max),
        }
    }
}

/// An interval with `min <= max`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bounds<T> {
    pub min: T,
    pub max: T,
}

impl<T: Copy + Ord> Bounds<T> {
    pub fn new(min: T, max: T) -> Self {
        Self { min, max }
    }

    pub fn contains(&self, value: T) -> bool {
        self.min <= value && value <= self.max
    }

    pub fn clamp(&self, value: T) -> T {
        value.clamp(self.min, self.max)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RangeStatus<T> {
    pub widest: Bounds<T>,
    /// Requests with unset fields shown as the widest bound they default to
    pub requests: Vec<PolicyRequest<Bounds<T>>>,
    pub arbitrated: Bounds<T>,
}

#[derive(Debug, Clone)]
pub struct BoundedRangeArbitrator<T> {
    requests: RequestLedger<RangeRequest<T>>,
    widest: Bounds<T>,
}

impl<T: Copy + Ord + std::fmt::Debug> BoundedRangeArbitrator<T> {
    /// `widest` is the arbitrated value while no policy has an opinion
    pub fn new(widest: Bounds<T>) -> Self {
        Self {
            requests: RequestLedger::new(),
            widest,
        }
    }

    pub fn widest(&self) -> Bounds<T> {
        self.widest
    }

    /// Record the bounds `request` sets for `id`.
    ///
    /// Fields left unset keep whatever `id` committed for them before. A
    /// request with neither bound set leaves the ledger as it was.
    pub fn commit(&mut self, id: PolicyId, request: RangeRequest<T>) -> ArbitrationChange<Bounds<T>> {
        let previous = self.arbitrated_value();
        if request.is_empty() {
            trace!(policy = %id, "Ignoring range request without bounds");
            return ArbitrationChange::new(previous, previous);
        }
        let stored = self.stored_with(id, request);
        self.requests.commit(id, stored);
        let current = self.arbitrated_value();
        trace!(policy = %id, request = ?stored, arbitrated = ?current, "Committed range request");
        ArbitrationChange::new(previous, current)
    }

    fn stored_with(&self, id: PolicyId, request: RangeRequest<T>) -> RangeRequest<T> {
        match self.request(id) {
            Some(existing) => existing.updated_with(request),
            None => request,
        }
    }

    pub fn remove(&mut self, id: PolicyId) -> ArbitrationChange<Bounds<T>> {
        let previous = self.arbitrated_value();
        self.requests.remove(id);
        ArbitrationChange::new(previous, self.arbitrated_value())
    }

    pub fn arbitrated_value(&self) -> Bounds<T> {
        merge(self.requests.snapshot().values(), self.widest)
    }

    /// Arbitrated interval if `id` committed `candidate`; nothing is stored
    pub fn dry_run(&self, id: PolicyId, candidate: RangeRequest<T>) -> Bounds<T> {
        if candidate.is_empty() {
            return self.arbitrated_value();
        }
        let stored = self.stored_with(id, candidate);
        merge(self.requests.snapshot().values_with(id, stored), self.widest)
    }

    pub fn request(&self, id: PolicyId) -> Option<RangeRequest<T>> {
        self.requests.snapshot().get(id).copied()
    }

    pub fn status(&self) -> RangeStatus<T> {
        RangeStatus {
            widest: self.widest,
            requests: self
                .requests
                .snapshot()
                .iter()
                .map(|(policy, r)| PolicyRequest {
                    policy,
                    request: Bounds::new(
                        r.min.unwrap_or(self.widest.min),
                        r.max.unwrap_or(self.widest.max),
                    ),
                })
                .collect(),
            arbitrated: self.arbitrated_value(),
        }
    }
}

fn merge<T: Copy + Ord>(requests: impl Iterator<Item = RangeRequest<T>>, widest: Bounds<T>) -> Bounds<T> {
    let mut min = widest.min;
    let mut max = widest.max;
    for request in requests {
        min = min.max(request.min.unwrap_or(widest.min));
        max = max.min(request.max.unwrap_or(widest.max));
    }
    if max < min {
        max = min;
    }
    Bounds { min, max }
}
