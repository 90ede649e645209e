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

//! Per-policy request bookkeeping
//!
//! Every arbitrator stores the current request of each policy in a
//! [`RequestLedger`]. A commit overwrites the policy's previous request,
//! a removal erases it. Arbitrators only ever see the requests through a
//! read-only [`LedgerSnapshot`].

use std::collections::BTreeMap;

use crate::types::PolicyId;

/// Requests keyed by the policy that made them
#[derive(Debug, Clone)]
pub struct RequestLedger<V> {
    requests: BTreeMap<PolicyId, V>,
}

impl<V> Default for RequestLedger<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V> RequestLedger<V> {
    pub fn new() -> Self {
        Self {
            requests: BTreeMap::new(),
        }
    }

    /// Insert or overwrite the request of `id`, returning the replaced one
    pub fn commit(&mut self, id: PolicyId, value: V) -> Option<V> {
        self.requests.insert(id, value)
    }

    /// Erase the request of `id`; unknown ids are a no-op
    pub fn remove(&mut self, id: PolicyId) -> Option<V> {
        self.requests.remove(&id)
    }

    pub fn snapshot(&self) -> LedgerSnapshot<'_, V> {
        LedgerSnapshot {
            requests: &self.requests,
        }
    }
}

/// Read-only view of a ledger at one point in time
#[derive(Debug)]
pub struct LedgerSnapshot<'a, V> {
    requests: &'a BTreeMap<PolicyId, V>,
}

impl<V> Clone for LedgerSnapshot<'_, V> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<V> Copy for LedgerSnapshot<'_, V> {}

impl<'a, V> LedgerSnapshot<'a, V> {
    /// Requests in policy order
    pub fn iter(&self) -> impl Iterator<Item = (PolicyId, &'a V)> + 'a {
        self.requests.iter().map(|(id, v)| (*id, v))
    }

    pub fn get(&self, id: PolicyId) -> Option<&'a V> {
        self.requests.get(&id)
    }

    pub fn contains(&self, id: PolicyId) -> bool {
        self.requests.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.requests.len()
    }

    pub fn is_empty(&self) -> bool {
        self.requests.is_empty()
    }
}

impl<'a, V: Copy> LedgerSnapshot<'a, V> {
    pub fn values(&self) -> impl Iterator<Item = V> + 'a {
        self.requests.values().copied()
    }

    /// The request set as it would be if `id` committed `candidate`
    pub fn values_with(&self, id: PolicyId, candidate: V) -> impl Iterator<Item = V> + 'a {
        self.requests
            .iter()
            .filter(move |(k, _)| **k != id)
            .map(|(_, v)| *v)
            .chain(std::iter::once(candidate))
    }
}
