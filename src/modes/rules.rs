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

//! Ordered rule tables

/// One resolver rule: when `applies` holds for the resolver state, the
/// resolver produces `mode`.
pub struct Rule<S, M> {
    pub name: &'static str,
    pub applies: fn(&S) -> bool,
    pub mode: M,
}

/// First matching rule, top to bottom
pub fn first_match<'r, S, M>(rules: &'r [Rule<S, M>], state: &S) -> Option<&'r Rule<S, M>> {
    rules.iter().find(|rule| (rule.applies)(state))
}

/// Mode of the first matching rule, or `fallback` if none match
pub fn evaluate<S, M: Copy>(rules: &[Rule<S, M>], state: &S, fallback: M) -> M {
    first_match(rules, state).map_or(fallback, |rule| rule.mode)
}
