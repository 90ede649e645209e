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

//! Participant domains and their arbitrated controls
//!
//! # Features
//!
//! - **Fan control**: max-wins speed, bounded speed caps and a caps lock;
//!   the effective speed is the arbitrated speed clamped into the caps
//! - **Performance caps**: capability bounds over the control set
//! - **Power limits**: per declared limit type, bounded caps plus
//!   lowest-wins power limit, time window and duty cycle requests; the
//!   effective power limit is held inside the caps
//!
//! A domain only carries the controls its configuration declares. Every
//! operation on a control the domain lacks is rejected. Setters return the
//! arbitrated value before and after, so the caller knows whether the
//! hardware needs reprogramming.

use std::collections::BTreeMap;

use serde::Serialize;
use tracing::{debug, info};

use crate::arbitration::{
    Bounds, BoundedRangeArbitrator, CapabilityBounds, CapabilityBoundsArbitrator,
    CapabilityBoundsStatus, CapabilityRequest, LockArbitrator, LockStatus, MaxValueArbitrator,
    MaxValueStatus, MinValueArbitrator, MinValueStatus, RangeRequest, RangeStatus,
};
use crate::config::{DomainConfig, PowerLimitRange};
use crate::constants::defaults;
use crate::error::{Result, ThermarbError};
use crate::types::{ArbitrationChange, Capability, Milliseconds, Milliwatts, Percentage, PolicyId};
use tarb_protocol::PowerLimitType;

// ============================================================================
// Fan Control
// ============================================================================

#[derive(Debug, Clone)]
pub struct FanControl {
    speed: MaxValueArbitrator<Percentage>,
    caps: BoundedRangeArbitrator<Percentage>,
    caps_lock: LockArbitrator,
}

#[derive(Debug, Clone, Serialize)]
pub struct FanControlStatus {
    pub speed: MaxValueStatus<Percentage>,
    pub caps: RangeStatus<Percentage>,
    pub caps_lock: LockStatus,
    pub effective_speed: Percentage,
}

impl Default for FanControl {
    fn default() -> Self {
        Self::new()
    }
}

impl FanControl {
    pub fn new() -> Self {
        Self {
            speed: MaxValueArbitrator::new(defaults::FAN_SPEED),
            caps: BoundedRangeArbitrator::new(Bounds::new(defaults::FAN_MIN_CAP, defaults::FAN_MAX_CAP)),
            caps_lock: LockArbitrator::new(),
        }
    }

    pub fn set_speed(&mut self, id: PolicyId, speed: Percentage) -> ArbitrationChange<Percentage> {
        self.speed.commit(id, speed)
    }

    pub fn set_caps(&mut self, id: PolicyId, caps: RangeRequest<Percentage>) -> ArbitrationChange<Bounds<Percentage>> {
        self.caps.commit(id, caps)
    }

    pub fn set_caps_lock(&mut self, id: PolicyId, lock: bool) -> ArbitrationChange<bool> {
        self.caps_lock.commit(id, lock)
    }

    pub fn arbitrated_speed(&self) -> Percentage {
        self.speed.arbitrated_value()
    }

    pub fn arbitrated_caps(&self) -> Bounds<Percentage> {
        self.caps.arbitrated_value()
    }

    pub fn caps_locked(&self) -> bool {
        self.caps_lock.arbitrated_value()
    }

    /// Speed to program: the arbitrated request held inside the arbitrated caps
    pub fn effective_speed(&self) -> Percentage {
        self.arbitrated_caps().clamp(self.arbitrated_speed())
    }

    /// Effective speed if `id` requested `speed`; nothing is stored
    pub fn dry_run_speed(&self, id: PolicyId, speed: Percentage) -> Percentage {
        self.arbitrated_caps().clamp(self.speed.dry_run(id, speed))
    }

    pub fn remove_policy(&mut self, id: PolicyId) {
        self.speed.remove(id);
        self.caps.remove(id);
        self.caps_lock.remove(id);
    }

    pub fn status(&self) -> FanControlStatus {
        FanControlStatus {
            speed: self.speed.status(),
            caps: self.caps.status(),
            caps_lock: self.caps_lock.status(),
            effective_speed: self.effective_speed(),
        }
    }
}

// ============================================================================
// Power Limit Control
// ============================================================================

/// Arbitrated state of one declared power limit type
#[derive(Debug, Clone)]
struct PowerLimitChannel {
    caps: BoundedRangeArbitrator<Milliwatts>,
    power_limit: MinValueArbitrator<Milliwatts>,
    time_window: MinValueArbitrator<Milliseconds>,
    duty_cycle: MinValueArbitrator<Percentage>,
}

impl PowerLimitChannel {
    fn new(range: &PowerLimitRange) -> Self {
        Self {
            caps: BoundedRangeArbitrator::new(Bounds::new(Milliwatts(range.min_mw), Milliwatts(range.max_mw))),
            power_limit: MinValueArbitrator::new(),
            time_window: MinValueArbitrator::new(),
            duty_cycle: MinValueArbitrator::new(),
        }
    }

    /// Lowest requested limit held inside the caps; the upper cap when unrequested
    fn effective_power_limit(&self) -> Milliwatts {
        let caps = self.caps.arbitrated_value();
        caps.clamp(self.power_limit.arbitrated_value().unwrap_or(caps.max))
    }

    fn remove_policy(&mut self, id: PolicyId) {
        self.caps.remove(id);
        self.power_limit.remove(id);
        self.time_window.remove(id);
        self.duty_cycle.remove(id);
    }

    fn status(&self) -> PowerLimitStatus {
        PowerLimitStatus {
            caps: self.caps.status(),
            power_limit: self.power_limit.status(),
            effective_power_limit: self.effective_power_limit(),
            time_window: self.time_window.status(),
            duty_cycle: self.duty_cycle.status(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct PowerLimitControl {
    limits: BTreeMap<PowerLimitType, PowerLimitChannel>,
    caps_lock: LockArbitrator,
}

#[derive(Debug, Clone, Serialize)]
pub struct PowerLimitStatus {
    pub caps: RangeStatus<Milliwatts>,
    pub power_limit: MinValueStatus<Milliwatts>,
    pub effective_power_limit: Milliwatts,
    pub time_window: MinValueStatus<Milliseconds>,
    pub duty_cycle: MinValueStatus<Percentage>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PowerLimitControlStatus {
    pub limits: BTreeMap<PowerLimitType, PowerLimitStatus>,
    pub caps_lock: LockStatus,
}

impl PowerLimitControl {
    /// One channel per declared limit type, caps widest at the declared range
    pub fn new(ranges: &BTreeMap<PowerLimitType, PowerLimitRange>) -> Self {
        let limits = ranges
            .iter()
            .map(|(limit_type, range)| (*limit_type, PowerLimitChannel::new(range)))
            .collect();
        Self {
            limits,
            caps_lock: LockArbitrator::new(),
        }
    }

    pub fn limit_types(&self) -> impl Iterator<Item = PowerLimitType> + '_ {
        self.limits.keys().copied()
    }

    fn channel(&self, limit_type: PowerLimitType, operation: &str) -> Result<&PowerLimitChannel> {
        self.limits
            .get(&limit_type)
            .ok_or_else(|| unsupported_limit(operation, limit_type))
    }

    fn channel_mut(&mut self, limit_type: PowerLimitType, operation: &str) -> Result<&mut PowerLimitChannel> {
        self.limits
            .get_mut(&limit_type)
            .ok_or_else(|| unsupported_limit(operation, limit_type))
    }

    /// Cap one limit type. Requested bounds must lie within the declared range.
    pub fn set_caps(
        &mut self,
        id: PolicyId,
        limit_type: PowerLimitType,
        caps: RangeRequest<Milliwatts>,
    ) -> Result<ArbitrationChange<Bounds<Milliwatts>>> {
        let channel = self.channel_mut(limit_type, "set_power_limit_caps")?;
        let widest = channel.caps.widest();
        for value in [caps.min, caps.max].into_iter().flatten() {
            check_within(&widest, value, limit_type, "set_power_limit_caps")?;
        }
        Ok(channel.caps.commit(id, caps))
    }

    /// Request a power limit; the lowest request wins.
    ///
    /// Returns the effective limit, which stays inside the arbitrated caps.
    pub fn set_power_limit(
        &mut self,
        id: PolicyId,
        limit_type: PowerLimitType,
        power_limit: Milliwatts,
    ) -> Result<ArbitrationChange<Milliwatts>> {
        let channel = self.channel_mut(limit_type, "set_power_limit")?;
        check_within(&channel.caps.widest(), power_limit, limit_type, "set_power_limit")?;
        let previous = channel.effective_power_limit();
        channel.power_limit.commit(id, power_limit);
        Ok(ArbitrationChange::new(previous, channel.effective_power_limit()))
    }

    pub fn set_time_window(
        &mut self,
        id: PolicyId,
        limit_type: PowerLimitType,
        time_window: Milliseconds,
    ) -> Result<ArbitrationChange<Option<Milliseconds>>> {
        if time_window.0 == 0 {
            return Err(ThermarbError::rejected("set_power_limit_time_window", "time window must be non-zero"));
        }
        let channel = self.channel_mut(limit_type, "set_power_limit_time_window")?;
        Ok(channel.time_window.commit(id, time_window))
    }

    pub fn set_duty_cycle(
        &mut self,
        id: PolicyId,
        limit_type: PowerLimitType,
        duty_cycle: Percentage,
    ) -> Result<ArbitrationChange<Option<Percentage>>> {
        let channel = self.channel_mut(limit_type, "set_power_limit_duty_cycle")?;
        Ok(channel.duty_cycle.commit(id, duty_cycle))
    }

    pub fn set_caps_lock(&mut self, id: PolicyId, lock: bool) -> ArbitrationChange<bool> {
        self.caps_lock.commit(id, lock)
    }

    pub fn arbitrated_caps(&self, limit_type: PowerLimitType) -> Result<Bounds<Milliwatts>> {
        Ok(self.channel(limit_type, "get_power_limit_caps")?.caps.arbitrated_value())
    }

    pub fn effective_power_limit(&self, limit_type: PowerLimitType) -> Result<Milliwatts> {
        Ok(self.channel(limit_type, "get_power_limit")?.effective_power_limit())
    }

    /// `None` until some policy requests a time window
    pub fn arbitrated_time_window(&self, limit_type: PowerLimitType) -> Result<Option<Milliseconds>> {
        Ok(self.channel(limit_type, "get_power_limit_time_window")?.time_window.arbitrated_value())
    }

    pub fn arbitrated_duty_cycle(&self, limit_type: PowerLimitType) -> Result<Option<Percentage>> {
        Ok(self.channel(limit_type, "get_power_limit_duty_cycle")?.duty_cycle.arbitrated_value())
    }

    pub fn dry_run_caps(
        &self,
        id: PolicyId,
        limit_type: PowerLimitType,
        caps: RangeRequest<Milliwatts>,
    ) -> Result<Bounds<Milliwatts>> {
        Ok(self.channel(limit_type, "dry_run_power_limit_caps")?.caps.dry_run(id, caps))
    }

    pub fn caps_locked(&self) -> bool {
        self.caps_lock.arbitrated_value()
    }

    pub fn remove_policy(&mut self, id: PolicyId) {
        for channel in self.limits.values_mut() {
            channel.remove_policy(id);
        }
        self.caps_lock.remove(id);
    }

    pub fn status(&self) -> PowerLimitControlStatus {
        PowerLimitControlStatus {
            limits: self.limits.iter().map(|(t, c)| (*t, c.status())).collect(),
            caps_lock: self.caps_lock.status(),
        }
    }
}

fn unsupported_limit(operation: &str, limit_type: PowerLimitType) -> ThermarbError {
    ThermarbError::rejected(operation, format!("{} is not a supported power limit", limit_type))
}

fn check_within(
    range: &Bounds<Milliwatts>,
    value: Milliwatts,
    limit_type: PowerLimitType,
    operation: &str,
) -> Result<()> {
    if range.contains(value) {
        return Ok(());
    }
    Err(ThermarbError::rejected(
        operation,
        format!("{} {} outside {}..={}", limit_type, value, range.min, range.max),
    ))
}

// ============================================================================
// Domain
// ============================================================================

#[derive(Debug, Clone)]
pub struct Domain {
    name: String,
    fan: Capability<FanControl>,
    performance: Capability<CapabilityBoundsArbitrator>,
    power_limits: Capability<PowerLimitControl>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DomainStatus {
    pub name: String,
    pub fan: Option<FanControlStatus>,
    pub performance: Option<CapabilityBoundsStatus>,
    pub power_limits: Option<PowerLimitControlStatus>,
}

impl Domain {
    /// Domain without any controls
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fan: Capability::Absent,
            performance: Capability::Absent,
            power_limits: Capability::Absent,
        }
    }

    pub fn with_fan(mut self) -> Self {
        self.fan = Capability::Present(FanControl::new());
        self
    }

    pub fn with_performance(mut self, control_set_depth: u32) -> Result<Self> {
        self.performance = Capability::Present(CapabilityBoundsArbitrator::new(control_set_depth)?);
        Ok(self)
    }

    pub fn with_power_limits(mut self, ranges: &BTreeMap<PowerLimitType, PowerLimitRange>) -> Self {
        self.power_limits = if ranges.is_empty() {
            Capability::Absent
        } else {
            Capability::Present(PowerLimitControl::new(ranges))
        };
        self
    }

    pub fn from_config(config: &DomainConfig) -> Result<Self> {
        let mut domain = Domain::new(config.name.clone()).with_power_limits(&config.power_limits);
        if config.fan.is_some() {
            domain = domain.with_fan();
        }
        if let Some(perf) = &config.performance {
            domain = domain.with_performance(perf.control_set_depth)?;
        }
        Ok(domain)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn fan(&self) -> Result<&FanControl> {
        self.fan.present("fan", "fan")
    }

    pub fn performance(&self) -> Result<&CapabilityBoundsArbitrator> {
        self.performance.present("performance", "performance")
    }

    pub fn power_limits(&self) -> Result<&PowerLimitControl> {
        self.power_limits.present("power_limits", "power limit")
    }

    pub fn set_fan_speed(&mut self, id: PolicyId, speed: Percentage) -> Result<ArbitrationChange<Percentage>> {
        let fan = self.fan.present_mut("set_fan_speed", "fan")?;
        let change = fan.set_speed(id, speed);
        if change.changed() {
            debug!(domain = %self.name, policy = %id, speed = %change.current, "Arbitrated fan speed changed");
        }
        Ok(change)
    }

    pub fn set_fan_caps(
        &mut self,
        id: PolicyId,
        caps: RangeRequest<Percentage>,
    ) -> Result<ArbitrationChange<Bounds<Percentage>>> {
        let fan = self.fan.present_mut("set_fan_caps", "fan")?;
        let change = fan.set_caps(id, caps);
        if change.changed() {
            debug!(
                domain = %self.name,
                policy = %id,
                min = %change.current.min,
                max = %change.current.max,
                "Arbitrated fan caps changed"
            );
        }
        Ok(change)
    }

    pub fn set_fan_caps_lock(&mut self, id: PolicyId, lock: bool) -> Result<ArbitrationChange<bool>> {
        let fan = self.fan.present_mut("set_fan_caps_lock", "fan")?;
        Ok(fan.set_caps_lock(id, lock))
    }

    pub fn set_performance_caps(
        &mut self,
        id: PolicyId,
        request: CapabilityRequest,
    ) -> Result<ArbitrationChange<CapabilityBounds>> {
        self.performance
            .present_mut("set_performance_caps", "performance")?
            .commit_bounds(id, request)
    }

    pub fn set_performance_caps_lock(&mut self, id: PolicyId, lock: bool) -> Result<ArbitrationChange<bool>> {
        let perf = self.performance.present_mut("set_performance_caps_lock", "performance")?;
        Ok(perf.commit_lock(id, lock))
    }

    pub fn set_power_limit_caps(
        &mut self,
        id: PolicyId,
        limit_type: PowerLimitType,
        caps: RangeRequest<Milliwatts>,
    ) -> Result<ArbitrationChange<Bounds<Milliwatts>>> {
        let power = self.power_limits.present_mut("set_power_limit_caps", "power limit")?;
        let change = power.set_caps(id, limit_type, caps)?;
        if change.changed() {
            debug!(
                domain = %self.name,
                policy = %id,
                limit = %limit_type,
                min = %change.current.min,
                max = %change.current.max,
                "Arbitrated power limit caps changed"
            );
        }
        Ok(change)
    }

    pub fn set_power_limit(
        &mut self,
        id: PolicyId,
        limit_type: PowerLimitType,
        power_limit: Milliwatts,
    ) -> Result<ArbitrationChange<Milliwatts>> {
        let power = self.power_limits.present_mut("set_power_limit", "power limit")?;
        let change = power.set_power_limit(id, limit_type, power_limit)?;
        if change.changed() {
            debug!(
                domain = %self.name,
                policy = %id,
                limit = %limit_type,
                power_limit = %change.current,
                "Effective power limit changed"
            );
        }
        Ok(change)
    }

    pub fn set_power_limit_time_window(
        &mut self,
        id: PolicyId,
        limit_type: PowerLimitType,
        time_window: Milliseconds,
    ) -> Result<ArbitrationChange<Option<Milliseconds>>> {
        self.power_limits
            .present_mut("set_power_limit_time_window", "power limit")?
            .set_time_window(id, limit_type, time_window)
    }

    pub fn set_power_limit_duty_cycle(
        &mut self,
        id: PolicyId,
        limit_type: PowerLimitType,
        duty_cycle: Percentage,
    ) -> Result<ArbitrationChange<Option<Percentage>>> {
        self.power_limits
            .present_mut("set_power_limit_duty_cycle", "power limit")?
            .set_duty_cycle(id, limit_type, duty_cycle)
    }

    pub fn set_power_limit_caps_lock(&mut self, id: PolicyId, lock: bool) -> Result<ArbitrationChange<bool>> {
        let power = self.power_limits.present_mut("set_power_limit_caps_lock", "power limit")?;
        Ok(power.set_caps_lock(id, lock))
    }

    /// Withdraw every request `id` holds on any control of this domain
    pub fn remove_policy(&mut self, id: PolicyId) {
        if let Capability::Present(fan) = &mut self.fan {
            fan.remove_policy(id);
        }
        if let Capability::Present(perf) = &mut self.performance {
            perf.remove_policy(id);
        }
        if let Capability::Present(power) = &mut self.power_limits {
            power.remove_policy(id);
        }
    }

    pub fn status(&self) -> DomainStatus {
        DomainStatus {
            name: self.name.clone(),
            fan: match &self.fan {
                Capability::Present(fan) => Some(fan.status()),
                Capability::Absent => None,
            },
            performance: match &self.performance {
                Capability::Present(perf) => Some(perf.status()),
                Capability::Absent => None,
            },
            power_limits: match &self.power_limits {
                Capability::Present(power) => Some(power.status()),
                Capability::Absent => None,
            },
        }
    }
}

// ============================================================================
// Registry
// ============================================================================

/// All participant domains, by name
#[derive(Debug, Clone, Default)]
pub struct DomainRegistry {
    domains: BTreeMap<String, Domain>,
}

impl DomainRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(configs: &[DomainConfig]) -> Result<Self> {
        let mut registry = Self::new();
        for config in configs {
            registry.insert(Domain::from_config(config)?)?;
        }
        info!(domains = registry.len(), "Domain registry built");
        Ok(registry)
    }

    pub fn insert(&mut self, domain: Domain) -> Result<()> {
        if self.domains.contains_key(domain.name()) {
            return Err(ThermarbError::invalid_config(
                "domains",
                format!("duplicate domain name '{}'", domain.name()),
            ));
        }
        self.domains.insert(domain.name().to_string(), domain);
        Ok(())
    }

    pub fn domain(&self, name: &str) -> Result<&Domain> {
        self.domains
            .get(name)
            .ok_or_else(|| ThermarbError::rejected("lookup_domain", format!("unknown domain '{}'", name)))
    }

    pub fn domain_mut(&mut self, name: &str) -> Result<&mut Domain> {
        self.domains
            .get_mut(name)
            .ok_or_else(|| ThermarbError::rejected("lookup_domain", format!("unknown domain '{}'", name)))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.domains.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.domains.len()
    }

    pub fn is_empty(&self) -> bool {
        self.domains.is_empty()
    }

    pub fn remove_policy(&mut self, id: PolicyId) {
        for domain in self.domains.values_mut() {
            domain.remove_policy(id);
        }
        debug!(policy = %id, "Removed policy from all domains");
    }

    pub fn status(&self) -> Vec<DomainStatus> {
        self.domains.values().map(Domain::status).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{FanConfig, PerformanceConfig};

    fn pct(v: f32) -> Percentage {
        Percentage::new(v).unwrap()
    }

    fn pl1_domain() -> Domain {
        let mut ranges = BTreeMap::new();
        ranges.insert(PowerLimitType::Pl1, PowerLimitRange { min_mw: 5_000, max_mw: 30_000 });
        Domain::new("soc").with_power_limits(&ranges)
    }

    #[test]
    fn test_effective_speed_clamped_into_caps() {
        let mut fan = FanControl::new();
        fan.set_speed(PolicyId(1), pct(90.0));
        fan.set_caps(PolicyId(2), RangeRequest::new(None, Some(pct(60.0))));
        assert_eq!(fan.arbitrated_speed(), pct(90.0));
        assert_eq!(fan.effective_speed(), pct(60.0));

        fan.set_caps(PolicyId(3), RangeRequest::new(Some(pct(20.0)), None));
        fan.set_speed(PolicyId(1), pct(5.0));
        assert_eq!(fan.effective_speed(), pct(20.0));
        assert_eq!(fan.dry_run_speed(PolicyId(4), pct(40.0)), pct(40.0));
    }

    #[test]
    fn test_fan_defaults() {
        let fan = FanControl::new();
        assert_eq!(fan.arbitrated_speed(), Percentage::ZERO);
        assert_eq!(fan.arbitrated_caps(), Bounds::new(Percentage::ZERO, Percentage::FULL));
        assert!(!fan.caps_locked());
    }

    #[test]
    fn test_absent_control_rejected() {
        let mut domain = Domain::new("bare");
        assert!(matches!(
            domain.set_fan_speed(PolicyId(1), pct(50.0)),
            Err(ThermarbError::RejectedOperation { .. })
        ));
        assert!(matches!(
            domain.set_performance_caps(PolicyId(1), CapabilityRequest::default()),
            Err(ThermarbError::RejectedOperation { .. })
        ));
        assert!(domain.set_power_limit_caps_lock(PolicyId(1), true).is_err());
        assert!(domain.fan().is_err());
    }

    #[test]
    fn test_undeclared_power_limit_rejected() {
        let mut domain = pl1_domain();
        let err = domain
            .set_power_limit_caps(PolicyId(1), PowerLimitType::Pl2, RangeRequest::new(None, Some(Milliwatts(9_000))))
            .unwrap_err();
        assert!(matches!(err, ThermarbError::RejectedOperation { .. }));
    }

    #[test]
    fn test_power_limit_outside_range_rejected() {
        let mut domain = pl1_domain();
        assert!(domain
            .set_power_limit_caps(PolicyId(1), PowerLimitType::Pl1, RangeRequest::new(None, Some(Milliwatts(45_000))))
            .is_err());
    }

    #[test]
    fn test_power_limit_arbitration() {
        let mut domain = pl1_domain();
        domain
            .set_power_limit_caps(PolicyId(1), PowerLimitType::Pl1, RangeRequest::new(None, Some(Milliwatts(20_000))))
            .unwrap();
        let change = domain
            .set_power_limit_caps(PolicyId(2), PowerLimitType::Pl1, RangeRequest::new(Some(Milliwatts(8_000)), Some(Milliwatts(15_000))))
            .unwrap();
        assert!(change.changed());
        assert_eq!(change.current, Bounds::new(Milliwatts(8_000), Milliwatts(15_000)));

        domain.remove_policy(PolicyId(2));
        assert_eq!(
            domain.power_limits().unwrap().arbitrated_caps(PowerLimitType::Pl1).unwrap(),
            Bounds::new(Milliwatts(5_000), Milliwatts(20_000))
        );
    }

    #[test]
    fn test_lowest_power_limit_wins() {
        let mut domain = pl1_domain();
        domain.set_power_limit(PolicyId(1), PowerLimitType::Pl1, Milliwatts(25_000)).unwrap();
        let change = domain
            .set_power_limit(PolicyId(2), PowerLimitType::Pl1, Milliwatts(12_000))
            .unwrap();
        assert_eq!(change, ArbitrationChange::new(Milliwatts(25_000), Milliwatts(12_000)));

        let change = domain
            .set_power_limit(PolicyId(3), PowerLimitType::Pl1, Milliwatts(18_000))
            .unwrap();
        assert!(!change.changed());
    }

    #[test]
    fn test_power_limit_remove_restores_previous() {
        let mut domain = pl1_domain();
        // Nobody asked yet: the upper cap applies
        let power = domain.power_limits().unwrap();
        assert_eq!(power.effective_power_limit(PowerLimitType::Pl1).unwrap(), Milliwatts(30_000));

        domain.set_power_limit(PolicyId(1), PowerLimitType::Pl1, Milliwatts(20_000)).unwrap();
        domain.set_power_limit(PolicyId(2), PowerLimitType::Pl1, Milliwatts(9_000)).unwrap();
        domain.remove_policy(PolicyId(2));
        let power = domain.power_limits().unwrap();
        assert_eq!(power.effective_power_limit(PowerLimitType::Pl1).unwrap(), Milliwatts(20_000));

        domain.remove_policy(PolicyId(1));
        let power = domain.power_limits().unwrap();
        assert_eq!(power.effective_power_limit(PowerLimitType::Pl1).unwrap(), Milliwatts(30_000));
    }

    #[test]
    fn test_power_limit_held_inside_caps() {
        let mut domain = pl1_domain();
        domain.set_power_limit(PolicyId(1), PowerLimitType::Pl1, Milliwatts(6_000)).unwrap();
        domain
            .set_power_limit_caps(PolicyId(2), PowerLimitType::Pl1, RangeRequest::new(Some(Milliwatts(10_000)), None))
            .unwrap();
        let power = domain.power_limits().unwrap();
        assert_eq!(power.effective_power_limit(PowerLimitType::Pl1).unwrap(), Milliwatts(10_000));

        domain
            .set_power_limit_caps(PolicyId(2), PowerLimitType::Pl1, RangeRequest::new(Some(Milliwatts(5_000)), Some(Milliwatts(8_000))))
            .unwrap();
        let change = domain
            .set_power_limit(PolicyId(1), PowerLimitType::Pl1, Milliwatts(29_000))
            .unwrap();
        assert_eq!(change, ArbitrationChange::new(Milliwatts(6_000), Milliwatts(8_000)));

        // Outside the declared range and undeclared types are rejected
        assert!(domain.set_power_limit(PolicyId(1), PowerLimitType::Pl1, Milliwatts(31_000)).is_err());
        assert!(domain.set_power_limit(PolicyId(1), PowerLimitType::Pl2, Milliwatts(9_000)).is_err());
    }

    #[test]
    fn test_time_window_and_duty_cycle() {
        let mut domain = pl1_domain();
        let change = domain
            .set_power_limit_time_window(PolicyId(1), PowerLimitType::Pl1, Milliseconds(28_000))
            .unwrap();
        assert_eq!(change, ArbitrationChange::new(None, Some(Milliseconds(28_000))));
        domain
            .set_power_limit_time_window(PolicyId(2), PowerLimitType::Pl1, Milliseconds(1_000))
            .unwrap();
        assert!(domain
            .set_power_limit_time_window(PolicyId(2), PowerLimitType::Pl1, Milliseconds(0))
            .is_err());

        domain.set_power_limit_duty_cycle(PolicyId(1), PowerLimitType::Pl1, pct(75.0)).unwrap();
        domain.set_power_limit_duty_cycle(PolicyId(2), PowerLimitType::Pl1, pct(40.0)).unwrap();

        let power = domain.power_limits().unwrap();
        assert_eq!(power.arbitrated_time_window(PowerLimitType::Pl1).unwrap(), Some(Milliseconds(1_000)));
        assert_eq!(power.arbitrated_duty_cycle(PowerLimitType::Pl1).unwrap(), Some(pct(40.0)));

        domain.remove_policy(PolicyId(2));
        let power = domain.power_limits().unwrap();
        assert_eq!(power.arbitrated_time_window(PowerLimitType::Pl1).unwrap(), Some(Milliseconds(28_000)));
        assert_eq!(power.arbitrated_duty_cycle(PowerLimitType::Pl1).unwrap(), Some(pct(75.0)));

        let status = power.status();
        assert_eq!(status.limits[&PowerLimitType::Pl1].effective_power_limit, Milliwatts(30_000));
        assert_eq!(status.limits[&PowerLimitType::Pl1].duty_cycle.requests.len(), 1);
    }

    #[test]
    fn test_partial_fan_caps_keep_earlier_bound() {
        let mut fan = FanControl::new();
        fan.set_caps(PolicyId(1), RangeRequest::new(Some(pct(30.0)), Some(pct(50.0))));
        let change = fan.set_caps(PolicyId(1), RangeRequest::new(None, Some(pct(70.0))));
        assert_eq!(change.current, Bounds::new(pct(30.0), pct(70.0)));
    }

    #[test]
    fn test_remove_policy_clears_all_controls() {
        let mut domain = Domain::new("cpu").with_fan().with_performance(4).unwrap();
        domain.set_fan_speed(PolicyId(7), pct(80.0)).unwrap();
        domain.set_fan_caps_lock(PolicyId(7), true).unwrap();
        domain.set_performance_caps_lock(PolicyId(7), true).unwrap();

        domain.remove_policy(PolicyId(7));
        assert_eq!(domain.fan().unwrap().arbitrated_speed(), Percentage::ZERO);
        assert!(!domain.fan().unwrap().caps_locked());
        assert!(!domain.performance().unwrap().arbitrated_lock());
    }

    #[test]
    fn test_registry_from_config() {
        let configs = vec![
            DomainConfig {
                name: "cpu".into(),
                fan: None,
                performance: Some(PerformanceConfig { control_set_depth: 6 }),
                power_limits: BTreeMap::new(),
            },
            DomainConfig {
                name: "fan0".into(),
                fan: Some(FanConfig {}),
                performance: None,
                power_limits: BTreeMap::new(),
            },
        ];
        let mut registry = DomainRegistry::from_config(&configs).unwrap();
        assert_eq!(registry.names().collect::<Vec<_>>(), vec!["cpu", "fan0"]);
        assert!(registry.domain("gpu").is_err());

        registry.domain_mut("fan0").unwrap().set_fan_speed(PolicyId(1), pct(30.0)).unwrap();
        registry.remove_policy(PolicyId(1));
        assert_eq!(
            registry.domain("fan0").unwrap().fan().unwrap().arbitrated_speed(),
            Percentage::ZERO
        );

        let status = registry.status();
        assert!(status[0].fan.is_none());
        assert!(status[0].performance.is_some());
    }

    #[test]
    fn test_registry_rejects_duplicate() {
        let mut registry = DomainRegistry::new();
        registry.insert(Domain::new("a")).unwrap();
        assert!(registry.insert(Domain::new("a")).is_err());
    }
}
