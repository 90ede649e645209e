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

//! Mode change publisher
//!
//! Routes inbound platform events to the signal they carry, re-resolves the
//! gaming and scenario modes and enqueues a notification for every mode
//! that changed since it was last published.
//!
//! # Ordering
//!
//! Every handled event re-resolves the gaming mode first and feeds the
//! result into the scenario resolver before the scenario is resolved. A
//! gaming mode change is always tracked, but only announced while the
//! current scenario is `Gaming`.

use std::collections::{BTreeSet, HashMap};

use lazy_static::lazy_static;
use serde::Serialize;
use tracing::{debug, info, trace, warn};

use crate::config::ThermarbConfig;
use crate::constants::defaults::MODE_LOG_PREFIX;
use crate::error::{Result, ThermarbError};
use crate::modes::{
    GamingModeResolver, GamingModeStatus, ScenarioModeResolver, ScenarioModeStatus, SupportedModeSet,
};
use tarb_protocol::{
    decode_application_optimization, decode_collaboration, decode_endurance_gaming,
    decode_power_source, decode_workload_prediction, EventKind, GamingMode, InboundEvent,
    ModeNotification, ModeSnapshot, ScenarioMode,
};

/// Destination of mode change notifications; delivery is fire-and-forget
#[cfg_attr(test, mockall::automock)]
pub trait NotificationSink {
    fn enqueue(&mut self, notification: ModeNotification);
}

impl NotificationSink for Vec<ModeNotification> {
    fn enqueue(&mut self, notification: ModeNotification) {
        self.push(notification);
    }
}

// ============================================================================
// Event Routing
// ============================================================================

/// Decodes one event payload and applies it to its signal.
///
/// Returns the decoded value for logging. The signal is only touched once
/// the payload decoded cleanly.
type SignalMutator = fn(&mut GamingModeResolver, &mut ScenarioModeResolver, &[u8]) -> Result<String>;

lazy_static! {
    static ref SIGNAL_MUTATORS: HashMap<EventKind, SignalMutator> = {
        let mut table: HashMap<EventKind, SignalMutator> = HashMap::new();
        table.insert(EventKind::PowerSourceChanged, |gaming, _, payload| {
            let source = decode_power_source(payload)?;
            gaming.update_power_source(source);
            Ok(source.to_string())
        });
        table.insert(EventKind::ApplicationOptimizationChanged, |gaming, _, payload| {
            let active = decode_application_optimization(payload)?;
            gaming.update_application_optimization(active);
            Ok(on_off(active).to_string())
        });
        table.insert(EventKind::EnduranceGamingStatus, |gaming, _, payload| {
            let status = decode_endurance_gaming(payload)?;
            gaming.update_endurance_gaming(status);
            Ok(status.to_string())
        });
        table.insert(EventKind::CollaborationChanged, |_, scenario, payload| {
            let enabled = decode_collaboration(payload)?;
            scenario.update_collaboration(enabled);
            Ok(on_off(enabled).to_string())
        });
        table.insert(EventKind::WorkloadPredictionChanged, |_, scenario, payload| {
            let prediction = decode_workload_prediction(payload)?;
            scenario.update_workload_prediction(prediction);
            Ok(prediction.to_string())
        });
        table
    };
}

fn on_off(value: bool) -> &'static str {
    if value {
        "On"
    } else {
        "Off"
    }
}

// ============================================================================
// Publisher
// ============================================================================

/// What one call to [`ModeChangePublisher::update`] did
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PublishOutcome {
    /// False when the event kind is not subscribed
    pub handled: bool,
    pub notifications: Vec<ModeNotification>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PublisherStatus {
    pub subscribed_events: Vec<EventKind>,
    pub scenario: ScenarioModeStatus,
    pub gaming: GamingModeStatus,
    pub published: ModeSnapshot,
}

pub struct ModeChangePublisher<S: NotificationSink> {
    gaming: GamingModeResolver,
    scenario: ScenarioModeResolver,
    subscribed: BTreeSet<EventKind>,
    scenario_mode: ScenarioMode,
    gaming_mode: GamingMode,
    sink: S,
}

impl<S: NotificationSink> ModeChangePublisher<S> {
    /// Build the publisher with fixed whitelists. Nothing is evaluated until
    /// the first event arrives; both modes start out `Invalid`.
    pub fn new(
        supported_scenario_modes: SupportedModeSet<ScenarioMode>,
        supported_gaming_modes: SupportedModeSet<GamingMode>,
        sink: S,
    ) -> Self {
        info!("{} Supported scenario modes: {}", MODE_LOG_PREFIX, supported_scenario_modes);
        info!("{} Supported gaming modes: {}", MODE_LOG_PREFIX, supported_gaming_modes);

        let gaming = GamingModeResolver::new(supported_gaming_modes);
        let scenario = ScenarioModeResolver::new(supported_scenario_modes);
        let subscribed: BTreeSet<EventKind> = gaming
            .required_events()
            .union(&scenario.required_events())
            .copied()
            .collect();
        debug!(events = ?subscribed, "{} Event subscriptions", MODE_LOG_PREFIX);

        Self {
            gaming,
            scenario,
            subscribed,
            scenario_mode: ScenarioMode::Invalid,
            gaming_mode: GamingMode::Invalid,
            sink,
        }
    }

    pub fn from_config(config: &ThermarbConfig, sink: S) -> Self {
        Self::new(
            config.supported_scenario_modes.iter().copied().collect(),
            config.supported_gaming_modes.iter().copied().collect(),
            sink,
        )
    }

    /// Events this publisher reacts to
    pub fn subscribed_events(&self) -> impl Iterator<Item = EventKind> + '_ {
        self.subscribed.iter().copied()
    }

    pub fn is_subscribed(&self, kind: EventKind) -> bool {
        self.subscribed.contains(&kind)
    }

    /// Apply one inbound event and publish whatever mode changes follow.
    ///
    /// A malformed payload is returned as an error and leaves every signal
    /// and mode untouched.
    pub fn update(&mut self, event: &InboundEvent) -> Result<PublishOutcome> {
        if !self.is_subscribed(event.kind) {
            trace!(event = %event.kind, "{} Ignoring unsubscribed event", MODE_LOG_PREFIX);
            return Ok(PublishOutcome::default());
        }

        let mutator = SIGNAL_MUTATORS.get(&event.kind).ok_or_else(|| {
            ThermarbError::rejected("publish_mode_event", format!("no handler for {}", event.kind))
        })?;
        let value = match mutator(&mut self.gaming, &mut self.scenario, &event.payload) {
            Ok(value) => value,
            Err(e) => {
                warn!(event = %event.kind, error = %e, "{} Dropping malformed event", MODE_LOG_PREFIX);
                return Err(e);
            }
        };
        info!("{} Event {{{}: {}}}", MODE_LOG_PREFIX, event.kind, value);

        let gaming_mode = self.gaming.resolve();
        self.scenario.update_gaming_mode(gaming_mode);
        let scenario_mode = self.scenario.resolve();

        Ok(self.publish_changes(scenario_mode, gaming_mode))
    }

    fn publish_changes(&mut self, scenario_mode: ScenarioMode, gaming_mode: GamingMode) -> PublishOutcome {
        let mut outcome = PublishOutcome {
            handled: true,
            notifications: Vec::new(),
        };

        if scenario_mode != self.scenario_mode {
            info!(
                "{} Scenario mode changed: {} -> {}",
                MODE_LOG_PREFIX, self.scenario_mode, scenario_mode
            );
            self.scenario_mode = scenario_mode;
            self.emit(ModeNotification::ScenarioModeChanged(scenario_mode), &mut outcome);
        }

        if gaming_mode != self.gaming_mode {
            info!(
                "{} Gaming mode changed: {} -> {}",
                MODE_LOG_PREFIX, self.gaming_mode, gaming_mode
            );
            self.gaming_mode = gaming_mode;
            if self.scenario_mode == ScenarioMode::Gaming {
                self.emit(ModeNotification::GamingModeChanged(gaming_mode), &mut outcome);
            } else {
                debug!(
                    scenario = %self.scenario_mode,
                    "{} Gaming mode change not announced outside Gaming scenario",
                    MODE_LOG_PREFIX
                );
            }
        }

        outcome
    }

    fn emit(&mut self, notification: ModeNotification, outcome: &mut PublishOutcome) {
        self.sink.enqueue(notification);
        outcome.notifications.push(notification);
    }

    /// Last published modes
    pub fn modes(&self) -> ModeSnapshot {
        ModeSnapshot {
            scenario_mode: self.scenario_mode,
            gaming_mode: self.gaming_mode,
        }
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn sink_mut(&mut self) -> &mut S {
        &mut self.sink
    }

    pub fn status(&self) -> PublisherStatus {
        PublisherStatus {
            subscribed_events: self.subscribed.iter().copied().collect(),
            scenario: self.scenario.status(),
            gaming: self.gaming.status(),
            published: self.modes(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockall::predicate::eq;
    use tarb_protocol::{EnduranceGamingStatus, PowerSource, WorkloadPrediction};

    fn publisher<S: NotificationSink>(
        scenarios: &[ScenarioMode],
        gaming: &[GamingMode],
        sink: S,
    ) -> ModeChangePublisher<S> {
        ModeChangePublisher::new(
            scenarios.iter().copied().collect(),
            gaming.iter().copied().collect(),
            sink,
        )
    }

    #[test]
    fn test_construction_evaluates_nothing() {
        let mut sink = MockNotificationSink::new();
        sink.expect_enqueue().never();
        let p = publisher(&ScenarioMode::SELECTABLE, &GamingMode::SELECTABLE, sink);
        assert_eq!(p.modes().scenario_mode, ScenarioMode::Invalid);
        assert_eq!(p.modes().gaming_mode, GamingMode::Invalid);
    }

    #[test]
    fn test_identical_event_twice_notifies_once() {
        let mut sink = MockNotificationSink::new();
        sink.expect_enqueue()
            .with(eq(ModeNotification::ScenarioModeChanged(ScenarioMode::Collaboration)))
            .times(1)
            .return_const(());
        let mut p = publisher(&[ScenarioMode::Collaboration], &[], sink);

        let event = InboundEvent::collaboration(true);
        assert_eq!(p.update(&event).unwrap().notifications.len(), 1);
        assert!(p.update(&event).unwrap().notifications.is_empty());
    }

    #[test]
    fn test_gaming_change_outside_gaming_scenario_is_silent() {
        let mut sink = MockNotificationSink::new();
        sink.expect_enqueue().never();
        let mut p = publisher(&[ScenarioMode::Collaboration], &[GamingMode::MaxPerformance], sink);

        p.update(&InboundEvent::power_source(PowerSource::Ac)).unwrap();
        let outcome = p.update(&InboundEvent::application_optimization(true)).unwrap();

        assert!(outcome.handled);
        assert!(outcome.notifications.is_empty());
        assert_eq!(p.modes().gaming_mode, GamingMode::MaxPerformance);
        assert_eq!(p.modes().scenario_mode, ScenarioMode::Invalid);
    }

    #[test]
    fn test_entering_gaming_announces_both_modes() {
        let mut p = publisher(
            &[ScenarioMode::Gaming, ScenarioMode::Collaboration],
            &[GamingMode::MaxPerformance],
            Vec::new(),
        );
        p.update(&InboundEvent::collaboration(true)).unwrap();
        p.update(&InboundEvent::power_source(PowerSource::Ac)).unwrap();
        p.update(&InboundEvent::application_optimization(true)).unwrap();

        assert_eq!(
            p.sink().as_slice(),
            &[
                ModeNotification::ScenarioModeChanged(ScenarioMode::Collaboration),
                ModeNotification::ScenarioModeChanged(ScenarioMode::Gaming),
                ModeNotification::GamingModeChanged(GamingMode::MaxPerformance),
            ]
        );

        // Leaving AC drops gaming; scenario falls back to collaboration and the
        // gaming change is no longer announced
        p.sink_mut().clear();
        p.update(&InboundEvent::power_source(PowerSource::Dc)).unwrap();
        assert_eq!(
            p.sink().as_slice(),
            &[ModeNotification::ScenarioModeChanged(ScenarioMode::Collaboration)]
        );
        assert_eq!(p.modes().gaming_mode, GamingMode::Invalid);
    }

    #[test]
    fn test_gaming_mode_switch_within_gaming() {
        let mut p = publisher(&[ScenarioMode::Gaming], &GamingMode::SELECTABLE, Vec::new());
        p.update(&InboundEvent::power_source(PowerSource::Dc)).unwrap();
        p.update(&InboundEvent::endurance_gaming(EnduranceGamingStatus::On)).unwrap();
        p.update(&InboundEvent::application_optimization(true)).unwrap();
        p.sink_mut().clear();

        // DC -> AC with both signals set switches EnduranceGaming -> MaxPerformance
        p.update(&InboundEvent::power_source(PowerSource::Ac)).unwrap();
        assert_eq!(
            p.sink().as_slice(),
            &[ModeNotification::GamingModeChanged(GamingMode::MaxPerformance)]
        );
    }

    #[test]
    fn test_malformed_payload_leaves_state() {
        let mut p = publisher(&[ScenarioMode::Collaboration], &[], Vec::new());
        p.update(&InboundEvent::collaboration(true)).unwrap();

        let bad = InboundEvent::new(EventKind::CollaborationChanged, vec![0]);
        assert!(p.update(&bad).unwrap_err().is_payload_error());
        let bad = InboundEvent::new(EventKind::CollaborationChanged, 5u32.to_le_bytes().to_vec());
        assert!(p.update(&bad).is_err());

        assert!(p.status().scenario.collaboration_enabled);
        assert_eq!(p.modes().scenario_mode, ScenarioMode::Collaboration);
        assert_eq!(p.sink().len(), 1);
    }

    #[test]
    fn test_unsubscribed_event_ignored() {
        let mut p = publisher(&[ScenarioMode::Collaboration], &[], Vec::new());
        assert!(!p.is_subscribed(EventKind::WorkloadPredictionChanged));

        let outcome = p
            .update(&InboundEvent::workload_prediction(WorkloadPrediction::Performance))
            .unwrap();
        assert!(!outcome.handled);
        assert_eq!(p.status().scenario.workload_prediction, WorkloadPrediction::Unknown);
    }

    #[test]
    fn test_subscriptions_are_union_of_resolvers() {
        let p = publisher(
            &[ScenarioMode::EwpCoolAndQuiet],
            &[GamingMode::EnduranceGaming],
            Vec::new(),
        );
        let events: Vec<EventKind> = p.subscribed_events().collect();
        assert_eq!(
            events,
            vec![
                EventKind::PowerSourceChanged,
                EventKind::EnduranceGamingStatus,
                EventKind::WorkloadPredictionChanged,
            ]
        );
    }

    #[test]
    fn test_every_event_kind_has_a_mutator() {
        for kind in EventKind::ALL {
            assert!(SIGNAL_MUTATORS.contains_key(&kind), "{}", kind);
        }
    }
}
