//! Single-writer work queue
//!
//! All engine state lives in one task. Socket connections never touch it
//! directly: they submit a [`WorkItem`] and await the reply. Requests are
//! therefore applied strictly one after another, in arrival order.
//!
//! Mode notifications leave the engine through an unbounded channel and are
//! delivered by a separate task, so a slow consumer never stalls arbitration.

use serde::Serialize;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use tarb_error::{Result, ThermarbError};
use tarb_protocol::{
    InboundEvent, ModeNotification, ModeSnapshot, Request, Response, ResponseData,
};
use thermarb::domain::DomainStatus;
use thermarb::publisher::PublisherStatus;
use thermarb::{
    ArbitrationChange, CapabilityRequest, DomainRegistry, Milliseconds, Milliwatts,
    ModeChangePublisher, NotificationSink, Percentage, PolicyId, RangeRequest, ThermarbConfig,
};

/// Pending work items before submitters start waiting
const QUEUE_CAPACITY: usize = 256;

// ============================================================================
// Notification Sink
// ============================================================================

/// Forwards notifications to the delivery task
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<ModeNotification>,
}

impl ChannelSink {
    pub fn new(tx: mpsc::UnboundedSender<ModeNotification>) -> Self {
        Self { tx }
    }
}

impl NotificationSink for ChannelSink {
    fn enqueue(&mut self, notification: ModeNotification) {
        if self.tx.send(notification).is_err() {
            warn!(%notification, "Notification delivery task gone, dropping");
        }
    }
}

/// Drain notifications until every sender is dropped
pub fn spawn_delivery(mut rx: mpsc::UnboundedReceiver<ModeNotification>) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(notification) = rx.recv().await {
            match serde_json::to_string(&notification) {
                Ok(json) => info!(notification = %json, "Mode notification delivered"),
                Err(e) => warn!(error = %e, "Failed to serialize notification"),
            }
        }
        debug!("Notification delivery stopped");
    })
}

// ============================================================================
// Engine
// ============================================================================

#[derive(Debug, Serialize)]
struct EngineStatus {
    modes: PublisherStatus,
    domains: Vec<DomainStatus>,
}

/// Publisher plus domains; owned by exactly one task
pub struct Engine<S: NotificationSink> {
    publisher: ModeChangePublisher<S>,
    registry: DomainRegistry,
}

impl<S: NotificationSink> Engine<S> {
    pub fn new(config: &ThermarbConfig, sink: S) -> Result<Self> {
        Ok(Self {
            publisher: ModeChangePublisher::from_config(config, sink),
            registry: DomainRegistry::from_config(&config.domains)?,
        })
    }

    /// Apply one request; failures become error responses
    pub fn handle(&mut self, request: Request) -> Response {
        let request_type = request.type_name();
        match self.dispatch(request) {
            Ok(response) => response,
            Err(e) => {
                warn!(request = request_type, error = %e, "Request rejected");
                Response::error(e.to_string())
            }
        }
    }

    fn dispatch(&mut self, request: Request) -> Result<Response> {
        match request {
            Request::Ping => Ok(Response::ok_string("pong")),

            Request::Version => Ok(Response::ok_string(env!("CARGO_PKG_VERSION"))),

            Request::PostEvent { event, payload } => {
                let outcome = self.publisher.update(&InboundEvent::new(event, payload))?;
                Ok(Response::Ok(ResponseData {
                    status: Some(serde_json::to_value(&outcome)?),
                    modes: Some(self.publisher.modes()),
                    ..ResponseData::default()
                }))
            }

            Request::SetFanSpeed { domain, policy, percent } => {
                let speed = Percentage::new(percent)?;
                let change = self
                    .registry
                    .domain_mut(&domain)?
                    .set_fan_speed(PolicyId(policy), speed)?;
                arbitration(change)
            }

            Request::SetFanCaps { domain, policy, min_percent, max_percent } => {
                let caps = RangeRequest::new(
                    min_percent.map(Percentage::new).transpose()?,
                    max_percent.map(Percentage::new).transpose()?,
                );
                let change = self
                    .registry
                    .domain_mut(&domain)?
                    .set_fan_caps(PolicyId(policy), caps)?;
                arbitration(change)
            }

            Request::SetFanCapsLock { domain, policy, lock } => {
                let change = self
                    .registry
                    .domain_mut(&domain)?
                    .set_fan_caps_lock(PolicyId(policy), lock)?;
                arbitration(change)
            }

            Request::SetPerformanceCaps { domain, policy, lower_limit_index, upper_limit_index } => {
                let request = CapabilityRequest { upper_limit_index, lower_limit_index };
                let change = self
                    .registry
                    .domain_mut(&domain)?
                    .set_performance_caps(PolicyId(policy), request)?;
                arbitration(change)
            }

            Request::SetPerformanceCapsLock { domain, policy, lock } => {
                let change = self
                    .registry
                    .domain_mut(&domain)?
                    .set_performance_caps_lock(PolicyId(policy), lock)?;
                arbitration(change)
            }

            Request::SetPowerLimitCaps { domain, policy, limit_type, min_mw, max_mw } => {
                let caps = RangeRequest::new(min_mw.map(Milliwatts), max_mw.map(Milliwatts));
                let change = self
                    .registry
                    .domain_mut(&domain)?
                    .set_power_limit_caps(PolicyId(policy), limit_type, caps)?;
                arbitration(change)
            }

            Request::SetPowerLimitCapsLock { domain, policy, lock } => {
                let change = self
                    .registry
                    .domain_mut(&domain)?
                    .set_power_limit_caps_lock(PolicyId(policy), lock)?;
                arbitration(change)
            }

            Request::SetPowerLimit { domain, policy, limit_type, power_mw } => {
                let change = self
                    .registry
                    .domain_mut(&domain)?
                    .set_power_limit(PolicyId(policy), limit_type, Milliwatts(power_mw))?;
                arbitration(change)
            }

            Request::SetPowerLimitTimeWindow { domain, policy, limit_type, time_window_ms } => {
                let change = self.registry.domain_mut(&domain)?.set_power_limit_time_window(
                    PolicyId(policy),
                    limit_type,
                    Milliseconds(time_window_ms),
                )?;
                arbitration(change)
            }

            Request::SetPowerLimitDutyCycle { domain, policy, limit_type, percent } => {
                let duty_cycle = Percentage::new(percent)?;
                let change = self
                    .registry
                    .domain_mut(&domain)?
                    .set_power_limit_duty_cycle(PolicyId(policy), limit_type, duty_cycle)?;
                arbitration(change)
            }

            Request::RemovePolicy { policy } => {
                self.registry.remove_policy(PolicyId(policy));
                Ok(Response::ok())
            }

            Request::GetStatus => {
                let status = EngineStatus {
                    modes: self.publisher.status(),
                    domains: self.registry.status(),
                };
                Ok(Response::Ok(ResponseData::status(serde_json::to_value(&status)?)))
            }

            Request::GetModes => Ok(Response::Ok(ResponseData::modes(self.publisher.modes()))),
        }
    }

    pub fn modes(&self) -> ModeSnapshot {
        self.publisher.modes()
    }
}

fn arbitration<T: Serialize + PartialEq>(change: ArbitrationChange<T>) -> Result<Response> {
    let value = serde_json::to_value(&change.current)?;
    Ok(Response::Ok(ResponseData::arbitration(value, change.changed())))
}

// ============================================================================
// Queue
// ============================================================================

pub enum WorkItem {
    Request {
        request: Request,
        reply: oneshot::Sender<Response>,
    },
}

/// Submitting side of the queue; cheap to clone per connection
#[derive(Clone)]
pub struct WorkQueue {
    tx: mpsc::Sender<WorkItem>,
}

impl WorkQueue {
    /// Queue `request` and wait for the engine's answer
    pub async fn submit(&self, request: Request) -> Result<Response> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(WorkItem::Request { request, reply })
            .await
            .map_err(|_| ThermarbError::DaemonNotAvailable)?;
        rx.await.map_err(|_| ThermarbError::DaemonNotAvailable)
    }
}

/// Move `engine` into its own task and return the queue feeding it.
///
/// The task ends once every [`WorkQueue`] clone is dropped.
pub fn spawn_engine<S>(mut engine: Engine<S>) -> (WorkQueue, JoinHandle<()>)
where
    S: NotificationSink + Send + 'static,
{
    let (tx, mut rx) = mpsc::channel::<WorkItem>(QUEUE_CAPACITY);
    let handle = tokio::spawn(async move {
        while let Some(item) = rx.recv().await {
            match item {
                WorkItem::Request { request, reply } => {
                    let response = engine.handle(request);
                    if reply.send(response).is_err() {
                        debug!("Requester went away before the reply");
                    }
                }
            }
        }
        info!("Work queue closed, engine stopped");
    });
    (WorkQueue { tx }, handle)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use tarb_protocol::{EventKind, GamingMode, PowerLimitType, ScenarioMode};
    use thermarb::{DomainConfig, FanConfig, PowerLimitRange};

    fn test_config() -> ThermarbConfig {
        let mut limits = BTreeMap::new();
        limits.insert(PowerLimitType::Pl1, PowerLimitRange { min_mw: 4_000, max_mw: 25_000 });
        ThermarbConfig {
            supported_scenario_modes: vec![ScenarioMode::Collaboration, ScenarioMode::Gaming],
            supported_gaming_modes: vec![GamingMode::MaxPerformance],
            domains: vec![
                DomainConfig {
                    name: "fan0".into(),
                    fan: Some(FanConfig {}),
                    performance: None,
                    power_limits: BTreeMap::new(),
                },
                DomainConfig {
                    name: "soc".into(),
                    fan: None,
                    performance: None,
                    power_limits: limits,
                },
            ],
        }
    }

    fn engine() -> Engine<Vec<ModeNotification>> {
        Engine::new(&test_config(), Vec::new()).unwrap()
    }

    fn data(response: Response) -> ResponseData {
        match response {
            Response::Ok(data) => data,
            Response::Error { message } => panic!("unexpected error: {}", message),
        }
    }

    #[test]
    fn test_fan_speed_request() {
        let mut e = engine();
        let d = data(e.handle(Request::SetFanSpeed { domain: "fan0".into(), policy: 1, percent: 45.0 }));
        assert_eq!(d.changed, Some(true));
        assert_eq!(d.arbitrated, Some(serde_json::json!(45.0)));

        let d = data(e.handle(Request::SetFanSpeed { domain: "fan0".into(), policy: 2, percent: 20.0 }));
        assert_eq!(d.changed, Some(false));
    }

    #[test]
    fn test_missing_capability_is_error_response() {
        let mut e = engine();
        let r = e.handle(Request::SetFanSpeed { domain: "soc".into(), policy: 1, percent: 45.0 });
        assert!(matches!(r, Response::Error { .. }));

        let r = e.handle(Request::SetPerformanceCapsLock { domain: "nope".into(), policy: 1, lock: true });
        assert!(matches!(r, Response::Error { .. }));
    }

    #[test]
    fn test_power_limit_and_remove_policy() {
        let mut e = engine();
        let d = data(e.handle(Request::SetPowerLimitCaps {
            domain: "soc".into(),
            policy: 3,
            limit_type: PowerLimitType::Pl1,
            min_mw: None,
            max_mw: Some(12_000),
        }));
        assert_eq!(d.changed, Some(true));

        data(e.handle(Request::RemovePolicy { policy: 3 }));
        let status = data(e.handle(Request::GetStatus)).status.unwrap();
        let arbitrated = &status["domains"][1]["power_limits"]["limits"]["pl1"]["caps"]["arbitrated"];
        assert_eq!(arbitrated["max"], serde_json::json!(25_000));
    }

    #[test]
    fn test_power_limit_values_lowest_wins() {
        let mut e = engine();
        let set_limit = |policy, power_mw| Request::SetPowerLimit {
            domain: "soc".into(),
            policy,
            limit_type: PowerLimitType::Pl1,
            power_mw,
        };

        let d = data(e.handle(set_limit(1, 20_000)));
        assert_eq!(d.arbitrated, Some(serde_json::json!(20_000)));
        let d = data(e.handle(set_limit(2, 9_000)));
        assert_eq!(d.arbitrated, Some(serde_json::json!(9_000)));
        let d = data(e.handle(set_limit(3, 15_000)));
        assert_eq!(d.changed, Some(false));

        let d = data(e.handle(Request::SetPowerLimitTimeWindow {
            domain: "soc".into(),
            policy: 2,
            limit_type: PowerLimitType::Pl1,
            time_window_ms: 28_000,
        }));
        assert_eq!(d.arbitrated, Some(serde_json::json!(28_000)));

        data(e.handle(Request::RemovePolicy { policy: 2 }));
        let status = data(e.handle(Request::GetStatus)).status.unwrap();
        let pl1 = &status["domains"][1]["power_limits"]["limits"]["pl1"];
        assert_eq!(pl1["effective_power_limit"], serde_json::json!(15_000));
        assert_eq!(pl1["time_window"]["arbitrated"], serde_json::Value::Null);

        let r = e.handle(set_limit(1, 90_000));
        assert!(matches!(r, Response::Error { .. }));
    }

    #[test]
    fn test_post_event_updates_modes() {
        let mut e = engine();
        let d = data(e.handle(Request::PostEvent {
            event: EventKind::CollaborationChanged,
            payload: 1u32.to_le_bytes().to_vec(),
        }));
        assert_eq!(d.modes.unwrap().scenario_mode, ScenarioMode::Collaboration);

        let r = e.handle(Request::PostEvent { event: EventKind::CollaborationChanged, payload: vec![1] });
        assert!(matches!(r, Response::Error { .. }));
        assert_eq!(e.modes().scenario_mode, ScenarioMode::Collaboration);
    }

    #[tokio::test]
    async fn test_queue_round_trip() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let engine = Engine::new(&test_config(), ChannelSink::new(tx)).unwrap();
        let (queue, handle) = spawn_engine(engine);

        let response = queue.submit(Request::Ping).await.unwrap();
        assert_eq!(data(response).value.as_deref(), Some("pong"));

        queue
            .submit(Request::PostEvent {
                event: EventKind::CollaborationChanged,
                payload: 1u32.to_le_bytes().to_vec(),
            })
            .await
            .unwrap();
        assert_eq!(
            rx.recv().await,
            Some(ModeNotification::ScenarioModeChanged(ScenarioMode::Collaboration))
        );

        drop(queue);
        handle.await.unwrap();
    }
}
