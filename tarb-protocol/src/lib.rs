//! Shared protocol types for Thermarb
//!
//! - Inbound platform events and their fixed-width payload decoding
//! - Signal and mode enumerations shared by the engine and its clients
//! - Outbound mode-change notifications
//! - Daemon IPC request/response envelopes (newline-delimited JSON)

use serde::{Deserialize, Serialize};
use std::fmt;

use tarb_error::{Result, ThermarbError};

/// Maximum message size for IPC (8KB)
pub const MAX_MESSAGE_SIZE: usize = 8 * 1024;

/// Maximum domain name length accepted over IPC
const MAX_DOMAIN_NAME_LENGTH: usize = 64;

/// Largest raw event payload accepted over IPC; real payloads are 1 or 4 bytes
const MAX_EVENT_PAYLOAD: usize = 16;

// ============================================================================
// Signals
// ============================================================================

/// Operating system power source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PowerSource {
    Ac,
    Dc,
    Invalid,
}

impl fmt::Display for PowerSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PowerSource::Ac => "AC",
            PowerSource::Dc => "DC",
            PowerSource::Invalid => "Invalid",
        };
        f.write_str(s)
    }
}

/// Endurance gaming status broadcast by the graphics control application
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnduranceGamingStatus {
    Off,
    On,
}

impl EnduranceGamingStatus {
    pub fn is_active(self) -> bool {
        self == EnduranceGamingStatus::On
    }
}

impl fmt::Display for EnduranceGamingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            EnduranceGamingStatus::Off => "Off",
            EnduranceGamingStatus::On => "On",
        })
    }
}

/// Extended workload prediction reported by the processor domain
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkloadPrediction {
    Unknown,
    CoolAndQuiet,
    Performance,
}

impl fmt::Display for WorkloadPrediction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            WorkloadPrediction::Unknown => "Unknown",
            WorkloadPrediction::CoolAndQuiet => "CoolAndQuiet",
            WorkloadPrediction::Performance => "Performance",
        })
    }
}

// ============================================================================
// Modes
// ============================================================================

/// Platform-wide scenario mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScenarioMode {
    Gaming,
    Collaboration,
    EwpCoolAndQuiet,
    EwpPerformance,
    Invalid,
}

impl ScenarioMode {
    /// Every selectable scenario mode (excludes `Invalid`)
    pub const SELECTABLE: [ScenarioMode; 4] = [
        ScenarioMode::Gaming,
        ScenarioMode::Collaboration,
        ScenarioMode::EwpCoolAndQuiet,
        ScenarioMode::EwpPerformance,
    ];
}

impl fmt::Display for ScenarioMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ScenarioMode::Gaming => "Gaming",
            ScenarioMode::Collaboration => "Collaboration",
            ScenarioMode::EwpCoolAndQuiet => "EwpCoolAndQuiet",
            ScenarioMode::EwpPerformance => "EwpPerformance",
            ScenarioMode::Invalid => "Invalid",
        })
    }
}

/// Gaming mode nested under `ScenarioMode::Gaming`
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GamingMode {
    MaxPerformance,
    EnduranceGaming,
    Invalid,
}

impl GamingMode {
    /// Every selectable gaming mode (excludes `Invalid`)
    pub const SELECTABLE: [GamingMode; 2] = [GamingMode::MaxPerformance, GamingMode::EnduranceGaming];
}

impl fmt::Display for GamingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            GamingMode::MaxPerformance => "MaxPerformance",
            GamingMode::EnduranceGaming => "EnduranceGaming",
            GamingMode::Invalid => "Invalid",
        })
    }
}

/// Power limit types a power control domain may expose
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PowerLimitType {
    Pl1,
    Pl2,
    Pl3,
    Pl4,
}

impl fmt::Display for PowerLimitType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            PowerLimitType::Pl1 => "PL1",
            PowerLimitType::Pl2 => "PL2",
            PowerLimitType::Pl3 => "PL3",
            PowerLimitType::Pl4 => "PL4",
        })
    }
}

// ============================================================================
// Inbound Events
// ============================================================================

/// Kinds of inbound platform events consumed by the mode publisher
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    PowerSourceChanged,
    ApplicationOptimizationChanged,
    EnduranceGamingStatus,
    CollaborationChanged,
    WorkloadPredictionChanged,
}

impl EventKind {
    pub const ALL: [EventKind; 5] = [
        EventKind::PowerSourceChanged,
        EventKind::ApplicationOptimizationChanged,
        EventKind::EnduranceGamingStatus,
        EventKind::CollaborationChanged,
        EventKind::WorkloadPredictionChanged,
    ];

    /// Documented payload width in bytes
    pub fn payload_width(self) -> usize {
        match self {
            EventKind::EnduranceGamingStatus => 1,
            _ => 4,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            EventKind::PowerSourceChanged => "power_source_changed",
            EventKind::ApplicationOptimizationChanged => "application_optimization_changed",
            EventKind::EnduranceGamingStatus => "endurance_gaming_status",
            EventKind::CollaborationChanged => "collaboration_changed",
            EventKind::WorkloadPredictionChanged => "workload_prediction_changed",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One inbound event: its kind plus the raw fixed-width payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InboundEvent {
    pub kind: EventKind,
    pub payload: Vec<u8>,
}

impl InboundEvent {
    pub fn new(kind: EventKind, payload: Vec<u8>) -> Self {
        Self { kind, payload }
    }

    pub fn power_source(source: PowerSource) -> Self {
        let raw = match source {
            PowerSource::Ac => 0,
            PowerSource::Dc => 1,
            PowerSource::Invalid => u32::MAX,
        };
        Self::new(EventKind::PowerSourceChanged, raw.to_le_bytes().to_vec())
    }

    pub fn application_optimization(active: bool) -> Self {
        Self::new(
            EventKind::ApplicationOptimizationChanged,
            u32::from(active).to_le_bytes().to_vec(),
        )
    }

    pub fn endurance_gaming(status: EnduranceGamingStatus) -> Self {
        Self::new(EventKind::EnduranceGamingStatus, vec![status as u8])
    }

    pub fn collaboration(enabled: bool) -> Self {
        Self::new(
            EventKind::CollaborationChanged,
            u32::from(enabled).to_le_bytes().to_vec(),
        )
    }

    pub fn workload_prediction(prediction: WorkloadPrediction) -> Self {
        let raw: u32 = match prediction {
            WorkloadPrediction::Unknown => 0,
            WorkloadPrediction::CoolAndQuiet => 1,
            WorkloadPrediction::Performance => 2,
        };
        Self::new(EventKind::WorkloadPredictionChanged, raw.to_le_bytes().to_vec())
    }
}

fn check_width(kind: EventKind, payload: &[u8]) -> Result<()> {
    let expected = kind.payload_width();
    if payload.len() != expected {
        return Err(ThermarbError::malformed(kind.as_str(), expected, payload.len()));
    }
    Ok(())
}

fn read_u32(kind: EventKind, payload: &[u8]) -> Result<u32> {
    check_width(kind, payload)?;
    let mut raw = [0u8; 4];
    raw.copy_from_slice(payload);
    Ok(u32::from_le_bytes(raw))
}

fn invalid_value(kind: EventKind, value: u32) -> ThermarbError {
    ThermarbError::InvalidPayloadValue {
        event: kind.as_str().to_string(),
        value,
    }
}

fn decode_toggle(kind: EventKind, payload: &[u8]) -> Result<bool> {
    match read_u32(kind, payload)? {
        0 => Ok(false),
        1 => Ok(true),
        other => Err(invalid_value(kind, other)),
    }
}

pub fn decode_power_source(payload: &[u8]) -> Result<PowerSource> {
    let kind = EventKind::PowerSourceChanged;
    match read_u32(kind, payload)? {
        0 => Ok(PowerSource::Ac),
        1 => Ok(PowerSource::Dc),
        other => Err(invalid_value(kind, other)),
    }
}

pub fn decode_application_optimization(payload: &[u8]) -> Result<bool> {
    decode_toggle(EventKind::ApplicationOptimizationChanged, payload)
}

pub fn decode_endurance_gaming(payload: &[u8]) -> Result<EnduranceGamingStatus> {
    let kind = EventKind::EnduranceGamingStatus;
    check_width(kind, payload)?;
    match payload[0] {
        0 => Ok(EnduranceGamingStatus::Off),
        1 => Ok(EnduranceGamingStatus::On),
        other => Err(invalid_value(kind, u32::from(other))),
    }
}

pub fn decode_collaboration(payload: &[u8]) -> Result<bool> {
    decode_toggle(EventKind::CollaborationChanged, payload)
}

pub fn decode_workload_prediction(payload: &[u8]) -> Result<WorkloadPrediction> {
    let kind = EventKind::WorkloadPredictionChanged;
    match read_u32(kind, payload)? {
        0 => Ok(WorkloadPrediction::Unknown),
        1 => Ok(WorkloadPrediction::CoolAndQuiet),
        2 => Ok(WorkloadPrediction::Performance),
        other => Err(invalid_value(kind, other)),
    }
}

// ============================================================================
// Outbound Notifications
// ============================================================================

/// Edge-triggered mode change, delivered fire-and-forget to policies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "notification", content = "mode", rename_all = "snake_case")]
pub enum ModeNotification {
    ScenarioModeChanged(ScenarioMode),
    GamingModeChanged(GamingMode),
}

impl fmt::Display for ModeNotification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModeNotification::ScenarioModeChanged(m) => write!(f, "ScenarioModeChanged({})", m),
            ModeNotification::GamingModeChanged(m) => write!(f, "GamingModeChanged({})", m),
        }
    }
}

// ============================================================================
// Daemon IPC
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestEnvelope {
    /// Unique request ID for correlation and debugging
    pub id: u64,
    /// The actual request
    #[serde(flatten)]
    pub request: Request,
}

impl RequestEnvelope {
    pub fn with_id(request: Request, id: u64) -> Self {
        Self { id, request }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "cmd", content = "data")]
pub enum Request {
    Ping,
    Version,
    /// Inject an inbound platform event into the mode publisher
    PostEvent { event: EventKind, payload: Vec<u8> },
    SetFanSpeed { domain: String, policy: u32, percent: f32 },
    SetFanCaps {
        domain: String,
        policy: u32,
        min_percent: Option<f32>,
        max_percent: Option<f32>,
    },
    SetFanCapsLock { domain: String, policy: u32, lock: bool },
    SetPerformanceCaps {
        domain: String,
        policy: u32,
        lower_limit_index: Option<u32>,
        upper_limit_index: Option<u32>,
    },
    SetPerformanceCapsLock { domain: String, policy: u32, lock: bool },
    SetPowerLimitCaps {
        domain: String,
        policy: u32,
        limit_type: PowerLimitType,
        min_mw: Option<u32>,
        max_mw: Option<u32>,
    },
    SetPowerLimitCapsLock { domain: String, policy: u32, lock: bool },
    /// Lowest requested power limit wins, held inside the arbitrated caps
    SetPowerLimit {
        domain: String,
        policy: u32,
        limit_type: PowerLimitType,
        power_mw: u32,
    },
    SetPowerLimitTimeWindow {
        domain: String,
        policy: u32,
        limit_type: PowerLimitType,
        time_window_ms: u32,
    },
    SetPowerLimitDutyCycle {
        domain: String,
        policy: u32,
        limit_type: PowerLimitType,
        percent: f32,
    },
    /// Withdraw every request a policy holds on every domain
    RemovePolicy { policy: u32 },
    GetStatus,
    GetModes,
}

impl Request {
    /// Validate request parameters before dispatching to the engine
    pub fn validate(&self) -> std::result::Result<(), String> {
        match self {
            Request::Ping | Request::Version | Request::GetStatus | Request::GetModes => Ok(()),

            Request::RemovePolicy { .. } => Ok(()),

            Request::PostEvent { payload, .. } => validate_event_payload(payload),

            Request::SetFanSpeed { domain, percent, .. } => {
                validate_domain_name(domain)?;
                validate_percent(*percent)?;
                Ok(())
            }

            Request::SetFanCaps { domain, min_percent, max_percent, .. } => {
                validate_domain_name(domain)?;
                if let Some(p) = min_percent {
                    validate_percent(*p)?;
                }
                if let Some(p) = max_percent {
                    validate_percent(*p)?;
                }
                Ok(())
            }

            Request::SetPerformanceCaps { domain, .. } => validate_domain_name(domain),
            Request::SetPowerLimitCaps { domain, .. } | Request::SetPowerLimit { domain, .. } => {
                validate_domain_name(domain)
            }

            Request::SetPowerLimitTimeWindow { domain, time_window_ms, .. } => {
                validate_domain_name(domain)?;
                if *time_window_ms == 0 {
                    return Err("Time window must be non-zero".into());
                }
                Ok(())
            }

            Request::SetPowerLimitDutyCycle { domain, percent, .. } => {
                validate_domain_name(domain)?;
                validate_percent(*percent)
            }

            Request::SetFanCapsLock { domain, .. }
            | Request::SetPerformanceCapsLock { domain, .. }
            | Request::SetPowerLimitCapsLock { domain, .. } => validate_domain_name(domain),
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Request::Ping => "Ping",
            Request::Version => "Version",
            Request::PostEvent { .. } => "PostEvent",
            Request::SetFanSpeed { .. } => "SetFanSpeed",
            Request::SetFanCaps { .. } => "SetFanCaps",
            Request::SetFanCapsLock { .. } => "SetFanCapsLock",
            Request::SetPerformanceCaps { .. } => "SetPerformanceCaps",
            Request::SetPerformanceCapsLock { .. } => "SetPerformanceCapsLock",
            Request::SetPowerLimitCaps { .. } => "SetPowerLimitCaps",
            Request::SetPowerLimitCapsLock { .. } => "SetPowerLimitCapsLock",
            Request::SetPowerLimit { .. } => "SetPowerLimit",
            Request::SetPowerLimitTimeWindow { .. } => "SetPowerLimitTimeWindow",
            Request::SetPowerLimitDutyCycle { .. } => "SetPowerLimitDutyCycle",
            Request::RemovePolicy { .. } => "RemovePolicy",
            Request::GetStatus => "GetStatus",
            Request::GetModes => "GetModes",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponseEnvelope {
    /// Request ID this response corresponds to
    pub id: u64,
    /// The actual response
    #[serde(flatten)]
    pub response: Response,
}

impl ResponseEnvelope {
    pub fn new(id: u64, response: Response) -> Self {
        Self { id, response }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "status")]
pub enum Response {
    #[serde(rename = "ok")]
    Ok(ResponseData),
    #[serde(rename = "error")]
    Error { message: String },
}

/// Current modes as last published by the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModeSnapshot {
    pub scenario_mode: ScenarioMode,
    pub gaming_mode: GamingMode,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResponseData {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    /// Arbitrated value after a set request, and whether it changed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub arbitrated: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub changed: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub modes: Option<ModeSnapshot>,
}

impl ResponseData {
    pub fn none() -> Self { Self::default() }
    pub fn string(v: String) -> Self { Self { value: Some(v), ..Self::default() } }
    pub fn arbitration(value: serde_json::Value, changed: bool) -> Self {
        Self { arbitrated: Some(value), changed: Some(changed), ..Self::default() }
    }
    pub fn status(s: serde_json::Value) -> Self { Self { status: Some(s), ..Self::default() } }
    pub fn modes(m: ModeSnapshot) -> Self { Self { modes: Some(m), ..Self::default() } }
}

impl Response {
    pub fn ok() -> Self {
        Response::Ok(ResponseData::none())
    }

    pub fn ok_string(s: impl Into<String>) -> Self {
        Response::Ok(ResponseData::string(s.into()))
    }

    pub fn error(msg: impl Into<String>) -> Self {
        Response::Error { message: msg.into() }
    }
}

pub fn validate_domain_name(name: &str) -> std::result::Result<(), String> {
    if name.is_empty() {
        return Err("Domain name cannot be empty".into());
    }

    if name.len() > MAX_DOMAIN_NAME_LENGTH {
        return Err(format!(
            "Domain name too long: {} > {} chars",
            name.len(),
            MAX_DOMAIN_NAME_LENGTH
        ));
    }

    for c in name.chars() {
        if !c.is_ascii_alphanumeric() && c != '-' && c != '_' && c != '.' {
            return Err(format!("Domain name contains invalid character: {:?}", c));
        }
    }

    Ok(())
}

pub fn validate_percent(percent: f32) -> std::result::Result<(), String> {
    if !percent.is_finite() || !(0.0..=100.0).contains(&percent) {
        return Err(format!("Percent must be 0.0-100.0, got {}", percent));
    }
    Ok(())
}

pub fn validate_event_payload(payload: &[u8]) -> std::result::Result<(), String> {
    if payload.len() > MAX_EVENT_PAYLOAD {
        return Err(format!(
            "Event payload too large: {} > {} bytes",
            payload.len(),
            MAX_EVENT_PAYLOAD
        ));
    }
    Ok(())
}
