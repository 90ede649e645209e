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

//! Thermarb Core Library
//!
//! Arbitration and mode resolution for platform thermal and power policies
//! that share the same hardware controls.
//!
//! # Features
//!
//! - **Arbitration**: max-wins, min-wins, bounded-range and lock reductions over
//!   per-policy requests, with side-effect free dry runs
//! - **Domains**: fan, performance and power limit controls built from
//!   configuration, each arbitrated independently
//! - **Mode Resolution**: gaming and scenario modes derived from platform
//!   signals through ordered rule tables
//! - **Publishing**: edge-triggered mode change notifications
//!
//! # Module Structure
//!
//! - `arbitration/` - conflict-resolution primitives
//! - `modes/` - gaming and scenario resolvers
//! - `domain` - participant domains and the registry
//! - `publisher` - event routing and notification
//!
//! # Example
//!
//! ```
//! use thermarb::{MaxValueArbitrator, Percentage, PolicyId};
//!
//! let mut speed = MaxValueArbitrator::new(Percentage::ZERO);
//! speed.commit(PolicyId(1), Percentage::new(40.0).unwrap());
//! speed.commit(PolicyId(2), Percentage::new(65.0).unwrap());
//! assert_eq!(speed.arbitrated_value().value(), 65.0);
//! ```

// Grouped modules
pub mod arbitration;
pub mod modes;

// Standalone modules
pub mod config;
pub mod constants;
pub mod domain;
pub mod error;
pub mod ledger;
pub mod publisher;
pub mod types;

pub use arbitration::{
    BoundedRangeArbitrator, Bounds, CapabilityBounds, CapabilityBoundsArbitrator,
    CapabilityRequest, LockArbitrator, MaxValueArbitrator, MinValueArbitrator, PolicyRequest,
    RangeRequest,
};
pub use config::{
    get_config_path, load_config, load_config_from, validate_config, DomainConfig, FanConfig,
    PerformanceConfig, PowerLimitRange, ThermarbConfig,
};
pub use domain::{
    Domain, DomainRegistry, DomainStatus, FanControl, PowerLimitControl, PowerLimitStatus,
};
pub use error::{Result, ThermarbError};
pub use ledger::{LedgerSnapshot, RequestLedger};
pub use modes::{GamingModeResolver, ScenarioModeResolver, SupportedModeSet};
pub use publisher::{ModeChangePublisher, NotificationSink, PublishOutcome, PublisherStatus};
pub use types::{
    ArbitrationChange, Capability, Milliseconds, Milliwatts, Percentage, PerformanceIndex, PolicyId,
};

// Shared protocol types used throughout the public API
pub use tarb_protocol::{
    EnduranceGamingStatus, EventKind, GamingMode, InboundEvent, ModeNotification, ModeSnapshot,
    PowerLimitType, PowerSource, ScenarioMode, WorkloadPrediction,
};
