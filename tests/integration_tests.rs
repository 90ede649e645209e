/*
 * Integration tests for Thermarb
 *
 * These tests drive configuration loading, the domain registry and the mode
 * publisher together through the public API.
 */

use std::collections::BTreeMap;
use std::io::Write;

use mockall::predicate::eq;
use serial_test::serial;
use tempfile::NamedTempFile;

use thermarb::constants::paths::CONFIG_ENV;
use thermarb::{
    load_config, load_config_from, Bounds, CapabilityBounds, CapabilityRequest, DomainRegistry,
    EnduranceGamingStatus, EventKind, GamingMode, InboundEvent, Milliwatts, ModeChangePublisher,
    ModeNotification, NotificationSink, Percentage, PolicyId, PowerLimitType, PowerSource,
    RangeRequest, ScenarioMode, ThermarbError, WorkloadPrediction,
};

mockall::mock! {
    Sink {}
    impl NotificationSink for Sink {
        fn enqueue(&mut self, notification: ModeNotification);
    }
}

// Test utilities
const PLATFORM_CONFIG: &str = r#"{
    "supported_scenario_modes": ["gaming", "collaboration", "ewp_cool_and_quiet", "ewp_performance"],
    "supported_gaming_modes": ["max_performance", "endurance_gaming"],
    "domains": [
        {
            "name": "cpu",
            "performance": { "control_set_depth": 8 },
            "power_limits": {
                "pl1": { "min_mw": 5000, "max_mw": 28000 },
                "pl2": { "min_mw": 10000, "max_mw": 64000 }
            }
        },
        { "name": "fan0", "fan": {} }
    ]
}"#;

fn write_config(contents: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    file.flush().unwrap();
    file
}

fn pct(v: f32) -> Percentage {
    Percentage::new(v).unwrap()
}

// ============================================================================
// Configuration
// ============================================================================

#[test]
#[serial]
fn test_load_config_from_env_builds_registry() {
    let file = write_config(PLATFORM_CONFIG);
    std::env::set_var(CONFIG_ENV, file.path());

    let config = load_config();
    std::env::remove_var(CONFIG_ENV);
    let config = config.unwrap();

    let registry = DomainRegistry::from_config(&config.domains).unwrap();
    assert_eq!(registry.names().collect::<Vec<_>>(), vec!["cpu", "fan0"]);

    let cpu = registry.domain("cpu").unwrap();
    assert!(cpu.fan().is_err());
    assert_eq!(cpu.performance().unwrap().depth(), 8);
    assert_eq!(
        cpu.power_limits().unwrap().limit_types().collect::<Vec<_>>(),
        vec![PowerLimitType::Pl1, PowerLimitType::Pl2]
    );
}

#[test]
fn test_rejects_invalid_mode_in_whitelist() {
    let file = write_config(r#"{ "supported_scenario_modes": ["invalid"] }"#);
    assert!(load_config_from(file.path()).is_err());
}

#[test]
fn test_rejects_inverted_power_range() {
    let file = write_config(
        r#"{ "domains": [ { "name": "soc", "power_limits": { "pl1": { "min_mw": 9000, "max_mw": 1000 } } } ] }"#,
    );
    assert!(load_config_from(file.path()).is_err());
}

#[test]
fn test_missing_config_file_is_empty_platform() {
    let dir = tempfile::tempdir().unwrap();
    let config = load_config_from(&dir.path().join("absent.json")).unwrap();
    assert!(config.domains.is_empty());
    assert!(config.supported_scenario_modes.is_empty());
}

// ============================================================================
// Domain Arbitration
// ============================================================================

#[test]
fn test_policies_share_a_fan_domain() {
    let file = write_config(PLATFORM_CONFIG);
    let config = load_config_from(file.path()).unwrap();
    let mut registry = DomainRegistry::from_config(&config.domains).unwrap();

    let thermal = PolicyId(1);
    let acoustic = PolicyId(2);
    let fan0 = registry.domain_mut("fan0").unwrap();

    fan0.set_fan_speed(thermal, pct(40.0)).unwrap();
    let change = fan0.set_fan_speed(acoustic, pct(70.0)).unwrap();
    assert_eq!(change.current, pct(70.0));

    // The acoustic policy caps the fan below its own speed request
    fan0.set_fan_caps(acoustic, RangeRequest::new(None, Some(pct(50.0))))
        .unwrap();
    let fan = fan0.fan().unwrap();
    assert_eq!(fan.arbitrated_speed(), pct(70.0));
    assert_eq!(fan.effective_speed(), pct(50.0));

    registry.remove_policy(acoustic);
    let fan = registry.domain("fan0").unwrap().fan().unwrap();
    assert_eq!(fan.arbitrated_speed(), pct(40.0));
    assert_eq!(fan.arbitrated_caps(), Bounds::new(Percentage::ZERO, Percentage::FULL));
}

#[test]
fn test_performance_and_power_limits_on_cpu() {
    let file = write_config(PLATFORM_CONFIG);
    let config = load_config_from(file.path()).unwrap();
    let mut registry = DomainRegistry::from_config(&config.domains).unwrap();
    let cpu = registry.domain_mut("cpu").unwrap();

    cpu.set_performance_caps(
        PolicyId(1),
        CapabilityRequest {
            upper_limit_index: Some(2),
            lower_limit_index: None,
        },
    )
    .unwrap();
    let change = cpu
        .set_performance_caps(
            PolicyId(2),
            CapabilityRequest {
                upper_limit_index: Some(4),
                lower_limit_index: Some(6),
            },
        )
        .unwrap();
    assert_eq!(
        change.current,
        CapabilityBounds {
            upper_limit_index: 4,
            lower_limit_index: 6
        }
    );

    let change = cpu
        .set_power_limit_caps(
            PolicyId(1),
            PowerLimitType::Pl1,
            RangeRequest::new(None, Some(Milliwatts(15000))),
        )
        .unwrap();
    assert_eq!(change.current, Bounds::new(Milliwatts(5000), Milliwatts(15000)));

    // PL4 is not declared for this domain
    assert!(cpu
        .set_power_limit_caps(PolicyId(1), PowerLimitType::Pl4, RangeRequest::new(None, Some(Milliwatts(1))))
        .is_err());

    // Domains without a control reject requests for it
    let fan0 = registry.domain_mut("fan0").unwrap();
    let err = fan0.set_performance_caps_lock(PolicyId(1), true).unwrap_err();
    assert!(matches!(err, ThermarbError::RejectedOperation { .. }));

    assert!(registry.domain_mut("gpu").is_err());
}

// ============================================================================
// Mode Publication
// ============================================================================

#[test]
fn test_publisher_walks_through_scenarios() {
    let file = write_config(PLATFORM_CONFIG);
    let config = load_config_from(file.path()).unwrap();
    let mut publisher = ModeChangePublisher::from_config(&config, Vec::new());

    publisher
        .update(&InboundEvent::workload_prediction(WorkloadPrediction::CoolAndQuiet))
        .unwrap();
    publisher.update(&InboundEvent::collaboration(true)).unwrap();
    publisher.update(&InboundEvent::power_source(PowerSource::Dc)).unwrap();
    publisher
        .update(&InboundEvent::endurance_gaming(EnduranceGamingStatus::On))
        .unwrap();
    publisher.update(&InboundEvent::collaboration(false)).unwrap();

    assert_eq!(
        publisher.sink().as_slice(),
        &[
            ModeNotification::ScenarioModeChanged(ScenarioMode::EwpCoolAndQuiet),
            ModeNotification::ScenarioModeChanged(ScenarioMode::Collaboration),
            ModeNotification::ScenarioModeChanged(ScenarioMode::Gaming),
            ModeNotification::GamingModeChanged(GamingMode::EnduranceGaming),
        ]
    );
    assert_eq!(publisher.modes().scenario_mode, ScenarioMode::Gaming);
    assert_eq!(publisher.modes().gaming_mode, GamingMode::EnduranceGaming);
}

#[test]
fn test_publisher_notifies_mock_sink_once_per_change() {
    let mut sink = MockSink::new();
    sink.expect_enqueue()
        .with(eq(ModeNotification::ScenarioModeChanged(ScenarioMode::Collaboration)))
        .times(1)
        .return_const(());
    sink.expect_enqueue()
        .with(eq(ModeNotification::ScenarioModeChanged(ScenarioMode::Invalid)))
        .times(1)
        .return_const(());

    let mut publisher = ModeChangePublisher::new(
        [ScenarioMode::Collaboration].into_iter().collect(),
        std::iter::empty().collect(),
        sink,
    );
    assert_eq!(
        publisher.subscribed_events().collect::<Vec<_>>(),
        vec![EventKind::CollaborationChanged]
    );

    publisher.update(&InboundEvent::collaboration(true)).unwrap();
    publisher.update(&InboundEvent::collaboration(true)).unwrap();
    publisher.update(&InboundEvent::collaboration(false)).unwrap();

    // Not subscribed under this whitelist
    let outcome = publisher
        .update(&InboundEvent::power_source(PowerSource::Ac))
        .unwrap();
    assert!(!outcome.handled);
}

#[test]
fn test_malformed_event_payload_is_rejected() {
    let file = write_config(PLATFORM_CONFIG);
    let config = load_config_from(file.path()).unwrap();
    let mut publisher = ModeChangePublisher::from_config(&config, Vec::new());

    let event = InboundEvent::new(EventKind::PowerSourceChanged, vec![0x01]);
    assert!(publisher.update(&event).is_err());
    assert!(publisher.sink().is_empty());
    assert_eq!(publisher.modes().scenario_mode, ScenarioMode::Invalid);
}

#[test]
fn test_power_limit_ranges_from_code() {
    let mut ranges = BTreeMap::new();
    ranges.insert(
        PowerLimitType::Pl1,
        thermarb::PowerLimitRange {
            min_mw: 1000,
            max_mw: 2000,
        },
    );
    let mut registry = DomainRegistry::new();
    registry
        .insert(thermarb::Domain::new("soc").with_power_limits(&ranges))
        .unwrap();
    assert!(registry.insert(thermarb::Domain::new("soc")).is_err());

    let soc = registry.domain_mut("soc").unwrap();
    assert!(soc
        .set_power_limit_caps(PolicyId(3), PowerLimitType::Pl1, RangeRequest::new(Some(Milliwatts(500)), None))
        .is_err());
}
