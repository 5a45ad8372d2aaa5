use core_logic::{PacingConfig, WatchdogConfig};
use std::time::Duration;

#[test]
fn test_pacing_defaults() {
    let pacing = PacingConfig::default();
    assert_eq!(pacing.create_delay(), Duration::from_millis(100));
    assert_eq!(pacing.transfer_delay(), Duration::from_millis(500));
    assert_eq!(pacing.swap_delay(), Duration::from_secs(2));
}

#[test]
fn test_pacing_partial_override() {
    let pacing: PacingConfig = serde_json::from_str(r#"{ "swap_delay_ms": 5000 }"#).unwrap();
    assert_eq!(pacing.create_delay_ms, 100);
    assert_eq!(pacing.transfer_delay_ms, 500);
    assert_eq!(pacing.swap_delay_ms, 5000);
}

#[test]
fn test_pacing_immediate_has_no_delays() {
    let pacing = PacingConfig::immediate();
    assert_eq!(pacing.create_delay(), Duration::ZERO);
    assert_eq!(pacing.transfer_delay(), Duration::ZERO);
    assert_eq!(pacing.swap_delay(), Duration::ZERO);
}

#[test]
fn test_watchdog_defaults() {
    let watchdog = WatchdogConfig::default();
    assert_eq!(watchdog.check_interval(), Duration::from_secs(10));
    assert_eq!(watchdog.stall_threshold(), Duration::from_secs(60));
}

#[test]
fn test_watchdog_zero_interval_is_clamped() {
    let watchdog: WatchdogConfig =
        serde_json::from_str(r#"{ "check_interval_ms": 0, "stall_threshold_ms": 30 }"#).unwrap();
    assert_eq!(watchdog.check_interval(), Duration::from_millis(1));
    assert_eq!(watchdog.stall_threshold(), Duration::from_millis(30));
}
