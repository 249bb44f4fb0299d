//! Integration tests: the bridge's frame monitor driven by a real adapter.
//!
//! Uses the simulated device and in-memory directory from `tap_core`, so the
//! whole path (config → options → adapter → read thread → monitor) runs on
//! any host.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tap_bridge::application::frame_monitor::{FrameMonitor, TrafficStats};
use tap_bridge::infrastructure::storage::config::BridgeConfig;
use tap_core::device::simulated::{SimulatedDevice, SimulatedOpener};
use tap_core::directory::memory::InMemoryDirectory;
use tap_core::{DriverVersion, TapAdapter};

const TIMEOUT: Duration = Duration::from_secs(5);

fn wait_for(monitor: &FrameMonitor, done: impl Fn(&TrafficStats) -> bool) -> TrafficStats {
    let deadline = Instant::now() + TIMEOUT;
    loop {
        let stats = monitor.snapshot();
        if done(&stats) || Instant::now() >= deadline {
            return stats;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
}

#[test]
fn test_monitor_counts_traffic_through_an_active_adapter() {
    // Arrange
    let device = SimulatedDevice::new();
    let monitor = Arc::new(FrameMonitor::new());
    let mut adapter = TapAdapter::new(
        InMemoryDirectory::new().with_tap("{TAP-1}", "Local Area Connection 2"),
        SimulatedOpener::new(device.clone()),
        Arc::clone(&monitor) as Arc<dyn tap_core::FrameSink>,
        BridgeConfig::default().adapter_options(),
    );
    adapter.activate().expect("activate");
    adapter.recv_start();

    // Act
    device.push_frame(vec![0xFF; 60]);
    device.push_frame(vec![0x01; 8]);
    assert!(adapter.send(&[0xAB; 64]));

    // Assert
    let stats = wait_for(&monitor, |s| s.frames_received == 2);
    assert_eq!(stats.frames_received, 2);
    assert_eq!(stats.bytes_received, 68);
    assert_eq!(stats.runt_frames, 1);
    assert_eq!(stats.sends_completed, 1);
}

#[test]
fn test_configured_minimum_version_is_enforced() {
    // Arrange: driver 9.21, config demands 9.24
    let mut config = BridgeConfig::default();
    config.adapter.min_driver_minor = 24;
    let device = SimulatedDevice::new().with_version(DriverVersion::new(9, 21));
    let mut adapter = TapAdapter::new(
        InMemoryDirectory::new().with_tap("{TAP-1}", "Local Area Connection 2"),
        SimulatedOpener::new(device.clone()),
        Arc::new(FrameMonitor::new()) as Arc<dyn tap_core::FrameSink>,
        config.adapter_options(),
    );

    // Act
    let result = adapter.activate();

    // Assert
    assert!(result.is_err());
    assert!(!adapter.is_activated());
    assert_eq!(device.open_handles(), 0);
}

#[test]
fn test_configured_component_id_selects_the_adapter() {
    // Arrange: only a "tap_custom" adapter is registered
    let mut config = BridgeConfig::default();
    config.adapter.component_id = "tap_custom".to_string();
    let directory = InMemoryDirectory::new()
        .with_tap("{TAP-1}", "Local Area Connection 2")
        .with_adapter("{CUSTOM-1}", "tap_custom", "Custom TAP");
    let mut adapter = TapAdapter::new(
        directory,
        SimulatedOpener::new(SimulatedDevice::new()),
        Arc::new(FrameMonitor::new()) as Arc<dyn tap_core::FrameSink>,
        config.adapter_options(),
    );

    // Act
    adapter.activate().expect("activate");

    // Assert
    assert_eq!(adapter.device_id().map(|id| id.as_str()), Some("{CUSTOM-1}"));
}
