//! Rover uplink ESP32 firmware binary.

#[cfg(feature = "esp32")]
fn main() {
    // Link ESP-IDF patches (must be first!)
    esp_idf_sys::link_patches();

    // Initialize ESP-IDF logger for log crate integration
    esp_idf_svc::log::EspLogger::initialize_default();

    log::info!("=== Rover uplink starting ===");

    if let Err(e) = firmware::run() {
        log::error!("Uplink stopped: {}", e);
    }
}

#[cfg(feature = "esp32")]
mod firmware {
    use esp_idf_hal::peripherals::Peripherals;
    use log::{info, warn};
    use rover_uplink::credentials::NvsStore;
    use rover_uplink::report::{ReportTarget, REPORT_INTERVAL};
    use rover_uplink::transport::UartTransport;
    use rover_uplink::xbee::{RetryTimer, BAUD_CANDIDATES};
    use rover_uplink::{
        deliver, Clock, ConnectionState, ControllerConfig, IpNetwork, SystemClock,
        WirelessController,
    };
    use std::time::Duration;

    /// Control loop period.
    const POLL_PERIOD: Duration = Duration::from_millis(100);

    /// Time between rescans while no modem answers.
    const RESCAN_PERIOD: Duration = Duration::from_secs(30);

    pub fn run() -> Result<(), Box<dyn std::error::Error>> {
        let peripherals = Peripherals::take()?;
        let store = NvsStore::open()?;
        let transport = UartTransport::new(
            peripherals.uart1,
            peripherals.pins.gpio17,
            peripherals.pins.gpio16,
            BAUD_CANDIDATES[0],
        )?;

        let target = ReportTarget::from_store(&store);
        let config = ControllerConfig {
            resolve_host: target.as_ref().and_then(|t| t.host()).map(str::to_string),
            ..Default::default()
        };

        let clock = SystemClock;
        let mut controller = WirelessController::new(transport, store, clock, config)?;
        controller.init();

        let mut report_timer = RetryTimer::new(clock.now(), REPORT_INTERVAL);
        let mut rescan_timer = RetryTimer::new(clock.now(), RESCAN_PERIOD);
        let mut sequence = 0u32;

        info!("Entering main loop...");
        loop {
            std::thread::sleep(POLL_PERIOD);
            let now = clock.now();

            if controller.state() == ConnectionState::ModuleAbsent && rescan_timer.is_due(now) {
                rescan_timer.restart(now, RESCAN_PERIOD);
                controller.rescan();
                continue;
            }

            if !controller.is_available() {
                continue;
            }
            let Some(target) = &target else {
                controller.drain_response();
                continue;
            };
            if !report_timer.is_due(now) {
                continue;
            }
            report_timer.restart(now, REPORT_INTERVAL);

            let Some(address) = target.address(controller.resolved_address()) else {
                continue;
            };
            sequence = sequence.wrapping_add(1);
            let status = format!("uplink seq={} state={}\n", sequence, controller.state());
            if !deliver(&mut controller, address, target.port(), status.as_bytes()) {
                warn!("Report {} not sent", sequence);
            }
        }
    }
}

#[cfg(not(feature = "esp32"))]
fn main() {
    println!("This binary requires the 'esp32' feature.");
    println!("Use 'cargo run --bin uplink-node --features host-serial' to drive a modem from a PC.");
}
