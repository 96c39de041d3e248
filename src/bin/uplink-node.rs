//! Host-based uplink node for bench testing a modem.
//!
//! Drives a modem attached through a USB serial adapter exactly as the robot
//! firmware does, and sends a short status line to the configured report
//! destination every 10 seconds.
//!
//! # Usage
//!
//! ```bash
//! cargo run --bin uplink-node --features host-serial -- --port /dev/ttyUSB0
//! ```
//!
//! Credentials and the report destination are read from
//! `~/.rover-uplink/uplink.cfg` unless `--config` names another file.

use log::{error, info, warn};
use rover_uplink::credentials::properties::{default_config_path, PropertiesStore};
use rover_uplink::report::{ReportTarget, REPORT_INTERVAL};
use rover_uplink::transport::{find_serial_port, SerialTransport};
use rover_uplink::xbee::{RetryTimer, BAUD_CANDIDATES};
use rover_uplink::{
    deliver, Clock, ConnectionState, ControllerConfig, IpNetwork, SystemClock, WirelessController,
};
use std::path::PathBuf;
use std::process::exit;
use std::time::Duration;

/// Control loop period.
const POLL_PERIOD: Duration = Duration::from_millis(250);

/// Time between rescans while no modem answers.
const RESCAN_PERIOD: Duration = Duration::from_secs(30);

struct Options {
    port: Option<String>,
    config: Option<PathBuf>,
}

fn parse_args() -> Options {
    let args: Vec<String> = std::env::args().collect();
    let mut options = Options {
        port: None,
        config: None,
    };

    let mut iter = args.iter().skip(1);
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--port" | "-p" => options.port = iter.next().cloned(),
            "--config" | "-c" => options.config = iter.next().map(PathBuf::from),
            "--help" => {
                println!("Rover uplink node");
                println!();
                println!("Usage:");
                println!("  {} [OPTIONS]", args[0]);
                println!();
                println!("Options:");
                println!("  --port, -p <PATH>    Serial port of the modem (auto-detected)");
                println!("  --config, -c <PATH>  Configuration file (~/.rover-uplink/uplink.cfg)");
                println!("  --help               Show this help");
                exit(0);
            }
            other => {
                eprintln!("Unknown argument: {}", other);
                exit(2);
            }
        }
    }
    options
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let options = parse_args();

    let Some(port) = options.port.or_else(find_serial_port) else {
        error!("No serial port found, pass one with --port");
        exit(1);
    };

    let config_path = match options.config.map(Ok).unwrap_or_else(default_config_path) {
        Ok(path) => path,
        Err(e) => {
            error!("Cannot locate configuration file: {}", e);
            exit(1);
        }
    };
    let store = match PropertiesStore::load_from(&config_path) {
        Ok(store) => store,
        Err(e) => {
            error!("Failed to load {:?}: {}", config_path, e);
            exit(1);
        }
    };

    let target = ReportTarget::from_store(&store);
    if target.is_none() {
        warn!("No report destination configured, only joining the network");
    }

    let transport = match SerialTransport::open(&port, BAUD_CANDIDATES[0]) {
        Ok(transport) => transport,
        Err(e) => {
            error!("Failed to open {}: {}", port, e);
            exit(1);
        }
    };

    let config = ControllerConfig {
        resolve_host: target.as_ref().and_then(|t| t.host()).map(str::to_string),
        ..Default::default()
    };

    let clock = SystemClock;
    let mut controller = match WirelessController::new(transport, store, clock, config) {
        Ok(controller) => controller,
        Err(e) => {
            error!("Invalid controller configuration: {}", e);
            exit(1);
        }
    };

    info!("=== Rover uplink node on {} ===", port);
    controller.init();

    let mut report_timer = RetryTimer::new(clock.now(), REPORT_INTERVAL);
    let mut rescan_timer = RetryTimer::new(clock.now(), RESCAN_PERIOD);
    let mut sequence = 0u32;
    let mut last_state = controller.state();

    loop {
        std::thread::sleep(POLL_PERIOD);
        let now = clock.now();

        if controller.state() == ConnectionState::ModuleAbsent && rescan_timer.is_due(now) {
            rescan_timer.restart(now, RESCAN_PERIOD);
            if controller.rescan() {
                info!("Modem found at {:?} baud", controller.detected_baud());
            }
            continue;
        }

        let available = controller.is_available();
        if controller.state() != last_state {
            last_state = controller.state();
            info!("Uplink {}", last_state);
        }
        if !available {
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
        let status = format!("uplink seq={} state={}\n", sequence, last_state);
        if !deliver(&mut controller, address, target.port(), status.as_bytes()) {
            warn!("Report {} not sent", sequence);
        }
    }
}
