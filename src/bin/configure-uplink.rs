//! Uplink configuration utility for ESP32.
//!
//! Stores one Wi-Fi credential slot and the report destination to NVS for
//! use by the firmware.
//!
//! Usage:
//!   WIFI_SLOT=0 WIFI_SSID="MyNetwork" WIFI_MODE=wpa2 WIFI_PSK="secret" \
//!   REPORT_HOST="reports.example.net" cargo run --bin configure-uplink --features esp32
//!
//! Omit `WIFI_MODE` and `WIFI_PSK` for open networks. After running this once,
//! the ESP32 will remember the settings across reboots.

/// Credential slot (0-9) - set via WIFI_SLOT at compile time, default 0.
#[cfg(feature = "esp32")]
const WIFI_SLOT: Option<&str> = option_env!("WIFI_SLOT");

/// Network name - set via WIFI_SSID at compile time.
#[cfg(feature = "esp32")]
const WIFI_SSID: Option<&str> = option_env!("WIFI_SSID");

/// Security mode (0-3 or none/wpa/wpa2/wep) - set via WIFI_MODE.
#[cfg(feature = "esp32")]
const WIFI_MODE: Option<&str> = option_env!("WIFI_MODE");

/// Pre-shared key - set via WIFI_PSK.
#[cfg(feature = "esp32")]
const WIFI_PSK: Option<&str> = option_env!("WIFI_PSK");

/// Report host name - set via REPORT_HOST.
#[cfg(feature = "esp32")]
const REPORT_HOST: Option<&str> = option_env!("REPORT_HOST");

/// Report port - set via REPORT_PORT.
#[cfg(feature = "esp32")]
const REPORT_PORT: Option<&str> = option_env!("REPORT_PORT");

/// Print error message and halt. On ESP32, we pause briefly then return
/// so the process terminates cleanly (espflash monitor will show the output).
#[cfg(feature = "esp32")]
fn halt_with_error(msg: &str) -> ! {
    eprintln!("\n{}", msg);
    eprintln!("\n=== Configuration failed ===\n");
    std::thread::sleep(std::time::Duration::from_secs(2));
    std::process::exit(1);
}

#[cfg(feature = "esp32")]
fn main() {
    use rover_uplink::credentials::{
        mode_key, psk_key, ssid_key, CredentialSlot, CredentialStore, NvsStore, SecurityMode,
        MAX_VALUE_LEN,
    };
    use rover_uplink::report::{REPORT_HOST_KEY, REPORT_PORT_KEY};
    use rover_uplink::xbee::MAX_CREDENTIAL_SLOTS;

    esp_idf_svc::sys::link_patches();
    esp_idf_svc::log::EspLogger::initialize_default();

    println!("\n=== Uplink Configuration Utility ===\n");

    let slot = match WIFI_SLOT.unwrap_or("0").parse::<u8>() {
        Ok(slot) if slot < MAX_CREDENTIAL_SLOTS => slot,
        _ => halt_with_error("Error: WIFI_SLOT must be between 0 and 9"),
    };

    let ssid = match WIFI_SSID {
        Some(s) if !s.is_empty() => s,
        _ => halt_with_error(
            "Error: WIFI_SSID environment variable not set at compile time.\n\n\
             Usage:\n  \
             WIFI_SLOT=0 WIFI_SSID=\"MyNetwork\" WIFI_MODE=wpa2 WIFI_PSK=\"secret\" \
             cargo run --bin configure-uplink --features esp32",
        ),
    };

    if let Some(mode) = WIFI_MODE {
        if let Err(e) = mode.parse::<SecurityMode>() {
            halt_with_error(&format!("Error: {}", e));
        }
    }

    if let Some(host) = REPORT_HOST {
        if host.len() > MAX_VALUE_LEN {
            halt_with_error(&format!(
                "Error: REPORT_HOST longer than {} characters",
                MAX_VALUE_LEN
            ));
        }
    }

    let psk = WIFI_PSK.unwrap_or("");
    println!("Slot: {}", slot);
    println!("SSID: {}", ssid);
    println!("Mode: {}", WIFI_MODE.unwrap_or("(none)"));
    println!(
        "Key: {} ({} chars)",
        if psk.is_empty() { "(none)" } else { "****" },
        psk.len()
    );

    let mut store = match NvsStore::open() {
        Ok(store) => store,
        Err(e) => halt_with_error(&format!("Error: Failed to open NVS: {:?}", e)),
    };

    let mut writes = vec![(ssid_key(slot), ssid.to_string())];
    let mut removals = Vec::new();
    match WIFI_MODE {
        Some(mode) => writes.push((mode_key(slot), mode.to_string())),
        None => removals.push(mode_key(slot)),
    }
    if psk.is_empty() {
        removals.push(psk_key(slot));
    } else {
        writes.push((psk_key(slot), psk.to_string()));
    }
    if let Some(host) = REPORT_HOST {
        writes.push((REPORT_HOST_KEY.to_string(), host.to_string()));
    }
    if let Some(port) = REPORT_PORT {
        writes.push((REPORT_PORT_KEY.to_string(), port.to_string()));
    }

    for key in &removals {
        if let Err(e) = store.remove(key) {
            halt_with_error(&format!("Error: Failed to clear {}: {:?}", key, e));
        }
    }
    for (key, value) in &writes {
        if let Err(e) = store.set(key, value) {
            halt_with_error(&format!("Error: Failed to write {}: {:?}", key, e));
        }
    }

    // Verify by reading everything back
    for (key, value) in &writes {
        if store.get(key).as_deref() != Some(value.as_str()) {
            halt_with_error(&format!("Error: {} did not read back correctly", key));
        }
    }
    for key in &removals {
        if store.get(key).is_some() {
            halt_with_error(&format!("Error: {} is still set", key));
        }
    }
    match CredentialSlot::resolve(&store, slot) {
        Some(resolved) if resolved.ssid == ssid => {
            println!("\n=== Configuration saved ===\n");
        }
        _ => halt_with_error("Error: Slot did not read back correctly"),
    }
}

#[cfg(not(feature = "esp32"))]
fn main() {
    println!("This binary requires the 'esp32' feature.");
    println!("On the host, edit ~/.rover-uplink/uplink.cfg instead:");
    println!();
    println!("  wifi.ssid.0=MyNetwork");
    println!("  wifi.mode.0=2");
    println!("  wifi.psk.0=secret");
    println!("  report.host=reports.example.net");
}
