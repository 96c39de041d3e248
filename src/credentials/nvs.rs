//! NVS-backed credential store.
//!
//! Slot keys are stored as NVS strings in the `uplink` namespace. NVS limits
//! key names to 15 bytes, which the `wifi.<field>.<n>` keys fit.

use super::{CredentialStore, MAX_VALUE_LEN};
use esp_idf_svc::nvs::{EspNvs, EspNvsPartition, NvsDefault};
use esp_idf_sys::EspError;

/// NVS namespace for uplink configuration.
const NVS_NAMESPACE: &str = "uplink";

/// Credential store reading from ESP32 Non-Volatile Storage.
pub struct NvsStore {
    nvs: EspNvs<NvsDefault>,
}

impl NvsStore {
    /// Open the uplink namespace on the default partition.
    pub fn open() -> Result<Self, EspError> {
        let partition = EspNvsPartition::<NvsDefault>::take()?;
        let nvs = EspNvs::new(partition, NVS_NAMESPACE, true)?;
        Ok(Self { nvs })
    }

    /// Store `value` under `key`.
    ///
    /// Values longer than [`MAX_VALUE_LEN`] could not be read back and are
    /// rejected.
    pub fn set(&mut self, key: &str, value: &str) -> Result<(), EspError> {
        if value.len() > MAX_VALUE_LEN {
            return Err(EspError::from_infallible::<{ esp_idf_sys::ESP_ERR_NVS_VALUE_TOO_LONG }>());
        }
        self.nvs.set_str(key, value)
    }

    /// Remove `key`.
    pub fn remove(&mut self, key: &str) -> Result<(), EspError> {
        self.nvs.remove(key)?;
        Ok(())
    }
}

impl CredentialStore for NvsStore {
    fn get(&self, key: &str) -> Option<String> {
        let mut buf = [0u8; MAX_VALUE_LEN + 1];
        match self.nvs.get_str(key, &mut buf) {
            Ok(value) => value.map(str::to_string),
            Err(e) => {
                log::warn!("Failed to read {} from NVS: {:?}", key, e);
                None
            }
        }
    }
}
