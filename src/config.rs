use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};

use crate::ota::RetryPolicy;

#[cfg(target_os = "espidf")]
const CONFIG_NAMESPACE: &str = "cellota";
#[cfg(target_os = "espidf")]
const CONFIG_KEY: &str = "config";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UpdateConfig {
    // Update endpoints
    pub version_url: String,
    pub firmware_url: String,

    // Cellular link
    pub apn: String,
    pub ntp_server: String,
    /// Timezone in quarter hours, as the modem expects it.
    pub ntp_timezone_quarters: i8,
    pub network_timeout_secs: u32,

    pub log_level: String,

    // Update behaviour
    pub restart_delay_ms: u32,
    pub retry: RetryPolicy,
}

impl Default for UpdateConfig {
    fn default() -> Self {
        // Endpoints come from ota_config.h via build.rs, which should NOT be committed to git
        Self {
            version_url: env!("OTA_VERSION_URL").to_string(),
            firmware_url: env!("OTA_FIRMWARE_URL").to_string(),
            apn: env!("MODEM_APN").to_string(),
            ntp_server: "pool.ntp.org".to_string(),
            ntp_timezone_quarters: 20,
            network_timeout_secs: 600,
            log_level: "info".to_string(),
            restart_delay_ms: 3000,
            retry: RetryPolicy::default(),
        }
    }
}

impl UpdateConfig {
    pub fn from_json(data: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(data)?)
    }

    pub fn to_json(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn validate(&self) -> Result<()> {
        for (name, url) in [("version_url", &self.version_url), ("firmware_url", &self.firmware_url)] {
            if url.is_empty() {
                bail!("{} is not configured", name);
            }
            if !(url.starts_with("https://") || url.starts_with("http://")) {
                bail!("{} must be an http(s) URL: {}", name, url);
            }
        }
        if self.retry.stall_limit == 0 {
            bail!("stall_limit must be at least 1");
        }
        Ok(())
    }

    /// Takes the endpoints and APN from `defaults` where unset. True if
    /// anything changed.
    pub fn fill_missing_endpoints(&mut self, defaults: &UpdateConfig) -> bool {
        let mut changed = false;
        for (field, fallback) in [
            (&mut self.version_url, &defaults.version_url),
            (&mut self.firmware_url, &defaults.firmware_url),
            (&mut self.apn, &defaults.apn),
        ] {
            if field.is_empty() && !fallback.is_empty() {
                *field = fallback.clone();
                changed = true;
            }
        }
        changed
    }

    #[cfg(target_os = "espidf")]
    pub fn save(&self) -> Result<()> {
        save_to_nvs(self)?;
        log::info!("Configuration saved to NVS");
        Ok(())
    }
}

/// NVS copy if present, compiled defaults otherwise. Written back whenever
/// it had to be patched.
#[cfg(target_os = "espidf")]
pub fn load_or_default() -> Result<UpdateConfig> {
    let (mut config, mut dirty) = match load_from_nvs() {
        Ok(config) => {
            log::info!("Loaded configuration from NVS");
            (config, false)
        }
        Err(e) => {
            log::warn!("Failed to load config from NVS: {:?}, using defaults", e);
            (UpdateConfig::default(), true)
        }
    };

    if config.fill_missing_endpoints(&UpdateConfig::default()) {
        log::warn!("NVS endpoints empty, using compiled defaults");
        dirty = true;
    }
    if dirty {
        if let Err(e) = config.save() {
            log::warn!("Failed to save config to NVS: {:?}", e);
        }
    }

    Ok(config)
}

#[cfg(target_os = "espidf")]
fn open_nvs() -> Result<esp_idf_svc::nvs::EspNvs<esp_idf_svc::nvs::NvsDefault>> {
    use esp_idf_svc::nvs::{EspDefaultNvsPartition, EspNvs};

    Ok(EspNvs::new(EspDefaultNvsPartition::take()?, CONFIG_NAMESPACE, true)?)
}

#[cfg(target_os = "espidf")]
fn load_from_nvs() -> Result<UpdateConfig> {
    let nvs = open_nvs()?;
    let mut buf = vec![0u8; 1024];
    let data = nvs
        .get_blob(CONFIG_KEY, &mut buf)?
        .ok_or_else(|| anyhow::anyhow!("Config not found in NVS"))?;

    UpdateConfig::from_json(data)
}

#[cfg(target_os = "espidf")]
fn save_to_nvs(config: &UpdateConfig) -> Result<()> {
    open_nvs()?.set_blob(CONFIG_KEY, &config.to_json()?)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn configured() -> UpdateConfig {
        UpdateConfig {
            version_url: "https://bucket.example.com/version.txt".to_string(),
            firmware_url: "https://bucket.example.com/firmware.bin".to_string(),
            ..UpdateConfig::default()
        }
    }

    #[test]
    fn defaults_match_field_behaviour() {
        let config = UpdateConfig::default();
        assert_eq!(config.restart_delay_ms, 3000);
        assert_eq!(config.retry.request_retry_count, 1);
        assert_eq!(config.retry.stall_limit, 10);
        assert_eq!(config.retry.stall_backoff_ms, 100);
        assert_eq!(config.retry.inter_request_cooldown_ms, 5000);
        assert_eq!(config.ntp_server, "pool.ntp.org");
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let json = br#"{"firmware_url":"https://x/fw.bin","retry":{"stall_limit":3}}"#;
        let config = UpdateConfig::from_json(json).unwrap();
        assert_eq!(config.firmware_url, "https://x/fw.bin");
        assert_eq!(config.retry.stall_limit, 3);
        assert_eq!(config.retry.stall_backoff_ms, 100);
        assert_eq!(config.log_level, "info");
    }

    #[test]
    fn json_round_trip() {
        let config = configured();
        let back = UpdateConfig::from_json(&config.to_json().unwrap()).unwrap();
        assert_eq!(config, back);
    }

    #[test]
    fn validate_rejects_bad_endpoints() {
        assert!(configured().validate().is_ok());

        let mut config = configured();
        config.version_url.clear();
        assert!(config.validate().is_err());

        let mut config = configured();
        config.firmware_url = "ftp://bucket/fw.bin".to_string();
        assert!(config.validate().is_err());

        let mut config = configured();
        config.retry.stall_limit = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn missing_endpoints_come_from_defaults() {
        let defaults = UpdateConfig { apn: "internet".to_string(), ..configured() };
        let mut stored = UpdateConfig {
            version_url: String::new(),
            apn: String::new(),
            ..configured()
        };
        stored.firmware_url = "https://other/fw.bin".to_string();

        assert!(stored.fill_missing_endpoints(&defaults));
        assert_eq!(stored.version_url, defaults.version_url);
        assert_eq!(stored.firmware_url, "https://other/fw.bin");
        assert_eq!(stored.apn, "internet");
        assert!(!stored.fill_missing_endpoints(&defaults));
    }
}
