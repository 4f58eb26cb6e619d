use std::fs;
use std::path::Path;

const OTA_CONFIG_PATH: &str = "ota_config.h";

/// `#define` names read from `ota_config.h`, exported as rustc env vars of the same name.
const CONFIG_DEFINES: &[&str] = &["OTA_VERSION_URL", "OTA_FIRMWARE_URL", "MODEM_APN"];

fn main() -> anyhow::Result<()> {
    // Necessary for ESP-IDF, host builds only compile the portable core
    if std::env::var("CARGO_CFG_TARGET_OS").as_deref() == Ok("espidf") {
        embuild::espidf::sysenv::output();

        // Add crash log helper for better panic diagnostics
        println!("cargo:rustc-link-arg=-Wl,--undefined=esp_backtrace_print_app_description");
    }

    println!("cargo:rerun-if-changed={}", OTA_CONFIG_PATH);

    // Read update endpoints if they exist
    let contents = if Path::new(OTA_CONFIG_PATH).exists() {
        fs::read_to_string(OTA_CONFIG_PATH)?
    } else {
        println!("cargo:warning=ota_config.h not found! Copy ota_config.h.example to ota_config.h and add your endpoints.");
        String::new()
    };

    for name in CONFIG_DEFINES {
        let value = contents
            .lines()
            .find(|l| l.contains(&format!("#define {}", name)))
            .and_then(|l| l.split('"').nth(1))
            .unwrap_or("");
        println!("cargo:rustc-env={}={}", name, value);
    }

    Ok(())
}
