// Boot sequence: bring up the cellular link, run one OTA check, then carry on

#[cfg(target_os = "espidf")]
use anyhow::{Context, Result};
#[cfg(target_os = "espidf")]
use esp_idf_hal::{delay::FreeRtos, gpio::OutputPin, peripherals::Peripherals};
#[cfg(target_os = "espidf")]
use log::info;

#[cfg(target_os = "espidf")]
use cellular_ota::{
    config::{self, UpdateConfig},
    logging,
    modem::{bringup, AtClient, ModemTimeouts, ModemTransport},
    ota::{UpdateOrchestrator, UpdateSession},
    platform::{self, EspRestart, ModemPower, OtaPartitionWriter, UartPort},
    version,
};

// Generate ESP-IDF app descriptor (carries the version into the image header)
#[cfg(target_os = "espidf")]
#[allow(unexpected_cfgs)]
mod app_desc {
    esp_idf_sys::esp_app_desc!();
}

#[cfg(target_os = "espidf")]
fn main() {
    // Initialize ESP-IDF
    esp_idf_svc::sys::link_patches();

    if let Err(e) = logging::init_logger() {
        println!("Logger init failed: {}", e);
    }

    info!("{}", version::version_info());
    info!("Boot reason: {}", platform::system::reset_reason());
    info!("Running from partition: {}", platform::system::running_partition());

    let config = match config::load_or_default() {
        Ok(config) => config,
        Err(e) => {
            log::warn!("Config load failed: {:?}, using defaults", e);
            UpdateConfig::default()
        }
    };
    if !logging::set_max_level_from_str(&config.log_level) {
        log::warn!("Unknown log level '{}'", config.log_level);
    }

    // Update failures never stop the boot
    match check_for_update(&config) {
        Ok(UpdateSession::Success) => {}
        Ok(outcome) => info!("OTA session finished: {:?}", outcome),
        Err(e) => log::error!("OTA skipped: {:?}", e),
    }

    run_application()
}

/// Everything before the orchestrator: config check, modem power, link bring-up.
#[cfg(target_os = "espidf")]
fn check_for_update(config: &UpdateConfig) -> Result<UpdateSession> {
    config.validate().context("invalid update configuration")?;

    let peripherals = Peripherals::take()?;
    let pins = peripherals.pins;

    let _modem_power = ModemPower::power_on(
        pins.gpio12.downgrade_output(),
        pins.gpio5.downgrade_output(),
        pins.gpio4.downgrade_output(),
        pins.gpio2.downgrade_output(),
    )?;

    let port = UartPort::open(peripherals.uart1, pins.gpio26, pins.gpio27)?;
    let mut at = AtClient::new(port);
    let mut delay = FreeRtos;

    info!("Initializing modem...");
    bringup::init(&mut at, &mut delay).context("modem init")?;

    info!("Waiting for network...");
    let network_timeout = std::time::Duration::from_secs(config.network_timeout_secs.into());
    bringup::wait_for_network(&mut at, &mut delay, network_timeout)?;

    info!("Connecting to APN: {}", config.apn);
    bringup::attach(&mut at, &config.apn)?;

    // TLS needs a valid clock; a failed sync is logged, the handshake may still work
    info!("Syncing time...");
    if let Err(e) = bringup::sync_time(&mut at, &config.ntp_server, config.ntp_timezone_quarters) {
        log::warn!("Time sync failed: {:?}", e);
    }

    let transport = ModemTransport::new(at, ModemTimeouts::default());
    let flash = OtaPartitionWriter::new()?;

    let mut orchestrator = UpdateOrchestrator::new(
        config,
        version::FIRMWARE_VERSION,
        transport,
        flash,
        FreeRtos,
        EspRestart,
    );
    Ok(orchestrator.run())
}

#[cfg(target_os = "espidf")]
fn run_application() -> ! {
    info!("Running firmware {}", version::FIRMWARE_VERSION);
    loop {
        FreeRtos::delay_ms(60_000);
        log::debug!("alive");
    }
}

#[cfg(not(target_os = "espidf"))]
fn main() {
    eprintln!(
        "{} is ESP32 firmware; build it for the espidf target. Host builds only run the test suite.",
        env!("CARGO_PKG_NAME")
    );
}
