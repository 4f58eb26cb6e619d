use esp_idf_hal::delay::FreeRtos;

use crate::ota::DeviceRestart;

/// Software restart into the boot partition
pub struct EspRestart;

impl DeviceRestart for EspRestart {
    fn restart(&mut self) {
        log::info!("Restarting...");
        log::logger().flush();

        // Let UART drain the last lines
        FreeRtos::delay_ms(100);

        unsafe {
            esp_idf_sys::esp_restart();
        }
    }
}

/// Get the last reset reason as a string
pub fn reset_reason() -> &'static str {
    let reason = unsafe { esp_idf_sys::esp_reset_reason() };

    match reason {
        esp_idf_sys::esp_reset_reason_t_ESP_RST_POWERON => "Power-on",
        esp_idf_sys::esp_reset_reason_t_ESP_RST_EXT => "External pin",
        esp_idf_sys::esp_reset_reason_t_ESP_RST_SW => "Software reset",
        esp_idf_sys::esp_reset_reason_t_ESP_RST_PANIC => "Panic",
        esp_idf_sys::esp_reset_reason_t_ESP_RST_INT_WDT => "Interrupt watchdog",
        esp_idf_sys::esp_reset_reason_t_ESP_RST_TASK_WDT => "Task watchdog",
        esp_idf_sys::esp_reset_reason_t_ESP_RST_WDT => "Other watchdog",
        esp_idf_sys::esp_reset_reason_t_ESP_RST_DEEPSLEEP => "Deep sleep",
        esp_idf_sys::esp_reset_reason_t_ESP_RST_BROWNOUT => "Brownout",
        _ => "Unknown",
    }
}

/// Label of the partition the current image booted from
pub fn running_partition() -> String {
    let partition = unsafe { esp_idf_sys::esp_ota_get_running_partition() };
    if partition.is_null() {
        return "unknown".to_string();
    }
    let label = unsafe { core::ffi::CStr::from_ptr((*partition).label.as_ptr()) };
    label.to_string_lossy().into_owned()
}
