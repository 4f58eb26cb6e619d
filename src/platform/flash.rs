// OTA partition writer - streams the image into the next update slot using the ESP-IDF OTA API

use core::ffi::c_void;
use esp_idf_sys::{
    esp_ota_abort, esp_ota_begin, esp_ota_end, esp_ota_get_next_update_partition,
    esp_err_t, esp_ota_handle_t, esp_ota_set_boot_partition, esp_ota_write, esp_partition_t,
    ESP_ERR_OTA_VALIDATE_FAILED, ESP_OK,
};

use crate::ota::FlashWriter;

pub struct OtaPartitionWriter {
    update_partition: *const esp_partition_t,
    ota_handle: Option<esp_ota_handle_t>,
    bytes_written: usize,
}

impl OtaPartitionWriter {
    pub fn new() -> anyhow::Result<Self> {
        // Get the next OTA partition
        let update_partition = unsafe { esp_ota_get_next_update_partition(core::ptr::null()) };

        if update_partition.is_null() {
            anyhow::bail!("no OTA update partition in the partition table");
        }

        Ok(Self {
            update_partition,
            ota_handle: None,
            bytes_written: 0,
        })
    }

    pub fn partition_size(&self) -> usize {
        unsafe { (*self.update_partition).size as usize }
    }
}

impl FlashWriter for OtaPartitionWriter {
    fn begin(&mut self, capacity: usize) -> bool {
        if capacity > self.partition_size() {
            log::error!(
                "Image of {} bytes exceeds OTA partition ({} bytes)",
                capacity,
                self.partition_size()
            );
            return false;
        }

        let mut handle: esp_ota_handle_t = 0;
        let result = unsafe { esp_ota_begin(self.update_partition, capacity as _, &mut handle) };

        if result != ESP_OK as esp_err_t {
            log::error!("esp_ota_begin failed: {}", result);
            return false;
        }

        self.ota_handle = Some(handle);
        self.bytes_written = 0;
        true
    }

    fn write(&mut self, chunk: &[u8]) -> bool {
        let Some(handle) = self.ota_handle else {
            return false;
        };

        let result =
            unsafe { esp_ota_write(handle, chunk.as_ptr() as *const c_void, chunk.len() as _) };

        if result != ESP_OK as esp_err_t {
            log::error!("esp_ota_write failed at {}: {}", self.bytes_written, result);
            return false;
        }

        self.bytes_written += chunk.len();
        true
    }

    fn finalize(&mut self) -> bool {
        let Some(handle) = self.ota_handle.take() else {
            return false;
        };

        // esp_ota_end validates the image header, size and checksum
        let result = unsafe { esp_ota_end(handle) };
        if result == ESP_ERR_OTA_VALIDATE_FAILED as esp_err_t {
            log::error!("Image validation failed");
            return false;
        } else if result != ESP_OK as esp_err_t {
            log::error!("esp_ota_end failed: {}", result);
            return false;
        }

        let result = unsafe { esp_ota_set_boot_partition(self.update_partition) };
        if result != ESP_OK as esp_err_t {
            log::error!("esp_ota_set_boot_partition failed: {}", result);
            return false;
        }

        true
    }

    fn abort(&mut self) {
        if let Some(handle) = self.ota_handle.take() {
            unsafe {
                esp_ota_abort(handle);
            }
        }
        self.bytes_written = 0;
    }
}

impl Drop for OtaPartitionWriter {
    fn drop(&mut self) {
        // Clean up any ongoing OTA operation
        self.abort();
    }
}
