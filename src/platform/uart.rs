use std::time::Duration;

use anyhow::Result;
use esp_idf_hal::delay::TickType;
use esp_idf_hal::gpio::{AnyIOPin, InputPin, OutputPin};
use esp_idf_hal::peripheral::Peripheral;
use esp_idf_hal::uart::{config::Config, Uart, UartDriver};
use esp_idf_hal::units::Hertz;

use crate::modem::SerialPort;

pub const MODEM_BAUD: u32 = 115_200;

/// Modem UART wrapped as the AT layer's serial port
pub struct UartPort<'d> {
    uart: UartDriver<'d>,
}

impl<'d> UartPort<'d> {
    pub fn open<U: Uart>(
        uart: impl Peripheral<P = U> + 'd,
        tx: impl Peripheral<P = impl OutputPin> + 'd,
        rx: impl Peripheral<P = impl InputPin> + 'd,
    ) -> Result<Self> {
        let config = Config::new().baudrate(Hertz(MODEM_BAUD));
        let uart = UartDriver::new(
            uart,
            tx,
            rx,
            Option::<AnyIOPin>::None,
            Option::<AnyIOPin>::None,
            &config,
        )?;
        Ok(Self { uart })
    }
}

impl SerialPort for UartPort<'_> {
    fn write_all(&mut self, mut bytes: &[u8]) -> Result<()> {
        while !bytes.is_empty() {
            let n = self.uart.write(bytes)?;
            bytes = &bytes[n..];
        }
        Ok(())
    }

    fn read_timeout(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize> {
        let ticks = TickType::new_millis(timeout.as_millis() as u64).ticks();
        Ok(self.uart.read(buf, ticks)?)
    }
}
