// Modem power sequencing for the LilyGO T-A7670 board

use anyhow::Result;
use esp_idf_hal::delay::FreeRtos;
use esp_idf_hal::gpio::{AnyOutputPin, Output, PinDriver};

/// Reset line is active high on this board
const RESET_ACTIVE_HIGH: bool = true;
const RESET_PULSE_MS: u32 = 2600;
const PWRKEY_PULSE_MS: u32 = 1000;
/// Time for the modem UART to come up after PWRKEY
const SETTLE_MS: u32 = 3000;

/// Holds the modem control pins; dropping it releases them and powers the modem off.
pub struct ModemPower<'d> {
    _power: PinDriver<'d, AnyOutputPin, Output>,
    _reset: PinDriver<'d, AnyOutputPin, Output>,
    _pwrkey: PinDriver<'d, AnyOutputPin, Output>,
    _led: PinDriver<'d, AnyOutputPin, Output>,
}

impl<'d> ModemPower<'d> {
    pub fn power_on(
        power: AnyOutputPin,
        reset: AnyOutputPin,
        pwrkey: AnyOutputPin,
        led: AnyOutputPin,
    ) -> Result<Self> {
        let mut led = PinDriver::output(led)?;
        led.set_low()?;

        let mut power = PinDriver::output(power)?;
        power.set_high()?;

        let mut reset = PinDriver::output(reset)?;
        reset.set_level((!RESET_ACTIVE_HIGH).into())?;
        FreeRtos::delay_ms(100);
        reset.set_level(RESET_ACTIVE_HIGH.into())?;
        FreeRtos::delay_ms(RESET_PULSE_MS);
        reset.set_level((!RESET_ACTIVE_HIGH).into())?;

        let mut pwrkey = PinDriver::output(pwrkey)?;
        pwrkey.set_low()?;
        FreeRtos::delay_ms(100);
        pwrkey.set_high()?;
        FreeRtos::delay_ms(PWRKEY_PULSE_MS);
        pwrkey.set_low()?;

        log::info!("Wait ...");
        FreeRtos::delay_ms(SETTLE_MS);

        Ok(Self {
            _power: power,
            _reset: reset,
            _pwrkey: pwrkey,
            _led: led,
        })
    }
}
