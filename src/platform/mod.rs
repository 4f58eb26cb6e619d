// ESP-IDF bindings for the update core: UART to the modem, OTA partition,
// restart and board power pins

pub mod board;
pub mod flash;
pub mod system;
pub mod uart;

pub use board::ModemPower;
pub use flash::OtaPartitionWriter;
pub use system::EspRestart;
pub use uart::UartPort;
