// OTA (Over-The-Air) update core - hardware independent, runs on the host in tests

pub mod download;
pub mod error;
pub mod flash;
pub mod manager;
pub mod policy;
pub mod transport;
pub mod version_gate;

pub use download::{CompletedDownload, DownloadEngine, DownloadProgress, StreamStep};
pub use error::OtaError;
pub use flash::{DeviceRestart, FlashWriter};
pub use manager::{UpdateOrchestrator, UpdateSession};
pub use policy::RetryPolicy;
pub use transport::{ResponseHead, SecuritySetting, TransportClient, TLS_1_2};
pub use version_gate::{FirmwareVersion, VersionDecision, VersionGate};

// OTA update flow (once per boot):
// 1. Check the version marker, stop if up to date
// 2. End session, cool down, open a new one for the image
// 3. Stream the image into the OTA partition
// 4. End session, finalize (partition's own validation), set boot partition
// 5. Restart
