// Update orchestrator - sequences version check, download, commit and restart

use embedded_hal::delay::DelayNs;

use super::download::{hex, DownloadEngine, DownloadProgress};
use super::error::OtaError;
use super::flash::{DeviceRestart, FlashWriter};
use super::transport::{sni_profile, SecuritySetting, TransportClient};
use super::version_gate::{VersionDecision, VersionGate};
use crate::config::UpdateConfig;

/// SSL contexts the modem may pick for HTTPS sessions.
const SSL_CONTEXTS: [u8; 2] = [0, 1];

/// Per-boot update state. `UpToDate`, `Success` and `Failed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateSession {
    Idle,
    CheckingVersion,
    UpToDate,
    Downloading,
    Committing,
    Success,
    Failed(OtaError),
}

impl UpdateSession {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            UpdateSession::UpToDate | UpdateSession::Success | UpdateSession::Failed(_)
        )
    }
}

/// Runs one best-effort update per boot. Failures are reported and swallowed;
/// the device only restarts after a committed image.
pub struct UpdateOrchestrator<'c, T, F, D, R> {
    config: &'c UpdateConfig,
    local_version: &'c str,
    security: Vec<SecuritySetting>,
    transport: T,
    flash: F,
    delay: D,
    restart: R,
    state: UpdateSession,
    session_open: bool,
    last_progress: Option<DownloadProgress>,
}

impl<'c, T, F, D, R> UpdateOrchestrator<'c, T, F, D, R>
where
    T: TransportClient,
    F: FlashWriter,
    D: DelayNs,
    R: DeviceRestart,
{
    pub fn new(
        config: &'c UpdateConfig,
        local_version: &'c str,
        transport: T,
        flash: F,
        delay: D,
        restart: R,
    ) -> Self {
        Self {
            config,
            local_version,
            security: sni_profile(&SSL_CONTEXTS),
            transport,
            flash,
            delay,
            restart,
            state: UpdateSession::Idle,
            session_open: false,
            last_progress: None,
        }
    }

    pub fn state(&self) -> UpdateSession {
        self.state
    }

    /// Progress of the last completed transfer, if any.
    pub fn last_progress(&self) -> Option<DownloadProgress> {
        self.last_progress
    }

    pub fn into_parts(self) -> (T, F, D, R) {
        (self.transport, self.flash, self.delay, self.restart)
    }

    /// Run to a terminal state. A second call returns that state untouched.
    pub fn run(&mut self) -> UpdateSession {
        if self.state.is_terminal() {
            return self.state;
        }

        log::info!("Applying SSL config to contexts {:?}", SSL_CONTEXTS);
        self.transport.configure_security(&self.security);

        let outcome = self.check_and_update();
        self.close_session();

        match outcome {
            Ok(state) => self.transition(state),
            Err(e) => {
                log::error!("OTA failed: {}", e);
                log::info!("Continuing on firmware {}", self.local_version);
                self.transition(UpdateSession::Failed(e));
            }
        }

        if self.state == UpdateSession::Success {
            log::info!("OTA success! Rebooting in {}ms...", self.config.restart_delay_ms);
            self.delay.delay_ms(self.config.restart_delay_ms);
            self.restart.restart();
        }

        self.state
    }

    fn check_and_update(&mut self) -> Result<UpdateSession, OtaError> {
        self.transition(UpdateSession::CheckingVersion);
        log::info!("Checking version...");
        self.open_session();

        let gate = VersionGate::new(self.local_version, &self.config.version_url);
        let remote = match gate.resolve_update_needed(&mut self.transport)? {
            VersionDecision::UpdateNeeded(remote) => remote,
            VersionDecision::UpToDate => {
                log::info!("System up to date");
                return Ok(UpdateSession::UpToDate);
            }
        };
        log::info!("New firmware {} found! Starting OTA...", remote);

        // The modem may still be closing the version connection
        self.close_session();
        let policy = self.config.retry;
        log::info!("Cooling down modem ({}ms)...", policy.inter_request_cooldown_ms);
        self.delay.delay_ms(policy.inter_request_cooldown_ms);

        self.transition(UpdateSession::Downloading);
        self.open_session();
        if !self.transport.set_target(&self.config.firmware_url) {
            return Err(OtaError::TargetSetupError);
        }

        let done = DownloadEngine::new(&policy).download(
            &mut self.transport,
            &mut self.flash,
            &mut self.delay,
        )?;
        self.last_progress = Some(done.progress);
        log::info!("Image sha256: {}", hex(&done.sha256));

        self.close_session();
        self.transition(UpdateSession::Committing);

        let progress = done.progress;
        let mismatch = OtaError::SizeMismatch {
            bytes_written: progress.bytes_written,
            expected_size: progress.expected_size,
        };
        if !progress.is_complete() {
            self.flash.abort();
            return Err(mismatch);
        }
        if !self.flash.finalize() {
            return Err(mismatch);
        }

        Ok(UpdateSession::Success)
    }

    fn open_session(&mut self) {
        if !self.session_open {
            self.transport.begin_session();
            self.session_open = true;
        }
    }

    fn close_session(&mut self) {
        if self.session_open {
            self.transport.end_session();
            self.session_open = false;
        }
    }

    fn transition(&mut self, next: UpdateSession) {
        if self.state.is_terminal() {
            log::warn!("Ignoring transition {:?} -> {:?}", self.state, next);
            return;
        }
        log::debug!("Update session: {:?} -> {:?}", self.state, next);
        self.state = next;
    }
}
