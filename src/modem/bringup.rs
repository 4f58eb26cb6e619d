// Cellular link bring-up: modem probe, network registration, APN attach, time sync

use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};
use embedded_hal::delay::DelayNs;

use super::at::{parse_registered, AtClient, SerialPort};

const COMMAND_TIMEOUT: Duration = Duration::from_secs(5);
const ATTACH_TIMEOUT: Duration = Duration::from_secs(30);
const NTP_TIMEOUT: Duration = Duration::from_secs(20);
const PROBE_ATTEMPTS: u32 = 10;
const REGISTRATION_POLL_MS: u32 = 1000;

/// Probe until the modem answers, then switch echo off and check the SIM.
pub fn init<P: SerialPort, D: DelayNs>(at: &mut AtClient<P>, delay: &mut D) -> Result<()> {
    let mut alive = false;
    for attempt in 1..=PROBE_ATTEMPTS {
        if at.command("", Duration::from_secs(1))?.is_ok() {
            alive = true;
            break;
        }
        log::debug!("Modem probe {}/{} unanswered", attempt, PROBE_ATTEMPTS);
        delay.delay_ms(500);
    }
    if !alive {
        bail!("modem did not answer AT after {} attempts", PROBE_ATTEMPTS);
    }

    if !at.command("E0", COMMAND_TIMEOUT)?.is_ok() {
        log::warn!("Could not disable command echo");
    }

    let sim = at.command("+CPIN?", COMMAND_TIMEOUT)?;
    match sim.find("+CPIN:") {
        Some("READY") => Ok(()),
        Some(state) => bail!("SIM not ready: {}", state),
        None => bail!("SIM status unavailable: {:?}", sim.status),
    }
}

/// Poll LTE then GSM registration until home or roaming, or the timeout.
pub fn wait_for_network<P: SerialPort, D: DelayNs>(
    at: &mut AtClient<P>,
    delay: &mut D,
    timeout: Duration,
) -> Result<()> {
    let deadline = Instant::now() + timeout;

    loop {
        for (cmd, prefix) in [("+CEREG?", "+CEREG:"), ("+CREG?", "+CREG:")] {
            let reply = at.command(cmd, COMMAND_TIMEOUT)?;
            if reply.find(prefix).is_some_and(parse_registered) {
                return Ok(());
            }
        }
        if Instant::now() >= deadline {
            bail!("no network registration within {}s", timeout.as_secs());
        }
        delay.delay_ms(REGISTRATION_POLL_MS);
    }
}

/// Define PDP context 1 with `apn` and activate it.
pub fn attach<P: SerialPort>(at: &mut AtClient<P>, apn: &str) -> Result<()> {
    let define = at.command(&format!("+CGDCONT=1,\"IP\",\"{}\"", apn), COMMAND_TIMEOUT)?;
    if !define.is_ok() {
        bail!("APN {} rejected: {:?}", apn, define.status);
    }

    let activate = at
        .command("+CGACT=1,1", ATTACH_TIMEOUT)
        .context("activating PDP context")?;
    if !activate.is_ok() {
        bail!("PDP context activation failed: {:?}", activate.status);
    }
    Ok(())
}

/// Sync the modem clock; TLS certificate dates depend on it.
pub fn sync_time<P: SerialPort>(at: &mut AtClient<P>, server: &str, tz_quarters: i8) -> Result<()> {
    let set = at.command(&format!("+CNTP=\"{}\",{}", server, tz_quarters), COMMAND_TIMEOUT)?;
    if !set.is_ok() {
        bail!("NTP server rejected: {:?}", set.status);
    }

    at.send("+CNTP")?;
    match at.wait_for("+CNTP:", NTP_TIMEOUT)? {
        Some(code) if code == "0" => Ok(()),
        Some(code) => bail!("NTP sync failed with code {}", code),
        None => bail!("NTP sync timed out"),
    }
}
