//! Slow-init (5 baud) wake-up of the ECU

use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use super::{LinkAdapter, LinkError};
use crate::config::{Pulse, WakeConfig};

/// Result of scanning the line for a byte pattern
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WaitOutcome {
    pub found: bool,
    /// Every byte seen while scanning, in arrival order
    pub captured: Vec<u8>,
}

/// Scan incoming bytes for `pattern` until it is seen or `timeout` expires
///
/// Matching slides over the stream: a byte that breaks the sequence drops the
/// partial match, and may itself start a new one.
pub fn wait_for<L: LinkAdapter + ?Sized>(
    link: &mut L,
    pattern: &[u8],
    timeout: Duration,
) -> Result<WaitOutcome, LinkError> {
    let deadline = Instant::now() + timeout;
    let mut captured = Vec::new();
    let mut matched = 0usize;

    if pattern.is_empty() {
        return Ok(WaitOutcome {
            found: true,
            captured,
        });
    }

    loop {
        let now = Instant::now();
        if now >= deadline {
            return Ok(WaitOutcome {
                found: false,
                captured,
            });
        }

        let Some(byte) = link.poll_byte(deadline - now)? else {
            continue;
        };
        captured.push(byte);

        if byte == pattern[matched] {
            matched += 1;
        } else {
            matched = usize::from(byte == pattern[0]);
        }

        if matched == pattern.len() {
            return Ok(WaitOutcome {
                found: true,
                captured,
            });
        }
    }
}

/// Drive the K-line through a bit-mode pulse train
pub fn send_pulse_train<L: LinkAdapter + ?Sized>(
    link: &mut L,
    direction_mask: u8,
    pulses: &[Pulse],
) -> Result<(), LinkError> {
    link.set_direction(direction_mask)?;
    for pulse in pulses {
        link.set_output_level(pulse.level)?;
        thread::sleep(pulse.hold);
    }
    Ok(())
}

/// Wake the ECU with a slow init and complete the keybyte handshake
///
/// Fails with [`LinkError::Timeout`] when the sync/keybyte pattern never
/// shows up and with [`LinkError::NoAcknowledge`] when the ECU does not
/// confirm the handshake byte. No retry happens here.
pub fn wake<L: LinkAdapter + ?Sized>(link: &mut L, config: &WakeConfig) -> Result<(), LinkError> {
    if link.is_open() {
        link.close()?;
    }
    thread::sleep(config.idle_before);
    link.open()?;

    info!("Beginning slow init");
    send_pulse_train(link, config.direction_mask, &config.pulses)?;
    debug!("Slow init pulse train sent");

    link.set_line_mode(config.line_mode)?;
    link.set_baud_rate(config.baud)?;
    link.flush_input()?;

    let sync = wait_for(link, &config.sync_pattern, config.sync_timeout)?;
    debug!(captured = %hex::encode(&sync.captured), "Init response");
    if !sync.found {
        warn!("No sync/keybyte pattern from ECU");
        return Err(LinkError::Timeout);
    }

    thread::sleep(config.handshake_delay);
    link.write(&[config.handshake_byte])?;

    // The echo of the handshake byte is skipped by the sliding scan
    let ack = wait_for(link, &config.ack_pattern, config.ack_timeout)?;
    debug!(captured = %hex::encode(&ack.captured), "ECU connection response");
    if !ack.found {
        warn!("ECU did not confirm the handshake");
        return Err(LinkError::NoAcknowledge {
            captured: ack.captured,
        });
    }

    info!(baud = config.baud, "Slow init complete");
    Ok(())
}
