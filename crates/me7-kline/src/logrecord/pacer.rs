//! Sample-rate pacing and the polling loop

use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, info};

use super::RawRecord;
use crate::error::SessionError;

/// Keeps polling cycles at a target interval
///
/// Each cycle sleeps for whatever is left of the interval after the work is
/// done. Overruns are not compensated: a slow cycle is followed immediately
/// by the next one, and the lost time is never caught up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SamplePacer {
    interval: Duration,
}

impl SamplePacer {
    pub fn new(interval: Duration) -> Self {
        Self { interval }
    }

    /// Pacer for `rate` samples per second; `None` unless the rate is positive
    pub fn from_rate(rate: f64) -> Option<Self> {
        if !rate.is_finite() || rate <= 0.0 {
            return None;
        }
        Some(Self::new(Duration::from_secs_f64(1.0 / rate)))
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Time left in the cycle after `elapsed` of work (never negative)
    pub fn remaining(&self, elapsed: Duration) -> Duration {
        self.interval.saturating_sub(elapsed)
    }

    /// Sleep out the remainder of a cycle that began at `cycle_start`
    pub fn pace(&self, cycle_start: Instant) {
        let remaining = self.remaining(cycle_start.elapsed());
        if !remaining.is_zero() {
            thread::sleep(remaining);
        }
    }
}

/// Anything that can hand out log records one at a time
pub trait RecordSource {
    fn poll_record(&mut self) -> Result<RawRecord, SessionError>;
}

/// Poll `source` at the pacer's interval until `cancel` is set
///
/// Every record is passed to `on_record` with the time since the loop
/// started. The cancel flag is checked once per cycle, so the loop finishes
/// the cycle in flight before returning the number of records handled.
pub fn run_polling_loop<S, E, F>(
    source: &mut S,
    pacer: &SamplePacer,
    cancel: &AtomicBool,
    mut on_record: F,
) -> Result<u64, E>
where
    S: RecordSource + ?Sized,
    E: From<SessionError>,
    F: FnMut(Duration, &RawRecord) -> Result<(), E>,
{
    let started = Instant::now();
    let mut records = 0u64;
    info!(interval_ms = pacer.interval().as_millis() as u64, "Polling started");

    while !cancel.load(Ordering::SeqCst) {
        let cycle_start = Instant::now();
        let record = source.poll_record()?;
        on_record(started.elapsed(), &record)?;
        records += 1;
        pacer.pace(cycle_start);
    }

    debug!(records, "Polling cancelled");
    Ok(records)
}
