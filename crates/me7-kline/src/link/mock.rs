//! Mock link adapter for testing
//!
//! Behaves like a K-line with an ECU on the other end: every write is echoed
//! back (the line is half-duplex), and scripted replies are queued behind the
//! echo when a matching request goes out. Clones share state, so a test can
//! keep a handle while the controller owns another.

use std::collections::VecDeque;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use parking_lot::Mutex;

use super::{LineMode, LinkAdapter, LinkError};
use crate::kwp::frame;

#[derive(Default)]
struct MockState {
    open: bool,
    echo: bool,
    baud: u32,
    bit_mode: bool,
    wake_armed: bool,
    wake_reply: Vec<u8>,
    rx: VecDeque<u8>,
    written: Vec<u8>,
    requests: Vec<Vec<u8>>,
    /// One-shot replies, consumed in order
    scripted: VecDeque<(Vec<u8>, Vec<u8>)>,
    /// Replies used whenever no one-shot reply matches
    persistent: Vec<(Vec<u8>, Vec<u8>)>,
    levels: Vec<u8>,
    baud_history: Vec<u32>,
    line_modes: Vec<LineMode>,
}

/// Scripted K-line mock
#[derive(Clone)]
pub struct MockLink {
    state: Arc<Mutex<MockState>>,
}

impl Default for MockLink {
    fn default() -> Self {
        Self::new()
    }
}

impl MockLink {
    /// Create a closed mock at 10400 baud that echoes writes
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(MockState {
                echo: true,
                baud: 10400,
                ..Default::default()
            })),
        }
    }

    pub fn with_echo(self, echo: bool) -> Self {
        self.state.lock().echo = echo;
        self
    }

    /// Bytes the ECU sends once a pulse train has been driven
    pub fn on_wake(&self, reply: &[u8]) {
        self.state.lock().wake_reply = reply.to_vec();
    }

    /// Queue a framed one-shot reply for a request payload (prefix match)
    pub fn respond(&self, request: &[u8], response_data: &[u8]) {
        self.respond_raw(request, &frame::frame_bytes(response_data));
    }

    /// Queue a framed negative response `[0x7F, service, code]`
    pub fn respond_negative(&self, request: &[u8], code: u8) {
        let service = request.first().copied().unwrap_or_default();
        self.respond(request, &[frame::NEGATIVE_RESPONSE, service, code]);
    }

    /// Queue raw reply bytes for a request (payload or raw bytes, prefix match)
    pub fn respond_raw(&self, request: &[u8], reply: &[u8]) {
        self.state
            .lock()
            .scripted
            .push_back((request.to_vec(), reply.to_vec()));
    }

    /// Framed reply used every time a request matches and nothing is queued
    pub fn respond_always(&self, request: &[u8], response_data: &[u8]) {
        self.state
            .lock()
            .persistent
            .push((request.to_vec(), frame::frame_bytes(response_data)));
    }

    /// Inject bytes into the receive buffer
    pub fn push_rx(&self, bytes: &[u8]) {
        self.state.lock().rx.extend(bytes.iter().copied());
    }

    /// Every byte written so far
    pub fn written(&self) -> Vec<u8> {
        self.state.lock().written.clone()
    }

    /// Payloads of every well-formed frame written so far
    pub fn requests(&self) -> Vec<Vec<u8>> {
        self.state.lock().requests.clone()
    }

    /// Number of written frames whose payload starts with `prefix`
    pub fn request_count(&self, prefix: &[u8]) -> usize {
        self.state
            .lock()
            .requests
            .iter()
            .filter(|r| r.starts_with(prefix))
            .count()
    }

    /// Output levels driven in bit mode
    pub fn levels(&self) -> Vec<u8> {
        self.state.lock().levels.clone()
    }

    pub fn baud_history(&self) -> Vec<u32> {
        self.state.lock().baud_history.clone()
    }

    pub fn line_modes(&self) -> Vec<LineMode> {
        self.state.lock().line_modes.clone()
    }

    /// Bytes still waiting to be read
    pub fn pending_rx(&self) -> usize {
        self.state.lock().rx.len()
    }
}

impl MockState {
    fn deliver_wake_reply(&mut self) {
        if self.wake_armed {
            self.wake_armed = false;
            let reply = std::mem::take(&mut self.wake_reply);
            self.rx.extend(reply);
        }
    }

    fn find_reply(&mut self, key: &[u8]) -> Option<Vec<u8>> {
        if let Some(pos) = self.scripted.iter().position(|(req, _)| key.starts_with(req)) {
            return self.scripted.remove(pos).map(|(_, reply)| reply);
        }
        self.persistent
            .iter()
            .find(|(req, _)| key.starts_with(req))
            .map(|(_, reply)| reply.clone())
    }
}

impl LinkAdapter for MockLink {
    fn open(&mut self) -> Result<(), LinkError> {
        self.state.lock().open = true;
        Ok(())
    }

    fn close(&mut self) -> Result<(), LinkError> {
        let mut state = self.state.lock();
        state.open = false;
        state.bit_mode = false;
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.state.lock().open
    }

    fn read(&mut self, n: usize) -> Result<Vec<u8>, LinkError> {
        let mut state = self.state.lock();
        if !state.open {
            return Err(LinkError::NotOpen);
        }
        state.deliver_wake_reply();
        if state.rx.len() < n {
            return Err(LinkError::Timeout);
        }
        Ok(state.rx.drain(..n).collect())
    }

    fn poll_byte(&mut self, timeout: Duration) -> Result<Option<u8>, LinkError> {
        let byte = {
            let mut state = self.state.lock();
            if !state.open {
                return Err(LinkError::NotOpen);
            }
            state.deliver_wake_reply();
            state.rx.pop_front()
        };
        if byte.is_none() {
            thread::sleep(timeout.min(Duration::from_millis(1)));
        }
        Ok(byte)
    }

    fn write(&mut self, bytes: &[u8]) -> Result<(), LinkError> {
        let mut state = self.state.lock();
        if !state.open {
            return Err(LinkError::NotOpen);
        }
        state.written.extend_from_slice(bytes);
        if state.echo {
            state.rx.extend(bytes.iter().copied());
        }

        let key = match frame::split_frame(bytes) {
            Some(payload) => {
                state.requests.push(payload.to_vec());
                payload.to_vec()
            }
            None => bytes.to_vec(),
        };
        if let Some(reply) = state.find_reply(&key) {
            state.rx.extend(reply);
        }
        Ok(())
    }

    fn set_baud_rate(&mut self, baud: u32) -> Result<(), LinkError> {
        let mut state = self.state.lock();
        state.baud = baud;
        state.baud_history.push(baud);
        Ok(())
    }

    fn baud_rate(&self) -> u32 {
        self.state.lock().baud
    }

    fn set_line_mode(&mut self, mode: LineMode) -> Result<(), LinkError> {
        let mut state = self.state.lock();
        if state.bit_mode && !state.levels.is_empty() {
            state.wake_armed = true;
        }
        state.bit_mode = false;
        state.line_modes.push(mode);
        Ok(())
    }

    fn flush_input(&mut self) -> Result<(), LinkError> {
        self.state.lock().rx.clear();
        Ok(())
    }

    fn set_direction(&mut self, mask: u8) -> Result<(), LinkError> {
        let mut state = self.state.lock();
        if !state.open {
            return Err(LinkError::NotOpen);
        }
        state.bit_mode = mask != 0;
        Ok(())
    }

    fn set_output_level(&mut self, bits: u8) -> Result<(), LinkError> {
        let mut state = self.state.lock();
        if !state.bit_mode {
            return Err(LinkError::AdapterFailure("not in bit mode".to_string()));
        }
        state.levels.push(bits);
        Ok(())
    }
}
