//! Session controller owning the link and the connection state machine

use std::sync::atomic::AtomicBool;
use std::thread;

use tracing::{debug, info, warn};

use super::identity::{identification_bytes, identification_text, EcuIdentity};
use super::SessionState;
use crate::config::{SessionOptions, WakeConfig};
use crate::error::SessionError;
use crate::kwp::{
    baud_code, identification_option, service_id, session_type, KwpTransport,
    NegativeResponseCode, ProtocolError, ResponseRecord,
};
use crate::link::{self, LinkAdapter};
use crate::logrecord::{LogRecordEngine, MemoryLocation, RawRecord, RecordLayout, RecordSource};
use crate::security::{self, SecurityLevel};

/// Drives an ECU from wake-up to logging
///
/// The controller has exclusive ownership of the link. Any fatal error
/// closes the link and leaves the controller in
/// [`SessionState::Terminated`]; busy negatives and caller mistakes do not.
pub struct SessionController<L: LinkAdapter> {
    kwp: KwpTransport<L>,
    options: SessionOptions,
    state: SessionState,
    log: LogRecordEngine,
}

impl<L: LinkAdapter> SessionController<L> {
    pub fn new(link: L, options: SessionOptions) -> Self {
        Self {
            kwp: KwpTransport::new(link, options.transport),
            options,
            state: SessionState::Disconnected,
            log: LogRecordEngine::with_retry_delay(options.busy_retry_delay),
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn link(&self) -> &L {
        self.kwp.link()
    }

    /// Baud rate the link is currently running at
    pub fn baud_rate(&self) -> u32 {
        self.kwp.link().baud_rate()
    }

    /// Layout of the configured log record
    pub fn record_layout(&self) -> Option<&RecordLayout> {
        self.log.layout()
    }

    /// Slow-init the ECU
    ///
    /// On failure the link is left closed and the controller returns to
    /// `Disconnected`, so the caller may try again.
    pub fn wake(&mut self, config: &WakeConfig) -> Result<(), SessionError> {
        self.require("wake", &[SessionState::Disconnected])?;
        self.state = SessionState::Initializing;

        match link::wake(self.kwp.link_mut(), config) {
            Ok(()) => {
                self.state = SessionState::Connected;
                info!("ECU connected");
                Ok(())
            }
            Err(e) => {
                warn!(error = %e, "Wake-up failed");
                let _ = self.kwp.link_mut().close();
                self.state = SessionState::Disconnected;
                Err(e.into())
            }
        }
    }

    /// Run the seed/key exchange for `level`
    pub fn unlock(&mut self, level: SecurityLevel) -> Result<ResponseRecord, SessionError> {
        self.require("unlock security", &[SessionState::Connected])?;
        let result = security::unlock(&mut self.kwp, level).map_err(SessionError::from);
        let response = self.guard(result)?;
        self.state = SessionState::SecurityUnlocked;
        Ok(response)
    }

    /// Start diagnostic session 0x86, switching to `baud` (0 keeps the rate)
    pub fn start_diagnostic_session(&mut self, baud: u32) -> Result<ResponseRecord, SessionError> {
        self.require(
            "start a diagnostic session",
            &[SessionState::SecurityUnlocked, SessionState::DiagSessionActive],
        )?;

        let mut request = vec![service_id::START_DIAGNOSTIC_SESSION, session_type::DEVELOPMENT];
        if baud != 0 {
            request.push(baud_code::for_baud(baud).ok_or(SessionError::UnsupportedBaud(baud))?);
        }

        let result = self.command(&request);
        let response = self.guard(result)?;

        if baud != 0 {
            let result = self.kwp.link_mut().set_baud_rate(baud).map_err(SessionError::from);
            self.guard(result)?;
            thread::sleep(self.options.baud_settle);
        }
        self.state = SessionState::DiagSessionActive;
        info!(baud = self.baud_rate(), "Diagnostic session started");
        Ok(response)
    }

    /// Tester present (0x3E) to hold the session open
    pub fn keepalive(&mut self) -> Result<ResponseRecord, SessionError> {
        self.require(
            "send tester present",
            &[SessionState::DiagSessionActive, SessionState::Logging],
        )?;
        let result = self.command(&[service_id::TESTER_PRESENT]);
        self.guard(result)
    }

    /// ReadEcuIdentification (0x1A)
    pub fn read_ecu_identification(&mut self, option: u8) -> Result<ResponseRecord, SessionError> {
        self.require_active("read ECU identification")?;
        let result = self.command(&[service_id::READ_ECU_IDENTIFICATION, option]);
        self.guard(result)
    }

    /// Read hardware, software and composite identification
    ///
    /// Options the ECU does not support are reported as absent.
    pub fn read_identity(&mut self) -> Result<EcuIdentity, SessionError> {
        let mut identity = EcuIdentity::default();

        if let Some(record) = self.optional_identification(identification_option::HARDWARE_NUMBER)? {
            identity.hardware_number = Some(identification_text(&record));
        }
        if let Some(record) = self.optional_identification(identification_option::SOFTWARE_NUMBER)? {
            identity.software_number = Some(identification_text(&record));
        }
        if let Some(record) = self.optional_identification(identification_option::COMPOSITE)? {
            identity.apply_composite(identification_bytes(&record));
        }

        debug!(?identity, "ECU identity");
        Ok(identity)
    }

    /// ReadMemoryByAddress (0x23); returns the bytes after the response id
    pub fn read_memory_by_address(&mut self, address: u32, size: u8) -> Result<Vec<u8>, SessionError> {
        self.require_active("read memory")?;
        let location = MemoryLocation::new(address, size)?;
        let [size, hi, mid, lo] = location.encode();
        let result = self.command(&[service_id::READ_MEMORY_BY_ADDRESS, hi, mid, lo, size]);
        let response = self.guard(result)?;
        Ok(response.data().get(1..).unwrap_or_default().to_vec())
    }

    /// WriteMemoryByAddress (0x3D)
    pub fn write_memory_by_address(
        &mut self,
        address: u32,
        data: &[u8],
    ) -> Result<ResponseRecord, SessionError> {
        self.require_active("write memory")?;
        let size = u8::try_from(data.len()).map_err(|_| {
            ProtocolError::InvalidRequest(format!("{} bytes is too long for one write", data.len()))
        })?;
        let location = MemoryLocation::new(address, size)?;
        let [size, hi, mid, lo] = location.encode();

        let mut request = vec![service_id::WRITE_MEMORY_BY_ADDRESS, hi, mid, lo, size];
        request.extend_from_slice(data);
        let result = self.command(&request);
        self.guard(result)
    }

    /// AccessTimingParameters (0x83), set values
    pub fn access_timing_parameters(&mut self, params: &[u8]) -> Result<ResponseRecord, SessionError> {
        self.require_active("set timing parameters")?;
        let mut request = vec![service_id::ACCESS_TIMING_PARAMETERS, 0x03];
        request.extend_from_slice(params);
        let result = self.command(&request);
        self.guard(result)
    }

    /// StopCommunication (0x82)
    pub fn stop_communication(&mut self) -> Result<ResponseRecord, SessionError> {
        self.require_active("stop communication")?;
        let result = self.command(&[service_id::STOP_COMMUNICATION]);
        self.guard(result)
    }

    /// Send a bare 0x00 and consume its echo
    ///
    /// ME7 ECUs want this once before the log record is set up.
    pub fn send_pad_byte(&mut self) -> Result<(), SessionError> {
        self.require_active("send pad byte")?;
        let result = self.kwp.send_raw(&[0x00]).map_err(SessionError::from);
        self.guard(result)
    }

    /// Configure the log record and enter `Logging`
    ///
    /// Setting `cancel` while the ECU answers busy returns
    /// [`SessionError::Cancelled`] with the session still active.
    pub fn configure_logging(
        &mut self,
        locations: &[MemoryLocation],
        cancel: &AtomicBool,
    ) -> Result<RecordLayout, SessionError> {
        self.require(
            "configure logging",
            &[SessionState::DiagSessionActive, SessionState::Logging],
        )?;
        let result = self.log.configure(&mut self.kwp, locations, cancel);
        let layout = self.guard(result)?;
        self.state = SessionState::Logging;
        Ok(layout)
    }

    /// Request one log record
    pub fn poll(&mut self) -> Result<RawRecord, SessionError> {
        self.require("poll a log record", &[SessionState::Logging])?;
        let result = self.log.poll(&mut self.kwp);
        self.guard(result)
    }

    /// End the session: best-effort stop communication, then close the link
    pub fn terminate(&mut self) {
        if self.state == SessionState::Terminated {
            return;
        }
        if self.state.is_active() {
            if let Err(e) = self.command(&[service_id::STOP_COMMUNICATION]) {
                debug!(error = %e, "Stop communication not acknowledged");
            }
        }
        self.close_link();
        info!("Session terminated");
    }

    fn command(&mut self, payload: &[u8]) -> Result<ResponseRecord, SessionError> {
        Ok(self.kwp.send_command(payload)?)
    }

    fn optional_identification(&mut self, option: u8) -> Result<Option<ResponseRecord>, SessionError> {
        self.require_active("read ECU identification")?;
        match self.command(&[service_id::READ_ECU_IDENTIFICATION, option]) {
            Ok(record) => Ok(Some(record)),
            Err(SessionError::Protocol(ProtocolError::NegativeResponse {
                nrc:
                    NegativeResponseCode::SubFunctionNotSupported
                    | NegativeResponseCode::RequestOutOfRange,
                ..
            })) => {
                debug!(option = format!("0x{:02X}", option), "Identification option not supported");
                Ok(None)
            }
            Err(e) => self.guard(Err(e)),
        }
    }

    fn require(&self, operation: &'static str, allowed: &[SessionState]) -> Result<(), SessionError> {
        if allowed.contains(&self.state) {
            Ok(())
        } else {
            Err(SessionError::InvalidState {
                operation,
                state: self.state,
            })
        }
    }

    fn require_active(&self, operation: &'static str) -> Result<(), SessionError> {
        if self.state.is_active() {
            Ok(())
        } else {
            Err(SessionError::InvalidState {
                operation,
                state: self.state,
            })
        }
    }

    /// Terminate on fatal errors, pass everything through
    fn guard<T>(&mut self, result: Result<T, SessionError>) -> Result<T, SessionError> {
        if let Err(e) = &result {
            if e.is_fatal() {
                warn!(error = %e, state = %self.state, "Fatal error, terminating session");
                self.close_link();
            }
        }
        result
    }

    fn close_link(&mut self) {
        if let Err(e) = self.kwp.link_mut().close() {
            debug!(error = %e, "Closing link failed");
        }
        self.state = SessionState::Terminated;
    }
}

impl<L: LinkAdapter> RecordSource for SessionController<L> {
    fn poll_record(&mut self) -> Result<RawRecord, SessionError> {
        self.poll()
    }
}

impl<L: LinkAdapter> Drop for SessionController<L> {
    fn drop(&mut self) {
        if self.kwp.link().is_open() {
            let _ = self.kwp.link_mut().close();
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::config::Pulse;
    use crate::error::ConfigError;
    use crate::link::{LinkError, MockLink};
    use crate::security::SecurityError;

    fn fast_wake() -> WakeConfig {
        WakeConfig {
            idle_before: Duration::ZERO,
            pulses: WakeConfig::default()
                .pulses
                .iter()
                .map(|p| Pulse::new(p.level, Duration::ZERO))
                .collect(),
            sync_timeout: Duration::from_millis(50),
            handshake_delay: Duration::ZERO,
            ack_timeout: Duration::from_millis(50),
            ..WakeConfig::default()
        }
    }

    fn options() -> SessionOptions {
        SessionOptions {
            baud_settle: Duration::ZERO,
            busy_retry_delay: Duration::ZERO,
            ..SessionOptions::default()
        }
    }

    fn awake(link: &MockLink) -> SessionController<MockLink> {
        link.on_wake(&[0x55, 0xEF, 0x8F]);
        link.respond_raw(&[0x70], &[0xFE]);
        let mut controller = SessionController::new(link.clone(), options());
        controller.wake(&fast_wake()).unwrap();
        controller
    }

    fn unlocked(link: &MockLink) -> SessionController<MockLink> {
        link.respond(&[0x27, 0x03], &[0x67, 0x03, 0x00, 0x00, 0x00, 0x00]);
        link.respond(&[0x27, 0x04], &[0x67, 0x04, 0x34]);
        let mut controller = awake(link);
        controller.unlock(SecurityLevel::Level3).unwrap();
        controller
    }

    fn in_session(link: &MockLink) -> SessionController<MockLink> {
        link.respond(&[0x10, 0x86], &[0x50, 0x86]);
        let mut controller = unlocked(link);
        controller.start_diagnostic_session(38400).unwrap();
        controller
    }

    #[test]
    fn test_wake_connects() {
        let link = MockLink::new();
        let controller = awake(&link);
        assert_eq!(controller.state(), SessionState::Connected);
        assert!(link.is_open());
    }

    #[test]
    fn test_failed_wake_returns_to_disconnected() {
        let link = MockLink::new();
        let mut controller = SessionController::new(link.clone(), options());

        let err = controller.wake(&fast_wake()).unwrap_err();
        assert_eq!(err, SessionError::Link(LinkError::Timeout));
        assert_eq!(controller.state(), SessionState::Disconnected);
        assert!(!link.is_open());
    }

    #[test]
    fn test_operations_require_state() {
        let link = MockLink::new();
        let mut controller = SessionController::new(link.clone(), options());

        let err = controller.unlock(SecurityLevel::Level3).unwrap_err();
        assert_eq!(
            err,
            SessionError::InvalidState {
                operation: "unlock security",
                state: SessionState::Disconnected
            }
        );
        assert!(controller.poll().is_err());
        assert_eq!(controller.state(), SessionState::Disconnected);
    }

    #[test]
    fn test_security_failure_terminates() {
        let link = MockLink::new();
        link.respond(&[0x27, 0x03], &[0x67, 0x03, 0x00, 0x00, 0x00, 0x00]);
        link.respond_negative(&[0x27, 0x04], 0x35);
        let mut controller = awake(&link);

        let err = controller.unlock(SecurityLevel::Level3).unwrap_err();
        assert!(matches!(err, SessionError::Security(SecurityError::Protocol(_))));
        assert_eq!(controller.state(), SessionState::Terminated);
        assert!(!link.is_open());
    }

    #[test]
    fn test_diagnostic_session_switches_baud() {
        let link = MockLink::new();
        let controller = in_session(&link);

        assert_eq!(controller.state(), SessionState::DiagSessionActive);
        assert_eq!(controller.baud_rate(), 38400);
        assert!(link.requests().contains(&vec![0x10, 0x86, 0x50]));
    }

    #[test]
    fn test_session_without_baud_code() {
        let link = MockLink::new();
        link.respond(&[0x10, 0x86], &[0x50, 0x86]);
        let mut controller = unlocked(&link);

        controller.start_diagnostic_session(0).unwrap();
        assert!(link.requests().contains(&vec![0x10, 0x86]));
        assert_eq!(controller.baud_rate(), 10400);
    }

    #[test]
    fn test_unsupported_baud_is_not_fatal() {
        let link = MockLink::new();
        let mut controller = unlocked(&link);

        let err = controller.start_diagnostic_session(9600).unwrap_err();
        assert_eq!(err, SessionError::UnsupportedBaud(9600));
        assert_eq!(controller.state(), SessionState::SecurityUnlocked);
    }

    #[test]
    fn test_rejection_in_session_terminates() {
        let link = MockLink::new();
        let mut controller = in_session(&link);
        link.respond_negative(&[0x3E], 0x80);

        let err = controller.keepalive().unwrap_err();
        assert_eq!(err.nrc_kind(), Some(crate::kwp::NrcKind::Rejected));
        assert_eq!(controller.state(), SessionState::Terminated);
    }

    #[test]
    fn test_read_identity_tolerates_unsupported_options() {
        let link = MockLink::new();
        let mut controller = in_session(&link);
        let mut hw = vec![0x5A, 0x92];
        hw.extend_from_slice(b"0261206518");
        link.respond(&[0x1A, 0x92], &hw);
        link.respond_negative(&[0x1A, 0x94], 0x12);
        let mut composite = vec![0x5A, 0x9B];
        composite.extend_from_slice(b"06A906032HS 0002");
        link.respond(&[0x1A, 0x9B], &composite);

        let identity = controller.read_identity().unwrap();
        assert_eq!(identity.hardware_number.as_deref(), Some("0261206518"));
        assert_eq!(identity.software_number, None);
        assert_eq!(identity.part_number.as_deref(), Some("06A906032HS"));
        assert_eq!(identity.software_version.as_deref(), Some("0002"));
        assert_eq!(controller.state(), SessionState::DiagSessionActive);
    }

    #[test]
    fn test_memory_services() {
        let link = MockLink::new();
        let mut controller = in_session(&link);
        link.respond(&[0x23], &[0x63, 0x12, 0x34]);
        link.respond(&[0x3D], &[0x7D]);

        let bytes = controller.read_memory_by_address(0x380AE7, 2).unwrap();
        assert_eq!(bytes, vec![0x12, 0x34]);
        controller
            .write_memory_by_address(0x380AE7, &[0xAB])
            .unwrap();

        let requests = link.requests();
        assert!(requests.contains(&vec![0x23, 0x38, 0x0A, 0xE7, 0x02]));
        assert!(requests.contains(&vec![0x3D, 0x38, 0x0A, 0xE7, 0x01, 0xAB]));
    }

    #[test]
    fn test_timing_and_pad_byte() {
        let link = MockLink::new();
        let mut controller = in_session(&link);
        link.respond(&[0x83, 0x03], &[0xC3, 0x03]);

        controller
            .access_timing_parameters(&[0x00, 0x01, 0x00, 0x14, 0x00])
            .unwrap();
        let before = link.written().len();
        controller.send_pad_byte().unwrap();

        assert_eq!(&link.written()[before..], &[0x00]);
        assert_eq!(link.pending_rx(), 0);
    }

    #[test]
    fn test_logging_lifecycle() {
        let link = MockLink::new();
        let mut controller = in_session(&link);
        link.respond(&[0xB7, 0x03], &[0xF7]);
        link.respond_always(&[0xB7], &[0xF7, 0x2A]);
        link.respond(&[0x82], &[0xC2]);

        let location = MemoryLocation::new(0x380AE7, 1).unwrap();
        controller
            .configure_logging(&[location], &AtomicBool::new(false))
            .unwrap();
        assert_eq!(controller.state(), SessionState::Logging);

        let record = controller.poll().unwrap();
        assert_eq!(record.data(), &[0xF7, 0x2A]);

        controller.terminate();
        assert_eq!(controller.state(), SessionState::Terminated);
        assert!(!link.is_open());
        assert_eq!(link.request_count(&[0x82]), 1);
    }

    #[test]
    fn test_cancelled_setup_keeps_session_for_terminate() {
        let link = MockLink::new();
        let mut controller = in_session(&link);
        link.respond_always(&[0xB7, 0x03], &[0x7F, 0xB7, 0x21]);
        link.respond(&[0x82], &[0xC2]);

        let location = MemoryLocation::new(0x380AE7, 1).unwrap();
        let err = controller
            .configure_logging(&[location], &AtomicBool::new(true))
            .unwrap_err();
        assert_eq!(err, SessionError::Cancelled("configuring the log record"));
        assert_eq!(controller.state(), SessionState::DiagSessionActive);
        assert!(link.is_open());

        controller.terminate();
        assert_eq!(link.request_count(&[0x82]), 1);
        assert_eq!(controller.state(), SessionState::Terminated);
    }

    #[test]
    fn test_poll_layout_mismatch_terminates() {
        let link = MockLink::new();
        let mut controller = in_session(&link);
        link.respond(&[0xB7, 0x03], &[0xF7]);
        link.respond(&[0xB7], &[0xF7]);

        let location = MemoryLocation::new(0x380AE7, 1).unwrap();
        controller
            .configure_logging(&[location], &AtomicBool::new(false))
            .unwrap();
        let err = controller.poll().unwrap_err();

        assert_eq!(
            err,
            SessionError::Config(ConfigError::LayoutMismatch {
                expected: 1,
                actual: 0
            })
        );
        assert_eq!(controller.state(), SessionState::Terminated);
    }

    #[test]
    fn test_drop_closes_link() {
        let link = MockLink::new();
        let controller = awake(&link);
        assert!(link.is_open());
        drop(controller);
        assert!(!link.is_open());
    }
}
