//! KWP Negative Response Codes (NRC)

use std::fmt;

/// KWP Negative Response Codes as reported by ME7 ECUs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NegativeResponseCode {
    // General NRCs
    GeneralReject,
    Busy,
    SubFunctionNotSupported,

    // Condition NRCs
    BusyRepeatRequest,
    ConditionsNotCorrect,
    RoutineNotComplete,

    // Request NRCs
    RequestOutOfRange,
    SecurityAccessDenied,
    InvalidKey,
    ExceededNumberOfAttempts,
    RequiredTimeDelayNotExpired,

    // Download/Upload NRCs
    DownloadNotAccepted,
    ImproperDownloadType,
    CannotDownloadToAddress,
    CannotDownloadNumberOfBytes,
    UploadNotAccepted,
    ImproperUploadType,
    CannotUploadFromAddress,
    CannotUploadNumberOfBytes,

    // Block transfer NRCs
    TransferSuspended,
    TransferAborted,
    IllegalAddressInBlockTransfer,
    IllegalByteCountInBlockTransfer,
    IllegalBlockTransferType,
    BlockTransferChecksumError,
    ResponsePending,
    IncorrectByteCountDuringBlockTransfer,

    // Session NRCs
    ServiceNotSupportedInActiveMode,
    NoProgram,

    /// Any code without a dedicated name
    Other(u8),
}

/// How a negative response is treated by the protocol engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NrcKind {
    /// ECU is busy; the same request may be sent again
    Busy,
    /// ECU accepted the request; the real response follows
    ResponsePending,
    /// Security access was refused
    SecurityFailure,
    /// A documented rejection
    Rejected,
    /// Anything outside the documented table
    Unknown,
}

impl NrcKind {
    /// Whether the transport or log engine recovers from this locally
    pub fn is_retryable(self) -> bool {
        matches!(self, NrcKind::Busy | NrcKind::ResponsePending)
    }
}

impl From<u8> for NegativeResponseCode {
    fn from(value: u8) -> Self {
        match value {
            0x10 => Self::GeneralReject,
            0x11 => Self::Busy,
            0x12 => Self::SubFunctionNotSupported,
            0x21 => Self::BusyRepeatRequest,
            0x22 => Self::ConditionsNotCorrect,
            0x23 => Self::RoutineNotComplete,
            0x31 => Self::RequestOutOfRange,
            0x33 => Self::SecurityAccessDenied,
            0x35 => Self::InvalidKey,
            0x36 => Self::ExceededNumberOfAttempts,
            0x37 => Self::RequiredTimeDelayNotExpired,
            0x40 => Self::DownloadNotAccepted,
            0x41 => Self::ImproperDownloadType,
            0x42 => Self::CannotDownloadToAddress,
            0x43 => Self::CannotDownloadNumberOfBytes,
            0x50 => Self::UploadNotAccepted,
            0x51 => Self::ImproperUploadType,
            0x52 => Self::CannotUploadFromAddress,
            0x53 => Self::CannotUploadNumberOfBytes,
            0x71 => Self::TransferSuspended,
            0x72 => Self::TransferAborted,
            0x74 => Self::IllegalAddressInBlockTransfer,
            0x75 => Self::IllegalByteCountInBlockTransfer,
            0x76 => Self::IllegalBlockTransferType,
            0x77 => Self::BlockTransferChecksumError,
            0x78 => Self::ResponsePending,
            0x79 => Self::IncorrectByteCountDuringBlockTransfer,
            0x80 => Self::ServiceNotSupportedInActiveMode,
            0x90 => Self::NoProgram,
            other => Self::Other(other),
        }
    }
}

impl From<NegativeResponseCode> for u8 {
    fn from(nrc: NegativeResponseCode) -> Self {
        match nrc {
            NegativeResponseCode::GeneralReject => 0x10,
            NegativeResponseCode::Busy => 0x11,
            NegativeResponseCode::SubFunctionNotSupported => 0x12,
            NegativeResponseCode::BusyRepeatRequest => 0x21,
            NegativeResponseCode::ConditionsNotCorrect => 0x22,
            NegativeResponseCode::RoutineNotComplete => 0x23,
            NegativeResponseCode::RequestOutOfRange => 0x31,
            NegativeResponseCode::SecurityAccessDenied => 0x33,
            NegativeResponseCode::InvalidKey => 0x35,
            NegativeResponseCode::ExceededNumberOfAttempts => 0x36,
            NegativeResponseCode::RequiredTimeDelayNotExpired => 0x37,
            NegativeResponseCode::DownloadNotAccepted => 0x40,
            NegativeResponseCode::ImproperDownloadType => 0x41,
            NegativeResponseCode::CannotDownloadToAddress => 0x42,
            NegativeResponseCode::CannotDownloadNumberOfBytes => 0x43,
            NegativeResponseCode::UploadNotAccepted => 0x50,
            NegativeResponseCode::ImproperUploadType => 0x51,
            NegativeResponseCode::CannotUploadFromAddress => 0x52,
            NegativeResponseCode::CannotUploadNumberOfBytes => 0x53,
            NegativeResponseCode::TransferSuspended => 0x71,
            NegativeResponseCode::TransferAborted => 0x72,
            NegativeResponseCode::IllegalAddressInBlockTransfer => 0x74,
            NegativeResponseCode::IllegalByteCountInBlockTransfer => 0x75,
            NegativeResponseCode::IllegalBlockTransferType => 0x76,
            NegativeResponseCode::BlockTransferChecksumError => 0x77,
            NegativeResponseCode::ResponsePending => 0x78,
            NegativeResponseCode::IncorrectByteCountDuringBlockTransfer => 0x79,
            NegativeResponseCode::ServiceNotSupportedInActiveMode => 0x80,
            NegativeResponseCode::NoProgram => 0x90,
            NegativeResponseCode::Other(code) => code,
        }
    }
}

impl NegativeResponseCode {
    pub fn code(self) -> u8 {
        self.into()
    }

    /// Classify the code for retry/fatal handling
    pub fn kind(self) -> NrcKind {
        match self.code() {
            0x11 | 0x21 => NrcKind::Busy,
            0x78 => NrcKind::ResponsePending,
            0x33 | 0x35 | 0x36 | 0x37 => NrcKind::SecurityFailure,
            0x10 | 0x12 | 0x22 | 0x23 | 0x31 | 0x40..=0x53 | 0x71..=0x79 | 0x80 | 0x90 => {
                NrcKind::Rejected
            }
            _ => NrcKind::Unknown,
        }
    }

    /// Get a human-readable description
    pub fn description(&self) -> &'static str {
        match self {
            Self::GeneralReject => "General reject",
            Self::Busy => "Busy, repeat request",
            Self::SubFunctionNotSupported => "Sub-function not supported or invalid format",
            Self::BusyRepeatRequest => "Busy, repeat request",
            Self::ConditionsNotCorrect => "Conditions not correct or request sequence error",
            Self::RoutineNotComplete => "Routine not complete",
            Self::RequestOutOfRange => "Request out of range",
            Self::SecurityAccessDenied => "Security access denied",
            Self::InvalidKey => "Invalid key",
            Self::ExceededNumberOfAttempts => "Exceeded number of attempts",
            Self::RequiredTimeDelayNotExpired => "Required time delay not expired",
            Self::DownloadNotAccepted => "Download not accepted",
            Self::ImproperDownloadType => "Improper download type",
            Self::CannotDownloadToAddress => "Cannot download to specified address",
            Self::CannotDownloadNumberOfBytes => "Cannot download number of bytes requested",
            Self::UploadNotAccepted => "Upload not accepted",
            Self::ImproperUploadType => "Improper upload type",
            Self::CannotUploadFromAddress => "Cannot upload from specified address",
            Self::CannotUploadNumberOfBytes => "Cannot upload number of bytes requested",
            Self::TransferSuspended => "Transfer suspended",
            Self::TransferAborted => "Transfer aborted",
            Self::IllegalAddressInBlockTransfer => "Illegal address in block transfer",
            Self::IllegalByteCountInBlockTransfer => "Illegal byte count in block transfer",
            Self::IllegalBlockTransferType => "Illegal block transfer type",
            Self::BlockTransferChecksumError => "Block transfer data checksum error",
            Self::ResponsePending => "Request correctly received, response pending",
            Self::IncorrectByteCountDuringBlockTransfer => {
                "Incorrect byte count during block transfer"
            }
            Self::ServiceNotSupportedInActiveMode => {
                "Service not supported in active diagnostic mode"
            }
            Self::NoProgram => "No program",
            Self::Other(_) => "Generic negative response",
        }
    }
}

impl fmt::Display for NegativeResponseCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.description())
    }
}

impl fmt::UpperHex for NegativeResponseCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::UpperHex::fmt(&self.code(), f)
    }
}
