//! Crate-wide error type.
//!
//! Every fallible operation in this crate returns [`Result<T>`], an alias
//! for `std::result::Result<T, NiimbotError>`. Error variants map directly
//! onto the error taxonomy: a caller can match on the variant instead of
//! parsing message text.

use thiserror::Error;

/// The step of [`crate::job::PrintJob`] that rejected a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobStep {
    SetDensity,
    SetLabelType,
    StartPrint,
    StartPage,
    SetDimension,
    SetQuantity,
    EndPage,
    EndPrint,
}

impl std::fmt::Display for JobStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            JobStep::SetDensity => "SET_LABEL_DENSITY",
            JobStep::SetLabelType => "SET_LABEL_TYPE",
            JobStep::StartPrint => "START_PRINT",
            JobStep::StartPage => "START_PAGE_PRINT",
            JobStep::SetDimension => "SET_DIMENSION",
            JobStep::SetQuantity => "SET_QUANTITY",
            JobStep::EndPage => "END_PAGE_PRINT",
            JobStep::EndPrint => "END_PRINT",
        };
        f.write_str(name)
    }
}

/// Why [`crate::codec::decode_a`] rejected a buffer.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum BadFrame {
    #[error("expected 0x55 0x55 header")]
    BadHeader,
    #[error("expected 0xAA 0xAA trailer")]
    BadTrailer,
    #[error("checksum mismatch")]
    BadChecksum,
    #[error("buffer ended mid-frame")]
    Truncated,
    #[error("payload length {0} exceeds 255 bytes")]
    PayloadTooLong(usize),
}

#[derive(Error, Debug)]
pub enum NiimbotError {
    #[error("no matching transport found")]
    TransportUnavailable,

    #[error("transport I/O error: {0}")]
    TransportIo(String),

    #[error("malformed frame: {0}")]
    BadFrame(#[from] BadFrame),

    #[error("unexpected response type 0x{got_type:02X}, expected 0x{expected_type:02X}")]
    UnexpectedResponse { got_type: u8, expected_type: u8 },

    #[error("printer replied with an error packet (type 0xDB)")]
    PrinterError,

    #[error("printer rejected {0} (ack = 0)")]
    PrinterRejected(JobStep),

    #[error("timed out waiting for a response")]
    Timeout,

    #[error("END_PRINT polling cap reached")]
    EndPrintTimeout,

    #[error("requested width {requested}px exceeds model maximum {max}px")]
    WidthExceedsModel { requested: u32, max: u32 },

    #[error("requested density {requested} exceeds model maximum {max}")]
    DensityExceedsModel { requested: u8, max: u8 },

    #[error("label type {0} is not supported by this model")]
    LabelTypeNotSupported(u8),
}

pub type Result<T> = std::result::Result<T, NiimbotError>;
