use std::fmt::Debug;

/// The error type for everything that can go wrong between claiming a chip
/// and releasing it.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The power-good input is wired up but the rail is down.
    #[error("chip power is not good")]
    NotPowered,

    /// The TAP or control pins could not be claimed, or the session is in
    /// the wrong stage for the requested operation.
    #[error("device not ready: {0}")]
    DeviceNotReady(&'static str),

    /// The chip answered with something the wire protocol does not allow.
    #[error("JTAG protocol error: {0}")]
    Protocol(String),

    /// A pin-level transaction failed underneath the TAP sequencer.
    #[error("JTAG signal I/O failed: {0}")]
    Io(String),

    /// Readback diverged from the patched image.
    #[error("bootcode mismatch at word {index}: expected {expected:#010x}, read {actual:#010x}")]
    VerifyMismatch {
        index: usize,
        expected: u32,
        actual: u32,
    },

    /// The chip is already claimed by another session.
    #[error("chip is busy")]
    Busy,
}

impl Error {
    /// Wrap a pin or transport failure, keeping its debug rendering.
    pub(crate) fn io(source: impl Debug) -> Self {
        Error::Io(format!("{source:?}"))
    }

    /// Attach the word index and address of a failed block transfer to the
    /// message-carrying variants. Structural variants pass through as-is.
    pub(crate) fn at_word(self, index: usize, addr: u32) -> Self {
        match self {
            Error::Protocol(msg) => {
                Error::Protocol(format!("word {index} ({addr:#010x}): {msg}"))
            }
            Error::Io(msg) => Error::Io(format!("word {index} ({addr:#010x}): {msg}")),
            other => other,
        }
    }
}
