//! Error types shared by the transport, the frame decoder and the driver.

/// Failure reported by a [`RegisterTransport`](crate::transport::RegisterTransport).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TransportError {
    /// Generic bus failure
    Bus,
    /// The controller did not acknowledge
    Nack,
    /// The bus transaction did not complete in time
    Timeout,
}

/// Reasons a raw touch frame could not be turned into samples.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DecodeError {
    /// The buffer is shorter than the configured frame
    ShortBuffer { len: usize, need: usize },
    /// The controller wrote its error sentinel into the frame header
    DeviceError,
    /// Incell panel returned an all-0xFF frame, the touch state has to be recovered
    IncellBlank,
    /// The declared point count exceeds the number of slots
    InvalidCount(u8),
    /// A tracking id is not smaller than the number of slots
    IdOutOfRange(u8),
    /// A down record arrived while the declared point count is zero
    DownWithoutPoints,
    /// No valid record was found in the frame
    NoPoints,
}

/// Driver level error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Error {
    Transport(TransportError),
    Decode(DecodeError),
    /// The chip id register never reported a valid id
    Timeout,
    /// The boot id did not match any known chip
    NotIdentified,
    /// The operation needs a probed device
    NotProbed,
}

impl From<TransportError> for Error {
    fn from(e: TransportError) -> Self {
        Error::Transport(e)
    }
}

impl From<DecodeError> for Error {
    fn from(e: DecodeError) -> Self {
        Error::Decode(e)
    }
}
