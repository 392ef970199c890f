/// Terminal result of a bus transaction.
///
/// `Ok(())` is reported to callers as code `0`; every error carries its own
/// nonzero code (see [`Error::code`]).
pub type Status = Result<(), Error>;

/// Errors that a transaction can end with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum Error {
    /// Slave did not acknowledge its address in write direction.
    AddressNak = 0x20,
    /// Slave did not acknowledge a command or data byte.
    DataNak = 0x30,
    /// Slave did not acknowledge its address in read direction.
    ReadAddressNak = 0x48,
    /// Controller detected an illegal start or stop on the bus.
    BusError = 0xF0,
    /// Controller reported a phase that does not fit the transaction.
    UnexpectedPhase = 0xF1,
    /// Slave address does not fit in 7 bits.
    InvalidAddress = 0xF2,
    /// A transaction was issued before the manager was initialized.
    NotInitialized = 0xF3,
    /// The descriptor was handed out by a different manager.
    ForeignDescriptor = 0xF4,
    /// No completion arrived within the configured timeout.
    Timeout = 0xFD,
    /// The request queue was full; the controller was not touched.
    Overloaded = 0xFE,
    /// Sentinel written before a request is queued.
    Incomplete = 0xFF,
}

impl Error {
    /// Numeric status code of this error.
    pub const fn code(self) -> u8 {
        self as u8
    }

    /// Map a numeric status code back to an error.
    ///
    /// Returns `None` for `0` (success) and for unknown codes.
    pub const fn from_code(code: u8) -> Option<Self> {
        match code {
            0x20 => Some(Self::AddressNak),
            0x30 => Some(Self::DataNak),
            0x48 => Some(Self::ReadAddressNak),
            0xF0 => Some(Self::BusError),
            0xF1 => Some(Self::UnexpectedPhase),
            0xF2 => Some(Self::InvalidAddress),
            0xF3 => Some(Self::NotInitialized),
            0xF4 => Some(Self::ForeignDescriptor),
            0xFD => Some(Self::Timeout),
            0xFE => Some(Self::Overloaded),
            0xFF => Some(Self::Incomplete),
            _ => None,
        }
    }

    /// Failures that happened on the wire. The bus is given time to settle
    /// after these and after timeouts; the others never reached it.
    pub const fn is_bus_failure(self) -> bool {
        matches!(
            self,
            Self::AddressNak
                | Self::DataNak
                | Self::ReadAddressNak
                | Self::BusError
                | Self::UnexpectedPhase
        )
    }
}

/// Numeric code of a transaction status, `0` for success.
pub const fn status_code(status: &Status) -> u8 {
    match status {
        Ok(()) => 0,
        Err(e) => e.code(),
    }
}
