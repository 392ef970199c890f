use crate::error::{Error, Status};

/// SMBus transaction opcodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum Opcode {
    /// Address only, no data.
    Quick = 0x00,
    /// One data byte written, no command byte.
    SendByte = 0x01,
    /// One data byte read, no command byte.
    ReceiveByte = 0x02,
    /// Command byte, then one data byte written.
    WriteByte = 0x03,
    /// Command byte, repeated start, one data byte read.
    ReadByte = 0x04,
    /// Command byte, then two data bytes written low byte first.
    WriteWord = 0x05,
    /// Command byte, repeated start, two data bytes read low byte first.
    ReadWord = 0x06,
}

impl Opcode {
    /// Whether the first address phase already goes out in read direction.
    pub const fn reads_immediately(self) -> bool {
        matches!(self, Self::ReceiveByte)
    }

    /// Whether the transaction returns data.
    pub const fn reads(self) -> bool {
        matches!(self, Self::ReceiveByte | Self::ReadByte | Self::ReadWord)
    }

    /// Whether a command byte follows the write address.
    pub const fn has_command(self) -> bool {
        matches!(
            self,
            Self::WriteByte | Self::ReadByte | Self::WriteWord | Self::ReadWord
        )
    }
}

/// The wire-level part of a request: what the state machine needs to drive
/// one transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Transaction {
    pub opcode: Opcode,
    /// 7-bit slave address, unshifted.
    pub address: u8,
    pub command: u8,
    /// Write data in, read data out.
    pub payload: [u8; 2],
}

impl Transaction {
    pub const fn new(opcode: Opcode, address: u8) -> Self {
        Self { opcode, address, command: 0, payload: [0; 2] }
    }
}

/// A queued request. Owned by the queue, then by the interrupt engine,
/// until its completion is delivered.
#[derive(Debug, Clone, Copy)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub(crate) struct Request {
    pub slot: usize,
    pub seq: u32,
    pub requester_id: u8,
    pub txn: Transaction,
}

/// What the engine hands back through a completion slot.
#[derive(Debug, Clone, Copy)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub(crate) struct Completion {
    pub seq: u32,
    pub status: Status,
    pub payload: [u8; 2],
    pub received: u8,
}

/// Per-requester transaction descriptor.
///
/// Obtained from [`I2cManager::descriptor`](crate::I2cManager::descriptor)
/// and reused for every transaction of that requester. Transactions borrow
/// it mutably, so it can never be refilled while its request is in flight.
#[derive(Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Descriptor {
    requester_id: u8,
    /// Identity of the manager that handed this descriptor out.
    owner: usize,
    slot: usize,
    seq: u32,
    status: Status,
    txn: Transaction,
    received: u8,
}

impl Descriptor {
    pub(crate) const fn new(
        requester_id: u8,
        owner: usize,
        slot: usize,
    ) -> Self {
        Self {
            requester_id,
            owner,
            slot,
            seq: 0,
            status: Err(Error::Incomplete),
            txn: Transaction::new(Opcode::Quick, 0),
            received: 0,
        }
    }

    /// Identifier of the subsystem owning this descriptor.
    pub fn requester_id(&self) -> u8 {
        self.requester_id
    }

    /// Status of the last transaction.
    pub fn status(&self) -> Status {
        self.status
    }

    /// Opcode of the last request.
    pub fn opcode(&self) -> Opcode {
        self.txn.opcode
    }

    /// Slave address of the last request.
    pub fn address(&self) -> u8 {
        self.txn.address
    }

    /// Command byte of the last request.
    pub fn command(&self) -> u8 {
        self.txn.command
    }

    /// Write data of the last request, or the data read by it.
    pub fn payload(&self) -> [u8; 2] {
        self.txn.payload
    }

    /// Bytes actually received by the last transaction.
    pub fn received(&self) -> &[u8] {
        &self.txn.payload[..usize::from(self.received)]
    }

    /// First data byte.
    pub fn byte(&self) -> u8 {
        self.txn.payload[0]
    }

    /// Both data bytes as a little-endian word.
    pub fn word(&self) -> u16 {
        u16::from_le_bytes(self.txn.payload)
    }

    pub(crate) fn prepare(
        &mut self,
        opcode: Opcode,
        address: u8,
        command: u8,
        payload: [u8; 2],
    ) {
        self.txn = Transaction { opcode, address, command, payload };
    }

    /// Arm the descriptor for a new submission and build its request.
    pub(crate) fn arm(&mut self) -> Request {
        self.status = Err(Error::Incomplete);
        self.received = 0;
        self.seq = self.seq.wrapping_add(1);
        Request {
            slot: self.slot,
            seq: self.seq,
            requester_id: self.requester_id,
            txn: self.txn,
        }
    }

    pub(crate) fn owner(&self) -> usize {
        self.owner
    }

    pub(crate) fn slot(&self) -> usize {
        self.slot
    }

    pub(crate) fn set_status(&mut self, status: Status) {
        self.status = status;
    }

    pub(crate) fn complete(&mut self, completion: Completion) {
        self.status = completion.status;
        self.received = completion.received;
        if self.txn.opcode.reads() {
            self.txn.payload = completion.payload;
        }
    }
}
