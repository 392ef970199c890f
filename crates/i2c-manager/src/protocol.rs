//! Master-mode protocol state machine.
//!
//! [`Machine::step`] is a pure transition function: it consumes one decoded
//! phase-status code and the in-flight transaction, updates its own state and
//! the transaction's read data, and returns the hardware actions to perform
//! plus the terminal status when the transaction is over. It never touches
//! the controller itself, so the whole table can be exercised without an
//! interrupt.

use heapless::Vec;

use crate::error::{Error, Status};
use crate::transaction::{Opcode, Transaction};

/// Phase-status codes reported by the controller.
pub mod code {
    pub const BUS_ERROR: u8 = 0x00;
    pub const START: u8 = 0x08;
    pub const REPEATED_START: u8 = 0x10;
    pub const ADDRESS_WRITE_ACK: u8 = 0x18;
    pub const ADDRESS_WRITE_NAK: u8 = 0x20;
    pub const DATA_WRITE_ACK: u8 = 0x28;
    pub const DATA_WRITE_NAK: u8 = 0x30;
    pub const ARBITRATION_LOST: u8 = 0x38;
    pub const ADDRESS_READ_ACK: u8 = 0x40;
    pub const ADDRESS_READ_NAK: u8 = 0x48;
    pub const DATA_READ_ACK: u8 = 0x50;
    pub const DATA_READ_NAK: u8 = 0x58;
}

/// A decoded phase-status code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Phase {
    BusError,
    Start,
    RepeatedStart,
    AddressWriteAck,
    AddressWriteNak,
    /// Command or data byte sent, ACK received.
    DataWriteAck,
    DataWriteNak,
    ArbitrationLost,
    AddressReadAck,
    AddressReadNak,
    /// Byte received, ACK returned.
    DataReadAck(u8),
    /// Byte received, NAK returned.
    DataReadNak(u8),
    Unknown(u8),
}

impl Phase {
    /// Decode a status code. `read` fetches the data register and is only
    /// called for the two data-received codes.
    pub fn decode(status: u8, read: impl FnOnce() -> u8) -> Self {
        match status {
            code::BUS_ERROR => Self::BusError,
            code::START => Self::Start,
            code::REPEATED_START => Self::RepeatedStart,
            code::ADDRESS_WRITE_ACK => Self::AddressWriteAck,
            code::ADDRESS_WRITE_NAK => Self::AddressWriteNak,
            code::DATA_WRITE_ACK => Self::DataWriteAck,
            code::DATA_WRITE_NAK => Self::DataWriteNak,
            code::ARBITRATION_LOST => Self::ArbitrationLost,
            code::ADDRESS_READ_ACK => Self::AddressReadAck,
            code::ADDRESS_READ_NAK => Self::AddressReadNak,
            code::DATA_READ_ACK => Self::DataReadAck(read()),
            code::DATA_READ_NAK => Self::DataReadNak(read()),
            other => Self::Unknown(other),
        }
    }

    /// Status code this phase was decoded from.
    pub const fn code(self) -> u8 {
        match self {
            Self::BusError => code::BUS_ERROR,
            Self::Start => code::START,
            Self::RepeatedStart => code::REPEATED_START,
            Self::AddressWriteAck => code::ADDRESS_WRITE_ACK,
            Self::AddressWriteNak => code::ADDRESS_WRITE_NAK,
            Self::DataWriteAck => code::DATA_WRITE_ACK,
            Self::DataWriteNak => code::DATA_WRITE_NAK,
            Self::ArbitrationLost => code::ARBITRATION_LOST,
            Self::AddressReadAck => code::ADDRESS_READ_ACK,
            Self::AddressReadNak => code::ADDRESS_READ_NAK,
            Self::DataReadAck(_) => code::DATA_READ_ACK,
            Self::DataReadNak(_) => code::DATA_READ_NAK,
            Self::Unknown(c) => c,
        }
    }
}

/// Where the transaction stands after the last phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum State {
    Idle,
    /// SLA+W loaded.
    WriteAddress,
    /// SLA+R loaded.
    ReadAddress,
    WriteData,
    /// Command byte loaded.
    Command,
    /// Repeated start requested for the read turnaround.
    RepeatedStart,
    /// SLA+R acknowledged, waiting for data.
    Receiving,
    /// First word byte stored, final byte will be NAK'd.
    FinalByte,
    /// Arbitration lost, start re-requested.
    LostArbitration,
    Stop,
    ErrorStop(Error),
}

/// A side effect the interrupt front-end applies to the controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Action {
    Start,
    ClearStart,
    Stop,
    Write(u8),
    Ack(bool),
}

/// Upper bound of actions produced by a single phase.
pub const MAX_ACTIONS: usize = 3;

/// Result of one transition.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Step {
    /// Controller actions, in the order they must be applied.
    pub actions: Vec<Action, MAX_ACTIONS>,
    /// Terminal status once the transaction reached a stop.
    pub outcome: Option<Status>,
}

impl Step {
    const fn new() -> Self {
        Self { actions: Vec::new(), outcome: None }
    }

    fn push(&mut self, action: Action) {
        if self.actions.push(action).is_err() {
            error!("protocol step overflowed its action list");
        }
    }
}

/// Per-transaction protocol state.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Machine {
    state: State,
    last: State,
    /// Address byte on the wire: 7-bit address in [7:1], direction in bit 0.
    address: u8,
    written: u8,
    received: u8,
    lost_arbitration: bool,
}

impl Machine {
    /// An idle machine, ready for a start condition.
    pub const fn new() -> Self {
        Self {
            state: State::Idle,
            last: State::Idle,
            address: 0,
            written: 0,
            received: 0,
            lost_arbitration: false,
        }
    }

    /// State after the most recent phase.
    pub fn state(&self) -> State {
        self.state
    }

    /// Payload bytes transmitted so far.
    pub fn written(&self) -> u8 {
        self.written
    }

    /// Payload bytes received so far.
    pub fn received(&self) -> u8 {
        self.received
    }

    pub fn lost_arbitration(&self) -> bool {
        self.lost_arbitration
    }

    /// Advance the machine by one phase.
    pub fn step(&mut self, phase: Phase, txn: &mut Transaction) -> Step {
        let mut step = Step::new();
        self.last = self.state;

        match phase {
            Phase::BusError => self.fail(&mut step, Error::BusError),

            Phase::Start => {
                // Fresh activation or arbitration retry: either way the
                // transaction replays from its address phase.
                self.lost_arbitration = false;
                self.written = 0;
                self.received = 0;
                self.address = txn.address << 1;
                self.state = State::WriteAddress;
                if txn.opcode.reads_immediately() {
                    self.address |= 1;
                    self.state = State::ReadAddress;
                }
                step.push(Action::ClearStart);
                step.push(Action::Write(self.address));
            }

            Phase::RepeatedStart => {
                if self.lost_arbitration {
                    self.lost_arbitration = false;
                    self.address = txn.address << 1;
                    self.state = State::WriteAddress;
                    if txn.opcode.reads_immediately() {
                        self.address |= 1;
                        self.state = State::ReadAddress;
                    }
                } else if self.last == State::RepeatedStart {
                    self.address = (txn.address << 1) | 1;
                    self.state = State::ReadAddress;
                } else {
                    step.push(Action::ClearStart);
                    self.fail(&mut step, Error::UnexpectedPhase);
                    return step;
                }
                step.push(Action::ClearStart);
                step.push(Action::Write(self.address));
            }

            // An acknowledged address opens a new segment: after an
            // arbitration retry the slave expects it from its first byte.
            Phase::AddressWriteAck => {
                self.written = 0;
                match txn.opcode {
                    Opcode::Quick => self.finish(&mut step),
                    Opcode::SendByte => {
                        self.state = State::WriteData;
                        self.send_payload(&mut step, txn);
                    }
                    opcode if opcode.has_command() => {
                        self.state = State::Command;
                        step.push(Action::Write(txn.command));
                    }
                    _ => self.fail(&mut step, Error::UnexpectedPhase),
                }
            }

            Phase::AddressWriteNak => self.fail(&mut step, Error::AddressNak),

            Phase::DataWriteAck => match txn.opcode {
                Opcode::SendByte => self.finish(&mut step),
                Opcode::WriteByte if self.written < 1 => {
                    self.state = State::WriteData;
                    self.send_payload(&mut step, txn);
                }
                Opcode::WriteWord if self.written < 2 => {
                    self.state = State::WriteData;
                    self.send_payload(&mut step, txn);
                }
                Opcode::WriteByte | Opcode::WriteWord => self.finish(&mut step),
                Opcode::ReadByte | Opcode::ReadWord => {
                    self.state = State::RepeatedStart;
                    step.push(Action::Start);
                }
                Opcode::Quick | Opcode::ReceiveByte => {
                    self.fail(&mut step, Error::UnexpectedPhase)
                }
            },

            Phase::DataWriteNak => self.fail(&mut step, Error::DataNak),

            Phase::ArbitrationLost => {
                self.state = State::LostArbitration;
                self.lost_arbitration = true;
                step.push(Action::Start);
            }

            Phase::AddressReadAck => {
                self.received = 0;
                match txn.opcode {
                    // Single expected byte: refuse it so the slave lets go.
                    Opcode::ReceiveByte | Opcode::ReadByte => {
                        self.state = State::Receiving;
                        step.push(Action::Ack(false));
                    }
                    Opcode::ReadWord => {
                        self.state = State::Receiving;
                        step.push(Action::Ack(true));
                    }
                    _ => self.fail(&mut step, Error::UnexpectedPhase),
                }
            }

            Phase::AddressReadNak => {
                self.fail(&mut step, Error::ReadAddressNak)
            }

            Phase::DataReadAck(byte) => {
                if txn.opcode == Opcode::ReadWord
                    && self.state == State::Receiving
                {
                    if self.store(&mut step, txn, byte) {
                        self.state = State::FinalByte;
                        step.push(Action::Ack(false));
                    }
                } else {
                    self.fail(&mut step, Error::UnexpectedPhase);
                }
            }

            Phase::DataReadNak(byte) => {
                if txn.opcode.reads()
                    && matches!(self.state, State::Receiving | State::FinalByte)
                {
                    if self.store(&mut step, txn, byte) {
                        self.finish(&mut step);
                    }
                } else {
                    self.fail(&mut step, Error::UnexpectedPhase);
                }
            }

            Phase::Unknown(_) => self.fail(&mut step, Error::UnexpectedPhase),
        }

        step
    }

    fn send_payload(&mut self, step: &mut Step, txn: &Transaction) {
        match txn.payload.get(usize::from(self.written)) {
            Some(&byte) => {
                step.push(Action::Write(byte));
                self.written += 1;
            }
            None => self.fail(step, Error::UnexpectedPhase),
        }
    }

    /// Keep a received byte. Fails the transaction once the payload is full.
    fn store(
        &mut self,
        step: &mut Step,
        txn: &mut Transaction,
        byte: u8,
    ) -> bool {
        match txn.payload.get_mut(usize::from(self.received)) {
            Some(slot) => {
                *slot = byte;
                self.received += 1;
                true
            }
            None => {
                self.fail(step, Error::UnexpectedPhase);
                false
            }
        }
    }

    fn finish(&mut self, step: &mut Step) {
        self.state = State::Stop;
        step.push(Action::Stop);
        step.outcome = Some(Ok(()));
    }

    fn fail(&mut self, step: &mut Step, error: Error) {
        self.state = State::ErrorStop(error);
        step.push(Action::Stop);
        step.outcome = Some(Err(error));
    }
}

impl Default for Machine {
    fn default() -> Self {
        Self::new()
    }
}
