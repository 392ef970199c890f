#![no_std]
//! Interrupt-driven SMBus/I2C transaction engine.
//!
//! Several tasks share one bus controller. Each task owns a [`Descriptor`]
//! and calls one of the per-opcode methods of [`I2cManager`]; requests are
//! queued in arrival order and driven one at a time by the protocol state
//! machine, which runs from the controller interrupt (directly, or deferred
//! to a handler task). The calling task sleeps on its completion slot with a
//! bounded timeout and reads the result off its descriptor.
//!
//! The controller is reached through the [`Controller`] trait; the state
//! machine itself ([`protocol::Machine`]) is a pure function of the phase
//! codes it is fed.

mod fmt;

mod config;
mod controller;
mod dispatch;
mod error;
mod manager;
pub mod protocol;
mod transaction;

pub use config::Config;
pub use controller::Controller;
pub use dispatch::Dispatch;
pub use error::{status_code, Error, Status};
pub use manager::I2cManager;
pub use transaction::{Descriptor, Opcode, Transaction};
