//! Simulated bus controller shared by the integration tests.
#![allow(dead_code)]

use std::future::Future;
use std::sync::{Arc, Mutex};

use embassy_futures::select::{select, select3, Either, Either3};
use embassy_futures::yield_now;
use embassy_sync::blocking_mutex::raw::NoopRawMutex;
use i2c_manager::{Controller, I2cManager};

/// Something observable on the wires.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Wire {
    Start,
    RepeatedStart,
    /// Address byte including the direction bit.
    Address(u8),
    /// Byte sent by the master.
    Byte(u8),
    /// Byte returned by a slave.
    Read(u8),
    Stop,
    LostArbitration,
}

// ---------------------------------------------------------------------------
// Slaves and faults
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct Slave {
    pub address: u8,
    pub nak_address: bool,
    pub nak_read_address: bool,
    /// NAK the n-th byte of a write segment (0 is the command byte).
    pub nak_data_at: Option<usize>,
    /// Bytes served, in order, on every read segment.
    pub read_data: Vec<u8>,
}

impl Slave {
    pub fn new(address: u8) -> Self {
        Self {
            address,
            nak_address: false,
            nak_read_address: false,
            nak_data_at: None,
            read_data: Vec::new(),
        }
    }

    pub fn nak_address(mut self) -> Self {
        self.nak_address = true;
        self
    }

    pub fn nak_read_address(mut self) -> Self {
        self.nak_read_address = true;
        self
    }

    pub fn nak_data_at(mut self, index: usize) -> Self {
        self.nak_data_at = Some(index);
        self
    }

    pub fn reads(mut self, data: &[u8]) -> Self {
        self.read_data = data.to_vec();
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    /// Another master wins. With `keep_bus` the retry is reported as a
    /// repeated start, otherwise the bus is released first.
    LoseArbitration { keep_bus: bool },
    BusError,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Idle,
    AddressPending,
    Writing,
    Reading,
    /// Slave refused; nothing more happens until stop.
    Refused,
}

// ---------------------------------------------------------------------------
// Simulated controller
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub struct SimState {
    enabled: bool,
    si: bool,
    status: u8,
    sta: bool,
    sto: bool,
    aa: bool,
    dat: u8,
    in_transaction: bool,
    mode: Mode,
    selected: Option<usize>,
    segment_index: usize,
    transmitted: usize,
    fault: Option<(usize, Fault)>,
    stalled: bool,
    masked: bool,
    pub slaves: Vec<Slave>,
    pub trace: Vec<Wire>,
    pub start_calls: usize,
    pub mask_calls: usize,
    pub unmask_calls: usize,
    pub eoi_calls: usize,
}

/// A controller with a handful of slaves behind it. Clones share state, so
/// a test keeps one handle while the manager owns the other.
#[derive(Debug, Clone)]
pub struct SimBus(Arc<Mutex<SimState>>);

impl SimBus {
    pub fn new(slaves: Vec<Slave>) -> Self {
        Self(Arc::new(Mutex::new(SimState {
            enabled: false,
            si: false,
            status: 0xF8,
            sta: false,
            sto: false,
            aa: false,
            dat: 0,
            in_transaction: false,
            mode: Mode::Idle,
            selected: None,
            segment_index: 0,
            transmitted: 0,
            fault: None,
            stalled: false,
            masked: false,
            slaves,
            trace: Vec::new(),
            start_calls: 0,
            mask_calls: 0,
            unmask_calls: 0,
            eoi_calls: 0,
        })))
    }

    pub fn state(&self) -> std::sync::MutexGuard<'_, SimState> {
        self.0.lock().unwrap()
    }

    pub fn trace(&self) -> Vec<Wire> {
        self.state().trace.clone()
    }

    pub fn start_calls(&self) -> usize {
        self.state().start_calls
    }

    /// Inject `fault` instead of the `nth` byte on the wire (0-based, counting
    /// addresses, written and read bytes over the lifetime of the bus).
    pub fn inject(&self, nth: usize, fault: Fault) {
        self.state().fault = Some((nth, fault));
    }

    /// Freeze the bus: no phase completes until [`release`](Self::release).
    pub fn stall(&self) {
        self.state().stalled = true;
    }

    pub fn release(&self) {
        let mut s = self.state();
        s.stalled = false;
        if !s.si {
            s.advance();
        }
    }

    /// Controller interrupt flag, regardless of masking.
    pub fn is_pending(&self) -> bool {
        self.state().si
    }

    /// Level of the interrupt line as seen by the CPU.
    pub fn irq_asserted(&self) -> bool {
        let s = self.state();
        s.enabled && s.si && !s.masked
    }

    pub fn is_masked(&self) -> bool {
        self.state().masked
    }
}

impl SimState {
    fn raise(&mut self, status: u8) {
        self.status = status;
        self.si = true;
    }

    /// Perform whatever the control bits ask for, as the controller does once
    /// its interrupt flag is cleared.
    fn advance(&mut self) {
        if self.stalled {
            return;
        }

        if self.sto {
            self.sto = false;
            self.trace.push(Wire::Stop);
            self.in_transaction = false;
            self.mode = Mode::Idle;
            self.selected = None;
        }

        if self.sta {
            if self.in_transaction {
                self.trace.push(Wire::RepeatedStart);
                self.raise(0x10);
            } else {
                self.trace.push(Wire::Start);
                self.in_transaction = true;
                self.raise(0x08);
            }
            self.mode = Mode::AddressPending;
            return;
        }

        if matches!(
            self.mode,
            Mode::AddressPending | Mode::Writing | Mode::Reading
        ) && self.fault_due()
        {
            return;
        }

        match self.mode {
            Mode::AddressPending => {
                self.transmitted += 1;
                let byte = self.dat;
                self.trace.push(Wire::Address(byte));
                let read = byte & 1 == 1;
                self.selected =
                    self.slaves.iter().position(|s| s.address == byte >> 1);
                self.segment_index = 0;
                let ack = match self.selected {
                    Some(i) if read => !self.slaves[i].nak_read_address,
                    Some(i) => !self.slaves[i].nak_address,
                    None => false,
                };
                let (status, mode) = match (read, ack) {
                    (false, true) => (0x18, Mode::Writing),
                    (false, false) => (0x20, Mode::Refused),
                    (true, true) => (0x40, Mode::Reading),
                    (true, false) => (0x48, Mode::Refused),
                };
                self.mode = mode;
                self.raise(status);
            }
            Mode::Writing => {
                self.transmitted += 1;
                let byte = self.dat;
                self.trace.push(Wire::Byte(byte));
                let nak = self
                    .selected
                    .and_then(|i| self.slaves[i].nak_data_at)
                    .is_some_and(|at| at == self.segment_index);
                self.segment_index += 1;
                if nak {
                    self.mode = Mode::Refused;
                    self.raise(0x30);
                } else {
                    self.raise(0x28);
                }
            }
            Mode::Reading => {
                self.transmitted += 1;
                let index = self.segment_index;
                let byte = self
                    .selected
                    .and_then(|i| self.slaves[i].read_data.get(index).copied())
                    .unwrap_or(0xFF);
                self.segment_index += 1;
                self.dat = byte;
                self.trace.push(Wire::Read(byte));
                self.raise(if self.aa { 0x50 } else { 0x58 });
            }
            Mode::Idle | Mode::Refused => {}
        }
    }

    fn fault_due(&mut self) -> bool {
        let Some((nth, fault)) = self.fault else {
            return false;
        };
        if self.transmitted != nth {
            return false;
        }
        self.fault = None;
        self.selected = None;
        self.mode = Mode::Idle;
        match fault {
            Fault::LoseArbitration { keep_bus } => {
                self.trace.push(Wire::LostArbitration);
                self.in_transaction = keep_bus;
                self.raise(0x38);
            }
            Fault::BusError => {
                self.in_transaction = false;
                self.raise(0x00);
            }
        }
        true
    }
}

impl Controller for SimBus {
    fn enable(&mut self) {
        let mut s = self.state();
        s.enabled = true;
        s.si = false;
    }

    fn interrupt_pending(&mut self) -> bool {
        self.state().si
    }

    fn status(&mut self) -> u8 {
        self.state().status
    }

    fn start(&mut self) {
        let mut s = self.state();
        s.start_calls += 1;
        s.sta = true;
        if !s.si {
            s.advance();
        }
    }

    fn clear_start(&mut self) {
        self.state().sta = false;
    }

    fn stop(&mut self) {
        self.state().sto = true;
    }

    fn set_ack(&mut self, ack: bool) {
        self.state().aa = ack;
    }

    fn write(&mut self, byte: u8) {
        self.state().dat = byte;
    }

    fn read(&mut self) -> u8 {
        self.state().dat
    }

    fn clear_interrupt(&mut self) {
        let mut s = self.state();
        s.si = false;
        s.advance();
    }

    fn mask_interrupt(&mut self) {
        let mut s = self.state();
        s.masked = true;
        s.mask_calls += 1;
    }

    fn unmask_interrupt(&mut self) {
        let mut s = self.state();
        s.masked = false;
        s.unmask_calls += 1;
    }

    fn end_of_interrupt(&mut self) {
        self.state().eoi_calls += 1;
    }
}

// ---------------------------------------------------------------------------
// Interrupt pumps
// ---------------------------------------------------------------------------

pub type Manager<const DEPTH: usize, const CLIENTS: usize> =
    I2cManager<NoopRawMutex, SimBus, DEPTH, CLIENTS>;

/// Stand-in for the interrupt controller: fires the direct handler whenever
/// the line is asserted.
pub async fn pump<const D: usize, const C: usize>(
    mgr: &Manager<D, C>,
    bus: &SimBus,
) -> ! {
    loop {
        if bus.irq_asserted() {
            mgr.on_interrupt();
        }
        yield_now().await;
    }
}

/// Same for the deferred front-end; the handler task runs alongside.
pub async fn pump_deferred<const D: usize, const C: usize>(
    mgr: &Manager<D, C>,
    bus: &SimBus,
) -> ! {
    loop {
        if bus.irq_asserted() {
            mgr.on_interrupt_deferred();
        }
        yield_now().await;
    }
}

/// Run `fut` to completion with the direct interrupt front-end live.
pub async fn with_bus<const D: usize, const C: usize, F: Future>(
    mgr: &Manager<D, C>,
    bus: &SimBus,
    fut: F,
) -> F::Output {
    match select(fut, pump(mgr, bus)).await {
        Either::First(out) => out,
        Either::Second(never) => never,
    }
}

/// Run `fut` to completion with the deferred front-end and its handler task.
pub async fn with_deferred_bus<const D: usize, const C: usize, F: Future>(
    mgr: &Manager<D, C>,
    bus: &SimBus,
    fut: F,
) -> F::Output {
    match select3(fut, pump_deferred(mgr, bus), mgr.run_deferred()).await {
        Either3::First(out) => out,
        Either3::Second(never) => never,
        Either3::Third(never) => never,
    }
}

/// A manager with `bus` already installed.
pub fn manager<const D: usize, const C: usize>(
    config: i2c_manager::Config,
    bus: &SimBus,
) -> Manager<D, C> {
    let mgr = Manager::<D, C>::new(config);
    mgr.init(bus.clone());
    mgr
}
