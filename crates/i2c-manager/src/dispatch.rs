//! Interrupt front-ends.
//!
//! The state machine runs either straight from the controller interrupt
//! ([`I2cManager::on_interrupt`]) or from a handler task woken by a minimal
//! interrupt ([`I2cManager::on_interrupt_deferred`] plus
//! [`I2cManager::run_deferred`]). Both share [`I2cManager::drive`].

use embassy_futures::yield_now;
use embassy_sync::blocking_mutex::raw::RawMutex;
use portable_atomic::Ordering;

use crate::controller::Controller;
use crate::error::{status_code, Status};
use crate::manager::{Engine, I2cManager};
use crate::protocol::{Action, Machine, Phase};
use crate::transaction::{Completion, Request};

/// What one serviced interrupt did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Dispatch {
    /// The controller flag was not asserted; nothing was touched.
    pub spurious: bool,
    /// A request was taken off the queue on a fresh start condition.
    pub dequeued: bool,
    /// Status delivered to a waiting task.
    pub completed: Option<Status>,
    /// The next queued transaction was started right away.
    pub restarted: bool,
}

impl Dispatch {
    const SPURIOUS: Self = Self {
        spurious: true,
        dequeued: false,
        completed: None,
        restarted: false,
    };

    /// Whether this dispatch may have made a task ready: a request left the
    /// queue (freeing room for a blocked producer) or a completion was sent.
    pub fn woke_task(&self) -> bool {
        self.dequeued || self.completed.is_some()
    }
}

impl<M: RawMutex, C: Controller, const DEPTH: usize, const CLIENTS: usize>
    I2cManager<M, C, DEPTH, CLIENTS>
{
    /// Controller interrupt handler: runs one protocol phase to completion.
    pub fn on_interrupt(&self) -> Dispatch {
        self.engine.lock(|cell| {
            let mut engine = cell.borrow_mut();
            let Engine { hw, machine, current } = &mut *engine;
            let Some(hw) = hw.as_mut() else {
                return Dispatch::SPURIOUS;
            };
            let report = self.drive(hw, machine, current);
            hw.end_of_interrupt();
            report
        })
    }

    /// Minimal interrupt handler for the deferred front-end: gates the line
    /// and wakes [`run_deferred`](Self::run_deferred).
    ///
    /// Returns whether the interrupt was handed off.
    pub fn on_interrupt_deferred(&self) -> bool {
        self.engine.lock(|cell| {
            let mut engine = cell.borrow_mut();
            let Some(hw) = engine.hw.as_mut() else {
                return false;
            };
            let pending = hw.interrupt_pending();
            if pending {
                hw.mask_interrupt();
                self.irq.signal(());
            }
            hw.end_of_interrupt();
            pending
        })
    }

    /// Service the phase handed off by the deferred interrupt and reopen the
    /// line. Waits for the hand-off first.
    pub async fn service_deferred(&self) -> Dispatch {
        self.irq.wait().await;
        self.engine.lock(|cell| {
            let mut engine = cell.borrow_mut();
            let Engine { hw, machine, current } = &mut *engine;
            let Some(hw) = hw.as_mut() else {
                return Dispatch::SPURIOUS;
            };
            let report = self.drive(hw, machine, current);
            hw.unmask_interrupt();
            report
        })
    }

    /// Handler task body for the deferred front-end.
    pub async fn run_deferred(&self) -> ! {
        loop {
            let report = self.service_deferred().await;
            if report.woke_task() {
                yield_now().await;
            }
        }
    }

    /// Run one phase: decode, step the machine, apply its actions, deliver
    /// the completion and chain the next request.
    fn drive(
        &self,
        hw: &mut C,
        machine: &mut Machine,
        current: &mut Option<Request>,
    ) -> Dispatch {
        if !hw.interrupt_pending() {
            debug!("spurious i2c interrupt");
            return Dispatch::SPURIOUS;
        }

        let mut report = Dispatch::default();
        let status = hw.status();
        let phase = Phase::decode(status, || hw.read());
        trace!("i2c phase {=u8:#x}", phase.code());

        if phase == Phase::Start && current.is_none() {
            *current = self.queue.try_receive().ok();
            report.dequeued = current.is_some();
        }

        let Some(request) = current.as_mut() else {
            warn!("i2c phase {=u8:#x} with nothing in flight", phase.code());
            hw.clear_start();
            hw.stop();
            self.busy.store(false, Ordering::Release);
            hw.clear_interrupt();
            return report;
        };

        let step = machine.step(phase, &mut request.txn);
        for action in &step.actions {
            match *action {
                Action::Start => hw.start(),
                Action::ClearStart => hw.clear_start(),
                Action::Stop => hw.stop(),
                Action::Write(byte) => hw.write(byte),
                Action::Ack(ack) => hw.set_ack(ack),
            }
        }

        if let Some(status) = step.outcome {
            if status.is_err() {
                warn!(
                    "i2c {=u8:#x} from requester {} failed: {=u8:#x}",
                    request.txn.address,
                    request.requester_id,
                    status_code(&status)
                );
            }
            let completion = Completion {
                seq: request.seq,
                status,
                payload: request.txn.payload,
                received: machine.received(),
            };
            if let Some(slot) = self.slots.get(request.slot) {
                slot.signal(completion);
            }
            report.completed = Some(status);

            *current = self.queue.try_receive().ok();
            if current.is_some() {
                hw.start();
                report.restarted = true;
            } else {
                self.busy.store(false, Ordering::Release);
            }
        }

        hw.clear_interrupt();
        report
    }
}
