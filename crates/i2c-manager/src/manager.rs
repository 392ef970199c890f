use core::cell::RefCell;

use embassy_sync::blocking_mutex::raw::RawMutex;
use embassy_sync::blocking_mutex::Mutex;
use embassy_sync::channel::Channel;
use embassy_sync::signal::Signal;
use embassy_time::{with_timeout, Timer};
use portable_atomic::{AtomicBool, AtomicUsize, Ordering};

use crate::config::Config;
use crate::controller::Controller;
use crate::error::{Error, Status};
use crate::protocol::Machine;
use crate::transaction::{Completion, Descriptor, Opcode, Request};

/// Highest 7-bit slave address.
const MAX_ADDRESS: u8 = 0x7F;

/// Source of manager identities. Zero means "not assigned yet".
static NEXT_OWNER: AtomicUsize = AtomicUsize::new(1);

/// Everything the interrupt side owns: the controller, the protocol state and
/// the request currently on the wire.
pub(crate) struct Engine<C> {
    pub hw: Option<C>,
    pub machine: Machine,
    pub current: Option<Request>,
}

/// Queued SMBus transaction manager.
///
/// Tasks call the per-opcode methods with their own [`Descriptor`]; requests
/// are queued in arrival order (up to `DEPTH`) and driven one at a time by
/// the interrupt front-end ([`on_interrupt`](Self::on_interrupt) or the
/// deferred pair). `CLIENTS` bounds how many descriptors can be handed out.
///
/// Everything is const-constructible so the manager can live in a `static`:
///
/// ```ignore
/// static I2C: I2cManager<CriticalSectionRawMutex, I2c0, 4, 4> =
///     I2cManager::new(Config::new());
/// ```
pub struct I2cManager<
    M: RawMutex,
    C: Controller,
    const DEPTH: usize,
    const CLIENTS: usize,
> {
    pub(crate) config: Config,
    pub(crate) queue: Channel<M, Request, DEPTH>,
    pub(crate) slots: [Signal<M, Completion>; CLIENTS],
    /// Set from task context when it starts an idle controller, cleared by
    /// the engine when the queue runs dry.
    pub(crate) busy: AtomicBool,
    pub(crate) next_slot: AtomicUsize,
    /// Identity stamped on every descriptor handed out, assigned on first
    /// use.
    pub(crate) owner: AtomicUsize,
    /// Hand-off from the deferred interrupt to the handler task.
    pub(crate) irq: Signal<M, ()>,
    pub(crate) engine: Mutex<M, RefCell<Engine<C>>>,
}

impl<M: RawMutex, C: Controller, const DEPTH: usize, const CLIENTS: usize>
    I2cManager<M, C, DEPTH, CLIENTS>
{
    /// An uninitialized manager; call [`init`](Self::init) before use.
    pub const fn new(config: Config) -> Self {
        Self {
            config,
            queue: Channel::new(),
            slots: [const { Signal::new() }; CLIENTS],
            busy: AtomicBool::new(false),
            next_slot: AtomicUsize::new(0),
            owner: AtomicUsize::new(0),
            irq: Signal::new(),
            engine: Mutex::new(RefCell::new(Engine {
                hw: None,
                machine: Machine::new(),
                current: None,
            })),
        }
    }

    /// Bring up the controller and take ownership of it.
    ///
    /// Must run before any transaction. The interrupt handler must be wired
    /// to [`on_interrupt`](Self::on_interrupt) or
    /// [`on_interrupt_deferred`](Self::on_interrupt_deferred) beforehand.
    pub fn init(&self, mut controller: C) {
        self.engine.lock(|cell| {
            let mut engine = cell.borrow_mut();
            controller.enable();
            engine.hw = Some(controller);
            engine.machine = Machine::new();
            engine.current = None;
            self.busy.store(false, Ordering::Release);
        });
        info!("i2c manager up: queue depth {}, {} clients", DEPTH, CLIENTS);
    }

    /// Hand out a descriptor bound to the next free completion slot.
    ///
    /// Returns `None` once all `CLIENTS` slots are taken.
    pub fn descriptor(&self, requester_id: u8) -> Option<Descriptor> {
        let owner = self.owner();
        self.next_slot
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| {
                (n < CLIENTS).then_some(n + 1)
            })
            .ok()
            .map(|slot| Descriptor::new(requester_id, owner, slot))
    }

    fn owner(&self) -> usize {
        let current = self.owner.load(Ordering::Acquire);
        if current != 0 {
            return current;
        }
        let fresh = NEXT_OWNER.fetch_add(1, Ordering::Relaxed);
        match self.owner.compare_exchange(
            0,
            fresh,
            Ordering::AcqRel,
            Ordering::Acquire,
        ) {
            Ok(_) => fresh,
            Err(assigned) => assigned,
        }
    }

    /// Whether a transaction currently owns the controller.
    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }

    /// Timing configuration this manager was built with.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Address-only transaction. `data` is kept on the descriptor for
    /// diagnostics; the address always goes out in write direction.
    pub async fn quick(
        &self,
        desc: &mut Descriptor,
        address: u8,
        data: u8,
    ) -> Status {
        self.transact(desc, Opcode::Quick, address, 0, [data, 0]).await
    }

    /// Write one byte without a command.
    pub async fn send_byte(
        &self,
        desc: &mut Descriptor,
        address: u8,
        data: u8,
    ) -> Status {
        self.transact(desc, Opcode::SendByte, address, 0, [data, 0]).await
    }

    /// Read one byte without a command. The result is in
    /// [`Descriptor::byte`].
    pub async fn receive_byte(
        &self,
        desc: &mut Descriptor,
        address: u8,
    ) -> Status {
        self.transact(desc, Opcode::ReceiveByte, address, 0, [0; 2]).await
    }

    /// Write one byte to register `command`.
    pub async fn write_byte(
        &self,
        desc: &mut Descriptor,
        address: u8,
        command: u8,
        data: u8,
    ) -> Status {
        self.transact(desc, Opcode::WriteByte, address, command, [data, 0])
            .await
    }

    /// Read one byte from register `command`.
    pub async fn read_byte(
        &self,
        desc: &mut Descriptor,
        address: u8,
        command: u8,
    ) -> Status {
        self.transact(desc, Opcode::ReadByte, address, command, [0; 2]).await
    }

    /// Write `data` to register `command`, low byte first.
    pub async fn write_word(
        &self,
        desc: &mut Descriptor,
        address: u8,
        command: u8,
        data: u16,
    ) -> Status {
        self.transact(
            desc,
            Opcode::WriteWord,
            address,
            command,
            data.to_le_bytes(),
        )
        .await
    }

    /// Read a little-endian word from register `command`. The result is in
    /// [`Descriptor::word`].
    pub async fn read_word(
        &self,
        desc: &mut Descriptor,
        address: u8,
        command: u8,
    ) -> Status {
        self.transact(desc, Opcode::ReadWord, address, command, [0; 2]).await
    }

    async fn transact(
        &self,
        desc: &mut Descriptor,
        opcode: Opcode,
        address: u8,
        command: u8,
        payload: [u8; 2],
    ) -> Status {
        desc.prepare(opcode, address, command, payload);
        if address > MAX_ADDRESS {
            desc.set_status(Err(Error::InvalidAddress));
            return desc.status();
        }
        self.submit(desc).await
    }

    /// Queue the prepared descriptor, start the controller if it is idle and
    /// wait for the completion.
    ///
    /// A timeout does not cancel the transaction; it keeps running and its
    /// late completion is discarded by sequence number.
    async fn submit(&self, desc: &mut Descriptor) -> Status {
        let index = desc.slot();
        let owned = desc.owner() == self.owner.load(Ordering::Acquire);
        let Some(slot) = self.slots.get(index).filter(|_| owned) else {
            warn!(
                "i2c requester {} used a foreign descriptor",
                desc.requester_id()
            );
            desc.set_status(Err(Error::ForeignDescriptor));
            return desc.status();
        };
        if !self.initialized() {
            desc.set_status(Err(Error::NotInitialized));
            return desc.status();
        }

        let request = desc.arm();
        let seq = request.seq;
        slot.reset();

        if self.queue.try_send(request).is_err() {
            warn!("i2c queue full, requester {} rejected", desc.requester_id());
            desc.set_status(Err(Error::Overloaded));
            return desc.status();
        }

        self.kick();

        let completion = async {
            loop {
                let completion = slot.wait().await;
                if completion.seq == seq {
                    break completion;
                }
                debug!(
                    "slot {}: dropping stale completion {} (want {})",
                    index,
                    completion.seq,
                    seq
                );
            }
        };

        match with_timeout(self.config.completion_timeout, completion).await {
            Ok(completion) => desc.complete(completion),
            Err(_) => {
                warn!(
                    "i2c requester {} timed out at {=u8:#x}",
                    desc.requester_id(),
                    desc.address()
                );
                desc.set_status(Err(Error::Timeout));
            }
        }

        let status = desc.status();
        if let Err(e) = status {
            if e.is_bus_failure() || e == Error::Timeout {
                debug!("i2c status {=u8:#x}, settling bus", e.code());
                Timer::after(self.config.recovery_delay).await;
            }
        }
        status
    }

    /// Start the controller unless a transaction already owns it.
    fn kick(&self) {
        self.engine.lock(|cell| {
            let mut engine = cell.borrow_mut();
            if self.busy.load(Ordering::Acquire) {
                return;
            }
            if let Some(hw) = engine.hw.as_mut() {
                hw.start();
                self.busy.store(true, Ordering::Release);
            }
        });
    }

    fn initialized(&self) -> bool {
        self.engine.lock(|cell| cell.borrow().hw.is_some())
    }
}
