#![no_std]
//! NXP LPC2103 backend for `i2c-manager`.
//!
//! [`I2c0`] drives the I2C0 block in master mode and gates its line at the
//! vectored interrupt controller (VIC), channel 9. Wire the VIC slot to a
//! handler that calls `I2cManager::on_interrupt` (or
//! `on_interrupt_deferred`) on the manager owning this controller:
//!
//! ```ignore
//! static I2C: I2cManager<CriticalSectionRawMutex, I2c0, 4, 4> =
//!     I2cManager::new(i2c_manager::Config::new());
//!
//! extern "C" fn i2c0_isr() {
//!     I2C.on_interrupt();
//! }
//!
//! let config = lpc2103_i2c::Config::new().handler(i2c0_isr);
//! I2C.init(unsafe { I2c0::new(config) });
//! ```

use core::ptr;

use i2c_manager::Controller;

pub const I2C0_BASE: usize = 0xE001_C000;
pub const VIC_BASE: usize = 0xFFFF_F000;
pub const PINSEL0: usize = 0xE002_C000;

/// VIC channel of I2C0.
pub const I2C0_CHANNEL: u32 = 9;

/// I2C0 register offsets.
mod i2c {
    pub const CONSET: usize = 0x00;
    pub const STAT: usize = 0x04;
    pub const DAT: usize = 0x08;
    pub const SCLH: usize = 0x10;
    pub const SCLL: usize = 0x14;
    pub const CONCLR: usize = 0x18;
}

/// VIC register offsets.
mod vic {
    pub const INT_ENABLE: usize = 0x010;
    pub const INT_EN_CLEAR: usize = 0x014;
    pub const VECT_ADDR: usize = 0x030;
    pub const VECT_ADDR_N: usize = 0x100;
    pub const VECT_CNTL_N: usize = 0x200;
}

/// I2CONSET bits; I2CONCLR clears the same positions.
const AA: u32 = 0x04;
const SI: u32 = 0x08;
const STO: u32 = 0x10;
const STA: u32 = 0x20;
const I2EN: u32 = 0x40;

/// VICVectCntl slot enable.
const VECT_ENABLE: u32 = 0x20;

/// P0.2 = SCL0, P0.3 = SDA0.
const PINSEL0_I2C_MASK: u32 = 0xF0;
const PINSEL0_I2C: u32 = 0x50;

/// Low three I2STAT bits always read zero.
const STAT_MASK: u32 = 0xF8;

/// Peripheral clock of the reference board (14.7456 MHz crystal, PLL x4).
const PCLK_HZ: u32 = 58_982_400;
const STANDARD_MODE_HZ: u32 = 100_000;

#[derive(Debug, Clone, Copy)]
pub struct Config {
    pub pclk_hz: u32,
    /// SCL frequency; high and low periods are kept equal.
    pub scl_hz: u32,
    /// VIC vectored slot (0..=15) the handler is installed in.
    pub vector_slot: u8,
    pub handler: Option<extern "C" fn()>,
}

impl Config {
    pub const fn new() -> Self {
        Self {
            pclk_hz: PCLK_HZ,
            scl_hz: STANDARD_MODE_HZ,
            vector_slot: 1,
            handler: None,
        }
    }

    #[must_use]
    pub const fn scl_hz(mut self, hz: u32) -> Self {
        self.scl_hz = hz;
        self
    }

    #[must_use]
    pub const fn pclk_hz(mut self, hz: u32) -> Self {
        self.pclk_hz = hz;
        self
    }

    #[must_use]
    pub const fn vector_slot(mut self, slot: u8) -> Self {
        self.vector_slot = slot & 0x0F;
        self
    }

    #[must_use]
    pub const fn handler(mut self, handler: extern "C" fn()) -> Self {
        self.handler = Some(handler);
        self
    }

    /// I2SCLH / I2SCLL value, rounded to nearest.
    pub const fn scl_divider(&self) -> u32 {
        let period = 2 * self.scl_hz;
        (self.pclk_hz + period / 2) / period
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}

/// The I2C0 controller in master mode.
pub struct I2c0 {
    i2c: *mut u32,
    vic: *mut u32,
    pinsel: *mut u32,
    config: Config,
}

// SAFETY: the register blocks are fixed MMIO owned by this value; the manager
// serializes every access behind its mutex.
unsafe impl Send for I2c0 {}

impl I2c0 {
    /// # Safety
    ///
    /// Nothing else may touch I2C0, its VIC slot or PINSEL0 bits [7:4] while
    /// this value exists.
    pub unsafe fn new(config: Config) -> Self {
        unsafe {
            Self::from_raw(
                I2C0_BASE as *mut u32,
                VIC_BASE as *mut u32,
                PINSEL0 as *mut u32,
                config,
            )
        }
    }

    /// Build the controller over explicit register blocks.
    ///
    /// # Safety
    ///
    /// Each pointer must be valid for volatile access over its block (I2C0:
    /// 0x1C bytes, VIC: 0x240 bytes, PINSEL0: 4 bytes) for the lifetime of
    /// the value, with no other accessor.
    pub unsafe fn from_raw(
        i2c: *mut u32,
        vic: *mut u32,
        pinsel: *mut u32,
        config: Config,
    ) -> Self {
        Self { i2c, vic, pinsel, config }
    }

    /// Settings the controller was brought up with.
    pub fn config(&self) -> &Config {
        &self.config
    }

    fn i2c_read(&self, offset: usize) -> u32 {
        // SAFETY: offset is one of the I2C0 register offsets, covered by the
        // contract of `from_raw`.
        unsafe { ptr::read_volatile(self.i2c.byte_add(offset)) }
    }

    fn i2c_write(&mut self, offset: usize, value: u32) {
        // SAFETY: as in `i2c_read`.
        unsafe { ptr::write_volatile(self.i2c.byte_add(offset), value) }
    }

    fn vic_read(&self, offset: usize) -> u32 {
        // SAFETY: offset lies within the VIC block, see `from_raw`.
        unsafe { ptr::read_volatile(self.vic.byte_add(offset)) }
    }

    fn vic_write(&mut self, offset: usize, value: u32) {
        // SAFETY: as in `vic_read`.
        unsafe { ptr::write_volatile(self.vic.byte_add(offset), value) }
    }
}

impl Controller for I2c0 {
    fn enable(&mut self) {
        // SAFETY: PINSEL0 pointer is valid per `from_raw`.
        unsafe {
            let sel = ptr::read_volatile(self.pinsel);
            ptr::write_volatile(
                self.pinsel,
                (sel & !PINSEL0_I2C_MASK) | PINSEL0_I2C,
            );
        }

        self.i2c_write(i2c::CONCLR, AA | SI | STA | I2EN);
        let divider = self.config.scl_divider();
        self.i2c_write(i2c::SCLH, divider);
        self.i2c_write(i2c::SCLL, divider);
        self.i2c_write(i2c::CONSET, I2EN);
        self.i2c_write(i2c::CONCLR, SI);

        if let Some(handler) = self.config.handler {
            let slot = usize::from(self.config.vector_slot & 0x0F) * 4;
            self.vic_write(vic::VECT_ADDR_N + slot, handler as usize as u32);
            self.vic_write(vic::VECT_CNTL_N + slot, VECT_ENABLE | I2C0_CHANNEL);
        }
        self.vic_write(vic::INT_ENABLE, 1 << I2C0_CHANNEL);

        #[cfg(feature = "defmt")]
        defmt::debug!("I2C0 enabled, SCL divider {}", divider);
    }

    fn interrupt_pending(&mut self) -> bool {
        self.i2c_read(i2c::CONSET) & SI != 0
    }

    fn status(&mut self) -> u8 {
        (self.i2c_read(i2c::STAT) & STAT_MASK) as u8
    }

    fn start(&mut self) {
        self.i2c_write(i2c::CONSET, STA);
    }

    fn clear_start(&mut self) {
        self.i2c_write(i2c::CONCLR, STA);
    }

    fn stop(&mut self) {
        self.i2c_write(i2c::CONSET, STO);
    }

    fn set_ack(&mut self, ack: bool) {
        if ack {
            self.i2c_write(i2c::CONSET, AA);
        } else {
            self.i2c_write(i2c::CONCLR, AA);
        }
    }

    fn write(&mut self, byte: u8) {
        self.i2c_write(i2c::DAT, u32::from(byte));
    }

    fn read(&mut self) -> u8 {
        self.i2c_read(i2c::DAT) as u8
    }

    fn clear_interrupt(&mut self) {
        self.i2c_write(i2c::CONCLR, SI);
    }

    fn mask_interrupt(&mut self) {
        self.vic_write(vic::INT_EN_CLEAR, 1 << I2C0_CHANNEL);
    }

    fn unmask_interrupt(&mut self) {
        self.vic_write(vic::INT_ENABLE, 1 << I2C0_CHANNEL);
    }

    fn end_of_interrupt(&mut self) {
        self.vic_write(vic::VECT_ADDR, 0);
    }
}
