//! Top-level Oberon workstation.
//!
//! Owns the CPU and the bus, and exposes the host-facing surface: feed
//! input events, set the millisecond clock, run an instruction budget,
//! read the damage rectangle and framebuffer, repaint. The only
//! cross-thread input is the interrupt line; everything else must be
//! called from the driving thread between `run`s.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::{DateTime, Datelike, Local, Timelike};
use emu_core::Cpu;
use wirth_risc5::{Registers, Risc5};

use crate::bus::OberonBus;
use crate::config::OberonConfig;
use crate::devices::{
    ClipboardDevice, LedSink, MemoryMappedDevice, SerialDevice, SpiDevice,
};
use crate::display::{Damage, DisplayMode};

/// Shared interrupt request line. Cloning hands the line to another
/// thread (a UI timer); triggering latches a request the CPU samples at
/// the top of its next step.
#[derive(Clone)]
pub struct IrqLine(Arc<AtomicBool>);

impl IrqLine {
    fn new() -> Self {
        Self(Arc::new(AtomicBool::new(false)))
    }

    /// Latch an interrupt request.
    pub fn trigger(&self) {
        self.0.store(true, Ordering::Release);
    }

    fn take(&self) -> bool {
        self.0.swap(false, Ordering::AcqRel)
    }
}

/// The Oberon workstation.
pub struct Oberon {
    cpu: Risc5,
    bus: OberonBus,
    irq: IrqLine,
}

impl Oberon {
    /// Build a machine from the given configuration.
    pub fn new(config: &OberonConfig) -> Result<Self, String> {
        if !(1..=64).contains(&config.megabytes_ram) {
            return Err(format!(
                "RAM size must be 1-64 MiB, got {}",
                config.megabytes_ram
            ));
        }
        if config.modes.is_empty() {
            return Err("At least one display mode is required".into());
        }
        for mode in &config.modes {
            if !matches!(mode.depth, 1 | 4 | 8) {
                return Err(format!("Unsupported depth {}", mode.depth));
            }
            if mode.width % 32 != 0 || mode.width > 2048 || mode.height > 2048 {
                return Err(format!("Unsupported geometry {}x{}", mode.width, mode.height));
            }
        }

        let mut bus = OberonBus::new(
            config.megabytes_ram,
            config.modes.clone(),
            config.dynamic_display,
        );
        if config.rtc {
            bus.set_initial_clock(pack_clock(&Local::now()));
        }

        Ok(Self {
            cpu: Risc5::new(),
            bus,
            irq: IrqLine::new(),
        })
    }

    /// Reallocate RAM and replace the mode table. The palette, devices
    /// and disk survive; RAM contents do not.
    pub fn configure_memory(&mut self, megabytes_ram: u32, modes: Vec<DisplayMode>, dynamic: bool) {
        self.bus.configure(megabytes_ram, Some(modes), Some(dynamic));
        self.cpu.reset();
    }

    /// Return the PC to the boot ROM. RAM, palette, disk and interrupt
    /// enable all keep their state.
    pub fn reset(&mut self) {
        self.cpu.reset();
    }

    /// Latch an interrupt request from the driving thread.
    pub fn trigger_interrupt(&self) {
        self.irq.trigger();
    }

    /// A clonable handle for asserting interrupts from other threads.
    #[must_use]
    pub fn irq_line(&self) -> IrqLine {
        self.irq.clone()
    }

    /// Execute up to `cycles` instructions. Returns the number actually
    /// executed; the run ends early once the guest has spent its
    /// busy-wait budget, turning tight idle loops into a frame-long nap.
    pub fn run(&mut self, cycles: u32) -> u32 {
        self.bus.reset_progress();
        for executed in 0..cycles {
            if self.irq.take() {
                self.cpu.interrupt();
            }
            self.cpu.step(&mut self.bus);
            if self.bus.progress_exhausted() {
                return executed + 1;
            }
        }
        cycles
    }

    /// Set the millisecond tick visible in the timer register.
    pub fn set_time(&mut self, milliseconds: u32) {
        self.bus.set_time(milliseconds);
    }

    pub fn mouse_moved(&mut self, x: i32, y: i32) {
        self.bus.input.mouse_moved(x, y);
    }

    pub fn mouse_button(&mut self, button: u32, down: bool) {
        self.bus.input.mouse_button(button, down);
    }

    pub fn keyboard_input(&mut self, scancodes: &[u8]) {
        self.bus.input.keyboard_input(scancodes);
    }

    /// Record the host window size for seamless display switches.
    pub fn size_hint(&mut self, width: u32, height: u32) {
        self.bus.display.set_size_hint(width, height);
    }

    pub fn set_switches(&mut self, value: u32) {
        self.bus.input.switches = value;
    }

    /// The framebuffer window of RAM.
    #[must_use]
    pub fn framebuffer(&self) -> &[u32] {
        self.bus.framebuffer()
    }

    /// The palette.
    #[must_use]
    pub fn palette(&self) -> &[u32; 256] {
        self.bus.palette()
    }

    /// The current display mode and whether it follows the host's size
    /// hint.
    #[must_use]
    pub fn display_mode(&self) -> (DisplayMode, bool) {
        (self.bus.display.mode(), self.bus.display.seamless())
    }

    /// Read and reset the damage rectangle.
    pub fn take_damage(&mut self) -> Damage {
        self.bus.display.take_damage()
    }

    pub fn set_serial(&mut self, device: Box<dyn SerialDevice>) {
        self.bus.set_serial(device);
    }

    pub fn set_spi(&mut self, slot: usize, device: Box<dyn SpiDevice>) {
        self.bus.set_spi(slot, device);
    }

    pub fn set_led(&mut self, device: Box<dyn LedSink>) {
        self.bus.set_led(device);
    }

    pub fn set_clipboard(&mut self, device: Box<dyn ClipboardDevice>) {
        self.bus.set_clipboard(device);
    }

    pub fn set_hostfs(&mut self, device: Box<dyn MemoryMappedDevice>) {
        self.bus.set_hostfs(device);
    }

    pub fn set_host_transfer(&mut self, device: Box<dyn MemoryMappedDevice>) {
        self.bus.set_host_transfer(device);
    }

    /// Reference to the CPU.
    #[must_use]
    pub fn cpu(&self) -> &Risc5 {
        &self.cpu
    }

    /// Mutable reference to the CPU.
    pub fn cpu_mut(&mut self) -> &mut Risc5 {
        &mut self.cpu
    }

    /// CPU register snapshot.
    #[must_use]
    pub fn registers(&self) -> Registers {
        self.cpu.registers()
    }

    /// Reference to the bus.
    #[must_use]
    pub fn bus(&self) -> &OberonBus {
        &self.bus
    }

    /// Mutable reference to the bus.
    pub fn bus_mut(&mut self) -> &mut OberonBus {
        &mut self.bus
    }
}

/// Pack a wall-clock snapshot the way the guest decodes it:
/// `(((year%100)*16 + month) * 32 + day) * 32*64*64 + hour*64*64 +
/// minute*64 + second`.
#[must_use]
pub fn pack_clock(time: &DateTime<Local>) -> u32 {
    // Wrapping like the hardware register: years late in the century
    // spill out of the top bits.
    (((time.year() as u32 % 100) * 16 + time.month()) * 32 + time.day())
        .wrapping_mul(32 * 64 * 64)
        .wrapping_add(time.hour() * 64 * 64)
        .wrapping_add(time.minute() * 64)
        .wrapping_add(time.second())
}
