//! Memory map and MMIO dispatch.
//!
//! The bus owns everything the CPU can reach:
//!
//! | range | contents |
//! |---|---|
//! | `[0, display_start)` | general RAM |
//! | `[display_start, mem_size)` | framebuffer (stores update damage) |
//! | `0xFFFFF800 + 2 KiB` | boot ROM (read-only) |
//! | `0xFFFFFB00 + 1 KiB` | palette (writes mark full damage) |
//! | `0xFFFFFFC0...` | device registers |
//!
//! The palette and device registers shadow the tail of the ROM's
//! address window for data access; instruction fetch sees the whole ROM.
//!
//! The bus also owns the progress counter behind the machine's
//! busy-wait heuristic: reading the millisecond timer, or polling the
//! mouse register while the scancode FIFO is empty, marks the guest as
//! probably idle, and the machine's run loop yields once the budget of
//! such reads is spent.

use emu_core::Bus;
use wirth_risc5::ROM_START;

use crate::devices::{
    ClipboardDevice, DebugConsole, LedSink, MemoryMappedDevice, SerialDevice, SpiDevice,
};
use crate::display::{DisplayMode, DisplayState};
use crate::hardware::{Capabilities, HardwareEnum};
use crate::input::InputState;
use crate::rom::{self, ROM_WORDS};

/// Base of the device register bank.
pub const IO_START: u32 = 0xFFFF_FFC0;
/// Base of the palette window.
pub const PALETTE_START: u32 = 0xFFFF_FB00;

/// Idle-indicative reads tolerated per `run` before yielding.
const PROGRESS_BUDGET: u32 = 20;

/// The machine's bus.
pub struct OberonBus {
    /// Guest RAM including the framebuffer tail.
    pub ram: Vec<u32>,
    rom: [u32; ROM_WORDS],
    palette: [u32; 256],
    /// Byte address where the framebuffer window begins.
    display_start: u32,
    /// Byte size of RAM plus framebuffer.
    mem_size: u32,
    pub display: DisplayState,
    pub input: InputState,
    current_tick: u32,
    progress: u32,
    serial: Option<Box<dyn SerialDevice>>,
    spi: [Option<Box<dyn SpiDevice>>; 4],
    spi_select: u32,
    led: Option<Box<dyn LedSink>>,
    clipboard: Option<Box<dyn ClipboardDevice>>,
    hostfs: Option<Box<dyn MemoryMappedDevice>>,
    host_transfer: Option<Box<dyn MemoryMappedDevice>>,
    hw: HardwareEnum,
    console: DebugConsole,
    initial_clock: Option<u32>,
}

impl OberonBus {
    /// Build a bus for the given RAM size and mode table.
    #[must_use]
    pub fn new(megabytes_ram: u32, modes: Vec<DisplayMode>, dynamic: bool) -> Self {
        let mut bus = Self {
            ram: Vec::new(),
            rom: [0; ROM_WORDS],
            palette: [0; 256],
            display_start: 0,
            mem_size: 0,
            display: DisplayState::new(modes, dynamic),
            input: InputState::new(),
            current_tick: 0,
            progress: PROGRESS_BUDGET,
            serial: None,
            spi: [None, None, None, None],
            spi_select: 0,
            led: None,
            clipboard: None,
            hostfs: None,
            host_transfer: None,
            hw: HardwareEnum::new(),
            console: DebugConsole::new(),
            initial_clock: None,
        };
        bus.configure(megabytes_ram, None, None);
        bus
    }

    /// Reallocate RAM and (optionally) replace the mode table. Devices,
    /// palette and input state survive; RAM contents do not.
    pub fn configure(
        &mut self,
        megabytes_ram: u32,
        modes: Option<Vec<DisplayMode>>,
        dynamic: Option<bool>,
    ) {
        if let Some(modes) = modes {
            let dynamic = dynamic.unwrap_or(self.display.dynamic());
            self.display = DisplayState::new(modes, dynamic);
        }

        self.display_start = megabytes_ram << 20;
        let framebuffer_bytes = if self.display.dynamic() {
            2048 * 2048
        } else {
            self.display
                .modes()
                .iter()
                .map(DisplayMode::byte_size)
                .max()
                .unwrap_or(0)
        };
        self.mem_size = self.display_start + framebuffer_bytes;
        self.ram = vec![0; (self.mem_size / 4) as usize];

        self.rom = rom::boot_rom();
        rom::patch_memory_config(&mut self.rom, self.display_start, self.display_start / 2);
    }

    /// Byte address of the framebuffer window.
    #[must_use]
    pub fn display_start(&self) -> u32 {
        self.display_start
    }

    /// Byte size of the mapped memory.
    #[must_use]
    pub fn mem_size(&self) -> u32 {
        self.mem_size
    }

    /// The framebuffer window of RAM.
    #[must_use]
    pub fn framebuffer(&self) -> &[u32] {
        &self.ram[(self.display_start / 4) as usize..(self.mem_size / 4) as usize]
    }

    /// The palette.
    #[must_use]
    pub fn palette(&self) -> &[u32; 256] {
        &self.palette
    }

    /// The boot ROM.
    #[must_use]
    pub fn rom(&self) -> &[u32; ROM_WORDS] {
        &self.rom
    }

    /// Set the millisecond tick the guest reads from the timer register.
    pub fn set_time(&mut self, milliseconds: u32) {
        self.current_tick = milliseconds;
    }

    /// Advertise a wall-clock snapshot through the enumerator.
    pub fn set_initial_clock(&mut self, packed: u32) {
        self.initial_clock = Some(packed);
    }

    pub fn set_serial(&mut self, device: Box<dyn SerialDevice>) {
        self.serial = Some(device);
    }

    pub fn set_spi(&mut self, slot: usize, device: Box<dyn SpiDevice>) {
        if slot < self.spi.len() {
            self.spi[slot] = Some(device);
        }
    }

    pub fn set_led(&mut self, device: Box<dyn LedSink>) {
        self.led = Some(device);
    }

    pub fn set_clipboard(&mut self, device: Box<dyn ClipboardDevice>) {
        self.clipboard = Some(device);
    }

    pub fn set_hostfs(&mut self, device: Box<dyn MemoryMappedDevice>) {
        self.hostfs = Some(device);
    }

    pub fn set_host_transfer(&mut self, device: Box<dyn MemoryMappedDevice>) {
        self.host_transfer = Some(device);
    }

    /// Refill the busy-wait budget at the top of a `run`.
    pub fn reset_progress(&mut self) {
        self.progress = PROGRESS_BUDGET;
    }

    /// Whether the guest has spent its busy-wait budget.
    #[must_use]
    pub fn progress_exhausted(&self) -> bool {
        self.progress == 0
    }

    fn note_idle(&mut self) {
        self.progress = self.progress.saturating_sub(1);
    }

    fn io_read(&mut self, address: u32) -> u32 {
        if (PALETTE_START..PALETTE_START + 1024).contains(&address) {
            return self.palette[((address - PALETTE_START) / 4) as usize];
        }
        if address < IO_START {
            // The 2 KiB ROM window runs to the top of the address space;
            // the palette and register ranges take priority over its tail.
            if address >= ROM_START {
                return self.rom[((address - ROM_START) / 4) as usize];
            }
            return 0;
        }
        match address - IO_START {
            0 => {
                self.note_idle();
                self.current_tick
            }
            4 => self.input.switches,
            8 => self.serial.as_mut().map_or(0, |serial| serial.read_data()),
            12 => self
                .serial
                .as_mut()
                .map_or(0, |serial| serial.read_status()),
            16 => {
                let slot = (self.spi_select & 3) as usize;
                self.spi[slot].as_mut().map_or(255, |spi| spi.read_data())
            }
            20 => 1, // SPI receive always ready
            24 => {
                if self.input.has_keys() {
                    self.input.mouse() | 0x1000_0000
                } else {
                    self.note_idle();
                    self.input.mouse()
                }
            }
            28 => self.input.dequeue_key(),
            40 => self
                .clipboard
                .as_mut()
                .map_or(0, |clip| clip.read_control()),
            44 => self.clipboard.as_mut().map_or(0, |clip| clip.read_data()),
            48 => self.display.mode().index,
            60 => self.hw.read_next(),
            _ => 0,
        }
    }

    fn io_write(&mut self, address: u32, value: u32) {
        if (PALETTE_START..PALETTE_START + 1024).contains(&address) {
            self.palette[((address - PALETTE_START) / 4) as usize] = value;
            self.display.damage_all();
            return;
        }
        if address < IO_START {
            return; // ROM and unmapped space ignore stores
        }
        match address - IO_START {
            4 => {
                if let Some(led) = self.led.as_mut() {
                    led.write(value);
                }
            }
            8 => {
                if let Some(serial) = self.serial.as_mut() {
                    serial.write_data(value);
                }
            }
            16 => {
                let slot = (self.spi_select & 3) as usize;
                if let Some(spi) = self.spi[slot].as_mut() {
                    spi.write_data(value);
                }
            }
            20 => self.spi_select = value,
            32 => {
                if let Some(hostfs) = self.hostfs.as_mut() {
                    hostfs.write(&mut self.ram, value);
                }
                if let Some(transfer) = self.host_transfer.as_mut() {
                    transfer.write(&mut self.ram, value);
                }
            }
            36 => {
                if let Some(spi) = self.spi[1].as_mut() {
                    if spi.supports_paravirtual() {
                        spi.paravirtual_write(&mut self.ram, value);
                    }
                }
            }
            40 => {
                if let Some(clip) = self.clipboard.as_mut() {
                    clip.write_control(value);
                }
            }
            44 => {
                if let Some(clip) = self.clipboard.as_mut() {
                    clip.write_data(value);
                }
            }
            48 => {
                self.display.switch(value);
            }
            52 => self.console.write_byte(value as u8),
            60 => {
                let caps = Capabilities {
                    modes: self.display.modes(),
                    dynamic: self.display.dynamic(),
                    display_start: self.display_start,
                    initial_clock: self.initial_clock,
                    leds: self.led.is_some(),
                    serial: self.serial.is_some(),
                    spi: [
                        self.spi[0].is_some(),
                        self.spi[1].is_some(),
                        self.spi[2].is_some(),
                        self.spi[3].is_some(),
                    ],
                    paravirtual_disk: self.spi[1]
                        .as_ref()
                        .is_some_and(|spi| spi.supports_paravirtual()),
                    clipboard: self.clipboard.is_some(),
                    hostfs: self.hostfs.is_some(),
                    host_transfer: self.host_transfer.is_some(),
                };
                self.hw.query(value, &caps);
            }
            _ => {}
        }
    }
}

impl Bus for OberonBus {
    fn fetch(&mut self, word_index: u32) -> Option<u32> {
        if word_index < self.mem_size / 4 {
            return Some(self.ram[word_index as usize]);
        }
        let rom_base = ROM_START / 4;
        if (rom_base..rom_base + ROM_WORDS as u32).contains(&word_index) {
            return Some(self.rom[(word_index - rom_base) as usize]);
        }
        None
    }

    fn read_word(&mut self, address: u32) -> u32 {
        if address < self.mem_size {
            self.ram[(address / 4) as usize]
        } else {
            self.io_read(address)
        }
    }

    fn write_word(&mut self, address: u32, value: u32) {
        if address < self.display_start {
            self.ram[(address / 4) as usize] = value;
        } else if address < self.mem_size {
            self.ram[(address / 4) as usize] = value;
            self.display
                .update_damage(address / 4 - self.display_start / 4);
        } else {
            self.io_write(address, value);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_bus() -> OberonBus {
        OberonBus::new(
            1,
            vec![DisplayMode {
                index: 0,
                width: 1024,
                height: 768,
                depth: 1,
            }],
            false,
        )
    }

    #[test]
    fn memory_layout() {
        let bus = make_bus();
        assert_eq!(bus.display_start(), 1 << 20);
        // 1024x768 at 1 bpp = 98,304 framebuffer bytes
        assert_eq!(bus.mem_size(), (1 << 20) + 1024 * 768 / 8);
        assert_eq!(bus.framebuffer().len(), 1024 * 768 / 8 / 4);
    }

    #[test]
    fn ram_word_round_trip() {
        let mut bus = make_bus();
        bus.write_word(0x1000, 0xDEAD_BEEF);
        assert_eq!(bus.read_word(0x1000), 0xDEAD_BEEF);
    }

    #[test]
    fn framebuffer_store_updates_damage() {
        let mut bus = make_bus();
        let base = bus.display_start();
        bus.write_word(base, 0xFFFF_FFFF);
        let damage = bus.display.take_damage();
        assert_eq!((damage.x1, damage.y1, damage.x2, damage.y2), (0, 0, 0, 0));
    }

    #[test]
    fn palette_round_trip_and_full_damage() {
        let mut bus = make_bus();
        bus.display.take_damage(); // start clean
        bus.write_word(PALETTE_START + 8, 0x00FF_8800);
        assert_eq!(bus.read_word(PALETTE_START + 8), 0x00FF_8800);
        let damage = bus.display.take_damage();
        assert_eq!(damage.x1, 0);
        assert_eq!(damage.x2, bus.display.span() - 1);
        assert_eq!(damage.y2, 767);
    }

    #[test]
    fn rom_is_readable_and_write_protected() {
        let mut bus = make_bus();
        let word0 = bus.read_word(ROM_START);
        assert_eq!(word0, bus.rom()[0]);
        bus.write_word(ROM_START, 0x1234_5678);
        assert_eq!(bus.read_word(ROM_START), word0);
    }

    #[test]
    fn rom_tail_past_the_palette_window_is_readable() {
        let mut bus = make_bus();
        // The words between the end of the palette and the device
        // registers still belong to the ROM.
        let tail = PALETTE_START + 1024;
        assert_eq!(
            bus.read_word(tail),
            bus.rom()[((tail - ROM_START) / 4) as usize]
        );
        assert_eq!(
            bus.read_word(IO_START - 4),
            bus.rom()[((IO_START - 4 - ROM_START) / 4) as usize]
        );
        // The palette keeps priority over the ROM words it shadows.
        bus.write_word(PALETTE_START, 0x00AA_BBCC);
        assert_eq!(bus.read_word(PALETTE_START), 0x00AA_BBCC);
    }

    #[test]
    fn fetch_covers_ram_and_rom_only() {
        let mut bus = make_bus();
        bus.ram[5] = 0xAB;
        assert_eq!(bus.fetch(5), Some(0xAB));
        assert_eq!(bus.fetch(ROM_START / 4), Some(bus.rom()[0]));
        assert_eq!(bus.fetch(0x2000_0000), None);
    }

    #[test]
    fn timer_read_decrements_progress() {
        let mut bus = make_bus();
        bus.set_time(42);
        bus.reset_progress();
        for _ in 0..PROGRESS_BUDGET {
            assert!(!bus.progress_exhausted());
            assert_eq!(bus.read_word(IO_START), 42);
        }
        assert!(bus.progress_exhausted());
    }

    #[test]
    fn mouse_read_idles_only_when_fifo_empty() {
        let mut bus = make_bus();
        bus.input.mouse_moved(10, 20);
        bus.reset_progress();

        bus.input.keyboard_input(&[0x55]);
        let mouse = bus.read_word(IO_START + 24);
        assert_eq!(mouse & 0x1000_0000, 0x1000_0000);
        assert!(!bus.progress_exhausted());

        assert_eq!(bus.read_word(IO_START + 28), 0x55);
        for _ in 0..PROGRESS_BUDGET {
            let mouse = bus.read_word(IO_START + 24);
            assert_eq!(mouse & 0x1000_0000, 0);
        }
        assert!(bus.progress_exhausted());
    }

    #[test]
    fn unconfigured_devices_read_zero() {
        let mut bus = make_bus();
        assert_eq!(bus.read_word(IO_START + 8), 0); // serial data
        assert_eq!(bus.read_word(IO_START + 12), 0); // serial status
        assert_eq!(bus.read_word(IO_START + 40), 0); // clipboard
        // The SPI data line idles high instead: it is a pulled-up bus.
        assert_eq!(bus.read_word(IO_START + 16), 255);
    }

    #[test]
    fn spi_select_routes_to_slot() {
        struct Probe(u32);
        impl SpiDevice for Probe {
            fn read_data(&mut self) -> u32 {
                self.0
            }
            fn write_data(&mut self, value: u32) {
                self.0 = value;
            }
        }

        let mut bus = make_bus();
        bus.set_spi(1, Box::new(Probe(0x11)));
        bus.set_spi(2, Box::new(Probe(0x22)));

        bus.write_word(IO_START + 20, 1);
        assert_eq!(bus.read_word(IO_START + 16), 0x11);
        bus.write_word(IO_START + 20, 2);
        assert_eq!(bus.read_word(IO_START + 16), 0x22);
        bus.write_word(IO_START + 20, 0);
        assert_eq!(bus.read_word(IO_START + 16), 255); // empty slot
    }

    #[test]
    fn mode_register_reads_current_index() {
        let mut bus = make_bus();
        assert_eq!(bus.read_word(IO_START + 48), 0);
    }

    #[test]
    fn byte_access_through_containing_word() {
        let mut bus = make_bus();
        bus.write_word(0x200, 0x4433_2211);
        bus.write_byte(0x201, 0xAA);
        assert_eq!(bus.read_word(0x200), 0x4433_AA11);
        assert_eq!(bus.read_byte(0x203), 0x44);
    }
}
