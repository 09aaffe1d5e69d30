//! Structured hardware enumerator.
//!
//! The guest probes the machine by writing a FourCC to the enumerator
//! register and reading the response back word by word until a zero
//! marks the end. Query 0 lists the root capability set: a version word
//! followed by one FourCC per present capability. Each capability then
//! answers its own FourCC with a fixed descriptor, mostly register
//! addresses (MMIO addresses read back as small negative numbers) and
//! geometry.
//!
//! Descriptors are emitted only for configured capabilities; probing an
//! absent one reads 0 immediately.

use crate::bus::{IO_START, PALETTE_START};
use crate::display::DisplayMode;
use wirth_risc5::ROM_START;

/// Build a FourCC tag: `(a<<24)|(b<<16)|(c<<8)|d`.
#[must_use]
pub const fn fourcc(tag: &[u8; 4]) -> u32 {
    (tag[0] as u32) << 24 | (tag[1] as u32) << 16 | (tag[2] as u32) << 8 | tag[3] as u32
}

const CAP_MONO_VID: u32 = fourcc(b"mVid");
const CAP_MONO_DYN: u32 = fourcc(b"mDyn");
const CAP_COLOR4_VID: u32 = fourcc(b"16cV");
const CAP_COLOR4_DYN: u32 = fourcc(b"16cD");
const CAP_COLOR8_VID: u32 = fourcc(b"8bcV");
const CAP_COLOR8_DYN: u32 = fourcc(b"8bcD");
const CAP_TIMER: u32 = fourcc(b"Timr");
const CAP_SWITCHES: u32 = fourcc(b"Swtc");
const CAP_LEDS: u32 = fourcc(b"LEDs");
const CAP_SERIAL: u32 = fourcc(b"SPrt");
const CAP_SPI: u32 = fourcc(b"SPIf");
const CAP_SDCARD: u32 = fourcc(b"SDCr");
const CAP_WIZNET: u32 = fourcc(b"wNet");
const CAP_MOUSE_KBD: u32 = fourcc(b"MsKb");
const CAP_CLIPBOARD: u32 = fourcc(b"vClp");
const CAP_PV_DISK: u32 = fourcc(b"vDsk");
const CAP_HOSTFS: u32 = fourcc(b"HsFs");
const CAP_HOST_TRANSFER: u32 = fourcc(b"vHTx");
const CAP_DEBUG_CONSOLE: u32 = fourcc(b"DbgC");
const CAP_RESET: u32 = fourcc(b"Rset");
const CAP_RTC: u32 = fourcc(b"vRTC");

const REG_TIMER: u32 = IO_START;
const REG_SWITCHES: u32 = IO_START + 4;
const REG_SERIAL_DATA: u32 = IO_START + 8;
const REG_SERIAL_STATUS: u32 = IO_START + 12;
const REG_SPI_DATA: u32 = IO_START + 16;
const REG_SPI_CONTROL: u32 = IO_START + 20;
const REG_MOUSE: u32 = IO_START + 24;
const REG_KEYBOARD: u32 = IO_START + 28;
const REG_HOSTFS: u32 = IO_START + 32;
const REG_PV_DISK: u32 = IO_START + 36;
const REG_CLIP_CONTROL: u32 = IO_START + 40;
const REG_CLIP_DATA: u32 = IO_START + 44;
const REG_MODE_SWITCH: u32 = IO_START + 48;
const REG_DEBUG_CONSOLE: u32 = IO_START + 52;

/// Snapshot of what the machine actually has configured; the enumerator
/// answers from this.
pub struct Capabilities<'a> {
    pub modes: &'a [DisplayMode],
    pub dynamic: bool,
    pub display_start: u32,
    pub initial_clock: Option<u32>,
    pub leds: bool,
    pub serial: bool,
    pub spi: [bool; 4],
    pub paravirtual_disk: bool,
    pub clipboard: bool,
    pub hostfs: bool,
    pub host_transfer: bool,
}

/// Enumerator response buffer with its read cursor.
pub struct HardwareEnum {
    buf: [u32; 24],
    cnt: usize,
    idx: usize,
}

impl HardwareEnum {
    #[must_use]
    pub fn new() -> Self {
        Self {
            buf: [0; 24],
            cnt: 0,
            idx: 0,
        }
    }

    /// Read the next response word; 0 once the descriptor is drained.
    pub fn read_next(&mut self) -> u32 {
        if self.idx < self.cnt {
            let word = self.buf[self.idx];
            self.idx += 1;
            word
        } else {
            0
        }
    }

    fn push(&mut self, word: u32) {
        // The response buffer is as big as the hardware's; overflow
        // truncates exactly like the real enumerator would.
        if self.cnt < self.buf.len() {
            self.buf[self.cnt] = word;
            self.cnt += 1;
        }
    }

    /// Begin answering a query. Query 0 is the root capability list;
    /// everything else is a capability FourCC.
    pub fn query(&mut self, id: u32, caps: &Capabilities) {
        self.cnt = 0;
        self.idx = 0;

        let has_static = |depth: u32| caps.modes.iter().any(|m| m.depth == depth);

        match id {
            0 => {
                self.push(1); // enumerator version
                if has_static(1) {
                    self.push(CAP_MONO_VID);
                }
                if caps.dynamic {
                    self.push(CAP_MONO_DYN);
                }
                if has_static(4) {
                    self.push(CAP_COLOR4_VID);
                }
                if caps.dynamic {
                    self.push(CAP_COLOR4_DYN);
                }
                if has_static(8) {
                    self.push(CAP_COLOR8_VID);
                }
                if caps.dynamic {
                    self.push(CAP_COLOR8_DYN);
                }
                self.push(CAP_TIMER);
                self.push(CAP_SWITCHES);
                if caps.leds {
                    self.push(CAP_LEDS);
                }
                if caps.serial {
                    self.push(CAP_SERIAL);
                }
                if caps.spi.iter().any(|&populated| populated) {
                    self.push(CAP_SPI);
                }
                self.push(CAP_MOUSE_KBD);
                if caps.clipboard {
                    self.push(CAP_CLIPBOARD);
                }
                if caps.paravirtual_disk {
                    self.push(CAP_PV_DISK);
                }
                if caps.hostfs {
                    self.push(CAP_HOSTFS);
                }
                if caps.host_transfer {
                    self.push(CAP_HOST_TRANSFER);
                }
                self.push(CAP_DEBUG_CONSOLE);
                self.push(CAP_RESET);
                if caps.initial_clock.is_some() {
                    self.push(CAP_RTC);
                }
            }
            id if id == CAP_MONO_VID && has_static(1) => {
                self.static_modes(caps, 1);
            }
            id if id == CAP_COLOR4_VID && has_static(4) => {
                self.static_modes(caps, 4);
            }
            id if id == CAP_COLOR8_VID && has_static(8) => {
                self.static_modes(caps, 8);
            }
            id if id == CAP_MONO_DYN && caps.dynamic => {
                self.dynamic_modes(caps);
            }
            id if (id == CAP_COLOR4_DYN || id == CAP_COLOR8_DYN) && caps.dynamic => {
                self.dynamic_modes(caps);
                self.push(PALETTE_START);
            }
            id if id == CAP_TIMER => self.push(REG_TIMER),
            id if id == CAP_SWITCHES => {
                self.push(1);
                self.push(REG_SWITCHES);
            }
            id if id == CAP_LEDS && caps.leds => {
                self.push(8);
                self.push(REG_SWITCHES);
            }
            id if id == CAP_SERIAL && caps.serial => {
                self.push(1);
                self.push(REG_SERIAL_STATUS);
                self.push(REG_SERIAL_DATA);
            }
            id if id == CAP_SPI && caps.spi.iter().any(|&populated| populated) => {
                self.push(REG_SPI_CONTROL);
                self.push(REG_SPI_DATA);
                if caps.spi[1] {
                    self.push(CAP_SDCARD);
                }
                if caps.spi[2] {
                    self.push(CAP_WIZNET);
                }
            }
            id if id == CAP_MOUSE_KBD => {
                self.push(REG_MOUSE);
                self.push(REG_KEYBOARD);
            }
            id if id == CAP_CLIPBOARD && caps.clipboard => {
                self.push(REG_CLIP_CONTROL);
                self.push(REG_CLIP_DATA);
            }
            id if id == CAP_PV_DISK && caps.paravirtual_disk => self.push(REG_PV_DISK),
            id if id == CAP_HOSTFS && caps.hostfs => self.push(REG_HOSTFS),
            id if id == CAP_HOST_TRANSFER && caps.host_transfer => self.push(REG_HOSTFS),
            id if id == CAP_DEBUG_CONSOLE => self.push(REG_DEBUG_CONSOLE),
            id if id == CAP_RESET => self.push(ROM_START),
            id if id == CAP_RTC => {
                if let Some(clock) = caps.initial_clock {
                    self.push(0);
                    self.push(clock);
                }
            }
            _ => {}
        }
    }

    /// Static mode list: count, switch register, the palette base for
    /// color depths, then geometry per mode of the given depth.
    fn static_modes(&mut self, caps: &Capabilities, depth: u32) {
        let matching: Vec<&DisplayMode> =
            caps.modes.iter().filter(|m| m.depth == depth).collect();
        self.push(matching.len() as u32);
        self.push(REG_MODE_SWITCH);
        if depth > 1 {
            self.push(PALETTE_START);
        }
        for mode in matching {
            self.push(mode.width);
            self.push(mode.height);
            self.push(mode.width * depth / 8);
            self.push(caps.display_start);
        }
    }

    /// Dynamic mode descriptor: switch register, maximum geometry,
    /// size increments, the "span follows the mode" sentinel, the
    /// framebuffer base, and the seamless-support flag.
    fn dynamic_modes(&mut self, caps: &Capabilities) {
        self.push(REG_MODE_SWITCH);
        self.push(2048);
        self.push(2048);
        self.push(32);
        self.push(1);
        self.push(-1i32 as u32);
        self.push(caps.display_start);
        self.push(1);
    }
}

impl Default for HardwareEnum {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_caps(modes: &[DisplayMode]) -> Capabilities<'_> {
        Capabilities {
            modes,
            dynamic: false,
            display_start: 0x0010_0000,
            initial_clock: None,
            leds: false,
            serial: false,
            spi: [false, true, false, false],
            paravirtual_disk: false,
            clipboard: false,
            hostfs: false,
            host_transfer: false,
        }
    }

    const MONO: DisplayMode = DisplayMode {
        index: 0,
        width: 1024,
        height: 768,
        depth: 1,
    };

    #[test]
    fn fourcc_packing() {
        assert_eq!(fourcc(b"mVid"), 0x6D56_6964);
        assert_eq!(fourcc(b"Rset"), 0x5273_6574);
    }

    #[test]
    fn register_addresses_read_as_negative_offsets() {
        assert_eq!(REG_TIMER, -64i32 as u32);
        assert_eq!(REG_SWITCHES, -60i32 as u32);
        assert_eq!(REG_MODE_SWITCH, -16i32 as u32);
        assert_eq!(REG_DEBUG_CONSOLE, -12i32 as u32);
    }

    #[test]
    fn root_query_lists_present_capabilities() {
        let modes = [MONO];
        let caps = make_caps(&modes);
        let mut hw = HardwareEnum::new();
        hw.query(0, &caps);

        assert_eq!(hw.read_next(), 1); // version
        let mut listed = Vec::new();
        loop {
            let word = hw.read_next();
            if word == 0 {
                break;
            }
            listed.push(word);
        }
        assert!(listed.contains(&CAP_MONO_VID));
        assert!(listed.contains(&CAP_TIMER));
        assert!(listed.contains(&CAP_SPI));
        assert!(listed.contains(&CAP_RESET));
        assert!(!listed.contains(&CAP_MONO_DYN));
        assert!(!listed.contains(&CAP_HOSTFS));
        assert!(!listed.contains(&CAP_RTC));
    }

    #[test]
    fn mono_descriptor_geometry() {
        let modes = [MONO];
        let caps = make_caps(&modes);
        let mut hw = HardwareEnum::new();
        hw.query(CAP_MONO_VID, &caps);
        assert_eq!(hw.read_next(), 1); // mode count
        assert_eq!(hw.read_next(), REG_MODE_SWITCH);
        assert_eq!(hw.read_next(), 1024);
        assert_eq!(hw.read_next(), 768);
        assert_eq!(hw.read_next(), 128); // bytes per line at 1 bpp
        assert_eq!(hw.read_next(), 0x0010_0000);
        assert_eq!(hw.read_next(), 0); // drained
        assert_eq!(hw.read_next(), 0);
    }

    #[test]
    fn color_descriptor_palette_follows_switch_register() {
        let modes = [
            MONO,
            DisplayMode {
                index: 1,
                width: 640,
                height: 480,
                depth: 8,
            },
            DisplayMode {
                index: 2,
                width: 800,
                height: 600,
                depth: 4,
            },
        ];
        let caps = make_caps(&modes);

        let mut hw = HardwareEnum::new();
        hw.query(CAP_COLOR8_VID, &caps);
        assert_eq!(hw.read_next(), 1); // mode count
        assert_eq!(hw.read_next(), REG_MODE_SWITCH);
        assert_eq!(hw.read_next(), PALETTE_START);
        assert_eq!(hw.read_next(), 640);
        assert_eq!(hw.read_next(), 480);
        assert_eq!(hw.read_next(), 640); // bytes per line at 8 bpp
        assert_eq!(hw.read_next(), 0x0010_0000);
        assert_eq!(hw.read_next(), 0); // drained

        let mut hw = HardwareEnum::new();
        hw.query(CAP_COLOR4_VID, &caps);
        assert_eq!(hw.read_next(), 1);
        assert_eq!(hw.read_next(), REG_MODE_SWITCH);
        assert_eq!(hw.read_next(), PALETTE_START);
        assert_eq!(hw.read_next(), 800);
        assert_eq!(hw.read_next(), 600);
        assert_eq!(hw.read_next(), 400); // bytes per line at 4 bpp
        assert_eq!(hw.read_next(), 0x0010_0000);
        assert_eq!(hw.read_next(), 0);
    }

    #[test]
    fn dynamic_descriptor() {
        let modes = [MONO];
        let mut caps = make_caps(&modes);
        caps.dynamic = true;
        let mut hw = HardwareEnum::new();
        hw.query(CAP_MONO_DYN, &caps);
        assert_eq!(
            [
                hw.read_next(),
                hw.read_next(),
                hw.read_next(),
                hw.read_next(),
                hw.read_next(),
                hw.read_next(),
                hw.read_next(),
                hw.read_next(),
            ],
            [
                REG_MODE_SWITCH,
                2048,
                2048,
                32,
                1,
                -1i32 as u32,
                0x0010_0000,
                1
            ]
        );
    }

    #[test]
    fn spi_sub_capabilities() {
        let modes = [MONO];
        let caps = make_caps(&modes);
        let mut hw = HardwareEnum::new();
        hw.query(CAP_SPI, &caps);
        assert_eq!(hw.read_next(), REG_SPI_CONTROL);
        assert_eq!(hw.read_next(), REG_SPI_DATA);
        assert_eq!(hw.read_next(), CAP_SDCARD); // slot 1 populated
        assert_eq!(hw.read_next(), 0); // slot 2 empty, list ends
    }

    #[test]
    fn absent_capability_reads_zero() {
        let modes = [MONO];
        let caps = make_caps(&modes);
        let mut hw = HardwareEnum::new();
        hw.query(CAP_HOSTFS, &caps);
        assert_eq!(hw.read_next(), 0);
        hw.query(fourcc(b"none"), &caps);
        assert_eq!(hw.read_next(), 0);
    }

    #[test]
    fn rtc_descriptor() {
        let modes = [MONO];
        let mut caps = make_caps(&modes);
        caps.initial_clock = Some(0x1234_5678);
        let mut hw = HardwareEnum::new();
        hw.query(CAP_RTC, &caps);
        assert_eq!(hw.read_next(), 0);
        assert_eq!(hw.read_next(), 0x1234_5678);
        assert_eq!(hw.read_next(), 0);
    }
}
