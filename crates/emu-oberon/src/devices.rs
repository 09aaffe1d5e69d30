//! Device callback surfaces and the shipped host stubs.
//!
//! Every peripheral slot on the bus is a trait object with a narrow call
//! surface. The core never names a concrete implementation: the disk is
//! "some SPI device", the host filesystem is "something that consumes
//! command blocks". Hosts plug in what they have; empty slots read as
//! absent hardware.

use std::fs::File;
use std::io::{BufReader, Read, Write};
use std::path::Path;

/// Serial port: one data register and one status register.
pub trait SerialDevice {
    /// Status word: bit 0 = receive data available, bit 1 = ready to
    /// transmit.
    fn read_status(&mut self) -> u32;
    /// Read the next received byte.
    fn read_data(&mut self) -> u32;
    /// Transmit a byte.
    fn write_data(&mut self, value: u32);
}

/// SPI peripheral (SD-card disk, network interface).
pub trait SpiDevice {
    /// Read the response to the last transfer.
    fn read_data(&mut self) -> u32;
    /// Clock one value out on the bus.
    fn write_data(&mut self, value: u32);

    /// Whether the device also accepts structured command blocks,
    /// bypassing the byte-streamed protocol.
    fn supports_paravirtual(&self) -> bool {
        false
    }

    /// Consume a command block at byte address `address` in guest RAM.
    fn paravirtual_write(&mut self, _ram: &mut [u32], _address: u32) {}
}

/// LED bank sink.
pub trait LedSink {
    /// The guest wrote the LED register.
    fn write(&mut self, value: u32);
}

/// Clipboard bridge: a control register and a data register, both
/// readable and writable.
pub trait ClipboardDevice {
    fn read_control(&mut self) -> u32;
    fn write_control(&mut self, value: u32);
    fn read_data(&mut self) -> u32;
    fn write_data(&mut self, value: u32);
}

/// A device driven by structured command blocks in guest RAM (host
/// filesystem, host transfer). The device receives the whole RAM as a
/// bounded slice plus the byte address the guest wrote.
pub trait MemoryMappedDevice {
    fn write(&mut self, ram: &mut [u32], address: u32);
}

/// LED stub: prints the bit pattern to stderr.
pub struct LedPrinter;

impl LedSink for LedPrinter {
    fn write(&mut self, value: u32) {
        eprintln!("LEDs: {:08b}", value & 0xFF);
    }
}

/// Host-transfer stub: accepts and ignores command blocks, which is
/// enough to advertise the capability to the guest.
pub struct HostTransferStub;

impl MemoryMappedDevice for HostTransferStub {
    fn write(&mut self, _ram: &mut [u32], _address: u32) {}
}

/// File-backed raw serial port: reads the receive stream from one file,
/// appends transmitted bytes to another. Either side may be absent.
pub struct FileSerial {
    input: Option<BufReader<File>>,
    pending: Option<u8>,
    output: Option<File>,
}

impl FileSerial {
    /// Open the given input and output files. Both are optional; a
    /// missing path leaves that direction disconnected.
    pub fn open(input: Option<&Path>, output: Option<&Path>) -> Result<Self, String> {
        let input = match input {
            Some(path) => Some(BufReader::new(File::open(path).map_err(|e| {
                format!("Failed to open serial input {}: {e}", path.display())
            })?)),
            None => None,
        };
        let output = match output {
            Some(path) => Some(File::create(path).map_err(|e| {
                format!("Failed to open serial output {}: {e}", path.display())
            })?),
            None => None,
        };
        Ok(Self {
            input,
            pending: None,
            output,
        })
    }

    /// Pull one byte ahead so the status register can report availability.
    fn fill(&mut self) {
        if self.pending.is_none() {
            if let Some(reader) = self.input.as_mut() {
                let mut byte = [0u8; 1];
                if matches!(reader.read(&mut byte), Ok(1)) {
                    self.pending = Some(byte[0]);
                }
            }
        }
    }
}

impl SerialDevice for FileSerial {
    fn read_status(&mut self) -> u32 {
        self.fill();
        // Bit 1: always ready to transmit; bit 0: a byte is waiting.
        2 | u32::from(self.pending.is_some())
    }

    fn read_data(&mut self) -> u32 {
        self.fill();
        u32::from(self.pending.take().unwrap_or(0))
    }

    fn write_data(&mut self, value: u32) {
        if let Some(file) = self.output.as_mut() {
            let _ = file.write_all(&[value as u8]);
        }
    }
}

/// Debug console: a 512-byte line buffer flushed to stdout.
///
/// The guest writes one byte at a time; a zero byte flushes the line,
/// and a full buffer flushes itself. Carriage returns become line feeds.
pub struct DebugConsole {
    buf: [u8; 512],
    len: usize,
}

impl DebugConsole {
    #[must_use]
    pub fn new() -> Self {
        Self {
            buf: [0; 512],
            len: 0,
        }
    }

    /// Accept one byte from the guest.
    pub fn write_byte(&mut self, byte: u8) {
        if byte == 0 {
            self.flush();
            return;
        }
        if self.len == self.buf.len() {
            self.flush();
        }
        self.buf[self.len] = if byte == b'\r' { b'\n' } else { byte };
        self.len += 1;
    }

    fn flush(&mut self) {
        if self.len > 0 {
            let mut stdout = std::io::stdout();
            let _ = stdout.write_all(&self.buf[..self.len]);
            let _ = stdout.flush();
            self.len = 0;
        }
    }

    /// Bytes currently buffered (for inspection in tests).
    #[must_use]
    pub fn pending(&self) -> &[u8] {
        &self.buf[..self.len]
    }
}

impl Default for DebugConsole {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn console_translates_carriage_returns() {
        let mut console = DebugConsole::new();
        console.write_byte(b'h');
        console.write_byte(b'i');
        console.write_byte(b'\r');
        assert_eq!(console.pending(), b"hi\n");
    }

    #[test]
    fn console_zero_flushes() {
        let mut console = DebugConsole::new();
        console.write_byte(b'x');
        console.write_byte(0);
        assert!(console.pending().is_empty());
    }

    #[test]
    fn console_overflow_flushes_then_continues() {
        let mut console = DebugConsole::new();
        for _ in 0..512 {
            console.write_byte(b'a');
        }
        assert_eq!(console.pending().len(), 512);
        console.write_byte(b'b');
        assert_eq!(console.pending(), b"b");
    }

    #[test]
    fn file_serial_round_trip() {
        let dir = tempfile::tempdir().expect("tempdir");
        let in_path = dir.path().join("in.bin");
        let out_path = dir.path().join("out.bin");
        std::fs::write(&in_path, [0x41, 0x42]).expect("write input");

        let mut serial =
            FileSerial::open(Some(&in_path), Some(&out_path)).expect("open serial files");
        assert_eq!(serial.read_status() & 1, 1);
        assert_eq!(serial.read_data(), 0x41);
        assert_eq!(serial.read_data(), 0x42);
        assert_eq!(serial.read_status() & 1, 0);
        assert_eq!(serial.read_data(), 0);

        serial.write_data(0x58);
        drop(serial);
        assert_eq!(std::fs::read(&out_path).expect("read output"), [0x58]);
    }
}
