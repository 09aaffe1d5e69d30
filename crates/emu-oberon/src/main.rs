//! Oberon workstation emulator binary.
//!
//! Headless host driver: parses the fixed command-line surface, builds
//! the machine with the requested peripherals, then runs the frame loop
//! (input is left to an embedding frontend; window and texture plumbing
//! are deliberately outside this binary).

use std::path::PathBuf;
use std::process;
use std::time::Instant;

use emu_oberon::{
    FileSerial, HostFs, HostTransferStub, LedPrinter, Oberon, OberonConfig, SpiDisk, capture,
    parse_size_list,
};

/// Approximate core clock of the emulated machine.
const CPU_HZ: u32 = 25_000_000;
/// Frame rate the headless loop targets.
const FPS: u32 = 60;

// ---------------------------------------------------------------------------
// CLI argument parsing
// ---------------------------------------------------------------------------

struct CliArgs {
    disk_image: Option<PathBuf>,
    fullscreen: bool,
    mem_megs: u32,
    rtc: bool,
    size_list: Option<String>,
    dynsize: bool,
    hostfs_dir: Option<PathBuf>,
    host_transfer: bool,
    leds: bool,
    boot_from_serial: bool,
    serial_in: Option<PathBuf>,
    serial_out: Option<PathBuf>,
    frames: u32,
    screenshot_path: Option<PathBuf>,
}

fn parse_args() -> CliArgs {
    let args: Vec<String> = std::env::args().collect();
    let mut cli = CliArgs {
        disk_image: None,
        fullscreen: false,
        mem_megs: 1,
        rtc: false,
        size_list: None,
        dynsize: false,
        hostfs_dir: None,
        host_transfer: false,
        leds: false,
        boot_from_serial: false,
        serial_in: None,
        serial_out: None,
        frames: 600,
        screenshot_path: None,
    };

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--fullscreen" => {
                cli.fullscreen = true;
            }
            "--mem" => {
                i += 1;
                match args.get(i).and_then(|s| s.parse().ok()) {
                    Some(megs) => cli.mem_megs = megs,
                    None => {
                        eprintln!("--mem requires a number of MiB");
                        process::exit(1);
                    }
                }
            }
            "--rtc" => {
                cli.rtc = true;
            }
            "--size" => {
                i += 1;
                cli.size_list = args.get(i).cloned();
            }
            "--dynsize" => {
                cli.dynsize = true;
            }
            "--hostfs" => {
                i += 1;
                cli.hostfs_dir = args.get(i).map(PathBuf::from);
            }
            "--hosttransfer" => {
                cli.host_transfer = true;
            }
            "--leds" => {
                cli.leds = true;
            }
            "--boot-from-serial" => {
                cli.boot_from_serial = true;
            }
            "--serial-in" => {
                i += 1;
                cli.serial_in = args.get(i).map(PathBuf::from);
            }
            "--serial-out" => {
                i += 1;
                cli.serial_out = args.get(i).map(PathBuf::from);
            }
            "--frames" => {
                i += 1;
                if let Some(n) = args.get(i).and_then(|s| s.parse().ok()) {
                    cli.frames = n;
                }
            }
            "--screenshot" => {
                i += 1;
                cli.screenshot_path = args.get(i).map(PathBuf::from);
            }
            "--help" | "-h" => {
                eprintln!("Usage: emu-oberon [OPTIONS] [DISKIMAGE]");
                eprintln!();
                eprintln!("Options:");
                eprintln!("  --fullscreen          Request fullscreen from the frontend");
                eprintln!("  --mem <MEGS>          RAM size in MiB (1-64) [default: 1]");
                eprintln!("  --rtc                 Expose the host clock to the guest");
                eprintln!("  --size WxH[xD][,...]  Display mode table [default: 1024x768]");
                eprintln!("  --dynsize             Allow dynamic display resizing");
                eprintln!("  --hostfs <DIR>        Bridge DIR as the guest filesystem");
                eprintln!("  --hosttransfer        Enable the host-transfer channel");
                eprintln!("  --leds                Print LED changes to stderr");
                eprintln!("  --boot-from-serial    Set the boot-from-serial switch");
                eprintln!("  --serial-in <FILE>    Feed FILE to the guest serial port");
                eprintln!("  --serial-out <FILE>   Write guest serial output to FILE");
                eprintln!("  --frames <N>          Frames to run headless [default: 600]");
                eprintln!("  --screenshot <FILE>   Save a PNG of the final frame");
                process::exit(0);
            }
            other if !other.starts_with('-') && cli.disk_image.is_none() => {
                cli.disk_image = Some(PathBuf::from(other));
            }
            other => {
                eprintln!("Unknown argument: {other}");
                process::exit(1);
            }
        }
        i += 1;
    }

    cli
}

// ---------------------------------------------------------------------------
// Machine construction
// ---------------------------------------------------------------------------

fn make_machine(cli: &CliArgs) -> Oberon {
    let mut config = OberonConfig {
        megabytes_ram: cli.mem_megs,
        rtc: cli.rtc,
        dynamic_display: cli.dynsize,
        ..OberonConfig::default()
    };
    if let Some(ref list) = cli.size_list {
        config.modes = match parse_size_list(list) {
            Ok(modes) => modes,
            Err(e) => {
                eprintln!("Invalid --size: {e}");
                process::exit(1);
            }
        };
    }

    let mut machine = match Oberon::new(&config) {
        Ok(machine) => machine,
        Err(e) => {
            eprintln!("Failed to build machine: {e}");
            process::exit(1);
        }
    };

    if let Some(ref path) = cli.disk_image {
        match SpiDisk::open(path) {
            Ok(disk) => machine.set_spi(1, Box::new(disk)),
            Err(e) => {
                eprintln!("{e}");
                process::exit(1);
            }
        }
    }

    if let Some(ref dir) = cli.hostfs_dir {
        match HostFs::new(dir) {
            Ok(hostfs) => machine.set_hostfs(Box::new(hostfs)),
            Err(e) => {
                eprintln!("{e}");
                process::exit(1);
            }
        }
    }

    if cli.host_transfer {
        machine.set_host_transfer(Box::new(HostTransferStub));
    }

    if cli.leds {
        machine.set_led(Box::new(LedPrinter));
    }

    if cli.serial_in.is_some() || cli.serial_out.is_some() {
        match FileSerial::open(cli.serial_in.as_deref(), cli.serial_out.as_deref()) {
            Ok(serial) => machine.set_serial(Box::new(serial)),
            Err(e) => {
                eprintln!("{e}");
                process::exit(1);
            }
        }
    }

    if cli.boot_from_serial {
        machine.set_switches(1);
    }

    machine
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

fn main() {
    let cli = parse_args();
    if cli.fullscreen {
        // Recorded for an embedding frontend; the headless loop has no
        // window to maximise.
        eprintln!("Note: --fullscreen has no effect in headless mode");
    }

    let mut machine = make_machine(&cli);

    let start = Instant::now();
    for _ in 0..cli.frames {
        machine.set_time(start.elapsed().as_millis() as u32);
        machine.run(CPU_HZ / FPS);
        let _ = machine.take_damage();
        machine.trigger_interrupt();
    }

    if let Some(ref path) = cli.screenshot_path {
        if let Err(e) = capture::save_screenshot(&machine, path) {
            eprintln!("Screenshot error: {e}");
            process::exit(1);
        }
        eprintln!("Screenshot saved to {}", path.display());
    }
}
