//! Boot ROM.
//!
//! A 512-word loader assembled at startup rather than shipped as a
//! binary blob. After reset the CPU fetches word 0 of the ROM, hops to
//! the memory-configuration block (three of whose words are patched
//! with the machine's memory limit and stack origin whenever RAM is
//! configured), then pulls the boot sectors from the SPI disk into RAM
//! at address 0 and jumps there.
//!
//! Register conventions handed to the loaded system: R12 = memory
//! limit, R14 = stack origin (the RISC-5 stack pointer).

use wirth_risc5::asm::{self, cond, op};

/// Words in the boot ROM.
pub const ROM_WORDS: usize = 512;

/// First boot sector in guest numbering; filesystem-only images map
/// this to file sector 1, directly after the directory-mark sector.
pub const BOOT_SECTOR: u32 = 0x8_0003;
/// Sectors the loader copies to RAM.
pub const BOOT_SECTOR_COUNT: u32 = 16;

/// Loader words patched by `patch_memory_config`.
const PATCH_MEM_HI: usize = 372;
const PATCH_MEM_LO: usize = 373;
const PATCH_STACK_HI: usize = 376;

/// Assemble the boot loader.
#[must_use]
pub fn boot_rom() -> [u32; ROM_WORDS] {
    let mut rom = [0u32; ROM_WORDS];

    // Entry. Word 0 is a plain instruction (reset + one step leaves the
    // PC at ROM word 1), word 1 hops to the configuration block.
    rom[0] = asm::mov_imm(0, 0);
    rom[1] = asm::branch(cond::AL, false, 370); // -> word 372

    // Loader proper, entered from word 377.
    // R1 = device register base.
    rom[2] = asm::mov_high(1, 0xFFFF);
    rom[3] = asm::imm(op::IOR, 1, 1, 0xFFC0);
    // R2 = destination, R3 = sector number, R6 = sectors left.
    rom[4] = asm::mov_imm(2, 0);
    rom[5] = asm::mov_high(3, BOOT_SECTOR >> 16);
    rom[6] = asm::imm(op::IOR, 3, 3, BOOT_SECTOR & 0xFFFF);
    rom[7] = asm::mov_imm(6, BOOT_SECTOR_COUNT);

    // Per-sector: select the card, send the 6-byte read command with
    // the sector number in big-endian argument bytes.
    rom[8] = asm::mov_imm(0, 1);
    rom[9] = asm::store(0, 1, 20); // select SD card (slot 1)
    rom[10] = asm::mov_imm(0, 0x51);
    rom[11] = asm::store(0, 1, 16); // command byte
    rom[12] = asm::imm(op::ROR, 5, 3, 24);
    rom[13] = asm::imm(op::AND, 5, 5, 0xFF);
    rom[14] = asm::store(5, 1, 16); // argument byte 1
    rom[15] = asm::imm(op::ROR, 5, 3, 16);
    rom[16] = asm::imm(op::AND, 5, 5, 0xFF);
    rom[17] = asm::store(5, 1, 16); // argument byte 2
    rom[18] = asm::imm(op::ROR, 5, 3, 8);
    rom[19] = asm::imm(op::AND, 5, 5, 0xFF);
    rom[20] = asm::store(5, 1, 16); // argument byte 3
    rom[21] = asm::imm(op::AND, 5, 3, 0xFF);
    rom[22] = asm::store(5, 1, 16); // argument byte 4
    rom[23] = asm::mov_imm(0, 0xFF);
    rom[24] = asm::store(0, 1, 16); // checksum byte, runs the command
    rom[25] = asm::store(0, 1, 16); // pump the status byte
    rom[26] = asm::store(0, 1, 16); // pump the data token

    // Pull 128 words into RAM.
    rom[27] = asm::mov_imm(4, 128);
    rom[28] = asm::store(0, 1, 16); // pump one data word
    rom[29] = asm::load(5, 1, 16);
    rom[30] = asm::store(5, 2, 0);
    rom[31] = asm::imm(op::ADD, 2, 2, 4);
    rom[32] = asm::imm(op::SUB, 4, 4, 1);
    rom[33] = asm::branch(cond::EQ, true, -6i32); // BNE -> word 28

    rom[34] = asm::store(0, 1, 16); // closing pump ends the transfer
    rom[35] = asm::mov_imm(0, 0);
    rom[36] = asm::store(0, 1, 20); // deselect
    rom[37] = asm::imm(op::ADD, 3, 3, 1);
    rom[38] = asm::imm(op::SUB, 6, 6, 1);
    rom[39] = asm::branch(cond::EQ, true, -32i32); // BNE -> word 8

    // All sectors loaded: jump to RAM word 0.
    rom[40] = asm::mov_imm(0, 0);
    rom[41] = asm::branch_reg(cond::AL, false, 0);

    // Memory-configuration block; the operand halves are placeholders
    // until `patch_memory_config` runs.
    rom[PATCH_MEM_HI] = asm::mov_high(12, 0);
    rom[PATCH_MEM_LO] = asm::imm(op::IOR, 12, 12, 0);
    rom[374] = asm::branch(cond::AL, false, 1); // -> word 376
    rom[PATCH_STACK_HI] = asm::mov_high(14, 0);
    rom[377] = asm::branch(cond::AL, false, -376i32); // -> word 2

    rom
}

/// Re-patch the configuration block for the current memory layout.
pub fn patch_memory_config(rom: &mut [u32; ROM_WORDS], mem_limit: u32, stack_org: u32) {
    rom[PATCH_MEM_HI] = asm::mov_high(12, mem_limit >> 16);
    rom[PATCH_MEM_LO] = asm::imm(op::IOR, 12, 12, mem_limit & 0xFFFF);
    rom[PATCH_STACK_HI] = asm::mov_high(14, stack_org >> 16);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn word_zero_is_not_a_branch() {
        let rom = boot_rom();
        assert_eq!(rom[0] & 0x8000_0000, 0);
    }

    #[test]
    fn patch_encodes_limits() {
        let mut rom = boot_rom();
        patch_memory_config(&mut rom, 0x0018_0000, 0x000C_0000);
        assert_eq!(rom[372], asm::mov_high(12, 0x18));
        assert_eq!(rom[373], asm::imm(op::IOR, 12, 12, 0));
        assert_eq!(rom[376], asm::mov_high(14, 0xC));
    }

    #[test]
    fn branch_offsets_land_on_labels() {
        let rom = boot_rom();
        // Word 1 branches to the configuration block at 372.
        assert_eq!(rom[1] & 0x00FF_FFFF, 370);
        // Word 377 branches back to the loader at word 2.
        assert_eq!((rom[377] & 0x00FF_FFFF) as i32 | !0x00FF_FFFF, 2 - 378);
    }
}
