//! RISC-5 CPU implementation.
//!
//! One `step()` executes one instruction. The top of every step samples
//! the latched interrupt request: when interrupts are enabled and no
//! handler is already active, the CPU saves the PC and flags into their
//! shadow copies, marks the handler active and redirects execution to
//! word 1. The matching return instruction restores the shadows and
//! drops both the active and the pending bit, so a request that arrives
//! while the handler runs is lost, exactly like the hardware.

use emu_core::{Bus, Cpu};

use crate::Registers;
use crate::asm::{QBIT, UBIT, VBIT, op};
use crate::{divide, fpu};

/// Base byte address of the boot ROM.
pub const ROM_START: u32 = 0xFFFF_F800;

/// The RISC-5 CPU.
#[derive(Debug)]
pub struct Risc5 {
    /// CPU registers.
    pub regs: Registers,
}

impl Default for Risc5 {
    fn default() -> Self {
        Self::new()
    }
}

impl Risc5 {
    /// Create a CPU in reset state, with the PC at the boot ROM.
    #[must_use]
    pub fn new() -> Self {
        let mut cpu = Self {
            regs: Registers::new(),
        };
        cpu.reset();
        cpu
    }

    /// Write a destination register and derive Z/N, as every
    /// register-writing instruction does.
    fn set_register(&mut self, reg: usize, value: u32) {
        self.regs.r[reg] = value;
        self.regs.flags.update_nz(value);
    }

    /// Execute one instruction of the register group.
    fn execute_register(&mut self, ir: u32) {
        let a = ((ir >> 24) & 15) as usize;
        let b = ((ir >> 20) & 15) as usize;
        let opcode = (ir >> 16) & 15;
        let im = ir & 0xFFFF;
        let c = (ir & 15) as usize;

        let b_val = self.regs.r[b];
        let c_val = if ir & QBIT == 0 {
            self.regs.r[c]
        } else if ir & VBIT == 0 {
            im
        } else {
            0xFFFF_0000 | im
        };

        let a_val = match opcode {
            op::MOV => {
                if ir & UBIT == 0 {
                    c_val
                } else if ir & QBIT != 0 {
                    // High-halfword load
                    c_val << 16
                } else if ir & VBIT != 0 {
                    self.regs.flags.status_word()
                } else {
                    self.regs.h
                }
            }
            op::LSL => b_val << (c_val & 31),
            op::ASR => ((b_val as i32) >> (c_val & 31)) as u32,
            op::ROR => b_val.rotate_right(c_val & 31),
            op::AND => b_val & c_val,
            op::ANN => b_val & !c_val,
            op::IOR => b_val | c_val,
            op::XOR => b_val ^ c_val,
            op::ADD => {
                let mut sum = b_val.wrapping_add(c_val);
                if ir & UBIT != 0 && self.regs.flags.c {
                    sum = sum.wrapping_add(1);
                }
                self.regs.flags.c = sum < b_val;
                self.regs.flags.v = ((sum ^ c_val) & (sum ^ b_val)) >> 31 != 0;
                sum
            }
            op::SUB => {
                let mut diff = b_val.wrapping_sub(c_val);
                if ir & UBIT != 0 && self.regs.flags.c {
                    diff = diff.wrapping_sub(1);
                }
                self.regs.flags.c = diff > b_val;
                self.regs.flags.v = ((b_val ^ c_val) & (diff ^ b_val)) >> 31 != 0;
                diff
            }
            op::MUL => {
                let product = if ir & UBIT == 0 {
                    (i64::from(b_val as i32) * i64::from(c_val as i32)) as u64
                } else {
                    u64::from(b_val) * u64::from(c_val)
                };
                self.regs.h = (product >> 32) as u32;
                product as u32
            }
            op::DIV => {
                if (c_val as i32) > 0 {
                    if ir & UBIT == 0 {
                        let quot = (b_val as i32).wrapping_div(c_val as i32);
                        let rem = (b_val as i32).wrapping_rem(c_val as i32);
                        // Floor semantics: the remainder is never negative.
                        let (quot, rem) = if rem < 0 {
                            (quot - 1, rem + c_val as i32)
                        } else {
                            (quot, rem)
                        };
                        self.regs.h = rem as u32;
                        quot as u32
                    } else {
                        self.regs.h = b_val % c_val;
                        b_val / c_val
                    }
                } else {
                    let d = divide::idiv(b_val, c_val, ir & UBIT == 0);
                    self.regs.h = d.rem;
                    d.quot
                }
            }
            op::FAD => fpu::add(b_val, c_val, ir & UBIT != 0, ir & VBIT != 0),
            op::FSB => fpu::add(b_val, c_val ^ 0x8000_0000, ir & UBIT != 0, ir & VBIT != 0),
            op::FML => fpu::mul(b_val, c_val),
            op::FDV => fpu::div(b_val, c_val),
            _ => unreachable!("4-bit opcode"),
        };
        self.set_register(a, a_val);
    }

    /// Execute one instruction of the memory group.
    fn execute_memory<B: Bus>(&mut self, bus: &mut B, ir: u32) {
        let a = ((ir >> 24) & 15) as usize;
        let b = ((ir >> 20) & 15) as usize;
        let off = ((ir & 0x000F_FFFF) ^ 0x0008_0000).wrapping_sub(0x0008_0000);
        let address = self.regs.r[b].wrapping_add(off);

        if ir & UBIT == 0 {
            let a_val = if ir & VBIT == 0 {
                bus.read_word(address)
            } else {
                u32::from(bus.read_byte(address))
            };
            self.set_register(a, a_val);
        } else {
            let a_val = self.regs.r[a];
            if ir & VBIT == 0 {
                bus.write_word(address, a_val);
            } else {
                bus.write_byte(address, a_val as u8);
            }
        }
    }

    /// Execute one instruction of the branch group.
    fn execute_branch(&mut self, ir: u32) {
        let flags = self.regs.flags;
        let mut taken = (ir >> 27) & 1 != 0;
        taken ^= match (ir >> 24) & 7 {
            0 => flags.n,
            1 => flags.z,
            2 => flags.c,
            3 => flags.v,
            4 => flags.c | flags.z,
            5 => flags.n ^ flags.v,
            6 => (flags.n ^ flags.v) | flags.z,
            _ => true,
        };

        if taken {
            if ir & VBIT != 0 {
                // Link: R15 holds the byte address of the next instruction.
                self.set_register(15, self.regs.pc.wrapping_mul(4));
            }
            if ir & UBIT == 0 {
                let c = (ir & 15) as usize;
                self.regs.pc = self.regs.r[c] / 4;
            } else {
                let off = ((ir & 0x00FF_FFFF) ^ 0x0080_0000).wrapping_sub(0x0080_0000);
                self.regs.pc = self.regs.pc.wrapping_add(off);
            }
        } else if (ir >> 24) & 15 == 15 && ir & UBIT == 0 && ir & 0x10 != 0 && self.regs.intr_active
        {
            // Return from interrupt: a never-taken branch with bit 4 set.
            self.regs.pc = self.regs.spc;
            self.regs.flags = self.regs.shadow_flags;
            self.regs.intr_active = false;
            self.regs.intr_pending = false;
        } else if (ir >> 24) & 15 == 15 && ir & UBIT == 0 && ir & 0x20 != 0 {
            // STI/CLI: bit 0 is the new interrupt-enable state.
            self.regs.intr_enabled = ir & 1 != 0;
        }
    }
}

impl Cpu for Risc5 {
    type Registers = Registers;

    fn step<B: Bus>(&mut self, bus: &mut B) {
        if self.regs.intr_pending && self.regs.intr_enabled && !self.regs.intr_active {
            self.regs.spc = self.regs.pc;
            self.regs.shadow_flags = self.regs.flags;
            self.regs.intr_active = true;
            self.regs.pc = 1;
        }

        let pc = self.regs.pc;
        let Some(ir) = bus.fetch(pc) else {
            eprintln!(
                "Branched into unmapped memory (PC=0x{:08X}), resetting",
                pc.wrapping_mul(4)
            );
            self.reset();
            return;
        };
        self.regs.pc = pc + 1;

        if ir & 0x8000_0000 == 0 {
            self.execute_register(ir);
        } else if ir & QBIT == 0 {
            self.execute_memory(bus, ir);
        } else {
            self.execute_branch(ir);
        }
    }

    fn pc(&self) -> u32 {
        self.regs.pc
    }

    fn registers(&self) -> Registers {
        self.regs
    }

    fn interrupt(&mut self) {
        self.regs.intr_pending = true;
    }

    fn reset(&mut self) {
        self.regs.pc = ROM_START / 4;
    }
}
