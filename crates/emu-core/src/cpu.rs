//! CPU core trait.

use crate::Bus;

/// A CPU core.
///
/// CPUs execute instructions and access memory through a bus. The bus is
/// passed in, not owned, so the machine can hand the same bus to multiple
/// consumers (the frame loop reads the framebuffer out of it between runs).
///
/// Stepping is per-instruction, not per-cycle: this family of machines is
/// driven by an instruction budget rather than a master crystal.
pub trait Cpu {
    /// The type used for register inspection.
    type Registers;

    /// Execute one instruction.
    fn step<B: Bus>(&mut self, bus: &mut B);

    /// Returns the current program counter as a word index.
    fn pc(&self) -> u32;

    /// Returns a snapshot of all registers for inspection.
    fn registers(&self) -> Self::Registers;

    /// Assert the interrupt request line.
    ///
    /// The request is latched and taken at the top of a later `step` when
    /// the CPU's interrupt-enable state allows it.
    fn interrupt(&mut self);

    /// Reset the CPU to its boot state without touching memory.
    fn reset(&mut self);
}
