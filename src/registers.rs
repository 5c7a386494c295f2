//! Register file and condition flags.

use std::convert::TryFrom;
use std::fmt;

use crate::vm::{Value, VmError};

// --- Registers ---

/// Named registers. The discriminant is the operand encoding used in programs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i64)]
pub enum Register {
    Ac = 0, // Accumulator: implicit destination of every arithmetic instruction
    R1 = 1,
    R2 = 2,
    R3 = 3,
    R4 = 4,
    R5 = 5,
    R6 = 6,
    R7 = 7,
    R8 = 8,
    Sp = 9,  // Stack pointer: next free slot, grows towards higher addresses
    Fp = 10, // Frame pointer: top of the saved state of the active frame
}

pub const REGISTER_COUNT: usize = 11;

/// Registers saved by a call frame, in push order.
pub const GENERAL_PURPOSE: [Register; 8] = [
    Register::R1,
    Register::R2,
    Register::R3,
    Register::R4,
    Register::R5,
    Register::R6,
    Register::R7,
    Register::R8,
];

pub const ALL_REGISTERS: [Register; REGISTER_COUNT] = [
    Register::Ac,
    Register::R1,
    Register::R2,
    Register::R3,
    Register::R4,
    Register::R5,
    Register::R6,
    Register::R7,
    Register::R8,
    Register::Sp,
    Register::Fp,
];

impl Register {
    pub const fn name(self) -> &'static str {
        match self {
            Register::Ac => "AC",
            Register::R1 => "R1",
            Register::R2 => "R2",
            Register::R3 => "R3",
            Register::R4 => "R4",
            Register::R5 => "R5",
            Register::R6 => "R6",
            Register::R7 => "R7",
            Register::R8 => "R8",
            Register::Sp => "SP",
            Register::Fp => "FP",
        }
    }

    /// Looks up a register by its assembly name. `R0` is accepted for `AC`.
    pub fn from_name(name: &str) -> Option<Register> {
        let upper = name.to_ascii_uppercase();
        if upper == "R0" {
            return Some(Register::Ac);
        }
        ALL_REGISTERS.iter().copied().find(|r| r.name() == upper)
    }

    #[inline]
    const fn index(self) -> usize {
        self as usize
    }
}

impl TryFrom<Value> for Register {
    type Error = VmError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        usize::try_from(value)
            .ok()
            .and_then(|index| ALL_REGISTERS.get(index).copied())
            .ok_or(VmError::InvalidRegister(value))
    }
}

impl fmt::Display for Register {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Storage for all registers. Pointer validation lives in the VM, which knows
/// the memory size.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RegisterFile {
    regs: [Value; REGISTER_COUNT],
}

impl RegisterFile {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn get(&self, reg: Register) -> Value {
        self.regs[reg.index()]
    }

    #[inline]
    pub fn set(&mut self, reg: Register, value: Value) {
        self.regs[reg.index()] = value;
    }

    pub fn snapshot(&self) -> [Value; REGISTER_COUNT] {
        self.regs
    }
}

// --- Flags ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Flag {
    Equal,     // EF
    Zero,      // ZF
    Direction, // DF, reserved: no branch reads it
}

impl Flag {
    pub const fn name(self) -> &'static str {
        match self {
            Flag::Equal => "EF",
            Flag::Zero => "ZF",
            Flag::Direction => "DF",
        }
    }
}

/// Sticky condition flags. Comparisons only ever set them; [`Flags::clear`]
/// is the one way back to false.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Flags {
    equal: bool,
    zero: bool,
    direction: bool,
}

impl Flags {
    #[inline]
    pub fn get(&self, flag: Flag) -> bool {
        match flag {
            Flag::Equal => self.equal,
            Flag::Zero => self.zero,
            Flag::Direction => self.direction,
        }
    }

    #[inline]
    pub fn set(&mut self, flag: Flag) {
        *self.slot(flag) = true;
    }

    pub fn toggle(&mut self, flag: Flag) {
        let slot = self.slot(flag);
        *slot = !*slot;
    }

    pub fn clear(&mut self) {
        *self = Flags::default();
    }

    fn slot(&mut self, flag: Flag) -> &mut bool {
        match flag {
            Flag::Equal => &mut self.equal,
            Flag::Zero => &mut self.zero,
            Flag::Direction => &mut self.direction,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_decoding_matches_operand_encoding() {
        assert_eq!(Register::try_from(0), Ok(Register::Ac));
        assert_eq!(Register::try_from(8), Ok(Register::R8));
        assert_eq!(Register::try_from(10), Ok(Register::Fp));
        assert_eq!(Register::try_from(11), Err(VmError::InvalidRegister(11)));
        assert_eq!(Register::try_from(-1), Err(VmError::InvalidRegister(-1)));
    }

    #[test]
    fn register_names_round_trip() {
        for reg in ALL_REGISTERS {
            assert_eq!(Register::from_name(reg.name()), Some(reg));
        }
        assert_eq!(Register::from_name("r0"), Some(Register::Ac));
        assert_eq!(Register::from_name("sp"), Some(Register::Sp));
        assert_eq!(Register::from_name("R9"), None);
    }

    #[test]
    fn flags_are_sticky_until_cleared() {
        let mut flags = Flags::default();
        assert!(!flags.get(Flag::Equal));
        flags.set(Flag::Equal);
        flags.set(Flag::Equal);
        assert!(flags.get(Flag::Equal));
        assert!(!flags.get(Flag::Zero));
        flags.toggle(Flag::Direction);
        assert!(flags.get(Flag::Direction));
        flags.clear();
        assert_eq!(flags, Flags::default());
    }
}
