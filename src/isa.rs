//! Instruction set definition.
//!
//! [`for_each_instruction!`](crate::for_each_instruction) holds the one
//! authoritative table of opcodes, mnemonics and operand kinds. It generates
//! the [`Instruction`] enum and its decoding, and the same table drives the
//! assembler's arity checks and the disassembler.
//!
//! # Word format
//!
//! Every instruction is one opcode word followed by a fixed number of operand
//! words. The operand count depends only on the opcode:
//!
//! - `Reg`: register index (`0` = AC, `1..=8` = R1..R8, `9` = SP, `10` = FP)
//! - `Imm`: literal value
//! - `Addr`: memory or code address
//! - `Int`: software interrupt code

use std::convert::TryFrom;
use std::fmt::Write;

use crate::interrupt::Interrupt;
use crate::registers::Register;
use crate::vm::Value;

/// Kind of a single operand word.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperandKind {
    Reg,
    Imm,
    Addr,
    Int,
}

/// Invokes a callback macro with the complete instruction list.
#[macro_export]
macro_rules! for_each_instruction {
    ($callback:ident) => {
        $callback! {
            // =========================
            // Data movement
            // =========================
            /// LOAD reg, imm ; reg = imm
            Load = 2, "LOAD" => [Reg, Imm],
            /// LOADM addr, imm ; mem[addr] = imm
            LoadM = 3, "LOADM" => [Addr, Imm],
            /// MOV dst, src ; dst = src
            Mov = 11, "MOV" => [Reg, Reg],
            // =========================
            // Arithmetic (result always in AC)
            // =========================
            /// ADD a, b ; AC = a + b
            Add = 20, "ADD" => [Reg, Reg],
            /// ADDI a, imm ; AC = a + imm
            AddI = 21, "ADDI" => [Reg, Imm],
            /// SUB a, b ; AC = a - b
            Sub = 22, "SUB" => [Reg, Reg],
            /// SUBI a, imm ; AC = a - imm
            SubI = 23, "SUBI" => [Reg, Imm],
            /// MUL a, b ; AC = a * b
            Mul = 24, "MUL" => [Reg, Reg],
            /// MULI a, imm ; AC = a * imm
            MulI = 25, "MULI" => [Reg, Imm],
            // =========================
            // Stack
            // =========================
            /// PUSH imm
            Push = 30, "PUSH" => [Imm],
            /// PUSHR reg
            PushR = 31, "PUSHR" => [Reg],
            /// PUSHM addr ; push mem[addr]
            PushM = 32, "PUSHM" => [Addr],
            /// POP reg
            Pop = 40, "POP" => [Reg],
            /// POPM addr ; mem[addr] = pop
            PopM = 41, "POPM" => [Addr],
            // =========================
            // Control flow
            // =========================
            /// JMP addr
            Jmp = 50, "JMP" => [Addr],
            /// JMPR reg ; IP = reg
            JmpR = 51, "JMPR" => [Reg],
            /// RET ; restore the caller's saved state
            Ret = 52, "RET" => [],
            /// JZ addr ; jump if ZF
            Jz = 53, "JZ" => [Addr],
            /// JNZ addr ; jump unless ZF
            Jnz = 54, "JNZ" => [Addr],
            /// CALL addr ; save state, IP = addr
            Call = 55, "CALL" => [Addr],
            /// JE addr ; jump if EF
            Je = 56, "JE" => [Addr],
            /// JNE addr ; jump unless EF
            Jne = 57, "JNE" => [Addr],
            // =========================
            // Comparison and counters
            // =========================
            /// CMP dst, src ; EF if dst == src, ZF if src == 0 (set only)
            Cmp = 60, "CMP" => [Reg, Reg],
            /// INC reg
            Inc = 70, "INC" => [Reg],
            /// DEC reg
            Dec = 71, "DEC" => [Reg],
            // =========================
            // Machine control
            // =========================
            /// IR code ; software interrupt
            Ir = 7, "IR" => [Int],
            /// CDF ; toggle the direction flag
            Cdf = 92, "CDF" => [],
            /// CLF ; clear all flags
            Clf = 93, "CLF" => [],
            /// BRK ; stop the machine
            Brk = 99, "BRK" => [],
            /// DBG ; hand control to the debugger
            Dbg = 100, "DBG" => [],
            /// HLT ; stop the machine
            Hlt = 101, "HLT" => [],
            /// NOP
            Nop = 255, "NOP" => [],
        }
    };
}

#[macro_export]
macro_rules! define_instructions {
    (
        $(
            $(#[$doc:meta])*
            $name:ident = $opcode:literal, $mnemonic:literal => [ $( $kind:ident ),* $(,)? ]
        ),* $(,)?
    ) => {
        /// Opcodes of the virtual machine.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        #[repr(i64)]
        pub enum Instruction {
            $(
                $(#[$doc])*
                $name = $opcode,
            )*
        }

        impl Instruction {
            /// Every instruction in table order.
            pub const ALL: &'static [Instruction] = &[ $( Instruction::$name, )* ];

            /// Returns the assembly mnemonic for this instruction.
            pub const fn mnemonic(&self) -> &'static str {
                match self {
                    $( Instruction::$name => $mnemonic, )*
                }
            }

            /// Operand kinds in encoding order. The slice length is the arity.
            pub const fn operands(&self) -> &'static [OperandKind] {
                match self {
                    $( Instruction::$name => &[ $( OperandKind::$kind ),* ], )*
                }
            }

            pub fn decode(value: Value) -> Option<Instruction> {
                match value {
                    $( $opcode => Some(Instruction::$name), )*
                    _ => None,
                }
            }
        }
    };
}

for_each_instruction!(define_instructions);

impl Instruction {
    #[inline]
    pub const fn arity(&self) -> usize {
        self.operands().len()
    }

    /// Encoded length in words, opcode included.
    #[inline]
    pub const fn width(&self) -> usize {
        1 + self.arity()
    }

    #[inline]
    pub const fn opcode(&self) -> Value {
        *self as Value
    }

    pub fn from_mnemonic(name: &str) -> Option<Instruction> {
        Instruction::ALL
            .iter()
            .copied()
            .find(|i| i.mnemonic().eq_ignore_ascii_case(name))
    }
}

// --- Disassembly ---

fn render_operand(out: &mut String, kind: OperandKind, word: Value) {
    let _ = match kind {
        OperandKind::Reg => match Register::try_from(word) {
            Ok(reg) => write!(out, "{}", reg),
            Err(_) => write!(out, "?{}", word),
        },
        OperandKind::Int => match Interrupt::decode(word) {
            Some(code) => write!(out, "{}", code.name()),
            None => write!(out, "{}", word),
        },
        OperandKind::Imm | OperandKind::Addr => write!(out, "{}", word),
    };
}

/// Renders the instruction starting at `address`.
///
/// Returns the text and the number of words consumed, or `None` when the word
/// at `address` is not an opcode or its operands run past the end of `words`.
pub fn disassemble(words: &[Value], address: usize) -> Option<(String, usize)> {
    let instruction = Instruction::decode(*words.get(address)?)?;
    let operands = words.get(address + 1..address + instruction.width())?;

    let mut text = String::from(instruction.mnemonic());
    for (i, (&kind, &word)) in instruction.operands().iter().zip(operands).enumerate() {
        text.push_str(if i == 0 { " " } else { ", " });
        render_operand(&mut text, kind, word);
    }
    Some((text, instruction.width()))
}

/// Disassembles `count` consecutive items starting at `address`. Words that do
/// not decode are shown as raw data and consume one word.
pub fn disassemble_range(words: &[Value], address: usize, count: usize) -> Vec<(usize, String)> {
    let mut listing = Vec::with_capacity(count);
    let mut at = address;
    while listing.len() < count && at < words.len() {
        match disassemble(words, at) {
            Some((text, width)) => {
                listing.push((at, text));
                at += width;
            }
            None => {
                listing.push((at, format!(".word {}", words[at])));
                at += 1;
            }
        }
    }
    listing
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn decode_rejects_unassigned_opcodes() {
        assert_eq!(Instruction::decode(0), None);
        assert_eq!(Instruction::decode(-1), None);
        assert_eq!(Instruction::decode(Instruction::Hlt as Value), Some(Instruction::Hlt));
    }

    #[test]
    fn opcodes_and_mnemonics_are_unique() {
        let opcodes: HashSet<Value> = Instruction::ALL.iter().map(|i| i.opcode()).collect();
        let names: HashSet<&str> = Instruction::ALL.iter().map(|i| i.mnemonic()).collect();
        assert_eq!(opcodes.len(), Instruction::ALL.len());
        assert_eq!(names.len(), Instruction::ALL.len());
    }

    #[test]
    fn every_opcode_decodes_to_itself() {
        for &instruction in Instruction::ALL {
            assert_eq!(Instruction::decode(instruction.opcode()), Some(instruction));
            assert_eq!(Instruction::from_mnemonic(instruction.mnemonic()), Some(instruction));
        }
    }

    #[test]
    fn arity_table() {
        assert_eq!(Instruction::Load.arity(), 2);
        assert_eq!(Instruction::Call.arity(), 1);
        assert_eq!(Instruction::Ret.arity(), 0);
        assert_eq!(Instruction::Ir.operands(), &[OperandKind::Int]);
        assert_eq!(Instruction::Cmp.width(), 3);
    }

    #[test]
    fn disassembles_registers_and_interrupts() {
        let words = [2, 1, 42, 7, 2, 52];
        assert_eq!(disassemble(&words, 0), Some(("LOAD R1, 42".to_string(), 3)));
        assert_eq!(disassemble(&words, 3), Some(("IR PRINT_STRING".to_string(), 2)));
        assert_eq!(disassemble(&words, 5), Some(("RET".to_string(), 1)));
    }

    #[test]
    fn truncated_instruction_does_not_disassemble() {
        assert_eq!(disassemble(&[2, 1], 0), None);
        let listing = disassemble_range(&[0, 99], 0, 5);
        assert_eq!(listing, vec![(0, ".word 0".to_string()), (1, "BRK".to_string())]);
    }
}
