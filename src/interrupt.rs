//! Software interrupts: the VM's character I/O routines.
//!
//! Every routine works on the cells at the stack pointer. Strings are
//! sequences of character codes terminated by a zero cell.

use tracing::{debug, warn};

use crate::console::Console;
use crate::registers::Register;
use crate::vm::{Value, VirtualMachine, VmError};

/// Prompt shown while the machine waits for a line of input.
pub const READ_LINE_PROMPT: &str = "? ";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i64)]
pub enum Interrupt {
    PrintChar = 1,   // print mem[SP] as a character
    PrintString = 2, // print mem[SP..] up to the zero terminator, then a newline
    ReadLine = 3,    // read a line into mem[SP..], terminate it, advance SP
}

impl Interrupt {
    pub const ALL: [Interrupt; 3] = [
        Interrupt::PrintChar,
        Interrupt::PrintString,
        Interrupt::ReadLine,
    ];

    pub fn decode(code: Value) -> Option<Interrupt> {
        Interrupt::ALL.iter().copied().find(|i| *i as Value == code)
    }

    pub const fn name(self) -> &'static str {
        match self {
            Interrupt::PrintChar => "PRINT_CHAR",
            Interrupt::PrintString => "PRINT_STRING",
            Interrupt::ReadLine => "READ_LINE",
        }
    }

    pub fn from_name(name: &str) -> Option<Interrupt> {
        Interrupt::ALL
            .iter()
            .copied()
            .find(|i| i.name().eq_ignore_ascii_case(name))
    }
}

/// Converts a cell to a printable character; codes outside Unicode print as U+FFFD.
fn cell_to_char(value: Value) -> char {
    u32::try_from(value)
        .ok()
        .and_then(char::from_u32)
        .unwrap_or(char::REPLACEMENT_CHARACTER)
}

impl VirtualMachine {
    /// Runs interrupt `code` against the current stack pointer.
    pub(crate) fn call_interrupt(
        &mut self,
        code: Value,
        console: &mut dyn Console,
    ) -> Result<(), VmError> {
        let interrupt = Interrupt::decode(code).ok_or(VmError::InvalidInterrupt(code))?;
        debug!(interrupt = interrupt.name(), sp = self.sp(), "interrupt");
        match interrupt {
            Interrupt::PrintChar => {
                let ch = cell_to_char(self.memory.read(self.sp())?);
                console.write_str(ch.encode_utf8(&mut [0; 4]))?;
            }
            Interrupt::PrintString => {
                let text = self.read_string(self.sp())?;
                console.write_line(&text)?;
            }
            Interrupt::ReadLine => self.read_line_interrupt(console)?,
        }
        Ok(())
    }

    /// Reads the zero-terminated string starting at `addr`.
    pub fn read_string(&self, addr: usize) -> Result<String, VmError> {
        let mut text = String::new();
        let mut at = addr;
        loop {
            match self.memory.read(at)? {
                0 => return Ok(text),
                code => text.push(cell_to_char(code)),
            }
            at += 1;
        }
    }

    fn read_line_interrupt(&mut self, console: &mut dyn Console) -> Result<(), VmError> {
        let line = self.suspended(|| console.read_line(READ_LINE_PROMPT))?;
        let line = line.unwrap_or_else(|| {
            warn!("input exhausted, READ_LINE stores an empty line");
            String::new()
        });

        let mut codes: Vec<Value> = line.chars().map(|c| c as Value).collect();
        codes.push(0);

        let sp = self.sp();
        if sp + codes.len() > self.memory.len() {
            return Err(VmError::StackOverflow);
        }
        self.memory.write_block(sp, &codes)?;
        self.registers.set(Register::Sp, (sp + codes.len()) as Value);
        self.frame_size += codes.len() as Value;
        Ok(())
    }
}
