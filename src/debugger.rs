//! Line-oriented debugger entered by the DBG instruction.
//!
//! The debugger only reads machine state through the VM's public accessors;
//! it cannot change registers or memory. Its one lever is [`DebugAction::Quit`],
//! which the VM turns into an aborted run.

use std::fmt::Write as _;

use crate::console::Console;
use crate::isa::{disassemble, disassemble_range};
use crate::registers::{Flag, Register, GENERAL_PURPOSE};
use crate::vm::{VirtualMachine, VmError};

const MEMORY_WINDOW: usize = 10; // Cells shown by `memory <addr>`.
const STACK_BELOW: usize = 4;
const STACK_ABOVE: usize = 3;
const DISASM_COUNT: usize = 5;

/// How the debugger hands control back to the machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DebugAction {
    Continue,
    Quit,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DebugCommand {
    Continue,
    Registers,
    Flags,
    Frame,
    Stack,
    Memory(Option<usize>),
    Disassemble { address: Option<usize>, count: usize },
    Help,
    Quit,
    Unknown(String),
    BadArgument(String),
}

fn parse_address(arg: &str) -> Option<usize> {
    match arg.strip_prefix("0x") {
        Some(hex) => usize::from_str_radix(hex, 16).ok(),
        None => arg.parse().ok(),
    }
}

impl DebugCommand {
    /// Parses one input line. Blank lines yield `None`.
    pub fn parse(line: &str) -> Option<DebugCommand> {
        let mut words = line.split_whitespace();
        let command = words.next()?;
        let args: Vec<&str> = words.collect();

        let address_arg = |i: usize| -> Result<Option<usize>, DebugCommand> {
            match args.get(i) {
                None => Ok(None),
                Some(arg) => parse_address(arg)
                    .map(Some)
                    .ok_or_else(|| DebugCommand::BadArgument(arg.to_string())),
            }
        };

        let parsed = match command {
            "continue" | "c" => DebugCommand::Continue,
            "registers" | "r" => DebugCommand::Registers,
            "flags" | "fl" => DebugCommand::Flags,
            "frame" | "f" => DebugCommand::Frame,
            "stack" | "s" => DebugCommand::Stack,
            "memory" | "m" => match address_arg(0) {
                Ok(address) => DebugCommand::Memory(address),
                Err(bad) => bad,
            },
            "disasm" | "d" => match (address_arg(0), address_arg(1)) {
                (Ok(address), Ok(count)) => DebugCommand::Disassemble {
                    address,
                    count: count.unwrap_or(DISASM_COUNT),
                },
                (Err(bad), _) | (_, Err(bad)) => bad,
            },
            "help" | "h" => DebugCommand::Help,
            "quit" | "q" => DebugCommand::Quit,
            other => DebugCommand::Unknown(other.to_string()),
        };
        Some(parsed)
    }
}

pub struct Debugger<'c> {
    console: &'c mut dyn Console,
}

impl<'c> Debugger<'c> {
    pub fn new(console: &'c mut dyn Console) -> Self {
        Debugger { console }
    }

    /// Prompts until the user continues or quits. End of input continues.
    pub fn session(&mut self, vm: &VirtualMachine) -> Result<DebugAction, VmError> {
        loop {
            let prompt = format!("Debug:{}>", vm.ip());
            let Some(line) = self.console.read_line(&prompt)? else {
                return Ok(DebugAction::Continue);
            };
            let Some(command) = DebugCommand::parse(&line) else {
                continue;
            };
            if let Some(action) = self.execute(vm, &command)? {
                return Ok(action);
            }
        }
    }

    /// Runs one command. Returns the action when the command ends the session.
    pub fn execute(
        &mut self,
        vm: &VirtualMachine,
        command: &DebugCommand,
    ) -> Result<Option<DebugAction>, VmError> {
        let text = match command {
            DebugCommand::Continue => return Ok(Some(DebugAction::Continue)),
            DebugCommand::Quit => return Ok(Some(DebugAction::Quit)),
            DebugCommand::Registers => render_registers(vm),
            DebugCommand::Flags => render_flags(vm),
            DebugCommand::Frame => render_frame(vm),
            DebugCommand::Stack => render_stack(vm),
            DebugCommand::Memory(address) => render_memory(vm, *address),
            DebugCommand::Disassemble { address, count } => {
                render_disassembly(vm, address.unwrap_or(vm.ip()), *count)
            }
            DebugCommand::Help => HELP.to_string(),
            DebugCommand::Unknown(name) => format!("Unknown command ({})\n", name),
            DebugCommand::BadArgument(arg) => format!("Invalid address ({})\n", arg),
        };
        self.console.write_str(&text)?;
        Ok(None)
    }
}

const HELP: &str = "\
Commands:
  continue | c              resume execution
  registers | r             dump registers
  flags | fl                dump flags
  frame | f                 dump the current call frame
  stack | s                 dump the stack around SP
  memory | m [addr]         dump memory at addr, or all of it
  disasm | d [addr] [n]     disassemble n instructions at addr (default: IP)
  quit | q                  stop the run
";

/// `-> value` for an address that is inside memory, empty otherwise.
fn pointee(vm: &VirtualMachine, addr: usize) -> String {
    match vm.memory().read(addr) {
        Ok(value) => format!(" -> {}", value),
        Err(_) => String::new(),
    }
}

fn render_registers(vm: &VirtualMachine) -> String {
    let mut out = String::from("Registers:\n");
    let ip = vm.ip();
    let _ = match disassemble(vm.memory().as_slice(), ip) {
        Some((text, _)) => writeln!(out, "IP: {} -> {}", ip, text),
        None => writeln!(out, "IP: {}{}", ip, pointee(vm, ip)),
    };
    for reg in GENERAL_PURPOSE.iter().chain(&[Register::Ac]) {
        let _ = writeln!(out, "{}: {}", reg, vm.register(*reg));
    }
    let _ = writeln!(out, "SP: {}{}", vm.sp(), pointee(vm, vm.sp()));
    let _ = writeln!(out, "FP: {}{}", vm.fp(), pointee(vm, vm.fp()));
    out
}

fn render_flags(vm: &VirtualMachine) -> String {
    format!(
        "Flags:\nZero: {}\nEqual: {}\nDirection: {}\n",
        vm.flag(Flag::Zero),
        vm.flag(Flag::Equal),
        vm.flag(Flag::Direction)
    )
}

fn render_frame(vm: &VirtualMachine) -> String {
    let mut out = format!(
        "Frame Size: {}\nFrame Pointer: {}\nCall Depth: {}\n",
        vm.frame_size(),
        vm.fp(),
        vm.call_depth()
    );
    for (index, item) in vm.frame_words().iter().enumerate() {
        let _ = writeln!(out, "Frame+{}: {}", index, item);
    }
    out
}

fn render_stack(vm: &VirtualMachine) -> String {
    let sp = vm.sp();
    let mut out = format!("Stack Pointer: {}\n", sp);
    let (start, words) = vm.stack_window(STACK_BELOW, STACK_ABOVE);
    for (offset, value) in words.iter().enumerate() {
        let addr = start + offset;
        let marker = if addr == sp { "  <- SP" } else { "" };
        let _ = writeln!(out, "{:>6}: {}{}", addr, value, marker);
    }
    out
}

fn render_memory(vm: &VirtualMachine, address: Option<usize>) -> String {
    match address {
        Some(addr) => match vm.memory_window(addr, MEMORY_WINDOW) {
            Ok(words) => format!("{:?}\n", words),
            Err(err) => format!("{}\n", err),
        },
        None => {
            let mut out = String::from("Memory:\n");
            for (row, chunk) in vm.memory().as_slice().chunks(MEMORY_WINDOW).enumerate() {
                let cells: Vec<String> = chunk.iter().map(|v| format!("{:02}", v)).collect();
                let _ = writeln!(out, "{:>6}: {}", row * MEMORY_WINDOW, cells.join(" "));
            }
            out
        }
    }
}

fn render_disassembly(vm: &VirtualMachine, address: usize, count: usize) -> String {
    let mut out = String::new();
    for (addr, text) in disassemble_range(vm.memory().as_slice(), address, count) {
        let marker = if addr == vm.ip() { "=> " } else { "   " };
        let _ = writeln!(out, "{}{:>6}: {}", marker, addr, text);
    }
    out
}
