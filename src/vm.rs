// src/vm.rs

use std::convert::TryFrom;
use std::fmt;

use tracing::{debug, info, trace, warn};

use crate::config::VmConfig;
use crate::console::Console;
use crate::debugger::{DebugAction, Debugger};
use crate::handlers::{self, Flow};
use crate::isa::Instruction;
use crate::memory::Memory;
use crate::program::Program;
use crate::registers::{Flag, Flags, Register, RegisterFile, REGISTER_COUNT};

// --- Types and Constants ---

pub type Value = i64; // The basic data type for memory cells, registers and operands.

// --- Errors ---

/// Every way a run can end abnormally. All of them are terminal.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum VmError {
    #[error("invalid instruction opcode {opcode} at address {address}")]
    InvalidInstruction { opcode: Value, address: usize },
    #[error("end of memory reached")]
    EndOfMemory, // IP ran past the last cell while fetching an opcode.
    #[error("operand expected, but reached end of memory")]
    OperandExpected,
    #[error("memory access out of bounds at address {0}")]
    AddressOutOfBounds(Value),
    #[error("invalid register index {0}")]
    InvalidRegister(Value),
    #[error("invalid jump target address {0}")]
    InvalidJumpTarget(Value),
    #[error("stack overflow")]
    StackOverflow,
    #[error("stack underflow")]
    StackUnderflow,
    #[error("return without matching call")]
    UnbalancedReturn,
    #[error("corrupt call frame ({0})")]
    CorruptFrame(Value),
    #[error("invalid interrupt code {0}")]
    InvalidInterrupt(Value),
    #[error("arithmetic overflow")]
    ArithmeticOverflow,
    #[error("console i/o failed: {0}")]
    Io(String),
    #[error("run aborted from the debugger")]
    Aborted,
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl From<std::io::Error> for VmError {
    fn from(err: std::io::Error) -> Self {
        VmError::Io(err.to_string())
    }
}

// --- Machine state ---

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MachineState {
    Ready,     // Constructed, nothing executed yet.
    Running,   // Dispatch loop active.
    Suspended, // Blocked on console input (READ_LINE or the debugger).
    Halted,    // BRK/HLT executed.
    Faulted(VmError),
}

impl MachineState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, MachineState::Halted | MachineState::Faulted(_))
    }
}

impl fmt::Display for MachineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MachineState::Ready => write!(f, "ready"),
            MachineState::Running => write!(f, "running"),
            MachineState::Suspended => write!(f, "suspended"),
            MachineState::Halted => write!(f, "halted"),
            MachineState::Faulted(err) => write!(f, "faulted: {}", err),
        }
    }
}

/// Outcome of [`VirtualMachine::run`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunReport {
    pub state: MachineState,
    pub ip: usize,    // Instruction pointer when the machine stopped.
    pub steps: u64,   // Instructions dispatched since construction.
}

impl RunReport {
    pub fn is_halted(&self) -> bool {
        self.state == MachineState::Halted
    }

    pub fn fault(&self) -> Option<&VmError> {
        match &self.state {
            MachineState::Faulted(err) => Some(err),
            _ => None,
        }
    }
}

impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} at ip {} after {} steps", self.state, self.ip, self.steps)
    }
}

// --- Virtual Machine ---

/// The register machine: memory, registers, flags and the instruction pointer,
/// all owned by one value.
#[derive(Debug, Clone)]
pub struct VirtualMachine {
    pub(crate) memory: Memory,
    pub(crate) registers: RegisterFile,
    pub(crate) flags: Flags,
    pub(crate) ip: usize,
    pub(crate) frame_size: Value, // Always SP - FP; may go negative.
    pub(crate) call_depth: usize, // Frames entered and not yet left.
    state: MachineState,
    steps: u64,
    config: VmConfig,
}

impl Default for VirtualMachine {
    fn default() -> Self {
        VirtualMachine::build(VmConfig::default())
    }
}

impl VirtualMachine {
    /// Creates a machine with zeroed memory and SP = FP = the configured stack location.
    pub fn new(config: VmConfig) -> Result<Self, VmError> {
        config.validate()?;
        Ok(VirtualMachine::build(config))
    }

    fn build(config: VmConfig) -> Self {
        let mut registers = RegisterFile::new();
        registers.set(Register::Sp, config.stack_location as Value);
        registers.set(Register::Fp, config.stack_location as Value);
        VirtualMachine {
            memory: Memory::new(config.memory_size),
            registers,
            flags: Flags::default(),
            ip: 0,
            frame_size: 0,
            call_depth: 0,
            state: MachineState::Ready,
            steps: 0,
            config,
        }
    }

    // --- Loading ---

    pub fn load_program(&mut self, words: &[Value]) -> Result<(), VmError> {
        self.load_program_at(0, words)
    }

    /// Copies `words` into memory at `offset`, overwriting what was there.
    pub fn load_program_at(&mut self, offset: usize, words: &[Value]) -> Result<(), VmError> {
        self.memory.write_block(offset, words)?;
        debug!(offset, len = words.len(), "program loaded");
        Ok(())
    }

    /// Loads every segment of an assembled program.
    pub fn load(&mut self, program: &Program) -> Result<(), VmError> {
        for segment in program.segments() {
            self.load_program_at(segment.origin, &segment.words)?;
        }
        Ok(())
    }

    /// Writes the character codes of `text` at `offset`. No terminator is added.
    pub fn write_string_at(&mut self, offset: usize, text: &str) -> Result<(), VmError> {
        let codes: Vec<Value> = text.chars().map(|c| c as Value).collect();
        self.memory.write_block(offset, &codes)
    }

    pub fn fill_memory(&mut self, value: Value) {
        self.memory.fill(value);
    }

    // --- Read accessors ---

    pub fn ip(&self) -> usize {
        self.ip
    }

    pub fn register(&self, reg: Register) -> Value {
        self.registers.get(reg)
    }

    pub fn register_snapshot(&self) -> [Value; REGISTER_COUNT] {
        self.registers.snapshot()
    }

    #[inline]
    pub fn sp(&self) -> usize {
        self.registers.get(Register::Sp) as usize
    }

    #[inline]
    pub fn fp(&self) -> usize {
        self.registers.get(Register::Fp) as usize
    }

    pub fn flag(&self, flag: Flag) -> bool {
        self.flags.get(flag)
    }

    pub fn flags(&self) -> Flags {
        self.flags
    }

    pub fn frame_size(&self) -> Value {
        self.frame_size
    }

    pub fn call_depth(&self) -> usize {
        self.call_depth
    }

    pub fn memory(&self) -> &Memory {
        &self.memory
    }

    pub fn memory_window(&self, addr: usize, len: usize) -> Result<&[Value], VmError> {
        self.memory.window(addr, len)
    }

    /// Cells from `before` below SP up to `after` cells at and above it.
    /// Returns the address of the first cell with the slice.
    pub fn stack_window(&self, before: usize, after: usize) -> (usize, &[Value]) {
        let sp = self.sp();
        let start = sp.saturating_sub(before);
        let words = self
            .memory
            .window(start, sp - start + after)
            .unwrap_or_default();
        (start, words)
    }

    /// Words pushed in the current frame, starting at FP.
    pub fn frame_words(&self) -> &[Value] {
        let len = usize::try_from(self.frame_size).unwrap_or(0);
        self.memory.window(self.fp(), len).unwrap_or_default()
    }

    pub fn state(&self) -> &MachineState {
        &self.state
    }

    pub fn steps(&self) -> u64 {
        self.steps
    }

    pub fn config(&self) -> &VmConfig {
        &self.config
    }

    pub fn report(&self) -> RunReport {
        RunReport {
            state: self.state.clone(),
            ip: self.ip,
            steps: self.steps,
        }
    }

    // --- Write accessors ---

    /// Sets a register. SP and FP must stay within `[0, memory size]`.
    ///
    /// Moving SP or FP directly keeps the frame counter equal to `SP - FP`, so
    /// the next RET still finds the caller's frame.
    pub fn set_register(&mut self, reg: Register, value: Value) -> Result<(), VmError> {
        match reg {
            Register::Sp => {
                self.validate_pointer(value)?;
                self.frame_size += value - self.registers.get(Register::Sp);
            }
            Register::Fp => {
                self.validate_pointer(value)?;
                self.frame_size -= value - self.registers.get(Register::Fp);
            }
            _ => {}
        }
        self.registers.set(reg, value);
        Ok(())
    }

    pub fn set_ip(&mut self, ip: usize) -> Result<(), VmError> {
        self.ip = self.validate_jump_target(ip as Value)?;
        Ok(())
    }

    pub fn clear_flags(&mut self) {
        self.flags.clear();
    }

    // --- Fetching ---

    /// Reads the cell at IP and advances IP by one.
    #[inline]
    pub fn fetch(&mut self) -> Result<Value, VmError> {
        if self.ip >= self.memory.len() {
            return Err(VmError::EndOfMemory);
        }
        let value = self.memory.read(self.ip)?;
        self.ip += 1;
        Ok(value)
    }

    /// Fetches an operand word; running off the end here means a truncated instruction.
    #[inline]
    pub(crate) fn fetch_operand(&mut self) -> Result<Value, VmError> {
        self.fetch().map_err(|e| match e {
            VmError::EndOfMemory => VmError::OperandExpected,
            other => other,
        })
    }

    #[inline]
    pub(crate) fn fetch_register(&mut self) -> Result<Register, VmError> {
        let index = self.fetch_operand()?;
        Register::try_from(index)
    }

    #[inline]
    pub(crate) fn fetch_address(&mut self) -> Result<usize, VmError> {
        let addr = self.fetch_operand()?;
        self.memory.address(addr)
    }

    // --- Validation ---

    /// SP and FP may point one past the last cell (an empty or full stack).
    #[inline]
    fn validate_pointer(&self, value: Value) -> Result<usize, VmError> {
        match usize::try_from(value) {
            Ok(p) if p <= self.memory.len() => Ok(p),
            _ => Err(VmError::AddressOutOfBounds(value)),
        }
    }

    #[inline]
    pub(crate) fn validate_jump_target(&self, target: Value) -> Result<usize, VmError> {
        match usize::try_from(target) {
            Ok(t) if t < self.memory.len() => Ok(t),
            _ => Err(VmError::InvalidJumpTarget(target)),
        }
    }

    // --- Execution Loop ---

    /// Runs until the machine halts or faults.
    pub fn run(&mut self, console: &mut dyn Console) -> RunReport {
        info!(ip = self.ip, "run");
        while !self.step(console).is_terminal() {}
        self.report()
    }

    /// Executes exactly one instruction. A terminal machine stays as it is.
    pub fn step(&mut self, console: &mut dyn Console) -> &MachineState {
        if self.state.is_terminal() {
            return &self.state;
        }
        self.state = MachineState::Running;
        let at = self.ip;
        match self.execute_next(console) {
            Ok(Flow::Halt) => {
                info!(ip = at, steps = self.steps, "halted");
                self.state = MachineState::Halted;
            }
            Ok(_) => {}
            Err(err) => {
                warn!(ip = at, error = %err, "faulted");
                self.state = MachineState::Faulted(err);
            }
        }
        &self.state
    }

    fn execute_next(&mut self, console: &mut dyn Console) -> Result<Flow, VmError> {
        let address = self.ip;
        let opcode = self.fetch()?;
        let instruction = Instruction::decode(opcode)
            .ok_or(VmError::InvalidInstruction { opcode, address })?;
        self.steps += 1;
        trace!(ip = address, instruction = instruction.mnemonic(), "dispatch");

        let flow = handlers::lookup(instruction)(self, &mut *console)?;
        if flow == Flow::Debug {
            self.debug_break(console)?;
            return Ok(Flow::Continue);
        }
        Ok(flow)
    }

    fn debug_break(&mut self, console: &mut dyn Console) -> Result<(), VmError> {
        if !self.config.debugger {
            debug!(ip = self.ip, "debugger disabled, DBG ignored");
            return Ok(());
        }
        self.state = MachineState::Suspended;
        let action = Debugger::new(console).session(self)?;
        self.state = MachineState::Running;
        match action {
            DebugAction::Continue => Ok(()),
            DebugAction::Quit => Err(VmError::Aborted),
        }
    }

    /// Marks the machine as blocked on input while `wait` runs.
    pub(crate) fn suspended<T>(&mut self, wait: impl FnOnce() -> T) -> T {
        self.state = MachineState::Suspended;
        let result = wait();
        self.state = MachineState::Running;
        result
    }
}
