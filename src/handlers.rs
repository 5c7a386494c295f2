//! One handler per opcode.
//!
//! The dispatcher has already consumed the opcode word; each handler fetches
//! its own operands, so arity is fixed by which handler runs.

use tracing::trace;

use crate::console::Console;
use crate::isa::Instruction;
use crate::registers::{Flag, Flags, Register};
use crate::vm::{Value, VirtualMachine, VmError};

/// What the dispatch loop does after a handler returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Flow {
    Continue,
    Halt,
    Debug,
}

pub(crate) type Handler = fn(&mut VirtualMachine, &mut dyn Console) -> Result<Flow, VmError>;

/// Maps an opcode to its handler.
pub(crate) fn lookup(instruction: Instruction) -> Handler {
    match instruction {
        Instruction::Load => load,
        Instruction::LoadM => load_memory,
        Instruction::Mov => mov,
        Instruction::Add => add,
        Instruction::AddI => add_immediate,
        Instruction::Sub => sub,
        Instruction::SubI => sub_immediate,
        Instruction::Mul => mul,
        Instruction::MulI => mul_immediate,
        Instruction::Push => push,
        Instruction::PushR => push_register,
        Instruction::PushM => push_memory,
        Instruction::Pop => pop,
        Instruction::PopM => pop_memory,
        Instruction::Jmp => jump,
        Instruction::JmpR => jump_register,
        Instruction::Ret => ret,
        Instruction::Jz => jump_if_zero,
        Instruction::Jnz => jump_if_not_zero,
        Instruction::Call => call,
        Instruction::Je => jump_if_equal,
        Instruction::Jne => jump_if_not_equal,
        Instruction::Cmp => compare,
        Instruction::Inc => increment,
        Instruction::Dec => decrement,
        Instruction::Ir => interrupt,
        Instruction::Cdf => change_direction_flag,
        Instruction::Clf => clear_flags,
        Instruction::Brk | Instruction::Hlt => halt,
        Instruction::Dbg => debug_break,
        Instruction::Nop => nop,
    }
}

// --- Data movement ---

fn load(vm: &mut VirtualMachine, _: &mut dyn Console) -> Result<Flow, VmError> {
    let dest = vm.fetch_register()?;
    let value = vm.fetch_operand()?;
    trace!("loading {} into {}", value, dest);
    vm.set_register(dest, value)?;
    Ok(Flow::Continue)
}

fn load_memory(vm: &mut VirtualMachine, _: &mut dyn Console) -> Result<Flow, VmError> {
    let addr = vm.fetch_address()?;
    let value = vm.fetch_operand()?;
    vm.memory.write(addr, value)?;
    Ok(Flow::Continue)
}

fn mov(vm: &mut VirtualMachine, _: &mut dyn Console) -> Result<Flow, VmError> {
    let dest = vm.fetch_register()?;
    let src = vm.fetch_register()?;
    vm.set_register(dest, vm.registers.get(src))?;
    Ok(Flow::Continue)
}

// --- Arithmetic ---

/// Where the right-hand side of an arithmetic instruction comes from.
enum Rhs {
    Register,
    Immediate,
}

/// AC = lhs <op> rhs. Operand registers are only read.
fn accumulate(
    vm: &mut VirtualMachine,
    rhs: Rhs,
    op: fn(Value, Value) -> Option<Value>,
) -> Result<Flow, VmError> {
    let lhs = vm.fetch_register()?;
    let rhs = match rhs {
        Rhs::Register => {
            let reg = vm.fetch_register()?;
            vm.registers.get(reg)
        }
        Rhs::Immediate => vm.fetch_operand()?,
    };
    let result = op(vm.registers.get(lhs), rhs).ok_or(VmError::ArithmeticOverflow)?;
    vm.registers.set(Register::Ac, result);
    Ok(Flow::Continue)
}

fn add(vm: &mut VirtualMachine, _: &mut dyn Console) -> Result<Flow, VmError> {
    accumulate(vm, Rhs::Register, Value::checked_add)
}

fn add_immediate(vm: &mut VirtualMachine, _: &mut dyn Console) -> Result<Flow, VmError> {
    accumulate(vm, Rhs::Immediate, Value::checked_add)
}

fn sub(vm: &mut VirtualMachine, _: &mut dyn Console) -> Result<Flow, VmError> {
    accumulate(vm, Rhs::Register, Value::checked_sub)
}

fn sub_immediate(vm: &mut VirtualMachine, _: &mut dyn Console) -> Result<Flow, VmError> {
    accumulate(vm, Rhs::Immediate, Value::checked_sub)
}

fn mul(vm: &mut VirtualMachine, _: &mut dyn Console) -> Result<Flow, VmError> {
    accumulate(vm, Rhs::Register, Value::checked_mul)
}

fn mul_immediate(vm: &mut VirtualMachine, _: &mut dyn Console) -> Result<Flow, VmError> {
    accumulate(vm, Rhs::Immediate, Value::checked_mul)
}

fn increment(vm: &mut VirtualMachine, _: &mut dyn Console) -> Result<Flow, VmError> {
    step_register(vm, 1)
}

fn decrement(vm: &mut VirtualMachine, _: &mut dyn Console) -> Result<Flow, VmError> {
    step_register(vm, -1)
}

fn step_register(vm: &mut VirtualMachine, delta: Value) -> Result<Flow, VmError> {
    let reg = vm.fetch_register()?;
    let value = vm
        .registers
        .get(reg)
        .checked_add(delta)
        .ok_or(VmError::ArithmeticOverflow)?;
    vm.set_register(reg, value)?;
    Ok(Flow::Continue)
}

// --- Stack ---

fn push(vm: &mut VirtualMachine, _: &mut dyn Console) -> Result<Flow, VmError> {
    let value = vm.fetch_operand()?;
    vm.push(value)?;
    Ok(Flow::Continue)
}

fn push_register(vm: &mut VirtualMachine, _: &mut dyn Console) -> Result<Flow, VmError> {
    let reg = vm.fetch_register()?;
    vm.push(vm.registers.get(reg))?;
    Ok(Flow::Continue)
}

fn push_memory(vm: &mut VirtualMachine, _: &mut dyn Console) -> Result<Flow, VmError> {
    let addr = vm.fetch_address()?;
    let value = vm.memory.read(addr)?;
    vm.push(value)?;
    Ok(Flow::Continue)
}

fn pop(vm: &mut VirtualMachine, _: &mut dyn Console) -> Result<Flow, VmError> {
    let dest = vm.fetch_register()?;
    let value = vm.pop()?;
    trace!("popping {} into {}", value, dest);
    vm.set_register(dest, value)?;
    Ok(Flow::Continue)
}

fn pop_memory(vm: &mut VirtualMachine, _: &mut dyn Console) -> Result<Flow, VmError> {
    let addr = vm.fetch_address()?;
    let value = vm.pop()?;
    vm.memory.write(addr, value)?;
    Ok(Flow::Continue)
}

// --- Control flow ---

fn jump(vm: &mut VirtualMachine, _: &mut dyn Console) -> Result<Flow, VmError> {
    branch(vm, |_| true)
}

fn jump_register(vm: &mut VirtualMachine, _: &mut dyn Console) -> Result<Flow, VmError> {
    let reg = vm.fetch_register()?;
    vm.ip = vm.validate_jump_target(vm.registers.get(reg))?;
    Ok(Flow::Continue)
}

fn jump_if_zero(vm: &mut VirtualMachine, _: &mut dyn Console) -> Result<Flow, VmError> {
    branch(vm, |flags| flags.get(Flag::Zero))
}

fn jump_if_not_zero(vm: &mut VirtualMachine, _: &mut dyn Console) -> Result<Flow, VmError> {
    branch(vm, |flags| !flags.get(Flag::Zero))
}

fn jump_if_equal(vm: &mut VirtualMachine, _: &mut dyn Console) -> Result<Flow, VmError> {
    branch(vm, |flags| flags.get(Flag::Equal))
}

fn jump_if_not_equal(vm: &mut VirtualMachine, _: &mut dyn Console) -> Result<Flow, VmError> {
    branch(vm, |flags| !flags.get(Flag::Equal))
}

/// Fetches the target and overwrites IP when `taken` holds. When not taken,
/// IP stays past the operand.
fn branch(vm: &mut VirtualMachine, taken: fn(&Flags) -> bool) -> Result<Flow, VmError> {
    let target = vm.fetch_operand()?;
    if taken(&vm.flags) {
        vm.ip = vm.validate_jump_target(target)?;
    }
    Ok(Flow::Continue)
}

fn call(vm: &mut VirtualMachine, _: &mut dyn Console) -> Result<Flow, VmError> {
    let target = vm.fetch_operand()?;
    let target = vm.validate_jump_target(target)?;
    // IP already points past the operand: that is the return address.
    vm.enter_subroutine_state()?;
    vm.ip = target;
    Ok(Flow::Continue)
}

fn ret(vm: &mut VirtualMachine, _: &mut dyn Console) -> Result<Flow, VmError> {
    vm.leave_subroutine_state()?;
    Ok(Flow::Continue)
}

// --- Comparison and flags ---

/// EF when both registers are equal, ZF when the source is zero. Neither is
/// ever cleared here.
fn compare(vm: &mut VirtualMachine, _: &mut dyn Console) -> Result<Flow, VmError> {
    let dest = vm.fetch_register()?;
    let src = vm.fetch_register()?;
    let (a, b) = (vm.registers.get(dest), vm.registers.get(src));
    if a == b {
        vm.flags.set(Flag::Equal);
    }
    if b == 0 {
        vm.flags.set(Flag::Zero);
    }
    trace!("compare {} ({}) with {} ({}), flags {:?}", dest, a, src, b, vm.flags);
    Ok(Flow::Continue)
}

fn change_direction_flag(vm: &mut VirtualMachine, _: &mut dyn Console) -> Result<Flow, VmError> {
    vm.flags.toggle(Flag::Direction);
    Ok(Flow::Continue)
}

fn clear_flags(vm: &mut VirtualMachine, _: &mut dyn Console) -> Result<Flow, VmError> {
    vm.flags.clear();
    Ok(Flow::Continue)
}

// --- Machine control ---

fn interrupt(vm: &mut VirtualMachine, console: &mut dyn Console) -> Result<Flow, VmError> {
    let code = vm.fetch_operand()?;
    vm.call_interrupt(code, console)?;
    Ok(Flow::Continue)
}

fn halt(_: &mut VirtualMachine, _: &mut dyn Console) -> Result<Flow, VmError> {
    Ok(Flow::Halt)
}

fn debug_break(_: &mut VirtualMachine, _: &mut dyn Console) -> Result<Flow, VmError> {
    Ok(Flow::Debug)
}

fn nop(_: &mut VirtualMachine, _: &mut dyn Console) -> Result<Flow, VmError> {
    Ok(Flow::Continue)
}
