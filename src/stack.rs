//! Stack primitives and the call-frame protocol.
//!
//! A frame, bottom to top:
//!
//! ```text
//! argument count      <- pushed by the caller before CALL
//! R1 .. R8            <- SAVED_REGISTER_SLOTS
//! return address      \
//! saved frame size    /  FRAME_BOOKKEEPING_SLOTS
//!                     <- FP, SP right after the call
//! ```
//!
//! The saved frame size is the caller's counter after the registers and the
//! return address were pushed, so it covers the caller's own words plus those
//! nine slots.

use tracing::debug;

use crate::registers::{Register, GENERAL_PURPOSE};
use crate::vm::{Value, VirtualMachine, VmError};

/// General-purpose registers saved by every frame.
pub const SAVED_REGISTER_SLOTS: usize = GENERAL_PURPOSE.len();
/// Return address and saved frame size, kept adjacent at the top of a frame.
pub const FRAME_BOOKKEEPING_SLOTS: usize = 2;
/// Words written by [`VirtualMachine::enter_subroutine_state`].
pub const FRAME_HEADER_SLOTS: usize = SAVED_REGISTER_SLOTS + FRAME_BOOKKEEPING_SLOTS;

impl VirtualMachine {
    /// Stores `value` at SP and advances SP.
    pub fn push(&mut self, value: Value) -> Result<(), VmError> {
        let sp = self.sp();
        if sp >= self.memory.len() {
            return Err(VmError::StackOverflow);
        }
        self.memory.write(sp, value)?;
        self.registers.set(Register::Sp, (sp + 1) as Value);
        self.frame_size += 1;
        Ok(())
    }

    /// Moves SP back one cell and returns the value found there.
    pub fn pop(&mut self) -> Result<Value, VmError> {
        let sp = self.sp();
        if sp == 0 {
            return Err(VmError::StackUnderflow);
        }
        let value = self.memory.read(sp - 1)?;
        self.registers.set(Register::Sp, (sp - 1) as Value);
        self.frame_size -= 1;
        Ok(value)
    }

    /// Saves R1..R8, IP and the frame-size counter, then opens a new frame at SP.
    ///
    /// Fails without touching the stack when the header does not fit.
    pub fn enter_subroutine_state(&mut self) -> Result<(), VmError> {
        if self.sp() + FRAME_HEADER_SLOTS > self.memory.len() {
            return Err(VmError::StackOverflow);
        }
        for reg in GENERAL_PURPOSE {
            self.push(self.registers.get(reg))?;
        }
        self.push(self.ip as Value)?;
        self.push(self.frame_size)?;

        self.registers.set(Register::Fp, self.registers.get(Register::Sp));
        self.frame_size = 0;
        self.call_depth += 1;
        debug!(fp = self.fp(), return_ip = self.ip, depth = self.call_depth, "push state");
        Ok(())
    }

    /// Unwinds the innermost frame: restores the frame-size counter, IP, R1..R8
    /// and the caller's FP, then drops the argument count and that many arguments.
    pub fn leave_subroutine_state(&mut self) -> Result<(), VmError> {
        if self.call_depth == 0 {
            return Err(VmError::UnbalancedReturn);
        }
        let callee_fp = self.fp();
        if callee_fp < FRAME_HEADER_SLOTS {
            return Err(VmError::CorruptFrame(callee_fp as Value));
        }

        self.registers.set(Register::Sp, callee_fp as Value);
        self.frame_size = self.pop()?;
        let return_ip = self.pop()?;
        self.ip = self.validate_jump_target(return_ip)?;
        for reg in GENERAL_PURPOSE.iter().rev() {
            let value = self.pop()?;
            self.registers.set(*reg, value);
        }

        // With the header popped the counter is back to the caller's own words,
        // which sit directly below the frame base.
        let frame_base = callee_fp - FRAME_HEADER_SLOTS;
        let caller_fp = (frame_base as Value)
            .checked_sub(self.frame_size)
            .filter(|fp| (0..=self.memory.len() as Value).contains(fp))
            .ok_or(VmError::CorruptFrame(self.frame_size))?;
        self.registers.set(Register::Fp, caller_fp);

        let arg_count = self.pop()?;
        if arg_count < 0 {
            return Err(VmError::CorruptFrame(arg_count));
        }
        for _ in 0..arg_count {
            self.pop()?;
        }

        self.call_depth -= 1;
        debug!(
            fp = caller_fp,
            ip = self.ip,
            args = arg_count,
            depth = self.call_depth,
            "pop state"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::VmConfig;

    fn machine() -> VirtualMachine {
        VirtualMachine::new(VmConfig::default().with_memory_size(64).with_stack_location(32)).unwrap()
    }

    #[test]
    fn push_pop_track_frame_size() {
        let mut vm = machine();
        vm.push(5).unwrap();
        vm.push(6).unwrap();
        assert_eq!(vm.frame_size(), 2);
        assert_eq!(vm.sp(), 34);
        assert_eq!(vm.pop(), Ok(6));
        assert_eq!(vm.frame_size(), 1);
        assert_eq!(vm.sp(), 33);
    }

    #[test]
    fn moving_sp_directly_keeps_frame_size_in_step() {
        let mut vm = machine();
        vm.set_register(Register::Sp, 40).unwrap();
        assert_eq!(vm.frame_size(), 8);
        vm.push(0).unwrap(); // argument count
        vm.enter_subroutine_state().unwrap();
        vm.leave_subroutine_state().unwrap();

        assert_eq!(vm.fp(), 32);
        assert_eq!(vm.sp(), 40);
        assert_eq!(vm.frame_size(), 8);

        vm.set_register(Register::Fp, 35).unwrap();
        assert_eq!(vm.frame_size(), 5);
    }

    #[test]
    fn push_at_end_of_memory_overflows() {
        let mut vm = VirtualMachine::new(VmConfig::default().with_memory_size(4).with_stack_location(3)).unwrap();
        vm.push(1).unwrap();
        assert_eq!(vm.push(2), Err(VmError::StackOverflow));
    }

    #[test]
    fn pop_at_zero_underflows() {
        let mut vm = machine();
        vm.set_register(Register::Sp, 0).unwrap();
        assert_eq!(vm.pop(), Err(VmError::StackUnderflow));
    }

    #[test]
    fn enter_lays_out_the_frame() {
        let mut vm = machine();
        for (i, reg) in GENERAL_PURPOSE.iter().enumerate() {
            vm.set_register(*reg, 10 + i as Value).unwrap();
        }
        vm.ip = 7;
        vm.push(0).unwrap(); // argument count
        vm.enter_subroutine_state().unwrap();

        assert_eq!(vm.fp(), 32 + 1 + FRAME_HEADER_SLOTS);
        assert_eq!(vm.sp(), vm.fp());
        assert_eq!(vm.frame_size(), 0);
        assert_eq!(
            vm.memory_window(32, 11).unwrap(),
            &[0, 10, 11, 12, 13, 14, 15, 16, 17, 7, 10]
        );
    }

    #[test]
    fn leave_without_enter_is_unbalanced() {
        let mut vm = machine();
        assert_eq!(vm.leave_subroutine_state(), Err(VmError::UnbalancedReturn));
    }

    #[test]
    fn leave_drops_caller_arguments() {
        let mut vm = machine();
        vm.push(100).unwrap();
        vm.push(200).unwrap();
        vm.push(2).unwrap(); // argument count
        vm.enter_subroutine_state().unwrap();
        vm.push(9).unwrap(); // callee local
        vm.leave_subroutine_state().unwrap();

        assert_eq!(vm.sp(), 32);
        assert_eq!(vm.fp(), 32);
        assert_eq!(vm.frame_size(), 0);
        assert_eq!(vm.call_depth(), 0);
    }
}
