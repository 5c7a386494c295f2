//! Property tests for machine invariants:
//! 1. LOAD r, v leaves exactly v in r and touches no other register
//! 2. CALL/RET restores SP, FP and the frame counter for any frame shape
//! 3. Arithmetic only writes AC and faults instead of wrapping
//! 4. Execution is deterministic

use proptest::prelude::*;
use simple_vm::isa::Instruction;
use simple_vm::registers::{Register, GENERAL_PURPOSE};
use simple_vm::vm::{RunReport, Value, VirtualMachine, VmError};
use simple_vm::BufferConsole;

fn op(instruction: Instruction) -> Value {
    instruction as Value
}

fn run_words(code: &[Value]) -> (VirtualMachine, RunReport) {
    let mut vm = VirtualMachine::default();
    vm.load_program(code).unwrap();
    let report = vm.run(&mut BufferConsole::new());
    (vm, report)
}

fn data_register() -> impl Strategy<Value = Register> {
    prop::sample::select(
        GENERAL_PURPOSE
            .iter()
            .copied()
            .chain([Register::Ac])
            .collect::<Vec<_>>(),
    )
}

proptest! {
    #[test]
    fn load_sets_register(reg in data_register(), value in any::<Value>()) {
        let (vm, report) = run_words(&[op(Instruction::Load), reg as Value, value, op(Instruction::Hlt)]);
        prop_assert!(report.is_halted());
        prop_assert_eq!(vm.register(reg), value);
        prop_assert_eq!(report.steps, 2);

        let mut expected = VirtualMachine::default().register_snapshot();
        expected[reg as usize] = value;
        prop_assert_eq!(vm.register_snapshot(), expected);
    }

    #[test]
    fn call_ret_round_trip(
        locals in prop::collection::vec(-1000i64..1000, 0..20),
        args in prop::collection::vec(-1000i64..1000, 0..10),
        callee_locals in 0usize..20,
        r1 in any::<Value>(),
    ) {
        let mut code = vec![op(Instruction::Load), Register::R1 as Value, r1];
        for value in locals.iter().chain(&args) {
            code.extend([op(Instruction::Push), *value]);
        }
        code.extend([op(Instruction::Push), args.len() as Value]);
        let call_at = code.len();
        code.extend([op(Instruction::Call), 0, op(Instruction::Hlt)]);
        code[call_at + 1] = code.len() as Value;
        for i in 0..callee_locals {
            code.extend([op(Instruction::Push), i as Value]);
        }
        code.extend([op(Instruction::Load), Register::R1 as Value, 0, op(Instruction::Ret)]);

        let (vm, report) = run_words(&code);
        prop_assert!(report.is_halted(), "{}", report);
        prop_assert_eq!(vm.sp(), 500 + locals.len());
        prop_assert_eq!(vm.fp(), 500);
        prop_assert_eq!(vm.frame_size(), locals.len() as Value);
        prop_assert_eq!(vm.call_depth(), 0);
        prop_assert_eq!(vm.register(Register::R1), r1);
        prop_assert_eq!(vm.memory_window(500, locals.len()).unwrap(), &locals[..]);
    }

    #[test]
    fn arithmetic_only_writes_ac(a in any::<Value>(), b in any::<Value>(), which in 0usize..3) {
        let (instruction, expected) = match which {
            0 => (Instruction::Add, a.checked_add(b)),
            1 => (Instruction::Sub, a.checked_sub(b)),
            _ => (Instruction::Mul, a.checked_mul(b)),
        };
        let code = [
            op(Instruction::Load), Register::R1 as Value, a,
            op(Instruction::Load), Register::R2 as Value, b,
            op(instruction), Register::R1 as Value, Register::R2 as Value,
            op(Instruction::Hlt),
        ];
        let (vm, report) = run_words(&code);
        prop_assert_eq!(vm.register(Register::R1), a);
        prop_assert_eq!(vm.register(Register::R2), b);
        match expected {
            Some(value) => {
                prop_assert!(report.is_halted());
                prop_assert_eq!(vm.register(Register::Ac), value);
            }
            None => {
                prop_assert_eq!(report.fault(), Some(&VmError::ArithmeticOverflow));
                prop_assert_eq!(vm.register(Register::Ac), 0);
            }
        }
    }

    #[test]
    fn execution_is_deterministic(words in prop::collection::vec(0i64..110, 1..64)) {
        // Random words can loop forever, so both machines get the same step budget.
        let mut console = BufferConsole::new();
        let mut machines = [VirtualMachine::default(), VirtualMachine::default()];
        for vm in machines.iter_mut() {
            vm.load_program(&words).unwrap();
            for _ in 0..500 {
                if vm.step(&mut console).is_terminal() {
                    break;
                }
            }
        }
        let [first, second] = machines;
        prop_assert_eq!(first.report(), second.report());
        prop_assert_eq!(first.register_snapshot(), second.register_snapshot());
        prop_assert_eq!(first.memory().as_slice(), second.memory().as_slice());
    }
}
