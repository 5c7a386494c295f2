//! SimpleVM: a small register machine with a flat word-addressed memory,
//! an assembler for its instruction set and an interactive debugger.

pub mod config;
pub mod console;
pub mod debugger;
mod handlers;
pub mod interrupt;
pub mod isa;
pub mod lexer;
pub mod memory;
pub mod parser;
pub mod program;
pub mod registers;
pub mod stack;
pub mod symbol;
pub mod vm;

pub use config::VmConfig;
pub use console::{BufferConsole, Console, StdConsole};
pub use isa::Instruction;
pub use parser::ParseError;
pub use program::Program;
pub use registers::{Flag, Register};
pub use vm::{MachineState, RunReport, Value, VirtualMachine, VmError};

/// Assembles `source` into a loadable program.
pub fn assemble(source: &str) -> Result<Program, ParseError> {
    let lexer = lexer::Lexer::new(source);
    parser::Parser::new(lexer)?.parse_program()
}
