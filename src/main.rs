use std::path::{Path, PathBuf};
use std::{fs, process};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use simple_vm::config::{DEFAULT_MEMORY_SIZE, DEFAULT_STACK_LOCATION};
use simple_vm::registers::ALL_REGISTERS;
use simple_vm::{assemble, Program, StdConsole, VirtualMachine, VmConfig};

#[derive(Parser, Debug)]
#[command(name = "simple_vm", version, about = "Assemble and run SimpleVM programs")]
struct Cli {
    /// Raise log verbosity (-v debug, -vv trace). RUST_LOG overrides.
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Assemble a source file and execute it until it halts or faults.
    Run {
        file: PathBuf,
        #[arg(long, default_value_t = DEFAULT_MEMORY_SIZE)]
        memory_size: usize,
        #[arg(long, default_value_t = DEFAULT_STACK_LOCATION)]
        stack_location: usize,
        /// Treat DBG as a no-op instead of opening the debugger.
        #[arg(long)]
        no_debugger: bool,
        /// Print the registers after the run.
        #[arg(long)]
        dump: bool,
    },
    /// Assemble a source file and print its listing.
    Disasm { file: PathBuf },
}

fn init_tracing(verbose: u8) {
    let default = match verbose {
        0 => "warn",
        1 => "debug",
        _ => "trace",
    };
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}

fn load_source(file: &Path) -> Result<Program> {
    let source = fs::read_to_string(file)
        .with_context(|| format!("failed to read {}", file.display()))?;
    assemble(&source).with_context(|| format!("failed to assemble {}", file.display()))
}

fn dump_registers(vm: &VirtualMachine) {
    eprintln!("IP: {}", vm.ip());
    for reg in ALL_REGISTERS {
        eprintln!("{}: {}", reg, vm.register(reg));
    }
    eprintln!(
        "Flags: EF={} ZF={} DF={}",
        vm.flags().get(simple_vm::Flag::Equal),
        vm.flags().get(simple_vm::Flag::Zero),
        vm.flags().get(simple_vm::Flag::Direction)
    );
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Command::Run {
            file,
            memory_size,
            stack_location,
            no_debugger,
            dump,
        } => {
            let program = load_source(&file)?;
            let config = VmConfig::default()
                .with_memory_size(memory_size)
                .with_stack_location(stack_location)
                .with_debugger(!no_debugger);
            let mut vm = VirtualMachine::new(config)?;
            vm.load(&program)
                .with_context(|| format!("program does not fit in {} cells", memory_size))?;

            let report = vm.run(&mut StdConsole::new());
            if dump {
                dump_registers(&vm);
            }
            if let Some(err) = report.fault() {
                eprintln!("\n--- VM Runtime Error ---");
                eprintln!("{} (ip {}, {} steps)", err, report.ip, report.steps);
                if !dump {
                    dump_registers(&vm);
                }
                process::exit(1);
            }
        }
        Command::Disasm { file } => {
            let program = load_source(&file)?;
            print!("{}", program.listing());
        }
    }
    Ok(())
}
