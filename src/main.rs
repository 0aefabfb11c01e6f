use std::fs;
use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use colored::Colorize;
use miette::{IntoDiagnostic, Result};

use twill::{assemble, output, Debugger, DebuggerOptions, Machine, StdConsole};

/// Twill is an assembler & interpreter toolchain for the COMET II educational architecture.
#[derive(Parser)]
#[command(version)]
struct Args {
    #[command(subcommand)]
    command: Option<Command>,

    /// Quickly provide a source file to run
    path: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Command {
    /// Assemble and run a source file, printing program output
    Run {
        /// Source file to run
        name: PathBuf,
        /// Address to assemble into and start execution at
        #[arg(short, long, default_value_t = 0)]
        base: u16,
        /// Produce minimal output, suited for blackbox tests
        #[arg(short, long)]
        minimal: bool,
    },
    /// Assemble a source file and run it one instruction at a time
    Debug {
        /// Source file to run
        name: PathBuf,
        /// Read debugger commands from argument
        #[arg(short, long)]
        command: Option<String>,
        /// Address to assemble into and start execution at
        #[arg(short, long, default_value_t = 0)]
        base: u16,
        /// Produce minimal output, suited for blackbox tests
        #[arg(short, long)]
        minimal: bool,
    },
    /// Check a source file without running it
    Check {
        /// File to check
        name: PathBuf,
    },
    /// Assemble a source file and print the memory listing
    Dump {
        /// Source file to assemble
        name: PathBuf,
        /// Address to assemble into
        #[arg(short, long, default_value_t = 0)]
        base: u16,
        /// Produce minimal output, suited for blackbox tests
        #[arg(short, long)]
        minimal: bool,
    },
}

fn main() -> miette::Result<()> {
    use MsgColor::*;
    let args = Args::parse();

    miette::set_hook(Box::new(|_| {
        Box::new(
            miette::MietteHandlerOpts::new() //
                .context_lines(twill::DIAGNOSTIC_CONTEXT_LINES)
                .build(),
        )
    }))?;

    if let Some(command) = args.command {
        match command {
            Command::Run { name, base, minimal } => run(&name, base, None, minimal),
            Command::Debug { name, command, base, minimal } => {
                run(&name, base, Some(DebuggerOptions { command }), minimal)
            }
            Command::Check { name } => {
                file_message(Green, "Checking", &name);
                let src = read_source(&name)?;
                let _ = assemble(&src, 0)?;
                message(Green, "Success", "no errors found!");
                Ok(())
            }
            Command::Dump { name, base, minimal } => {
                output::set_minimal(minimal);
                let src = read_source(&name)?;
                let asm = assemble(&src, base)?;
                output::print_listing(&asm, &src);
                Ok(())
            }
        }
    } else if let Some(path) = args.path {
        run(&path, 0, None, false)
    } else {
        println!("\n~ twill v{VERSION} ~");
        println!("{SHORT_INFO}");
        Ok(())
    }
}

fn run(
    name: &Path,
    base: u16,
    debugger_opts: Option<DebuggerOptions>,
    minimal: bool,
) -> Result<()> {
    use MsgColor::*;
    output::set_minimal(minimal);

    if !minimal {
        file_message(Green, "Assembling", name);
    }
    let src = read_source(name)?;
    let asm = assemble(&src, base)?;

    let mut machine = Machine::new(asm.memory);
    let mut io = StdConsole;

    match debugger_opts {
        Some(opts) => {
            Debugger::new(&mut machine, asm.base, opts).run(&mut io)?;
        }
        None => {
            if !minimal {
                message(Green, "Running", "assembled program");
            }
            machine.execute(&mut io, asm.base)?;
            if !minimal {
                file_message(Green, "Completed", name);
            }
        }
    }
    Ok(())
}

fn read_source(name: &Path) -> Result<String> {
    fs::read_to_string(name).into_diagnostic()
}

#[allow(unused)]
enum MsgColor {
    Green,
    Cyan,
    Red,
}

fn file_message(color: MsgColor, left: &str, right: &Path) {
    let right = format!("target {}", right.display());
    message(color, left, &right);
}

// Status messages stay on stderr so program output owns stdout.
fn message<S>(color: MsgColor, left: S, right: S)
where
    S: Colorize + std::fmt::Display,
{
    let left = match color {
        MsgColor::Green => left.green(),
        MsgColor::Cyan => left.cyan(),
        MsgColor::Red => left.red(),
    };
    eprintln!("{left:>12} {right}");
}

const SHORT_INFO: &str = r"
Welcome to twill, an assembler & interpreter toolchain for the
COMET II educational architecture. Please use `-h` or `--help`
to access the usage instructions and documentation.
";

const VERSION: &str = env!("CARGO_PKG_VERSION");
