//! Interactive single-step driver.
//!
//! The debugger owns nothing of the execution model; it reads commands from
//! an argument string or stdin and drives [`Machine::step`] one instruction
//! per action, so input for the program's SVC instruction can be supplied
//! between steps.

use std::collections::VecDeque;
use std::io::{self, BufRead as _, IsTerminal, Write as _};

use colored::Colorize;
use miette::Result;

use crate::machine::{Console, Machine};
use crate::output;

/// Leave this as a struct, in case more options are added in the future.
#[derive(Debug)]
pub struct DebuggerOptions {
    /// Read debugger commands from this string instead of stdin.
    pub command: Option<String>,
}

pub struct Debugger<'a> {
    machine: &'a mut Machine,
    source: CommandSource,
    /// Cleared once RET has been reached.
    running: bool,
}

enum CommandSource {
    /// Commands from `--command`, split on `;` and newlines.
    Argument(VecDeque<String>),
    Stdin,
}

impl CommandSource {
    fn from(argument: Option<String>) -> Self {
        match argument {
            Some(arg) => CommandSource::Argument(
                arg.split([';', '\n'])
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect(),
            ),
            None => CommandSource::Stdin,
        }
    }

    /// `None` indicates EOF.
    fn read(&mut self) -> Option<String> {
        match self {
            CommandSource::Argument(queue) => queue.pop_front(),
            CommandSource::Stdin => {
                let stdin = io::stdin();
                if stdin.is_terminal() {
                    eprint!("{} ", "(twill)".cyan());
                    let _ = io::stderr().flush();
                }
                let mut buf = String::new();
                match stdin.lock().read_line(&mut buf) {
                    Ok(0) | Err(_) => None,
                    Ok(_) => Some(buf.trim().to_string()),
                }
            }
        }
    }
}

#[derive(Debug, PartialEq, Eq)]
enum Command {
    Step { count: u16 },
    Continue,
    Registers,
    Memory { addr: u16, count: u16 },
    Help,
    Quit,
}

impl Command {
    fn parse(line: &str) -> Result<Command, String> {
        let mut words = line.split_whitespace();
        let head = words.next().expect("caller skips empty lines");
        let command = match head {
            "s" | "step" => {
                let count = match words.next() {
                    Some(word) => parse_u16(word)
                        .ok_or_else(|| format!("invalid step count `{word}`"))?
                        .max(1),
                    None => 1,
                };
                Command::Step { count }
            }
            "c" | "continue" => Command::Continue,
            "r" | "registers" => Command::Registers,
            "m" | "memory" => {
                let addr = words
                    .next()
                    .ok_or_else(|| "`memory` needs an address".to_string())?;
                let addr =
                    parse_u16(addr).ok_or_else(|| format!("invalid address `{addr}`"))?;
                let count = match words.next() {
                    Some(word) => parse_u16(word)
                        .ok_or_else(|| format!("invalid word count `{word}`"))?
                        .max(1),
                    None => 1,
                };
                Command::Memory { addr, count }
            }
            "h" | "help" => Command::Help,
            "q" | "quit" => Command::Quit,
            other => return Err(format!("unknown command `{other}`")),
        };
        if words.next().is_some() {
            return Err(format!("too many arguments for `{head}`"));
        }
        Ok(command)
    }
}

fn parse_u16(text: &str) -> Option<u16> {
    if let Some(hex) = text.strip_prefix('#') {
        return u16::from_str_radix(hex, 16).ok();
    }
    text.parse().ok()
}

const HELP: &str = "\
  s, step [n]        execute the next n instructions (default 1)
  c, continue        execute until RET
  r, registers       show the register file
  m, memory A [n]    show n words starting at address A (decimal or #hex)
  h, help            show this text
  q, quit            leave the debugger";

impl<'a> Debugger<'a> {
    /// Position the machine at `start` and prepare the command source.
    pub fn new(machine: &'a mut Machine, start: u16, opts: DebuggerOptions) -> Self {
        machine.registers_mut().set_pc(start);
        Debugger {
            machine,
            source: CommandSource::from(opts.command),
            running: true,
        }
    }

    pub fn run(&mut self, io: &mut dyn Console) -> Result<()> {
        eprintln!("{}", "Type `help` for available commands.".dimmed());
        self.echo_pc();
        loop {
            let Some(line) = self.source.read() else {
                break;
            };
            if line.is_empty() {
                continue;
            }
            let command = match Command::parse(&line) {
                Ok(command) => command,
                Err(message) => {
                    eprintln!("{}", message.red());
                    eprintln!("{}", "Type `help` for a list of commands.".red());
                    continue;
                }
            };
            match command {
                Command::Quit => break,
                Command::Help => eprintln!("{HELP}"),
                Command::Registers => output::print_registers(self.machine.registers()),
                Command::Memory { addr, count } => {
                    for i in 0..count {
                        let at = addr.wrapping_add(i);
                        eprintln!("{:04X}  {:04X}", at, self.machine.memory().get(at));
                    }
                }
                Command::Step { count } => {
                    self.advance(io, Some(count))?;
                }
                Command::Continue => {
                    self.advance(io, None)?;
                }
            }
        }
        Ok(())
    }

    /// Step up to `limit` instructions, or until RET when `limit` is `None`.
    fn advance(&mut self, io: &mut dyn Console, limit: Option<u16>) -> Result<()> {
        if !self.running {
            eprintln!("{}", "Program has halted.".yellow());
            return Ok(());
        }
        let mut steps = 0u16;
        loop {
            if limit.is_some_and(|n| steps >= n) {
                break;
            }
            if !self.machine.step(io)? {
                self.running = false;
                eprintln!("{}", "Reached RET. Program halted.".yellow());
                return Ok(());
            }
            steps += 1;
        }
        self.echo_pc();
        Ok(())
    }

    fn echo_pc(&self) {
        let pc = self.machine.registers().pc();
        eprintln!(
            "{} 0x{:04x}  (word 0x{:04x})",
            "PC at".dimmed(),
            pc,
            self.machine.memory().get(pc)
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assembler::assemble;
    use crate::machine::ScriptedConsole;

    #[test]
    fn parse_commands() {
        assert_eq!(Command::parse("step"), Ok(Command::Step { count: 1 }));
        assert_eq!(Command::parse("s 5"), Ok(Command::Step { count: 5 }));
        assert_eq!(
            Command::parse("m #10 4"),
            Ok(Command::Memory { addr: 0x10, count: 4 })
        );
        assert_eq!(Command::parse("q"), Ok(Command::Quit));
        assert!(Command::parse("bogus").is_err());
        assert!(Command::parse("step 5 6").is_err());
        assert!(Command::parse("memory").is_err());
    }

    #[test]
    fn scripted_session_steps_to_halt() {
        let src = "
  LD GR1,=5
  LD GR2,=3
  SUBA GR1,GR2
  RET
";
        let asm = assemble(src, 0).unwrap();
        let mut machine = Machine::new(asm.memory);
        let opts = DebuggerOptions { command: Some("step 2; registers; continue".into()) };
        let mut io = ScriptedConsole::default();
        Debugger::new(&mut machine, asm.base, opts).run(&mut io).unwrap();
        assert_eq!(machine.registers().general(crate::symbol::Reg::Gr1), 2);
        // Halted on the RET word.
        assert_eq!(machine.registers().pc(), 5);
    }

    #[test]
    fn halted_machine_stays_halted() {
        let asm = assemble("  RET", 0).unwrap();
        let mut machine = Machine::new(asm.memory);
        let opts = DebuggerOptions { command: Some("continue; step; quit".into()) };
        let mut io = ScriptedConsole::default();
        Debugger::new(&mut machine, asm.base, opts).run(&mut io).unwrap();
        assert_eq!(machine.registers().pc(), 0);
    }
}
