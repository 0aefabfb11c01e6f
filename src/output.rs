//! Register and memory dump formatting.
//!
//! Decorated output goes through here so that `--minimal` can strip it down
//! to a stable, grep-friendly form for blackbox tests. Status and debugger
//! text lands on stderr; program output owns stdout.

use std::cell::RefCell;

use colored::Colorize;

use crate::assembler::Assembly;
use crate::memory::Registers;

thread_local! {
    static IS_MINIMAL: RefCell<bool> = const { RefCell::new(false) };
}

pub fn set_minimal(value: bool) {
    IS_MINIMAL.with(|minimal| *minimal.borrow_mut() = value);
}

pub fn is_minimal() -> bool {
    IS_MINIMAL.with(|minimal| *minimal.borrow())
}

/// Print the register file to stderr.
pub fn print_registers(reg: &Registers) {
    if is_minimal() {
        for (i, value) in reg.iter_general().enumerate() {
            eprintln!("GR{} {}", i, value);
        }
        eprintln!("PC {}", reg.pc());
        eprintln!("FR {:03b}", reg.flags().bits());
        return;
    }

    eprintln!("{}", "┌──────────────────────────────────┐".dimmed());
    eprintln!("{}", "│          hex      int       char │".dimmed());
    for (i, value) in reg.iter_general().enumerate() {
        eprintln!(
            "{} {} {} {}",
            "│".dimmed(),
            format!("GR{}", i).bold(),
            integer_columns(value),
            "│".dimmed()
        );
    }
    eprintln!(
        "{} {}  0x{:04x}   {} {:03b}           {}",
        "│".dimmed(),
        "PC".bold(),
        reg.pc(),
        "FR".bold(),
        reg.flags().bits(),
        "│".dimmed()
    );
    eprintln!("{}", "└──────────────────────────────────┘".dimmed());
}

/// hex / signed int / char columns for one word.
fn integer_columns(value: u16) -> String {
    format!("0x{:04x}  {:>6}     {}", value, value as i16, char_display(value))
}

fn char_display(value: u16) -> String {
    match value {
        // Printable ASCII
        0x21..=0x7e => format!("'{}' ", value as u8 as char),
        0x20 => "[_] ".to_string(),
        0x0a => "LF  ".to_string(),
        0x0d => "CR  ".to_string(),
        0x00 => "NUL ".to_string(),
        _ => "─── ".to_string(),
    }
}

/// Print the assembled memory listing to stdout: address, word, bound
/// labels, and the originating source line.
pub fn print_listing(asm: &Assembly, src: &str) {
    let lines: Vec<&str> = src.lines().collect();
    let mut label_at: fxhash::FxHashMap<u16, &str> = fxhash::FxHashMap::default();
    for (name, addr) in asm.labels.iter() {
        label_at.insert(addr, name);
    }

    for addr in asm.base..asm.end {
        let word = asm.memory.get(addr);
        if is_minimal() {
            println!("{:04X} {:04X}", addr, word);
            continue;
        }
        let label = label_at.get(&addr).copied().unwrap_or("");
        let source = asm
            .line_map
            .get(&addr)
            .and_then(|i| lines.get(*i))
            .map(|s| s.trim())
            .unwrap_or("");
        println!(
            "{}  {:04X}  {:<8} {}",
            format!("{:04X}", addr).dimmed(),
            word,
            label.bold(),
            source.dimmed()
        );
    }
}
