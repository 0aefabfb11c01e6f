use miette::{miette, LabeledSpan, Report, Severity};

use crate::symbol::Span;

// Lexer errors

pub fn lex_bad_label(span: Span, src: &str) -> Report {
    miette!(
        severity = Severity::Error,
        code = "lex::label",
        help = "labels start with a letter and contain only letters, digits and underscores.",
        labels = vec![LabeledSpan::at(span, "incorrect label")],
        "Encountered an invalid label name.",
    )
    .with_source_code(src.to_string())
}

pub fn lex_empty_operand(span: Span, src: &str) -> Report {
    miette!(
        severity = Severity::Error,
        code = "lex::operand",
        help = "remove the stray comma or fill in the missing operand.",
        labels = vec![LabeledSpan::at(span, "empty operand")],
        "Encountered an empty operand.",
    )
    .with_source_code(src.to_string())
}

pub fn lex_malformed_operand(span: Span, src: &str) -> Report {
    miette!(
        severity = Severity::Error,
        code = "lex::operand",
        help = "operands are separated by commas, not spaces.",
        labels = vec![LabeledSpan::at(span, "malformed operand")],
        "Encountered an operand containing whitespace.",
    )
    .with_source_code(src.to_string())
}

// Assembler errors

pub fn asm_unknown_mnemonic(span: Span, src: &str) -> Report {
    miette!(
        severity = Severity::Error,
        code = "asm::mnemonic",
        help = "check the list of available mnemonics in the documentation.",
        labels = vec![LabeledSpan::at(span, "unknown mnemonic")],
        "Encountered an unknown mnemonic.",
    )
    .with_source_code(src.to_string())
}

pub fn asm_duplicate_label(span: Span, src: &str) -> Report {
    miette!(
        severity = Severity::Error,
        code = "asm::duplicate_label",
        help = "labels are only allowed once per file",
        labels = vec![LabeledSpan::at(span, "duplicate label")],
        "Duplicate label",
    )
    .with_source_code(src.to_string())
}

pub fn asm_invalid_pseudo(span: Span, src: &str, help: &str) -> Report {
    miette!(
        severity = Severity::Error,
        code = "asm::pseudo",
        help = help,
        labels = vec![LabeledSpan::at(span, "malformed pseudo-instruction")],
        "Malformed pseudo-instruction.",
    )
    .with_source_code(src.to_string())
}

pub fn asm_bad_literal(span: Span, src: &str) -> Report {
    miette!(
        severity = Severity::Error,
        code = "asm::literal",
        help = "decimal ranges from -32,768 to 65,535 are allowed; hex literals start with #",
        labels = vec![LabeledSpan::at(span, "incorrect literal")],
        "Encountered an invalid literal.",
    )
    .with_source_code(src.to_string())
}

pub fn asm_bad_operands(span: Span, src: &str, help: &str) -> Report {
    miette!(
        severity = Severity::Error,
        code = "asm::operands",
        help = help,
        labels = vec![LabeledSpan::at(span, "unexpected operands")],
        "Operands do not match any form of this instruction.",
    )
    .with_source_code(src.to_string())
}

pub fn asm_gr0_index(span: Span, src: &str) -> Report {
    miette!(
        severity = Severity::Error,
        code = "asm::index",
        help = "an index field of 0 encodes \"no indexing\", so GR0 cannot be named here.",
        labels = vec![LabeledSpan::at(span, "GR0 used as index")],
        "GR0 cannot be used as an index register.",
    )
    .with_source_code(src.to_string())
}

pub fn asm_undefined_label(span: Span, src: &str) -> Report {
    miette!(
        severity = Severity::Error,
        code = "asm::undefined_label",
        help = "every referenced label must be defined somewhere in the file.",
        labels = vec![LabeledSpan::at(span, "undefined label")],
        "Reference to undefined label.",
    )
    .with_source_code(src.to_string())
}

// Runtime errors. No spans here: the offending word came from memory, so
// the opcode and program counter are the diagnosis.

pub fn run_undefined_opcode(opcode: u16, pc: u16) -> Report {
    miette!(
        severity = Severity::Error,
        code = "run::undefined_opcode",
        help = "the program counter may have run into data or unset memory.",
        "Undefined opcode 0x{:02X} at address 0x{:04X}.",
        opcode,
        pc,
    )
}

pub fn run_invalid_register(nibble: u16, pc: u16) -> Report {
    miette!(
        severity = Severity::Error,
        code = "run::invalid_register",
        help = "general registers are numbered 0 through 7.",
        "Invalid register {} in instruction at address 0x{:04X}.",
        nibble,
        pc,
    )
}
