//! Two-pass assembler.
//!
//! Pass 1 walks the tokenized lines in order, binding labels at the current
//! address and emitting machine words; symbolic address operands are left as
//! 0 placeholders and recorded on a patch list. `=n` literal operands gather
//! in a pool that is flushed after the last line. Pass 2 drains the patch
//! list against the completed label table. Deferring resolution this way
//! lets forward references assemble without a relocation pass over raw
//! words, and makes patching order-independent.

use fxhash::{FxBuildHasher, FxHashMap};
use indexmap::IndexMap;
use miette::Result;

use crate::error;
use crate::isa::{self, Opcode};
use crate::lexer::{self, Line, Token};
use crate::memory::Memory;
use crate::symbol::{self, LabelTable, Patch, Reg};

/// Result of assembling one source file.
pub struct Assembly {
    pub memory: Memory,
    pub labels: LabelTable,
    /// Each emitted word's address back to its zero-based source line.
    pub line_map: FxHashMap<u16, usize>,
    /// Address the first word was emitted at; execution starts here.
    pub base: u16,
    /// One past the last emitted word.
    pub end: u16,
}

/// Assemble source text into memory starting at `base`.
pub fn assemble(src: &str, base: u16) -> Result<Assembly> {
    let lines = lexer::tokenize(src)?;
    let mut asm = Assembler {
        src,
        memory: Memory::new(),
        labels: LabelTable::new(),
        patches: Vec::new(),
        pool: IndexMap::default(),
        line_map: FxHashMap::default(),
        addr: base,
    };
    for line in &lines {
        asm.analyze_line(line)?;
    }
    asm.flush_pool();
    asm.backpatch()?;
    Ok(Assembly {
        memory: asm.memory,
        labels: asm.labels,
        line_map: asm.line_map,
        base,
        end: asm.addr,
    })
}

struct Assembler<'a> {
    src: &'a str,
    memory: Memory,
    labels: LabelTable,
    patches: Vec<Patch>,
    /// Literal operand pool: value -> sites awaiting its address.
    pool: IndexMap<u16, Vec<u16>, FxBuildHasher>,
    line_map: FxHashMap<u16, usize>,
    addr: u16,
}

impl<'a> Assembler<'a> {
    fn analyze_line(&mut self, line: &Line<'a>) -> Result<()> {
        if let Some(label) = line.label {
            if self.labels.bind(label.text, self.addr).is_err() {
                return Err(error::asm_duplicate_label(label.span, self.src));
            }
        }
        let Some(mnemonic) = line.mnemonic else {
            return Ok(());
        };

        match mnemonic.text.to_ascii_uppercase().as_str() {
            // Start/end markers allocate nothing; the entry point is the
            // assembly base address.
            "START" | "END" => Ok(()),
            "DC" => {
                let tok = self.pseudo_operand(line, mnemonic, "DC takes one literal value")?;
                let value = self.parse_literal(tok)?;
                self.emit(value, line.index);
                Ok(())
            }
            "DS" => {
                let tok = self.pseudo_operand(line, mnemonic, "DS takes one size literal")?;
                let size = self.parse_literal(tok)?;
                if (size as i16) < 0 {
                    return Err(error::asm_invalid_pseudo(
                        tok.span,
                        self.src,
                        "storage size cannot be negative",
                    ));
                }
                // A single word is reserved regardless of the requested size.
                self.emit(0, line.index);
                Ok(())
            }
            "RET" => {
                if !line.operands.is_empty() {
                    return Err(error::asm_bad_operands(
                        mnemonic.span,
                        self.src,
                        "RET takes no operands",
                    ));
                }
                self.emit(isa::pack(Opcode::Ret, 0, 0), line.index);
                Ok(())
            }
            "SVC" => self.assemble_svc(line, mnemonic),
            _ => self.assemble_instr(line, mnemonic),
        }
    }

    fn assemble_instr(&mut self, line: &Line<'a>, mnemonic: Token<'a>) -> Result<()> {
        let Some(spec) = isa::mnemonic(mnemonic.text) else {
            return Err(error::asm_unknown_mnemonic(mnemonic.span, self.src));
        };
        let ops = &line.operands;
        let as_reg = |tok: &Token| tok.text.parse::<Reg>().ok();

        // OP r1,r2
        if let [a, b] = ops[..] {
            if let (Some(r1), Some(r2)) = (as_reg(&a), as_reg(&b)) {
                let Some(op) = spec.reg_reg else {
                    return Err(error::asm_bad_operands(
                        mnemonic.span,
                        self.src,
                        "this instruction has no register-register form",
                    ));
                };
                self.emit(
                    isa::pack(op, r1.index() as u16, r2.index() as u16),
                    line.index,
                );
                return Ok(());
            }
        }

        // OP r,adr[,x]
        if let Some(op) = spec.reg_adr {
            if (2..=3).contains(&ops.len()) {
                if let Some(r) = as_reg(&ops[0]) {
                    let x = self.index_field(ops.get(2))?;
                    self.emit(isa::pack(op, r.index() as u16, x), line.index);
                    self.emit_addr_operand(&ops[1], line.index)?;
                    return Ok(());
                }
            }
        }

        // OP adr[,x]
        if let Some(op) = spec.adr {
            if (1..=2).contains(&ops.len()) {
                let x = self.index_field(ops.get(1))?;
                self.emit(isa::pack(op, 0, x), line.index);
                self.emit_addr_operand(&ops[0], line.index)?;
                return Ok(());
            }
        }

        Err(error::asm_bad_operands(
            mnemonic.span,
            self.src,
            "check the operand forms this instruction accepts",
        ))
    }

    /// `SVC n,adr,adr`: the sub-type rides in the low nibble, the two
    /// address operands in the two following words.
    fn assemble_svc(&mut self, line: &Line<'a>, mnemonic: Token<'a>) -> Result<()> {
        let [kind, a, b] = line.operands[..] else {
            return Err(error::asm_bad_operands(
                mnemonic.span,
                self.src,
                "SVC takes a sub-type and two addresses",
            ));
        };
        let kind_val = self.parse_literal(kind)?;
        if kind_val > 0xF {
            return Err(error::asm_bad_literal(kind.span, self.src));
        }
        self.emit(isa::pack(Opcode::Svc, 0, kind_val), line.index);
        self.emit_addr_operand(&a, line.index)?;
        self.emit_addr_operand(&b, line.index)?;
        Ok(())
    }

    /// Resolve an optional index-register operand to its 4-bit field.
    fn index_field(&self, tok: Option<&Token<'a>>) -> Result<u16> {
        let Some(tok) = tok else {
            return Ok(0);
        };
        match tok.text.parse::<Reg>() {
            Ok(Reg::Gr0) => Err(error::asm_gr0_index(tok.span, self.src)),
            Ok(r) => Ok(r.index() as u16),
            Err(()) => Err(error::asm_bad_operands(
                tok.span,
                self.src,
                "the index operand must be a general register",
            )),
        }
    }

    /// Emit the second (address) word of an instruction: a literal resolves
    /// immediately, a label leaves a placeholder on the patch list, and an
    /// `=n` literal operand leaves a placeholder on the pool.
    fn emit_addr_operand(&mut self, tok: &Token<'a>, index: usize) -> Result<()> {
        let at = self.addr;
        if let Some(rest) = tok.text.strip_prefix('=') {
            let Some(value) = parse_int(rest) else {
                return Err(error::asm_bad_literal(tok.span, self.src));
            };
            self.pool.entry(value).or_default().push(at);
            self.emit(0, index);
        } else if let Some(value) = parse_int(tok.text) {
            self.emit(value, index);
        } else if symbol::is_ident(tok.text) {
            if tok.text.parse::<Reg>().is_ok() {
                return Err(error::asm_bad_operands(
                    tok.span,
                    self.src,
                    "a register cannot be used as an address",
                ));
            }
            self.patches.push(Patch {
                at,
                label: tok.text.to_string(),
                span: tok.span,
            });
            self.emit(0, index);
        } else {
            return Err(error::asm_bad_literal(tok.span, self.src));
        }
        Ok(())
    }

    fn pseudo_operand(
        &self,
        line: &Line<'a>,
        mnemonic: Token<'a>,
        help: &str,
    ) -> Result<Token<'a>> {
        match line.operands[..] {
            [tok] => Ok(tok),
            _ => Err(error::asm_invalid_pseudo(mnemonic.span, self.src, help)),
        }
    }

    fn parse_literal(&self, tok: Token<'a>) -> Result<u16> {
        parse_int(tok.text).ok_or_else(|| error::asm_bad_literal(tok.span, self.src))
    }

    fn emit(&mut self, word: u16, index: usize) {
        self.memory.set(self.addr, word);
        self.line_map.insert(self.addr, index);
        self.addr = self.addr.wrapping_add(1);
    }

    /// Place one word per distinct pooled literal and point every recorded
    /// site at it.
    fn flush_pool(&mut self) {
        for (value, sites) in std::mem::take(&mut self.pool) {
            let at = self.addr;
            self.memory.set(at, value);
            self.addr = self.addr.wrapping_add(1);
            for site in sites {
                self.memory.set(site, at);
            }
        }
    }

    /// Pass 2: overwrite every placeholder with its label's bound address.
    fn backpatch(&mut self) -> Result<()> {
        for patch in &self.patches {
            match self.labels.get(&patch.label) {
                Some(addr) => self.memory.set(patch.at, addr),
                None => return Err(error::asm_undefined_label(patch.span, self.src)),
            }
        }
        Ok(())
    }
}

/// Parse a decimal (optionally negative) or `#hex` integer into a word.
fn parse_int(text: &str) -> Option<u16> {
    if let Some(hex) = text.strip_prefix('#') {
        return u16::from_str_radix(hex, 16).ok();
    }
    text.parse::<i32>()
        .ok()
        .filter(|v| (-0x8000..=0xFFFF).contains(v))
        .map(|v| v as u16)
}
