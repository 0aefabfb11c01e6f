//! Fetch-decode-execute engine.
//!
//! Instructions decode into a plain enum with operands already resolved
//! (including base+index effective addresses), then apply against the
//! register file and word store. Each executed instruction reports how many
//! words it occupied; 0 means it repositioned the program counter itself.
//! The SVC instruction is the one place the engine calls out of the machine,
//! through the injected [`Console`].

use std::collections::VecDeque;
use std::io::{self, Write as _};

use miette::{miette, Result};

use crate::error;
use crate::isa::{self, Opcode};
use crate::memory::{Memory, Registers};
use crate::symbol::Reg;

/// External I/O collaborator for the SVC instruction.
pub trait Console {
    /// Prompt for and return one line of input. Blocks until it arrives;
    /// this is the engine's only suspension point.
    fn request_line(&mut self) -> Result<String>;
    /// Deliver one line of output.
    fn emit(&mut self, text: &str);
}

/// Console backed by process stdin/stdout.
pub struct StdConsole;

impl Console for StdConsole {
    fn request_line(&mut self) -> Result<String> {
        eprint!("? ");
        let _ = io::stderr().flush();
        let mut buf = String::new();
        io::stdin()
            .read_line(&mut buf)
            .map_err(|e| miette!(code = "run::input", "failed to read input line: {e}"))?;
        while buf.ends_with('\n') || buf.ends_with('\r') {
            buf.pop();
        }
        Ok(buf)
    }

    fn emit(&mut self, text: &str) {
        println!("{text}");
        let _ = io::stdout().flush();
    }
}

/// Console with canned input and captured output, for scripted drivers and
/// tests.
#[derive(Default)]
pub struct ScriptedConsole {
    pub input: VecDeque<String>,
    pub output: Vec<String>,
}

impl ScriptedConsole {
    pub fn with_input<I, S>(lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        ScriptedConsole {
            input: lines.into_iter().map(Into::into).collect(),
            output: Vec::new(),
        }
    }
}

impl Console for ScriptedConsole {
    fn request_line(&mut self) -> Result<String> {
        self.input
            .pop_front()
            .ok_or_else(|| miette!(code = "run::input", "input requested but none was scripted"))
    }

    fn emit(&mut self, text: &str) {
        self.output.push(text.to_string());
    }
}

/// A decoded instruction, operands resolved and ready to apply.
#[derive(Clone, Copy, Debug)]
enum Instr {
    AndReg(Reg, Reg),
    AndMem(Reg, u16),
    OrReg(Reg, Reg),
    OrMem(Reg, u16),
    XorReg(Reg, Reg),
    XorMem(Reg, u16),
    LdReg(Reg, Reg),
    LdMem(Reg, u16),
    Lad(Reg, u16),
    St(Reg, u16),
    AddaReg(Reg, Reg),
    AddaMem(Reg, u16),
    SubaReg(Reg, Reg),
    SubaMem(Reg, u16),
    CpaReg(Reg, Reg),
    CpaMem(Reg, u16),
    Jump(u16),
    Jze(u16),
    Jnz(u16),
    Jmi(u16),
    Jpl(u16),
    Svc { kind: u16, a: u16, b: u16 },
    Ret,
}

/// Owns the word store and register file and drives the instruction loop,
/// either to completion or one step at a time.
pub struct Machine {
    mem: Memory,
    reg: Registers,
}

impl Machine {
    pub fn new(memory: Memory) -> Self {
        Machine { mem: memory, reg: Registers::new() }
    }

    pub fn memory(&self) -> &Memory {
        &self.mem
    }

    pub fn memory_mut(&mut self) -> &mut Memory {
        &mut self.mem
    }

    pub fn registers(&self) -> &Registers {
        &self.reg
    }

    pub fn registers_mut(&mut self) -> &mut Registers {
        &mut self.reg
    }

    /// Run from `start` until RET or a fatal decode error.
    pub fn execute(&mut self, io: &mut dyn Console, start: u16) -> Result<()> {
        self.reg.set_pc(start);
        while self.step(io)? {}
        Ok(())
    }

    /// Execute exactly one instruction at the current program counter.
    /// Returns `false` once RET is reached; the counter then stays on the
    /// RET word.
    pub fn step(&mut self, io: &mut dyn Console) -> Result<bool> {
        let pc = self.reg.pc();
        let instr = self.decode(pc)?;
        if let Instr::Ret = instr {
            return Ok(false);
        }
        let step = self.exec(instr, io)?;
        if step > 0 {
            self.reg.set_pc(pc.wrapping_add(step));
        }
        Ok(true)
    }

    /// Decode the instruction at `pc` without touching any state.
    fn decode(&self, pc: u16) -> Result<Instr> {
        let word = self.mem.get(pc);
        let Some(opcode) = Opcode::from_word(word) else {
            return Err(error::run_undefined_opcode(word >> 8, pc));
        };
        let gr1 = isa::gr1_field(word);
        let gr2 = isa::gr2_field(word);

        Ok(match opcode {
            Opcode::LdReg => Instr::LdReg(self.reg_at(gr1, pc)?, self.reg_at(gr2, pc)?),
            Opcode::AndReg => Instr::AndReg(self.reg_at(gr1, pc)?, self.reg_at(gr2, pc)?),
            Opcode::OrReg => Instr::OrReg(self.reg_at(gr1, pc)?, self.reg_at(gr2, pc)?),
            Opcode::XorReg => Instr::XorReg(self.reg_at(gr1, pc)?, self.reg_at(gr2, pc)?),
            Opcode::AddaReg => Instr::AddaReg(self.reg_at(gr1, pc)?, self.reg_at(gr2, pc)?),
            Opcode::SubaReg => Instr::SubaReg(self.reg_at(gr1, pc)?, self.reg_at(gr2, pc)?),
            Opcode::CpaReg => Instr::CpaReg(self.reg_at(gr1, pc)?, self.reg_at(gr2, pc)?),

            Opcode::LdMem => Instr::LdMem(self.reg_at(gr1, pc)?, self.effective_address(word, pc)?),
            Opcode::Lad => Instr::Lad(self.reg_at(gr1, pc)?, self.effective_address(word, pc)?),
            Opcode::St => Instr::St(self.reg_at(gr1, pc)?, self.effective_address(word, pc)?),
            Opcode::AndMem => Instr::AndMem(self.reg_at(gr1, pc)?, self.effective_address(word, pc)?),
            Opcode::OrMem => Instr::OrMem(self.reg_at(gr1, pc)?, self.effective_address(word, pc)?),
            Opcode::XorMem => Instr::XorMem(self.reg_at(gr1, pc)?, self.effective_address(word, pc)?),
            Opcode::AddaMem => Instr::AddaMem(self.reg_at(gr1, pc)?, self.effective_address(word, pc)?),
            Opcode::SubaMem => Instr::SubaMem(self.reg_at(gr1, pc)?, self.effective_address(word, pc)?),
            Opcode::CpaMem => Instr::CpaMem(self.reg_at(gr1, pc)?, self.effective_address(word, pc)?),

            Opcode::Jump => Instr::Jump(self.effective_address(word, pc)?),
            Opcode::Jze => Instr::Jze(self.effective_address(word, pc)?),
            Opcode::Jnz => Instr::Jnz(self.effective_address(word, pc)?),
            Opcode::Jmi => Instr::Jmi(self.effective_address(word, pc)?),
            Opcode::Jpl => Instr::Jpl(self.effective_address(word, pc)?),

            // SVC address operands are raw, not indexed.
            Opcode::Svc => Instr::Svc {
                kind: gr2,
                a: self.mem.get(pc.wrapping_add(1)),
                b: self.mem.get(pc.wrapping_add(2)),
            },
            Opcode::Ret => Instr::Ret,
        })
    }

    fn reg_at(&self, nibble: u16, pc: u16) -> Result<Reg> {
        Reg::from_nibble(nibble).ok_or_else(|| error::run_invalid_register(nibble, pc))
    }

    /// The address operand at `pc + 1`, offset by the index register named
    /// in the low nibble when nonzero.
    fn effective_address(&self, word: u16, pc: u16) -> Result<u16> {
        let adr = self.mem.get(pc.wrapping_add(1));
        match isa::gr2_field(word) {
            0 => Ok(adr),
            x => {
                let r = self.reg_at(x, pc)?;
                Ok(adr.wrapping_add(self.reg.general(r)))
            }
        }
    }

    /// Apply one decoded instruction, returning the word count it occupied.
    fn exec(&mut self, instr: Instr, io: &mut dyn Console) -> Result<u16> {
        use Instr::*;
        Ok(match instr {
            AndReg(r1, r2) => {
                let v = self.reg.general(r1) & self.reg.general(r2);
                self.store(r1, v);
                1
            }
            AndMem(r, ea) => {
                let v = self.reg.general(r) & self.mem.get(ea);
                self.store(r, v);
                2
            }
            OrReg(r1, r2) => {
                let v = self.reg.general(r1) | self.reg.general(r2);
                self.store(r1, v);
                1
            }
            OrMem(r, ea) => {
                let v = self.reg.general(r) | self.mem.get(ea);
                self.store(r, v);
                2
            }
            XorReg(r1, r2) => {
                let v = self.reg.general(r1) ^ self.reg.general(r2);
                self.store(r1, v);
                1
            }
            XorMem(r, ea) => {
                let v = self.reg.general(r) ^ self.mem.get(ea);
                self.store(r, v);
                2
            }
            LdReg(r1, r2) => {
                let v = self.reg.general(r2);
                self.store(r1, v);
                1
            }
            LdMem(r, ea) => {
                let v = self.mem.get(ea);
                self.store(r, v);
                2
            }
            // Load the address itself; flags are untouched.
            Lad(r, ea) => {
                self.reg.set_general(r, ea);
                2
            }
            St(r, ea) => {
                self.mem.set(ea, self.reg.general(r));
                2
            }
            AddaReg(r1, r2) => {
                let v = self.reg.general(r1).wrapping_add(self.reg.general(r2));
                self.store(r1, v);
                1
            }
            AddaMem(r, ea) => {
                let v = self.reg.general(r).wrapping_add(self.mem.get(ea));
                self.store(r, v);
                2
            }
            SubaReg(r1, r2) => {
                let v = self.reg.general(r1).wrapping_sub(self.reg.general(r2));
                self.store(r1, v);
                1
            }
            SubaMem(r, ea) => {
                let v = self.reg.general(r).wrapping_sub(self.mem.get(ea));
                self.store(r, v);
                2
            }
            CpaReg(r1, r2) => {
                let v = self.reg.general(r1).wrapping_sub(self.reg.general(r2));
                self.reg.flags_mut().set_from(v);
                1
            }
            CpaMem(r, ea) => {
                let v = self.reg.general(r).wrapping_sub(self.mem.get(ea));
                self.reg.flags_mut().set_from(v);
                2
            }
            Jump(ea) => {
                self.reg.set_pc(ea);
                0
            }
            Jze(ea) => self.branch(self.reg.is_zero(), ea),
            Jnz(ea) => self.branch(!self.reg.is_zero(), ea),
            Jmi(ea) => self.branch(self.reg.is_negative(), ea),
            Jpl(ea) => self.branch(!self.reg.is_negative() && !self.reg.is_zero(), ea),
            Svc { kind, a, b } => self.svc(kind, a, b, io)?,
            Ret => unreachable!("RET is terminal in step"),
        })
    }

    fn store(&mut self, r: Reg, value: u16) {
        self.reg.set_general(r, value);
        self.reg.flags_mut().set_from(value);
    }

    fn branch(&mut self, taken: bool, ea: u16) -> u16 {
        if taken {
            self.reg.set_pc(ea);
            0
        } else {
            2
        }
    }

    /// SVC sub-operations: 1 reads one input line into memory, 2 emits a
    /// stored string. Anything else falls through as a single word.
    fn svc(&mut self, kind: u16, a: u16, b: u16, io: &mut dyn Console) -> Result<u16> {
        match kind {
            1 => {
                let text = io.request_line()?;
                let mut count: u16 = 0;
                for ch in text.chars() {
                    self.mem.set(a.wrapping_add(count), ch as u16);
                    count = count.wrapping_add(1);
                }
                self.mem.set(b, count);
                Ok(3)
            }
            2 => {
                let len = self.mem.get(b);
                let mut text = String::with_capacity(len as usize);
                for i in 0..len {
                    let code = self.mem.get(a.wrapping_add(i));
                    text.push(char::from_u32(code as u32).unwrap_or(char::REPLACEMENT_CHARACTER));
                }
                io.emit(&text);
                Ok(3)
            }
            _ => Ok(1),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::isa::pack;

    fn machine(words: &[u16]) -> Machine {
        let mut mem = Memory::new();
        for (i, word) in words.iter().enumerate() {
            mem.set(i as u16, *word);
        }
        Machine::new(mem)
    }

    fn run(machine: &mut Machine) {
        let mut io = ScriptedConsole::default();
        machine.execute(&mut io, 0).unwrap();
    }

    #[test]
    fn ld_reg_copies_and_flags() {
        let mut m = machine(&[pack(Opcode::LdReg, 1, 2), pack(Opcode::Ret, 0, 0)]);
        m.registers_mut().set_general(Reg::Gr2, 0x8001);
        run(&mut m);
        assert_eq!(m.registers().general(Reg::Gr1), 0x8001);
        // Source untouched, flags reflect the negative value.
        assert_eq!(m.registers().general(Reg::Gr2), 0x8001);
        assert!(m.registers().is_negative());
        assert!(!m.registers().is_zero());
    }

    #[test]
    fn effective_address_applies_index() {
        // LD GR1,4,GR2 with GR2=1 reads Mem[5].
        let mut m = machine(&[
            pack(Opcode::LdMem, 1, 2),
            4,
            pack(Opcode::Ret, 0, 0),
            0,
            111,
            222,
        ]);
        m.registers_mut().set_general(Reg::Gr2, 1);
        run(&mut m);
        assert_eq!(m.registers().general(Reg::Gr1), 222);
    }

    #[test]
    fn effective_address_without_index() {
        let mut m = machine(&[pack(Opcode::LdMem, 1, 0), 4, pack(Opcode::Ret, 0, 0), 0, 111]);
        run(&mut m);
        assert_eq!(m.registers().general(Reg::Gr1), 111);
    }

    #[test]
    fn lad_loads_address_not_value() {
        let mut m = machine(&[pack(Opcode::Lad, 3, 0), 40, pack(Opcode::Ret, 0, 0)]);
        m.registers_mut().flags_mut().set_from(0);
        run(&mut m);
        assert_eq!(m.registers().general(Reg::Gr3), 40);
        // LAD leaves flags alone.
        assert!(m.registers().is_zero());
    }

    #[test]
    fn st_writes_memory() {
        let mut m = machine(&[pack(Opcode::St, 1, 0), 9, pack(Opcode::Ret, 0, 0)]);
        m.registers_mut().set_general(Reg::Gr1, 77);
        run(&mut m);
        assert_eq!(m.memory().get(9), 77);
    }

    #[test]
    fn arithmetic_wraps() {
        let mut m = machine(&[pack(Opcode::AddaMem, 1, 0), 3, pack(Opcode::Ret, 0, 0), 1]);
        m.registers_mut().set_general(Reg::Gr1, 0xFFFF);
        run(&mut m);
        assert_eq!(m.registers().general(Reg::Gr1), 0);
        assert!(m.registers().is_zero());
        // Overflow is unmodeled and never raised.
        assert!(!m.registers().flags().overflow);
    }

    #[test]
    fn cpa_mutates_only_flags() {
        let mut m = machine(&[pack(Opcode::CpaReg, 1, 2), pack(Opcode::Ret, 0, 0)]);
        m.registers_mut().set_general(Reg::Gr1, 3);
        m.registers_mut().set_general(Reg::Gr2, 5);
        run(&mut m);
        assert_eq!(m.registers().general(Reg::Gr1), 3);
        assert_eq!(m.registers().general(Reg::Gr2), 5);
        assert!(m.registers().is_negative());
    }

    #[test]
    fn ret_halts_with_pc_on_ret_word() {
        let mut m = machine(&[
            pack(Opcode::LdReg, 1, 1),
            pack(Opcode::Ret, 0, 0),
            pack(Opcode::LdReg, 2, 2),
        ]);
        run(&mut m);
        assert_eq!(m.registers().pc(), 1);
        // A further step still reports halt without advancing.
        let mut io = ScriptedConsole::default();
        assert!(!m.step(&mut io).unwrap());
        assert_eq!(m.registers().pc(), 1);
    }

    #[test]
    fn conditional_jumps_follow_flags() {
        // CPA GR1,GR1 sets zero; JZE takes, landing on RET at 4.
        let mut m = machine(&[
            pack(Opcode::CpaReg, 1, 1),
            pack(Opcode::Jze, 0, 0),
            4,
            0, // would fail decode if fallen through to
            pack(Opcode::Ret, 0, 0),
        ]);
        run(&mut m);
        assert_eq!(m.registers().pc(), 4);
    }

    #[test]
    fn untaken_branch_falls_through() {
        // Flags are positive; JMI must fall through to the RET at 3.
        let mut m = machine(&[
            pack(Opcode::CpaReg, 1, 1),
            pack(Opcode::Jmi, 0, 0),
            9,
            pack(Opcode::Ret, 0, 0),
        ]);
        m.registers_mut().set_general(Reg::Gr1, 1);
        let mut io = ScriptedConsole::default();
        m.registers_mut().set_pc(1);
        m.registers_mut().flags_mut().set_from(1);
        assert!(m.step(&mut io).unwrap());
        assert_eq!(m.registers().pc(), 3);
    }

    #[test]
    fn jpl_requires_strictly_positive() {
        let mut m = machine(&[pack(Opcode::Jpl, 0, 0), 5, pack(Opcode::Ret, 0, 0)]);
        let mut io = ScriptedConsole::default();
        m.registers_mut().flags_mut().set_from(0);
        assert!(m.step(&mut io).unwrap());
        assert_eq!(m.registers().pc(), 2);

        m.registers_mut().set_pc(0);
        m.registers_mut().flags_mut().set_from(7);
        assert!(m.step(&mut io).unwrap());
        assert_eq!(m.registers().pc(), 5);
    }

    #[test]
    fn svc_output_emits_string() {
        // Data at 5 holds "hi", length word at 7 holds 2.
        let mut m = machine(&[
            pack(Opcode::Svc, 0, 2),
            5,
            7,
            pack(Opcode::Ret, 0, 0),
            0,
            'h' as u16,
            'i' as u16,
            2,
        ]);
        let mut io = ScriptedConsole::default();
        m.execute(&mut io, 0).unwrap();
        assert_eq!(io.output, vec!["hi".to_string()]);
    }

    #[test]
    fn svc_input_stores_codes_and_count() {
        let mut m = machine(&[pack(Opcode::Svc, 0, 1), 10, 20, pack(Opcode::Ret, 0, 0)]);
        let mut io = ScriptedConsole::with_input(["abc"]);
        m.execute(&mut io, 0).unwrap();
        assert_eq!(m.memory().get(10), 'a' as u16);
        assert_eq!(m.memory().get(11), 'b' as u16);
        assert_eq!(m.memory().get(12), 'c' as u16);
        assert_eq!(m.memory().get(20), 3);
    }

    #[test]
    fn svc_unknown_subtype_is_single_word_noop() {
        let mut m = machine(&[pack(Opcode::Svc, 0, 9), pack(Opcode::Ret, 0, 0)]);
        let mut io = ScriptedConsole::default();
        assert!(m.step(&mut io).unwrap());
        assert_eq!(m.registers().pc(), 1);
        assert!(io.output.is_empty());
    }

    #[test]
    fn undefined_opcode_fails_without_mutation() {
        let mut m = machine(&[0x0000]);
        m.registers_mut().set_general(Reg::Gr1, 42);
        let mut io = ScriptedConsole::default();
        let err = m.step(&mut io).unwrap_err();
        assert!(err.to_string().contains("Undefined opcode"));
        assert_eq!(m.registers().general(Reg::Gr1), 42);
        assert_eq!(m.registers().pc(), 0);
    }

    #[test]
    fn invalid_register_field_fails_decode() {
        // gr2 nibble 9 in the register-register form names no register.
        let mut m = machine(&[pack(Opcode::LdReg, 1, 9)]);
        let mut io = ScriptedConsole::default();
        let err = m.step(&mut io).unwrap_err();
        assert!(err.to_string().contains("Invalid register"));
    }
}
