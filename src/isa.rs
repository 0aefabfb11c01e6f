//! Instruction-word layout and the mnemonic table shared by the assembler
//! and the execution engine.
//!
//! A word encodes `opcode * 256 | gr1 * 16 | gr2`, where `gr2` doubles as
//! the index-register selector for memory operands. Two-word instructions
//! carry their address operand in the following word.

/// Operation codes, one per opcode byte the engine recognizes.
///
/// Each operand form of a mnemonic gets its own opcode, so decoding never
/// has to inspect the operand fields to know an instruction's shape. 0x00
/// is deliberately unassigned: unset memory reads as 0, and running into it
/// must fail decode rather than slide through as a no-op.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
#[repr(u8)]
pub enum Opcode {
    LdMem = 0x10,
    St = 0x11,
    Lad = 0x12,
    LdReg = 0x14,
    AddaMem = 0x20,
    SubaMem = 0x21,
    AddaReg = 0x24,
    SubaReg = 0x25,
    AndMem = 0x30,
    OrMem = 0x31,
    XorMem = 0x32,
    AndReg = 0x34,
    OrReg = 0x35,
    XorReg = 0x36,
    CpaMem = 0x40,
    CpaReg = 0x44,
    Jmi = 0x61,
    Jnz = 0x62,
    Jze = 0x63,
    Jump = 0x64,
    Jpl = 0x65,
    Ret = 0x81,
    Svc = 0xF0,
}

impl Opcode {
    /// Decode the opcode byte of an instruction word.
    pub fn from_word(word: u16) -> Option<Opcode> {
        Some(match word >> 8 {
            0x10 => Opcode::LdMem,
            0x11 => Opcode::St,
            0x12 => Opcode::Lad,
            0x14 => Opcode::LdReg,
            0x20 => Opcode::AddaMem,
            0x21 => Opcode::SubaMem,
            0x24 => Opcode::AddaReg,
            0x25 => Opcode::SubaReg,
            0x30 => Opcode::AndMem,
            0x31 => Opcode::OrMem,
            0x32 => Opcode::XorMem,
            0x34 => Opcode::AndReg,
            0x35 => Opcode::OrReg,
            0x36 => Opcode::XorReg,
            0x40 => Opcode::CpaMem,
            0x44 => Opcode::CpaReg,
            0x61 => Opcode::Jmi,
            0x62 => Opcode::Jnz,
            0x63 => Opcode::Jze,
            0x64 => Opcode::Jump,
            0x65 => Opcode::Jpl,
            0x81 => Opcode::Ret,
            0xF0 => Opcode::Svc,
            _ => return None,
        })
    }
}

pub fn pack(op: Opcode, gr1: u16, gr2: u16) -> u16 {
    (op as u16) << 8 | (gr1 & 0xF) << 4 | (gr2 & 0xF)
}

/// Bits 4-7: first general-register field.
pub fn gr1_field(word: u16) -> u16 {
    (word >> 4) & 0xF
}

/// Bits 0-3: second register or index-register selector.
pub fn gr2_field(word: u16) -> u16 {
    word & 0xF
}

/// Operand forms a mnemonic assembles to. A form left `None` does not exist
/// for that mnemonic.
pub struct MnemonicSpec {
    pub name: &'static str,
    /// `OP r1,r2`
    pub reg_reg: Option<Opcode>,
    /// `OP r,adr[,x]`
    pub reg_adr: Option<Opcode>,
    /// `OP adr[,x]` (the jump family)
    pub adr: Option<Opcode>,
}

pub const MNEMONICS: &[MnemonicSpec] = &[
    MnemonicSpec { name: "LD", reg_reg: Some(Opcode::LdReg), reg_adr: Some(Opcode::LdMem), adr: None },
    MnemonicSpec { name: "ST", reg_reg: None, reg_adr: Some(Opcode::St), adr: None },
    MnemonicSpec { name: "LAD", reg_reg: None, reg_adr: Some(Opcode::Lad), adr: None },
    MnemonicSpec { name: "ADDA", reg_reg: Some(Opcode::AddaReg), reg_adr: Some(Opcode::AddaMem), adr: None },
    MnemonicSpec { name: "SUBA", reg_reg: Some(Opcode::SubaReg), reg_adr: Some(Opcode::SubaMem), adr: None },
    MnemonicSpec { name: "AND", reg_reg: Some(Opcode::AndReg), reg_adr: Some(Opcode::AndMem), adr: None },
    MnemonicSpec { name: "OR", reg_reg: Some(Opcode::OrReg), reg_adr: Some(Opcode::OrMem), adr: None },
    MnemonicSpec { name: "XOR", reg_reg: Some(Opcode::XorReg), reg_adr: Some(Opcode::XorMem), adr: None },
    MnemonicSpec { name: "CPA", reg_reg: Some(Opcode::CpaReg), reg_adr: Some(Opcode::CpaMem), adr: None },
    MnemonicSpec { name: "JUMP", reg_reg: None, reg_adr: None, adr: Some(Opcode::Jump) },
    MnemonicSpec { name: "JZE", reg_reg: None, reg_adr: None, adr: Some(Opcode::Jze) },
    MnemonicSpec { name: "JNZ", reg_reg: None, reg_adr: None, adr: Some(Opcode::Jnz) },
    MnemonicSpec { name: "JMI", reg_reg: None, reg_adr: None, adr: Some(Opcode::Jmi) },
    MnemonicSpec { name: "JPL", reg_reg: None, reg_adr: None, adr: Some(Opcode::Jpl) },
];

/// Look up a mnemonic, case-insensitively. `RET` and `SVC` are not listed
/// here; they have fixed niladic/special encodings handled by the assembler
/// directly.
pub fn mnemonic(name: &str) -> Option<&'static MnemonicSpec> {
    MNEMONICS.iter().find(|m| m.name.eq_ignore_ascii_case(name))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn word_layout() {
        let word = pack(Opcode::LdMem, 1, 2);
        assert_eq!(word, 0x1012);
        assert_eq!(word >> 8, 0x10);
        assert_eq!(gr1_field(word), 1);
        assert_eq!(gr2_field(word), 2);
    }

    #[test]
    fn opcode_roundtrip() {
        for spec in MNEMONICS {
            for op in [spec.reg_reg, spec.reg_adr, spec.adr].into_iter().flatten() {
                assert_eq!(Opcode::from_word(pack(op, 0, 0)), Some(op));
            }
        }
        assert_eq!(Opcode::from_word(pack(Opcode::Ret, 0, 0)), Some(Opcode::Ret));
        assert_eq!(Opcode::from_word(pack(Opcode::Svc, 0, 2)), Some(Opcode::Svc));
    }

    #[test]
    fn unassigned_opcodes_fail_decode() {
        assert_eq!(Opcode::from_word(0x0000), None);
        assert_eq!(Opcode::from_word(0xFF00), None);
        assert_eq!(Opcode::from_word(0x1300), None);
    }

    #[test]
    fn mnemonic_lookup() {
        assert!(mnemonic("LD").is_some());
        assert!(mnemonic("lad").is_some());
        assert!(mnemonic("HALT").is_none());
        assert!(mnemonic("RET").is_none());
    }
}
