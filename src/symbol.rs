use std::fmt;
use std::ops::Range;
use std::str::FromStr;

use fxhash::FxBuildHasher;
use indexmap::IndexMap;
use miette::SourceSpan;

/// Location within source
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct Span {
    offs: usize,
    len: usize,
}

impl Span {
    pub fn new(offs: usize, len: usize) -> Self {
        Span { offs, len }
    }

    pub fn offs(&self) -> usize {
        self.offs
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn end(&self) -> usize {
        self.offs + self.len
    }
}

impl From<Span> for SourceSpan {
    fn from(value: Span) -> Self {
        SourceSpan::new(value.offs().into(), value.len())
    }
}

impl From<Span> for Range<usize> {
    fn from(value: Span) -> Self {
        value.offs()..value.end()
    }
}

/// Name of one of the eight general registers.
///
/// The low nibble of an instruction word names either a second register or
/// an index register, where 0 means "no indexing".
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Debug)]
pub enum Reg {
    Gr0 = 0,
    Gr1,
    Gr2,
    Gr3,
    Gr4,
    Gr5,
    Gr6,
    Gr7,
}

impl Reg {
    /// Decode a 4-bit register field. Values 8..=15 name no register.
    pub fn from_nibble(nibble: u16) -> Option<Reg> {
        match nibble {
            0 => Some(Reg::Gr0),
            1 => Some(Reg::Gr1),
            2 => Some(Reg::Gr2),
            3 => Some(Reg::Gr3),
            4 => Some(Reg::Gr4),
            5 => Some(Reg::Gr5),
            6 => Some(Reg::Gr6),
            7 => Some(Reg::Gr7),
            _ => None,
        }
    }

    pub fn index(self) -> usize {
        self as usize
    }
}

impl FromStr for Reg {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut chars = s.chars();
        let (Some(g), Some(r), Some(n), None) =
            (chars.next(), chars.next(), chars.next(), chars.next())
        else {
            return Err(());
        };
        if !g.eq_ignore_ascii_case(&'g') || !r.eq_ignore_ascii_case(&'r') {
            return Err(());
        }
        let nibble = n.to_digit(10).ok_or(())?;
        Reg::from_nibble(nibble as u16).ok_or(())
    }
}

impl fmt::Display for Reg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "GR{}", self.index())
    }
}

/// Whether a token can be used as a label name.
pub fn is_ident(s: &str) -> bool {
    let mut chars = s.chars();
    chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic())
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Symbol table of label name -> bound memory address.
///
/// Populated entirely during assembler pass 1, consumed in pass 2. Insertion
/// order is preserved for listings.
#[derive(Default)]
pub struct LabelTable {
    map: IndexMap<String, u16, FxBuildHasher>,
}

impl LabelTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `name` to `addr`. Label names are unique; rebinding is an error
    /// carrying the previously bound address.
    pub fn bind(&mut self, name: &str, addr: u16) -> Result<(), u16> {
        if let Some(prev) = self.map.get(name) {
            return Err(*prev);
        }
        self.map.insert(name.to_string(), addr);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<u16> {
        self.map.get(name).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, u16)> {
        self.map.iter().map(|(name, addr)| (name.as_str(), *addr))
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

/// One unresolved address reference recorded during pass 1: the word at `at`
/// holds a placeholder until `label` resolves.
#[derive(Debug)]
pub struct Patch {
    pub at: u16,
    pub label: String,
    pub span: Span,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reg_from_str() {
        assert_eq!("GR0".parse(), Ok(Reg::Gr0));
        assert_eq!("gr7".parse(), Ok(Reg::Gr7));
        assert_eq!("GR8".parse::<Reg>(), Err(()));
        assert_eq!("GR10".parse::<Reg>(), Err(()));
        assert_eq!("G1".parse::<Reg>(), Err(()));
        assert_eq!("LOOP".parse::<Reg>(), Err(()));
    }

    #[test]
    fn reg_from_nibble() {
        assert_eq!(Reg::from_nibble(0), Some(Reg::Gr0));
        assert_eq!(Reg::from_nibble(7), Some(Reg::Gr7));
        assert_eq!(Reg::from_nibble(8), None);
        assert_eq!(Reg::from_nibble(15), None);
    }

    #[test]
    fn labels_bind_once() {
        let mut labels = LabelTable::new();
        assert!(labels.bind("LOOP", 4).is_ok());
        assert_eq!(labels.bind("LOOP", 9), Err(4));
        assert_eq!(labels.get("LOOP"), Some(4));
        assert_eq!(labels.get("DONE"), None);
    }

    #[test]
    fn ident_rule() {
        assert!(is_ident("LOOP"));
        assert!(is_ident("a_2"));
        assert!(!is_ident("2A"));
        assert!(!is_ident("#30"));
        assert!(!is_ident(""));
    }
}
