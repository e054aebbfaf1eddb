use std::fmt::{self, Display, Formatter};

use fxhash::FxHashMap;

use crate::lexer::{OperationName, RegisterName, Token};

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Width {
    Imm8,
    Imm16,
}

impl Width {
    #[inline]
    pub fn size(self) -> usize {
        match self {
            Self::Imm8 => 1,
            Self::Imm16 => 2,
        }
    }

    #[inline]
    pub fn max(self) -> u32 {
        match self {
            Self::Imm8 => 0xFF,
            Self::Imm16 => 0xFFFF,
        }
    }
}

impl Display for Width {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::Imm8 => write!(f, "an 8-bit immediate"),
            Self::Imm16 => write!(f, "a 16-bit immediate"),
        }
    }
}

/// A numeric literal, already range checked against its width.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Number {
    pub value: u16,
    pub width: Width,
}

impl Number {
    #[inline]
    pub fn imm8(value: u8) -> Self {
        Self {
            value: value as u16,
            width: Width::Imm8,
        }
    }

    #[inline]
    pub fn imm16(value: u16) -> Self {
        Self {
            value,
            width: Width::Imm16,
        }
    }

    #[inline]
    pub fn size(&self) -> usize {
        self.width.size()
    }
}

impl Display for Number {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.value)
    }
}

/// A reference to a subroutine by name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Label {
    pub name: String,
    pub line: usize,
}

impl Label {
    #[inline]
    pub fn new<S: Into<String>>(name: S, line: usize) -> Self {
        Self {
            name: name.into(),
            line,
        }
    }
}

impl Display for Label {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}

/// The operand of the register-or-byte forms.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Source {
    Register(RegisterName),
    Immediate(Number),
}

impl Source {
    /// Bytes this operand adds after the first instruction byte when it is
    /// the only operand.
    #[inline]
    pub fn size(&self) -> usize {
        match self {
            Self::Register(_) => 0,
            Self::Immediate(number) => number.size(),
        }
    }
}

impl Display for Source {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::Register(name) => write!(f, "{name}"),
            Self::Immediate(number) => write!(f, "{number}"),
        }
    }
}

/// The operand of `LDA`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Address {
    NextAddr,
    Immediate(Number),
    Label(Label),
}

impl Display for Address {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::NextAddr => write!(f, "NextAddr"),
            Self::Immediate(number) => write!(f, "{number}"),
            Self::Label(label) => write!(f, "{label}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Instruction {
    Nop,
    Lw(RegisterName, Option<Number>),
    Sw(RegisterName, Option<Number>),
    Mw(RegisterName, Source),
    Push(Source),
    Pop(RegisterName),
    Lda(Address),
    Jmp(Option<Label>),
    Jz(RegisterName, Option<Label>),
    Jo(Option<Label>),
    Add(RegisterName, Source),
    Sub(RegisterName, Source),
    Tel(Source),
    Out(Source),
    Hlt,
}

impl Instruction {
    pub fn operation(&self) -> OperationName {
        match self {
            Self::Nop => OperationName::Nop,
            Self::Lw(..) => OperationName::Lw,
            Self::Sw(..) => OperationName::Sw,
            Self::Mw(..) => OperationName::Mw,
            Self::Push(_) => OperationName::Push,
            Self::Pop(_) => OperationName::Pop,
            Self::Lda(_) => OperationName::Lda,
            Self::Jmp(_) => OperationName::Jmp,
            Self::Jz(..) => OperationName::Jz,
            Self::Jo(_) => OperationName::Jo,
            Self::Add(..) => OperationName::Add,
            Self::Sub(..) => OperationName::Sub,
            Self::Tel(_) => OperationName::Tel,
            Self::Out(_) => OperationName::Out,
            Self::Hlt => OperationName::Hlt,
        }
    }

    /// Exactly the number of bytes the instruction emits.
    pub fn size(&self) -> usize {
        match self {
            Self::Nop | Self::Hlt | Self::Pop(_) => 1,
            Self::Push(src) | Self::Tel(src) | Self::Out(src) => 1 + src.size(),
            // Register pairs carry the second register in a byte of its own
            Self::Mw(..) | Self::Add(..) | Self::Sub(..) => 2,
            Self::Lw(_, addr) | Self::Sw(_, addr) => 1 + addr.map_or(0, |n| n.size()),
            Self::Lda(_) => 3,
            Self::Jmp(target) | Self::Jo(target) | Self::Jz(_, target) => {
                if target.is_some() {
                    3
                } else {
                    1
                }
            }
        }
    }

    /// `HLT` and `JMP` never fall through into whatever is laid out next.
    #[inline]
    pub fn ends_flow(&self) -> bool {
        matches!(self, Self::Hlt | Self::Jmp(_))
    }
}

impl Display for Instruction {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let op = self.operation();
        match self {
            Self::Nop | Self::Hlt | Self::Jmp(None) | Self::Jo(None) => write!(f, "{op}"),
            Self::Lw(reg, None) | Self::Sw(reg, None) | Self::Pop(reg) | Self::Jz(reg, None) => {
                write!(f, "{op} {reg}")
            }
            Self::Lw(reg, Some(addr)) | Self::Sw(reg, Some(addr)) => {
                write!(f, "{op} {reg}, {addr}")
            }
            Self::Mw(reg, src) | Self::Add(reg, src) | Self::Sub(reg, src) => {
                write!(f, "{op} {reg}, {src}")
            }
            Self::Push(src) | Self::Tel(src) | Self::Out(src) => write!(f, "{op} {src}"),
            Self::Lda(addr) => write!(f, "{op} {addr}"),
            Self::Jmp(Some(target)) | Self::Jo(Some(target)) => write!(f, "{op} {target}"),
            Self::Jz(reg, Some(target)) => write!(f, "{op} {reg} {target}"),
        }
    }
}

/// A named, contiguous run of instructions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subroutine {
    pub name: String,
    pub line: usize,
    pub instructions: Vec<Instruction>,
}

impl Subroutine {
    #[inline]
    pub fn new<S: Into<String>>(name: S, line: usize, instructions: Vec<Instruction>) -> Self {
        Self {
            name: name.into(),
            line,
            instructions,
        }
    }

    #[inline]
    pub fn size(&self) -> usize {
        self.instructions.iter().map(Instruction::size).sum()
    }
}

impl Display for Subroutine {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "Subroutine({})", self.name)
    }
}

/// A recorded macro. The body is kept as raw tokens and re-parsed at every
/// call site after its parameters are substituted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MacroDefinition {
    pub name: String,
    pub line: usize,
    pub params: Vec<String>,
    pub body: Vec<Token>,
}

impl Display for MacroDefinition {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "Macro({}", self.name)?;
        for param in &self.params {
            write!(f, " {param}")?;
        }
        write!(f, ")")
    }
}

pub const ENTRY_POINT: &str = "main";

#[derive(Debug, Clone, Default)]
pub struct Program {
    pub subroutines: Vec<Subroutine>,
    pub macros: FxHashMap<String, MacroDefinition>,
}

impl Program {
    #[inline]
    pub fn new(subroutines: Vec<Subroutine>, macros: FxHashMap<String, MacroDefinition>) -> Self {
        Self {
            subroutines,
            macros,
        }
    }

    /// The order subroutines are placed in the image: `main` first, then
    /// everything else in declaration order.
    pub fn layout(&self) -> Vec<&Subroutine> {
        let mut layout = Vec::with_capacity(self.subroutines.len());
        layout.extend(self.subroutines.iter().filter(|s| s.name == ENTRY_POINT));
        if layout.is_empty() && !self.subroutines.is_empty() {
            log::warn!(
                "No \"{ENTRY_POINT}\" subroutine, execution starts at \"{}\"",
                self.subroutines[0].name
            );
        }
        layout.extend(self.subroutines.iter().filter(|s| s.name != ENTRY_POINT));
        layout
    }

    #[inline]
    pub fn size(&self) -> usize {
        self.subroutines.iter().map(Subroutine::size).sum()
    }
}

impl Display for Program {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        writeln!(f, "Program")?;

        let mut macros: Vec<_> = self.macros.values().collect();
        macros.sort_by_key(|m| m.line);
        for definition in macros {
            writeln!(f, "  {definition}")?;
        }

        for subroutine in &self.subroutines {
            writeln!(f, "  {subroutine}")?;
            for instruction in &subroutine.instructions {
                writeln!(f, "    {instruction}")?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sub(name: &str, instructions: Vec<Instruction>) -> Subroutine {
        Subroutine::new(name, 1, instructions)
    }

    #[test]
    fn sizes() {
        assert_eq!(1, Instruction::Nop.size());
        assert_eq!(1, Instruction::Pop(RegisterName::A).size());
        assert_eq!(1, Instruction::Push(Source::Register(RegisterName::B)).size());
        assert_eq!(2, Instruction::Out(Source::Immediate(Number::imm8(7))).size());
        assert_eq!(2, Instruction::Mw(RegisterName::A, Source::Register(RegisterName::B)).size());
        assert_eq!(2, Instruction::Add(RegisterName::A, Source::Immediate(Number::imm8(1))).size());
        assert_eq!(1, Instruction::Lw(RegisterName::A, None).size());
        assert_eq!(3, Instruction::Sw(RegisterName::A, Some(Number::imm16(0x8000))).size());
        assert_eq!(3, Instruction::Lda(Address::NextAddr).size());
        assert_eq!(1, Instruction::Jmp(None).size());
        assert_eq!(3, Instruction::Jz(RegisterName::H, Some(Label::new("loop", 1))).size());
    }

    #[test]
    fn layout_puts_main_first() {
        let program = Program::new(
            vec![
                sub("foo", vec![Instruction::Nop]),
                sub("main", vec![Instruction::Hlt]),
                sub("bar", vec![Instruction::Nop]),
            ],
            FxHashMap::default(),
        );
        let names: Vec<_> = program.layout().into_iter().map(|s| s.name.as_str()).collect();
        assert_eq!(vec!["main", "foo", "bar"], names);
    }

    #[test]
    fn layout_without_main_keeps_declaration_order() {
        let program = Program::new(
            vec![sub("foo", vec![]), sub("bar", vec![])],
            FxHashMap::default(),
        );
        let names: Vec<_> = program.layout().into_iter().map(|s| s.name.as_str()).collect();
        assert_eq!(vec!["foo", "bar"], names);
    }

    #[test]
    fn describe() {
        assert_eq!(
            "MW A, 5",
            Instruction::Mw(RegisterName::A, Source::Immediate(Number::imm8(5))).to_string()
        );
        assert_eq!("LDA NextAddr", Instruction::Lda(Address::NextAddr).to_string());
        assert_eq!(
            "JZ B loop",
            Instruction::Jz(RegisterName::B, Some(Label::new("loop", 3))).to_string()
        );
        assert_eq!("JO", Instruction::Jo(None).to_string());

        let mut macros = FxHashMap::default();
        macros.insert(
            "inc".to_string(),
            MacroDefinition {
                name: "inc".to_string(),
                line: 1,
                params: vec!["x".to_string()],
                body: Vec::new(),
            },
        );
        let program = Program::new(
            vec![sub("main", vec![Instruction::Nop, Instruction::Hlt])],
            macros,
        );
        assert_eq!(
            "Program\n  Macro(inc x)\n  Subroutine(main)\n    NOP\n    HLT\n",
            program.to_string()
        );
    }
}
