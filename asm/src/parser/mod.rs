use std::num::IntErrorKind;

use fxhash::FxHashMap;

use crate::{
    ast::{Address, Instruction, Label, MacroDefinition, Number, Program, Source, Subroutine, Width},
    cursor::TokenCursor,
    lexer::{OperationName, RegisterName, Token, TokenKind},
    Config,
};

mod macros;


#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ParserError {
    #[error("[line {line}] Error Expected {expected} but found {found}: {location}")]
    Expected {
        line: usize,
        expected: String,
        found: TokenKind,
        location: String,
    },

    #[error("[line {line}] Error Unexpected {found}: {location}")]
    UnexpectedToken {
        line: usize,
        found: TokenKind,
        location: String,
    },

    #[error("[line {line}] Error Indent does not match the enclosing block: {location:?}")]
    InvalidIndent { line: usize, location: String },

    #[error("[line {line}] Error Invalid number: {location}")]
    InvalidNumber { line: usize, location: String },

    #[error("[line {line}] Error Number does not fit in {width}: {location}")]
    NumberTooLarge {
        line: usize,
        width: Width,
        location: String,
    },

    #[error("[line {line}] Error Expected a new line after the arguments to \"{name}\": {location}")]
    UnterminatedMacroCall {
        line: usize,
        name: String,
        location: String,
    },

    #[error("[line {line}] Error Macro takes {expected} argument(s) but {found} were given: {name}")]
    MacroArity {
        line: usize,
        name: String,
        expected: usize,
        found: usize,
    },

    #[error("[line {line}] Error Macros are nested deeper than {limit} levels: {name}")]
    MacroDepthExceeded {
        line: usize,
        name: String,
        limit: usize,
    },

    #[error("[line {line}] Error Subroutine is already defined: {name}")]
    DuplicateSubroutine { line: usize, name: String },

    #[error("[line {line}] Error Macro is already defined: {name}")]
    DuplicateMacro { line: usize, name: String },

    #[error("[line {line}] Error Including other files is not supported: {location}")]
    UnsupportedInclude { line: usize, location: String },
}

impl ParserError {
    pub fn expected<S: Into<String>>(expected: S, found: &Token) -> Self {
        Self::Expected {
            line: found.line,
            expected: expected.into(),
            found: found.kind,
            location: found.location(),
        }
    }

    #[inline]
    pub fn unexpected(token: &Token) -> Self {
        Self::UnexpectedToken {
            line: token.line,
            found: token.kind,
            location: token.location(),
        }
    }

    #[inline]
    fn invalid_indent(token: &Token) -> Self {
        Self::InvalidIndent {
            line: token.line,
            location: token.lexeme.clone(),
        }
    }
}

/// Builds a [`Program`] out of scanned tokens, expanding macro calls as it
/// goes.
pub struct Parser {
    cursor: TokenCursor,
    indent: Option<String>,
    macros: FxHashMap<String, MacroDefinition>,
    max_expansion_depth: usize,
}

impl Parser {
    pub fn new(tokens: Vec<Token>, config: &Config) -> Self {
        Self {
            cursor: TokenCursor::new(tokens),
            indent: None,
            macros: FxHashMap::default(),
            max_expansion_depth: config.max_expansion_depth,
        }
    }

    #[must_use]
    pub fn parse(mut self) -> Result<Program, ParserError> {
        let mut subroutines: Vec<Subroutine> = Vec::new();

        loop {
            self.cursor.skip_blank_lines();
            match self.cursor.peek().kind {
                TokenKind::Eof => break,

                TokenKind::Macro => {
                    let definition = self.macro_definition()?;
                    if self.macros.contains_key(&definition.name) {
                        return Err(ParserError::DuplicateMacro {
                            line: definition.line,
                            name: definition.name,
                        });
                    }
                    log::debug!(
                        "defined macro \"{}\" with {} parameter(s)",
                        definition.name,
                        definition.params.len()
                    );
                    self.macros.insert(definition.name.clone(), definition);
                }

                TokenKind::Include => {
                    let token = self.cursor.advance();
                    return Err(ParserError::UnsupportedInclude {
                        line: token.line,
                        location: token.location(),
                    });
                }

                _ => {
                    let name = self.cursor.expect(TokenKind::Identifier)?;
                    self.cursor.expect(TokenKind::Colon)?;
                    if subroutines.iter().any(|s| s.name == name.lexeme) {
                        return Err(ParserError::DuplicateSubroutine {
                            line: name.line,
                            name: name.lexeme,
                        });
                    }
                    subroutines.push(self.subroutine(name)?);
                }
            }
        }

        Ok(Program::new(subroutines, self.macros))
    }

    /// The first indent in the file fixes the indent every block line must
    /// repeat exactly.
    fn check_indent(&mut self, token: &Token) -> bool {
        match &self.indent {
            Some(indent) => *indent == token.lexeme,
            None => {
                self.indent = Some(token.lexeme.clone());
                true
            }
        }
    }

    /// Consumes the indent opening the first line of a block.
    fn block_start(&mut self) -> Result<(), ParserError> {
        self.cursor.skip_blank_lines();
        let indent = self.cursor.expect(TokenKind::Indent)?;
        if !self.check_indent(&indent) {
            return Err(ParserError::invalid_indent(&indent));
        }
        Ok(())
    }

    /// Called after a new line inside a block. Returns the indent token when
    /// the next line still belongs to the block.
    fn block_continues(&mut self) -> Result<Option<Token>, ParserError> {
        self.cursor.skip_blank_lines();
        if !self.cursor.check(TokenKind::Indent) {
            return Ok(None);
        }
        let indent = self.cursor.advance();
        if !self.check_indent(&indent) {
            return Err(ParserError::invalid_indent(&indent));
        }
        Ok(Some(indent))
    }

    /// One instruction per line.
    fn end_of_line(&self) -> Result<(), ParserError> {
        let next = self.cursor.peek();
        match next.kind {
            TokenKind::NewLine | TokenKind::Eof => Ok(()),
            _ => Err(ParserError::expected("a new line", next)),
        }
    }

    fn subroutine(&mut self, name: Token) -> Result<Subroutine, ParserError> {
        self.block_start()?;

        let mut instructions = Vec::new();
        loop {
            let token = self.cursor.advance();
            match token.kind {
                TokenKind::NewLine => {
                    if self.block_continues()?.is_none() {
                        break;
                    }
                }
                TokenKind::Operation(op) => {
                    instructions.push(Instruction::populate(op, &mut self.cursor)?);
                    self.end_of_line()?;
                }
                TokenKind::Identifier if self.macros.contains_key(&token.lexeme) => {
                    self.macro_call(token)?;
                }
                TokenKind::Eof => break,
                _ => return Err(ParserError::unexpected(&token)),
            }
        }

        let subroutine = Subroutine::new(name.lexeme, name.line, instructions);
        match subroutine.instructions.last() {
            Some(last) if last.ends_flow() => {}
            Some(_) => log::warn!(
                "[line {}] Subroutine \"{}\" does not end with HLT or JMP",
                subroutine.line,
                subroutine.name
            ),
            None => log::warn!(
                "[line {}] Subroutine \"{}\" is empty",
                subroutine.line,
                subroutine.name
            ),
        }
        Ok(subroutine)
    }
}

fn register(cursor: &mut TokenCursor) -> Result<RegisterName, ParserError> {
    match cursor.peek().kind {
        TokenKind::Register(name) => {
            cursor.advance();
            Ok(name)
        }
        _ => Err(ParserError::expected("a register", cursor.peek())),
    }
}

fn comma(cursor: &mut TokenCursor) -> Result<(), ParserError> {
    cursor.expect(TokenKind::Comma).map(|_| ())
}

/// An optional jump target. Targets are only read from the same line.
fn target(cursor: &mut TokenCursor) -> Result<Option<Label>, ParserError> {
    if cursor.check(TokenKind::Identifier) {
        Ok(Some(Label::populate(cursor)?))
    } else {
        Ok(None)
    }
}

fn parse_literal(lexeme: &str) -> Result<u32, IntErrorKind> {
    let literal = lexeme.replace('_', "");
    let (digits, radix) = match literal.get(..2) {
        Some("0x" | "0X") => (&literal[2..], 16),
        Some("0b" | "0B") => (&literal[2..], 2),
        _ => (&literal[..], 10),
    };
    u32::from_str_radix(digits, radix).map_err(|e| e.kind().clone())
}

impl Number {
    fn populate(cursor: &mut TokenCursor, width: Width) -> Result<Self, ParserError> {
        let token = cursor.expect(TokenKind::Number)?;
        let too_large = || ParserError::NumberTooLarge {
            line: token.line,
            width,
            location: token.lexeme.clone(),
        };

        let value = match parse_literal(&token.lexeme) {
            Ok(value) => value,
            Err(IntErrorKind::PosOverflow) => return Err(too_large()),
            Err(_) => {
                return Err(ParserError::InvalidNumber {
                    line: token.line,
                    location: token.lexeme.clone(),
                })
            }
        };
        if value > width.max() {
            return Err(too_large());
        }
        Ok(Self {
            value: value as u16,
            width,
        })
    }
}

impl Label {
    fn populate(cursor: &mut TokenCursor) -> Result<Self, ParserError> {
        let token = cursor.expect(TokenKind::Identifier)?;
        Ok(Self::new(token.lexeme, token.line))
    }
}

impl Source {
    fn populate(cursor: &mut TokenCursor) -> Result<Self, ParserError> {
        match cursor.peek().kind {
            TokenKind::Register(_) => Ok(Self::Register(register(cursor)?)),
            TokenKind::Number => Ok(Self::Immediate(Number::populate(cursor, Width::Imm8)?)),
            _ => Err(ParserError::expected("a register or a number", cursor.peek())),
        }
    }
}

impl Address {
    fn populate(cursor: &mut TokenCursor) -> Result<Self, ParserError> {
        match cursor.peek().kind {
            TokenKind::NextAddr => {
                cursor.advance();
                Ok(Self::NextAddr)
            }
            TokenKind::Number => Ok(Self::Immediate(Number::populate(cursor, Width::Imm16)?)),
            TokenKind::Identifier => Ok(Self::Label(Label::populate(cursor)?)),
            _ => Err(ParserError::expected(
                "\"NextAddr\", a number or a subroutine name",
                cursor.peek(),
            )),
        }
    }
}

impl Instruction {
    /// Reads the operands following `op`.
    fn populate(op: OperationName, cursor: &mut TokenCursor) -> Result<Self, ParserError> {
        Ok(match op {
            OperationName::Nop => Self::Nop,
            OperationName::Hlt => Self::Hlt,

            OperationName::Lw | OperationName::Sw => {
                let reg = register(cursor)?;
                let addr = if cursor.check(TokenKind::Comma) {
                    cursor.advance();
                    Some(Number::populate(cursor, Width::Imm16)?)
                } else {
                    None
                };
                if op == OperationName::Lw {
                    Self::Lw(reg, addr)
                } else {
                    Self::Sw(reg, addr)
                }
            }

            OperationName::Mw | OperationName::Add | OperationName::Sub => {
                let reg = register(cursor)?;
                comma(cursor)?;
                let src = Source::populate(cursor)?;
                match op {
                    OperationName::Mw => Self::Mw(reg, src),
                    OperationName::Add => Self::Add(reg, src),
                    _ => Self::Sub(reg, src),
                }
            }

            OperationName::Push => Self::Push(Source::populate(cursor)?),
            OperationName::Tel => Self::Tel(Source::populate(cursor)?),
            OperationName::Out => Self::Out(Source::populate(cursor)?),
            OperationName::Pop => Self::Pop(register(cursor)?),
            OperationName::Lda => Self::Lda(Address::populate(cursor)?),
            OperationName::Jmp => Self::Jmp(target(cursor)?),
            OperationName::Jo => Self::Jo(target(cursor)?),

            OperationName::Jz => {
                let reg = register(cursor)?;
                Self::Jz(reg, target(cursor)?)
            }
        })
    }
}
