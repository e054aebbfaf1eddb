use std::{
    fmt::{self, Display, Formatter},
    iter::Peekable,
    mem,
    str::Chars,
};

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum LexerError {
    #[error("[line {line}] Error Unexpected character: {value}")]
    UnexpectedCharacter { line: usize, value: char },

    #[error("[line {line}] Error Unknown directive: {value}")]
    UnknownDirective { line: usize, value: String },
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum OperationName {
    Nop,
    Lw,
    Sw,
    Mw,
    Push,
    Pop,
    Lda,
    Jmp,
    Jz,
    Jo,
    Add,
    Sub,
    Tel,
    Out,
    Hlt,
}

impl OperationName {
    fn parse(name: &str) -> Option<Self> {
        match name {
            "NOP" => Some(Self::Nop),
            "LW" => Some(Self::Lw),
            "SW" => Some(Self::Sw),
            "MW" => Some(Self::Mw),
            "PUSH" => Some(Self::Push),
            "POP" => Some(Self::Pop),
            "LDA" => Some(Self::Lda),
            "JMP" => Some(Self::Jmp),
            "JZ" => Some(Self::Jz),
            "JO" => Some(Self::Jo),
            "ADD" => Some(Self::Add),
            "SUB" => Some(Self::Sub),
            "TEL" => Some(Self::Tel),
            "OUT" => Some(Self::Out),
            "HLT" => Some(Self::Hlt),
            _ => None,
        }
    }

    /// The 4-bit tag placed in the high nibble of an instruction's first byte.
    /// `0b1100` is reserved.
    #[inline]
    pub fn opcode(self) -> u8 {
        match self {
            Self::Nop => 0b0000,
            Self::Lw => 0b0001,
            Self::Sw => 0b0010,
            Self::Mw => 0b0011,
            Self::Push => 0b0100,
            Self::Pop => 0b0101,
            Self::Lda => 0b0110,
            Self::Jmp => 0b0111,
            Self::Jz => 0b1000,
            Self::Jo => 0b1001,
            Self::Add => 0b1010,
            Self::Sub => 0b1011,
            Self::Tel => 0b1101,
            Self::Out => 0b1110,
            Self::Hlt => 0b1111,
        }
    }
}

impl Display for OperationName {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}",
            match self {
                Self::Nop => "NOP",
                Self::Lw => "LW",
                Self::Sw => "SW",
                Self::Mw => "MW",
                Self::Push => "PUSH",
                Self::Pop => "POP",
                Self::Lda => "LDA",
                Self::Jmp => "JMP",
                Self::Jz => "JZ",
                Self::Jo => "JO",
                Self::Add => "ADD",
                Self::Sub => "SUB",
                Self::Tel => "TEL",
                Self::Out => "OUT",
                Self::Hlt => "HLT",
            }
        )
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum RegisterName {
    A,
    B,
    H,
    L,
}

impl RegisterName {
    fn parse(name: &str) -> Option<Self> {
        match name {
            "A" => Some(Self::A),
            "B" => Some(Self::B),
            "H" => Some(Self::H),
            "L" => Some(Self::L),
            _ => None,
        }
    }

    /// The 3-bit register select field.
    #[inline]
    pub fn code(self) -> u8 {
        match self {
            Self::A => 0b000,
            Self::B => 0b001,
            Self::H => 0b010,
            Self::L => 0b011,
        }
    }
}

impl Display for RegisterName {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}",
            match self {
                Self::A => "A",
                Self::B => "B",
                Self::H => "H",
                Self::L => "L",
            }
        )
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum TokenKind {
    Identifier,
    Number,
    Comma,
    Colon,
    ParenOpen,
    ParenClose,
    Indent,
    NewLine,
    Macro,
    Include,
    NextAddr,
    Operation(OperationName),
    Register(RegisterName),
    Eof,
}

impl TokenKind {
    fn keyword(word: &str) -> Option<Self> {
        match word {
            "@macro" => Some(Self::Macro),
            "@include" => Some(Self::Include),
            "NextAddr" => Some(Self::NextAddr),
            _ => OperationName::parse(word)
                .map(Self::Operation)
                .or_else(|| RegisterName::parse(word).map(Self::Register)),
        }
    }
}

impl Display for TokenKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::Identifier => write!(f, "identifier"),
            Self::Number => write!(f, "number"),
            Self::Comma => write!(f, "\",\""),
            Self::Colon => write!(f, "\":\""),
            Self::ParenOpen => write!(f, "\"(\""),
            Self::ParenClose => write!(f, "\")\""),
            Self::Indent => write!(f, "indent"),
            Self::NewLine => write!(f, "new line"),
            Self::Macro => write!(f, "\"@macro\""),
            Self::Include => write!(f, "\"@include\""),
            Self::NextAddr => write!(f, "\"NextAddr\""),
            Self::Operation(name) => write!(f, "instruction \"{name}\""),
            Self::Register(name) => write!(f, "register \"{name}\""),
            Self::Eof => write!(f, "end of file"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    pub lexeme: String,
    pub line: usize,
}

impl Token {
    #[inline]
    pub fn new<S: Into<String>>(kind: TokenKind, lexeme: S, line: usize) -> Self {
        Self {
            kind,
            lexeme: lexeme.into(),
            line,
        }
    }

    /// The text an error report shows after the message.
    pub fn location(&self) -> String {
        match self.kind {
            TokenKind::NewLine => "\\n".to_string(),
            TokenKind::Eof => "end".to_string(),
            _ => self.lexeme.clone(),
        }
    }
}

pub struct Lexer<'a> {
    chars: Peekable<Chars<'a>>,
    line: usize,
    last: Option<TokenKind>,
    buffer: String,
    finished: bool,
}

impl<'a> Lexer<'a> {
    pub fn new(source: &'a str) -> Self {
        Self {
            chars: source.chars().peekable(),
            line: 1,
            last: None,
            buffer: String::new(),
            finished: false,
        }
    }

    fn emit(&mut self, kind: TokenKind) -> Token {
        self.last = Some(kind);
        Token::new(kind, mem::take(&mut self.buffer), self.line)
    }

    fn take_while<F: Fn(char) -> bool>(&mut self, pred: F) {
        while let Some(&c) = self.chars.peek() {
            if !pred(c) {
                break;
            }
            self.buffer.push(c);
            self.chars.next();
        }
    }

    fn number(&mut self) {
        if self.buffer == "0" {
            match self.chars.peek() {
                Some(&(c @ ('x' | 'X'))) => {
                    self.buffer.push(c);
                    self.chars.next();
                    self.take_while(|c| c.is_ascii_hexdigit() || c == '_');
                }

                Some(&(c @ ('b' | 'B'))) => {
                    self.buffer.push(c);
                    self.chars.next();
                    self.take_while(|c| matches!(c, '0' | '1' | '_'));
                }

                _ => {}
            }
        }
        // Trailing decimal digits are kept so a literal like `0b12` reaches the
        // number parser whole and is rejected there.
        self.take_while(|c| c.is_ascii_digit() || c == '_');
    }
}

impl<'a> Iterator for Lexer<'a> {
    type Item = Result<Token, LexerError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let c = match self.chars.next() {
                Some(c) => c,
                None if self.finished => return None,
                None => {
                    self.finished = true;
                    self.buffer.clear();
                    return Some(Ok(self.emit(TokenKind::Eof)));
                }
            };

            self.buffer.clear();
            let kind = match c {
                ',' => TokenKind::Comma,
                ':' => TokenKind::Colon,
                '(' => TokenKind::ParenOpen,
                ')' => TokenKind::ParenClose,

                ';' => {
                    while let Some(&c) = self.chars.peek() {
                        if c == '\n' {
                            break;
                        }
                        self.chars.next();
                    }
                    continue;
                }

                ' ' | '\t' => {
                    // Whitespace is only significant at the start of a line
                    if !matches!(self.last, None | Some(TokenKind::NewLine)) {
                        continue;
                    }
                    self.buffer.push(c);
                    self.take_while(|c| matches!(c, ' ' | '\t'));
                    return Some(Ok(self.emit(TokenKind::Indent)));
                }

                '\r' => continue,

                '\n' => {
                    self.buffer.push(c);
                    let token = self.emit(TokenKind::NewLine);
                    self.line += 1;
                    return Some(Ok(token));
                }

                '0'..='9' => {
                    self.buffer.push(c);
                    self.number();
                    TokenKind::Number
                }

                _ if c.is_ascii_alphabetic() || c == '_' || c == '@' => {
                    self.buffer.push(c);
                    self.take_while(|c| c.is_ascii_alphanumeric() || c == '_');

                    match TokenKind::keyword(&self.buffer) {
                        Some(kind) => kind,
                        None if c == '@' => {
                            return Some(Err(LexerError::UnknownDirective {
                                line: self.line,
                                value: mem::take(&mut self.buffer),
                            }))
                        }
                        None => TokenKind::Identifier,
                    }
                }

                _ => {
                    return Some(Err(LexerError::UnexpectedCharacter {
                        line: self.line,
                        value: c,
                    }))
                }
            };

            if self.buffer.is_empty() {
                self.buffer.push(c);
            }
            return Some(Ok(self.emit(kind)));
        }
    }
}

/// Scans the whole source. The result always ends with a single
/// [`TokenKind::Eof`] token.
pub fn scan(source: &str) -> Result<Vec<Token>, LexerError> {
    let tokens = Lexer::new(source).collect::<Result<Vec<_>, _>>()?;
    log::trace!("scanned {} tokens", tokens.len());
    Ok(tokens)
}
