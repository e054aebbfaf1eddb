use crate::{
    lexer::{Token, TokenKind},
    parser::ParserError,
};

struct Frame {
    tokens: Vec<Token>,
    pos: usize,
    depth: usize,
}

impl Frame {
    #[inline]
    fn remaining(&self) -> &[Token] {
        &self.tokens[self.pos..]
    }
}

/// A read position over the scanned tokens.
///
/// Macro expansions are pushed as frames on top of the source tokens, so the
/// parser reads an expansion to the end before resuming after the call site.
/// Every frame remembers how deeply nested it is; the base frame is depth 0.
pub struct TokenCursor {
    frames: Vec<Frame>,
    eof: Token,
    depth: usize,
}

impl TokenCursor {
    pub fn new(tokens: Vec<Token>) -> Self {
        let eof = match tokens.last() {
            Some(token) if token.kind == TokenKind::Eof => token.clone(),
            Some(token) => Token::new(TokenKind::Eof, "", token.line),
            None => Token::new(TokenKind::Eof, "", 1),
        };
        Self {
            frames: vec![Frame {
                tokens,
                pos: 0,
                depth: 0,
            }],
            eof,
            depth: 0,
        }
    }

    fn lookahead(&self, mut n: usize) -> &Token {
        for frame in self.frames.iter().rev() {
            let remaining = frame.remaining();
            if n < remaining.len() {
                return &remaining[n];
            }
            n -= remaining.len();
        }
        &self.eof
    }

    /// The current token. Past the end this is always the end of file token.
    #[inline]
    pub fn peek(&self) -> &Token {
        self.lookahead(0)
    }

    #[inline]
    pub fn peek_next(&self) -> &Token {
        self.lookahead(1)
    }

    /// Returns the current token and moves past it.
    pub fn advance(&mut self) -> Token {
        loop {
            match self.frames.last_mut() {
                None => return self.eof.clone(),
                Some(frame) if frame.pos < frame.tokens.len() => {
                    frame.pos += 1;
                    self.depth = frame.depth;
                    return frame.tokens[frame.pos - 1].clone();
                }
                Some(_) => {
                    self.frames.pop();
                }
            }
        }
    }

    #[inline]
    pub fn check(&self, kind: TokenKind) -> bool {
        self.peek().kind == kind
    }

    #[must_use]
    pub fn expect(&mut self, kind: TokenKind) -> Result<Token, ParserError> {
        if self.check(kind) {
            Ok(self.advance())
        } else {
            Err(ParserError::expected(kind.to_string(), self.peek()))
        }
    }

    /// Skips new line tokens only. Indents are left in place.
    pub fn skip_newlines(&mut self) {
        while self.check(TokenKind::NewLine) {
            self.advance();
        }
    }

    /// Skips empty lines, including lines holding only whitespace.
    pub fn skip_blank_lines(&mut self) {
        loop {
            match (self.peek().kind, self.peek_next().kind) {
                (TokenKind::NewLine, _) | (TokenKind::Indent, TokenKind::NewLine | TokenKind::Eof) => {
                    self.advance();
                }
                _ => break,
            }
        }
    }

    /// True once the end of file token itself has been consumed.
    #[inline]
    pub fn is_at_end(&self) -> bool {
        self.frames
            .iter()
            .all(|frame| frame.pos >= frame.tokens.len())
    }

    /// Nesting depth of the frame the last consumed token came from.
    #[inline]
    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Splices `tokens` in at the current position, one level deeper than
    /// the last consumed token.
    pub fn insert_tokens(&mut self, tokens: Vec<Token>) {
        self.frames.push(Frame {
            tokens,
            pos: 0,
            depth: self.depth + 1,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::{scan, OperationName, RegisterName};

    fn cursor(text: &str) -> TokenCursor {
        TokenCursor::new(scan(text).unwrap())
    }

    #[test]
    fn peek_and_advance() {
        let mut cursor = cursor("MW A");
        assert_eq!(
            TokenKind::Operation(OperationName::Mw),
            cursor.peek().kind
        );
        assert_eq!(
            TokenKind::Register(RegisterName::A),
            cursor.peek_next().kind
        );
        assert_eq!("MW", cursor.advance().lexeme);
        assert_eq!("A", cursor.advance().lexeme);
        assert!(cursor.check(TokenKind::Eof));
        assert!(!cursor.is_at_end());
    }

    #[test]
    fn advance_clamps_at_eof() {
        let mut cursor = cursor("HLT");
        cursor.advance();
        assert_eq!(TokenKind::Eof, cursor.advance().kind);
        assert!(cursor.is_at_end());
        assert_eq!(TokenKind::Eof, cursor.advance().kind);
        assert_eq!(TokenKind::Eof, cursor.peek().kind);
        assert_eq!(TokenKind::Eof, cursor.peek_next().kind);
    }

    #[test]
    fn expect_reports_found_token() {
        let mut cursor = cursor("main HLT");
        assert_eq!("main", cursor.expect(TokenKind::Identifier).unwrap().lexeme);
        let err = cursor.expect(TokenKind::Colon).unwrap_err();
        assert!(matches!(err, ParserError::Expected { line: 1, .. }));
        assert_eq!(
            "[line 1] Error Expected \":\" but found instruction \"HLT\": HLT",
            err.to_string()
        );
    }

    #[test]
    fn skip_blank_lines() {
        let mut blank = cursor("\n   \n\t\n  HLT");
        blank.skip_blank_lines();
        assert_eq!(TokenKind::Indent, blank.peek().kind);
        assert_eq!(4, blank.peek().line);

        let mut lines = cursor("\n\nHLT");
        lines.skip_newlines();
        assert_eq!(TokenKind::Operation(OperationName::Hlt), lines.peek().kind);
    }

    #[test]
    fn inserted_tokens_are_read_first() {
        let mut cursor = cursor("NOP HLT");
        cursor.advance();
        cursor.insert_tokens(scan("A B").unwrap().into_iter().take(2).collect());
        assert_eq!(TokenKind::Register(RegisterName::A), cursor.peek().kind);
        assert_eq!(TokenKind::Register(RegisterName::B), cursor.peek_next().kind);
        assert_eq!(0, cursor.depth());

        cursor.advance();
        assert_eq!(1, cursor.depth());
        cursor.advance();
        assert_eq!(
            TokenKind::Operation(OperationName::Hlt),
            cursor.peek().kind
        );
        cursor.advance();
        assert_eq!(0, cursor.depth());
    }

    #[test]
    fn nested_frames_track_depth() {
        let mut cursor = cursor("HLT");
        cursor.insert_tokens(scan("A").unwrap().into_iter().take(1).collect());
        cursor.advance();
        cursor.insert_tokens(scan("B").unwrap().into_iter().take(1).collect());
        cursor.advance();
        assert_eq!(2, cursor.depth());
        cursor.insert_tokens(Vec::new());
        assert_eq!(TokenKind::Operation(OperationName::Hlt), cursor.advance().kind);
        assert_eq!(0, cursor.depth());
    }
}
