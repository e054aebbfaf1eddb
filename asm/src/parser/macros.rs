use super::{Parser, ParserError};
use crate::{
    ast::MacroDefinition,
    lexer::{Token, TokenKind},
};

impl MacroDefinition {
    /// Copies the body, replacing every identifier that names a parameter
    /// with the argument in the same position.
    pub fn expand(&self, args: &[Token]) -> Vec<Token> {
        self.body
            .iter()
            .map(|token| {
                let arg = match token.kind {
                    TokenKind::Identifier => self
                        .params
                        .iter()
                        .position(|param| *param == token.lexeme)
                        .and_then(|index| args.get(index)),
                    _ => None,
                };
                arg.unwrap_or(token).clone()
            })
            .collect()
    }
}

#[inline]
fn ends_line(kind: TokenKind) -> bool {
    matches!(kind, TokenKind::NewLine | TokenKind::Eof)
}

impl Parser {
    /// `@macro name(p, q):` followed by either the rest of the line or an
    /// indented block.
    pub(super) fn macro_definition(&mut self) -> Result<MacroDefinition, ParserError> {
        self.cursor.expect(TokenKind::Macro)?;
        let name = self.cursor.expect(TokenKind::Identifier)?;

        let mut params = Vec::new();
        if self.cursor.check(TokenKind::ParenOpen) {
            self.cursor.advance();
            if !self.cursor.check(TokenKind::ParenClose) {
                loop {
                    params.push(self.cursor.expect(TokenKind::Identifier)?.lexeme);
                    if !self.cursor.check(TokenKind::Comma) {
                        break;
                    }
                    self.cursor.advance();
                }
            }
            self.cursor.expect(TokenKind::ParenClose)?;
        }
        self.cursor.expect(TokenKind::Colon)?;

        let body = if ends_line(self.cursor.peek().kind) {
            self.macro_block()?
        } else {
            let mut body = Vec::new();
            while !ends_line(self.cursor.peek().kind) {
                body.push(self.cursor.advance());
            }
            body
        };

        Ok(MacroDefinition {
            name: name.lexeme,
            line: name.line,
            params,
            body,
        })
    }

    /// Captures an indented block verbatim. Lines stay separated by a new
    /// line and the block indent so the body reads like hand-written code
    /// once spliced into a subroutine.
    fn macro_block(&mut self) -> Result<Vec<Token>, ParserError> {
        self.block_start()?;

        let mut body = Vec::new();
        loop {
            match self.cursor.peek().kind {
                TokenKind::Eof => break,
                TokenKind::NewLine => {
                    let newline = self.cursor.advance();
                    match self.block_continues()? {
                        Some(indent) => {
                            body.push(newline);
                            body.push(indent);
                        }
                        None => break,
                    }
                }
                _ => body.push(self.cursor.advance()),
            }
        }
        Ok(body)
    }

    /// Reads the arguments following a macro name and splices the expanded
    /// body in at the call site. The line terminator is left for the caller.
    pub(super) fn macro_call(&mut self, name: Token) -> Result<(), ParserError> {
        let depth = self.cursor.depth();

        let mut args = Vec::new();
        if !ends_line(self.cursor.peek().kind) {
            loop {
                let arg = self.cursor.advance();
                if matches!(arg.kind, TokenKind::Comma | TokenKind::Indent) || ends_line(arg.kind) {
                    return Err(ParserError::expected("a macro argument", &arg));
                }
                args.push(arg);

                let next = self.cursor.peek();
                match next.kind {
                    TokenKind::Comma => {
                        self.cursor.advance();
                    }
                    TokenKind::NewLine | TokenKind::Eof => break,
                    _ => {
                        return Err(ParserError::UnterminatedMacroCall {
                            line: next.line,
                            name: name.lexeme,
                            location: next.location(),
                        })
                    }
                }
            }
        }

        let definition = match self.macros.get(&name.lexeme) {
            Some(definition) => definition,
            None => return Err(ParserError::unexpected(&name)),
        };
        if args.len() != definition.params.len() {
            return Err(ParserError::MacroArity {
                line: name.line,
                name: name.lexeme,
                expected: definition.params.len(),
                found: args.len(),
            });
        }
        if depth >= self.max_expansion_depth {
            return Err(ParserError::MacroDepthExceeded {
                line: name.line,
                name: name.lexeme,
                limit: self.max_expansion_depth,
            });
        }

        let tokens = definition.expand(&args);
        log::debug!(
            "[line {}] expanding \"{}\" into {} token(s) at depth {}",
            name.line,
            name.lexeme,
            tokens.len(),
            depth + 1
        );
        self.cursor.insert_tokens(tokens);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::scan;

    fn definition(params: &[&str], body: &str) -> MacroDefinition {
        let mut body = scan(body).unwrap();
        body.pop();
        MacroDefinition {
            name: "m".to_string(),
            line: 1,
            params: params.iter().map(|p| p.to_string()).collect(),
            body,
        }
    }

    fn lexemes(tokens: &[Token]) -> Vec<&str> {
        tokens.iter().map(|t| t.lexeme.as_str()).collect()
    }

    #[test]
    fn substitutes_parameters_by_position() {
        let definition = definition(&["dst", "src"], "MW dst, src");
        let args = vec![
            Token::new(TokenKind::Register(crate::lexer::RegisterName::B), "B", 7),
            Token::new(TokenKind::Number, "0x10", 7),
        ];
        let expanded = definition.expand(&args);
        assert_eq!(vec!["MW", "B", ",", "0x10"], lexemes(&expanded));
        assert_eq!(TokenKind::Number, expanded[3].kind);
        assert_eq!(7, expanded[3].line);
    }

    #[test]
    fn leaves_other_tokens_alone() {
        let definition = definition(&["x"], "JMP loop");
        let args = vec![Token::new(TokenKind::Identifier, "done", 2)];
        assert_eq!(vec!["JMP", "loop"], lexemes(&definition.expand(&args)));
        // The body is never modified
        assert_eq!(vec!["JMP", "loop"], lexemes(&definition.body));
    }

    #[test]
    fn not_hygienic() {
        let definition = definition(&["x"], "JMP x");
        let args = vec![Token::new(TokenKind::Identifier, "x", 2)];
        assert_eq!(vec!["JMP", "x"], lexemes(&definition.expand(&args)));
    }
}
