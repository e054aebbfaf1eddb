//! Assembler for BreadLang, an indentation structured assembly language.
//!
//! Source text goes through [`lexer::scan`], is parsed into a [`Program`]
//! with macros expanded at their call sites, and is linked into a flat byte
//! image with the `main` subroutine at offset zero.

pub mod ast;
pub mod cursor;
pub mod lexer;
pub mod linker;
pub mod parser;
pub mod symtab;

use crate::{
    ast::Program,
    lexer::LexerError,
    linker::{Linker, LinkerError},
    parser::{Parser, ParserError},
};

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    #[error(transparent)]
    Lexer(#[from] LexerError),

    #[error(transparent)]
    Parser(#[from] ParserError),

    #[error(transparent)]
    Linker(#[from] LinkerError),
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Config {
    /// How deeply macro calls may nest inside other expansions.
    pub max_expansion_depth: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_expansion_depth: 64,
        }
    }
}

pub fn parse(source: &str, config: &Config) -> Result<Program, Error> {
    let tokens = lexer::scan(source)?;
    Ok(Parser::new(tokens, config).parse()?)
}

pub fn link(program: &Program) -> Result<Vec<u8>, Error> {
    Ok(Linker::new().link(program)?)
}

/// Assembles a whole source file into its byte image.
pub fn assemble(source: &str, config: &Config) -> Result<Vec<u8>, Error> {
    link(&parse(source, config)?)
}
