//! A compiler front and middle end for a small Pascal-like teaching
//! language. Source text is tokenized and parsed into an AST, checked by the
//! semantic analyzer, lowered to three-address IR and cleaned up by dead
//! code elimination.

use crate::{
    frontend::{
        SourceFile,
        ast::Program,
        lexer::{LexError, Lexer, Token},
        parser::{Parser, SyntaxError},
    },
    middle::{
        diagnostic::Diagnostic,
        ir::{Instruction, ast_lowering::IrGenerator},
        optimization::{self, Optimized},
        semantic::SemanticAnalyzer,
        symbol_table::SymbolTable,
    },
};

pub mod frontend;
pub mod index;
pub mod middle;

/// Every intermediate product of a successful compilation
#[derive(Debug)]
pub struct Compilation {
    pub tokens: Vec<Token>,
    pub program: Program,
    pub symbol_table: SymbolTable,
    pub instructions: Vec<Instruction>,
    pub optimized: Optimized,
}

/// Stage at which compilation stopped, with everything it reported
#[derive(Debug)]
pub enum CompileError {
    Lexical(Vec<LexError>),
    Syntax(Vec<SyntaxError>),
    Semantic {
        diagnostics: Vec<Diagnostic>,
        symbol_table: SymbolTable,
    },
}

impl CompileError {
    /// Line number and message of every reported error, in report order
    pub fn messages(&self) -> Vec<(usize, String)> {
        match self {
            CompileError::Lexical(errors) => errors
                .iter()
                .map(|error| (error.line, error.message.clone()))
                .collect(),
            CompileError::Syntax(errors) => errors
                .iter()
                .map(|error| {
                    (
                        error.line,
                        format!("expected {} but found `{}`", error.expected, error.found),
                    )
                })
                .collect(),
            CompileError::Semantic { diagnostics, .. } => diagnostics
                .iter()
                .map(|diagnostic| (diagnostic.line, diagnostic.message.clone()))
                .collect(),
        }
    }
}

impl core::fmt::Display for CompileError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CompileError::Lexical(errors) => write!(f, "{} lexical error(s)", errors.len()),
            CompileError::Syntax(errors) => write!(f, "{} syntax error(s)", errors.len()),
            CompileError::Semantic { diagnostics, .. } => {
                write!(f, "{} semantic error(s)", diagnostics.len())
            }
        }
    }
}

impl std::error::Error for CompileError {}

/// Runs the whole pipeline. Each stage only runs if the previous one
/// reported nothing.
pub fn compile(source_file: &SourceFile) -> Result<Compilation, CompileError> {
    let tokens = Lexer::tokenize(source_file).map_err(CompileError::Lexical)?;
    tracing::debug!(origin = %source_file.origin, tokens = tokens.len(), "lexed");

    let program = Parser::parse_program(tokens.clone()).map_err(CompileError::Syntax)?;
    tracing::debug!(program = %program.name.name, "parsed");

    let analysis = SemanticAnalyzer::analyze(&program);
    if !analysis.is_success() {
        return Err(CompileError::Semantic {
            diagnostics: analysis.diagnostics,
            symbol_table: analysis.symbol_table,
        });
    }

    let instructions = IrGenerator::generate(&program);
    let optimized = optimization::optimize(&instructions);

    Ok(Compilation {
        tokens,
        program,
        symbol_table: analysis.symbol_table,
        instructions,
        optimized,
    })
}
