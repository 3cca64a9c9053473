pub mod assembler;
pub mod ast;
pub mod checker;
pub mod diagnostic;
pub mod idents;
pub mod lexer;
pub mod parser;
pub mod printer;
pub mod reader;
pub mod resolver;
pub mod source;
pub mod typing;

use crate::compiler::{
    ast::Statement,
    diagnostic::Diagnostics,
    idents::IdentStorage,
    source::{FileId, FileStore, SourceError, SourceRange},
};

/// Everything the pipeline produced for one source file.
///
/// The statements, identifier storage and diagnostics are always returned,
/// even on failure, so callers can render partial results; `success` is
/// false as soon as any phase reported an error.
#[derive(Debug)]
pub struct Compilation {
    pub statements: Vec<Statement>,
    pub idents: IdentStorage,
    pub diagnostics: Diagnostics,
    pub success: bool,
}

/// Compiles one loaded file end to end.
///
/// The phases run strictly in order and a failing phase prevents the
/// downstream ones from running at all: lexing and parsing, identifier
/// resolution, then type resolution with constant evaluation.
pub fn compile(files: &FileStore, file: FileId) -> Result<Compilation, SourceError> {
    let code = files.text(file)?;
    let span = tracing::debug_span!("compile", file = files.name(file));
    let _enter = span.enter();

    let mut diagnostics = Diagnostics::new();
    let mut idents = IdentStorage::new();

    let (mut statements, mut success) = parser::parse(code, file, &mut diagnostics);
    tracing::debug!(statements = statements.len(), success, "parsing finished");

    if success {
        success = resolver::resolve(&mut statements, &mut idents, &mut diagnostics);
        tracing::debug!(success, "identifier resolution finished");
    }

    if success {
        match checker::check(&mut statements, &mut idents, &mut diagnostics) {
            Ok(checked) => success = checked,
            Err(fatal) => {
                // The fixed point cannot converge, which happens when
                // constant definitions form a cycle; report it and give up
                // on the rest of the pipeline.
                let start = statements
                    .first()
                    .map_or_else(SourceRange::builtin, |statement| statement.range());
                diagnostics.error(fatal, start);
                success = false;
            }
        }
        tracing::debug!(success, "type resolution finished");
    }

    Ok(Compilation {
        statements,
        idents,
        diagnostics,
        success,
    })
}
