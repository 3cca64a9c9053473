use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use nlc::compiler::{
    self, ast::Statement, diagnostic::Message, printer, source::FileStore,
};

/// Compiler front-end for the NL language.
///
/// Compiles a single source file and prints the annotated syntax tree.
#[derive(Debug, Parser)]
#[command(name = "nlc", version)]
struct Args {
    /// Path to the source file to compile.
    input: PathBuf,
}

fn main() -> ExitCode {
    init_tracing();
    let args = Args::parse();

    let mut files = FileStore::new();
    let file = match files.add_path(&args.input) {
        Ok(file) => file,
        Err(error) => {
            eprintln!("error: {error}");
            return ExitCode::from(2);
        }
    };
    if let Err(error) = files.load(file) {
        eprintln!("error: {error}");
        return ExitCode::from(2);
    }

    let compilation = match compiler::compile(&files, file) {
        Ok(compilation) => compilation,
        Err(error) => {
            eprintln!("error: {error}");
            return ExitCode::from(2);
        }
    };

    for message in compilation.diagnostics.messages() {
        render(message, &files);
    }

    for statement in &compilation.statements {
        if statement.flags().print_ast {
            print!("{}", printer::print_statement(statement));
        }
        if statement.flags().print_value {
            print_value(statement, &compilation.idents);
        }
    }

    if compilation.success {
        print!("{}", printer::print_statements(&compilation.statements));
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .compact()
        .init();
}

/// Renders one diagnostic as `path:line:column: kind: message` followed by
/// the source line with the covered span underlined.
///
/// Secondary notes get a narrower gutter than primary messages. Line and
/// column are displayed one based.
fn render(message: &Message, files: &FileStore) {
    let start = message.range.start;
    let end = message.range.end;
    let gutter = if message.primary { "  " } else { " " };

    eprintln!(
        "{}{}:{}:{}: {}: {}",
        if message.primary { "" } else { gutter },
        files.name(start.file),
        start.line + 1,
        start.column + 1,
        message.severity,
        message.error,
    );

    let Some(line) = files.line(start.file, start.line) else {
        return;
    };
    eprintln!("{gutter}{line}");

    let span = if end.line == start.line && end.column > start.column {
        end.column - start.column
    } else {
        line.len().saturating_sub(start.column).max(1)
    };
    let underline: String = std::iter::repeat('^').take(span).collect();
    eprintln!("{gutter}{}{underline}", " ".repeat(start.column));
}

/// Prints the compile time value of a statement's name, for the
/// `#print_value` flag.
fn print_value(statement: &Statement, idents: &nlc::compiler::idents::IdentStorage) {
    let Statement::Const(constant) = statement else {
        return;
    };
    let Some(id) = constant.name.id else {
        return;
    };
    println!("{} = {}", constant.name.name, idents.entry(id).value);
}
