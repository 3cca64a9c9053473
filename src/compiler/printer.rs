use std::fmt::Write;

use itertools::Itertools;

use crate::compiler::{
    ast::{
        traverse::{walk_statement, walk_statements, Visitor},
        BinaryExpression, CallExpression, ConstStatement, ExprInfo, FieldAccessExpression,
        GroupExpression, Identifier, IntegerLiteral, ProcStatement, Statement, StatementFlags,
        StringLiteral, UnaryExpression,
    },
    typing::{Constantness, IntKind},
};

/// Renders the annotated tree as an indented listing.
///
/// Every expression line carries its resolved type, constantness and cached
/// value where present; unresolved slots print as `?` so partially resolved
/// trees remain readable.
pub fn print_statements(statements: &[Statement]) -> String {
    let mut printer = Printer {
        out: String::new(),
        indent: 0,
    };
    walk_statements(&mut printer, statements);
    printer.out
}

pub fn print_statement(statement: &Statement) -> String {
    let mut printer = Printer {
        out: String::new(),
        indent: 0,
    };
    walk_statement(&mut printer, statement);
    printer.out
}

struct Printer {
    out: String,
    indent: usize,
}

impl Printer {
    fn line(&mut self, text: &str) {
        for _ in 0..self.indent {
            self.out.push_str("  ");
        }
        self.out.push_str(text);
        self.out.push('\n');
    }

    fn header(&mut self, keyword: &str, flags: StatementFlags, documentation: Option<&str>) {
        let mut line = keyword.to_string();
        let flag_names = [
            (flags.print_ast, "print_ast"),
            (flags.print_value, "print_value"),
        ]
        .iter()
        .filter(|(set, _)| *set)
        .map(|(_, name)| *name)
        .join(", ");
        if !flag_names.is_empty() {
            write!(line, " [{flag_names}]").expect("writing to a string should not fail");
        }
        self.line(&line);
        if let Some(documentation) = documentation {
            self.indent += 1;
            for doc_line in documentation.lines() {
                self.line(doc_line);
            }
            self.indent -= 1;
        }
    }
}

fn annotations(info: &ExprInfo) -> String {
    let constantness = match info.constantness {
        Constantness::Constant => "constant",
        Constantness::Unknown => "?",
        Constantness::NotConstant => "not constant",
    };
    let ty = info
        .ty
        .map_or_else(|| "?".to_string(), |ty| ty.to_string());
    let mut text = format!(" : {ty} ({constantness})");
    if let Some(value) = &info.value {
        write!(text, " = {value}").expect("writing to a string should not fail");
    }
    text
}

impl Visitor for Printer {
    fn enter_const(&mut self, statement: &ConstStatement) {
        self.header("constant", statement.flags, statement.documentation.as_deref());
        self.indent += 1;
    }

    fn exit_const(&mut self, _statement: &ConstStatement) {
        self.indent -= 1;
    }

    fn enter_proc(&mut self, statement: &ProcStatement) {
        let mut keyword = "function".to_string();
        let traits = [
            (statement.recursive, "recursive"),
            (statement.entry_point, "entry_point"),
        ]
        .iter()
        .filter(|(set, _)| *set)
        .map(|(_, name)| *name)
        .join(", ");
        if !traits.is_empty() {
            write!(keyword, " ({traits})").expect("writing to a string should not fail");
        }
        self.header(&keyword, statement.flags, statement.documentation.as_deref());
        self.indent += 1;
    }

    fn exit_proc(&mut self, _statement: &ProcStatement) {
        self.indent -= 1;
    }

    fn enter_binary(&mut self, binary: &BinaryExpression) {
        self.line(&format!(
            "binary {}{}",
            binary.operator.name(),
            annotations(&binary.info)
        ));
        self.indent += 1;
    }

    fn exit_binary(&mut self, _binary: &BinaryExpression) {
        self.indent -= 1;
    }

    fn enter_unary(&mut self, unary: &UnaryExpression) {
        self.line(&format!(
            "unary {}{}",
            unary.operator.name(),
            annotations(&unary.info)
        ));
        self.indent += 1;
    }

    fn exit_unary(&mut self, _unary: &UnaryExpression) {
        self.indent -= 1;
    }

    fn enter_call(&mut self, call: &CallExpression) {
        self.line(&format!("call{}", annotations(&call.info)));
        self.indent += 1;
    }

    fn exit_call(&mut self, _call: &CallExpression) {
        self.indent -= 1;
    }

    fn enter_group(&mut self, group: &GroupExpression) {
        self.line(&format!("group{}", annotations(&group.info)));
        self.indent += 1;
    }

    fn exit_group(&mut self, _group: &GroupExpression) {
        self.indent -= 1;
    }

    fn enter_field_access(&mut self, field_access: &FieldAccessExpression) {
        self.line(&format!("field access{}", annotations(&field_access.info)));
        self.indent += 1;
    }

    fn exit_field_access(&mut self, _field_access: &FieldAccessExpression) {
        self.indent -= 1;
    }

    fn visit_identifier(&mut self, identifier: &Identifier) {
        let id = identifier
            .id
            .map_or_else(|| "?".to_string(), |id| id.to_string());
        self.line(&format!(
            "identifier '{}' {id}{}",
            identifier.name,
            annotations(&identifier.info)
        ));
    }

    fn visit_integer(&mut self, integer: &IntegerLiteral) {
        let flag = if integer.flag == IntKind::Ct {
            String::new()
        } else {
            format!(" ({})", integer.flag.flag_name())
        };
        self.line(&format!(
            "integer {}{flag}{}",
            integer.value,
            annotations(&integer.info)
        ));
    }

    fn visit_string(&mut self, string: &StringLiteral) {
        self.line(&format!("string \"{}\"", string.value));
    }
}

#[cfg(test)]
mod tests {
    use crate::compiler::{
        checker::check, diagnostic::Diagnostics, idents::IdentStorage, parser::parse,
        resolver::resolve, source::FileId,
    };

    use super::*;

    fn annotated(code: &str) -> String {
        let mut diagnostics = Diagnostics::new();
        let (mut statements, _) = parse(code, FileId::default(), &mut diagnostics);
        let mut idents = IdentStorage::new();
        assert!(resolve(&mut statements, &mut idents, &mut diagnostics));
        assert!(check(&mut statements, &mut idents, &mut diagnostics).unwrap());
        print_statements(&statements)
    }

    #[test]
    fn annotated_constant_listing() {
        let listing = annotated("const a: i4 = 1 + 2;");
        let lines: Vec<_> = listing.lines().collect();
        assert_eq!(lines[0], "constant");
        assert_eq!(lines[1], "  identifier 'a' #13 : i4 (constant) = i4(3)");
        assert_eq!(lines[2], "  identifier 'i4' #3 : type (constant) = type(i4)");
        assert_eq!(lines[3], "  binary `+` : ct_int (constant)");
        assert_eq!(lines[4], "    integer 1 : ct_int (constant) = ct_int(1)");
        assert_eq!(lines[5], "    integer 2 : ct_int (constant) = ct_int(2)");
    }

    #[test]
    fn unresolved_slots_print_as_question_marks() {
        let mut diagnostics = Diagnostics::new();
        let (statements, _) = parse("const a = 1;", FileId::default(), &mut diagnostics);
        let listing = print_statements(&statements);
        assert!(listing.contains("identifier 'a' ? : ? (?)"));
    }
}
