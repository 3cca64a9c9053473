use anyhow::anyhow;

use crate::compiler::{
    ast::{
        traverse::{walk_statements_mut, VisitorMut},
        ConstStatement, FieldAccessExpression, Identifier, ProcStatement, Statement,
    },
    diagnostic::Diagnostics,
    idents::{IdentStorage, ScopeStack},
};

/// Binds every identifier in the tree to an entry in identifier storage.
///
/// Runs two passes sharing the builtin root scope: the scout pass allocates
/// entries for all definitions so forward references work, then the resolve
/// pass connects usages and enforces the recursion rule. Errors accumulate;
/// the return value reports whether there were none.
pub fn resolve(
    statements: &mut [Statement],
    idents: &mut IdentStorage,
    diagnostics: &mut Diagnostics,
) -> bool {
    {
        let scopes = ScopeStack::with_builtins(idents);
        let mut scout = Scout {
            idents: &mut *idents,
            scopes,
            diagnostics: &mut *diagnostics,
            errors: 0,
        };
        walk_statements_mut(&mut scout, statements);
        if scout.errors > 0 {
            return false;
        }
    }

    let scopes = ScopeStack::with_builtins(idents);
    let mut resolve = Resolve {
        idents: &mut *idents,
        scopes,
        diagnostics: &mut *diagnostics,
        errors: 0,
    };
    walk_statements_mut(&mut resolve, statements);
    resolve.errors == 0
}

/// First pass: allocate an entry for every identifier definition.
struct Scout<'a> {
    idents: &'a mut IdentStorage,
    scopes: ScopeStack,
    diagnostics: &'a mut Diagnostics,
    errors: usize,
}

impl VisitorMut for Scout<'_> {
    fn visit_identifier_definition(&mut self, identifier: &mut Identifier) {
        if self.scopes.bound_in_innermost(&identifier.name).is_some() {
            self.diagnostics.error(
                anyhow!(
                    "Declaration of '{}' overshadows a previous declaration.",
                    identifier.name
                ),
                identifier.range,
            );
            self.errors += 1;
            return;
        }
        let id = self.idents.allocate(identifier.name.clone(), identifier.range);
        self.scopes.bind(identifier.name.clone(), id);
        identifier.id = Some(id);
    }

    fn enter_function_scope(&mut self, _statement: &mut ProcStatement) {
        self.scopes.push();
    }

    fn exit_proc(&mut self, _statement: &mut ProcStatement) {
        self.scopes.pop();
    }
}

/// Second pass: connect usages to the entries the scout allocated.
struct Resolve<'a> {
    idents: &'a mut IdentStorage,
    scopes: ScopeStack,
    diagnostics: &'a mut Diagnostics,
    errors: usize,
}

impl VisitorMut for Resolve<'_> {
    fn enter_const(&mut self, statement: &mut ConstStatement) {
        if let Some(id) = statement.name.id {
            self.idents.entry_mut(id).is_being_defined = true;
        }
    }

    fn exit_const(&mut self, statement: &mut ConstStatement) {
        if let Some(id) = statement.name.id {
            self.idents.entry_mut(id).is_being_defined = false;
        }
    }

    fn visit_identifier_definition(&mut self, identifier: &mut Identifier) {
        // The scout already allocated the id; re-binding makes the name
        // visible to lookups in this fresh scope stack.
        if let Some(id) = identifier.id {
            self.scopes.bind(identifier.name.clone(), id);
        }
    }

    fn visit_identifier_usage(&mut self, identifier: &mut Identifier) {
        match self.scopes.lookup(&identifier.name) {
            Some(id) if !self.idents.entry(id).is_being_defined => {
                identifier.id = Some(id);
            }
            Some(id) => {
                self.diagnostics.error(
                    anyhow!("Invalid recursive use of '{}'.", identifier.name),
                    identifier.range,
                );
                let declaration = self.idents.entry(id).range;
                self.diagnostics.note(
                    anyhow!("'{}' is declared here.", identifier.name),
                    declaration,
                );
                self.errors += 1;
            }
            None => {
                self.diagnostics.error(
                    anyhow!("Usage of undeclared identifier '{}'.", identifier.name),
                    identifier.range,
                );
                self.errors += 1;
            }
        }
    }

    fn enter_field_access(&mut self, field_access: &mut FieldAccessExpression) {
        // Segmented identifiers parse, but nothing defines what they bind
        // to yet; fail instead of inventing a binding.
        self.diagnostics.error(
            anyhow!("segmented identifiers are not yet implemented"),
            field_access.range,
        );
        self.errors += 1;
    }

    fn enter_function_scope(&mut self, _statement: &mut ProcStatement) {
        self.scopes.push();
    }

    fn exit_proc(&mut self, _statement: &mut ProcStatement) {
        self.scopes.pop();
    }
}

#[cfg(test)]
mod tests {
    use crate::compiler::{
        ast::Expression,
        parser::parse,
        source::FileId,
    };

    use super::*;

    fn parse_and_resolve(code: &str) -> (Vec<Statement>, IdentStorage, Diagnostics, bool) {
        let mut diagnostics = Diagnostics::new();
        let (mut statements, parsed) = parse(code, FileId::default(), &mut diagnostics);
        assert!(parsed, "test input should parse");
        let mut idents = IdentStorage::new();
        let success = resolve(&mut statements, &mut idents, &mut diagnostics);
        (statements, idents, diagnostics, success)
    }

    fn errors(diagnostics: &Diagnostics) -> Vec<String> {
        diagnostics
            .messages()
            .iter()
            .map(|message| message.error.to_string())
            .collect()
    }

    #[test]
    fn builtin_usage_resolves() {
        let (statements, idents, _, success) = parse_and_resolve("const a: i4 = 1;");
        assert!(success);
        let Statement::Const(constant) = &statements[0] else {
            panic!("expected a constant");
        };
        let Some(Expression::Identifier(ty)) = &constant.type_expression else {
            panic!("expected an identifier type expression");
        };
        let entry = idents.entry(ty.id.expect("type should be resolved"));
        assert!(entry.builtin);
        assert_eq!(entry.name, "i4");
    }

    #[test]
    fn forward_references_resolve() {
        let (statements, idents, _, success) = parse_and_resolve("const a = b; const b = 3;");
        assert!(success);
        let Statement::Const(a) = &statements[0] else {
            panic!("expected a constant");
        };
        let Expression::Identifier(usage) = &a.value else {
            panic!("expected an identifier");
        };
        let entry = idents.entry(usage.id.expect("forward reference should resolve"));
        assert_eq!(entry.name, "b");
        assert!(!entry.builtin);
    }

    #[test]
    fn overshadowing_is_reported_at_the_second_declaration() {
        let (_, _, diagnostics, success) = parse_and_resolve("const a = 1; const a = 2;");
        assert!(!success);
        let errors = errors(&diagnostics);
        assert_eq!(
            errors,
            ["Declaration of 'a' overshadows a previous declaration."]
        );
        let second_a = diagnostics.messages()[0].range;
        assert_eq!(second_a.start.index, 19);
    }

    #[test]
    fn overshadowing_a_builtin_is_an_error() {
        let (_, _, diagnostics, success) = parse_and_resolve("const i4 = 1;");
        assert!(!success);
        assert_eq!(
            errors(&diagnostics),
            ["Declaration of 'i4' overshadows a previous declaration."]
        );
    }

    #[test]
    fn self_reference_is_invalid() {
        let (_, _, diagnostics, success) = parse_and_resolve("const a = a;");
        assert!(!success);
        let messages = diagnostics.messages();
        assert_eq!(messages[0].error.to_string(), "Invalid recursive use of 'a'.");
        assert!(messages[0].primary);
        // Secondary note points at the declaration.
        assert!(!messages[1].primary);
        assert_eq!(messages[1].range.start.index, 6);
    }

    #[test]
    fn undeclared_identifier() {
        let (_, _, diagnostics, success) = parse_and_resolve("const a = nowhere;");
        assert!(!success);
        assert_eq!(
            errors(&diagnostics),
            ["Usage of undeclared identifier 'nowhere'."]
        );
    }

    #[test]
    fn all_errors_accumulate() {
        let (_, _, diagnostics, success) = parse_and_resolve("const a = x; const b = y;");
        assert!(!success);
        assert_eq!(diagnostics.error_count(), 2);
    }

    #[test]
    fn parameters_bind_in_the_function_scope() {
        let (_, _, _, success) =
            parse_and_resolve("proc f param x i4 begin const y = x; end const x = 1;");
        assert!(success);
    }

    #[test]
    fn function_scope_does_not_leak() {
        let (_, _, diagnostics, success) =
            parse_and_resolve("proc f param x i4 begin end const y = x;");
        assert!(!success);
        assert_eq!(
            errors(&diagnostics),
            ["Usage of undeclared identifier 'x'."]
        );
    }

    #[test]
    fn segmented_identifiers_do_not_resolve() {
        let (_, _, diagnostics, success) = parse_and_resolve("const a = 1; const b = a/c;");
        assert!(!success);
        assert!(errors(&diagnostics)
            .iter()
            .any(|error| error.contains("segmented identifiers are not yet implemented")));
    }
}
