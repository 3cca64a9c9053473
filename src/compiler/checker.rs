use anyhow::anyhow;
use thiserror::Error;

use crate::{
    compiler::{
        ast::{ConstStatement, Expression, Parameter, ProcStatement, Statement, UnaryOperator},
        assembler::Evaluator,
        diagnostic::Diagnostics,
        idents::{EntryData, IdentId, IdentStorage},
        typing::{binary_result_type, unary_result_type, Constantness, IntKind, Type},
    },
    runtime::value::Value,
};

/// Fatal failures of the type resolver.
///
/// Unlike the accumulated per-expression diagnostics, these abort the rest
/// of the pipeline. [`TypeError::NoProgress`] is expected whenever constant
/// definitions form a dependency cycle: no pass can shrink the unresolved
/// set, so resolution can never converge. The driver reports it as an
/// ordinary diagnostic and exits nonzero.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TypeError {
    #[error(
        "type resolution made no progress ({unresolved} expressions still unresolved); \
         constant definitions probably form a cycle"
    )]
    NoProgress { unresolved: usize },
}

/// Raised while resolving when an identifier's entry is not filled in yet.
///
/// Suspensions are not errors: the statement is simply retried on the next
/// pass, by which time the entry it waited for may have been resolved.
struct Suspended;

/// Resolves types, constantness and compile time values across the file.
///
/// Repeats passes over all statements until nothing is left unresolved.
/// Each pass must strictly decrease the number of suspensions, otherwise
/// the dependency graph is cyclic and resolution fails fatally. Returns
/// whether no type errors were diagnosed.
pub fn check(
    statements: &mut [Statement],
    idents: &mut IdentStorage,
    diagnostics: &mut Diagnostics,
) -> Result<bool, TypeError> {
    let errors_before = diagnostics.error_count();
    let mut previous = usize::MAX;
    loop {
        let mut pass = Pass {
            idents: &mut *idents,
            diagnostics: &mut *diagnostics,
            unresolved: 0,
        };
        for statement in &mut *statements {
            pass.resolve_statement(statement);
        }
        let unresolved = pass.unresolved;
        tracing::debug!(unresolved, "type resolution pass finished");

        if unresolved == 0 {
            break;
        }
        if unresolved >= previous {
            return Err(TypeError::NoProgress { unresolved });
        }
        previous = unresolved;
    }
    Ok(diagnostics.error_count() == errors_before)
}

struct Pass<'a> {
    idents: &'a mut IdentStorage,
    diagnostics: &'a mut Diagnostics,
    unresolved: usize,
}

impl Pass<'_> {
    fn resolve_statement(&mut self, statement: &mut Statement) {
        match statement {
            Statement::Const(statement) => {
                // A suspension aborts just this statement; it was already
                // counted where it was raised.
                let _ = self.resolve_const(statement);
            }
            Statement::Proc(statement) => self.resolve_proc(statement),
        }
    }

    /// Resolves the signature expressions and constant statements of a
    /// function body; everything else about functions stays untouched until
    /// the evaluator learns calls.
    ///
    /// Parameters are bound as runtime values of their declared type, so a
    /// constant that references one diagnoses as not-constant instead of
    /// suspending forever.
    fn resolve_proc(&mut self, statement: &mut ProcStatement) {
        for parameter in &mut statement.parameters {
            let _ = self.resolve_parameter(parameter);
        }
        if let Some(return_type) = &mut statement.return_type {
            let _ = self.resolve_expression(return_type);
        }
        for statement in &mut statement.body {
            self.resolve_statement(statement);
        }
    }

    fn resolve_parameter(&mut self, parameter: &mut Parameter) -> Result<(), Suspended> {
        let Some(id) = parameter.name.id else {
            return Ok(());
        };
        if self.idents.entry(id).data != EntryData::None {
            return Ok(());
        }

        self.resolve_expression(&mut parameter.type_expression)?;
        if parameter.type_expression.info().failed {
            return self.poison(id);
        }
        let evaluator = Evaluator::new(self.idents);
        let Some(value) = evaluator.evaluate(&parameter.type_expression, None, self.diagnostics)
        else {
            return self.poison(id);
        };
        let Some(ty) = value.as_type() else {
            self.diagnostics.error(
                anyhow!("type expression does not evaluate to a type"),
                parameter.type_expression.range(),
            );
            return self.poison(id);
        };

        parameter.name.info.ty = Some(ty);
        parameter.name.info.constantness = Constantness::NotConstant;
        self.idents.entry_mut(id).data = EntryData::Expression {
            constantness: Constantness::NotConstant,
            ty,
        };
        Ok(())
    }

    fn resolve_const(&mut self, statement: &mut ConstStatement) -> Result<(), Suspended> {
        let Some(id) = statement.name.id else {
            return Ok(());
        };
        if self.idents.entry(id).data != EntryData::None {
            // Fully handled in an earlier pass, successfully or not.
            return Ok(());
        }

        let target = match &mut statement.type_expression {
            Some(type_expression) => {
                self.resolve_expression(type_expression)?;
                if type_expression.info().failed {
                    return self.poison(id);
                }
                let evaluator = Evaluator::new(self.idents);
                let Some(value) = evaluator.evaluate(type_expression, None, self.diagnostics)
                else {
                    return self.poison(id);
                };
                let Some(ty) = value.as_type() else {
                    self.diagnostics.error(
                        anyhow!("type expression does not evaluate to a type"),
                        type_expression.range(),
                    );
                    return self.poison(id);
                };
                Some(ty)
            }
            None => None,
        };

        self.resolve_expression(&mut statement.value)?;
        let info = statement.value.info();
        if info.failed {
            return self.poison(id);
        }
        let value_type = info.ty.expect("resolved expression should have a type");

        if let Some(target) = target {
            if !value_type.coercible_to(&target) {
                self.diagnostics.error(
                    anyhow!("'{value_type}' cannot be coerced to '{target}'"),
                    statement.value.range(),
                );
                return self.poison(id);
            }
        }
        if info.constantness != Constantness::Constant {
            self.diagnostics.error(
                anyhow!(
                    "the value of constant '{}' is not a compile time constant",
                    statement.name.name
                ),
                statement.value.range(),
            );
            return self.poison(id);
        }

        let ty = target.unwrap_or(value_type);
        let evaluator = Evaluator::new(self.idents);
        let Some(value) = evaluator.evaluate(&statement.value, Some(&ty), self.diagnostics) else {
            return self.poison(id);
        };

        statement.name.info.ty = Some(ty);
        statement.name.info.constantness = Constantness::Constant;
        statement.name.info.value = Some(value.clone());

        let entry = self.idents.entry_mut(id);
        entry.data = EntryData::Expression {
            constantness: Constantness::Constant,
            ty,
        };
        entry.value = value;
        Ok(())
    }

    fn poison(&mut self, id: IdentId) -> Result<(), Suspended> {
        self.idents.entry_mut(id).data = EntryData::Poisoned;
        Ok(())
    }

    /// Resolves one expression depth first, left to right.
    ///
    /// Already annotated (or already failed) nodes are skipped, which is
    /// what makes repeated passes idempotent.
    fn resolve_expression(&mut self, expression: &mut Expression) -> Result<(), Suspended> {
        if expression.info().ty.is_some() || expression.info().failed {
            return Ok(());
        }

        match expression {
            Expression::Integer(integer) => {
                integer.info.ty = Some(Type::Integer(integer.flag.integer_type()));
                integer.info.constantness = Constantness::Constant;
                integer.info.value = Some(Value::int(integer.flag, integer.value.clone()));
                Ok(())
            }
            Expression::String(string) => {
                self.diagnostics.error(
                    anyhow!("string literals are not yet supported in expressions"),
                    string.range,
                );
                string.info.failed = true;
                Ok(())
            }
            Expression::Identifier(identifier) => {
                let Some(id) = identifier.id else {
                    identifier.info.failed = true;
                    return Ok(());
                };
                let entry = self.idents.entry(id);
                match entry.data.clone() {
                    EntryData::Expression { constantness, ty } => {
                        identifier.info.ty = Some(ty);
                        identifier.info.constantness = constantness;
                        if entry.value != Value::None {
                            identifier.info.value = Some(entry.value.clone());
                        }
                        Ok(())
                    }
                    EntryData::Poisoned => {
                        identifier.info.failed = true;
                        Ok(())
                    }
                    EntryData::None => {
                        self.unresolved += 1;
                        Err(Suspended)
                    }
                }
            }
            Expression::Binary(binary) => {
                self.resolve_expression(&mut binary.left)?;
                self.resolve_expression(&mut binary.right)?;
                if binary.left.info().failed || binary.right.info().failed {
                    binary.info.failed = true;
                    return Ok(());
                }
                let left = binary.left.info().ty.expect("resolved expression should have a type");
                let right = binary
                    .right
                    .info()
                    .ty
                    .expect("resolved expression should have a type");
                match binary_result_type(binary.operator, &left, &right) {
                    Some(ty) => {
                        binary.info.ty = Some(ty);
                        binary.info.constantness = binary
                            .left
                            .info()
                            .constantness
                            .mix(binary.right.info().constantness);
                    }
                    None => {
                        self.diagnostics.error(
                            anyhow!(
                                "incompatible operand types '{left}' and '{right}' for {}",
                                binary.operator.name()
                            ),
                            binary.operator_range,
                        );
                        binary.info.failed = true;
                    }
                }
                Ok(())
            }
            Expression::Unary(unary) => {
                self.resolve_expression(&mut unary.operand)?;
                if unary.operand.info().failed {
                    unary.info.failed = true;
                    return Ok(());
                }
                let operand = unary
                    .operand
                    .info()
                    .ty
                    .expect("resolved expression should have a type");
                match unary_result_type(unary.operator, &operand) {
                    Some(ty) => {
                        unary.info.ty = Some(ty);
                        unary.info.constantness = unary.operand.info().constantness;
                        unary.info.value = unary
                            .operand
                            .info()
                            .value
                            .as_ref()
                            .and_then(|value| fold_unary(unary.operator, value, &ty));
                    }
                    None => {
                        self.diagnostics.error(
                            anyhow!(
                                "unsupported unary operation {} on type '{operand}'",
                                unary.operator.name()
                            ),
                            unary.range,
                        );
                        unary.info.failed = true;
                    }
                }
                Ok(())
            }
            Expression::Call(call) => {
                self.resolve_expression(&mut call.callee)?;
                for argument in &mut call.arguments {
                    self.resolve_expression(argument)?;
                }
                self.diagnostics.error(
                    anyhow!("call expressions cannot be evaluated at compile time yet"),
                    call.range,
                );
                call.info.failed = true;
                call.info.constantness = Constantness::NotConstant;
                Ok(())
            }
            Expression::FieldAccess(field_access) => {
                // The identifier resolver already refused to bind these, so
                // a failed pipeline never gets here; fail again for safety.
                self.diagnostics.error(
                    anyhow!("segmented identifiers are not yet implemented"),
                    field_access.range,
                );
                field_access.info.failed = true;
                Ok(())
            }
            Expression::Group(group) => {
                self.resolve_expression(&mut group.inner)?;
                let inner = group.inner.info().clone();
                if inner.failed {
                    group.info.failed = true;
                    return Ok(());
                }
                group.info.ty = inner.ty;
                group.info.constantness = inner.constantness;
                group.info.value = inner.value;
                Ok(())
            }
        }
    }
}

/// Folds a unary operator over a known operand value, producing the cached
/// value of the unary node itself.
fn fold_unary(operator: UnaryOperator, operand: &Value, ty: &Type) -> Option<Value> {
    match operator {
        UnaryOperator::Id => Some(operand.clone()),
        UnaryOperator::Neg => {
            let kind = int_kind(ty)?;
            Some(Value::int(kind, -operand.to_big_int()?))
        }
        UnaryOperator::BitNot => {
            let kind = int_kind(ty)?;
            Some(Value::int(kind, !operand.to_big_int()?))
        }
        UnaryOperator::LogicNot => Some(Value::Bool(!operand.as_bool()?)),
    }
}

fn int_kind(ty: &Type) -> Option<IntKind> {
    match ty {
        Type::Integer(integer) => Some(IntKind::of(integer)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use num::BigInt;

    use crate::compiler::{parser::parse, resolver::resolve, source::FileId};

    use super::*;

    struct Checked {
        statements: Vec<Statement>,
        idents: IdentStorage,
        diagnostics: Diagnostics,
        success: bool,
    }

    fn check_code(code: &str) -> Checked {
        let mut diagnostics = Diagnostics::new();
        let (mut statements, parsed) = parse(code, FileId::default(), &mut diagnostics);
        assert!(parsed, "test input should parse");
        let mut idents = IdentStorage::new();
        assert!(
            resolve(&mut statements, &mut idents, &mut diagnostics),
            "test input should resolve"
        );
        let success = check(&mut statements, &mut idents, &mut diagnostics)
            .expect("type resolution should make progress");
        Checked {
            statements,
            idents,
            diagnostics,
            success,
        }
    }

    fn constant<'a>(checked: &'a Checked, index: usize) -> &'a ConstStatement {
        match &checked.statements[index] {
            Statement::Const(statement) => statement,
            Statement::Proc(_) => panic!("expected a constant"),
        }
    }

    fn entry_value(checked: &Checked, statement: &ConstStatement) -> Value {
        checked
            .idents
            .entry(statement.name.id.expect("name should be resolved"))
            .value
            .clone()
    }

    fn errors(checked: &Checked) -> Vec<String> {
        checked
            .diagnostics
            .messages()
            .iter()
            .map(|message| message.error.to_string())
            .collect()
    }

    #[test]
    fn builtin_arithmetic() {
        let checked = check_code("const a: i4 = 1 + 2;");
        assert!(checked.success);
        let a = constant(&checked, 0);
        assert_eq!(a.name.info.ty, Some(Type::Integer(IntKind::I4.integer_type())));
        assert_eq!(entry_value(&checked, a), Value::I4(3));
    }

    #[test]
    fn ct_int_peer_resolves_with_the_annotation() {
        let checked = check_code("const a: i4 = 1 + 2ct;");
        assert!(checked.success);
        assert_eq!(entry_value(&checked, constant(&checked, 0)), Value::I4(3));
    }

    #[test]
    fn sized_literal_drives_peer_resolution() {
        let checked = check_code("const a = 1 + 2u2;");
        assert!(checked.success);
        let a = constant(&checked, 0);
        assert_eq!(a.value.info().ty, Some(Type::Integer(IntKind::U2.integer_type())));
        assert_eq!(entry_value(&checked, a), Value::U2(3));
    }

    #[test]
    fn inferred_constant_keeps_ct_int() {
        let checked = check_code("const a = 1 + 2;");
        assert!(checked.success);
        let a = constant(&checked, 0);
        assert_eq!(a.name.info.ty, Some(Type::CT_INT));
        assert_eq!(entry_value(&checked, a), Value::CtInt(BigInt::from(3)));
    }

    #[test]
    fn forward_reference_converges_in_two_passes() {
        let checked = check_code("const a = b; const b = 3;");
        assert!(checked.success);
        let a = constant(&checked, 0);
        assert_eq!(a.name.info.ty, Some(Type::CT_INT));
        assert_eq!(entry_value(&checked, a), Value::CtInt(BigInt::from(3)));
    }

    #[test]
    fn coercion_failure_is_anchored_at_the_value() {
        let checked = check_code("const a: bool = 1 + 2;");
        assert!(!checked.success);
        assert_eq!(errors(&checked), ["'ct_int' cannot be coerced to 'bool'"]);
        // The range covers the right hand side, not the whole statement.
        let range = checked.diagnostics.messages()[0].range;
        assert_eq!(range.start.index, 16);
        // No value was assigned.
        assert_eq!(entry_value(&checked, constant(&checked, 0)), Value::None);
    }

    #[test]
    fn incompatible_operands() {
        let checked = check_code("const a = 1u1 + 2i2;");
        assert!(!checked.success);
        assert_eq!(
            errors(&checked),
            ["incompatible operand types 'u1' and 'i2' for `+`"]
        );
    }

    #[test]
    fn comparisons_have_boolean_type() {
        let checked = check_code("const a = 1 < 2;");
        assert!(checked.success);
        let a = constant(&checked, 0);
        assert_eq!(a.name.info.ty, Some(Type::Boolean));
        assert_eq!(entry_value(&checked, a), Value::Bool(true));
    }

    #[test]
    fn logical_operators_on_booleans() {
        let checked = check_code("const a = (1 < 2) and (3 < 2);");
        assert!(checked.success);
        assert_eq!(entry_value(&checked, constant(&checked, 0)), Value::Bool(false));
    }

    #[test]
    fn logical_not_folds_through_a_constant() {
        let checked = check_code("const a = 1 < 2; const b = not a;");
        assert!(checked.success);
        assert_eq!(entry_value(&checked, constant(&checked, 1)), Value::Bool(false));
    }

    #[test]
    fn unary_negation() {
        let checked = check_code("const a: i4 = -5;");
        assert!(checked.success);
        assert_eq!(entry_value(&checked, constant(&checked, 0)), Value::I4(-5));
    }

    #[test]
    fn unary_on_wrong_type_is_an_error() {
        let checked = check_code("const a = not 1;");
        assert!(!checked.success);
        assert_eq!(
            errors(&checked),
            ["unsupported unary operation `not` on type 'ct_int'"]
        );
    }

    #[test]
    fn type_expression_must_evaluate_to_a_type() {
        let checked = check_code("const n = 5; const a: n = 1;");
        assert!(!checked.success);
        assert!(errors(&checked)
            .contains(&"type expression does not evaluate to a type".to_string()));
    }

    #[test]
    fn constant_chains_resolve_across_passes() {
        let checked = check_code("const a = b + 1; const b = c + 1; const c = 1;");
        assert!(checked.success);
        assert_eq!(
            entry_value(&checked, constant(&checked, 0)),
            Value::CtInt(BigInt::from(3))
        );
    }

    #[test]
    fn cyclic_constants_fail_fatally() {
        let mut diagnostics = Diagnostics::new();
        let (mut statements, _) = parse(
            "const a = b; const b = a;",
            FileId::default(),
            &mut diagnostics,
        );
        let mut idents = IdentStorage::new();
        assert!(resolve(&mut statements, &mut idents, &mut diagnostics));
        assert_eq!(
            check(&mut statements, &mut idents, &mut diagnostics),
            Err(TypeError::NoProgress { unresolved: 2 })
        );
    }

    #[test]
    fn broken_constants_poison_their_dependents() {
        let checked = check_code("const a: bool = 1; const b = a;");
        assert!(!checked.success);
        // Only the root cause is reported; `b` fails silently.
        assert_eq!(errors(&checked), ["'ct_int' cannot be coerced to 'bool'"]);
    }

    #[test]
    fn checking_twice_changes_nothing() {
        let mut diagnostics = Diagnostics::new();
        let (mut statements, _) =
            parse("const a: i4 = 1 + 2; const b = a;", FileId::default(), &mut diagnostics);
        let mut idents = IdentStorage::new();
        assert!(resolve(&mut statements, &mut idents, &mut diagnostics));
        assert!(check(&mut statements, &mut idents, &mut diagnostics).unwrap());

        let before = statements.clone();
        let messages_before = diagnostics.messages().len();
        assert!(check(&mut statements, &mut idents, &mut diagnostics).unwrap());
        assert_eq!(statements, before);
        assert_eq!(diagnostics.messages().len(), messages_before);
    }

    #[test]
    fn literal_overflow_truncates_without_diagnostics() {
        let checked = check_code("const a: u1 = 300;");
        assert!(checked.success);
        assert_eq!(entry_value(&checked, constant(&checked, 0)), Value::U1(44));
    }

    #[test]
    fn division_by_zero_is_an_evaluation_error() {
        let checked = check_code("const a = 1 / 0;");
        assert!(!checked.success);
        assert_eq!(errors(&checked), ["division by zero"]);
    }

    #[test]
    fn function_body_constants_are_checked() {
        let checked = check_code("proc f begin const a: bool = 1; end");
        assert!(!checked.success);
        assert_eq!(errors(&checked), ["'ct_int' cannot be coerced to 'bool'"]);
    }

    #[test]
    fn parameter_types_are_annotated() {
        let checked = check_code("proc f param x i4 begin end");
        assert!(checked.success);
        let Statement::Proc(proc) = &checked.statements[0] else {
            panic!("expected a function");
        };
        assert_eq!(
            proc.parameters[0].type_expression.info().ty,
            Some(Type::Meta)
        );
        assert_eq!(
            proc.parameters[0].name.info.ty,
            Some(Type::Integer(IntKind::I4.integer_type()))
        );
        assert_eq!(
            proc.parameters[0].name.info.constantness,
            Constantness::NotConstant
        );
    }

    #[test]
    fn constants_cannot_reference_parameters() {
        let checked = check_code("proc f param x i4 begin const y = x; end");
        assert!(!checked.success);
        assert_eq!(
            errors(&checked),
            ["the value of constant 'y' is not a compile time constant"]
        );
    }
}
