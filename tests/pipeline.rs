//! End to end tests driving the whole pipeline through [`compiler::compile`].

use num::BigInt;

use nlc::compiler::{
    self,
    ast::{
        traverse::{walk_statements, Visitor},
        BinaryExpression, ConstStatement, Identifier, IntegerLiteral, Statement, UnaryExpression,
    },
    source::FileStore,
    typing::{Constantness, IntKind, Type},
    Compilation,
};
use nlc::runtime::value::Value;

fn compile(code: &str) -> Compilation {
    let mut files = FileStore::new();
    let file = files.add_blob("test.nl", code);
    compiler::compile(&files, file).expect("blob sources are always loaded")
}

fn errors(compilation: &Compilation) -> Vec<String> {
    compilation
        .diagnostics
        .messages()
        .iter()
        .map(|message| message.error.to_string())
        .collect()
}

fn constant<'a>(compilation: &'a Compilation, index: usize) -> &'a ConstStatement {
    match &compilation.statements[index] {
        Statement::Const(statement) => statement,
        Statement::Proc(_) => panic!("expected a constant"),
    }
}

fn entry_value(compilation: &Compilation, statement: &ConstStatement) -> Value {
    let id = statement.name.id.expect("constant name should be resolved");
    compilation.idents.entry(id).value.clone()
}

#[test]
fn builtin_arithmetic() {
    let compilation = compile("const a: i4 = 1 + 2;");
    assert!(compilation.success);
    assert!(compilation.diagnostics.messages().is_empty());
    assert_eq!(compilation.statements.len(), 1);

    let a = constant(&compilation, 0);
    assert_eq!(
        a.name.info.ty,
        Some(Type::Integer(IntKind::I4.integer_type()))
    );
    assert_eq!(entry_value(&compilation, a), Value::I4(3));
}

#[test]
fn peer_resolution_with_ct_int() {
    let compilation = compile("const a: i4 = 1 + 2ct;");
    assert!(compilation.success);
    assert!(compilation.diagnostics.messages().is_empty());
    assert_eq!(entry_value(&compilation, constant(&compilation, 0)), Value::I4(3));
}

#[test]
fn overshadowing_declaration() {
    let compilation = compile("const a = 1; const a = 2;");
    assert!(!compilation.success);
    assert_eq!(
        errors(&compilation),
        ["Declaration of 'a' overshadows a previous declaration."]
    );
    // Anchored at the second `a`.
    assert_eq!(compilation.diagnostics.messages()[0].range.start.index, 19);
}

#[test]
fn forward_reference() {
    let compilation = compile("const a = b; const b = 3;");
    assert!(compilation.success);
    assert!(compilation.diagnostics.messages().is_empty());

    let a = constant(&compilation, 0);
    assert_eq!(a.name.info.ty, Some(Type::CT_INT));
    assert_eq!(entry_value(&compilation, a), Value::CtInt(BigInt::from(3)));
}

#[test]
fn self_reference() {
    let compilation = compile("const a = a;");
    assert!(!compilation.success);

    let messages = compilation.diagnostics.messages();
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[0].error.to_string(), "Invalid recursive use of 'a'.");
    assert!(messages[0].primary);
    assert!(!messages[1].primary);
}

#[test]
fn operator_mismatch() {
    let compilation = compile("const a: bool = 1 + 2;");
    assert!(!compilation.success);
    assert_eq!(errors(&compilation), ["'ct_int' cannot be coerced to 'bool'"]);
    assert_eq!(entry_value(&compilation, constant(&compilation, 0)), Value::None);
}

#[test]
fn empty_file() {
    let compilation = compile("");
    assert!(compilation.success);
    assert!(compilation.statements.is_empty());
    assert!(compilation.diagnostics.messages().is_empty());
}

#[test]
fn lone_unterminated_string() {
    let compilation = compile("\"oops");
    assert!(!compilation.success);
    assert!(compilation.statements.is_empty());
    assert_eq!(errors(&compilation), ["unexpected end of string"]);
}

#[test]
fn syntax_error_does_not_suppress_later_diagnostics() {
    let compilation = compile("const a = ; const b = (1 + ; const d = 1;");
    assert!(!compilation.success);
    // The parser resynchronized after the first failure and still reported
    // the second one.
    assert_eq!(compilation.diagnostics.error_count(), 2);
    // The last constant parsed fine.
    assert_eq!(compilation.statements.len(), 1);
}

/// Checks the annotation invariants that must hold after a successful run:
/// every expression is typed, no constantness is left unknown, and binary
/// operands coerce to their result type.
#[derive(Default)]
struct AnnotationInvariants {
    violations: Vec<String>,
}

impl AnnotationInvariants {
    fn check_info(&mut self, what: &str, info: &nlc::compiler::ast::ExprInfo) {
        if info.ty.is_none() {
            self.violations.push(format!("{what} has no type"));
        }
        if info.constantness == Constantness::Unknown {
            self.violations
                .push(format!("{what} has unknown constantness"));
        }
    }
}

impl Visitor for AnnotationInvariants {
    fn visit_identifier_usage(&mut self, identifier: &Identifier) {
        if identifier.id.is_none() {
            self.violations
                .push(format!("identifier '{}' is unbound", identifier.name));
        }
        self.check_info("identifier usage", &identifier.info);
    }

    fn visit_integer(&mut self, integer: &IntegerLiteral) {
        self.check_info("integer literal", &integer.info);
        if integer.info.value.is_none() {
            self.violations.push("integer literal has no value".into());
        }
    }

    fn enter_unary(&mut self, unary: &UnaryExpression) {
        self.check_info("unary expression", &unary.info);
    }

    fn enter_binary(&mut self, binary: &BinaryExpression) {
        self.check_info("binary expression", &binary.info);

        use nlc::compiler::ast::BinaryOperator::*;
        if matches!(binary.operator, Eq | Ne | Lt | Le | Gt | Ge) {
            return;
        }
        let (Some(ty), Some(left), Some(right)) = (
            binary.info.ty,
            binary.left.info().ty,
            binary.right.info().ty,
        ) else {
            return;
        };
        if !left.coercible_to(&ty) || !right.coercible_to(&ty) {
            self.violations.push(format!(
                "operands '{left}' and '{right}' do not coerce to '{ty}'"
            ));
        }
    }
}

#[test]
fn successful_runs_satisfy_the_annotation_invariants() {
    let compilation = compile(
        "const a: i4 = 1 + 2;\n\
         const b = a;\n\
         const c = (b < 100) and (1 < 2);\n\
         const d: u8 = 1u1 + 2;\n\
         const e = ~1i2;\n\
         proc f param x i4 returns i4 begin const g = a; end",
    );
    assert!(compilation.success, "errors: {:?}", errors(&compilation));

    let mut invariants = AnnotationInvariants::default();
    walk_statements(&mut invariants, &compilation.statements);
    assert!(
        invariants.violations.is_empty(),
        "violations: {:?}",
        invariants.violations
    );
}

#[test]
fn evaluated_values_match_their_types() {
    let compilation = compile(
        "const a: i4 = 1 + 2;\n\
         const b: u1 = 200 + 100;\n\
         const c = 1 < 2;\n\
         const d = 5;\n\
         const e: uptr = 7;",
    );
    assert!(compilation.success);

    for index in 0..compilation.statements.len() {
        let statement = constant(&compilation, index);
        let value = entry_value(&compilation, statement);
        assert_eq!(
            value.get_type(),
            statement.name.info.ty,
            "value {value} of '{}' should have the declared type",
            statement.name.name
        );
    }
}

#[test]
fn bytecode_matches_hand_evaluation() {
    let compilation = compile(
        "const a: i4 = ((1 + 2) * 3 - 4) % 5;\n\
         const b: u1 = (200 + 100) / 2;\n\
         const c: i1 = 100 << 1;",
    );
    assert!(compilation.success, "errors: {:?}", errors(&compilation));
    assert_eq!(entry_value(&compilation, constant(&compilation, 0)), Value::I4(0));
    // ct_int arithmetic is exact; the cast to u1 only happens at the end.
    assert_eq!(entry_value(&compilation, constant(&compilation, 1)), Value::U1(150));
    // 100 << 1 is 200 as a ct_int and wraps to -56 when cast to i1.
    assert_eq!(entry_value(&compilation, constant(&compilation, 2)), Value::I1(-56));
}

#[test]
fn wrapping_is_silent() {
    let compilation = compile("const b: u1 = 200 + 100;");
    assert!(compilation.success);
    assert!(compilation.diagnostics.messages().is_empty());
    assert_eq!(entry_value(&compilation, constant(&compilation, 0)), Value::U1(44));
}

#[test]
fn cyclic_constants_abort() {
    let compilation = compile("const a = b; const b = a;");
    assert!(!compilation.success);
    assert!(errors(&compilation)
        .iter()
        .any(|error| error.contains("type resolution made no progress")));
}

#[test]
fn documentation_and_flags_survive_the_pipeline() {
    let compilation = compile("/// The answer.\n#print_value const a = 42;");
    assert!(compilation.success);
    let a = constant(&compilation, 0);
    assert_eq!(a.documentation.as_deref(), Some("/// The answer."));
    assert!(a.flags.print_value);
}
