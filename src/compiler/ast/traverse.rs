use super::{
    BinaryExpression, CallExpression, ConstStatement, Expression, FieldAccessExpression,
    GroupExpression, Identifier, IntegerLiteral, ProcStatement, Statement, StringLiteral,
    UnaryExpression,
};

/// Generates a visitor trait plus the matching walk functions.
///
/// The traversal order is fixed: enter the node, recurse into its children
/// left to right, exit the node. Instantiated twice so analysis passes get a
/// mutable tree while printers walk a shared one.
macro_rules! traverser {
    (
        $( #[$attr:meta] )*
        trait $Visitor:ident;
        fn $walk_statements:ident, $walk_statement:ident, $walk_expression:ident;
        $( $mut_:tt )?
    ) => {
        $( #[$attr] )*
        #[allow(unused_variables)]
        pub trait $Visitor {
            fn enter_const(&mut self, statement: & $( $mut_ )? ConstStatement) {}
            fn exit_const(&mut self, statement: & $( $mut_ )? ConstStatement) {}

            fn enter_proc(&mut self, statement: & $( $mut_ )? ProcStatement) {}
            /// Fires after the function's name has been visited but before
            /// its parameters and body, so passes can push a nested scope
            /// that contains the parameters.
            fn enter_function_scope(&mut self, statement: & $( $mut_ )? ProcStatement) {}
            fn exit_proc(&mut self, statement: & $( $mut_ )? ProcStatement) {}

            fn enter_binary(&mut self, binary: & $( $mut_ )? BinaryExpression) {}
            fn exit_binary(&mut self, binary: & $( $mut_ )? BinaryExpression) {}
            fn enter_unary(&mut self, unary: & $( $mut_ )? UnaryExpression) {}
            fn exit_unary(&mut self, unary: & $( $mut_ )? UnaryExpression) {}
            fn enter_call(&mut self, call: & $( $mut_ )? CallExpression) {}
            fn exit_call(&mut self, call: & $( $mut_ )? CallExpression) {}
            fn enter_group(&mut self, group: & $( $mut_ )? GroupExpression) {}
            fn exit_group(&mut self, group: & $( $mut_ )? GroupExpression) {}
            fn enter_field_access(&mut self, field_access: & $( $mut_ )? FieldAccessExpression) {}
            fn exit_field_access(&mut self, field_access: & $( $mut_ )? FieldAccessExpression) {}

            /// Fires for every identifier, definitions and usages alike.
            fn visit_identifier(&mut self, identifier: & $( $mut_ )? Identifier) {}
            /// Fires for identifiers that define a new name, after
            /// [`Self::visit_identifier`].
            fn visit_identifier_definition(&mut self, identifier: & $( $mut_ )? Identifier) {}
            /// Fires for identifiers that use an existing name, after
            /// [`Self::visit_identifier`].
            fn visit_identifier_usage(&mut self, identifier: & $( $mut_ )? Identifier) {}
            fn visit_integer(&mut self, integer: & $( $mut_ )? IntegerLiteral) {}
            fn visit_string(&mut self, string: & $( $mut_ )? StringLiteral) {}
        }

        pub fn $walk_statements<V: $Visitor + ?Sized>(
            visitor: &mut V,
            statements: & $( $mut_ )? [Statement],
        ) {
            for statement in statements {
                $walk_statement(visitor, statement);
            }
        }

        pub fn $walk_statement<V: $Visitor + ?Sized>(
            visitor: &mut V,
            statement: & $( $mut_ )? Statement,
        ) {
            match statement {
                Statement::Const(statement) => {
                    visitor.enter_const(statement);
                    visitor.visit_identifier(& $( $mut_ )? statement.name);
                    visitor.visit_identifier_definition(& $( $mut_ )? statement.name);
                    if let Some(type_expression) = & $( $mut_ )? statement.type_expression {
                        $walk_expression(visitor, type_expression);
                    }
                    $walk_expression(visitor, & $( $mut_ )? statement.value);
                    visitor.exit_const(statement);
                }
                Statement::Proc(statement) => {
                    visitor.enter_proc(statement);
                    visitor.visit_identifier(& $( $mut_ )? statement.name);
                    visitor.visit_identifier_definition(& $( $mut_ )? statement.name);
                    visitor.enter_function_scope(statement);
                    for parameter in & $( $mut_ )? statement.parameters {
                        visitor.visit_identifier(& $( $mut_ )? parameter.name);
                        visitor.visit_identifier_definition(& $( $mut_ )? parameter.name);
                        $walk_expression(visitor, & $( $mut_ )? parameter.type_expression);
                    }
                    if let Some(return_type) = & $( $mut_ )? statement.return_type {
                        $walk_expression(visitor, return_type);
                    }
                    $walk_statements(visitor, & $( $mut_ )? statement.body);
                    visitor.exit_proc(statement);
                }
            }
        }

        pub fn $walk_expression<V: $Visitor + ?Sized>(
            visitor: &mut V,
            expression: & $( $mut_ )? Expression,
        ) {
            match expression {
                Expression::Identifier(identifier) => {
                    visitor.visit_identifier(identifier);
                    visitor.visit_identifier_usage(identifier);
                }
                Expression::Integer(integer) => visitor.visit_integer(integer),
                Expression::String(string) => visitor.visit_string(string),
                Expression::Binary(binary) => {
                    visitor.enter_binary(binary);
                    $walk_expression(visitor, & $( $mut_ )? binary.left);
                    $walk_expression(visitor, & $( $mut_ )? binary.right);
                    visitor.exit_binary(binary);
                }
                Expression::Unary(unary) => {
                    visitor.enter_unary(unary);
                    $walk_expression(visitor, & $( $mut_ )? unary.operand);
                    visitor.exit_unary(unary);
                }
                Expression::Call(call) => {
                    visitor.enter_call(call);
                    $walk_expression(visitor, & $( $mut_ )? call.callee);
                    for argument in & $( $mut_ )? call.arguments {
                        $walk_expression(visitor, argument);
                    }
                    visitor.exit_call(call);
                }
                Expression::Group(group) => {
                    visitor.enter_group(group);
                    $walk_expression(visitor, & $( $mut_ )? group.inner);
                    visitor.exit_group(group);
                }
                Expression::FieldAccess(field_access) => {
                    visitor.enter_field_access(field_access);
                    $walk_expression(visitor, & $( $mut_ )? field_access.base);
                    visitor.visit_identifier(& $( $mut_ )? field_access.field);
                    visitor.exit_field_access(field_access);
                }
            }
        }
    };
}

traverser! {
    /// Read-only visitor over the tree, used for printing.
    trait Visitor;
    fn walk_statements, walk_statement, walk_expression;
}

traverser! {
    /// Mutating visitor over the tree, used by the analysis passes.
    trait VisitorMut;
    fn walk_statements_mut, walk_statement_mut, walk_expression_mut;
    mut
}
