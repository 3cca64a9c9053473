pub mod traverse;

use num::BigInt;

use crate::{
    compiler::{
        idents::IdentId,
        source::SourceRange,
        typing::{Constantness, IntKind, Type},
    },
    runtime::value::Value,
};

/// Debug printing hints attached to a statement, e.g. `#print_ast`.
#[derive(Clone, Copy, Debug, Default, Hash, PartialEq, Eq)]
pub struct StatementFlags {
    pub print_ast: bool,
    pub print_value: bool,
}

/// A top level statement or a statement inside a function body.
#[derive(Clone, Debug, PartialEq)]
pub enum Statement {
    Const(ConstStatement),
    Proc(ProcStatement),
}

impl Statement {
    pub fn range(&self) -> SourceRange {
        match self {
            Self::Const(statement) => statement.range,
            Self::Proc(statement) => statement.range,
        }
    }

    pub fn flags(&self) -> StatementFlags {
        match self {
            Self::Const(statement) => statement.flags,
            Self::Proc(statement) => statement.flags,
        }
    }
}

/// `const name (: type)? = value;`
#[derive(Clone, Debug, PartialEq)]
pub struct ConstStatement {
    pub documentation: Option<String>,
    pub flags: StatementFlags,
    pub name: Identifier,
    pub type_expression: Option<Expression>,
    pub value: Expression,
    pub range: SourceRange,
}

/// `proc name is-declarations* begin body end`
#[derive(Clone, Debug, PartialEq)]
pub struct ProcStatement {
    pub documentation: Option<String>,
    pub flags: StatementFlags,
    pub name: Identifier,
    pub recursive: bool,
    pub entry_point: bool,
    pub parameters: Vec<Parameter>,
    pub return_type: Option<Expression>,
    pub body: Vec<Statement>,
    pub range: SourceRange,
}

/// `param name type`
#[derive(Clone, Debug, PartialEq)]
pub struct Parameter {
    pub name: Identifier,
    pub type_expression: Expression,
    pub range: SourceRange,
}

/// Semantic annotations attached to every expression node.
///
/// All three fields start out empty and are filled in by the type resolver;
/// `failed` marks a node whose resolution produced an error so later passes
/// neither retry nor re-report it.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ExprInfo {
    pub constantness: Constantness,
    pub ty: Option<Type>,
    pub value: Option<Value>,
    pub failed: bool,
}

#[derive(Clone, Debug, PartialEq)]
pub enum Expression {
    Identifier(Identifier),
    Integer(IntegerLiteral),
    String(StringLiteral),
    Binary(Box<BinaryExpression>),
    Unary(Box<UnaryExpression>),
    Call(Box<CallExpression>),
    Group(Box<GroupExpression>),
    FieldAccess(Box<FieldAccessExpression>),
}

impl Expression {
    pub fn range(&self) -> SourceRange {
        match self {
            Self::Identifier(identifier) => identifier.range,
            Self::Integer(integer) => integer.range,
            Self::String(string) => string.range,
            Self::Binary(binary) => binary.range,
            Self::Unary(unary) => unary.range,
            Self::Call(call) => call.range,
            Self::Group(group) => group.range,
            Self::FieldAccess(field_access) => field_access.range,
        }
    }

    pub fn info(&self) -> &ExprInfo {
        match self {
            Self::Identifier(identifier) => &identifier.info,
            Self::Integer(integer) => &integer.info,
            Self::String(string) => &string.info,
            Self::Binary(binary) => &binary.info,
            Self::Unary(unary) => &unary.info,
            Self::Call(call) => &call.info,
            Self::Group(group) => &group.info,
            Self::FieldAccess(field_access) => &field_access.info,
        }
    }

    pub fn info_mut(&mut self) -> &mut ExprInfo {
        match self {
            Self::Identifier(identifier) => &mut identifier.info,
            Self::Integer(integer) => &mut integer.info,
            Self::String(string) => &mut string.info,
            Self::Binary(binary) => &mut binary.info,
            Self::Unary(unary) => &mut unary.info,
            Self::Call(call) => &mut call.info,
            Self::Group(group) => &mut group.info,
            Self::FieldAccess(field_access) => &mut field_access.info,
        }
    }
}

/// A name usage or definition.
///
/// `id` is populated by the identifier resolver; until then the node is only
/// connected to its source text.
#[derive(Clone, Debug, PartialEq)]
pub struct Identifier {
    pub name: String,
    pub range: SourceRange,
    pub id: Option<IdentId>,
    pub info: ExprInfo,
}

impl Identifier {
    pub fn new(name: impl Into<String>, range: SourceRange) -> Self {
        Self {
            name: name.into(),
            range,
            id: None,
            info: ExprInfo::default(),
        }
    }
}

/// An integer literal.
///
/// `flag` is set by the parser: the default `ct` for a bare literal, or the
/// concrete width of a touching type suffix such as `2u1`.
#[derive(Clone, Debug, PartialEq)]
pub struct IntegerLiteral {
    pub value: BigInt,
    pub flag: IntKind,
    pub range: SourceRange,
    pub info: ExprInfo,
}

#[derive(Clone, Debug, PartialEq)]
pub struct StringLiteral {
    /// The raw contents between the quotes; no escape processing happens.
    pub value: String,
    pub range: SourceRange,
    pub info: ExprInfo,
}

macro_rules! operators {
    ( $( #[$attr:meta] )* enum $T:ident { $( $Variant:ident = $name:literal, )* } ) => {
        $( #[$attr] )*
        #[derive(Clone, Copy, Debug, Hash, PartialEq, Eq)]
        pub enum $T {
            $( $Variant, )*
        }

        impl $T {
            pub fn name(self) -> &'static str {
                match self {
                    $( Self::$Variant => $name, )*
                }
            }
        }
    };
}

operators! {
    /// Binary operators; all of them associate left to right with equal
    /// precedence, parentheses being the only grouping mechanism.
    enum BinaryOperator {
        Add = "`+`",
        Sub = "`-`",
        Mul = "`*`",
        Div = "`/`",
        Rem = "`%`",
        Shl = "`<<`",
        Shr = "`>>`",
        BitAnd = "`&`",
        BitOr = "`|`",
        BitXor = "`^`",
        Eq = "`==`",
        Ne = "`!=`",
        Lt = "`<`",
        Le = "`<=`",
        Gt = "`>`",
        Ge = "`>=`",
        LogicAnd = "`and`",
        LogicOr = "`or`",
    }
}

operators! {
    /// Unary operators; `Id` is the no-op `+` prefix.
    enum UnaryOperator {
        Id = "`+`",
        Neg = "`-`",
        BitNot = "`~`",
        LogicNot = "`not`",
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct BinaryExpression {
    pub left: Expression,
    pub operator: BinaryOperator,
    pub operator_range: SourceRange,
    pub right: Expression,
    pub range: SourceRange,
    pub info: ExprInfo,
}

#[derive(Clone, Debug, PartialEq)]
pub struct UnaryExpression {
    pub operator: UnaryOperator,
    pub operand: Expression,
    pub range: SourceRange,
    pub info: ExprInfo,
}

/// A call; `f!` has no arguments, `f a, b` passes a comma separated chain.
#[derive(Clone, Debug, PartialEq)]
pub struct CallExpression {
    pub callee: Expression,
    pub arguments: Vec<Expression>,
    pub range: SourceRange,
    pub info: ExprInfo,
}

/// A parenthesized expression.
#[derive(Clone, Debug, PartialEq)]
pub struct GroupExpression {
    pub inner: Expression,
    pub range: SourceRange,
    pub info: ExprInfo,
}

/// A slash separated segmented name such as `base/field`.
#[derive(Clone, Debug, PartialEq)]
pub struct FieldAccessExpression {
    pub base: Expression,
    pub field: Identifier,
    pub range: SourceRange,
    pub info: ExprInfo,
}
