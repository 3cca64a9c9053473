use num::{BigInt, Zero};
use thiserror::Error;

use crate::{
    compiler::{
        ast::{BinaryExpression, BinaryOperator, Expression, UnaryOperator},
        diagnostic::Diagnostics,
        idents::IdentStorage,
        typing::{peer_resolution, IntKind, Type},
    },
    runtime::{
        instruction::{CastTypes, Instruction},
        state::State,
        value::Value,
    },
};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AssembleError {
    #[error("{0} cannot be evaluated at compile time yet")]
    NotYetImplemented(&'static str),
}

/// Compiles resolved expressions into bytecode.
///
/// Every operand is compiled naively at its own resolved type and then
/// coerced with an explicit [`Instruction::CastInt`] where the consuming
/// operator needs a different type, so the emitted code never relies on
/// implicit conversions.
pub struct Assembler<'idents> {
    idents: &'idents IdentStorage,
    code: Vec<Instruction>,
}

impl<'idents> Assembler<'idents> {
    pub fn new(idents: &'idents IdentStorage) -> Self {
        Self {
            idents,
            code: Vec::new(),
        }
    }

    pub fn emit(&mut self, instruction: Instruction) {
        self.code.push(instruction);
    }

    /// The instructions emitted so far.
    pub fn code(&self) -> &[Instruction] {
        &self.code
    }

    /// Hands the finished code to a runnable [`State`].
    pub fn commit(self, parameters: Vec<Value>) -> State<'idents> {
        State::new(self.idents, parameters, self.code)
    }

    /// Compiles an expression, leaving its value on top of the stack.
    ///
    /// A trailing cast is emitted when `hint` differs from the expression's
    /// resolved type.
    pub fn compile_expression(
        &mut self,
        expression: &Expression,
        hint: Option<&Type>,
    ) -> Result<(), AssembleError> {
        self.compile_at_own_type(expression)?;
        if let Some(hint) = hint {
            self.emit_cast(&node_type(expression), hint);
        }
        Ok(())
    }

    fn compile_at_own_type(&mut self, expression: &Expression) -> Result<(), AssembleError> {
        match expression {
            Expression::Integer(integer) => {
                let value = integer.info.value.clone().unwrap_or_else(|| {
                    Value::int(integer.flag, integer.value.clone())
                });
                self.emit(Instruction::LoadData(value));
                Ok(())
            }
            Expression::Identifier(identifier) => {
                let id = identifier.id.expect("identifier should be resolved");
                self.emit(Instruction::LoadId(id));
                Ok(())
            }
            Expression::Binary(binary) => self.compile_binary(binary),
            Expression::Unary(unary) => {
                let ty = node_type(expression);
                match unary.operator {
                    UnaryOperator::Id => {
                        self.compile_at_own_type(&unary.operand)?;
                        self.emit_cast(&node_type(&unary.operand), &ty);
                        Ok(())
                    }
                    UnaryOperator::Neg => {
                        // -x compiles as 0 - x.
                        let kind = int_kind(&ty);
                        self.emit(Instruction::LoadData(Value::int(kind, BigInt::zero())));
                        self.compile_at_own_type(&unary.operand)?;
                        self.emit_cast(&node_type(&unary.operand), &ty);
                        self.emit(Instruction::SubInt(kind));
                        Ok(())
                    }
                    UnaryOperator::BitNot => {
                        // ~x compiles as x ^ -1, all ones at any width.
                        let kind = int_kind(&ty);
                        self.compile_at_own_type(&unary.operand)?;
                        self.emit_cast(&node_type(&unary.operand), &ty);
                        self.emit(Instruction::LoadData(Value::int(kind, BigInt::from(-1))));
                        self.emit(Instruction::BXorInt(kind));
                        Ok(())
                    }
                    UnaryOperator::LogicNot => {
                        // There is no boolean negation opcode; fold the
                        // operand's known value instead.
                        match self.constant_value(&unary.operand).and_then(|value| value.as_bool())
                        {
                            Some(value) => {
                                self.emit(Instruction::LoadData(Value::Bool(!value)));
                                Ok(())
                            }
                            None => Err(AssembleError::NotYetImplemented(
                                "logical negation of this operand",
                            )),
                        }
                    }
                }
            }
            Expression::Group(group) => self.compile_at_own_type(&group.inner),
            Expression::Call(_) => Err(AssembleError::NotYetImplemented("call expressions")),
            Expression::FieldAccess(_) => {
                Err(AssembleError::NotYetImplemented("segmented identifiers"))
            }
            Expression::String(_) => Err(AssembleError::NotYetImplemented("string literals")),
        }
    }

    fn compile_binary(&mut self, binary: &BinaryExpression) -> Result<(), AssembleError> {
        use BinaryOperator::*;

        if let LogicAnd | LogicOr = binary.operator {
            self.compile_at_own_type(&binary.left)?;
            self.compile_at_own_type(&binary.right)?;
            self.emit(match binary.operator {
                LogicAnd => Instruction::LAnd,
                _ => Instruction::LOr,
            });
            return Ok(());
        }

        let left_type = node_type(&binary.left);
        let right_type = node_type(&binary.right);

        // Comparisons compute at the operands' peer type and only produce a
        // boolean; everything else computes at the node's own type, which is
        // the very same peer type.
        let operand_type = match binary.operator {
            Eq | Ne | Lt | Le | Gt | Ge => peer_resolution(&left_type, &right_type)
                .expect("comparison operands should peer resolve"),
            _ => binary
                .info
                .ty
                .expect("resolved expression should have a type"),
        };
        let kind = int_kind(&operand_type);

        self.compile_at_own_type(&binary.left)?;
        self.emit_cast(&left_type, &operand_type);
        self.compile_at_own_type(&binary.right)?;
        self.emit_cast(&right_type, &operand_type);

        self.emit(match binary.operator {
            Add => Instruction::AddInt(kind),
            Sub => Instruction::SubInt(kind),
            Mul => Instruction::MulInt(kind),
            Div => Instruction::DivInt(kind),
            Rem => Instruction::RemInt(kind),
            Shl => Instruction::ShlInt(kind),
            Shr => Instruction::ShrInt(kind),
            BitAnd => Instruction::BAndInt(kind),
            BitOr => Instruction::BOrInt(kind),
            BitXor => Instruction::BXorInt(kind),
            Eq => Instruction::EqInt(kind),
            Ne => Instruction::NeInt(kind),
            Lt => Instruction::LtInt(kind),
            Le => Instruction::LeInt(kind),
            Gt => Instruction::GtInt(kind),
            Ge => Instruction::GeInt(kind),
            LogicAnd | LogicOr => unreachable!("logical operators are handled above"),
        });
        Ok(())
    }

    /// Emits a cast when `from` and `to` are different integer types.
    fn emit_cast(&mut self, from: &Type, to: &Type) {
        if from == to {
            return;
        }
        match (from, to) {
            (Type::Integer(from), Type::Integer(to)) => {
                self.emit(Instruction::CastInt(CastTypes {
                    from: IntKind::of(from),
                    to: IntKind::of(to),
                }));
            }
            _ => unreachable!("the type resolver should have rejected this coercion"),
        }
    }

    /// The value of an expression when it is knowable without running any
    /// bytecode: a cached literal, a resolved identifier's entry value, or a
    /// group around one of those.
    fn constant_value(&self, expression: &Expression) -> Option<Value> {
        match expression {
            Expression::Integer(integer) => integer.info.value.clone(),
            Expression::Unary(unary) => unary.info.value.clone(),
            Expression::Identifier(identifier) => {
                let entry = self.idents.entry(identifier.id?);
                (entry.value != Value::None).then(|| entry.value.clone())
            }
            Expression::Group(group) => self.constant_value(&group.inner),
            _ => None,
        }
    }
}

fn node_type(expression: &Expression) -> Type {
    expression
        .info()
        .ty
        .expect("resolved expression should have a type")
}

fn int_kind(ty: &Type) -> IntKind {
    match ty {
        Type::Integer(integer) => IntKind::of(integer),
        _ => unreachable!("typed integer instructions should only see integer types"),
    }
}

/// Thin facade over [`Assembler`] and [`State`].
///
/// Compiles one constant expression with no parameters, runs it, and turns
/// any failure into a diagnostic anchored at the expression's source range.
pub struct Evaluator<'idents> {
    idents: &'idents IdentStorage,
}

impl<'idents> Evaluator<'idents> {
    pub fn new(idents: &'idents IdentStorage) -> Self {
        Self { idents }
    }

    pub fn evaluate(
        &self,
        expression: &Expression,
        hint: Option<&Type>,
        diagnostics: &mut Diagnostics,
    ) -> Option<Value> {
        let mut assembler = Assembler::new(self.idents);
        if let Err(error) = assembler.compile_expression(expression, hint) {
            diagnostics.error(error, expression.range());
            return None;
        }
        assembler.emit(Instruction::Ret);

        let mut state = assembler.commit(Vec::new());
        match state.run() {
            Ok(value) => Some(value),
            Err(error) => {
                diagnostics.error(error, expression.range());
                None
            }
        }
    }
}
