use num::{bigint::Sign, BigInt, Integer, ToPrimitive, Zero};
use thiserror::Error;

use crate::{
    compiler::{
        idents::IdentStorage,
        typing::{IntKind, IntWidth},
    },
    runtime::{
        instruction::{CastTypes, Instruction},
        value::Value,
    },
};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum VmError {
    #[error("invalid instruction data")]
    InvalidInstructionData,
    #[error("evaluation failed")]
    EvaluationFailed,
    #[error("parameter index {0} out of bounds")]
    ParameterIndexOutOfBounds(usize),
    #[error("local index {0} out of bounds")]
    LocalIndexOutOfBounds(usize),
    #[error("unsupported integer type for typed instruction")]
    UnsupportedIntegerType,
    #[error("division by zero")]
    DivisionByZero,
    #[error("operand stack underflow")]
    StackUnderflow,
}

/// The outcome of a single [`State::step`].
#[derive(Debug, PartialEq)]
pub enum Step {
    NotFinished,
    Finished(Value),
    Failed(VmError),
}

/// A runnable bytecode closure.
///
/// Owns its parameters, locals, operand stack and instructions; borrows
/// identifier storage read-only for [`Instruction::LoadId`]. One state is
/// built, run and dropped per evaluated expression.
#[derive(Debug)]
pub struct State<'idents> {
    idents: &'idents IdentStorage,
    parameters: Vec<Value>,
    locals: Vec<Value>,
    stack: Vec<Value>,
    code: Vec<Instruction>,
    code_index: usize,
}

impl<'idents> State<'idents> {
    pub fn new(
        idents: &'idents IdentStorage,
        parameters: Vec<Value>,
        code: Vec<Instruction>,
    ) -> Self {
        Self {
            idents,
            parameters,
            locals: Vec::new(),
            stack: Vec::new(),
            code,
            code_index: 0,
        }
    }

    /// Runs until the bytecode terminates one way or the other.
    pub fn run(&mut self) -> Result<Value, VmError> {
        loop {
            match self.step() {
                Step::NotFinished => {}
                Step::Finished(value) => break Ok(value),
                Step::Failed(error) => break Err(error),
            }
        }
    }

    /// Fetches, advances past and executes a single instruction.
    ///
    /// Running past the final instruction terminates with the none value,
    /// like an implicit [`Instruction::End`].
    pub fn step(&mut self) -> Step {
        let Some(instruction) = self.code.get(self.code_index) else {
            return Step::Finished(Value::None);
        };
        let instruction = instruction.clone();
        self.code_index += 1;

        match self.execute(instruction) {
            Ok(step) => step,
            Err(error) => Step::Failed(error),
        }
    }

    fn execute(&mut self, instruction: Instruction) -> Result<Step, VmError> {
        use Instruction::*;
        match instruction {
            Noop => {}
            LoadId(id) => {
                let value = self.idents.entry(id).value.clone();
                self.stack.push(value);
            }
            LoadParam(index) => {
                let value = self
                    .parameters
                    .get(index)
                    .ok_or(VmError::ParameterIndexOutOfBounds(index))?
                    .clone();
                self.stack.push(value);
            }
            LoadLocal(index) => {
                let value = self
                    .locals
                    .get(index)
                    .ok_or(VmError::LocalIndexOutOfBounds(index))?
                    .clone();
                self.stack.push(value);
            }
            LoadData(value) => self.stack.push(value),
            WriteLocal(index) => {
                let value = self.pop()?;
                if index >= self.locals.len() {
                    self.locals.resize(index + 1, Value::None);
                }
                self.locals[index] = value;
            }
            End => return Ok(Step::Finished(Value::None)),
            Ret => return Ok(Step::Finished(self.pop()?)),
            Err => return std::result::Result::Err(VmError::EvaluationFailed),
            Drop(count) => {
                if self.stack.len() < count {
                    return std::result::Result::Err(VmError::StackUnderflow);
                }
                self.stack.truncate(self.stack.len() - count);
            }
            Dup(count) => {
                let value = self.pop()?;
                for _ in 0..count {
                    self.stack.push(value.clone());
                }
            }
            Swap => {
                let b = self.pop()?;
                let a = self.pop()?;
                self.stack.push(b);
                self.stack.push(a);
            }
            CastInt(CastTypes { from, to }) => {
                let value = self.pop_int(from)?;
                self.stack.push(Value::int(to, value));
            }
            AddInt(kind) => self.binary_int(kind, |a, b| Ok(a + b))?,
            SubInt(kind) => self.binary_int(kind, |a, b| Ok(a - b))?,
            MulInt(kind) => self.binary_int(kind, |a, b| Ok(a * b))?,
            DivInt(kind) => self.binary_int(kind, |a, b| {
                if b.is_zero() {
                    std::result::Result::Err(VmError::DivisionByZero)
                } else {
                    Ok(a / b)
                }
            })?,
            RemInt(kind) => self.binary_int(kind, |a, b| {
                if b.is_zero() {
                    std::result::Result::Err(VmError::DivisionByZero)
                } else {
                    Ok(a % b)
                }
            })?,
            ShlInt(kind) => {
                let count = self.pop_int(kind)?;
                let value = self.pop_int(kind)?;
                let count = shift_count(kind, &count)?;
                self.stack.push(Value::int(kind, value << count));
            }
            ShrInt(kind) => {
                let count = self.pop_int(kind)?;
                let value = self.pop_int(kind)?;
                let count = shift_count(kind, &count)?;
                self.stack.push(Value::int(kind, value >> count));
            }
            BAndInt(kind) => self.binary_int(kind, |a, b| Ok(a & b))?,
            BOrInt(kind) => self.binary_int(kind, |a, b| Ok(a | b))?,
            BXorInt(kind) => self.binary_int(kind, |a, b| Ok(a ^ b))?,
            EqInt(kind) => self.compare_int(kind, |a, b| a == b)?,
            NeInt(kind) => self.compare_int(kind, |a, b| a != b)?,
            LtInt(kind) => self.compare_int(kind, |a, b| a < b)?,
            LeInt(kind) => self.compare_int(kind, |a, b| a <= b)?,
            GtInt(kind) => self.compare_int(kind, |a, b| a > b)?,
            GeInt(kind) => self.compare_int(kind, |a, b| a >= b)?,
            LAnd => {
                let b = self.pop_bool()?;
                let a = self.pop_bool()?;
                self.stack.push(Value::Bool(a && b));
            }
            LOr => {
                let b = self.pop_bool()?;
                let a = self.pop_bool()?;
                self.stack.push(Value::Bool(a || b));
            }
        }
        Ok(Step::NotFinished)
    }

    fn pop(&mut self) -> Result<Value, VmError> {
        self.stack.pop().ok_or(VmError::StackUnderflow)
    }

    /// Pops a value that must be an integer of exactly the given kind.
    fn pop_int(&mut self, kind: IntKind) -> Result<BigInt, VmError> {
        let value = self.pop()?;
        if value.int_kind() != Some(kind) {
            return Err(VmError::UnsupportedIntegerType);
        }
        Ok(value
            .to_big_int()
            .expect("integer value should have a numeric value"))
    }

    fn pop_bool(&mut self) -> Result<bool, VmError> {
        self.pop()?.as_bool().ok_or(VmError::InvalidInstructionData)
    }

    fn binary_int(
        &mut self,
        kind: IntKind,
        op: impl FnOnce(BigInt, BigInt) -> Result<BigInt, VmError>,
    ) -> Result<(), VmError> {
        let b = self.pop_int(kind)?;
        let a = self.pop_int(kind)?;
        let result = op(a, b)?;
        self.stack.push(Value::int(kind, result));
        Ok(())
    }

    fn compare_int(
        &mut self,
        kind: IntKind,
        op: impl FnOnce(&BigInt, &BigInt) -> bool,
    ) -> Result<(), VmError> {
        let b = self.pop_int(kind)?;
        let a = self.pop_int(kind)?;
        self.stack.push(Value::Bool(op(&a, &b)));
        Ok(())
    }
}

/// Masks a shift count to the bit width of the destination kind.
///
/// Compile time integers have no width to mask to; their count is used as
/// is and must be a reasonable non negative amount.
fn shift_count(kind: IntKind, count: &BigInt) -> Result<u64, VmError> {
    let bytes = match kind.integer_type().width {
        IntWidth::Dynamic => {
            if count.sign() == Sign::Minus {
                return Err(VmError::InvalidInstructionData);
            }
            return count.to_u64().ok_or(VmError::InvalidInstructionData);
        }
        IntWidth::Bytes(bytes) => bytes,
        IntWidth::Pointer => 8,
    };
    let bits = BigInt::from(u32::from(bytes) * 8);
    let masked = count.mod_floor(&bits);
    Ok(masked
        .to_u64()
        .expect("masked shift count should fit in 64 bits"))
}
