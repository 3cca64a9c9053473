use std::fmt;

use num::{BigInt, One, Signed, ToPrimitive};

use crate::compiler::typing::{IntKind, IntWidth, Type};

/// A concrete value produced by evaluating a constant expression.
///
/// This is the runtime counterpart to [`Type`]: every variant other than
/// [`Value::None`] maps back to exactly one type. Unsized compile time
/// integers keep their exact [`BigInt`]; sized integers store native Rust
/// integers of the matching width.
#[derive(Clone, Debug, Default, Hash, PartialEq, Eq)]
pub enum Value {
    #[default]
    None,
    CtInt(BigInt),
    I1(i8),
    I2(i16),
    I4(i32),
    I8(i64),
    U1(u8),
    U2(u16),
    U4(u32),
    U8(u64),
    IPtr(i64),
    UPtr(u64),
    Bool(bool),
    Type(Type),
}

macro_rules! sized_values {
    ( $( $Variant:ident($T:ty) => $Kind:ident, )* ) => {
        impl Value {
            /// The integer kind of this value, if it is an integer.
            pub fn int_kind(&self) -> Option<IntKind> {
                match self {
                    Self::CtInt(_) => Some(IntKind::Ct),
                    $( Self::$Variant(_) => Some(IntKind::$Kind), )*
                    _ => None,
                }
            }

            /// The exact numeric value of any integer variant.
            pub fn to_big_int(&self) -> Option<BigInt> {
                match self {
                    Self::CtInt(value) => Some(value.clone()),
                    $( Self::$Variant(value) => Some(BigInt::from(*value)), )*
                    _ => None,
                }
            }

            /// Wraps an exact integer into the representation of `kind`.
            ///
            /// Out of range values truncate to the destination's bit width in
            /// the destination's signedness; `ct_int` is kept exact.
            pub fn int(kind: IntKind, value: BigInt) -> Self {
                let wrapped = wrap_to_kind(kind, value);
                match kind {
                    IntKind::Ct => Self::CtInt(wrapped),
                    $( IntKind::$Kind => Self::$Variant(
                        wrapped
                            .to_i128()
                            .expect("wrapped value should fit in 128 bits")
                            as $T,
                    ), )*
                }
            }
        }
    };
}

sized_values! {
    I1(i8) => I1,
    I2(i16) => I2,
    I4(i32) => I4,
    I8(i64) => I8,
    U1(u8) => U1,
    U2(u16) => U2,
    U4(u32) => U4,
    U8(u64) => U8,
    IPtr(i64) => IPtr,
    UPtr(u64) => UPtr,
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<BigInt> for Value {
    fn from(value: BigInt) -> Self {
        Self::CtInt(value)
    }
}

impl From<Type> for Value {
    fn from(value: Type) -> Self {
        Self::Type(value)
    }
}

/// Truncates an exact integer to the bit width and signedness of `kind`.
fn wrap_to_kind(kind: IntKind, value: BigInt) -> BigInt {
    let bytes = match kind.integer_type().width {
        IntWidth::Dynamic => return value,
        IntWidth::Bytes(bytes) => bytes,
        // Pointers are eight bytes wide on every supported target.
        IntWidth::Pointer => 8,
    };
    let bits = u32::from(bytes) * 8;
    let modulus = BigInt::one() << bits;
    let mut wrapped = value % &modulus;
    if wrapped.is_negative() {
        wrapped += &modulus;
    }
    if kind.integer_type().signed && wrapped >= BigInt::one() << (bits - 1) {
        wrapped -= modulus;
    }
    wrapped
}

impl Value {
    /// The type of this value, or [`None`] for the none value.
    pub fn get_type(&self) -> Option<Type> {
        match self {
            Self::None => None,
            Self::Bool(_) => Some(Type::Boolean),
            Self::Type(_) => Some(Type::Meta),
            _ => self
                .int_kind()
                .map(|kind| Type::Integer(kind.integer_type())),
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_type(&self) -> Option<Type> {
        match self {
            Self::Type(ty) => Some(*ty),
            _ => None,
        }
    }

    /// Reinterprets an integer value as `to`, truncating if it does not fit.
    pub fn cast_int(&self, to: IntKind) -> Option<Value> {
        Some(Value::int(to, self.to_big_int()?))
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => f.write_str("none"),
            Self::Bool(value) => write!(f, "bool({value})"),
            Self::Type(ty) => write!(f, "type({ty})"),
            _ => {
                let kind = self.int_kind().expect("remaining variants should be integers");
                let value = self.to_big_int().expect("integer should have a numeric value");
                write!(f, "{kind}({value})")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn type_of_round_trips_through_int_kind() {
        for &kind in IntKind::ALL {
            let value = Value::int(kind, BigInt::from(1));
            assert_eq!(value.int_kind(), Some(kind));
            assert_eq!(value.get_type(), Some(Type::Integer(kind.integer_type())));
        }
    }

    #[test]
    fn none_has_no_type() {
        assert_eq!(Value::None.get_type(), None);
    }

    #[test]
    fn wrapping_truncates_in_destination_signedness() {
        assert_eq!(Value::int(IntKind::U1, BigInt::from(256)), Value::U1(0));
        assert_eq!(Value::int(IntKind::U1, BigInt::from(-1)), Value::U1(255));
        assert_eq!(Value::int(IntKind::I1, BigInt::from(128)), Value::I1(-128));
        assert_eq!(Value::int(IntKind::I1, BigInt::from(255)), Value::I1(-1));
        assert_eq!(Value::int(IntKind::I2, BigInt::from(-40000)), Value::I2(25536));
    }

    #[test]
    fn ct_int_is_exact() {
        let huge = BigInt::from(u128::MAX) * 16i32;
        assert_eq!(Value::int(IntKind::Ct, huge.clone()), Value::CtInt(huge));
    }

    #[test]
    fn cast_between_widths() {
        let value = Value::I4(-1);
        assert_eq!(value.cast_int(IntKind::U1), Some(Value::U1(255)));
        assert_eq!(value.cast_int(IntKind::I8), Some(Value::I8(-1)));
        assert_eq!(value.cast_int(IntKind::Ct), Some(Value::CtInt(BigInt::from(-1))));
        assert_eq!(Value::Bool(true).cast_int(IntKind::I1), None);
    }

    #[test]
    fn display_names_match_types() {
        assert_eq!(Value::I4(3).to_string(), "i4(3)");
        assert_eq!(Value::CtInt(BigInt::from(-7)).to_string(), "ct_int(-7)");
        assert_eq!(Value::Bool(false).to_string(), "bool(false)");
        assert_eq!(Value::Type(Type::Boolean).to_string(), "type(bool)");
        assert_eq!(Value::None.to_string(), "none");
    }
}
