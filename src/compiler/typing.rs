use std::fmt;

use crate::compiler::ast::{BinaryOperator, UnaryOperator};

/// How constant an expression is.
///
/// Forms the lattice `Constant < Unknown < NotConstant`; [`Constantness::mix`]
/// returns the less constant of two values, which is what every operator
/// does to its operands.
#[derive(Clone, Copy, Debug, Default, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub enum Constantness {
    Constant,
    #[default]
    Unknown,
    NotConstant,
}

impl Constantness {
    pub fn mix(self, other: Self) -> Self {
        self.max(other)
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Constant => "constant",
            Self::Unknown => "unknown",
            Self::NotConstant => "not constant",
        }
    }
}

/// The width of an integer type.
///
/// [`IntWidth::Dynamic`] is the width of `ct_int`, the type of integer
/// literals whose width has not been fixed yet.
#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq)]
pub enum IntWidth {
    Dynamic,
    Bytes(u8),
    Pointer,
}

/// An integer type; both width and signedness are part of its identity.
#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq)]
pub struct IntegerType {
    pub width: IntWidth,
    pub signed: bool,
}

/// The type of a value in the NL language.
///
/// Types are structural: two integer types are the same exactly when width
/// and signedness match, and `ct_int` is only the same as another `ct_int`.
#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq)]
pub enum Type {
    Integer(IntegerType),
    Boolean,
    /// The type whose only inhabitants are type values.
    Meta,
}

impl Type {
    pub const CT_INT: Self = Self::Integer(IntKind::Ct.integer_type());

    /// Whether a value of this type can be used where `target` is expected.
    ///
    /// `ct_int` coerces to and from every integer type; sized integers only
    /// widen and never change signedness. Booleans and types coerce only to
    /// themselves.
    pub fn coercible_to(&self, target: &Type) -> bool {
        match (self, target) {
            (Type::Integer(from), Type::Integer(to)) => {
                match (from.width, to.width) {
                    (IntWidth::Dynamic, _) | (_, IntWidth::Dynamic) => true,
                    (from_width, to_width) => {
                        from.signed == to.signed && width_le(from_width, to_width)
                    }
                }
            }
            (Type::Boolean, Type::Boolean) => true,
            (Type::Meta, Type::Meta) => true,
            _ => false,
        }
    }
}

fn width_le(from: IntWidth, to: IntWidth) -> bool {
    match (from, to) {
        (IntWidth::Bytes(from), IntWidth::Bytes(to)) => from <= to,
        (IntWidth::Pointer, IntWidth::Pointer) => true,
        // Pointer sized and fixed sized integers do not mix.
        _ => false,
    }
}

/// Returns the unique type both `left` and `right` coerce to, if any.
///
/// `ct_int` adopts the other side's type; two sized integers must agree on
/// signedness and resolve to the wider one. This single function is what the
/// type resolver and the bytecode assembler both consult, so their coercions
/// agree by construction.
pub fn peer_resolution(left: &Type, right: &Type) -> Option<Type> {
    match (left, right) {
        (Type::Integer(left), Type::Integer(right)) => {
            let peer = match (left.width, right.width) {
                (IntWidth::Dynamic, _) => *right,
                (_, IntWidth::Dynamic) => *left,
                (left_width, right_width) => {
                    if left.signed != right.signed {
                        return None;
                    }
                    if width_le(left_width, right_width) {
                        *right
                    } else if width_le(right_width, left_width) {
                        *left
                    } else {
                        return None;
                    }
                }
            };
            Some(Type::Integer(peer))
        }
        (Type::Boolean, Type::Boolean) => Some(Type::Boolean),
        (Type::Meta, Type::Meta) => Some(Type::Meta),
        _ => None,
    }
}

/// The result type of a binary operator applied to two operand types, or
/// [`None`] if the combination is invalid.
pub fn binary_result_type(operator: BinaryOperator, left: &Type, right: &Type) -> Option<Type> {
    use BinaryOperator::*;
    match operator {
        Add | Sub | Mul | Div | Rem | Shl | Shr | BitAnd | BitOr | BitXor => {
            match (left, right) {
                (Type::Integer(_), Type::Integer(_)) => peer_resolution(left, right),
                _ => None,
            }
        }
        Eq | Ne | Lt | Le | Gt | Ge => match (left, right) {
            (Type::Integer(_), Type::Integer(_)) => {
                peer_resolution(left, right).map(|_| Type::Boolean)
            }
            _ => None,
        },
        LogicAnd | LogicOr => match (left, right) {
            (Type::Boolean, Type::Boolean) => Some(Type::Boolean),
            _ => None,
        },
    }
}

/// The result type of a unary operator, or [`None`] if unsupported.
pub fn unary_result_type(operator: UnaryOperator, operand: &Type) -> Option<Type> {
    use UnaryOperator::*;
    match (operator, operand) {
        (Id | Neg | BitNot, Type::Integer(_)) => Some(*operand),
        (LogicNot, Type::Boolean) => Some(Type::Boolean),
        _ => None,
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Integer(integer) => f.write_str(IntKind::of(integer).name()),
            Type::Boolean => f.write_str("bool"),
            Type::Meta => f.write_str("type"),
        }
    }
}

macro_rules! int_kinds {
    ( $( $Kind:ident = $name:literal, $flag:literal, $signed:literal, $width:expr, )* ) => {
        /// The closed set of integer types, in bytecode index order.
        ///
        /// The discriminant doubles as the 4 bit type index that `cast_int`
        /// packs two of into its argument.
        #[derive(Clone, Copy, Debug, Hash, PartialEq, Eq, PartialOrd, Ord)]
        #[repr(u8)]
        pub enum IntKind {
            $( $Kind, )*
        }

        impl IntKind {
            pub const ALL: &'static [IntKind] = &[ $( IntKind::$Kind, )* ];

            /// The builtin type name, e.g. `ct_int` or `i4`.
            pub fn name(self) -> &'static str {
                match self {
                    $( Self::$Kind => $name, )*
                }
            }

            /// The literal suffix, e.g. `ct` in `2ct`.
            pub fn flag_name(self) -> &'static str {
                match self {
                    $( Self::$Kind => $flag, )*
                }
            }

            pub const fn integer_type(self) -> IntegerType {
                match self {
                    $( Self::$Kind => IntegerType {
                        signed: $signed,
                        width: $width,
                    }, )*
                }
            }

            /// Looks a kind up by its literal suffix.
            pub fn from_flag_name(flag: &str) -> Option<Self> {
                match flag {
                    $( $flag => Some(Self::$Kind), )*
                    _ => None,
                }
            }
        }
    };
}

int_kinds! {
    Ct = "ct_int", "ct", true, IntWidth::Dynamic,
    I1 = "i1", "i1", true, IntWidth::Bytes(1),
    I2 = "i2", "i2", true, IntWidth::Bytes(2),
    I4 = "i4", "i4", true, IntWidth::Bytes(4),
    I8 = "i8", "i8", true, IntWidth::Bytes(8),
    U1 = "u1", "u1", false, IntWidth::Bytes(1),
    U2 = "u2", "u2", false, IntWidth::Bytes(2),
    U4 = "u4", "u4", false, IntWidth::Bytes(4),
    U8 = "u8", "u8", false, IntWidth::Bytes(8),
    IPtr = "iptr", "iptr", true, IntWidth::Pointer,
    UPtr = "uptr", "uptr", false, IntWidth::Pointer,
}

impl IntKind {
    /// The 4 bit index used by the `cast_int` bytecode argument.
    pub fn index(self) -> u8 {
        self as u8
    }

    pub fn from_index(index: u8) -> Option<Self> {
        Self::ALL.get(index as usize).copied()
    }

    /// The kind of a concrete integer type.
    pub fn of(integer: &IntegerType) -> Self {
        Self::ALL
            .iter()
            .copied()
            .find(|kind| kind.integer_type() == *integer)
            .expect("integer type should correspond to a kind")
    }
}

impl fmt::Display for IntKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn int(kind: IntKind) -> Type {
        Type::Integer(kind.integer_type())
    }

    #[test]
    fn constantness_mix() {
        use Constantness::*;
        assert_eq!(Constant.mix(Constant), Constant);
        assert_eq!(Constant.mix(Unknown), Unknown);
        assert_eq!(Unknown.mix(NotConstant), NotConstant);
        assert_eq!(NotConstant.mix(Constant), NotConstant);
    }

    #[test]
    fn ct_int_coerces_both_ways() {
        assert!(Type::CT_INT.coercible_to(&int(IntKind::I4)));
        assert!(int(IntKind::I4).coercible_to(&Type::CT_INT));
        assert!(Type::CT_INT.coercible_to(&int(IntKind::UPtr)));
    }

    #[test]
    fn sized_integers_only_widen() {
        assert!(int(IntKind::I1).coercible_to(&int(IntKind::I8)));
        assert!(!int(IntKind::I8).coercible_to(&int(IntKind::I1)));
        assert!(!int(IntKind::I4).coercible_to(&int(IntKind::U4)));
        assert!(!int(IntKind::I4).coercible_to(&int(IntKind::IPtr)));
        assert!(int(IntKind::IPtr).coercible_to(&int(IntKind::IPtr)));
    }

    #[test]
    fn booleans_and_types_coerce_to_themselves_only() {
        assert!(Type::Boolean.coercible_to(&Type::Boolean));
        assert!(!Type::Boolean.coercible_to(&Type::CT_INT));
        assert!(Type::Meta.coercible_to(&Type::Meta));
        assert!(!Type::Meta.coercible_to(&Type::Boolean));
    }

    #[test]
    fn peer_resolution_adopts_the_sized_type() {
        assert_eq!(
            peer_resolution(&Type::CT_INT, &int(IntKind::I4)),
            Some(int(IntKind::I4))
        );
        assert_eq!(
            peer_resolution(&int(IntKind::U2), &Type::CT_INT),
            Some(int(IntKind::U2))
        );
        assert_eq!(
            peer_resolution(&Type::CT_INT, &Type::CT_INT),
            Some(Type::CT_INT)
        );
    }

    #[test]
    fn peer_resolution_picks_the_wider_type() {
        assert_eq!(
            peer_resolution(&int(IntKind::I1), &int(IntKind::I4)),
            Some(int(IntKind::I4))
        );
        assert_eq!(peer_resolution(&int(IntKind::I1), &int(IntKind::U4)), None);
        assert_eq!(
            peer_resolution(&int(IntKind::I4), &int(IntKind::IPtr)),
            None
        );
    }

    #[test]
    fn operator_result_types() {
        use BinaryOperator::*;
        assert_eq!(
            binary_result_type(Add, &Type::CT_INT, &int(IntKind::I4)),
            Some(int(IntKind::I4))
        );
        assert_eq!(
            binary_result_type(Lt, &int(IntKind::I4), &int(IntKind::I4)),
            Some(Type::Boolean)
        );
        assert_eq!(binary_result_type(Add, &Type::Boolean, &Type::Boolean), None);
        assert_eq!(
            binary_result_type(LogicAnd, &Type::Boolean, &Type::Boolean),
            Some(Type::Boolean)
        );
        assert_eq!(
            binary_result_type(LogicAnd, &Type::CT_INT, &Type::Boolean),
            None
        );
    }

    #[test]
    fn unary_result_types() {
        use UnaryOperator::*;
        assert_eq!(
            unary_result_type(Neg, &int(IntKind::I4)),
            Some(int(IntKind::I4))
        );
        assert_eq!(unary_result_type(BitNot, &Type::CT_INT), Some(Type::CT_INT));
        assert_eq!(unary_result_type(LogicNot, &Type::Boolean), Some(Type::Boolean));
        assert_eq!(unary_result_type(LogicNot, &Type::CT_INT), None);
        assert_eq!(unary_result_type(Neg, &Type::Boolean), None);
    }

    #[test]
    fn int_kind_indices_are_stable() {
        for (index, kind) in IntKind::ALL.iter().enumerate() {
            assert_eq!(kind.index() as usize, index);
            assert_eq!(IntKind::from_index(kind.index()), Some(*kind));
        }
        assert_eq!(IntKind::from_index(11), None);
    }

    #[test]
    fn flag_lexicon() {
        assert_eq!(IntKind::from_flag_name("ct"), Some(IntKind::Ct));
        assert_eq!(IntKind::from_flag_name("iptr"), Some(IntKind::IPtr));
        assert_eq!(IntKind::from_flag_name("ct_int"), None);
        assert_eq!(IntKind::from_flag_name("i3"), None);
    }
}
