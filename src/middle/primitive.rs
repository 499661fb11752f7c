use strum::{EnumIter, EnumString};

use crate::frontend::ast::LiteralKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumString, EnumIter, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum PrimitiveKind {
    Integer,
    Real,
    Boolean,
    String,
}

impl PrimitiveKind {
    pub fn of_literal(literal: &LiteralKind) -> Self {
        match literal {
            LiteralKind::Integer(_) => PrimitiveKind::Integer,
            LiteralKind::Real(_) => PrimitiveKind::Real,
            LiteralKind::String(_) => PrimitiveKind::String,
        }
    }

    /// Result of an arithmetic operation. Mixing integers and reals widens to
    /// real, anything else is not arithmetic at all.
    pub fn arithmetic_result(self, other: Self) -> Option<Self> {
        match (self, other) {
            (PrimitiveKind::Integer, PrimitiveKind::Integer) => Some(PrimitiveKind::Integer),
            (PrimitiveKind::Real | PrimitiveKind::Integer, PrimitiveKind::Real)
            | (PrimitiveKind::Real, PrimitiveKind::Integer) => Some(PrimitiveKind::Real),
            _ => None,
        }
    }

    /// Whether a value of `source` may be stored where `self` is expected
    pub fn accepts(self, source: Self) -> bool {
        self == source || (self == PrimitiveKind::Real && source == PrimitiveKind::Integer)
    }
}

#[cfg(test)]
mod tests {
    use strum::IntoEnumIterator;

    use super::*;

    #[test]
    fn names_round_trip() {
        for primitive in PrimitiveKind::iter() {
            assert_eq!(primitive.to_string().parse::<PrimitiveKind>(), Ok(primitive));
        }

        assert!("point".parse::<PrimitiveKind>().is_err());
    }

    #[test]
    fn widening_never_narrows() {
        assert!(PrimitiveKind::Real.accepts(PrimitiveKind::Integer));
        assert!(!PrimitiveKind::Integer.accepts(PrimitiveKind::Real));
        assert_eq!(
            PrimitiveKind::Integer.arithmetic_result(PrimitiveKind::Real),
            Some(PrimitiveKind::Real)
        );
        assert_eq!(PrimitiveKind::String.arithmetic_result(PrimitiveKind::Integer), None);
    }
}
