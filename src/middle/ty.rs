use itertools::Itertools;

use crate::middle::primitive::PrimitiveKind;

#[derive(Debug, Clone, PartialEq)]
pub enum Type {
    Primitive(PrimitiveKind),
    /// Type of the program symbol, which has no value
    Void,
    Array {
        size: u64,
        element: Box<Type>,
    },
    Record {
        fields: Vec<(String, Type)>,
    },
    /// A reference to a declared type, kept so reports show the name the
    /// user wrote
    Named {
        name: String,
        ty: Box<Type>,
    },
}

impl Type {
    pub const INTEGER: Type = Type::Primitive(PrimitiveKind::Integer);
    pub const REAL: Type = Type::Primitive(PrimitiveKind::Real);
    pub const BOOLEAN: Type = Type::Primitive(PrimitiveKind::Boolean);
    pub const STRING: Type = Type::Primitive(PrimitiveKind::String);

    /// Strips named type references down to the underlying structure
    pub fn peel(&self) -> &Type {
        let mut ty = self;

        while let Type::Named { ty: inner, .. } = ty {
            ty = inner.as_ref();
        }

        ty
    }

    pub fn as_primitive(&self) -> Option<PrimitiveKind> {
        match self.peel() {
            Type::Primitive(primitive) => Some(*primitive),
            _ => None,
        }
    }

    pub fn element_type(&self) -> Option<&Type> {
        match self.peel() {
            Type::Array { element, .. } => Some(element.as_ref()),
            _ => None,
        }
    }

    pub fn is_record(&self) -> bool {
        matches!(self.peel(), Type::Record { .. })
    }

    pub fn field(&self, name: &str) -> Option<&Type> {
        match self.peel() {
            Type::Record { fields } => fields
                .iter()
                .find(|(field, _)| field == name)
                .map(|(_, ty)| ty),
            _ => None,
        }
    }

    /// Sizes of each array dimension, outermost first
    pub fn dimensions(&self) -> Vec<u64> {
        let mut dimensions = vec![];
        let mut ty = self.peel();

        while let Type::Array { size, element } = ty {
            dimensions.push(*size);
            ty = element.peel();
        }

        dimensions
    }

    /// Record fields of this type, or of the innermost element type of an
    /// array of records
    pub fn record_fields(&self) -> &[(String, Type)] {
        let mut ty = self.peel();

        while let Type::Array { element, .. } = ty {
            ty = element.peel();
        }

        match ty {
            Type::Record { fields } => fields,
            _ => &[],
        }
    }

    /// Structural equality, ignoring the names types were referred to by
    pub fn is_structurally_equal(&self, other: &Type) -> bool {
        match (self.peel(), other.peel()) {
            (Type::Primitive(a), Type::Primitive(b)) => a == b,
            (Type::Void, Type::Void) => true,
            (
                Type::Array {
                    size: size_a,
                    element: element_a,
                },
                Type::Array {
                    size: size_b,
                    element: element_b,
                },
            ) => size_a == size_b && element_a.is_structurally_equal(element_b),
            (Type::Record { fields: fields_a }, Type::Record { fields: fields_b }) => {
                fields_a.len() == fields_b.len()
                    && fields_a
                        .iter()
                        .zip(fields_b)
                        .all(|((name_a, ty_a), (name_b, ty_b))| {
                            name_a == name_b && ty_a.is_structurally_equal(ty_b)
                        })
            }
            _ => false,
        }
    }

    /// Whether a value of type `source` can be stored in a location of this
    /// type. Integers widen to reals, nothing narrows.
    pub fn is_compatible_with(&self, source: &Type) -> bool {
        match (self.as_primitive(), source.as_primitive()) {
            (Some(destination), Some(source)) => destination.accepts(source),
            _ => self.is_structurally_equal(source),
        }
    }
}

impl core::fmt::Display for Type {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Type::Primitive(primitive) => write!(f, "{primitive}"),
            Type::Void => write!(f, "void"),
            Type::Array { size, element } => write!(f, "array[{size}] of {element}"),
            Type::Record { fields } => write!(
                f,
                "record({})",
                fields
                    .iter()
                    .map(|(name, ty)| format!("{name}: {ty}"))
                    .join(", ")
            ),
            Type::Named { name, .. } => write!(f, "{name}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn point() -> Type {
        Type::Named {
            name: "point".to_string(),
            ty: Box::new(Type::Record {
                fields: vec![("x".to_string(), Type::REAL), ("y".to_string(), Type::REAL)],
            }),
        }
    }

    #[test]
    fn named_types_compare_by_structure() {
        let anonymous = point().peel().clone();

        assert!(point().is_compatible_with(&anonymous));
        assert!(anonymous.is_compatible_with(&point()));
        assert!(!point().is_compatible_with(&Type::REAL));
    }

    #[test]
    fn arrays_must_match_in_size_and_element() {
        let small = Type::Array {
            size: 3,
            element: Box::new(Type::INTEGER),
        };
        let large = Type::Array {
            size: 4,
            element: Box::new(Type::INTEGER),
        };

        assert!(small.is_compatible_with(&small.clone()));
        assert!(!small.is_compatible_with(&large));
    }

    #[test]
    fn dimensions_and_fields_look_through_arrays() {
        let grid = Type::Array {
            size: 2,
            element: Box::new(Type::Array {
                size: 5,
                element: Box::new(point()),
            }),
        };

        assert_eq!(grid.dimensions(), vec![2, 5]);
        assert_eq!(grid.record_fields().len(), 2);
        assert_eq!(grid.to_string(), "array[2] of array[5] of point");
    }
}
