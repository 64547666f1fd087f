use super::TypeId;

/// Static type of an expression, local, field or method return.
///
/// Primitive types and `String` are singletons; class and interface types
/// refer to their [`DeclaredType`](super::DeclaredType) by handle.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Type {
    Void,
    Boolean,
    Int,
    Long,
    Double,
    String,
    /// The type of the `null` literal
    Null,
    Class(TypeId),
    Array(Box<Type>),
}

impl Type {
    pub fn array_of(element: Type) -> Type {
        Type::Array(Box::new(element))
    }

    pub fn is_primitive(&self) -> bool {
        matches!(
            self,
            Type::Boolean | Type::Int | Type::Long | Type::Double | Type::Void
        )
    }

    pub fn is_reference(&self) -> bool {
        matches!(
            self,
            Type::String | Type::Null | Type::Class(_) | Type::Array(_)
        )
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, Type::Int | Type::Long | Type::Double)
    }

    pub fn is_long(&self) -> bool {
        matches!(self, Type::Long)
    }

    pub fn element_type(&self) -> Option<&Type> {
        match self {
            Type::Array(element) => Some(element),
            _ => None,
        }
    }

    /// Binary numeric promotion
    pub fn promote(lhs: &Type, rhs: &Type) -> Type {
        match (lhs, rhs) {
            (Type::Double, _) | (_, Type::Double) => Type::Double,
            (Type::Long, _) | (_, Type::Long) => Type::Long,
            _ => Type::Int,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_promotion_order() {
        assert_eq!(Type::promote(&Type::Int, &Type::Int), Type::Int);
        assert_eq!(Type::promote(&Type::Int, &Type::Long), Type::Long);
        assert_eq!(Type::promote(&Type::Long, &Type::Double), Type::Double);
    }

    #[test]
    fn test_categories() {
        assert!(Type::Long.is_primitive());
        assert!(!Type::String.is_primitive());
        assert!(Type::String.is_reference());
        assert!(Type::array_of(Type::Int).is_reference());
        assert_eq!(Type::array_of(Type::Int).element_type(), Some(&Type::Int));
    }
}
