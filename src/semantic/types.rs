//! Type system for Rx

use std::fmt;

/// Concrete integer type names.
pub const INTEGER_TYPES: [&str; 4] = ["i32", "u32", "isize", "usize"];

/// Names that resolve without a declaration.
pub const PRIMITIVE_TYPES: [&str; 8] = ["bool", "i32", "u32", "isize", "usize", "char", "str", "String"];

/// Resolved type of a value or declaration
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Ty {
    /// Struct, enum or primitive: `i32`, `bool`, `Point`
    Named(String),
    Reference { mutable: bool, inner: Box<Ty> },
    Array { elem: Box<Ty>, len: usize },
    Unit,
    /// Type of diverging expressions (`return`, `break`, `continue`)
    Never,
    /// Unsuffixed integer literal, not yet unified with a concrete integer
    IntegerLiteral,
}

impl Ty {
    pub fn named(name: &str) -> Ty {
        Ty::Named(name.to_string())
    }

    pub fn reference(mutable: bool, inner: Ty) -> Ty {
        Ty::Reference {
            mutable,
            inner: Box::new(inner),
        }
    }

    pub fn array(elem: Ty, len: usize) -> Ty {
        Ty::Array {
            elem: Box::new(elem),
            len,
        }
    }

    pub fn bool() -> Ty {
        Ty::named("bool")
    }

    pub fn i32() -> Ty {
        Ty::named("i32")
    }

    pub fn usize() -> Ty {
        Ty::named("usize")
    }

    pub fn is_integer(&self) -> bool {
        match self {
            Ty::IntegerLiteral => true,
            Ty::Named(name) => INTEGER_TYPES.contains(&name.as_str()),
            _ => false,
        }
    }

    pub fn is_named(&self, name: &str) -> bool {
        matches!(self, Ty::Named(n) if n == name)
    }

    pub fn is_bool(&self) -> bool {
        self.is_named("bool")
    }

    pub fn is_never(&self) -> bool {
        matches!(self, Ty::Never)
    }

    /// Strips exactly one outer reference.
    pub fn auto_deref(&self) -> &Ty {
        match self {
            Ty::Reference { inner, .. } => inner,
            other => other,
        }
    }

    /// Name of the struct/enum/primitive behind at most one reference.
    pub fn base_name(&self) -> Option<&str> {
        match self.auto_deref() {
            Ty::Named(name) => Some(name),
            _ => None,
        }
    }

    /// Replace `Self` with the implementing type.
    pub fn substitute_self(&self, target: &str) -> Ty {
        match self {
            Ty::Named(name) if name == "Self" => Ty::named(target),
            Ty::Reference { mutable, inner } => Ty::reference(*mutable, inner.substitute_self(target)),
            Ty::Array { elem, len } => Ty::array(elem.substitute_self(target), *len),
            other => other.clone(),
        }
    }

    /// Unsuffixed literals default to `i32` once they are bound to a variable.
    pub fn default_integer(&self) -> Ty {
        match self {
            Ty::IntegerLiteral => Ty::i32(),
            Ty::Array { elem, len } => Ty::array(elem.default_integer(), *len),
            other => other.clone(),
        }
    }
}

impl fmt::Display for Ty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Ty::Named(name) => write!(f, "{}", name),
            Ty::Reference { mutable: true, inner } => write!(f, "&mut {}", inner),
            Ty::Reference { mutable: false, inner } => write!(f, "&{}", inner),
            Ty::Array { elem, len } => write!(f, "[{}; {}]", elem, len),
            Ty::Unit => write!(f, "()"),
            Ty::Never => write!(f, "!"),
            Ty::IntegerLiteral => write!(f, "{{integer}}"),
        }
    }
}

/// Whether a value of type `src` may be stored where `dst` is expected.
///
/// One layer of reference is stripped from both sides first.
pub fn can_assign(dst: &Ty, src: &Ty) -> bool {
    compatible(dst.auto_deref(), src.auto_deref())
}

fn compatible(dst: &Ty, src: &Ty) -> bool {
    match (dst, src) {
        (Ty::Never, _) | (_, Ty::Never) => true,
        (Ty::IntegerLiteral, other) | (other, Ty::IntegerLiteral) => other.is_integer(),
        (Ty::Array { elem: a, len: n }, Ty::Array { elem: b, len: m }) => n == m && compatible(a, b),
        (
            Ty::Reference { mutable: m1, inner: a },
            Ty::Reference { mutable: m2, inner: b },
        ) => m1 == m2 && compatible(a, b),
        (a, b) => a == b,
    }
}

/// The common type of two branches, breaks or operands, if any.
pub fn unify(a: &Ty, b: &Ty) -> Option<Ty> {
    match (a, b) {
        (Ty::Never, other) | (other, Ty::Never) => Some(other.clone()),
        (Ty::IntegerLiteral, other) | (other, Ty::IntegerLiteral) if other.is_integer() => {
            Some(other.clone())
        }
        (Ty::Array { elem: x, len: n }, Ty::Array { elem: y, len: m }) if n == m => {
            unify(x, y).map(|elem| Ty::array(elem, *n))
        }
        (a, b) if a == b => Some(a.clone()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn samples() -> Vec<Ty> {
        vec![
            Ty::i32(),
            Ty::named("u32"),
            Ty::usize(),
            Ty::bool(),
            Ty::named("Point"),
            Ty::Unit,
            Ty::IntegerLiteral,
            Ty::reference(true, Ty::named("String")),
            Ty::array(Ty::i32(), 4),
        ]
    }

    #[test]
    fn test_can_assign_reflexive() {
        for ty in samples() {
            assert!(can_assign(&ty, &ty), "{} should accept itself", ty);
        }
    }

    #[test]
    fn test_never_assigns_anywhere() {
        for ty in samples() {
            assert!(can_assign(&ty, &Ty::Never));
        }
    }

    #[test]
    fn test_integer_literal_compatibility() {
        assert!(can_assign(&Ty::i32(), &Ty::IntegerLiteral));
        assert!(can_assign(&Ty::IntegerLiteral, &Ty::usize()));
        assert!(!can_assign(&Ty::bool(), &Ty::IntegerLiteral));
    }

    #[test]
    fn test_distinct_integers_incompatible() {
        assert!(!can_assign(&Ty::named("u32"), &Ty::usize()));
        assert!(!can_assign(&Ty::i32(), &Ty::named("isize")));
        assert_eq!(unify(&Ty::named("u32"), &Ty::usize()), None);
    }

    #[test]
    fn test_array_lengths_must_match() {
        let three = Ty::array(Ty::i32(), 3);
        let four = Ty::array(Ty::i32(), 4);
        assert!(!can_assign(&three, &four));
        assert!(can_assign(&three, &Ty::array(Ty::IntegerLiteral, 3)));
    }

    #[test]
    fn test_auto_deref_one_layer() {
        let r = Ty::reference(false, Ty::i32());
        assert!(can_assign(&r, &Ty::i32()));
        assert!(can_assign(&Ty::i32(), &r));

        let rr = Ty::reference(false, r.clone());
        assert!(!can_assign(&Ty::i32(), &rr));
    }

    #[test]
    fn test_unify_integer_literal() {
        assert_eq!(unify(&Ty::IntegerLiteral, &Ty::usize()), Some(Ty::usize()));
        assert_eq!(unify(&Ty::Never, &Ty::bool()), Some(Ty::bool()));
        assert_eq!(unify(&Ty::IntegerLiteral, &Ty::bool()), None);
    }

    #[test]
    fn test_display_and_substitution() {
        let ty = Ty::reference(true, Ty::array(Ty::named("Self"), 2));
        assert_eq!(ty.to_string(), "&mut [Self; 2]");
        assert_eq!(ty.substitute_self("P").to_string(), "&mut [P; 2]");
        assert_eq!(Ty::IntegerLiteral.to_string(), "{integer}");
    }
}
