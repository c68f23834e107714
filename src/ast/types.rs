//! Type descriptors and the numeric generalization rule.

use serde::{Deserialize, Serialize};

/// A type descriptor. Two descriptors are equal iff their kinds are equal
/// (structural equality — see DESIGN.md Open Question 2).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Ty {
    Char,
    Int,
    Float,
    String,
    Void,
}

impl Ty {
    pub fn is_numeric(self) -> bool {
        matches!(self, Ty::Char | Ty::Int | Ty::Float)
    }

    /// Priority used by `generalize`: higher wins.
    fn numeric_rank(self) -> u8 {
        match self {
            Ty::Char => 0,
            Ty::Int => 1,
            Ty::Float => 2,
            _ => unreachable!("numeric_rank called on non-numeric type"),
        }
    }

    /// The generalization of two types: the wider of two numeric types
    /// (`float` > `int` > `char`), or `None` if either side is non-numeric.
    pub fn generalize(self, other: Ty) -> Option<Ty> {
        if !self.is_numeric() || !other.is_numeric() {
            return None;
        }
        if self.numeric_rank() >= other.numeric_rank() {
            Some(self)
        } else {
            Some(other)
        }
    }

    pub fn size_bytes(self) -> u32 {
        match self {
            Ty::Char => 1,
            Ty::Int => 4,
            Ty::Float => 8,
            Ty::String => 8,
            Ty::Void => 0,
        }
    }
}

impl std::fmt::Display for Ty {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Ty::Char => "char",
            Ty::Int => "int",
            Ty::Float => "float",
            Ty::String => "string",
            Ty::Void => "void",
        };
        write!(f, "{s}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generalize_widens_to_float() {
        assert_eq!(Ty::Int.generalize(Ty::Float), Some(Ty::Float));
        assert_eq!(Ty::Float.generalize(Ty::Char), Some(Ty::Float));
        assert_eq!(Ty::Char.generalize(Ty::Int), Some(Ty::Int));
    }

    #[test]
    fn generalize_same_type_is_identity() {
        assert_eq!(Ty::Int.generalize(Ty::Int), Some(Ty::Int));
    }

    #[test]
    fn generalize_rejects_non_numeric() {
        assert_eq!(Ty::String.generalize(Ty::Int), None);
        assert_eq!(Ty::Void.generalize(Ty::Void), None);
    }

    #[test]
    fn equality_is_structural() {
        let a = Ty::Int;
        let b = Ty::Int;
        assert_eq!(a, b);
    }
}
