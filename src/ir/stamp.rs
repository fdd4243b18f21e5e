//! Stamps: abstract value descriptors attached to every node.
//!
//! A stamp describes what is statically known about the value a node
//! produces: its kind (integer, boolean, object reference, type hub) and any
//! refinement on top of that (integer range, proven non-nullity, an exact
//! receiver type). Canonicalization and devirtualization read stamps to
//! decide which rewrites are sound; [`crate::ir::ops::NodeOp::Pi`] nodes
//! exist purely to carry a refined stamp for a value below a guard.

use strum::{Display, EnumIter};

/// Opaque handle for a resolved type in the surrounding runtime's metadata.
///
/// The core never interprets these; it only compares them and passes them to
/// the [`crate::providers::MetaProvider`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TypeId(pub u32);

/// Opaque handle for a resolved method in the surrounding runtime's metadata.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MethodId(pub u32);

/// The element kinds for which a pre-interned array location identity exists.
///
/// One location identity is registered per kind when a
/// [`crate::location::LocationRegistry`] is constructed, so all array
/// accesses of the same element kind share one identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumIter)]
pub enum ElementKind {
    /// `boolean` elements.
    Boolean,
    /// `byte` elements.
    Byte,
    /// `short` elements.
    Short,
    /// `char` elements.
    Char,
    /// `int` elements.
    Int,
    /// `long` elements.
    Long,
    /// `float` elements.
    Float,
    /// `double` elements.
    Double,
    /// Object-reference elements.
    Object,
}

/// A compile-time constant value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Constant {
    /// A signed integer constant (covers all integral widths).
    Int(i64),
    /// A boolean constant.
    Boolean(bool),
    /// The null reference.
    Null,
    /// A type hub (the runtime type descriptor of the given type).
    Hub(TypeId),
}

/// Abstract description of the value a node produces.
///
/// Stamps only ever refine: a rewrite may replace a node with one whose stamp
/// is at least as precise, never less.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stamp {
    /// No value (control-only nodes).
    Void,
    /// An integer of the given bit width, known to lie in `[lo, hi]`.
    Int {
        /// Bit width of the value.
        bits: u8,
        /// Inclusive lower bound.
        lo: i64,
        /// Inclusive upper bound.
        hi: i64,
    },
    /// A boolean value.
    Boolean,
    /// An object reference.
    Object {
        /// The most precise type known for the reference, if any.
        ty: Option<TypeId>,
        /// Whether `ty` is exact (the dynamic type equals `ty`) rather than
        /// an upper bound.
        exact: bool,
        /// Whether the reference is proven non-null.
        non_null: bool,
    },
    /// A type hub value, as produced by a hub load.
    Hub,
}

impl Stamp {
    /// An unconstrained integer stamp of the given bit width.
    #[must_use]
    pub fn int(bits: u8) -> Self {
        Stamp::Int {
            bits,
            lo: i64::MIN,
            hi: i64::MAX,
        }
    }

    /// The stamp of a known integer constant.
    #[must_use]
    pub fn int_constant(bits: u8, value: i64) -> Self {
        Stamp::Int {
            bits,
            lo: value,
            hi: value,
        }
    }

    /// The boolean stamp.
    #[must_use]
    pub fn boolean() -> Self {
        Stamp::Boolean
    }

    /// An object stamp with an upper-bound type and unknown nullity.
    #[must_use]
    pub fn object(ty: Option<TypeId>) -> Self {
        Stamp::Object {
            ty,
            exact: false,
            non_null: false,
        }
    }

    /// An object stamp with an upper-bound type, proven non-null.
    #[must_use]
    pub fn object_non_null(ty: Option<TypeId>) -> Self {
        Stamp::Object {
            ty,
            exact: false,
            non_null: true,
        }
    }

    /// An object stamp with an exact dynamic type, proven non-null.
    #[must_use]
    pub fn object_exact_non_null(ty: TypeId) -> Self {
        Stamp::Object {
            ty: Some(ty),
            exact: true,
            non_null: true,
        }
    }

    /// The stamp describing the given constant.
    #[must_use]
    pub fn for_constant(constant: &Constant) -> Self {
        match constant {
            Constant::Int(v) => Stamp::int_constant(64, *v),
            Constant::Boolean(_) => Stamp::Boolean,
            Constant::Null => Stamp::Object {
                ty: None,
                exact: false,
                non_null: false,
            },
            Constant::Hub(_) => Stamp::Hub,
        }
    }

    /// Whether this stamp proves the value is a non-null reference.
    ///
    /// Non-reference stamps answer `false`; they are not subject to null
    /// checks in the first place.
    #[must_use]
    pub fn is_non_null(&self) -> bool {
        matches!(self, Stamp::Object { non_null: true, .. })
    }

    /// The exact dynamic type, if this stamp pins one down.
    #[must_use]
    pub fn exact_type(&self) -> Option<TypeId> {
        match self {
            Stamp::Object {
                ty: Some(ty),
                exact: true,
                ..
            } => Some(*ty),
            _ => None,
        }
    }

    /// The upper-bound type of a reference stamp, exact or not.
    #[must_use]
    pub fn object_type(&self) -> Option<TypeId> {
        match self {
            Stamp::Object { ty, .. } => *ty,
            _ => None,
        }
    }

    /// Whether `self` is a strictly more precise object stamp than `other`.
    ///
    /// Used to decide whether a type-narrowing node still improves on the
    /// stamp of its input.
    #[must_use]
    pub fn improves_on(&self, other: &Stamp) -> bool {
        match (self, other) {
            (
                Stamp::Object {
                    ty: a_ty,
                    exact: a_exact,
                    non_null: a_nn,
                },
                Stamp::Object {
                    ty: b_ty,
                    exact: b_exact,
                    non_null: b_nn,
                },
            ) => {
                (a_ty.is_some() && b_ty.is_none())
                    || (*a_exact && !b_exact)
                    || (*a_nn && !b_nn)
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strum::IntoEnumIterator;

    #[test]
    fn test_element_kinds_enumerate() {
        let kinds: Vec<_> = ElementKind::iter().collect();
        assert_eq!(kinds.len(), 9);
        assert_eq!(kinds[0], ElementKind::Boolean);
        assert_eq!(kinds[8], ElementKind::Object);
    }

    #[test]
    fn test_constant_stamps() {
        assert_eq!(
            Stamp::for_constant(&Constant::Int(7)),
            Stamp::Int {
                bits: 64,
                lo: 7,
                hi: 7
            }
        );
        assert!(!Stamp::for_constant(&Constant::Null).is_non_null());
        assert_eq!(Stamp::for_constant(&Constant::Hub(TypeId(3))), Stamp::Hub);
    }

    #[test]
    fn test_object_stamp_queries() {
        let loose = Stamp::object(Some(TypeId(1)));
        let exact = Stamp::object_exact_non_null(TypeId(1));

        assert_eq!(loose.exact_type(), None);
        assert_eq!(exact.exact_type(), Some(TypeId(1)));
        assert!(exact.is_non_null());
        assert!(exact.improves_on(&loose));
        assert!(!loose.improves_on(&exact));
    }
}
