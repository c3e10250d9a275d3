//! Key ordering used by the map.
//!
//! The map never calls [`Ord`] directly, it asks the key type for `key_eq` and
//! `key_lt` through [`KeyOrd`]. The rules for composite keys are implemented
//! once here:
//!
//! - Primitive numbers, `bool`, `char` and `()` use the native `==` and `<`.
//!   Floats therefore inherit IEEE semantics, a NaN key breaks the total order.
//! - Tuples compare field by field, in field order.
//! - Arrays, slices, `Vec`, `str` and `String` compare element by element in
//!   index order; when one is a prefix of the other the shorter one is less.
//! - `Option`: two `None` are equal, `None` is less than any `Some`, and two
//!   `Some` compare their contents.
//!
//! Record types implement [`KeyOrd`] by hand, or with [`key_ord_via_ord!`]
//! when they already implement [`Ord`].

/// Equality and strict less-than over a key type.
///
/// Implementations must form a strict total order: exactly one of
/// `a.key_lt(b)`, `b.key_lt(a)`, `a.key_eq(b)` holds for any `a`, `b`.
pub trait KeyOrd {
    /// `self == other`.
    fn key_eq(&self, other: &Self) -> bool;

    /// `self < other`.
    fn key_lt(&self, other: &Self) -> bool;
}

/// Implement [`KeyOrd`] for types that already implement [`Ord`].
///
/// ```
/// use btree_store::{key_ord_via_ord, BTreeMap};
///
/// #[derive(PartialEq, Eq, PartialOrd, Ord)]
/// struct Account {
///     region: u8,
///     id: u32,
/// }
/// key_ord_via_ord!(Account);
///
/// let mut m = BTreeMap::new();
/// m.fetch_put(Account { region: 1, id: 7 }, "x").unwrap();
/// assert_eq!(m.get(&Account { region: 1, id: 7 }), Some(&"x"));
/// ```
#[macro_export]
macro_rules! key_ord_via_ord {
    ( $( $t: ty ),* $(,)? ) => {
        $(
            impl $crate::KeyOrd for $t {
                #[inline]
                fn key_eq(&self, other: &Self) -> bool {
                    ::std::cmp::Ord::cmp(self, other) == ::std::cmp::Ordering::Equal
                }
                #[inline]
                fn key_lt(&self, other: &Self) -> bool {
                    ::std::cmp::Ord::cmp(self, other) == ::std::cmp::Ordering::Less
                }
            }
        )*
    };
}

macro_rules! native {
    ( $( $t: ty ),* ) => {
        $(
            impl KeyOrd for $t {
                #[inline]
                fn key_eq(&self, other: &Self) -> bool {
                    self == other
                }
                #[inline]
                fn key_lt(&self, other: &Self) -> bool {
                    self < other
                }
            }
        )*
    };
}

native!(u8, u16, u32, u64, u128, usize, i8, i16, i32, i64, i128, isize, f32, f64, bool, char, ());

/// Lexicographic comparison, shorter is less on an equal common prefix.
fn seq_lt<T: KeyOrd>(a: &[T], b: &[T]) -> bool {
    for (x, y) in a.iter().zip(b) {
        if x.key_lt(y) {
            return true;
        }
        if !x.key_eq(y) {
            return false;
        }
    }
    a.len() < b.len()
}

fn seq_eq<T: KeyOrd>(a: &[T], b: &[T]) -> bool {
    a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.key_eq(y))
}

impl<T: KeyOrd> KeyOrd for [T] {
    fn key_eq(&self, other: &Self) -> bool {
        seq_eq(self, other)
    }
    fn key_lt(&self, other: &Self) -> bool {
        seq_lt(self, other)
    }
}

impl<T: KeyOrd, const N: usize> KeyOrd for [T; N] {
    fn key_eq(&self, other: &Self) -> bool {
        seq_eq(self, other)
    }
    fn key_lt(&self, other: &Self) -> bool {
        seq_lt(self, other)
    }
}

impl<T: KeyOrd> KeyOrd for Vec<T> {
    fn key_eq(&self, other: &Self) -> bool {
        seq_eq(self, other)
    }
    fn key_lt(&self, other: &Self) -> bool {
        seq_lt(self, other)
    }
}

impl KeyOrd for str {
    fn key_eq(&self, other: &Self) -> bool {
        seq_eq(self.as_bytes(), other.as_bytes())
    }
    fn key_lt(&self, other: &Self) -> bool {
        seq_lt(self.as_bytes(), other.as_bytes())
    }
}

impl KeyOrd for String {
    fn key_eq(&self, other: &Self) -> bool {
        self.as_str().key_eq(other.as_str())
    }
    fn key_lt(&self, other: &Self) -> bool {
        self.as_str().key_lt(other.as_str())
    }
}

impl<T: KeyOrd> KeyOrd for Option<T> {
    fn key_eq(&self, other: &Self) -> bool {
        match (self, other) {
            (None, None) => true,
            (Some(a), Some(b)) => a.key_eq(b),
            _ => false,
        }
    }
    fn key_lt(&self, other: &Self) -> bool {
        match (self, other) {
            (None, Some(_)) => true,
            (Some(a), Some(b)) => a.key_lt(b),
            _ => false,
        }
    }
}

impl<T: KeyOrd + ?Sized> KeyOrd for &T {
    #[inline]
    fn key_eq(&self, other: &Self) -> bool {
        (**self).key_eq(*other)
    }
    #[inline]
    fn key_lt(&self, other: &Self) -> bool {
        (**self).key_lt(*other)
    }
}

impl<T: KeyOrd + ?Sized> KeyOrd for Box<T> {
    #[inline]
    fn key_eq(&self, other: &Self) -> bool {
        (**self).key_eq(&**other)
    }
    #[inline]
    fn key_lt(&self, other: &Self) -> bool {
        (**self).key_lt(&**other)
    }
}

// Field-wise: the first field that differs decides.
macro_rules! tuple {
    ( $( $name: ident $ix: tt ),+ ) => {
        impl<$( $name: KeyOrd ),+> KeyOrd for ( $( $name, )+ ) {
            fn key_eq(&self, other: &Self) -> bool {
                $( self.$ix.key_eq(&other.$ix) )&&+
            }
            fn key_lt(&self, other: &Self) -> bool {
                $(
                    if self.$ix.key_lt(&other.$ix) {
                        return true;
                    }
                    if !self.$ix.key_eq(&other.$ix) {
                        return false;
                    }
                )+
                false
            }
        }
    };
}

tuple!(A 0);
tuple!(A 0, B 1);
tuple!(A 0, B 1, C 2);
tuple!(A 0, B 1, C 2, D 3);
tuple!(A 0, B 1, C 2, D 3, E 4);
tuple!(A 0, B 1, C 2, D 3, E 4, F 5);
