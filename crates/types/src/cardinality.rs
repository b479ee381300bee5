//! Static occurrence bounds of a sequence.
//!
//! A cardinality is a set of the three possible "shapes" of a sequence:
//! empty, a single item, or more than one item. The five meaningful
//! combinations form a small lattice ordered by inclusion.

use std::fmt;

const ZERO: u8 = 0b001;
const ONE: u8 = 0b010;
const MANY: u8 = 0b100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Cardinality {
    Empty,
    ExactlyOne,
    ZeroOrOne,
    OneOrMore,
    ZeroOrMore,
}

impl Cardinality {
    pub const ALL: [Cardinality; 5] = [
        Cardinality::Empty,
        Cardinality::ExactlyOne,
        Cardinality::ZeroOrOne,
        Cardinality::OneOrMore,
        Cardinality::ZeroOrMore,
    ];

    fn bits(self) -> u8 {
        match self {
            Cardinality::Empty => ZERO,
            Cardinality::ExactlyOne => ONE,
            Cardinality::ZeroOrOne => ZERO | ONE,
            Cardinality::OneOrMore => ONE | MANY,
            Cardinality::ZeroOrMore => ZERO | ONE | MANY,
        }
    }

    /// Rounds a bit set up to the nearest lattice member. A set that allows
    /// "many" always allows "one", since sequences can be truncated.
    fn from_bits(bits: u8) -> Cardinality {
        let allows_zero = bits & ZERO != 0;
        let allows_many = bits & MANY != 0;
        let allows_one = bits & ONE != 0;
        match (allows_zero, allows_one || allows_many, allows_many) {
            (true, false, _) => Cardinality::Empty,
            (false, _, false) => Cardinality::ExactlyOne,
            (true, true, false) => Cardinality::ZeroOrOne,
            (false, _, true) => Cardinality::OneOrMore,
            (true, true, true) => Cardinality::ZeroOrMore,
        }
    }

    pub fn allows_zero(self) -> bool {
        self.bits() & ZERO != 0
    }

    pub fn allows_many(self) -> bool {
        self.bits() & MANY != 0
    }

    pub fn allows_one(self) -> bool {
        self.bits() & ONE != 0
    }

    /// True when every sequence permitted by `other` is also permitted by `self`.
    pub fn subsumes(self, other: Cardinality) -> bool {
        self.bits() | other.bits() == self.bits()
    }

    /// Least upper bound in the lattice, with `Empty` as its identity:
    /// merging a declaration that contributes no items leaves the other
    /// declaration unchanged.
    pub fn union(self, other: Cardinality) -> Cardinality {
        match (self, other) {
            (Cardinality::Empty, c) | (c, Cardinality::Empty) => c,
            (a, b) => Cardinality::from_bits(a.bits() | b.bits()),
        }
    }

    /// Cardinality of a value produced by exactly one of two alternatives,
    /// as in the branches of a conditional.
    pub fn choice(self, other: Cardinality) -> Cardinality {
        Cardinality::from_bits(self.bits() | other.bits())
    }

    /// Greatest lower bound, or `None` when no sequence satisfies both.
    pub fn intersect(self, other: Cardinality) -> Option<Cardinality> {
        let bits = self.bits() & other.bits();
        if bits == 0 {
            None
        } else {
            Some(Cardinality::from_bits(bits))
        }
    }

    /// Cardinality of `for $x in A return B` where A has cardinality `self`
    /// and B has cardinality `other`.
    pub fn multiply(self, other: Cardinality) -> Cardinality {
        if self == Cardinality::Empty || other == Cardinality::Empty {
            return Cardinality::Empty;
        }
        let mut bits = ONE;
        if self.allows_zero() || other.allows_zero() {
            bits |= ZERO;
        }
        if self.allows_many() || other.allows_many() {
            bits |= MANY;
        }
        Cardinality::from_bits(bits)
    }

    /// Cardinality of the concatenation `(A, B)`.
    pub fn sum(self, other: Cardinality) -> Cardinality {
        let min = self.min_count() + other.min_count();
        let max = match (self.max_count(), other.max_count()) {
            (Some(a), Some(b)) => Some(a + b),
            _ => None,
        };
        Cardinality::from_counts(min, max)
    }

    /// Smallest number of items a sequence of this cardinality may hold.
    pub fn min_count(self) -> usize {
        if self.allows_zero() { 0 } else { 1 }
    }

    /// Largest number of items, or `None` when unbounded.
    pub fn max_count(self) -> Option<usize> {
        match self {
            Cardinality::Empty => Some(0),
            Cardinality::ExactlyOne | Cardinality::ZeroOrOne => Some(1),
            _ => None,
        }
    }

    pub fn from_counts(min: usize, max: Option<usize>) -> Cardinality {
        match (min, max) {
            (_, Some(0)) => Cardinality::Empty,
            (0, Some(1)) => Cardinality::ZeroOrOne,
            (_, Some(1)) => Cardinality::ExactlyOne,
            (0, _) => Cardinality::ZeroOrMore,
            _ => Cardinality::OneOrMore,
        }
    }

    /// Cardinality of a sequence known to hold exactly `n` items.
    pub fn for_count(n: usize) -> Cardinality {
        Cardinality::from_counts(n, Some(n))
    }

    /// The same bound with the empty sequence additionally permitted.
    pub fn with_zero(self) -> Cardinality {
        Cardinality::from_bits(self.bits() | ZERO)
    }

    /// The same bound with the empty sequence removed.
    pub fn without_zero(self) -> Cardinality {
        match self {
            Cardinality::Empty => Cardinality::Empty,
            Cardinality::ZeroOrOne => Cardinality::ExactlyOne,
            Cardinality::ZeroOrMore => Cardinality::OneOrMore,
            other => other,
        }
    }

    /// Checks an actual item count against this bound.
    pub fn admits(self, count: usize) -> bool {
        match count {
            0 => self.allows_zero(),
            1 => self.allows_one(),
            _ => self.allows_many(),
        }
    }

    pub fn occurrence_indicator(self) -> &'static str {
        match self {
            Cardinality::Empty => "0",
            Cardinality::ExactlyOne => "",
            Cardinality::ZeroOrOne => "?",
            Cardinality::OneOrMore => "+",
            Cardinality::ZeroOrMore => "*",
        }
    }

    /// Phrase used in diagnostics, e.g. "a sequence of more than one item".
    pub fn describe(self) -> &'static str {
        match self {
            Cardinality::Empty => "an empty sequence",
            Cardinality::ExactlyOne => "exactly one item",
            Cardinality::ZeroOrOne => "an optional item",
            Cardinality::OneOrMore => "one or more items",
            Cardinality::ZeroOrMore => "any number of items",
        }
    }
}

impl fmt::Display for Cardinality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.occurrence_indicator())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn any_cardinality() -> impl Strategy<Value = Cardinality> {
        prop::sample::select(Cardinality::ALL.to_vec())
    }

    #[test]
    fn test_subsumes_table() {
        use Cardinality::*;
        assert!(ZeroOrOne.subsumes(Empty));
        assert!(ZeroOrOne.subsumes(ExactlyOne));
        assert!(!ZeroOrOne.subsumes(OneOrMore));
        assert!(OneOrMore.subsumes(ExactlyOne));
        assert!(!OneOrMore.subsumes(Empty));
        assert!(!Empty.subsumes(ExactlyOne));
    }

    #[test]
    fn test_multiply_and_sum() {
        use Cardinality::*;
        assert_eq!(ExactlyOne.multiply(ZeroOrOne), ZeroOrOne);
        assert_eq!(OneOrMore.multiply(ExactlyOne), OneOrMore);
        assert_eq!(ZeroOrOne.multiply(OneOrMore), ZeroOrMore);
        assert_eq!(Empty.multiply(OneOrMore), Empty);
        assert_eq!(ExactlyOne.sum(ExactlyOne), OneOrMore);
        assert_eq!(ZeroOrOne.sum(Empty), ZeroOrOne);
        assert_eq!(ZeroOrOne.sum(ExactlyOne), OneOrMore);
        assert_eq!(Empty.sum(Empty), Empty);
    }

    #[test]
    fn test_admits_counts() {
        assert!(Cardinality::OneOrMore.admits(3));
        assert!(!Cardinality::ZeroOrOne.admits(2));
        assert!(Cardinality::Empty.admits(0));
        assert_eq!(Cardinality::for_count(1), Cardinality::ExactlyOne);
        assert_eq!(Cardinality::for_count(4), Cardinality::OneOrMore);
    }

    #[test]
    fn test_intersect() {
        use Cardinality::*;
        assert_eq!(ZeroOrOne.intersect(OneOrMore), Some(ExactlyOne));
        assert_eq!(ZeroOrMore.intersect(ZeroOrOne), Some(ZeroOrOne));
        assert_eq!(Empty.intersect(ExactlyOne), None);
    }

    proptest! {
        #[test]
        fn zero_or_more_subsumes_everything(c in any_cardinality()) {
            prop_assert!(Cardinality::ZeroOrMore.subsumes(c));
        }

        #[test]
        fn exactly_one_subsumes_only_itself(c in any_cardinality()) {
            prop_assert_eq!(Cardinality::ExactlyOne.subsumes(c), c == Cardinality::ExactlyOne);
        }

        #[test]
        fn union_with_empty_is_identity(c in any_cardinality()) {
            prop_assert_eq!(Cardinality::Empty.union(c), c);
            prop_assert_eq!(c.union(Cardinality::Empty), c);
        }

        #[test]
        fn choice_with_empty_adds_zero(c in any_cardinality()) {
            prop_assert_eq!(Cardinality::Empty.choice(c), c.with_zero());
        }

        #[test]
        fn multiply_is_commutative(a in any_cardinality(), b in any_cardinality()) {
            prop_assert_eq!(a.multiply(b), b.multiply(a));
        }

        #[test]
        fn multiply_is_associative(
            a in any_cardinality(),
            b in any_cardinality(),
            c in any_cardinality(),
        ) {
            prop_assert_eq!(a.multiply(b).multiply(c), a.multiply(b.multiply(c)));
        }

        #[test]
        fn choice_is_an_upper_bound(a in any_cardinality(), b in any_cardinality()) {
            let u = a.choice(b);
            prop_assert!(u.subsumes(a));
            prop_assert!(u.subsumes(b));
        }
    }
}
