//! Shared element model: the id/alias/first-char bookkeeping common to every
//! token pattern and parser rule.

use std::collections::HashSet;

/// Stable integer id into a [`crate::driver::Parser`]'s element arrays.
///
/// Tokens and rules are stored in two separate, independently 0-indexed
/// arrays; an `ElementId` is only unambiguous once paired with an
/// [`ElementKind`] saying which array it indexes into (a simplification
/// over a single shared id space, recorded in `DESIGN.md`).
pub type ElementId = u32;

/// Which array an [`ElementId`] indexes into.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ElementKind {
    Token,
    Rule,
}

/// The set of characters at which an element can possibly begin matching.
///
/// `None` (the `Any`/non-deterministic variant) means first-character
/// dispatch cannot be used for this element; callers must try it
/// unconditionally. ASCII characters are tracked with a 128-bit mask
/// (the same const bit-twiddling idiom as a token-kind bitset); the rare
/// non-ASCII first characters (unicode identifiers, literals) spill into a
/// `HashSet`.
#[derive(Clone, Debug)]
pub enum FirstCharSet {
    /// Could start with anything; not useful for dispatch.
    Any,
    Some { ascii: u128, extra: HashSet<char> },
}

impl FirstCharSet {
    pub fn empty() -> Self {
        FirstCharSet::Some { ascii: 0, extra: HashSet::new() }
    }

    pub fn any() -> Self {
        FirstCharSet::Any
    }

    pub fn single(c: char) -> Self {
        let mut set = Self::empty();
        set.insert(c);
        set
    }

    pub fn from_chars(chars: impl IntoIterator<Item = char>) -> Self {
        let mut set = Self::empty();
        for c in chars {
            set.insert(c);
        }
        set
    }

    pub fn insert(&mut self, c: char) {
        match self {
            FirstCharSet::Any => {}
            FirstCharSet::Some { ascii, extra } => {
                if c.is_ascii() {
                    *ascii |= 1u128 << (c as u32);
                } else {
                    extra.insert(c);
                }
            }
        }
    }

    pub fn contains(&self, c: char) -> bool {
        match self {
            FirstCharSet::Any => true,
            FirstCharSet::Some { ascii, extra } => {
                if c.is_ascii() {
                    (*ascii & (1u128 << (c as u32))) != 0
                } else {
                    extra.contains(&c)
                }
            }
        }
    }

    pub fn is_deterministic(&self) -> bool {
        !matches!(self, FirstCharSet::Any)
    }

    /// Union of two sets, used when combining choice/sequence branches.
    pub fn union(&self, other: &FirstCharSet) -> FirstCharSet {
        match (self, other) {
            (FirstCharSet::Any, _) | (_, FirstCharSet::Any) => FirstCharSet::Any,
            (
                FirstCharSet::Some { ascii: a1, extra: e1 },
                FirstCharSet::Some { ascii: a2, extra: e2 },
            ) => {
                let mut extra = e1.clone();
                extra.extend(e2.iter().copied());
                FirstCharSet::Some { ascii: a1 | a2, extra }
            }
        }
    }

    /// Unions `other` into `self` in place, returning whether `self` grew.
    /// Used by the fixed-point dataflow pass over possibly-recursive
    /// token/rule graphs: each round only needs to know whether anything
    /// changed, not the new contents.
    pub fn union_assign(&mut self, other: &FirstCharSet) -> bool {
        if matches!(self, FirstCharSet::Any) {
            return false;
        }
        if matches!(other, FirstCharSet::Any) {
            *self = FirstCharSet::Any;
            return true;
        }
        let (FirstCharSet::Some { ascii, extra }, FirstCharSet::Some { ascii: other_ascii, extra: other_extra }) = (self, other) else {
            unreachable!("Any handled above");
        };
        let before_ascii = *ascii;
        let before_len = extra.len();
        *ascii |= other_ascii;
        extra.extend(other_extra.iter().copied());
        before_ascii != *ascii || before_len != extra.len()
    }
}

/// Bookkeeping shared by every [`crate::token::TokenPattern`] and
/// [`crate::rule::ParserRule`]. Stored by value inside the enum variant
/// rather than behind a trait object — dispatch on the owning element's
/// variant tag, never a virtual call.
#[derive(Clone, Debug)]
pub struct ElementInfo {
    pub id: ElementId,
    pub aliases: Vec<String>,
    pub first_chars: FirstCharSet,
    pub is_optional: bool,
}

impl ElementInfo {
    pub fn new(id: ElementId) -> Self {
        ElementInfo { id, aliases: Vec::new(), first_chars: FirstCharSet::Any, is_optional: false }
    }

    pub fn primary_alias(&self) -> Option<&str> {
        self.aliases.first().map(String::as_str)
    }
}

/// Flags controlling which initialization passes run over the element
/// arrays (§4.1). Any subset may be active; unset flags degrade gracefully
/// to the simplest correct behavior (e.g. without `first_character_match`,
/// choice dispatch always tries every child in order).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct InitFlags(u8);

impl InitFlags {
    pub const NONE: Self = Self(0);
    pub const FIRST_CHARACTER_MATCH: Self = Self(1 << 0);
    pub const INLINE_RULES: Self = Self(1 << 1);
    pub const ENABLE_MEMOIZATION: Self = Self(1 << 2);
    pub const STACK_TRACE_WRITING: Self = Self(1 << 3);
    pub const WALK_TRACE_RECORDING: Self = Self(1 << 4);

    pub const fn has(self, flag: Self) -> bool {
        (self.0 & flag.0) != 0
    }

    #[must_use]
    pub const fn with(self, flag: Self) -> Self {
        Self(self.0 | flag.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ascii_first_char_set_roundtrips() {
        let set = FirstCharSet::from_chars(['a', 'b', '_']);
        assert!(set.contains('a'));
        assert!(set.contains('_'));
        assert!(!set.contains('c'));
        assert!(set.is_deterministic());
    }

    #[test]
    fn non_ascii_spills_into_extra_set() {
        let set = FirstCharSet::single('λ');
        assert!(set.contains('λ'));
        assert!(!set.contains('a'));
    }

    #[test]
    fn any_absorbs_union() {
        let any = FirstCharSet::any();
        let some = FirstCharSet::single('a');
        assert!(!any.union(&some).is_deterministic());
        assert!(some.union(&any).contains('z'));
    }

    #[test]
    fn union_assign_reports_growth_until_fixed_point() {
        let mut set = FirstCharSet::single('a');
        assert!(set.union_assign(&FirstCharSet::single('b')));
        assert!(!set.union_assign(&FirstCharSet::single('b')));
        assert!(set.contains('a') && set.contains('b'));
    }

    #[test]
    fn union_assign_into_any_is_a_no_op() {
        let mut any = FirstCharSet::any();
        assert!(!any.union_assign(&FirstCharSet::single('a')));
        assert!(!any.is_deterministic());
    }

    #[test]
    fn init_flags_combine() {
        let flags = InitFlags::FIRST_CHARACTER_MATCH.with(InitFlags::ENABLE_MEMOIZATION);
        assert!(flags.has(InitFlags::FIRST_CHARACTER_MATCH));
        assert!(flags.has(InitFlags::ENABLE_MEMOIZATION));
        assert!(!flags.has(InitFlags::STACK_TRACE_WRITING));
    }
}
