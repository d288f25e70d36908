//! Indirection levels tracked while walking the flow graph.
use std::fmt;

/// The lowest tracked level. Once a walk reaches it, the level sticks:
/// further `&` cannot lower it and `*` cannot raise it. This cuts loops of
/// the flow graph that would otherwise recurse into deeper and deeper
/// levels.
pub const MIN_LEVEL: i8 = -2;

/// Saturation thresholds of the level components.
pub const SAT_MAX: i8 = i8::MAX;
pub const SAT_MIN: i8 = i8::MIN;

/// Reference state applied to memory reached from a flood root.
///
/// `value` is the sum of `*` (+1) and `&` (-1) operations seen along the
/// walk from a destination back to a source.
///
/// `suffix_value` is the largest level of a walk suffix that starts at a
/// copy. For example, in `sink = &T{f: *p}` the level of `p` is 0, but `p`
/// itself is not reachable from the sink because it was dereferenced and
/// then copied into a new `T`; only its content is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Level {
    value: i8,
    suffix_value: i8,
}

impl Level {
    pub const ZERO: Self = Self {
        value: 0,
        suffix_value: 0,
    };

    pub const fn new(value: i8, suffix_value: i8) -> Self {
        Self {
            value,
            suffix_value,
        }
    }

    pub fn from_int(i: i32) -> Self {
        if i <= MIN_LEVEL as i32 {
            return Self::new(MIN_LEVEL, 0);
        }
        Self::new(i.min(SAT_MAX as i32) as i8, 0)
    }

    pub fn value(self) -> i32 {
        self.value as i32
    }

    /// The number of dereferences applied to a pointer before any address
    /// is taken, counted on suffixes that start with a copy.
    pub fn guaranteed_dereference(self) -> i32 {
        self.suffix_value as i32
    }

    /// The effect of an indirection (`*`).
    pub fn inc(self) -> Self {
        if self.value <= MIN_LEVEL {
            return Self::new(MIN_LEVEL, 0);
        }
        Self::new(sat_inc(self.value), sat_inc(self.suffix_value))
    }

    /// The effect of an address-of (`&`).
    pub fn dec(self) -> Self {
        if self.value <= MIN_LEVEL {
            return Self::new(MIN_LEVEL, 0);
        }
        Self::new(sat_dec(self.value), sat_dec(self.suffix_value))
    }

    /// The level of a copy of a value with this level.
    pub fn copy(self) -> Self {
        Self::new(self.value, self.suffix_value.max(0))
    }

    pub fn min(self, other: Self) -> Self {
        Self::new(
            self.value.min(other.value),
            self.suffix_value.min(other.suffix_value),
        )
    }

    /// Reports whether memory reached with this level, allocated at
    /// `src_depth`, outlives its scope when stored at `dst_depth`.
    pub fn leaks(self, dst_depth: i32, src_depth: i32) -> bool {
        self.value <= 0 && self.suffix_value <= 0 && dst_depth < src_depth
    }
}

fn sat_inc(x: i8) -> i8 {
    if x == SAT_MAX {
        return SAT_MAX;
    }
    x + 1
}

fn sat_dec(x: i8) -> i8 {
    if x == SAT_MIN {
        return SAT_MIN;
    }
    x - 1
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{{} {}}}", self.value, self.suffix_value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inc_dec() {
        let l = Level::ZERO.inc().inc();
        assert_eq!(l, Level::new(2, 2));
        assert_eq!(l.dec(), Level::new(1, 1));
        assert_eq!(Level::ZERO.dec(), Level::new(-1, -1));
        assert_eq!(Level::ZERO.dec().dec(), Level::new(-2, -2));
    }

    #[test]
    fn min_level_is_sticky() {
        let bottom = Level::ZERO.dec().dec();
        assert_eq!(bottom.value(), MIN_LEVEL as i32);
        assert_eq!(bottom.dec(), Level::new(MIN_LEVEL, 0));
        assert_eq!(bottom.inc(), Level::new(MIN_LEVEL, 0));
        assert_eq!(Level::from_int(-7), Level::new(MIN_LEVEL, 0));
        assert_eq!(Level::from_int(3), Level::new(3, 0));
    }

    #[test]
    fn saturation() {
        let mut l = Level::from_int(SAT_MAX as i32 - 1);
        l = l.inc();
        assert_eq!(l.value(), SAT_MAX as i32);
        l = l.inc();
        assert_eq!(l.value(), SAT_MAX as i32);
        assert_eq!(Level::from_int(1000).value(), SAT_MAX as i32);

        assert_eq!(sat_dec(SAT_MIN), SAT_MIN);
        assert_eq!(sat_inc(SAT_MAX), SAT_MAX);
    }

    #[test]
    fn copy_raises_suffix_only() {
        let l = Level::new(-1, -1);
        assert_eq!(l.copy(), Level::new(-1, 0));

        let l = Level::new(2, 1);
        assert_eq!(l.copy(), l);
    }

    #[test]
    fn min_is_componentwise() {
        let a = Level::new(1, -1);
        let b = Level::new(-1, 0);
        assert_eq!(a.min(b), Level::new(-1, -1));
        assert_eq!(a.min(b), b.min(a));
        assert_eq!(a.min(a), a);
    }

    #[test]
    fn leaks() {
        assert!(Level::ZERO.leaks(0, 1));
        assert!(Level::ZERO.leaks(-1, 1));
        assert!(!Level::ZERO.leaks(1, 1));
        assert!(!Level::new(1, 0).leaks(-1, 1));
        assert!(!Level::new(0, 1).leaks(-1, 1));
        assert!(Level::new(-1, -1).leaks(0, 2));
    }

    #[test]
    fn copied_deref_hides_source() {
        // sink = &T{f: *p}: the literal, the copied field, then `p`.
        let lit = Level::ZERO.dec();
        let field = lit.copy();
        let p = field.inc();
        assert_eq!(p, Level::new(0, 1));
        assert_eq!(p.guaranteed_dereference(), 1);
        assert!(!p.leaks(-1, 1));

        // sink = &T{f: p}
        let p = Level::ZERO.dec().copy();
        assert!(p.leaks(-1, 1));
    }
}
