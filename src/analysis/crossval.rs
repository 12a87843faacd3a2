//! Cross-validation of independently derived candidate sets.

use std::fmt;

/// Outcome of reducing candidates to a single value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Survivor<T> {
    One(T),
    None,
    /// Number of distinct survivors
    Ambiguous(usize),
}

impl<T> Survivor<T> {
    pub fn ok(self) -> Option<T> {
        match self {
            Survivor::One(value) => Some(value),
            _ => None,
        }
    }
}

impl<T> fmt::Display for Survivor<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Survivor::One(_) => write!(f, "unique survivor"),
            Survivor::None => write!(f, "no survivor"),
            Survivor::Ambiguous(n) => write!(f, "{} survivors", n),
        }
    }
}

/// Reduce to the single distinct value, if there is one. Repeats of the same
/// value count once.
pub fn unique_survivor<T, I>(candidates: I) -> Survivor<T>
where
    T: PartialEq,
    I: IntoIterator<Item = T>,
{
    let mut distinct: Vec<T> = Vec::new();
    for candidate in candidates {
        if !distinct.contains(&candidate) {
            distinct.push(candidate);
        }
    }
    match distinct.len() {
        0 => Survivor::None,
        1 => distinct.pop().map_or(Survivor::None, Survivor::One),
        n => Survivor::Ambiguous(n),
    }
}

/// Values of `left` also present in `right`, in `left` order, without repeats.
pub fn intersect(left: &[u64], right: &[u64]) -> Vec<u64> {
    let mut out = Vec::new();
    for value in left {
        if right.contains(value) && !out.contains(value) {
            out.push(*value);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unique_survivor() {
        assert_eq!(unique_survivor([3u64, 3, 3]), Survivor::One(3));
        assert_eq!(unique_survivor(Vec::<u64>::new()), Survivor::None);
        assert_eq!(unique_survivor([1u64, 2, 1]), Survivor::Ambiguous(2));
        assert_eq!(unique_survivor([(1u64, 2u64)]).ok(), Some((1, 2)));
    }

    #[test]
    fn test_intersect_keeps_left_order() {
        assert_eq!(intersect(&[5, 1, 5, 9], &[9, 5]), vec![5, 9]);
        assert!(intersect(&[1, 2], &[3]).is_empty());
    }
}
