//! Total orders over version strings.
//!
//! The artifact store picks its "current" version with one of these. The
//! order is a trait object so deployments can match whatever versioning
//! scheme their build tooling produces.

use std::cmp::Ordering;

/// Total order used to rank version strings of one project.
pub trait VersionOrder: Send + Sync {
    /// Compare two version strings.
    fn compare(&self, a: &str, b: &str) -> Ordering;

    /// Sort versions ascending.
    fn sort(&self, versions: &mut [String]) {
        versions.sort_by(|a, b| self.compare(a, b));
    }

    /// Greatest version, if any.
    fn max<'a>(&self, versions: &'a [String]) -> Option<&'a String> {
        versions.iter().max_by(|a, b| self.compare(a, b))
    }
}

/// Plain byte-wise string order. `r10` sorts before `r2`.
#[derive(Debug, Clone, Copy, Default)]
pub struct Lexicographic;

impl VersionOrder for Lexicographic {
    fn compare(&self, a: &str, b: &str) -> Ordering {
        a.cmp(b)
    }
}

/// Numeric-aware order: runs of ASCII digits compare as numbers, everything
/// else byte-wise. `1.9` < `1.10`, `r2` < `r10`. Ties fall back to the
/// byte-wise order so that distinct strings never compare equal.
#[derive(Debug, Clone, Copy, Default)]
pub struct Natural;

fn chunks(s: &str) -> impl Iterator<Item = &str> {
    let bytes = s.as_bytes();
    let mut start = 0;
    std::iter::from_fn(move || {
        if start >= bytes.len() {
            return None;
        }
        let digit = bytes[start].is_ascii_digit();
        let end = bytes[start..]
            .iter()
            .position(|b| b.is_ascii_digit() != digit)
            .map_or(bytes.len(), |offset| start + offset);
        let chunk = &s[start..end];
        start = end;
        Some(chunk)
    })
}

fn compare_numeric(a: &str, b: &str) -> Ordering {
    let a = a.trim_start_matches('0');
    let b = b.trim_start_matches('0');
    a.len().cmp(&b.len()).then_with(|| a.cmp(b))
}

impl VersionOrder for Natural {
    fn compare(&self, a: &str, b: &str) -> Ordering {
        let mut left = chunks(a);
        let mut right = chunks(b);
        loop {
            match (left.next(), right.next()) {
                (None, None) => return a.cmp(b),
                (None, Some(_)) => return Ordering::Less,
                (Some(_), None) => return Ordering::Greater,
                (Some(x), Some(y)) => {
                    let x_num = x.as_bytes()[0].is_ascii_digit();
                    let y_num = y.as_bytes()[0].is_ascii_digit();
                    let ord = match (x_num, y_num) {
                        (true, true) => compare_numeric(x, y),
                        (true, false) => Ordering::Less,
                        (false, true) => Ordering::Greater,
                        (false, false) => x.cmp(y),
                    };
                    if ord != Ordering::Equal {
                        return ord;
                    }
                }
            }
        }
    }
}
