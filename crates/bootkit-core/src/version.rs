//! Dotted numeric version comparison

use std::cmp::Ordering;

/// Compare two dot-separated versions segment by segment
///
/// Missing trailing segments count as 0, so "2.1" equals "2.1.0". A segment
/// that is not a number also counts as 0.
///
/// ```rust
/// use bootkit_core::version::compare_versions;
/// use std::cmp::Ordering;
///
/// assert_eq!(compare_versions("1.9", "1.10"), Ordering::Less);
/// assert_eq!(compare_versions("2.1", "2.1.0"), Ordering::Equal);
/// ```
pub fn compare_versions(left: &str, right: &str) -> Ordering {
    let left = lenient_segments(left);
    let right = lenient_segments(right);
    let len = left.len().max(right.len());

    for i in 0..len {
        let a = left.get(i).copied().unwrap_or(0);
        let b = right.get(i).copied().unwrap_or(0);
        match a.cmp(&b) {
            Ordering::Equal => continue,
            other => return other,
        }
    }
    Ordering::Equal
}

/// Whether `installed` satisfies a `minimum` version requirement
pub fn is_at_least(installed: &str, minimum: &str) -> bool {
    compare_versions(installed, minimum) != Ordering::Less
}

fn lenient_segments(version: &str) -> Vec<u64> {
    version
        .trim()
        .split('.')
        .map(|segment| segment.trim().parse::<u64>().unwrap_or(0))
        .collect()
}
