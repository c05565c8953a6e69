use std::cmp::Ordering;

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VersionError {
    #[error("Invalid version format: {input:?} has non-numeric segment {segment:?}")]
    InvalidFormat { input: String, segment: String },
}

fn segments(version: &str) -> Result<Vec<u64>, VersionError> {
    version
        .trim()
        .split('.')
        .map(|segment| {
            if segment.is_empty() || !segment.bytes().all(|b| b.is_ascii_digit()) {
                return Err(VersionError::InvalidFormat {
                    input: version.to_string(),
                    segment: segment.to_string(),
                });
            }
            segment.parse::<u64>().map_err(|_| VersionError::InvalidFormat {
                input: version.to_string(),
                segment: segment.to_string(),
            })
        })
        .collect()
}

/// Compare two dotted numeric versions, padding the shorter one with zero
/// segments.
///
/// # Errors
/// Returns [`VersionError::InvalidFormat`] when either side has a segment
/// that is not a plain unsigned integer.
pub fn compare(a: &str, b: &str) -> Result<Ordering, VersionError> {
    let left = segments(a)?;
    let right = segments(b)?;
    let len = left.len().max(right.len());
    let at = |parts: &[u64], i: usize| parts.get(i).copied().unwrap_or(0);

    Ok((0..len)
        .map(|i| at(&left, i).cmp(&at(&right, i)))
        .find(|ordering| ordering.is_ne())
        .unwrap_or(Ordering::Equal))
}

/// `true` when `candidate` is strictly newer than `current`.
///
/// # Errors
/// Propagates [`VersionError::InvalidFormat`] from [`compare`].
pub fn is_newer_version(candidate: &str, current: &str) -> Result<bool, VersionError> {
    Ok(compare(candidate, current)? == Ordering::Greater)
}

/// Highest valid version in `versions`; unparseable entries are skipped.
pub fn max_version<'a, I>(versions: I) -> Option<&'a str>
where
    I: IntoIterator<Item = &'a str>,
{
    versions
        .into_iter()
        .filter(|version| segments(version).is_ok())
        .fold(None, |best, version| match best {
            Some(best) if compare(version, best).ok() != Some(Ordering::Greater) => Some(best),
            _ => Some(version),
        })
}

/// `major.minor` prefix of a dotted version, e.g. `"3.12"` for `"3.12.4"`.
#[must_use]
pub fn release_series(version: &str) -> Option<String> {
    let mut parts = version.trim().split('.');
    let major = parts.next().filter(|p| !p.is_empty())?;
    let minor = parts.next().filter(|p| !p.is_empty())?;
    Some(format!("{major}.{minor}"))
}

/// Ordering used for registry release lists, which may contain
/// pre-release tags (`2.0.0rc1`). Segments compare by their leading number;
/// a segment with no suffix ranks above the same number with one.
#[must_use]
pub fn release_order(a: &str, b: &str) -> Ordering {
    fn key(segment: &str) -> (u64, bool, &str) {
        let digits = segment.bytes().take_while(u8::is_ascii_digit).count();
        let number = segment[..digits].parse().unwrap_or(0);
        let rest = &segment[digits..];
        (number, rest.is_empty(), rest)
    }

    let mut left = a.split('.');
    let mut right = b.split('.');
    loop {
        match (left.next(), right.next()) {
            (None, None) => return Ordering::Equal,
            (l, r) => {
                let ordering = key(l.unwrap_or("0")).cmp(&key(r.unwrap_or("0")));
                if ordering.is_ne() {
                    return ordering;
                }
            }
        }
    }
}
