//! Reference-name segmentation.
//!
//! Reference names such as `release/1.0` are shown as two directory levels,
//! `release` → `1.0`, although the repository keeps no such hierarchy. Each
//! directory level re-runs [`resolve`] with the prefix accumulated so far.
//!
//! A name that is both a leaf and a prefix of a longer name (`v1` and
//! `v1/beta`) always resolves as [`Resolution::ExactMatch`], so the longer name
//! cannot be reached through the mount.

use std::collections::BTreeSet;

/// Separator embedded in hierarchical reference names.
pub const REF_SEPARATOR: char = '/';

/// Outcome of matching a requested path against the reference namespace.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// A reference has exactly this name.
    ExactMatch,
    /// No exact match, but longer names continue below this one.
    ProperPrefix,
    NotFound,
}

/// Classify `requested` against a flat list of reference names.
pub fn resolve<I, S>(names: I, requested: &str) -> Resolution
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut has_prefix = false;
    for name in names {
        let name = name.as_ref();
        if name == requested {
            return Resolution::ExactMatch;
        }
        if !has_prefix && is_below(name, requested) {
            has_prefix = true;
        }
    }
    if has_prefix {
        Resolution::ProperPrefix
    } else {
        Resolution::NotFound
    }
}

/// Distinct next components of every name under `prefix`.
///
/// `prefix` is either empty (top level) or ends with [`REF_SEPARATOR`].
pub fn first_segments<I, S>(names: I, prefix: &str) -> BTreeSet<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    names
        .into_iter()
        .filter_map(|name| {
            let rest = name.as_ref().strip_prefix(prefix)?;
            let segment = rest.split(REF_SEPARATOR).next().unwrap_or(rest);
            (!segment.is_empty()).then(|| segment.to_string())
        })
        .collect()
}

/// Join an accumulated prefix and one path component into a candidate name.
pub fn join(prefix: &str, component: &str) -> String {
    let mut name = String::with_capacity(prefix.len() + component.len());
    name.push_str(prefix);
    name.push_str(component);
    name
}

/// Prefix handed to the segment node created below `name`.
pub fn child_prefix(name: &str) -> String {
    let mut prefix = String::with_capacity(name.len() + 1);
    prefix.push_str(name);
    prefix.push(REF_SEPARATOR);
    prefix
}

fn is_below(name: &str, requested: &str) -> bool {
    name.len() > requested.len() + 1
        && name.starts_with(requested)
        && name[requested.len()..].starts_with(REF_SEPARATOR)
}
