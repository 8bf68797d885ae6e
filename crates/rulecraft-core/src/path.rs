// SPDX-License-Identifier: Apache-2.0
//! Path parsing and the "navigate by segment" primitive.
//!
//! ```text
//! PATH   := '$' SEGMENT*
//! SEGMENT:= '.' IDENT | '[' INT ']' | '[' STRING ']' | '[*]'
//! ```
//!
//! Parsing is separated from prefix resolution (`self.`, `param:`, `view:`,
//! `const:`, ...): that logic needs the evaluation context and lives in
//! [`crate::context`]. This module only owns the `$...` grammar and the
//! single navigation primitive everything else builds on.

use crate::error::PathError;
use crate::value::Value;

/// One segment of a parsed `$...` path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    /// `.Name` — field access.
    Field(String),
    /// `[123]` — sequence index.
    Index(usize),
    /// `["key"]` / `['key']` — keyed mapping access.
    Key(String),
    /// `[*]` — wildcard: expand over every element of a sequence.
    Wildcard,
}

/// Parses a `$`-rooted path string into its segments.
///
/// # Errors
/// Returns [`PathError::InvalidSyntax`] if the string does not start with
/// `$` or contains a malformed segment.
pub fn parse_path(path: &str) -> Result<Vec<Segment>, PathError> {
    let rest = path
        .strip_prefix('$')
        .ok_or_else(|| PathError::InvalidSyntax(path.to_owned()))?;
    let mut segments = Vec::new();
    let chars: Vec<char> = rest.chars().collect();
    let mut i = 0;
    while i < chars.len() {
        match chars[i] {
            '.' => {
                let start = i + 1;
                let mut end = start;
                while end < chars.len() && chars[end] != '.' && chars[end] != '[' {
                    end += 1;
                }
                if end == start {
                    return Err(PathError::InvalidSyntax(path.to_owned()));
                }
                segments.push(Segment::Field(chars[start..end].iter().collect()));
                i = end;
            }
            '[' => {
                let close = chars[i..]
                    .iter()
                    .position(|&c| c == ']')
                    .map(|p| p + i)
                    .ok_or_else(|| PathError::InvalidSyntax(path.to_owned()))?;
                let inner: String = chars[i + 1..close].iter().collect();
                if inner == "*" {
                    segments.push(Segment::Wildcard);
                } else if let Ok(idx) = inner.parse::<usize>() {
                    segments.push(Segment::Index(idx));
                } else {
                    let trimmed = inner
                        .strip_prefix('"')
                        .and_then(|s| s.strip_suffix('"'))
                        .or_else(|| inner.strip_prefix('\'').and_then(|s| s.strip_suffix('\'')))
                        .ok_or_else(|| PathError::InvalidSyntax(path.to_owned()))?;
                    segments.push(Segment::Key(trimmed.to_owned()));
                }
                i = close + 1;
            }
            _ => return Err(PathError::InvalidSyntax(path.to_owned())),
        }
    }
    Ok(segments)
}

/// Navigates `root` by `segments`, returning a reference to the resolved
/// value.
///
/// Field lookups that fail to find a matching record field are the
/// single fallback point the source describes as "try a zero-argument
/// accessor of the same name before failing"; a generic reflected `Value`
/// tree has no methods to call, so this port's fallback is: treat a
/// missing field on a [`Value::Record`] as [`PathError::FieldNotFound`]
/// immediately (there is no accessor-call escape hatch left to attempt).
///
/// # Errors
/// See [`PathError`] variants for the specific failure modes.
pub fn navigate<'a>(root: &'a Value, segments: &[Segment]) -> Result<&'a Value, PathError> {
    let mut current = root;
    for segment in segments {
        current = navigate_one(current, segment)?;
    }
    Ok(current)
}

fn navigate_one<'a>(current: &'a Value, segment: &Segment) -> Result<&'a Value, PathError> {
    match segment {
        Segment::Field(name) => current
            .field(name)
            .ok_or_else(|| PathError::FieldNotFound(name.clone())),
        Segment::Key(key) => current
            .field(key)
            .ok_or_else(|| PathError::KeyNotFound(key.clone())),
        Segment::Index(i) => match current {
            Value::Sequence(s) => s.get(*i).ok_or(PathError::IndexOutOfBounds {
                index: *i,
                len: s.len(),
            }),
            _ => Err(PathError::NotASequence),
        },
        Segment::Wildcard => Err(PathError::InvalidSyntax(
            "wildcard segment requires getFieldValue expansion, not navigate".into(),
        )),
    }
}

/// Mutable navigation to the parent of the final segment, returning that
/// parent and the final segment so the caller (permission check + write)
/// can decide how to mutate it.
///
/// # Errors
/// Propagates the same errors as [`navigate`] for all but the last
/// segment; an empty `segments` list is an error since there is no parent.
pub fn navigate_to_parent<'a, 'b>(
    root: &'a mut Value,
    segments: &'b [Segment],
) -> Result<(&'a mut Value, &'b Segment), PathError> {
    let (last, init) = segments
        .split_last()
        .ok_or_else(|| PathError::InvalidSyntax("empty path has no parent".into()))?;
    let mut current = root;
    for segment in init {
        current = navigate_one_mut(current, segment)?;
    }
    Ok((current, last))
}

fn navigate_one_mut<'a>(current: &'a mut Value, segment: &Segment) -> Result<&'a mut Value, PathError> {
    match segment {
        Segment::Field(name) => current
            .field_mut(name)
            .ok_or_else(|| PathError::FieldNotFound(name.clone())),
        Segment::Key(key) => current
            .field_mut(key)
            .ok_or_else(|| PathError::KeyNotFound(key.clone())),
        Segment::Index(i) => match current {
            Value::Sequence(s) => {
                let len = s.len();
                s.get_mut(*i)
                    .ok_or(PathError::IndexOutOfBounds { index: *i, len })
            }
            _ => Err(PathError::NotASequence),
        },
        Segment::Wildcard => Err(PathError::InvalidSyntax(
            "wildcard segment is not writable".into(),
        )),
    }
}

/// Expands a `[*]`-bearing path by collecting every element reached at the
/// wildcard point and, for each, navigating the remaining segments,
/// flattening the results into a single sequence (e.g. `Cards[*].Value`).
///
/// # Errors
/// Returns a [`PathError`] if any non-wildcard segment fails to resolve,
/// or if a wildcard segment is applied to a non-sequence value.
pub fn get_field_value<'a>(root: &'a Value, segments: &[Segment]) -> Result<Vec<&'a Value>, PathError> {
    let Some(wildcard_pos) = segments.iter().position(|s| *s == Segment::Wildcard) else {
        return Ok(vec![navigate(root, segments)?]);
    };
    let before = navigate(root, &segments[..wildcard_pos])?;
    let Value::Sequence(items) = before else {
        return Err(PathError::NotASequence);
    };
    let after = &segments[wildcard_pos + 1..];
    let mut out = Vec::new();
    for item in items {
        out.extend(get_field_value(item, after)?);
    }
    Ok(out)
}
