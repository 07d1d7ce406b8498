// src/refine.rs

//! Target path refinement.
//!
//! Given a result row (arbitrarily nested maps/lists) and a dotted field
//! path, compute the concrete index-paths of matching values. The erasure
//! path uses this to construct precise in-place masks; the access path uses
//! it to pull reference values out of upstream rows.
//!
//! Traversal is depth-first with ascending list indices, so results are
//! order-stable. The return value is always a list of paths, possibly empty
//! or a singleton; callers branch on length, never on shape.

use serde_json::Value;

/// One step of a concrete path into nested row data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathSegment {
    Key(String),
    Index(usize),
}

impl PathSegment {
    pub fn key(s: impl Into<String>) -> Self {
        Self::Key(s.into())
    }
}

/// A concrete sequence of keys/indices identifying one value inside a row.
pub type MatchPath = Vec<PathSegment>;

/// Compute every concrete path in `row` matching the dotted field `path`.
///
/// - Lists encountered mid-path are explored element by element, appending
///   the numeric index to the emitted path.
/// - A list at the end of the path is exploded per element.
/// - With `only`, a terminal is emitted only if its value is contained in
///   `only`; a terminal that is itself an array matches if any of its
///   members is (bag containment), and the emitted path then points at the
///   whole array element.
pub fn refine(row: &Value, path: &[String], only: Option<&[Value]>) -> Vec<MatchPath> {
    let mut found = Vec::new();
    walk(row, path, &mut Vec::new(), only, &mut found);
    found
}

fn walk(
    value: &Value,
    remaining: &[String],
    prefix: &mut MatchPath,
    only: Option<&[Value]>,
    found: &mut Vec<MatchPath>,
) {
    match value {
        Value::Array(items) => {
            // A list anywhere on the path is explored in full.
            for (index, item) in items.iter().enumerate() {
                prefix.push(PathSegment::Index(index));
                walk(item, remaining, prefix, only, found);
                prefix.pop();
            }
        }
        Value::Object(map) => {
            let Some((segment, rest)) = remaining.split_first() else {
                return;
            };
            let Some(child) = map.get(segment) else {
                return;
            };

            prefix.push(PathSegment::Key(segment.clone()));
            if rest.is_empty() {
                emit_terminal(child, prefix, only, found);
            } else {
                walk(child, rest, prefix, only, found);
            }
            prefix.pop();
        }
        _ => {}
    }
}

fn emit_terminal(
    value: &Value,
    prefix: &mut MatchPath,
    only: Option<&[Value]>,
    found: &mut Vec<MatchPath>,
) {
    match value {
        Value::Array(items) => {
            for (index, item) in items.iter().enumerate() {
                if matches_only(item, only) {
                    prefix.push(PathSegment::Index(index));
                    found.push(prefix.clone());
                    prefix.pop();
                }
            }
        }
        other => {
            if matches_only(other, only) {
                found.push(prefix.clone());
            }
        }
    }
}

fn matches_only(value: &Value, only: Option<&[Value]>) -> bool {
    let Some(only) = only else {
        return true;
    };

    match value {
        // Array-typed terminal: bag containment.
        Value::Array(items) => items.iter().any(|item| only.contains(item)),
        other => only.contains(other),
    }
}

/// Read the value at a concrete path, if present.
pub fn value_at<'a>(row: &'a Value, path: &MatchPath) -> Option<&'a Value> {
    let mut current = row;
    for segment in path {
        current = match segment {
            PathSegment::Key(key) => current.get(key)?,
            PathSegment::Index(index) => current.get(index)?,
        };
    }
    Some(current)
}

/// Overwrite the value at a concrete path with `replacement`.
///
/// Returns `true` if the path resolved and the write happened.
pub fn write_at(row: &mut Value, path: &MatchPath, replacement: Value) -> bool {
    let mut current = row;
    let Some((last, parents)) = path.split_last() else {
        return false;
    };

    for segment in parents {
        current = match segment {
            PathSegment::Key(key) => match current.get_mut(key) {
                Some(v) => v,
                None => return false,
            },
            PathSegment::Index(index) => match current.get_mut(index) {
                Some(v) => v,
                None => return false,
            },
        };
    }

    match last {
        PathSegment::Key(key) => match current.get_mut(key) {
            Some(slot) => {
                *slot = replacement;
                true
            }
            None => false,
        },
        PathSegment::Index(index) => match current.get_mut(index) {
            Some(slot) => {
                *slot = replacement;
                true
            }
            None => false,
        },
    }
}
