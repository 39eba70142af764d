//! RFC 6902 JSON Patch operations and their application.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::value_type_name;
use crate::pointer::array_index;
use crate::{Pointer, SyncError};

/// A single RFC 6902 operation in wire form.
///
/// Pointers are kept as strings and parsed at apply time, so a syntactically
/// broken pointer surfaces as a `SyncError` rather than a deserialization
/// failure of the whole delta.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "lowercase")]
pub enum PatchOp {
    /// Insert or set a value at the target location.
    Add { path: String, value: Value },
    /// Remove the value at the target location.
    Remove { path: String },
    /// Replace an existing value at the target location.
    Replace { path: String, value: Value },
    /// Move the value at `from` to the target location.
    Move { from: String, path: String },
    /// Copy the value at `from` to the target location.
    Copy { from: String, path: String },
    /// Assert that the target location holds exactly `value`.
    Test { path: String, value: Value },
}

/// Apply an ordered sequence of operations to a document (pure function).
///
/// All operations are applied against a working copy; the first failure
/// aborts and `doc` is never observed half-patched.
pub fn apply_patch(doc: &Value, ops: &[PatchOp]) -> Result<Value, SyncError> {
    let mut result = doc.clone();
    for op in ops {
        apply_op(&mut result, op)?;
    }
    Ok(result)
}

fn apply_op(doc: &mut Value, op: &PatchOp) -> Result<(), SyncError> {
    match op {
        PatchOp::Add { path, value } => {
            let path = Pointer::parse(path)?;
            add_at(doc, &path, value.clone())
        }
        PatchOp::Remove { path } => {
            let path = Pointer::parse(path)?;
            take_at(doc, &path).map(|_| ())
        }
        PatchOp::Replace { path, value } => {
            let path = Pointer::parse(path)?;
            let target = resolve_mut(doc, &path)?;
            *target = value.clone();
            Ok(())
        }
        PatchOp::Move { from, path } => {
            let from = Pointer::parse(from)?;
            let path = Pointer::parse(path)?;
            if path.tokens().starts_with(from.tokens()) && path.tokens().len() > from.tokens().len()
            {
                return Err(SyncError::invalid_operation(format!(
                    "cannot move {from} into its own child {path}"
                )));
            }
            let value = take_at(doc, &from)?;
            add_at(doc, &path, value)
        }
        PatchOp::Copy { from, path } => {
            let from = Pointer::parse(from)?;
            let path = Pointer::parse(path)?;
            let value = resolve(doc, &from)?.clone();
            add_at(doc, &path, value)
        }
        PatchOp::Test { path, value } => {
            let path = Pointer::parse(path)?;
            if resolve(doc, &path)? == value {
                Ok(())
            } else {
                Err(SyncError::TestFailed { path })
            }
        }
    }
}

/// Resolve a pointer to a shared reference.
pub fn resolve<'a>(doc: &'a Value, path: &Pointer) -> Result<&'a Value, SyncError> {
    let mut current = doc;
    for token in path.tokens() {
        current = match current {
            Value::Object(map) => map.get(token).ok_or_else(|| SyncError::PathNotFound {
                path: path.clone(),
            })?,
            Value::Array(arr) => {
                let index = array_index(token, path)?;
                arr.get(index).ok_or_else(|| SyncError::IndexOutOfBounds {
                    path: path.clone(),
                    index,
                    len: arr.len(),
                })?
            }
            other => {
                return Err(SyncError::TypeMismatch {
                    path: path.clone(),
                    expected: "object or array",
                    found: value_type_name(other),
                })
            }
        };
    }
    Ok(current)
}

fn resolve_mut<'a>(doc: &'a mut Value, path: &Pointer) -> Result<&'a mut Value, SyncError> {
    let mut current = doc;
    for token in path.tokens() {
        current = match current {
            Value::Object(map) => map.get_mut(token).ok_or_else(|| SyncError::PathNotFound {
                path: path.clone(),
            })?,
            Value::Array(arr) => {
                let index = array_index(token, path)?;
                let len = arr.len();
                arr.get_mut(index)
                    .ok_or_else(|| SyncError::IndexOutOfBounds {
                        path: path.clone(),
                        index,
                        len,
                    })?
            }
            other => {
                return Err(SyncError::TypeMismatch {
                    path: path.clone(),
                    expected: "object or array",
                    found: value_type_name(other),
                })
            }
        };
    }
    Ok(current)
}

/// Navigate to the parent of the addressed location.
fn parent_mut<'a>(
    doc: &'a mut Value,
    parents: &[String],
    full_path: &Pointer,
) -> Result<&'a mut Value, SyncError> {
    let mut current = doc;
    for token in parents {
        current = match current {
            Value::Object(map) => map.get_mut(token).ok_or_else(|| SyncError::PathNotFound {
                path: full_path.clone(),
            })?,
            Value::Array(arr) => {
                let index = array_index(token, full_path)?;
                let len = arr.len();
                arr.get_mut(index)
                    .ok_or_else(|| SyncError::IndexOutOfBounds {
                        path: full_path.clone(),
                        index,
                        len,
                    })?
            }
            other => {
                return Err(SyncError::TypeMismatch {
                    path: full_path.clone(),
                    expected: "object or array",
                    found: value_type_name(other),
                })
            }
        };
    }
    Ok(current)
}

fn add_at(doc: &mut Value, path: &Pointer, value: Value) -> Result<(), SyncError> {
    let Some((parents, last)) = path.split_last() else {
        *doc = value;
        return Ok(());
    };
    let parent = parent_mut(doc, parents, path)?;
    match parent {
        Value::Object(map) => {
            map.insert(last.to_string(), value);
            Ok(())
        }
        Value::Array(arr) => {
            if last == "-" {
                arr.push(value);
                return Ok(());
            }
            let index = array_index(last, path)?;
            // Insertion at len is an append, anything past that is an error.
            if index > arr.len() {
                return Err(SyncError::IndexOutOfBounds {
                    path: path.clone(),
                    index,
                    len: arr.len(),
                });
            }
            arr.insert(index, value);
            Ok(())
        }
        other => Err(SyncError::TypeMismatch {
            path: path.clone(),
            expected: "object or array",
            found: value_type_name(other),
        }),
    }
}

fn take_at(doc: &mut Value, path: &Pointer) -> Result<Value, SyncError> {
    let Some((parents, last)) = path.split_last() else {
        return Err(SyncError::invalid_operation(
            "cannot remove the document root",
        ));
    };
    let parent = parent_mut(doc, parents, path)?;
    match parent {
        Value::Object(map) => map.remove(last).ok_or_else(|| SyncError::PathNotFound {
            path: path.clone(),
        }),
        Value::Array(arr) => {
            let index = array_index(last, path)?;
            if index >= arr.len() {
                return Err(SyncError::IndexOutOfBounds {
                    path: path.clone(),
                    index,
                    len: arr.len(),
                });
            }
            Ok(arr.remove(index))
        }
        other => Err(SyncError::TypeMismatch {
            path: path.clone(),
            expected: "object or array",
            found: value_type_name(other),
        }),
    }
}
