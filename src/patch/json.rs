use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::PatchError;

/// The `add`/`remove`/`replace` subset of RFC 6902.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum JsonPatchOp {
    Add { path: String, value: Value },
    Remove { path: String },
    Replace { path: String, value: Value },
}

impl JsonPatchOp {
    pub fn path(&self) -> &str {
        match self {
            Self::Add { path, .. } | Self::Remove { path } | Self::Replace { path, .. } => path,
        }
    }

    /// Parse an untyped operation list, rejecting unknown op names and
    /// malformed pointers before anything is applied.
    pub fn parse_all(ops: &Value) -> Result<Vec<Self>, PatchError> {
        let ops: Vec<Self> = serde_json::from_value(ops.clone())
            .map_err(|e| PatchError::MalformedOperation(e.to_string()))?;
        for op in &ops {
            parse_pointer(op.path())?;
        }
        Ok(ops)
    }
}

pub fn apply(old: &str, ops: &[JsonPatchOp]) -> Result<String, PatchError> {
    let pointers = ops
        .iter()
        .map(|op| parse_pointer(op.path()))
        .collect::<Result<Vec<_>, _>>()?;

    let mut doc: Value =
        serde_json::from_str(old).map_err(|e| PatchError::InvalidDocument(e.to_string()))?;

    for (op, tokens) in ops.iter().zip(&pointers) {
        match op {
            JsonPatchOp::Add { path, value } => add(&mut doc, path, tokens, value.clone())?,
            JsonPatchOp::Remove { path } => remove(&mut doc, path, tokens)?,
            JsonPatchOp::Replace { path, value } => {
                let target = resolve_mut(&mut doc, tokens)
                    .ok_or_else(|| PatchError::PathNotFound(path.clone()))?;
                *target = value.clone();
            }
        }
    }

    let mut out = serde_json::to_string_pretty(&doc)
        .map_err(|e| PatchError::InvalidDocument(e.to_string()))?;
    out.push('\n');
    Ok(out)
}

/// Split an RFC 6901 pointer into unescaped reference tokens.
pub fn parse_pointer(pointer: &str) -> Result<Vec<String>, PatchError> {
    if pointer.is_empty() {
        return Ok(vec![]);
    }
    let Some(rest) = pointer.strip_prefix('/') else {
        return Err(PatchError::InvalidPointer(pointer.to_string()));
    };
    rest.split('/')
        .map(|token| unescape(token).ok_or_else(|| PatchError::InvalidPointer(pointer.into())))
        .collect()
}

fn unescape(token: &str) -> Option<String> {
    let mut out = String::with_capacity(token.len());
    let mut chars = token.chars();
    while let Some(c) = chars.next() {
        if c == '~' {
            match chars.next() {
                Some('0') => out.push('~'),
                Some('1') => out.push('/'),
                _ => return None,
            }
        } else {
            out.push(c);
        }
    }
    Some(out)
}

fn resolve_mut<'a>(doc: &'a mut Value, tokens: &[String]) -> Option<&'a mut Value> {
    tokens.iter().try_fold(doc, |current, token| match current {
        Value::Object(map) => map.get_mut(token),
        Value::Array(items) => array_index(token).and_then(|i| items.get_mut(i)),
        _ => None,
    })
}

fn array_index(token: &str) -> Option<usize> {
    if token.is_empty() || (token.len() > 1 && token.starts_with('0')) {
        return None;
    }
    token.parse().ok()
}

fn add(doc: &mut Value, path: &str, tokens: &[String], value: Value) -> Result<(), PatchError> {
    let Some((last, parent_tokens)) = tokens.split_last() else {
        *doc = value;
        return Ok(());
    };
    let parent =
        resolve_mut(doc, parent_tokens).ok_or_else(|| PatchError::PathNotFound(path.into()))?;
    match parent {
        Value::Object(map) => {
            map.insert(last.clone(), value);
            Ok(())
        }
        Value::Array(items) if last == "-" => {
            items.push(value);
            Ok(())
        }
        Value::Array(items) => {
            let index = array_index(last).ok_or_else(|| PatchError::InvalidPointer(path.into()))?;
            if index > items.len() {
                return Err(PatchError::IndexOutOfBounds(path.into()));
            }
            items.insert(index, value);
            Ok(())
        }
        _ => Err(PatchError::PathNotFound(path.into())),
    }
}

fn remove(doc: &mut Value, path: &str, tokens: &[String]) -> Result<(), PatchError> {
    let Some((last, parent_tokens)) = tokens.split_last() else {
        return Err(PatchError::InvalidPointer(path.into()));
    };
    let parent =
        resolve_mut(doc, parent_tokens).ok_or_else(|| PatchError::PathNotFound(path.into()))?;
    match parent {
        Value::Object(map) => map
            .shift_remove(last)
            .map(|_| ())
            .ok_or_else(|| PatchError::PathNotFound(path.into())),
        Value::Array(items) => match array_index(last) {
            Some(i) if i < items.len() => {
                items.remove(i);
                Ok(())
            }
            _ => Err(PatchError::IndexOutOfBounds(path.into())),
        },
        _ => Err(PatchError::PathNotFound(path.into())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn ops(v: Value) -> Vec<JsonPatchOp> {
        JsonPatchOp::parse_all(&v).unwrap()
    }

    fn as_value(s: &str) -> Value {
        serde_json::from_str(s).unwrap()
    }

    #[test]
    fn replace_is_idempotent() {
        let doc = r#"{"name":"test","value":42}"#;
        let patch = ops(json!([{"op": "replace", "path": "/value", "value": 999}]));

        let once = apply(doc, &patch).unwrap();
        assert_eq!(as_value(&once), json!({"name": "test", "value": 999}));
        let twice = apply(&once, &patch).unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn add_into_objects_and_arrays() {
        let doc = r#"{"list":[1,3],"meta":{}}"#;
        let patch = ops(json!([
            {"op": "add", "path": "/list/1", "value": 2},
            {"op": "add", "path": "/list/-", "value": 4},
            {"op": "add", "path": "/meta/owner", "value": "a"},
            {"op": "add", "path": "/meta/a~1b", "value": true}
        ]));
        let out = as_value(&apply(doc, &patch).unwrap());
        assert_eq!(
            out,
            json!({"list": [1, 2, 3, 4], "meta": {"owner": "a", "a/b": true}})
        );
    }

    #[test]
    fn remove_requires_existing_target() {
        let doc = r#"{"a":1,"b":[1]}"#;
        let out = apply(doc, &ops(json!([{"op": "remove", "path": "/a"}]))).unwrap();
        assert_eq!(as_value(&out), json!({"b": [1]}));

        let err = apply(doc, &ops(json!([{"op": "remove", "path": "/zzz"}]))).unwrap_err();
        assert_eq!(err, PatchError::PathNotFound("/zzz".into()));
        let err = apply(doc, &ops(json!([{"op": "remove", "path": "/b/5"}]))).unwrap_err();
        assert_eq!(err, PatchError::IndexOutOfBounds("/b/5".into()));
    }

    #[test]
    fn replace_root_document() {
        let out = apply("[1]", &ops(json!([{"op": "replace", "path": "", "value": {"x": 1}}])));
        assert_eq!(as_value(&out.unwrap()), json!({"x": 1}));
    }

    #[test]
    fn unknown_ops_and_bad_pointers_are_rejected_up_front() {
        let err = JsonPatchOp::parse_all(&json!([{"op": "move", "from": "/a", "path": "/b"}]))
            .unwrap_err();
        assert!(matches!(err, PatchError::MalformedOperation(_)));

        let err =
            JsonPatchOp::parse_all(&json!([{"op": "remove", "path": "no-slash"}])).unwrap_err();
        assert_eq!(err, PatchError::InvalidPointer("no-slash".into()));

        let err = JsonPatchOp::parse_all(&json!([{"op": "remove", "path": "/a~2"}])).unwrap_err();
        assert!(matches!(err, PatchError::InvalidPointer(_)));
    }

    #[test]
    fn failure_midway_produces_no_output() {
        let doc = r#"{"a":1}"#;
        let patch = ops(json!([
            {"op": "replace", "path": "/a", "value": 2},
            {"op": "replace", "path": "/missing", "value": 3}
        ]));
        assert!(apply(doc, &patch).is_err());
    }

    #[test]
    fn invalid_document_is_reported() {
        let patch = ops(json!([{"op": "remove", "path": "/a"}]));
        assert!(matches!(
            apply("not json", &patch),
            Err(PatchError::InvalidDocument(_))
        ));
    }

    #[test]
    fn key_order_is_preserved() {
        let doc = r#"{"zeta":1,"alpha":2}"#;
        let out = apply(doc, &ops(json!([{"op": "replace", "path": "/zeta", "value": 3}]))).unwrap();
        assert!(out.find("zeta").unwrap() < out.find("alpha").unwrap());
    }
}
