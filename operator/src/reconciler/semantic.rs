//! Semantic equality between desired and observed objects.
//!
//! Desired is compared as a subset of observed: anything the API server or
//! another controller adds is invisible unless we set it ourselves. JSON
//! pointers on the ignore list are removed from both sides first.

use serde_json::Value;

/// Always ignored, whatever the kind.
pub const DEFAULT_IGNORED: &[&str] = &[
    "/metadata/resourceVersion",
    "/metadata/uid",
    "/metadata/managedFields",
    "/metadata/creationTimestamp",
    "/metadata/generation",
    "/status",
];

/// Dropped from the write instead of copied back from the observed object.
pub const STRIP_ON_WRITE: &[&str] = &["/metadata/managedFields", "/status"];

pub fn is_subset(desired: &Value, observed: &Value) -> bool {
    match (desired, observed) {
        (Value::Null, _) => true,
        (Value::Object(want), Value::Object(have)) => {
            want.iter().all(|(key, value)| match have.get(key) {
                Some(other) => is_subset(value, other),
                None => is_empty(value),
            })
        }
        (Value::Array(want), Value::Array(have)) => {
            want.len() == have.len() && want.iter().zip(have).all(|(a, b)| is_subset(a, b))
        }
        (Value::Object(want), Value::Null) => want.values().all(is_empty),
        (Value::Array(want), Value::Null) => want.is_empty(),
        (a, b) => a == b,
    }
}

/// Empty collections and null count as unset; the server drops them.
fn is_empty(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Object(map) => map.values().all(is_empty),
        Value::Array(items) => items.is_empty(),
        _ => false,
    }
}

/// Desired matches observed once every ignored path is removed from both.
pub fn semantically_equal<'a>(
    desired: &Value,
    observed: &Value,
    ignored: impl IntoIterator<Item = &'a str>,
) -> bool {
    let mut desired = desired.clone();
    let mut observed = observed.clone();
    for path in ignored {
        remove_pointer(&mut desired, path);
        remove_pointer(&mut observed, path);
    }
    is_subset(&desired, &observed)
}

fn unescape(token: &str) -> String {
    token.replace("~1", "/").replace("~0", "~")
}

fn split_pointer(pointer: &str) -> Option<(String, Vec<String>)> {
    let mut tokens: Vec<String> = pointer.strip_prefix('/')?.split('/').map(unescape).collect();
    let last = tokens.pop()?;
    Some((last, tokens))
}

fn parent_mut<'v>(root: &'v mut Value, parents: &[String], create: bool) -> Option<&'v mut Value> {
    parents.iter().try_fold(root, |current, token| match current {
        Value::Object(map) => {
            if create && !map.contains_key(token) {
                map.insert(token.clone(), Value::Object(Default::default()));
            }
            map.get_mut(token)
        }
        Value::Array(items) => token.parse::<usize>().ok().and_then(move |i| items.get_mut(i)),
        _ => None,
    })
}

/// Removes the value at `pointer`; returns it when present.
pub fn remove_pointer(root: &mut Value, pointer: &str) -> Option<Value> {
    let (last, parents) = split_pointer(pointer)?;
    match parent_mut(root, &parents, false)? {
        Value::Object(map) => map.remove(&last),
        Value::Array(items) => {
            let index: usize = last.parse().ok()?;
            (index < items.len()).then(|| items.remove(index))
        }
        _ => None,
    }
}

/// Sets `value` at `pointer`, creating intermediate objects.
pub fn set_pointer(root: &mut Value, pointer: &str, value: Value) -> bool {
    let Some((last, parents)) = split_pointer(pointer) else {
        return false;
    };
    match parent_mut(root, &parents, true) {
        Some(Value::Object(map)) => {
            map.insert(last, value);
            true
        }
        Some(Value::Array(items)) => match last.parse::<usize>() {
            Ok(index) if index < items.len() => {
                items[index] = value;
                true
            }
            _ => false,
        },
        _ => false,
    }
}

/// For each ignored path, carry the observed value into the write so the
/// update never reverts fields owned elsewhere.
pub fn carry_ignored<'a>(
    desired: &mut Value,
    observed: &Value,
    ignored: impl IntoIterator<Item = &'a str>,
) {
    for path in ignored {
        if STRIP_ON_WRITE.contains(&path) {
            remove_pointer(desired, path);
            continue;
        }
        match observed.pointer(path) {
            Some(value) => {
                set_pointer(desired, path, value.clone());
            }
            None => {
                remove_pointer(desired, path);
            }
        }
    }
}
