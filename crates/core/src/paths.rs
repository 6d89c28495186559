//! Small typed accessors for nested fields of schemaless documents.

use serde_json::Value;

/// Returns the value at the given path, if present.
pub fn get_nested<'a>(value: &'a Value, path: &[&str]) -> Option<&'a Value> {
    let mut cur = value;
    for key in path {
        cur = cur.get(key)?;
    }
    Some(cur)
}

/// Returns the string at the given path, if present.
pub fn get_nested_str<'a>(value: &'a Value, path: &[&str]) -> Option<&'a str> {
    get_nested(value, path).and_then(Value::as_str)
}

/// Sets the value at the given path, creating intermediate objects as
/// needed. Does nothing when an intermediate segment exists and is not an
/// object.
pub fn set_nested(value: &mut Value, path: &[&str], new: Value) {
    let Some((last, parents)) = path.split_last() else {
        return;
    };
    let mut cur = value;
    for key in parents {
        if !cur.is_object() {
            return;
        }
        cur = cur
            .as_object_mut()
            .unwrap()
            .entry(key.to_string())
            .or_insert_with(|| Value::Object(Default::default()));
    }
    if let Some(map) = cur.as_object_mut() {
        map.insert(last.to_string(), new);
    }
}

/// Removes the value at the given path, if present.
pub fn remove_nested(value: &mut Value, path: &[&str]) {
    let Some((last, parents)) = path.split_last() else {
        return;
    };
    let mut cur = value;
    for key in parents {
        match cur.get_mut(key) {
            Some(next) => cur = next,
            None => return,
        }
    }
    if let Some(map) = cur.as_object_mut() {
        map.remove(*last);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn gets_nested_values() {
        let v = json!({"spec": {"scaleTargetRef": {"kind": "Deployment"}}});
        assert_eq!(
            get_nested_str(&v, &["spec", "scaleTargetRef", "kind"]),
            Some("Deployment")
        );
        assert_eq!(get_nested(&v, &["spec", "missing"]), None);
    }

    #[test]
    fn sets_and_removes_nested_values() {
        let mut v = json!({"spec": {"replicas": 3}});
        set_nested(&mut v, &["metadata", "labels", "app"], json!("web"));
        assert_eq!(v["metadata"]["labels"]["app"], "web");

        remove_nested(&mut v, &["spec", "replicas"]);
        assert_eq!(v["spec"], json!({}));

        // removing a missing path is a no-op
        remove_nested(&mut v, &["spec", "template", "spec"]);
    }
}
