use std::collections::{HashMap, VecDeque};

use serde_json::Value;

use crate::error::{Error, Result};
use crate::stream::{ObjectReader, ValueKind};

// -----------------------------------------------------------------------------
// JsonValueReader

enum Scope {
    Array(VecDeque<Value>),
    Object(VecDeque<(String, Value)>),
}

struct Entry {
    name: Option<String>,
    value: Value,
}

/// An [`ObjectReader`] walking an owned [`serde_json::Value`] document.
///
/// The cursor starts on the root value; scopes are entered with
/// `begin_object` / `begin_array` and advanced with `next`.
pub struct JsonValueReader {
    scopes: Vec<Scope>,
    current: Option<Entry>,
    metadata: HashMap<String, String>,
    metadata_read: bool,
}

impl JsonValueReader {
    pub fn new(root: Value) -> Self {
        Self {
            scopes: Vec::new(),
            current: Some(Entry {
                name: None,
                value: root,
            }),
            metadata: HashMap::new(),
            metadata_read: false,
        }
    }

    fn current(&self) -> Result<&Entry> {
        self.current
            .as_ref()
            .ok_or_else(|| Error::stream("reader cursor is not positioned on a value"))
    }

    fn current_value(&self) -> Result<&Value> {
        self.current().map(|entry| &entry.value)
    }
}

fn kind_of(value: &Value) -> ValueKind {
    match value {
        Value::Null => ValueKind::Null,
        Value::Bool(_) => ValueKind::Boolean,
        Value::Number(n) if n.is_i64() || n.is_u64() => ValueKind::Integer,
        Value::Number(_) => ValueKind::Double,
        Value::String(_) => ValueKind::String,
        Value::Array(_) => ValueKind::Array,
        Value::Object(_) => ValueKind::Object,
    }
}

fn non_finite_value(text: &str) -> Option<f64> {
    match text {
        "NaN" => Some(f64::NAN),
        "Infinity" => Some(f64::INFINITY),
        "-Infinity" => Some(f64::NEG_INFINITY),
        _ => None,
    }
}

impl ObjectReader for JsonValueReader {
    fn value_kind(&self) -> Result<ValueKind> {
        // After next_object_metadata the object is already entered but not
        // yet consumed; downstream layers still see an object value.
        if self.metadata_read {
            return Ok(ValueKind::Object);
        }
        self.current_value().map(kind_of)
    }

    fn has_next(&self) -> bool {
        match self.scopes.last() {
            Some(Scope::Array(items)) => !items.is_empty(),
            Some(Scope::Object(members)) => !members.is_empty(),
            None => false,
        }
    }

    fn next(&mut self) -> Result<ValueKind> {
        self.metadata_read = false;
        let entry = match self.scopes.last_mut() {
            Some(Scope::Array(items)) => items.pop_front().map(|value| Entry {
                name: None,
                value,
            }),
            Some(Scope::Object(members)) => members.pop_front().map(|(name, value)| Entry {
                name: Some(name),
                value,
            }),
            None => None,
        };
        match entry {
            Some(entry) => {
                let kind = kind_of(&entry.value);
                self.current = Some(entry);
                Ok(kind)
            }
            None => Err(Error::stream("no more members in the current scope")),
        }
    }

    fn begin_object(&mut self) -> Result<()> {
        // An earlier next_object_metadata already entered this object.
        if self.metadata_read {
            return Ok(());
        }
        let entry = self
            .current
            .take()
            .ok_or_else(|| Error::stream("begin_object with no value under the cursor"))?;
        let Value::Object(map) = entry.value else {
            self.current = Some(entry);
            return Err(Error::stream("begin_object on a non-object value"));
        };

        let mut members: VecDeque<(String, Value)> = map.into_iter().collect();
        self.metadata.clear();
        while let Some((name, value)) = members.front() {
            let Some(key) = name.strip_prefix('@') else {
                break;
            };
            let Value::String(text) = value else {
                return Err(Error::stream(format!(
                    "metadata member `{name}` is not a string"
                )));
            };
            self.metadata.insert(key.to_owned(), text.clone());
            members.pop_front();
        }
        self.scopes.push(Scope::Object(members));
        Ok(())
    }

    fn end_object(&mut self) -> Result<()> {
        match self.scopes.pop() {
            Some(Scope::Object(_)) => {
                self.metadata.clear();
                self.metadata_read = false;
                self.current = None;
                Ok(())
            }
            other => {
                if let Some(scope) = other {
                    self.scopes.push(scope);
                }
                Err(Error::stream("end_object outside of an object scope"))
            }
        }
    }

    fn begin_array(&mut self) -> Result<()> {
        let entry = self
            .current
            .take()
            .ok_or_else(|| Error::stream("begin_array with no value under the cursor"))?;
        let Value::Array(items) = entry.value else {
            self.current = Some(entry);
            return Err(Error::stream("begin_array on a non-array value"));
        };
        self.scopes.push(Scope::Array(items.into_iter().collect()));
        Ok(())
    }

    fn end_array(&mut self) -> Result<()> {
        match self.scopes.pop() {
            Some(Scope::Array(_)) => {
                self.current = None;
                Ok(())
            }
            other => {
                if let Some(scope) = other {
                    self.scopes.push(scope);
                }
                Err(Error::stream("end_array outside of an array scope"))
            }
        }
    }

    fn name(&self) -> Result<&str> {
        self.current()?
            .name
            .as_deref()
            .ok_or_else(|| Error::stream("current value has no member name"))
    }

    fn value_as_string(&self) -> Result<String> {
        match self.current_value()? {
            Value::String(s) => Ok(s.clone()),
            Value::Number(n) => Ok(n.to_string()),
            Value::Bool(b) => Ok(b.to_string()),
            other => Err(Error::value(format!(
                "cannot read `{other}` as a string"
            ))),
        }
    }

    fn value_as_bool(&self) -> Result<bool> {
        match self.current_value()? {
            Value::Bool(b) => Ok(*b),
            Value::String(s) if s == "true" => Ok(true),
            Value::String(s) if s == "false" => Ok(false),
            other => Err(Error::value(format!("cannot read `{other}` as a bool"))),
        }
    }

    fn value_as_i32(&self) -> Result<i32> {
        let wide = self.value_as_i64()?;
        i32::try_from(wide)
            .map_err(|_| Error::value(format!("number {wide} does not fit in an int")))
    }

    fn value_as_i64(&self) -> Result<i64> {
        match self.current_value()? {
            Value::Number(n) => {
                if let Some(v) = n.as_i64() {
                    Ok(v)
                } else if let Some(v) = n.as_f64() {
                    Ok(v as i64)
                } else {
                    Err(Error::value(format!("number {n} does not fit in a long")))
                }
            }
            Value::String(s) => s
                .parse()
                .map_err(|_| Error::value(format!("cannot read `{s}` as a long"))),
            other => Err(Error::value(format!("cannot read `{other}` as a long"))),
        }
    }

    fn value_as_f64(&self) -> Result<f64> {
        match self.current_value()? {
            Value::Number(n) => n
                .as_f64()
                .ok_or_else(|| Error::value(format!("number {n} does not fit in a double"))),
            Value::String(s) => non_finite_value(s)
                .map(Ok)
                .unwrap_or_else(|| {
                    s.parse()
                        .map_err(|_| Error::value(format!("cannot read `{s}` as a double")))
                }),
            other => Err(Error::value(format!("cannot read `{other}` as a double"))),
        }
    }

    fn value_raw(&self) -> Result<&Value> {
        self.current_value()
    }

    fn skip_value(&mut self) -> Result<()> {
        // The tree reader holds the whole value under the cursor, so there
        // is nothing incremental to discard.
        self.current()?;
        Ok(())
    }

    fn next_object_metadata(&mut self) -> Result<()> {
        if !self.metadata_read {
            self.begin_object()?;
            self.metadata_read = true;
        }
        Ok(())
    }

    fn metadata(&self, name: &str) -> Option<&str> {
        self.metadata.get(name).map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn walks_members_in_document_order() {
        let mut r = JsonValueReader::new(json!({"a": 1, "b": [true, null]}));
        r.begin_object().unwrap();

        assert_eq!(r.next().unwrap(), ValueKind::Integer);
        assert_eq!(r.name().unwrap(), "a");
        assert_eq!(r.value_as_i32().unwrap(), 1);

        assert_eq!(r.next().unwrap(), ValueKind::Array);
        assert_eq!(r.name().unwrap(), "b");
        r.begin_array().unwrap();
        assert_eq!(r.next().unwrap(), ValueKind::Boolean);
        assert!(r.value_as_bool().unwrap());
        assert_eq!(r.next().unwrap(), ValueKind::Null);
        assert!(!r.has_next());
        r.end_array().unwrap();

        r.end_object().unwrap();
    }

    #[test]
    fn leading_metadata_is_consumed_on_entry() {
        let mut r = JsonValueReader::new(json!({
            "@class": "Person",
            "@view": "public",
            "name": "ada"
        }));
        r.begin_object().unwrap();
        assert_eq!(r.metadata("class"), Some("Person"));
        assert_eq!(r.metadata("view"), Some("public"));

        assert_eq!(r.next().unwrap(), ValueKind::String);
        assert_eq!(r.name().unwrap(), "name");
        r.end_object().unwrap();
        assert_eq!(r.metadata("class"), None);
    }

    #[test]
    fn metadata_after_a_regular_member_is_an_ordinary_member() {
        let mut r = JsonValueReader::new(json!({"name": "ada", "@class": "Person"}));
        r.begin_object().unwrap();
        assert_eq!(r.metadata("class"), None);

        r.next().unwrap();
        assert_eq!(r.name().unwrap(), "name");
        r.next().unwrap();
        assert_eq!(r.name().unwrap(), "@class");
    }

    #[test]
    fn next_object_metadata_leaves_the_object_reenterable() {
        let mut r = JsonValueReader::new(json!({"@class": "Person", "name": "ada"}));
        r.next_object_metadata().unwrap();
        assert_eq!(r.metadata("class"), Some("Person"));

        // Several pipeline layers may each peek at the metadata.
        r.next_object_metadata().unwrap();
        r.begin_object().unwrap();

        assert_eq!(r.next().unwrap(), ValueKind::String);
        assert_eq!(r.name().unwrap(), "name");
        r.end_object().unwrap();
    }

    #[test]
    fn int_overflow_is_an_error() {
        let r = JsonValueReader::new(json!(4_000_000_000i64));
        assert!(r.value_as_i32().is_err());
        assert_eq!(r.value_as_i64().unwrap(), 4_000_000_000);
    }

    #[test]
    fn numeric_strings_parse() {
        let r = JsonValueReader::new(json!("42"));
        assert_eq!(r.value_as_i32().unwrap(), 42);
        assert_eq!(r.value_as_f64().unwrap(), 42.0);

        let r = JsonValueReader::new(json!("NaN"));
        assert!(r.value_as_f64().unwrap().is_nan());
    }
}
