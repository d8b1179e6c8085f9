use serde_json::{Map, Number, Value};

use crate::error::{Error, Result};
use crate::stream::ObjectWriter;

// -----------------------------------------------------------------------------
// JsonValueWriter

enum Frame {
    Array(Vec<Value>),
    Object {
        members: Map<String, Value>,
        pending_name: Option<String>,
    },
}

/// An [`ObjectWriter`] that assembles a [`serde_json::Value`] tree.
///
/// Member order is preserved, which is what keeps staged metadata at the
/// front of the objects it describes.
///
/// # Example
///
/// ```
/// use jsonbind::stream::{JsonValueWriter, ObjectWriter};
///
/// let mut w = JsonValueWriter::new();
/// w.begin_array().unwrap();
/// w.write_i64(1).unwrap();
/// w.write_i64(2).unwrap();
/// w.end_array().unwrap();
/// assert_eq!(w.finish().unwrap(), serde_json::json!([1, 2]));
/// ```
#[derive(Default)]
pub struct JsonValueWriter {
    frames: Vec<Frame>,
    root: Option<Value>,
    staged_metadata: Vec<(String, String)>,
    metadata_armed: bool,
}

impl JsonValueWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Consumes the writer and returns the completed document.
    pub fn finish(self) -> Result<Value> {
        if !self.frames.is_empty() {
            return Err(Error::stream("document finished with unclosed scopes"));
        }
        self.root
            .ok_or_else(|| Error::stream("document finished without a root value"))
    }

    fn push_value(&mut self, value: Value) -> Result<()> {
        match self.frames.last_mut() {
            None => {
                if self.root.is_some() {
                    return Err(Error::stream("a second root value was written"));
                }
                self.root = Some(value);
                Ok(())
            }
            Some(Frame::Array(items)) => {
                items.push(value);
                Ok(())
            }
            Some(Frame::Object {
                members,
                pending_name,
            }) => match pending_name.take() {
                Some(name) => {
                    members.insert(name, value);
                    Ok(())
                }
                None => Err(Error::stream("object member written without a name")),
            },
        }
    }
}

impl ObjectWriter for JsonValueWriter {
    fn begin_object(&mut self) -> Result<()> {
        let mut members = Map::new();
        if self.metadata_armed {
            for (name, value) in self.staged_metadata.drain(..) {
                members.insert(format!("@{name}"), Value::String(value));
            }
            self.metadata_armed = false;
        }
        self.frames.push(Frame::Object {
            members,
            pending_name: None,
        });
        Ok(())
    }

    fn end_object(&mut self) -> Result<()> {
        match self.frames.pop() {
            Some(Frame::Object {
                members,
                pending_name: None,
            }) => self.push_value(Value::Object(members)),
            Some(Frame::Object { .. }) => {
                Err(Error::stream("object closed with a dangling member name"))
            }
            _ => Err(Error::stream("end_object outside of an object scope")),
        }
    }

    fn begin_array(&mut self) -> Result<()> {
        self.frames.push(Frame::Array(Vec::new()));
        Ok(())
    }

    fn end_array(&mut self) -> Result<()> {
        match self.frames.pop() {
            Some(Frame::Array(items)) => self.push_value(Value::Array(items)),
            _ => Err(Error::stream("end_array outside of an array scope")),
        }
    }

    fn write_name(&mut self, name: &str) -> Result<()> {
        match self.frames.last_mut() {
            Some(Frame::Object { pending_name, .. }) => {
                if pending_name.replace(name.to_owned()).is_some() {
                    return Err(Error::stream("member name written twice"));
                }
                Ok(())
            }
            _ => Err(Error::stream("member name written outside of an object")),
        }
    }

    fn write_string(&mut self, value: &str) -> Result<()> {
        self.push_value(Value::String(value.to_owned()))
    }

    fn write_bool(&mut self, value: bool) -> Result<()> {
        self.push_value(Value::Bool(value))
    }

    fn write_i64(&mut self, value: i64) -> Result<()> {
        self.push_value(Value::Number(Number::from(value)))
    }

    fn write_f64(&mut self, value: f64) -> Result<()> {
        // A value tree has no representation for the non-finite literals, so
        // they travel as their text form; the reader maps them back.
        match Number::from_f64(value) {
            Some(number) => self.push_value(Value::Number(number)),
            None => self.push_value(Value::String(non_finite_text(value).to_owned())),
        }
    }

    fn write_null(&mut self) -> Result<()> {
        self.push_value(Value::Null)
    }

    fn write_raw(&mut self, value: &Value) -> Result<()> {
        self.push_value(value.clone())
    }

    fn begin_next_object_metadata(&mut self) -> Result<()> {
        self.metadata_armed = true;
        Ok(())
    }

    fn write_metadata(&mut self, name: &str, value: &str) -> Result<()> {
        if !self.metadata_armed {
            return Err(Error::stream("metadata written without staging armed"));
        }
        self.staged_metadata
            .push((name.to_owned(), value.to_owned()));
        Ok(())
    }
}

pub(crate) fn non_finite_text(value: f64) -> &'static str {
    if value.is_nan() {
        "NaN"
    } else if value > 0.0 {
        "Infinity"
    } else {
        "-Infinity"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn nested_document() {
        let mut w = JsonValueWriter::new();
        w.begin_object().unwrap();
        w.write_name("items").unwrap();
        w.begin_array().unwrap();
        w.write_i64(1).unwrap();
        w.write_string("two").unwrap();
        w.end_array().unwrap();
        w.write_name("ok").unwrap();
        w.write_bool(true).unwrap();
        w.end_object().unwrap();

        assert_eq!(
            w.finish().unwrap(),
            json!({"items": [1, "two"], "ok": true})
        );
    }

    #[test]
    fn staged_metadata_lands_first() {
        let mut w = JsonValueWriter::new();
        w.begin_next_object_metadata().unwrap();
        w.write_metadata("class", "Person").unwrap();
        w.begin_object().unwrap();
        w.write_name("name").unwrap();
        w.write_string("ada").unwrap();
        w.end_object().unwrap();

        let doc = w.finish().unwrap();
        let keys: Vec<&String> = doc.as_object().unwrap().keys().collect();
        assert_eq!(keys, ["@class", "name"]);
    }

    #[test]
    fn staging_applies_to_next_object_only() {
        let mut w = JsonValueWriter::new();
        w.begin_array().unwrap();
        w.begin_next_object_metadata().unwrap();
        w.write_metadata("class", "A").unwrap();
        w.begin_object().unwrap();
        w.end_object().unwrap();
        w.begin_object().unwrap();
        w.end_object().unwrap();
        w.end_array().unwrap();

        let doc = w.finish().unwrap();
        assert_eq!(doc, json!([{"@class": "A"}, {}]));
    }

    #[test]
    fn protocol_violations_error() {
        let mut w = JsonValueWriter::new();
        w.begin_object().unwrap();
        assert!(w.write_i64(1).is_err());

        let mut w = JsonValueWriter::new();
        assert!(w.write_metadata("class", "A").is_err());

        let mut w = JsonValueWriter::new();
        w.begin_array().unwrap();
        assert!(w.finish().is_err());
    }

    #[test]
    fn non_finite_doubles_travel_as_text() {
        let mut w = JsonValueWriter::new();
        w.begin_array().unwrap();
        w.write_f64(f64::NAN).unwrap();
        w.write_f64(f64::INFINITY).unwrap();
        w.write_f64(f64::NEG_INFINITY).unwrap();
        w.end_array().unwrap();

        assert_eq!(
            w.finish().unwrap(),
            json!(["NaN", "Infinity", "-Infinity"])
        );
    }
}
