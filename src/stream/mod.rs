//! The token-level JSON stream protocol converters are written against.
//!
//! Converters never touch a JSON document directly; they drive an
//! [`ObjectWriter`] on the way out and an [`ObjectReader`] on the way back.
//! The concrete implementations here are tree-backed
//! ([`JsonValueWriter`] / [`JsonValueReader`]), building on and walking
//! [`serde_json::Value`] documents.

// -----------------------------------------------------------------------------
// Modules

mod reader;
mod writer;

pub use reader::JsonValueReader;
pub use writer::JsonValueWriter;

use crate::error::Result;

// -----------------------------------------------------------------------------
// ValueKind

/// The kind of JSON value the reader cursor is positioned on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
    Object,
    Array,
    String,
    /// A number with no fractional part in its source form.
    Integer,
    /// A number carrying a fractional or exponent part.
    Double,
    Boolean,
    Null,
}

// -----------------------------------------------------------------------------
// ObjectWriter

/// Token-level JSON output.
///
/// Structural calls must nest correctly; inside an object every value must
/// be preceded by [`write_name`](ObjectWriter::write_name). Metadata staged
/// with [`begin_next_object_metadata`](ObjectWriter::begin_next_object_metadata)
/// is flushed as the *first* members of the next object begun, each name
/// prefixed with `@`.
pub trait ObjectWriter {
    fn begin_object(&mut self) -> Result<()>;
    fn end_object(&mut self) -> Result<()>;
    fn begin_array(&mut self) -> Result<()>;
    fn end_array(&mut self) -> Result<()>;

    /// Names the next member of the enclosing object.
    fn write_name(&mut self, name: &str) -> Result<()>;

    fn write_string(&mut self, value: &str) -> Result<()>;
    fn write_bool(&mut self, value: bool) -> Result<()>;
    fn write_i64(&mut self, value: i64) -> Result<()>;
    fn write_f64(&mut self, value: f64) -> Result<()>;
    fn write_null(&mut self) -> Result<()>;

    /// Splices a raw JSON document at the cursor.
    fn write_raw(&mut self, value: &serde_json::Value) -> Result<()>;

    /// Arms metadata staging for the next object begun on this writer.
    fn begin_next_object_metadata(&mut self) -> Result<()>;

    /// Stages one metadata pair; the name is written with a `@` prefix.
    /// Requires armed staging.
    fn write_metadata(&mut self, name: &str, value: &str) -> Result<()>;
}

// -----------------------------------------------------------------------------
// ObjectReader

/// Token-level JSON input.
///
/// The cursor starts positioned on the root value. Inside an object or
/// array, [`next`](ObjectReader::next) advances the cursor to the following
/// member and returns its kind.
///
/// Entering an object consumes its leading `@`-prefixed members into a
/// metadata table (keys stored without the prefix) so converters can consult
/// class metadata before binding. [`next_object_metadata`](ObjectReader::next_object_metadata)
/// performs the same entry but leaves the reader re-enterable: the following
/// [`begin_object`](ObjectReader::begin_object) is a no-op, letting several
/// layers of the pipeline each "enter" the same object once.
pub trait ObjectReader {
    /// The kind of the value under the cursor.
    fn value_kind(&self) -> Result<ValueKind>;

    /// Whether the current scope has another member.
    fn has_next(&self) -> bool;

    /// Advances to the next member of the current scope.
    fn next(&mut self) -> Result<ValueKind>;

    fn begin_object(&mut self) -> Result<()>;
    fn end_object(&mut self) -> Result<()>;
    fn begin_array(&mut self) -> Result<()>;
    fn end_array(&mut self) -> Result<()>;

    /// The member name of the value under the cursor.
    fn name(&self) -> Result<&str>;

    fn value_as_string(&self) -> Result<String>;
    fn value_as_bool(&self) -> Result<bool>;
    fn value_as_i32(&self) -> Result<i32>;
    fn value_as_i64(&self) -> Result<i64>;
    fn value_as_f64(&self) -> Result<f64>;

    /// A borrowed view of the raw JSON value under the cursor.
    fn value_raw(&self) -> Result<&serde_json::Value>;

    /// Discards the value under the cursor, including any nested structure.
    fn skip_value(&mut self) -> Result<()>;

    /// Enters the object under the cursor to expose its metadata, leaving it
    /// re-enterable by a subsequent [`begin_object`](ObjectReader::begin_object).
    fn next_object_metadata(&mut self) -> Result<()>;

    /// Looks up a metadata value consumed while entering the current object.
    fn metadata(&self, name: &str) -> Option<&str>;
}
