//! Values, tuples and the ids that locate them on disk.

use std::fmt;
use std::sync::Arc;

use crate::errors::DbError;
use crate::schema::{FieldType, Schema, TEXT_CAPACITY};

/// Identifies one page of one table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PageId {
    pub table_id: u32,
    pub page_no: usize,
}

impl PageId {
    pub fn new(table_id: u32, page_no: usize) -> Self {
        Self { table_id, page_no }
    }
}

impl fmt::Display for PageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.table_id, self.page_no)
    }
}

/// The physical location of a tuple: a page plus a slot index within it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RecordId {
    pub page_id: PageId,
    pub slot: usize,
}

impl RecordId {
    pub fn new(page_id: PageId, slot: usize) -> Self {
        Self { page_id, slot }
    }
}

/// A single field value.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Value {
    Int(i32),
    Text(String),
}

impl Value {
    /// Builds a text value, truncating the payload to [`TEXT_CAPACITY`]
    /// bytes the way the on-disk format would.
    pub fn text(s: &str) -> Self {
        let mut end = s.len().min(TEXT_CAPACITY);
        // Back off to a char boundary so truncation cannot split a code point.
        while end > 0 && !s.is_char_boundary(end) {
            end -= 1;
        }
        Value::Text(s[..end].to_string())
    }

    pub fn field_type(&self) -> FieldType {
        match self {
            Value::Int(_) => FieldType::Int,
            Value::Text(_) => FieldType::Text,
        }
    }

    /// Appends the fixed-width little-endian encoding of this value.
    pub fn encode_into(&self, out: &mut Vec<u8>) {
        match self {
            Value::Int(v) => out.extend_from_slice(&v.to_le_bytes()),
            Value::Text(s) => {
                let payload = &s.as_bytes()[..s.len().min(TEXT_CAPACITY)];
                out.extend_from_slice(&(payload.len() as u32).to_le_bytes());
                out.extend_from_slice(payload);
                out.resize(out.len() + (TEXT_CAPACITY - payload.len()), 0);
            }
        }
    }

    /// Decodes one value of the given type from the start of `bytes`.
    pub fn decode(field_type: FieldType, bytes: &[u8]) -> Result<Value, DbError> {
        if bytes.len() < field_type.byte_len() {
            return Err(DbError::Storage(format!(
                "not enough bytes for a {field_type:?} value"
            )));
        }
        match field_type {
            FieldType::Int => {
                let raw: [u8; 4] = bytes[..4].try_into().expect("length checked");
                Ok(Value::Int(i32::from_le_bytes(raw)))
            }
            FieldType::Text => {
                let raw: [u8; 4] = bytes[..4].try_into().expect("length checked");
                let len = u32::from_le_bytes(raw) as usize;
                if len > TEXT_CAPACITY {
                    return Err(DbError::Storage(format!(
                        "text length prefix {len} exceeds capacity {TEXT_CAPACITY}"
                    )));
                }
                let payload = &bytes[4..4 + len];
                let s = std::str::from_utf8(payload)
                    .map_err(|_| DbError::Storage("text payload is not utf-8".to_string()))?;
                Ok(Value::Text(s.to_string()))
            }
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Int(v) => write!(f, "{v}"),
            Value::Text(s) => write!(f, "{s}"),
        }
    }
}

/// A row: a schema plus one value per field, optionally pinned to a
/// physical location once it has been placed on a page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tuple {
    schema: Arc<Schema>,
    values: Vec<Value>,
    record_id: Option<RecordId>,
}

impl Tuple {
    pub fn new(schema: Arc<Schema>, values: Vec<Value>) -> Result<Self, DbError> {
        if values.len() != schema.num_fields() {
            return Err(DbError::InvalidArgument(format!(
                "tuple has {} values but the schema has {} fields",
                values.len(),
                schema.num_fields()
            )));
        }
        for (i, value) in values.iter().enumerate() {
            if value.field_type() != schema.field_type(i)? {
                return Err(DbError::InvalidArgument(format!(
                    "value {i} has type {:?}, schema expects {:?}",
                    value.field_type(),
                    schema.field_type(i)?
                )));
            }
        }
        Ok(Self {
            schema,
            values,
            record_id: None,
        })
    }

    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    pub fn value(&self, i: usize) -> Result<&Value, DbError> {
        self.values
            .get(i)
            .ok_or_else(|| DbError::NoSuchElement(format!("field index {i} out of range")))
    }

    pub fn set_value(&mut self, i: usize, value: Value) -> Result<(), DbError> {
        let expected = self.schema.field_type(i)?;
        if value.field_type() != expected {
            return Err(DbError::InvalidArgument(format!(
                "value has type {:?}, schema expects {expected:?}",
                value.field_type()
            )));
        }
        self.values[i] = value;
        Ok(())
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }

    pub fn record_id(&self) -> Option<RecordId> {
        self.record_id
    }

    pub fn set_record_id(&mut self, rid: Option<RecordId>) {
        self.record_id = rid;
    }

    /// Replaces the schema without touching the values. Used by operators
    /// that rename fields (e.g. scan aliasing); the type sequence must match.
    pub fn with_schema(mut self, schema: Arc<Schema>) -> Self {
        debug_assert!(*schema == *self.schema);
        self.schema = schema;
        self
    }

    /// Fixed-width encoding of all fields, in field order.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.schema.byte_size());
        for value in &self.values {
            value.encode_into(&mut out);
        }
        out
    }

    /// Decodes a tuple of the given schema from `bytes`.
    pub fn from_bytes(schema: Arc<Schema>, bytes: &[u8]) -> Result<Self, DbError> {
        if bytes.len() < schema.byte_size() {
            return Err(DbError::Storage(format!(
                "tuple needs {} bytes, got {}",
                schema.byte_size(),
                bytes.len()
            )));
        }
        let mut values = Vec::with_capacity(schema.num_fields());
        let mut offset = 0;
        for i in 0..schema.num_fields() {
            let field_type = schema.field_type(i)?;
            values.push(Value::decode(field_type, &bytes[offset..])?);
            offset += field_type.byte_len();
        }
        Ok(Self {
            schema,
            values,
            record_id: None,
        })
    }
}

impl fmt::Display for Tuple {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for value in &self.values {
            if !first {
                write!(f, "\t")?;
            }
            write!(f, "{value}")?;
            first = false;
        }
        Ok(())
    }
}
