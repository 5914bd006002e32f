//! Field types and tuple schemas.

use crate::errors::DbError;

/// Maximum payload length of a [`FieldType::Text`] value, in bytes.
pub const TEXT_CAPACITY: usize = 128;

/// The closed set of column types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldType {
    /// 32-bit signed integer.
    Int,
    /// Fixed-capacity byte string of up to [`TEXT_CAPACITY`] bytes.
    Text,
}

impl FieldType {
    /// On-disk width of a value of this type, in bytes.
    pub fn byte_len(self) -> usize {
        match self {
            FieldType::Int => 4,
            // 4-byte length prefix followed by the zero-padded payload.
            FieldType::Text => 4 + TEXT_CAPACITY,
        }
    }
}

/// One column of a schema: a type plus an optional name.
#[derive(Debug, Clone)]
pub struct FieldDef {
    pub field_type: FieldType,
    pub name: Option<String>,
}

impl FieldDef {
    pub fn new(field_type: FieldType, name: Option<String>) -> Self {
        Self { field_type, name }
    }
}

/// The schema of a tuple: an ordered, non-empty sequence of fields.
///
/// Two schemas are equal iff their type sequences match position-wise;
/// field names do not participate in equality. Schemas are immutable once
/// constructed and are usually shared behind an `Arc`.
#[derive(Debug, Clone)]
pub struct Schema {
    fields: Vec<FieldDef>,
}

impl Schema {
    pub fn new(fields: Vec<FieldDef>) -> Result<Self, DbError> {
        if fields.is_empty() {
            return Err(DbError::InvalidArgument(
                "a schema needs at least one field".to_string(),
            ));
        }
        Ok(Self { fields })
    }

    /// Builds a schema of unnamed fields.
    pub fn of_types(types: &[FieldType]) -> Result<Self, DbError> {
        Self::new(
            types
                .iter()
                .map(|&t| FieldDef::new(t, None))
                .collect::<Vec<_>>(),
        )
    }

    /// Builds a schema from parallel (type, name) pairs.
    pub fn with_names(pairs: &[(FieldType, &str)]) -> Result<Self, DbError> {
        Self::new(
            pairs
                .iter()
                .map(|&(t, n)| FieldDef::new(t, Some(n.to_string())))
                .collect::<Vec<_>>(),
        )
    }

    /// Concatenates two schemas, fields of `left` first.
    pub fn merge(left: &Schema, right: &Schema) -> Schema {
        let mut fields = left.fields.clone();
        fields.extend(right.fields.iter().cloned());
        Schema { fields }
    }

    pub fn num_fields(&self) -> usize {
        self.fields.len()
    }

    /// Fixed on-disk size of a tuple with this schema, in bytes.
    pub fn byte_size(&self) -> usize {
        self.fields.iter().map(|f| f.field_type.byte_len()).sum()
    }

    pub fn field_type(&self, i: usize) -> Result<FieldType, DbError> {
        self.fields
            .get(i)
            .map(|f| f.field_type)
            .ok_or_else(|| DbError::NoSuchElement(format!("field index {i} out of range")))
    }

    pub fn field_name(&self, i: usize) -> Result<Option<&str>, DbError> {
        self.fields
            .get(i)
            .map(|f| f.name.as_deref())
            .ok_or_else(|| DbError::NoSuchElement(format!("field index {i} out of range")))
    }

    /// Index of the first field with the given name.
    pub fn index_of(&self, name: &str) -> Result<usize, DbError> {
        self.fields
            .iter()
            .position(|f| f.name.as_deref() == Some(name))
            .ok_or_else(|| DbError::NoSuchElement(format!("no field named {name}")))
    }

    pub fn fields(&self) -> impl Iterator<Item = &FieldDef> {
        self.fields.iter()
    }
}

impl PartialEq for Schema {
    fn eq(&self, other: &Self) -> bool {
        self.fields.len() == other.fields.len()
            && self
                .fields
                .iter()
                .zip(other.fields.iter())
                .all(|(a, b)| a.field_type == b.field_type)
    }
}

impl Eq for Schema {}
