// Table layout: the fixed-width row format shared by every table file, and
// the slotted page that reads/writes one block of rows at a time.

pub mod page;

use std::collections::HashMap;

use crate::storage::Page as StoragePage;

pub use page::RecordPage;

/// The two field types a column can have.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Types {
    Integer,
    Varchar,
}

#[derive(Debug, Clone, Copy)]
struct FieldInfo {
    ty: Types,
    length: usize,
}

/// The set of fields in a table (or a query's output), in declaration order.
#[derive(Debug, Clone, Default)]
pub struct Schema {
    fields: Vec<String>,
    info: HashMap<String, FieldInfo>,
}

impl Schema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_field(&mut self, fldname: &str, ty: Types, length: usize) {
        self.fields.push(fldname.to_string());
        self.info.insert(fldname.to_string(), FieldInfo { ty, length });
    }

    pub fn add_int_field(&mut self, fldname: &str) {
        self.add_field(fldname, Types::Integer, 0);
    }

    pub fn add_string_field(&mut self, fldname: &str, length: usize) {
        self.add_field(fldname, Types::Varchar, length);
    }

    /// Copies one field's type/length from another schema.
    pub fn add(&mut self, fldname: &str, sch: &Schema) {
        let ty = sch.field_type(fldname);
        let length = sch.length(fldname);
        self.add_field(fldname, ty, length);
    }

    pub fn add_all(&mut self, sch: &Schema) {
        for fldname in sch.fields().to_vec() {
            self.add(&fldname, sch);
        }
    }

    pub fn fields(&self) -> &[String] {
        &self.fields
    }

    pub fn has_field(&self, fldname: &str) -> bool {
        self.info.contains_key(fldname)
    }

    pub fn field_type(&self, fldname: &str) -> Types {
        self.info
            .get(fldname)
            .unwrap_or_else(|| panic!("no such field: {fldname}"))
            .ty
    }

    pub fn length(&self, fldname: &str) -> usize {
        self.info
            .get(fldname)
            .unwrap_or_else(|| panic!("no such field: {fldname}"))
            .length
    }
}

/// The physical position of every field within a row, plus the row's total
/// slot size, derived once from a `Schema`.
#[derive(Debug, Clone)]
pub struct Layout {
    schema: Schema,
    offsets: HashMap<String, usize>,
    slotsize: usize,
}

impl Layout {
    pub fn from_schema(schema: Schema) -> Self {
        let mut offsets = HashMap::new();
        let mut pos = 4; // leading flag (EMPTY/USED)
        for fldname in schema.fields().to_vec() {
            offsets.insert(fldname.clone(), pos);
            pos += Self::length_in_bytes(&fldname, &schema);
        }
        Self {
            schema,
            offsets,
            slotsize: pos,
        }
    }

    pub fn new(schema: Schema, offsets: HashMap<String, usize>, slotsize: usize) -> Self {
        Self {
            schema,
            offsets,
            slotsize,
        }
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn offset(&self, fldname: &str) -> usize {
        *self
            .offsets
            .get(fldname)
            .unwrap_or_else(|| panic!("no such field: {fldname}"))
    }

    pub fn slot_size(&self) -> usize {
        self.slotsize
    }

    fn length_in_bytes(fldname: &str, schema: &Schema) -> usize {
        match schema.field_type(fldname) {
            Types::Integer => 4,
            Types::Varchar => StoragePage::max_length(schema.length(fldname)),
        }
    }
}
