//! Tantivy schema for full-text pindexes.
//!
//! One document per (partition, key):
//! - doc_id: length-prefixed partition plus raw key bytes, the update/delete
//!   term
//! - partition, key: stored for results; partition also drives rollback
//! - seq: sequence of the mutation that wrote the document
//! - body: the value, tokenized

use tantivy::schema::{Field, FieldType, Schema, FAST, INDEXED, STORED, STRING, TEXT};

use crate::error::FullTextError;

/// Schema field handles
#[derive(Debug, Clone)]
pub struct FullTextSchema {
    schema: Schema,
    pub doc_id: Field,
    pub partition: Field,
    pub key: Field,
    pub seq: Field,
    pub body: Field,
}

impl FullTextSchema {
    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// Recover field handles from an index on disk.
    pub fn from_schema(schema: Schema) -> Result<Self, FullTextError> {
        let field = |name: &str| {
            schema
                .get_field(name)
                .map_err(|_| FullTextError::SchemaMismatch(format!("missing {} field", name)))
        };

        let doc_id = field("doc_id")?;
        if !matches!(schema.get_field_entry(doc_id).field_type(), FieldType::Bytes(_)) {
            return Err(FullTextError::SchemaMismatch(
                "doc_id must be a bytes field".to_string(),
            ));
        }

        Ok(Self {
            doc_id,
            partition: field("partition")?,
            key: field("key")?,
            seq: field("seq")?,
            body: field("body")?,
            schema,
        })
    }
}

pub fn build_schema() -> FullTextSchema {
    let mut builder = Schema::builder();

    let doc_id = builder.add_bytes_field("doc_id", INDEXED);
    let partition = builder.add_text_field("partition", STRING | STORED);
    let key = builder.add_text_field("key", STRING | STORED);
    let seq = builder.add_u64_field("seq", INDEXED | STORED | FAST);
    let body = builder.add_text_field("body", TEXT | STORED);

    FullTextSchema {
        schema: builder.build(),
        doc_id,
        partition,
        key,
        seq,
        body,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_roundtrip_through_schema() {
        let built = build_schema();
        let recovered = FullTextSchema::from_schema(built.schema().clone()).unwrap();
        assert_eq!(recovered.doc_id, built.doc_id);
        assert_eq!(recovered.body, built.body);
    }

    #[test]
    fn test_text_doc_id_rejected() {
        let mut builder = Schema::builder();
        builder.add_text_field("doc_id", STRING);
        builder.add_text_field("partition", STRING | STORED);
        builder.add_text_field("key", STRING | STORED);
        builder.add_u64_field("seq", INDEXED | STORED | FAST);
        builder.add_text_field("body", TEXT | STORED);
        let err = FullTextSchema::from_schema(builder.build()).unwrap_err();
        assert!(matches!(err, FullTextError::SchemaMismatch(msg) if msg.contains("doc_id")));
    }

    #[test]
    fn test_foreign_schema_rejected() {
        let mut builder = Schema::builder();
        builder.add_text_field("text", TEXT);
        let err = FullTextSchema::from_schema(builder.build()).unwrap_err();
        assert!(matches!(err, FullTextError::SchemaMismatch(_)));
    }
}
