//! Mutation to document conversion.

use tantivy::{doc, TantivyDocument, Term};

use crate::error::FullTextError;
use crate::schema::FullTextSchema;

/// Identity of a (partition, key) pair in the index:
/// `{partition len:u16 BE}{partition}{key}`, with the key kept as raw bytes.
pub fn doc_id(partition: &str, key: &[u8]) -> Result<Vec<u8>, FullTextError> {
    let len = u16::try_from(partition.len()).map_err(|_| {
        FullTextError::Key(format!("partition id too long: {} bytes", partition.len()))
    })?;
    let mut buf = Vec::with_capacity(2 + partition.len() + key.len());
    buf.extend_from_slice(&len.to_be_bytes());
    buf.extend_from_slice(partition.as_bytes());
    buf.extend_from_slice(key);
    Ok(buf)
}

/// Term that selects the document of (partition, key).
pub fn doc_term(
    schema: &FullTextSchema,
    partition: &str,
    key: &[u8],
) -> Result<Term, FullTextError> {
    Ok(Term::from_field_bytes(schema.doc_id, &doc_id(partition, key)?))
}

/// Term that selects every document of a partition.
pub fn partition_term(schema: &FullTextSchema, partition: &str) -> Term {
    Term::from_field_text(schema.partition, partition)
}

pub fn mutation_to_doc(
    schema: &FullTextSchema,
    partition: &str,
    key: &[u8],
    seq: u64,
    value: &[u8],
) -> Result<TantivyDocument, FullTextError> {
    Ok(doc!(
        schema.doc_id => doc_id(partition, key)?,
        schema.partition => partition,
        schema.key => String::from_utf8_lossy(key).into_owned(),
        schema.seq => seq,
        schema.body => String::from_utf8_lossy(value).into_owned(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::build_schema;
    use tantivy::schema::Value;

    #[test]
    fn test_doc_fields() {
        let schema = build_schema();
        let doc = mutation_to_doc(&schema, "3", b"beer:1", 42, b"hoppy pale ale").unwrap();

        assert_eq!(
            doc.get_first(schema.partition).and_then(|v| v.as_str()),
            Some("3")
        );
        assert_eq!(doc.get_first(schema.seq).and_then(|v| v.as_u64()), Some(42));
        assert_eq!(
            doc.get_first(schema.body).and_then(|v| v.as_str()),
            Some("hoppy pale ale")
        );
    }

    #[test]
    fn test_doc_id_is_partition_scoped() {
        assert_ne!(doc_id("1", b"0a").unwrap(), doc_id("10", b"a").unwrap());
        assert_eq!(doc_id("1", b"a").unwrap(), vec![0, 1, b'1', b'a']);
    }

    #[test]
    fn test_doc_id_keeps_distinct_pairs_apart() {
        // invalid UTF-8 keys must not collapse to the replacement character
        assert_ne!(doc_id("0", &[0xfe]).unwrap(), doc_id("0", &[0xff]).unwrap());
        // a separator inside the partition id must not shift the boundary
        assert_ne!(doc_id("a/b", b"c").unwrap(), doc_id("a", b"b/c").unwrap());
        assert_ne!(doc_id("", b"ab").unwrap(), doc_id("a", b"b").unwrap());
    }

    #[test]
    fn test_oversized_partition_rejected() {
        let long = "p".repeat(u16::MAX as usize + 1);
        assert!(matches!(doc_id(&long, b"k"), Err(FullTextError::Key(_))));
    }
}
