use arrow_schema::{DataType, Field, Schema, SchemaRef, TimeUnit};
use std::sync::Arc;

/// Key/value table holding per-collection identity and write counters.
pub const META_TABLE: &str = "localrag_meta";

pub fn build_chunk_schema(dim: i32) -> SchemaRef {
	Arc::new(Schema::new(vec![
		Field::new("id", DataType::Utf8, false),
		Field::new("source_path", DataType::Utf8, false),
		Field::new("page_number", DataType::Int32, true),
		// JSON array of headings, outermost first
		Field::new("header_path", DataType::Utf8, false),
		Field::new("chunk_index", DataType::Int32, false),
		Field::new("content", DataType::Utf8, false),
		Field::new("content_hash", DataType::Utf8, false),
		Field::new("seq", DataType::Int64, false),
		Field::new("vector", DataType::FixedSizeList(Arc::new(Field::new("item", DataType::Float32, true)), dim), true),
	]))
}

pub fn build_meta_schema() -> SchemaRef {
	Arc::new(Schema::new(vec![
		Field::new("key", DataType::Utf8, false),
		Field::new("value", DataType::Utf8, false),
		Field::new("updated_at", DataType::Timestamp(TimeUnit::Millisecond, None), false),
	]))
}

/// Dimension of the `vector` column, if the schema has one.
pub fn vector_dim(schema: &Schema) -> Option<usize> {
	match schema.field_with_name("vector").ok()?.data_type() {
		DataType::FixedSizeList(_, dim) => usize::try_from(*dim).ok(),
		_ => None,
	}
}
