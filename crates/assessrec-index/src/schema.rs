use arrow_schema::{DataType, Field, Schema};
use std::sync::Arc;

pub const COL_ID: &str = "id";
pub const COL_NAME: &str = "name";
pub const COL_DESCRIPTION: &str = "description";
pub const COL_TEST_TYPE: &str = "test_type";
pub const COL_DURATION: &str = "duration";
pub const COL_ADAPTIVE: &str = "adaptive_support";
pub const COL_REMOTE: &str = "remote_support";
pub const COL_POSITION: &str = "position";
pub const COL_VECTOR: &str = "vector";

pub fn vector_field(dim: i32) -> Field {
	Field::new(COL_VECTOR, DataType::FixedSizeList(Arc::new(Field::new("item", DataType::Float32, true)), dim), true)
}

/// One row per catalog record; `position` is the record's catalog order.
pub fn build_assessment_schema(dim: i32) -> Arc<Schema> {
	Arc::new(Schema::new(vec![
		Field::new(COL_ID, DataType::Utf8, false),
		Field::new(COL_NAME, DataType::Utf8, false),
		Field::new(COL_DESCRIPTION, DataType::Utf8, false),
		Field::new(COL_TEST_TYPE, DataType::Utf8, false),
		Field::new(COL_DURATION, DataType::Int32, true),
		Field::new(COL_ADAPTIVE, DataType::Utf8, false),
		Field::new(COL_REMOTE, DataType::Utf8, false),
		Field::new(COL_POSITION, DataType::Int32, false),
		vector_field(dim),
	]))
}
