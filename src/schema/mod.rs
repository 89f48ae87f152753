//! Arrow schema of block data files.
//!
//! Labels are stored as columns: every label key present in a block becomes
//! a nullable string column, `__name__` is stored in the dedicated
//! `metric_name` column.

mod block;

pub use block::{
    BlockSchema,
    BlockSchemaBuilder,
    METRIC_NAME_FIELD,
    TIMESTAMP_FIELD,
    VALUE_FIELD,
};
