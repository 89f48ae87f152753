//! Block schema definitions

use crate::labels::METRIC_NAME_LABEL;
use arrow_schema::{DataType, Field, Schema, SchemaRef, TimeUnit};
use std::collections::BTreeSet;
use std::sync::Arc;

/// Standard field names
pub const TIMESTAMP_FIELD: &str = "timestamp";
pub const METRIC_NAME_FIELD: &str = "metric_name";
pub const VALUE_FIELD: &str = "value";

/// Prefix given to label columns whose key collides with a standard field.
const RESERVED_LABEL_PREFIX: &str = "label_";

/// Schema for one block's data file.
#[derive(Debug, Clone)]
pub struct BlockSchema {
    /// The Arrow schema
    schema: SchemaRef,
    /// (label key, column name) in column order
    label_columns: Vec<(String, String)>,
}

impl BlockSchema {
    /// Create a new schema builder
    pub fn builder() -> BlockSchemaBuilder {
        BlockSchemaBuilder::new()
    }

    /// Get the Arrow schema
    pub fn arrow_schema(&self) -> SchemaRef {
        self.schema.clone()
    }

    /// Label keys with the column each is stored in, in column order.
    pub fn label_columns(&self) -> impl Iterator<Item = (&str, &str)> {
        self.label_columns
            .iter()
            .map(|(key, column)| (key.as_str(), column.as_str()))
    }

    /// Check if a column exists
    pub fn has_column(&self, name: &str) -> bool {
        self.schema.field_with_name(name).is_ok()
    }

    /// Column a label key is stored in.
    pub fn column_for_label(key: &str) -> String {
        match key {
            TIMESTAMP_FIELD | METRIC_NAME_FIELD | VALUE_FIELD => {
                format!("{}{}", RESERVED_LABEL_PREFIX, key)
            }
            _ if key.starts_with(RESERVED_LABEL_PREFIX) => {
                format!("{}{}", RESERVED_LABEL_PREFIX, key)
            }
            _ => key.to_string(),
        }
    }
}

/// Builder for BlockSchema
#[derive(Debug, Default)]
pub struct BlockSchemaBuilder {
    labels: BTreeSet<String>,
}

impl BlockSchemaBuilder {
    /// Create a new builder
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a label column. `__name__` is ignored; it has its own column.
    pub fn with_label(mut self, key: impl Into<String>) -> Self {
        let key = key.into();
        if key != METRIC_NAME_LABEL {
            self.labels.insert(key);
        }
        self
    }

    /// Add every label key in `keys`.
    pub fn with_labels<I, S>(self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        keys.into_iter().fold(self, |builder, key| builder.with_label(key))
    }

    /// Build the schema
    pub fn build(self) -> BlockSchema {
        let mut fields = Vec::with_capacity(self.labels.len() + 3);

        // Millisecond timestamps, matching Prometheus sample resolution
        fields.push(Field::new(
            TIMESTAMP_FIELD,
            DataType::Timestamp(TimeUnit::Millisecond, Some("UTC".into())),
            false,
        ));

        // Metric name (dictionary encoded, usually a single value per block)
        fields.push(Field::new(
            METRIC_NAME_FIELD,
            DataType::Dictionary(Box::new(DataType::UInt16), Box::new(DataType::Utf8)),
            true,
        ));

        let mut label_columns = Vec::with_capacity(self.labels.len());
        for key in self.labels {
            let column = BlockSchema::column_for_label(&key);
            fields.push(Field::new(&column, DataType::Utf8, true));
            label_columns.push((key, column));
        }

        fields.push(Field::new(VALUE_FIELD, DataType::Float64, false));

        BlockSchema {
            schema: Arc::new(Schema::new(fields)),
            label_columns,
        }
    }
}
