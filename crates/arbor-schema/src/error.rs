use thiserror::Error;

/// Errors raised by the schema metadata store.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum SchemaError {
    /// The backing store could not enumerate or profile the collection.
    #[error("collection '{collection}' is unavailable: {reason}")]
    CollectionUnavailable { collection: String, reason: String },

    #[error("no schema has been built for collection '{0}'")]
    NotFound(String),

    #[error("duplicate field '{field}' in collection '{collection}'")]
    DuplicateField { collection: String, field: String },

    #[error("unknown field '{field}' in collection '{collection}'")]
    UnknownField { collection: String, field: String },

    /// `top_groups` is unsorted or longer than the configured K.
    #[error("group statistics for '{collection}.{field}' are out of order or exceed {limit} entries")]
    InvalidGroups {
        collection: String,
        field: String,
        limit: usize,
    },
}
