//! entitygraph core: schema registry, normalization of nested entity graphs
//! into flat per-model tables, and shallow/deep denormalization on read.

pub mod denormalize;
pub mod draft;
pub mod error;
pub mod normalize;
pub mod registry;
pub mod schema;
pub mod tables;
pub mod traits;
pub mod types;

pub use denormalize::{Denormalizer, IdSelector, ReadMode, ReadResult};
pub use draft::{Draft, FieldValue, WriteInput, Written};
pub use error::{ModelError, Result};
pub use normalize::Normalizer;
pub use registry::SchemaRegistry;
pub use schema::{parse_definitions, ModelDefinition};
pub use tables::TableSet;
pub use traits::TableSource;
pub use types::{EntityTable, Record, RecordId, Value};
