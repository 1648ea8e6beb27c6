//! ORM-style model layer over a hash/range keyed store.
//!
//! Models are defined once into a [`ModelRegistry`]; filters are compiled
//! into key-condition and filter expressions by [`expression`], fetched page
//! by page through a [`DataStore`] and shaped (offset, limit, order) by
//! [`pager`]. [`DynamoConnector`] ties the pieces into the CRUD surface.
#![allow(missing_docs, clippy::doc_markdown, clippy::module_name_repetitions)]

pub mod config;
pub mod connector;
pub mod error;
pub mod expression;
pub mod filter;
pub mod key;
pub mod marshal;
pub mod pager;
pub mod registry;
pub mod schema;
pub mod store;
pub mod table;

#[cfg(test)]
mod testing;

pub use config::ConnectorConfig;
pub use connector::{Connector, DynamoConnector, Record, RelationLoader};
pub use error::{DefinitionError, InputError, OrmError, OrmResult, ValidationError};
pub use filter::{Condition, Filter, Operator, OrderSpec};
pub use registry::ModelRegistry;
pub use schema::{ModelDefinition, ModelSchema, ModelSettings, PropertySpec, PropertyType};
pub use store::DataStore;
