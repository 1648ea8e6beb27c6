//! Wire-level types of the managed key-value store used by dynorm.
//!
//! The adapter never talks to the network itself. It builds the request
//! structs defined here and hands them to a `DataStore` implementation, which
//! is free to ship them over HTTP (the JSON field naming matches the store's
//! `awsJson1_0` protocol) or to answer them in process.
#![allow(clippy::doc_markdown)]
#![allow(clippy::module_name_repetitions)]
#![allow(missing_docs)]

pub mod attribute_value;
pub mod error;
pub mod input;
pub mod output;
pub mod types;

pub use attribute_value::{AttributeValue, Item};
pub use error::{StoreError, StoreErrorCode};
