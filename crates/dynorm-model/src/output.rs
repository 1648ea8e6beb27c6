//! Response types for the nine store operations dynorm issues.

use serde::{Deserialize, Serialize};

use crate::attribute_value::Item;
use crate::types::TableDescription;

/// Output of `ListTables`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ListTablesOutput {
    /// Table names on this page.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub table_names: Vec<String>,

    /// Present when more names remain.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_evaluated_table_name: Option<String>,
}

/// Output of `CreateTable`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct CreateTableOutput {
    /// The new table, usually still `CREATING`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub table_description: Option<TableDescription>,
}

/// Output of `DescribeTable`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct DescribeTableOutput {
    /// The table.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub table: Option<TableDescription>,
}

/// Output of `GetItem`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct GetItemOutput {
    /// The item, absent when nothing matches the key.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub item: Option<Item>,
}

/// Output of `PutItem`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct PutItemOutput {
    /// Old or new image, depending on `ReturnValues`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attributes: Option<Item>,
}

/// Output of `UpdateItem`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct UpdateItemOutput {
    /// Old or new image, depending on `ReturnValues`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attributes: Option<Item>,
}

/// Output of `DeleteItem`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct DeleteItemOutput {
    /// The removed item when `ALL_OLD` was requested.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attributes: Option<Item>,
}

/// Output of `Query`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct QueryOutput {
    /// Matching items on this page.
    #[serde(default)]
    pub items: Vec<Item>,

    /// Number of matching items on this page.
    #[serde(default)]
    pub count: i32,

    /// Number of items evaluated before the filter.
    #[serde(default)]
    pub scanned_count: i32,

    /// Continuation token; absent on the last page.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_evaluated_key: Option<Item>,
}

/// Output of `Scan`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ScanOutput {
    /// Matching items on this page.
    #[serde(default)]
    pub items: Vec<Item>,

    /// Number of matching items on this page.
    #[serde(default)]
    pub count: i32,

    /// Number of items evaluated before the filter.
    #[serde(default)]
    pub scanned_count: i32,

    /// Continuation token; absent on the last page.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_evaluated_key: Option<Item>,
}

/// A page of items from either `Query` or `Scan`.
///
/// Lets the paging loop treat both operations alike.
pub trait ItemPage {
    /// Splits the page into its items and the continuation token, if any.
    fn into_parts(self) -> (Vec<Item>, Option<Item>);
}

impl ItemPage for QueryOutput {
    fn into_parts(self) -> (Vec<Item>, Option<Item>) {
        (self.items, self.last_evaluated_key.filter(|k| !k.is_empty()))
    }
}

impl ItemPage for ScanOutput {
    fn into_parts(self) -> (Vec<Item>, Option<Item>) {
        (self.items, self.last_evaluated_key.filter(|k| !k.is_empty()))
    }
}
