//! The store seam: the nine table and item operations the adapter issues.
//!
//! Implementations own transport, signing and retries. [`timed`] bounds every
//! call with the connector's request timeout.

use std::future::Future;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use dynorm_model::StoreError;
use dynorm_model::input::{
    CreateTableInput, DeleteItemInput, DescribeTableInput, GetItemInput, ListTablesInput,
    PutItemInput, QueryInput, ScanInput, UpdateItemInput,
};
use dynorm_model::output::{
    CreateTableOutput, DeleteItemOutput, DescribeTableOutput, GetItemOutput, ListTablesOutput,
    PutItemOutput, QueryOutput, ScanOutput, UpdateItemOutput,
};
use tracing::warn;

use crate::error::{OrmError, OrmResult};

/// A hash/range keyed table store.
#[async_trait]
pub trait DataStore: Send + Sync + 'static {
    async fn list_tables(&self, input: ListTablesInput) -> Result<ListTablesOutput, StoreError>;

    async fn create_table(&self, input: CreateTableInput)
    -> Result<CreateTableOutput, StoreError>;

    async fn describe_table(
        &self,
        input: DescribeTableInput,
    ) -> Result<DescribeTableOutput, StoreError>;

    async fn get_item(&self, input: GetItemInput) -> Result<GetItemOutput, StoreError>;

    async fn put_item(&self, input: PutItemInput) -> Result<PutItemOutput, StoreError>;

    async fn update_item(&self, input: UpdateItemInput) -> Result<UpdateItemOutput, StoreError>;

    async fn delete_item(&self, input: DeleteItemInput) -> Result<DeleteItemOutput, StoreError>;

    async fn query(&self, input: QueryInput) -> Result<QueryOutput, StoreError>;

    async fn scan(&self, input: ScanInput) -> Result<ScanOutput, StoreError>;
}

/// Run one store call under `limit`.
///
/// Store errors pass through unchanged; an elapsed timer becomes
/// [`OrmError::Timeout`].
pub async fn timed<T, F>(operation: &'static str, limit: Duration, call: F) -> OrmResult<T>
where
    F: Future<Output = Result<T, StoreError>>,
{
    let start = Instant::now();
    match tokio::time::timeout(limit, call).await {
        Ok(result) => result.map_err(OrmError::from),
        Err(_) => {
            let elapsed_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX);
            warn!(operation, elapsed_ms, "store call timed out");
            Err(OrmError::Timeout {
                operation,
                elapsed_ms,
            })
        }
    }
}
