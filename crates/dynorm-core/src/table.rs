//! Table provisioning: create a model's table if absent and wait for it.

use std::time::{Duration, Instant};

use dynorm_model::StoreErrorCode;
use dynorm_model::input::{DescribeTableInput, ListTablesInput};
use dynorm_model::types::TableStatus;
use tracing::{debug, info};

use crate::error::OrmResult;
use crate::schema::ModelSchema;
use crate::store::{DataStore, timed};

/// What provisioning found or did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProvisionOutcome {
    /// The table was already listed.
    Existing,
    /// The table was created by this call.
    Created,
    /// Creation raced with another creator; the table exists.
    CreatedElsewhere,
}

/// Every table name, following `ListTables` pagination.
pub async fn list_all_tables<S: DataStore + ?Sized>(
    store: &S,
    request_timeout: Duration,
) -> OrmResult<Vec<String>> {
    let mut names = Vec::new();
    let mut start: Option<String> = None;
    loop {
        let page = timed(
            "ListTables",
            request_timeout,
            store.list_tables(ListTablesInput {
                exclusive_start_table_name: start.take(),
                limit: None,
            }),
        )
        .await?;
        names.extend(page.table_names);
        match page.last_evaluated_table_name {
            Some(next) => start = Some(next),
            None => break,
        }
    }
    Ok(names)
}

/// Create `schema`'s table when it does not exist, then optionally wait for
/// it to become `ACTIVE`.
pub async fn provision<S: DataStore + ?Sized>(
    store: &S,
    schema: &ModelSchema,
    request_timeout: Duration,
) -> OrmResult<ProvisionOutcome> {
    let table = schema.table_name.as_str();
    let tables = list_all_tables(store, request_timeout).await?;
    if tables.iter().any(|t| t == table) {
        debug!(model = %schema.name, table, "table exists");
        return Ok(ProvisionOutcome::Existing);
    }

    let outcome = match timed(
        "CreateTable",
        request_timeout,
        store.create_table(schema.create_table_input()),
    )
    .await
    {
        Ok(_) => {
            info!(model = %schema.name, table, "table created");
            ProvisionOutcome::Created
        }
        Err(e)
            if e.as_store_error()
                .is_some_and(|s| s.code == StoreErrorCode::ResourceInUseException) =>
        {
            debug!(model = %schema.name, table, "table created concurrently");
            ProvisionOutcome::CreatedElsewhere
        }
        Err(e) => return Err(e),
    };

    let status = &schema.settings.table_status;
    if status.wait_till_active {
        wait_until_active(store, table, status.interval(), request_timeout).await?;
    }
    Ok(outcome)
}

/// Poll `DescribeTable` every `interval` until the table is `ACTIVE`.
pub async fn wait_until_active<S: DataStore + ?Sized>(
    store: &S,
    table: &str,
    interval: Duration,
    request_timeout: Duration,
) -> OrmResult<()> {
    let started = Instant::now();
    let mut polls = 0_u32;
    loop {
        let described = timed(
            "DescribeTable",
            request_timeout,
            store.describe_table(DescribeTableInput {
                table_name: table.to_owned(),
            }),
        )
        .await?;
        polls += 1;
        let status = described.table.and_then(|t| t.table_status);
        if status == Some(TableStatus::Active) {
            info!(
                table,
                polls,
                elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
                "table active"
            );
            return Ok(());
        }
        debug!(table, status = ?status, "waiting for table");
        tokio::time::sleep(interval).await;
    }
}
