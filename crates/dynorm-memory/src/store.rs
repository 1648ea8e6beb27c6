//! [`DataStore`] implementation over in-process tables.
//!
//! Results are paged like a remote store pages them: a `Query` or `Scan`
//! returns at most `page_size` evaluated items and a `LastEvaluatedKey` when
//! more remain. Filters apply after the page limit, so a page may carry fewer
//! items than it evaluated.

use std::collections::HashMap;

use async_trait::async_trait;
use dynorm_core::DataStore;
use dynorm_model::input::{
    CreateTableInput, DeleteItemInput, DescribeTableInput, GetItemInput, ListTablesInput,
    PutItemInput, QueryInput, ScanInput, UpdateItemInput,
};
use dynorm_model::output::{
    CreateTableOutput, DeleteItemOutput, DescribeTableOutput, GetItemOutput, ListTablesOutput,
    PutItemOutput, QueryOutput, ScanOutput, UpdateItemOutput,
};
use dynorm_model::types::ReturnValue;
use dynorm_model::{AttributeValue, Item, StoreError};
use tracing::{debug, info};

use crate::config::MemoryConfig;
use crate::expression::{
    CompareOp, EvalContext, Expr, ExpressionError, FunctionName, LogicalOp, Operand,
    parse_condition, parse_update,
};
use crate::state::{MemoryState, MemoryTable};
use crate::storage::{
    KeyAttribute, KeySchema, PrimaryKey, SortKeyCondition, SortableAttributeValue, StorageError,
    extract_primary_key,
};

/// Tables held in process memory.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: MemoryState,
    config: MemoryConfig,
}

impl MemoryStore {
    #[must_use]
    pub fn new(config: MemoryConfig) -> Self {
        Self {
            state: MemoryState::new(),
            config,
        }
    }

    #[must_use]
    pub fn state(&self) -> &MemoryState {
        &self.state
    }

    #[must_use]
    pub fn config(&self) -> &MemoryConfig {
        &self.config
    }
}

// ---------------------------------------------------------------------------
// Error mapping
// ---------------------------------------------------------------------------

fn storage_error(err: StorageError) -> StoreError {
    StoreError::validation(err.to_string())
}

fn expression_error(err: ExpressionError) -> StoreError {
    StoreError::validation(format!("Invalid expression: {err}"))
}

fn page_limit(limit: Option<i32>, page_size: usize) -> Result<usize, StoreError> {
    match limit {
        Some(l) if l <= 0 => Err(StoreError::validation("Limit must be greater than 0")),
        Some(l) => Ok(usize::try_from(l).unwrap_or(usize::MAX).min(page_size)),
        None => Ok(page_size),
    }
}

fn count(n: usize) -> i32 {
    i32::try_from(n).unwrap_or(i32::MAX)
}

/// A key argument must name exactly the table's key attributes.
fn validate_key(schema: &KeySchema, key: &Item) -> Result<PrimaryKey, StoreError> {
    if key.len() != schema.attribute_names().count() {
        return Err(StoreError::validation(
            "The provided key element does not match the schema",
        ));
    }
    extract_primary_key(schema, key).map_err(storage_error)
}

// ---------------------------------------------------------------------------
// Key conditions
// ---------------------------------------------------------------------------

/// A key-condition expression resolved against a key schema.
#[derive(Debug)]
struct KeyCondition {
    partition: SortableAttributeValue,
    sort: Option<SortKeyCondition>,
}

impl KeyCondition {
    fn resolve(
        expr: &Expr,
        schema: &KeySchema,
        names: &HashMap<String, String>,
        values: &HashMap<String, AttributeValue>,
    ) -> Result<Self, StoreError> {
        let empty = Item::new();
        let ctx = EvalContext {
            item: &empty,
            names,
            values,
        };
        let mut terms = Vec::new();
        flatten_and(expr, &mut terms);

        let mut partition = None;
        let mut sort = None;
        for term in terms {
            let (attr, condition) = sort_condition(&ctx, term)?;
            let is_hash = attr == schema.partition_key.name;
            let is_range = schema.sort_key.as_ref().is_some_and(|k| k.name == attr);
            match condition {
                SortKeyCondition::Eq(value) if is_hash && partition.is_none() => {
                    partition = Some(value);
                }
                condition if is_range && sort.is_none() => sort = Some(condition),
                _ => {
                    return Err(StoreError::validation(format!(
                        "Query key condition not supported on attribute: {attr}"
                    )));
                }
            }
        }

        let partition = partition.ok_or_else(|| {
            StoreError::validation(format!(
                "Query condition missed key schema element: {}",
                schema.partition_key.name
            ))
        })?;
        Ok(Self { partition, sort })
    }

    fn matches(&self, schema: &KeySchema, item: &Item) -> bool {
        let hash_ok = sortable(item, &schema.partition_key).is_some_and(|v| v == self.partition);
        let range_ok = match (&schema.sort_key, &self.sort) {
            (Some(key), Some(condition)) => {
                sortable(item, key).is_some_and(|v| condition.matches(&v))
            }
            (Some(key), None) => item.contains_key(&key.name),
            _ => true,
        };
        hash_ok && range_ok
    }
}

fn flatten_and<'e>(expr: &'e Expr, out: &mut Vec<&'e Expr>) {
    match expr {
        Expr::Logical {
            op: LogicalOp::And,
            left,
            right,
        } => {
            flatten_and(left, out);
            flatten_and(right, out);
        }
        other => out.push(other),
    }
}

fn key_value(
    ctx: &EvalContext<'_>,
    attr: &str,
    operand: &Operand,
) -> Result<SortableAttributeValue, StoreError> {
    let value = ctx
        .resolve_operand(operand)
        .map_err(expression_error)?
        .ok_or_else(|| StoreError::validation("Key condition value must be a placeholder"))?;
    SortableAttributeValue::from_attribute_value(attr, &value).map_err(storage_error)
}

fn key_path(ctx: &EvalContext<'_>, operand: &Operand) -> Result<String, StoreError> {
    match operand {
        Operand::Path(path) => ctx.resolve_path(path).map_err(expression_error),
        Operand::Value(v) => Err(StoreError::validation(format!(
            "Key condition must name an attribute on its left side, found {v}"
        ))),
    }
}

fn sort_condition(
    ctx: &EvalContext<'_>,
    term: &Expr,
) -> Result<(String, SortKeyCondition), StoreError> {
    match term {
        Expr::Compare { left, op, right } => {
            let attr = key_path(ctx, left)?;
            let value = key_value(ctx, &attr, right)?;
            let condition = match op {
                CompareOp::Eq => SortKeyCondition::Eq(value),
                CompareOp::Lt => SortKeyCondition::Lt(value),
                CompareOp::Le => SortKeyCondition::Le(value),
                CompareOp::Gt => SortKeyCondition::Gt(value),
                CompareOp::Ge => SortKeyCondition::Ge(value),
                CompareOp::Ne => {
                    return Err(StoreError::validation(
                        "Unsupported operator in key condition: <>",
                    ));
                }
            };
            Ok((attr, condition))
        }
        Expr::Between { value, low, high } => {
            let attr = key_path(ctx, value)?;
            let low = key_value(ctx, &attr, low)?;
            let high = key_value(ctx, &attr, high)?;
            if low > high {
                return Err(StoreError::validation(
                    "Invalid KeyConditionExpression: BETWEEN bounds are out of order",
                ));
            }
            Ok((attr, SortKeyCondition::Between(low, high)))
        }
        Expr::Function {
            name: FunctionName::BeginsWith,
            args,
        } if args.len() == 2 => {
            let attr = key_path(ctx, &args[0])?;
            match key_value(ctx, &attr, &args[1])? {
                SortableAttributeValue::S(prefix) => {
                    Ok((attr, SortKeyCondition::BeginsWith(prefix)))
                }
                _ => Err(StoreError::validation("begins_with requires a string prefix")),
            }
        }
        _ => Err(StoreError::validation(
            "Invalid KeyConditionExpression: only comparisons, BETWEEN and begins_with joined \
             by AND are allowed",
        )),
    }
}

fn sortable(item: &Item, key: &KeyAttribute) -> Option<SortableAttributeValue> {
    item.get(&key.name)
        .and_then(|v| SortableAttributeValue::from_attribute_value(&key.name, v).ok())
}

// ---------------------------------------------------------------------------
// Paging
// ---------------------------------------------------------------------------

/// Position of an item in a result sequence: the index range key (if the
/// read goes through a ranged index), then the table key.
type Cursor = (Option<SortableAttributeValue>, PrimaryKey);

fn cursor(
    table_keys: &KeySchema,
    index_sort: Option<&KeyAttribute>,
    item: &Item,
) -> Result<Cursor, StorageError> {
    let index_value = index_sort
        .and_then(|k| item.get(&k.name).map(|v| (k, v)))
        .map(|(k, v)| SortableAttributeValue::from_attribute_value(&k.name, v))
        .transpose()?;
    Ok((index_value, extract_primary_key(table_keys, item)?))
}

#[derive(Debug)]
struct Page {
    items: Vec<Item>,
    last_evaluated_key: Option<Item>,
}

/// Order candidates, resume after `start` and cut one page.
fn paginate(
    table: &MemoryTable,
    index_keys: Option<&KeySchema>,
    candidates: Vec<Item>,
    start: &Item,
    forward: bool,
    limit: usize,
) -> Result<Page, StoreError> {
    let table_keys = table.storage.key_schema();
    let index_sort = index_keys.and_then(|k| k.sort_key.as_ref());

    let mut positioned = candidates
        .into_iter()
        .map(|item| cursor(table_keys, index_sort, &item).map(|c| (c, item)))
        .collect::<Result<Vec<_>, _>>()
        .map_err(storage_error)?;
    positioned.sort_by(|a, b| a.0.cmp(&b.0));
    if !forward {
        positioned.reverse();
    }

    if !start.is_empty() {
        let resume = cursor(table_keys, index_sort, start).map_err(storage_error)?;
        positioned.retain(|(c, _)| if forward { *c > resume } else { *c < resume });
    }

    let more = positioned.len() > limit;
    positioned.truncate(limit);
    let last_evaluated_key = more
        .then(|| positioned.last())
        .flatten()
        .map(|(_, item)| {
            let mut key = table_keys.project_key(item);
            if let Some(index_keys) = index_keys {
                key.extend(index_keys.project_key(item));
            }
            key
        });
    Ok(Page {
        items: positioned.into_iter().map(|(_, item)| item).collect(),
        last_evaluated_key,
    })
}

fn apply_filter(
    items: Vec<Item>,
    filter: Option<&Expr>,
    names: &HashMap<String, String>,
    values: &HashMap<String, AttributeValue>,
) -> Result<Vec<Item>, StoreError> {
    let Some(filter) = filter else {
        return Ok(items);
    };
    let mut kept = Vec::with_capacity(items.len());
    for item in items {
        let ctx = EvalContext {
            item: &item,
            names,
            values,
        };
        if ctx.evaluate(filter).map_err(expression_error)? {
            kept.push(item);
        }
    }
    Ok(kept)
}

fn parse_optional(expr: Option<&str>) -> Result<Option<Expr>, StoreError> {
    expr.map(parse_condition)
        .transpose()
        .map_err(expression_error)
}

// ---------------------------------------------------------------------------
// DataStore
// ---------------------------------------------------------------------------

#[async_trait]
impl DataStore for MemoryStore {
    async fn list_tables(&self, input: ListTablesInput) -> Result<ListTablesOutput, StoreError> {
        let limit = page_limit(input.limit, self.config.list_tables_page_size)?;
        let mut names: Vec<String> = self
            .state
            .list_table_names()
            .into_iter()
            .filter(|n| {
                input
                    .exclusive_start_table_name
                    .as_deref()
                    .is_none_or(|start| n.as_str() > start)
            })
            .collect();
        let more = names.len() > limit;
        names.truncate(limit);
        Ok(ListTablesOutput {
            last_evaluated_table_name: more.then(|| names.last().cloned()).flatten(),
            table_names: names,
        })
    }

    async fn create_table(
        &self,
        input: CreateTableInput,
    ) -> Result<CreateTableOutput, StoreError> {
        let table = MemoryTable::from_input(input, self.config.activation_polls)
            .map_err(storage_error)?;
        let table = self.state.create_table(table)?;
        info!(
            table = %table.name,
            gsi = table.gsi_definitions.len(),
            lsi = table.lsi_definitions.len(),
            "table created"
        );
        Ok(CreateTableOutput {
            table_description: Some(table.to_description(table.status())),
        })
    }

    async fn describe_table(
        &self,
        input: DescribeTableInput,
    ) -> Result<DescribeTableOutput, StoreError> {
        let table = self.state.require_table(&input.table_name)?;
        let status = table.poll_status();
        Ok(DescribeTableOutput {
            table: Some(table.to_description(status)),
        })
    }

    async fn get_item(&self, input: GetItemInput) -> Result<GetItemOutput, StoreError> {
        let table = self.state.require_table(&input.table_name)?;
        let key = validate_key(table.storage.key_schema(), &input.key)?;
        Ok(GetItemOutput {
            item: table.storage.get_item(&key),
        })
    }

    async fn put_item(&self, input: PutItemInput) -> Result<PutItemOutput, StoreError> {
        let table = self.state.require_table(&input.table_name)?;
        let return_values = input.return_values.unwrap_or_default();
        if return_values == ReturnValue::AllNew {
            return Err(StoreError::validation(
                "ReturnValues ALL_NEW is not valid for PutItem",
            ));
        }
        let old = table.storage.put_item(input.item).map_err(storage_error)?;
        debug!(table = %table.name, replaced = old.is_some(), "put item");
        Ok(PutItemOutput {
            attributes: old.filter(|_| return_values == ReturnValue::AllOld),
        })
    }

    async fn update_item(&self, input: UpdateItemInput) -> Result<UpdateItemOutput, StoreError> {
        let table = self.state.require_table(&input.table_name)?;
        let key_schema = table.storage.key_schema();
        let key = validate_key(key_schema, &input.key)?;
        let existing = table.storage.get_item(&key);
        let mut updated = existing.clone().unwrap_or_else(|| input.key.clone());

        if let Some(expression) = input.update_expression.as_deref() {
            let update = parse_update(expression).map_err(expression_error)?;
            let ctx = EvalContext {
                item: existing.as_ref().unwrap_or(&input.key),
                names: &input.expression_attribute_names,
                values: &input.expression_attribute_values,
            };
            for path in update.touched_paths() {
                let name = ctx.resolve_path(path).map_err(expression_error)?;
                if key_schema.attribute_names().any(|k| k == name) {
                    return Err(StoreError::validation(format!(
                        "Cannot update attribute {name}. This attribute is part of the key"
                    )));
                }
            }
            ctx.apply_update(&update, &mut updated)
                .map_err(expression_error)?;
        }

        table
            .storage
            .put_item(updated.clone())
            .map_err(storage_error)?;
        debug!(table = %table.name, created = existing.is_none(), "update item");
        Ok(UpdateItemOutput {
            attributes: match input.return_values.unwrap_or_default() {
                ReturnValue::AllNew => Some(updated),
                ReturnValue::AllOld => existing,
                ReturnValue::None => None,
            },
        })
    }

    async fn delete_item(&self, input: DeleteItemInput) -> Result<DeleteItemOutput, StoreError> {
        let table = self.state.require_table(&input.table_name)?;
        let key = validate_key(table.storage.key_schema(), &input.key)?;
        let removed = table.storage.delete_item(&key);
        debug!(table = %table.name, removed = removed.is_some(), "delete item");
        Ok(DeleteItemOutput {
            attributes: removed
                .filter(|_| input.return_values.unwrap_or_default() == ReturnValue::AllOld),
        })
    }

    async fn query(&self, input: QueryInput) -> Result<QueryOutput, StoreError> {
        let table = self.state.require_table(&input.table_name)?;
        let limit = page_limit(input.limit, self.config.page_size)?;
        let index_name = input.index_name.as_deref();
        let key_schema = table.key_schema_for(index_name)?;

        let key_expr = parse_optional(input.key_condition_expression.as_deref())?
            .ok_or_else(|| StoreError::validation("KeyConditionExpression is required"))?;
        let filter = parse_optional(input.filter_expression.as_deref())?;
        let condition = KeyCondition::resolve(
            &key_expr,
            &key_schema,
            &input.expression_attribute_names,
            &input.expression_attribute_values,
        )?;

        let candidates = match index_name {
            None => table.storage.partition_items(&condition.partition),
            Some(_) => table.storage.all_items(),
        };
        let matched: Vec<Item> = candidates
            .into_iter()
            .filter(|item| condition.matches(&key_schema, item))
            .collect();

        let page = paginate(
            &table,
            index_name.map(|_| &key_schema),
            matched,
            &input.exclusive_start_key,
            input.scan_index_forward.unwrap_or(true),
            limit,
        )?;
        let scanned = page.items.len();
        let items = apply_filter(
            page.items,
            filter.as_ref(),
            &input.expression_attribute_names,
            &input.expression_attribute_values,
        )?;
        debug!(
            table = %table.name,
            index = ?index_name,
            scanned,
            returned = items.len(),
            more = page.last_evaluated_key.is_some(),
            "query"
        );
        Ok(QueryOutput {
            count: count(items.len()),
            scanned_count: count(scanned),
            items,
            last_evaluated_key: page.last_evaluated_key,
        })
    }

    async fn scan(&self, input: ScanInput) -> Result<ScanOutput, StoreError> {
        let table = self.state.require_table(&input.table_name)?;
        let limit = page_limit(input.limit, self.config.page_size)?;
        let index_name = input.index_name.as_deref();
        let index_keys = index_name
            .map(|name| table.key_schema_for(Some(name)))
            .transpose()?;
        let filter = parse_optional(input.filter_expression.as_deref())?;

        let mut candidates = table.storage.all_items();
        if let Some(keys) = &index_keys {
            candidates.retain(|item| keys.attribute_names().all(|k| item.contains_key(k)));
        }

        // Scans run in table key order even through an index.
        let page = paginate(
            &table,
            None,
            candidates,
            &input.exclusive_start_key,
            true,
            limit,
        )?;
        let last_evaluated_key = match (page.last_evaluated_key, page.items.last(), &index_keys) {
            (Some(mut key), Some(last), Some(keys)) => {
                key.extend(keys.project_key(last));
                Some(key)
            }
            (key, ..) => key,
        };
        let scanned = page.items.len();
        let items = apply_filter(
            page.items,
            filter.as_ref(),
            &input.expression_attribute_names,
            &input.expression_attribute_values,
        )?;
        debug!(
            table = %table.name,
            index = ?index_name,
            scanned,
            returned = items.len(),
            more = last_evaluated_key.is_some(),
            "scan"
        );
        Ok(ScanOutput {
            count: count(items.len()),
            scanned_count: count(scanned),
            items,
            last_evaluated_key,
        })
    }
}
