//! Paged fetching and client-side result shaping.
//!
//! The store answers a query or scan in bounded pages. [`PageCollector`]
//! follows continuation keys until the last page (or until `minResults` is
//! met), then [`shape`] applies the offset/limit window and the sort order the
//! store cannot apply itself.

use std::cmp::Ordering;
use std::time::{Duration, Instant};

use dynorm_model::Item;
use dynorm_model::output::ItemPage;
use serde_json::{Map, Value};
use tracing::debug;

use crate::error::OrmResult;
use crate::expression::QueryPlan;
use crate::filter::{Filter, OrderSpec};
use crate::schema::ModelSchema;
use crate::store::{DataStore, timed};

/// Follows continuation keys of one query or scan.
#[derive(Debug)]
pub struct PageCollector<'a, S: ?Sized> {
    store: &'a S,
    request_timeout: Duration,
}

impl<'a, S: DataStore + ?Sized> PageCollector<'a, S> {
    #[must_use]
    pub fn new(store: &'a S, request_timeout: Duration) -> Self {
        Self {
            store,
            request_timeout,
        }
    }

    /// Fetch every page of `plan` against `table`.
    ///
    /// Pages are fetched one after another. With `min_results` set, paging
    /// stops as soon as that many items are accumulated, even if the store
    /// reported more.
    pub async fn fetch_all(
        &self,
        plan: &QueryPlan,
        table: &str,
        min_results: Option<usize>,
    ) -> OrmResult<Vec<Item>> {
        let started = Instant::now();
        let mut items: Vec<Item> = Vec::new();
        let mut pages = 0_usize;
        let mut start_key: Option<Item> = None;

        let mut query = match plan {
            QueryPlan::Query(d) => Some(d.to_query_input(table)),
            QueryPlan::Scan(_) => None,
        };
        let mut scan = match plan {
            QueryPlan::Scan(d) => Some(d.to_scan_input(table)),
            QueryPlan::Query(_) => None,
        };

        loop {
            let (page, next) = if let Some(input) = query.as_mut() {
                input.exclusive_start_key = start_key.take().unwrap_or_default();
                timed("Query", self.request_timeout, self.store.query(input.clone()))
                    .await?
                    .into_parts()
            } else if let Some(input) = scan.as_mut() {
                input.exclusive_start_key = start_key.take().unwrap_or_default();
                timed("Scan", self.request_timeout, self.store.scan(input.clone()))
                    .await?
                    .into_parts()
            } else {
                break;
            };
            pages += 1;
            debug!(table, page = pages, page_items = page.len(), "page fetched");
            items.extend(page);

            match next {
                None => break,
                Some(_) if min_results.is_some_and(|min| items.len() >= min) => {
                    debug!(
                        table,
                        accumulated = items.len(),
                        min_results,
                        "minimum reached, not following continuation key"
                    );
                    break;
                }
                Some(key) => start_key = Some(key),
            }
        }

        debug!(
            table,
            operation = if plan.is_query() { "Query" } else { "Scan" },
            index = ?plan.descriptor().index_name,
            pages,
            items = items.len(),
            elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
            "paged fetch complete"
        );
        Ok(items)
    }
}

/// `items[offset..offset + limit]`, clamped to what is available.
#[must_use]
pub fn apply_window<T>(items: Vec<T>, offset: usize, limit: Option<usize>) -> Vec<T> {
    let take = limit.unwrap_or(usize::MAX);
    items.into_iter().skip(offset).take(take).collect()
}

/// Window then order fetched records as the filter asks.
///
/// Without an `order`, records are sorted ascending on the model's default
/// sort key.
#[must_use]
pub fn shape(
    records: Vec<Map<String, Value>>,
    filter: &Filter,
    schema: &ModelSchema,
) -> Vec<Map<String, Value>> {
    let mut records = apply_window(records, filter.offset, filter.limit);
    if filter.order.is_empty() {
        let default = [OrderSpec {
            field: schema.default_sort_key().to_owned(),
            descending: false,
        }];
        sort_records(&mut records, &default);
    } else {
        sort_records(&mut records, &filter.order);
    }
    records
}

/// Stable sort on several keys, left to right.
pub fn sort_records(records: &mut [Map<String, Value>], order: &[OrderSpec]) {
    records.sort_by(|a, b| {
        order
            .iter()
            .map(|spec| {
                let ord = compare_values(a.get(&spec.field), b.get(&spec.field));
                if spec.descending { ord.reverse() } else { ord }
            })
            .find(|ord| ord.is_ne())
            .unwrap_or(Ordering::Equal)
    });
}

fn type_rank(value: Option<&Value>) -> u8 {
    match value {
        None | Some(Value::Null) => 0,
        Some(Value::Bool(_)) => 1,
        Some(Value::Number(_)) => 2,
        Some(Value::String(_)) => 3,
        Some(Value::Array(_)) => 4,
        Some(Value::Object(_)) => 5,
    }
}

/// Sort comparison: strings case-insensitively, numbers numerically, missing
/// values first.
#[must_use]
pub fn compare_values(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    match (a, b) {
        (Some(Value::String(x)), Some(Value::String(y))) => x
            .to_lowercase()
            .cmp(&y.to_lowercase())
            .then_with(|| x.cmp(y)),
        (Some(Value::Number(x)), Some(Value::Number(y))) => match (x.as_i64(), y.as_i64()) {
            (Some(x), Some(y)) => x.cmp(&y),
            _ => x
                .as_f64()
                .unwrap_or(0.0)
                .total_cmp(&y.as_f64().unwrap_or(0.0)),
        },
        (Some(Value::Bool(x)), Some(Value::Bool(y))) => x.cmp(y),
        _ => type_rank(a).cmp(&type_rank(b)),
    }
}
