//! Aggregate queries over one-minute rollup buckets.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use super::accumulator::RollupLookup;
use super::table::RollupCounter;
use crate::config::QueryConfig;
use crate::error::ValidationError;
use crate::model::{Action, Aggregate, AggregateColumn, TimeRange, format_bucket};
use crate::rollup::{Dimension, Dimensions, derive_key};
use crate::store::StoreError;

#[derive(Error, Debug)]
pub enum QueryError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("rollup lookup for bucket {bucket} failed: {source}")]
    Lookup {
        bucket: String,
        #[source]
        source: StoreError,
    },
}

/// What to aggregate: a range, an action, optional filters and the aggregates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AggregateQuery {
    pub range: TimeRange,
    pub action: Action,
    pub filters: Dimensions,
    pub aggregates: Vec<Aggregate>,
}

impl AggregateQuery {
    /// Result columns: bucket, action, supplied filters, requested aggregates.
    pub fn columns(&self) -> Vec<AggregateColumn> {
        let mut columns = vec![AggregateColumn::Bucket, AggregateColumn::Action];
        columns.extend(
            self.filters
                .present()
                .into_iter()
                .map(|(dimension, _)| filter_column(dimension)),
        );
        columns.extend(self.aggregates.iter().map(|aggregate| aggregate.column()));
        columns
    }
}

fn filter_column(dimension: Dimension) -> AggregateColumn {
    match dimension {
        Dimension::Origin => AggregateColumn::Origin,
        Dimension::BrandId => AggregateColumn::BrandId,
        Dimension::CategoryId => AggregateColumn::CategoryId,
    }
}

/// One bucket's worth of data, before it is laid out in columns.
pub struct AggregateRow<'a> {
    pub bucket: DateTime<Utc>,
    pub action: Action,
    pub filters: &'a Dimensions,
    pub counter: RollupCounter,
}

type Accessor = fn(&AggregateRow<'_>) -> String;

fn filter_value(row: &AggregateRow<'_>, dimension: Dimension) -> String {
    row.filters.get(dimension).unwrap_or_default().to_string()
}

/// Cell extractor for each result column.
fn accessor(column: AggregateColumn) -> Accessor {
    match column {
        AggregateColumn::Bucket => |row: &AggregateRow<'_>| format_bucket(row.bucket),
        AggregateColumn::Action => |row: &AggregateRow<'_>| row.action.as_str().to_string(),
        AggregateColumn::Origin => |row: &AggregateRow<'_>| filter_value(row, Dimension::Origin),
        AggregateColumn::BrandId => |row: &AggregateRow<'_>| filter_value(row, Dimension::BrandId),
        AggregateColumn::CategoryId => {
            |row: &AggregateRow<'_>| filter_value(row, Dimension::CategoryId)
        }
        AggregateColumn::SumPrice => |row: &AggregateRow<'_>| row.counter.sum_price.to_string(),
        AggregateColumn::Count => |row: &AggregateRow<'_>| row.counter.count.to_string(),
    }
}

/// Query result: named columns and one row of string cells per bucket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregateTable {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

/// Answers aggregate queries by re-deriving rollup keys per bucket.
#[derive(Clone)]
pub struct QueryResolver {
    lookup: Arc<dyn RollupLookup>,
    config: QueryConfig,
}

impl QueryResolver {
    pub fn new(lookup: Arc<dyn RollupLookup>, config: QueryConfig) -> Self {
        Self { lookup, config }
    }

    pub async fn resolve(&self, query: &AggregateQuery) -> Result<AggregateTable, QueryError> {
        let buckets = query.range.bucket_count();
        if buckets > self.config.max_buckets {
            return Err(ValidationError::TimeRangeTooLarge {
                buckets,
                max: self.config.max_buckets,
            }
            .into());
        }
        if query.aggregates.is_empty() {
            return Err(ValidationError::MissingParameter("aggregates").into());
        }

        let columns = query.columns();
        let accessors: Vec<Accessor> = columns.iter().map(|column| accessor(*column)).collect();
        let dims = query.filters.present();

        let mut rows = Vec::with_capacity(buckets as usize);
        for bucket in query.range.buckets() {
            let key = derive_key(bucket, query.action, &dims);
            let counter = self
                .lookup
                .lookup(&key)
                .await
                .map_err(|source| QueryError::Lookup {
                    bucket: format_bucket(bucket),
                    source,
                })?
                .unwrap_or_default();

            let row = AggregateRow {
                bucket,
                action: query.action,
                filters: &query.filters,
                counter,
            };
            rows.push(accessors.iter().map(|cell| cell(&row)).collect());
        }

        debug!(
            action = %query.action,
            buckets,
            filters = dims.len(),
            "Resolved aggregate query"
        );
        Ok(AggregateTable {
            columns: columns.iter().map(|c| c.as_str().to_string()).collect(),
            rows,
        })
    }
}
