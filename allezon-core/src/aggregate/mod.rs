//! Rollup aggregation: fan-out, accumulation and queries.

mod accumulator;
mod forwarder;
mod query;
mod table;

pub use accumulator::{RollupAccumulator, RollupLookup};
pub use forwarder::{Forwarder, Increment, fan_out};
pub use query::{AggregateQuery, AggregateRow, AggregateTable, QueryError, QueryResolver};
pub use table::{KvRollupTable, RollupCounter, RollupTable};
