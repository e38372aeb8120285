//! Aggregate query endpoint

use std::sync::Arc;

use axum::Json;
use axum::extract::{Query, State};

use allezon_core::{
    Action, Aggregate, AggregateQuery, AggregateTable, Dimensions, TimeRange, ValidationError,
};

use crate::{AppState, ServerError};

/// POST /aggregates - per-minute counts and price sums
///
/// `aggregates` may be repeated, comma separated, or both.
pub async fn post_aggregates(
    State(state): State<Arc<AppState>>,
    Query(params): Query<Vec<(String, String)>>,
) -> Result<Json<AggregateTable>, ServerError> {
    let query = parse_query(&params)?;
    let table = state.resolver.resolve(&query).await?;
    Ok(Json(table))
}

fn parse_query(params: &[(String, String)]) -> Result<AggregateQuery, ValidationError> {
    let single = |name: &'static str| {
        params
            .iter()
            .rev()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    };
    let filter = |name: &'static str| {
        single(name)
            .filter(|value| !value.is_empty())
            .map(str::to_string)
    };

    let range = TimeRange::parse(
        single("time_range").ok_or(ValidationError::MissingParameter("time_range"))?,
    )?;
    let action =
        Action::parse(single("action").ok_or(ValidationError::MissingParameter("action"))?)?;

    let aggregates = params
        .iter()
        .filter(|(key, _)| key == "aggregates")
        .flat_map(|(_, value)| value.split(','))
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(Aggregate::parse)
        .collect::<Result<Vec<_>, _>>()?;
    if aggregates.is_empty() {
        return Err(ValidationError::MissingParameter("aggregates"));
    }

    Ok(AggregateQuery {
        range,
        action,
        filters: Dimensions {
            origin: filter("origin"),
            brand_id: filter("brand_id"),
            category_id: filter("category_id"),
        },
        aggregates,
    })
}
