//! Aggregate functions and result columns of the aggregate query.

string_enum! {
    /// Aggregate function requested by a query.
    pub enum Aggregate as "aggregate" {
        Count => "COUNT",
        SumPrice => "SUM_PRICE",
    }
}

string_enum! {
    /// Column of an aggregate result table.
    pub enum AggregateColumn as "aggregate column" {
        Bucket => "1m_bucket",
        Action => "action",
        Origin => "origin",
        BrandId => "brand_id",
        CategoryId => "category_id",
        SumPrice => "sum_price",
        Count => "count",
    }
}

impl Aggregate {
    /// Result column holding this aggregate.
    pub fn column(self) -> AggregateColumn {
        match self {
            Aggregate::Count => AggregateColumn::Count,
            Aggregate::SumPrice => AggregateColumn::SumPrice,
        }
    }
}
