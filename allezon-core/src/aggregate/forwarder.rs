//! Turns tags into rollup increments.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::trace;

use allezon_log::{EventLog, Partitionable};

use crate::model::{UserTag, bucket_start};
use crate::rollup::{Dimensions, RollupKey, derive_key, power_set};

/// One unit of count and `price` for a rollup cell.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Increment {
    pub key: RollupKey,
    pub price: i64,
}

impl Partitionable for Increment {
    fn partition_key(&self) -> Option<&str> {
        Some(self.key.as_str())
    }
}

/// Increments for every subset of the tag's present dimensions.
///
/// A tag with `k` present dimensions yields `2^k` increments, one of them
/// for the dimensionless total.
pub fn fan_out(tag: &UserTag) -> Vec<Increment> {
    let bucket = bucket_start(tag.time);
    let dimensions = Dimensions::of_tag(tag);
    let price = i64::from(tag.product.price);

    power_set(&dimensions.present())
        .map(|subset| Increment {
            key: derive_key(bucket, tag.action, &subset),
            price,
        })
        .collect()
}

/// Publishes the increments of each tag to the increment stream.
#[derive(Clone)]
pub struct Forwarder {
    increments: Arc<dyn EventLog<Increment>>,
}

impl Forwarder {
    pub fn new(increments: Arc<dyn EventLog<Increment>>) -> Self {
        Self { increments }
    }

    /// Fan out `tag` and publish the result. Returns the number of increments.
    pub async fn forward(&self, tag: &UserTag) -> allezon_log::Result<usize> {
        let increments = fan_out(tag);
        let count = increments.len();
        self.increments.append_batch(increments).await?;
        trace!(cookie = %tag.cookie, count, "Forwarded increments");
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::tag::fixtures::tag_at;
    use crate::rollup::Dimension;
    use allezon_log::PartitionedEventLog;
    use std::collections::HashSet;

    #[test]
    fn full_tag_fans_out_to_eight_unique_keys() {
        let increments = fan_out(&tag_at("u", 30));

        assert_eq!(increments.len(), 8);
        let keys: HashSet<_> = increments.iter().map(|i| i.key.clone()).collect();
        assert_eq!(keys.len(), 8);
        assert!(increments.iter().all(|i| i.price == 100));
    }

    #[test]
    fn fan_out_includes_total_and_single_filter_keys() {
        let tag = tag_at("u", 30);
        let bucket = bucket_start(tag.time);
        let keys: HashSet<_> = fan_out(&tag).into_iter().map(|i| i.key).collect();

        assert!(keys.contains(&derive_key(bucket, tag.action, &[])));
        assert!(keys.contains(&derive_key(bucket, tag.action, &[(Dimension::BrandId, "b1")])));
        assert!(keys.contains(&derive_key(
            bucket,
            tag.action,
            &[(Dimension::Origin, "shop1"), (Dimension::CategoryId, "c1")]
        )));
    }

    #[test]
    fn empty_dimensions_shrink_fan_out() {
        let mut tag = tag_at("u", 30);
        tag.origin.clear();
        tag.product.brand_id.clear();

        assert_eq!(fan_out(&tag).len(), 2);
    }

    #[test]
    fn tags_in_same_minute_share_keys() {
        let early: HashSet<_> = fan_out(&tag_at("a", 1)).into_iter().map(|i| i.key).collect();
        let late: HashSet<_> = fan_out(&tag_at("b", 59)).into_iter().map(|i| i.key).collect();
        let next: HashSet<_> = fan_out(&tag_at("c", 60)).into_iter().map(|i| i.key).collect();

        assert_eq!(early, late);
        assert!(early.is_disjoint(&next));
    }

    #[tokio::test]
    async fn forward_publishes_every_increment() {
        let log = Arc::new(PartitionedEventLog::<Increment>::new(4).unwrap());
        let forwarder = Forwarder::new(log.clone());

        let count = forwarder.forward(&tag_at("u", 0)).await.unwrap();

        assert_eq!(count, 8);
        assert_eq!(log.total_count().await, 8);
    }
}
