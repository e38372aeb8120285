//! Tag ingestion: profile update plus publication to the tag stream.

use std::sync::Arc;

use thiserror::Error;
use tracing::{trace, warn};

use allezon_log::EventLog;

use crate::model::UserTag;
use crate::profile::ProfileStore;

#[derive(Error, Debug)]
pub enum IngestError {
    #[error("failed to publish tag for cookie {cookie:?}: {source}")]
    Publish {
        cookie: String,
        #[source]
        source: allezon_log::Error,
    },
}

/// Accepts tags from the outside world.
#[derive(Clone)]
pub struct Ingestor {
    profiles: ProfileStore,
    tags: Arc<dyn EventLog<UserTag>>,
}

impl Ingestor {
    pub fn new(profiles: ProfileStore, tags: Arc<dyn EventLog<UserTag>>) -> Self {
        Self { profiles, tags }
    }

    /// Record `tag` in its user's profile and publish it for aggregation.
    ///
    /// A failed profile update is logged and does not stop publication;
    /// only a failed publish is returned.
    pub async fn ingest(&self, tag: UserTag) -> Result<(), IngestError> {
        if let Err(e) = self.profiles.insert(&tag).await {
            warn!(cookie = %tag.cookie, error = %e, "Dropped profile update");
        }

        let cookie = tag.cookie.clone();
        let offset = self
            .tags
            .append(tag)
            .await
            .map_err(|source| IngestError::Publish {
                cookie: cookie.clone(),
                source,
            })?;
        trace!(cookie = %cookie, offset, "Tag published");
        Ok(())
    }
}
