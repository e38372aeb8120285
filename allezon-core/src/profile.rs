//! Bounded, time-ordered per-user event history.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::StoreConfig;
use crate::model::{Action, TimeRange, UserTag};
use crate::store::{KvBackend, OccStore, Result};

/// Events kept per action and user.
pub const PROFILE_CAP: usize = 200;

/// Views and buys of one user, newest first.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    #[serde(default)]
    pub views: Vec<UserTag>,
    #[serde(default)]
    pub buys: Vec<UserTag>,
}

impl UserProfile {
    pub fn events(&self, action: Action) -> &[UserTag] {
        match action {
            Action::View => &self.views,
            Action::Buy => &self.buys,
        }
    }

    fn events_mut(&mut self, action: Action) -> &mut Vec<UserTag> {
        match action {
            Action::View => &mut self.views,
            Action::Buy => &mut self.buys,
        }
    }

    /// Insert `tag` into the list for its action, keeping at most `cap` entries.
    pub fn insert(&mut self, tag: UserTag, cap: usize) {
        let events = self.events_mut(tag.action);
        insert_sorted(events, tag);
        events.truncate(cap);
    }

    /// Entries with time in `range`, at most `limit` per list, newest first.
    pub fn window(&self, range: &TimeRange, limit: usize) -> UserProfile {
        let select = |events: &[UserTag]| -> Vec<UserTag> {
            events
                .iter()
                .filter(|tag| range.contains(tag.time))
                .take(limit)
                .cloned()
                .collect()
        };
        UserProfile {
            views: select(&self.views),
            buys: select(&self.buys),
        }
    }
}

/// Descending by time; a new tag goes before existing tags with the same time.
fn insert_sorted(events: &mut Vec<UserTag>, tag: UserTag) {
    let index = events.partition_point(|existing| existing.time > tag.time);
    events.insert(index, tag);
}

/// Profiles persisted through generation-checked writes, keyed by cookie.
#[derive(Clone)]
pub struct ProfileStore {
    store: OccStore<UserProfile>,
    retries: u32,
    cap: usize,
}

impl ProfileStore {
    pub fn new(backend: Arc<dyn KvBackend>, config: &StoreConfig) -> Self {
        Self {
            store: OccStore::new(backend, config.profile_namespace.clone(), config.op_timeout),
            retries: config.profile_retries,
            cap: config.profile_cap,
        }
    }

    /// Add `tag` to its user's profile.
    pub async fn insert(&self, tag: &UserTag) -> Result<UserProfile> {
        let cap = self.cap;
        let profile = self
            .store
            .rmw(&tag.cookie, self.retries, &UserProfile::default(), |profile| {
                profile.insert(tag.clone(), cap)
            })
            .await?;
        debug!(
            cookie = %tag.cookie,
            views = profile.views.len(),
            buys = profile.buys.len(),
            "Profile updated"
        );
        Ok(profile)
    }

    /// The stored profile; a user never seen has an empty one.
    pub async fn read(&self, cookie: &str) -> Result<UserProfile> {
        match self.store.get(cookie).await {
            Ok(profile) => Ok(profile),
            Err(e) if e.is_not_found() => Ok(UserProfile::default()),
            Err(e) => Err(e),
        }
    }

    pub async fn ping(&self) -> Result<()> {
        self.store.backend().ping().await
    }
}
