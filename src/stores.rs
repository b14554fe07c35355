//! Store enumeration with exclusion filtering
//!
//! Profiles frequently carry large shared mailboxes that are irrelevant to
//! the caller. Stores named in the [`ExclusionList`] are hidden from listing,
//! from store-qualified path resolution and from folder tree walks.

use std::collections::HashSet;

use tracing::debug;

use crate::host::{AutomationHost, HostResult, StoreInfo};

/// Store display names to hide; matching is exact
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExclusionList {
    names: HashSet<String>,
}

impl ExclusionList {
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            names: names.into_iter().map(Into::into).collect(),
        }
    }

    pub fn is_excluded(&self, store_name: &str) -> bool {
        self.names.contains(store_name)
    }

    /// Excluded names in lexical order
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.names.iter().cloned().collect();
        names.sort();
        names
    }
}

/// List attached stores, skipping excluded names
///
/// Performs a single `stores` call; the returned iterator filters lazily and
/// can be recreated by calling again. A profile with no accessible stores
/// yields an empty sequence.
pub fn list_stores<'a>(
    host: &mut dyn AutomationHost,
    exclusions: &'a ExclusionList,
) -> HostResult<impl Iterator<Item = StoreInfo> + use<'a>> {
    let stores = host.stores()?;
    debug!(attached = stores.len(), "enumerated profile stores");
    Ok(stores
        .into_iter()
        .filter(move |store| !exclusions.is_excluded(&store.display_name)))
}
