use super::{
    ConnectionDetail,
    ConnectionRef,
    ListingKind,
};
use serde_json::Value;
use std::collections::HashMap;

/// Why a path's reference could not be matched to a listing entry.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum Unresolved {
    #[error("reference carries no type")]
    MissingType,
    #[error("no listing exists for type {0}")]
    Unlisted(String),
    #[error("reference carries no usable key")]
    MissingKey,
    #[error("no {kind} listed under {key}")]
    NotListed { kind: ListingKind, key: String },
}

#[derive(Debug, Clone, PartialEq)]
pub enum Resolution<'a> {
    Resolved(&'a ConnectionDetail),
    Unresolved(Unresolved),
}

/// Connection listings of one cycle, indexed the way each kind is looked up.
#[derive(Debug, Clone, Default)]
pub struct Listings {
    indexes: HashMap<ListingKind, HashMap<String, ConnectionDetail>>,
}

impl Listings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Indexes raw listing items of `kind`. Entries that do not decode or lack
    /// their index field are skipped. Returns how many were indexed.
    pub fn insert_items(&mut self, kind: ListingKind, items: Vec<Value>) -> usize {
        let mut indexed = 0;
        for item in items {
            match serde_json::from_value::<ConnectionDetail>(item) {
                Ok(detail) => {
                    if self.insert(kind, detail) {
                        indexed += 1;
                    }
                }
                Err(err) => warn!(%kind, %err, "Skipping undecodable listing entry"),
            }
        }
        indexed
    }

    /// Indexes one entry, replacing an earlier one with the same key.
    pub fn insert(&mut self, kind: ListingKind, detail: ConnectionDetail) -> bool {
        let Some(key) = kind.lookup().index_key(&detail).map(str::to_string) else {
            debug!(%kind, "Skipping listing entry without index key");
            return false;
        };
        self.indexes.entry(kind).or_default().insert(key, detail);
        true
    }

    pub fn len(&self, kind: ListingKind) -> usize {
        self.indexes.get(&kind).map_or(0, HashMap::len)
    }

    pub fn is_empty(&self) -> bool {
        self.indexes.values().all(HashMap::is_empty)
    }

    /// Finds the listing entry a reference on `path_name` points to.
    pub fn resolve(&self, reference: &ConnectionRef, path_name: &str) -> Resolution<'_> {
        let kind = match &reference.kind {
            Some(kind) => kind,
            None => return Resolution::Unresolved(Unresolved::MissingType),
        };
        let Some(listing) = kind.listing() else {
            return Resolution::Unresolved(Unresolved::Unlisted(kind.to_string()));
        };
        let Some(key) = listing.lookup().reference_key(reference, path_name) else {
            return Resolution::Unresolved(Unresolved::MissingKey);
        };

        match self.indexes.get(&listing).and_then(|index| index.get(key)) {
            Some(detail) => Resolution::Resolved(detail),
            None => Resolution::Unresolved(Unresolved::NotListed {
                kind: listing,
                key: key.to_string(),
            }),
        }
    }
}
