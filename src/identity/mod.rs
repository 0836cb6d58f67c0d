//! Canonical entity matching, merging and merge-chain resolution.

mod merge;

pub use merge::{absorb_document, copy_missing_fields, merge_items};

use crate::catalog_store::{CatalogStore, Item};
use crate::document::{ItemKind, NormalizedDocument};
use crate::metrics;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, error, info};

#[derive(Debug, Error)]
pub enum IdentityError {
    #[error("Merge chain starting at {id} exceeds the hop limit after {hops} hops")]
    MergeChainTooLong { id: String, hops: usize },

    #[error("Cannot merge item {0} into itself")]
    SelfMerge(String),

    #[error("Merge chain starting at {item} loops back through {target}")]
    MergeCycle { item: String, target: String },

    #[error("Cannot merge a {from} into a {into}")]
    KindMismatch { from: ItemKind, into: ItemKind },

    #[error("Item {0} not found")]
    NotFound(String),

    #[error("Item {0} is merged, merged into, or related, and cannot be deleted")]
    NotDeletable(String),

    #[error(transparent)]
    Store(#[from] anyhow::Error),
}

/// Result of matching a document against existing items.
#[derive(Debug, Clone)]
pub struct Matched {
    pub item: Item,
    pub created: bool,
}

pub struct IdentityResolver {
    store: Arc<dyn CatalogStore>,
    hop_limit: usize,
}

impl IdentityResolver {
    pub fn new(store: Arc<dyn CatalogStore>, hop_limit: usize) -> Self {
        Self { store, hop_limit }
    }

    pub fn store(&self) -> &Arc<dyn CatalogStore> {
        &self.store
    }

    fn load(&self, id: &str) -> Result<Item, IdentityError> {
        self.store
            .get_item(id)?
            .ok_or_else(|| IdentityError::NotFound(id.to_string()))
    }

    /// Follows `merged_to` pointers from `id` to the live item it stands for.
    pub fn resolve(&self, id: &str) -> Result<Item, IdentityError> {
        let item = self.load(id)?;
        self.resolve_item(item)
    }

    /// Like [`resolve`](Self::resolve) for an already loaded item. At most
    /// `hop_limit - 1` hops are walked. Every intermediate item of a
    /// successful walk is re-pointed at the terminal one.
    pub fn resolve_item(&self, start: Item) -> Result<Item, IdentityError> {
        let mut chain: Vec<Item> = Vec::new();
        let mut current = start;
        while let Some(next_id) = current.merged_to.clone() {
            let hops = chain.len() + 1;
            if hops >= self.hop_limit {
                let id = chain.first().map_or(&current.id, |i| &i.id).clone();
                error!(id = %id, hops, "Merge chain exceeds the hop limit of {}", self.hop_limit);
                return Err(IdentityError::MergeChainTooLong { id, hops });
            }
            if next_id == current.id || chain.iter().any(|i| i.id == next_id) {
                let item = chain.first().map_or(&current.id, |i| &i.id).clone();
                error!(id = %item, hops, "Merge chain loops back through {}", next_id);
                return Err(IdentityError::MergeCycle {
                    item,
                    target: next_id,
                });
            }
            let next = self.load(&next_id)?;
            chain.push(std::mem::replace(&mut current, next));
        }

        if current.is_deleted {
            return Err(IdentityError::NotFound(current.id));
        }

        if chain.len() > 1 {
            let terminal = current.id.clone();
            let stale = chain
                .into_iter()
                .filter(|i| i.merged_to.as_deref() != Some(terminal.as_str()));
            for mut item in stale {
                debug!("Compressing merge pointer of {} to {}", item.id, terminal);
                item.merged_to = Some(terminal.clone());
                self.store.update_item(&item)?;
            }
        }
        Ok(current)
    }

    /// The live item already known for `document`: prematched resources
    /// first, then lookup ids with ideal types first. Items of another kind
    /// never match.
    pub fn match_existing(&self, document: &NormalizedDocument) -> Result<Option<Item>, IdentityError> {
        let kind = document.kind();
        for link in &document.header.prematched_resources {
            let Some(resource) = self.store.get_resource(link.id_type, &link.id_value)? else {
                continue;
            };
            let Some(item_id) = resource.item_id else {
                continue;
            };
            let item = match self.resolve(&item_id) {
                Ok(item) => item,
                Err(IdentityError::NotFound(_)) => continue,
                Err(e) => return Err(e),
            };
            if item.kind == kind {
                return Ok(Some(item));
            }
        }
        for (id_type, id_value) in document.ordered_lookup_ids() {
            if let Some(item) = self.store.find_item_by_lookup(kind, id_type, id_value)? {
                return self.resolve_item(item).map(Some);
            }
        }
        Ok(None)
    }

    /// Matches `document` to an existing item, folding its fields in, or
    /// creates a new item from it.
    pub fn match_or_create(&self, document: &NormalizedDocument) -> Result<Matched, IdentityError> {
        if let Some(mut item) = self.match_existing(document)? {
            absorb_document(&mut item, document);
            let is_ideal = item
                .primary_lookup_id
                .as_ref()
                .is_some_and(|(id_type, _)| id_type.is_ideal());
            if !is_ideal {
                if let Some((id_type, id_value)) = document
                    .ordered_lookup_ids()
                    .into_iter()
                    .find(|(t, _)| t.is_ideal())
                {
                    info!(
                        "Upgrading primary lookup of {} to {}:{}",
                        item.id,
                        id_type.to_db_str(),
                        id_value
                    );
                    item.primary_lookup_id = Some((id_type, id_value.to_string()));
                }
            }
            self.store.update_item(&item)?;
            return Ok(Matched {
                item,
                created: false,
            });
        }

        let item = Item::from_document(document);
        self.store.insert_item(&item)?;
        info!("Created {} item {} \"{}\"", item.kind, item.id, item.title);
        Ok(Matched {
            item,
            created: true,
        })
    }

    /// Merges `source_id` into `target_id` and returns the updated target.
    /// Both ends are first resolved to their live items.
    pub fn merge_to(&self, source_id: &str, target_id: &str) -> Result<Item, IdentityError> {
        let source = self.resolve(source_id)?;
        let mut target = self.resolve(target_id)?;
        if source.id == target.id {
            return Err(IdentityError::SelfMerge(source.id));
        }
        if source.kind != target.kind {
            return Err(IdentityError::KindMismatch {
                from: source.kind,
                into: target.kind,
            });
        }

        merge_items(&source, &mut target);
        let mut source = source;
        source.merged_to = Some(target.id.clone());
        let moved = self.store.commit_merge(&source, &target)?;
        metrics::record_merge();
        info!(
            "Merged item {} into {}, {} relations moved",
            source.id, target.id, moved
        );
        Ok(target)
    }

    /// Only items with no merge history and no relations may be deleted.
    pub fn is_deletable(&self, id: &str) -> Result<bool, IdentityError> {
        let item = self.load(id)?;
        Ok(!item.is_deleted
            && !item.is_merged()
            && self.store.merged_from(id)?.is_empty()
            && self.store.relations_of(id)?.is_empty())
    }

    pub fn delete(&self, id: &str) -> Result<(), IdentityError> {
        if !self.is_deletable(id)? {
            return Err(IdentityError::NotDeletable(id.to_string()));
        }
        self.store.delete_item(id)?;
        info!("Deleted item {}", id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog_store::SqliteCatalogStore;
    use crate::document::{DocumentHeader, MovieDetails, WorkDetails};
    use crate::sites::IdType;

    fn resolver() -> IdentityResolver {
        IdentityResolver::new(Arc::new(SqliteCatalogStore::in_memory().unwrap()), 5)
    }

    fn movie_doc(title: &str, lookups: &[(IdType, &str)]) -> NormalizedDocument {
        let mut header = DocumentHeader::new(title);
        for (t, v) in lookups {
            header.add_lookup_id(*t, Some(v));
        }
        NormalizedDocument::new(header, WorkDetails::Movie(MovieDetails::default()))
    }

    #[test]
    fn test_match_or_create_reuses_lookup() {
        let identity = resolver();
        let first = identity
            .match_or_create(&movie_doc("Alien", &[(IdType::Imdb, "tt0078748")]))
            .unwrap();
        let second = identity
            .match_or_create(&movie_doc("Alien (1979)", &[(IdType::Imdb, "tt0078748")]))
            .unwrap();

        assert!(first.created);
        assert!(!second.created);
        assert_eq!(first.item.id, second.item.id);
        assert_eq!(identity.store().item_count().unwrap(), 1);
    }

    #[test]
    fn test_primary_lookup_is_upgraded_to_ideal() {
        let identity = resolver();
        let first = identity
            .match_or_create(&movie_doc("Alien", &[(IdType::TmdbMovie, "348")]))
            .unwrap();
        let second = identity
            .match_or_create(&movie_doc(
                "Alien",
                &[(IdType::TmdbMovie, "348"), (IdType::Imdb, "tt0078748")],
            ))
            .unwrap();

        assert_eq!(first.item.id, second.item.id);
        assert_eq!(
            second.item.primary_lookup_id,
            Some((IdType::Imdb, "tt0078748".to_string()))
        );
    }

    #[test]
    fn test_self_merge_is_rejected() {
        let identity = resolver();
        let item = identity
            .match_or_create(&movie_doc("Alien", &[]))
            .unwrap()
            .item;
        assert!(matches!(
            identity.merge_to(&item.id, &item.id),
            Err(IdentityError::SelfMerge(_))
        ));
    }

    #[test]
    fn test_merge_kind_mismatch() {
        let identity = resolver();
        let film = identity.match_or_create(&movie_doc("Alien", &[])).unwrap().item;
        let person = Item::new(ItemKind::People, "Ridley Scott");
        identity.store().insert_item(&person).unwrap();
        assert!(matches!(
            identity.merge_to(&person.id, &film.id),
            Err(IdentityError::KindMismatch { .. })
        ));
    }
}
