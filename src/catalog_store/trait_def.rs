//! CatalogStore trait definition.
//!
//! Identity resolution and the acquisition orchestrator only talk to storage
//! through this trait.

use super::models::{ExternalResource, Item, Relation, ResourceState};
use crate::document::{CoverImage, ItemKind};
use crate::sites::IdType;
use anyhow::Result;

pub trait CatalogStore: Send + Sync {
    // =========================================================================
    // Items
    // =========================================================================

    fn insert_item(&self, item: &Item) -> Result<()>;

    fn get_item(&self, id: &str) -> Result<Option<Item>>;

    /// Overwrites every column of an existing item and bumps `updated_at`.
    fn update_item(&self, item: &Item) -> Result<()>;

    /// A live item of `kind` known by `(id_type, id_value)`, either as its
    /// primary lookup id or through one of its external resources. The item
    /// may itself be merged; callers walk the chain.
    fn find_item_by_lookup(
        &self,
        kind: ItemKind,
        id_type: IdType,
        id_value: &str,
    ) -> Result<Option<Item>>;

    /// Ids of the items whose `merged_to` points at `id`.
    fn merged_from(&self, id: &str) -> Result<Vec<String>>;

    fn children_of(&self, id: &str) -> Result<Vec<Item>>;

    /// Number of items not soft-deleted, merged ones included.
    fn item_count(&self) -> Result<usize>;

    /// Soft-deletes the item and removes its external resources.
    fn delete_item(&self, id: &str) -> Result<()>;

    // =========================================================================
    // External Resources
    // =========================================================================

    fn get_resource(&self, id_type: IdType, id_value: &str) -> Result<Option<ExternalResource>>;

    /// Inserts or updates the row for `(id_type, id_value)` and returns it
    /// with its row id.
    fn upsert_resource(&self, resource: &ExternalResource) -> Result<ExternalResource>;

    fn set_resource_state(
        &self,
        id_type: IdType,
        id_value: &str,
        state: ResourceState,
        error: Option<&str>,
    ) -> Result<()>;

    fn attach_resource(&self, id_type: IdType, id_value: &str, item_id: &str) -> Result<()>;

    fn resources_of_item(&self, item_id: &str) -> Result<Vec<ExternalResource>>;

    // =========================================================================
    // Relations
    // =========================================================================

    /// Adds a relation, keeping an existing non-null qualifier when the key
    /// is already present.
    fn add_relation(
        &self,
        subject_id: &str,
        object_id: &str,
        role: &str,
        qualifier: Option<&str>,
    ) -> Result<()>;

    /// Relations where the item is either subject or object.
    fn relations_of(&self, item_id: &str) -> Result<Vec<Relation>>;

    // =========================================================================
    // Covers
    // =========================================================================

    fn save_cover(&self, item_id: &str, cover: &CoverImage) -> Result<()>;

    fn get_cover(&self, item_id: &str) -> Result<Option<CoverImage>>;

    // =========================================================================
    // Merge
    // =========================================================================

    /// Applies a merge atomically: writes both items as given, moves the
    /// source's relations, external resources and children to the target.
    /// Relations whose key already exists on the target collapse into one,
    /// keeping a non-null qualifier. Returns the number of relations moved.
    fn commit_merge(&self, source: &Item, target: &Item) -> Result<usize>;
}
