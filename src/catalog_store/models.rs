//! Rows of the catalog database.

use crate::document::{ItemKind, LocalizedText, NormalizedDocument, WorkDetails};
use crate::sites::IdType;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

// =============================================================================
// Resource lifecycle
// =============================================================================

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub enum ResourceState {
    Unresolved,
    Fetching,
    Ready,
    Failed,
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("Invalid resource state transition {from:?} -> {to:?}")]
pub struct InvalidTransition {
    pub from: ResourceState,
    pub to: ResourceState,
}

impl ResourceState {
    pub fn from_db_str(s: &str) -> Self {
        match s {
            "fetching" => ResourceState::Fetching,
            "ready" => ResourceState::Ready,
            "failed" => ResourceState::Failed,
            _ => ResourceState::Unresolved,
        }
    }

    pub fn to_db_str(&self) -> &'static str {
        match self {
            ResourceState::Unresolved => "unresolved",
            ResourceState::Fetching => "fetching",
            ResourceState::Ready => "ready",
            ResourceState::Failed => "failed",
        }
    }

    /// `Ready` and `Failed` may both go back to `Fetching`: the former on a
    /// forced re-scrape, the latter on a later retry.
    pub fn can_transition_to(&self, next: ResourceState) -> bool {
        matches!(
            (self, next),
            (ResourceState::Unresolved, ResourceState::Fetching)
                | (ResourceState::Fetching, ResourceState::Ready)
                | (ResourceState::Fetching, ResourceState::Failed)
                | (ResourceState::Ready, ResourceState::Fetching)
                | (ResourceState::Failed, ResourceState::Fetching)
        )
    }

    pub fn transition(self, next: ResourceState) -> Result<ResourceState, InvalidTransition> {
        if self.can_transition_to(next) {
            Ok(next)
        } else {
            Err(InvalidTransition {
                from: self,
                to: next,
            })
        }
    }
}

// =============================================================================
// Rows
// =============================================================================

/// Persisted fetch result for one external identifier.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ExternalResource {
    /// Row id, 0 until the resource is saved.
    pub id: i64,
    pub id_type: IdType,
    pub id_value: String,
    pub url: String,
    pub item_id: Option<String>,
    pub document: Option<NormalizedDocument>,
    pub state: ResourceState,
    pub error: Option<String>,
    pub scraped_at: Option<i64>,
}

impl ExternalResource {
    pub fn new(id_type: IdType, id_value: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            id: 0,
            id_type,
            id_value: id_value.into(),
            url: url.into(),
            item_id: None,
            document: None,
            state: ResourceState::Unresolved,
            error: None,
            scraped_at: None,
        }
    }

    pub fn is_ready(&self) -> bool {
        self.state == ResourceState::Ready && self.document.is_some()
    }
}

/// Canonical entity. Detail fields live in `metadata` as a flat JSON object
/// whose keys are the ones of the kind's `WorkDetails` variant.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Item {
    pub id: String,
    pub kind: ItemKind,
    pub title: String,
    pub primary_lookup_id: Option<(IdType, String)>,
    pub metadata: Value,
    pub localized_title: Vec<LocalizedText>,
    pub localized_description: Vec<LocalizedText>,
    pub cover_image_url: Option<String>,
    pub merged_to: Option<String>,
    pub parent_id: Option<String>,
    pub is_deleted: bool,
    pub created_at: i64,
    pub updated_at: i64,
}

impl Item {
    pub fn new(kind: ItemKind, title: impl Into<String>) -> Self {
        let now = chrono::Utc::now().timestamp();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            kind,
            title: title.into(),
            primary_lookup_id: None,
            metadata: Value::Object(Map::new()),
            localized_title: Vec::new(),
            localized_description: Vec::new(),
            cover_image_url: None,
            merged_to: None,
            parent_id: None,
            is_deleted: false,
            created_at: now,
            updated_at: now,
        }
    }

    /// Builds an unsaved item from a scraped document. The first lookup id,
    /// ideal types first, becomes the primary one.
    pub fn from_document(document: &NormalizedDocument) -> Self {
        let header = &document.header;
        let mut item = Item::new(document.kind(), &header.title);
        item.primary_lookup_id = document
            .ordered_lookup_ids()
            .first()
            .map(|(t, v)| (*t, v.to_string()));
        item.metadata = document.details.fields_json();
        item.localized_title = header.localized_title.clone();
        item.localized_description = header.localized_description.clone();
        item.cover_image_url = header.cover_image_url.clone();
        item
    }

    /// The detail fields as their typed variant. `None` for kinds without
    /// details, or when stored metadata no longer fits the variant.
    pub fn details(&self) -> Option<WorkDetails> {
        let mut object = self.metadata.as_object().cloned().unwrap_or_default();
        object.insert("category".into(), Value::from(self.kind.to_db_str()));
        serde_json::from_value(Value::Object(object)).ok()
    }

    pub fn is_merged(&self) -> bool {
        self.merged_to.is_some()
    }
}

/// Edge between two items, e.g. a person acting in a movie.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Relation {
    pub id: i64,
    pub subject_id: String,
    pub object_id: String,
    pub role: String,
    /// Auxiliary data such as the character played.
    pub qualifier: Option<String>,
}
