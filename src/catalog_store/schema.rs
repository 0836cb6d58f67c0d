//! SQLite schema for canonical items, the external resources they were built
//! from, and the relations between items.

use crate::sqlite_column;
use crate::sqlite_persistence::{Column, Reference, SqlType, Table, VersionedSchema, DEFAULT_TIMESTAMP};
use anyhow::Result;
use rusqlite::Connection;

const ITEM_SET_NULL: Reference = Reference {
    table: "items",
    column: "id",
    set_null: true,
};

const ITEM_CASCADE: Reference = Reference {
    table: "items",
    column: "id",
    set_null: false,
};

// =============================================================================
// Tables
// =============================================================================

/// Canonical entities. `merged_to` forms a forest of merge pointers.
const ITEMS_TABLE: Table = Table {
    name: "items",
    columns: &[
        sqlite_column!("id", &SqlType::Text, is_primary_key = true), // uuid v4
        sqlite_column!("kind", &SqlType::Text, non_null = true),
        sqlite_column!("title", &SqlType::Text, non_null = true),
        sqlite_column!("primary_lookup_id_type", &SqlType::Text),
        sqlite_column!("primary_lookup_id_value", &SqlType::Text),
        sqlite_column!(
            "metadata",
            &SqlType::Text,
            non_null = true,
            default_value = Some("'{}'")
        ),
        sqlite_column!(
            "localized_title",
            &SqlType::Text,
            non_null = true,
            default_value = Some("'[]'")
        ),
        sqlite_column!(
            "localized_description",
            &SqlType::Text,
            non_null = true,
            default_value = Some("'[]'")
        ),
        sqlite_column!("cover_image_url", &SqlType::Text),
        sqlite_column!("merged_to", &SqlType::Text, references = Some(&ITEM_SET_NULL)),
        sqlite_column!("parent_id", &SqlType::Text, references = Some(&ITEM_SET_NULL)),
        sqlite_column!(
            "is_deleted",
            &SqlType::Integer,
            non_null = true,
            default_value = Some("0")
        ),
        sqlite_column!(
            "created_at",
            &SqlType::Integer,
            non_null = true,
            default_value = Some(DEFAULT_TIMESTAMP)
        ),
        sqlite_column!(
            "updated_at",
            &SqlType::Integer,
            non_null = true,
            default_value = Some(DEFAULT_TIMESTAMP)
        ),
    ],
    indices: &[
        ("idx_items_lookup", "primary_lookup_id_value"),
        ("idx_items_merged_to", "merged_to"),
        ("idx_items_parent", "parent_id"),
    ],
    unique_constraints: &[],
};

/// One fetch result per `(id_type, id_value)`.
const EXTERNAL_RESOURCES_TABLE: Table = Table {
    name: "external_resources",
    columns: &[
        sqlite_column!("rowid", &SqlType::Integer, is_primary_key = true),
        sqlite_column!("id_type", &SqlType::Text, non_null = true),
        sqlite_column!("id_value", &SqlType::Text, non_null = true),
        sqlite_column!("url", &SqlType::Text, non_null = true),
        sqlite_column!("item_id", &SqlType::Text, references = Some(&ITEM_SET_NULL)),
        sqlite_column!("document", &SqlType::Text), // NormalizedDocument JSON
        sqlite_column!(
            "state",
            &SqlType::Text,
            non_null = true,
            default_value = Some("'unresolved'")
        ),
        sqlite_column!("error", &SqlType::Text),
        sqlite_column!("scraped_at", &SqlType::Integer),
        sqlite_column!(
            "created_at",
            &SqlType::Integer,
            non_null = true,
            default_value = Some(DEFAULT_TIMESTAMP)
        ),
    ],
    indices: &[("idx_external_resources_item", "item_id")],
    unique_constraints: &[&["id_type", "id_value"]],
};

const RELATIONS_TABLE: Table = Table {
    name: "relations",
    columns: &[
        sqlite_column!("rowid", &SqlType::Integer, is_primary_key = true),
        sqlite_column!(
            "subject_id",
            &SqlType::Text,
            non_null = true,
            references = Some(&ITEM_CASCADE)
        ),
        sqlite_column!(
            "object_id",
            &SqlType::Text,
            non_null = true,
            references = Some(&ITEM_CASCADE)
        ),
        sqlite_column!("role", &SqlType::Text, non_null = true),
        sqlite_column!("qualifier", &SqlType::Text), // e.g. the character played
    ],
    indices: &[
        ("idx_relations_subject", "subject_id"),
        ("idx_relations_object", "object_id"),
    ],
    unique_constraints: &[&["subject_id", "object_id", "role"]],
};

/// Added in version 1; covers used to live only as remote URLs.
const ITEM_COVERS_TABLE: Table = Table {
    name: "item_covers",
    columns: &[
        sqlite_column!(
            "item_id",
            &SqlType::Text,
            is_primary_key = true,
            references = Some(&ITEM_CASCADE)
        ),
        sqlite_column!("extension", &SqlType::Text, non_null = true),
        sqlite_column!("data", &SqlType::Blob, non_null = true),
    ],
    indices: &[],
    unique_constraints: &[],
};

fn add_item_covers(conn: &Connection) -> Result<()> {
    ITEM_COVERS_TABLE.create(conn)
}

pub const CATALOG_VERSIONED_SCHEMAS: &[VersionedSchema] = &[
    VersionedSchema {
        version: 0,
        tables: &[ITEMS_TABLE, EXTERNAL_RESOURCES_TABLE, RELATIONS_TABLE],
        migration: None,
    },
    VersionedSchema {
        version: 1,
        tables: &[
            ITEMS_TABLE,
            EXTERNAL_RESOURCES_TABLE,
            RELATIONS_TABLE,
            ITEM_COVERS_TABLE,
        ],
        migration: Some(add_item_covers),
    },
];
