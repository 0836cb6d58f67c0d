//! SQLite-backed catalog store.

use super::models::*;
use super::schema::CATALOG_VERSIONED_SCHEMAS;
use super::trait_def::CatalogStore;
use crate::document::{CoverImage, ItemKind, NormalizedDocument};
use crate::sites::IdType;
use crate::sqlite_persistence::migrate_if_needed;
use anyhow::{Context, Result};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde_json::{Map, Value};
use std::path::Path;
use std::sync::{Arc, Mutex};
use tracing::{debug, info};

const ITEM_COLUMNS: &str = "items.id, items.kind, items.title, items.primary_lookup_id_type, \
    items.primary_lookup_id_value, items.metadata, items.localized_title, \
    items.localized_description, items.cover_image_url, items.merged_to, items.parent_id, \
    items.is_deleted, items.created_at, items.updated_at";

const RESOURCE_COLUMNS: &str =
    "rowid, id_type, id_value, url, item_id, document, state, error, scraped_at";

#[derive(Clone)]
pub struct SqliteCatalogStore {
    conn: Arc<Mutex<Connection>>,
}

fn conversion_error(index: usize, message: String) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(index, Type::Text, message.into())
}

fn id_type_at(row: &Row, index: usize) -> rusqlite::Result<IdType> {
    let raw: String = row.get(index)?;
    IdType::from_db_str(&raw).ok_or_else(|| conversion_error(index, format!("unknown id type {raw}")))
}

fn item_from_row(row: &Row) -> rusqlite::Result<Item> {
    let kind_raw: String = row.get(1)?;
    let kind = ItemKind::from_db_str(&kind_raw)
        .ok_or_else(|| conversion_error(1, format!("unknown item kind {kind_raw}")))?;
    let lookup_type: Option<String> = row.get(3)?;
    let lookup_value: Option<String> = row.get(4)?;
    let primary_lookup_id = match (lookup_type.as_deref().and_then(IdType::from_db_str), lookup_value) {
        (Some(id_type), Some(value)) => Some((id_type, value)),
        _ => None,
    };
    let metadata: String = row.get(5)?;
    let localized_title: String = row.get(6)?;
    let localized_description: String = row.get(7)?;

    Ok(Item {
        id: row.get(0)?,
        kind,
        title: row.get(2)?,
        primary_lookup_id,
        metadata: serde_json::from_str(&metadata).unwrap_or_else(|_| Value::Object(Map::new())),
        localized_title: serde_json::from_str(&localized_title).unwrap_or_default(),
        localized_description: serde_json::from_str(&localized_description).unwrap_or_default(),
        cover_image_url: row.get(8)?,
        merged_to: row.get(9)?,
        parent_id: row.get(10)?,
        is_deleted: row.get::<_, i64>(11)? != 0,
        created_at: row.get(12)?,
        updated_at: row.get(13)?,
    })
}

fn resource_from_row(row: &Row) -> rusqlite::Result<ExternalResource> {
    let document: Option<String> = row.get(5)?;
    let state: String = row.get(6)?;
    Ok(ExternalResource {
        id: row.get(0)?,
        id_type: id_type_at(row, 1)?,
        id_value: row.get(2)?,
        url: row.get(3)?,
        item_id: row.get(4)?,
        document: document.and_then(|d| serde_json::from_str::<NormalizedDocument>(&d).ok()),
        state: ResourceState::from_db_str(&state),
        error: row.get(7)?,
        scraped_at: row.get(8)?,
    })
}

fn relation_from_row(row: &Row) -> rusqlite::Result<Relation> {
    Ok(Relation {
        id: row.get(0)?,
        subject_id: row.get(1)?,
        object_id: row.get(2)?,
        role: row.get(3)?,
        qualifier: row.get(4)?,
    })
}

fn write_item(conn: &Connection, item: &Item) -> Result<()> {
    let (lookup_type, lookup_value) = match &item.primary_lookup_id {
        Some((t, v)) => (Some(t.to_db_str()), Some(v.as_str())),
        None => (None, None),
    };
    let updated = conn.execute(
        "UPDATE items SET kind = ?2, title = ?3, primary_lookup_id_type = ?4,
            primary_lookup_id_value = ?5, metadata = ?6, localized_title = ?7,
            localized_description = ?8, cover_image_url = ?9, merged_to = ?10,
            parent_id = ?11, is_deleted = ?12, updated_at = ?13
         WHERE id = ?1",
        params![
            item.id,
            item.kind.to_db_str(),
            item.title,
            lookup_type,
            lookup_value,
            item.metadata.to_string(),
            serde_json::to_string(&item.localized_title)?,
            serde_json::to_string(&item.localized_description)?,
            item.cover_image_url,
            item.merged_to,
            item.parent_id,
            item.is_deleted as i64,
            chrono::Utc::now().timestamp(),
        ],
    )?;
    if updated == 0 {
        anyhow::bail!("Item {} does not exist", item.id);
    }
    Ok(())
}

/// Moves every relation of `source` onto `target`, collapsing duplicates.
fn repoint_relations(conn: &Connection, source: &str, target: &str) -> Result<usize> {
    let relations: Vec<Relation> = {
        let mut stmt = conn.prepare(
            "SELECT rowid, subject_id, object_id, role, qualifier FROM relations
             WHERE subject_id = ?1 OR object_id = ?1",
        )?;
        let rows = stmt.query_map(params![source], relation_from_row)?;
        rows.collect::<rusqlite::Result<_>>()?
    };

    let mut moved = 0;
    for relation in relations {
        let subject = if relation.subject_id == source { target } else { relation.subject_id.as_str() };
        let object = if relation.object_id == source { target } else { relation.object_id.as_str() };
        if subject == object {
            conn.execute("DELETE FROM relations WHERE rowid = ?1", params![relation.id])?;
            continue;
        }

        let existing: Option<(i64, Option<String>)> = conn
            .query_row(
                "SELECT rowid, qualifier FROM relations
                 WHERE subject_id = ?1 AND object_id = ?2 AND role = ?3",
                params![subject, object, relation.role],
                |r| Ok((r.get(0)?, r.get(1)?)),
            )
            .optional()?;
        match existing {
            Some((existing_id, existing_qualifier)) => {
                if existing_qualifier.is_none() && relation.qualifier.is_some() {
                    conn.execute(
                        "UPDATE relations SET qualifier = ?2 WHERE rowid = ?1",
                        params![existing_id, relation.qualifier],
                    )?;
                }
                conn.execute("DELETE FROM relations WHERE rowid = ?1", params![relation.id])?;
                debug!(
                    "Collapsed relation {} {} {} into {}",
                    subject, relation.role, object, existing_id
                );
            }
            None => {
                conn.execute(
                    "UPDATE relations SET subject_id = ?2, object_id = ?3 WHERE rowid = ?1",
                    params![relation.id, subject, object],
                )?;
            }
        }
        moved += 1;
    }
    Ok(moved)
}

impl SqliteCatalogStore {
    /// Opens (creating if needed) the catalog database at `db_path`.
    pub fn new<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let db_path = db_path.as_ref();
        let mut conn = Connection::open(db_path)
            .with_context(|| format!("Failed to open catalog database {}", db_path.display()))?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        Self::init(&mut conn)?;
        info!("Opened catalog database {}", db_path.display());
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn in_memory() -> Result<Self> {
        let mut conn = Connection::open_in_memory()?;
        Self::init(&mut conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn init(conn: &mut Connection) -> Result<()> {
        conn.pragma_update(None, "foreign_keys", "ON")?;
        migrate_if_needed(conn, CATALOG_VERSIONED_SCHEMAS, "catalog")?;
        CATALOG_VERSIONED_SCHEMAS
            .last()
            .context("No catalog schema")?
            .validate(conn)
    }

    fn query_item(&self, sql: &str, params: impl rusqlite::Params) -> Result<Option<Item>> {
        let conn = self.conn.lock().unwrap();
        match conn.query_row(sql, params, item_from_row) {
            Ok(item) => Ok(Some(item)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

impl CatalogStore for SqliteCatalogStore {
    fn insert_item(&self, item: &Item) -> Result<()> {
        let (lookup_type, lookup_value) = match &item.primary_lookup_id {
            Some((t, v)) => (Some(t.to_db_str()), Some(v.as_str())),
            None => (None, None),
        };
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO items (id, kind, title, primary_lookup_id_type, primary_lookup_id_value,
                metadata, localized_title, localized_description, cover_image_url, merged_to,
                parent_id, is_deleted, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
            params![
                item.id,
                item.kind.to_db_str(),
                item.title,
                lookup_type,
                lookup_value,
                item.metadata.to_string(),
                serde_json::to_string(&item.localized_title)?,
                serde_json::to_string(&item.localized_description)?,
                item.cover_image_url,
                item.merged_to,
                item.parent_id,
                item.is_deleted as i64,
                item.created_at,
                item.updated_at,
            ],
        )
        .with_context(|| format!("Failed to insert item {}", item.id))?;
        Ok(())
    }

    fn get_item(&self, id: &str) -> Result<Option<Item>> {
        self.query_item(
            &format!("SELECT {ITEM_COLUMNS} FROM items WHERE id = ?1"),
            params![id],
        )
    }

    fn update_item(&self, item: &Item) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        write_item(&conn, item)
    }

    fn find_item_by_lookup(
        &self,
        kind: ItemKind,
        id_type: IdType,
        id_value: &str,
    ) -> Result<Option<Item>> {
        let by_primary = self.query_item(
            &format!(
                "SELECT {ITEM_COLUMNS} FROM items
                 WHERE kind = ?1 AND is_deleted = 0
                   AND primary_lookup_id_type = ?2 AND primary_lookup_id_value = ?3
                 ORDER BY created_at, rowid LIMIT 1"
            ),
            params![kind.to_db_str(), id_type.to_db_str(), id_value],
        )?;
        if by_primary.is_some() {
            return Ok(by_primary);
        }
        self.query_item(
            &format!(
                "SELECT {ITEM_COLUMNS} FROM items
                 JOIN external_resources r ON r.item_id = items.id
                 WHERE items.kind = ?1 AND items.is_deleted = 0
                   AND r.id_type = ?2 AND r.id_value = ?3
                 ORDER BY items.created_at, items.rowid LIMIT 1"
            ),
            params![kind.to_db_str(), id_type.to_db_str(), id_value],
        )
    }

    fn merged_from(&self, id: &str) -> Result<Vec<String>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare("SELECT id FROM items WHERE merged_to = ?1 ORDER BY created_at")?;
        let rows = stmt.query_map(params![id], |r| r.get::<_, String>(0))?;
        Ok(rows.collect::<rusqlite::Result<_>>()?)
    }

    fn children_of(&self, id: &str) -> Result<Vec<Item>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(&format!(
            "SELECT {ITEM_COLUMNS} FROM items WHERE parent_id = ?1 AND is_deleted = 0 ORDER BY created_at"
        ))?;
        let rows = stmt.query_map(params![id], item_from_row)?;
        Ok(rows.collect::<rusqlite::Result<_>>()?)
    }

    fn item_count(&self) -> Result<usize> {
        let conn = self.conn.lock().unwrap();
        let count: i64 =
            conn.query_row("SELECT COUNT(*) FROM items WHERE is_deleted = 0", [], |r| r.get(0))?;
        Ok(count as usize)
    }

    fn delete_item(&self, id: &str) -> Result<()> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;
        tx.execute(
            "UPDATE items SET is_deleted = 1, updated_at = ?2 WHERE id = ?1",
            params![id, chrono::Utc::now().timestamp()],
        )?;
        tx.execute("DELETE FROM external_resources WHERE item_id = ?1", params![id])?;
        tx.commit()?;
        Ok(())
    }

    fn get_resource(&self, id_type: IdType, id_value: &str) -> Result<Option<ExternalResource>> {
        let conn = self.conn.lock().unwrap();
        match conn.query_row(
            &format!(
                "SELECT {RESOURCE_COLUMNS} FROM external_resources WHERE id_type = ?1 AND id_value = ?2"
            ),
            params![id_type.to_db_str(), id_value],
            resource_from_row,
        ) {
            Ok(resource) => Ok(Some(resource)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn upsert_resource(&self, resource: &ExternalResource) -> Result<ExternalResource> {
        let document = resource
            .document
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;
        {
            let conn = self.conn.lock().unwrap();
            conn.execute(
                "INSERT INTO external_resources
                    (id_type, id_value, url, item_id, document, state, error, scraped_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                 ON CONFLICT(id_type, id_value) DO UPDATE SET
                    url = excluded.url,
                    item_id = COALESCE(excluded.item_id, external_resources.item_id),
                    document = COALESCE(excluded.document, external_resources.document),
                    state = excluded.state,
                    error = excluded.error,
                    scraped_at = COALESCE(excluded.scraped_at, external_resources.scraped_at)",
                params![
                    resource.id_type.to_db_str(),
                    resource.id_value,
                    resource.url,
                    resource.item_id,
                    document,
                    resource.state.to_db_str(),
                    resource.error,
                    resource.scraped_at,
                ],
            )
            .with_context(|| {
                format!(
                    "Failed to save resource {}:{}",
                    resource.id_type.to_db_str(),
                    resource.id_value
                )
            })?;
        }
        self.get_resource(resource.id_type, &resource.id_value)?
            .context("Resource vanished after upsert")
    }

    fn set_resource_state(
        &self,
        id_type: IdType,
        id_value: &str,
        state: ResourceState,
        error: Option<&str>,
    ) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "UPDATE external_resources SET state = ?3, error = ?4 WHERE id_type = ?1 AND id_value = ?2",
            params![id_type.to_db_str(), id_value, state.to_db_str(), error],
        )?;
        Ok(())
    }

    fn attach_resource(&self, id_type: IdType, id_value: &str, item_id: &str) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "UPDATE external_resources SET item_id = ?3 WHERE id_type = ?1 AND id_value = ?2",
            params![id_type.to_db_str(), id_value, item_id],
        )?;
        Ok(())
    }

    fn resources_of_item(&self, item_id: &str) -> Result<Vec<ExternalResource>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(&format!(
            "SELECT {RESOURCE_COLUMNS} FROM external_resources WHERE item_id = ?1 ORDER BY rowid"
        ))?;
        let rows = stmt.query_map(params![item_id], resource_from_row)?;
        Ok(rows.collect::<rusqlite::Result<_>>()?)
    }

    fn add_relation(
        &self,
        subject_id: &str,
        object_id: &str,
        role: &str,
        qualifier: Option<&str>,
    ) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO relations (subject_id, object_id, role, qualifier) VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(subject_id, object_id, role) DO UPDATE SET
                qualifier = COALESCE(relations.qualifier, excluded.qualifier)",
            params![subject_id, object_id, role, qualifier],
        )?;
        Ok(())
    }

    fn relations_of(&self, item_id: &str) -> Result<Vec<Relation>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT rowid, subject_id, object_id, role, qualifier FROM relations
             WHERE subject_id = ?1 OR object_id = ?1 ORDER BY rowid",
        )?;
        let rows = stmt.query_map(params![item_id], relation_from_row)?;
        Ok(rows.collect::<rusqlite::Result<_>>()?)
    }

    fn save_cover(&self, item_id: &str, cover: &CoverImage) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT OR REPLACE INTO item_covers (item_id, extension, data) VALUES (?1, ?2, ?3)",
            params![item_id, cover.extension, cover.bytes],
        )?;
        Ok(())
    }

    fn get_cover(&self, item_id: &str) -> Result<Option<CoverImage>> {
        let conn = self.conn.lock().unwrap();
        let cover = conn
            .query_row(
                "SELECT extension, data FROM item_covers WHERE item_id = ?1",
                params![item_id],
                |r| {
                    Ok(CoverImage {
                        extension: r.get(0)?,
                        bytes: r.get(1)?,
                    })
                },
            )
            .optional()?;
        Ok(cover)
    }

    fn commit_merge(&self, source: &Item, target: &Item) -> Result<usize> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;
        write_item(&tx, target)?;
        write_item(&tx, source)?;
        let moved = repoint_relations(&tx, &source.id, &target.id)?;
        tx.execute(
            "UPDATE external_resources SET item_id = ?2 WHERE item_id = ?1",
            params![source.id, target.id],
        )?;
        tx.execute(
            "UPDATE items SET parent_id = ?2 WHERE parent_id = ?1",
            params![source.id, target.id],
        )?;
        tx.commit()
            .with_context(|| format!("Failed to merge {} into {}", source.id, target.id))?;
        Ok(moved)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::{DocumentHeader, MovieDetails, WorkDetails};

    fn movie(title: &str) -> Item {
        Item::new(ItemKind::Movie, title)
    }

    fn person(name: &str) -> Item {
        Item::new(ItemKind::People, name)
    }

    #[test]
    fn test_item_round_trip() {
        let store = SqliteCatalogStore::in_memory().unwrap();
        let mut item = movie("Alien");
        item.primary_lookup_id = Some((IdType::Imdb, "tt0078748".into()));
        item.metadata = serde_json::json!({"director": ["Ridley Scott"]});
        store.insert_item(&item).unwrap();

        let loaded = store.get_item(&item.id).unwrap().unwrap();
        assert_eq!(loaded, item);
        assert!(store.get_item("missing").unwrap().is_none());
    }

    #[test]
    fn test_find_item_by_lookup_filters_kind() {
        let store = SqliteCatalogStore::in_memory().unwrap();
        let mut show = Item::new(ItemKind::TvShow, "Show");
        show.primary_lookup_id = Some((IdType::Imdb, "tt1".into()));
        store.insert_item(&show).unwrap();

        let found = store
            .find_item_by_lookup(ItemKind::TvShow, IdType::Imdb, "tt1")
            .unwrap();
        assert_eq!(found.map(|i| i.id), Some(show.id.clone()));
        assert!(store
            .find_item_by_lookup(ItemKind::TvSeason, IdType::Imdb, "tt1")
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_find_item_through_external_resource() {
        let store = SqliteCatalogStore::in_memory().unwrap();
        let item = movie("Alien");
        store.insert_item(&item).unwrap();
        let mut resource = ExternalResource::new(IdType::TmdbMovie, "348", "https://www.themoviedb.org/movie/348");
        resource.item_id = Some(item.id.clone());
        store.upsert_resource(&resource).unwrap();

        let found = store
            .find_item_by_lookup(ItemKind::Movie, IdType::TmdbMovie, "348")
            .unwrap();
        assert_eq!(found.map(|i| i.id), Some(item.id));
    }

    #[test]
    fn test_upsert_resource_is_keyed_by_identifier() {
        let store = SqliteCatalogStore::in_memory().unwrap();
        let mut resource = ExternalResource::new(IdType::Imdb, "tt0078748", "https://www.imdb.com/title/tt0078748/");
        let first = store.upsert_resource(&resource).unwrap();

        resource.state = ResourceState::Ready;
        resource.document = Some(NormalizedDocument::new(
            DocumentHeader::new("Alien"),
            WorkDetails::Movie(MovieDetails::default()),
        ));
        let second = store.upsert_resource(&resource).unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(second.state, ResourceState::Ready);
        assert_eq!(second.document.unwrap().title(), "Alien");
    }

    #[test]
    fn test_add_relation_keeps_qualifier() {
        let store = SqliteCatalogStore::in_memory().unwrap();
        let (actor, film) = (person("Sigourney Weaver"), movie("Alien"));
        store.insert_item(&actor).unwrap();
        store.insert_item(&film).unwrap();

        store.add_relation(&actor.id, &film.id, "actor", Some("Ripley")).unwrap();
        store.add_relation(&actor.id, &film.id, "actor", None).unwrap();

        let relations = store.relations_of(&film.id).unwrap();
        assert_eq!(relations.len(), 1);
        assert_eq!(relations[0].qualifier.as_deref(), Some("Ripley"));
    }

    #[test]
    fn test_commit_merge_collapses_relations() {
        let store = SqliteCatalogStore::in_memory().unwrap();
        let film = movie("Alien");
        let mut a = person("A");
        let mut b = person("B");
        for item in [&film, &a, &b] {
            store.insert_item(item).unwrap();
        }
        store.add_relation(&a.id, &film.id, "actor", Some("K")).unwrap();
        store.add_relation(&b.id, &film.id, "actor", None).unwrap();

        a.merged_to = Some(b.id.clone());
        let moved = store.commit_merge(&a, &b).unwrap();
        b = store.get_item(&b.id).unwrap().unwrap();

        assert_eq!(moved, 1);
        assert!(store.relations_of(&a.id).unwrap().is_empty());
        let relations = store.relations_of(&b.id).unwrap();
        assert_eq!(relations.len(), 1);
        assert_eq!(relations[0].qualifier.as_deref(), Some("K"));
        assert_eq!(store.merged_from(&b.id).unwrap(), vec![a.id.clone()]);
    }

    #[test]
    fn test_delete_item_removes_resources() {
        let store = SqliteCatalogStore::in_memory().unwrap();
        let item = movie("Alien");
        store.insert_item(&item).unwrap();
        let mut resource = ExternalResource::new(IdType::Imdb, "tt0078748", "https://www.imdb.com/title/tt0078748/");
        resource.item_id = Some(item.id.clone());
        store.upsert_resource(&resource).unwrap();

        store.delete_item(&item.id).unwrap();

        assert!(store.get_item(&item.id).unwrap().unwrap().is_deleted);
        assert!(store.get_resource(IdType::Imdb, "tt0078748").unwrap().is_none());
        assert_eq!(store.item_count().unwrap(), 0);
    }

    #[test]
    fn test_covers_are_stored_per_item() {
        let store = SqliteCatalogStore::in_memory().unwrap();
        let item = movie("Alien");
        store.insert_item(&item).unwrap();
        let cover = CoverImage {
            bytes: vec![1, 2, 3],
            extension: "jpg".into(),
        };
        store.save_cover(&item.id, &cover).unwrap();
        assert_eq!(store.get_cover(&item.id).unwrap(), Some(cover));
    }
}
