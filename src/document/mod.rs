//! The normalized document scrapers produce: a common header shared by every
//! category plus one typed detail block per category.

mod details;

pub use details::*;

use crate::sites::IdType;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalizedText {
    pub lang: String,
    pub text: String,
}

impl LocalizedText {
    pub fn new(lang: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            lang: lang.into(),
            text: text.into(),
        }
    }
}

/// Appends the entries of `source` whose text is not already in `target`.
pub fn union_localized(target: &mut Vec<LocalizedText>, source: &[LocalizedText]) {
    for entry in source {
        if !target.iter().any(|t| t.text == entry.text) {
            target.push(entry.clone());
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoverImage {
    pub bytes: Vec<u8>,
    pub extension: String,
}

/// Pointer to another external resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceLink {
    pub id_type: IdType,
    pub id_value: String,
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

impl ResourceLink {
    pub fn new(id_type: IdType, id_value: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            id_type,
            id_value: id_value.into(),
            url: url.into(),
            title: None,
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DocumentHeader {
    pub title: String,
    #[serde(default)]
    pub localized_title: Vec<LocalizedText>,
    #[serde(default)]
    pub localized_description: Vec<LocalizedText>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cover_image_url: Option<String>,
    /// Downloaded cover. Persisted separately from the document.
    #[serde(skip)]
    pub cover: Option<CoverImage>,
    #[serde(default)]
    pub lookup_ids: BTreeMap<IdType, String>,
    #[serde(default)]
    pub required_resources: Vec<ResourceLink>,
    #[serde(default)]
    pub related_resources: Vec<ResourceLink>,
    /// Resources already known to describe the same work as this document.
    #[serde(default)]
    pub prematched_resources: Vec<ResourceLink>,
}

impl DocumentHeader {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Default::default()
        }
    }

    /// Records a lookup id, ignoring blank values.
    pub fn add_lookup_id(&mut self, id_type: IdType, value: Option<&str>) {
        if let Some(value) = value.map(str::trim).filter(|v| !v.is_empty()) {
            self.lookup_ids.insert(id_type, value.to_string());
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedDocument {
    pub header: DocumentHeader,
    pub details: WorkDetails,
}

impl NormalizedDocument {
    pub fn new(header: DocumentHeader, details: WorkDetails) -> Self {
        Self { header, details }
    }

    pub fn kind(&self) -> ItemKind {
        self.details.kind()
    }

    pub fn title(&self) -> &str {
        &self.header.title
    }

    /// Lookup ids with ideal identifier types first, then in type order.
    pub fn ordered_lookup_ids(&self) -> Vec<(IdType, &str)> {
        let mut ids: Vec<(IdType, &str)> = self
            .header
            .lookup_ids
            .iter()
            .map(|(t, v)| (*t, v.as_str()))
            .collect();
        ids.sort_by_key(|(t, _)| (!t.is_ideal(), *t));
        ids
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemKind {
    Book,
    Movie,
    TvShow,
    TvSeason,
    TvEpisode,
    Album,
    Game,
    People,
}

impl ItemKind {
    pub fn to_db_str(&self) -> &'static str {
        match self {
            ItemKind::Book => "book",
            ItemKind::Movie => "movie",
            ItemKind::TvShow => "tv_show",
            ItemKind::TvSeason => "tv_season",
            ItemKind::TvEpisode => "tv_episode",
            ItemKind::Album => "album",
            ItemKind::Game => "game",
            ItemKind::People => "people",
        }
    }

    pub fn from_db_str(s: &str) -> Option<Self> {
        match s {
            "book" => Some(ItemKind::Book),
            "movie" => Some(ItemKind::Movie),
            "tv_show" => Some(ItemKind::TvShow),
            "tv_season" => Some(ItemKind::TvSeason),
            "tv_episode" => Some(ItemKind::TvEpisode),
            "album" => Some(ItemKind::Album),
            "game" => Some(ItemKind::Game),
            "people" => Some(ItemKind::People),
            _ => None,
        }
    }

    /// Detail fields copied from a merge source when the target has none.
    pub fn copy_fields(&self) -> &'static [&'static str] {
        match self {
            ItemKind::Book => &[
                "subtitle",
                "orig_title",
                "author",
                "translator",
                "language",
                "pub_house",
                "pub_year",
                "pub_month",
                "binding",
                "pages",
                "isbn",
            ],
            ItemKind::Movie => &[
                "orig_title",
                "director",
                "playwright",
                "actor",
                "genre",
                "language",
                "year",
                "duration_minutes",
                "imdb_code",
            ],
            ItemKind::TvShow => &[
                "orig_title",
                "director",
                "playwright",
                "actor",
                "genre",
                "language",
                "year",
                "season_count",
                "imdb_code",
            ],
            ItemKind::TvSeason => &[
                "season_number",
                "episode_count",
                "episode_numbers",
                "air_date",
                "imdb_code",
            ],
            ItemKind::TvEpisode => &["season_number", "episode_number", "air_date", "imdb_code"],
            ItemKind::Album => &[
                "artist",
                "genre",
                "company",
                "release_date",
                "media",
                "disc_count",
                "track_list",
                "barcode",
            ],
            ItemKind::Game => &[
                "developer",
                "publisher",
                "release_date",
                "genre",
                "platform",
                "official_site",
            ],
            ItemKind::People => &[],
        }
    }
}

impl std::fmt::Display for ItemKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.to_db_str())
    }
}
