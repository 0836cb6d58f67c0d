use super::ItemKind;
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BookDetails {
    pub subtitle: Option<String>,
    pub orig_title: Option<String>,
    pub author: Vec<String>,
    pub translator: Vec<String>,
    pub language: Vec<String>,
    pub pub_house: Option<String>,
    pub pub_year: Option<i32>,
    pub pub_month: Option<u32>,
    pub binding: Option<String>,
    pub pages: Option<u32>,
    pub isbn: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MovieDetails {
    pub orig_title: Option<String>,
    pub director: Vec<String>,
    pub playwright: Vec<String>,
    pub actor: Vec<String>,
    pub genre: Vec<String>,
    pub language: Vec<String>,
    pub year: Option<i32>,
    pub duration_minutes: Option<u32>,
    pub imdb_code: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TvShowDetails {
    pub orig_title: Option<String>,
    pub director: Vec<String>,
    pub playwright: Vec<String>,
    pub actor: Vec<String>,
    pub genre: Vec<String>,
    pub language: Vec<String>,
    pub year: Option<i32>,
    pub season_count: Option<u32>,
    pub imdb_code: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TvSeasonDetails {
    pub season_number: Option<u32>,
    pub episode_count: Option<u32>,
    pub episode_numbers: Vec<u32>,
    pub air_date: Option<String>,
    pub imdb_code: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TvEpisodeDetails {
    pub season_number: Option<u32>,
    pub episode_number: Option<u32>,
    pub air_date: Option<String>,
    pub imdb_code: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AlbumDetails {
    pub artist: Vec<String>,
    pub genre: Vec<String>,
    pub company: Vec<String>,
    pub release_date: Option<String>,
    pub media: Option<String>,
    pub disc_count: Option<u32>,
    pub track_list: Vec<String>,
    pub barcode: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GameDetails {
    pub developer: Vec<String>,
    pub publisher: Vec<String>,
    pub release_date: Option<String>,
    pub genre: Vec<String>,
    pub platform: Vec<String>,
    pub official_site: Option<String>,
}

/// Category specific part of a document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "category", rename_all = "snake_case")]
pub enum WorkDetails {
    Book(BookDetails),
    Movie(MovieDetails),
    TvShow(TvShowDetails),
    TvSeason(TvSeasonDetails),
    TvEpisode(TvEpisodeDetails),
    Album(AlbumDetails),
    Game(GameDetails),
}

impl WorkDetails {
    pub fn kind(&self) -> ItemKind {
        match self {
            WorkDetails::Book(_) => ItemKind::Book,
            WorkDetails::Movie(_) => ItemKind::Movie,
            WorkDetails::TvShow(_) => ItemKind::TvShow,
            WorkDetails::TvSeason(_) => ItemKind::TvSeason,
            WorkDetails::TvEpisode(_) => ItemKind::TvEpisode,
            WorkDetails::Album(_) => ItemKind::Album,
            WorkDetails::Game(_) => ItemKind::Game,
        }
    }

    /// The detail fields as a flat JSON object, without the category tag.
    pub fn fields_json(&self) -> Value {
        let value = match self {
            WorkDetails::Book(d) => serde_json::to_value(d),
            WorkDetails::Movie(d) => serde_json::to_value(d),
            WorkDetails::TvShow(d) => serde_json::to_value(d),
            WorkDetails::TvSeason(d) => serde_json::to_value(d),
            WorkDetails::TvEpisode(d) => serde_json::to_value(d),
            WorkDetails::Album(d) => serde_json::to_value(d),
            WorkDetails::Game(d) => serde_json::to_value(d),
        };
        value.unwrap_or(Value::Null)
    }
}

/// True for null, blank strings, empty arrays and empty objects.
pub fn is_empty_value(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.trim().is_empty(),
        Value::Array(a) => a.is_empty(),
        Value::Object(o) => o.is_empty(),
        _ => false,
    }
}
