use serde::{Deserialize, Serialize};

/// Kind of external identifier. Each value is served by exactly one site.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum IdType {
    #[serde(rename = "isbn")]
    Isbn,
    #[serde(rename = "gtin")]
    Gtin,
    #[serde(rename = "imdb")]
    Imdb,
    #[serde(rename = "tmdb_movie")]
    TmdbMovie,
    #[serde(rename = "tmdb_tv")]
    TmdbTv,
    #[serde(rename = "tmdb_tvseason")]
    TmdbTvSeason,
    #[serde(rename = "tmdb_tvepisode")]
    TmdbTvEpisode,
    #[serde(rename = "googlebooks")]
    GoogleBooks,
    #[serde(rename = "bangumi")]
    Bangumi,
    #[serde(rename = "musicbrainz")]
    MusicBrainz,
    #[serde(rename = "itch")]
    Itch,
    #[serde(rename = "itch_game_id")]
    ItchGameId,
    #[serde(rename = "fedi")]
    Fediverse,
}

impl IdType {
    pub const ALL: [IdType; 13] = [
        IdType::Isbn,
        IdType::Gtin,
        IdType::Imdb,
        IdType::TmdbMovie,
        IdType::TmdbTv,
        IdType::TmdbTvSeason,
        IdType::TmdbTvEpisode,
        IdType::GoogleBooks,
        IdType::Bangumi,
        IdType::MusicBrainz,
        IdType::Itch,
        IdType::ItchGameId,
        IdType::Fediverse,
    ];

    pub fn to_db_str(&self) -> &'static str {
        match self {
            IdType::Isbn => "isbn",
            IdType::Gtin => "gtin",
            IdType::Imdb => "imdb",
            IdType::TmdbMovie => "tmdb_movie",
            IdType::TmdbTv => "tmdb_tv",
            IdType::TmdbTvSeason => "tmdb_tvseason",
            IdType::TmdbTvEpisode => "tmdb_tvepisode",
            IdType::GoogleBooks => "googlebooks",
            IdType::Bangumi => "bangumi",
            IdType::MusicBrainz => "musicbrainz",
            IdType::Itch => "itch",
            IdType::ItchGameId => "itch_game_id",
            IdType::Fediverse => "fedi",
        }
    }

    pub fn from_db_str(s: &str) -> Option<Self> {
        IdType::ALL.into_iter().find(|t| t.to_db_str() == s)
    }

    /// Identifiers shared across many sources (ISBN, IMDB, barcodes), which
    /// make the best primary lookup for an entity.
    pub fn is_ideal(&self) -> bool {
        matches!(self, IdType::Isbn | IdType::Imdb | IdType::Gtin)
    }
}

impl std::fmt::Display for IdType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.to_db_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SiteName {
    Tmdb,
    Imdb,
    GoogleBooks,
    Bangumi,
    MusicBrainz,
    Itch,
    Fediverse,
}

impl SiteName {
    pub fn as_str(&self) -> &'static str {
        match self {
            SiteName::Tmdb => "tmdb",
            SiteName::Imdb => "imdb",
            SiteName::GoogleBooks => "googlebooks",
            SiteName::Bangumi => "bangumi",
            SiteName::MusicBrainz => "musicbrainz",
            SiteName::Itch => "itch",
            SiteName::Fediverse => "fedi",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_db_str_round_trip_for_every_variant() {
        for id_type in IdType::ALL {
            assert_eq!(IdType::from_db_str(id_type.to_db_str()), Some(id_type));
        }
        assert_eq!(IdType::from_db_str("douban_book"), None);
    }

    #[test]
    fn test_serde_matches_db_str() {
        for id_type in IdType::ALL {
            let json = serde_json::to_string(&id_type).unwrap();
            assert_eq!(json, format!("\"{}\"", id_type.to_db_str()));
        }
    }
}
