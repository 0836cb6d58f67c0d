use crate::document::ItemKind;
use serde::{Deserialize, Serialize};

pub const MAX_QUERY_CHARS: usize = 100;
pub const MAX_PAGE: u32 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchCategory {
    All,
    Book,
    Movie,
    Tv,
    MovieTv,
    Music,
    Game,
}

impl SearchCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            SearchCategory::All => "all",
            SearchCategory::Book => "book",
            SearchCategory::Movie => "movie",
            SearchCategory::Tv => "tv",
            SearchCategory::MovieTv => "movietv",
            SearchCategory::Music => "music",
            SearchCategory::Game => "game",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "all" | "" => Some(SearchCategory::All),
            "book" => Some(SearchCategory::Book),
            "movie" => Some(SearchCategory::Movie),
            "tv" => Some(SearchCategory::Tv),
            "movietv" => Some(SearchCategory::MovieTv),
            "music" => Some(SearchCategory::Music),
            "game" => Some(SearchCategory::Game),
            _ => None,
        }
    }

    /// True when a site covering `categories` should answer this query.
    pub fn includes_any(&self, categories: &[SearchCategory]) -> bool {
        match self {
            SearchCategory::All => true,
            SearchCategory::MovieTv => categories
                .iter()
                .any(|c| matches!(c, SearchCategory::Movie | SearchCategory::Tv | SearchCategory::MovieTv)),
            other => categories.contains(other),
        }
    }

    pub fn page_size(&self) -> usize {
        match self {
            SearchCategory::All => 5,
            _ => 10,
        }
    }
}

impl std::fmt::Display for SearchCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchQuery {
    pub text: String,
    pub page: u32,
    pub category: SearchCategory,
    pub page_size: usize,
}

impl SearchQuery {
    /// Applies the query length cap and page bounds.
    pub fn new(text: &str, category: SearchCategory, page: u32) -> Self {
        Self {
            text: text.trim().chars().take(MAX_QUERY_CHARS).collect(),
            page: page.clamp(1, MAX_PAGE),
            category,
            page_size: category.page_size(),
        }
    }

    /// Page of a 20-per-page upstream API holding this query's page, and the
    /// offset of the first wanted result within it.
    pub fn upstream_window(&self, upstream_page_size: usize) -> (usize, usize) {
        let start = (self.page as usize - 1) * self.page_size;
        (start / upstream_page_size + 1, start % upstream_page_size)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchResultItem {
    pub category: Option<ItemKind>,
    pub source_site: String,
    pub url: String,
    pub title: String,
    pub subtitle: String,
    pub brief: String,
    pub cover_url: Option<String>,
}

/// Keeps the `page_size` results starting at `offset`.
pub fn window(results: Vec<SearchResultItem>, offset: usize, page_size: usize) -> Vec<SearchResultItem> {
    results.into_iter().skip(offset).take(page_size).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_limits() {
        let long = "x".repeat(150);
        let query = SearchQuery::new(&long, SearchCategory::All, 42);
        assert_eq!(query.text.chars().count(), MAX_QUERY_CHARS);
        assert_eq!(query.page, MAX_PAGE);
        assert_eq!(query.page_size, 5);

        let query = SearchQuery::new("  dune ", SearchCategory::Book, 0);
        assert_eq!(query.text, "dune");
        assert_eq!(query.page, 1);
        assert_eq!(query.page_size, 10);
    }

    #[test]
    fn test_upstream_window() {
        let query = SearchQuery::new("q", SearchCategory::All, 5);
        assert_eq!(query.upstream_window(20), (2, 0));
        let query = SearchQuery::new("q", SearchCategory::Movie, 2);
        assert_eq!(query.upstream_window(20), (1, 10));
    }

    #[test]
    fn test_movietv_includes_movie_sites() {
        assert!(SearchCategory::MovieTv.includes_any(&[SearchCategory::Movie]));
        assert!(!SearchCategory::Book.includes_any(&[SearchCategory::Movie, SearchCategory::Tv]));
        assert!(SearchCategory::All.includes_any(&[SearchCategory::Game]));
    }
}
