//! IMDB titles. The id is resolved through TMDB's find endpoint when possible;
//! the IMDB page itself is only parsed as a last resort.

use super::html;
use super::id_type::{IdType, SiteName};
use super::site::{required, ScrapeContext, ScrapeError, Site, SiteTarget};
use super::tmdb;
use crate::document::{
    DocumentHeader, ItemKind, LocalizedText, MovieDetails, NormalizedDocument, ResourceLink,
    TvEpisodeDetails, TvShowDetails, WorkDetails,
};
use crate::fetch::Fetch;
use lazy_static::lazy_static;
use regex::Regex;
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

lazy_static! {
    static ref PATTERNS: Vec<Regex> = vec![
        Regex::new(r"^\w+://www\.imdb\.com/title/(tt\d+)").unwrap(),
        Regex::new(r"^\w+://m\.imdb\.com/title/(tt\d+)").unwrap(),
    ];
    static ref EPISODE_TITLE: Regex = Regex::new(r"^Episode #(\d+)\.(\d+)").unwrap();
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct FindResponse {
    movie_results: Vec<FoundId>,
    tv_results: Vec<FoundId>,
    tv_season_results: Vec<FoundEpisode>,
    tv_episode_results: Vec<FoundEpisode>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct FoundId {
    id: u64,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct FoundEpisode {
    show_id: u64,
    season_number: u32,
    episode_number: u32,
}

impl FindResponse {
    fn tmdb_url(&self) -> Option<String> {
        if let Some(m) = self.movie_results.first() {
            return Some(format!("https://www.themoviedb.org/movie/{}", m.id));
        }
        if let Some(t) = self.tv_results.first() {
            return Some(format!("https://www.themoviedb.org/tv/{}", t.id));
        }
        if let Some(s) = self.tv_season_results.first() {
            return Some(format!(
                "https://www.themoviedb.org/tv/{}/season/{}",
                s.show_id, s.season_number
            ));
        }
        self.tv_episode_results.first().map(|e| {
            format!(
                "https://www.themoviedb.org/tv/{}/season/{}/episode/{}",
                e.show_id, e.season_number, e.episode_number
            )
        })
    }
}

pub struct Imdb;

impl Imdb {
    fn scrape_via_tmdb(
        &self,
        target: &SiteTarget,
        ctx: &ScrapeContext<'_>,
    ) -> Result<Option<NormalizedDocument>, ScrapeError> {
        let Some(key) = ctx.api_keys.tmdb.as_deref().filter(|k| !k.is_empty()) else {
            return Ok(None);
        };
        let url = tmdb::find_url(&target.id_value, key, &tmdb::default_language(ctx.languages));
        let found: FindResponse = match ctx.fetch.basic().download(&url) {
            Ok(response) => response.as_json()?,
            Err(err) => {
                debug!(id = %target.id_value, "TMDB find failed: {}", err);
                return Ok(None);
            }
        };
        let Some(tmdb_url) = found.tmdb_url() else {
            return Ok(None);
        };
        let Some(resolved) = ctx.registry.match_static(&tmdb_url) else {
            return Ok(None);
        };

        let mut document = resolved.site.scrape(&resolved.target, ctx)?;
        // The TMDB page owns its parent links; this resource should not pull them.
        document.header.required_resources.clear();
        document.header.add_lookup_id(IdType::Imdb, Some(&target.id_value));
        document.header.prematched_resources.push(ResourceLink::new(
            resolved.target.id_type,
            resolved.target.id_value.clone(),
            resolved.target.url.clone(),
        ));
        Ok(Some(document))
    }

    fn scrape_page(
        &self,
        target: &SiteTarget,
        ctx: &ScrapeContext<'_>,
    ) -> Result<NormalizedDocument, ScrapeError> {
        let page = ctx.fetch.retrying().download(&target.url)?.as_html();
        let raw = html::script(&page, "script#__NEXT_DATA__")
            .ok_or(ScrapeError::MissingField("__NEXT_DATA__"))?;
        let next: Value = serde_json::from_str(&raw)
            .map_err(|e| ScrapeError::parse(&target.url, e.to_string()))?;
        let data = &next["props"]["pageProps"]["aboveTheFoldData"];

        let mut title = required("title", data["titleText"]["text"].as_str())?;
        let year = data["releaseYear"]["year"].as_i64().map(|y| y as i32);
        let is_episode = data["titleType"]["isEpisode"].as_bool().unwrap_or(false);
        let is_series = data["titleType"]["isSeries"].as_bool().unwrap_or(false);
        let genre: Vec<String> = data["genres"]["genres"]
            .as_array()
            .map(|gs| {
                gs.iter()
                    .filter_map(|g| g["text"].as_str().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default();
        let brief = data["plot"]["plotText"]["plainText"].as_str().unwrap_or("").trim();

        if is_episode {
            if let Some(caps) = EPISODE_TITLE.captures(&title) {
                title = format!("S{}E{}", &caps[1], &caps[2]);
            }
        }

        let mut header = DocumentHeader::new(&title);
        header.localized_title = vec![LocalizedText::new("en", &title)];
        if !brief.is_empty() {
            header.localized_description = vec![LocalizedText::new("en", brief)];
        }
        header.cover_image_url = data["primaryImage"]["url"].as_str().map(str::to_string);
        header.add_lookup_id(IdType::Imdb, Some(&target.id_value));

        let imdb_code = Some(target.id_value.clone());
        let details = if is_episode {
            let episode = &data["series"]["episodeNumber"];
            WorkDetails::TvEpisode(TvEpisodeDetails {
                season_number: episode["seasonNumber"].as_u64().map(|n| n as u32),
                episode_number: episode["episodeNumber"].as_u64().map(|n| n as u32),
                air_date: None,
                imdb_code,
            })
        } else if is_series {
            WorkDetails::TvShow(TvShowDetails {
                genre,
                year,
                imdb_code,
                ..Default::default()
            })
        } else {
            WorkDetails::Movie(MovieDetails {
                genre,
                year,
                imdb_code,
                ..Default::default()
            })
        };
        Ok(NormalizedDocument::new(header, details))
    }
}

impl Site for Imdb {
    fn site_name(&self) -> SiteName {
        SiteName::Imdb
    }

    fn id_type(&self) -> IdType {
        IdType::Imdb
    }

    fn url_patterns(&self) -> &[Regex] {
        &PATTERNS
    }

    /// Movie, show or episode depending on what the id turns out to be.
    fn default_kind(&self) -> Option<ItemKind> {
        None
    }

    fn id_to_url(&self, id_value: &str) -> String {
        format!("https://www.imdb.com/title/{id_value}/")
    }

    fn scrape(
        &self,
        target: &SiteTarget,
        ctx: &ScrapeContext<'_>,
    ) -> Result<NormalizedDocument, ScrapeError> {
        match self.scrape_via_tmdb(target, ctx)? {
            Some(document) => Ok(document),
            None => self.scrape_page(target, ctx),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mobile_and_desktop_urls_share_an_id() {
        assert_eq!(
            Imdb.url_to_id("https://m.imdb.com/title/tt0133093/?ref_=x").as_deref(),
            Some("tt0133093")
        );
        assert_eq!(
            Imdb.url_to_id("https://www.imdb.com/title/tt0133093/").as_deref(),
            Some("tt0133093")
        );
    }

    #[test]
    fn test_find_response_prefers_movies() {
        let found: FindResponse = serde_json::from_value(serde_json::json!({
            "movie_results": [{"id": 603}],
            "tv_results": [{"id": 1399}]
        }))
        .unwrap();
        assert_eq!(found.tmdb_url().as_deref(), Some("https://www.themoviedb.org/movie/603"));

        let found: FindResponse = serde_json::from_value(serde_json::json!({
            "tv_episode_results": [{"show_id": 1399, "season_number": 2, "episode_number": 5}]
        }))
        .unwrap();
        assert_eq!(
            found.tmdb_url().as_deref(),
            Some("https://www.themoviedb.org/tv/1399/season/2/episode/5")
        );
    }
}
