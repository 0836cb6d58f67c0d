//! The Movie Database: movies, shows, seasons and episodes through the v3 API.

use super::id_type::{IdType, SiteName};
use super::site::{required, ScrapeContext, ScrapeError, Site, SiteTarget};
use crate::document::{
    DocumentHeader, ItemKind, LocalizedText, MovieDetails, NormalizedDocument, ResourceLink,
    TvEpisodeDetails, TvSeasonDetails, TvShowDetails, WorkDetails,
};
use crate::fetch::Fetch;
use crate::search::{window, SearchCategory, SearchClient, SearchQuery, SearchResultItem};
use async_trait::async_trait;
use lazy_static::lazy_static;
use regex::Regex;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::warn;

const API_BASE: &str = "https://api.themoviedb.org/3";
const IMAGE_BASE: &str = "https://image.tmdb.org/t/p/original/";
const SEARCH_IMAGE_BASE: &str = "https://image.tmdb.org/t/p/w500/";
const UPSTREAM_PAGE_SIZE: usize = 20;

lazy_static! {
    static ref MOVIE_PATTERNS: Vec<Regex> =
        vec![Regex::new(r"^\w+://www\.themoviedb\.org/movie/(\d+)").unwrap()];
    static ref TV_PATTERNS: Vec<Regex> = vec![
        Regex::new(r"^\w+://www\.themoviedb\.org/tv/(\d+)[^/]*/?$").unwrap(),
        Regex::new(r"^\w+://www\.themoviedb\.org/tv/(\d+)[^/]*/seasons$").unwrap(),
    ];
    static ref SEASON_PATTERNS: Vec<Regex> =
        vec![Regex::new(r"^\w+://www\.themoviedb\.org/tv/(\d+)[^/]*/season/(\d+)[^/]*/?$").unwrap()];
    static ref EPISODE_PATTERNS: Vec<Regex> = vec![Regex::new(
        r"^\w+://www\.themoviedb\.org/tv/(\d+)[^/]*/season/(\d+)/episode/(\d+)[^/]*$"
    )
    .unwrap()];
}

/// Detail endpoint for `path` in one language, with ids and credits appended.
pub fn detail_url(path: &str, api_key: &str, language: &str) -> String {
    format!(
        "{API_BASE}/{path}?api_key={api_key}&language={language}&append_to_response=external_ids,credits"
    )
}

pub fn find_url(imdb_id: &str, api_key: &str, language: &str) -> String {
    format!("{API_BASE}/find/{imdb_id}?api_key={api_key}&language={language}&external_source=imdb_id")
}

/// `(lang, api parameter)` pairs for the configured languages. Chinese
/// expands to its three regional variants.
pub fn preferred_languages(languages: &[String]) -> Vec<(String, String)> {
    let mut pairs = Vec::new();
    for lang in languages {
        if lang == "zh" {
            for (l, p) in [("zh-cn", "zh-CN"), ("zh-tw", "zh-TW"), ("zh-hk", "zh-HK")] {
                pairs.push((l.to_string(), p.to_string()));
            }
        } else {
            pairs.push((lang.clone(), lang.clone()));
        }
    }
    if pairs.is_empty() {
        pairs.push(("en".to_string(), "en-US".to_string()));
    }
    pairs
}

pub fn default_language(languages: &[String]) -> String {
    match languages.first().map(String::as_str) {
        Some("zh") => "zh-CN".to_string(),
        Some(lang) => lang.to_string(),
        None => "en-US".to_string(),
    }
}

fn api_key<'a>(ctx: &'a ScrapeContext<'_>) -> Result<&'a str, ScrapeError> {
    ctx.api_keys
        .tmdb
        .as_deref()
        .filter(|k| !k.is_empty())
        .ok_or_else(|| ScrapeError::Unsupported("TMDB API key is not configured".to_string()))
}

fn poster(path: Option<&str>) -> Option<String> {
    path.filter(|p| !p.is_empty())
        .map(|p| format!("{IMAGE_BASE}{}", p.trim_start_matches('/')))
}

fn year_of(date: Option<&str>) -> Option<i32> {
    date?.split('-').next()?.parse().ok()
}

fn non_blank(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

fn split_id<const N: usize>(target: &SiteTarget) -> Result<[String; N], ScrapeError> {
    let parts: Vec<String> = target.id_value.split('-').map(str::to_string).collect();
    parts
        .try_into()
        .map_err(|_| ScrapeError::parse(&target.url, format!("malformed id {}", target.id_value)))
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Named {
    name: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct CrewMember {
    name: String,
    job: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Credits {
    cast: Vec<Named>,
    crew: Vec<CrewMember>,
}

impl Credits {
    fn crew_with_job(&self, job: &str) -> Vec<String> {
        self.crew
            .iter()
            .filter(|c| c.job == job)
            .map(|c| c.name.clone())
            .collect()
    }

    fn cast(&self) -> Vec<String> {
        self.cast.iter().map(|c| c.name.clone()).collect()
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ExternalIds {
    imdb_id: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct MovieResponse {
    title: Option<String>,
    original_title: Option<String>,
    overview: Option<String>,
    release_date: Option<String>,
    runtime: Option<u32>,
    imdb_id: Option<String>,
    genres: Vec<Named>,
    spoken_languages: Vec<Named>,
    credits: Credits,
    poster_path: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct SeasonStub {
    season_number: u32,
    name: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct TvResponse {
    name: Option<String>,
    original_name: Option<String>,
    overview: Option<String>,
    first_air_date: Option<String>,
    external_ids: ExternalIds,
    genres: Vec<Named>,
    spoken_languages: Vec<Named>,
    created_by: Vec<Named>,
    credits: Credits,
    poster_path: Option<String>,
    number_of_seasons: Option<u32>,
    seasons: Vec<SeasonStub>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct EpisodeStub {
    episode_number: u32,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct SeasonResponse {
    id: Option<u64>,
    name: Option<String>,
    overview: Option<String>,
    air_date: Option<String>,
    season_number: Option<u32>,
    external_ids: ExternalIds,
    poster_path: Option<String>,
    episodes: Vec<EpisodeStub>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct EpisodeResponse {
    id: Option<u64>,
    name: Option<String>,
    overview: Option<String>,
    air_date: Option<String>,
    season_number: Option<u32>,
    episode_number: Option<u32>,
    external_ids: ExternalIds,
    still_path: Option<String>,
}

/// Fetches `path` once per preferred language, least preferred first, and
/// returns the most preferred response with every language's title and
/// overview collected.
fn fetch_localized<T, F>(
    ctx: &ScrapeContext<'_>,
    path: &str,
    texts: F,
) -> Result<(T, Vec<LocalizedText>, Vec<LocalizedText>), ScrapeError>
where
    T: DeserializeOwned,
    F: Fn(&T) -> (Option<String>, Option<String>),
{
    let key = api_key(ctx)?;
    let fetcher = ctx.fetch.retrying();
    let mut titles = Vec::new();
    let mut descriptions = Vec::new();
    let mut last = None;
    for (lang, param) in preferred_languages(ctx.languages).into_iter().rev() {
        let data: T = fetcher.download(&detail_url(path, key, &param))?.as_json()?;
        let (title, overview) = texts(&data);
        if let Some(title) = non_blank(title.as_deref()) {
            titles.push(LocalizedText::new(&lang, title));
        }
        if let Some(overview) = non_blank(overview.as_deref()) {
            descriptions.push(LocalizedText::new(&lang, overview));
        }
        last = Some(data);
    }
    let data = last.ok_or_else(|| ScrapeError::parse(path, "no language configured"))?;
    Ok((data, titles, descriptions))
}

fn season_link(show_id: &str, season_number: u32) -> ResourceLink {
    ResourceLink::new(
        IdType::TmdbTvSeason,
        format!("{show_id}-{season_number}"),
        format!("https://www.themoviedb.org/tv/{show_id}/season/{season_number}"),
    )
}

fn show_link(show_id: &str) -> ResourceLink {
    ResourceLink::new(
        IdType::TmdbTv,
        show_id,
        format!("https://www.themoviedb.org/tv/{show_id}"),
    )
}

pub struct TmdbMovie;

#[async_trait]
impl Site for TmdbMovie {
    fn site_name(&self) -> SiteName {
        SiteName::Tmdb
    }

    fn id_type(&self) -> IdType {
        IdType::TmdbMovie
    }

    fn url_patterns(&self) -> &[Regex] {
        &MOVIE_PATTERNS
    }

    fn default_kind(&self) -> Option<ItemKind> {
        Some(ItemKind::Movie)
    }

    fn id_to_url(&self, id_value: &str) -> String {
        format!("https://www.themoviedb.org/movie/{id_value}")
    }

    fn scrape(
        &self,
        target: &SiteTarget,
        ctx: &ScrapeContext<'_>,
    ) -> Result<NormalizedDocument, ScrapeError> {
        let (data, titles, descriptions): (MovieResponse, _, _) =
            fetch_localized(ctx, &format!("movie/{}", target.id_value), |m: &MovieResponse| {
                (m.title.clone(), m.overview.clone())
            })?;

        let mut header = DocumentHeader::new(required("title", data.title.as_deref())?);
        header.localized_title = titles;
        header.localized_description = descriptions;
        header.cover_image_url = poster(data.poster_path.as_deref());
        header.add_lookup_id(IdType::Imdb, data.imdb_id.as_deref());

        let details = MovieDetails {
            orig_title: non_blank(data.original_title.as_deref()),
            director: data.credits.crew_with_job("Director"),
            playwright: data.credits.crew_with_job("Screenplay"),
            actor: data.credits.cast(),
            genre: data.genres.into_iter().map(|g| g.name).collect(),
            language: data.spoken_languages.into_iter().map(|l| l.name).collect(),
            year: year_of(data.release_date.as_deref()),
            duration_minutes: data.runtime.filter(|r| *r > 0),
            imdb_code: non_blank(data.imdb_id.as_deref()),
        };
        Ok(NormalizedDocument::new(header, WorkDetails::Movie(details)))
    }

    /// Older movie records may come without an IMDB id in the detail payload;
    /// the external ids endpoint usually still has it.
    fn scrape_additional(
        &self,
        target: &SiteTarget,
        document: &mut NormalizedDocument,
        ctx: &ScrapeContext<'_>,
    ) -> Result<(), ScrapeError> {
        if document.header.lookup_ids.contains_key(&IdType::Imdb) {
            return Ok(());
        }
        let key = api_key(ctx)?;
        let url = format!("{API_BASE}/movie/{}/external_ids?api_key={key}", target.id_value);
        match ctx.fetch.basic().download(&url) {
            Ok(response) => {
                let ids: ExternalIds = response.as_json()?;
                document.header.add_lookup_id(IdType::Imdb, ids.imdb_id.as_deref());
                if let WorkDetails::Movie(details) = &mut document.details {
                    details.imdb_code = non_blank(ids.imdb_id.as_deref());
                }
            }
            Err(err) => warn!(url = %target.url, "No external ids for movie: {}", err),
        }
        Ok(())
    }

    async fn search(
        &self,
        query: &SearchQuery,
        client: &SearchClient,
    ) -> anyhow::Result<Vec<SearchResultItem>> {
        if !query.category.includes_any(&[SearchCategory::Movie, SearchCategory::Tv]) {
            return Ok(Vec::new());
        }
        let Some(key) = client.api_keys().tmdb.as_deref() else {
            return Ok(Vec::new());
        };
        let (page, offset) = query.upstream_window(UPSTREAM_PAGE_SIZE);
        let url = format!(
            "{API_BASE}/search/multi?query={}&page={page}&api_key={key}&language={}&include_adult=true",
            urlencoding::encode(&query.text),
            default_language(client.languages()),
        );
        let response: SearchResponse = client.get_json(&url).await?;
        let results = response
            .results
            .into_iter()
            .filter_map(SearchHit::into_item)
            .collect();
        Ok(window(results, offset, query.page_size))
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct SearchResponse {
    results: Vec<SearchHit>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct SearchHit {
    id: u64,
    media_type: String,
    title: Option<String>,
    name: Option<String>,
    original_title: Option<String>,
    original_name: Option<String>,
    release_date: Option<String>,
    first_air_date: Option<String>,
    overview: Option<String>,
    poster_path: Option<String>,
}

impl SearchHit {
    fn into_item(self) -> Option<SearchResultItem> {
        let (category, title, date, original) = match self.media_type.as_str() {
            "movie" => (ItemKind::Movie, self.title?, self.release_date, self.original_title),
            "tv" => (ItemKind::TvShow, self.name?, self.first_air_date, self.original_name),
            _ => return None,
        };
        Some(SearchResultItem {
            category: Some(category),
            source_site: SiteName::Tmdb.as_str().to_string(),
            url: format!("https://www.themoviedb.org/{}/{}", self.media_type, self.id),
            title,
            subtitle: format!("{} {}", date.unwrap_or_default(), original.unwrap_or_default())
                .trim()
                .to_string(),
            brief: self.overview.unwrap_or_default(),
            cover_url: self
                .poster_path
                .filter(|p| !p.is_empty())
                .map(|p| format!("{SEARCH_IMAGE_BASE}{}", p.trim_start_matches('/'))),
        })
    }
}

pub struct TmdbTv;

impl Site for TmdbTv {
    fn site_name(&self) -> SiteName {
        SiteName::Tmdb
    }

    fn id_type(&self) -> IdType {
        IdType::TmdbTv
    }

    fn url_patterns(&self) -> &[Regex] {
        &TV_PATTERNS
    }

    fn default_kind(&self) -> Option<ItemKind> {
        Some(ItemKind::TvShow)
    }

    fn id_to_url(&self, id_value: &str) -> String {
        format!("https://www.themoviedb.org/tv/{id_value}")
    }

    fn scrape(
        &self,
        target: &SiteTarget,
        ctx: &ScrapeContext<'_>,
    ) -> Result<NormalizedDocument, ScrapeError> {
        let (data, titles, descriptions): (TvResponse, _, _) =
            fetch_localized(ctx, &format!("tv/{}", target.id_value), |t: &TvResponse| {
                (t.name.clone(), t.overview.clone())
            })?;

        let mut header = DocumentHeader::new(required("title", data.name.as_deref())?);
        header.localized_title = titles;
        header.localized_description = descriptions;
        header.cover_image_url = poster(data.poster_path.as_deref());
        header.add_lookup_id(IdType::Imdb, data.external_ids.imdb_id.as_deref());
        header.related_resources = data
            .seasons
            .iter()
            .map(|s| season_link(&target.id_value, s.season_number).with_title(&s.name))
            .collect();

        let details = TvShowDetails {
            orig_title: non_blank(data.original_name.as_deref()),
            director: data.created_by.into_iter().map(|c| c.name).collect(),
            playwright: data.credits.crew_with_job("Screenplay"),
            actor: data.credits.cast(),
            genre: data.genres.into_iter().map(|g| g.name).collect(),
            language: data.spoken_languages.into_iter().map(|l| l.name).collect(),
            year: year_of(data.first_air_date.as_deref()),
            season_count: data.number_of_seasons,
            imdb_code: non_blank(data.external_ids.imdb_id.as_deref()),
        };
        Ok(NormalizedDocument::new(header, WorkDetails::TvShow(details)))
    }
}

pub struct TmdbTvSeason;

impl Site for TmdbTvSeason {
    fn site_name(&self) -> SiteName {
        SiteName::Tmdb
    }

    fn id_type(&self) -> IdType {
        IdType::TmdbTvSeason
    }

    fn url_patterns(&self) -> &[Regex] {
        &SEASON_PATTERNS
    }

    fn default_kind(&self) -> Option<ItemKind> {
        Some(ItemKind::TvSeason)
    }

    fn url_to_id(&self, url: &str) -> Option<String> {
        let caps = SEASON_PATTERNS.iter().find_map(|p| p.captures(url))?;
        Some(format!("{}-{}", caps.get(1)?.as_str(), caps.get(2)?.as_str()))
    }

    fn id_to_url(&self, id_value: &str) -> String {
        let (show, season) = id_value.split_once('-').unwrap_or((id_value, ""));
        format!("https://www.themoviedb.org/tv/{show}/season/{season}")
    }

    /// The season title is composed from the show's, and its IMDB id is
    /// borrowed from the show (season 1) or the first episode, so the show
    /// must be acquired first.
    fn scrape(
        &self,
        target: &SiteTarget,
        ctx: &ScrapeContext<'_>,
    ) -> Result<NormalizedDocument, ScrapeError> {
        let [show_id, season_number] = split_id::<2>(target)?;
        let show_link = show_link(&show_id);
        let show = ctx.dependencies.require(&show_link)?;
        let show_doc = show
            .document
            .as_ref()
            .ok_or_else(|| ScrapeError::parse(&target.url, "show resource has no content"))?;

        let path = format!("tv/{show_id}/season/{season_number}");
        let (data, titles, descriptions): (SeasonResponse, _, _) =
            fetch_localized(ctx, &path, |s: &SeasonResponse| (s.name.clone(), s.overview.clone()))?;
        if data.id.is_none() {
            return Err(ScrapeError::MissingField("id"));
        }

        let season_name = non_blank(data.name.as_deref())
            .unwrap_or_else(|| format!("Season {}", data.season_number.unwrap_or_default()));
        let mut header = DocumentHeader::new(format!("{} {}", show_doc.title(), season_name));
        header.localized_title = titles;
        header.localized_description = descriptions;
        header.cover_image_url = poster(data.poster_path.as_deref());
        header.required_resources = vec![show_link.with_title(show_doc.title())];

        let episode_numbers: Vec<u32> = data.episodes.iter().map(|e| e.episode_number).collect();
        let imdb = if let Some(own) = non_blank(data.external_ids.imdb_id.as_deref()) {
            warn!(url = %target.url, "Unexpected IMDB id for a TMDB season");
            Some(own)
        } else if data.season_number == Some(1) {
            show_doc.header.lookup_ids.get(&IdType::Imdb).cloned()
        } else if let Some(first) = episode_numbers.first() {
            let key = api_key(ctx)?;
            let url = detail_url(
                &format!("{path}/episode/{first}"),
                key,
                &default_language(ctx.languages),
            );
            let episode: EpisodeResponse = ctx.fetch.retrying().download(&url)?.as_json()?;
            if episode.id.is_none() {
                return Err(ScrapeError::MissingField("first episode id"));
            }
            non_blank(episode.external_ids.imdb_id.as_deref())
        } else {
            warn!(url = %target.url, "No IMDB id for a season without episodes");
            None
        };
        header.add_lookup_id(IdType::Imdb, imdb.as_deref());

        let details = TvSeasonDetails {
            season_number: data.season_number,
            episode_count: Some(episode_numbers.len() as u32),
            episode_numbers,
            air_date: non_blank(data.air_date.as_deref()),
            imdb_code: imdb,
        };
        Ok(NormalizedDocument::new(header, WorkDetails::TvSeason(details)))
    }
}

pub struct TmdbTvEpisode;

impl Site for TmdbTvEpisode {
    fn site_name(&self) -> SiteName {
        SiteName::Tmdb
    }

    fn id_type(&self) -> IdType {
        IdType::TmdbTvEpisode
    }

    fn url_patterns(&self) -> &[Regex] {
        &EPISODE_PATTERNS
    }

    fn default_kind(&self) -> Option<ItemKind> {
        Some(ItemKind::TvEpisode)
    }

    fn url_to_id(&self, url: &str) -> Option<String> {
        let caps = EPISODE_PATTERNS.iter().find_map(|p| p.captures(url))?;
        Some(format!(
            "{}-{}-{}",
            caps.get(1)?.as_str(),
            caps.get(2)?.as_str(),
            caps.get(3)?.as_str()
        ))
    }

    fn id_to_url(&self, id_value: &str) -> String {
        let parts: Vec<&str> = id_value.splitn(3, '-').collect();
        match parts.as_slice() {
            [show, season, episode] => format!(
                "https://www.themoviedb.org/tv/{show}/season/{season}/episode/{episode}"
            ),
            _ => format!("https://www.themoviedb.org/tv/{id_value}"),
        }
    }

    fn scrape(
        &self,
        target: &SiteTarget,
        ctx: &ScrapeContext<'_>,
    ) -> Result<NormalizedDocument, ScrapeError> {
        let [show_id, season_number, episode_number] = split_id::<3>(target)?;
        let key = api_key(ctx)?;
        let url = detail_url(
            &format!("tv/{show_id}/season/{season_number}/episode/{episode_number}"),
            key,
            &default_language(ctx.languages),
        );
        let data: EpisodeResponse = ctx.fetch.retrying().download(&url)?.as_json()?;
        if data.id.is_none() {
            return Err(ScrapeError::MissingField("id"));
        }

        let title = non_blank(data.name.as_deref()).unwrap_or_else(|| {
            format!(
                "S{} E{}",
                data.season_number.unwrap_or_default(),
                data.episode_number.unwrap_or_default()
            )
        });
        let mut header = DocumentHeader::new(title);
        if let Some(overview) = non_blank(data.overview.as_deref()) {
            header.localized_description = vec![LocalizedText::new(
                default_language(ctx.languages).to_lowercase(),
                overview,
            )];
        }
        header.cover_image_url = poster(data.still_path.as_deref());
        header.add_lookup_id(IdType::Imdb, data.external_ids.imdb_id.as_deref());
        header.required_resources = vec![season_link(
            &show_id,
            season_number.parse().map_err(|_| {
                ScrapeError::parse(&target.url, format!("bad season number {season_number}"))
            })?,
        )];

        let details = TvEpisodeDetails {
            season_number: data.season_number,
            episode_number: data.episode_number,
            air_date: non_blank(data.air_date.as_deref()),
            imdb_code: non_blank(data.external_ids.imdb_id.as_deref()),
        };
        Ok(NormalizedDocument::new(header, WorkDetails::TvEpisode(details)))
    }
}
