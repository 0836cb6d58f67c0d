//! Bangumi subjects through the v0 API. One subject id covers books, anime,
//! music and games, so the category comes from the payload.

use super::id_type::{IdType, SiteName};
use super::site::{required, ScrapeContext, ScrapeError, Site, SiteTarget};
use crate::document::{
    AlbumDetails, BookDetails, DocumentHeader, GameDetails, ItemKind, LocalizedText, MovieDetails,
    NormalizedDocument, ResourceLink, TvSeasonDetails, WorkDetails,
};
use crate::fetch::Fetch;
use crate::search::{SearchCategory, SearchClient, SearchQuery, SearchResultItem};
use async_trait::async_trait;
use lazy_static::lazy_static;
use regex::Regex;
use serde::Deserialize;
use serde_json::Value;

const API_BASE: &str = "https://api.bgm.tv/v0/subjects";

/// Platforms of video subjects that are episodic.
const SEASON_PLATFORMS: &[&str] = &["TV", "OVA", "WEB", "电视剧", "欧美剧", "日剧", "华语剧", "综艺"];

lazy_static! {
    static ref PATTERNS: Vec<Regex> = vec![
        Regex::new(r"^https://bgm\.tv/subject/(\d+)").unwrap(),
        Regex::new(r"^https://bangumi\.tv/subject/(\d+)").unwrap(),
        Regex::new(r"^https://chii\.in/subject/(\d+)").unwrap(),
    ];
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Subject {
    #[serde(rename = "type")]
    kind: u8,
    name: Option<String>,
    name_cn: Option<String>,
    summary: Option<String>,
    date: Option<String>,
    platform: Option<String>,
    series: bool,
    total_episodes: Option<u32>,
    images: Option<Images>,
    infobox: Vec<InfoboxEntry>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Images {
    large: Option<String>,
    common: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct InfoboxEntry {
    key: String,
    value: Value,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RelatedSubject {
    id: u64,
    relation: String,
}

impl InfoboxEntry {
    /// Infobox values are either a plain string or a list of `{"v": ..}`.
    fn values(&self) -> Vec<String> {
        match &self.value {
            Value::String(s) if !s.trim().is_empty() => vec![s.trim().to_string()],
            Value::Array(items) => items
                .iter()
                .filter_map(|i| i["v"].as_str().or_else(|| i.as_str()))
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),
            _ => Vec::new(),
        }
    }

    fn first(&self) -> Option<String> {
        self.values().into_iter().next()
    }
}

#[derive(Default)]
struct Infobox {
    aliases: Vec<String>,
    episodes: Option<u32>,
    imdb: Option<String>,
    isbn: Option<String>,
    language: Vec<String>,
    publisher: Option<String>,
    director: Vec<String>,
    playwright: Vec<String>,
    authors: Vec<String>,
    platform: Vec<String>,
    genre: Vec<String>,
    website: Option<String>,
    pages: Option<u32>,
}

impl Infobox {
    fn parse(entries: &[InfoboxEntry]) -> Self {
        let mut info = Infobox::default();
        for entry in entries {
            match entry.key.to_lowercase().as_str() {
                "别名" => info.aliases = entry.values(),
                "话数" => info.episodes = entry.first().and_then(|v| v.parse().ok()),
                "imdb_id" => info.imdb = entry.first(),
                "isbn" => info.isbn = entry.first().map(|v| v.replace('-', "")),
                "语言" => info.language = entry.values(),
                "出版社" => info.publisher = entry.first(),
                "导演" => info.director = entry.values(),
                "编剧" | "脚本" => info.playwright = entry.values(),
                "原作" | "作画" | "作者" => info.authors.extend(entry.values()),
                "平台" => info.platform = entry.values(),
                "游戏类型" | "类型" => info.genre = entry.values(),
                "官方网站" | "website" => info.website = entry.first(),
                "页数" => info.pages = entry.first().and_then(|v| v.parse().ok()),
                _ => {}
            }
        }
        info
    }
}

pub struct Bangumi;

impl Bangumi {
    /// Single volumes of a book series, crawled as related resources.
    fn volumes(&self, target: &SiteTarget, ctx: &ScrapeContext<'_>) -> Vec<ResourceLink> {
        let url = format!("{API_BASE}/{}/subjects", target.id_value);
        let Ok(response) = ctx.fetch.basic().download(&url) else {
            return Vec::new();
        };
        let related: Vec<RelatedSubject> = response.as_json().unwrap_or_default();
        related
            .into_iter()
            .filter(|s| s.relation == "单行本")
            .map(|s| {
                ResourceLink::new(
                    IdType::Bangumi,
                    s.id.to_string(),
                    self.id_to_url(&s.id.to_string()),
                )
            })
            .collect()
    }
}

#[async_trait]
impl Site for Bangumi {
    fn site_name(&self) -> SiteName {
        SiteName::Bangumi
    }

    fn id_type(&self) -> IdType {
        IdType::Bangumi
    }

    fn url_patterns(&self) -> &[Regex] {
        &PATTERNS
    }

    fn default_kind(&self) -> Option<ItemKind> {
        None
    }

    fn id_to_url(&self, id_value: &str) -> String {
        format!("https://bgm.tv/subject/{id_value}")
    }

    fn scrape(
        &self,
        target: &SiteTarget,
        ctx: &ScrapeContext<'_>,
    ) -> Result<NormalizedDocument, ScrapeError> {
        let url = format!("{API_BASE}/{}", target.id_value);
        let subject: Subject = ctx.fetch.retrying().download(&url)?.as_json()?;

        let title = required(
            "title",
            subject
                .name_cn
                .as_deref()
                .filter(|n| !n.trim().is_empty())
                .or(subject.name.as_deref()),
        )?;
        let orig_title = subject
            .name
            .clone()
            .filter(|n| !n.trim().is_empty() && *n != title);
        let info = Infobox::parse(&subject.infobox);
        let date = subject.date.clone().filter(|d| !d.is_empty());
        let year = date
            .as_deref()
            .and_then(|d| d.split('-').next())
            .and_then(|y| y.parse().ok());

        let mut header = DocumentHeader::new(&title);
        let mut titles: Vec<LocalizedText> = Vec::new();
        if let Some(cn) = subject.name_cn.as_deref().filter(|n| !n.trim().is_empty()) {
            titles.push(LocalizedText::new("zh-cn", cn));
        }
        for alias in info.aliases.iter().chain(orig_title.iter()) {
            if !titles.iter().any(|t| &t.text == alias) {
                titles.push(LocalizedText::new("ja", alias));
            }
        }
        if titles.is_empty() {
            titles.push(LocalizedText::new("ja", &title));
        }
        header.localized_title = titles;
        if let Some(summary) = subject.summary.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            header.localized_description = vec![LocalizedText::new("zh-cn", summary)];
        }
        header.cover_image_url = subject
            .images
            .as_ref()
            .and_then(|i| i.large.clone().or_else(|| i.common.clone()));
        header.add_lookup_id(IdType::Imdb, info.imdb.as_deref());
        header.add_lookup_id(IdType::Isbn, info.isbn.as_deref());

        let details = match subject.kind {
            1 => {
                if subject.series {
                    header.related_resources = self.volumes(target, ctx);
                }
                let mut parts = date.as_deref().unwrap_or("").split('-');
                WorkDetails::Book(BookDetails {
                    orig_title,
                    author: info.authors,
                    language: info.language,
                    pub_house: info.publisher,
                    pub_year: parts.next().and_then(|y| y.parse().ok()),
                    pub_month: parts.next().and_then(|m| m.parse().ok()),
                    pages: info.pages,
                    isbn: info.isbn,
                    ..Default::default()
                })
            }
            2 | 6 => {
                let platform = subject.platform.as_deref().unwrap_or("");
                if SEASON_PLATFORMS.contains(&platform) {
                    WorkDetails::TvSeason(TvSeasonDetails {
                        episode_count: info.episodes.or(subject.total_episodes).filter(|e| *e > 0),
                        air_date: date,
                        imdb_code: info.imdb,
                        ..Default::default()
                    })
                } else {
                    WorkDetails::Movie(MovieDetails {
                        orig_title,
                        director: info.director,
                        playwright: info.playwright,
                        genre: info.genre,
                        language: info.language,
                        year,
                        imdb_code: info.imdb,
                        ..Default::default()
                    })
                }
            }
            3 => WorkDetails::Album(AlbumDetails {
                genre: info.genre,
                release_date: date,
                ..Default::default()
            }),
            4 => WorkDetails::Game(GameDetails {
                developer: info.authors,
                release_date: date,
                genre: info.genre,
                platform: info.platform,
                official_site: info.website,
                ..Default::default()
            }),
            other => {
                return Err(ScrapeError::parse(
                    &target.url,
                    format!("unknown subject type {other}"),
                ))
            }
        };
        Ok(NormalizedDocument::new(header, details))
    }

    async fn search(
        &self,
        query: &SearchQuery,
        client: &SearchClient,
    ) -> anyhow::Result<Vec<SearchResultItem>> {
        let subject_type = match query.category {
            SearchCategory::Book => "1",
            SearchCategory::Music => "3",
            SearchCategory::Game => "4",
            SearchCategory::Movie | SearchCategory::Tv | SearchCategory::MovieTv => "2,6",
            SearchCategory::All => "1,2,3,4,6",
        };
        let url = format!(
            "https://api.bgm.tv/search/subject/{}?type={}&responseGroup=small&start={}&max_results={}",
            urlencoding::encode(&query.text),
            subject_type,
            query.page_size * (query.page as usize - 1),
            query.page_size,
        );
        let response: Value = client.get_json(&url).await?;
        let items = response["list"].as_array().cloned().unwrap_or_default();
        Ok(items
            .into_iter()
            .filter_map(|item| {
                let id = item["id"].as_u64()?;
                let name = item["name"].as_str().unwrap_or("");
                let name_cn = item["name_cn"].as_str().unwrap_or("");
                let title = if name_cn.is_empty() { name } else { name_cn };
                if title.is_empty() {
                    return None;
                }
                let category = match item["type"].as_u64() {
                    Some(1) => Some(ItemKind::Book),
                    Some(2) | Some(6) => Some(ItemKind::TvSeason),
                    Some(3) => Some(ItemKind::Album),
                    Some(4) => Some(ItemKind::Game),
                    _ => None,
                };
                Some(SearchResultItem {
                    category,
                    source_site: SiteName::Bangumi.as_str().to_string(),
                    url: format!("https://bgm.tv/subject/{id}"),
                    title: title.to_string(),
                    subtitle: format!("{} {}", item["air_date"].as_str().unwrap_or(""), name)
                        .trim()
                        .to_string(),
                    brief: item["summary"].as_str().unwrap_or("").to_string(),
                    cover_url: item["images"]["common"].as_str().map(str::to_string),
                })
            })
            .collect())
    }
}
