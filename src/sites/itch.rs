//! itch.io game pages, including games on custom domains and embed widgets.

use super::html;
use super::id_type::{IdType, SiteName};
use super::site::{required, Canonical, ScrapeContext, ScrapeError, Site, SiteTarget};
use crate::document::{DocumentHeader, GameDetails, ItemKind, LocalizedText, NormalizedDocument, WorkDetails};
use crate::fetch::{Fetch, FetchContext};
use chrono::{DateTime, NaiveDate};
use lazy_static::lazy_static;
use regex::Regex;
use scraper::{Html, Selector};
use serde_json::Value;
use tracing::debug;
use url::Url;

lazy_static! {
    static ref PATTERNS: Vec<Regex> = vec![
        Regex::new(r"^https?://([a-z0-9\-]+\.itch\.io/[^/?#]+).*").unwrap(),
        Regex::new(r"^https?://itch\.io/embed/(\d+).*").unwrap(),
        Regex::new(r"^https?://itch\.io/game/(\d+).*").unwrap(),
    ];
    static ref GAME_ID_PATTERNS: Vec<Regex> = vec![
        Regex::new(r#"<meta[^>]+name=["']itch:path["'][^>]+content=["']([^"']+)["']"#).unwrap(),
        Regex::new(r#"data-game_id="(\d+)""#).unwrap(),
        Regex::new(r#"data-game-id="(\d+)""#).unwrap(),
        Regex::new(r#""game_id"\s*:\s*(\d+)"#).unwrap(),
        Regex::new(r"game_id\s*=\s*(\d+)").unwrap(),
        Regex::new(r"itch\.io/embed/(\d+)").unwrap(),
        Regex::new(r"itch\.io/game/(\d+)").unwrap(),
    ];
    static ref ANY_GAME_URL: Regex =
        Regex::new(r"https?://[a-z0-9\-]+\.itch\.io/[a-z0-9\-_]+").unwrap();
    static ref NON_ALNUM: Regex = Regex::new(r"[^a-z0-9]").unwrap();
    static ref DIGITS: Regex = Regex::new(r"^\d+$").unwrap();
}

/// What a quick look at a page reveals about the game it hosts.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct PageProbe {
    pub canonical_url: Option<String>,
    pub game_id: Option<String>,
}

fn host_and_path(url: &str) -> Option<(String, String)> {
    let parsed = Url::parse(url).ok()?;
    let host = parsed.host_str()?.to_lowercase();
    Some((host, parsed.path().trim_matches('/').to_string()))
}

fn is_embed(url: &str) -> bool {
    matches!(host_and_path(url), Some((host, path)) if host == "itch.io" && path.starts_with("embed/"))
}

/// Numeric ids become `games/<id>`, matching the `itch:path` meta tag.
fn normalize_game_id(id: Option<String>) -> Option<String> {
    let id = id?.trim().to_string();
    if id.is_empty() {
        None
    } else if DIGITS.is_match(&id) {
        Some(format!("games/{id}"))
    } else {
        Some(id)
    }
}

fn game_id_from_text(text: &str) -> Option<String> {
    GAME_ID_PATTERNS
        .iter()
        .find_map(|p| p.captures(text))
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
}

fn game_id_from_json_ld(objects: &[Value]) -> Option<String> {
    for object in objects {
        for key in ["identifier", "url", "@id"] {
            let candidate = match object.get(key) {
                Some(Value::String(s)) => Some(s.as_str()),
                Some(Value::Object(o)) => ["value", "@id", "url"]
                    .iter()
                    .find_map(|k| o.get(*k).and_then(Value::as_str)),
                _ => None,
            };
            if let Some(id) = candidate.and_then(game_id_from_text) {
                return Some(id);
            }
        }
    }
    None
}

fn any_game_url(text: &str) -> Option<String> {
    let found = ANY_GAME_URL.find(text)?.as_str();
    let (host, path) = host_and_path(found)?;
    let slug = path.split('/').next().filter(|s| !s.is_empty())?;
    Some(format!("https://{host}/{slug}"))
}

/// The "Download/Play on itch.io" button of an embed widget.
fn embed_target(page: &Html) -> Option<String> {
    let selector = Selector::parse("a[href]").ok()?;
    page.select(&selector).find_map(|a| {
        let label = NON_ALNUM
            .replace_all(&html::element_text(&a).to_lowercase(), "")
            .to_string();
        let is_button = label.contains("onitchio") && (label.contains("download") || label.contains("play"));
        is_button
            .then(|| a.value().attr("href"))
            .flatten()
            .map(|href| href.trim().to_string())
    })
}

fn canonical_of(url: &str, page: &Html, text: &str) -> Option<String> {
    if is_embed(url) {
        embed_target(page)
    } else {
        html::attr(page, "link[rel=\"canonical\"]", "href")
            .or_else(|| html::meta(page, "og:url"))
            .or_else(|| any_game_url(text))
    }
}

fn json_ld_list(value: Option<&Value>) -> Vec<String> {
    match value {
        Some(Value::String(s)) => vec![s.clone()],
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|v| match v {
                Value::String(s) => Some(s.clone()),
                Value::Null => None,
                other => Some(other.to_string()),
            })
            .collect(),
        _ => Vec::new(),
    }
}

fn json_ld_image(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(s) => Some(s.clone()),
        Value::Array(items) => json_ld_image(items.first()),
        Value::Object(o) => o
            .get("url")
            .or_else(|| o.get("@id"))
            .and_then(Value::as_str)
            .map(str::to_string),
        _ => None,
    }
}

/// `YYYY-MM-DD` from an ISO date or date-time.
fn release_date(value: Option<&Value>) -> Option<String> {
    let raw = value?.as_str()?.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.format("%Y-%m-%d").to_string());
    }
    let day = raw.get(..10)?;
    NaiveDate::parse_from_str(day, "%Y-%m-%d")
        .ok()
        .map(|d| d.format("%Y-%m-%d").to_string())
}

#[derive(Default)]
pub struct Itch;

impl Itch {
    /// Fetches `url` with the short probe timeout.
    pub fn probe(&self, url: &str, fetch: &FetchContext) -> PageProbe {
        let response = match fetch.probe().download(url) {
            Ok(response) => response,
            Err(err) => {
                debug!(url, "itch probe failed: {}", err);
                return PageProbe::default();
            }
        };
        let text = response.text();
        let page = response.as_html();
        PageProbe {
            canonical_url: canonical_of(url, &page, &text),
            game_id: normalize_game_id(
                html::meta(&page, "itch:path").or_else(|| game_id_from_text(&text)),
            ),
        }
    }
}

impl Site for Itch {
    fn site_name(&self) -> SiteName {
        SiteName::Itch
    }

    fn id_type(&self) -> IdType {
        IdType::Itch
    }

    fn url_patterns(&self) -> &[Regex] {
        &PATTERNS
    }

    fn default_kind(&self) -> Option<ItemKind> {
        Some(ItemKind::Game)
    }

    fn id_to_url(&self, id_value: &str) -> String {
        format!("https://{id_value}")
    }

    fn url_to_id(&self, url: &str) -> Option<String> {
        let (host, path) = host_and_path(url)?;
        let parts: Vec<&str> = path.split('/').filter(|p| !p.is_empty()).collect();
        if host.ends_with(".itch.io") {
            return parts.first().map(|slug| format!("{host}/{slug}"));
        }
        if host == "itch.io" {
            return match parts.as_slice() {
                [kind @ ("embed" | "game"), id, ..] => Some(format!("{host}/{kind}/{id}")),
                _ => None,
            };
        }
        Some(match parts.first() {
            Some(slug) => format!("{host}/{slug}"),
            None => host,
        })
    }

    /// Games hosted on their own domain still serve itch.io markup.
    fn validate_url_fallback(&self, url: &str, fetch: &FetchContext) -> bool {
        let Ok(parsed) = Url::parse(url) else {
            return false;
        };
        if !matches!(parsed.scheme(), "http" | "https") {
            return false;
        }
        match parsed.host_str().map(str::to_lowercase) {
            Some(host) if host == "itch.io" || host.ends_with(".itch.io") => false,
            Some(_) => {
                let probe = self.probe(url, fetch);
                probe.canonical_url.is_some() || probe.game_id.is_some()
            }
            None => false,
        }
    }

    /// Embed widgets, numeric game links and custom domains point at the
    /// game's `<creator>.itch.io/<slug>` page.
    fn canonicalize(&self, url: &str, fetch: &FetchContext) -> Canonical {
        let Some((host, _)) = host_and_path(url) else {
            return Canonical::Unchanged;
        };
        if host.ends_with(".itch.io") {
            return Canonical::Unchanged;
        }
        let probe = self.probe(url, fetch);
        match probe.canonical_url {
            Some(canonical) if canonical != url => {
                Canonical::Alias(canonical)
            }
            _ if is_embed(url) => Canonical::Reject,
            _ => Canonical::Unchanged,
        }
    }

    fn scrape(
        &self,
        target: &SiteTarget,
        ctx: &ScrapeContext<'_>,
    ) -> Result<NormalizedDocument, ScrapeError> {
        let response = ctx.fetch.basic().download(&target.url)?;
        let text = response.text();
        let page = response.as_html();

        let canonical_url = canonical_of(&target.url, &page, &text);
        let objects = html::json_ld_objects(&page);
        let game = objects
            .iter()
            .find(|o| html::json_ld_types(o).iter().any(|t| t.contains("game")));
        let field = |key: &str| game.and_then(|g| g.get(key));
        let field_str = |key: &str| field(key).and_then(Value::as_str).map(str::to_string);

        let title = required(
            "title",
            field_str("name")
                .or_else(|| html::meta(&page, "og:title"))
                .or_else(|| html::meta(&page, "twitter:title"))
                .or_else(|| html::text(&page, "title")),
        )?;
        let description = field_str("description")
            .or_else(|| html::meta(&page, "og:description"))
            .or_else(|| html::meta(&page, "description"))
            .map(|d| d.trim().to_string())
            .filter(|d| !d.is_empty());
        let cover = json_ld_image(field("image"))
            .or_else(|| html::meta(&page, "og:image"))
            .or_else(|| html::meta(&page, "twitter:image"));

        let mut genre = json_ld_list(field("genre"));
        if let Some(keywords) = html::meta(&page, "keywords") {
            genre.extend(keywords.split(',').map(|k| k.trim().to_string()));
        }
        genre.extend(html::texts(&page, "a[class*=\"tag\"]"));
        let authors = html::json_ld_names(field("author").or_else(|| field("creator")));
        let platform = {
            let listed = json_ld_list(field("gamePlatform"));
            if listed.is_empty() {
                json_ld_list(field("operatingSystem"))
            } else {
                listed
            }
        };

        let lang = ctx.languages.first().map(String::as_str).unwrap_or("en");
        let mut header = DocumentHeader::new(&title);
        header.localized_title = vec![LocalizedText::new(lang, &title)];
        if let Some(description) = &description {
            header.localized_description = vec![LocalizedText::new(lang, description)];
        }
        header.cover_image_url = cover;

        let game_id = normalize_game_id(
            html::meta(&page, "itch:path")
                .or_else(|| game_id_from_json_ld(&objects))
                .or_else(|| game_id_from_text(&text)),
        );
        header.add_lookup_id(IdType::ItchGameId, game_id.as_deref());
        let canonical_id = canonical_url.as_deref().and_then(|c| self.url_to_id(c));
        header.add_lookup_id(IdType::Itch, canonical_id.as_deref());

        let details = GameDetails {
            developer: authors.clone(),
            publisher: authors,
            release_date: release_date(field("datePublished")),
            genre: html::uniq(genre),
            platform,
            official_site: canonical_url.or_else(|| Some(target.url.clone())),
        };
        Ok(NormalizedDocument::new(header, WorkDetails::Game(details)))
    }
}
