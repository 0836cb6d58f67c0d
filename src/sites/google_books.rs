//! Google Books volumes API.

use super::id_type::{IdType, SiteName};
use super::site::{required, ScrapeContext, ScrapeError, Site, SiteTarget};
use crate::document::{BookDetails, DocumentHeader, ItemKind, LocalizedText, NormalizedDocument, WorkDetails};
use crate::fetch::Fetch;
use crate::search::{SearchCategory, SearchClient, SearchQuery, SearchResultItem};
use async_trait::async_trait;
use lazy_static::lazy_static;
use regex::Regex;
use serde::Deserialize;

const API_BASE: &str = "https://www.googleapis.com/books/v1/volumes";

lazy_static! {
    static ref PATTERNS: Vec<Regex> = vec![
        Regex::new(r"^https://books\.google\.co[^/]+/books\?id=([^&#]+)").unwrap(),
        Regex::new(r"^https://www\.google\.co[^/]+/books/edition/[^/]+/([^&#?]+)").unwrap(),
        Regex::new(r"^https://books\.google\.co[^/]+/books/about/[^?]+\?id=([^&#?]+)").unwrap(),
    ];
    static ref TAG: Regex = Regex::new(r"<.*?>").unwrap();
}

/// Converts an ISBN-10 to its ISBN-13 form. Returns `None` for anything that
/// is not ten characters long.
pub fn isbn_10_to_13(isbn: &str) -> Option<String> {
    let isbn = isbn.trim().replace('-', "");
    if isbn.len() != 10 || !isbn.is_ascii() {
        return None;
    }
    let body = format!("978{}", &isbn[..9]);
    let mut sum = 0;
    for (i, c) in body.chars().enumerate() {
        let digit = c.to_digit(10)?;
        sum += if i % 2 == 0 { digit } else { digit * 3 };
    }
    let check = (10 - sum % 10) % 10;
    Some(format!("{body}{check}"))
}

fn strip_tags(text: &str) -> String {
    TAG.replace_all(&text.replace("<br", "\n<br"), "")
        .trim()
        .to_string()
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct VolumeInfo {
    title: Option<String>,
    subtitle: Option<String>,
    authors: Vec<String>,
    publisher: Option<String>,
    published_date: Option<String>,
    description: Option<String>,
    page_count: Option<u32>,
    language: Option<String>,
    industry_identifiers: Vec<IndustryIdentifier>,
    image_links: Option<ImageLinks>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct ImageLinks {
    extra_large: Option<String>,
    large: Option<String>,
    thumbnail: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct IndustryIdentifier {
    #[serde(rename = "type")]
    kind: String,
    identifier: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct Volume {
    id: String,
    volume_info: VolumeInfo,
    search_info: Option<SearchInfo>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct SearchInfo {
    text_snippet: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct VolumeList {
    items: Vec<Volume>,
}

impl VolumeInfo {
    fn isbn13(&self) -> Option<String> {
        let find = |kind: &str| {
            self.industry_identifiers
                .iter()
                .find(|i| i.kind == kind)
                .map(|i| i.identifier.clone())
        };
        find("ISBN_13").or_else(|| find("ISBN_10").and_then(|i| isbn_10_to_13(&i)))
    }

    fn cover(&self) -> Option<String> {
        let links = self.image_links.as_ref()?;
        links
            .extra_large
            .clone()
            .or_else(|| links.large.clone())
            .or_else(|| links.thumbnail.clone())
    }
}

pub struct GoogleBooks;

#[async_trait]
impl Site for GoogleBooks {
    fn site_name(&self) -> SiteName {
        SiteName::GoogleBooks
    }

    fn id_type(&self) -> IdType {
        IdType::GoogleBooks
    }

    fn url_patterns(&self) -> &[Regex] {
        &PATTERNS
    }

    fn default_kind(&self) -> Option<ItemKind> {
        Some(ItemKind::Book)
    }

    fn id_to_url(&self, id_value: &str) -> String {
        format!("https://books.google.com/books?id={id_value}")
    }

    fn scrape(
        &self,
        target: &SiteTarget,
        ctx: &ScrapeContext<'_>,
    ) -> Result<NormalizedDocument, ScrapeError> {
        let mut api_url = format!("{API_BASE}/{}", target.id_value);
        if let Some(key) = ctx.api_keys.google_books.as_deref().filter(|k| !k.is_empty()) {
            api_url.push_str(&format!("?key={key}"));
        }
        let volume: Volume = ctx.fetch.retrying().download(&api_url)?.as_json()?;
        let info = &volume.volume_info;

        let title = required("title", info.title.as_deref())?;
        let language = info
            .language
            .as_deref()
            .map(str::to_lowercase)
            .unwrap_or_else(|| "en".to_string());
        let brief = info
            .description
            .clone()
            .or_else(|| volume.search_info.as_ref().and_then(|s| s.text_snippet.clone()))
            .map(|b| strip_tags(&b))
            .unwrap_or_default();
        let isbn = info.isbn13();

        let mut header = DocumentHeader::new(&title);
        header.localized_title = vec![LocalizedText::new(&language, &title)];
        if !brief.is_empty() {
            header.localized_description = vec![LocalizedText::new(&language, brief)];
        }
        header.cover_image_url = info.cover();
        header.add_lookup_id(IdType::Isbn, isbn.as_deref());

        let mut date = info.published_date.as_deref().unwrap_or("").split('-');
        let details = BookDetails {
            subtitle: info.subtitle.clone(),
            author: info.authors.clone(),
            language: info.language.iter().map(|l| l.to_lowercase()).collect(),
            pub_house: info.publisher.clone(),
            pub_year: date.next().and_then(|y| y.parse().ok()),
            pub_month: date.next().and_then(|m| m.parse().ok()),
            pages: info.page_count,
            isbn,
            ..Default::default()
        };
        Ok(NormalizedDocument::new(header, WorkDetails::Book(details)))
    }

    async fn search(
        &self,
        query: &SearchQuery,
        client: &SearchClient,
    ) -> anyhow::Result<Vec<SearchResultItem>> {
        if !query.category.includes_any(&[SearchCategory::Book]) {
            return Ok(Vec::new());
        }
        let url = format!(
            "{API_BASE}?country=us&q={}&startIndex={}&maxResults={}&maxAllowedMaturityRating=MATURE",
            urlencoding::encode(&query.text),
            query.page_size * (query.page as usize - 1),
            query.page_size,
        );
        let list: VolumeList = client.get_json(&url).await?;
        Ok(list
            .items
            .into_iter()
            .filter_map(|volume| {
                let info = volume.volume_info;
                let title = info.title.clone()?;
                let subtitle = [
                    info.published_date.clone().unwrap_or_default(),
                    info.authors.join(", "),
                ]
                .join(" ")
                .trim()
                .to_string();
                let brief = info
                    .description
                    .clone()
                    .or_else(|| volume.search_info.and_then(|s| s.text_snippet))
                    .unwrap_or_default();
                Some(SearchResultItem {
                    category: Some(ItemKind::Book),
                    source_site: SiteName::GoogleBooks.as_str().to_string(),
                    url: format!("https://books.google.com/books?id={}", volume.id),
                    title,
                    subtitle,
                    brief,
                    cover_url: info.image_links.and_then(|l| l.thumbnail),
                })
            })
            .collect())
    }
}
