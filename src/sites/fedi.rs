//! Items published by other catalog instances over ActivityPub style JSON.

use super::id_type::{IdType, SiteName};
use super::site::{required, ScrapeContext, ScrapeError, Site, SiteTarget};
use crate::document::{
    DocumentHeader, ItemKind, LocalizedText, NormalizedDocument, ResourceLink, WorkDetails,
};
use crate::fetch::{Fetch, FetchContext};
use regex::Regex;
use serde_json::{Map, Value};
use tracing::{debug, warn};
use url::Url;

const NO_PATTERNS: &[Regex] = &[];

/// Maps an ActivityPub object type to the kind of entity it describes.
fn kind_for_type(object_type: &str) -> Option<ItemKind> {
    match object_type {
        "Book" | "Edition" => Some(ItemKind::Book),
        "Movie" => Some(ItemKind::Movie),
        "TVShow" => Some(ItemKind::TvShow),
        "TVSeason" => Some(ItemKind::TvSeason),
        "TVEpisode" => Some(ItemKind::TvEpisode),
        "Album" => Some(ItemKind::Album),
        "Game" => Some(ItemKind::Game),
        _ => None,
    }
}

fn localized(value: Option<&Value>) -> Vec<LocalizedText> {
    value
        .cloned()
        .and_then(|v| serde_json::from_value::<Vec<LocalizedText>>(v).ok())
        .unwrap_or_default()
        .into_iter()
        .filter(|t| !t.text.trim().is_empty())
        .collect()
}

/// Copies the known detail fields of `kind`; a field of the wrong shape
/// drops all details rather than failing the scrape.
fn details_from(kind: ItemKind, data: &Value) -> Result<WorkDetails, ScrapeError> {
    let mut object = Map::new();
    object.insert("category".into(), Value::from(kind.to_db_str()));
    let tagged_only = Value::Object(object.clone());
    for field in kind.copy_fields() {
        if let Some(value) = data.get(*field) {
            object.insert((*field).to_string(), value.clone());
        }
    }
    match serde_json::from_value(Value::Object(object)) {
        Ok(details) => Ok(details),
        Err(err) => {
            warn!("Ignoring malformed {} details: {}", kind, err);
            serde_json::from_value(tagged_only)
                .map_err(|e| ScrapeError::Unsupported(format!("{kind}: {e}")))
        }
    }
}

/// Another catalog instance. There are no static patterns: any URL that
/// answers content negotiation with a supported object type belongs here.
#[derive(Default)]
pub struct Fediverse {
    /// Hosts served by this instance; their URLs are never treated as remote.
    pub local_domains: Vec<String>,
}

impl Fediverse {
    pub fn new(local_domains: Vec<String>) -> Self {
        Self {
            local_domains: local_domains.into_iter().map(|d| d.to_lowercase()).collect(),
        }
    }

    fn fetch_object(&self, url: &str, fetch: &FetchContext) -> Result<Value, ScrapeError> {
        let fetcher = fetch.cached(fetch.basic().with_header("accept", "application/activity+json"));
        let data = fetcher.download(url)?.as_json_value()?;
        let object_type = data.get("type").and_then(Value::as_str).unwrap_or_default();
        if kind_for_type(object_type).is_none() {
            return Err(ScrapeError::Unsupported(format!(
                "type \"{object_type}\" at {url}"
            )));
        }
        let id = data.get("id").and_then(Value::as_str).unwrap_or_default();
        if id != url {
            warn!("ID mismatch: {} != {}", id, url);
        }
        Ok(data)
    }
}

impl Site for Fediverse {
    fn site_name(&self) -> SiteName {
        SiteName::Fediverse
    }

    fn id_type(&self) -> IdType {
        IdType::Fediverse
    }

    fn url_patterns(&self) -> &[Regex] {
        NO_PATTERNS
    }

    fn default_kind(&self) -> Option<ItemKind> {
        None
    }

    fn id_to_url(&self, id_value: &str) -> String {
        id_value.to_string()
    }

    fn url_to_id(&self, url: &str) -> Option<String> {
        let (_, rest) = url.split_once("://")?;
        let (host, path) = rest.split_once('/').unwrap_or((rest, ""));
        Some(format!("https://{}/{}", host.to_lowercase(), path))
    }

    fn validate_url_fallback(&self, url: &str, fetch: &FetchContext) -> bool {
        let Ok(parsed) = Url::parse(url) else {
            return false;
        };
        let Some(host) = parsed.host_str().map(str::to_lowercase) else {
            return false;
        };
        if self.local_domains.contains(&host) {
            return false;
        }
        match self.fetch_object(url, fetch) {
            Ok(_) => true,
            Err(err) => {
                debug!(url, "not a fediverse object: {}", err);
                false
            }
        }
    }

    fn scrape(
        &self,
        target: &SiteTarget,
        ctx: &ScrapeContext<'_>,
    ) -> Result<NormalizedDocument, ScrapeError> {
        let data = self.fetch_object(&target.url, ctx.fetch)?;
        let object_type = data.get("type").and_then(Value::as_str).unwrap_or_default();
        let kind = kind_for_type(object_type)
            .ok_or_else(|| ScrapeError::Unsupported(object_type.to_string()))?;
        let str_field = |key: &str| data.get(key).and_then(Value::as_str);

        let title = required(
            "title",
            str_field("title").or_else(|| str_field("display_title")),
        )?;
        let mut header = DocumentHeader::new(&title);
        header.localized_title = localized(data.get("localized_title"));
        header.localized_description = localized(data.get("localized_description"));
        if header.localized_description.is_empty() {
            if let Some(brief) = str_field("brief").filter(|b| !b.trim().is_empty()) {
                header.localized_description = vec![LocalizedText::new("en", brief)];
            }
        }
        header.cover_image_url = str_field("cover_image_url").map(str::to_string);

        let external = data
            .get("external_resources")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();
        for resource in external {
            let Some(url) = resource.get("url").and_then(Value::as_str) else {
                continue;
            };
            let Some(resolved) = ctx.registry.match_static(url) else {
                continue;
            };
            if resolved.target.id_type == IdType::Fediverse {
                continue;
            }
            header.add_lookup_id(resolved.target.id_type, Some(&resolved.target.id_value));
            header.prematched_resources.push(ResourceLink::new(
                resolved.target.id_type,
                resolved.target.id_value,
                resolved.target.url,
            ));
        }

        let details = details_from(kind, &data)?;
        Ok(NormalizedDocument::new(header, details))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FetchSettings;
    use crate::fetch::testing::ScriptedTransport;
    use serde_json::json;
    use std::sync::Arc;

    #[test]
    fn test_url_to_id_lowercases_host_only() {
        let site = Fediverse::default();
        assert_eq!(
            site.url_to_id("http://NeoDB.Example/book/AbC").as_deref(),
            Some("https://neodb.example/book/AbC")
        );
        assert_eq!(site.id_to_url("https://neodb.example/book/AbC"), "https://neodb.example/book/AbC");
    }

    #[test]
    fn test_supported_types() {
        assert_eq!(kind_for_type("Edition"), Some(ItemKind::Book));
        assert_eq!(kind_for_type("TVSeason"), Some(ItemKind::TvSeason));
        assert_eq!(kind_for_type("Note"), None);
    }

    #[test]
    fn test_details_tolerate_bad_shapes() {
        let data = json!({"author": ["Frank Herbert"], "pub_year": 1965});
        match details_from(ItemKind::Book, &data).unwrap() {
            WorkDetails::Book(book) => {
                assert_eq!(book.author, vec!["Frank Herbert".to_string()]);
                assert_eq!(book.pub_year, Some(1965));
            }
            other => panic!("unexpected details {:?}", other),
        }
        let data = json!({"pub_year": "nineteen"});
        match details_from(ItemKind::Book, &data).unwrap() {
            WorkDetails::Book(book) => assert_eq!(book.pub_year, None),
            other => panic!("unexpected details {:?}", other),
        }
    }

    #[test]
    fn test_object_with_mismatched_id_is_still_returned() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.route(
            "https://neodb.example/book/1",
            "application/activity+json",
            r#"{"id": "https://neodb.example/book/1/", "type": "Edition", "name": "Dune"}"#,
        );
        let fetch = FetchContext::new(transport, FetchSettings::default());

        let data = Fediverse::default()
            .fetch_object("https://neodb.example/book/1", &fetch)
            .unwrap();

        assert_eq!(data["name"], "Dune");
    }

    #[test]
    fn test_unsupported_object_type_is_rejected() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.route(
            "https://neodb.example/note/1",
            "application/activity+json",
            r#"{"id": "https://neodb.example/note/1", "type": "Note"}"#,
        );
        let fetch = FetchContext::new(transport, FetchSettings::default());

        let result = Fediverse::default().fetch_object("https://neodb.example/note/1", &fetch);

        assert!(matches!(result, Err(ScrapeError::Unsupported(_))));
    }

    #[test]
    fn test_local_domains_are_never_remote() {
        let site = Fediverse::new(vec!["Catalog.Local".into()]);
        assert_eq!(site.local_domains, vec!["catalog.local".to_string()]);
    }
}
