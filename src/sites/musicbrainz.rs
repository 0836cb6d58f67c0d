//! MusicBrainz releases, with covers from the Cover Art Archive.

use super::id_type::{IdType, SiteName};
use super::site::{required, ScrapeContext, ScrapeError, Site, SiteTarget};
use crate::document::{AlbumDetails, DocumentHeader, ItemKind, LocalizedText, NormalizedDocument, WorkDetails};
use crate::fetch::Fetch;
use lazy_static::lazy_static;
use regex::Regex;
use serde::Deserialize;
use tracing::debug;

lazy_static! {
    static ref PATTERNS: Vec<Regex> =
        vec![Regex::new(r"^https://musicbrainz\.org/release/([\w\-]+)").unwrap()];
}

/// Pads a UPC-A (12 digits) to GTIN-13. Other lengths pass through.
pub fn upc_to_gtin_13(barcode: &str) -> String {
    let digits: String = barcode.chars().filter(char::is_ascii_digit).collect();
    if digits.len() == 12 {
        format!("0{digits}")
    } else {
        digits
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Release {
    title: Option<String>,
    #[serde(rename = "artist-credit")]
    artist_credit: Vec<ArtistCredit>,
    barcode: Option<String>,
    date: Option<String>,
    media: Vec<Medium>,
    #[serde(rename = "cover-art-archive")]
    cover_art_archive: CoverArtStatus,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ArtistCredit {
    name: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Medium {
    format: Option<String>,
    position: u32,
    tracks: Vec<Track>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Track {
    title: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct CoverArtStatus {
    front: bool,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct CoverArtListing {
    images: Vec<CoverArtImage>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct CoverArtImage {
    front: bool,
    image: Option<String>,
    thumbnails: std::collections::HashMap<String, String>,
}

impl Release {
    fn media_summary(&self) -> Option<String> {
        let mut formats: Vec<String> = Vec::new();
        for format in self.media.iter().filter_map(|m| m.format.clone()) {
            if !formats.contains(&format) {
                formats.push(format);
            }
        }
        (!formats.is_empty()).then(|| formats.join("+"))
    }

    /// Physical disc count and the flattened track list. With several media
    /// each one is introduced by a `<format> <position>` line.
    fn tracks(&self) -> (u32, Vec<String>) {
        let labelled = self.media.len() > 1;
        let mut discs = 0;
        let mut list = Vec::new();
        for medium in &self.media {
            let format = medium.format.as_deref().unwrap_or("");
            if format != "Digital Media" {
                discs += 1;
            }
            if labelled {
                list.push(format!("{format} {}", medium.position).trim().to_string());
            }
            list.extend(medium.tracks.iter().map(|t| t.title.clone()));
        }
        (discs, list)
    }
}

pub struct MusicBrainz;

impl MusicBrainz {
    fn cover_url(&self, target: &SiteTarget, ctx: &ScrapeContext<'_>) -> Option<String> {
        let url = format!("https://coverartarchive.org/release/{}", target.id_value);
        let listing: CoverArtListing = match ctx.fetch.basic().download(&url) {
            Ok(response) => response.as_json().ok()?,
            Err(err) => {
                debug!(url = %target.url, "No cover art listing: {}", err);
                return None;
            }
        };
        let front = listing.images.into_iter().find(|i| i.front)?;
        front.thumbnails.get("small").cloned().or(front.image)
    }
}

impl Site for MusicBrainz {
    fn site_name(&self) -> SiteName {
        SiteName::MusicBrainz
    }

    fn id_type(&self) -> IdType {
        IdType::MusicBrainz
    }

    fn url_patterns(&self) -> &[Regex] {
        &PATTERNS
    }

    fn default_kind(&self) -> Option<ItemKind> {
        Some(ItemKind::Album)
    }

    fn id_to_url(&self, id_value: &str) -> String {
        format!("https://musicbrainz.org/release/{id_value}")
    }

    fn scrape(
        &self,
        target: &SiteTarget,
        ctx: &ScrapeContext<'_>,
    ) -> Result<NormalizedDocument, ScrapeError> {
        let url = format!(
            "https://musicbrainz.org/ws/2/release/{}?inc=recordings+artists&fmt=json",
            target.id_value
        );
        let release: Release = ctx.fetch.retrying().download(&url)?.as_json()?;

        let title = required("title", release.title.as_deref())?;
        let barcode = release
            .barcode
            .as_deref()
            .map(upc_to_gtin_13)
            .filter(|b| !b.is_empty());
        let (disc_count, track_list) = release.tracks();

        let mut header = DocumentHeader::new(&title);
        header.localized_title = vec![LocalizedText::new("en", &title)];
        if release.cover_art_archive.front {
            header.cover_image_url = self.cover_url(target, ctx);
        }
        header.add_lookup_id(IdType::Gtin, barcode.as_deref());

        let details = AlbumDetails {
            artist: release.artist_credit.iter().map(|a| a.name.clone()).collect(),
            release_date: release.date.clone().filter(|d| !d.is_empty()),
            media: release.media_summary(),
            disc_count: Some(disc_count).filter(|d| *d > 0),
            track_list,
            barcode,
            ..Default::default()
        };
        Ok(NormalizedDocument::new(header, WorkDetails::Album(details)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_upc_is_padded() {
        assert_eq!(upc_to_gtin_13("886443927087"), "0886443927087");
        assert_eq!(upc_to_gtin_13("0886443927087"), "0886443927087");
    }

    #[test]
    fn test_multi_disc_track_list() {
        let release: Release = serde_json::from_value(serde_json::json!({
            "title": "Box",
            "media": [
                {"format": "CD", "position": 1, "tracks": [{"title": "A"}]},
                {"format": "Digital Media", "position": 2, "tracks": [{"title": "B"}]}
            ]
        }))
        .unwrap();
        let (discs, tracks) = release.tracks();
        assert_eq!(discs, 1);
        assert_eq!(tracks, vec!["CD 1", "A", "Digital Media 2", "B"]);
        assert_eq!(release.media_summary().as_deref(), Some("CD+Digital Media"));
    }
}
