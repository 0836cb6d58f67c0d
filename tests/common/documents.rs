//! Document builders for stub pages.

use catalog_harvest::document::{
    DocumentHeader, MovieDetails, NormalizedDocument, ResourceLink, TvSeasonDetails,
    TvShowDetails, WorkDetails,
};
use catalog_harvest::sites::IdType;
use std::io::Cursor;

pub fn movie_doc(title: &str, lookups: &[(IdType, &str)]) -> NormalizedDocument {
    let mut header = DocumentHeader::new(title);
    for (id_type, value) in lookups {
        header.add_lookup_id(*id_type, Some(value));
    }
    NormalizedDocument::new(header, WorkDetails::Movie(MovieDetails::default()))
}

/// A show whose seasons are listed as related resources.
pub fn show_doc(title: &str, seasons: Vec<ResourceLink>) -> NormalizedDocument {
    let mut header = DocumentHeader::new(title);
    header.related_resources = seasons;
    NormalizedDocument::new(
        header,
        WorkDetails::TvShow(TvShowDetails {
            year: Some(2008),
            ..Default::default()
        }),
    )
}

/// A season that cannot be stored before its show.
pub fn season_doc(title: &str, number: u32, show: Option<ResourceLink>) -> NormalizedDocument {
    let mut header = DocumentHeader::new(title);
    header.required_resources = show.into_iter().collect();
    NormalizedDocument::new(
        header,
        WorkDetails::TvSeason(TvSeasonDetails {
            season_number: Some(number),
            ..Default::default()
        }),
    )
}

/// A valid 2x2 PNG.
pub fn tiny_png() -> Vec<u8> {
    let mut bytes = Vec::new();
    image::RgbImage::new(2, 2)
        .write_to(&mut Cursor::new(&mut bytes), image::ImageFormat::Png)
        .unwrap();
    bytes
}
