//! Image-validating decorator and the cover download helper built on it.

use super::basic::{Fetch, Fetched};
use super::models::{FetchLog, ResponseOutcome};
use super::response::FetchedResponse;
use crate::document::CoverImage;
use tracing::debug;

/// File extension for an image MIME type, `None` for anything that is not a
/// known image format.
pub fn extension_for_mime(mime: &str) -> Option<&'static str> {
    let essence = mime.split(';').next().unwrap_or("").trim().to_ascii_lowercase();
    match essence.as_str() {
        "image/jpeg" | "image/jpg" | "image/pjpeg" => Some("jpg"),
        "image/png" => Some("png"),
        "image/gif" => Some("gif"),
        "image/webp" => Some("webp"),
        "image/avif" => Some("avif"),
        "image/bmp" => Some("bmp"),
        "image/tiff" => Some("tiff"),
        _ => None,
    }
}

/// Extension derived from the negotiated content type, falling back to
/// sniffing the payload when the server sent no usable type.
pub fn image_extension(response: &FetchedResponse) -> Option<String> {
    if let Some(ext) = response.content_type().and_then(extension_for_mime) {
        return Some(ext.to_string());
    }
    infer::get(response.bytes())
        .filter(|kind| kind.matcher_type() == infer::MatcherType::Image)
        .and_then(|kind| extension_for_mime(kind.mime_type()))
        .map(str::to_string)
}

pub struct ImageValidator<F> {
    inner: F,
}

impl<F: Fetch> ImageValidator<F> {
    pub fn new(inner: F) -> Self {
        Self { inner }
    }
}

fn classify(response: &FetchedResponse) -> (ResponseOutcome, Option<String>) {
    let status = response.status();
    if (400..500).contains(&status) {
        return (ResponseOutcome::InvalidContent, Some(format!("HTTP {status}")));
    }
    if status != 200 {
        return (ResponseOutcome::NetworkError, Some(format!("HTTP {status}")));
    }
    if image_extension(response).is_none() {
        return (
            ResponseOutcome::NetworkError,
            Some(format!("not an image type: {:?}", response.content_type())),
        );
    }
    match image::load_from_memory(response.bytes()) {
        Ok(_) => (ResponseOutcome::Ok, None),
        Err(err) => (ResponseOutcome::NetworkError, Some(format!("corrupt image: {err}"))),
    }
}

impl<F: Fetch> Fetch for ImageValidator<F> {
    fn fetch(&self, url: &str, log: &mut FetchLog) -> Fetched {
        let mut fetched = self.inner.fetch(url, log);
        let Some(response) = &fetched.response else {
            return fetched;
        };
        let (outcome, error) = classify(response);
        if outcome != fetched.outcome || error.is_some() {
            log.reclassify_last(outcome, error);
        }
        fetched.outcome = outcome;
        fetched
    }
}

/// Downloads a cover image. Any failure yields `None`; a missing cover never
/// fails a scrape.
pub fn download_image(fetcher: &dyn Fetch, url: &str) -> Option<CoverImage> {
    match fetcher.download(url) {
        Ok(response) => {
            let extension = image_extension(&response)?;
            Some(CoverImage {
                bytes: response.into_bytes(),
                extension,
            })
        }
        Err(err) => {
            debug!(url, outcome = err.outcome.as_str(), "Cover download failed");
            None
        }
    }
}
