//! Document enrichment service
//!
//! Combines page text with OCR output of embedded images, cleans the result
//! and attempts a best-effort readability rewrite.

use super::cleaner::clean_text;
use super::segment::{effective_tile_height, plan, reassemble, ImageLimits, Segment};
use crate::config::EnrichmentConfig;
use crate::retry::RetryGateway;
use crate::services::{DocumentUnderstanding, ImagePayload, ServiceError, TextQuality};
use crate::storage::EnrichmentSource;
use crate::HarvestError;
use futures::stream::{self, StreamExt};
use image::codecs::jpeg::JpegEncoder;
use image::{DynamicImage, GenericImageView, ImageFormat, ImageOutputFormat};
use std::io::Cursor;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Quality used when a JPEG source is re-encoded tile by tile
const TILE_JPEG_QUALITY: u8 = 85;

/// An image referenced by a detail page, already downloaded
#[derive(Debug, Clone)]
pub struct EmbeddedImage {
    pub url: String,
    pub bytes: Vec<u8>,
}

/// Output of [`EnrichmentService::enrich`]
#[derive(Debug, Clone, PartialEq)]
pub struct EnrichedText {
    pub text: String,
    pub source: EnrichmentSource,
    pub rewritten: bool,
}

#[derive(Debug, thiserror::Error)]
enum SplitError {
    #[error(transparent)]
    Image(#[from] image::ImageError),

    #[error("tiles exceed {max_bytes} bytes even at {tile_height}px tall")]
    TooLarge { max_bytes: usize, tile_height: u32 },
}

/// Tiling parameters for one service instance
#[derive(Debug, Clone, Copy)]
struct TilePlan {
    limits: ImageLimits,
    tile_width: u32,
    tile_height: u32,
    overlap: u32,
}

/// Turns raw page text and images into normalized body text
pub struct EnrichmentService {
    ocr: Arc<dyn DocumentUnderstanding>,
    rewriter: Option<Arc<dyn TextQuality>>,
    gateway: RetryGateway,
    tiles: TilePlan,
    concurrency: usize,
}

impl EnrichmentService {
    /// Creates a service; `rewriter` is skipped when None
    pub fn new(
        ocr: Arc<dyn DocumentUnderstanding>,
        rewriter: Option<Arc<dyn TextQuality>>,
        config: &EnrichmentConfig,
        gateway: RetryGateway,
    ) -> Self {
        Self {
            ocr,
            rewriter,
            gateway,
            tiles: TilePlan {
                limits: ImageLimits {
                    max_bytes: config.max_image_bytes,
                    max_width: config.max_image_width,
                    max_height: config.max_image_height,
                },
                tile_width: config.tile_width,
                tile_height: config.tile_height,
                overlap: config.tile_overlap,
            },
            concurrency: config.ocr_concurrency.max(1),
        }
    }

    /// Enriches one item's text
    ///
    /// Images that cannot be decoded are skipped. An OCR call that still
    /// fails after the gateway's retries fails the whole enrichment; a
    /// failed rewrite falls back to the cleaned text.
    pub async fn enrich(
        &self,
        raw_text: &str,
        images: &[EmbeddedImage],
    ) -> Result<EnrichedText, HarvestError> {
        let mut sections = vec![raw_text.to_string()];
        let mut source = EnrichmentSource::TextOnly;

        for image in images {
            let payloads = match self.prepare(image).await? {
                Some(payloads) => payloads,
                None => continue,
            };

            let text = self.ocr_tiles(&image.url, payloads).await?;
            if !text.trim().is_empty() {
                source = EnrichmentSource::OcrAugmented;
                sections.push(text);
            }
        }

        let cleaned = clean_text(&sections.join("\n\n"));
        let (text, rewritten) = self.rewrite(cleaned).await;

        Ok(EnrichedText {
            text,
            source,
            rewritten,
        })
    }

    /// Decodes an image and cuts it into payloads within the size ceilings
    async fn prepare(&self, image: &EmbeddedImage) -> Result<Option<Vec<(Segment, ImagePayload)>>, HarvestError> {
        let bytes = image.bytes.clone();
        let tiles = self.tiles;

        let prepared = tokio::task::spawn_blocking(move || split_image(&bytes, &tiles)).await?;

        match prepared {
            Ok(payloads) => Ok(Some(payloads)),
            Err(e) => {
                warn!(url = %image.url, error = %e, "Skipping image");
                Ok(None)
            }
        }
    }

    /// OCRs tiles with bounded concurrency and joins their text in order
    ///
    /// Every started call runs to completion before errors are reported.
    async fn ocr_tiles(
        &self,
        url: &str,
        payloads: Vec<(Segment, ImagePayload)>,
    ) -> Result<String, HarvestError> {
        let tile_count = payloads.len();
        if tile_count > 1 {
            info!(url, tiles = tile_count, concurrency = self.concurrency, "OCR fan-out");
        }

        let results: Vec<(usize, Result<String, HarvestError>)> = stream::iter(payloads)
            .map(|(segment, payload)| async move {
                let operation = format!("ocr tile {}/{}", segment.index + 1, tile_count);
                let result = self
                    .gateway
                    .call(
                        &operation,
                        || self.ocr.ocr(&payload),
                        ServiceError::is_retryable,
                    )
                    .await
                    .map_err(|e| e.into_harvest_error("ocr"));
                (segment.index, result)
            })
            .buffered(self.concurrency)
            .collect()
            .await;

        let mut parts = Vec::with_capacity(results.len());
        for (index, result) in results {
            parts.push((index, result?));
        }

        debug!(url, tiles = tile_count, "OCR complete");
        Ok(reassemble(parts))
    }

    async fn rewrite(&self, cleaned: String) -> (String, bool) {
        let rewriter = match &self.rewriter {
            Some(rewriter) if !cleaned.is_empty() => rewriter,
            _ => return (cleaned, false),
        };

        let result = self
            .gateway
            .call(
                "rewrite",
                || rewriter.rewrite(&cleaned),
                ServiceError::is_retryable,
            )
            .await;

        match result {
            Ok(text) if !text.trim().is_empty() => (text.trim().to_string(), true),
            Ok(_) => {
                warn!("Rewrite returned empty text, keeping cleaned text");
                (cleaned, false)
            }
            Err(e) => {
                warn!(error = %e, "Rewrite failed, keeping cleaned text");
                (cleaned, false)
            }
        }
    }
}

fn mime_type(format: Option<ImageFormat>) -> &'static str {
    match format {
        Some(ImageFormat::Png) => "image/png",
        Some(ImageFormat::Jpeg) => "image/jpeg",
        Some(ImageFormat::Gif) => "image/gif",
        Some(ImageFormat::WebP) => "image/webp",
        _ => "application/octet-stream",
    }
}

/// Returns the image as-is when within limits, else tiles that each fit
/// under the byte ceiling
///
/// Tiles are re-encoded in the source format (JPEG stays JPEG, anything
/// else becomes PNG). When an encoded tile is still over `max_bytes` the
/// image is re-planned with proportionally shorter tiles.
fn split_image(bytes: &[u8], tiles: &TilePlan) -> Result<Vec<(Segment, ImagePayload)>, SplitError> {
    let format = image::guess_format(bytes).ok();
    let decoded = image::load_from_memory(bytes)?;
    let (width, height) = decoded.dimensions();

    if !tiles.limits.exceeded_by(width, height, bytes.len()) {
        let whole = Segment {
            index: 0,
            left: 0,
            top: 0,
            width,
            height,
        };
        let payload = ImagePayload {
            mime_type: mime_type(format).to_string(),
            bytes: bytes.to_vec(),
        };
        return Ok(vec![(whole, payload)]);
    }

    let max_bytes = tiles.limits.max_bytes;
    let mut tile_height = effective_tile_height(height, bytes.len(), max_bytes, tiles.tile_height);

    loop {
        let segments = plan(width, height, tiles.tile_width, tile_height, tiles.overlap);
        let mut payloads = Vec::with_capacity(segments.len());
        for segment in segments {
            let tile = decoded.crop_imm(segment.left, segment.top, segment.width, segment.height);
            payloads.push((segment, encode_tile(&tile, format)?));
        }

        let largest = payloads.iter().map(|(_, p)| p.bytes.len()).max().unwrap_or(0);
        if largest <= max_bytes {
            return Ok(payloads);
        }
        if tile_height <= 1 {
            return Err(SplitError::TooLarge {
                max_bytes,
                tile_height,
            });
        }

        let scaled = (tile_height as u64 * max_bytes as u64 / largest as u64) as u32;
        let next = scaled.max(1).min(tile_height - 1);
        debug!(largest, max_bytes, from = tile_height, to = next, "Re-planning oversized tiles");
        tile_height = next;
    }
}

fn encode_tile(tile: &DynamicImage, format: Option<ImageFormat>) -> Result<ImagePayload, image::ImageError> {
    let mut buffer = Vec::new();

    if format == Some(ImageFormat::Jpeg) {
        let mut encoder = JpegEncoder::new_with_quality(&mut buffer, TILE_JPEG_QUALITY);
        encoder.encode_image(&tile.to_rgb8())?;
        return Ok(ImagePayload {
            mime_type: mime_type(format).to_string(),
            bytes: buffer,
        });
    }

    tile.write_to(&mut Cursor::new(&mut buffer), ImageOutputFormat::Png)?;
    Ok(ImagePayload::png(buffer))
}
