//! Text enrichment
//!
//! - [`segment`]: tile planning for images over the OCR size ceilings
//! - [`cleaner`]: deterministic local text cleanup
//! - [`EnrichmentService`]: OCR fan-out, cleanup and best-effort rewrite

pub mod cleaner;
pub mod segment;
mod service;

pub use cleaner::clean_text;
pub use segment::{plan, reassemble, ImageLimits, Segment};
pub use service::{EmbeddedImage, EnrichedText, EnrichmentService};
