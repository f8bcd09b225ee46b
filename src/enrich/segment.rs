//! Segment planner
//!
//! Pure geometry for splitting an image that is too large for the document
//! understanding service into tiles.
//!
//! With `h_splits = ceil(width / max_w)`, `v_splits = ceil(height / max_h)`,
//! `base_w = ceil(width / h_splits)` and `base_h = ceil(height / v_splits)`:
//!
//! - column `c` starts at `c * base_w`; the last column takes the remainder
//! - row 0 starts at 0 with height `base_h`
//! - row `r > 0` starts at `r * base_h - overlap`; interior rows are
//!   `base_h + overlap` tall and the last row takes the remainder
//!
//! The tiles cover the image exactly and every pair of vertically adjacent
//! rows shares a band of `overlap` pixels, so a text line cut by one seam is
//! whole in at least one tile. Lines inside that band are OCR'd twice and
//! show up twice in the reassembled text; they are left as is, since
//! repeated lines can be genuine content.

/// One tile over a source image
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Segment {
    /// Row-major position, used to order tile output on reassembly
    pub index: usize,
    pub left: u32,
    pub top: u32,
    pub width: u32,
    pub height: u32,
}

impl Segment {
    pub fn right(&self) -> u32 {
        self.left + self.width
    }

    pub fn bottom(&self) -> u32 {
        self.top + self.height
    }
}

/// Size ceilings enforced by the document understanding service
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageLimits {
    pub max_bytes: usize,
    pub max_width: u32,
    pub max_height: u32,
}

impl ImageLimits {
    /// Returns true if an image of this size must be tiled
    pub fn exceeded_by(&self, width: u32, height: u32, byte_len: usize) -> bool {
        byte_len > self.max_bytes || width > self.max_width || height > self.max_height
    }
}

fn div_ceil(a: u32, b: u32) -> u32 {
    (a + b - 1) / b
}

/// Plans row-major tiles covering a `width` x `height` image
///
/// Returns an empty list for an empty image. Zero tile limits are treated
/// as 1.
pub fn plan(width: u32, height: u32, max_tile_w: u32, max_tile_h: u32, overlap: u32) -> Vec<Segment> {
    if width == 0 || height == 0 {
        return Vec::new();
    }

    let max_tile_w = max_tile_w.max(1);
    let max_tile_h = max_tile_h.max(1);

    let h_splits = div_ceil(width, max_tile_w);
    let v_splits = div_ceil(height, max_tile_h);
    let base_w = div_ceil(width, h_splits);
    let base_h = div_ceil(height, v_splits);
    let overlap = overlap.min(base_h);

    let mut segments = Vec::with_capacity((h_splits * v_splits) as usize);

    for row in 0..v_splits {
        let top = if row == 0 { 0 } else { row * base_h - overlap };
        if top >= height {
            continue;
        }

        let tile_height = if row == v_splits - 1 {
            height - top
        } else if row == 0 {
            base_h
        } else {
            (base_h + overlap).min(height - top)
        };

        for col in 0..h_splits {
            let left = col * base_w;
            if left >= width {
                continue;
            }

            let tile_width = if col == h_splits - 1 {
                width - left
            } else {
                base_w
            };

            segments.push(Segment {
                index: segments.len(),
                left,
                top,
                width: tile_width,
                height: tile_height,
            });
        }
    }

    segments
}

/// Tile height that keeps each horizontal band under the byte ceiling
///
/// An image over `max_bytes` is cut into at least `ceil(byte_len / max_bytes)`
/// bands even when its dimensions are within limits.
pub fn effective_tile_height(height: u32, byte_len: usize, max_bytes: usize, tile_height: u32) -> u32 {
    if max_bytes == 0 || byte_len <= max_bytes {
        return tile_height;
    }

    let bands = ((byte_len + max_bytes - 1) / max_bytes).min(u32::MAX as usize) as u32;
    div_ceil(height.max(1), bands).min(tile_height).max(1)
}

/// Joins tile outputs in segment order with a blank line between tiles
///
/// Blank tile output is skipped.
pub fn reassemble(mut parts: Vec<(usize, String)>) -> String {
    parts.sort_by_key(|(index, _)| *index);
    parts
        .into_iter()
        .map(|(_, text)| text.trim().to_string())
        .filter(|text| !text.is_empty())
        .collect::<Vec<_>>()
        .join("\n\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_covers(segments: &[Segment], width: u32, height: u32) {
        let mut covered = vec![false; (width * height) as usize];
        for s in segments {
            assert!(s.width > 0 && s.height > 0);
            assert!(s.right() <= width && s.bottom() <= height);
            for y in s.top..s.bottom() {
                for x in s.left..s.right() {
                    covered[(y * width + x) as usize] = true;
                }
            }
        }
        assert!(covered.iter().all(|c| *c), "{}x{} not covered", width, height);
    }

    fn row_spans(segments: &[Segment]) -> Vec<(u32, u32)> {
        let mut rows: Vec<(u32, u32)> = segments.iter().map(|s| (s.top, s.bottom())).collect();
        rows.sort();
        rows.dedup();
        rows
    }

    #[test]
    fn test_small_image_is_one_tile() {
        let segments = plan(800, 600, 2000, 2000, 50);
        assert_eq!(
            segments,
            vec![Segment {
                index: 0,
                left: 0,
                top: 0,
                width: 800,
                height: 600
            }]
        );
    }

    #[test]
    fn test_tall_image_rows_overlap() {
        // Three rows of base height 1000
        let segments = plan(1000, 3000, 2000, 1000, 50);
        let spans: Vec<(u32, u32)> = segments.iter().map(|s| (s.top, s.height)).collect();
        assert_eq!(spans, vec![(0, 1000), (950, 1050), (1950, 1050)]);
    }

    #[test]
    fn test_wide_image_last_column_takes_remainder() {
        let segments = plan(2500, 100, 1000, 1000, 10);
        let columns: Vec<(u32, u32)> = segments.iter().map(|s| (s.left, s.width)).collect();
        assert_eq!(columns, vec![(0, 834), (834, 834), (1668, 832)]);
        assert!(segments.iter().all(|s| s.top == 0 && s.height == 100));
    }

    #[test]
    fn test_indices_are_row_major() {
        let segments = plan(300, 300, 100, 100, 5);
        assert_eq!(segments.len(), 9);
        for (i, s) in segments.iter().enumerate() {
            assert_eq!(s.index, i);
        }
        assert!(segments.windows(2).all(|w| (w[0].top, w[0].left) < (w[1].top, w[1].left)));
    }

    #[test]
    fn test_empty_image_has_no_tiles() {
        assert!(plan(0, 100, 10, 10, 1).is_empty());
        assert!(plan(100, 0, 10, 10, 1).is_empty());
    }

    #[test]
    fn test_coverage_and_overlap_sweep() {
        for width in 1..=16 {
            for height in 1..=16 {
                for max_w in 1..=7 {
                    for max_h in 1..=7 {
                        for overlap in 0..=4 {
                            let segments = plan(width, height, max_w, max_h, overlap);
                            assert_covers(&segments, width, height);

                            let base_h = div_ceil(height, div_ceil(height, max_h));
                            let expected = overlap.min(base_h);
                            let rows = row_spans(&segments);
                            for pair in rows.windows(2) {
                                assert_eq!(
                                    pair[0].1 - pair[1].0,
                                    expected,
                                    "{}x{} max {}x{} overlap {}",
                                    width,
                                    height,
                                    max_w,
                                    max_h,
                                    overlap
                                );
                            }

                            for s in &segments {
                                assert!(s.width <= max_w);
                                assert!(s.height <= max_h + expected);
                            }
                        }
                    }
                }
            }
        }
    }

    #[test]
    fn test_effective_tile_height_for_heavy_image() {
        // Within limits by bytes
        assert_eq!(effective_tile_height(1000, 100, 200, 2000), 2000);
        // 3x over the byte ceiling: three bands
        assert_eq!(effective_tile_height(1000, 600, 200, 2000), 334);
        // Never taller than the configured tile
        assert_eq!(effective_tile_height(9000, 400, 200, 2000), 2000);

        let segments = plan(800, 1000, 2000, effective_tile_height(1000, 600, 200, 2000), 20);
        assert_eq!(segments.len(), 3);
    }

    #[test]
    fn test_image_limits() {
        let limits = ImageLimits {
            max_bytes: 1000,
            max_width: 100,
            max_height: 100,
        };
        assert!(!limits.exceeded_by(100, 100, 1000));
        assert!(limits.exceeded_by(101, 100, 10));
        assert!(limits.exceeded_by(10, 101, 10));
        assert!(limits.exceeded_by(10, 10, 1001));
    }

    #[test]
    fn test_reassemble_orders_and_keeps_overlap_duplicates() {
        let parts = vec![
            (1, "line two\nshared line".to_string()),
            (0, "line one\nshared line\n".to_string()),
            (2, "   ".to_string()),
        ];
        assert_eq!(
            reassemble(parts),
            "line one\nshared line\n\nline two\nshared line"
        );
    }
}
