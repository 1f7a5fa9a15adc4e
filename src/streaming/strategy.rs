//! Partitioning strategies.
//!
//! Every strategy turns a region into an ordered, row-major list of
//! non-overlapping regions whose union is the region itself.

use crate::core::region::{Region, DIMENSION};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Bytes in one megabyte of RAM budget.
pub const MB: u64 = 1024 * 1024;

/// Tile edges are aligned down to this many pixels once they are at least
/// this large.
pub const TILE_ALIGNMENT: u64 = 16;

/// How an output region is cut into partitions.
///
/// RAM-driven variants take a budget in MB (0 means the platform default)
/// and a bias ≥ 1 applied to the pipeline's bytes per pixel.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StreamingStrategy {
    /// `divisions` strips along the slowest axis.
    NumberOfDivisionsStripped { divisions: u64 },
    /// About `divisions` square tiles.
    NumberOfDivisionsTiled { divisions: u64 },
    /// Strips of `lines` rows.
    LinesPerStrip { lines: u64 },
    /// Square tiles of `dimension` pixels.
    TileDimension { dimension: u64 },
    /// Strips as tall as the budget allows.
    RamStripped { ram_mb: u64, bias: f64 },
    /// Square tiles as large as the budget allows.
    RamTiled { ram_mb: u64, bias: f64 },
    /// Like [`RamTiled`](Self::RamTiled), snapped to a native block grid.
    RamAdaptive { ram_mb: u64, bias: f64 },
}

impl Default for StreamingStrategy {
    fn default() -> Self {
        StreamingStrategy::RamAdaptive {
            ram_mb: 0,
            bias: 1.0,
        }
    }
}

impl fmt::Display for StreamingStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StreamingStrategy::NumberOfDivisionsStripped { divisions } => {
                write!(f, "{} strips", divisions)
            }
            StreamingStrategy::NumberOfDivisionsTiled { divisions } => {
                write!(f, "{} tiles", divisions)
            }
            StreamingStrategy::LinesPerStrip { lines } => write!(f, "strips of {} lines", lines),
            StreamingStrategy::TileDimension { dimension } => {
                write!(f, "{}x{} tiles", dimension, dimension)
            }
            StreamingStrategy::RamStripped { ram_mb, bias } => {
                write!(f, "RAM-driven strips ({} MB, bias {})", ram_mb, bias)
            }
            StreamingStrategy::RamTiled { ram_mb, bias } => {
                write!(f, "RAM-driven tiles ({} MB, bias {})", ram_mb, bias)
            }
            StreamingStrategy::RamAdaptive { ram_mb, bias } => {
                write!(f, "RAM-driven adaptive ({} MB, bias {})", ram_mb, bias)
            }
        }
    }
}

impl StreamingStrategy {
    /// Split `region`.
    ///
    /// Zero counts and sizes yield the whole region, and a RAM budget of 0
    /// uses `default_ram_mb`.
    pub fn split(
        &self,
        region: &Region,
        bytes_per_pixel: u64,
        block_size: Option<[u64; DIMENSION]>,
        default_ram_mb: u64,
    ) -> Vec<Region> {
        let budget = |ram_mb: u64| {
            let mb = if ram_mb == 0 { default_ram_mb } else { ram_mb };
            mb.saturating_mul(MB)
        };

        match *self {
            StreamingStrategy::NumberOfDivisionsStripped { divisions } => {
                region.split_row_major(divisions as usize)
            }
            StreamingStrategy::NumberOfDivisionsTiled { divisions } => {
                split_tiled_by_count(region, divisions)
            }
            StreamingStrategy::LinesPerStrip { lines } => {
                if lines == 0 {
                    vec![*region]
                } else {
                    region.strips(lines)
                }
            }
            StreamingStrategy::TileDimension { dimension } => {
                if dimension == 0 {
                    vec![*region]
                } else {
                    region.tiles([dimension; DIMENSION])
                }
            }
            StreamingStrategy::RamStripped { ram_mb, bias } => {
                let pixels = pixels_per_partition(budget(ram_mb), bytes_per_pixel, bias);
                region.strips(strip_lines(region, pixels))
            }
            StreamingStrategy::RamTiled { ram_mb, bias } => {
                let pixels = pixels_per_partition(budget(ram_mb), bytes_per_pixel, bias);
                region.tiles(tile_shape(pixels))
            }
            StreamingStrategy::RamAdaptive { ram_mb, bias } => {
                let pixels = pixels_per_partition(budget(ram_mb), bytes_per_pixel, bias);
                match block_size {
                    Some(block) if block.iter().all(|&b| b > 0) => {
                        region.tiles(adaptive_shape(region, pixels, block))
                    }
                    _ => region.tiles(tile_shape(pixels)),
                }
            }
        }
    }
}

/// Largest pixel count whose footprint `pixels × bytes_per_pixel × bias` fits
/// in `ram_bytes` (never below one pixel).
pub fn pixels_per_partition(ram_bytes: u64, bytes_per_pixel: u64, bias: f64) -> u64 {
    let per_pixel = bytes_per_pixel.max(1) as f64 * bias.max(1.0);
    ((ram_bytes as f64 / per_pixel).floor() as u64).max(1)
}

/// Rows per strip so that a strip holds at most `pixels` pixels.
pub fn strip_lines(region: &Region, pixels: u64) -> u64 {
    (pixels / region.width().max(1)).max(1)
}

/// Square tile holding at most `pixels` pixels.
pub fn tile_shape(pixels: u64) -> [u64; DIMENSION] {
    let mut edge = (pixels as f64).sqrt().floor() as u64;
    while edge > 1 && edge * edge > pixels {
        edge -= 1;
    }
    if edge >= TILE_ALIGNMENT {
        edge -= edge % TILE_ALIGNMENT;
    }
    [edge.max(1); DIMENSION]
}

/// Partition made of whole storage blocks, growing along rows first.
///
/// At least one block per partition, even when a single block exceeds the
/// pixel budget.
pub fn adaptive_shape(
    region: &Region,
    pixels: u64,
    block: [u64; DIMENSION],
) -> [u64; DIMENSION] {
    let block_pixels = block[0] * block[1];
    let blocks = (pixels / block_pixels).max(1);
    let across = region.width().div_ceil(block[0]).max(1);
    let wide = blocks.min(across);
    let tall = (blocks / wide).max(1);
    [wide * block[0], tall * block[1]]
}

/// Square tiles sized so that about `divisions` of them cover the region.
pub fn split_tiled_by_count(region: &Region, divisions: u64) -> Vec<Region> {
    if divisions <= 1 || region.is_empty() {
        return vec![*region];
    }
    let per_tile = region.pixel_count().div_ceil(divisions);
    let edge = ((per_tile as f64).sqrt().ceil() as u64).max(1);
    region.tiles([edge; DIMENSION])
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn assert_partition(region: &Region, parts: &[Region]) {
        let total: u64 = parts.iter().map(|p| p.pixel_count()).sum();
        assert_eq!(total, region.pixel_count());
        for (i, a) in parts.iter().enumerate() {
            assert!(region.contains(a), "{} escapes {}", a, region);
            for b in &parts[i + 1..] {
                assert!(a.intersect(b).is_none(), "{} overlaps {}", a, b);
            }
        }
    }

    #[test]
    fn test_ram_stripped_large_raster() {
        let region = Region::from_size([10_000, 10_000]);
        let strategy = StreamingStrategy::RamStripped {
            ram_mb: 64,
            bias: 1.0,
        };
        let parts = strategy.split(&region, 4, None, 256);
        assert!(parts.len() > 1);
        assert!(parts.iter().all(|p| p.pixel_count() * 4 <= 64 * MB));
        assert_partition(&region, &parts);
    }

    #[test]
    fn test_ram_tiled_aligned_edges() {
        let region = Region::from_size([10_000, 10_000]);
        let strategy = StreamingStrategy::RamTiled {
            ram_mb: 64,
            bias: 1.0,
        };
        let parts = strategy.split(&region, 4, None, 256);
        assert_eq!(parts[0].size, [4096, 4096]);
        assert!(parts.iter().all(|p| p.pixel_count() * 4 <= 64 * MB));
        assert_partition(&region, &parts);
    }

    #[test]
    fn test_bias_shrinks_partitions() {
        let region = Region::from_size([1000, 1000]);
        let plain = StreamingStrategy::RamStripped { ram_mb: 1, bias: 1.0 };
        let biased = StreamingStrategy::RamStripped { ram_mb: 1, bias: 4.0 };
        assert!(biased.split(&region, 4, None, 256).len() > plain.split(&region, 4, None, 256).len());
    }

    #[test]
    fn test_zero_ram_uses_default() {
        let region = Region::from_size([1024, 1024]);
        let strategy = StreamingStrategy::RamStripped { ram_mb: 0, bias: 1.0 };
        // 1 MB default over 4-byte pixels: 256 rows of 1024 pixels.
        let parts = strategy.split(&region, 4, None, 1);
        assert_eq!(parts.len(), 4);
        assert_eq!(parts[0].size, [1024, 256]);
    }

    #[test]
    fn test_adaptive_snaps_to_blocks() {
        let region = Region::from_size([1000, 1000]);
        let strategy = StreamingStrategy::RamAdaptive { ram_mb: 1, bias: 1.0 };

        let scanlines = strategy.split(&region, 4, Some([1000, 1]), 256);
        assert_eq!(scanlines[0].size, [1000, 262]);

        let tiled = strategy.split(&region, 4, Some([256, 256]), 256);
        assert_eq!(tiled[0].size, [1000, 256]);
        assert_eq!(tiled.len(), 4);
        assert!(tiled.iter().all(|p| p.index[0] % 256 == 0 && p.index[1] % 256 == 0));
        assert_partition(&region, &tiled);
    }

    #[test]
    fn test_adaptive_keeps_one_block_when_over_budget() {
        let shape = adaptive_shape(&Region::from_size([4096, 4096]), 100, [512, 512]);
        assert_eq!(shape, [512, 512]);
    }

    #[test]
    fn test_tiled_by_count() {
        let region = Region::from_size([100, 100]);
        let parts = split_tiled_by_count(&region, 4);
        assert_eq!(parts.len(), 4);
        assert_eq!(parts[0].size, [50, 50]);
        assert_eq!(split_tiled_by_count(&region, 0), vec![region]);
    }

    #[test]
    fn test_zero_parameters_yield_whole_region() {
        let region = Region::from_size([10, 10]);
        for strategy in [
            StreamingStrategy::NumberOfDivisionsStripped { divisions: 0 },
            StreamingStrategy::LinesPerStrip { lines: 0 },
            StreamingStrategy::TileDimension { dimension: 0 },
        ] {
            assert_eq!(strategy.split(&region, 1, None, 1), vec![region]);
        }
    }

    #[test]
    fn test_strategy_serde_tagged() {
        let json = serde_json::to_string(&StreamingStrategy::LinesPerStrip { lines: 8 }).unwrap();
        assert_eq!(json, r#"{"kind":"lines_per_strip","lines":8}"#);
        let back: StreamingStrategy = serde_json::from_str(&json).unwrap();
        assert_eq!(back, StreamingStrategy::LinesPerStrip { lines: 8 });
    }

    fn any_strategy() -> impl Strategy<Value = StreamingStrategy> {
        prop_oneof![
            (0u64..20).prop_map(|divisions| StreamingStrategy::NumberOfDivisionsStripped { divisions }),
            (0u64..20).prop_map(|divisions| StreamingStrategy::NumberOfDivisionsTiled { divisions }),
            (0u64..40).prop_map(|lines| StreamingStrategy::LinesPerStrip { lines }),
            (0u64..40).prop_map(|dimension| StreamingStrategy::TileDimension { dimension }),
            (0u64..3, 1.0f64..5.0).prop_map(|(ram_mb, bias)| StreamingStrategy::RamStripped { ram_mb, bias }),
            (0u64..3, 1.0f64..5.0).prop_map(|(ram_mb, bias)| StreamingStrategy::RamTiled { ram_mb, bias }),
            (0u64..3, 1.0f64..5.0).prop_map(|(ram_mb, bias)| StreamingStrategy::RamAdaptive { ram_mb, bias }),
        ]
    }

    proptest! {
        #[test]
        fn prop_every_strategy_partitions(
            strategy in any_strategy(),
            x in -20i64..20, y in -20i64..20,
            w in 1u64..400, h in 1u64..400,
            bpp in 1u64..4096,
            block in proptest::option::of((1u64..64, 1u64..64)),
        ) {
            let region = Region::new([x, y], [w, h]);
            let parts = strategy.split(&region, bpp, block.map(|(a, b)| [a, b]), 1);
            let total: u64 = parts.iter().map(|p| p.pixel_count()).sum();
            prop_assert_eq!(total, region.pixel_count());
            for (i, a) in parts.iter().enumerate() {
                prop_assert!(region.contains(a));
                for b in &parts[i + 1..] {
                    prop_assert!(a.intersect(b).is_none());
                }
            }
        }
    }
}
