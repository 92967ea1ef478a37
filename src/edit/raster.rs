//! Page raster buffers and residency accounting.
//!
//! A [`PageRaster`] is the single large allocation of a pipeline run. It is
//! owned by whoever processes the page and released by scope; the
//! [`RasterResidency`] counters make that bound observable.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use super::types::{PixelBounds, Rgb};

/// Bytes per pixel: R, G, B, A
pub const CHANNELS: usize = 4;

const OPAQUE: u8 = u8::MAX;

#[derive(Debug, thiserror::Error)]
#[error("cannot allocate a {width}x{height} raster")]
pub struct AllocationFailed {
    pub width: u32,
    pub height: u32,
}

/// Borrowed view of engine pixels: `channels` bytes per pixel, RGB first,
/// rows `stride` bytes apart
#[derive(Clone, Copy, Debug)]
pub struct RgbSamples<'a> {
    pub samples: &'a [u8],
    pub width: u32,
    pub height: u32,
    pub stride: usize,
    pub channels: usize,
}

/// Borrowed 8-bit coverage plane, 0 is no ink and 255 is full ink
#[derive(Clone, Copy, Debug)]
pub struct CoverageMask<'a> {
    pub samples: &'a [u8],
    pub width: u32,
    pub height: u32,
    pub stride: usize,
}

/// RGBA8 pixel buffer of one rendered page.
///
/// Alpha is always opaque; it is carried so the buffer layout matches the
/// four-byte pixels the rest of the pipeline reasons about.
pub struct PageRaster {
    width: u32,
    height: u32,
    samples: Vec<u8>,
    residency: Option<ResidencyToken>,
}

impl std::fmt::Debug for PageRaster {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PageRaster")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("tracked", &self.residency.is_some())
            .finish()
    }
}

impl PageRaster {
    /// Allocate a white, opaque canvas.
    ///
    /// Allocation failure is reported instead of aborting the process.
    pub fn new_white(width: u32, height: u32) -> Result<Self, AllocationFailed> {
        let failed = AllocationFailed { width, height };
        let len = (width as usize)
            .checked_mul(height as usize)
            .and_then(|px| px.checked_mul(CHANNELS))
            .ok_or(AllocationFailed { width, height })?;

        let mut samples = Vec::new();
        samples.try_reserve_exact(len).map_err(|_| failed)?;
        samples.resize(len, OPAQUE);

        Ok(Self {
            width,
            height,
            samples,
            residency: None,
        })
    }

    #[must_use]
    pub fn width(&self) -> u32 {
        self.width
    }

    #[must_use]
    pub fn height(&self) -> u32 {
        self.height
    }

    /// Raw RGBA samples, row-major, no padding between rows
    #[must_use]
    pub fn samples(&self) -> &[u8] {
        &self.samples
    }

    pub fn samples_mut(&mut self) -> &mut [u8] {
        &mut self.samples
    }

    /// RGBA value at `(x, y)`; panics when out of bounds
    #[must_use]
    pub fn pixel(&self, x: u32, y: u32) -> [u8; 4] {
        let offset = self.offset(x, y);
        let px = &self.samples[offset..offset + CHANNELS];
        [px[0], px[1], px[2], px[3]]
    }

    /// Iterate over rows of RGBA samples, top to bottom
    pub fn rows(&self) -> impl Iterator<Item = &[u8]> {
        self.samples.chunks_exact(self.row_bytes().max(1))
    }

    /// Fill `bounds` with an opaque colour
    pub fn fill_rect(&mut self, bounds: PixelBounds, color: Rgb) {
        let x1 = bounds.x1.min(self.width);
        let y1 = bounds.y1.min(self.height);
        if bounds.x0 >= x1 || bounds.y0 >= y1 {
            return;
        }

        let pixel = [color.r, color.g, color.b, OPAQUE];
        for y in bounds.y0..y1 {
            let start = self.offset(bounds.x0, y);
            let end = self.offset(x1 - 1, y) + CHANNELS;
            for px in self.samples[start..end].chunks_exact_mut(CHANNELS) {
                px.copy_from_slice(&pixel);
            }
        }
    }

    /// Copy a block of engine samples into the canvas, starting at row `top`.
    ///
    /// Source pixels beyond the canvas are dropped; canvas pixels the source
    /// does not reach keep their current value.
    pub fn copy_from_rgb(&mut self, top: u32, src: &RgbSamples<'_>) {
        let n = src.channels;
        if n < 3 || top >= self.height {
            return;
        }
        let cols = src.width.min(self.width) as usize;
        let rows = src.height.min(self.height - top);

        for y in 0..rows {
            let src_start = y as usize * src.stride;
            let Some(src_row) = src.samples.get(src_start..src_start + cols * n) else {
                break;
            };
            let dst_start = self.offset(0, top + y);
            let dst_row = &mut self.samples[dst_start..dst_start + cols * CHANNELS];
            for (dst, px) in dst_row.chunks_exact_mut(CHANNELS).zip(src_row.chunks_exact(n)) {
                dst[..3].copy_from_slice(&px[..3]);
                dst[3] = OPAQUE;
            }
        }
    }

    /// Blend `color` into the canvas through an 8-bit coverage mask.
    ///
    /// The mask's top-left pixel lands on `(left, top)`, which may lie
    /// outside the canvas; whatever falls outside is clipped.
    pub fn blend_coverage(&mut self, left: i64, top: i64, mask: &CoverageMask<'_>, color: Rgb) {
        let ink = [color.r, color.g, color.b];
        for my in 0..mask.height {
            let y = top + i64::from(my);
            if y < 0 || y >= i64::from(self.height) {
                continue;
            }
            let row_start = my as usize * mask.stride;
            let Some(row) = mask.samples.get(row_start..row_start + mask.width as usize) else {
                break;
            };

            for (mx, &alpha) in row.iter().enumerate() {
                if alpha == 0 {
                    continue;
                }
                let x = left + mx as i64;
                if x < 0 || x >= i64::from(self.width) {
                    continue;
                }
                let offset = self.offset(x as u32, y as u32);
                let px = &mut self.samples[offset..offset + CHANNELS];
                for (channel, &target) in px[..3].iter_mut().zip(ink.iter()) {
                    *channel = blend(*channel, target, alpha);
                }
                px[3] = OPAQUE;
            }
        }
    }

    fn row_bytes(&self) -> usize {
        self.width as usize * CHANNELS
    }

    fn offset(&self, x: u32, y: u32) -> usize {
        y as usize * self.row_bytes() + x as usize * CHANNELS
    }
}

fn blend(dst: u8, src: u8, alpha: u8) -> u8 {
    let a = u32::from(alpha);
    let mixed = u32::from(src) * a + u32::from(dst) * (255 - a);
    ((mixed + 127) / 255) as u8
}

#[derive(Debug, Default)]
struct ResidencyCounters {
    live: AtomicUsize,
    peak: AtomicUsize,
    total: AtomicUsize,
}

/// Counts page rasters alive at once for one pipeline instance.
///
/// Cloning shares the counters.
#[derive(Clone, Debug, Default)]
pub struct RasterResidency {
    counters: Arc<ResidencyCounters>,
}

impl RasterResidency {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach the raster to these counters; it is counted until dropped
    #[must_use]
    pub fn track(&self, mut raster: PageRaster) -> PageRaster {
        if raster.residency.is_some() {
            return raster;
        }
        let live = self.counters.live.fetch_add(1, Ordering::SeqCst) + 1;
        self.counters.peak.fetch_max(live, Ordering::SeqCst);
        self.counters.total.fetch_add(1, Ordering::SeqCst);
        raster.residency = Some(ResidencyToken {
            counters: Arc::clone(&self.counters),
        });
        raster
    }

    /// Rasters currently alive
    #[must_use]
    pub fn live(&self) -> usize {
        self.counters.live.load(Ordering::SeqCst)
    }

    /// Highest number of rasters alive at the same time
    #[must_use]
    pub fn peak(&self) -> usize {
        self.counters.peak.load(Ordering::SeqCst)
    }

    /// Rasters tracked over the lifetime of the counters
    #[must_use]
    pub fn total(&self) -> usize {
        self.counters.total.load(Ordering::SeqCst)
    }
}

struct ResidencyToken {
    counters: Arc<ResidencyCounters>,
}

impl Drop for ResidencyToken {
    fn drop(&mut self) {
        self.counters.live.fetch_sub(1, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_canvas_is_opaque_white() {
        let raster = PageRaster::new_white(3, 2).unwrap();
        assert_eq!(raster.samples().len(), 3 * 2 * CHANNELS);
        assert!(raster.samples().iter().all(|&b| b == 255));
        assert_eq!(raster.rows().count(), 2);
    }

    #[test]
    fn oversized_canvas_fails_instead_of_aborting() {
        let err = PageRaster::new_white(u32::MAX, u32::MAX).unwrap_err();
        assert_eq!((err.width, err.height), (u32::MAX, u32::MAX));
    }

    #[test]
    fn fill_rect_paints_only_inside() {
        let mut raster = PageRaster::new_white(4, 4).unwrap();
        raster.fill_rect(PixelBounds { x0: 1, y0: 1, x1: 3, y1: 2 }, Rgb::new(10, 20, 30));

        assert_eq!(raster.pixel(1, 1), [10, 20, 30, 255]);
        assert_eq!(raster.pixel(2, 1), [10, 20, 30, 255]);
        assert_eq!(raster.pixel(0, 1), [255, 255, 255, 255]);
        assert_eq!(raster.pixel(1, 2), [255, 255, 255, 255]);
    }

    #[test]
    fn fill_rect_clamps_to_canvas() {
        let mut raster = PageRaster::new_white(2, 2).unwrap();
        raster.fill_rect(PixelBounds { x0: 1, y0: 1, x1: 9, y1: 9 }, Rgb::BLACK);
        assert_eq!(raster.pixel(1, 1), [0, 0, 0, 255]);
        assert_eq!(raster.pixel(0, 0), [255, 255, 255, 255]);
    }

    #[test]
    fn copy_from_rgb_handles_stride_and_overhang() {
        // 3x2 RGB source with one padding byte per row, copied into 2x3 canvas
        let src = [
            1, 1, 1, 2, 2, 2, 3, 3, 3, 0, //
            4, 4, 4, 5, 5, 5, 6, 6, 6, 0,
        ];
        let mut raster = PageRaster::new_white(2, 3).unwrap();
        let rows = RgbSamples {
            samples: &src,
            width: 3,
            height: 2,
            stride: 10,
            channels: 3,
        };
        raster.copy_from_rgb(0, &rows);

        assert_eq!(raster.pixel(0, 0), [1, 1, 1, 255]);
        assert_eq!(raster.pixel(1, 0), [2, 2, 2, 255]);
        assert_eq!(raster.pixel(1, 1), [5, 5, 5, 255]);
        // Row the source did not reach stays white
        assert_eq!(raster.pixel(0, 2), [255, 255, 255, 255]);
    }

    #[test]
    fn blend_coverage_mixes_and_clips() {
        let mut raster = PageRaster::new_white(3, 3).unwrap();
        let mask = CoverageMask {
            samples: &[255, 0, 128, 255],
            width: 2,
            height: 2,
            stride: 2,
        };
        raster.blend_coverage(-1, 1, &mask, Rgb::BLACK);

        // Column -1 is clipped, column 0 receives the right half of the mask
        assert_eq!(raster.pixel(0, 1), [255, 255, 255, 255]);
        assert_eq!(raster.pixel(0, 2), [0, 0, 0, 255]);
        assert_eq!(raster.pixel(1, 1), [255, 255, 255, 255]);
    }

    #[test]
    fn copy_from_rgb_places_bands_at_their_row() {
        // Two one-row bands of a 2x3 canvas; the second hangs off the bottom
        let mut raster = PageRaster::new_white(2, 3).unwrap();
        let first = [7, 7, 7, 8, 8, 8];
        let second = [9, 9, 9, 9, 9, 9, 1, 1, 1, 1, 1, 1];
        raster.copy_from_rgb(
            1,
            &RgbSamples {
                samples: &first,
                width: 2,
                height: 1,
                stride: 6,
                channels: 3,
            },
        );
        raster.copy_from_rgb(
            2,
            &RgbSamples {
                samples: &second,
                width: 2,
                height: 2,
                stride: 6,
                channels: 3,
            },
        );
        raster.copy_from_rgb(
            3,
            &RgbSamples {
                samples: &second,
                width: 2,
                height: 2,
                stride: 6,
                channels: 3,
            },
        );

        assert_eq!(raster.pixel(0, 0), [255, 255, 255, 255]);
        assert_eq!(raster.pixel(1, 1), [8, 8, 8, 255]);
        assert_eq!(raster.pixel(0, 2), [9, 9, 9, 255]);
    }

    #[test]
    fn blend_coverage_honours_mask_stride() {
        // One padding byte per mask row must never reach the canvas
        let mut raster = PageRaster::new_white(2, 2).unwrap();
        let mask = CoverageMask {
            samples: &[255, 255, 255, 0, 255, 255],
            width: 2,
            height: 2,
            stride: 3,
        };
        raster.blend_coverage(0, 0, &mask, Rgb::new(200, 0, 0));

        assert_eq!(raster.pixel(0, 0), [200, 0, 0, 255]);
        assert_eq!(raster.pixel(1, 0), [200, 0, 0, 255]);
        assert_eq!(raster.pixel(0, 1), [255, 255, 255, 255]);
        assert_eq!(raster.pixel(1, 1), [200, 0, 0, 255]);
    }

    #[test]
    fn blend_is_linear_in_coverage() {
        assert_eq!(blend(255, 0, 255), 0);
        assert_eq!(blend(255, 0, 0), 255);
        assert_eq!(blend(200, 100, 128), 150);
    }

    #[test]
    fn residency_counts_live_rasters() {
        let residency = RasterResidency::new();
        let first = residency.track(PageRaster::new_white(1, 1).unwrap());
        assert_eq!(residency.live(), 1);

        let second = residency.track(PageRaster::new_white(1, 1).unwrap());
        assert_eq!(residency.live(), 2);
        drop(first);
        drop(second);

        let third = residency.track(PageRaster::new_white(1, 1).unwrap());
        // Tracking twice does not double count
        let third = residency.track(third);
        assert_eq!(residency.live(), 1);
        drop(third);

        assert_eq!(residency.live(), 0);
        assert_eq!(residency.peak(), 2);
        assert_eq!(residency.total(), 3);
    }
}
