use image::imageops::{self, FilterType};
use image::{GrayImage, Luma, Rgb, RgbImage};
use imageproc::contrast::{otsu_level, threshold, ThresholdType};
use tracing::debug;

/// Longest side of the downscaled work copy used for interactive
/// segmentation. Full-resolution segmentation is reserved for the batch path,
/// which is not on a human-latency budget.
pub const WORK_MAX_SIDE: u32 = 1000;

/// Which backing the page was scanned against. Determines the polarity of
/// the automatic threshold: on a dark backing the content is the bright
/// region, on a light backing it is the dark one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backing {
    Dark,
    Light,
}

/// Brightness cut for the automatic strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThresholdMode {
    /// Maximize between-class variance over the luma histogram (Otsu).
    Auto,
    /// Caller-supplied fixed cut.
    Fixed(u8),
}

/// Parameters for one segmentation run.
#[derive(Debug, Clone, Copy)]
pub enum SegmentParams {
    /// Global brightness threshold over the luma channel.
    Automatic {
        mode: ThresholdMode,
        backing: Backing,
    },
    /// Background sampled from a user-clicked pixel: a pixel is background
    /// when every channel differs from the reference by at most `tolerance`.
    ColorTolerance {
        reference: Rgb<u8>,
        tolerance: u8,
    },
}

/// Turn a page into a foreground/background mask (255 = foreground).
///
/// Pure function of `(page, params)`. An empty or fully uniform page yields
/// an all-background mask, which the contour extractor reports as "no
/// contour found" rather than an error.
pub fn segment(page: &RgbImage, params: &SegmentParams) -> GrayImage {
    match *params {
        SegmentParams::Automatic { mode, backing } => {
            let gray = to_luma(page);
            let cut = match mode {
                ThresholdMode::Fixed(value) => value,
                ThresholdMode::Auto => otsu_level(&gray),
            };
            debug!(cut, ?backing, "thresholding luma channel");
            let polarity = match backing {
                Backing::Dark => ThresholdType::Binary,
                Backing::Light => ThresholdType::BinaryInverted,
            };
            threshold(&gray, cut, polarity)
        }
        SegmentParams::ColorTolerance {
            reference,
            tolerance,
        } => color_tolerance_mask(page, reference, tolerance),
    }
}

/// Downscale a page so its longest side does not exceed [`WORK_MAX_SIDE`].
/// Returns the copy and the applied scale (work / source, <= 1). A page
/// already within the cap is returned unscaled.
pub fn work_image(page: &RgbImage) -> (RgbImage, f64) {
    let (width, height) = page.dimensions();
    let longest = width.max(height);
    if longest <= WORK_MAX_SIDE || longest == 0 {
        return (page.clone(), 1.0);
    }

    let scale = WORK_MAX_SIDE as f64 / longest as f64;
    let new_w = ((width as f64 * scale).round() as u32).max(1);
    let new_h = ((height as f64 * scale).round() as u32).max(1);
    debug!(new_w, new_h, scale, "building work copy");

    (
        imageops::resize(page, new_w, new_h, FilterType::Triangle),
        scale,
    )
}

/// Standard luminance conversion, matching the Rec. 601 weights.
fn to_luma(page: &RgbImage) -> GrayImage {
    let (width, height) = page.dimensions();
    let mut gray = GrayImage::new(width, height);

    for (x, y, pixel) in page.enumerate_pixels() {
        let luma = (0.299 * pixel[0] as f64
            + 0.587 * pixel[1] as f64
            + 0.114 * pixel[2] as f64) as u8;
        gray.put_pixel(x, y, Luma([luma]));
    }

    gray
}

/// Foreground = any pixel whose color strays from the sampled background by
/// more than the tolerance in at least one channel.
fn color_tolerance_mask(page: &RgbImage, reference: Rgb<u8>, tolerance: u8) -> GrayImage {
    let (width, height) = page.dimensions();
    let mut mask = GrayImage::new(width, height);

    for (x, y, pixel) in page.enumerate_pixels() {
        let is_background = (0..3).all(|c| {
            let diff = (pixel[c] as i16 - reference[c] as i16).unsigned_abs();
            diff <= tolerance as u16
        });
        mask.put_pixel(x, y, Luma([if is_background { 0 } else { 255 }]));
    }

    mask
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page_with_bright_block(w: u32, h: u32) -> RgbImage {
        let mut page = RgbImage::from_pixel(w, h, Rgb([10, 10, 10]));
        for y in h / 4..3 * h / 4 {
            for x in w / 4..3 * w / 4 {
                page.put_pixel(x, y, Rgb([240, 240, 240]));
            }
        }
        page
    }

    #[test]
    fn automatic_dark_backing_selects_bright_region() {
        let page = page_with_bright_block(40, 40);
        let params = SegmentParams::Automatic {
            mode: ThresholdMode::Auto,
            backing: Backing::Dark,
        };
        let mask = segment(&page, &params);

        assert_eq!(mask.get_pixel(20, 20).0[0], 255);
        assert_eq!(mask.get_pixel(1, 1).0[0], 0);
    }

    #[test]
    fn automatic_light_backing_inverts_polarity() {
        let page = page_with_bright_block(40, 40);
        let params = SegmentParams::Automatic {
            mode: ThresholdMode::Fixed(128),
            backing: Backing::Light,
        };
        let mask = segment(&page, &params);

        assert_eq!(mask.get_pixel(20, 20).0[0], 0);
        assert_eq!(mask.get_pixel(1, 1).0[0], 255);
    }

    #[test]
    fn uniform_page_yields_all_background_under_color_tolerance() {
        let page = RgbImage::from_pixel(16, 16, Rgb([200, 190, 180]));
        let params = SegmentParams::ColorTolerance {
            reference: Rgb([200, 190, 180]),
            tolerance: 5,
        };
        let mask = segment(&page, &params);
        assert!(mask.pixels().all(|p| p.0[0] == 0));
    }

    #[test]
    fn color_tolerance_requires_every_channel_within_bound() {
        let mut page = RgbImage::from_pixel(4, 1, Rgb([100, 100, 100]));
        page.put_pixel(1, 0, Rgb([100, 100, 131])); // one channel out
        page.put_pixel(2, 0, Rgb([110, 110, 110])); // all channels within
        let params = SegmentParams::ColorTolerance {
            reference: Rgb([100, 100, 100]),
            tolerance: 30,
        };
        let mask = segment(&page, &params);

        assert_eq!(mask.get_pixel(0, 0).0[0], 0);
        assert_eq!(mask.get_pixel(1, 0).0[0], 255);
        assert_eq!(mask.get_pixel(2, 0).0[0], 0);
    }

    #[test]
    fn work_image_caps_longest_side_and_reports_scale() {
        let page = RgbImage::from_pixel(4000, 2000, Rgb([0, 0, 0]));
        let (work, scale) = work_image(&page);
        assert_eq!(work.dimensions(), (1000, 500));
        assert!((scale - 0.25).abs() < 1e-9);

        let small = RgbImage::from_pixel(640, 480, Rgb([0, 0, 0]));
        let (copy, scale) = work_image(&small);
        assert_eq!(copy.dimensions(), (640, 480));
        assert_eq!(scale, 1.0);
    }
}
