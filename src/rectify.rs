use image::imageops;
use image::{Rgb, RgbImage};
use imageproc::geometric_transformations::{warp_into, Interpolation, Projection};
use tracing::debug;

use crate::geometry::{
    bounding_rect, rotation_about, transform_point, SourceContour, ANGLE_SNAP_EPSILON,
};

/// Side length of the placeholder produced for degenerate crops.
pub const PLACEHOLDER_SIDE: u32 = 10;

/// Color used for areas exposed outside the original frame by the warp.
/// White suits pages scanned on a light backing, black a dark one, so it is
/// a parameter rather than a constant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FillColor {
    #[default]
    White,
    Black,
}

impl FillColor {
    pub fn pixel(self) -> Rgb<u8> {
        match self {
            FillColor::White => Rgb([255, 255, 255]),
            FillColor::Black => Rgb([0, 0, 0]),
        }
    }
}

/// Outcome of rotating and cropping one page. A degenerate (zero-area) crop
/// is a terminal state of its own, never an error: the batch carries on.
#[derive(Debug)]
pub enum Rectified {
    Page { image: RgbImage, angle_degrees: f64 },
    Degenerate(RgbImage),
}

impl Rectified {
    pub fn into_image(self) -> RgbImage {
        match self {
            Rectified::Page { image, .. } => image,
            Rectified::Degenerate(image) => image,
        }
    }

    pub fn is_degenerate(&self) -> bool {
        matches!(self, Rectified::Degenerate(_))
    }
}

/// Rotate `page` about its own center by `angle_degrees` and crop to the
/// bounding box of the rotated contour, in a single resampling pass.
///
/// An angle within [`ANGLE_SNAP_EPSILON`] of zero skips the warp entirely and
/// crops the contour's axis-aligned bounding box straight out of the source.
pub fn rectify(
    page: &RgbImage,
    contour: &SourceContour,
    angle_degrees: f64,
    fill: FillColor,
) -> Rectified {
    if angle_degrees.abs() < ANGLE_SNAP_EPSILON {
        return crop_axis_aligned(page, contour, fill);
    }

    let (img_w, img_h) = page.dimensions();
    let center = (img_w as f64 / 2.0, img_h as f64 / 2.0);
    let mut matrix = rotation_about(center, angle_degrees);

    // The crop window is the bounding box of the rotated contour points, not
    // of the whole rotated frame. That is what keeps the crop content-tight.
    let rotated: Vec<(f64, f64)> = contour
        .points
        .iter()
        .map(|&(x, y)| transform_point(&matrix, x, y))
        .collect();

    let Some((x, y, crop_w, crop_h)) = bounding_rect(&rotated) else {
        return Rectified::Degenerate(placeholder(fill));
    };
    if crop_w <= 0 || crop_h <= 0 {
        debug!(crop_w, crop_h, "degenerate crop after rotation");
        return Rectified::Degenerate(placeholder(fill));
    }

    // Shift the transform so the crop's top-left lands on the output origin;
    // warping into a crop-sized buffer then rotates and crops in one pass.
    matrix[(0, 2)] -= x as f64;
    matrix[(1, 2)] -= y as f64;

    let flat = [
        matrix[(0, 0)] as f32,
        matrix[(0, 1)] as f32,
        matrix[(0, 2)] as f32,
        matrix[(1, 0)] as f32,
        matrix[(1, 1)] as f32,
        matrix[(1, 2)] as f32,
        0.0,
        0.0,
        1.0,
    ];
    let Some(projection) = Projection::from_matrix(flat) else {
        // A rotation is always invertible; this is unreachable in practice,
        // but fall back to the unrotated crop rather than panic.
        debug!("rotation matrix rejected as non-invertible");
        return crop_axis_aligned(page, contour, fill);
    };

    let mut output = RgbImage::from_pixel(crop_w as u32, crop_h as u32, fill.pixel());
    warp_into(
        page,
        &projection,
        Interpolation::Bicubic,
        fill.pixel(),
        &mut output,
    );

    debug!(
        angle_degrees,
        out_w = crop_w,
        out_h = crop_h,
        "page rectified"
    );
    Rectified::Page {
        image: output,
        angle_degrees,
    }
}

/// Zero-rotation path: crop the contour's axis-aligned bounding box directly,
/// clamped to the page bounds.
fn crop_axis_aligned(page: &RgbImage, contour: &SourceContour, fill: FillColor) -> Rectified {
    let (img_w, img_h) = page.dimensions();

    let Some((x, y, w, h)) = bounding_rect(&contour.points) else {
        return Rectified::Degenerate(placeholder(fill));
    };

    let x0 = x.clamp(0, img_w as i64);
    let y0 = y.clamp(0, img_h as i64);
    let x1 = (x + w).clamp(0, img_w as i64);
    let y1 = (y + h).clamp(0, img_h as i64);

    if x1 <= x0 || y1 <= y0 {
        debug!("contour bounding box is empty after clamping");
        return Rectified::Degenerate(placeholder(fill));
    }

    let cropped = imageops::crop_imm(
        page,
        x0 as u32,
        y0 as u32,
        (x1 - x0) as u32,
        (y1 - y0) as u32,
    )
    .to_image();

    Rectified::Page {
        image: cropped,
        angle_degrees: 0.0,
    }
}

fn placeholder(fill: FillColor) -> RgbImage {
    RgbImage::from_pixel(PLACEHOLDER_SIDE, PLACEHOLDER_SIDE, fill.pixel())
}
