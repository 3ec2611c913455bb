use image::GrayImage;
use imageproc::contours::{find_contours, BorderType};
use tracing::debug;

use crate::geometry::{min_area_rect, OrientedBox};

/// Regions smaller than this (in mask pixels) are noise, not content. The
/// floor is tuned for the capped work resolution.
pub const MIN_CONTOUR_AREA: f64 = 50.0;

/// The dominant foreground region of a mask: its boundary points and the
/// flip-safe oriented box fit around them. Both are in the pixel space of
/// the mask they came from; callers lift them into work or source space.
#[derive(Debug, Clone)]
pub struct Extraction {
    pub points: Vec<(f64, f64)>,
    pub rect: OrientedBox,
}

/// Find the largest external foreground boundary in a mask and fit its
/// oriented box, with the angle already normalized into (-45°, 45°].
///
/// Returns `None` when the mask has no foreground or the largest region is
/// below [`MIN_CONTOUR_AREA`]. That is an expected outcome (blank page, poor
/// sample color), not a fault.
pub fn extract(mask: &GrayImage) -> Option<Extraction> {
    let contours = find_contours::<i32>(mask);

    let largest = contours
        .iter()
        .filter(|c| c.border_type == BorderType::Outer)
        .map(|c| {
            let points: Vec<(f64, f64)> = c
                .points
                .iter()
                .map(|p| (p.x as f64, p.y as f64))
                .collect();
            let area = polygon_area(&points);
            (points, area)
        })
        .max_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal))?;

    let (points, area) = largest;
    if area < MIN_CONTOUR_AREA {
        debug!(area, "largest region below minimum area floor");
        return None;
    }

    let rect = min_area_rect(&points)?.normalized();
    debug!(
        area,
        angle = rect.angle_degrees,
        width = rect.width,
        height = rect.height,
        "content region extracted"
    );

    Some(Extraction { points, rect })
}

/// Shoelace area of an ordered boundary polygon.
fn polygon_area(points: &[(f64, f64)]) -> f64 {
    if points.len() < 3 {
        return 0.0;
    }
    let n = points.len();
    let mut area = 0.0;
    for i in 0..n {
        let (x1, y1) = points[i];
        let (x2, y2) = points[(i + 1) % n];
        area += x1 * y2 - x2 * y1;
    }
    area.abs() / 2.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;

    fn mask_with_rect(w: u32, h: u32, x0: u32, y0: u32, rw: u32, rh: u32) -> GrayImage {
        let mut mask = GrayImage::new(w, h);
        for y in y0..y0 + rh {
            for x in x0..x0 + rw {
                mask.put_pixel(x, y, Luma([255]));
            }
        }
        mask
    }

    #[test]
    fn all_background_mask_extracts_nothing() {
        let mask = GrayImage::new(120, 80);
        assert!(extract(&mask).is_none());
    }

    #[test]
    fn region_below_area_floor_is_ignored() {
        let mask = mask_with_rect(200, 200, 50, 50, 5, 5);
        assert!(extract(&mask).is_none());
    }

    #[test]
    fn filled_rectangle_yields_matching_box() {
        let mask = mask_with_rect(400, 300, 60, 40, 200, 150);
        let extraction = extract(&mask).expect("rectangle should be found");
        let rect = extraction.rect;

        assert!(rect.angle_degrees.abs() < 0.01);
        assert!((rect.width - 200.0).abs() < 3.0);
        assert!((rect.height - 150.0).abs() < 3.0);
        assert!((rect.center.0 - 160.0).abs() < 3.0);
        assert!((rect.center.1 - 115.0).abs() < 3.0);
    }

    #[test]
    fn largest_of_several_regions_wins() {
        let mut mask = mask_with_rect(400, 400, 20, 20, 60, 60);
        for y in 150..350 {
            for x in 150..350 {
                mask.put_pixel(x, y, Luma([255]));
            }
        }
        let extraction = extract(&mask).unwrap();
        assert!((extraction.rect.width - 200.0).abs() < 3.0);
        assert!((extraction.rect.height - 200.0).abs() < 3.0);
    }

    #[test]
    fn polygon_area_of_square_boundary() {
        let square = vec![(0.0, 0.0), (10.0, 0.0), (10.0, 10.0), (0.0, 10.0)];
        assert!((polygon_area(&square) - 100.0).abs() < 1e-9);
        assert_eq!(polygon_area(&[(1.0, 1.0)]), 0.0);
    }
}
