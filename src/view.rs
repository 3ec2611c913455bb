use crate::geometry::SourceContour;

/// Zoom limits for interactive viewing.
pub const MIN_ZOOM: f64 = 0.05;
pub const MAX_ZOOM: f64 = 10.0;

/// The three nested scales between a full-resolution page and the canvas it
/// is drawn on:
///
/// * `work_scale` — source → work copy, fixed when the page loads, <= 1;
/// * `base_scale` — work → display, fixed to fit the initial viewport;
/// * `zoom` + `pan` — display → canvas, driven live by user gestures.
///
/// The state never touches pixels; it only maps coordinates. Contours live
/// in source space and are re-projected for drawing on every zoom or pan.
#[derive(Debug, Clone, Copy)]
pub struct ViewState {
    work_scale: f64,
    base_scale: f64,
    zoom: f64,
    pan: (f64, f64),
}

impl ViewState {
    /// Fix the scales for a freshly loaded page: `work_scale` comes from the
    /// work-copy builder, `base_scale` shrinks the work copy to fit the
    /// viewport (never enlarging).
    pub fn at_load(source_dims: (u32, u32), work_scale: f64, viewport: (f64, f64)) -> Self {
        let work_w = source_dims.0 as f64 * work_scale;
        let work_h = source_dims.1 as f64 * work_scale;
        let base_scale = if work_w > 0.0 && work_h > 0.0 {
            (viewport.0 / work_w).min(viewport.1 / work_h).min(1.0)
        } else {
            1.0
        };

        Self {
            work_scale,
            base_scale,
            zoom: 1.0,
            pan: (0.0, 0.0),
        }
    }

    pub fn zoom(&self) -> f64 {
        self.zoom
    }

    pub fn pan(&self) -> (f64, f64) {
        self.pan
    }

    pub fn work_scale(&self) -> f64 {
        self.work_scale
    }

    fn total_scale(&self) -> f64 {
        self.work_scale * self.base_scale * self.zoom
    }

    /// Project a source-space point onto the canvas: work scale, display
    /// scale, zoom, then pan.
    pub fn source_to_canvas(&self, p: (f64, f64)) -> (f64, f64) {
        let s = self.total_scale();
        (p.0 * s + self.pan.0, p.1 * s + self.pan.1)
    }

    /// Recover the source-space point under a canvas position: invert pan,
    /// zoom, display scale, and work scale, in that order. Used when the
    /// user clicks to sample a background color.
    pub fn canvas_to_source(&self, p: (f64, f64)) -> (f64, f64) {
        let s = self.total_scale();
        ((p.0 - self.pan.0) / s, (p.1 - self.pan.1) / s)
    }

    /// Translate the view by a canvas-space delta (drag gesture).
    pub fn pan_by(&mut self, dx: f64, dy: f64) {
        self.pan.0 += dx;
        self.pan.1 += dy;
    }

    /// Multiply the zoom by `factor`, anchored at the cursor: the pan is
    /// recomputed so the source point under the cursor stays under it.
    /// Factors that would leave the [`MIN_ZOOM`], [`MAX_ZOOM`] range are
    /// ignored.
    pub fn zoom_about(&mut self, cursor: (f64, f64), factor: f64) {
        let new_zoom = self.zoom * factor;
        if !(MIN_ZOOM..=MAX_ZOOM).contains(&new_zoom) {
            return;
        }

        let rel_x = (cursor.0 - self.pan.0) / self.zoom;
        let rel_y = (cursor.1 - self.pan.1) / self.zoom;

        self.zoom = new_zoom;
        self.pan = (cursor.0 - rel_x * self.zoom, cursor.1 - rel_y * self.zoom);
    }

    /// Project a source-space contour for overlay drawing.
    pub fn contour_to_canvas(&self, contour: &SourceContour) -> Vec<(f64, f64)> {
        contour
            .points
            .iter()
            .map(|&p| self.source_to_canvas(p))
            .collect()
    }

    /// Project four source-space corner points for overlay drawing.
    pub fn quad_to_canvas(&self, corners: [(f64, f64); 4]) -> [(f64, f64); 4] {
        corners.map(|p| self.source_to_canvas(p))
    }
}
