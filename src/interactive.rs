use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use image::{ImageReader, Rgb, RgbImage};
use tracing::{debug, info, warn};

use crate::batch::{normalize, BatchState};
use crate::contour::extract;
use crate::geometry::{OrientedBox, SourceContour, WorkContour};
use crate::rectify::{rectify, FillColor};
use crate::segment::{segment, work_image, SegmentParams};
use crate::view::ViewState;

/// Default channel tolerance for background sampling.
pub const DEFAULT_TOLERANCE: u8 = 30;

/// Where a session currently stands. Every user event is valid in every
/// phase; events that do not apply are ignored rather than rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    /// A page is loaded and waiting for a background sample.
    AwaitingSample,
    /// A sample produced a detection; the overlay is showing and the page
    /// can be confirmed.
    PreviewReady,
    /// All pages have been confirmed or skipped.
    Finished,
}

/// One page-by-page review session.
///
/// The session owns the file list, the batch reference state, and the
/// per-page working set: the full-resolution page, its capped work copy, the
/// current view mapping, and the latest detection. A front end drives it
/// through [`on_sample`](Self::on_sample),
/// [`on_tolerance_change`](Self::on_tolerance_change),
/// [`on_confirm`](Self::on_confirm) and [`on_skip`](Self::on_skip), and reads
/// back [`overlay_quad`](Self::overlay_quad) to draw the detection.
///
/// Detection runs on the work copy for interactive latency; the confirmed
/// rectification always runs on the full-resolution source.
pub struct InteractiveSession {
    files: Vec<PathBuf>,
    output_dir: PathBuf,
    viewport: (f64, f64),
    fill: FillColor,
    index: usize,
    phase: SessionPhase,
    state: BatchState,
    tolerance: u8,
    sampled: Option<Rgb<u8>>,
    source: Option<RgbImage>,
    work: Option<(RgbImage, f64)>,
    view: Option<ViewState>,
    detection: Option<(SourceContour, OrientedBox)>,
}

impl InteractiveSession {
    /// Open a session over an ordered file list and load the first page.
    pub fn new(
        files: Vec<PathBuf>,
        output_dir: PathBuf,
        fill: FillColor,
        viewport: (f64, f64),
    ) -> Result<Self> {
        let mut session = Self {
            files,
            output_dir,
            viewport,
            fill,
            index: 0,
            phase: SessionPhase::Finished,
            state: BatchState::new(),
            tolerance: DEFAULT_TOLERANCE,
            sampled: None,
            source: None,
            work: None,
            view: None,
            detection: None,
        };
        if session.files.is_empty() {
            return Ok(session);
        }
        session.load_current()?;
        Ok(session)
    }

    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    pub fn tolerance(&self) -> u8 {
        self.tolerance
    }

    pub fn sampled_color(&self) -> Option<Rgb<u8>> {
        self.sampled
    }

    pub fn reference_size(&self) -> Option<(u32, u32)> {
        self.state.reference_size()
    }

    /// Path of the page currently under review.
    pub fn current_file(&self) -> Option<&Path> {
        if self.phase == SessionPhase::Finished {
            None
        } else {
            self.files.get(self.index).map(PathBuf::as_path)
        }
    }

    pub fn view(&self) -> Option<&ViewState> {
        self.view.as_ref()
    }

    /// Mutable view access for zoom and pan gestures. Changing the view never
    /// invalidates a detection; the overlay is simply re-projected.
    pub fn view_mut(&mut self) -> Option<&mut ViewState> {
        self.view.as_mut()
    }

    /// The detected box's corners in canvas coordinates, for overlay drawing.
    pub fn overlay_quad(&self) -> Option<[(f64, f64); 4]> {
        let (_, rect) = self.detection.as_ref()?;
        let view = self.view.as_ref()?;
        Some(view.quad_to_canvas(rect.corners()))
    }

    /// The user clicked the canvas to sample the background color. Clicks
    /// that land outside the page are ignored.
    pub fn on_sample(&mut self, canvas_point: (f64, f64)) {
        let (Some(view), Some(source)) = (self.view.as_ref(), self.source.as_ref()) else {
            return;
        };

        let (sx, sy) = view.canvas_to_source(canvas_point);
        let (w, h) = source.dimensions();
        if sx < 0.0 || sy < 0.0 || sx >= w as f64 || sy >= h as f64 {
            debug!(sx, sy, "sample click outside the page");
            return;
        }

        let color = *source.get_pixel(sx as u32, sy as u32);
        debug!(r = color[0], g = color[1], b = color[2], "background sampled");
        self.sampled = Some(color);
        self.refresh_detection();
    }

    /// The tolerance slider moved. Re-detects immediately when a sample
    /// color is already set.
    pub fn on_tolerance_change(&mut self, value: u8) {
        self.tolerance = value;
        if self.sampled.is_some() {
            self.refresh_detection();
        }
    }

    /// Confirm the current detection: rectify the full-resolution page,
    /// converge it onto the batch reference size, save it, and advance.
    ///
    /// Returns `false` (and stays on the page) when there is nothing to
    /// confirm yet.
    pub fn on_confirm(&mut self) -> Result<bool> {
        let Some((contour, rect)) = self.detection.take() else {
            return Ok(false);
        };
        let Some(source) = self.source.as_ref() else {
            return Ok(false);
        };
        let Some(input) = self.files.get(self.index) else {
            return Ok(false);
        };

        let file_name = input
            .file_name()
            .with_context(|| format!("input path {} has no file name", input.display()))?;
        let output_path = self.output_dir.join(file_name);

        let rectified = rectify(source, &contour, rect.angle_degrees, self.fill);
        if rectified.is_degenerate() {
            warn!(path = %input.display(), "degenerate crop; saving placeholder");
            rectified
                .into_image()
                .save(&output_path)
                .with_context(|| format!("failed to save {}", output_path.display()))?;
        } else {
            let page = normalize(rectified.into_image(), &self.state);
            page.save(&output_path)
                .with_context(|| format!("failed to save {}", output_path.display()))?;
            info!(
                path = %input.display(),
                angle = rect.angle_degrees,
                width = page.width(),
                height = page.height(),
                "page confirmed"
            );
        }

        self.advance()?;
        Ok(true)
    }

    /// Skip the current page without writing any output.
    pub fn on_skip(&mut self) -> Result<()> {
        if self.phase == SessionPhase::Finished {
            return Ok(());
        }
        if let Some(input) = self.files.get(self.index) {
            info!(path = %input.display(), "page skipped");
        }
        self.advance()
    }

    /// Re-run detection on the work copy with the current sample color and
    /// tolerance, lifting the result into source space.
    fn refresh_detection(&mut self) {
        self.detection = None;
        self.phase = SessionPhase::AwaitingSample;

        let (Some(reference), Some((work, scale))) = (self.sampled, self.work.as_ref()) else {
            return;
        };

        let params = SegmentParams::ColorTolerance {
            reference,
            tolerance: self.tolerance,
        };
        let mask = segment(work, &params);
        let Some(extraction) = extract(&mask) else {
            debug!(tolerance = self.tolerance, "no content region for sample");
            return;
        };

        let contour = WorkContour {
            points: extraction.points,
            scale: *scale,
        }
        .to_source();
        let rect = extraction.rect.to_source(*scale);

        self.detection = Some((contour, rect));
        self.phase = SessionPhase::PreviewReady;
    }

    fn advance(&mut self) -> Result<()> {
        self.index += 1;
        if self.index >= self.files.len() {
            self.phase = SessionPhase::Finished;
            self.source = None;
            self.work = None;
            self.view = None;
            self.sampled = None;
            self.detection = None;
            info!("all pages reviewed");
            return Ok(());
        }
        self.load_current()
    }

    fn load_current(&mut self) -> Result<()> {
        let path = &self.files[self.index];
        let source = ImageReader::open(path)
            .with_context(|| format!("failed to open {}", path.display()))?
            .decode()
            .with_context(|| format!("failed to decode {}", path.display()))?
            .to_rgb8();

        let (work, scale) = work_image(&source);
        let view = ViewState::at_load(source.dimensions(), scale, self.viewport);

        debug!(
            path = %path.display(),
            width = source.width(),
            height = source.height(),
            scale,
            "page loaded"
        );

        self.source = Some(source);
        self.work = Some((work, scale));
        self.view = Some(view);
        self.sampled = None;
        self.detection = None;
        self.phase = SessionPhase::AwaitingSample;
        Ok(())
    }
}
