use std::fs;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use anyhow::{Context, Result};
use image::imageops::{self, FilterType};
use image::{ImageReader, RgbImage};
use rayon::prelude::*;
use tracing::{debug, info, warn};

use crate::contour::extract;
use crate::geometry::SourceContour;
use crate::rectify::{rectify, FillColor};
use crate::segment::SegmentParams;

/// Shared state of one batch session. The reference size is published by the
/// first page that rectifies to a non-degenerate crop and is read-only for
/// the rest of the session; dropping the state ends the session.
#[derive(Debug, Default)]
pub struct BatchState {
    reference: OnceLock<(u32, u32)>,
}

impl BatchState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reference_size(&self) -> Option<(u32, u32)> {
        self.reference.get().copied()
    }
}

/// Converge a rectified page onto the batch reference size.
///
/// The first call locks the page's own dimensions as the reference; every
/// later page is Lanczos-resampled to match, deliberately ignoring aspect
/// ratio: the contract is that every page of a batch shares one canvas.
pub fn normalize(page: RgbImage, state: &BatchState) -> RgbImage {
    let (w, h) = page.dimensions();
    let &(ref_w, ref_h) = state.reference.get_or_init(|| {
        info!(w, h, "batch reference size locked");
        (w, h)
    });

    if (w, h) == (ref_w, ref_h) {
        page
    } else {
        imageops::resize(&page, ref_w, ref_h, FilterType::Lanczos3)
    }
}

/// Per-page settings of a batch run.
#[derive(Debug, Clone, Copy)]
pub struct BatchOptions {
    pub params: SegmentParams,
    pub fill: FillColor,
}

/// How one page ended up. Only codec failures are reported as errors; every
/// variant here is a page that produced an output file.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PageOutcome {
    /// Rotated, cropped, and normalized; carries the applied angle.
    Rectified { angle_degrees: f64 },
    /// No content region was found; the original page was saved unchanged.
    NoContour,
    /// The crop collapsed to zero area; a placeholder was saved.
    Degenerate,
}

/// Tallies for one batch run.
#[derive(Debug, Default, Clone, Copy)]
pub struct BatchSummary {
    pub rectified: usize,
    pub no_contour: usize,
    pub degenerate: usize,
    pub failed: usize,
}

impl BatchSummary {
    pub fn total(&self) -> usize {
        self.rectified + self.no_contour + self.degenerate + self.failed
    }

    fn record(&mut self, result: &Result<PageOutcome>) {
        match result {
            Ok(PageOutcome::Rectified { .. }) => self.rectified += 1,
            Ok(PageOutcome::NoContour) => self.no_contour += 1,
            Ok(PageOutcome::Degenerate) => self.degenerate += 1,
            Err(_) => self.failed += 1,
        }
    }
}

/// Load, segment, extract, rectify, normalize, and save a single page.
///
/// Unreadable input or unwritable output is fatal for this page only; the
/// caller keeps the batch going. A page with no detectable content is saved
/// unrectified under the same name.
pub fn process_page(
    input: &Path,
    output_dir: &Path,
    opts: &BatchOptions,
    state: &BatchState,
) -> Result<PageOutcome> {
    let page = ImageReader::open(input)
        .with_context(|| format!("failed to open {}", input.display()))?
        .decode()
        .with_context(|| format!("failed to decode {}", input.display()))?
        .to_rgb8();

    let file_name = input
        .file_name()
        .with_context(|| format!("input path {} has no file name", input.display()))?;
    let output_path = output_dir.join(file_name);

    // The batch path is not latency-bound, so segmentation runs at full
    // resolution and no work copy is involved.
    let mask = crate::segment::segment(&page, &opts.params);

    let Some(extraction) = extract(&mask) else {
        debug!(path = %input.display(), "no content region; saving unchanged");
        page.save(&output_path)
            .with_context(|| format!("failed to save {}", output_path.display()))?;
        return Ok(PageOutcome::NoContour);
    };

    let angle = extraction.rect.angle_degrees;
    let contour = SourceContour {
        points: extraction.points,
    };

    let rectified = rectify(&page, &contour, angle, opts.fill);
    if rectified.is_degenerate() {
        warn!(path = %input.display(), "degenerate crop; saving placeholder");
        rectified
            .into_image()
            .save(&output_path)
            .with_context(|| format!("failed to save {}", output_path.display()))?;
        return Ok(PageOutcome::Degenerate);
    }

    let final_page = normalize(rectified.into_image(), state);
    final_page
        .save(&output_path)
        .with_context(|| format!("failed to save {}", output_path.display()))?;

    info!(
        path = %input.display(),
        angle,
        width = final_page.width(),
        height = final_page.height(),
        "page saved"
    );
    Ok(PageOutcome::Rectified {
        angle_degrees: angle,
    })
}

/// Run one batch session over an ordered file list.
///
/// Pages run sequentially until the reference size has been published, then
/// the remainder run in parallel; the reference cell is written exactly once,
/// so parallel pages only ever read it.
pub fn run_batch(files: &[PathBuf], output_dir: &Path, opts: &BatchOptions) -> Result<BatchSummary> {
    fs::create_dir_all(output_dir)
        .with_context(|| format!("failed to create {}", output_dir.display()))?;

    let state = BatchState::new();
    let mut summary = BatchSummary::default();
    let mut next = 0;

    while next < files.len() && state.reference_size().is_none() {
        let result = process_page(&files[next], output_dir, opts, &state);
        if let Err(err) = &result {
            warn!(path = %files[next].display(), error = %err, "page failed");
        }
        summary.record(&result);
        next += 1;
    }

    let results: Vec<(usize, Result<PageOutcome>)> = files[next..]
        .par_iter()
        .enumerate()
        .map(|(i, path)| (next + i, process_page(path, output_dir, opts, &state)))
        .collect();

    for (index, result) in &results {
        if let Err(err) = result {
            warn!(path = %files[*index].display(), error = %err, "page failed");
        }
        summary.record(result);
    }

    Ok(summary)
}

/// Collect the raster files of a directory in filename order. Extensions are
/// matched case-insensitively; everything else (including subdirectories) is
/// ignored. Non-ASCII filenames pass through untouched.
pub fn collect_image_files(input_dir: &Path) -> Result<Vec<PathBuf>> {
    const EXTENSIONS: [&str; 6] = ["png", "jpg", "jpeg", "bmp", "tif", "tiff"];

    let mut files: Vec<PathBuf> = fs::read_dir(input_dir)
        .with_context(|| format!("failed to read {}", input_dir.display()))?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| {
            path.is_file()
                && path
                    .extension()
                    .and_then(|ext| ext.to_str())
                    .map(|ext| EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
                    .unwrap_or(false)
        })
        .collect();

    files.sort();
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::segment::{Backing, ThresholdMode};
    use image::Rgb;

    fn options() -> BatchOptions {
        BatchOptions {
            params: SegmentParams::Automatic {
                mode: ThresholdMode::Fixed(128),
                backing: Backing::Dark,
            },
            fill: FillColor::White,
        }
    }

    fn write_page(dir: &Path, name: &str, size: (u32, u32), content: (u32, u32)) -> PathBuf {
        let (w, h) = size;
        let (cw, ch) = content;
        let mut page = RgbImage::from_pixel(w, h, Rgb([0, 0, 0]));
        let x0 = (w - cw) / 2;
        let y0 = (h - ch) / 2;
        for y in y0..y0 + ch {
            for x in x0..x0 + cw {
                page.put_pixel(x, y, Rgb([255, 255, 255]));
            }
        }
        let path = dir.join(name);
        page.save(&path).unwrap();
        path
    }

    #[test]
    fn normalize_locks_first_size_and_resamples_later_pages() {
        let state = BatchState::new();
        assert!(state.reference_size().is_none());

        let first = normalize(RgbImage::new(300, 400), &state);
        assert_eq!(first.dimensions(), (300, 400));
        assert_eq!(state.reference_size(), Some((300, 400)));

        let second = normalize(RgbImage::new(150, 500), &state);
        assert_eq!(second.dimensions(), (300, 400));
        assert_eq!(state.reference_size(), Some((300, 400)));
    }

    #[test]
    fn batch_outputs_converge_to_one_size() {
        let input = tempfile::tempdir().unwrap();
        let output = tempfile::tempdir().unwrap();

        write_page(input.path(), "a.png", (400, 500), (200, 300));
        write_page(input.path(), "b.png", (500, 400), (300, 180));
        write_page(input.path(), "c.png", (350, 350), (120, 260));

        let files = collect_image_files(input.path()).unwrap();
        assert_eq!(files.len(), 3);

        let summary = run_batch(&files, output.path(), &options()).unwrap();
        assert_eq!(summary.rectified, 3);
        assert_eq!(summary.failed, 0);

        let first = image::open(output.path().join("a.png")).unwrap();
        let dims = (first.width(), first.height());
        assert!((dims.0 as i64 - 200).abs() <= 3);
        assert!((dims.1 as i64 - 300).abs() <= 3);

        for name in ["b.png", "c.png"] {
            let page = image::open(output.path().join(name)).unwrap();
            assert_eq!((page.width(), page.height()), dims, "{}", name);
        }
    }

    #[test]
    fn unreadable_page_fails_alone_without_stopping_the_batch() {
        let input = tempfile::tempdir().unwrap();
        let output = tempfile::tempdir().unwrap();

        write_page(input.path(), "a.png", (400, 500), (200, 300));
        fs::write(input.path().join("b.png"), b"not an image").unwrap();
        write_page(input.path(), "c.png", (400, 500), (220, 280));

        let files = collect_image_files(input.path()).unwrap();
        let summary = run_batch(&files, output.path(), &options()).unwrap();

        assert_eq!(summary.rectified, 2);
        assert_eq!(summary.failed, 1);
        assert!(output.path().join("a.png").exists());
        assert!(!output.path().join("b.png").exists());
        assert!(output.path().join("c.png").exists());
    }

    #[test]
    fn page_without_content_is_saved_unchanged() {
        let input = tempfile::tempdir().unwrap();
        let output = tempfile::tempdir().unwrap();

        let path = input.path().join("blank.png");
        RgbImage::from_pixel(200, 250, Rgb([0, 0, 0]))
            .save(&path)
            .unwrap();

        let summary = run_batch(&[path], output.path(), &options()).unwrap();
        assert_eq!(summary.no_contour, 1);

        let saved = image::open(output.path().join("blank.png")).unwrap();
        assert_eq!((saved.width(), saved.height()), (200, 250));
    }

    #[test]
    fn collect_image_files_filters_and_sorts() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("b.PNG"), b"x").unwrap();
        fs::write(dir.path().join("a.jpg"), b"x").unwrap();
        fs::write(dir.path().join("notes.txt"), b"x").unwrap();
        fs::write(dir.path().join("扉絵.png"), b"x").unwrap();

        let files = collect_image_files(dir.path()).unwrap();
        let names: Vec<_> = files
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["a.jpg", "b.PNG", "扉絵.png"]);
    }
}
