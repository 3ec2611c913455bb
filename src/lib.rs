pub mod batch;
pub mod cli;
pub mod contour;
pub mod geometry;
pub mod interactive;
pub mod rectify;
pub mod segment;
pub mod view;

pub use batch::{
    collect_image_files, normalize, process_page, run_batch, BatchOptions, BatchState,
    BatchSummary, PageOutcome,
};
pub use cli::Cli;
pub use contour::{extract, Extraction};
pub use geometry::{min_area_rect, OrientedBox, SourceContour, WorkContour};
pub use interactive::{InteractiveSession, SessionPhase};
pub use rectify::{rectify, FillColor, Rectified};
pub use segment::{segment, work_image, Backing, SegmentParams, ThresholdMode};
pub use view::ViewState;
