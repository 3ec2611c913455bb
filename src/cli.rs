use clap::Parser;
use std::path::PathBuf;

use crate::rectify::FillColor;
use crate::segment::{Backing, ThresholdMode};

#[derive(Parser, Debug)]
#[command(name = "true-page")]
#[command(version, about = "Straighten and crop scanned pages to a common size")]
pub struct Cli {
    /// Directory of scanned pages to process
    #[arg(required = true)]
    pub input_dir: PathBuf,

    /// Output directory [default: <input_dir>/rectified]
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Brightness cut: "auto" (Otsu) or a fixed value 0-255
    #[arg(short, long, default_value = "auto", value_parser = parse_threshold)]
    pub threshold: ThresholdMode,

    /// Scanner backing the pages were scanned against
    #[arg(short, long, default_value = "dark", value_parser = parse_backing)]
    pub backing: Backing,

    /// Color for areas the rotation exposes outside the original frame
    #[arg(short, long, default_value = "white", value_parser = parse_fill)]
    pub fill: FillColor,

    /// Show detection details
    #[arg(long)]
    pub verbose: bool,
}

impl Cli {
    pub fn output_dir(&self) -> PathBuf {
        self.output
            .clone()
            .unwrap_or_else(|| self.input_dir.join("rectified"))
    }
}

fn parse_threshold(s: &str) -> Result<ThresholdMode, String> {
    if s.eq_ignore_ascii_case("auto") {
        return Ok(ThresholdMode::Auto);
    }
    s.parse::<u8>()
        .map(ThresholdMode::Fixed)
        .map_err(|_| format!("Invalid threshold '{}', expected \"auto\" or 0-255", s))
}

fn parse_backing(s: &str) -> Result<Backing, String> {
    match s.to_ascii_lowercase().as_str() {
        "dark" => Ok(Backing::Dark),
        "light" => Ok(Backing::Light),
        _ => Err(format!("Invalid backing '{}', expected dark or light", s)),
    }
}

fn parse_fill(s: &str) -> Result<FillColor, String> {
    match s.to_ascii_lowercase().as_str() {
        "white" => Ok(FillColor::White),
        "black" => Ok(FillColor::Black),
        _ => Err(format!("Invalid fill '{}', expected white or black", s)),
    }
}
