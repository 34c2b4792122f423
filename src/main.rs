//! G-Code generator for interlocked calibration prints, used to find the XY offsets between the tools of a
//! multi-tool printer
use anyhow::{Context, Result};
use gcode::{CalibrationPattern, Config, Generator};
use std::fs::OpenOptions;
use std::io::{BufWriter, Write};
use std::path::PathBuf;
use structopt::StructOpt;

#[derive(Debug, StructOpt)]
#[structopt(
    name = "interlock_gen",
    about = "Generates an interlocked calibration print to measure tool offsets"
)]
struct Opt {
    /// Tool numbers to calibrate, comma separated. A tool may be listed more than once to print it with
    /// several offsets.
    #[structopt(long, use_delimiter = true, default_value = "1,2,3,4,5")]
    tools: Vec<u32>,

    /// Tool that prints the reference combs
    #[structopt(long, default_value = "2")]
    reference_tool: u32,

    /// Extra X offset for each entry of --tools, in mm, comma separated
    #[structopt(long, use_delimiter = true, number_of_values = 1, allow_hyphen_values = true)]
    x_offsets: Vec<f64>,

    /// Extra Y offset for each entry of --tools, in mm, comma separated
    #[structopt(long, use_delimiter = true, number_of_values = 1, allow_hyphen_values = true)]
    y_offsets: Vec<f64>,

    /// Rotation of the whole print, in degrees
    #[structopt(long, allow_hyphen_values = true)]
    rotation: Option<f64>,

    /// Total length of each comb, in mm
    #[structopt(long)]
    length: Option<f64>,

    /// Length of the lines of each comb, in mm
    #[structopt(long)]
    width: Option<f64>,

    /// Printer and pattern settings, as TOML
    #[structopt(short, long, parse(from_os_str))]
    config: Option<PathBuf>,

    /// Output file for the resulting G code
    #[structopt(short, long, parse(from_os_str))]
    output: PathBuf,
}

fn load_config(opt: &Opt) -> Result<Config> {
    let mut config = match &opt.config {
        Some(path) => Config::load(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?,
        None => Config::default(),
    };
    if !opt.x_offsets.is_empty() {
        config.printer.x_offsets = opt.x_offsets.clone();
    }
    if !opt.y_offsets.is_empty() {
        config.printer.y_offsets = opt.y_offsets.clone();
    }
    if let Some(rotation) = opt.rotation {
        config.printer.rotation_deg = rotation;
    }
    if let Some(length) = opt.length {
        config.pattern.length = length;
    }
    if let Some(width) = opt.width {
        config.pattern.width = width;
    }
    Ok(config)
}

fn help_text(pattern: &CalibrationPattern, n_tools: usize) {
    let margin = 2.0 * pattern.params().spacing_to_square;
    let center = pattern.generator().center();
    println!(
        "Before print:
        - Make sure a {:.0} x {:.0}mm frame around ({}, {}) fits on the bed
        - Place a piece of paper on the bed when the print pauses after probing",
        pattern.layout_width(n_tools) + margin,
        pattern.layout_height(n_tools) + margin,
        center.x,
        center.y,
    )
}

fn main() -> Result<()> {
    gcode::init_logging()?;
    let opt = Opt::from_args();
    let config = load_config(&opt)?;

    let gen = Generator::new(config.printer)?;
    let mut pattern = CalibrationPattern::new(config.pattern, gen)?;
    help_text(&pattern, opt.tools.len());

    let mut file = BufWriter::new(
        OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&opt.output)
            .with_context(|| format!("Failed to create {}", opt.output.display()))?,
    );

    pattern.full_interlocked_print(&mut file, &opt.tools, opt.reference_tool)?;
    file.flush()?;

    Ok(())
}
