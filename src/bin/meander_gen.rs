//! G-Code generator for a single printed meander, e.g. to measure the resistance of a printed conductor
use anyhow::{Context, Result};
use gcode::{CalibrationPattern, Config, Generator};
use std::fs::OpenOptions;
use std::io::{BufWriter, Write};
use std::path::PathBuf;
use structopt::StructOpt;

#[derive(Debug, StructOpt)]
#[structopt(name = "meander_gen", about = "Generates a single meandering track")]
struct Opt {
    /// Tool number to print with
    #[structopt(long, default_value = "1")]
    tool: u32,

    /// Length of the lines of the meander, in mm [default without --config: 40]
    #[structopt(long)]
    width: Option<f64>,

    /// Total length of the meander, in mm [default without --config: 10]
    #[structopt(long)]
    length: Option<f64>,

    /// Spacing between the lines of the meander, in mm
    #[structopt(long)]
    pitch: Option<f64>,

    /// Rotation of the print, in degrees [default without --config: 0]
    #[structopt(long, allow_hyphen_values = true)]
    rotation: Option<f64>,

    /// Printer and pattern settings, as TOML. Flags given above take precedence over the file.
    #[structopt(short, long, parse(from_os_str))]
    config: Option<PathBuf>,

    /// Output file for the resulting G code
    #[structopt(short, long, parse(from_os_str))]
    output: PathBuf,
}

fn help_text(pattern: &CalibrationPattern) {
    println!(
        "Before print:
        - Meander of {} periods, {}mm long
        - Prime line starts 10mm below it",
        pattern.repetitions(),
        pattern.effective_length()
    )
}

/// Settings used when no config file is given: a flat 40 x 10mm meander
fn meander_defaults() -> Config {
    let mut config = Config::default();
    config.printer.rotation_deg = 0.0;
    config.pattern.width = 40.0;
    config.pattern.length = 10.0;
    config
}

fn apply_flags(opt: &Opt, config: &mut Config) {
    if let Some(rotation) = opt.rotation {
        config.printer.rotation_deg = rotation;
    }
    if let Some(width) = opt.width {
        config.pattern.width = width;
    }
    if let Some(length) = opt.length {
        config.pattern.length = length;
    }
    if let Some(pitch) = opt.pitch {
        config.pattern.pitch = pitch;
    }
}

fn load_config(opt: &Opt) -> Result<Config> {
    let mut config = match &opt.config {
        Some(path) => Config::load(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?,
        None => meander_defaults(),
    };
    apply_flags(opt, &mut config);
    Ok(config)
}

fn main() -> Result<()> {
    gcode::init_logging()?;
    let opt = Opt::from_args();
    let config = load_config(&opt)?;

    let gen = Generator::new(config.printer)?;
    let mut pattern = CalibrationPattern::new(config.pattern, gen)?;
    help_text(&pattern);

    let mut file = BufWriter::new(
        OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&opt.output)
            .with_context(|| format!("Failed to create {}", opt.output.display()))?,
    );

    pattern.meander_print(&mut file, opt.tool)?;
    file.flush()?;

    Ok(())
}
