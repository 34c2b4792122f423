use std::io::{Result, Write};

pub mod config;
pub mod error;
pub mod generator;
mod geometry;
pub mod patterns;

pub use config::{Config, PatternConfig, PrinterConfig, ToolConfig};
pub use error::Error;
pub use generator::{Generator, PathStats};
pub use geometry::Turn;
pub use patterns::{Axis, CalibrationPattern, Direction};

/// Decimals used for X, Y, Z, I and J words
const AXIS_DECIMALS: usize = 3;
/// Decimals used for E words
const EXTRUDE_DECIMALS: usize = 4;
/// Feed rates are whole mm/min
const FEED_DECIMALS: usize = 0;

pub fn gcode_comment(file: &mut dyn Write, s: &str) -> Result<()> {
    writeln!(file, ";{s}")
}

/// Install a fmt subscriber for `tracing`, honouring `RUST_LOG` and defaulting to `info`.
pub fn init_logging() -> anyhow::Result<()> {
    use tracing_subscriber::fmt;
    use tracing_subscriber::prelude::*;
    use tracing_subscriber::EnvFilter;

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .try_init()?;

    Ok(())
}

trait AsGVals {
    fn as_gvals(&self, file: &mut dyn Write) -> Result<()>;
}

#[derive(Clone, Debug, Default)]
pub struct PosAndExtrude {
    x: Option<f64>,
    y: Option<f64>,
    z: Option<f64>,
    e: Option<f64>,
    feed: Option<f64>,
}

pub fn xy(x: f64, y: f64) -> PosAndExtrude {
    PosAndExtrude {
        x: Some(x),
        y: Some(y),
        ..Default::default()
    }
}

pub fn xyf(x: f64, y: f64, feed: f64) -> PosAndExtrude {
    PosAndExtrude {
        x: Some(x),
        y: Some(y),
        feed: Some(feed),
        ..Default::default()
    }
}

pub fn xyef(x: f64, y: f64, e: f64, feed: f64) -> PosAndExtrude {
    PosAndExtrude {
        x: Some(x),
        y: Some(y),
        e: Some(e),
        feed: Some(feed),
        ..Default::default()
    }
}

pub fn ef(e: f64, feed: f64) -> PosAndExtrude {
    PosAndExtrude {
        e: Some(e),
        feed: Some(feed),
        ..Default::default()
    }
}

pub fn z(z: f64) -> PosAndExtrude {
    PosAndExtrude {
        z: Some(z),
        ..Default::default()
    }
}

pub fn zef(z: f64, e: f64, feed: f64) -> PosAndExtrude {
    PosAndExtrude {
        z: Some(z),
        e: Some(e),
        feed: Some(feed),
        ..Default::default()
    }
}

impl AsGVals for PosAndExtrude {
    fn as_gvals(&self, file: &mut dyn Write) -> Result<()> {
        if self.x.is_none() && self.y.is_none() && self.z.is_none() && self.e.is_none() {
            panic!("Refusing to make empty move");
        }
        g_val(file, "X", self.x, AXIS_DECIMALS)?;
        g_val(file, "Y", self.y, AXIS_DECIMALS)?;
        g_val(file, "Z", self.z, AXIS_DECIMALS)?;
        g_val(file, "E", self.e, EXTRUDE_DECIMALS)?;
        g_val(file, "F", self.feed, FEED_DECIMALS)?;
        Ok(())
    }
}

pub struct PosXYIJ {
    x: Option<f64>,
    y: Option<f64>,
    i: Option<f64>,
    j: Option<f64>,
    e: Option<f64>,
    feed: Option<f64>,
}

pub fn xyijef(x: f64, y: f64, i: f64, j: f64, e: f64, feed: f64) -> PosXYIJ {
    PosXYIJ {
        x: Some(x),
        y: Some(y),
        i: Some(i),
        j: Some(j),
        e: Some(e),
        feed: Some(feed),
    }
}

impl AsGVals for PosXYIJ {
    fn as_gvals(&self, file: &mut dyn Write) -> Result<()> {
        g_val(file, "X", self.x, AXIS_DECIMALS)?;
        g_val(file, "Y", self.y, AXIS_DECIMALS)?;
        g_val(file, "I", self.i, AXIS_DECIMALS)?;
        g_val(file, "J", self.j, AXIS_DECIMALS)?;
        g_val(file, "E", self.e, EXTRUDE_DECIMALS)?;
        g_val(file, "F", self.feed, FEED_DECIMALS)?;
        Ok(())
    }
}

/// Emit a gcode parameter value, if `ov` is `Some`, with a fixed number of decimals.
/// Values that round to zero are printed unsigned, so we never emit `X-0.000`.
fn g_val(file: &mut dyn Write, name: &str, ov: Option<f64>, decimals: usize) -> Result<()> {
    if let Some(v) = ov {
        let half_ulp = 0.5 * 10f64.powi(-(decimals as i32));
        let v = if v.abs() < half_ulp { 0.0 } else { v };
        write!(file, " {name}{v:.decimals$}")
    } else {
        Ok(())
    }
}

fn g_move(file: &mut dyn Write, g: &str, p: &dyn AsGVals) -> Result<()> {
    write!(file, "{g}")?;
    p.as_gvals(file)?;
    writeln!(file)?;
    Ok(())
}

/// Linear move. On a printer every move is G1: travel moves simply carry no E word.
pub fn g1(file: &mut dyn Write, p: PosAndExtrude) -> Result<()> {
    g_move(file, "G1", &p)
}

/// G2 clockwise arc move
/// X, Y is endpoint, I, J is offset from start point to true arc center
pub fn g2(file: &mut dyn Write, p: PosXYIJ) -> Result<()> {
    if p.x.is_none() || p.y.is_none() || p.i.is_none() || p.j.is_none() || p.feed.is_none() {
        panic!("Refusing to make illegal G2 move");
    }
    g_move(file, "G2", &p)
}

/// G3 counter-clockwise arc move
/// X, Y is endpoint, I, J is offset from start point to true arc center
pub fn g3(file: &mut dyn Write, p: PosXYIJ) -> Result<()> {
    if p.x.is_none() || p.y.is_none() || p.i.is_none() || p.j.is_none() || p.feed.is_none() {
        panic!("Refusing to make illegal G3 move");
    }
    g_move(file, "G3", &p)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn emit(f: impl FnOnce(&mut dyn Write) -> Result<()>) -> String {
        let mut buf: Vec<u8> = Vec::new();
        f(&mut buf).unwrap();
        String::from_utf8(buf).unwrap()
    }

    #[test]
    fn test_g1_words_and_precision() {
        let out = emit(|f| g1(f, xyef(1.0, -2.5, 0.123456, 1800.0)));
        assert_eq!(out, "G1 X1.000 Y-2.500 E0.1235 F1800\n");
    }

    #[test]
    fn test_travel_has_no_extrusion() {
        let out = emit(|f| g1(f, xy(3.0, 4.0)));
        assert_eq!(out, "G1 X3.000 Y4.000\n");
    }

    #[test]
    fn test_negative_zero_is_unsigned() {
        let out = emit(|f| g1(f, xy(-0.0001, 0.0)));
        assert_eq!(out, "G1 X0.000 Y0.000\n");
    }

    #[test]
    fn test_arc_words() {
        let out = emit(|f| g3(f, xyijef(1.0, 1.0, 0.0, 1.0, 0.05, 1800.0)));
        assert_eq!(out, "G3 X1.000 Y1.000 I0.000 J1.000 E0.0500 F1800\n");
    }

    #[test]
    fn test_comment() {
        let out = emit(|f| gcode_comment(f, "hello"));
        assert_eq!(out, ";hello\n");
    }

    #[test]
    #[should_panic]
    fn test_empty_move_panics() {
        emit(|f| g1(f, PosAndExtrude::default()));
    }
}
