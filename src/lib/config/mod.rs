//! Printer, tool and pattern parameters.
//!
//! Every struct deserializes with `#[serde(default)]`, so a TOML file only needs the keys that differ
//! from the defaults. The defaults describe a five tool Diabase printer with 0.4mm nozzles.

use std::fs::read_to_string;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// A single extruder of the printer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolConfig {
    /// Tool number, as used in `T<n>` and `G10 P<n>`
    pub number: u32,
    /// Diameter of the nozzle opening, in mm
    pub nozzle_diameter: f64,
    /// Standby temperature, in degrees C
    pub standby_temperature: f64,
    /// Printing temperature, in degrees C
    pub printing_temperature: f64,
    pub extrusion_multiplier: f64,
    /// Filament retracted between patterns, in mm
    pub retraction_distance: f64,
}

impl ToolConfig {
    pub fn with_number(number: u32) -> Self {
        ToolConfig {
            number,
            ..Default::default()
        }
    }
}

impl Default for ToolConfig {
    fn default() -> Self {
        ToolConfig {
            number: 1,
            nozzle_diameter: 0.4,
            standby_temperature: 175.0,
            printing_temperature: 200.0,
            extrusion_multiplier: 1.1,
            retraction_distance: 5.0,
        }
    }
}

/// Machine and material settings shared by all tools
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PrinterConfig {
    pub tools: Vec<ToolConfig>,
    /// Retraction speed in mm/s, used by all tools
    pub retraction_speed: f64,
    /// Added to every Z move, to compensate a badly calibrated bed
    pub z_offset: f64,
    /// Pause (M25) after probing the bed, so a piece of paper can be placed on it
    pub insert_pause: bool,
    /// Extra X offset per offset slot, in mm
    pub x_offsets: Vec<f64>,
    /// Extra Y offset per offset slot, in mm
    pub y_offsets: Vec<f64>,
    /// Center of the printed structure, in mm
    pub x_center: f64,
    pub y_center: f64,
    /// Rotation of the whole structure around its center, in degrees
    pub rotation_deg: f64,
    /// Bed temperature, in degrees C
    pub bed_temperature: f64,
    pub layer_height: f64,
    /// Printing speed in mm/s
    pub print_speed: f64,
    pub enable_retraction: bool,
    /// Z lift during a retraction, in mm
    pub z_hop: f64,
    pub filament_diameter: f64,
}

impl Default for PrinterConfig {
    fn default() -> Self {
        PrinterConfig {
            tools: (1..=5).map(ToolConfig::with_number).collect(),
            retraction_speed: 80.0,
            z_offset: 0.15,
            insert_pause: true,
            x_offsets: vec![0.0; 5],
            y_offsets: vec![0.0; 5],
            x_center: 0.0,
            y_center: 0.0,
            rotation_deg: 15.0,
            bed_temperature: 60.0,
            layer_height: 0.2,
            print_speed: 30.0,
            enable_retraction: true,
            z_hop: 0.5,
            filament_diameter: 1.75,
        }
    }
}

impl PrinterConfig {
    pub fn validate(&self) -> Result<()> {
        if self.tools.is_empty() {
            return Err(Error::invalid("tools", "the printer needs at least one tool"));
        }
        for tool in &self.tools {
            positive("nozzle_diameter", tool.nozzle_diameter)?;
            positive("extrusion_multiplier", tool.extrusion_multiplier)?;
            non_negative("retraction_distance", tool.retraction_distance)?;
        }
        positive("filament_diameter", self.filament_diameter)?;
        positive("layer_height", self.layer_height)?;
        positive("print_speed", self.print_speed)?;
        positive("retraction_speed", self.retraction_speed)?;
        non_negative("z_hop", self.z_hop)?;
        finite("z_offset", self.z_offset)?;
        finite("x_center", self.x_center)?;
        finite("y_center", self.y_center)?;
        finite("rotation_deg", self.rotation_deg)?;
        for &offset in &self.x_offsets {
            finite("x_offsets", offset)?;
        }
        for &offset in &self.y_offsets {
            finite("y_offsets", offset)?;
        }
        Ok(())
    }

    /// XY offset of an offset slot. Slots without an entry are not offset.
    pub fn offset(&self, slot: usize) -> (f64, f64) {
        (
            self.x_offsets.get(slot).copied().unwrap_or(0.0),
            self.y_offsets.get(slot).copied().unwrap_or(0.0),
        )
    }
}

/// Dimensions of the calibration patterns, in mm
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PatternConfig {
    /// Length of the lines of a pattern
    pub width: f64,
    /// Spacing between the lines of the simple meander
    pub pitch: f64,
    /// Band at the edge of a pattern where there is only signal or only reference
    pub sigref_only: f64,
    /// Total length of a meander
    pub length: f64,
    /// Number of perimeters of the frame around the structure
    pub square_lines: usize,
    /// Spacing between two patterns of different nozzles
    pub spacing: f64,
    /// Spacing between the patterns and the frame
    pub spacing_to_square: f64,
    /// Distance after which the interlocked structure repeats itself
    pub interlocked_period: f64,
    /// Pitch of the lines in the center of the interlocked structure
    pub interlocked_pitch: f64,
}

impl Default for PatternConfig {
    fn default() -> Self {
        PatternConfig {
            width: 8.0,
            pitch: 1.0,
            sigref_only: 2.0,
            length: 70.0,
            square_lines: 3,
            spacing: 3.0,
            spacing_to_square: 5.0,
            interlocked_period: 4.0,
            interlocked_pitch: 0.75,
        }
    }
}

impl PatternConfig {
    pub fn validate(&self) -> Result<()> {
        positive("pitch", self.pitch)?;
        positive("length", self.length)?;
        positive("interlocked_pitch", self.interlocked_pitch)?;
        non_negative("sigref_only", self.sigref_only)?;
        non_negative("spacing", self.spacing)?;
        non_negative("spacing_to_square", self.spacing_to_square)?;
        finite("width", self.width)?;
        finite("interlocked_period", self.interlocked_period)?;
        if !(self.width > 2.0 * self.pitch) {
            return Err(Error::invalid(
                "width",
                format!("{} must be larger than twice the pitch", self.width),
            ));
        }
        if !(self.width > self.sigref_only) {
            return Err(Error::invalid(
                "width",
                format!("{} must be larger than sigref_only", self.width),
            ));
        }
        if !(self.interlocked_period > 2.0 * self.interlocked_pitch) {
            return Err(Error::invalid(
                "interlocked_period",
                format!(
                    "{} must be larger than twice the interlocked pitch",
                    self.interlocked_period
                ),
            ));
        }
        Ok(())
    }
}

/// Everything needed for a run, as read from a TOML file
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub printer: PrinterConfig,
    pub pattern: PatternConfig,
}

impl Config {
    pub fn from_toml_str(s: &str) -> Result<Self> {
        Ok(toml::from_str(s)?)
    }

    pub fn load(path: &Path) -> Result<Self> {
        Self::from_toml_str(&read_to_string(path)?)
    }

    pub fn validate(&self) -> Result<()> {
        self.printer.validate()?;
        self.pattern.validate()
    }
}

fn finite(name: &'static str, v: f64) -> Result<()> {
    if v.is_finite() {
        Ok(())
    } else {
        Err(Error::invalid(name, format!("{v} must be a finite number")))
    }
}

fn positive(name: &'static str, v: f64) -> Result<()> {
    finite(name, v)?;
    if v > 0.0 {
        Ok(())
    } else {
        Err(Error::invalid(name, format!("{v} must be positive")))
    }
}

fn non_negative(name: &'static str, v: f64) -> Result<()> {
    finite(name, v)?;
    if v >= 0.0 {
        Ok(())
    } else {
        Err(Error::invalid(name, format!("{v} must not be negative")))
    }
}
