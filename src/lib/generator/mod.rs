//! Move, extrude and tool primitives for a multi-tool FFF printer.
//!
//! The [`Generator`] works in pattern coordinates and keeps track of the current position. Every absolute
//! position it emits gets the XY offset of the selected offset slot, and is then rotated around the center of
//! the print, so patterns can be laid out on a straight grid.

use std::f64::consts::PI;
use std::io::Write;

use nalgebra::{Point2, Vector2};
use tracing::debug;

use crate::config::{PrinterConfig, ToolConfig};
use crate::error::{Error, Result};
use crate::geometry::{
    quarter_turn_center, quarter_turn_length, u_turn_center, u_turn_length, Frame, Turn,
};
use crate::{ef, g1, g2, g3, xy, xyef, xyf, xyijef, z, zef};

/// Running totals of what has been emitted
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PathStats {
    /// Straight printed lines
    pub lines: usize,
    /// Printed arcs
    pub arcs: usize,
    /// Non-printing moves
    pub travels: usize,
    /// Filament pushed by lines, arcs and priming, in mm. Retractions cancel out and aren't counted.
    pub filament: f64,
}

pub struct Generator {
    printer: PrinterConfig,
    frame: Frame,
    position: Point2<f64>,
    active_tool: Option<usize>,
    offset_slot: usize,
    stats: PathStats,
}

impl Generator {
    pub fn new(printer: PrinterConfig) -> Result<Generator> {
        printer.validate()?;
        let frame = Frame::new(
            Point2::new(printer.x_center, printer.y_center),
            printer.rotation_deg.to_radians(),
        );
        Ok(Generator {
            printer,
            frame,
            position: Point2::origin(),
            active_tool: None,
            offset_slot: 0,
            stats: PathStats::default(),
        })
    }

    pub fn printer(&self) -> &PrinterConfig {
        &self.printer
    }

    /// Center of the print, in pattern coordinates
    pub fn center(&self) -> Point2<f64> {
        self.frame.center
    }

    /// Rotation of the print, in radians
    pub fn rotation(&self) -> f64 {
        self.frame.angle()
    }

    /// Current position, in pattern coordinates (before offsets and rotation)
    pub fn position(&self) -> Point2<f64> {
        self.position
    }

    pub fn active_tool(&self) -> Option<usize> {
        self.active_tool
    }

    pub fn stats(&self) -> PathStats {
        self.stats
    }

    /// Select which entry of the printer's offset lists is added to every position
    pub fn set_offset_slot(&mut self, slot: usize) {
        self.offset_slot = slot;
    }

    pub fn offset_slot(&self) -> usize {
        self.offset_slot
    }

    fn tool(&self, index: usize) -> Result<&ToolConfig> {
        self.printer.tools.get(index).ok_or_else(|| {
            Error::invalid(
                "tool_index",
                format!("{index} but the printer has {} tools", self.printer.tools.len()),
            )
        })
    }

    fn active(&self) -> Result<&ToolConfig> {
        let index = self.active_tool.ok_or(Error::NoActiveTool)?;
        self.tool(index)
    }

    pub fn nozzle_diameter(&self) -> Result<f64> {
        Ok(self.active()?.nozzle_diameter)
    }

    fn print_feed(&self) -> f64 {
        self.printer.print_speed * 60.0
    }

    fn filament_area(&self) -> f64 {
        PI * self.printer.filament_diameter * self.printer.filament_diameter / 4.0
    }

    /// Length of filament to push to get `volume` mm³ out of the nozzle
    pub fn extrusion_volume_to_length(&self, volume: f64) -> f64 {
        volume / self.filament_area()
    }

    /// Volume out of the nozzle when pushing `length` mm of filament
    pub fn extrusion_length_to_volume(&self, length: f64) -> f64 {
        length * self.filament_area()
    }

    /// Filament needed to print a line of `line_length` mm with the active tool. The line is modelled as a
    /// rectangular bead, one nozzle diameter wide and one layer high.
    pub fn extrusion_for_length(&self, line_length: f64) -> Result<f64> {
        let tool = self.active()?;
        let volume = line_length
            * tool.nozzle_diameter
            * self.printer.layer_height
            * tool.extrusion_multiplier;
        Ok(self.extrusion_volume_to_length(volume))
    }

    /// Length of line the active tool prints with `filament` mm of filament
    pub fn line_length_for_extrusion(&self, filament: f64) -> Result<f64> {
        let tool = self.active()?;
        let bead = tool.nozzle_diameter * self.printer.layer_height * tool.extrusion_multiplier;
        Ok(self.extrusion_length_to_volume(filament) / bead)
    }

    /// Rotate a coordinate around the center of the print
    pub fn rotate(&self, p: Point2<f64>) -> Point2<f64> {
        self.frame.rotate(p)
    }

    /// Rotate a relative vector around (0, 0)
    pub fn rotate_around_origin(&self, v: Vector2<f64>) -> Vector2<f64> {
        self.frame.rotate_vector(v)
    }

    /// The current position as the machine sees it: offset, then rotated
    fn machine_position(&self) -> Point2<f64> {
        let (dx, dy) = self.printer.offset(self.offset_slot);
        self.frame.rotate(self.position + Vector2::new(dx, dy))
    }

    /// Travel to an absolute position
    pub fn move_to(&mut self, file: &mut dyn Write, x: f64, y: f64) -> Result<()> {
        self.position = Point2::new(x, y);
        let p = self.machine_position();
        g1(file, xyf(p.x, p.y, self.print_feed()))?;
        self.stats.travels += 1;
        Ok(())
    }

    /// Travel a distance in x and y, at whatever feed is current
    pub fn move_by(&mut self, file: &mut dyn Write, x: f64, y: f64) -> Result<()> {
        self.position += Vector2::new(x, y);
        let p = self.machine_position();
        g1(file, xy(p.x, p.y))?;
        self.stats.travels += 1;
        Ok(())
    }

    /// Print a straight line a distance in x and y from the current position
    pub fn line(&mut self, file: &mut dyn Write, x: f64, y: f64) -> Result<()> {
        let step = Vector2::new(x, y);
        let e = self.extrusion_for_length(step.norm())?;
        self.position += step;
        let p = self.machine_position();
        g1(file, xyef(p.x, p.y, e, self.print_feed()))?;
        self.stats.lines += 1;
        self.stats.filament += e;
        Ok(())
    }

    /// Push `amount` mm of filament without moving, e.g. to prime the nozzle
    pub fn extrude(&mut self, file: &mut dyn Write, amount: f64) -> Result<()> {
        g1(file, ef(amount, self.print_feed()))?;
        self.stats.filament += amount;
        Ok(())
    }

    /// Print a quarter circle from the current position to a point a distance x and y away
    pub fn quarter_turn(&mut self, file: &mut dyn Write, x: f64, y: f64, turn: Turn) -> Result<()> {
        let chord = Vector2::new(x, y);
        let e = self.extrusion_for_length(quarter_turn_length(chord))?;
        let center = self.frame.rotate_vector(quarter_turn_center(chord, turn));
        self.position += chord;
        self.arc(file, center, e, turn)
    }

    /// Print a half circle from the current position to a point a distance x and y away
    pub fn u_turn(&mut self, file: &mut dyn Write, x: f64, y: f64, turn: Turn) -> Result<()> {
        let chord = Vector2::new(x, y);
        let e = self.extrusion_for_length(u_turn_length(chord))?;
        let center = self.frame.rotate_vector(u_turn_center(chord));
        self.position += chord;
        self.arc(file, center, e, turn)
    }

    /// Emit an arc ending at the current position. `center` is relative to the start of the arc, in machine
    /// orientation.
    fn arc(&mut self, file: &mut dyn Write, center: Vector2<f64>, e: f64, turn: Turn) -> Result<()> {
        let p = self.machine_position();
        let words = xyijef(p.x, p.y, center.x, center.y, e, self.print_feed());
        match turn {
            Turn::Clockwise => g2(file, words)?,
            Turn::CounterClockwise => g3(file, words)?,
        }
        self.stats.arcs += 1;
        self.stats.filament += e;
        Ok(())
    }

    /// Print a rectangle of size x by y with its bottom left corner at the current position.
    /// Clockwise starts along +x, counter-clockwise along +y; either way we end where we started.
    pub fn square(&mut self, file: &mut dyn Write, x: f64, y: f64, turn: Turn) -> Result<()> {
        match turn {
            Turn::Clockwise => {
                self.line(file, x, 0.0)?;
                self.line(file, 0.0, y)?;
                self.line(file, -x, 0.0)?;
                self.line(file, 0.0, -y)?;
            }
            Turn::CounterClockwise => {
                self.line(file, 0.0, y)?;
                self.line(file, x, 0.0)?;
                self.line(file, 0.0, -y)?;
                self.line(file, -x, 0.0)?;
            }
        }
        Ok(())
    }

    /// Pull the filament back and hop up, if retraction is enabled
    pub fn retract(&mut self, file: &mut dyn Write) -> Result<()> {
        if !self.printer.enable_retraction {
            return Ok(());
        }
        let distance = self.active()?.retraction_distance;
        let z_up = self.printer.layer_height + self.printer.z_hop + self.printer.z_offset;
        g1(file, zef(z_up, -distance, self.printer.retraction_speed * 60.0))?;
        Ok(())
    }

    /// Undo a retraction: drop back to the layer and push the filament back, if retraction is enabled
    pub fn reretract(&mut self, file: &mut dyn Write) -> Result<()> {
        if !self.printer.enable_retraction {
            return Ok(());
        }
        let distance = self.active()?.retraction_distance;
        let z_print = self.printer.layer_height + self.printer.z_offset;
        g1(file, zef(z_print, distance, self.printer.retraction_speed * 60.0))?;
        Ok(())
    }

    /// Heat the tools in `tool_indexes` and the bed, home, probe and switch to relative extrusion
    pub fn starting_code(&mut self, file: &mut dyn Write, tool_indexes: &[usize]) -> Result<()> {
        self.active_tool = None;
        for &index in tool_indexes {
            let tool = self.tool(index)?;
            writeln!(
                file,
                "G10 P{} R{:.0} S{:.0}",
                tool.number, tool.standby_temperature, tool.printing_temperature
            )?;
        }
        writeln!(file, "M140 S{:.0}", self.printer.bed_temperature)?;
        writeln!(file, "M116")?;
        writeln!(file, "G54")?;
        writeln!(file, "G28")?;
        writeln!(file, "G32")?;
        writeln!(file, "M83")?;
        if self.printer.insert_pause {
            writeln!(file, "M25")?;
        }
        Ok(())
    }

    /// Lift away from the print and turn the motors off
    pub fn stop_code(&mut self, file: &mut dyn Write) -> Result<()> {
        g1(file, z(25.0))?;
        writeln!(file, "M84")?;
        writeln!(file, "M0 H1")?;
        Ok(())
    }

    /// Switch to the tool at `tool_index`. Nothing is emitted if it is already active.
    pub fn tool_change(&mut self, file: &mut dyn Write, tool_index: usize) -> Result<()> {
        if self.active_tool == Some(tool_index) {
            return Ok(());
        }
        let number = self.tool(tool_index)?.number;
        debug!(tool = number, "tool change");
        writeln!(file, "T{number}")?;
        self.active_tool = Some(tool_index);
        Ok(())
    }

    /// Find the index in the printer's tool list of each tool number
    pub fn find_tools(&self, tool_numbers: &[u32]) -> Result<Vec<usize>> {
        tool_numbers
            .iter()
            .map(|&number| {
                self.printer
                    .tools
                    .iter()
                    .position(|t| t.number == number)
                    .ok_or(Error::UnknownTool(number))
            })
            .collect()
    }
}
