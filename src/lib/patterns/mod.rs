//! Calibration patterns for multi-tool printers.
//!
//! An interlocked calibration print lays down, for every tool, two combs that mesh into each other: a
//! reference comb printed by the reference tool and a signal comb printed by the tool under test. When the
//! print is scanned, the gap between the teeth of the two combs gives the XY offset between the nozzles.
//! Each comb is printed once going up and once going down (a differential pair), along both X and Y.

use std::fmt;
use std::io::Write;
use std::str::FromStr;

use tracing::{debug, info};

use crate::config::PatternConfig;
use crate::error::{Error, Result};
use crate::gcode_comment;
use crate::generator::Generator;
use crate::geometry::Turn;

/// The direction a meander progresses in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    PosY,
    NegY,
    PosX,
    NegX,
}

impl Direction {
    /// Patterns are written once, progressing along +y with their lines along x. This maps such a step onto
    /// the direction.
    fn map(self, a: f64, b: f64) -> (f64, f64) {
        match self {
            Direction::PosY => (a, b),
            Direction::NegY => (a, -b),
            Direction::PosX => (b, a),
            Direction::NegX => (-b, a),
        }
    }

    /// -y and +x are mirror images of +y, so they turn the other way. -x is a rotation and turns the same way.
    fn map_turn(self, turn: Turn) -> Turn {
        match self {
            Direction::PosY | Direction::NegX => turn,
            Direction::NegY | Direction::PosX => turn.reversed(),
        }
    }
}

impl FromStr for Direction {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "+y" => Ok(Direction::PosY),
            "-y" => Ok(Direction::NegY),
            "+x" => Ok(Direction::PosX),
            "-x" => Ok(Direction::NegX),
            _ => Err(Error::invalid(
                "direction",
                format!("'{s}', expected one of +y, -y, +x, -x"),
            )),
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Direction::PosY => "+y",
            Direction::NegY => "-y",
            Direction::PosX => "+x",
            Direction::NegX => "-x",
        };
        write!(f, "{s}")
    }
}

/// The axis a differential pair of patterns runs along
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Axis {
    X,
    Y,
}

impl FromStr for Axis {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "x" => Ok(Axis::X),
            "y" => Ok(Axis::Y),
            _ => Err(Error::invalid("axis", format!("'{s}', expected x or y"))),
        }
    }
}

/// Relative moves of a pattern, written in +y orientation and emitted in `direction`
struct Traversal<'a> {
    gen: &'a mut Generator,
    direction: Direction,
}

impl<'a> Traversal<'a> {
    fn new(gen: &'a mut Generator, direction: Direction) -> Self {
        Traversal { gen, direction }
    }

    fn travel(&mut self, file: &mut dyn Write, a: f64, b: f64) -> Result<()> {
        let (x, y) = self.direction.map(a, b);
        self.gen.move_by(file, x, y)
    }

    fn line(&mut self, file: &mut dyn Write, a: f64, b: f64) -> Result<()> {
        let (x, y) = self.direction.map(a, b);
        self.gen.line(file, x, y)
    }

    /// The first straight of a pattern is a travel, so the blob left by un-retracting isn't part of it
    fn straight(&mut self, file: &mut dyn Write, first: bool, a: f64, b: f64) -> Result<()> {
        if first {
            self.travel(file, a, b)
        } else {
            self.line(file, a, b)
        }
    }

    fn u_turn(&mut self, file: &mut dyn Write, a: f64, b: f64, turn: Turn) -> Result<()> {
        let (x, y) = self.direction.map(a, b);
        self.gen.u_turn(file, x, y, self.direction.map_turn(turn))
    }

    fn quarter_turn(&mut self, file: &mut dyn Write, a: f64, b: f64, turn: Turn) -> Result<()> {
        let (x, y) = self.direction.map(a, b);
        self.gen.quarter_turn(file, x, y, self.direction.map_turn(turn))
    }
}

pub struct CalibrationPattern {
    params: PatternConfig,
    gen: Generator,
}

impl CalibrationPattern {
    pub fn new(params: PatternConfig, gen: Generator) -> Result<Self> {
        params.validate()?;
        Ok(CalibrationPattern { params, gen })
    }

    pub fn params(&self) -> &PatternConfig {
        &self.params
    }

    pub fn generator(&self) -> &Generator {
        &self.gen
    }

    pub fn generator_mut(&mut self) -> &mut Generator {
        &mut self.gen
    }

    /// Number of periods of the simple meander
    pub fn repetitions(&self) -> usize {
        (self.params.length / self.params.pitch / 2.0).floor() as usize
    }

    /// Number of periods of the interlocked combs
    pub fn repetitions_interlocked(&self) -> usize {
        (self.params.length / self.params.interlocked_period).floor() as usize
    }

    /// Length of the simple meander, after rounding down to whole periods
    pub fn effective_length(&self) -> f64 {
        self.repetitions() as f64 * self.params.pitch * 2.0
    }

    /// Length of the interlocked combs, after rounding down to whole periods
    pub fn effective_length_interlocked(&self) -> f64 {
        self.repetitions_interlocked() as f64 * self.params.interlocked_period
    }

    /// Width of the differential pairs of `n_tools` tools, side by side
    pub fn total_one_dir_width(&self, n_tools: usize) -> f64 {
        n_tools as f64 * (self.params.width + self.params.spacing) * 2.0 - self.params.spacing
    }

    /// Width of the vertical and horizontal patterns together
    pub fn total_width(&self, n_tools: usize) -> f64 {
        self.total_one_dir_width(n_tools) + self.effective_length() + self.params.spacing
    }

    pub fn total_width_interlocked(&self, n_tools: usize) -> f64 {
        self.total_one_dir_width(n_tools) + self.effective_length_interlocked() + self.params.spacing
    }

    /// Height of the vertical and horizontal patterns together
    pub fn total_height(&self, n_tools: usize) -> f64 {
        self.total_one_dir_width(n_tools).max(self.effective_length())
    }

    pub fn total_height_interlocked(&self, n_tools: usize) -> f64 {
        self.total_one_dir_width(n_tools)
            .max(self.effective_length_interlocked())
    }

    /// Print `n` nested rectangles, each one nozzle diameter inside the previous one. (x_start, y_start) is the
    /// bottom left corner of the outer one.
    #[allow(clippy::too_many_arguments)]
    pub fn square_pattern(
        &mut self,
        file: &mut dyn Write,
        x_start: f64,
        y_start: f64,
        x: f64,
        y: f64,
        turn: Turn,
        n: usize,
    ) -> Result<()> {
        let d = self.gen.nozzle_diameter()?;
        self.gen.move_to(file, x_start, y_start)?;
        self.gen.reretract(file)?;
        for i in 0..n {
            let inset = i as f64 * d;
            self.gen.move_to(file, x_start + inset, y_start + inset)?;
            self.gen.square(file, x - 2.0 * inset, y - 2.0 * inset, turn)?;
        }
        self.gen.retract(file)
    }

    /// Print a simple meander starting at (x_start, y_start)
    pub fn single_pattern(
        &mut self,
        file: &mut dyn Write,
        x_start: f64,
        y_start: f64,
        direction: Direction,
    ) -> Result<()> {
        let repetitions = self.repetitions();
        let width = self.params.width;
        let pitch = self.params.pitch;
        let straight = width - 2.0 * pitch;

        self.gen.move_to(file, x_start, y_start)?;
        self.gen.reretract(file)?;
        let mut path = Traversal::new(&mut self.gen, direction);
        for i in 0..repetitions {
            path.straight(file, i == 0, straight, 0.0)?;
            path.u_turn(file, 0.0, pitch, Turn::CounterClockwise)?;
            path.line(file, -straight, 0.0)?;
            path.u_turn(file, 0.0, pitch, Turn::Clockwise)?;
        }
        path.travel(file, width, 0.0)?;
        self.gen.retract(file)
    }

    /// Print the reference comb of an interlocked pattern. (x_start, y_start) is the corner the matching signal
    /// comb starts from.
    pub fn interlocked_reference_pattern(
        &mut self,
        file: &mut dyn Write,
        x_start: f64,
        y_start: f64,
        direction: Direction,
    ) -> Result<()> {
        let repetitions = self.repetitions_interlocked();
        let period = self.params.interlocked_period;
        let pitch = self.params.interlocked_pitch;
        let straight = self.params.width - self.params.sigref_only;

        let (dx, dy) = direction.map(self.params.width, period / 2.0);
        self.gen.move_to(file, x_start + dx, y_start + dy)?;
        self.gen.reretract(file)?;
        let mut path = Traversal::new(&mut self.gen, direction);
        for i in 0..repetitions {
            path.straight(file, i == 0, -straight, 0.0)?;
            path.u_turn(file, 0.0, pitch, Turn::Clockwise)?;
            path.line(file, straight, 0.0)?;
            path.quarter_turn(file, pitch / 2.0, pitch / 2.0, Turn::CounterClockwise)?;
            path.line(file, 0.0, period - 2.0 * pitch)?;
            path.quarter_turn(file, -pitch / 2.0, pitch / 2.0, Turn::CounterClockwise)?;
        }
        path.travel(file, -straight, 0.0)?;
        self.gen.retract(file)
    }

    /// Print the signal comb of an interlocked pattern, starting at (x_start, y_start)
    pub fn interlocked_signal_pattern(
        &mut self,
        file: &mut dyn Write,
        x_start: f64,
        y_start: f64,
        direction: Direction,
    ) -> Result<()> {
        let repetitions = self.repetitions_interlocked();
        let period = self.params.interlocked_period;
        let pitch = self.params.interlocked_pitch;
        let straight = self.params.width - self.params.sigref_only;

        self.gen.move_to(file, x_start, y_start)?;
        self.gen.reretract(file)?;
        let mut path = Traversal::new(&mut self.gen, direction);
        for i in 0..repetitions {
            path.straight(file, i == 0, straight, 0.0)?;
            path.u_turn(file, 0.0, pitch, Turn::CounterClockwise)?;
            path.line(file, -straight, 0.0)?;
            path.quarter_turn(file, -pitch / 2.0, pitch / 2.0, Turn::Clockwise)?;
            path.line(file, 0.0, period - 2.0 * pitch)?;
            path.quarter_turn(file, pitch / 2.0, pitch / 2.0, Turn::Clockwise)?;
        }
        path.travel(file, straight, 0.0)?;
        self.gen.retract(file)
    }

    /// Print the reference side of a differential pair: two reference combs next to each other
    pub fn differential_interlocked_reference_pattern(
        &mut self,
        file: &mut dyn Write,
        x_start: f64,
        y_start: f64,
        axis: Axis,
    ) -> Result<()> {
        let width = self.params.width;
        let length = self.params.length;
        let step = self.params.spacing + width;
        match axis {
            Axis::Y => {
                self.interlocked_reference_pattern(file, x_start, y_start, Direction::PosY)?;
                self.gen.move_by(file, width, 0.0)?;
                self.gen.move_by(file, 0.0, -length)?;
                self.interlocked_reference_pattern(file, x_start + step, y_start, Direction::PosY)?;
                self.gen.move_by(file, width, 0.0)?;
                self.gen.move_by(file, 0.0, -length)?;
            }
            Axis::X => {
                self.interlocked_reference_pattern(file, x_start, y_start, Direction::PosX)?;
                self.gen.move_by(file, 0.0, width)?;
                self.gen.move_by(file, -length, 0.0)?;
                self.interlocked_reference_pattern(file, x_start, y_start + step, Direction::PosX)?;
                self.gen.move_by(file, 0.0, width)?;
                self.gen.move_by(file, -length, 0.0)?;
            }
        }
        Ok(())
    }

    /// Print the signal side of a differential pair: one comb going up the axis, and one coming back down
    /// next to it
    pub fn differential_interlocked_signal_pattern(
        &mut self,
        file: &mut dyn Write,
        x_start: f64,
        y_start: f64,
        axis: Axis,
    ) -> Result<()> {
        let step = self.params.spacing + self.params.width;
        let back = self.effective_length_interlocked() + self.params.interlocked_pitch;
        match axis {
            Axis::Y => {
                self.interlocked_signal_pattern(file, x_start, y_start, Direction::PosY)?;
                self.interlocked_signal_pattern(
                    file,
                    x_start + step,
                    y_start + back,
                    Direction::NegY,
                )?;
            }
            Axis::X => {
                self.interlocked_signal_pattern(file, x_start, y_start, Direction::PosX)?;
                self.interlocked_signal_pattern(
                    file,
                    x_start + back,
                    y_start + step,
                    Direction::NegX,
                )?;
            }
        }
        Ok(())
    }

    /// Print a single meander with one tool, e.g. to measure the conductivity of a printed track
    pub fn meander_print(&mut self, file: &mut dyn Write, tool: u32) -> Result<()> {
        let tool_indexes = self.gen.find_tools(&[tool])?;
        let center = self.gen.center();
        let x_start = center.x - self.params.width / 2.0;
        let y_start = center.y - self.params.length / 2.0;
        info!(
            tool,
            repetitions = self.repetitions(),
            length = self.effective_length(),
            "generating meander print"
        );

        self.gen.starting_code(file, &tool_indexes)?;
        self.gen.tool_change(file, tool_indexes[0])?;

        gcode_comment(file, "prime")?;
        self.gen.move_to(file, x_start, y_start - 10.0)?;
        self.gen.extrude(file, 15.0)?;
        self.gen.retract(file)?;

        gcode_comment(file, "meander")?;
        self.single_pattern(file, x_start, y_start, Direction::PosY)?;
        self.gen.stop_code(file)?;

        self.log_summary();
        Ok(())
    }

    /// Extent of a differential pair along its axis. The reference comb starts half a period in and the
    /// returning signal comb starts one interlocked pitch past the end, so a pair is longer than its combs.
    pub fn comb_span(&self) -> f64 {
        self.effective_length_interlocked() + self.params.interlocked_period / 2.0
    }

    /// Width of what `full_interlocked_print` lays out inside its frame: the vertical pairs side by side, then
    /// the horizontal pairs
    pub fn layout_width(&self, n_tools: usize) -> f64 {
        self.total_one_dir_width(n_tools) + self.params.spacing + self.comb_span()
    }

    pub fn layout_height(&self, n_tools: usize) -> f64 {
        self.total_one_dir_width(n_tools).max(self.comb_span())
    }

    /// Bottom left corner of the vertical differential pair of offset slot `slot`
    fn vertical_origin(&self, slot: usize, n_tools: usize) -> (f64, f64) {
        let center = self.gen.center();
        let x = center.x - self.layout_width(n_tools) / 2.0
            + 2.0 * slot as f64 * (self.params.width + self.params.spacing);
        let y = center.y - self.comb_span() / 2.0;
        (x, y)
    }

    /// Bottom left corner of the horizontal differential pair of offset slot `slot`
    fn horizontal_origin(&self, slot: usize, n_tools: usize) -> (f64, f64) {
        let center = self.gen.center();
        let x = center.x + self.layout_width(n_tools) / 2.0 - self.comb_span();
        let y = center.y - self.total_one_dir_width(n_tools) / 2.0
            + 2.0 * slot as f64 * (self.params.width + self.params.spacing);
        (x, y)
    }

    /// Print the complete interlocked calibration: a frame, then for every entry of `tools` a vertical and a
    /// horizontal differential pair, reference combs printed with `reference_tool` and signal combs with the
    /// tool itself. The position of a tool in `tools` is its offset slot.
    pub fn full_interlocked_print(
        &mut self,
        file: &mut dyn Write,
        tools: &[u32],
        reference_tool: u32,
    ) -> Result<()> {
        if tools.is_empty() {
            return Err(Error::invalid("tools", "at least one tool must be calibrated"));
        }
        let tool_indexes = self.gen.find_tools(tools)?;
        let reference_index = self.gen.find_tools(&[reference_tool])?[0];

        // Heat every tool once, reference included
        let mut heat = Vec::with_capacity(tool_indexes.len() + 1);
        for &index in tool_indexes.iter().chain(std::iter::once(&reference_index)) {
            if !heat.contains(&index) {
                heat.push(index);
            }
        }

        let n_tools = tools.len();
        let margin = 2.0 * self.params.spacing_to_square;
        let square_width = self.layout_width(n_tools) + margin;
        let square_height = self.layout_height(n_tools) + margin;
        info!(
            tools = n_tools,
            reference_tool,
            repetitions = self.repetitions_interlocked(),
            square_width,
            square_height,
            "generating interlocked calibration print"
        );

        self.gen.starting_code(file, &heat)?;
        self.gen.tool_change(file, reference_index)?;
        self.gen.set_offset_slot(0);

        let center = self.gen.center();
        let square_lines = self.params.square_lines;
        self.square_pattern(
            file,
            center.x - square_width / 2.0,
            center.y - square_height / 2.0,
            square_width,
            square_height,
            Turn::Clockwise,
            square_lines,
        )?;

        for slot in 0..n_tools {
            debug!(slot, "vertical reference pattern");
            gcode_comment(file, &format!("print vertical interlocked reference pattern {slot}"))?;
            let (x, y) = self.vertical_origin(slot, n_tools);
            self.differential_interlocked_reference_pattern(file, x, y, Axis::Y)?;
        }

        for slot in 0..n_tools {
            debug!(slot, "horizontal reference pattern");
            gcode_comment(file, &format!("print horizontal interlocked reference pattern {slot}"))?;
            let (x, y) = self.horizontal_origin(slot, n_tools);
            self.differential_interlocked_reference_pattern(file, x, y, Axis::X)?;
        }

        for (slot, &index) in tool_indexes.iter().enumerate() {
            debug!(slot, tool = tools[slot], "signal patterns");
            gcode_comment(file, &format!("print vertical interlocked signal pattern {slot}"))?;
            self.gen.tool_change(file, index)?;
            self.gen.set_offset_slot(slot);
            let (x, y) = self.vertical_origin(slot, n_tools);
            self.differential_interlocked_signal_pattern(file, x, y, Axis::Y)?;

            gcode_comment(file, &format!("print horizontal interlocked signal pattern {slot}"))?;
            let (x, y) = self.horizontal_origin(slot, n_tools);
            self.differential_interlocked_signal_pattern(file, x, y, Axis::X)?;
        }

        self.gen.stop_code(file)?;
        self.log_summary();
        Ok(())
    }

    fn log_summary(&self) {
        let stats = self.gen.stats();
        info!(
            lines = stats.lines,
            arcs = stats.arcs,
            travels = stats.travels,
            filament_mm = stats.filament,
            "done"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PrinterConfig;
    use approx::assert_relative_eq;

    const EPSILON: f64 = 1e-9;

    fn pattern_with(params: PatternConfig) -> CalibrationPattern {
        let printer = PrinterConfig {
            rotation_deg: 0.0,
            ..Default::default()
        };
        CalibrationPattern::new(params, Generator::new(printer).unwrap()).unwrap()
    }

    fn pattern() -> CalibrationPattern {
        pattern_with(PatternConfig::default())
    }

    /// A pattern with tool 1 selected
    fn ready_pattern() -> CalibrationPattern {
        let mut p = pattern();
        p.generator_mut().tool_change(&mut Vec::new(), 0).unwrap();
        p
    }

    fn count_prefix(out: &str, prefix: &str) -> usize {
        out.lines().filter(|l| l.starts_with(prefix)).count()
    }

    #[test]
    fn test_derived_quantities() {
        let p = pattern();
        assert_eq!(p.repetitions(), 35);
        assert_eq!(p.repetitions_interlocked(), 17);
        assert_relative_eq!(p.effective_length(), 70.0, epsilon = EPSILON);
        assert_relative_eq!(p.effective_length_interlocked(), 68.0, epsilon = EPSILON);
        assert_relative_eq!(p.total_one_dir_width(5), 107.0, epsilon = EPSILON);
        assert_relative_eq!(p.total_width(5), 180.0, epsilon = EPSILON);
        assert_relative_eq!(p.total_width_interlocked(5), 178.0, epsilon = EPSILON);
        assert_relative_eq!(p.total_height(5), 107.0, epsilon = EPSILON);
        assert_relative_eq!(p.total_height(1), 70.0, epsilon = EPSILON);
        assert_relative_eq!(p.total_height_interlocked(1), 68.0, epsilon = EPSILON);
    }

    #[test]
    fn test_totals_monotonic() {
        let base = PatternConfig::default();
        let mut previous: Option<(f64, f64)> = None;
        for length in [10.0, 20.0, 33.0, 70.0, 150.0] {
            let p = pattern_with(PatternConfig {
                length,
                ..base.clone()
            });
            let totals = (p.total_width(2), p.total_height(2));
            assert!(totals.0 >= 0.0 && totals.1 >= 0.0);
            if let Some(prev) = previous {
                assert!(totals.0 >= prev.0 && totals.1 >= prev.1);
            }
            previous = Some(totals);
        }

        let mut previous: Option<(f64, f64)> = None;
        for width in [3.0, 5.0, 8.0, 12.0] {
            let p = pattern_with(PatternConfig {
                width,
                ..base.clone()
            });
            let totals = (p.total_width_interlocked(3), p.total_height_interlocked(3));
            if let Some(prev) = previous {
                assert!(totals.0 >= prev.0 && totals.1 >= prev.1);
            }
            previous = Some(totals);
        }

        let p = pattern();
        for n in 1..6 {
            assert!(p.total_width(n + 1) > p.total_width(n));
            assert!(p.total_height(n + 1) >= p.total_height(n));
        }
    }

    #[test]
    fn test_single_pattern_counts_match_repetitions() {
        let mut p = ready_pattern();
        let mut buf = Vec::new();
        p.single_pattern(&mut buf, 0.0, 0.0, Direction::PosY).unwrap();
        let reps = p.repetitions();
        let stats = p.generator().stats();
        assert_eq!(stats.arcs, 2 * reps);
        assert_eq!(stats.lines, 2 * reps - 1);
        let out = String::from_utf8(buf).unwrap();
        assert_eq!(count_prefix(&out, "G2 ") + count_prefix(&out, "G3 "), 2 * reps);
        assert_eq!(count_prefix(&out, "G2 "), reps);
    }

    #[test]
    fn test_single_pattern_end_position() {
        let mut p = ready_pattern();
        p.single_pattern(&mut Vec::new(), 1.0, 2.0, Direction::PosY).unwrap();
        let end = p.generator().position();
        assert_relative_eq!(end.x, 1.0 + 8.0, epsilon = EPSILON);
        assert_relative_eq!(end.y, 2.0 + 70.0, epsilon = EPSILON);
    }

    #[test]
    fn test_reference_pattern_in_every_direction() {
        for direction in [
            Direction::PosY,
            Direction::NegY,
            Direction::PosX,
            Direction::NegX,
        ] {
            let mut p = ready_pattern();
            let reps = p.repetitions_interlocked();
            p.interlocked_reference_pattern(&mut Vec::new(), 5.0, -3.0, direction)
                .unwrap();
            let stats = p.generator().stats();
            assert_eq!(stats.arcs, 3 * reps, "{direction}");
            assert_eq!(stats.lines, 3 * reps - 1, "{direction}");

            // Starts at (width, period / 2), each period advances one period, then a travel back along the line
            let (ex, ey) = direction.map(8.0 - 6.0, 2.0 + 4.0 * reps as f64);
            let end = p.generator().position();
            assert_relative_eq!(end.x, 5.0 + ex, epsilon = EPSILON);
            assert_relative_eq!(end.y, -3.0 + ey, epsilon = EPSILON);
        }
    }

    #[test]
    fn test_signal_pattern_in_every_direction() {
        for direction in [
            Direction::PosY,
            Direction::NegY,
            Direction::PosX,
            Direction::NegX,
        ] {
            let mut p = ready_pattern();
            let reps = p.repetitions_interlocked();
            p.interlocked_signal_pattern(&mut Vec::new(), 0.0, 0.0, direction)
                .unwrap();
            let stats = p.generator().stats();
            assert_eq!(stats.arcs, 3 * reps, "{direction}");
            assert_eq!(stats.lines, 3 * reps - 1, "{direction}");

            let (ex, ey) = direction.map(6.0, 4.0 * reps as f64);
            let end = p.generator().position();
            assert_relative_eq!(end.x, ex, epsilon = EPSILON);
            assert_relative_eq!(end.y, ey, epsilon = EPSILON);
        }
    }

    #[test]
    fn test_mirrored_direction_flips_arcs() {
        let mut up = ready_pattern();
        let mut buf_up = Vec::new();
        up.interlocked_signal_pattern(&mut buf_up, 0.0, 0.0, Direction::PosY)
            .unwrap();
        let mut down = ready_pattern();
        let mut buf_down = Vec::new();
        down.interlocked_signal_pattern(&mut buf_down, 0.0, 0.0, Direction::NegY)
            .unwrap();
        let up = String::from_utf8(buf_up).unwrap();
        let down = String::from_utf8(buf_down).unwrap();
        assert_eq!(count_prefix(&up, "G2 "), count_prefix(&down, "G3 "));
        assert_eq!(count_prefix(&up, "G3 "), count_prefix(&down, "G2 "));
        assert_ne!(count_prefix(&up, "G2 "), count_prefix(&up, "G3 "));
    }

    #[test]
    fn test_square_pattern_nests() {
        let mut p = ready_pattern();
        let mut buf = Vec::new();
        p.square_pattern(&mut buf, 0.0, 0.0, 20.0, 10.0, Turn::Clockwise, 3)
            .unwrap();
        assert_eq!(p.generator().stats().lines, 12);
        let out = String::from_utf8(buf).unwrap();
        // Third square starts two nozzle diameters in
        assert!(out.contains("G1 X0.800 Y0.800 F1800\n"), "{out}");
        assert!(out.ends_with("G1 Z0.850 E-5.0000 F4800\n"));
    }

    #[test]
    fn test_square_pattern_needs_tool() {
        let mut p = pattern();
        assert!(matches!(
            p.square_pattern(&mut Vec::new(), 0.0, 0.0, 1.0, 1.0, Turn::Clockwise, 1),
            Err(Error::NoActiveTool)
        ));
    }

    #[test]
    fn test_differential_signal_pair() {
        let mut p = ready_pattern();
        let reps = p.repetitions_interlocked();
        p.differential_interlocked_signal_pattern(&mut Vec::new(), 0.0, 0.0, Axis::Y)
            .unwrap();
        assert_eq!(p.generator().stats().arcs, 2 * 3 * reps);
        // The second comb comes back down next to the first
        let end = p.generator().position();
        assert_relative_eq!(end.x, 11.0 + 6.0, epsilon = EPSILON);
        assert_relative_eq!(end.y, 0.75, epsilon = EPSILON);
    }

    #[test]
    fn test_differential_reference_pair() {
        let mut p = ready_pattern();
        let reps = p.repetitions_interlocked();
        let mut buf = Vec::new();
        p.differential_interlocked_reference_pattern(&mut buf, 0.0, 0.0, Axis::X)
            .unwrap();
        assert_eq!(p.generator().stats().arcs, 2 * 3 * reps);
        let out = String::from_utf8(buf).unwrap();
        assert_eq!(count_prefix(&out, "G1 Z0.350"), 2);
        assert_eq!(count_prefix(&out, "G1 Z0.850"), 2);
    }

    #[test]
    fn test_meander_print() {
        let mut p = pattern_with(PatternConfig {
            spacing: 0.5,
            width: 40.0,
            length: 10.0,
            ..Default::default()
        });
        let mut buf = Vec::new();
        p.meander_print(&mut buf, 1).unwrap();
        let out = String::from_utf8(buf).unwrap();
        assert!(out.starts_with("G10 P1 R175 S200\nM140 S60\n"), "{out}");
        assert!(out.contains("T1\n"));
        assert!(out.contains("G1 X-20.000 Y-15.000 F1800\nG1 E15.0000 F1800\n"), "{out}");
        assert!(out.ends_with("G1 Z25.000\nM84\nM0 H1\n"));
        assert_eq!(p.generator().stats().arcs, 10);
    }

    #[test]
    fn test_meander_print_unknown_tool() {
        let mut p = pattern();
        assert!(matches!(
            p.meander_print(&mut Vec::new(), 9),
            Err(Error::UnknownTool(9))
        ));
    }

    #[test]
    fn test_full_interlocked_print() {
        let mut p = pattern();
        let mut buf = Vec::new();
        p.full_interlocked_print(&mut buf, &[1, 2, 3, 4, 5], 2).unwrap();
        let out = String::from_utf8(buf).unwrap();

        assert_eq!(count_prefix(&out, "G10 "), 5);
        for slot in 0..5 {
            for what in [
                "vertical interlocked reference",
                "horizontal interlocked reference",
                "vertical interlocked signal",
                "horizontal interlocked signal",
            ] {
                let comment = format!(";print {what} pattern {slot}\n");
                assert!(out.contains(&comment), "missing {comment}");
            }
        }
        // Reference tool first, then every signal tool. Tool 2 is already active for its own slot.
        let tool_changes: Vec<&str> = out.lines().filter(|l| l.starts_with('T')).collect();
        assert_eq!(tool_changes, vec!["T2", "T1", "T2", "T3", "T4", "T5"]);
        assert!(out.ends_with("M0 H1\n"));

        let reps = p.repetitions_interlocked();
        // 4 combs per pair, 2 pairs per tool, 5 tools
        assert_eq!(p.generator().stats().arcs, 5 * 2 * 4 * 3 * reps);
        // Frame: 3 squares of 4 lines
        assert_eq!(p.generator().stats().lines, 12 + 5 * 2 * 4 * (3 * reps - 1));
    }

    /// X and Y of the end point of every extruding move in `out`
    fn extruded_points(out: &str) -> Vec<(f64, f64)> {
        let word = |line: &str, name: char| {
            line.split(' ')
                .find(|w| w.starts_with(name))
                .and_then(|w| w[1..].parse::<f64>().ok())
        };
        out.lines()
            .filter(|l| l.starts_with("G1 ") || l.starts_with("G2 ") || l.starts_with("G3 "))
            .filter(|l| l.contains(" E"))
            .filter_map(|l| Some((word(l, 'X')?, word(l, 'Y')?)))
            .collect()
    }

    #[test]
    fn test_full_print_combs_centred_in_frame() {
        for n_tools in [1, 5] {
            let mut p = pattern();
            let tools: Vec<u32> = (1..=n_tools).collect();
            let mut buf = Vec::new();
            p.full_interlocked_print(&mut buf, &tools, 2).unwrap();
            let out = String::from_utf8(buf).unwrap();
            let combs = &out[out.find(";print vertical").unwrap()..];
            let points = extruded_points(combs);
            assert!(!points.is_empty());

            let min_x = points.iter().map(|p| p.0).fold(f64::INFINITY, f64::min);
            let max_x = points.iter().map(|p| p.0).fold(f64::NEG_INFINITY, f64::max);
            let min_y = points.iter().map(|p| p.1).fold(f64::INFINITY, f64::min);
            let max_y = points.iter().map(|p| p.1).fold(f64::NEG_INFINITY, f64::max);

            let center = p.generator().center();
            assert!(
                ((min_x + max_x) / 2.0 - center.x).abs() < 0.5,
                "{n_tools} tools: x {min_x}..{max_x}"
            );
            assert!(
                ((min_y + max_y) / 2.0 - center.y).abs() < 0.5,
                "{n_tools} tools: y {min_y}..{max_y}"
            );

            let spacing = p.params().spacing_to_square;
            let margin = 2.0 * spacing;
            let half_width = (p.layout_width(n_tools as usize) + margin) / 2.0;
            let half_height = (p.layout_height(n_tools as usize) + margin) / 2.0;
            for gap in [
                min_x - (center.x - half_width),
                center.x + half_width - max_x,
                min_y - (center.y - half_height),
                center.y + half_height - max_y,
            ] {
                assert!(
                    gap > spacing - 0.5 && gap < spacing + 1.0,
                    "{n_tools} tools: gap {gap} to the frame"
                );
            }
        }
    }

    #[test]
    fn test_full_print_single_tool_with_offsets() {
        let printer = PrinterConfig {
            rotation_deg: 0.0,
            x_offsets: vec![0.0, -0.05, 0.05, -0.1, 0.1],
            y_offsets: vec![0.0, -0.05, 0.05, -0.1, 0.1],
            ..Default::default()
        };
        let gen = Generator::new(printer).unwrap();
        let mut p = CalibrationPattern::new(PatternConfig::default(), gen).unwrap();
        let mut buf = Vec::new();
        p.full_interlocked_print(&mut buf, &[2, 2, 2, 2, 2], 2).unwrap();
        let out = String::from_utf8(buf).unwrap();
        assert_eq!(count_prefix(&out, "G10 "), 1);
        assert_eq!(count_prefix(&out, "T"), 1);
        assert_eq!(p.generator().offset_slot(), 4);
    }

    #[test]
    fn test_full_print_rejects_bad_tools() {
        let mut p = pattern();
        assert!(p.full_interlocked_print(&mut Vec::new(), &[], 1).is_err());
        assert!(matches!(
            p.full_interlocked_print(&mut Vec::new(), &[1, 2], 6),
            Err(Error::UnknownTool(6))
        ));
    }

    #[test]
    fn test_invalid_pattern_rejected() {
        let printer = PrinterConfig::default();
        let params = PatternConfig {
            pitch: 0.0,
            ..Default::default()
        };
        assert!(CalibrationPattern::new(params, Generator::new(printer).unwrap()).is_err());
    }

    #[test]
    fn test_parse_direction_and_axis() {
        for s in ["+y", "-y", "+x", "-x"] {
            assert_eq!(s.parse::<Direction>().unwrap().to_string(), s);
        }
        assert!("y".parse::<Direction>().is_err());
        assert_eq!("x".parse::<Axis>().unwrap(), Axis::X);
        assert!("z".parse::<Axis>().is_err());
    }
}
