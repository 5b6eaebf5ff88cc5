//! Rendering collaborator for pie charts and trajectory plots.
//!
//! The matrix decides which results go into which figure and panel; a
//! [`Renderer`] decides how they look. Renderers are passed explicitly to the
//! plotting calls.

use std::io::Write;

use crate::error::Result;
use crate::model::SimulationResult;

/// One subplot of a figure.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Panel {
    /// `cell_line | condition`.
    pub title: String,
    pub condition: String,
    pub cell_line: String,
    /// Position of the panel within its figure.
    pub column: usize,
    /// Panels in the figure.
    pub columns: usize,
}

impl Panel {
    pub fn new(condition: &str, cell_line: &str, column: usize, columns: usize) -> Self {
        Self {
            title: format!("{} | {}", cell_line, condition),
            condition: condition.to_string(),
            cell_line: cell_line.to_string(),
            column,
            columns,
        }
    }
}

pub trait Renderer {
    /// Start a new figure holding `panels` side-by-side panels.
    fn begin_figure(&mut self, panels: usize) -> Result<()>;

    /// Draw the final-state distribution as a pie chart.
    fn pie_chart(&mut self, panel: &Panel, result: &SimulationResult) -> Result<()>;

    /// Draw the state probabilities over time.
    fn trajectory(&mut self, panel: &Panel, result: &SimulationResult) -> Result<()>;
}

/// Plain-text renderer: one block per panel, one line per state.
pub struct TextRenderer<W: Write> {
    out: W,
    figures: usize,
}

impl<W: Write> TextRenderer<W> {
    pub fn new(out: W) -> Self {
        Self { out, figures: 0 }
    }

    pub fn figures(&self) -> usize {
        self.figures
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write> Renderer for TextRenderer<W> {
    fn begin_figure(&mut self, panels: usize) -> Result<()> {
        self.figures += 1;
        writeln!(self.out, "# figure {} ({} panels)", self.figures, panels)?;
        Ok(())
    }

    fn pie_chart(&mut self, panel: &Panel, result: &SimulationResult) -> Result<()> {
        writeln!(self.out, "## {}", panel.title)?;
        let mut slices: Vec<(&String, &f64)> = result.last_state_distribution().iter().collect();
        slices.sort_by(|a, b| b.1.total_cmp(a.1));
        for (label, mass) in slices {
            writeln!(self.out, "{:>7.3}  {}", mass, label)?;
        }
        Ok(())
    }

    fn trajectory(&mut self, panel: &Panel, result: &SimulationResult) -> Result<()> {
        writeln!(self.out, "## {}", panel.title)?;
        for point in result.trajectory() {
            let states: Vec<String> = point
                .distribution
                .iter()
                .map(|(label, mass)| format!("{}={:.3}", label, mass))
                .collect();
            writeln!(self.out, "t={:<8.2} {}", point.time, states.join(", "))?;
        }
        Ok(())
    }
}
