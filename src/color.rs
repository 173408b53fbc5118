//! Run color assignment
//!
//! The legend and every plot read colors from the same [`ColorAssigner`], so
//! a run is drawn in one color everywhere for the whole session.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Terminal color names understood by the charting widget.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Color {
    /// blue
    Blue,
    /// red
    Red,
    /// green
    Green,
    /// yellow
    Yellow,
    /// magenta
    Magenta,
    /// cyan
    Cyan,
    /// `bright_blue`
    BrightBlue,
    /// `bright_red`
    BrightRed,
    /// `bright_green`
    BrightGreen,
    /// `bright_yellow`
    BrightYellow,
    /// `bright_magenta`
    BrightMagenta,
    /// `bright_cyan`
    BrightCyan,
}

/// Fixed palette, in assignment order.
pub const PALETTE: [Color; 12] = [
    Color::Blue,
    Color::Red,
    Color::Green,
    Color::Yellow,
    Color::Magenta,
    Color::Cyan,
    Color::BrightBlue,
    Color::BrightRed,
    Color::BrightGreen,
    Color::BrightYellow,
    Color::BrightMagenta,
    Color::BrightCyan,
];

impl Color {
    /// Name used by terminal plotting libraries.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Blue => "blue",
            Self::Red => "red",
            Self::Green => "green",
            Self::Yellow => "yellow",
            Self::Magenta => "magenta",
            Self::Cyan => "cyan",
            Self::BrightBlue => "bright_blue",
            Self::BrightRed => "bright_red",
            Self::BrightGreen => "bright_green",
            Self::BrightYellow => "bright_yellow",
            Self::BrightMagenta => "bright_magenta",
            Self::BrightCyan => "bright_cyan",
        }
    }

    /// ANSI SGR foreground code.
    #[must_use]
    pub const fn ansi_code(self) -> u8 {
        match self {
            Self::Blue => 34,
            Self::Red => 31,
            Self::Green => 32,
            Self::Yellow => 33,
            Self::Magenta => 35,
            Self::Cyan => 36,
            Self::BrightBlue => 94,
            Self::BrightRed => 91,
            Self::BrightGreen => 92,
            Self::BrightYellow => 93,
            Self::BrightMagenta => 95,
            Self::BrightCyan => 96,
        }
    }

    /// Wrap `text` in this color's ANSI escape sequence.
    #[must_use]
    pub fn paint(self, text: &str) -> String {
        format!("\x1b[{}m{text}\x1b[0m", self.ansi_code())
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Stable run → palette-slot assignment for one session.
///
/// A fresh selection gives the Nth run the Nth palette color. Runs that stay
/// selected keep their slot; a newly selected run takes the lowest free slot.
#[derive(Debug, Default, Clone)]
pub struct ColorAssigner {
    slots: BTreeMap<String, usize>,
}

impl ColorAssigner {
    /// Create an assigner with no runs.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Assign colors to the current selection, in selection order.
    ///
    /// Runs missing from `run_ids` release their colors.
    pub fn assign_colors<S: AsRef<str>>(&mut self, run_ids: &[S]) -> BTreeMap<String, Color> {
        self.slots
            .retain(|run, _| run_ids.iter().any(|id| id.as_ref() == run));

        for run_id in run_ids {
            let run_id = run_id.as_ref();
            if !self.slots.contains_key(run_id) {
                let slot = self.next_slot();
                self.slots.insert(run_id.to_string(), slot);
            }
        }

        self.colors()
    }

    /// Current color of `run_id`, if it is selected.
    #[must_use]
    pub fn color_of(&self, run_id: &str) -> Option<Color> {
        self.slots.get(run_id).map(|&slot| PALETTE[slot])
    }

    /// All current assignments.
    #[must_use]
    pub fn colors(&self) -> BTreeMap<String, Color> {
        self.slots
            .iter()
            .map(|(run, &slot)| (run.clone(), PALETTE[slot]))
            .collect()
    }

    /// Forget every assignment.
    pub fn reset(&mut self) {
        self.slots.clear();
    }

    /// Lowest unused slot; once the palette is exhausted, the least used one.
    fn next_slot(&self) -> usize {
        let mut usage = [0usize; PALETTE.len()];
        for &slot in self.slots.values() {
            usage[slot] += 1;
        }
        let min = usage.iter().copied().min().unwrap_or(0);
        usage.iter().position(|&count| count == min).unwrap_or(0)
    }
}
