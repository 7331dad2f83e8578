//! Read model for the presentation layer
//!
//! A [`Scoreboard`] is everything a screen needs to draw the match: team
//! totals, the per-player rows behind them, and the formatted clock. It is
//! derived from a [`MatchState`] and never mutated on its own.

use std::fmt::Display;

use enum_map::EnumMap;
use itertools::Itertools;
use serde::Serialize;
use serde_with::SerializeDisplay;

use crate::state::{MatchState, Mode, Team};

/// Seconds remaining, displayed as `minutes:seconds`
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, SerializeDisplay)]
pub struct Clock(pub u32);

impl Display for Clock {
    /// Formats the clock with zero-padded seconds, e.g. `7:30` or `0:05`
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{:02}", self.0 / 60, self.0 % 60)
    }
}

/// One line of a team's roster
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlayerRow {
    /// Display name of the player
    pub name: String,
    /// Hits scored by the player
    pub score: u64,
}

/// A team's side of the board
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TeamCard {
    /// Sum of the players' scores
    pub total: u64,
    /// Players in roster order
    pub players: Vec<PlayerRow>,
}

/// Everything the presentation layer renders
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Scoreboard {
    /// Current match format
    pub mode: Mode,
    /// Both teams' cards
    pub teams: EnumMap<Team, TeamCard>,
    /// Remaining time, formatted on display
    pub clock: Clock,
    /// Whether the clock is ticking
    pub is_running: bool,
}

impl Scoreboard {
    /// Label of the start/pause control for the current clock state
    pub fn control_label(&self) -> &'static str {
        if self.is_running {
            "Pause Match"
        } else {
            "Start/Resume Match"
        }
    }

    /// Converts the scoreboard to a JSON string for a presentation client
    ///
    /// # Panics
    ///
    /// This method panics if serialization fails, which should never happen
    /// with the default JSON serializer for well-formed data.
    pub fn to_message(&self) -> String {
        serde_json::to_string(self).expect("default serializer cannot fail")
    }
}

impl From<&MatchState> for Scoreboard {
    fn from(state: &MatchState) -> Self {
        Self {
            mode: state.mode,
            teams: EnumMap::from_fn(|team| TeamCard {
                total: state.team_total(team),
                players: state.names[team]
                    .iter()
                    .zip(&state.scores[team])
                    .map(|(name, score)| PlayerRow {
                        name: name.clone(),
                        score: *score,
                    })
                    .collect_vec(),
            }),
            clock: Clock(state.time_left),
            is_running: state.is_running,
        }
    }
}
