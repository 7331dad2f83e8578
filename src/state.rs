//! Match state and its local transitions
//!
//! This module defines the shared [`MatchState`] document, the two teams
//! and the match modes, along with the [`Action`]s that a viewer can take.
//! Transitions are pure: [`MatchState::apply`] mutates the state and hands
//! back the [`Patch`] that has to be published, without touching any store.

use std::str::FromStr;

use enum_map::{Enum, EnumMap};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{
    constants::{roster, timer},
    document::Patch,
};

/// Match format, which decides how many players each team fields
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, derive_more::Display,
)]
pub enum Mode {
    /// Two players per team
    #[default]
    #[serde(rename = "2v2")]
    #[display("2v2")]
    TwoVsTwo,
    /// Three players per team
    #[serde(rename = "3v3")]
    #[display("3v3")]
    ThreeVsThree,
}

impl Mode {
    /// Number of players per team in this mode
    pub fn roster_size(self) -> usize {
        match self {
            Self::TwoVsTwo => roster::TWO_VS_TWO,
            Self::ThreeVsThree => roster::THREE_VS_THREE,
        }
    }
}

/// Error returned when parsing a mode other than `2v2` or `3v3`
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown match mode `{0}`")]
pub struct UnknownMode(pub String);

impl FromStr for Mode {
    type Err = UnknownMode;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "2v2" => Ok(Self::TwoVsTwo),
            "3v3" => Ok(Self::ThreeVsThree),
            other => Err(UnknownMode(other.to_owned())),
        }
    }
}

/// One of the two dueling teams
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Enum,
    Serialize,
    Deserialize,
    derive_more::Display,
)]
pub enum Team {
    /// Team A
    A,
    /// Team B
    B,
}

/// Name given to the player at `index` (0-based) when a slot is created
pub fn default_name(index: usize) -> String {
    format!("Player {}", index + 1)
}

/// The shared match document for one live session
///
/// Scores and names are index-aligned per team: `names[team][i]` labels
/// `scores[team][i]`, and both sequences hold exactly
/// [`Mode::roster_size`] entries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchState {
    /// Current match format
    pub mode: Mode,
    /// Per-player scores for each team
    pub scores: EnumMap<Team, Vec<u64>>,
    /// Per-player names for each team
    pub names: EnumMap<Team, Vec<String>>,
    /// Seconds remaining on the clock
    pub time_left: u32,
    /// Whether the countdown is ticking
    pub is_running: bool,
}

impl Default for MatchState {
    fn default() -> Self {
        Self::new(timer::START_TIME)
    }
}

impl MatchState {
    /// Creates the state a fresh session is seeded with
    ///
    /// The match is 2v2 with every score at zero, the default player names,
    /// and a stopped clock showing `start_time` seconds.
    pub fn new(start_time: u32) -> Self {
        let mode = Mode::default();
        Self {
            mode,
            scores: default_scores(mode),
            names: default_names(mode),
            time_left: start_time,
            is_running: false,
        }
    }

    /// Sum of a team's scores, saturating at `u64::MAX`
    pub fn team_total(&self, team: Team) -> u64 {
        self.scores[team]
            .iter()
            .fold(0, |total, score| total.saturating_add(*score))
    }

    /// Applies a local action and returns the fields to publish
    ///
    /// Returns `None` when the action does not produce a remote write: a
    /// tick on a stopped clock, or an index outside the current roster.
    pub fn apply(&mut self, action: Action) -> Option<Patch> {
        match action {
            Action::SetMode(mode) => {
                let size = mode.roster_size();
                for scores in self.scores.values_mut() {
                    scores.resize(size, 0);
                }
                for names in self.names.values_mut() {
                    names.truncate(size);
                    let from = names.len();
                    names.extend((from..size).map(default_name));
                }
                self.mode = mode;

                Some(Patch {
                    mode: Some(mode),
                    scores: Some(self.scores.clone()),
                    names: Some(self.names.clone()),
                    ..Patch::default()
                })
            }
            Action::AdjustScore { team, index, delta } => {
                let score = self.scores[team].get_mut(index)?;
                *score = score.saturating_add_signed(delta);

                Some(Patch {
                    scores: Some(self.scores.clone()),
                    ..Patch::default()
                })
            }
            Action::RenamePlayer { team, index, name } => {
                *self.names[team].get_mut(index)? = name;

                Some(Patch {
                    names: Some(self.names.clone()),
                    ..Patch::default()
                })
            }
            Action::ResetScores => {
                self.scores.values_mut().flatten().for_each(|score| *score = 0);

                Some(Patch {
                    scores: Some(self.scores.clone()),
                    ..Patch::default()
                })
            }
            Action::ResetTimer(start_time) => {
                self.time_left = start_time;
                self.is_running = false;

                Some(Patch {
                    time_left: Some(start_time),
                    is_running: Some(false),
                    ..Patch::default()
                })
            }
            Action::ToggleRunning => {
                self.is_running = !self.is_running;

                Some(Patch {
                    is_running: Some(self.is_running),
                    ..Patch::default()
                })
            }
            Action::Tick => {
                if !self.is_running {
                    return None;
                }

                self.time_left = self.time_left.saturating_sub(1);

                if self.time_left == 0 {
                    self.is_running = false;
                    Some(Patch {
                        time_left: Some(0),
                        is_running: Some(false),
                        ..Patch::default()
                    })
                } else {
                    Some(Patch {
                        time_left: Some(self.time_left),
                        ..Patch::default()
                    })
                }
            }
        }
    }
}

/// Zeroed scores sized for `mode`
pub(crate) fn default_scores(mode: Mode) -> EnumMap<Team, Vec<u64>> {
    EnumMap::from_fn(|_| vec![0; mode.roster_size()])
}

/// Default player names sized for `mode`
pub(crate) fn default_names(mode: Mode) -> EnumMap<Team, Vec<String>> {
    EnumMap::from_fn(|_| (0..mode.roster_size()).map(default_name).collect())
}

/// Things a viewer can do to the match
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// Switch format, resizing both rosters
    SetMode(Mode),
    /// Add `delta` to one player's score, flooring at zero
    AdjustScore {
        /// Team of the player
        team: Team,
        /// Position of the player in the roster
        index: usize,
        /// Signed change to apply
        delta: i64,
    },
    /// Replace one player's name
    RenamePlayer {
        /// Team of the player
        team: Team,
        /// Position of the player in the roster
        index: usize,
        /// New display name
        name: String,
    },
    /// Zero every score, keeping roster sizes
    ResetScores,
    /// Stop the clock and put it back to the given number of seconds
    ResetTimer(u32),
    /// Start or pause the clock
    ToggleRunning,
    /// One countdown step
    Tick,
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    fn adjust(team: Team, index: usize, delta: i64) -> Action {
        Action::AdjustScore { team, index, delta }
    }

    #[test]
    fn test_new_state_defaults() {
        let state = MatchState::default();

        assert_eq!(state.mode, Mode::TwoVsTwo);
        assert_eq!(state.scores[Team::A], vec![0, 0]);
        assert_eq!(state.scores[Team::B], vec![0, 0]);
        assert_eq!(state.names[Team::A], vec!["Player 1", "Player 2"]);
        assert_eq!(state.names[Team::B], vec!["Player 1", "Player 2"]);
        assert_eq!(state.time_left, 450);
        assert!(!state.is_running);
    }

    #[test]
    fn test_mode_parse_and_display() {
        assert_eq!("2v2".parse::<Mode>(), Ok(Mode::TwoVsTwo));
        assert_eq!("3v3".parse::<Mode>(), Ok(Mode::ThreeVsThree));
        assert_eq!("4v4".parse::<Mode>(), Err(UnknownMode("4v4".to_owned())));
        assert_eq!(Mode::ThreeVsThree.to_string(), "3v3");
        assert_eq!(Mode::TwoVsTwo.roster_size(), 2);
        assert_eq!(Mode::ThreeVsThree.roster_size(), 3);
    }

    #[test]
    fn test_adjust_score_floors_at_zero() {
        let mut state = MatchState::default();

        state.apply(adjust(Team::A, 1, 2));
        for _ in 0..5 {
            let patch = state.apply(adjust(Team::A, 1, -1)).unwrap();
            assert_eq!(patch.scores.as_ref().unwrap()[Team::A][1], state.scores[Team::A][1]);
        }

        assert_eq!(state.scores[Team::A], vec![0, 0]);
    }

    #[test]
    fn test_adjust_score_is_max_of_zero_and_sum() {
        let mut state = MatchState::default();
        state.scores[Team::B] = vec![4, 1];

        state.apply(adjust(Team::B, 0, 3));
        state.apply(adjust(Team::B, 1, -7));

        assert_eq!(state.scores[Team::B], vec![7, 0]);
        assert_eq!(state.scores[Team::A], vec![0, 0]);
    }

    #[test]
    fn test_adjust_score_publishes_only_scores() {
        let mut state = MatchState::default();
        let patch = state.apply(adjust(Team::A, 0, 1)).unwrap();

        assert!(patch.scores.is_some());
        assert!(patch.mode.is_none());
        assert!(patch.names.is_none());
        assert!(patch.time_left.is_none());
        assert!(patch.is_running.is_none());
    }

    #[test]
    fn test_out_of_range_index_is_noop() {
        let mut state = MatchState::default();
        let before = state.clone();

        assert!(state.apply(adjust(Team::A, 2, 1)).is_none());
        assert!(
            state
                .apply(Action::RenamePlayer {
                    team: Team::B,
                    index: 5,
                    name: "Ghost".to_owned(),
                })
                .is_none()
        );
        assert_eq!(state, before);
    }

    #[test]
    fn test_set_mode_round_trip_keeps_first_slots() {
        let mut state = MatchState::default();

        state.apply(Action::SetMode(Mode::ThreeVsThree));
        assert_eq!(state.names[Team::A], vec!["Player 1", "Player 2", "Player 3"]);

        state.apply(adjust(Team::A, 0, 4));
        state.apply(adjust(Team::A, 2, 9));
        state.apply(Action::RenamePlayer {
            team: Team::A,
            index: 1,
            name: "Blaster".to_owned(),
        });
        state.apply(Action::RenamePlayer {
            team: Team::A,
            index: 2,
            name: "Sniper".to_owned(),
        });

        state.apply(Action::SetMode(Mode::TwoVsTwo));
        assert_eq!(state.scores[Team::A], vec![4, 0]);
        assert_eq!(state.names[Team::A], vec!["Player 1", "Blaster"]);

        state.apply(Action::SetMode(Mode::ThreeVsThree));
        assert_eq!(state.mode, Mode::ThreeVsThree);
        assert_eq!(state.scores[Team::A], vec![4, 0, 0]);
        assert_eq!(state.names[Team::A], vec!["Player 1", "Blaster", "Player 3"]);
        assert_eq!(state.scores[Team::B], vec![0, 0, 0]);
    }

    #[test]
    fn test_set_mode_publishes_roster_group() {
        let mut state = MatchState::default();
        let patch = state.apply(Action::SetMode(Mode::ThreeVsThree)).unwrap();

        assert_eq!(patch.mode, Some(Mode::ThreeVsThree));
        assert_eq!(patch.scores, Some(state.scores.clone()));
        assert_eq!(patch.names, Some(state.names.clone()));
        assert!(patch.time_left.is_none());
    }

    #[test]
    fn test_reset_scores_preserves_lengths() {
        let mut state = MatchState::default();
        state.apply(Action::SetMode(Mode::ThreeVsThree));
        state.scores[Team::A] = vec![1, 2, 3];
        state.scores[Team::B] = vec![7, 0, 5];

        let patch = state.apply(Action::ResetScores).unwrap();

        assert_eq!(state.scores[Team::A], vec![0, 0, 0]);
        assert_eq!(state.scores[Team::B], vec![0, 0, 0]);
        assert_eq!(patch.scores, Some(state.scores.clone()));
    }

    #[test]
    fn test_reset_timer_from_any_state() {
        let mut state = MatchState::default();
        state.time_left = 12;
        state.is_running = true;

        let patch = state.apply(Action::ResetTimer(450)).unwrap();

        assert_eq!(state.time_left, 450);
        assert!(!state.is_running);
        assert_eq!(patch.time_left, Some(450));
        assert_eq!(patch.is_running, Some(false));
    }

    #[test]
    fn test_toggle_running() {
        let mut state = MatchState::default();

        let patch = state.apply(Action::ToggleRunning).unwrap();
        assert!(state.is_running);
        assert_eq!(patch.is_running, Some(true));
        assert!(patch.time_left.is_none());

        state.apply(Action::ToggleRunning);
        assert!(!state.is_running);
    }

    #[test]
    fn test_tick_decrements_while_running() {
        let mut state = MatchState::default();
        state.is_running = true;

        let patch = state.apply(Action::Tick).unwrap();

        assert_eq!(state.time_left, 449);
        assert!(state.is_running);
        assert_eq!(patch.time_left, Some(449));
        assert!(patch.is_running.is_none());
    }

    #[test]
    fn test_tick_from_one_stops_at_zero() {
        let mut state = MatchState::default();
        state.time_left = 1;
        state.is_running = true;

        let patch = state.apply(Action::Tick).unwrap();
        assert_eq!(state.time_left, 0);
        assert!(!state.is_running);
        assert_eq!(patch.time_left, Some(0));
        assert_eq!(patch.is_running, Some(false));

        assert!(state.apply(Action::Tick).is_none());
        assert_eq!(state.time_left, 0);
    }

    #[test]
    fn test_tick_at_zero_while_running_stops() {
        let mut state = MatchState::default();
        state.time_left = 0;
        state.is_running = true;

        let patch = state.apply(Action::Tick).unwrap();

        assert_eq!(state.time_left, 0);
        assert!(!state.is_running);
        assert_eq!(patch.is_running, Some(false));
    }

    #[test]
    fn test_tick_on_stopped_clock_is_noop() {
        let mut state = MatchState::default();
        assert!(state.apply(Action::Tick).is_none());
        assert_eq!(state.time_left, 450);
    }

    #[test]
    fn test_team_totals() {
        let mut state = MatchState::default();
        state.scores[Team::A] = vec![3, 5];
        state.scores[Team::B] = vec![2, 2];

        assert_eq!(state.team_total(Team::A), 8);
        assert_eq!(state.team_total(Team::B), 4);
    }

    #[test]
    fn test_team_total_saturates() {
        let mut state = MatchState::default();
        state.scores[Team::A] = vec![u64::MAX, 1];

        assert_eq!(state.team_total(Team::A), u64::MAX);
        assert_eq!(state.team_total(Team::B), 0);
    }
}
