//! Wire shape of the shared match document
//!
//! The store holds plain JSON. [`Patch`] is the partial form used both for
//! publishing a group of fields and for reading back whatever the store
//! handed us. [`MatchState::decode`] turns a received document into a
//! complete state, substituting defaults field by field and rejecting
//! documents whose rosters do not fit their mode.

use enum_map::EnumMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use serde_with::skip_serializing_none;
use thiserror::Error;

use crate::{
    constants::timer,
    state::{MatchState, Mode, Team, default_names, default_scores},
};

/// A partial match document
///
/// Absent fields are left out when serialized, so publishing a patch only
/// overwrites the fields it carries.
#[skip_serializing_none]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Patch {
    /// Match format
    pub mode: Option<Mode>,
    /// Per-player scores for each team
    pub scores: Option<EnumMap<Team, Vec<u64>>>,
    /// Per-player names for each team
    pub names: Option<EnumMap<Team, Vec<String>>>,
    /// Seconds remaining on the clock
    pub time_left: Option<u32>,
    /// Whether the countdown is ticking
    pub is_running: Option<bool>,
}

impl Patch {
    /// Converts the patch into the top-level fields handed to the store
    ///
    /// # Panics
    ///
    /// This method panics if serialization fails, which should never happen
    /// with the default JSON serializer for well-formed data.
    pub fn into_fields(self) -> Map<String, Value> {
        let value = serde_json::to_value(self).expect("default serializer cannot fail");
        let Value::Object(fields) = value else {
            unreachable!("a struct always serializes to a JSON object");
        };
        fields
    }

    /// Whether the patch carries no field at all
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Overwrites the fields of `state` that this patch carries
    pub fn merge_into(&self, state: &mut MatchState) {
        if let Some(mode) = self.mode {
            state.mode = mode;
        }
        if let Some(scores) = &self.scores {
            state.scores.clone_from(scores);
        }
        if let Some(names) = &self.names {
            state.names.clone_from(names);
        }
        if let Some(time_left) = self.time_left {
            state.time_left = time_left;
        }
        if let Some(is_running) = self.is_running {
            state.is_running = is_running;
        }
    }
}

/// Reasons a received document cannot be mirrored
#[derive(Debug, Error)]
pub enum DecodeError {
    /// The document does not have the expected shape or field types
    #[error("malformed match document: {0}")]
    Malformed(#[from] serde_json::Error),
    /// A team's roster length does not match the mode
    #[error("team {team} has {found} {field} but {mode} needs {expected}")]
    Roster {
        /// Offending team
        team: Team,
        /// Which sequence is off (`scores` or `names`)
        field: &'static str,
        /// Mode the document declares
        mode: Mode,
        /// Roster size for that mode
        expected: usize,
        /// Length actually received
        found: usize,
    },
}

impl MatchState {
    /// Decodes a document received from the store
    ///
    /// Missing or `null` fields fall back to their defaults: `2v2`, zeroed
    /// scores and default names sized for the decoded mode, `start_time`
    /// seconds, and a stopped clock.
    ///
    /// # Errors
    ///
    /// Returns [`DecodeError::Malformed`] if a present field has the wrong
    /// type, and [`DecodeError::Roster`] if a team's scores or names do not
    /// hold exactly one entry per player.
    pub fn decode(document: Value, start_time: u32) -> Result<Self, DecodeError> {
        let patch: Patch = serde_json::from_value(document)?;
        let state = Self::from_patch(patch, start_time);
        state.check_roster()?;
        Ok(state)
    }

    /// Serializes the full state as a store document
    ///
    /// # Panics
    ///
    /// This method panics if serialization fails, which should never happen
    /// with the default JSON serializer for well-formed data.
    pub fn to_document(&self) -> Value {
        serde_json::to_value(self).expect("default serializer cannot fail")
    }

    fn from_patch(patch: Patch, start_time: u32) -> Self {
        let Patch {
            mode,
            scores,
            names,
            time_left,
            is_running,
        } = patch;
        let mode = mode.unwrap_or_default();

        Self {
            mode,
            scores: scores.unwrap_or_else(|| default_scores(mode)),
            names: names.unwrap_or_else(|| default_names(mode)),
            time_left: time_left.unwrap_or(start_time),
            is_running: is_running.unwrap_or(false),
        }
    }

    /// Checks that both rosters hold one score and one name per player
    pub(crate) fn check_roster(&self) -> Result<(), DecodeError> {
        let expected = self.mode.roster_size();
        let lengths = self
            .scores
            .iter()
            .map(|(team, scores)| (team, "scores", scores.len()))
            .chain(
                self.names
                    .iter()
                    .map(|(team, names)| (team, "names", names.len())),
            );

        for (team, field, found) in lengths {
            if found != expected {
                return Err(DecodeError::Roster {
                    team,
                    field,
                    mode: self.mode,
                    expected,
                    found,
                });
            }
        }

        Ok(())
    }
}

impl TryFrom<Value> for MatchState {
    type Error = DecodeError;

    /// Decodes with the standard start time as the clock default
    fn try_from(document: Value) -> Result<Self, Self::Error> {
        Self::decode(document, timer::START_TIME)
    }
}
