//! Configuration constants for the scoreboard
//!
//! This module contains the fixed values and configuration limits used
//! throughout the crate: document defaults, timer bounds and the ranges
//! accepted by [`crate::controller::Options`].

/// Shared document constants
pub mod document {
    /// Key of the single shared match document
    pub const KEY: &str = "games/nerf-wars";
    /// Maximum length of a document key in characters
    pub const MAX_KEY_LENGTH: usize = 256;
}

/// Countdown timer constants
pub mod timer {
    /// Seconds on the clock when a match starts or the timer is reset (7:30)
    pub const START_TIME: u32 = 450;
    /// Longest match the clock may be configured for, in seconds
    pub const MAX_START_TIME: u32 = 86_400;
    /// Default wall-clock time between ticks, in milliseconds
    pub const TICK_INTERVAL_MS: u64 = 1_000;
    /// Shortest accepted tick interval, in milliseconds
    pub const MIN_TICK_INTERVAL_MS: u64 = 10;
    /// Longest accepted tick interval, in milliseconds
    pub const MAX_TICK_INTERVAL_MS: u64 = 60_000;
}

/// Remote publishing constants
pub mod publish {
    /// Default number of attempts for a single remote write
    pub const ATTEMPTS: u32 = 3;
    /// Upper bound on attempts for a single remote write
    pub const MAX_ATTEMPTS: u32 = 10;
    /// Default pause between two attempts, in milliseconds
    pub const RETRY_DELAY_MS: u64 = 250;
    /// Longest accepted pause between two attempts, in milliseconds
    pub const MAX_RETRY_DELAY_MS: u64 = 10_000;
}

/// Roster constants
pub mod roster {
    /// Players per team in a 2v2 match
    pub const TWO_VS_TWO: usize = 2;
    /// Players per team in a 3v3 match
    pub const THREE_VS_THREE: usize = 3;
}
