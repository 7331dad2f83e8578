//! # Nerf Scoreboard Library
//!
//! This library provides the synchronization core of a live scoreboard for
//! two-team Nerf duels. Every viewer mirrors one shared match document from
//! a realtime key-value store, applies its own actions locally before
//! publishing them, and runs the match countdown whose ticks are published
//! so all screens stay in step.

#![cfg_attr(all(coverage_nightly, test), feature(coverage_attribute))]
#![deny(missing_docs)]
#![deny(rustdoc::missing_crate_level_docs)]
#![warn(clippy::pedantic)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::doc_markdown)]
#![allow(clippy::module_name_repetitions)]

pub mod constants;

pub mod controller;
mod countdown;
pub mod document;
mod publisher;
pub mod state;
pub mod store;
pub mod view;

pub use controller::{ClientId, Error, Options, SyncController, TickAuthority};
pub use document::{DecodeError, Patch};
pub use state::{Action, MatchState, Mode, Team};
pub use store::{MemoryStore, Store, StoreError, Subscription};
pub use view::{Clock, Scoreboard};
