//! Sync controller
//!
//! This module keeps one viewer's local copy of the match in step with the
//! shared document. Remote snapshots replace local state wholesale. Local
//! actions update local state first and then queue the matching partial
//! write, so the acting viewer never waits on the store. The countdown
//! follows the `isRunning` flag from either side.

use std::{
    fmt::Display,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    time::Duration,
};

use garde::Validate;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::{sync::watch, task::JoinHandle};
use tracing::{Instrument, Span, debug, info, info_span, warn};
use uuid::Uuid;

use crate::{
    constants::{document, publish, timer},
    countdown::{self, Countdown, Phase},
    publisher::{Publisher, RetryPolicy, Write},
    state::{Action, MatchState, Mode, Team},
    store::{Snapshot, Store, StoreError, Subscription},
    view::Scoreboard,
};

/// A unique identifier for one viewer of the match
///
/// It only tags this viewer's log records; it is never written to the
/// shared document.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct ClientId(Uuid);

impl ClientId {
    /// Creates a new random client ID
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ClientId {
    /// Creates a new random client ID (same as `new()`)
    fn default() -> Self {
        Self::new()
    }
}

impl Display for ClientId {
    /// Formats the ID as a UUID string
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// Which viewers drive the countdown
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TickAuthority {
    /// Every viewer that sees `isRunning` ticks on its own
    ///
    /// Concurrent tickers race and the store keeps whichever write lands
    /// last, so the published clock is only approximately consistent.
    #[default]
    EveryViewer,
    /// Only the viewer that started the clock ticks; others just observe
    Initiator,
}

/// Validates a duration against a millisecond range
fn validate_millis<const MIN: u64, const MAX: u64>(val: &Duration) -> garde::Result {
    if (u128::from(MIN)..=u128::from(MAX)).contains(&val.as_millis()) {
        Ok(())
    } else {
        Err(garde::Error::new(format!(
            "outside of bounds [{MIN}ms,{MAX}ms]"
        )))
    }
}

/// Runtime options for a [`SyncController`]
///
/// Every field has a default, so a partial JSON object is enough to
/// override a single setting.
#[serde_with::serde_as]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct Options {
    /// Key of the shared match document
    #[garde(length(chars, min = 1, max = document::MAX_KEY_LENGTH))]
    pub document_key: String,
    /// Seconds on the clock for a new match and after a timer reset
    #[garde(range(min = 1, max = timer::MAX_START_TIME))]
    pub start_time: u32,
    /// Wall-clock time between two countdown steps
    #[garde(custom(|v, _| validate_millis::<
        { timer::MIN_TICK_INTERVAL_MS },
        { timer::MAX_TICK_INTERVAL_MS },
    >(v)))]
    #[serde_as(as = "serde_with::DurationMilliSeconds<u64>")]
    pub tick_interval: Duration,
    /// Attempts made for each remote write before it is dropped
    #[garde(range(min = 1, max = publish::MAX_ATTEMPTS))]
    pub publish_attempts: u32,
    /// Pause between two attempts of the same write
    #[garde(custom(|v, _| validate_millis::<0, { publish::MAX_RETRY_DELAY_MS }>(v)))]
    #[serde_as(as = "serde_with::DurationMilliSeconds<u64>")]
    pub retry_delay: Duration,
    /// Which viewers drive the countdown
    #[garde(skip)]
    pub tick_authority: TickAuthority,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            document_key: document::KEY.to_owned(),
            start_time: timer::START_TIME,
            tick_interval: Duration::from_millis(timer::TICK_INTERVAL_MS),
            publish_attempts: publish::ATTEMPTS,
            retry_delay: Duration::from_millis(publish::RETRY_DELAY_MS),
            tick_authority: TickAuthority::default(),
        }
    }
}

impl Options {
    /// Parses options from JSON and validates them
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the JSON cannot be parsed, and
    /// [`Error::Options`] if a value is out of range.
    pub fn from_json(json: &str) -> Result<Self, Error> {
        let options: Self = serde_json::from_str(json)?;
        options.validate()?;
        Ok(options)
    }

    fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            attempts: self.publish_attempts,
            delay: self.retry_delay,
        }
    }
}

/// Errors raised while setting up a controller
#[derive(Debug, Error)]
pub enum Error {
    /// Options could not be parsed
    #[error("unreadable options: {0}")]
    Config(#[from] serde_json::Error),
    /// Options are out of range
    #[error("invalid options: {0}")]
    Options(#[from] garde::Report),
    /// The store refused the subscription
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// State shared between the controller handle and its background tasks
#[derive(Debug)]
struct Inner {
    options: Options,
    local: watch::Sender<MatchState>,
    publisher: Publisher,
    countdown: Mutex<Countdown>,
    span: Span,
}

impl Inner {
    fn countdown(&self) -> MutexGuard<'_, Countdown> {
        self.countdown.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn is_running(&self) -> bool {
        self.local.borrow().is_running
    }

    /// Applies a local action and queues the resulting write
    fn dispatch(&self, action: Action) {
        debug!(parent: &self.span, ?action, "applying local action");

        let mut patch = None;
        self.local.send_if_modified(|state| {
            patch = state.apply(action);
            patch.is_some()
        });

        if let Some(patch) = patch {
            self.publisher.publish(Write::Update(patch));
        }
    }

    /// Mirrors a snapshot received from the store
    fn receive(self: &Arc<Self>, snapshot: Snapshot) {
        let Some(document) = snapshot else {
            info!(parent: &self.span, "match document absent, seeding defaults");
            let state = MatchState::new(self.options.start_time);
            let seed = state.to_document();
            self.local.send_replace(state);
            self.stop_countdown();
            self.publisher.publish(Write::Initialize(seed));
            return;
        };

        let mut state = match MatchState::decode(document, self.options.start_time) {
            Ok(state) => state,
            Err(error) => {
                warn!(parent: &self.span, %error, "ignoring undecodable match document");
                return;
            }
        };

        // The snapshot predates our undelivered updates.
        let mut overlaid = state.clone();
        self.publisher.overlay(&mut overlaid);
        match overlaid.check_roster() {
            Ok(()) => state = overlaid,
            Err(error) => {
                debug!(parent: &self.span, %error, "remote roster change supersedes pending updates");
            }
        }

        let running = state.is_running;
        self.local.send_if_modified(|local| {
            if *local == state {
                return false;
            }
            *local = state;
            true
        });

        if !running {
            self.stop_countdown();
        } else if self.options.tick_authority == TickAuthority::EveryViewer {
            self.start_countdown();
        }
    }

    fn start_countdown(self: &Arc<Self>) {
        let weak = Arc::downgrade(self);
        let period = self.options.tick_interval;
        let span = self.span.clone();

        let started = self.countdown().start(|generation| {
            countdown::spawn_ticker(period, span, move || {
                weak.upgrade().is_some_and(|inner| inner.tick(generation))
            })
        });

        if started {
            debug!(parent: &self.span, "countdown started");
        }
    }

    fn stop_countdown(&self) {
        if self.countdown().stop() {
            debug!(parent: &self.span, "countdown stopped");
        }
    }

    /// One countdown step, returning whether the ticker should keep going
    fn tick(&self, generation: u64) -> bool {
        let mut countdown = self.countdown();
        if !countdown.is_current(generation) {
            return false;
        }

        let mut patch = None;
        self.local.send_if_modified(|state| {
            patch = state.apply(Action::Tick);
            patch.is_some()
        });

        let running = self.is_running();
        if !running {
            countdown.finish(generation);
            info!(parent: &self.span, "clock ran out");
        }

        // Published under the countdown lock so a stop always queues after it.
        if let Some(patch) = patch {
            self.publisher.publish(Write::Update(patch));
        }

        running
    }
}

/// Feeds remote snapshots into the controller until the feed closes
async fn listen(inner: Arc<Inner>, mut subscription: Subscription) {
    while let Some(snapshot) = subscription.next().await {
        inner.receive(snapshot);
    }
    debug!("match document feed closed");
}

/// One viewer's connection to the shared match
///
/// Dropping the controller releases the subscription and cancels the
/// countdown without waiting for queued writes; [`SyncController::close`]
/// flushes them first.
#[derive(Debug)]
pub struct SyncController {
    client: ClientId,
    inner: Arc<Inner>,
    listener: JoinHandle<()>,
    publisher: JoinHandle<()>,
}

impl SyncController {
    /// Subscribes to the shared match document
    ///
    /// Local state starts out as the default match and is replaced by the
    /// first snapshot the store delivers. If the document does not exist
    /// yet, it is seeded with the default match.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Options`] if `options` fail validation and
    /// [`Error::Store`] if the store refuses the subscription.
    pub async fn subscribe(store: Arc<dyn Store>, options: Options) -> Result<Self, Error> {
        options.validate()?;

        let client = ClientId::new();
        let span = info_span!("scoreboard", %client, key = %options.document_key);

        let subscription = store.subscribe(&options.document_key).await?;
        let (publisher, publisher_task) = Publisher::spawn(
            store,
            options.document_key.clone(),
            options.retry_policy(),
            span.clone(),
        );

        let inner = Arc::new(Inner {
            local: watch::Sender::new(MatchState::new(options.start_time)),
            publisher,
            countdown: Mutex::default(),
            span: span.clone(),
            options,
        });

        let listener = tokio::spawn(listen(Arc::clone(&inner), subscription).instrument(span));
        info!(parent: &inner.span, "subscribed to match document");

        Ok(Self {
            client,
            inner,
            listener,
            publisher: publisher_task,
        })
    }

    /// Identity of this viewer in log records
    pub fn client_id(&self) -> ClientId {
        self.client
    }

    /// Options the controller runs with
    pub fn options(&self) -> &Options {
        &self.inner.options
    }

    /// Snapshot of the local match state
    pub fn state(&self) -> MatchState {
        self.inner.local.borrow().clone()
    }

    /// Receiver notified on every change of the local match state
    pub fn watch(&self) -> watch::Receiver<MatchState> {
        self.inner.local.subscribe()
    }

    /// Read model of the local match state
    pub fn scoreboard(&self) -> Scoreboard {
        Scoreboard::from(&*self.inner.local.borrow())
    }

    /// Number of local updates the store has not acknowledged yet
    pub fn pending_writes(&self) -> usize {
        self.inner.publisher.pending()
    }

    /// Whether this viewer is currently driving the countdown
    pub fn is_ticking(&self) -> bool {
        self.inner.countdown().phase() == Phase::Running
    }

    /// Switches the match format, resizing both rosters
    ///
    /// Publishes mode, scores and names together.
    pub fn set_mode(&self, mode: Mode) {
        self.inner.dispatch(Action::SetMode(mode));
    }

    /// Adds `delta` to a player's score, flooring at zero
    ///
    /// Indices outside the current roster are ignored.
    pub fn adjust_score(&self, team: Team, index: usize, delta: i64) {
        self.inner
            .dispatch(Action::AdjustScore { team, index, delta });
    }

    /// Renames a player
    ///
    /// Indices outside the current roster are ignored.
    pub fn rename_player(&self, team: Team, index: usize, name: impl Into<String>) {
        self.inner.dispatch(Action::RenamePlayer {
            team,
            index,
            name: name.into(),
        });
    }

    /// Zeroes every score, keeping roster sizes
    pub fn reset_scores(&self) {
        self.inner.dispatch(Action::ResetScores);
    }

    /// Stops the countdown and puts the clock back to the start time
    pub fn reset_timer(&self) {
        self.inner.stop_countdown();
        self.inner
            .dispatch(Action::ResetTimer(self.inner.options.start_time));
    }

    /// Starts or pauses the clock
    ///
    /// Starting always makes this viewer a ticker, whatever the
    /// [`TickAuthority`].
    pub fn toggle_running(&self) {
        self.inner.dispatch(Action::ToggleRunning);

        if self.inner.is_running() {
            self.inner.start_countdown();
        } else {
            self.inner.stop_countdown();
        }
    }

    /// Releases the subscription, stops the countdown and flushes queued writes
    pub async fn close(mut self) {
        self.listener.abort();
        let _ = (&mut self.listener).await;
        self.inner.stop_countdown();
        self.inner.publisher.flush().await;
        info!(parent: &self.inner.span, "unsubscribed from match document");
    }
}

impl Drop for SyncController {
    fn drop(&mut self) {
        self.listener.abort();
        self.publisher.abort();
        self.inner.stop_countdown();
    }
}
