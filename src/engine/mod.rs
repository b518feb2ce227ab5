pub mod rotator;
pub mod selector;

pub use rotator::{RotationState, Rotator};
pub use selector::select_all;

use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, info};

use crate::leagues::EngineSettings;
use crate::models::{Game, League, Mode};
use crate::store::GameStore;

/// What the renderer should draw right now.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CurrentItem {
    pub league: League,
    pub mode: Mode,
    pub game: Game,
    pub is_live_interrupt: bool,
}

/// Cheap, cloneable read side of the engine for renderers and the dashboard.
#[derive(Clone)]
pub struct DisplayHandle {
    rx: watch::Receiver<Option<CurrentItem>>,
}

impl DisplayHandle {
    /// Last published item. Never blocks.
    pub fn current_item(&self) -> Option<CurrentItem> {
        self.rx.borrow().clone()
    }
}

/// Free-standing selection + rotation engine.
///
/// Owns the rotation state; everything else is read from the store and the
/// current settings on each `tick`.
pub struct DisplayEngine {
    store: GameStore,
    settings: Arc<EngineSettings>,
    rotator: Rotator,
    current: watch::Sender<Option<CurrentItem>>,
}

impl DisplayEngine {
    pub fn new(store: GameStore, settings: Arc<EngineSettings>) -> Self {
        let (current, _) = watch::channel(None);
        DisplayEngine {
            store,
            settings,
            rotator: Rotator::new(Instant::now()),
            current,
        }
    }

    pub fn handle(&self) -> DisplayHandle {
        DisplayHandle {
            rx: self.current.subscribe(),
        }
    }

    #[cfg(test)]
    pub fn state(&self) -> &RotationState {
        self.rotator.state()
    }

    /// Swap in new league settings. Rotation state is kept; the next tick
    /// re-validates the current position against the new selections.
    pub fn update_config(&mut self, settings: Arc<EngineSettings>) {
        info!(
            "Display engine picked up new settings ({} enabled leagues)",
            settings.enabled().count()
        );
        self.settings = settings;
    }

    /// Recompute selections, step the rotator and publish the result.
    pub async fn tick(&mut self, now: Instant) -> Option<CurrentItem> {
        let snapshot = self.store.snapshot().await;
        let selections = select_all(&snapshot, &self.settings, Utc::now());
        let state = self.rotator.tick(now, &selections, &self.settings).clone();

        let item = match state {
            RotationState::Idle => None,
            RotationState::Normal(slot) => selections
                .get(slot.league, slot.mode)
                .get(slot.index)
                .map(|game| CurrentItem {
                    league: slot.league,
                    mode: slot.mode,
                    game: game.clone(),
                    is_live_interrupt: false,
                }),
            RotationState::LiveInterrupt { league, index, .. } => selections
                .get(league, Mode::Live)
                .get(index)
                .map(|game| CurrentItem {
                    league,
                    mode: Mode::Live,
                    game: game.clone(),
                    is_live_interrupt: true,
                }),
        };

        self.current.send_if_modified(|current| {
            if *current != item {
                debug!("Current item: {:?}", item.as_ref().map(|i| (&i.game.id, i.league, i.mode)));
                *current = item.clone();
                true
            } else {
                false
            }
        });
        item
    }

    /// Tick every `every` until `shutdown` fires, applying settings reloads
    /// in between.
    pub async fn run(
        mut self,
        every: Duration,
        mut settings: watch::Receiver<Arc<EngineSettings>>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        let mut interval = tokio::time::interval(every);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        info!("Display engine started (tick={:?})", every);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    self.tick(Instant::now()).await;
                }
                changed = settings.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let next = Arc::clone(&settings.borrow_and_update());
                    self.update_config(next);
                }
                _ = shutdown.changed() => break,
            }
        }
        info!("Display engine stopped");
    }
}
