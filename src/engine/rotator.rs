//! Rotation state machine over (league, mode) pairs with live-priority
//! interruption.

use tokio::time::Instant;
use tracing::{debug, info};

use super::selector::Selections;
use crate::leagues::EngineSettings;
use crate::models::{League, Mode};

/// A position in normal rotation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Slot {
    pub league: League,
    pub mode: Mode,
    pub index: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RotationState {
    /// Nothing displayable anywhere.
    Idle,
    Normal(Slot),
    LiveInterrupt {
        league: League,
        index: usize,
        /// Where to go back to once no priority league is live.
        resume: Option<Slot>,
    },
}

pub struct Rotator {
    state: RotationState,
    last_switch: Instant,
}

/// Every enabled (league, mode) in rotation order, displayable or not.
fn pair_order(settings: &EngineSettings) -> Vec<(League, Mode)> {
    settings
        .enabled()
        .flat_map(|cfg| {
            Mode::ORDER
                .into_iter()
                .filter(move |m| cfg.mode_enabled(*m))
                .map(move |m| (cfg.league, m))
        })
        .collect()
}

fn is_displayable(pair: (League, Mode), order: &[(League, Mode)], selections: &Selections) -> bool {
    order.contains(&pair) && !selections.get(pair.0, pair.1).is_empty()
}

/// First displayable pair strictly after `from` (wrapping, `from` itself last).
fn next_pair(
    from: Option<(League, Mode)>,
    order: &[(League, Mode)],
    selections: &Selections,
) -> Option<(League, Mode)> {
    let start = from
        .and_then(|p| order.iter().position(|o| *o == p))
        .map(|i| i + 1)
        .unwrap_or(0);
    (0..order.len())
        .map(|offset| order[(start + offset) % order.len()])
        .find(|pair| !selections.get(pair.0, pair.1).is_empty())
}

/// First priority league with live games, in configured order.
fn live_priority_league(settings: &EngineSettings, selections: &Selections) -> Option<League> {
    settings
        .enabled()
        .filter(|cfg| cfg.interrupts_on_live())
        .map(|cfg| cfg.league)
        .find(|league| !selections.get(*league, Mode::Live).is_empty())
}

impl Rotator {
    pub fn new(now: Instant) -> Self {
        Rotator {
            state: RotationState::Idle,
            last_switch: now,
        }
    }

    #[cfg(test)]
    pub fn state(&self) -> &RotationState {
        &self.state
    }

    fn switch(&mut self, state: RotationState, now: Instant) {
        match &state {
            RotationState::Idle => info!("Rotation idle: nothing to display"),
            RotationState::Normal(slot) => {
                info!("Rotating to {} {} (#{})", slot.league, slot.mode, slot.index)
            }
            RotationState::LiveInterrupt { league, .. } => {
                info!("Live interrupt: {} has live games", league)
            }
        }
        self.state = state;
        self.last_switch = now;
    }

    /// Advance the machine by one tick. Durations are read from `settings`
    /// on every call, so reloaded values apply to the item on screen.
    pub fn tick(&mut self, now: Instant, selections: &Selections, settings: &EngineSettings) -> &RotationState {
        let order = pair_order(settings);
        let priority = live_priority_league(settings, selections);
        let elapsed = now.saturating_duration_since(self.last_switch);

        match self.state.clone() {
            RotationState::LiveInterrupt { league, index, resume } => {
                let live = selections.get(league, Mode::Live);
                let still_live = settings
                    .get(league)
                    .is_some_and(|cfg| cfg.interrupts_on_live())
                    && !live.is_empty();

                if still_live {
                    let duration = settings
                        .get(league)
                        .map(|cfg| cfg.display_duration(Mode::Live))
                        .unwrap_or_default();
                    if index >= live.len() {
                        self.state = RotationState::LiveInterrupt { league, index: 0, resume };
                    } else if elapsed >= duration {
                        let next = (index + 1) % live.len();
                        debug!("{} live game {} -> {}", league, index, next);
                        self.state = RotationState::LiveInterrupt { league, index: next, resume };
                        self.last_switch = now;
                    }
                } else if let Some(other) = priority {
                    self.switch(
                        RotationState::LiveInterrupt {
                            league: other,
                            index: 0,
                            resume,
                        },
                        now,
                    );
                } else {
                    let resumed = self.resume_from(resume, &order, selections);
                    self.switch(resumed, now);
                }
            }

            state => {
                if let Some(league) = priority {
                    let resume = match state {
                        RotationState::Normal(slot) => Some(slot),
                        _ => None,
                    };
                    self.switch(
                        RotationState::LiveInterrupt {
                            league,
                            index: 0,
                            resume,
                        },
                        now,
                    );
                } else {
                    self.advance_normal(state, now, elapsed, &order, selections, settings);
                }
            }
        }

        &self.state
    }

    /// Back to the remembered slot, index clamped; a pair that has since
    /// emptied hands over to the next displayable one.
    fn resume_from(
        &self,
        resume: Option<Slot>,
        order: &[(League, Mode)],
        selections: &Selections,
    ) -> RotationState {
        if let Some(slot) = resume {
            let pair = (slot.league, slot.mode);
            if is_displayable(pair, order, selections) {
                let len = selections.get(slot.league, slot.mode).len();
                let index = if slot.index < len { slot.index } else { 0 };
                return RotationState::Normal(Slot { index, ..slot });
            }
        }
        let from = resume.map(|s| (s.league, s.mode));
        match next_pair(from, order, selections) {
            Some((league, mode)) => RotationState::Normal(Slot { league, mode, index: 0 }),
            None => RotationState::Idle,
        }
    }

    fn advance_normal(
        &mut self,
        state: RotationState,
        now: Instant,
        elapsed: std::time::Duration,
        order: &[(League, Mode)],
        selections: &Selections,
        settings: &EngineSettings,
    ) {
        let slot = match state {
            RotationState::Normal(slot) => slot,
            _ => {
                if let Some((league, mode)) = next_pair(None, order, selections) {
                    self.switch(RotationState::Normal(Slot { league, mode, index: 0 }), now);
                }
                return;
            }
        };

        let pair = (slot.league, slot.mode);
        if !is_displayable(pair, order, selections) {
            let next = match next_pair(Some(pair), order, selections) {
                Some((league, mode)) => RotationState::Normal(Slot { league, mode, index: 0 }),
                None => RotationState::Idle,
            };
            self.switch(next, now);
            return;
        }

        let len = selections.get(slot.league, slot.mode).len();
        if slot.index >= len {
            // List shrank under us; keep the timer running.
            self.state = RotationState::Normal(Slot { index: 0, ..slot });
            return;
        }

        let duration = settings
            .get(slot.league)
            .map(|cfg| cfg.display_duration(slot.mode))
            .unwrap_or_default();
        if elapsed < duration {
            return;
        }

        if slot.index + 1 < len {
            debug!("{} {} game {} -> {}", slot.league, slot.mode, slot.index, slot.index + 1);
            self.state = RotationState::Normal(Slot {
                index: slot.index + 1,
                ..slot
            });
            self.last_switch = now;
        } else if let Some((league, mode)) = next_pair(Some(pair), order, selections) {
            self.switch(RotationState::Normal(Slot { league, mode, index: 0 }), now);
        }
    }
}
