//! Pure filtering and limiting of cached games into per-(league, mode) lists.

use chrono::{DateTime, Utc};
use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};

use crate::leagues::{EngineSettings, LeagueConfig};
use crate::models::{Game, League, Mode};
use crate::store::StoreSnapshot;

/// Every enabled (league, mode) selection for one tick.
#[derive(Debug, Clone, Default)]
pub struct Selections {
    lists: HashMap<(League, Mode), Vec<Game>>,
}

impl Selections {
    pub fn get(&self, league: League, mode: Mode) -> &[Game] {
        self.lists
            .get(&(league, mode))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn insert(&mut self, league: League, mode: Mode, games: Vec<Game>) {
        self.lists.insert((league, mode), games);
    }
}

fn by_recency(mode: Mode) -> impl Fn(&&Game, &&Game) -> Ordering {
    move |a, b| {
        let by_time = match mode {
            Mode::Recent => b.start_time.cmp(&a.start_time),
            Mode::Live | Mode::Upcoming => a.start_time.cmp(&b.start_time),
        };
        by_time.then_with(|| a.id.cmp(&b.id))
    }
}

/// Ordered games to show for `mode` in one league as of `now`.
pub fn select(
    snapshot: &StoreSnapshot,
    cfg: &LeagueConfig,
    mode: Mode,
    now: DateTime<Utc>,
) -> Vec<Game> {
    // Live state that stopped refreshing is no longer trustworthy.
    if mode == Mode::Live
        && snapshot
            .fetched_at(cfg.league)
            .is_some_and(|at| cfg.is_stale(at, now))
    {
        return Vec::new();
    }

    let favorites = &cfg.favorite_teams;
    let wanted = mode.status();
    let cutoff = cfg.recent_cutoff(now);

    let mut candidates: Vec<&Game> = snapshot
        .games(cfg.league)
        .iter()
        .filter(|g| g.status == wanted)
        .filter(|g| mode != Mode::Live || !g.appears_over())
        .filter(|g| mode != Mode::Recent || g.start_time >= cutoff)
        .collect();

    // With no favorites configured, favorite_only has nothing to filter on.
    let bypass_favorites = mode == Mode::Live && cfg.filtering.show_all_live;
    if !bypass_favorites && cfg.filtering.favorite_only && !favorites.is_empty() {
        candidates.retain(|g| favorites.iter().any(|team| g.involves(team)));
    }

    candidates.sort_by(by_recency(mode));

    let limit = match cfg.limit(mode) {
        Some(limit) => limit,
        None => return candidates.into_iter().cloned().collect(),
    };

    if favorites.is_empty() {
        // Gated leagues only ever fetched per-favorite schedules.
        if cfg.league.is_favorite_gated() {
            return Vec::new();
        }
        return candidates.into_iter().take(limit).cloned().collect();
    }

    // A game counts against every favorite playing in it.
    let mut counts = vec![0usize; favorites.len()];
    let mut taken: HashSet<&str> = HashSet::new();
    let mut out = Vec::with_capacity(limit * favorites.len());
    for (slot, team) in favorites.iter().enumerate() {
        for &game in &candidates {
            if counts[slot] >= limit {
                break;
            }
            if !game.involves(team) || taken.contains(game.id.as_str()) {
                continue;
            }
            taken.insert(game.id.as_str());
            for (i, fav) in favorites.iter().enumerate() {
                if game.involves(fav) {
                    counts[i] += 1;
                }
            }
            out.push(game.clone());
        }
    }
    out
}

/// Selections for every enabled league and enabled mode.
pub fn select_all(snapshot: &StoreSnapshot, settings: &EngineSettings, now: DateTime<Utc>) -> Selections {
    let mut selections = Selections::default();
    for cfg in settings.enabled() {
        for mode in Mode::ORDER {
            if cfg.mode_enabled(mode) {
                selections.insert(cfg.league, mode, select(snapshot, cfg, mode, now));
            }
        }
    }
    selections
}
