//! In-memory game cache, one entry per league.
//!
//! Each league's poller is the only writer for its entry and replaces it
//! wholesale on every successful fetch. Readers take a snapshot of `Arc`s
//! under one read lock, so they never observe a half-written league.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

use crate::models::{Game, League};

#[derive(Debug, Clone)]
pub struct LeagueSnapshot {
    pub games: Vec<Game>,
    pub fetched_at: DateTime<Utc>,
}

impl LeagueSnapshot {
    pub fn has_live(&self) -> bool {
        self.games.iter().any(Game::is_live)
    }
}

/// Thread-safe, cheaply cloneable handle to the per-league cache.
#[derive(Clone, Default)]
pub struct GameStore {
    inner: Arc<RwLock<HashMap<League, Arc<LeagueSnapshot>>>>,
}

/// Point-in-time view across all leagues.
#[derive(Debug, Clone, Default)]
pub struct StoreSnapshot {
    entries: HashMap<League, Arc<LeagueSnapshot>>,
}

impl StoreSnapshot {
    pub fn games(&self, league: League) -> &[Game] {
        self.entries
            .get(&league)
            .map(|e| e.games.as_slice())
            .unwrap_or(&[])
    }

    pub fn fetched_at(&self, league: League) -> Option<DateTime<Utc>> {
        self.entries.get(&league).map(|e| e.fetched_at)
    }
}

#[cfg(test)]
impl StoreSnapshot {
    pub fn from_games(games: Vec<Game>) -> Self {
        Self::from_games_at(games, Utc::now())
    }

    pub fn from_games_at(games: Vec<Game>, fetched_at: DateTime<Utc>) -> Self {
        let mut by_league: HashMap<League, Vec<Game>> = HashMap::new();
        for game in games {
            by_league.entry(game.league).or_default().push(game);
        }
        let entries = by_league
            .into_iter()
            .map(|(league, games)| {
                (
                    league,
                    Arc::new(LeagueSnapshot { games, fetched_at }),
                )
            })
            .collect();
        StoreSnapshot { entries }
    }
}

/// Freshness summary for the dashboard.
#[derive(Debug, Clone, Serialize)]
pub struct LeagueStatus {
    pub league: League,
    pub games: usize,
    pub live: usize,
    pub fetched_at: DateTime<Utc>,
}

impl GameStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Write handle for one league. Hand exactly one of these to the league's poller.
    pub fn writer(&self, league: League) -> LeagueWriter {
        LeagueWriter {
            league,
            inner: Arc::clone(&self.inner),
        }
    }

    pub async fn get(&self, league: League) -> Option<Arc<LeagueSnapshot>> {
        self.inner.read().await.get(&league).cloned()
    }

    pub async fn snapshot(&self) -> StoreSnapshot {
        StoreSnapshot {
            entries: self.inner.read().await.clone(),
        }
    }

    pub async fn status(&self) -> Vec<LeagueStatus> {
        let inner = self.inner.read().await;
        let mut out: Vec<LeagueStatus> = inner
            .iter()
            .map(|(league, snap)| LeagueStatus {
                league: *league,
                games: snap.games.len(),
                live: snap.games.iter().filter(|g| g.is_live()).count(),
                fetched_at: snap.fetched_at,
            })
            .collect();
        out.sort_by_key(|s| s.league);
        out
    }
}

pub struct LeagueWriter {
    league: League,
    inner: Arc<RwLock<HashMap<League, Arc<LeagueSnapshot>>>>,
}

impl LeagueWriter {
    pub fn league(&self) -> League {
        self.league
    }

    /// Swap in a new entry for this league.
    pub async fn replace(&self, games: Vec<Game>, fetched_at: DateTime<Utc>) {
        let snapshot = Arc::new(LeagueSnapshot { games, fetched_at });
        let count = snapshot.games.len();
        self.inner.write().await.insert(self.league, snapshot);
        debug!("GameStore: {} now holds {} games", self.league, count);
    }

    pub async fn current(&self) -> Option<Arc<LeagueSnapshot>> {
        self.inner.read().await.get(&self.league).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::fixtures::game;
    use crate::models::GameStatus;

    #[tokio::test]
    async fn test_replace_is_wholesale() {
        let store = GameStore::new();
        let writer = store.writer(League::Nba);
        writer
            .replace(
                vec![
                    game("1", League::Nba, "LAL", "BOS", GameStatus::Final, 0),
                    game("2", League::Nba, "GSW", "MIA", GameStatus::Scheduled, 5),
                ],
                Utc::now(),
            )
            .await;
        writer
            .replace(
                vec![game("3", League::Nba, "LAL", "PHX", GameStatus::Live, 1)],
                Utc::now(),
            )
            .await;

        let snap = store.get(League::Nba).await.unwrap();
        assert_eq!(snap.games.len(), 1);
        assert_eq!(snap.games[0].id, "3");
        assert!(snap.has_live());
    }

    #[tokio::test]
    async fn test_snapshot_is_unaffected_by_later_writes() {
        let store = GameStore::new();
        let writer = store.writer(League::Wnba);
        writer
            .replace(
                vec![game("1", League::Wnba, "LVA", "NYL", GameStatus::Final, 0)],
                Utc::now(),
            )
            .await;

        let before = store.snapshot().await;
        writer.replace(Vec::new(), Utc::now()).await;

        assert_eq!(before.games(League::Wnba).len(), 1);
        assert!(store.snapshot().await.games(League::Wnba).is_empty());
        assert!(before.games(League::Nba).is_empty());
    }

    #[tokio::test]
    async fn test_leagues_are_independent() {
        let store = GameStore::new();
        store
            .writer(League::Nba)
            .replace(
                vec![game("1", League::Nba, "LAL", "BOS", GameStatus::Live, 0)],
                Utc::now(),
            )
            .await;
        store
            .writer(League::Ncaaw)
            .replace(
                vec![game("2", League::Ncaaw, "UCONN", "SC", GameStatus::Final, 0)],
                Utc::now(),
            )
            .await;

        let status = store.status().await;
        assert_eq!(status.len(), 2);
        assert_eq!(status[0].league, League::Nba);
        assert_eq!(status[0].live, 1);
        assert_eq!(status[1].live, 0);
    }
}
