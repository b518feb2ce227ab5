pub mod espn;
pub mod provider;
pub mod retry;

pub use espn::EspnProvider;
pub use provider::GameProvider;
pub use retry::{fetch_with_retry, RetryPolicy};

use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::error::ProviderError;
use crate::leagues::{EngineSettings, LeagueConfig};
use crate::models::{Game, League, Scope};
use crate::store::{GameStore, LeagueWriter};

/// Result of one refresh cycle for one league.
#[derive(Debug)]
pub enum CycleOutcome {
    Fresh(Vec<Game>),
    /// Some calls failed; `games` is the merged successful subset.
    Degraded {
        games: Vec<Game>,
        failures: Vec<(Scope, ProviderError)>,
    },
    /// Nothing usable came back; the store must not be touched.
    Failed(Vec<(Scope, ProviderError)>),
}

/// Calls needed to refresh one league: the scoreboard for live state, plus
/// one schedule per favorite where the scoreboard can't reach back in time.
pub fn plan_scopes(cfg: &LeagueConfig) -> Vec<Scope> {
    let mut scopes = vec![Scope::Scoreboard];
    if cfg.needs_team_schedules() {
        scopes.extend(
            cfg.favorite_teams
                .iter()
                .map(|team| Scope::TeamSchedule { team: team.clone() }),
        );
    }
    scopes
}

/// De-duplicate by id keeping the first copy seen, then order by (start, id).
/// Results must be passed scoreboard first so its live state wins.
fn merge(batches: Vec<Vec<Game>>) -> Vec<Game> {
    let mut by_id: HashMap<String, Game> = HashMap::new();
    for game in batches.into_iter().flatten() {
        by_id.entry(game.id.clone()).or_insert(game);
    }
    let mut games: Vec<Game> = by_id.into_values().collect();
    games.sort_by(|a, b| a.start_time.cmp(&b.start_time).then_with(|| a.id.cmp(&b.id)));
    games
}

/// Issue every planned call concurrently and classify the combined result.
pub async fn run_cycle(
    provider: &dyn GameProvider,
    cfg: &LeagueConfig,
    policy: &RetryPolicy,
) -> CycleOutcome {
    let scopes = plan_scopes(cfg);
    let fetches = scopes
        .iter()
        .map(|scope| fetch_with_retry(provider, cfg.league, scope, policy));
    let results = futures_util::future::join_all(fetches).await;

    let mut batches = Vec::with_capacity(results.len());
    let mut failures = Vec::new();
    for (scope, result) in scopes.into_iter().zip(results) {
        match result {
            Ok(games) => batches.push(games),
            Err(e) => failures.push((scope, e)),
        }
    }

    if batches.is_empty() {
        CycleOutcome::Failed(failures)
    } else if failures.is_empty() {
        CycleOutcome::Fresh(merge(batches))
    } else {
        CycleOutcome::Degraded {
            games: merge(batches),
            failures,
        }
    }
}

/// Log the outcome and write whatever it carries into the store.
pub async fn apply_outcome(writer: &LeagueWriter, outcome: CycleOutcome) {
    let league = writer.league();
    let games = match outcome {
        CycleOutcome::Fresh(games) => games,
        CycleOutcome::Degraded { games, failures } => {
            for (scope, e) in &failures {
                warn!("{} {} degraded: {}", league, scope, e);
            }
            games
        }
        CycleOutcome::Failed(failures) => {
            for (scope, e) in &failures {
                if e.is_parse() {
                    warn!("{} {} returned unusable data: {}", league, scope, e);
                } else {
                    error!("{} {} fetch failed, keeping previous snapshot: {}", league, scope, e);
                }
            }
            return;
        }
    };

    let live = games.iter().filter(|g| g.is_live()).count();
    info!("{} refreshed: {} games ({} live)", league, games.len(), live);
    writer.replace(games, Utc::now()).await;
}

async fn run_poller(
    provider: Arc<dyn GameProvider>,
    writer: LeagueWriter,
    policy: RetryPolicy,
    settings: watch::Receiver<Arc<EngineSettings>>,
    mut stop: watch::Receiver<bool>,
) {
    let league = writer.league();
    info!("{} poller started (provider: {})", league, provider.name());

    loop {
        // Favorites and intervals are re-read every cycle so reloads apply.
        let cfg = match settings.borrow().get(league) {
            Some(cfg) if cfg.enabled => cfg.clone(),
            _ => break,
        };

        tokio::select! {
            outcome = run_cycle(provider.as_ref(), &cfg, &policy) => {
                apply_outcome(&writer, outcome).await;
            }
            _ = stop.changed() => break,
        }

        let has_live = writer
            .current()
            .await
            .map(|snap| snap.has_live())
            .unwrap_or(false);
        let delay = cfg.poll_interval(has_live);

        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            _ = stop.changed() => break,
        }
    }

    info!("{} poller stopped", league);
}

struct Poller {
    stop: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

/// Keeps exactly one poller running per enabled league.
pub struct FetchSupervisor {
    provider: Arc<dyn GameProvider>,
    store: GameStore,
    policy: RetryPolicy,
    settings: watch::Receiver<Arc<EngineSettings>>,
    pollers: HashMap<League, Poller>,
}

impl FetchSupervisor {
    pub fn new(
        provider: Arc<dyn GameProvider>,
        store: GameStore,
        policy: RetryPolicy,
        settings: watch::Receiver<Arc<EngineSettings>>,
    ) -> Self {
        FetchSupervisor {
            provider,
            store,
            policy,
            settings,
            pollers: HashMap::new(),
        }
    }

    /// Leagues with a live poller task.
    pub fn running(&self) -> Vec<League> {
        let mut leagues: Vec<League> = self.pollers.keys().copied().collect();
        leagues.sort();
        leagues
    }

    /// Start pollers for newly enabled leagues and stop the rest.
    pub fn sync(&mut self) {
        let settings = Arc::clone(&self.settings.borrow());
        let wanted: Vec<League> = settings.enabled().map(|c| c.league).collect();

        self.pollers.retain(|league, poller| {
            let keep = wanted.contains(league) && !poller.handle.is_finished();
            if !keep {
                info!("Stopping {} poller", league);
                let _ = poller.stop.send(true);
            }
            keep
        });

        for league in wanted {
            if self.pollers.contains_key(&league) {
                continue;
            }
            let (stop, stop_rx) = watch::channel(false);
            let handle = tokio::spawn(run_poller(
                Arc::clone(&self.provider),
                self.store.writer(league),
                self.policy.clone(),
                self.settings.clone(),
                stop_rx,
            ));
            self.pollers.insert(league, Poller { stop, handle });
        }
    }

    /// Follow settings changes until `shutdown` fires, then stop every poller.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>, grace: Duration) {
        self.sync();
        info!("Pollers running: {:?}", self.running());
        let mut settings = self.settings.clone();
        loop {
            tokio::select! {
                changed = settings.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    self.sync();
                    info!("Pollers running: {:?}", self.running());
                }
                _ = shutdown.changed() => break,
            }
        }
        self.shutdown(grace).await;
    }

    /// Signal every poller and wait up to `grace`; stragglers are aborted.
    pub async fn shutdown(&mut self, grace: Duration) {
        let mut pollers: Vec<Poller> = self.pollers.drain().map(|(_, p)| p).collect();
        for poller in &pollers {
            let _ = poller.stop.send(true);
        }

        let joined = tokio::time::timeout(
            grace,
            futures_util::future::join_all(pollers.iter_mut().map(|p| &mut p.handle)),
        )
        .await;
        if joined.is_err() {
            warn!("Pollers did not stop within {:?}, aborting in-flight fetches", grace);
            for poller in &pollers {
                poller.handle.abort();
            }
        }
    }
}
