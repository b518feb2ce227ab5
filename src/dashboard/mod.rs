use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Html,
    routing::get,
    Json, Router,
};
use serde_json::{json, Value};
use std::sync::Arc;
use tower_http::cors::CorsLayer;

use crate::engine::{CurrentItem, DisplayHandle};
use crate::models::{Game, League};
use crate::store::{GameStore, LeagueStatus};

#[derive(Clone)]
pub struct AppState {
    pub display: DisplayHandle,
    pub store: GameStore,
}

/// Build the Axum router for the dashboard.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(index_handler))
        .route("/api/current", get(current_handler))
        .route("/api/leagues", get(leagues_handler))
        .route("/api/leagues/:league/games", get(games_handler))
        .route("/api/health", get(health_handler))
        .layer(CorsLayer::permissive())
        .with_state(Arc::new(state))
}

async fn index_handler() -> Html<&'static str> {
    Html(DASHBOARD_HTML)
}

/// GET /api/current
async fn current_handler(State(state): State<Arc<AppState>>) -> Json<Option<CurrentItem>> {
    Json(state.display.current_item())
}

/// GET /api/leagues
async fn leagues_handler(State(state): State<Arc<AppState>>) -> Json<Vec<LeagueStatus>> {
    Json(state.store.status().await)
}

/// GET /api/leagues/:league/games
async fn games_handler(
    State(state): State<Arc<AppState>>,
    Path(league): Path<String>,
) -> Result<Json<Vec<Game>>, (StatusCode, String)> {
    let league = League::from_key(&league)
        .ok_or_else(|| (StatusCode::NOT_FOUND, format!("unknown league '{}'", league)))?;
    let games = state
        .store
        .get(league)
        .await
        .map(|snap| snap.games.clone())
        .unwrap_or_default();
    Ok(Json(games))
}

async fn health_handler() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

/// Minimal scoreboard preview that polls `/api/current`.
const DASHBOARD_HTML: &str = r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="UTF-8">
<title>courtside</title>
<style>
  body { background: #0f1117; color: #e0e0e0; font-family: system-ui, sans-serif; display: grid; place-items: center; height: 100vh; margin: 0; }
  #board { text-align: center; }
  .teams { font-size: 3rem; font-weight: 700; letter-spacing: .05em; }
  .meta { color: #8888aa; margin-top: .5rem; }
  .live { color: #ff4f6a; }
</style>
</head>
<body>
<div id="board"><div class="teams">--</div><div class="meta">waiting for games</div></div>
<script>
async function refresh() {
  const item = await fetch('/api/current').then(r => r.json()).catch(() => null);
  const board = document.getElementById('board');
  if (!item) {
    board.innerHTML = '<div class="teams">--</div><div class="meta">nothing to show</div>';
    return;
  }
  const g = item.game;
  const status = g.status === 'live'
    ? `<span class="live">Q${g.period ?? ''} ${g.clock ?? ''}</span>`
    : g.status === 'final' ? 'Final' : new Date(g.start_time).toLocaleString();
  board.innerHTML =
    `<div class="teams">${g.away.abbreviation} ${g.away.score} @ ${g.home.abbreviation} ${g.home.score}</div>` +
    `<div class="meta">${item.league.toUpperCase()} · ${item.mode}${item.is_live_interrupt ? ' · priority' : ''} · ${status}</div>`;
}
refresh();
setInterval(refresh, 1000);
</script>
</body>
</html>
"#;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::DisplayEngine;
    use crate::leagues::{EngineSettings, LeagueConfig};
    use crate::models::fixtures::game;
    use crate::models::{GameStatus, League};
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    async fn get_json(app: Router, uri: &str) -> Value {
        let resp = app
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_api_routes() {
        let store = GameStore::new();
        store
            .writer(League::Nba)
            .replace(
                vec![game("1", League::Nba, "LAL", "BOS", GameStatus::Live, 0)],
                chrono::Utc::now(),
            )
            .await;
        let settings = Arc::new(EngineSettings::new(vec![LeagueConfig::new(League::Nba)]));
        let engine = DisplayEngine::new(store.clone(), settings);
        let app = router(AppState {
            display: engine.handle(),
            store: store.clone(),
        });

        assert_eq!(get_json(app.clone(), "/api/health").await, json!({ "status": "ok" }));
        assert_eq!(get_json(app.clone(), "/api/current").await, Value::Null);

        let leagues = get_json(app.clone(), "/api/leagues").await;
        assert_eq!(leagues[0]["league"], "nba");
        assert_eq!(leagues[0]["live"], 1);

        let games = get_json(app.clone(), "/api/leagues/NBA/games").await;
        assert_eq!(games.as_array().unwrap().len(), 1);
        let resp = app
            .clone()
            .oneshot(
                Request::builder()
                    .uri("/api/leagues/nhl/games")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);

        let mut engine = engine;
        engine.tick(tokio::time::Instant::now()).await;
        let current = get_json(app, "/api/current").await;
        assert_eq!(current["mode"], "live");
        assert_eq!(current["game"]["home"]["abbreviation"], "LAL");
        assert_eq!(current["is_live_interrupt"], false);
    }
}
