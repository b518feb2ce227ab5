use async_trait::async_trait;

use crate::error::ProviderError;
use crate::models::{Game, League, Scope};

/// Trait that every game-data provider must implement.
#[async_trait]
pub trait GameProvider: Send + Sync {
    /// One request for one league and scope. Retrying is the caller's job.
    async fn fetch(&self, league: League, scope: &Scope) -> Result<Vec<Game>, ProviderError>;

    /// Human-readable name for logging.
    fn name(&self) -> &str;
}
