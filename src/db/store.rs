use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::models::{Match, MatchId, MatchPatch, NewMatch, SortOrder};
use super::Database;

/// Persistence collaborator the match handlers write through.
#[async_trait]
pub trait MatchStore: Send + Sync {
    async fn find_by_id(&self, id: MatchId) -> Result<Option<Match>>;

    /// Identity lookup used for duplicate prevention. Team order matters.
    async fn find_by_teams_and_date(
        &self,
        team_a: &str,
        team_b: &str,
        date: DateTime<Utc>,
    ) -> Result<Option<Match>>;

    async fn insert(&self, new: &NewMatch) -> Result<Match>;

    /// Returns the stored representation after the patch, or `None` if absent.
    async fn update_by_id(&self, id: MatchId, patch: &MatchPatch) -> Result<Option<Match>>;

    async fn list_all(&self, order: SortOrder) -> Result<Vec<Match>>;
}

#[async_trait]
impl MatchStore for Database {
    async fn find_by_id(&self, id: MatchId) -> Result<Option<Match>> {
        self.get_match(id)
    }

    async fn find_by_teams_and_date(
        &self,
        team_a: &str,
        team_b: &str,
        date: DateTime<Utc>,
    ) -> Result<Option<Match>> {
        self.find_duplicate(team_a, team_b, date)
    }

    async fn insert(&self, new: &NewMatch) -> Result<Match> {
        self.insert_match(new)
    }

    async fn update_by_id(&self, id: MatchId, patch: &MatchPatch) -> Result<Option<Match>> {
        self.update_match(id, patch)
    }

    async fn list_all(&self, order: SortOrder) -> Result<Vec<Match>> {
        self.list_matches(order)
    }
}
