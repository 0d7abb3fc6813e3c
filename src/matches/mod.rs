//! Match mutations and subscriptions.
//!
//! Every successful mutation persists first and then publishes. When a single
//! match is affected it goes out twice: a match-scoped event on that match's
//! topic and a `MATCH_UPDATED` carrying the full record on the list topic.

pub mod error;

pub use error::MatchError;

use std::sync::Arc;
use tracing::info;

use crate::db::models::{
    EventKind, Match, MatchEvent, MatchId, MatchPatch, MatchStatus, NewMatch, ScoreChange, Side,
    SortOrder,
};
use crate::db::{MatchStore, PatchRejected};
use crate::live::{Broadcaster, StreamEvent, Subscription, Topic};

pub type MatchResult<T> = Result<T, MatchError>;

#[derive(Clone)]
pub struct MatchService {
    store: Arc<dyn MatchStore>,
    broadcaster: Broadcaster,
}

impl MatchService {
    pub fn new(store: Arc<dyn MatchStore>, broadcaster: Broadcaster) -> Self {
        MatchService { store, broadcaster }
    }

    // ── Queries ───────────────────────────────────────────────────────────────

    pub async fn list(&self) -> MatchResult<Vec<Match>> {
        Ok(self.store.list_all(SortOrder::Ascending).await?)
    }

    pub async fn get(&self, id: MatchId) -> MatchResult<Match> {
        self.store
            .find_by_id(id)
            .await?
            .ok_or(MatchError::NotFound(id))
    }

    // ── Mutations ─────────────────────────────────────────────────────────────

    /// Store a new scheduled match and announce it to list subscribers only.
    pub async fn create(&self, new: NewMatch) -> MatchResult<Match> {
        validate_new_match(&new)?;

        if self
            .store
            .find_by_teams_and_date(&new.team_a, &new.team_b, new.date)
            .await?
            .is_some()
        {
            return Err(MatchError::Duplicate);
        }

        let stored = self.store.insert(&new).await?;
        info!(
            "Match {} added: {} vs {} ({})",
            stored.id, stored.team_a, stored.team_b, stored.date
        );

        self.broadcaster.publish_to_topic(
            &Topic::AllMatches,
            &StreamEvent::MatchAdded {
                record: stored.clone(),
            },
        );
        Ok(stored)
    }

    /// Move a match forward along scheduled → live → finished.
    pub async fn change_status(&self, id: MatchId, new_status: MatchStatus) -> MatchResult<Match> {
        let current = self.get(id).await?;
        ensure_forward(current.status, new_status)?;

        let patch = MatchPatch {
            expect_status: Some(current.status),
            status: Some(new_status),
            ..Default::default()
        };
        let updated = self.apply(id, &patch).await?;
        info!("Match {} status {} → {}", id, current.status, new_status);

        self.publish_match_change(
            StreamEvent::MatchStatusChanged {
                match_id: id,
                new_status,
                record: updated.clone(),
            },
            &updated,
        );
        Ok(updated)
    }

    /// Put a match live with its clock reset to zero.
    pub async fn start(&self, id: MatchId) -> MatchResult<Match> {
        let current = self.get(id).await?;
        ensure_forward(current.status, MatchStatus::Live)?;

        let patch = MatchPatch {
            expect_status: Some(current.status),
            status: Some(MatchStatus::Live),
            time: Some(0),
            ..Default::default()
        };
        let updated = self.apply(id, &patch).await?;
        info!("Match {} started: {} vs {}", id, updated.team_a, updated.team_b);

        self.publish_match_change(
            StreamEvent::MatchStarted {
                match_id: id,
                record: updated.clone(),
            },
            &updated,
        );
        Ok(updated)
    }

    /// Append an event; a goal also bumps the scoring side by one.
    pub async fn add_event(&self, id: MatchId, event: MatchEvent) -> MatchResult<Match> {
        if event.player.trim().is_empty() {
            return Err(MatchError::validation("player is required"));
        }

        let mut patch = MatchPatch {
            push_event: Some(event.clone()),
            ..Default::default()
        };
        if event.event_type == EventKind::Goal {
            match event.team {
                Side::TeamA => patch.score_a = Some(ScoreChange::Add(1)),
                Side::TeamB => patch.score_b = Some(ScoreChange::Add(1)),
            }
        }
        let updated = self.apply(id, &patch).await?;
        info!(
            "Match {} event: {} {} {}' ({}-{})",
            id,
            event.event_type.as_str(),
            event.player,
            event.minute,
            updated.score_a,
            updated.score_b
        );

        self.publish_match_change(
            StreamEvent::MatchEvent {
                match_id: id,
                event,
                record: updated.clone(),
            },
            &updated,
        );
        Ok(updated)
    }

    /// Overwrite both scores. Not reconciled against the recorded goals.
    pub async fn update_score(&self, id: MatchId, score_a: u32, score_b: u32) -> MatchResult<Match> {
        let patch = MatchPatch {
            score_a: Some(ScoreChange::Set(score_a)),
            score_b: Some(ScoreChange::Set(score_b)),
            ..Default::default()
        };
        let updated = self.apply(id, &patch).await?;
        info!("Match {} score set to {}-{}", id, score_a, score_b);

        self.publish_match_change(StreamEvent::updated(updated.clone()), &updated);
        Ok(updated)
    }

    // ── Subscriptions ─────────────────────────────────────────────────────────

    /// Register a list subscriber and build its `INITIAL_DATA` snapshot.
    ///
    /// Registration happens before the snapshot is read so that nothing
    /// published in between is lost; the subscription unregisters itself if
    /// the snapshot read fails.
    pub async fn subscribe_all(&self) -> MatchResult<(StreamEvent, Subscription)> {
        let subscription = self.broadcaster.registry().subscribe(Topic::AllMatches);
        let matches = self.store.list_all(SortOrder::Ascending).await?;
        Ok((StreamEvent::InitialData { matches }, subscription))
    }

    /// Register a single-match subscriber. The snapshot is `None` when the
    /// match does not exist; the subscription stays open regardless.
    pub async fn subscribe_match(
        &self,
        id: MatchId,
    ) -> MatchResult<(Option<StreamEvent>, Subscription)> {
        let subscription = self.broadcaster.registry().subscribe(Topic::Match(id));
        let snapshot = self
            .store
            .find_by_id(id)
            .await?
            .map(|record| StreamEvent::InitialMatchData { record });
        Ok((snapshot, subscription))
    }

    // ── Helpers ───────────────────────────────────────────────────────────────

    /// Write a patch. A status check that lost a race with another writer
    /// surfaces as `InvalidTransition` from the status it lost to.
    async fn apply(&self, id: MatchId, patch: &MatchPatch) -> MatchResult<Match> {
        let err = match self.store.update_by_id(id, patch).await {
            Ok(updated) => return updated.ok_or(MatchError::NotFound(id)),
            Err(err) => err,
        };
        match err.downcast::<PatchRejected>() {
            Ok(PatchRejected::StatusChanged { actual, .. }) => Err(MatchError::InvalidTransition {
                from: actual,
                to: patch.status.unwrap_or(actual),
            }),
            Ok(rejected @ PatchRejected::ScoreOverflow { .. }) => {
                Err(MatchError::validation(rejected.to_string()))
            }
            Err(err) => Err(MatchError::Store(err)),
        }
    }

    fn publish_match_change(&self, scoped: StreamEvent, updated: &Match) {
        self.broadcaster
            .publish_to_topic(&Topic::Match(updated.id), &scoped);
        self.broadcaster
            .publish_to_topic(&Topic::AllMatches, &StreamEvent::updated(updated.clone()));
    }
}

fn ensure_forward(from: MatchStatus, to: MatchStatus) -> MatchResult<()> {
    if from.can_advance_to(to) {
        Ok(())
    } else {
        Err(MatchError::InvalidTransition { from, to })
    }
}

fn validate_new_match(new: &NewMatch) -> MatchResult<()> {
    let required = [
        ("teamA", &new.team_a),
        ("teamB", &new.team_b),
        ("location", &new.location),
        ("competition", &new.competition),
    ];
    for (field, value) in required {
        if value.trim().is_empty() {
            return Err(MatchError::validation(format!("{} is required", field)));
        }
    }
    Ok(())
}
