use anyhow::{anyhow, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::sync::{Arc, Mutex, MutexGuard};
use thiserror::Error;

pub mod models;
pub mod store;

use models::*;
pub use store::MatchStore;

/// A patch refused inside its transaction; nothing was written.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PatchRejected {
    #[error("match status is {actual}, expected {expected}")]
    StatusChanged {
        expected: MatchStatus,
        actual: MatchStatus,
    },
    #[error("{side} score is already at its maximum")]
    ScoreOverflow { side: Side },
}

/// Thread-safe SQLite connection pool (single connection with mutex)
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    /// Open (or create) the SQLite database at the given path
    pub fn open(path: &str) -> Result<Self> {
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;
        let db = Database {
            conn: Arc::new(Mutex::new(conn)),
        };
        db.run_migrations()?;
        Ok(db)
    }

    /// Fresh private database, used by tests and `--database-path :memory:`
    pub fn open_in_memory() -> Result<Self> {
        Self::open(":memory:")
    }

    /// Run schema migrations (idempotent)
    fn run_migrations(&self) -> Result<()> {
        let conn = self.lock()?;
        conn.execute_batch(SCHEMA_SQL)?;
        Ok(())
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| anyhow!("database connection mutex poisoned"))
    }

    // ── Matches ───────────────────────────────────────────────────────────────

    /// Load a match with its events
    pub fn get_match(&self, id: MatchId) -> Result<Option<Match>> {
        let conn = self.lock()?;
        Ok(load_match(&conn, id)?)
    }

    /// Find a match with exactly these teams (in this order) and kick-off
    pub fn find_duplicate(
        &self,
        team_a: &str,
        team_b: &str,
        date: DateTime<Utc>,
    ) -> Result<Option<Match>> {
        let conn = self.lock()?;
        let id: Option<MatchId> = conn
            .query_row(
                "SELECT id FROM matches WHERE team_a=?1 AND team_b=?2 AND date=?3 LIMIT 1",
                params![team_a, team_b, date],
                |row| row.get(0),
            )
            .optional()?;
        match id {
            Some(id) => Ok(load_match(&conn, id)?),
            None => Ok(None),
        }
    }

    /// Insert a new scheduled match and return the stored record
    pub fn insert_match(&self, new: &NewMatch) -> Result<Match> {
        let conn = self.lock()?;
        let now = Utc::now();
        conn.execute(
            "INSERT INTO matches (
                team_a, team_b, location, competition, date,
                status, time, score_a, score_b, created_at, updated_at
             ) VALUES (?1,?2,?3,?4,?5,?6,0,0,0,?7,?7)",
            params![
                new.team_a,
                new.team_b,
                new.location,
                new.competition,
                new.date,
                MatchStatus::Scheduled.as_str(),
                now,
            ],
        )?;
        let id = conn.last_insert_rowid();
        load_match(&conn, id)?.ok_or_else(|| anyhow!("match {} vanished after insert", id))
    }

    /// Apply a patch in one transaction. Returns `None` if the match does not exist,
    /// and a [`PatchRejected`] error if the stored row no longer allows it.
    pub fn update_match(&self, id: MatchId, patch: &MatchPatch) -> Result<Option<Match>> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;

        let stored: Option<String> = tx
            .query_row("SELECT status FROM matches WHERE id=?1", params![id], |row| {
                row.get(0)
            })
            .optional()?;
        let Some(stored) = stored else {
            return Ok(None);
        };
        if let Some(expected) = patch.expect_status {
            let actual = MatchStatus::parse(&stored)
                .ok_or_else(|| anyhow!("match {} has unknown status '{}'", id, stored))?;
            if actual != expected {
                return Err(PatchRejected::StatusChanged { expected, actual }.into());
            }
        }

        if let Some(status) = patch.status {
            tx.execute(
                "UPDATE matches SET status=?1 WHERE id=?2",
                params![status.as_str(), id],
            )?;
        }
        if let Some(time) = patch.time {
            tx.execute("UPDATE matches SET time=?1 WHERE id=?2", params![time, id])?;
        }
        if let Some(change) = patch.score_a {
            apply_score_change(&tx, Side::TeamA, change, id)?;
        }
        if let Some(change) = patch.score_b {
            apply_score_change(&tx, Side::TeamB, change, id)?;
        }
        if let Some(ev) = &patch.push_event {
            tx.execute(
                "INSERT INTO match_events (match_id, event_type, team, player, minute)
                 VALUES (?1,?2,?3,?4,?5)",
                params![id, ev.event_type.as_str(), ev.team.as_str(), ev.player, ev.minute],
            )?;
        }
        tx.execute(
            "UPDATE matches SET updated_at=?1 WHERE id=?2",
            params![Utc::now(), id],
        )?;

        let updated = load_match(&tx, id)?;
        tx.commit()?;
        Ok(updated)
    }

    /// All matches with their events, ordered by scheduled date
    pub fn list_matches(&self, order: SortOrder) -> Result<Vec<Match>> {
        let conn = self.lock()?;
        let sql = match order {
            SortOrder::Ascending => "SELECT id FROM matches ORDER BY date ASC, id ASC",
            SortOrder::Descending => "SELECT id FROM matches ORDER BY date DESC, id DESC",
        };
        let mut stmt = conn.prepare(sql)?;
        let ids = stmt
            .query_map([], |row| row.get::<_, MatchId>(0))?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        let mut matches = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(m) = load_match(&conn, id)? {
                matches.push(m);
            }
        }
        Ok(matches)
    }
}

// ── SQL helpers ────────────────────────────────────────────────────────────────

/// Caller must hold the transaction so an `Add` reads and writes the same row state.
fn apply_score_change(
    conn: &Connection,
    side: Side,
    change: ScoreChange,
    id: MatchId,
) -> Result<()> {
    let column = match side {
        Side::TeamA => "score_a",
        Side::TeamB => "score_b",
    };
    let value = match change {
        ScoreChange::Set(n) => n,
        ScoreChange::Add(n) => {
            let current: u32 = conn.query_row(
                &format!("SELECT {column} FROM matches WHERE id=?1"),
                params![id],
                |row| row.get(0),
            )?;
            current
                .checked_add(n)
                .ok_or(PatchRejected::ScoreOverflow { side })?
        }
    };
    conn.execute(
        &format!("UPDATE matches SET {column}=?1 WHERE id=?2"),
        params![value, id],
    )?;
    Ok(())
}

fn load_match(conn: &Connection, id: MatchId) -> rusqlite::Result<Option<Match>> {
    let record = conn
        .query_row(
            "SELECT id, team_a, team_b, location, competition, date,
                    status, time, score_a, score_b, created_at, updated_at
             FROM matches WHERE id=?1",
            params![id],
            map_match,
        )
        .optional()?;
    let Some(mut record) = record else {
        return Ok(None);
    };
    record.events = load_events(conn, id)?;
    Ok(Some(record))
}

fn load_events(conn: &Connection, match_id: MatchId) -> rusqlite::Result<Vec<MatchEvent>> {
    let mut stmt = conn.prepare(
        "SELECT event_type, team, player, minute
         FROM match_events WHERE match_id=?1 ORDER BY id ASC",
    )?;
    let events = stmt
        .query_map(params![match_id], map_event)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(events)
}

fn map_match(row: &rusqlite::Row) -> rusqlite::Result<Match> {
    let status: String = row.get(6)?;
    Ok(Match {
        id: row.get(0)?,
        team_a: row.get(1)?,
        team_b: row.get(2)?,
        location: row.get(3)?,
        competition: row.get(4)?,
        date: row.get(5)?,
        status: MatchStatus::parse(&status).ok_or_else(|| unknown_value(6, "status", &status))?,
        time: row.get(7)?,
        score_a: row.get(8)?,
        score_b: row.get(9)?,
        events: Vec::new(),
        created_at: row.get(10)?,
        updated_at: row.get(11)?,
    })
}

fn map_event(row: &rusqlite::Row) -> rusqlite::Result<MatchEvent> {
    let kind: String = row.get(0)?;
    let team: String = row.get(1)?;
    Ok(MatchEvent {
        event_type: EventKind::parse(&kind).ok_or_else(|| unknown_value(0, "event_type", &kind))?,
        team: Side::parse(&team).ok_or_else(|| unknown_value(1, "team", &team))?,
        player: row.get(2)?,
        minute: row.get(3)?,
    })
}

fn unknown_value(idx: usize, column: &str, value: &str) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(
        idx,
        rusqlite::types::Type::Text,
        format!("unknown {} '{}'", column, value).into(),
    )
}

/// SQLite schema (idempotent CREATE IF NOT EXISTS)
pub const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS matches (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    team_a      TEXT    NOT NULL,
    team_b      TEXT    NOT NULL,
    location    TEXT    NOT NULL,
    competition TEXT    NOT NULL,
    date        TEXT    NOT NULL,
    status      TEXT    NOT NULL DEFAULT 'scheduled',
    time        INTEGER NOT NULL DEFAULT 0,
    score_a     INTEGER NOT NULL DEFAULT 0,
    score_b     INTEGER NOT NULL DEFAULT 0,
    created_at  TEXT    NOT NULL,
    updated_at  TEXT    NOT NULL
);

CREATE TABLE IF NOT EXISTS match_events (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    match_id    INTEGER NOT NULL,
    event_type  TEXT    NOT NULL,
    team        TEXT    NOT NULL,
    player      TEXT    NOT NULL,
    minute      INTEGER NOT NULL,
    FOREIGN KEY (match_id) REFERENCES matches(id)
);

CREATE INDEX IF NOT EXISTS idx_matches_identity ON matches(team_a, team_b, date);
CREATE INDEX IF NOT EXISTS idx_match_events_match ON match_events(match_id);
"#;

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn new_match(a: &str, b: &str, day: u32) -> NewMatch {
        NewMatch {
            team_a: a.into(),
            team_b: b.into(),
            location: "Stadium".into(),
            competition: "League".into(),
            date: Utc.with_ymd_and_hms(2026, 5, day, 15, 0, 0).unwrap(),
        }
    }

    fn goal(team: Side, player: &str, minute: u32) -> MatchEvent {
        MatchEvent {
            event_type: EventKind::Goal,
            team,
            player: player.into(),
            minute,
        }
    }

    #[test]
    fn test_insert_defaults() {
        let db = Database::open_in_memory().unwrap();
        let m = db.insert_match(&new_match("A", "B", 1)).unwrap();
        assert_eq!(m.status, MatchStatus::Scheduled);
        assert_eq!((m.time, m.score_a, m.score_b), (0, 0, 0));
        assert!(m.events.is_empty());
        assert_eq!(db.get_match(m.id).unwrap(), Some(m));
    }

    #[test]
    fn test_get_missing_match() {
        let db = Database::open_in_memory().unwrap();
        assert!(db.get_match(42).unwrap().is_none());
    }

    #[test]
    fn test_find_duplicate_is_order_sensitive() {
        let db = Database::open_in_memory().unwrap();
        let stored = db.insert_match(&new_match("A", "B", 1)).unwrap();
        let date = stored.date;

        let dup = db.find_duplicate("A", "B", date).unwrap();
        assert_eq!(dup.map(|m| m.id), Some(stored.id));
        assert!(db.find_duplicate("B", "A", date).unwrap().is_none());
        assert!(db
            .find_duplicate("A", "B", new_match("A", "B", 2).date)
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_update_missing_match_returns_none() {
        let db = Database::open_in_memory().unwrap();
        let patch = MatchPatch {
            status: Some(MatchStatus::Live),
            ..Default::default()
        };
        assert!(db.update_match(7, &patch).unwrap().is_none());
    }

    #[test]
    fn test_update_applies_all_fields() {
        let db = Database::open_in_memory().unwrap();
        let m = db.insert_match(&new_match("A", "B", 1)).unwrap();
        let patch = MatchPatch {
            expect_status: Some(MatchStatus::Scheduled),
            status: Some(MatchStatus::Live),
            time: Some(0),
            score_a: Some(ScoreChange::Set(3)),
            score_b: Some(ScoreChange::Add(1)),
            push_event: None,
        };
        let updated = db.update_match(m.id, &patch).unwrap().unwrap();
        assert_eq!(updated.status, MatchStatus::Live);
        assert_eq!(updated.score_a, 3);
        assert_eq!(updated.score_b, 1);
        assert!(updated.updated_at >= m.updated_at);
    }

    #[test]
    fn test_update_rejects_stale_expected_status() {
        let db = Database::open_in_memory().unwrap();
        let m = db.insert_match(&new_match("A", "B", 1)).unwrap();
        let finish = MatchPatch {
            status: Some(MatchStatus::Finished),
            ..Default::default()
        };
        let finished = db.update_match(m.id, &finish).unwrap().unwrap();

        let start = MatchPatch {
            expect_status: Some(MatchStatus::Scheduled),
            status: Some(MatchStatus::Live),
            time: Some(0),
            ..Default::default()
        };
        let err = db.update_match(m.id, &start).unwrap_err();
        assert_eq!(
            err.downcast_ref::<PatchRejected>(),
            Some(&PatchRejected::StatusChanged {
                expected: MatchStatus::Scheduled,
                actual: MatchStatus::Finished,
            })
        );
        assert_eq!(db.get_match(m.id).unwrap(), Some(finished));
    }

    #[test]
    fn test_goal_past_max_score_is_rejected() {
        let db = Database::open_in_memory().unwrap();
        let m = db.insert_match(&new_match("A", "B", 1)).unwrap();
        let maxed = MatchPatch {
            score_a: Some(ScoreChange::Set(u32::MAX)),
            ..Default::default()
        };
        db.update_match(m.id, &maxed).unwrap();

        let goal_patch = MatchPatch {
            score_a: Some(ScoreChange::Add(1)),
            push_event: Some(goal(Side::TeamA, "Smith", 90)),
            ..Default::default()
        };
        let err = db.update_match(m.id, &goal_patch).unwrap_err();
        assert_eq!(
            err.downcast_ref::<PatchRejected>(),
            Some(&PatchRejected::ScoreOverflow { side: Side::TeamA })
        );
        let stored = db.get_match(m.id).unwrap().unwrap();
        assert_eq!(stored.score_a, u32::MAX);
        assert!(stored.events.is_empty());
    }

    #[test]
    fn test_events_keep_insertion_order() {
        let db = Database::open_in_memory().unwrap();
        let m = db.insert_match(&new_match("A", "B", 1)).unwrap();
        for ev in [goal(Side::TeamB, "Late", 80), goal(Side::TeamA, "Early", 5)] {
            let patch = MatchPatch {
                push_event: Some(ev),
                ..Default::default()
            };
            db.update_match(m.id, &patch).unwrap();
        }
        let stored = db.get_match(m.id).unwrap().unwrap();
        let minutes: Vec<u32> = stored.events.iter().map(|e| e.minute).collect();
        assert_eq!(minutes, vec![80, 5]);
        assert_eq!(stored.events[0].team, Side::TeamB);
    }

    #[test]
    fn test_list_sort_order() {
        let db = Database::open_in_memory().unwrap();
        db.insert_match(&new_match("Late", "X", 20)).unwrap();
        db.insert_match(&new_match("Early", "Y", 3)).unwrap();

        let asc = db.list_matches(SortOrder::Ascending).unwrap();
        assert_eq!(asc[0].team_a, "Early");
        let desc = db.list_matches(SortOrder::Descending).unwrap();
        assert_eq!(desc[0].team_a, "Late");
    }
}
