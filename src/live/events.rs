//! Wire envelope pushed to stream subscribers.
//!
//! Every event serializes to one JSON object tagged by `type`, e.g.
//! `{"type":"MATCH_UPDATED","matchId":3,"match":{...}}`.

use serde::Serialize;

use crate::db::models::{Match, MatchEvent, MatchId, MatchStatus};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StreamEvent {
    /// Snapshot for a list subscription
    InitialData { matches: Vec<Match> },
    /// Snapshot for a single-match subscription
    InitialMatchData {
        #[serde(rename = "match")]
        record: Match,
    },
    MatchAdded {
        #[serde(rename = "match")]
        record: Match,
    },
    MatchUpdated {
        #[serde(rename = "matchId")]
        match_id: MatchId,
        #[serde(rename = "match")]
        record: Match,
    },
    MatchStatusChanged {
        #[serde(rename = "matchId")]
        match_id: MatchId,
        #[serde(rename = "newStatus")]
        new_status: MatchStatus,
        #[serde(rename = "match")]
        record: Match,
    },
    MatchStarted {
        #[serde(rename = "matchId")]
        match_id: MatchId,
        #[serde(rename = "match")]
        record: Match,
    },
    MatchEvent {
        #[serde(rename = "matchId")]
        match_id: MatchId,
        event: MatchEvent,
        #[serde(rename = "match")]
        record: Match,
    },
    /// Keep-alive, ignorable by consumers
    Ping,
}

impl StreamEvent {
    /// The list-view counterpart of a match mutation.
    pub fn updated(record: Match) -> Self {
        StreamEvent::MatchUpdated {
            match_id: record.id,
            record,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            StreamEvent::InitialData { .. } => "INITIAL_DATA",
            StreamEvent::InitialMatchData { .. } => "INITIAL_MATCH_DATA",
            StreamEvent::MatchAdded { .. } => "MATCH_ADDED",
            StreamEvent::MatchUpdated { .. } => "MATCH_UPDATED",
            StreamEvent::MatchStatusChanged { .. } => "MATCH_STATUS_CHANGED",
            StreamEvent::MatchStarted { .. } => "MATCH_STARTED",
            StreamEvent::MatchEvent { .. } => "MATCH_EVENT",
            StreamEvent::Ping => "PING",
        }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::models::{EventKind, Side};
    use chrono::{TimeZone, Utc};
    use serde_json::{json, Value};

    fn sample() -> Match {
        let at = Utc.with_ymd_and_hms(2026, 5, 1, 15, 0, 0).unwrap();
        Match {
            id: 3,
            team_a: "A".into(),
            team_b: "B".into(),
            location: "Stadium".into(),
            competition: "Cup".into(),
            date: at,
            status: MatchStatus::Live,
            time: 12,
            score_a: 1,
            score_b: 0,
            events: vec![],
            created_at: at,
            updated_at: at,
        }
    }

    fn parse(ev: &StreamEvent) -> Value {
        serde_json::from_str(&ev.to_json().unwrap()).unwrap()
    }

    #[test]
    fn test_ping_is_bare_type() {
        assert_eq!(parse(&StreamEvent::Ping), json!({ "type": "PING" }));
    }

    #[test]
    fn test_type_tag_matches_kind() {
        let events = [
            StreamEvent::InitialData { matches: vec![sample()] },
            StreamEvent::InitialMatchData { record: sample() },
            StreamEvent::MatchAdded { record: sample() },
            StreamEvent::updated(sample()),
            StreamEvent::MatchStarted { match_id: 3, record: sample() },
            StreamEvent::Ping,
        ];
        for ev in &events {
            assert_eq!(parse(ev)["type"], ev.kind());
        }
    }

    #[test]
    fn test_status_changed_payload() {
        let ev = StreamEvent::MatchStatusChanged {
            match_id: 3,
            new_status: MatchStatus::Finished,
            record: sample(),
        };
        let v = parse(&ev);
        assert_eq!(v["type"], "MATCH_STATUS_CHANGED");
        assert_eq!(v["matchId"], 3);
        assert_eq!(v["newStatus"], "finished");
        assert_eq!(v["match"]["teamA"], "A");
        assert_eq!(v["match"]["scoreA"], 1);
    }

    #[test]
    fn test_match_event_payload() {
        let ev = StreamEvent::MatchEvent {
            match_id: 3,
            event: MatchEvent {
                event_type: EventKind::YellowCard,
                team: Side::TeamB,
                player: "Smith".into(),
                minute: 23,
            },
            record: sample(),
        };
        let v = parse(&ev);
        assert_eq!(
            v["event"],
            json!({ "eventType": "yellow_card", "team": "teamB", "player": "Smith", "minute": 23 })
        );
        assert_eq!(v["match"]["id"], 3);
    }
}
