use anyhow::Result;
use rusqlite::{Row, params};
use serde_json::Value;

use super::types::{EventQuery, EventRecord, json_column, optional_json_column};
use super::{Store, now_millis};

const EVENT_COLUMNS: &str =
    "id, event_type, session_id, agent_id, sequence_number, event_data, metadata, timestamp";

fn event_from_row(row: &Row<'_>) -> rusqlite::Result<EventRecord> {
    Ok(EventRecord {
        id: row.get(0)?,
        event_type: row.get(1)?,
        session_id: row.get(2)?,
        agent_id: row.get(3)?,
        sequence: row.get(4)?,
        data: json_column(row, 5)?,
        metadata: optional_json_column(row, 6)?,
        timestamp: row.get(7)?,
    })
}

impl Store {
    /// Appends an event. The sequence number is read and inserted inside one
    /// transaction while the connection lock is held, so per-session
    /// sequences stay gapless and 1-based.
    pub async fn append_event(
        &self,
        session_id: &str,
        event_type: &str,
        agent_id: Option<&str>,
        data: &Value,
        metadata: Option<&Value>,
    ) -> Result<EventRecord> {
        let mut db = self.db.lock().await;
        let tx = db.transaction()?;
        let sequence: i64 = tx.query_row(
            "SELECT COALESCE(MAX(sequence_number), 0) + 1 FROM events WHERE session_id = ?1",
            params![session_id],
            |row| row.get(0),
        )?;
        let record = EventRecord {
            id: uuid::Uuid::new_v4().to_string(),
            event_type: event_type.to_string(),
            session_id: session_id.to_string(),
            agent_id: agent_id.map(str::to_string),
            sequence,
            data: data.clone(),
            metadata: metadata.cloned(),
            timestamp: now_millis(),
        };
        tx.execute(
            "INSERT INTO events (id, event_type, session_id, agent_id, sequence_number, event_data, metadata, timestamp)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                record.id,
                record.event_type,
                record.session_id,
                record.agent_id,
                record.sequence,
                record.data.to_string(),
                record.metadata.as_ref().map(Value::to_string),
                record.timestamp
            ],
        )?;
        tx.commit()?;
        Ok(record)
    }

    /// Events in sequence order, filtered by `query`.
    pub async fn list_events(
        &self,
        session_id: &str,
        query: &EventQuery,
    ) -> Result<Vec<EventRecord>> {
        let db = self.db.lock().await;
        let sql = format!(
            "SELECT {} FROM events
             WHERE session_id = ?1
               AND (?2 IS NULL OR event_type = ?2)
               AND (?3 IS NULL OR sequence_number > ?3)
             ORDER BY sequence_number ASC
             LIMIT ?4",
            EVENT_COLUMNS
        );
        let limit = query.limit.map(|l| l as i64).unwrap_or(-1);
        let mut stmt = db.prepare(&sql)?;
        let rows = stmt.query_map(
            params![session_id, query.event_type, query.after_seq, limit],
            event_from_row,
        )?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    /// The `limit` most recent events, oldest first.
    pub async fn recent_events(&self, session_id: &str, limit: usize) -> Result<Vec<EventRecord>> {
        let db = self.db.lock().await;
        let sql = format!(
            "SELECT {} FROM events WHERE session_id = ?1
             ORDER BY sequence_number DESC LIMIT ?2",
            EVENT_COLUMNS
        );
        let mut stmt = db.prepare(&sql)?;
        let rows = stmt.query_map(params![session_id, limit as i64], event_from_row)?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        out.reverse();
        Ok(out)
    }

    pub async fn count_events(&self, session_id: &str) -> Result<i64> {
        let db = self.db.lock().await;
        let count = db.query_row(
            "SELECT COUNT(*) FROM events WHERE session_id = ?1",
            params![session_id],
            |row| row.get(0),
        )?;
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::store::test_store;
    use serde_json::json;

    #[tokio::test]
    async fn sequences_are_gapless_and_per_session() {
        let store = test_store();
        let a = store.create_session("a", "/p").await.unwrap();
        let b = store.create_session("b", "/p").await.unwrap();

        for i in 0..5 {
            store
                .append_event(&a.id, "tick", None, &json!({ "i": i }), None)
                .await
                .unwrap();
        }
        let first_b = store
            .append_event(&b.id, "tick", Some("qa-agent"), &json!({}), None)
            .await
            .unwrap();
        assert_eq!(first_b.sequence, 1);

        let events = store
            .list_events(&a.id, &EventQuery::default())
            .await
            .unwrap();
        let seqs: Vec<i64> = events.iter().map(|e| e.sequence).collect();
        assert_eq!(seqs, vec![1, 2, 3, 4, 5]);
        assert_eq!(events[3].data, json!({ "i": 3 }));
        assert_eq!(store.count_events(&a.id).await.unwrap(), 5);
    }

    #[tokio::test]
    async fn concurrent_appends_never_collide() {
        let store = test_store();
        let session = store.create_session("goal", "/p").await.unwrap();
        let mut handles = Vec::new();
        for i in 0..20 {
            let store = store.clone();
            let id = session.id.clone();
            handles.push(tokio::spawn(async move {
                store
                    .append_event(&id, "tick", None, &json!({ "i": i }), None)
                    .await
                    .unwrap()
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }
        let events = store
            .list_events(&session.id, &EventQuery::default())
            .await
            .unwrap();
        let seqs: Vec<i64> = events.iter().map(|e| e.sequence).collect();
        assert_eq!(seqs, (1..=20).collect::<Vec<i64>>());
    }

    #[tokio::test]
    async fn query_filters_compose() {
        let store = test_store();
        let session = store.create_session("goal", "/p").await.unwrap();
        for kind in ["a", "b", "a", "b", "a"] {
            store
                .append_event(&session.id, kind, None, &json!({}), Some(&json!({ "k": kind })))
                .await
                .unwrap();
        }

        let only_a = store
            .list_events(
                &session.id,
                &EventQuery {
                    event_type: Some("a".into()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(only_a.iter().map(|e| e.sequence).collect::<Vec<_>>(), vec![1, 3, 5]);
        assert_eq!(only_a[0].metadata, Some(json!({ "k": "a" })));

        let after = store
            .list_events(
                &session.id,
                &EventQuery {
                    after_seq: Some(2),
                    limit: Some(2),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(after.iter().map(|e| e.sequence).collect::<Vec<_>>(), vec![3, 4]);
    }

    #[tokio::test]
    async fn recent_events_are_newest_window_in_order() {
        let store = test_store();
        let session = store.create_session("goal", "/p").await.unwrap();
        for i in 0..8 {
            store
                .append_event(&session.id, "tick", None, &json!({ "i": i }), None)
                .await
                .unwrap();
        }
        let recent = store.recent_events(&session.id, 3).await.unwrap();
        assert_eq!(recent.iter().map(|e| e.sequence).collect::<Vec<_>>(), vec![6, 7, 8]);
    }

    #[tokio::test]
    async fn unknown_session_is_rejected() {
        let store = test_store();
        let err = store
            .append_event("no-such-session", "tick", None, &json!({}), None)
            .await;
        assert!(err.is_err());
    }
}
