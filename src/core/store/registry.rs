use anyhow::Result;
use rusqlite::params;

use super::types::{AgentRegistryRecord, AgentStatus, json_column};
use super::{Store, now_millis};

impl Store {
    /// Inserts or refreshes a registry row. Status and heartbeat are kept.
    pub async fn upsert_agent(
        &self,
        agent_id: &str,
        name: &str,
        agent_type: &str,
        capabilities: &[&str],
    ) -> Result<()> {
        let db = self.db.lock().await;
        db.execute(
            "INSERT INTO agent_registry (agent_id, agent_name, agent_type, capabilities, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(agent_id) DO UPDATE SET
                agent_name = excluded.agent_name,
                agent_type = excluded.agent_type,
                capabilities = excluded.capabilities",
            params![
                agent_id,
                name,
                agent_type,
                serde_json::to_string(capabilities)?,
                now_millis()
            ],
        )?;
        Ok(())
    }

    /// Flips an agent between idle and busy and refreshes its heartbeat.
    pub async fn set_agent_status(
        &self,
        agent_id: &str,
        status: AgentStatus,
        session_id: Option<&str>,
    ) -> Result<()> {
        let db = self.db.lock().await;
        db.execute(
            "UPDATE agent_registry SET status = ?2, current_session_id = ?3, last_heartbeat = ?4
             WHERE agent_id = ?1",
            params![agent_id, status.as_str(), session_id, now_millis()],
        )?;
        Ok(())
    }

    /// Marks every agent still bound to `session_id` idle. Returns how many.
    pub async fn release_session_agents(&self, session_id: &str) -> Result<usize> {
        let db = self.db.lock().await;
        let rows = db.execute(
            "UPDATE agent_registry SET status = ?2, current_session_id = NULL, last_heartbeat = ?3
             WHERE current_session_id = ?1",
            params![session_id, AgentStatus::Idle.as_str(), now_millis()],
        )?;
        Ok(rows)
    }

    pub async fn list_agents(&self) -> Result<Vec<AgentRegistryRecord>> {
        let db = self.db.lock().await;
        let mut stmt = db.prepare(
            "SELECT agent_id, agent_name, agent_type, capabilities, status, current_session_id, last_heartbeat
             FROM agent_registry ORDER BY rowid ASC",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok(AgentRegistryRecord {
                agent_id: row.get(0)?,
                name: row.get(1)?,
                agent_type: row.get(2)?,
                capabilities: json_column(row, 3)?,
                status: row.get(4)?,
                current_session_id: row.get(5)?,
                last_heartbeat: row.get(6)?,
            })
        })?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }
}
