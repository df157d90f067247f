use chrono::Utc;
use libsql::{params, Connection};

use crate::error::Result;
use crate::models::NewSnowmanResponse;

pub struct ResponseRepository;

impl ResponseRepository {
    pub async fn insert(
        conn: &Connection,
        run_id: &str,
        response: &NewSnowmanResponse,
    ) -> Result<i64> {
        let created_at = Utc::now().to_rfc3339();

        conn.execute(
            r#"
            INSERT INTO snowman_responses (
                run_id, persona_id, query_id, query, response, response_time, created_at
            ) VALUES (
                ?1, ?2, ?3, ?4, ?5, ?6, ?7
            )
            "#,
            params![
                run_id,
                response.persona_id,
                response.query_id,
                response.query.as_str(),
                response.response.as_str(),
                response.response_time_secs,
                created_at,
            ],
        )
        .await?;

        Ok(conn.last_insert_rowid())
    }

    pub async fn count(conn: &Connection, run_id: Option<&str>) -> Result<u64> {
        let mut rows = match run_id {
            Some(run_id) => {
                conn.query(
                    "SELECT COUNT(*) FROM snowman_responses WHERE run_id = ?1",
                    params![run_id],
                )
                .await?
            }
            None => conn.query("SELECT COUNT(*) FROM snowman_responses", ()).await?,
        };

        match rows.next().await? {
            Some(row) => Ok(row.get::<i64>(0)? as u64),
            None => Ok(0),
        }
    }

    /// Responses pointing at a missing query, or at a query that belongs to
    /// a different persona than the response claims.
    pub async fn count_orphans(conn: &Connection) -> Result<u64> {
        let mut rows = conn
            .query(
                r#"
                SELECT COUNT(*) FROM snowman_responses r
                LEFT JOIN gift_queries q ON r.query_id = q.id
                WHERE q.id IS NULL OR q.persona_id != r.persona_id
                "#,
                (),
            )
            .await?;

        match rows.next().await? {
            Some(row) => Ok(row.get::<i64>(0)? as u64),
            None => Ok(0),
        }
    }
}
