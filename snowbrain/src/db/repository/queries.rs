use chrono::{DateTime, Utc};
use libsql::{params, Connection};

use crate::error::Result;
use crate::models::{GiftQuery, GiftQueryHit, NewGiftQuery};

pub struct QueryRepository;

impl QueryRepository {
    pub async fn insert(conn: &Connection, run_id: &str, query: &NewGiftQuery) -> Result<i64> {
        let embedding_json = serde_json::to_string(&query.embedding)?;
        let created_at = Utc::now().to_rfc3339();

        conn.execute(
            r#"
            INSERT INTO gift_queries (
                run_id, persona_id, query, context, embedding, created_at
            ) VALUES (
                ?1, ?2, ?3, ?4, vector32(?5), ?6
            )
            "#,
            params![
                run_id,
                query.persona_id,
                query.text.as_str(),
                query.context.as_str(),
                embedding_json,
                created_at,
            ],
        )
        .await?;

        Ok(conn.last_insert_rowid())
    }

    pub async fn get_by_id(conn: &Connection, id: i64) -> Result<Option<GiftQuery>> {
        let mut rows = conn
            .query(
                r#"
                SELECT id, persona_id, query, context, vector_extract(embedding), created_at
                FROM gift_queries
                WHERE id = ?1
                "#,
                params![id],
            )
            .await?;

        let Some(row) = rows.next().await? else {
            return Ok(None);
        };

        let embedding = row
            .get::<Option<String>>(4)?
            .map(|json| serde_json::from_str::<Vec<f32>>(&json))
            .transpose()?
            .unwrap_or_default();

        Ok(Some(GiftQuery {
            id: row.get(0)?,
            persona_id: row.get(1)?,
            text: row.get(2)?,
            context: row.get::<Option<String>>(3)?.unwrap_or_default(),
            embedding,
            created_at: DateTime::parse_from_rfc3339(&row.get::<String>(5)?)
                .map(|dt| dt.with_timezone(&Utc))
                .unwrap_or_else(|_| Utc::now()),
        }))
    }

    pub async fn count(conn: &Connection, run_id: Option<&str>) -> Result<u64> {
        let mut rows = match run_id {
            Some(run_id) => {
                conn.query(
                    "SELECT COUNT(*) FROM gift_queries WHERE run_id = ?1",
                    params![run_id],
                )
                .await?
            }
            None => conn.query("SELECT COUNT(*) FROM gift_queries", ()).await?,
        };

        match rows.next().await? {
            Some(row) => Ok(row.get::<i64>(0)? as u64),
            None => Ok(0),
        }
    }

    /// Queries whose persona row does not exist.
    pub async fn count_orphans(conn: &Connection) -> Result<u64> {
        let mut rows = conn
            .query(
                r#"
                SELECT COUNT(*) FROM gift_queries q
                LEFT JOIN personas p ON q.persona_id = p.id
                WHERE p.id IS NULL
                "#,
                (),
            )
            .await?;

        match rows.next().await? {
            Some(row) => Ok(row.get::<i64>(0)? as u64),
            None => Ok(0),
        }
    }

    pub async fn search_similar(
        conn: &Connection,
        embedding: &[f32],
        limit: u32,
        threshold: f32,
    ) -> Result<Vec<GiftQueryHit>> {
        let embedding_json = serde_json::to_string(embedding)?;

        let mut rows = conn
            .query(
                r#"
                SELECT
                    q.id,
                    q.persona_id,
                    q.query,
                    1 - vector_distance_cos(q.embedding, vector32(?1)) as score
                FROM gift_queries q
                WHERE q.embedding IS NOT NULL
                  AND (1 - vector_distance_cos(q.embedding, vector32(?1))) >= ?2
                ORDER BY score DESC
                LIMIT ?3
                "#,
                params![embedding_json, threshold as f64, limit as i64],
            )
            .await?;

        let mut results = Vec::new();
        while let Some(row) = rows.next().await? {
            results.push(GiftQueryHit {
                query_id: row.get(0)?,
                persona_id: row.get(1)?,
                text: row.get(2)?,
                score: row.get::<f64>(3)? as f32,
            });
        }

        Ok(results)
    }
}
