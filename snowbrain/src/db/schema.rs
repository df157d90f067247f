use libsql::Connection;

use crate::error::Result;

/// Create the brain tables if they do not exist. Safe to call on every run.
pub async fn init_schema(conn: &Connection, dimensions: usize) -> Result<()> {
    conn.execute_batch(&format!(
        r#"
        -- Shopper personas
        CREATE TABLE IF NOT EXISTS personas (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            run_id TEXT NOT NULL,
            name TEXT NOT NULL,
            age INTEGER NOT NULL,
            description TEXT NOT NULL DEFAULT '',
            shopping_preferences TEXT NOT NULL DEFAULT '{{}}',
            budget_min INTEGER NOT NULL,
            budget_max INTEGER NOT NULL,
            gift_recipients TEXT NOT NULL DEFAULT '[]',
            created_at TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_personas_run_id ON personas(run_id);

        -- Gift queries with vector embedding
        CREATE TABLE IF NOT EXISTS gift_queries (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            run_id TEXT NOT NULL,
            persona_id INTEGER NOT NULL,
            query TEXT NOT NULL,
            context TEXT,
            embedding F32_BLOB({dimensions}),
            created_at TEXT NOT NULL,
            FOREIGN KEY (persona_id) REFERENCES personas(id)
        );

        CREATE INDEX IF NOT EXISTS idx_gift_queries_persona_id ON gift_queries(persona_id);

        -- Snowman answers
        CREATE TABLE IF NOT EXISTS snowman_responses (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            run_id TEXT NOT NULL,
            persona_id INTEGER NOT NULL,
            query_id INTEGER NOT NULL,
            query TEXT NOT NULL,
            response TEXT NOT NULL,
            response_time REAL,
            created_at TEXT NOT NULL,
            FOREIGN KEY (persona_id) REFERENCES personas(id),
            FOREIGN KEY (query_id) REFERENCES gift_queries(id)
        );

        CREATE INDEX IF NOT EXISTS idx_snowman_responses_query_id ON snowman_responses(query_id);

        -- Metadata key-value store
        CREATE TABLE IF NOT EXISTS brain_meta (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );
        "#
    ))
    .await?;

    create_vector_index(conn).await?;

    Ok(())
}

async fn create_vector_index(conn: &Connection) -> Result<()> {
    let index_exists: bool = conn
        .query(
            "SELECT 1 FROM sqlite_master WHERE type='index' AND name='gift_queries_embedding_idx'",
            (),
        )
        .await?
        .next()
        .await?
        .is_some();

    if !index_exists {
        if let Err(e) = conn
            .execute(
                "CREATE INDEX IF NOT EXISTS gift_queries_embedding_idx ON gift_queries(libsql_vector_idx(embedding))",
                (),
            )
            .await
        {
            tracing::warn!("Vector index creation failed for gift_queries: {e}");
        }
    }

    Ok(())
}
