use chrono::{DateTime, Utc};
use libsql::{params, Connection};

use crate::error::Result;
use crate::models::{BudgetRange, Persona, PersonaProfile};

pub struct PersonaRepository;

impl PersonaRepository {
    /// Append one persona and return its store id.
    pub async fn insert(conn: &Connection, run_id: &str, profile: &PersonaProfile) -> Result<i64> {
        let preferences = serde_json::to_string(&profile.shopping_preferences)?;
        let recipients = serde_json::to_string(&profile.gift_recipients)?;
        let created_at = Utc::now().to_rfc3339();

        conn.execute(
            r#"
            INSERT INTO personas (
                run_id, name, age, description, shopping_preferences,
                budget_min, budget_max, gift_recipients, created_at
            ) VALUES (
                ?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9
            )
            "#,
            params![
                run_id,
                profile.name.as_str(),
                profile.age as i64,
                profile.description.as_str(),
                preferences,
                profile.budget_range.min as i64,
                profile.budget_range.max as i64,
                recipients,
                created_at,
            ],
        )
        .await?;

        Ok(conn.last_insert_rowid())
    }

    pub async fn get_by_id(conn: &Connection, id: i64) -> Result<Option<Persona>> {
        let mut rows = conn
            .query(
                r#"
                SELECT id, name, age, description, shopping_preferences,
                       budget_min, budget_max, gift_recipients, created_at
                FROM personas
                WHERE id = ?1
                "#,
                params![id],
            )
            .await?;

        match rows.next().await? {
            Some(row) => Ok(Some(Self::row_to_persona(&row)?)),
            None => Ok(None),
        }
    }

    pub async fn count(conn: &Connection, run_id: Option<&str>) -> Result<u64> {
        let mut rows = match run_id {
            Some(run_id) => {
                conn.query(
                    "SELECT COUNT(*) FROM personas WHERE run_id = ?1",
                    params![run_id],
                )
                .await?
            }
            None => conn.query("SELECT COUNT(*) FROM personas", ()).await?,
        };

        match rows.next().await? {
            Some(row) => Ok(row.get::<i64>(0)? as u64),
            None => Ok(0),
        }
    }

    fn row_to_persona(row: &libsql::Row) -> Result<Persona> {
        let profile = PersonaProfile {
            name: row.get(1)?,
            age: row.get::<i64>(2)?.max(0) as u32,
            description: row.get(3)?,
            shopping_preferences: serde_json::from_str(&row.get::<String>(4)?)
                .unwrap_or_default(),
            budget_range: BudgetRange::new(
                row.get::<i64>(5)?.max(0) as u32,
                row.get::<i64>(6)?.max(0) as u32,
            ),
            gift_recipients: serde_json::from_str(&row.get::<String>(7)?).unwrap_or_default(),
        };

        Ok(Persona {
            id: row.get(0)?,
            profile,
            created_at: DateTime::parse_from_rfc3339(&row.get::<String>(8)?)
                .map(|dt| dt.with_timezone(&Utc))
                .unwrap_or_else(|_| Utc::now()),
        })
    }
}
