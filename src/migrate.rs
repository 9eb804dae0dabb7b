use std::collections::HashMap;

use futures::future::BoxFuture;
use regex::Regex;
use sha2::{Digest, Sha256};
use sqlx::{Executor, Row, Sqlite, SqlitePool, Transaction};
use tracing::{error, info};

use crate::time::now_ms;

/// One-time data transform paired with a schema version, run inside the same
/// transaction as the version's DDL.
pub type Transform =
    for<'a, 'c> fn(&'a mut Transaction<'c, Sqlite>) -> BoxFuture<'a, anyhow::Result<()>>;

pub struct Migration {
    pub version: i64,
    pub ddl: &'static str,
    pub transform: Option<Transform>,
}

/// Versions are strictly additive: never edit a shipped entry, always append.
static MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        ddl: include_str!("../migrations/0001_initial.sql"),
        transform: None,
    },
    Migration {
        version: 2,
        ddl: include_str!("../migrations/0002_meal_item_snapshots.sql"),
        transform: Some(backfill_item_snapshots),
    },
    Migration {
        version: 3,
        ddl: include_str!("../migrations/0003_meal_lines.sql"),
        transform: Some(restructure_meal_lines),
    },
];

pub fn latest_version() -> i64 {
    MIGRATIONS.last().map(|m| m.version).unwrap_or(0)
}

fn preview(sql: &str) -> String {
    let one_line = sql.replace(['\n', '\t'], " ");
    let trimmed = one_line.trim();
    if trimmed.len() > 160 {
        // Back off to a char boundary; byte 160 may fall inside a multibyte
        // character.
        let mut end = 160;
        while !trimmed.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}…", &trimmed[..end])
    } else {
        trimmed.to_string()
    }
}

fn cleaned_sql(raw: &str) -> String {
    raw.lines()
        .filter(|line| {
            let t = line.trim_start();
            !(t.is_empty() || t.starts_with("--"))
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn checksum_of(cleaned: &str) -> String {
    format!("{:x}", Sha256::digest(cleaned.as_bytes()))
}

/// Highest applied schema version, if the bookkeeping table exists.
pub async fn schema_version(pool: &SqlitePool) -> anyhow::Result<Option<i64>> {
    let table: Option<i64> = sqlx::query_scalar(
        "SELECT 1 FROM sqlite_master WHERE type='table' AND name='schema_migrations'",
    )
    .fetch_optional(pool)
    .await?;
    if table.is_none() {
        return Ok(None);
    }
    let version: Option<i64> = sqlx::query_scalar("SELECT MAX(version) FROM schema_migrations")
        .fetch_one(pool)
        .await?;
    Ok(version)
}

/// Apply all pending schema versions, each (DDL + transform + version marker)
/// in a single transaction. A failed transform rolls back and leaves the
/// stored version unadvanced, so it is retried on the next open.
pub async fn apply_migrations(pool: &SqlitePool) -> anyhow::Result<()> {
    apply_migrations_up_to(pool, latest_version()).await
}

/// Apply pending versions up to and including `target`. Upgrade tests use
/// this to stage a database at an older schema before running the full chain.
pub async fn apply_migrations_up_to(pool: &SqlitePool, target: i64) -> anyhow::Result<()> {
    pool.execute(
        "CREATE TABLE IF NOT EXISTS schema_migrations (\
           version    INTEGER PRIMARY KEY,\
           applied_at INTEGER NOT NULL,\
           checksum   TEXT NOT NULL\
         )",
    )
    .await?;

    let rows = sqlx::query("SELECT version, checksum FROM schema_migrations")
        .fetch_all(pool)
        .await?;
    let mut applied: HashMap<i64, String> = HashMap::new();
    for r in rows {
        if let (Ok(v), Ok(c)) = (r.try_get::<i64, _>("version"), r.try_get::<String, _>("checksum"))
        {
            applied.insert(v, c);
        }
    }
    let max_applied = applied.keys().copied().max();
    let add_col_re = Regex::new(r"(?i)^ALTER\s+TABLE\s+(\w+)\s+ADD\s+COLUMN\s+(\w+)").unwrap();

    for m in MIGRATIONS {
        if m.version > target {
            break;
        }
        let cleaned = cleaned_sql(m.ddl);
        let checksum = checksum_of(&cleaned);

        if let Some(stored) = applied.get(&m.version) {
            if stored != &checksum {
                anyhow::bail!("migration v{} edited after application", m.version);
            }
            info!(target = "mealtrack", event = "migration_skip", version = m.version);
            continue;
        }
        if let Some(max) = max_applied {
            if m.version < max {
                anyhow::bail!(
                    "migration v{} missing below applied version v{}; refusing out-of-order apply",
                    m.version,
                    max
                );
            }
        }

        let mut tx = pool.begin().await?;
        for stmt in cleaned.split(';') {
            let s = stmt.trim();
            if s.is_empty() {
                continue;
            }
            let upper = s.to_ascii_uppercase();
            if upper == "BEGIN" || upper == "COMMIT" {
                continue;
            }
            // Re-running an ADD COLUMN against a partially-migrated database
            // must not fail the whole version.
            if let Some(caps) = add_col_re.captures(s) {
                let table = caps.get(1).unwrap().as_str();
                let col = caps.get(2).unwrap().as_str();
                let exists: Option<i64> = sqlx::query_scalar(&format!(
                    "SELECT 1 FROM pragma_table_info('{table}') WHERE name='{col}'"
                ))
                .fetch_optional(&mut *tx)
                .await?;
                if exists.is_some() {
                    info!(target = "mealtrack", event = "migration_stmt_skip", version = m.version, sql = %preview(s));
                    continue;
                }
            }
            info!(target = "mealtrack", event = "migration_stmt", version = m.version, sql = %preview(s));
            if let Err(e) = sqlx::query(s).execute(&mut *tx).await {
                error!(target = "mealtrack", event = "migration_stmt_error", version = m.version, sql = %preview(s), error = %e);
                return Err(e.into());
            }
        }

        if let Some(transform) = m.transform {
            if let Err(e) = transform(&mut tx).await {
                error!(target = "mealtrack", event = "migration_transform_error", version = m.version, error = %e);
                return Err(e);
            }
        }

        sqlx::query(
            "INSERT INTO schema_migrations (version, applied_at, checksum) VALUES (?, ?, ?)",
        )
        .bind(m.version)
        .bind(now_ms())
        .bind(&checksum)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        info!(target = "mealtrack", event = "migration_applied", version = m.version);
    }

    Ok(())
}

/// v2 upgrade: populate per-100 snapshots on every existing meal item.
///
/// Items with a resolvable ingredient copy the ingredient's current values;
/// manual items invert their absolute totals back to a per-100 basis using
/// their own amount (zero values when the amount is zero). Also unsets the
/// retired `meals.is_manual` flag.
fn backfill_item_snapshots<'a, 'c>(
    tx: &'a mut Transaction<'c, Sqlite>,
) -> BoxFuture<'a, anyhow::Result<()>> {
    Box::pin(async move {
        let ingredients = sqlx::query(
            "SELECT id, name, unit, calories, fat, carbs, sugar, protein, salt, fiber FROM ingredients",
        )
        .fetch_all(&mut **tx)
        .await?;
        let mut by_id: HashMap<i64, sqlx::sqlite::SqliteRow> = HashMap::new();
        for row in ingredients {
            by_id.insert(row.try_get("id")?, row);
        }

        let items = sqlx::query(
            "SELECT id, ingredient_id, amount, manual_name, manual_calories, manual_fat, \
             manual_carbs, manual_sugar, manual_protein, manual_salt, manual_fiber FROM meal_items",
        )
        .fetch_all(&mut **tx)
        .await?;

        let mut updated = 0u64;
        for item in items {
            let id: i64 = item.try_get("id")?;
            let ingredient_id: Option<i64> = item.try_get("ingredient_id")?;

            let (name, unit, per100) = match ingredient_id.and_then(|iid| by_id.get(&iid)) {
                Some(ing) => (
                    ing.try_get::<String, _>("name")?,
                    ing.try_get::<String, _>("unit")?,
                    [
                        ing.try_get::<f64, _>("calories")?,
                        ing.try_get::<f64, _>("fat")?,
                        ing.try_get::<f64, _>("carbs")?,
                        ing.try_get::<f64, _>("sugar")?,
                        ing.try_get::<f64, _>("protein")?,
                        ing.try_get::<f64, _>("salt")?,
                        ing.try_get::<f64, _>("fiber")?,
                    ],
                ),
                None => {
                    let amount: f64 = item.try_get("amount")?;
                    let factor = if amount > 0.0 { 100.0 / amount } else { 0.0 };
                    let manual = |col: &str| -> anyhow::Result<f64> {
                        Ok(item.try_get::<Option<f64>, _>(col)?.unwrap_or(0.0) * factor)
                    };
                    (
                        item.try_get::<Option<String>, _>("manual_name")?
                            .unwrap_or_else(|| "Unknown".into()),
                        "g".into(),
                        [
                            manual("manual_calories")?,
                            manual("manual_fat")?,
                            manual("manual_carbs")?,
                            manual("manual_sugar")?,
                            manual("manual_protein")?,
                            manual("manual_salt")?,
                            manual("manual_fiber")?,
                        ],
                    )
                }
            };

            sqlx::query(
                "UPDATE meal_items SET name = ?, unit = ?, calories_per100 = ?, fat_per100 = ?, \
                 carbs_per100 = ?, sugar_per100 = ?, protein_per100 = ?, salt_per100 = ?, \
                 fiber_per100 = ? WHERE id = ?",
            )
            .bind(&name)
            .bind(&unit)
            .bind(per100[0])
            .bind(per100[1])
            .bind(per100[2])
            .bind(per100[3])
            .bind(per100[4])
            .bind(per100[5])
            .bind(per100[6])
            .bind(id)
            .execute(&mut **tx)
            .await?;
            updated += 1;
        }

        // Field removal: the flag stays NULL rather than dropping the column.
        sqlx::query("UPDATE meals SET is_manual = NULL")
            .execute(&mut **tx)
            .await?;

        info!(target = "mealtrack", event = "migration_backfill", version = 2, items = updated);
        Ok(())
    })
}

/// v3 upgrade: move meal items into the canonical `meal_lines` table, rename
/// goal columns with a new-name → old-name → default fallback chain, and drop
/// the old items table.
fn restructure_meal_lines<'a, 'c>(
    tx: &'a mut Transaction<'c, Sqlite>,
) -> BoxFuture<'a, anyhow::Result<()>> {
    Box::pin(async move {
        let items = sqlx::query("SELECT * FROM meal_items ORDER BY id")
            .fetch_all(&mut **tx)
            .await?;

        let mut copied = 0u64;
        let mut skipped = 0u64;
        for item in items {
            let meal_id: i64 = item.try_get("meal_id")?;
            let ingredient_id: Option<i64> = item.try_get("ingredient_id")?;
            let amount: f64 = item.try_get("amount")?;
            let snapshot_name: Option<String> = item.try_get("name")?;
            let manual_name: Option<String> = item.try_get("manual_name")?;
            let unit: String = item
                .try_get::<Option<String>, _>("unit")?
                .unwrap_or_else(|| "g".into());
            let per100 = |col: &str| -> anyhow::Result<f64> {
                Ok(item.try_get::<Option<f64>, _>(col)?.unwrap_or(0.0))
            };

            let (name, nutrients) = if ingredient_id.is_some() {
                // Linked line: keep the per-100 snapshot.
                (
                    snapshot_name
                        .or(manual_name)
                        .unwrap_or_else(|| "Unknown".into()),
                    [
                        per100("calories_per100")?,
                        per100("fat_per100")?,
                        per100("carbs_per100")?,
                        per100("sugar_per100")?,
                        per100("protein_per100")?,
                        per100("salt_per100")?,
                        per100("fiber_per100")?,
                    ],
                )
            } else {
                let manual = |col: &str| -> anyhow::Result<Option<f64>> {
                    Ok(item.try_get::<Option<f64>, _>(col)?)
                };
                let manual_values = [
                    manual("manual_calories")?,
                    manual("manual_fat")?,
                    manual("manual_carbs")?,
                    manual("manual_sugar")?,
                    manual("manual_protein")?,
                    manual("manual_salt")?,
                    manual("manual_fiber")?,
                ];
                let has_manual_data = manual_values.iter().any(|v| v.is_some());
                // The v2 backfill stamps a placeholder name and zero snapshot
                // onto rows like this, so only the original manual columns can
                // prove the row carries real data. Skip rather than fail.
                if manual_name.is_none() && !has_manual_data {
                    skipped += 1;
                    continue;
                }
                // Manual line: absolute totals, preferring the original manual
                // columns and falling back to re-scaling the v2 snapshot.
                let totals = if has_manual_data {
                    [
                        manual_values[0].unwrap_or(0.0),
                        manual_values[1].unwrap_or(0.0),
                        manual_values[2].unwrap_or(0.0),
                        manual_values[3].unwrap_or(0.0),
                        manual_values[4].unwrap_or(0.0),
                        manual_values[5].unwrap_or(0.0),
                        manual_values[6].unwrap_or(0.0),
                    ]
                } else {
                    let factor = amount / 100.0;
                    [
                        per100("calories_per100")? * factor,
                        per100("fat_per100")? * factor,
                        per100("carbs_per100")? * factor,
                        per100("sugar_per100")? * factor,
                        per100("protein_per100")? * factor,
                        per100("salt_per100")? * factor,
                        per100("fiber_per100")? * factor,
                    ]
                };
                (
                    manual_name
                        .or(snapshot_name)
                        .unwrap_or_else(|| "Unknown".into()),
                    totals,
                )
            };

            sqlx::query(
                "INSERT INTO meal_lines (meal_id, ingredient_id, name, unit, amount, calories, \
                 fat, carbs, sugar, protein, salt, fiber) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(meal_id)
            .bind(ingredient_id)
            .bind(&name)
            .bind(&unit)
            .bind(amount)
            .bind(nutrients[0])
            .bind(nutrients[1])
            .bind(nutrients[2])
            .bind(nutrients[3])
            .bind(nutrients[4])
            .bind(nutrients[5])
            .bind(nutrients[6])
            .execute(&mut **tx)
            .await?;
            copied += 1;
        }

        sqlx::query("DROP TABLE meal_items")
            .execute(&mut **tx)
            .await?;

        // Goal renames: new name wins, then the old *_goal column, then the
        // shipped default. Re-running against migrated data is a no-op.
        sqlx::query(
            "UPDATE daily_goals SET \
               calories = COALESCE(calories, calories_goal, 2700), \
               fat      = COALESCE(fat, fat_goal, 90), \
               carbs    = COALESCE(carbs, carbs_goal, 304), \
               sugar    = COALESCE(sugar, sugar_goal, 50), \
               protein  = COALESCE(protein, protein_goal, 169), \
               salt     = COALESCE(salt, salt_goal, 6), \
               fiber    = COALESCE(fiber, fiber_goal, 30)",
        )
        .execute(&mut **tx)
        .await?;
        sqlx::query(
            "UPDATE daily_goals SET calories_goal = NULL, fat_goal = NULL, carbs_goal = NULL, \
             sugar_goal = NULL, protein_goal = NULL, salt_goal = NULL, fiber_goal = NULL",
        )
        .execute(&mut **tx)
        .await?;

        // Overrides carry no defaults: absent stays absent.
        sqlx::query(
            "UPDATE daily_goal_overrides SET \
               calories = COALESCE(calories, calories_goal), \
               fat      = COALESCE(fat, fat_goal), \
               carbs    = COALESCE(carbs, carbs_goal), \
               sugar    = COALESCE(sugar, sugar_goal), \
               protein  = COALESCE(protein, protein_goal), \
               salt     = COALESCE(salt, salt_goal), \
               fiber    = COALESCE(fiber, fiber_goal)",
        )
        .execute(&mut **tx)
        .await?;

        info!(target = "mealtrack", event = "migration_restructure", version = 3, copied, skipped);
        Ok(())
    })
}
