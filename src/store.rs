use futures::FutureExt;
use sqlx::{Row, SqlitePool};
use tokio::sync::broadcast;
use tracing::{debug, info};

use crate::db::run_in_tx;
use crate::error::{AppError, AppResult};
use crate::model::{
    DailyGoals, GoalOverride, GoalPatch, Ingredient, IngredientPatch, LineDraft, Meal, MealDraft,
    MealLine, NewIngredient, Recipe, RecipeDraft, RecipeIngredient,
};
use crate::nutrition::{self, Nutrients, RecipeNutrition};
use crate::time::now_ms;

/// The six logical tables of the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Table {
    Ingredients,
    Recipes,
    RecipeIngredients,
    Meals,
    MealLines,
    DailyGoals,
    DailyGoalOverrides,
}

impl Table {
    pub fn name(&self) -> &'static str {
        match self {
            Table::Ingredients => "ingredients",
            Table::Recipes => "recipes",
            Table::RecipeIngredients => "recipe_ingredients",
            Table::Meals => "meals",
            Table::MealLines => "meal_lines",
            Table::DailyGoals => "daily_goals",
            Table::DailyGoalOverrides => "daily_goal_overrides",
        }
    }
}

/// Emitted on the change feed after every committed write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Change {
    pub table: Table,
}

/// Durable, queryable persistence for all entity kinds plus the change feed
/// that drives live queries. Cheap to clone; clones share the pool and feed.
#[derive(Clone)]
pub struct Store {
    pool: SqlitePool,
    changes: broadcast::Sender<Change>,
}

const NOT_FOUND: &str = "STORE/NOT_FOUND";

fn not_found(table: Table, id: i64) -> AppError {
    AppError::new(NOT_FOUND, "Record not found")
        .with_context("table", table.name())
        .with_context("id", id.to_string())
}

impl Store {
    pub fn new(pool: SqlitePool) -> Self {
        let (changes, _) = broadcast::channel(64);
        Store { pool, changes }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Subscribe to committed-write notifications. Receivers that fall behind
    /// observe `Lagged` and should simply re-run their query.
    pub fn subscribe(&self) -> broadcast::Receiver<Change> {
        self.changes.subscribe()
    }

    fn notify(&self, tables: &[Table]) {
        for &table in tables {
            // No receivers is fine; the feed is best effort by design of
            // broadcast channels.
            let _ = self.changes.send(Change { table });
        }
    }

    // ── Ingredients ─────────────────────────────────────────

    pub async fn add_ingredient(&self, new: NewIngredient) -> AppResult<i64> {
        let now = now_ms();
        let res = sqlx::query(
            "INSERT INTO ingredients (barcode, name, unit, calories, fat, carbs, sugar, protein, \
             salt, fiber, default_serving, created_at, updated_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&new.barcode)
        .bind(&new.name)
        .bind(new.unit)
        .bind(new.per_100.calories)
        .bind(new.per_100.fat)
        .bind(new.per_100.carbs)
        .bind(new.per_100.sugar)
        .bind(new.per_100.protein)
        .bind(new.per_100.salt)
        .bind(new.per_100.fiber)
        .bind(new.default_serving)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?;
        let id = res.last_insert_rowid();
        debug!(target = "mealtrack", event = "ingredient_added", id);
        self.notify(&[Table::Ingredients]);
        Ok(id)
    }

    pub async fn ingredient(&self, id: i64) -> AppResult<Option<Ingredient>> {
        let row = sqlx::query_as::<_, Ingredient>("SELECT * FROM ingredients WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }

    pub async fn ingredient_by_barcode(&self, barcode: &str) -> AppResult<Option<Ingredient>> {
        let row = sqlx::query_as::<_, Ingredient>(
            "SELECT * FROM ingredients WHERE barcode = ? ORDER BY id LIMIT 1",
        )
        .bind(barcode)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    /// Search-as-you-type listing: case-insensitive substring match on the
    /// name when a term is given, most recently updated first otherwise.
    pub async fn ingredients(&self, search: Option<&str>) -> AppResult<Vec<Ingredient>> {
        let term = search.map(str::trim).filter(|t| !t.is_empty());
        let rows = match term {
            Some(t) => {
                sqlx::query_as::<_, Ingredient>(
                    "SELECT * FROM ingredients WHERE instr(lower(name), lower(?)) > 0 ORDER BY name",
                )
                .bind(t)
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query_as::<_, Ingredient>(
                    "SELECT * FROM ingredients ORDER BY updated_at DESC, id DESC",
                )
                .fetch_all(&self.pool)
                .await?
            }
        };
        Ok(rows)
    }

    /// Partial update. Meal-line snapshots are deliberately untouched: they
    /// insulate historical meals from later ingredient edits.
    pub async fn update_ingredient(&self, id: i64, patch: IngredientPatch) -> AppResult<()> {
        let mut sets: Vec<&'static str> = Vec::new();
        if patch.barcode.is_some() {
            sets.push("barcode = ?");
        }
        if patch.name.is_some() {
            sets.push("name = ?");
        }
        if patch.unit.is_some() {
            sets.push("unit = ?");
        }
        if patch.per_100.is_some() {
            sets.push("calories = ?");
            sets.push("fat = ?");
            sets.push("carbs = ?");
            sets.push("sugar = ?");
            sets.push("protein = ?");
            sets.push("salt = ?");
            sets.push("fiber = ?");
        }
        if patch.default_serving.is_some() {
            sets.push("default_serving = ?");
        }
        sets.push("updated_at = ?");

        let sql = format!("UPDATE ingredients SET {} WHERE id = ?", sets.join(", "));
        let mut query = sqlx::query(&sql);
        if let Some(barcode) = &patch.barcode {
            query = query.bind(barcode);
        }
        if let Some(name) = &patch.name {
            query = query.bind(name);
        }
        if let Some(unit) = patch.unit {
            query = query.bind(unit);
        }
        if let Some(n) = patch.per_100 {
            query = query
                .bind(n.calories)
                .bind(n.fat)
                .bind(n.carbs)
                .bind(n.sugar)
                .bind(n.protein)
                .bind(n.salt)
                .bind(n.fiber);
        }
        if let Some(serving) = patch.default_serving {
            query = query.bind(serving);
        }
        let res = query.bind(now_ms()).bind(id).execute(&self.pool).await?;
        if res.rows_affected() == 0 {
            return Err(not_found(Table::Ingredients, id));
        }
        self.notify(&[Table::Ingredients]);
        Ok(())
    }

    /// Delete an ingredient together with every recipe link and meal line
    /// that references it, in one transaction. No orphans remain queryable.
    pub async fn delete_ingredient(&self, id: i64) -> AppResult<()> {
        run_in_tx(&self.pool, |tx| {
            async move {
                sqlx::query("DELETE FROM recipe_ingredients WHERE ingredient_id = ?")
                    .bind(id)
                    .execute(&mut **tx)
                    .await?;
                sqlx::query("DELETE FROM meal_lines WHERE ingredient_id = ?")
                    .bind(id)
                    .execute(&mut **tx)
                    .await?;
                let res = sqlx::query("DELETE FROM ingredients WHERE id = ?")
                    .bind(id)
                    .execute(&mut **tx)
                    .await?;
                if res.rows_affected() == 0 {
                    return Err(not_found(Table::Ingredients, id));
                }
                Ok(())
            }
            .boxed()
        })
        .await?;
        info!(target = "mealtrack", event = "ingredient_deleted", id);
        self.notify(&[Table::Ingredients, Table::RecipeIngredients, Table::MealLines]);
        Ok(())
    }

    // ── Recipes ─────────────────────────────────────────────

    pub async fn recipe(&self, id: i64) -> AppResult<Option<Recipe>> {
        let row = sqlx::query_as::<_, Recipe>("SELECT * FROM recipes WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }

    pub async fn recipes(&self, search: Option<&str>) -> AppResult<Vec<Recipe>> {
        let term = search.map(str::trim).filter(|t| !t.is_empty());
        let rows = match term {
            Some(t) => {
                sqlx::query_as::<_, Recipe>(
                    "SELECT * FROM recipes WHERE instr(lower(name), lower(?)) > 0 ORDER BY name",
                )
                .bind(t)
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query_as::<_, Recipe>(
                    "SELECT * FROM recipes ORDER BY updated_at DESC, id DESC",
                )
                .fetch_all(&self.pool)
                .await?
            }
        };
        Ok(rows)
    }

    pub async fn recipe_lines(&self, recipe_id: i64) -> AppResult<Vec<RecipeIngredient>> {
        let rows = sqlx::query_as::<_, RecipeIngredient>(
            "SELECT * FROM recipe_ingredients WHERE recipe_id = ? ORDER BY id",
        )
        .bind(recipe_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    /// Insert or update a recipe. Ingredient links are deleted and recreated
    /// wholesale; there is no differential update.
    pub async fn save_recipe(&self, draft: RecipeDraft) -> AppResult<i64> {
        let now = now_ms();
        let line_count = draft.lines.len();
        let recipe_id = run_in_tx(&self.pool, |tx| {
            async move {
                let recipe_id = match draft.id {
                    Some(id) => {
                        let res = sqlx::query(
                            "UPDATE recipes SET name = ?, servings = ?, updated_at = ? WHERE id = ?",
                        )
                        .bind(&draft.name)
                        .bind(draft.servings)
                        .bind(now)
                        .bind(id)
                        .execute(&mut **tx)
                        .await?;
                        if res.rows_affected() == 0 {
                            return Err(not_found(Table::Recipes, id));
                        }
                        sqlx::query("DELETE FROM recipe_ingredients WHERE recipe_id = ?")
                            .bind(id)
                            .execute(&mut **tx)
                            .await?;
                        id
                    }
                    None => {
                        let res = sqlx::query(
                            "INSERT INTO recipes (name, servings, created_at, updated_at) VALUES (?, ?, ?, ?)",
                        )
                        .bind(&draft.name)
                        .bind(draft.servings)
                        .bind(now)
                        .bind(now)
                        .execute(&mut **tx)
                        .await?;
                        res.last_insert_rowid()
                    }
                };

                for line in &draft.lines {
                    sqlx::query(
                        "INSERT INTO recipe_ingredients (recipe_id, ingredient_id, amount) VALUES (?, ?, ?)",
                    )
                    .bind(recipe_id)
                    .bind(line.ingredient_id)
                    .bind(line.amount)
                    .execute(&mut **tx)
                    .await?;
                }

                Ok(recipe_id)
            }
            .boxed()
        })
        .await?;
        debug!(target = "mealtrack", event = "recipe_saved", id = recipe_id, lines = line_count);
        self.notify(&[Table::Recipes, Table::RecipeIngredients]);
        Ok(recipe_id)
    }

    pub async fn delete_recipe(&self, id: i64) -> AppResult<()> {
        run_in_tx(&self.pool, |tx| {
            async move {
                sqlx::query("DELETE FROM recipe_ingredients WHERE recipe_id = ?")
                    .bind(id)
                    .execute(&mut **tx)
                    .await?;
                let res = sqlx::query("DELETE FROM recipes WHERE id = ?")
                    .bind(id)
                    .execute(&mut **tx)
                    .await?;
                if res.rows_affected() == 0 {
                    return Err(not_found(Table::Recipes, id));
                }
                Ok(())
            }
            .boxed()
        })
        .await?;
        self.notify(&[Table::Recipes, Table::RecipeIngredients]);
        Ok(())
    }

    /// Total and per-serving nutrition for a recipe. A missing recipe or a
    /// dangling ingredient link contributes zero rather than failing.
    pub async fn recipe_nutrition(&self, id: i64) -> AppResult<RecipeNutrition> {
        let Some(recipe) = self.recipe(id).await? else {
            return Ok(nutrition::recipe_nutrition([], 1.0));
        };
        let links = self.recipe_lines(id).await?;
        let mut resolved: Vec<(RecipeIngredient, Option<Ingredient>)> = Vec::new();
        for link in links {
            let ingredient = self.ingredient(link.ingredient_id).await?;
            resolved.push((link, ingredient));
        }
        Ok(nutrition::recipe_nutrition(
            resolved.iter().map(|(l, i)| (l, i.as_ref())),
            recipe.servings,
        ))
    }

    // ── Meals ───────────────────────────────────────────────

    pub async fn meal(&self, id: i64) -> AppResult<Option<Meal>> {
        let row = sqlx::query_as::<_, Meal>("SELECT * FROM meals WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }

    pub async fn meals_by_date(&self, date: &str) -> AppResult<Vec<Meal>> {
        let rows =
            sqlx::query_as::<_, Meal>("SELECT * FROM meals WHERE date = ? ORDER BY time, id")
                .bind(date)
                .fetch_all(&self.pool)
                .await?;
        Ok(rows)
    }

    pub async fn meal_lines(&self, meal_id: i64) -> AppResult<Vec<MealLine>> {
        let rows = sqlx::query_as::<_, MealLine>(
            "SELECT * FROM meal_lines WHERE meal_id = ? ORDER BY id",
        )
        .bind(meal_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    /// Insert or update a meal. Old lines are deleted before the new set is
    /// inserted, inside one transaction, so a meal is never observable with a
    /// duplicate item set. Ingredient lines are snapshotted against the
    /// current ingredient row; the meal name is derived from its lines.
    pub async fn save_meal(&self, draft: MealDraft) -> AppResult<i64> {
        let now = now_ms();
        struct ResolvedLine {
            ingredient_id: Option<i64>,
            name: String,
            unit: crate::model::Unit,
            amount: f64,
            nutrients: Nutrients,
        }
        let (meal_id, line_count) = run_in_tx(&self.pool, |tx| {
            async move {
                // Resolve ingredient drafts up front so a bad reference aborts
                // before any row is touched.
                let mut resolved: Vec<ResolvedLine> = Vec::new();
                for line in &draft.lines {
                    match line {
                        LineDraft::Ingredient {
                            ingredient_id,
                            amount,
                        } => {
                            let ing = sqlx::query_as::<_, Ingredient>(
                                "SELECT * FROM ingredients WHERE id = ?",
                            )
                            .bind(ingredient_id)
                            .fetch_optional(&mut **tx)
                            .await?
                            .ok_or_else(|| not_found(Table::Ingredients, *ingredient_id))?;
                            resolved.push(ResolvedLine {
                                ingredient_id: Some(ing.id),
                                name: ing.name.clone(),
                                unit: ing.unit,
                                amount: *amount,
                                nutrients: ing.per_100,
                            });
                        }
                        LineDraft::Manual {
                            name,
                            unit,
                            amount,
                            totals,
                        } => resolved.push(ResolvedLine {
                            ingredient_id: None,
                            name: name.clone(),
                            unit: *unit,
                            amount: *amount,
                            nutrients: *totals,
                        }),
                    }
                }

                let name = derive_meal_name(resolved.iter().map(|l| l.name.as_str()));

                let meal_id = match draft.id {
                    Some(id) => {
                        let res = sqlx::query(
                            "UPDATE meals SET date = ?, time = ?, name = ?, updated_at = ? WHERE id = ?",
                        )
                        .bind(&draft.date)
                        .bind(&draft.time)
                        .bind(&name)
                        .bind(now)
                        .bind(id)
                        .execute(&mut **tx)
                        .await?;
                        if res.rows_affected() == 0 {
                            return Err(not_found(Table::Meals, id));
                        }
                        sqlx::query("DELETE FROM meal_lines WHERE meal_id = ?")
                            .bind(id)
                            .execute(&mut **tx)
                            .await?;
                        id
                    }
                    None => {
                        let res = sqlx::query(
                            "INSERT INTO meals (date, time, name, created_at, updated_at) VALUES (?, ?, ?, ?, ?)",
                        )
                        .bind(&draft.date)
                        .bind(&draft.time)
                        .bind(&name)
                        .bind(now)
                        .bind(now)
                        .execute(&mut **tx)
                        .await?;
                        res.last_insert_rowid()
                    }
                };

                for line in &resolved {
                    sqlx::query(
                        "INSERT INTO meal_lines (meal_id, ingredient_id, name, unit, amount, calories, \
                         fat, carbs, sugar, protein, salt, fiber) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
                    )
                    .bind(meal_id)
                    .bind(line.ingredient_id)
                    .bind(&line.name)
                    .bind(line.unit)
                    .bind(line.amount)
                    .bind(line.nutrients.calories)
                    .bind(line.nutrients.fat)
                    .bind(line.nutrients.carbs)
                    .bind(line.nutrients.sugar)
                    .bind(line.nutrients.protein)
                    .bind(line.nutrients.salt)
                    .bind(line.nutrients.fiber)
                    .execute(&mut **tx)
                    .await?;
                }

                Ok((meal_id, resolved.len()))
            }
            .boxed()
        })
        .await?;
        debug!(target = "mealtrack", event = "meal_saved", id = meal_id, lines = line_count);
        self.notify(&[Table::Meals, Table::MealLines]);
        Ok(meal_id)
    }

    pub async fn delete_meal(&self, id: i64) -> AppResult<()> {
        run_in_tx(&self.pool, |tx| {
            async move {
                sqlx::query("DELETE FROM meal_lines WHERE meal_id = ?")
                    .bind(id)
                    .execute(&mut **tx)
                    .await?;
                let res = sqlx::query("DELETE FROM meals WHERE id = ?")
                    .bind(id)
                    .execute(&mut **tx)
                    .await?;
                if res.rows_affected() == 0 {
                    return Err(not_found(Table::Meals, id));
                }
                Ok(())
            }
            .boxed()
        })
        .await?;
        self.notify(&[Table::Meals, Table::MealLines]);
        Ok(())
    }

    /// Sum of all meals on a date. Dates with no meals total zero.
    pub async fn day_nutrition(&self, date: &str) -> AppResult<Nutrients> {
        let lines = sqlx::query_as::<_, MealLine>(
            "SELECT l.* FROM meal_lines l JOIN meals m ON m.id = l.meal_id WHERE m.date = ?",
        )
        .bind(date)
        .fetch_all(&self.pool)
        .await?;
        Ok(nutrition::meal_nutrition(lines.iter()))
    }

    // ── Goals ───────────────────────────────────────────────

    pub async fn default_goals(&self) -> AppResult<Option<DailyGoals>> {
        let row = sqlx::query_as::<_, DailyGoals>(
            "SELECT id, calories, fat, carbs, sugar, protein, salt, fiber \
             FROM daily_goals WHERE calories IS NOT NULL ORDER BY id LIMIT 1",
        )
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    pub async fn set_default_goals(&self, targets: Nutrients) -> AppResult<()> {
        run_in_tx(&self.pool, |tx| {
            async move {
                let existing: Option<i64> =
                    sqlx::query_scalar("SELECT id FROM daily_goals ORDER BY id LIMIT 1")
                        .fetch_optional(&mut **tx)
                        .await?;
                match existing {
                    Some(id) => {
                        sqlx::query(
                            "UPDATE daily_goals SET calories = ?, fat = ?, carbs = ?, sugar = ?, \
                             protein = ?, salt = ?, fiber = ? WHERE id = ?",
                        )
                        .bind(targets.calories)
                        .bind(targets.fat)
                        .bind(targets.carbs)
                        .bind(targets.sugar)
                        .bind(targets.protein)
                        .bind(targets.salt)
                        .bind(targets.fiber)
                        .bind(id)
                        .execute(&mut **tx)
                        .await?;
                    }
                    None => {
                        sqlx::query(
                            "INSERT INTO daily_goals (calories, fat, carbs, sugar, protein, salt, fiber) \
                             VALUES (?, ?, ?, ?, ?, ?, ?)",
                        )
                        .bind(targets.calories)
                        .bind(targets.fat)
                        .bind(targets.carbs)
                        .bind(targets.sugar)
                        .bind(targets.protein)
                        .bind(targets.salt)
                        .bind(targets.fiber)
                        .execute(&mut **tx)
                        .await?;
                    }
                }
                Ok::<_, AppError>(())
            }
            .boxed()
        })
        .await?;
        self.notify(&[Table::DailyGoals]);
        Ok(())
    }

    /// First-run seeding; a no-op once any default row exists.
    pub async fn seed_default_goals(&self) -> AppResult<()> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM daily_goals")
            .fetch_one(&self.pool)
            .await?;
        if count > 0 {
            return Ok(());
        }
        self.set_default_goals(Nutrients {
            calories: 2700.0,
            fat: 90.0,
            carbs: 304.0,
            sugar: 50.0,
            protein: 169.0,
            salt: 6.0,
            fiber: 30.0,
        })
        .await?;
        info!(target = "mealtrack", event = "default_goals_seeded");
        Ok(())
    }

    pub async fn goal_override(&self, date: &str) -> AppResult<Option<GoalOverride>> {
        let row = sqlx::query_as::<_, GoalOverride>(
            "SELECT id, date, calories, fat, carbs, sugar, protein, salt, fiber \
             FROM daily_goal_overrides WHERE date = ?",
        )
        .bind(date)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    /// Replace the override row for a date (unique per date). An empty patch
    /// clears the override instead of storing an all-NULL row.
    pub async fn upsert_override(&self, date: &str, patch: GoalPatch) -> AppResult<()> {
        if patch.is_empty() {
            return self.clear_override(date).await;
        }
        sqlx::query(
            "INSERT INTO daily_goal_overrides (date, calories, fat, carbs, sugar, protein, salt, fiber) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?) \
             ON CONFLICT(date) DO UPDATE SET calories = excluded.calories, fat = excluded.fat, \
             carbs = excluded.carbs, sugar = excluded.sugar, protein = excluded.protein, \
             salt = excluded.salt, fiber = excluded.fiber",
        )
        .bind(date)
        .bind(patch.calories)
        .bind(patch.fat)
        .bind(patch.carbs)
        .bind(patch.sugar)
        .bind(patch.protein)
        .bind(patch.salt)
        .bind(patch.fiber)
        .execute(&self.pool)
        .await?;
        self.notify(&[Table::DailyGoalOverrides]);
        Ok(())
    }

    /// Idempotent: clearing a date with no override is not an error.
    pub async fn clear_override(&self, date: &str) -> AppResult<()> {
        sqlx::query("DELETE FROM daily_goal_overrides WHERE date = ?")
            .bind(date)
            .execute(&self.pool)
            .await?;
        self.notify(&[Table::DailyGoalOverrides]);
        Ok(())
    }

    /// Default goals merged with the date's override; hardcoded fallback when
    /// no default row exists yet.
    pub async fn goals_for_date(&self, date: &str) -> AppResult<Nutrients> {
        let default = self.default_goals().await?;
        let override_row = self.goal_override(date).await?;
        Ok(nutrition::resolve_goals(
            default.map(|g| g.targets).as_ref(),
            override_row.map(|o| o.patch).as_ref(),
        ))
    }

    // ── Generic helpers ─────────────────────────────────────

    /// Raw primary-key lookup for diagnostics; absence is `None`, not an error.
    pub async fn raw_get(&self, table: Table, id: i64) -> AppResult<Option<serde_json::Value>> {
        let sql = format!("SELECT * FROM {} WHERE id = ?", table.name());
        let row = sqlx::query(&sql).bind(id).fetch_optional(&self.pool).await?;
        Ok(row.map(|r| row_to_value(&r)))
    }

    /// Remove all given ids from a table in one transaction. Absent ids are
    /// skipped; the call is idempotent.
    pub async fn bulk_delete(&self, table: Table, ids: &[i64]) -> AppResult<()> {
        if ids.is_empty() {
            return Ok(());
        }
        let sql = format!("DELETE FROM {} WHERE id = ?", table.name());
        let ids = ids.to_vec();
        run_in_tx(&self.pool, |tx| {
            async move {
                for id in ids {
                    sqlx::query(&sql).bind(id).execute(&mut **tx).await?;
                }
                Ok::<_, AppError>(())
            }
            .boxed()
        })
        .await?;
        self.notify(&[table]);
        Ok(())
    }

    pub async fn count(&self, table: Table) -> AppResult<i64> {
        let sql = format!("SELECT COUNT(*) FROM {}", table.name());
        let n: i64 = sqlx::query_scalar(&sql).fetch_one(&self.pool).await?;
        Ok(n)
    }
}

/// Meal display names come from the constituent lines, not a form field.
fn derive_meal_name<'a>(names: impl Iterator<Item = &'a str>) -> String {
    let mut seen: Vec<&str> = Vec::new();
    let mut extra = 0usize;
    for name in names {
        let name = name.trim();
        if name.is_empty() || seen.contains(&name) {
            continue;
        }
        if seen.len() < 3 {
            seen.push(name);
        } else {
            extra += 1;
        }
    }
    if seen.is_empty() {
        return "Meal".into();
    }
    let mut out = seen.join(", ");
    if extra > 0 {
        out.push_str(", …");
    }
    out
}

fn row_to_value(row: &sqlx::sqlite::SqliteRow) -> serde_json::Value {
    use serde_json::{Map, Value};
    use sqlx::{Column, TypeInfo, ValueRef};

    let mut map = Map::new();
    for col in row.columns() {
        let idx = col.ordinal();
        let val = match row.try_get_raw(idx).ok() {
            Some(raw) if !raw.is_null() => match raw.type_info().name() {
                "INTEGER" => row
                    .try_get::<i64, _>(idx)
                    .map(Value::from)
                    .unwrap_or(Value::Null),
                "REAL" => row
                    .try_get::<f64, _>(idx)
                    .map(Value::from)
                    .unwrap_or(Value::Null),
                _ => row
                    .try_get::<String, _>(idx)
                    .map(Value::from)
                    .unwrap_or(Value::Null),
            },
            _ => Value::Null,
        };
        map.insert(col.name().to_string(), val);
    }
    Value::Object(map)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn meal_name_derivation_caps_and_dedupes() {
        assert_eq!(derive_meal_name([].into_iter()), "Meal");
        assert_eq!(derive_meal_name(["Oats"].into_iter()), "Oats");
        assert_eq!(
            derive_meal_name(["Oats", "Milk", "Oats"].into_iter()),
            "Oats, Milk"
        );
        assert_eq!(
            derive_meal_name(["A", "B", "C", "D"].into_iter()),
            "A, B, C, …"
        );
    }
}
