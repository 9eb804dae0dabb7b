use std::fmt;

use serde::{Deserialize, Serialize};
use sqlx::error::BoxDynError;
use sqlx::sqlite::{SqliteArgumentValue, SqliteRow, SqliteTypeInfo, SqliteValueRef};
use sqlx::{FromRow, Row, Sqlite};

use crate::nutrition::Nutrients;

/// Measurement basis for an ingredient's per-100 values: grams or milliliters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Unit {
    #[default]
    G,
    Ml,
}

impl Unit {
    pub fn as_str(&self) -> &'static str {
        match self {
            Unit::G => "g",
            Unit::Ml => "ml",
        }
    }
}

impl fmt::Display for Unit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl sqlx::Type<Sqlite> for Unit {
    fn type_info() -> SqliteTypeInfo {
        <&str as sqlx::Type<Sqlite>>::type_info()
    }

    fn compatible(ty: &SqliteTypeInfo) -> bool {
        <&str as sqlx::Type<Sqlite>>::compatible(ty)
    }
}

impl<'q> sqlx::Encode<'q, Sqlite> for Unit {
    fn encode_by_ref(&self, buf: &mut Vec<SqliteArgumentValue<'q>>) -> Result<sqlx::encode::IsNull, BoxDynError> {
        <&str as sqlx::Encode<'q, Sqlite>>::encode_by_ref(&self.as_str(), buf)
    }
}

impl<'r> sqlx::Decode<'r, Sqlite> for Unit {
    fn decode(value: SqliteValueRef<'r>) -> Result<Self, BoxDynError> {
        let raw = <&str as sqlx::Decode<'r, Sqlite>>::decode(value)?;
        match raw {
            "g" => Ok(Unit::G),
            "ml" => Ok(Unit::Ml),
            other => Err(format!("invalid unit: {other}").into()),
        }
    }
}

/// A reusable food item with nutrient values normalized per 100 g/ml.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct Ingredient {
    pub id: i64,
    pub barcode: Option<String>,
    pub name: String,
    pub unit: Unit,
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub per_100: Nutrients,
    pub default_serving: f64,
    pub created_at: i64,
    pub updated_at: i64,
}

/// Draft for creating an ingredient; the store assigns id and timestamps.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewIngredient {
    pub barcode: Option<String>,
    pub name: String,
    pub unit: Unit,
    pub per_100: Nutrients,
    pub default_serving: f64,
}

/// Partial ingredient update; `None` fields are left untouched.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IngredientPatch {
    pub barcode: Option<String>,
    pub name: Option<String>,
    pub unit: Option<Unit>,
    pub per_100: Option<Nutrients>,
    pub default_serving: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct Recipe {
    pub id: i64,
    pub name: String,
    pub servings: f64,
    pub created_at: i64,
    pub updated_at: i64,
}

/// One line item of a recipe; replaced wholesale when the recipe is re-saved.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct RecipeIngredient {
    pub id: i64,
    pub recipe_id: i64,
    pub ingredient_id: i64,
    /// Amount in the ingredient's unit.
    pub amount: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecipeDraft {
    /// `Some` updates an existing recipe, `None` creates one.
    pub id: Option<i64>,
    pub name: String,
    pub servings: f64,
    pub lines: Vec<RecipeLineDraft>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecipeLineDraft {
    pub ingredient_id: i64,
    pub amount: f64,
}

/// A dated, timed collection of consumed items.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct Meal {
    pub id: i64,
    /// `YYYY-MM-DD`, the partition key for daily views.
    pub date: String,
    /// `HH:MM`, display ordering only.
    pub time: String,
    pub name: String,
    pub created_at: i64,
    pub updated_at: i64,
}

/// The two meal-line representations are mutually exclusive: a line either
/// references an ingredient (nutrients are a per-100 snapshot taken at save
/// time) or is fully manual (nutrients are absolute totals for the entry).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum LineKind {
    Ingredient {
        ingredient_id: i64,
        per_100: Nutrients,
    },
    Manual {
        totals: Nutrients,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MealLine {
    pub id: i64,
    pub meal_id: i64,
    pub name: String,
    pub unit: Unit,
    pub amount: f64,
    #[serde(flatten)]
    pub kind: LineKind,
}

impl MealLine {
    pub fn ingredient_id(&self) -> Option<i64> {
        match self.kind {
            LineKind::Ingredient { ingredient_id, .. } => Some(ingredient_id),
            LineKind::Manual { .. } => None,
        }
    }

    /// Raw nutrient columns as stored (per-100 snapshot or absolute totals).
    pub fn stored_nutrients(&self) -> Nutrients {
        match self.kind {
            LineKind::Ingredient { per_100, .. } => per_100,
            LineKind::Manual { totals } => totals,
        }
    }
}

impl<'r> FromRow<'r, SqliteRow> for MealLine {
    fn from_row(row: &'r SqliteRow) -> Result<Self, sqlx::Error> {
        let nutrients = Nutrients::from_row(row)?;
        let kind = match row.try_get::<Option<i64>, _>("ingredient_id")? {
            Some(ingredient_id) => LineKind::Ingredient {
                ingredient_id,
                per_100: nutrients,
            },
            None => LineKind::Manual { totals: nutrients },
        };
        Ok(MealLine {
            id: row.try_get("id")?,
            meal_id: row.try_get("meal_id")?,
            name: row.try_get("name")?,
            unit: row.try_get("unit")?,
            amount: row.try_get("amount")?,
            kind,
        })
    }
}

/// Draft lines for saving a meal. Ingredient lines are snapshotted against the
/// current ingredient row inside the save transaction; manual lines carry
/// their own absolute totals.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum LineDraft {
    Ingredient { ingredient_id: i64, amount: f64 },
    Manual {
        name: String,
        unit: Unit,
        amount: f64,
        totals: Nutrients,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MealDraft {
    /// `Some` updates an existing meal, `None` creates one.
    pub id: Option<i64>,
    pub date: String,
    pub time: String,
    pub lines: Vec<LineDraft>,
}

/// The single default-row of daily targets (absolute grams).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct DailyGoals {
    pub id: i64,
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub targets: Nutrients,
}

/// Subset of goal fields; `None` means "inherit the default".
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize, FromRow)]
pub struct GoalPatch {
    pub calories: Option<f64>,
    pub fat: Option<f64>,
    pub carbs: Option<f64>,
    pub sugar: Option<f64>,
    pub protein: Option<f64>,
    pub salt: Option<f64>,
    pub fiber: Option<f64>,
}

impl GoalPatch {
    pub fn is_empty(&self) -> bool {
        self.calories.is_none()
            && self.fat.is_none()
            && self.carbs.is_none()
            && self.sugar.is_none()
            && self.protein.is_none()
            && self.salt.is_none()
            && self.fiber.is_none()
    }
}

/// A per-date exception to the default goals. At most one row per date.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct GoalOverride {
    pub id: i64,
    pub date: String,
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub patch: GoalPatch,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unit_round_trips_through_str() {
        assert_eq!(Unit::G.as_str(), "g");
        assert_eq!(Unit::Ml.to_string(), "ml");
    }

    #[test]
    fn line_kind_exposes_ingredient_reference() {
        let line = MealLine {
            id: 1,
            meal_id: 2,
            name: "Oats".into(),
            unit: Unit::G,
            amount: 80.0,
            kind: LineKind::Ingredient {
                ingredient_id: 7,
                per_100: Nutrients::ZERO,
            },
        };
        assert_eq!(line.ingredient_id(), Some(7));

        let manual = MealLine {
            kind: LineKind::Manual {
                totals: Nutrients::ZERO,
            },
            ..line
        };
        assert_eq!(manual.ingredient_id(), None);
    }

    #[test]
    fn empty_goal_patch_detected() {
        assert!(GoalPatch::default().is_empty());
        let patch = GoalPatch {
            salt: Some(5.0),
            ..GoalPatch::default()
        };
        assert!(!patch.is_empty());
    }
}
