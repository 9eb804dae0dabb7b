use std::ops::{Add, AddAssign, Mul};

use serde::{Deserialize, Serialize};

use crate::model::{GoalPatch, Ingredient, LineKind, MealLine, RecipeIngredient};

/// The seven tracked nutrient quantities. Depending on context the vector is
/// either "per 100 g/ml" or an absolute total; callers keep track of which.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Nutrients {
    pub calories: f64,
    pub fat: f64,
    pub carbs: f64,
    pub sugar: f64,
    pub protein: f64,
    pub salt: f64,
    pub fiber: f64,
}

impl Nutrients {
    pub const ZERO: Nutrients = Nutrients {
        calories: 0.0,
        fat: 0.0,
        carbs: 0.0,
        sugar: 0.0,
        protein: 0.0,
        salt: 0.0,
        fiber: 0.0,
    };

    pub fn scale(self, factor: f64) -> Nutrients {
        Nutrients {
            calories: self.calories * factor,
            fat: self.fat * factor,
            carbs: self.carbs * factor,
            sugar: self.sugar * factor,
            protein: self.protein * factor,
            salt: self.salt * factor,
            fiber: self.fiber * factor,
        }
    }
}

impl Add for Nutrients {
    type Output = Nutrients;

    fn add(self, rhs: Nutrients) -> Nutrients {
        Nutrients {
            calories: self.calories + rhs.calories,
            fat: self.fat + rhs.fat,
            carbs: self.carbs + rhs.carbs,
            sugar: self.sugar + rhs.sugar,
            protein: self.protein + rhs.protein,
            salt: self.salt + rhs.salt,
            fiber: self.fiber + rhs.fiber,
        }
    }
}

impl AddAssign for Nutrients {
    fn add_assign(&mut self, rhs: Nutrients) {
        *self = *self + rhs;
    }
}

impl Mul<f64> for Nutrients {
    type Output = Nutrients;

    fn mul(self, factor: f64) -> Nutrients {
        self.scale(factor)
    }
}

/// Fallback targets used when no default goals row exists yet.
pub const FALLBACK_GOALS: Nutrients = Nutrients {
    calories: 2000.0,
    fat: 70.0,
    carbs: 260.0,
    sugar: 90.0,
    protein: 50.0,
    salt: 6.0,
    fiber: 30.0,
};

/// Nutrition contributed by a single meal line.
///
/// Ingredient-linked lines carry a per-100-unit snapshot and scale with the
/// logged amount; manual lines already store absolute totals and pass through
/// unchanged regardless of `amount`.
pub fn line_nutrition(line: &MealLine) -> Nutrients {
    match &line.kind {
        LineKind::Ingredient { per_100, .. } => per_100.scale(line.amount / 100.0),
        LineKind::Manual { totals } => *totals,
    }
}

/// Element-wise sum over a meal's lines. Empty meals total zero.
pub fn meal_nutrition<'a>(lines: impl IntoIterator<Item = &'a MealLine>) -> Nutrients {
    lines
        .into_iter()
        .fold(Nutrients::ZERO, |acc, line| acc + line_nutrition(line))
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RecipeNutrition {
    pub total: Nutrients,
    pub per_serving: Nutrients,
}

/// Total and per-serving nutrition for a recipe's resolved ingredient links.
///
/// A link whose ingredient no longer resolves contributes zero; a dangling
/// reference is an expected leftover of cascading deletes, not an error.
/// `servings` below 1 divides as 1.
pub fn recipe_nutrition<'a>(
    lines: impl IntoIterator<Item = (&'a RecipeIngredient, Option<&'a Ingredient>)>,
    servings: f64,
) -> RecipeNutrition {
    let total = lines
        .into_iter()
        .fold(Nutrients::ZERO, |acc, (link, ingredient)| {
            match ingredient {
                Some(ing) => acc + ing.per_100.scale(link.amount / 100.0),
                None => acc,
            }
        });
    let divisor = if servings >= 1.0 { servings } else { 1.0 };
    RecipeNutrition {
        total,
        per_serving: total.scale(1.0 / divisor),
    }
}

/// Merge the default goals row with a per-date override. Fields present in
/// the override win; absent fields fall back to the default; no default row
/// at all falls back to [`FALLBACK_GOALS`].
pub fn resolve_goals(default: Option<&Nutrients>, override_row: Option<&GoalPatch>) -> Nutrients {
    let base = default.copied().unwrap_or(FALLBACK_GOALS);
    match override_row {
        None => base,
        Some(ov) => Nutrients {
            calories: ov.calories.unwrap_or(base.calories),
            fat: ov.fat.unwrap_or(base.fat),
            carbs: ov.carbs.unwrap_or(base.carbs),
            sugar: ov.sugar.unwrap_or(base.sugar),
            protein: ov.protein.unwrap_or(base.protein),
            salt: ov.salt.unwrap_or(base.salt),
            fiber: ov.fiber.unwrap_or(base.fiber),
        },
    }
}

/// Caloric density used when presenting macro goals as a share of the calorie
/// goal: fat 9 kcal/g, carbs and protein 4 kcal/g. Stored goals are grams;
/// this conversion is presentation-only.
pub fn grams_as_calorie_share(goals: &Nutrients) -> (f64, f64, f64) {
    if goals.calories <= 0.0 {
        return (0.0, 0.0, 0.0);
    }
    (
        goals.fat * 9.0 / goals.calories,
        goals.carbs * 4.0 / goals.calories,
        goals.protein * 4.0 / goals.calories,
    )
}
