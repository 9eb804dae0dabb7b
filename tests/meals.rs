use anyhow::Result;

use mealtrack::{IngredientPatch, LineDraft, LineKind, MealDraft, Nutrients, Unit};

mod util;

fn breakfast(lines: Vec<LineDraft>) -> MealDraft {
    MealDraft {
        id: None,
        date: "2024-03-01".into(),
        time: "08:00".into(),
        lines,
    }
}

#[tokio::test]
async fn save_meal_snapshots_linked_ingredients() -> Result<()> {
    let store = util::migrated_store().await;
    let oats_id = store.add_ingredient(util::oats()).await?;

    let meal_id = store
        .save_meal(breakfast(vec![LineDraft::Ingredient {
            ingredient_id: oats_id,
            amount: 80.0,
        }]))
        .await?;

    let lines = store.meal_lines(meal_id).await?;
    assert_eq!(lines.len(), 1);
    match &lines[0].kind {
        LineKind::Ingredient {
            ingredient_id,
            per_100,
        } => {
            assert_eq!(*ingredient_id, oats_id);
            assert_eq!(*per_100, util::oats_per_100());
        }
        other => panic!("expected a linked line, got {other:?}"),
    }

    let day = store.day_nutrition("2024-03-01").await?;
    assert!((day.calories - 311.2).abs() < 1e-9);

    // Later ingredient edits must not rewrite history.
    store
        .update_ingredient(
            oats_id,
            IngredientPatch {
                per_100: Some(Nutrients {
                    calories: 500.0,
                    ..util::oats_per_100()
                }),
                ..IngredientPatch::default()
            },
        )
        .await?;
    let day = store.day_nutrition("2024-03-01").await?;
    assert!((day.calories - 311.2).abs() < 1e-9);
    Ok(())
}

#[tokio::test]
async fn manual_lines_count_their_totals_verbatim() -> Result<()> {
    let store = util::migrated_store().await;
    let totals = Nutrients {
        calories: 640.0,
        fat: 30.0,
        carbs: 60.0,
        sugar: 8.0,
        protein: 25.0,
        salt: 3.0,
        fiber: 4.0,
    };
    let meal_id = store
        .save_meal(breakfast(vec![LineDraft::Manual {
            name: "Takeaway".into(),
            unit: Unit::G,
            amount: 350.0,
            totals,
        }]))
        .await?;

    let lines = store.meal_lines(meal_id).await?;
    assert_eq!(lines[0].kind, LineKind::Manual { totals });

    let day = store.day_nutrition("2024-03-01").await?;
    assert_eq!(day, totals);
    Ok(())
}

#[tokio::test]
async fn meal_name_is_derived_from_lines() -> Result<()> {
    let store = util::migrated_store().await;
    let oats_id = store.add_ingredient(util::oats()).await?;
    let milk_id = store.add_ingredient(util::milk()).await?;

    let meal_id = store
        .save_meal(breakfast(vec![
            LineDraft::Ingredient {
                ingredient_id: oats_id,
                amount: 80.0,
            },
            LineDraft::Ingredient {
                ingredient_id: milk_id,
                amount: 200.0,
            },
        ]))
        .await?;
    let meal = store.meal(meal_id).await?.expect("meal present");
    assert_eq!(meal.name, "Oats, Milk");

    let empty_id = store.save_meal(breakfast(vec![])).await?;
    assert_eq!(store.meal(empty_id).await?.expect("present").name, "Meal");
    Ok(())
}

#[tokio::test]
async fn resave_replaces_lines_wholesale() -> Result<()> {
    let store = util::migrated_store().await;
    let oats_id = store.add_ingredient(util::oats()).await?;
    let milk_id = store.add_ingredient(util::milk()).await?;

    let meal_id = store
        .save_meal(breakfast(vec![LineDraft::Ingredient {
            ingredient_id: oats_id,
            amount: 80.0,
        }]))
        .await?;

    store
        .save_meal(MealDraft {
            id: Some(meal_id),
            date: "2024-03-01".into(),
            time: "08:30".into(),
            lines: vec![LineDraft::Ingredient {
                ingredient_id: milk_id,
                amount: 200.0,
            }],
        })
        .await?;

    let lines = store.meal_lines(meal_id).await?;
    assert_eq!(lines.len(), 1);
    assert_eq!(lines[0].ingredient_id(), Some(milk_id));
    let meal = store.meal(meal_id).await?.expect("meal present");
    assert_eq!(meal.time, "08:30");
    assert_eq!(meal.name, "Milk");
    Ok(())
}

#[tokio::test]
async fn save_against_a_missing_ingredient_leaves_nothing_behind() -> Result<()> {
    let store = util::migrated_store().await;

    let err = store
        .save_meal(breakfast(vec![LineDraft::Ingredient {
            ingredient_id: 404,
            amount: 50.0,
        }]))
        .await
        .unwrap_err();
    assert_eq!(err.code(), "STORE/NOT_FOUND");
    assert_eq!(store.meals_by_date("2024-03-01").await?.len(), 0);
    Ok(())
}

#[tokio::test]
async fn delete_meal_removes_its_lines() -> Result<()> {
    let store = util::migrated_store().await;
    let oats_id = store.add_ingredient(util::oats()).await?;
    let meal_id = store
        .save_meal(breakfast(vec![LineDraft::Ingredient {
            ingredient_id: oats_id,
            amount: 80.0,
        }]))
        .await?;

    store.delete_meal(meal_id).await?;
    assert!(store.meal(meal_id).await?.is_none());
    assert_eq!(store.meal_lines(meal_id).await?.len(), 0);
    assert_eq!(store.day_nutrition("2024-03-01").await?, Nutrients::ZERO);
    Ok(())
}

#[tokio::test]
async fn days_partition_by_date_and_order_by_time() -> Result<()> {
    let store = util::migrated_store().await;

    for (date, time, calories) in [
        ("2024-03-01", "19:00", 600.0),
        ("2024-03-01", "08:00", 300.0),
        ("2024-03-02", "12:00", 450.0),
    ] {
        store
            .save_meal(MealDraft {
                id: None,
                date: date.into(),
                time: time.into(),
                lines: vec![LineDraft::Manual {
                    name: "Entry".into(),
                    unit: Unit::G,
                    amount: 100.0,
                    totals: Nutrients {
                        calories,
                        ..Nutrients::ZERO
                    },
                }],
            })
            .await?;
    }

    let day1 = store.meals_by_date("2024-03-01").await?;
    assert_eq!(day1.len(), 2);
    assert_eq!(day1[0].time, "08:00");
    assert_eq!(day1[1].time, "19:00");

    assert_eq!(store.day_nutrition("2024-03-01").await?.calories, 900.0);
    assert_eq!(store.day_nutrition("2024-03-02").await?.calories, 450.0);
    assert_eq!(store.day_nutrition("2024-03-03").await?, Nutrients::ZERO);
    Ok(())
}
