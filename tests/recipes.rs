use anyhow::Result;

use mealtrack::{RecipeDraft, RecipeLineDraft};

mod util;

#[tokio::test]
async fn save_and_reload_recipe() -> Result<()> {
    let store = util::migrated_store().await;
    let oats_id = store.add_ingredient(util::oats()).await?;
    let milk_id = store.add_ingredient(util::milk()).await?;

    let recipe_id = store
        .save_recipe(RecipeDraft {
            id: None,
            name: "Porridge".into(),
            servings: 2.0,
            lines: vec![
                RecipeLineDraft {
                    ingredient_id: oats_id,
                    amount: 80.0,
                },
                RecipeLineDraft {
                    ingredient_id: milk_id,
                    amount: 200.0,
                },
            ],
        })
        .await?;

    let recipe = store.recipe(recipe_id).await?.expect("recipe present");
    assert_eq!(recipe.name, "Porridge");
    assert_eq!(recipe.servings, 2.0);
    let lines = store.recipe_lines(recipe_id).await?;
    assert_eq!(lines.len(), 2);
    assert_eq!(lines[0].ingredient_id, oats_id);
    assert_eq!(lines[0].amount, 80.0);

    let hits = store.recipes(Some("porr")).await?;
    assert_eq!(hits.len(), 1);
    Ok(())
}

#[tokio::test]
async fn resave_replaces_links_wholesale() -> Result<()> {
    let store = util::migrated_store().await;
    let oats_id = store.add_ingredient(util::oats()).await?;
    let milk_id = store.add_ingredient(util::milk()).await?;

    let recipe_id = store
        .save_recipe(RecipeDraft {
            id: None,
            name: "Porridge".into(),
            servings: 1.0,
            lines: vec![RecipeLineDraft {
                ingredient_id: oats_id,
                amount: 80.0,
            }],
        })
        .await?;

    store
        .save_recipe(RecipeDraft {
            id: Some(recipe_id),
            name: "Porridge deluxe".into(),
            servings: 3.0,
            lines: vec![RecipeLineDraft {
                ingredient_id: milk_id,
                amount: 300.0,
            }],
        })
        .await?;

    let recipe = store.recipe(recipe_id).await?.expect("recipe present");
    assert_eq!(recipe.name, "Porridge deluxe");
    assert_eq!(recipe.servings, 3.0);
    let lines = store.recipe_lines(recipe_id).await?;
    assert_eq!(lines.len(), 1);
    assert_eq!(lines[0].ingredient_id, milk_id);
    Ok(())
}

#[tokio::test]
async fn recipe_nutrition_totals_and_per_serving() -> Result<()> {
    let store = util::migrated_store().await;
    let oats_id = store.add_ingredient(util::oats()).await?;

    let recipe_id = store
        .save_recipe(RecipeDraft {
            id: None,
            name: "Oat bake".into(),
            servings: 2.0,
            lines: vec![RecipeLineDraft {
                ingredient_id: oats_id,
                amount: 200.0,
            }],
        })
        .await?;

    let n = store.recipe_nutrition(recipe_id).await?;
    assert!((n.total.calories - 778.0).abs() < 1e-9);
    assert!((n.per_serving.calories - 389.0).abs() < 1e-9);

    // A dangling link after the ingredient went away is tolerated.
    // (Cascade deletion removes the link; simulate older data instead.)
    sqlx::query("INSERT INTO recipe_ingredients (recipe_id, ingredient_id, amount) VALUES (?, 404, 150)")
        .bind(recipe_id)
        .execute(store.pool())
        .await?;
    let n = store.recipe_nutrition(recipe_id).await?;
    assert!((n.total.calories - 778.0).abs() < 1e-9, "dangling link adds zero");
    Ok(())
}

#[tokio::test]
async fn delete_recipe_removes_links_and_missing_is_not_found() -> Result<()> {
    let store = util::migrated_store().await;
    let oats_id = store.add_ingredient(util::oats()).await?;
    let recipe_id = store
        .save_recipe(RecipeDraft {
            id: None,
            name: "Porridge".into(),
            servings: 1.0,
            lines: vec![RecipeLineDraft {
                ingredient_id: oats_id,
                amount: 80.0,
            }],
        })
        .await?;

    store.delete_recipe(recipe_id).await?;
    assert!(store.recipe(recipe_id).await?.is_none());
    assert_eq!(store.recipe_lines(recipe_id).await?.len(), 0);

    let err = store.delete_recipe(recipe_id).await.unwrap_err();
    assert_eq!(err.code(), "STORE/NOT_FOUND");
    Ok(())
}
