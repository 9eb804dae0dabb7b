use anyhow::Result;

use mealtrack::{GoalPatch, Nutrients};

mod util;

#[tokio::test]
async fn seeding_is_a_one_shot() -> Result<()> {
    let store = util::migrated_store().await;

    store.seed_default_goals().await?;
    let goals = store.default_goals().await?.expect("seeded row");
    assert_eq!(goals.targets.calories, 2700.0);
    assert_eq!(goals.targets.protein, 169.0);

    // A later seed must not clobber user edits.
    store
        .set_default_goals(Nutrients {
            calories: 2400.0,
            ..goals.targets
        })
        .await?;
    store.seed_default_goals().await?;
    let goals = store.default_goals().await?.expect("row survives");
    assert_eq!(goals.targets.calories, 2400.0);
    Ok(())
}

#[tokio::test]
async fn override_wins_for_its_date_only() -> Result<()> {
    let store = util::migrated_store().await;
    store.seed_default_goals().await?;

    store
        .upsert_override(
            "2024-03-01",
            GoalPatch {
                calories: Some(2200.0),
                ..GoalPatch::default()
            },
        )
        .await?;

    let day = store.goals_for_date("2024-03-01").await?;
    assert_eq!(day.calories, 2200.0);
    assert_eq!(day.fat, 90.0, "absent fields inherit the default");

    let other = store.goals_for_date("2024-03-02").await?;
    assert_eq!(other.calories, 2700.0);
    Ok(())
}

#[tokio::test]
async fn upsert_replaces_and_empty_patch_clears() -> Result<()> {
    let store = util::migrated_store().await;
    store.seed_default_goals().await?;

    store
        .upsert_override(
            "2024-03-01",
            GoalPatch {
                calories: Some(2200.0),
                fat: Some(70.0),
                ..GoalPatch::default()
            },
        )
        .await?;
    store
        .upsert_override(
            "2024-03-01",
            GoalPatch {
                calories: Some(2000.0),
                ..GoalPatch::default()
            },
        )
        .await?;

    // Replacement, not merge: the earlier fat override is gone.
    let ov = store.goal_override("2024-03-01").await?.expect("row present");
    assert_eq!(ov.patch.calories, Some(2000.0));
    assert_eq!(ov.patch.fat, None);

    store.upsert_override("2024-03-01", GoalPatch::default()).await?;
    assert!(store.goal_override("2024-03-01").await?.is_none());

    // Clearing twice is fine.
    store.clear_override("2024-03-01").await?;
    Ok(())
}

#[tokio::test]
async fn missing_default_row_falls_back_to_shipped_targets() -> Result<()> {
    let store = util::migrated_store().await;

    assert!(store.default_goals().await?.is_none());
    let day = store.goals_for_date("2024-03-01").await?;
    assert_eq!(day, mealtrack::nutrition::FALLBACK_GOALS);
    Ok(())
}
