//! Reactive read queries: each live query re-runs automatically whenever one
//! of its source tables changes, pushing fresh results to the holder. No
//! manual refresh call exists; dropping the query stops its driver task.

use std::future::Future;

use serde::Serialize;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::warn;

use crate::error::AppResult;
use crate::model::{Ingredient, LineKind, Meal, MealLine, Recipe};
use crate::nutrition::{self, Nutrients};
use crate::store::{Store, Table};

pub struct LiveQuery<T> {
    rx: watch::Receiver<T>,
    driver: JoinHandle<()>,
}

impl<T: Clone> LiveQuery<T> {
    /// Latest result pushed by the driver.
    pub fn current(&self) -> T {
        self.rx.borrow().clone()
    }

    /// Wait for the next push. Returns `false` once the driver is gone.
    pub async fn changed(&mut self) -> bool {
        self.rx.changed().await.is_ok()
    }
}

impl<T> Drop for LiveQuery<T> {
    fn drop(&mut self) {
        self.driver.abort();
    }
}

/// Run `query` once for the initial value, then again after every committed
/// write to one of `tables`. Query failures keep the previous value; a lagged
/// change feed just forces a re-run.
pub async fn watch<T, F, Fut>(
    store: &Store,
    tables: &'static [Table],
    query: F,
) -> AppResult<LiveQuery<T>>
where
    T: Clone + Send + Sync + 'static,
    F: Fn(Store) -> Fut + Send + 'static,
    Fut: Future<Output = AppResult<T>> + Send,
{
    let initial = query(store.clone()).await?;
    let (tx, rx) = watch::channel(initial);
    let mut changes = store.subscribe();
    let store = store.clone();

    let driver = tokio::spawn(async move {
        loop {
            let relevant = match changes.recv().await {
                Ok(change) => tables.contains(&change.table),
                Err(RecvError::Lagged(_)) => true,
                Err(RecvError::Closed) => break,
            };
            if !relevant {
                continue;
            }
            match query(store.clone()).await {
                Ok(value) => {
                    if tx.send(value).is_err() {
                        break;
                    }
                }
                Err(e) => {
                    warn!(target = "mealtrack", event = "live_query_failed", error = %e);
                }
            }
        }
    });

    Ok(LiveQuery { rx, driver })
}

/// A meal line enriched with its current display name: linked lines show the
/// ingredient's live name when it still resolves, manual lines their own.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LineView {
    pub display_name: String,
    #[serde(flatten)]
    pub line: MealLine,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MealView {
    pub meal: Meal,
    pub lines: Vec<LineView>,
    pub nutrition: Nutrients,
}

async fn load_meals_for_date(store: Store, date: String) -> AppResult<Vec<MealView>> {
    let meals = store.meals_by_date(&date).await?;
    let mut out = Vec::with_capacity(meals.len());
    for meal in meals {
        let lines = store.meal_lines(meal.id).await?;
        let nutrition = nutrition::meal_nutrition(lines.iter());
        let mut views = Vec::with_capacity(lines.len());
        for line in lines {
            let display_name = match &line.kind {
                LineKind::Ingredient { ingredient_id, .. } => store
                    .ingredient(*ingredient_id)
                    .await?
                    .map(|i| i.name)
                    .unwrap_or_else(|| line.name.clone()),
                LineKind::Manual { .. } => line.name.clone(),
            };
            views.push(LineView { display_name, line });
        }
        out.push(MealView {
            meal,
            lines: views,
            nutrition,
        });
    }
    Ok(out)
}

/// All meals on a date, with lines and computed nutrition, ordered by time.
pub async fn meals_for_date(
    store: &Store,
    date: impl Into<String>,
) -> AppResult<LiveQuery<Vec<MealView>>> {
    let date = date.into();
    watch(
        store,
        &[Table::Meals, Table::MealLines, Table::Ingredients],
        move |s| load_meals_for_date(s, date.clone()),
    )
    .await
}

/// Ingredient listing, optionally filtered by a search term.
pub async fn ingredients(
    store: &Store,
    search: Option<String>,
) -> AppResult<LiveQuery<Vec<Ingredient>>> {
    watch(store, &[Table::Ingredients], move |s| {
        let search = search.clone();
        async move { s.ingredients(search.as_deref()).await }
    })
    .await
}

/// Recipe listing, optionally filtered by a search term.
pub async fn recipes(store: &Store, search: Option<String>) -> AppResult<LiveQuery<Vec<Recipe>>> {
    watch(store, &[Table::Recipes], move |s| {
        let search = search.clone();
        async move { s.recipes(search.as_deref()).await }
    })
    .await
}

/// Resolved goals for a date (default merged with any override).
pub async fn goals_for_date(
    store: &Store,
    date: impl Into<String>,
) -> AppResult<LiveQuery<Nutrients>> {
    let date = date.into();
    watch(
        store,
        &[Table::DailyGoals, Table::DailyGoalOverrides],
        move |s| {
            let date = date.clone();
            async move { s.goals_for_date(&date).await }
        },
    )
    .await
}
