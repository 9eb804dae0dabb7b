pub mod db;
pub mod error;
pub mod live;
pub mod lookup;
pub mod migrate;
pub mod model;
pub mod net;
pub mod nutrition;
pub mod scanner;
pub mod store;
pub mod time;

use std::path::Path;

pub use error::{AppError, AppResult};
pub use model::{
    DailyGoals, GoalOverride, GoalPatch, Ingredient, IngredientPatch, LineDraft, LineKind, Meal,
    MealDraft, MealLine, NewIngredient, Recipe, RecipeDraft, RecipeLineDraft, RecipeIngredient,
    Unit,
};
pub use net::{BarcodeHit, LookupService, OnlineStatus};
pub use nutrition::{Nutrients, RecipeNutrition};
pub use scanner::{CameraBackend, CameraDevice, ScanError, ScanSession};
pub use store::{Change, Store, Table};

/// Install the tracing subscriber. Safe to call more than once; later calls
/// are no-ops.
pub fn init_logging() {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("mealtrack=info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .try_init();
}

/// Open (or create) the database at `path`, bring the schema up to date, seed
/// first-run defaults, and hand back the store.
///
/// A failed migration aborts the open: continuing against a half-migrated
/// store is not safe, and the unadvanced version marker means the migration
/// is retried on the next open.
pub async fn open_store(path: &Path) -> anyhow::Result<Store> {
    let pool = db::open_sqlite_pool(path).await?;
    migrate::apply_migrations(&pool).await?;
    let store = Store::new(pool);
    store.seed_default_goals().await?;
    Ok(store)
}
