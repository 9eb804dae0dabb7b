#![allow(dead_code, clippy::unwrap_used, clippy::expect_used)]

use sqlx::SqlitePool;

use mealtrack::{db, migrate, NewIngredient, Nutrients, Store, Unit};

pub async fn temp_pool() -> SqlitePool {
    db::open_memory_pool().await.expect("open sqlite::memory:")
}

/// Fresh in-memory store at the latest schema version.
pub async fn migrated_store() -> Store {
    let pool = temp_pool().await;
    migrate::apply_migrations(&pool)
        .await
        .expect("apply migrations");
    Store::new(pool)
}

pub fn oats_per_100() -> Nutrients {
    Nutrients {
        calories: 389.0,
        fat: 6.9,
        carbs: 66.3,
        sugar: 0.99,
        protein: 16.9,
        salt: 0.01,
        fiber: 10.6,
    }
}

pub fn oats() -> NewIngredient {
    NewIngredient {
        barcode: Some("4000417025005".into()),
        name: "Oats".into(),
        unit: Unit::G,
        per_100: oats_per_100(),
        default_serving: 40.0,
    }
}

pub fn milk() -> NewIngredient {
    NewIngredient {
        barcode: None,
        name: "Milk".into(),
        unit: Unit::Ml,
        per_100: Nutrients {
            calories: 64.0,
            fat: 3.5,
            carbs: 4.8,
            sugar: 4.8,
            protein: 3.4,
            salt: 0.13,
            fiber: 0.0,
        },
        default_serving: 200.0,
    }
}
