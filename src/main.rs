use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};

use mealtrack::{db, live, lookup::FoodFactsClient, migrate, nutrition, LookupService, OnlineStatus, Store, Table};

#[derive(Parser)]
#[command(name = "mealtrack", about = "Local-first nutrition tracker maintenance CLI")]
struct Cli {
    /// Database file (defaults to the platform data dir, or $MEALTRACK_DB).
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Apply pending schema migrations and exit.
    Migrate,
    /// Show schema version and row counts.
    Status,
    /// Nutrition total and goals for a date (defaults to today).
    Day { date: Option<String> },
    /// Search ingredients by name.
    Search { term: String },
    /// Look up a barcode (local store first, then the remote database).
    Lookup { barcode: String },
    /// Seed the default daily goals if none exist, then print them.
    SeedGoals,
}

#[tokio::main]
async fn main() -> Result<()> {
    mealtrack::init_logging();
    let cli = Cli::parse();
    let db_path = cli.db.unwrap_or_else(db::default_db_path);

    match cli.command {
        Command::Migrate => {
            let pool = db::open_sqlite_pool(&db_path).await?;
            migrate::apply_migrations(&pool).await?;
            println!("schema at v{}", migrate::latest_version());
        }
        Command::Status => {
            let pool = db::open_sqlite_pool(&db_path).await?;
            let version = migrate::schema_version(&pool).await?;
            match version {
                Some(v) => println!("schema version: v{v} (latest v{})", migrate::latest_version()),
                None => println!("schema version: none (empty database)"),
            }
            let store = Store::new(pool);
            for table in [
                Table::Ingredients,
                Table::Recipes,
                Table::RecipeIngredients,
                Table::Meals,
                Table::MealLines,
                Table::DailyGoals,
                Table::DailyGoalOverrides,
            ] {
                if version.is_some() {
                    println!("{:>22}: {}", table.name(), store.count(table).await?);
                }
            }
        }
        Command::Day { date } => {
            let store = mealtrack::open_store(&db_path).await?;
            let date = date.unwrap_or_else(mealtrack::time::today);
            let consumed = store.day_nutrition(&date).await?;
            let goals = store.goals_for_date(&date).await?;
            println!("{date}");
            println!(
                "  calories {:.0}/{:.0}  fat {:.0}/{:.0}g  carbs {:.0}/{:.0}g  protein {:.0}/{:.0}g",
                consumed.calories,
                goals.calories,
                consumed.fat,
                goals.fat,
                consumed.carbs,
                goals.carbs,
                consumed.protein,
                goals.protein
            );
            let (fat_share, carb_share, protein_share) = nutrition::grams_as_calorie_share(&goals);
            println!(
                "  goal split: fat {:.0}%  carbs {:.0}%  protein {:.0}%",
                fat_share * 100.0,
                carb_share * 100.0,
                protein_share * 100.0
            );
            let meals = live::meals_for_date(&store, date).await?;
            for view in meals.current() {
                println!(
                    "  {} {} ({:.0} kcal)",
                    view.meal.time,
                    view.meal.name,
                    view.nutrition.calories
                );
            }
        }
        Command::Search { term } => {
            let store = mealtrack::open_store(&db_path).await?;
            for ing in store.ingredients(Some(&term)).await? {
                println!(
                    "#{} {} ({:.0} kcal/100{})",
                    ing.id, ing.name, ing.per_100.calories, ing.unit
                );
            }
        }
        Command::Lookup { barcode } => {
            let store = mealtrack::open_store(&db_path).await?;
            let service = LookupService::new(FoodFactsClient::new(), OnlineStatus::new(true));
            match service.resolve(&store, &barcode).await? {
                mealtrack::BarcodeHit::Local(ing) => {
                    println!("local ingredient #{}: {}", ing.id, ing.name)
                }
                mealtrack::BarcodeHit::Remote(product) => {
                    println!("remote product: {}", product.name);
                    println!(
                        "  per 100{}: {:.0} kcal, fat {:.1}, carbs {:.1}, protein {:.1}",
                        product.unit,
                        product.per_100.calories,
                        product.per_100.fat,
                        product.per_100.carbs,
                        product.per_100.protein
                    );
                }
                mealtrack::BarcodeHit::Unknown => println!("barcode not found"),
            }
        }
        Command::SeedGoals => {
            let store = mealtrack::open_store(&db_path).await?;
            store.seed_default_goals().await?;
            match store.default_goals().await? {
                Some(goals) => {
                    let t = goals.targets;
                    println!(
                        "daily goals: {:.0} kcal, fat {:.0}g, carbs {:.0}g, sugar {:.0}g, \
                         protein {:.0}g, salt {:.0}g, fiber {:.0}g",
                        t.calories, t.fat, t.carbs, t.sugar, t.protein, t.salt, t.fiber
                    );
                }
                None => println!("no default goals row"),
            }
        }
    }

    Ok(())
}
