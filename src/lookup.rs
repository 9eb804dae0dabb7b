//! Barcode lookup against the Open Food Facts product API, normalized to the
//! internal per-100-unit ingredient shape.

use serde::Deserialize;
use tracing::{debug, info};

use crate::error::{AppError, AppResult};
use crate::model::Unit;
use crate::nutrition::Nutrients;

pub const DEFAULT_BASE_URL: &str = "https://world.openfoodfacts.net/api/v2/product";
const USER_AGENT: &str = "mealtrack/0.1 (mealtrack@posteo.de)";

/// Normalized lookup result. `found: false` means the remote database does
/// not know the barcode; transport and HTTP failures are errors instead.
#[derive(Debug, Clone, PartialEq)]
pub struct ProductResult {
    pub found: bool,
    pub name: String,
    pub unit: Unit,
    pub per_100: Nutrients,
}

impl ProductResult {
    fn not_found() -> Self {
        ProductResult {
            found: false,
            name: String::new(),
            unit: Unit::G,
            per_100: Nutrients::ZERO,
        }
    }
}

#[derive(Deserialize)]
struct ApiResponse {
    status: i64,
    product: Option<ApiProduct>,
}

#[derive(Deserialize, Default)]
struct ApiProduct {
    product_name: Option<String>,
    nutrition_data_per: Option<String>,
    nutriments: Option<ApiNutriments>,
}

#[derive(Deserialize, Default)]
struct ApiNutriments {
    #[serde(rename = "energy-kcal_100g")]
    energy_kcal_100g: Option<f64>,
    fat_100g: Option<f64>,
    carbohydrates_100g: Option<f64>,
    sugars_100g: Option<f64>,
    proteins_100g: Option<f64>,
    salt_100g: Option<f64>,
    fiber_100g: Option<f64>,
}

pub struct FoodFactsClient {
    http: reqwest::Client,
    base_url: String,
}

impl Default for FoodFactsClient {
    fn default() -> Self {
        Self::new()
    }
}

impl FoodFactsClient {
    pub fn new() -> Self {
        Self::with_base_url(DEFAULT_BASE_URL)
    }

    /// Point the client at a different host; used by tests.
    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        let http = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .build()
            .expect("reqwest client with static configuration");
        FoodFactsClient {
            http,
            base_url: base_url.into(),
        }
    }

    /// Fetch nutrition facts for a barcode. Non-success HTTP statuses are
    /// hard failures; a well-formed "product unknown" reply is `found: false`.
    pub async fn lookup(&self, barcode: &str) -> AppResult<ProductResult> {
        // The barcode is scanner input; it goes into the path as a single
        // percent-encoded segment, never by string concatenation.
        let mut url = reqwest::Url::parse(&self.base_url)
            .map_err(|e| AppError::new("LOOKUP/REQUEST", e.to_string()))?;
        url.path_segments_mut()
            .map_err(|_| AppError::new("LOOKUP/REQUEST", "Lookup base URL cannot hold a path"))?
            .pop_if_empty()
            .push(barcode);
        url.query_pairs_mut()
            .append_pair("product_type", "food")
            .append_pair("cc", "de")
            .append_pair("lc", "de")
            .append_pair("fields", "product_name,nutriments,nutrition_data_per");
        debug!(target = "mealtrack", event = "lookup_request", barcode);

        let response = self.http.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(AppError::new("LOOKUP/HTTP", "Product lookup failed")
                .with_context("status", status.as_u16().to_string())
                .with_context("barcode", barcode.to_string()));
        }

        let body: ApiResponse = response.json().await?;
        if body.status != 1 {
            info!(target = "mealtrack", event = "lookup_miss", barcode);
            return Ok(ProductResult::not_found());
        }
        let Some(product) = body.product else {
            return Ok(ProductResult::not_found());
        };

        // "100ml" (or any basis mentioning ml) selects milliliters; anything
        // else, including an absent field, defaults to grams.
        let unit = match &product.nutrition_data_per {
            Some(basis) if basis.to_lowercase().contains("ml") => Unit::Ml,
            _ => Unit::G,
        };

        let n = product.nutriments.unwrap_or_default();
        Ok(ProductResult {
            found: true,
            name: product.product_name.unwrap_or_default(),
            unit,
            per_100: Nutrients {
                calories: n.energy_kcal_100g.unwrap_or(0.0),
                fat: n.fat_100g.unwrap_or(0.0),
                carbs: n.carbohydrates_100g.unwrap_or(0.0),
                sugar: n.sugars_100g.unwrap_or(0.0),
                protein: n.proteins_100g.unwrap_or(0.0),
                salt: n.salt_100g.unwrap_or(0.0),
                fiber: n.fiber_100g.unwrap_or(0.0),
            },
        })
    }
}
