use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post, put},
    Json, Router,
};
use tracing::{error, instrument, warn};

use crate::{
    auth::extractors::AuthUser,
    cache::CacheError,
    state::AppState,
};

use super::dto::{CreateProductRequest, UpdateProductRequest};
use super::repo::Product;

/// Read-through cache key for the full product list. Shared namespace;
/// must not change.
pub const PRODUCT_LIST_KEY: &str = "api-vendas-PRODUCT_LIST";

pub fn read_routes() -> Router<AppState> {
    Router::new()
        .route("/products", get(list_products))
        .route("/products/:id", get(show_product))
}

pub fn write_routes() -> Router<AppState> {
    Router::new()
        .route("/products", post(create_product))
        .route("/products/:id", put(update_product))
}

#[instrument(skip(state))]
pub async fn list_products(
    State(state): State<AppState>,
    AuthUser(_user_id): AuthUser,
) -> Result<Json<Vec<Product>>, (StatusCode, String)> {
    match state.cache.recover(PRODUCT_LIST_KEY).await {
        Ok(Some(value)) => match serde_json::from_value::<Vec<Product>>(value) {
            Ok(products) => return Ok(Json(products)),
            Err(e) => {
                warn!(error = %e, "unreadable product list cache entry, refetching");
            }
        },
        Ok(None) => {}
        Err(e) => return Err(unavailable(e)),
    }

    let products = state.products.find_all().await.map_err(internal)?;
    let value = serde_json::to_value(&products).map_err(internal)?;
    state
        .cache
        .save(PRODUCT_LIST_KEY, value, None)
        .await
        .map_err(unavailable)?;

    Ok(Json(products))
}

#[instrument(skip(state))]
pub async fn show_product(
    State(state): State<AppState>,
    AuthUser(_user_id): AuthUser,
    Path(id): Path<i32>,
) -> Result<Json<Product>, (StatusCode, String)> {
    match state.products.find_by_id(id).await.map_err(internal)? {
        Some(product) => Ok(Json(product)),
        None => Err((StatusCode::NOT_FOUND, "Product not found".into())),
    }
}

#[instrument(skip(state, payload))]
pub async fn create_product(
    State(state): State<AppState>,
    AuthUser(_user_id): AuthUser,
    Json(payload): Json<CreateProductRequest>,
) -> Result<(StatusCode, Json<Product>), (StatusCode, String)> {
    if state
        .products
        .find_by_name(&payload.name)
        .await
        .map_err(internal)?
        .is_some()
    {
        warn!(name = %payload.name, "duplicate product name");
        return Err((
            StatusCode::CONFLICT,
            "There is already one product with this name".into(),
        ));
    }

    state
        .cache
        .invalidate(PRODUCT_LIST_KEY)
        .await
        .map_err(unavailable)?;

    let product = state
        .products
        .create(&payload.name, payload.price, payload.quantity)
        .await
        .map_err(internal)?;

    Ok((StatusCode::CREATED, Json(product)))
}

#[instrument(skip(state, payload))]
pub async fn update_product(
    State(state): State<AppState>,
    AuthUser(_user_id): AuthUser,
    Path(id): Path<i32>,
    Json(payload): Json<UpdateProductRequest>,
) -> Result<Json<Product>, (StatusCode, String)> {
    // validate before touching the cache; a rejected update must not evict
    // the listing
    if state
        .products
        .find_by_id(id)
        .await
        .map_err(internal)?
        .is_none()
    {
        return Err((StatusCode::NOT_FOUND, "Product not found".into()));
    }

    if let Some(existing) = state
        .products
        .find_by_name(&payload.name)
        .await
        .map_err(internal)?
    {
        if existing.id != id {
            warn!(name = %payload.name, "duplicate product name");
            return Err((
                StatusCode::CONFLICT,
                "There is already one product with this name".into(),
            ));
        }
    }

    state
        .cache
        .invalidate(PRODUCT_LIST_KEY)
        .await
        .map_err(unavailable)?;

    match state
        .products
        .update(id, &payload.name, payload.price, payload.quantity)
        .await
        .map_err(internal)?
    {
        Some(product) => Ok(Json(product)),
        None => Err((StatusCode::NOT_FOUND, "Product not found".into())),
    }
}

fn internal<E: std::fmt::Display>(e: E) -> (StatusCode, String) {
    error!(error = %e, "products internal error");
    (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
}

fn unavailable(e: CacheError) -> (StatusCode, String) {
    error!(error = %e, "product cache unreachable");
    (StatusCode::SERVICE_UNAVAILABLE, "Cache unavailable".into())
}
