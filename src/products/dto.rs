use serde::Deserialize;
use sqlx::types::Decimal;

#[derive(Debug, Deserialize)]
pub struct CreateProductRequest {
    pub name: String,
    pub price: Decimal,
    pub quantity: i32,
}

#[derive(Debug, Deserialize)]
pub struct UpdateProductRequest {
    pub name: String,
    pub price: Decimal,
    pub quantity: i32,
}
