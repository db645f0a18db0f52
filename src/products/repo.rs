use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::Mutex;

use axum::async_trait;
use serde::{Deserialize, Serialize};
use sqlx::{types::Decimal, FromRow, PgPool};
use time::OffsetDateTime;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Product {
    pub id: i32,
    pub name: String,
    pub price: Decimal,
    pub quantity: i32,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

/// Product repository behind the cached listing. Injected like `UserStore`
/// so the handlers run against an in-memory store in tests.
#[async_trait]
pub trait ProductStore: Send + Sync {
    async fn find_all(&self) -> anyhow::Result<Vec<Product>>;
    async fn find_by_id(&self, id: i32) -> anyhow::Result<Option<Product>>;
    async fn find_by_name(&self, name: &str) -> anyhow::Result<Option<Product>>;
    async fn create(&self, name: &str, price: Decimal, quantity: i32) -> anyhow::Result<Product>;
    async fn update(
        &self,
        id: i32,
        name: &str,
        price: Decimal,
        quantity: i32,
    ) -> anyhow::Result<Option<Product>>;
}

/// Postgres-backed product store.
pub struct PgProductStore {
    db: PgPool,
}

impl PgProductStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl ProductStore for PgProductStore {
    async fn find_all(&self) -> anyhow::Result<Vec<Product>> {
        let rows = sqlx::query_as::<_, Product>(
            r#"
            SELECT id, name, price, quantity, created_at, updated_at
            FROM products
            ORDER BY id
            "#,
        )
        .fetch_all(&self.db)
        .await?;
        Ok(rows)
    }

    async fn find_by_id(&self, id: i32) -> anyhow::Result<Option<Product>> {
        let product = sqlx::query_as::<_, Product>(
            r#"
            SELECT id, name, price, quantity, created_at, updated_at
            FROM products
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.db)
        .await?;
        Ok(product)
    }

    async fn find_by_name(&self, name: &str) -> anyhow::Result<Option<Product>> {
        let product = sqlx::query_as::<_, Product>(
            r#"
            SELECT id, name, price, quantity, created_at, updated_at
            FROM products
            WHERE name = $1
            "#,
        )
        .bind(name)
        .fetch_optional(&self.db)
        .await?;
        Ok(product)
    }

    async fn create(&self, name: &str, price: Decimal, quantity: i32) -> anyhow::Result<Product> {
        let product = sqlx::query_as::<_, Product>(
            r#"
            INSERT INTO products (name, price, quantity)
            VALUES ($1, $2, $3)
            RETURNING id, name, price, quantity, created_at, updated_at
            "#,
        )
        .bind(name)
        .bind(price)
        .bind(quantity)
        .fetch_one(&self.db)
        .await?;
        Ok(product)
    }

    async fn update(
        &self,
        id: i32,
        name: &str,
        price: Decimal,
        quantity: i32,
    ) -> anyhow::Result<Option<Product>> {
        let product = sqlx::query_as::<_, Product>(
            r#"
            UPDATE products
            SET name = $2, price = $3, quantity = $4, updated_at = now()
            WHERE id = $1
            RETURNING id, name, price, quantity, created_at, updated_at
            "#,
        )
        .bind(id)
        .bind(name)
        .bind(price)
        .bind(quantity)
        .fetch_optional(&self.db)
        .await?;
        Ok(product)
    }
}

/// In-memory product store backing `AppState::fake()` and unit tests.
pub struct MemoryProductStore {
    products: Mutex<Vec<Product>>,
    next_id: AtomicI32,
}

impl Default for MemoryProductStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryProductStore {
    pub fn new() -> Self {
        Self {
            products: Mutex::new(Vec::new()),
            next_id: AtomicI32::new(1),
        }
    }
}

#[async_trait]
impl ProductStore for MemoryProductStore {
    async fn find_all(&self) -> anyhow::Result<Vec<Product>> {
        Ok(self.products.lock().unwrap().clone())
    }

    async fn find_by_id(&self, id: i32) -> anyhow::Result<Option<Product>> {
        let products = self.products.lock().unwrap();
        Ok(products.iter().find(|p| p.id == id).cloned())
    }

    async fn find_by_name(&self, name: &str) -> anyhow::Result<Option<Product>> {
        let products = self.products.lock().unwrap();
        Ok(products.iter().find(|p| p.name == name).cloned())
    }

    async fn create(&self, name: &str, price: Decimal, quantity: i32) -> anyhow::Result<Product> {
        let now = OffsetDateTime::now_utc();
        let product = Product {
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            name: name.to_string(),
            price,
            quantity,
            created_at: now,
            updated_at: now,
        };
        self.products.lock().unwrap().push(product.clone());
        Ok(product)
    }

    async fn update(
        &self,
        id: i32,
        name: &str,
        price: Decimal,
        quantity: i32,
    ) -> anyhow::Result<Option<Product>> {
        let mut products = self.products.lock().unwrap();
        match products.iter_mut().find(|p| p.id == id) {
            Some(product) => {
                product.name = name.to_string();
                product.price = price;
                product.quantity = quantity;
                product.updated_at = OffsetDateTime::now_utc();
                Ok(Some(product.clone()))
            }
            None => Ok(None),
        }
    }
}
