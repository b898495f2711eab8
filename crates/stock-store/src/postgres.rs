use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, Row, Transaction, postgres::PgRow};
use uuid::Uuid;

use crate::{
    ActorId, MovementId, MovementQuery, MovementType, Product, ProductId, ReservationId,
    ReservationTotals, Result, SortOrder, StockMovement, StockReservation, StoreError,
    store::{MovementStream, StockStore, StockTransaction, validate_movement, validate_reservation},
};

const PRODUCT_COLUMNS: &str = "id, name, quantity, min_stock, updated_at";
const MOVEMENT_COLUMNS: &str = "seq, id, product_id, movement_type, quantity, reason, reference, actor_id, before_qty, after_qty, created_at";
const RESERVATION_COLUMNS: &str = "id, product_id, quantity, reason, actor_id, created_at, expires_at";

/// Rows fetched per round-trip when streaming movements.
const STREAM_PAGE_SIZE: i64 = 500;

/// PostgreSQL-backed stock store implementation.
///
/// Same-product writers are serialized by the `SELECT ... FOR UPDATE` row
/// lock taken in [`StockTransaction::lock_product`]; writers of different
/// products never wait on each other.
#[derive(Clone)]
pub struct PostgresStockStore {
    pool: PgPool,
}

impl PostgresStockStore {
    /// Creates a new PostgreSQL stock store.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the database migrations.
    pub async fn run_migrations(&self) -> std::result::Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("../../migrations").run(&self.pool).await
    }

    fn row_to_product(row: PgRow) -> Result<Product> {
        Ok(Product {
            id: ProductId::from_uuid(row.try_get::<Uuid, _>("id")?),
            name: row.try_get("name")?,
            quantity: row.try_get("quantity")?,
            min_stock: row.try_get("min_stock")?,
            updated_at: row.try_get("updated_at")?,
        })
    }

    fn row_to_movement(row: PgRow) -> Result<StockMovement> {
        let movement_type: String = row.try_get("movement_type")?;
        let movement_type = movement_type
            .parse::<MovementType>()
            .map_err(|e| StoreError::Decode(e.to_string()))?;

        Ok(StockMovement {
            id: MovementId::from_uuid(row.try_get::<Uuid, _>("id")?),
            product_id: ProductId::from_uuid(row.try_get::<Uuid, _>("product_id")?),
            movement_type,
            quantity: row.try_get("quantity")?,
            reason: row.try_get("reason")?,
            reference: row.try_get("reference")?,
            actor_id: ActorId::new(row.try_get::<String, _>("actor_id")?),
            before_qty: row.try_get("before_qty")?,
            after_qty: row.try_get("after_qty")?,
            created_at: row.try_get("created_at")?,
        })
    }

    fn row_to_reservation(row: PgRow) -> Result<StockReservation> {
        Ok(StockReservation {
            id: ReservationId::from_uuid(row.try_get::<Uuid, _>("id")?),
            product_id: ProductId::from_uuid(row.try_get::<Uuid, _>("product_id")?),
            quantity: row.try_get("quantity")?,
            reason: row.try_get("reason")?,
            actor_id: ActorId::new(row.try_get::<String, _>("actor_id")?),
            created_at: row.try_get("created_at")?,
            expires_at: row.try_get("expires_at")?,
        })
    }
}

/// A PostgreSQL transaction. Rolled back by sqlx when dropped uncommitted.
pub struct PostgresTransaction {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl StockTransaction for PostgresTransaction {
    async fn lock_product(&mut self, product_id: ProductId) -> Result<Option<Product>> {
        let row = sqlx::query(&format!(
            "SELECT {PRODUCT_COLUMNS} FROM products WHERE id = $1 FOR UPDATE"
        ))
        .bind(product_id.as_uuid())
        .fetch_optional(&mut *self.tx)
        .await?;

        row.map(PostgresStockStore::row_to_product).transpose()
    }

    async fn reserved_quantity(
        &mut self,
        product_id: ProductId,
        now: DateTime<Utc>,
    ) -> Result<i64> {
        let reserved: i64 = sqlx::query_scalar(
            r#"
            SELECT COALESCE(SUM(quantity), 0)::BIGINT
            FROM stock_reservations
            WHERE product_id = $1 AND expires_at > $2
            "#,
        )
        .bind(product_id.as_uuid())
        .bind(now)
        .fetch_one(&mut *self.tx)
        .await?;

        Ok(reserved)
    }

    async fn set_quantity(&mut self, product_id: ProductId, quantity: i64) -> Result<()> {
        let result =
            sqlx::query("UPDATE products SET quantity = $2, updated_at = NOW() WHERE id = $1")
                .bind(product_id.as_uuid())
                .bind(quantity)
                .execute(&mut *self.tx)
                .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::ProductNotFound(product_id));
        }
        Ok(())
    }

    async fn insert_movement(&mut self, movement: &StockMovement) -> Result<()> {
        validate_movement(movement)?;

        sqlx::query(
            r#"
            INSERT INTO stock_movements
                (id, product_id, movement_type, quantity, reason, reference, actor_id, before_qty, after_qty, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(movement.id.as_uuid())
        .bind(movement.product_id.as_uuid())
        .bind(movement.movement_type.as_str())
        .bind(movement.quantity)
        .bind(&movement.reason)
        .bind(&movement.reference)
        .bind(movement.actor_id.as_str())
        .bind(movement.before_qty)
        .bind(movement.after_qty)
        .bind(movement.created_at)
        .execute(&mut *self.tx)
        .await?;

        Ok(())
    }

    async fn insert_reservation(&mut self, reservation: &StockReservation) -> Result<()> {
        validate_reservation(reservation)?;

        sqlx::query(
            r#"
            INSERT INTO stock_reservations (id, product_id, quantity, reason, actor_id, created_at, expires_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(reservation.id.as_uuid())
        .bind(reservation.product_id.as_uuid())
        .bind(reservation.quantity)
        .bind(&reservation.reason)
        .bind(reservation.actor_id.as_str())
        .bind(reservation.created_at)
        .bind(reservation.expires_at)
        .execute(&mut *self.tx)
        .await?;

        Ok(())
    }

    async fn take_reservation(
        &mut self,
        reservation_id: ReservationId,
    ) -> Result<Option<StockReservation>> {
        let row = sqlx::query(&format!(
            "DELETE FROM stock_reservations WHERE id = $1 RETURNING {RESERVATION_COLUMNS}"
        ))
        .bind(reservation_id.as_uuid())
        .fetch_optional(&mut *self.tx)
        .await?;

        row.map(PostgresStockStore::row_to_reservation).transpose()
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        self.tx.commit().await?;
        Ok(())
    }
}

#[async_trait]
impl StockStore for PostgresStockStore {
    async fn begin(&self) -> Result<Box<dyn StockTransaction>> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(PostgresTransaction { tx }))
    }

    async fn insert_product(&self, product: &Product) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO products (id, name, quantity, min_stock, updated_at)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(product.id.as_uuid())
        .bind(&product.name)
        .bind(product.quantity)
        .bind(product.min_stock)
        .bind(product.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            if let sqlx::Error::Database(ref db_err) = e
                && db_err.constraint() == Some("products_pkey")
            {
                return StoreError::DuplicateProduct(product.id);
            }
            StoreError::Database(e)
        })?;

        Ok(())
    }

    async fn get_product(&self, product_id: ProductId) -> Result<Option<Product>> {
        let row = sqlx::query(&format!(
            "SELECT {PRODUCT_COLUMNS} FROM products WHERE id = $1"
        ))
        .bind(product_id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;

        row.map(Self::row_to_product).transpose()
    }

    async fn get_reservation(
        &self,
        reservation_id: ReservationId,
    ) -> Result<Option<StockReservation>> {
        let row = sqlx::query(&format!(
            "SELECT {RESERVATION_COLUMNS} FROM stock_reservations WHERE id = $1"
        ))
        .bind(reservation_id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;

        row.map(Self::row_to_reservation).transpose()
    }

    async fn delete_expired_reservations(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        let result = sqlx::query("DELETE FROM stock_reservations WHERE expires_at < $1")
            .bind(cutoff)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }

    async fn active_reservations_for_product(
        &self,
        product_id: ProductId,
        now: DateTime<Utc>,
    ) -> Result<Vec<StockReservation>> {
        let rows = sqlx::query(&format!(
            r#"
            SELECT {RESERVATION_COLUMNS}
            FROM stock_reservations
            WHERE product_id = $1 AND expires_at > $2
            ORDER BY created_at ASC
            "#
        ))
        .bind(product_id.as_uuid())
        .bind(now)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Self::row_to_reservation).collect()
    }

    async fn active_reservations_for_actor(
        &self,
        actor_id: &ActorId,
        now: DateTime<Utc>,
    ) -> Result<Vec<StockReservation>> {
        let rows = sqlx::query(&format!(
            r#"
            SELECT {RESERVATION_COLUMNS}
            FROM stock_reservations
            WHERE actor_id = $1 AND expires_at > $2
            ORDER BY created_at ASC
            "#
        ))
        .bind(actor_id.as_str())
        .bind(now)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Self::row_to_reservation).collect()
    }

    async fn reservation_totals(
        &self,
        product_id: ProductId,
        now: DateTime<Utc>,
    ) -> Result<ReservationTotals> {
        let row = sqlx::query(
            r#"
            SELECT COALESCE(SUM(quantity), 0)::BIGINT AS quantity, COUNT(*) AS count
            FROM stock_reservations
            WHERE product_id = $1 AND expires_at > $2
            "#,
        )
        .bind(product_id.as_uuid())
        .bind(now)
        .fetch_one(&self.pool)
        .await?;

        let count: i64 = row.try_get("count")?;
        Ok(ReservationTotals {
            quantity: row.try_get("quantity")?,
            count: count as usize,
        })
    }

    async fn query_movements(&self, query: MovementQuery) -> Result<Vec<StockMovement>> {
        let mut sql = format!("SELECT {MOVEMENT_COLUMNS} FROM stock_movements WHERE 1=1");
        let mut param_count = 0;

        // Build dynamic query
        if query.product_id.is_some() {
            param_count += 1;
            sql.push_str(&format!(" AND product_id = ${param_count}"));
        }
        if query.movement_types.is_some() {
            param_count += 1;
            sql.push_str(&format!(" AND movement_type = ANY(${param_count})"));
        }
        if query.actor_id.is_some() {
            param_count += 1;
            sql.push_str(&format!(" AND actor_id = ${param_count}"));
        }
        if query.from_timestamp.is_some() {
            param_count += 1;
            sql.push_str(&format!(" AND created_at >= ${param_count}"));
        }
        if query.to_timestamp.is_some() {
            param_count += 1;
            sql.push_str(&format!(" AND created_at <= ${param_count}"));
        }

        match query.order {
            SortOrder::OldestFirst => sql.push_str(" ORDER BY seq ASC"),
            SortOrder::NewestFirst => sql.push_str(" ORDER BY seq DESC"),
        }

        if query.limit.is_some() {
            param_count += 1;
            sql.push_str(&format!(" LIMIT ${param_count}"));
        }
        if query.offset.is_some() {
            param_count += 1;
            sql.push_str(&format!(" OFFSET ${param_count}"));
        }

        // Build and execute query with parameters
        let mut sqlx_query = sqlx::query(&sql);

        if let Some(id) = query.product_id {
            sqlx_query = sqlx_query.bind(id.as_uuid());
        }
        if let Some(types) = query.movement_types {
            let types: Vec<String> = types.iter().map(|t| t.as_str().to_string()).collect();
            sqlx_query = sqlx_query.bind(types);
        }
        if let Some(actor) = query.actor_id {
            sqlx_query = sqlx_query.bind(actor.as_str().to_string());
        }
        if let Some(from_ts) = query.from_timestamp {
            sqlx_query = sqlx_query.bind(from_ts);
        }
        if let Some(to_ts) = query.to_timestamp {
            sqlx_query = sqlx_query.bind(to_ts);
        }
        // Postgres takes BIGINT here; larger values mean the same as i64::MAX
        if let Some(limit) = query.limit {
            sqlx_query = sqlx_query.bind(i64::try_from(limit).unwrap_or(i64::MAX));
        }
        if let Some(offset) = query.offset {
            sqlx_query = sqlx_query.bind(i64::try_from(offset).unwrap_or(i64::MAX));
        }

        let rows = sqlx_query.fetch_all(&self.pool).await?;
        rows.into_iter().map(Self::row_to_movement).collect()
    }

    async fn stream_movements(&self, product_id: ProductId) -> Result<MovementStream> {
        use futures_util::{TryStreamExt, stream};

        let pool = self.pool.clone();
        let pages = stream::try_unfold(Some(0_i64), move |cursor| {
            let pool = pool.clone();
            async move {
                let Some(after_seq) = cursor else {
                    return Ok::<_, StoreError>(None);
                };

                let rows = sqlx::query(&format!(
                    r#"
                    SELECT {MOVEMENT_COLUMNS}
                    FROM stock_movements
                    WHERE product_id = $1 AND seq > $2
                    ORDER BY seq ASC
                    LIMIT $3
                    "#
                ))
                .bind(product_id.as_uuid())
                .bind(after_seq)
                .bind(STREAM_PAGE_SIZE)
                .fetch_all(&pool)
                .await?;

                let next = if (rows.len() as i64) < STREAM_PAGE_SIZE {
                    None
                } else {
                    rows.last()
                        .map(|row| row.try_get::<i64, _>("seq"))
                        .transpose()?
                };

                let page = rows
                    .into_iter()
                    .map(Self::row_to_movement)
                    .collect::<Result<Vec<_>>>()?;

                Ok(Some((page, next)))
            }
        });

        let movements = pages
            .map_ok(|page| stream::iter(page.into_iter().map(Ok)))
            .try_flatten();

        Ok(Box::pin(movements))
    }
}
