use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, Row, Transaction, postgres::PgRow};

use crate::record::{IdempotencyRecord, ProductRecord, ReservationRecord, ReservationStatus};
use crate::store::InventoryStore;
use crate::transaction::{
    ConditionFailure, FailedCondition, StockCondition, TransactWriteItem, validate_transaction,
};
use crate::{
    IdempotencyKey, OrderId, ProductId, ReservationGroupId, ReservationQuery, Result, StoreError,
    UserId,
};

const PRODUCT_COLUMNS: &str = "product_id, name, price_cents, stock, status, updated_at";

const RESERVATION_COLUMNS: &str = "order_id, product_id, reservation_group_id, user_id, \
     product_name, price_cents, quantity, status, idempotency_key, created_at, expires_at, \
     released_at, committed_at";

/// PostgreSQL-backed inventory store implementation.
#[derive(Clone)]
pub struct PostgresInventoryStore {
    pool: PgPool,
}

impl PostgresInventoryStore {
    /// Creates a new PostgreSQL inventory store.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Opens a connection pool to `database_url`.
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self> {
        let pool = sqlx::postgres::PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;
        Ok(Self::new(pool))
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the database migrations.
    pub async fn run_migrations(&self) -> std::result::Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("../../migrations").run(&self.pool).await
    }

    fn row_to_product(row: PgRow) -> Result<ProductRecord> {
        let status: String = row.try_get("status")?;
        Ok(ProductRecord {
            product_id: ProductId::new(row.try_get::<String, _>("product_id")?),
            name: row.try_get("name")?,
            price_cents: row.try_get("price_cents")?,
            stock: to_u32(row.try_get("stock")?, "stock")?,
            status: status.parse()?,
            updated_at: row.try_get("updated_at")?,
        })
    }

    fn row_to_reservation(row: PgRow) -> Result<ReservationRecord> {
        let status: String = row.try_get("status")?;
        Ok(ReservationRecord {
            order_id: OrderId::new(row.try_get::<String, _>("order_id")?),
            product_id: ProductId::new(row.try_get::<String, _>("product_id")?),
            reservation_group_id: ReservationGroupId::new(
                row.try_get::<String, _>("reservation_group_id")?,
            ),
            user_id: UserId::new(row.try_get::<String, _>("user_id")?),
            product_name: row.try_get("product_name")?,
            price_cents: row.try_get("price_cents")?,
            quantity: to_u32(row.try_get("quantity")?, "quantity")?,
            status: status.parse()?,
            idempotency_key: IdempotencyKey::new(row.try_get::<String, _>("idempotency_key")?),
            created_at: row.try_get("created_at")?,
            expires_at: row.try_get("expires_at")?,
            released_at: row.try_get("released_at")?,
            committed_at: row.try_get("committed_at")?,
        })
    }

    /// Executes one conditional write inside an open transaction. Returns the
    /// failed condition if the write did not apply.
    async fn apply_in_tx(
        tx: &mut Transaction<'_, Postgres>,
        item: &TransactWriteItem,
    ) -> Result<Option<FailedCondition>> {
        match item {
            TransactWriteItem::AdjustStock {
                product_id,
                delta,
                condition,
            } => {
                let min = match condition {
                    StockCondition::AtLeast(min) => Some(i64::from(*min)),
                    StockCondition::Exists => None,
                };
                let updated = sqlx::query(
                    r#"
                    UPDATE products
                    SET stock = stock + $2, updated_at = NOW()
                    WHERE product_id = $1
                      AND stock + $2 >= 0
                      AND ($3::BIGINT IS NULL OR stock >= $3)
                    "#,
                )
                .bind(product_id.as_str())
                .bind(*delta)
                .bind(min)
                .execute(&mut **tx)
                .await?;

                if updated.rows_affected() > 0 {
                    return Ok(None);
                }

                let stock: Option<i64> =
                    sqlx::query_scalar("SELECT stock FROM products WHERE product_id = $1")
                        .bind(product_id.as_str())
                        .fetch_optional(&mut **tx)
                        .await?;

                Ok(Some(match stock {
                    None => FailedCondition::ProductMissing,
                    Some(available) => {
                        let requested = match condition {
                            StockCondition::AtLeast(min) => *min,
                            StockCondition::Exists => u32::try_from(-delta).unwrap_or(u32::MAX),
                        };
                        FailedCondition::InsufficientStock {
                            requested,
                            available: to_u32(available, "stock")?,
                        }
                    }
                }))
            }
            TransactWriteItem::PutReservation(record) => {
                let written = sqlx::query(
                    r#"
                    INSERT INTO reservations (order_id, product_id, reservation_group_id, user_id,
                        product_name, price_cents, quantity, status, idempotency_key, created_at,
                        expires_at, released_at, committed_at)
                    VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, NULL, NULL)
                    ON CONFLICT (order_id, product_id) DO UPDATE SET
                        reservation_group_id = EXCLUDED.reservation_group_id,
                        user_id = EXCLUDED.user_id,
                        product_name = EXCLUDED.product_name,
                        price_cents = EXCLUDED.price_cents,
                        quantity = EXCLUDED.quantity,
                        status = EXCLUDED.status,
                        idempotency_key = EXCLUDED.idempotency_key,
                        created_at = EXCLUDED.created_at,
                        expires_at = EXCLUDED.expires_at,
                        released_at = NULL,
                        committed_at = NULL
                    WHERE reservations.status = 'released'
                    "#,
                )
                .bind(record.order_id.as_str())
                .bind(record.product_id.as_str())
                .bind(record.reservation_group_id.as_str())
                .bind(record.user_id.as_str())
                .bind(&record.product_name)
                .bind(record.price_cents)
                .bind(i64::from(record.quantity))
                .bind(record.status.as_str())
                .bind(record.idempotency_key.as_str())
                .bind(record.created_at)
                .bind(record.expires_at)
                .execute(&mut **tx)
                .await?;

                Ok((written.rows_affected() == 0).then_some(FailedCondition::ReservationHeld))
            }
            TransactWriteItem::ReleaseReservation {
                order_id,
                product_id,
                released_at,
            } => {
                let updated = sqlx::query(
                    r#"
                    UPDATE reservations
                    SET status = 'released', released_at = $3
                    WHERE order_id = $1 AND product_id = $2 AND status = 'active'
                    "#,
                )
                .bind(order_id.as_str())
                .bind(product_id.as_str())
                .bind(*released_at)
                .execute(&mut **tx)
                .await?;

                Ok((updated.rows_affected() == 0).then_some(FailedCondition::ReservationNotActive))
            }
            TransactWriteItem::CommitReservation {
                order_id,
                product_id,
                committed_at,
            } => {
                let updated = sqlx::query(
                    r#"
                    UPDATE reservations
                    SET status = 'committed', committed_at = $3
                    WHERE order_id = $1 AND product_id = $2 AND status = 'active'
                    "#,
                )
                .bind(order_id.as_str())
                .bind(product_id.as_str())
                .bind(*committed_at)
                .execute(&mut **tx)
                .await?;

                Ok((updated.rows_affected() == 0).then_some(FailedCondition::ReservationNotActive))
            }
        }
    }
}

fn to_u32(value: i64, column: &str) -> Result<u32> {
    u32::try_from(value)
        .map_err(|_| StoreError::InvalidRecord(format!("{column} out of range: {value}")))
}

#[async_trait]
impl InventoryStore for PostgresInventoryStore {
    async fn get_product(&self, product_id: &ProductId) -> Result<Option<ProductRecord>> {
        let row = sqlx::query(&format!(
            "SELECT {PRODUCT_COLUMNS} FROM products WHERE product_id = $1"
        ))
        .bind(product_id.as_str())
        .fetch_optional(&self.pool)
        .await?;

        row.map(Self::row_to_product).transpose()
    }

    async fn put_product(&self, product: ProductRecord) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO products (product_id, name, price_cents, stock, status, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (product_id) DO UPDATE SET
                name = EXCLUDED.name,
                price_cents = EXCLUDED.price_cents,
                stock = EXCLUDED.stock,
                status = EXCLUDED.status,
                updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(product.product_id.as_str())
        .bind(&product.name)
        .bind(product.price_cents)
        .bind(i64::from(product.stock))
        .bind(product.status.as_str())
        .bind(product.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn conditional_update_stock(
        &self,
        product_id: &ProductId,
        delta: i64,
        expected_min_stock: Option<u32>,
    ) -> Result<ProductRecord> {
        let row = sqlx::query(&format!(
            r#"
            UPDATE products
            SET stock = stock + $2, updated_at = NOW()
            WHERE product_id = $1
              AND stock + $2 >= 0
              AND ($3::BIGINT IS NULL OR stock >= $3)
            RETURNING {PRODUCT_COLUMNS}
            "#
        ))
        .bind(product_id.as_str())
        .bind(delta)
        .bind(expected_min_stock.map(i64::from))
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Self::row_to_product(row),
            None => Err(StoreError::ConditionFailed {
                product_id: product_id.clone(),
            }),
        }
    }

    async fn transact_write(&self, items: Vec<TransactWriteItem>) -> Result<()> {
        validate_transaction(&items).map_err(StoreError::InvalidTransaction)?;

        // Rows are locked in target order, whatever order the caller used.
        let mut order: Vec<usize> = (0..items.len()).collect();
        order.sort_by_cached_key(|&index| items[index].target());

        let mut tx = self.pool.begin().await?;

        // Every condition is evaluated so the caller learns all failing items.
        let mut failures = Vec::new();
        for index in order {
            let item = &items[index];
            let applied = Self::apply_in_tx(&mut tx, item)
                .await
                .map_err(StoreError::classify)?;
            if let Some(condition) = applied {
                failures.push(ConditionFailure {
                    index,
                    target: item.target(),
                    condition,
                });
            }
        }

        if !failures.is_empty() {
            failures.sort_by_key(|f| f.index);
            tx.rollback().await?;
            tracing::debug!(failed = failures.len(), "transaction rolled back");
            metrics::counter!("inventory_store_transactions_cancelled_total").increment(1);
            return Err(StoreError::TransactionCanceled { failures });
        }

        tx.commit()
            .await
            .map_err(|e| StoreError::Database(e).classify())?;
        Ok(())
    }

    async fn get_reservation(
        &self,
        order_id: &OrderId,
        product_id: &ProductId,
    ) -> Result<Option<ReservationRecord>> {
        let row = sqlx::query(&format!(
            "SELECT {RESERVATION_COLUMNS} FROM reservations WHERE order_id = $1 AND product_id = $2"
        ))
        .bind(order_id.as_str())
        .bind(product_id.as_str())
        .fetch_optional(&self.pool)
        .await?;

        row.map(Self::row_to_reservation).transpose()
    }

    async fn query_reservations(&self, query: ReservationQuery) -> Result<Vec<ReservationRecord>> {
        let mut sql = format!("SELECT {RESERVATION_COLUMNS} FROM reservations WHERE 1=1");
        let mut param_count = 0;

        if query.order_id.is_some() {
            param_count += 1;
            sql.push_str(&format!(" AND order_id = ${param_count}"));
        }
        if query.status.is_some() {
            param_count += 1;
            sql.push_str(&format!(" AND status = ${param_count}"));
        }
        if query.expired_at.is_some() {
            param_count += 1;
            sql.push_str(&format!(" AND expires_at <= ${param_count}"));
        }

        sql.push_str(" ORDER BY created_at ASC, product_id ASC");

        if query.limit.is_some() {
            param_count += 1;
            sql.push_str(&format!(" LIMIT ${param_count}"));
        }

        let mut sqlx_query = sqlx::query(&sql);

        if let Some(order_id) = &query.order_id {
            sqlx_query = sqlx_query.bind(order_id.as_str());
        }
        if let Some(status) = query.status {
            sqlx_query = sqlx_query.bind(status.as_str());
        }
        if let Some(at) = query.expired_at {
            sqlx_query = sqlx_query.bind(at);
        }
        if let Some(limit) = query.limit {
            sqlx_query = sqlx_query.bind(limit as i64);
        }

        let rows = sqlx_query.fetch_all(&self.pool).await?;
        rows.into_iter().map(Self::row_to_reservation).collect()
    }

    async fn get_idempotency_record(
        &self,
        key: &IdempotencyKey,
    ) -> Result<Option<IdempotencyRecord>> {
        let row = sqlx::query(
            r#"
            SELECT idempotency_key, result, created_at, expires_at
            FROM idempotency_records
            WHERE idempotency_key = $1 AND expires_at > NOW()
            "#,
        )
        .bind(key.as_str())
        .fetch_optional(&self.pool)
        .await?;

        row.map(|row| {
            Ok(IdempotencyRecord {
                idempotency_key: IdempotencyKey::new(row.try_get::<String, _>("idempotency_key")?),
                result: row.try_get("result")?,
                created_at: row.try_get("created_at")?,
                expires_at: row.try_get("expires_at")?,
            })
        })
        .transpose()
    }

    async fn put_idempotency_record(&self, record: IdempotencyRecord) -> Result<()> {
        let written = sqlx::query(
            r#"
            INSERT INTO idempotency_records (idempotency_key, result, created_at, expires_at)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (idempotency_key) DO UPDATE SET
                result = EXCLUDED.result,
                created_at = EXCLUDED.created_at,
                expires_at = EXCLUDED.expires_at
            WHERE idempotency_records.expires_at <= EXCLUDED.created_at
            "#,
        )
        .bind(record.idempotency_key.as_str())
        .bind(&record.result)
        .bind(record.created_at)
        .bind(record.expires_at)
        .execute(&self.pool)
        .await?;

        if written.rows_affected() == 0 {
            return Err(StoreError::DuplicateKey(record.idempotency_key));
        }
        Ok(())
    }

    async fn purge_expired(&self, cutoff: DateTime<Utc>) -> Result<usize> {
        let mut tx = self.pool.begin().await?;

        let records = sqlx::query("DELETE FROM idempotency_records WHERE expires_at <= $1")
            .bind(cutoff)
            .execute(&mut *tx)
            .await?;

        let reservations =
            sqlx::query("DELETE FROM reservations WHERE status <> $1 AND expires_at <= $2")
                .bind(ReservationStatus::Active.as_str())
                .bind(cutoff)
                .execute(&mut *tx)
                .await?;

        tx.commit().await?;
        Ok((records.rows_affected() + reservations.rows_affected()) as usize)
    }
}
