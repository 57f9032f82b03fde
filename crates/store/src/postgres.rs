//! PostgreSQL backend for the repositories.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{Currency, CustomerId, Money, OrderId, StoreId, TransactionId};
use domain::{DomainError, Order, PaymentStatus, Transaction, TransactionStatus};
use sqlx::{PgPool, Row, postgres::PgRow};
use uuid::Uuid;

use crate::feed::{ChangeEvent, ChangeFeed};
use crate::repository::{OrderRepository, TransactionRepository};
use crate::{Result, StoreError};

const CREATE_ORDERS: &str = r#"
CREATE TABLE IF NOT EXISTS orders (
    id UUID PRIMARY KEY,
    order_number TEXT NOT NULL,
    customer_id UUID NOT NULL,
    store_id UUID NOT NULL,
    store_name TEXT NOT NULL,
    amount_cents BIGINT NOT NULL,
    currency TEXT NOT NULL,
    item_count INT NOT NULL,
    payment_status TEXT NOT NULL,
    created_at TIMESTAMPTZ NOT NULL,
    UNIQUE (store_id, order_number)
)
"#;

const CREATE_TRANSACTIONS: &str = r#"
CREATE TABLE IF NOT EXISTS transactions (
    id UUID PRIMARY KEY,
    order_id UUID NOT NULL REFERENCES orders (id),
    provider TEXT NOT NULL,
    checkout_url TEXT NOT NULL,
    external_ref TEXT NOT NULL,
    status TEXT NOT NULL,
    created_at TIMESTAMPTZ NOT NULL
)
"#;

const CREATE_TX_ORDER_INDEX: &str =
    "CREATE INDEX IF NOT EXISTS transactions_order_id_idx ON transactions (order_id)";

// At most one initiated session per order, enforced by the database so
// the guarantee holds across processes.
const CREATE_TX_ACTIVE_INDEX: &str = "CREATE UNIQUE INDEX IF NOT EXISTS \
     transactions_active_order_idx ON transactions (order_id) WHERE status = 'initiated'";

/// PostgreSQL-backed implementation of both repositories.
///
/// Writes are announced on the change feed after commit, so observers
/// only ever see durable state.
#[derive(Clone)]
pub struct PostgresStore {
    pool: PgPool,
    feed: ChangeFeed,
}

impl PostgresStore {
    /// Creates a store over an existing connection pool.
    pub fn new(pool: PgPool, feed: ChangeFeed) -> Self {
        Self { pool, feed }
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// The change feed this store publishes to.
    pub fn feed(&self) -> &ChangeFeed {
        &self.feed
    }

    /// Creates the schema if it does not exist.
    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::query(CREATE_ORDERS).execute(&self.pool).await?;
        sqlx::query(CREATE_TRANSACTIONS).execute(&self.pool).await?;
        sqlx::query(CREATE_TX_ORDER_INDEX).execute(&self.pool).await?;
        sqlx::query(CREATE_TX_ACTIVE_INDEX).execute(&self.pool).await?;
        tracing::info!("store schema migrated");
        Ok(())
    }

    fn is_unique_violation(err: &sqlx::Error) -> bool {
        matches!(err, sqlx::Error::Database(db) if db.is_unique_violation())
    }

    fn row_to_order(row: &PgRow) -> Result<Order> {
        let status_str: String = row.try_get("payment_status")?;
        let payment_status = PaymentStatus::parse(&status_str)
            .ok_or_else(|| StoreError::Decode(format!("unknown payment status {status_str:?}")))?;
        let item_count: i32 = row.try_get("item_count")?;

        Ok(Order {
            id: OrderId::from_uuid(row.try_get::<Uuid, _>("id")?),
            order_number: row.try_get("order_number")?,
            customer_id: CustomerId::from_uuid(row.try_get::<Uuid, _>("customer_id")?),
            store_id: StoreId::from_uuid(row.try_get::<Uuid, _>("store_id")?),
            store_name: row.try_get("store_name")?,
            amount: Money::from_cents(row.try_get::<i64, _>("amount_cents")?),
            currency: Currency::new(row.try_get::<String, _>("currency")?),
            item_count: item_count as u32,
            payment_status,
            created_at: row.try_get::<DateTime<Utc>, _>("created_at")?,
        })
    }

    fn row_to_transaction(row: &PgRow) -> Result<Transaction> {
        let status_str: String = row.try_get("status")?;
        let status = TransactionStatus::parse(&status_str)
            .ok_or_else(|| StoreError::Decode(format!("unknown session status {status_str:?}")))?;

        Ok(Transaction {
            id: TransactionId::from_uuid(row.try_get::<Uuid, _>("id")?),
            order_id: OrderId::from_uuid(row.try_get::<Uuid, _>("order_id")?),
            provider: row.try_get("provider")?,
            checkout_url: row.try_get("checkout_url")?,
            external_ref: row.try_get("external_ref")?,
            status,
            created_at: row.try_get::<DateTime<Utc>, _>("created_at")?,
        })
    }
}

#[async_trait]
impl OrderRepository for PostgresStore {
    async fn get_by_ids(&self, ids: &[OrderId], owner: CustomerId) -> Result<Vec<Order>> {
        let uuids: Vec<Uuid> = ids.iter().map(|id| id.as_uuid()).collect();
        let rows = sqlx::query(
            "SELECT id, order_number, customer_id, store_id, store_name, amount_cents, \
             currency, item_count, payment_status, created_at \
             FROM orders WHERE id = ANY($1) AND customer_id = $2 ORDER BY id",
        )
        .bind(&uuids)
        .bind(owner.as_uuid())
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::row_to_order).collect()
    }

    async fn update_payment_status(&self, order_id: OrderId, status: PaymentStatus) -> Result<()> {
        let mut db_tx = self.pool.begin().await?;

        let row = sqlx::query("SELECT payment_status FROM orders WHERE id = $1 FOR UPDATE")
            .bind(order_id.as_uuid())
            .fetch_optional(&mut *db_tx)
            .await?
            .ok_or(StoreError::OrderNotFound(order_id))?;

        let current_str: String = row.try_get("payment_status")?;
        let current = PaymentStatus::parse(&current_str)
            .ok_or_else(|| StoreError::Decode(format!("unknown payment status {current_str:?}")))?;

        if !current.can_transition_to(status) {
            return Err(DomainError::InvalidTransition {
                order_id,
                from: current,
                to: status,
            }
            .into());
        }

        sqlx::query("UPDATE orders SET payment_status = $2 WHERE id = $1")
            .bind(order_id.as_uuid())
            .bind(status.as_str())
            .execute(&mut *db_tx)
            .await?;
        db_tx.commit().await?;

        self.feed.publish(ChangeEvent::Order {
            id: order_id,
            payment_status: status,
        });
        Ok(())
    }

    async fn insert_order(&self, order: Order) -> Result<()> {
        sqlx::query(
            "INSERT INTO orders (id, order_number, customer_id, store_id, store_name, \
             amount_cents, currency, item_count, payment_status, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)",
        )
        .bind(order.id.as_uuid())
        .bind(&order.order_number)
        .bind(order.customer_id.as_uuid())
        .bind(order.store_id.as_uuid())
        .bind(&order.store_name)
        .bind(order.amount.cents())
        .bind(order.currency.as_str())
        .bind(order.item_count as i32)
        .bind(order.payment_status.as_str())
        .bind(order.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl TransactionRepository for PostgresStore {
    async fn get_active_for_order(&self, order_id: OrderId) -> Result<Option<Transaction>> {
        let row = sqlx::query(
            "SELECT id, order_id, provider, checkout_url, external_ref, status, created_at \
             FROM transactions WHERE order_id = $1 AND status = 'initiated' \
             ORDER BY created_at DESC LIMIT 1",
        )
        .bind(order_id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(Self::row_to_transaction).transpose()
    }

    async fn create(&self, transaction: Transaction) -> Result<Transaction> {
        let order_id = transaction.order_id;
        let now = Utc::now();
        let mut superseded: Option<TransactionId> = None;

        let mut db_tx = self.pool.begin().await?;

        // FOR UPDATE serializes against an existing row only; when both
        // creators see no row, the partial unique index on initiated
        // sessions decides the race at insert time.
        let existing = sqlx::query(
            "SELECT id, order_id, provider, checkout_url, external_ref, status, created_at \
             FROM transactions WHERE order_id = $1 AND status = 'initiated' \
             ORDER BY created_at DESC LIMIT 1 FOR UPDATE",
        )
        .bind(order_id.as_uuid())
        .fetch_optional(&mut *db_tx)
        .await?;

        if let Some(row) = existing {
            let existing = Self::row_to_transaction(&row)?;
            if existing.is_usable(now) {
                return Err(StoreError::ConflictingTransaction { order_id });
            }
            sqlx::query("UPDATE transactions SET status = 'expired' WHERE id = $1")
                .bind(existing.id.as_uuid())
                .execute(&mut *db_tx)
                .await?;
            tracing::debug!(%order_id, superseded = %existing.id, "expired stale checkout session");
            superseded = Some(existing.id);
        }

        sqlx::query(
            "INSERT INTO transactions (id, order_id, provider, checkout_url, external_ref, \
             status, created_at) VALUES ($1, $2, $3, $4, $5, $6, $7)",
        )
        .bind(transaction.id.as_uuid())
        .bind(order_id.as_uuid())
        .bind(&transaction.provider)
        .bind(&transaction.checkout_url)
        .bind(&transaction.external_ref)
        .bind(transaction.status.as_str())
        .bind(transaction.created_at)
        .execute(&mut *db_tx)
        .await
        .map_err(|err| {
            if Self::is_unique_violation(&err) {
                StoreError::ConflictingTransaction { order_id }
            } else {
                err.into()
            }
        })?;
        db_tx.commit().await?;

        if let Some(id) = superseded {
            self.feed.publish(ChangeEvent::Transaction {
                id,
                order_id,
                status: TransactionStatus::Expired,
            });
        }
        self.feed.publish(ChangeEvent::Transaction {
            id: transaction.id,
            order_id,
            status: transaction.status,
        });

        Ok(transaction)
    }

    async fn update_status(&self, id: TransactionId, status: TransactionStatus) -> Result<()> {
        let row = sqlx::query("UPDATE transactions SET status = $2 WHERE id = $1 RETURNING order_id")
            .bind(id.as_uuid())
            .bind(status.as_str())
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| StoreError::Decode(format!("unknown transaction {id}")))?;

        let order_id = OrderId::from_uuid(row.try_get::<Uuid, _>("order_id")?);
        self.feed.publish(ChangeEvent::Transaction {
            id,
            order_id,
            status,
        });
        Ok(())
    }
}
