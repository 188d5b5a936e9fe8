//! PostgreSQL record store
//!
//! Parents live in `raw_contacts`, keyed by account and source DN. Child
//! rows live in `contact_data` with one column per storage column
//! (`data1`..`data14` as text, `data15` as bytes).

use async_trait::async_trait;
use sqlx::postgres::{PgPool, PgPoolOptions, Postgres};
use sqlx::{PgConnection, QueryBuilder, Row};
use tracing::{debug, info, instrument};

use ldapsync::error::{StoreError, StoreResult};
use ldapsync::operation::{ColumnValue, DataRow, Operation, ParentRef, RecordId, SyncAccount};
use ldapsync::traits::RecordStore;

/// Storage columns of `contact_data`, in table order.
pub const DATA_COLUMNS: [&str; 15] = [
    "data1", "data2", "data3", "data4", "data5", "data6", "data7", "data8", "data9", "data10",
    "data11", "data12", "data13", "data14", "data15",
];

/// The only binary storage column.
pub const BLOB_COLUMN: &str = "data15";

/// Record store over a PostgreSQL pool, scoped to one account.
#[derive(Debug, Clone)]
pub struct PgRecordStore {
    pool: PgPool,
    account: SyncAccount,
}

impl PgRecordStore {
    /// Create a store over an existing pool.
    pub fn new(pool: PgPool, account: SyncAccount) -> Self {
        Self { pool, account }
    }

    /// Connect to `url` and create a store.
    pub async fn connect(url: &str, account: SyncAccount) -> StoreResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect(url)
            .await
            .map_err(|e| StoreError::database_with_source("Failed to connect to database", e))?;
        Ok(Self::new(pool, account))
    }

    /// Apply the embedded schema migrations.
    pub async fn migrate(&self) -> StoreResult<()> {
        info!("Running record store migrations");
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| StoreError::database_with_source("Migration failed", e))?;
        Ok(())
    }

    /// Account this store is scoped to.
    pub fn account(&self) -> &SyncAccount {
        &self.account
    }

    /// Underlying pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Number of parent records of this account.
    pub async fn record_count(&self) -> StoreResult<i64> {
        let (count,): (i64,) = sqlx::query_as(
            r"
            SELECT COUNT(*) FROM raw_contacts
            WHERE account_type = $1 AND account_name = $2
            ",
        )
        .bind(&self.account.account_type)
        .bind(&self.account.name)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| StoreError::database_with_source("Failed to count records", e))?;
        Ok(count)
    }

    /// Child rows of a parent, in insertion order.
    pub async fn rows_for(&self, id: RecordId) -> StoreResult<Vec<DataRow>> {
        let records = sqlx::query(
            r"
            SELECT mimetype, data1, data2, data3, data4, data5, data6, data7, data8,
                   data9, data10, data11, data12, data13, data14, data15
            FROM contact_data
            WHERE raw_contact_id = $1
            ORDER BY id
            ",
        )
        .bind(id.get())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StoreError::database_with_source("Failed to read rows", e))?;

        records
            .iter()
            .map(|record| {
                let read = |e: sqlx::Error| StoreError::database_with_source("Failed to decode row", e);
                let content_type: String = record.try_get("mimetype").map_err(read)?;
                let mut columns = Vec::new();
                for column in DATA_COLUMNS {
                    let value = if column == BLOB_COLUMN {
                        record
                            .try_get::<Option<Vec<u8>>, _>(column)
                            .map_err(read)?
                            .map(ColumnValue::Blob)
                    } else {
                        record
                            .try_get::<Option<String>, _>(column)
                            .map_err(read)?
                            .map(ColumnValue::Text)
                    };
                    if let Some(value) = value {
                        columns.push((column.to_string(), value));
                    }
                }
                Ok(DataRow::new(content_type, columns))
            })
            .collect()
    }
}

#[async_trait]
impl RecordStore for PgRecordStore {
    async fn lookup(&self, source_key: &str) -> StoreResult<Option<RecordId>> {
        let row: Option<(i64,)> = sqlx::query_as(
            r"
            SELECT id FROM raw_contacts
            WHERE account_type = $1 AND account_name = $2 AND source_id = $3
            ",
        )
        .bind(&self.account.account_type)
        .bind(&self.account.name)
        .bind(source_key)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| StoreError::Lookup {
            source_key: source_key.to_string(),
            message: e.to_string(),
        })?;

        Ok(row.map(|(id,)| RecordId::new(id)))
    }

    #[instrument(skip(self, operations), fields(operations = operations.len()))]
    async fn apply_batch(&self, operations: &[Operation]) -> StoreResult<()> {
        check_accounts(&self.account, operations)?;

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| StoreError::database_with_source("Failed to begin transaction", e))?;

        let mut created: Vec<Option<i64>> = Vec::with_capacity(operations.len());
        for op in operations {
            let id = match op {
                Operation::InsertParent {
                    account,
                    source_key,
                } => Some(insert_parent(&mut tx, account, source_key).await?),
                Operation::Insert { parent, row } => {
                    let parent = resolve_parent(*parent, &created)?;
                    insert_row_query(parent, row)?
                        .build()
                        .execute(&mut *tx)
                        .await
                        .map_err(|e| StoreError::database_with_source("Failed to insert row", e))?;
                    None
                }
                Operation::DeleteAllForParent { parent } => {
                    let deleted = sqlx::query("DELETE FROM contact_data WHERE raw_contact_id = $1")
                        .bind(parent.get())
                        .execute(&mut *tx)
                        .await
                        .map_err(|e| {
                            StoreError::database_with_source("Failed to delete rows", e)
                        })?;
                    debug!(record = %parent, rows = deleted.rows_affected(), "Deleted rows");
                    None
                }
            };
            created.push(id);
        }

        // Dropping the transaction on any error above rolls it back.
        tx.commit()
            .await
            .map_err(|e| StoreError::database_with_source("Failed to commit batch", e))?;
        Ok(())
    }
}

async fn insert_parent(
    conn: &mut PgConnection,
    account: &SyncAccount,
    source_key: &str,
) -> StoreResult<i64> {
    let (id,): (i64,) = sqlx::query_as(
        r"
        INSERT INTO raw_contacts (account_name, account_type, source_id)
        VALUES ($1, $2, $3)
        RETURNING id
        ",
    )
    .bind(&account.name)
    .bind(&account.account_type)
    .bind(source_key)
    .fetch_one(conn)
    .await
    .map_err(|e| StoreError::database_with_source("Failed to insert record", e))?;
    Ok(id)
}

/// Lookups only see this store's account, so a parent written under any
/// other account could never be found again.
fn check_accounts(expected: &SyncAccount, operations: &[Operation]) -> StoreResult<()> {
    for op in operations {
        if let Operation::InsertParent {
            account,
            source_key,
        } = op
        {
            if account != expected {
                return Err(StoreError::commit(format!(
                    "record for '{source_key}' belongs to account '{}' ({}), not '{}' ({})",
                    account.name, account.account_type, expected.name, expected.account_type
                )));
            }
        }
    }
    Ok(())
}

fn resolve_parent(parent: ParentRef, created: &[Option<i64>]) -> StoreResult<i64> {
    match parent {
        ParentRef::Resolved(id) => Ok(id.get()),
        ParentRef::PendingWithinBatch(index) => created
            .get(index)
            .copied()
            .flatten()
            .ok_or(StoreError::UnresolvedReference { index }),
    }
}

/// Build the insert statement for one child row.
///
/// Column names are checked against [`DATA_COLUMNS`] before they are
/// written into the statement.
fn insert_row_query(parent: i64, row: &DataRow) -> StoreResult<QueryBuilder<'_, Postgres>> {
    for (column, value) in row.columns() {
        if !DATA_COLUMNS.contains(&column.as_str()) {
            return Err(StoreError::commit(format!("unknown column '{column}'")));
        }
        if column != BLOB_COLUMN && matches!(value, ColumnValue::Blob(_)) {
            return Err(StoreError::commit(format!(
                "binary value for text column '{column}'"
            )));
        }
    }

    let mut builder = QueryBuilder::new("INSERT INTO contact_data (raw_contact_id, mimetype");
    for column in row.columns().keys() {
        builder.push(", ").push(column);
    }
    builder.push(") VALUES (");
    {
        let mut values = builder.separated(", ");
        values.push_bind(parent);
        values.push_bind(row.content_type());
        for (column, value) in row.columns() {
            match value {
                ColumnValue::Text(text) if column != BLOB_COLUMN => {
                    values.push_bind(text.as_str());
                }
                other => {
                    values.push_bind(other.as_bytes());
                }
            }
        }
        values.push_unseparated(")");
    }
    Ok(builder)
}
