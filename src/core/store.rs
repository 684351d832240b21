//! The ledger: the table recording which migrations are applied.

use {
    crate::core::{
        error::{MigrateError, MigrateResult},
        migration::Migration,
    },
    sqlx::{any::AnyRow, Any, AnyConnection, QueryBuilder, Row},
};

/// A change to the ledger, applied in the same transaction as the SQL that caused it.
#[derive(Debug, Clone, Copy)]
pub enum LedgerChange<'a> {
    Insert(&'a Migration),
    Delete(&'a Migration),
    Update(&'a Migration),
    InsertBatch(&'a [Migration]),
}

#[derive(Debug, Clone)]
pub struct LedgerStore {
    table: String,
}

impl LedgerStore {
    /// `table` must already be a validated identifier; it is interpolated into SQL.
    pub fn new(table: impl Into<String>) -> Self {
        Self { table: table.into() }
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    fn build_table_query<'a>(&self, base_sql: &'a str) -> QueryBuilder<'a, Any> {
        let mut query = QueryBuilder::new(base_sql);
        query.push(&self.table);
        query
    }

    pub fn create_table_sql(&self) -> String {
        format!(
            "CREATE TABLE IF NOT EXISTS {} (version BIGINT NOT NULL PRIMARY KEY, name TEXT NOT NULL DEFAULT '', up TEXT NOT NULL DEFAULT '', down TEXT NOT NULL DEFAULT '')",
            self.table
        )
    }

    /// Every ledger row, newest version first.
    pub async fn fetch_all(&self, conn: &mut AnyConnection) -> MigrateResult<Vec<Migration>> {
        let mut query = self.build_table_query("SELECT version, name, up, down FROM ");
        query.push(" ORDER BY version DESC");
        let rows = query.build().fetch_all(&mut *conn).await?;
        rows.iter().map(row_to_migration).collect()
    }

    pub async fn fetch_one(&self, conn: &mut AnyConnection, version: u64) -> MigrateResult<Option<Migration>> {
        let mut query = self.build_table_query("SELECT version, name, up, down FROM ");
        query.push(" WHERE version = $1");
        let row = query
            .build()
            .bind(to_db_version(version)?)
            .fetch_optional(&mut *conn)
            .await?;
        row.as_ref().map(row_to_migration).transpose()
    }

    pub async fn apply(&self, conn: &mut AnyConnection, change: LedgerChange<'_>) -> MigrateResult<()> {
        match change {
            | LedgerChange::Insert(m) => self.insert(conn, m).await,
            | LedgerChange::Delete(m) => self.delete(conn, m.version).await,
            | LedgerChange::Update(m) => self.update(conn, m).await,
            | LedgerChange::InsertBatch(batch) => {
                for m in batch {
                    self.insert(conn, m).await?;
                }
                Ok(())
            },
        }
    }

    async fn insert(&self, conn: &mut AnyConnection, m: &Migration) -> MigrateResult<()> {
        let mut query = self.build_table_query("INSERT INTO ");
        query.push(" (version, name, up, down) VALUES ($1, $2, $3, $4)");
        query
            .build()
            .bind(to_db_version(m.version)?)
            .bind(m.name.clone())
            .bind(m.up.clone())
            .bind(m.down.clone())
            .execute(&mut *conn)
            .await?;
        Ok(())
    }

    async fn delete(&self, conn: &mut AnyConnection, version: u64) -> MigrateResult<()> {
        let mut query = self.build_table_query("DELETE FROM ");
        query.push(" WHERE version = $1");
        query.build().bind(to_db_version(version)?).execute(&mut *conn).await?;
        Ok(())
    }

    async fn update(&self, conn: &mut AnyConnection, m: &Migration) -> MigrateResult<()> {
        let mut query = self.build_table_query("UPDATE ");
        query.push(" SET name = $1, up = $2, down = $3 WHERE version = $4");
        query
            .build()
            .bind(m.name.clone())
            .bind(m.up.clone())
            .bind(m.down.clone())
            .bind(to_db_version(m.version)?)
            .execute(&mut *conn)
            .await?;
        Ok(())
    }
}

/// Postgres `undefined_table` (42P01), or SQLite's "no such table".
pub fn is_missing_table(err: &sqlx::Error) -> bool {
    match err {
        | sqlx::Error::Database(db) => db.code().as_deref() == Some("42P01") || db.message().contains("no such table"),
        | _ => false,
    }
}

fn row_to_migration(row: &AnyRow) -> MigrateResult<Migration> {
    let version: i64 = row.try_get("version")?;
    let version = u64::try_from(version)
        .map_err(|_| MigrateError::InvalidVersionFormat { file: "ledger".to_string(), reason: format!("negative version {}", version) })?;
    Ok(Migration {
        version,
        name: row.try_get("name")?,
        up: row.try_get("up")?,
        down: row.try_get("down")?,
    })
}

fn to_db_version(version: u64) -> MigrateResult<i64> {
    i64::try_from(version).map_err(|_| MigrateError::InvalidVersionFormat {
        file: version.to_string(),
        reason: "version does not fit a bigint column".to_string(),
    })
}
