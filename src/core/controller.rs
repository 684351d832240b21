//! Owns the database connection and decides when transactions begin and end.

use {
    crate::core::{
        error::{MigrateError, MigrateResult},
        logger::Log,
        migration::Migration,
        store::{LedgerChange, LedgerStore},
    },
    sqlx::{
        any::AnyPoolOptions,
        Any, AnyConnection, AnyPool, Transaction,
    },
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxState {
    NoTransaction,
    TransactionOpen,
    Finished,
}

pub struct TxController {
    url: String,
    all_in_one: bool,
    dry_run: bool,
    store: LedgerStore,
    pool: Option<AnyPool>,
    tx: Option<Transaction<'static, Any>>,
    state: TxState,
    log: Log,
}

impl TxController {
    /// A dry run always keeps one transaction open until [`TxController::finish`], so
    /// later steps see the effects of earlier ones before everything is rolled back.
    pub fn new(url: impl Into<String>, store: LedgerStore, all_in_one: bool, dry_run: bool, log: Log) -> Self {
        Self {
            url: url.into(),
            all_in_one: all_in_one || dry_run,
            dry_run,
            store,
            pool: None,
            tx: None,
            state: TxState::NoTransaction,
            log,
        }
    }

    pub fn state(&self) -> TxState {
        self.state
    }

    pub fn store(&self) -> &LedgerStore {
        &self.store
    }

    /// Execute `sql` and apply `change` in one transaction.
    ///
    /// Outside all-in-one mode the transaction is finalized before returning. Any
    /// failure rolls back the open transaction, whatever the mode.
    pub async fn exec_string(&mut self, sql: &str, change: Option<LedgerChange<'_>>) -> MigrateResult<()> {
        self.begin().await?;
        let result = self.exec_in_tx(sql, change).await;
        if let Err(e) = result {
            self.log.dbg("controller", format!("rolling back after error: {}", e));
            self.rollback().await;
            return Err(e);
        }
        if !self.all_in_one {
            self.finalize().await?;
        }
        Ok(())
    }

    /// Ledger rows, newest first. The transaction stays open for the next exec.
    pub async fn fetch_ledger(&mut self) -> MigrateResult<Vec<Migration>> {
        self.begin().await?;
        let store = self.store.clone();
        let result = store.fetch_all(self.conn()?).await;
        if result.is_err() {
            self.rollback().await;
        }
        result
    }

    pub async fn fetch_ledger_one(&mut self, version: u64) -> MigrateResult<Option<Migration>> {
        self.begin().await?;
        let store = self.store.clone();
        let result = store.fetch_one(self.conn()?, version).await;
        if result.is_err() {
            self.rollback().await;
        }
        result
    }

    /// Commit (or roll back in dry-run mode) whatever is open and release the connection.
    pub async fn finish(&mut self) -> MigrateResult<()> {
        if self.tx.is_some() {
            self.finalize().await?;
        }
        if let Some(pool) = self.pool.take() {
            pool.close().await;
        }
        self.state = TxState::Finished;
        Ok(())
    }

    /// Discard the open transaction, if any. Rollback failures are only logged.
    pub async fn rollback(&mut self) {
        if let Some(tx) = self.tx.take() {
            if let Err(e) = tx.rollback().await {
                self.log.warn(format!("rollback failed: {}", e));
            }
        }
        self.state = TxState::NoTransaction;
    }

    async fn exec_in_tx(&mut self, sql: &str, change: Option<LedgerChange<'_>>) -> MigrateResult<()> {
        let store = self.store.clone();
        let conn = self.conn()?;
        if !sql.trim().is_empty() {
            sqlx::raw_sql(sql).execute(&mut *conn).await?;
        }
        if let Some(change) = change {
            store.apply(conn, change).await?;
        }
        Ok(())
    }

    async fn begin(&mut self) -> MigrateResult<()> {
        if self.tx.is_some() {
            return Ok(());
        }
        let pool = match &self.pool {
            | Some(pool) => pool.clone(),
            | None => {
                self.log.dbg("controller", "connecting");
                sqlx::any::install_default_drivers();
                let pool = AnyPoolOptions::new().max_connections(1).connect(&self.url).await?;
                self.pool = Some(pool.clone());
                pool
            },
        };
        self.tx = Some(pool.begin().await?);
        self.state = TxState::TransactionOpen;
        self.log.dbg("controller", "transaction opened");
        Ok(())
    }

    async fn finalize(&mut self) -> MigrateResult<()> {
        let Some(tx) = self.tx.take() else {
            return Ok(());
        };
        self.state = TxState::NoTransaction;
        if self.dry_run {
            self.log.dbg("controller", "dry run, rolling back");
            tx.rollback().await?;
        } else {
            self.log.dbg("controller", "committing");
            tx.commit().await?;
        }
        Ok(())
    }

    fn conn(&mut self) -> MigrateResult<&mut AnyConnection> {
        match self.tx.as_mut() {
            | Some(tx) => Ok(&mut **tx),
            | None => Err(MigrateError::configuration("no open transaction")),
        }
    }
}
