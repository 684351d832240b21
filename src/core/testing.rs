//! Helpers shared by the unit tests.

use {
    crate::core::{
        logger::{Log, Logger},
        migration::{Migration, DOWN_SUFFIX, UP_SUFFIX},
        store::LedgerStore,
    },
    sqlx::{any::AnyPoolOptions, AnyPool, Row},
    std::{
        collections::VecDeque,
        path::{Path, PathBuf},
        sync::{Arc, Mutex},
    },
    tempfile::TempDir,
};

#[derive(Default)]
pub struct RecordingLogger {
    lines: Mutex<Vec<String>>,
}

impl RecordingLogger {
    pub fn lines(&self) -> Vec<String> {
        self.lines.lock().map(|l| l.clone()).unwrap_or_default()
    }

    fn push(&self, level: &str, msg: &str) {
        if let Ok(mut lines) = self.lines.lock() {
            lines.push(format!("{}: {}", level, msg));
        }
    }
}

impl Logger for RecordingLogger {
    fn info(&self, msg: &str) {
        self.push("info", msg);
    }

    fn warn(&self, msg: &str) {
        self.push("warn", msg);
    }

    fn error(&self, msg: &str) {
        self.push("error", msg);
    }

    fn ok(&self, msg: &str) {
        self.push("ok", msg);
    }

    fn debug(&self, msg: &str) {
        self.push("debug", msg);
    }

    fn print(&self, msg: &str) {
        self.push("print", msg);
    }
}

pub fn quiet_log() -> Log {
    Log::new(Arc::new(RecordingLogger::default()), true)
}

/// A migration directory plus a separate directory for the SQLite database file.
pub struct Scratch {
    migrations: TempDir,
    db: TempDir,
}

impl Scratch {
    pub fn new() -> Self {
        Self {
            migrations: TempDir::new().unwrap(),
            db: TempDir::new().unwrap(),
        }
    }

    pub fn path(&self) -> &Path {
        self.migrations.path()
    }

    pub fn db_path(&self) -> PathBuf {
        self.db.path().join("test.db")
    }

    pub fn file(&self, name: &str, contents: &str) {
        std::fs::write(self.path().join(name), contents).unwrap();
    }

    pub fn pair(&self, stem: &str, up: &str, down: &str) {
        self.file(&format!("{}{}", stem, UP_SUFFIX), up);
        self.file(&format!("{}{}", stem, DOWN_SUFFIX), down);
    }

    pub fn exists(&self, name: &str) -> bool {
        self.path().join(name).exists()
    }

    pub fn read(&self, name: &str) -> String {
        std::fs::read_to_string(self.path().join(name)).unwrap()
    }

    pub fn remove(&self, name: &str) {
        std::fs::remove_file(self.path().join(name)).unwrap();
    }
}

pub fn sqlite_url(scratch: &Scratch) -> String {
    format!("sqlite://{}?mode=rwc", scratch.db_path().display())
}

async fn inspect_pool(scratch: &Scratch) -> AnyPool {
    sqlx::any::install_default_drivers();
    AnyPoolOptions::new().max_connections(1).connect(&sqlite_url(scratch)).await.unwrap()
}

/// Row count of `table`, or `None` if the table does not exist.
pub async fn count_rows(scratch: &Scratch, table: &str) -> Option<i64> {
    let pool = inspect_pool(scratch).await;
    let count = sqlx::query(&format!("SELECT COUNT(*) AS n FROM {}", table))
        .fetch_one(&pool)
        .await
        .ok()
        .and_then(|row| row.try_get::<i64, _>("n").ok());
    pool.close().await;
    count
}

/// Ledger rows in ascending version order.
pub async fn ledger(scratch: &Scratch) -> Vec<Migration> {
    let pool = inspect_pool(scratch).await;
    let mut conn = pool.acquire().await.unwrap();
    let mut rows = LedgerStore::new("pqmigrate").fetch_all(&mut *conn).await.unwrap_or_default();
    drop(conn);
    pool.close().await;
    rows.reverse();
    rows
}

pub async fn ledger_versions(scratch: &Scratch) -> Vec<u64> {
    ledger(scratch).await.iter().map(|m| m.version).collect()
}

/// Confirmation callback replaying fixed answers; unanswered prompts are declined.
pub struct Scripted {
    answers: VecDeque<bool>,
    pub asked: Vec<String>,
}

impl Scripted {
    pub fn new(answers: impl IntoIterator<Item = bool>) -> Self {
        Self { answers: answers.into_iter().collect(), asked: Vec::new() }
    }

    pub fn ask(&mut self, question: &str) -> bool {
        self.asked.push(question.to_string());
        self.answers.pop_front().unwrap_or(false)
    }
}
