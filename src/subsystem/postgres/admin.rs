//! Create and drop the database named in the connection URL.

use {
    crate::core::{
        error::{MigrateError, MigrateResult},
        logger::Log,
        service::Confirm,
    },
    sqlx::{
        postgres::{PgConnectOptions, PgConnection},
        ConnectOptions, Connection,
    },
};

const MAINTENANCE_DB: &str = "postgres";

/// Connection options for the maintenance database plus the target database name.
pub fn maintenance_options(url: &str) -> MigrateResult<(PgConnectOptions, String)> {
    let options: PgConnectOptions = url.parse()?;
    let name = options
        .get_database()
        .map(str::to_string)
        .ok_or_else(|| MigrateError::configuration("the database url does not name a database"))?;
    Ok((options.database(MAINTENANCE_DB), name))
}

pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

async fn exists(conn: &mut PgConnection, name: &str) -> MigrateResult<bool> {
    let row = sqlx::query("SELECT 1 FROM pg_database WHERE datname = $1")
        .bind(name)
        .fetch_optional(&mut *conn)
        .await?;
    Ok(row.is_some())
}

/// Create the target database unless it exists. Returns whether it was created.
pub async fn create_db(url: &str, confirm: Confirm<'_>, log: &Log) -> MigrateResult<bool> {
    let (options, name) = maintenance_options(url)?;
    let mut conn = options.connect().await?;
    if exists(&mut conn, &name).await? {
        log.info(format!("database '{}' already exists", name));
        conn.close().await?;
        return Ok(false);
    }
    if let Some(confirm) = confirm {
        if !confirm(&format!("create db: '{}'?", name)) {
            log.warn("aborted");
            conn.close().await?;
            return Ok(false);
        }
    }
    log.info(format!("creating database {}", name));
    sqlx::raw_sql(&format!("CREATE DATABASE {}", quote_ident(&name))).execute(&mut conn).await?;
    conn.close().await?;
    log.ok(format!("database '{}' created", name));
    Ok(true)
}

/// Drop the target database if it exists. Returns whether it was dropped.
pub async fn drop_db(url: &str, confirm: Confirm<'_>, log: &Log) -> MigrateResult<bool> {
    let (options, name) = maintenance_options(url)?;
    let mut conn = options.connect().await?;
    if !exists(&mut conn, &name).await? {
        log.warn(format!("database {} does not exist", name));
        conn.close().await?;
        return Ok(false);
    }
    if let Some(confirm) = confirm {
        if !confirm(&format!("drop database: '{}'?", name)) {
            log.warn("aborted");
            conn.close().await?;
            return Ok(false);
        }
    }
    log.info(format!("dropping database {}", name));
    sqlx::raw_sql(&format!("DROP DATABASE {}", quote_ident(&name))).execute(&mut conn).await?;
    conn.close().await?;
    log.ok(format!("database '{}' dropped", name));
    Ok(true)
}
