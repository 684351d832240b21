//! Schema and data dumps through `pg_dump`/`psql`, plus ledger snapshots next to schema dumps.

use {
    crate::core::{
        error::{MigrateError, MigrateResult},
        logger::Log,
        migration::Migration,
        service::{Confirm, Migrator},
        source::MigrationSource,
    },
    base64::{engine::general_purpose::STANDARD, Engine as _},
    chrono::Utc,
    serde::{Deserialize, Serialize},
    std::{
        path::{Path, PathBuf},
        process::Stdio,
    },
    tokio::{io::AsyncWriteExt, process::Command},
};

const PG_DUMP: &str = "pg_dump";
const PSQL: &str = "psql";

/// `<prefix>_<tag>.<ext>`, with the current unix time as the default tag.
pub fn file_name(prefix: &str, tag: Option<&str>, ext: &str) -> String {
    match tag {
        | Some(tag) => format!("{}_{}.{}", prefix, tag, ext),
        | None => format!("{}_{}.{}", prefix, Utc::now().timestamp(), ext),
    }
}

/// The ledger snapshot that belongs to a schema dump: leading `schema` becomes
/// `migrations`, the extension becomes `.json`.
pub fn snapshot_name_for(schema_name: &str) -> Option<String> {
    let rest = schema_name.strip_prefix("schema")?;
    let renamed = format!("migrations{}", rest);
    Some(Path::new(&renamed).with_extension("json").to_string_lossy().into_owned())
}

#[derive(Debug, Serialize, Deserialize)]
struct SnapshotRow {
    version: u64,
    name: String,
    up: String,
    down: String,
}

/// Ledger rows as a JSON array, ascending, bodies base64-encoded.
pub fn encode_snapshot(rows: &[Migration]) -> MigrateResult<String> {
    let mut out: Vec<SnapshotRow> = rows
        .iter()
        .map(|m| SnapshotRow {
            version: m.version,
            name: m.name.clone(),
            up: STANDARD.encode(m.up.as_bytes()),
            down: STANDARD.encode(m.down.as_bytes()),
        })
        .collect();
    out.sort_by_key(|r| r.version);
    Ok(serde_json::to_string_pretty(&out)?)
}

pub fn decode_snapshot(text: &str) -> MigrateResult<Vec<Migration>> {
    let rows: Vec<SnapshotRow> = serde_json::from_str(text)?;
    let mut out = Vec::with_capacity(rows.len());
    for row in rows {
        out.push(Migration {
            version: row.version,
            up: decode_body(&row.up, &row.name)?,
            down: decode_body(&row.down, &row.name)?,
            name: row.name,
        });
    }
    out.sort_by_key(|m| m.version);
    Ok(out)
}

fn decode_body(field: &str, name: &str) -> MigrateResult<String> {
    use serde::de::Error as _;
    let bytes = STANDARD
        .decode(field)
        .map_err(|e| serde_json::Error::custom(format!("{}: invalid base64 body: {}", name, e)))?;
    String::from_utf8(bytes).map_err(|e| serde_json::Error::custom(format!("{}: body is not utf-8: {}", name, e)).into())
}

async fn run_captured(tool: &str, args: &[&str], log: &Log) -> MigrateResult<Vec<u8>> {
    log.dbg("exec", format!("{} {}", tool, args.join(" ")));
    let output = Command::new(tool)
        .args(args)
        .output()
        .await
        .map_err(|e| MigrateError::external_tool(tool, e.to_string()))?;
    if !output.status.success() {
        return Err(MigrateError::external_tool(
            tool,
            format!("{}: {}", output.status, String::from_utf8_lossy(&output.stderr).trim()),
        ));
    }
    Ok(output.stdout)
}

/// `pg_dump -s -O`: the schema without ownership information.
pub async fn dump_schema(url: &str, log: &Log) -> MigrateResult<Vec<u8>> {
    run_captured(PG_DUMP, &[url, "-s", "-O"], log).await
}

/// Write `schema_<tag>.sql` and, if anything is applied, `migrations_<tag>.json`.
pub async fn dump_schema_to_file(migrator: &mut Migrator, tag: Option<&str>) -> MigrateResult<(PathBuf, Option<PathBuf>)> {
    let tag = tag.map(str::to_string).unwrap_or_else(|| Utc::now().timestamp().to_string());
    let ledger = migrator.ledger_if_present().await?;
    let schema = dump_schema(&migrator.config().database_url, migrator.log()).await?;

    let snapshot = if ledger.is_empty() {
        None
    } else {
        let text = encode_snapshot(&ledger)?;
        Some(migrator.source().write_text(&file_name("migrations", Some(&tag), "json"), text.as_bytes())?)
    };
    let schema_path = migrator.source().write_text(&file_name("schema", Some(&tag), "sql"), &schema)?;
    migrator.log().ok(format!("schema written to \"{}\"", schema_path.display()));
    Ok((schema_path, snapshot))
}

/// Stream `pg_dump -O --column-inserts` into `dump_<tag>.sql`.
pub async fn dump_full(url: &str, source: &MigrationSource, tag: Option<&str>, log: &Log) -> MigrateResult<PathBuf> {
    source.ensure_dir()?;
    let path = source.dir().join(file_name("dump", tag, "sql"));
    stream_to_file(PG_DUMP, &[url, "-O", "--column-inserts"], &path, log).await?;
    log.ok(format!("database dump written to \"{}\"", path.display()));
    Ok(path)
}

/// Run `tool` with its stdout written to `path`. On failure the child is reaped and the
/// partial file removed.
async fn stream_to_file(tool: &str, args: &[&str], path: &Path, log: &Log) -> MigrateResult<()> {
    log.dbg("exec", format!("{} {}", tool, args.join(" ")));
    let mut file = tokio::fs::File::create(path).await.map_err(|e| MigrateError::io(path, e))?;
    let spawned = Command::new(tool).args(args).stdout(Stdio::piped()).stderr(Stdio::inherit()).spawn();
    let mut child = match spawned {
        | Ok(child) => child,
        | Err(e) => {
            drop(file);
            remove_partial(path, log).await;
            return Err(MigrateError::external_tool(tool, e.to_string()));
        },
    };

    let copied = match child.stdout.take() {
        | Some(mut stdout) => match tokio::io::copy(&mut stdout, &mut file).await {
            | Ok(n) => file.flush().await.map(|_| n).map_err(|e| MigrateError::io(path, e)),
            | Err(e) => Err(MigrateError::io(path, e)),
        },
        | None => Err(MigrateError::external_tool(tool, "stdout was not captured")),
    };
    let result = match copied {
        | Ok(n) => match child.wait().await {
            | Ok(status) if status.success() => {
                log.dbg(tool, format!("{} bytes", n));
                Ok(())
            },
            | Ok(status) => Err(MigrateError::external_tool(tool, status.to_string())),
            | Err(e) => Err(MigrateError::external_tool(tool, e.to_string())),
        },
        | Err(e) => {
            if let Err(kill) = child.kill().await {
                log.warn(format!("failed to stop {}: {}", tool, kill));
            }
            Err(e)
        },
    };
    if result.is_err() {
        drop(file);
        remove_partial(path, log).await;
    }
    result
}

async fn remove_partial(path: &Path, log: &Log) {
    if let Err(e) = tokio::fs::remove_file(path).await {
        log.warn(format!("failed to remove partial file {}: {}", path.display(), e));
    }
}

/// Restore a dump from the base directory with `psql`, stopping at the first error.
pub async fn load_full_dump(url: &str, source: &MigrationSource, name: &str, log: &Log) -> MigrateResult<()> {
    let path = source.dir().join(name);
    if !path.is_file() {
        return Err(MigrateError::io(&path, std::io::Error::from(std::io::ErrorKind::NotFound)));
    }
    let file_arg = format!("--file={}", path.display());
    run_captured(PSQL, &[url, "-v", "ON_ERROR_STOP=1", "--quiet", &file_arg], log).await?;
    log.ok(format!("database restored successfully from '{}'", name));
    Ok(())
}

/// Execute a schema file and, if its snapshot exists and the operator agrees, insert the
/// snapshot rows into the ledger. Returns whether rows were inserted.
pub async fn load_schema(migrator: &mut Migrator, name: &str, confirm: Confirm<'_>) -> MigrateResult<bool> {
    let mut rows = None;
    if let Some(snapshot) = snapshot_name_for(name).filter(|s| migrator.source().dir().join(s).is_file()) {
        migrator.log().dbg("load_schema", &snapshot);
        if let Some(confirm) = confirm {
            if confirm(&format!("found a migrations file '{}'. Should these migrations be inserted?", snapshot)) {
                rows = Some(decode_snapshot(&migrator.source().read_text(&snapshot)?)?);
            }
        }
    }

    migrator.log().info(format!("loading {}", name));
    migrator.migrate_from_file(name).await?;
    match rows {
        | Some(rows) => {
            migrator.import_ledger(&rows).await?;
            Ok(true)
        },
        | None => Ok(false),
    }
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::{
            config::Config,
            core::testing::{count_rows, ledger, quiet_log, sqlite_url, RecordingLogger, Scratch},
        },
        std::sync::Arc,
    };

    fn migrator(scratch: &Scratch) -> Migrator {
        let config = Config {
            database_url: sqlite_url(scratch),
            directory: scratch.path().to_path_buf(),
            ..Config::default()
        };
        Migrator::new(config, Arc::new(RecordingLogger::default())).unwrap()
    }

    fn rows() -> Vec<Migration> {
        vec![
            Migration::new(1000000002, "1000000002_b", "select\t2;\n", ""),
            Migration::new(1000000001, "1000000001_a", "create table t1(id int);", "drop table t1;"),
        ]
    }

    #[test]
    fn test_file_names() {
        assert_eq!(file_name("schema", Some("prod"), "sql"), "schema_prod.sql");
        assert!(file_name("dump", None, "sql").starts_with("dump_"));
        assert_eq!(snapshot_name_for("schema_prod.sql").as_deref(), Some("migrations_prod.json"));
        assert_eq!(snapshot_name_for("schema_1700000000.sql").as_deref(), Some("migrations_1700000000.json"));
        assert_eq!(snapshot_name_for("dump_prod.sql"), None);
    }

    #[test]
    fn test_snapshot_round_trip_sorted() {
        let text = encode_snapshot(&rows()).unwrap();
        assert!(!text.contains("select"));
        let decoded = decode_snapshot(&text).unwrap();
        assert_eq!(decoded.iter().map(|m| m.version).collect::<Vec<_>>(), vec![1000000001, 1000000002]);
        assert_eq!(decoded[1].up, "select\t2;\n");
    }

    #[test]
    fn test_snapshot_rejects_bad_body() {
        let text = r#"[{"version":1,"name":"1_a","up":"***","down":""}]"#;
        assert!(matches!(decode_snapshot(text), Err(MigrateError::Snapshot(_))));
        assert!(matches!(decode_snapshot("not json"), Err(MigrateError::Snapshot(_))));
    }

    #[tokio::test]
    async fn test_load_schema_with_snapshot() {
        let scratch = Scratch::new();
        scratch.file("schema_prod.sql", "create table t1(id int);");
        scratch.file("migrations_prod.json", &encode_snapshot(&rows()).unwrap());
        let mut m = migrator(&scratch);

        let mut yes = |_: &str| true;
        assert!(load_schema(&mut m, "schema_prod.sql", Some(&mut yes)).await.unwrap());
        m.finish().await.unwrap();
        assert_eq!(count_rows(&scratch, "t1").await, Some(0));
        assert_eq!(ledger(&scratch).await.len(), 2);
    }

    #[tokio::test]
    async fn test_load_schema_declined_snapshot() {
        let scratch = Scratch::new();
        scratch.file("schema_prod.sql", "create table t1(id int);");
        scratch.file("migrations_prod.json", &encode_snapshot(&rows()).unwrap());
        let mut m = migrator(&scratch);

        let mut no = |_: &str| false;
        assert!(!load_schema(&mut m, "schema_prod.sql", Some(&mut no)).await.unwrap());
        m.finish().await.unwrap();
        assert_eq!(count_rows(&scratch, "t1").await, Some(0));
        assert_eq!(count_rows(&scratch, "pqmigrate").await, None);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_stream_to_file() {
        let scratch = Scratch::new();
        let ok = scratch.path().join("dump_ok.sql");
        stream_to_file("sh", &["-c", "echo 'select 1;'"], &ok, &quiet_log()).await.unwrap();
        assert_eq!(scratch.read("dump_ok.sql"), "select 1;\n");

        let failed = scratch.path().join("dump_failed.sql");
        let res = stream_to_file("sh", &["-c", "echo partial; exit 3"], &failed, &quiet_log()).await;
        assert!(matches!(res, Err(MigrateError::ExternalTool { .. })));
        assert!(!failed.exists());
    }

    #[tokio::test]
    async fn test_stream_to_file_missing_tool() {
        let scratch = Scratch::new();
        let path = scratch.path().join("dump_none.sql");
        let res = stream_to_file("pqmigrate-no-such-tool", &[], &path, &quiet_log()).await;
        assert!(matches!(res, Err(MigrateError::ExternalTool { .. })));
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_load_full_dump_missing_file() {
        let scratch = Scratch::new();
        let source = MigrationSource::new(scratch.path(), quiet_log());
        let res = load_full_dump("postgres://localhost/none", &source, "dump_missing.sql", &quiet_log()).await;
        assert!(matches!(res, Err(MigrateError::Io { .. })));
    }
}
