use {
    crate::{
        config::Config,
        core::{
            controller::{TxController, TxState},
            diff::{diff_lines, has_changes, DiffLine},
            error::{MigrateError, MigrateResult},
            logger::{Log, Logger},
            migration::{Direction, Migration, Steps},
            set,
            source::{LooseFiles, MigrationSource},
            squash::{self, SQUASH_FILE_NAME},
            store::{is_missing_table, LedgerChange, LedgerStore},
        },
    },
    chrono::Utc,
    std::{collections::BTreeSet, sync::Arc},
};

/// Asks the operator a yes/no question. `None` means nobody is there to answer.
pub type Confirm<'a> = Option<&'a mut dyn FnMut(&str) -> bool>;

/// What a [`Migrator::sync`] run did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncReport {
    /// Applied migrations whose files changed on disk.
    pub changed: usize,
    /// Changed migrations that were rolled back with the old down and re-applied.
    pub replaced: usize,
    /// Applied migrations without files on disk.
    pub orphaned: usize,
    pub rolled_back: usize,
    /// New migrations applied.
    pub applied: usize,
    /// Declined prompts.
    pub skipped: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationStatus {
    pub version: u64,
    pub name: String,
    pub on_disk: bool,
    pub applied: bool,
    pub changed: bool,
}

/// The migration engine. One per invocation; call [`Migrator::finish`] at the end.
pub struct Migrator {
    config: Config,
    source: MigrationSource,
    ctl: TxController,
    log: Log,
}

impl Migrator {
    pub fn new(config: Config, logger: Arc<dyn Logger>) -> MigrateResult<Self> {
        config.validate()?;
        let log = Log::new(logger, config.verbose);
        let source = MigrationSource::new(config.directory.clone(), log.clone());
        let ctl = TxController::new(
            config.database_url.clone(),
            LedgerStore::new(config.table.clone()),
            config.all_in_one_tx,
            config.dry_run,
            log.clone(),
        );
        Ok(Self { config, source, ctl, log })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn source(&self) -> &MigrationSource {
        &self.source
    }

    pub fn log(&self) -> &Log {
        &self.log
    }

    pub fn state(&self) -> TxState {
        self.ctl.state()
    }

    /// Commit (or discard, in dry-run mode) and disconnect.
    pub async fn finish(&mut self) -> MigrateResult<()> {
        self.log.dbg("finish", format!("state {:?}", self.ctl.state()));
        self.ctl.finish().await
    }

    pub fn create_migration(&self, name: &str) -> MigrateResult<LooseFiles> {
        self.source.create_migration(name, Utc::now().timestamp())
    }

    /// Apply up to `steps` pending migrations in ascending order.
    pub async fn migrate_up(&mut self, steps: Steps) -> MigrateResult<usize> {
        self.log.dbg("migrate_up", format!("{:?}", steps));
        self.ensure_table().await?;
        let disk = self.source.read_all()?;
        let ledger = self.load_ledger().await?;
        let pending = set::superset_of(&disk, &ledger);
        if pending.is_empty() {
            self.log.info("there was nothing to migrate");
            return Ok(0);
        }
        let count = steps.limit(pending.len());
        for m in &pending[..count] {
            self.migrate(m, Direction::Up).await?;
        }
        self.log.ok(format!("applied {} migration(s)", count));
        Ok(count)
    }

    /// Roll back up to `steps` applied migrations, newest first, using the stored down.
    pub async fn migrate_down(&mut self, steps: Steps) -> MigrateResult<usize> {
        self.log.dbg("migrate_down", format!("{:?}", steps));
        self.ensure_table().await?;
        let ledger = self.load_ledger().await?;
        if ledger.is_empty() {
            self.log.info("there was nothing to migrate");
            return Ok(0);
        }
        let count = steps.limit(ledger.len());
        for m in &ledger[..count] {
            self.migrate(m, Direction::Down).await?;
        }
        self.log.ok(format!("rolled back {} migration(s)", count));
        Ok(count)
    }

    /// Apply a single migration by file name. Returns `false` if it was already applied.
    pub async fn migrate_up_file(&mut self, file: &str) -> MigrateResult<bool> {
        self.ensure_table().await?;
        let (m, _) = self.source.get_specific(file)?;
        if self.ctl.fetch_ledger_one(m.version).await?.is_some() {
            self.log.warn(format!("{} is already applied, skipping", m.name));
            return Ok(false);
        }
        self.migrate(&m, Direction::Up).await?;
        Ok(true)
    }

    /// Roll back a single migration by file name, running the down that was stored when
    /// it was applied. Returns `false` if it is not applied.
    pub async fn migrate_down_file(&mut self, file: &str) -> MigrateResult<bool> {
        self.ensure_table().await?;
        let (m, _) = self.source.get_specific(file)?;
        let Some(stored) = self.ctl.fetch_ledger_one(m.version).await? else {
            self.log.warn(format!("{} is not applied, nothing to roll back", m.name));
            return Ok(false);
        };
        let stored = stored.normalized();
        if stored.down != m.down {
            self.log.warn(format!("{} changed on disk, using the stored down migration", m.name));
        }
        self.migrate(&stored, Direction::Down).await?;
        Ok(true)
    }

    /// Reconcile the ledger with the directory: re-run changed migrations, roll back
    /// orphans, and apply new ones.
    pub async fn sync(&mut self, confirm: Confirm<'_>) -> MigrateResult<SyncReport> {
        let Some(confirm) = confirm else {
            return Err(MigrateError::InteractiveOnly("sync"));
        };
        self.ensure_table().await?;
        let disk = self.source.read_all()?;
        let ledger = self.load_ledger().await?;
        let mut report = SyncReport::default();

        let stored_by_version = set::by_version(&ledger);
        let changed: Vec<(&Migration, &Migration)> = disk
            .iter()
            .filter_map(|m| stored_by_version.get(&m.version).map(|stored| (*stored, m)))
            .filter(|(stored, m)| stored.content_differs(m))
            .collect();
        if !changed.is_empty() {
            self.log.warn(format!("{} migration(s) changed on disk!", changed.len()));
        }
        for (stored, m) in changed {
            report.changed += 1;
            self.log.warn(&m.name);
            self.show_diff(stored, m);
            if !confirm("Shall I migrate down and then up?") {
                self.log.warn("skipping migration...");
                report.skipped += 1;
                continue;
            }
            self.migrate(stored, Direction::Down).await?;
            self.migrate(m, Direction::Up).await?;
            report.replaced += 1;
        }

        let orphaned = set::difference(&ledger, &disk);
        if !orphaned.is_empty() {
            self.log.warn(format!("{} migration(s) don't exist on disk", orphaned.len()));
        }
        for m in orphaned.iter().rev() {
            report.orphaned += 1;
            self.log.warn(format!("================ {} UP ================", m.name));
            self.log.ok(&m.up);
            self.log.warn(format!("================ {} DOWN ================", m.name));
            self.log.ok(&m.down);
            if !confirm("Shall I migrate down?") {
                self.log.warn("skipping migration...");
                report.skipped += 1;
                continue;
            }
            self.migrate(m, Direction::Down).await?;
            report.rolled_back += 1;
        }

        let new = set::superset_of(&disk, &ledger);
        if new.is_empty() {
            self.log.info("nothing to migrate");
        } else {
            self.log.info(format!("applying {} new migration(s)", new.len()));
        }
        for m in &new {
            self.migrate(m, Direction::Up).await?;
            report.applied += 1;
        }
        self.log.dbg("sync", format!("{:?}", report));
        Ok(report)
    }

    /// Overwrite the stored record of an applied migration with the file contents,
    /// without running any of it.
    pub async fn replace(&mut self, file: &str, confirm: Confirm<'_>) -> MigrateResult<bool> {
        let Some(confirm) = confirm else {
            return Err(MigrateError::InteractiveOnly("replace"));
        };
        self.ensure_table().await?;
        let (m, _) = self.source.get_specific(file)?;
        let stored = self
            .ctl
            .fetch_ledger_one(m.version)
            .await?
            .ok_or(MigrateError::NotApplied(m.version))?
            .normalized();
        if stored.name == m.name && !stored.content_differs(&m) {
            self.log.info("nothing to replace");
            return Ok(false);
        }
        self.show_diff(&stored, &m);
        if !confirm("Shall I replace the stored migration with the file contents?") {
            self.log.warn("skipping replace...");
            return Ok(false);
        }
        self.ctl.exec_string("", Some(LedgerChange::Update(&m))).await?;
        self.log.ok(format!("replaced stored migration {}", m.name));
        Ok(true)
    }

    /// Fold every applied migration that is also on disk into the squash archive.
    /// Returns the number of migrations written.
    pub async fn squash(&mut self, confirm: Confirm<'_>) -> MigrateResult<usize> {
        let Some(confirm) = confirm else {
            return Err(MigrateError::InteractiveOnly("squash"));
        };
        self.ensure_table().await?;
        let discovery = self.source.scan()?;
        let ledger = self.load_ledger().await?;
        let eligible = set::intersection(&ledger, &discovery.migrations);
        if eligible.is_empty() {
            self.log.info("nothing to squash");
            return Ok(0);
        }

        // entries already archived but no longer applied stay in the archive
        let archived = self.source.read_squash()?;
        let contents = squash::encode(&set::union(&archived, &eligible))?;
        if !confirm(&format!("Shall I squash {} migration(s) into {}?", eligible.len(), SQUASH_FILE_NAME)) {
            self.log.warn("skipping squash...");
            return Ok(0);
        }
        let path = self.source.write_text(SQUASH_FILE_NAME, contents.as_bytes())?;
        self.log.ok(format!("wrote {}", path.display()));

        let redundant: Vec<&LooseFiles> = eligible.iter().filter_map(|m| discovery.loose.get(&m.version)).collect();
        if !redundant.is_empty() && confirm(&format!("Shall I delete {} squashed migration file pair(s)?", redundant.len())) {
            for files in redundant {
                self.source.remove(&files.up)?;
                self.source.remove(&files.down)?;
            }
        }
        Ok(eligible.len())
    }

    /// Expand the squash archive back into loose files. Returns the number of pairs written.
    pub async fn unsquash(&mut self, confirm: Confirm<'_>) -> MigrateResult<usize> {
        let Some(confirm) = confirm else {
            return Err(MigrateError::InteractiveOnly("unsquash"));
        };
        let path = self.source.squash_path();
        if !path.exists() {
            self.log.info(format!("there is no {} to unsquash", SQUASH_FILE_NAME));
            return Ok(0);
        }
        let archived = self.source.read_squash()?;
        let mut written = 0;
        if !archived.is_empty() && confirm(&format!("Shall I write {} migration(s) as separate files?", archived.len())) {
            for m in &archived {
                let (up, down) = (m.up_file_name(), m.down_file_name());
                if self.source.dir().join(&up).exists() || self.source.dir().join(&down).exists() {
                    self.log.warn(format!("{} already exists on disk, skipping", m.name));
                    continue;
                }
                self.source.write_text(&down, m.down.as_bytes())?;
                self.source.write_text(&up, m.up.as_bytes())?;
                written += 1;
            }
            self.log.ok(format!("wrote {} migration(s)", written));
        }
        if confirm(&format!("Shall I delete {}?", SQUASH_FILE_NAME)) {
            self.source.remove(&path)?;
        }
        Ok(written)
    }

    /// Run a file from the base directory without touching the ledger (seeds, schemas).
    pub async fn migrate_from_file(&mut self, file: &str) -> MigrateResult<()> {
        let body = self.source.read_text(file)?;
        self.log.info(format!("executing {}", file));
        self.ctl.exec_string(&body, None).await
    }

    /// Insert ledger rows without running anything; used when restoring a schema dump.
    pub async fn import_ledger(&mut self, rows: &[Migration]) -> MigrateResult<()> {
        self.ensure_table().await?;
        self.log.info(format!("inserting {} migration(s)", rows.len()));
        self.ctl.exec_string("", Some(LedgerChange::InsertBatch(rows))).await
    }

    /// Applied migrations, newest first.
    pub async fn ledger(&mut self) -> MigrateResult<Vec<Migration>> {
        self.ensure_table().await?;
        self.load_ledger().await
    }

    /// Applied migrations, newest first, without creating the ledger table. A missing
    /// table reads as an empty ledger.
    pub async fn ledger_if_present(&mut self) -> MigrateResult<Vec<Migration>> {
        match self.load_ledger().await {
            | Err(MigrateError::Database(e)) if is_missing_table(&e) => {
                self.log.dbg("ledger", format!("no table {}", self.ctl.store().table()));
                Ok(Vec::new())
            },
            | other => other,
        }
    }

    pub async fn status(&mut self) -> MigrateResult<Vec<MigrationStatus>> {
        self.ensure_table().await?;
        let disk = self.source.read_all()?;
        let ledger = self.load_ledger().await?;
        let on_disk = set::by_version(&disk);
        let applied = set::by_version(&ledger);
        let versions: BTreeSet<u64> = on_disk.keys().chain(applied.keys()).copied().collect();
        Ok(versions
            .into_iter()
            .map(|version| {
                let d = on_disk.get(&version);
                let a = applied.get(&version);
                MigrationStatus {
                    version,
                    name: d.or(a).map(|m| m.name.clone()).unwrap_or_default(),
                    on_disk: d.is_some(),
                    applied: a.is_some(),
                    changed: matches!((d, a), (Some(d), Some(a)) if d.content_differs(a)),
                }
            })
            .collect())
    }

    async fn ensure_table(&mut self) -> MigrateResult<()> {
        self.log.dbg("ensure_table", self.ctl.store().table());
        let sql = self.ctl.store().create_table_sql();
        self.ctl.exec_string(&sql, None).await
    }

    async fn load_ledger(&mut self) -> MigrateResult<Vec<Migration>> {
        let rows = self.ctl.fetch_ledger().await?;
        Ok(rows.iter().map(Migration::normalized).collect())
    }

    async fn migrate(&mut self, m: &Migration, direction: Direction) -> MigrateResult<()> {
        self.log.info(format!("migrating > {} ({})", m.name, direction));
        let change = match direction {
            | Direction::Up => LedgerChange::Insert(m),
            | Direction::Down => LedgerChange::Delete(m),
        };
        self.ctl.exec_string(m.body(direction), Some(change)).await
    }

    fn show_diff(&self, stored: &Migration, disk: &Migration) {
        for (label, old, new) in [("UP", &stored.up, &disk.up), ("DOWN", &stored.down, &disk.down)] {
            let lines = diff_lines(old, new);
            if !has_changes(&lines) {
                continue;
            }
            self.log.warn(format!("================ {} ================", label));
            for line in lines {
                match line {
                    | DiffLine::Removed(l) => self.log.warn(format!("-{}", l)),
                    | DiffLine::Added(l) => self.log.info(format!("+{}", l)),
                    | DiffLine::Equal(l) => self.log.ok(format!(" {}", l)),
                }
            }
        }
    }
}

/// Render a status listing as a table.
pub fn render_status(rows: &[MigrationStatus]) -> String {
    use comfy_table::{modifiers::UTF8_ROUND_CORNERS, presets::UTF8_FULL, Cell, CellAlignment, ContentArrangement, Table};

    let mark = |b: bool| if b { "✅" } else { "❌" };
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec![Cell::new("Version"), Cell::new("Name"), Cell::new("Local"), Cell::new("Applied"), Cell::new("Changed")]);
    for row in rows {
        table.add_row(vec![
            Cell::new(row.version),
            Cell::new(&row.name),
            Cell::new(mark(row.on_disk)).set_alignment(CellAlignment::Center),
            Cell::new(mark(row.applied)).set_alignment(CellAlignment::Center),
            Cell::new(if row.changed { "⚠️" } else { "" }).set_alignment(CellAlignment::Center),
        ]);
    }
    table.to_string()
}
