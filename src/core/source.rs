//! Discovery of migrations in the base directory.

use {
    crate::core::{
        error::{MigrateError, MigrateResult},
        logger::Log,
        migration::{normalize_body, Direction, FileName, Migration, DOWN_SUFFIX, UP_SUFFIX},
        squash::{self, SQUASH_FILE_NAME},
    },
    std::{
        collections::BTreeMap,
        io::ErrorKind,
        path::{Path, PathBuf},
    },
};

/// Paths of a loose up/down pair on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LooseFiles {
    pub up: PathBuf,
    pub down: PathBuf,
}

/// Result of a directory scan.
#[derive(Debug, Default)]
pub struct Discovery {
    /// Deduplicated, version-ascending.
    pub migrations: Vec<Migration>,
    /// Versions that are backed by loose files, with their paths.
    pub loose: BTreeMap<u64, LooseFiles>,
}

#[derive(Debug, Default)]
struct Fragment {
    stem: String,
    up: Option<PathBuf>,
    down: Option<PathBuf>,
}

pub struct MigrationSource {
    dir: PathBuf,
    log: Log,
}

impl MigrationSource {
    pub fn new(dir: impl Into<PathBuf>, log: Log) -> Self {
        Self { dir: dir.into(), log }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// All migrations in the directory, version-ascending.
    pub fn read_all(&self) -> MigrateResult<Vec<Migration>> {
        Ok(self.scan()?.migrations)
    }

    /// Scan loose files and the squash archive.
    ///
    /// Precedence: inside the archive the first line per version wins; loose fragments
    /// are visited in file-name order and the first stem per version wins; a loose pair
    /// always replaces an archived entry of the same version.
    pub fn scan(&self) -> MigrateResult<Discovery> {
        self.log.dbg("scan", self.dir.display().to_string());
        let mut merged: BTreeMap<u64, Migration> = BTreeMap::new();
        for m in self.read_squash()? {
            if merged.contains_key(&m.version) {
                self.log.warn(format!("duplicate version {} in {}, keeping the first entry", m.version, SQUASH_FILE_NAME));
                continue;
            }
            merged.insert(m.version, m);
        }

        let mut fragments: BTreeMap<u64, Fragment> = BTreeMap::new();
        for file_name in self.list_files()? {
            let Some(parsed) = FileName::parse(&file_name)? else {
                continue;
            };
            self.log.dbg("scan", format!("{} -> {} ({})", file_name, parsed.version, parsed.direction));
            let fragment = fragments.entry(parsed.version).or_insert_with(|| Fragment {
                stem: parsed.stem.clone(),
                ..Fragment::default()
            });
            if fragment.stem != parsed.stem {
                self.log.warn(format!(
                    "'{}' reuses version {} of '{}', ignoring it",
                    file_name, parsed.version, fragment.stem
                ));
                continue;
            }
            let path = self.dir.join(&file_name);
            match parsed.direction {
                | Direction::Up => fragment.up = Some(path),
                | Direction::Down => fragment.down = Some(path),
            }
        }

        let mut loose = BTreeMap::new();
        for (version, fragment) in fragments {
            let (Some(up), Some(down)) = (fragment.up, fragment.down) else {
                return Err(MigrateError::MissingMigrationFile(version));
            };
            let migration = Migration {
                version,
                name: fragment.stem,
                up: read_normalized(&up)?,
                down: read_normalized(&down)?,
            };
            if merged.insert(version, migration).is_some() {
                self.log.dbg("scan", format!("loose files override squashed version {}", version));
            }
            loose.insert(version, LooseFiles { up, down });
        }

        let migrations: Vec<Migration> = merged.into_values().collect();
        self.log.dbg("scan", format!("found {} migration(s)", migrations.len()));
        Ok(Discovery { migrations, loose })
    }

    /// Load one migration by fragment file name (`…up.sql` / `…down.sql`) or by stem.
    /// Asking for one side always reads its sibling too.
    pub fn get_specific(&self, file_name: &str) -> MigrateResult<(Migration, LooseFiles)> {
        self.log.dbg("get_specific", file_name);
        let base = Path::new(file_name)
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| MigrateError::NotAMigrationFile(file_name.to_string()))?;
        let candidate = if base.ends_with(UP_SUFFIX) || base.ends_with(DOWN_SUFFIX) {
            base.to_string()
        } else {
            format!("{}{}", base, UP_SUFFIX)
        };
        let parsed = FileName::parse(&candidate)?.ok_or_else(|| MigrateError::NotAMigrationFile(file_name.to_string()))?;

        let files = LooseFiles {
            up: self.dir.join(format!("{}{}", parsed.stem, UP_SUFFIX)),
            down: self.dir.join(format!("{}{}", parsed.stem, DOWN_SUFFIX)),
        };
        let read_side = |path: &Path| match read_normalized(path) {
            | Err(MigrateError::Io { source, .. }) if source.kind() == ErrorKind::NotFound => {
                Err(MigrateError::MissingMigrationFile(parsed.version))
            },
            | other => other,
        };
        let migration = Migration {
            version: parsed.version,
            name: parsed.stem.clone(),
            up: read_side(&files.up)?,
            down: read_side(&files.down)?,
        };
        Ok((migration, files))
    }

    /// Entries of the squash archive, or nothing if there is no archive.
    pub fn read_squash(&self) -> MigrateResult<Vec<Migration>> {
        let path = self.squash_path();
        match std::fs::read_to_string(&path) {
            | Ok(text) => squash::decode(&text),
            | Err(e) if e.kind() == ErrorKind::NotFound => Ok(Vec::new()),
            | Err(e) => Err(MigrateError::io(path, e)),
        }
    }

    pub fn squash_path(&self) -> PathBuf {
        self.dir.join(SQUASH_FILE_NAME)
    }

    /// Read a file from the base directory, trimmed and NFC-normalized.
    pub fn read_text(&self, file_name: &str) -> MigrateResult<String> {
        let path = self.dir.join(file_name);
        self.log.dbg("read_text", path.display().to_string());
        read_normalized(&path)
    }

    /// Write a file into the base directory, creating the directory if needed.
    pub fn write_text(&self, file_name: &str, contents: &[u8]) -> MigrateResult<PathBuf> {
        self.ensure_dir()?;
        let path = self.dir.join(file_name);
        self.log.dbg("write_text", path.display().to_string());
        std::fs::write(&path, contents).map_err(|e| MigrateError::io(&path, e))?;
        Ok(path)
    }

    pub fn ensure_dir(&self) -> MigrateResult<()> {
        if !self.dir.exists() {
            self.log.dbg("ensure_dir", "base directory does not exist, creating");
            std::fs::create_dir_all(&self.dir).map_err(|e| MigrateError::io(&self.dir, e))?;
        }
        Ok(())
    }

    pub fn remove(&self, path: &Path) -> MigrateResult<()> {
        self.log.dbg("remove", path.display().to_string());
        std::fs::remove_file(path).map_err(|e| MigrateError::io(path, e))
    }

    /// Create an empty up/down pair named `<epoch>_<name>`.
    pub fn create_migration(&self, name: &str, epoch: i64) -> MigrateResult<LooseFiles> {
        crate::core::migration::validate_migration_name(name)?;
        let stem = format!("{}_{}", epoch, name);
        let files = LooseFiles {
            up: self.dir.join(format!("{}{}", stem, UP_SUFFIX)),
            down: self.dir.join(format!("{}{}", stem, DOWN_SUFFIX)),
        };
        for path in [&files.down, &files.up] {
            if path.exists() {
                return Err(MigrateError::io(path, std::io::Error::from(ErrorKind::AlreadyExists)));
            }
        }
        self.ensure_dir()?;
        for path in [&files.down, &files.up] {
            self.log.print(format!("creating {}", path.display()));
            std::fs::write(path, "").map_err(|e| MigrateError::io(path, e))?;
        }
        Ok(files)
    }

    /// Plain file names in the base directory, sorted.
    fn list_files(&self) -> MigrateResult<Vec<String>> {
        let entries = std::fs::read_dir(&self.dir).map_err(|e| match e.kind() {
            | ErrorKind::NotFound => MigrateError::configuration(format!(
                "migration directory does not exist: {}",
                self.dir.display()
            )),
            | _ => MigrateError::io(&self.dir, e),
        })?;
        let mut names = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| MigrateError::io(&self.dir, e))?;
            let is_file = entry.file_type().map_err(|e| MigrateError::io(entry.path(), e))?.is_file();
            if is_file {
                names.push(entry.file_name().to_string_lossy().into_owned());
            }
        }
        names.sort();
        Ok(names)
    }
}

fn read_normalized(path: &Path) -> MigrateResult<String> {
    let raw = std::fs::read_to_string(path).map_err(|e| MigrateError::io(path, e))?;
    Ok(normalize_body(&raw))
}
