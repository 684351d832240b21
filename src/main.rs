pub mod args;
pub mod prompt;
pub mod reference;

use {
    crate::{
        args::{CallArgs, ClapArgumentLoader, Command, ManualFormat},
        prompt::{stdin_confirm, CONFIRM_PAINFUL, CONFIRM_YES},
    },
    anyhow::{Context, Result},
    pqmigrate::{
        config::{Config, ConfigFile},
        core::{
            logger::{ConsoleLogger, Log, Logger},
            migration::Direction,
            service::{render_status, Migrator},
            source::MigrationSource,
        },
        subsystem::postgres::{admin, dump},
    },
    std::sync::Arc,
};

#[tokio::main]
async fn main() -> Result<()> {
    let args = ClapArgumentLoader::load()?;
    let logger: Arc<dyn Logger> = Arc::new(ConsoleLogger::new(args.color));
    if let Err(e) = run(args, logger.clone()).await {
        logger.error(&format!("{:#}", e));
        std::process::exit(1);
    }
    Ok(())
}

async fn run(args: CallArgs, logger: Arc<dyn Logger>) -> Result<()> {
    match args.command {
        | Command::Manual { path, format } => {
            std::fs::create_dir_all(&path).with_context(|| format!("Failed to create directory: {}", path.display()))?;
            match format {
                | ManualFormat::Manpages => reference::build_manpages(&path)?,
                | ManualFormat::Markdown => reference::build_markdown(&path)?,
            }
            return Ok(());
        },
        | Command::Autocomplete { path, shell } => {
            std::fs::create_dir_all(&path).with_context(|| format!("Failed to create directory: {}", path.display()))?;
            reference::build_shell_completion(&path, &shell)?;
            return Ok(());
        },
        | Command::Init => {
            let path = &args.config_path;
            if path.exists() {
                return Err(anyhow::anyhow!("config file {} already exists", path.display()));
            }
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
            }
            let toml = toml::to_string(&ConfigFile::sample())?;
            std::fs::write(path, toml).with_context(|| format!("Failed to write config file to: {}", path.display()))?;
            logger.ok(&format!("config written to \"{}\"", path.display()));
            return Ok(());
        },
        | _ => {},
    }

    dotenvy::dotenv().ok();
    let file = ConfigFile::load(&args.config_path, args.config_required)
        .with_context(|| format!("Failed to load config: {}", args.config_path.display()))?;
    let mut config = Config::resolve(file.as_ref(), |k| std::env::var(k).ok(), &args.overrides)?;
    if matches!(args.command, Command::LoadSchema { .. }) && !config.dry_run {
        // every statement of a schema dump commits on its own
        config.all_in_one_tx = false;
    }
    config.validate()?;
    let log = Log::new(logger.clone(), config.verbose);
    log.dbg("config", format!("{:?}", config));

    match args.command {
        | Command::CreateDb => {
            let mut confirm = stdin_confirm(log.clone(), CONFIRM_YES, true);
            admin::create_db(&config.database_url, Some(&mut confirm), &log).await?;
        },
        | Command::DropDb => {
            let mut confirm = stdin_confirm(log.clone(), CONFIRM_PAINFUL, false);
            admin::drop_db(&config.database_url, Some(&mut confirm), &log).await?;
        },
        | Command::DumpFull { name } => {
            let source = MigrationSource::new(&config.directory, log.clone());
            dump::dump_full(&config.database_url, &source, name.as_deref(), &log).await?;
        },
        | Command::LoadDump { file } => {
            let source = MigrationSource::new(&config.directory, log.clone());
            dump::load_full_dump(&config.database_url, &source, &file, &log).await?;
        },
        | command => {
            let mut migrator = Migrator::new(config, logger)?;
            engine(&mut migrator, command).await?;
            migrator.finish().await?;
        },
    }
    log.ok("done.");
    Ok(())
}

async fn engine(migrator: &mut Migrator, command: Command) -> Result<()> {
    let log = migrator.log().clone();
    match command {
        | Command::Create { name } => {
            let files = migrator.create_migration(&name)?;
            log.ok(format!("created \"{}\" and \"{}\"", files.up.display(), files.down.display()));
        },
        | Command::Up { steps } => {
            migrator.migrate_up(steps).await?;
        },
        | Command::Down { steps } => {
            migrator.migrate_down(steps).await?;
        },
        | Command::Apply { direction, file } => {
            match direction {
                | Direction::Up => migrator.migrate_up_file(&file).await?,
                | Direction::Down => migrator.migrate_down_file(&file).await?,
            };
        },
        | Command::Sync => {
            let mut confirm = stdin_confirm(log.clone(), CONFIRM_YES, true);
            let report = migrator.sync(Some(&mut confirm)).await?;
            log.dbg("sync", format!("{:?}", report));
        },
        | Command::Replace { file } => {
            let mut confirm = stdin_confirm(log.clone(), CONFIRM_YES, true);
            migrator.replace(&file, Some(&mut confirm)).await?;
        },
        | Command::Status => {
            let rows = migrator.status().await?;
            log.print(render_status(&rows));
        },
        | Command::Squash => {
            let mut confirm = stdin_confirm(log.clone(), CONFIRM_YES, true);
            migrator.squash(Some(&mut confirm)).await?;
        },
        | Command::Unsquash => {
            let mut confirm = stdin_confirm(log.clone(), CONFIRM_YES, true);
            migrator.unsquash(Some(&mut confirm)).await?;
        },
        | Command::Seed { file } => {
            migrator.migrate_from_file(&file).await?;
        },
        | Command::DumpSchema { name } => {
            dump::dump_schema_to_file(migrator, name.as_deref()).await?;
        },
        | Command::LoadSchema { file } => {
            let mut confirm = stdin_confirm(log.clone(), CONFIRM_YES, true);
            dump::load_schema(migrator, &file, Some(&mut confirm)).await?;
        },
        | Command::Manual { .. }
        | Command::Autocomplete { .. }
        | Command::Init
        | Command::CreateDb
        | Command::DropDb
        | Command::DumpFull { .. }
        | Command::LoadDump { .. } => {
            return Err(anyhow::anyhow!("command does not run through the migrator"));
        },
    }
    Ok(())
}
