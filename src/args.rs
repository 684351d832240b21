use {
    anyhow::{Context, Result},
    clap::{Arg, ArgAction, ArgMatches},
    pqmigrate::{
        config::{Overrides, DEFAULT_CONFIG_FILE},
        core::migration::{Direction, Steps},
    },
    std::{path::PathBuf, str::FromStr},
};

#[derive(Debug)]
pub(crate) enum ManualFormat {
    Manpages,
    Markdown,
}

#[derive(Debug)]
pub(crate) enum Command {
    Manual {
        path: PathBuf,
        format: ManualFormat,
    },
    Autocomplete {
        path: PathBuf,
        shell: clap_complete::Shell,
    },
    Init,
    Create {
        name: String,
    },
    Up {
        steps: Steps,
    },
    Down {
        steps: Steps,
    },
    Apply {
        direction: Direction,
        file: String,
    },
    Sync,
    Replace {
        file: String,
    },
    Status,
    Squash,
    Unsquash,
    Seed {
        file: String,
    },
    DumpSchema {
        name: Option<String>,
    },
    DumpFull {
        name: Option<String>,
    },
    LoadSchema {
        file: String,
    },
    LoadDump {
        file: String,
    },
    CreateDb,
    DropDb,
}

#[derive(Debug)]
pub(crate) struct CallArgs {
    pub config_path: PathBuf,
    /// Set when `--config` was passed explicitly; a missing file is then an error.
    pub config_required: bool,
    pub overrides: Overrides,
    pub color: bool,
    pub command: Command,
}

pub(crate) struct ClapArgumentLoader {}

impl ClapArgumentLoader {
    pub(crate) fn root_command() -> clap::Command {
        let steps = || {
            Arg::new("steps")
                .short('s')
                .long("steps")
                .help("Maximum number of migrations, or \"all\".")
                .default_value("1")
        };
        let name = |default: Option<&'static str>| {
            let arg = Arg::new("name").short('n').long("name");
            match default {
                | Some(d) => arg.default_value(d),
                | None => arg.required(false),
            }
        };

        clap::Command::new("pqmigrate")
            .version(env!("CARGO_PKG_VERSION"))
            .about("Versioned SQL migrations with a ledger inside the database.")
            .author("cchexcode <alexanderh.weber@outlook.com>")
            .propagate_version(true)
            .subcommand_required(true)
            .args([
                Arg::new("config")
                    .short('c')
                    .long("config")
                    .help("Path to the config file.")
                    .global(true),
                Arg::new("url").long("url").help("Database URL.").global(true),
                Arg::new("dir").long("dir").help("Directory holding the migration files.").global(true),
                Arg::new("table").long("table").help("Name of the ledger table.").global(true),
                Arg::new("dry-run")
                    .short('d')
                    .long("dry-run")
                    .help("Run everything in one transaction and roll it back at the end.")
                    .action(ArgAction::SetTrue)
                    .global(true),
                Arg::new("all-in-one-tx")
                    .long("all-in-one-tx")
                    .help("Run every statement of this invocation in a single transaction.")
                    .action(ArgAction::SetTrue)
                    .global(true),
                Arg::new("bw")
                    .long("bw")
                    .help("No colour (black and white).")
                    .action(ArgAction::SetTrue)
                    .global(true),
                Arg::new("verbose")
                    .short('v')
                    .long("verbose")
                    .help("Print diagnostic output.")
                    .action(ArgAction::SetTrue)
                    .global(true),
            ])
            .subcommand(clap::Command::new("init").about("Writes a sample config file."))
            .subcommand(
                clap::Command::new("man")
                    .about("Renders the manual.")
                    .arg(Arg::new("out").short('o').long("out").required(true))
                    .arg(
                        Arg::new("format")
                            .short('f')
                            .long("format")
                            .value_parser(["manpages", "markdown"])
                            .required(true),
                    ),
            )
            .subcommand(
                clap::Command::new("autocomplete")
                    .about("Renders shell completion scripts.")
                    .arg(Arg::new("out").short('o').long("out").required(true))
                    .arg(
                        Arg::new("shell")
                            .short('s')
                            .long("shell")
                            .value_parser(["bash", "zsh", "fish", "elvish", "powershell"])
                            .required(true),
                    ),
            )
            .subcommand(
                clap::Command::new("create")
                    .about("Creates an empty up/down migration pair.")
                    .arg(Arg::new("name").required(true)),
            )
            .subcommand(clap::Command::new("up").about("Applies pending migrations.").arg(steps()))
            .subcommand(clap::Command::new("down").about("Rolls back applied migrations.").arg(steps()))
            .subcommand(
                clap::Command::new("apply")
                    .about("Applies or rolls back a single migration.")
                    .subcommand_required(true)
                    .subcommand(
                        clap::Command::new("up")
                            .about("Applies one migration file.")
                            .arg(Arg::new("file").required(true)),
                    )
                    .subcommand(
                        clap::Command::new("down")
                            .about("Rolls back one migration using its stored down.")
                            .arg(Arg::new("file").required(true)),
                    ),
            )
            .subcommand(clap::Command::new("sync").about("Reconciles the database with the migration directory."))
            .subcommand(
                clap::Command::new("replace")
                    .about("Overwrites a stored migration with the file contents without running it.")
                    .arg(Arg::new("file").required(true)),
            )
            .subcommand(clap::Command::new("status").about("Lists migrations on disk and in the database."))
            .subcommand(clap::Command::new("squash").about("Folds applied migrations into the squash archive."))
            .subcommand(clap::Command::new("unsquash").about("Expands the squash archive into separate files."))
            .subcommand(
                clap::Command::new("seed")
                    .about("Runs a SQL file without recording it.")
                    .arg(name(Some("seeds.sql"))),
            )
            .subcommand(
                clap::Command::new("dump-schema")
                    .about("Dumps the schema and the applied migrations.")
                    .arg(name(None)),
            )
            .subcommand(
                clap::Command::new("dump-full")
                    .about("Dumps schema and content.")
                    .arg(name(None)),
            )
            .subcommand(
                clap::Command::new("load-schema")
                    .about("Loads a schema dump and optionally its migrations.")
                    .arg(name(Some("schema.sql"))),
            )
            .subcommand(
                clap::Command::new("load-dump")
                    .about("Restores a full dump through psql.")
                    .arg(Arg::new("file").required(true)),
            )
            .subcommand(clap::Command::new("create-db").about("Creates the database named in the URL."))
            .subcommand(clap::Command::new("drop-db").about("Drops the database named in the URL."))
    }

    pub(crate) fn load() -> Result<CallArgs> {
        Self::from_matches(&Self::root_command().get_matches())
    }

    pub(crate) fn from_matches(matches: &ArgMatches) -> Result<CallArgs> {
        let (name, subc) = matches.subcommand().ok_or_else(|| anyhow::anyhow!("unknown command"))?;
        let command = match name {
            | "man" => Command::Manual {
                path: required::<String>(subc, "out")?.into(),
                format: match required::<String>(subc, "format")?.as_str() {
                    | "manpages" => ManualFormat::Manpages,
                    | "markdown" => ManualFormat::Markdown,
                    | _ => return Err(anyhow::anyhow!("argument \"format\": unknown format")),
                },
            },
            | "autocomplete" => Command::Autocomplete {
                path: required::<String>(subc, "out")?.into(),
                shell: clap_complete::Shell::from_str(&required::<String>(subc, "shell")?)
                    .map_err(|e| anyhow::anyhow!("argument \"shell\": {}", e))?,
            },
            | "init" => Command::Init,
            | "create" => Command::Create { name: required(subc, "name")? },
            | "up" => Command::Up { steps: parse_steps(subc)? },
            | "down" => Command::Down { steps: parse_steps(subc)? },
            | "apply" => {
                let (direction, subc) = subc.subcommand().ok_or_else(|| anyhow::anyhow!("apply needs up or down"))?;
                Command::Apply {
                    direction: match direction {
                        | "up" => Direction::Up,
                        | "down" => Direction::Down,
                        | other => return Err(anyhow::anyhow!("unknown direction \"{}\"", other)),
                    },
                    file: required(subc, "file")?,
                }
            },
            | "sync" => Command::Sync,
            | "replace" => Command::Replace { file: required(subc, "file")? },
            | "status" => Command::Status,
            | "squash" => Command::Squash,
            | "unsquash" => Command::Unsquash,
            | "seed" => Command::Seed { file: required(subc, "name")? },
            | "dump-schema" => Command::DumpSchema { name: subc.get_one::<String>("name").cloned() },
            | "dump-full" => Command::DumpFull { name: subc.get_one::<String>("name").cloned() },
            | "load-schema" => Command::LoadSchema { file: required(subc, "name")? },
            | "load-dump" => Command::LoadDump { file: required(subc, "file")? },
            | "create-db" => Command::CreateDb,
            | "drop-db" => Command::DropDb,
            | _ => return Err(anyhow::anyhow!("unknown command")),
        };

        let config_arg = matches.get_one::<String>("config");
        let dry_run = matches.get_flag("dry-run");
        Ok(CallArgs {
            config_path: config_arg.map(PathBuf::from).unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE)),
            config_required: config_arg.is_some(),
            overrides: Overrides {
                url: matches.get_one::<String>("url").cloned(),
                directory: matches.get_one::<String>("dir").map(PathBuf::from),
                table: matches.get_one::<String>("table").cloned(),
                // a dry run is one transaction that is rolled back at the end
                all_in_one_tx: matches.get_flag("all-in-one-tx") || dry_run,
                dry_run,
                verbose: matches.get_flag("verbose"),
            },
            color: !matches.get_flag("bw"),
            command,
        })
    }
}

fn required<T: Clone + Send + Sync + 'static>(matches: &ArgMatches, id: &str) -> Result<T> {
    matches
        .get_one::<T>(id)
        .cloned()
        .ok_or_else(|| anyhow::anyhow!("argument \"{}\" is required", id))
}

fn parse_steps(matches: &ArgMatches) -> Result<Steps> {
    let raw = required::<String>(matches, "steps")?;
    Steps::from_str(&raw).with_context(|| format!("argument \"steps\": {}", raw))
}
