use {
    crate::core::error::{MigrateError, MigrateResult},
    serde::{Deserialize, Serialize},
    std::{fmt, str::FromStr},
    unicode_normalization::UnicodeNormalization,
};

pub const UP_SUFFIX: &str = ".up.sql";
pub const DOWN_SUFFIX: &str = ".down.sql";

/// A versioned change-set, either read from disk or from the ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Migration {
    pub version: u64,
    pub name: String,
    pub up: String,
    pub down: String,
}

impl Migration {
    pub fn new(version: u64, name: impl Into<String>, up: impl Into<String>, down: impl Into<String>) -> Self {
        Self { version, name: name.into(), up: up.into(), down: down.into() }
    }

    /// Copy with both bodies passed through [`normalize_body`].
    pub fn normalized(&self) -> Self {
        Self {
            version: self.version,
            name: self.name.clone(),
            up: normalize_body(&self.up),
            down: normalize_body(&self.down),
        }
    }

    /// True if either body differs after normalization.
    pub fn content_differs(&self, other: &Migration) -> bool {
        normalize_body(&self.up) != normalize_body(&other.up)
            || normalize_body(&self.down) != normalize_body(&other.down)
    }

    pub fn up_file_name(&self) -> String {
        format!("{}{}", self.name, UP_SUFFIX)
    }

    pub fn down_file_name(&self) -> String {
        format!("{}{}", self.name, DOWN_SUFFIX)
    }

    pub fn body(&self, direction: Direction) -> &str {
        match direction {
            | Direction::Up => &self.up,
            | Direction::Down => &self.down,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Up,
    Down,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            | Direction::Up => f.write_str("up"),
            | Direction::Down => f.write_str("down"),
        }
    }
}

/// How many migrations a bulk up/down may touch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Steps {
    Count(usize),
    Unlimited,
}

impl Steps {
    /// Number of items to take out of `available`.
    pub fn limit(self, available: usize) -> usize {
        match self {
            | Steps::Count(n) => n.min(available),
            | Steps::Unlimited => available,
        }
    }
}

impl FromStr for Steps {
    type Err = MigrateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            | "all" | "unlimited" | "-1" => Ok(Steps::Unlimited),
            | other => other
                .parse::<usize>()
                .map(Steps::Count)
                .map_err(|_| MigrateError::configuration(format!("invalid step count '{}'", other))),
        }
    }
}

/// Trim and NFC-normalize a body. Everything that compares bodies goes through here.
pub fn normalize_body(text: &str) -> String {
    text.trim().nfc().collect()
}

/// A parsed `<version>_<name>.<up|down>.sql` file name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileName {
    /// File name without the direction suffix; this becomes [`Migration::name`].
    pub stem: String,
    pub version: u64,
    pub direction: Direction,
}

impl FileName {
    /// `Ok(None)` for files that are not migration fragments at all. Fragments whose
    /// version token does not parse are an error.
    pub fn parse(file_name: &str) -> MigrateResult<Option<Self>> {
        let (stem, direction) = if let Some(stem) = file_name.strip_suffix(UP_SUFFIX) {
            (stem, Direction::Up)
        } else if let Some(stem) = file_name.strip_suffix(DOWN_SUFFIX) {
            (stem, Direction::Down)
        } else {
            return Ok(None);
        };
        if stem.is_empty() || stem.contains('.') {
            return Ok(None);
        }
        let version = parse_version(stem, file_name)?;
        Ok(Some(Self { stem: stem.to_string(), version, direction }))
    }
}

/// Parse the leading `_`-delimited token of a stem as the version.
pub fn parse_version(stem: &str, origin: &str) -> MigrateResult<u64> {
    let token = stem.split('_').next().unwrap_or_default();
    if token.is_empty() || !token.chars().all(|c| c.is_ascii_digit()) {
        return Err(MigrateError::InvalidVersionFormat {
            file: origin.to_string(),
            reason: format!("'{}' is not an unsigned integer", token),
        });
    }
    token.parse::<u64>().map_err(|e| MigrateError::InvalidVersionFormat {
        file: origin.to_string(),
        reason: e.to_string(),
    })
}

/// Validate the human part of a new migration name.
pub fn validate_migration_name(name: &str) -> MigrateResult<()> {
    let re = fancy_regex::Regex::new("^[a-z0-9][a-z0-9_]+$")
        .map_err(|e| MigrateError::configuration(e.to_string()))?;
    match re.is_match(name) {
        | Ok(true) => Ok(()),
        | _ => Err(MigrateError::InvalidMigrationName(name.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_up_and_down() {
        let up = FileName::parse("1000000001_init.up.sql").unwrap().unwrap();
        assert_eq!(up.version, 1000000001);
        assert_eq!(up.stem, "1000000001_init");
        assert_eq!(up.direction, Direction::Up);

        let down = FileName::parse("1000000001_init.down.sql").unwrap().unwrap();
        assert_eq!(down.direction, Direction::Down);
    }

    #[test]
    fn test_parse_ignores_other_files() {
        assert!(FileName::parse("README.md").unwrap().is_none());
        assert!(FileName::parse("seeds.sql").unwrap().is_none());
        assert!(FileName::parse("1000000001_a.b.up.sql").unwrap().is_none());
    }

    #[test]
    fn test_parse_rejects_bad_version() {
        let err = FileName::parse("notanumber_init.up.sql").unwrap_err();
        assert!(matches!(err, MigrateError::InvalidVersionFormat { .. }));

        let err = FileName::parse("+5_init.up.sql").unwrap_err();
        assert!(matches!(err, MigrateError::InvalidVersionFormat { .. }));

        let err = FileName::parse("99999999999999999999999_big.down.sql").unwrap_err();
        assert!(matches!(err, MigrateError::InvalidVersionFormat { .. }));
    }

    #[test]
    fn test_normalize_body() {
        // "e" + combining acute composes to a single code point
        assert_eq!(normalize_body("  cafe\u{301};\n\n"), "caf\u{e9};");
        assert_eq!(normalize_body("\tselect 1;  "), "select 1;");
    }

    #[test]
    fn test_content_differs_ignores_surrounding_whitespace() {
        let a = Migration::new(1, "1_a", "select 1;", "select 2;");
        let b = Migration::new(1, "1_a", "select 1;\n", "  select 2;");
        assert!(!a.content_differs(&b));

        let c = Migration::new(1, "1_a", "select 3;", "select 2;");
        assert!(a.content_differs(&c));
    }

    #[test]
    fn test_steps() {
        assert_eq!("all".parse::<Steps>().unwrap(), Steps::Unlimited);
        assert_eq!("-1".parse::<Steps>().unwrap(), Steps::Unlimited);
        assert_eq!("3".parse::<Steps>().unwrap(), Steps::Count(3));
        assert!("three".parse::<Steps>().is_err());

        assert_eq!(Steps::Count(3).limit(2), 2);
        assert_eq!(Steps::Count(1).limit(5), 1);
        assert_eq!(Steps::Unlimited.limit(5), 5);
    }

    #[test]
    fn test_validate_migration_name() {
        assert!(validate_migration_name("create_users").is_ok());
        assert!(validate_migration_name("Create-Users").is_err());
        assert!(validate_migration_name("_x").is_err());
    }
}
