//! The squash archive: many applied migrations folded into one file.
//!
//! One migration per line, `name \t base64(up) \t base64(down)`, lines joined by `\n`.
//! Bodies are base64 so they never contain a separator. Names are written verbatim;
//! a name containing a separator is refused on encode.

use {
    crate::core::{
        error::{MigrateError, MigrateResult},
        migration::{normalize_body, parse_version, Migration},
    },
    base64::{engine::general_purpose::STANDARD, Engine as _},
};

/// Reserved file name inside the migration directory.
pub const SQUASH_FILE_NAME: &str = "squashed.pqm";

const FIELD_SEPARATOR: char = '\t';
const LINE_SEPARATOR: char = '\n';

/// Serialize migrations into archive text, in the order given.
pub fn encode(migrations: &[Migration]) -> MigrateResult<String> {
    let mut out = String::new();
    for (idx, m) in migrations.iter().enumerate() {
        if m.name.contains(FIELD_SEPARATOR) || m.name.contains(LINE_SEPARATOR) {
            return Err(MigrateError::corrupt_squash(
                idx + 1,
                format!("migration name '{}' contains an archive separator", m.name.escape_debug()),
            ));
        }
        out.push_str(&m.name);
        out.push(FIELD_SEPARATOR);
        out.push_str(&STANDARD.encode(m.up.as_bytes()));
        out.push(FIELD_SEPARATOR);
        out.push_str(&STANDARD.encode(m.down.as_bytes()));
        out.push(LINE_SEPARATOR);
    }
    Ok(out)
}

/// Parse archive text. Bodies are normalized the same way loose files are.
pub fn decode(text: &str) -> MigrateResult<Vec<Migration>> {
    let mut migrations = Vec::new();
    for (idx, line) in text.split(LINE_SEPARATOR).enumerate() {
        let line = line.strip_suffix('\r').unwrap_or(line);
        if line.is_empty() {
            continue;
        }
        let line_no = idx + 1;
        let fields: Vec<&str> = line.split(FIELD_SEPARATOR).collect();
        let [name, up, down] = fields.as_slice() else {
            return Err(MigrateError::corrupt_squash(
                line_no,
                format!("expected 3 fields, got {}", fields.len()),
            ));
        };
        let version = parse_version(name, SQUASH_FILE_NAME)
            .map_err(|e| MigrateError::corrupt_squash(line_no, e.to_string()))?;
        migrations.push(Migration {
            version,
            name: name.to_string(),
            up: normalize_body(&decode_body(up, line_no)?),
            down: normalize_body(&decode_body(down, line_no)?),
        });
    }
    Ok(migrations)
}

fn decode_body(field: &str, line_no: usize) -> MigrateResult<String> {
    let bytes = STANDARD
        .decode(field.trim())
        .map_err(|e| MigrateError::corrupt_squash(line_no, format!("invalid base64: {}", e)))?;
    String::from_utf8(bytes).map_err(|e| MigrateError::corrupt_squash(line_no, format!("body is not utf-8: {}", e)))
}
