//! Sanitizer for anything that reaches SQL text.
//!
//! Values never reach SQL text: they are bound parameters. Identifiers
//! (database, table, column) are only interpolated after they have been
//! matched against the introspected schema and backtick-quoted.

use crate::error::AppError;

/// Strips bytes that have no business in a path segment or filter: NUL, CR,
/// LF and SUB (0x1a).
pub fn scrub(s: &str) -> String {
    s.chars()
        .filter(|c| !matches!(c, '\0' | '\n' | '\r' | '\u{1a}'))
        .collect()
}

/// Accepts `name` only if it is one of `known` (exact match).
pub fn allow<'a, I>(name: &str, known: I) -> Result<(), AppError>
where
    I: IntoIterator<Item = &'a str>,
{
    if known.into_iter().any(|k| k == name) {
        Ok(())
    } else {
        Err(AppError::ColumnNotFound(name.to_string()))
    }
}

/// Quote identifier for MySQL.
pub fn quote_ident(s: &str) -> String {
    format!("`{}`", s.replace('`', "``"))
}

/// Fully qualified table name.
pub fn qualified(database: &str, table: &str) -> String {
    format!("{}.{}", quote_ident(database), quote_ident(table))
}
