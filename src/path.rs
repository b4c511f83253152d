//! Path resolver: `{prefix}/{database}[/{table}[/{key}]]` into a resource descriptor.
//!
//! Segments are percent-encoded. A key value containing `/` is sent as `%2F`;
//! raw `/` after the table segment is still accepted and rejoined, so
//! `/orm/db/files/a/b.txt` addresses the key `a/b.txt`. Composite keys are
//! `:`-joined in primary-column order; a `:` inside a key part is `%3A`.
//!
//! A key may arrive wrapped in one pair of escaped quotes (`\"…\"`) and/or
//! one pair of plain quotes (`"…"`), in that order. Both are peeled off before
//! the key is used, so `/orm/db/files/%22a.txt%22` addresses `a.txt`.

use crate::error::AppError;
use crate::sanitize::scrub;
use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, CONTROLS};

/// Characters escaped when assembling a path segment.
const SEGMENT: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'/')
    .add(b':')
    .add(b'?')
    .add(b'`');

/// Operation class selected by the number of path segments.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Depth {
    Database,
    Table,
    Row,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResourceDescriptor {
    pub database: String,
    /// Empty at database depth.
    pub table: String,
    /// Empty unless the path addresses a single row.
    pub key_parts: Vec<String>,
    depth: Depth,
}

impl ResourceDescriptor {
    pub fn database(database: impl Into<String>) -> Self {
        ResourceDescriptor {
            database: database.into(),
            table: String::new(),
            key_parts: Vec::new(),
            depth: Depth::Database,
        }
    }

    pub fn table(database: impl Into<String>, table: impl Into<String>) -> Self {
        ResourceDescriptor {
            database: database.into(),
            table: table.into(),
            key_parts: Vec::new(),
            depth: Depth::Table,
        }
    }

    pub fn row(database: impl Into<String>, table: impl Into<String>, key_parts: Vec<String>) -> Self {
        ResourceDescriptor {
            database: database.into(),
            table: table.into(),
            key_parts,
            depth: Depth::Row,
        }
    }

    pub fn depth(&self) -> Depth {
        self.depth
    }
}

/// Leading slash ensured, trailing slash dropped. `""` and `"/"` become `""`.
pub fn normalize_prefix(prefix: &str) -> String {
    let trimmed = prefix.trim_end_matches('/');
    if trimmed.is_empty() {
        String::new()
    } else if trimmed.starts_with('/') {
        trimmed.to_string()
    } else {
        format!("/{}", trimmed)
    }
}

fn decode(segment: &str) -> Result<String, AppError> {
    let decoded = percent_decode_str(segment)
        .decode_utf8()
        .map_err(|_| AppError::InvalidPath(format!("segment is not utf-8: {}", segment)))?;
    Ok(scrub(&decoded))
}

fn encode(segment: &str) -> String {
    utf8_percent_encode(segment, SEGMENT).to_string()
}

/// Quote pairs peeled off a key, outermost first.
const KEY_QUOTES: [&str; 2] = ["\\\"", "\""];

fn quoted_by(parts: &[String], marker: &str) -> bool {
    let (Some(first), Some(last)) = (parts.first(), parts.last()) else {
        return false;
    };
    let min = if parts.len() == 1 { 2 * marker.len() } else { marker.len() };
    first.len() >= min && last.len() >= marker.len() && first.starts_with(marker) && last.ends_with(marker)
}

fn unwrap_quoted(parts: &mut [String]) {
    for marker in KEY_QUOTES {
        if !quoted_by(parts, marker) {
            continue;
        }
        let last = parts.len() - 1;
        parts[0].drain(..marker.len());
        let end = parts[last].len() - marker.len();
        parts[last].truncate(end);
    }
}

/// Parse the request path (raw, still percent-encoded) below `prefix`.
pub fn resolve(prefix: &str, path: &str) -> Result<ResourceDescriptor, AppError> {
    let prefix = normalize_prefix(prefix);
    let rest = path
        .strip_prefix(prefix.as_str())
        .ok_or_else(|| AppError::InvalidPath(format!("{} is outside {}", path, prefix)))?;
    if !rest.is_empty() && !rest.starts_with('/') {
        return Err(AppError::InvalidPath(format!("{} is outside {}", path, prefix)));
    }
    let rest = rest.strip_prefix('/').unwrap_or(rest);
    let rest = rest.strip_suffix('/').unwrap_or(rest);
    if rest.is_empty() {
        return Err(AppError::InvalidPath("empty path".into()));
    }

    let segments: Vec<&str> = rest.split('/').collect();
    let database = decode(segments[0])?;
    if database.is_empty() {
        return Err(AppError::InvalidPath("empty database segment".into()));
    }
    if segments.len() == 1 {
        return Ok(ResourceDescriptor::database(database));
    }
    let table = decode(segments[1])?;
    if table.is_empty() {
        return Err(AppError::InvalidPath("empty table segment".into()));
    }
    if segments.len() == 2 {
        return Ok(ResourceDescriptor::table(database, table));
    }

    let key = segments[2..].join("/");
    if key.is_empty() {
        return Err(AppError::InvalidPath("empty key segment".into()));
    }
    let mut key_parts = key.split(':').map(decode).collect::<Result<Vec<_>, _>>()?;
    unwrap_quoted(&mut key_parts);
    Ok(ResourceDescriptor::row(database, table, key_parts))
}

/// Inverse of [`resolve`].
pub fn assemble(prefix: &str, resource: &ResourceDescriptor) -> String {
    let mut out = normalize_prefix(prefix);
    out.push('/');
    out.push_str(&encode(&resource.database));
    if resource.depth == Depth::Database {
        return out;
    }
    out.push('/');
    out.push_str(&encode(&resource.table));
    if resource.depth == Depth::Row {
        out.push('/');
        let parts: Vec<String> = resource.key_parts.iter().map(|p| encode(p)).collect();
        // A key that would be unwrapped on the way in gets one more pair.
        let wrap = KEY_QUOTES.iter().any(|m| quoted_by(&resource.key_parts, m));
        if wrap {
            out.push_str("%22");
        }
        out.push_str(&parts.join(":"));
        if wrap {
            out.push_str("%22");
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn segment_count_selects_depth() {
        assert_eq!(resolve("/orm", "/orm/shop").unwrap(), ResourceDescriptor::database("shop"));
        assert_eq!(
            resolve("/orm", "/orm/shop/products/").unwrap(),
            ResourceDescriptor::table("shop", "products")
        );
        let row = resolve("orm", "/orm/shop/products/7").unwrap();
        assert_eq!(row.depth(), Depth::Row);
        assert_eq!(row.key_parts, vec!["7"]);
    }

    #[test]
    fn composite_keys_split_on_colon() {
        let row = resolve("/orm", "/orm/shop/order_items/5:3").unwrap();
        assert_eq!(row.table, "order_items");
        assert_eq!(row.key_parts, vec!["5", "3"]);
    }

    #[test]
    fn raw_slashes_after_table_belong_to_the_key() {
        let row = resolve("/orm", "/orm/docs/files/a/b/c.txt").unwrap();
        assert_eq!(row.key_parts, vec!["a/b/c.txt"]);
    }

    #[test]
    fn encoded_separators_stay_inside_key_parts() {
        let row = resolve("/orm", "/orm/docs/files/dir%2Fname:12%3A30").unwrap();
        assert_eq!(row.key_parts, vec!["dir/name", "12:30"]);
    }

    #[test]
    fn empty_remainder_is_invalid() {
        assert!(matches!(resolve("/orm", "/orm"), Err(AppError::InvalidPath(_))));
        assert!(matches!(resolve("/orm", "/orm/"), Err(AppError::InvalidPath(_))));
        assert!(matches!(resolve("/orm", "/other/shop"), Err(AppError::InvalidPath(_))));
        assert!(matches!(resolve("/orm", "/ormx/shop"), Err(AppError::InvalidPath(_))));
        assert!(matches!(resolve("/orm", "/orm//products"), Err(AppError::InvalidPath(_))));
    }

    #[test]
    fn control_bytes_are_scrubbed() {
        let row = resolve("/orm", "/orm/shop/products/7%0A").unwrap();
        assert_eq!(row.key_parts, vec!["7"]);
    }

    #[test]
    fn quoted_keys_are_unwrapped() {
        let row = resolve("/orm", "/orm/docs/files/%22a/b.txt%22").unwrap();
        assert_eq!(row.key_parts, vec!["a/b.txt"]);
        let row = resolve("/orm", "/orm/docs/files/%5C%22a/b.txt%5C%22").unwrap();
        assert_eq!(row.key_parts, vec!["a/b.txt"]);
        let row = resolve("/orm", "/orm/docs/files/%5C%22%22a%22%5C%22").unwrap();
        assert_eq!(row.key_parts, vec!["a"]);
        let row = resolve("/orm", "/orm/docs/files/%22a/b:c%22").unwrap();
        assert_eq!(row.key_parts, vec!["a/b", "c"]);
    }

    #[test]
    fn lone_or_unbalanced_quotes_stay() {
        assert_eq!(resolve("/orm", "/orm/docs/files/%22").unwrap().key_parts, vec!["\""]);
        assert_eq!(resolve("/orm", "/orm/docs/files/%22a").unwrap().key_parts, vec!["\"a"]);
        assert_eq!(resolve("/orm", "/orm/docs/files/%5C%22").unwrap().key_parts, vec!["\\\""]);
    }

    #[test]
    fn assemble_then_resolve_round_trips() {
        let cases = vec![
            ResourceDescriptor::database("shop"),
            ResourceDescriptor::table("shop", "products"),
            ResourceDescriptor::row("shop", "products", vec!["7".into()]),
            ResourceDescriptor::row("shop", "order_items", vec!["5".into(), "3".into()]),
            ResourceDescriptor::row("docs", "files", vec!["a/b \"c\".txt".into(), "x:y%z".into()]),
            ResourceDescriptor::row("mixed db", "tbl", vec!["ünïcode?#".into()]),
            ResourceDescriptor::row("docs", "files", vec!["\"quoted\"".into()]),
            ResourceDescriptor::row("docs", "files", vec!["\\\"a".into(), "b\\\"".into()]),
            ResourceDescriptor::row("docs", "files", vec!["\"\"".into()]),
        ];
        for prefix in ["/orm", "orm/", ""] {
            for desc in &cases {
                let path = assemble(prefix, desc);
                assert_eq!(&resolve(prefix, &path).unwrap(), desc, "path {}", path);
            }
        }
    }
}
