use core::fmt::{Display, Formatter, Result as FmtResult};
use serde::{Deserialize, Serialize};

/// Characters that cannot appear in an archive file name on at least one supported platform.
const PATH_HOSTILE: &[char] = &['/', '\\', ':', '*', '?', '"', '<', '>', '|'];

/// Addresses a base table within a database.
///
/// Ordering is lexicographic by (schema, table), which is the enumeration order of a backup run.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TableId {
    pub schema: String,

    #[serde(rename = "table")]
    pub name: String,
}

impl TableId {
    pub fn new(schema: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            schema: schema.into(),
            name: name.into(),
        }
    }

    /// The bracket-quoted, two-part name usable in T-SQL.
    #[must_use]
    pub fn quoted(&self) -> String {
        format!("{}.{}", quote_ident(&self.schema), quote_ident(&self.name))
    }

    /// The name of this table's archive file inside a run directory.
    #[must_use]
    pub fn archive_file_name(&self) -> String {
        format!("{}_{}.json.gz", sanitize_file_name(&self.schema), sanitize_file_name(&self.name))
    }
}

impl Display for TableId {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "{}.{}", self.schema, self.name)
    }
}

/// Quote an identifier for T-SQL, doubling any closing bracket.
#[must_use]
pub fn quote_ident(ident: &str) -> String {
    format!("[{}]", ident.replace(']', "]]"))
}

/// Replace characters that cannot appear in a file name.
pub(crate) fn sanitize_file_name(part: &str) -> String {
    part.chars()
        .map(|c| if PATH_HOSTILE.contains(&c) || c.is_control() { '_' } else { c })
        .collect()
}
