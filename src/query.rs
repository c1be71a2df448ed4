//! Typed list queries.
//!
//! A [`Query`] is a conjunction of [`Clause`]s. The HTTP client renders it to
//! the Drive `q` syntax; the in-memory store evaluates it directly.
//!
//! ```
//! use vdrive::query::Query;
//!
//! let q = Query::new()
//!     .name_contains("report")
//!     .in_parent("folder123")
//!     .not_trashed();
//! assert_eq!(
//!     q.to_query_string(),
//!     "name contains 'report' and 'folder123' in parents and trashed = false"
//! );
//! ```

use crate::entity::FOLDER_MIME_TYPE;

/// One condition of a list query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Clause {
    NameEq(String),
    NameContains(String),
    InParent(String),
    MimeTypeEq(String),
    MimeTypeNe(String),
    NotTrashed,
}

impl Clause {
    fn render(&self) -> String {
        match self {
            Clause::NameEq(v) => format!("name = '{}'", escape(v)),
            Clause::NameContains(v) => format!("name contains '{}'", escape(v)),
            Clause::InParent(v) => format!("'{}' in parents", escape(v)),
            Clause::MimeTypeEq(v) => format!("mimeType = '{}'", escape(v)),
            Clause::MimeTypeNe(v) => format!("mimeType != '{}'", escape(v)),
            Clause::NotTrashed => "trashed = false".to_string(),
        }
    }
}

/// Conjunction of clauses.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Query {
    clauses: Vec<Clause>,
}

impl Query {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn name_eq(mut self, name: &str) -> Self {
        self.clauses.push(Clause::NameEq(name.to_string()));
        self
    }

    pub fn name_contains(mut self, fragment: &str) -> Self {
        self.clauses.push(Clause::NameContains(fragment.to_string()));
        self
    }

    pub fn in_parent(mut self, parent_id: &str) -> Self {
        self.clauses.push(Clause::InParent(parent_id.to_string()));
        self
    }

    pub fn mime_type_eq(mut self, mime_type: &str) -> Self {
        self.clauses.push(Clause::MimeTypeEq(mime_type.to_string()));
        self
    }

    pub fn mime_type_ne(mut self, mime_type: &str) -> Self {
        self.clauses.push(Clause::MimeTypeNe(mime_type.to_string()));
        self
    }

    /// Only folders.
    pub fn folders_only(self) -> Self {
        self.mime_type_eq(FOLDER_MIME_TYPE)
    }

    /// Exclude folders.
    pub fn exclude_folders(self) -> Self {
        self.mime_type_ne(FOLDER_MIME_TYPE)
    }

    pub fn not_trashed(mut self) -> Self {
        self.clauses.push(Clause::NotTrashed);
        self
    }

    pub fn clauses(&self) -> &[Clause] {
        &self.clauses
    }

    pub fn is_empty(&self) -> bool {
        self.clauses.is_empty()
    }

    /// Render to the Drive `q` parameter.
    pub fn to_query_string(&self) -> String {
        self.clauses
            .iter()
            .map(Clause::render)
            .collect::<Vec<_>>()
            .join(" and ")
    }
}

impl std::fmt::Display for Query {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.to_query_string())
    }
}

/// Escape a value for use inside single quotes.
pub fn escape(value: &str) -> String {
    value.replace('\\', "\\\\").replace('\'', "\\'")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_conjunction() {
        let q = Query::new().name_eq("a.txt").in_parent("root").not_trashed();
        assert_eq!(
            q.to_query_string(),
            "name = 'a.txt' and 'root' in parents and trashed = false"
        );
    }

    #[test]
    fn escapes_quotes_and_backslashes() {
        let q = Query::new().name_eq("it's\\here");
        assert_eq!(q.to_query_string(), "name = 'it\\'s\\\\here'");
    }

    #[test]
    fn folder_filters() {
        let q = Query::new().folders_only();
        assert_eq!(
            q.to_query_string(),
            format!("mimeType = '{}'", FOLDER_MIME_TYPE)
        );
        let q = Query::new().exclude_folders();
        assert!(q.to_query_string().starts_with("mimeType != "));
    }

    #[test]
    fn empty_query() {
        let q = Query::new();
        assert!(q.is_empty());
        assert_eq!(q.to_query_string(), "");
    }
}
