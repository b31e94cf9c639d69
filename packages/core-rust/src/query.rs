//! Query annotation with tags.
//!
//! The data-access layer implements [`Taggable`] for its query type; the
//! blanket [`QueryTagExt`] then provides `tag_with_context` and
//! `tag_with_scope`. Tags are opaque to this crate: the query engine decides
//! how an annotation shows up in the emitted SQL. [`SqlQuery`] is a minimal
//! engine-agnostic query that renders annotations as `--` comments.

use std::fmt;

use crate::metadata::Metadata;
use crate::scope;
use crate::tag::Tag;

/// A query that can carry free-form annotations.
pub trait Taggable: Sized {
    /// Attaches `annotation` and returns the annotated query.
    #[must_use]
    fn tag_with(self, annotation: String) -> Self;
}

/// Tag-aware annotation helpers for every [`Taggable`] query.
pub trait QueryTagExt: Taggable {
    /// Annotates the query with a tag built from `name` and `metadata`.
    ///
    /// Metadata of the current scope is merged in for keys the caller did not
    /// supply, so request-level context (correlation id, user) rides along
    /// with explicit query-level context.
    #[must_use]
    fn tag_with_context(self, name: impl Into<String>, metadata: impl Into<Metadata>) -> Self {
        let mut tag = Tag::with_metadata(name, metadata);
        if let Some(scope_tag) = scope::current() {
            tag.merge_missing(&scope_tag.metadata);
        }
        self.tag_with(tag.encode())
    }

    /// Annotates the query with the current scope's tag, or returns it
    /// unchanged when no scope is active.
    #[must_use]
    fn tag_with_scope(self) -> Self {
        match scope::current() {
            Some(tag) => self.tag_with(tag.encode()),
            None => self,
        }
    }
}

impl<T: Taggable> QueryTagExt for T {}

// ---------------------------------------------------------------------------
// SqlQuery
// ---------------------------------------------------------------------------

/// SQL text plus the annotations attached to it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SqlQuery {
    sql: String,
    tags: Vec<String>,
}

impl SqlQuery {
    #[must_use]
    pub fn new(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            tags: Vec::new(),
        }
    }

    /// The statement without annotations.
    #[must_use]
    pub fn sql(&self) -> &str {
        &self.sql
    }

    /// Annotations in attachment order.
    #[must_use]
    pub fn tags(&self) -> &[String] {
        &self.tags
    }

    /// Renders annotations as line comments ahead of the statement.
    ///
    /// ```
    /// use sqltag_core::{QueryTagExt, SqlQuery};
    ///
    /// let query = SqlQuery::new("SELECT * FROM Products").tag_with_context("Products", [("Feature", "Catalog")]);
    /// assert_eq!(query.to_sql(), "-- Products [Feature=Catalog]\n\nSELECT * FROM Products");
    /// ```
    #[must_use]
    pub fn to_sql(&self) -> String {
        self.to_string()
    }
}

impl Taggable for SqlQuery {
    fn tag_with(mut self, annotation: String) -> Self {
        self.tags.push(annotation);
        self
    }
}

impl fmt::Display for SqlQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.tags.is_empty() {
            return f.write_str(&self.sql);
        }
        for tag in &self.tags {
            for line in tag.lines() {
                writeln!(f, "-- {line}")?;
            }
        }
        writeln!(f)?;
        f.write_str(&self.sql)
    }
}
