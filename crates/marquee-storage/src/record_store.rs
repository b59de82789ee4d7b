// SPDX-FileCopyrightText: 2026 Marquee Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Generic durable record store.
//!
//! A [`RecordStore`] provides CRUD, filtered queries, and age-based bulk
//! deletion over one record family described by the [`Record`] trait. Every
//! statement runs on the database's single background thread.
//!
//! Column names are never taken from callers at runtime: filters, sort keys,
//! and assignments only accept `&'static str` constants, and each one is
//! checked against the family's column list before any SQL is built.

use std::marker::PhantomData;

use marquee_core::{MarqueeError, RelativeTime, Timestamp, now};
use rusqlite::types::Value;
use rusqlite::{OptionalExtension, Row, params_from_iter};
use tracing::debug;

use crate::database::{Database, is_unique_violation, map_tr_err};
use crate::models::{ID, MODIFIED_AT, SortDirection, ts_value};

/// A family of records persisted in one table.
pub trait Record: Clone + Send + Sync + 'static {
    /// Table holding this family.
    const TABLE: &'static str;
    /// Every column except `id`, in the order produced by [`Record::values`].
    const COLUMNS: &'static [&'static str];

    fn id(&self) -> Option<i64>;
    fn set_id(&mut self, id: i64);

    /// Natural key used in error reports (the message uuid).
    fn key(&self) -> &str;

    /// Column values, aligned with [`Record::COLUMNS`].
    fn values(&self) -> Vec<Value>;

    /// Build a record from a row selected as `id, COLUMNS...`.
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self>;

    /// Set `modified_at` (and `created_at` when `created`) to `now`.
    fn stamp(&mut self, now: Timestamp, created: bool);
}

/// Row predicate for queries and bulk operations.
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    /// Matches every row.
    All,
    /// `column = value`.
    Eq(&'static str, Value),
    /// `column IN (values...)`; an empty set matches nothing.
    In(&'static str, Vec<Value>),
    /// Column contains the given substring (case-sensitive).
    Contains(&'static str, String),
    /// Every inner filter matches.
    And(Vec<Filter>),
}

impl Filter {
    /// `column = text`.
    pub fn text(column: &'static str, text: impl Into<String>) -> Self {
        Self::Eq(column, Value::Text(text.into()))
    }

    /// `column IN (texts...)`.
    pub fn any_text<I, S>(column: &'static str, texts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::In(column, texts.into_iter().map(|t| Value::Text(t.into())).collect())
    }

    pub fn contains(column: &'static str, needle: impl Into<String>) -> Self {
        Self::Contains(column, needle.into())
    }

    /// Conjunction of `self` and `other`.
    pub fn and(self, other: Filter) -> Self {
        match (self, other) {
            (Self::All, f) | (f, Self::All) => f,
            (Self::And(mut left), Self::And(right)) => {
                left.extend(right);
                Self::And(left)
            }
            (Self::And(mut left), f) => {
                left.push(f);
                Self::And(left)
            }
            (f, g) => Self::And(vec![f, g]),
        }
    }

    fn columns(&self, out: &mut Vec<&'static str>) {
        match self {
            Self::All => {}
            Self::Eq(c, _) | Self::In(c, _) | Self::Contains(c, _) => out.push(*c),
            Self::And(filters) => filters.iter().for_each(|f| f.columns(out)),
        }
    }

    /// Render as a SQL boolean expression, appending bound values to `params`.
    fn to_sql(&self, params: &mut Vec<Value>) -> String {
        match self {
            Self::All => "1 = 1".to_string(),
            Self::Eq(column, value) => {
                params.push(value.clone());
                format!("{column} = ?")
            }
            Self::In(_, values) if values.is_empty() => "0 = 1".to_string(),
            Self::In(column, values) => {
                params.extend(values.iter().cloned());
                format!("{column} IN ({})", placeholders(values.len()))
            }
            Self::Contains(column, needle) => {
                params.push(Value::Text(needle.clone()));
                format!("instr({column}, ?) > 0")
            }
            Self::And(filters) if filters.is_empty() => "1 = 1".to_string(),
            Self::And(filters) => filters
                .iter()
                .map(|f| format!("({})", f.to_sql(params)))
                .collect::<Vec<_>>()
                .join(" AND "),
        }
    }
}

fn placeholders(n: usize) -> String {
    vec!["?"; n].join(", ")
}

/// CRUD and bulk deletion over one [`Record`] family.
pub struct RecordStore<R> {
    db: Database,
    _family: PhantomData<fn() -> R>,
}

impl<R> Clone for RecordStore<R> {
    fn clone(&self) -> Self {
        Self {
            db: self.db.clone(),
            _family: PhantomData,
        }
    }
}

impl<R: Record> std::fmt::Debug for RecordStore<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecordStore")
            .field("table", &R::TABLE)
            .field("db", &self.db)
            .finish()
    }
}

impl<R: Record> RecordStore<R> {
    pub fn new(db: Database) -> Self {
        Self {
            db,
            _family: PhantomData,
        }
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    /// Persist a new record, stamping `created_at`/`modified_at`.
    ///
    /// Returns the stored record with its assigned `id`, or `DuplicateKey`
    /// when a uniqueness constraint rejects it.
    pub async fn insert(&self, mut record: R) -> Result<R, MarqueeError> {
        record.stamp(now(), true);
        let values = record.values();
        let sql = format!(
            "INSERT INTO {} ({}) VALUES ({})",
            R::TABLE,
            R::COLUMNS.join(", "),
            placeholders(R::COLUMNS.len())
        );
        let id = self
            .db
            .connection()
            .call(move |conn| {
                conn.execute(&sql, params_from_iter(values.iter()))?;
                Ok(conn.last_insert_rowid())
            })
            .await
            .map_err(|e| classify(e, R::TABLE, record.key()))?;
        record.set_id(id);
        debug!(table = R::TABLE, id, key = record.key(), "record inserted");
        Ok(record)
    }

    /// Rewrite every column of an existing record, re-stamping `modified_at`.
    pub async fn update(&self, mut record: R) -> Result<R, MarqueeError> {
        let Some(id) = record.id() else {
            return Err(not_found::<R>(record.key()));
        };
        record.stamp(now(), false);
        let mut values = record.values();
        values.push(Value::Integer(id));
        let assignments = R::COLUMNS
            .iter()
            .map(|c| format!("{c} = ?"))
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!("UPDATE {} SET {assignments} WHERE {ID} = ?", R::TABLE);
        let changed = self
            .db
            .connection()
            .call(move |conn| conn.execute(&sql, params_from_iter(values.iter())))
            .await
            .map_err(|e| classify(e, R::TABLE, record.key()))?;
        if changed == 0 {
            return Err(not_found::<R>(record.key()));
        }
        Ok(record)
    }

    /// Set only the named columns (plus `modified_at`) on matching rows.
    ///
    /// Returns the number of rows changed.
    pub async fn update_columns(
        &self,
        filter: Filter,
        assignments: Vec<(&'static str, Value)>,
    ) -> Result<usize, MarqueeError> {
        for (column, _) in &assignments {
            check_column::<R>(column)?;
        }
        check_filter::<R>(&filter)?;

        let mut set = Vec::with_capacity(assignments.len() + 1);
        let mut params = Vec::with_capacity(assignments.len() + 1);
        for (column, value) in assignments {
            set.push(format!("{column} = ?"));
            params.push(value);
        }
        set.push(format!("{MODIFIED_AT} = ?"));
        params.push(ts_value(&now()));
        let predicate = filter.to_sql(&mut params);
        let sql = format!("UPDATE {} SET {} WHERE {predicate}", R::TABLE, set.join(", "));

        self.execute(sql, params).await
    }

    pub async fn find_by_id(&self, id: i64) -> Result<Option<R>, MarqueeError> {
        let sql = format!("SELECT {} FROM {} WHERE {ID} = ?1", select_list::<R>(), R::TABLE);
        self.db
            .connection()
            .call(move |conn| conn.query_row(&sql, [id], R::from_row).optional())
            .await
            .map_err(map_tr_err)
    }

    /// Every record, ordered by `id`.
    pub async fn find_all(&self) -> Result<Vec<R>, MarqueeError> {
        self.find_where(Filter::All).await
    }

    /// Every record, ordered by `column` (ties broken by `id`).
    pub async fn find_all_sorted_by(
        &self,
        column: &'static str,
        direction: SortDirection,
    ) -> Result<Vec<R>, MarqueeError> {
        self.find_where_sorted_by(Filter::All, column, direction).await
    }

    /// Records matching `filter`, ordered by `id`.
    pub async fn find_where(&self, filter: Filter) -> Result<Vec<R>, MarqueeError> {
        self.find_where_sorted_by(filter, ID, SortDirection::Ascending)
            .await
    }

    pub async fn find_where_sorted_by(
        &self,
        filter: Filter,
        column: &'static str,
        direction: SortDirection,
    ) -> Result<Vec<R>, MarqueeError> {
        check_column::<R>(column)?;
        check_filter::<R>(&filter)?;
        let mut params = Vec::new();
        let predicate = filter.to_sql(&mut params);
        let dir = direction.as_sql();
        let sql = format!(
            "SELECT {} FROM {} WHERE {predicate} ORDER BY {column} {dir}, {ID} {dir}",
            select_list::<R>(),
            R::TABLE
        );
        self.db
            .connection()
            .call(move |conn| {
                let mut stmt = conn.prepare(&sql)?;
                let rows = stmt.query_map(params_from_iter(params.iter()), R::from_row)?;
                let records = rows.collect::<Result<Vec<_>, _>>()?;
                Ok(records)
            })
            .await
            .map_err(map_tr_err)
    }

    pub async fn exists_where(&self, filter: Filter) -> Result<bool, MarqueeError> {
        check_filter::<R>(&filter)?;
        let mut params = Vec::new();
        let predicate = filter.to_sql(&mut params);
        let sql = format!("SELECT EXISTS(SELECT 1 FROM {} WHERE {predicate})", R::TABLE);
        self.db
            .connection()
            .call(move |conn| {
                conn.query_row(&sql, params_from_iter(params.iter()), |row| row.get(0))
            })
            .await
            .map_err(map_tr_err)
    }

    pub async fn count_where(&self, filter: Filter) -> Result<usize, MarqueeError> {
        check_filter::<R>(&filter)?;
        let mut params = Vec::new();
        let predicate = filter.to_sql(&mut params);
        let sql = format!("SELECT COUNT(*) FROM {} WHERE {predicate}", R::TABLE);
        let count: i64 = self
            .db
            .connection()
            .call(move |conn| {
                conn.query_row(&sql, params_from_iter(params.iter()), |row| row.get(0))
            })
            .await
            .map_err(map_tr_err)?;
        Ok(usize::try_from(count).unwrap_or_default())
    }

    /// Row counts grouped by the text value of `column`, sorted by value.
    pub async fn count_grouped_by(
        &self,
        column: &'static str,
    ) -> Result<Vec<(String, usize)>, MarqueeError> {
        check_column::<R>(column)?;
        let sql = format!(
            "SELECT {column}, COUNT(*) FROM {} GROUP BY {column} ORDER BY {column}",
            R::TABLE
        );
        self.db
            .connection()
            .call(move |conn| {
                let mut stmt = conn.prepare(&sql)?;
                let rows = stmt.query_map([], |row| {
                    let value: String = row.get(0)?;
                    let count: i64 = row.get(1)?;
                    Ok((value, usize::try_from(count).unwrap_or_default()))
                })?;
                let groups = rows.collect::<Result<Vec<_>, _>>()?;
                Ok(groups)
            })
            .await
            .map_err(map_tr_err)
    }

    pub async fn delete_by_id(&self, id: i64) -> Result<bool, MarqueeError> {
        let sql = format!("DELETE FROM {} WHERE {ID} = ?", R::TABLE);
        let deleted = self.execute(sql, vec![Value::Integer(id)]).await?;
        Ok(deleted > 0)
    }

    pub async fn delete_where(&self, filter: Filter) -> Result<usize, MarqueeError> {
        check_filter::<R>(&filter)?;
        let mut params = Vec::new();
        let predicate = filter.to_sql(&mut params);
        let sql = format!("DELETE FROM {} WHERE {predicate}", R::TABLE);
        let deleted = self.execute(sql, params).await?;
        debug!(table = R::TABLE, deleted, "bulk delete");
        Ok(deleted)
    }

    /// Delete records whose `modified_at` is strictly before `now + age`.
    pub async fn delete_older_than(&self, age: &RelativeTime) -> Result<usize, MarqueeError> {
        self.delete_older_than_where(age, Filter::All).await
    }

    /// Like [`delete_older_than`](Self::delete_older_than), restricted to `filter`.
    pub async fn delete_older_than_where(
        &self,
        age: &RelativeTime,
        filter: Filter,
    ) -> Result<usize, MarqueeError> {
        let cutoff = age.apply_to(now())?;
        self.delete_modified_before(cutoff, filter).await
    }

    /// Delete matching records whose `modified_at` is strictly before `cutoff`.
    /// A record modified exactly at `cutoff` is kept.
    pub async fn delete_modified_before(
        &self,
        cutoff: Timestamp,
        filter: Filter,
    ) -> Result<usize, MarqueeError> {
        check_filter::<R>(&filter)?;
        let mut params = vec![ts_value(&cutoff)];
        let predicate = filter.to_sql(&mut params);
        let sql = format!(
            "DELETE FROM {} WHERE {MODIFIED_AT} < ? AND ({predicate})",
            R::TABLE
        );
        let deleted = self.execute(sql, params).await?;
        debug!(table = R::TABLE, deleted, cutoff = %cutoff, "aged records deleted");
        Ok(deleted)
    }

    async fn execute(&self, sql: String, params: Vec<Value>) -> Result<usize, MarqueeError> {
        self.db
            .connection()
            .call(move |conn| conn.execute(&sql, params_from_iter(params.iter())))
            .await
            .map_err(map_tr_err)
    }
}

fn select_list<R: Record>() -> String {
    format!("{ID}, {}", R::COLUMNS.join(", "))
}

fn check_column<R: Record>(column: &str) -> Result<(), MarqueeError> {
    if column == ID || R::COLUMNS.contains(&column) {
        Ok(())
    } else {
        Err(MarqueeError::Internal(format!(
            "unknown column `{column}` for table {}",
            R::TABLE
        )))
    }
}

fn check_filter<R: Record>(filter: &Filter) -> Result<(), MarqueeError> {
    let mut columns = Vec::new();
    filter.columns(&mut columns);
    columns.into_iter().try_for_each(check_column::<R>)
}

fn not_found<R: Record>(key: &str) -> MarqueeError {
    MarqueeError::NotFound {
        table: R::TABLE,
        key: key.to_string(),
    }
}

/// Map a write failure, turning uniqueness violations into `DuplicateKey`.
pub(crate) fn classify(
    e: tokio_rusqlite::Error<rusqlite::Error>,
    table: &'static str,
    key: &str,
) -> MarqueeError {
    if is_unique_violation(&e) {
        MarqueeError::DuplicateKey {
            table,
            key: key.to_string(),
        }
    } else {
        map_tr_err(e)
    }
}
