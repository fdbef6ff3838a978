use chrono::{NaiveDateTime, NaiveTime, Utc};
use sqlx::{MySql, MySqlPool, query::Query, mysql::MySqlArguments};

use crate::auth::auth::AuthUser;
use crate::error::{AppError, AppResult};

/// ===============================
/// SQL bindable value enum
/// ===============================
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    String(String),
    Time(NaiveTime),
    DateTime(NaiveDateTime),
    Null,
}

impl SqlValue {
    fn bind_to<'q>(
        self,
        query: Query<'q, MySql, MySqlArguments>,
    ) -> Query<'q, MySql, MySqlArguments> {
        match self {
            SqlValue::String(v) => query.bind(v),
            SqlValue::Time(v) => query.bind(v),
            SqlValue::DateTime(v) => query.bind(v),
            SqlValue::Null => query.bind(None::<String>),
        }
    }
}

/// One `column = ?` assignment taken from a typed update payload.
pub type Change = (&'static str, SqlValue);

/// Typed partial-update payloads list the columns they touch.
pub trait UpdatePayload {
    /// Only fields present in the request, in declaration order.
    fn changes(&self) -> AppResult<Vec<Change>>;
}

/// Server-side audit values appended to every update.
#[derive(Debug, Clone, PartialEq)]
pub struct AuditStamp {
    pub at: NaiveDateTime,
    pub by: String,
}

impl AuditStamp {
    pub fn now(actor: &AuthUser) -> Self {
        Self {
            at: Utc::now().naive_utc(),
            by: actor.employee_id.clone(),
        }
    }

    fn changes(&self) -> [(&'static str, SqlValue); 2] {
        [
            ("updated_at", SqlValue::DateTime(self.at)),
            ("updated_by", SqlValue::String(self.by.clone())),
        ]
    }
}

/// ===============================
/// SQL update container
/// ===============================
#[derive(Debug)]
pub struct SqlUpdate {
    pub sql: String,
    pub values: Vec<SqlValue>,
}

/// ===============================
/// Build dynamic UPDATE SQL
/// ===============================
///
/// Any column outside `whitelist` rejects the whole update. Audit columns are
/// appended after the payload and the target id is bound last, scoped to rows
/// that are not soft-deleted.
pub fn build_update_sql(
    table: &str,
    changes: Vec<(&str, SqlValue)>,
    whitelist: &[&str],
    audit: &AuditStamp,
    id: &str,
) -> AppResult<SqlUpdate> {
    if changes.is_empty() {
        return Err(AppError::validation("No fields provided for update"));
    }

    if let Some((column, _)) = changes.iter().find(|(c, _)| !whitelist.contains(c)) {
        return Err(AppError::FieldNotAllowed(column.to_string()));
    }

    let mut set_clauses = Vec::with_capacity(changes.len() + 2);
    let mut values = Vec::with_capacity(changes.len() + 3);

    for (column, value) in changes {
        set_clauses.push(format!("{} = ?", column));
        values.push(value);
    }

    for (column, value) in audit.changes() {
        set_clauses.push(format!("{} = ?", column));
        values.push(value);
    }

    let sql = format!(
        "UPDATE {} SET {} WHERE id = ? AND deleted_at IS NULL",
        table,
        set_clauses.join(", ")
    );

    // WHERE id = ?
    values.push(SqlValue::String(id.to_string()));

    Ok(SqlUpdate { sql, values })
}

/// ===============================
/// Execute the update
/// ===============================
///
/// Returns rows affected; zero means the row is missing or soft-deleted.
pub async fn execute_update(pool: &MySqlPool, update: SqlUpdate) -> Result<u64, sqlx::Error> {
    let mut query = sqlx::query(&update.sql);

    for value in update.values {
        query = value.bind_to(query);
    }

    let result = query.execute(pool).await?;
    Ok(result.rows_affected())
}

/// Marks a row deleted instead of removing it.
pub async fn soft_delete(
    pool: &MySqlPool,
    table: &str,
    id: &str,
    actor: &AuthUser,
) -> Result<u64, sqlx::Error> {
    let sql = format!(
        "UPDATE {} SET deleted_at = ?, deleted_by = ? WHERE id = ? AND deleted_at IS NULL",
        table
    );

    let result = sqlx::query(&sql)
        .bind(Utc::now().naive_utc())
        .bind(&actor.employee_id)
        .bind(id)
        .execute(pool)
        .await?;

    Ok(result.rows_affected())
}

/// Unique-key violation (MySQL 1062). Foreign-key failures share SQLSTATE
/// 23000 and are not matched.
pub fn is_duplicate_key(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db_err) => db_err.is_unique_violation(),
        _ => false,
    }
}

/// Deadlock victim (MySQL 1213, SQLSTATE 40001); the transaction was rolled back.
pub fn is_deadlock(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db_err) => db_err.code().as_deref() == Some("40001"),
        _ => false,
    }
}
