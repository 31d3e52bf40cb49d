use crate::currency::Currency;
use crate::ledger::{MonetaryRecord, RecordKind};
use crate::plans::{NewSavingPlan, SavingPlan};
use crate::settings::UserCurrencySettings;
use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::types::{Type, Value};
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};
use tracing::debug;

// ============================================================================
// USERS
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub name: String,
    pub email: String,
    pub phone: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    /// Signup category: "Milky" or "Mocha"
    pub category: String,
    pub is_verified: bool,
    pub profile_picture: Option<String>,
    pub default_avatar: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewUser {
    pub name: String,
    pub email: String,
    pub phone: String,
    pub password_hash: String,
    pub category: String,
}

impl NewUser {
    pub fn default_avatar(&self) -> &'static str {
        if self.category == crate::settings::INR_SIGNUP_CATEGORY {
            "pic3"
        } else {
            "pic4"
        }
    }
}

// ============================================================================
// RECORDS
// ============================================================================

/// A record about to be inserted; amount already in its storage currency
#[derive(Debug, Clone)]
pub struct NewRecord {
    pub kind: RecordKind,
    pub label: String,
    pub amount: f64,
    pub currency: Currency,
    pub occurred_on: NaiveDate,
    pub notes: Option<String>,
    pub expense_type: Option<String>,
}

/// Optional narrowing for record listings
#[derive(Debug, Clone, Default)]
pub struct RecordFilter {
    /// Only applied together with `year`
    pub month: Option<u32>,
    pub year: Option<i32>,
    /// Category for expenses, source for incomes
    pub label: Option<String>,
    /// Ignored for incomes
    pub expense_type: Option<String>,
}

impl RecordFilter {
    /// LIKE pattern for the date column, if any
    fn date_pattern(&self) -> Option<String> {
        match (self.month, self.year) {
            (Some(month), Some(year)) => Some(format!("{:04}-{:02}%", year, month)),
            (None, Some(year)) => Some(format!("{:04}%", year)),
            _ => None,
        }
    }
}

struct RecordTable {
    table: &'static str,
    label_col: &'static str,
    date_col: &'static str,
    expense_type_col: &'static str,
}

fn record_table(kind: RecordKind) -> RecordTable {
    match kind {
        RecordKind::Expense => RecordTable {
            table: "expenses",
            label_col: "category",
            date_col: "expense_date",
            expense_type_col: "expense_type",
        },
        RecordKind::Income => RecordTable {
            table: "incomes",
            label_col: "source",
            date_col: "income_date",
            expense_type_col: "NULL",
        },
    }
}

// ============================================================================
// SCHEMA
// ============================================================================

pub fn setup_database(conn: &Connection) -> Result<()> {
    // WAL for crash recovery; in-memory databases report "memory" and that's fine
    conn.pragma_update(None, "journal_mode", "WAL")?;
    conn.pragma_update(None, "foreign_keys", "ON")?;

    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS users (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL,
            email TEXT UNIQUE NOT NULL,
            phone TEXT NOT NULL,
            password_hash TEXT NOT NULL,
            category TEXT NOT NULL,
            is_verified INTEGER NOT NULL DEFAULT 0,
            profile_picture TEXT,
            default_avatar TEXT,
            created_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS expenses (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            user_id INTEGER NOT NULL REFERENCES users(id),
            category TEXT NOT NULL,
            amount REAL NOT NULL,
            currency TEXT DEFAULT 'USD',
            expense_date TEXT NOT NULL,
            notes TEXT,
            expense_type TEXT DEFAULT 'additional',
            created_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS incomes (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            user_id INTEGER NOT NULL REFERENCES users(id),
            source TEXT NOT NULL,
            amount REAL NOT NULL,
            currency TEXT DEFAULT 'USD',
            income_date TEXT NOT NULL,
            notes TEXT,
            created_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS settings (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            user_id INTEGER UNIQUE NOT NULL REFERENCES users(id),
            currency TEXT NOT NULL DEFAULT 'USD',
            usd_to_inr_rate REAL NOT NULL,
            created_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS saving_plans (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            user_id INTEGER NOT NULL REFERENCES users(id),
            category TEXT NOT NULL,
            amount REAL NOT NULL,
            month INTEGER NOT NULL,
            year INTEGER NOT NULL,
            created_at TEXT NOT NULL
        );


        CREATE INDEX IF NOT EXISTS idx_expenses_user_date ON expenses(user_id, expense_date);
        CREATE INDEX IF NOT EXISTS idx_incomes_user_date ON incomes(user_id, income_date);
        CREATE INDEX IF NOT EXISTS idx_plans_user_period ON saving_plans(user_id, year, month);",
    )
    .context("Failed to create schema")?;

    Ok(())
}

fn parse_timestamp(idx: usize, raw: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn parse_day(idx: usize, raw: &str) -> rusqlite::Result<NaiveDate> {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

// ============================================================================
// USER QUERIES
// ============================================================================

const USER_COLUMNS: &str = "id, name, email, phone, password_hash, category, is_verified,
                            profile_picture, default_avatar, created_at";

fn user_from_row(row: &Row) -> rusqlite::Result<User> {
    let created_at: String = row.get(9)?;
    Ok(User {
        id: row.get(0)?,
        name: row.get(1)?,
        email: row.get(2)?,
        phone: row.get(3)?,
        password_hash: row.get(4)?,
        category: row.get(5)?,
        is_verified: row.get(6)?,
        profile_picture: row.get(7)?,
        default_avatar: row.get(8)?,
        created_at: parse_timestamp(9, &created_at)?,
    })
}

/// Insert a user. Returns `None` when the email is already registered.
pub fn create_user(conn: &Connection, new_user: &NewUser) -> Result<Option<User>> {
    let result = conn.execute(
        "INSERT INTO users (name, email, phone, password_hash, category, is_verified,
                            default_avatar, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, 0, ?6, ?7)",
        params![
            new_user.name,
            new_user.email,
            new_user.phone,
            new_user.password_hash,
            new_user.category,
            new_user.default_avatar(),
            Utc::now().to_rfc3339(),
        ],
    );

    match result {
        Ok(_) => {}
        Err(rusqlite::Error::SqliteFailure(err, _))
            if err.code == rusqlite::ErrorCode::ConstraintViolation =>
        {
            debug!(email = %new_user.email, "email already registered");
            return Ok(None);
        }
        Err(e) => return Err(e.into()),
    }

    find_user_by_id(conn, conn.last_insert_rowid())
}

pub fn find_user_by_email(conn: &Connection, email: &str) -> Result<Option<User>> {
    let sql = format!("SELECT {} FROM users WHERE email = ?1", USER_COLUMNS);
    let user = conn.query_row(&sql, [email], user_from_row).optional()?;
    Ok(user)
}

pub fn find_user_by_id(conn: &Connection, id: i64) -> Result<Option<User>> {
    let sql = format!("SELECT {} FROM users WHERE id = ?1", USER_COLUMNS);
    let user = conn.query_row(&sql, [id], user_from_row).optional()?;
    Ok(user)
}

pub fn mark_user_verified(conn: &Connection, user_id: i64) -> Result<()> {
    conn.execute("UPDATE users SET is_verified = 1 WHERE id = ?1", [user_id])?;
    Ok(())
}

/// Update whichever profile fields are given
pub fn update_user_profile(
    conn: &Connection,
    user_id: i64,
    name: Option<&str>,
    profile_picture: Option<&str>,
) -> Result<()> {
    conn.execute(
        "UPDATE users
         SET name = COALESCE(?1, name),
             profile_picture = COALESCE(?2, profile_picture)
         WHERE id = ?3",
        params![name, profile_picture, user_id],
    )?;
    Ok(())
}

// ============================================================================
// RECORD QUERIES
// ============================================================================

fn record_from_row(kind: RecordKind, row: &Row) -> rusqlite::Result<MonetaryRecord> {
    let currency: Option<String> = row.get(4)?;
    let occurred_on: String = row.get(5)?;
    let created_at: Option<String> = row.get(8)?;

    Ok(MonetaryRecord {
        id: row.get(0)?,
        owner_id: row.get(1)?,
        kind,
        amount: row.get(3)?,
        currency: Currency::from_optional(currency.as_deref()),
        label: row.get(2)?,
        occurred_on: parse_day(5, &occurred_on)?,
        notes: row.get(6)?,
        expense_type: row.get(7)?,
        created_at: created_at.map(|s| parse_timestamp(8, &s)).transpose()?,
    })
}

fn select_records_sql(kind: RecordKind) -> String {
    let t = record_table(kind);
    format!(
        "SELECT id, user_id, {label}, amount, currency, {date}, notes, {etype}, created_at
         FROM {table}",
        label = t.label_col,
        date = t.date_col,
        etype = t.expense_type_col,
        table = t.table,
    )
}

pub fn insert_record(conn: &Connection, owner_id: i64, record: &NewRecord) -> Result<MonetaryRecord> {
    let now = Utc::now().to_rfc3339();
    let date = record.occurred_on.format("%Y-%m-%d").to_string();

    match record.kind {
        RecordKind::Expense => conn.execute(
            "INSERT INTO expenses (user_id, category, amount, currency, expense_date, notes,
                                   expense_type, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                owner_id,
                record.label,
                record.amount,
                record.currency.code(),
                date,
                record.notes,
                record.expense_type.as_deref().unwrap_or("additional"),
                now,
            ],
        )?,
        RecordKind::Income => conn.execute(
            "INSERT INTO incomes (user_id, source, amount, currency, income_date, notes, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                owner_id,
                record.label,
                record.amount,
                record.currency.code(),
                date,
                record.notes,
                now,
            ],
        )?,
    };

    let id = conn.last_insert_rowid();
    let sql = format!("{} WHERE id = ?1", select_records_sql(record.kind));
    let stored = conn.query_row(&sql, [id], |row| record_from_row(record.kind, row))?;
    Ok(stored)
}

/// Records of one kind owned by `owner_id`, newest first
pub fn list_records(
    conn: &Connection,
    owner_id: i64,
    kind: RecordKind,
    filter: &RecordFilter,
) -> Result<Vec<MonetaryRecord>> {
    let t = record_table(kind);
    let mut sql = format!("{} WHERE user_id = ?", select_records_sql(kind));
    let mut args: Vec<Value> = vec![Value::Integer(owner_id)];

    if let Some(pattern) = filter.date_pattern() {
        sql.push_str(&format!(" AND {} LIKE ?", t.date_col));
        args.push(Value::Text(pattern));
    }
    if let Some(label) = &filter.label {
        sql.push_str(&format!(" AND {} = ?", t.label_col));
        args.push(Value::Text(label.clone()));
    }
    if let (RecordKind::Expense, Some(expense_type)) = (kind, &filter.expense_type) {
        sql.push_str(" AND expense_type = ?");
        args.push(Value::Text(expense_type.clone()));
    }
    sql.push_str(&format!(" ORDER BY {} DESC, id DESC", t.date_col));

    debug!(%sql, "listing records");
    let mut stmt = conn.prepare(&sql)?;
    let records = stmt
        .query_map(params_from_iter(args.iter()), |row| record_from_row(kind, row))?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(records)
}

/// Delete a record if `owner_id` owns it. Returns whether anything was removed.
pub fn delete_record(conn: &Connection, owner_id: i64, kind: RecordKind, id: i64) -> Result<bool> {
    let t = record_table(kind);
    let sql = format!("DELETE FROM {} WHERE id = ?1 AND user_id = ?2", t.table);
    let removed = conn.execute(&sql, params![id, owner_id])?;
    if removed > 0 {
        debug!(owner_id, kind = kind.name(), id, "record deleted");
    }
    Ok(removed > 0)
}

// ============================================================================
// SETTINGS
// ============================================================================

pub fn get_settings(conn: &Connection, owner_id: i64) -> Result<Option<UserCurrencySettings>> {
    let settings = conn
        .query_row(
            "SELECT user_id, currency, usd_to_inr_rate FROM settings WHERE user_id = ?1",
            [owner_id],
            |row| {
                let currency: String = row.get(1)?;
                Ok(UserCurrencySettings {
                    owner_id: row.get(0)?,
                    display_currency: Currency::from(currency),
                    usd_to_inr_rate: row.get(2)?,
                })
            },
        )
        .optional()?;
    Ok(settings)
}

pub fn upsert_settings(conn: &Connection, settings: &UserCurrencySettings) -> Result<()> {
    conn.execute(
        "INSERT INTO settings (user_id, currency, usd_to_inr_rate, created_at)
         VALUES (?1, ?2, ?3, ?4)
         ON CONFLICT(user_id) DO UPDATE SET
             currency = excluded.currency,
             usd_to_inr_rate = excluded.usd_to_inr_rate",
        params![
            settings.owner_id,
            settings.display_currency.code(),
            settings.usd_to_inr_rate,
            Utc::now().to_rfc3339(),
        ],
    )?;
    Ok(())
}

// ============================================================================
// SAVING PLANS
// ============================================================================

fn plan_from_row(row: &Row) -> rusqlite::Result<SavingPlan> {
    let created_at: String = row.get(6)?;
    Ok(SavingPlan {
        id: row.get(0)?,
        user_id: row.get(1)?,
        category: row.get(2)?,
        amount: row.get(3)?,
        month: row.get(4)?,
        year: row.get(5)?,
        created_at: parse_timestamp(6, &created_at)?,
    })
}

const PLAN_COLUMNS: &str = "id, user_id, category, amount, month, year, created_at";

pub fn insert_plan(conn: &Connection, owner_id: i64, plan: &NewSavingPlan) -> Result<SavingPlan> {
    conn.execute(
        "INSERT INTO saving_plans (user_id, category, amount, month, year, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            owner_id,
            plan.category,
            plan.amount,
            plan.month,
            plan.year,
            Utc::now().to_rfc3339(),
        ],
    )?;

    let id = conn.last_insert_rowid();
    let sql = format!("SELECT {} FROM saving_plans WHERE id = ?1", PLAN_COLUMNS);
    let stored = conn.query_row(&sql, [id], plan_from_row)?;
    Ok(stored)
}

/// Plans for `owner_id`, latest period first
pub fn list_plans(
    conn: &Connection,
    owner_id: i64,
    month: Option<u32>,
    year: Option<i32>,
) -> Result<Vec<SavingPlan>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM saving_plans
         WHERE user_id = ?1
           AND (?2 IS NULL OR month = ?2)
           AND (?3 IS NULL OR year = ?3)
         ORDER BY year DESC, month DESC, id DESC",
        PLAN_COLUMNS
    ))?;

    let plans = stmt
        .query_map(params![owner_id, month, year], plan_from_row)?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(plans)
}

pub fn delete_plan(conn: &Connection, owner_id: i64, id: i64) -> Result<bool> {
    let removed = conn.execute(
        "DELETE FROM saving_plans WHERE id = ?1 AND user_id = ?2",
        params![id, owner_id],
    )?;
    Ok(removed > 0)
}

/// Remove every expense, income and saving plan owned by `owner_id`.
/// The user account and settings are kept.
pub fn delete_user_data(conn: &Connection, owner_id: i64) -> Result<usize> {
    let tx = conn.unchecked_transaction()?;

    let mut removed = 0;
    for table in ["expenses", "incomes", "saving_plans"] {
        removed += tx.execute(&format!("DELETE FROM {} WHERE user_id = ?1", table), [owner_id])?;
    }

    tx.commit()?;
    Ok(removed)
}
