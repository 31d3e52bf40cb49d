//! User-facing operations of the tracker.
//!
//! `Tracker` binds one database connection to the process-wide `Services`
//! (config, tokens, clock, mailer). Token-taking methods authenticate first
//! and then delegate to the `*_for` methods, which the CLI calls directly
//! with a user looked up by email.

use crate::config::AppConfig;
use crate::currency::{ConversionMode, Currency};
use crate::db::{self, NewRecord, NewUser, RecordFilter, User};
use crate::email::Mailer;
use crate::feed::{build_feed, ActivityEntry, DEFAULT_FEED_LIMIT};
use crate::ledger::{summarize, MonetaryRecord, PeriodSummary, RecordKind};
use crate::period::{specified, Clock, Period};
use crate::plans::{summarize_plans, NewSavingPlan, SavingPlan, SavingPlanSummary};
use crate::security::{self, AuthError, IdentityResolver, TokenPurpose, TokenService};
use crate::settings::UserCurrencySettings;
use crate::validation::{
    first_error, require_finite, require_month, require_non_empty, ValidationError,
};
use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};

// ============================================================================
// ERRORS
// ============================================================================

#[derive(Debug)]
pub enum TrackerError {
    Unauthenticated,
    InvalidToken,
    UserNotFound,
    EmailTaken,
    InvalidCredentials,
    NotVerified,
    InvalidVerificationToken,
    NotFound(&'static str),
    Validation(ValidationError),
    Storage(anyhow::Error),
}

impl std::fmt::Display for TrackerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TrackerError::Unauthenticated => write!(f, "Not authenticated"),
            TrackerError::InvalidToken => write!(f, "Invalid token"),
            TrackerError::UserNotFound => write!(f, "User not found"),
            TrackerError::EmailTaken => write!(f, "Email already registered"),
            TrackerError::InvalidCredentials => write!(f, "Invalid email or password"),
            TrackerError::NotVerified => write!(f, "Email not verified"),
            TrackerError::InvalidVerificationToken => {
                write!(f, "Invalid or expired verification token")
            }
            TrackerError::NotFound(what) => write!(f, "{} not found", what),
            TrackerError::Validation(e) => write!(f, "{}", e),
            TrackerError::Storage(e) => write!(f, "Storage error: {:#}", e),
        }
    }
}

impl std::error::Error for TrackerError {}

impl From<ValidationError> for TrackerError {
    fn from(e: ValidationError) -> Self {
        TrackerError::Validation(e)
    }
}

impl From<anyhow::Error> for TrackerError {
    fn from(e: anyhow::Error) -> Self {
        TrackerError::Storage(e)
    }
}

impl From<AuthError> for TrackerError {
    fn from(e: AuthError) -> Self {
        match e {
            AuthError::Unauthenticated => TrackerError::Unauthenticated,
            AuthError::InvalidToken => TrackerError::InvalidToken,
        }
    }
}

pub type TrackerResult<T> = Result<T, TrackerError>;

// ============================================================================
// REQUEST / RESPONSE SHAPES
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct SignupRequest {
    pub name: String,
    pub email: String,
    pub phone: String,
    pub password: String,
    /// "Milky" or "Mocha"
    pub category: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignupResponse {
    pub message: String,
    pub user_id: i64,
    pub email: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub token_type: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProfileUpdate {
    pub name: Option<String>,
    pub profile_picture: Option<String>,
}

/// An expense or income as entered by the user
#[derive(Debug, Clone, Deserialize)]
pub struct RecordInput {
    #[serde(alias = "category", alias = "source")]
    pub label: String,
    pub amount: f64,
    pub currency: Option<String>,
    #[serde(alias = "expense_date", alias = "income_date")]
    pub date: NaiveDate,
    pub notes: Option<String>,
    pub expense_type: Option<String>,
}

impl RecordInput {
    fn validate(&self, kind: RecordKind) -> Result<(), ValidationError> {
        let context = kind.context();
        let mut errors = Vec::new();

        if let Err(e) = require_non_empty(context, "label", &self.label) {
            errors.push(e);
        }
        if let Err(e) = require_finite(context, "amount", self.amount) {
            errors.push(e);
        }
        if let (RecordKind::Expense, Some(expense_type)) = (kind, &self.expense_type) {
            if expense_type != "regular" && expense_type != "additional" {
                errors.push(ValidationError::new(
                    context,
                    "expense_type",
                    format!("Must be 'regular' or 'additional', got '{}'", expense_type),
                ));
            }
        }

        first_error(errors)
    }
}

/// A stored record as shown to its owner
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordView {
    pub id: i64,
    pub user_id: i64,
    #[serde(rename = "type")]
    pub kind: RecordKind,
    pub label: String,
    pub amount: f64,
    pub currency: Currency,
    pub date: NaiveDate,
    pub notes: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expense_type: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
}

impl RecordView {
    fn new(record: MonetaryRecord, amount: f64, currency: Currency) -> Self {
        RecordView {
            id: record.id,
            user_id: record.owner_id,
            kind: record.kind,
            label: record.label,
            amount,
            currency,
            date: record.occurred_on,
            notes: record.notes,
            expense_type: record.expense_type,
            created_at: record.created_at,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RecordQuery {
    pub month: Option<u32>,
    pub year: Option<i32>,
    #[serde(alias = "category", alias = "source")]
    pub label: Option<String>,
    pub expense_type: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SettingsUpdate {
    #[serde(default)]
    pub currency: Currency,
    pub usd_to_inr_rate: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub message: String,
}

impl Message {
    fn new(message: &str) -> Self {
        Message {
            message: message.to_string(),
        }
    }
}

// ============================================================================
// SERVICES
// ============================================================================

/// Process-wide collaborators, built once at startup
pub struct Services {
    pub config: AppConfig,
    pub tokens: TokenService,
    pub clock: Arc<dyn Clock>,
    pub mailer: Arc<dyn Mailer>,
}

impl Services {
    pub fn new(
        config: AppConfig,
        clock: Arc<dyn Clock>,
        mailer: Arc<dyn Mailer>,
    ) -> anyhow::Result<Self> {
        let tokens = TokenService::new(&config.security, Arc::clone(&clock))?;
        Ok(Services {
            config,
            tokens,
            clock,
            mailer,
        })
    }

    pub fn mode(&self) -> ConversionMode {
        self.config.conversion.mode
    }

    pub fn default_rate(&self) -> f64 {
        self.config.conversion.default_rate
    }
}

pub struct Tracker<'a> {
    conn: &'a Connection,
    services: &'a Services,
}

impl<'a> Tracker<'a> {
    pub fn new(conn: &'a Connection, services: &'a Services) -> Self {
        Tracker { conn, services }
    }

    // ------------------------------------------------------------------------
    // Accounts
    // ------------------------------------------------------------------------

    pub fn signup(&self, request: SignupRequest) -> TrackerResult<SignupResponse> {
        let mut errors = Vec::new();
        for (field, value) in [
            ("name", &request.name),
            ("email", &request.email),
            ("password", &request.password),
        ] {
            if let Err(e) = require_non_empty("Signup", field, value) {
                errors.push(e);
            }
        }
        if !request.email.contains('@') {
            errors.push(ValidationError::new("Signup", "email", "Not an email address"));
        }
        first_error(errors)?;

        let new_user = NewUser {
            name: request.name,
            email: request.email.trim().to_string(),
            phone: request.phone,
            password_hash: security::hash_password(
                &request.password,
                self.services.config.security.password_cost,
            )?,
            category: request.category,
        };

        // The account and its default settings land together or not at all
        let tx = self.conn.unchecked_transaction().map_err(anyhow::Error::from)?;
        let user = db::create_user(&tx, &new_user)?.ok_or(TrackerError::EmailTaken)?;
        let settings =
            UserCurrencySettings::default_for(user.id, &user.category, self.services.default_rate());
        db::upsert_settings(&tx, &settings)?;
        tx.commit().map_err(anyhow::Error::from)?;

        let token = self.services.tokens.issue_verification(&user.email);
        if let Err(e) = self.services.mailer.send_verification(&user.email, &token) {
            // Account exists either way; the user can ask for a new link
            warn!(email = %user.email, error = %e, "failed to send verification email");
        }

        info!(user_id = user.id, "user registered");
        Ok(SignupResponse {
            message: "User created successfully. Verification email sent.".to_string(),
            user_id: user.id,
            email: user.email,
        })
    }

    pub fn verify_email(&self, token: &str) -> TrackerResult<Message> {
        let email = self
            .services
            .tokens
            .verify(token, TokenPurpose::Verification)
            .map_err(|_| TrackerError::InvalidVerificationToken)?;

        let user = db::find_user_by_email(self.conn, &email)?.ok_or(TrackerError::UserNotFound)?;
        db::mark_user_verified(self.conn, user.id)?;

        info!(user_id = user.id, "email verified");
        Ok(Message::new("Email verified successfully. You can now login."))
    }

    pub fn login(&self, request: LoginRequest) -> TrackerResult<TokenResponse> {
        let user = db::find_user_by_email(self.conn, request.email.trim())?
            .filter(|user| security::verify_password(&request.password, &user.password_hash))
            .ok_or(TrackerError::InvalidCredentials)?;

        if !user.is_verified {
            return Err(TrackerError::NotVerified);
        }

        Ok(TokenResponse {
            access_token: self.services.tokens.issue_access(&user.email),
            token_type: "bearer".to_string(),
        })
    }

    /// Resolve a bearer token to its user
    pub fn authenticate(&self, token: Option<&str>) -> TrackerResult<User> {
        let email = self.services.tokens.resolve(token)?;
        db::find_user_by_email(self.conn, &email)?.ok_or(TrackerError::UserNotFound)
    }

    pub fn me(&self, token: Option<&str>) -> TrackerResult<User> {
        self.authenticate(token)
    }

    pub fn update_me(&self, token: Option<&str>, update: ProfileUpdate) -> TrackerResult<User> {
        let user = self.authenticate(token)?;
        db::update_user_profile(
            self.conn,
            user.id,
            update.name.as_deref(),
            update.profile_picture.as_deref(),
        )?;
        db::find_user_by_id(self.conn, user.id)?.ok_or(TrackerError::UserNotFound)
    }

    pub fn delete_data(&self, token: Option<&str>) -> TrackerResult<Message> {
        let user = self.authenticate(token)?;
        let removed = db::delete_user_data(self.conn, user.id)?;
        info!(user_id = user.id, removed, "user data deleted");
        Ok(Message::new("All user data deleted successfully"))
    }

    // ------------------------------------------------------------------------
    // Settings
    // ------------------------------------------------------------------------

    /// Stored settings, or the signup-category default (not persisted)
    pub fn settings_or_default(&self, user: &User) -> TrackerResult<UserCurrencySettings> {
        let settings = db::get_settings(self.conn, user.id)?.unwrap_or_else(|| {
            debug!(user_id = user.id, "no stored settings, using default");
            UserCurrencySettings::default_for(user.id, &user.category, self.services.default_rate())
        });
        Ok(settings)
    }

    pub fn settings(&self, token: Option<&str>) -> TrackerResult<UserCurrencySettings> {
        let user = self.authenticate(token)?;
        self.settings_for(&user)
    }

    /// Like `settings_or_default`, but persists the default when missing
    pub fn settings_for(&self, user: &User) -> TrackerResult<UserCurrencySettings> {
        if let Some(settings) = db::get_settings(self.conn, user.id)? {
            return Ok(settings);
        }
        let settings =
            UserCurrencySettings::default_for(user.id, &user.category, self.services.default_rate());
        db::upsert_settings(self.conn, &settings)?;
        Ok(settings)
    }

    pub fn update_settings(
        &self,
        token: Option<&str>,
        update: SettingsUpdate,
    ) -> TrackerResult<UserCurrencySettings> {
        let user = self.authenticate(token)?;
        let settings = UserCurrencySettings {
            owner_id: user.id,
            display_currency: update.currency,
            usd_to_inr_rate: update.usd_to_inr_rate.unwrap_or(self.services.default_rate()),
        };
        settings.validate()?;
        db::upsert_settings(self.conn, &settings)?;
        Ok(settings)
    }

    // ------------------------------------------------------------------------
    // Expenses and incomes
    // ------------------------------------------------------------------------

    pub fn add_record(
        &self,
        token: Option<&str>,
        kind: RecordKind,
        input: RecordInput,
    ) -> TrackerResult<RecordView> {
        let user = self.authenticate(token)?;
        self.add_record_for(&user, kind, input)
    }

    /// Store a record and echo back the amount and currency as entered.
    pub fn add_record_for(
        &self,
        user: &User,
        kind: RecordKind,
        input: RecordInput,
    ) -> TrackerResult<RecordView> {
        input.validate(kind)?;

        let settings = self.settings_or_default(user)?;
        let entered = Currency::from_optional(input.currency.as_deref());
        let (amount, currency) =
            self.services
                .mode()
                .for_storage(input.amount, entered.clone(), settings.usd_to_inr_rate);

        let record = db::insert_record(
            self.conn,
            user.id,
            &NewRecord {
                kind,
                label: input.label.trim().to_string(),
                amount,
                currency,
                occurred_on: input.date,
                notes: input.notes,
                expense_type: match kind {
                    RecordKind::Expense => input.expense_type,
                    RecordKind::Income => None,
                },
            },
        )?;

        debug!(user_id = user.id, kind = kind.name(), id = record.id, "record added");
        Ok(RecordView::new(record, input.amount, entered))
    }

    pub fn list_records(
        &self,
        token: Option<&str>,
        kind: RecordKind,
        query: RecordQuery,
    ) -> TrackerResult<Vec<RecordView>> {
        let user = self.authenticate(token)?;
        self.list_records_for(&user, kind, query)
    }

    /// Records converted into the user's display currency
    pub fn list_records_for(
        &self,
        user: &User,
        kind: RecordKind,
        query: RecordQuery,
    ) -> TrackerResult<Vec<RecordView>> {
        let month = specified(query.month);
        if let Some(month) = month {
            require_month(kind.context(), month)?;
        }

        let settings = self.settings_or_default(user)?;
        let filter = RecordFilter {
            month,
            year: specified(query.year),
            label: query.label,
            expense_type: query.expense_type,
        };

        db::list_records(self.conn, user.id, kind, &filter)?
            .into_iter()
            .map(|record| {
                let amount = record.display_amount(&settings, self.services.mode())?;
                Ok::<_, TrackerError>(RecordView::new(
                    record,
                    amount,
                    settings.display_currency.clone(),
                ))
            })
            .collect()
    }

    pub fn delete_record(
        &self,
        token: Option<&str>,
        kind: RecordKind,
        id: i64,
    ) -> TrackerResult<Message> {
        let user = self.authenticate(token)?;
        if !db::delete_record(self.conn, user.id, kind, id)? {
            return Err(TrackerError::NotFound(kind.context()));
        }
        Ok(Message::new(&format!("{} deleted successfully", kind.context())))
    }

    // ------------------------------------------------------------------------
    // Dashboard
    // ------------------------------------------------------------------------

    pub fn dashboard_summary(
        &self,
        token: Option<&str>,
        month: Option<u32>,
        year: Option<i32>,
    ) -> TrackerResult<PeriodSummary> {
        let user = self.authenticate(token)?;
        let period = Period::resolve(month, year, self.services.clock.as_ref())?;
        self.summary_for(&user, period)
    }

    pub fn summary_for(&self, user: &User, period: Period) -> TrackerResult<PeriodSummary> {
        let settings = self.settings_or_default(user)?;
        let filter = RecordFilter {
            month: Some(period.month),
            year: Some(period.year),
            ..Default::default()
        };

        let mut records = db::list_records(self.conn, user.id, RecordKind::Expense, &filter)?;
        records.extend(db::list_records(self.conn, user.id, RecordKind::Income, &filter)?);

        Ok(summarize(&records, &settings, self.services.mode())?)
    }

    pub fn recent_activity(
        &self,
        token: Option<&str>,
        limit: Option<i64>,
    ) -> TrackerResult<Vec<ActivityEntry>> {
        let user = self.authenticate(token)?;
        self.recent_activity_for(&user, limit.unwrap_or(DEFAULT_FEED_LIMIT))
    }

    pub fn recent_activity_for(&self, user: &User, limit: i64) -> TrackerResult<Vec<ActivityEntry>> {
        let settings = self.settings_or_default(user)?;
        let all = RecordFilter::default();

        let expenses = db::list_records(self.conn, user.id, RecordKind::Expense, &all)?;
        let incomes = db::list_records(self.conn, user.id, RecordKind::Income, &all)?;

        Ok(build_feed(&expenses, &incomes, &settings, self.services.mode(), limit)?)
    }

    // ------------------------------------------------------------------------
    // Saving plans
    // ------------------------------------------------------------------------

    pub fn add_plan(&self, token: Option<&str>, plan: NewSavingPlan) -> TrackerResult<SavingPlan> {
        let user = self.authenticate(token)?;
        plan.validate()?;
        Ok(db::insert_plan(self.conn, user.id, &plan)?)
    }

    pub fn list_plans(
        &self,
        token: Option<&str>,
        month: Option<u32>,
        year: Option<i32>,
    ) -> TrackerResult<Vec<SavingPlan>> {
        let user = self.authenticate(token)?;
        Ok(db::list_plans(self.conn, user.id, specified(month), specified(year))?)
    }

    pub fn delete_plan(&self, token: Option<&str>, id: i64) -> TrackerResult<Message> {
        let user = self.authenticate(token)?;
        if !db::delete_plan(self.conn, user.id, id)? {
            return Err(TrackerError::NotFound("Saving plan"));
        }
        Ok(Message::new("Saving plan deleted successfully"))
    }

    pub fn plans_summary(
        &self,
        token: Option<&str>,
        month: u32,
        year: i32,
    ) -> TrackerResult<SavingPlanSummary> {
        let user = self.authenticate(token)?;
        require_month("SavingPlan", month)?;
        let plans = db::list_plans(self.conn, user.id, Some(month), Some(year))?;
        Ok(summarize_plans(month, year, &plans))
    }

    // ------------------------------------------------------------------------
    // Bulk import
    // ------------------------------------------------------------------------

    /// Insert a batch of records, all-or-nothing.
    pub fn import_records_for(
        &self,
        user: &User,
        kind: RecordKind,
        inputs: Vec<RecordInput>,
    ) -> TrackerResult<usize> {
        for input in &inputs {
            input.validate(kind)?;
        }

        let tx = self.conn.unchecked_transaction().map_err(anyhow::Error::from)?;
        let count = inputs.len();
        for input in inputs {
            self.add_record_for(user, kind, input)?;
        }
        tx.commit().map_err(anyhow::Error::from)?;

        info!(user_id = user.id, kind = kind.name(), count, "records imported");
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::email::LogMailer;
    use crate::period::FixedClock;

    fn services(mode: ConversionMode) -> Services {
        let mut config = AppConfig::default();
        config.conversion.mode = mode;
        config.conversion.default_rate = 80.0;
        config.security.password_cost = 4;
        let clock = FixedClock::new(NaiveDate::from_ymd_opt(2024, 5, 20).unwrap());
        Services::new(config, Arc::new(clock), Arc::new(LogMailer::new("http://localhost:3000")))
            .unwrap()
    }

    fn test_db() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        db::setup_database(&conn).unwrap();
        conn
    }

    /// Sign up, verify and log in; returns an access token
    fn register(tracker: &Tracker, services: &Services, email: &str, category: &str) -> String {
        tracker
            .signup(SignupRequest {
                name: "Test".to_string(),
                email: email.to_string(),
                phone: "555".to_string(),
                password: "pw-123456".to_string(),
                category: category.to_string(),
            })
            .unwrap();
        let verification = services.tokens.issue_verification(email);
        tracker.verify_email(&verification).unwrap();
        tracker
            .login(LoginRequest {
                email: email.to_string(),
                password: "pw-123456".to_string(),
            })
            .unwrap()
            .access_token
    }

    fn input(label: &str, amount: f64, currency: &str, date: &str) -> RecordInput {
        RecordInput {
            label: label.to_string(),
            amount,
            currency: Some(currency.to_string()),
            date: NaiveDate::parse_from_str(date, "%Y-%m-%d").unwrap(),
            notes: None,
            expense_type: None,
        }
    }

    #[test]
    fn test_signup_creates_default_settings() {
        let services = services(ConversionMode::Smart);
        let conn = test_db();
        let tracker = Tracker::new(&conn, &services);

        let token = register(&tracker, &services, "milky@example.com", "Milky");
        let settings = tracker.settings(Some(&token)).unwrap();

        assert_eq!(settings.display_currency, Currency::Inr);
        assert_eq!(settings.usd_to_inr_rate, 80.0);
    }

    #[test]
    fn test_duplicate_signup_rejected() {
        let services = services(ConversionMode::Smart);
        let conn = test_db();
        let tracker = Tracker::new(&conn, &services);
        register(&tracker, &services, "ana@example.com", "Mocha");

        let err = tracker
            .signup(SignupRequest {
                name: "Again".to_string(),
                email: "ana@example.com".to_string(),
                phone: "1".to_string(),
                password: "x".to_string(),
                category: "Mocha".to_string(),
            })
            .unwrap_err();
        assert!(matches!(err, TrackerError::EmailTaken));
    }

    #[test]
    fn test_signup_rolls_back_when_settings_cannot_be_written() {
        let services = services(ConversionMode::Smart);
        let conn = test_db();
        conn.execute_batch("DROP TABLE settings").unwrap();
        let tracker = Tracker::new(&conn, &services);

        let err = tracker
            .signup(SignupRequest {
                name: "Ana".to_string(),
                email: "ana@example.com".to_string(),
                phone: "1".to_string(),
                password: "pw".to_string(),
                category: "Mocha".to_string(),
            })
            .unwrap_err();

        assert!(matches!(err, TrackerError::Storage(_)));
        assert!(db::find_user_by_email(&conn, "ana@example.com").unwrap().is_none());
    }

    #[test]
    fn test_login_requires_verification() {
        let services = services(ConversionMode::Smart);
        let conn = test_db();
        let tracker = Tracker::new(&conn, &services);

        tracker
            .signup(SignupRequest {
                name: "Ana".to_string(),
                email: "ana@example.com".to_string(),
                phone: "1".to_string(),
                password: "secret".to_string(),
                category: "Mocha".to_string(),
            })
            .unwrap();

        let login = || {
            tracker.login(LoginRequest {
                email: "ana@example.com".to_string(),
                password: "secret".to_string(),
            })
        };
        assert!(matches!(login(), Err(TrackerError::NotVerified)));

        let wrong = tracker.login(LoginRequest {
            email: "ana@example.com".to_string(),
            password: "nope".to_string(),
        });
        assert!(matches!(wrong, Err(TrackerError::InvalidCredentials)));

        let access = services.tokens.issue_access("ana@example.com");
        assert!(matches!(
            tracker.verify_email(&access),
            Err(TrackerError::InvalidVerificationToken)
        ));

        tracker
            .verify_email(&services.tokens.issue_verification("ana@example.com"))
            .unwrap();
        assert!(login().is_ok());
    }

    #[test]
    fn test_authentication_errors() {
        let services = services(ConversionMode::Smart);
        let conn = test_db();
        let tracker = Tracker::new(&conn, &services);

        assert!(matches!(tracker.me(None), Err(TrackerError::Unauthenticated)));
        assert!(matches!(tracker.me(Some("garbage")), Err(TrackerError::InvalidToken)));

        let ghost = services.tokens.issue_access("ghost@example.com");
        assert!(matches!(tracker.me(Some(&ghost)), Err(TrackerError::UserNotFound)));
    }

    #[test]
    fn test_smart_mode_dashboard() {
        let services = services(ConversionMode::Smart);
        let conn = test_db();
        let tracker = Tracker::new(&conn, &services);
        let token = register(&tracker, &services, "ana@example.com", "Mocha");
        let token = Some(token.as_str());

        tracker.add_record(token, RecordKind::Expense, input("Food", 500.0, "INR", "2024-05-02")).unwrap();
        tracker.add_record(token, RecordKind::Expense, input("Rent", 100.0, "USD", "2024-05-01")).unwrap();
        tracker.add_record(token, RecordKind::Income, input("Salary", 50.0, "USD", "2024-05-03")).unwrap();
        // Outside the default period
        tracker.add_record(token, RecordKind::Expense, input("Old", 999.0, "USD", "2024-04-30")).unwrap();

        let summary = tracker.dashboard_summary(token, None, None).unwrap();
        assert_eq!(summary.total_expense, 106.25);
        assert_eq!(summary.total_income, 50.0);
        assert_eq!(summary.savings, -56.25);
        assert_eq!(summary.currency, Currency::Usd);

        tracker
            .update_settings(
                token,
                SettingsUpdate {
                    currency: Currency::Inr,
                    usd_to_inr_rate: Some(80.0),
                },
            )
            .unwrap();

        let summary = tracker.dashboard_summary(token, Some(5), Some(2024)).unwrap();
        assert_eq!(summary.total_expense, 8500.0);
        assert_eq!(summary.total_income, 4000.0);
        assert_eq!(summary.currency, Currency::Inr);
    }

    #[test]
    fn test_zero_month_and_year_fall_back_to_current_period() {
        let services = services(ConversionMode::Smart);
        let conn = test_db();
        let tracker = Tracker::new(&conn, &services);
        let token = register(&tracker, &services, "ana@example.com", "Mocha");
        let token = Some(token.as_str());

        tracker.add_record(token, RecordKind::Income, input("May", 10.0, "USD", "2024-05-03")).unwrap();
        tracker.add_record(token, RecordKind::Income, input("April", 20.0, "USD", "2024-04-03")).unwrap();

        // The clock is pinned to 2024-05-20
        let summary = tracker.dashboard_summary(token, Some(0), Some(0)).unwrap();
        assert_eq!(summary.total_income, 10.0);

        // Zero filters on a listing mean "no filter"
        let query = RecordQuery { month: Some(0), year: Some(0), ..Default::default() };
        let listed = tracker.list_records(token, RecordKind::Income, query).unwrap();
        assert_eq!(listed.len(), 2);

        tracker
            .add_plan(token, NewSavingPlan { category: "Trip".to_string(), amount: 5.0, month: 6, year: 2024 })
            .unwrap();
        assert_eq!(tracker.list_plans(token, Some(0), Some(0)).unwrap().len(), 1);
    }

    #[test]
    fn test_always_normalize_stores_usd() {
        let services = services(ConversionMode::AlwaysNormalize);
        let conn = test_db();
        let tracker = Tracker::new(&conn, &services);
        let token = register(&tracker, &services, "ana@example.com", "Mocha");
        let token = Some(token.as_str());

        let created = tracker
            .add_record(token, RecordKind::Expense, input("Food", 800.0, "INR", "2024-05-02"))
            .unwrap();
        // Echoes what was entered
        assert_eq!(created.amount, 800.0);
        assert_eq!(created.currency, Currency::Inr);

        let listed = tracker.list_records(token, RecordKind::Expense, RecordQuery::default()).unwrap();
        assert_eq!(listed[0].amount, 10.0);
        assert_eq!(listed[0].currency, Currency::Usd);
    }

    #[test]
    fn test_list_converts_to_display_currency() {
        let services = services(ConversionMode::Smart);
        let conn = test_db();
        let tracker = Tracker::new(&conn, &services);
        let token = register(&tracker, &services, "milky@example.com", "Milky");
        let token = Some(token.as_str());

        tracker.add_record(token, RecordKind::Income, input("Gift", 2.0, "USD", "2024-01-01")).unwrap();
        tracker.add_record(token, RecordKind::Income, input("Bonus", 300.0, "INR", "2024-01-02")).unwrap();

        let listed = tracker.list_records(token, RecordKind::Income, RecordQuery::default()).unwrap();
        let amounts: Vec<f64> = listed.iter().map(|r| r.amount).collect();
        assert_eq!(amounts, vec![300.0, 160.0]);
        assert!(listed.iter().all(|r| r.currency == Currency::Inr));
    }

    #[test]
    fn test_recent_activity_default_limit() {
        let services = services(ConversionMode::Smart);
        let conn = test_db();
        let tracker = Tracker::new(&conn, &services);
        let token = register(&tracker, &services, "ana@example.com", "Mocha");
        let token = Some(token.as_str());

        for day in 1..=4 {
            let date = format!("2024-03-0{}", day);
            tracker.add_record(token, RecordKind::Expense, input("Food", 1.0, "USD", &date)).unwrap();
        }
        tracker.add_record(token, RecordKind::Income, input("Pay", 1.0, "USD", "2024-03-05")).unwrap();

        let feed = tracker.recent_activity(token, None).unwrap();
        assert_eq!(feed.len(), 3);
        assert_eq!(feed[0].kind, RecordKind::Income);

        assert!(tracker.recent_activity(token, Some(0)).unwrap().is_empty());
    }

    #[test]
    fn test_records_isolated_between_users() {
        let services = services(ConversionMode::Smart);
        let conn = test_db();
        let tracker = Tracker::new(&conn, &services);
        let ana = register(&tracker, &services, "ana@example.com", "Mocha");
        let bob = register(&tracker, &services, "bob@example.com", "Mocha");

        let record = tracker
            .add_record(Some(&ana), RecordKind::Expense, input("Food", 5.0, "USD", "2024-05-01"))
            .unwrap();

        assert!(tracker.list_records(Some(&bob), RecordKind::Expense, RecordQuery::default()).unwrap().is_empty());
        assert!(matches!(
            tracker.delete_record(Some(&bob), RecordKind::Expense, record.id),
            Err(TrackerError::NotFound("Expense"))
        ));
        assert!(tracker.delete_record(Some(&ana), RecordKind::Expense, record.id).is_ok());
    }

    #[test]
    fn test_invalid_input_is_validation_error() {
        let services = services(ConversionMode::Smart);
        let conn = test_db();
        let tracker = Tracker::new(&conn, &services);
        let token = register(&tracker, &services, "ana@example.com", "Mocha");

        let mut bad = input("Food", 1.0, "USD", "2024-05-01");
        bad.expense_type = Some("sometimes".to_string());
        let err = tracker.add_record(Some(&token), RecordKind::Expense, bad).unwrap_err();
        assert!(matches!(err, TrackerError::Validation(ref e) if e.field == "expense_type"));

        let err = tracker
            .update_settings(
                Some(&token),
                SettingsUpdate {
                    currency: Currency::Usd,
                    usd_to_inr_rate: Some(-1.0),
                },
            )
            .unwrap_err();
        assert!(matches!(err, TrackerError::Validation(_)));

        let err = tracker.dashboard_summary(Some(&token), Some(14), None).unwrap_err();
        assert!(matches!(err, TrackerError::Validation(_)));
    }

    #[test]
    fn test_saving_plans_flow() {
        let services = services(ConversionMode::Smart);
        let conn = test_db();
        let tracker = Tracker::new(&conn, &services);
        let token = register(&tracker, &services, "ana@example.com", "Mocha");
        let token = Some(token.as_str());

        for amount in [100.0, 50.0] {
            tracker
                .add_plan(
                    token,
                    NewSavingPlan {
                        category: "Travel".to_string(),
                        amount,
                        month: 6,
                        year: 2024,
                    },
                )
                .unwrap();
        }

        let summary = tracker.plans_summary(token, 6, 2024).unwrap();
        assert_eq!(summary.total_planned, 150.0);
        assert_eq!(summary.count, 2);

        let plans = tracker.list_plans(token, None, None).unwrap();
        tracker.delete_plan(token, plans[0].id).unwrap();
        assert!(matches!(
            tracker.delete_plan(token, plans[0].id),
            Err(TrackerError::NotFound("Saving plan"))
        ));
    }

    #[test]
    fn test_import_is_all_or_nothing() {
        let services = services(ConversionMode::Smart);
        let conn = test_db();
        let tracker = Tracker::new(&conn, &services);
        let token = register(&tracker, &services, "ana@example.com", "Mocha");
        let user = tracker.me(Some(&token)).unwrap();

        let batch = vec![
            input("Food", 1.0, "USD", "2024-05-01"),
            input("", 2.0, "USD", "2024-05-02"),
        ];
        assert!(tracker.import_records_for(&user, RecordKind::Expense, batch).is_err());
        assert!(tracker.list_records_for(&user, RecordKind::Expense, RecordQuery::default()).unwrap().is_empty());

        let batch = vec![input("Food", 1.0, "USD", "2024-05-01"), input("Fuel", 2.0, "INR", "2024-05-02")];
        assert_eq!(tracker.import_records_for(&user, RecordKind::Expense, batch).unwrap(), 2);
    }

    #[test]
    fn test_delete_data_and_profile_update() {
        let services = services(ConversionMode::Smart);
        let conn = test_db();
        let tracker = Tracker::new(&conn, &services);
        let token = register(&tracker, &services, "ana@example.com", "Mocha");
        let token = Some(token.as_str());

        tracker.add_record(token, RecordKind::Income, input("Pay", 1.0, "USD", "2024-05-01")).unwrap();
        tracker.delete_data(token).unwrap();
        assert!(tracker.recent_activity(token, Some(10)).unwrap().is_empty());

        let user = tracker
            .update_me(
                token,
                ProfileUpdate {
                    name: Some("Ana B".to_string()),
                    profile_picture: Some("data:image/png;base64,AAA".to_string()),
                },
            )
            .unwrap();
        assert_eq!(user.name, "Ana B");
        assert!(user.profile_picture.is_some());
    }
}
