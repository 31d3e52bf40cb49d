// M&M Tracker - Core Library
// Currency conversion, ledger totals and the activity feed, plus the
// storage and account plumbing shared by the CLI and the API server.

pub mod config;
pub mod currency;
pub mod db;
pub mod email;
pub mod feed;
pub mod import;
pub mod ledger;
pub mod log;
pub mod period;
pub mod plans;
pub mod security;
pub mod settings;
pub mod tracker;
pub mod validation;

#[cfg(feature = "server")]
pub mod api;

// Re-export commonly used types
pub use config::AppConfig;
pub use currency::{convert, ConversionMode, Currency};
pub use db::{setup_database, User};
pub use feed::{build_feed, ActivityEntry, DEFAULT_FEED_LIMIT};
pub use ledger::{summarize, MonetaryRecord, PeriodSummary, RecordKind};
pub use period::{Clock, FixedClock, Period, SystemClock};
pub use plans::{NewSavingPlan, SavingPlan, SavingPlanSummary};
pub use security::{AuthError, IdentityResolver, TokenService};
pub use settings::UserCurrencySettings;
pub use tracker::{Services, Tracker, TrackerError};
pub use validation::ValidationError;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
