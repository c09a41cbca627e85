use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ============================================================================
// Bot Control Types
// ============================================================================

/// Request body for starting the bot.
///
/// Dates are ISO `YYYY-MM-DD` strings; they are validated by the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartBotRequest {
    /// The appointment date currently held by the user
    pub current_date: String,
    /// Stop once something on or before this date is booked
    #[serde(default)]
    pub target_date: Option<String>,
    /// Ignore openings earlier than this date
    #[serde(default)]
    pub min_date: Option<String>,
    #[serde(default)]
    pub dry_run: bool,
    /// Overrides the configured refresh delay for this run
    #[serde(default)]
    pub refresh_delay_secs: Option<u64>,
}

/// Generic acknowledgement returned by start/stop.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControlResponse {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mode: Option<BotMode>,
}

impl ControlResponse {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
            mode: None,
        }
    }

    pub fn rejected(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            mode: None,
        }
    }

    pub fn with_mode(mut self, mode: BotMode) -> Self {
        self.mode = Some(mode);
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BotMode {
    #[serde(rename = "Test Mode")]
    DryRun,
    #[serde(rename = "Live Booking")]
    Live,
}

impl BotMode {
    pub fn from_dry_run(dry_run: bool) -> Self {
        if dry_run {
            BotMode::DryRun
        } else {
            BotMode::Live
        }
    }
}

/// How the last run of the bot ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RunExit {
    TargetReached { date: String },
    Stopped,
    Crashed { reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BotStatusResponse {
    pub running: bool,
    pub mode: Option<BotMode>,
    pub current_date: Option<String>,
    pub target_date: Option<String>,
    pub min_date: Option<String>,
    /// Latest held date as tracked by the running loop
    pub held_date: Option<String>,
    pub cycles: u64,
    pub last_check: Option<DateTime<Utc>>,
    pub last_exit: Option<RunExit>,
}

// ============================================================================
// Log Types
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Debug,
    Info,
    Success,
    Warning,
    Error,
}

impl Severity {
    pub fn as_str(&self) -> &str {
        match self {
            Severity::Debug => "debug",
            Severity::Info => "info",
            Severity::Success => "success",
            Severity::Warning => "warning",
            Severity::Error => "error",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    pub id: u64,
    pub timestamp: DateTime<Utc>,
    pub message: String,
    pub severity: Severity,
}

/// Query parameters for tailing logs
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LogsQuery {
    /// Only return entries with an id greater than this
    pub since: Option<u64>,
    pub limit: Option<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogsResponse {
    pub logs: Vec<LogEntry>,
}

// ============================================================================
// Site Types
// ============================================================================

/// Non-secret view of the site configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigResponse {
    pub email: String,
    pub country_code: String,
    pub schedule_id: String,
    pub facility_id: String,
    pub target_date: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DatesResponse {
    pub dates: Vec<String>,
    pub total: usize,
    pub facility_id: String,
    pub schedule_id: String,
}
