//! Input/output DTOs and schema-bearing types
//!
//! Defines all data structures used in MCP tool contracts. Each type is
//! annotated with `JsonSchema` for automatic schema generation.

use chrono::{SecondsFormat, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Metadata included in all tool responses
///
/// Provides timing information and current UTC timestamp.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct Meta {
    /// Current UTC timestamp in RFC 3339 format with milliseconds
    pub now_utc: String,
    /// Tool execution duration in milliseconds
    pub duration_ms: u64,
}

impl Meta {
    /// Create metadata populated with current time and elapsed duration
    pub fn now(duration_ms: u64) -> Self {
        Self {
            now_utc: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
            duration_ms,
        }
    }
}

/// Standard response envelope for all tools
///
/// Wraps tool-specific data with human-readable summary and execution metadata.
/// This structure provides consistent response shape across all MCP tools.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ToolEnvelope<T>
where
    T: JsonSchema,
{
    /// Human-readable summary of the operation outcome
    pub summary: String,
    /// Tool-specific data payload
    pub data: T,
    /// Execution metadata (timestamp, duration)
    pub meta: Meta,
}

/// Mail store (mailbox) attached to the profile
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct StoreSummary {
    /// Store display name; usable as the first segment of a folder path
    pub name: String,
    /// Whether this is the primary store
    pub is_default: bool,
}

/// Returned by `outlook_list_stores`
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct StoreListData {
    pub stores: Vec<StoreSummary>,
    /// Store names hidden by configuration
    pub excluded: Vec<String>,
}

/// Folder in the tree listing
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct FolderSummary {
    pub name: String,
    /// Store-qualified path accepted by `outlook_search_folder`
    pub path: String,
    pub store: String,
    /// 1 for top-level folders
    pub depth: usize,
    /// URI reference to the folder
    pub folder_uri: String,
    /// Total items (only with `include_counts=true`)
    pub item_count: Option<usize>,
    /// Unread items (only with `include_counts=true`)
    pub unread_count: Option<usize>,
}

/// Returned by `outlook_list_folders`
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct FolderListData {
    pub folders: Vec<FolderSummary>,
}

/// Email as returned by listing and search tools
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct EmailRecord {
    /// Folder the email was found in
    pub folder: String,
    pub subject: String,
    pub sender: Option<String>,
    pub sender_email: Option<String>,
    /// `To` recipients as displayed by the client
    pub recipients: Option<String>,
    pub cc: Option<String>,
    pub bcc: Option<String>,
    /// RFC 3339 timestamp
    pub received_time: Option<String>,
    /// RFC 3339 timestamp
    pub sent_on: Option<String>,
    /// Body preview, suffixed with `...` when truncated
    pub body: String,
    /// Full body length in characters
    pub body_length: usize,
    pub has_attachments: bool,
    pub attachment_count: u32,
    /// `low`, `normal` or `high`
    pub importance: String,
    pub unread: bool,
    pub categories: Option<String>,
}

/// Calendar event (one occurrence for recurring series)
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct EventRecord {
    pub subject: String,
    /// RFC 3339 timestamp
    pub start: Option<String>,
    /// RFC 3339 timestamp
    pub end: Option<String>,
    pub location: Option<String>,
    pub organizer: Option<String>,
    pub required_attendees: Option<String>,
    pub optional_attendees: Option<String>,
    pub body: String,
    pub body_length: usize,
    pub is_all_day_event: bool,
    pub reminder_set: bool,
    /// Present only when a reminder is set
    pub reminder_minutes: Option<i64>,
    pub categories: Option<String>,
    /// `free`, `tentative`, `busy`, `out_of_office` or `working_elsewhere`
    pub busy_status: String,
}

/// Contact card
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ContactRecord {
    pub full_name: String,
    pub email1: Option<String>,
    pub email2: Option<String>,
    pub email3: Option<String>,
    pub company: Option<String>,
    pub job_title: Option<String>,
    pub business_phone: Option<String>,
    pub mobile_phone: Option<String>,
    pub home_phone: Option<String>,
    pub business_address: Option<String>,
    pub categories: Option<String>,
}

/// Mail rule in display form
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct RuleRecord {
    pub name: String,
    pub enabled: bool,
    /// `When: ... | Then: ... | Except: ...`, omitting empty parts
    pub description: String,
    pub conditions: Vec<String>,
    pub actions: Vec<String>,
    pub exceptions: Vec<String>,
}

/// Time window applied to an email enumeration
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct WindowInfo {
    /// Lookback in days; absent when unbounded
    pub days_back: Option<u32>,
    /// Earliest timestamp included (RFC 3339); absent when unbounded
    pub since_utc: Option<String>,
    /// Result cap after clamping
    pub limit: usize,
}

/// Outcome of enumerating one folder
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct FolderScan {
    /// Well-known folder name or canonical folder path
    pub folder: String,
    /// URI reference to the folder (path-resolved folders only)
    pub folder_uri: Option<String>,
    /// Whether the folder handle came from the resolution cache
    pub cached: Option<bool>,
    pub returned: usize,
    /// Positions visited, including skipped items
    pub scanned: usize,
    /// Items that could not be read and were skipped
    pub skipped: usize,
    /// `exhausted`, `cap_reached`, `outside_window`, `scan_budget` or `host_lost`
    pub end_reason: String,
    /// More matching items may exist than were returned
    pub truncated: bool,
}

/// Returned by the email listing and search tools
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct EmailListData {
    pub query: Option<String>,
    pub window: WindowInfo,
    pub scans: Vec<FolderScan>,
    pub emails: Vec<EmailRecord>,
}

/// Returned by the calendar tools
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct EventListData {
    pub query: Option<String>,
    /// Range start (RFC 3339)
    pub range_start: String,
    /// Range end (RFC 3339)
    pub range_end: String,
    pub scan: FolderScan,
    pub events: Vec<EventRecord>,
}

/// Returned by the contact tools
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ContactListData {
    pub query: Option<String>,
    pub scan: FolderScan,
    pub contacts: Vec<ContactRecord>,
}

/// Returned by `outlook_list_rules`
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct RuleListData {
    /// Rules in execution order
    pub rules: Vec<RuleRecord>,
}

/// Returned by `outlook_folder_cache_status`
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct CacheStatusData {
    pub entries: usize,
    pub hits: u64,
    pub misses: u64,
    /// Cached folder paths in lexical order
    pub paths: Vec<String>,
}

/// Returned by `outlook_clear_folder_cache`
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct CacheClearData {
    /// Path that was evicted, or absent when the whole cache was cleared
    pub folder_path: Option<String>,
    pub evicted: usize,
}

/// Input: list folders
#[derive(Debug, Clone, Default, Deserialize, JsonSchema)]
pub struct ListFoldersInput {
    /// Only list folders of this store
    pub store: Option<String>,
    /// Include item and unread counts (slow on large folders)
    #[serde(default)]
    pub include_counts: bool,
}

/// Input: inbox listing
#[derive(Debug, Clone, Default, Deserialize, JsonSchema)]
pub struct InboxEmailsInput {
    /// Maximum emails to return (default 5, clamped to the server maximum)
    pub limit: Option<usize>,
    /// Only unread emails
    #[serde(default)]
    pub unread_only: bool,
    /// Lookback in days; 0 or negative searches all mail (slow)
    pub days_back: Option<i64>,
}

/// Input: sent items listing
#[derive(Debug, Clone, Default, Deserialize, JsonSchema)]
pub struct SentEmailsInput {
    /// Maximum emails to return (default 5, clamped to the server maximum)
    pub limit: Option<usize>,
    /// Lookback in days; 0 or negative searches all mail (slow)
    pub days_back: Option<i64>,
}

/// Well-known mail folder for `outlook_search_emails`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum MailFolderChoice {
    #[default]
    Inbox,
    Sent,
    Drafts,
    Deleted,
    /// Inbox, sent items and drafts
    All,
}

/// Input: keyword search in well-known folders
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct SearchEmailsInput {
    /// Text matched against subject, body and sender name
    pub query: String,
    #[serde(default)]
    pub folder: MailFolderChoice,
    /// Maximum emails to return (default 20, clamped to the server maximum)
    #[serde(default = "default_search_limit")]
    pub limit: usize,
    /// Lookback in days; 0 or negative searches all mail (slow)
    pub days_back: Option<i64>,
}

/// Input: windowed search of a folder by path
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct SearchFolderInput {
    /// `/`-delimited folder path, optionally starting with a store name
    /// (e.g. `Inbox/Archive/2024` or `Team Mailbox/Inbox`)
    pub folder_path: String,
    /// Optional text matched against subject, body and sender name
    pub query: Option<String>,
    /// Maximum emails to return (default 20, clamped to the server maximum)
    #[serde(default = "default_search_limit")]
    pub limit: usize,
    /// Lookback in days; 0 or negative searches all mail (slow)
    pub days_back: Option<i64>,
}

/// Input: upcoming calendar events
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct CalendarEventsInput {
    /// Days ahead to include (1..365, default 7)
    #[serde(default = "default_days_ahead")]
    pub days_ahead: u32,
    /// Start from midnight today instead of now
    #[serde(default)]
    pub include_past: bool,
    /// Maximum events to return
    pub limit: Option<usize>,
}

/// Input: calendar keyword search
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct SearchCalendarInput {
    /// Text matched against subject and location
    pub query: String,
    /// Days before and after today to search (1..365, default 30)
    #[serde(default = "default_days_range")]
    pub days_range: u32,
    /// Maximum events to return
    pub limit: Option<usize>,
}

/// Input: contact listing
#[derive(Debug, Clone, Default, Deserialize, JsonSchema)]
pub struct ContactsInput {
    /// Maximum contacts to return (default 50, clamped to the server maximum)
    pub limit: Option<usize>,
    /// Only contacts whose name contains this text
    pub search_name: Option<String>,
}

/// Input: contact search
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct SearchContactsInput {
    /// Text matched against full name, primary email and company
    pub query: String,
    /// Maximum contacts to return
    pub limit: Option<usize>,
}

/// Input: cache invalidation
#[derive(Debug, Clone, Default, Deserialize, JsonSchema)]
pub struct ClearFolderCacheInput {
    /// Evict only this path; clears the whole cache when absent
    pub folder_path: Option<String>,
}

/// Default value for `limit` in search tools
fn default_search_limit() -> usize {
    20
}

/// Default value for `days_ahead`
fn default_days_ahead() -> u32 {
    7
}

/// Default value for `days_range`
///
/// A month either side of today covers most "when was that meeting" lookups.
fn default_days_range() -> u32 {
    30
}
