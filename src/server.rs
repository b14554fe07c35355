//! MCP server implementation with tool handlers
//!
//! Implements the `ServerHandler` trait and registers 13 MCP tools. Handles
//! input validation, business logic orchestration, and response formatting.
//! Every host interaction runs as a job on the [`HostWorker`].

use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Days, Local, NaiveDate, SecondsFormat, Utc};
use rmcp::handler::server::router::tool::ToolRouter;
use rmcp::handler::server::wrapper::Parameters;
use rmcp::model::{ErrorData, ServerCapabilities, ServerInfo};
use rmcp::{Json, ServerHandler, tool, tool_handler, tool_router};

use crate::config::ServerConfig;
use crate::enumerate::{
    EnumerationReport, Lookback, ScanRequest, TEXT_SCAN_FACTOR, WindowSpec, enumerate_window, scan,
};
use crate::errors::{AppError, AppResult};
use crate::filter::Restriction;
use crate::host::{DefaultFolder, FlagField, HostError, SortSpec, TextField, TimeField};
use crate::materialize;
use crate::models::{
    CacheClearData, CacheStatusData, CalendarEventsInput, ClearFolderCacheInput, ContactListData,
    ContactsInput, EmailListData, EmailRecord, EventListData, FolderListData, FolderScan,
    FolderSummary, InboxEmailsInput, ListFoldersInput, MailFolderChoice, Meta, RuleListData,
    SearchCalendarInput, SearchContactsInput, SearchEmailsInput, SearchFolderInput,
    SentEmailsInput, StoreListData, StoreSummary, ToolEnvelope, WindowInfo,
};
use crate::resolver::{self, ListOptions, StorePath};
use crate::stores;
use crate::worker::{HostSession, HostWorker};

/// Maximum characters in paths and search text
const MAX_TEXT_CHARS: usize = 256;
/// Bounds for `days_ahead` and `days_range`
const MAX_CALENDAR_DAYS: u32 = 365;
/// Fields matched by email keyword searches
const EMAIL_SEARCH_FIELDS: [TextField; 3] =
    [TextField::Subject, TextField::Body, TextField::SenderName];
const EVENT_SEARCH_FIELDS: [TextField; 2] = [TextField::Subject, TextField::Location];
const CONTACT_SEARCH_FIELDS: [TextField; 3] =
    [TextField::FullName, TextField::Email1, TextField::Company];

/// Outlook MCP server
///
/// Holds shared configuration and the host worker handle. Implements MCP tool
/// handlers via `#[tool]` attribute macro and `ServerHandler` trait.
#[derive(Clone)]
pub struct OutlookServer {
    /// Server config (limits, exclusions, timeouts)
    config: Arc<ServerConfig>,
    /// Worker thread owning the automation host and folder cache
    worker: HostWorker,
    /// Tool router for dispatching MCP tool calls
    tool_router: ToolRouter<Self>,
}

#[tool_router]
impl OutlookServer {
    /// Create a new MCP server instance
    pub fn new(config: ServerConfig, worker: HostWorker) -> Self {
        Self {
            config: Arc::new(config),
            worker,
            tool_router: Self::tool_router(),
        }
    }

    /// Tool: List mail stores attached to the profile
    #[tool(
        name = "outlook_list_stores",
        description = "List mail stores (mailboxes) attached to the profile, excluding configured ones"
    )]
    async fn list_stores(&self) -> Result<Json<ToolEnvelope<StoreListData>>, ErrorData> {
        let started = Instant::now();
        finalize_tool(
            started,
            self.list_stores_impl()
                .await
                .map(|data| (format!("{} store(s) available", data.stores.len()), data)),
        )
    }

    /// Tool: List the folder tree
    ///
    /// Paths in the result are store-qualified and can be passed to
    /// `outlook_search_folder` as-is.
    #[tool(
        name = "outlook_list_folders",
        description = "List folders of all stores with paths usable by outlook_search_folder; include_counts is slow on large folders"
    )]
    async fn list_folders(
        &self,
        Parameters(input): Parameters<ListFoldersInput>,
    ) -> Result<Json<ToolEnvelope<FolderListData>>, ErrorData> {
        let started = Instant::now();
        finalize_tool(
            started,
            self.list_folders_impl(input)
                .await
                .map(|data| (format!("{} folder(s)", data.folders.len()), data)),
        )
    }

    /// Tool: List mail rules of the primary store
    #[tool(
        name = "outlook_list_rules",
        description = "List mail rules with their conditions, actions and exceptions"
    )]
    async fn list_rules(&self) -> Result<Json<ToolEnvelope<RuleListData>>, ErrorData> {
        let started = Instant::now();
        finalize_tool(
            started,
            self.rules_impl().await.map(|data| {
                let enabled = data.rules.iter().filter(|r| r.enabled).count();
                (
                    format!("{} rule(s), {enabled} enabled", data.rules.len()),
                    data,
                )
            }),
        )
    }

    #[tool(
        name = "outlook_get_inbox_emails",
        description = "Get recent inbox emails, newest first, within a lookback window"
    )]
    async fn get_inbox_emails(
        &self,
        Parameters(input): Parameters<InboxEmailsInput>,
    ) -> Result<Json<ToolEnvelope<EmailListData>>, ErrorData> {
        let started = Instant::now();
        finalize_tool(
            started,
            self.inbox_emails_impl(input).await.map(email_summary),
        )
    }

    #[tool(
        name = "outlook_get_sent_emails",
        description = "Get recent sent emails, newest first, within a lookback window"
    )]
    async fn get_sent_emails(
        &self,
        Parameters(input): Parameters<SentEmailsInput>,
    ) -> Result<Json<ToolEnvelope<EmailListData>>, ErrorData> {
        let started = Instant::now();
        finalize_tool(started, self.sent_emails_impl(input).await.map(email_summary))
    }

    /// Tool: Keyword search in well-known folders
    ///
    /// `folder=all` searches inbox, sent items and drafts in that order until
    /// the limit is reached.
    #[tool(
        name = "outlook_search_emails",
        description = "Search emails by subject, body or sender in inbox, sent, drafts, deleted, or all"
    )]
    async fn search_emails(
        &self,
        Parameters(input): Parameters<SearchEmailsInput>,
    ) -> Result<Json<ToolEnvelope<EmailListData>>, ErrorData> {
        let started = Instant::now();
        finalize_tool(
            started,
            self.search_emails_impl(input).await.map(email_summary),
        )
    }

    /// Tool: Windowed search of any folder by path
    ///
    /// The folder path is resolved through the folder cache, so repeated
    /// searches of the same folder skip the tree walk.
    #[tool(
        name = "outlook_search_folder",
        description = "Search emails in a folder given by path (e.g. Inbox/Archive/2024), newest first within a lookback window"
    )]
    async fn search_folder(
        &self,
        Parameters(input): Parameters<SearchFolderInput>,
    ) -> Result<Json<ToolEnvelope<EmailListData>>, ErrorData> {
        let started = Instant::now();
        finalize_tool(
            started,
            self.search_folder_impl(input).await.map(email_summary),
        )
    }

    #[tool(
        name = "outlook_get_calendar_events",
        description = "Get calendar events from now (or today) through the next days_ahead days, recurring occurrences included"
    )]
    async fn get_calendar_events(
        &self,
        Parameters(input): Parameters<CalendarEventsInput>,
    ) -> Result<Json<ToolEnvelope<EventListData>>, ErrorData> {
        let started = Instant::now();
        finalize_tool(
            started,
            self.calendar_events_impl(input).await.map(event_summary),
        )
    }

    #[tool(
        name = "outlook_search_calendar_events",
        description = "Search calendar events by subject or location within days_range days of today"
    )]
    async fn search_calendar_events(
        &self,
        Parameters(input): Parameters<SearchCalendarInput>,
    ) -> Result<Json<ToolEnvelope<EventListData>>, ErrorData> {
        let started = Instant::now();
        finalize_tool(
            started,
            self.search_calendar_impl(input).await.map(event_summary),
        )
    }

    #[tool(
        name = "outlook_get_contacts",
        description = "List contacts alphabetically, optionally filtered by name"
    )]
    async fn get_contacts(
        &self,
        Parameters(input): Parameters<ContactsInput>,
    ) -> Result<Json<ToolEnvelope<ContactListData>>, ErrorData> {
        let started = Instant::now();
        finalize_tool(started, self.contacts_impl(input).await.map(contact_summary))
    }

    #[tool(
        name = "outlook_search_contacts",
        description = "Search contacts by name, email or company"
    )]
    async fn search_contacts(
        &self,
        Parameters(input): Parameters<SearchContactsInput>,
    ) -> Result<Json<ToolEnvelope<ContactListData>>, ErrorData> {
        let started = Instant::now();
        finalize_tool(
            started,
            self.search_contacts_impl(input)
                .await
                .map(contact_summary),
        )
    }

    #[tool(
        name = "outlook_folder_cache_status",
        description = "Show folder resolution cache size, hit/miss counters and cached paths"
    )]
    async fn folder_cache_status(&self) -> Result<Json<ToolEnvelope<CacheStatusData>>, ErrorData> {
        let started = Instant::now();
        finalize_tool(
            started,
            self.cache_status_impl().await.map(|data| {
                (
                    format!(
                        "{} cached folder(s), {} hit(s), {} miss(es)",
                        data.entries, data.hits, data.misses
                    ),
                    data,
                )
            }),
        )
    }

    /// Tool: Invalidate the folder cache
    ///
    /// Needed after folders are renamed or moved in the client.
    #[tool(
        name = "outlook_clear_folder_cache",
        description = "Evict one folder path from the resolution cache, or clear it entirely"
    )]
    async fn clear_folder_cache(
        &self,
        Parameters(input): Parameters<ClearFolderCacheInput>,
    ) -> Result<Json<ToolEnvelope<CacheClearData>>, ErrorData> {
        let started = Instant::now();
        finalize_tool(
            started,
            self.clear_cache_impl(input)
                .await
                .map(|data| (format!("{} cache entr(ies) evicted", data.evicted), data)),
        )
    }
}

/// MCP server handler implementation
///
/// Provides server info and capabilities to MCP client.
#[tool_handler(router = self.tool_router)]
impl ServerHandler for OutlookServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo::new(ServerCapabilities::builder().enable_tools().build()).with_instructions(
            "Read-only Outlook MCP server. Email tools search a recent window (days_back, 0 = all mail, slow); use outlook_list_folders to discover folder paths.",
        )
    }
}

/// Folder an email job enumerates
#[derive(Debug, Clone)]
enum MailTarget {
    Default(DefaultFolder),
    Path(StorePath),
}

/// Parameters of one email job, moved onto the worker thread
#[derive(Debug, Clone)]
struct EmailJob {
    targets: Vec<MailTarget>,
    lookback: Lookback,
    limit: usize,
    extra: Option<Restriction>,
    query: Option<String>,
}

/// Tool implementation methods
///
/// Private methods handle the actual business logic for each tool, separated
/// from the public `#[tool]` methods that handle response formatting.
impl OutlookServer {
    async fn list_stores_impl(&self) -> AppResult<StoreListData> {
        let excluded = self.config.exclusions().names();
        self.worker
            .call("list_stores", move |session| {
                let listed: Vec<_> =
                    stores::list_stores(session.host.as_mut(), &session.exclusions)?.collect();
                let primary = if listed.is_empty() {
                    None
                } else {
                    match session.host.default_store() {
                        Ok(id) => Some(id),
                        Err(HostError::Unavailable(msg)) => {
                            return Err(AppError::HostUnavailable(msg));
                        }
                        Err(_) => None,
                    }
                };
                let stores = listed
                    .into_iter()
                    .map(|store| StoreSummary {
                        is_default: Some(store.id) == primary,
                        name: store.display_name,
                    })
                    .collect();
                Ok(StoreListData { stores, excluded })
            })
            .await
    }

    async fn list_folders_impl(&self, input: ListFoldersInput) -> AppResult<FolderListData> {
        if let Some(store) = &input.store {
            validate_text(store, "store")?;
        }
        self.worker
            .call("list_folders", move |session| {
                let folders = resolver::list_folders(
                    session.host.as_mut(),
                    &session.exclusions,
                    ListOptions {
                        store: input.store.as_deref(),
                        include_counts: input.include_counts,
                    },
                )?;
                Ok(FolderListData {
                    folders: folders
                        .into_iter()
                        .map(|f| FolderSummary {
                            folder_uri: build_folder_uri(&f.path),
                            name: f.name,
                            path: f.path,
                            store: f.store,
                            depth: f.depth,
                            item_count: f.item_count,
                            unread_count: f.unread_count,
                        })
                        .collect(),
                })
            })
            .await
    }

    async fn rules_impl(&self) -> AppResult<RuleListData> {
        self.worker
            .call("list_rules", |session| {
                let rules = session.host.rules()?;
                Ok(RuleListData {
                    rules: rules.iter().map(materialize::rule).collect(),
                })
            })
            .await
    }

    async fn inbox_emails_impl(&self, input: InboxEmailsInput) -> AppResult<EmailListData> {
        let job = EmailJob {
            targets: vec![MailTarget::Default(DefaultFolder::Inbox)],
            lookback: self.lookback(input.days_back),
            limit: input.limit.unwrap_or(self.config.default_email_limit),
            extra: input.unread_only.then_some(Restriction::IsTrue(FlagField::Unread)),
            query: None,
        };
        self.run_email_job("get_inbox_emails", job).await
    }

    async fn sent_emails_impl(&self, input: SentEmailsInput) -> AppResult<EmailListData> {
        let job = EmailJob {
            targets: vec![MailTarget::Default(DefaultFolder::Sent)],
            lookback: self.lookback(input.days_back),
            limit: input.limit.unwrap_or(self.config.default_email_limit),
            extra: None,
            query: None,
        };
        self.run_email_job("get_sent_emails", job).await
    }

    async fn search_emails_impl(&self, input: SearchEmailsInput) -> AppResult<EmailListData> {
        validate_text(&input.query, "query")?;
        let targets = match input.folder {
            MailFolderChoice::Inbox => vec![DefaultFolder::Inbox],
            MailFolderChoice::Sent => vec![DefaultFolder::Sent],
            MailFolderChoice::Drafts => vec![DefaultFolder::Drafts],
            MailFolderChoice::Deleted => vec![DefaultFolder::Deleted],
            MailFolderChoice::All => {
                vec![DefaultFolder::Inbox, DefaultFolder::Sent, DefaultFolder::Drafts]
            }
        };
        let job = EmailJob {
            targets: targets.into_iter().map(MailTarget::Default).collect(),
            lookback: self.lookback(input.days_back),
            limit: input.limit,
            extra: Some(Restriction::contains(&EMAIL_SEARCH_FIELDS, input.query.clone())),
            query: Some(input.query),
        };
        self.run_email_job("search_emails", job).await
    }

    async fn search_folder_impl(&self, input: SearchFolderInput) -> AppResult<EmailListData> {
        let path = validate_folder_path(&input.folder_path)?;
        if let Some(query) = &input.query {
            validate_text(query, "query")?;
        }
        let job = EmailJob {
            targets: vec![MailTarget::Path(path)],
            lookback: self.lookback(input.days_back),
            limit: input.limit,
            extra: input
                .query
                .as_ref()
                .map(|q| Restriction::contains(&EMAIL_SEARCH_FIELDS, q.clone())),
            query: input.query,
        };
        self.run_email_job("search_folder", job).await
    }

    async fn calendar_events_impl(&self, input: CalendarEventsInput) -> AppResult<EventListData> {
        validate_days(input.days_ahead, "days_ahead")?;
        let limit = clamp_limit(input.limit, self.config.max_event_limit, self.config.max_event_limit);
        let preview = self.config.body_preview_chars;
        self.worker
            .call("get_calendar_events", move |session| {
                let now = Utc::now();
                let today = Local::now().date_naive();
                let start = if input.include_past {
                    local_midnight(today, now)
                } else {
                    now
                };
                let end = end_of_day(today, input.days_ahead, now);
                collect_events(session, None, start, end, limit, preview)
            })
            .await
    }

    async fn search_calendar_impl(&self, input: SearchCalendarInput) -> AppResult<EventListData> {
        validate_text(&input.query, "query")?;
        validate_days(input.days_range, "days_range")?;
        let limit = clamp_limit(input.limit, self.config.max_event_limit, self.config.max_event_limit);
        let preview = self.config.body_preview_chars;
        self.worker
            .call("search_calendar_events", move |session| {
                let now = Utc::now();
                let span = chrono::Duration::days(i64::from(input.days_range));
                collect_events(
                    session,
                    Some(input.query),
                    now - span,
                    now + span,
                    limit,
                    preview,
                )
            })
            .await
    }

    async fn contacts_impl(&self, input: ContactsInput) -> AppResult<ContactListData> {
        if let Some(name) = &input.search_name {
            validate_text(name, "search_name")?;
        }
        let limit = clamp_limit(
            input.limit,
            self.config.default_contact_limit,
            self.config.max_contact_limit,
        );
        let restriction = input
            .search_name
            .as_ref()
            .map(|name| Restriction::contains(&[TextField::FullName], name.clone()));
        self.worker
            .call("get_contacts", move |session| {
                collect_contacts(session, input.search_name, restriction, limit)
            })
            .await
    }

    async fn search_contacts_impl(&self, input: SearchContactsInput) -> AppResult<ContactListData> {
        validate_text(&input.query, "query")?;
        let limit = clamp_limit(
            input.limit,
            self.config.default_contact_limit,
            self.config.max_contact_limit,
        );
        let restriction = Restriction::contains(&CONTACT_SEARCH_FIELDS, input.query.clone());
        self.worker
            .call("search_contacts", move |session| {
                collect_contacts(session, Some(input.query), Some(restriction), limit)
            })
            .await
    }

    async fn cache_status_impl(&self) -> AppResult<CacheStatusData> {
        self.worker
            .call("folder_cache_status", |session| {
                let stats = session.cache.stats();
                Ok(CacheStatusData {
                    entries: stats.entries,
                    hits: stats.hits,
                    misses: stats.misses,
                    paths: session.cache.keys(),
                })
            })
            .await
    }

    async fn clear_cache_impl(&self, input: ClearFolderCacheInput) -> AppResult<CacheClearData> {
        let path = input
            .folder_path
            .as_deref()
            .map(validate_folder_path)
            .transpose()?;
        self.worker
            .call("clear_folder_cache", move |session| {
                let evicted = match &path {
                    Some(path) => usize::from(session.cache.remove(&path.key())),
                    None => session.cache.clear(),
                };
                tracing::info!(evicted, "folder cache invalidated");
                Ok(CacheClearData {
                    folder_path: path.map(|p| p.key()),
                    evicted,
                })
            })
            .await
    }

    /// Decode the caller's lookback, falling back to the configured default
    fn lookback(&self, days_back: Option<i64>) -> Lookback {
        Lookback::from_days_back(
            days_back.unwrap_or_else(|| i64::from(self.config.default_lookback_days)),
        )
    }

    /// Enumerate one or more mail folders until the limit is reached
    async fn run_email_job(&self, label: &'static str, job: EmailJob) -> AppResult<EmailListData> {
        let limits = self.config.window_limits();
        let preview = self.config.body_preview_chars;
        let window = WindowSpec::new(job.lookback, job.limit, limits);
        self.worker
            .call(label, move |session| {
                let now = Utc::now();
                let mut emails = Vec::new();
                let mut scans = Vec::new();
                for target in job.targets {
                    let remaining = window.result_cap().saturating_sub(emails.len());
                    if remaining == 0 {
                        break;
                    }
                    let folder_window = WindowSpec::new(window.lookback(), remaining, limits);
                    scans.push(scan_mail_folder(
                        session,
                        &target,
                        folder_window,
                        job.extra.clone(),
                        now,
                        preview,
                        &mut emails,
                    )?);
                }
                Ok(EmailListData {
                    query: job.query,
                    window: WindowInfo {
                        days_back: window.lookback().days(),
                        since_utc: window.lookback().cutoff(now).map(rfc3339),
                        limit: window.result_cap(),
                    },
                    scans,
                    emails,
                })
            })
            .await
    }
}

/// Resolve one mail folder and append its windowed items to `emails`
fn scan_mail_folder(
    session: &mut HostSession,
    target: &MailTarget,
    window: WindowSpec,
    extra: Option<Restriction>,
    now: DateTime<Utc>,
    preview_chars: usize,
    emails: &mut Vec<EmailRecord>,
) -> AppResult<FolderScan> {
    let (folder, label, folder_uri, cached, window) = match target {
        MailTarget::Default(kind) => {
            let window = if *kind == DefaultFolder::Sent {
                window.on(TimeField::SentOn)
            } else {
                window
            };
            let handle = session.host.default_folder(*kind)?;
            (handle, kind.as_str().to_owned(), None, None, window)
        }
        MailTarget::Path(path) => {
            let resolved = session.resolve(path)?;
            let uri = build_folder_uri(&resolved.path);
            (resolved.handle, resolved.path, Some(uri), Some(resolved.cached), window)
        }
    };

    let host = session.host.as_mut();
    let records = enumerate_window(host, folder, &window, extra, now)?
        .drain(host, |host, item| {
            materialize::email(host, item, &label, preview_chars)
        })?;
    emails.extend(records.records);
    Ok(folder_scan(label, folder_uri, cached, &records.report))
}

/// Calendar enumeration shared by listing and search
fn collect_events(
    session: &mut HostSession,
    query: Option<String>,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    limit: usize,
    preview_chars: usize,
) -> AppResult<EventListData> {
    let text = query
        .as_ref()
        .map(|q| Restriction::contains(&EVENT_SEARCH_FIELDS, q.clone()));
    let scan_budget = text.as_ref().map(|_| limit.saturating_mul(TEXT_SCAN_FACTOR));
    let restriction = Restriction::all(
        [
            Restriction::OnOrAfter(TimeField::Start, start),
            Restriction::OnOrBefore(TimeField::End, end),
        ]
        .into_iter()
        .chain(text),
    );

    let host = session.host.as_mut();
    let calendar = host.default_folder(DefaultFolder::Calendar)?;
    let window = scan(
        host,
        calendar,
        ScanRequest {
            sort: SortSpec::oldest_first(TimeField::Start),
            restriction,
            include_recurrences: true,
            cap: limit,
            scan_budget,
        },
    )?
    .drain(host, |host, item| materialize::event(host, item, preview_chars))?;

    Ok(EventListData {
        query,
        range_start: rfc3339(start),
        range_end: rfc3339(end),
        scan: folder_scan(
            DefaultFolder::Calendar.as_str().to_owned(),
            None,
            None,
            &window.report,
        ),
        events: window.records,
    })
}

/// Contact enumeration shared by listing and search
fn collect_contacts(
    session: &mut HostSession,
    query: Option<String>,
    restriction: Option<Restriction>,
    limit: usize,
) -> AppResult<ContactListData> {
    let scan_budget = restriction
        .as_ref()
        .map(|_| limit.saturating_mul(TEXT_SCAN_FACTOR));
    let host = session.host.as_mut();
    let contacts = host.default_folder(DefaultFolder::Contacts)?;
    let window = scan(
        host,
        contacts,
        ScanRequest {
            sort: SortSpec::alphabetical(TextField::FullName),
            restriction,
            include_recurrences: false,
            cap: limit,
            scan_budget,
        },
    )?
    .drain(host, materialize::contact)?;

    Ok(ContactListData {
        query,
        scan: folder_scan(
            DefaultFolder::Contacts.as_str().to_owned(),
            None,
            None,
            &window.report,
        ),
        contacts: window.records,
    })
}

fn folder_scan(
    folder: String,
    folder_uri: Option<String>,
    cached: Option<bool>,
    report: &EnumerationReport,
) -> FolderScan {
    FolderScan {
        folder,
        folder_uri,
        cached,
        returned: report.yielded,
        scanned: report.scanned,
        skipped: report.skipped,
        end_reason: report.end_reason.as_str().to_owned(),
        truncated: report.end_reason.truncated(),
    }
}

fn email_summary(data: EmailListData) -> (String, EmailListData) {
    let window = match data.window.days_back {
        Some(days) => format!("last {days} day(s)"),
        None => "all mail".to_owned(),
    };
    let truncated = if data.scans.iter().any(|s| s.truncated) {
        " (more may exist)"
    } else {
        ""
    };
    (
        format!("{} email(s) from {window}{truncated}", data.emails.len()),
        data,
    )
}

fn event_summary(data: EventListData) -> (String, EventListData) {
    (format!("{} event(s)", data.events.len()), data)
}

fn contact_summary(data: ContactListData) -> (String, ContactListData) {
    (format!("{} contact(s)", data.contacts.len()), data)
}

/// Calculate elapsed milliseconds
fn duration_ms(started: Instant) -> u64 {
    started.elapsed().as_millis().min(u128::from(u64::MAX)) as u64
}

/// Build a standardized MCP tool response envelope from business logic output
fn finalize_tool<T>(
    started: Instant,
    result: AppResult<(String, T)>,
) -> Result<Json<ToolEnvelope<T>>, ErrorData>
where
    T: schemars::JsonSchema,
{
    match result {
        Ok((summary, data)) => Ok(Json(ToolEnvelope {
            summary,
            data,
            meta: Meta::now(duration_ms(started)),
        })),
        Err(e) => Err(e.to_error_data()),
    }
}

/// Validate path or search text bounds and characters
fn validate_text(value: &str, field: &str) -> AppResult<()> {
    let chars = value.chars().count();
    if chars == 0 || chars > MAX_TEXT_CHARS {
        return Err(AppError::InvalidInput(format!(
            "{field} must be 1..{MAX_TEXT_CHARS} characters"
        )));
    }
    validate_no_controls(value, field)
}

/// Reject control characters in user-provided values
fn validate_no_controls(value: &str, field: &str) -> AppResult<()> {
    if value.chars().any(char::is_control) {
        return Err(AppError::InvalidInput(format!(
            "{field} must not contain control characters"
        )));
    }
    Ok(())
}

fn validate_folder_path(raw: &str) -> AppResult<StorePath> {
    validate_text(raw, "folder_path")?;
    StorePath::parse(raw)
}

fn validate_days(value: u32, field: &str) -> AppResult<()> {
    if !(1..=MAX_CALENDAR_DAYS).contains(&value) {
        return Err(AppError::InvalidInput(format!(
            "{field} must be in range 1..{MAX_CALENDAR_DAYS}"
        )));
    }
    Ok(())
}

/// Apply a default and clamp into `1..=max`
fn clamp_limit(requested: Option<usize>, default: usize, max: usize) -> usize {
    requested.unwrap_or(default).clamp(1, max.max(1))
}

fn rfc3339(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Local midnight at the start of `date`, as UTC
fn local_midnight(date: NaiveDate, fallback: DateTime<Utc>) -> DateTime<Utc> {
    date.and_hms_opt(0, 0, 0)
        .and_then(|naive| naive.and_local_timezone(Local).earliest())
        .map_or(fallback, |local| local.with_timezone(&Utc))
}

/// Last second of the local day `days_ahead` days after `today`, as UTC
fn end_of_day(today: NaiveDate, days_ahead: u32, fallback: DateTime<Utc>) -> DateTime<Utc> {
    today
        .checked_add_days(Days::new(u64::from(days_ahead) + 1))
        .map_or(fallback, |next| {
            local_midnight(next, fallback) - chrono::Duration::seconds(1)
        })
}

/// Build folder URI for display
fn build_folder_uri(path: &str) -> String {
    format!("outlook://folder/{}", urlencoding::encode(path))
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;
    use std::time::Duration;

    use chrono::{DateTime, Local, NaiveDate, Timelike, Utc};

    use super::{
        OutlookServer, build_folder_uri, clamp_limit, end_of_day, local_midnight, validate_days,
        validate_folder_path, validate_text,
    };
    use crate::config::ServerConfig;
    use crate::errors::AppError;
    use crate::host::{AutomationHost, DefaultFolder, RuleAction, RuleCondition, RuleInfo};
    use crate::memory_host::{InMemoryHost, ItemRecord, Recurrence};
    use crate::models::{
        CalendarEventsInput, ClearFolderCacheInput, ContactsInput, EventRecord, InboxEmailsInput,
        ListFoldersInput, MailFolderChoice, SearchCalendarInput, SearchContactsInput,
        SearchEmailsInput, SearchFolderInput,
    };
    use crate::worker::HostWorker;

    fn config() -> ServerConfig {
        ServerConfig {
            profile_path: PathBuf::from("unused.json"),
            excluded_stores: vec!["Team Mailbox".to_owned()],
            default_lookback_days: 2,
            max_lookback_days: 0,
            default_email_limit: 5,
            max_result_cap: 50,
            default_contact_limit: 50,
            max_contact_limit: 200,
            max_event_limit: 100,
            body_preview_chars: 500,
            call_timeout_ms: 5_000,
        }
    }

    fn mail(subject: &str, hours_ago: i64, unread: bool) -> ItemRecord {
        let at = Utc::now() - chrono::Duration::hours(hours_ago);
        ItemRecord {
            subject: Some(subject.to_owned()),
            sender_name: Some("Dana".to_owned()),
            body: Some(format!("body of {subject}")),
            received: Some(at),
            sent_on: Some(at),
            unread,
            ..ItemRecord::default()
        }
    }

    fn event(subject: &str, location: &str, start: DateTime<Utc>, hours: i64) -> ItemRecord {
        ItemRecord {
            subject: Some(subject.to_owned()),
            location: Some(location.to_owned()),
            start: Some(start),
            end: Some(start + chrono::Duration::hours(hours)),
            ..ItemRecord::default()
        }
    }

    fn parse(timestamp: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(timestamp)
            .expect("rfc3339 timestamp")
            .with_timezone(&Utc)
    }

    fn subjects(events: &[EventRecord]) -> Vec<&str> {
        events.iter().map(|e| e.subject.as_str()).collect()
    }

    fn profile() -> Box<dyn AutomationHost> {
        let mut host = InMemoryHost::new();
        let me = host.add_store("me@example.com");
        let root = host.store_root(me);
        let inbox = host.add_folder(root, "Inbox");
        let archive = host.add_folder(inbox, "Archive");
        let sent = host.add_folder(root, "Sent Items");
        let drafts = host.add_folder(root, "Drafts");
        let contacts = host.add_folder(root, "Contacts");
        let calendar = host.add_folder(root, "Calendar");
        host.designate(DefaultFolder::Inbox, inbox);
        host.designate(DefaultFolder::Sent, sent);
        host.designate(DefaultFolder::Drafts, drafts);
        host.designate(DefaultFolder::Contacts, contacts);
        host.designate(DefaultFolder::Calendar, calendar);

        host.add_item(inbox, mail("budget review", 1, true));
        host.add_item(inbox, mail("lunch", 5, false));
        host.add_item(inbox, mail("old budget", 24 * 10, true));
        host.add_item(archive, mail("archived budget", 3, false));
        host.add_item(sent, mail("re: budget review", 2, false));
        host.add_item(drafts, mail("budget draft", 4, false));
        for (name, email, company) in [
            ("Zoe Park", "zoe@acme.test", "Acme"),
            ("Ada Lovelace", "ada@analytical.test", "Analytical Engines"),
            ("Grace Hopper", "grace@navy.test", "Navy"),
        ] {
            host.add_item(
                contacts,
                ItemRecord {
                    full_name: Some(name.to_owned()),
                    email1: Some(email.to_owned()),
                    company: Some(company.to_owned()),
                    ..ItemRecord::default()
                },
            );
        }

        let now = Utc::now();
        host.add_item(
            calendar,
            ItemRecord {
                recurrence: Some(Recurrence {
                    interval_days: 1,
                    occurrences: 10,
                }),
                ..event("standup", "Room 1", now + chrono::Duration::hours(2), 1)
            },
        );
        host.add_item(
            calendar,
            event("offsite", "Lisbon", now + chrono::Duration::days(3), 8),
        );
        host.add_item(
            calendar,
            event("design review", "Room 2", now - chrono::Duration::days(3), 1),
        );
        host.add_item(
            calendar,
            event("conference", "Berlin", now + chrono::Duration::days(20), 8),
        );

        host.add_rule(RuleInfo {
            name: "Newsletters".to_owned(),
            enabled: true,
            conditions: vec![RuleCondition::SubjectContains {
                words: vec!["digest".to_owned()],
            }],
            actions: vec![RuleAction::MoveToFolder {
                folder: Some("Inbox/Archive".to_owned()),
            }],
            exceptions: Vec::new(),
        });
        host.add_rule(RuleInfo {
            name: "Vacation".to_owned(),
            enabled: false,
            conditions: Vec::new(),
            actions: vec![RuleAction::Forward {
                names: vec!["Grace Hopper".to_owned()],
            }],
            exceptions: vec![RuleCondition::From {
                names: vec!["Zoe Park".to_owned()],
            }],
        });

        let team = host.add_store("Team Mailbox");
        host.add_folder(host.store_root(team), "Shared");
        Box::new(host)
    }

    fn server() -> OutlookServer {
        let config = config();
        let worker = HostWorker::spawn(
            || Ok(profile()),
            config.exclusions(),
            Duration::from_millis(config.call_timeout_ms),
        )
        .expect("worker spawns");
        OutlookServer::new(config, worker)
    }

    #[test]
    fn rejects_control_chars_in_search_text() {
        let err = validate_text("hello\nworld", "query").expect_err("must fail");
        assert!(err.to_string().contains("control characters"));
    }

    #[test]
    fn rejects_empty_and_oversized_text() {
        validate_text("", "query").expect_err("must fail");
        validate_text(&"x".repeat(257), "query").expect_err("must fail");
        validate_text(&"é".repeat(256), "query").expect("256 characters are allowed");
    }

    #[test]
    fn folder_path_validation_rejects_empty_segments() {
        let err = validate_folder_path("Inbox//Archive").expect_err("must fail");
        assert!(matches!(err, AppError::InvalidInput(_)));
        assert_eq!(
            validate_folder_path("Inbox/Archive").expect("valid").key(),
            "Inbox/Archive"
        );
    }

    #[test]
    fn limits_are_clamped_not_rejected() {
        assert_eq!(clamp_limit(None, 5, 50), 5);
        assert_eq!(clamp_limit(Some(0), 5, 50), 1);
        assert_eq!(clamp_limit(Some(1000), 5, 50), 50);
    }

    #[test]
    fn day_ranges_are_bounded() {
        validate_days(1, "days_ahead").expect("lower bound");
        validate_days(365, "days_ahead").expect("upper bound");
        validate_days(0, "days_ahead").expect_err("must fail");
        validate_days(366, "days_range").expect_err("must fail");
    }

    #[test]
    fn folder_uri_encodes_path() {
        assert_eq!(
            build_folder_uri("Inbox/Archive 2024"),
            "outlook://folder/Inbox%2FArchive%202024"
        );
    }

    #[test]
    fn unknown_folder_keyword_is_rejected() {
        let parsed: Result<SearchEmailsInput, _> =
            serde_json::from_value(serde_json::json!({ "query": "x", "folder": "outbox" }));
        assert!(parsed.is_err());
        let parsed: SearchEmailsInput =
            serde_json::from_value(serde_json::json!({ "query": "x" })).expect("defaults apply");
        assert_eq!(parsed.folder, MailFolderChoice::Inbox);
        assert_eq!(parsed.limit, 20);
    }

    #[tokio::test]
    async fn inbox_uses_default_window_and_unread_filter() {
        let server = server();
        let data = server
            .inbox_emails_impl(InboxEmailsInput::default())
            .await
            .expect("inbox lists");
        let subjects: Vec<&str> = data.emails.iter().map(|e| e.subject.as_str()).collect();
        assert_eq!(subjects, vec!["budget review", "lunch"]);
        assert_eq!(data.window.days_back, Some(2));

        let data = server
            .inbox_emails_impl(InboxEmailsInput {
                unread_only: true,
                days_back: Some(0),
                ..InboxEmailsInput::default()
            })
            .await
            .expect("inbox lists");
        let subjects: Vec<&str> = data.emails.iter().map(|e| e.subject.as_str()).collect();
        assert_eq!(subjects, vec!["budget review", "old budget"]);
        assert_eq!(data.window.days_back, None);
    }

    #[tokio::test]
    async fn search_all_spans_inbox_sent_and_drafts_until_limit() {
        let server = server();
        let data = server
            .search_emails_impl(SearchEmailsInput {
                query: "budget".to_owned(),
                folder: MailFolderChoice::All,
                limit: 3,
                days_back: None,
            })
            .await
            .expect("search runs");
        let found: Vec<(&str, &str)> = data
            .emails
            .iter()
            .map(|e| (e.folder.as_str(), e.subject.as_str()))
            .collect();
        assert_eq!(
            found,
            vec![
                ("inbox", "budget review"),
                ("sent", "re: budget review"),
                ("drafts", "budget draft"),
            ]
        );
        assert_eq!(data.scans.len(), 3);
    }

    #[tokio::test]
    async fn search_folder_resolves_once_then_hits_cache() {
        let server = server();
        let input = SearchFolderInput {
            folder_path: "Inbox/Archive".to_owned(),
            query: Some("budget".to_owned()),
            limit: 20,
            days_back: Some(1),
        };
        let first = server
            .search_folder_impl(input.clone())
            .await
            .expect("search runs");
        assert_eq!(first.emails.len(), 1);
        assert_eq!(first.scans[0].cached, Some(false));
        assert_eq!(
            first.scans[0].folder_uri.as_deref(),
            Some("outlook://folder/Inbox%2FArchive")
        );

        let second = server.search_folder_impl(input).await.expect("search runs");
        assert_eq!(second.scans[0].cached, Some(true));

        let status = server.cache_status_impl().await.expect("status");
        assert_eq!(status.paths, vec!["Inbox/Archive"]);
        assert_eq!(status.hits, 1);
    }

    #[tokio::test]
    async fn unknown_folder_path_reports_siblings() {
        let server = server();
        let err = server
            .search_folder_impl(SearchFolderInput {
                folder_path: "Inbox/Archiv".to_owned(),
                query: None,
                limit: 20,
                days_back: None,
            })
            .await
            .expect_err("must fail");
        match err {
            AppError::FolderNotFound { siblings, .. } => assert_eq!(siblings, vec!["Archive"]),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn clear_cache_evicts_single_path_or_everything() {
        let server = server();
        for path in ["Inbox", "Inbox/Archive"] {
            server
                .search_folder_impl(SearchFolderInput {
                    folder_path: path.to_owned(),
                    query: None,
                    limit: 1,
                    days_back: None,
                })
                .await
                .expect("search runs");
        }
        let cleared = server
            .clear_cache_impl(ClearFolderCacheInput {
                folder_path: Some("Inbox".to_owned()),
            })
            .await
            .expect("clear runs");
        assert_eq!(cleared.evicted, 1);
        let cleared = server
            .clear_cache_impl(ClearFolderCacheInput::default())
            .await
            .expect("clear runs");
        assert_eq!(cleared.evicted, 1);
        assert_eq!(server.cache_status_impl().await.expect("status").entries, 0);
    }

    #[tokio::test]
    async fn folder_listing_hides_excluded_stores() {
        let server = server();
        let data = server
            .list_folders_impl(ListFoldersInput::default())
            .await
            .expect("listing");
        assert!(data.folders.iter().all(|f| f.store == "me@example.com"));
        let stores = server.list_stores_impl().await.expect("stores");
        assert_eq!(stores.stores.len(), 1);
        assert!(stores.stores[0].is_default);
        assert_eq!(stores.excluded, vec!["Team Mailbox"]);
    }

    #[tokio::test]
    async fn contacts_are_alphabetical_and_filterable() {
        let server = server();
        let data = server
            .contacts_impl(ContactsInput::default())
            .await
            .expect("contacts list");
        let names: Vec<&str> = data.contacts.iter().map(|c| c.full_name.as_str()).collect();
        assert_eq!(names, vec!["Ada Lovelace", "Grace Hopper", "Zoe Park"]);

        let data = server
            .contacts_impl(ContactsInput {
                limit: None,
                search_name: Some("hop".to_owned()),
            })
            .await
            .expect("contacts list");
        assert_eq!(data.contacts.len(), 1);
        assert_eq!(data.contacts[0].full_name, "Grace Hopper");
    }

    #[test]
    fn local_day_bounds_follow_the_local_calendar() {
        let day = NaiveDate::from_ymd_opt(2026, 3, 10).expect("valid date");
        let fallback = Utc::now();

        let midnight = local_midnight(day, fallback).with_timezone(&Local);
        assert_eq!(midnight.date_naive(), day);
        assert_eq!((midnight.hour(), midnight.minute(), midnight.second()), (0, 0, 0));

        let end = end_of_day(day, 1, fallback).with_timezone(&Local);
        assert_eq!(end.date_naive(), NaiveDate::from_ymd_opt(2026, 3, 11).expect("valid date"));
        assert_eq!((end.hour(), end.minute(), end.second()), (23, 59, 59));

        let same_day = end_of_day(day, 0, fallback).with_timezone(&Local);
        assert_eq!(same_day.date_naive(), day);
    }

    #[tokio::test]
    async fn calendar_events_cover_days_ahead_with_occurrences_in_start_order() {
        let server = server();
        let before = Utc::now();
        let data = server
            .calendar_events_impl(CalendarEventsInput {
                days_ahead: 7,
                include_past: false,
                limit: None,
            })
            .await
            .expect("calendar lists");

        let range_start = parse(&data.range_start);
        let range_end = parse(&data.range_end);
        assert!(range_start >= before - chrono::Duration::seconds(1));
        assert!(range_end > before + chrono::Duration::days(6));

        let found = subjects(&data.events);
        assert!(found.contains(&"offsite"));
        assert!(!found.contains(&"design review"));
        assert!(!found.contains(&"conference"));
        // At least seven daily occurrences start within the next seven days.
        assert!(found.iter().filter(|s| **s == "standup").count() >= 7);

        let starts: Vec<DateTime<Utc>> = data
            .events
            .iter()
            .map(|e| parse(e.start.as_deref().expect("events have a start")))
            .collect();
        assert!(starts.windows(2).all(|pair| pair[0] <= pair[1]));
        assert!(starts.iter().all(|t| *t >= range_start));
        assert!(data.events.iter().all(|e| parse(e.end.as_deref().expect("end")) <= range_end));
    }

    #[tokio::test]
    async fn calendar_events_start_at_local_midnight_with_include_past() {
        let server = server();
        let data = server
            .calendar_events_impl(CalendarEventsInput {
                days_ahead: 1,
                include_past: true,
                limit: Some(1),
            })
            .await
            .expect("calendar lists");

        let range_start = parse(&data.range_start).with_timezone(&Local);
        assert_eq!((range_start.hour(), range_start.minute()), (0, 0));
        assert!(range_start <= Local::now());
        assert_eq!(subjects(&data.events), vec!["standup"]);
        assert!(data.scan.truncated);
    }

    #[tokio::test]
    async fn calendar_search_matches_subject_or_location_within_range() {
        let server = server();
        let data = server
            .search_calendar_impl(SearchCalendarInput {
                query: "lisbon".to_owned(),
                days_range: 7,
                limit: None,
            })
            .await
            .expect("search runs");
        assert_eq!(subjects(&data.events), vec!["offsite"]);
        assert_eq!(data.query.as_deref(), Some("lisbon"));

        let data = server
            .search_calendar_impl(SearchCalendarInput {
                query: "review".to_owned(),
                days_range: 5,
                limit: None,
            })
            .await
            .expect("search runs");
        assert_eq!(subjects(&data.events), vec!["design review"]);

        let data = server
            .search_calendar_impl(SearchCalendarInput {
                query: "review".to_owned(),
                days_range: 1,
                limit: None,
            })
            .await
            .expect("search runs");
        assert!(data.events.is_empty());

        // Only the first daily occurrence falls inside one day either side.
        let data = server
            .search_calendar_impl(SearchCalendarInput {
                query: "STANDUP".to_owned(),
                days_range: 1,
                limit: None,
            })
            .await
            .expect("search runs");
        assert_eq!(subjects(&data.events), vec!["standup"]);
    }

    #[tokio::test]
    async fn calendar_search_rejects_bad_input() {
        let server = server();
        let err = server
            .search_calendar_impl(SearchCalendarInput {
                query: "x".to_owned(),
                days_range: 0,
                limit: None,
            })
            .await
            .expect_err("must fail");
        assert!(matches!(err, AppError::InvalidInput(_)));
        let err = server
            .search_calendar_impl(SearchCalendarInput {
                query: String::new(),
                days_range: 7,
                limit: None,
            })
            .await
            .expect_err("must fail");
        assert!(matches!(err, AppError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn contact_search_matches_name_email_or_company() {
        let server = server();
        let data = server
            .search_contacts_impl(SearchContactsInput {
                query: "acme".to_owned(),
                limit: None,
            })
            .await
            .expect("search runs");
        let names: Vec<&str> = data.contacts.iter().map(|c| c.full_name.as_str()).collect();
        assert_eq!(names, vec!["Zoe Park"]);

        let data = server
            .search_contacts_impl(SearchContactsInput {
                query: "analytical.test".to_owned(),
                limit: None,
            })
            .await
            .expect("search runs");
        assert_eq!(data.contacts[0].full_name, "Ada Lovelace");
        assert_eq!(data.contacts.len(), 1);

        let data = server
            .search_contacts_impl(SearchContactsInput {
                query: "a".to_owned(),
                limit: Some(2),
            })
            .await
            .expect("search runs");
        let names: Vec<&str> = data.contacts.iter().map(|c| c.full_name.as_str()).collect();
        assert_eq!(names, vec!["Ada Lovelace", "Grace Hopper"]);
        assert!(data.scan.truncated);
    }

    #[tokio::test]
    async fn rules_are_listed_with_descriptions() {
        let server = server();
        let data = server.rules_impl().await.expect("rules list");
        assert_eq!(data.rules.len(), 2);

        let newsletters = &data.rules[0];
        assert_eq!(newsletters.name, "Newsletters");
        assert!(newsletters.enabled);
        assert_eq!(
            newsletters.description,
            "When: Subject contains: digest | Then: Move to folder: Inbox/Archive"
        );

        let vacation = &data.rules[1];
        assert!(!vacation.enabled);
        assert_eq!(vacation.actions, vec!["Forward to: Grace Hopper"]);
        assert_eq!(vacation.exceptions, vec!["Except from: Zoe Park"]);
        assert_eq!(
            vacation.description,
            "Then: Forward to: Grace Hopper | Except: Except from: Zoe Park"
        );
    }
}
