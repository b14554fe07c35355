//! Automation host boundary
//!
//! The mail client is reachable only through a synchronous, single-threaded
//! automation interface. This module describes that interface as the
//! [`AutomationHost`] trait: every method blocks the calling thread until the
//! host answers, and the host cannot service anyone else meanwhile.
//!
//! Handles are plain ids owned by the host. Holding one does not keep the
//! underlying object alive; validity is only guaranteed within the session
//! that produced it.
//!
//! The trait has no cursor (first/next) primitive. The only cardinality
//! query ([`AutomationHost::item_count`]) is reserved for the
//! opt-in folder statistics listing.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::filter::Restriction;

/// Opaque store (mailbox) reference
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StoreId(pub u64);

/// Opaque, non-owning folder reference
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FolderHandle(pub u64);

/// Opaque reference to a (possibly restricted and sorted) item collection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ItemsHandle(pub u64);

/// Opaque item reference
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ItemHandle(pub u64);

/// Store as reported by the profile
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreInfo {
    pub id: StoreId,
    pub display_name: String,
}

/// Immediate child of a folder
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FolderEntry {
    pub name: String,
    pub handle: FolderHandle,
}

/// Well-known folders of the primary store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DefaultFolder {
    Inbox,
    Sent,
    Drafts,
    Deleted,
    Outbox,
    Junk,
    Calendar,
    Contacts,
}

impl DefaultFolder {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Inbox => "inbox",
            Self::Sent => "sent",
            Self::Drafts => "drafts",
            Self::Deleted => "deleted",
            Self::Outbox => "outbox",
            Self::Junk => "junk",
            Self::Calendar => "calendar",
            Self::Contacts => "contacts",
        }
    }
}

/// Timestamp properties of an item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimeField {
    Received,
    SentOn,
    Start,
    End,
}

/// Text properties of an item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextField {
    Subject,
    Body,
    SenderName,
    SenderEmail,
    To,
    Cc,
    Bcc,
    Categories,
    Location,
    Organizer,
    RequiredAttendees,
    OptionalAttendees,
    FullName,
    Email1,
    Email2,
    Email3,
    Company,
    JobTitle,
    BusinessPhone,
    MobilePhone,
    HomePhone,
    BusinessAddress,
}

/// Boolean properties of an item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FlagField {
    Unread,
    AllDayEvent,
    ReminderSet,
}

/// Integer properties of an item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NumberField {
    Importance,
    AttachmentCount,
    BusyStatus,
    ReminderMinutes,
}

/// Property a collection can be sorted by
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortKey {
    Time(TimeField),
    Text(TextField),
}

/// Server-side sort request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SortSpec {
    pub key: SortKey,
    pub descending: bool,
}

impl SortSpec {
    pub fn newest_first(field: TimeField) -> Self {
        Self {
            key: SortKey::Time(field),
            descending: true,
        }
    }

    pub fn oldest_first(field: TimeField) -> Self {
        Self {
            key: SortKey::Time(field),
            descending: false,
        }
    }

    pub fn alphabetical(field: TextField) -> Self {
        Self {
            key: SortKey::Text(field),
            descending: false,
        }
    }
}

/// One condition (or exception) of a mail rule
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RuleCondition {
    SubjectContains { words: Vec<String> },
    BodyContains { words: Vec<String> },
    From { names: Vec<String> },
    SentTo { names: Vec<String> },
    Cc { names: Vec<String> },
    Category { categories: Vec<String> },
    /// Raw importance level: 0 low, 1 normal, 2 high
    Importance { level: i64 },
}

/// One action of a mail rule
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RuleAction {
    /// Target folder path; `None` when the host cannot name the folder
    MoveToFolder {
        #[serde(default)]
        folder: Option<String>,
    },
    CopyToFolder {
        #[serde(default)]
        folder: Option<String>,
    },
    Delete,
    MarkAsRead,
    AssignCategory { categories: Vec<String> },
    Forward { names: Vec<String> },
    Redirect { names: Vec<String> },
}

/// Mail rule of the primary store, with only its enabled parts
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleInfo {
    pub name: String,
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub conditions: Vec<RuleCondition>,
    #[serde(default)]
    pub actions: Vec<RuleAction>,
    #[serde(default)]
    pub exceptions: Vec<RuleCondition>,
}

/// Failures reported by the automation host
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum HostError {
    /// The host process cannot be reached
    #[error("automation host unavailable: {0}")]
    Unavailable(String),
    /// Positional access past the end of a collection
    #[error("position {0} is out of range")]
    OutOfRange(usize),
    /// The item exists in the collection but cannot be read (e.g. deleted)
    #[error("item could not be dereferenced: {0}")]
    Dereference(String),
    /// The host refused a restriction predicate
    #[error("restriction rejected: {0}")]
    Rejected(String),
    /// The host has no server-side restriction support
    #[error("restrictions are not supported by this host")]
    Unsupported,
    /// A handle from an earlier session or a removed object
    #[error("stale handle: {0}")]
    Stale(String),
}

pub type HostResult<T> = Result<T, HostError>;

/// Blocking automation interface of the mail client
///
/// Implementations are not required to be thread-safe. All calls are made
/// from the single worker thread that owns the host
/// (see [`crate::worker::HostWorker`]).
pub trait AutomationHost {
    /// All stores attached to the profile, in host order
    fn stores(&mut self) -> HostResult<Vec<StoreInfo>>;

    /// The primary store of the profile
    fn default_store(&mut self) -> HostResult<StoreId>;

    /// Root folder of a store
    fn root_folder(&mut self, store: StoreId) -> HostResult<FolderHandle>;

    /// Immediate children of a folder (one tree-walk step)
    fn child_folders(&mut self, folder: FolderHandle) -> HostResult<Vec<FolderEntry>>;

    /// Display name of a folder; fails with `Stale` for dead handles
    fn folder_name(&mut self, folder: FolderHandle) -> HostResult<String>;

    /// Well-known folder of the primary store
    fn default_folder(&mut self, kind: DefaultFolder) -> HostResult<FolderHandle>;

    /// Total items in a folder. Slow on large folders.
    fn item_count(&mut self, folder: FolderHandle) -> HostResult<usize>;

    /// Unread items in a folder. Slow on large folders.
    fn unread_count(&mut self, folder: FolderHandle) -> HostResult<usize>;

    /// Unfiltered item collection of a folder
    fn items(&mut self, folder: FolderHandle) -> HostResult<ItemsHandle>;

    /// Give up a collection; its handle is stale afterwards
    fn release(&mut self, items: ItemsHandle);

    /// Apply a server-side restriction, producing a new collection
    ///
    /// The result keeps the order and recurrence expansion of `items`.
    fn restrict(
        &mut self,
        items: ItemsHandle,
        restriction: &Restriction,
    ) -> HostResult<ItemsHandle>;

    /// Sort a collection in place on the host
    fn sort(&mut self, items: ItemsHandle, order: SortSpec) -> HostResult<()>;

    /// Expand recurring appointments into individual occurrences
    ///
    /// Occurrences come out in start order only when the collection was
    /// sorted by start beforehand.
    fn include_recurrences(&mut self, items: ItemsHandle, include: bool) -> HostResult<()>;

    /// Direct 1-based positional access; `OutOfRange` past the end
    fn item_at(&mut self, items: ItemsHandle, position: usize) -> HostResult<ItemHandle>;

    fn item_text(&mut self, item: ItemHandle, field: TextField) -> HostResult<Option<String>>;

    fn item_time(
        &mut self,
        item: ItemHandle,
        field: TimeField,
    ) -> HostResult<Option<DateTime<Utc>>>;

    fn item_flag(&mut self, item: ItemHandle, field: FlagField) -> HostResult<bool>;

    fn item_number(&mut self, item: ItemHandle, field: NumberField) -> HostResult<Option<i64>>;

    /// Mail rules of the primary store, in execution order
    fn rules(&mut self) -> HostResult<Vec<RuleInfo>>;
}
