//! In-process automation host backed by a profile snapshot
//!
//! [`InMemoryHost`] implements [`AutomationHost`] over stores, folders and
//! items held in memory. The server loads it from a JSON snapshot of a
//! profile; tests build it programmatically and use its call counters to
//! observe which host primitives an operation touched.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::fs;
use std::path::Path;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::filter::{FieldSource, Restriction};
use crate::host::{
    AutomationHost, DefaultFolder, FlagField, FolderEntry, FolderHandle, HostError, HostResult,
    ItemHandle, ItemsHandle, NumberField, RuleInfo, SortKey, SortSpec, StoreId, StoreInfo,
    TextField, TimeField,
};

/// A single mail, appointment or contact item
///
/// Every property is optional so one record type covers all item kinds.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ItemRecord {
    pub subject: Option<String>,
    pub body: Option<String>,
    pub sender_name: Option<String>,
    pub sender_email: Option<String>,
    pub to: Option<String>,
    pub cc: Option<String>,
    pub bcc: Option<String>,
    pub categories: Option<String>,
    pub received: Option<DateTime<Utc>>,
    pub sent_on: Option<DateTime<Utc>>,
    pub unread: bool,
    pub importance: Option<i64>,
    pub attachment_count: Option<i64>,
    pub location: Option<String>,
    pub organizer: Option<String>,
    pub required_attendees: Option<String>,
    pub optional_attendees: Option<String>,
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
    pub all_day_event: bool,
    pub reminder_set: bool,
    pub reminder_minutes: Option<i64>,
    pub busy_status: Option<i64>,
    pub recurrence: Option<Recurrence>,
    pub full_name: Option<String>,
    pub email1: Option<String>,
    pub email2: Option<String>,
    pub email3: Option<String>,
    pub company: Option<String>,
    pub job_title: Option<String>,
    pub business_phone: Option<String>,
    pub mobile_phone: Option<String>,
    pub home_phone: Option<String>,
    pub business_address: Option<String>,
}

/// Fixed-interval repetition of an appointment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recurrence {
    pub interval_days: u32,
    pub occurrences: u32,
}

impl ItemRecord {
    fn text(&self, field: TextField) -> Option<&String> {
        match field {
            TextField::Subject => self.subject.as_ref(),
            TextField::Body => self.body.as_ref(),
            TextField::SenderName => self.sender_name.as_ref(),
            TextField::SenderEmail => self.sender_email.as_ref(),
            TextField::To => self.to.as_ref(),
            TextField::Cc => self.cc.as_ref(),
            TextField::Bcc => self.bcc.as_ref(),
            TextField::Categories => self.categories.as_ref(),
            TextField::Location => self.location.as_ref(),
            TextField::Organizer => self.organizer.as_ref(),
            TextField::RequiredAttendees => self.required_attendees.as_ref(),
            TextField::OptionalAttendees => self.optional_attendees.as_ref(),
            TextField::FullName => self.full_name.as_ref(),
            TextField::Email1 => self.email1.as_ref(),
            TextField::Email2 => self.email2.as_ref(),
            TextField::Email3 => self.email3.as_ref(),
            TextField::Company => self.company.as_ref(),
            TextField::JobTitle => self.job_title.as_ref(),
            TextField::BusinessPhone => self.business_phone.as_ref(),
            TextField::MobilePhone => self.mobile_phone.as_ref(),
            TextField::HomePhone => self.home_phone.as_ref(),
            TextField::BusinessAddress => self.business_address.as_ref(),
        }
    }

    fn time(&self, field: TimeField, occurrence: u32) -> Option<DateTime<Utc>> {
        let shift = self
            .recurrence
            .map(|r| Duration::days(i64::from(r.interval_days) * i64::from(occurrence)))
            .unwrap_or_else(Duration::zero);
        match field {
            TimeField::Received => self.received,
            TimeField::SentOn => self.sent_on,
            TimeField::Start => self.start.map(|t| t + shift),
            TimeField::End => self.end.map(|t| t + shift),
        }
    }

    fn flag(&self, field: FlagField) -> bool {
        match field {
            FlagField::Unread => self.unread,
            FlagField::AllDayEvent => self.all_day_event,
            FlagField::ReminderSet => self.reminder_set,
        }
    }

    fn number(&self, field: NumberField) -> Option<i64> {
        match field {
            NumberField::Importance => self.importance,
            NumberField::AttachmentCount => self.attachment_count,
            NumberField::BusyStatus => self.busy_status,
            NumberField::ReminderMinutes => self.reminder_set.then_some(self.reminder_minutes).flatten(),
        }
    }
}

/// JSON profile snapshot
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProfileSnapshot {
    /// Display name of the primary store (defaults to the first store)
    #[serde(default)]
    pub default_store: Option<String>,
    /// Emulate a host that cannot (or will not) restrict collections
    #[serde(default)]
    pub restrictions: RestrictionMode,
    pub stores: Vec<StoreSnapshot>,
    /// Mail rules of the primary store
    #[serde(default)]
    pub rules: Vec<RuleInfo>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreSnapshot {
    pub name: String,
    #[serde(default)]
    pub folders: Vec<FolderSnapshot>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FolderSnapshot {
    pub name: String,
    /// Designates this folder as a well-known folder of the primary store
    #[serde(default)]
    pub default_for: Option<DefaultFolder>,
    #[serde(default)]
    pub items: Vec<ItemRecord>,
    #[serde(default)]
    pub folders: Vec<FolderSnapshot>,
}

/// How the host answers `restrict`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RestrictionMode {
    #[default]
    Supported,
    Unsupported,
    Rejecting,
}

/// Per-primitive call counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HostCalls {
    pub stores: usize,
    pub root_folder: usize,
    pub child_folders: usize,
    pub folder_name: usize,
    pub default_folder: usize,
    pub item_count: usize,
    pub items: usize,
    pub restrict: usize,
    pub sort: usize,
    pub include_recurrences: usize,
    pub item_at: usize,
    pub property_reads: usize,
    pub rules: usize,
}

#[derive(Debug)]
struct StoreNode {
    name: String,
    root: usize,
}

#[derive(Debug)]
struct FolderNode {
    name: String,
    children: Vec<usize>,
    items: Vec<usize>,
    alive: bool,
}

#[derive(Debug)]
struct Collection {
    folder: usize,
    members: Vec<u64>,
    order: Option<SortSpec>,
}

/// In-memory [`AutomationHost`]
#[derive(Debug)]
pub struct InMemoryHost {
    stores: Vec<StoreNode>,
    default_store: Option<usize>,
    folders: Vec<FolderNode>,
    records: Vec<Option<ItemRecord>>,
    defaults: HashMap<DefaultFolder, usize>,
    collections: HashMap<u64, Collection>,
    next_collection: u64,
    rules: Vec<RuleInfo>,
    restriction_mode: RestrictionMode,
    unavailable: bool,
    calls: HostCalls,
}

impl Default for InMemoryHost {
    fn default() -> Self {
        Self::new()
    }
}

/// Item handles carry the record index in the low half and the recurrence
/// occurrence in the high half.
fn encode_item(record: usize, occurrence: u32) -> u64 {
    (u64::from(occurrence) << 32) | record as u64
}

fn decode_item(raw: u64) -> (usize, u32) {
    ((raw & u64::from(u32::MAX)) as usize, (raw >> 32) as u32)
}

struct RecordView<'a> {
    record: &'a ItemRecord,
    occurrence: u32,
}

impl FieldSource for RecordView<'_> {
    fn text(&mut self, field: TextField) -> HostResult<Option<String>> {
        Ok(self.record.text(field).cloned())
    }

    fn time(&mut self, field: TimeField) -> HostResult<Option<DateTime<Utc>>> {
        Ok(self.record.time(field, self.occurrence))
    }

    fn flag(&mut self, field: FlagField) -> HostResult<bool> {
        Ok(self.record.flag(field))
    }
}

impl InMemoryHost {
    /// Empty profile with no stores
    pub fn new() -> Self {
        Self {
            stores: Vec::new(),
            default_store: None,
            folders: Vec::new(),
            records: Vec::new(),
            defaults: HashMap::new(),
            collections: HashMap::new(),
            next_collection: 0,
            rules: Vec::new(),
            restriction_mode: RestrictionMode::Supported,
            unavailable: false,
            calls: HostCalls::default(),
        }
    }

    /// Read and build a host from a JSON snapshot file
    ///
    /// # Errors
    ///
    /// Returns `Unavailable` if the file cannot be read or parsed.
    pub fn load(path: &Path) -> HostResult<Self> {
        let raw = fs::read_to_string(path).map_err(|e| {
            HostError::Unavailable(format!(
                "cannot read profile snapshot '{}': {e}",
                path.display()
            ))
        })?;
        let snapshot: ProfileSnapshot = serde_json::from_str(&raw).map_err(|e| {
            HostError::Unavailable(format!(
                "invalid profile snapshot '{}': {e}",
                path.display()
            ))
        })?;
        Ok(Self::from_snapshot(snapshot))
    }

    /// Build a host from an in-memory snapshot
    ///
    /// The primary store is the one named by `default_store`, or the first
    /// store when that name is absent or unknown. Only folders of the primary
    /// store are designated as well-known folders.
    pub fn from_snapshot(snapshot: ProfileSnapshot) -> Self {
        let mut host = Self::new();
        host.set_restriction_mode(snapshot.restrictions);
        let primary_name = snapshot
            .default_store
            .as_deref()
            .filter(|name| snapshot.stores.iter().any(|s| s.name == *name))
            .or_else(|| snapshot.stores.first().map(|s| s.name.as_str()))
            .map(str::to_owned);
        let mut claimed = false;
        for store in snapshot.stores {
            let id = host.add_store(&store.name);
            let primary = !claimed && primary_name.as_deref() == Some(store.name.as_str());
            if primary {
                host.set_default_store(id);
                claimed = true;
            }
            let root = host.store_root(id);
            for folder in store.folders {
                host.add_snapshot_folder(root, folder, primary);
            }
        }
        for rule in snapshot.rules {
            host.add_rule(rule);
        }
        host
    }

    fn add_snapshot_folder(&mut self, parent: FolderHandle, folder: FolderSnapshot, primary: bool) {
        let handle = self.add_folder(parent, &folder.name);
        if primary && let Some(kind) = folder.default_for {
            self.designate(kind, handle);
        }
        for item in folder.items {
            self.add_item(handle, item);
        }
        for child in folder.folders {
            self.add_snapshot_folder(handle, child, primary);
        }
    }

    /// Attach a store; the first store attached becomes the primary one
    pub fn add_store(&mut self, name: &str) -> StoreId {
        let root = self.new_folder(name);
        self.stores.push(StoreNode {
            name: name.to_owned(),
            root,
        });
        let idx = self.stores.len() - 1;
        if self.default_store.is_none() {
            self.default_store = Some(idx);
        }
        StoreId(idx as u64)
    }

    pub fn set_default_store(&mut self, store: StoreId) {
        self.default_store = Some(store.0 as usize);
    }

    /// Root folder handle without touching the call counters
    pub fn store_root(&self, store: StoreId) -> FolderHandle {
        FolderHandle(self.stores[store.0 as usize].root as u64)
    }

    /// Create a child folder
    pub fn add_folder(&mut self, parent: FolderHandle, name: &str) -> FolderHandle {
        let idx = self.new_folder(name);
        self.folders[parent.0 as usize].children.push(idx);
        FolderHandle(idx as u64)
    }

    /// Mark a folder as a well-known folder
    pub fn designate(&mut self, kind: DefaultFolder, folder: FolderHandle) {
        self.defaults.insert(kind, folder.0 as usize);
    }

    pub fn add_item(&mut self, folder: FolderHandle, record: ItemRecord) -> ItemHandle {
        self.records.push(Some(record));
        let idx = self.records.len() - 1;
        self.folders[folder.0 as usize].items.push(idx);
        ItemHandle(encode_item(idx, 0))
    }

    /// Append a rule to the primary store's rule list
    pub fn add_rule(&mut self, rule: RuleInfo) {
        self.rules.push(rule);
    }

    pub fn set_restriction_mode(&mut self, mode: RestrictionMode) {
        self.restriction_mode = mode;
    }

    fn new_folder(&mut self, name: &str) -> usize {
        self.folders.push(FolderNode {
            name: name.to_owned(),
            children: Vec::new(),
            items: Vec::new(),
            alive: true,
        });
        self.folders.len() - 1
    }

    fn ensure_available(&self) -> HostResult<()> {
        if self.unavailable {
            return Err(HostError::Unavailable(
                "mail client is not running".to_owned(),
            ));
        }
        Ok(())
    }

    fn folder(&self, folder: FolderHandle) -> HostResult<&FolderNode> {
        self.folders
            .get(folder.0 as usize)
            .filter(|node| node.alive)
            .ok_or_else(|| HostError::Stale(format!("folder {}", folder.0)))
    }

    fn collection(&self, items: ItemsHandle) -> HostResult<&Collection> {
        self.collections
            .get(&items.0)
            .ok_or_else(|| HostError::Stale(format!("collection {}", items.0)))
    }

    fn record(&self, item: ItemHandle) -> HostResult<(&ItemRecord, u32)> {
        let (idx, occurrence) = decode_item(item.0);
        match self.records.get(idx) {
            Some(Some(record)) => Ok((record, occurrence)),
            Some(None) => Err(HostError::Dereference(format!("item {idx} was deleted"))),
            None => Err(HostError::Stale(format!("item {idx}"))),
        }
    }

    fn push_collection(
        &mut self,
        folder: usize,
        members: Vec<u64>,
        order: Option<SortSpec>,
    ) -> ItemsHandle {
        let id = self.next_collection;
        self.next_collection += 1;
        self.collections.insert(
            id,
            Collection {
                folder,
                members,
                order,
            },
        );
        ItemsHandle(id)
    }
}

/// Stable sort of collection members; items without a value sort last in
/// either direction.
fn sort_members(records: &[Option<ItemRecord>], members: &mut [u64], order: SortSpec) {
    let record_of = |raw: u64| {
        let (idx, occurrence) = decode_item(raw);
        records
            .get(idx)
            .and_then(Option::as_ref)
            .map(|r| (r, occurrence))
    };
    match order.key {
        SortKey::Time(field) => {
            let time_of = |raw| record_of(raw).and_then(|(r, occ)| r.time(field, occ));
            members.sort_by(|&a, &b| {
                compare_present_first(time_of(a), time_of(b), order.descending)
            });
        }
        SortKey::Text(field) => {
            let text_of = |raw| {
                record_of(raw)
                    .and_then(|(r, _)| r.text(field))
                    .map(|s| s.to_lowercase())
            };
            members.sort_by(|&a, &b| {
                compare_present_first(text_of(a), text_of(b), order.descending)
            });
        }
    }
}

fn compare_present_first<T: Ord>(a: Option<T>, b: Option<T>, descending: bool) -> Ordering {
    match (a, b) {
        (Some(x), Some(y)) if descending => y.cmp(&x),
        (Some(x), Some(y)) => x.cmp(&y),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

/// Fixture controls used by tests across the crate
#[cfg(test)]
impl InMemoryHost {
    /// Delete an item; collections that already contain it fail to
    /// dereference it afterwards
    pub fn delete_item(&mut self, item: ItemHandle) {
        let (record, _) = decode_item(item.0);
        if let Some(slot) = self.records.get_mut(record) {
            *slot = None;
        }
    }

    /// Remove a folder from the tree; its handle becomes stale
    pub fn remove_folder(&mut self, folder: FolderHandle) {
        let idx = folder.0 as usize;
        for node in &mut self.folders {
            node.children.retain(|&child| child != idx);
        }
        if let Some(node) = self.folders.get_mut(idx) {
            node.alive = false;
        }
    }

    /// Simulate the host process going away (or coming back)
    pub fn set_unavailable(&mut self, unavailable: bool) {
        self.unavailable = unavailable;
    }

    pub fn calls(&self) -> HostCalls {
        self.calls
    }

    pub fn reset_calls(&mut self) {
        self.calls = HostCalls::default();
    }

    /// Collections handed out and not yet released
    pub fn open_collections(&self) -> usize {
        self.collections.len()
    }
}

#[cfg(test)]
impl HostCalls {
    /// Calls that walk the store/folder tree
    pub fn traversal(&self) -> usize {
        self.stores + self.root_folder + self.child_folders
    }
}

impl AutomationHost for InMemoryHost {
    fn stores(&mut self) -> HostResult<Vec<StoreInfo>> {
        self.ensure_available()?;
        self.calls.stores += 1;
        Ok(self
            .stores
            .iter()
            .enumerate()
            .map(|(idx, store)| StoreInfo {
                id: StoreId(idx as u64),
                display_name: store.name.clone(),
            })
            .collect())
    }

    fn default_store(&mut self) -> HostResult<StoreId> {
        self.ensure_available()?;
        self.default_store
            .map(|idx| StoreId(idx as u64))
            .ok_or_else(|| HostError::Stale("profile has no stores".to_owned()))
    }

    fn root_folder(&mut self, store: StoreId) -> HostResult<FolderHandle> {
        self.ensure_available()?;
        self.calls.root_folder += 1;
        self.stores
            .get(store.0 as usize)
            .map(|s| FolderHandle(s.root as u64))
            .ok_or_else(|| HostError::Stale(format!("store {}", store.0)))
    }

    fn child_folders(&mut self, folder: FolderHandle) -> HostResult<Vec<FolderEntry>> {
        self.ensure_available()?;
        self.calls.child_folders += 1;
        let node = self.folder(folder)?;
        Ok(node
            .children
            .iter()
            .map(|&child| FolderEntry {
                name: self.folders[child].name.clone(),
                handle: FolderHandle(child as u64),
            })
            .collect())
    }

    fn folder_name(&mut self, folder: FolderHandle) -> HostResult<String> {
        self.ensure_available()?;
        self.calls.folder_name += 1;
        Ok(self.folder(folder)?.name.clone())
    }

    fn default_folder(&mut self, kind: DefaultFolder) -> HostResult<FolderHandle> {
        self.ensure_available()?;
        self.calls.default_folder += 1;
        self.defaults
            .get(&kind)
            .map(|&idx| FolderHandle(idx as u64))
            .ok_or_else(|| HostError::Stale(format!("no {} folder in profile", kind.as_str())))
    }

    fn item_count(&mut self, folder: FolderHandle) -> HostResult<usize> {
        self.ensure_available()?;
        self.calls.item_count += 1;
        let node = self.folder(folder)?;
        Ok(node
            .items
            .iter()
            .filter(|&&idx| self.records[idx].is_some())
            .count())
    }

    fn unread_count(&mut self, folder: FolderHandle) -> HostResult<usize> {
        self.ensure_available()?;
        self.calls.item_count += 1;
        let node = self.folder(folder)?;
        Ok(node
            .items
            .iter()
            .filter(|&&idx| self.records[idx].as_ref().is_some_and(|r| r.unread))
            .count())
    }

    fn items(&mut self, folder: FolderHandle) -> HostResult<ItemsHandle> {
        self.ensure_available()?;
        self.calls.items += 1;
        let members = self
            .folder(folder)?
            .items
            .iter()
            .map(|&idx| encode_item(idx, 0))
            .collect();
        Ok(self.push_collection(folder.0 as usize, members, None))
    }

    fn release(&mut self, items: ItemsHandle) {
        self.collections.remove(&items.0);
    }

    fn restrict(
        &mut self,
        items: ItemsHandle,
        restriction: &Restriction,
    ) -> HostResult<ItemsHandle> {
        self.ensure_available()?;
        self.calls.restrict += 1;
        match self.restriction_mode {
            RestrictionMode::Supported => {}
            RestrictionMode::Unsupported => return Err(HostError::Unsupported),
            RestrictionMode::Rejecting => {
                return Err(HostError::Rejected(format!(
                    "cannot parse filter {}",
                    restriction.to_filter_string()
                )));
            }
        }
        restriction.validate().map_err(HostError::Rejected)?;

        let source = self.collection(items)?;
        let (folder, order) = (source.folder, source.order);
        let mut members = Vec::with_capacity(source.members.len());
        for &raw in &source.members {
            let (idx, occurrence) = decode_item(raw);
            let Some(Some(record)) = self.records.get(idx) else {
                continue;
            };
            let mut view = RecordView { record, occurrence };
            if restriction.evaluate(&mut view)? {
                members.push(raw);
            }
        }
        Ok(self.push_collection(folder, members, order))
    }

    fn sort(&mut self, items: ItemsHandle, order: SortSpec) -> HostResult<()> {
        self.ensure_available()?;
        self.calls.sort += 1;
        let records = &self.records;
        let collection = self
            .collections
            .get_mut(&items.0)
            .ok_or_else(|| HostError::Stale(format!("collection {}", items.0)))?;
        sort_members(records, &mut collection.members, order);
        collection.order = Some(order);
        Ok(())
    }

    fn include_recurrences(&mut self, items: ItemsHandle, include: bool) -> HostResult<()> {
        self.ensure_available()?;
        self.calls.include_recurrences += 1;
        let records = &self.records;
        let collection = self
            .collections
            .get_mut(&items.0)
            .ok_or_else(|| HostError::Stale(format!("collection {}", items.0)))?;

        let mut members = Vec::with_capacity(collection.members.len());
        for &raw in &collection.members {
            let (idx, occurrence) = decode_item(raw);
            if occurrence != 0 {
                continue;
            }
            let recurrence = records.get(idx).and_then(Option::as_ref).and_then(|r| r.recurrence);
            match recurrence {
                Some(r) if include => {
                    members.extend((0..r.occurrences.max(1)).map(|occ| encode_item(idx, occ)));
                }
                _ => members.push(raw),
            }
        }
        // An unsorted collection keeps each series next to its master.
        if let Some(order) = collection.order {
            sort_members(records, &mut members, order);
        }
        collection.members = members;
        Ok(())
    }

    fn item_at(&mut self, items: ItemsHandle, position: usize) -> HostResult<ItemHandle> {
        self.ensure_available()?;
        self.calls.item_at += 1;
        let collection = self.collection(items)?;
        let raw = position
            .checked_sub(1)
            .and_then(|idx| collection.members.get(idx))
            .copied()
            .ok_or(HostError::OutOfRange(position))?;
        let handle = ItemHandle(raw);
        self.record(handle)?;
        Ok(handle)
    }

    fn item_text(&mut self, item: ItemHandle, field: TextField) -> HostResult<Option<String>> {
        self.ensure_available()?;
        self.calls.property_reads += 1;
        let (record, _) = self.record(item)?;
        Ok(record.text(field).cloned())
    }

    fn item_time(
        &mut self,
        item: ItemHandle,
        field: TimeField,
    ) -> HostResult<Option<DateTime<Utc>>> {
        self.ensure_available()?;
        self.calls.property_reads += 1;
        let (record, occurrence) = self.record(item)?;
        Ok(record.time(field, occurrence))
    }

    fn item_flag(&mut self, item: ItemHandle, field: FlagField) -> HostResult<bool> {
        self.ensure_available()?;
        self.calls.property_reads += 1;
        let (record, _) = self.record(item)?;
        Ok(record.flag(field))
    }

    fn item_number(&mut self, item: ItemHandle, field: NumberField) -> HostResult<Option<i64>> {
        self.ensure_available()?;
        self.calls.property_reads += 1;
        let (record, _) = self.record(item)?;
        Ok(record.number(field))
    }

    fn rules(&mut self) -> HostResult<Vec<RuleInfo>> {
        self.ensure_available()?;
        self.calls.rules += 1;
        Ok(self.rules.clone())
    }
}
