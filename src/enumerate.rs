//! Time-windowed, index-based item enumeration
//!
//! Items are never counted and never walked with a cursor. An enumeration
//! restricts the folder's collection on the host (date window plus any extra
//! predicate), sorts it on the host, and then reads positions 1, 2, 3, ...
//! until the host reports the position out of range or the cap is reached.
//!
//! When the host cannot restrict, the same predicate is evaluated locally.
//! A newest-first scan then stops at the first item older than the window,
//! and a text predicate is bounded by a scan budget.

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, info, warn};

use crate::errors::{AppError, AppResult};
use crate::filter::{HostItem, Restriction};
use crate::host::{
    AutomationHost, FolderHandle, HostError, ItemHandle, ItemsHandle, SortKey, SortSpec, TimeField,
};

/// Positions visited per requested result when a text predicate is
/// evaluated locally
pub const TEXT_SCAN_FACTOR: usize = 5;

/// How far back a window reaches
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lookback {
    Days(u32),
    Unbounded,
}

impl Lookback {
    /// Decode the wire convention where zero or a negative count means no
    /// lower bound
    pub fn from_days_back(days_back: i64) -> Self {
        if days_back <= 0 {
            Self::Unbounded
        } else {
            Self::Days(u32::try_from(days_back).unwrap_or(u32::MAX))
        }
    }

    /// Earliest instant inside the window
    pub fn cutoff(self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        match self {
            Self::Days(days) => Some(
                now.checked_sub_signed(Duration::days(i64::from(days)))
                    .unwrap_or(DateTime::<Utc>::MIN_UTC),
            ),
            Self::Unbounded => None,
        }
    }

    /// Days as reported to callers; `None` when unbounded
    pub fn days(self) -> Option<u32> {
        match self {
            Self::Days(days) => Some(days),
            Self::Unbounded => None,
        }
    }
}

/// Hard limits applied to every [`WindowSpec`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowLimits {
    pub max_result_cap: usize,
    /// Upper clamp for lookbacks; 0 disables the clamp
    pub max_lookback_days: u32,
}

/// A clamped enumeration window
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowSpec {
    lookback: Lookback,
    result_cap: usize,
    time_field: TimeField,
}

impl WindowSpec {
    /// Build a window over the received time, clamping to `limits`
    ///
    /// The cap is forced into `1..=max_result_cap`. With an enforced
    /// lookback maximum, finite lookbacks are clamped to it and an
    /// unbounded lookback becomes the maximum.
    pub fn new(lookback: Lookback, requested_cap: usize, limits: WindowLimits) -> Self {
        let lookback = match (lookback, limits.max_lookback_days) {
            (lookback, 0) => lookback,
            (Lookback::Days(days), max) => Lookback::Days(days.min(max)),
            (Lookback::Unbounded, max) => Lookback::Days(max),
        };
        Self {
            lookback,
            result_cap: requested_cap.clamp(1, limits.max_result_cap.max(1)),
            time_field: TimeField::Received,
        }
    }

    /// Window on a different timestamp (e.g. sent time)
    pub fn on(mut self, field: TimeField) -> Self {
        self.time_field = field;
        self
    }

    pub fn lookback(&self) -> Lookback {
        self.lookback
    }

    pub fn result_cap(&self) -> usize {
        self.result_cap
    }

    pub fn time_field(&self) -> TimeField {
        self.time_field
    }
}

/// Why an enumeration stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndReason {
    /// Position past the end of the collection
    Exhausted,
    CapReached,
    /// Newest-first local scan reached an item older than the window
    OutsideWindow,
    ScanBudget,
    HostLost,
}

impl EndReason {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Exhausted => "exhausted",
            Self::CapReached => "cap_reached",
            Self::OutsideWindow => "outside_window",
            Self::ScanBudget => "scan_budget",
            Self::HostLost => "host_lost",
        }
    }

    /// Whether more matching items may exist beyond what was returned
    pub fn truncated(self) -> bool {
        matches!(self, Self::CapReached | Self::ScanBudget | Self::HostLost)
    }
}

/// Counters of a finished (or abandoned) enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EnumerationReport {
    pub yielded: usize,
    pub skipped: usize,
    pub scanned: usize,
    pub end_reason: EndReason,
}

/// Generic positional scan request
#[derive(Debug, Clone)]
pub struct ScanRequest {
    pub sort: SortSpec,
    pub restriction: Option<Restriction>,
    pub include_recurrences: bool,
    pub cap: usize,
    /// Positions visited at most when the restriction runs locally
    pub scan_budget: Option<usize>,
}

/// Records produced by [`Enumeration::drain`]
#[derive(Debug, Clone)]
pub struct Window<T> {
    pub records: Vec<T>,
    pub report: EnumerationReport,
}

/// An open positional scan over a host collection
///
/// The enumeration does not borrow the host; each step takes it explicitly
/// so the caller can read item properties between steps. It is not
/// restartable: opening a new one re-queries the host. Dropping it without
/// draining leaves its collection open on the host.
#[derive(Debug)]
pub struct Enumeration {
    items: ItemsHandle,
    position: usize,
    cap: usize,
    local_filter: Option<Restriction>,
    floor: Option<(TimeField, DateTime<Utc>)>,
    scan_budget: Option<usize>,
    yielded: usize,
    skipped: usize,
    scanned: usize,
    end: Option<EndReason>,
    lost: Option<HostError>,
}

/// Open a newest-first enumeration of `folder` inside `window`
///
/// `extra` is AND-combined with the date restriction so both run in a single
/// host-side filter.
///
/// # Errors
///
/// - `RestrictionRejected` if the host (or local validation) refuses the
///   predicate
/// - `HostUnavailable` if the host cannot be reached
pub fn enumerate_window(
    host: &mut dyn AutomationHost,
    folder: FolderHandle,
    window: &WindowSpec,
    extra: Option<Restriction>,
    now: DateTime<Utc>,
) -> AppResult<Enumeration> {
    let field = window.time_field();
    let date = window
        .lookback()
        .cutoff(now)
        .map(|cutoff| Restriction::OnOrAfter(field, cutoff));
    let scan_budget = extra
        .as_ref()
        .filter(|r| mentions_text(r))
        .map(|_| window.result_cap().saturating_mul(TEXT_SCAN_FACTOR));

    debug!(
        lookback_days = ?window.lookback().days(),
        cap = window.result_cap(),
        "opening windowed enumeration"
    );
    scan(
        host,
        folder,
        ScanRequest {
            sort: SortSpec::newest_first(field),
            restriction: Restriction::all(date.into_iter().chain(extra)),
            include_recurrences: false,
            cap: window.result_cap(),
            scan_budget,
        },
    )
}

/// Open a positional scan with an arbitrary sort and restriction
///
/// The restriction is applied before the sort, both on the host. A scan that
/// includes recurrences sorts first instead: occurrences are only expanded in
/// order on a collection that is already sorted, and restricting keeps that
/// order. If the host does not support restrictions the predicate is
/// validated and kept for local evaluation instead.
///
/// Collections that do not survive into the enumeration are released here;
/// [`Enumeration::drain`] releases the one it reads.
///
/// # Errors
///
/// - `RestrictionRejected` if the predicate is refused
/// - `HostUnavailable` if the host cannot be reached
pub fn scan(
    host: &mut dyn AutomationHost,
    folder: FolderHandle,
    request: ScanRequest,
) -> AppResult<Enumeration> {
    let source = host.items(folder)?;
    let (items, local_filter) = match prepare(host, source, &request) {
        Ok(prepared) => prepared,
        Err(err) => {
            host.release(source);
            return Err(err);
        }
    };
    if items != source {
        host.release(source);
    }

    // Only a newest-first order lets a local scan stop at the window edge.
    let floor = match (&local_filter, request.sort) {
        (
            Some(filter),
            SortSpec {
                key: SortKey::Time(field),
                descending: true,
            },
        ) => filter.lower_bound(field).map(|at| (field, at)),
        _ => None,
    };
    let scan_budget = local_filter.as_ref().and(request.scan_budget);

    Ok(Enumeration {
        items,
        position: 1,
        cap: request.cap.max(1),
        local_filter,
        floor,
        scan_budget,
        yielded: 0,
        skipped: 0,
        scanned: 0,
        end: None,
        lost: None,
    })
}

/// Sort, expand and restrict `source` in the order the request needs
///
/// Returns the collection to read and the predicate left for local
/// evaluation. A restricted collection that fails to sort is released here.
fn prepare(
    host: &mut dyn AutomationHost,
    source: ItemsHandle,
    request: &ScanRequest,
) -> AppResult<(ItemsHandle, Option<Restriction>)> {
    if request.include_recurrences {
        host.sort(source, request.sort)?;
        host.include_recurrences(source, true)?;
    }

    let (items, local_filter) = match &request.restriction {
        None => (source, None),
        Some(restriction) => match host.restrict(source, restriction) {
            Ok(filtered) => (filtered, None),
            Err(HostError::Unsupported) => {
                restriction
                    .validate()
                    .map_err(AppError::RestrictionRejected)?;
                warn!("host cannot restrict; filtering items locally");
                (source, Some(restriction.clone()))
            }
            Err(err) => {
                if let HostError::Rejected(reason) = &err {
                    warn!(
                        filter = %restriction.to_filter_string(),
                        %reason,
                        "host rejected restriction"
                    );
                }
                return Err(err.into());
            }
        },
    };

    if !request.include_recurrences
        && let Err(err) = host.sort(items, request.sort)
    {
        if items != source {
            host.release(items);
        }
        return Err(err.into());
    }
    Ok((items, local_filter))
}

fn mentions_text(restriction: &Restriction) -> bool {
    match restriction {
        Restriction::Contains { .. } => true,
        Restriction::All(parts) => parts.iter().any(mentions_text),
        _ => false,
    }
}

impl Enumeration {
    /// Map every remaining item, skipping those that fail to dereference
    ///
    /// Only successfully mapped items count against the cap.
    ///
    /// # Errors
    ///
    /// Returns the host failure if the host was lost mid-scan; records read
    /// before that point are discarded.
    pub fn drain<T, F>(mut self, host: &mut dyn AutomationHost, mut map: F) -> AppResult<Window<T>>
    where
        F: FnMut(&mut dyn AutomationHost, ItemHandle) -> Result<T, HostError>,
    {
        let mut records = Vec::new();
        while let Some(item) = self.advance(host) {
            match map(host, item) {
                Ok(record) => {
                    self.yielded += 1;
                    records.push(record);
                }
                Err(HostError::Dereference(reason)) => {
                    debug!(position = self.position - 1, %reason, "skipping unreadable item");
                    self.skipped += 1;
                }
                Err(err) => {
                    self.lose(err);
                    break;
                }
            }
        }

        host.release(self.items);
        let report = self.report();
        info!(
            yielded = report.yielded,
            skipped = report.skipped,
            scanned = report.scanned,
            end_reason = ?report.end_reason,
            "enumeration finished"
        );
        match self.lost {
            Some(err) => Err(err.into()),
            None => Ok(Window { records, report }),
        }
    }

    pub fn report(&self) -> EnumerationReport {
        EnumerationReport {
            yielded: self.yielded,
            skipped: self.skipped,
            scanned: self.scanned,
            end_reason: self.end.unwrap_or(EndReason::Exhausted),
        }
    }

    fn advance(&mut self, host: &mut dyn AutomationHost) -> Option<ItemHandle> {
        if self.end.is_some() {
            return None;
        }
        if self.yielded >= self.cap {
            return self.stop(EndReason::CapReached);
        }
        loop {
            if let Some(budget) = self.scan_budget
                && self.scanned >= budget
            {
                return self.stop(EndReason::ScanBudget);
            }

            let position = self.position;
            self.position += 1;
            let item = match host.item_at(self.items, position) {
                Ok(item) => item,
                Err(HostError::OutOfRange(_)) => return self.stop(EndReason::Exhausted),
                Err(HostError::Dereference(reason)) => {
                    debug!(position, %reason, "skipping unreadable item");
                    self.scanned += 1;
                    self.skipped += 1;
                    continue;
                }
                Err(err) => return self.lose(err),
            };
            self.scanned += 1;

            if self.local_filter.is_none() {
                return Some(item);
            }
            if let Some((field, floor)) = self.floor {
                match host.item_time(item, field) {
                    Ok(Some(at)) if at < floor => return self.stop(EndReason::OutsideWindow),
                    Ok(_) => {}
                    Err(HostError::Dereference(_)) => {
                        self.skipped += 1;
                        continue;
                    }
                    Err(err) => return self.lose(err),
                }
            }
            let verdict = match &self.local_filter {
                Some(filter) => filter.evaluate(&mut HostItem {
                    host: &mut *host,
                    item,
                }),
                None => Ok(true),
            };
            match verdict {
                Ok(true) => return Some(item),
                Ok(false) => {}
                Err(HostError::Dereference(_)) => self.skipped += 1,
                Err(err) => return self.lose(err),
            }
        }
    }

    fn stop(&mut self, reason: EndReason) -> Option<ItemHandle> {
        self.end = Some(reason);
        None
    }

    fn lose(&mut self, err: HostError) -> Option<ItemHandle> {
        warn!(position = self.position - 1, error = %err, "enumeration lost the host");
        self.lost = Some(err);
        self.stop(EndReason::HostLost)
    }
}

#[cfg(test)]
mod tests {
    use chrono::{DateTime, Duration, TimeZone, Utc};

    use super::{
        EndReason, Lookback, ScanRequest, WindowLimits, WindowSpec, enumerate_window, scan,
    };
    use crate::errors::AppError;
    use crate::filter::Restriction;
    use crate::host::{
        AutomationHost, DefaultFolder, FlagField, FolderEntry, FolderHandle, HostResult,
        ItemHandle, ItemsHandle, NumberField, RuleInfo, SortSpec, StoreId, StoreInfo, TextField,
        TimeField,
    };
    use crate::memory_host::{InMemoryHost, ItemRecord, RestrictionMode};

    /// Host wrapper that records the collection primitives in call order
    struct RecordingHost {
        inner: InMemoryHost,
        log: Vec<&'static str>,
    }

    impl AutomationHost for RecordingHost {
        fn stores(&mut self) -> HostResult<Vec<StoreInfo>> {
            self.inner.stores()
        }

        fn default_store(&mut self) -> HostResult<StoreId> {
            self.inner.default_store()
        }

        fn root_folder(&mut self, store: StoreId) -> HostResult<FolderHandle> {
            self.inner.root_folder(store)
        }

        fn child_folders(&mut self, folder: FolderHandle) -> HostResult<Vec<FolderEntry>> {
            self.inner.child_folders(folder)
        }

        fn folder_name(&mut self, folder: FolderHandle) -> HostResult<String> {
            self.inner.folder_name(folder)
        }

        fn default_folder(&mut self, kind: DefaultFolder) -> HostResult<FolderHandle> {
            self.inner.default_folder(kind)
        }

        fn item_count(&mut self, folder: FolderHandle) -> HostResult<usize> {
            self.inner.item_count(folder)
        }

        fn unread_count(&mut self, folder: FolderHandle) -> HostResult<usize> {
            self.inner.unread_count(folder)
        }

        fn items(&mut self, folder: FolderHandle) -> HostResult<ItemsHandle> {
            self.log.push("items");
            self.inner.items(folder)
        }

        fn release(&mut self, items: ItemsHandle) {
            self.log.push("release");
            self.inner.release(items);
        }

        fn restrict(
            &mut self,
            items: ItemsHandle,
            restriction: &Restriction,
        ) -> HostResult<ItemsHandle> {
            self.log.push("restrict");
            self.inner.restrict(items, restriction)
        }

        fn sort(&mut self, items: ItemsHandle, order: SortSpec) -> HostResult<()> {
            self.log.push("sort");
            self.inner.sort(items, order)
        }

        fn include_recurrences(&mut self, items: ItemsHandle, include: bool) -> HostResult<()> {
            self.log.push("include_recurrences");
            self.inner.include_recurrences(items, include)
        }

        fn item_at(&mut self, items: ItemsHandle, position: usize) -> HostResult<ItemHandle> {
            self.inner.item_at(items, position)
        }

        fn item_text(&mut self, item: ItemHandle, field: TextField) -> HostResult<Option<String>> {
            self.inner.item_text(item, field)
        }

        fn item_time(
            &mut self,
            item: ItemHandle,
            field: TimeField,
        ) -> HostResult<Option<DateTime<Utc>>> {
            self.inner.item_time(item, field)
        }

        fn item_flag(&mut self, item: ItemHandle, field: FlagField) -> HostResult<bool> {
            self.inner.item_flag(item, field)
        }

        fn item_number(
            &mut self,
            item: ItemHandle,
            field: NumberField,
        ) -> HostResult<Option<i64>> {
            self.inner.item_number(item, field)
        }

        fn rules(&mut self) -> HostResult<Vec<RuleInfo>> {
            self.inner.rules()
        }
    }

    const LIMITS: WindowLimits = WindowLimits {
        max_result_cap: 50,
        max_lookback_days: 0,
    };

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, 16, 12, 0, 0)
            .single()
            .expect("valid timestamp")
    }

    /// Folder with one item per hour going back `count` hours
    fn hourly_folder(count: usize) -> (InMemoryHost, FolderHandle, Vec<ItemHandle>) {
        let mut host = InMemoryHost::new();
        let store = host.add_store("me");
        let folder = host.add_folder(host.store_root(store), "Inbox");
        let handles = (0..count)
            .map(|hours| {
                host.add_item(
                    folder,
                    ItemRecord {
                        subject: Some(format!("message {hours}")),
                        received: Some(now() - Duration::hours(hours as i64)),
                        ..ItemRecord::default()
                    },
                )
            })
            .collect();
        host.reset_calls();
        (host, folder, handles)
    }

    fn received_times(
        host: &mut InMemoryHost,
        folder: FolderHandle,
        window: &WindowSpec,
        extra: Option<Restriction>,
    ) -> (Vec<DateTime<Utc>>, super::EnumerationReport) {
        let enumeration =
            enumerate_window(host, folder, window, extra, now()).expect("enumeration opens");
        let window = enumeration
            .drain(host, |host, item| {
                host.item_time(item, TimeField::Received)
                    .map(|t| t.expect("every fixture item has a received time"))
            })
            .expect("enumeration completes");
        (window.records, window.report)
    }

    #[test]
    fn lookback_wire_convention() {
        assert_eq!(Lookback::from_days_back(0), Lookback::Unbounded);
        assert_eq!(Lookback::from_days_back(-3), Lookback::Unbounded);
        assert_eq!(Lookback::from_days_back(7), Lookback::Days(7));
        assert_eq!(Lookback::Unbounded.cutoff(now()), None);
        assert_eq!(
            Lookback::Days(2).cutoff(now()),
            Some(now() - Duration::days(2))
        );
    }

    #[test]
    fn window_spec_clamps_cap_and_lookback() {
        let window = WindowSpec::new(Lookback::Days(3), 0, LIMITS);
        assert_eq!(window.result_cap(), 1);
        let window = WindowSpec::new(Lookback::Days(3), 5000, LIMITS);
        assert_eq!(window.result_cap(), 50);
        assert_eq!(window.lookback(), Lookback::Days(3));

        let enforced = WindowLimits {
            max_result_cap: 50,
            max_lookback_days: 30,
        };
        assert_eq!(
            WindowSpec::new(Lookback::Days(90), 5, enforced).lookback(),
            Lookback::Days(30)
        );
        assert_eq!(
            WindowSpec::new(Lookback::Unbounded, 5, enforced).lookback(),
            Lookback::Days(30)
        );
    }

    #[test]
    fn large_folder_two_day_window_yields_capped_recent_items_without_counting() {
        let (mut host, folder, _) = hourly_folder(10_000);
        let window = WindowSpec::new(Lookback::Days(2), 20, LIMITS);
        let (times, report) = received_times(&mut host, folder, &window, None);

        assert_eq!(times.len(), 20);
        let cutoff = now() - Duration::days(2);
        assert!(times.iter().all(|t| *t >= cutoff));
        assert!(times.windows(2).all(|pair| pair[0] >= pair[1]));
        assert_eq!(report.end_reason, EndReason::CapReached);
        assert_eq!(host.calls().item_count, 0);
        assert_eq!(host.calls().restrict, 1);
        assert_eq!(host.calls().item_at, 20);
    }

    #[test]
    fn window_edge_is_inclusive_and_older_items_never_yielded() {
        let (mut host, folder, _) = hourly_folder(100);
        let window = WindowSpec::new(Lookback::Days(2), 50, LIMITS);
        let (times, report) = received_times(&mut host, folder, &window, None);

        // Hours 0 through 48 inclusive.
        assert_eq!(times.len(), 49);
        assert_eq!(times.last().copied(), Some(now() - Duration::days(2)));
        assert_eq!(report.end_reason, EndReason::Exhausted);
    }

    #[test]
    fn local_fallback_stops_at_window_edge() {
        let (mut host, folder, _) = hourly_folder(10_000);
        host.set_restriction_mode(RestrictionMode::Unsupported);
        let window = WindowSpec::new(Lookback::Days(2), 50, LIMITS);
        let (times, report) = received_times(&mut host, folder, &window, None);

        assert_eq!(times.len(), 49);
        assert_eq!(report.end_reason, EndReason::OutsideWindow);
        assert_eq!(report.scanned, 50);
        assert_eq!(host.calls().item_count, 0);
    }

    #[test]
    fn local_text_filter_respects_scan_budget() {
        let (mut host, folder, _) = hourly_folder(1_000);
        host.set_restriction_mode(RestrictionMode::Unsupported);
        let window = WindowSpec::new(Lookback::Unbounded, 2, LIMITS);
        let extra = Restriction::contains(&[TextField::Subject], "no such subject");
        let (times, report) = received_times(&mut host, folder, &window, Some(extra));

        assert!(times.is_empty());
        assert_eq!(report.end_reason, EndReason::ScanBudget);
        assert_eq!(report.scanned, 10);
        assert!(report.end_reason.truncated());
    }

    #[test]
    fn extra_predicate_is_combined_with_window() {
        let (mut host, folder, _) = hourly_folder(200);
        let window = WindowSpec::new(Lookback::Days(1), 50, LIMITS);
        let extra = Restriction::contains(&[TextField::Subject], "message 1");
        let (times, _) = received_times(&mut host, folder, &window, Some(extra));

        // "message 1" and "message 10".."message 19" fall inside 24 hours.
        assert_eq!(times.len(), 11);
        assert_eq!(host.calls().restrict, 1);
    }

    #[test]
    fn unbounded_enumeration_is_repeatable() {
        let (mut host, folder, _) = hourly_folder(30);
        let window = WindowSpec::new(Lookback::Unbounded, 50, LIMITS);
        let (first, _) = received_times(&mut host, folder, &window, None);
        let (second, report) = received_times(&mut host, folder, &window, None);
        assert_eq!(first.len(), 30);
        assert_eq!(first, second);
        assert_eq!(report.end_reason, EndReason::Exhausted);
        assert_eq!(host.calls().restrict, 0);
    }

    #[test]
    fn rejected_restriction_is_fatal_for_the_call() {
        let (mut host, folder, _) = hourly_folder(10);
        host.set_restriction_mode(RestrictionMode::Rejecting);
        let window = WindowSpec::new(Lookback::Days(2), 5, LIMITS);
        let err = enumerate_window(&mut host, folder, &window, None, now()).expect_err("must fail");
        assert!(matches!(err, AppError::RestrictionRejected(_)));
    }

    #[test]
    fn deleted_items_are_skipped_not_fatal() {
        let (mut host, folder, handles) = hourly_folder(10);
        let window = WindowSpec::new(Lookback::Unbounded, 50, LIMITS);
        let enumeration =
            enumerate_window(&mut host, folder, &window, None, now()).expect("opens");
        host.delete_item(handles[3]);

        let window = enumeration
            .drain(&mut host, |_, item| Ok(item))
            .expect("enumeration completes");
        let report = window.report;
        assert_eq!(window.records.len(), 9);
        assert_eq!(report.yielded, 9);
        assert_eq!(report.skipped, 1);
        assert_eq!(report.end_reason, EndReason::Exhausted);
    }

    #[test]
    fn host_loss_mid_scan_propagates() {
        let (mut host, folder, _) = hourly_folder(10);
        let window = WindowSpec::new(Lookback::Unbounded, 50, LIMITS);
        let enumeration =
            enumerate_window(&mut host, folder, &window, None, now()).expect("opens");
        host.set_unavailable(true);
        let err = enumeration
            .drain(&mut host, |_, item| Ok(item))
            .expect_err("must fail");
        assert!(err.is_host_lost());
    }

    #[test]
    fn calendar_scan_expands_recurrences_in_start_order() {
        let mut host = InMemoryHost::new();
        let store = host.add_store("me");
        let calendar = host.add_folder(host.store_root(store), "Calendar");
        let start = now() + Duration::hours(2);
        host.add_item(
            calendar,
            ItemRecord {
                subject: Some("standup".to_owned()),
                start: Some(start),
                end: Some(start + Duration::minutes(15)),
                recurrence: Some(crate::memory_host::Recurrence {
                    interval_days: 1,
                    occurrences: 10,
                }),
                ..ItemRecord::default()
            },
        );
        host.add_item(
            calendar,
            ItemRecord {
                subject: Some("review".to_owned()),
                start: Some(start + Duration::hours(30)),
                end: Some(start + Duration::hours(31)),
                ..ItemRecord::default()
            },
        );

        let horizon = now() + Duration::days(3);
        let restriction = Restriction::all([
            Restriction::OnOrAfter(TimeField::Start, now()),
            Restriction::OnOrBefore(TimeField::End, horizon),
        ]);
        let enumeration = scan(
            &mut host,
            calendar,
            ScanRequest {
                sort: SortSpec::oldest_first(TimeField::Start),
                restriction,
                include_recurrences: true,
                cap: 100,
                scan_budget: None,
            },
        )
        .expect("scan opens");
        let subjects = enumeration
            .drain(&mut host, |host, item| {
                host.item_text(item, TextField::Subject)
            })
            .expect("scan completes")
            .records;
        assert_eq!(
            subjects,
            vec![
                Some("standup".to_owned()),
                Some("standup".to_owned()),
                Some("review".to_owned()),
                Some("standup".to_owned()),
            ]
        );
    }

    #[test]
    fn recurring_scan_sorts_before_expanding_and_restricts_last() {
        let (inner, folder, _) = hourly_folder(5);
        let mut host = RecordingHost {
            inner,
            log: Vec::new(),
        };
        let enumeration = scan(
            &mut host,
            folder,
            ScanRequest {
                sort: SortSpec::oldest_first(TimeField::Start),
                restriction: Some(Restriction::OnOrAfter(TimeField::Start, now())),
                include_recurrences: true,
                cap: 10,
                scan_budget: None,
            },
        )
        .expect("scan opens");
        assert_eq!(
            host.log,
            ["items", "sort", "include_recurrences", "restrict", "release"]
        );

        host.log.clear();
        enumeration
            .drain(&mut host, |_, item| Ok(item))
            .expect("scan completes");
        assert_eq!(host.log, ["release"]);
    }

    #[test]
    fn mail_scan_restricts_before_sorting() {
        let (inner, folder, _) = hourly_folder(5);
        let mut host = RecordingHost {
            inner,
            log: Vec::new(),
        };
        let window = WindowSpec::new(Lookback::Days(2), 5, LIMITS);
        enumerate_window(&mut host, folder, &window, None, now()).expect("opens");
        assert_eq!(host.log, ["items", "restrict", "sort", "release"]);
        assert!(!host.log.contains(&"include_recurrences"));
    }

    #[test]
    fn drained_and_failed_scans_release_their_collections() {
        let (mut host, folder, _) = hourly_folder(100);
        let baseline = host.open_collections();
        let window = WindowSpec::new(Lookback::Days(2), 10, LIMITS);

        for _ in 0..3 {
            received_times(&mut host, folder, &window, None);
            let extra = Restriction::contains(&[TextField::Subject], "message 1");
            received_times(&mut host, folder, &window, Some(extra));
        }
        assert_eq!(host.open_collections(), baseline);

        host.set_restriction_mode(RestrictionMode::Unsupported);
        received_times(&mut host, folder, &window, None);
        assert_eq!(host.open_collections(), baseline);

        host.set_restriction_mode(RestrictionMode::Rejecting);
        enumerate_window(&mut host, folder, &window, None, now()).expect_err("must fail");
        assert_eq!(host.open_collections(), baseline);

        host.set_restriction_mode(RestrictionMode::Supported);
        let enumeration =
            enumerate_window(&mut host, folder, &window, None, now()).expect("opens");
        host.set_unavailable(true);
        enumeration
            .drain(&mut host, |_, item| Ok(item))
            .expect_err("must fail");
        assert_eq!(host.open_collections(), baseline);
    }
}
