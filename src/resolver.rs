//! Folder path resolution and folder tree listing
//!
//! A folder path is a `/`-delimited sequence of folder names, optionally
//! starting with a store display name. Resolution consults the
//! [`FolderCache`] before touching the store list; on a miss it walks the tree
//! one exact-match segment at a time and caches only complete successes.

use tracing::{debug, info, warn};

use crate::errors::{AppError, AppResult};
use crate::folder_cache::FolderCache;
use crate::host::{AutomationHost, FolderEntry, FolderHandle, HostError};
use crate::stores::{ExclusionList, list_stores};

/// Path separator for folder paths and cache keys
pub const SEPARATOR: char = '/';

/// Parsed folder path
///
/// Segments are never empty. No trimming or case folding is applied, so
/// `"Inbox/Archive"` and `"inbox/archive"` are distinct paths.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorePath {
    segments: Vec<String>,
}

impl StorePath {
    /// Parse a `/`-delimited path
    ///
    /// # Errors
    ///
    /// Returns `InvalidInput` for an empty path or any empty segment
    /// (including leading, trailing, or doubled separators).
    pub fn parse(raw: &str) -> AppResult<Self> {
        if raw.is_empty() {
            return Err(AppError::invalid("folder path must not be empty"));
        }
        let segments: Vec<String> = raw.split(SEPARATOR).map(str::to_owned).collect();
        if segments.iter().any(String::is_empty) {
            return Err(AppError::invalid(format!(
                "folder path '{raw}' contains an empty segment"
            )));
        }
        Ok(Self { segments })
    }

    /// Canonical cache key: segments joined with `/`
    pub fn key(&self) -> String {
        self.segments.join("/")
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }
}

/// Outcome of a successful resolution
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedFolder {
    pub handle: FolderHandle,
    /// Canonical path string, as cached
    pub path: String,
    /// Whether the handle came from the cache
    pub cached: bool,
}

/// Resolve a folder path to a handle
///
/// A cached handle is probed with one `folder_name` call; if the host no
/// longer recognizes it the entry is evicted and the path is walked again.
/// The walk starts at a non-excluded store whose display name equals the
/// first segment, otherwise at the primary store.
///
/// # Errors
///
/// - `FolderNotFound` with the matched prefix and sibling names on the first
///   segment without an exact child match
/// - `HostUnavailable` if the host cannot be reached
pub fn resolve(
    host: &mut dyn AutomationHost,
    cache: &mut FolderCache,
    exclusions: &ExclusionList,
    path: &StorePath,
) -> AppResult<ResolvedFolder> {
    let key = path.key();
    if let Some(handle) = cache.get(&key) {
        match host.folder_name(handle) {
            Ok(_) => {
                debug!(path = %key, "folder cache hit");
                return Ok(ResolvedFolder {
                    handle,
                    path: key,
                    cached: true,
                });
            }
            Err(HostError::Unavailable(msg)) => return Err(AppError::HostUnavailable(msg)),
            Err(err) => {
                warn!(path = %key, error = %err, "evicting stale folder cache entry");
                cache.remove(&key);
            }
        }
    }

    let segments = path.segments();
    let stores: Vec<_> = list_stores(host, exclusions)?.collect();
    let (mut current, mut consumed) = match stores
        .iter()
        .find(|store| store.display_name == segments[0])
    {
        Some(store) => (host.root_folder(store.id)?, 1),
        None => {
            let primary = host.default_store()?;
            (host.root_folder(primary)?, 0)
        }
    };

    for segment in &segments[consumed..] {
        let children = host.child_folders(current)?;
        match children.iter().find(|child| &child.name == segment) {
            Some(child) => {
                current = child.handle;
                consumed += 1;
            }
            None => {
                let matched_prefix = segments[..consumed].join("/");
                debug!(path = %key, matched = %matched_prefix, "folder path did not resolve");
                return Err(AppError::FolderNotFound {
                    path: key,
                    matched_prefix,
                    siblings: children.into_iter().map(|child| child.name).collect(),
                });
            }
        }
    }

    info!(path = %key, "resolved folder path");
    cache.insert(key.clone(), current);
    Ok(ResolvedFolder {
        handle: current,
        path: key,
        cached: false,
    })
}

/// Options for [`list_folders`]
#[derive(Debug, Clone, Copy, Default)]
pub struct ListOptions<'a> {
    /// Restrict the listing to one store
    pub store: Option<&'a str>,
    /// Query item and unread counts (slow on large folders)
    pub include_counts: bool,
}

/// One folder in the tree listing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FolderInfo {
    pub name: String,
    /// Store-qualified path, accepted by [`resolve`]
    pub path: String,
    pub store: String,
    /// 1 for top-level folders of a store
    pub depth: usize,
    pub item_count: Option<usize>,
    pub unread_count: Option<usize>,
}

/// Walk the folder tree of every non-excluded store
///
/// Folders are listed depth-first in host order. A sub-tree whose children
/// cannot be read is skipped. The cache is not consulted or populated.
///
/// # Errors
///
/// - `NotFound` if `options.store` names no listed store
/// - `HostUnavailable` if the host cannot be reached
pub fn list_folders(
    host: &mut dyn AutomationHost,
    exclusions: &ExclusionList,
    options: ListOptions<'_>,
) -> AppResult<Vec<FolderInfo>> {
    let stores: Vec<_> = list_stores(host, exclusions)?
        .filter(|store| options.store.is_none_or(|name| name == store.display_name))
        .collect();
    if let Some(name) = options.store
        && stores.is_empty()
    {
        return Err(AppError::NotFound(format!(
            "store '{name}' is not attached or is excluded"
        )));
    }

    let mut folders = Vec::new();
    for store in stores {
        let root = host.root_folder(store.id)?;
        let mut pending = Vec::new();
        push_children(host, root, &store.display_name, 0, &mut pending)?;
        while let Some((child, path, depth)) = pending.pop() {
            let (item_count, unread_count) = if options.include_counts {
                (
                    count_or_skip(host.item_count(child.handle))?,
                    count_or_skip(host.unread_count(child.handle))?,
                )
            } else {
                (None, None)
            };
            push_children(host, child.handle, &path, depth, &mut pending)?;
            folders.push(FolderInfo {
                name: child.name,
                path,
                store: store.display_name.clone(),
                depth,
                item_count,
                unread_count,
            });
        }
    }
    Ok(folders)
}

/// Queue the children of `folder` so the stack pops them in host order
fn push_children(
    host: &mut dyn AutomationHost,
    folder: FolderHandle,
    path: &str,
    depth: usize,
    pending: &mut Vec<(FolderEntry, String, usize)>,
) -> AppResult<()> {
    let children = match host.child_folders(folder) {
        Ok(children) => children,
        Err(HostError::Unavailable(msg)) => return Err(AppError::HostUnavailable(msg)),
        Err(err) => {
            warn!(path = %path, error = %err, "skipping inaccessible folder");
            return Ok(());
        }
    };
    pending.extend(children.into_iter().rev().map(|child| {
        let child_path = format!("{path}{SEPARATOR}{}", child.name);
        (child, child_path, depth + 1)
    }));
    Ok(())
}

/// A failed count is reported as absent unless the host is gone
fn count_or_skip(result: Result<usize, HostError>) -> AppResult<Option<usize>> {
    match result {
        Ok(count) => Ok(Some(count)),
        Err(HostError::Unavailable(msg)) => Err(AppError::HostUnavailable(msg)),
        Err(_) => Ok(None),
    }
}
