//! Single-thread host worker
//!
//! The automation host is not thread-safe and blocks while it works, so it
//! lives on one dedicated OS thread together with the folder cache. Async
//! tool handlers send closures to that thread and await the reply with a
//! timeout. A timed-out job is abandoned, not cancelled: it keeps the host
//! busy until it finishes and later jobs queue behind it.

use std::sync::mpsc;
use std::thread;
use std::time::{Duration, Instant};

use tokio::sync::oneshot;
use tracing::{debug, info, warn};

use crate::errors::{AppError, AppResult};
use crate::folder_cache::FolderCache;
use crate::host::{AutomationHost, HostResult};
use crate::resolver::{self, ResolvedFolder, StorePath};
use crate::stores::ExclusionList;

/// Everything a job may touch on the worker thread
pub struct HostSession {
    pub host: Box<dyn AutomationHost>,
    pub cache: FolderCache,
    pub exclusions: ExclusionList,
}

impl HostSession {
    pub fn new(host: Box<dyn AutomationHost>, exclusions: ExclusionList) -> Self {
        Self {
            host,
            cache: FolderCache::new(),
            exclusions,
        }
    }

    /// Resolve a folder path through this session's cache
    pub fn resolve(&mut self, path: &StorePath) -> AppResult<ResolvedFolder> {
        resolver::resolve(self.host.as_mut(), &mut self.cache, &self.exclusions, path)
    }
}

/// Job body; returns whether the session was lost
type Task = Box<dyn FnOnce(AppResult<&mut HostSession>) -> bool + Send>;

struct Job {
    label: &'static str,
    task: Task,
}

/// Handle to the host worker thread
#[derive(Clone)]
pub struct HostWorker {
    sender: mpsc::Sender<Job>,
    call_timeout: Duration,
}

impl HostWorker {
    /// Start the worker thread
    ///
    /// `connect` runs on the worker thread when the first job arrives and
    /// again after a job reports the host unavailable. Each connection gets
    /// a fresh folder cache.
    ///
    /// # Errors
    ///
    /// Returns `Internal` if the thread cannot be spawned.
    pub fn spawn<C>(
        connect: C,
        exclusions: ExclusionList,
        call_timeout: Duration,
    ) -> AppResult<Self>
    where
        C: FnMut() -> HostResult<Box<dyn AutomationHost>> + Send + 'static,
    {
        let (sender, receiver) = mpsc::channel::<Job>();
        thread::Builder::new()
            .name("outlook-host".to_owned())
            .spawn(move || run(receiver, connect, exclusions))
            .map_err(|e| AppError::Internal(format!("failed to spawn host worker: {e}")))?;
        Ok(Self {
            sender,
            call_timeout,
        })
    }

    /// Run `job` on the worker thread and wait for its result
    ///
    /// # Errors
    ///
    /// - `Timeout` if the job does not answer within the call timeout
    /// - `HostUnavailable` if the host cannot be connected
    /// - any error returned by `job`
    pub async fn call<T, F>(&self, label: &'static str, job: F) -> AppResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut HostSession) -> AppResult<T> + Send + 'static,
    {
        let (reply, response) = oneshot::channel();
        let task: Task = Box::new(move |session: AppResult<&mut HostSession>| {
            let result = session.and_then(job);
            let lost = matches!(&result, Err(err) if err.is_host_lost());
            // The caller may have timed out and dropped the receiver.
            let _ = reply.send(result);
            lost
        });
        self.sender
            .send(Job { label, task })
            .map_err(|_| AppError::Internal("host worker has stopped".to_owned()))?;

        tokio::time::timeout(self.call_timeout, response)
            .await
            .map_err(|_| {
                warn!(
                    label,
                    timeout_ms = self.call_timeout.as_millis() as u64,
                    "abandoning host job"
                );
                AppError::Timeout(format!(
                    "{label} did not finish within {} ms; the mail client is still working on it",
                    self.call_timeout.as_millis()
                ))
            })
            .and_then(|received| {
                received.map_err(|_| AppError::Internal("host job dropped its reply".to_owned()))
            })
            .and_then(|result| result)
    }
}

fn run<C>(receiver: mpsc::Receiver<Job>, mut connect: C, exclusions: ExclusionList)
where
    C: FnMut() -> HostResult<Box<dyn AutomationHost>>,
{
    let mut session: Option<HostSession> = None;
    while let Ok(Job { label, task }) = receiver.recv() {
        if session.is_none() {
            match connect() {
                Ok(host) => {
                    info!("connected to automation host");
                    session = Some(HostSession::new(host, exclusions.clone()));
                }
                Err(err) => {
                    warn!(label, error = %err, "cannot connect to automation host");
                    task(Err(err.into()));
                    continue;
                }
            }
        }
        let Some(active) = session.as_mut() else {
            continue;
        };

        let started = Instant::now();
        let lost = task(Ok(active));
        debug!(
            label,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "host job finished"
        );
        if lost {
            warn!(label, "automation host lost; reconnecting on next job");
            session = None;
        }
    }
    debug!("host worker stopped");
}
