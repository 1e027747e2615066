//! Advisory device locking through a marker file.
//!
//! The marker holds the owner's process id as ten right-aligned ASCII digits
//! with no terminator, the format other DVD tools on the same machine expect.
//! The lock is purely cooperative.
use crate::error::{DvdError, Result};
use log::{debug, warn};
use std::{
    fs::{self, OpenOptions},
    io::{self, Write},
    ops::ControlFlow,
    path::{Path, PathBuf},
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    thread,
    time::Duration,
};

/// Default marker location.
pub const DEFAULT_LOCK_PATH: &str = "/tmp/LCK..dvd";

// stale markers removed within one attempt before waiting
const STALE_RETRIES: u32 = 4;

/// How often and how long to retry.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub interval: Duration,
}

impl RetryPolicy {
    /// Spreads `timeout` over attempts `interval` apart.
    pub fn from_timeout(timeout: Duration, interval: Duration) -> Self {
        let attempts = if interval.as_millis() == 0 {
            1
        } else {
            (timeout.as_millis() / interval.as_millis()).max(1) as u32
        };
        RetryPolicy { attempts, interval }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy {
            attempts: 180,
            interval: Duration::from_secs(1),
        }
    }
}

/// A flag another thread can set to abandon a [`retry`] loop.
///
/// [`retry`]: fn.retry.html
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        CancelToken::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Outcome of a [`retry`] loop that did not finish with a value.
///
/// [`retry`]: fn.retry.html
#[derive(Debug, PartialEq, Eq)]
pub enum RetryError<E> {
    /// Every attempt asked to be retried.
    Exhausted,
    Cancelled,
    /// An attempt failed outright.
    Failed(E),
}

/// Runs `attempt` up to `policy.attempts` times, sleeping `policy.interval`
/// between attempts that return `Continue`.
///
/// `attempt` receives the 0-based attempt number.
pub fn retry<T, E, F>(policy: &RetryPolicy, cancel: &CancelToken, mut attempt: F) -> std::result::Result<T, RetryError<E>>
where
    F: FnMut(u32) -> ControlFlow<std::result::Result<T, E>>,
{
    for n in 0..policy.attempts {
        if cancel.is_cancelled() {
            return Err(RetryError::Cancelled);
        }
        match attempt(n) {
            ControlFlow::Break(Ok(v)) => return Ok(v),
            ControlFlow::Break(Err(e)) => return Err(RetryError::Failed(e)),
            ControlFlow::Continue(()) => {}
        }
        if n + 1 < policy.attempts {
            thread::sleep(policy.interval);
        }
    }
    Err(RetryError::Exhausted)
}

/// Formats `pid` the way the marker file stores it.
pub fn marker_contents(pid: u32) -> String {
    format!("{:>10}", pid)
}

#[cfg(target_os = "linux")]
fn process_alive(pid: u32) -> bool {
    Path::new("/proc").join(pid.to_string()).exists()
}

#[cfg(all(unix, not(target_os = "linux")))]
fn process_alive(pid: u32) -> bool {
    use std::process::{Command, Stdio};

    // a marker we cannot check is left alone
    match Command::new("kill")
        .arg("-0")
        .arg(pid.to_string())
        .stderr(Stdio::null())
        .status()
    {
        Ok(status) => status.success(),
        Err(e) => {
            debug!("cannot run kill -0 {}: {}, assuming it is alive", pid, e);
            true
        }
    }
}

#[cfg(not(unix))]
fn process_alive(_pid: u32) -> bool {
    true
}

enum Attempt {
    Acquired,
    Stale,
    /// Held by a live process, or by one that has not written its pid yet.
    Held(Option<u32>),
}

/// Acquires the advisory lock at a marker path.
#[derive(Debug, Clone)]
pub struct LockManager {
    path: PathBuf,
    policy: RetryPolicy,
}

impl LockManager {
    pub fn new<P: Into<PathBuf>>(path: P, policy: RetryPolicy) -> Self {
        LockManager {
            path: path.into(),
            policy,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Blocks until the lock is obtained or the retry policy runs out.
    pub fn acquire(&self) -> Result<DeviceLock> {
        self.acquire_with(&CancelToken::new())
    }

    pub fn acquire_with(&self, cancel: &CancelToken) -> Result<DeviceLock> {
        let res = retry(&self.policy, cancel, |_| {
            for _ in 0..STALE_RETRIES {
                match self.try_create() {
                    Ok(Attempt::Acquired) => return ControlFlow::Break(Ok(())),
                    // removed a stale marker, go again right away
                    Ok(Attempt::Stale) => continue,
                    Ok(Attempt::Held(Some(pid))) => {
                        debug!("{} held by process {}", self.path.display(), pid);
                        return ControlFlow::Continue(());
                    }
                    Ok(Attempt::Held(None)) => {
                        debug!("{} is being created by another process", self.path.display());
                        return ControlFlow::Continue(());
                    }
                    Err(e) => return ControlFlow::Break(Err(e)),
                }
            }
            ControlFlow::Continue(())
        });

        match res {
            Ok(()) => {
                debug!("acquired {}", self.path.display());
                Ok(DeviceLock {
                    path: self.path.clone(),
                    held: true,
                })
            }
            Err(RetryError::Exhausted) => Err(DvdError::LockTimeout {
                path: self.path.clone(),
                attempts: self.policy.attempts,
            }),
            Err(RetryError::Cancelled) => Err(DvdError::LockCancelled),
            Err(RetryError::Failed(source)) => Err(DvdError::Lock {
                path: self.path.clone(),
                source,
            }),
        }
    }

    fn try_create(&self) -> io::Result<Attempt> {
        match OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&self.path)
        {
            Ok(mut f) => self.claim(&mut f),
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => self.inspect_existing(),
            Err(e) => Err(e),
        }
    }

    // Writes our pid into the marker we just created, or takes it away again.
    fn claim<W: Write>(&self, marker: &mut W) -> io::Result<Attempt> {
        match marker.write_all(marker_contents(std::process::id()).as_bytes()) {
            Ok(()) => Ok(Attempt::Acquired),
            Err(e) => {
                if let Err(rm) = fs::remove_file(&self.path) {
                    warn!("cannot remove partial lock {}: {}", self.path.display(), rm);
                }
                Err(e)
            }
        }
    }

    fn inspect_existing(&self) -> io::Result<Attempt> {
        let contents = match fs::read_to_string(&self.path) {
            Ok(c) => c,
            // released between our create and read
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Attempt::Stale),
            Err(e) => return Err(e),
        };

        let owner = contents.trim();
        // created but not written yet
        if owner.is_empty() {
            return Ok(Attempt::Held(None));
        }
        match owner.parse::<u32>() {
            Ok(pid) if process_alive(pid) => Ok(Attempt::Held(Some(pid))),
            owner => {
                match owner {
                    Ok(pid) => warn!("removing stale lock {} of process {}", self.path.display(), pid),
                    Err(_) => warn!("removing unreadable lock {}", self.path.display()),
                }
                match fs::remove_file(&self.path) {
                    Ok(()) => Ok(Attempt::Stale),
                    Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(Attempt::Stale),
                    Err(e) => Err(e),
                }
            }
        }
    }
}

/// A held lock. The marker is removed by [`release`] or on drop.
///
/// [`release`]: #method.release
#[derive(Debug)]
pub struct DeviceLock {
    path: PathBuf,
    held: bool,
}

impl DeviceLock {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_held(&self) -> bool {
        self.held
    }

    /// Removes the marker. Calling this more than once is harmless.
    pub fn release(&mut self) -> Result<()> {
        if !self.held {
            return Ok(());
        }
        self.held = false;
        match fs::remove_file(&self.path) {
            Ok(()) => {
                debug!("released {}", self.path.display());
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(DvdError::Lock {
                path: self.path.clone(),
                source,
            }),
        }
    }
}

impl Drop for DeviceLock {
    fn drop(&mut self) {
        if let Err(e) = self.release() {
            warn!("{}", e);
        }
    }
}
