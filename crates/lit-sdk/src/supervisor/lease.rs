//! Port lease guarding against two launchers starting a server on one port.
//!
//! The lease is a lock file in the install directory recording the launching
//! process, so a second launcher can tell a live lease from one abandoned by
//! a crashed process. The lock is written under a private staging name and
//! hard-linked into place, so it never appears without its holder.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread;
use std::time::Duration;

use tracing::{info, warn};

use super::SUPERVISOR_TARGET;
use super::error::SupervisorError;

const MAX_ACQUIRE_ATTEMPTS: usize = 2;
/// How long a lock without a readable holder counts as still being written.
const IN_FLIGHT_GRACE: Duration = Duration::from_secs(2);
const IN_FLIGHT_POLL: Duration = Duration::from_millis(20);

static SIDECAR_SEQUENCE: AtomicU64 = AtomicU64::new(0);

#[derive(Debug)]
pub(crate) struct PortLease {
    path: PathBuf,
    file: File,
}

impl PortLease {
    /// Acquires the lease, clearing it first when its holder is gone.
    pub(crate) fn acquire(path: &Path) -> Result<Self, SupervisorError> {
        let mut attempts = 0;
        loop {
            attempts += 1;
            match publish_lock(path) {
                Ok(file) => {
                    info!(
                        target: SUPERVISOR_TARGET,
                        file = %path.display(),
                        "acquired port lease"
                    );
                    return Ok(Self {
                        path: path.to_path_buf(),
                        file,
                    });
                }
                Err(error)
                    if error.kind() == io::ErrorKind::AlreadyExists
                        && attempts < MAX_ACQUIRE_ATTEMPTS =>
                {
                    clear_if_stale(path)?;
                }
                Err(source) => {
                    return Err(SupervisorError::LeaseCreate {
                        path: path.to_path_buf(),
                        source,
                    });
                }
            }
        }
    }

    /// Appends the server's pid so the lease names the process it guards.
    pub(crate) fn record_child(&mut self, pid: u32) -> Result<(), SupervisorError> {
        let map_error = |source| SupervisorError::LeaseWrite {
            path: self.path.clone(),
            source,
        };
        writeln!(self.file, "{pid}").map_err(map_error)?;
        self.file.sync_all().map_err(map_error)
    }

    pub(crate) fn path(&self) -> &Path {
        self.path.as_path()
    }
}

impl Drop for PortLease {
    fn drop(&mut self) {
        match fs::remove_file(&self.path) {
            Err(error) if error.kind() != io::ErrorKind::NotFound => {
                warn!(
                    target: SUPERVISOR_TARGET,
                    file = %self.path.display(),
                    error = %error,
                    "failed to remove port lease"
                );
            }
            _ => {}
        }
    }
}

/// Writes the launcher pid to a staging file and links it to `path`.
///
/// `fs::hard_link` refuses to replace an existing file, so losing the race
/// surfaces as `AlreadyExists` exactly as `create_new` would.
fn publish_lock(path: &Path) -> io::Result<File> {
    let staging = sidecar_path(path, "new");
    let mut file = create_private(&staging)?;
    let published = writeln!(file, "{}", process::id())
        .and_then(|()| file.sync_all())
        .and_then(|()| fs::hard_link(&staging, path));
    remove_sidecar(&staging);
    published.map(|()| file)
}

fn create_private(path: &Path) -> io::Result<File> {
    let mut options = OpenOptions::new();
    options.write(true).create_new(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }
    options.open(path)
}

/// Unique name beside the lock, private to this call.
fn sidecar_path(path: &Path, kind: &str) -> PathBuf {
    let sequence = SIDECAR_SEQUENCE.fetch_add(1, Ordering::Relaxed);
    let mut name = path.as_os_str().to_owned();
    name.push(format!(".{}.{sequence}.{kind}", process::id()));
    PathBuf::from(name)
}

fn remove_sidecar(path: &Path) {
    if let Err(error) = fs::remove_file(path)
        && error.kind() != io::ErrorKind::NotFound
    {
        warn!(
            target: SUPERVISOR_TARGET,
            file = %path.display(),
            error = %error,
            "failed to remove port lease staging file"
        );
    }
}

fn clear_if_stale(path: &Path) -> Result<(), SupervisorError> {
    match wait_for_holder(path) {
        Some(pid) if pid != 0 => {
            if process_is_alive(pid)? {
                info!(
                    target: SUPERVISOR_TARGET,
                    pid,
                    file = %path.display(),
                    "port lease held by a live process"
                );
                return Err(SupervisorError::LeaseHeld { pid });
            }
            warn!(
                target: SUPERVISOR_TARGET,
                pid,
                "port lease holder not detected; clearing stale lease"
            );
        }
        _ => warn!(
            target: SUPERVISOR_TARGET,
            file = %path.display(),
            "port lease names no holder; clearing stale lease"
        ),
    }
    retire(path)
}

/// Reads the holder, giving a lock that is still being written by another
/// launcher up to `IN_FLIGHT_GRACE` to name itself.
fn wait_for_holder(path: &Path) -> Option<u32> {
    loop {
        if let Some(pid) = read_holder(path) {
            return Some(pid);
        }
        if !is_in_flight(path) {
            return None;
        }
        thread::sleep(IN_FLIGHT_POLL);
    }
}

fn is_in_flight(path: &Path) -> bool {
    fs::metadata(path)
        .and_then(|metadata| metadata.modified())
        .is_ok_and(|modified| {
            modified
                .elapsed()
                .map_or(true, |age| age < IN_FLIGHT_GRACE)
        })
}

/// Moves a stale lock aside and deletes it.
///
/// The lock is renamed before it is inspected again, so a lease another
/// launcher published after the staleness check is put back instead of
/// being deleted.
fn retire(path: &Path) -> Result<(), SupervisorError> {
    let tombstone = sidecar_path(path, "stale");
    match fs::rename(path, &tombstone) {
        Ok(()) => {}
        Err(error) if error.kind() == io::ErrorKind::NotFound => return Ok(()),
        Err(source) => {
            return Err(SupervisorError::LeaseCleanup {
                path: path.to_path_buf(),
                source,
            });
        }
    }
    if let Some(pid) = read_holder(&tombstone).filter(|pid| *pid != 0)
        && process_is_alive(pid)?
    {
        // Losing this link to a third launcher still leaves the port leased.
        if let Err(source) = fs::hard_link(&tombstone, path)
            && source.kind() != io::ErrorKind::AlreadyExists
        {
            remove_sidecar(&tombstone);
            return Err(SupervisorError::LeaseCleanup {
                path: path.to_path_buf(),
                source,
            });
        }
        remove_sidecar(&tombstone);
        return Err(SupervisorError::LeaseHeld { pid });
    }
    remove_sidecar(&tombstone);
    Ok(())
}

/// Reads the launcher pid from the first line of the lease.
fn read_holder(path: &Path) -> Option<u32> {
    let content = fs::read_to_string(path).ok()?;
    content.lines().next()?.trim().parse::<u32>().ok()
}

#[cfg(unix)]
pub(crate) fn process_is_alive(pid: u32) -> Result<bool, SupervisorError> {
    use nix::errno::Errno;
    use nix::sys::signal::kill;
    use nix::unistd::Pid;

    let Ok(raw) = i32::try_from(pid) else {
        return Ok(false);
    };
    match kill(Pid::from_raw(raw), None) {
        Ok(()) | Err(Errno::EPERM) => Ok(true),
        Err(Errno::ESRCH) => Ok(false),
        Err(errno) => Err(SupervisorError::CheckProcess {
            pid,
            source: io::Error::from(errno),
        }),
    }
}

#[cfg(not(unix))]
pub(crate) fn process_is_alive(_pid: u32) -> Result<bool, SupervisorError> {
    // Without a portable liveness check every recorded holder counts as live.
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use std::time::SystemTime;
    use tempfile::TempDir;

    fn lock_path(dir: &TempDir) -> PathBuf {
        dir.path().join("server-3092.lock")
    }

    #[test]
    fn acquire_records_launcher_pid() {
        let dir = TempDir::new().expect("temp dir");
        let path = lock_path(&dir);
        let lease = PortLease::acquire(&path).expect("acquire lease");
        assert_eq!(read_holder(lease.path()), Some(process::id()));
    }

    #[test]
    fn record_child_appends_server_pid() {
        let dir = TempDir::new().expect("temp dir");
        let path = lock_path(&dir);
        let mut lease = PortLease::acquire(&path).expect("acquire lease");
        lease.record_child(4242).expect("record child");
        let content = fs::read_to_string(&path).expect("read lease");
        assert_eq!(content, format!("{}\n4242\n", process::id()));
    }

    #[test]
    fn drop_removes_lock_file() {
        let dir = TempDir::new().expect("temp dir");
        let path = lock_path(&dir);
        drop(PortLease::acquire(&path).expect("acquire lease"));
        assert!(!path.exists());
    }

    #[test]
    fn live_holder_blocks_second_lease() {
        let dir = TempDir::new().expect("temp dir");
        let path = lock_path(&dir);
        let _first = PortLease::acquire(&path).expect("acquire lease");
        let error = PortLease::acquire(&path).expect_err("second lease should be refused");
        let SupervisorError::LeaseHeld { pid } = error else {
            panic!("expected LeaseHeld, got {error:?}");
        };
        assert_eq!(pid, process::id());
    }

    #[cfg(unix)]
    #[test]
    fn stale_lease_is_replaced() {
        let dir = TempDir::new().expect("temp dir");
        let path = lock_path(&dir);
        // PID 99999999 is extremely unlikely to exist on any system.
        fs::write(&path, "99999999\n").expect("write stale lease");
        let lease = PortLease::acquire(&path).expect("replace stale lease");
        assert_eq!(read_holder(lease.path()), Some(process::id()));
    }

    fn age(path: &Path) {
        let file = OpenOptions::new().write(true).open(path).expect("open lease");
        file.set_modified(SystemTime::now() - Duration::from_secs(60))
            .expect("age lease");
    }

    #[rstest]
    #[case::garbage("not a pid\n")]
    #[case::empty("")]
    fn abandoned_unreadable_lease_is_treated_as_stale(#[case] content: &str) {
        let dir = TempDir::new().expect("temp dir");
        let path = lock_path(&dir);
        fs::write(&path, content).expect("write unreadable lease");
        age(&path);
        let lease = PortLease::acquire(&path).expect("replace unreadable lease");
        assert_eq!(read_holder(lease.path()), Some(process::id()));
    }

    #[test]
    fn lease_still_being_written_is_not_taken() {
        let dir = TempDir::new().expect("temp dir");
        let path = lock_path(&dir);
        fs::write(&path, "").expect("write empty lease");
        let writer_path = path.clone();
        let writer = thread::spawn(move || {
            thread::sleep(Duration::from_millis(100));
            fs::write(&writer_path, format!("{}\n", process::id())).expect("finish lease");
        });

        let error = PortLease::acquire(&path).expect_err("in-flight lease must be respected");
        writer.join().expect("writer thread");

        assert!(matches!(error, SupervisorError::LeaseHeld { pid } if pid == process::id()));
        assert_eq!(read_holder(&path), Some(process::id()));
    }

    #[cfg(unix)]
    #[test]
    fn acquire_leaves_no_sidecar_files() {
        let dir = TempDir::new().expect("temp dir");
        let path = lock_path(&dir);
        fs::write(&path, "99999999\n").expect("write stale lease");
        let _lease = PortLease::acquire(&path).expect("acquire lease");
        let names: Vec<_> = fs::read_dir(dir.path())
            .expect("list install dir")
            .map(|entry| entry.expect("dir entry").file_name())
            .collect();
        assert_eq!(names, [std::ffi::OsString::from("server-3092.lock")]);
    }

    #[cfg(unix)]
    #[test]
    fn current_process_is_alive() {
        assert!(process_is_alive(process::id()).expect("probe self"));
        assert!(!process_is_alive(99_999_999).expect("probe missing pid"));
    }
}
