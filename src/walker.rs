//! Concurrent tree walker
//!
//! Discovers files under the plan's whitelist, schedules them onto a fixed
//! worker pool and produces the relative path -> digest mapping. The queue
//! is a plain mutex-guarded deque: contention is bounded by queue-operation
//! granularity, the expensive work is hashing.
//!
//! ## Termination invariant
//!
//! A momentarily empty queue does not mean the walk is done: a worker that
//! is still expanding a directory is about to push new items. Every popped
//! item therefore increments the in-flight counter inside the same critical
//! section as the pop, and directory expansions push children and release
//! the counter inside one critical section. A worker only exits when the
//! queue is empty *and* nothing is in flight.
//!
//! The first worker error is sticky: every worker re-checks it once per
//! loop iteration and stops claiming new work, and the run fails atomically
//! with that error once all workers have unwound.

use crate::algorithm::Algorithm;
use crate::error::{Result, TreesumError};
use crate::hasher::FileHasher;
use crate::plan::HashPlan;
use dashmap::DashMap;
use parking_lot::{Condvar, Mutex};
use std::collections::{BTreeMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, trace, warn};

/// How long a worker parks on an empty-but-not-finished queue before
/// re-checking the in-flight counter and the sticky error flag
const IDLE_WAIT: Duration = Duration::from_millis(10);

/// Interval between progress reports
const PROGRESS_INTERVAL: Duration = Duration::from_secs(1);

/// Claim state of a relative path in the shared map.
///
/// `Reserved` both deduplicates concurrent discovery and marks directories
/// and blacklisted paths; only `Hashed` entries make it into the results.
enum PathState {
    Reserved,
    Hashed(Vec<u8>),
}

struct WalkerShared<'p> {
    plan: &'p HashPlan,
    queue: Mutex<VecDeque<PathBuf>>,
    work_available: Condvar,
    /// Items popped but not yet fully expanded or hashed
    in_flight: AtomicUsize,
    /// Sticky error flag; the first error wins
    failed: AtomicBool,
    first_error: Mutex<Option<TreesumError>>,
    claims: DashMap<String, PathState>,
    files_hashed: AtomicU64,
    bytes_hashed: Arc<AtomicU64>,
}

impl WalkerShared<'_> {
    /// Record the first error and raise the sticky flag; later errors are
    /// dropped, the run fails with whichever came first
    fn record_error(&self, error: TreesumError) {
        let mut first = self.first_error.lock();
        if first.is_none() {
            *first = Some(error);
        }
        self.failed.store(true, Ordering::SeqCst);
        self.work_available.notify_all();
    }
}

/// Releases one in-flight slot on drop, waking idle workers when the
/// counter reaches zero so they can observe termination
struct InFlightGuard<'a, 'p> {
    shared: &'a WalkerShared<'p>,
}

impl Drop for InFlightGuard<'_, '_> {
    fn drop(&mut self) {
        if self.shared.in_flight.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.shared.work_available.notify_all();
        }
    }
}

/// Walk the plan's whitelist with `workers` concurrent workers, hashing
/// every non-blacklisted file with `algorithm`.
///
/// Returns the path-sorted relative path -> digest mapping; directories and
/// blacklisted entries never appear in it.
pub fn walk(
    plan: &HashPlan,
    algorithm: Algorithm,
    workers: usize,
) -> Result<BTreeMap<String, Vec<u8>>> {
    let mut queue = VecDeque::new();
    for entry in &plan.whitelist {
        let path = PathBuf::from(entry);
        if path.is_dir() && !entry.ends_with('/') {
            warn!("Relative path '{entry}' is a directory - please append a trailing / in the [hash plan]");
        }
        queue.push_back(path);
    }

    let shared = WalkerShared {
        plan,
        queue: Mutex::new(queue),
        work_available: Condvar::new(),
        in_flight: AtomicUsize::new(0),
        failed: AtomicBool::new(false),
        first_error: Mutex::new(None),
        claims: DashMap::new(),
        files_hashed: AtomicU64::new(0),
        bytes_hashed: Arc::new(AtomicU64::new(0)),
    };
    let start = Instant::now();
    let progress_done = (Mutex::new(false), Condvar::new());

    std::thread::scope(|scope| {
        let mut handles = Vec::with_capacity(workers);
        for worker in 1..=workers {
            let shared = &shared;
            handles.push(scope.spawn(move || worker_loop(shared, algorithm, worker)));
        }
        scope.spawn(|| progress_loop(&shared, start, &progress_done));

        for handle in handles {
            if handle.join().is_err() {
                shared.record_error(TreesumError::Io(std::io::Error::other(
                    "worker panicked",
                )));
            }
        }

        *progress_done.0.lock() = true;
        progress_done.1.notify_all();
    });

    if let Some(e) = shared.first_error.lock().take() {
        return Err(e);
    }

    let mut sorted = BTreeMap::new();
    for (path, state) in shared.claims.into_iter() {
        if let PathState::Hashed(digest) = state {
            sorted.insert(path, digest);
        }
    }
    info!(
        "Hashed {} files with a total of {} bytes in {:.3} sec",
        sorted.len(),
        shared.bytes_hashed.load(Ordering::Relaxed),
        start.elapsed().as_secs_f64(),
    );
    Ok(sorted)
}

fn worker_loop(shared: &WalkerShared<'_>, algorithm: Algorithm, worker: usize) {
    trace!("Started worker #{worker} ...");
    let mut hasher = FileHasher::new(algorithm, shared.bytes_hashed.clone());

    loop {
        if shared.failed.load(Ordering::SeqCst) {
            debug!("Worker #{worker} is shutting down due to error in another worker");
            return;
        }

        let item = {
            let mut queue = shared.queue.lock();
            match queue.pop_front() {
                Some(path) => {
                    // the increment must happen inside this critical
                    // section: a momentarily empty queue with this item
                    // still unprocessed must not look terminal
                    shared.in_flight.fetch_add(1, Ordering::SeqCst);
                    Some(path)
                }
                None => None,
            }
        };

        let Some(path) = item else {
            if shared.in_flight.load(Ordering::SeqCst) == 0 {
                trace!("Worker #{worker} is finished");
                shared.work_available.notify_all();
                return;
            }
            let mut queue = shared.queue.lock();
            if queue.is_empty()
                && shared.in_flight.load(Ordering::SeqCst) != 0
                && !shared.failed.load(Ordering::SeqCst)
            {
                let _ = shared.work_available.wait_for(&mut queue, IDLE_WAIT);
            }
            continue;
        };

        let guard = InFlightGuard { shared };
        if let Err(e) = process_item(shared, &mut hasher, guard, &path) {
            error!("Worker #{worker} failed on {:?}, shutting down other workers ...", path);
            shared.record_error(e);
            return;
        }
    }
}

/// Classify one popped item, then expand it (directory) or hash it (file).
/// The in-flight guard is released at the point appropriate for each
/// outcome; hash errors surface as the run's sticky error.
fn process_item(
    shared: &WalkerShared<'_>,
    hasher: &mut FileHasher,
    guard: InFlightGuard<'_, '_>,
    path: &Path,
) -> Result<()> {
    let metadata = std::fs::metadata(path).map_err(|source| TreesumError::WalkIo {
        path: path.to_path_buf(),
        source,
    })?;
    let is_dir = metadata.is_dir();
    let relative = relativise(&shared.plan.base_path, path, is_dir)?;

    // reserve this relative path against concurrent workers; a duplicate
    // reachable via distinct whitelist entries is processed once only
    {
        use dashmap::mapref::entry::Entry;
        match shared.claims.entry(relative.clone()) {
            Entry::Occupied(_) => {
                trace!("Skipping duplicate path: '{relative}'");
                return Ok(());
            }
            Entry::Vacant(vacant) => {
                vacant.insert(PathState::Reserved);
            }
        }
    }

    if !is_allowed(shared.plan, &relative) {
        // the reservation stays behind as a marker and is filtered out of
        // the final mapping
        trace!("Skipping blacklisted path: '{relative}'");
        return Ok(());
    }

    if is_dir {
        let mut children = Vec::new();
        let listing = std::fs::read_dir(path).map_err(|source| TreesumError::WalkIo {
            path: path.to_path_buf(),
            source,
        })?;
        for child in listing {
            let child = child.map_err(|source| TreesumError::WalkIo {
                path: path.to_path_buf(),
                source,
            })?;
            children.push(child.path());
        }
        let mut queue = shared.queue.lock();
        queue.extend(children);
        // release the slot inside the same critical section as the pushes,
        // otherwise the queue could look empty-and-idle in between
        drop(guard);
        shared.work_available.notify_all();
    } else {
        // this may be one of the last items: release the slot before the
        // (potentially long) hash so idle workers are not kept spinning
        drop(guard);
        let digest = hasher.hash_file(path)?;
        shared.claims.insert(relative, PathState::Hashed(digest));
        shared.files_hashed.fetch_add(1, Ordering::Relaxed);
    }
    Ok(())
}

/// Strip the base path prefix; directories get a trailing `/` so that
/// blacklist patterns can tell them apart from files
fn relativise(base_path: &str, path: &Path, is_dir: bool) -> Result<String> {
    let text = path
        .to_str()
        .ok_or_else(|| TreesumError::PathNotUtf8(path.to_path_buf()))?;
    let mut full = text.replace('\\', "/");
    if is_dir && !full.ends_with('/') {
        full.push('/');
    }
    match full.strip_prefix(base_path) {
        Some(relative) => Ok(relative.to_string()),
        // whitelist roots always live under the base path, so this can
        // only mean the plan was built inconsistently
        None => Err(TreesumError::PathOutsideBase {
            path: full,
            base: base_path.to_string(),
        }),
    }
}

/// Blacklist decision for one relative path. Directories are matched with
/// their trailing separator; when only the slashless form matches, that is
/// most likely a pattern missing its trailing slash, so say so.
fn is_allowed(plan: &HashPlan, relative: &str) -> bool {
    let Some(blacklist) = &plan.blacklist else {
        return true;
    };
    if blacklist.is_match(relative) {
        return false;
    }
    if let Some(trimmed) = relative.strip_suffix('/') {
        if blacklist.is_match(trimmed) {
            warn!("Relative path '{trimmed}' is a directory - please append a trailing / to this blacklist pattern");
        }
    }
    true
}

/// Best-effort throughput reporting on a side thread; reads the counters
/// without coordination and never affects the walk itself
fn progress_loop(shared: &WalkerShared<'_>, start: Instant, done: &(Mutex<bool>, Condvar)) {
    let (lock, condvar) = done;
    let mut last_files = u64::MAX;
    loop {
        let finished = {
            let mut finished = lock.lock();
            if !*finished {
                condvar.wait_for(&mut finished, PROGRESS_INTERVAL);
            }
            *finished
        };

        let files = shared.files_hashed.load(Ordering::Relaxed);
        if !finished || files != last_files {
            last_files = files;
            let bytes = shared.bytes_hashed.load(Ordering::Relaxed);
            let seconds = start.elapsed().as_secs_f64();
            let files_speed = if seconds > 0.0 { files as f64 / seconds } else { 0.0 };
            let mib_speed = if seconds > 0.0 {
                bytes as f64 / seconds / (1 << 20) as f64
            } else {
                0.0
            };
            let notice = if shared.failed.load(Ordering::SeqCst) {
                " [stopping early due to errors]"
            } else {
                ""
            };
            info!(
                "Hashed {files} files with a total of {bytes} bytes in {seconds:.3} sec \
                 (average speed: {files_speed:.0} files/sec, {mib_speed:.0} MiB/sec){notice}"
            );
        }
        if finished {
            return;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::HashPlan;
    use std::fs;
    use tempfile::TempDir;

    fn plan_for(dir: &TempDir, text: &str) -> HashPlan {
        HashPlan::parse(dir.path(), text).unwrap()
    }

    #[test]
    fn test_walk_hashes_all_files() {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("sub/deeper")).unwrap();
        fs::write(dir.path().join("a.txt"), b"alpha").unwrap();
        fs::write(dir.path().join("sub/b.txt"), b"beta").unwrap();
        fs::write(dir.path().join("sub/deeper/c.txt"), b"gamma").unwrap();

        let plan = plan_for(&dir, "");
        let mapping = walk(&plan, Algorithm::Sha1, 4).unwrap();
        let paths: Vec<&String> = mapping.keys().collect();
        assert_eq!(paths, vec!["a.txt", "sub/b.txt", "sub/deeper/c.txt"]);
        assert_eq!(mapping["a.txt"], Algorithm::Sha1.digest(b"alpha"));
    }

    #[test]
    fn test_deterministic_across_worker_counts() {
        let dir = TempDir::new().unwrap();
        for i in 0..40 {
            let sub = dir.path().join(format!("d{:02}", i % 7));
            fs::create_dir_all(&sub).unwrap();
            fs::write(sub.join(format!("f{i}.dat")), format!("content {i}")).unwrap();
        }
        let plan = plan_for(&dir, "");
        let single = walk(&plan, Algorithm::Sha256, 1).unwrap();
        let many = walk(&plan, Algorithm::Sha256, 8).unwrap();
        assert_eq!(single, many);
    }

    #[test]
    fn test_deep_chain_terminates_with_many_workers() {
        // a long single-child chain keeps the queue hovering around empty,
        // exactly the shape that would trip premature termination
        let dir = TempDir::new().unwrap();
        let mut current = dir.path().to_path_buf();
        for i in 0..50 {
            current = current.join(format!("level{i}"));
            fs::create_dir(&current).unwrap();
        }
        fs::write(current.join("leaf.txt"), b"bottom").unwrap();

        let plan = plan_for(&dir, "");
        let mapping = walk(&plan, Algorithm::Sha1, 8).unwrap();
        assert_eq!(mapping.len(), 1);
        assert!(mapping.keys().next().unwrap().ends_with("leaf.txt"));
    }

    #[test]
    fn test_duplicate_whitelist_roots_dedup() {
        let dir = TempDir::new().unwrap();
        fs::create_dir(dir.path().join("src")).unwrap();
        fs::write(dir.path().join("src/main.rs"), b"fn main() {}").unwrap();

        // the file is reachable both via the directory and directly
        let plan = plan_for(&dir, "src/\nsrc/main.rs\n");
        let mapping = walk(&plan, Algorithm::Sha1, 4).unwrap();
        assert_eq!(mapping.len(), 1);
        assert!(mapping.contains_key("src/main.rs"));
    }

    #[test]
    fn test_blacklisted_file_excluded_directory_still_traversed() {
        let dir = TempDir::new().unwrap();
        fs::create_dir(dir.path().join("build")).unwrap();
        fs::write(dir.path().join("build/output.tmp"), b"scratch").unwrap();
        fs::write(dir.path().join("build/keep.txt"), b"kept").unwrap();

        let plan = plan_for(&dir, "!*.tmp\n");
        let mapping = walk(&plan, Algorithm::Sha1, 2).unwrap();
        assert_eq!(mapping.len(), 1);
        assert!(mapping.contains_key("build/keep.txt"));
    }

    #[test]
    fn test_blacklisted_directory_not_traversed() {
        let dir = TempDir::new().unwrap();
        fs::create_dir(dir.path().join("target")).unwrap();
        fs::write(dir.path().join("target/skipped.txt"), b"no").unwrap();
        fs::write(dir.path().join("kept.txt"), b"yes").unwrap();

        let plan = plan_for(&dir, "!target/*\n!target/\n");
        let mapping = walk(&plan, Algorithm::Sha1, 2).unwrap();
        assert_eq!(mapping.len(), 1);
        assert!(mapping.contains_key("kept.txt"));
    }

    #[test]
    fn test_missing_whitelist_entry_fails_run() {
        let dir = TempDir::new().unwrap();
        let plan = plan_for(&dir, "does-not-exist.txt\n");
        let err = walk(&plan, Algorithm::Sha1, 2).unwrap_err();
        assert!(matches!(err, TreesumError::WalkIo { .. }));
    }

    #[test]
    fn test_directories_never_appear_in_results() {
        let dir = TempDir::new().unwrap();
        fs::create_dir(dir.path().join("empty")).unwrap();
        fs::write(dir.path().join("file.txt"), b"data").unwrap();

        let plan = plan_for(&dir, "");
        let mapping = walk(&plan, Algorithm::Sha1, 2).unwrap();
        assert_eq!(mapping.keys().collect::<Vec<_>>(), vec!["file.txt"]);
    }

    #[test]
    fn test_relativise() {
        assert_eq!(
            relativise("/base/", Path::new("/base/a/b.txt"), false).unwrap(),
            "a/b.txt"
        );
        assert_eq!(
            relativise("/base/", Path::new("/base/a"), true).unwrap(),
            "a/"
        );
        assert!(matches!(
            relativise("/base/", Path::new("/elsewhere/x"), false),
            Err(TreesumError::PathOutsideBase { .. })
        ));
    }
}
