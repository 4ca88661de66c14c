//! Hierarchical per-path reader/writer locking.
//!
//! Every host operation on a path takes a read lock on each ancestor's
//! name-stability ("path") lock and a `{path, data}` pair on the final
//! component, with modes chosen by the operation class. Lock entries are
//! reference-counted: the global table mutex is held only to take or drop
//! references, never while blocking on a per-path lock.
//!
//! Acquisition follows one total order (lexicographic over the full key
//! set, which places every prefix before its descendants), so overlapping
//! multi-path operations cannot deadlock; unlock runs in reverse.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::lock_api::{ArcRwLockReadGuard, ArcRwLockWriteGuard};
use parking_lot::{Mutex, RawRwLock, RwLock};

type ReadGuard = ArcRwLockReadGuard<RawRwLock, ()>;
type WriteGuard = ArcRwLockWriteGuard<RawRwLock, ()>;

/// How an operation treats the final path component.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpClass {
    /// Reads name and content: both locks shared.
    Access,
    /// Rewrites content but not the name: shared path, exclusive data.
    Modify,
    /// Adds or removes the name itself: both locks exclusive.
    CreateOrDelete,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Read,
    Write,
}

impl Mode {
    fn strongest(self, other: Mode) -> Mode {
        if self == Mode::Write || other == Mode::Write {
            Mode::Write
        } else {
            Mode::Read
        }
    }
}

struct LockEntry {
    refs: usize,
    path: Arc<RwLock<()>>,
    data: Arc<RwLock<()>>,
}

enum Held {
    Read(ReadGuard),
    Write(WriteGuard),
}

/// The lock table.
pub struct PathLocks {
    table: Mutex<HashMap<String, LockEntry>>,
}

impl Default for PathLocks {
    fn default() -> Self {
        Self::new()
    }
}

impl PathLocks {
    pub fn new() -> PathLocks {
        PathLocks { table: Mutex::new(HashMap::new()) }
    }

    /// Locks `name` (a portable path, `.` for the root) for one operation.
    pub fn lock(&self, name: &str, class: OpClass) -> PathGuard<'_> {
        let mut plan = Plan::new();
        plan.chain(name, class);
        self.acquire(plan)
    }

    /// Locks both ends of a rename. The parents' chains are shared, the
    /// two renamed names take exclusive pairs regardless of parentage.
    pub fn lock_rename(&self, old: &str, new: &str) -> PathGuard<'_> {
        let mut plan = Plan::new();
        plan.chain(old, OpClass::CreateOrDelete);
        plan.chain(new, OpClass::CreateOrDelete);
        self.acquire(plan)
    }

    /// Number of live entries in the table; drops to zero when no guard is
    /// outstanding.
    pub fn entry_count(&self) -> usize {
        self.table.lock().len()
    }

    fn acquire(&self, plan: Plan) -> PathGuard<'_> {
        let wants = plan.into_sorted();

        // Reference and clone the needed locks under the table mutex.
        let mut staged = Vec::with_capacity(wants.len());
        {
            let mut table = self.table.lock();
            for want in &wants {
                let entry = table.entry(want.key.clone()).or_insert_with(|| LockEntry {
                    refs: 0,
                    path: Arc::new(RwLock::new(())),
                    data: Arc::new(RwLock::new(())),
                });
                entry.refs += 1;
                staged.push((Arc::clone(&entry.path), Arc::clone(&entry.data)));
            }
        }

        // Block on the per-path locks outside the table mutex, in plan
        // order.
        let mut held = Vec::new();
        for (want, (path, data)) in wants.iter().zip(staged) {
            held.push(grab(path, want.path_mode));
            if let Some(mode) = want.data_mode {
                held.push(grab(data, mode));
            }
        }

        PathGuard { locks: self, keys: wants.into_iter().map(|w| w.key).collect(), held }
    }

    fn release(&self, keys: &[String]) {
        let mut table = self.table.lock();
        for key in keys {
            if let Some(entry) = table.get_mut(key) {
                entry.refs -= 1;
                if entry.refs == 0 {
                    table.remove(key);
                }
            }
        }
    }
}

fn grab(lock: Arc<RwLock<()>>, mode: Mode) -> Held {
    match mode {
        Mode::Read => Held::Read(lock.read_arc()),
        Mode::Write => Held::Write(lock.write_arc()),
    }
}

struct Want {
    key: String,
    path_mode: Mode,
    data_mode: Option<Mode>,
}

/// Accumulates lock requirements, merging duplicates to their strongest
/// mode.
struct Plan {
    wants: HashMap<String, (Mode, Option<Mode>)>,
}

impl Plan {
    fn new() -> Plan {
        Plan { wants: HashMap::new() }
    }

    fn chain(&mut self, name: &str, class: OpClass) {
        let components: Vec<&str> = if name == "." {
            vec!["."]
        } else {
            name.split('/').filter(|c| !c.is_empty()).collect()
        };

        let mut prefix = String::new();
        for (i, component) in components.iter().enumerate() {
            if !prefix.is_empty() {
                prefix.push('/');
            }
            prefix.push_str(component);
            let last = i + 1 == components.len();
            if last {
                let (path_mode, data_mode) = match class {
                    OpClass::Access => (Mode::Read, Mode::Read),
                    OpClass::Modify => (Mode::Read, Mode::Write),
                    OpClass::CreateOrDelete => (Mode::Write, Mode::Write),
                };
                self.add(&prefix, path_mode, Some(data_mode));
            } else {
                self.add(&prefix, Mode::Read, None);
            }
        }
    }

    fn add(&mut self, key: &str, path_mode: Mode, data_mode: Option<Mode>) {
        let slot = self.wants.entry(key.to_string()).or_insert((Mode::Read, None));
        slot.0 = slot.0.strongest(path_mode);
        slot.1 = match (slot.1, data_mode) {
            (None, m) | (m, None) => m,
            (Some(a), Some(b)) => Some(a.strongest(b)),
        };
    }

    fn into_sorted(self) -> Vec<Want> {
        let mut wants: Vec<Want> = self
            .wants
            .into_iter()
            .map(|(key, (path_mode, data_mode))| Want { key, path_mode, data_mode })
            .collect();
        wants.sort_by(|a, b| a.key.cmp(&b.key));
        wants
    }
}

/// Held locks for one operation. Dropping the guard releases the per-path
/// locks in reverse acquisition order, then drops the table references.
pub struct PathGuard<'a> {
    locks: &'a PathLocks,
    keys: Vec<String>,
    held: Vec<Held>,
}

impl PathGuard<'_> {
    /// The lock-table keys this guard covers, in acquisition order.
    pub fn keys(&self) -> &[String] {
        &self.keys
    }
}

impl Drop for PathGuard<'_> {
    fn drop(&mut self) {
        while let Some(held) = self.held.pop() {
            drop(held);
        }
        self.locks.release(&self.keys);
    }
}
