//! Module resolution and caching
//!
//! A module is a source file evaluated once, in a fresh namespace with no
//! access to the caller's variables. The resulting namespace is cached by
//! canonical path for the lifetime of the evaluator, so every `use` of the
//! same file gets the same live namespace.

use dashmap::DashMap;
use parking_lot::{Condvar, Mutex};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::instrument;

use crate::environment::{Frame, Namespace};
use crate::error::{EvalError, Reason};
use crate::evaluator::exec_chunk;
use crate::frontend::Source;

/// How often a blocked load rechecks the interrupt flag.
const WAIT_POLL: Duration = Duration::from_millis(50);

#[derive(Clone)]
enum Load {
    Loading,
    Done(Namespace),
}

/// A `use` blocked on another chain's load of `target`.
struct Waiter {
    chain: Vec<PathBuf>,
    target: PathBuf,
}

#[derive(Default)]
struct LoadState {
    modules: HashMap<PathBuf, Load>,
    waiters: HashMap<u64, Waiter>,
    next_waiter: u64,
}

impl LoadState {
    /// Whether the load of `target` is, directly or through other blocked
    /// loads, waiting on one of the modules `chain` is loading.
    fn waits_on(&self, target: &Path, chain: &[PathBuf]) -> bool {
        let mut pending = vec![target.to_path_buf()];
        let mut seen = HashSet::new();
        while let Some(path) = pending.pop() {
            if chain.contains(&path) {
                return true;
            }
            if !seen.insert(path.clone()) {
                continue;
            }
            pending.extend(
                self.waiters
                    .values()
                    .filter(|w| w.chain.contains(&path))
                    .map(|w| w.target.clone()),
            );
        }
        false
    }
}

/// Outcome of asking the cache for a module.
enum Claim<'a> {
    /// Already loaded
    Ready(Namespace),
    /// The caller must load it and report back through the guard
    Load(LoadGuard<'a>),
}

/// Marks a load in progress; dropping it unfinished forgets the load.
struct LoadGuard<'a> {
    cache: &'a ModuleCache,
    path: PathBuf,
    done: bool,
}

impl LoadGuard<'_> {
    fn finish(mut self, ns: Namespace) {
        self.cache
            .state
            .lock()
            .modules
            .insert(self.path.clone(), Load::Done(ns));
        self.done = true;
        self.cache.changed.notify_all();
    }
}

impl Drop for LoadGuard<'_> {
    fn drop(&mut self) {
        if !self.done {
            self.cache.state.lock().modules.remove(&self.path);
            self.cache.changed.notify_all();
        }
    }
}

/// Loaded modules by canonical path, plus natively registered ones.
///
/// Concurrent `use`s of one path evaluate it once: later callers block
/// until the first load finishes. A caller that would block on a load
/// which is itself waiting for a module the caller is loading gets
/// `ModuleCycle` instead.
#[derive(Default)]
pub struct ModuleCache {
    state: Mutex<LoadState>,
    changed: Condvar,
    native: DashMap<String, Namespace>,
}

impl ModuleCache {
    /// An empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a native module under a bare name.
    pub fn register(&self, name: impl Into<String>, ns: Namespace) {
        self.native.insert(name.into(), ns);
    }

    /// A registered native module.
    pub fn native(&self, name: &str) -> Option<Namespace> {
        self.native.get(name).map(|ns| ns.clone())
    }

    /// The namespace loaded from `path`, if loading has completed.
    pub fn get(&self, path: &Path) -> Option<Namespace> {
        match self.state.lock().modules.get(path) {
            Some(Load::Done(ns)) => Some(ns.clone()),
            _ => None,
        }
    }

    /// Number of file modules loaded so far. Loads in progress do not count.
    pub fn len(&self) -> usize {
        self.state
            .lock()
            .modules
            .values()
            .filter(|load| matches!(load, Load::Done(_)))
            .count()
    }

    /// Whether no file module has been loaded.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Get the module at `path`, or claim the right to load it.
    ///
    /// Blocks while another caller is loading the same path.
    fn claim<I>(
        &self,
        path: &Path,
        spec: &str,
        chain: &[PathBuf],
        interrupted: I,
    ) -> Result<Claim<'_>, Reason>
    where
        I: Fn() -> bool,
    {
        let mut state = self.state.lock();
        let mut waiter = None;
        let result = loop {
            match state.modules.get(path).cloned() {
                Some(Load::Done(ns)) => break Ok(Claim::Ready(ns)),
                None => {
                    state.modules.insert(path.to_path_buf(), Load::Loading);
                    break Ok(Claim::Load(LoadGuard {
                        cache: self,
                        path: path.to_path_buf(),
                        done: false,
                    }));
                }
                Some(Load::Loading) => {
                    if waiter.is_none() {
                        if state.waits_on(path, chain) {
                            break Err(Reason::ModuleCycle(spec.to_string()));
                        }
                        let id = state.next_waiter;
                        state.next_waiter += 1;
                        state.waiters.insert(
                            id,
                            Waiter {
                                chain: chain.to_vec(),
                                target: path.to_path_buf(),
                            },
                        );
                        waiter = Some(id);
                    }
                    if interrupted() {
                        break Err(Reason::Interrupted);
                    }
                    self.changed.wait_for(&mut state, WAIT_POLL);
                }
            }
        };
        if let Some(id) = waiter {
            state.waiters.remove(&id);
        }
        result
    }
}

/// Whether a specifier names a file relative to the using code.
pub fn is_path_spec(spec: &str) -> bool {
    spec.starts_with("./") || spec.starts_with("../") || spec.starts_with('/')
}

/// The variable name a `use` of `spec` binds, without the `:` suffix.
pub fn binding_name(spec: &str) -> &str {
    spec.rsplit('/').next().unwrap_or(spec)
}

/// Resolve a specifier to the canonical path of a module file.
///
/// Path specifiers are taken relative to `base` (the directory of the
/// using file, or the current directory); bare names are looked up in
/// `lib_dirs` in order. `ext` is appended to the specifier.
///
/// # Errors
///
/// `NoSuchModule` if no file exists.
pub fn resolve_spec(
    spec: &str,
    base: Option<&Path>,
    lib_dirs: &[PathBuf],
    ext: &str,
) -> Result<PathBuf, Reason> {
    let file = format!("{}.{}", spec, ext);
    let candidates: Vec<PathBuf> = if is_path_spec(spec) {
        let base = match base {
            Some(dir) => dir.to_path_buf(),
            None => std::env::current_dir().map_err(|e| Reason::Io(e.to_string()))?,
        };
        vec![base.join(&file)]
    } else {
        lib_dirs.iter().map(|dir| dir.join(&file)).collect()
    };

    candidates
        .iter()
        .filter(|p| p.is_file())
        .find_map(|p| p.canonicalize().ok())
        .ok_or_else(|| Reason::NoSuchModule(spec.to_string()))
}

/// Load (or fetch from cache) the module named by `spec`.
///
/// # Errors
///
/// - `NoSuchModule` if `spec` resolves to nothing
/// - `ModuleCycle` if the module is already being loaded by this frame's
///   chain of `use`s, or by a concurrent load that is waiting on it
/// - `Interrupted` if the evaluator is interrupted while waiting for a
///   concurrent load
/// - `Io` if the file cannot be read
/// - any error raised while compiling or running the module; failed
///   loads are not cached
#[instrument(level = "debug", skip(fm), err)]
pub fn use_module(fm: &Frame, spec: &str) -> Result<Namespace, EvalError> {
    let ev = fm.evaluator();
    if !is_path_spec(spec) {
        if let Some(ns) = ev.modules().native(spec) {
            return Ok(ns);
        }
    }

    let base = fm.source.path.as_deref().and_then(Path::parent);
    let path = resolve_spec(
        spec,
        base,
        &ev.context().lib_dirs,
        ev.compiler().file_extension(),
    )
    .map_err(|r| fm.exception(r))?;

    if fm.is_loading(&path) {
        return Err(fm.exception(Reason::ModuleCycle(spec.to_string())));
    }

    let interrupted = || ev.context().is_interrupted();
    let guard = match ev
        .modules()
        .claim(&path, spec, fm.loading_chain(), interrupted)
        .map_err(|r| fm.exception(r))?
    {
        Claim::Ready(ns) => {
            tracing::trace!(path = %path.display(), "module cache hit");
            return Ok(ns);
        }
        Claim::Load(guard) => guard,
    };

    tracing::debug!(path = %path.display(), "loading module");
    let code = std::fs::read_to_string(&path)
        .map_err(|e| fm.exception(Reason::Io(format!("{}: {}", path.display(), e))))?;
    let source = Source::from_file(path.clone(), code);
    let ns = Namespace::new();
    let op = ev.compile(&source, &ns)?;
    let mut module_fm = fm.module_frame(ns.clone(), source, path)?;
    exec_chunk(op.as_ref(), &mut module_fm)?;

    guard.finish(ns.clone());
    Ok(ns)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_is_path_spec() {
        assert!(is_path_spec("./a"));
        assert!(is_path_spec("../a/b"));
        assert!(is_path_spec("/abs/a"));
        assert!(!is_path_spec("a/b"));
        assert!(!is_path_spec("str"));
    }

    #[test]
    fn test_binding_name() {
        assert_eq!(binding_name("lorem"), "lorem");
        assert_eq!(binding_name("./a/b/c"), "c");
    }

    #[test]
    fn test_resolve_lib_dirs_in_order() {
        let first = tempfile::tempdir().unwrap();
        let second = tempfile::tempdir().unwrap();
        fs::write(second.path().join("m.qb"), "").unwrap();
        let dirs = vec![first.path().to_path_buf(), second.path().to_path_buf()];
        let path = resolve_spec("m", None, &dirs, "qb").unwrap();
        assert_eq!(path, second.path().join("m.qb").canonicalize().unwrap());

        fs::write(first.path().join("m.qb"), "").unwrap();
        let path = resolve_spec("m", None, &dirs, "qb").unwrap();
        assert_eq!(path, first.path().join("m.qb").canonicalize().unwrap());
    }

    #[test]
    fn test_resolve_relative() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("sub")).unwrap();
        fs::write(dir.path().join("sub/x.qb"), "").unwrap();
        let path = resolve_spec("./sub/x", Some(dir.path()), &[], "qb").unwrap();
        assert_eq!(path, dir.path().join("sub/x.qb").canonicalize().unwrap());
        let same = resolve_spec("../sub/x", Some(&dir.path().join("sub")), &[], "qb").unwrap();
        assert_eq!(path, same);
    }

    #[test]
    fn test_claim_then_ready() {
        let cache = ModuleCache::new();
        let path = Path::new("/m.qb");
        let Ok(Claim::Load(guard)) = cache.claim(path, "m", &[], || false) else {
            panic!("expected to load");
        };
        assert!(cache.get(path).is_none());
        let ns = Namespace::new();
        guard.finish(ns.clone());
        assert!(matches!(cache.claim(path, "m", &[], || false), Ok(Claim::Ready(got)) if got.same(&ns)));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_dropped_claim_is_forgotten() {
        let cache = ModuleCache::new();
        let path = Path::new("/m.qb");
        drop(cache.claim(path, "m", &[], || false));
        assert!(cache.is_empty());
        assert!(matches!(cache.claim(path, "m", &[], || false), Ok(Claim::Load(_))));
    }

    #[test]
    fn test_waits_on_follows_blocked_loads() {
        let (a, b, c) = (PathBuf::from("/a"), PathBuf::from("/b"), PathBuf::from("/c"));
        let mut state = LoadState::default();
        // A load inside b is waiting for c; a load inside c is waiting for a.
        state.waiters.insert(0, Waiter { chain: vec![b.clone()], target: c.clone() });
        state.waiters.insert(1, Waiter { chain: vec![c.clone()], target: a.clone() });
        assert!(state.waits_on(&b, &[a.clone()]));
        assert!(!state.waits_on(&b, &[PathBuf::from("/d")]));
        assert!(!state.waits_on(&a, &[b.clone()]));
    }

    #[test]
    fn test_interrupted_wait() {
        let cache = ModuleCache::new();
        let path = Path::new("/m.qb");
        let _guard = cache.claim(path, "m", &[], || false);
        let err = cache.claim(path, "m", &[], || true).err();
        assert!(matches!(err, Some(Reason::Interrupted)));
        assert!(cache.state.lock().waiters.is_empty());
    }

    #[test]
    fn test_resolve_missing() {
        let err = resolve_spec("nope", None, &[], "qb").unwrap_err();
        assert!(matches!(err, Reason::NoSuchModule(ref s) if s == "nope"));
    }
}
