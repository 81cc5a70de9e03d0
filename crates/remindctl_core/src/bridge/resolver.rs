//! Symbol resolver and capability prober.
//!
//! # Responsibility
//! - Load the owning library once, lazily, through a `SymbolBackend`.
//! - Resolve (entity, method) pairs and cache present/absent answers.
//!
//! # Invariants
//! - The library load is attempted at most once per resolver.
//! - Each symbol is resolved at most once; cache entries are never removed
//!   or replaced.
//! - Probing never escalates a missing symbol into an error; callers decide.

use crate::bridge::invoker::Completion;
use crate::bridge::symbol::{Capability, SymbolName};
use crate::bridge::value::Value;
use log::{debug, info, warn};
use once_cell::sync::OnceCell;
use std::collections::HashMap;
use std::fmt::{Debug, Formatter};
use std::path::PathBuf;
use std::sync::{Arc, PoisonError, RwLock};

/// Failure reported by native code, carrying the library's own description.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NativeFailure {
    pub message: String,
}

impl NativeFailure {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

pub type NativeResult = Result<Value, NativeFailure>;

/// Entry returning its result directly.
pub type DirectFn = Arc<dyn Fn(&[Value]) -> NativeResult + Send + Sync>;

/// Entry delivering its result through a one-shot completion.
pub type CallbackFn = Arc<dyn Fn(&[Value], Completion) + Send + Sync>;

/// A resolved, callable native entry.
#[derive(Clone)]
pub enum NativeEntry {
    Direct(DirectFn),
    Callback(CallbackFn),
}

impl Debug for NativeEntry {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Direct(_) => write!(f, "NativeEntry::Direct"),
            Self::Callback(_) => write!(f, "NativeEntry::Callback"),
        }
    }
}

/// Identity of a loaded library.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LibraryInfo {
    /// Path (or logical name) the library was loaded from.
    pub origin: PathBuf,
}

/// Source of native symbols.
///
/// Production uses the shared-library backend; tests register in-process
/// closures.
pub trait SymbolBackend: Send + Sync {
    /// Loads the owning library. Called at most once per resolver.
    fn load_library(&self) -> Result<LibraryInfo, String>;
    /// Resolves one symbol after a successful load.
    fn resolve(&self, symbol: &SymbolName) -> Result<NativeEntry, String>;
}

#[derive(Clone)]
enum Resolution {
    Present(NativeEntry),
    Absent(String),
}

/// Process-scoped, append-only symbol cache over one backend.
pub struct SymbolResolver {
    surface: &'static str,
    backend: Box<dyn SymbolBackend>,
    library: OnceCell<Result<LibraryInfo, String>>,
    cache: RwLock<HashMap<SymbolName, Resolution>>,
}

impl SymbolResolver {
    pub fn new(surface: &'static str, backend: impl SymbolBackend + 'static) -> Self {
        Self {
            surface,
            backend: Box::new(backend),
            library: OnceCell::new(),
            cache: RwLock::new(HashMap::new()),
        }
    }

    /// Surface label used in logs (`private` / `public`).
    pub fn surface(&self) -> &'static str {
        self.surface
    }

    /// Returns the cached capability for `symbol`, resolving it on first use.
    pub fn probe(&self, symbol: &SymbolName) -> Capability {
        match self.resolution(symbol) {
            Resolution::Present(_) => Capability::available(symbol.clone()),
            Resolution::Absent(reason) => Capability::unavailable(symbol.clone(), reason),
        }
    }

    /// Probes every symbol and returns the unavailable ones, in input order.
    pub fn missing<'a>(&self, symbols: impl IntoIterator<Item = &'a SymbolName>) -> Vec<Capability> {
        symbols
            .into_iter()
            .map(|symbol| self.probe(symbol))
            .filter(|capability| !capability.available)
            .collect()
    }

    /// Returns the callable entry, or the unavailable capability.
    pub(crate) fn entry(&self, symbol: &SymbolName) -> Result<NativeEntry, Capability> {
        match self.resolution(symbol) {
            Resolution::Present(entry) => Ok(entry),
            Resolution::Absent(reason) => Err(Capability::unavailable(symbol.clone(), reason)),
        }
    }

    /// Loaded library identity, if the load has been attempted and succeeded.
    pub fn library(&self) -> Option<&LibraryInfo> {
        self.library.get().and_then(|result| result.as_ref().ok())
    }

    /// Number of cached symbol answers.
    pub fn cached_len(&self) -> usize {
        self.cache
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    fn resolution(&self, symbol: &SymbolName) -> Resolution {
        if let Some(found) = self
            .cache
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(symbol)
        {
            return found.clone();
        }

        // Write lock held across resolution so a symbol is resolved once even
        // when two call sites race on the first probe.
        let mut cache = self.cache.write().unwrap_or_else(PoisonError::into_inner);
        if let Some(found) = cache.get(symbol) {
            return found.clone();
        }

        let resolution = self.resolve_uncached(symbol);
        cache.insert(symbol.clone(), resolution.clone());
        resolution
    }

    fn resolve_uncached(&self, symbol: &SymbolName) -> Resolution {
        if !symbol.is_well_formed() {
            warn!(
                "event=symbol_probe module=bridge status=error surface={} symbol={} error_code=invalid_symbol_name",
                self.surface, symbol
            );
            return Resolution::Absent(format!("invalid symbol name `{symbol}`"));
        }

        let library = self.library.get_or_init(|| {
            let loaded = self.backend.load_library();
            match &loaded {
                Ok(info) => info!(
                    "event=library_load module=bridge status=ok surface={} origin={}",
                    self.surface,
                    info.origin.display()
                ),
                Err(reason) => warn!(
                    "event=library_load module=bridge status=error surface={} error={}",
                    self.surface, reason
                ),
            }
            loaded
        });
        if let Err(reason) = library {
            return Resolution::Absent(format!("library unavailable: {reason}"));
        }

        match self.backend.resolve(symbol) {
            Ok(entry) => {
                debug!(
                    "event=symbol_probe module=bridge status=ok surface={} symbol={}",
                    self.surface, symbol
                );
                Resolution::Present(entry)
            }
            Err(reason) => {
                warn!(
                    "event=symbol_probe module=bridge status=unavailable surface={} symbol={} reason={}",
                    self.surface, symbol, reason
                );
                Resolution::Absent(reason)
            }
        }
    }
}
