//! Shared-library backend and the process-wide library handles.
//!
//! # Responsibility
//! - Load a bridge library from an ordered list of candidate paths.
//! - Resolve `<Entity>__<method>` exports and adapt them to `NativeEntry`.
//! - Marshal `Value`s to and from the uniform C calling convention.
//!
//! # Invariants
//! - The first candidate that loads wins; the library is never unloaded.
//! - Strings and arrays returned by the library are copied, then handed
//!   back through `bridge_release`.
//! - Asynchronous exports receive a callback that completes exactly once.

use crate::bridge::invoker::Completion;
use crate::bridge::resolver::{
    LibraryInfo, NativeEntry, NativeFailure, NativeResult, SymbolBackend, SymbolResolver,
};
use crate::bridge::symbol::SymbolName;
use crate::bridge::value::{Handle, Value};
use libloading::Library;
use log::info;
use once_cell::sync::OnceCell;
use std::ffi::{c_char, c_void, CStr, CString};
use std::path::PathBuf;
use std::ptr;
use std::sync::Arc;

const TAG_NIL: u32 = 0;
const TAG_VOID: u32 = 1;
const TAG_BOOL: u32 = 2;
const TAG_INT: u32 = 3;
const TAG_FLOAT: u32 = 4;
const TAG_TEXT: u32 = 5;
const TAG_HANDLE: u32 = 6;
const TAG_HANDLE_LIST: u32 = 7;

const RELEASE_EXPORT: &[u8] = b"bridge_release";
const ASYNC_SUFFIX: &str = "__async";

/// Tagged value in the uniform calling convention.
#[repr(C)]
pub struct RawValue {
    pub tag: u32,
    pub int_value: i64,
    pub float_value: f64,
    pub text: *const c_char,
    pub handle: *mut c_void,
    pub items: *const *mut c_void,
    pub len: usize,
}

impl RawValue {
    fn empty() -> Self {
        Self {
            tag: TAG_NIL,
            int_value: 0,
            float_value: 0.0,
            text: ptr::null(),
            handle: ptr::null_mut(),
            items: ptr::null(),
            len: 0,
        }
    }
}

/// Synchronous export: returns 0 on success and fills `out`, otherwise
/// fills `error` with a library-owned message.
type RawEntry = unsafe extern "C" fn(
    args: *const RawValue,
    argc: usize,
    out: *mut RawValue,
    error: *mut *mut c_char,
) -> i32;

/// Callback receiving the result of an asynchronous export.
type RawCallback =
    unsafe extern "C" fn(context: *mut c_void, result: *const RawValue, error: *const c_char);

/// Asynchronous export: must call `callback(context, ..)` exactly once.
type RawAsyncEntry = unsafe extern "C" fn(
    args: *const RawValue,
    argc: usize,
    callback: RawCallback,
    context: *mut c_void,
);

/// Frees strings and arrays previously returned by the library.
type RawRelease = unsafe extern "C" fn(value: *mut RawValue, error: *mut c_char);

struct LoadedLibrary {
    library: Library,
    origin: PathBuf,
    release: Option<RawRelease>,
}

/// Backend resolving symbols from a shared library on disk.
pub struct DylibBackend {
    candidates: Vec<PathBuf>,
    loaded: OnceCell<LoadedLibrary>,
}

impl DylibBackend {
    pub fn new(candidates: Vec<PathBuf>) -> Self {
        Self {
            candidates,
            loaded: OnceCell::new(),
        }
    }

    pub fn candidates(&self) -> &[PathBuf] {
        &self.candidates
    }

    fn open_first_candidate(&self) -> Result<LoadedLibrary, String> {
        if self.candidates.is_empty() {
            return Err("no candidate library paths configured".to_string());
        }
        let mut failures = Vec::new();
        for candidate in &self.candidates {
            if !candidate.exists() {
                failures.push(format!("{}: not found", candidate.display()));
                continue;
            }
            // SAFETY: bridge libraries run no initializers with preconditions
            // beyond being loaded once; the handle is kept for the process
            // lifetime so resolved entries never dangle.
            match unsafe { Library::new(candidate) } {
                Ok(library) => {
                    // SAFETY: `bridge_release` is declared with `RawRelease`.
                    let release = unsafe { library.get::<RawRelease>(RELEASE_EXPORT) }
                        .ok()
                        .map(|symbol| *symbol);
                    return Ok(LoadedLibrary {
                        library,
                        origin: candidate.clone(),
                        release,
                    });
                }
                Err(err) => failures.push(format!("{}: {err}", candidate.display())),
            }
        }
        Err(failures.join("; "))
    }
}

impl SymbolBackend for DylibBackend {
    fn load_library(&self) -> Result<LibraryInfo, String> {
        let loaded = self.loaded.get_or_try_init(|| self.open_first_candidate())?;
        Ok(LibraryInfo {
            origin: loaded.origin.clone(),
        })
    }

    fn resolve(&self, symbol: &SymbolName) -> Result<NativeEntry, String> {
        let loaded = self
            .loaded
            .get()
            .ok_or_else(|| "library not loaded".to_string())?;
        let release = loaded.release;
        let export = symbol.export_name();

        // SAFETY: every export follows the uniform convention documented on
        // `RawEntry`/`RawAsyncEntry`; shapes are checked by the invoker.
        if let Ok(found) = unsafe { loaded.library.get::<RawEntry>(export.as_bytes()) } {
            let entry: RawEntry = *found;
            return Ok(NativeEntry::Direct(Arc::new(move |args: &[Value]| {
                call_direct(entry, release, args)
            })));
        }

        let async_export = format!("{export}{ASYNC_SUFFIX}");
        // SAFETY: as above, for the asynchronous convention.
        match unsafe { loaded.library.get::<RawAsyncEntry>(async_export.as_bytes()) } {
            Ok(found) => {
                let entry: RawAsyncEntry = *found;
                Ok(NativeEntry::Callback(Arc::new(
                    move |args: &[Value], completion: Completion| {
                        call_async(entry, release, args, completion)
                    },
                )))
            }
            Err(err) => Err(format!("export `{export}` not found: {err}")),
        }
    }
}

/// Owned storage backing a borrowed `RawValue` argument array.
struct RawArgs {
    values: Vec<RawValue>,
    _texts: Vec<CString>,
    _lists: Vec<Vec<*mut c_void>>,
}

impl RawArgs {
    fn marshal(args: &[Value]) -> Result<Self, NativeFailure> {
        let mut values = Vec::with_capacity(args.len());
        let mut texts = Vec::new();
        let mut lists = Vec::new();
        for arg in args {
            let mut raw = RawValue::empty();
            match arg {
                Value::Nil => raw.tag = TAG_NIL,
                Value::Void => raw.tag = TAG_VOID,
                Value::Bool(value) => {
                    raw.tag = TAG_BOOL;
                    raw.int_value = i64::from(*value);
                }
                Value::Int(value) => {
                    raw.tag = TAG_INT;
                    raw.int_value = *value;
                }
                Value::Float(value) => {
                    raw.tag = TAG_FLOAT;
                    raw.float_value = *value;
                }
                Value::Text(value) => {
                    let text = CString::new(value.as_str())
                        .map_err(|_| NativeFailure::new("text argument contains NUL byte"))?;
                    raw.tag = TAG_TEXT;
                    raw.text = text.as_ptr();
                    texts.push(text);
                }
                Value::Handle(handle) => {
                    raw.tag = TAG_HANDLE;
                    raw.handle = handle.raw() as usize as *mut c_void;
                }
                Value::HandleList(handles) => {
                    let items: Vec<*mut c_void> = handles
                        .iter()
                        .map(|handle| handle.raw() as usize as *mut c_void)
                        .collect();
                    raw.tag = TAG_HANDLE_LIST;
                    raw.items = items.as_ptr();
                    raw.len = items.len();
                    lists.push(items);
                }
            }
            values.push(raw);
        }
        Ok(Self {
            values,
            _texts: texts,
            _lists: lists,
        })
    }
}

fn call_direct(entry: RawEntry, release: Option<RawRelease>, args: &[Value]) -> NativeResult {
    let raw_args = RawArgs::marshal(args)?;
    let mut out = RawValue::empty();
    let mut error: *mut c_char = ptr::null_mut();
    // SAFETY: argument storage outlives the call; `out`/`error` are valid
    // writable locations.
    let status = unsafe {
        entry(
            raw_args.values.as_ptr(),
            raw_args.values.len(),
            &mut out,
            &mut error,
        )
    };
    // SAFETY: `out` and `error` were filled by the library per convention.
    let result = unsafe {
        if status == 0 {
            decode(&out)
        } else {
            Err(NativeFailure::new(decode_error(error, status)))
        }
    };
    if let Some(release) = release {
        // SAFETY: values are released exactly once, after being copied.
        unsafe { release(&mut out, error) };
    }
    result
}

fn call_async(
    entry: RawAsyncEntry,
    release: Option<RawRelease>,
    args: &[Value],
    completion: Completion,
) {
    let raw_args = match RawArgs::marshal(args) {
        Ok(raw_args) => raw_args,
        Err(failure) => {
            completion.complete(Err(failure));
            return;
        }
    };
    let context = Box::into_raw(Box::new(CallbackContext {
        completion,
        release,
    }));
    // SAFETY: the library calls `on_complete` exactly once with `context`,
    // which reclaims the box.
    unsafe {
        entry(
            raw_args.values.as_ptr(),
            raw_args.values.len(),
            on_complete,
            context.cast(),
        )
    };
}

struct CallbackContext {
    completion: Completion,
    release: Option<RawRelease>,
}

unsafe extern "C" fn on_complete(context: *mut c_void, result: *const RawValue, error: *const c_char) {
    if context.is_null() {
        return;
    }
    let context = Box::from_raw(context.cast::<CallbackContext>());
    let outcome = if !error.is_null() {
        Err(NativeFailure::new(decode_error(error.cast_mut(), -1)))
    } else if result.is_null() {
        Ok(Value::Void)
    } else {
        decode(&*result)
    };
    if let Some(release) = context.release {
        if !result.is_null() {
            release(result.cast_mut(), error.cast_mut());
        }
    }
    context.completion.complete(outcome);
}

unsafe fn decode(raw: &RawValue) -> NativeResult {
    let value = match raw.tag {
        TAG_NIL => Value::Nil,
        TAG_VOID => Value::Void,
        TAG_BOOL => Value::Bool(raw.int_value != 0),
        TAG_INT => Value::Int(raw.int_value),
        TAG_FLOAT => Value::Float(raw.float_value),
        TAG_TEXT => {
            if raw.text.is_null() {
                Value::Nil
            } else {
                Value::Text(CStr::from_ptr(raw.text).to_string_lossy().into_owned())
            }
        }
        TAG_HANDLE => {
            if raw.handle.is_null() {
                Value::Nil
            } else {
                Value::Handle(Handle::from_raw(raw.handle as usize as u64))
            }
        }
        TAG_HANDLE_LIST => {
            let mut handles = Vec::with_capacity(raw.len);
            if !raw.items.is_null() {
                for index in 0..raw.len {
                    let item = *raw.items.add(index);
                    handles.push(Handle::from_raw(item as usize as u64));
                }
            }
            Value::HandleList(handles)
        }
        other => {
            return Err(NativeFailure::new(format!(
                "native returned unknown value tag {other}"
            )))
        }
    };
    Ok(value)
}

unsafe fn decode_error(error: *mut c_char, status: i32) -> String {
    if error.is_null() {
        format!("native call failed with status {status}")
    } else {
        CStr::from_ptr(error).to_string_lossy().into_owned()
    }
}

static PRIVATE_RESOLVER: OnceCell<SymbolResolver> = OnceCell::new();
static PUBLIC_RESOLVER: OnceCell<SymbolResolver> = OnceCell::new();

/// Process-wide resolver for the undocumented surface.
///
/// The first call fixes the candidate paths; later calls return the same
/// resolver regardless of their arguments.
pub fn private_resolver(candidates: &[PathBuf]) -> &'static SymbolResolver {
    PRIVATE_RESOLVER.get_or_init(|| {
        info!(
            "event=resolver_init module=bridge status=ok surface=private candidates={}",
            candidates.len()
        );
        SymbolResolver::new("private", DylibBackend::new(candidates.to_vec()))
    })
}

/// Process-wide resolver for the stable surface.
pub fn public_resolver(candidates: &[PathBuf]) -> &'static SymbolResolver {
    PUBLIC_RESOLVER.get_or_init(|| {
        info!(
            "event=resolver_init module=bridge status=ok surface=public candidates={}",
            candidates.len()
        );
        SymbolResolver::new("public", DylibBackend::new(candidates.to_vec()))
    })
}

#[cfg(test)]
mod tests {
    use super::{decode, DylibBackend, RawArgs, RawValue, TAG_HANDLE_LIST, TAG_TEXT};
    use crate::bridge::resolver::SymbolBackend;
    use crate::bridge::value::{Handle, Value};
    use std::ffi::CString;
    use std::path::PathBuf;

    #[test]
    fn missing_candidates_report_every_path() {
        let backend = DylibBackend::new(vec![
            PathBuf::from("/nonexistent/one.dylib"),
            PathBuf::from("/nonexistent/two.dylib"),
        ]);
        let err = backend.load_library().expect_err("no library present");
        assert!(err.contains("one.dylib"));
        assert!(err.contains("two.dylib"));
    }

    #[test]
    fn empty_candidate_list_is_rejected() {
        let backend = DylibBackend::new(Vec::new());
        assert!(backend.load_library().is_err());
    }

    #[test]
    fn marshals_text_and_handle_lists() {
        let args = RawArgs::marshal(&[
            Value::Text("Groceries".to_string()),
            Value::HandleList(vec![Handle::from_raw(4), Handle::from_raw(9)]),
        ])
        .expect("marshal");
        assert_eq!(args.values[0].tag, TAG_TEXT);
        assert_eq!(args.values[1].tag, TAG_HANDLE_LIST);
        assert_eq!(args.values[1].len, 2);
    }

    #[test]
    fn rejects_text_with_interior_nul() {
        assert!(RawArgs::marshal(&[Value::Text("a\0b".to_string())]).is_err());
    }

    #[test]
    fn decodes_text_results() {
        let text = CString::new("ABC").unwrap();
        let mut raw = RawValue::empty();
        raw.tag = TAG_TEXT;
        raw.text = text.as_ptr();
        let value = unsafe { decode(&raw) }.expect("decode");
        assert_eq!(value, Value::Text("ABC".to_string()));
    }
}
