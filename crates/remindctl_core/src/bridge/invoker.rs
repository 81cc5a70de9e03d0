//! Typed invoker over resolved native entries.
//!
//! # Responsibility
//! - Validate every call against the declared signature table.
//! - Bridge callback-style entries to a blocking call.
//!
//! # Invariants
//! - Undeclared symbols, wrong arity and wrong argument shapes fail closed
//!   with `ShapeMismatch` before the native entry runs.
//! - Results are checked against the declared result shape; a mismatch is
//!   reported, never cast.
//! - A bridged callback releases its waiting caller exactly once.

use crate::bridge::resolver::{NativeEntry, NativeFailure, NativeResult, SymbolResolver};
use crate::bridge::signature::{Dispatch, Signature, SignatureTable};
use crate::bridge::symbol::SymbolName;
use crate::bridge::value::{describe, Value, ValueShape};
use crate::bridge::BridgeError;
use log::{debug, error};
use std::sync::mpsc::{sync_channel, SyncSender};

/// One-shot completion handed to callback-style entries.
///
/// Consuming `complete` is the only way to deliver a result, so a caller is
/// released at most once; dropping the completion releases it with an error.
pub struct Completion {
    sender: SyncSender<NativeResult>,
}

impl Completion {
    fn pair() -> (Self, std::sync::mpsc::Receiver<NativeResult>) {
        let (sender, receiver) = sync_channel(1);
        (Self { sender }, receiver)
    }

    /// Delivers the result and releases the blocked caller.
    pub fn complete(self, result: NativeResult) {
        // Receiver gone means the caller already gave up; nothing to release.
        let _ = self.sender.send(result);
    }
}

/// Validating invoker for one native surface.
#[derive(Clone, Copy)]
pub struct TypedInvoker<'a> {
    resolver: &'a SymbolResolver,
    signatures: &'a SignatureTable,
}

impl<'a> TypedInvoker<'a> {
    pub fn new(resolver: &'a SymbolResolver, signatures: &'a SignatureTable) -> Self {
        Self {
            resolver,
            signatures,
        }
    }

    pub fn resolver(&self) -> &'a SymbolResolver {
        self.resolver
    }

    pub fn signatures(&self) -> &'a SignatureTable {
        self.signatures
    }

    /// Validates a planned call without performing it.
    pub fn check(
        &self,
        symbol: &SymbolName,
        args: &[Value],
        expected: ValueShape,
    ) -> Result<&'a Signature, BridgeError> {
        let signature = self.declared(symbol, expected)?;
        check_args(symbol, signature, args)?;
        Ok(signature)
    }

    /// Invokes `symbol` with `args`, expecting a result of shape `expected`.
    ///
    /// The symbol's capability must already be confirmed by the caller.
    /// Invoking an unavailable symbol is a caller bug and fails closed with
    /// `CapabilityUnavailable`.
    pub fn invoke(
        &self,
        symbol: &SymbolName,
        args: &[Value],
        expected: ValueShape,
    ) -> Result<Value, BridgeError> {
        let signature = self.check(symbol, args, expected)?;

        let entry = match self.resolver.entry(symbol) {
            Ok(entry) => entry,
            Err(capability) => {
                error!(
                    "event=invoke module=bridge status=error surface={} symbol={} error_code=unprobed_symbol",
                    self.resolver.surface(),
                    symbol
                );
                return Err(BridgeError::CapabilityUnavailable {
                    symbol: symbol.to_string(),
                    reason: capability.reason_text().to_string(),
                });
            }
        };

        let outcome = match (signature.dispatch, entry) {
            (Dispatch::Direct, NativeEntry::Direct(call)) => call(args),
            (Dispatch::Callback, NativeEntry::Callback(call)) => {
                let (completion, receiver) = Completion::pair();
                call(args, completion);
                receiver.recv().unwrap_or_else(|_| {
                    Err(NativeFailure::new(
                        "completion dropped without delivering a result",
                    ))
                })
            }
            (declared, _) => {
                return Err(BridgeError::ShapeMismatch {
                    symbol: symbol.to_string(),
                    detail: format!("declared {declared:?} dispatch differs from resolved entry"),
                });
            }
        };

        let value = outcome.map_err(|failure| {
            debug!(
                "event=invoke module=bridge status=error surface={} symbol={}",
                self.resolver.surface(),
                symbol
            );
            BridgeError::InvocationFailed {
                symbol: symbol.to_string(),
                message: failure.message,
            }
        })?;

        if !signature.result.accepts(&value) {
            return Err(BridgeError::ShapeMismatch {
                symbol: symbol.to_string(),
                detail: format!(
                    "declared result {} but native returned {}",
                    signature.result,
                    describe(&value)
                ),
            });
        }

        debug!(
            "event=invoke module=bridge status=ok surface={} symbol={}",
            self.resolver.surface(),
            symbol
        );
        Ok(value)
    }

    fn declared(
        &self,
        symbol: &SymbolName,
        expected: ValueShape,
    ) -> Result<&'a Signature, BridgeError> {
        let signature = self
            .signatures
            .get(symbol)
            .ok_or_else(|| BridgeError::ShapeMismatch {
                symbol: symbol.to_string(),
                detail: format!(
                    "symbol is not declared in the {} signature table",
                    self.signatures.surface()
                ),
            })?;
        if signature.result != expected {
            return Err(BridgeError::ShapeMismatch {
                symbol: symbol.to_string(),
                detail: format!(
                    "caller expects {expected} but {} is declared",
                    signature.result
                ),
            });
        }
        Ok(signature)
    }
}

fn check_args(symbol: &SymbolName, signature: &Signature, args: &[Value]) -> Result<(), BridgeError> {
    if args.len() != signature.params.len() {
        return Err(BridgeError::ShapeMismatch {
            symbol: symbol.to_string(),
            detail: format!(
                "declared arity {} but called with {} arguments",
                signature.params.len(),
                args.len()
            ),
        });
    }
    for (index, (shape, arg)) in signature.params.iter().zip(args).enumerate() {
        if !shape.accepts(arg) {
            return Err(BridgeError::ShapeMismatch {
                symbol: symbol.to_string(),
                detail: format!("argument {index} declared {shape} but got {}", describe(arg)),
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::{Completion, TypedInvoker};
    use crate::bridge::resolver::{
        LibraryInfo, NativeEntry, NativeFailure, SymbolBackend, SymbolResolver,
    };
    use crate::bridge::signature::{ek, public_signatures, symbol};
    use crate::bridge::symbol::SymbolName;
    use crate::bridge::value::{Handle, Value, ValueShape, MAYBE_TEXT};
    use crate::bridge::BridgeError;
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::thread;

    struct ScriptBackend {
        calls: Arc<AtomicUsize>,
    }

    impl SymbolBackend for ScriptBackend {
        fn load_library(&self) -> Result<LibraryInfo, String> {
            Ok(LibraryInfo {
                origin: PathBuf::from("script"),
            })
        }

        fn resolve(&self, name: &SymbolName) -> Result<NativeEntry, String> {
            let calls = Arc::clone(&self.calls);
            if *name == symbol(ek::TITLE) {
                return Ok(NativeEntry::Direct(Arc::new(move |_: &[Value]| {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok(Value::Text("Milk".to_string()))
                })));
            }
            if *name == symbol(ek::IS_COMPLETED) {
                return Ok(NativeEntry::Direct(Arc::new(move |_: &[Value]| {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok(Value::Int(1))
                })));
            }
            if *name == symbol(ek::COMMIT) {
                return Ok(NativeEntry::Direct(Arc::new(move |_: &[Value]| {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Err(NativeFailure::new("store is read-only"))
                })));
            }
            if *name == symbol(ek::FETCH_MATCHING) {
                return Ok(NativeEntry::Callback(Arc::new(move |_: &[Value], completion: Completion| {
                    calls.fetch_add(1, Ordering::SeqCst);
                    thread::spawn(move || {
                        completion.complete(Ok(Value::HandleList(vec![Handle::from_raw(3)])));
                    });
                })));
            }
            Err("not exported".to_string())
        }
    }

    fn fixture() -> (SymbolResolver, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let resolver = SymbolResolver::new(
            "public",
            ScriptBackend {
                calls: Arc::clone(&calls),
            },
        );
        (resolver, calls)
    }

    #[test]
    fn invokes_declared_symbol_with_matching_shapes() {
        let (resolver, calls) = fixture();
        let invoker = TypedInvoker::new(&resolver, public_signatures());
        let value = invoker
            .invoke(&symbol(ek::TITLE), &[Value::Handle(Handle::from_raw(1))], MAYBE_TEXT)
            .expect("title call");
        assert_eq!(value, Value::Text("Milk".to_string()));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn wrong_arity_fails_closed_before_native_call() {
        let (resolver, calls) = fixture();
        let invoker = TypedInvoker::new(&resolver, public_signatures());
        let err = invoker
            .invoke(&symbol(ek::TITLE), &[], MAYBE_TEXT)
            .expect_err("arity mismatch");
        assert!(matches!(err, BridgeError::ShapeMismatch { .. }));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn undeclared_symbol_and_wrong_expected_result_fail_closed() {
        let (resolver, calls) = fixture();
        let invoker = TypedInvoker::new(&resolver, public_signatures());
        let undeclared = SymbolName::new("EKReminder", "secretTitle").unwrap();
        let err = invoker
            .invoke(&undeclared, &[Value::Handle(Handle::from_raw(1))], ValueShape::Text)
            .expect_err("undeclared");
        assert!(matches!(err, BridgeError::ShapeMismatch { .. }));

        let err = invoker
            .invoke(&symbol(ek::TITLE), &[Value::Handle(Handle::from_raw(1))], ValueShape::Int)
            .expect_err("wrong expected result");
        assert!(matches!(err, BridgeError::ShapeMismatch { .. }));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn wrong_result_shape_from_native_is_reported() {
        let (resolver, _) = fixture();
        let invoker = TypedInvoker::new(&resolver, public_signatures());
        let err = invoker
            .invoke(
                &symbol(ek::IS_COMPLETED),
                &[Value::Handle(Handle::from_raw(1))],
                ValueShape::Bool,
            )
            .expect_err("int is not bool");
        assert!(matches!(err, BridgeError::ShapeMismatch { .. }));
    }

    #[test]
    fn native_failure_carries_library_message() {
        let (resolver, _) = fixture();
        let invoker = TypedInvoker::new(&resolver, public_signatures());
        let err = invoker
            .invoke(&symbol(ek::COMMIT), &[Value::Handle(Handle::from_raw(1))], ValueShape::Void)
            .expect_err("commit fails");
        assert_eq!(
            err,
            BridgeError::InvocationFailed {
                symbol: "EKEventStore.commit".to_string(),
                message: "store is read-only".to_string(),
            }
        );
    }

    #[test]
    fn callback_entry_blocks_until_completion_fires() {
        let (resolver, _) = fixture();
        let invoker = TypedInvoker::new(&resolver, public_signatures());
        let value = invoker
            .invoke(
                &symbol(ek::FETCH_MATCHING),
                &[
                    Value::Handle(Handle::from_raw(1)),
                    Value::Handle(Handle::from_raw(2)),
                ],
                ValueShape::HandleList,
            )
            .expect("fetch via callback");
        assert_eq!(value, Value::HandleList(vec![Handle::from_raw(3)]));
    }

    #[test]
    fn unresolved_symbol_is_never_called() {
        let (resolver, calls) = fixture();
        let invoker = TypedInvoker::new(&resolver, public_signatures());
        let err = invoker
            .invoke(&symbol(ek::NOTES), &[Value::Handle(Handle::from_raw(1))], MAYBE_TEXT)
            .expect_err("notes not exported");
        assert!(matches!(err, BridgeError::CapabilityUnavailable { .. }));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }
}
