//! Fatal-error termination.
//!
//! Library operations return [`FatalError`] values; the process-wide accessors
//! in [`crate::host`] hand them to [`abort`], which logs and invokes the
//! installed handler. The default handler prints the error and exits with
//! status 1. Embedders and tests may install their own handler, e.g. one that
//! panics so the failure can be observed.

use std::sync::RwLock;

use crate::error::FatalError;

/// Termination hook. It must not return.
pub type FatalHandler = fn(&FatalError) -> !;

static HANDLER: RwLock<FatalHandler> = RwLock::new(exit_handler as FatalHandler);

/// Default handler: report on stderr and exit the process.
pub fn exit_handler(err: &FatalError) -> ! {
    match err.module() {
        Some(module) => eprintln!("Fatal error in {}: {}", module, err),
        None => eprintln!("Fatal error: {}", err),
    }
    std::process::exit(1)
}

/// Handler that panics with the error message.
pub fn panic_handler(err: &FatalError) -> ! {
    panic!("fatal: {}", err)
}

/// Install a new handler, returning the previous one.
pub fn set_fatal_handler(handler: FatalHandler) -> FatalHandler {
    let mut guard = HANDLER
        .write()
        .unwrap_or_else(|poisoned| poisoned.into_inner());
    std::mem::replace(&mut *guard, handler)
}

/// Report a fatal error and terminate through the installed handler.
pub fn abort(err: FatalError) -> ! {
    let err = crate::log_error!(err, "fatal analysis error");
    let handler = *HANDLER
        .read()
        .unwrap_or_else(|poisoned| poisoned.into_inner());
    handler(&err)
}

/// Unwrap a structural result, aborting on error.
pub fn or_abort<T>(result: Result<T, FatalError>) -> T {
    match result {
        Ok(value) => value,
        Err(err) => abort(err),
    }
}
