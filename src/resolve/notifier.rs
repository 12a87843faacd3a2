//! `Notifier::instance` and `Notifier::notify`.
//!
//! `notify` asserts with its own name, so functions referencing that text are
//! candidates. An exported caller invokes `Notifier::instance()` and then
//! `notify` on the result; a candidate that appears in the caller's call list
//! right after another call pins both addresses.

use tracing::debug;

use super::{
    required_export, single_survivor, unique_anchor, ResolveError, Unresolved, UnresolvedReason,
};
use crate::analysis::crossval::{intersect, unique_survivor};
use crate::config::ResolverConfig;
use crate::core::module::Module;

pub const SYMBOL: &str = "Notifier::notify";

/// Resolved `Notifier` entry points.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NotifierAddresses {
    /// `Notifier::instance()`
    pub instance: u64,
    /// `Notifier::notify(...)`
    pub notify: u64,
}

pub fn resolve(
    module: &Module,
    config: &ResolverConfig,
) -> Result<NotifierAddresses, ResolveError> {
    let span = crate::span_trace!("notifier", module = module.name());
    let _guard = span.enter();
    let settings = &config.notifier;

    let rodata = module.require_segment(&config.segments.rodata)?;
    let text = module.require_segment(&config.segments.code)?;

    let anchor = unique_anchor(SYMBOL, rodata, &settings.anchor)?;
    let candidates =
        text.potential_entries_referencing(anchor, settings.entry_window, &config.entries)?;
    if candidates.is_empty() {
        return Err(Unresolved::new(SYMBOL, UnresolvedReason::NoCandidates).into());
    }

    let caller = required_export(SYMBOL, module, &settings.caller_export)?;
    let function = module
        .parse_function_at(caller, config.parser.max_instructions)?
        .ok_or_else(|| {
            Unresolved::new(SYMBOL, UnresolvedReason::ParseFailed { address: caller })
        })?;
    let calls = function.call_targets(None);
    let called = intersect(&candidates, &calls);
    debug!(
        candidates = candidates.len(),
        calls = calls.len(),
        called = called.len(),
        "cross-checking entries against caller"
    );

    let pairs = calls.windows(2).filter_map(|pair| {
        called.contains(&pair[1]).then_some(NotifierAddresses {
            instance: pair[0],
            notify: pair[1],
        })
    });
    let found = single_survivor(SYMBOL, unique_survivor(pairs))?;
    for address in [found.instance, found.notify] {
        if !module.contains_address(address) {
            let reason = UnresolvedReason::OutsideModule { address };
            return Err(Unresolved::new(SYMBOL, reason).into());
        }
    }
    debug!(
        instance = format_args!("{:#x}", found.instance),
        notify = format_args!("{:#x}", found.notify),
        "notifier resolved"
    );
    Ok(found)
}
