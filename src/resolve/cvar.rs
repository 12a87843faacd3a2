//! `CVarBase::index` accessor.
//!
//! The `CVarBase` constructor references its own name. Candidate entries
//! around each reference are parsed and only a function whose body actually
//! covers the reference is kept. The accessor is the constructor's second
//! direct call on the build this targets.

use tracing::debug;

use super::{single_survivor, unique_anchor, ResolveError, Unresolved, UnresolvedReason};
use crate::analysis::crossval::unique_survivor;
use crate::config::ResolverConfig;
use crate::core::function::ParsedFunction;
use crate::core::module::Module;

pub const SYMBOL: &str = "CVarBase::index";

pub fn resolve(module: &Module, config: &ResolverConfig) -> Result<u64, ResolveError> {
    let span = crate::span_trace!("cvar_index", module = module.name());
    let _guard = span.enter();
    let settings = &config.cvar;

    let rodata = module.require_segment(&config.segments.rodata)?;
    let text = module.require_segment(&config.segments.code)?;

    let anchor = unique_anchor(SYMBOL, rodata, &settings.anchor)?;
    let references = text.find_address_references(anchor);
    let candidates =
        text.potential_entries_referencing(anchor, settings.entry_window, &config.entries)?;
    if candidates.is_empty() {
        return Err(Unresolved::new(SYMBOL, UnresolvedReason::NoCandidates).into());
    }

    let mut constructors: Vec<ParsedFunction> = Vec::new();
    for &entry in &candidates {
        // The segment base is a candidate but not an interior address.
        if !text.contains_address(entry) {
            continue;
        }
        let Some(function) = module.parse_function_at(entry, config.parser.max_instructions)?
        else {
            continue;
        };
        if references.iter().any(|&r| function.contains_address(r)) {
            constructors.push(function);
        }
    }
    debug!(
        candidates = candidates.len(),
        constructors = constructors.len(),
        "parsed candidate constructors"
    );

    let entries = constructors.iter().map(|f| f.entry());
    let entry = single_survivor(SYMBOL, unique_survivor(entries))?;
    let constructor = constructors
        .iter()
        .find(|f| f.entry() == entry)
        .ok_or_else(|| Unresolved::new(SYMBOL, UnresolvedReason::NoSurvivor))?;

    let calls = constructor.call_targets(None);
    let accessor = calls
        .get(settings.accessor_call_index)
        .copied()
        .ok_or_else(|| {
            Unresolved::new(
                SYMBOL,
                UnresolvedReason::TooFewCalls {
                    found: calls.len(),
                    expected: settings.accessor_call_index + 1,
                },
            )
        })?;
    if !module.contains_address(accessor) {
        let reason = UnresolvedReason::OutsideModule { address: accessor };
        return Err(Unresolved::new(SYMBOL, reason).into());
    }
    debug!(
        constructor = format_args!("{:#x}", entry),
        accessor = format_args!("{:#x}", accessor),
        "cvar index accessor resolved"
    );
    Ok(accessor)
}
