//! `Player::setMessage`.
//!
//! The faction-unlock message is built as
//! `setMessage(String(gettext_("Unlocked Faction ...")))`: right after the text
//! is pushed come three calls, the first being the exported `gettext_`. The
//! third call is the target.

use tracing::{debug, trace};

use super::{
    required_export, single_survivor, unique_anchor, ResolveError, Unresolved, UnresolvedReason,
};
use crate::analysis::crossval::unique_survivor;
use crate::config::ResolverConfig;
use crate::core::module::Module;

pub const SYMBOL: &str = "Player::setMessage";

pub fn resolve(module: &Module, config: &ResolverConfig) -> Result<u64, ResolveError> {
    let span = crate::span_trace!("player_set_message", module = module.name());
    let _guard = span.enter();
    let settings = &config.player;

    let rodata = module.require_segment(&config.segments.rodata)?;
    let text = module.require_segment(&config.segments.code)?;

    let gettext = required_export(SYMBOL, module, &settings.gettext_export)?;
    let anchor = unique_anchor(SYMBOL, rodata, &settings.anchor)?;
    let references = text.find_address_references(anchor);
    if references.is_empty() {
        return Err(Unresolved::new(SYMBOL, UnresolvedReason::NoCandidates).into());
    }

    let mut survivors = Vec::new();
    for &reference in &references {
        let calls = text.raw_call_targets(reference, settings.call_window);
        if calls.len() < settings.min_calls {
            trace!(
                reference = format_args!("{:#x}", reference),
                calls = calls.len(),
                "too few calls after reference"
            );
            continue;
        }
        if calls[settings.gettext_index] != gettext {
            trace!(reference = format_args!("{:#x}", reference), "first call is not gettext_");
            continue;
        }
        survivors.push(calls[settings.result_index]);
    }
    debug!(
        references = references.len(),
        survivors = survivors.len(),
        "call sequences checked"
    );

    let target = single_survivor(SYMBOL, unique_survivor(survivors))?;
    if !module.contains_address(target) {
        let reason = UnresolvedReason::OutsideModule { address: target };
        return Err(Unresolved::new(SYMBOL, reason).into());
    }
    debug!(address = format_args!("{:#x}", target), "setMessage resolved");
    Ok(target)
}
