//! The host's globals structure.
//!
//! An exported block function tests `globals.player` against zero early on.
//! The only `cmp dword ptr [abs32], 0` in the scanned window gives the
//! player field; the structure starts `player_field_offset` bytes before it.

use tracing::debug;

use super::{required_export, ResolveError, Unresolved, UnresolvedReason};
use crate::config::ResolverConfig;
use crate::core::module::Module;
use crate::error::FatalError;

pub const SYMBOL: &str = "globals";

pub fn resolve(module: &Module, config: &ResolverConfig) -> Result<u64, ResolveError> {
    let span = crate::span_trace!("globals", module = module.name());
    let _guard = span.enter();
    let settings = &config.globals;

    let export = required_export(SYMBOL, module, &settings.export)?;
    let segment = module
        .segment_for_address(export)
        .ok_or_else(|| FatalError::AddressOutOfBounds {
            scope: format!("module {}", module.name()),
            address: export,
        })?;

    let player = segment
        .find_only_cmp_mem_zero(export, settings.scan_window)
        .ok_or_else(|| {
            Unresolved::new(
                SYMBOL,
                UnresolvedReason::PatternNotUnique("cmp dword ptr [mem], 0"),
            )
        })?;
    if !module.contains_address(player) {
        let reason = UnresolvedReason::OutsideModule { address: player };
        return Err(Unresolved::new(SYMBOL, reason).into());
    }

    let globals = player
        .checked_sub(settings.player_field_offset)
        .ok_or_else(|| {
            Unresolved::new(SYMBOL, UnresolvedReason::OutsideModule { address: player })
        })?;
    debug!(
        player = format_args!("{:#x}", player),
        globals = format_args!("{:#x}", globals),
        "globals resolved"
    );
    Ok(globals)
}
