//! Resolution pipelines against the synthetic host.

mod common;

use common::layout::*;
use common::HostImage;
use sigresolve::config::ResolverConfig;
use sigresolve::testing::x86;
use sigresolve::{FatalError, NotifierAddresses, Unresolved, UnresolvedReason};

fn reason<T: std::fmt::Debug>(resolution: &Result<T, Unresolved>) -> UnresolvedReason {
    resolution.as_ref().expect_err("expected unresolved").reason.clone()
}

#[test]
fn all_symbols_resolve_on_intact_host() {
    let resolver = HostImage::new().resolver();

    assert_eq!(
        resolver.notifier().unwrap(),
        NotifierAddresses {
            instance: NOTIFIER_INSTANCE,
            notify: NOTIFIER_NOTIFY,
        }
    );
    assert_eq!(resolver.globals().unwrap(), PLAYER);
    assert_eq!(resolver.player_set_message().unwrap(), SET_MESSAGE);
    assert_eq!(resolver.cvar_index().unwrap(), CVAR_INDEX);

    assert!(resolver.is_notifier_loaded().unwrap());
    assert!(resolver.is_player_set_message_loaded().unwrap());
    assert!(resolver.is_cvar_index_loaded().unwrap());
    assert_eq!(resolver.try_globals().unwrap(), Some(PLAYER));
}

#[test]
fn results_are_memoized() {
    let resolver = HostImage::new().resolver();
    let first = resolver.notifier_resolution().unwrap();
    let second = resolver.notifier_resolution().unwrap();
    assert!(std::ptr::eq(first, second));

    let first = resolver.cvar_index_resolution().unwrap();
    let second = resolver.cvar_index_resolution().unwrap();
    assert!(std::ptr::eq(first, second));
}

#[test]
fn concurrent_first_calls_share_one_result() {
    let resolver = HostImage::new().resolver();
    let results: Vec<_> = std::thread::scope(|scope| {
        let handles: Vec<_> = (0..8)
            .map(|_| scope.spawn(|| resolver.cvar_index_resolution().unwrap()))
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    assert_eq!(*results[0], Ok(CVAR_INDEX));
    assert!(results.iter().all(|r| std::ptr::eq(*r, results[0])));
}

#[test]
fn unresolved_outcomes_are_memoized_too() {
    let mut host = HostImage::new();
    host.patch_rdata(CVAR_TEXT, b"XVarBase");
    let resolver = host.resolver();

    let first = resolver.cvar_index_resolution().unwrap();
    assert!(first.is_err());
    assert!(std::ptr::eq(first, resolver.cvar_index_resolution().unwrap()));
    assert!(!resolver.is_cvar_index_loaded().unwrap());
}

#[test]
fn globals_honours_field_offset() {
    let mut config = ResolverConfig::default();
    config.globals.player_field_offset = 0x10;
    let resolver = HostImage::new().resolver_with(config);
    assert_eq!(resolver.globals().unwrap(), PLAYER - 0x10);
}

#[test]
fn duplicated_notify_anchor_is_ambiguous() {
    let mut host = HostImage::new();
    host.patch_rdata(RDATA + 0xC0, b"Notifier::notify");
    let resolver = host.resolver();

    assert!(!resolver.is_notifier_loaded().unwrap());
    assert_eq!(
        reason(resolver.notifier_resolution().unwrap()),
        UnresolvedReason::AmbiguousAnchor {
            anchor: "Notifier::notify".to_string(),
            segment: ".rdata".to_string(),
            count: 2,
        }
    );
}

#[test]
fn notifier_without_caller_export() {
    let mut host = HostImage::new();
    host.without_export(common::ADD_RESOURCE_EXPORT);
    let resolver = host.resolver();
    assert!(matches!(
        reason(resolver.notifier_resolution().unwrap()),
        UnresolvedReason::MissingExport(_)
    ));
}

#[test]
fn notifier_caller_that_skips_notify() {
    // Replace the second call with nops: no candidate follows another call.
    let mut host = HostImage::new();
    host.patch_text(ADD_RESOURCE + 6, &[x86::NOP; 5]);
    let resolver = host.resolver();
    assert_eq!(
        reason(resolver.notifier_resolution().unwrap()),
        UnresolvedReason::NoSurvivor
    );
}

#[test]
fn notifier_instance_outside_module() {
    let mut host = HostImage::new();
    let call = ADD_RESOURCE + 1;
    host.patch_text(call, &x86::call(call, 0x900000));
    let resolver = host.resolver();

    assert!(!resolver.is_notifier_loaded().unwrap());
    assert_eq!(
        reason(resolver.notifier_resolution().unwrap()),
        UnresolvedReason::OutsideModule { address: 0x900000 }
    );
}

#[test]
fn notifier_unresolved_is_fatal_on_demand() {
    let mut host = HostImage::new();
    host.without_export(common::ADD_RESOURCE_EXPORT);
    let resolver = host.resolver();
    assert!(matches!(
        resolver.notifier(),
        Err(FatalError::Unresolved { symbol, .. }) if symbol == "Notifier::notify"
    ));
}

#[test]
fn second_player_comparison_is_ambiguous() {
    // A second `cmp [mem], 0` in the padding after the function, still
    // inside the scan window.
    let mut host = HostImage::new();
    host.patch_text(LAUNCH_UPDATE + 0x16, &x86::cmp_mem_imm8(0x403020, 0));
    let resolver = host.resolver();

    assert_eq!(resolver.try_globals().unwrap(), None);
    assert!(matches!(
        reason(resolver.globals_resolution().unwrap()),
        UnresolvedReason::PatternNotUnique(_)
    ));
}

#[test]
fn player_outside_module() {
    let mut host = HostImage::new();
    host.patch_text(LAUNCH_UPDATE + 8, &0x0050_0000u32.to_le_bytes());
    let resolver = host.resolver();
    assert_eq!(
        reason(resolver.globals_resolution().unwrap()),
        UnresolvedReason::OutsideModule { address: 0x500000 }
    );
}

#[test]
fn set_message_requires_gettext_first() {
    // Point the first call at String::String instead of gettext_.
    let mut host = HostImage::new();
    let call = UNLOCK_FACTION + 6;
    host.patch_text(call, &x86::call(call, STRING_CTOR));
    let resolver = host.resolver();

    assert!(!resolver.is_player_set_message_loaded().unwrap());
    assert_eq!(
        reason(resolver.player_set_message_resolution().unwrap()),
        UnresolvedReason::NoSurvivor
    );
}

#[test]
fn second_faction_message_with_other_target_is_ambiguous() {
    // Same text and gettext_ call, but a different third call.
    let mut host = HostImage::new();
    let at = CVAR_CTOR + 0x20;
    let mut code = sigresolve::testing::CodeBuffer::new(at);
    code.emit(&x86::push_imm32(FACTION_TEXT as u32))
        .emit_at(|a| x86::call(a, GETTEXT))
        .emit_at(|a| x86::call(a, STRING_CTOR))
        .emit_at(|a| x86::call(a, CVAR_HELPER))
        .emit(&[x86::RET]);
    host.patch_text(at, &code.into_bytes());
    let resolver = host.resolver();

    assert!(!resolver.is_player_set_message_loaded().unwrap());
    assert_eq!(
        reason(resolver.player_set_message_resolution().unwrap()),
        UnresolvedReason::AmbiguousSurvivors(2)
    );
    // The other pipelines do not look at this text.
    assert_eq!(resolver.cvar_index().unwrap(), CVAR_INDEX);
}

#[test]
fn set_message_without_anchor() {
    let mut host = HostImage::new();
    host.patch_rdata(FACTION_TEXT, b"Locked");
    let resolver = host.resolver();
    assert!(matches!(
        reason(resolver.player_set_message_resolution().unwrap()),
        UnresolvedReason::AnchorNotFound { .. }
    ));
}

#[test]
fn cvar_constructor_must_cover_reference() {
    // An early `ret` makes the constructor end before the reference.
    let mut host = HostImage::new();
    host.patch_text(CVAR_CTOR + 1, &[x86::RET]);
    let resolver = host.resolver();
    assert_eq!(
        reason(resolver.cvar_index_resolution().unwrap()),
        UnresolvedReason::NoSurvivor
    );
}

#[test]
fn cvar_accessor_index_is_configurable() {
    let mut config = ResolverConfig::default();
    config.cvar.accessor_call_index = 0;
    let resolver = HostImage::new().resolver_with(config);
    assert_eq!(resolver.cvar_index().unwrap(), CVAR_HELPER);

    let mut config = ResolverConfig::default();
    config.cvar.accessor_call_index = 2;
    let resolver = HostImage::new().resolver_with(config);
    assert_eq!(
        reason(resolver.cvar_index_resolution().unwrap()),
        UnresolvedReason::TooFewCalls {
            found: 2,
            expected: 3
        }
    );
}

#[test]
fn missing_rodata_is_fatal() {
    let mut config = ResolverConfig::default();
    config.segments.rodata = ".rodata".to_string();
    let resolver = HostImage::new().resolver_with(config);
    assert!(matches!(
        resolver.notifier_resolution(),
        Err(FatalError::MissingSegment { .. })
    ));
    // Fatal outcomes are not cached; the next call fails the same way.
    assert!(resolver.is_notifier_loaded().is_err());
}

#[test]
fn invalid_config_rejected_up_front() {
    let mut config = ResolverConfig::default();
    config.entries.alignment = 0x18;
    let module = std::sync::Arc::new(HostImage::new().module());
    assert!(matches!(
        sigresolve::Resolver::new(module, config),
        Err(FatalError::InvalidConfig(_))
    ));
}
