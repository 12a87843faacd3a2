use std::io::Write;

use sigresolve::config::*;
use sigresolve::FatalError;

#[test]
fn test_resolver_config_defaults() {
    let config = ResolverConfig::default();

    assert_eq!(config.segments.code, ".text");
    assert_eq!(config.segments.rodata, ".rdata");
    assert_eq!(config.notifier.anchor, "Notifier::notify");
    assert_eq!(config.notifier.entry_window, 0x200);
    assert_eq!(config.globals.scan_window, 0x380);
    assert_eq!(config.player.call_window, 0x40);
    assert_eq!(config.player.min_calls, 3);
    assert_eq!(config.player.result_index, 2);
    assert_eq!(config.cvar.accessor_call_index, 1);
}

#[test]
fn test_config_from_file() -> anyhow::Result<()> {
    let mut file = tempfile::NamedTempFile::new()?;
    write!(
        file,
        r#"{{
            "entries": {{ "alignment": 32 }},
            "notifier": {{ "entry_window": 512 }},
            "cvar": {{ "anchor": "CVar::CVar", "entry_window": 256 }}
        }}"#
    )?;

    let config = ResolverConfig::from_path(file.path())?;
    assert_eq!(config.entries.alignment, 32);
    assert_eq!(config.entries.padding, 0xCC);
    assert_eq!(config.cvar.anchor, "CVar::CVar");
    assert_eq!(config.parser.max_instructions, 10_000);
    Ok(())
}

#[test]
fn test_config_file_rejects_bad_alignment() -> anyhow::Result<()> {
    let mut file = tempfile::NamedTempFile::new()?;
    // 0x180 is not a power of two
    write!(file, r#"{{ "entries": {{ "alignment": 384 }} }}"#)?;
    assert!(matches!(
        ResolverConfig::from_path(file.path()),
        Err(FatalError::InvalidConfig(_))
    ));
    Ok(())
}

#[test]
fn test_missing_config_file() {
    let err = ResolverConfig::from_path("/nonexistent/sigresolve.json").unwrap_err();
    assert!(err.to_string().contains("failed to read"));
}

#[test]
fn test_config_round_trips_through_json() -> anyhow::Result<()> {
    let mut config = ResolverConfig::default();
    config.globals.player_field_offset = 0x18;
    let text = serde_json::to_string_pretty(&config)?;
    assert_eq!(ResolverConfig::from_json(&text)?, config);
    Ok(())
}

#[test]
fn test_player_indices_bounded_by_min_calls() {
    let mut config = ResolverConfig::default();
    config.player.result_index = 3;
    assert!(config.validate().is_err());
    config.player.min_calls = 4;
    assert!(config.validate().is_ok());
}
