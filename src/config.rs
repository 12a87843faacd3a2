//! Configuration for module loading, the function parser and the resolution
//! pipelines.
//!
//! Every anchor string, export name, scan window and positional index used by
//! the pipelines lives here. The defaults describe the host build the
//! heuristics were written against; overrides can be loaded from JSON.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{FatalError, Result};

/// Master configuration for a [`crate::resolve::Resolver`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolverConfig {
    /// Header and export-table limits applied when opening a module.
    pub module: ModuleConfig,
    /// Names of the segments the pipelines search.
    pub segments: SegmentNames,
    /// Compiler alignment/padding convention for entry heuristics.
    pub entries: EntryConvention,
    /// Function parser limits.
    pub parser: ParserConfig,
    /// Notifier::instance / Notifier::notify pipeline.
    pub notifier: NotifierConfig,
    /// Globals structure pipeline.
    pub globals: GlobalsConfig,
    /// Player::setMessage pipeline.
    pub player: PlayerConfig,
    /// CVarBase::index pipeline.
    pub cvar: CvarConfig,
}

impl ResolverConfig {
    /// Parse a configuration from JSON. Missing fields keep their defaults.
    pub fn from_json(text: &str) -> Result<Self> {
        let config: Self =
            serde_json::from_str(text).map_err(|e| FatalError::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Read and parse a JSON configuration file.
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            FatalError::InvalidConfig(format!("failed to read {}: {}", path.display(), e))
        })?;
        Self::from_json(&text)
    }

    /// Reject values the heuristics cannot work with.
    pub fn validate(&self) -> Result<()> {
        self.entries.validate()?;
        for (what, window) in [
            ("notifier.entry_window", self.notifier.entry_window),
            ("cvar.entry_window", self.cvar.entry_window),
        ] {
            if window % self.entries.alignment != 0 {
                return Err(FatalError::InvalidConfig(format!(
                    "{} ({:#x}) is not a multiple of the entry alignment ({:#x})",
                    what, window, self.entries.alignment
                )));
            }
        }
        if self.parser.max_instructions == 0 {
            return Err(FatalError::InvalidConfig(
                "parser.max_instructions must be non-zero".into(),
            ));
        }
        if self.player.result_index >= self.player.min_calls
            || self.player.gettext_index >= self.player.min_calls
        {
            return Err(FatalError::InvalidConfig(
                "player call indices must be below player.min_calls".into(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModuleConfig {
    /// Largest accepted `e_lfanew`; anything above is treated as corruption.
    pub max_header_offset: u32,
    /// Upper bound on export directory entries read.
    pub max_exports: usize,
}

impl Default for ModuleConfig {
    fn default() -> Self {
        Self {
            max_header_offset: 1024,
            max_exports: 65536,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SegmentNames {
    /// Executable code.
    pub code: String,
    /// Read-only data holding string literals.
    pub rodata: String,
}

impl Default for SegmentNames {
    fn default() -> Self {
        Self {
            code: ".text".to_string(),
            rodata: ".rdata".to_string(),
        }
    }
}

/// Function alignment and inter-function padding used by the compiler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EntryConvention {
    pub alignment: u64,
    pub padding: u8,
}

impl Default for EntryConvention {
    fn default() -> Self {
        Self {
            alignment: 0x10,
            padding: 0xCC,
        }
    }
}

impl EntryConvention {
    pub fn validate(&self) -> Result<()> {
        if self.alignment == 0 || !self.alignment.is_power_of_two() {
            return Err(FatalError::InvalidConfig(format!(
                "entry alignment {:#x} is not a power of two",
                self.alignment
            )));
        }
        Ok(())
    }

    /// Round `address` down to the alignment boundary.
    #[inline]
    pub fn align_down(&self, address: u64) -> u64 {
        address & !(self.alignment - 1)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParserConfig {
    /// Instruction ceiling for a single function parse.
    pub max_instructions: usize,
}

impl Default for ParserConfig {
    fn default() -> Self {
        Self {
            max_instructions: 10_000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NotifierConfig {
    /// Assert text inside Notifier::notify.
    pub anchor: String,
    /// Backward window for entry candidates around anchor references.
    pub entry_window: u64,
    /// Exported function that calls Notifier::instance then Notifier::notify.
    pub caller_export: String,
}

impl Default for NotifierConfig {
    fn default() -> Self {
        Self {
            anchor: "Notifier::notify".to_string(),
            entry_window: 0x200,
            caller_export: "?addResource@Block@@QAEMMU?$tvec2@M$0A@@glm@@@Z".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GlobalsConfig {
    /// Exported function containing `cmp dword ptr [globals.player], 0`.
    pub export: String,
    /// Bytes scanned from the export entry.
    pub scan_window: u64,
    /// Offset of the `player` field inside the globals structure.
    pub player_field_offset: u64,
}

impl Default for GlobalsConfig {
    fn default() -> Self {
        Self {
            export: "?launchUpdate@Block@@AAE_NI@Z".to_string(),
            scan_window: 0x380,
            player_field_offset: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlayerConfig {
    pub anchor: String,
    pub gettext_export: String,
    /// Bytes scanned for `call rel32` after each anchor reference.
    pub call_window: u64,
    /// Calls expected after the reference: gettext_, String::String, Player::setMessage.
    pub min_calls: usize,
    pub gettext_index: usize,
    pub result_index: usize,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            anchor: "Unlocked Faction".to_string(),
            gettext_export: "?gettext_@@YAPBDPBD@Z".to_string(),
            call_window: 0x40,
            min_calls: 3,
            gettext_index: 0,
            result_index: 2,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CvarConfig {
    /// Text referenced from the CVarBase constructor.
    pub anchor: String,
    pub entry_window: u64,
    /// Position of the index accessor among the constructor's calls.
    pub accessor_call_index: usize,
}

impl Default for CvarConfig {
    fn default() -> Self {
        Self {
            anchor: "CVarBase::CVarBase".to_string(),
            entry_window: 0x200,
            accessor_call_index: 1,
        }
    }
}
