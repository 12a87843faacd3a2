//! Signature resolution of internal host symbols.
//!
//! Every pipeline has the same shape: a unique anchor, a set of candidate
//! addresses derived from it, an independent second source the candidates
//! are cross-checked against, and a single survivor. Absence and ambiguity
//! are expected outcomes ([`Unresolved`]) and are memoized like successes;
//! structural problems surface as [`FatalError`] and are not cached.

pub mod cvar;
pub mod globals;
pub mod notifier;
pub mod player;

use std::sync::Arc;

use once_cell::sync::OnceCell;
use thiserror::Error;
use tracing::{debug, warn};

use crate::analysis::crossval::Survivor;
use crate::config::ResolverConfig;
use crate::core::module::Module;
use crate::core::segment::Segment;
use crate::error::{FatalError, Result};

pub use notifier::NotifierAddresses;

/// Why a symbol could not be determined.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UnresolvedReason {
    #[error("anchor {anchor:?} not found in {segment}")]
    AnchorNotFound { anchor: String, segment: String },

    #[error("anchor {anchor:?} occurs {count} times in {segment}")]
    AmbiguousAnchor {
        anchor: String,
        segment: String,
        count: usize,
    },

    #[error("export {0} not found")]
    MissingExport(String),

    #[error("no candidates")]
    NoCandidates,

    #[error("function at {address:#x} could not be parsed")]
    ParseFailed { address: u64 },

    #[error("found {found} calls, expected at least {expected}")]
    TooFewCalls { found: usize, expected: usize },

    #[error("instruction pattern not unique: {0}")]
    PatternNotUnique(&'static str),

    #[error("no candidate survived cross-validation")]
    NoSurvivor,

    #[error("{0} distinct candidates survived cross-validation")]
    AmbiguousSurvivors(usize),

    #[error("{address:#x} lies outside the module")]
    OutsideModule { address: u64 },
}

/// A symbol that could not be resolved, and why.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{symbol}: {reason}")]
pub struct Unresolved {
    pub symbol: &'static str,
    pub reason: UnresolvedReason,
}

impl Unresolved {
    pub fn new(symbol: &'static str, reason: UnresolvedReason) -> Self {
        Self { symbol, reason }
    }
}

impl From<Unresolved> for FatalError {
    fn from(unresolved: Unresolved) -> Self {
        FatalError::Unresolved {
            symbol: unresolved.symbol.to_string(),
            reason: unresolved.reason.to_string(),
        }
    }
}

/// Outcome of one pipeline run.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolveError {
    #[error(transparent)]
    Unresolved(#[from] Unresolved),
    #[error(transparent)]
    Fatal(#[from] FatalError),
}

/// Memoized value of a resolution: the address(es), or why there are none.
pub type Resolution<T> = std::result::Result<T, Unresolved>;

/// The single occurrence of `anchor` in `segment`.
pub(crate) fn unique_anchor(
    symbol: &'static str,
    segment: &Segment,
    anchor: &str,
) -> std::result::Result<u64, Unresolved> {
    let found = segment.find_all(anchor.as_bytes());
    match found.as_slice() {
        [only] => {
            debug!(
                anchor,
                address = format_args!("{:#x}", only),
                "anchor located"
            );
            Ok(*only)
        }
        [] => Err(Unresolved::new(
            symbol,
            UnresolvedReason::AnchorNotFound {
                anchor: anchor.to_string(),
                segment: segment.name().to_string(),
            },
        )),
        many => Err(Unresolved::new(
            symbol,
            UnresolvedReason::AmbiguousAnchor {
                anchor: anchor.to_string(),
                segment: segment.name().to_string(),
                count: many.len(),
            },
        )),
    }
}

/// An export the pipeline depends on. Missing is unresolved; pointing outside
/// the module is fatal.
pub(crate) fn required_export(
    symbol: &'static str,
    module: &Module,
    name: &str,
) -> std::result::Result<u64, ResolveError> {
    match module.function_by_name(name)? {
        Some(address) => Ok(address),
        None => {
            let reason = UnresolvedReason::MissingExport(name.to_string());
            Err(Unresolved::new(symbol, reason).into())
        }
    }
}

/// The single cross-validated survivor, or why there is none.
pub(crate) fn single_survivor<T>(
    symbol: &'static str,
    survivor: Survivor<T>,
) -> std::result::Result<T, Unresolved> {
    match survivor {
        Survivor::One(value) => Ok(value),
        Survivor::None => Err(Unresolved::new(symbol, UnresolvedReason::NoSurvivor)),
        Survivor::Ambiguous(n) => Err(Unresolved::new(
            symbol,
            UnresolvedReason::AmbiguousSurvivors(n),
        )),
    }
}

/// Resolves host symbols against one module, computing each at most once.
#[derive(Debug)]
pub struct Resolver {
    module: Arc<Module>,
    config: ResolverConfig,
    notifier: OnceCell<Resolution<NotifierAddresses>>,
    globals: OnceCell<Resolution<u64>>,
    player_set_message: OnceCell<Resolution<u64>>,
    cvar_index: OnceCell<Resolution<u64>>,
}

impl Resolver {
    /// Validates the configuration up front.
    pub fn new(module: Arc<Module>, config: ResolverConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            module,
            config,
            notifier: OnceCell::new(),
            globals: OnceCell::new(),
            player_set_message: OnceCell::new(),
            cvar_index: OnceCell::new(),
        })
    }

    pub fn module(&self) -> &Module {
        &self.module
    }

    pub fn config(&self) -> &ResolverConfig {
        &self.config
    }

    pub fn notifier_resolution(&self) -> Result<&Resolution<NotifierAddresses>> {
        memoize(&self.notifier, || notifier::resolve(&self.module, &self.config))
    }

    pub fn is_notifier_loaded(&self) -> Result<bool> {
        Ok(self.notifier_resolution()?.is_ok())
    }

    /// `Notifier::instance` and `Notifier::notify`; unresolved is fatal.
    pub fn notifier(&self) -> Result<NotifierAddresses> {
        required(self.notifier_resolution()?)
    }

    pub fn globals_resolution(&self) -> Result<&Resolution<u64>> {
        memoize(&self.globals, || globals::resolve(&self.module, &self.config))
    }

    /// Address of the globals structure, when it could be determined.
    pub fn try_globals(&self) -> Result<Option<u64>> {
        Ok(self.globals_resolution()?.as_ref().ok().copied())
    }

    pub fn globals(&self) -> Result<u64> {
        required(self.globals_resolution()?)
    }

    pub fn player_set_message_resolution(&self) -> Result<&Resolution<u64>> {
        memoize(&self.player_set_message, || {
            player::resolve(&self.module, &self.config)
        })
    }

    pub fn is_player_set_message_loaded(&self) -> Result<bool> {
        Ok(self.player_set_message_resolution()?.is_ok())
    }

    pub fn player_set_message(&self) -> Result<u64> {
        required(self.player_set_message_resolution()?)
    }

    pub fn cvar_index_resolution(&self) -> Result<&Resolution<u64>> {
        memoize(&self.cvar_index, || cvar::resolve(&self.module, &self.config))
    }

    pub fn is_cvar_index_loaded(&self) -> Result<bool> {
        Ok(self.cvar_index_resolution()?.is_ok())
    }

    pub fn cvar_index(&self) -> Result<u64> {
        required(self.cvar_index_resolution()?)
    }
}

/// Run `pipeline` the first time only. Fatal errors leave the cell empty.
fn memoize<T, F>(cell: &OnceCell<Resolution<T>>, pipeline: F) -> Result<&Resolution<T>>
where
    F: FnOnce() -> std::result::Result<T, ResolveError>,
{
    cell.get_or_try_init(|| match pipeline() {
        Ok(value) => Ok(Ok(value)),
        Err(ResolveError::Unresolved(unresolved)) => {
            debug!(
                symbol = unresolved.symbol,
                reason = %unresolved.reason,
                "symbol unresolved"
            );
            Ok(Err(unresolved))
        }
        Err(ResolveError::Fatal(err)) => Err(err),
    })
}

fn required<T: Copy>(resolution: &Resolution<T>) -> Result<T> {
    match resolution {
        Ok(value) => Ok(*value),
        Err(unresolved) => {
            warn!(
                symbol = unresolved.symbol,
                reason = %unresolved.reason,
                "required symbol missing"
            );
            Err(unresolved.clone().into())
        }
    }
}
