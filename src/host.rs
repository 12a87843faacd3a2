//! Process-wide accessors for the host image.
//!
//! A single [`Resolver`] serves the whole process. It is either installed
//! explicitly with [`install`] or built on first use from the image the
//! current process was started from. Accessors never return errors: a
//! structural problem, or a mandatory symbol that cannot be found, goes
//! through [`crate::fatal::abort`].

use std::sync::Arc;

use once_cell::sync::OnceCell;
use tracing::info;

use crate::config::ResolverConfig;
use crate::core::module::Module;
use crate::error::Result;
use crate::fatal::or_abort;
use crate::resolve::Resolver;

static HOST: OnceCell<Resolver> = OnceCell::new();

/// Install the process-wide resolver. Returns `false` if one already exists.
pub fn install(module: Module, config: ResolverConfig) -> Result<bool> {
    let resolver = Resolver::new(Arc::new(module), config)?;
    let name = resolver.module().name().to_string();
    let installed = HOST.set(resolver).is_ok();
    if installed {
        info!(module = %name, "host resolver installed");
    }
    Ok(installed)
}

/// The process-wide resolver, loading the current process image on first use.
pub fn resolver() -> &'static Resolver {
    HOST.get_or_init(|| or_abort(load_current_process(ResolverConfig::default())))
}

#[cfg(windows)]
#[link(name = "kernel32")]
extern "system" {
    fn GetModuleHandleW(name: *const u16) -> *mut std::ffi::c_void;
}

#[cfg(windows)]
fn load_current_process(config: ResolverConfig) -> Result<Resolver> {
    use crate::core::image::ImageView;
    use crate::error::FatalError;

    // SAFETY: a null name asks for the handle of the executable itself.
    let base = unsafe { GetModuleHandleW(std::ptr::null()) };
    if base.is_null() {
        return Err(FatalError::NoHostImage(
            "GetModuleHandleW returned null".to_string(),
        ));
    }
    // SAFETY: the executable stays mapped for the lifetime of the process.
    let image = unsafe { ImageView::from_loaded(base as *const u8)? };

    let name = std::env::current_exe()
        .ok()
        .and_then(|p| p.file_name().map(|n| n.to_string_lossy().into_owned()))
        .unwrap_or_else(|| "host".to_string());
    let module = Module::open(name, image, &config.module)?;
    Resolver::new(Arc::new(module), config)
}

#[cfg(not(windows))]
fn load_current_process(_config: ResolverConfig) -> Result<Resolver> {
    Err(crate::error::FatalError::NoHostImage(
        "the current process is not a PE image; install a module explicitly".to_string(),
    ))
}

pub fn is_notifier_loaded() -> bool {
    or_abort(resolver().is_notifier_loaded())
}

/// Address of `Notifier::instance`.
pub fn notifier_instance() -> u64 {
    or_abort(resolver().notifier()).instance
}

/// Address of `Notifier::notify`.
pub fn notifier_notify() -> u64 {
    or_abort(resolver().notifier()).notify
}

/// Address of the globals structure, if it could be located.
pub fn try_globals() -> Option<u64> {
    or_abort(resolver().try_globals())
}

pub fn globals() -> u64 {
    or_abort(resolver().globals())
}

pub fn is_player_set_message_loaded() -> bool {
    or_abort(resolver().is_player_set_message_loaded())
}

/// Address of `Player::setMessage`.
pub fn player_set_message() -> u64 {
    or_abort(resolver().player_set_message())
}

pub fn is_cvar_index_loaded() -> bool {
    or_abort(resolver().is_cvar_index_loaded())
}

/// Address of the `CVarBase` index accessor.
pub fn cvar_index() -> u64 {
    or_abort(resolver().cvar_index())
}
