//! Availability probe for the engine shared library.
//!
//! The production engine ships as a separate shared library. Decompression
//! cannot start without it, so initialization gates on this probe and
//! reports `Unsupported` when the library is absent or unloadable.

use std::path::{Path, PathBuf};

use libloading::Library;

use crate::error::{PipelineError, PipelineResult};

/// Environment variable overriding the engine library location.
pub const ENV_ENGINE_LIBRARY: &str = "VDBSEQ_ENGINE_LIBRARY";

#[cfg(target_os = "windows")]
const ENGINE_LIBRARY_NAME: &str = "vdbseq_ce.dll";
#[cfg(target_os = "macos")]
const ENGINE_LIBRARY_NAME: &str = "libvdbseq_ce.dylib";
#[cfg(not(any(target_os = "windows", target_os = "macos")))]
const ENGINE_LIBRARY_NAME: &str = "libvdbseq_ce.so";

type GetVersionFn = unsafe extern "C" fn() -> u64;

/// Loaded engine library handle; keeps the library mapped while alive.
pub struct EngineLibrary {
    _library: Library,
    version: u64,
}

impl EngineLibrary {
    pub fn version(&self) -> u64 {
        self.version
    }
}

impl std::fmt::Debug for EngineLibrary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineLibrary").field("version", &self.version).finish()
    }
}

fn library_path(override_path: Option<&Path>) -> PathBuf {
    if let Some(path) = override_path {
        return path.to_path_buf();
    }
    if let Ok(path) = std::env::var(ENV_ENGINE_LIBRARY) {
        return PathBuf::from(path);
    }
    PathBuf::from(ENGINE_LIBRARY_NAME)
}

/// Loads the engine shared library and reads its version symbol.
pub fn load_engine_library(override_path: Option<&Path>) -> PipelineResult<EngineLibrary> {
    let path = library_path(override_path);
    log::debug!("[EngineLibrary::load] Probing engine library at {}", path.display());

    let library = unsafe { Library::new(&path) }.map_err(|e| {
        PipelineError::Unsupported(format!(
            "engine library '{}' unavailable: {}",
            path.display(),
            e
        ))
    })?;

    let version = unsafe {
        let get_version: libloading::Symbol<GetVersionFn> =
            library.get(b"vdbseq_ce_get_version\0").map_err(|e| {
                PipelineError::Unsupported(format!(
                    "engine library '{}' exports no version symbol: {}",
                    path.display(),
                    e
                ))
            })?;
        get_version()
    };

    log::info!(
        "[EngineLibrary::load] Loaded engine library {} (version {})",
        path.display(),
        version
    );
    Ok(EngineLibrary { _library: library, version })
}

/// True when the engine library can be loaded from the default location.
pub fn engine_library_available() -> bool {
    load_engine_library(None).is_ok()
}
