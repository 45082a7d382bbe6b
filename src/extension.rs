//! Extension discovery and loading.
//!
//! At `Context::init`, dynamic objects are discovered from the directories
//! named by `PIXELFISH_EXTENSION_PATH` and loaded in a stable order:
//! directories in the order the environment variable lists them, files
//! within a directory in lexical order. Each extension must export a
//! `pixelfish_extension_init` symbol; a non-zero return, or a failure to
//! load the library at all, is logged and that extension is skipped.
//! Extensions must not assume other extensions are loaded, so one
//! extension's failure never aborts the scan.

use std::collections::HashSet;
use std::env;
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use libloading::{Library, Symbol};
use once_cell::sync::Lazy;

use crate::Context;

/// Environment variable naming additional extension search directories,
/// `:`-separated on Unix and `;`-separated on Windows (`std::env::split_paths`
/// already knows the platform convention).
pub const EXTENSION_PATH_VAR: &str = "PIXELFISH_EXTENSION_PATH";

/// The symbol every extension shared object must export.
const INIT_SYMBOL: &[u8] = b"pixelfish_extension_init\0";

type ExtensionInit = unsafe extern "C" fn(*mut Context) -> i32;

/// Paths already handed to `libloading` by some `Context` in this process.
/// `load_extension` forgets every `Library` it loads (its kernel function
/// pointers must outlive the `Context` that registered them), so loading
/// the same shared object from two independent `Context`s in one process
/// would otherwise leak one OS handle per call. Process-wide because the
/// dynamic loader's view of what is mapped is itself process-wide.
static LOADED_EXTENSIONS: Lazy<Mutex<HashSet<PathBuf>>> = Lazy::new(|| Mutex::new(HashSet::new()));

impl Context {
    /// Discover and load extensions from [`EXTENSION_PATH_VAR`]. Returns the
    /// number of extensions successfully loaded.
    pub fn load_extensions(&mut self) -> usize {
        let mut loaded = 0;
        for dir in search_dirs() {
            let mut entries: Vec<PathBuf> = match std::fs::read_dir(&dir) {
                Ok(rd) => rd.filter_map(|e| e.ok().map(|e| e.path())).collect(),
                Err(err) => {
                    tracing::debug!(?dir, %err, "skipping unreadable extension directory");
                    continue;
                }
            };
            entries.sort();
            for path in entries {
                if !is_dynamic_object(&path) {
                    continue;
                }
                match self.load_extension(&path) {
                    Ok(true) => loaded += 1,
                    Ok(false) => {}
                    Err(err) => tracing::warn!(?path, %err, "failed to load extension"),
                }
            }
        }
        loaded
    }

    /// Load a single extension file, returning whether its init symbol
    /// reported success.
    fn load_extension(&mut self, path: &Path) -> Result<bool, libloading::Error> {
        {
            let mut loaded = LOADED_EXTENSIONS.lock().expect("extension registry lock poisoned");
            if !loaded.insert(path.to_path_buf()) {
                tracing::debug!(?path, "extension already loaded in this process, skipping");
                return Ok(false);
            }
        }
        // SAFETY: extensions are trusted code chosen by the operator via
        // `PIXELFISH_EXTENSION_PATH`.
        unsafe {
            let lib = Library::new(path)?;
            let init: Symbol<ExtensionInit> = lib.get(INIT_SYMBOL)?;
            let rc = init(self as *mut Context);
            // The library must outlive every kernel function pointer it
            // registered; descriptors (and the conversions hung off them)
            // live for the process lifetime, so the library does too.
            std::mem::forget(lib);
            if rc == 0 {
                tracing::info!(?path, "extension loaded");
                Ok(true)
            } else {
                tracing::warn!(?path, rc, "extension init returned nonzero");
                Ok(false)
            }
        }
    }
}

fn search_dirs() -> Vec<PathBuf> {
    match env::var_os(EXTENSION_PATH_VAR) {
        Some(val) => env::split_paths(&val).collect(),
        None => Vec::new(),
    }
}

fn is_dynamic_object(path: &Path) -> bool {
    if !path.is_file() {
        return false;
    }
    matches!(
        path.extension().and_then(OsStr::to_str).map(str::to_ascii_lowercase).as_deref(),
        Some("so") | Some("dll") | Some("dylib")
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_search_path_loads_nothing() {
        // SAFETY: test-local env mutation; no other test in this crate reads
        // PIXELFISH_EXTENSION_PATH concurrently with this one under `cargo
        // test`'s default single-binary-per-integration-test isolation for
        // unit tests within a crate, and integration test binaries are
        // separate processes.
        unsafe {
            env::remove_var(EXTENSION_PATH_VAR);
        }
        let mut ctx = Context::new();
        assert_eq!(ctx.load_extensions(), 0);
    }

    #[test]
    fn nonexistent_directory_is_skipped_not_fatal() {
        unsafe {
            env::set_var(EXTENSION_PATH_VAR, "/nonexistent/pixelfish/extensions");
        }
        let mut ctx = Context::new();
        assert_eq!(ctx.load_extensions(), 0);
        unsafe {
            env::remove_var(EXTENSION_PATH_VAR);
        }
    }
}
