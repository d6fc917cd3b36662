//! The native exports of `ClrLoader.dll`.
//!
//! The .NET Framework offers no unmanaged way to get a callable function pointer for a managed
//! method. `ClrLoader.dll` is a small mixed assembly that exports a C interface doing exactly
//! that: it creates app-domains, loads the requested assembly inside them and returns a
//! delegate-backed function pointer with the buffer signature.

use std::{
    ffi::{c_char, c_void},
    path::Path,
};

use crate::{backend::BackendKind, native::NativeLibrary, Result};

/// Opaque app-domain handle returned by the loader.
#[repr(C)]
pub(crate) struct LoaderDomain {
    _private: [u8; 0],
}

/// Function table over a loaded `ClrLoader.dll`.
#[derive(Debug)]
pub(crate) struct NetFxApi {
    pub pyclr_initialize: unsafe extern "C" fn(),
    pub pyclr_create_appdomain:
        unsafe extern "C" fn(*const c_char, *const c_char) -> *mut LoaderDomain,
    pub pyclr_get_function: unsafe extern "C" fn(
        *mut LoaderDomain,
        *const c_char,
        *const c_char,
        *const c_char,
    ) -> *mut c_void,
    pub pyclr_close_appdomain: unsafe extern "C" fn(*mut LoaderDomain),
    library: NativeLibrary,
}

impl NetFxApi {
    /// Loads the loader library at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::RuntimeInitialization`] if the library cannot be loaded or does
    /// not export the loader interface.
    pub(crate) fn load(path: &Path) -> Result<Self> {
        let library = NativeLibrary::open(path, BackendKind::NetFx)?;
        Ok(NetFxApi {
            pyclr_initialize: symbol!(library, pyclr_initialize),
            pyclr_create_appdomain: symbol!(library, pyclr_create_appdomain),
            pyclr_get_function: symbol!(library, pyclr_get_function),
            pyclr_close_appdomain: symbol!(library, pyclr_close_appdomain),
            library,
        })
    }

    /// Location of the loaded library.
    pub(crate) fn path(&self) -> &Path {
        self.library.path()
    }
}
