//! Native plumbing shared by all backends.
//!
//! This module holds the small set of primitives every hosting backend needs when it talks to
//! a runtime's C interface:
//!
//! - [`NativeLibrary`] - a dynamically loaded library plus typed symbol lookup, built on
//!   `libloading`. Failures surface as [`crate::Error::RuntimeInitialization`] for the owning
//!   backend.
//! - [`PdCString`] - the hosting layer's `char_t` string: UTF-16 (`widestring`) on Windows,
//!   UTF-8 everywhere else.
//! - [`Handle`] - a non-null opaque runtime pointer that may cross threads. The runtimes
//!   themselves define which calls are legal from which thread; the wrapper only stops the
//!   compiler from rejecting the sharing outright.

use std::{
    ffi::{CStr, CString, OsStr},
    fmt,
    marker::PhantomData,
    path::{Path, PathBuf},
    ptr::NonNull,
};

use libloading::{Library, Symbol};
use log::debug;

use crate::{backend::BackendKind, Result};

/// A dynamically loaded runtime library.
pub(crate) struct NativeLibrary {
    path: PathBuf,
    backend: BackendKind,
    library: Library,
}

impl NativeLibrary {
    /// Loads the library at `path` on behalf of `backend`.
    ///
    /// `path` may also be a bare library name, in which case the platform loader's search
    /// rules apply.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::RuntimeInitialization`] if the library cannot be loaded.
    pub(crate) fn open(path: &Path, backend: BackendKind) -> Result<Self> {
        debug!("{backend}: loading native library {}", path.display());

        // SAFETY: loading a runtime library runs its initializers, which is the whole point of
        // hosting it. The caller picked the path.
        let library = unsafe { Library::new(path) }
            .map_err(|e| init_error!(backend, "failed to load '{}': {}", path.display(), e))?;

        Ok(NativeLibrary {
            path: path.to_path_buf(),
            backend,
            library,
        })
    }

    /// Location the library was loaded from.
    pub(crate) fn path(&self) -> &Path {
        &self.path
    }

    /// Looks up `name` (NUL terminated) and copies the symbol out as `T`.
    ///
    /// # Safety
    ///
    /// `T` must match the symbol's real type, and the returned value must not be used after
    /// this library is dropped.
    pub(crate) unsafe fn symbol<T: Copy>(&self, name: &[u8]) -> Result<T> {
        let symbol: Symbol<T> = unsafe { self.library.get(name) }.map_err(|e| {
            let printable = String::from_utf8_lossy(name.strip_suffix(b"\0").unwrap_or(name));
            init_error!(
                self.backend,
                "'{}' does not export {}: {}",
                self.path.display(),
                printable,
                e
            )
        })?;
        Ok(*symbol)
    }
}

impl fmt::Debug for NativeLibrary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NativeLibrary")
            .field("path", &self.path)
            .field("backend", &self.backend)
            .finish_non_exhaustive()
    }
}

/// A non-null pointer to an opaque runtime object.
pub(crate) struct Handle<T> {
    ptr: NonNull<T>,
    _marker: PhantomData<*mut T>,
}

// SAFETY: the pointee is owned by the native runtime, not by Rust. Thread affinity rules are
// the runtime's and are honoured by the backends (e.g. Mono attaches threads before calls).
unsafe impl<T> Send for Handle<T> {}
unsafe impl<T> Sync for Handle<T> {}

impl<T> Handle<T> {
    /// Wraps `ptr`, returning `None` for null.
    pub(crate) fn new(ptr: *mut T) -> Option<Self> {
        NonNull::new(ptr).map(|ptr| Handle {
            ptr,
            _marker: PhantomData,
        })
    }

    pub(crate) fn as_ptr(self) -> *mut T {
        self.ptr.as_ptr()
    }
}

impl<T> Clone for Handle<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Handle<T> {}

impl<T> PartialEq for Handle<T> {
    fn eq(&self, other: &Self) -> bool {
        self.ptr == other.ptr
    }
}

impl<T> Eq for Handle<T> {}

impl<T> fmt::Debug for Handle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Handle({:p})", self.ptr)
    }
}

/// Character type of the `hostfxr` interface (`char_t`).
#[cfg(windows)]
pub(crate) type PdChar = u16;
/// Character type of the `hostfxr` interface (`char_t`).
#[cfg(not(windows))]
pub(crate) type PdChar = std::ffi::c_char;

/// An owned, NUL terminated `char_t` string.
#[derive(Debug, Clone)]
pub(crate) struct PdCString {
    #[cfg(windows)]
    inner: widestring::U16CString,
    #[cfg(not(windows))]
    inner: CString,
}

impl PdCString {
    /// Converts an OS string, failing on interior NULs.
    pub(crate) fn from_os_str(value: &OsStr) -> Option<Self> {
        #[cfg(windows)]
        let inner = widestring::U16CString::from_os_str(value).ok()?;
        #[cfg(not(windows))]
        let inner = {
            use std::os::unix::ffi::OsStrExt;
            CString::new(value.as_bytes()).ok()?
        };
        Some(PdCString { inner })
    }

    /// Converts a UTF-8 string, failing on interior NULs.
    pub(crate) fn from_str(value: &str) -> Option<Self> {
        Self::from_os_str(OsStr::new(value))
    }

    pub(crate) fn as_ptr(&self) -> *const PdChar {
        self.inner.as_ptr()
    }
}

/// Copies a NUL terminated `char_t` string owned by the runtime.
///
/// # Safety
///
/// `ptr` must be null or point to a valid NUL terminated `char_t` string.
pub(crate) unsafe fn pdstr_to_string(ptr: *const PdChar) -> Option<String> {
    if ptr.is_null() {
        return None;
    }

    #[cfg(windows)]
    let value = unsafe { widestring::U16CStr::from_ptr_str(ptr) }.to_string_lossy();
    #[cfg(not(windows))]
    let value = unsafe { CStr::from_ptr(ptr) }
        .to_string_lossy()
        .into_owned();
    Some(value)
}

/// Copies a NUL terminated UTF-8 string owned by the runtime.
///
/// # Safety
///
/// `ptr` must be null or point to a valid NUL terminated string.
pub(crate) unsafe fn cstr_to_string(ptr: *const std::ffi::c_char) -> Option<String> {
    if ptr.is_null() {
        return None;
    }
    Some(
        unsafe { CStr::from_ptr(ptr) }
            .to_string_lossy()
            .into_owned(),
    )
}

/// Builds a `char*` argument for the Mono and .NET Framework loader interfaces.
pub(crate) fn utf8_cstring(value: &str) -> Option<CString> {
    CString::new(value).ok()
}

/// Builds a `char*` argument from a path, which must be valid UTF-8.
pub(crate) fn path_cstring(path: &Path) -> Option<CString> {
    path.to_str().and_then(utf8_cstring)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pdcstring_roundtrip() {
        let value = PdCString::from_str("Lib.runtimeconfig.json").unwrap();
        let copied = unsafe { pdstr_to_string(value.as_ptr()) }.unwrap();
        assert_eq!(copied, "Lib.runtimeconfig.json");
    }

    #[test]
    fn pdcstring_rejects_interior_nul() {
        assert!(PdCString::from_str("bad\0name").is_none());
        assert!(utf8_cstring("bad\0name").is_none());
    }

    #[test]
    fn null_strings() {
        assert!(unsafe { pdstr_to_string(std::ptr::null()) }.is_none());
        assert!(unsafe { cstr_to_string(std::ptr::null()) }.is_none());
    }

    #[test]
    fn handle_rejects_null() {
        assert!(Handle::<u8>::new(std::ptr::null_mut()).is_none());

        let mut value = 7u8;
        let handle = Handle::new(&mut value as *mut u8).unwrap();
        assert_eq!(handle.as_ptr(), &mut value as *mut u8);
        assert_eq!(handle, handle.clone());
    }

    #[test]
    fn open_missing_library() {
        let result = NativeLibrary::open(
            Path::new("/nonexistent/libclrloader-missing.so"),
            BackendKind::Mono,
        );
        match result {
            Err(crate::Error::RuntimeInitialization { backend, message }) => {
                assert_eq!(backend, BackendKind::Mono);
                assert!(message.contains("libclrloader-missing"));
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }
}
