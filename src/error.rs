use std::path::PathBuf;

use thiserror::Error;

use crate::backend::BackendKind;

macro_rules! init_error {
    // Single string version
    ($backend:expr, $msg:expr) => {
        crate::Error::RuntimeInitialization {
            backend: $backend,
            message: $msg.to_string(),
        }
    };

    // Format string with arguments version
    ($backend:expr, $fmt:expr, $($arg:tt)*) => {
        crate::Error::RuntimeInitialization {
            backend: $backend,
            message: format!($fmt, $($arg)*),
        }
    };
}

macro_rules! load_error {
    ($backend:expr, $path:expr, $msg:expr) => {
        crate::Error::AssemblyLoad {
            backend: $backend,
            path: $path.to_path_buf(),
            message: $msg.to_string(),
        }
    };

    ($backend:expr, $path:expr, $fmt:expr, $($arg:tt)*) => {
        crate::Error::AssemblyLoad {
            backend: $backend,
            path: $path.to_path_buf(),
            message: format!($fmt, $($arg)*),
        }
    };
}

macro_rules! member_error {
    ($backend:expr, $path:expr, $type_name:expr, $method_name:expr, $msg:expr) => {
        crate::Error::MemberResolution {
            backend: $backend,
            path: $path.to_path_buf(),
            type_name: $type_name.to_string(),
            method_name: $method_name.to_string(),
            message: $msg.to_string(),
        }
    };

    ($backend:expr, $path:expr, $type_name:expr, $method_name:expr, $fmt:expr, $($arg:tt)*) => {
        crate::Error::MemberResolution {
            backend: $backend,
            path: $path.to_path_buf(),
            type_name: $type_name.to_string(),
            method_name: $method_name.to_string(),
            message: format!($fmt, $($arg)*),
        }
    };
}

/// The generic Error type, which provides coverage for all errors this library can potentially
/// return.
///
/// The first four variants form the loader's own taxonomy. Each of them carries enough
/// context (backend kind, assembly path, type and method name) to diagnose a misconfiguration
/// without looking at loader internals. The remaining variants cover the ambient plumbing
/// around the core: runtime discovery, option files and lock poisoning.
///
/// # Error Categories
///
/// ## Loader Errors
/// - [`Error::RuntimeInitialization`] - The native runtime could not be started
/// - [`Error::AssemblyLoad`] - The assembly path could not be loaded by the backend
/// - [`Error::MemberResolution`] - The type or method could not be resolved
/// - [`Error::NameFormat`] - A joined `Type.Method` name had no separator
///
/// ## I/O and External Errors
/// - [`Error::FileError`] - Filesystem I/O errors during discovery
/// - [`Error::JsonError`] - Malformed runtime configuration or options files
/// - [`Error::LockError`] - A poisoned guard around process-wide runtime state
///
/// # Examples
///
/// ```rust,no_run
/// use clrloader::{get_coreclr, CoreClrConfig, Error};
///
/// let runtime = get_coreclr(CoreClrConfig::new("Lib.runtimeconfig.json"))?;
/// match runtime.get_assembly("Lib.dll").get_function("Lib.Echo", None) {
///     Ok(function) => println!("resolved {function}"),
///     Err(Error::MemberResolution { type_name, method_name, .. }) => {
///         eprintln!("no {type_name}.{method_name} in Lib.dll");
///     }
///     Err(e) => eprintln!("Other error: {e}"),
/// }
/// # Ok::<(), clrloader::Error>(())
/// ```
#[derive(Error, Debug)]
pub enum Error {
    /// The backend's native runtime failed to start.
    ///
    /// Raised for a missing or unloadable runtime library, a missing or invalid configuration
    /// file, an incompatible garbage collector selection or a conflicting second initialization
    /// of a process-wide runtime. Fatal to the backend instance; never retried automatically.
    #[error("{backend} runtime initialization failed: {message}")]
    RuntimeInitialization {
        /// The backend that failed to start
        backend: BackendKind,
        /// Description of the failure
        message: String,
    },

    /// The assembly could not be loaded.
    ///
    /// The path does not exist, is not a PE image with a CLR header, or the runtime refused
    /// to load it. The caller may retry with a corrected path.
    #[error("{backend} could not load assembly '{}': {message}", path.display())]
    AssemblyLoad {
        /// The backend asked to load the assembly
        backend: BackendKind,
        /// The assembly path as supplied by the caller
        path: PathBuf,
        /// Description of the failure
        message: String,
    },

    /// The type or method could not be resolved within a loaded assembly.
    ///
    /// This also covers methods whose signature does not match `int (IntPtr, int)`.
    #[error(
        "{backend} could not resolve '{type_name}.{method_name}' in '{}': {message}",
        path.display()
    )]
    MemberResolution {
        /// The backend asked to resolve the member
        backend: BackendKind,
        /// The assembly path as supplied by the caller
        path: PathBuf,
        /// The fully qualified type name
        type_name: String,
        /// The static method name
        method_name: String,
        /// Description of the failure
        message: String,
    },

    /// A joined `Type.Method` name could not be split.
    ///
    /// Purely a local precondition check, never reaches a backend.
    #[error("'{name}' does not separate type and method with '{separator}'")]
    NameFormat {
        /// The name as supplied by the caller
        name: String,
        /// The separator that was searched for
        separator: char,
    },

    /// File I/O error.
    ///
    /// Wraps standard I/O errors raised while scanning installation directories.
    #[error("{0}")]
    FileError(#[from] std::io::Error),

    /// A runtime configuration or options file could not be parsed or written.
    #[error("{0}")]
    JsonError(#[from] serde_json::Error),

    /// Failed to lock target.
    ///
    /// A thread panicked while holding the guard around process-wide runtime state.
    #[error("Failed to lock target")]
    LockError,
}

impl Error {
    /// Returns the backend that produced this error, if it came from a backend.
    #[must_use]
    pub fn backend(&self) -> Option<BackendKind> {
        match self {
            Error::RuntimeInitialization { backend, .. }
            | Error::AssemblyLoad { backend, .. }
            | Error::MemberResolution { backend, .. } => Some(*backend),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use super::*;

    #[test]
    fn member_error_carries_context() {
        let error = member_error!(
            BackendKind::CoreClr,
            Path::new("/tmp/Lib.dll"),
            "Lib",
            "Missing",
            "method not found (0x{:08X})",
            0x8013_1513u32
        );

        let text = error.to_string();
        assert!(text.contains("CoreCLR"));
        assert!(text.contains("Lib.Missing"));
        assert!(text.contains("/tmp/Lib.dll"));
        assert!(text.contains("0x80131513"));
        assert_eq!(error.backend(), Some(BackendKind::CoreClr));
    }

    #[test]
    fn name_format_has_no_backend() {
        let error = Error::NameFormat {
            name: "Echo".to_string(),
            separator: '.',
        };
        assert_eq!(error.backend(), None);
        assert_eq!(
            error.to_string(),
            "'Echo' does not separate type and method with '.'"
        );
    }

    #[test]
    fn init_and_load_errors() {
        let error = init_error!(BackendKind::Mono, "libmono not found");
        assert_eq!(
            error.to_string(),
            "Mono runtime initialization failed: libmono not found"
        );

        let error = load_error!(BackendKind::NetFx, Path::new("a.dll"), "missing");
        assert!(matches!(error, Error::AssemblyLoad { .. }));
        assert_eq!(error.backend(), Some(BackendKind::NetFx));
    }
}
