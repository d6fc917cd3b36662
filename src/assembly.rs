//! Assemblies and function name handling.
//!
//! An [`Assembly`] is nothing more than a path bound to a [`Runtime`]. The backend opens the
//! file on the first resolution and caches whatever it needs. Functions are named either as
//! a type plus a method, or as one joined string like `Namespace.Type.Method` that is split at
//! the last separator.

use std::{
    fmt,
    path::{Path, PathBuf},
};

use crate::{function::ClrFunction, runtime::Runtime, Error, Result};

/// Separator between type and method in joined names.
pub const DEFAULT_SEPARATOR: char = '.';

/// A managed assembly inside a [`Runtime`].
#[derive(Clone)]
pub struct Assembly<'rt> {
    runtime: &'rt Runtime,
    path: PathBuf,
    separator: char,
}

impl<'rt> Assembly<'rt> {
    pub(crate) fn new(runtime: &'rt Runtime, path: &Path) -> Self {
        Assembly {
            runtime,
            path: path.to_path_buf(),
            separator: DEFAULT_SEPARATOR,
        }
    }

    /// Uses `separator` instead of `.` to split joined names.
    #[must_use]
    pub fn with_separator(mut self, separator: char) -> Self {
        self.separator = separator;
        self
    }

    /// Resolves a static `int M(IntPtr buffer, int length)` method.
    ///
    /// With `method` given, `name` is the fully qualified type name (nested types use `+`).
    /// Without, `name` is `Type<sep>Method` and is split at the last separator.
    ///
    /// # Errors
    ///
    /// - [`Error::NameFormat`] if `method` is `None` and `name` cannot be split
    /// - [`Error::AssemblyLoad`] if the assembly cannot be loaded
    /// - [`Error::MemberResolution`] if the type or method is missing or has the wrong shape
    pub fn get_function(&self, name: &str, method: Option<&str>) -> Result<ClrFunction<'rt>> {
        let (type_name, method_name) = match method {
            Some(method) => (name, method),
            None => split_name(name, self.separator)?,
        };
        ClrFunction::new(self.runtime, &self.path, type_name, method_name)
    }

    /// Path of the assembly, as given.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Separator used for joined names.
    #[must_use]
    pub fn separator(&self) -> char {
        self.separator
    }

    /// The runtime this assembly belongs to.
    #[must_use]
    pub fn runtime(&self) -> &'rt Runtime {
        self.runtime
    }
}

impl fmt::Display for Assembly<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<Assembly {} in {}>", self.path.display(), self.runtime)
    }
}

impl fmt::Debug for Assembly<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Assembly")
            .field("backend", &self.runtime.kind())
            .field("path", &self.path)
            .field("separator", &self.separator)
            .finish()
    }
}

/// Splits `Type<sep>Method` at the last `separator`.
///
/// # Errors
///
/// Returns [`Error::NameFormat`] if there is no separator or either half is empty.
///
/// # Examples
///
/// ```rust
/// use clrloader::split_name;
///
/// assert_eq!(split_name("Company.Lib.Echo.Run", '.')?, ("Company.Lib.Echo", "Run"));
/// assert!(split_name("Run", '.').is_err());
/// # Ok::<(), clrloader::Error>(())
/// ```
pub fn split_name(name: &str, separator: char) -> Result<(&str, &str)> {
    match name.rsplit_once(separator) {
        Some((type_name, method_name)) if !type_name.is_empty() && !method_name.is_empty() => {
            Ok((type_name, method_name))
        }
        _ => Err(Error::NameFormat {
            name: name.to_string(),
            separator,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_at_last_separator() {
        assert_eq!(split_name("Lib.Echo.Run", '.').unwrap(), ("Lib.Echo", "Run"));
        assert_eq!(split_name("Echo.Run", '.').unwrap(), ("Echo", "Run"));
        assert_eq!(
            split_name("Lib.Outer+Inner.Run", '.').unwrap(),
            ("Lib.Outer+Inner", "Run")
        );
        assert_eq!(split_name("Lib.Echo::Run", ':').unwrap(), ("Lib.Echo:", "Run"));
        assert_eq!(split_name("Lib.Echo/Run", '/').unwrap(), ("Lib.Echo", "Run"));
    }

    #[test]
    fn split_rejects_malformed_names() {
        for name in ["Run", "", ".Run", "Lib.Echo."] {
            match split_name(name, '.') {
                Err(Error::NameFormat {
                    name: reported,
                    separator,
                }) => {
                    assert_eq!(reported, name);
                    assert_eq!(separator, '.');
                }
                other => panic!("{name:?}: unexpected result {other:?}"),
            }
        }
    }
}
