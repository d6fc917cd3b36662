//! The [`Runtime`] handle and its constructors.

use std::{fmt, path::Path};

use log::debug;

use crate::{
    assembly::Assembly,
    backend::{coreclr::CoreClr, mono::Mono, netfx::NetFx, Backend, BackendKind, RuntimeInfo},
    config::{CoreClrConfig, MonoConfig, NetFxConfig, RuntimeOptions},
    Result,
};

/// An initialized managed runtime.
///
/// A `Runtime` owns exactly one backend. Assemblies and functions obtained from it borrow it,
/// so the compiler guarantees that nothing resolved through a runtime is used after the
/// runtime is dropped. A `Runtime` is `Send + Sync`; resolution and invocation may run on
/// several threads at once.
///
/// # Examples
///
/// ```rust,no_run
/// use clrloader::{MonoConfig, Runtime};
///
/// let runtime = Runtime::new(MonoConfig::new().domain("plugins"))?;
/// let assembly = runtime.get_assembly("Plugin.dll");
/// let handler = assembly.get_function("Plugin.Entry.Handle", None)?;
///
/// let mut request = br#"{"op":"ping"}"#.to_vec();
/// let status = handler.invoke(&mut request);
/// # let _ = status;
/// # Ok::<(), clrloader::Error>(())
/// ```
pub struct Runtime {
    backend: Box<dyn Backend>,
}

impl Runtime {
    /// Starts the runtime selected by `options`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::RuntimeInitialization`] if the backend cannot be brought up.
    pub fn new(options: impl Into<RuntimeOptions>) -> Result<Self> {
        let options = options.into();
        debug!("creating {} runtime", options.kind());

        Ok(match options {
            RuntimeOptions::Mono(config) => Self::from_backend(Mono::new(config)?),
            RuntimeOptions::CoreClr(config) => Self::from_backend(CoreClr::new(config)?),
            RuntimeOptions::NetFx(config) => Self::from_backend(NetFx::new(config)?),
        })
    }

    /// Wraps an already constructed backend.
    pub fn from_backend(backend: impl Backend + 'static) -> Self {
        Runtime {
            backend: Box::new(backend),
        }
    }

    /// Refers to the assembly at `path` in this runtime.
    ///
    /// Nothing is loaded yet; the assembly is opened when the first function is resolved.
    pub fn get_assembly(&self, path: impl AsRef<Path>) -> Assembly<'_> {
        Assembly::new(self, path.as_ref())
    }

    /// The backend kind of this runtime.
    #[must_use]
    pub fn kind(&self) -> BackendKind {
        self.backend.kind()
    }

    /// Describes the runtime: version, state and properties.
    #[must_use]
    pub fn info(&self) -> RuntimeInfo {
        self.backend.info()
    }

    pub(crate) fn backend(&self) -> &dyn Backend {
        self.backend.as_ref()
    }
}

impl fmt::Display for Runtime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<Runtime {}>", self.kind())
    }
}

impl fmt::Debug for Runtime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Runtime")
            .field("backend", &self.backend)
            .finish()
    }
}

/// Starts (or joins) the process-wide Mono runtime.
///
/// # Errors
///
/// See [`Mono::new`].
pub fn get_mono(config: MonoConfig) -> Result<Runtime> {
    Runtime::new(config)
}

/// Creates a .NET (Core) host context through `hostfxr`.
///
/// # Errors
///
/// See [`CoreClr::new`].
pub fn get_coreclr(config: CoreClrConfig) -> Result<Runtime> {
    Runtime::new(config)
}

/// Starts (or joins) the .NET Framework and creates the configured app-domain.
///
/// # Errors
///
/// See [`NetFx::new`].
pub fn get_netfx(config: NetFxConfig) -> Result<Runtime> {
    Runtime::new(config)
}
