//! .NET (Core) backend, hosted through `hostfxr`.
//!
//! Each [`CoreClr`] owns one `hostfxr` host context created from a `*.runtimeconfig.json`.
//! Runtime properties can be changed until the first resolution, which fetches the
//! `load_assembly_and_get_function_pointer` delegate and thereby starts the runtime. Methods
//! are bound with the default `ComponentEntryPoint` delegate type, i.e.
//! `int M(IntPtr buffer, int length)`.
//!
//! `hostfxr` allows a single runtime per process. A second backend whose configuration is
//! compatible with the running one joins it; an incompatible one fails during construction.

pub(crate) mod api;
pub mod status;

use std::{
    collections::BTreeMap,
    fmt,
    path::{Path, PathBuf},
    ptr,
    sync::Mutex,
};

use log::{debug, info};
use tempfile::TempDir;

use crate::{
    backend::{Backend, BackendKind, RuntimeInfo},
    config::{CoreClrConfig, RuntimeConfigFile, RuntimeConfigSource},
    function::{NativeCallable, RawEntryPoint},
    image::probe_assembly,
    locate::find_dotnet_root,
    native::{Handle, PdCString},
    Result,
};

use api::{format_messages, HostContext, HostFxrApi, LoadAssemblyAndGetFunctionPointerFn};
use status::{classify, describe, succeeded, ResolutionFailure};

const KIND: BackendKind = BackendKind::CoreClr;

/// A `hostfxr` host context and the runtime it starts.
pub struct CoreClr {
    api: HostFxrApi,
    context: Handle<HostContext>,
    dotnet_root: PathBuf,
    runtime_config: PathBuf,
    framework_version: Option<String>,
    load_assembly: Mutex<Option<LoadAssemblyAndGetFunctionPointerFn>>,
    // Keeps a generated runtime configuration alive for the lifetime of the context.
    _generated: Option<TempDir>,
}

impl CoreClr {
    /// Loads `hostfxr`, creates a host context for the configured runtime and applies the
    /// configured properties. The runtime itself starts on first resolution.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::RuntimeInitialization`] if no .NET installation or `hostfxr` is
    /// found, the runtime configuration is missing or rejected, or a property cannot be set.
    pub fn new(config: CoreClrConfig) -> Result<Self> {
        let (runtime_config, generated, spec_root) = match config.runtime_config {
            RuntimeConfigSource::File(path) => {
                if !path.is_file() {
                    return Err(init_error!(
                        KIND,
                        "runtime config '{}' does not exist",
                        path.display()
                    ));
                }
                (path, None, None)
            }
            RuntimeConfigSource::Spec(spec) => {
                let dir = tempfile::Builder::new()
                    .prefix("clrloader-")
                    .tempdir()
                    .map_err(|e| init_error!(KIND, "cannot create a temporary directory: {}", e))?;
                let path = dir.path().join("clrloader.runtimeconfig.json");
                spec.runtime_config()
                    .write_to(&path)
                    .map_err(|e| init_error!(KIND, "cannot write '{}': {}", path.display(), e))?;
                debug!("generated {} for {}", path.display(), spec);
                (path, Some(dir), spec.dotnet_root().map(Path::to_path_buf))
            }
        };

        let dotnet_root = match config.dotnet_root.or(spec_root) {
            Some(root) => root,
            None => find_dotnet_root()?,
        };

        let framework_version = match RuntimeConfigFile::from_file(&runtime_config) {
            Ok(file) => file.framework_version().map(str::to_string),
            Err(error) => {
                debug!("cannot read '{}': {}", runtime_config.display(), error);
                None
            }
        };

        let api = HostFxrApi::load(&dotnet_root)?;
        debug!("using {}", api.path().display());
        let context = api.initialize(&runtime_config, &dotnet_root)?;

        let backend = CoreClr {
            api,
            context,
            dotnet_root,
            runtime_config,
            framework_version,
            load_assembly: Mutex::new(None),
            _generated: generated,
        };

        for (key, value) in &config.properties {
            backend.api.set_property(backend.context, key, value)?;
        }

        info!(
            "CoreCLR host context ready for '{}' (framework {})",
            backend.runtime_config.display(),
            backend.framework_version.as_deref().unwrap_or("unknown")
        );
        Ok(backend)
    }

    /// Root of the .NET installation in use.
    #[must_use]
    pub fn dotnet_root(&self) -> &Path {
        &self.dotnet_root
    }

    /// The runtime configuration the host context was created from.
    #[must_use]
    pub fn runtime_config(&self) -> &Path {
        &self.runtime_config
    }

    /// Sets a runtime property. Only possible before the runtime has started.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::RuntimeInitialization`] if the runtime is already running or
    /// `hostfxr` rejects the property.
    pub fn set_property(&self, key: &str, value: &str) -> Result<()> {
        if lock!(self.load_assembly).is_some() {
            return Err(init_error!(
                KIND,
                "cannot set runtime property '{}': the runtime is already running",
                key
            ));
        }
        self.api.set_property(self.context, key, value)
    }

    /// Current runtime properties of the host context.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::RuntimeInitialization`] if `hostfxr` fails to report them.
    pub fn properties(&self) -> Result<BTreeMap<String, String>> {
        self.api.properties(self.context)
    }

    fn load_assembly_fn(&self) -> Result<LoadAssemblyAndGetFunctionPointerFn> {
        let mut slot = lock!(self.load_assembly);
        if let Some(function) = *slot {
            return Ok(function);
        }

        let function = self.api.load_assembly_delegate(self.context)?;
        info!(
            "CoreCLR runtime started from {}",
            self.dotnet_root.display()
        );
        *slot = Some(function);
        Ok(function)
    }
}

impl Backend for CoreClr {
    fn kind(&self) -> BackendKind {
        KIND
    }

    fn resolve_callable(
        &self,
        assembly_path: &Path,
        type_name: &str,
        method_name: &str,
    ) -> Result<Box<dyn NativeCallable>> {
        probe_assembly(assembly_path, KIND)?;
        let load_assembly = self.load_assembly_fn()?;

        let full_path = std::path::absolute(assembly_path)
            .map_err(|e| load_error!(KIND, assembly_path, "cannot resolve path: {}", e))?;
        let assembly_name = full_path
            .file_stem()
            .and_then(|stem| stem.to_str())
            .ok_or_else(|| load_error!(KIND, assembly_path, "path has no valid file name"))?;
        let qualified_type = format!("{type_name}, {assembly_name}");

        let path_arg = PdCString::from_os_str(full_path.as_os_str())
            .ok_or_else(|| load_error!(KIND, assembly_path, "path contains a NUL character"))?;
        let (Some(type_arg), Some(method_arg)) = (
            PdCString::from_str(&qualified_type),
            PdCString::from_str(method_name),
        ) else {
            return Err(member_error!(
                KIND,
                assembly_path,
                type_name,
                method_name,
                "name contains a NUL character"
            ));
        };

        let mut function = ptr::null_mut();
        let (code, messages) = self.api.capture(|| unsafe {
            load_assembly(
                path_arg.as_ptr(),
                type_arg.as_ptr(),
                method_arg.as_ptr(),
                ptr::null(),
                ptr::null_mut(),
                &mut function,
            )
        });

        if !succeeded(code) {
            let reason = format!("{}{}", describe(code), format_messages(&messages));
            return Err(match classify(code) {
                ResolutionFailure::AssemblyLoad => load_error!(KIND, assembly_path, reason),
                ResolutionFailure::MemberResolution => {
                    member_error!(KIND, assembly_path, type_name, method_name, reason)
                }
            });
        }

        // SAFETY: the delegate was bound with the ComponentEntryPoint signature.
        let entry_point = unsafe { RawEntryPoint::from_raw(function) }.ok_or_else(|| {
            member_error!(
                KIND,
                assembly_path,
                type_name,
                method_name,
                "hostfxr returned a null function pointer"
            )
        })?;

        debug!(
            "resolved {type_name}.{method_name} in {} at {:#x}",
            full_path.display(),
            entry_point.address()
        );
        Ok(Box::new(entry_point))
    }

    fn info(&self) -> RuntimeInfo {
        let initialized = self
            .load_assembly
            .lock()
            .map(|slot| slot.is_some())
            .unwrap_or(false);
        let properties = self.properties().unwrap_or_else(|error| {
            debug!("cannot read runtime properties: {error}");
            BTreeMap::new()
        });

        RuntimeInfo {
            kind: KIND,
            version: self.framework_version.clone(),
            initialized,
            properties,
        }
    }
}

impl Drop for CoreClr {
    fn drop(&mut self) {
        // Entry points handed out earlier stay valid: closing the context does not unload the
        // runtime.
        self.api.close(self.context);
    }
}

impl fmt::Debug for CoreClr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CoreClr")
            .field("hostfxr", &self.api.path())
            .field("dotnet_root", &self.dotnet_root)
            .field("runtime_config", &self.runtime_config)
            .field("framework_version", &self.framework_version)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;

    #[test]
    fn missing_runtime_config() {
        let config = CoreClrConfig::new("/nonexistent/Lib.runtimeconfig.json");
        match CoreClr::new(config) {
            Err(Error::RuntimeInitialization { backend, message }) => {
                assert_eq!(backend, BackendKind::CoreClr);
                assert!(message.contains("does not exist"));
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn root_without_hostfxr() {
        let dir = tempfile::tempdir().unwrap();
        let runtime_config = dir.path().join("Lib.runtimeconfig.json");
        std::fs::write(
            &runtime_config,
            r#"{"runtimeOptions":{"framework":{"name":"Microsoft.NETCore.App","version":"8.0.0"}}}"#,
        )
        .unwrap();

        let config = CoreClrConfig::new(&runtime_config).dotnet_root(dir.path());
        assert!(matches!(
            CoreClr::new(config),
            Err(Error::RuntimeInitialization {
                backend: BackendKind::CoreClr,
                ..
            })
        ));
    }
}
