//! .NET Framework backend, Windows only.
//!
//! The framework is started once per process through `ClrLoader.dll` (see [`api`]). Every
//! [`NetFx`] backend works in its own app-domain: the default domain when no name is given,
//! otherwise a domain created for it and unloaded when the backend is dropped.

pub(crate) mod api;

use std::{
    collections::BTreeMap,
    env,
    ffi::CString,
    path::{Path, PathBuf},
    ptr,
    sync::Arc,
};

use log::{debug, info};

use crate::{
    backend::{
        global::{GlobalRuntime, StartupError},
        Backend, BackendKind, RuntimeInfo,
    },
    config::{xml::check_config_file, NetFxConfig},
    function::{NativeCallable, RawEntryPoint},
    image::probe_assembly,
    native::{path_cstring, utf8_cstring, Handle},
    Result,
};

use api::{LoaderDomain, NetFxApi};

const KIND: BackendKind = BackendKind::NetFx;

const LOADER_NAME: &str = "ClrLoader.dll";

/// Environment variable overriding the loader location.
pub const LOADER_ENV: &str = "CLRLOADER_NETFX_LOADER";

static NETFX: GlobalRuntime<NetFxRuntime> = GlobalRuntime::new(KIND);

#[derive(Debug)]
pub(crate) struct NetFxRuntime {
    api: NetFxApi,
}

impl NetFxRuntime {
    /// Everything before `pyclr_initialize` may be retried.
    fn start(loader: &Path) -> std::result::Result<Self, StartupError> {
        if !cfg!(windows) {
            return Err(init_error!(
                KIND,
                "the .NET Framework is only available on Windows"
            )
            .into());
        }

        let api = NetFxApi::load(loader)?;
        unsafe { (api.pyclr_initialize)() };
        info!(".NET Framework started through {}", api.path().display());
        Ok(NetFxRuntime { api })
    }
}

/// Finds `ClrLoader.dll`: the explicit path, then [`LOADER_ENV`], then next to the current
/// executable (directly or in an `amd64`/`x86` subdirectory).
fn find_loader(explicit: Option<&Path>) -> Result<PathBuf> {
    if let Some(path) = explicit {
        return Ok(path.to_path_buf());
    }
    if let Some(path) = env::var_os(LOADER_ENV).filter(|path| !path.is_empty()) {
        return Ok(PathBuf::from(path));
    }

    let exe_dir = env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(Path::to_path_buf));
    if let Some(dir) = exe_dir {
        let arch_dir = if cfg!(target_pointer_width = "64") {
            "amd64"
        } else {
            "x86"
        };
        for candidate in [dir.join(LOADER_NAME), dir.join(arch_dir).join(LOADER_NAME)] {
            if candidate.is_file() {
                return Ok(candidate);
            }
        }
    }

    Err(init_error!(
        KIND,
        "{} not found; set {} or configure the loader path",
        LOADER_NAME,
        LOADER_ENV
    ))
}

/// An app-domain of the process-wide .NET Framework runtime.
#[derive(Debug)]
pub struct NetFx {
    runtime: Arc<NetFxRuntime>,
    domain: Handle<LoaderDomain>,
    name: Option<String>,
    config_file: Option<PathBuf>,
    supported_runtimes: Vec<String>,
}

impl NetFx {
    /// Starts the .NET Framework (once per process) and creates the configured app-domain.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::RuntimeInitialization`] when not running on Windows, if the
    /// loader cannot be found or loaded, the configuration file is invalid, or the domain
    /// cannot be created.
    pub fn new(config: NetFxConfig) -> Result<Self> {
        let loader = find_loader(config.loader.as_deref())?;
        let runtime = NETFX.get_or_init(|| NetFxRuntime::start(&loader))?;
        if config.loader.is_some() && runtime.api.path() != loader.as_path() {
            return Err(init_error!(
                KIND,
                "the .NET Framework is already running through '{}'",
                runtime.api.path().display()
            ));
        }

        let supported_runtimes = match &config.config_file {
            Some(path) => check_config_file(path, KIND)?.supported_runtimes,
            None => Vec::new(),
        };

        let name_arg: Option<CString> = config
            .name
            .as_deref()
            .map(|name| {
                utf8_cstring(name)
                    .ok_or_else(|| init_error!(KIND, "domain name '{}' contains a NUL", name))
            })
            .transpose()?;
        let config_arg: Option<CString> = config
            .config_file
            .as_deref()
            .map(|path| {
                path_cstring(path)
                    .ok_or_else(|| init_error!(KIND, "'{}' is not a valid path", path.display()))
            })
            .transpose()?;

        let domain = unsafe {
            (runtime.api.pyclr_create_appdomain)(
                name_arg.as_ref().map_or(ptr::null(), |c| c.as_ptr()),
                config_arg.as_ref().map_or(ptr::null(), |c| c.as_ptr()),
            )
        };
        let domain = Handle::new(domain).ok_or_else(|| {
            init_error!(
                KIND,
                "cannot create app-domain '{}'",
                config.name.as_deref().unwrap_or("(default)")
            )
        })?;
        debug!(
            "using app-domain '{}'",
            config.name.as_deref().unwrap_or("(default)")
        );

        Ok(NetFx {
            runtime,
            domain,
            name: config.name,
            config_file: config.config_file,
            supported_runtimes,
        })
    }

    /// Name of the app-domain, `None` for the default domain.
    #[must_use]
    pub fn domain_name(&self) -> Option<&str> {
        self.name.as_deref()
    }
}

impl Backend for NetFx {
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

        let full_path = std::path::absolute(assembly_path)
            .map_err(|e| load_error!(KIND, assembly_path, "cannot resolve path: {}", e))?;
        let path_arg = path_cstring(&full_path).ok_or_else(|| {
            load_error!(KIND, assembly_path, "path is not valid UTF-8 or contains a NUL")
        })?;
        let (Some(type_arg), Some(method_arg)) = (utf8_cstring(type_name), utf8_cstring(method_name))
        else {
            return Err(member_error!(
                KIND,
                assembly_path,
                type_name,
                method_name,
                "name contains a NUL"
            ));
        };

        let function = unsafe {
            (self.runtime.api.pyclr_get_function)(
                self.domain.as_ptr(),
                path_arg.as_ptr(),
                type_arg.as_ptr(),
                method_arg.as_ptr(),
            )
        };

        // SAFETY: the loader only hands out delegates with the buffer signature.
        let entry_point = unsafe { RawEntryPoint::from_raw(function) }.ok_or_else(|| {
            member_error!(
                KIND,
                assembly_path,
                type_name,
                method_name,
                "the loader could not bind a static int (IntPtr, int) method"
            )
        })?;
        Ok(Box::new(entry_point))
    }

    fn info(&self) -> RuntimeInfo {
        let mut properties = BTreeMap::new();
        properties.insert(
            "loader".to_string(),
            self.runtime.api.path().display().to_string(),
        );
        properties.insert(
            "domain".to_string(),
            self.name.clone().unwrap_or_else(|| "(default)".to_string()),
        );
        if let Some(config_file) = &self.config_file {
            properties.insert("config_file".to_string(), config_file.display().to_string());
        }

        RuntimeInfo {
            kind: KIND,
            version: self.supported_runtimes.first().cloned(),
            initialized: true,
            properties,
        }
    }
}

impl Drop for NetFx {
    fn drop(&mut self) {
        if self.name.is_some() {
            debug!("unloading app-domain '{}'", self.name.as_deref().unwrap_or_default());
            unsafe { (self.runtime.api.pyclr_close_appdomain)(self.domain.as_ptr()) };
        }
    }
}
