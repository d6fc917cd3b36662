//! Mono backend, hosted through the Mono embedding API.
//!
//! Mono can be initialized once per process and never shut down. The first [`Mono`] backend
//! starts the JIT with its settings. Later backends share that runtime. They succeed when their
//! settings match and fail with [`crate::Error::RuntimeInitialization`] when they don't.
//! Each backend works in one app-domain (the root domain, or a named domain created on first
//! use and then shared by name) and keeps its own cache of opened assemblies.
//!
//! Methods are found with a `Namespace.Type:Method(intptr,int)` description, must return
//! `int`, and are invoked through `mono_runtime_invoke`. The calling thread is attached to the backend's domain before every
//! call into the runtime.

pub(crate) mod api;

use std::{
    collections::BTreeMap,
    ffi::{c_char, c_void, CString},
    path::{Path, PathBuf},
    ptr,
    sync::Arc,
};

use dashmap::{mapref::entry::Entry, DashMap};
use log::{debug, error, info};

use crate::{
    backend::{
        global::{GlobalRuntime, StartupError},
        Backend, BackendKind, RuntimeInfo,
    },
    config::{xml::check_config_file, GcMode, MonoConfig},
    function::{BufferView, NativeCallable},
    image::probe_assembly,
    locate::find_libmono,
    native::{path_cstring, utf8_cstring, Handle},
    Result,
};

use api::{
    MethodDesc, MonoApi, MonoDomain, MonoImage, MonoMethod, MonoObject, MONO_DEBUG_FORMAT_MONO,
};

const KIND: BackendKind = BackendKind::Mono;

static MONO: GlobalRuntime<MonoRuntime> = GlobalRuntime::new(KIND);

/// The process-wide settings a running Mono cannot change.
#[derive(Debug, Clone, PartialEq, Eq)]
struct MonoSettings {
    path: Option<PathBuf>,
    gc: GcMode,
    global_config_file: Option<PathBuf>,
    jit_options: Vec<String>,
    debug: bool,
}

impl From<&MonoConfig> for MonoSettings {
    fn from(config: &MonoConfig) -> Self {
        MonoSettings {
            path: config.path.clone(),
            gc: config.gc_mode(),
            global_config_file: config.global_config_file.clone(),
            jit_options: config.jit_options.clone(),
            debug: config.debug,
        }
    }
}

impl MonoSettings {
    /// Names of the settings that differ from `other`.
    fn differences(&self, other: &MonoSettings) -> Vec<&'static str> {
        let mut names = Vec::new();
        if self.path != other.path {
            names.push("path");
        }
        if self.gc != other.gc {
            names.push("gc");
        }
        if self.global_config_file != other.global_config_file {
            names.push("global_config_file");
        }
        if self.jit_options != other.jit_options {
            names.push("jit_options");
        }
        if self.debug != other.debug {
            names.push("debug");
        }
        names
    }
}

#[derive(Debug)]
struct AppDomain {
    handle: Handle<MonoDomain>,
    config_file: Option<PathBuf>,
}

/// The single Mono runtime of this process.
#[derive(Debug)]
pub(crate) struct MonoRuntime {
    api: MonoApi,
    settings: MonoSettings,
    root_domain: Handle<MonoDomain>,
    root_config: Option<PathBuf>,
    domains: DashMap<String, AppDomain>,
    version: Option<String>,
}

impl MonoRuntime {
    /// Validates everything `config` names, then loads Mono and starts the JIT.
    ///
    /// Only a failing `mono_jit_init` is fatal. Every earlier error leaves the process free to
    /// try again with different settings.
    fn start(config: &MonoConfig) -> std::result::Result<Self, StartupError> {
        let invalid_path =
            |path: &PathBuf| init_error!(KIND, "'{}' is not a valid path", path.display());

        let dirs = match &config.path {
            Some(lib_dir) => {
                let assembly_dir = path_cstring(lib_dir).ok_or_else(|| invalid_path(lib_dir))?;
                let config_dir = lib_dir
                    .parent()
                    .map(|prefix| prefix.join("etc"))
                    .filter(|etc| etc.is_dir())
                    .and_then(|etc| path_cstring(&etc));
                Some((assembly_dir, config_dir))
            }
            None => None,
        };

        let global_config = match &config.global_config_file {
            Some(path) => {
                check_config_file(path, KIND)?;
                Some(path_cstring(path).ok_or_else(|| invalid_path(path))?)
            }
            None => None,
        };

        let root_config = match (&config.domain, &config.config_file) {
            (None, Some(path)) => {
                check_config_file(path, KIND)?;
                Some(path.clone())
            }
            _ => None,
        };
        let root_config_arg = match &root_config {
            Some(path) => path_cstring(path).ok_or_else(|| invalid_path(path))?,
            None => CString::default(),
        };

        let jit_options = config
            .jit_options
            .iter()
            .map(|option| {
                utf8_cstring(option)
                    .ok_or_else(|| init_error!(KIND, "JIT option '{}' contains a NUL", option))
            })
            .collect::<Result<Vec<CString>>>()?;

        let library = find_libmono(config.path.as_deref(), config.gc_mode())?;
        let api = MonoApi::load(&library)?;

        if let Some((assembly_dir, config_dir)) = &dirs {
            unsafe {
                (api.mono_set_dirs)(
                    assembly_dir.as_ptr(),
                    config_dir.as_ref().map_or(ptr::null(), |dir| dir.as_ptr()),
                );
            }
        }
        unsafe {
            (api.mono_config_parse)(global_config.as_ref().map_or(ptr::null(), |c| c.as_ptr()));
        }
        if !jit_options.is_empty() {
            // Leaked: Mono may keep pointers into the option strings.
            let mut options: Vec<*mut c_char> =
                jit_options.into_iter().map(CString::into_raw).collect();
            unsafe { (api.mono_jit_parse_options)(options.len() as i32, options.as_mut_ptr()) };
        }
        if config.debug {
            unsafe { (api.mono_debug_init)(MONO_DEBUG_FORMAT_MONO) };
        }

        let root_domain = Handle::new(unsafe { (api.mono_jit_init)(c"clrloader".as_ptr()) })
            .ok_or_else(|| StartupError::Fatal(init_error!(KIND, "mono_jit_init failed")))?;

        unsafe {
            (api.mono_domain_set_config)(
                root_domain.as_ptr(),
                c".".as_ptr(),
                root_config_arg.as_ptr(),
            );
        }

        let version = unsafe { api.take_string((api.mono_get_runtime_build_info)()) };
        info!(
            "Mono {} started from {}",
            version.as_deref().unwrap_or("(unknown version)"),
            api.path().display()
        );

        Ok(MonoRuntime {
            api,
            settings: MonoSettings::from(config),
            root_domain,
            root_config,
            domains: DashMap::new(),
            version,
        })
    }

    fn check_settings(&self, config: &MonoConfig) -> Result<()> {
        let differences = self.settings.differences(&MonoSettings::from(config));
        if differences.is_empty() {
            return Ok(());
        }
        Err(init_error!(
            KIND,
            "Mono is already running with different settings ({})",
            differences.join(", ")
        ))
    }

    /// Returns the requested domain, creating a named one on first use.
    fn domain(&self, name: Option<&str>, config_file: Option<&Path>) -> Result<Handle<MonoDomain>> {
        let Some(name) = name else {
            if let Some(requested) = config_file {
                if self.root_config.as_deref() != Some(requested) {
                    return Err(init_error!(
                        KIND,
                        "the root domain is already configured with {:?}",
                        self.root_config
                    ));
                }
            }
            return Ok(self.root_domain);
        };

        match self.domains.entry(name.to_string()) {
            Entry::Occupied(entry) => {
                let domain = entry.get();
                if config_file.is_some() && domain.config_file.as_deref() != config_file {
                    return Err(init_error!(
                        KIND,
                        "domain '{}' already exists with configuration {:?}",
                        name,
                        domain.config_file
                    ));
                }
                Ok(domain.handle)
            }
            Entry::Vacant(entry) => {
                let handle = self.create_domain(name, config_file)?;
                entry.insert(AppDomain {
                    handle,
                    config_file: config_file.map(Path::to_path_buf),
                });
                Ok(handle)
            }
        }
    }

    fn create_domain(&self, name: &str, config_file: Option<&Path>) -> Result<Handle<MonoDomain>> {
        let name_arg = utf8_cstring(name)
            .ok_or_else(|| init_error!(KIND, "domain name '{}' contains a NUL", name))?;
        let config_arg = match config_file {
            Some(path) => {
                check_config_file(path, KIND)?;
                Some(path_cstring(path).ok_or_else(|| {
                    init_error!(KIND, "'{}' is not a valid path", path.display())
                })?)
            }
            None => None,
        };

        let domain = unsafe {
            (self.api.mono_thread_attach)(self.root_domain.as_ptr());
            (self.api.mono_domain_create_appdomain)(
                name_arg.as_ptr() as *mut c_char,
                config_arg
                    .as_ref()
                    .map_or(ptr::null_mut(), |c| c.as_ptr() as *mut c_char),
            )
        };
        let domain = Handle::new(domain)
            .ok_or_else(|| init_error!(KIND, "cannot create domain '{}'", name))?;
        debug!("created Mono domain '{name}'");
        Ok(domain)
    }

    /// `obj.ToString()`, for diagnostics.
    fn object_to_string(&self, object: *mut MonoObject) -> String {
        let mut nested: *mut MonoObject = ptr::null_mut();
        unsafe {
            let string = (self.api.mono_object_to_string)(object, &mut nested);
            if string.is_null() || !nested.is_null() {
                return "(exception while formatting the exception)".to_string();
            }
            self.api
                .take_string((self.api.mono_string_to_utf8)(string))
                .unwrap_or_default()
        }
    }
}

/// A Mono runtime app-domain plus the assemblies opened in it.
#[derive(Debug)]
pub struct Mono {
    runtime: Arc<MonoRuntime>,
    domain: Handle<MonoDomain>,
    domain_name: Option<String>,
    images: DashMap<PathBuf, Handle<MonoImage>>,
}

impl Mono {
    /// Starts Mono (or joins the running instance) and selects the configured domain.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::RuntimeInitialization`] if the library cannot be found or
    /// loaded, a configuration file is invalid, Mono is already running with different
    /// settings, or the domain cannot be created.
    pub fn new(config: MonoConfig) -> Result<Self> {
        let runtime = MONO.get_or_init(|| MonoRuntime::start(&config))?;
        runtime.check_settings(&config)?;
        let domain = runtime.domain(config.domain.as_deref(), config.config_file.as_deref())?;

        Ok(Mono {
            runtime,
            domain,
            domain_name: config.domain,
            images: DashMap::new(),
        })
    }

    /// Name of the app-domain, `None` for the root domain.
    #[must_use]
    pub fn domain_name(&self) -> Option<&str> {
        self.domain_name.as_deref()
    }

    fn attach(&self) {
        unsafe { (self.runtime.api.mono_thread_attach)(self.domain.as_ptr()) };
    }

    fn image(&self, assembly_path: &Path) -> Result<Handle<MonoImage>> {
        let full_path = std::path::absolute(assembly_path)
            .map_err(|e| load_error!(KIND, assembly_path, "cannot resolve path: {}", e))?;
        if let Some(image) = self.images.get(&full_path) {
            return Ok(*image);
        }

        let api = &self.runtime.api;
        let path_arg = path_cstring(&full_path).ok_or_else(|| {
            load_error!(KIND, assembly_path, "path is not valid UTF-8 or contains a NUL")
        })?;
        let assembly = Handle::new(unsafe {
            (api.mono_domain_assembly_open)(self.domain.as_ptr(), path_arg.as_ptr())
        })
        .ok_or_else(|| load_error!(KIND, assembly_path, "Mono could not open the assembly"))?;
        let image = Handle::new(unsafe { (api.mono_assembly_get_image)(assembly.as_ptr()) })
            .ok_or_else(|| load_error!(KIND, assembly_path, "assembly has no image"))?;

        debug!("opened {} in Mono", full_path.display());
        self.images.insert(full_path, image);
        Ok(image)
    }

    fn class_exists(&self, image: Handle<MonoImage>, type_name: &str) -> bool {
        let (namespace, name) = class_lookup_name(type_name);
        let (Some(namespace), Some(name)) = (utf8_cstring(namespace), utf8_cstring(name)) else {
            return false;
        };
        let class = unsafe {
            (self.runtime.api.mono_class_from_name)(image.as_ptr(), namespace.as_ptr(), name.as_ptr())
        };
        !class.is_null()
    }
}

impl Backend for Mono {
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
        self.attach();
        let image = self.image(assembly_path)?;

        let search = |parameters: &str| -> Result<Option<Handle<MonoMethod>>> {
            let description = utf8_cstring(&method_description(type_name, method_name, parameters))
                .ok_or_else(|| {
                    member_error!(KIND, assembly_path, type_name, method_name, "name contains a NUL")
                })?;
            let desc = MethodDesc::new(&self.runtime.api, &description).ok_or_else(|| {
                member_error!(
                    KIND,
                    assembly_path,
                    type_name,
                    method_name,
                    "not a valid method description"
                )
            })?;
            Ok(Handle::new(desc.search(image.as_ptr())))
        };

        let Some(method) = search(BUFFER_PARAMETERS)? else {
            let reason = if search("")?.is_some() {
                "signature mismatch"
            } else if self.class_exists(image, type_name) {
                "method not found"
            } else {
                "type not found"
            };
            return Err(member_error!(KIND, assembly_path, type_name, method_name, reason));
        };
        if !self.runtime.api.returns_int32(method.as_ptr()) {
            return Err(member_error!(
                KIND,
                assembly_path,
                type_name,
                method_name,
                "signature mismatch"
            ));
        }

        Ok(Box::new(MonoEntryPoint {
            runtime: Arc::clone(&self.runtime),
            domain: self.domain,
            method,
            name: format!("{type_name}.{method_name}"),
        }))
    }

    fn info(&self) -> RuntimeInfo {
        let runtime = &self.runtime;
        let mut properties = BTreeMap::new();
        properties.insert("library".to_string(), runtime.api.path().display().to_string());
        properties.insert("gc".to_string(), runtime.settings.gc.to_string());
        properties.insert(
            "domain".to_string(),
            self.domain_name.clone().unwrap_or_else(|| "(root)".to_string()),
        );
        properties.insert(
            "assemblies".to_string(),
            self.images.len().to_string(),
        );

        RuntimeInfo {
            kind: KIND,
            version: runtime.version.clone(),
            initialized: true,
            properties,
        }
    }
}

/// A Mono method with the buffer signature, invoked through `mono_runtime_invoke`.
#[derive(Debug)]
struct MonoEntryPoint {
    runtime: Arc<MonoRuntime>,
    domain: Handle<MonoDomain>,
    method: Handle<MonoMethod>,
    name: String,
}

impl NativeCallable for MonoEntryPoint {
    unsafe fn call(&self, buffer: BufferView<'_>) -> i32 {
        let api = &self.runtime.api;
        let mut pointer = buffer.as_ptr();
        let mut length = buffer.len();
        let mut params: [*mut c_void; 2] = [
            (&mut pointer as *mut *mut c_void).cast(),
            (&mut length as *mut i32).cast(),
        ];
        let mut exception: *mut MonoObject = ptr::null_mut();

        let result = unsafe {
            (api.mono_thread_attach)(self.domain.as_ptr());
            (api.mono_runtime_invoke)(
                self.method.as_ptr(),
                ptr::null_mut(),
                params.as_mut_ptr(),
                &mut exception,
            )
        };

        // The convention has no error channel; the process cannot continue in a defined state.
        if !exception.is_null() {
            error!(
                "unhandled managed exception in {}: {}",
                self.name,
                self.runtime.object_to_string(exception)
            );
            std::process::abort();
        }
        if result.is_null() {
            error!("{} returned no value", self.name);
            std::process::abort();
        }

        unsafe { *(api.mono_object_unbox)(result).cast::<i32>() }
    }

    fn address(&self) -> usize {
        self.method.as_ptr() as usize
    }
}

/// Parameter list of the buffer entry point, in `mono_method_desc_new` syntax.
const BUFFER_PARAMETERS: &str = "(intptr,int)";

/// `Namespace.Outer/Inner:Method(parameters)`, as understood by `mono_method_desc_new`.
/// An empty `parameters` matches any overload.
fn method_description(type_name: &str, method_name: &str, parameters: &str) -> String {
    format!("{}:{}{}", type_name.replace('+', "/"), method_name, parameters)
}

/// Namespace and name of the outermost class of `type_name`.
fn class_lookup_name(type_name: &str) -> (&str, &str) {
    let outer = type_name.split('+').next().unwrap_or(type_name);
    outer.rsplit_once('.').unwrap_or(("", outer))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;

    #[test]
    fn descriptions() {
        assert_eq!(
            method_description("Lib.Echo", "Run", BUFFER_PARAMETERS),
            "Lib.Echo:Run(intptr,int)"
        );
        assert_eq!(
            method_description("Company.Lib.Outer+Inner", "Run", BUFFER_PARAMETERS),
            "Company.Lib.Outer/Inner:Run(intptr,int)"
        );
        assert_eq!(
            method_description("Global", "Run", BUFFER_PARAMETERS),
            "Global:Run(intptr,int)"
        );
        assert_eq!(method_description("Lib.Echo", "Run", ""), "Lib.Echo:Run");
    }

    #[test]
    fn class_lookup() {
        assert_eq!(class_lookup_name("Company.Lib.Echo"), ("Company.Lib", "Echo"));
        assert_eq!(class_lookup_name("Company.Outer+Inner"), ("Company", "Outer"));
        assert_eq!(class_lookup_name("Echo"), ("", "Echo"));
    }

    #[test]
    fn failed_start_is_retried_with_new_settings() {
        let first = Mono::new(MonoConfig::new().path("/nonexistent/clrloader-mono"));
        assert!(matches!(first, Err(Error::RuntimeInitialization { .. })));

        let dir = tempfile::tempdir().unwrap();
        match Mono::new(MonoConfig::new().path(dir.path())) {
            Err(Error::RuntimeInitialization { backend, message }) => {
                assert_eq!(backend, KIND);
                assert!(
                    message.contains(&dir.path().display().to_string()),
                    "{message}"
                );
                assert!(!message.contains("earlier initialization"), "{message}");
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn invalid_root_config_reported_before_loading() {
        let dir = tempfile::tempdir().unwrap();
        let config_file = dir.path().join("Lib.dll.config");
        std::fs::write(&config_file, "<settings/>").unwrap();

        let config = MonoConfig::new().path(dir.path()).config_file(&config_file);
        match Mono::new(config) {
            Err(Error::RuntimeInitialization { message, .. }) => {
                assert!(message.contains("<settings>"), "{message}");
                assert!(!message.contains("libmono"), "{message}");
                assert!(!message.contains("does not contain"), "{message}");
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn settings_differences() {
        let base = MonoSettings::from(&MonoConfig::new());
        assert!(base.differences(&base.clone()).is_empty());

        let other = MonoSettings::from(
            &MonoConfig::new()
                .gc(GcMode::Boehm)
                .jit_option("--debug")
                .domain("ignored"),
        );
        assert_eq!(base.differences(&other), vec!["gc", "jit_options"]);

        let explicit_default = MonoSettings::from(&MonoConfig::new().gc(GcMode::Sgen));
        assert!(base.differences(&explicit_default).is_empty());
    }
}
