//! The subset of the `hostfxr` C interface the CoreCLR backend uses.

use std::{
    cell::RefCell,
    collections::BTreeMap,
    ffi::c_void,
    mem::ManuallyDrop,
    path::Path,
    ptr,
};

use log::{debug, trace};

use crate::{
    backend::BackendKind,
    locate::find_hostfxr,
    native::{pdstr_to_string, Handle, NativeLibrary, PdChar, PdCString},
    Result,
};

use super::status::{describe, succeeded, StatusCode};

/// Opaque `hostfxr_handle`.
#[repr(C)]
pub(crate) struct HostContext {
    _private: [u8; 0],
}

/// `struct hostfxr_initialize_parameters`
#[repr(C)]
pub(crate) struct InitializeParameters {
    pub size: usize,
    pub host_path: *const PdChar,
    pub dotnet_root: *const PdChar,
}

/// `hdt_load_assembly_and_get_function_pointer` from `enum hostfxr_delegate_type`
pub(crate) const HDT_LOAD_ASSEMBLY_AND_GET_FUNCTION_POINTER: i32 = 5;

/// `load_assembly_and_get_function_pointer_fn`
///
/// Arguments: assembly path, `"Type, Assembly"` name, method name, delegate type name (null
/// selects `ComponentEntryPoint`), reserved, out function pointer.
pub(crate) type LoadAssemblyAndGetFunctionPointerFn = unsafe extern "system" fn(
    *const PdChar,
    *const PdChar,
    *const PdChar,
    *const PdChar,
    *mut c_void,
    *mut *mut c_void,
) -> i32;

type ErrorWriterFn = unsafe extern "C" fn(*const PdChar);

thread_local! {
    static HOST_MESSAGES: RefCell<Vec<String>> = const { RefCell::new(Vec::new()) };
}

unsafe extern "C" fn capture_host_message(message: *const PdChar) {
    if let Some(message) = unsafe { pdstr_to_string(message) } {
        trace!("hostfxr: {message}");
        HOST_MESSAGES.with(|messages| messages.borrow_mut().push(message));
    }
}

/// Function table over a loaded `hostfxr` library.
#[derive(Debug)]
pub(crate) struct HostFxrApi {
    hostfxr_initialize_for_runtime_config:
        unsafe extern "C" fn(*const PdChar, *const InitializeParameters, *mut *mut HostContext) -> i32,
    hostfxr_get_runtime_delegate: unsafe extern "C" fn(*mut HostContext, i32, *mut *mut c_void) -> i32,
    hostfxr_set_runtime_property_value:
        unsafe extern "C" fn(*mut HostContext, *const PdChar, *const PdChar) -> i32,
    hostfxr_get_runtime_properties: unsafe extern "C" fn(
        *mut HostContext,
        *mut usize,
        *mut *const PdChar,
        *mut *const PdChar,
    ) -> i32,
    hostfxr_set_error_writer: unsafe extern "C" fn(Option<ErrorWriterFn>) -> Option<ErrorWriterFn>,
    hostfxr_close: unsafe extern "C" fn(*mut HostContext) -> i32,
    // Never unloaded: hostfxr tracks the process' single runtime in its globals.
    library: ManuallyDrop<NativeLibrary>,
}

impl HostFxrApi {
    /// Loads the newest usable `hostfxr` below `dotnet_root`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::RuntimeInitialization`] if no candidate can be loaded.
    pub(crate) fn load(dotnet_root: &Path) -> Result<Self> {
        let mut failures = Vec::new();
        for candidate in find_hostfxr(dotnet_root)? {
            match Self::open(&candidate) {
                Ok(api) => return Ok(api),
                Err(error) => {
                    debug!("skipping {}: {}", candidate.display(), error);
                    failures.push(error.to_string());
                }
            }
        }

        Err(init_error!(
            BackendKind::CoreClr,
            "no usable hostfxr below '{}': {}",
            dotnet_root.display(),
            failures.join("; ")
        ))
    }

    fn open(path: &Path) -> Result<Self> {
        let library = NativeLibrary::open(path, BackendKind::CoreClr)?;
        Ok(HostFxrApi {
            hostfxr_initialize_for_runtime_config: symbol!(library, hostfxr_initialize_for_runtime_config),
            hostfxr_get_runtime_delegate: symbol!(library, hostfxr_get_runtime_delegate),
            hostfxr_set_runtime_property_value: symbol!(library, hostfxr_set_runtime_property_value),
            hostfxr_get_runtime_properties: symbol!(library, hostfxr_get_runtime_properties),
            hostfxr_set_error_writer: symbol!(library, hostfxr_set_error_writer),
            hostfxr_close: symbol!(library, hostfxr_close),
            library: ManuallyDrop::new(library),
        })
    }

    /// Location of the loaded library.
    pub(crate) fn path(&self) -> &Path {
        self.library.path()
    }

    /// Runs `f` with the host's error writer redirected into a buffer on this thread.
    ///
    /// The writer is per-thread in `hostfxr`, so concurrent callers do not see each other's
    /// messages.
    pub(crate) fn capture<R>(&self, f: impl FnOnce() -> R) -> (R, Vec<String>) {
        HOST_MESSAGES.with(|messages| messages.borrow_mut().clear());

        // SAFETY: the writer is a plain function that outlives the library.
        let previous = unsafe { (self.hostfxr_set_error_writer)(Some(capture_host_message)) };
        let result = f();
        unsafe { (self.hostfxr_set_error_writer)(previous) };

        let messages = HOST_MESSAGES.with(|messages| std::mem::take(&mut *messages.borrow_mut()));
        (result, messages)
    }

    /// `hostfxr_initialize_for_runtime_config`
    pub(crate) fn initialize(
        &self,
        runtime_config: &Path,
        dotnet_root: &Path,
    ) -> Result<Handle<HostContext>> {
        let config_arg = PdCString::from_os_str(runtime_config.as_os_str()).ok_or_else(|| {
            init_error!(BackendKind::CoreClr, "runtime config path contains a NUL character")
        })?;
        let root_arg = PdCString::from_os_str(dotnet_root.as_os_str()).ok_or_else(|| {
            init_error!(BackendKind::CoreClr, "dotnet root contains a NUL character")
        })?;

        let parameters = InitializeParameters {
            size: std::mem::size_of::<InitializeParameters>(),
            host_path: ptr::null(),
            dotnet_root: root_arg.as_ptr(),
        };
        let mut context = ptr::null_mut();

        let (code, messages) = self.capture(|| unsafe {
            (self.hostfxr_initialize_for_runtime_config)(
                config_arg.as_ptr(),
                &parameters,
                &mut context,
            )
        });

        if !succeeded(code) {
            if let Some(context) = Handle::new(context) {
                self.close(context);
            }
            return Err(init_error!(
                BackendKind::CoreClr,
                "hostfxr_initialize_for_runtime_config failed for '{}': {}{}",
                runtime_config.display(),
                describe(code),
                format_messages(&messages)
            ));
        }

        match StatusCode::from_repr(code as u32) {
            Some(StatusCode::SuccessHostAlreadyInitialized) => {
                debug!("hostfxr: joining the runtime already running in this process");
            }
            Some(StatusCode::SuccessDifferentRuntimeProperties) => log::warn!(
                "hostfxr: runtime already running with different properties than '{}'",
                runtime_config.display()
            ),
            _ => {}
        }

        Handle::new(context).ok_or_else(|| {
            init_error!(
                BackendKind::CoreClr,
                "hostfxr_initialize_for_runtime_config returned no host context"
            )
        })
    }

    /// `hostfxr_set_runtime_property_value`
    pub(crate) fn set_property(
        &self,
        context: Handle<HostContext>,
        key: &str,
        value: &str,
    ) -> Result<()> {
        let (Some(key_arg), Some(value_arg)) = (PdCString::from_str(key), PdCString::from_str(value))
        else {
            return Err(init_error!(
                BackendKind::CoreClr,
                "runtime property '{}' contains a NUL character",
                key
            ));
        };

        let (code, messages) = self.capture(|| unsafe {
            (self.hostfxr_set_runtime_property_value)(
                context.as_ptr(),
                key_arg.as_ptr(),
                value_arg.as_ptr(),
            )
        });
        if !succeeded(code) {
            return Err(init_error!(
                BackendKind::CoreClr,
                "cannot set runtime property '{}': {}{}",
                key,
                describe(code),
                format_messages(&messages)
            ));
        }
        Ok(())
    }

    /// `hostfxr_get_runtime_properties`, copied into owned strings.
    pub(crate) fn properties(&self, context: Handle<HostContext>) -> Result<BTreeMap<String, String>> {
        let mut count = 0usize;
        let code = unsafe {
            (self.hostfxr_get_runtime_properties)(
                context.as_ptr(),
                &mut count,
                ptr::null_mut(),
                ptr::null_mut(),
            )
        };
        if code != StatusCode::HostApiBufferTooSmall as u32 as i32 && !succeeded(code) {
            return Err(init_error!(
                BackendKind::CoreClr,
                "cannot read runtime properties: {}",
                describe(code)
            ));
        }

        let mut keys = vec![ptr::null::<PdChar>(); count];
        let mut values = vec![ptr::null::<PdChar>(); count];
        let code = unsafe {
            (self.hostfxr_get_runtime_properties)(
                context.as_ptr(),
                &mut count,
                keys.as_mut_ptr(),
                values.as_mut_ptr(),
            )
        };
        if !succeeded(code) {
            return Err(init_error!(
                BackendKind::CoreClr,
                "cannot read runtime properties: {}",
                describe(code)
            ));
        }

        let mut properties = BTreeMap::new();
        for (key, value) in keys.into_iter().zip(values).take(count) {
            // SAFETY: both arrays were filled by hostfxr and stay valid while the context lives.
            if let Some(key) = unsafe { pdstr_to_string(key) } {
                let value = unsafe { pdstr_to_string(value) }.unwrap_or_default();
                properties.insert(key, value);
            }
        }
        Ok(properties)
    }

    /// `hostfxr_get_runtime_delegate` for the load-and-get-function-pointer delegate.
    ///
    /// The first call on a context starts the runtime.
    pub(crate) fn load_assembly_delegate(
        &self,
        context: Handle<HostContext>,
    ) -> Result<LoadAssemblyAndGetFunctionPointerFn> {
        let mut delegate = ptr::null_mut();
        let (code, messages) = self.capture(|| unsafe {
            (self.hostfxr_get_runtime_delegate)(
                context.as_ptr(),
                HDT_LOAD_ASSEMBLY_AND_GET_FUNCTION_POINTER,
                &mut delegate,
            )
        });

        if !succeeded(code) || delegate.is_null() {
            return Err(init_error!(
                BackendKind::CoreClr,
                "cannot start the runtime: {}{}",
                describe(code),
                format_messages(&messages)
            ));
        }

        // SAFETY: hostfxr hands out this exact signature for the requested delegate type.
        Ok(unsafe {
            std::mem::transmute::<*mut c_void, LoadAssemblyAndGetFunctionPointerFn>(delegate)
        })
    }

    /// `hostfxr_close`
    pub(crate) fn close(&self, context: Handle<HostContext>) {
        let code = unsafe { (self.hostfxr_close)(context.as_ptr()) };
        if !succeeded(code) {
            log::warn!("hostfxr_close failed: {}", describe(code));
        }
    }
}

/// Renders captured host messages as a suffix for error texts.
pub(crate) fn format_messages(messages: &[String]) -> String {
    if messages.is_empty() {
        String::new()
    } else {
        format!(" ({})", messages.join("; "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_suffix() {
        assert_eq!(format_messages(&[]), "");
        assert_eq!(
            format_messages(&["first".to_string(), "second".to_string()]),
            " (first; second)"
        );
    }

    #[test]
    fn parameters_layout() {
        assert_eq!(
            std::mem::size_of::<InitializeParameters>(),
            3 * std::mem::size_of::<usize>()
        );
    }

    #[test]
    fn load_without_hostfxr() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            HostFxrApi::load(dir.path()),
            Err(crate::Error::RuntimeInitialization {
                backend: BackendKind::CoreClr,
                ..
            })
        ));
    }
}
