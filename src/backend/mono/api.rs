//! The subset of the Mono embedding API the Mono backend uses.

use std::{
    ffi::{c_char, c_int, c_void},
    path::Path,
};

use crate::{backend::BackendKind, native::NativeLibrary, Result};

macro_rules! opaque {
    ($($name:ident),* $(,)?) => {
        $(
            #[repr(C)]
            pub(crate) struct $name {
                _private: [u8; 0],
            }
        )*
    };
}

opaque!(
    MonoDomain,
    MonoAssembly,
    MonoImage,
    MonoClass,
    MonoMethod,
    MonoMethodDesc,
    MonoMethodSignature,
    MonoType,
    MonoObject,
    MonoString,
    MonoThread,
);

/// `MONO_DEBUG_FORMAT_MONO`
pub(crate) const MONO_DEBUG_FORMAT_MONO: c_int = 1;

/// `MONO_TYPE_I4`, the type code of `System.Int32`.
pub(crate) const MONO_TYPE_I4: c_int = 0x08;

/// Function table over a loaded Mono runtime library.
#[derive(Debug)]
pub(crate) struct MonoApi {
    pub mono_set_dirs: unsafe extern "C" fn(*const c_char, *const c_char),
    pub mono_config_parse: unsafe extern "C" fn(*const c_char),
    pub mono_jit_parse_options: unsafe extern "C" fn(c_int, *mut *mut c_char),
    pub mono_debug_init: unsafe extern "C" fn(c_int),
    pub mono_jit_init: unsafe extern "C" fn(*const c_char) -> *mut MonoDomain,
    pub mono_domain_set_config: unsafe extern "C" fn(*mut MonoDomain, *const c_char, *const c_char),
    pub mono_domain_create_appdomain:
        unsafe extern "C" fn(*mut c_char, *mut c_char) -> *mut MonoDomain,
    pub mono_domain_assembly_open:
        unsafe extern "C" fn(*mut MonoDomain, *const c_char) -> *mut MonoAssembly,
    pub mono_assembly_get_image: unsafe extern "C" fn(*mut MonoAssembly) -> *mut MonoImage,
    pub mono_class_from_name:
        unsafe extern "C" fn(*mut MonoImage, *const c_char, *const c_char) -> *mut MonoClass,
    pub mono_method_desc_new: unsafe extern "C" fn(*const c_char, c_int) -> *mut MonoMethodDesc,
    pub mono_method_desc_search_in_image:
        unsafe extern "C" fn(*mut MonoMethodDesc, *mut MonoImage) -> *mut MonoMethod,
    pub mono_method_desc_free: unsafe extern "C" fn(*mut MonoMethodDesc),
    pub mono_method_signature: unsafe extern "C" fn(*mut MonoMethod) -> *mut MonoMethodSignature,
    pub mono_signature_get_return_type:
        unsafe extern "C" fn(*mut MonoMethodSignature) -> *mut MonoType,
    pub mono_type_get_type: unsafe extern "C" fn(*mut MonoType) -> c_int,
    pub mono_thread_attach: unsafe extern "C" fn(*mut MonoDomain) -> *mut MonoThread,
    pub mono_runtime_invoke: unsafe extern "C" fn(
        *mut MonoMethod,
        *mut c_void,
        *mut *mut c_void,
        *mut *mut MonoObject,
    ) -> *mut MonoObject,
    pub mono_object_unbox: unsafe extern "C" fn(*mut MonoObject) -> *mut c_void,
    pub mono_object_to_string:
        unsafe extern "C" fn(*mut MonoObject, *mut *mut MonoObject) -> *mut MonoString,
    pub mono_string_to_utf8: unsafe extern "C" fn(*mut MonoString) -> *mut c_char,
    pub mono_get_runtime_build_info: unsafe extern "C" fn() -> *mut c_char,
    pub mono_free: unsafe extern "C" fn(*mut c_void),
    library: NativeLibrary,
}

impl MonoApi {
    /// Loads the Mono runtime library at `path` and resolves every function the backend needs.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::RuntimeInitialization`] if the library cannot be loaded or lacks
    /// one of the functions.
    pub(crate) fn load(path: &Path) -> Result<Self> {
        let library = NativeLibrary::open(path, BackendKind::Mono)?;
        Ok(MonoApi {
            mono_set_dirs: symbol!(library, mono_set_dirs),
            mono_config_parse: symbol!(library, mono_config_parse),
            mono_jit_parse_options: symbol!(library, mono_jit_parse_options),
            mono_debug_init: symbol!(library, mono_debug_init),
            mono_jit_init: symbol!(library, mono_jit_init),
            mono_domain_set_config: symbol!(library, mono_domain_set_config),
            mono_domain_create_appdomain: symbol!(library, mono_domain_create_appdomain),
            mono_domain_assembly_open: symbol!(library, mono_domain_assembly_open),
            mono_assembly_get_image: symbol!(library, mono_assembly_get_image),
            mono_class_from_name: symbol!(library, mono_class_from_name),
            mono_method_desc_new: symbol!(library, mono_method_desc_new),
            mono_method_desc_search_in_image: symbol!(library, mono_method_desc_search_in_image),
            mono_method_desc_free: symbol!(library, mono_method_desc_free),
            mono_method_signature: symbol!(library, mono_method_signature),
            mono_signature_get_return_type: symbol!(library, mono_signature_get_return_type),
            mono_type_get_type: symbol!(library, mono_type_get_type),
            mono_thread_attach: symbol!(library, mono_thread_attach),
            mono_runtime_invoke: symbol!(library, mono_runtime_invoke),
            mono_object_unbox: symbol!(library, mono_object_unbox),
            mono_object_to_string: symbol!(library, mono_object_to_string),
            mono_string_to_utf8: symbol!(library, mono_string_to_utf8),
            mono_get_runtime_build_info: symbol!(library, mono_get_runtime_build_info),
            mono_free: symbol!(library, mono_free),
            library,
        })
    }

    /// Location of the loaded library.
    pub(crate) fn path(&self) -> &Path {
        self.library.path()
    }

    /// Whether `method` is declared to return `System.Int32`.
    pub(crate) fn returns_int32(&self, method: *mut MonoMethod) -> bool {
        unsafe {
            let signature = (self.mono_method_signature)(method);
            if signature.is_null() {
                return false;
            }
            let return_type = (self.mono_signature_get_return_type)(signature);
            !return_type.is_null() && (self.mono_type_get_type)(return_type) == MONO_TYPE_I4
        }
    }

    /// Copies and frees a string allocated by Mono.
    ///
    /// # Safety
    ///
    /// `ptr` must be null or a NUL terminated string Mono expects the caller to `mono_free`.
    pub(crate) unsafe fn take_string(&self, ptr: *mut c_char) -> Option<String> {
        let value = unsafe { crate::native::cstr_to_string(ptr) }?;
        unsafe { (self.mono_free)(ptr.cast()) };
        Some(value)
    }
}

/// A `MonoMethodDesc` freed on drop.
pub(crate) struct MethodDesc<'a> {
    api: &'a MonoApi,
    desc: *mut MonoMethodDesc,
}

impl<'a> MethodDesc<'a> {
    /// Parses `Namespace.Type:Method` or `Namespace.Type:Method(args)`, matching the namespace
    /// as part of the name.
    pub(crate) fn new(api: &'a MonoApi, description: &std::ffi::CStr) -> Option<Self> {
        let desc = unsafe { (api.mono_method_desc_new)(description.as_ptr(), 1) };
        (!desc.is_null()).then_some(MethodDesc { api, desc })
    }

    /// Looks the method up in `image`.
    pub(crate) fn search(&self, image: *mut MonoImage) -> *mut MonoMethod {
        unsafe { (self.api.mono_method_desc_search_in_image)(self.desc, image) }
    }
}

impl Drop for MethodDesc<'_> {
    fn drop(&mut self) {
        unsafe { (self.api.mono_method_desc_free)(self.desc) };
    }
}
