//! Resolved entry points and the buffer calling convention.
//!
//! Every managed entry point reachable through this crate has the same shape:
//!
//! ```text
//! int32 function(void* buffer, int32 length)
//! ```
//!
//! The host hands the callee a borrowed view of one byte buffer. The callee may read and write
//! up to `length` bytes through the pointer while the call is running, and must not keep the
//! pointer afterwards. Everything exchanged between host and managed code is encoded into that
//! buffer by a convention the caller and the callee agree on; the `i32` result is a status or
//! value defined the same way.
//!
//! # Key Components
//!
//! - [`BufferView`] - `(pointer, length)` borrowed from a `&mut [u8]` for one call
//! - [`NativeCallable`] - what a backend hands back from resolution
//! - [`RawEntryPoint`] - a plain native function pointer with the convention above
//! - [`ClrFunction`] - the resolved, invocable function bound to its assembly, type and method

use std::{
    ffi::c_void,
    fmt,
    marker::PhantomData,
    path::{Path, PathBuf},
    ptr::NonNull,
};

use crate::{runtime::Runtime, Result};

/// Native signature of every entry point: `int32 (*)(void* buffer, int32 length)`.
///
/// Uses the platform's system ABI, which is `__stdcall` on 32-bit Windows, the calling
/// convention of CoreCLR's `ComponentEntryPoint` delegate.
pub type EntryPointFn = unsafe extern "system" fn(buffer: *mut c_void, length: i32) -> i32;

/// A borrowed `(pointer, length)` view of a byte buffer, valid for the duration of one call.
///
/// The view mutably borrows the slice it was created from, so it cannot outlive that slice
/// and nothing else can touch the bytes while the native callee holds the pointer.
#[derive(Debug)]
pub struct BufferView<'a> {
    ptr: NonNull<u8>,
    len: i32,
    _borrow: PhantomData<&'a mut [u8]>,
}

impl<'a> BufferView<'a> {
    /// Creates a view of `buffer`.
    ///
    /// An empty slice yields a dangling but non-null, aligned pointer with length 0.
    ///
    /// # Panics
    ///
    /// Panics if `buffer` is longer than `i32::MAX` bytes, which the calling convention cannot
    /// express.
    pub fn new(buffer: &'a mut [u8]) -> Self {
        let len = i32::try_from(buffer.len()).unwrap_or_else(|_| {
            panic!(
                "buffer of {} bytes exceeds the i32 length of the calling convention",
                buffer.len()
            )
        });

        BufferView {
            ptr: NonNull::from(buffer).cast(),
            len,
            _borrow: PhantomData,
        }
    }

    /// Pointer to the first byte, never null.
    #[must_use]
    pub fn as_ptr(&self) -> *mut c_void {
        self.ptr.as_ptr().cast()
    }

    /// Length in bytes as passed to the callee.
    #[must_use]
    pub fn len(&self) -> i32 {
        self.len
    }

    /// Returns `true` for a zero-length view.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

/// A resolved native entry point, as produced by a [`crate::Backend`].
///
/// Implementations wrap whatever the runtime hands out: a raw function pointer for CoreCLR and
/// the .NET Framework, a method handle driven through `mono_runtime_invoke` for Mono.
pub trait NativeCallable: Send + Sync {
    /// Calls the entry point with `buffer`, returning the callee's result.
    ///
    /// # Safety
    ///
    /// The runtime that produced this entry point must still be alive. The callee must honour
    /// the buffer convention: touch at most `buffer.len()` bytes and not retain the pointer.
    unsafe fn call(&self, buffer: BufferView<'_>) -> i32;

    /// Address identifying the entry point, for diagnostics and identity checks.
    fn address(&self) -> usize;
}

/// A raw native function pointer following the buffer calling convention.
#[derive(Clone, Copy)]
pub struct RawEntryPoint(EntryPointFn);

impl RawEntryPoint {
    /// Wraps a typed function pointer.
    pub fn new(function: EntryPointFn) -> Self {
        RawEntryPoint(function)
    }

    /// Wraps an untyped pointer returned by a hosting API, `None` for null.
    ///
    /// # Safety
    ///
    /// A non-null `ptr` must point to a function with the [`EntryPointFn`] signature.
    pub unsafe fn from_raw(ptr: *const c_void) -> Option<Self> {
        if ptr.is_null() {
            return None;
        }
        Some(RawEntryPoint(unsafe {
            std::mem::transmute::<*const c_void, EntryPointFn>(ptr)
        }))
    }
}

impl NativeCallable for RawEntryPoint {
    unsafe fn call(&self, buffer: BufferView<'_>) -> i32 {
        unsafe { (self.0)(buffer.as_ptr(), buffer.len()) }
    }

    fn address(&self) -> usize {
        self.0 as usize
    }
}

impl fmt::Debug for RawEntryPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RawEntryPoint({:#x})", self.address())
    }
}

/// A resolved managed function with the `(pointer, length) -> i32` signature.
///
/// Created through [`crate::Assembly::get_function`]. The native entry point is resolved
/// exactly once, at construction, and never changes. The function borrows its [`Runtime`], so
/// it cannot be invoked after the runtime is dropped.
///
/// # Examples
///
/// ```rust,no_run
/// use clrloader::{get_coreclr, CoreClrConfig};
///
/// let runtime = get_coreclr(CoreClrConfig::new("Lib.runtimeconfig.json"))?;
/// let echo = runtime.get_assembly("Lib.dll").get_function("Lib.Echo", None)?;
///
/// let mut buffer = *b"hello";
/// assert_eq!(echo.invoke(&mut buffer), 5);
/// # Ok::<(), clrloader::Error>(())
/// ```
pub struct ClrFunction<'rt> {
    runtime: &'rt Runtime,
    assembly_path: PathBuf,
    type_name: String,
    method_name: String,
    callable: Box<dyn NativeCallable>,
}

impl<'rt> ClrFunction<'rt> {
    pub(crate) fn new(
        runtime: &'rt Runtime,
        assembly_path: &Path,
        type_name: &str,
        method_name: &str,
    ) -> Result<Self> {
        let callable = runtime
            .backend()
            .resolve_callable(assembly_path, type_name, method_name)?;

        Ok(ClrFunction {
            runtime,
            assembly_path: assembly_path.to_path_buf(),
            type_name: type_name.to_string(),
            method_name: method_name.to_string(),
            callable,
        })
    }

    /// Invokes the managed function with `buffer`.
    ///
    /// The callee receives a pointer to the first byte and exactly `buffer.len()` as length,
    /// and may write into the buffer. The return value is the callee's `i32`, interpreted by
    /// whatever convention the caller and the managed code share.
    ///
    /// Nothing fails at this layer. A fault inside the native call (for example an unhandled
    /// managed exception) takes the process down, the same way calling through a bad native
    /// function pointer would.
    ///
    /// # Panics
    ///
    /// Panics if `buffer` is longer than `i32::MAX` bytes.
    pub fn invoke(&self, buffer: &mut [u8]) -> i32 {
        let view = BufferView::new(buffer);
        // SAFETY: `self` borrows the runtime, which therefore outlives the call, and `view`
        // borrows `buffer` exclusively until the call returns.
        unsafe { self.callable.call(view) }
    }

    /// Path of the assembly the function was resolved from.
    #[must_use]
    pub fn assembly_path(&self) -> &Path {
        &self.assembly_path
    }

    /// Fully qualified type name.
    #[must_use]
    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    /// Static method name.
    #[must_use]
    pub fn method_name(&self) -> &str {
        &self.method_name
    }

    /// The runtime the function was resolved in.
    #[must_use]
    pub fn runtime(&self) -> &'rt Runtime {
        self.runtime
    }

    /// Address of the underlying native entry point.
    #[must_use]
    pub fn address(&self) -> usize {
        self.callable.address()
    }
}

impl fmt::Display for ClrFunction<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let file = self
            .assembly_path
            .file_name()
            .map(|name| name.to_string_lossy())
            .unwrap_or_else(|| self.assembly_path.to_string_lossy());
        write!(
            f,
            "<ClrFunction {}.{} in {}>",
            self.type_name, self.method_name, file
        )
    }
}

impl fmt::Debug for ClrFunction<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClrFunction")
            .field("backend", &self.runtime.kind())
            .field("assembly_path", &self.assembly_path)
            .field("type_name", &self.type_name)
            .field("method_name", &self.method_name)
            .field("address", &format_args!("{:#x}", self.callable.address()))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    unsafe extern "system" fn sum_bytes(buffer: *mut c_void, length: i32) -> i32 {
        let bytes = unsafe { std::slice::from_raw_parts(buffer as *const u8, length as usize) };
        bytes.iter().map(|b| i32::from(*b)).sum()
    }

    unsafe extern "system" fn fill(buffer: *mut c_void, length: i32) -> i32 {
        let bytes = unsafe { std::slice::from_raw_parts_mut(buffer as *mut u8, length as usize) };
        bytes.fill(0xAB);
        length
    }

    #[test]
    fn view_of_empty_buffer_is_non_null() {
        let mut empty: [u8; 0] = [];
        let view = BufferView::new(&mut empty);
        assert!(!view.as_ptr().is_null());
        assert_eq!(view.len(), 0);
        assert!(view.is_empty());
    }

    #[test]
    fn view_points_at_first_byte() {
        let mut buffer = vec![1u8, 2, 3, 4];
        let expected = buffer.as_mut_ptr() as *mut c_void;
        let view = BufferView::new(&mut buffer);
        assert_eq!(view.as_ptr(), expected);
        assert_eq!(view.len(), 4);
    }

    #[test]
    fn raw_entry_point_reads_and_writes() {
        let sum = RawEntryPoint::new(sum_bytes);
        let mut buffer = [1u8, 2, 3];
        assert_eq!(unsafe { sum.call(BufferView::new(&mut buffer)) }, 6);

        let fill = RawEntryPoint::new(fill);
        assert_eq!(unsafe { fill.call(BufferView::new(&mut buffer)) }, 3);
        assert_eq!(buffer, [0xAB; 3]);
    }

    #[test]
    fn raw_entry_point_from_raw() {
        assert!(unsafe { RawEntryPoint::from_raw(std::ptr::null()) }.is_none());

        let ptr = sum_bytes as EntryPointFn as *const c_void;
        let entry = unsafe { RawEntryPoint::from_raw(ptr) }.unwrap();
        assert_eq!(entry.address(), ptr as usize);
    }
}
