#![allow(unused_macros)]

/// Helper macro for locking items, turning a poisoned guard into [`crate::Error::LockError`]
///
/// ```rust, ignore
///  let mut state = lock!(self.state);
///  *state = InitState::Initializing;
/// ```
macro_rules! lock {
    ($lock:expr) => {
        $lock.lock().map_err(|_| crate::Error::LockError)?
    };
}

/// Helper macro for looking up a required symbol in a [`crate::native::NativeLibrary`]
///
/// The symbol name doubles as the field name of the function table being filled.
///
/// ```rust, ignore
///  let api = MonoApi {
///      mono_jit_init: symbol!(library, mono_jit_init),
///      ..
///  };
/// ```
macro_rules! symbol {
    ($library:expr, $name:ident) => {
        unsafe { $library.symbol(concat!(stringify!($name), "\0").as_bytes())? }
    };
}
