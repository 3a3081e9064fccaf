//! The checked scope every exported operation runs inside.
//!
//! No failure crosses the boundary raw: the body returns `Result`, panics are
//! caught, and both are converted into a diagnostic written through the
//! caller's out-parameter plus a type-appropriate sentinel return.

use std::any::Any;
use std::ffi::CString;
use std::os::raw::c_char;
use std::panic::{self, AssertUnwindSafe};

use tensorport_core::TensorError;
use tensorport_registry::{Handle, RegistryError};
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum CapiError {
    #[error(transparent)]
    Tensor(#[from] TensorError),
    #[error(transparent)]
    Registry(#[from] RegistryError),
    #[error("panic in native code: {0}")]
    Panic(String),
}

/// Value returned in place of a real result when a call fails. The caller
/// contract is to check the out-parameter, never the sentinel.
pub trait Sentinel {
    fn sentinel() -> Self;
}

macro_rules! zero_sentinel {
    ($($ty:ty),* $(,)?) => {
        $(
            impl Sentinel for $ty {
                fn sentinel() -> Self {
                    0 as $ty
                }
            }
        )*
    };
}

zero_sentinel!(i8, i16, i32, i64, u8, u16, u32, u64, f32, f64);

impl<T> Sentinel for *mut T {
    fn sentinel() -> Self {
        std::ptr::null_mut()
    }
}

impl Sentinel for Handle {
    fn sentinel() -> Self {
        Handle(0)
    }
}

/// Runs an exported operation body inside the checked scope.
///
/// The out-parameter is cleared on entry so a stale diagnostic can never be
/// misread as belonging to this call.
pub(crate) fn guard<T, F>(op: &'static str, out_error: *mut *const c_char, body: F) -> T
where
    T: Sentinel,
    F: FnOnce() -> Result<T, CapiError>,
{
    if !out_error.is_null() {
        unsafe { *out_error = std::ptr::null() };
    }

    let err = match panic::catch_unwind(AssertUnwindSafe(body)) {
        Ok(Ok(value)) => return value,
        Ok(Err(err)) => err,
        Err(payload) => CapiError::Panic(panic_message(payload)),
    };

    debug!(op, error = %err, "boundary call failed");
    if !out_error.is_null() {
        let message = CString::new(err.to_string()).unwrap_or_default();
        unsafe { *out_error = message.into_raw() };
    }
    T::sentinel()
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Releases a diagnostic previously written through an out-parameter.
///
/// # Safety
///
/// `message` must have been produced by this library's boundary and not
/// freed before. Null is a no-op.
#[no_mangle]
pub unsafe extern "C" fn free_error_message(message: *const c_char) {
    if !message.is_null() {
        drop(unsafe { CString::from_raw(message as *mut c_char) });
    }
}
