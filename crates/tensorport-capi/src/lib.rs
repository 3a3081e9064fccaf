//! C ABI boundary for the tensorport layer.
//!
//! The host holds opaque handles minted by the lifetime registry; every
//! export here resolves handles through that registry, runs under the
//! checked scope in [`boundary`], and reports failures through a diagnostic
//! out-parameter instead of ever unwinding across the boundary.
//!
//! Caller contract: after any call, a non-null `out_error` means the return
//! value is a sentinel and must not be interpreted, including as a handle.
//! Diagnostics are released with `free_error_message`.

pub mod boundary;
pub mod tensors;

pub use boundary::*;
pub use tensorport_core::DType;
pub use tensorport_registry::Handle;
pub use tensors::*;
