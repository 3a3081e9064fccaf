//! Exported tensor operations.
//!
//! Every operation resolves its handle arguments through the process
//! registry, runs under the boundary guard, and logs its arguments on entry
//! and its result on successful exit. Buffers returned to the host are plain
//! owned allocations, not registry entries; the matching `free_*` export
//! releases them.

use std::ffi::CStr;
use std::os::raw::{c_char, c_int, c_void};
use std::slice;
use std::sync::LazyLock;

use bytes::Bytes;
use tensorport_core::{DType, Element, Shape, Tensor, TensorError};
use tensorport_registry::{Handle, Registry};
use tracing::{debug, trace};

use crate::boundary::guard;

static REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::new);

fn registry() -> &'static Registry {
    &REGISTRY
}

/// Installs an env-filtered fmt subscriber (`RUST_LOG`). Safe to call more
/// than once; later calls are no-ops.
#[no_mangle]
pub extern "C" fn tensorport_init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}

unsafe fn shape_from_raw(dims: *const i64, num_dims: usize) -> Result<Shape, TensorError> {
    if num_dims == 0 {
        return Ok(Shape::scalar());
    }
    if dims.is_null() {
        return Err(TensorError::NullPointer("dims"));
    }
    let dims = unsafe { slice::from_raw_parts(dims, num_dims) };
    Shape::from_boundary_dims(dims)
}

unsafe fn read_index_slice<'a>(idxs: *const i64, rank: usize) -> Result<&'a [i64], TensorError> {
    if rank == 0 {
        return Ok(&[]);
    }
    if idxs.is_null() {
        return Err(TensorError::NullPointer("idxs"));
    }
    Ok(unsafe { slice::from_raw_parts(idxs, rank) })
}

unsafe fn read_string_array(data: *const c_void, len: usize) -> Result<Vec<String>, TensorError> {
    if len == 0 {
        return Ok(Vec::new());
    }
    if data.is_null() {
        return Err(TensorError::NullPointer("data"));
    }
    let ptrs = unsafe { slice::from_raw_parts(data.cast::<*const c_char>(), len) };
    ptrs.iter()
        .map(|&ptr| {
            if ptr.is_null() {
                return Err(TensorError::NullPointer("string array entry"));
            }
            Ok(unsafe { CStr::from_ptr(ptr) }.to_string_lossy().into_owned())
        })
        .collect()
}

/// Hands a caller-owned array across the boundary. Length is tracked by the
/// caller; the matching `free_*` export reconstructs the allocation.
fn into_owned_array<T>(values: Vec<T>) -> *mut T {
    Box::into_raw(values.into_boxed_slice()).cast::<T>()
}

unsafe fn free_owned_array<T>(ptr: *mut T, len: usize) {
    if ptr.is_null() {
        return;
    }
    drop(unsafe { Box::from_raw(std::ptr::slice_from_raw_parts_mut(ptr, len)) });
}

unsafe fn free_owned_flatlist<T: Element>(values: *mut T::Boundary, len: usize) {
    if values.is_null() {
        return;
    }
    let boxed = unsafe { Box::from_raw(std::ptr::slice_from_raw_parts_mut(values, len)) };
    for value in boxed.into_vec() {
        unsafe { T::release_boundary(value) };
    }
}

/// Builds a tensor from a raw untyped buffer plus shape and dtype tag, and
/// registers it. For the string dtype, `data` is an array of NUL-terminated
/// strings, one per element.
///
/// # Safety
///
/// `data` must be readable for `numel * width` bytes (or `numel` string
/// pointers) and `dims` for `num_dims` entries.
#[no_mangle]
pub unsafe extern "C" fn make_tensor(
    data: *const c_void,
    dtype: u32,
    dims: *const i64,
    num_dims: usize,
    out_error: *mut *const c_char,
) -> Handle {
    guard("make_tensor", out_error, || {
        let dtype = DType::from_tag(dtype).ok_or(TensorError::UnknownDType(dtype))?;
        let shape = unsafe { shape_from_raw(dims, num_dims)? };
        debug!(op = "make_tensor", %dtype, shape = ?shape.dims(), "boundary call");

        let tensor = match dtype {
            DType::Str => {
                let values = unsafe { read_string_array(data, shape.numel())? };
                Tensor::from_vec(shape, values)?
            }
            _ => {
                let width = dtype.fixed_size().ok_or(TensorError::Unimplemented(dtype))?;
                let byte_len = shape
                    .numel()
                    .checked_mul(width)
                    .ok_or(TensorError::AllocationFailure)?;
                let raw = if byte_len == 0 {
                    Bytes::new()
                } else {
                    if data.is_null() {
                        return Err(TensorError::NullPointer("data").into());
                    }
                    let raw = unsafe { slice::from_raw_parts(data.cast::<u8>(), byte_len) };
                    Bytes::copy_from_slice(raw)
                };
                Tensor::from_le_bytes(dtype, shape, raw)?
            }
        };

        let handle = registry().add(tensor);
        trace!(op = "make_tensor", %handle, "boundary call ok");
        Ok(handle)
    })
}

#[no_mangle]
pub extern "C" fn get_tensor_num_dims(tensor: Handle, out_error: *mut *const c_char) -> c_int {
    guard("get_tensor_num_dims", out_error, || {
        debug!(op = "get_tensor_num_dims", %tensor, "boundary call");
        let t = registry().access::<Tensor>(tensor)?;
        let rank = t.rank() as c_int;
        trace!(op = "get_tensor_num_dims", %tensor, rank, "boundary call ok");
        Ok(rank)
    })
}

#[no_mangle]
pub extern "C" fn get_tensor_dim(
    tensor: Handle,
    dim_index: i32,
    out_error: *mut *const c_char,
) -> i64 {
    guard("get_tensor_dim", out_error, || {
        debug!(op = "get_tensor_dim", %tensor, dim_index, "boundary call");
        let t = registry().access::<Tensor>(tensor)?;
        let size = usize::try_from(dim_index)
            .ok()
            .and_then(|index| t.shape().dim(index))
            .ok_or(TensorError::IndexOutOfRange {
                index: i64::from(dim_index),
                limit: t.rank(),
            })?;
        trace!(op = "get_tensor_dim", %tensor, dim_index, size, "boundary call ok");
        Ok(size as i64)
    })
}

/// Returns a caller-owned array of `get_tensor_num_dims` entries; release it
/// with `free_i64_array`.
#[no_mangle]
pub extern "C" fn get_tensor_dims(tensor: Handle, out_error: *mut *const c_char) -> *mut i64 {
    guard("get_tensor_dims", out_error, || {
        debug!(op = "get_tensor_dims", %tensor, "boundary call");
        let t = registry().access::<Tensor>(tensor)?;
        let dims: Vec<i64> = t.shape().dims().iter().map(|&d| d as i64).collect();
        trace!(op = "get_tensor_dims", %tensor, rank = dims.len(), "boundary call ok");
        Ok(into_owned_array(dims))
    })
}

#[no_mangle]
pub extern "C" fn get_tensor_flatlist_length(
    tensor: Handle,
    out_error: *mut *const c_char,
) -> i64 {
    guard("get_tensor_flatlist_length", out_error, || {
        debug!(op = "get_tensor_flatlist_length", %tensor, "boundary call");
        let t = registry().access::<Tensor>(tensor)?;
        let len = t.numel() as i64;
        trace!(op = "get_tensor_flatlist_length", %tensor, len, "boundary call ok");
        Ok(len)
    })
}

#[no_mangle]
pub extern "C" fn get_tensor_dtype(tensor: Handle, out_error: *mut *const c_char) -> u32 {
    guard("get_tensor_dtype", out_error, || {
        debug!(op = "get_tensor_dtype", %tensor, "boundary call");
        let t = registry().access::<Tensor>(tensor)?;
        let tag = t.dtype().tag();
        trace!(op = "get_tensor_dtype", %tensor, tag, "boundary call ok");
        Ok(tag)
    })
}

/// Converse of registration: drops the registry's share of ownership.
/// Returns 0 on success; releasing an unknown or already-released handle is
/// `InvalidHandle`.
#[no_mangle]
pub extern "C" fn release_object(handle: Handle, out_error: *mut *const c_char) -> c_int {
    guard("release_object", out_error, || {
        debug!(op = "release_object", %handle, "boundary call");
        registry().release(handle)?;
        trace!(op = "release_object", %handle, "boundary call ok");
        Ok(0)
    })
}

/// Releases a dims array returned by `get_tensor_dims`.
///
/// # Safety
///
/// `ptr` and `len` must match one `get_tensor_dims` return. Null is a no-op.
#[no_mangle]
pub unsafe extern "C" fn free_i64_array(ptr: *mut i64, len: usize) {
    unsafe { free_owned_array(ptr, len) }
}

/// Releases a single string value returned by `get_tensor_value_at_string`
/// or `get_tensor_value_at_index_string`.
///
/// # Safety
///
/// `value` must come from one of those exports and not be freed twice.
#[no_mangle]
pub unsafe extern "C" fn free_cstring(value: *mut c_char) {
    if !value.is_null() {
        drop(unsafe { std::ffi::CString::from_raw(value) });
    }
}

macro_rules! tensor_value_ops {
    ($ty:ty, $value_at:ident, $value_at_index:ident, $to_flatlist:ident, $free_flatlist:ident) => {
        /// Multi-index element read; `idxs` holds one index per dimension.
        ///
        /// # Safety
        ///
        /// `idxs` must be readable for `rank` entries.
        #[no_mangle]
        pub unsafe extern "C" fn $value_at(
            tensor: Handle,
            idxs: *const i64,
            rank: usize,
            out_error: *mut *const c_char,
        ) -> <$ty as Element>::Boundary {
            guard(stringify!($value_at), out_error, || {
                let idxs = unsafe { read_index_slice(idxs, rank)? };
                debug!(op = stringify!($value_at), %tensor, ?idxs, "boundary call");
                let t = registry().access::<Tensor>(tensor)?;
                let value = t.at::<$ty>(idxs)?;
                trace!(op = stringify!($value_at), %tensor, "boundary call ok");
                Ok(value)
            })
        }

        /// Flat row-major element read.
        #[no_mangle]
        pub extern "C" fn $value_at_index(
            tensor: Handle,
            index: i64,
            out_error: *mut *const c_char,
        ) -> <$ty as Element>::Boundary {
            guard(stringify!($value_at_index), out_error, || {
                debug!(op = stringify!($value_at_index), %tensor, index, "boundary call");
                let t = registry().access::<Tensor>(tensor)?;
                let value = t.at_flat::<$ty>(index)?;
                trace!(op = stringify!($value_at_index), %tensor, index, "boundary call ok");
                Ok(value)
            })
        }

        /// Returns a caller-owned array of `get_tensor_flatlist_length`
        /// elements in flat row-major order.
        #[no_mangle]
        pub extern "C" fn $to_flatlist(
            tensor: Handle,
            out_error: *mut *const c_char,
        ) -> *mut <$ty as Element>::Boundary {
            guard(stringify!($to_flatlist), out_error, || {
                debug!(op = stringify!($to_flatlist), %tensor, "boundary call");
                let t = registry().access::<Tensor>(tensor)?;
                let values = t.to_flatlist::<$ty>()?;
                trace!(
                    op = stringify!($to_flatlist),
                    %tensor,
                    len = values.len(),
                    "boundary call ok"
                );
                Ok(into_owned_array(values))
            })
        }

        /// Releases a flatlist returned by the matching export, including any
        /// per-element allocations.
        ///
        /// # Safety
        ///
        /// `values` and `len` must match one flatlist return. Null is a
        /// no-op.
        #[no_mangle]
        pub unsafe extern "C" fn $free_flatlist(
            values: *mut <$ty as Element>::Boundary,
            len: usize,
        ) {
            unsafe { free_owned_flatlist::<$ty>(values, len) }
        }
    };
}

macro_rules! tensor_make_ops {
    ($ty:ty, $make_random:ident, $make_const:ident) => {
        /// Builds a tensor filled uniformly at random over `[min, max]`
        /// inclusive and registers it. Non-deterministic seed per call.
        ///
        /// # Safety
        ///
        /// `dims` must be readable for `num_dims` entries.
        #[no_mangle]
        pub unsafe extern "C" fn $make_random(
            dims: *const i64,
            num_dims: usize,
            min: $ty,
            max: $ty,
            out_error: *mut *const c_char,
        ) -> Handle {
            guard(stringify!($make_random), out_error, || {
                let shape = unsafe { shape_from_raw(dims, num_dims)? };
                debug!(op = stringify!($make_random), shape = ?shape.dims(), "boundary call");
                let tensor = Tensor::random::<$ty>(shape, min, max)?;
                let handle = registry().add(tensor);
                trace!(op = stringify!($make_random), %handle, "boundary call ok");
                Ok(handle)
            })
        }

        /// Builds a tensor filled with one repeated value and registers it.
        ///
        /// # Safety
        ///
        /// `dims` must be readable for `num_dims` entries.
        #[no_mangle]
        pub unsafe extern "C" fn $make_const(
            dims: *const i64,
            num_dims: usize,
            value: $ty,
            out_error: *mut *const c_char,
        ) -> Handle {
            guard(stringify!($make_const), out_error, || {
                let shape = unsafe { shape_from_raw(dims, num_dims)? };
                debug!(op = stringify!($make_const), shape = ?shape.dims(), "boundary call");
                let tensor = Tensor::full::<$ty>(shape, value)?;
                let handle = registry().add(tensor);
                trace!(op = stringify!($make_const), %handle, "boundary call ok");
                Ok(handle)
            })
        }
    };
}

tensor_value_ops!(
    f32,
    get_tensor_value_at_f32,
    get_tensor_value_at_index_f32,
    tensor_to_flatlist_f32,
    free_flatlist_f32
);
tensor_value_ops!(
    f64,
    get_tensor_value_at_f64,
    get_tensor_value_at_index_f64,
    tensor_to_flatlist_f64,
    free_flatlist_f64
);
tensor_value_ops!(
    i8,
    get_tensor_value_at_i8,
    get_tensor_value_at_index_i8,
    tensor_to_flatlist_i8,
    free_flatlist_i8
);
tensor_value_ops!(
    i16,
    get_tensor_value_at_i16,
    get_tensor_value_at_index_i16,
    tensor_to_flatlist_i16,
    free_flatlist_i16
);
tensor_value_ops!(
    i32,
    get_tensor_value_at_i32,
    get_tensor_value_at_index_i32,
    tensor_to_flatlist_i32,
    free_flatlist_i32
);
tensor_value_ops!(
    i64,
    get_tensor_value_at_i64,
    get_tensor_value_at_index_i64,
    tensor_to_flatlist_i64,
    free_flatlist_i64
);
tensor_value_ops!(
    u8,
    get_tensor_value_at_u8,
    get_tensor_value_at_index_u8,
    tensor_to_flatlist_u8,
    free_flatlist_u8
);
tensor_value_ops!(
    u16,
    get_tensor_value_at_u16,
    get_tensor_value_at_index_u16,
    tensor_to_flatlist_u16,
    free_flatlist_u16
);
tensor_value_ops!(
    u32,
    get_tensor_value_at_u32,
    get_tensor_value_at_index_u32,
    tensor_to_flatlist_u32,
    free_flatlist_u32
);
tensor_value_ops!(
    u64,
    get_tensor_value_at_u64,
    get_tensor_value_at_index_u64,
    tensor_to_flatlist_u64,
    free_flatlist_u64
);
tensor_value_ops!(
    bool,
    get_tensor_value_at_bool,
    get_tensor_value_at_index_bool,
    tensor_to_flatlist_bool,
    free_flatlist_bool
);
tensor_value_ops!(
    String,
    get_tensor_value_at_string,
    get_tensor_value_at_index_string,
    tensor_to_flatlist_string,
    free_flatlist_string
);

tensor_make_ops!(f32, make_random_tensor_f32, make_const_tensor_f32);
tensor_make_ops!(f64, make_random_tensor_f64, make_const_tensor_f64);
tensor_make_ops!(i8, make_random_tensor_i8, make_const_tensor_i8);
tensor_make_ops!(i16, make_random_tensor_i16, make_const_tensor_i16);
tensor_make_ops!(i32, make_random_tensor_i32, make_const_tensor_i32);
tensor_make_ops!(i64, make_random_tensor_i64, make_const_tensor_i64);
tensor_make_ops!(u8, make_random_tensor_u8, make_const_tensor_u8);
tensor_make_ops!(u16, make_random_tensor_u16, make_const_tensor_u16);
tensor_make_ops!(u32, make_random_tensor_u32, make_const_tensor_u32);
tensor_make_ops!(u64, make_random_tensor_u64, make_const_tensor_u64);
