use std::ffi::CString;
use std::fmt;
use std::os::raw::c_char;

use crate::tensor::TensorData;

/// Element types a tensor can carry across the boundary.
///
/// `F16` is reserved: it has a tag and a storage width, but no element
/// mapping and no exported operation family.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DType {
    F32,
    F64,
    I8,
    I16,
    I32,
    I64,
    U8,
    U16,
    U32,
    U64,
    Bool,
    Str,
    F16,
}

impl DType {
    /// Stable boundary tag. Tag 0 means "unspecified" and never maps to a
    /// dtype.
    pub fn tag(self) -> u32 {
        match self {
            DType::F32 => 1,
            DType::F64 => 2,
            DType::I8 => 3,
            DType::I16 => 4,
            DType::I32 => 5,
            DType::I64 => 6,
            DType::U8 => 7,
            DType::U16 => 8,
            DType::U32 => 9,
            DType::U64 => 10,
            DType::Bool => 11,
            DType::Str => 12,
            DType::F16 => 13,
        }
    }

    pub fn from_tag(tag: u32) -> Option<Self> {
        Some(match tag {
            1 => DType::F32,
            2 => DType::F64,
            3 => DType::I8,
            4 => DType::I16,
            5 => DType::I32,
            6 => DType::I64,
            7 => DType::U8,
            8 => DType::U16,
            9 => DType::U32,
            10 => DType::U64,
            11 => DType::Bool,
            12 => DType::Str,
            13 => DType::F16,
            _ => return None,
        })
    }

    /// Byte width of the in-buffer storage representation. `None` for the
    /// variable-width `Str`.
    pub fn fixed_size(self) -> Option<usize> {
        Some(match self {
            DType::F32 => 4,
            DType::F64 => 8,
            DType::I8 => 1,
            DType::I16 => 2,
            DType::I32 => 4,
            DType::I64 => 8,
            DType::U8 => 1,
            DType::U16 => 2,
            DType::U32 => 4,
            DType::U64 => 8,
            DType::Bool => 1,
            DType::Str => return None,
            DType::F16 => 2,
        })
    }

    pub fn is_numeric(self) -> bool {
        !matches!(self, DType::Bool | DType::Str | DType::F16)
    }
}

impl fmt::Display for DType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DType::F32 => "f32",
            DType::F64 => "f64",
            DType::I8 => "i8",
            DType::I16 => "i16",
            DType::I32 => "i32",
            DType::I64 => "i64",
            DType::U8 => "u8",
            DType::U16 => "u16",
            DType::U32 => "u32",
            DType::U64 => "u64",
            DType::Bool => "bool",
            DType::Str => "string",
            DType::F16 => "f16",
        };
        f.write_str(name)
    }
}

/// Single-source pairing between a Rust element type, its dtype tag, and the
/// value representation used in exported signatures.
///
/// Adding an element type means one impl here plus one line in the capi
/// export lists; nothing else changes.
pub trait Element: Clone + Send + Sync + 'static {
    const DTYPE: DType;

    /// Representation of one element when it crosses the boundary.
    type Boundary;

    fn into_boundary(self) -> Self::Boundary;

    /// Reclaims an owned boundary value produced by
    /// [`Element::into_boundary`]. No-op for plain value representations.
    ///
    /// # Safety
    ///
    /// `value` must come from `into_boundary` and must not already have been
    /// released.
    unsafe fn release_boundary(value: Self::Boundary) {
        let _ = value;
    }

    fn wrap(values: Vec<Self>) -> TensorData;

    fn values(data: &TensorData) -> Option<&[Self]>;
}

macro_rules! numeric_element {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl Element for $ty {
                const DTYPE: DType = DType::$variant;
                type Boundary = $ty;

                fn into_boundary(self) -> Self::Boundary {
                    self
                }

                fn wrap(values: Vec<Self>) -> TensorData {
                    TensorData::$variant(values)
                }

                fn values(data: &TensorData) -> Option<&[Self]> {
                    match data {
                        TensorData::$variant(values) => Some(values),
                        _ => None,
                    }
                }
            }
        )*
    };
}

numeric_element! {
    f32 => F32,
    f64 => F64,
    i8 => I8,
    i16 => I16,
    i32 => I32,
    i64 => I64,
    u8 => U8,
    u16 => U16,
    u32 => U32,
    u64 => U64,
}

impl Element for bool {
    const DTYPE: DType = DType::Bool;
    type Boundary = u8;

    fn into_boundary(self) -> u8 {
        u8::from(self)
    }

    fn wrap(values: Vec<Self>) -> TensorData {
        TensorData::Bool(values)
    }

    fn values(data: &TensorData) -> Option<&[Self]> {
        match data {
            TensorData::Bool(values) => Some(values),
            _ => None,
        }
    }
}

impl Element for String {
    const DTYPE: DType = DType::Str;
    type Boundary = *mut c_char;

    fn into_boundary(self) -> *mut c_char {
        // An interior NUL cannot cross the boundary; such a value becomes the
        // empty string.
        CString::new(self).unwrap_or_default().into_raw()
    }

    unsafe fn release_boundary(value: *mut c_char) {
        if !value.is_null() {
            drop(unsafe { CString::from_raw(value) });
        }
    }

    fn wrap(values: Vec<Self>) -> TensorData {
        TensorData::Str(values)
    }

    fn values(data: &TensorData) -> Option<&[Self]> {
        match data {
            TensorData::Str(values) => Some(values),
            _ => None,
        }
    }
}
