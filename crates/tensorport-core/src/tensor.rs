use bytes::Bytes;
use rand::distributions::uniform::SampleUniform;
use rand::distributions::{Distribution, Uniform};
use smallvec::SmallVec;

use crate::dtype::{DType, Element};
use crate::error::TensorError;

/// Ordered dimension sizes. The empty shape is a scalar.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Shape(pub SmallVec<[usize; 6]>);

impl Shape {
    pub fn from_slice(d: &[usize]) -> Self {
        Self(d.iter().copied().collect())
    }

    pub fn scalar() -> Self {
        Self(SmallVec::new())
    }

    /// Converts a boundary dimension list. Negative entries are rejected and
    /// the element-count product is overflow-checked.
    pub fn from_boundary_dims(dims: &[i64]) -> Result<Self, TensorError> {
        let mut out = SmallVec::with_capacity(dims.len());
        let mut numel: usize = 1;
        for &dim in dims {
            if dim < 0 {
                return Err(TensorError::InvalidShape(format!(
                    "dimension {dim} is negative"
                )));
            }
            let dim = dim as usize;
            numel = numel
                .checked_mul(dim)
                .ok_or(TensorError::AllocationFailure)?;
            out.push(dim);
        }
        Ok(Self(out))
    }

    pub fn rank(&self) -> usize {
        self.0.len()
    }

    pub fn dim(&self, index: usize) -> Option<usize> {
        self.0.get(index).copied()
    }

    pub fn dims(&self) -> &[usize] {
        &self.0
    }

    /// Total element count: product of the dims, 1 for the scalar shape.
    pub fn numel(&self) -> usize {
        self.0.iter().product()
    }
}

/// Typed element storage, one variant per implemented element type.
#[derive(Clone, Debug, PartialEq)]
pub enum TensorData {
    F32(Vec<f32>),
    F64(Vec<f64>),
    I8(Vec<i8>),
    I16(Vec<i16>),
    I32(Vec<i32>),
    I64(Vec<i64>),
    U8(Vec<u8>),
    U16(Vec<u16>),
    U32(Vec<u32>),
    U64(Vec<u64>),
    Bool(Vec<bool>),
    Str(Vec<String>),
}

fn decode_fixed<T, const WIDTH: usize>(
    raw: &[u8],
    convert: fn([u8; WIDTH]) -> T,
) -> Result<Vec<T>, TensorError> {
    if raw.len() % WIDTH != 0 {
        return Err(TensorError::InvalidShape(format!(
            "byte length {} is not a multiple of element width {WIDTH}",
            raw.len()
        )));
    }
    Ok(raw
        .chunks_exact(WIDTH)
        .map(|chunk| {
            let mut bytes = [0u8; WIDTH];
            bytes.copy_from_slice(chunk);
            convert(bytes)
        })
        .collect())
}

impl TensorData {
    pub fn dtype(&self) -> DType {
        match self {
            TensorData::F32(_) => DType::F32,
            TensorData::F64(_) => DType::F64,
            TensorData::I8(_) => DType::I8,
            TensorData::I16(_) => DType::I16,
            TensorData::I32(_) => DType::I32,
            TensorData::I64(_) => DType::I64,
            TensorData::U8(_) => DType::U8,
            TensorData::U16(_) => DType::U16,
            TensorData::U32(_) => DType::U32,
            TensorData::U64(_) => DType::U64,
            TensorData::Bool(_) => DType::Bool,
            TensorData::Str(_) => DType::Str,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            TensorData::F32(v) => v.len(),
            TensorData::F64(v) => v.len(),
            TensorData::I8(v) => v.len(),
            TensorData::I16(v) => v.len(),
            TensorData::I32(v) => v.len(),
            TensorData::I64(v) => v.len(),
            TensorData::U8(v) => v.len(),
            TensorData::U16(v) => v.len(),
            TensorData::U32(v) => v.len(),
            TensorData::U64(v) => v.len(),
            TensorData::Bool(v) => v.len(),
            TensorData::Str(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Decodes a raw little-endian buffer into typed storage.
    pub fn from_le_bytes(dtype: DType, raw: &[u8]) -> Result<Self, TensorError> {
        Ok(match dtype {
            DType::F32 => TensorData::F32(decode_fixed(raw, f32::from_le_bytes)?),
            DType::F64 => TensorData::F64(decode_fixed(raw, f64::from_le_bytes)?),
            DType::I8 => TensorData::I8(decode_fixed(raw, i8::from_le_bytes)?),
            DType::I16 => TensorData::I16(decode_fixed(raw, i16::from_le_bytes)?),
            DType::I32 => TensorData::I32(decode_fixed(raw, i32::from_le_bytes)?),
            DType::I64 => TensorData::I64(decode_fixed(raw, i64::from_le_bytes)?),
            DType::U8 => TensorData::U8(raw.to_vec()),
            DType::U16 => TensorData::U16(decode_fixed(raw, u16::from_le_bytes)?),
            DType::U32 => TensorData::U32(decode_fixed(raw, u32::from_le_bytes)?),
            DType::U64 => TensorData::U64(decode_fixed(raw, u64::from_le_bytes)?),
            DType::Bool => TensorData::Bool(raw.iter().map(|&b| b != 0).collect()),
            DType::Str => return Err(TensorError::UnsupportedRawData(DType::Str)),
            DType::F16 => return Err(TensorError::Unimplemented(DType::F16)),
        })
    }
}

/// Immutable typed multidimensional buffer.
///
/// Invariant: `data.len() == shape.numel()` holds for every constructor, so
/// element access never reads outside the buffer.
#[derive(Clone, Debug)]
pub struct Tensor {
    shape: Shape,
    data: TensorData,
}

impl Tensor {
    /// Builds a tensor by decoding a raw untyped buffer.
    pub fn from_le_bytes(dtype: DType, shape: Shape, raw: Bytes) -> Result<Self, TensorError> {
        let data = TensorData::from_le_bytes(dtype, &raw)?;
        Self::from_data(shape, data)
    }

    pub fn from_data(shape: Shape, data: TensorData) -> Result<Self, TensorError> {
        if data.len() != shape.numel() {
            return Err(TensorError::InvalidShape(format!(
                "buffer holds {} elements, shape wants {}",
                data.len(),
                shape.numel()
            )));
        }
        Ok(Self { shape, data })
    }

    pub fn from_vec<T: Element>(shape: Shape, values: Vec<T>) -> Result<Self, TensorError> {
        Self::from_data(shape, T::wrap(values))
    }

    /// Constant fill.
    pub fn full<T: Element>(shape: Shape, value: T) -> Result<Self, TensorError> {
        let numel = shape.numel();
        Self::from_vec(shape, vec![value; numel])
    }

    /// Uniform fill over `[min, max]` inclusive. Fresh thread-local RNG per
    /// call; no reproducibility guarantee.
    pub fn random<T>(shape: Shape, min: T, max: T) -> Result<Self, TensorError>
    where
        T: Element + SampleUniform,
    {
        let numel = shape.numel();
        let mut rng = rand::thread_rng();
        let between = Uniform::new_inclusive(min, max);
        let values = (0..numel).map(|_| between.sample(&mut rng)).collect();
        Self::from_vec(shape, values)
    }

    pub fn shape(&self) -> &Shape {
        &self.shape
    }

    pub fn dtype(&self) -> DType {
        self.data.dtype()
    }

    pub fn rank(&self) -> usize {
        self.shape.rank()
    }

    pub fn numel(&self) -> usize {
        self.shape.numel()
    }

    fn typed<T: Element>(&self) -> Result<&[T], TensorError> {
        T::values(&self.data).ok_or(TensorError::DTypeMismatch {
            expected: T::DTYPE,
            actual: self.dtype(),
        })
    }

    /// Multi-index read in the boundary value representation.
    pub fn at<T: Element>(&self, idxs: &[i64]) -> Result<T::Boundary, TensorError> {
        if idxs.len() != self.rank() {
            return Err(TensorError::RankMismatch {
                expected: self.rank(),
                actual: idxs.len(),
            });
        }
        let mut flat = 0usize;
        for (&idx, &size) in idxs.iter().zip(self.shape.dims()) {
            if idx < 0 || idx as usize >= size {
                return Err(TensorError::IndexOutOfRange {
                    index: idx,
                    limit: size,
                });
            }
            flat = flat * size + idx as usize;
        }
        let values = self.typed::<T>()?;
        Ok(values[flat].clone().into_boundary())
    }

    /// Flat row-major read in the boundary value representation.
    pub fn at_flat<T: Element>(&self, index: i64) -> Result<T::Boundary, TensorError> {
        let numel = self.numel();
        if index < 0 || index as usize >= numel {
            return Err(TensorError::IndexOutOfRange {
                index,
                limit: numel,
            });
        }
        let values = self.typed::<T>()?;
        Ok(values[index as usize].clone().into_boundary())
    }

    /// Every element in flat row-major order, converted to the boundary
    /// representation. The returned buffer is caller-owned, not
    /// registry-managed.
    pub fn to_flatlist<T: Element>(&self) -> Result<Vec<T::Boundary>, TensorError> {
        Ok(self
            .typed::<T>()?
            .iter()
            .cloned()
            .map(T::into_boundary)
            .collect())
    }
}
