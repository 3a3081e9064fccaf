use anyhow::{ensure, Result};
use bytes::Bytes;
use tensorport_core::{DType, Shape, Tensor, TensorError};

fn bytes_from_slice<T>(slice: &[T]) -> Bytes {
    let byte_len = std::mem::size_of_val(slice);
    let ptr = slice.as_ptr().cast::<u8>();
    let bytes = unsafe { std::slice::from_raw_parts(ptr, byte_len) };
    Bytes::copy_from_slice(bytes)
}

#[test]
fn shape_reports_rank_and_dims() {
    let shape = Shape::from_slice(&[2, 3, 4]);
    assert_eq!(shape.rank(), 3);
    assert_eq!(shape.dim(0), Some(2));
    assert_eq!(shape.dim(1), Some(3));
    assert_eq!(shape.dim(2), Some(4));
    assert_eq!(shape.dim(3), None);
    assert_eq!(shape.numel(), 24);
}

#[test]
fn scalar_shape_has_one_element() {
    let shape = Shape::scalar();
    assert_eq!(shape.rank(), 0);
    assert_eq!(shape.numel(), 1);
}

#[test]
fn zero_sized_dimension_is_accepted() {
    let shape = Shape::from_boundary_dims(&[0, 3]).unwrap();
    assert_eq!(shape.numel(), 0);
    let tensor = Tensor::from_vec::<f32>(shape, Vec::new()).unwrap();
    assert_eq!(tensor.numel(), 0);
    assert!(matches!(
        tensor.at_flat::<f32>(0),
        Err(TensorError::IndexOutOfRange { .. })
    ));
}

#[test]
fn negative_dimension_is_rejected() {
    assert!(matches!(
        Shape::from_boundary_dims(&[2, -1]),
        Err(TensorError::InvalidShape(_))
    ));
}

#[test]
fn overflowing_shape_is_an_allocation_failure() {
    assert!(matches!(
        Shape::from_boundary_dims(&[i64::MAX, i64::MAX]),
        Err(TensorError::AllocationFailure)
    ));
}

#[test]
fn raw_bytes_round_trip_f32() -> Result<()> {
    let data = [1.0f32, 2.0, 3.0, 4.0, 5.0, 6.0];
    let tensor = Tensor::from_le_bytes(
        DType::F32,
        Shape::from_slice(&[2, 3]),
        bytes_from_slice(&data),
    )?;
    ensure!(tensor.rank() == 2);
    ensure!(tensor.numel() == 6);
    for (i, expected) in data.iter().enumerate() {
        ensure!(tensor.at_flat::<f32>(i as i64)? == *expected);
    }
    Ok(())
}

#[test]
fn raw_bytes_round_trip_i64() -> Result<()> {
    let data = [-3i64, 0, 9_000_000_000];
    let tensor = Tensor::from_le_bytes(
        DType::I64,
        Shape::from_slice(&[3]),
        bytes_from_slice(&data),
    )?;
    for (i, expected) in data.iter().enumerate() {
        ensure!(tensor.at_flat::<i64>(i as i64)? == *expected);
    }
    Ok(())
}

#[test]
fn raw_bytes_round_trip_u8_and_bool() -> Result<()> {
    let raw = Bytes::from_static(&[0, 1, 2, 255]);
    let tensor = Tensor::from_le_bytes(DType::U8, Shape::from_slice(&[4]), raw.clone())?;
    ensure!(tensor.at_flat::<u8>(3)? == 255);

    let tensor = Tensor::from_le_bytes(DType::Bool, Shape::from_slice(&[4]), raw)?;
    // Bool crosses the boundary as 0/1 regardless of the source byte.
    ensure!(tensor.at_flat::<bool>(0)? == 0);
    ensure!(tensor.at_flat::<bool>(1)? == 1);
    ensure!(tensor.at_flat::<bool>(3)? == 1);
    Ok(())
}

#[test]
fn raw_bytes_length_mismatch_is_invalid_shape() {
    let err = Tensor::from_le_bytes(
        DType::F64,
        Shape::from_slice(&[4]),
        Bytes::from_static(&[0u8; 16]),
    )
    .unwrap_err();
    assert!(matches!(err, TensorError::InvalidShape(_)));
}

#[test]
fn f16_is_declared_but_unimplemented() {
    assert_eq!(DType::from_tag(13), Some(DType::F16));
    assert_eq!(DType::F16.fixed_size(), Some(2));
    let err = Tensor::from_le_bytes(
        DType::F16,
        Shape::from_slice(&[2]),
        Bytes::from_static(&[0u8; 4]),
    )
    .unwrap_err();
    assert_eq!(err, TensorError::Unimplemented(DType::F16));
}

#[test]
fn multi_index_matches_row_major_flat_order() -> Result<()> {
    let data: Vec<i32> = (0..24).collect();
    let tensor = Tensor::from_vec(Shape::from_slice(&[2, 3, 4]), data)?;
    let mut flat = 0i64;
    for i in 0..2i64 {
        for j in 0..3i64 {
            for k in 0..4i64 {
                ensure!(tensor.at::<i32>(&[i, j, k])? == tensor.at_flat::<i32>(flat)?);
                flat += 1;
            }
        }
    }
    Ok(())
}

#[test]
fn scalar_tensor_reads_with_empty_index() {
    let tensor = Tensor::from_vec(Shape::scalar(), vec![42.0f64]).unwrap();
    assert_eq!(tensor.numel(), 1);
    assert_eq!(tensor.at::<f64>(&[]).unwrap(), 42.0);
    assert_eq!(tensor.at_flat::<f64>(0).unwrap(), 42.0);
}

#[test]
fn wrong_arity_is_a_rank_mismatch() {
    let tensor = Tensor::from_vec(Shape::from_slice(&[2, 3]), vec![0u16; 6]).unwrap();
    assert_eq!(
        tensor.at::<u16>(&[1]).unwrap_err(),
        TensorError::RankMismatch {
            expected: 2,
            actual: 1
        }
    );
}

#[test]
fn component_index_at_dimension_size_is_out_of_range() {
    let tensor = Tensor::from_vec(Shape::from_slice(&[2, 3]), vec![0u16; 6]).unwrap();
    assert_eq!(
        tensor.at::<u16>(&[1, 3]).unwrap_err(),
        TensorError::IndexOutOfRange { index: 3, limit: 3 }
    );
    assert_eq!(
        tensor.at::<u16>(&[-1, 0]).unwrap_err(),
        TensorError::IndexOutOfRange { index: -1, limit: 2 }
    );
    assert_eq!(
        tensor.at_flat::<u16>(6).unwrap_err(),
        TensorError::IndexOutOfRange { index: 6, limit: 6 }
    );
}

#[test]
fn typed_access_checks_the_dtype() {
    let tensor = Tensor::from_vec(Shape::from_slice(&[2]), vec![1.0f32, 2.0]).unwrap();
    assert_eq!(
        tensor.at_flat::<i32>(0).unwrap_err(),
        TensorError::DTypeMismatch {
            expected: DType::I32,
            actual: DType::F32
        }
    );
}

#[test]
fn flatlist_matches_flat_index_iteration() -> Result<()> {
    let data: Vec<f64> = (0..12).map(|v| v as f64 * 0.5).collect();
    let tensor = Tensor::from_vec(Shape::from_slice(&[3, 4]), data)?;
    let flat = tensor.to_flatlist::<f64>()?;
    ensure!(flat.len() == tensor.numel());
    for (i, value) in flat.iter().enumerate() {
        ensure!(*value == tensor.at_flat::<f64>(i as i64)?);
    }
    Ok(())
}

#[test]
fn const_fill_repeats_the_value() -> Result<()> {
    let tensor = Tensor::full(Shape::from_slice(&[4, 2]), 7i16)?;
    for i in 0..8 {
        ensure!(tensor.at_flat::<i16>(i)? == 7);
    }
    Ok(())
}

#[test]
fn random_fill_stays_within_inclusive_bounds() -> Result<()> {
    for _ in 0..10 {
        let tensor = Tensor::random::<i32>(Shape::from_slice(&[64]), -5, 5)?;
        for value in tensor.to_flatlist::<i32>()? {
            ensure!((-5..=5).contains(&value));
        }

        let tensor = Tensor::random::<f64>(Shape::from_slice(&[64]), 0.25, 0.75)?;
        for value in tensor.to_flatlist::<f64>()? {
            ensure!((0.25..=0.75).contains(&value));
        }
    }
    Ok(())
}

#[test]
fn string_tensor_round_trips_through_flatlist() {
    let values = vec!["a".to_string(), "bc".to_string(), String::new()];
    let tensor = Tensor::from_vec(Shape::from_slice(&[3]), values.clone()).unwrap();
    assert_eq!(tensor.dtype(), DType::Str);

    let flat = tensor.to_flatlist::<String>().unwrap();
    assert_eq!(flat.len(), 3);
    for (ptr, expected) in flat.into_iter().zip(&values) {
        let read = unsafe { std::ffi::CStr::from_ptr(ptr) }
            .to_string_lossy()
            .into_owned();
        assert_eq!(&read, expected);
        unsafe { drop(std::ffi::CString::from_raw(ptr)) };
    }
}
