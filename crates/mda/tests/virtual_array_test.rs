//! Integration tests for VirtualArray across its three backends.
//!
//! These tests verify:
//! - Memory and LocalFile round trips
//! - Clipped chunk reads and zero fill
//! - Scalar reads agree with bulk reads
//! - Sticky open failures
//! - Remote reads over an in-memory byte source

use alopex_mda::{
    BackendKind, ByteSource, DataType, Mda, MdaConfig, MdaEnv, MdaError, VirtualArray,
};
use bytes::Bytes;
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;

fn test_env(dir: &Path) -> Arc<MdaEnv> {
    let config = MdaConfig {
        scalar_chunk_len: 7,
        download_chunk_size: 5,
        ..MdaConfig::with_temp_path(dir.join("cache"))
    };
    MdaEnv::new(config).unwrap().shared()
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

fn wave(dims: &[usize]) -> Mda {
    let total: usize = dims.iter().product();
    let values = (0..total).map(|i| (i as f64 * 0.37).sin() * 1000.0).collect();
    Mda::from_vec(dims, values).unwrap()
}

// ============================================================================
// Round trips
// ============================================================================

#[test]
fn test_memory_round_trip() {
    let temp_dir = TempDir::new().unwrap();
    let mda = wave(&[3, 4, 5]);
    let array = VirtualArray::from_mda(mda.clone(), test_env(temp_dir.path()));

    assert_eq!(array.backend_kind(), Some(BackendKind::Memory));
    assert_eq!(array.total_size(), 60);
    for i in 0..60 {
        assert_eq!(array.value(i), mda.value(i));
    }
}

#[test]
fn test_local_file_float64_exact() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("wave64.mda");
    let mda = wave(&[6, 9]);
    mda.write64(&path).unwrap();

    let array = VirtualArray::open(&path, test_env(temp_dir.path())).unwrap();
    assert_eq!(array.backend_kind(), Some(BackendKind::LocalFile));
    assert_eq!((array.n1(), array.n2(), array.n3()), (6, 9, 1));
    for i in 0..54 {
        assert_eq!(array.value(i), mda.value(i));
    }
}

#[test]
fn test_local_file_float32_within_rounding() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("wave32.mda");
    let mda = wave(&[10, 10]);
    mda.write32(&path).unwrap();

    let array = VirtualArray::open(&path, test_env(temp_dir.path())).unwrap();
    let header = array.header().unwrap();
    assert_eq!(header.data_type, DataType::Float32);

    for i in 0..100 {
        let expected = mda.value(i);
        assert!((array.value(i) - expected).abs() <= expected.abs() * 1e-6 + 1e-6);
    }

    // The 32-bit path returns the stored values unchanged.
    let chunk = array.read_chunk_f32(0, 100).unwrap();
    for i in 0..100 {
        assert_eq!(chunk.value(i), mda.value(i) as f32);
    }
}

#[test]
fn test_integer_storage_widened() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("counts.mda");
    let mda = Mda::from_vec(&[4], vec![1.0f64, -2.0, 300.0, 40000.0]).unwrap();
    mda.write(&path, DataType::Int32).unwrap();

    let array = VirtualArray::open(&path, test_env(temp_dir.path())).unwrap();
    assert_eq!(
        array.read_chunk(0, 4).unwrap().as_slice(),
        &[1.0, -2.0, 300.0, 40000.0]
    );
}

// ============================================================================
// Chunk reads
// ============================================================================

#[test]
fn test_read_chunk_clipped_and_zero_filled() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("wave.mda");
    let mda = wave(&[20]);
    mda.write64(&path).unwrap();
    let array = VirtualArray::open(&path, test_env(temp_dir.path())).unwrap();

    let chunk = array.read_chunk(-3, 6).unwrap();
    assert_eq!(chunk.total_size(), 6);
    assert_eq!(&chunk.as_slice()[..3], &[0.0, 0.0, 0.0]);
    assert_eq!(&chunk.as_slice()[3..], &mda.as_slice()[..3]);

    let chunk = array.read_chunk(18, 5).unwrap();
    assert_eq!(&chunk.as_slice()[..2], &mda.as_slice()[18..]);
    assert_eq!(&chunk.as_slice()[2..], &[0.0, 0.0, 0.0]);

    let chunk = array.read_chunk(100, 4).unwrap();
    assert_eq!(chunk.as_slice(), &[0.0; 4]);
}

#[test]
fn test_read_chunk_3d_full_leading_span() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("cube.mda");
    let mda = wave(&[2, 3, 4]);
    mda.write64(&path).unwrap();
    let array = VirtualArray::open(&path, test_env(temp_dir.path())).unwrap();

    let block = array.read_chunk_3d((0, 0, 2), (2, 3, 3)).unwrap();
    assert_eq!(block.dims(), [2, 3, 3, 1, 1, 1]);
    for i3 in 0..2 {
        for i2 in 0..3 {
            for i1 in 0..2 {
                assert_eq!(
                    block.value3(i1, i2, i3),
                    mda.value3(i1, i2, i3 + 2)
                );
            }
        }
    }
    assert_eq!(block.value3(1, 2, 2), 0.0);

    let result = array.read_chunk_3d((0, 1, 0), (2, 2, 1));
    assert!(matches!(
        result,
        Err(MdaError::UnsupportedRangeShape { .. })
    ));
}

fn counting(dims: &[usize]) -> Mda {
    let total: usize = dims.iter().product();
    Mda::from_vec(dims, (1..=total).map(|i| i as f64).collect()).unwrap()
}

fn remote_of(mda: &Mda, url: &str, env: Arc<MdaEnv>) -> VirtualArray {
    let mut buf = Vec::new();
    mda.write_to(&mut buf, DataType::Float64).unwrap();
    let source: Arc<dyn ByteSource> = Arc::new(Bytes::from(buf));
    VirtualArray::from_remote(url, source, env)
}

#[test]
fn test_read_chunk_2d_clips_at_trailing_dimension() {
    let temp_dir = TempDir::new().unwrap();
    let env = test_env(temp_dir.path());
    let mda = counting(&[2, 3, 4]);
    let path = temp_dir.path().join("counting.mda");
    mda.write64(&path).unwrap();

    let memory = VirtualArray::from_mda(mda.clone(), env.clone());
    let local = VirtualArray::open(&path, env.clone()).unwrap();
    let remote = remote_of(&mda, "mem://counting", env);

    let expected = [5.0, 6.0, 0.0, 0.0, 0.0, 0.0];
    for array in [&memory, &local, &remote] {
        let block = array.read_chunk_2d(0, 2, 2, 3).unwrap();
        assert_eq!(block.as_slice(), &expected);
    }

    let expected = [0.0, 0.0, 1.0, 2.0];
    for array in [&memory, &local, &remote] {
        let block = array.read_chunk_2d(0, -1, 2, 2).unwrap();
        assert_eq!(block.as_slice(), &expected);
    }

    for array in [&memory, &local, &remote] {
        let block = array.read_chunk_2d(0, 3, 2, 2).unwrap();
        assert_eq!(block.as_slice(), &[0.0; 4]);
    }
}

#[test]
fn test_read_chunk_3d_clips_at_trailing_dimension() {
    let temp_dir = TempDir::new().unwrap();
    let env = test_env(temp_dir.path());
    let mda = counting(&[2, 2, 3, 2]);
    let path = temp_dir.path().join("counting4d.mda");
    mda.write64(&path).unwrap();

    let memory = VirtualArray::from_mda(mda.clone(), env.clone());
    let local = VirtualArray::open(&path, env).unwrap();

    let from_memory = memory.read_chunk_3d((0, 0, 2), (2, 2, 2)).unwrap();
    let from_file = local.read_chunk_3d((0, 0, 2), (2, 2, 2)).unwrap();
    assert_eq!(
        from_file.as_slice(),
        &[9.0, 10.0, 11.0, 12.0, 0.0, 0.0, 0.0, 0.0]
    );
    assert_eq!(from_file, from_memory);
}

#[test]
fn test_sequential_scalar_reads_match_bulk_read() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("wave.mda");
    wave(&[5, 11]).write64(&path).unwrap();
    let array = VirtualArray::open(&path, test_env(temp_dir.path())).unwrap();

    let total = array.total_size();
    let bulk = array.read_chunk(0, total).unwrap();
    let scalars: Vec<f64> = (0..total as i64).map(|i| array.value(i)).collect();
    assert_eq!(scalars, bulk.into_vec());
}

#[test]
fn test_out_of_range_scalars_are_zero() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("wave.mda");
    let mda = wave(&[3, 4, 2]);
    mda.write64(&path).unwrap();
    let array = VirtualArray::open(&path, test_env(temp_dir.path())).unwrap();

    assert_eq!(array.value(-1), 0.0);
    assert_eq!(array.value(24), 0.0);
    assert_eq!(array.value2(3, 0), 0.0);
    assert_eq!(array.value2(0, 4), 0.0);
    assert_eq!(array.value3(0, 0, 2), 0.0);
    assert_eq!(array.value3(-1, 0, 0), 0.0);
    assert_eq!(array.value3(2, 3, 1), mda.value3(2, 3, 1));
}

// ============================================================================
// Failure handling
// ============================================================================

#[test]
fn test_open_failure_is_sticky_until_path_reset() {
    init_tracing();
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("later.mda");
    let mut array = VirtualArray::open(&path, test_env(temp_dir.path())).unwrap();

    assert_eq!(array.n1(), 0);
    assert!(matches!(
        array.read_chunk(0, 2),
        Err(MdaError::OpenFailed { .. })
    ));

    wave(&[2]).write64(&path).unwrap();
    assert!(matches!(
        array.read_chunk(0, 2),
        Err(MdaError::OpenFailed { .. })
    ));

    // Copies start Unopened and see the file.
    let copy = array.clone();
    assert_eq!(copy.n1(), 2);

    array.set_path(&path).unwrap();
    assert_eq!(array.n1(), 2);
}

#[test]
fn test_short_read_reported() {
    init_tracing();
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("cut.mda");
    wave(&[10]).write64(&path).unwrap();
    let bytes = std::fs::read(&path).unwrap();
    std::fs::write(&path, &bytes[..bytes.len() - 24]).unwrap();

    let array = VirtualArray::open(&path, test_env(temp_dir.path())).unwrap();
    assert!(matches!(
        array.read_chunk(0, 10),
        Err(MdaError::ShortRead { .. })
    ));
    assert!(array.read_chunk(0, 7).is_ok());
}

// ============================================================================
// Remote backend
// ============================================================================

#[test]
fn test_remote_reads_match_local() {
    let temp_dir = TempDir::new().unwrap();
    let mda = wave(&[4, 6]);
    let mut buf = Vec::new();
    mda.write_to(&mut buf, DataType::Float64).unwrap();
    let source: Arc<dyn ByteSource> = Arc::new(Bytes::from(buf));

    let array = VirtualArray::from_remote("mem://wave", source, test_env(temp_dir.path()));
    assert_eq!(array.backend_kind(), Some(BackendKind::Remote));
    assert_eq!(array.dims().unwrap(), [4, 6, 1, 1, 1, 1]);

    let block = array.read_chunk_2d(0, 1, 4, 3).unwrap();
    for i2 in 0..3 {
        for i1 in 0..4 {
            assert_eq!(block.value2(i1, i2), mda.value2(i1, i2 + 1));
        }
    }
    for i in 0..24 {
        assert_eq!(array.value(i), mda.value(i));
    }
    assert!(array.read_chunk_2d(1, 0, 3, 1).is_err());
}

#[test]
fn test_remote_download_chunk_size_through_handle() {
    let temp_dir = TempDir::new().unwrap();
    let env = test_env(temp_dir.path());
    let mda = wave(&[3, 7]);
    let mut remote = remote_of(&mda, "mem://wave", env.clone());

    assert_eq!(remote.download_chunk_size(), Some(5));
    remote.set_download_chunk_size(2);
    assert_eq!(remote.download_chunk_size(), Some(2));
    assert_eq!(remote.clone().download_chunk_size(), Some(2));
    assert_eq!(remote.read_chunk(0, 21).unwrap().as_slice(), mda.as_slice());

    let mut memory = VirtualArray::from_mda(mda, env);
    memory.set_download_chunk_size(2);
    assert_eq!(memory.download_chunk_size(), None);
}

#[test]
fn test_remote_make_path_downloads_once() {
    let temp_dir = TempDir::new().unwrap();
    let mda = wave(&[4, 6]);
    let mut buf = Vec::new();
    mda.write_to(&mut buf, DataType::Float32).unwrap();
    let source: Arc<dyn ByteSource> = Arc::new(Bytes::from(buf.clone()));
    let env = test_env(temp_dir.path());

    let array = VirtualArray::from_remote("mem://wave32", source, env.clone());
    let path = array.make_path().unwrap();
    assert!(path.starts_with(temp_dir.path().join("cache").join("tmp_long_term")));
    assert_eq!(std::fs::read(&path).unwrap(), buf);

    let again = array.clone().make_path().unwrap();
    assert_eq!(again, path);

    let local = VirtualArray::open(&path, env).unwrap();
    assert_eq!(local.value(5), mda.value(5) as f32 as f64);
}
