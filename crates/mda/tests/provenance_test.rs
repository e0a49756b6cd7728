//! Integration tests for provenance descriptors and their resolution.
//!
//! These tests verify:
//! - `.prv` paths resolve through the checksum index or the verified hint
//! - A hint whose content does not match is never returned
//! - Failed resolution leaves the descriptor retrievable

use alopex_mda::provenance::resolve;
use alopex_mda::{
    BackendKind, DirectoryIndex, Mda, MdaConfig, MdaEnv, MdaError, NoIndex, Provenance,
    VirtualArray,
};
use std::fs;
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;

fn env_with(dir: &Path, index: Option<DirectoryIndex>) -> Arc<MdaEnv> {
    let env = MdaEnv::new(MdaConfig::with_temp_path(dir.join("cache"))).unwrap();
    match index {
        Some(index) => env.with_index(index).shared(),
        None => env.shared(),
    }
}

fn write_array(path: &Path, n: usize) -> Mda {
    let mda = Mda::from_vec(&[n], (0..n).map(|i| i as f64 * 1.5).collect()).unwrap();
    mda.write64(path).unwrap();
    mda
}

#[test]
fn test_prv_resolves_via_original_path() {
    let temp_dir = TempDir::new().unwrap();
    let data = temp_dir.path().join("data.mda");
    let mda = write_array(&data, 50);

    let prv = Provenance::for_file(&data, 1000).unwrap();
    let prv_path = temp_dir.path().join("data.mda.prv");
    prv.write_to(&prv_path).unwrap();

    let array = VirtualArray::open(&prv_path, env_with(temp_dir.path(), None)).unwrap();
    assert_eq!(array.backend_kind(), Some(BackendKind::LocalFile));
    assert_eq!(array.path(), Some(data));
    assert_eq!(array.provenance(), Some(&prv));
    assert_eq!(array.value(49), mda.value(49));
}

#[test]
fn test_prv_resolves_via_index_after_move() {
    let temp_dir = TempDir::new().unwrap();
    let store = temp_dir.path().join("store");
    fs::create_dir(&store).unwrap();
    let original = temp_dir.path().join("original.mda");
    write_array(&original, 20);
    let prv = Provenance::for_file(&original, 1000).unwrap();

    let moved = store.join("renamed.mda");
    fs::rename(&original, &moved).unwrap();

    let env = env_with(temp_dir.path(), Some(DirectoryIndex::new([&store])));
    let array = VirtualArray::from_provenance(prv, env).unwrap();
    assert_eq!(array.path(), Some(moved));
    assert_eq!(array.n1(), 20);
}

#[test]
fn test_mismatched_checksum_never_returns_hint() {
    let temp_dir = TempDir::new().unwrap();
    let data = temp_dir.path().join("data.mda");
    write_array(&data, 10);
    let prv = Provenance::for_file(&data, 1000).unwrap();

    // Same size, different content.
    let other = Mda::from_vec(&[10], vec![9.0f64; 10]).unwrap();
    other.write64(&data).unwrap();
    assert_eq!(fs::metadata(&data).unwrap().len(), prv.original_size);

    let result = resolve(&prv, &NoIndex);
    assert!(matches!(result, Err(MdaError::ResolutionFailed { .. })));
}

#[test]
fn test_failed_prv_keeps_descriptor() {
    let temp_dir = TempDir::new().unwrap();
    let prv = Provenance {
        original_path: temp_dir
            .path()
            .join("gone.mda")
            .to_string_lossy()
            .into_owned(),
        original_checksum: "0".repeat(40),
        original_fcs: String::new(),
        original_size: 100,
    };
    let prv_path = temp_dir.path().join("gone.prv");
    fs::write(&prv_path, prv.to_json().unwrap()).unwrap();

    let mut array = VirtualArray::new(env_with(temp_dir.path(), None));
    let result = array.set_path(&prv_path);
    assert!(matches!(result, Err(MdaError::ResolutionFailed { .. })));
    assert_eq!(array.backend_kind(), None);
    assert_eq!(array.provenance(), Some(&prv));
    assert_eq!(array.total_size(), 0);
}

#[test]
fn test_to_provenance_prefers_attached_descriptor() {
    let temp_dir = TempDir::new().unwrap();
    let data = temp_dir.path().join("data.mda");
    write_array(&data, 5);
    let env = env_with(temp_dir.path(), None);

    let mut array = VirtualArray::open(&data, env).unwrap();
    let derived = array.to_provenance().unwrap();
    assert_eq!(derived.original_path, data.to_string_lossy());
    assert_eq!(derived.original_size, fs::metadata(&data).unwrap().len());

    let attached = Provenance {
        original_path: "elsewhere".to_string(),
        ..derived.clone()
    };
    array.set_provenance(attached.clone());
    assert_eq!(array.to_provenance().unwrap(), attached);
}
