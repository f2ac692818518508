//! Property-based tests for file streams
//!
//! Random payloads through the data cluster chain, and chain length staying
//! in step with the file size across resizes.

use proptest::prelude::*;
use std::io::SeekFrom;
use tempfile::TempDir;
use vaultfs::{ContainerConfig, Volume};

const CLUSTER_SIZE: usize = 1024;

fn fresh_volume(dir: &TempDir) -> Volume {
    let config = ContainerConfig::default().with_cluster_size(CLUSTER_SIZE);
    Volume::create(dir.path().join("prop.vfs"), "PROP", &config).unwrap()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn prop_write_then_read_round_trips(
        data in prop::collection::vec(any::<u8>(), 0..=10 * CLUSTER_SIZE)
    ) {
        let dir = TempDir::new().unwrap();
        let mut volume = fresh_volume(&dir);
        volume.touch("payload").unwrap();

        {
            let mut stream = volume.file_stream("payload").unwrap();
            prop_assert_eq!(stream.write(&data).unwrap(), data.len());
            prop_assert_eq!(stream.len(), data.len() as u64);
            let expected_clusters = stream.clusters_for(data.len() as u64);
            prop_assert_eq!(stream.node().cluster_count(), expected_clusters);

            stream.seek(SeekFrom::Start(0)).unwrap();
            let back = stream.read_to_end().unwrap();
            prop_assert_eq!(&back, &data);
            stream.flush().unwrap();
        }

        // And again from disk
        let config = ContainerConfig::default().with_cluster_size(CLUSTER_SIZE);
        volume.close().unwrap();
        let mut reopened = Volume::open(dir.path().join("prop.vfs"), &config).unwrap();
        prop_assert_eq!(reopened.read_file("payload").unwrap(), data);
    }

    #[test]
    fn prop_shrink_and_regrow_keeps_cluster_count(
        original in 0u64..(8 * CLUSTER_SIZE as u64),
        smaller_ratio in 0.0f64..1.0
    ) {
        let dir = TempDir::new().unwrap();
        let mut volume = fresh_volume(&dir);
        let data: Vec<u8> = (0..original).map(|i| (i % 253) as u8 + 1).collect();
        volume.copy(&mut data.as_slice(), "resized").unwrap();
        let smaller = (original as f64 * smaller_ratio) as u64;

        let mut stream = volume.file_stream("resized").unwrap();
        for len in [smaller, original] {
            stream.set_length(len).unwrap();
            prop_assert_eq!(stream.len(), len);
            prop_assert_eq!(stream.node().cluster_count(), stream.clusters_for(len));
            prop_assert!(stream.node().chain_is_consistent());
        }

        // Prefix survives, regrown tail reads back as zeros
        stream.seek(SeekFrom::Start(0)).unwrap();
        let back = stream.read_to_end().unwrap();
        let cut = smaller as usize;
        prop_assert_eq!(&back[..cut], &data[..cut]);
        prop_assert!(back[cut..].iter().all(|&b| b == 0));
    }

    #[test]
    fn prop_random_patches_match_model(
        patches in prop::collection::vec(
            (0u64..(4 * CLUSTER_SIZE as u64), prop::collection::vec(any::<u8>(), 1..600)),
            1..12
        )
    ) {
        let dir = TempDir::new().unwrap();
        let mut volume = fresh_volume(&dir);
        volume.touch("model").unwrap();
        let mut model: Vec<u8> = Vec::new();

        for (offset, bytes) in &patches {
            volume.patch("model", *offset, bytes).unwrap();
            let end = *offset as usize + bytes.len();
            if model.len() < end {
                model.resize(end, 0);
            }
            model[*offset as usize..end].copy_from_slice(bytes);
        }

        prop_assert_eq!(volume.read_file("model").unwrap(), model);
    }
}

#[test]
fn test_seek_past_end_grows_chain() {
    let dir = TempDir::new().unwrap();
    let mut volume = fresh_volume(&dir);
    volume.touch("sparse").unwrap();

    let mut stream = volume.file_stream("sparse").unwrap();
    let usable = stream.usable_cluster_size() as u64;
    assert_eq!(stream.seek(SeekFrom::Start(usable * 3)).unwrap(), usable * 3);
    assert_eq!(stream.node().cluster_count(), 4);
    assert_eq!(stream.len(), 0);
    assert_eq!(stream.read_to_end().unwrap(), Vec::<u8>::new());

    stream.write(b"tail").unwrap();
    assert_eq!(stream.len(), usable * 3 + 4);
    assert_eq!(stream.node().cluster_count(), 4);

    assert_eq!(stream.seek(SeekFrom::End(-4)).unwrap(), usable * 3);
    assert_eq!(stream.read_to_end().unwrap(), b"tail");
    assert!(stream.seek(SeekFrom::Current(-(usable as i64) * 10)).is_err());
}
