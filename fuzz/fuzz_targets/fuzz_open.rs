#![no_main]
use libfuzzer_sys::fuzz_target;
use vaultfs::{ContainerConfig, Volume};

// Arbitrary bytes as a volume file: opening must fail cleanly or succeed,
// never panic or allocate without bound
fuzz_target!(|data: &[u8]| {
    let dir = match tempfile::TempDir::new() {
        Ok(d) => d,
        Err(_) => return,
    };
    let path = dir.path().join("fuzz.vfs");
    if std::fs::write(&path, data).is_err() {
        return;
    }

    if let Ok(mut volume) = Volume::open(&path, &ContainerConfig::default()) {
        let _ = volume.directories();
        let _ = volume.files();
        let _ = volume.stats();
    }
});
