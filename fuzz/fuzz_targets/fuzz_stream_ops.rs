#![no_main]
use libfuzzer_sys::{arbitrary::Arbitrary, fuzz_target};
use std::io::SeekFrom;
use vaultfs::{ContainerConfig, Volume};

#[derive(Debug, Arbitrary)]
enum StreamOp {
    Write(Vec<u8>),
    Seek(u16),
    SetLength(u16),
    Read(u16),
}

// Stream operations checked against an in-memory model of the file
fuzz_target!(|ops: Vec<StreamOp>| {
    let dir = match tempfile::TempDir::new() {
        Ok(d) => d,
        Err(_) => return,
    };
    let config = ContainerConfig::default().with_cluster_size(1024);
    let mut volume = match Volume::create(dir.path().join("ops.vfs"), "FUZZ", &config) {
        Ok(v) => v,
        Err(_) => return,
    };
    if volume.touch("target").is_err() {
        return;
    }

    let mut stream = volume.file_stream("target").unwrap();
    let mut model: Vec<u8> = Vec::new();
    let mut position = 0usize;

    for op in ops.iter().take(64) {
        match op {
            StreamOp::Write(bytes) if bytes.is_empty() => {}
            StreamOp::Write(bytes) => {
                stream.write(bytes).unwrap();
                let end = position + bytes.len();
                if model.len() < end {
                    model.resize(end, 0);
                }
                model[position..position + bytes.len()].copy_from_slice(bytes);
                position = end;
            }
            StreamOp::Seek(to) => {
                position = stream.seek(SeekFrom::Start(*to as u64)).unwrap() as usize;
            }
            StreamOp::SetLength(len) => {
                stream.set_length(*len as u64).unwrap();
                model.resize(*len as usize, 0);
            }
            StreamOp::Read(len) => {
                let mut buf = vec![0u8; *len as usize];
                let n = stream.read(&mut buf).unwrap();
                let expected = model.get(position..).map_or(0, |rest| rest.len().min(buf.len()));
                assert_eq!(n, expected);
                assert_eq!(&buf[..n], &model[position..position + n]);
                position += n;
            }
        }
        assert_eq!(stream.len() as usize, model.len());
    }
});
