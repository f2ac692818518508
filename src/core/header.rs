use crate::codec::{decode_name, encode_name, FieldReader, FieldWriter};
use crate::error::{Result, VfsError};
use crate::hash::signature_of;
use crate::node::{now_millis, NAME_LEN};
use std::io::{Read, Seek, SeekFrom, Write};

pub const HEADER_SIGNATURE: u32 = signature_of("Header");
pub const CURRENT_VERSION: u32 = 1;
pub const DEFAULT_CLUSTER_SIZE: usize = 32768;

/// Fixed prefix up to and including `container_count`
const FIXED_PREFIX: usize = 64;

/// `cluster_map_count`, `cluster_size`, `crc`
const FIXED_SUFFIX: usize = 12;

/// Upper bound on container records, checked before sizing any buffer
pub const MAX_CONTAINERS: usize = 4096;

fn container_count(raw: i32) -> Result<usize> {
    usize::try_from(raw)
        .ok()
        .filter(|&count| count <= MAX_CONTAINERS)
        .ok_or_else(|| VfsError::InvalidHeader(format!("Container count {} out of range", raw)))
}

/// Container header (offset 0)
///
/// Plaintext and CRC protected. Its size depends on the number of container
/// records, which is why every other offset is derived from it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    version: u32,
    build: i32,
    name: [u8; NAME_LEN],
    created: i64,
    modified: i64,
    container_sizes: Vec<i32>,
    cluster_map_count: i32,
    cluster_size: i32,
    dirty: bool,
}

impl Header {
    pub fn new(cluster_size: usize, cluster_map_count: usize, container_sizes: &[usize], build: i32) -> Self {
        let now = now_millis();
        Header {
            version: CURRENT_VERSION,
            build,
            name: [0u8; NAME_LEN],
            created: now,
            modified: now,
            container_sizes: container_sizes.iter().map(|&s| s as i32).collect(),
            cluster_map_count: cluster_map_count as i32,
            cluster_size: cluster_size as i32,
            dirty: true,
        }
    }

    /// Encoded size including the trailing CRC
    pub fn size(&self) -> usize {
        Self::size_for(self.container_sizes.len())
    }

    pub const fn size_for(container_count: usize) -> usize {
        FIXED_PREFIX + container_count * 4 + FIXED_SUFFIX
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    pub fn build(&self) -> i32 {
        self.build
    }

    pub fn name(&self) -> String {
        decode_name(&self.name)
    }

    pub fn created(&self) -> i64 {
        self.created
    }

    pub fn modified(&self) -> i64 {
        self.modified
    }

    pub fn container_count(&self) -> usize {
        self.container_sizes.len()
    }

    pub fn container_size(&self, index: usize) -> Option<usize> {
        self.container_sizes.get(index).map(|&s| s as usize)
    }

    pub fn container_sizes(&self) -> impl Iterator<Item = usize> + '_ {
        self.container_sizes.iter().map(|&s| s as usize)
    }

    pub fn cluster_map_count(&self) -> usize {
        self.cluster_map_count as usize
    }

    pub fn cluster_size(&self) -> usize {
        self.cluster_size as usize
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    fn changed(&mut self) {
        self.dirty = true;
        self.modified = now_millis();
    }

    pub fn set_name(&mut self, name: &str) {
        self.name = encode_name(name);
        self.changed();
    }

    pub fn set_build(&mut self, build: i32) {
        self.build = build;
        self.changed();
    }

    /// Stamp `modified` without any other change
    pub fn touch(&mut self) {
        self.changed();
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = vec![0u8; self.size()];
        let mut w = FieldWriter::new(&mut buf);
        w.u32(HEADER_SIGNATURE);
        w.u32(self.version);
        w.i32(self.build);
        w.put(&self.name);
        w.i64(self.created);
        w.i64(self.modified);
        w.i32(self.container_sizes.len() as i32);
        for &size in &self.container_sizes {
            w.i32(size);
        }
        w.i32(self.cluster_map_count);
        w.i32(self.cluster_size);

        let body_len = w.position();
        let crc = crc32fast::hash(&buf[..body_len]);
        buf[body_len..].copy_from_slice(&crc.to_le_bytes());
        buf
    }

    /// Parse a complete header image (`prefix` plus variable tail)
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < FIXED_PREFIX {
            return Err(VfsError::InvalidHeader("Header truncated".to_string()));
        }

        let mut r = FieldReader::new(bytes);
        let signature = r.u32();
        if signature != HEADER_SIGNATURE {
            return Err(VfsError::SignatureMismatch {
                offset: 0,
                expected: HEADER_SIGNATURE,
                found: signature,
            });
        }

        let version = r.u32();
        if version > CURRENT_VERSION {
            return Err(VfsError::UnsupportedVersion(version));
        }

        let build = r.i32();
        let name = r.array::<NAME_LEN>();
        let created = r.i64();
        let modified = r.i64();
        let count = container_count(r.i32())?;

        if bytes.len() < Self::size_for(count) {
            return Err(VfsError::InvalidHeader("Header truncated".to_string()));
        }

        let container_sizes = (0..count).map(|_| r.i32()).collect();
        let cluster_map_count = r.i32();
        let cluster_size = r.i32();

        let body_len = r.position();
        let stored = r.u32();
        let computed = crc32fast::hash(&bytes[..body_len]);
        if stored != computed {
            return Err(VfsError::CrcMismatch {
                offset: 0,
                stored,
                computed,
            });
        }

        Ok(Header {
            version,
            build,
            name,
            created,
            modified,
            container_sizes,
            cluster_map_count,
            cluster_size,
            dirty: false,
        })
    }

    /// Read and verify the header at offset 0
    pub fn read<H: Read + Seek>(handle: &mut H) -> Result<Self> {
        handle.seek(SeekFrom::Start(0))?;
        let mut buf = vec![0u8; FIXED_PREFIX];
        handle.read_exact(&mut buf)?;

        if FieldReader::new(&buf).u32() != HEADER_SIGNATURE {
            return Self::from_bytes(&buf);
        }

        let count = container_count(FieldReader::new(&buf[FIXED_PREFIX - 4..]).i32())?;
        buf.resize(Self::size_for(count), 0);
        handle.read_exact(&mut buf[FIXED_PREFIX..])?;

        Self::from_bytes(&buf)
    }

    /// Write unconditionally with a fresh CRC
    pub fn write<H: Write + Seek>(&mut self, handle: &mut H) -> Result<()> {
        handle.seek(SeekFrom::Start(0))?;
        handle.write_all(&self.to_bytes())?;
        self.dirty = false;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn sample() -> Header {
        let mut header = Header::new(DEFAULT_CLUSTER_SIZE, 2, &[64, 128], 7);
        header.set_name("VOL");
        header
    }

    #[test]
    fn test_header_size() {
        assert_eq!(Header::size_for(0), 76);
        assert_eq!(sample().size(), 84);
        assert_eq!(sample().to_bytes().len(), 84);
    }

    #[test]
    fn test_header_round_trip() {
        let mut header = sample();
        let mut disk = Cursor::new(Vec::new());
        header.write(&mut disk).unwrap();
        assert!(!header.is_dirty());

        let loaded = Header::read(&mut disk).unwrap();
        assert_eq!(loaded, header);
        assert_eq!(loaded.name(), "VOL");
        assert_eq!(loaded.container_size(1), Some(128));
        assert_eq!(loaded.cluster_map_count(), 2);
    }

    #[test]
    fn test_setter_marks_dirty_and_stamps_modified() {
        let mut header = sample();
        let mut disk = Cursor::new(Vec::new());
        header.write(&mut disk).unwrap();

        let before = header.modified();
        header.set_build(8);
        assert!(header.is_dirty());
        assert!(header.modified() >= before);
    }

    #[test]
    fn test_invalid_signature() {
        let mut bytes = sample().to_bytes();
        bytes[0] ^= 0xff;
        assert!(matches!(
            Header::from_bytes(&bytes),
            Err(VfsError::SignatureMismatch { .. })
        ));
    }

    #[test]
    fn test_newer_version_rejected() {
        let mut bytes = sample().to_bytes();
        bytes[4..8].copy_from_slice(&(CURRENT_VERSION + 1).to_le_bytes());
        assert!(matches!(
            Header::from_bytes(&bytes),
            Err(VfsError::UnsupportedVersion(v)) if v == CURRENT_VERSION + 1
        ));
    }

    #[test]
    fn test_corrupted_field_fails_crc() {
        let mut bytes = sample().to_bytes();
        bytes[20] ^= 0x01;
        assert!(matches!(
            Header::from_bytes(&bytes),
            Err(VfsError::CrcMismatch { .. })
        ));
    }
}
