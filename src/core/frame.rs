//! Signed, CRC-protected, optionally encrypted record framing
//!
//! Every record except the header shares one on-disk frame:
//!
//! ```text
//! ┌───────────┬─────────┬──────────────────────────┬─────────┬──────────┐
//! │ signature │ index   │ payload (16-byte blocks) │ crc     │ zero     │
//! │ u32       │ i32     │ plaintext or AES-CBC     │ u32     │ fill     │
//! └───────────┴─────────┴──────────────────────────┴─────────┴──────────┘
//! ```
//!
//! The CRC covers signature, index and the plaintext payload, so it is
//! computed before encryption on write and after decryption on read.

use crate::cipher::{block_floor, Cipher};
use crate::codec::{FieldReader, FieldWriter};
use crate::error::{Result, VfsError};
use std::io::{Read, Seek, SeekFrom, Write};

/// Signature + index + crc
pub const FRAME_OVERHEAD: usize = 12;

const PAYLOAD_START: usize = 8;

/// A record kind that can be framed onto disk.
///
/// Lower layers never log; failures surface as [`VfsError`].
pub trait Persistable {
    /// Static per-kind signature (see [`crate::hash::signature_of`])
    const SIGNATURE: u32;

    /// Whether the payload passes through the cipher
    const ENCRYPTED: bool;

    /// Position of this record within its region
    fn index(&self) -> i32;

    fn is_dirty(&self) -> bool;

    fn set_dirty(&mut self, dirty: bool);

    /// Decode kind-specific fields from a verified plaintext payload
    fn read_user_data(&mut self, payload: &[u8]) -> Result<()>;

    /// Encode kind-specific fields into a zero-filled payload
    fn write_user_data(&self, payload: &mut [u8]);
}

/// Usable payload bytes in a record of `record_len` bytes
pub const fn payload_capacity(record_len: usize) -> usize {
    block_floor(record_len.saturating_sub(FRAME_OVERHEAD))
}

/// CRC-32 over signature, index and plaintext payload
pub fn user_data_crc(signature: u32, index: i32, payload: &[u8]) -> u32 {
    let mut hasher = crc32fast::Hasher::new();
    hasher.update(&signature.to_le_bytes());
    hasher.update(&index.to_le_bytes());
    hasher.update(payload);
    hasher.finalize()
}

/// Read and verify one record into `target`.
///
/// Nothing is decoded into `target` unless signature, CRC and index all
/// check out.
pub fn read_record<H, T>(
    handle: &mut H,
    offset: u64,
    record_len: usize,
    cipher: &Cipher,
    target: &mut T,
) -> Result<()>
where
    H: Read + Seek,
    T: Persistable,
{
    handle.seek(SeekFrom::Start(offset))?;
    let mut buf = vec![0u8; record_len];
    handle.read_exact(&mut buf)?;

    let payload_len = payload_capacity(record_len);
    let (head, rest) = buf.split_at_mut(PAYLOAD_START);
    let (payload, tail) = rest.split_at_mut(payload_len);

    let mut r = FieldReader::new(head);
    let signature = r.u32();
    let index = r.i32();

    if signature != T::SIGNATURE {
        return Err(VfsError::SignatureMismatch {
            offset,
            expected: T::SIGNATURE,
            found: signature,
        });
    }

    if T::ENCRYPTED {
        cipher.decrypt(payload)?;
    }

    let stored = FieldReader::new(tail).u32();
    let computed = user_data_crc(signature, index, payload);
    if stored != computed {
        return Err(VfsError::CrcMismatch {
            offset,
            stored,
            computed,
        });
    }

    if index != target.index() {
        return Err(VfsError::MisplacedRecord {
            offset,
            expected: target.index(),
            found: index,
        });
    }

    target.read_user_data(payload)?;
    target.set_dirty(false);
    Ok(())
}

/// Write `source` if dirty. Returns whether anything was written.
pub fn write_record<H, T>(
    handle: &mut H,
    offset: u64,
    record_len: usize,
    cipher: &Cipher,
    source: &mut T,
) -> Result<bool>
where
    H: Write + Seek,
    T: Persistable,
{
    if !source.is_dirty() {
        return Ok(false);
    }

    let buf = encode_record(record_len, cipher, source)?;
    handle.seek(SeekFrom::Start(offset))?;
    handle.write_all(&buf)?;

    source.set_dirty(false);
    Ok(true)
}

fn encode_record<T: Persistable>(record_len: usize, cipher: &Cipher, source: &T) -> Result<Vec<u8>> {
    let payload_len = payload_capacity(record_len);
    let mut buf = vec![0u8; record_len];

    let (head, rest) = buf.split_at_mut(PAYLOAD_START);
    let (payload, tail) = rest.split_at_mut(payload_len);

    let mut w = FieldWriter::new(head);
    w.u32(T::SIGNATURE);
    w.i32(source.index());

    source.write_user_data(payload);
    let crc = user_data_crc(T::SIGNATURE, source.index(), payload);

    if T::ENCRYPTED {
        cipher.encrypt(payload)?;
    }

    FieldWriter::new(tail).u32(crc);
    Ok(buf)
}
