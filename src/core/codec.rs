//! Little-endian field codec for fixed binary layouts

/// Sequential little-endian reader over a byte slice.
///
/// Callers size their buffers from the record layout, so reads past the end
/// are layout bugs and panic.
pub struct FieldReader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> FieldReader<'a> {
    pub fn new(bytes: &'a [u8]) -> Self {
        FieldReader { bytes, pos: 0 }
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn take(&mut self, len: usize) -> &'a [u8] {
        let slice = &self.bytes[self.pos..self.pos + len];
        self.pos += len;
        slice
    }

    pub fn skip(&mut self, len: usize) {
        self.pos += len;
    }

    pub fn u32(&mut self) -> u32 {
        let mut buf = [0u8; 4];
        buf.copy_from_slice(self.take(4));
        u32::from_le_bytes(buf)
    }

    pub fn i32(&mut self) -> i32 {
        let mut buf = [0u8; 4];
        buf.copy_from_slice(self.take(4));
        i32::from_le_bytes(buf)
    }

    pub fn i64(&mut self) -> i64 {
        let mut buf = [0u8; 8];
        buf.copy_from_slice(self.take(8));
        i64::from_le_bytes(buf)
    }

    pub fn array<const N: usize>(&mut self) -> [u8; N] {
        let mut buf = [0u8; N];
        buf.copy_from_slice(self.take(N));
        buf
    }
}

/// Sequential little-endian writer into a pre-sized byte slice.
pub struct FieldWriter<'a> {
    bytes: &'a mut [u8],
    pos: usize,
}

impl<'a> FieldWriter<'a> {
    pub fn new(bytes: &'a mut [u8]) -> Self {
        FieldWriter { bytes, pos: 0 }
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn put(&mut self, data: &[u8]) {
        self.bytes[self.pos..self.pos + data.len()].copy_from_slice(data);
        self.pos += data.len();
    }

    pub fn skip(&mut self, len: usize) {
        self.pos += len;
    }

    pub fn u32(&mut self, value: u32) {
        self.put(&value.to_le_bytes());
    }

    pub fn i32(&mut self, value: i32) {
        self.put(&value.to_le_bytes());
    }

    pub fn i64(&mut self, value: i64) {
        self.put(&value.to_le_bytes());
    }
}

/// Copy `name` into a zero-filled fixed field, truncating at a char boundary.
pub fn encode_name<const N: usize>(name: &str) -> [u8; N] {
    let mut out = [0u8; N];
    let mut end = name.len().min(N);
    while !name.is_char_boundary(end) {
        end -= 1;
    }
    out[..end].copy_from_slice(&name.as_bytes()[..end]);
    out
}

/// Decode a zero-terminated fixed name field.
pub fn decode_name(field: &[u8]) -> String {
    let end = field.iter().position(|&b| b == 0).unwrap_or(field.len());
    String::from_utf8_lossy(&field[..end]).into_owned()
}
