//! Little-endian field access inside sector buffers.

pub(crate) fn get_u32(buf: &[u8], offset: usize) -> u32 {
    let mut word = [0; 4];
    word.copy_from_slice(&buf[offset..offset + 4]);
    u32::from_le_bytes(word)
}

pub(crate) fn put_u32(buf: &mut [u8], offset: usize, value: u32) {
    buf[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
}
