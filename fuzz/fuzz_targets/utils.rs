pub const MAX_INPUT_SIZE: usize = 256 * 1024;

/// Caps fuzzer input so deeply nested JSON cannot blow the stack or memory.
#[inline]
pub fn truncate(data: &[u8]) -> &[u8] {
    &data[..data.len().min(MAX_INPUT_SIZE)]
}
