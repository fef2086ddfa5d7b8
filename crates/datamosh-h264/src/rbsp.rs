//! Raw Byte Sequence Payload extraction.

/// Remove emulation prevention bytes from a NAL payload.
///
/// Every `0x00 0x00 0x03` triple keeps its two zero bytes and drops the
/// `0x03`; scanning resumes after the dropped byte. Input without such
/// triples is returned unchanged.
pub fn extract_rbsp(payload: &[u8]) -> Vec<u8> {
    let mut rbsp = Vec::with_capacity(payload.len());
    let mut i = 0;

    while i < payload.len() {
        if i + 2 < payload.len()
            && payload[i] == 0x00
            && payload[i + 1] == 0x00
            && payload[i + 2] == 0x03
        {
            rbsp.push(0x00);
            rbsp.push(0x00);
            i += 3;
        } else {
            rbsp.push(payload[i]);
            i += 1;
        }
    }

    rbsp
}
