/// CRC-16-CCITT over a byte sequence: initial value `0xFFFF`, polynomial
/// `0x1021`, MSB first, no reflection, no final XOR.
///
/// Both directions of the control protocol checksum the packet prefix
/// (header, command id, data length and payload) with this routine; the
/// checksum field itself is never included.
pub fn crc16(bytes: &[u8]) -> u16 {
    let mut crc = 0xFFFFu16;

    for byte in bytes {
        crc ^= (*byte as u16) << 8;

        for _ in 0..8 {
            crc = if crc & 0x8000 != 0 {
                (crc << 1) ^ 0x1021
            } else {
                crc << 1
            };
        }
    }

    crc
}
