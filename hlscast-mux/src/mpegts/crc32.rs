// MPEG-2 CRC-32 (ISO/IEC 13818-1 Annex A): polynomial 0x04C11DB7, MSB first,
// no input/output reflection, no final xor.

const CRC32_POLY: u32 = 0x04C1_1DB7;

static CRC32_TABLE: [u32; 256] = {
    let mut table = [0u32; 256];
    let mut i = 0;
    while i < 256 {
        let mut crc = (i as u32) << 24;
        let mut bit = 0;
        while bit < 8 {
            if crc & 0x8000_0000 != 0 {
                crc = (crc << 1) ^ CRC32_POLY;
            } else {
                crc <<= 1;
            }
            bit += 1;
        }
        table[i] = crc;
        i += 1;
    }
    table
};

/// Continue a CRC computation; sections start from `0xffffffff`.
#[must_use]
pub fn gen_crc32(crc: u32, data: &[u8]) -> u32 {
    data.iter().fold(crc, |crc, &byte| {
        (crc << 8) ^ CRC32_TABLE[((crc >> 24) ^ u32::from(byte)) as usize]
    })
}
