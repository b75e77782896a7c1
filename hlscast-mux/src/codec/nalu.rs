use {
    byteorder::{BigEndian, ByteOrder},
    bytes::{BufMut, BytesMut},
};

pub const START_CODE: [u8; 4] = [0x00, 0x00, 0x00, 0x01];

/// Length field size used by MP4-style length-prefixed NAL streams.
pub const DEFAULT_NAL_LENGTH_SIZE: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NaluFraming {
    AnnexB,
    LengthPrefixed,
}

/// Whether `data` is consumed exactly by a walk of `length_size`-byte length fields.
#[must_use]
pub fn is_length_prefixed(data: &[u8], length_size: usize) -> bool {
    if data.is_empty() || !(1..=4).contains(&length_size) {
        return false;
    }
    let mut offset = 0;
    while offset < data.len() {
        if offset + length_size > data.len() {
            return false;
        }
        let declared = BigEndian::read_uint(&data[offset..], length_size) as usize;
        offset += length_size;
        if declared == 0 || declared > data.len() - offset {
            return false;
        }
        offset += declared;
    }
    true
}

/// A 4-byte start code is always Annex-B. A 3-byte one is also what a 4-byte length
/// field of 256..=511 looks like, so it only counts when the length walk fails.
#[must_use]
pub fn detect_framing(data: &[u8], length_size: usize) -> NaluFraming {
    if data.starts_with(&START_CODE)
        || (data.starts_with(&[0x00, 0x00, 0x01]) && !is_length_prefixed(data, length_size))
    {
        NaluFraming::AnnexB
    } else {
        NaluFraming::LengthPrefixed
    }
}

/// Split an Annex-B buffer into NAL units (start codes stripped).
#[must_use]
pub fn split_annexb(data: &[u8]) -> Vec<&[u8]> {
    let mut payload_starts = Vec::new();
    let mut i = 0;
    while i + 3 <= data.len() {
        if data[i] == 0 && data[i + 1] == 0 && data[i + 2] == 1 {
            payload_starts.push(i + 3);
            i += 3;
        } else {
            i += 1;
        }
    }

    let mut nalus = Vec::with_capacity(payload_starts.len());
    for (idx, &begin) in payload_starts.iter().enumerate() {
        let mut end = payload_starts
            .get(idx + 1)
            .map_or(data.len(), |next| next - 3);
        // zero bytes in front of the next start code belong to it (4-byte form)
        while end > begin && data[end - 1] == 0 {
            end -= 1;
        }
        if end > begin {
            nalus.push(&data[begin..end]);
        }
    }
    nalus
}

/// Split a length-prefixed buffer into NAL units.
///
/// Stops at the first zero or overrunning length field; everything before it is kept.
#[must_use]
pub fn split_length_prefixed(data: &[u8], length_size: usize) -> Vec<&[u8]> {
    let mut nalus = Vec::new();
    let mut offset = 0;
    while offset + length_size <= data.len() {
        let declared = BigEndian::read_uint(&data[offset..], length_size) as usize;
        offset += length_size;
        if declared == 0 || declared > data.len() - offset {
            tracing::debug!(
                declared,
                remaining = data.len() - offset,
                "Truncating malformed length-prefixed access unit"
            );
            break;
        }
        nalus.push(&data[offset..offset + declared]);
        offset += declared;
    }
    nalus
}

/// Split either framing, auto-detected.
#[must_use]
pub fn split_nalus(data: &[u8], length_size: usize) -> Vec<&[u8]> {
    match detect_framing(data, length_size) {
        NaluFraming::AnnexB => split_annexb(data),
        NaluFraming::LengthPrefixed => split_length_prefixed(data, length_size),
    }
}

pub fn write_annexb(out: &mut BytesMut, nalu: &[u8]) {
    out.reserve(START_CODE.len() + nalu.len());
    out.put_slice(&START_CODE);
    out.put_slice(nalu);
}
