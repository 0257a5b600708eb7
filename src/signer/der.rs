//! Minimal DER encoding and decoding.
//!
//! Only what the signature block needs: definite-length TLVs, a handful of
//! universal types, and a reader that walks a certificate's top-level
//! structure without interpreting it.

use thiserror::Error;

pub const TAG_INTEGER: u8 = 0x02;
pub const TAG_OCTET_STRING: u8 = 0x04;
pub const TAG_NULL: u8 = 0x05;
pub const TAG_OID: u8 = 0x06;
pub const TAG_SEQUENCE: u8 = 0x30;
pub const TAG_SET: u8 = 0x31;
/// Context-specific, constructed, tag number 0.
pub const TAG_CONTEXT_0: u8 = 0xA0;

/// Malformed DER input.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("malformed DER: {0}")]
pub struct DerError(pub &'static str);

/// Encode a tag-length-value triple.
pub fn tlv(tag: u8, content: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(content.len() + 6);
    out.push(tag);
    let len = content.len();
    if len < 0x80 {
        out.push(len as u8);
    } else {
        let bytes = len.to_be_bytes();
        let skip = bytes.iter().take_while(|b| **b == 0).count();
        out.push(0x80 | (bytes.len() - skip) as u8);
        out.extend_from_slice(&bytes[skip..]);
    }
    out.extend_from_slice(content);
    out
}

/// SEQUENCE of already-encoded elements.
pub fn sequence(parts: &[&[u8]]) -> Vec<u8> {
    tlv(TAG_SEQUENCE, &parts.concat())
}

/// SET of already-encoded elements.
///
/// Callers with more than one element must supply them in DER order.
pub fn set(parts: &[&[u8]]) -> Vec<u8> {
    tlv(TAG_SET, &parts.concat())
}

/// Non-negative INTEGER from a small value.
pub fn small_integer(value: u8) -> Vec<u8> {
    if value & 0x80 != 0 {
        tlv(TAG_INTEGER, &[0x00, value])
    } else {
        tlv(TAG_INTEGER, &[value])
    }
}

/// OBJECT IDENTIFIER from its encoded body.
pub fn oid(body: &[u8]) -> Vec<u8> {
    tlv(TAG_OID, body)
}

/// NULL.
pub fn null() -> Vec<u8> {
    vec![TAG_NULL, 0x00]
}

/// OCTET STRING.
pub fn octet_string(content: &[u8]) -> Vec<u8> {
    tlv(TAG_OCTET_STRING, content)
}

/// One decoded TLV borrowing its input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tlv<'a> {
    /// Identifier octet
    pub tag: u8,
    /// Content octets
    pub content: &'a [u8],
    /// The full encoding, header included
    pub raw: &'a [u8],
}

/// Read one TLV from the front of `input`, returning it and the remainder.
pub fn read_tlv(input: &[u8]) -> Result<(Tlv<'_>, &[u8]), DerError> {
    let (&tag, rest) = input.split_first().ok_or(DerError("unexpected end of input"))?;
    if tag & 0x1F == 0x1F {
        return Err(DerError("high tag numbers are not supported"));
    }
    let (&first, rest) = rest.split_first().ok_or(DerError("missing length"))?;

    let (len, rest) = if first < 0x80 {
        (first as usize, rest)
    } else {
        let count = (first & 0x7F) as usize;
        if count == 0 || count > std::mem::size_of::<usize>() {
            return Err(DerError("unsupported length encoding"));
        }
        if rest.len() < count {
            return Err(DerError("truncated length"));
        }
        let len = rest[..count].iter().fold(0usize, |acc, b| (acc << 8) | *b as usize);
        (len, &rest[count..])
    };

    if rest.len() < len {
        return Err(DerError("truncated content"));
    }
    let header = input.len() - rest.len();
    let tlv = Tlv { tag, content: &rest[..len], raw: &input[..header + len] };
    Ok((tlv, &rest[len..]))
}

/// Read a TLV and check its tag.
pub fn expect_tlv<'a>(input: &'a [u8], tag: u8, what: &'static str) -> Result<(Tlv<'a>, &'a [u8]), DerError> {
    let (tlv, rest) = read_tlv(input)?;
    if tlv.tag != tag {
        return Err(DerError(what));
    }
    Ok((tlv, rest))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_message() {
        let error = read_tlv(&[]).unwrap_err();
        assert_eq!(error.to_string(), "malformed DER: unexpected end of input");
    }

    #[test]
    fn test_short_length() {
        assert_eq!(tlv(TAG_OCTET_STRING, &[1, 2, 3]), vec![0x04, 0x03, 1, 2, 3]);
    }

    #[test]
    fn test_long_length() {
        let encoded = tlv(TAG_OCTET_STRING, &[0u8; 300]);
        assert_eq!(&encoded[..4], &[0x04, 0x82, 0x01, 0x2C]);
        assert_eq!(encoded.len(), 304);
    }

    #[test]
    fn test_small_integer_sign_bit() {
        assert_eq!(small_integer(1), vec![0x02, 0x01, 0x01]);
        assert_eq!(small_integer(0x80), vec![0x02, 0x02, 0x00, 0x80]);
    }

    #[test]
    fn test_read_tlv_round_trip() {
        let inner = octet_string(&[9u8; 200]);
        let outer = sequence(&[&inner, &null()]);
        let (seq, rest) = read_tlv(&outer).unwrap();
        assert!(rest.is_empty());
        assert_eq!(seq.tag, TAG_SEQUENCE);

        let (first, rest) = read_tlv(seq.content).unwrap();
        assert_eq!(first.raw, inner.as_slice());
        let (second, rest) = read_tlv(rest).unwrap();
        assert_eq!(second.tag, TAG_NULL);
        assert!(rest.is_empty());
    }

    #[test]
    fn test_truncated_input() {
        assert!(read_tlv(&[0x30, 0x05, 0x01]).is_err());
        assert!(read_tlv(&[]).is_err());
    }
}
