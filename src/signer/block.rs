//! PKCS#7 signature block generation.
//!
//! The block is a detached `SignedData` with a single signer, no signed
//! attributes, and the signing certificate embedded. The signature is
//! SHA1withRSA over the raw signature file bytes.

use super::der::{self, DerError, TAG_CONTEXT_0, TAG_INTEGER, TAG_SEQUENCE};
use rsa::{Pkcs1v15Sign, RsaPrivateKey};
use sha1::{Digest, Sha1};

/// 1.2.840.113549.1.7.2
const OID_SIGNED_DATA: &[u8] = &[0x2A, 0x86, 0x48, 0x86, 0xF7, 0x0D, 0x01, 0x07, 0x02];
/// 1.2.840.113549.1.7.1
const OID_DATA: &[u8] = &[0x2A, 0x86, 0x48, 0x86, 0xF7, 0x0D, 0x01, 0x07, 0x01];
/// 1.3.14.3.2.26
const OID_SHA1: &[u8] = &[0x2B, 0x0E, 0x03, 0x02, 0x1A];
/// 1.2.840.113549.1.1.1
const OID_RSA_ENCRYPTION: &[u8] = &[0x2A, 0x86, 0x48, 0x86, 0xF7, 0x0D, 0x01, 0x01, 0x01];

/// The parts of an X.509 certificate a signer info refers to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertificateInfo {
    /// Encoded serial number INTEGER
    pub serial: Vec<u8>,
    /// Encoded issuer Name
    pub issuer: Vec<u8>,
}

/// Extract the issuer and serial number from a DER certificate.
pub fn certificate_info(certificate: &[u8]) -> Result<CertificateInfo, DerError> {
    let (cert, _) = der::expect_tlv(certificate, TAG_SEQUENCE, "certificate is not a SEQUENCE")?;
    let (tbs, _) = der::expect_tlv(cert.content, TAG_SEQUENCE, "tbsCertificate is not a SEQUENCE")?;

    let (first, mut rest) = der::read_tlv(tbs.content)?;
    let serial = if first.tag == TAG_CONTEXT_0 {
        let (serial, after) = der::expect_tlv(rest, TAG_INTEGER, "missing serial number")?;
        rest = after;
        serial
    } else if first.tag == TAG_INTEGER {
        first
    } else {
        return Err(DerError("missing serial number"));
    };

    let (_signature_alg, rest) = der::expect_tlv(rest, TAG_SEQUENCE, "missing signature algorithm")?;
    let (issuer, _) = der::expect_tlv(rest, TAG_SEQUENCE, "missing issuer")?;

    Ok(CertificateInfo { serial: serial.raw.to_vec(), issuer: issuer.raw.to_vec() })
}

fn algorithm(oid_body: &[u8]) -> Vec<u8> {
    der::sequence(&[&der::oid(oid_body), &der::null()])
}

/// Sign `content` and wrap the signature in a detached PKCS#7 block.
pub fn signature_block(
    key: &RsaPrivateKey,
    certificate: &[u8],
    info: &CertificateInfo,
    content: &[u8],
) -> Result<Vec<u8>, rsa::Error> {
    let hashed = Sha1::digest(content);
    let signature = key.sign(Pkcs1v15Sign::new::<Sha1>(), &hashed)?;

    let version = der::small_integer(1);
    let sha1 = algorithm(OID_SHA1);

    let signer_info = der::sequence(&[
        &version,
        &der::sequence(&[&info.issuer, &info.serial]),
        &sha1,
        &algorithm(OID_RSA_ENCRYPTION),
        &der::octet_string(&signature),
    ]);

    let signed_data = der::sequence(&[
        &version,
        &der::set(&[&sha1]),
        &der::sequence(&[&der::oid(OID_DATA)]),
        &der::tlv(TAG_CONTEXT_0, certificate),
        &der::set(&[&signer_info]),
    ]);

    Ok(der::sequence(&[&der::oid(OID_SIGNED_DATA), &der::tlv(TAG_CONTEXT_0, &signed_data)]))
}
