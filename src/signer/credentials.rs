//! Signing key and certificate loading.

use super::block::{certificate_info, CertificateInfo};
use super::SignError;
use rsa::pkcs1::DecodeRsaPrivateKey;
use rsa::pkcs8::der::pem;
use rsa::pkcs8::DecodePrivateKey;
use rsa::RsaPrivateKey;
use std::fs;
use std::path::Path;

const PEM_BEGIN: &[u8] = b"-----BEGIN ";
const CERTIFICATE_LABEL: &str = "CERTIFICATE";

/// An RSA private key paired with its X.509 certificate.
#[derive(Clone)]
pub struct SigningKey {
    key: RsaPrivateKey,
    certificate: Vec<u8>,
    info: CertificateInfo,
}

impl std::fmt::Debug for SigningKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SigningKey").field("certificate_len", &self.certificate.len()).finish()
    }
}

impl SigningKey {
    /// Pair a key with a DER-encoded certificate.
    pub fn new(key: RsaPrivateKey, certificate: Vec<u8>) -> Result<Self, SignError> {
        let info = certificate_info(&certificate)
            .map_err(|e| SignError::Certificate(e.to_string()))?;
        Ok(Self { key, certificate, info })
    }

    /// Load a PEM private key (PKCS#8 or PKCS#1) and a PEM or DER certificate.
    pub fn from_files(key_path: &Path, certificate_path: &Path) -> Result<Self, SignError> {
        let key_pem = fs::read_to_string(key_path)?;
        let certificate = fs::read(certificate_path)?;
        Self::from_pem(&key_pem, &certificate)
    }

    /// Parse a PEM private key and a PEM or DER certificate.
    pub fn from_pem(key_pem: &str, certificate: &[u8]) -> Result<Self, SignError> {
        let key = decode_private_key(key_pem)?;
        let certificate = decode_certificate(certificate)?;
        Self::new(key, certificate)
    }

    /// The private key.
    pub fn key(&self) -> &RsaPrivateKey {
        &self.key
    }

    /// The DER certificate.
    pub fn certificate(&self) -> &[u8] {
        &self.certificate
    }

    /// Issuer and serial number of the certificate.
    pub fn certificate_info(&self) -> &CertificateInfo {
        &self.info
    }
}

fn decode_private_key(pem: &str) -> Result<RsaPrivateKey, SignError> {
    if pem.contains("BEGIN RSA PRIVATE KEY") {
        RsaPrivateKey::from_pkcs1_pem(pem).map_err(|e| SignError::Key(e.to_string()))
    } else {
        RsaPrivateKey::from_pkcs8_pem(pem).map_err(|e| SignError::Key(e.to_string()))
    }
}

/// DER certificates pass through; PEM armor is decoded.
fn decode_certificate(bytes: &[u8]) -> Result<Vec<u8>, SignError> {
    let Some(start) = bytes.windows(PEM_BEGIN.len()).position(|w| w == PEM_BEGIN) else {
        return Ok(bytes.to_vec());
    };
    let (label, der) =
        pem::decode_vec(&bytes[start..]).map_err(|e| SignError::Certificate(e.to_string()))?;
    if label != CERTIFICATE_LABEL {
        return Err(SignError::Certificate(format!("unexpected PEM label '{}'", label)));
    }
    Ok(der)
}
