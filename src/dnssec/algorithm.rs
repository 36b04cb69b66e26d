use std::fmt;

use ring::signature;

use super::errors::{DnssecError, Result};

/// DNSSEC signing algorithm numbers (RFC 4034, 5702, 6605, 8080, 8624).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SigningAlgorithm {
    RsaSha1,
    RsaSha1Nsec3Sha1,
    RsaSha256,
    RsaSha512,
    EcdsaP256Sha256,
    EcdsaP384Sha384,
    Ed25519,
}

impl SigningAlgorithm {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            5 => Some(Self::RsaSha1),
            7 => Some(Self::RsaSha1Nsec3Sha1),
            8 => Some(Self::RsaSha256),
            10 => Some(Self::RsaSha512),
            13 => Some(Self::EcdsaP256Sha256),
            14 => Some(Self::EcdsaP384Sha384),
            15 => Some(Self::Ed25519),
            _ => None,
        }
    }

    pub fn to_u8(self) -> u8 {
        match self {
            Self::RsaSha1 => 5,
            Self::RsaSha1Nsec3Sha1 => 7,
            Self::RsaSha256 => 8,
            Self::RsaSha512 => 10,
            Self::EcdsaP256Sha256 => 13,
            Self::EcdsaP384Sha384 => 14,
            Self::Ed25519 => 15,
        }
    }

    fn is_rsa(self) -> bool {
        matches!(
            self,
            Self::RsaSha1 | Self::RsaSha1Nsec3Sha1 | Self::RsaSha256 | Self::RsaSha512
        )
    }

    fn ring_algorithm(self) -> &'static dyn signature::VerificationAlgorithm {
        match self {
            Self::RsaSha1 | Self::RsaSha1Nsec3Sha1 => {
                &signature::RSA_PKCS1_1024_8192_SHA1_FOR_LEGACY_USE_ONLY
            }
            Self::RsaSha256 => &signature::RSA_PKCS1_1024_8192_SHA256_FOR_LEGACY_USE_ONLY,
            Self::RsaSha512 => &signature::RSA_PKCS1_2048_8192_SHA512,
            Self::EcdsaP256Sha256 => &signature::ECDSA_P256_SHA256_FIXED,
            Self::EcdsaP384Sha384 => &signature::ECDSA_P384_SHA384_FIXED,
            Self::Ed25519 => &signature::ED25519,
        }
    }

    /// Verify an RRSIG signature with a DNSKEY public key, both in their
    /// DNS wire formats. Key and signature are converted to the layouts
    /// ring expects per algorithm family.
    pub fn verify(self, public_key: &[u8], message: &[u8], sig: &[u8]) -> Result<()> {
        let key = if self.is_rsa() {
            rsa_wire_to_der(public_key)?
        } else if matches!(self, Self::EcdsaP256Sha256 | Self::EcdsaP384Sha384) {
            // DNSKEY holds the raw x||y point; ring wants it SEC1-tagged.
            let mut uncompressed = Vec::with_capacity(public_key.len() + 1);
            uncompressed.push(0x04);
            uncompressed.extend_from_slice(public_key);
            uncompressed
        } else {
            public_key.to_vec()
        };

        signature::UnparsedPublicKey::new(self.ring_algorithm(), &key)
            .verify(message, sig)
            .map_err(|_| DnssecError::SignatureFailed(self.to_string()))
    }
}

impl fmt::Display for SigningAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::RsaSha1 => "RSASHA1",
            Self::RsaSha1Nsec3Sha1 => "RSASHA1-NSEC3-SHA1",
            Self::RsaSha256 => "RSASHA256",
            Self::RsaSha512 => "RSASHA512",
            Self::EcdsaP256Sha256 => "ECDSAP256SHA256",
            Self::EcdsaP384Sha384 => "ECDSAP384SHA384",
            Self::Ed25519 => "ED25519",
        };
        write!(f, "{}", name)
    }
}

/// Convert an RFC 3110 RSA public key (exponent length, exponent,
/// modulus) into the DER RSAPublicKey structure ring parses.
fn rsa_wire_to_der(wire: &[u8]) -> Result<Vec<u8>> {
    if wire.is_empty() {
        return Err(DnssecError::InvalidPublicKey);
    }

    let (exp_len, exp_start) = if wire[0] == 0 {
        if wire.len() < 3 {
            return Err(DnssecError::InvalidPublicKey);
        }
        (u16::from_be_bytes([wire[1], wire[2]]) as usize, 3)
    } else {
        (wire[0] as usize, 1)
    };

    if wire.len() < exp_start + exp_len + 1 {
        return Err(DnssecError::InvalidPublicKey);
    }
    let exponent = &wire[exp_start..exp_start + exp_len];
    let modulus = &wire[exp_start + exp_len..];

    let mut body = Vec::with_capacity(wire.len() + 16);
    der_integer(&mut body, modulus);
    der_integer(&mut body, exponent);

    let mut der = Vec::with_capacity(body.len() + 8);
    der.push(0x30);
    der_length(&mut der, body.len());
    der.extend_from_slice(&body);
    Ok(der)
}

fn der_integer(out: &mut Vec<u8>, bytes: &[u8]) {
    let mut bytes = bytes;
    while bytes.len() > 1 && bytes[0] == 0 {
        bytes = &bytes[1..];
    }
    let pad = !bytes.is_empty() && bytes[0] & 0x80 != 0;
    out.push(0x02);
    der_length(out, bytes.len() + pad as usize);
    if pad {
        out.push(0);
    }
    out.extend_from_slice(bytes);
}

fn der_length(out: &mut Vec<u8>, len: usize) {
    if len < 0x80 {
        out.push(len as u8);
    } else if len < 0x100 {
        out.push(0x81);
        out.push(len as u8);
    } else {
        out.push(0x82);
        out.extend_from_slice(&(len as u16).to_be_bytes());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn algorithm_numbers_roundtrip() {
        for value in [5u8, 7, 8, 10, 13, 14, 15] {
            let algorithm = SigningAlgorithm::from_u8(value).unwrap();
            assert_eq!(algorithm.to_u8(), value);
        }
        assert_eq!(SigningAlgorithm::from_u8(3), None);
        assert_eq!(SigningAlgorithm::from_u8(253), None);
    }

    #[test]
    fn rsa_der_conversion_short_exponent() {
        // exponent 65537, tiny two-byte modulus with the high bit set.
        let wire = vec![3, 0x01, 0x00, 0x01, 0xC0, 0x01];
        let der = rsa_wire_to_der(&wire).unwrap();
        assert_eq!(
            der,
            vec![0x30, 0x0A, 0x02, 0x03, 0x00, 0xC0, 0x01, 0x02, 0x03, 0x01, 0x00, 0x01]
        );
    }

    #[test]
    fn rsa_der_conversion_long_exponent_form() {
        let wire = vec![0, 0x00, 0x01, 0x03, 0x05];
        let der = rsa_wire_to_der(&wire).unwrap();
        // modulus 0x05, exponent 0x03
        assert_eq!(der, vec![0x30, 0x06, 0x02, 0x01, 0x05, 0x02, 0x01, 0x03]);
    }

    #[test]
    fn malformed_rsa_keys_rejected() {
        assert!(rsa_wire_to_der(&[]).is_err());
        assert!(rsa_wire_to_der(&[5, 1, 2]).is_err());
        assert!(rsa_wire_to_der(&[0, 0]).is_err());
    }

    #[test]
    fn ed25519_verify_rejects_garbage() {
        let err = SigningAlgorithm::Ed25519
            .verify(&[0u8; 32], b"message", &[0u8; 64])
            .unwrap_err();
        assert!(matches!(err, DnssecError::SignatureFailed(_)));
    }
}
