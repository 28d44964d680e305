//! Multikey decoding for commit signature verification.
//!
//! A [`PublicKey`] is the verification half of the signing oracle boundary:
//! it decodes a Multikey `publicKeyMultibase` string into raw bytes plus a
//! codec ([`KeyCodec`]) and converts to the concrete crypto public-key types
//! (ed25519_dalek, k256, p256). Key management itself is external.

/// Known multicodec key codecs for Multikey public keys
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyCodec {
    /// Ed25519
    Ed25519,
    /// Secp256k1
    Secp256k1,
    /// P256
    P256,
    /// Unknown codec
    Unknown(u64),
}

fn code_of(codec: KeyCodec) -> u64 {
    match codec {
        KeyCodec::Ed25519 => 0xED,
        KeyCodec::Secp256k1 => 0xE7,
        KeyCodec::P256 => 0x1200,
        KeyCodec::Unknown(c) => c,
    }
}

/// Public key decoded from a Multikey `publicKeyMultibase` string
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublicKey {
    /// Codec used to encode the public key
    pub codec: KeyCodec,
    /// Bytes of the public key
    pub bytes: Vec<u8>,
}

/// Errors from decoding or converting Multikey values
#[derive(Debug, Clone, thiserror::Error, miette::Diagnostic, PartialEq, Eq)]
pub enum CryptoError {
    #[error("failed to decode multibase")]
    /// Multibase decode error
    MultibaseDecode,
    #[error("failed to decode multicodec varint")]
    /// Multicodec decode error
    MulticodecDecode,
    #[error("unsupported key codec: {0}")]
    /// Unsupported key codec error
    UnsupportedCodec(u64),
    #[error("invalid key length: expected {expected}, got {got}")]
    /// Invalid key length error
    InvalidLength {
        /// Expected length of the key
        expected: usize,
        /// Actual length of the key
        got: usize,
    },
    #[error("invalid key format")]
    /// Invalid key format error
    InvalidFormat,
    #[error("conversion error: {0}")]
    /// Conversion error
    Conversion(String),
}

impl PublicKey {
    /// Decode a Multikey public key from a multibase-encoded string
    pub fn decode(multibase_str: &str) -> Result<PublicKey, CryptoError> {
        let (_base, data) =
            multibase::decode(multibase_str).map_err(|_| CryptoError::MultibaseDecode)?;
        let (code, offset) = decode_uvarint(&data).ok_or(CryptoError::MulticodecDecode)?;
        let bytes = &data[offset..];
        let codec = match code {
            0xED => KeyCodec::Ed25519,   // ed25519-pub
            0xE7 => KeyCodec::Secp256k1, // secp256k1-pub
            0x1200 => KeyCodec::P256,    // p256-pub
            other => KeyCodec::Unknown(other),
        };
        Self::from_raw(codec, bytes.to_vec())
    }

    /// Build a public key from a codec tag and raw key bytes
    ///
    /// Validates length and point format for the known codecs.
    pub fn from_raw(codec: KeyCodec, bytes: Vec<u8>) -> Result<PublicKey, CryptoError> {
        match codec {
            KeyCodec::Ed25519 => {
                if bytes.len() != 32 {
                    return Err(CryptoError::InvalidLength {
                        expected: 32,
                        got: bytes.len(),
                    });
                }
            }
            KeyCodec::Secp256k1 | KeyCodec::P256 => {
                if !(bytes.len() == 33 || bytes.len() == 65) {
                    return Err(CryptoError::InvalidLength {
                        expected: 33,
                        got: bytes.len(),
                    });
                }
                // 0x02/0x03 compressed, 0x04 uncompressed
                let first = *bytes.first().ok_or(CryptoError::InvalidFormat)?;
                if first != 0x02 && first != 0x03 && first != 0x04 {
                    return Err(CryptoError::InvalidFormat);
                }
            }
            KeyCodec::Unknown(code) => return Err(CryptoError::UnsupportedCodec(code)),
        }
        Ok(PublicKey { codec, bytes })
    }

    /// Encode as a Multikey multibase string (base58btc)
    pub fn encode(&self) -> String {
        let mut buf = encode_uvarint(code_of(self.codec));
        buf.extend_from_slice(&self.bytes);
        multibase::encode(multibase::Base::Base58Btc, buf)
    }

    /// Convert to ed25519_dalek verifying key
    pub fn to_ed25519(&self) -> Result<ed25519_dalek::VerifyingKey, CryptoError> {
        if self.codec != KeyCodec::Ed25519 {
            return Err(CryptoError::UnsupportedCodec(code_of(self.codec)));
        }
        ed25519_dalek::VerifyingKey::from_bytes(self.bytes.as_slice().try_into().map_err(|_| {
            CryptoError::InvalidLength {
                expected: 32,
                got: self.bytes.len(),
            }
        })?)
        .map_err(|e| CryptoError::Conversion(e.to_string()))
    }

    /// Convert to k256 public key
    pub fn to_k256(&self) -> Result<k256::PublicKey, CryptoError> {
        if self.codec != KeyCodec::Secp256k1 {
            return Err(CryptoError::UnsupportedCodec(code_of(self.codec)));
        }
        k256::PublicKey::from_sec1_bytes(self.bytes.as_slice())
            .map_err(|e| CryptoError::Conversion(e.to_string()))
    }

    /// Convert to p256 public key
    pub fn to_p256(&self) -> Result<p256::PublicKey, CryptoError> {
        if self.codec != KeyCodec::P256 {
            return Err(CryptoError::UnsupportedCodec(code_of(self.codec)));
        }
        p256::PublicKey::from_sec1_bytes(self.bytes.as_slice())
            .map_err(|e| CryptoError::Conversion(e.to_string()))
    }
}

fn decode_uvarint(data: &[u8]) -> Option<(u64, usize)> {
    let mut x: u64 = 0;
    let mut s: u32 = 0;
    for (i, b) in data.iter().copied().enumerate() {
        if b < 0x80 {
            if i > 9 || (i == 9 && b > 1) {
                return None;
            }
            return Some((x | ((b as u64) << s), i + 1));
        }
        x |= ((b & 0x7F) as u64) << s;
        s += 7;
    }
    None
}

fn encode_uvarint(mut x: u64) -> Vec<u8> {
    let mut out = Vec::new();
    while x >= 0x80 {
        out.push(((x as u8) & 0x7F) | 0x80);
        x >>= 7;
    }
    out.push(x as u8);
    out
}
