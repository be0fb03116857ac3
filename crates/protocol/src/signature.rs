use std::str::FromStr;

use hmac::{digest::KeyInit, Hmac, Mac};
use sha2::{Sha256, Sha384, Sha512};
use thiserror::Error;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum SignatureError {
    #[error("unsupported signature scheme `{0}`")]
    UnknownScheme(String),
    #[error("signing key was rejected")]
    InvalidKey,
    #[error("message signature does not match")]
    Mismatch,
}

/// HMAC variants accepted in a connection file's `signature_scheme`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SignatureScheme {
    #[default]
    HmacSha256,
    HmacSha384,
    HmacSha512,
}

impl FromStr for SignatureScheme {
    type Err = SignatureError;

    fn from_str(name: &str) -> Result<Self, Self::Err> {
        match name {
            "hmac-sha256" => Ok(SignatureScheme::HmacSha256),
            "hmac-sha384" => Ok(SignatureScheme::HmacSha384),
            "hmac-sha512" => Ok(SignatureScheme::HmacSha512),
            other => Err(SignatureError::UnknownScheme(other.to_string())),
        }
    }
}

/// Signs and verifies the four JSON frames of a wire message.
#[derive(Clone)]
pub struct Signer {
    scheme: SignatureScheme,
    key: Vec<u8>,
}

impl std::fmt::Debug for Signer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Signer")
            .field("scheme", &self.scheme)
            .finish_non_exhaustive()
    }
}

impl Signer {
    pub fn new(scheme: SignatureScheme, key: impl Into<Vec<u8>>) -> Self {
        Self {
            scheme,
            key: key.into(),
        }
    }

    pub fn scheme(&self) -> SignatureScheme {
        self.scheme
    }

    /// Lowercase hex digest over header, parent header, metadata and content, in that order.
    pub fn sign(
        &self,
        header: &[u8],
        parent_header: &[u8],
        metadata: &[u8],
        content: &[u8],
    ) -> Result<String, SignatureError> {
        let parts = [header, parent_header, metadata, content];
        let digest = match self.scheme {
            SignatureScheme::HmacSha256 => keyed::<Hmac<Sha256>>(&self.key, parts)?
                .finalize()
                .into_bytes()
                .to_vec(),
            SignatureScheme::HmacSha384 => keyed::<Hmac<Sha384>>(&self.key, parts)?
                .finalize()
                .into_bytes()
                .to_vec(),
            SignatureScheme::HmacSha512 => keyed::<Hmac<Sha512>>(&self.key, parts)?
                .finalize()
                .into_bytes()
                .to_vec(),
        };

        Ok(hex::encode(digest))
    }

    pub fn verify(
        &self,
        header: &[u8],
        parent_header: &[u8],
        metadata: &[u8],
        content: &[u8],
        signature: &str,
    ) -> Result<(), SignatureError> {
        let expected = hex::decode(signature).map_err(|_| SignatureError::Mismatch)?;
        let parts = [header, parent_header, metadata, content];
        let verified = match self.scheme {
            SignatureScheme::HmacSha256 => {
                keyed::<Hmac<Sha256>>(&self.key, parts)?.verify_slice(&expected)
            }
            SignatureScheme::HmacSha384 => {
                keyed::<Hmac<Sha384>>(&self.key, parts)?.verify_slice(&expected)
            }
            SignatureScheme::HmacSha512 => {
                keyed::<Hmac<Sha512>>(&self.key, parts)?.verify_slice(&expected)
            }
        };

        verified.map_err(|_| SignatureError::Mismatch)
    }
}

fn keyed<M: Mac + KeyInit>(key: &[u8], parts: [&[u8]; 4]) -> Result<M, SignatureError> {
    let mut mac = <M as KeyInit>::new_from_slice(key).map_err(|_| SignatureError::InvalidKey)?;
    for part in parts {
        Mac::update(&mut mac, part);
    }

    Ok(mac)
}

#[cfg(test)]
mod tests {
    use super::*;
    use googletest::prelude::*;

    // RFC 4231, test case 2
    const KEY: &[u8] = b"Jefe";
    const SHA256_DIGEST: &str = "5bdcc146bf60754e6a042426089575c75a003f089d2739839dec58b964ec3843";

    #[googletest::test]
    fn digest_is_computed_incrementally_over_all_frames() {
        let signer = Signer::new(SignatureScheme::HmacSha256, KEY);

        let digest = signer
            .sign(b"what do ya", b" want ", b"for ", b"nothing?")
            .unwrap();

        expect_that!(digest, eq(SHA256_DIGEST));
    }

    #[googletest::test]
    fn sha512_scheme_produces_longer_digest() {
        let signer = Signer::new(SignatureScheme::HmacSha512, KEY);

        let digest = signer.sign(b"what do ya want for nothing?", b"", b"", b"").unwrap();

        expect_that!(
            digest,
            eq("164b7a7bfcf819e2e395fbe73b56e0a387bd64222e831fd610270cd7ea2505549758bf75c05a994a6d034f65f8f0e6fdcaeab1a34d4a6b4b636e070a38bce737")
        );
    }

    #[googletest::test]
    fn verification_accepts_own_signature() {
        let signer = Signer::new(SignatureScheme::HmacSha256, "secret");
        let digest = signer.sign(b"{}", b"{}", b"{}", b"{}").unwrap();

        expect_that!(signer.verify(b"{}", b"{}", b"{}", b"{}", &digest), ok(anything()));
    }

    #[googletest::test]
    fn verification_rejects_tampered_content() {
        let signer = Signer::new(SignatureScheme::HmacSha256, "secret");
        let digest = signer.sign(b"{}", b"{}", b"{}", br#"{"code":"1"}"#).unwrap();

        expect_that!(
            signer.verify(b"{}", b"{}", b"{}", br#"{"code":"2"}"#, &digest),
            err(eq(SignatureError::Mismatch))
        );
        expect_that!(
            signer.verify(b"{}", b"{}", b"{}", b"{}", "not-hex"),
            err(eq(SignatureError::Mismatch))
        );
    }

    #[googletest::test]
    fn scheme_names_follow_connection_file_spelling() {
        expect_that!(
            "hmac-sha384".parse::<SignatureScheme>(),
            ok(eq(SignatureScheme::HmacSha384))
        );
        expect_that!(
            "md5".parse::<SignatureScheme>(),
            err(eq(SignatureError::UnknownScheme("md5".into())))
        );
    }
}
