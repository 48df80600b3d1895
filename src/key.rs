use const_oid::ObjectIdentifier;
use const_oid::db::rfc5912::{ID_EC_PUBLIC_KEY, RSA_ENCRYPTION, SECP_256_R_1, SECP_384_R_1};
use der::Encode;
use ecdsa::signature::hazmat::{PrehashSigner, PrehashVerifier};
use p256::ecdsa::{SigningKey as P256SigningKey, VerifyingKey as P256VerifyingKey};
use p384::ecdsa::{SigningKey as P384SigningKey, VerifyingKey as P384VerifyingKey};
use pkcs8::{DecodePrivateKey, EncodePrivateKey};
use rsa::{
    BigUint, RsaPrivateKey, RsaPublicKey,
    pkcs1::{DecodeRsaPrivateKey, EncodeRsaPrivateKey},
    signature::{SignatureEncoding, Signer, Verifier},
    traits::PublicKeyParts,
};
use sha1::{Digest, Sha1};
use tracing::debug;
use x509_cert::spki::SubjectPublicKeyInfoOwned;

use crate::cert::params::{KeyType, SignatureAlgorithm};
use crate::error::CertFactoryError;

/// Largest RSA modulus this engine generates and accepts, in bits.
pub const MAX_RSA_BITS: usize = 8192;

/// A private key together with its public half.
///
/// Only the algorithms named by [`KeyType`] are supported.
#[derive(Clone, Debug)]
pub enum KeyPair {
    Rsa {
        private: Box<RsaPrivateKey>,
        public: RsaPublicKey,
    },
    EcdsaP256 {
        signing_key: P256SigningKey,
        verifying_key: P256VerifyingKey,
    },
    EcdsaP384 {
        signing_key: P384SigningKey,
        verifying_key: P384VerifyingKey,
    },
}

impl KeyPair {
    /// Generates a fresh key pair of the given type.
    pub fn generate(key_type: KeyType) -> Result<Self, CertFactoryError> {
        debug!(?key_type, "generating key pair");
        match key_type {
            KeyType::Rsa2048 => Self::generate_rsa(2048),
            KeyType::Rsa4096 => Self::generate_rsa(4096),
            KeyType::Rsa8192 => Self::generate_rsa(8192),
            KeyType::Ecc256 => Ok(Self::generate_ecdsa_p256()),
            KeyType::Ecc384 => Ok(Self::generate_ecdsa_p384()),
        }
    }

    /// Generate an RSA key pair with the specified number of bits.
    pub fn generate_rsa(bits: usize) -> Result<Self, CertFactoryError> {
        let mut rng = rand_core::OsRng;
        let private = RsaPrivateKey::new(&mut rng, bits)?;
        let public = RsaPublicKey::from(&private);
        Ok(KeyPair::Rsa {
            private: Box::new(private),
            public,
        })
    }

    /// Generate an ECDSA P-256 key pair.
    pub fn generate_ecdsa_p256() -> Self {
        let mut rng = rand_core::OsRng;
        let signing_key = P256SigningKey::random(&mut rng);
        let verifying_key = *signing_key.verifying_key();
        KeyPair::EcdsaP256 {
            signing_key,
            verifying_key,
        }
    }

    /// Generate an ECDSA P-384 key pair.
    pub fn generate_ecdsa_p384() -> Self {
        let mut rng = rand_core::OsRng;
        let signing_key = P384SigningKey::random(&mut rng);
        let verifying_key = *signing_key.verifying_key();
        KeyPair::EcdsaP384 {
            signing_key,
            verifying_key,
        }
    }

    /// Parses a PKCS#8 `PrivateKeyInfo`.
    pub fn from_pkcs8_der(der: &[u8]) -> Result<Self, CertFactoryError> {
        let info = pkcs8::PrivateKeyInfo::try_from(der)?;
        match info.algorithm.oid {
            RSA_ENCRYPTION => Self::from_rsa(RsaPrivateKey::from_pkcs8_der(der)?),
            ID_EC_PUBLIC_KEY => match info.algorithm.parameters_oid()? {
                SECP_256_R_1 => Ok(Self::from_p256(P256SigningKey::from(
                    p256::SecretKey::from_pkcs8_der(der)?,
                ))),
                SECP_384_R_1 => Ok(Self::from_p384(P384SigningKey::from(
                    p384::SecretKey::from_pkcs8_der(der)?,
                ))),
                curve => Err(CertFactoryError::DecodingError(format!(
                    "unsupported elliptic curve {curve}"
                ))),
            },
            oid => Err(CertFactoryError::DecodingError(format!(
                "unsupported private key algorithm {oid}"
            ))),
        }
    }

    /// Parses a PKCS#1 `RSAPrivateKey`.
    pub fn from_pkcs1_der(der: &[u8]) -> Result<Self, CertFactoryError> {
        Self::from_rsa(RsaPrivateKey::from_pkcs1_der(der)?)
    }

    /// Parses a SEC1 `ECPrivateKey` on P-256 or P-384.
    pub fn from_sec1_der(der: &[u8]) -> Result<Self, CertFactoryError> {
        if let Ok(secret) = p256::SecretKey::from_sec1_der(der) {
            return Ok(Self::from_p256(P256SigningKey::from(secret)));
        }
        p384::SecretKey::from_sec1_der(der)
            .map(|secret| Self::from_p384(P384SigningKey::from(secret)))
            .map_err(|e| CertFactoryError::DecodingError(e.to_string()))
    }

    fn from_rsa(private: RsaPrivateKey) -> Result<Self, CertFactoryError> {
        private.validate()?;
        let public = RsaPublicKey::from(&private);
        Ok(KeyPair::Rsa {
            private: Box::new(private),
            public,
        })
    }

    fn from_p256(signing_key: P256SigningKey) -> Self {
        let verifying_key = *signing_key.verifying_key();
        KeyPair::EcdsaP256 {
            signing_key,
            verifying_key,
        }
    }

    fn from_p384(signing_key: P384SigningKey) -> Self {
        let verifying_key = *signing_key.verifying_key();
        KeyPair::EcdsaP384 {
            signing_key,
            verifying_key,
        }
    }

    /// Encodes the private key as PKCS#8 DER.
    pub fn to_pkcs8_der(&self) -> Result<Vec<u8>, CertFactoryError> {
        let document = match self {
            KeyPair::Rsa { private, .. } => private.to_pkcs8_der(),
            KeyPair::EcdsaP256 { signing_key, .. } => {
                p256::SecretKey::from(signing_key.as_nonzero_scalar()).to_pkcs8_der()
            }
            KeyPair::EcdsaP384 { signing_key, .. } => {
                p384::SecretKey::from(signing_key.as_nonzero_scalar()).to_pkcs8_der()
            }
        }
        .map_err(|e| CertFactoryError::EncodingError(e.to_string()))?;
        Ok(document.as_bytes().to_vec())
    }

    /// Encodes the private key in its algorithm-specific form, along with
    /// the PEM label for it: PKCS#1 for RSA, SEC1 for ECDSA.
    ///
    /// SEC1 keys carry the named curve and the public point, so they load
    /// without any outside context.
    pub fn to_traditional_der(&self) -> Result<(&'static str, Vec<u8>), CertFactoryError> {
        match self {
            KeyPair::Rsa { private, .. } => {
                let document = private
                    .to_pkcs1_der()
                    .map_err(|e| CertFactoryError::EncodingError(e.to_string()))?;
                Ok(("RSA PRIVATE KEY", document.as_bytes().to_vec()))
            }
            KeyPair::EcdsaP256 {
                signing_key,
                verifying_key,
            } => Ok((
                "EC PRIVATE KEY",
                encode_sec1(
                    &signing_key.to_bytes(),
                    verifying_key.to_encoded_point(false).as_bytes(),
                    SECP_256_R_1,
                )?,
            )),
            KeyPair::EcdsaP384 {
                signing_key,
                verifying_key,
            } => Ok((
                "EC PRIVATE KEY",
                encode_sec1(
                    &signing_key.to_bytes(),
                    verifying_key.to_encoded_point(false).as_bytes(),
                    SECP_384_R_1,
                )?,
            )),
        }
    }

    /// Returns the subject public key info for this key pair.
    pub fn as_spki(&self) -> Result<SubjectPublicKeyInfoOwned, CertFactoryError> {
        self.public_key().as_spki()
    }

    /// Returns the public half of the key pair.
    pub fn public_key(&self) -> PublicKey {
        match self {
            KeyPair::Rsa { public, .. } => PublicKey::Rsa(public.clone()),
            KeyPair::EcdsaP256 { verifying_key, .. } => PublicKey::EcdsaP256(*verifying_key),
            KeyPair::EcdsaP384 { verifying_key, .. } => PublicKey::EcdsaP384(*verifying_key),
        }
    }

    /// Signs `data` with this key, hashing it with the given digest.
    ///
    /// RSA signatures are PKCS#1 v1.5; ECDSA signatures are DER-encoded
    /// `Ecdsa-Sig-Value`s.
    pub fn sign_data(
        &self,
        data: &[u8],
        digest: SignatureAlgorithm,
    ) -> Result<Vec<u8>, CertFactoryError> {
        let signing_error =
            |e: rsa::signature::Error| CertFactoryError::SigningError(e.to_string());
        match self {
            KeyPair::Rsa { private, .. } => {
                let private = private.as_ref().clone();
                let signature = match digest {
                    SignatureAlgorithm::Sha256 => {
                        rsa::pkcs1v15::SigningKey::<sha2::Sha256>::new(private).try_sign(data)
                    }
                    SignatureAlgorithm::Sha384 => {
                        rsa::pkcs1v15::SigningKey::<sha2::Sha384>::new(private).try_sign(data)
                    }
                    SignatureAlgorithm::Sha512 => {
                        rsa::pkcs1v15::SigningKey::<sha2::Sha512>::new(private).try_sign(data)
                    }
                }
                .map_err(signing_error)?;
                Ok(signature.to_vec())
            }
            KeyPair::EcdsaP256 { signing_key, .. } => {
                let signature: p256::ecdsa::Signature = signing_key
                    .sign_prehash(&digest.digest(data))
                    .map_err(signing_error)?;
                Ok(signature.to_der().as_bytes().to_vec())
            }
            KeyPair::EcdsaP384 { signing_key, .. } => {
                let signature: p384::ecdsa::Signature = signing_key
                    .sign_prehash(&digest.digest(data))
                    .map_err(signing_error)?;
                Ok(signature.to_der().as_bytes().to_vec())
            }
        }
    }

    /// Whether this key pair's public half is the key in `spki`.
    pub fn matches(&self, spki: &SubjectPublicKeyInfoOwned) -> Result<bool, CertFactoryError> {
        Ok(self.as_spki()? == *spki)
    }
}

/// A public key of one of the supported algorithms.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PublicKey {
    Rsa(RsaPublicKey),
    EcdsaP256(P256VerifyingKey),
    EcdsaP384(P384VerifyingKey),
}

impl PublicKey {
    /// Reads a public key out of a subject public key info.
    ///
    /// # Errors
    /// `Corrupt` when the algorithm or curve is one this engine never
    /// issues, `DecodingError` when the key bytes are malformed.
    pub fn from_x509spki(spki: &SubjectPublicKeyInfoOwned) -> Result<Self, CertFactoryError> {
        let key_bytes = spki.subject_public_key.raw_bytes();
        match spki.algorithm.oid {
            RSA_ENCRYPTION => {
                let pkcs1 = rsa::pkcs1::RsaPublicKey::try_from(key_bytes)?;
                let public = RsaPublicKey::new_with_max_size(
                    BigUint::from_bytes_be(pkcs1.modulus.as_bytes()),
                    BigUint::from_bytes_be(pkcs1.public_exponent.as_bytes()),
                    MAX_RSA_BITS,
                )?;
                Ok(PublicKey::Rsa(public))
            }
            ID_EC_PUBLIC_KEY => {
                let curve = spki
                    .algorithm
                    .parameters
                    .as_ref()
                    .map(|params| params.decode_as::<ObjectIdentifier>())
                    .transpose()?;
                let decode_error =
                    |e: ecdsa::Error| CertFactoryError::DecodingError(e.to_string());
                match curve {
                    Some(SECP_256_R_1) => Ok(PublicKey::EcdsaP256(
                        P256VerifyingKey::from_sec1_bytes(key_bytes).map_err(decode_error)?,
                    )),
                    Some(SECP_384_R_1) => Ok(PublicKey::EcdsaP384(
                        P384VerifyingKey::from_sec1_bytes(key_bytes).map_err(decode_error)?,
                    )),
                    Some(curve) => Err(CertFactoryError::Corrupt(format!(
                        "unsupported elliptic curve {curve}"
                    ))),
                    None => Err(CertFactoryError::Corrupt(
                        "elliptic curve key without curve parameters".to_string(),
                    )),
                }
            }
            oid => Err(CertFactoryError::Corrupt(format!(
                "unsupported public key algorithm {oid}"
            ))),
        }
    }

    /// Encodes the key as a subject public key info.
    pub fn as_spki(&self) -> Result<SubjectPublicKeyInfoOwned, CertFactoryError> {
        let spki = match self {
            PublicKey::Rsa(public) => SubjectPublicKeyInfoOwned::from_key(public.clone()),
            PublicKey::EcdsaP256(verifying_key) => {
                SubjectPublicKeyInfoOwned::from_key(*verifying_key)
            }
            PublicKey::EcdsaP384(verifying_key) => {
                SubjectPublicKeyInfoOwned::from_key(*verifying_key)
            }
        };
        spki.map_err(|e| CertFactoryError::EncodingError(e.to_string()))
    }

    /// Maps the key back to the [`KeyType`] that generates it.
    ///
    /// RSA keys are classified by modulus length in bytes (256, 512, 1024).
    ///
    /// # Errors
    /// `Corrupt` for any other RSA size.
    pub fn key_type(&self) -> Result<KeyType, CertFactoryError> {
        match self {
            PublicKey::Rsa(public) => match public.size() {
                256 => Ok(KeyType::Rsa2048),
                512 => Ok(KeyType::Rsa4096),
                1024 => Ok(KeyType::Rsa8192),
                size => Err(CertFactoryError::Corrupt(format!(
                    "unsupported RSA key size of {size} bytes"
                ))),
            },
            PublicKey::EcdsaP256(_) => Ok(KeyType::Ecc256),
            PublicKey::EcdsaP384(_) => Ok(KeyType::Ecc384),
        }
    }

    /// Verifies a signature produced by [`KeyPair::sign_data`].
    pub fn verify(
        &self,
        data: &[u8],
        signature: &[u8],
        digest: SignatureAlgorithm,
    ) -> Result<(), CertFactoryError> {
        let invalid = |e: rsa::signature::Error| CertFactoryError::SigningError(e.to_string());
        match self {
            PublicKey::Rsa(public) => {
                let signature =
                    rsa::pkcs1v15::Signature::try_from(signature).map_err(invalid)?;
                let public = public.clone();
                match digest {
                    SignatureAlgorithm::Sha256 => {
                        rsa::pkcs1v15::VerifyingKey::<sha2::Sha256>::new(public)
                            .verify(data, &signature)
                    }
                    SignatureAlgorithm::Sha384 => {
                        rsa::pkcs1v15::VerifyingKey::<sha2::Sha384>::new(public)
                            .verify(data, &signature)
                    }
                    SignatureAlgorithm::Sha512 => {
                        rsa::pkcs1v15::VerifyingKey::<sha2::Sha512>::new(public)
                            .verify(data, &signature)
                    }
                }
                .map_err(invalid)
            }
            PublicKey::EcdsaP256(verifying_key) => {
                let signature = p256::ecdsa::Signature::from_der(signature).map_err(invalid)?;
                verifying_key
                    .verify_prehash(&digest.digest(data), &signature)
                    .map_err(invalid)
            }
            PublicKey::EcdsaP384(verifying_key) => {
                let signature = p384::ecdsa::Signature::from_der(signature).map_err(invalid)?;
                verifying_key
                    .verify_prehash(&digest.digest(data), &signature)
                    .map_err(invalid)
            }
        }
    }
}

fn encode_sec1(
    private_key: &[u8],
    public_key: &[u8],
    curve: ObjectIdentifier,
) -> Result<Vec<u8>, CertFactoryError> {
    sec1::EcPrivateKey {
        private_key,
        parameters: Some(sec1::EcParameters::NamedCurve(curve)),
        public_key: Some(public_key),
    }
    .to_der()
    .map_err(|e| CertFactoryError::EncodingError(e.to_string()))
}

/// SHA-1 over the subject public key bits (RFC 5280 §4.2.1.2, method 1).
pub fn key_identifier(spki: &SubjectPublicKeyInfoOwned) -> Vec<u8> {
    Sha1::digest(spki.subject_public_key.raw_bytes()).to_vec()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pkcs8_round_trip_keeps_public_key() {
        for key in [KeyPair::generate_ecdsa_p256(), KeyPair::generate_ecdsa_p384()] {
            let der = key.to_pkcs8_der().unwrap();
            let parsed = KeyPair::from_pkcs8_der(&der).unwrap();
            assert_eq!(parsed.public_key(), key.public_key());
        }
    }

    #[test]
    fn test_traditional_encodings_parse_back() {
        let ec = KeyPair::generate_ecdsa_p256();
        let (label, der) = ec.to_traditional_der().unwrap();
        assert_eq!(label, "EC PRIVATE KEY");
        assert_eq!(KeyPair::from_sec1_der(&der).unwrap().public_key(), ec.public_key());

        let ec384 = KeyPair::generate_ecdsa_p384();
        let (_, der) = ec384.to_traditional_der().unwrap();
        assert_eq!(KeyPair::from_sec1_der(&der).unwrap().public_key(), ec384.public_key());

        let rsa = KeyPair::generate_rsa(2048).unwrap();
        let (label, der) = rsa.to_traditional_der().unwrap();
        assert_eq!(label, "RSA PRIVATE KEY");
        assert_eq!(KeyPair::from_pkcs1_der(&der).unwrap().public_key(), rsa.public_key());
    }

    #[test]
    fn test_sec1_keys_name_their_curve() {
        for (key, curve) in [
            (KeyPair::generate_ecdsa_p256(), SECP_256_R_1),
            (KeyPair::generate_ecdsa_p384(), SECP_384_R_1),
        ] {
            let (_, der) = key.to_traditional_der().unwrap();
            let decoded = sec1::EcPrivateKey::try_from(der.as_slice()).unwrap();
            assert_eq!(decoded.parameters.and_then(|p| p.named_curve()), Some(curve));
            assert!(decoded.public_key.is_some());
        }
    }

    #[test]
    #[ignore = "generating an 8192-bit key takes minutes"]
    fn test_rsa8192_public_key_round_trip() {
        let key = KeyPair::generate(KeyType::Rsa8192).unwrap();
        let public = PublicKey::from_x509spki(&key.as_spki().unwrap()).unwrap();
        assert_eq!(public, key.public_key());
        assert_eq!(public.key_type().unwrap(), KeyType::Rsa8192);
    }

    #[test]
    fn test_spki_round_trip_and_key_type() {
        let key = KeyPair::generate(KeyType::Ecc384).unwrap();
        let spki = key.as_spki().unwrap();
        let public = PublicKey::from_x509spki(&spki).unwrap();
        assert_eq!(public, key.public_key());
        assert_eq!(public.key_type().unwrap(), KeyType::Ecc384);
        assert!(key.matches(&spki).unwrap());
        assert!(!KeyPair::generate_ecdsa_p256().matches(&spki).unwrap());

        let rsa = KeyPair::generate(KeyType::Rsa2048).unwrap();
        let public = PublicKey::from_x509spki(&rsa.as_spki().unwrap()).unwrap();
        assert_eq!(public.key_type().unwrap(), KeyType::Rsa2048);
    }

    #[test]
    fn test_unsupported_rsa_size_is_corrupt() {
        let key = KeyPair::generate_rsa(1024).unwrap();
        let err = key.public_key().key_type().unwrap_err();
        assert!(err.is_fatal());
    }

    #[test]
    fn test_sign_and_verify_with_every_digest() {
        let keys = [
            KeyPair::generate_ecdsa_p256(),
            KeyPair::generate_ecdsa_p384(),
            KeyPair::generate_rsa(2048).unwrap(),
        ];
        for key in keys {
            for digest in [
                SignatureAlgorithm::Sha256,
                SignatureAlgorithm::Sha384,
                SignatureAlgorithm::Sha512,
            ] {
                let signature = key.sign_data(b"to be signed", digest).unwrap();
                key.public_key()
                    .verify(b"to be signed", &signature, digest)
                    .unwrap();
                assert!(
                    key.public_key()
                        .verify(b"tampered", &signature, digest)
                        .is_err()
                );
            }
        }
    }

    #[test]
    fn test_key_identifier_is_sha1_sized() {
        let key = KeyPair::generate_ecdsa_p256();
        assert_eq!(key_identifier(&key.as_spki().unwrap()).len(), 20);
    }
}
