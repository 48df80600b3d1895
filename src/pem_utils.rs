use aes::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit, block_padding::Pkcs7};

use crate::error::CertFactoryError;

pub const CERTIFICATE_LABEL: &str = "CERTIFICATE";
pub const CERTIFICATE_REQUEST_LABEL: &str = "CERTIFICATE REQUEST";
pub const PRIVATE_KEY_LABEL: &str = "PRIVATE KEY";

const ENCODE_CONFIG: pem::EncodeConfig =
    pem::EncodeConfig::new().set_line_ending(pem::LineEnding::LF);

/// Convert DER‑encoded data into a PEM‑encoded string with the provided label.
pub fn der_to_pem(der: &[u8], label: &str) -> String {
    let pem = pem::Pem::new(label, der);
    pem::encode_config(&pem, ENCODE_CONFIG)
}

/// Convert a PEM‑encoded string to DER‑encoded bytes.
///
/// Only the first block is read.
pub fn pem_to_der(pem_str: &str) -> Result<Vec<u8>, pem::PemError> {
    let pem = pem::parse(pem_str)?;
    Ok(pem.contents().to_vec())
}

/// Collects the contents of every `CERTIFICATE` block, in order.
pub fn certificate_blocks(pem_str: &str) -> Result<Vec<Vec<u8>>, CertFactoryError> {
    let blocks = pem::parse_many(pem_str)?
        .into_iter()
        .filter(|block| block.tag() == CERTIFICATE_LABEL)
        .map(pem::Pem::into_contents)
        .collect::<Vec<_>>();
    if blocks.is_empty() {
        return Err(CertFactoryError::DecodingError(
            "no CERTIFICATE block found".to_string(),
        ));
    }
    Ok(blocks)
}

/// Block ciphers accepted in a `DEK-Info` header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LegacyCipher {
    Aes128Cbc,
    Aes192Cbc,
    Aes256Cbc,
}

impl LegacyCipher {
    fn name(self) -> &'static str {
        match self {
            LegacyCipher::Aes128Cbc => "AES-128-CBC",
            LegacyCipher::Aes192Cbc => "AES-192-CBC",
            LegacyCipher::Aes256Cbc => "AES-256-CBC",
        }
    }

    fn from_name(name: &str) -> Option<Self> {
        [
            LegacyCipher::Aes128Cbc,
            LegacyCipher::Aes192Cbc,
            LegacyCipher::Aes256Cbc,
        ]
        .into_iter()
        .find(|cipher| cipher.name() == name)
    }

    fn key_len(self) -> usize {
        match self {
            LegacyCipher::Aes128Cbc => 16,
            LegacyCipher::Aes192Cbc => 24,
            LegacyCipher::Aes256Cbc => 32,
        }
    }

    fn encrypt(self, key: &[u8], iv: &[u8], plaintext: &[u8]) -> Result<Vec<u8>, CertFactoryError> {
        let invalid =
            |e: aes::cipher::InvalidLength| CertFactoryError::EncodingError(e.to_string());
        Ok(match self {
            LegacyCipher::Aes128Cbc => cbc::Encryptor::<aes::Aes128>::new_from_slices(key, iv)
                .map_err(invalid)?
                .encrypt_padded_vec_mut::<Pkcs7>(plaintext),
            LegacyCipher::Aes192Cbc => cbc::Encryptor::<aes::Aes192>::new_from_slices(key, iv)
                .map_err(invalid)?
                .encrypt_padded_vec_mut::<Pkcs7>(plaintext),
            LegacyCipher::Aes256Cbc => cbc::Encryptor::<aes::Aes256>::new_from_slices(key, iv)
                .map_err(invalid)?
                .encrypt_padded_vec_mut::<Pkcs7>(plaintext),
        })
    }

    fn decrypt(
        self,
        key: &[u8],
        iv: &[u8],
        ciphertext: &[u8],
    ) -> Result<Vec<u8>, CertFactoryError> {
        let invalid =
            |e: aes::cipher::InvalidLength| CertFactoryError::DecodingError(e.to_string());
        let plaintext = match self {
            LegacyCipher::Aes128Cbc => cbc::Decryptor::<aes::Aes128>::new_from_slices(key, iv)
                .map_err(invalid)?
                .decrypt_padded_vec_mut::<Pkcs7>(ciphertext),
            LegacyCipher::Aes192Cbc => cbc::Decryptor::<aes::Aes192>::new_from_slices(key, iv)
                .map_err(invalid)?
                .decrypt_padded_vec_mut::<Pkcs7>(ciphertext),
            LegacyCipher::Aes256Cbc => cbc::Decryptor::<aes::Aes256>::new_from_slices(key, iv)
                .map_err(invalid)?
                .decrypt_padded_vec_mut::<Pkcs7>(ciphertext),
        };
        // A bad padding block is what a wrong password looks like.
        plaintext.map_err(|_| CertFactoryError::InvalidPassword)
    }
}

/// OpenSSL's `EVP_BytesToKey` with MD5 and a single iteration.
fn derive_key(password: &[u8], salt: &[u8], key_len: usize) -> Vec<u8> {
    let mut key = Vec::with_capacity(key_len + 16);
    let mut previous: Option<md5::Digest> = None;
    while key.len() < key_len {
        let mut context = md5::Context::new();
        if let Some(digest) = previous {
            context.consume(digest.0);
        }
        context.consume(password);
        context.consume(salt);
        let digest = context.compute();
        key.extend_from_slice(&digest.0);
        previous = Some(digest);
    }
    key.truncate(key_len);
    key
}

/// Encodes a DER key as a PEM block encrypted the RFC 1423 way
/// (`Proc-Type: 4,ENCRYPTED` and `DEK-Info` headers).
pub fn encrypt_pem_block(
    der: &[u8],
    label: &str,
    password: &str,
    cipher: LegacyCipher,
) -> Result<String, CertFactoryError> {
    let iv = rand::random::<[u8; 16]>();
    let key = derive_key(password.as_bytes(), &iv[..8], cipher.key_len());
    let ciphertext = cipher.encrypt(&key, &iv, der)?;

    let mut pem = pem::Pem::new(label, ciphertext);
    pem.headers_mut().add("Proc-Type", "4,ENCRYPTED")?;
    pem.headers_mut().add(
        "DEK-Info",
        &format!("{},{}", cipher.name(), hex::encode_upper(iv)),
    )?;
    Ok(pem::encode_config(&pem, ENCODE_CONFIG))
}

/// Whether a PEM block carries RFC 1423 encryption headers.
pub fn is_encrypted_pem_block(pem: &pem::Pem) -> bool {
    pem.headers()
        .get("Proc-Type")
        .is_some_and(|value| value.contains("ENCRYPTED"))
}

/// Decrypts an RFC 1423 encrypted PEM block to its DER contents.
///
/// # Errors
/// `InvalidPassword` when the password does not open the block,
/// `UnsupportedFormat` for ciphers other than AES-CBC.
pub fn decrypt_pem_block(pem: &pem::Pem, password: &str) -> Result<Vec<u8>, CertFactoryError> {
    let dek_info = pem
        .headers()
        .get("DEK-Info")
        .ok_or_else(|| CertFactoryError::DecodingError("missing DEK-Info header".to_string()))?;
    let (name, iv_hex) = dek_info
        .split_once(',')
        .ok_or_else(|| CertFactoryError::DecodingError(format!("invalid DEK-Info {dek_info}")))?;
    let cipher = LegacyCipher::from_name(name.trim())
        .ok_or_else(|| CertFactoryError::UnsupportedFormat(name.trim().to_string()))?;
    let iv = hex::decode(iv_hex.trim())
        .map_err(|e| CertFactoryError::DecodingError(format!("DEK-Info IV: {e}")))?;
    if iv.len() != 16 {
        return Err(CertFactoryError::DecodingError(
            "DEK-Info IV must be 16 bytes".to_string(),
        ));
    }

    let key = derive_key(password.as_bytes(), &iv[..8], cipher.key_len());
    cipher.decrypt(&key, &iv, pem.contents())
}
