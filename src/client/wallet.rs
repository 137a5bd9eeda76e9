use crate::{error::WalletError, models::Pubkey};
use async_trait::async_trait;
use ed25519_dalek::{Signer, SigningKey, SECRET_KEY_LENGTH};
use rand::rngs::OsRng;

const SIGNATURE_LEN: usize = 64;
const VERSION_PREFIX_MASK: u8 = 0x80;

/// A signer that can approve transactions on behalf of a payer.
#[async_trait]
pub trait Wallet: Send + Sync {
    fn public_key(&self) -> Pubkey;

    /// Returns the wire transaction with this wallet's signature slot filled in.
    async fn sign_transaction(&self, transaction: Vec<u8>) -> Result<Vec<u8>, WalletError>;
}

/// In-process ed25519 keypair.
pub struct LocalWallet {
    signing_key: SigningKey,
}

impl LocalWallet {
    pub fn generate() -> Self {
        Self {
            signing_key: SigningKey::generate(&mut OsRng),
        }
    }

    pub fn from_seed(seed: [u8; SECRET_KEY_LENGTH]) -> Self {
        Self {
            signing_key: SigningKey::from_bytes(&seed),
        }
    }

    /// Accepts a base58 64-byte keypair (secret || public) or a 32-byte secret seed.
    pub fn from_base58(encoded: &str) -> Result<Self, WalletError> {
        let bytes = bs58::decode(encoded.trim())
            .into_vec()
            .map_err(|e| WalletError::InvalidTransaction(format!("invalid key: {}", e)))?;
        let seed: [u8; SECRET_KEY_LENGTH] = bytes
            .get(..SECRET_KEY_LENGTH)
            .filter(|_| bytes.len() == SECRET_KEY_LENGTH || bytes.len() == 2 * SECRET_KEY_LENGTH)
            .and_then(|s| s.try_into().ok())
            .ok_or_else(|| {
                WalletError::InvalidTransaction(format!("invalid key length: {}", bytes.len()))
            })?;
        Ok(Self::from_seed(seed))
    }

    pub fn sign_wire_transaction(&self, mut transaction: Vec<u8>) -> Result<Vec<u8>, WalletError> {
        let (signature_count, header_len) = decode_compact_u16(&transaction)?;
        let message_offset = header_len + signature_count * SIGNATURE_LEN;
        let message = transaction
            .get(message_offset..)
            .filter(|m| !m.is_empty())
            .ok_or_else(|| WalletError::InvalidTransaction("truncated signatures".to_string()))?;

        let signer_index = signer_index(message, &self.public_key())?;
        if signer_index >= signature_count {
            return Err(WalletError::NotASigner(self.public_key()));
        }

        let signature = self.signing_key.sign(message).to_bytes();
        let slot = header_len + signer_index * SIGNATURE_LEN;
        transaction[slot..slot + SIGNATURE_LEN].copy_from_slice(&signature);
        Ok(transaction)
    }
}

#[async_trait]
impl Wallet for LocalWallet {
    fn public_key(&self) -> Pubkey {
        Pubkey::new(self.signing_key.verifying_key().to_bytes())
    }

    async fn sign_transaction(&self, transaction: Vec<u8>) -> Result<Vec<u8>, WalletError> {
        self.sign_wire_transaction(transaction)
    }
}

// Position of `signer` among the message's required signers.
fn signer_index(message: &[u8], signer: &Pubkey) -> Result<usize, WalletError> {
    let truncated = || WalletError::InvalidTransaction("truncated message".to_string());

    let mut offset = 0;
    if message[0] & VERSION_PREFIX_MASK != 0 {
        offset += 1;
    }
    let required_signatures = *message.get(offset).ok_or_else(truncated)? as usize;
    offset += 3;

    let (key_count, len) = decode_compact_u16(message.get(offset..).ok_or_else(truncated)?)?;
    offset += len;

    for index in 0..key_count.min(required_signatures) {
        let start = offset + index * 32;
        let key = message.get(start..start + 32).ok_or_else(truncated)?;
        if key == signer.as_bytes() {
            return Ok(index);
        }
    }
    Err(WalletError::NotASigner(*signer))
}

/// Decodes a compact-u16 length prefix, returning (value, bytes consumed).
fn decode_compact_u16(bytes: &[u8]) -> Result<(usize, usize), WalletError> {
    let mut value = 0usize;
    for (i, byte) in bytes.iter().take(3).enumerate() {
        value |= ((byte & 0x7f) as usize) << (7 * i);
        if byte & 0x80 == 0 {
            return Ok((value, i + 1));
        }
    }
    Err(WalletError::InvalidTransaction("bad length prefix".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ed25519_dalek::{Signature as DalekSignature, Verifier, VerifyingKey};

    // One required signer (`payer`) plus one read-only account.
    fn unsigned_transfer(payer: &Pubkey, versioned: bool) -> (Vec<u8>, Vec<u8>) {
        let mut message = Vec::new();
        if versioned {
            message.push(VERSION_PREFIX_MASK);
        }
        message.extend_from_slice(&[1, 0, 1]);
        message.push(2);
        message.extend_from_slice(payer.as_bytes());
        message.extend_from_slice(&[9u8; 32]);
        message.extend_from_slice(&[0u8; 32]);
        message.push(0);

        let mut tx = vec![1];
        tx.extend_from_slice(&[0u8; SIGNATURE_LEN]);
        tx.extend_from_slice(&message);
        (tx, message)
    }

    #[test]
    fn test_signs_message_in_place() {
        let wallet = LocalWallet::generate();
        let (tx, message) = unsigned_transfer(&wallet.public_key(), false);

        let signed = wallet.sign_wire_transaction(tx).unwrap();

        let signature = DalekSignature::from_slice(&signed[1..65]).unwrap();
        let verifying = VerifyingKey::from_bytes(wallet.public_key().as_bytes()).unwrap();
        assert!(verifying.verify(&message, &signature).is_ok());
        assert_eq!(&signed[65..], &message[..]);
    }

    #[test]
    fn test_signs_versioned_message() {
        let wallet = LocalWallet::generate();
        let (tx, _) = unsigned_transfer(&wallet.public_key(), true);
        let signed = wallet.sign_wire_transaction(tx).unwrap();
        assert_ne!(&signed[1..65], &[0u8; 64][..]);
    }

    #[test]
    fn test_rejects_foreign_transaction() {
        let wallet = LocalWallet::generate();
        let (tx, _) = unsigned_transfer(&Pubkey::new([8u8; 32]), false);
        assert!(matches!(
            wallet.sign_wire_transaction(tx),
            Err(WalletError::NotASigner(_))
        ));
    }

    #[test]
    fn test_from_base58_accepts_keypair_bytes() {
        let wallet = LocalWallet::generate();
        let mut keypair = wallet.signing_key.to_bytes().to_vec();
        keypair.extend_from_slice(wallet.public_key().as_bytes());
        let encoded = bs58::encode(keypair).into_string();

        let restored = LocalWallet::from_base58(&encoded).unwrap();
        assert_eq!(restored.public_key(), wallet.public_key());
    }

    #[test]
    fn test_compact_u16() {
        assert_eq!(decode_compact_u16(&[0x05]).unwrap(), (5, 1));
        assert_eq!(decode_compact_u16(&[0x80, 0x01]).unwrap(), (128, 2));
        assert!(decode_compact_u16(&[0x80, 0x80, 0x80]).is_err());
    }
}
