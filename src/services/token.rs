//! Deterministic derivation of asset sub-accounts (associated token accounts).

use crate::models::Pubkey;
use curve25519_dalek::edwards::CompressedEdwardsY;
use sha2::{Digest, Sha256};

pub const TOKEN_PROGRAM_ID: &str = "TokenkegQfeZyiNwAJbNbGKPFXCWuBvf9Ss623VQ5DA";
pub const ASSOCIATED_TOKEN_PROGRAM_ID: &str = "ATokenGPvbdGVxr1b2hvZbsiqW5xWH25efTNsLJA1knL";

const PDA_MARKER: &[u8] = b"ProgramDerivedAddress";
const MAX_SEED_LEN: usize = 32;

pub fn token_program_id() -> Pubkey {
    Pubkey::from_static(TOKEN_PROGRAM_ID)
}

pub fn associated_token_program_id() -> Pubkey {
    Pubkey::from_static(ASSOCIATED_TOKEN_PROGRAM_ID)
}

/// Address holding `owner`'s balance of `asset`.
pub fn derive_asset_sub_account(asset: &Pubkey, owner: &Pubkey) -> Pubkey {
    let token_program = token_program_id();
    let (address, _bump) = find_program_address(
        &[
            &owner.as_bytes()[..],
            &token_program.as_bytes()[..],
            &asset.as_bytes()[..],
        ],
        &associated_token_program_id(),
    );
    address
}

/// Finds the first off-curve address for `seeds`, searching bump seeds from 255 down.
///
/// All 256 bumps landing on the curve has probability ~2^-256; treat it as unreachable.
pub fn find_program_address(seeds: &[&[u8]], program_id: &Pubkey) -> (Pubkey, u8) {
    for bump in (0..=u8::MAX).rev() {
        let bump_seed = [bump];
        let mut with_bump: Vec<&[u8]> = seeds.to_vec();
        with_bump.push(&bump_seed);
        if let Some(address) = create_program_address(&with_bump, program_id) {
            return (address, bump);
        }
    }
    unreachable!("no viable bump seed for program address")
}

/// `None` when a seed is too long or the hash is a valid curve point.
pub fn create_program_address(seeds: &[&[u8]], program_id: &Pubkey) -> Option<Pubkey> {
    if seeds.iter().any(|seed| seed.len() > MAX_SEED_LEN) {
        return None;
    }

    let mut hasher = Sha256::new();
    for seed in seeds {
        hasher.update(seed);
    }
    hasher.update(program_id.as_bytes());
    hasher.update(PDA_MARKER);
    let hash: [u8; 32] = hasher.finalize().into();

    if is_on_curve(&hash) {
        return None;
    }
    Some(Pubkey::new(hash))
}

pub fn is_on_curve(bytes: &[u8; 32]) -> bool {
    CompressedEdwardsY(*bytes).decompress().is_some()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_program_ids_parse() {
        assert_eq!(token_program_id().to_string(), TOKEN_PROGRAM_ID);
        assert_eq!(
            associated_token_program_id().to_string(),
            ASSOCIATED_TOKEN_PROGRAM_ID
        );
    }

    #[test]
    fn test_sub_account_is_deterministic_and_off_curve() {
        let asset = Pubkey::new([11u8; 32]);
        let owner = Pubkey::new([22u8; 32]);

        let first = derive_asset_sub_account(&asset, &owner);
        let second = derive_asset_sub_account(&asset, &owner);

        assert_eq!(first, second);
        assert!(!is_on_curve(first.as_bytes()));
        assert_ne!(first, owner);
    }

    #[test]
    fn test_sub_account_differs_per_asset_and_owner() {
        let owner = Pubkey::new([22u8; 32]);
        let a = derive_asset_sub_account(&Pubkey::new([1u8; 32]), &owner);
        let b = derive_asset_sub_account(&Pubkey::new([2u8; 32]), &owner);
        let c = derive_asset_sub_account(&Pubkey::new([1u8; 32]), &Pubkey::new([23u8; 32]));

        assert_ne!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_create_program_address_rejects_long_seed() {
        let long_seed = [0u8; 33];
        assert!(create_program_address(&[&long_seed[..]], &token_program_id()).is_none());
    }

    #[test]
    fn test_found_bump_reproduces_address() {
        let seeds: [&[u8]; 1] = [b"escrow"];
        let program = token_program_id();
        let (address, bump) = find_program_address(&seeds, &program);
        let bump_seed = [bump];
        assert_eq!(
            create_program_address(&[&b"escrow"[..], &bump_seed[..]], &program),
            Some(address)
        );
    }
}
