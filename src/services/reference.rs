use crate::{
    error::FindReferenceError,
    models::{Finality, Pubkey, SignatureInfo},
    services::rpc::{LedgerRpc, SignaturesForAddressOptions},
};
use ed25519_dalek::SigningKey;
use rand::rngs::OsRng;

const PAGE_LIMIT: usize = 1000;

/// A fresh single-use reference key. The secret half is dropped before returning.
pub fn generate_reference() -> Pubkey {
    let signing_key = SigningKey::generate(&mut OsRng);
    Pubkey::new(signing_key.verifying_key().to_bytes())
}

/// Returns the oldest transaction signature that mentions `reference`.
pub async fn find_reference(
    rpc: &dyn LedgerRpc,
    reference: &Pubkey,
    finality: Finality,
) -> Result<SignatureInfo, FindReferenceError> {
    let mut oldest: Option<SignatureInfo> = None;

    loop {
        let options = SignaturesForAddressOptions {
            limit: Some(PAGE_LIMIT),
            before: oldest.as_ref().map(|info| info.signature),
            until: None,
            commitment: Some(finality),
        };

        let page = match rpc.get_signatures_for_address(reference, options).await {
            Ok(page) => page,
            // A later page failing still leaves a usable answer, so its error is logged rather
            // than returned. Only a failed first page surfaces as `FindReferenceError::Rpc`.
            Err(e) if oldest.is_some() => {
                tracing::warn!(reference = %reference, error = %e, "Paging past first result failed");
                break;
            }
            Err(e) => return Err(e.into()),
        };

        let full_page = page.len() >= PAGE_LIMIT;
        if let Some(last) = page.into_iter().last() {
            oldest = Some(last);
        }
        if !full_page {
            break;
        }
    }

    oldest.ok_or(FindReferenceError::NotFound)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generated_references_are_unique() {
        let a = generate_reference();
        let b = generate_reference();
        assert_ne!(a, b);
    }
}
