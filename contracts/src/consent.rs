//! Signed-consent check shared by every purchase path.

use parcel_protocol::agreement::{agreement_hash, verify_agreement};
use parcel_protocol::crypto::ParcelSignature;
use parcel_protocol::ledger::Address;

use crate::error::SettlementError;

/// Require that `signer` signed `text` for `sale_id`.
pub(crate) fn require_consent(
    signature: &ParcelSignature,
    sale_id: u64,
    signer: &Address,
    text: &str,
) -> Result<(), SettlementError> {
    let digest = agreement_hash(sale_id, signer, text);
    if verify_agreement(signature, &digest, signer) {
        Ok(())
    } else {
        Err(SettlementError::IncorrectSignature)
    }
}
