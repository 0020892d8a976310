//! Order validation: structural checks and authorship.

use crate::canonical::verify_order;
use crate::crypto::Ed25519PublicKey;
use crate::error::ValidationError;
use crate::peer::PeerId;
use crate::wire::Order;

/// Validate an order's structure without checking who signed it.
///
/// This performs:
/// - Id presence
/// - Creation timestamp presence
/// - Signature length
pub fn validate_order_structure(order: &Order) -> Result<(), ValidationError> {
    if order.id.is_empty() {
        return Err(ValidationError::MissingId);
    }

    if order.created.is_none() {
        return Err(ValidationError::MissingTimestamp);
    }

    if order.signature.len() != 64 {
        return Err(ValidationError::SignatureLength(order.signature.len()));
    }

    Ok(())
}

/// Check that `order` was signed by the key behind `author`.
pub fn authenticate_order(order: &Order, author: &PeerId) -> Result<(), ValidationError> {
    validate_order_structure(order)?;

    let public_key: Ed25519PublicKey = author.public_key()?;
    verify_order(&public_key, order)?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::Keypair;
    use crate::order::OrderBuilder;
    use crate::wire::CreateRequest;

    fn signed(keypair: &Keypair) -> Order {
        OrderBuilder::new(CreateRequest {
            channel_id: b"BTC,ETH".to_vec(),
            asset: "ETH".into(),
            counter_asset: "BTC".into(),
            amount: 10,
            price: 1.5,
        })
        .sign(keypair)
    }

    #[test]
    fn test_owner_authenticates() {
        let keypair = Keypair::generate();
        let author = PeerId::from_public_key(&keypair.public_key());
        authenticate_order(&signed(&keypair), &author).unwrap();
    }

    #[test]
    fn test_impostor_rejected() {
        let owner = Keypair::generate();
        let impostor = PeerId::from_public_key(&Keypair::generate().public_key());
        assert!(matches!(
            authenticate_order(&signed(&owner), &impostor),
            Err(ValidationError::SignatureFailed)
        ));
    }

    #[test]
    fn test_tampered_amount_rejected() {
        let keypair = Keypair::generate();
        let author = PeerId::from_public_key(&keypair.public_key());
        let mut order = signed(&keypair);
        order.amount += 1;
        assert!(authenticate_order(&order, &author).is_err());
    }

    #[test]
    fn test_structure_checks() {
        let keypair = Keypair::generate();
        let mut order = signed(&keypair);
        order.signature.truncate(10);
        assert!(matches!(
            validate_order_structure(&order),
            Err(ValidationError::SignatureLength(10))
        ));

        let mut order = signed(&keypair);
        order.id.clear();
        assert!(matches!(
            validate_order_structure(&order),
            Err(ValidationError::MissingId)
        ));

        let mut order = signed(&keypair);
        order.created = None;
        assert!(matches!(
            validate_order_structure(&order),
            Err(ValidationError::MissingTimestamp)
        ));
    }

    #[test]
    fn test_unknown_sender_key_type() {
        let keypair = Keypair::generate();
        let opaque = PeerId::from_bytes(vec![0x12, 0x20, 0xaa]).unwrap();
        assert!(matches!(
            authenticate_order(&signed(&keypair), &opaque),
            Err(ValidationError::UnknownSender)
        ));
    }
}
