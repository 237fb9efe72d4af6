//! Ed25519 message and block signing.

use ed25519_dalek::{Signer, SigningKey, Verifier, VerifyingKey};
use poha_types::{Block, PrivateKey, PublicKey, Signature};

/// Sign a message with a private key, returning the signature.
pub fn sign_message(message: &[u8], private_key: &PrivateKey) -> Signature {
    let signing_key = SigningKey::from_bytes(&private_key.0);
    Signature(signing_key.sign(message).to_bytes())
}

/// Verify a signature against a message and public key.
///
/// Returns `false` for malformed keys as well as bad signatures.
pub fn verify_signature(message: &[u8], signature: &Signature, public_key: &PublicKey) -> bool {
    let Ok(verifying_key) = VerifyingKey::from_bytes(&public_key.0) else {
        return false;
    };
    let dalek_sig = ed25519_dalek::Signature::from_bytes(&signature.0);
    verifying_key.verify_strict(message, &dalek_sig).is_ok()
}

/// Sign a sealed block's hash, returning the signed block.
pub fn sign_block(block: Block, private_key: &PrivateKey) -> Block {
    let signature = sign_message(block.hash.as_bytes(), private_key);
    block.with_signature(signature)
}

/// Check that `block.signature` is the validator's signature over `block.hash`.
///
/// The validator's key is recovered from its address, so opaque addresses
/// never verify.
pub fn verify_block_signature(block: &Block) -> bool {
    match block.validator.public_key() {
        Ok(public_key) => verify_signature(block.hash.as_bytes(), &block.signature, &public_key),
        Err(_) => false,
    }
}
