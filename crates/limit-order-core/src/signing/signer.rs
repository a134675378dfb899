//! Digest signing and EIP-2098 compact signatures.
//!
//! Signing is deterministic (RFC 6979) secp256k1 ECDSA with the recovery id
//! appended. The router consumes signatures in compact `(r, vs)` form.

use alloy_primitives::{Address, Signature, B256, U256};
use alloy_signer::{Signer, SignerSync};
use alloy_signer_local::PrivateKeySigner;
use serde::{Deserialize, Serialize};
use std::fmt;

use super::domain::Eip712Domain;
use super::eip712::typed_data_digest;
use super::order_types::Order;
use crate::{Error, Result};

const PRIVATE_KEY_LEN: usize = 32;
const VS_PARITY_BIT: usize = 255;

/// Build a local signer from raw key bytes.
///
/// Wrong length, zero and out-of-range keys are input errors.
pub fn signer_from_key(key: &[u8]) -> Result<PrivateKeySigner> {
    if key.len() != PRIVATE_KEY_LEN {
        return Err(Error::Input(format!(
            "private key must be {} bytes, got {}",
            PRIVATE_KEY_LEN,
            key.len()
        )));
    }
    PrivateKeySigner::from_slice(key)
        .map_err(|e| Error::Input(format!("private key out of range: {}", e)))
}

/// Sign a 32-byte digest with a raw private key.
pub fn sign_digest(digest: B256, key: &[u8]) -> Result<Signature> {
    let signer = signer_from_key(key)?;
    sign_digest_with(&signer, digest)
}

/// Sign a 32-byte digest with an already-loaded signer.
pub fn sign_digest_with(signer: &PrivateKeySigner, digest: B256) -> Result<Signature> {
    signer
        .sign_hash_sync(&digest)
        .map_err(|e| Error::Signing(e.to_string()))
}

/// EIP-2098 compact signature: `vs` is `s` with the recovery parity in bit 255.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompactSignature {
    pub r: B256,
    pub vs: B256,
}

impl CompactSignature {
    /// Fold a 65-byte `r ‖ s ‖ v` signature.
    ///
    /// `v` must be 27 or 28.
    pub fn from_raw(raw: &[u8]) -> Result<Self> {
        if raw.len() != 65 {
            return Err(Error::Input(format!(
                "raw signature must be 65 bytes, got {}",
                raw.len()
            )));
        }
        let odd = match raw[64] {
            27 => false,
            28 => true,
            v => {
                return Err(Error::Input(format!(
                    "recovery byte must be 27 or 28, got {}",
                    v
                )))
            }
        };

        let r = B256::from_slice(&raw[..32]);
        let mut vs = U256::from_be_slice(&raw[32..64]);
        vs.set_bit(VS_PARITY_BIT, odd);

        Ok(Self {
            r,
            vs: B256::from(vs.to_be_bytes::<32>()),
        })
    }

    pub fn from_signature(signature: &Signature) -> Self {
        let mut vs = signature.s();
        vs.set_bit(VS_PARITY_BIT, signature.v());
        Self {
            r: B256::from(signature.r().to_be_bytes::<32>()),
            vs: B256::from(vs.to_be_bytes::<32>()),
        }
    }

    /// `s` with the parity bit cleared.
    pub fn s(&self) -> U256 {
        let mut s = U256::from_be_bytes(self.vs.0);
        s.set_bit(VS_PARITY_BIT, false);
        s
    }

    /// Recovery byte, 27 or 28.
    pub fn v(&self) -> u8 {
        if self.vs[0] & 0x80 != 0 {
            28
        } else {
            27
        }
    }

    pub fn to_raw(&self) -> [u8; 65] {
        let mut raw = [0u8; 65];
        raw[..32].copy_from_slice(self.r.as_slice());
        raw[32..64].copy_from_slice(&self.s().to_be_bytes::<32>());
        raw[64] = self.v();
        raw
    }

    pub fn to_signature(&self) -> Signature {
        Signature::new(U256::from_be_bytes(self.r.0), self.s(), self.v() == 28)
    }

    /// Recover the address that signed `digest`.
    pub fn recover(&self, digest: B256) -> Result<Address> {
        self.to_signature()
            .recover_address_from_prehash(&digest)
            .map_err(|e| Error::Signing(format!("signature recovery failed: {}", e)))
    }
}

impl fmt::Display for CompactSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "r={} vs={}", self.r, self.vs)
    }
}

/// Digest components for a single order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrderDigest {
    pub domain_separator: B256,
    pub struct_hash: B256,
    pub digest: B256,
}

/// An order with its signature, ready for the router.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedOrder {
    pub order: Order,
    pub order_hash: B256,
    pub signature: CompactSignature,
}

/// EIP-712 order signer bound to one router domain.
///
/// Holds no key material; the key is passed per call.
#[derive(Clone)]
pub struct OrderSigner {
    domain: Eip712Domain,
    domain_separator: B256,
}

impl OrderSigner {
    pub fn new(domain: Eip712Domain) -> Result<Self> {
        let domain_separator = domain.separator()?;
        Ok(Self {
            domain,
            domain_separator,
        })
    }

    pub fn domain(&self) -> &Eip712Domain {
        &self.domain
    }

    pub fn domain_separator(&self) -> B256 {
        self.domain_separator
    }

    pub fn order_digest(&self, order: &Order) -> Result<OrderDigest> {
        let struct_hash = order.struct_hash()?;
        Ok(OrderDigest {
            domain_separator: self.domain_separator,
            struct_hash,
            digest: typed_data_digest(self.domain_separator, struct_hash),
        })
    }

    /// Sign an order and return it in compact form.
    ///
    /// The signer's address must be the order maker.
    pub fn sign_order(&self, order: &Order, signer: &PrivateKeySigner) -> Result<SignedOrder> {
        if signer.address() != order.maker {
            return Err(Error::Input(format!(
                "signer {} is not the order maker {}",
                signer.address(),
                order.maker
            )));
        }
        let digest = self.order_digest(order)?;
        let signature = sign_digest_with(signer, digest.digest)?;

        Ok(SignedOrder {
            order: order.clone(),
            order_hash: digest.digest,
            signature: CompactSignature::from_signature(&signature),
        })
    }
}

impl fmt::Debug for OrderSigner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OrderSigner")
            .field("domain", &self.domain.name)
            .field("chain_id", &self.domain.chain_id)
            .field("verifying_contract", &self.domain.verifying_contract)
            .finish()
    }
}
