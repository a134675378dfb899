//! Signing module for router limit orders.
//!
//! # Architecture
//!
//! ```text
//! params ── salt, nonce, traits ──► OrderFactory ──► Order
//!                                                     │
//!                  Eip712Domain ── separator ──┐      │ struct hash
//!                                              ▼      ▼
//!                                          OrderSigner ──► SignedOrder (r, vs)
//! ```
//!
//! # Example
//!
//! ```ignore
//! use limit_order_core::config::NetworkConfig;
//! use limit_order_core::signing::{OrderFactory, OrderSigner};
//!
//! let network = NetworkConfig::polygon();
//! let draft = OrderFactory::new().create_order(
//!     wallet.address(),
//!     network.token_a.address,
//!     network.token_b.address,
//!     U256::from(10u64).pow(U256::from(16u64)),
//!     U256::from(10_000u64),
//!     3600,
//! )?;
//! let signed = OrderSigner::new(network.eip712_domain())?.sign_order(&draft.order, &signer)?;
//! ```

pub mod domain;
pub mod eip712;
pub mod order_types;
pub mod params;
pub mod signer;

pub use domain::{eip712_domain_type, Eip712Domain};
pub use eip712::{
    encode_value, typed_data_digest, Eip712Type, FieldType, FieldValue, FieldValues, TypedField,
};
pub use order_types::{address_to_uint, order_type, Order, OrderDraft, OrderFactory};
pub use params::{calculate_maker_traits, generate_nonce, generate_salt, MakerTraits};
pub use signer::{
    sign_digest, sign_digest_with, signer_from_key, CompactSignature, OrderDigest, OrderSigner,
    SignedOrder,
};
