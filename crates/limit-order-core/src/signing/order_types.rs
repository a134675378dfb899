//! Order types for 1inch limit order signing.
//!
//! Defines the order struct verified by the router, its EIP-712 schema and
//! the factory that fills in salt, nonce and traits.

use alloy_primitives::{Address, B256, U256};
use chrono::Utc;
use serde::{Deserialize, Serialize};

use super::eip712::{Eip712Type, FieldType, FieldValue, FieldValues, TypedField};
use super::params::{generate_nonce, generate_salt, MakerTraits, SALT_BITS};
use crate::{Error, Result};

static ORDER_FIELDS: [TypedField; 8] = [
    TypedField::new("salt", FieldType::Uint256),
    TypedField::new("maker", FieldType::Address),
    TypedField::new("receiver", FieldType::Address),
    TypedField::new("makerAsset", FieldType::Address),
    TypedField::new("takerAsset", FieldType::Address),
    TypedField::new("makingAmount", FieldType::Uint256),
    TypedField::new("takingAmount", FieldType::Uint256),
    TypedField::new("makerTraits", FieldType::Uint256),
];

/// `Order(uint256 salt,address maker,address receiver,address makerAsset,address takerAsset,uint256 makingAmount,uint256 takingAmount,uint256 makerTraits)`
pub fn order_type() -> Eip712Type {
    Eip712Type::new("Order", &ORDER_FIELDS)
}

/// Integer value of an address, as the router carries it in calldata and messages.
pub fn address_to_uint(address: Address) -> U256 {
    U256::from_be_slice(address.as_slice())
}

/// Raw order data for EIP-712 signing.
///
/// This matches the struct used by the router contract.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    /// Random 96-bit salt for uniqueness.
    pub salt: U256,
    /// Maker address (your wallet).
    pub maker: Address,
    /// Receiver of the taker asset; always the maker (self-fill).
    pub receiver: Address,
    pub maker_asset: Address,
    pub taker_asset: Address,
    /// Maker amount in base units.
    pub making_amount: U256,
    /// Taker amount in base units.
    pub taking_amount: U256,
    /// Packed nonce and expiry.
    pub maker_traits: U256,
}

impl Order {
    /// The EIP-712 message. Address fields are carried as `uint256`.
    pub fn eip712_values(&self) -> FieldValues {
        let mut values = FieldValues::new();
        values.insert("salt".to_string(), FieldValue::Uint256(self.salt));
        values.insert(
            "maker".to_string(),
            FieldValue::Uint256(address_to_uint(self.maker)),
        );
        values.insert(
            "receiver".to_string(),
            FieldValue::Uint256(address_to_uint(self.receiver)),
        );
        values.insert(
            "makerAsset".to_string(),
            FieldValue::Uint256(address_to_uint(self.maker_asset)),
        );
        values.insert(
            "takerAsset".to_string(),
            FieldValue::Uint256(address_to_uint(self.taker_asset)),
        );
        values.insert(
            "makingAmount".to_string(),
            FieldValue::Uint256(self.making_amount),
        );
        values.insert(
            "takingAmount".to_string(),
            FieldValue::Uint256(self.taking_amount),
        );
        values.insert(
            "makerTraits".to_string(),
            FieldValue::Uint256(self.maker_traits),
        );
        values
    }

    /// Compute the EIP-712 struct hash for this order.
    pub fn struct_hash(&self) -> Result<B256> {
        order_type().struct_hash(&self.eip712_values())
    }

    pub fn traits(&self) -> Result<MakerTraits> {
        MakerTraits::unpack(self.maker_traits)
    }

    /// Structural validation. Returns human-readable issues; empty when valid.
    pub fn validate(&self) -> Vec<String> {
        let mut issues = Vec::new();

        if self.salt.is_zero() {
            issues.push("salt must be non-zero".to_string());
        }
        if self.salt.bit_len() > SALT_BITS {
            issues.push(format!("salt exceeds {} bits", SALT_BITS));
        }
        if self.making_amount.is_zero() {
            issues.push("making amount must be greater than zero".to_string());
        }
        if self.taking_amount.is_zero() {
            issues.push("taking amount must be greater than zero".to_string());
        }
        for (field, address) in [
            ("maker", self.maker),
            ("receiver", self.receiver),
            ("maker asset", self.maker_asset),
            ("taker asset", self.taker_asset),
        ] {
            if address == Address::ZERO {
                issues.push(format!("{} is the zero address", field));
            }
        }
        if self.maker_asset == self.taker_asset {
            issues.push("maker and taker assets must differ".to_string());
        }

        if self.maker_traits.is_zero() {
            issues.push("maker traits must be non-zero".to_string());
        } else {
            match self.traits() {
                Ok(traits) if traits.nonce == 0 => {
                    issues.push("maker traits must encode a non-zero nonce".to_string())
                }
                Ok(_) => {}
                Err(e) => issues.push(e.to_string()),
            }
        }

        issues
    }
}

/// Result of order creation: the order plus any validation issues.
///
/// The caller decides whether issues are fatal.
#[derive(Debug, Clone)]
pub struct OrderDraft {
    pub order: Order,
    pub issues: Vec<String>,
}

impl OrderDraft {
    pub fn is_valid(&self) -> bool {
        self.issues.is_empty()
    }
}

/// Builds self-fill orders with fresh salt, nonce and traits.
#[derive(Debug, Clone)]
pub struct OrderFactory {
    max_draws: usize,
}

impl Default for OrderFactory {
    fn default() -> Self {
        Self { max_draws: 8 }
    }
}

impl OrderFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an order expiring `expiry_seconds` from now.
    ///
    /// The receiver is always the maker. Structural problems are returned as
    /// issues on the draft rather than as an error.
    ///
    /// # Arguments
    ///
    /// * `maker` - Address that signs and funds the order
    /// * `making_amount` - Base units of `maker_asset` given
    /// * `taking_amount` - Base units of `taker_asset` received
    /// * `expiry_seconds` - Lifetime of the order, relative to now
    ///
    /// # Errors
    ///
    /// Returns [`Error::Input`] if the expiry overflows 32 bits, or an error
    /// if no non-zero salt or nonce could be drawn.
    pub fn create_order(
        &self,
        maker: Address,
        maker_asset: Address,
        taker_asset: Address,
        making_amount: U256,
        taking_amount: U256,
        expiry_seconds: u64,
    ) -> Result<OrderDraft> {
        let now = Utc::now().timestamp().max(0) as u64;
        self.create_order_at(
            now,
            maker,
            maker_asset,
            taker_asset,
            making_amount,
            taking_amount,
            expiry_seconds,
        )
    }

    /// Create an order relative to an explicit unix timestamp.
    #[allow(clippy::too_many_arguments)]
    pub fn create_order_at(
        &self,
        now: u64,
        maker: Address,
        maker_asset: Address,
        taker_asset: Address,
        making_amount: U256,
        taking_amount: U256,
        expiry_seconds: u64,
    ) -> Result<OrderDraft> {
        let expiry = now
            .checked_add(expiry_seconds)
            .and_then(|t| u32::try_from(t).ok())
            .ok_or_else(|| {
                Error::Input(format!(
                    "expiry of {}s from {} does not fit in 32 bits",
                    expiry_seconds, now
                ))
            })?;

        let salt = self.draw_nonzero(generate_salt, U256::is_zero)?;
        let nonce = self.draw_nonzero(generate_nonce, |n| *n == 0)?;
        let traits = MakerTraits::new(nonce, expiry)?;

        let order = Order {
            salt,
            maker,
            receiver: maker,
            maker_asset,
            taker_asset,
            making_amount,
            taking_amount,
            maker_traits: traits.pack(),
        };
        let issues = order.validate();

        Ok(OrderDraft { order, issues })
    }

    fn draw_nonzero<T>(
        &self,
        draw: impl Fn() -> Result<T>,
        is_zero: impl Fn(&T) -> bool,
    ) -> Result<T> {
        let mut value = draw()?;
        for _ in 1..self.max_draws {
            if !is_zero(&value) {
                break;
            }
            value = draw()?;
        }
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{USDC_ADDRESS, WMATIC_ADDRESS};

    fn maker() -> Address {
        "0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266"
            .parse::<Address>()
            .unwrap()
    }

    #[test]
    fn test_order_type_string() {
        assert_eq!(
            order_type().encode_type(),
            "Order(uint256 salt,address maker,address receiver,address makerAsset,address takerAsset,uint256 makingAmount,uint256 takingAmount,uint256 makerTraits)"
        );
    }

    #[test]
    fn test_create_order_scenario() {
        let draft = OrderFactory::new()
            .create_order(
                maker(),
                WMATIC_ADDRESS,
                USDC_ADDRESS,
                U256::from(10_000_000_000_000_000u64),
                U256::from(10_000u64),
                3600,
            )
            .unwrap();

        assert!(draft.is_valid(), "issues: {:?}", draft.issues);
        assert!(!draft.order.salt.is_zero());
        assert_eq!(draft.order.receiver, maker());
        let traits = draft.order.traits().unwrap();
        assert_ne!(traits.nonce, 0);
    }

    #[test]
    fn test_expiry_is_absolute() {
        let draft = OrderFactory::new()
            .create_order_at(
                1_700_000_000,
                maker(),
                WMATIC_ADDRESS,
                USDC_ADDRESS,
                U256::from(1u64),
                U256::from(1u64),
                600,
            )
            .unwrap();
        assert_eq!(draft.order.traits().unwrap().expiry, 1_700_000_600);
    }

    #[test]
    fn test_expiry_overflow_rejected() {
        let result = OrderFactory::new().create_order_at(
            u32::MAX as u64,
            maker(),
            WMATIC_ADDRESS,
            USDC_ADDRESS,
            U256::from(1u64),
            U256::from(1u64),
            1,
        );
        assert!(matches!(result, Err(Error::Input(_))));
    }

    #[test]
    fn test_zero_amounts_reported() {
        let draft = OrderFactory::new()
            .create_order(
                maker(),
                WMATIC_ADDRESS,
                USDC_ADDRESS,
                U256::ZERO,
                U256::ZERO,
                3600,
            )
            .unwrap();
        assert_eq!(draft.issues.len(), 2);
        assert!(draft.issues.iter().all(|i| i.contains("amount")));
    }

    #[test]
    fn test_validate_reports_structural_issues() {
        let order = Order {
            salt: U256::ZERO,
            maker: Address::ZERO,
            receiver: Address::ZERO,
            maker_asset: WMATIC_ADDRESS,
            taker_asset: WMATIC_ADDRESS,
            making_amount: U256::from(1u64),
            taking_amount: U256::from(1u64),
            maker_traits: U256::ZERO,
        };
        let issues = order.validate();
        assert!(issues.iter().any(|i| i.contains("salt")));
        assert!(issues.iter().any(|i| i.contains("maker is the zero address")));
        assert!(issues.iter().any(|i| i.contains("receiver")));
        assert!(issues.iter().any(|i| i.contains("must differ")));
        assert!(issues.iter().any(|i| i.contains("traits")));
    }

    #[test]
    fn test_zero_nonce_reported() {
        let order = Order {
            salt: U256::from(5u64),
            maker: maker(),
            receiver: maker(),
            maker_asset: WMATIC_ADDRESS,
            taker_asset: USDC_ADDRESS,
            making_amount: U256::from(1u64),
            taking_amount: U256::from(1u64),
            maker_traits: MakerTraits::new(0, 1_700_000_000).unwrap().pack(),
        };
        let issues = order.validate();
        assert_eq!(issues, vec!["maker traits must encode a non-zero nonce".to_string()]);
    }

    #[test]
    fn test_addresses_carried_as_uint() {
        let order = OrderFactory::new()
            .create_order(
                maker(),
                WMATIC_ADDRESS,
                USDC_ADDRESS,
                U256::from(1u64),
                U256::from(1u64),
                60,
            )
            .unwrap()
            .order;
        let values = order.eip712_values();
        assert_eq!(
            values.get("maker"),
            Some(&FieldValue::Uint256(address_to_uint(maker())))
        );
        assert_eq!(
            values.get("takerAsset"),
            Some(&FieldValue::Uint256(address_to_uint(USDC_ADDRESS)))
        );
    }

    #[test]
    fn test_struct_hash_matches_sol_types() {
        alloy_sol_types::sol! {
            struct Order {
                uint256 salt;
                address maker;
                address receiver;
                address makerAsset;
                address takerAsset;
                uint256 makingAmount;
                uint256 takingAmount;
                uint256 makerTraits;
            }
        }
        use alloy_sol_types::SolStruct;

        let order = super::Order {
            salt: U256::from(0xdead_beefu64),
            maker: maker(),
            receiver: maker(),
            maker_asset: WMATIC_ADDRESS,
            taker_asset: USDC_ADDRESS,
            making_amount: U256::from(10_000_000_000_000_000u64),
            taking_amount: U256::from(10_000u64),
            maker_traits: MakerTraits::new(42, 1_700_000_000).unwrap().pack(),
        };
        let reference = Order {
            salt: order.salt,
            maker: order.maker,
            receiver: order.receiver,
            makerAsset: order.maker_asset,
            takerAsset: order.taker_asset,
            makingAmount: order.making_amount,
            takingAmount: order.taking_amount,
            makerTraits: order.maker_traits,
        };

        assert_eq!(order.struct_hash().unwrap(), reference.eip712_hash_struct());
    }
}
