//! EIP-712 domain separator for the limit order router.
//!
//! The router binds every order signature to its own address and chain id,
//! so a signature produced for one deployment is rejected by any other.

use alloy_primitives::{Address, B256, U256};

use super::eip712::{Eip712Type, FieldType, FieldValue, FieldValues, TypedField};
use crate::Result;

static EIP712_DOMAIN_FIELDS: [TypedField; 4] = [
    TypedField::new("name", FieldType::String),
    TypedField::new("version", FieldType::String),
    TypedField::new("chainId", FieldType::Uint256),
    TypedField::new("verifyingContract", FieldType::Address),
];

/// `EIP712Domain(string name,string version,uint256 chainId,address verifyingContract)`
pub fn eip712_domain_type() -> Eip712Type {
    Eip712Type::new("EIP712Domain", &EIP712_DOMAIN_FIELDS)
}

/// EIP-712 domain separator for order signing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Eip712Domain {
    /// Domain name.
    pub name: String,
    /// Domain version.
    pub version: String,
    /// Chain ID.
    pub chain_id: U256,
    /// Verifying contract address.
    pub verifying_contract: Address,
}

impl Eip712Domain {
    /// Create domain with custom parameters.
    pub fn custom(
        name: impl Into<String>,
        version: impl Into<String>,
        chain_id: u64,
        verifying_contract: Address,
    ) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            chain_id: U256::from(chain_id),
            verifying_contract,
        }
    }

    /// The domain as an EIP-712 value map.
    pub fn values(&self) -> FieldValues {
        let mut values = FieldValues::new();
        values.insert("name".to_string(), FieldValue::Str(self.name.clone()));
        values.insert("version".to_string(), FieldValue::Str(self.version.clone()));
        values.insert("chainId".to_string(), FieldValue::Uint256(self.chain_id));
        values.insert(
            "verifyingContract".to_string(),
            FieldValue::Address(self.verifying_contract),
        );
        values
    }

    /// Compute the EIP-712 domain separator hash.
    pub fn separator(&self) -> Result<B256> {
        eip712_domain_type().struct_hash(&self.values())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{NetworkConfig, ROUTER_V6_ADDRESS};
    use alloy_primitives::keccak256;

    #[test]
    fn test_domain_type_string() {
        assert_eq!(
            eip712_domain_type().encode_type(),
            "EIP712Domain(string name,string version,uint256 chainId,address verifyingContract)"
        );
    }

    #[test]
    fn test_domain_separator_deterministic() {
        let domain1 = NetworkConfig::polygon().eip712_domain();
        let domain2 = NetworkConfig::polygon().eip712_domain();
        assert_eq!(domain1.separator().unwrap(), domain2.separator().unwrap());
    }

    #[test]
    fn test_domain_separator_manual_layout() {
        let domain = Eip712Domain::custom("1inch Aggregation Router", "6", 137, ROUTER_V6_ADDRESS);

        let mut encoded = Vec::new();
        encoded.extend_from_slice(
            keccak256(
                b"EIP712Domain(string name,string version,uint256 chainId,address verifyingContract)",
            )
            .as_slice(),
        );
        encoded.extend_from_slice(keccak256(b"1inch Aggregation Router").as_slice());
        encoded.extend_from_slice(keccak256(b"6").as_slice());
        encoded.extend_from_slice(&U256::from(137u64).to_be_bytes::<32>());
        encoded.extend_from_slice(B256::left_padding_from(ROUTER_V6_ADDRESS.as_slice()).as_slice());

        assert_eq!(domain.separator().unwrap(), keccak256(&encoded));
    }

    #[test]
    fn test_chain_id_changes_separator() {
        let mainnet = Eip712Domain::custom("1inch Aggregation Router", "6", 137, ROUTER_V6_ADDRESS);
        let amoy = Eip712Domain::custom("1inch Aggregation Router", "6", 80002, ROUTER_V6_ADDRESS);
        assert_ne!(mainnet.separator().unwrap(), amoy.separator().unwrap());
    }

    #[test]
    fn test_matches_sol_types_domain() {
        let ours = Eip712Domain::custom("1inch Aggregation Router", "6", 137, ROUTER_V6_ADDRESS);
        let reference = alloy_sol_types::eip712_domain! {
            name: "1inch Aggregation Router",
            version: "6",
            chain_id: 137,
            verifying_contract: ROUTER_V6_ADDRESS,
        };
        assert_eq!(ours.separator().unwrap(), reference.separator());
    }
}
