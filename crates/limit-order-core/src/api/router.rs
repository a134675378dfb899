//! Router call data.
//!
//! `fillOrder((uint256,uint256,uint256,uint256,uint256,uint256,uint256,uint256),bytes32,bytes32,uint256,uint256)`
//! takes only static arguments, so the call data is a flat sequence of
//! 32-byte words after the selector:
//!
//! ```text
//! selector | salt maker receiver makerAsset takerAsset making taking traits | r | vs | amount | takerTraits
//! ```

use alloy_primitives::{Address, Bytes, B256, U256};
use serde::{Deserialize, Serialize};

use crate::signing::{address_to_uint, CompactSignature, Order, SignedOrder};
use crate::{Error, Result};

/// `fillOrder(...)` selector.
pub const FILL_ORDER_SELECTOR: [u8; 4] = [0x9f, 0xda, 0x64, 0xbd];

/// ERC-20 `allowance(address,address)` selector.
pub const ALLOWANCE_SELECTOR: [u8; 4] = [0xdd, 0x62, 0xed, 0x3e];

const WORD: usize = 32;
const FILL_ORDER_WORDS: usize = 12;

/// Total length of `fillOrder` call data.
pub const FILL_ORDER_CALLDATA_LEN: usize = 4 + FILL_ORDER_WORDS * WORD;

/// Decoded `fillOrder` arguments.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FillOrderCall {
    pub order: Order,
    pub signature: CompactSignature,
    pub amount: U256,
    pub taker_traits: U256,
}

fn push_word(data: &mut Vec<u8>, value: U256) {
    data.extend_from_slice(&value.to_be_bytes::<32>());
}

/// Encode a `fillOrder` call for a signed order.
///
/// Addresses go out as their integer value, matching the order's EIP-712 message.
pub fn encode_fill_order(signed: &SignedOrder, amount: U256, taker_traits: U256) -> Bytes {
    let order = &signed.order;
    let mut data = Vec::with_capacity(FILL_ORDER_CALLDATA_LEN);
    data.extend_from_slice(&FILL_ORDER_SELECTOR);

    push_word(&mut data, order.salt);
    push_word(&mut data, address_to_uint(order.maker));
    push_word(&mut data, address_to_uint(order.receiver));
    push_word(&mut data, address_to_uint(order.maker_asset));
    push_word(&mut data, address_to_uint(order.taker_asset));
    push_word(&mut data, order.making_amount);
    push_word(&mut data, order.taking_amount);
    push_word(&mut data, order.maker_traits);

    data.extend_from_slice(signed.signature.r.as_slice());
    data.extend_from_slice(signed.signature.vs.as_slice());
    push_word(&mut data, amount);
    push_word(&mut data, taker_traits);

    Bytes::from(data)
}

/// Parse `fillOrder` call data back into its arguments.
pub fn decode_fill_order(calldata: &[u8]) -> Result<FillOrderCall> {
    if calldata.len() != FILL_ORDER_CALLDATA_LEN {
        return Err(Error::Input(format!(
            "fillOrder call data must be {} bytes, got {}",
            FILL_ORDER_CALLDATA_LEN,
            calldata.len()
        )));
    }
    if calldata[..4] != FILL_ORDER_SELECTOR {
        return Err(Error::Input(format!(
            "unexpected selector 0x{}",
            hex::encode(&calldata[..4])
        )));
    }

    let words: Vec<&[u8]> = calldata[4..].chunks_exact(WORD).collect();
    let uint = |i: usize| U256::from_be_slice(words[i]);
    let address = |i: usize| -> Result<Address> {
        if words[i][..12].iter().any(|b| *b != 0) {
            return Err(Error::Input(format!("word {} is not an address", i)));
        }
        Ok(Address::from_slice(&words[i][12..]))
    };

    let order = Order {
        salt: uint(0),
        maker: address(1)?,
        receiver: address(2)?,
        maker_asset: address(3)?,
        taker_asset: address(4)?,
        making_amount: uint(5),
        taking_amount: uint(6),
        maker_traits: uint(7),
    };

    Ok(FillOrderCall {
        order,
        signature: CompactSignature {
            r: B256::from_slice(words[8]),
            vs: B256::from_slice(words[9]),
        },
        amount: uint(10),
        taker_traits: uint(11),
    })
}

/// Encode `allowance(owner, spender)`.
pub fn encode_allowance(owner: Address, spender: Address) -> Bytes {
    let mut data = Vec::with_capacity(4 + 2 * WORD);
    data.extend_from_slice(&ALLOWANCE_SELECTOR);
    data.extend_from_slice(B256::left_padding_from(owner.as_slice()).as_slice());
    data.extend_from_slice(B256::left_padding_from(spender.as_slice()).as_slice());
    Bytes::from(data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{USDC_ADDRESS, WMATIC_ADDRESS};
    use crate::signing::MakerTraits;
    use alloy_primitives::keccak256;
    use alloy_sol_types::{sol, SolCall};

    sol! {
        struct RouterOrder {
            uint256 salt;
            uint256 maker;
            uint256 receiver;
            uint256 makerAsset;
            uint256 takerAsset;
            uint256 makingAmount;
            uint256 takingAmount;
            uint256 makerTraits;
        }

        function fillOrder(RouterOrder order, bytes32 r, bytes32 vs, uint256 amount, uint256 takerTraits);
        function allowance(address owner, address spender);
    }

    fn signed_order() -> SignedOrder {
        let maker = Address::repeat_byte(0x5a);
        SignedOrder {
            order: Order {
                salt: U256::from(0x1234_5678u64),
                maker,
                receiver: maker,
                maker_asset: WMATIC_ADDRESS,
                taker_asset: USDC_ADDRESS,
                making_amount: U256::from(10_000_000_000_000_000u64),
                taking_amount: U256::from(10_000u64),
                maker_traits: MakerTraits::new(77, 1_700_000_000).unwrap().pack(),
            },
            order_hash: B256::repeat_byte(0x01),
            signature: CompactSignature {
                r: B256::repeat_byte(0x11),
                vs: B256::repeat_byte(0x82),
            },
        }
    }

    #[test]
    fn test_selector_matches_signature() {
        let hash = keccak256(
            b"fillOrder((uint256,uint256,uint256,uint256,uint256,uint256,uint256,uint256),bytes32,bytes32,uint256,uint256)",
        );
        assert_eq!(&hash[..4], &FILL_ORDER_SELECTOR);
        assert_eq!(fillOrderCall::SELECTOR, FILL_ORDER_SELECTOR);
    }

    #[test]
    fn test_encoding_matches_sol_types() {
        let signed = signed_order();
        let order = &signed.order;
        let reference = fillOrderCall {
            order: RouterOrder {
                salt: order.salt,
                maker: address_to_uint(order.maker),
                receiver: address_to_uint(order.receiver),
                makerAsset: address_to_uint(order.maker_asset),
                takerAsset: address_to_uint(order.taker_asset),
                makingAmount: order.making_amount,
                takingAmount: order.taking_amount,
                makerTraits: order.maker_traits,
            },
            r: signed.signature.r,
            vs: signed.signature.vs,
            amount: order.taking_amount,
            takerTraits: U256::ZERO,
        }
        .abi_encode();

        let ours = encode_fill_order(&signed, order.taking_amount, U256::ZERO);
        assert_eq!(ours.len(), FILL_ORDER_CALLDATA_LEN);
        assert_eq!(ours.as_ref(), reference.as_slice());
    }

    #[test]
    fn test_decode_recovers_arguments() {
        let signed = signed_order();
        let data = encode_fill_order(&signed, U256::from(10_000u64), U256::ZERO);
        let call = decode_fill_order(&data).unwrap();

        assert_eq!(call.order, signed.order);
        assert_eq!(call.signature, signed.signature);
        assert_eq!(call.amount, U256::from(10_000u64));
        assert_eq!(call.taker_traits, U256::ZERO);
    }

    #[test]
    fn test_decode_rejects_wrong_selector_and_length() {
        let signed = signed_order();
        let mut data = encode_fill_order(&signed, U256::from(1u64), U256::ZERO).to_vec();

        assert!(decode_fill_order(&data[..100]).is_err());
        data[0] = 0;
        assert!(matches!(decode_fill_order(&data), Err(Error::Input(_))));
    }

    #[test]
    fn test_allowance_encoding() {
        let owner = Address::repeat_byte(0x01);
        let spender = Address::repeat_byte(0x02);
        let reference = allowanceCall { owner, spender }.abi_encode();
        assert_eq!(encode_allowance(owner, spender).as_ref(), reference.as_slice());
    }
}
