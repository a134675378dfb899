//! Chain access and router call data.

pub mod router;
pub mod rpc;

pub use router::{
    decode_fill_order, encode_allowance, encode_fill_order, FillOrderCall, FILL_ORDER_SELECTOR,
};
pub use rpc::{ChainRpc, JsonRpcClient, TransactionReceipt};
