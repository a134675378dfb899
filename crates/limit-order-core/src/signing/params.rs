//! Order parameter generation: salt, nonce and the packed maker traits word.
//!
//! Layout of the maker traits word enforced by the router:
//!
//! ```text
//! bit 255                 192 191        160 159        120 119            0
//!     | reserved (zero)      | expiry (32) | nonce (40)   | reserved (zero) |
//! ```

use alloy_primitives::U256;
use rand::rngs::OsRng;
use rand::TryRngCore;

use crate::{Error, Result};

pub const SALT_BITS: usize = 96;
pub const NONCE_OFFSET: usize = 120;
pub const NONCE_BITS: usize = 40;
pub const EXPIRY_OFFSET: usize = 160;
pub const EXPIRY_BITS: usize = 32;

const NONCE_MASK: u64 = (1u64 << NONCE_BITS) - 1;

fn fill_secure(buf: &mut [u8]) -> Result<()> {
    OsRng
        .try_fill_bytes(buf)
        .map_err(|e| Error::Signing(format!("secure random source unavailable: {}", e)))
}

/// Draw a 96-bit salt from the OS random source.
///
/// Zero is a valid draw here; the order factory re-draws it.
pub fn generate_salt() -> Result<U256> {
    let mut buf = [0u8; SALT_BITS / 8];
    fill_secure(&mut buf)?;
    Ok(U256::from_be_slice(&buf))
}

/// Draw a 40-bit nonce from the OS random source.
pub fn generate_nonce() -> Result<u64> {
    let mut buf = [0u8; 8];
    fill_secure(&mut buf)?;
    Ok(u64::from_be_bytes(buf) & NONCE_MASK)
}

/// Nonce and expiry as consumed by the router.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MakerTraits {
    pub nonce: u64,
    /// Absolute unix timestamp in seconds.
    pub expiry: u32,
}

impl MakerTraits {
    pub fn new(nonce: u64, expiry: u32) -> Result<Self> {
        if nonce > NONCE_MASK {
            return Err(Error::Input(format!(
                "nonce {} does not fit in {} bits",
                nonce, NONCE_BITS
            )));
        }
        Ok(Self { nonce, expiry })
    }

    pub fn pack(&self) -> U256 {
        (U256::from(self.nonce) << NONCE_OFFSET) | (U256::from(self.expiry) << EXPIRY_OFFSET)
    }

    /// Split a packed word back into nonce and expiry.
    ///
    /// Any bit outside the nonce and expiry ranges is rejected.
    pub fn unpack(word: U256) -> Result<Self> {
        let nonce_field = U256::from(NONCE_MASK) << NONCE_OFFSET;
        let expiry_field = U256::from(u32::MAX) << EXPIRY_OFFSET;
        if word & !(nonce_field | expiry_field) != U256::ZERO {
            return Err(Error::Input(format!(
                "maker traits 0x{:x} has reserved bits set",
                word
            )));
        }

        let nonce = (word >> NONCE_OFFSET) & U256::from(NONCE_MASK);
        let expiry = (word >> EXPIRY_OFFSET) & U256::from(u32::MAX);
        Ok(Self {
            nonce: nonce.to::<u64>(),
            expiry: expiry.to::<u32>(),
        })
    }
}

/// Pack `nonce` into bits 120-159 and `expiry` into bits 160-191.
pub fn calculate_maker_traits(nonce: u64, expiry: u32) -> Result<U256> {
    Ok(MakerTraits::new(nonce, expiry)?.pack())
}
