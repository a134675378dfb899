//! Schema-driven EIP-712 hashing.
//!
//! A struct is described by an [`Eip712Type`]: a primary type name plus an
//! ordered list of typed fields. Values are supplied as a [`FieldValues`] map
//! of tagged [`FieldValue`]s. Field order in the schema is significant and is
//! never sorted.
//!
//! The router's order struct declares `maker`, `receiver`, `makerAsset` and
//! `takerAsset` as `address` in its type string while the message carries
//! their integer value (`uint256`). An `address`-typed field therefore accepts
//! either an [`FieldValue::Address`] or a [`FieldValue::Uint256`] that fits in
//! 160 bits; both serialize to the same left-padded 32-byte word.

use alloy_primitives::{keccak256, Address, B256, U256};
use std::borrow::Cow;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::{Error, Result};

/// Field values keyed by field name.
pub type FieldValues = BTreeMap<String, FieldValue>;

/// Solidity types supported by the digest engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    Address,
    Uint256,
    String,
}

impl FieldType {
    pub fn as_str(&self) -> &'static str {
        match self {
            FieldType::Address => "address",
            FieldType::Uint256 => "uint256",
            FieldType::String => "string",
        }
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FieldType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "address" => Ok(FieldType::Address),
            "uint256" => Ok(FieldType::Uint256),
            "string" => Ok(FieldType::String),
            other => Err(Error::Digest(format!("unsupported field type '{}'", other))),
        }
    }
}

/// A tagged EIP-712 message value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldValue {
    Address(Address),
    Uint256(U256),
    Str(String),
}

impl From<Address> for FieldValue {
    fn from(a: Address) -> Self {
        FieldValue::Address(a)
    }
}

impl From<U256> for FieldValue {
    fn from(v: U256) -> Self {
        FieldValue::Uint256(v)
    }
}

impl From<&str> for FieldValue {
    fn from(s: &str) -> Self {
        FieldValue::Str(s.to_string())
    }
}

/// One `type name` entry of a struct schema.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypedField {
    pub name: Cow<'static, str>,
    pub ty: FieldType,
}

impl TypedField {
    pub const fn new(name: &'static str, ty: FieldType) -> Self {
        Self {
            name: Cow::Borrowed(name),
            ty,
        }
    }
}

/// A named struct schema.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Eip712Type {
    pub name: Cow<'static, str>,
    pub fields: Cow<'static, [TypedField]>,
}

impl Eip712Type {
    /// Schema backed by a static field table.
    pub const fn new(name: &'static str, fields: &'static [TypedField]) -> Self {
        Self {
            name: Cow::Borrowed(name),
            fields: Cow::Borrowed(fields),
        }
    }

    /// Build a schema from `(type, name)` string pairs.
    ///
    /// Unknown type names are rejected with [`Error::Digest`].
    pub fn parse(name: &str, fields: &[(&str, &str)]) -> Result<Self> {
        let fields = fields
            .iter()
            .map(|(ty, field)| {
                Ok(TypedField {
                    name: Cow::Owned(field.to_string()),
                    ty: ty.parse()?,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            name: Cow::Owned(name.to_string()),
            fields: Cow::Owned(fields),
        })
    }

    /// `Name(type1 name1,type2 name2,...)`
    pub fn encode_type(&self) -> String {
        let fields: Vec<String> = self
            .fields
            .iter()
            .map(|f| format!("{} {}", f.ty, f.name))
            .collect();
        format!("{}({})", self.name, fields.join(","))
    }

    pub fn type_hash(&self) -> B256 {
        keccak256(self.encode_type().as_bytes())
    }

    /// `keccak256(typeHash ‖ encodedValue(field)...)` in schema order.
    pub fn struct_hash(&self, values: &FieldValues) -> Result<B256> {
        let mut encoded = Vec::with_capacity(32 * (self.fields.len() + 1));
        encoded.extend_from_slice(self.type_hash().as_slice());

        for field in self.fields.iter() {
            let value = values.get(field.name.as_ref()).ok_or_else(|| {
                Error::Digest(format!(
                    "missing value for field '{}' of {}",
                    field.name, self.name
                ))
            })?;
            let word = encode_value(field.ty, value).map_err(|e| match e {
                Error::Digest(msg) => Error::Digest(format!("{}.{}: {}", self.name, field.name, msg)),
                other => other,
            })?;
            encoded.extend_from_slice(word.as_slice());
        }

        Ok(keccak256(&encoded))
    }
}

/// Encode a single value as its 32-byte EIP-712 word.
pub fn encode_value(ty: FieldType, value: &FieldValue) -> Result<B256> {
    match (ty, value) {
        (FieldType::Address, FieldValue::Address(a)) => Ok(B256::left_padding_from(a.as_slice())),
        (FieldType::Address, FieldValue::Uint256(v)) => {
            if v.bit_len() > 160 {
                return Err(Error::Digest(format!(
                    "integer {} does not fit in an address",
                    v
                )));
            }
            Ok(B256::from(v.to_be_bytes::<32>()))
        }
        (FieldType::Uint256, FieldValue::Uint256(v)) => Ok(B256::from(v.to_be_bytes::<32>())),
        (FieldType::Uint256, FieldValue::Str(s)) => {
            let v = parse_uint(s)?;
            Ok(B256::from(v.to_be_bytes::<32>()))
        }
        (FieldType::String, FieldValue::Str(s)) => Ok(keccak256(s.as_bytes())),
        (ty, value) => Err(Error::Digest(format!(
            "value {:?} cannot be encoded as {}",
            value, ty
        ))),
    }
}

fn parse_uint(s: &str) -> Result<U256> {
    let s = s.trim();
    let parsed = match s.strip_prefix("0x") {
        Some(hex) => U256::from_str_radix(hex, 16),
        None => U256::from_str_radix(s, 10),
    };
    parsed.map_err(|e| Error::Digest(format!("'{}' is not a uint256: {}", s, e)))
}

/// Compute the EIP-712 signing digest: `keccak256(0x19 ‖ 0x01 ‖ domainSeparator ‖ structHash)`.
pub fn typed_data_digest(domain_separator: B256, struct_hash: B256) -> B256 {
    let mut data = [0u8; 66];
    data[0] = 0x19;
    data[1] = 0x01;
    data[2..34].copy_from_slice(domain_separator.as_slice());
    data[34..].copy_from_slice(struct_hash.as_slice());
    keccak256(data)
}
