//! Calls, `__execute__` calldata and invoke v3 transaction hashing.

use serde::{Deserialize, Serialize};
use starknet_crypto::poseidon_hash_many;
use starknet_types_core::felt::Felt;

use crate::calldata::{CairoDeserialize, CairoSerialize, CalldataError, CalldataReader};
use crate::encoding::selector;

/// One contract call.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Call {
    pub to: Felt,
    pub selector: Felt,
    pub calldata: Vec<Felt>,
}

impl Call {
    pub fn new(to: Felt, entrypoint: &str, calldata: Vec<Felt>) -> Self {
        Self { to, selector: selector(entrypoint), calldata }
    }
}

impl CairoSerialize for Call {
    fn serialize_to(&self, out: &mut Vec<Felt>) {
        out.push(self.to);
        out.push(self.selector);
        self.calldata.serialize_to(out);
    }
}

impl CairoDeserialize for Call {
    fn deserialize_from(reader: &mut CalldataReader<'_>) -> Result<Self, CalldataError> {
        Ok(Self { to: reader.read()?, selector: reader.read()?, calldata: reader.read()? })
    }
}

/// `__execute__` calldata for a multicall: `[n, (to, selector, len, data…)…]`.
pub fn execute_calldata(calls: &[Call]) -> Vec<Felt> {
    calls.to_calldata()
}

pub fn parse_execute_calldata(calldata: &[Felt]) -> Result<Vec<Call>, CalldataError> {
    let mut reader = CalldataReader::new(calldata);
    let calls = reader.read()?;
    reader.finish()?;
    Ok(calls)
}

// ---------------------------------------------------------------------------
// Fees
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum DataAvailabilityMode {
    #[default]
    L1,
    L2,
}

impl DataAvailabilityMode {
    fn as_u64(self) -> u64 {
        match self {
            DataAvailabilityMode::L1 => 0,
            DataAvailabilityMode::L2 => 1,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceBounds {
    #[serde(with = "hex_u64")]
    pub max_amount: u64,
    #[serde(with = "hex_u128")]
    pub max_price_per_unit: u128,
}

impl ResourceBounds {
    /// `name (8 bytes) ‖ max_amount (8 bytes) ‖ max_price_per_unit (16 bytes)`.
    fn encode(&self, name: &[u8]) -> Felt {
        let mut word = [0u8; 32];
        word[8 - name.len()..8].copy_from_slice(name);
        word[8..16].copy_from_slice(&self.max_amount.to_be_bytes());
        word[16..].copy_from_slice(&self.max_price_per_unit.to_be_bytes());
        Felt::from_bytes_be(&word)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceBoundsMapping {
    pub l1_gas: ResourceBounds,
    pub l2_gas: ResourceBounds,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub l1_data_gas: Option<ResourceBounds>,
}

// ---------------------------------------------------------------------------
// Invoke v3
// ---------------------------------------------------------------------------

/// Everything a signer needs to hash an invoke v3 transaction except the
/// calls themselves.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvokeDetailsV3 {
    pub sender_address: Felt,
    pub chain_id: Felt,
    pub nonce: Felt,
    #[serde(with = "hex_u64")]
    pub tip: u64,
    pub resource_bounds: ResourceBoundsMapping,
    pub paymaster_data: Vec<Felt>,
    pub account_deployment_data: Vec<Felt>,
    pub nonce_data_availability_mode: DataAvailabilityMode,
    pub fee_data_availability_mode: DataAvailabilityMode,
}

impl InvokeDetailsV3 {
    pub fn new(sender_address: Felt, chain_id: Felt, nonce: Felt, resource_bounds: ResourceBoundsMapping) -> Self {
        Self {
            sender_address,
            chain_id,
            nonce,
            tip: 0,
            resource_bounds,
            paymaster_data: Vec::new(),
            account_deployment_data: Vec::new(),
            nonce_data_availability_mode: DataAvailabilityMode::L1,
            fee_data_availability_mode: DataAvailabilityMode::L1,
        }
    }

    pub fn transaction_hash(&self, calls: &[Call]) -> Felt {
        self.hash_calldata(&execute_calldata(calls))
    }

    pub fn hash_calldata(&self, calldata: &[Felt]) -> Felt {
        let bounds = &self.resource_bounds;
        let mut fee_fields = vec![
            Felt::from(self.tip),
            bounds.l1_gas.encode(b"L1_GAS"),
            bounds.l2_gas.encode(b"L2_GAS"),
        ];
        if let Some(l1_data_gas) = &bounds.l1_data_gas {
            fee_fields.push(l1_data_gas.encode(b"L1_DATA"));
        }
        let data_availability = (self.nonce_data_availability_mode.as_u64() << 32)
            + self.fee_data_availability_mode.as_u64();

        poseidon_hash_many(&[
            Felt::from_bytes_be_slice(b"invoke"),
            Felt::from(3u64),
            self.sender_address,
            poseidon_hash_many(&fee_fields),
            poseidon_hash_many(&self.paymaster_data),
            self.chain_id,
            self.nonce,
            Felt::from(data_availability),
            poseidon_hash_many(&self.account_deployment_data),
            poseidon_hash_many(calldata),
        ])
    }

    pub fn into_transaction(self, calls: &[Call], signature: Vec<Felt>) -> InvokeTransactionV3 {
        InvokeTransactionV3 {
            sender_address: self.sender_address,
            calldata: execute_calldata(calls),
            signature,
            nonce: self.nonce,
            tip: self.tip,
            resource_bounds: self.resource_bounds,
            paymaster_data: self.paymaster_data,
            account_deployment_data: self.account_deployment_data,
            nonce_data_availability_mode: self.nonce_data_availability_mode,
            fee_data_availability_mode: self.fee_data_availability_mode,
        }
    }
}

/// A signed invoke v3 transaction as broadcast to a node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvokeTransactionV3 {
    pub sender_address: Felt,
    pub calldata: Vec<Felt>,
    pub signature: Vec<Felt>,
    pub nonce: Felt,
    #[serde(with = "hex_u64")]
    pub tip: u64,
    pub resource_bounds: ResourceBoundsMapping,
    pub paymaster_data: Vec<Felt>,
    pub account_deployment_data: Vec<Felt>,
    pub nonce_data_availability_mode: DataAvailabilityMode,
    pub fee_data_availability_mode: DataAvailabilityMode,
}

impl InvokeTransactionV3 {
    pub fn details(&self, chain_id: Felt) -> InvokeDetailsV3 {
        InvokeDetailsV3 {
            sender_address: self.sender_address,
            chain_id,
            nonce: self.nonce,
            tip: self.tip,
            resource_bounds: self.resource_bounds,
            paymaster_data: self.paymaster_data.clone(),
            account_deployment_data: self.account_deployment_data.clone(),
            nonce_data_availability_mode: self.nonce_data_availability_mode,
            fee_data_availability_mode: self.fee_data_availability_mode,
        }
    }

    pub fn transaction_hash(&self, chain_id: Felt) -> Felt {
        self.details(chain_id).hash_calldata(&self.calldata)
    }

    pub fn calls(&self) -> Result<Vec<Call>, CalldataError> {
        parse_execute_calldata(&self.calldata)
    }
}

mod hex_u64 {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &u64, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&format!("{value:#x}"))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u64, D::Error> {
        let s = String::deserialize(deserializer)?;
        u64::from_str_radix(s.trim_start_matches("0x"), 16).map_err(serde::de::Error::custom)
    }
}

mod hex_u128 {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &u128, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&format!("{value:#x}"))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u128, D::Error> {
        let s = String::deserialize(deserializer)?;
        u128::from_str_radix(s.trim_start_matches("0x"), 16).map_err(serde::de::Error::custom)
    }
}
