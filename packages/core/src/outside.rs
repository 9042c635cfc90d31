//! Outside execution: meta-transactions submitted by a third party.
//!
//! The envelope restricts who may submit it (`caller`, or [`ANY_CALLER`]),
//! when (`execute_after < now < execute_before`) and how often (a nonce the
//! verifier burns on first use). It hashes under either SNIP-12 revision:
//!
//! | Revision | Entry point | Struct layout |
//! |----------|-------------|---------------|
//! | V0 | `execute_from_outside` | explicit `calls_len` / `calldata_len`, Pedersen |
//! | V1 | `execute_from_outside_v2` | no length fields, Poseidon |
//!
//! A hash produced under one revision never verifies under the other.

use std::sync::LazyLock;

use rand::RngCore;
use serde::{Deserialize, Serialize};
use starknet_types_core::felt::Felt;

use crate::calldata::{CairoDeserialize, CairoSerialize, CalldataError, CalldataReader};
use crate::transaction::Call;
use crate::typed_data::{type_hash, Domain, Revision};

pub const OUTSIDE_DOMAIN_NAME: &str = "Account.execute_from_outside";

pub const DEFAULT_EXECUTE_AFTER: u64 = 1;
pub const DEFAULT_EXECUTE_BEFORE: u64 = 999_999_999_999_999;

/// Caller sentinel that disables caller matching.
pub static ANY_CALLER: LazyLock<Felt> = LazyLock::new(|| Felt::from_bytes_be_slice(b"ANY_CALLER"));

const OUTSIDE_EXECUTION_TYPE_V0: &str = concat!(
    "OutsideExecution(caller:felt,nonce:felt,execute_after:felt,execute_before:felt,",
    "calls_len:felt,calls:OutsideCall*)",
    "OutsideCall(to:felt,selector:felt,calldata_len:felt,calldata:felt*)"
);

const OUTSIDE_CALL_TYPE_V0: &str = "OutsideCall(to:felt,selector:felt,calldata_len:felt,calldata:felt*)";

const OUTSIDE_EXECUTION_TYPE_V1: &str = concat!(
    r#""OutsideExecution"("Caller":"ContractAddress","Nonce":"felt","Execute After":"u128","#,
    r#""Execute Before":"u128","Calls":"Call*")"#,
    r#""Call"("To":"ContractAddress","Selector":"selector","Calldata":"felt*")"#
);

const OUTSIDE_CALL_TYPE_V1: &str = r#""Call"("To":"ContractAddress","Selector":"selector","Calldata":"felt*")"#;

/// Outside-execution domain for a chain and revision.
pub fn outside_domain(chain_id: Felt, revision: Revision) -> Domain {
    Domain {
        name: Felt::from_bytes_be_slice(OUTSIDE_DOMAIN_NAME.as_bytes()),
        version: Felt::ONE,
        chain_id,
        revision,
    }
}

/// A fresh high-entropy nonce below 2^251.
pub fn random_nonce() -> Felt {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    bytes[0] &= 0x07;
    Felt::from_bytes_be(&bytes)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutsideExecution {
    pub caller: Felt,
    pub nonce: Felt,
    pub execute_after: u64,
    pub execute_before: u64,
    pub calls: Vec<Call>,
}

impl OutsideExecution {
    /// Envelope any address may submit, with a random nonce and the widest
    /// default window.
    pub fn new(calls: Vec<Call>) -> Self {
        Self {
            caller: *ANY_CALLER,
            nonce: random_nonce(),
            execute_after: DEFAULT_EXECUTE_AFTER,
            execute_before: DEFAULT_EXECUTE_BEFORE,
            calls,
        }
    }

    pub fn with_caller(mut self, caller: Felt) -> Self {
        self.caller = caller;
        self
    }

    pub fn with_nonce(mut self, nonce: Felt) -> Self {
        self.nonce = nonce;
        self
    }

    pub fn with_window(mut self, execute_after: u64, execute_before: u64) -> Self {
        self.execute_after = execute_after;
        self.execute_before = execute_before;
        self
    }

    pub fn is_any_caller(&self) -> bool {
        self.caller == *ANY_CALLER
    }

    /// Whether `submitter` may submit this envelope.
    pub fn accepts_caller(&self, submitter: &Felt) -> bool {
        self.is_any_caller() || self.caller == *submitter
    }

    /// Whether `now` lies strictly inside the validity window.
    pub fn is_open_at(&self, now: u64) -> bool {
        self.execute_after < now && now < self.execute_before
    }

    pub fn struct_hash(&self, revision: Revision) -> Felt {
        match revision {
            Revision::V0 => {
                let calls: Vec<Felt> = self.calls.iter().map(call_hash_v0).collect();
                revision.hash_elements(&[
                    type_hash(OUTSIDE_EXECUTION_TYPE_V0),
                    self.caller,
                    self.nonce,
                    Felt::from(self.execute_after),
                    Felt::from(self.execute_before),
                    Felt::from(self.calls.len()),
                    revision.hash_elements(&calls),
                ])
            }
            Revision::V1 => {
                let calls: Vec<Felt> = self.calls.iter().map(call_hash_v1).collect();
                revision.hash_elements(&[
                    type_hash(OUTSIDE_EXECUTION_TYPE_V1),
                    self.caller,
                    self.nonce,
                    Felt::from(self.execute_after),
                    Felt::from(self.execute_before),
                    revision.hash_elements(&calls),
                ])
            }
        }
    }

    /// Typed-data hash the account signs, or the session binding's first
    /// input on the outside-execution path.
    pub fn message_hash(&self, chain_id: Felt, account: Felt, revision: Revision) -> Felt {
        outside_domain(chain_id, revision).message_hash(account, self.struct_hash(revision))
    }

    /// The call a relayer submits to `account`.
    pub fn to_call(&self, account: Felt, signature: &[Felt], revision: Revision) -> Call {
        let mut calldata = self.to_calldata();
        signature.serialize_to(&mut calldata);
        Call::new(account, entrypoint(revision), calldata)
    }
}

/// Entry point matching a typed-data revision.
pub fn entrypoint(revision: Revision) -> &'static str {
    match revision {
        Revision::V0 => "execute_from_outside",
        Revision::V1 => "execute_from_outside_v2",
    }
}

fn call_hash_v0(call: &Call) -> Felt {
    Revision::V0.hash_elements(&[
        type_hash(OUTSIDE_CALL_TYPE_V0),
        call.to,
        call.selector,
        Felt::from(call.calldata.len()),
        Revision::V0.hash_elements(&call.calldata),
    ])
}

fn call_hash_v1(call: &Call) -> Felt {
    Revision::V1.hash_elements(&[
        type_hash(OUTSIDE_CALL_TYPE_V1),
        call.to,
        call.selector,
        Revision::V1.hash_elements(&call.calldata),
    ])
}

impl CairoSerialize for OutsideExecution {
    fn serialize_to(&self, out: &mut Vec<Felt>) {
        out.push(self.caller);
        out.push(self.nonce);
        self.execute_after.serialize_to(out);
        self.execute_before.serialize_to(out);
        self.calls.serialize_to(out);
    }
}

impl CairoDeserialize for OutsideExecution {
    fn deserialize_from(reader: &mut CalldataReader<'_>) -> Result<Self, CalldataError> {
        Ok(Self {
            caller: reader.read()?,
            nonce: reader.read()?,
            execute_after: reader.read()?,
            execute_before: reader.read()?,
            calls: reader.read()?,
        })
    }
}

/// Split `execute_from_outside*` calldata into the envelope and its
/// signature.
pub fn parse_outside_calldata(calldata: &[Felt]) -> Result<(OutsideExecution, Vec<Felt>), CalldataError> {
    let mut reader = CalldataReader::new(calldata);
    let envelope = reader.read()?;
    let signature = reader.read()?;
    reader.finish()?;
    Ok((envelope, signature))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoding::short_string;

    fn chain() -> Felt {
        short_string("SN_SEPOLIA").unwrap()
    }

    fn account() -> Felt {
        Felt::from(0xacc0u64)
    }

    fn envelope() -> OutsideExecution {
        OutsideExecution::new(vec![Call::new(Felt::from(0xda99u64), "set_number", vec![Felt::from(42u64)])])
            .with_nonce(Felt::from(7u64))
    }

    #[test]
    fn any_caller_is_the_short_string() {
        assert_eq!(*ANY_CALLER, short_string("ANY_CALLER").unwrap());
        assert!(envelope().accepts_caller(&Felt::from(123u64)));
        let restricted = envelope().with_caller(Felt::from(5u64));
        assert!(restricted.accepts_caller(&Felt::from(5u64)));
        assert!(!restricted.accepts_caller(&Felt::from(6u64)));
    }

    #[test]
    fn window_is_exclusive_on_both_ends() {
        let envelope = envelope().with_window(100, 200);
        assert!(!envelope.is_open_at(100));
        assert!(envelope.is_open_at(101));
        assert!(envelope.is_open_at(199));
        assert!(!envelope.is_open_at(200));
    }

    #[test]
    fn revisions_hash_differently() {
        let envelope = envelope();
        assert_ne!(
            envelope.message_hash(chain(), account(), Revision::V0),
            envelope.message_hash(chain(), account(), Revision::V1)
        );
    }

    #[test]
    fn every_field_changes_the_hash() {
        for revision in [Revision::V0, Revision::V1] {
            let base = envelope().message_hash(chain(), account(), revision);
            let variants = [
                envelope().with_caller(Felt::from(9u64)),
                envelope().with_nonce(Felt::from(8u64)),
                envelope().with_window(2, DEFAULT_EXECUTE_BEFORE),
                envelope().with_window(DEFAULT_EXECUTE_AFTER, 5),
                {
                    let mut changed = envelope();
                    changed.calls[0].calldata[0] = Felt::from(43u64);
                    changed
                },
                {
                    let mut changed = envelope();
                    changed.calls.push(Call::new(Felt::ONE, "get_number", vec![]));
                    changed
                },
            ];
            for variant in variants {
                assert_ne!(variant.message_hash(chain(), account(), revision), base, "{revision:?}");
            }
        }
    }

    #[test]
    fn to_call_selects_entry_point_and_appends_signature() {
        let envelope = envelope();
        let signature = vec![Felt::from(11u64), Felt::from(12u64)];
        let call = envelope.to_call(account(), &signature, Revision::V1);
        assert_eq!(call.to, account());
        assert_eq!(call, Call::new(account(), "execute_from_outside_v2", call.calldata.clone()));
        assert_eq!(call.calldata[0], *ANY_CALLER);
        assert_eq!(call.calldata[2], Felt::from(DEFAULT_EXECUTE_AFTER));

        let (parsed, parsed_signature) = parse_outside_calldata(&call.calldata).unwrap();
        assert_eq!(parsed, envelope);
        assert_eq!(parsed_signature, signature);

        let legacy = envelope.to_call(account(), &signature, Revision::V0);
        assert_eq!(legacy.selector, crate::encoding::selector("execute_from_outside"));
    }

    #[test]
    fn random_nonces_differ() {
        assert_ne!(random_nonce(), random_nonce());
    }
}
