//! Low-S normalization for every elliptic-curve scheme.
//!
//! `(r, s)` and `(r, n - s)` verify against the same key, with the parity
//! of the recovered point flipped. Normalization maps the pair to the one
//! with `s <= n / 2` so a (key, message) pair has a single encoding.

use alloy_primitives::{uint, U256};
use serde::{Deserialize, Serialize};

/// Order of the secp256k1 group.
pub const SECP256K1_ORDER: U256 =
    uint!(0xFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFEBAAEDCE6AF48A03BBFD25E8CD0364141_U256);

/// Order of the secp256r1 (P-256) group.
pub const SECP256R1_ORDER: U256 =
    uint!(0xFFFFFFFF00000000FFFFFFFFFFFFFFFFBCE6FAADA7179E84F3B9CAC2FC632551_U256);

/// Order of the Stark curve group.
pub const STARK_ORDER: U256 =
    uint!(0x0800000000000010FFFFFFFFFFFFFFFFB781126DCAE7B2321E66A241ADC64D2F_U256);

/// Curves with a signature scheme in this crate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Curve {
    Stark,
    Secp256k1,
    Secp256r1,
}

impl Curve {
    pub fn order(self) -> U256 {
        match self {
            Curve::Stark => STARK_ORDER,
            Curve::Secp256k1 => SECP256K1_ORDER,
            Curve::Secp256r1 => SECP256R1_ORDER,
        }
    }

    pub fn half_order(self) -> U256 {
        self.order() >> 1
    }
}

/// Verifier mode: demand low-S, or accept either form.
///
/// Signers always emit low-S. A `Raw` verifier normalizes a high-S
/// signature with [`normalize_s`] before checking it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Normalization {
    #[default]
    Canonical,
    Raw,
}

impl Normalization {
    pub fn is_canonical(self) -> bool {
        matches!(self, Normalization::Canonical)
    }
}

/// Map `(s, parity)` to its low-S form.
pub fn normalize_s(curve: Curve, s: U256, y_parity: bool) -> (U256, bool) {
    if s > curve.half_order() {
        (curve.order() - s, !y_parity)
    } else {
        (s, y_parity)
    }
}

pub fn is_low_s(curve: Curve, s: U256) -> bool {
    s <= curve.half_order()
}
