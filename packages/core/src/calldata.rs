//! Cairo Serde: flattening typed values into felts and reading them back.
//!
//! Spans are length-prefixed, `bool` is `0`/`1`, enums write their variant
//! index first and `Option` follows Cairo's `Some = 0`, `None = 1` order.

use starknet_types_core::felt::Felt;
use thiserror::Error;

use crate::encoding::{felt_to_u128, felt_to_u64};

/// Errors returned while decoding calldata.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CalldataError {
    #[error("calldata ended at position {0}")]
    UnexpectedEnd(usize),
    #[error("expected a bool at position {position}, found {value}")]
    NotABool { position: usize, value: String },
    #[error("value at position {position} is out of range for {ty}")]
    OutOfRange { position: usize, ty: &'static str },
    #[error("unknown {name} variant {index}")]
    UnknownVariant { name: &'static str, index: u64 },
    #[error("{0} unread felts after decoding")]
    TrailingData(usize),
}

/// Types that can be written as Cairo calldata.
pub trait CairoSerialize {
    fn serialize_to(&self, out: &mut Vec<Felt>);

    fn to_calldata(&self) -> Vec<Felt> {
        let mut out = Vec::new();
        self.serialize_to(&mut out);
        out
    }
}

/// Types that can be read back from Cairo calldata.
pub trait CairoDeserialize: Sized {
    fn deserialize_from(reader: &mut CalldataReader<'_>) -> Result<Self, CalldataError>;
}

impl CairoSerialize for Felt {
    fn serialize_to(&self, out: &mut Vec<Felt>) {
        out.push(*self);
    }
}

impl CairoSerialize for bool {
    fn serialize_to(&self, out: &mut Vec<Felt>) {
        out.push(if *self { Felt::ONE } else { Felt::ZERO });
    }
}

impl CairoSerialize for u8 {
    fn serialize_to(&self, out: &mut Vec<Felt>) {
        out.push(Felt::from(*self));
    }
}

impl CairoSerialize for u32 {
    fn serialize_to(&self, out: &mut Vec<Felt>) {
        out.push(Felt::from(*self));
    }
}

impl CairoSerialize for u64 {
    fn serialize_to(&self, out: &mut Vec<Felt>) {
        out.push(Felt::from(*self));
    }
}

impl CairoSerialize for u128 {
    fn serialize_to(&self, out: &mut Vec<Felt>) {
        out.push(Felt::from(*self));
    }
}

impl<T: CairoSerialize> CairoSerialize for [T] {
    fn serialize_to(&self, out: &mut Vec<Felt>) {
        out.push(Felt::from(self.len()));
        for item in self {
            item.serialize_to(out);
        }
    }
}

impl<T: CairoSerialize> CairoSerialize for Vec<T> {
    fn serialize_to(&self, out: &mut Vec<Felt>) {
        self.as_slice().serialize_to(out);
    }
}

impl<T: CairoSerialize> CairoSerialize for Option<T> {
    fn serialize_to(&self, out: &mut Vec<Felt>) {
        match self {
            Some(value) => {
                out.push(Felt::ZERO);
                value.serialize_to(out);
            }
            None => out.push(Felt::ONE),
        }
    }
}

impl<T: CairoSerialize + ?Sized> CairoSerialize for &T {
    fn serialize_to(&self, out: &mut Vec<Felt>) {
        (**self).serialize_to(out);
    }
}

// ---------------------------------------------------------------------------
// Reader
// ---------------------------------------------------------------------------

/// Cursor over a felt slice.
#[derive(Debug, Clone)]
pub struct CalldataReader<'a> {
    felts: &'a [Felt],
    position: usize,
}

impl<'a> CalldataReader<'a> {
    pub fn new(felts: &'a [Felt]) -> Self {
        Self { felts, position: 0 }
    }

    pub fn position(&self) -> usize {
        self.position
    }

    pub fn remaining(&self) -> usize {
        self.felts.len() - self.position
    }

    pub fn next_felt(&mut self) -> Result<Felt, CalldataError> {
        let felt = self
            .felts
            .get(self.position)
            .copied()
            .ok_or(CalldataError::UnexpectedEnd(self.position))?;
        self.position += 1;
        Ok(felt)
    }

    /// Read a span length prefix.
    pub fn next_len(&mut self) -> Result<usize, CalldataError> {
        let position = self.position;
        let felt = self.next_felt()?;
        let len = felt_to_u64(&felt)
            .map_err(|_| CalldataError::OutOfRange { position, ty: "usize" })?;
        // A span can never be longer than the data left to read.
        if len as usize > self.remaining() {
            return Err(CalldataError::UnexpectedEnd(self.felts.len()));
        }
        Ok(len as usize)
    }

    pub fn read<T: CairoDeserialize>(&mut self) -> Result<T, CalldataError> {
        T::deserialize_from(self)
    }

    /// Fail unless every felt was consumed.
    pub fn finish(self) -> Result<(), CalldataError> {
        match self.remaining() {
            0 => Ok(()),
            n => Err(CalldataError::TrailingData(n)),
        }
    }
}

impl CairoDeserialize for Felt {
    fn deserialize_from(reader: &mut CalldataReader<'_>) -> Result<Self, CalldataError> {
        reader.next_felt()
    }
}

impl CairoDeserialize for bool {
    fn deserialize_from(reader: &mut CalldataReader<'_>) -> Result<Self, CalldataError> {
        let position = reader.position();
        let felt = reader.next_felt()?;
        if felt == Felt::ZERO {
            Ok(false)
        } else if felt == Felt::ONE {
            Ok(true)
        } else {
            Err(CalldataError::NotABool { position, value: felt.to_hex_string() })
        }
    }
}

impl CairoDeserialize for u8 {
    fn deserialize_from(reader: &mut CalldataReader<'_>) -> Result<Self, CalldataError> {
        let position = reader.position();
        let value = u64::deserialize_from(reader)?;
        u8::try_from(value).map_err(|_| CalldataError::OutOfRange { position, ty: "u8" })
    }
}

impl CairoDeserialize for u32 {
    fn deserialize_from(reader: &mut CalldataReader<'_>) -> Result<Self, CalldataError> {
        let position = reader.position();
        let value = u64::deserialize_from(reader)?;
        u32::try_from(value).map_err(|_| CalldataError::OutOfRange { position, ty: "u32" })
    }
}

impl CairoDeserialize for u64 {
    fn deserialize_from(reader: &mut CalldataReader<'_>) -> Result<Self, CalldataError> {
        let position = reader.position();
        let felt = reader.next_felt()?;
        felt_to_u64(&felt).map_err(|_| CalldataError::OutOfRange { position, ty: "u64" })
    }
}

impl CairoDeserialize for u128 {
    fn deserialize_from(reader: &mut CalldataReader<'_>) -> Result<Self, CalldataError> {
        let position = reader.position();
        let felt = reader.next_felt()?;
        felt_to_u128(&felt).map_err(|_| CalldataError::OutOfRange { position, ty: "u128" })
    }
}

impl<T: CairoDeserialize> CairoDeserialize for Vec<T> {
    fn deserialize_from(reader: &mut CalldataReader<'_>) -> Result<Self, CalldataError> {
        let len = reader.next_len()?;
        (0..len).map(|_| T::deserialize_from(reader)).collect()
    }
}

impl<T: CairoDeserialize> CairoDeserialize for Option<T> {
    fn deserialize_from(reader: &mut CalldataReader<'_>) -> Result<Self, CalldataError> {
        match u64::deserialize_from(reader)? {
            0 => Ok(Some(T::deserialize_from(reader)?)),
            1 => Ok(None),
            index => Err(CalldataError::UnknownVariant { name: "Option", index }),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
