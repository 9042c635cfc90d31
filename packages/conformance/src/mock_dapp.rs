//! `MockDapp`: stores one number per caller.

use std::collections::HashMap;

use starksession::{selector, Call, Felt};

use crate::verifier::Revert;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Entrypoint {
    SetNumber,
    SetNumberDouble,
    IncreaseNumber,
    GetNumber,
}

impl Entrypoint {
    const ALL: [(Entrypoint, &'static str); 4] = [
        (Entrypoint::SetNumber, "set_number"),
        (Entrypoint::SetNumberDouble, "set_number_double"),
        (Entrypoint::IncreaseNumber, "increase_number"),
        (Entrypoint::GetNumber, "get_number"),
    ];

    fn from_selector(value: Felt) -> Option<Self> {
        Self::ALL
            .iter()
            .find(|(_, name)| selector(name) == value)
            .map(|(entrypoint, _)| *entrypoint)
    }
}

#[derive(Debug, Clone, Default)]
pub struct MockDapp {
    numbers: HashMap<Felt, Felt>,
}

impl MockDapp {
    pub fn number(&self, user: &Felt) -> Felt {
        self.numbers.get(user).copied().unwrap_or(Felt::ZERO)
    }

    /// Run `call` on behalf of `caller`.
    pub fn execute(&mut self, caller: Felt, call: &Call) -> Result<Vec<Felt>, Revert> {
        let entrypoint = Entrypoint::from_selector(call.selector).ok_or_else(|| Revert::new("ENTRYPOINT_NOT_FOUND"))?;
        let argument = call
            .calldata
            .first()
            .copied()
            .ok_or_else(|| Revert::new("Failed to deserialize param #1"))?;
        match entrypoint {
            Entrypoint::SetNumber => {
                self.numbers.insert(caller, argument);
            }
            Entrypoint::SetNumberDouble => {
                self.numbers.insert(caller, argument * Felt::TWO);
            }
            Entrypoint::IncreaseNumber => {
                let current = self.number(&caller);
                self.numbers.insert(caller, current + argument);
            }
            Entrypoint::GetNumber => return Ok(vec![self.number(&argument)]),
        }
        Ok(Vec::new())
    }

    /// Read-only entry: only `get_number(user)`.
    pub fn view(&self, call: &Call) -> Result<Vec<Felt>, Revert> {
        match Entrypoint::from_selector(call.selector) {
            Some(Entrypoint::GetNumber) => {
                let user = call
                    .calldata
                    .first()
                    .ok_or_else(|| Revert::new("Failed to deserialize param #1"))?;
                Ok(vec![self.number(user)])
            }
            Some(_) => Err(Revert::new("not a view entrypoint")),
            None => Err(Revert::new("ENTRYPOINT_NOT_FOUND")),
        }
    }
}
