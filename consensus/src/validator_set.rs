//! Authorized block producers.

use poha_types::Address;

/// Ordered set of validator addresses. Order defines the leader schedule:
/// block `i` belongs to `validators[i % len]`.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ValidatorSet {
    validators: Vec<Address>,
}

impl ValidatorSet {
    /// Build a set, keeping the first occurrence of each address and
    /// dropping empty ones.
    pub fn new(addresses: impl IntoIterator<Item = Address>) -> Self {
        let mut validators: Vec<Address> = Vec::new();
        for address in addresses {
            if !address.is_empty() && !validators.contains(&address) {
                validators.push(address);
            }
        }
        Self { validators }
    }

    pub fn contains(&self, address: &Address) -> bool {
        self.validators.contains(address)
    }

    /// The validator whose turn it is to produce block `index`.
    pub fn leader_for(&self, index: u64) -> Option<&Address> {
        if self.validators.is_empty() {
            return None;
        }
        let slot = (index % self.validators.len() as u64) as usize;
        self.validators.get(slot)
    }

    pub fn len(&self) -> usize {
        self.validators.len()
    }

    pub fn is_empty(&self) -> bool {
        self.validators.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Address> {
        self.validators.iter()
    }

    pub fn to_vec(&self) -> Vec<Address> {
        self.validators.clone()
    }
}
