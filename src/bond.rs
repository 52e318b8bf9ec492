use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub enum BondOrder {
    #[default]
    Single,
    Double,
    Triple,
}

impl BondOrder {
    pub fn value(self) -> u8 {
        match self {
            BondOrder::Single => 1,
            BondOrder::Double => 2,
            BondOrder::Triple => 3,
        }
    }

    /// Clamps into `1..=3`.
    pub fn from_count(n: usize) -> BondOrder {
        match n {
            0 | 1 => BondOrder::Single,
            2 => BondOrder::Double,
            _ => BondOrder::Triple,
        }
    }

    pub fn promoted(self) -> BondOrder {
        BondOrder::from_count(self.value() as usize + 1)
    }

    pub fn demoted(self) -> BondOrder {
        BondOrder::from_count((self.value() as usize).saturating_sub(1))
    }
}

/// A candidate bond. For wedge and dashed bonds the first endpoint of the
/// underlying graph edge is the narrow end.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Edge {
    pub order: BondOrder,
    pub wedge: bool,
    pub dashed: bool,
    pub aromatic: bool,
    pub invented: bool,
}

impl Edge {
    pub fn new(order: BondOrder) -> Self {
        Self {
            order,
            ..Self::default()
        }
    }

    pub fn single() -> Self {
        Self::new(BondOrder::Single)
    }

    pub fn dashed() -> Self {
        Self {
            dashed: true,
            ..Self::default()
        }
    }

    pub fn is_stereo(&self) -> bool {
        self.wedge || self.dashed
    }
}
