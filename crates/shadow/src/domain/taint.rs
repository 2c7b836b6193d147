//! Definedness tracking: a lane is either clean or poisoned.
use kshadow_ir::{Scalar, ScalarType};

use super::Domain;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum Taint {
    /// Fully defined.
    Clean,
    /// May depend on undefined data.
    #[default]
    Poisoned,
}

impl Taint {
    pub fn is_poisoned(self) -> bool {
        matches!(self, Self::Poisoned)
    }
}

impl Domain for Taint {
    fn pessimistic(_: ScalarType) -> Self {
        Self::Poisoned
    }

    fn exact(_: Scalar) -> Self {
        Self::Clean
    }

    fn opaque(_: ScalarType) -> Self {
        Self::Clean
    }

    fn combine(self, other: Self) -> Self {
        if self.is_poisoned() || other.is_poisoned() {
            Self::Poisoned
        } else {
            Self::Clean
        }
    }

    fn is_defined(self) -> bool {
        !self.is_poisoned()
    }
}
