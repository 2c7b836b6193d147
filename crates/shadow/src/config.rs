use crate::{Result, ShadowError};

/// Width of the interpreter's addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PointerWidth {
    U32,
    U64,
}

impl PointerWidth {
    pub const fn bits(self) -> u32 {
        match self {
            Self::U32 => 32,
            Self::U64 => 64,
        }
    }

    pub fn host() -> Self {
        if cfg!(target_pointer_width = "32") {
            Self::U32
        } else {
            Self::U64
        }
    }
}

#[derive(Debug, Clone)]
pub struct ShadowConfig {
    pub pointer_width: PointerWidth,
    /// High address bits naming the buffer, per address space. Must match
    /// the interpreter's allocator.
    pub private_buffer_bits: u32,
    pub local_buffer_bits: u32,
    pub global_buffer_bits: u32,
    /// Number of address-striped locks per memory. Must be a power of two.
    pub lock_stripes: usize,
    /// Cross-check shadows against concrete results.
    pub consistency_checks: bool,
    /// Defects kept in the log; later ones are only counted.
    pub max_defects: usize,
}

impl ShadowConfig {
    pub fn for_target(pointer_width: PointerWidth) -> Self {
        match pointer_width {
            PointerWidth::U64 => Self {
                pointer_width,
                private_buffer_bits: 32,
                local_buffer_bits: 16,
                global_buffer_bits: 32,
                lock_stripes: 64,
                consistency_checks: cfg!(debug_assertions),
                max_defects: 1000,
            },
            PointerWidth::U32 => Self {
                pointer_width,
                private_buffer_bits: 16,
                local_buffer_bits: 8,
                global_buffer_bits: 16,
                lock_stripes: 64,
                consistency_checks: cfg!(debug_assertions),
                max_defects: 1000,
            },
        }
    }

    pub fn with_consistency_checks(mut self, enabled: bool) -> Self {
        self.consistency_checks = enabled;
        self
    }

    pub fn with_lock_stripes(mut self, stripes: usize) -> Self {
        self.lock_stripes = stripes;
        self
    }

    pub fn with_max_defects(mut self, max: usize) -> Self {
        self.max_defects = max;
        self
    }

    pub fn should_check_consistency(&self) -> bool {
        self.consistency_checks || cfg!(feature = "consistency-checks")
    }

    pub fn validate(&self) -> Result<()> {
        if !self.lock_stripes.is_power_of_two() {
            return Err(ShadowError::InvalidConfig(format!(
                "lock stripe count {} is not a power of two",
                self.lock_stripes
            )));
        }

        let address_bits = self.pointer_width.bits();
        for (space, bits) in [
            ("private", self.private_buffer_bits),
            ("local", self.local_buffer_bits),
            ("global", self.global_buffer_bits),
        ] {
            if bits == 0 || bits >= address_bits {
                return Err(ShadowError::InvalidConfig(format!(
                    "{space} buffer bits {bits} out of range for {address_bits}-bit addresses"
                )));
            }
        }

        Ok(())
    }
}

impl Default for ShadowConfig {
    fn default() -> Self {
        Self::for_target(PointerWidth::host())
    }
}
