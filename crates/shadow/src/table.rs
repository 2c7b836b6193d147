use rustc_hash::FxHashMap;

use kshadow_ir::ValueId;

use crate::{domain::Domain, Result, ShadowError, ShadowValue};

/// Maps value identities to their shadows within one scope: a call frame
/// or the kernel-wide global table.
#[derive(Debug, Clone)]
pub struct ShadowValueTable<D: Domain> {
    values: FxHashMap<ValueId, ShadowValue<D>>,
}

impl<D: Domain> ShadowValueTable<D> {
    pub fn new() -> Self {
        Self {
            values: FxHashMap::default(),
        }
    }

    pub fn get(&self, id: ValueId) -> Option<&ShadowValue<D>> {
        self.values.get(&id)
    }

    pub fn contains(&self, id: ValueId) -> bool {
        self.values.contains_key(&id)
    }

    /// Binds `id`, replacing the shadow of a previous execution of the
    /// defining instruction.
    pub fn set(&mut self, id: ValueId, shadow: ShadowValue<D>) -> Option<ShadowValue<D>> {
        self.values.insert(id, shadow)
    }

    /// Binds `id` exactly once.
    pub fn bind(&mut self, id: ValueId, shadow: ShadowValue<D>) -> Result<()> {
        if self.values.contains_key(&id) {
            return Err(ShadowError::Rebind(id));
        }
        self.values.insert(id, shadow);
        Ok(())
    }

    pub fn remove(&mut self, id: ValueId) -> Option<ShadowValue<D>> {
        self.values.remove(&id)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn clear(&mut self) {
        self.values.clear();
    }

    pub fn iter(&self) -> impl Iterator<Item = (ValueId, &ShadowValue<D>)> {
        self.values.iter().map(|(id, shadow)| (*id, shadow))
    }
}

impl<D: Domain> Default for ShadowValueTable<D> {
    fn default() -> Self {
        Self::new()
    }
}
