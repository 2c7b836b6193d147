//! Shadow state with a work-item or work-group lifetime.
use rustc_hash::FxHashMap;

use kshadow_ir::{WorkGroupId, WorkItemId};

use crate::{
    domain::Domain, frame::CallFrameStack, memory::ShadowMemory, Result, ShadowError,
};

/// Everything one work-item owns: its call frames and private memory.
#[derive(Debug)]
pub struct ItemShadow<D: Domain> {
    pub id: WorkItemId,
    pub group: WorkGroupId,
    pub frames: CallFrameStack<D>,
    pub private: ShadowMemory<D>,
}

/// Everything one work-group owns: its local memory.
#[derive(Debug)]
pub struct GroupShadow<D: Domain> {
    pub id: WorkGroupId,
    pub local: ShadowMemory<D>,
}

/// The live items and groups of one worker thread.
///
/// The driver creates one per thread and passes it to every hook running on
/// that thread. Bundles enter at the matching `*_begin` hook and leave at
/// `*_complete`.
#[derive(Debug)]
pub struct Workspace<D: Domain> {
    items: FxHashMap<WorkItemId, ItemShadow<D>>,
    groups: FxHashMap<WorkGroupId, GroupShadow<D>>,
}

impl<D: Domain> Workspace<D> {
    pub fn new() -> Self {
        Self {
            items: FxHashMap::default(),
            groups: FxHashMap::default(),
        }
    }

    pub fn insert_item(&mut self, item: ItemShadow<D>) -> Result<()> {
        if self.items.contains_key(&item.id) {
            return Err(ShadowError::DuplicateWorkItem(item.id));
        }
        self.items.insert(item.id, item);
        Ok(())
    }

    pub fn remove_item(&mut self, id: WorkItemId) -> Result<ItemShadow<D>> {
        self.items
            .remove(&id)
            .ok_or(ShadowError::UnknownWorkItem(id))
    }

    pub fn item(&self, id: WorkItemId) -> Result<&ItemShadow<D>> {
        self.items.get(&id).ok_or(ShadowError::UnknownWorkItem(id))
    }

    pub fn insert_group(&mut self, group: GroupShadow<D>) -> Result<()> {
        if self.groups.contains_key(&group.id) {
            return Err(ShadowError::DuplicateWorkGroup(group.id));
        }
        self.groups.insert(group.id, group);
        Ok(())
    }

    pub fn remove_group(&mut self, id: WorkGroupId) -> Result<GroupShadow<D>> {
        self.groups
            .remove(&id)
            .ok_or(ShadowError::UnknownWorkGroup(id))
    }

    pub fn group(&self, id: WorkGroupId) -> Result<&GroupShadow<D>> {
        self.groups.get(&id).ok_or(ShadowError::UnknownWorkGroup(id))
    }

    /// The item `id` together with its group, if the group is live on this
    /// thread.
    pub fn scopes_mut(
        &mut self,
        id: WorkItemId,
    ) -> Result<(&mut ItemShadow<D>, Option<&mut GroupShadow<D>>)> {
        let item = self
            .items
            .get_mut(&id)
            .ok_or(ShadowError::UnknownWorkItem(id))?;
        let group = self.groups.get_mut(&item.group);
        Ok((item, group))
    }

    pub fn item_count(&self) -> usize {
        self.items.len()
    }

    pub fn group_count(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty() && self.groups.is_empty()
    }
}

impl<D: Domain> Default for Workspace<D> {
    fn default() -> Self {
        Self::new()
    }
}
