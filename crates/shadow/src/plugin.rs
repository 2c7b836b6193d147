//! The hooks a driving interpreter calls.
use kshadow_ir::{
    AddressSpace, GroupState, Inst, ItemState, KernelInvocation, TypedValue, WorkGroupId,
    WorkItemId,
};

use crate::{
    context::ShadowContext,
    diagnostic::Defect,
    domain::{Domain, Interval, Taint},
    host::MapFlags,
    scope::Workspace,
    transfer::Transfer,
    Result, ShadowConfig,
};

/// Definedness analysis.
pub type TaintPlugin = ShadowPlugin<Taint>;
/// Numeric bound analysis.
pub type IntervalPlugin = ShadowPlugin<Interval>;

/// A shadow analysis attached to one interpreter run.
///
/// Kernel hooks take `&mut self` and must not overlap with anything else.
/// Every other hook takes `&self` and may be called from any worker thread,
/// each thread passing its own [`Workspace`].
#[derive(Debug)]
pub struct ShadowPlugin<D: Domain> {
    ctx: ShadowContext<D>,
}

impl<D: Domain> ShadowPlugin<D> {
    pub fn new(config: ShadowConfig) -> Result<Self> {
        Ok(Self {
            ctx: ShadowContext::new(config)?,
        })
    }

    pub fn context(&self) -> &ShadowContext<D> {
        &self.ctx
    }

    pub fn kernel_begin(&mut self, invocation: &KernelInvocation) -> Result<()> {
        self.ctx.begin_kernel(invocation)
    }

    pub fn kernel_end(&mut self) {
        self.ctx.end_kernel();
    }

    pub fn work_group_begin(&self, workspace: &mut Workspace<D>, group: &dyn GroupState) -> Result<()> {
        let shadow = self.ctx.create_group(group)?;
        workspace.insert_group(shadow)
    }

    pub fn work_group_complete(&self, workspace: &mut Workspace<D>, group: WorkGroupId) -> Result<()> {
        let shadow = workspace.remove_group(group)?;
        tracing::debug!(%group, local_bytes = shadow.local.len(), "work-group complete");
        Ok(())
    }

    pub fn work_item_begin(&self, workspace: &mut Workspace<D>, item: &dyn ItemState) -> Result<()> {
        let shadow = self.ctx.create_item(item)?;
        workspace.insert_item(shadow)
    }

    pub fn work_item_complete(&self, workspace: &mut Workspace<D>, item: WorkItemId) -> Result<()> {
        let shadow = workspace.remove_item(item)?;
        tracing::debug!(
            %item,
            private_bytes = shadow.private.len(),
            depth = shadow.frames.depth(),
            "work-item complete"
        );
        Ok(())
    }

    /// Propagates shadows through `inst`, which `state`'s item just retired
    /// with the concrete `result` (`void` if it produced none).
    pub fn instruction_executed(
        &self,
        workspace: &mut Workspace<D>,
        state: &dyn ItemState,
        inst: &Inst,
        result: &TypedValue,
    ) -> Result<()> {
        let (item, group) = workspace.scopes_mut(state.item())?;
        tracing::trace!(item = %item.id, opcode = %inst.opcode(), %result, "instruction executed");
        Transfer::new(&self.ctx, item, group, state, inst, result).run()
    }

    /// The host wrote `size` bytes at `address`. Only the extent matters,
    /// not the bytes themselves.
    pub fn host_memory_store(&self, memory: AddressSpace, address: u64, size: u64, _data: &[u8]) {
        if memory == AddressSpace::Global {
            self.ctx.host_memory_store(address, size);
        }
    }

    /// The host mapped `size` bytes at `address + offset`.
    pub fn memory_map(
        &self,
        memory: AddressSpace,
        address: u64,
        offset: u64,
        size: u64,
        flags: MapFlags,
    ) {
        if memory != AddressSpace::Global {
            return;
        }
        tracing::debug!(%flags, "host map");
        self.ctx
            .host_memory_map(address.wrapping_add(offset), size, flags.contains(MapFlags::READ));
    }

    pub fn memory_allocated(&self, memory: AddressSpace, address: u64, size: u64) {
        if memory == AddressSpace::Global {
            self.ctx.host_memory_allocated(address, size);
        }
    }

    pub fn memory_deallocated(&self, memory: AddressSpace, address: u64) {
        if memory == AddressSpace::Global {
            self.ctx.host_memory_deallocated(address);
        }
    }

    pub fn defects(&self) -> Vec<Defect> {
        self.ctx.defects().snapshot()
    }
}
