//! Run-wide shadow state shared by every worker thread.
use kshadow_ir::{
    AddressSpace, GroupState, ItemState, KernelInvocation, KernelValue, KernelValueKind, Scalar,
    ScalarType, Type, TypedValue,
};
use smallvec::SmallVec;

use crate::{
    diagnostic::{Defect, DefectLog},
    domain::Domain,
    frame::CallFrameStack,
    host::{HostRegistry, Visibility},
    memory::{lane_layout, LaneBytes, ShadowMemory},
    scope::{GroupShadow, ItemShadow},
    table::ShadowValueTable,
    Result, ShadowConfig, ShadowError, ShadowValue,
};

/// What to do with a kernel value once its owning scope exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Deferred {
    /// Bind the value in the item's entry frame.
    BindArgument,
    /// Copy the contents of a byval argument into the item's private copy
    /// and bind the argument.
    PrivateByVal,
    /// Initialize a private variable in the item's private memory.
    AllocPrivate,
    /// Allocate local storage at the group's address.
    AllocLocal,
}

#[derive(Debug, Clone)]
struct DeferredBinding {
    value: KernelValue,
    action: Deferred,
}

pub struct ShadowContext<D: Domain> {
    config: ShadowConfig,
    global: ShadowMemory<D>,
    host: HostRegistry,
    globals: ShadowValueTable<D>,
    item_deferred: Vec<DeferredBinding>,
    group_deferred: Vec<DeferredBinding>,
    kernel: String,
    defects: DefectLog,
}

impl<D: Domain> ShadowContext<D> {
    pub fn new(config: ShadowConfig) -> Result<Self> {
        config.validate()?;
        let global = ShadowMemory::for_space(AddressSpace::Global, &config)?;
        let defects = DefectLog::new(config.max_defects);
        Ok(Self {
            config,
            global,
            host: HostRegistry::new(),
            globals: ShadowValueTable::new(),
            item_deferred: Vec::new(),
            group_deferred: Vec::new(),
            kernel: String::new(),
            defects,
        })
    }

    pub fn config(&self) -> &ShadowConfig {
        &self.config
    }

    pub fn global_memory(&self) -> &ShadowMemory<D> {
        &self.global
    }

    pub fn host(&self) -> &HostRegistry {
        &self.host
    }

    pub fn globals(&self) -> &ShadowValueTable<D> {
        &self.globals
    }

    pub fn kernel_name(&self) -> &str {
        &self.kernel
    }

    pub fn defects(&self) -> &DefectLog {
        &self.defects
    }

    pub(crate) fn report(&self, defect: Defect) {
        self.defects.record(defect);
    }

    /// Classifies the values of a new dispatch: some are bound right away,
    /// the rest wait for the item or group that owns their storage.
    pub fn begin_kernel(&mut self, invocation: &KernelInvocation) -> Result<()> {
        self.globals.clear();
        self.item_deferred.clear();
        self.group_deferred.clear();
        self.kernel = invocation.name.clone();

        for value in &invocation.values {
            self.classify(value)?;
        }

        tracing::info!(
            kernel = %self.kernel,
            values = invocation.values.len(),
            globals = self.globals.len(),
            item_deferred = self.item_deferred.len(),
            group_deferred = self.group_deferred.len(),
            "kernel begin"
        );
        Ok(())
    }

    fn classify(&mut self, value: &KernelValue) -> Result<()> {
        if !value.ty.is_sized() {
            tracing::debug!(id = %value.id, "skipping unsized kernel value");
            return Ok(());
        }

        let is_argument = value.is_argument();
        match value.ty.pointer_space() {
            Some(AddressSpace::Constant) => {
                self.bind_global(value, ShadowValue::opaque(value.ty))?;
            }
            Some(AddressSpace::Global) if is_argument => {
                let address = value.value.first().as_address();
                self.host.register(self.global.extract_buffer(address));
                self.defer_item(value, Deferred::BindArgument);
            }
            Some(AddressSpace::Global) => {
                // Program-scope global storage is announced by the host.
                self.bind_global(value, ShadowValue::opaque(value.ty))?;
            }
            Some(AddressSpace::Local) => {
                if is_argument {
                    self.defer_item(value, Deferred::BindArgument);
                } else {
                    self.bind_global(value, ShadowValue::opaque(value.ty))?;
                }
                self.defer_group(value);
            }
            Some(AddressSpace::Private) => match value.kind {
                KernelValueKind::Argument { byval: true } => {
                    self.defer_item(value, Deferred::PrivateByVal);
                }
                KernelValueKind::Argument { byval: false } => {
                    self.defer_item(value, Deferred::BindArgument);
                }
                KernelValueKind::Variable => {
                    self.bind_global(value, ShadowValue::opaque(value.ty))?;
                    self.defer_item(value, Deferred::AllocPrivate);
                }
            },
            None if is_argument => self.defer_item(value, Deferred::BindArgument),
            None => {
                self.bind_global(value, ShadowValue::exact(&value.value))?;
            }
        }
        Ok(())
    }

    fn bind_global(&mut self, value: &KernelValue, shadow: ShadowValue<D>) -> Result<()> {
        self.globals
            .bind(value.id, shadow)
            .map_err(|_| ShadowError::GlobalRebind(value.id))
    }

    fn defer_item(&mut self, value: &KernelValue, action: Deferred) {
        self.item_deferred.push(DeferredBinding {
            value: value.clone(),
            action,
        });
    }

    fn defer_group(&mut self, value: &KernelValue) {
        self.group_deferred.push(DeferredBinding {
            value: value.clone(),
            action: Deferred::AllocLocal,
        });
    }

    /// Drops everything scoped to the finished dispatch. Global memory and
    /// host visibility outlive it.
    pub fn end_kernel(&mut self) {
        tracing::info!(kernel = %self.kernel, defects = self.defects.len(), "kernel end");
        self.globals.clear();
        self.item_deferred.clear();
        self.group_deferred.clear();
    }

    pub fn create_item(&self, state: &dyn ItemState) -> Result<ItemShadow<D>> {
        let mut item = ItemShadow {
            id: state.item(),
            group: state.group(),
            frames: CallFrameStack::new(),
            private: ShadowMemory::for_space(AddressSpace::Private, &self.config)?,
        };

        for deferred in &self.item_deferred {
            let value = &deferred.value;
            let concrete = state.lookup_val(value.id);
            match deferred.action {
                Deferred::BindArgument => {
                    let concrete = concrete.unwrap_or_else(|| value.value.clone());
                    item.frames
                        .top_mut()?
                        .values
                        .bind(value.id, ShadowValue::exact(&concrete))?;
                }
                Deferred::PrivateByVal => {
                    let pointer = concrete.ok_or(ShadowError::MissingConcrete(value.id))?;
                    item.private.insert(
                        pointer.first().as_address(),
                        value.value.ty(),
                        ShadowValue::exact(&value.value),
                    );
                    item.frames
                        .top_mut()?
                        .values
                        .bind(value.id, ShadowValue::exact(&pointer))?;
                }
                Deferred::AllocPrivate => {
                    let pointer = concrete.ok_or(ShadowError::MissingConcrete(value.id))?;
                    item.private.insert(
                        pointer.first().as_address(),
                        value.value.ty(),
                        ShadowValue::exact(&value.value),
                    );
                }
                Deferred::AllocLocal => {}
            }
        }

        tracing::debug!(
            item = %item.id,
            group = %item.group,
            bindings = self.item_deferred.len(),
            "work-item shadow created"
        );
        Ok(item)
    }

    pub fn create_group(&self, state: &dyn GroupState) -> Result<GroupShadow<D>> {
        let id = state.group();
        let group = GroupShadow {
            id,
            local: ShadowMemory::for_space(AddressSpace::Local, &self.config)?,
        };

        for deferred in &self.group_deferred {
            let value = &deferred.value;
            let address = state
                .local_address(value.id)
                .ok_or(ShadowError::MissingLocalAddress {
                    value: value.id,
                    group: id,
                })?;
            group.local.allocate(address, value.pointee);
        }

        tracing::debug!(group = %id, allocations = self.group_deferred.len(), "work-group shadow created");
        Ok(group)
    }

    /// Shadow of a `ty` value at global `address`. Bytes the kernel has not
    /// written take their shadow from the host visibility of their range;
    /// lanes lying wholly in defined bytes mirror `concrete`, the value the
    /// interpreter read, when it is known.
    pub fn load_global(
        &self,
        address: u64,
        ty: Type,
        concrete: Option<&TypedValue>,
    ) -> Result<ShadowValue<D>> {
        self.visibility(address)?;
        let mut lanes = SmallVec::<[D; 4]>::new();
        for (idx, (offset, width, lane_ty)) in lane_layout(ty).enumerate() {
            let lane_address = address.wrapping_add(offset);
            let lane = match self.global.lane_bytes(lane_address, width, lane_ty) {
                LaneBytes::Whole(lane) => lane,
                LaneBytes::Pieces(pieces) => {
                    let mut parts = SmallVec::<[D; 8]>::with_capacity(pieces.len());
                    for (byte, piece) in pieces.into_iter().enumerate() {
                        let part = match piece {
                            Some(part) => part,
                            None => {
                                self.global_background(lane_address.wrapping_add(byte as u64))?
                            }
                        };
                        parts.push(part);
                    }
                    D::from_bytes(&parts, lane_ty)
                }
                LaneBytes::Missing => {
                    let lane = concrete
                        .map(|value| value.lane(idx))
                        .filter(|lane| lane.ty().size() == width as usize);
                    self.unwritten_lane(lane_address, width, lane_ty, lane)?
                }
            };
            lanes.push(lane);
        }
        Ok(ShadowValue::from_lanes(lanes))
    }

    fn unwritten_lane(
        &self,
        address: u64,
        width: u32,
        ty: ScalarType,
        concrete: Option<Scalar>,
    ) -> Result<D> {
        let visibility = (0..u64::from(width))
            .map(|offset| self.visibility(address.wrapping_add(offset)))
            .collect::<Result<SmallVec<[Visibility; 8]>>>()?;
        let lane = if visibility.iter().all(|v| *v == Visibility::Defined) {
            concrete.map_or_else(|| D::opaque(ty), D::exact)
        } else if visibility.iter().all(|v| *v == Visibility::Undefined) {
            D::pessimistic(ty)
        } else {
            let parts: SmallVec<[D; 8]> = visibility.into_iter().map(background).collect();
            D::from_bytes(&parts, ty)
        };
        tracing::trace!(address = format_args!("{address:#x}"), ?lane, "unwritten global lane");
        Ok(lane)
    }

    /// Replaces the shadow of a `ty` value at global `address`. The address
    /// must lie in a buffer the host announced.
    pub fn store_global(&self, address: u64, ty: Type, shadow: ShadowValue<D>) -> Result<()> {
        self.visibility(address)?;
        self.global.insert(address, ty, shadow);
        Ok(())
    }

    /// The shadow a global byte the kernel never wrote carries.
    pub fn global_background(&self, address: u64) -> Result<D> {
        self.visibility(address).map(background)
    }

    fn visibility(&self, address: u64) -> Result<Visibility> {
        self.host
            .visibility(
                self.global.extract_buffer(address),
                self.global.extract_offset(address),
            )
            .ok_or(ShadowError::InvalidAddress {
                space: AddressSpace::Global,
                address,
            })
    }

    pub fn host_memory_store(&self, address: u64, size: u64) {
        let buffer = self.global.extract_buffer(address);
        self.host
            .define(buffer, self.global.extract_offset(address), size);
        let released = self.global.release_range(address, size);
        tracing::debug!(
            buffer = format_args!("{buffer:#x}"),
            address = format_args!("{address:#x}"),
            size,
            released,
            "host store"
        );
    }

    pub fn host_memory_map(&self, address: u64, size: u64, read: bool) {
        if read {
            return;
        }
        let buffer = self.global.extract_buffer(address);
        self.host
            .undefine(buffer, self.global.extract_offset(address), size);
        let released = self.global.release_range(address, size);
        tracing::debug!(
            buffer = format_args!("{buffer:#x}"),
            address = format_args!("{address:#x}"),
            size,
            released,
            "host write-only map"
        );
    }

    pub fn host_memory_allocated(&self, address: u64, size: u64) {
        let buffer = self.global.extract_buffer(address);
        self.host.reset(buffer);
        let released = self.global.release_range(address, size);
        tracing::debug!(buffer = format_args!("{buffer:#x}"), size, released, "host allocation");
    }

    pub fn host_memory_deallocated(&self, address: u64) {
        let buffer = self.global.extract_buffer(address);
        self.host.forget(buffer);
        let released = self.global.release_buffer(buffer);
        tracing::debug!(buffer = format_args!("{buffer:#x}"), released, "host deallocation");
    }
}

fn background<D: Domain>(visibility: Visibility) -> D {
    match visibility {
        Visibility::Defined => D::opaque(ScalarType::I8),
        Visibility::Undefined => D::pessimistic(ScalarType::I8),
    }
}

impl<D: Domain> std::fmt::Debug for ShadowContext<D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShadowContext")
            .field("kernel", &self.kernel)
            .field("global", &self.global)
            .field("globals", &self.globals.len())
            .field("host_buffers", &self.host.len())
            .field("item_deferred", &self.item_deferred.len())
            .field("group_deferred", &self.group_deferred.len())
            .field("defects", &self.defects.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use kshadow_ir::{ValueId, WorkGroupId, WorkItemId};
    use rustc_hash::FxHashMap;

    use super::*;
    use crate::{domain::Taint, PointerWidth};

    struct Item {
        values: FxHashMap<ValueId, TypedValue>,
    }

    impl ItemState for Item {
        fn item(&self) -> WorkItemId {
            WorkItemId(0)
        }

        fn group(&self) -> WorkGroupId {
            WorkGroupId(0)
        }

        fn lookup_val(&self, value: ValueId) -> Option<TypedValue> {
            self.values.get(&value).cloned()
        }

        fn prev_block(&self) -> Option<kshadow_ir::BlockId> {
            None
        }
    }

    struct Group;

    impl GroupState for Group {
        fn group(&self) -> WorkGroupId {
            WorkGroupId(0)
        }

        fn local_address(&self, value: ValueId) -> Option<u64> {
            (value == ValueId(4)).then_some(0x200)
        }
    }

    fn context() -> ShadowContext<Taint> {
        ShadowContext::new(ShadowConfig::for_target(PointerWidth::U64)).unwrap()
    }

    #[test]
    fn classification() {
        let mut ctx = context();
        let invocation = KernelInvocation::new("k")
            .with_value(KernelValue::argument(ValueId(1), TypedValue::i32(5)))
            .with_value(KernelValue::pointer_argument(
                ValueId(2),
                Type::ptr(AddressSpace::Global),
                Type::F32,
                TypedValue::pointer(AddressSpace::Global, 0x1_0000_0000),
            ))
            .with_value(KernelValue::pointer_argument(
                ValueId(3),
                Type::ptr(AddressSpace::Constant),
                Type::F32,
                TypedValue::pointer(AddressSpace::Constant, 0x40),
            ))
            .with_value(KernelValue::variable(
                ValueId(4),
                Type::ptr(AddressSpace::Local),
                TypedValue::zeroed(Type::vector(kshadow_ir::ScalarType::F32, 4)),
            ))
            .with_value(KernelValue::byval_argument(
                ValueId(5),
                Type::ptr(AddressSpace::Private),
                TypedValue::i64(7),
            ));
        ctx.begin_kernel(&invocation).unwrap();

        assert!(ctx.globals().contains(ValueId(3)));
        assert!(ctx.globals().contains(ValueId(4)));
        assert!(!ctx.globals().contains(ValueId(1)));
        assert_eq!(ctx.host().visibility(1, 0), Some(Visibility::Undefined));

        let item = Item {
            values: [(ValueId(5), TypedValue::pointer(AddressSpace::Private, 0x80))]
                .into_iter()
                .collect(),
        };
        let item = ctx.create_item(&item).unwrap();
        let entry = &item.frames.top().unwrap().values;
        assert!(entry.get(ValueId(1)).is_some_and(|s| s.is_defined()));
        assert!(entry.get(ValueId(2)).is_some());
        assert!(entry.get(ValueId(5)).is_some());
        assert!(item.private.load(0x80, Type::I64).unwrap().is_defined());

        let group = ctx.create_group(&Group).unwrap();
        assert_eq!(
            group
                .local
                .load(0x200, Type::vector(kshadow_ir::ScalarType::F32, 4))
                .unwrap(),
            ShadowValue::splat(Taint::Poisoned, 4)
        );
    }

    #[test]
    fn duplicate_global_is_fatal() {
        let mut ctx = context();
        let constant = KernelValue::pointer_argument(
            ValueId(3),
            Type::ptr(AddressSpace::Constant),
            Type::F32,
            TypedValue::pointer(AddressSpace::Constant, 0x40),
        );
        let invocation = KernelInvocation::new("k")
            .with_value(constant.clone())
            .with_value(constant);
        assert_eq!(
            ctx.begin_kernel(&invocation),
            Err(ShadowError::GlobalRebind(ValueId(3)))
        );

        // The global table starts over with each dispatch.
        let invocation = KernelInvocation::new("k").with_value(KernelValue::pointer_argument(
            ValueId(3),
            Type::ptr(AddressSpace::Constant),
            Type::F32,
            TypedValue::pointer(AddressSpace::Constant, 0x40),
        ));
        assert!(ctx.begin_kernel(&invocation).is_ok());
    }

    #[test]
    fn missing_local_address_is_fatal() {
        let mut ctx = context();
        let invocation = KernelInvocation::new("k").with_value(KernelValue::variable(
            ValueId(9),
            Type::ptr(AddressSpace::Local),
            TypedValue::i32(0),
        ));
        ctx.begin_kernel(&invocation).unwrap();
        assert!(matches!(
            ctx.create_group(&Group),
            Err(ShadowError::MissingLocalAddress { .. })
        ));
    }

    #[test]
    fn unwritten_globals_follow_the_host() {
        let ctx = context();
        let address = 0x2_0000_0010;
        assert!(ctx.load_global(address, Type::I32, None).is_err());

        ctx.host_memory_allocated(address, 64);
        assert!(!ctx
            .load_global(address, Type::I32, None)
            .unwrap()
            .is_defined());

        ctx.host_memory_store(0x2_0000_0000, 64);
        assert!(ctx
            .load_global(address, Type::I32, Some(&TypedValue::i32(1)))
            .unwrap()
            .is_defined());
        // Loads do not leave shadows behind.
        assert!(ctx.global_memory().is_empty());

        ctx.store_global(address, Type::I32, ShadowValue::splat(Taint::Poisoned, 1))
            .unwrap();
        ctx.host_memory_deallocated(address);
        assert!(ctx.global_memory().is_empty());
        assert!(ctx
            .store_global(address, Type::I32, ShadowValue::splat(Taint::Clean, 1))
            .is_err());
    }

    #[test]
    fn partial_host_stores_define_only_their_bytes() {
        let ctx = context();
        let base = 0x3_0000_0000;
        ctx.host_memory_allocated(base, 64);
        ctx.host_memory_store(base, 4);
        assert!(ctx.load_global(base, Type::I32, None).unwrap().is_defined());
        assert!(!ctx
            .load_global(base + 32, Type::I32, None)
            .unwrap()
            .is_defined());
        // Two defined bytes and two the host never wrote.
        assert!(!ctx
            .load_global(base + 2, Type::I32, None)
            .unwrap()
            .is_defined());

        ctx.host_memory_map(base, 2, false);
        assert_eq!(ctx.host().visibility(3, 1), Some(Visibility::Undefined));
        assert_eq!(ctx.host().visibility(3, 2), Some(Visibility::Defined));
    }

    #[test]
    fn kernel_bytes_and_host_bytes_mix() {
        let ctx = context();
        let base = 0x4_0000_0000;
        ctx.host_memory_allocated(base, 16);
        ctx.host_memory_store(base, 16);
        ctx.store_global(base + 4, Type::I16, ShadowValue::splat(Taint::Poisoned, 1))
            .unwrap();
        let lanes = ctx
            .load_global(base, Type::vector(ScalarType::I32, 2), None)
            .unwrap();
        assert_eq!(lanes.lanes(), &[Taint::Clean, Taint::Poisoned]);
    }
}
