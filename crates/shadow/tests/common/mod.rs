#![allow(dead_code)]

use kshadow::{
    Domain, PointerWidth, Result, ShadowConfig, ShadowPlugin, ShadowValue, Workspace,
};
use kshadow_ir::{
    AddressSpace, BlockId, GroupState, Inst, InstData, ItemState, Operand, Type, TypedValue,
    ValueId, WorkGroupId, WorkItemId,
};
use rustc_hash::FxHashMap;

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub fn config() -> ShadowConfig {
    ShadowConfig::for_target(PointerWidth::U64).with_consistency_checks(true)
}

pub fn plugin<D: Domain>() -> ShadowPlugin<D> {
    init_tracing();
    ShadowPlugin::new(config()).unwrap()
}

pub fn v(n: u32) -> ValueId {
    ValueId(n)
}

/// Interpreter-side state of one work-item.
#[derive(Debug, Clone)]
pub struct Item {
    pub id: WorkItemId,
    pub group: WorkGroupId,
    values: FxHashMap<ValueId, TypedValue>,
    prev_block: Option<BlockId>,
}

impl Item {
    pub fn new(id: u32, group: u32) -> Self {
        Self {
            id: WorkItemId(id),
            group: WorkGroupId(group),
            values: FxHashMap::default(),
            prev_block: None,
        }
    }

    pub fn with(mut self, value: ValueId, concrete: TypedValue) -> Self {
        self.bind(value, concrete);
        self
    }

    pub fn bind(&mut self, value: ValueId, concrete: TypedValue) {
        self.values.insert(value, concrete);
    }

    pub fn jump_from(&mut self, block: BlockId) {
        self.prev_block = Some(block);
    }

    /// Retires `inst` with the concrete `result`, the way the interpreter
    /// would: the result is bound before the hook runs.
    pub fn exec<D: Domain>(
        &mut self,
        plugin: &ShadowPlugin<D>,
        workspace: &mut Workspace<D>,
        inst: &Inst,
        result: TypedValue,
    ) -> Result<()> {
        if let Some(id) = inst.result {
            self.bind(id, result.clone());
        }
        plugin.instruction_executed(workspace, &*self, inst, &result)
    }

    pub fn shadow<D: Domain>(&self, workspace: &Workspace<D>, value: ValueId) -> ShadowValue<D> {
        workspace
            .item(self.id)
            .unwrap()
            .frames
            .top()
            .unwrap()
            .values
            .get(value)
            .cloned()
            .unwrap_or_else(|| panic!("{value} has no shadow"))
    }

    /// The shadow of a `ty` value in this item's private memory.
    pub fn private_load<D: Domain>(
        &self,
        workspace: &Workspace<D>,
        address: u64,
        ty: Type,
    ) -> ShadowValue<D> {
        workspace.item(self.id).unwrap().private.load(address, ty).unwrap()
    }

    pub fn private_i32<D: Domain>(&self, workspace: &Workspace<D>, address: u64) -> ShadowValue<D> {
        self.private_load(workspace, address, Type::I32)
    }
}

impl ItemState for Item {
    fn item(&self) -> WorkItemId {
        self.id
    }

    fn group(&self) -> WorkGroupId {
        self.group
    }

    fn lookup_val(&self, value: ValueId) -> Option<TypedValue> {
        self.values.get(&value).cloned()
    }

    fn prev_block(&self) -> Option<BlockId> {
        self.prev_block
    }
}

#[derive(Debug, Clone)]
pub struct Group {
    pub id: WorkGroupId,
    locals: FxHashMap<ValueId, u64>,
}

impl Group {
    pub fn new(id: u32) -> Self {
        Self {
            id: WorkGroupId(id),
            locals: FxHashMap::default(),
        }
    }

    pub fn with_local(mut self, value: ValueId, address: u64) -> Self {
        self.locals.insert(value, address);
        self
    }
}

impl GroupState for Group {
    fn group(&self) -> WorkGroupId {
        self.id
    }

    fn local_address(&self, value: ValueId) -> Option<u64> {
        self.locals.get(&value).copied()
    }
}

pub fn ptr(space: AddressSpace) -> Type {
    Type::ptr(space)
}

pub fn alloca(result: ValueId, allocated: Type) -> Inst {
    Inst::new(
        Some(result),
        ptr(AddressSpace::Private),
        InstData::Alloca { allocated },
    )
}

/// `base + offset` bytes.
pub fn gep(result: ValueId, base: ValueId, offset: i64, space: AddressSpace, pointee: Type) -> Inst {
    Inst::new(
        Some(result),
        ptr(space),
        InstData::Gep {
            base: Operand::value(base, ptr(space)),
            indices: smallvec::smallvec![TypedValue::i64(offset).into()],
            space,
            pointee,
        },
    )
}

pub fn load(result: ValueId, ty: Type, addr: ValueId, space: AddressSpace) -> Inst {
    Inst::new(
        Some(result),
        ty,
        InstData::Load {
            addr: Operand::value(addr, ptr(space)),
            space,
            atomic: false,
        },
    )
}

pub fn store(addr: ValueId, value: Operand, space: AddressSpace) -> Inst {
    Inst::effect(InstData::Store {
        addr: Operand::value(addr, ptr(space)),
        value,
        space,
        atomic: false,
    })
}

/// The concrete result of an instruction that produces none.
pub fn void() -> TypedValue {
    TypedValue::zeroed(Type::Void)
}
