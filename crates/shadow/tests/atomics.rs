mod common;

use common::{v, Item};
use kshadow::{Domain, Interval, ShadowPlugin, ShadowValue, Taint, Workspace};
use kshadow_ir::{
    AddressSpace, AtomicOp, Inst, InstData, KernelInvocation, KernelValue, Operand, Type,
    TypedValue,
};
use rayon::prelude::*;
use smallvec::{smallvec, SmallVec};

const GLOBAL: AddressSpace = AddressSpace::Global;
const COUNTER: u64 = 0x8000;
const ITEMS: u32 = 64;

/// A kernel taking one global `int *` argument pointing at `address`.
fn begin<D: Domain>(name: &str, address: u64) -> ShadowPlugin<D> {
    let mut plugin = common::plugin();
    let invocation = KernelInvocation::new(name).with_value(KernelValue::pointer_argument(
        v(1),
        Type::ptr(GLOBAL),
        Type::I32,
        TypedValue::pointer(GLOBAL, address),
    ));
    plugin.kernel_begin(&invocation).unwrap();
    plugin
}

fn atomic(result: u32, op: AtomicOp, args: SmallVec<[Operand; 2]>) -> Inst {
    Inst::new(
        Some(v(result)),
        Type::I32,
        InstData::Atomic {
            op,
            addr: Operand::value(v(1), Type::ptr(GLOBAL)),
            space: GLOBAL,
            args,
        },
    )
}

fn atomic_load(result: u32) -> Inst {
    Inst::new(
        Some(v(result)),
        Type::I32,
        InstData::Load {
            addr: Operand::value(v(1), Type::ptr(GLOBAL)),
            space: GLOBAL,
            atomic: true,
        },
    )
}

fn item(id: u32) -> Item {
    Item::new(id, id / 16).with(v(1), TypedValue::pointer(GLOBAL, COUNTER))
}

#[test]
fn concurrent_increments_serialize() {
    let plugin = begin::<Interval>("counter", COUNTER);
    plugin.host_memory_store(GLOBAL, COUNTER, 4, &0i32.to_le_bytes());
    plugin
        .context()
        .store_global(COUNTER, Type::I32, ShadowValue::exact(&TypedValue::i32(0)))
        .unwrap();

    let increment = |id: u32| {
        let mut ws = Workspace::new();
        let mut item = item(id);
        plugin.work_item_begin(&mut ws, &item).unwrap();
        // The concrete old value plays no part in the shadow update.
        item.exec(&plugin, &mut ws, &atomic(2, AtomicOp::Inc, smallvec![]), TypedValue::i32(0))
            .unwrap();
        plugin.work_item_complete(&mut ws, item.id).unwrap();
    };

    let observe = || {
        let mut ws = Workspace::new();
        let mut observer = item(ITEMS);
        plugin.work_item_begin(&mut ws, &observer).unwrap();
        let mut last = 0.0;
        for _ in 0..256 {
            observer
                .exec(&plugin, &mut ws, &atomic_load(3), TypedValue::i32(0))
                .unwrap();
            let seen = observer.shadow(&ws, v(3));
            assert_eq!(seen.num_lanes(), 1);
            let lane = seen.lanes()[0];
            // Never half-updated: always one exact count, never going back.
            assert!(lane.is_point(), "torn shadow {lane}");
            assert!(lane.lo() >= last && lane.lo() <= f64::from(ITEMS));
            last = lane.lo();
        }
    };

    rayon::join(|| (0..ITEMS).into_par_iter().for_each(increment), observe);

    assert_eq!(
        plugin.context().global_memory().load(COUNTER, Type::I32).unwrap(),
        ShadowValue::splat(Interval::point(f64::from(ITEMS)), 1)
    );
    assert!(plugin.defects().is_empty());
}

#[test]
fn increments_keep_definedness() {
    let plugin = begin::<Taint>("taint-counter", COUNTER);
    plugin.host_memory_store(GLOBAL, COUNTER, 4, &0i32.to_le_bytes());

    (0..ITEMS).into_par_iter().for_each(|id| {
        let mut ws = Workspace::new();
        let mut item = item(id);
        plugin.work_item_begin(&mut ws, &item).unwrap();
        item.exec(
            &plugin,
            &mut ws,
            &atomic(2, AtomicOp::Add, smallvec![TypedValue::i32(1).into()]),
            TypedValue::i32(id as i32),
        )
        .unwrap();
        assert!(item.shadow(&ws, v(2)).is_defined());
    });

    assert_eq!(
        plugin.context().global_memory().load(COUNTER, Type::I32).unwrap(),
        ShadowValue::splat(Taint::Clean, 1)
    );
}

#[test]
fn compare_exchange_follows_the_concrete_outcome() {
    let plugin = begin::<Taint>("cmpxchg", COUNTER);
    plugin.memory_allocated(GLOBAL, COUNTER, 4);
    let mut ws = Workspace::new();
    let mut item = item(0);
    plugin.work_item_begin(&mut ws, &item).unwrap();

    let cmpxchg = |result| {
        atomic(
            result,
            AtomicOp::CmpXchg,
            smallvec![TypedValue::i32(0).into(), TypedValue::i32(5).into()],
        )
    };

    // Memory held 7, not 0: nothing is written.
    item.exec(&plugin, &mut ws, &cmpxchg(2), TypedValue::i32(7))
        .unwrap();
    assert!(!item.shadow(&ws, v(2)).is_defined());
    assert!(!plugin
        .context()
        .global_memory()
        .load(COUNTER, Type::I32)
        .unwrap()
        .is_defined());
    assert!(plugin.defects().is_empty());

    item.exec(&plugin, &mut ws, &cmpxchg(3), TypedValue::i32(0))
        .unwrap();
    assert!(!item.shadow(&ws, v(3)).is_defined());
    assert_eq!(
        plugin.context().global_memory().load(COUNTER, Type::I32).unwrap(),
        ShadowValue::splat(Taint::Clean, 1)
    );
}

#[test]
fn exchange_with_undefined_data_is_reported() {
    let plugin = begin::<Taint>("xchg", COUNTER);
    plugin.host_memory_store(GLOBAL, COUNTER, 4, &[0; 4]);
    let mut ws = Workspace::new();
    let mut item = item(5);
    plugin.work_item_begin(&mut ws, &item).unwrap();

    item.exec(
        &plugin,
        &mut ws,
        &atomic(2, AtomicOp::Xchg, smallvec![Operand::Undef(Type::I32)]),
        TypedValue::i32(0),
    )
    .unwrap();
    // The old contents were defined by the host.
    assert!(item.shadow(&ws, v(2)).is_defined());

    let defects = plugin.defects();
    assert_eq!(defects.len(), 1);
    insta::assert_snapshot!(defects[0].to_string(), @r"
    SH0004: uninitialized value written to global memory address 0x8000
      kernel `xchg`, item5 in group0
    ");
}
