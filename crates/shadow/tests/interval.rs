mod common;

use common::{alloca, load, store, v, void, Item};
use kshadow::{Interval, IntervalPlugin, ShadowError, ShadowValue, Workspace};
use kshadow_ir::{
    AddressSpace, BinaryOp, CastOp, FloatPredicate, Inst, InstData, KernelInvocation, Operand,
    Scalar, ScalarType, Type, TypedValue,
};

fn setup(name: &str) -> (IntervalPlugin, Workspace<Interval>, Item) {
    let mut plugin = common::plugin();
    plugin.kernel_begin(&KernelInvocation::new(name)).unwrap();
    let mut ws = Workspace::new();
    let item = Item::new(0, 0);
    plugin.work_item_begin(&mut ws, &item).unwrap();
    (plugin, ws, item)
}

fn fadd(result: u32, lhs: Operand, rhs: Operand) -> Inst {
    Inst::new(
        Some(v(result)),
        lhs.ty(),
        InstData::Binary {
            op: BinaryOp::FAdd,
            lhs,
            rhs,
        },
    )
}

fn fcmp(result: u32, pred: FloatPredicate, lhs: Operand, rhs: Operand) -> Inst {
    Inst::new(
        Some(v(result)),
        Type::I1,
        InstData::FCmp { pred, lhs, rhs },
    )
}

fn lane(shadow: &ShadowValue<Interval>) -> Interval {
    assert_eq!(shadow.num_lanes(), 1);
    shadow.lanes()[0]
}

#[test]
fn add_then_ordered_compare() {
    let (plugin, mut ws, mut item) = setup("add");

    item.exec(
        &plugin,
        &mut ws,
        &fadd(1, TypedValue::f32(1.0).into(), TypedValue::f32(2.0).into()),
        TypedValue::f32(3.0),
    )
    .unwrap();
    let sum = lane(&item.shadow(&ws, v(1)));
    assert!(sum.contains(3.0));
    assert!(!sum.may_be_nan());

    // `1 < 2` is decided by the bounds alone.
    item.exec(
        &plugin,
        &mut ws,
        &fcmp(
            2,
            FloatPredicate::Olt,
            TypedValue::f32(1.0).into(),
            TypedValue::f32(2.0).into(),
        ),
        TypedValue::bool(true),
    )
    .unwrap();
    assert_eq!(lane(&item.shadow(&ws, v(2))), Interval::point(1.0));

    item.exec(
        &plugin,
        &mut ws,
        &fcmp(
            3,
            FloatPredicate::Olt,
            Operand::value(v(1), Type::F32),
            TypedValue::f32(4.0).into(),
        ),
        TypedValue::bool(true),
    )
    .unwrap();
    assert!(plugin.defects().is_empty());
}

#[test]
fn contradicting_comparison_is_an_analysis_bug() {
    let (plugin, mut ws, mut item) = setup("contradiction");

    let err = item
        .exec(
            &plugin,
            &mut ws,
            &fcmp(
                1,
                FloatPredicate::Olt,
                TypedValue::f32(1.0).into(),
                TypedValue::f32(2.0).into(),
            ),
            TypedValue::bool(false),
        )
        .unwrap_err();
    assert!(err.is_analysis_bug());
    assert!(matches!(err, ShadowError::Inconsistent(ref found) if found.opcode.to_string() == "fcmp"));
}

#[test]
fn unbounded_operands_accept_either_outcome() {
    let (plugin, mut ws, mut item) = setup("unbounded");
    let space = AddressSpace::Private;

    item.exec(
        &plugin,
        &mut ws,
        &alloca(v(1), Type::F32),
        TypedValue::pointer(space, 0x10),
    )
    .unwrap();
    item.exec(&plugin, &mut ws, &load(v(2), Type::F32, v(1), space), TypedValue::f32(0.5))
        .unwrap();
    assert_eq!(lane(&item.shadow(&ws, v(2))), Interval::UNBOUNDED);

    for (idx, outcome) in [true, false].into_iter().enumerate() {
        item.exec(
            &plugin,
            &mut ws,
            &fcmp(
                3 + idx as u32,
                FloatPredicate::Olt,
                Operand::value(v(2), Type::F32),
                TypedValue::f32(1.0).into(),
            ),
            TypedValue::bool(outcome),
        )
        .unwrap();
        assert_eq!(lane(&item.shadow(&ws, v(3 + idx as u32))), Interval::new(0.0, 1.0));
    }
}

#[test]
fn bounds_survive_a_memory_round_trip() {
    let (plugin, mut ws, mut item) = setup("round-trip");
    let space = AddressSpace::Private;

    item.exec(
        &plugin,
        &mut ws,
        &fadd(1, TypedValue::f64(0.1).into(), TypedValue::f64(0.2).into()),
        TypedValue::f64(0.1 + 0.2),
    )
    .unwrap();
    item.exec(
        &plugin,
        &mut ws,
        &alloca(v(2), Type::F64),
        TypedValue::pointer(space, 0x20),
    )
    .unwrap();
    item.exec(
        &plugin,
        &mut ws,
        &store(v(2), Operand::value(v(1), Type::F64), space),
        void(),
    )
    .unwrap();
    item.exec(
        &plugin,
        &mut ws,
        &load(v(3), Type::F64, v(2), space),
        TypedValue::f64(0.1 + 0.2),
    )
    .unwrap();

    let loaded = lane(&item.shadow(&ws, v(3)));
    assert_eq!(loaded, lane(&item.shadow(&ws, v(1))));
    assert!(loaded.contains(0.1 + 0.2));
}

#[test]
fn vector_lanes_are_bounded_separately() {
    let (plugin, mut ws, mut item) = setup("vector");
    let ty = Type::vector(ScalarType::F32, 2);
    let vector = |a: f32, b: f32| {
        TypedValue::from_scalars(ty, [Scalar::from_f32(a), Scalar::from_f32(b)])
    };

    item.exec(
        &plugin,
        &mut ws,
        &fadd(1, vector(1.0, 2.0).into(), vector(10.0, 20.0).into()),
        vector(11.0, 22.0),
    )
    .unwrap();

    let shadow = item.shadow(&ws, v(1));
    assert_eq!(shadow.lanes(), &[Interval::point(11.0), Interval::point(22.0)]);
}

#[test]
fn float_to_int_truncates_bounds() {
    let (plugin, mut ws, mut item) = setup("fptosi");

    item.exec(
        &plugin,
        &mut ws,
        &fadd(1, TypedValue::f32(1.25).into(), TypedValue::f32(2.5).into()),
        TypedValue::f32(3.75),
    )
    .unwrap();
    item.exec(
        &plugin,
        &mut ws,
        &Inst::new(
            Some(v(2)),
            Type::I32,
            InstData::Cast {
                op: CastOp::FPToSI,
                arg: Operand::value(v(1), Type::F32),
            },
        ),
        TypedValue::i32(3),
    )
    .unwrap();
    assert_eq!(lane(&item.shadow(&ws, v(2))), Interval::point(3.0));
}
