mod common;

use common::{load, store, v, void, Item};
use kshadow::{MapFlags, ShadowError, TaintPlugin, Visibility, Workspace};
use kshadow_ir::{AddressSpace, KernelInvocation, KernelValue, Operand, Type, TypedValue};

const GLOBAL: AddressSpace = AddressSpace::Global;
const BUFFER: u64 = 0x1_0000_0000;

struct Run {
    plugin: TaintPlugin,
    ws: Workspace<kshadow::Taint>,
    item: Item,
    next: u32,
}

impl Run {
    fn new(address: u64) -> Self {
        let mut plugin: TaintPlugin = common::plugin();
        plugin
            .kernel_begin(&KernelInvocation::new("host").with_value(
                KernelValue::pointer_argument(
                    v(1),
                    Type::ptr(GLOBAL),
                    Type::I32,
                    TypedValue::pointer(GLOBAL, address),
                ),
            ))
            .unwrap();
        let mut ws = Workspace::new();
        let item = Item::new(0, 0).with(v(1), TypedValue::pointer(GLOBAL, address));
        plugin.work_item_begin(&mut ws, &item).unwrap();
        Self {
            plugin,
            ws,
            item,
            next: 10,
        }
    }

    /// Loads an `int` through the kernel argument and reports whether its
    /// shadow is defined.
    fn load_defined(&mut self) -> Result<bool, ShadowError> {
        self.next += 1;
        let result = v(self.next);
        self.item.exec(
            &self.plugin,
            &mut self.ws,
            &load(result, Type::I32, v(1), GLOBAL),
            TypedValue::i32(0),
        )?;
        Ok(self.item.shadow(&self.ws, result).is_defined())
    }

    fn store(&mut self, value: Operand) {
        self.item
            .exec(&self.plugin, &mut self.ws, &store(v(1), value, GLOBAL), void())
            .unwrap();
    }
}

#[test]
fn kernel_arguments_register_undefined_buffers() {
    let mut run = Run::new(BUFFER);
    assert_eq!(run.plugin.context().host().visibility(1, 0), Some(Visibility::Undefined));
    assert!(!run.load_defined().unwrap());

    // Loads never report; only the use of the value would.
    assert!(run.plugin.defects().is_empty());
}

#[test]
fn host_writes_define_the_buffer() {
    let mut run = Run::new(BUFFER);
    assert!(!run.load_defined().unwrap());

    run.plugin.host_memory_store(GLOBAL, BUFFER, 16, &[0; 16]);
    assert_eq!(run.plugin.context().host().visibility(1, 0), Some(Visibility::Defined));
    // Loads leave no shadow behind, so the write shows through.
    assert!(run.load_defined().unwrap());
}

#[test]
fn kernel_stores_override_host_visibility() {
    let mut run = Run::new(BUFFER);
    run.plugin.host_memory_store(GLOBAL, BUFFER, 16, &[0; 16]);

    run.store(Operand::Undef(Type::I32));
    assert!(!run.load_defined().unwrap());
    assert_eq!(run.plugin.defects().len(), 1);

    run.store(TypedValue::i32(1).into());
    assert!(run.load_defined().unwrap());
}

#[test]
fn write_only_maps_invalidate() {
    let mut run = Run::new(BUFFER);
    run.plugin.host_memory_store(GLOBAL, BUFFER, 16, &[0; 16]);
    assert!(run.load_defined().unwrap());

    // Reading maps keep the contents.
    run.plugin.memory_map(GLOBAL, BUFFER, 0, 16, MapFlags::READ | MapFlags::WRITE);
    assert!(run.load_defined().unwrap());

    run.plugin.memory_map(GLOBAL, BUFFER, 0, 16, MapFlags::WRITE_INVALIDATE_REGION);
    assert_eq!(run.plugin.context().host().visibility(1, 0), Some(Visibility::Undefined));
    assert!(!run.load_defined().unwrap());
}

#[test]
fn map_offsets_select_the_released_range() {
    let mut run = Run::new(BUFFER + 0x40);
    run.plugin.host_memory_store(GLOBAL, BUFFER, 0x100, &[0; 0x100]);
    assert!(run.load_defined().unwrap());

    // A write-only map elsewhere in the buffer leaves these bytes alone.
    run.plugin.memory_map(GLOBAL, BUFFER, 0x80, 0x10, MapFlags::WRITE);
    assert!(run.load_defined().unwrap());

    run.plugin.memory_map(GLOBAL, BUFFER, 0x40, 0x10, MapFlags::WRITE);
    assert!(!run.load_defined().unwrap());
}

#[test]
fn partial_host_stores_leave_the_rest_undefined() {
    let mut run = Run::new(BUFFER + 32);
    run.plugin.memory_allocated(GLOBAL, BUFFER, 64);
    run.plugin.host_memory_store(GLOBAL, BUFFER, 4, &[0; 4]);
    assert_eq!(run.plugin.context().host().visibility(1, 0), Some(Visibility::Defined));
    assert_eq!(run.plugin.context().host().visibility(1, 32), Some(Visibility::Undefined));
    assert!(!run.load_defined().unwrap());

    run.plugin.host_memory_store(GLOBAL, BUFFER + 32, 2, &[0; 2]);
    // Half of the `int` is still unwritten.
    assert!(!run.load_defined().unwrap());
    run.plugin.host_memory_store(GLOBAL, BUFFER + 34, 2, &[0; 2]);
    assert!(run.load_defined().unwrap());
    assert_eq!(
        run.plugin
            .context()
            .host()
            .defined_ranges(1)
            .map(|ranges| ranges.to_string()),
        Some("0x0..0x4, 0x20..0x24".to_string())
    );
}

#[test]
fn reallocation_starts_undefined_and_deallocation_invalidates() {
    let mut run = Run::new(BUFFER);
    run.plugin.host_memory_store(GLOBAL, BUFFER, 16, &[0; 16]);
    run.store(TypedValue::i32(1).into());

    run.plugin.memory_deallocated(GLOBAL, BUFFER);
    assert_eq!(run.plugin.context().host().visibility(1, 0), None);
    assert!(run.plugin.context().global_memory().is_empty());
    assert_eq!(
        run.load_defined(),
        Err(ShadowError::InvalidAddress {
            space: GLOBAL,
            address: BUFFER
        })
    );

    run.plugin.memory_allocated(GLOBAL, BUFFER, 16);
    assert!(!run.load_defined().unwrap());
}

#[test]
fn other_address_spaces_are_ignored() {
    let mut run = Run::new(BUFFER);
    run.plugin
        .host_memory_store(AddressSpace::Local, BUFFER, 16, &[0; 16]);
    run.plugin.memory_allocated(AddressSpace::Private, BUFFER, 16);
    assert_eq!(run.plugin.context().host().visibility(1, 0), Some(Visibility::Undefined));
    assert!(!run.load_defined().unwrap());
}

#[test]
fn forgotten_buffers_are_invalid() {
    let mut run = Run::new(0x7_0000_0000);
    run.plugin.memory_deallocated(GLOBAL, 0x7_0000_0000);
    assert!(matches!(
        run.load_defined(),
        Err(ShadowError::InvalidAddress { space: GLOBAL, .. })
    ));
}
