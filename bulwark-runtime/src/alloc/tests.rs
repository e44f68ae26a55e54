#[macro_export]
macro_rules! alloc_tests {
    ( $TestRegion:path ) => {
        use std::sync::Arc;
        use $TestRegion as TestRegion;
        use $crate::alloc::{instance_page_size, Alloc, Limits};
        use $crate::error::Error;
        use $crate::hostcall::{LinkedModule, Linker};
        use $crate::module::MockModuleBuilder;
        use $crate::region::{Region, RegionInternal};
        use $crate::sysdeps::host_page_size;
        use bulwark_module::bindings::Bindings;

        const LIMITS_STACK_SIZE: usize = 64 * 1024;
        const LIMITS_HOSTCALL_RESERVATION: usize = 16 * 1024;

        const LIMITS: Limits = Limits {
            stack_size: LIMITS_STACK_SIZE,
            hostcall_reservation: LIMITS_HOSTCALL_RESERVATION,
        };

        /// The stack of an allocation, lowest address first.
        unsafe fn stack_bytes(alloc: &Alloc) -> &mut [u8] {
            let slot = alloc.slot();
            std::slice::from_raw_parts_mut(slot.stack as *mut u8, slot.limits.stack_size)
        }

        fn noop_module() -> Arc<LinkedModule> {
            Linker::new(Bindings::empty())
                .link(
                    MockModuleBuilder::new()
                        .with_export_func("noop", |_, _| vec![])
                        .build(),
                )
                .expect("module links")
        }

        /// This test shows an `Alloc` handed out by a region has a stack of the correct size and
        /// read/writability.
        #[test]
        fn allocate_works() {
            let region = TestRegion::create(1, &LIMITS).expect("region created");
            let alloc = region.allocate().expect("allocate succeeds");

            let stack = unsafe { stack_bytes(&alloc) };
            assert_eq!(stack.len(), LIMITS_STACK_SIZE);

            assert_eq!(stack[0], 0);
            stack[0] = 0xFF;
            assert_eq!(stack[0], 0xFF);

            assert_eq!(stack[LIMITS_STACK_SIZE - 1], 0);
            stack[LIMITS_STACK_SIZE - 1] = 0xFF;
            assert_eq!(stack[LIMITS_STACK_SIZE - 1], 0xFF);
        }

        /// This test shows the slot layout: the instance page, then a guard page, then the stack.
        #[test]
        fn slot_layout() {
            let region = TestRegion::create(1, &LIMITS).expect("region created");
            let alloc = region.allocate().expect("allocate succeeds");
            let slot = alloc.slot();

            assert_eq!(slot.vmctx() as usize, slot.start as usize + instance_page_size());
            assert_eq!(
                slot.stack as usize,
                slot.vmctx() as usize + host_page_size()
            );
            assert_eq!(
                slot.stack_top() as usize,
                slot.stack as usize + LIMITS_STACK_SIZE
            );
        }

        /// This test shows a new instance has its stack limit set from its slot before any guest
        /// code runs.
        #[test]
        fn new_instance_sets_stack_limit() {
            let region = TestRegion::create(1, &LIMITS).expect("region created");
            let inst = region
                .new_instance(noop_module())
                .expect("new_instance succeeds");
            let slot = inst.alloc().slot();
            assert_eq!(
                inst.stack_limit(),
                slot.stack_top() as u64 - LIMITS_STACK_SIZE as u64
                    + LIMITS_HOSTCALL_RESERVATION as u64
            );
            assert!(inst.is_ready());
        }

        #[test]
        fn zero_reservation_is_accepted() {
            let limits = LIMITS.with_hostcall_reservation(0);
            let region = TestRegion::create(1, &limits).expect("region created");
            let inst = region
                .new_instance(noop_module())
                .expect("new_instance succeeds");
            assert_eq!(inst.stack_limit(), inst.alloc().slot().stack as u64);
        }

        #[test]
        fn whole_stack_reservation_is_accepted() {
            let limits = LIMITS.with_hostcall_reservation(LIMITS_STACK_SIZE);
            let region = TestRegion::create(1, &limits).expect("region created");
            let inst = region
                .new_instance(noop_module())
                .expect("new_instance succeeds");
            assert_eq!(
                inst.stack_limit(),
                inst.alloc().slot().stack_top() as u64
            );
        }

        #[test]
        fn reject_reservation_larger_than_stack() {
            let limits = LIMITS.with_hostcall_reservation(LIMITS_STACK_SIZE + 1);
            match TestRegion::create(1, &limits) {
                Err(Error::InvalidArgument(msg)) => assert_eq!(
                    msg,
                    "hostcall reserved space must not be greater than stack size"
                ),
                Err(e) => panic!("unexpected error: {}", e),
                Ok(_) => panic!("region created with an oversized reservation"),
            }
        }

        #[test]
        fn reject_unaligned_stack() {
            let limits = LIMITS
                .with_stack_size(LIMITS_STACK_SIZE + 1)
                .with_hostcall_reservation(0);
            assert!(matches!(
                TestRegion::create(1, &limits),
                Err(Error::InvalidArgument(
                    "stack size must be a multiple of host page size"
                ))
            ));
        }

        #[test]
        fn reject_empty_stack() {
            let limits = LIMITS.with_stack_size(0).with_hostcall_reservation(0);
            assert!(matches!(
                TestRegion::create(1, &limits),
                Err(Error::InvalidArgument("stack size must be greater than 0"))
            ));
        }

        /// This test shows that a `Slot` can be reused after an `Alloc` is dropped, and that the
        /// stack is cleared in between.
        #[test]
        fn reuse_slot_works() {
            fn peek_n_poke(region: &Arc<TestRegion>) {
                let alloc = region.allocate().expect("allocate succeeds");
                let stack = unsafe { stack_bytes(&alloc) };
                assert_eq!(stack[0], 0);
                stack[0] = 0xFF;
                assert_eq!(stack[LIMITS_STACK_SIZE - 1], 0);
                stack[LIMITS_STACK_SIZE - 1] = 0xFF;
            }

            let region = TestRegion::create(1, &LIMITS).expect("region created");
            peek_n_poke(&region);
            peek_n_poke(&region);
        }

        #[test]
        fn region_full() {
            let region = TestRegion::create(1, &LIMITS).expect("region created");
            let _inst = region
                .new_instance(noop_module())
                .expect("new_instance succeeds");
            assert!(matches!(
                region.new_instance(noop_module()),
                Err(Error::RegionFull(1))
            ));
        }

        #[test]
        fn drop_region_first() {
            let region = TestRegion::create(1, &Limits::default()).expect("region can be created");
            let inst = region
                .new_instance(noop_module())
                .expect("new_instance succeeds");
            drop(region);
            drop(inst);
        }

        #[test]
        fn slot_counts_work() {
            let region = TestRegion::create(2, &LIMITS).expect("region created");
            assert_eq!(region.capacity(), 2);
            assert_eq!(region.free_slots(), 2);
            assert_eq!(region.used_slots(), 0);
            let inst1 = region
                .new_instance(noop_module())
                .expect("new_instance succeeds");
            assert_eq!(region.free_slots(), 1);
            assert_eq!(region.used_slots(), 1);
            let inst2 = region
                .new_instance(noop_module())
                .expect("new_instance succeeds");
            assert_eq!(region.free_slots(), 0);
            assert_eq!(region.used_slots(), 2);
            drop(inst1);
            assert_eq!(region.free_slots(), 1);
            assert_eq!(region.used_slots(), 1);
            drop(inst2);
            assert_eq!(region.capacity(), 2);
            assert_eq!(region.free_slots(), 2);
            assert_eq!(region.used_slots(), 0);
        }

        /// This test shows an instance moved onto another allocation gets the stack limit of the
        /// new slot, and gives its old slot back.
        #[test]
        fn reset_with_alloc_moves_stack_limit() {
            let small = TestRegion::create(1, &LIMITS).expect("region created");
            let big_limits = LIMITS
                .with_stack_size(2 * LIMITS_STACK_SIZE)
                .with_hostcall_reservation(4 * LIMITS_HOSTCALL_RESERVATION);
            let big = TestRegion::create(1, &big_limits).expect("region created");

            let mut inst = small
                .new_instance(noop_module())
                .expect("new_instance succeeds");
            let old_limit = inst.stack_limit();
            assert_eq!(small.used_slots(), 1);

            inst.reset_with_alloc(big.allocate().expect("allocate succeeds"))
                .expect("reset succeeds");
            assert_eq!(small.used_slots(), 0);
            assert_eq!(big.used_slots(), 1);

            let slot = inst.alloc().slot();
            assert_ne!(inst.stack_limit(), old_limit);
            assert_eq!(
                inst.stack_limit(),
                slot.stack as u64 + 4 * LIMITS_HOSTCALL_RESERVATION as u64
            );
            inst.run("noop", &[]).expect("instance runs on its new slot");
        }
    };
}

#[cfg(test)]
mod mmap {
    alloc_tests!(crate::region::mmap::MmapRegion);
}
