use crate::alloc::{instance_page_size, Alloc, Limits, Slot};
use crate::error::Error;
use crate::region::{Region, RegionCreate, RegionInternal};
use crate::sysdeps::{discard, host_page_size, mmap_reserve, munmap, protect_read_write};
use bulwark_module::InstanceRuntimeData;
use libc::c_void;
use std::mem;
use std::sync::{Arc, Mutex, Weak};

/// A [`Region`](../trait.Region.html) backed by `mmap`.
///
/// `MmapRegion` lays out memory for instances in contiguous blocks, with an instance page
/// reserved first, followed by a guard page and the stack.
///
/// This results in an actual layout of an instance on an `MmapRegion`-produced `Slot` being:
/// ```text
/// 0x0000: +-----------------------+ <-- Slot.start
/// 0x0XXX: ~       ~unused~        ~
/// 0x0FF8: |  .stack_limit         | <-- InstanceRuntimeData
/// 0x1000: +-----------------------+ <-- `vmctx`. One page into the allocation.
/// 0x1XXX: ---- stack guard page ---
/// 0x2000: +-----------------------+ <-- Slot.stack, the lowest stack address
/// 0x2XXX: |                       |
/// 0xXXXX: ~  .......stack......   ~ // stack size is governed by limits.stack_size
/// 0xXXXX: |                       |
/// 0xN000: +-----------------------+ <-- Slot::stack_top(), where the guest stack pointer starts
/// ```
pub struct MmapRegion {
    capacity: usize,
    freelist: Mutex<Vec<Slot>>,
    limits: Limits,
    slot_size: usize,
}

impl Region for MmapRegion {
    fn free_slots(&self) -> usize {
        self.freelist.lock().unwrap().len()
    }

    fn used_slots(&self) -> usize {
        self.capacity() - self.free_slots()
    }

    fn capacity(&self) -> usize {
        self.capacity
    }
}

impl RegionInternal for MmapRegion {
    fn allocate(&self) -> Result<Alloc, Error> {
        let slot = self
            .freelist
            .lock()
            .unwrap()
            .pop()
            .ok_or(Error::RegionFull(self.capacity))?;

        if slot.stack as usize % host_page_size() != 0 {
            bulwark_bail!("stack is not page-aligned; this is a bug");
        }

        // upgrade the slot's weak region pointer so the region can't get dropped while the
        // allocation exists
        let region = slot.region.upgrade().ok_or_else(|| {
            bulwark_format_err!("backing region of slot does not exist; this is a bug")
        })?;

        // from here on, dropping the alloc returns the slot to the freelist
        let alloc = Alloc {
            slot: Some(slot),
            region,
        };

        let slot = alloc.slot();
        slot.limits.validate()?;
        // make the stack read/writable
        unsafe { protect_read_write(slot.stack, slot.limits.stack_size)? };

        tracing::debug!(
            start = ?slot.start,
            stack = ?slot.stack,
            stack_size = slot.limits.stack_size,
            "allocated slot"
        );
        Ok(alloc)
    }

    fn drop_alloc(&self, alloc: &mut Alloc) {
        let slot = alloc
            .slot
            .take()
            .expect("alloc didn't have a slot during drop; dropped twice?");

        if slot.stack as usize % host_page_size() != 0 {
            panic!("stack is not page-aligned");
        }

        unsafe {
            // the runtime data outlives the alloc; clear it so a stale limit is never reused
            let runtime_data = (slot.vmctx() as usize - mem::size_of::<InstanceRuntimeData>())
                as *mut InstanceRuntimeData;
            runtime_data.write(InstanceRuntimeData::default());

            // clear and disable access to the stack
            discard(slot.stack, slot.limits.stack_size).expect("stack discarded during drop");
        }

        self.freelist.lock().unwrap().push(slot);
    }

    fn as_dyn_internal(&self) -> &dyn RegionInternal {
        self
    }
}

impl Drop for MmapRegion {
    fn drop(&mut self) {
        let slot_size = self.slot_size;
        for slot in self.freelist.get_mut().unwrap().drain(0..) {
            Self::free_slot(slot, slot_size);
        }
    }
}

impl RegionCreate for MmapRegion {
    const TYPE_NAME: &'static str = "MmapRegion";

    fn create(instance_capacity: usize, limits: &Limits) -> Result<Arc<Self>, Error> {
        MmapRegion::create(instance_capacity, limits)
    }
}

impl MmapRegion {
    /// Create a new `MmapRegion` that can support a given number instances, each subject to the
    /// same runtime limits.
    ///
    /// The limits are validated before any memory is reserved. The region is returned in an
    /// `Arc`, because any allocations created from it carry a reference back to the region.
    pub fn create(instance_capacity: usize, limits: &Limits) -> Result<Arc<Self>, Error> {
        limits.validate()?;
        let slot_size = limits.total_memory_size()?;

        let region = Arc::new(MmapRegion {
            capacity: instance_capacity,
            freelist: Mutex::new(Vec::with_capacity(instance_capacity)),
            limits: *limits,
            slot_size,
        });
        {
            let mut freelist = region.freelist.lock().unwrap();
            for _ in 0..instance_capacity {
                freelist.push(MmapRegion::create_slot(&region)?);
            }
        }

        tracing::debug!(
            capacity = instance_capacity,
            stack_size = limits.stack_size,
            hostcall_reservation = limits.hostcall_reservation,
            "created mmap region"
        );
        Ok(region)
    }

    fn create_slot(region: &Arc<MmapRegion>) -> Result<Slot, Error> {
        // get the chunk of virtual memory that the `Slot` will manage
        let mem = unsafe { mmap_reserve(region.slot_size)? };

        // set the first page to read/write so that the runtime data can be stored there
        if let Err(e) = unsafe { protect_read_write(mem, instance_page_size()) } {
            Self::free_slot_memory(mem, region.slot_size);
            bulwark_bail!("making the instance page accessible: {}", e);
        }

        // lay out the stack after the instance page and its guard page
        let stack = mem as usize + instance_page_size() + host_page_size();

        Ok(Slot {
            start: mem,
            stack: stack as *mut c_void,
            limits: region.limits,
            region: Arc::downgrade(region) as Weak<dyn RegionInternal>,
        })
    }

    fn free_slot(slot: Slot, slot_size: usize) {
        Self::free_slot_memory(slot.start, slot_size);
    }

    fn free_slot_memory(start: *mut c_void, slot_size: usize) {
        let res = unsafe { munmap(start, slot_size) };
        res.expect("munmap succeeded");
    }
}
