pub mod mmap;

use crate::alloc::{Alloc, Limits};
use crate::error::Error;
use crate::hostcall::LinkedModule;
use crate::instance::Instance;
use std::sync::Arc;

/// A memory region in which Bulwark instances are created and run.
pub trait Region: RegionInternal {
    /// Create a new instance of a linked module within the region.
    ///
    /// The instance's stack limit is initialized before this returns, so no guest code can run
    /// against an uninitialized limit.
    fn new_instance(&self, module: Arc<LinkedModule>) -> Result<Instance, Error> {
        let alloc = self.as_dyn_internal().allocate()?;
        Instance::new(alloc, module)
    }

    /// Return the number of instance slots that are currently free in the region.
    ///
    /// A value greater than zero does not guarantee that a subsequent call to
    /// `Region::new_instance()` will succeed, as other threads may instantiate from the region in
    /// the meantime.
    fn free_slots(&self) -> usize;

    /// Return the number of instance slots that are currently in use in the region.
    fn used_slots(&self) -> usize;

    /// Return the total instance slot capacity of the region.
    fn capacity(&self) -> usize;
}

/// A `RegionInternal` is a collection of `Slot`s which are managed as a whole.
pub trait RegionInternal: Send + Sync {
    /// Back a free slot with memory.
    ///
    /// The returned `Alloc` can be handed to
    /// [`Instance::reset_with_alloc()`](../instance/struct.Instance.html#method.reset_with_alloc)
    /// to move an existing instance onto it.
    fn allocate(&self) -> Result<Alloc, Error>;

    /// Clears and unmaps the stack of an `Alloc`, while retaining the virtual address ranges in
    /// its `Slot`.
    fn drop_alloc(&self, alloc: &mut Alloc);

    fn as_dyn_internal(&self) -> &dyn RegionInternal;
}

/// A trait for regions that are created with a fixed capacity and limits.
///
/// This is not part of [`Region`](trait.Region.html) so that `Region` types can be made into trait
/// objects.
pub trait RegionCreate: Region {
    /// The type name of the region; useful for testing.
    const TYPE_NAME: &'static str;

    /// Create a new `Region` that can support a given number instances, each subject to the same
    /// runtime limits.
    fn create(instance_capacity: usize, limits: &Limits) -> Result<Arc<Self>, Error>;
}
