#[cfg(not(target_os = "linux"))]
use libc::memset;
use libc::c_void;
use nix::sys::mman::{madvise, mmap, munmap as nix_munmap, MapFlags, MmapAdvise, ProtFlags};
use nix::unistd::{sysconf, SysconfVar};
use std::ptr;
use std::sync::Once;

static mut HOST_PAGE_SIZE: usize = 0;
static HOST_PAGE_SIZE_INIT: Once = Once::new();

/// The host page size, read once from `sysconf`.
pub fn host_page_size() -> usize {
    unsafe {
        HOST_PAGE_SIZE_INIT.call_once(|| match sysconf(SysconfVar::PAGE_SIZE) {
            Ok(Some(sz)) if sz > 0 => HOST_PAGE_SIZE = sz as usize,
            _ => panic!("could not get host page size from sysconf"),
        });
        HOST_PAGE_SIZE
    }
}

/// Reserve `len` bytes of inaccessible anonymous memory.
pub unsafe fn mmap_reserve(len: usize) -> nix::Result<*mut c_void> {
    mmap(
        ptr::null_mut(),
        len,
        ProtFlags::PROT_NONE,
        MapFlags::MAP_ANON | MapFlags::MAP_PRIVATE,
        -1,
        0,
    )
}

pub unsafe fn munmap(addr: *mut c_void, len: usize) -> nix::Result<()> {
    nix_munmap(addr, len)
}

pub unsafe fn mprotect(addr: *mut c_void, length: libc::size_t, prot: ProtFlags) -> nix::Result<()> {
    nix::errno::Errno::result(libc::mprotect(addr, length, prot.bits())).map(drop)
}

pub unsafe fn protect_read_write(addr: *mut c_void, len: usize) -> nix::Result<()> {
    mprotect(addr, len, ProtFlags::PROT_READ | ProtFlags::PROT_WRITE)
}

/// Clear `len` bytes at `addr` and leave them inaccessible.
///
/// `mprotect()` and `madvise()` are sufficient to zero a page on Linux, but not necessarily on
/// all POSIX operating systems, and on macOS in particular.
pub unsafe fn discard(addr: *mut c_void, len: usize) -> nix::Result<()> {
    #[cfg(not(target_os = "linux"))]
    {
        protect_read_write(addr, len)?;
        memset(addr, 0, len);
    }
    mprotect(addr, len, ProtFlags::PROT_NONE)?;
    madvise(addr, len, MmapAdvise::MADV_DONTNEED)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reserved_memory_is_cleared_by_discard() {
        let len = 2 * host_page_size();
        unsafe {
            let mem = mmap_reserve(len).expect("reserve succeeds");
            protect_read_write(mem, len).expect("mprotect succeeds");
            let bytes = mem as *mut u8;
            bytes.write(0xFF);
            bytes.add(len - 1).write(0xFF);

            discard(mem, len).expect("discard succeeds");
            protect_read_write(mem, len).expect("mprotect succeeds");
            assert_eq!(bytes.read(), 0);
            assert_eq!(bytes.add(len - 1).read(), 0);

            munmap(mem, len).expect("munmap succeeds");
        }
    }
}
