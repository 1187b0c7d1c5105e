//! Implementation of the BlockDispenser trait, for Unix.

use std::{io, ptr::{self, NonNull}};

use seqpool_core::{AllocError, BlockDispenser, MemoryBlock, PowerOf2};

/// NativeBlockDispenser
///
/// Obtains blocks of pages directly from the OS, with `mmap`, and changes their protection with `mprotect`.
///
/// The minimum block size is the OS page size.
#[derive(Clone, Copy, Debug)]
pub struct NativeBlockDispenser {
    page_size: PowerOf2,
}

impl NativeBlockDispenser {
    /// Creates an instance.
    ///
    /// #   Panics
    ///
    /// If the OS page size cannot be determined, or is not a power of 2.
    pub fn new() -> Self {
        //  Safety:
        //  -   `sysconf` has no pre-condition.
        let page_size = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
        assert!(page_size > 0, "Could not determine the page size: {}", page_size);

        match PowerOf2::new(page_size as usize) {
            Some(page_size) => Self { page_size },
            None => panic!("Page size is not a power of 2: {}", page_size),
        }
    }

    /// Returns the page size.
    pub fn page_size(&self) -> PowerOf2 { self.page_size }
}

impl Default for NativeBlockDispenser {
    fn default() -> Self { Self::new() }
}

impl BlockDispenser for NativeBlockDispenser {
    fn minimum_block_size(&self) -> PowerOf2 { self.page_size }

    unsafe fn allocate(&self, size: usize) -> Result<MemoryBlock, AllocError> {
        debug_assert!(size > 0);
        debug_assert!(size % self.page_size == 0, "{} % {} != 0", size, self.page_size.value());

        match mmap_allocate(size) {
            Some(pointer) => Ok(MemoryBlock::new(pointer, size)),
            None => {
                let error = io::Error::last_os_error();
                tracing::warn!(size, %error, "mmap failed");

                Err(AllocError::OutOfMemory { size, align: self.page_size.value() })
            },
        }
    }

    unsafe fn deallocate(&self, block: MemoryBlock) {
        munmap_deallocate(block.pointer().as_ptr(), block.size());
    }

    unsafe fn protect(&self, block: MemoryBlock) -> Result<(), AllocError> {
        mprotect(block, libc::PROT_READ)
    }

    unsafe fn unprotect(&self, block: MemoryBlock) -> Result<(), AllocError> {
        mprotect(block, libc::PROT_READ | libc::PROT_WRITE)
    }
}

//  Wrapper around `mmap`.
//
//  Returns a pointer to `size` bytes of readable and writable memory, aligned on the page size.
fn mmap_allocate(size: usize) -> Option<NonNull<u8>> {
    let length = size;
    let prot = libc::PROT_READ | libc::PROT_WRITE;
    let flags = libc::MAP_PRIVATE | libc::MAP_ANONYMOUS;

    //  No specific address hint.
    let addr = ptr::null_mut();
    //  When used in conjunction with MAP_ANONYMOUS, fd is mandated to be -1 on some implementations.
    let fd = -1;
    //  When used in conjunction with MAP_ANONYMOUS, offset is mandated to be 0 on some implementations.
    let offset = 0;

    //  Safety:
    //  -   `addr`, `fd`, and `offset` are suitable for MAP_ANONYMOUS.
    let result = unsafe { libc::mmap(addr, length, prot, flags, fd, offset) };

    if result == libc::MAP_FAILED {
        return None;
    }

    NonNull::new(result as *mut u8)
}

//  Wrapper around `munmap`.
//
//  #   Panics
//
//  If `munmap` returns a non-0 result.
//
//  #   Safety
//
//  -   Assumes that `addr` points to a `mmap`ed area of at least `size` bytes.
//  -   Assumes that the range `[addr, addr + size)` is no longer in use.
unsafe fn munmap_deallocate(addr: *mut u8, size: usize) {
    let result = libc::munmap(addr as *mut libc::c_void, size);
    assert!(result == 0, "Could not munmap {:x}, {}: {}", addr as usize, size, io::Error::last_os_error());
}

//  Wrapper around `mprotect`.
//
//  #   Safety
//
//  -   Assumes that `block` was obtained from `mmap_allocate`, and not unmapped since.
unsafe fn mprotect(block: MemoryBlock, prot: libc::c_int) -> Result<(), AllocError> {
    let address = block.pointer().as_ptr();

    if libc::mprotect(address as *mut libc::c_void, block.size(), prot) == 0 {
        return Ok(());
    }

    let error = io::Error::last_os_error();
    tracing::warn!(address = address as usize, size = block.size(), %error, "mprotect failed");

    let code = error.raw_os_error().unwrap_or(0);

    Err(AllocError::Protection { address: address as usize, size: block.size(), code })
}

// mod tests
