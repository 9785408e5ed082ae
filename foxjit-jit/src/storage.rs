use crate::StorageError;
use std::sync::{Arc, Mutex};

/// Default slab size (spec §4.D/§6): 256 KiB.
pub const DEFAULT_SLAB_SIZE: usize = 256 * 1024;
/// Allocation alignment within a slab (spec §6).
pub const ALLOC_ALIGN: usize = 32;

fn round_up(value: usize, align: usize) -> usize {
    (value + align - 1) / align * align
}

fn page_size() -> usize {
    // SAFETY: sysconf with _SC_PAGESIZE never touches memory we don't own.
    let page = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
    if page <= 0 {
        4096
    } else {
        page as usize
    }
}

struct SlabState {
    /// `m_memory_allocated`: the bump-pointer high-water mark.
    allocated: usize,
    /// `m_memory_executable`: length of the executable prefix.
    executable: usize,
}

/// A contiguous, page-aligned, `mmap`-backed region of executable memory
/// (spec §4.D). New routines are bump-allocated into the writable window
/// above the executable prefix; once the caller is done writing machine
/// code it calls [`Slab::executable_remap`] to reprotect and extend that
/// prefix, monotonically.
///
/// Grounded on the pooled-resource-lifecycle pattern `fuel-vm/src/pool.rs`
/// uses for its `Arc`-refcounted VM memory pool, generalized from reusable
/// VM memory to reusable executable pages; the raw `mmap`/`mprotect` calls
/// reach for `libc` directly rather than a higher-level mmap wrapper.
pub struct Slab {
    base: *mut u8,
    size: usize,
    state: Mutex<SlabState>,
}

// SAFETY: `base` points at memory this `Slab` exclusively owns for its
// entire lifetime; all mutation of the region is serialized through `state`.
unsafe impl Send for Slab {}
unsafe impl Sync for Slab {}

impl Slab {
    pub fn new(size: usize) -> Result<Arc<Slab>, StorageError> {
        let size = round_up(size, page_size());
        // SAFETY: a fixed-size anonymous private mapping with no file backing.
        let base = unsafe {
            libc::mmap(
                std::ptr::null_mut(),
                size,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_PRIVATE | libc::MAP_ANONYMOUS,
                -1,
                0,
            )
        };
        if base == libc::MAP_FAILED {
            return Err(StorageError::MmapFailed(std::io::Error::last_os_error()));
        }
        tracing::debug!(size, "mapped new storage slab");
        Ok(Arc::new(Slab {
            base: base as *mut u8,
            size,
            state: Mutex::new(SlabState { allocated: 0, executable: 0 }),
        }))
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn bytes_allocated(&self) -> usize {
        self.state.lock().unwrap().allocated
    }

    pub fn bytes_executable(&self) -> usize {
        self.state.lock().unwrap().executable
    }

    pub(crate) fn base_ptr(&self) -> *mut u8 {
        self.base
    }

    /// Bump-allocate `len` bytes, 32-byte aligned, from the writable window.
    /// Never dips into the executable prefix since `allocated` only ever
    /// grows and `executable <= allocated` is an invariant maintained by
    /// [`executable_remap`](Self::executable_remap).
    pub fn allocate(&self, len: usize) -> Result<*mut u8, StorageError> {
        let mut state = self.state.lock().unwrap();
        let aligned_len = round_up(len, ALLOC_ALIGN);
        if state.allocated + aligned_len > self.size {
            return Err(StorageError::OutOfSpace {
                requested: aligned_len,
                available: self.size - state.allocated,
            });
        }
        // SAFETY: base + allocated is within [0, size) by the check above.
        let ptr = unsafe { self.base.add(state.allocated) };
        state.allocated += aligned_len;
        Ok(ptr)
    }

    /// Extend the executable prefix to cover `target_bytes`, per §4.D:
    /// succeeds immediately if already covered; refuses (returns `Ok(false)`)
    /// without mutating state if `target_bytes` rounds up past the current
    /// allocation high-water mark and `force` is false; otherwise advances
    /// the mark and reprotects `[0, rounded)` read-execute.
    pub fn executable_remap(&self, target_bytes: usize, force: bool) -> Result<bool, StorageError> {
        let mut state = self.state.lock().unwrap();
        if state.executable >= target_bytes {
            return Ok(true);
        }
        let rounded = round_up(target_bytes, page_size());
        if rounded > state.allocated && !force {
            return Ok(false);
        }
        if rounded > state.allocated {
            state.allocated = rounded;
        }
        // SAFETY: `rounded` is within `[0, size)` by the checks above, and
        // the range was either already writable or just reserved as such.
        let result = unsafe { libc::mprotect(self.base as *mut libc::c_void, rounded, libc::PROT_READ | libc::PROT_EXEC) };
        if result != 0 {
            return Err(StorageError::MprotectFailed(std::io::Error::last_os_error()));
        }
        state.executable = rounded;
        tracing::trace!(rounded, "extended executable prefix");
        Ok(true)
    }
}

impl Drop for Slab {
    fn drop(&mut self) {
        // SAFETY: `base`/`size` describe exactly the mapping this slab owns.
        unsafe {
            libc::munmap(self.base as *mut libc::c_void, self.size);
        }
    }
}

impl std::fmt::Debug for Slab {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock().unwrap();
        f.debug_struct("Slab")
            .field("size", &self.size)
            .field("allocated", &state.allocated)
            .field("executable", &state.executable)
            .finish()
    }
}

/// The compiled-routine ABI (spec §6): `fn(guest, memory_base, register_base) -> cycles`.
/// `memory_base`/`register_base` may be null when the emitter didn't use
/// fast-addressing windows.
pub type NativeEntry = unsafe extern "C" fn(guest: *mut u8, memory_base: *mut u8, register_base: *mut u8) -> u64;

/// A native routine: a `(slab, pointer, size)` triple (spec §4.D), keeping
/// its slab alive via `Arc` for as long as any `Routine` into it exists.
#[derive(Clone)]
pub struct Routine {
    slab: Arc<Slab>,
    offset: usize,
    size: usize,
}

impl Routine {
    pub fn new(slab: Arc<Slab>, pointer: *mut u8, size: usize) -> Self {
        // SAFETY: both pointers are within the same allocation; only used
        // for the offset arithmetic below, never dereferenced here.
        let offset = unsafe { (pointer as *const u8).offset_from(slab.base_ptr() as *const u8) };
        assert!(offset >= 0, "routine pointer precedes its slab's base");
        Routine { slab, offset: offset as usize, size }
    }

    pub fn end_offset(&self) -> usize {
        self.offset + self.size
    }

    /// Delegate to the owning slab's `executable_remap`, extending it to
    /// cover this routine's full byte range.
    pub fn prepare(&self, force: bool) -> Result<bool, StorageError> {
        self.slab.executable_remap(self.end_offset(), force)
    }

    pub fn ready(&self) -> bool {
        self.slab.bytes_executable() >= self.end_offset()
    }

    /// Invoke the routine. Caller must have called [`prepare`](Self::prepare)
    /// (returning `true`) first — executing into writable-but-not-yet-remapped
    /// memory is undefined behavior the type system can't prevent here.
    pub unsafe fn execute(&self, guest: *mut u8, memory_base: *mut u8, register_base: *mut u8) -> u64 {
        let entry: NativeEntry = std::mem::transmute(self.slab.base_ptr().add(self.offset));
        entry(guest, memory_base, register_base)
    }

    pub fn disassemble(&self) -> String {
        format!("<native routine @ slab+{:#x}, {} bytes>", self.offset, self.size)
    }
}
