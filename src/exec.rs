//! Executable memory: promotes a finished instruction stream into a
//! callable kernel.
//!
//! The lifecycle is mmap(RW) -> copy -> mprotect(RX) -> never write again.
//! All `unsafe` in the crate lives here, in the mapping syscalls and the
//! final call through the generated code.

use libc::c_void;

use crate::error::JitError;

/// Entry signature of a generated kernel.
///
/// System V AMD64: the first argument (`rdi`) is the constant-pool base, the
/// second (`rsi`) is the symbol-pointer-table base. The kernel reads scalars
/// at the constant offsets assigned during assembly, reads 8-byte data
/// pointers at the symbol offsets, and loads/stores vector groups through
/// those pointers. No return value.
pub type KernelFn = unsafe extern "C" fn(*const u8, *const u8);

/// A page-aligned read+execute mapping holding one kernel's code.
///
/// Owns the mapping exclusively and unmaps it exactly once on drop.
struct ExecutableBuffer {
    ptr: *mut u8,
    map_len: usize,
    code_len: usize,
}

impl ExecutableBuffer {
    /// Map a fresh region, copy `code` in, and flip it to read+execute.
    ///
    /// # Panics
    ///
    /// Panics if `code` is empty: the assembler always emits at least the
    /// trailing return, so an empty stream is a programmer error.
    fn new(code: &[u8]) -> Result<Self, JitError> {
        assert!(!code.is_empty(), "cannot finalize an empty instruction stream");

        let page = unsafe { libc::sysconf(libc::_SC_PAGESIZE) } as usize;
        let map_len = (code.len() + page - 1) & !(page - 1);

        // SAFETY: anonymous private mapping, no file descriptor involved.
        let ptr = unsafe {
            libc::mmap(
                core::ptr::null_mut(),
                map_len,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_PRIVATE | libc::MAP_ANONYMOUS,
                -1,
                0,
            )
        };
        if ptr == libc::MAP_FAILED {
            return Err(JitError::ExecAlloc {
                size: code.len(),
                msg: std::io::Error::last_os_error().to_string(),
            });
        }
        let ptr = ptr.cast::<u8>();

        // SAFETY: the mapping is at least code.len() bytes and writable.
        unsafe {
            core::ptr::copy_nonoverlapping(code.as_ptr(), ptr, code.len());
        }

        // SAFETY: ptr/map_len describe exactly the mapping created above.
        let rc = unsafe { libc::mprotect(ptr.cast::<c_void>(), map_len, libc::PROT_READ | libc::PROT_EXEC) };
        if rc != 0 {
            let err = JitError::ExecAlloc {
                size: code.len(),
                msg: std::io::Error::last_os_error().to_string(),
            };
            // SAFETY: the mapping is still owned by us and unused.
            unsafe {
                libc::munmap(ptr.cast::<c_void>(), map_len);
            }
            return Err(err);
        }

        Ok(Self {
            ptr,
            map_len,
            code_len: code.len(),
        })
    }
}

impl Drop for ExecutableBuffer {
    fn drop(&mut self) {
        // SAFETY: sole owner of the mapping; called exactly once.
        unsafe {
            libc::munmap(self.ptr.cast::<c_void>(), self.map_len);
        }
    }
}

// SAFETY: the mapping is read+execute only after construction; nothing is
// ever written through `ptr` again, so sharing across threads is sound.
unsafe impl Send for ExecutableBuffer {}
unsafe impl Sync for ExecutableBuffer {}

/// A finalized, callable compute kernel.
///
/// The handle exclusively owns its executable memory and releases it when
/// dropped. The generated code is read-only and reentrant: a `Kernel` may be
/// invoked from multiple threads concurrently, provided each invocation is
/// given base pointers whose symbol arrays do not overlap (sharing symbol
/// memory between concurrent calls is the caller's responsibility to avoid).
/// Once invoked, a kernel runs straight through to its return instruction;
/// there is no interrupt point.
pub struct Kernel {
    buf: ExecutableBuffer,
}

impl Kernel {
    /// Finalize a completed instruction stream into a callable kernel.
    ///
    /// # Errors
    ///
    /// Returns [`JitError::ExecAlloc`] when executable memory cannot be
    /// obtained; there is no kernel without it.
    pub(crate) fn finalize(code: &[u8]) -> Result<Self, JitError> {
        Ok(Self {
            buf: ExecutableBuffer::new(code)?,
        })
    }

    /// The raw entry point.
    #[must_use]
    pub fn entry(&self) -> KernelFn {
        // SAFETY: the mapping holds a complete kernel ending in `ret`, and
        // the transmuted signature matches the emitted calling convention.
        unsafe { core::mem::transmute::<*mut u8, KernelFn>(self.buf.ptr) }
    }

    /// Invoke the kernel once.
    ///
    /// # Safety
    ///
    /// The caller must uphold the memory contract baked in at assembly time:
    ///
    /// - `consts` points to a constant pool at least as large as the
    ///   assembler's final constant offset plus one scalar, with each
    ///   constant placed at its resolved offset.
    /// - `syms` points to a symbol-pointer region at least
    ///   `Program::symbol_region_len()` bytes, with a valid 8-byte data
    ///   pointer at each resolved symbol offset.
    /// - Every symbol's data array holds at least one full vector group of
    ///   readable (for `lds`) and writable (for `sts`) memory.
    pub unsafe fn invoke(&self, consts: *const u8, syms: *const u8) {
        // SAFETY: upheld by the caller per the contract above.
        unsafe { (self.entry())(consts, syms) }
    }

    /// Size of the kernel's machine code in bytes.
    #[must_use]
    pub fn code_size(&self) -> usize {
        self.buf.code_len
    }
}

impl core::fmt::Debug for Kernel {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Kernel")
            .field("code_len", &self.buf.code_len)
            .field("map_len", &self.buf.map_len)
            .finish()
    }
}
