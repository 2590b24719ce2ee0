//! Host-attachment machinery: import-address-table patching and a
//! JMP-trampoline hook built on a small x86/x64 instruction-length
//! decoder, used to redirect the host shell's console-read entry point into
//! the editor kernel.
//!
//! Non-Windows builds compile a stub: every entry point returns
//! [`HookError::UnsupportedPlatform`]. There is no portable equivalent of
//! patching another process's import table or prologue bytes.

mod inst_iter;
#[cfg(windows)]
mod pe;

#[cfg(windows)]
pub use pe::PeInfo;

use thiserror::Error;

/// Failure modes for both hook kinds. A hook failure returns an error;
/// the attaching shim logs it and refuses to initialise.
#[derive(Debug, Error)]
pub enum HookError {
    #[error("import '{0}' not found in target module's IAT")]
    ImportNotFound(String),
    #[error("export '{0}' not found")]
    ExportNotFound(String),
    #[error("failed to decode instruction at hook site")]
    DecodeFailed,
    #[error("relative operand too small to relocate ({0} byte(s))")]
    RelativeTooSmall(u32),
    #[error("trampoline allocator exhausted")]
    TrampolineExhausted,
    #[error("hook engine unsupported on this platform")]
    UnsupportedPlatform,
}

#[cfg(windows)]
mod win {
    use super::{HookError, inst_iter::InstructionIter, pe::PeInfo};
    use std::ffi::CString;
    use std::sync::OnceLock;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use windows_sys::Win32::System::Diagnostics::Debug::FlushInstructionCache;
    use windows_sys::Win32::System::LibraryLoader::LoadLibraryA;
    use windows_sys::Win32::System::Memory::{
        MEM_COMMIT, MEM_RESERVE, PAGE_EXECUTE_READWRITE, VirtualAlloc, VirtualProtect,
    };
    use windows_sys::Win32::System::Threading::GetCurrentProcess;

    const PAGE_SIZE: usize = 4096;
    /// Size of the dedicated trampoline page: a dedicated executable page
    /// rather than bumping into the target module's own `.text` tail.
    const TRAMPOLINE_PAGE_SIZE: usize = 64 * 1024;
    /// Magic value signing the allocator header (ASCII "CLNK" read
    /// little-endian).
    const MAGIC: u32 = 0x4b4e4c43;

    /// Bump allocator for trampoline bodies, carved out of one dedicated
    /// `PAGE_EXECUTE_READWRITE` page allocated on first use and kept for
    /// the process's lifetime (see `DESIGN.md` Open Questions for why this
    /// uses a dedicated page rather than the target module's `.text` tail).
    struct TrampolineAllocator {
        base: *mut u8,
        used: AtomicUsize,
    }

    // SAFETY: `base` points at memory this allocator exclusively owns and
    // bump-allocates from under an atomic cursor; no aliasing mutation.
    unsafe impl Sync for TrampolineAllocator {}

    static ALLOCATOR: OnceLock<TrampolineAllocator> = OnceLock::new();

    fn allocator() -> &'static TrampolineAllocator {
        ALLOCATOR.get_or_init(|| unsafe {
            let base = VirtualAlloc(
                std::ptr::null(),
                TRAMPOLINE_PAGE_SIZE,
                MEM_COMMIT | MEM_RESERVE,
                PAGE_EXECUTE_READWRITE,
            ) as *mut u8;
            assert!(!base.is_null(), "VirtualAlloc for trampoline page failed");
            // Magic header, purely diagnostic (no reuse-detection needed
            // now that every allocator owns its own page) but kept so a
            // memory dump still carries a recognisable signature.
            (base as *mut u32).write(MAGIC);
            TrampolineAllocator {
                base,
                used: AtomicUsize::new(16), // header slot, 16-byte aligned
            }
        })
    }

    impl TrampolineAllocator {
        fn alloc(&self, size: usize) -> Option<*mut u8> {
            let size = (size + 15) & !15;
            loop {
                let used = self.used.load(Ordering::Relaxed);
                let next = used + size;
                if next > TRAMPOLINE_PAGE_SIZE {
                    return None;
                }
                if self
                    .used
                    .compare_exchange(used, next, Ordering::SeqCst, Ordering::Relaxed)
                    .is_ok()
                {
                    return Some(unsafe { self.base.add(used) });
                }
            }
        }
    }

    fn page_of(addr: *const u8) -> *mut std::ffi::c_void {
        let mask = !(PAGE_SIZE - 1);
        ((addr as usize) & mask) as *mut std::ffi::c_void
    }

    /// Toggles a whole page to `protect`, returning the previous
    /// protection so the caller can restore it once done writing.
    fn set_access(page: *mut std::ffi::c_void, protect: u32) -> u32 {
        let mut old = 0u32;
        unsafe {
            VirtualProtect(page, PAGE_SIZE, protect, &mut old);
        }
        old
    }

    fn flush_icache() {
        unsafe {
            FlushInstructionCache(GetCurrentProcess(), std::ptr::null(), 0);
        }
    }

    /// Writes `value` into `*slot`, toggling the containing page writeable
    /// for the duration (a soft lock acquired via page-protection
    /// changes).
    fn write_slot(slot: *mut usize, value: usize) {
        let page = page_of(slot as *const u8);
        let prev = set_access(page, PAGE_EXECUTE_READWRITE);
        unsafe { slot.write_unaligned(value) };
        set_access(page, prev);
        flush_icache();
    }

    fn get_proc_addr(dll: &str, func_name: &str) -> Option<usize> {
        let dll_c = CString::new(dll).ok()?;
        let base = unsafe { LoadLibraryA(dll_c.as_ptr() as *const u8) };
        if base == 0 {
            return None;
        }
        let pe = unsafe { PeInfo::new(base as *mut u8) };
        pe.get_export(func_name).map(|p| p as usize)
    }

    /// IAT hook: locate `base`'s import slot for `(dll, func_name)` — by
    /// name directly when `find_by_name`, otherwise by resolving the
    /// function's address first and matching the slot that currently holds
    /// it — and atomically overwrite it with `hook`. Returns the previous
    /// value; the caller is expected to install that same value into the
    /// engine's own module's IAT for `func_name` so the engine can still
    /// call through to the original, preserving any upstream hook chain.
    pub fn hook_iat(
        base: usize,
        dll: &str,
        func_name: &str,
        hook: usize,
        find_by_name: bool,
    ) -> Result<usize, HookError> {
        let pe = unsafe { PeInfo::new(base as *mut u8) };
        let slot = if find_by_name {
            pe.get_import_by_name(None, func_name)
        } else {
            let func_addr = get_proc_addr(dll, func_name)
                .ok_or_else(|| HookError::ExportNotFound(func_name.to_string()))?;
            pe.get_import_by_addr(None, func_addr)
        }
        .ok_or_else(|| {
            tracing::warn!(target: "hook", func_name, "IAT entry not found");
            HookError::ImportNotFound(func_name.to_string())
        })?;

        let prev = unsafe { slot.read_unaligned() };
        write_slot(slot, hook);
        Ok(prev)
    }

    /// Following an existing `FF 25 disp32`/REX-prefixed jump at `addr`:
    /// re-hooking an already-hooked function should chain onto its
    /// trampoline rather than stomp it.
    fn follow_jump(addr: *const u8) -> *const u8 {
        let bytes = unsafe { std::slice::from_raw_parts(addr, 8) };
        let mut t = 0usize;
        if bytes[0] & 0xf0 == 0x40 {
            t += 1; // REX prefix
        }
        if bytes.get(t).copied() != Some(0xff) || bytes.get(t + 1).copied() != Some(0x25) {
            return addr;
        }
        let imm = i32::from_le_bytes(bytes[t + 2..t + 6].try_into().unwrap());
        #[cfg(target_pointer_width = "64")]
        {
            let rip = unsafe { addr.add(t + 6) };
            let slot = unsafe { rip.offset(imm as isize) } as *const *const u8;
            unsafe { *slot }
        }
        #[cfg(target_pointer_width = "32")]
        {
            (imm as usize) as *const *const u8 as *const u8
        }
    }

    /// Decodes whole instructions forward from `target` until at least 6
    /// bytes are covered (enough room for the `FF 25 disp32` patch),
    /// rejecting decode failures and operands too small to relocate.
    fn decode_prologue(
        target: *const u8,
    ) -> Result<(Vec<crate::inst_iter::Instruction>, usize), HookError> {
        let mut iter = unsafe { InstructionIter::new(target) };
        let mut insts = Vec::new();
        let mut total = 0usize;
        loop {
            let inst = iter.next();
            if !inst.is_valid() {
                tracing::warn!(target: "hook", ?target, "prologue decode failed");
                return Err(HookError::DecodeFailed);
            }
            if inst.is_relative() && inst.rel_size() < 4 {
                tracing::warn!(target: "hook", rel_size = inst.rel_size(), "relative operand too small to relocate");
                return Err(HookError::RelativeTooSmall(inst.rel_size()));
            }
            total += inst.len();
            insts.push(inst);
            if total >= 6 {
                return Ok((insts, total));
            }
            if insts.len() >= 8 {
                tracing::warn!(target: "hook", ?target, "prologue decode exceeded instruction budget");
                return Err(HookError::DecodeFailed);
            }
        }
    }

    /// Builds a trampoline covering `target`'s disassembled prologue plus a
    /// `jmp` back to the instruction after it, then patches `target` itself
    /// with a 6-byte indirect jump through the trampoline's hook slot.
    /// Returns the trampoline's entry address.
    fn hook_jmp_impl(to_hook: usize, hook: usize) -> Result<usize, HookError> {
        let target = follow_jump(to_hook as *const u8);
        let (insts, insts_len) = decode_prologue(target)?;

        // Layout: [hook: usize][relocated prologue][jmp rel32 (5 bytes)].
        let header_size = std::mem::size_of::<usize>();
        let tramp_size = header_size + insts_len + 5;
        let tramp = allocator().alloc(tramp_size).ok_or_else(|| {
            tracing::warn!(target: "hook", tramp_size, "trampoline allocator exhausted");
            HookError::TrampolineExhausted
        })?;

        unsafe { (tramp as *mut usize).write_unaligned(hook) };
        let trampoline_in = unsafe { tramp.add(header_size) };

        let mut read_cursor = target;
        let mut write_cursor = trampoline_in;
        for inst in &insts {
            let len = inst.len();
            let from = unsafe { std::slice::from_raw_parts(read_cursor, len) };
            let to = unsafe { std::slice::from_raw_parts_mut(write_cursor, len) };
            inst.copy(from, to);
            read_cursor = unsafe { read_cursor.add(len) };
            write_cursor = unsafe { write_cursor.add(len) };
        }

        unsafe {
            *write_cursor = 0xe9;
            let disp = (read_cursor as isize) - (write_cursor as isize + 5);
            (write_cursor.add(1) as *mut i32).write_unaligned(disp as i32);
        }

        let page = page_of(target);
        let prev = set_access(page, PAGE_EXECUTE_READWRITE);
        unsafe {
            let w = target as *mut u8;
            *w = 0xff;
            *w.add(1) = 0x25;
            #[cfg(target_pointer_width = "64")]
            {
                let disp = (tramp as isize) - (target as isize) - 6;
                (w.add(2) as *mut i32).write_unaligned(disp as i32);
            }
            #[cfg(target_pointer_width = "32")]
            {
                (w.add(2) as *mut i32).write_unaligned(tramp as i32);
            }
        }
        set_access(page, prev);
        flush_icache();

        Ok(trampoline_in as usize)
    }

    /// Resolves `func_name` as an export of `base` and installs a
    /// JMP-trampoline hook redirecting it to `hook`. Returns the
    /// trampoline's entry point — call through it to reach the original
    /// behavior.
    pub fn hook_jmp(base: usize, func_name: &str, hook: usize) -> Result<usize, HookError> {
        let pe = unsafe { PeInfo::new(base as *mut u8) };
        let func_addr = pe
            .get_export(func_name)
            .ok_or_else(|| HookError::ExportNotFound(func_name.to_string()))?;
        hook_jmp_impl(func_addr as usize, hook)
    }

    /// [`hook_jmp`] against a DLL name instead of an already-loaded base,
    /// loading it first (`LoadLibraryA`) exactly as `get_proc_addr` does for
    /// [`hook_iat`]'s by-address lookup path.
    pub fn hook_jmp_export(dll: &str, func_name: &str, hook: usize) -> Result<usize, HookError> {
        let dll_c = CString::new(dll).map_err(|_| HookError::ExportNotFound(dll.to_string()))?;
        let base = unsafe { LoadLibraryA(dll_c.as_ptr() as *const u8) };
        if base == 0 {
            return Err(HookError::ExportNotFound(dll.to_string()));
        }
        hook_jmp(base as usize, func_name, hook)
    }

    /// `hook_iat` plus a self-chaining step: after patching
    /// `target_base`'s import slot, also patch `self_base`'s own
    /// import slot for the same symbol (if it imports one) with the
    /// previous value, so code in *this* module that calls `func_name`
    /// keeps reaching the real implementation — including any hook chain
    /// already installed upstream of us.
    pub fn hook_iat_chained(
        target_base: usize,
        self_base: usize,
        dll: &str,
        func_name: &str,
        hook: usize,
        find_by_name: bool,
    ) -> Result<usize, HookError> {
        let prev = hook_iat(target_base, dll, func_name, hook, find_by_name)?;
        let self_pe = unsafe { PeInfo::new(self_base as *mut u8) };
        if let Some(slot) = self_pe.get_import_by_name(None, func_name) {
            write_slot(slot, prev);
        }
        Ok(prev)
    }
}

#[cfg(windows)]
pub use win::{hook_iat, hook_iat_chained, hook_jmp, hook_jmp_export};

/// See [`HookError::UnsupportedPlatform`] — no portable equivalent exists.
#[cfg(not(windows))]
pub fn hook_iat(
    _base: usize,
    _dll: &str,
    _func_name: &str,
    _hook: usize,
    _find_by_name: bool,
) -> Result<usize, HookError> {
    Err(HookError::UnsupportedPlatform)
}

/// See [`HookError::UnsupportedPlatform`] — no portable equivalent exists.
#[cfg(not(windows))]
pub fn hook_jmp(_base: usize, _func_name: &str, _hook: usize) -> Result<usize, HookError> {
    Err(HookError::UnsupportedPlatform)
}

/// See [`HookError::UnsupportedPlatform`] — no portable equivalent exists.
#[cfg(not(windows))]
pub fn hook_jmp_export(_dll: &str, _func_name: &str, _hook: usize) -> Result<usize, HookError> {
    Err(HookError::UnsupportedPlatform)
}

/// See [`HookError::UnsupportedPlatform`] — no portable equivalent exists.
#[cfg(not(windows))]
pub fn hook_iat_chained(
    _target_base: usize,
    _self_base: usize,
    _dll: &str,
    _func_name: &str,
    _hook: usize,
    _find_by_name: bool,
) -> Result<usize, HookError> {
    Err(HookError::UnsupportedPlatform)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[cfg(not(windows))]
    #[test]
    fn non_windows_stub_reports_unsupported() {
        assert!(matches!(
            hook_iat(0, "kernel32.dll", "ReadConsoleW", 0, true),
            Err(HookError::UnsupportedPlatform)
        ));
        assert!(matches!(
            hook_jmp(0, "ReadConsoleW", 0),
            Err(HookError::UnsupportedPlatform)
        ));
        assert!(matches!(
            hook_jmp_export("kernel32.dll", "ReadConsoleW", 0),
            Err(HookError::UnsupportedPlatform)
        ));
        assert!(matches!(
            hook_iat_chained(0, 0, "kernel32.dll", "ReadConsoleW", 0, true),
            Err(HookError::UnsupportedPlatform)
        ));
    }
}
