//! Minimal PE import/export table reader: walks a loaded module's
//! headers in this process's own address space to find an IAT slot or an
//! exported function by name.

#![cfg(windows)]

use std::ffi::{CStr, c_char};

/// Reads the `IMAGE_DOS_HEADER`/`IMAGE_NT_HEADERS`/data directories of a PE
/// image already mapped at `base` (as every loaded DLL/EXE is, via
/// `LoadLibrary`/process startup). Every accessor here walks raw memory
/// starting from that base — `unsafe` end to end.
pub struct PeInfo {
    base: *mut u8,
}

#[repr(C)]
struct ImageDosHeader {
    e_magic: u16,
    _reserved: [u16; 29],
    e_lfanew: i32,
}

#[repr(C)]
struct ImageDataDirectory {
    virtual_address: u32,
    size: u32,
}

#[repr(C)]
struct ImageImportDescriptor {
    original_first_thunk: u32,
    time_date_stamp: u32,
    forwarder_chain: u32,
    name: u32,
    first_thunk: u32,
}

#[repr(C)]
struct ImageExportDirectory {
    _characteristics: u32,
    _time_date_stamp: u32,
    _major_version: u16,
    _minor_version: u16,
    _name: u32,
    _base: u32,
    _number_of_functions: u32,
    number_of_names: u32,
    address_of_functions: u32,
    address_of_names: u32,
    address_of_name_ordinals: u32,
}

const IMAGE_DIRECTORY_ENTRY_EXPORT: usize = 0;
const IMAGE_DIRECTORY_ENTRY_IMPORT: usize = 1;

impl PeInfo {
    /// # Safety
    /// `base` must be the base address of a PE image mapped into this
    /// process (e.g. the return of `LoadLibrary`/`GetModuleHandle`).
    pub unsafe fn new(base: *mut u8) -> Self {
        Self { base }
    }

    fn rva_to_addr(&self, rva: u32) -> *mut u8 {
        unsafe { self.base.add(rva as usize) }
    }

    /// Follows `e_lfanew` past the DOS stub to the PE32(+) header. Offsets
    /// of the fields this module actually reads (`Magic`, `DataDirectory`)
    /// differ between PE32 and PE32+, so field access goes through small
    /// hand-computed offsets rather than a shared struct layout.
    fn nt_headers(&self) -> *mut u8 {
        let dos = self.base as *const ImageDosHeader;
        let e_lfanew = unsafe { (*dos).e_lfanew };
        unsafe { self.base.add(e_lfanew as usize) }
    }

    /// `IMAGE_NT_HEADERS.OptionalHeader.DataDirectory[index]`. The
    /// `OptionalHeader` starts after the 4-byte signature and 20-byte
    /// `IMAGE_FILE_HEADER`, then the `Magic` field (`0x10b` = PE32,
    /// `0x20b` = PE32+) selects which fixed-size prefix to skip before the
    /// 16-entry `DataDirectory` array.
    fn data_directory(&self, index: usize) -> Option<(*mut u8, u32)> {
        let nt = self.nt_headers();
        let optional_header = unsafe { nt.add(4 + 20) };
        let magic = unsafe { *(optional_header as *const u16) };
        let data_dir_offset = if magic == 0x20b {
            112 // PE32+
        } else {
            96 // PE32
        };
        let dirs = unsafe { optional_header.add(data_dir_offset) as *const ImageDataDirectory };
        let entry = unsafe { &*dirs.add(index) };
        if entry.virtual_address == 0 {
            return None;
        }
        Some((self.rva_to_addr(entry.virtual_address), entry.size))
    }

    /// Walks every import descriptor (optionally restricted to `dll`),
    /// returning the first IAT slot `lookup` accepts.
    fn iterate_imports(
        &self,
        dll: Option<&str>,
        mut lookup: impl FnMut(&ImageImportDescriptor) -> Option<*mut usize>,
    ) -> Option<*mut usize> {
        let (dir, _) = self.data_directory(IMAGE_DIRECTORY_ENTRY_IMPORT)?;
        let mut iid = dir as *const ImageImportDescriptor;
        loop {
            let desc = unsafe { &*iid };
            if desc.name == 0 {
                return None;
            }

            let matches_dll = match dll {
                None => true,
                Some(want) => {
                    let name_ptr = self.rva_to_addr(desc.name) as *const c_char;
                    let name = unsafe { CStr::from_ptr(name_ptr) }.to_string_lossy();
                    name.len() >= want.len() && name[..want.len()].eq_ignore_ascii_case(want)
                }
            };

            if matches_dll {
                if let Some(slot) = lookup(desc) {
                    return Some(slot);
                }
            }

            iid = unsafe { iid.add(1) };
        }
    }

    /// Finds the IAT slot for `func_name` imported from `dll` (or any DLL,
    /// if `dll` is `None`) via the import name table (`OriginalFirstThunk`).
    pub fn get_import_by_name(&self, dll: Option<&str>, func_name: &str) -> Option<*mut usize> {
        self.iterate_imports(dll, |desc| {
            let mut thunk = self.rva_to_addr(desc.first_thunk) as *mut usize;
            let mut name_thunk = self.rva_to_addr(desc.original_first_thunk) as *const isize;
            loop {
                let at = unsafe { *thunk };
                let nt = unsafe { *name_thunk };
                if at == 0 || nt == 0 {
                    return None;
                }
                if nt > 0 {
                    let rva = (nt & 0x7fff_ffff) as u32;
                    // IMAGE_IMPORT_BY_NAME: u16 Hint, then a NUL-terminated name.
                    let name_ptr = unsafe { self.rva_to_addr(rva).add(2) } as *const c_char;
                    let name = unsafe { CStr::from_ptr(name_ptr) }.to_string_lossy();
                    if name.eq_ignore_ascii_case(func_name) {
                        return Some(thunk);
                    }
                }
                thunk = unsafe { thunk.add(1) };
                name_thunk = unsafe { name_thunk.add(1) };
            }
        })
    }

    /// Finds the IAT slot currently holding `func_addr`.
    pub fn get_import_by_addr(&self, dll: Option<&str>, func_addr: usize) -> Option<*mut usize> {
        self.iterate_imports(dll, |desc| {
            let mut thunk = self.rva_to_addr(desc.first_thunk) as *mut usize;
            loop {
                let at = unsafe { *thunk };
                if at == 0 {
                    return None;
                }
                if at == func_addr {
                    return Some(thunk);
                }
                thunk = unsafe { thunk.add(1) };
            }
        })
    }

    /// Resolves an exported function by name via the module's own export
    /// directory (used to look a function up in a library we've loaded
    /// ourselves, e.g. `kernel32.dll`).
    pub fn get_export(&self, func_name: &str) -> Option<*mut u8> {
        let (dir, _) = self.data_directory(IMAGE_DIRECTORY_ENTRY_EXPORT)?;
        let ied = dir as *const ImageExportDirectory;
        let ied = unsafe { &*ied };

        let names = self.rva_to_addr(ied.address_of_names) as *const u32;
        let ordinals = self.rva_to_addr(ied.address_of_name_ordinals) as *const u16;
        let addresses = self.rva_to_addr(ied.address_of_functions) as *const u32;

        for i in 0..ied.number_of_names as isize {
            let name_rva = unsafe { *names.offset(i) };
            let name_ptr = self.rva_to_addr(name_rva) as *const c_char;
            let name = unsafe { CStr::from_ptr(name_ptr) }.to_string_lossy();
            if !name.eq_ignore_ascii_case(func_name) {
                continue;
            }
            let ordinal = unsafe { *ordinals.offset(i) };
            let func_rva = unsafe { *addresses.offset(ordinal as isize) };
            return Some(self.rva_to_addr(func_rva));
        }

        None
    }
}
