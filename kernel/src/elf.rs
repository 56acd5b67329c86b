//! ELF64 Loader
//!
//! Validates, maps and relocates ELF binaries. Executables (ET_EXEC,
//! ET_DYN) are mapped into a single zero-initialised buffer spanning
//! their PT_LOAD segments. Relocatable objects (ET_REL) get their
//! ALLOC sections placed behind an aligning cursor and their RELA
//! entries applied, resolving undefined symbols through a
//! caller-supplied resolver (the kernel symbol store for modules).

use alloc::string::{String, ToString};
use alloc::vec::Vec;
use core::alloc::Layout;

/// ELF magic number
const ELF_MAGIC: [u8; 4] = [0x7F, b'E', b'L', b'F'];

/// ELF class: 64-bit
const ELFCLASS64: u8 = 2;

/// ELF data encoding: little endian
const ELFDATA2LSB: u8 = 1;

/// Object file types
const ET_REL: u16 = 1;
const ET_EXEC: u16 = 2;
const ET_DYN: u16 = 3;

/// Machine type: x86_64
const EM_X86_64: u16 = 62;

/// Program header types
const PT_LOAD: u32 = 1;

/// Section header types
const SHT_PROGBITS: u32 = 1;
const SHT_SYMTAB: u32 = 2;
const SHT_STRTAB: u32 = 3;
const SHT_RELA: u32 = 4;
const SHT_NOBITS: u32 = 8;

/// Section flag: occupies memory at runtime
const SHF_ALLOC: u64 = 0x2;

/// x86_64 relocation types
const R_X86_64_64: u32 = 1;
const R_X86_64_PC32: u32 = 2;
const R_X86_64_PLT32: u32 = 4;
const R_X86_64_32: u32 = 10;
const R_X86_64_32S: u32 = 11;

/// Alignment of image allocations
const IMAGE_ALIGN: usize = 4096;

/// ELF64 file header
#[repr(C)]
#[derive(Clone, Copy, Debug)]
pub struct Elf64Header {
    pub e_ident: [u8; 16],
    pub e_type: u16,
    pub e_machine: u16,
    pub e_version: u32,
    pub e_entry: u64,
    pub e_phoff: u64,
    pub e_shoff: u64,
    pub e_flags: u32,
    pub e_ehsize: u16,
    pub e_phentsize: u16,
    pub e_phnum: u16,
    pub e_shentsize: u16,
    pub e_shnum: u16,
    pub e_shstrndx: u16,
}

/// ELF64 program header
#[repr(C)]
#[derive(Clone, Copy, Debug)]
pub struct Elf64Phdr {
    pub p_type: u32,
    pub p_flags: u32,
    pub p_offset: u64,
    pub p_vaddr: u64,
    pub p_paddr: u64,
    pub p_filesz: u64,
    pub p_memsz: u64,
    pub p_align: u64,
}

/// ELF64 section header
#[repr(C)]
#[derive(Clone, Copy, Debug)]
pub struct Elf64Shdr {
    pub sh_name: u32,
    pub sh_type: u32,
    pub sh_flags: u64,
    pub sh_addr: u64,
    pub sh_offset: u64,
    pub sh_size: u64,
    pub sh_link: u32,
    pub sh_info: u32,
    pub sh_addralign: u64,
    pub sh_entsize: u64,
}

/// ELF64 symbol table entry
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Elf64Sym {
    pub st_name: u32,
    pub st_info: u8,
    pub st_other: u8,
    pub st_shndx: u16,
    pub st_value: u64,
    pub st_size: u64,
}

/// ELF64 relocation entry with addend
#[repr(C)]
#[derive(Clone, Copy, Debug)]
pub struct Elf64Rela {
    pub r_offset: u64,
    pub r_info: u64,
    pub r_addend: i64,
}

impl Elf64Rela {
    pub fn symbol(&self) -> u32 {
        (self.r_info >> 32) as u32
    }

    pub fn reloc_type(&self) -> u32 {
        (self.r_info & 0xFFFF_FFFF) as u32
    }
}

/// ELF loading errors
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ElfError {
    /// Not an ELF file, or structurally broken
    Invalid,
    /// Valid ELF we cannot load (class, endianness, machine, type)
    Unsupported,
    /// Allocation failure while mapping
    OutOfMemory,
    /// An undefined symbol had no provider
    UnresolvedSymbol,
    /// Execute called on an image with no entry point
    NoEntry,
}

pub type ElfResult<T> = Result<T, ElfError>;

/// Module lifecycle hook signatures
pub type ModuleInitFn = extern "C" fn() -> i32;
pub type ModuleCleanupFn = extern "C" fn();

/// A binary mapped into kernel memory.
///
/// For relocatable objects the retained symbol table has its values
/// rewritten to runtime addresses, so `find_symbol` answers with
/// callable pointers.
#[derive(Debug, PartialEq)]
pub struct LoadedImage {
    base: *mut u8,
    size: usize,
    pub entry: u64,
    pub init_fn: Option<ModuleInitFn>,
    pub cleanup_fn: Option<ModuleCleanupFn>,
    symtab: Vec<Elf64Sym>,
    strtab: Vec<u8>,
    pub name: String,
}

// Image memory is owned exclusively by this struct.
unsafe impl Send for LoadedImage {}

impl LoadedImage {
    pub fn base(&self) -> u64 {
        self.base as u64
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn symbol_count(&self) -> usize {
        self.symtab.len()
    }
}

impl Drop for LoadedImage {
    fn drop(&mut self) {
        if !self.base.is_null() {
            unsafe {
                alloc::alloc::dealloc(
                    self.base,
                    Layout::from_size_align_unchecked(self.size, IMAGE_ALIGN),
                );
            }
            self.base = core::ptr::null_mut();
        }
    }
}

/// Copy a `#[repr(C)]` structure out of the byte stream.
fn read_struct<T: Copy>(data: &[u8], offset: usize) -> Option<T> {
    let size = core::mem::size_of::<T>();
    if offset.checked_add(size)? > data.len() {
        return None;
    }
    Some(unsafe { core::ptr::read_unaligned(data.as_ptr().add(offset) as *const T) })
}

fn header(data: &[u8]) -> ElfResult<Elf64Header> {
    read_struct::<Elf64Header>(data, 0).ok_or(ElfError::Invalid)
}

fn phdr(data: &[u8], header: &Elf64Header, index: usize) -> ElfResult<Elf64Phdr> {
    let offset = header.e_phoff as usize + index * header.e_phentsize as usize;
    read_struct(data, offset).ok_or(ElfError::Invalid)
}

fn shdr(data: &[u8], header: &Elf64Header, index: usize) -> ElfResult<Elf64Shdr> {
    let offset = header.e_shoff as usize + index * header.e_shentsize as usize;
    read_struct(data, offset).ok_or(ElfError::Invalid)
}

/// NUL-terminated name at `offset` in a string table.
fn str_at(strtab: &[u8], offset: usize) -> &str {
    if offset >= strtab.len() {
        return "";
    }
    let tail = &strtab[offset..];
    let end = tail.iter().position(|&b| b == 0).unwrap_or(tail.len());
    core::str::from_utf8(&tail[..end]).unwrap_or("")
}

/// Check that `data` is an ELF binary this kernel can load:
/// 64-bit, little-endian, x86_64.
pub fn validate(data: &[u8]) -> ElfResult<()> {
    let hdr = header(data)?;

    if hdr.e_ident[0..4] != ELF_MAGIC {
        return Err(ElfError::Invalid);
    }
    if hdr.e_ident[4] != ELFCLASS64 {
        return Err(ElfError::Unsupported);
    }
    if hdr.e_ident[5] != ELFDATA2LSB {
        return Err(ElfError::Unsupported);
    }
    if hdr.e_machine != EM_X86_64 {
        return Err(ElfError::Unsupported);
    }

    Ok(())
}

fn image_alloc(size: usize) -> ElfResult<*mut u8> {
    if size == 0 {
        return Err(ElfError::Invalid);
    }
    let layout =
        Layout::from_size_align(size, IMAGE_ALIGN).map_err(|_| ElfError::OutOfMemory)?;
    let base = unsafe { alloc::alloc::alloc_zeroed(layout) };
    if base.is_null() {
        return Err(ElfError::OutOfMemory);
    }
    Ok(base)
}

unsafe fn image_free(base: *mut u8, size: usize) {
    alloc::alloc::dealloc(base, Layout::from_size_align_unchecked(size, IMAGE_ALIGN));
}

/// Map an executable (ET_EXEC or ET_DYN; both are copied to a fresh
/// buffer with the same span arithmetic, so a position-dependent
/// binary must tolerate running at the load address).
pub fn load_executable(data: &[u8]) -> ElfResult<LoadedImage> {
    validate(data)?;
    let hdr = header(data)?;

    if hdr.e_type != ET_EXEC && hdr.e_type != ET_DYN {
        return Err(ElfError::Unsupported);
    }

    // Virtual address span across all loadable segments
    let mut min_vaddr = u64::MAX;
    let mut max_vaddr = 0u64;
    for i in 0..hdr.e_phnum as usize {
        let ph = phdr(data, &hdr, i)?;
        if ph.p_type != PT_LOAD {
            continue;
        }
        let end = ph.p_vaddr.checked_add(ph.p_memsz).ok_or(ElfError::Invalid)?;
        min_vaddr = min_vaddr.min(ph.p_vaddr);
        max_vaddr = max_vaddr.max(end);
    }
    if min_vaddr == u64::MAX || max_vaddr <= min_vaddr {
        return Err(ElfError::Invalid);
    }

    let total_size = (max_vaddr - min_vaddr) as usize;
    let base = image_alloc(total_size)?;

    // Copy segment file contents; the BSS tail stays zero
    for i in 0..hdr.e_phnum as usize {
        let ph = phdr(data, &hdr, i)?;
        if ph.p_type != PT_LOAD || ph.p_filesz == 0 {
            continue;
        }

        let file_offset = ph.p_offset as usize;
        let file_size = ph.p_filesz as usize;
        if file_offset + file_size > data.len() || ph.p_memsz < ph.p_filesz {
            unsafe { image_free(base, total_size) };
            return Err(ElfError::Invalid);
        }

        unsafe {
            core::ptr::copy_nonoverlapping(
                data.as_ptr().add(file_offset),
                base.add((ph.p_vaddr - min_vaddr) as usize),
                file_size,
            );
        }
    }

    let mut image = LoadedImage {
        base,
        size: total_size,
        entry: (base as u64).wrapping_add(hdr.e_entry.wrapping_sub(min_vaddr)),
        init_fn: None,
        cleanup_fn: None,
        symtab: Vec::new(),
        strtab: Vec::new(),
        name: "executable".to_string(),
    };

    // Keep the symbol table around for name lookups when present
    for i in 0..hdr.e_shnum as usize {
        let sh = shdr(data, &hdr, i)?;
        if sh.sh_type != SHT_SYMTAB {
            continue;
        }
        if let Some((syms, strtab)) = read_symbols(data, &hdr, &sh) {
            image.symtab = syms;
            image.strtab = strtab;
        }
        break;
    }

    log_debug!(
        "[ELF] mapped executable: {} bytes at {:#x}, entry {:#x}",
        total_size,
        base as u64,
        image.entry
    );

    Ok(image)
}

/// Pull a symbol table and its linked string table out of the file.
fn read_symbols(
    data: &[u8],
    hdr: &Elf64Header,
    symtab_shdr: &Elf64Shdr,
) -> Option<(Vec<Elf64Sym>, Vec<u8>)> {
    let count = symtab_shdr.sh_size as usize / core::mem::size_of::<Elf64Sym>();
    let mut syms = Vec::with_capacity(count);
    for i in 0..count {
        let sym: Elf64Sym = read_struct(
            data,
            symtab_shdr.sh_offset as usize + i * core::mem::size_of::<Elf64Sym>(),
        )?;
        syms.push(sym);
    }

    let str_shdr = shdr(data, hdr, symtab_shdr.sh_link as usize).ok()?;
    let start = str_shdr.sh_offset as usize;
    let end = start.checked_add(str_shdr.sh_size as usize)?;
    if end > data.len() {
        return None;
    }

    Some((syms, data[start..end].to_vec()))
}

/// Load a relocatable object, resolving undefined symbols through
/// `resolver`. Used by the module subsystem.
pub fn load_module(
    data: &[u8],
    resolver: &dyn Fn(&str) -> Option<u64>,
) -> ElfResult<LoadedImage> {
    validate(data)?;
    let hdr = header(data)?;

    if hdr.e_type != ET_REL {
        return Err(ElfError::Unsupported);
    }

    let shnum = hdr.e_shnum as usize;

    // Pass 1: size of all ALLOC sections, respecting their alignment
    let mut total_size: u64 = 0;
    for i in 0..shnum {
        let sh = shdr(data, &hdr, i)?;
        if sh.sh_flags & SHF_ALLOC == 0 {
            continue;
        }
        let align = sh.sh_addralign.clamp(1, IMAGE_ALIGN as u64);
        total_size = (total_size + align - 1) & !(align - 1);
        total_size += sh.sh_size;
    }
    if total_size == 0 {
        return Err(ElfError::Invalid);
    }

    // Over-allocate by the largest alignment seen so the cursor can
    // always round up inside the buffer
    let base = image_alloc(total_size as usize + IMAGE_ALIGN)?;
    let alloc_size = total_size as usize + IMAGE_ALIGN;

    // Pass 2: place sections and copy their bytes
    let mut section_addrs: Vec<u64> = alloc::vec![0; shnum];
    let mut cursor = base as u64;
    for i in 0..shnum {
        let sh = shdr(data, &hdr, i)?;
        if sh.sh_flags & SHF_ALLOC == 0 {
            continue;
        }

        let align = sh.sh_addralign.clamp(1, IMAGE_ALIGN as u64);
        cursor = (cursor + align - 1) & !(align - 1);
        section_addrs[i] = cursor;

        if sh.sh_type != SHT_NOBITS {
            let start = sh.sh_offset as usize;
            let size = sh.sh_size as usize;
            if start + size > data.len() {
                unsafe { image_free(base, alloc_size) };
                return Err(ElfError::Invalid);
            }
            unsafe {
                core::ptr::copy_nonoverlapping(
                    data.as_ptr().add(start),
                    cursor as *mut u8,
                    size,
                );
            }
        }

        cursor += sh.sh_size;
    }

    // Symbol and string tables
    let mut symbols: Option<(Vec<Elf64Sym>, Vec<u8>)> = None;
    for i in 0..shnum {
        let sh = shdr(data, &hdr, i)?;
        if sh.sh_type == SHT_SYMTAB {
            symbols = read_symbols(data, &hdr, &sh);
            break;
        }
    }
    let (syms, strtab) = match symbols {
        Some(s) => s,
        None => {
            unsafe { image_free(base, alloc_size) };
            return Err(ElfError::Invalid);
        }
    };

    // Pass 3: apply RELA relocations against ALLOC'd targets
    for i in 0..shnum {
        let sh = shdr(data, &hdr, i)?;
        if sh.sh_type != SHT_RELA {
            continue;
        }

        if sh.sh_info as usize >= shnum {
            continue;
        }
        let target = shdr(data, &hdr, sh.sh_info as usize)?;
        if target.sh_flags & SHF_ALLOC == 0 {
            continue;
        }
        let target_base = section_addrs[sh.sh_info as usize];

        let count = sh.sh_size as usize / core::mem::size_of::<Elf64Rela>();
        for j in 0..count {
            let rela: Elf64Rela = match read_struct(
                data,
                sh.sh_offset as usize + j * core::mem::size_of::<Elf64Rela>(),
            ) {
                Some(r) => r,
                None => {
                    unsafe { image_free(base, alloc_size) };
                    return Err(ElfError::Invalid);
                }
            };

            let sym = match syms.get(rela.symbol() as usize) {
                Some(s) => *s,
                None => {
                    unsafe { image_free(base, alloc_size) };
                    return Err(ElfError::Invalid);
                }
            };

            let sym_value = if sym.st_shndx == 0 {
                // Undefined: resolve against the kernel symbol store
                let name = str_at(&strtab, sym.st_name as usize);
                match resolver(name) {
                    Some(addr) => addr,
                    None => {
                        log_error!("[ELF] undefined symbol: {}", name);
                        unsafe { image_free(base, alloc_size) };
                        return Err(ElfError::UnresolvedSymbol);
                    }
                }
            } else if (sym.st_shndx as usize) < shnum {
                section_addrs[sym.st_shndx as usize] + sym.st_value
            } else {
                // Absolute or special section index
                sym.st_value
            };

            let target_addr = target_base + rela.r_offset;
            unsafe {
                apply_relocation(rela.reloc_type(), target_addr, sym_value, rela.r_addend);
            }
        }
    }

    // Lifecycle hooks by well-known name
    let mut init_fn: Option<ModuleInitFn> = None;
    let mut cleanup_fn: Option<ModuleCleanupFn> = None;
    for sym in &syms {
        if sym.st_shndx == 0 || sym.st_shndx as usize >= shnum {
            continue;
        }
        let name = str_at(&strtab, sym.st_name as usize);
        let addr = section_addrs[sym.st_shndx as usize] + sym.st_value;
        match name {
            "module_init" | "init_module" => {
                init_fn = Some(unsafe { core::mem::transmute::<u64, ModuleInitFn>(addr) });
            }
            "module_cleanup" | "cleanup_module" => {
                cleanup_fn =
                    Some(unsafe { core::mem::transmute::<u64, ModuleCleanupFn>(addr) });
            }
            _ => {}
        }
    }

    // Retain the tables with symbol values rewritten to runtime
    // addresses for later find_symbol queries
    let mut runtime_syms = syms;
    for sym in runtime_syms.iter_mut() {
        if sym.st_shndx != 0 && (sym.st_shndx as usize) < shnum {
            sym.st_value += section_addrs[sym.st_shndx as usize];
        }
    }

    log_debug!(
        "[ELF] loaded relocatable object: {} bytes at {:#x}",
        total_size,
        base as u64
    );

    Ok(LoadedImage {
        base,
        size: alloc_size,
        entry: 0,
        init_fn,
        cleanup_fn,
        symtab: runtime_syms,
        strtab,
        name: "module".to_string(),
    })
}

/// Patch one relocation site.
///
/// # Safety
/// `target` must point into a live, writable image allocation.
unsafe fn apply_relocation(reloc_type: u32, target: u64, symbol: u64, addend: i64) {
    match reloc_type {
        R_X86_64_64 => {
            let value = symbol.wrapping_add(addend as u64);
            (target as *mut u64).write_unaligned(value);
        }
        R_X86_64_PC32 | R_X86_64_PLT32 => {
            let value = (symbol as i64)
                .wrapping_add(addend)
                .wrapping_sub(target as i64) as i32;
            (target as *mut i32).write_unaligned(value);
        }
        R_X86_64_32 => {
            let value = symbol.wrapping_add(addend as u64) as u32;
            (target as *mut u32).write_unaligned(value);
        }
        R_X86_64_32S => {
            let value = (symbol as i64).wrapping_add(addend) as i32;
            (target as *mut i32).write_unaligned(value);
        }
        other => {
            log_warn!("[ELF] skipping unknown relocation type {}", other);
        }
    }
}

/// Release an image's memory and table copies.
pub fn unload(image: LoadedImage) {
    drop(image);
}

/// Runtime address of `name` inside a loaded image, if defined.
pub fn find_symbol(image: &LoadedImage, name: &str) -> Option<u64> {
    for sym in &image.symtab {
        if str_at(&image.strtab, sym.st_name as usize) == name {
            return Some(sym.st_value);
        }
    }
    None
}

/// Run a loaded executable: `entry(argc, argv, envp)` with the
/// program name prepended to `args` and an empty environment.
pub fn execute(image: &LoadedImage, program: &str, args: &[&str]) -> ElfResult<i32> {
    if image.entry == 0 {
        return Err(ElfError::NoEntry);
    }

    let mut arg_storage: Vec<Vec<u8>> = Vec::with_capacity(args.len() + 1);
    let mut push_arg = |s: &str| {
        let mut bytes = s.as_bytes().to_vec();
        bytes.push(0);
        arg_storage.push(bytes);
    };
    push_arg(program);
    for arg in args {
        push_arg(arg);
    }

    let mut argv: Vec<*const u8> = arg_storage.iter().map(|a| a.as_ptr()).collect();
    argv.push(core::ptr::null());
    let envp: [*const u8; 1] = [core::ptr::null()];

    type EntryFn = extern "C" fn(i32, *const *const u8, *const *const u8) -> i32;
    let entry: EntryFn = unsafe { core::mem::transmute(image.entry) };

    log_debug!("[ELF] executing {} at {:#x}", program, image.entry);
    Ok(entry(
        arg_storage.len() as i32,
        argv.as_ptr(),
        envp.as_ptr(),
    ))
}

#[cfg(test)]
pub(crate) mod testutil {
    use super::*;
    use alloc::vec;

    pub fn bytes_of<T: Copy>(value: &T) -> Vec<u8> {
        unsafe {
            core::slice::from_raw_parts(
                value as *const T as *const u8,
                core::mem::size_of::<T>(),
            )
        }
        .to_vec()
    }

    pub fn base_header(e_type: u16) -> Elf64Header {
        let mut ident = [0u8; 16];
        ident[0..4].copy_from_slice(&ELF_MAGIC);
        ident[4] = ELFCLASS64;
        ident[5] = ELFDATA2LSB;
        ident[6] = 1; // EV_CURRENT
        Elf64Header {
            e_ident: ident,
            e_type,
            e_machine: EM_X86_64,
            e_version: 1,
            e_entry: 0,
            e_phoff: 0,
            e_shoff: 0,
            e_flags: 0,
            e_ehsize: 64,
            e_phentsize: 56,
            e_phnum: 0,
            e_shentsize: 64,
            e_shnum: 0,
            e_shstrndx: 0,
        }
    }

    /// Builds an ET_REL object with one ALLOC .text section, a symbol
    /// table {null, defined "local_fn" (index 1), undefined
    /// `undef_name` (index 2), optional "module_init"} and RELA
    /// entries against .text.
    pub fn build_rel_object(with_init: bool, undef_name: &str, relas: &[Elf64Rela]) -> Vec<u8> {
        let text: [u8; 32] = [0x90; 32];

        let mut strtab: Vec<u8> = vec![0];
        let local_off = strtab.len() as u32;
        strtab.extend_from_slice(b"local_fn\0");
        let kmalloc_off = strtab.len() as u32;
        strtab.extend_from_slice(undef_name.as_bytes());
        strtab.push(0);
        let init_off = strtab.len() as u32;
        if with_init {
            strtab.extend_from_slice(b"module_init\0");
        }

        let mut syms = vec![
            Elf64Sym {
                st_name: 0,
                st_info: 0,
                st_other: 0,
                st_shndx: 0,
                st_value: 0,
                st_size: 0,
            },
            Elf64Sym {
                st_name: local_off,
                st_info: 0x12, // GLOBAL FUNC
                st_other: 0,
                st_shndx: 1,
                st_value: 8,
                st_size: 0,
            },
            Elf64Sym {
                st_name: kmalloc_off,
                st_info: 0x10, // GLOBAL NOTYPE, undefined
                st_other: 0,
                st_shndx: 0,
                st_value: 0,
                st_size: 0,
            },
        ];
        if with_init {
            syms.push(Elf64Sym {
                st_name: init_off,
                st_info: 0x12,
                st_other: 0,
                st_shndx: 1,
                st_value: 0,
                st_size: 0,
            });
        }

        // File layout: header, .text, symtab, strtab, rela, shdrs
        let mut hdr = base_header(ET_REL);
        let text_off = 64usize;
        let symtab_off = text_off + text.len();
        let strtab_off = symtab_off + syms.len() * 24;
        let rela_off = strtab_off + strtab.len();
        let shoff = rela_off + relas.len() * 24;

        hdr.e_shoff = shoff as u64;
        hdr.e_shnum = 5;
        hdr.e_shstrndx = 0;

        let shdrs = [
            // [0] null
            Elf64Shdr {
                sh_name: 0,
                sh_type: 0,
                sh_flags: 0,
                sh_addr: 0,
                sh_offset: 0,
                sh_size: 0,
                sh_link: 0,
                sh_info: 0,
                sh_addralign: 0,
                sh_entsize: 0,
            },
            // [1] .text
            Elf64Shdr {
                sh_name: 0,
                sh_type: SHT_PROGBITS,
                sh_flags: SHF_ALLOC,
                sh_addr: 0,
                sh_offset: text_off as u64,
                sh_size: text.len() as u64,
                sh_link: 0,
                sh_info: 0,
                sh_addralign: 16,
                sh_entsize: 0,
            },
            // [2] .symtab
            Elf64Shdr {
                sh_name: 0,
                sh_type: SHT_SYMTAB,
                sh_flags: 0,
                sh_addr: 0,
                sh_offset: symtab_off as u64,
                sh_size: (syms.len() * 24) as u64,
                sh_link: 3,
                sh_info: 1,
                sh_addralign: 8,
                sh_entsize: 24,
            },
            // [3] .strtab
            Elf64Shdr {
                sh_name: 0,
                sh_type: SHT_STRTAB,
                sh_flags: 0,
                sh_addr: 0,
                sh_offset: strtab_off as u64,
                sh_size: strtab.len() as u64,
                sh_link: 0,
                sh_info: 0,
                sh_addralign: 1,
                sh_entsize: 0,
            },
            // [4] .rela.text
            Elf64Shdr {
                sh_name: 0,
                sh_type: SHT_RELA,
                sh_flags: 0,
                sh_addr: 0,
                sh_offset: rela_off as u64,
                sh_size: (relas.len() * 24) as u64,
                sh_link: 2,
                sh_info: 1,
                sh_addralign: 8,
                sh_entsize: 24,
            },
        ];

        let mut file = bytes_of(&hdr);
        file.extend_from_slice(&text);
        for sym in &syms {
            file.extend_from_slice(&bytes_of(sym));
        }
        file.extend_from_slice(&strtab);
        for rela in relas {
            file.extend_from_slice(&bytes_of(rela));
        }
        for sh in &shdrs {
            file.extend_from_slice(&bytes_of(sh));
        }

        assert_eq!(file.len(), shoff + 5 * 64);
        file
    }
}

#[cfg(test)]
mod tests {
    use super::testutil::*;
    use super::*;

    fn build_rel(with_init: bool, relas: &[Elf64Rela]) -> Vec<u8> {
        build_rel_object(with_init, "kmalloc", relas)
    }

    #[test]
    fn validate_rejects_short_and_foreign_binaries() {
        assert_eq!(validate(&[0x7F, b'E', b'L']), Err(ElfError::Invalid));

        let mut hdr = base_header(ET_EXEC);
        hdr.e_ident[0] = 0;
        assert_eq!(validate(&bytes_of(&hdr)), Err(ElfError::Invalid));

        let mut hdr = base_header(ET_EXEC);
        hdr.e_ident[4] = 1; // 32-bit
        assert_eq!(validate(&bytes_of(&hdr)), Err(ElfError::Unsupported));

        let mut hdr = base_header(ET_EXEC);
        hdr.e_ident[5] = 2; // big endian
        assert_eq!(validate(&bytes_of(&hdr)), Err(ElfError::Unsupported));

        let mut hdr = base_header(ET_EXEC);
        hdr.e_machine = 183; // aarch64
        assert_eq!(validate(&bytes_of(&hdr)), Err(ElfError::Unsupported));

        assert_eq!(validate(&bytes_of(&base_header(ET_EXEC))), Ok(()));
    }

    #[test]
    fn executable_segments_and_entry() {
        let payload: [u8; 8] = [1, 2, 3, 4, 5, 6, 7, 8];

        let mut hdr = base_header(ET_EXEC);
        hdr.e_phoff = 64;
        hdr.e_phnum = 1;
        hdr.e_entry = 0x40_0004;

        let ph = Elf64Phdr {
            p_type: PT_LOAD,
            p_flags: 5,
            p_offset: 120,
            p_vaddr: 0x40_0000,
            p_paddr: 0x40_0000,
            p_filesz: payload.len() as u64,
            p_memsz: 32, // 24-byte BSS tail
            p_align: 0x1000,
        };

        let mut file = bytes_of(&hdr);
        file.extend_from_slice(&bytes_of(&ph));
        file.extend_from_slice(&payload);

        let image = load_executable(&file).unwrap();
        assert_eq!(image.size(), 32);
        assert_eq!(image.entry, image.base() + 4);

        unsafe {
            let mapped = core::slice::from_raw_parts(image.base() as *const u8, 32);
            assert_eq!(&mapped[..8], &payload);
            assert!(mapped[8..].iter().all(|&b| b == 0), "BSS must be zero");
        }
    }

    #[test]
    fn executable_rejects_wrong_type() {
        let file = build_rel(false, &[]);
        assert_eq!(load_executable(&file), Err(ElfError::Unsupported));
    }

    #[test]
    fn module_relocation_arithmetic() {
        let kmalloc_addr: u64 = 0x0012_3456;
        let relas = [
            // call-site style PC32 against undefined kmalloc
            Elf64Rela {
                r_offset: 4,
                r_info: (2u64 << 32) | R_X86_64_PC32 as u64,
                r_addend: -4,
            },
            // absolute pointer to the local symbol
            Elf64Rela {
                r_offset: 16,
                r_info: (1u64 << 32) | R_X86_64_64 as u64,
                r_addend: 0,
            },
        ];
        let file = build_rel(false, &relas);

        let resolver = |name: &str| (name == "kmalloc").then_some(kmalloc_addr);
        let image = load_module(&file, &resolver).unwrap();

        let text_base = find_symbol(&image, "local_fn").unwrap() - 8;

        unsafe {
            let site = (text_base + 4) as *const i32;
            let expected = (kmalloc_addr as i64)
                .wrapping_sub(4)
                .wrapping_sub((text_base + 4) as i64);
            assert_eq!(site.read_unaligned(), expected as i32);

            let ptr_site = (text_base + 16) as *const u64;
            assert_eq!(ptr_site.read_unaligned(), text_base + 8);
        }
    }

    #[test]
    fn module_symbols_are_rewritten_to_runtime_addresses() {
        let file = build_rel(true, &[]);
        let image = load_module(&file, &|_| None).unwrap();

        let local = find_symbol(&image, "local_fn").unwrap();
        assert_eq!(local - 8, find_symbol(&image, "module_init").unwrap());
        assert!(local >= image.base());
        assert!(local < image.base() + image.size() as u64);
        assert!(image.init_fn.is_some());
        assert!(image.cleanup_fn.is_none());
        assert!(find_symbol(&image, "no_such_symbol").is_none());
    }

    #[test]
    fn unresolved_symbol_fails_the_load() {
        let relas = [Elf64Rela {
            r_offset: 0,
            r_info: (2u64 << 32) | R_X86_64_64 as u64,
            r_addend: 0,
        }];
        let file = build_rel(false, &relas);
        assert_eq!(
            load_module(&file, &|_| None).unwrap_err(),
            ElfError::UnresolvedSymbol
        );
    }

    #[test]
    fn unknown_relocation_type_is_skipped() {
        let relas = [Elf64Rela {
            r_offset: 0,
            r_info: (1u64 << 32) | 99u64,
            r_addend: 0,
        }];
        let file = build_rel(false, &relas);
        let image = load_module(&file, &|_| None).unwrap();
        unsafe {
            // Target bytes untouched (still NOP padding)
            let text_base = find_symbol(&image, "local_fn").unwrap() - 8;
            assert_eq!((text_base as *const u8).read(), 0x90);
        }
    }

    #[test]
    fn module_rejects_executables() {
        let mut hdr = base_header(ET_DYN);
        hdr.e_shnum = 0;
        assert_eq!(
            load_module(&bytes_of(&hdr), &|_| None),
            Err(ElfError::Unsupported)
        );
    }
}
