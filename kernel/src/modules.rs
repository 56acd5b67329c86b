//! Loadable Kernel Modules
//!
//! Loads relocatable ELF objects into the kernel, resolves their
//! undefined symbols against the kernel symbol store and drives the
//! module lifecycle (init/cleanup hooks, reference counts, dependency
//! bookkeeping).
//!
//! Symbol resolution order: built-in exports, late-registered tables,
//! then the exports of every running module. First match wins.

use alloc::string::{String, ToString};
use alloc::vec::Vec;
use spin::Mutex;

use crate::elf::{self, ElfError, LoadedImage, ModuleCleanupFn, ModuleInitFn};

/// Registry limits
pub const MAX_MODULES: usize = 64;
pub const MAX_MODULE_DEPS: usize = 16;

/// Module lifecycle states
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ModuleState {
    Unloaded,
    Loading,
    Loaded,
    Running,
    Error,
}

/// Module flag word bits
pub const FLAG_BUILTIN: u32 = 0x01;
pub const FLAG_ESSENTIAL: u32 = 0x02;
pub const FLAG_AUTOLOAD: u32 = 0x04;

/// Module subsystem errors
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ModError {
    AlreadyLoaded,
    TooManyModules,
    InvalidBinary,
    UnsupportedBinary,
    UnresolvedSymbol,
    OutOfMemory,
    InitFailed(i32),
    NotFound,
    Essential,
    InUse,
    HasDependents,
}

pub type ModResult<T> = Result<T, ModError>;

impl From<ElfError> for ModError {
    fn from(e: ElfError) -> Self {
        match e {
            ElfError::Invalid | ElfError::NoEntry => ModError::InvalidBinary,
            ElfError::Unsupported => ModError::UnsupportedBinary,
            ElfError::OutOfMemory => ModError::OutOfMemory,
            ElfError::UnresolvedSymbol => ModError::UnresolvedSymbol,
        }
    }
}

/// Self-description a module may export as the `module_info` symbol.
#[repr(C)]
pub struct ModuleInfo {
    pub name: *const u8,
    pub description: *const u8,
    pub author: *const u8,
    pub version: *const u8,
    pub license: *const u8,
    /// NULL-terminated array of dependency names
    pub depends: *const *const u8,
    pub init: Option<ModuleInitFn>,
    pub cleanup: Option<ModuleCleanupFn>,
}

/// A loaded module record
struct Module {
    name: String,
    state: ModuleState,
    flags: u32,
    image: LoadedImage,
    info: *const ModuleInfo,
    ref_count: u32,
    deps: Vec<String>,
    dependents: Vec<String>,
}

// The info pointer targets the module's own image memory.
unsafe impl Send for Module {}

/// Snapshot of a module for listings and the shell
#[derive(Clone, Debug)]
pub struct ModuleSummary {
    pub name: String,
    pub state: ModuleState,
    pub flags: u32,
    pub size: usize,
    pub ref_count: u32,
    pub deps: Vec<String>,
    pub dependents: Vec<String>,
}

/// Kernel symbol store and loaded-module list
pub struct ModuleRegistry {
    modules: Mutex<Vec<Module>>,
    symbols: Mutex<Vec<(String, u64)>>,
}

/// Where a symbol was found during resolution
enum Provider {
    Kernel,
    Module(String),
}

impl ModuleRegistry {
    pub const fn new() -> Self {
        Self {
            modules: Mutex::new(Vec::new()),
            symbols: Mutex::new(Vec::new()),
        }
    }

    /// Add late-bindable kernel symbols.
    pub fn register_symbols(&self, symbols: &[(&str, u64)]) {
        let mut table = self.symbols.lock();
        for (name, addr) in symbols {
            table.push((name.to_string(), *addr));
        }
    }

    fn resolve(&self, name: &str) -> Option<(u64, Provider)> {
        // Built-in exports compiled into the kernel
        for (sym, addr) in exports::builtin_symbols() {
            if sym == name {
                return Some((addr, Provider::Kernel));
            }
        }

        // Late-registered tables
        for (sym, addr) in self.symbols.lock().iter() {
            if sym == name {
                return Some((*addr, Provider::Kernel));
            }
        }

        // Exports of running modules
        for module in self.modules.lock().iter() {
            if module.state != ModuleState::Running {
                continue;
            }
            if let Some(addr) = elf::find_symbol(&module.image, name) {
                return Some((addr, Provider::Module(module.name.clone())));
            }
        }

        None
    }

    /// Address for `name`, used by the ELF relocator.
    pub fn find_symbol(&self, name: &str) -> Option<u64> {
        self.resolve(name).map(|(addr, _)| addr)
    }

    /// Load a relocatable object as a module.
    pub fn load(&self, name: &str, bytes: &[u8]) -> ModResult<()> {
        {
            let modules = self.modules.lock();
            if modules.iter().any(|m| m.name == name) {
                return Err(ModError::AlreadyLoaded);
            }
            if modules.len() >= MAX_MODULES {
                return Err(ModError::TooManyModules);
            }
        }

        elf::validate(bytes).map_err(ModError::from)?;

        // Track which running modules provide imported symbols so the
        // dependency graph reflects actual imports
        let providers: Mutex<Vec<String>> = Mutex::new(Vec::new());
        let resolver = |sym: &str| -> Option<u64> {
            let (addr, provider) = self.resolve(sym)?;
            if let Provider::Module(module_name) = provider {
                let mut list = providers.lock();
                if !list.contains(&module_name) {
                    list.push(module_name);
                }
            }
            Some(addr)
        };

        let image = elf::load_module(bytes, &resolver).map_err(|e| {
            log_error!("[module] load of {} failed: {:?}", name, e);
            ModError::from(e)
        })?;

        // Self-description exported by the module, if any
        let info = elf::find_symbol(&image, "module_info")
            .map(|addr| addr as *const ModuleInfo)
            .unwrap_or(core::ptr::null());

        let deps: Vec<String> = providers.into_inner();
        let init_fn = image
            .init_fn
            .or_else(|| unsafe { info.as_ref() }.and_then(|i| i.init));

        {
            let mut modules = self.modules.lock();
            // Record this module as a dependent of every provider
            for dep in &deps {
                if let Some(provider) = modules.iter_mut().find(|m| m.name == *dep) {
                    if provider.dependents.len() < MAX_MODULE_DEPS {
                        provider.dependents.push(name.to_string());
                    }
                    provider.ref_count += 1;
                }
            }

            let mut deps = deps;
            deps.truncate(MAX_MODULE_DEPS);

            modules.insert(
                0,
                Module {
                    name: name.to_string(),
                    state: ModuleState::Loading,
                    flags: 0,
                    image,
                    info,
                    ref_count: 1,
                    deps,
                    dependents: Vec::new(),
                },
            );
        }

        // Run the init hook outside the registry lock so the module
        // may call back into the kernel (symbol registration, device
        // registration) during initialization
        if let Some(init) = init_fn {
            let status = init();
            if status != 0 {
                log_error!("[module] init of {} returned {}", name, status);
                let mut modules = self.modules.lock();
                if let Some(module) = modules.iter_mut().find(|m| m.name == name) {
                    module.state = ModuleState::Error;
                }
                return Err(ModError::InitFailed(status));
            }
        }

        let mut modules = self.modules.lock();
        if let Some(module) = modules.iter_mut().find(|m| m.name == name) {
            module.state = ModuleState::Running;
        }
        log!("[module] loaded {}", name);
        Ok(())
    }

    /// Unload a module by name.
    pub fn unload(&self, name: &str) -> ModResult<()> {
        let (cleanup, deps) = {
            let modules = self.modules.lock();
            let module = modules
                .iter()
                .find(|m| m.name == name)
                .ok_or(ModError::NotFound)?;

            if module.flags & FLAG_ESSENTIAL != 0 {
                return Err(ModError::Essential);
            }
            if module.ref_count > 1 {
                return Err(ModError::InUse);
            }
            if !module.dependents.is_empty() {
                return Err(ModError::HasDependents);
            }

            let cleanup = module
                .image
                .cleanup_fn
                .or_else(|| unsafe { module.info.as_ref() }.and_then(|i| i.cleanup));
            (cleanup, module.deps.clone())
        };

        if let Some(cleanup) = cleanup {
            cleanup();
        }

        let mut modules = self.modules.lock();

        // Drop this module from every dependency's dependents list
        for dep in &deps {
            if let Some(provider) = modules.iter_mut().find(|m| m.name == *dep) {
                provider.dependents.retain(|d| d != name);
                provider.ref_count = provider.ref_count.saturating_sub(1);
            }
        }

        let index = modules
            .iter()
            .position(|m| m.name == name)
            .ok_or(ModError::NotFound)?;
        let module = modules.remove(index);
        elf::unload(module.image);

        log!("[module] unloaded {}", name);
        Ok(())
    }

    pub fn find(&self, name: &str) -> Option<ModuleSummary> {
        self.modules
            .lock()
            .iter()
            .find(|m| m.name == name)
            .map(summarize)
    }

    pub fn list(&self) -> Vec<ModuleSummary> {
        self.modules.lock().iter().map(summarize).collect()
    }

    pub fn module_ref(&self, name: &str) -> ModResult<()> {
        let mut modules = self.modules.lock();
        let module = modules
            .iter_mut()
            .find(|m| m.name == name)
            .ok_or(ModError::NotFound)?;
        module.ref_count += 1;
        Ok(())
    }

    pub fn module_unref(&self, name: &str) -> ModResult<()> {
        let mut modules = self.modules.lock();
        let module = modules
            .iter_mut()
            .find(|m| m.name == name)
            .ok_or(ModError::NotFound)?;
        module.ref_count = module.ref_count.saturating_sub(1);
        Ok(())
    }

    pub fn set_flags(&self, name: &str, flags: u32) -> ModResult<()> {
        let mut modules = self.modules.lock();
        let module = modules
            .iter_mut()
            .find(|m| m.name == name)
            .ok_or(ModError::NotFound)?;
        module.flags = flags;
        Ok(())
    }
}

fn summarize(module: &Module) -> ModuleSummary {
    ModuleSummary {
        name: module.name.clone(),
        state: module.state,
        flags: module.flags,
        size: module.image.size(),
        ref_count: module.ref_count,
        deps: module.deps.clone(),
        dependents: module.dependents.clone(),
    }
}

// ============================================================================
// Built-in kernel exports (C ABI, linkable from modules)
// ============================================================================

pub mod exports {
    use crate::memory::heap;

    pub extern "C" fn kmalloc(size: u64) -> *mut u8 {
        heap::kmalloc(size as usize)
    }

    pub extern "C" fn kfree(ptr: *mut u8) {
        heap::kfree(ptr);
    }

    pub extern "C" fn krealloc(ptr: *mut u8, new_size: u64) -> *mut u8 {
        heap::krealloc(ptr, new_size as usize)
    }

    pub extern "C" fn kcalloc(count: u64, size: u64) -> *mut u8 {
        heap::kcalloc(count as usize, size as usize)
    }

    /// Print a NUL-terminated string on the console.
    ///
    /// # Safety
    /// Callers (module code) must pass a valid C string.
    pub unsafe extern "C" fn console_print(ptr: *const u8) {
        if ptr.is_null() {
            return;
        }
        let mut p = ptr;
        while *p != 0 {
            crate::console::putchar(*p as char, crate::console::COLOR_WHITE);
            p = p.add(1);
        }
    }

    pub extern "C" fn console_putchar(c: u8) {
        crate::console::putchar(c as char, crate::console::COLOR_WHITE);
    }

    /// The symbols every module can link against.
    pub fn builtin_symbols() -> [(&'static str, u64); 6] {
        [
            ("kmalloc", kmalloc as usize as u64),
            ("kfree", kfree as usize as u64),
            ("krealloc", krealloc as usize as u64),
            ("kcalloc", kcalloc as usize as u64),
            ("console_print", console_print as usize as u64),
            ("console_putchar", console_putchar as usize as u64),
        ]
    }
}

// ============================================================================
// Global registry
// ============================================================================

static MODULES: ModuleRegistry = ModuleRegistry::new();

pub fn registry() -> &'static ModuleRegistry {
    &MODULES
}

/// Initialize the module subsystem.
pub fn init() {
    log!(
        "[OK] Module loader up, {} kernel symbols exported",
        exports::builtin_symbols().len()
    );
}

pub fn load(name: &str, bytes: &[u8]) -> ModResult<()> {
    MODULES.load(name, bytes)
}

pub fn unload(name: &str) -> ModResult<()> {
    MODULES.unload(name)
}

pub fn find(name: &str) -> Option<ModuleSummary> {
    MODULES.find(name)
}

pub fn list() -> Vec<ModuleSummary> {
    MODULES.list()
}

pub fn register_symbols(symbols: &[(&str, u64)]) {
    MODULES.register_symbols(symbols)
}

pub fn find_symbol(name: &str) -> Option<u64> {
    MODULES.find_symbol(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::elf::testutil::build_rel_object;
    use crate::elf::Elf64Rela;

    #[test]
    fn builtin_symbols_resolve_first() {
        let registry = ModuleRegistry::new();

        let kmalloc = registry.find_symbol("kmalloc").unwrap();
        assert_eq!(kmalloc, exports::kmalloc as usize as u64);

        // A late registration does not shadow a builtin
        registry.register_symbols(&[("kmalloc", 0xDEAD), ("custom_sym", 0x1000)]);
        assert_eq!(registry.find_symbol("kmalloc").unwrap(), kmalloc);
        assert_eq!(registry.find_symbol("custom_sym"), Some(0x1000));
        assert_eq!(registry.find_symbol("nope"), None);
    }

    #[test]
    fn load_find_unload_roundtrip() {
        let registry = ModuleRegistry::new();
        let object = build_rel_object(false, "kmalloc", &[]);

        registry.load("demo", &object).unwrap();

        let summary = registry.find("demo").unwrap();
        assert_eq!(summary.state, ModuleState::Running);
        assert_eq!(summary.ref_count, 1);

        // The module's exports are now part of the symbol store
        assert!(registry.find_symbol("local_fn").is_some());

        assert_eq!(registry.load("demo", &object), Err(ModError::AlreadyLoaded));

        registry.unload("demo").unwrap();
        assert!(registry.find("demo").is_none());
        assert!(registry.find_symbol("local_fn").is_none());
        assert_eq!(registry.unload("demo"), Err(ModError::NotFound));
    }

    #[test]
    fn relocation_against_kernel_symbols() {
        let registry = ModuleRegistry::new();

        // One PC32 call site against the undefined kmalloc import
        let relas = [Elf64Rela {
            r_offset: 4,
            r_info: (2u64 << 32) | 2u64, // R_X86_64_PC32
            r_addend: -4,
        }];
        let object = build_rel_object(false, "kmalloc", &relas);
        registry.load("uses_kmalloc", &object).unwrap();

        let text_base = registry.find_symbol("local_fn").unwrap() - 8;
        let kmalloc = exports::kmalloc as usize as u64;
        let expected = (kmalloc as i64)
            .wrapping_sub(4)
            .wrapping_sub((text_base + 4) as i64) as i32;
        let patched = unsafe { ((text_base + 4) as *const i32).read_unaligned() };
        assert_eq!(patched, expected);

        // Importing only kernel symbols creates no module dependencies
        assert!(registry.find("uses_kmalloc").unwrap().deps.is_empty());

        registry.unload("uses_kmalloc").unwrap();
    }

    #[test]
    fn missing_import_aborts_load() {
        let registry = ModuleRegistry::new();
        let relas = [Elf64Rela {
            r_offset: 0,
            r_info: (2u64 << 32) | 1u64, // R_X86_64_64
            r_addend: 0,
        }];
        let object = build_rel_object(false, "definitely_missing", &relas);

        assert_eq!(
            registry.load("broken", &object),
            Err(ModError::UnresolvedSymbol)
        );
        assert!(registry.find("broken").is_none());
    }

    #[test]
    fn dependency_tracking_blocks_unload() {
        let registry = ModuleRegistry::new();

        // Provider exports local_fn
        let provider = build_rel_object(false, "kmalloc", &[]);
        registry.load("provider", &provider).unwrap();

        // Consumer imports it through a relocation
        let relas = [Elf64Rela {
            r_offset: 8,
            r_info: (2u64 << 32) | 1u64, // R_X86_64_64
            r_addend: 0,
        }];
        let consumer = build_rel_object(false, "local_fn", &relas);
        registry.load("consumer", &consumer).unwrap();

        let provider_summary = registry.find("provider").unwrap();
        assert_eq!(provider_summary.dependents, alloc::vec!["consumer".to_string()]);
        assert_eq!(provider_summary.ref_count, 2);
        assert_eq!(
            registry.find("consumer").unwrap().deps,
            alloc::vec!["provider".to_string()]
        );

        // The provider cannot go while the consumer holds it
        assert_eq!(registry.unload("provider"), Err(ModError::HasDependents));

        registry.unload("consumer").unwrap();
        let provider_summary = registry.find("provider").unwrap();
        assert!(provider_summary.dependents.is_empty());
        assert_eq!(provider_summary.ref_count, 1);
        registry.unload("provider").unwrap();
    }

    #[test]
    fn essential_and_referenced_modules_stay() {
        let registry = ModuleRegistry::new();
        let object = build_rel_object(false, "kmalloc", &[]);
        registry.load("core_mod", &object).unwrap();

        registry.set_flags("core_mod", FLAG_ESSENTIAL).unwrap();
        assert_eq!(registry.unload("core_mod"), Err(ModError::Essential));

        registry.set_flags("core_mod", 0).unwrap();
        registry.module_ref("core_mod").unwrap();
        assert_eq!(registry.unload("core_mod"), Err(ModError::InUse));

        registry.module_unref("core_mod").unwrap();
        registry.unload("core_mod").unwrap();
    }

    #[test]
    fn rejects_non_relocatable_input() {
        let registry = ModuleRegistry::new();
        assert_eq!(
            registry.load("junk", &[0u8; 16]),
            Err(ModError::InvalidBinary)
        );
    }
}
