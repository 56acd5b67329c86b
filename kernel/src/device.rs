//! Device Manager
//!
//! Registries for devices and drivers with probe/attach matching.
//! Registered devices are mirrored into the devfs view of the VFS
//! and form a tree through parent/child links.

use alloc::string::{String, ToString};
use alloc::sync::{Arc, Weak};
use alloc::vec::Vec;
use core::sync::atomic::{AtomicU64, Ordering};
use spin::RwLock;

use crate::vfs::{self, VfsError, VfsNode, VfsResult};

/// Device categories
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DeviceClass {
    Unknown,
    Char,
    Block,
    Net,
    Input,
    Display,
    Sound,
    Storage,
    Usb,
    Pci,
}

/// Device flag word bits
pub const FLAG_REMOVABLE: u32 = 0x01;
pub const FLAG_READONLY: u32 = 0x02;
pub const FLAG_HOTPLUG: u32 = 0x04;
pub const FLAG_VIRTUAL: u32 = 0x08;

/// Registry limits
pub const MAX_DEVICES: usize = 128;
pub const MAX_DRIVERS: usize = 64;

/// Default block size when a driver does not report one
pub const DEFAULT_BLOCK_SIZE: u32 = 512;

/// Cumulative per-device I/O counters
#[derive(Default)]
pub struct DeviceStats {
    read_bytes: AtomicU64,
    write_bytes: AtomicU64,
    read_ops: AtomicU64,
    write_ops: AtomicU64,
}

impl DeviceStats {
    pub fn record_read(&self, bytes: u64) {
        self.read_bytes.fetch_add(bytes, Ordering::Relaxed);
        self.read_ops.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_write(&self, bytes: u64) {
        self.write_bytes.fetch_add(bytes, Ordering::Relaxed);
        self.write_ops.fetch_add(1, Ordering::Relaxed);
    }

    /// (read_bytes, write_bytes, read_ops, write_ops)
    pub fn snapshot(&self) -> (u64, u64, u64, u64) {
        (
            self.read_bytes.load(Ordering::Relaxed),
            self.write_bytes.load(Ordering::Relaxed),
            self.read_ops.load(Ordering::Relaxed),
            self.write_ops.load(Ordering::Relaxed),
        )
    }
}

/// Device operation table. Missing operations mean "not supported".
#[allow(unused_variables)]
pub trait DeviceOps: Send + Sync {
    fn open(&self, dev: &Arc<Device>, flags: u32) -> VfsResult<()> {
        Ok(())
    }
    fn close(&self, dev: &Arc<Device>) -> VfsResult<()> {
        Ok(())
    }
    fn read(&self, dev: &Arc<Device>, buf: &mut [u8], offset: u64) -> VfsResult<usize> {
        Err(VfsError::NotSupported)
    }
    fn write(&self, dev: &Arc<Device>, buf: &[u8], offset: u64) -> VfsResult<usize> {
        Err(VfsError::NotSupported)
    }
    fn ioctl(&self, dev: &Arc<Device>, request: u64, arg: u64) -> VfsResult<u64> {
        Err(VfsError::NotSupported)
    }
    fn read_block(&self, dev: &Arc<Device>, block: u64, buf: &mut [u8]) -> VfsResult<()> {
        Err(VfsError::NotSupported)
    }
    fn write_block(&self, dev: &Arc<Device>, block: u64, buf: &[u8]) -> VfsResult<()> {
        Err(VfsError::NotSupported)
    }
    fn block_size(&self, dev: &Arc<Device>) -> u32 {
        DEFAULT_BLOCK_SIZE
    }
    fn block_count(&self, dev: &Arc<Device>) -> u64 {
        0
    }
}

/// A driver claims a device category and binds through probe/attach.
#[allow(unused_variables)]
pub trait Driver: Send + Sync {
    fn name(&self) -> &str;

    /// Category this driver claims; `Unknown` claims everything.
    fn class(&self) -> DeviceClass;

    /// Inspect an unbound device; true when this driver can serve it.
    fn probe(&self, dev: &Arc<Device>) -> bool;

    fn attach(&self, dev: &Arc<Device>) -> VfsResult<()> {
        Ok(())
    }

    fn detach(&self, dev: &Arc<Device>) {}

    /// Operation table installed on devices that bring none of their own.
    fn default_ops(&self) -> Option<Arc<dyn DeviceOps>> {
        None
    }
}

/// A registered (or registerable) device
pub struct Device {
    name: String,
    class: DeviceClass,
    major: u32,
    minor: u32,
    flags: RwLock<u32>,
    ops: RwLock<Option<Arc<dyn DeviceOps>>>,
    driver: RwLock<Option<Arc<dyn Driver>>>,
    parent: RwLock<Weak<Device>>,
    children: RwLock<Vec<Arc<Device>>>,
    devfs_node: RwLock<Weak<VfsNode>>,
    pub stats: DeviceStats,
}

impl Device {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn class(&self) -> DeviceClass {
        self.class
    }

    pub fn numbers(&self) -> (u32, u32) {
        (self.major, self.minor)
    }

    pub fn flags(&self) -> u32 {
        *self.flags.read()
    }

    pub fn set_flags(&self, flags: u32) {
        *self.flags.write() = flags;
    }

    pub fn ops(&self) -> Option<Arc<dyn DeviceOps>> {
        self.ops.read().clone()
    }

    pub fn set_ops(&self, ops: Arc<dyn DeviceOps>) {
        *self.ops.write() = Some(ops);
    }

    pub fn driver(&self) -> Option<Arc<dyn Driver>> {
        self.driver.read().clone()
    }

    pub fn parent(&self) -> Option<Arc<Device>> {
        self.parent.read().upgrade()
    }

    pub fn children(&self) -> Vec<Arc<Device>> {
        self.children.read().clone()
    }

    pub fn devfs_node(&self) -> Option<Arc<VfsNode>> {
        self.devfs_node.read().upgrade()
    }

    pub(crate) fn set_devfs_node(&self, node: &Arc<VfsNode>) {
        *self.devfs_node.write() = Arc::downgrade(node);
    }

    pub(crate) fn clear_devfs_node(&self) {
        *self.devfs_node.write() = Weak::new();
    }
}

/// Allocate an unregistered device record.
pub fn device_create(name: &str, class: DeviceClass, major: u32, minor: u32) -> Arc<Device> {
    Arc::new(Device {
        name: name.to_string(),
        class,
        major,
        minor,
        flags: RwLock::new(0),
        ops: RwLock::new(None),
        driver: RwLock::new(None),
        parent: RwLock::new(Weak::new()),
        children: RwLock::new(Vec::new()),
        devfs_node: RwLock::new(Weak::new()),
        stats: DeviceStats::default(),
    })
}

/// Device and driver registries
pub struct DeviceRegistry {
    devices: RwLock<Vec<Arc<Device>>>,
    drivers: RwLock<Vec<Arc<dyn Driver>>>,
}

impl DeviceRegistry {
    pub const fn new() -> Self {
        Self {
            devices: RwLock::new(Vec::new()),
            drivers: RwLock::new(Vec::new()),
        }
    }

    // ========================================================================
    // Devices
    // ========================================================================

    pub fn register_device(&self, dev: &Arc<Device>) -> VfsResult<()> {
        {
            let mut devices = self.devices.write();
            if devices.len() >= MAX_DEVICES {
                return Err(VfsError::NoSpace);
            }
            if devices
                .iter()
                .any(|d| d.name == dev.name || (d.major, d.minor) == (dev.major, dev.minor))
            {
                return Err(VfsError::AlreadyExists);
            }
            devices.push(dev.clone());
        }

        // Mirror into /dev; absent devfs is tolerated (early boot)
        if let Err(e) = vfs::devfs::publish(dev) {
            log_debug!("[device] no devfs node for {}: {:?}", dev.name, e);
        }

        self.bind_device(dev);

        log!("[device] registered {} ({}, {})", dev.name, dev.major, dev.minor);
        Ok(())
    }

    pub fn unregister_device(&self, dev: &Arc<Device>) -> VfsResult<()> {
        {
            let mut devices = self.devices.write();
            let before = devices.len();
            devices.retain(|d| !Arc::ptr_eq(d, dev));
            if devices.len() == before {
                return Err(VfsError::NotFound);
            }
        }

        let _ = vfs::devfs::remove(dev);

        if let Some(driver) = dev.driver() {
            driver.detach(dev);
        }
        *dev.driver.write() = None;

        Ok(())
    }

    /// Unregister and drop a device record.
    pub fn destroy_device(&self, dev: &Arc<Device>) {
        let _ = self.unregister_device(dev);
    }

    pub fn find_device(&self, name: &str) -> Option<Arc<Device>> {
        self.devices.read().iter().find(|d| d.name == name).cloned()
    }

    pub fn find_device_by_numbers(&self, major: u32, minor: u32) -> Option<Arc<Device>> {
        self.devices
            .read()
            .iter()
            .find(|d| d.major == major && d.minor == minor)
            .cloned()
    }

    pub fn devices(&self) -> Vec<Arc<Device>> {
        self.devices.read().clone()
    }

    // ========================================================================
    // Drivers
    // ========================================================================

    pub fn register_driver(&self, driver: Arc<dyn Driver>) -> VfsResult<()> {
        {
            let mut drivers = self.drivers.write();
            if drivers.len() >= MAX_DRIVERS {
                return Err(VfsError::NoSpace);
            }
            if drivers.iter().any(|d| d.name() == driver.name()) {
                return Err(VfsError::AlreadyExists);
            }
            drivers.push(driver.clone());
        }

        log!("[driver] registered {}", driver.name());

        // Try to bind existing unbound devices
        for dev in self.devices() {
            if dev.driver().is_none() {
                self.try_bind(&dev, &driver);
            }
        }

        Ok(())
    }

    pub fn unregister_driver(&self, name: &str) -> VfsResult<()> {
        let driver = {
            let mut drivers = self.drivers.write();
            let found = drivers.iter().find(|d| d.name() == name).cloned();
            drivers.retain(|d| d.name() != name);
            found.ok_or(VfsError::NotFound)?
        };

        for dev in self.devices() {
            let bound = dev
                .driver()
                .map(|d| d.name() == driver.name())
                .unwrap_or(false);
            if bound {
                driver.detach(&dev);
                *dev.driver.write() = None;
            }
        }

        Ok(())
    }

    pub fn find_driver(&self, name: &str) -> Option<Arc<dyn Driver>> {
        self.drivers.read().iter().find(|d| d.name() == name).cloned()
    }

    /// Offer `dev` to every matching driver until one attaches.
    fn bind_device(&self, dev: &Arc<Device>) {
        if dev.driver().is_some() {
            return;
        }
        for driver in self.drivers.read().iter() {
            if self.try_bind(dev, driver) {
                break;
            }
        }
    }

    fn try_bind(&self, dev: &Arc<Device>, driver: &Arc<dyn Driver>) -> bool {
        if driver.class() != dev.class && driver.class() != DeviceClass::Unknown {
            return false;
        }
        if !driver.probe(dev) {
            return false;
        }
        if driver.attach(dev).is_err() {
            return false;
        }

        *dev.driver.write() = Some(driver.clone());
        if dev.ops().is_none() {
            if let Some(ops) = driver.default_ops() {
                dev.set_ops(ops);
            }
        }

        log_debug!("[device] {} bound to driver {}", dev.name, driver.name());
        true
    }
}

// ============================================================================
// Device tree
// ============================================================================

/// Attach `child` under `parent` in the device tree.
pub fn add_child(parent: &Arc<Device>, child: &Arc<Device>) {
    *child.parent.write() = Arc::downgrade(parent);
    parent.children.write().push(child.clone());
}

/// Detach `child` from `parent`.
pub fn remove_child(parent: &Arc<Device>, child: &Arc<Device>) {
    parent.children.write().retain(|c| !Arc::ptr_eq(c, child));
    *child.parent.write() = Weak::new();
}

// ============================================================================
// Block-oriented bulk I/O
// ============================================================================

/// Read `count` blocks starting at `start` into `buf`.
pub fn read_blocks(dev: &Arc<Device>, start: u64, count: u32, buf: &mut [u8]) -> VfsResult<()> {
    if dev.class != DeviceClass::Block && dev.class != DeviceClass::Storage {
        return Err(VfsError::NotSupported);
    }
    let ops = dev.ops().ok_or(VfsError::NotSupported)?;
    let block_size = ops.block_size(dev) as usize;
    if buf.len() < count as usize * block_size {
        return Err(VfsError::InvalidArgument);
    }

    for i in 0..count as usize {
        let chunk = &mut buf[i * block_size..(i + 1) * block_size];
        ops.read_block(dev, start + i as u64, chunk)?;
    }
    dev.stats.record_read(count as u64 * block_size as u64);
    Ok(())
}

/// Write `count` blocks starting at `start` from `buf`.
pub fn write_blocks(dev: &Arc<Device>, start: u64, count: u32, buf: &[u8]) -> VfsResult<()> {
    if dev.class != DeviceClass::Block && dev.class != DeviceClass::Storage {
        return Err(VfsError::NotSupported);
    }
    if dev.flags() & FLAG_READONLY != 0 {
        return Err(VfsError::ReadOnly);
    }
    let ops = dev.ops().ok_or(VfsError::NotSupported)?;
    let block_size = ops.block_size(dev) as usize;
    if buf.len() < count as usize * block_size {
        return Err(VfsError::InvalidArgument);
    }

    for i in 0..count as usize {
        let chunk = &buf[i * block_size..(i + 1) * block_size];
        ops.write_block(dev, start + i as u64, chunk)?;
    }
    dev.stats.record_write(count as u64 * block_size as u64);
    Ok(())
}

// ============================================================================
// Global registry + built-in devices
// ============================================================================

static REGISTRY: DeviceRegistry = DeviceRegistry::new();

pub fn registry() -> &'static DeviceRegistry {
    &REGISTRY
}

pub fn register(dev: &Arc<Device>) -> VfsResult<()> {
    REGISTRY.register_device(dev)
}

pub fn unregister(dev: &Arc<Device>) -> VfsResult<()> {
    REGISTRY.unregister_device(dev)
}

pub fn register_driver(driver: Arc<dyn Driver>) -> VfsResult<()> {
    REGISTRY.register_driver(driver)
}

pub fn unregister_driver(name: &str) -> VfsResult<()> {
    REGISTRY.unregister_driver(name)
}

pub fn find(name: &str) -> Option<Arc<Device>> {
    REGISTRY.find_device(name)
}

pub fn find_by_numbers(major: u32, minor: u32) -> Option<Arc<Device>> {
    REGISTRY.find_device_by_numbers(major, minor)
}

pub fn list() -> Vec<Arc<Device>> {
    REGISTRY.devices()
}

/// Console character device: writes go to the kernel console,
/// reads drain the keyboard buffer.
struct ConsoleOps;

impl DeviceOps for ConsoleOps {
    fn read(&self, _dev: &Arc<Device>, buf: &mut [u8], _offset: u64) -> VfsResult<usize> {
        let mut n = 0;
        while n < buf.len() {
            match crate::keyboard::get_key() {
                Some(c) => {
                    buf[n] = c;
                    n += 1;
                    if c == b'\n' {
                        break;
                    }
                }
                None => break,
            }
        }
        Ok(n)
    }

    fn write(&self, _dev: &Arc<Device>, buf: &[u8], _offset: u64) -> VfsResult<usize> {
        crate::console::write_bytes(buf, crate::console::COLOR_WHITE);
        Ok(buf.len())
    }
}

struct ConsoleDriver;

impl Driver for ConsoleDriver {
    fn name(&self) -> &str {
        "console"
    }

    fn class(&self) -> DeviceClass {
        DeviceClass::Char
    }

    fn probe(&self, dev: &Arc<Device>) -> bool {
        dev.name() == "console" || dev.name() == "tty"
    }

    fn default_ops(&self) -> Option<Arc<dyn DeviceOps>> {
        Some(Arc::new(ConsoleOps))
    }
}

/// Keyboard input device: reads pull translated bytes.
struct KeyboardOps;

impl DeviceOps for KeyboardOps {
    fn read(&self, _dev: &Arc<Device>, buf: &mut [u8], _offset: u64) -> VfsResult<usize> {
        let mut n = 0;
        while n < buf.len() {
            match crate::keyboard::get_key() {
                Some(c) => {
                    buf[n] = c;
                    n += 1;
                }
                None => break,
            }
        }
        Ok(n)
    }
}

/// Initialize the device manager: bring up devfs, register the
/// built-in console and keyboard devices with their drivers.
pub fn init() {
    vfs::devfs::init();

    let _ = register_driver(Arc::new(ConsoleDriver));

    let console = device_create("console", DeviceClass::Char, 5, 1);
    console.set_flags(FLAG_VIRTUAL);
    let _ = register(&console);

    let tty = device_create("tty", DeviceClass::Char, 4, 0);
    tty.set_flags(FLAG_VIRTUAL);
    let _ = register(&tty);

    let kbd = device_create("kbd", DeviceClass::Input, 13, 0);
    kbd.set_flags(FLAG_VIRTUAL);
    kbd.set_ops(Arc::new(KeyboardOps));
    let _ = register(&kbd);

    log!("[OK] Device manager up ({} devices)", list().len());
}

#[cfg(test)]
mod tests {
    use super::*;
    use spin::Mutex;

    // Registry and devfs are process-wide; serialize the tests
    static TEST_LOCK: Mutex<()> = Mutex::new(());

    fn setup() {
        vfs::devfs::init();
    }

    struct NullOps;
    impl DeviceOps for NullOps {
        fn read(&self, _dev: &Arc<Device>, _buf: &mut [u8], _offset: u64) -> VfsResult<usize> {
            Ok(0)
        }
        fn write(&self, _dev: &Arc<Device>, buf: &[u8], _offset: u64) -> VfsResult<usize> {
            Ok(buf.len())
        }
    }

    #[test]
    fn devfs_mirrors_registration() {
        let _guard = TEST_LOCK.lock();
        setup();

        let dev = device_create("tty0", DeviceClass::Char, 4, 64);
        dev.set_ops(Arc::new(NullOps));
        register(&dev).unwrap();

        // The devfs node exists, is a chardev and points back at the device
        let node = vfs::lookup("/dev/tty0").unwrap();
        assert_eq!(node.node_type(), vfs::NodeType::CharDevice);
        assert_eq!(node.device_numbers(), (4, 64));
        let private = node.private().unwrap();
        let back = private.downcast::<Device>().unwrap();
        assert!(Arc::ptr_eq(&back, &dev));

        let names: alloc::vec::Vec<_> = vfs::readdir("/dev")
            .unwrap()
            .into_iter()
            .map(|e| e.name)
            .collect();
        assert!(names.contains(&"tty0".to_string()));

        // Duplicate name and duplicate numbers are both rejected
        let dup = device_create("tty0", DeviceClass::Char, 4, 65);
        assert_eq!(register(&dup), Err(VfsError::AlreadyExists));
        let dup_nums = device_create("tty0b", DeviceClass::Char, 4, 64);
        assert_eq!(register(&dup_nums), Err(VfsError::AlreadyExists));

        // Unregistering removes both the registry entry and the node
        unregister(&dev).unwrap();
        assert!(find("tty0").is_none());
        assert!(vfs::lookup("/dev/tty0").is_none());
        assert_eq!(unregister(&dev), Err(VfsError::NotFound));
    }

    #[test]
    fn devfs_io_updates_counters() {
        let _guard = TEST_LOCK.lock();
        setup();

        let dev = device_create("null0", DeviceClass::Char, 1, 90);
        dev.set_ops(Arc::new(NullOps));
        register(&dev).unwrap();

        let file = vfs::open("/dev/null0", vfs::OpenFlags(vfs::OpenFlags::O_RDWR)).unwrap();
        assert_eq!(vfs::write(&file, b"discard").unwrap(), 7);
        let mut buf = [0u8; 8];
        assert_eq!(vfs::read(&file, &mut buf).unwrap(), 0);

        let (rb, wb, ro, wo) = dev.stats.snapshot();
        assert_eq!((rb, wb), (0, 7));
        assert_eq!((ro, wo), (1, 1));

        unregister(&dev).unwrap();
    }

    struct ProbingDriver;
    impl Driver for ProbingDriver {
        fn name(&self) -> &str {
            "probing"
        }
        fn class(&self) -> DeviceClass {
            DeviceClass::Net
        }
        fn probe(&self, dev: &Arc<Device>) -> bool {
            dev.name().starts_with("net")
        }
        fn default_ops(&self) -> Option<Arc<dyn DeviceOps>> {
            Some(Arc::new(NullOps))
        }
    }

    #[test]
    fn driver_binding_both_directions() {
        let _guard = TEST_LOCK.lock();
        setup();

        // Device first, driver second
        let early = device_create("net0", DeviceClass::Net, 10, 80);
        register(&early).unwrap();
        assert!(early.driver().is_none());

        register_driver(Arc::new(ProbingDriver)).unwrap();
        assert_eq!(early.driver().unwrap().name(), "probing");
        assert!(early.ops().is_some(), "driver supplies default ops");

        // Driver first, device second
        let late = device_create("net1", DeviceClass::Net, 10, 81);
        register(&late).unwrap();
        assert_eq!(late.driver().unwrap().name(), "probing");

        // Probe rejection leaves the device unbound
        let other = device_create("wifi0", DeviceClass::Net, 10, 82);
        register(&other).unwrap();
        assert!(other.driver().is_none());

        // Unregistering the driver detaches it everywhere
        unregister_driver("probing").unwrap();
        assert!(early.driver().is_none());
        assert!(late.driver().is_none());

        unregister(&early).unwrap();
        unregister(&late).unwrap();
        unregister(&other).unwrap();
    }

    struct RamBlockOps {
        blocks: RwLock<alloc::vec::Vec<u8>>,
    }

    impl RamBlockOps {
        fn new(count: usize) -> Self {
            Self {
                blocks: RwLock::new(alloc::vec![0u8; count * DEFAULT_BLOCK_SIZE as usize]),
            }
        }
    }

    impl DeviceOps for RamBlockOps {
        fn read_block(&self, _dev: &Arc<Device>, block: u64, buf: &mut [u8]) -> VfsResult<()> {
            let data = self.blocks.read();
            let start = block as usize * DEFAULT_BLOCK_SIZE as usize;
            if start + buf.len() > data.len() {
                return Err(VfsError::IoError);
            }
            buf.copy_from_slice(&data[start..start + buf.len()]);
            Ok(())
        }

        fn write_block(&self, _dev: &Arc<Device>, block: u64, buf: &[u8]) -> VfsResult<()> {
            let mut data = self.blocks.write();
            let start = block as usize * DEFAULT_BLOCK_SIZE as usize;
            if start + buf.len() > data.len() {
                return Err(VfsError::IoError);
            }
            data[start..start + buf.len()].copy_from_slice(buf);
            Ok(())
        }
    }

    #[test]
    fn block_bulk_io() {
        let _guard = TEST_LOCK.lock();
        setup();

        let dev = device_create("ram0", DeviceClass::Block, 8, 70);
        dev.set_ops(Arc::new(RamBlockOps::new(4)));
        register(&dev).unwrap();

        let bs = DEFAULT_BLOCK_SIZE as usize;
        let mut out = alloc::vec![0u8; 2 * bs];
        out[..bs].fill(0x11);
        out[bs..].fill(0x22);
        write_blocks(&dev, 1, 2, &out).unwrap();

        let mut back = alloc::vec![0u8; 2 * bs];
        read_blocks(&dev, 1, 2, &mut back).unwrap();
        assert_eq!(back, out);

        // Out-of-range block propagates the driver error
        let mut big = alloc::vec![0u8; bs];
        assert_eq!(read_blocks(&dev, 9, 1, &mut big), Err(VfsError::IoError));

        // Short buffer rejected up front
        assert_eq!(
            read_blocks(&dev, 0, 2, &mut big),
            Err(VfsError::InvalidArgument)
        );

        // Read-only flag blocks writes
        dev.set_flags(FLAG_READONLY);
        assert_eq!(write_blocks(&dev, 0, 1, &out), Err(VfsError::ReadOnly));

        // Char devices refuse block I/O
        let chardev = device_create("char0", DeviceClass::Char, 1, 91);
        assert_eq!(
            read_blocks(&chardev, 0, 1, &mut big),
            Err(VfsError::NotSupported)
        );

        unregister(&dev).unwrap();
    }

    #[test]
    fn device_tree_links() {
        let _guard = TEST_LOCK.lock();

        let bus = device_create("bus0", DeviceClass::Pci, 20, 0);
        let leaf = device_create("leaf0", DeviceClass::Char, 20, 1);

        add_child(&bus, &leaf);
        assert!(Arc::ptr_eq(&leaf.parent().unwrap(), &bus));
        assert_eq!(bus.children().len(), 1);

        remove_child(&bus, &leaf);
        assert!(leaf.parent().is_none());
        assert!(bus.children().is_empty());
    }
}
