//! Device Filesystem (/dev)
//!
//! Mirrors the device registry into the VFS: every registered device
//! appears as `/dev/<name>` with a category-derived node type and
//! mode 0666. Node I/O delegates to the device operation table and
//! maintains the device byte/op counters.

use alloc::sync::{Arc, Weak};
use spin::RwLock;

use super::{FileSystem, Mount, NodeOps, NodeType, OpenFile, Vfs, VfsError, VfsNode, VfsResult};
use crate::device::{Device, DeviceClass};

/// The devfs root directory, shared by every mount of the filesystem
static DEVFS_ROOT: RwLock<Option<Arc<VfsNode>>> = RwLock::new(None);

/// The devfs filesystem type
pub struct DevFs;

impl FileSystem for DevFs {
    fn name(&self) -> &str {
        "devfs"
    }

    fn mount(
        &self,
        vfs: &Vfs,
        _source: Option<&str>,
        _options: Option<&str>,
    ) -> VfsResult<Arc<VfsNode>> {
        let mut root = DEVFS_ROOT.write();
        if let Some(existing) = root.as_ref() {
            return Ok(existing.clone());
        }

        let node = vfs.create_node("dev", NodeType::Directory)?;
        node.set_perms(0o755);
        *root = Some(node.clone());
        Ok(node)
    }

    fn unmount(&self, _mount: &Mount) -> VfsResult<()> {
        // The devfs root survives unmount; devices stay registered
        Ok(())
    }
}

/// Register the filesystem type and mount it at /dev.
pub fn init() {
    let vfs = super::instance();
    let _ = vfs.register_filesystem(Arc::new(DevFs));
    let _ = vfs.mkdir("/dev", 0o755);
    match vfs.mount(None, "/dev", "devfs", 0, None) {
        Ok(()) | Err(VfsError::Busy) => {}
        Err(e) => log_warn!("[devfs] mount failed: {:?}", e),
    }
}

fn root() -> Option<Arc<VfsNode>> {
    DEVFS_ROOT.read().clone()
}

/// Node operations delegating to the underlying device
struct DevNodeOps {
    dev: Weak<Device>,
}

impl DevNodeOps {
    fn device(&self) -> VfsResult<Arc<Device>> {
        self.dev.upgrade().ok_or(VfsError::IoError)
    }
}

impl NodeOps for DevNodeOps {
    fn open(&self, _node: &Arc<VfsNode>, file: &OpenFile) -> VfsResult<()> {
        let dev = self.device()?;
        match dev.ops() {
            Some(ops) => ops.open(&dev, file.flags.0),
            None => Ok(()),
        }
    }

    fn close(&self, _file: &OpenFile) -> VfsResult<()> {
        let dev = self.device()?;
        match dev.ops() {
            Some(ops) => ops.close(&dev),
            None => Ok(()),
        }
    }

    fn read(&self, file: &OpenFile, buf: &mut [u8]) -> VfsResult<usize> {
        let dev = self.device()?;
        let ops = dev.ops().ok_or(VfsError::NotSupported)?;
        let n = ops.read(&dev, buf, file.offset())?;
        file.advance(n as u64);
        dev.stats.record_read(n as u64);
        Ok(n)
    }

    fn write(&self, file: &OpenFile, buf: &[u8]) -> VfsResult<usize> {
        let dev = self.device()?;
        let ops = dev.ops().ok_or(VfsError::NotSupported)?;
        let n = ops.write(&dev, buf, file.offset())?;
        file.advance(n as u64);
        dev.stats.record_write(n as u64);
        Ok(n)
    }

    fn ioctl(&self, _file: &OpenFile, request: u64, arg: u64) -> VfsResult<u64> {
        let dev = self.device()?;
        let ops = dev.ops().ok_or(VfsError::NotSupported)?;
        ops.ioctl(&dev, request, arg)
    }
}

/// Expose a registered device under /dev.
pub fn publish(dev: &Arc<Device>) -> VfsResult<()> {
    let root = root().ok_or(VfsError::NotFound)?;
    let vfs = super::instance();

    let node_type = match dev.class() {
        DeviceClass::Block | DeviceClass::Storage => NodeType::BlockDevice,
        _ => NodeType::CharDevice,
    };

    let node = vfs.create_node(dev.name(), node_type)?;
    node.set_perms(0o666);
    let (major, minor) = dev.numbers();
    node.set_device_numbers(major, minor);
    node.set_ops(Arc::new(DevNodeOps {
        dev: Arc::downgrade(dev),
    }));
    node.set_private(dev.clone());

    vfs.add_child(&root, node.clone())?;
    dev.set_devfs_node(&node);

    Ok(())
}

/// Remove a device's /dev node.
pub fn remove(dev: &Arc<Device>) -> VfsResult<()> {
    let node = dev.devfs_node().ok_or(VfsError::NotFound)?;
    if let Some(root) = root() {
        super::instance().remove_child(&root, &node)?;
    }
    dev.clear_devfs_node();
    Ok(())
}
