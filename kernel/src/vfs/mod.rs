//! Virtual File System (VFS)
//!
//! Generic node tree with pluggable per-filesystem operation tables.
//! Nodes own their children; parent and back links are weak so a
//! subtree has a single owner and deletion stays well-defined.
//! Mount descriptors attached to nodes divert path resolution into
//! another filesystem's root.

pub mod devfs;

use alloc::string::{String, ToString};
use alloc::sync::{Arc, Weak};
use alloc::vec::Vec;
use core::any::Any;
use core::sync::atomic::{AtomicU64, Ordering};
use lazy_static::lazy_static;
use spin::RwLock;

/// Maximum node name length in bytes
pub const MAX_NAME: usize = 64;

/// Node types
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NodeType {
    Regular,
    Directory,
    CharDevice,
    BlockDevice,
    Pipe,
    Symlink,
    Socket,
}

/// File open flags
#[derive(Clone, Copy, Debug, Default)]
pub struct OpenFlags(pub u32);

impl OpenFlags {
    pub const O_RDONLY: u32 = 0;
    pub const O_WRONLY: u32 = 1;
    pub const O_RDWR: u32 = 2;
    pub const O_CREAT: u32 = 0o100;
    pub const O_TRUNC: u32 = 0o1000;
    pub const O_APPEND: u32 = 0o2000;

    pub fn readable(&self) -> bool {
        (self.0 & 3) != Self::O_WRONLY
    }

    pub fn writable(&self) -> bool {
        (self.0 & 3) != Self::O_RDONLY
    }

    pub fn create(&self) -> bool {
        (self.0 & Self::O_CREAT) != 0
    }

    pub fn truncate(&self) -> bool {
        (self.0 & Self::O_TRUNC) != 0
    }

    pub fn append(&self) -> bool {
        (self.0 & Self::O_APPEND) != 0
    }
}

/// Seek origins
pub const SEEK_SET: u32 = 0;
pub const SEEK_CUR: u32 = 1;
pub const SEEK_END: u32 = 2;

/// VFS error types
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum VfsError {
    NotFound,
    PermissionDenied,
    AlreadyExists,
    NotDirectory,
    IsDirectory,
    NotEmpty,
    InvalidPath,
    InvalidArgument,
    NoSpace,
    IoError,
    NotSupported,
    ReadOnly,
    Busy,
}

pub type VfsResult<T> = Result<T, VfsError>;

/// File metadata
#[derive(Clone, Copy, Debug, Default)]
pub struct Stat {
    pub ino: u64,
    pub mode: u32,
    pub uid: u32,
    pub gid: u32,
    pub size: u64,
    pub rdev: u32,
    pub atime: u64,
    pub mtime: u64,
    pub ctime: u64,
}

/// Directory entry
#[derive(Clone, Debug)]
pub struct DirEntry {
    pub name: String,
    pub ino: u64,
    pub node_type: NodeType,
}

/// Mutable node metadata behind one lock
#[derive(Clone, Copy, Debug)]
struct NodeMeta {
    perms: u32,
    uid: u32,
    gid: u32,
    size: u64,
    atime: u64,
    mtime: u64,
    ctime: u64,
    dev_major: u32,
    dev_minor: u32,
}

/// A node in the VFS tree: file, directory, device, pipe or socket.
///
/// The `Arc` strong count doubles as the node reference count; parent
/// and devfs back links are `Weak` so children are singly owned.
pub struct VfsNode {
    name: RwLock<String>,
    node_type: NodeType,
    ino: u64,
    meta: RwLock<NodeMeta>,
    ops: RwLock<Option<Arc<dyn NodeOps>>>,
    private: RwLock<Option<Arc<dyn Any + Send + Sync>>>,
    parent: RwLock<Weak<VfsNode>>,
    children: RwLock<Vec<Arc<VfsNode>>>,
    mount: RwLock<Option<Arc<Mount>>>,
}

impl VfsNode {
    fn new(name: &str, node_type: NodeType, ino: u64) -> Arc<Self> {
        let mut name = name.to_string();
        name.truncate(MAX_NAME);
        Arc::new(Self {
            name: RwLock::new(name),
            node_type,
            ino,
            meta: RwLock::new(NodeMeta {
                perms: 0o644,
                uid: 0,
                gid: 0,
                size: 0,
                atime: 0,
                mtime: 0,
                ctime: 0,
                dev_major: 0,
                dev_minor: 0,
            }),
            ops: RwLock::new(None),
            private: RwLock::new(None),
            parent: RwLock::new(Weak::new()),
            children: RwLock::new(Vec::new()),
            mount: RwLock::new(None),
        })
    }

    pub fn name(&self) -> String {
        self.name.read().clone()
    }

    pub fn node_type(&self) -> NodeType {
        self.node_type
    }

    pub fn ino(&self) -> u64 {
        self.ino
    }

    pub fn size(&self) -> u64 {
        self.meta.read().size
    }

    pub fn set_size(&self, size: u64) {
        self.meta.write().size = size;
    }

    pub fn perms(&self) -> u32 {
        self.meta.read().perms
    }

    pub fn set_perms(&self, perms: u32) {
        self.meta.write().perms = perms;
    }

    pub fn device_numbers(&self) -> (u32, u32) {
        let meta = self.meta.read();
        (meta.dev_major, meta.dev_minor)
    }

    pub fn set_device_numbers(&self, major: u32, minor: u32) {
        let mut meta = self.meta.write();
        meta.dev_major = major;
        meta.dev_minor = minor;
    }

    pub fn ops(&self) -> Option<Arc<dyn NodeOps>> {
        self.ops.read().clone()
    }

    pub fn set_ops(&self, ops: Arc<dyn NodeOps>) {
        *self.ops.write() = Some(ops);
    }

    pub fn private(&self) -> Option<Arc<dyn Any + Send + Sync>> {
        self.private.read().clone()
    }

    pub fn set_private(&self, private: Arc<dyn Any + Send + Sync>) {
        *self.private.write() = Some(private);
    }

    pub fn parent(&self) -> Option<Arc<VfsNode>> {
        self.parent.read().upgrade()
    }

    pub fn children(&self) -> Vec<Arc<VfsNode>> {
        self.children.read().clone()
    }

    pub fn child_count(&self) -> usize {
        self.children.read().len()
    }

    pub fn find_child(&self, name: &str) -> Option<Arc<VfsNode>> {
        self.children
            .read()
            .iter()
            .find(|c| *c.name.read() == name)
            .cloned()
    }

    pub fn mount(&self) -> Option<Arc<Mount>> {
        self.mount.read().clone()
    }
}

/// Operation vtable attached to nodes. Missing operations mean
/// "not supported", never a dispatch failure. Implementations that
/// honour file offsets advance them through [`OpenFile`].
#[allow(unused_variables)]
pub trait NodeOps: Send + Sync {
    fn open(&self, node: &Arc<VfsNode>, file: &OpenFile) -> VfsResult<()> {
        Ok(())
    }
    fn close(&self, file: &OpenFile) -> VfsResult<()> {
        Ok(())
    }
    fn read(&self, file: &OpenFile, buf: &mut [u8]) -> VfsResult<usize> {
        Err(VfsError::NotSupported)
    }
    fn write(&self, file: &OpenFile, buf: &[u8]) -> VfsResult<usize> {
        Err(VfsError::NotSupported)
    }
    fn seek(&self, file: &OpenFile, offset: i64, whence: u32) -> VfsResult<u64> {
        Err(VfsError::NotSupported)
    }
    fn ioctl(&self, file: &OpenFile, request: u64, arg: u64) -> VfsResult<u64> {
        Err(VfsError::NotSupported)
    }
    fn readdir(&self, node: &Arc<VfsNode>) -> VfsResult<Vec<DirEntry>> {
        Err(VfsError::NotSupported)
    }
    fn create(&self, parent: &Arc<VfsNode>, name: &str, mode: u32) -> VfsResult<Arc<VfsNode>> {
        Err(VfsError::NotSupported)
    }
    fn unlink(&self, parent: &Arc<VfsNode>, name: &str) -> VfsResult<()> {
        Err(VfsError::NotSupported)
    }
    fn mkdir(&self, parent: &Arc<VfsNode>, name: &str, mode: u32) -> VfsResult<Arc<VfsNode>> {
        Err(VfsError::NotSupported)
    }
    fn rmdir(&self, parent: &Arc<VfsNode>, name: &str) -> VfsResult<()> {
        Err(VfsError::NotSupported)
    }
    fn lookup(&self, parent: &Arc<VfsNode>, name: &str) -> Option<Arc<VfsNode>> {
        None
    }
    fn stat(&self, node: &Arc<VfsNode>) -> VfsResult<Stat> {
        Err(VfsError::NotSupported)
    }
}

/// A filesystem type, registered by name and instantiated by mount.
pub trait FileSystem: Send + Sync {
    fn name(&self) -> &str;

    /// Produce the root node for a new mount.
    fn mount(&self, vfs: &Vfs, source: Option<&str>, options: Option<&str>)
        -> VfsResult<Arc<VfsNode>>;

    /// Cleanup on unmount; freeing fs-private state is the driver's
    /// responsibility.
    fn unmount(&self, _mount: &Mount) -> VfsResult<()> {
        Ok(())
    }
}

/// Mount descriptor linking a mount point to a filesystem root
pub struct Mount {
    pub fs: Arc<dyn FileSystem>,
    pub root: Arc<VfsNode>,
    pub mount_point: Weak<VfsNode>,
    pub source: String,
    pub target: String,
    pub flags: u32,
}

/// An open file handle. The `Arc` strong count is the handle
/// reference count; the node reference is held for the lifetime of
/// the handle.
pub struct OpenFile {
    pub node: Arc<VfsNode>,
    pub flags: OpenFlags,
    offset: AtomicU64,
    pub private: RwLock<Option<Arc<dyn Any + Send + Sync>>>,
}

impl OpenFile {
    fn new(node: Arc<VfsNode>, flags: OpenFlags) -> Arc<Self> {
        Arc::new(Self {
            node,
            flags,
            offset: AtomicU64::new(0),
            private: RwLock::new(None),
        })
    }

    pub fn offset(&self) -> u64 {
        self.offset.load(Ordering::SeqCst)
    }

    pub fn set_offset(&self, offset: u64) {
        self.offset.store(offset, Ordering::SeqCst);
    }

    pub fn advance(&self, n: u64) {
        self.offset.fetch_add(n, Ordering::SeqCst);
    }
}

/// The VFS: a node tree, a filesystem registry and a mount table.
pub struct Vfs {
    root: Arc<VfsNode>,
    filesystems: RwLock<Vec<Arc<dyn FileSystem>>>,
    mounts: RwLock<Vec<Arc<Mount>>>,
    next_ino: AtomicU64,
}

impl Vfs {
    pub fn new() -> Self {
        let root = VfsNode::new("/", NodeType::Directory, 1);
        root.set_perms(0o755);
        Self {
            root,
            filesystems: RwLock::new(Vec::new()),
            mounts: RwLock::new(Vec::new()),
            next_ino: AtomicU64::new(2),
        }
    }

    pub fn root(&self) -> Arc<VfsNode> {
        self.root.clone()
    }

    /// Allocate a fresh unattached node.
    pub fn create_node(&self, name: &str, node_type: NodeType) -> VfsResult<Arc<VfsNode>> {
        if name.is_empty() {
            return Err(VfsError::InvalidPath);
        }
        let ino = self.next_ino.fetch_add(1, Ordering::SeqCst);
        Ok(VfsNode::new(name, node_type, ino))
    }

    /// Attach `child` under `parent`. Duplicate names are rejected.
    pub fn add_child(&self, parent: &Arc<VfsNode>, child: Arc<VfsNode>) -> VfsResult<()> {
        if parent.node_type != NodeType::Directory {
            return Err(VfsError::NotDirectory);
        }
        let mut children = parent.children.write();
        let name = child.name();
        if children.iter().any(|c| *c.name.read() == name) {
            return Err(VfsError::AlreadyExists);
        }
        *child.parent.write() = Arc::downgrade(parent);
        children.push(child);
        Ok(())
    }

    /// Detach `child` from `parent`.
    pub fn remove_child(&self, parent: &Arc<VfsNode>, child: &Arc<VfsNode>) -> VfsResult<()> {
        let mut children = parent.children.write();
        let before = children.len();
        children.retain(|c| !Arc::ptr_eq(c, child));
        if children.len() == before {
            return Err(VfsError::NotFound);
        }
        *child.parent.write() = Weak::new();
        Ok(())
    }

    // ========================================================================
    // Filesystem registry
    // ========================================================================

    pub fn register_filesystem(&self, fs: Arc<dyn FileSystem>) -> VfsResult<()> {
        let mut registry = self.filesystems.write();
        if registry.iter().any(|f| f.name() == fs.name()) {
            return Err(VfsError::AlreadyExists);
        }
        log_debug!("[VFS] registered filesystem: {}", fs.name());
        registry.push(fs);
        Ok(())
    }

    pub fn unregister_filesystem(&self, name: &str) -> VfsResult<()> {
        let mut registry = self.filesystems.write();
        let before = registry.len();
        registry.retain(|f| f.name() != name);
        if registry.len() == before {
            return Err(VfsError::NotFound);
        }
        Ok(())
    }

    fn find_filesystem(&self, name: &str) -> Option<Arc<dyn FileSystem>> {
        self.filesystems
            .read()
            .iter()
            .find(|f| f.name() == name)
            .cloned()
    }

    // ========================================================================
    // Path resolution
    // ========================================================================

    /// Resolve an absolute path to a node. A mount descriptor on an
    /// intermediate node transparently diverts into the mounted root;
    /// the final node is returned as-is (see [`Vfs::resolve`]).
    pub fn lookup(&self, path: &str) -> Option<Arc<VfsNode>> {
        if !path.starts_with('/') {
            return None;
        }

        let mut current = self.root.clone();
        for component in path.split('/') {
            if component.is_empty() || component == "." {
                continue;
            }
            if component == ".." {
                if let Some(parent) = current.parent() {
                    current = parent;
                }
                continue;
            }

            // Cross a mount point before descending
            if let Some(mount) = current.mount() {
                current = mount.root.clone();
            }

            let from_ops = current
                .ops()
                .and_then(|ops| ops.lookup(&current, component));
            let child = match from_ops {
                Some(node) => Some(node),
                None => current.find_child(component),
            };

            current = child?;
        }

        Some(current)
    }

    /// Resolve a path, following a mount on the final node too.
    pub fn resolve(&self, path: &str) -> Option<Arc<VfsNode>> {
        let node = self.lookup(path)?;
        match node.mount() {
            Some(mount) => Some(mount.root.clone()),
            None => Some(node),
        }
    }

    /// Parent directory of `path` plus the final component name.
    pub fn lookup_parent(&self, path: &str) -> Option<(Arc<VfsNode>, String)> {
        if !path.starts_with('/') {
            return None;
        }
        let trimmed = path.trim_end_matches('/');
        let (dir, base) = match trimmed.rfind('/') {
            Some(0) | None => ("/", trimmed.trim_start_matches('/')),
            Some(pos) => (&trimmed[..pos], &trimmed[pos + 1..]),
        };
        if base.is_empty() {
            return None;
        }
        let parent = self.resolve(dir)?;
        Some((parent, base.to_string()))
    }

    // ========================================================================
    // Mounting
    // ========================================================================

    pub fn mount(
        &self,
        source: Option<&str>,
        target: &str,
        fstype: &str,
        flags: u32,
        options: Option<&str>,
    ) -> VfsResult<()> {
        let fs = self.find_filesystem(fstype).ok_or(VfsError::NotFound)?;
        let mount_point = self.lookup(target).ok_or(VfsError::NotFound)?;
        if mount_point.mount().is_some() {
            return Err(VfsError::Busy);
        }

        let root = fs.mount(self, source, options)?;
        let mount = Arc::new(Mount {
            fs,
            root,
            mount_point: Arc::downgrade(&mount_point),
            source: source.unwrap_or("").to_string(),
            target: target.to_string(),
            flags,
        });

        *mount_point.mount.write() = Some(mount.clone());
        self.mounts.write().push(mount);

        log!("[VFS] mounted {} on {}", fstype, target);
        Ok(())
    }

    pub fn unmount(&self, target: &str) -> VfsResult<()> {
        let mount = {
            let mounts = self.mounts.read();
            mounts.iter().find(|m| m.target == target).cloned()
        }
        .ok_or(VfsError::NotFound)?;

        mount.fs.unmount(&mount)?;

        if let Some(mount_point) = mount.mount_point.upgrade() {
            *mount_point.mount.write() = None;
        }
        self.mounts.write().retain(|m| m.target != target);

        log!("[VFS] unmounted {}", target);
        Ok(())
    }

    pub fn list_mounts(&self) -> Vec<(String, String)> {
        self.mounts
            .read()
            .iter()
            .map(|m| (m.target.clone(), m.fs.name().to_string()))
            .collect()
    }

    // ========================================================================
    // File operations
    // ========================================================================

    pub fn open(&self, path: &str, flags: OpenFlags) -> VfsResult<Arc<OpenFile>> {
        let node = match self.lookup(path) {
            Some(node) => node,
            None if flags.create() => {
                let (parent, name) =
                    self.lookup_parent(path).ok_or(VfsError::NotFound)?;
                let created = match parent.ops() {
                    Some(ops) => match ops.create(&parent, &name, 0o644) {
                        Err(VfsError::NotSupported) => false,
                        other => {
                            other?;
                            true
                        }
                    },
                    None => false,
                };
                if !created {
                    let node = self.create_node(&name, NodeType::Regular)?;
                    self.add_child(&parent, node)?;
                }
                self.lookup(path).ok_or(VfsError::NotFound)?
            }
            None => return Err(VfsError::NotFound),
        };

        let file = OpenFile::new(node.clone(), flags);

        if let Some(ops) = node.ops() {
            ops.open(&node, &file)?;
        }

        if flags.truncate() {
            node.set_size(0);
        }
        if flags.append() {
            file.set_offset(node.size());
        }

        Ok(file)
    }

    pub fn close(&self, file: &Arc<OpenFile>) -> VfsResult<()> {
        match file.node.ops() {
            Some(ops) => ops.close(file),
            None => Ok(()),
        }
    }

    pub fn read(&self, file: &Arc<OpenFile>, buf: &mut [u8]) -> VfsResult<usize> {
        if !file.flags.readable() {
            return Err(VfsError::PermissionDenied);
        }
        match file.node.ops() {
            Some(ops) => ops.read(file, buf),
            None => Err(VfsError::NotSupported),
        }
    }

    pub fn write(&self, file: &Arc<OpenFile>, buf: &[u8]) -> VfsResult<usize> {
        if !file.flags.writable() {
            return Err(VfsError::PermissionDenied);
        }
        match file.node.ops() {
            Some(ops) => ops.write(file, buf),
            None => Err(VfsError::NotSupported),
        }
    }

    pub fn seek(&self, file: &Arc<OpenFile>, offset: i64, whence: u32) -> VfsResult<u64> {
        let new_offset = match whence {
            SEEK_SET => offset,
            SEEK_CUR => file.offset() as i64 + offset,
            SEEK_END => file.node.size() as i64 + offset,
            _ => return Err(VfsError::InvalidArgument),
        };
        if new_offset < 0 {
            return Err(VfsError::InvalidArgument);
        }
        let mut new_offset = new_offset as u64;

        // Defer to a driver-level seek for the actual position
        if let Some(ops) = file.node.ops() {
            match ops.seek(file, offset, whence) {
                Ok(driver_offset) => new_offset = driver_offset,
                Err(VfsError::NotSupported) => {}
                Err(e) => return Err(e),
            }
        }

        file.set_offset(new_offset);
        Ok(new_offset)
    }

    pub fn ioctl(&self, file: &Arc<OpenFile>, request: u64, arg: u64) -> VfsResult<u64> {
        match file.node.ops() {
            Some(ops) => ops.ioctl(file, request, arg),
            None => Err(VfsError::NotSupported),
        }
    }

    // ========================================================================
    // Directory operations
    // ========================================================================

    pub fn mkdir(&self, path: &str, mode: u32) -> VfsResult<()> {
        let (parent, name) = self.lookup_parent(path).ok_or(VfsError::NotFound)?;

        if let Some(ops) = parent.ops() {
            match ops.mkdir(&parent, &name, mode) {
                Err(VfsError::NotSupported) => {}
                other => return other.map(|_| ()),
            }
        }

        if parent.find_child(&name).is_some() {
            return Err(VfsError::AlreadyExists);
        }
        let dir = self.create_node(&name, NodeType::Directory)?;
        dir.set_perms(mode);
        self.add_child(&parent, dir)
    }

    pub fn rmdir(&self, path: &str) -> VfsResult<()> {
        let node = self.lookup(path).ok_or(VfsError::NotFound)?;
        if node.node_type != NodeType::Directory {
            return Err(VfsError::NotDirectory);
        }
        if node.child_count() > 0 {
            return Err(VfsError::NotEmpty);
        }
        if node.mount().is_some() {
            return Err(VfsError::Busy);
        }

        let parent = node.parent().ok_or(VfsError::Busy)?;
        if let Some(ops) = parent.ops() {
            match ops.rmdir(&parent, &node.name()) {
                Err(VfsError::NotSupported) => {}
                other => return other,
            }
        }
        self.remove_child(&parent, &node)
    }

    pub fn create(&self, path: &str, mode: u32) -> VfsResult<()> {
        let (parent, name) = self.lookup_parent(path).ok_or(VfsError::NotFound)?;

        if let Some(ops) = parent.ops() {
            match ops.create(&parent, &name, mode) {
                Err(VfsError::NotSupported) => {}
                other => return other.map(|_| ()),
            }
        }

        if parent.find_child(&name).is_some() {
            return Err(VfsError::AlreadyExists);
        }
        let node = self.create_node(&name, NodeType::Regular)?;
        node.set_perms(mode);
        self.add_child(&parent, node)
    }

    pub fn unlink(&self, path: &str) -> VfsResult<()> {
        let node = self.lookup(path).ok_or(VfsError::NotFound)?;
        if node.node_type == NodeType::Directory {
            return Err(VfsError::IsDirectory);
        }

        let parent = node.parent().ok_or(VfsError::NotFound)?;
        if let Some(ops) = parent.ops() {
            match ops.unlink(&parent, &node.name()) {
                Err(VfsError::NotSupported) => {}
                other => return other,
            }
        }
        self.remove_child(&parent, &node)
    }

    pub fn readdir(&self, path: &str) -> VfsResult<Vec<DirEntry>> {
        let node = self.resolve(path).ok_or(VfsError::NotFound)?;
        if node.node_type != NodeType::Directory {
            return Err(VfsError::NotDirectory);
        }

        if let Some(ops) = node.ops() {
            match ops.readdir(&node) {
                Err(VfsError::NotSupported) => {}
                other => return other,
            }
        }

        Ok(node
            .children()
            .iter()
            .map(|c| DirEntry {
                name: c.name(),
                ino: c.ino,
                node_type: c.node_type,
            })
            .collect())
    }

    // ========================================================================
    // Stat
    // ========================================================================

    pub fn stat_node(&self, node: &Arc<VfsNode>) -> VfsResult<Stat> {
        if let Some(ops) = node.ops() {
            match ops.stat(node) {
                Err(VfsError::NotSupported) => {}
                other => return other,
            }
        }

        let meta = node.meta.read();
        let type_bits = match node.node_type {
            NodeType::Regular => 0o10,
            NodeType::Directory => 0o4,
            NodeType::CharDevice => 0o2,
            NodeType::BlockDevice => 0o6,
            NodeType::Pipe => 0o1,
            NodeType::Symlink => 0o12,
            NodeType::Socket => 0o14,
        };
        Ok(Stat {
            ino: node.ino,
            mode: meta.perms | (type_bits << 12),
            uid: meta.uid,
            gid: meta.gid,
            size: meta.size,
            rdev: (meta.dev_major << 8) | meta.dev_minor,
            atime: meta.atime,
            mtime: meta.mtime,
            ctime: meta.ctime,
        })
    }

    pub fn stat(&self, path: &str) -> VfsResult<Stat> {
        let node = self.resolve(path).ok_or(VfsError::NotFound)?;
        self.stat_node(&node)
    }

    pub fn fstat(&self, file: &Arc<OpenFile>) -> VfsResult<Stat> {
        self.stat_node(&file.node)
    }
}

impl Default for Vfs {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Global instance
// ============================================================================

lazy_static! {
    static ref VFS: Vfs = Vfs::new();
}

/// The kernel-wide VFS instance.
pub fn instance() -> &'static Vfs {
    &VFS
}

/// Initialize the VFS tree.
pub fn init() {
    let _ = instance();
    log!("[OK] VFS initialized");
}

pub fn lookup(path: &str) -> Option<Arc<VfsNode>> {
    VFS.lookup(path)
}

pub fn mount(
    source: Option<&str>,
    target: &str,
    fstype: &str,
    flags: u32,
    options: Option<&str>,
) -> VfsResult<()> {
    VFS.mount(source, target, fstype, flags, options)
}

pub fn unmount(target: &str) -> VfsResult<()> {
    VFS.unmount(target)
}

pub fn open(path: &str, flags: OpenFlags) -> VfsResult<Arc<OpenFile>> {
    VFS.open(path, flags)
}

pub fn close(file: &Arc<OpenFile>) -> VfsResult<()> {
    VFS.close(file)
}

pub fn read(file: &Arc<OpenFile>, buf: &mut [u8]) -> VfsResult<usize> {
    VFS.read(file, buf)
}

pub fn write(file: &Arc<OpenFile>, buf: &[u8]) -> VfsResult<usize> {
    VFS.write(file, buf)
}

pub fn seek(file: &Arc<OpenFile>, offset: i64, whence: u32) -> VfsResult<u64> {
    VFS.seek(file, offset, whence)
}

pub fn ioctl(file: &Arc<OpenFile>, request: u64, arg: u64) -> VfsResult<u64> {
    VFS.ioctl(file, request, arg)
}

pub fn mkdir(path: &str, mode: u32) -> VfsResult<()> {
    VFS.mkdir(path, mode)
}

pub fn rmdir(path: &str) -> VfsResult<()> {
    VFS.rmdir(path)
}

pub fn create(path: &str, mode: u32) -> VfsResult<()> {
    VFS.create(path, mode)
}

pub fn unlink(path: &str) -> VfsResult<()> {
    VFS.unlink(path)
}

pub fn stat(path: &str) -> VfsResult<Stat> {
    VFS.stat(path)
}

pub fn fstat(file: &Arc<OpenFile>) -> VfsResult<Stat> {
    VFS.fstat(file)
}

pub fn readdir(path: &str) -> VfsResult<Vec<DirEntry>> {
    VFS.readdir(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// RAM-backed file ops used to exercise the vtable plumbing
    struct MemFileOps {
        data: RwLock<Vec<u8>>,
    }

    impl MemFileOps {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                data: RwLock::new(Vec::new()),
            })
        }
    }

    impl NodeOps for MemFileOps {
        fn read(&self, file: &OpenFile, buf: &mut [u8]) -> VfsResult<usize> {
            let data = self.data.read();
            let offset = file.offset() as usize;
            if offset >= data.len() {
                return Ok(0);
            }
            let n = buf.len().min(data.len() - offset);
            buf[..n].copy_from_slice(&data[offset..offset + n]);
            file.advance(n as u64);
            Ok(n)
        }

        fn write(&self, file: &OpenFile, buf: &[u8]) -> VfsResult<usize> {
            let mut data = self.data.write();
            let offset = file.offset() as usize;
            if data.len() < offset + buf.len() {
                data.resize(offset + buf.len(), 0);
            }
            data[offset..offset + buf.len()].copy_from_slice(buf);
            file.advance(buf.len() as u64);
            file.node.set_size(data.len() as u64);
            Ok(buf.len())
        }
    }

    /// One-directory filesystem whose root carries a single file
    struct TestFs {
        root: RwLock<Option<Arc<VfsNode>>>,
    }

    impl TestFs {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                root: RwLock::new(None),
            })
        }
    }

    impl FileSystem for TestFs {
        fn name(&self) -> &str {
            "testfs"
        }

        fn mount(
            &self,
            vfs: &Vfs,
            _source: Option<&str>,
            _options: Option<&str>,
        ) -> VfsResult<Arc<VfsNode>> {
            let root = vfs.create_node("testfs-root", NodeType::Directory)?;
            let inner = vfs.create_node("inner", NodeType::Regular)?;
            inner.set_ops(MemFileOps::new());
            vfs.add_child(&root, inner)?;
            *self.root.write() = Some(root.clone());
            Ok(root)
        }
    }

    fn tree() -> Vfs {
        let vfs = Vfs::new();
        vfs.mkdir("/a", 0o755).unwrap();
        vfs.mkdir("/a/b", 0o755).unwrap();
        vfs.create("/a/b/f", 0o644).unwrap();
        vfs
    }

    #[test]
    fn path_resolution() {
        let vfs = tree();

        let f = vfs.lookup("/a/b/f").unwrap();
        assert_eq!(f.name(), "f");
        assert_eq!(f.node_type(), NodeType::Regular);

        // Dots, double slashes and parent hops collapse
        let same = vfs.lookup("/a/./b/../b//f").unwrap();
        assert!(Arc::ptr_eq(&f, &same));

        // Parent traversal from the root stays at the root
        assert!(Arc::ptr_eq(&vfs.lookup("/..").unwrap(), &vfs.root()));

        assert!(vfs.lookup("/a/missing").is_none());
        assert!(vfs.lookup("relative/path").is_none());
    }

    #[test]
    fn duplicate_names_rejected() {
        let vfs = tree();
        assert_eq!(vfs.create("/a/b/f", 0o644), Err(VfsError::AlreadyExists));
        assert_eq!(vfs.mkdir("/a/b", 0o755), Err(VfsError::AlreadyExists));
    }

    #[test]
    fn parent_links_reach_the_root() {
        let vfs = tree();
        let mut node = vfs.lookup("/a/b/f").unwrap();
        let mut hops = 0;
        while let Some(parent) = node.parent() {
            node = parent;
            hops += 1;
            assert!(hops < 16);
        }
        assert!(Arc::ptr_eq(&node, &vfs.root()));
    }

    #[test]
    fn open_create_write_read() {
        let vfs = tree();

        // O_CREAT materializes the file
        let file = vfs
            .open("/a/new", OpenFlags(OpenFlags::O_RDWR | OpenFlags::O_CREAT))
            .unwrap();
        file.node.set_ops(MemFileOps::new());

        assert_eq!(vfs.write(&file, b"hello world").unwrap(), 11);
        assert_eq!(file.node.size(), 11);

        vfs.seek(&file, 0, SEEK_SET).unwrap();
        let mut buf = [0u8; 16];
        assert_eq!(vfs.read(&file, &mut buf).unwrap(), 11);
        assert_eq!(&buf[..11], b"hello world");

        vfs.close(&file).unwrap();
    }

    #[test]
    fn append_and_truncate_flags() {
        let vfs = tree();
        let node = vfs.lookup("/a/b/f").unwrap();
        node.set_ops(MemFileOps::new());
        node.set_size(5);

        let appender = vfs
            .open("/a/b/f", OpenFlags(OpenFlags::O_WRONLY | OpenFlags::O_APPEND))
            .unwrap();
        assert_eq!(appender.offset(), 5);

        let truncator = vfs
            .open("/a/b/f", OpenFlags(OpenFlags::O_WRONLY | OpenFlags::O_TRUNC))
            .unwrap();
        assert_eq!(truncator.offset(), 0);
        assert_eq!(node.size(), 0);
    }

    #[test]
    fn missing_ops_return_not_supported() {
        let vfs = tree();
        let file = vfs.open("/a/b/f", OpenFlags(OpenFlags::O_RDWR)).unwrap();
        let mut buf = [0u8; 4];
        assert_eq!(vfs.read(&file, &mut buf), Err(VfsError::NotSupported));
        assert_eq!(vfs.write(&file, &buf), Err(VfsError::NotSupported));
        assert_eq!(vfs.ioctl(&file, 0, 0), Err(VfsError::NotSupported));
    }

    #[test]
    fn seek_whence_and_negative_rejection() {
        let vfs = tree();
        let node = vfs.lookup("/a/b/f").unwrap();
        node.set_size(100);
        let file = vfs.open("/a/b/f", OpenFlags(OpenFlags::O_RDONLY)).unwrap();

        assert_eq!(vfs.seek(&file, 10, SEEK_SET).unwrap(), 10);
        assert_eq!(vfs.seek(&file, 5, SEEK_CUR).unwrap(), 15);
        assert_eq!(vfs.seek(&file, -20, SEEK_END).unwrap(), 80);
        assert_eq!(
            vfs.seek(&file, -200, SEEK_CUR),
            Err(VfsError::InvalidArgument)
        );
        assert_eq!(vfs.seek(&file, 0, 9), Err(VfsError::InvalidArgument));
        // Failed seeks leave the offset alone
        assert_eq!(file.offset(), 80);
    }

    #[test]
    fn mount_transparency_and_unmount_roundtrip() {
        let vfs = tree();
        vfs.register_filesystem(TestFs::new()).unwrap();
        vfs.mkdir("/mnt", 0o755).unwrap();

        let before_children = vfs.lookup("/mnt").unwrap().child_count();

        vfs.mount(None, "/mnt", "testfs", 0, None).unwrap();

        // Resolution crosses into the mounted root
        let inner = vfs.lookup("/mnt/inner").unwrap();
        assert_eq!(inner.name(), "inner");

        let names: Vec<String> = vfs
            .readdir("/mnt")
            .unwrap()
            .into_iter()
            .map(|e| e.name)
            .collect();
        assert!(names.contains(&"inner".to_string()));

        // Double mount on the same node is refused
        assert_eq!(
            vfs.mount(None, "/mnt", "testfs", 0, None),
            Err(VfsError::Busy)
        );

        vfs.unmount("/mnt").unwrap();
        assert!(vfs.lookup("/mnt/inner").is_none());
        assert!(vfs.list_mounts().is_empty());
        assert_eq!(vfs.lookup("/mnt").unwrap().child_count(), before_children);

        assert_eq!(vfs.unmount("/mnt"), Err(VfsError::NotFound));
    }

    #[test]
    fn unknown_fstype_fails_mount() {
        let vfs = tree();
        assert_eq!(
            vfs.mount(None, "/a", "nosuchfs", 0, None),
            Err(VfsError::NotFound)
        );
    }

    #[test]
    fn rmdir_and_unlink_rules() {
        let vfs = tree();
        assert_eq!(vfs.rmdir("/a"), Err(VfsError::NotEmpty));
        assert_eq!(vfs.rmdir("/a/b/f"), Err(VfsError::NotDirectory));
        assert_eq!(vfs.unlink("/a/b"), Err(VfsError::IsDirectory));

        vfs.unlink("/a/b/f").unwrap();
        assert!(vfs.lookup("/a/b/f").is_none());
        vfs.rmdir("/a/b").unwrap();
        vfs.rmdir("/a").unwrap();
        assert_eq!(vfs.root().child_count(), 0);
    }

    #[test]
    fn stat_fallback_reports_node_fields() {
        let vfs = tree();
        let node = vfs.lookup("/a/b/f").unwrap();
        node.set_size(42);
        node.set_perms(0o600);

        let st = vfs.stat("/a/b/f").unwrap();
        assert_eq!(st.size, 42);
        assert_eq!(st.mode & 0o777, 0o600);
        assert_eq!(st.ino, node.ino());

        let dir = vfs.stat("/a").unwrap();
        assert_eq!((dir.mode >> 12) & 0o17, 0o4);
    }
}
