//! The vmtest kernel configuration.
//!
//! The same fragment is used for every supported branch; `make olddefconfig`
//! fills in everything it does not mention.

/// Kernel branches the configuration is known to build and boot.
pub const SUPPORTED_KERNEL_VERSIONS: &[&str] = &["5.12", "4.4"];

const KCONFIG: &str = r#"# Minimal Linux kernel configuration for booting into vmtest and running drgn
# tests.

CONFIG_LOCALVERSION="-vmtest2"

CONFIG_SMP=y
CONFIG_MODULES=y

# We run the tests in KVM.
CONFIG_HYPERVISOR_GUEST=y
CONFIG_KVM_GUEST=y
CONFIG_PARAVIRT=y
CONFIG_PARAVIRT_SPINLOCKS=y

# Minimum requirements for vmtest.
CONFIG_9P_FS=y
CONFIG_DEVTMPFS=y
CONFIG_INET=y
CONFIG_NET=y
CONFIG_NETWORK_FILESYSTEMS=y
CONFIG_NET_9P=y
CONFIG_NET_9P_VIRTIO=y
CONFIG_OVERLAY_FS=y
CONFIG_PCI=y
CONFIG_PROC_FS=y
CONFIG_SERIAL_8250=y
CONFIG_SERIAL_8250_CONSOLE=y
CONFIG_SYSFS=y
CONFIG_TMPFS=y
CONFIG_TMPFS_XATTR=y
CONFIG_VIRTIO_CONSOLE=y
CONFIG_VIRTIO_PCI=y

# drgn needs /proc/kcore for live debugging.
CONFIG_PROC_KCORE=y
# In some cases, it also needs /proc/kallsyms.
CONFIG_KALLSYMS=y
CONFIG_KALLSYMS_ALL=y

# drgn needs debug info.
CONFIG_DEBUG_KERNEL=y
CONFIG_DEBUG_INFO=y
CONFIG_DEBUG_INFO_DWARF4=y

# Before Linux kernel commit 8757dc970f55 ("x86/crash: Define
# arch_crash_save_vmcoreinfo() if CONFIG_CRASH_CORE=y") (in v5.6), some
# important information in VMCOREINFO is initialized by the kexec code.
CONFIG_KEXEC=y

# For block tests.
CONFIG_BLK_DEV_LOOP=m

# For kconfig tests.
CONFIG_IKCONFIG=m
CONFIG_IKCONFIG_PROC=y
"#;

/// The kernel configuration fragment written before `olddefconfig`.
pub fn kconfig() -> &'static str {
    KCONFIG
}

/// Whether `branch` (e.g. "5.12") is in [`SUPPORTED_KERNEL_VERSIONS`].
pub fn is_supported_version(branch: &str) -> bool {
    SUPPORTED_KERNEL_VERSIONS.contains(&branch)
}
