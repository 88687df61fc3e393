//! VM construction parameters.

/// Capacities resolved once at VM construction.
///
/// # Example
///
/// ```ignore
/// use kiln_vm::VmConfig;
///
/// // A small sandbox for untrusted archives.
/// let config = VmConfig {
///     heap_capacity: 4 * 1024,
///     ..Default::default()
/// };
/// ```
#[derive(Debug, Clone)]
pub struct VmConfig {
    /// Operand stack slots.
    ///
    /// Default: 4096
    pub stack_capacity: usize,

    /// Call frame slots; bounds the recursion depth.
    ///
    /// Default: 4096
    pub frame_capacity: usize,

    /// Heap region size in bytes.
    ///
    /// Default: 64KB
    pub heap_capacity: u32,
}

impl Default for VmConfig {
    fn default() -> Self {
        VmConfig {
            stack_capacity: 4096,
            frame_capacity: 4096,
            heap_capacity: 64 * 1024,
        }
    }
}
