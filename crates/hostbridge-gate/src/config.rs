/// Limits applied when loading a registry from disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegistryConfig {
    /// Maximum bytes in a registry file.
    pub max_file_size: usize,
    /// Maximum exact names plus prefixes in a single mode table.
    pub max_entries_per_mode: usize,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            max_file_size: 256 * 1024,
            max_entries_per_mode: 4096,
        }
    }
}
