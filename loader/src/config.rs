use crate::relocator::Preference;

/// Placement policy for the chunks the composer requests.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BootConfig {
    /// Exclusive end of the window the argv blob and initrd must fit in.
    /// Argument slots are 32 bits wide, so this never exceeds 4 GiB.
    pub args_limit: u64,
    pub args_align: u64,
    pub initrd_align: u64,
    pub preference: Preference
}

impl Default for BootConfig {
    fn default() -> Self {
        Self {
            args_limit: 0x1_0000_0000,
            args_align: 8,
            initrd_align: 0x10000,
            preference: Preference::High
        }
    }
}

impl BootConfig {
    pub fn with_args_limit(mut self, limit: u64) -> Self { self.args_limit = limit.min(0x1_0000_0000); self }
    pub fn with_args_align(mut self, align: u64) -> Self { self.args_align = align.max(1); self }
    pub fn with_initrd_align(mut self, align: u64) -> Self { self.initrd_align = align.max(1); self }
    pub fn with_preference(mut self, pref: Preference) -> Self { self.preference = pref; self }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn limit_is_clamped_to_32_bits() {
        let cfg = BootConfig::default().with_args_limit(u64::MAX);
        assert_eq!(cfg.args_limit, 0x1_0000_0000);
        assert_eq!(BootConfig::default().with_initrd_align(0).initrd_align, 1);
    }
}
