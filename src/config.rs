//! Machine configuration.

use crate::vm::VmError;

pub const DEFAULT_MEMORY_SIZE: usize = 1000; // Cells of memory shared by code, data and stack.
pub const DEFAULT_STACK_LOCATION: usize = 500; // Initial SP and FP.

/// Construction-time parameters of a [`VirtualMachine`](crate::vm::VirtualMachine).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VmConfig {
    pub memory_size: usize,
    pub stack_location: usize,
    /// When false, DBG executes as a no-op instead of opening the debugger.
    pub debugger: bool,
}

impl Default for VmConfig {
    fn default() -> Self {
        VmConfig {
            memory_size: DEFAULT_MEMORY_SIZE,
            stack_location: DEFAULT_STACK_LOCATION,
            debugger: true,
        }
    }
}

impl VmConfig {
    pub fn with_memory_size(mut self, memory_size: usize) -> Self {
        self.memory_size = memory_size;
        self
    }

    pub fn with_stack_location(mut self, stack_location: usize) -> Self {
        self.stack_location = stack_location;
        self
    }

    pub fn with_debugger(mut self, enabled: bool) -> Self {
        self.debugger = enabled;
        self
    }

    pub fn validate(&self) -> Result<(), VmError> {
        if self.memory_size == 0 {
            return Err(VmError::InvalidConfig("memory size must be non-zero".into()));
        }
        if self.stack_location >= self.memory_size {
            return Err(VmError::InvalidConfig(format!(
                "stack location {} is outside memory of {} cells",
                self.stack_location, self.memory_size
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert_eq!(VmConfig::default().validate(), Ok(()));
    }

    #[test]
    fn stack_must_start_inside_memory() {
        let config = VmConfig::default().with_memory_size(100).with_stack_location(100);
        assert!(matches!(config.validate(), Err(VmError::InvalidConfig(_))));
        assert!(VmConfig::default().with_memory_size(0).validate().is_err());
    }
}
