//! Flat word-addressed memory shared by code, data and the stack.

use crate::vm::{Value, VmError};

/// Fixed-size, zero-initialized store of integer cells.
///
/// Every access is bounds-checked; an out-of-range address yields
/// [`VmError::AddressOutOfBounds`] instead of touching neighbouring state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Memory {
    cells: Vec<Value>,
}

impl Memory {
    pub fn new(size: usize) -> Self {
        Memory {
            cells: vec![0; size],
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.cells.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// Converts a machine value into a cell index, rejecting negatives and
    /// anything at or past the end.
    #[inline]
    pub fn address(&self, addr: Value) -> Result<usize, VmError> {
        match usize::try_from(addr) {
            Ok(index) if index < self.cells.len() => Ok(index),
            _ => Err(VmError::AddressOutOfBounds(addr)),
        }
    }

    #[inline]
    pub fn read(&self, addr: usize) -> Result<Value, VmError> {
        self.cells
            .get(addr)
            .copied()
            .ok_or(VmError::AddressOutOfBounds(addr as Value))
    }

    #[inline]
    pub fn write(&mut self, addr: usize, value: Value) -> Result<(), VmError> {
        let slot = self
            .cells
            .get_mut(addr)
            .ok_or(VmError::AddressOutOfBounds(addr as Value))?;
        *slot = value;
        Ok(())
    }

    /// Copies `words` into memory starting at `offset`. Nothing is written
    /// unless the whole block fits.
    pub fn write_block(&mut self, offset: usize, words: &[Value]) -> Result<(), VmError> {
        let end = offset
            .checked_add(words.len())
            .filter(|&end| end <= self.cells.len())
            .ok_or(VmError::AddressOutOfBounds(
                offset.saturating_add(words.len()) as Value,
            ))?;
        self.cells[offset..end].copy_from_slice(words);
        Ok(())
    }

    /// Returns up to `len` cells starting at `addr`, clipped to the end of memory.
    pub fn window(&self, addr: usize, len: usize) -> Result<&[Value], VmError> {
        if addr > self.cells.len() {
            return Err(VmError::AddressOutOfBounds(addr as Value));
        }
        let end = addr.saturating_add(len).min(self.cells.len());
        Ok(&self.cells[addr..end])
    }

    pub fn fill(&mut self, value: Value) {
        self.cells.iter_mut().for_each(|cell| *cell = value);
    }

    pub fn as_slice(&self) -> &[Value] {
        &self.cells
    }
}
