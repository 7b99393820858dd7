use super::memory::{Width, read_be, write_be};
use crate::virtual_machine::errors::VMError;

/// The machine stack.
///
/// A byte buffer that grows on push up to a fixed capacity. The top of the
/// stack is [`len`](Self::len); the VM mirrors it into `sp` after every push
/// and pop.
#[derive(Debug)]
pub struct Stack {
    data: Vec<u8>,
    capacity: usize,
}

impl Stack {
    pub fn new(capacity: usize) -> Self {
        Self {
            data: Vec::new(),
            capacity,
        }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Pushes the low `width` bytes of `value`.
    pub fn push(&mut self, width: Width, value: u64) -> Result<(), VMError> {
        let w = width.bytes();
        if self.data.len() + w > self.capacity {
            return Err(VMError::StackPushError {
                width: w,
                capacity: self.capacity,
            });
        }
        let start = self.data.len();
        self.data.resize(start + w, 0);
        write_be(&mut self.data[start..], width, value);
        Ok(())
    }

    /// Pops `width` bytes, zero-extended.
    pub fn pop(&mut self, width: Width) -> Result<u64, VMError> {
        let w = width.bytes();
        let Some(start) = self.data.len().checked_sub(w) else {
            return Err(VMError::StackPopError {
                width: w,
                available: self.data.len(),
            });
        };
        let value = read_be(&self.data[start..], width);
        self.data.truncate(start);
        Ok(value)
    }
}
