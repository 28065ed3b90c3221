//! Split code/data address space.
//!
//! Code space is the ROM analogue that holds the instruction stream, data
//! space is the RAM analogue. The first eight data cells double as the
//! register file R0-R7. Every access is bounds-checked against the size the
//! space was created with; nothing wraps around.

use std::fmt;

use thiserror::Error;

/// Default code-space size in bytes.
pub const DEFAULT_CODE_SIZE: usize = 4096;
/// Default data-space size in bytes.
pub const DEFAULT_DATA_SIZE: usize = 128;
/// The program counter is 16 bits wide, so code space can't be larger.
pub const MAX_CODE_SIZE: usize = 0x10000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Space {
    Code,
    Data,
}

impl fmt::Display for Space {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Code => write!(f, "CODE"),
            Self::Data => write!(f, "DATA"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MemoryError {
    #[error("{space} address {addr:#06X} out of range (length {len:#06X})")]
    OutOfBounds { space: Space, addr: usize, len: usize },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("{0} space must not be empty")]
    Empty(Space),
    #[error("code space of {0} bytes exceeds the 16-bit program counter range")]
    CodeTooLarge(usize),
}

/// Sizes of the two address spaces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryConfig {
    pub code_size: usize,
    pub data_size: usize,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            code_size: DEFAULT_CODE_SIZE,
            data_size: DEFAULT_DATA_SIZE,
        }
    }
}

impl MemoryConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.code_size == 0 {
            return Err(ConfigError::Empty(Space::Code));
        }
        if self.data_size == 0 {
            return Err(ConfigError::Empty(Space::Data));
        }
        if self.code_size > MAX_CODE_SIZE {
            return Err(ConfigError::CodeTooLarge(self.code_size));
        }
        Ok(())
    }
}

/// Owns code and data memory. Allocated once and never resized.
#[derive(Clone)]
pub struct AddressSpace {
    code: Vec<u8>,
    data: Vec<u8>,
}

impl Default for AddressSpace {
    fn default() -> Self {
        Self {
            code: vec![0; DEFAULT_CODE_SIZE],
            data: vec![0; DEFAULT_DATA_SIZE],
        }
    }
}

impl fmt::Debug for AddressSpace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AddressSpace")
            .field("code_len", &self.code.len())
            .field("data_len", &self.data.len())
            .finish()
    }
}

impl AddressSpace {
    pub fn new(config: MemoryConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            code: vec![0; config.code_size],
            data: vec![0; config.data_size],
        })
    }

    pub fn code_len(&self) -> usize {
        self.code.len()
    }

    pub fn data_len(&self) -> usize {
        self.data.len()
    }

    #[inline]
    fn check(space: Space, addr: usize, len: usize) -> Result<usize, MemoryError> {
        if addr < len {
            Ok(addr)
        } else {
            Err(MemoryError::OutOfBounds { space, addr, len })
        }
    }

    pub fn read_code(&self, addr: usize) -> Result<u8, MemoryError> {
        let addr = Self::check(Space::Code, addr, self.code.len())?;
        Ok(self.code[addr])
    }

    pub fn write_code(&mut self, addr: usize, value: u8) -> Result<(), MemoryError> {
        let addr = Self::check(Space::Code, addr, self.code.len())?;
        self.code[addr] = value;
        Ok(())
    }

    pub fn read_data(&self, addr: usize) -> Result<u8, MemoryError> {
        let addr = Self::check(Space::Data, addr, self.data.len())?;
        Ok(self.data[addr])
    }

    pub fn write_data(&mut self, addr: usize, value: u8) -> Result<(), MemoryError> {
        let addr = Self::check(Space::Data, addr, self.data.len())?;
        self.data[addr] = value;
        Ok(())
    }

    /// Copy a program image into code space starting at `offset`. The whole
    /// image is checked before anything is written.
    pub fn load_code(&mut self, offset: usize, bytes: &[u8]) -> Result<(), MemoryError> {
        if bytes.is_empty() {
            return Ok(());
        }
        let len = self.code.len();
        let end = offset
            .checked_add(bytes.len())
            .ok_or(MemoryError::OutOfBounds {
                space: Space::Code,
                addr: offset,
                len,
            })?;
        Self::check(Space::Code, end - 1, len)?;
        self.code[offset..end].copy_from_slice(bytes);
        Ok(())
    }

    /// Read-only view of code space, for dumps.
    pub fn code(&self) -> &[u8] {
        &self.code
    }

    /// Read-only view of data space, for dumps.
    pub fn data(&self) -> &[u8] {
        &self.data
    }
}
