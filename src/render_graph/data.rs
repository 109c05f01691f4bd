//! Uniform data blocks
//!
//! A data block is a named, ordered group of CPU-side arrays uploaded as a
//! single uniform buffer. The caller keeps clones of the [`UniformArray`]
//! handles and mutates them between frames; the registry reads them only
//! when the frame executor refreshes the blocks.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;

use bytemuck::Pod;

use crate::backend::{BufferHandle, GraphicsBackend};
use crate::error::{ConfigError, EngineResult};

/// Something that contributes bytes to a data block.
pub trait UniformSource {
    /// Number of bytes appended by [`UniformSource::write_bytes`].
    fn byte_len(&self) -> usize;

    /// Append the current contents to `out`.
    fn write_bytes(&self, out: &mut Vec<u8>);
}

/// Shared fixed-length array of plain-old-data values.
pub struct UniformArray<T: Pod>(Rc<RefCell<Box<[T]>>>);

impl<T: Pod> Clone for UniformArray<T> {
    fn clone(&self) -> Self {
        Self(Rc::clone(&self.0))
    }
}

impl<T: Pod + std::fmt::Debug> std::fmt::Debug for UniformArray<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("UniformArray").field(&self.0.borrow()).finish()
    }
}

impl<T: Pod> UniformArray<T> {
    pub fn new(values: impl Into<Vec<T>>) -> Self {
        Self(Rc::new(RefCell::new(values.into().into_boxed_slice())))
    }

    pub fn zeroed(len: usize) -> Self {
        Self::new(vec![T::zeroed(); len])
    }

    pub fn len(&self) -> usize {
        self.0.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, index: usize) -> Option<T> {
        self.0.borrow().get(index).copied()
    }

    /// Store `value` at `index`; returns false when out of range.
    pub fn set(&self, index: usize, value: T) -> bool {
        match self.0.borrow_mut().get_mut(index) {
            Some(slot) => {
                *slot = value;
                true
            }
            None => false,
        }
    }

    /// Overwrite the leading elements with `values`. Extra values are ignored.
    pub fn write(&self, values: &[T]) {
        let mut data = self.0.borrow_mut();
        let len = values.len().min(data.len());
        data[..len].copy_from_slice(&values[..len]);
    }

    pub fn to_vec(&self) -> Vec<T> {
        self.0.borrow().to_vec()
    }
}

impl<T: Pod> UniformSource for UniformArray<T> {
    fn byte_len(&self) -> usize {
        self.len() * std::mem::size_of::<T>()
    }

    fn write_bytes(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(bytemuck::cast_slice(&self.0.borrow()));
    }
}

/// Identifier of a data block within a scene.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DataBlockId(pub(crate) u64);

/// A registered block and its uniform buffer.
pub struct DataBlock {
    id: DataBlockId,
    name: String,
    arrays: Vec<Box<dyn UniformSource>>,
    size: u64,
    buffer: BufferHandle,
    scratch: Vec<u8>,
}

impl DataBlock {
    pub fn id(&self) -> DataBlockId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Buffer size: the concatenated array bytes rounded up to 16.
    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn buffer(&self) -> BufferHandle {
        self.buffer
    }

    /// Current contents, zero padded to [`DataBlock::size`].
    pub fn bytes(&mut self) -> &[u8] {
        self.scratch.clear();
        for array in &self.arrays {
            array.write_bytes(&mut self.scratch);
        }
        self.scratch.resize(self.size as usize, 0);
        &self.scratch
    }
}

/// Named data blocks of a scene.
#[derive(Default)]
pub struct DataBlockRegistry {
    blocks: BTreeMap<DataBlockId, DataBlock>,
    next_id: u64,
}

impl DataBlockRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a block and allocate its uniform buffer.
    pub fn add<B: GraphicsBackend + ?Sized>(
        &mut self,
        backend: &mut B,
        name: &str,
        arrays: Vec<Box<dyn UniformSource>>,
    ) -> EngineResult<DataBlockId> {
        if self.find(name).is_some() {
            return Err(ConfigError::DuplicateDataBlock(name.to_string()).into());
        }
        let byte_len: usize = arrays.iter().map(|a| a.byte_len()).sum();
        if arrays.is_empty() || byte_len == 0 {
            return Err(ConfigError::EmptyDataBlock(name.to_string()).into());
        }

        let size = (byte_len as u64).next_multiple_of(16);
        let buffer = backend.create_uniform_buffer(name, size)?;

        self.next_id += 1;
        let id = DataBlockId(self.next_id);
        log::debug!(
            "Registered data block '{}' ({} arrays, {} bytes)",
            name,
            arrays.len(),
            size
        );

        self.blocks.insert(
            id,
            DataBlock {
                id,
                name: name.to_string(),
                arrays,
                size,
                buffer,
                scratch: Vec::with_capacity(size as usize),
            },
        );
        Ok(id)
    }

    /// Upload the current contents of every block, once each.
    pub fn refresh<B: GraphicsBackend + ?Sized>(&mut self, backend: &mut B) {
        for block in self.blocks.values_mut() {
            let buffer = block.buffer;
            backend.write_uniform_buffer(buffer, block.bytes());
        }
    }

    pub fn find(&self, name: &str) -> Option<&DataBlock> {
        self.blocks.values().find(|b| b.name == name)
    }

    pub fn get(&self, id: DataBlockId) -> Option<&DataBlock> {
        self.blocks.get(&id)
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// Destroy every block's buffer.
    pub fn release_all<B: GraphicsBackend + ?Sized>(&mut self, backend: &mut B) {
        for (_, block) in std::mem::take(&mut self.blocks) {
            backend.destroy_buffer(block.buffer);
        }
    }
}
