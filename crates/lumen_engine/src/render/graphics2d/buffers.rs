//! Growable CPU buffers for the 2D draw list
//!
//! Capacity doubles until a request fits and is never given back, so after
//! a few frames the buffers settle at the frame's high-water mark and no
//! further allocation happens. Only the live length is reset between frames.

use bytemuck::{Pod, Zeroable};

/// Vertex of the 2D draw list
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Default, Pod, Zeroable)]
pub struct Vertex2D {
    /// Pixel position, top-left origin
    pub position: [f32; 2],
    /// Texture coordinate
    pub uv: [f32; 2],
    /// Vertex color (RGBA)
    pub color: [f32; 4],
}

impl Vertex2D {
    /// Create a vertex
    pub fn new(position: [f32; 2], uv: [f32; 2], color: [f32; 4]) -> Self {
        Self { position, uv, color }
    }
}

/// Length-tracked buffer with geometric growth
#[derive(Debug, Clone)]
pub struct GrowableBuffer<T: Pod> {
    storage: Vec<T>,
    len: usize,
}

impl<T: Pod> GrowableBuffer<T> {
    /// Buffer with room for `capacity` elements
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            storage: vec![T::zeroed(); capacity],
            len: 0,
        }
    }

    /// Elements in use
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether no element is in use
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Elements the storage can hold
    pub fn capacity(&self) -> usize {
        self.storage.len()
    }

    /// Double the capacity until `required` elements fit; returns whether it grew
    pub fn ensure_capacity(&mut self, required: usize) -> bool {
        let mut capacity = self.storage.len();
        if required <= capacity {
            return false;
        }
        while capacity < required {
            capacity = (capacity * 2).max(1);
        }
        self.storage.resize(capacity, T::zeroed());
        true
    }

    /// Reset the length to `len`, growing as needed, and return the live slice
    pub fn reset_to(&mut self, len: usize) -> &mut [T] {
        self.ensure_capacity(len);
        self.len = len;
        &mut self.storage[..len]
    }

    /// Append elements; returns the index of the first one
    pub fn extend_from_slice(&mut self, values: &[T]) -> usize {
        let start = self.len;
        self.ensure_capacity(start + values.len());
        self.storage[start..start + values.len()].copy_from_slice(values);
        self.len += values.len();
        start
    }

    /// Live elements
    pub fn as_slice(&self) -> &[T] {
        &self.storage[..self.len]
    }

    /// Live elements, mutable
    pub fn as_mut_slice(&mut self) -> &mut [T] {
        &mut self.storage[..self.len]
    }

    /// Live elements as bytes
    pub fn live_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(self.as_slice())
    }

    /// Whole storage as bytes, used to size the GPU buffer
    pub fn storage_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.storage)
    }

    /// Forget the contents but keep the capacity
    pub fn clear(&mut self) {
        self.len = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vertex_is_tightly_packed() {
        assert_eq!(std::mem::size_of::<Vertex2D>(), 32);
    }

    #[test]
    fn test_capacity_doubles_until_it_fits() {
        let mut buffer = GrowableBuffer::<u32>::with_capacity(4);
        assert!(!buffer.ensure_capacity(4));
        assert!(buffer.ensure_capacity(9));
        assert_eq!(buffer.capacity(), 16);
    }

    #[test]
    fn test_clear_keeps_capacity() {
        let mut buffer = GrowableBuffer::<u32>::with_capacity(2);
        buffer.extend_from_slice(&[1, 2, 3, 4, 5]);
        assert_eq!(buffer.capacity(), 8);
        assert_eq!(buffer.as_slice(), &[1, 2, 3, 4, 5]);
        buffer.clear();
        assert!(buffer.is_empty());
        assert_eq!(buffer.capacity(), 8);
        assert_eq!(buffer.extend_from_slice(&[9]), 0);
    }

    #[test]
    fn test_zero_capacity_grows() {
        let mut buffer = GrowableBuffer::<f32>::with_capacity(0);
        buffer.reset_to(3).copy_from_slice(&[1.0, 2.0, 3.0]);
        assert_eq!(buffer.capacity(), 4);
        assert_eq!(buffer.len(), 3);
    }
}
