use crate::{BufferHandle, RenderError};

/// How a buffer is bound to the pipelines.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferKind {
    /// Small, per-frame data (binding 0).
    Uniform,
    /// Read-only storage data (binding 1).
    Storage,
    /// Per-instance vertex data (instanced sprite fallback).
    Instance,
}

/// Backend seam for creating and writing GPU-visible buffers.
///
/// Writes are ordered: a write issued before a frame is submitted is visible
/// to that frame, and never to a frame already in flight.
pub trait BufferAllocator {
    /// Allocate a zero-filled buffer of `size` bytes.
    fn allocate(
        &mut self,
        kind: BufferKind,
        label: &str,
        size: u64,
    ) -> Result<BufferHandle, RenderError>;

    /// Write `bytes` at `offset`. The range must fit the buffer's capacity.
    fn write(&mut self, handle: BufferHandle, offset: u64, bytes: &[u8])
    -> Result<(), RenderError>;

    /// Allocated size in bytes, or `None` for an unknown handle.
    fn capacity(&self, handle: BufferHandle) -> Option<u64>;

    /// Bytes from the start of the buffer that hold current data.
    ///
    /// Writes extend it; `set_data_len` shrinks it after a smaller upload so
    /// backends can reject draws that would read past the live data.
    fn data_len(&self, handle: BufferHandle) -> Option<u64>;

    /// Mark only the first `len` bytes as current. `len` must fit the capacity.
    fn set_data_len(&mut self, handle: BufferHandle, len: u64) -> Result<(), RenderError>;

    /// Free a buffer. Unknown handles are ignored.
    fn release(&mut self, handle: BufferHandle);
}

/// End offset of a write, or `OutOfRange` when it overflows or passes `capacity`.
pub fn write_end(offset: u64, len: usize, capacity: u64) -> Result<u64, RenderError> {
    match offset.checked_add(len as u64) {
        Some(end) if end <= capacity => Ok(end),
        end => Err(RenderError::OutOfRange {
            requested: end.unwrap_or(u64::MAX),
            available: capacity,
        }),
    }
}

/// Same default as wgpu's `Limits::max_buffer_size`.
const DEFAULT_MAX_BUFFER_SIZE: u64 = 1 << 28;

#[derive(Debug, Clone)]
struct HostBuffer {
    kind: BufferKind,
    label: String,
    bytes: Vec<u8>,
    data_len: u64,
}

/// Buffer allocator backed by host memory.
///
/// Used by the CPU debug renderer and by tests to inspect exactly what a
/// GPU backend would receive.
#[derive(Debug, Clone)]
pub struct HostAllocator {
    slots: Vec<Option<HostBuffer>>,
    max_buffer_size: u64,
}

impl Default for HostAllocator {
    fn default() -> Self {
        Self {
            slots: Vec::new(),
            max_buffer_size: DEFAULT_MAX_BUFFER_SIZE,
        }
    }
}

impl HostAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocator that refuses buffers larger than `max_buffer_size` bytes.
    pub fn with_limit(max_buffer_size: u64) -> Self {
        Self {
            max_buffer_size,
            ..Self::default()
        }
    }

    /// Current contents of a buffer.
    pub fn contents(&self, handle: BufferHandle) -> Option<&[u8]> {
        self.slot(handle).map(|b| b.bytes.as_slice())
    }

    pub fn kind(&self, handle: BufferHandle) -> Option<BufferKind> {
        self.slot(handle).map(|b| b.kind)
    }

    pub fn label(&self, handle: BufferHandle) -> Option<&str> {
        self.slot(handle).map(|b| b.label.as_str())
    }

    /// Number of buffers currently allocated.
    pub fn live_buffers(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }

    fn slot(&self, handle: BufferHandle) -> Option<&HostBuffer> {
        self.slots.get(handle.0 as usize).and_then(Option::as_ref)
    }
}

impl BufferAllocator for HostAllocator {
    fn allocate(
        &mut self,
        kind: BufferKind,
        label: &str,
        size: u64,
    ) -> Result<BufferHandle, RenderError> {
        if size > self.max_buffer_size {
            return Err(RenderError::ResourceExhausted(format!(
                "{label}: {size} bytes exceeds the {} byte buffer limit",
                self.max_buffer_size
            )));
        }
        let buffer = HostBuffer {
            kind,
            label: label.to_owned(),
            bytes: vec![0; size as usize],
            data_len: 0,
        };
        let index = match self.slots.iter().position(Option::is_none) {
            Some(free) => {
                self.slots[free] = Some(buffer);
                free
            }
            None => {
                self.slots.push(Some(buffer));
                self.slots.len() - 1
            }
        };
        tracing::trace!(label, size, index, "host buffer allocated");
        Ok(BufferHandle(index as u32))
    }

    fn write(
        &mut self,
        handle: BufferHandle,
        offset: u64,
        bytes: &[u8],
    ) -> Result<(), RenderError> {
        let buffer = self
            .slots
            .get_mut(handle.0 as usize)
            .and_then(Option::as_mut)
            .ok_or(RenderError::UnknownHandle {
                kind: "buffer",
                id: handle.0,
            })?;
        let end = write_end(offset, bytes.len(), buffer.bytes.len() as u64)?;
        buffer.bytes[offset as usize..end as usize].copy_from_slice(bytes);
        buffer.data_len = buffer.data_len.max(end);
        Ok(())
    }

    fn capacity(&self, handle: BufferHandle) -> Option<u64> {
        self.slot(handle).map(|b| b.bytes.len() as u64)
    }

    fn data_len(&self, handle: BufferHandle) -> Option<u64> {
        self.slot(handle).map(|b| b.data_len)
    }

    fn set_data_len(&mut self, handle: BufferHandle, len: u64) -> Result<(), RenderError> {
        let buffer = self
            .slots
            .get_mut(handle.0 as usize)
            .and_then(Option::as_mut)
            .ok_or(RenderError::UnknownHandle {
                kind: "buffer",
                id: handle.0,
            })?;
        let capacity = buffer.bytes.len() as u64;
        if len > capacity {
            return Err(RenderError::OutOfRange {
                requested: len,
                available: capacity,
            });
        }
        buffer.data_len = len;
        Ok(())
    }

    fn release(&mut self, handle: BufferHandle) {
        if let Some(slot) = self.slots.get_mut(handle.0 as usize) {
            *slot = None;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allocate_write_read() {
        let mut host = HostAllocator::new();
        let h = host.allocate(BufferKind::Storage, "tiles", 8).unwrap();
        host.write(h, 4, &[1, 2, 3, 4]).unwrap();
        assert_eq!(host.contents(h), Some(&[0, 0, 0, 0, 1, 2, 3, 4][..]));
        assert_eq!(host.kind(h), Some(BufferKind::Storage));
        assert_eq!(host.label(h), Some("tiles"));
    }

    #[test]
    fn write_past_end_is_rejected() {
        let mut host = HostAllocator::new();
        let h = host.allocate(BufferKind::Uniform, "t", 4).unwrap();
        let err = host.write(h, 2, &[0; 4]).unwrap_err();
        assert_eq!(
            err,
            RenderError::OutOfRange {
                requested: 6,
                available: 4
            }
        );
    }

    #[test]
    fn huge_offsets_do_not_wrap() {
        let mut host = HostAllocator::new();
        let h = host.allocate(BufferKind::Storage, "tiles", 16).unwrap();
        assert_eq!(
            host.write(h, u64::MAX - 1, &[0; 4]),
            Err(RenderError::OutOfRange {
                requested: u64::MAX,
                available: 16
            })
        );
        assert_eq!(host.data_len(h), Some(0));
    }

    #[test]
    fn data_len_follows_writes_and_shrinks_on_request() {
        let mut host = HostAllocator::new();
        let h = host.allocate(BufferKind::Storage, "tiles", 32).unwrap();
        assert_eq!(host.data_len(h), Some(0));
        host.write(h, 8, &[1; 8]).unwrap();
        assert_eq!(host.data_len(h), Some(16));
        host.write(h, 0, &[2; 4]).unwrap();
        assert_eq!(host.data_len(h), Some(16));
        host.set_data_len(h, 4).unwrap();
        assert_eq!(host.data_len(h), Some(4));
        assert!(host.set_data_len(h, 33).is_err());
        assert_eq!(host.capacity(h), Some(32));
    }

    #[test]
    fn limit_reports_resource_exhausted() {
        let mut host = HostAllocator::with_limit(64);
        assert!(host.allocate(BufferKind::Uniform, "ok", 64).is_ok());
        assert!(matches!(
            host.allocate(BufferKind::Storage, "big", 65),
            Err(RenderError::ResourceExhausted(_))
        ));
    }

    #[test]
    fn released_slots_are_reused() {
        let mut host = HostAllocator::new();
        let a = host.allocate(BufferKind::Uniform, "a", 4).unwrap();
        let b = host.allocate(BufferKind::Uniform, "b", 4).unwrap();
        host.release(a);
        assert_eq!(host.live_buffers(), 1);
        assert!(host.contents(a).is_none());
        let c = host.allocate(BufferKind::Uniform, "c", 4).unwrap();
        assert_eq!(c, a);
        assert_ne!(c, b);
        assert!(matches!(
            host.write(BufferHandle(99), 0, &[]),
            Err(RenderError::UnknownHandle { .. })
        ));
    }
}
