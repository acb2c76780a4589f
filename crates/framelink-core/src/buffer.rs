//! Buffer pooling for packet memory.

/// A bounded allocator that recycles packet-sized buffers.
///
/// Send entries and scratch packets churn at message rate; recycling their
/// backing storage keeps the steady state allocation-free, which matters on
/// the small targets this protocol is aimed at. When `max_pool_size` is
/// reached, returned buffers are simply dropped.
pub struct BufferPool {
    /// Pool of reusable buffers
    pool: Vec<Vec<u8>>,
    /// Capacity each allocated buffer is created with
    buffer_size: usize,
    /// Maximum pool size
    max_pool_size: usize,
}

impl BufferPool {
    /// Creates a new pool handing out buffers of `buffer_size` capacity.
    pub fn new(buffer_size: usize, max_pool_size: usize) -> Self {
        Self { pool: Vec::with_capacity(max_pool_size), buffer_size, max_pool_size }
    }

    /// Takes a buffer from the pool or allocates a fresh one.
    pub fn allocate(&mut self) -> Vec<u8> {
        self.pool.pop().unwrap_or_else(|| Vec::with_capacity(self.buffer_size))
    }

    /// Returns a buffer to the pool for reuse.
    pub fn release(&mut self, mut buffer: Vec<u8>) {
        if self.pool.len() < self.max_pool_size {
            buffer.clear();
            self.pool.push(buffer);
        }
    }

    /// Number of buffers currently held by the pool.
    pub fn available(&self) -> usize {
        self.pool.len()
    }
}
