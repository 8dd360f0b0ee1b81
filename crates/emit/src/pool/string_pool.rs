use crossbeam_queue::ArrayQueue;

/// Bounded pool of `String` builders.
///
/// Pooled instances are cleared on the way out, never on the way in, so
/// a builder can be released without scrubbing and still never leaks
/// text into the next user. An empty pool hands out a fresh `String`
/// with the configured capacity; a full pool drops the release.
#[derive(Debug)]
pub struct StringPool {
    slots: ArrayQueue<String>,
    string_capacity: usize,
}

impl Default for StringPool {
    fn default() -> Self {
        Self::new(16, 1024)
    }
}

impl StringPool {
    /// Creates a pool of `pool_size` slots, each pre-filled with a
    /// `String` of `string_capacity` bytes.
    pub fn new(pool_size: usize, string_capacity: usize) -> Self {
        let slots = ArrayQueue::new(pool_size);
        while slots.push(String::with_capacity(string_capacity)).is_ok() {}
        Self { slots, string_capacity }
    }

    /// Preset sized for assembling response header blocks.
    pub fn for_headers() -> Self {
        Self::new(256, 4096)
    }

    /// Hands out an empty builder, pooled when available.
    pub fn acquire(&self) -> String {
        match self.slots.pop() {
            Some(mut s) => {
                s.clear();
                s
            }
            None => String::with_capacity(self.string_capacity),
        }
    }

    /// Offers a builder back. Returns whether the pool retained it.
    pub fn release(&self, s: String) -> bool {
        self.slots.push(s).is_ok()
    }
}
