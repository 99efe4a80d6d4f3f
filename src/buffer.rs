//! Fixed-capacity rolling text buffer.
//!
//! Holds the most recent `capacity` characters of serial input. Oldest
//! characters are dropped on overflow; there is no loss notification.

/// Rolling window over the tail of everything appended so far.
#[derive(Debug, Clone)]
pub struct RollingBuffer {
    contents: String,
    /// Length of `contents` in chars, kept so appends don't rescan.
    chars: usize,
    capacity: usize,
}

impl RollingBuffer {
    /// Create an empty buffer. `capacity` is counted in characters.
    ///
    /// A capacity of zero is clamped to one.
    pub fn new(capacity: usize) -> Self {
        Self {
            contents: String::new(),
            chars: 0,
            capacity: capacity.max(1),
        }
    }

    /// Append `data`, then trim from the front down to `capacity` chars.
    pub fn append(&mut self, data: &str) {
        self.contents.push_str(data);
        self.chars += data.chars().count();

        if self.chars > self.capacity {
            let excess = self.chars - self.capacity;
            let cut = self
                .contents
                .char_indices()
                .nth(excess)
                .map(|(i, _)| i)
                .unwrap_or(self.contents.len());
            self.contents.drain(..cut);
            self.chars = self.capacity;
        }
    }

    /// Snapshot of the current contents.
    pub fn read(&self) -> String {
        self.contents.clone()
    }

    /// Borrow the current contents.
    pub fn as_str(&self) -> &str {
        &self.contents
    }

    /// Number of characters held.
    pub fn len(&self) -> usize {
        self.chars
    }

    pub fn is_empty(&self) -> bool {
        self.chars == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
