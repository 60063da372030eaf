//! Fixed-depth circular delay buffers.
//!
//! Q-type components push terms needed at a future step into a
//! [`DelayBuffer`]; each update returns the value pushed exactly `depth`
//! updates ago. Depth is fixed at construction and the buffer never
//! reallocates during a run.

/// A fixed-depth circular history buffer.
#[derive(Debug, Clone)]
pub struct DelayBuffer {
    buffer: Vec<f64>,
    pos: usize,
}

impl DelayBuffer {
    /// Create a buffer of the given depth, seeded with `initial` so the
    /// first `depth` reads return a consistent start value.
    pub fn new(depth: usize, initial: f64) -> Self {
        Self {
            buffer: vec![initial; depth.max(1)],
            pos: 0,
        }
    }

    /// Buffer depth in steps.
    pub fn depth(&self) -> usize {
        self.buffer.len()
    }

    /// Peek the value that the next `update` will return.
    #[inline]
    pub fn oldest(&self) -> f64 {
        self.buffer[self.pos]
    }

    /// Push a new value and return the value pushed exactly `depth` updates
    /// ago (the seed value while the buffer is still warming up).
    #[inline]
    pub fn update(&mut self, value: f64) -> f64 {
        let oldest = self.buffer[self.pos];
        self.buffer[self.pos] = value;
        self.pos = (self.pos + 1) % self.buffer.len();
        oldest
    }

    /// Overwrite the whole history with one value (re-seeding at
    /// initialize time).
    pub fn fill(&mut self, value: f64) {
        self.buffer.fill(value);
        self.pos = 0;
    }
}
