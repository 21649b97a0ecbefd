/// Fixed ring of per-frame values, advanced once per presented frame.
pub struct PerFrame<T> {
    frames: Vec<T>,
    curr_frame: usize,
}

impl<T> Default for PerFrame<T> {
    fn default() -> Self {
        Self {
            frames: Vec::new(),
            curr_frame: 0,
        }
    }
}

impl<T> PerFrame<T>
where
    T: Clone + Default,
{
    pub fn new(num_frames: usize) -> Self {
        Self {
            frames: vec![Default::default(); num_frames],
            curr_frame: 0,
        }
    }
}

impl<T> PerFrame<T> {
    /// Appends a slot to the ring. The current slot is unchanged.
    pub fn push(&mut self, value: T) {
        self.frames.push(value);
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn curr(&self) -> &T {
        &self.frames[self.curr_frame]
    }

    pub fn curr_mut(&mut self) -> &mut T {
        &mut self.frames[self.curr_frame]
    }

    pub fn curr_idx(&self) -> usize {
        self.curr_frame
    }

    pub fn advance_next_frame(&mut self) {
        if !self.frames.is_empty() {
            self.curr_frame = (self.curr_frame + 1) % self.frames.len();
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.frames.iter()
    }

    /// Removes every slot, handing them to `func` in ring order.
    pub fn drain<F>(&mut self, func: F)
    where
        F: FnMut(T),
    {
        self.frames.drain(..).for_each(func);
        self.curr_frame = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn advances_and_wraps() {
        let mut ring: PerFrame<u32> = PerFrame::new(2);
        *ring.curr_mut() = 7;
        ring.advance_next_frame();
        assert_eq!(ring.curr_idx(), 1);
        assert_eq!(*ring.curr(), 0);
        ring.advance_next_frame();
        assert_eq!(ring.curr_idx(), 0);
        assert_eq!(*ring.curr(), 7);
    }

    #[test]
    fn empty_ring_does_not_advance() {
        let mut ring: PerFrame<u8> = PerFrame::default();
        ring.advance_next_frame();
        assert_eq!(ring.curr_idx(), 0);
        assert!(ring.is_empty());
    }

    #[test]
    fn drain_resets() {
        let mut ring = PerFrame::default();
        ring.push(1);
        ring.push(2);
        ring.advance_next_frame();
        let mut seen = Vec::new();
        ring.drain(|v| seen.push(v));
        assert_eq!(seen, vec![1, 2]);
        assert_eq!(ring.len(), 0);
        assert_eq!(ring.curr_idx(), 0);
    }
}
