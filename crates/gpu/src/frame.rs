use crate::{device::Device, queue::CommandQueue, Error, FenceValue};

/// The fence value of the last frame that used each back buffer.
///
/// A back buffer must not be touched again until the work of the frame that
/// last drew into it has completed.
#[derive(Clone, Debug)]
pub struct FrameFences {
    values: Vec<FenceValue>,
}

impl FrameFences {
    /// ## Panics
    ///
    /// Panics if `count` is zero.
    #[must_use]
    pub fn new(count: u32) -> Self {
        assert!(count > 0, "at least one back buffer is required");
        Self {
            values: vec![FenceValue::default(); count as usize],
        }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// The fence value the buffer at `index` is waiting on. Zero means the
    /// buffer has not been used since creation or the last reset.
    pub fn value(&self, index: usize) -> FenceValue {
        self.values[index]
    }

    /// Records that the frame drawing into the buffer at `index` completes at
    /// `value`.
    pub fn submitted(&mut self, index: usize, value: FenceValue) {
        self.values[index] = value;
    }

    pub fn is_reusable<D: Device>(&self, queue: &CommandQueue<D>, index: usize) -> bool {
        queue.is_complete(self.values[index])
    }

    /// Blocks until the buffer at `index` is no longer in use by the GPU.
    pub fn wait_for_reuse<D: Device>(
        &self,
        queue: &CommandQueue<D>,
        index: usize,
    ) -> Result<(), Error> {
        assert!(
            index < self.values.len(),
            "back buffer {index} out of range ({} buffers)",
            self.values.len()
        );
        queue.wait_until(self.values[index])
    }

    /// Forgets every recorded value. Only valid after the queue was flushed.
    pub fn reset(&mut self) {
        self.values.fill(FenceValue::default());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{device::QueueKind, soft::SoftDevice};

    #[test]
    fn fresh_buffers_are_reusable() {
        let device = SoftDevice::new().unwrap();
        let queue = CommandQueue::new(&device, QueueKind::Direct).unwrap();
        let frames = FrameFences::new(3);

        for index in 0..3 {
            assert!(frames.is_reusable(&queue, index));
            frames.wait_for_reuse(&queue, index).unwrap();
        }
    }

    #[test]
    fn buffer_is_held_until_its_frame_completes() {
        let device = SoftDevice::new().unwrap();
        let mut queue = CommandQueue::new(&device, QueueKind::Direct).unwrap();
        let mut frames = FrameFences::new(2);

        device.pause();
        let recording = queue.acquire_recording_context().unwrap();
        let value = queue.submit(recording).unwrap();
        frames.submitted(0, value);

        assert!(!frames.is_reusable(&queue, 0));
        assert!(frames.is_reusable(&queue, 1));

        device.resume();
        frames.wait_for_reuse(&queue, 0).unwrap();
        assert!(frames.is_reusable(&queue, 0));
    }

    #[test]
    fn reset_after_flush() {
        let device = SoftDevice::new().unwrap();
        let mut queue = CommandQueue::new(&device, QueueKind::Direct).unwrap();
        let mut frames = FrameFences::new(2);

        frames.submitted(1, queue.signal().unwrap());
        queue.flush().unwrap();
        frames.reset();

        assert_eq!(frames.value(1), FenceValue(0));
    }

    #[test]
    #[should_panic(expected = "out of range")]
    fn wait_out_of_range() {
        let device = SoftDevice::new().unwrap();
        let queue = CommandQueue::new(&device, QueueKind::Direct).unwrap();
        let frames = FrameFences::new(2);
        let _ = frames.wait_for_reuse(&queue, 2);
    }
}
