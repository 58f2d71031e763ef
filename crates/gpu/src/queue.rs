use std::{cell::Cell, collections::VecDeque};

use crate::{
    device::{Device, QueueKind, ResourceState},
    Error,
};

/// A value of a queue's completion fence. Values are only meaningful for the
/// queue that produced them.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FenceValue(pub u64);

/// A command list paired with the allocator backing its storage.
pub struct Recording<'d, D: Device> {
    device: &'d D,
    list: D::List,
    allocator: D::Allocator,
}

impl<'d, D: Device> Recording<'d, D> {
    /// The backend command list, for recording draws and copies.
    pub fn list(&self) -> &D::List {
        &self.list
    }

    pub fn transition(&self, resource: &D::Resource, before: ResourceState, after: ResourceState) {
        self.device.transition(&self.list, resource, before, after);
    }
}

/// An allocator whose work was submitted, waiting until it is safe to reset.
struct Retired<A> {
    fence_value: FenceValue,
    allocator: A,
}

/// Serializes work onto a single hardware queue and tracks its completion
/// with a monotonically increasing fence.
///
/// Allocators are recycled in submission order once the fence shows their
/// work has finished; lists are recycled as soon as they are submitted.
///
/// Dropping the queue waits for all submitted work to finish.
pub struct CommandQueue<'d, D: Device> {
    device: &'d D,
    kind: QueueKind,
    queue: D::Queue,
    fence: D::Fence,
    event: D::Event,
    last_completed: Cell<u64>,
    last_signaled: u64,
    idle_lists: Vec<D::List>,
    retired: VecDeque<Retired<D::Allocator>>,
}

impl<'d, D: Device> CommandQueue<'d, D> {
    pub fn new(device: &'d D, kind: QueueKind) -> Result<Self, Error> {
        let queue = device.create_queue(kind)?;
        let fence = device.create_fence(0)?;
        let event = device.create_event()?;

        log::debug!("created {kind:?} command queue");

        Ok(Self {
            device,
            kind,
            queue,
            fence,
            event,
            last_completed: Cell::new(0),
            last_signaled: 0,
            idle_lists: Vec::new(),
            retired: VecDeque::new(),
        })
    }

    pub fn kind(&self) -> QueueKind {
        self.kind
    }

    /// The backend queue, for presentation and other backend-specific calls.
    pub fn raw(&self) -> &D::Queue {
        &self.queue
    }

    pub fn device(&self) -> &'d D {
        self.device
    }

    /// The most recent value handed out by [`Self::submit`] or
    /// [`Self::signal`].
    pub fn last_signaled(&self) -> FenceValue {
        FenceValue(self.last_signaled)
    }

    /// The number of submitted allocators not yet reclaimed.
    pub fn in_flight(&self) -> usize {
        self.retired.len()
    }

    /// The number of closed lists ready to be reused.
    pub fn idle_lists(&self) -> usize {
        self.idle_lists.len()
    }

    /// Reads the fence's completed value from the device. The cached value
    /// never decreases.
    pub fn completed_value(&self) -> FenceValue {
        let completed = self.device.completed_value(&self.fence);
        self.last_completed
            .set(self.last_completed.get().max(completed));
        FenceValue(self.last_completed.get())
    }

    pub fn is_complete(&self, fence_value: FenceValue) -> bool {
        if fence_value.0 > self.last_completed.get() {
            self.completed_value();
        }

        fence_value.0 <= self.last_completed.get()
    }

    /// Blocks until the fence reaches `fence_value`.
    ///
    /// Waiting on a value this queue never signaled blocks forever.
    pub fn wait_until(&self, fence_value: FenceValue) -> Result<(), Error> {
        if !self.is_complete(fence_value) {
            log::trace!("waiting for {:?} fence value {}", self.kind, fence_value.0);
            self.device
                .wait_for_value(&self.fence, fence_value.0, &self.event)?;
            self.last_completed
                .set(self.last_completed.get().max(fence_value.0));
        }

        Ok(())
    }

    /// Issues a fence signal behind everything submitted so far.
    pub fn signal(&mut self) -> Result<FenceValue, Error> {
        let value = self.last_signaled + 1;
        self.device.signal(&self.queue, &self.fence, value)?;
        self.last_signaled = value;
        Ok(FenceValue(value))
    }

    /// Blocks until all submitted work has finished.
    pub fn flush(&mut self) -> Result<(), Error> {
        let value = self.signal()?;
        self.wait_until(value)
    }

    /// Returns a list ready for recording.
    ///
    /// The oldest retired allocator is reused if its work has finished;
    /// otherwise a new allocator is created. This never waits on the GPU.
    pub fn acquire_recording_context(&mut self) -> Result<Recording<'d, D>, Error> {
        let reusable = self
            .retired
            .front()
            .is_some_and(|retired| self.is_complete(retired.fence_value));

        let retired = if reusable {
            self.retired.pop_front()
        } else {
            None
        };

        let allocator = match retired {
            Some(retired) => {
                self.device.reset_command_allocator(&retired.allocator)?;
                retired.allocator
            }
            None => {
                log::debug!(
                    "no idle {:?} command allocator ({} in flight), creating one",
                    self.kind,
                    self.retired.len()
                );
                self.device.create_command_allocator(self.kind)?
            }
        };

        let list = if let Some(list) = self.idle_lists.pop() {
            self.device.reset_command_list(&list, &allocator)?;
            list
        } else {
            log::debug!("no idle {:?} command list, creating one", self.kind);
            self.device.create_command_list(self.kind, &allocator)?
        };

        Ok(Recording {
            device: self.device,
            list,
            allocator,
        })
    }

    /// Closes and executes the recording. The returned value is reached once
    /// the GPU has finished this and every earlier submission.
    pub fn submit(&mut self, recording: Recording<'d, D>) -> Result<FenceValue, Error> {
        let Recording {
            list, allocator, ..
        } = recording;

        self.device.close_command_list(&list)?;
        self.device.execute(&self.queue, &list)?;
        let fence_value = self.signal()?;

        log::trace!("submitted {:?} work as fence value {}", self.kind, fence_value.0);

        self.idle_lists.push(list);
        self.retired.push_back(Retired {
            fence_value,
            allocator,
        });

        Ok(fence_value)
    }
}

impl<D: Device> Drop for CommandQueue<'_, D> {
    fn drop(&mut self) {
        // Retired allocators may still back executing lists.
        if let Err(err) = self.flush() {
            log::error!("failed to flush the {:?} queue on drop: {err}", self.kind);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::soft::SoftDevice;

    #[test]
    fn fence_values_strictly_increase() {
        let device = SoftDevice::new().unwrap();
        let mut queue = CommandQueue::new(&device, QueueKind::Direct).unwrap();

        let mut last = FenceValue(0);
        for i in 0..16 {
            let value = if i % 3 == 0 {
                queue.signal().unwrap()
            } else {
                let recording = queue.acquire_recording_context().unwrap();
                queue.submit(recording).unwrap()
            };

            assert!(value > last);
            last = value;
        }

        assert_eq!(queue.last_signaled(), last);
    }

    #[test]
    fn scenario_two_submissions() {
        let device = SoftDevice::new().unwrap();
        let mut queue = CommandQueue::new(&device, QueueKind::Copy).unwrap();

        let buffer = device.create_buffer(4);
        let recording = queue.acquire_recording_context().unwrap();
        recording.transition(&buffer, ResourceState::Common, ResourceState::CopyDest);
        let first = queue.submit(recording).unwrap();
        assert_eq!(first, FenceValue(1));

        queue.wait_until(first).unwrap();
        assert!(queue.is_complete(first));

        let recording = queue.acquire_recording_context().unwrap();
        let second = queue.submit(recording).unwrap();
        assert_eq!(second, FenceValue(2));
        assert!(queue.is_complete(first));

        queue.wait_until(second).unwrap();
        assert!(queue.is_complete(FenceValue(0)));
        assert!(queue.is_complete(second));
        assert_eq!(buffer.state(), ResourceState::CopyDest);
    }

    #[test]
    fn incomplete_until_executed() {
        let device = SoftDevice::new().unwrap();
        let mut queue = CommandQueue::new(&device, QueueKind::Direct).unwrap();

        device.pause();
        let recording = queue.acquire_recording_context().unwrap();
        let value = queue.submit(recording).unwrap();

        assert!(!queue.is_complete(value));
        assert_eq!(queue.completed_value(), FenceValue(0));
        assert_eq!(device.executed(), 0);

        device.resume();
        queue.wait_until(value).unwrap();
        assert!(queue.is_complete(value));
        assert_eq!(device.executed(), 1);
    }

    #[test]
    fn allocators_are_not_reused_early() {
        let device = SoftDevice::new().unwrap();
        let mut queue = CommandQueue::new(&device, QueueKind::Direct).unwrap();

        device.pause();
        let recording = queue.acquire_recording_context().unwrap();
        let first = queue.submit(recording).unwrap();

        // The first allocator is still executing, so a second one is created
        // rather than resetting the first (which the device would reject).
        let recording = queue.acquire_recording_context().unwrap();
        assert_eq!(device.allocators_created(), 2);
        assert_eq!(queue.in_flight(), 1);

        device.resume();
        let second = queue.submit(recording).unwrap();
        queue.wait_until(second).unwrap();
        assert!(queue.is_complete(first));

        // Both have finished; the oldest is reused.
        let recording = queue.acquire_recording_context().unwrap();
        assert_eq!(device.allocators_created(), 2);
        assert_eq!(queue.in_flight(), 1);
        queue.submit(recording).unwrap();
    }

    #[test]
    fn lists_are_reused_immediately() {
        let device = SoftDevice::new().unwrap();
        let mut queue = CommandQueue::new(&device, QueueKind::Direct).unwrap();

        device.pause();
        for _ in 0..3 {
            let recording = queue.acquire_recording_context().unwrap();
            queue.submit(recording).unwrap();
            assert_eq!(queue.idle_lists(), 1);
        }

        assert_eq!(device.lists_created(), 1);
        assert_eq!(device.allocators_created(), 3);
        device.resume();
    }

    #[test]
    fn flush_completes_everything() {
        let device = SoftDevice::new().unwrap();
        let mut queue = CommandQueue::new(&device, QueueKind::Direct).unwrap();

        let mut submitted = Vec::new();
        for _ in 0..4 {
            let recording = queue.acquire_recording_context().unwrap();
            submitted.push(queue.submit(recording).unwrap());
        }

        queue.flush().unwrap();

        for value in submitted {
            assert!(queue.is_complete(value));
        }
        assert_eq!(device.executed(), 4);
        assert!(device.validation_errors().is_empty());
    }

    #[test]
    fn completed_value_is_monotonic() {
        let device = SoftDevice::new().unwrap();
        let mut queue = CommandQueue::new(&device, QueueKind::Compute).unwrap();

        queue.flush().unwrap();
        let before = queue.completed_value();

        device.pause();
        queue.signal().unwrap();
        assert_eq!(queue.completed_value(), before);
        device.resume();

        queue.flush().unwrap();
        assert!(queue.completed_value() > before);
    }

    #[test]
    fn drop_waits_for_submitted_work() {
        let device = SoftDevice::new().unwrap();
        let mut queue = CommandQueue::new(&device, QueueKind::Direct).unwrap();

        device.pause();
        let recording = queue.acquire_recording_context().unwrap();
        queue.submit(recording).unwrap();
        assert_eq!(device.executed(), 0);

        std::thread::scope(|scope| {
            scope.spawn(|| {
                std::thread::sleep(std::time::Duration::from_millis(50));
                device.resume();
            });

            drop(queue);
            assert_eq!(device.executed(), 1);
        });

        assert!(device.validation_errors().is_empty());
    }
}
