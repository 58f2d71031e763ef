use structures::SlotPolicy;

use crate::{
    descriptor_heap::DescriptorHeap,
    device::{DescriptorHeapKind, Device, QueueKind},
    frame::FrameFences,
    queue::{CommandQueue, FenceValue, Recording},
    Error, GraphicsConfig,
};

/// Everything a renderer shares across passes: the direct queue, the
/// descriptor heaps and the back-buffer fences.
///
/// Dropping the context waits for all submitted work to finish.
pub struct GraphicsContext<'d, D: Device> {
    device: &'d D,
    queue: CommandQueue<'d, D>,
    shader_heap: DescriptorHeap<'d, D>,
    rtv_heap: DescriptorHeap<'d, D>,
    dsv_heap: DescriptorHeap<'d, D>,
    frames: FrameFences,
}

impl<'d, D: Device> GraphicsContext<'d, D> {
    pub fn new(device: &'d D, config: &GraphicsConfig) -> Result<Self, Error> {
        let queue = CommandQueue::new(device, QueueKind::Direct)?;

        let shader_heap = DescriptorHeap::new(
            device,
            DescriptorHeapKind::CbvSrvUav,
            config.shader_heap_capacity,
            true,
            config.shader_heap_policy,
        )?;

        let rtv_heap = DescriptorHeap::new(
            device,
            DescriptorHeapKind::Rtv,
            config.render_target_heap_capacity(),
            false,
            SlotPolicy::Bump,
        )?;

        let dsv_heap = DescriptorHeap::new(
            device,
            DescriptorHeapKind::Dsv,
            config.depth_stencil_heap_capacity,
            false,
            SlotPolicy::Bump,
        )?;

        Ok(Self {
            device,
            queue,
            shader_heap,
            rtv_heap,
            dsv_heap,
            frames: FrameFences::new(config.back_buffer_count),
        })
    }

    pub fn device(&self) -> &'d D {
        self.device
    }

    pub fn queue(&self) -> &CommandQueue<'d, D> {
        &self.queue
    }

    pub fn queue_mut(&mut self) -> &mut CommandQueue<'d, D> {
        &mut self.queue
    }

    pub fn shader_heap(&self) -> &DescriptorHeap<'d, D> {
        &self.shader_heap
    }

    pub fn shader_heap_mut(&mut self) -> &mut DescriptorHeap<'d, D> {
        &mut self.shader_heap
    }

    pub fn rtv_heap(&self) -> &DescriptorHeap<'d, D> {
        &self.rtv_heap
    }

    pub fn rtv_heap_mut(&mut self) -> &mut DescriptorHeap<'d, D> {
        &mut self.rtv_heap
    }

    pub fn dsv_heap(&self) -> &DescriptorHeap<'d, D> {
        &self.dsv_heap
    }

    pub fn dsv_heap_mut(&mut self) -> &mut DescriptorHeap<'d, D> {
        &mut self.dsv_heap
    }

    pub fn frames(&self) -> &FrameFences {
        &self.frames
    }

    /// Waits until the back buffer at `index` is free, then returns a list to
    /// record the frame into.
    pub fn begin_frame(&mut self, index: usize) -> Result<Recording<'d, D>, Error> {
        self.frames.wait_for_reuse(&self.queue, index)?;
        self.queue.acquire_recording_context()
    }

    /// Submits the frame's work and ties the back buffer at `index` to it.
    pub fn end_frame(
        &mut self,
        index: usize,
        recording: Recording<'d, D>,
    ) -> Result<FenceValue, Error> {
        let value = self.queue.submit(recording)?;
        self.frames.submitted(index, value);
        Ok(value)
    }

    /// Drains the queue so that screen-sized resources can be recreated.
    pub fn prepare_resize(&mut self) -> Result<(), Error> {
        self.queue.flush()?;
        self.frames.reset();
        Ok(())
    }
}
