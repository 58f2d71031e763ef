use structures::{SlotError, SlotPolicy, SlotTable};

use crate::{
    device::{CpuDescriptorHandle, DescriptorHeapKind, Device, GpuDescriptorHandle},
    Error,
};

/// A fixed-capacity table of resource-view descriptors.
///
/// Slots are handed out by index. Whether released slots are reused is
/// decided per heap by its [`SlotPolicy`]: heaps that only ever grow use
/// [`SlotPolicy::Bump`], heaps for content that comes and goes (streamed
/// terrain textures) need [`SlotPolicy::FreeList`].
pub struct DescriptorHeap<'d, D: Device> {
    device: &'d D,
    heap: D::Heap,
    kind: DescriptorHeapKind,
    stride: u32,
    cpu_start: CpuDescriptorHandle,
    gpu_start: Option<GpuDescriptorHandle>,
    slots: SlotTable,
}

impl<'d, D: Device> DescriptorHeap<'d, D> {
    pub fn new(
        device: &'d D,
        kind: DescriptorHeapKind,
        capacity: u32,
        shader_visible: bool,
        policy: SlotPolicy,
    ) -> Result<Self, Error> {
        let heap = device.create_descriptor_heap(kind, capacity, shader_visible)?;
        let stride = device.descriptor_stride(kind);
        let (cpu_start, gpu_start) = device.heap_start(&heap);

        log::debug!(
            "created {kind:?} descriptor heap: {capacity} slots, stride {stride}, {policy:?}{}",
            if shader_visible { ", shader visible" } else { "" }
        );

        Ok(Self {
            device,
            heap,
            kind,
            stride,
            cpu_start,
            gpu_start,
            slots: SlotTable::new(capacity, policy),
        })
    }

    pub fn kind(&self) -> DescriptorHeapKind {
        self.kind
    }

    pub fn capacity(&self) -> u32 {
        self.slots.capacity()
    }

    pub fn policy(&self) -> SlotPolicy {
        self.slots.policy()
    }

    /// The distance in bytes between two consecutive descriptors.
    pub fn stride(&self) -> u32 {
        self.stride
    }

    /// The number of slots currently allocated.
    pub fn allocated(&self) -> u32 {
        self.slots.allocated()
    }

    pub fn is_allocated(&self, index: u32) -> bool {
        self.slots.is_allocated(index)
    }

    pub fn is_shader_visible(&self) -> bool {
        self.gpu_start.is_some()
    }

    /// The backend heap, for binding to a command list.
    pub fn raw(&self) -> &D::Heap {
        &self.heap
    }

    /// Hands out an index that no other caller currently holds.
    pub fn acquire(&mut self) -> Result<u32, Error> {
        self.slots.acquire().map_err(|err| match err {
            SlotError::Exhausted { capacity } => Error::ResourceExhausted {
                kind: self.kind,
                capacity,
            },
        })
    }

    /// Returns `index` to the heap. Out-of-range or already free indices are
    /// ignored, and so is every release on a bump heap.
    pub fn release(&mut self, index: u32) {
        if !self.slots.release(index) {
            log::trace!("ignored release of {:?} descriptor {index}", self.kind);
        }
    }

    /// ## Panics
    ///
    /// Panics if `index` is not less than the heap's capacity.
    pub fn handle_at(&self, index: u32) -> CpuDescriptorHandle {
        assert!(
            index < self.capacity(),
            "descriptor index {index} out of range (capacity {})",
            self.capacity()
        );
        self.cpu_start.offset(index, self.stride)
    }

    /// The shader-visible handle for `index`, or `None` if this heap is not
    /// shader visible.
    ///
    /// ## Panics
    ///
    /// Panics if `index` is not less than the heap's capacity.
    pub fn gpu_handle_at(&self, index: u32) -> Option<GpuDescriptorHandle> {
        assert!(
            index < self.capacity(),
            "descriptor index {index} out of range (capacity {})",
            self.capacity()
        );
        self.gpu_start.map(|start| start.offset(index, self.stride))
    }

    /// Publishes a shader resource view of `resource` in a fresh slot and
    /// returns its index.
    ///
    /// The heap does not keep `resource` alive; its owner must outlive every
    /// use of the slot.
    pub fn create_texture_view(&mut self, resource: &D::Resource) -> Result<u32, Error> {
        let index = self.acquire()?;
        self.device.create_texture_view(resource, self.handle_at(index));
        Ok(index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::soft::SoftDevice;

    #[test]
    fn scenario_free_list() {
        let device = SoftDevice::new().unwrap();
        let mut heap =
            DescriptorHeap::new(&device, DescriptorHeapKind::CbvSrvUav, 4, true, SlotPolicy::FreeList)
                .unwrap();

        let indices = (0..4).map(|_| heap.acquire().unwrap()).collect::<Vec<_>>();
        assert_eq!(indices, [0, 1, 2, 3]);

        assert!(matches!(
            heap.acquire(),
            Err(Error::ResourceExhausted {
                kind: DescriptorHeapKind::CbvSrvUav,
                capacity: 4
            })
        ));

        heap.release(1);
        assert_eq!(heap.acquire().unwrap(), 1);
    }

    #[test]
    fn scenario_bump() {
        let device = SoftDevice::new().unwrap();
        let mut heap =
            DescriptorHeap::new(&device, DescriptorHeapKind::CbvSrvUav, 4, true, SlotPolicy::Bump)
                .unwrap();

        for expected in 0..4 {
            assert_eq!(heap.acquire().unwrap(), expected);
        }

        heap.release(1);
        assert!(heap.is_allocated(1));
        assert!(matches!(heap.acquire(), Err(Error::ResourceExhausted { .. })));
    }

    #[test]
    fn consecutive_handles_are_one_stride_apart() {
        let device = SoftDevice::new().unwrap();
        let mut heap =
            DescriptorHeap::new(&device, DescriptorHeapKind::CbvSrvUav, 8, true, SlotPolicy::FreeList)
                .unwrap();

        let first = heap.acquire().unwrap();
        let second = heap.acquire().unwrap();

        let a = heap.handle_at(first);
        let b = heap.handle_at(second);
        assert_eq!(b.0 - a.0, heap.stride() as usize);

        let ga = heap.gpu_handle_at(first).unwrap();
        let gb = heap.gpu_handle_at(second).unwrap();
        assert_eq!(gb.0 - ga.0, u64::from(heap.stride()));
    }

    #[test]
    fn non_shader_visible_heap_has_no_gpu_handles() {
        let device = SoftDevice::new().unwrap();
        let heap = DescriptorHeap::new(&device, DescriptorHeapKind::Rtv, 3, false, SlotPolicy::Bump)
            .unwrap();

        assert!(!heap.is_shader_visible());
        assert_eq!(heap.gpu_handle_at(2), None);
    }

    #[test]
    fn render_target_heaps_cannot_be_shader_visible() {
        let device = SoftDevice::new().unwrap();
        let result = DescriptorHeap::new(&device, DescriptorHeapKind::Rtv, 3, true, SlotPolicy::Bump);
        assert!(matches!(result, Err(Error::Device(_))));
    }

    #[test]
    #[should_panic(expected = "out of range")]
    fn handle_at_out_of_range() {
        let device = SoftDevice::new().unwrap();
        let heap = DescriptorHeap::new(&device, DescriptorHeapKind::Dsv, 1, false, SlotPolicy::Bump)
            .unwrap();
        let _ = heap.handle_at(1);
    }

    #[test]
    fn texture_view_is_written_at_slot() {
        let device = SoftDevice::new().unwrap();
        let mut heap =
            DescriptorHeap::new(&device, DescriptorHeapKind::CbvSrvUav, 16, true, SlotPolicy::FreeList)
                .unwrap();

        let texture = device.create_texture(4, 4, 4, 1);
        heap.acquire().unwrap();
        let index = heap.create_texture_view(&texture).unwrap();

        assert_eq!(index, 1);
        assert_eq!(device.view_at(heap.handle_at(index)), Some(texture.id()));
        assert_eq!(heap.allocated(), 2);
    }
}
