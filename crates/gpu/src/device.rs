//! The device capability consumed by the submission core.
//!
//! A [`Device`] creates queues, fences, heaps and resources, and performs the
//! handful of recording operations the core needs itself. Everything else a
//! renderer records goes through the backend's native command list type,
//! which callers reach through [`Recording::list`](crate::Recording::list).

use crate::{
    pipeline::{PipelineDesc, ShaderSet},
    Error,
};

/// The hardware queue a command list is executed on.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum QueueKind {
    #[default]
    Direct,
    Compute,
    Copy,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DescriptorHeapKind {
    /// Constant buffer, shader resource and unordered access views.
    CbvSrvUav,
    Sampler,
    /// Render target views.
    Rtv,
    /// Depth stencil views.
    Dsv,
}

impl DescriptorHeapKind {
    /// Only resource views and samplers can be bound to shaders.
    #[must_use]
    pub fn can_be_shader_visible(self) -> bool {
        matches!(self, Self::CbvSrvUav | Self::Sampler)
    }
}

/// The usage a resource is prepared for. A transition barrier moves a
/// resource from one state to another.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum ResourceState {
    #[default]
    Common,
    VertexAndConstantBuffer,
    IndexBuffer,
    RenderTarget,
    DepthWrite,
    DepthRead,
    NonPixelShaderResource,
    PixelShaderResource,
    CopyDest,
    CopySource,
    GenericRead,
    Present,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CpuDescriptorHandle(pub usize);

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct GpuDescriptorHandle(pub u64);

impl CpuDescriptorHandle {
    #[must_use]
    pub fn offset(self, index: u32, stride: u32) -> Self {
        Self(self.0 + index as usize * stride as usize)
    }
}

impl GpuDescriptorHandle {
    #[must_use]
    pub fn offset(self, index: u32, stride: u32) -> Self {
        Self(self.0 + u64::from(index) * u64::from(stride))
    }
}

/// CPU-side contents of one subresource (a mip level or array slice).
///
/// `row_pitch` is the distance in bytes between rows in `data` and
/// `slice_pitch` the distance between depth slices. For buffers, `data` is
/// copied verbatim and both pitches are its length.
#[derive(Clone, Copy, Debug)]
pub struct SubresourceData<'a> {
    pub data: &'a [u8],
    pub row_pitch: usize,
    pub slice_pitch: usize,
}

impl<'a> SubresourceData<'a> {
    #[must_use]
    pub fn buffer(data: &'a [u8]) -> Self {
        Self {
            data,
            row_pitch: data.len(),
            slice_pitch: data.len(),
        }
    }

    /// A tightly packed 2D image.
    #[must_use]
    pub fn image(data: &'a [u8], width: u32, height: u32, bytes_per_texel: u32) -> Self {
        let row_pitch = width as usize * bytes_per_texel as usize;
        Self {
            data,
            row_pitch,
            slice_pitch: row_pitch * height as usize,
        }
    }
}

/// Device capabilities the submission core is built on.
///
/// Backends: [`SoftDevice`](crate::soft::SoftDevice) everywhere, and
/// `Dx12Device` on Windows.
pub trait Device {
    type Queue;
    type Fence;
    /// The OS primitive a thread blocks on while waiting for a fence.
    type Event;
    type Allocator;
    type List;
    type Heap;
    type Resource;
    type Pipeline;

    fn create_queue(&self, kind: QueueKind) -> Result<Self::Queue, Error>;

    fn create_fence(&self, initial_value: u64) -> Result<Self::Fence, Error>;

    fn create_event(&self) -> Result<Self::Event, Error>;

    fn create_command_allocator(&self, kind: QueueKind) -> Result<Self::Allocator, Error>;

    /// Creates a command list that is open for recording into `allocator`.
    fn create_command_list(
        &self,
        kind: QueueKind,
        allocator: &Self::Allocator,
    ) -> Result<Self::List, Error>;

    /// Releases the memory backing every list recorded into `allocator`.
    ///
    /// The caller must guarantee that none of that work is still executing.
    fn reset_command_allocator(&self, allocator: &Self::Allocator) -> Result<(), Error>;

    /// Reopens a closed list for recording into `allocator`.
    fn reset_command_list(&self, list: &Self::List, allocator: &Self::Allocator)
        -> Result<(), Error>;

    fn close_command_list(&self, list: &Self::List) -> Result<(), Error>;

    fn execute(&self, queue: &Self::Queue, list: &Self::List) -> Result<(), Error>;

    /// Sets `fence` to `value` once all work previously submitted to `queue`
    /// has finished.
    fn signal(&self, queue: &Self::Queue, fence: &Self::Fence, value: u64) -> Result<(), Error>;

    fn completed_value(&self, fence: &Self::Fence) -> u64;

    /// Blocks the calling thread until `fence` reaches `value`. There is no
    /// timeout.
    fn wait_for_value(
        &self,
        fence: &Self::Fence,
        value: u64,
        event: &Self::Event,
    ) -> Result<(), Error>;

    fn create_descriptor_heap(
        &self,
        kind: DescriptorHeapKind,
        capacity: u32,
        shader_visible: bool,
    ) -> Result<Self::Heap, Error>;

    /// The distance in bytes between two descriptors of the given kind.
    fn descriptor_stride(&self, kind: DescriptorHeapKind) -> u32;

    /// Handles to the first descriptor in the heap. The GPU handle is only
    /// present for shader-visible heaps.
    fn heap_start(&self, heap: &Self::Heap) -> (CpuDescriptorHandle, Option<GpuDescriptorHandle>);

    /// Writes a shader resource view of `resource` into the descriptor at
    /// `handle`.
    fn create_texture_view(&self, resource: &Self::Resource, handle: CpuDescriptorHandle);

    /// The size of the staging buffer needed to upload the first
    /// `subresources` subresources of `resource`.
    fn required_upload_size(&self, resource: &Self::Resource, subresources: u32) -> Result<u64, Error>;

    /// Creates a CPU-writable buffer in the upload heap.
    fn create_staging_buffer(&self, size: u64) -> Result<Self::Resource, Error>;

    fn transition(
        &self,
        list: &Self::List,
        resource: &Self::Resource,
        before: ResourceState,
        after: ResourceState,
    );

    /// Copies `subresources` into `staging` using the destination's copyable
    /// layout, then records a GPU copy from `staging` into `dst`.
    ///
    /// Source data that is too short for its pitches, or longer than a
    /// destination buffer, fails with [`Error::InvalidUpload`].
    fn write_subresources(
        &self,
        list: &Self::List,
        dst: &Self::Resource,
        staging: &Self::Resource,
        subresources: &[SubresourceData],
    ) -> Result<(), Error>;

    fn create_pipeline(&self, desc: &PipelineDesc, shaders: &ShaderSet)
        -> Result<Self::Pipeline, Error>;
}
