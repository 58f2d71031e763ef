//! Direct3D 12.

use std::mem::ManuallyDrop;

use smallvec::{smallvec, SmallVec};
use windows::{
    core::ComInterface,
    Win32::{
        Foundation::{CloseHandle, HANDLE},
        Graphics::{
            Direct3D12::*,
            Dxgi::Common::{DXGI_FORMAT_UNKNOWN, DXGI_SAMPLE_DESC},
        },
        System::Threading::{CreateEventW, WaitForSingleObject},
    },
};

use crate::{
    device::{
        CpuDescriptorHandle, DescriptorHeapKind, Device, GpuDescriptorHandle, QueueKind,
        ResourceState, SubresourceData,
    },
    pipeline::{Format, PipelineDesc, ShaderSet},
    Error, GraphicsConfig,
};

mod dx;
mod pipeline;

pub use pipeline::Pipeline;

/// An OS event a thread blocks on until a fence reaches a value.
pub struct FenceEvent(HANDLE);

impl Drop for FenceEvent {
    fn drop(&mut self) {
        if let Err(err) = unsafe { CloseHandle(self.0) }.ok() {
            log::error!("failed to close fence event: {err}");
        }
    }
}

pub struct Dx12Device {
    dx: dx::Interfaces,
}

impl Dx12Device {
    pub fn new(config: &GraphicsConfig) -> Result<Self, Error> {
        Ok(Self {
            dx: dx::Interfaces::new(config)?,
        })
    }

    pub fn raw(&self) -> &ID3D12Device {
        &self.dx.device
    }

    /// Creates a 2D texture (or texture array) in GPU memory, in the `Common`
    /// state and ready to be uploaded to.
    pub fn create_texture(
        &self,
        width: u32,
        height: u32,
        array_size: u16,
        format: Format,
    ) -> Result<ID3D12Resource, Error> {
        self.create_committed(
            D3D12_HEAP_TYPE_DEFAULT,
            &D3D12_RESOURCE_DESC {
                Dimension: D3D12_RESOURCE_DIMENSION_TEXTURE2D,
                Alignment: 0,
                Width: u64::from(width),
                Height: height,
                DepthOrArraySize: array_size,
                MipLevels: 1,
                Format: pipeline::dxgi_format(format),
                SampleDesc: DXGI_SAMPLE_DESC {
                    Count: 1,
                    Quality: 0,
                },
                Layout: D3D12_TEXTURE_LAYOUT_UNKNOWN,
                Flags: D3D12_RESOURCE_FLAG_NONE,
            },
            D3D12_RESOURCE_STATE_COMMON,
        )
    }

    /// Creates a buffer in GPU memory, in the `Common` state.
    pub fn create_buffer(&self, size: u64) -> Result<ID3D12Resource, Error> {
        self.create_committed(
            D3D12_HEAP_TYPE_DEFAULT,
            &buffer_desc(size),
            D3D12_RESOURCE_STATE_COMMON,
        )
    }

    fn create_committed(
        &self,
        heap: D3D12_HEAP_TYPE,
        desc: &D3D12_RESOURCE_DESC,
        state: D3D12_RESOURCE_STATES,
    ) -> Result<ID3D12Resource, Error> {
        let mut resource: Option<ID3D12Resource> = None;
        unsafe {
            self.dx.device.CreateCommittedResource(
                &D3D12_HEAP_PROPERTIES {
                    Type: heap,
                    CPUPageProperty: D3D12_CPU_PAGE_PROPERTY_UNKNOWN,
                    MemoryPoolPreference: D3D12_MEMORY_POOL_UNKNOWN,
                    CreationNodeMask: 0,
                    VisibleNodeMask: 0,
                },
                D3D12_HEAP_FLAG_NONE, // set automatically by CreateCommitedResource
                desc,
                state,
                None,
                &mut resource,
            )
        }?;

        resource.ok_or_else(|| Error::Device("CreateCommittedResource returned no resource".into()))
    }

    fn footprints(
        &self,
        resource: &ID3D12Resource,
        count: u32,
    ) -> Result<(Footprints, u64), Error> {
        let desc = unsafe { resource.GetDesc() };

        let available = if desc.Dimension == D3D12_RESOURCE_DIMENSION_BUFFER {
            1
        } else {
            u32::from(desc.MipLevels) * u32::from(desc.DepthOrArraySize)
        };

        if count > available {
            return Err(Error::InvalidUpload(format!(
                "resource has {available} subresources, {count} requested"
            )));
        }

        let mut footprints = Footprints {
            layouts: smallvec![D3D12_PLACED_SUBRESOURCE_FOOTPRINT::default(); count as usize],
            rows: smallvec![0; count as usize],
            row_bytes: smallvec![0; count as usize],
        };
        let mut total = 0;

        unsafe {
            self.dx.device.GetCopyableFootprints(
                &desc,
                0,
                count,
                0,
                Some(footprints.layouts.as_mut_ptr()),
                Some(footprints.rows.as_mut_ptr()),
                Some(footprints.row_bytes.as_mut_ptr()),
                Some(&mut total),
            );
        }

        Ok((footprints, total))
    }
}

/// Staging layout of each subresource as reported by `GetCopyableFootprints`.
struct Footprints {
    layouts: SmallVec<[D3D12_PLACED_SUBRESOURCE_FOOTPRINT; 4]>,
    rows: SmallVec<[u32; 4]>,
    row_bytes: SmallVec<[u64; 4]>,
}

impl Device for Dx12Device {
    type Queue = ID3D12CommandQueue;
    type Fence = ID3D12Fence;
    type Event = FenceEvent;
    type Allocator = ID3D12CommandAllocator;
    type List = ID3D12GraphicsCommandList;
    type Heap = ID3D12DescriptorHeap;
    type Resource = ID3D12Resource;
    type Pipeline = Pipeline;

    fn create_queue(&self, kind: QueueKind) -> Result<ID3D12CommandQueue, Error> {
        let queue = unsafe {
            self.dx.device.CreateCommandQueue(&D3D12_COMMAND_QUEUE_DESC {
                Type: list_type(kind),
                ..Default::default()
            })
        }?;
        Ok(queue)
    }

    fn create_fence(&self, initial_value: u64) -> Result<ID3D12Fence, Error> {
        let fence = unsafe { self.dx.device.CreateFence(initial_value, D3D12_FENCE_FLAG_NONE) }?;
        Ok(fence)
    }

    fn create_event(&self) -> Result<FenceEvent, Error> {
        let event = unsafe { CreateEventW(None, false, false, None) }?;
        Ok(FenceEvent(event))
    }

    fn create_command_allocator(&self, kind: QueueKind) -> Result<ID3D12CommandAllocator, Error> {
        let allocator = unsafe { self.dx.device.CreateCommandAllocator(list_type(kind)) }?;
        Ok(allocator)
    }

    fn create_command_list(
        &self,
        kind: QueueKind,
        allocator: &ID3D12CommandAllocator,
    ) -> Result<ID3D12GraphicsCommandList, Error> {
        let list = unsafe {
            self.dx
                .device
                .CreateCommandList(0, list_type(kind), allocator, None)
        }?;
        Ok(list)
    }

    fn reset_command_allocator(&self, allocator: &ID3D12CommandAllocator) -> Result<(), Error> {
        unsafe { allocator.Reset() }?;
        Ok(())
    }

    fn reset_command_list(
        &self,
        list: &ID3D12GraphicsCommandList,
        allocator: &ID3D12CommandAllocator,
    ) -> Result<(), Error> {
        unsafe { list.Reset(allocator, None) }?;
        Ok(())
    }

    fn close_command_list(&self, list: &ID3D12GraphicsCommandList) -> Result<(), Error> {
        unsafe { list.Close() }?;
        Ok(())
    }

    fn execute(
        &self,
        queue: &ID3D12CommandQueue,
        list: &ID3D12GraphicsCommandList,
    ) -> Result<(), Error> {
        let list = list.cast()?;
        unsafe { queue.ExecuteCommandLists(&[Some(list)]) };
        Ok(())
    }

    fn signal(&self, queue: &ID3D12CommandQueue, fence: &ID3D12Fence, value: u64) -> Result<(), Error> {
        unsafe { queue.Signal(fence, value) }?;
        Ok(())
    }

    fn completed_value(&self, fence: &ID3D12Fence) -> u64 {
        unsafe { fence.GetCompletedValue() }
    }

    fn wait_for_value(&self, fence: &ID3D12Fence, value: u64, event: &FenceEvent) -> Result<(), Error> {
        unsafe {
            fence.SetEventOnCompletion(value, event.0)?;
            WaitForSingleObject(event.0, u32::MAX);
        }
        Ok(())
    }

    fn create_descriptor_heap(
        &self,
        kind: DescriptorHeapKind,
        capacity: u32,
        shader_visible: bool,
    ) -> Result<ID3D12DescriptorHeap, Error> {
        if shader_visible && !kind.can_be_shader_visible() {
            return Err(Error::Device(format!(
                "{kind:?} descriptor heaps cannot be shader visible"
            )));
        }

        let heap = unsafe {
            self.dx
                .device
                .CreateDescriptorHeap(&D3D12_DESCRIPTOR_HEAP_DESC {
                    Type: heap_type(kind),
                    NumDescriptors: capacity,
                    Flags: if shader_visible {
                        D3D12_DESCRIPTOR_HEAP_FLAG_SHADER_VISIBLE
                    } else {
                        D3D12_DESCRIPTOR_HEAP_FLAG_NONE
                    },
                    NodeMask: 0,
                })
        }?;
        Ok(heap)
    }

    fn descriptor_stride(&self, kind: DescriptorHeapKind) -> u32 {
        unsafe { self.dx.device.GetDescriptorHandleIncrementSize(heap_type(kind)) }
    }

    fn heap_start(
        &self,
        heap: &ID3D12DescriptorHeap,
    ) -> (CpuDescriptorHandle, Option<GpuDescriptorHandle>) {
        let desc = unsafe { heap.GetDesc() };
        let cpu = unsafe { heap.GetCPUDescriptorHandleForHeapStart() };

        let gpu = (desc.Flags.0 & D3D12_DESCRIPTOR_HEAP_FLAG_SHADER_VISIBLE.0 != 0)
            .then(|| GpuDescriptorHandle(unsafe { heap.GetGPUDescriptorHandleForHeapStart() }.ptr));

        (CpuDescriptorHandle(cpu.ptr), gpu)
    }

    fn create_texture_view(&self, resource: &ID3D12Resource, handle: CpuDescriptorHandle) {
        unsafe {
            self.dx.device.CreateShaderResourceView(
                resource,
                None,
                D3D12_CPU_DESCRIPTOR_HANDLE { ptr: handle.0 },
            );
        }
    }

    fn required_upload_size(&self, resource: &ID3D12Resource, subresources: u32) -> Result<u64, Error> {
        self.footprints(resource, subresources).map(|(_, total)| total)
    }

    fn create_staging_buffer(&self, size: u64) -> Result<ID3D12Resource, Error> {
        self.create_committed(
            D3D12_HEAP_TYPE_UPLOAD,
            &buffer_desc(size),
            D3D12_RESOURCE_STATE_GENERIC_READ,
        )
    }

    fn transition(
        &self,
        list: &ID3D12GraphicsCommandList,
        resource: &ID3D12Resource,
        before: ResourceState,
        after: ResourceState,
    ) {
        unsafe {
            list.ResourceBarrier(&[transition_barrier(
                resource,
                resource_state(before),
                resource_state(after),
            )]);
        }
    }

    fn write_subresources(
        &self,
        list: &ID3D12GraphicsCommandList,
        dst: &ID3D12Resource,
        staging: &ID3D12Resource,
        subresources: &[SubresourceData],
    ) -> Result<(), Error> {
        let (footprints, total) = self.footprints(dst, subresources.len() as u32)?;

        let staging_len = unsafe { staging.GetDesc() }.Width;
        if staging_len < total {
            return Err(Error::InvalidUpload(format!(
                "staging buffer holds {staging_len} bytes, {total} needed"
            )));
        }

        let dst_desc = unsafe { dst.GetDesc() };
        let is_buffer = dst_desc.Dimension == D3D12_RESOURCE_DIMENSION_BUFFER;

        if is_buffer {
            let provided = subresources.first().map_or(0, |source| source.data.len() as u64);
            if provided > dst_desc.Width {
                return Err(Error::InvalidUpload(format!(
                    "{provided} bytes do not fit in a buffer of {} bytes",
                    dst_desc.Width
                )));
            }
        }

        for (i, source) in subresources.iter().enumerate() {
            let row_bytes = footprints.row_bytes[i] as usize;
            let rows = footprints.rows[i] as usize;
            let depth = footprints.layouts[i].Footprint.Depth as usize;

            let needed = match rows {
                0 => 0,
                rows => source.slice_pitch * (depth - 1) + source.row_pitch * (rows - 1) + row_bytes,
            };

            if (rows > 1 && source.row_pitch < row_bytes) || needed > source.data.len() {
                return Err(Error::InvalidUpload(format!(
                    "subresource {i} has {} bytes with row pitch {}, but {rows} rows of {row_bytes} bytes are needed",
                    source.data.len(),
                    source.row_pitch
                )));
            }
        }

        let mapped = {
            let mut ptr = std::ptr::null_mut();
            unsafe { staging.Map(0, None, Some(&mut ptr)) }?;
            ptr.cast::<u8>()
        };

        for (i, source) in subresources.iter().enumerate() {
            let layout = &footprints.layouts[i];
            let row_bytes = footprints.row_bytes[i] as usize;
            let row_pitch = layout.Footprint.RowPitch as usize;
            let rows = footprints.rows[i] as usize;
            let slice_pitch = row_pitch * rows;

            for z in 0..layout.Footprint.Depth as usize {
                for row in 0..rows {
                    let from = z * source.slice_pitch + row * source.row_pitch;
                    let to = layout.Offset as usize + z * slice_pitch + row * row_pitch;
                    unsafe {
                        std::ptr::copy_nonoverlapping(
                            source.data.as_ptr().add(from),
                            mapped.add(to),
                            row_bytes,
                        );
                    }
                }
            }
        }

        unsafe { staging.Unmap(0, None) };

        if is_buffer {
            let layout = &footprints.layouts[0];
            unsafe {
                list.CopyBufferRegion(
                    dst,
                    0,
                    staging,
                    layout.Offset,
                    u64::from(layout.Footprint.Width),
                );
            }
        } else {
            for (i, layout) in footprints.layouts.iter().enumerate() {
                let dst_location = D3D12_TEXTURE_COPY_LOCATION {
                    pResource: ManuallyDrop::new(Some(unsafe { std::mem::transmute_copy(dst) })),
                    Type: D3D12_TEXTURE_COPY_TYPE_SUBRESOURCE_INDEX,
                    Anonymous: D3D12_TEXTURE_COPY_LOCATION_0 {
                        SubresourceIndex: i as u32,
                    },
                };

                let src_location = D3D12_TEXTURE_COPY_LOCATION {
                    pResource: ManuallyDrop::new(Some(unsafe { std::mem::transmute_copy(staging) })),
                    Type: D3D12_TEXTURE_COPY_TYPE_PLACED_FOOTPRINT,
                    Anonymous: D3D12_TEXTURE_COPY_LOCATION_0 {
                        PlacedFootprint: *layout,
                    },
                };

                unsafe { list.CopyTextureRegion(&dst_location, 0, 0, 0, &src_location, None) };
            }
        }

        Ok(())
    }

    fn create_pipeline(&self, desc: &PipelineDesc, shaders: &ShaderSet) -> Result<Pipeline, Error> {
        pipeline::create(&self.dx.device, desc, shaders)
    }
}

fn list_type(kind: QueueKind) -> D3D12_COMMAND_LIST_TYPE {
    match kind {
        QueueKind::Direct => D3D12_COMMAND_LIST_TYPE_DIRECT,
        QueueKind::Compute => D3D12_COMMAND_LIST_TYPE_COMPUTE,
        QueueKind::Copy => D3D12_COMMAND_LIST_TYPE_COPY,
    }
}

fn heap_type(kind: DescriptorHeapKind) -> D3D12_DESCRIPTOR_HEAP_TYPE {
    match kind {
        DescriptorHeapKind::CbvSrvUav => D3D12_DESCRIPTOR_HEAP_TYPE_CBV_SRV_UAV,
        DescriptorHeapKind::Sampler => D3D12_DESCRIPTOR_HEAP_TYPE_SAMPLER,
        DescriptorHeapKind::Rtv => D3D12_DESCRIPTOR_HEAP_TYPE_RTV,
        DescriptorHeapKind::Dsv => D3D12_DESCRIPTOR_HEAP_TYPE_DSV,
    }
}

fn resource_state(state: ResourceState) -> D3D12_RESOURCE_STATES {
    match state {
        ResourceState::Common => D3D12_RESOURCE_STATE_COMMON,
        ResourceState::VertexAndConstantBuffer => D3D12_RESOURCE_STATE_VERTEX_AND_CONSTANT_BUFFER,
        ResourceState::IndexBuffer => D3D12_RESOURCE_STATE_INDEX_BUFFER,
        ResourceState::RenderTarget => D3D12_RESOURCE_STATE_RENDER_TARGET,
        ResourceState::DepthWrite => D3D12_RESOURCE_STATE_DEPTH_WRITE,
        ResourceState::DepthRead => D3D12_RESOURCE_STATE_DEPTH_READ,
        ResourceState::NonPixelShaderResource => D3D12_RESOURCE_STATE_NON_PIXEL_SHADER_RESOURCE,
        ResourceState::PixelShaderResource => D3D12_RESOURCE_STATE_PIXEL_SHADER_RESOURCE,
        ResourceState::CopyDest => D3D12_RESOURCE_STATE_COPY_DEST,
        ResourceState::CopySource => D3D12_RESOURCE_STATE_COPY_SOURCE,
        ResourceState::GenericRead => D3D12_RESOURCE_STATE_GENERIC_READ,
        ResourceState::Present => D3D12_RESOURCE_STATE_PRESENT,
    }
}

fn buffer_desc(size: u64) -> D3D12_RESOURCE_DESC {
    D3D12_RESOURCE_DESC {
        Dimension: D3D12_RESOURCE_DIMENSION_BUFFER,
        Alignment: 0, // default: 64k
        Width: size,
        Height: 1,
        DepthOrArraySize: 1,
        MipLevels: 1,
        Format: DXGI_FORMAT_UNKNOWN,
        SampleDesc: DXGI_SAMPLE_DESC {
            Count: 1,
            Quality: 0,
        },
        Layout: D3D12_TEXTURE_LAYOUT_ROW_MAJOR,
        Flags: D3D12_RESOURCE_FLAG_NONE,
    }
}

fn transition_barrier(
    resource: &ID3D12Resource,
    state_before: D3D12_RESOURCE_STATES,
    state_after: D3D12_RESOURCE_STATES,
) -> D3D12_RESOURCE_BARRIER {
    D3D12_RESOURCE_BARRIER {
        Type: D3D12_RESOURCE_BARRIER_TYPE_TRANSITION,
        Flags: D3D12_RESOURCE_BARRIER_FLAG_NONE,
        Anonymous: D3D12_RESOURCE_BARRIER_0 {
            Transition: ManuallyDrop::new(D3D12_RESOURCE_TRANSITION_BARRIER {
                pResource: ManuallyDrop::new(Some(unsafe { std::mem::transmute_copy(resource) })),
                StateBefore: state_before,
                StateAfter: state_after,
                Subresource: D3D12_RESOURCE_BARRIER_ALL_SUBRESOURCES,
            }),
        },
    }
}
