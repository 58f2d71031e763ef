//! A software device.
//!
//! Work submitted to any queue runs in submission order on a single worker
//! thread, which stands in for the GPU's own timeline. Copies and transition
//! barriers are actually carried out on CPU memory, and misuse that a real
//! driver would only catch in its debug layer is recorded as a validation
//! error instead.
//!
//! The timeline can be paused, which holds every submission in the queue so
//! that tests can observe work that has not finished yet.

use std::{
    cell::RefCell,
    collections::{HashMap, VecDeque},
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
    thread::JoinHandle,
};

use parking_lot::{Condvar, Mutex};
use smallvec::{smallvec, SmallVec};

use crate::{
    device::{
        CpuDescriptorHandle, DescriptorHeapKind, Device, GpuDescriptorHandle, QueueKind,
        ResourceState, SubresourceData,
    },
    pipeline::{PipelineDesc, ShaderSet},
    Error,
};

/// Rows of a texture in staging memory start on multiples of this.
pub const ROW_PITCH_ALIGNMENT: u64 = 256;

/// Subresources in staging memory start on multiples of this.
pub const PLACEMENT_ALIGNMENT: u64 = 512;

pub struct SoftQueue {
    kind: QueueKind,
}

impl SoftQueue {
    #[must_use]
    pub fn kind(&self) -> QueueKind {
        self.kind
    }
}

pub struct SoftFence {
    id: usize,
}

/// Blocking is done on the timeline's condition variable, so events carry no
/// state of their own.
pub struct SoftEvent;

pub struct SoftAllocator {
    id: usize,
}

pub struct SoftList {
    kind: QueueKind,
    state: RefCell<ListState>,
}

impl SoftList {
    #[must_use]
    pub fn kind(&self) -> QueueKind {
        self.kind
    }

    #[must_use]
    pub fn is_open(&self) -> bool {
        self.state.borrow().open
    }
}

struct ListState {
    open: bool,
    allocator: usize,
    commands: Vec<Command>,
}

pub struct SoftHeap {
    kind: DescriptorHeapKind,
    capacity: u32,
    cpu_start: CpuDescriptorHandle,
    gpu_start: Option<GpuDescriptorHandle>,
}

impl SoftHeap {
    #[must_use]
    pub fn kind(&self) -> DescriptorHeapKind {
        self.kind
    }

    #[must_use]
    pub fn capacity(&self) -> u32 {
        self.capacity
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ResourceLayout {
    Buffer {
        len: u64,
    },
    /// Array slices of one 2D texture, stored tightly packed one after the
    /// other.
    Texture {
        width: u32,
        height: u32,
        bytes_per_texel: u32,
        subresources: u32,
    },
}

impl ResourceLayout {
    fn byte_len(self) -> u64 {
        match self {
            Self::Buffer { len } => len,
            Self::Texture {
                width,
                height,
                bytes_per_texel,
                subresources,
            } => {
                u64::from(width)
                    * u64::from(height)
                    * u64::from(bytes_per_texel)
                    * u64::from(subresources)
            }
        }
    }
}

/// A shared handle to device memory.
#[derive(Clone)]
pub struct SoftResource(Arc<ResourceInner>);

struct ResourceInner {
    id: usize,
    layout: ResourceLayout,
    bytes: Mutex<Vec<u8>>,
    state: Mutex<ResourceState>,
}

impl SoftResource {
    #[must_use]
    pub fn id(&self) -> usize {
        self.0.id
    }

    #[must_use]
    pub fn layout(&self) -> ResourceLayout {
        self.0.layout
    }

    /// The state the timeline last left the resource in.
    #[must_use]
    pub fn state(&self) -> ResourceState {
        *self.0.state.lock()
    }

    #[must_use]
    pub fn contents(&self) -> Vec<u8> {
        self.0.bytes.lock().clone()
    }
}

impl std::fmt::Debug for SoftResource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SoftResource")
            .field("id", &self.0.id)
            .field("layout", &self.0.layout)
            .finish()
    }
}

pub struct SoftPipeline {
    desc: PipelineDesc,
}

impl SoftPipeline {
    #[must_use]
    pub fn desc(&self) -> &PipelineDesc {
        &self.desc
    }
}

/// Where one subresource lives inside a staging buffer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct Footprint {
    offset: u64,
    row_pitch: u64,
    row_bytes: u64,
    rows: u32,
}

type Footprints = SmallVec<[Footprint; 4]>;

enum Command {
    Transition {
        resource: SoftResource,
        before: ResourceState,
        after: ResourceState,
    },
    CopyBuffer {
        dst: SoftResource,
        src: SoftResource,
        src_offset: u64,
        len: u64,
    },
    CopyTexture {
        dst: SoftResource,
        src: SoftResource,
        subresource: u32,
        footprint: Footprint,
    },
}

enum Work {
    Execute {
        commands: Vec<Command>,
        allocator: usize,
    },
    Signal {
        fence: usize,
        value: u64,
    },
}

#[derive(Default)]
struct TimelineState {
    paused: bool,
    shutdown: bool,
    work: VecDeque<Work>,
    fences: Vec<u64>,
    /// Submissions per allocator that have not finished executing.
    allocators_in_flight: Vec<u32>,
    executed: u64,
    validation_errors: Vec<String>,
}

#[derive(Default)]
struct Timeline {
    state: Mutex<TimelineState>,
    work_ready: Condvar,
    progress: Condvar,
}

pub struct SoftDevice {
    timeline: Arc<Timeline>,
    worker: Option<JoinHandle<()>>,
    next_resource: AtomicUsize,
    next_heap: AtomicUsize,
    lists_created: AtomicUsize,
    views: Mutex<HashMap<CpuDescriptorHandle, usize>>,
}

impl SoftDevice {
    pub fn new() -> Result<Self, Error> {
        let timeline = Arc::new(Timeline::default());

        let worker = {
            let timeline = timeline.clone();
            std::thread::Builder::new()
                .name("soft-gpu".into())
                .spawn(move || run_timeline(&timeline))
                .map_err(|err| {
                    Error::Device(format!("failed to spawn the software GPU thread: {err}"))
                })?
        };

        Ok(Self {
            timeline,
            worker: Some(worker),
            next_resource: AtomicUsize::new(1),
            next_heap: AtomicUsize::new(0),
            lists_created: AtomicUsize::new(0),
            views: Mutex::new(HashMap::new()),
        })
    }

    /// Holds all submitted work until [`Self::resume`] is called.
    pub fn pause(&self) {
        self.timeline.state.lock().paused = true;
    }

    pub fn resume(&self) {
        self.timeline.state.lock().paused = false;
        self.timeline.work_ready.notify_all();
    }

    #[must_use]
    pub fn create_buffer(&self, len: u64) -> SoftResource {
        self.create_resource(ResourceLayout::Buffer { len }, ResourceState::Common)
    }

    #[must_use]
    pub fn create_texture(
        &self,
        width: u32,
        height: u32,
        bytes_per_texel: u32,
        subresources: u32,
    ) -> SoftResource {
        self.create_resource(
            ResourceLayout::Texture {
                width,
                height,
                bytes_per_texel,
                subresources,
            },
            ResourceState::Common,
        )
    }

    /// Problems found while executing submitted work, such as a transition
    /// whose before-state did not match the resource.
    #[must_use]
    pub fn validation_errors(&self) -> Vec<String> {
        self.timeline.state.lock().validation_errors.clone()
    }

    #[must_use]
    pub fn allocators_created(&self) -> usize {
        self.timeline.state.lock().allocators_in_flight.len()
    }

    #[must_use]
    pub fn lists_created(&self) -> usize {
        self.lists_created.load(Ordering::Relaxed)
    }

    /// The number of command lists the timeline has finished executing.
    #[must_use]
    pub fn executed(&self) -> u64 {
        self.timeline.state.lock().executed
    }

    /// The id of the resource whose view was last written at `handle`.
    #[must_use]
    pub fn view_at(&self, handle: CpuDescriptorHandle) -> Option<usize> {
        self.views.lock().get(&handle).copied()
    }

    fn create_resource(&self, layout: ResourceLayout, state: ResourceState) -> SoftResource {
        SoftResource(Arc::new(ResourceInner {
            id: self.next_resource.fetch_add(1, Ordering::Relaxed),
            layout,
            bytes: Mutex::new(vec![0; layout.byte_len() as usize]),
            state: Mutex::new(state),
        }))
    }

    fn submit_work(&self, work: Work) {
        self.timeline.state.lock().work.push_back(work);
        self.timeline.work_ready.notify_all();
    }

    fn record(&self, list: &SoftList, command: Command) {
        let mut state = list.state.borrow_mut();
        if state.open {
            state.commands.push(command);
        } else {
            self.timeline
                .state
                .lock()
                .validation_errors
                .push("command recorded into a closed list".into());
        }
    }
}

impl Drop for SoftDevice {
    fn drop(&mut self) {
        {
            let mut state = self.timeline.state.lock();
            state.shutdown = true;
            state.paused = false;
        }
        self.timeline.work_ready.notify_all();

        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                log::error!("software GPU thread panicked");
            }
        }
    }
}

fn run_timeline(timeline: &Timeline) {
    loop {
        let work = {
            let mut state = timeline.state.lock();
            loop {
                if !state.paused {
                    if let Some(work) = state.work.pop_front() {
                        break work;
                    }
                }

                if state.shutdown && state.work.is_empty() {
                    return;
                }

                timeline.work_ready.wait(&mut state);
            }
        };

        match work {
            Work::Execute {
                commands,
                allocator,
            } => {
                let mut errors = Vec::new();
                for command in commands {
                    execute_command(command, &mut errors);
                }

                let mut state = timeline.state.lock();
                state.allocators_in_flight[allocator] -= 1;
                state.executed += 1;
                state.validation_errors.append(&mut errors);
            }
            Work::Signal { fence, value } => {
                let mut state = timeline.state.lock();
                state.fences[fence] = state.fences[fence].max(value);
            }
        }

        timeline.progress.notify_all();
    }
}

fn execute_command(command: Command, errors: &mut Vec<String>) {
    match command {
        Command::Transition {
            resource,
            before,
            after,
        } => {
            let mut state = resource.0.state.lock();
            if *state != before {
                errors.push(format!(
                    "resource {} transitioned from {before:?} but was in {:?}",
                    resource.0.id, *state
                ));
            }
            *state = after;
        }
        Command::CopyBuffer {
            dst,
            src,
            src_offset,
            len,
        } => {
            check_copy_dest(&dst, errors);

            let src_bytes = src.0.bytes.lock();
            let mut dst_bytes = dst.0.bytes.lock();
            let src_offset = src_offset as usize;
            let len = len as usize;
            dst_bytes[..len].copy_from_slice(&src_bytes[src_offset..src_offset + len]);
        }
        Command::CopyTexture {
            dst,
            src,
            subresource,
            footprint,
        } => {
            check_copy_dest(&dst, errors);

            let src_bytes = src.0.bytes.lock();
            let mut dst_bytes = dst.0.bytes.lock();
            let row_bytes = footprint.row_bytes as usize;
            let base = subresource as usize * row_bytes * footprint.rows as usize;

            for row in 0..footprint.rows as usize {
                let from = (footprint.offset + row as u64 * footprint.row_pitch) as usize;
                let to = base + row * row_bytes;
                dst_bytes[to..to + row_bytes].copy_from_slice(&src_bytes[from..from + row_bytes]);
            }
        }
    }
}

fn check_copy_dest(dst: &SoftResource, errors: &mut Vec<String>) {
    let state = dst.state();
    if state != ResourceState::CopyDest {
        errors.push(format!(
            "resource {} used as copy destination while in {state:?}",
            dst.0.id
        ));
    }
}

fn next_multiple_of(a: u64, b: u64) -> u64 {
    match a % b {
        0 => a,
        r => a + b - r,
    }
}

/// Lays out `count` subresources of `layout` in staging memory, returning the
/// footprints and the total size in bytes.
fn footprints(layout: ResourceLayout, count: u32) -> Result<(Footprints, u64), Error> {
    match layout {
        ResourceLayout::Buffer { len } => {
            if count != 1 {
                return Err(Error::InvalidUpload(format!(
                    "buffers have one subresource, {count} requested"
                )));
            }

            let footprint = Footprint {
                offset: 0,
                row_pitch: len,
                row_bytes: len,
                rows: 1,
            };
            Ok((smallvec![footprint], len))
        }
        ResourceLayout::Texture {
            width,
            height,
            bytes_per_texel,
            subresources,
        } => {
            if count > subresources {
                return Err(Error::InvalidUpload(format!(
                    "texture has {subresources} subresources, {count} requested"
                )));
            }

            let row_bytes = u64::from(width) * u64::from(bytes_per_texel);
            let row_pitch = next_multiple_of(row_bytes, ROW_PITCH_ALIGNMENT);

            // The last row is not padded out to the full pitch.
            let size = match height {
                0 => 0,
                height => row_pitch * u64::from(height - 1) + row_bytes,
            };

            let mut total = 0;
            let mut footprints = Footprints::with_capacity(count as usize);
            for _ in 0..count {
                let offset = next_multiple_of(total, PLACEMENT_ALIGNMENT);
                total = offset + size;
                footprints.push(Footprint {
                    offset,
                    row_pitch,
                    row_bytes,
                    rows: height,
                });
            }

            Ok((footprints, total))
        }
    }
}

impl Device for SoftDevice {
    type Queue = SoftQueue;
    type Fence = SoftFence;
    type Event = SoftEvent;
    type Allocator = SoftAllocator;
    type List = SoftList;
    type Heap = SoftHeap;
    type Resource = SoftResource;
    type Pipeline = SoftPipeline;

    fn create_queue(&self, kind: QueueKind) -> Result<SoftQueue, Error> {
        Ok(SoftQueue { kind })
    }

    fn create_fence(&self, initial_value: u64) -> Result<SoftFence, Error> {
        let mut state = self.timeline.state.lock();
        state.fences.push(initial_value);
        Ok(SoftFence {
            id: state.fences.len() - 1,
        })
    }

    fn create_event(&self) -> Result<SoftEvent, Error> {
        Ok(SoftEvent)
    }

    fn create_command_allocator(&self, _kind: QueueKind) -> Result<SoftAllocator, Error> {
        let mut state = self.timeline.state.lock();
        state.allocators_in_flight.push(0);
        Ok(SoftAllocator {
            id: state.allocators_in_flight.len() - 1,
        })
    }

    fn create_command_list(
        &self,
        kind: QueueKind,
        allocator: &SoftAllocator,
    ) -> Result<SoftList, Error> {
        self.lists_created.fetch_add(1, Ordering::Relaxed);
        Ok(SoftList {
            kind,
            state: RefCell::new(ListState {
                open: true,
                allocator: allocator.id,
                commands: Vec::new(),
            }),
        })
    }

    fn reset_command_allocator(&self, allocator: &SoftAllocator) -> Result<(), Error> {
        match self.timeline.state.lock().allocators_in_flight[allocator.id] {
            0 => Ok(()),
            pending => Err(Error::AllocatorInUse { pending }),
        }
    }

    fn reset_command_list(&self, list: &SoftList, allocator: &SoftAllocator) -> Result<(), Error> {
        let mut state = list.state.borrow_mut();
        if state.open {
            return Err(Error::InvalidCommandList("reset while still open"));
        }

        state.open = true;
        state.allocator = allocator.id;
        state.commands.clear();
        Ok(())
    }

    fn close_command_list(&self, list: &SoftList) -> Result<(), Error> {
        let mut state = list.state.borrow_mut();
        if !state.open {
            return Err(Error::InvalidCommandList("closed twice"));
        }

        state.open = false;
        Ok(())
    }

    fn execute(&self, _queue: &SoftQueue, list: &SoftList) -> Result<(), Error> {
        let mut state = list.state.borrow_mut();
        if state.open {
            return Err(Error::InvalidCommandList("executed while still open"));
        }

        let commands = std::mem::take(&mut state.commands);
        self.timeline.state.lock().allocators_in_flight[state.allocator] += 1;
        self.submit_work(Work::Execute {
            commands,
            allocator: state.allocator,
        });
        Ok(())
    }

    fn signal(&self, _queue: &SoftQueue, fence: &SoftFence, value: u64) -> Result<(), Error> {
        self.submit_work(Work::Signal {
            fence: fence.id,
            value,
        });
        Ok(())
    }

    fn completed_value(&self, fence: &SoftFence) -> u64 {
        self.timeline.state.lock().fences[fence.id]
    }

    fn wait_for_value(&self, fence: &SoftFence, value: u64, _event: &SoftEvent) -> Result<(), Error> {
        let mut state = self.timeline.state.lock();
        while state.fences[fence.id] < value {
            self.timeline.progress.wait(&mut state);
        }
        Ok(())
    }

    fn create_descriptor_heap(
        &self,
        kind: DescriptorHeapKind,
        capacity: u32,
        shader_visible: bool,
    ) -> Result<SoftHeap, Error> {
        if shader_visible && !kind.can_be_shader_visible() {
            return Err(Error::Device(format!(
                "{kind:?} descriptor heaps cannot be shader visible"
            )));
        }

        let id = self.next_heap.fetch_add(1, Ordering::Relaxed) + 1;

        Ok(SoftHeap {
            kind,
            capacity,
            cpu_start: CpuDescriptorHandle(id << 24),
            gpu_start: shader_visible.then_some(GpuDescriptorHandle((id as u64) << 32)),
        })
    }

    fn descriptor_stride(&self, kind: DescriptorHeapKind) -> u32 {
        match kind {
            DescriptorHeapKind::CbvSrvUav | DescriptorHeapKind::Rtv => 32,
            DescriptorHeapKind::Sampler => 16,
            DescriptorHeapKind::Dsv => 8,
        }
    }

    fn heap_start(&self, heap: &SoftHeap) -> (CpuDescriptorHandle, Option<GpuDescriptorHandle>) {
        (heap.cpu_start, heap.gpu_start)
    }

    fn create_texture_view(&self, resource: &SoftResource, handle: CpuDescriptorHandle) {
        self.views.lock().insert(handle, resource.id());
    }

    fn required_upload_size(&self, resource: &SoftResource, subresources: u32) -> Result<u64, Error> {
        footprints(resource.layout(), subresources).map(|(_, total)| total)
    }

    fn create_staging_buffer(&self, size: u64) -> Result<SoftResource, Error> {
        Ok(self.create_resource(ResourceLayout::Buffer { len: size }, ResourceState::GenericRead))
    }

    fn transition(
        &self,
        list: &SoftList,
        resource: &SoftResource,
        before: ResourceState,
        after: ResourceState,
    ) {
        self.record(
            list,
            Command::Transition {
                resource: resource.clone(),
                before,
                after,
            },
        );
    }

    fn write_subresources(
        &self,
        list: &SoftList,
        dst: &SoftResource,
        staging: &SoftResource,
        subresources: &[SubresourceData],
    ) -> Result<(), Error> {
        let (footprints, total) = footprints(dst.layout(), subresources.len() as u32)?;

        let ResourceLayout::Buffer { len: staging_len } = staging.layout() else {
            return Err(Error::InvalidUpload("staging resource is not a buffer".into()));
        };

        if staging_len < total {
            return Err(Error::InvalidUpload(format!(
                "staging buffer holds {staging_len} bytes, {total} needed"
            )));
        }

        if let ResourceLayout::Buffer { len } = dst.layout() {
            let provided = subresources.first().map_or(0, |source| source.data.len() as u64);
            if provided > len {
                return Err(Error::InvalidUpload(format!(
                    "{provided} bytes do not fit in a buffer of {len} bytes"
                )));
            }
        }

        {
            let mut staging_bytes = staging.0.bytes.lock();

            for (i, (source, footprint)) in subresources.iter().zip(&footprints).enumerate() {
                let row_bytes = footprint.row_bytes as usize;
                let rows = footprint.rows as usize;

                let needed = match rows {
                    0 => 0,
                    rows => source.row_pitch * (rows - 1) + row_bytes,
                };

                if (rows > 1 && source.row_pitch < row_bytes) || needed > source.data.len() {
                    return Err(Error::InvalidUpload(format!(
                        "subresource {i} has {} bytes with row pitch {}, but {rows} rows of {row_bytes} bytes are needed",
                        source.data.len(),
                        source.row_pitch
                    )));
                }

                for row in 0..rows {
                    let from = row * source.row_pitch;
                    let to = (footprint.offset + row as u64 * footprint.row_pitch) as usize;
                    staging_bytes[to..to + row_bytes]
                        .copy_from_slice(&source.data[from..from + row_bytes]);
                }
            }
        }

        match dst.layout() {
            ResourceLayout::Buffer { len } => self.record(
                list,
                Command::CopyBuffer {
                    dst: dst.clone(),
                    src: staging.clone(),
                    src_offset: footprints[0].offset,
                    len,
                },
            ),
            ResourceLayout::Texture { .. } => {
                for (subresource, footprint) in footprints.into_iter().enumerate() {
                    self.record(
                        list,
                        Command::CopyTexture {
                            dst: dst.clone(),
                            src: staging.clone(),
                            subresource: subresource as u32,
                            footprint,
                        },
                    );
                }
            }
        }

        Ok(())
    }

    fn create_pipeline(&self, desc: &PipelineDesc, shaders: &ShaderSet) -> Result<SoftPipeline, Error> {
        desc.check_shaders(shaders)?;
        Ok(SoftPipeline { desc: *desc })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_device_starts_idle() {
        let device = SoftDevice::new().unwrap();

        assert_eq!(device.executed(), 0);
        assert_eq!(device.allocators_created(), 0);
        assert_eq!(device.lists_created(), 0);
        assert!(device.validation_errors().is_empty());
    }

    #[test]
    fn texture_footprints() {
        let layout = ResourceLayout::Texture {
            width: 3,
            height: 2,
            bytes_per_texel: 4,
            subresources: 2,
        };

        let (layouts, total) = footprints(layout, 2).unwrap();
        assert_eq!(
            layouts[0],
            Footprint {
                offset: 0,
                row_pitch: 256,
                row_bytes: 12,
                rows: 2,
            }
        );
        assert_eq!(layouts[1].offset, 512);
        assert_eq!(total, 512 + 268);

        assert!(footprints(layout, 3).is_err());
    }

    #[test]
    fn buffer_footprint() {
        let (layouts, total) = footprints(ResourceLayout::Buffer { len: 100 }, 1).unwrap();
        assert_eq!(layouts[0].row_bytes, 100);
        assert_eq!(total, 100);
        assert!(footprints(ResourceLayout::Buffer { len: 100 }, 2).is_err());
    }

    #[test]
    fn mismatched_transition_is_reported() {
        let device = SoftDevice::new().unwrap();
        let queue = device.create_queue(QueueKind::Direct).unwrap();
        let fence = device.create_fence(0).unwrap();
        let allocator = device.create_command_allocator(QueueKind::Direct).unwrap();
        let list = device.create_command_list(QueueKind::Direct, &allocator).unwrap();

        let buffer = device.create_buffer(4);
        device.transition(&list, &buffer, ResourceState::CopyDest, ResourceState::Common);
        device.close_command_list(&list).unwrap();
        device.execute(&queue, &list).unwrap();
        device.signal(&queue, &fence, 1).unwrap();
        device.wait_for_value(&fence, 1, &SoftEvent).unwrap();

        assert_eq!(device.validation_errors().len(), 1);
    }

    #[test]
    fn copy_outside_copy_dest_is_reported() {
        let device = SoftDevice::new().unwrap();
        let queue = device.create_queue(QueueKind::Copy).unwrap();
        let fence = device.create_fence(0).unwrap();
        let allocator = device.create_command_allocator(QueueKind::Copy).unwrap();
        let list = device.create_command_list(QueueKind::Copy, &allocator).unwrap();

        let buffer = device.create_buffer(2);
        let staging = device.create_staging_buffer(2).unwrap();
        device
            .write_subresources(&list, &buffer, &staging, &[SubresourceData::buffer(&[7, 8])])
            .unwrap();
        device.close_command_list(&list).unwrap();
        device.execute(&queue, &list).unwrap();
        device.signal(&queue, &fence, 1).unwrap();
        device.wait_for_value(&fence, 1, &SoftEvent).unwrap();

        assert_eq!(buffer.contents(), [7, 8]);
        assert_eq!(device.validation_errors().len(), 1);
    }

    #[test]
    fn allocator_reset_while_executing() {
        let device = SoftDevice::new().unwrap();
        let queue = device.create_queue(QueueKind::Direct).unwrap();
        let fence = device.create_fence(0).unwrap();
        let allocator = device.create_command_allocator(QueueKind::Direct).unwrap();
        let list = device.create_command_list(QueueKind::Direct, &allocator).unwrap();

        device.pause();
        device.close_command_list(&list).unwrap();
        device.execute(&queue, &list).unwrap();
        device.signal(&queue, &fence, 1).unwrap();

        assert!(matches!(
            device.reset_command_allocator(&allocator),
            Err(Error::AllocatorInUse { pending: 1 })
        ));

        device.resume();
        device.wait_for_value(&fence, 1, &SoftEvent).unwrap();
        assert!(device.reset_command_allocator(&allocator).is_ok());
    }

    #[test]
    fn list_state_is_checked() {
        let device = SoftDevice::new().unwrap();
        let queue = device.create_queue(QueueKind::Direct).unwrap();
        let allocator = device.create_command_allocator(QueueKind::Direct).unwrap();
        let list = device.create_command_list(QueueKind::Direct, &allocator).unwrap();

        assert!(list.is_open());
        assert!(device.execute(&queue, &list).is_err());
        assert!(device.reset_command_list(&list, &allocator).is_err());

        device.close_command_list(&list).unwrap();
        assert!(device.close_command_list(&list).is_err());
        assert!(device.reset_command_list(&list, &allocator).is_ok());
    }

    #[test]
    fn fence_waits_are_ordered() {
        let device = SoftDevice::new().unwrap();
        let queue = device.create_queue(QueueKind::Direct).unwrap();
        let fence = device.create_fence(5).unwrap();

        assert_eq!(device.completed_value(&fence), 5);

        // Lower values never move the fence backwards.
        device.signal(&queue, &fence, 3).unwrap();
        device.signal(&queue, &fence, 9).unwrap();
        device.wait_for_value(&fence, 9, &SoftEvent).unwrap();
        assert_eq!(device.completed_value(&fence), 9);
    }
}
