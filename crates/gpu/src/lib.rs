//! GPU command submission and synchronization.
//!
//! ## Goals
//!
//! - One queue abstraction that serializes recorded work and tracks its
//!   completion with a monotonic fence.
//! - Recording contexts (allocator + list) are recycled, never reset while the
//!   GPU may still be reading them.
//! - Fixed-capacity descriptor heaps with explicit allocation policies.
//! - Synchronous resource uploads for load-time content.
//! - No globals: everything hangs off a [`GraphicsContext`] that borrows the
//!   device.
//!
//! ## Non-goals
//!
//! - Multi-threaded command recording
//! - Multiple adapters
//! - Non-blocking asset streaming
//! - General-purpose GPU memory management
//!
//! ## Backends
//!
//! The core is written against the [`Device`] trait. [`soft::SoftDevice`]
//! runs anywhere and executes work on a CPU thread; `dx12::Dx12Device` drives
//! Direct3D 12 and is only built on Windows.

pub mod descriptor_heap;
pub mod device;
pub mod pipeline;
pub mod soft;

mod context;
mod error;
mod frame;
mod queue;
mod upload;

#[cfg(target_os = "windows")]
pub mod dx12;

pub use context::GraphicsContext;
pub use descriptor_heap::DescriptorHeap;
pub use device::{
    CpuDescriptorHandle, DescriptorHeapKind, Device, GpuDescriptorHandle, QueueKind,
    ResourceState, SubresourceData,
};
pub use error::Error;
pub use frame::FrameFences;
pub use pipeline::{PipelineDesc, ShaderSet, ShaderStages};
pub use queue::{CommandQueue, FenceValue, Recording};
pub use structures::SlotPolicy;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum PowerPreference {
    #[default]
    LowPower,
    HighPerformance,
}

#[derive(Clone, Debug)]
pub struct GraphicsConfig {
    /// Whether or not to enable debugging features.
    ///
    /// This may have an outsized impact on performance. Defaults to `None`,
    /// which automatically enables debugging features in debug builds. Override
    /// with `Some(true)` or `Some(false)` to force enable or disable debugging.
    pub debug_mode: Option<bool>,

    /// The power preference for adapter selection.
    ///
    /// `LowPower` prefers integrated GPUs over discrete GPUs, and
    /// `HighPerformance` does the reverse. Defaults to `LowPower`.
    pub power_preference: PowerPreference,

    /// The number of swapchain images frames rotate through.
    ///
    /// Defaults to 3.
    pub back_buffer_count: u32,

    /// Slots in the shader-visible CBV/SRV/UAV heap.
    ///
    /// Defaults to 65536.
    pub shader_heap_capacity: u32,

    /// Whether released shader heap slots are reused. Streamed content needs
    /// `FreeList`, which is the default.
    pub shader_heap_policy: SlotPolicy,

    /// Slots in the render target heap. `None` reserves one per back buffer,
    /// which is the default.
    pub render_target_heap_capacity: Option<u32>,

    /// Slots in the depth stencil heap.
    ///
    /// Defaults to 1.
    pub depth_stencil_heap_capacity: u32,
}

impl GraphicsConfig {
    #[must_use]
    pub fn debug_enabled(&self) -> bool {
        self.debug_mode.unwrap_or(cfg!(debug_assertions))
    }

    #[must_use]
    pub fn render_target_heap_capacity(&self) -> u32 {
        self.render_target_heap_capacity
            .unwrap_or(self.back_buffer_count)
    }
}

impl Default for GraphicsConfig {
    fn default() -> Self {
        Self {
            debug_mode: None,
            power_preference: PowerPreference::LowPower,
            back_buffer_count: 3,
            shader_heap_capacity: 65536,
            shader_heap_policy: SlotPolicy::FreeList,
            render_target_heap_capacity: None,
            depth_stencil_heap_capacity: 1,
        }
    }
}
