use crate::{device::DescriptorHeapKind, pipeline::ShaderStages};

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A device call failed. There is no recovery from this; the caller is
    /// expected to tear down the renderer.
    #[error("device error: {0}")]
    Device(String),

    #[cfg(target_os = "windows")]
    #[error(transparent)]
    Windows(#[from] windows::core::Error),

    /// A descriptor heap has no free slots left.
    ///
    /// Heaps using [`SlotPolicy::FreeList`](structures::SlotPolicy) can
    /// recover by releasing slots and trying again. Under the bump policy the
    /// heap will never have room again.
    #[error("{kind:?} descriptor heap exhausted ({capacity} slots)")]
    ResourceExhausted {
        kind: DescriptorHeapKind,
        capacity: u32,
    },

    /// A command allocator was reset while work recorded into it was still
    /// executing.
    #[error("command allocator reset with {pending} submission(s) still executing")]
    AllocatorInUse { pending: u32 },

    #[error("invalid command list usage: {0}")]
    InvalidCommandList(&'static str),

    #[error("invalid upload: {0}")]
    InvalidUpload(String),

    #[error("pipeline expects shader stages {expected:?} but {provided:?} were provided")]
    ShaderStageMismatch {
        expected: ShaderStages,
        provided: ShaderStages,
    },
}
