//! Synchronous CPU to GPU resource uploads.

use crate::{
    device::{Device, ResourceState, SubresourceData},
    queue::{CommandQueue, FenceValue},
    Error,
};

/// Progress of a single upload, traced as it advances.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum UploadState {
    /// Only the CPU-side data exists.
    Created,
    StagingAllocated,
    CopyRecorded,
    Submitted(FenceValue),
    Complete,
}

impl<'d, D: Device> CommandQueue<'d, D> {
    /// Copies `subresources` into `resource` and leaves it readable by pixel
    /// shaders.
    ///
    /// See [`Self::upload_resource_as`].
    pub fn upload_resource(
        &mut self,
        resource: &D::Resource,
        subresources: &[SubresourceData],
    ) -> Result<(), Error> {
        self.upload_resource_as(resource, subresources, ResourceState::PixelShaderResource)
    }

    /// Copies `subresources` into `resource` through a temporary staging
    /// buffer and transitions it from `Common` to `final_state`.
    ///
    /// This blocks until the GPU has finished the copy, so it is meant for
    /// load-time uploads only. Calling it every frame stalls the frame on a
    /// full round trip to the GPU.
    pub fn upload_resource_as(
        &mut self,
        resource: &D::Resource,
        subresources: &[SubresourceData],
        final_state: ResourceState,
    ) -> Result<(), Error> {
        if subresources.is_empty() {
            return Err(Error::InvalidUpload("no subresources to upload".into()));
        }

        let count = u32::try_from(subresources.len())
            .map_err(|_| Error::InvalidUpload("too many subresources".into()))?;

        let mut state = UploadState::Created;
        log::trace!("upload {state:?}: {count} subresource(s)");

        let size = self.device().required_upload_size(resource, count)?;
        let staging = self.device().create_staging_buffer(size)?;
        state = advance(state, UploadState::StagingAllocated);

        let recording = self.acquire_recording_context()?;
        recording.transition(resource, ResourceState::Common, ResourceState::CopyDest);
        self.device()
            .write_subresources(recording.list(), resource, &staging, subresources)?;
        recording.transition(resource, ResourceState::CopyDest, final_state);
        state = advance(state, UploadState::CopyRecorded);

        let submitted = self.submit(recording)?;
        state = advance(state, UploadState::Submitted(submitted));

        let value = self.signal()?;
        if !self.is_complete(value) {
            log::debug!("upload of {size} bytes waiting on the GPU");
        }
        self.wait_until(value)?;
        advance(state, UploadState::Complete);

        // The staging buffer must outlive the copy that reads from it.
        drop(staging);
        Ok(())
    }
}

fn advance(from: UploadState, to: UploadState) -> UploadState {
    log::trace!("upload {from:?} -> {to:?}");
    to
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{device::QueueKind, soft::SoftDevice};

    #[test]
    fn texture_upload() {
        let device = SoftDevice::new().unwrap();
        let mut queue = CommandQueue::new(&device, QueueKind::Direct).unwrap();

        let texture = device.create_texture(3, 2, 4, 1);
        let pixels = (0..24).collect::<Vec<u8>>();

        queue
            .upload_resource(&texture, &[SubresourceData::image(&pixels, 3, 2, 4)])
            .unwrap();

        assert_eq!(texture.contents(), pixels);
        assert_eq!(texture.state(), ResourceState::PixelShaderResource);
        assert!(device.validation_errors().is_empty());

        // One submission and one extra signal.
        assert_eq!(queue.last_signaled(), FenceValue(2));
        assert!(queue.is_complete(FenceValue(2)));
    }

    #[test]
    fn padded_rows_are_repacked() {
        let device = SoftDevice::new().unwrap();
        let mut queue = CommandQueue::new(&device, QueueKind::Direct).unwrap();

        let texture = device.create_texture(2, 2, 1, 1);
        let data = [1, 2, 0xFF, 0xFF, 3, 4];
        let source = SubresourceData {
            data: &data,
            row_pitch: 4,
            slice_pitch: 8,
        };

        queue.upload_resource(&texture, &[source]).unwrap();
        assert_eq!(texture.contents(), [1, 2, 3, 4]);
    }

    #[test]
    fn array_slices() {
        let device = SoftDevice::new().unwrap();
        let mut queue = CommandQueue::new(&device, QueueKind::Direct).unwrap();

        let texture = device.create_texture(2, 1, 1, 2);
        queue
            .upload_resource(
                &texture,
                &[
                    SubresourceData::image(&[1, 2], 2, 1, 1),
                    SubresourceData::image(&[3, 4], 2, 1, 1),
                ],
            )
            .unwrap();

        assert_eq!(texture.contents(), [1, 2, 3, 4]);
    }

    #[test]
    fn buffer_upload_as_vertex_buffer() {
        let device = SoftDevice::new().unwrap();
        let mut queue = CommandQueue::new(&device, QueueKind::Direct).unwrap();

        let buffer = device.create_buffer(8);
        let data = [9u8; 8];

        queue
            .upload_resource_as(
                &buffer,
                &[SubresourceData::buffer(&data)],
                ResourceState::VertexAndConstantBuffer,
            )
            .unwrap();

        assert_eq!(buffer.contents(), data);
        assert_eq!(buffer.state(), ResourceState::VertexAndConstantBuffer);
        assert!(device.validation_errors().is_empty());
    }

    #[test]
    fn empty_upload_is_rejected() {
        let device = SoftDevice::new().unwrap();
        let mut queue = CommandQueue::new(&device, QueueKind::Direct).unwrap();

        let texture = device.create_texture(1, 1, 4, 1);
        assert!(matches!(
            queue.upload_resource(&texture, &[]),
            Err(Error::InvalidUpload(_))
        ));
        assert_eq!(queue.last_signaled(), FenceValue(0));
    }

    #[test]
    fn short_source_is_rejected() {
        let device = SoftDevice::new().unwrap();
        let mut queue = CommandQueue::new(&device, QueueKind::Direct).unwrap();

        let texture = device.create_texture(4, 4, 4, 1);
        let pixels = [0u8; 16];

        assert!(matches!(
            queue.upload_resource(&texture, &[SubresourceData::image(&pixels, 4, 4, 4)]),
            Err(Error::InvalidUpload(_))
        ));
        assert_eq!(queue.last_signaled(), FenceValue(0));
        assert_eq!(device.executed(), 0);
        assert_eq!(texture.state(), ResourceState::Common);
    }

    #[test]
    fn long_buffer_source_is_rejected() {
        let device = SoftDevice::new().unwrap();
        let mut queue = CommandQueue::new(&device, QueueKind::Direct).unwrap();

        let buffer = device.create_buffer(4);
        let data = [1u8, 2, 3, 4, 5, 6, 7, 8];

        assert!(matches!(
            queue.upload_resource(&buffer, &[SubresourceData::buffer(&data)]),
            Err(Error::InvalidUpload(_))
        ));
        assert_eq!(queue.last_signaled(), FenceValue(0));
        assert_eq!(device.executed(), 0);
        assert_eq!(buffer.contents(), [0u8; 4]);
    }

    #[test]
    fn too_many_subresources_is_rejected() {
        let device = SoftDevice::new().unwrap();
        let mut queue = CommandQueue::new(&device, QueueKind::Direct).unwrap();

        let buffer = device.create_buffer(2);
        let data = [0u8; 2];

        let result = queue.upload_resource(
            &buffer,
            &[SubresourceData::buffer(&data), SubresourceData::buffer(&data)],
        );
        assert!(matches!(result, Err(Error::InvalidUpload(_))));
    }

    #[test]
    fn uploads_recycle_recording_contexts() {
        let device = SoftDevice::new().unwrap();
        let mut queue = CommandQueue::new(&device, QueueKind::Direct).unwrap();

        let texture = device.create_texture(1, 1, 4, 1);
        let pixel = [0u8; 4];

        for _ in 0..4 {
            // Each upload waits for itself, so the previous allocator is
            // always reusable.
            queue
                .upload_resource_as(
                    &texture,
                    &[SubresourceData::image(&pixel, 1, 1, 4)],
                    ResourceState::Common,
                )
                .unwrap();
        }

        assert_eq!(device.allocators_created(), 1);
        assert_eq!(device.lists_created(), 1);
        assert!(device.validation_errors().is_empty());
    }
}
