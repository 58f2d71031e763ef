//! Runs a small frame loop on the software device.
//!
//! `RUST_LOG=trace cargo run -p gpu --example headless` shows every submit,
//! wait and upload step.

use gpu::{
    soft::SoftDevice, Device, GraphicsConfig, GraphicsContext, PipelineDesc, ResourceState,
    ShaderSet, SubresourceData,
};

const FRAMES: usize = 8;

fn main() -> Result<(), gpu::Error> {
    env_logger::init();

    let device = SoftDevice::new()?;
    let config = GraphicsConfig {
        shader_heap_capacity: 1024,
        ..GraphicsConfig::default()
    };

    let mut context = GraphicsContext::new(&device, &config)?;

    // Load-time content: a checkerboard texture and a quad.
    let (width, height) = (8, 8);
    let texels = (0..width * height)
        .flat_map(|i| {
            let on = (i % width + i / width) % 2 == 0;
            let v = if on { 0xFF } else { 0x20 };
            [v, v, v, 0xFF]
        })
        .collect::<Vec<u8>>();

    let texture = device.create_texture(width, height, 4, 1);
    context.queue_mut().upload_resource(
        &texture,
        &[SubresourceData::image(&texels, width, height, 4)],
    )?;
    let texture_slot = context.shader_heap_mut().create_texture_view(&texture)?;

    let vertices = [0u8; 4 * 8 * 4];
    let vertex_buffer = device.create_buffer(vertices.len() as u64);
    context.queue_mut().upload_resource_as(
        &vertex_buffer,
        &[SubresourceData::buffer(&vertices)],
        ResourceState::VertexAndConstantBuffer,
    )?;

    let _pipeline = device.create_pipeline(
        &PipelineDesc::mesh(),
        &ShaderSet::vertex_pixel(&[0x44, 0x58], &[0x44, 0x58]),
    )?;

    log::info!(
        "texture published at shader heap slot {texture_slot} ({:?})",
        context.shader_heap().handle_at(texture_slot)
    );

    let back_buffers = config.back_buffer_count as usize;
    for frame in 0..FRAMES {
        let index = frame % back_buffers;
        let recording = context.begin_frame(index)?;
        recording.transition(&texture, ResourceState::PixelShaderResource, ResourceState::CopySource);
        recording.transition(&texture, ResourceState::CopySource, ResourceState::PixelShaderResource);
        let value = context.end_frame(index, recording)?;
        log::info!("frame {frame} on back buffer {index} completes at {value:?}");
    }

    context.prepare_resize()?;

    let errors = device.validation_errors();
    if errors.is_empty() {
        log::info!(
            "{} command lists executed with {} allocators",
            device.executed(),
            device.allocators_created()
        );
    } else {
        for error in errors {
            log::error!("{error}");
        }
    }

    Ok(())
}
