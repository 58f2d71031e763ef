use std::mem::ManuallyDrop;

use windows::{
    s,
    Win32::Graphics::{
        Direct3D12::*,
        Dxgi::Common::{
            DXGI_FORMAT, DXGI_FORMAT_D32_FLOAT, DXGI_FORMAT_R16G16B16A16_FLOAT,
            DXGI_FORMAT_R32G32B32_FLOAT, DXGI_FORMAT_R32G32_FLOAT, DXGI_FORMAT_R8G8B8A8_UNORM,
            DXGI_FORMAT_UNKNOWN, DXGI_SAMPLE_DESC,
        },
    },
};

use crate::{
    pipeline::{Blend, CompareFunc, CullMode, Format, PipelineDesc, ShaderSet, Topology, VertexLayout},
    Error,
};

pub struct Pipeline {
    pub root_signature: ID3D12RootSignature,
    pub pipeline_state: ID3D12PipelineState,
    desc: PipelineDesc,
}

impl Pipeline {
    pub fn desc(&self) -> &PipelineDesc {
        &self.desc
    }
}

pub(super) fn create(
    device: &ID3D12Device,
    desc: &PipelineDesc,
    shaders: &ShaderSet,
) -> Result<Pipeline, Error> {
    desc.check_shaders(shaders)?;

    // The root signature is embedded in the vertex shader.
    let vertex_shader = shaders
        .vertex
        .ok_or_else(|| Error::Device("pipelines need a vertex shader".into()))?;
    let root_signature: ID3D12RootSignature =
        unsafe { device.CreateRootSignature(0, vertex_shader) }?;

    let input_elements = input_layout(desc.vertex_layout);

    let mut blend_targets = [D3D12_RENDER_TARGET_BLEND_DESC::default(); 8];
    blend_targets[0] = render_target_blend(desc.blend);

    let mut render_target_formats = [DXGI_FORMAT_UNKNOWN; 8];
    if let Some(format) = desc.color_format {
        render_target_formats[0] = dxgi_format(format);
    }

    let stencil_op = D3D12_DEPTH_STENCILOP_DESC {
        StencilFailOp: D3D12_STENCIL_OP_KEEP,
        StencilDepthFailOp: D3D12_STENCIL_OP_KEEP,
        StencilPassOp: D3D12_STENCIL_OP_KEEP,
        StencilFunc: D3D12_COMPARISON_FUNC_ALWAYS,
    };

    let pipeline_info = D3D12_GRAPHICS_PIPELINE_STATE_DESC {
        pRootSignature: ManuallyDrop::new(Some(unsafe { std::mem::transmute_copy(&root_signature) })),
        VS: bytecode(shaders.vertex),
        HS: bytecode(shaders.hull),
        DS: bytecode(shaders.domain),
        GS: bytecode(shaders.geometry),
        PS: bytecode(shaders.pixel),
        BlendState: D3D12_BLEND_DESC {
            AlphaToCoverageEnable: false.into(),
            IndependentBlendEnable: false.into(),
            RenderTarget: blend_targets,
        },
        SampleMask: u32::MAX,
        RasterizerState: D3D12_RASTERIZER_DESC {
            FillMode: D3D12_FILL_MODE_SOLID,
            CullMode: match desc.cull {
                CullMode::None => D3D12_CULL_MODE_NONE,
                CullMode::Front => D3D12_CULL_MODE_FRONT,
                CullMode::Back => D3D12_CULL_MODE_BACK,
            },
            FrontCounterClockwise: false.into(),
            DepthBias: desc.depth.bias,
            DepthBiasClamp: 0.0,
            SlopeScaledDepthBias: desc.depth.slope_scaled_bias(),
            DepthClipEnable: true.into(),
            MultisampleEnable: false.into(),
            AntialiasedLineEnable: false.into(),
            ForcedSampleCount: 0,
            ConservativeRaster: D3D12_CONSERVATIVE_RASTERIZATION_MODE_OFF,
        },
        DepthStencilState: D3D12_DEPTH_STENCIL_DESC {
            DepthEnable: desc.depth.enabled.into(),
            DepthWriteMask: if desc.depth.write {
                D3D12_DEPTH_WRITE_MASK_ALL
            } else {
                D3D12_DEPTH_WRITE_MASK_ZERO
            },
            DepthFunc: comparison(desc.depth.compare),
            StencilEnable: false.into(),
            StencilReadMask: D3D12_DEFAULT_STENCIL_READ_MASK as u8,
            StencilWriteMask: D3D12_DEFAULT_STENCIL_WRITE_MASK as u8,
            FrontFace: stencil_op,
            BackFace: stencil_op,
        },
        InputLayout: D3D12_INPUT_LAYOUT_DESC {
            pInputElementDescs: input_elements.as_ptr(),
            NumElements: input_elements.len() as _,
        },
        PrimitiveTopologyType: match desc.topology {
            Topology::Point => D3D12_PRIMITIVE_TOPOLOGY_TYPE_POINT,
            Topology::Line => D3D12_PRIMITIVE_TOPOLOGY_TYPE_LINE,
            Topology::Triangle => D3D12_PRIMITIVE_TOPOLOGY_TYPE_TRIANGLE,
            Topology::Patch => D3D12_PRIMITIVE_TOPOLOGY_TYPE_PATCH,
        },
        NumRenderTargets: u32::from(desc.color_format.is_some()),
        RTVFormats: render_target_formats,
        DSVFormat: desc.depth_format.map_or(DXGI_FORMAT_UNKNOWN, dxgi_format),
        SampleDesc: DXGI_SAMPLE_DESC {
            Count: 1,
            Quality: 0,
        },
        NodeMask: 0,
        Flags: D3D12_PIPELINE_STATE_FLAG_NONE,
        ..Default::default()
    };

    let pipeline_state = unsafe { device.CreateGraphicsPipelineState(&pipeline_info) }?;

    log::debug!("created pipeline {:?} with {:?}", desc.topology, desc.stages);

    Ok(Pipeline {
        root_signature,
        pipeline_state,
        desc: *desc,
    })
}

pub(super) fn dxgi_format(format: Format) -> DXGI_FORMAT {
    match format {
        Format::Rgba8Unorm => DXGI_FORMAT_R8G8B8A8_UNORM,
        Format::Rgba16Float => DXGI_FORMAT_R16G16B16A16_FLOAT,
        Format::D32Float => DXGI_FORMAT_D32_FLOAT,
    }
}

fn bytecode(code: Option<&[u8]>) -> D3D12_SHADER_BYTECODE {
    code.map_or_else(D3D12_SHADER_BYTECODE::default, |code| D3D12_SHADER_BYTECODE {
        pShaderBytecode: code.as_ptr().cast(),
        BytecodeLength: code.len(),
    })
}

fn comparison(func: CompareFunc) -> D3D12_COMPARISON_FUNC {
    match func {
        CompareFunc::Never => D3D12_COMPARISON_FUNC_NEVER,
        CompareFunc::Less => D3D12_COMPARISON_FUNC_LESS,
        CompareFunc::Equal => D3D12_COMPARISON_FUNC_EQUAL,
        CompareFunc::LessEqual => D3D12_COMPARISON_FUNC_LESS_EQUAL,
        CompareFunc::Greater => D3D12_COMPARISON_FUNC_GREATER,
        CompareFunc::NotEqual => D3D12_COMPARISON_FUNC_NOT_EQUAL,
        CompareFunc::GreaterEqual => D3D12_COMPARISON_FUNC_GREATER_EQUAL,
        CompareFunc::Always => D3D12_COMPARISON_FUNC_ALWAYS,
    }
}

fn render_target_blend(blend: Blend) -> D3D12_RENDER_TARGET_BLEND_DESC {
    let (enable, src, dst) = match blend {
        Blend::Opaque => (false, D3D12_BLEND_ONE, D3D12_BLEND_ZERO),
        Blend::Alpha => (true, D3D12_BLEND_SRC_ALPHA, D3D12_BLEND_INV_SRC_ALPHA),
    };

    D3D12_RENDER_TARGET_BLEND_DESC {
        BlendEnable: enable.into(),
        LogicOpEnable: false.into(),
        SrcBlend: src,
        DestBlend: dst,
        BlendOp: D3D12_BLEND_OP_ADD,
        SrcBlendAlpha: D3D12_BLEND_ONE,
        DestBlendAlpha: D3D12_BLEND_ZERO,
        BlendOpAlpha: D3D12_BLEND_OP_ADD,
        LogicOp: D3D12_LOGIC_OP_NOOP,
        RenderTargetWriteMask: D3D12_COLOR_WRITE_ENABLE_ALL.0 as u8,
    }
}

fn input_element(name: windows::core::PCSTR, format: DXGI_FORMAT) -> D3D12_INPUT_ELEMENT_DESC {
    D3D12_INPUT_ELEMENT_DESC {
        SemanticName: name,
        SemanticIndex: 0,
        Format: format,
        InputSlot: 0,
        AlignedByteOffset: D3D12_APPEND_ALIGNED_ELEMENT,
        InputSlotClass: D3D12_INPUT_CLASSIFICATION_PER_VERTEX_DATA,
        InstanceDataStepRate: 0,
    }
}

fn input_layout(layout: VertexLayout) -> Vec<D3D12_INPUT_ELEMENT_DESC> {
    match layout {
        VertexLayout::Position => vec![input_element(s!("POSITION"), DXGI_FORMAT_R32G32B32_FLOAT)],
        VertexLayout::PositionNormalUv => vec![
            input_element(s!("POSITION"), DXGI_FORMAT_R32G32B32_FLOAT),
            input_element(s!("NORMAL"), DXGI_FORMAT_R32G32B32_FLOAT),
            input_element(s!("TEXCOORD"), DXGI_FORMAT_R32G32_FLOAT),
        ],
        VertexLayout::TerrainPatch => vec![
            input_element(s!("POSITION"), DXGI_FORMAT_R32G32B32_FLOAT),
            input_element(s!("CHUNKPOS"), DXGI_FORMAT_R32G32_FLOAT),
            input_element(s!("TEXCOORD"), DXGI_FORMAT_R32G32_FLOAT),
        ],
    }
}
