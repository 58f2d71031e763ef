//! Graphics pipeline descriptions.
//!
//! Every pipeline the renderer builds is described by one [`PipelineDesc`].
//! The presets cover the passes the renderer draws (meshes, skybox, shadow
//! maps, tessellated terrain); anything else is a field tweak away.

use crate::Error;

bitflags::bitflags! {
    /// The programmable stages a pipeline is built from.
    pub struct ShaderStages: u8 {
        const VERTEX = 1 << 0;
        const HULL = 1 << 1;
        const DOMAIN = 1 << 2;
        const GEOMETRY = 1 << 3;
        const PIXEL = 1 << 4;
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Topology {
    Point,
    Line,
    Triangle,
    /// Control-point patches for the tessellation stages.
    Patch,
}

/// Vertex formats the renderer feeds its pipelines.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum VertexLayout {
    /// `float3` position.
    Position,
    /// `float3` position, `float3` normal, `float2` uv.
    PositionNormalUv,
    /// `float3` position, `float2` chunk-local position, `float2` uv.
    TerrainPatch,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CullMode {
    None,
    Front,
    Back,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CompareFunc {
    Never,
    Less,
    Equal,
    LessEqual,
    Greater,
    NotEqual,
    GreaterEqual,
    Always,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Blend {
    Opaque,
    /// `src * src_alpha + dst * (1 - src_alpha)`, alpha written as-is.
    Alpha,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Format {
    Rgba8Unorm,
    Rgba16Float,
    D32Float,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct DepthConfig {
    pub enabled: bool,
    pub write: bool,
    pub compare: CompareFunc,
    pub bias: i32,
    // Stored as bits so that the description stays `Eq + Hash`.
    slope_scaled_bias: u32,
}

impl DepthConfig {
    pub const DISABLED: Self = Self {
        enabled: false,
        write: false,
        compare: CompareFunc::Always,
        bias: 0,
        slope_scaled_bias: 0,
    };

    /// Depth testing with `LessEqual`, writing depth.
    pub const LESS_EQUAL: Self = Self {
        enabled: true,
        write: true,
        compare: CompareFunc::LessEqual,
        bias: 0,
        slope_scaled_bias: 0,
    };

    #[must_use]
    pub fn with_bias(mut self, bias: i32, slope_scaled_bias: f32) -> Self {
        self.bias = bias;
        self.slope_scaled_bias = slope_scaled_bias.to_bits();
        self
    }

    #[must_use]
    pub fn slope_scaled_bias(&self) -> f32 {
        f32::from_bits(self.slope_scaled_bias)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct PipelineDesc {
    pub topology: Topology,
    pub stages: ShaderStages,
    pub vertex_layout: VertexLayout,
    pub depth: DepthConfig,
    pub blend: Blend,
    pub cull: CullMode,
    /// `None` for depth-only passes.
    pub color_format: Option<Format>,
    pub depth_format: Option<Format>,
}

impl PipelineDesc {
    /// Lit, textured meshes.
    #[must_use]
    pub fn mesh() -> Self {
        Self {
            topology: Topology::Triangle,
            stages: ShaderStages::VERTEX | ShaderStages::PIXEL,
            vertex_layout: VertexLayout::PositionNormalUv,
            depth: DepthConfig::LESS_EQUAL,
            blend: Blend::Opaque,
            cull: CullMode::None,
            color_format: Some(Format::Rgba8Unorm),
            depth_format: Some(Format::D32Float),
        }
    }

    #[must_use]
    pub fn skybox() -> Self {
        Self {
            blend: Blend::Alpha,
            ..Self::mesh()
        }
    }

    /// Depth-only rendering of meshes from a light's point of view.
    #[must_use]
    pub fn shadow_map() -> Self {
        Self {
            vertex_layout: VertexLayout::Position,
            depth: DepthConfig::LESS_EQUAL.with_bias(100_000, 1.0),
            color_format: None,
            ..Self::mesh()
        }
    }

    /// Tessellated terrain patches.
    #[must_use]
    pub fn terrain() -> Self {
        Self {
            topology: Topology::Patch,
            stages: ShaderStages::VERTEX
                | ShaderStages::HULL
                | ShaderStages::DOMAIN
                | ShaderStages::PIXEL,
            vertex_layout: VertexLayout::TerrainPatch,
            cull: CullMode::Back,
            ..Self::mesh()
        }
    }

    #[must_use]
    pub fn terrain_shadow_map() -> Self {
        Self {
            stages: ShaderStages::VERTEX | ShaderStages::HULL | ShaderStages::DOMAIN,
            depth: DepthConfig::LESS_EQUAL.with_bias(1500, 2.5),
            color_format: None,
            ..Self::terrain()
        }
    }

    /// Fails if `shaders` does not provide exactly the stages this pipeline
    /// is built from.
    pub fn check_shaders(&self, shaders: &ShaderSet) -> Result<(), Error> {
        let provided = shaders.stages();
        if provided == self.stages {
            Ok(())
        } else {
            Err(Error::ShaderStageMismatch {
                expected: self.stages,
                provided,
            })
        }
    }
}

/// Compiled bytecode for each stage of a pipeline.
#[derive(Clone, Copy, Debug, Default)]
pub struct ShaderSet<'a> {
    pub vertex: Option<&'a [u8]>,
    pub hull: Option<&'a [u8]>,
    pub domain: Option<&'a [u8]>,
    pub geometry: Option<&'a [u8]>,
    pub pixel: Option<&'a [u8]>,
}

impl<'a> ShaderSet<'a> {
    #[must_use]
    pub fn vertex_pixel(vertex: &'a [u8], pixel: &'a [u8]) -> Self {
        Self {
            vertex: Some(vertex),
            pixel: Some(pixel),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn stages(&self) -> ShaderStages {
        [
            (self.vertex, ShaderStages::VERTEX),
            (self.hull, ShaderStages::HULL),
            (self.domain, ShaderStages::DOMAIN),
            (self.geometry, ShaderStages::GEOMETRY),
            (self.pixel, ShaderStages::PIXEL),
        ]
        .into_iter()
        .filter(|(code, _)| code.is_some())
        .fold(ShaderStages::empty(), |stages, (_, stage)| stages | stage)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;
    use crate::{soft::SoftDevice, Device};

    const CODE: &[u8] = &[0xDE, 0xAD];

    #[test]
    fn presets_are_distinct() {
        let presets = [
            PipelineDesc::mesh(),
            PipelineDesc::skybox(),
            PipelineDesc::shadow_map(),
            PipelineDesc::terrain(),
            PipelineDesc::terrain_shadow_map(),
        ];

        let unique = presets.iter().collect::<HashSet<_>>();
        assert_eq!(unique.len(), presets.len());
    }

    #[test]
    fn shadow_passes_are_depth_only() {
        for desc in [PipelineDesc::shadow_map(), PipelineDesc::terrain_shadow_map()] {
            assert_eq!(desc.color_format, None);
            assert!(desc.depth.enabled);
            assert!(desc.depth.bias > 0);
        }

        assert_eq!(PipelineDesc::terrain_shadow_map().depth.slope_scaled_bias(), 2.5);
        assert!(!PipelineDesc::terrain_shadow_map()
            .stages
            .contains(ShaderStages::PIXEL));
    }

    #[test]
    fn shader_set_stages() {
        let shaders = ShaderSet {
            vertex: Some(CODE),
            hull: Some(CODE),
            domain: Some(CODE),
            ..ShaderSet::default()
        };

        assert_eq!(
            shaders.stages(),
            ShaderStages::VERTEX | ShaderStages::HULL | ShaderStages::DOMAIN
        );
        assert!(PipelineDesc::terrain_shadow_map().check_shaders(&shaders).is_ok());
        assert!(PipelineDesc::terrain().check_shaders(&shaders).is_err());
    }

    #[test]
    fn create_checks_stages() {
        let device = SoftDevice::new().unwrap();

        let pipeline = device
            .create_pipeline(&PipelineDesc::mesh(), &ShaderSet::vertex_pixel(CODE, CODE))
            .unwrap();
        assert_eq!(pipeline.desc(), &PipelineDesc::mesh());

        let err = device
            .create_pipeline(&PipelineDesc::terrain(), &ShaderSet::vertex_pixel(CODE, CODE))
            .err()
            .unwrap();

        assert!(matches!(
            err,
            Error::ShaderStageMismatch { expected, provided }
                if expected == PipelineDesc::terrain().stages
                    && provided == ShaderStages::VERTEX | ShaderStages::PIXEL
        ));
    }
}
