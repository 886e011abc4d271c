//! Resource, sampler and input-layout descriptions
//!
//! These are the backend-neutral descriptions the directive parsers build.
//! Backends turn a [`ResourceDesc`] into whatever object their API uses.

use crate::format::Format;
use std::fmt;

/// How a resource is bound to the pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ResourceType {
    RenderTarget,
    DepthStencil,
    Texture,
    Uav,
    VertexBuffer,
}

/// Resource types by the keyword used in block headers and references
pub const RESOURCE_TYPES: &[(&str, ResourceType)] = &[
    ("rtv", ResourceType::RenderTarget),
    ("dsv", ResourceType::DepthStencil),
    ("srv", ResourceType::Texture),
    ("uav", ResourceType::Uav),
    ("vb", ResourceType::VertexBuffer),
];

impl ResourceType {
    /// Keyword used in block headers
    pub fn name(self) -> &'static str {
        RESOURCE_TYPES.iter().find(|(_, ty)| *ty == self).map_or("", |(name, _)| *name)
    }
}

impl fmt::Display for ResourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Shape of a resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Dimension {
    Buffer,
    Texture2d,
    Texture2dMs,
    Texture2dArray,
    Texture3d,
    Cube,
}

impl Dimension {
    /// Whether the resource is a buffer rather than a texture
    pub fn is_buffer(self) -> bool {
        self == Dimension::Buffer
    }
}

/// Backend-neutral description of a resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ResourceDesc {
    pub slot: u32,
    pub ty: ResourceType,
    pub dimension: Dimension,
    pub format: Format,
    /// Bytes per element; the stride for structured buffers
    pub texel_size: u32,
    pub width: u32,
    pub height: u32,
    pub depth: u32,
    pub layer_count: u32,
    pub level_count: u32,
    pub sample_count: u32,
    /// Byte-addressed buffer
    pub is_raw: bool,
    /// Buffer used as the hidden counter of an append/consume UAV
    pub is_uav_counter: bool,
}

impl ResourceDesc {
    /// Creates a description with the defaults of a freshly opened resource block
    ///
    /// Textures default to a single 1x1 `r32g32b32a32-float` texel;
    /// depth-stencil views default to `d32-float` and vertex buffers to
    /// buffers.
    pub fn new(ty: ResourceType, slot: u32) -> Self {
        let format = match ty {
            ResourceType::DepthStencil => Format::D32Float,
            _ => Format::R32G32B32A32Float,
        };
        let dimension = match ty {
            ResourceType::VertexBuffer => Dimension::Buffer,
            _ => Dimension::Texture2d,
        };

        Self {
            slot,
            ty,
            dimension,
            format,
            texel_size: format.texel_size(),
            width: 1,
            height: 1,
            depth: 1,
            layer_count: 1,
            level_count: 1,
            sample_count: 1,
            is_raw: false,
            is_uav_counter: false,
        }
    }

    /// Width of a mip level
    pub fn level_width(&self, level: u32) -> u32 {
        self.width.checked_shr(level).unwrap_or(0).max(1)
    }

    /// Height of a mip level
    pub fn level_height(&self, level: u32) -> u32 {
        self.height.checked_shr(level).unwrap_or(0).max(1)
    }

    /// Depth of a mip level
    pub fn level_depth(&self, level: u32) -> u32 {
        self.depth.checked_shr(level).unwrap_or(0).max(1)
    }

    /// Length of the full mip chain down to 1x1x1
    pub fn max_level_count(&self) -> u32 {
        u32::BITS - self.width.max(self.height).max(self.depth).max(1).leading_zeros()
    }

    /// Number of subresources, levels varying fastest
    pub fn subresource_count(&self) -> u32 {
        self.level_count * self.layer_count
    }

    /// Index of the subresource at the given level and layer
    pub fn subresource_index(&self, level: u32, layer: u32) -> u32 {
        layer * self.level_count + level
    }
}

/// A resource block's accumulated description and initial contents
#[derive(Debug, Clone, PartialEq)]
pub struct ResourceParams {
    pub desc: ResourceDesc,
    /// Initial contents, tightly packed
    pub data: Vec<u8>,
    /// Whether `format` or `stride` appeared in the block
    pub explicit_format: bool,
}

impl ResourceParams {
    /// Starts a new resource block
    pub fn new(ty: ResourceType, slot: u32) -> Self {
        Self {
            desc: ResourceDesc::new(ty, slot),
            data: Vec::new(),
            explicit_format: false,
        }
    }
}

/// Comparison used by depth tests, alpha tests and comparison samplers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ComparisonFunc {
    Never,
    Less,
    Equal,
    LessEqual,
    Greater,
    NotEqual,
    GreaterEqual,
    Always,
}

/// Comparison functions by name
pub const COMPARISON_FUNCS: &[(&str, ComparisonFunc)] = &[
    ("never", ComparisonFunc::Never),
    ("less", ComparisonFunc::Less),
    ("equal", ComparisonFunc::Equal),
    ("less equal", ComparisonFunc::LessEqual),
    ("greater", ComparisonFunc::Greater),
    ("not equal", ComparisonFunc::NotEqual),
    ("greater equal", ComparisonFunc::GreaterEqual),
    ("always", ComparisonFunc::Always),
];

impl ComparisonFunc {
    /// Evaluates `value <op> reference`
    pub fn compare<T: PartialOrd>(self, value: T, reference: T) -> bool {
        match self {
            ComparisonFunc::Never => false,
            ComparisonFunc::Less => value < reference,
            ComparisonFunc::Equal => value == reference,
            ComparisonFunc::LessEqual => value <= reference,
            ComparisonFunc::Greater => value > reference,
            ComparisonFunc::NotEqual => value != reference,
            ComparisonFunc::GreaterEqual => value >= reference,
            ComparisonFunc::Always => true,
        }
    }
}

/// Texture filtering for one of minification, magnification or mip selection
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum FilterMode {
    #[default]
    Point,
    Linear,
}

/// Filtering of a sampler
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct SamplerFilter {
    pub min: FilterMode,
    pub mag: FilterMode,
    pub mip: FilterMode,
    /// Samples are compared against a reference instead of returned
    pub comparison: bool,
}

/// Texture addressing outside [0, 1]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum AddressMode {
    Border,
    #[default]
    Clamp,
    Mirror,
    MirrorOnce,
    Wrap,
}

/// Address modes by name
pub const ADDRESS_MODES: &[(&str, AddressMode)] = &[
    ("border", AddressMode::Border),
    ("clamp", AddressMode::Clamp),
    ("mirror_once", AddressMode::MirrorOnce),
    ("mirror", AddressMode::Mirror),
    ("wrap", AddressMode::Wrap),
];

/// A sampler, keyed by slot alone
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SamplerDesc {
    pub slot: u32,
    pub filter: SamplerFilter,
    /// U, V and W address modes
    pub address: [AddressMode; 3],
    pub func: Option<ComparisonFunc>,
}

impl SamplerDesc {
    /// Creates a point-filtering, clamping sampler
    pub fn new(slot: u32) -> Self {
        Self {
            slot,
            filter: SamplerFilter::default(),
            address: [AddressMode::Clamp; 3],
            func: None,
        }
    }
}

/// One vertex attribute of the input layout
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct InputElement {
    pub semantic_name: String,
    pub semantic_index: u32,
    /// Vertex buffer slot
    pub slot: u32,
    pub format: Format,
    pub texel_size: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resource_defaults() {
        let desc = ResourceDesc::new(ResourceType::RenderTarget, 1);
        assert_eq!(desc.dimension, Dimension::Texture2d);
        assert_eq!(desc.format, Format::R32G32B32A32Float);
        assert_eq!((desc.width, desc.height, desc.depth), (1, 1, 1));
        assert_eq!((desc.layer_count, desc.level_count, desc.sample_count), (1, 1, 1));

        assert_eq!(ResourceDesc::new(ResourceType::DepthStencil, 0).format, Format::D32Float);
        assert_eq!(ResourceDesc::new(ResourceType::VertexBuffer, 0).dimension, Dimension::Buffer);
    }

    #[test]
    fn test_mip_level_sizes() {
        let mut desc = ResourceDesc::new(ResourceType::Texture, 0);
        desc.width = 8;
        desc.height = 2;
        desc.level_count = 4;
        desc.layer_count = 2;

        assert_eq!(desc.level_width(2), 2);
        assert_eq!(desc.level_height(2), 1);
        assert_eq!(desc.subresource_count(), 8);
        assert_eq!(desc.subresource_index(1, 1), 5);
        assert_eq!(desc.max_level_count(), 4);
    }

    #[test]
    fn test_deep_mip_levels() {
        let mut desc = ResourceDesc::new(ResourceType::Texture, 0);
        (desc.width, desc.height) = (4, 4);
        assert_eq!(desc.level_width(39), 1);
        assert_eq!(desc.level_height(32), 1);
        assert_eq!(desc.level_depth(u32::MAX), 1);
        assert_eq!(desc.max_level_count(), 3);

        desc.depth = 1 << 20;
        assert_eq!(desc.max_level_count(), 21);
        desc.width = u32::MAX;
        assert_eq!(desc.max_level_count(), 32);
        assert_eq!(desc.level_width(31), 1);
    }

    #[test]
    fn test_comparison_funcs() {
        assert!(ComparisonFunc::LessEqual.compare(1.0, 1.0));
        assert!(!ComparisonFunc::Less.compare(1.0, 1.0));
        assert!(ComparisonFunc::NotEqual.compare(1, 2));
        assert!(!ComparisonFunc::Never.compare(0, 0));
    }
}
