//! Conversions from interpreter types to wgpu types
//!
//! Every function returns `None` for values wgpu cannot express; callers
//! turn that into an unsupported resource or a failed draw.

use shader_runner::{AddressMode, ComparisonFunc, Dimension, FilterMode, Format, ResourceDesc, ResourceType, SamplerDesc, Topology};

/// Texture format for a resource format
pub fn texture_format(format: Format) -> Option<wgpu::TextureFormat> {
    use wgpu::TextureFormat as T;

    Some(match format {
        Format::R32G32B32A32Float => T::Rgba32Float,
        Format::R32G32B32A32Uint => T::Rgba32Uint,
        Format::R32G32B32A32Sint => T::Rgba32Sint,
        Format::R32G32Float => T::Rg32Float,
        Format::R32G32Uint => T::Rg32Uint,
        Format::R32G32Sint => T::Rg32Sint,
        Format::R32Float => T::R32Float,
        // Typeless data is stored as raw bits
        Format::R32Uint | Format::R32Typeless => T::R32Uint,
        Format::R32Sint => T::R32Sint,
        Format::R16G16B16A16Float => T::Rgba16Float,
        Format::R16G16B16A16Unorm => T::Rgba16Unorm,
        Format::R16G16B16A16Uint => T::Rgba16Uint,
        Format::R16G16B16A16Sint => T::Rgba16Sint,
        Format::R16G16Float => T::Rg16Float,
        Format::R16G16Unorm => T::Rg16Unorm,
        Format::R16G16Uint => T::Rg16Uint,
        Format::R16G16Sint => T::Rg16Sint,
        Format::R16Float => T::R16Float,
        Format::R16Unorm => T::R16Unorm,
        Format::R16Uint => T::R16Uint,
        Format::R16Sint => T::R16Sint,
        Format::R8G8B8A8Unorm => T::Rgba8Unorm,
        Format::R8G8B8A8Snorm => T::Rgba8Snorm,
        Format::R8G8B8A8Uint => T::Rgba8Uint,
        Format::R8G8B8A8Sint => T::Rgba8Sint,
        Format::R8G8Unorm => T::Rg8Unorm,
        Format::R8Unorm => T::R8Unorm,
        Format::D32Float => T::Depth32Float,
        Format::D24UnormS8Uint => T::Depth24PlusStencil8,
        Format::Unknown => return None,
    })
}

/// Vertex attribute format for an input element format
pub fn vertex_format(format: Format) -> Option<wgpu::VertexFormat> {
    use wgpu::VertexFormat as V;

    Some(match format {
        Format::R32G32B32A32Float => V::Float32x4,
        Format::R32G32B32A32Uint => V::Uint32x4,
        Format::R32G32B32A32Sint => V::Sint32x4,
        Format::R32G32Float => V::Float32x2,
        Format::R32G32Uint => V::Uint32x2,
        Format::R32G32Sint => V::Sint32x2,
        Format::R32Float => V::Float32,
        Format::R32Uint => V::Uint32,
        Format::R32Sint => V::Sint32,
        Format::R16G16B16A16Float => V::Float16x4,
        Format::R16G16B16A16Unorm => V::Unorm16x4,
        Format::R16G16B16A16Uint => V::Uint16x4,
        Format::R16G16B16A16Sint => V::Sint16x4,
        Format::R16G16Float => V::Float16x2,
        Format::R16G16Unorm => V::Unorm16x2,
        Format::R16G16Uint => V::Uint16x2,
        Format::R16G16Sint => V::Sint16x2,
        Format::R8G8B8A8Unorm => V::Unorm8x4,
        Format::R8G8B8A8Snorm => V::Snorm8x4,
        Format::R8G8B8A8Uint => V::Uint8x4,
        Format::R8G8B8A8Sint => V::Sint8x4,
        Format::R8G8Unorm => V::Unorm8x2,
        _ => return None,
    })
}

pub fn primitive_topology(topology: Topology) -> Option<wgpu::PrimitiveTopology> {
    Some(match topology {
        Topology::PointList => wgpu::PrimitiveTopology::PointList,
        Topology::LineList => wgpu::PrimitiveTopology::LineList,
        Topology::LineStrip => wgpu::PrimitiveTopology::LineStrip,
        Topology::TriangleList => wgpu::PrimitiveTopology::TriangleList,
        Topology::TriangleStrip => wgpu::PrimitiveTopology::TriangleStrip,
        Topology::PatchList(_) => return None,
    })
}

pub fn compare_function(func: ComparisonFunc) -> wgpu::CompareFunction {
    match func {
        ComparisonFunc::Never => wgpu::CompareFunction::Never,
        ComparisonFunc::Less => wgpu::CompareFunction::Less,
        ComparisonFunc::Equal => wgpu::CompareFunction::Equal,
        ComparisonFunc::LessEqual => wgpu::CompareFunction::LessEqual,
        ComparisonFunc::Greater => wgpu::CompareFunction::Greater,
        ComparisonFunc::NotEqual => wgpu::CompareFunction::NotEqual,
        ComparisonFunc::GreaterEqual => wgpu::CompareFunction::GreaterEqual,
        ComparisonFunc::Always => wgpu::CompareFunction::Always,
    }
}

/// Address mode; mirror-once has no wgpu counterpart
pub fn address_mode(mode: AddressMode) -> Option<wgpu::AddressMode> {
    Some(match mode {
        AddressMode::Border => wgpu::AddressMode::ClampToBorder,
        AddressMode::Clamp => wgpu::AddressMode::ClampToEdge,
        AddressMode::Mirror => wgpu::AddressMode::MirrorRepeat,
        AddressMode::Wrap => wgpu::AddressMode::Repeat,
        AddressMode::MirrorOnce => return None,
    })
}

fn filter_mode(mode: FilterMode) -> wgpu::FilterMode {
    match mode {
        FilterMode::Point => wgpu::FilterMode::Nearest,
        FilterMode::Linear => wgpu::FilterMode::Linear,
    }
}

/// Sampler descriptor for a sampler block
pub fn sampler_descriptor(sampler: &SamplerDesc) -> Option<wgpu::SamplerDescriptor<'static>> {
    let [u, v, w] = sampler.address;
    let border = sampler.address.contains(&AddressMode::Border);

    Some(wgpu::SamplerDescriptor {
        label: Some("Test Sampler"),
        address_mode_u: address_mode(u)?,
        address_mode_v: address_mode(v)?,
        address_mode_w: address_mode(w)?,
        mag_filter: filter_mode(sampler.filter.mag),
        min_filter: filter_mode(sampler.filter.min),
        mipmap_filter: filter_mode(sampler.filter.mip),
        lod_min_clamp: 0.0,
        lod_max_clamp: 32.0,
        compare: sampler.func.filter(|_| sampler.filter.comparison).map(compare_function),
        anisotropy_clamp: 1,
        border_color: border.then_some(wgpu::SamplerBorderColor::TransparentBlack),
    })
}

/// Texture dimension and extent of a texture resource
pub fn texture_extent(desc: &ResourceDesc) -> (wgpu::TextureDimension, wgpu::Extent3d) {
    match desc.dimension {
        Dimension::Texture3d => (
            wgpu::TextureDimension::D3,
            wgpu::Extent3d {
                width: desc.width,
                height: desc.height,
                depth_or_array_layers: desc.depth,
            },
        ),
        _ => (
            wgpu::TextureDimension::D2,
            wgpu::Extent3d {
                width: desc.width,
                height: desc.height,
                depth_or_array_layers: desc.layer_count,
            },
        ),
    }
}

/// View dimension used when binding a whole texture resource
pub fn view_dimension(desc: &ResourceDesc) -> wgpu::TextureViewDimension {
    match desc.dimension {
        Dimension::Texture3d => wgpu::TextureViewDimension::D3,
        Dimension::Cube => wgpu::TextureViewDimension::Cube,
        Dimension::Texture2dArray => wgpu::TextureViewDimension::D2Array,
        _ => wgpu::TextureViewDimension::D2,
    }
}

/// Usages a texture needs for its role in a test
pub fn texture_usage(desc: &ResourceDesc) -> wgpu::TextureUsages {
    use wgpu::TextureUsages as U;

    if desc.sample_count > 1 {
        return U::RENDER_ATTACHMENT | U::TEXTURE_BINDING;
    }
    match desc.ty {
        ResourceType::RenderTarget => U::RENDER_ATTACHMENT | U::TEXTURE_BINDING | U::COPY_SRC | U::COPY_DST,
        ResourceType::DepthStencil => U::RENDER_ATTACHMENT | U::TEXTURE_BINDING | U::COPY_SRC,
        ResourceType::Uav => U::STORAGE_BINDING | U::TEXTURE_BINDING | U::COPY_SRC | U::COPY_DST,
        ResourceType::Texture | ResourceType::VertexBuffer => U::TEXTURE_BINDING | U::COPY_SRC | U::COPY_DST,
    }
}

/// Size in bytes of a buffer resource
///
/// Vertex buffers are sized in bytes; other buffers in elements.
pub fn buffer_size(desc: &ResourceDesc) -> u64 {
    match desc.ty {
        ResourceType::VertexBuffer => desc.width as u64,
        _ => desc.width as u64 * desc.texel_size as u64,
    }
}
