use super::{GPUError, Result};
use crate::{PushConstantBlock, ShaderPaths, Vertex};
use ash::{vk, Device};
use std::ffi::CStr;

/// Stages that read the push-constant block.
pub const PUSH_CONSTANT_STAGES: vk::ShaderStageFlags = vk::ShaderStageFlags::from_raw(
    vk::ShaderStageFlags::VERTEX.as_raw() | vk::ShaderStageFlags::FRAGMENT.as_raw(),
);

const ENTRY_POINT: &CStr = unsafe { CStr::from_bytes_with_nul_unchecked(b"main\0") };

/// Pipeline layout with no descriptor sets and a single push-constant range
/// covering [`PushConstantBlock`].
pub struct PipelineLayout {
    device: Device,
    raw: vk::PipelineLayout,
}

impl PipelineLayout {
    pub(super) fn new(device: &Device) -> Result<Self> {
        let ranges = [push_constant_range()];
        let raw = unsafe {
            device.create_pipeline_layout(
                &vk::PipelineLayoutCreateInfo::builder()
                    .set_layouts(&[])
                    .push_constant_ranges(&ranges)
                    .build(),
                None,
            )
        }
        .map_err(|e| GPUError::PipelineBuildError(format!("pipeline layout: {}", e)))?;

        Ok(Self {
            device: device.clone(),
            raw,
        })
    }

    pub fn raw(&self) -> vk::PipelineLayout {
        self.raw
    }
}

impl Drop for PipelineLayout {
    fn drop(&mut self) {
        unsafe { self.device.destroy_pipeline_layout(self.raw, None) };
    }
}

pub(super) fn push_constant_range() -> vk::PushConstantRange {
    vk::PushConstantRange {
        stage_flags: PUSH_CONSTANT_STAGES,
        offset: 0,
        size: std::mem::size_of::<PushConstantBlock>() as u32,
    }
}

/// Fixed-function state baked into the pipeline. Viewport and scissor are
/// always dynamic.
#[derive(Clone, Debug)]
pub struct PipelineConfig {
    pub topology: vk::PrimitiveTopology,
    pub polygon_mode: vk::PolygonMode,
    pub cull_mode: vk::CullModeFlags,
    pub front_face: vk::FrontFace,
    pub samples: vk::SampleCountFlags,
    pub blend_enable: bool,
    pub depth_test: bool,
    pub depth_write: bool,
    pub depth_compare: vk::CompareOp,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            topology: vk::PrimitiveTopology::TRIANGLE_LIST,
            polygon_mode: vk::PolygonMode::FILL,
            cull_mode: vk::CullModeFlags::NONE,
            front_face: vk::FrontFace::CLOCKWISE,
            samples: vk::SampleCountFlags::TYPE_1,
            blend_enable: false,
            depth_test: true,
            depth_write: true,
            depth_compare: vk::CompareOp::LESS,
        }
    }
}

fn vertex_bindings() -> [vk::VertexInputBindingDescription; 1] {
    [vk::VertexInputBindingDescription {
        binding: 0,
        stride: std::mem::size_of::<Vertex>() as u32,
        input_rate: vk::VertexInputRate::VERTEX,
    }]
}

fn vertex_attributes() -> [vk::VertexInputAttributeDescription; 2] {
    [
        vk::VertexInputAttributeDescription {
            location: 0,
            binding: 0,
            format: vk::Format::R32G32_SFLOAT,
            offset: bytemuck::offset_of!(Vertex, position) as u32,
        },
        vk::VertexInputAttributeDescription {
            location: 1,
            binding: 0,
            format: vk::Format::R32G32B32_SFLOAT,
            offset: bytemuck::offset_of!(Vertex, color) as u32,
        },
    ]
}

fn read_shader(path: &str) -> Result<Vec<u32>> {
    let mut file = std::fs::File::open(path)
        .map_err(|e| GPUError::PipelineBuildError(format!("cannot open shader {}: {}", path, e)))?;
    ash::util::read_spv(&mut file)
        .map_err(|e| GPUError::PipelineBuildError(format!("invalid SPIR-V in {}: {}", path, e)))
}

fn create_shader_module(device: &Device, code: &[u32]) -> Result<vk::ShaderModule> {
    let info = vk::ShaderModuleCreateInfo::builder().code(code).build();
    unsafe { device.create_shader_module(&info, None) }
        .map_err(|e| GPUError::PipelineBuildError(format!("shader module: {}", e)))
}

/// Compiled graphics pipeline targeting one render pass.
///
/// A pipeline is tied to the render pass it was built against, so it is
/// rebuilt every time the swap chain is.
pub struct Pipeline {
    device: Device,
    raw: vk::Pipeline,
}

impl Pipeline {
    pub(super) fn new(
        device: &Device,
        layout: &PipelineLayout,
        render_pass: vk::RenderPass,
        shaders: &ShaderPaths,
        config: &PipelineConfig,
    ) -> Result<Self> {
        let vert_code = read_shader(&shaders.vertex)?;
        let frag_code = read_shader(&shaders.fragment)?;

        let vert = create_shader_module(device, &vert_code)?;
        let frag = match create_shader_module(device, &frag_code) {
            Ok(frag) => frag,
            Err(err) => {
                unsafe { device.destroy_shader_module(vert, None) };
                return Err(err);
            }
        };

        let result = Self::build(device, layout, render_pass, vert, frag, config);

        unsafe {
            device.destroy_shader_module(vert, None);
            device.destroy_shader_module(frag, None);
        }

        let raw = result?;
        log::debug!("built pipeline from {} / {}", shaders.vertex, shaders.fragment);
        Ok(Self {
            device: device.clone(),
            raw,
        })
    }

    fn build(
        device: &Device,
        layout: &PipelineLayout,
        render_pass: vk::RenderPass,
        vert: vk::ShaderModule,
        frag: vk::ShaderModule,
        config: &PipelineConfig,
    ) -> Result<vk::Pipeline> {
        let stages = [
            vk::PipelineShaderStageCreateInfo::builder()
                .stage(vk::ShaderStageFlags::VERTEX)
                .module(vert)
                .name(ENTRY_POINT)
                .build(),
            vk::PipelineShaderStageCreateInfo::builder()
                .stage(vk::ShaderStageFlags::FRAGMENT)
                .module(frag)
                .name(ENTRY_POINT)
                .build(),
        ];

        let bindings = vertex_bindings();
        let attributes = vertex_attributes();
        let vertex_input = vk::PipelineVertexInputStateCreateInfo::builder()
            .vertex_binding_descriptions(&bindings)
            .vertex_attribute_descriptions(&attributes)
            .build();

        let input_assembly = vk::PipelineInputAssemblyStateCreateInfo::builder()
            .topology(config.topology)
            .primitive_restart_enable(false)
            .build();

        // Counts only; the values come from the dynamic state every frame.
        let viewport_state = vk::PipelineViewportStateCreateInfo::builder()
            .viewport_count(1)
            .scissor_count(1)
            .build();

        let rasterizer = vk::PipelineRasterizationStateCreateInfo::builder()
            .depth_clamp_enable(false)
            .rasterizer_discard_enable(false)
            .polygon_mode(config.polygon_mode)
            .line_width(1.0)
            .cull_mode(config.cull_mode)
            .front_face(config.front_face)
            .depth_bias_enable(false)
            .build();

        let multisample = vk::PipelineMultisampleStateCreateInfo::builder()
            .rasterization_samples(config.samples)
            .sample_shading_enable(false)
            .min_sample_shading(1.0)
            .build();

        let blend_attachments = [vk::PipelineColorBlendAttachmentState::builder()
            .color_write_mask(vk::ColorComponentFlags::RGBA)
            .blend_enable(config.blend_enable)
            .src_color_blend_factor(vk::BlendFactor::ONE)
            .dst_color_blend_factor(vk::BlendFactor::ZERO)
            .color_blend_op(vk::BlendOp::ADD)
            .src_alpha_blend_factor(vk::BlendFactor::ONE)
            .dst_alpha_blend_factor(vk::BlendFactor::ZERO)
            .alpha_blend_op(vk::BlendOp::ADD)
            .build()];
        let color_blend = vk::PipelineColorBlendStateCreateInfo::builder()
            .logic_op_enable(false)
            .logic_op(vk::LogicOp::COPY)
            .attachments(&blend_attachments)
            .build();

        let depth_stencil = vk::PipelineDepthStencilStateCreateInfo::builder()
            .depth_test_enable(config.depth_test)
            .depth_write_enable(config.depth_write)
            .depth_compare_op(config.depth_compare)
            .depth_bounds_test_enable(false)
            .min_depth_bounds(0.0)
            .max_depth_bounds(1.0)
            .stencil_test_enable(false)
            .build();

        let dynamic_states = [vk::DynamicState::VIEWPORT, vk::DynamicState::SCISSOR];
        let dynamic = vk::PipelineDynamicStateCreateInfo::builder()
            .dynamic_states(&dynamic_states)
            .build();

        let info = vk::GraphicsPipelineCreateInfo::builder()
            .stages(&stages)
            .vertex_input_state(&vertex_input)
            .input_assembly_state(&input_assembly)
            .viewport_state(&viewport_state)
            .rasterization_state(&rasterizer)
            .multisample_state(&multisample)
            .color_blend_state(&color_blend)
            .depth_stencil_state(&depth_stencil)
            .dynamic_state(&dynamic)
            .layout(layout.raw())
            .render_pass(render_pass)
            .subpass(0)
            .build();

        let pipelines = unsafe {
            device.create_graphics_pipelines(vk::PipelineCache::null(), &[info], None)
        }
        .map_err(|(_, e)| GPUError::PipelineBuildError(format!("graphics pipeline: {}", e)))?;

        pipelines
            .into_iter()
            .next()
            .ok_or_else(|| GPUError::PipelineBuildError("driver returned no pipeline".into()))
    }

    /// Records a bind of this pipeline into `cmd`.
    pub fn bind(&self, cmd: vk::CommandBuffer) {
        unsafe {
            self.device
                .cmd_bind_pipeline(cmd, vk::PipelineBindPoint::GRAPHICS, self.raw)
        };
    }

    pub fn raw(&self) -> vk::Pipeline {
        self.raw
    }
}

impl Drop for Pipeline {
    fn drop(&mut self) {
        unsafe { self.device.destroy_pipeline(self.raw, None) };
    }
}
