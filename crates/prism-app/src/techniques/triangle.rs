// SPDX-License-Identifier: CEPL-1.0
use std::{path::PathBuf, sync::Arc};

use ash::vk;
use bytemuck::{Pod, Zeroable};
use glam::Mat4;
use prism_render_vk::{
    error::{Result, VkError, VkResultExt},
    push_constants, Device, RecordMode, ShaderModule, Technique, TechniqueContext,
};
use serde::Deserialize;
use tracing::{debug, info};

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TriangleParams {
    pub vertex_shader: PathBuf,
    pub fragment_shader: PathBuf,
    /// Radians per second.
    pub speed: f32,
}

impl Default for TriangleParams {
    fn default() -> Self {
        TriangleParams {
            vertex_shader: PathBuf::from(concat!(env!("OUT_DIR"), "/triangle.vert.spv")),
            fragment_shader: PathBuf::from(concat!(env!("OUT_DIR"), "/triangle.frag.spv")),
            speed: 1.0,
        }
    }
}

#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
struct PushConstants {
    transform: [[f32; 4]; 4],
}

/// Rotation inside an aspect-correct projection, so the triangle keeps its
/// shape at any window size.
fn transform(angle: f32, aspect: f32) -> Mat4 {
    Mat4::orthographic_rh(-aspect, aspect, -1.0, 1.0, -1.0, 1.0) * Mat4::from_rotation_z(angle)
}

/// A spinning triangle. Vertices come from `gl_VertexIndex`, so there are
/// no buffers; the transform is pushed every frame.
pub struct TriangleTechnique {
    params: TriangleParams,
    device: Option<Arc<Device>>,
    layout: vk::PipelineLayout,
    pipeline: vk::Pipeline,
    angle: f32,
    aspect: f32,
}

impl TriangleTechnique {
    pub fn new(params: TriangleParams) -> Self {
        TriangleTechnique {
            params,
            device: None,
            layout: vk::PipelineLayout::null(),
            pipeline: vk::Pipeline::null(),
            angle: 0.0,
            aspect: 1.0,
        }
    }

    fn build_pipeline(&mut self, ctx: &TechniqueContext<'_>) -> Result<()> {
        let device = ctx.device;
        let vert = ShaderModule::load(device, &self.params.vertex_shader)?;
        let frag = ShaderModule::load(device, &self.params.fragment_shader)?;

        let stages = [
            vk::PipelineShaderStageCreateInfo {
                s_type: vk::StructureType::PIPELINE_SHADER_STAGE_CREATE_INFO,
                stage: vk::ShaderStageFlags::VERTEX,
                module: vert.raw(),
                p_name: c"main".as_ptr(),
                ..Default::default()
            },
            vk::PipelineShaderStageCreateInfo {
                s_type: vk::StructureType::PIPELINE_SHADER_STAGE_CREATE_INFO,
                stage: vk::ShaderStageFlags::FRAGMENT,
                module: frag.raw(),
                p_name: c"main".as_ptr(),
                ..Default::default()
            },
        ];

        let vertex_input = vk::PipelineVertexInputStateCreateInfo {
            s_type: vk::StructureType::PIPELINE_VERTEX_INPUT_STATE_CREATE_INFO,
            ..Default::default()
        };
        let input_assembly = vk::PipelineInputAssemblyStateCreateInfo {
            s_type: vk::StructureType::PIPELINE_INPUT_ASSEMBLY_STATE_CREATE_INFO,
            topology: vk::PrimitiveTopology::TRIANGLE_LIST,
            ..Default::default()
        };
        // Viewport and scissor are dynamic, so resizes never rebuild the pipeline.
        let viewport = vk::PipelineViewportStateCreateInfo {
            s_type: vk::StructureType::PIPELINE_VIEWPORT_STATE_CREATE_INFO,
            viewport_count: 1,
            scissor_count: 1,
            ..Default::default()
        };
        let raster = vk::PipelineRasterizationStateCreateInfo {
            s_type: vk::StructureType::PIPELINE_RASTERIZATION_STATE_CREATE_INFO,
            polygon_mode: vk::PolygonMode::FILL,
            cull_mode: vk::CullModeFlags::NONE,
            front_face: vk::FrontFace::COUNTER_CLOCKWISE,
            line_width: 1.0,
            ..Default::default()
        };
        let multisample = vk::PipelineMultisampleStateCreateInfo {
            s_type: vk::StructureType::PIPELINE_MULTISAMPLE_STATE_CREATE_INFO,
            rasterization_samples: vk::SampleCountFlags::TYPE_1,
            ..Default::default()
        };
        let depth = vk::PipelineDepthStencilStateCreateInfo {
            s_type: vk::StructureType::PIPELINE_DEPTH_STENCIL_STATE_CREATE_INFO,
            depth_test_enable: vk::TRUE,
            depth_write_enable: vk::TRUE,
            depth_compare_op: vk::CompareOp::LESS_OR_EQUAL,
            ..Default::default()
        };
        let blend_attachment = vk::PipelineColorBlendAttachmentState {
            color_write_mask: vk::ColorComponentFlags::RGBA,
            ..Default::default()
        };
        let blend = vk::PipelineColorBlendStateCreateInfo {
            s_type: vk::StructureType::PIPELINE_COLOR_BLEND_STATE_CREATE_INFO,
            attachment_count: 1,
            p_attachments: &blend_attachment,
            ..Default::default()
        };
        let dynamic_states = [vk::DynamicState::VIEWPORT, vk::DynamicState::SCISSOR];
        let dynamic = vk::PipelineDynamicStateCreateInfo {
            s_type: vk::StructureType::PIPELINE_DYNAMIC_STATE_CREATE_INFO,
            dynamic_state_count: dynamic_states.len() as u32,
            p_dynamic_states: dynamic_states.as_ptr(),
            ..Default::default()
        };

        let info = vk::GraphicsPipelineCreateInfo {
            s_type: vk::StructureType::GRAPHICS_PIPELINE_CREATE_INFO,
            stage_count: stages.len() as u32,
            p_stages: stages.as_ptr(),
            p_vertex_input_state: &vertex_input,
            p_input_assembly_state: &input_assembly,
            p_viewport_state: &viewport,
            p_rasterization_state: &raster,
            p_multisample_state: &multisample,
            p_depth_stencil_state: &depth,
            p_color_blend_state: &blend,
            p_dynamic_state: &dynamic,
            layout: self.layout,
            render_pass: ctx.render_pass,
            subpass: 0,
            ..Default::default()
        };

        let pipelines = unsafe {
            device
                .raw()
                .create_graphics_pipelines(vk::PipelineCache::null(), &[info], None)
        }
        .map_err(|(_, code)| VkError::driver("vkCreateGraphicsPipelines", code))?;
        self.pipeline = pipelines[0];
        debug!("triangle pipeline built for {:?}", ctx.color_format);
        Ok(())
    }

    fn destroy_pipeline(&mut self) {
        if let Some(device) = &self.device {
            if self.pipeline != vk::Pipeline::null() {
                unsafe { device.raw().destroy_pipeline(self.pipeline, None) };
                self.pipeline = vk::Pipeline::null();
            }
        }
    }
}

impl Technique for TriangleTechnique {
    fn name(&self) -> &str {
        "triangle"
    }

    fn record_mode(&self) -> RecordMode {
        RecordMode::PerFrame
    }

    fn on_post_init(&mut self, ctx: &TechniqueContext<'_>) -> Result<()> {
        self.device = Some(Arc::clone(ctx.device));

        let range = vk::PushConstantRange {
            stage_flags: vk::ShaderStageFlags::VERTEX,
            offset: 0,
            size: std::mem::size_of::<PushConstants>() as u32,
        };
        let info = vk::PipelineLayoutCreateInfo {
            s_type: vk::StructureType::PIPELINE_LAYOUT_CREATE_INFO,
            push_constant_range_count: 1,
            p_push_constant_ranges: &range,
            ..Default::default()
        };
        self.layout = unsafe { ctx.device.raw().create_pipeline_layout(&info, None) }
            .check("vkCreatePipelineLayout")?;

        self.build_pipeline(ctx)?;
        info!(
            "triangle: {} + {}",
            self.params.vertex_shader.display(),
            self.params.fragment_shader.display()
        );
        Ok(())
    }

    fn on_render_pass_changed(&mut self, ctx: &TechniqueContext<'_>) -> Result<()> {
        self.destroy_pipeline();
        self.build_pipeline(ctx)
    }

    fn record(&mut self, ctx: &TechniqueContext<'_>, cmd: vk::CommandBuffer, _: usize) {
        let d = ctx.device.raw();
        let pc = PushConstants {
            transform: transform(self.angle, self.aspect).to_cols_array_2d(),
        };
        unsafe {
            d.cmd_bind_pipeline(cmd, vk::PipelineBindPoint::GRAPHICS, self.pipeline);
            d.cmd_set_viewport(cmd, 0, &[ctx.viewport()]);
            d.cmd_set_scissor(cmd, 0, &[ctx.scissor()]);
            push_constants(ctx.device, cmd, self.layout, vk::ShaderStageFlags::VERTEX, 0, &pc);
            d.cmd_draw(cmd, 3, 1, 0, 0);
        }
    }

    fn view_changed(&mut self, ctx: &TechniqueContext<'_>) {
        self.aspect = ctx.aspect();
        debug!("triangle aspect {:.3}", self.aspect);
    }

    fn update(&mut self, time: f32) {
        self.angle = time * self.params.speed;
    }
}

impl Drop for TriangleTechnique {
    fn drop(&mut self) {
        self.destroy_pipeline();
        if let Some(device) = &self.device {
            unsafe { device.raw().destroy_pipeline_layout(self.layout, None) };
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec4;

    #[test]
    fn defaults_point_at_bundled_shaders() {
        let p = TriangleParams::default();
        assert!(p.vertex_shader.ends_with("triangle.vert.spv"));
        assert!(p.fragment_shader.ends_with("triangle.frag.spv"));
    }

    #[test]
    fn wide_window_squeezes_x() {
        let m = transform(0.0, 2.0);
        let p = m * Vec4::new(1.0, 1.0, 0.0, 1.0);
        assert!((p.x - 0.5).abs() < 1e-6);
        assert!((p.y.abs() - 1.0).abs() < 1e-6);
    }

    #[test]
    fn quarter_turn_rotates_x_onto_y() {
        let m = transform(std::f32::consts::FRAC_PI_2, 1.0);
        let p = m * Vec4::new(1.0, 0.0, 0.0, 1.0);
        assert!(p.x.abs() < 1e-6);
        assert!((p.y.abs() - 1.0).abs() < 1e-6);
    }

    #[test]
    fn update_scales_time_by_speed() {
        let mut t = TriangleTechnique::new(TriangleParams {
            speed: 2.0,
            ..Default::default()
        });
        t.update(1.5);
        assert_eq!(t.angle, 3.0);
        assert_eq!(t.record_mode(), RecordMode::PerFrame);
    }

    #[test]
    fn push_constants_are_a_mat4() {
        assert_eq!(std::mem::size_of::<PushConstants>(), 64);
    }
}
