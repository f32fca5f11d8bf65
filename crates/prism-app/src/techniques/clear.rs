// SPDX-License-Identifier: CEPL-1.0
use ash::vk;
use prism_render_vk::{error::Result, Technique, TechniqueContext};
use serde::Deserialize;
use tracing::info;

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ClearParams {
    pub color: [f32; 4],
}

impl Default for ClearParams {
    fn default() -> Self {
        ClearParams {
            color: [0.02, 0.02, 0.04, 1.0],
        }
    }
}

/// Clears the screen and nothing else. Recorded once per swapchain.
pub struct ClearTechnique {
    color: [f32; 4],
}

impl ClearTechnique {
    pub fn new(params: ClearParams) -> Self {
        ClearTechnique {
            color: params.color,
        }
    }
}

impl Technique for ClearTechnique {
    fn name(&self) -> &str {
        "clear"
    }

    fn on_post_init(&mut self, ctx: &TechniqueContext<'_>) -> Result<()> {
        info!("clear: {:?} into {:?}", self.color, ctx.color_format);
        Ok(())
    }

    fn clear_values(&self) -> [vk::ClearValue; 2] {
        [
            vk::ClearValue {
                color: vk::ClearColorValue {
                    float32: self.color,
                },
            },
            vk::ClearValue {
                depth_stencil: vk::ClearDepthStencilValue {
                    depth: 1.0,
                    stencil: 0,
                },
            },
        ]
    }

    fn record(&mut self, _: &TechniqueContext<'_>, _: vk::CommandBuffer, _: usize) {}
}
