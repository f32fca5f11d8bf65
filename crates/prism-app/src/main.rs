// SPDX-License-Identifier: CEPL-1.0
#![deny(unsafe_op_in_unsafe_fn)]
mod techniques;

use std::{path::PathBuf, process::ExitCode, time::Instant};

use anyhow::{Context, Result};
use clap::Parser;
use prism_core::{init_tracing, AppConfig};
use prism_platform::PlatformWindow;
use prism_render::{FrameStatus, RenderSettings, RenderSize, Renderer, WindowSurface};
use prism_render_vk::VkRenderer;
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Config file (default: ./prism.toml if present)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Technique to run: clear | triangle
    #[arg(long)]
    technique: Option<String>,

    /// Always present with FIFO
    #[arg(long)]
    fifo: bool,

    /// Exit after this many presented frames
    #[arg(long)]
    frames: Option<u64>,

    #[arg(long)]
    width: Option<u32>,

    #[arg(long)]
    height: Option<u32>,
}

impl Args {
    fn apply(&self, cfg: &mut AppConfig) {
        if let Some(name) = &self.technique {
            cfg.technique.name = name.clone();
        }
        if self.fifo {
            cfg.render.force_fifo = true;
        }
        if let Some(w) = self.width {
            cfg.window.width = w;
        }
        if let Some(h) = self.height {
            cfg.window.height = h;
        }
    }
}

fn render_settings(cfg: &AppConfig, size: RenderSize) -> RenderSettings {
    RenderSettings {
        app_name: cfg.window.app_name.clone(),
        size,
        sample_count: cfg.render.sample_count,
        force_fifo: cfg.render.force_fifo,
        present_wait_idle: cfg.render.present_wait_idle,
        validation: cfg.render.validation,
    }
}

fn main() -> ExitCode {
    init_tracing();
    match run(Args::parse()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(args: Args) -> Result<()> {
    let mut cfg = AppConfig::load(args.config.as_deref()).context("loading config")?;
    args.apply(&mut cfg);
    cfg.validate().context("applying command line overrides")?;

    let mut window = PlatformWindow::open(&cfg.window.app_name, cfg.window.width, cfg.window.height)?;

    // A window that starts minimised gets no swapchain until it has an area.
    while window.framebuffer_size().is_empty() {
        if window.close_requested() {
            return Ok(());
        }
        window.wait_events();
    }

    let technique = techniques::build(&cfg.technique)?;
    let settings = render_settings(&cfg, window.framebuffer_size());
    let mut renderer = VkRenderer::new(window.window(), window.window(), &settings, technique)?;
    info!(
        "adapter '{}', present mode {:?}",
        renderer.adapter_name(),
        renderer.present_mode()
    );

    let start = Instant::now();
    let mut last_fps = Instant::now();
    let mut frames = 0u32;

    loop {
        window.poll_events();
        if window.close_requested() || window.input().exit_requested() {
            break;
        }

        renderer.update(start.elapsed().as_secs_f32());
        match renderer.render(&mut window)? {
            FrameStatus::Presented { .. } | FrameStatus::Recreated { presented: Some(_) } => {
                frames += 1
            }
            FrameStatus::Recreated { presented: None } => {}
            FrameStatus::Closed => break,
        }

        if args.frames.is_some_and(|limit| renderer.frames_presented() >= limit) {
            info!("frame limit reached");
            break;
        }

        let now = Instant::now();
        if now.duration_since(last_fps).as_secs_f32() >= 1.0 {
            info!("fps ~ {}", frames);
            frames = 0;
            last_fps = now;
        }
    }

    renderer.wait_idle()?;
    info!(
        "{} frames presented, {} swapchain recreations",
        renderer.frames_presented(),
        renderer.recreations()
    );
    // The surface must go before the window it was created from.
    drop(renderer);
    drop(window);
    Ok(())
}
