// SPDX-License-Identifier: CEPL-1.0
#![deny(unsafe_op_in_unsafe_fn)]

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use clap::Parser;
use prism_core::init_tracing;
use prism_platform::PlatformWindow;
use prism_render::{run, DirShaderStore, RunSummary, ShaderStore};
use prism_render_vk::{EmbeddedShaders, VkRenderer};
use tracing::{error, info, warn};

mod config;

use config::{load_cfg, AppCfg, Overrides, VsyncModeCfg};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Config file
    #[arg(long, default_value = "prism.toml")]
    config: PathBuf,

    /// Present mode preference
    #[arg(long, value_enum)]
    vsync_mode: Option<VsyncModeCfg>,

    /// Enable the Khronos validation layer (true | false)
    #[arg(long)]
    validation: Option<bool>,

    /// Load triangle.{vert,frag}.spv from here instead of the built-in ones
    #[arg(long)]
    shader_dir: Option<PathBuf>,

    #[arg(long)]
    width: Option<u32>,

    #[arg(long)]
    height: Option<u32>,
}

impl Args {
    fn overrides(&self) -> Overrides {
        Overrides {
            vsync_mode: self.vsync_mode,
            validation: self.validation,
            shader_dir: self.shader_dir.clone(),
            width: self.width,
            height: self.height,
        }
    }
}

fn run_app(cfg: &AppCfg) -> Result<RunSummary> {
    let mut window = PlatformWindow::open(&cfg.window_config())?;
    let settings = cfg.render_settings();
    info!(
        "vsync_mode = {:?}, validation = {}",
        settings.vsync_mode, settings.validation
    );

    let shaders: Box<dyn ShaderStore> = match &cfg.render.shader_dir {
        Some(dir) => {
            info!("shaders from {}", dir.display());
            Box::new(DirShaderStore::new(dir))
        }
        None => Box::new(EmbeddedShaders),
    };

    run::<VkRenderer, _>(&mut window, shaders.as_ref(), &settings)
}

fn main() -> ExitCode {
    let args = Args::parse();

    // Tracing wants the configured directive, so a bad file is reported
    // after the subscriber is up.
    let (mut cfg, cfg_err) = match load_cfg(&args.config) {
        Ok(cfg) => (cfg, None),
        Err(e) => (AppCfg::default(), Some(e)),
    };
    init_tracing(&cfg.render.log);
    if let Some(e) = cfg_err {
        warn!("{e:#}; using defaults");
    }
    cfg.apply(&args.overrides());

    match run_app(&cfg) {
        Ok(summary) => {
            info!(
                "exit: {} frames, {} rebuilds",
                summary.frames_presented, summary.recreations
            );
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("{e:#}");
            ExitCode::FAILURE
        }
    }
}
