use anyhow::{Context, Result};
use pipeline::{render_to_file, RenderConfig, WgpuApi};
use tracing_subscriber::EnvFilter;

use crate::cli::Cli;

pub fn run(cli: Cli) -> Result<()> {
    let config = render_config(cli);
    tracing::debug!(?config, "resolved render configuration");

    let mut api = WgpuApi::new();
    render_to_file(&mut api, &config).with_context(|| {
        format!(
            "failed to render frame {} to {}",
            config.animation,
            config.output.display()
        )
    })
}

fn render_config(cli: Cli) -> RenderConfig {
    RenderConfig {
        animation: cli.animation,
        output: cli.output,
        kernel_path: cli.kernel,
        platform_index: cli.platform,
        device_index: cli.device,
        ..RenderConfig::default()
    }
}

pub fn initialise_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use clap::Parser;

    use super::*;

    #[test]
    fn cli_fills_config_and_keeps_fixed_resolution() {
        let cli = Cli::try_parse_from([
            "raytrace",
            "frame.png",
            "12",
            "--kernel",
            "scene.wgsl",
            "--device",
            "1",
        ])
        .unwrap();
        let config = render_config(cli);
        assert_eq!(config.output, PathBuf::from("frame.png"));
        assert_eq!(config.animation, 12);
        assert_eq!(config.kernel_path, PathBuf::from("scene.wgsl"));
        assert_eq!((config.platform_index, config.device_index), (0, 1));
        assert_eq!((config.width, config.height), (1800, 1000));
    }
}
