use std::path::PathBuf;

use clap::Parser;
use pipeline::{DEFAULT_KERNEL_PATH, DEFAULT_OUTPUT};

#[derive(Parser, Debug)]
#[command(
    name = "raytrace",
    author,
    version,
    about = "Render one ray traced frame on the GPU and save it as PNG"
)]
pub struct Cli {
    /// PNG file to write.
    #[arg(value_name = "OUTPUT", default_value = DEFAULT_OUTPUT)]
    pub output: PathBuf,

    /// Animation index handed to the kernel; selects the camera position.
    #[arg(
        value_name = "ANIMATION",
        default_value_t = 0,
        allow_negative_numbers = true
    )]
    pub animation: i32,

    /// WGSL compute program exporting a `render` entry point.
    #[arg(long, value_name = "FILE", env = "RAYTRACE_KERNEL", default_value = DEFAULT_KERNEL_PATH)]
    pub kernel: PathBuf,

    /// Index of the platform (graphics backend) to render on.
    #[arg(long, value_name = "INDEX", env = "RAYTRACE_PLATFORM", default_value_t = 0)]
    pub platform: usize,

    /// Index of the GPU device within the platform.
    #[arg(long, value_name = "INDEX", env = "RAYTRACE_DEVICE", default_value_t = 0)]
    pub device: usize,
}

pub fn parse() -> Cli {
    Cli::parse()
}
