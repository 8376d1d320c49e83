use std::path::PathBuf;

/// Output width of every render.
pub const WIDTH: u32 = 1800;
/// Output height of every render.
pub const HEIGHT: u32 = 1000;

pub const DEFAULT_OUTPUT: &str = "output.png";
pub const DEFAULT_KERNEL_PATH: &str = "kernels/render.wgsl";
/// Entry point the compute program must export.
pub const KERNEL_ENTRY_POINT: &str = "render";

/// Everything one render invocation needs to know.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RenderConfig {
    pub width: u32,
    pub height: u32,
    pub animation: i32,
    pub output: PathBuf,
    pub kernel_path: PathBuf,
    pub platform_index: usize,
    pub device_index: usize,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            width: WIDTH,
            height: HEIGHT,
            animation: 0,
            output: PathBuf::from(DEFAULT_OUTPUT),
            kernel_path: PathBuf::from(DEFAULT_KERNEL_PATH),
            platform_index: 0,
            device_index: 0,
        }
    }
}

impl RenderConfig {
    /// Bytes per row of the RGBA8 output surface.
    pub fn row_pitch(&self) -> usize {
        self.width as usize * 4
    }

    /// Global index space of the dispatch: rows first, then columns.
    pub fn global_work_size(&self) -> [usize; 2] {
        [self.height as usize, self.width as usize]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_fixed_session() {
        let config = RenderConfig::default();
        assert_eq!((config.width, config.height), (1800, 1000));
        assert_eq!(config.animation, 0);
        assert_eq!(config.output, PathBuf::from("output.png"));
        assert_eq!(config.row_pitch(), 7200);
    }

    #[test]
    fn global_work_size_is_rows_then_columns() {
        let config = RenderConfig {
            width: 640,
            height: 480,
            ..RenderConfig::default()
        };
        assert_eq!(config.global_work_size(), [480, 640]);
    }
}
