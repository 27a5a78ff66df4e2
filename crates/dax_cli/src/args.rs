use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Parser;
use dax_core::ConverterOptions;

#[derive(Parser, Debug)]
#[command(name = "daxconv")]
#[command(version)]
#[command(about = "Convert COLLADA (.dae) documents into a JSON descriptor plus binary blob")]
pub struct CliArgs {
    /// Input .dae file
    pub input: PathBuf,

    /// Output base path; `.json` and `.bin` are written next to it.
    /// Defaults to the input path.
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// JSON file with converter options; flags below override it
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Print the effective options as JSON and exit
    #[arg(long)]
    pub print_config: bool,

    #[arg(long)]
    pub no_animations: bool,

    #[arg(long)]
    pub no_skinning: bool,

    /// Collapse all animations into one clip
    #[arg(long)]
    pub single_animation: bool,

    /// Resampling rate (default: median of the source rates)
    #[arg(long)]
    pub fps: Option<f32>,

    /// Stretch the sample rate to the clip instead of truncating it
    #[arg(long)]
    pub stretch: bool,

    #[arg(long)]
    pub keep_constant_tracks: bool,

    /// Also export rest-pose relative tracks
    #[arg(long)]
    pub relative_tracks: bool,

    #[arg(long)]
    pub no_sort_bones: bool,

    #[arg(long)]
    pub merge_chunks: bool,

    #[arg(long)]
    pub no_bake: bool,

    #[arg(long)]
    pub no_bind_shape: bool,

    #[arg(long)]
    pub flip_v: bool,

    /// Keep only the file name of texture paths
    #[arg(long)]
    pub strip_texture_paths: bool,

    /// Uniform world scale
    #[arg(long)]
    pub scale: Option<f32>,

    /// Keep the world scale out of the node transforms
    #[arg(long)]
    pub unit_scale: bool,

    /// Rotate Z_UP / X_UP documents to Y up
    #[arg(long)]
    pub y_up: bool,

    /// Scale by the document's <unit meter>
    #[arg(long)]
    pub apply_unit: bool,

    /// Debug logging
    #[arg(short, long)]
    pub verbose: bool,
}

impl CliArgs {
    pub fn output_base(&self) -> &Path {
        self.output.as_deref().unwrap_or(&self.input)
    }

    /// Options from `--config` (or the defaults) with the flags applied.
    pub fn converter_options(&self) -> Result<ConverterOptions> {
        let mut options = match &self.config {
            Some(path) => {
                let text = std::fs::read_to_string(path)
                    .with_context(|| format!("Failed to read config {}", path.display()))?;
                serde_json::from_str(&text).with_context(|| format!("Invalid config {}", path.display()))?
            }
            None => ConverterOptions::default(),
        };
        self.apply(&mut options);
        options.validate().context("Invalid converter options")?;
        Ok(options)
    }

    fn apply(&self, options: &mut ConverterOptions) {
        if self.no_animations {
            options.enable_animations = false;
        }
        if self.no_skinning {
            options.enable_skinning = false;
        }
        if self.single_animation {
            options.single_animation = true;
        }
        if self.fps.is_some() {
            options.animation_fps = self.fps;
        }
        if self.stretch {
            options.truncate_resampled_animations = false;
        }
        if self.keep_constant_tracks {
            options.remove_constant_tracks = false;
        }
        if self.relative_tracks {
            options.export_relative_tracks = true;
        }
        if self.no_sort_bones {
            options.sort_bones = false;
        }
        if self.merge_chunks {
            options.merge_chunks = true;
        }
        if self.no_bake {
            options.bake_node_transforms = false;
        }
        if self.no_bind_shape {
            options.apply_bind_shape = false;
        }
        if self.flip_v {
            options.flip_texcoord_v = true;
        }
        if self.strip_texture_paths {
            options.remove_texture_path = true;
        }

        let world = &mut options.world_transform;
        if let Some(scale) = self.scale {
            world.enabled = true;
            world.scale = scale;
        }
        if self.unit_scale {
            world.enabled = true;
            world.unit_scale = true;
        }
        if self.y_up {
            world.enabled = true;
            world.convert_up_axis = true;
        }
        if self.apply_unit {
            world.enabled = true;
            world.apply_unit = true;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let args = CliArgs::try_parse_from(["daxconv", "model.dae"]).unwrap();
        assert_eq!(args.output_base(), Path::new("model.dae"));
        assert_eq!(args.converter_options().unwrap(), ConverterOptions::default());
    }

    #[test]
    fn test_flags_override() {
        let args = CliArgs::try_parse_from([
            "daxconv",
            "model.dae",
            "-o",
            "out/model",
            "--fps",
            "24",
            "--merge-chunks",
            "--no-animations",
            "--scale",
            "0.01",
            "--y-up",
        ])
        .unwrap();
        let options = args.converter_options().unwrap();
        assert_eq!(args.output_base(), Path::new("out/model"));
        assert_eq!(options.animation_fps, Some(24.0));
        assert!(options.merge_chunks);
        assert!(!options.enable_animations);
        assert!(options.world_transform.enabled);
        assert!(options.world_transform.convert_up_axis);
        assert!((options.world_transform.scale - 0.01).abs() < 1e-9);
        assert!(options.sort_bones);
    }

    #[test]
    fn test_config_file() {
        let path = std::env::temp_dir().join(format!("daxconv_config_{}.json", std::process::id()));
        std::fs::write(&path, r#"{ "sort_bones": false, "tolerances": { "rotation": 0.1 } }"#).unwrap();
        let config = path.to_string_lossy().to_string();
        let args = CliArgs::try_parse_from(["daxconv", "a.dae", "--config", config.as_str()]).unwrap();
        let options = args.converter_options();
        std::fs::remove_file(&path).unwrap();

        let options = options.unwrap();
        assert!(!options.sort_bones);
        assert!((options.tolerances.rotation - 0.1).abs() < 1e-9);
        assert!((options.tolerances.position - 1e-4).abs() < 1e-9);
    }

    #[test]
    fn test_zero_scale_rejected() {
        let args = CliArgs::try_parse_from(["daxconv", "model.dae", "--scale", "0"]).unwrap();
        assert!(args.converter_options().is_err());
    }

    #[test]
    fn test_missing_input() {
        assert!(CliArgs::try_parse_from(["daxconv"]).is_err());
    }
}
