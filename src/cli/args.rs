//! CLI argument parsing with clap.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::acquire::ImageSource;

/// Prefix marking a source as a text-to-image prompt instead of a file.
pub const PROMPT_PREFIX: &str = "prompt:";

/// A layer given on the command line: source plus optional placement.
#[derive(Debug, Clone, PartialEq)]
pub struct LayerSpec {
    pub source: ImageSource,
    pub x: Option<f32>,
    pub y: Option<f32>,
    pub rotation: Option<f32>,
    pub scale: Option<f32>,
}

/// Parse an image source: `prompt:<text>` or a file path.
pub fn parse_source(s: &str) -> Result<ImageSource, String> {
    if let Some(prompt) = s.strip_prefix(PROMPT_PREFIX) {
        if prompt.trim().is_empty() {
            return Err("Prompt must not be empty".to_string());
        }
        return Ok(ImageSource::Prompt(prompt.trim().to_string()));
    }
    if s.is_empty() {
        return Err("Image path must not be empty".to_string());
    }
    Ok(ImageSource::File(PathBuf::from(s)))
}

/// Parse `SOURCE[@X,Y[,ROTATION[,SCALE]]]`.
///
/// The text after the last `@` is only a placement when every part is a
/// number, so prompts like `prompt:email me@home` stay whole.
pub fn parse_layer_spec(s: &str) -> Result<LayerSpec, String> {
    let split = s
        .rsplit_once('@')
        .filter(|(source, _)| !source.is_empty())
        .and_then(|(source, placement)| {
            parse_placement(placement).map(|values| (source, placement, values))
        });

    let Some((source, placement, values)) = split else {
        return Ok(LayerSpec {
            source: parse_source(s)?,
            x: None,
            y: None,
            rotation: None,
            scale: None,
        });
    };

    let mut spec = LayerSpec {
        source: parse_source(source)?,
        x: None,
        y: None,
        rotation: None,
        scale: None,
    };

    match values.as_slice() {
        [x, y] => {
            spec.x = Some(*x);
            spec.y = Some(*y);
        }
        [x, y, rotation] => {
            spec.x = Some(*x);
            spec.y = Some(*y);
            spec.rotation = Some(*rotation);
        }
        [x, y, rotation, scale] => {
            if *scale <= 0.0 {
                return Err(format!("Layer scale must be greater than 0, got {}", scale));
            }
            spec.x = Some(*x);
            spec.y = Some(*y);
            spec.rotation = Some(*rotation);
            spec.scale = Some(*scale);
        }
        _ => {
            return Err(format!(
                "Invalid layer placement '{}'. Use X,Y[,ROTATION[,SCALE]] (e.g., 120,80,15,0.5)",
                placement
            ))
        }
    }

    Ok(spec)
}

fn parse_placement(placement: &str) -> Option<Vec<f32>> {
    placement
        .split(',')
        .map(|part| part.trim().parse::<f32>().ok().filter(|v| v.is_finite()))
        .collect()
}

/// Collage editor: compose layered images, harmonize them, and animate the result
#[derive(Parser, Debug)]
#[command(name = "collage-studio")]
#[command(version, about = "Compose, harmonize and animate image collages", long_about = None)]
#[command(after_help = "EXAMPLES:
    # Compose a collage from a background and two layers
    collage-studio compose -b beach.jpg -l dog.png@120,300 -l 'prompt:a red kite@500,60,15,0.4' -o collage.png

    # Harmonize it with extra instructions
    collage-studio harmonize collage.png -i 'golden hour lighting' -o harmonized.png

    # Animate the harmonized image and download the video
    collage-studio animate harmonized.png -d 'the kite flutters in the wind' --download kite.mp4

ENVIRONMENT:
    COLLAGE_STUDIO_URL    Base URL of the generation proxy (default http://localhost:3000)")]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,

    /// Config file path
    #[arg(long, short, global = true)]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Flatten a background and layers into a PNG composite
    Compose {
        #[command(flatten)]
        scene: SceneArgs,

        /// Output PNG (default: collage-<hash>.png)
        #[arg(long, short)]
        out: Option<PathBuf>,
    },

    /// Send a composite to the harmonization service
    Harmonize {
        /// Composite image to harmonize
        composite: PathBuf,

        /// Extra instructions for the harmonizer
        #[arg(long, short, default_value = "")]
        instructions: String,

        /// Output PNG (default: harmonized-<hash>.png)
        #[arg(long, short)]
        out: Option<PathBuf>,

        /// Print the full prompt the proxy will send, without contacting it
        #[arg(long)]
        dry_run: bool,
    },

    /// Animate a harmonized image and wait for the video
    Animate {
        /// Harmonized image to animate
        image: PathBuf,

        /// What should happen in the video
        #[arg(long, short)]
        description: String,

        /// Download the finished video to this path
        #[arg(long)]
        download: Option<PathBuf>,
    },

    /// Generate an image from a text prompt
    Generate {
        /// The text prompt describing the image
        prompt: String,

        /// Output PNG (default: generated-<hash>.png)
        #[arg(long, short)]
        out: Option<PathBuf>,

        /// Always call the service, ignoring cached results
        #[arg(long)]
        no_cache: bool,
    },

    /// Compose, harmonize and animate in one go
    Pipeline {
        #[command(flatten)]
        scene: SceneArgs,

        /// Extra instructions for the harmonizer
        #[arg(long, short, default_value = "")]
        instructions: String,

        /// What should happen in the video
        #[arg(long, short)]
        description: String,

        /// Directory for the composite, harmonized image and video
        #[arg(long, default_value = ".")]
        out_dir: PathBuf,
    },

    /// Manage the generated image cache
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Scene description shared by `compose` and `pipeline`.
#[derive(clap::Args, Debug)]
pub struct SceneArgs {
    /// Background image file, or prompt:<text>
    #[arg(long, short, value_parser = parse_source)]
    pub background: Option<ImageSource>,

    /// Layer as SOURCE[@X,Y[,ROTATION[,SCALE]]]; repeat for more layers
    #[arg(long = "layer", short = 'l', value_parser = parse_layer_spec)]
    pub layers: Vec<LayerSpec>,
}

#[derive(Subcommand, Debug, Clone)]
pub enum CacheAction {
    /// List cached generated images
    List,
    /// Remove cached images (all, or one by hash)
    Clear {
        /// Hash of a single entry to remove
        hash: Option<String>,
    },
}

#[derive(Subcommand, Debug, Clone)]
pub enum ConfigAction {
    /// Show current configuration
    Show,
    /// Create default config file
    Init,
}
