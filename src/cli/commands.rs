//! Subcommand handlers.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use base64::{engine::general_purpose::STANDARD as BASE64_STANDARD, Engine as _};
use sha2::{Digest, Sha256};

use super::args::{CacheAction, ConfigAction, LayerSpec, SceneArgs};
use crate::acquire::{acquire, place, ImageSource, ImageTarget};
use crate::config::{default_path as get_config_path, Config};
use crate::editor::Editor;
use crate::jobs::{Job, JobResult, JobStatus, Orchestrator};
use crate::scene::{ImageHandle, LayerId};
use crate::service::{directive, Base64Image, ImageCache, StudioClient};
use crate::transform::{GestureOutcome, TransformGesture};

fn runtime() -> Result<tokio::runtime::Runtime, String> {
    tokio::runtime::Runtime::new().map_err(|e| format!("Failed to create async runtime: {}", e))
}

fn client(config: &Config) -> Result<StudioClient, String> {
    StudioClient::with_timeouts(config.base_url(), config.timeout(), config.connect_timeout())
        .map_err(|e| format!("Failed to create service client: {}", e))
}

fn cache(config: &Config) -> Option<ImageCache> {
    if !config.cache.enabled {
        return None;
    }
    Some(match &config.cache.dir {
        Some(dir) => ImageCache::new(dir.clone()),
        None => ImageCache::with_default_dir(),
    })
}

/// `<prefix>-<12 hex chars of sha256>.<ext>`, so equal content gets equal names.
pub fn content_file_name(prefix: &str, bytes: &[u8], ext: &str) -> String {
    let digest = Sha256::digest(bytes);
    format!("{}-{}.{}", prefix, &hex::encode(digest)[..12], ext)
}

fn write_output(path: &Path, bytes: &[u8]) -> Result<(), String> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .map_err(|e| format!("Failed to create {}: {}", parent.display(), e))?;
    }
    std::fs::write(path, bytes).map_err(|e| format!("Failed to write {}: {}", path.display(), e))
}

fn describe(source: &ImageSource) -> String {
    match source {
        ImageSource::File(path) => path.display().to_string(),
        ImageSource::Prompt(prompt) => format!("\"{}\"", prompt),
    }
}

/// Build an editor from the command-line scene, placing each layer through
/// the same gestures an interactive user would make.
async fn build_editor(
    client: &StudioClient,
    cache: Option<&ImageCache>,
    config: &Config,
    scene: &SceneArgs,
) -> Result<Editor, String> {
    let mut editor = Editor::new(config.canvas());

    if let Some(source) = &scene.background {
        let image = acquire(client, cache, source)
            .await
            .map_err(|e| format!("Failed to load background {}: {}", describe(source), e))?;
        place(&mut editor, ImageTarget::Background, image);
    }

    for spec in &scene.layers {
        let image = acquire(client, cache, &spec.source)
            .await
            .map_err(|e| format!("Failed to load layer {}: {}", describe(&spec.source), e))?;
        if let Some(id) = place(&mut editor, ImageTarget::Layer, image) {
            position_layer(&mut editor, id, spec);
        }
    }

    if editor.scene().is_empty() {
        return Err("Nothing to compose: give a --background and/or --layer".to_string());
    }
    Ok(editor)
}

fn position_layer(editor: &mut Editor, id: LayerId, spec: &LayerSpec) {
    let Some(layer) = editor.scene().layer(id) else {
        return;
    };
    let x = spec.x.unwrap_or(layer.x);
    let y = spec.y.unwrap_or(layer.y);
    let rotation = spec.rotation.unwrap_or(layer.rotation);
    let scale = spec.scale.unwrap_or(layer.scale);

    editor.select(Some(id));
    editor.drag_end(id, x, y);
    let gesture = TransformGesture {
        x,
        y,
        rotation,
        scale_x: scale,
        scale_y: scale,
    };
    if editor.transform_end(id, gesture) == GestureOutcome::Rejected {
        log::warn!(
            "Layer {} would be smaller than the minimum handle size at scale {}; keeping it as placed",
            describe(&spec.source),
            scale
        );
    }
    editor.select(None);
}

pub fn run_compose(config: &Config, scene: &SceneArgs, out: Option<PathBuf>) -> Result<(), String> {
    let client = client(config)?;
    let cache = cache(config);

    let editor = runtime()?.block_on(build_editor(&client, cache.as_ref(), config, scene))?;
    let png = editor
        .export_png()
        .map_err(|e| format!("Failed to render collage: {}", e))?;

    let out = out.unwrap_or_else(|| PathBuf::from(content_file_name("collage", &png, "png")));
    write_output(&out, &png)?;
    println!(
        "Composite written to {} ({} layers, {}x{})",
        out.display(),
        editor.scene().layers().len(),
        editor.canvas().width,
        editor.canvas().height
    );
    Ok(())
}

pub fn run_harmonize(
    config: &Config,
    composite: &Path,
    instructions: &str,
    out: Option<PathBuf>,
    dry_run: bool,
) -> Result<(), String> {
    if dry_run {
        println!("{}", directive::harmonization_prompt(instructions));
        println!();
        println!("(quality: {})", directive::HARMONIZE_QUALITY);
        return Ok(());
    }

    let png = std::fs::read(composite)
        .map_err(|e| format!("Failed to read {}: {}", composite.display(), e))?;
    let service = Arc::new(client(config)?);

    runtime()?.block_on(async {
        let mut orchestrator = Orchestrator::with_poll_interval(service, config.poll_interval());
        orchestrator.review(png);
        let harmonized = harmonize_reviewed(&mut orchestrator, instructions).await?;
        let bytes = harmonized
            .to_bytes()
            .map_err(|e| format!("Harmonized image is unreadable: {}", e))?;
        let out =
            out.unwrap_or_else(|| PathBuf::from(content_file_name("harmonized", &bytes, "png")));
        write_output(&out, &bytes)?;
        println!("Harmonized image written to {}", out.display());
        Ok::<(), String>(())
    })
}

async fn harmonize_reviewed(
    orchestrator: &mut Orchestrator<StudioClient>,
    instructions: &str,
) -> Result<Base64Image, String> {
    println!("Harmonizing...");
    let job = orchestrator
        .harmonize(instructions)
        .await
        .map_err(|e| e.to_string())?;

    match (&job.status, &job.result) {
        (JobStatus::Succeeded, Some(JobResult::Image(image))) => Ok(image.clone()),
        _ => Err(job
            .error_message
            .clone()
            .unwrap_or_else(|| "Failed to generate harmonized image".to_string())),
    }
}

pub fn run_animate(
    config: &Config,
    image: &Path,
    description: &str,
    download: Option<PathBuf>,
) -> Result<(), String> {
    let harmonized = load_image_as_png(image)?;
    let client = Arc::new(client(config)?);

    runtime()?.block_on(async {
        let mut orchestrator =
            Orchestrator::with_poll_interval(Arc::clone(&client), config.poll_interval());
        orchestrator.load_harmonized(harmonized);
        let video_url = animate_harmonized(&mut orchestrator, description).await?;
        println!("Video: {}", video_url);

        if let Some(dest) = download {
            let path = client
                .download_video(&video_url, &dest)
                .await
                .map_err(|e| format!("Failed to download video: {}", e))?;
            println!("Video downloaded to {}", path.display());
        }
        Ok::<(), String>(())
    })
}

/// Decode any supported image file and re-encode it as the PNG payload the
/// animate route expects.
fn load_image_as_png(path: &Path) -> Result<Base64Image, String> {
    let image = ImageHandle::open(path)
        .map_err(|e| format!("Failed to load {}: {}", path.display(), e))?;
    let png = crate::compositor::encode_png(image.pixels())
        .map_err(|e| format!("Failed to encode {}: {}", path.display(), e))?;
    Ok(Base64Image::new(BASE64_STANDARD.encode(png)))
}

/// Start the animation and follow its status until it ends or Ctrl-C.
async fn animate_harmonized(
    orchestrator: &mut Orchestrator<StudioClient>,
    description: &str,
) -> Result<String, String> {
    orchestrator
        .start_animation(description)
        .await
        .map_err(|e| e.to_string())?;

    let mut updates = orchestrator.subscribe_animation();
    let mut last_text = String::new();
    let job: Job = loop {
        let job = updates.borrow_and_update().clone();
        if job.status_text != last_text && !job.status_text.is_empty() {
            println!("{}", job.status_text);
            last_text = job.status_text.clone();
        }
        if job.is_terminal() {
            break job;
        }

        tokio::select! {
            changed = updates.changed() => {
                if changed.is_err() {
                    break orchestrator.animate_job();
                }
            }
            _ = tokio::signal::ctrl_c() => {
                orchestrator.close_result();
                return Err("Animation cancelled".to_string());
            }
        }
    };

    match (job.status, job.result) {
        (JobStatus::Succeeded, Some(JobResult::Video { url })) => Ok(url),
        _ => Err(job
            .error_message
            .unwrap_or_else(|| "Animation generation failed".to_string())),
    }
}

pub fn run_generate(
    config: &Config,
    prompt: &str,
    out: Option<PathBuf>,
    no_cache: bool,
) -> Result<(), String> {
    let client = client(config)?;
    let cache = if no_cache { None } else { cache(config) };
    let source = ImageSource::Prompt(prompt.to_string());

    let image = runtime()?
        .block_on(acquire(&client, cache.as_ref(), &source))
        .map_err(|e| format!("Failed to generate image: {}", e))?;
    let png = crate::compositor::encode_png(image.pixels())
        .map_err(|e| format!("Failed to encode image: {}", e))?;

    let out = out.unwrap_or_else(|| PathBuf::from(content_file_name("generated", &png, "png")));
    write_output(&out, &png)?;
    println!(
        "Generated {}x{} image written to {}",
        image.width(),
        image.height(),
        out.display()
    );
    Ok(())
}

pub fn run_pipeline(
    config: &Config,
    scene: &SceneArgs,
    instructions: &str,
    description: &str,
    out_dir: &Path,
) -> Result<(), String> {
    if description.trim().is_empty() {
        return Err("Animation description is required".to_string());
    }

    let client = Arc::new(client(config)?);
    let cache = cache(config);

    runtime()?.block_on(async {
        let editor = build_editor(&client, cache.as_ref(), config, scene).await?;
        let png = editor
            .export_png()
            .map_err(|e| format!("Failed to render collage: {}", e))?;
        let composite_path = out_dir.join(content_file_name("collage", &png, "png"));
        write_output(&composite_path, &png)?;
        println!("Composite written to {}", composite_path.display());

        let mut orchestrator =
            Orchestrator::with_poll_interval(Arc::clone(&client), config.poll_interval());
        orchestrator.review(png);
        let harmonized = harmonize_reviewed(&mut orchestrator, instructions).await?;

        let harmonized_bytes = harmonized
            .to_bytes()
            .map_err(|e| format!("Harmonized image is unreadable: {}", e))?;
        let harmonized_path = out_dir.join(content_file_name("harmonized", &harmonized_bytes, "png"));
        write_output(&harmonized_path, &harmonized_bytes)?;
        println!("Harmonized image written to {}", harmonized_path.display());

        let video_url = animate_harmonized(&mut orchestrator, description).await?;
        let prediction_id = orchestrator
            .animate_job()
            .external_id
            .unwrap_or_else(|| "animation".to_string());
        let video_path = out_dir.join(format!("{}.mp4", prediction_id));
        client
            .download_video(&video_url, &video_path)
            .await
            .map_err(|e| format!("Failed to download video: {}", e))?;
        println!("Video downloaded to {}", video_path.display());
        Ok::<(), String>(())
    })
}

pub fn run_cache(config: &Config, action: CacheAction) -> Result<(), String> {
    let cache = match &config.cache.dir {
        Some(dir) => ImageCache::new(dir.clone()),
        None => ImageCache::with_default_dir(),
    };

    match action {
        CacheAction::List => {
            let entries = cache
                .list_entries()
                .map_err(|e| format!("Failed to list cache entries: {}", e))?;

            if entries.is_empty() {
                println!("Cache is empty.");
                return Ok(());
            }

            println!("Cached images:\n");
            let mut total_size = 0;
            for entry in &entries {
                let prompt_display = entry
                    .prompt
                    .as_ref()
                    .map(|p| {
                        if p.chars().count() > 50 {
                            format!("{}...", p.chars().take(47).collect::<String>())
                        } else {
                            p.clone()
                        }
                    })
                    .unwrap_or_else(|| "(no prompt data)".to_string());
                total_size += entry.size_bytes;
                println!(
                    "  {} {} \"{}\"",
                    entry.hash,
                    format_size(entry.size_bytes),
                    prompt_display
                );
            }
            println!("\nTotal: {} images, {}", entries.len(), format_size(total_size));
            Ok(())
        }
        CacheAction::Clear { hash } => {
            match hash {
                Some(h) => {
                    let removed = cache
                        .remove(&h)
                        .map_err(|e| format!("Failed to remove cached image: {}", e))?;
                    if removed {
                        println!("Removed cached image: {}", h);
                    } else {
                        println!("No cached image found with hash: {}", h);
                    }
                }
                None => {
                    let count = cache
                        .clear_all()
                        .map_err(|e| format!("Failed to clear cache: {}", e))?;
                    println!("Removed {} cached images.", count);
                }
            }
            Ok(())
        }
    }
}

/// Human readable byte count.
pub fn format_size(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    if bytes >= MB {
        format!("{:.1} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.1} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}

/// Handle config subcommand actions.
pub fn handle_config_action(config_path: Option<&Path>, config: &Config, action: ConfigAction) {
    let config_path = config_path.map(PathBuf::from).unwrap_or_else(get_config_path);

    match action {
        ConfigAction::Show => {
            println!("Current configuration:");
            println!("  Service URL: {}", config.base_url());
            println!(
                "  Timeouts: {}s request, {}s connect",
                config.service.timeout_secs, config.service.connect_timeout_secs
            );
            println!("  Canvas: {}x{}", config.canvas.width, config.canvas.height);
            println!("  Poll interval: {}s", config.animation.poll_interval_secs);
            println!(
                "  Image cache: {}",
                if config.cache.enabled { "on" } else { "off" }
            );
            println!();

            if config_path.exists() {
                println!("Config file: {} (exists)", config_path.display());
            } else {
                println!("Config file: {} (not found)", config_path.display());
            }
        }
        ConfigAction::Init => {
            if config_path.exists() {
                eprintln!("Config file already exists: {}", config_path.display());
                eprintln!("Use 'collage-studio config show' to view current settings.");
                std::process::exit(1);
            }

            if let Some(parent) = config_path.parent() {
                if let Err(e) = std::fs::create_dir_all(parent) {
                    eprintln!("Error creating config directory: {}", e);
                    std::process::exit(1);
                }
            }

            let contents = match Config::default().to_toml() {
                Ok(toml) => format!("# collage-studio configuration\n\n{}", toml),
                Err(e) => {
                    eprintln!("Error serializing default config: {}", e);
                    std::process::exit(1);
                }
            };

            if let Err(e) = std::fs::write(&config_path, contents) {
                eprintln!("Error writing config file: {}", e);
                std::process::exit(1);
            }

            println!("Created config file: {}", config_path.display());
        }
    }
}
