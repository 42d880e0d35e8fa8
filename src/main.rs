use clap::Parser;
use env_logger::Env;

use collage_studio::cli::{self, Args, Command};
use collage_studio::config::Config;
use collage_studio::service::BASE_URL_ENV;

/// Load `.env` without overriding variables that are already set.
fn load_env() {
    // missing .env is fine
    let _ = dotenv::dotenv();

    if std::env::var(BASE_URL_ENV).is_err() {
        log::debug!("{} not set, using configured or default proxy URL", BASE_URL_ENV);
    }
}

fn main() {
    load_env();
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    let args = Args::parse();

    let config = match Config::load(args.config.as_deref()) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    };

    let result = match args.command {
        Command::Compose { scene, out } => cli::run_compose(&config, &scene, out),
        Command::Harmonize {
            composite,
            instructions,
            out,
            dry_run,
        } => cli::run_harmonize(&config, &composite, &instructions, out, dry_run),
        Command::Animate {
            image,
            description,
            download,
        } => cli::run_animate(&config, &image, &description, download),
        Command::Generate {
            prompt,
            out,
            no_cache,
        } => cli::run_generate(&config, &prompt, out, no_cache),
        Command::Pipeline {
            scene,
            instructions,
            description,
            out_dir,
        } => cli::run_pipeline(&config, &scene, &instructions, &description, &out_dir),
        Command::Cache { action } => cli::run_cache(&config, action),
        Command::Config { action } => {
            cli::handle_config_action(args.config.as_deref(), &config, action);
            Ok(())
        }
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
