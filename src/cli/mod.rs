//! Command-line interface: argument parsing and subcommand handlers.

mod args;
mod commands;

pub use args::{
    parse_layer_spec, parse_source, Args, CacheAction, Command, ConfigAction, LayerSpec,
    SceneArgs, PROMPT_PREFIX,
};
pub use commands::{
    content_file_name, format_size, handle_config_action, run_animate, run_cache, run_compose,
    run_generate, run_harmonize, run_pipeline,
};
