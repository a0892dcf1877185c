use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};

use fb2_converter_core::config::{config_path, load_config, ConvertConfig};
use fb2_converter_core::convert::convert_path;
use fb2_converter_core::format::OutputFormat;
use fb2_converter_core::processor::JobOptions;
use fb2_converter_core::progress::{ProgressEvent, ProgressHandler};
use fb2_converter_core::writers::{KindleCodec, KindlegenCodec};

#[derive(Parser)]
#[command(name = "fb2-converter")]
#[command(about = "Convert FictionBook2 books to EPUB, MOBI and AZW3")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output as JSON
    #[arg(long, global = true)]
    json: bool,

    /// Configuration file (defaults to the user config directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Convert FB2 files (plain or zipped)
    Convert {
        /// Input file(s)
        #[arg(required = true)]
        input: Vec<String>,

        /// Output directory (defaults to the input's directory)
        #[arg(short, long)]
        output: Option<String>,

        /// Output format (epub, mobi, azw3)
        #[arg(short, long, default_value = "epub")]
        format: String,

        /// Source charset when the file does not declare one
        #[arg(long)]
        charset: Option<String>,

        /// Keep the working directory for inspection
        #[arg(long)]
        debug: bool,

        /// kindlegen compatible program used for MOBI and AZW3
        #[arg(long, env = "KINDLEGEN")]
        kindlegen: Option<PathBuf>,
    },

    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Initialize default config file
    Init,
    /// Show current configuration
    Show,
    /// Set a configuration value
    Set {
        /// Key (dot-separated path)
        key: String,
        /// Value
        value: String,
    },
}

/// Per-stage pipeline progress on a terminal bar.
struct BarProgress {
    bar: ProgressBar,
}

impl BarProgress {
    fn new(name: &str) -> Self {
        let bar = ProgressBar::new(0);
        bar.set_style(
            ProgressStyle::with_template("{prefix} [{bar:30}] {pos}/{len} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("=> "),
        );
        bar.set_prefix(name.to_string());
        Self { bar }
    }
}

impl ProgressHandler for BarProgress {
    fn on_progress(&self, event: ProgressEvent) {
        if let Some(total) = event.total {
            self.bar.set_length(total);
        }
        self.bar.set_position(event.current);
        if let Some(msg) = event.message {
            self.bar.set_message(msg);
        }
    }
}

fn main() {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let result = match &cli.command {
        Commands::Convert {
            input,
            output,
            format,
            charset,
            debug,
            kindlegen,
        } => run_convert(
            input,
            output.as_deref(),
            format,
            charset.as_deref(),
            *debug,
            kindlegen.as_deref(),
            cli.config.as_deref(),
            cli.json,
        ),
        Commands::Config { action } => run_config(action, cli.config.as_deref(), cli.json),
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

#[allow(clippy::too_many_arguments)]
fn run_convert(
    inputs: &[String],
    output: Option<&str>,
    format_str: &str,
    charset: Option<&str>,
    debug: bool,
    kindlegen: Option<&Path>,
    config_file: Option<&Path>,
    json: bool,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let format = OutputFormat::parse(format_str)
        .ok_or_else(|| format!("Unknown output format '{}' (expected epub, mobi or azw3)", format_str))?;
    let config = load_config(config_file)?;

    let mut results = Vec::new();
    let mut failed = 0;
    for input in inputs {
        let input_path = Path::new(input);
        if !input_path.exists() {
            eprintln!("Input file not found: {}", input_path.display());
            failed += 1;
            continue;
        }

        let out_dir = match output {
            Some(o) => PathBuf::from(o),
            None => input_path.parent().unwrap_or(Path::new(".")).to_path_buf(),
        };
        let codec: Option<Box<dyn KindleCodec>> =
            kindlegen.map(|p| Box::new(KindlegenCodec::new(p)) as Box<dyn KindleCodec>);
        let opts = JobOptions {
            retain_workdir: debug,
            codec,
            ..Default::default()
        };

        let progress = (!json).then(|| BarProgress::new(&input_path.display().to_string()));
        let outcome = convert_path(
            input_path,
            &out_dir,
            format,
            config.clone(),
            charset,
            opts,
            progress.as_ref().map(|p| p as &dyn ProgressHandler),
        );
        if let Some(p) = &progress {
            p.bar.finish_and_clear();
        }

        match outcome {
            Ok(outcome) => {
                if json {
                    results.push(serde_json::json!({
                        "input": input,
                        "output": outcome.output,
                        "workdir": outcome.retained_workdir,
                    }));
                } else {
                    println!("Converted: {} -> {}", input_path.display(), outcome.output.display());
                    if let Some(dir) = outcome.retained_workdir {
                        println!("Working directory kept at {}", dir.display());
                    }
                }
            }
            Err(e) => {
                eprintln!("Unable to convert {}: {}", input_path.display(), e);
                failed += 1;
            }
        }
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&results)?);
    }
    if failed > 0 {
        return Err(format!("{} of {} input(s) failed", failed, inputs.len()).into());
    }
    Ok(())
}

fn run_config(
    action: &ConfigAction,
    config_file: Option<&Path>,
    json: bool,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let target = match config_file {
        Some(p) => Some(p.to_path_buf()),
        None => config_path(),
    };
    match action {
        ConfigAction::Init => {
            let path = target.ok_or("Could not determine config directory")?;
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            let toml = toml::to_string_pretty(&ConvertConfig::default())?;
            std::fs::write(&path, toml)?;
            println!("Wrote default config to {}", path.display());
        }
        ConfigAction::Show => {
            let cfg = load_config(config_file)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&cfg)?);
            } else {
                println!("{}", toml::to_string_pretty(&cfg)?);
            }
        }
        ConfigAction::Set { key, value } => {
            let path = target.ok_or("Could not determine config directory")?;
            let mut cfg = if path.exists() {
                load_config(Some(&path))?
            } else {
                ConvertConfig::default()
            };

            set_config_key(&mut cfg, key, value)?;

            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            let toml = toml::to_string_pretty(&cfg)?;
            std::fs::write(&path, toml)?;
            if !json {
                println!("Updated {}", key);
            }
        }
    }
    Ok(())
}

fn parse_bool(key: &str, value: &str) -> Result<bool, Box<dyn std::error::Error + Send + Sync>> {
    value
        .parse()
        .map_err(|_| format!("Value for {} must be true or false", key).into())
}

fn set_config_key(cfg: &mut ConvertConfig, key: &str, value: &str) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let parts: Vec<&str> = key.splitn(2, '.').collect();
    match parts.as_slice() {
        ["notes", "mode"] => cfg.notes.mode = value.to_string(),
        ["toc", sub] => match *sub {
            "type" => cfg.toc.kind = value.to_string(),
            "placement" => cfg.toc.placement = value.to_string(),
            "title" => cfg.toc.title = value.to_string(),
            _ => return Err(format!("Unknown key: {}", key).into()),
        },
        ["cover", sub] => match *sub {
            "default" => cfg.cover.default = parse_bool(key, value)?,
            "default_image" => cfg.cover.default_image = Some(PathBuf::from(value)),
            "placement" => cfg.cover.placement = value.to_string(),
            "resize" => cfg.cover.resize = value.to_string(),
            "width" => cfg.cover.width = value.parse()?,
            "height" => cfg.cover.height = value.parse()?,
            _ => return Err(format!("Unknown key: {}", key).into()),
        },
        ["page_map", sub] => match *sub {
            "kindle" => cfg.page_map.kindle = value.to_string(),
            "epub" => cfg.page_map.epub = parse_bool(key, value)?,
            "chars_per_page" => cfg.page_map.chars_per_page = value.parse()?,
            _ => return Err(format!("Unknown key: {}", key).into()),
        },
        ["images", sub] => match *sub {
            "remove_png_transparency" => cfg.images.remove_png_transparency = parse_bool(key, value)?,
            "scale_factor" => cfg.images.scale_factor = value.parse()?,
            "use_broken" => cfg.images.use_broken = parse_bool(key, value)?,
            _ => return Err(format!("Unknown key: {}", key).into()),
        },
        ["annotation", sub] => match *sub {
            "create" => cfg.annotation.create = parse_bool(key, value)?,
            "title" => cfg.annotation.title = value.to_string(),
            _ => return Err(format!("Unknown key: {}", key).into()),
        },
        ["hyphenate"] => cfg.hyphenate = parse_bool(key, value)?,
        ["file_name_format"] => cfg.file_name_format = value.to_string(),
        ["author_format"] => cfg.author_format = value.to_string(),
        ["stylesheet"] => cfg.stylesheet = Some(PathBuf::from(value)),
        _ => return Err(format!("Unknown key: {}", key).into()),
    }
    Ok(())
}
