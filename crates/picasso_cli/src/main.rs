//! picasso-rs CLI for inspecting models and running visualizations.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::collections::BTreeMap;
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use picasso::Picasso;
use picasso_core::{InputImage, PicassoConfig};
use picasso_models::backend::DefaultBackend;
use picasso_models::checkpoint::{save_bundle, save_checkpoint};
use picasso_models::network::{ConvNetConfig, FcnNetConfig, Topology};

#[derive(Parser)]
#[command(name = "picasso")]
#[command(author, version)]
#[command(about = "Visual explanations for trained image models")]
#[command(long_about = "picasso-rs: explain image classifiers and segmenters with occlusion and saliency maps.

EXAMPLES:
  # List available visualizations
  picasso visualizers

  # Show the settings a visualization accepts
  picasso settings PartialOcclusion

  # Write a freshly initialised MNIST-sized classifier
  picasso init --arch conv_net --output data-volume

  # Explain two images
  picasso visualize --visualizer SaliencyMaps --set Transparency=0.5 cat.png dog.png

CONFIGURATION:
  The model is read from the JSON file given with --config, or from the file
  named by PICASSO_SETTINGS. Without either, ImageClassifier is loaded from
  ./data-volume.")]
struct Cli {
    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List available visualizations
    Visualizers,
    /// Show the allowed settings of a visualization as JSON
    Settings {
        /// Visualization name (e.g., PartialOcclusion)
        name: String,
    },
    /// List registered model classes
    Models,
    /// Load the configured model and print the application state
    Info {
        /// Configuration file
        #[arg(long, value_name = "FILE")]
        config: Option<PathBuf>,
    },
    /// Write a freshly initialised checkpoint
    Init {
        /// Network architecture: conv_net, fcn
        #[arg(long, default_value = "conv_net", value_name = "ARCH")]
        arch: String,

        /// Output data directory
        #[arg(long, value_name = "DIR")]
        output: PathBuf,

        /// Write a single self-contained bundle instead of topology + weights
        #[arg(long, default_value = "false")]
        bundle: bool,

        /// Number of classes (default 10 for conv_net, 21 for fcn)
        #[arg(long, value_name = "N")]
        classes: Option<usize>,

        /// Input channels (default 1 for conv_net, 3 for fcn)
        #[arg(long, value_name = "N")]
        channels: Option<usize>,

        /// Input height and width of conv_net
        #[arg(long, default_value = "28", value_name = "PIXELS")]
        size: usize,
    },
    /// Run a visualization on images
    Visualize {
        /// Visualization name
        #[arg(long, value_name = "NAME")]
        visualizer: String,

        /// Setting override, repeatable
        #[arg(long = "set", value_name = "KEY=VALUE")]
        settings: Vec<String>,

        /// Directory artifacts are written to
        #[arg(long, default_value = "./outputs", value_name = "DIR")]
        output: PathBuf,

        /// Configuration file
        #[arg(long, value_name = "FILE")]
        config: Option<PathBuf>,

        /// Font for class names in segmentation legends
        #[arg(long, value_name = "FILE")]
        legend_font: Option<PathBuf>,

        /// Input images
        #[arg(required = true)]
        images: Vec<PathBuf>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let log_level = match cli.verbose {
        0 => tracing::Level::WARN,
        1 => tracing::Level::INFO,
        2 => tracing::Level::DEBUG,
        _ => tracing::Level::TRACE,
    };

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(tracing_subscriber::filter::LevelFilter::from_level(log_level))
        .init();

    match cli.command {
        Commands::Visualizers => handle_visualizers(),
        Commands::Settings { name } => handle_settings(&name),
        Commands::Models => handle_models(),
        Commands::Info { config } => handle_info(config),
        Commands::Init {
            arch,
            output,
            bundle,
            classes,
            channels,
            size,
        } => handle_init(&arch, output, bundle, classes, channels, size),
        Commands::Visualize {
            visualizer,
            settings,
            output,
            config,
            legend_font,
            images,
        } => handle_visualize(&visualizer, &settings, output, config, legend_font, &images),
    }
}

fn handle_visualizers() -> Result<()> {
    let registry = picasso_explain::default_registry();
    println!("Available visualizations:\n");
    for descriptor in registry.descriptors() {
        println!("  {:<22} {}", descriptor.name, descriptor.description);
        if let Some(link) = descriptor.reference_link {
            println!("  {:<22} see {}", "", link);
        }
    }
    println!("\nUse 'picasso settings NAME' to see the settings of one.");
    Ok(())
}

fn handle_settings(name: &str) -> Result<()> {
    let descriptor = picasso_explain::default_registry().get(name)?;
    println!("{}", serde_json::to_string_pretty(descriptor.allowed_settings)?);
    Ok(())
}

fn handle_models() -> Result<()> {
    println!("Registered model classes:\n");
    for name in picasso_models::default_registry().list() {
        println!("  {}", name);
    }
    Ok(())
}

/// Read `path`, or the file named by `PICASSO_SETTINGS`.
fn load_config(path: Option<PathBuf>) -> Result<PicassoConfig> {
    let config = match path {
        Some(path) => PicassoConfig::from_file(&path)
            .with_context(|| format!("Failed to read config '{}'", path.display()))?,
        None => PicassoConfig::from_env().context("Failed to read config")?,
    };
    Ok(config)
}

fn handle_info(config: Option<PathBuf>) -> Result<()> {
    let config = load_config(config)?;
    let app = Picasso::from_config(config).context("Failed to load model")?;
    println!("{}", serde_json::to_string_pretty(&app.app_state())?);
    Ok(())
}

fn handle_init(
    arch: &str,
    output: PathBuf,
    bundle: bool,
    classes: Option<usize>,
    channels: Option<usize>,
    size: usize,
) -> Result<()> {
    match arch.to_lowercase().as_str() {
        "conv_net" | "convnet" => {
            let defaults = ConvNetConfig::default();
            let topology = ConvNetConfig::new(
                channels.unwrap_or(defaults.in_channels),
                size,
                size,
                classes.unwrap_or(defaults.n_classes),
            );
            write_network(&topology, output, bundle)
        }
        "fcn" => {
            let defaults = FcnNetConfig::default();
            let topology = FcnNetConfig::new(
                channels.unwrap_or(defaults.in_channels),
                classes.unwrap_or(defaults.n_classes),
            );
            write_network(&topology, output, bundle)
        }
        _ => bail!("Unknown architecture: '{}'. Available: conv_net, fcn", arch),
    }
}

fn write_network<T: Topology>(topology: &T, output: PathBuf, bundle: bool) -> Result<()> {
    let device = Default::default();
    let network = topology.init_network::<DefaultBackend>(&device);

    if bundle {
        let path = output.join(format!("{}.mpk", topology.arch()));
        save_bundle::<T, DefaultBackend>(&path, topology, &network)
            .with_context(|| format!("Failed to write bundle '{}'", path.display()))?;
        println!("Wrote {}", path.display());
    } else {
        let files = save_checkpoint::<T, DefaultBackend>(&output, topology.arch(), topology, &network)
            .with_context(|| format!("Failed to write checkpoint to '{}'", output.display()))?;
        println!("Wrote {}", files.checkpoint.display());
        if let Some(path) = files.topology {
            println!("Wrote {}", path.display());
        }
    }
    Ok(())
}

/// Parse a `KEY=VALUE` setting override.
fn parse_setting(raw: &str) -> Result<(String, String)> {
    match raw.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
        _ => bail!("Invalid setting '{}', expected KEY=VALUE", raw),
    }
}

fn handle_visualize(
    visualizer: &str,
    settings: &[String],
    output: PathBuf,
    config: Option<PathBuf>,
    legend_font: Option<PathBuf>,
    images: &[PathBuf],
) -> Result<()> {
    let changes = settings
        .iter()
        .map(|raw| parse_setting(raw))
        .collect::<Result<BTreeMap<_, _>>>()?;

    let inputs = images
        .iter()
        .map(|path| {
            InputImage::open(path).with_context(|| format!("Failed to read image '{}'", path.display()))
        })
        .collect::<Result<Vec<_>>>()?;

    let mut config = load_config(config)?;
    if legend_font.is_some() {
        config.legend_font = legend_font;
    }
    let app = Picasso::from_config(config).context("Failed to load model")?;
    let mut vis = app.visualizer(visualizer)?;
    vis.update_settings(&changes)?;

    tracing::info!("Running {} on {} images", visualizer, inputs.len());
    let results = vis
        .make_visualization(&inputs, &output)
        .with_context(|| format!("{} failed", visualizer))?;
    println!("{}", serde_json::to_string_pretty(&results)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_setting() {
        assert_eq!(
            parse_setting("Window=0.10").unwrap(),
            ("Window".to_string(), "0.10".to_string())
        );
        assert_eq!(parse_setting("Occlusion=").unwrap().1, "");
        assert!(parse_setting("Window").is_err());
        assert!(parse_setting("=0.1").is_err());
    }

    #[test]
    fn test_cli_parses_visualize() {
        let cli = Cli::try_parse_from([
            "picasso",
            "-vv",
            "visualize",
            "--visualizer",
            "PartialOcclusion",
            "--set",
            "Strides=5",
            "--set",
            "Occlusion=black",
            "--legend-font",
            "DejaVuSans.ttf",
            "a.png",
        ])
        .unwrap();
        assert_eq!(cli.verbose, 2);
        match cli.command {
            Commands::Visualize {
                settings,
                legend_font,
                images,
                ..
            } => {
                assert_eq!(settings.len(), 2);
                assert_eq!(legend_font, Some(PathBuf::from("DejaVuSans.ttf")));
                assert_eq!(images, vec![PathBuf::from("a.png")]);
            }
            _ => panic!("expected visualize"),
        }
    }
}
