//! perfreport CLI - render performance report data into HTML or text

// Global invariants enforced:
// - Identical data and templates yield byte-for-byte identical output
// - Status lines go to stderr, documents to stdout or the output file

use anyhow::Context;
use clap::{Parser, Subcommand};
use perfreport_core::color::{compute_color, css_color_rules, ColorSpec};
use perfreport_core::templates::collect_templates;
use perfreport_core::text::{html_to_text, HtmlToTextOptions};
use perfreport_core::{config, render_report, Format, RenderOptions};
use std::path::{Path, PathBuf};
use tracing::debug;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "perfreport")]
#[command(about = "Render performance report data into HTML or text documents")]
#[command(version = env!("PERFREPORT_VERSION"))]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Render report data with a directory of templates
    Render {
        /// Path to the report data (JSON)
        data: PathBuf,

        /// Template directory (overrides config file)
        #[arg(long)]
        templates: Option<PathBuf>,

        /// Name of the main template (overrides config file)
        #[arg(long)]
        template: Option<String>,

        /// Output format (overrides config file)
        #[arg(long)]
        format: Option<OutputFormat>,

        /// Output file path (default: stdout)
        #[arg(long)]
        output: Option<PathBuf>,

        /// Path to config file (default: auto-discover)
        #[arg(long)]
        config: Option<PathBuf>,

        /// Do not log hook failures
        #[arg(long)]
        quiet: bool,
    },
    /// Convert an HTML file to plain text
    Text {
        /// Path to the HTML file
        path: PathBuf,

        /// Wrap lines at this column
        #[arg(long)]
        wrap: Option<usize>,

        /// Keep runs of whitespace as written
        #[arg(long)]
        no_collapse: bool,
    },
    /// Compute colors from a color table
    Color {
        /// Path to the color table (JSON)
        path: PathBuf,

        /// Dotted color class, e.g. "time.mpi"
        name: Option<String>,

        /// Print a CSS rule for every color class instead
        #[arg(long)]
        css: bool,
    },
    /// Validate a configuration file
    #[command(name = "config")]
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Validate a config file without rendering
    Validate {
        /// Path to config file (default: auto-discover from current directory)
        #[arg(long)]
        path: Option<PathBuf>,
    },
    /// Show the resolved configuration (merged defaults + config file)
    Show {
        /// Path to config file (default: auto-discover from current directory)
        #[arg(long)]
        path: Option<PathBuf>,
    },
}

#[derive(Clone, Copy, clap::ValueEnum)]
enum OutputFormat {
    Html,
    Text,
}

impl From<OutputFormat> for Format {
    fn from(format: OutputFormat) -> Self {
        match format {
            OutputFormat::Html => Format::Html,
            OutputFormat::Text => Format::Text,
        }
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> anyhow::Result<()> {
    init_tracing();
    let cli = Cli::parse();

    match cli.command {
        Commands::Render {
            data,
            templates,
            template,
            format,
            output,
            config: config_path,
            quiet,
        } => {
            if !data.exists() {
                anyhow::bail!("Path does not exist: {}", data.display());
            }

            // Load configuration
            let project_root = std::env::current_dir()?;
            let resolved_config = config::load_and_resolve(&project_root, config_path.as_deref())
                .context("failed to load configuration")?;

            if let Some(config_path) = &resolved_config.config_path {
                eprintln!("Using config: {}", config_path.display());
            }

            // CLI flags override config file values
            let templates_dir = templates
                .or_else(|| resolved_config.templates_dir.clone())
                .ok_or_else(|| {
                    anyhow::anyhow!("no template directory: pass --templates or set templates_dir")
                })?;
            let mut options = RenderOptions::from_config(&resolved_config);
            if let Some(name) = template {
                options.main_template = name;
            }
            if let Some(format) = format {
                options.format = format.into();
            }
            options.quiet = options.quiet || quiet;
            debug!(
                "rendering {} as {}",
                options.main_template, options.format
            );

            let content = std::fs::read_to_string(&data)
                .with_context(|| format!("failed to read report data: {}", data.display()))?;
            let report_data: serde_json::Value = serde_json::from_str(&content)
                .with_context(|| format!("failed to parse report data: {}", data.display()))?;

            let scripts = collect_templates(&templates_dir, &resolved_config)
                .context("failed to load templates")?;
            eprintln!(
                "Loaded {} templates from {}",
                scripts.len(),
                templates_dir.display()
            );

            let rendered = render_report(&report_data, scripts, &options)
                .context("failed to render report")?;

            match output {
                Some(path) => {
                    write_document(&path, &rendered.document)?;
                    eprintln!("Report written to: {}", path.display());
                }
                None => print!("{}", rendered.document),
            }

            if let Some(err) = rendered.error {
                eprintln!("Report rendered with errors: {}", err);
                std::process::exit(1);
            }
        }
        Commands::Text {
            path,
            wrap,
            no_collapse,
        } => {
            let project_root = std::env::current_dir()?;
            let resolved_config = config::load_and_resolve(&project_root, None)
                .context("failed to load configuration")?;

            let html = std::fs::read_to_string(&path)
                .with_context(|| format!("failed to read {}", path.display()))?;
            let options = HtmlToTextOptions {
                wrap: wrap.or(resolved_config.wrap),
                collapse_whitespace: resolved_config.collapse_whitespace && !no_collapse,
            };
            let text = html_to_text(&html, &options)
                .with_context(|| format!("failed to convert {}", path.display()))?;
            println!("{}", text);
        }
        Commands::Color { path, name, css } => {
            let content = std::fs::read_to_string(&path)
                .with_context(|| format!("failed to read {}", path.display()))?;
            let table: serde_json::Value = serde_json::from_str(&content)
                .with_context(|| format!("failed to parse color table: {}", path.display()))?;
            let colors = ColorSpec::from_value(&table);

            if css {
                for rule in css_color_rules(&colors) {
                    println!("{}", rule);
                }
            } else {
                let name = name.ok_or_else(|| anyhow::anyhow!("a color name or --css is required"))?;
                println!("{}", compute_color(Some(&colors), &name));
            }
        }
        Commands::Config { action } => match action {
            ConfigAction::Validate { path } => {
                let project_root = std::env::current_dir()?;
                let resolved = config::load_and_resolve(&project_root, path.as_deref());

                match resolved {
                    Ok(config) => {
                        if let Some(ref p) = config.config_path {
                            println!("Config valid: {}", p.display());
                        } else {
                            println!("No config file found. Using defaults.");
                        }
                    }
                    Err(e) => {
                        eprintln!("Config validation failed: {:#}", e);
                        std::process::exit(1);
                    }
                }
            }
            ConfigAction::Show { path } => {
                let project_root = std::env::current_dir()?;
                let resolved = config::load_and_resolve(&project_root, path.as_deref())
                    .context("failed to load configuration")?;

                println!("Configuration:");
                if let Some(ref p) = resolved.config_path {
                    println!("  Source: {}", p.display());
                } else {
                    println!("  Source: defaults (no config file found)");
                }
                println!();
                println!("Templates:");
                println!(
                    "  dir: {}",
                    resolved
                        .templates_dir
                        .as_ref()
                        .map(|d| d.display().to_string())
                        .unwrap_or_else(|| "none".to_string())
                );
                println!("  main: {}", resolved.main_template);
                println!();
                println!("Output:");
                println!("  format: {}", resolved.format);
                println!(
                    "  title: {}",
                    resolved.title.as_deref().unwrap_or("none")
                );
                println!(
                    "  wrap: {}",
                    resolved
                        .wrap
                        .map(|v| v.to_string())
                        .unwrap_or_else(|| "none".to_string())
                );
                println!("  collapse_whitespace: {}", resolved.collapse_whitespace);
                println!("  quiet: {}", resolved.quiet);
            }
        },
    }

    Ok(())
}

/// Write a rendered document to file with atomic write pattern
fn write_document(path: &Path, document: &str) -> anyhow::Result<()> {
    use std::fs;

    // Create parent directories if needed
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
    }

    // Atomic write (temp + rename pattern)
    let mut temp_name = path.as_os_str().to_os_string();
    temp_name.push(".tmp");
    let temp_path = PathBuf::from(temp_name);
    fs::write(&temp_path, document)
        .with_context(|| format!("Failed to write temporary file: {}", temp_path.display()))?;
    fs::rename(&temp_path, path)
        .with_context(|| format!("Failed to rename temporary file to: {}", path.display()))?;

    Ok(())
}
