mod cli;

use convertforge::config;
use convertforge::service::{BatchInput, ConversionService};
use convertforge::{CompressionLevel, Format};

use anyhow::{Context, Result};
use cf_core::formats::{extension_of, possible_targets_for};
use clap::Parser;
use cli::{Cli, Commands};
use std::path::{Path, PathBuf};
use std::sync::Arc;

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    // Respect RUST_LOG env var if set, otherwise use defaults based on verbose flag
    let env_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| {
        if cli.verbose {
            "convertforge=debug,cf_av=debug,cf_core=debug".to_string()
        } else {
            "convertforge=info,cf_av=info,cf_core=info".to_string()
        }
    });

    tracing_subscriber::fmt()
        .with_env_filter(&env_filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Targets { file, json } => list_targets(&file, json),
        Commands::Convert {
            files,
            to,
            level,
            output,
        } => {
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(convert_files(
                files,
                &to,
                &level,
                &output,
                cli.config.as_deref(),
            ))
        }
        Commands::CheckTools => check_tools(cli.config.as_deref()),
        Commands::Validate {
            config: config_path,
        } => {
            let path = config_path.or(cli.config);
            validate_config(path.as_deref())
        }
        Commands::Version => {
            println!("convertforge {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

/// Registry name for `path`. Files without a registered extension are
/// sniffed and get the detected extension appended.
fn detect_name(path: &Path, bytes: Option<&[u8]>) -> String {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| path.display().to_string());

    if Format::from_extension(&extension_of(&name)).is_some() {
        return name;
    }
    let sniffed = bytes
        .and_then(infer::get)
        .map(|kind| match kind.extension() {
            "heif" => "heic",
            other => other,
        })
        .filter(|ext| Format::from_extension(ext).is_some());

    match sniffed {
        Some(ext) => {
            tracing::debug!("Detected {} content for {:?}", ext, path);
            format!("{name}.{ext}")
        }
        None => name,
    }
}

fn list_targets(file: &Path, json: bool) -> Result<()> {
    let mut name = detect_name(file, None);
    if possible_targets_for(&name).is_empty() && file.exists() {
        let bytes =
            std::fs::read(file).with_context(|| format!("Failed to read {:?}", file))?;
        name = detect_name(file, Some(&bytes));
    }
    let targets = possible_targets_for(&name);

    if json {
        println!("{}", serde_json::to_string_pretty(&targets)?);
        return Ok(());
    }

    if targets.is_empty() {
        println!("No conversions available for {}", file.display());
    } else {
        let list: Vec<&str> = targets.iter().map(|f| f.extension()).collect();
        println!("{} -> {}", file.display(), list.join(", "));
    }
    Ok(())
}

async fn convert_files(
    files: Vec<PathBuf>,
    to: &str,
    level: &str,
    output: &Path,
    config_path: Option<&Path>,
) -> Result<()> {
    let config = config::load_config_or_default(config_path)?;
    let level: CompressionLevel = level.parse().map_err(anyhow::Error::msg)?;
    let target = Format::from_extension(to)
        .with_context(|| format!("Unknown target format: {}", to))?;

    let mut inputs = Vec::with_capacity(files.len());
    for file in &files {
        let bytes = std::fs::read(file).with_context(|| format!("Failed to read {:?}", file))?;
        let name = detect_name(file, Some(&bytes));
        inputs.push(BatchInput::new(bytes, name));
    }

    tracing::info!(
        "Converting {} file(s) to {} (compression: {})",
        inputs.len(),
        target,
        level
    );

    let service = ConversionService::new(config);
    let outcome = service
        .convert_batch(
            inputs,
            target.extension(),
            level,
            Some(Arc::new(|index: usize, pct: u8| {
                tracing::debug!(file = index, progress = pct, "progress");
            })),
        )
        .await?;

    for result in &outcome.results {
        match &result.result {
            Ok(artifact) => println!("✓ {} -> {}", result.filename, artifact.filename),
            Err(e) => println!("✗ {}: {}", result.filename, e),
        }
    }

    if let Some(deliverable) = &outcome.deliverable {
        std::fs::create_dir_all(output)
            .with_context(|| format!("Failed to create output directory {:?}", output))?;
        let artifact = deliverable.artifact();
        let path = output.join(&artifact.filename);
        std::fs::write(&path, &artifact.bytes)
            .with_context(|| format!("Failed to write {:?}", path))?;
        println!("\nSaved {}", path.display());
    }

    let failed = outcome.failed();
    if failed > 0 {
        anyhow::bail!("{} of {} file(s) failed to convert", failed, outcome.results.len());
    }
    Ok(())
}

fn check_tools(config_path: Option<&Path>) -> Result<()> {
    let config = config::load_config_or_default(config_path)?;
    println!("Checking external tools...\n");

    let tools = cf_av::tools::check_all(&config.engine);
    let mut all_ok = true;

    for tool in &tools {
        let status = if tool.available {
            "✓"
        } else {
            all_ok = false;
            "✗"
        };

        print!("{} {}", status, tool.name);

        if let Some(ref version) = tool.version {
            print!(" ({})", version.lines().next().unwrap_or(""));
        }

        if let Some(ref path) = tool.path {
            print!(" - {}", path.display());
        }

        println!();
    }

    println!();
    if all_ok {
        println!("All required tools are available!");
    } else {
        println!("Some tools are missing. Audio, video, and HEIC conversions need ffmpeg.");
    }

    Ok(())
}

fn validate_config(path: Option<&Path>) -> Result<()> {
    let config = match path {
        Some(p) => {
            println!("Validating config: {:?}", p);
            let config = config::load_config(p)?;
            println!("✓ Configuration is valid");
            config
        }
        None => {
            println!("No config file specified, using defaults");
            config::Config::default()
        }
    };

    println!("  Queue concurrency: {}", config.queue.concurrency);
    println!(
        "  Release engine when idle: {}",
        config.queue.release_engine_when_idle
    );
    match config.engine.ffmpeg_path {
        Some(ref p) => println!("  ffmpeg: {}", p.display()),
        None => println!("  ffmpeg: (search PATH)"),
    }
    println!(
        "  Engine timeout: {}s ({} retries)",
        config.engine.exec_timeout_secs, config.engine.exec_retries
    );
    println!("  Max image dimension: {}", config.image.max_dimension);
    println!(
        "  Archive: {}.zip (level {})",
        config.packaging.archive_name, config.packaging.compression_level
    );

    for warning in config.validate() {
        println!("  ! {}", warning);
    }

    Ok(())
}
