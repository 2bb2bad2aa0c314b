mod cli;

use std::io::Write as _;
use std::path::Path;

use anyhow::{Context, Result};
use clap::Parser;
use cli::{Cli, Commands};
use sf_core::config::Config;
use sf_editor::{MediaApiClient, ResourceKind};
use sf_transcode::{fetch_file, CoreLocations, FileSource, Progress, ProcessEngineFactory, TranscodeSession};

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Respect RUST_LOG env var if set, otherwise use defaults based on verbose flag
    let env_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| {
        if cli.verbose {
            "storyforge=trace,sf_transcode=trace,sf_editor=debug,sf_core=debug".to_string()
        } else {
            "storyforge=info,sf_transcode=info,sf_editor=info,sf_core=warn".to_string()
        }
    });

    tracing_subscriber::fmt()
        .with_env_filter(&env_filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Transcode {
            input,
            output,
            ffmpeg,
            log,
            args,
        } => {
            let mut config = Config::load_or_default(cli.config.as_deref());
            if ffmpeg.is_some() {
                config.transcode.ffmpeg_path = ffmpeg;
            }
            config.transcode.log |= log;
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(transcode(config, &input, &output, args))
        }
        Commands::CheckEngine => check_engine(&Config::load_or_default(cli.config.as_deref())),
        Commands::Media { kind, json } => {
            let config = Config::load_or_default(cli.config.as_deref());
            let kind: ResourceKind = kind.parse()?;
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(list_media(config, kind, json))
        }
        Commands::Validate {
            config: config_path,
        } => {
            let path = config_path.or(cli.config);
            validate_config(path.as_deref())
        }
        Commands::Version => {
            println!("storyforge {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

/// Name a payload gets inside the engine's filesystem.
fn vfs_name(source: &str, fallback: &str) -> String {
    if source.starts_with("data:") {
        return fallback.to_string();
    }
    let path = source.split(['?', '#']).next().unwrap_or(source);
    match path.rsplit(['/', '\\']).next() {
        Some(name) if !name.is_empty() => name.to_string(),
        _ => fallback.to_string(),
    }
}

async fn transcode(config: Config, input: &str, output: &Path, extra: Vec<String>) -> Result<()> {
    let input_name = vfs_name(input, "input");
    let mut output_name = vfs_name(&output.to_string_lossy(), "output");
    if output_name == input_name {
        output_name = format!("out-{output_name}");
    }

    let client = reqwest_client();
    let payload = fetch_file(Some(FileSource::parse(input)), &client)
        .await
        .with_context(|| format!("Failed to read input {input}"))?;
    tracing::info!("Read {} bytes from {input}", payload.len());

    let session = TranscodeSession::builder()
        .config(config.transcode)
        .progress(print_progress)
        .build();
    session.load().await.context("Failed to load ffmpeg engine")?;

    session.write_file(&input_name, payload)?;

    let mut args = vec!["-i".to_string(), input_name.clone()];
    args.extend(extra);
    args.push(output_name.clone());

    let result = session.run(args)?.await;
    eprintln!();
    if let Err(e) = result {
        session.exit();
        return Err(e).context("Transcode did not complete");
    }

    let data = session
        .read_file(&output_name)
        .context("ffmpeg produced no output; run with --log to see why")?;
    session.exit();

    std::fs::write(output, &data)
        .with_context(|| format!("Failed to write {}", output.display()))?;
    println!("Wrote {} ({} bytes)", output.display(), data.len());
    Ok(())
}

fn reqwest_client() -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(300))
        .build()
        .unwrap_or_else(|e| {
            tracing::warn!("Failed to build HTTP client with timeout: {}", e);
            reqwest::Client::new()
        })
}

fn print_progress(p: &Progress) {
    let mut stderr = std::io::stderr();
    match p.time {
        Some(time) => {
            let _ = write!(stderr, "\rprogress {:>5.1}% ({time:.1}s)", p.ratio * 100.0);
        }
        None => {
            let _ = write!(stderr, "\rprogress {:>5.1}%", p.ratio * 100.0);
        }
    }
    let _ = stderr.flush();
}

fn check_engine(config: &Config) -> Result<()> {
    println!("Checking transcode engine...\n");

    let factory = ProcessEngineFactory::new(&config.transcode);
    let ok = match factory.locate() {
        Ok(path) => {
            println!("✓ ffmpeg - {}", path.display());
            true
        }
        Err(e) => {
            println!("✗ ffmpeg ({e})");
            false
        }
    };

    let locations = CoreLocations::resolve(&config.transcode);
    println!("\nWebAssembly core locations (unused by the native engine):");
    println!("  core:   {}", locations.core);
    println!("  wasm:   {}", locations.wasm);
    println!(
        "  worker: {}{}",
        locations.worker,
        if locations.worker_explicit { "" } else { " (optional)" }
    );
    println!("  entry point: {}", config.transcode.main_name);

    println!();
    if ok {
        println!("The transcode engine is available!");
    } else {
        println!("ffmpeg is missing. Install it or set transcode.ffmpeg_path.");
    }

    Ok(())
}

async fn list_media(config: Config, kind: ResourceKind, json: bool) -> Result<()> {
    let client = MediaApiClient::new(config.media);
    let page = client.list(kind).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&page)?);
        return Ok(());
    }

    println!("{} {kind} resources", page.meta.total_items);
    for item in &page.items {
        print!("  [{}] {}", item.id, item.src);
        if let Some(ref mime) = item.mime_type {
            print!(" ({mime})");
        }
        if item.width > 0 && item.height > 0 {
            print!(" {}x{}", item.width, item.height);
        }
        println!();
    }
    Ok(())
}

fn validate_config(path: Option<&Path>) -> Result<()> {
    let config = match path {
        Some(p) => {
            println!("Validating config: {:?}", p);
            let config = Config::load(p)?;
            println!("✓ Configuration is valid");
            config
        }
        None => {
            println!("No config file specified, using defaults");
            Config::default()
        }
    };

    println!("  Core path: {}", config.transcode.core_path);
    println!("  Entry point: {}", config.transcode.main_name);
    println!("  Engine log: {}", config.transcode.log);
    println!("  Content API: {}", config.media.api_base_url);

    let warnings = config.validate();
    if !warnings.is_empty() {
        println!("\nWarnings:");
        for w in &warnings {
            println!("  - {w}");
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vfs_names() {
        assert_eq!(vfs_name("/home/me/clip.mov", "input"), "clip.mov");
        assert_eq!(vfs_name("https://cdn/v/clip.mp4?sig=1", "input"), "clip.mp4");
        assert_eq!(vfs_name("data:video/mp4;base64,AAAA", "input"), "input");
        assert_eq!(vfs_name("https://cdn/", "input"), "input");
    }
}
