mod cli;

use anyhow::{Context, Result};
use clap::Parser;
use cli::{Cli, Commands};
use rand::RngCore;
use std::path::Path;

use streamforge_core::config::{Config, LogFormat};
use streamforge_core::StreamKey;
use streamforge_server::tokens::StreamTokens;
use streamforge_transcode::command::input_url;
use streamforge_transcode::{build_args, ProfileRegistry};

/// Load the config file (or defaults) and apply environment overrides.
fn load_config(path: Option<&Path>) -> Result<Config> {
    let mut config = Config::load_or_default(path)?;
    config.apply_env_overrides();
    Ok(config)
}

fn init_tracing(verbose: bool, config: Option<&Config>) {
    // RUST_LOG wins; otherwise derive from the configured level.
    let env_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| {
        if verbose {
            "streamforge=trace,streamforge_core=debug,streamforge_transcode=trace,streamforge_server=trace,tower_http=debug".to_string()
        } else {
            let level = config.map(|c| c.logging.level.as_str()).unwrap_or("info");
            format!(
                "streamforge={level},streamforge_core={level},streamforge_transcode={level},streamforge_server={level},tower_http=info"
            )
        }
    });

    let builder = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr);
    match config.map(|c| c.logging.format).unwrap_or_default() {
        LogFormat::Json => builder.json().init(),
        LogFormat::Pretty => builder.init(),
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Start { host, port } => {
            let mut config = load_config(cli.config.as_deref())?;
            if let Some(host) = host {
                config.server.host = host;
            }
            if let Some(port) = port {
                config.server.port = port;
            }
            init_tracing(cli.verbose, Some(&config));

            tracing::info!(
                "Starting streamforge {} on {}:{}",
                env!("CARGO_PKG_VERSION"),
                config.server.host,
                config.server.port
            );
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(streamforge_server::start(config))?;
            Ok(())
        }
        Commands::Validate {
            config: config_path,
        } => {
            init_tracing(cli.verbose, None);
            let path = config_path.or(cli.config);
            validate_config(path.as_deref())
        }
        Commands::Profiles { json } => list_profiles(json),
        Commands::Command {
            key,
            profile,
            output,
            no_audio,
        } => {
            init_tracing(cli.verbose, None);
            let mut config = load_config(cli.config.as_deref())?;
            if no_audio {
                config.transcoding.source_audio = false;
            }
            print_command(&config, &key, profile.as_deref(), output.as_deref())
        }
        Commands::Token { key } => {
            init_tracing(cli.verbose, None);
            let config = load_config(cli.config.as_deref())?;
            let token = StreamTokens::new(&config.security.stream_secret).create(&key)?;
            println!("{token}");
            Ok(())
        }
        Commands::GenerateSecret => {
            let mut bytes = [0u8; 32];
            rand::thread_rng().fill_bytes(&mut bytes);
            println!("{}", hex::encode(bytes));
            Ok(())
        }
        Commands::Version => {
            println!("streamforge {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

fn validate_config(path: Option<&Path>) -> Result<()> {
    match path {
        Some(p) => println!("Validating config: {}", p.display()),
        None => println!("No config file specified, searching default locations"),
    }
    let config = load_config(path)?;
    let registry = ProfileRegistry::builtin();

    let mut errors = Vec::new();
    for name in &config.transcoding.profiles {
        if !registry.contains(name) {
            errors.push(format!("unknown profile '{name}'"));
        }
    }
    if !errors.is_empty() {
        for e in &errors {
            println!("✗ {e}");
        }
        anyhow::bail!("configuration is invalid");
    }

    println!("✓ Configuration is valid");
    println!("  Server: {}:{}", config.server.host, config.server.port);
    println!("  HLS root: {}", config.storage.hls_root.display());
    println!("  ffmpeg: {}", config.transcoding.ffmpeg_path.display());
    println!(
        "  Max concurrent streams: {}",
        config.transcoding.max_concurrent_streams
    );
    println!("  Profiles: {}", config.transcoding.profiles.join(", "));
    println!("  Metrics enabled: {}", config.metrics.enabled);
    println!(
        "  Cleanup: {} (every {}h, keep {}h)",
        config.cleanup.enabled, config.cleanup.interval_hours, config.cleanup.retention_hours
    );

    for warning in config.validate() {
        println!("  warning: {warning}");
    }
    Ok(())
}

fn list_profiles(json: bool) -> Result<()> {
    let registry = ProfileRegistry::builtin();

    if json {
        let profiles: Vec<_> = registry.iter().collect();
        println!("{}", serde_json::to_string_pretty(&profiles)?);
        return Ok(());
    }

    for profile in registry.iter() {
        println!(
            "{} (segments {}s, window {})",
            profile.name,
            profile.packaging.segment_duration_secs,
            profile.packaging.playlist_window
        );
        for (i, r) in profile.renditions.iter().enumerate() {
            println!(
                "  [{i}] {}x{} video {} (max {}, buf {}) audio {}",
                r.width,
                r.height,
                r.video_bitrate,
                r.video_maxrate,
                r.video_buffer_size,
                r.audio_bitrate
            );
        }
    }
    Ok(())
}

fn print_command(
    config: &Config,
    raw_key: &str,
    profile: Option<&str>,
    output: Option<&Path>,
) -> Result<()> {
    let key = StreamKey::sanitize(raw_key);
    if key.is_empty() {
        anyhow::bail!("stream key is required");
    }

    let registry = ProfileRegistry::builtin();
    let name = profile
        .or_else(|| config.default_profile())
        .context("no profile given and none configured")?;
    let profile = registry.get(name)?;

    let output_dir = output
        .map(Path::to_path_buf)
        .unwrap_or_else(|| config.storage.hls_root.join(key.as_str()));
    let input = input_url(&config.transcoding.input_url_template, &key);
    let args = build_args(profile, &input, &output_dir, config.transcoding.source_audio);

    let mut line = config.transcoding.ffmpeg_path.display().to_string();
    for arg in args {
        line.push(' ');
        if arg.contains([' ', ';', '[', ']']) {
            line.push_str(&format!("'{arg}'"));
        } else {
            line.push_str(&arg);
        }
    }
    println!("{line}");
    Ok(())
}
