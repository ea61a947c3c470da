mod cli;

use std::path::Path;
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use cli::{Cli, Commands};

use cadenza::library::{InMemoryMediaLibrary, InMemoryPlayerRegistry};
use cadenza::server;
use cadenza::state::AppContext;
use cadenza::transcode::{ResolveRequest, TranscodeResolver};
use cadenza_core::config::Config;
use cadenza_core::{MediaId, MediaKind, MediaRef, PlayerProfile, TranscodingRule};

const VIDEO_FORMATS: &[&str] = &["mp4", "m4v", "mkv", "webm", "avi", "mov", "ts", "flv"];

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Respect RUST_LOG if set, otherwise use defaults based on verbose flag.
    let env_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| {
        if cli.verbose {
            "cadenza=trace,cadenza_av=trace,cadenza_media=debug,tower_http=debug".to_string()
        } else {
            "cadenza=debug,cadenza_av=info,tower_http=info".to_string()
        }
    });

    tracing_subscriber::fmt()
        .with_env_filter(&env_filter)
        .init();

    match cli.command {
        Commands::Serve {
            host,
            port,
            media_dir,
        } => {
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(serve(host, port, media_dir, cli.config.as_deref()))
        }
        Commands::Resolve {
            file,
            format,
            max_bit_rate,
        } => resolve_file(&file, format.as_deref(), max_bit_rate, cli.config.as_deref()),
        Commands::CheckTools => check_tools(cli.config.as_deref()),
        Commands::Version => {
            println!("cadenza {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

async fn serve(
    host: Option<String>,
    port: Option<u16>,
    media_dir: Option<std::path::PathBuf>,
    config_path: Option<&Path>,
) -> Result<()> {
    let mut config = Config::load_or_default(config_path);
    if let Some(host) = host {
        config.server.host = host;
    }
    if let Some(port) = port {
        config.server.port = port;
    }

    tracing::info!("Starting cadenza server");

    let rules = configured_rules(&config);
    let library = Arc::new(InMemoryMediaLibrary::new());
    if let Some(dir) = media_dir {
        register_media_dir(&library, &dir)?;
    }
    let players = Arc::new(InMemoryPlayerRegistry::new(
        config.transcode.default_scheme,
        rules,
    ));

    let ctx = AppContext::new(config, library, players);
    server::start_server(ctx).await
}

fn resolve_file(
    file: &Path,
    format: Option<&str>,
    max_bit_rate: Option<u32>,
    config_path: Option<&Path>,
) -> Result<()> {
    if !file.exists() {
        anyhow::bail!("File does not exist: {}", file.display());
    }

    let config = Config::load_or_default(config_path);
    let resolver = TranscodeResolver::new(config.transcode.clone());
    let media = media_ref_from_path(file)?;
    let player = guest_profile(&config);

    let resolved = resolver.resolve(ResolveRequest {
        media: &media,
        player: &player,
        preferred_format: format,
        max_bitrate_override: max_bit_rate,
        wants_segmented: false,
    });

    println!("{}", serde_json::to_string_pretty(&resolved)?);
    Ok(())
}

fn check_tools(config_path: Option<&Path>) -> Result<()> {
    let config = Config::load_or_default(config_path);
    let resolver = TranscodeResolver::new(config.transcode.clone());

    // Every executable referenced by a configured or synthesized command.
    let mut names: Vec<String> = Vec::new();
    let mut push_exe = |template: &str| {
        if let Some(exe) = cadenza_av::template::tokenize(template).into_iter().next() {
            if !names.contains(&exe) {
                names.push(exe);
            }
        }
    };
    push_exe(&config.transcode.hls_command);
    push_exe(&config.transcode.downsample_command);
    push_exe(&config.transcode.split_command);
    for rule in &config.transcode.rules {
        push_exe(&rule.step1);
        if let Some(step) = &rule.step2 {
            push_exe(step);
        }
        if let Some(step) = &rule.step3 {
            push_exe(step);
        }
    }

    let name_refs: Vec<&str> = names.iter().map(String::as_str).collect();
    let mut missing = 0;
    for info in resolver.tools().check(&name_refs) {
        match info.path {
            Some(path) => println!("  ok       {} ({})", info.name, path.display()),
            None => {
                println!("  MISSING  {}", info.name);
                missing += 1;
            }
        }
    }

    if missing > 0 {
        anyhow::bail!("{missing} transcoder executable(s) missing");
    }
    Ok(())
}

fn configured_rules(config: &Config) -> Vec<TranscodingRule> {
    config.transcode.rules.iter().map(Into::into).collect()
}

fn guest_profile(config: &Config) -> PlayerProfile {
    PlayerProfile {
        id: Default::default(),
        username: "cli".into(),
        transcode_scheme: config.transcode.default_scheme,
        user_transcode_scheme: Default::default(),
        active_rules: configured_rules(config),
    }
}

/// Register every regular file in `dir` (non-recursive) as servable media.
fn register_media_dir(library: &InMemoryMediaLibrary, dir: &Path) -> Result<()> {
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        let media = media_ref_from_path(&entry.path())?;
        tracing::info!(id = %media.id, path = %media.path.display(), "Registered media");
        library.insert(media);
    }
    tracing::info!("Registered {} media file(s)", library.len());
    Ok(())
}

fn media_ref_from_path(path: &Path) -> Result<MediaRef> {
    let format = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_ascii_lowercase();
    let kind = if VIDEO_FORMATS.contains(&format.as_str()) {
        MediaKind::Video
    } else {
        MediaKind::Audio
    };
    let file_size = std::fs::metadata(path)?.len();

    Ok(MediaRef {
        id: MediaId::new(),
        path: path.to_path_buf(),
        folder: path.parent().unwrap_or(Path::new("/")).to_path_buf(),
        format,
        kind,
        title: path
            .file_stem()
            .and_then(|s| s.to_str())
            .map(|s| s.to_string()),
        artist: None,
        album: None,
        duration_secs: None,
        bit_rate_kbps: None,
        width: None,
        height: None,
        file_size,
        indexed_track: false,
        start_offset_secs: None,
    })
}
