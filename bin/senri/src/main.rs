use std::{path::PathBuf, sync::Arc, time::Duration};

use anyhow::anyhow;
use clap::{Parser, Subcommand};
use senri::{
    hls::parse_bytes,
    model::{Playlist, Representation},
    HttpClient, HttpPlaylistFetcher, PlaylistFetcher, SegmentTracker, SenriConfig, CLOCK_FREQ,
};
use url::Url;

#[derive(Parser, Debug)]
#[clap(version, about)]
struct SenriArgs {
    /// Configuration file in TOML format
    #[clap(short, long, env = "SENRI_CONFIG")]
    config: Option<PathBuf>,

    /// Cookies sent with every playlist request
    #[clap(long)]
    cookies: Vec<String>,

    #[clap(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the renditions of a playlist
    Inspect {
        url: Url,

        /// Print every segment of a media playlist
        #[clap(long)]
        segments: bool,
    },

    /// Follow a live playlist and print segments as they are published
    Follow {
        url: Url,

        /// Highest variant bandwidth to pick from a master playlist
        #[clap(long)]
        max_bandwidth: Option<u64>,
    },
}

fn seconds(ticks: i64) -> f64 {
    ticks as f64 / CLOCK_FREQ as f64
}

fn print_representation(rep: &Representation, segments: bool) {
    let info = rep.stream_info();
    println!(
        "  [{:?}] {} bps {}x{} {} {}",
        rep.stream_type,
        info.bandwidth,
        info.width,
        info.height,
        rep.codecs.as_deref().unwrap_or("-"),
        rep.playlist_url
    );
    if !rep.description().is_empty() {
        println!("    {}", rep.description());
    }

    let Some(list) = &rep.segment_list else {
        return;
    };
    println!(
        "    live: {}, target duration: {:.3}s, segments: {}, duration: {:.3}s",
        rep.live,
        seconds(rep.target_duration),
        list.len(),
        seconds(list.total_duration())
    );
    if segments {
        for segment in list.segments() {
            let range = segment
                .byte_range
                .map(|range| format!(" ({})", range.to_http_range()))
                .unwrap_or_default();
            println!(
                "    #{} {:.3}s {}{range}",
                segment.sequence,
                seconds(segment.duration),
                segment.uri
            );
        }
    }
}

fn inspect(playlist: &Playlist, segments: bool) {
    println!(
        "{} playlist {}",
        if playlist.is_master { "Master" } else { "Media" },
        playlist.url
    );
    for (index, set) in playlist.periods.iter().flat_map(|p| &p.adaptation_sets).enumerate() {
        println!("Adaptation set {index}");
        for rep in &set.representations {
            print_representation(rep, segments);
        }
    }
}

fn choose_variant(playlist: &Playlist, max_bandwidth: Option<u64>) -> Option<&Representation> {
    let variants = &playlist.periods.first()?.adaptation_sets.first()?.representations;
    variants
        .iter()
        .filter(|r| max_bandwidth.map_or(true, |max| r.bandwidth <= max))
        .max_by_key(|r| r.bandwidth)
        .or_else(|| variants.iter().min_by_key(|r| r.bandwidth))
}

async fn follow(
    fetcher: HttpPlaylistFetcher,
    url: Url,
    max_bandwidth: Option<u64>,
    config: SenriConfig,
) -> anyhow::Result<()> {
    let data = fetcher.fetch(&url).await?;
    let playlist = parse_bytes(&data, &url)?;

    let tracker = if playlist.is_master {
        let variant = choose_variant(&playlist, max_bandwidth)
            .ok_or_else(|| anyhow!("No variant found in {url}"))?;
        log::info!(
            "Following variant {} ({} bps)",
            variant.playlist_url,
            variant.bandwidth
        );
        SegmentTracker::new(fetcher, variant, config.tracker)
    } else {
        SegmentTracker::from_url(fetcher, url, config.tracker).with_initial_playlist(data)
    };
    tracker.init().await?;
    if tracker.is_live() {
        tracker.move_to_default_live_start();
    }

    let tracker = Arc::new(tracker);
    let ctrl_c = {
        let tracker = tracker.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                log::info!("Interrupted");
                tracker.interrupt(true);
            }
        })
    };

    while !tracker.is_interrupted() {
        let Some(segment) = tracker.get_next_segment() else {
            if !tracker.is_live() {
                break;
            }
            if tracker.is_reload_stalled() {
                log::warn!("Playlist reload keeps failing");
            }
            if let Some(hint) = tracker.use_preload_segment() {
                println!("preload {}", hint.uri);
            }
            tokio::time::sleep(Duration::from_millis(200)).await;
            continue;
        };

        let rep = tracker
            .representation()
            .ok_or_else(|| anyhow!("Playlist snapshot disappeared"))?;
        if segment.is_in_progress() {
            for part in &segment.parts {
                println!(
                    "#{}.{} {:.3}s {}",
                    segment.sequence,
                    part.sequence,
                    seconds(part.duration),
                    rep.resolve(&part.uri)?
                );
            }
        } else {
            println!(
                "#{} {:.3}s {}",
                segment.sequence,
                seconds(segment.duration),
                rep.resolve(&segment.uri)?
            );
        }
    }

    ctrl_c.abort();
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::builder()
                .with_default_directive(tracing_subscriber::filter::LevelFilter::INFO.into())
                .try_from_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = SenriArgs::parse();
    let config = match &args.config {
        Some(path) => SenriConfig::load(path)?,
        None => SenriConfig::default(),
    };

    let client = HttpClient::with_defaults()?;
    let fetcher = HttpPlaylistFetcher::new(client.clone());

    match args.command {
        Command::Inspect { url, segments } => {
            client.add_cookies(args.cookies, url.clone())?;
            let data = fetcher.fetch(&url).await?;
            inspect(&parse_bytes(&data, &url)?, segments);
        }
        Command::Follow { url, max_bandwidth } => {
            client.add_cookies(args.cookies, url.clone())?;
            follow(fetcher, url, max_bandwidth, config).await?;
        }
    }

    Ok(())
}
