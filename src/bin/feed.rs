use anyhow::Context;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::warn;

use swipefeed::app::controller::{FeedController, FeedPhase, Navigation};
use swipefeed::app::persisted::default_state_path;
use swipefeed::app::session::FeedSession;
use swipefeed::config::ClientConfig;
use swipefeed::discovery::fetchers::{CatalogGateway, VideoCatalog};
use swipefeed::download::manager::WarmupManager;
use swipefeed::models::models::Video;
use swipefeed::utils::log::init_logger_once;

const HELP: &str = "\
commands:
  n                 next video            p             previous video
  e                 current video ended   m             toggle sequential/random
  a                 toggle autoplay       l             like / unlike
  o                 show captions and comments
  c CATEGORY        switch category (all, top20, videos, ...)
  s TEXT            search                g N           open search hit N
  t TITLE           rename title          f NAME        rename file
  k TEXT            comment               d SECS TEXT   caption at SECS
  q                 quit";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_logger_once();

    let config = ClientConfig::from_env()?;
    let catalog = CatalogGateway::new(&config.base_url)
        .with_context(|| format!("invalid server url {}", config.base_url))?;
    let warmup = WarmupManager::new(catalog.client().clone(), config.warmup_settings());
    let mut session = FeedSession::new(
        catalog,
        FeedController::new(config.feed_settings()),
        warmup,
    );
    match default_state_path() {
        Ok(path) => session = session.with_state_path(path),
        Err(e) => warn!("Viewer state disabled: {e:#}"),
    }

    session.load_category("all").await;
    print_status(&session);
    println!("{HELP}");

    let mut hits: Vec<Video> = Vec::new();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        let (cmd, arg) = line.split_once(' ').unwrap_or((line, ""));
        let arg = arg.trim();

        match cmd {
            "" => continue,
            "q" => break,
            "n" => report_nav(session.swipe_forward()),
            "p" => report_nav(session.swipe_backward()),
            "e" => report_nav(session.video_ended()),
            "m" => println!("mode: {:?}", session.toggle_mode()),
            "a" => println!("autoplay: {}", session.toggle_autoplay()),
            "l" => {
                if let Ok(count) = session.toggle_like().await {
                    println!("likes: {count}");
                }
            }
            "o" => {
                if session.refresh_overlays().await.is_ok() {
                    print_overlays(&session);
                }
            }
            "c" => {
                session.load_category(arg).await;
            }
            "s" => {
                if let Ok(found) = session.search(arg, None).await {
                    for (n, video) in found.iter().enumerate() {
                        println!("  [{n}] {} ({} likes, {})", video.title, video.likes, video.category);
                    }
                    hits = found;
                }
            }
            "g" => match arg.parse::<usize>().ok().and_then(|n| hits.get(n)) {
                Some(hit) => {
                    let hit = hit.clone();
                    report_nav(session.select_from_search(&hit));
                }
                None => println!("no such search hit"),
            },
            "t" => {
                let _ = session.rename_title(arg).await;
            }
            "f" => {
                let _ = session.rename_file(arg).await;
            }
            "k" => {
                if session.post_comment(arg).await.is_ok() {
                    print_overlays(&session);
                }
            }
            "d" => {
                let (secs, text) = arg.split_once(' ').unwrap_or((arg, ""));
                match secs.parse::<f64>() {
                    Ok(time) => {
                        let _ = session.post_caption(text.trim(), time).await;
                    }
                    Err(_) => println!("usage: d SECS TEXT"),
                }
            }
            _ => println!("{HELP}"),
        }
        print_status(&session);
        if let Some(notice) = session.take_notice() {
            println!("! {notice}");
        }
    }
    Ok(())
}

fn report_nav(nav: Navigation) {
    match nav {
        Navigation::Moved(_) => {}
        Navigation::NoEarlierVideo => println!("(no earlier video)"),
        Navigation::Ignored => println!("(nothing to do)"),
    }
}

fn print_status<C: VideoCatalog>(session: &FeedSession<C>) {
    let feed = session.feed();
    let state = feed.state();
    match feed.phase() {
        FeedPhase::Idle | FeedPhase::Loading => println!("loading..."),
        FeedPhase::Error(message) => println!("error: {message}"),
        FeedPhase::Ready => match feed.current_video() {
            Some(video) => println!(
                "[{}/{}] {} | {} likes{} | {:?}{} | {:?}",
                state.current_index + 1,
                feed.videos().len(),
                video.title,
                video.likes,
                if feed.is_liked(video.id) { " (liked)" } else { "" },
                state.mode,
                if state.is_autoplay_on { ", autoplay" } else { "" },
                session.current_resource_state(),
            ),
            None => println!("no videos in this category"),
        },
    }
}

fn print_overlays<C: VideoCatalog>(session: &FeedSession<C>) {
    let Some(overlays) = session.feed().overlays() else {
        return;
    };
    for caption in &overlays.captions {
        println!("  {:>6.1}s  {}", caption.time, caption.content);
    }
    for comment in &overlays.comments {
        println!("  > {}", comment.content);
    }
}
