//! Download one HLS item for offline playback.
//!
//! ```sh
//! cargo run --example offline -- https://example.com/master.m3u8 ./offcast-root
//! ```

use offcast::{Event, ItemState, Offcast, OffcastConfig};
use offcast_hls::{DeviceCapabilities, SelectionOptions};
use url::Url;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let mut args = std::env::args().skip(1);
    let master_url: Url = args
        .next()
        .ok_or("usage: offline <master-url> [root-dir]")?
        .parse()?;
    let root = args.next().unwrap_or_else(|| "./offcast-root".to_owned());

    let manager = Offcast::open(OffcastConfig::new(root)).await?;
    let mut events = manager.subscribe();

    let item_id = "demo";
    manager.add_item(item_id, master_url).await?;
    manager
        .load_metadata(
            item_id,
            &SelectionOptions::default(),
            &DeviceCapabilities::default(),
        )
        .await?;

    let item = manager.item(item_id).await?;
    println!(
        "planned: ~{} MiB over {:.0} s of media",
        item.estimated_size / (1024 * 1024),
        item.duration_seconds
    );

    manager.start(item_id).await?;

    loop {
        match events.recv().await? {
            Event::ItemProgress {
                downloaded,
                estimated,
                ..
            } => {
                let percent = if estimated > 0 {
                    downloaded * 100 / estimated
                } else {
                    0
                };
                println!("  {downloaded} / ~{estimated} bytes ({percent}%)");
            }
            Event::ItemStateChanged { state, error, .. } => match state {
                ItemState::Completed => break,
                ItemState::Failed | ItemState::DbFailure | ItemState::Interrupted => {
                    return Err(format!("download stopped in {state}: {error:?}").into());
                }
                _ => println!("state: {state}"),
            },
        }
    }

    let playback = manager.playback_url(item_id).await?;
    println!("done; play offline from {playback}");

    // Keep serving until interrupted.
    tokio::signal::ctrl_c().await?;
    Ok(())
}
