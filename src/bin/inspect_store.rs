use anyhow::Result;
use smartwake::episode::Episode;
use smartwake::file_store::StoreSnapshot;
use std::path::Path;

fn main() -> Result<()> {
    let args: Vec<String> = std::env::args().collect();
    if args.len() != 2 {
        println!("Usage: {} <store_file>", args[0]);
        std::process::exit(1);
    }

    let snapshot = StoreSnapshot::read(Path::new(&args[1]))?;

    println!("\nHeadband on head: {}", snapshot.headband_on_head);
    println!("Episodes: {}", snapshot.episodes.len());

    let mut episodes = snapshot.episodes;
    episodes.sort_by(|a, b| b.record.start_time.cmp(&a.record.start_time));
    for stored in episodes {
        let base = stored.record.base_hypnogram.len();
        let display = stored.record.display_hypnogram.len();
        let episode = Episode::from_record(stored.id, stored.record);
        println!(
            "{:>6}  base={:<5} display={:<4} {}",
            episode.id(),
            base,
            display,
            episode
        );
    }

    Ok(())
}
