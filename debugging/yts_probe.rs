//! Search the movie index and print the mapped records and chat replies.
//! Usage:
//!   cargo run --bin yts_probe -- <title words...>
//!   cargo run --bin yts_probe -- --featured <year>
//! Honors YTS_BASE_URL, MIN_RATING, MAX_RESULTS and FEATURE_MODE (.env supported).

use anyhow::{bail, Context, Result};
use dotenvy::dotenv;
use reelscout::config::{SearchSettings, DEFAULT_MAX_RESULTS, DEFAULT_MIN_RATING};
use reelscout::format::FeatureMode;
use reelscout::pipeline::Pipeline;
use reelscout::yts::{MovieIndex, YtsClient, DEFAULT_YTS_BASE};
use std::env;
use std::sync::Arc;
use std::time::Duration;

fn settings_from_env() -> Result<SearchSettings> {
    let min_rating = match env::var("MIN_RATING") {
        Ok(v) => v.trim().parse().context("MIN_RATING must be a number")?,
        Err(_) => DEFAULT_MIN_RATING,
    };
    let max_results = match env::var("MAX_RESULTS") {
        Ok(v) => v.trim().parse().context("MAX_RESULTS must be a positive integer")?,
        Err(_) => DEFAULT_MAX_RESULTS,
    };
    let mode = match env::var("FEATURE_MODE") {
        Ok(v) => v.parse::<FeatureMode>().map_err(anyhow::Error::msg)?,
        Err(_) => FeatureMode::Full,
    };
    Ok(SearchSettings {
        min_rating,
        max_results,
        mode,
    })
}

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenv();
    let args: Vec<String> = env::args().skip(1).collect();
    if args.is_empty() {
        bail!("usage: yts_probe <title words...> | yts_probe --featured <year>");
    }

    let base = env::var("YTS_BASE_URL").unwrap_or_else(|_| DEFAULT_YTS_BASE.to_string());
    let index = Arc::new(YtsClient::new(&base, Duration::from_secs(15))?);
    let settings = settings_from_env()?;
    println!("Settings: {:?}", settings);

    let (records, outcome) = if args[0] == "--featured" {
        let year: i32 = args
            .get(1)
            .context("--featured needs a year")?
            .parse()
            .context("year must be a number")?;
        let records = index.featured(year, settings.min_rating).await?;
        let pipeline = Pipeline::new(index.clone(), settings.clone());
        (records, pipeline.featured(year).await)
    } else {
        let title = args.join(" ");
        let records = index.search(&title).await?;
        let pipeline = Pipeline::new(index.clone(), settings.clone());
        (records, pipeline.run(&title).await)
    };

    println!("\n=== Raw records ({}) ===", records.len());
    for r in &records {
        println!(
            "- {} ({}) ⭐ {:.1} [{}] {} torrent(s)",
            r.title,
            r.year,
            r.rating,
            r.genres.join(", "),
            r.torrents.len()
        );
        for t in &r.torrents {
            println!(
                "    {} {} {}S/{}P {}",
                t.quality,
                t.size.as_deref().unwrap_or("?"),
                t.seeds,
                t.peers,
                t.download_reference(&r.title)
            );
        }
    }

    println!("\n=== Replies ===");
    for message in outcome.into_messages(&settings) {
        println!("{}", message.text);
        for b in &message.buttons {
            println!("  [{}] {:?}", b.label, b.action);
        }
        println!("---");
    }
    Ok(())
}
