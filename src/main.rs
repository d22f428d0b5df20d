use std::collections::HashSet;
use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use chrono::{Days, FixedOffset, Local, NaiveDateTime, Utc};
use log::{info, warn};

mod args;
mod extract;
mod fetch;
mod qc;
mod schedule;
mod xmltv;

use args::Args;
use fetch::Fetcher;
use schedule::{BuildConfig, ScheduleStore};
use xmltv::GuideMeta;

fn parse_offset(suffix: &str) -> Result<FixedOffset> {
    let (sign, digits) = if let Some(rest) = suffix.strip_prefix('+') {
        (1, rest)
    } else if let Some(rest) = suffix.strip_prefix('-') {
        (-1, rest)
    } else {
        bail!("utc offset must look like +HHMM, got {suffix:?}");
    };
    if digits.len() != 4 || !digits.bytes().all(|b| b.is_ascii_digit()) {
        bail!("utc offset must look like +HHMM, got {suffix:?}");
    }
    let hours: i32 = digits[..2].parse()?;
    let minutes: i32 = digits[2..].parse()?;
    FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60))
        .ok_or_else(|| anyhow!("utc offset out of range: {suffix}"))
}

/// Wall clock in the guide's zone, so day 0 is the guide's calendar day.
fn guide_now(offset: Option<FixedOffset>) -> NaiveDateTime {
    match offset {
        Some(o) => Utc::now().with_timezone(&o).naive_local(),
        None => Local::now().naive_local(),
    }
}

fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    let mut tmp = OsString::from(path.as_os_str());
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);
    fs::write(&tmp, contents)?;
    fs::rename(&tmp, path)?;
    Ok(())
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    env_logger::init();
    let args: Args = argh::from_env();

    let offset = if args.utc_offset.is_empty() {
        None
    } else {
        Some(parse_offset(&args.utc_offset)?)
    };
    let config = BuildConfig {
        blocklist: args
            .skip_section
            .iter()
            .map(|s| s.trim().to_string())
            .collect::<HashSet<_>>(),
        dedup: args.dedup,
        day_end: args.day_end,
    };
    let fetcher = Fetcher::new(
        &args.base_url,
        Duration::from_secs(args.timeout),
        args.attempts,
        Duration::from_millis(args.backoff_ms),
    )?;

    let today = guide_now(offset).date();
    let mut store = ScheduleStore::new();
    for day_offset in 0..args.days {
        let date = today + Days::new(u64::from(day_offset));
        let html = match fetcher.fetch_day(date, day_offset == 0).await {
            Ok(html) => html,
            Err(e) => {
                warn!("skipping {date}: {e:#}");
                continue;
            }
        };
        let sections = extract::channel_sections(&html)?;
        if sections.is_empty() {
            warn!("no channel sections found for {date}");
            continue;
        }
        let stats = schedule::build_day(&mut store, date, &sections, &config);
        info!(
            "{date}: {} channel(s), {} programme(s), {} invalid time(s)",
            stats.channels, stats.programmes, stats.invalid_times
        );
    }

    let meta = GuideMeta {
        generated_at: guide_now(offset),
        source_url: &args.base_url,
        lang: &args.lang,
        utc_offset: (!args.utc_offset.is_empty()).then_some(args.utc_offset.as_str()),
    };
    let xml_text = xmltv::write_guide(&store, &meta)?;
    write_atomic(Path::new(&args.output), &xml_text)
        .with_context(|| format!("writing {}", args.output))?;
    info!(
        "wrote {} ({} channel(s), {} programme(s))",
        args.output,
        store.channels().len(),
        store.programmes().len()
    );

    // diagnostic only: anomalies are reported, never fatal
    match qc::validate(&xml_text) {
        Ok(report) => {
            for (channel, counts) in &report.channels {
                if !counts.is_clean() {
                    warn!(
                        "QC {channel}: {} invalid interval(s), {} overlap(s), {} gap(s)",
                        counts.invalid, counts.overlaps, counts.gaps
                    );
                }
            }
            info!(
                "QC totals over {} channel(s): {} invalid interval(s), {} overlap(s), {} gap(s)",
                report.channels.len(),
                report.totals.invalid,
                report.totals.overlaps,
                report.totals.gaps
            );
        }
        Err(e) => warn!("QC re-parse failed: {e:#}"),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn offsets_parse_to_seconds() {
        assert_eq!(parse_offset("+0800").unwrap().local_minus_utc(), 8 * 3600);
        assert_eq!(
            parse_offset("-0530").unwrap().local_minus_utc(),
            -(5 * 3600 + 30 * 60)
        );
        assert!(parse_offset("0800").is_err());
        assert!(parse_offset("+800").is_err());
        assert!(parse_offset("+ab00").is_err());
    }
}
