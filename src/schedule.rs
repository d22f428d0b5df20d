use std::collections::{HashMap, HashSet};
use std::error::Error;
use std::fmt;

use chrono::{NaiveDate, NaiveDateTime};
use log::{debug, warn};

use crate::extract::ChannelSection;

/// A start time that did not match `H:MM`/`HH:MM` or fell outside 0-23/0-59.
/// Per-entry and non-fatal; the offending row is dropped and counted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct InvalidTimeFormat(pub(crate) String);

impl fmt::Display for InvalidTimeFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unrecognized start time {:?}", self.0)
    }
}

impl Error for InvalidTimeFormat {}

/// Parses listing start times of the form `H:MM` or `HH:MM`, surrounding
/// whitespace allowed.
pub(crate) fn parse_start_time(raw: &str) -> Result<(u32, u32), InvalidTimeFormat> {
    let err = || InvalidTimeFormat(raw.to_string());
    let text = raw.trim();
    let (h, m) = text.split_once(':').ok_or_else(err)?;
    if h.is_empty() || h.len() > 2 || m.len() != 2 {
        return Err(err());
    }
    if !h.bytes().all(|b| b.is_ascii_digit()) || !m.bytes().all(|b| b.is_ascii_digit()) {
        return Err(err());
    }
    let hour: u32 = h.parse().map_err(|_| err())?;
    let minute: u32 = m.parse().map_err(|_| err())?;
    if hour > 23 || minute > 59 {
        return Err(err());
    }
    Ok((hour, minute))
}

/// Channel id: trimmed display name with every whitespace run collapsed to
/// a single underscore.
pub(crate) fn channel_id(display_name: &str) -> String {
    display_name.split_whitespace().collect::<Vec<_>>().join("_")
}

/// A section header makes a channel only if it is non-empty after trimming
/// and not one of the configured page-furniture headings.
pub(crate) fn accept_section(name: &str, blocklist: &HashSet<String>) -> bool {
    let name = name.trim();
    !name.is_empty() && !blocklist.contains(name)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Channel {
    pub(crate) id: String,
    pub(crate) display_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Programme {
    pub(crate) channel_id: String,
    pub(crate) start: NaiveDateTime,
    pub(crate) stop: NaiveDateTime,
    pub(crate) title: String,
}

/// Accumulates the whole fetch window: channels in registration order plus
/// programmes appended in day-then-channel order. Append-only; handed to the
/// serializer as a plain value once the day loop is done.
#[derive(Debug, Default)]
pub(crate) struct ScheduleStore {
    channels: Vec<Channel>,
    by_id: HashMap<String, usize>,
    programmes: Vec<Programme>,
}

impl ScheduleStore {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Idempotent: the first display name seen for an id wins, later
    /// duplicate headers are ignored.
    pub(crate) fn register(&mut self, display_name: &str) -> String {
        let id = channel_id(display_name);
        if !self.by_id.contains_key(&id) {
            self.by_id.insert(id.clone(), self.channels.len());
            self.channels.push(Channel {
                id: id.clone(),
                display_name: display_name.trim().to_string(),
            });
        }
        id
    }

    pub(crate) fn channels(&self) -> &[Channel] {
        &self.channels
    }

    pub(crate) fn programmes(&self) -> &[Programme] {
        &self.programmes
    }

    pub(crate) fn programmes_for<'a>(
        &'a self,
        id: &'a str,
    ) -> impl Iterator<Item = &'a Programme> {
        self.programmes.iter().filter(move |p| p.channel_id == id)
    }
}

/// Which of two listings sharing a start time survives dedup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub(crate) enum DedupPolicy {
    #[default]
    FirstWins,
    LastWins,
}

/// Stop time for the last programme of a day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub(crate) enum DayEndPolicy {
    /// Last second of the same calendar day, 23:59:59. Leaves a one-second
    /// hole before the next day's first entry, which QC treats as a day
    /// boundary, not a gap.
    #[default]
    SameDay,
    /// Midnight of the following day.
    NextMidnight,
}

impl DayEndPolicy {
    fn boundary(self, day: NaiveDate) -> NaiveDateTime {
        let day = match self {
            DayEndPolicy::SameDay => day,
            DayEndPolicy::NextMidnight => day.succ_opt().unwrap_or(day),
        };
        let (h, m, s) = match self {
            DayEndPolicy::SameDay => (23, 59, 59),
            DayEndPolicy::NextMidnight => (0, 0, 0),
        };
        // constant in-range times
        day.and_hms_opt(h, m, s).unwrap_or_default()
    }
}

#[derive(Debug, Default)]
pub(crate) struct BuildConfig {
    pub(crate) blocklist: HashSet<String>,
    pub(crate) dedup: DedupPolicy,
    pub(crate) day_end: DayEndPolicy,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub(crate) struct DayStats {
    pub(crate) channels: usize,
    pub(crate) programmes: usize,
    pub(crate) invalid_times: usize,
}

/// Turns one day's extracted sections into finalized programmes appended to
/// the store. Rows lacking a time or title never were listing candidates and
/// are skipped silently; rows whose time text fails validation are dropped
/// and counted.
pub(crate) fn build_day(
    store: &mut ScheduleStore,
    day: NaiveDate,
    sections: &[ChannelSection],
    config: &BuildConfig,
) -> DayStats {
    let mut stats = DayStats::default();
    for section in sections {
        if !accept_section(&section.name, &config.blocklist) {
            debug!("skipping section {:?}", section.name);
            continue;
        }
        let id = store.register(&section.name);

        let mut drafts: Vec<((u32, u32), String)> = Vec::new();
        let mut invalid = 0usize;
        for (time_text, title_text) in &section.rows {
            let title = title_text.trim();
            if time_text.trim().is_empty() || title.is_empty() {
                continue;
            }
            match parse_start_time(time_text) {
                Ok(start) => drafts.push((start, title.to_string())),
                Err(e) => {
                    debug!("{id}: {e}");
                    invalid += 1;
                }
            }
        }
        if invalid > 0 {
            warn!("{id}: dropped {invalid} row(s) with unusable start times on {day}");
            stats.invalid_times += invalid;
        }

        let mut drafts = dedup_by_start(drafts, config.dedup);
        drafts.sort_by_key(|&(start, _)| start);

        let n = drafts.len();
        for i in 0..n {
            let start = local_start(day, drafts[i].0);
            let stop = if i + 1 < n {
                local_start(day, drafts[i + 1].0)
            } else {
                config.day_end.boundary(day)
            };
            store.programmes.push(Programme {
                channel_id: id.clone(),
                start,
                stop,
                title: drafts[i].1.clone(),
            });
        }
        stats.channels += 1;
        stats.programmes += n;
    }
    stats
}

fn local_start(day: NaiveDate, (hour, minute): (u32, u32)) -> NaiveDateTime {
    // hour/minute come out of parse_start_time, already range-checked
    day.and_hms_opt(hour, minute, 0).unwrap_or_default()
}

/// Collapses duplicate start times before sorting, so page order decides
/// which variant of a slot survives.
fn dedup_by_start(
    drafts: Vec<((u32, u32), String)>,
    policy: DedupPolicy,
) -> Vec<((u32, u32), String)> {
    match policy {
        DedupPolicy::FirstWins => {
            let mut seen = HashSet::new();
            drafts
                .into_iter()
                .filter(|&(start, _)| seen.insert(start))
                .collect()
        }
        DedupPolicy::LastWins => {
            let mut last = HashMap::new();
            for (i, &(start, _)) in drafts.iter().enumerate() {
                last.insert(start, i);
            }
            drafts
                .into_iter()
                .enumerate()
                .filter(|(i, (start, _))| last[start] == *i)
                .map(|(_, draft)| draft)
                .collect()
        }
    }
}
