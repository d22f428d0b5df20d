use argh::FromArgs;

use crate::schedule::{DayEndPolicy, DedupPolicy};

fn parse_dedup(value: &str) -> Result<DedupPolicy, String> {
    match value {
        "first" => Ok(DedupPolicy::FirstWins),
        "last" => Ok(DedupPolicy::LastWins),
        _ => Err(format!("expected \"first\" or \"last\", got {value:?}")),
    }
}

fn parse_day_end(value: &str) -> Result<DayEndPolicy, String> {
    match value {
        "same-day" => Ok(DayEndPolicy::SameDay),
        "next-midnight" => Ok(DayEndPolicy::NextMidnight),
        _ => Err(format!("expected \"same-day\" or \"next-midnight\", got {value:?}")),
    }
}

#[derive(FromArgs, Clone)]
/// Build a multi-day XMLTV guide from the zuragt.mn schedule pages.
pub(crate) struct Args {
    /// number of days to fetch, starting today [default: 7]
    #[argh(option, short = 'd', default = "7")]
    pub(crate) days: u32,

    /// output file path [default: epg.xml]
    #[argh(option, short = 'o', default = "String::from(\"epg.xml\")")]
    pub(crate) output: String,

    /// schedule site base url [default: https://www.zuragt.mn/]
    #[argh(option, default = "String::from(\"https://www.zuragt.mn/\")")]
    pub(crate) base_url: String,

    /// language tag for display-name and title elements [default: mn]
    #[argh(option, default = "String::from(\"mn\")")]
    pub(crate) lang: String,

    /// utc offset suffix for programme times, empty to omit [default: +0800]
    #[argh(option, default = "String::from(\"+0800\")")]
    pub(crate) utc_offset: String,

    /// section header that is page furniture, not a channel (repeatable)
    #[argh(option)]
    pub(crate) skip_section: Vec<String>,

    /// which duplicate-start listing survives: first or last [default: first]
    #[argh(option, default = "DedupPolicy::FirstWins", from_str_fn(parse_dedup))]
    pub(crate) dedup: DedupPolicy,

    /// stop time for a day's last programme: same-day or next-midnight
    /// [default: same-day]
    #[argh(option, default = "DayEndPolicy::SameDay", from_str_fn(parse_day_end))]
    pub(crate) day_end: DayEndPolicy,

    /// http request timeout in seconds [default: 10]
    #[argh(option, default = "10")]
    pub(crate) timeout: u64,

    /// fetch attempts per day before skipping it [default: 3]
    #[argh(option, default = "3")]
    pub(crate) attempts: u32,

    /// backoff step between fetch attempts in milliseconds [default: 500]
    #[argh(option, default = "500")]
    pub(crate) backoff_ms: u64,
}
