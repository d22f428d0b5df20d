//! Post-hoc quality control over the emitted artifact. Works from the XML
//! text alone, never from pipeline state, so it doubles as a round-trip
//! check on the serializer. Purely diagnostic; findings are counted, never
//! acted on.

use std::collections::BTreeMap;
use std::io::Cursor;

use anyhow::{anyhow, Result};
use chrono::{NaiveDate, NaiveDateTime};
use xml::{reader::XmlEvent as XmlReadEvent, EventReader};

use crate::xmltv::TIME_FORMAT;

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ParsedProgramme {
    pub(crate) start: NaiveDateTime,
    pub(crate) stop: NaiveDateTime,
    pub(crate) title: String,
}

#[derive(Debug, Default, PartialEq, Eq)]
pub(crate) struct ParsedGuide {
    pub(crate) channels: Vec<(String, String)>,
    pub(crate) programmes: BTreeMap<String, Vec<ParsedProgramme>>,
}

fn parse_time(value: &str) -> Result<NaiveDateTime> {
    // tolerate the optional " +HHMM" suffix
    let bare = value.split_whitespace().next().unwrap_or(value);
    NaiveDateTime::parse_from_str(bare, TIME_FORMAT)
        .map_err(|e| anyhow!("bad time attribute {value:?}: {e}"))
}

/// Re-reads an XMLTV document into channels (id, display name) and
/// per-channel programme triples.
pub(crate) fn parse_guide(xml_text: &str) -> Result<ParsedGuide> {
    let parser = EventReader::new(Cursor::new(xml_text));
    let mut guide = ParsedGuide::default();
    let mut channel_id = None;
    let mut programme = None;
    let mut in_display_name = false;
    let mut in_title = false;
    let mut text = String::new();
    for event in parser {
        match event? {
            XmlReadEvent::StartElement { name, attributes, .. } => {
                let attr = |key: &str| {
                    attributes
                        .iter()
                        .find(|a| a.name.local_name == key)
                        .map(|a| a.value.clone())
                };
                match name.local_name.as_str() {
                    "channel" => channel_id = attr("id"),
                    "display-name" => {
                        in_display_name = true;
                        text.clear();
                    }
                    "programme" => {
                        let channel = attr("channel")
                            .ok_or_else(|| anyhow!("programme without channel attribute"))?;
                        let start = attr("start")
                            .ok_or_else(|| anyhow!("programme without start attribute"))?;
                        let stop = attr("stop")
                            .ok_or_else(|| anyhow!("programme without stop attribute"))?;
                        programme = Some((channel, parse_time(&start)?, parse_time(&stop)?));
                    }
                    "title" => {
                        in_title = true;
                        text.clear();
                    }
                    _ => {}
                }
            }
            XmlReadEvent::Characters(content) => {
                if in_display_name || in_title {
                    text.push_str(&content);
                }
            }
            XmlReadEvent::EndElement { name } => match name.local_name.as_str() {
                "display-name" => {
                    in_display_name = false;
                    if let Some(id) = channel_id.take() {
                        guide.channels.push((id, text.clone()));
                    }
                }
                "title" => in_title = false,
                "programme" => {
                    if let Some((channel, start, stop)) = programme.take() {
                        guide.programmes.entry(channel).or_default().push(ParsedProgramme {
                            start,
                            stop,
                            title: text.clone(),
                        });
                    }
                }
                _ => {}
            },
            _ => {}
        }
    }
    Ok(guide)
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub(crate) struct IntervalCounts {
    pub(crate) invalid: usize,
    pub(crate) overlaps: usize,
    pub(crate) gaps: usize,
}

impl IntervalCounts {
    pub(crate) fn is_clean(&self) -> bool {
        self.invalid == 0 && self.overlaps == 0 && self.gaps == 0
    }

    fn absorb(&mut self, other: IntervalCounts) {
        self.invalid += other.invalid;
        self.overlaps += other.overlaps;
        self.gaps += other.gaps;
    }
}

#[derive(Debug, Default, PartialEq, Eq)]
pub(crate) struct QcReport {
    pub(crate) channels: BTreeMap<String, IntervalCounts>,
    pub(crate) totals: IntervalCounts,
}

/// Re-parses the document and checks each channel's timeline, sorted by
/// start: negative durations, and overlaps/gaps within a calendar day.
/// A day change resets continuity, so the jump across midnight (or the
/// one-second hole the same-day boundary policy leaves) is never flagged.
pub(crate) fn validate(xml_text: &str) -> Result<QcReport> {
    let guide = parse_guide(xml_text)?;
    let mut report = QcReport::default();
    for (channel, mut programmes) in guide.programmes {
        programmes.sort_by_key(|p| p.start);
        let counts = check_intervals(&programmes);
        report.totals.absorb(counts);
        report.channels.insert(channel, counts);
    }
    Ok(report)
}

fn check_intervals(programmes: &[ParsedProgramme]) -> IntervalCounts {
    let mut counts = IntervalCounts::default();
    let mut last: Option<(NaiveDate, NaiveDateTime)> = None;
    for p in programmes {
        if p.stop < p.start {
            counts.invalid += 1;
        }
        let day = p.start.date();
        if let Some((last_day, last_stop)) = last {
            if day == last_day {
                if p.start < last_stop {
                    counts.overlaps += 1;
                } else if p.start > last_stop {
                    counts.gaps += 1;
                }
            }
        }
        last = Some((day, p.stop));
    }
    counts
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::ChannelSection;
    use crate::schedule::{build_day, BuildConfig, ScheduleStore};
    use crate::xmltv::{write_guide, GuideMeta};

    fn programme(start: &str, stop: &str) -> String {
        format!(
            r#"<programme start="{start}" stop="{stop}" channel="ch"><title lang="mn">x</title></programme>"#
        )
    }

    fn document(programmes: &[String]) -> String {
        format!(
            r#"<?xml version="1.0" encoding="utf-8"?>
<tv date="20240101060000"><channel id="ch"><display-name lang="mn">Ch</display-name></channel>{}</tv>"#,
            programmes.join("")
        )
    }

    #[test]
    fn continuous_day_is_clean() {
        let doc = document(&[
            programme("20240101090000 +0800", "20240101103000 +0800"),
            programme("20240101103000 +0800", "20240101235959 +0800"),
        ]);
        let report = validate(&doc).unwrap();
        assert_eq!(report.totals, IntervalCounts::default());
        assert!(report.channels["ch"].is_clean());
    }

    #[test]
    fn detects_overlap_gap_and_invalid() {
        let doc = document(&[
            programme("20240101090000", "20240101100000"),
            // starts before the previous stop
            programme("20240101095000", "20240101103000"),
            // starts after the previous stop, and runs backwards
            programme("20240101110000", "20240101104500"),
        ]);
        let report = validate(&doc).unwrap();
        assert_eq!(
            report.totals,
            IntervalCounts { invalid: 1, overlaps: 1, gaps: 1 }
        );
    }

    #[test]
    fn day_boundary_resets_continuity() {
        // 23:59:59 to next-day 08:00 crosses a calendar day: not a gap,
        // whatever the numeric distance
        let doc = document(&[
            programme("20240101220000", "20240101235959"),
            programme("20240102080000", "20240102090000"),
        ]);
        let report = validate(&doc).unwrap();
        assert_eq!(report.totals, IntervalCounts::default());
    }

    #[test]
    fn zero_duration_is_not_invalid() {
        let doc = document(&[
            programme("20240101090000", "20240101090000"),
            programme("20240101090000", "20240101100000"),
        ]);
        let report = validate(&doc).unwrap();
        assert_eq!(report.totals.invalid, 0);
        assert_eq!(report.totals.overlaps, 0);
        assert_eq!(report.totals.gaps, 0);
    }

    #[test]
    fn round_trips_the_serializer_output() {
        let mut store = ScheduleStore::new();
        let day = chrono::NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let sections = [
            ChannelSection {
                name: "Спорт Суваг".to_string(),
                rows: vec![
                    ("09:00".to_string(), "News".to_string()),
                    ("10:30".to_string(), "Tom & Jerry".to_string()),
                ],
            },
            ChannelSection {
                name: "TV5".to_string(),
                rows: vec![("08:00".to_string(), "Morning".to_string())],
            },
        ];
        build_day(&mut store, day, &sections, &BuildConfig::default());

        let meta = GuideMeta {
            generated_at: day.and_hms_opt(6, 0, 0).unwrap(),
            source_url: "https://www.zuragt.mn/",
            lang: "mn",
            utc_offset: Some("+0800"),
        };
        let xml_text = write_guide(&store, &meta).unwrap();
        let guide = parse_guide(&xml_text).unwrap();

        let ids: Vec<_> = guide.channels.iter().map(|(id, _)| id.as_str()).collect();
        assert_eq!(ids, ["Спорт_Суваг", "TV5"]);
        assert_eq!(guide.channels[0].1, "Спорт Суваг");

        let expected: Vec<ParsedProgramme> = store
            .programmes_for("Спорт_Суваг")
            .map(|p| ParsedProgramme { start: p.start, stop: p.stop, title: p.title.clone() })
            .collect();
        assert_eq!(guide.programmes["Спорт_Суваг"], expected);
        assert_eq!(guide.programmes["TV5"].len(), 1);

        // and the artifact itself is clean
        let report = validate(&xml_text).unwrap();
        assert_eq!(report.totals, IntervalCounts::default());
    }
}
