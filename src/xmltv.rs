use std::io::BufWriter;

use anyhow::Result;
use chrono::NaiveDateTime;
use xml::writer::{EmitterConfig, XmlEvent as XmlWriteEvent};

use crate::schedule::ScheduleStore;

pub(crate) const TIME_FORMAT: &str = "%Y%m%d%H%M%S";

const GENERATOR_NAME: &str = "Tugldr";
const GENERATOR_URL: &str = "https://epg.pw";
const SOURCE_NAME: &str = "FREE EPG";

/// Everything the serializer needs besides the store itself. The generation
/// timestamp is passed in rather than read from the clock so the output is a
/// pure function of its arguments.
pub(crate) struct GuideMeta<'a> {
    pub(crate) generated_at: NaiveDateTime,
    pub(crate) source_url: &'a str,
    pub(crate) lang: &'a str,
    pub(crate) utc_offset: Option<&'a str>,
}

fn stamp(t: NaiveDateTime, offset: Option<&str>) -> String {
    match offset {
        Some(suffix) => format!("{} {suffix}", t.format(TIME_FORMAT)),
        None => t.format(TIME_FORMAT).to_string(),
    }
}

/// Renders the store as indented XMLTV. Channels come out in registration
/// order, programmes in store order, attributes in fixed order, so identical
/// inputs serialize byte-identically.
pub(crate) fn write_guide(store: &ScheduleStore, meta: &GuideMeta) -> Result<String> {
    let mut buf = BufWriter::new(Vec::new());
    let mut writer = EmitterConfig::new()
        .perform_indent(true)
        .create_writer(&mut buf);
    writer.write(
        XmlWriteEvent::start_element("tv")
            .attr("date", &meta.generated_at.format(TIME_FORMAT).to_string())
            .attr("generator-info-name", GENERATOR_NAME)
            .attr("generator-info-url", GENERATOR_URL)
            .attr("source-info-name", SOURCE_NAME)
            .attr("source-info-url", meta.source_url),
    )?;
    for channel in store.channels() {
        writer.write(XmlWriteEvent::start_element("channel").attr("id", &channel.id))?;
        writer.write(XmlWriteEvent::start_element("display-name").attr("lang", meta.lang))?;
        writer.write(XmlWriteEvent::characters(&channel.display_name))?;
        writer.write(XmlWriteEvent::end_element())?;
        writer.write(XmlWriteEvent::end_element())?;
    }
    for programme in store.programmes() {
        writer.write(
            XmlWriteEvent::start_element("programme")
                .attr("start", &stamp(programme.start, meta.utc_offset))
                .attr("stop", &stamp(programme.stop, meta.utc_offset))
                .attr("channel", &programme.channel_id),
        )?;
        writer.write(XmlWriteEvent::start_element("title").attr("lang", meta.lang))?;
        writer.write(XmlWriteEvent::characters(&programme.title))?;
        writer.write(XmlWriteEvent::end_element())?;
        writer.write(XmlWriteEvent::end_element())?;
    }
    writer.write(XmlWriteEvent::end_element())?;
    Ok(String::from_utf8(buf.into_inner()?)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::ChannelSection;
    use crate::schedule::{build_day, BuildConfig};
    use chrono::NaiveDate;

    fn section(name: &str, rows: &[(&str, &str)]) -> ChannelSection {
        ChannelSection {
            name: name.to_string(),
            rows: rows
                .iter()
                .map(|&(t, p)| (t.to_string(), p.to_string()))
                .collect(),
        }
    }

    fn sample_store() -> ScheduleStore {
        let mut store = ScheduleStore::new();
        let day = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let sections = [section(
            "Спорт Суваг",
            &[("09:00", "News"), ("10:30", "Tom & Jerry")],
        )];
        build_day(&mut store, day, &sections, &BuildConfig::default());
        store
    }

    fn meta() -> GuideMeta<'static> {
        GuideMeta {
            generated_at: NaiveDate::from_ymd_opt(2024, 1, 1)
                .unwrap()
                .and_hms_opt(6, 0, 0)
                .unwrap(),
            source_url: "https://www.zuragt.mn/",
            lang: "mn",
            utc_offset: Some("+0800"),
        }
    }

    #[test]
    fn emits_prolog_and_expected_attributes() {
        let xml = write_guide(&sample_store(), &meta()).unwrap();
        assert!(xml.starts_with("<?xml version=\"1.0\""));
        assert!(xml.contains("date=\"20240101060000\""));
        assert!(xml.contains("generator-info-name=\"Tugldr\""));
        assert!(xml.contains("<channel id=\"Спорт_Суваг\">"));
        assert!(xml.contains("<display-name lang=\"mn\">Спорт Суваг</display-name>"));
        assert!(xml.contains(
            "start=\"20240101090000 +0800\" stop=\"20240101103000 +0800\" channel=\"Спорт_Суваг\""
        ));
        // xml-rs escapes text content
        assert!(xml.contains("Tom &amp; Jerry"));
    }

    #[test]
    fn offset_suffix_is_optional() {
        let meta = GuideMeta { utc_offset: None, ..meta() };
        let xml = write_guide(&sample_store(), &meta).unwrap();
        assert!(xml.contains("start=\"20240101090000\""));
        assert!(!xml.contains("+0800"));
    }

    #[test]
    fn serialization_is_deterministic() {
        let store = sample_store();
        let a = write_guide(&store, &meta()).unwrap();
        let b = write_guide(&store, &meta()).unwrap();
        assert_eq!(a, b);
    }
}
