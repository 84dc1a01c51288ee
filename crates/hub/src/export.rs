//! Spreadsheet export: history rows and a statistics summary as CSV.

use std::io;
use time::macros::format_description;
use time::OffsetDateTime;

use crate::feed::SwitchState;
use crate::history::Record;
use crate::stats::{CategoryCount, MetricSummary, Summary, SwitchSummary};

const RECORD_HEADER: [&str; 10] = [
    "No",
    "Time",
    "Temperature (°C)",
    "Humidity (%)",
    "Light (Lux)",
    "Pump",
    "Misting",
    "Shading",
    "LED",
    "Mode",
];

const SUMMARY_HEADER: [&str; 4] = ["Section", "Label", "Value", "Percent"];

/// One row per record, numbered from 1 in the order given.
pub fn write_records<W: io::Write>(writer: W, records: &[Record]) -> Result<(), csv::Error> {
    let mut wtr = csv::Writer::from_writer(writer);
    wtr.write_record(RECORD_HEADER)?;

    for (i, r) in records.iter().enumerate() {
        let s = &r.snapshot;
        wtr.write_record([
            (i + 1).to_string(),
            r.time.clone(),
            format!("{:.1}", s.temperature),
            format!("{:.1}", s.humidity),
            format!("{:.0}", s.light),
            upper(s.pump_status),
            upper(s.misting_status),
            upper(s.shading_status),
            upper(s.led_status),
            s.mode.as_str().to_uppercase(),
        ])?;
    }

    wtr.flush()?;
    Ok(())
}

/// Summary sheet in `Section, Label, Value, Percent` rows.
pub fn write_summary<W: io::Write>(writer: W, summary: &Summary) -> Result<(), csv::Error> {
    let mut wtr = csv::Writer::from_writer(writer);
    wtr.write_record(SUMMARY_HEADER)?;

    wtr.write_record(["Records", "Total", summary.count.to_string().as_str(), ""])?;
    if let Some(p) = &summary.period {
        wtr.write_record(["Period", "From", p.from.as_str(), ""])?;
        wtr.write_record(["Period", "To", p.to.as_str(), ""])?;
    }

    write_metric(&mut wtr, "Temperature (°C)", &summary.temperature, 1)?;
    write_metric(&mut wtr, "Humidity (%)", &summary.humidity, 1)?;
    write_metric(&mut wtr, "Light (Lux)", &summary.light, 0)?;

    write_switch(&mut wtr, "Pump", &summary.pump)?;
    write_switch(&mut wtr, "Misting", &summary.misting)?;
    write_switch(&mut wtr, "Shading", &summary.shading)?;
    write_switch(&mut wtr, "LED", &summary.led)?;

    write_count(&mut wtr, "Mode", "AUTO", &summary.mode.auto)?;
    write_count(&mut wtr, "Mode", "MANUAL", &summary.mode.manual)?;

    wtr.flush()?;
    Ok(())
}

pub fn records_csv(records: &[Record]) -> Result<Vec<u8>, csv::Error> {
    let mut buf = Vec::new();
    write_records(&mut buf, records)?;
    Ok(buf)
}

pub fn summary_csv(summary: &Summary) -> Result<Vec<u8>, csv::Error> {
    let mut buf = Vec::new();
    write_summary(&mut buf, summary)?;
    Ok(buf)
}

/// `Smart_Farming_<kind>_YYYYMMDD_HHMM.csv`
pub fn export_filename(kind: &str, now: OffsetDateTime) -> String {
    let stamp = now
        .format(format_description!("[year][month][day]_[hour][minute]"))
        .unwrap_or_else(|_| now.unix_timestamp().to_string());
    format!("Smart_Farming_{kind}_{stamp}.csv")
}

fn upper(s: SwitchState) -> String {
    s.as_str().to_uppercase()
}

fn write_metric<W: io::Write>(
    wtr: &mut csv::Writer<W>,
    section: &str,
    m: &MetricSummary,
    precision: usize,
) -> Result<(), csv::Error> {
    for (label, value) in [
        ("Current", m.current),
        ("Average", m.average),
        ("Maximum", m.max),
        ("Minimum", m.min),
    ] {
        wtr.write_record([section, label, format!("{value:.precision$}").as_str(), ""])?;
    }
    Ok(())
}

fn write_switch<W: io::Write>(
    wtr: &mut csv::Writer<W>,
    section: &str,
    s: &SwitchSummary,
) -> Result<(), csv::Error> {
    write_count(wtr, section, "ON", &s.on)?;
    write_count(wtr, section, "OFF", &s.off)
}

fn write_count<W: io::Write>(
    wtr: &mut csv::Writer<W>,
    section: &str,
    label: &str,
    c: &CategoryCount,
) -> Result<(), csv::Error> {
    wtr.write_record([
        section,
        label,
        c.count.to_string().as_str(),
        format!("{:.1}%", c.percent).as_str(),
    ])
}
