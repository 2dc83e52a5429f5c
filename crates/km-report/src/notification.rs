//! Human-readable notifications built from a report.

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use chrono::{DateTime, Local};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use km_common::stamp;

use crate::engine::Report;
use crate::plots::Plot;
use crate::Result;

pub const SVG_CONTENT_TYPE: &str = "image/svg+xml";
pub const JSON_CONTENT_TYPE: &str = "application/json";

/// A file attached to a notification. Serialized with a base64 payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attachment {
    pub filename: String,
    pub content_type: String,
    #[serde(serialize_with = "to_base64", deserialize_with = "from_base64")]
    pub data: Vec<u8>,
}

impl Attachment {
    pub fn new(filename: impl Into<String>, content_type: impl Into<String>, data: Vec<u8>) -> Self {
        Self {
            filename: filename.into(),
            content_type: content_type.into(),
            data,
        }
    }
}

impl From<&Plot> for Attachment {
    fn from(plot: &Plot) -> Self {
        Attachment::new(plot.filename(), SVG_CONTENT_TYPE, plot.svg.clone().into_bytes())
    }
}

fn to_base64<S: Serializer>(data: &[u8], serializer: S) -> std::result::Result<S::Ok, S::Error> {
    serializer.serialize_str(&STANDARD.encode(data))
}

fn from_base64<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Vec<u8>, D::Error> {
    let s = String::deserialize(deserializer)?;
    STANDARD.decode(s).map_err(serde::de::Error::custom)
}

/// One message to a set of recipients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub subject: String,
    pub from: String,
    pub to: Vec<String>,
    pub body: String,
    #[serde(default)]
    pub attachments: Vec<Attachment>,
}

impl Notification {
    /// End-of-run report: statistics in the body, plots then the raw record attached.
    pub fn report(
        started_at: &DateTime<Local>,
        from: &str,
        to: &[String],
        report: &Report,
        plots: &[Plot],
        record: Attachment,
    ) -> Self {
        let mut attachments: Vec<Attachment> = plots.iter().map(Attachment::from).collect();
        attachments.push(record);
        Self {
            subject: format!("[kiln report] {}", stamp::display_stamp(started_at)),
            from: from.to_string(),
            to: to.to_vec(),
            body: report_body(report),
            attachments,
        }
    }

    /// Short "run started" message pointing at the live monitor.
    pub fn run_started(
        started_at: &DateTime<Local>,
        from: &str,
        to: &[String],
        profile_name: &str,
        url: &str,
    ) -> Self {
        Self {
            subject: format!("[kiln start] {}", stamp::display_stamp(started_at)),
            from: from.to_string(),
            to: to.to_vec(),
            body: format!("Firing of profile {profile_name} started, monitor reachable at {url}"),
            attachments: Vec::new(),
        }
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Plain-text body with the three headline statistics, two decimals each.
pub fn report_body(report: &Report) -> String {
    format!(
        "Raw peak temperature = {:.2}\nSmoothed peak temperature = {:.2}\nFire duration = {:.2} hours\n",
        report.max_temperature_raw, report.max_temperature_smoothed, report.fire_duration_hours
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::DerivedSeries;
    use crate::plots::PlotKind;
    use chrono::TimeZone;
    use km_common::AnalysisSettings;
    use km_math::Series;

    fn report() -> Report {
        let s = Series::new(vec![0.0, 1.0], vec![500.0, 950.0]).unwrap();
        Report {
            max_temperature_raw: 950.0,
            max_temperature_smoothed: 907.123,
            fire_duration_hours: 4.0,
            settings: AnalysisSettings::default(),
            full_series: DerivedSeries {
                raw: s.clone(),
                smoothed: s.clone(),
                derivative: s,
            },
            peak_window_series: None,
        }
    }

    fn started() -> DateTime<Local> {
        Local.with_ymd_and_hms(2024, 3, 5, 14, 7, 42).unwrap()
    }

    #[test]
    fn body_rounds_to_two_decimals() {
        assert_eq!(
            report_body(&report()),
            "Raw peak temperature = 950.00\nSmoothed peak temperature = 907.12\nFire duration = 4.00 hours\n"
        );
    }

    #[test]
    fn report_subject_and_attachment_order() {
        let plots = vec![
            Plot {
                kind: PlotKind::Temperature,
                svg: "<svg/>".into(),
            },
            Plot {
                kind: PlotKind::TemperatureRamp,
                svg: "<svg/>".into(),
            },
        ];
        let record = Attachment::new("2024_03_05-14_07.json", JSON_CONTENT_TYPE, b"{}".to_vec());
        let to = vec!["a@example.org".to_string()];
        let n = Notification::report(&started(), "Kiln Monitor", &to, &report(), &plots, record);
        assert_eq!(n.subject, "[kiln report] 2024/03/05 14:07");
        let names: Vec<_> = n.attachments.iter().map(|a| a.filename.as_str()).collect();
        assert_eq!(
            names,
            vec!["1_temperature.svg", "2_temperature_ramp.svg", "2024_03_05-14_07.json"]
        );
        assert_eq!(n.attachments[0].content_type, SVG_CONTENT_TYPE);
    }

    #[test]
    fn start_message_format() {
        let to = vec!["a@example.org".to_string()];
        let n = Notification::run_started(&started(), "Kiln Monitor", &to, "cone-6", "https://kiln.example.net");
        assert_eq!(n.subject, "[kiln start] 2024/03/05 14:07");
        assert_eq!(
            n.body,
            "Firing of profile cone-6 started, monitor reachable at https://kiln.example.net"
        );
        assert!(n.attachments.is_empty());
    }

    #[test]
    fn attachments_serialize_as_base64() {
        let a = Attachment::new("x.bin", "application/octet-stream", vec![0, 1, 2, 250]);
        let json = serde_json::to_value(&a).unwrap();
        assert_eq!(json["data"], "AAEC+g==");
        let back: Attachment = serde_json::from_value(json).unwrap();
        assert_eq!(back, a);
    }
}
