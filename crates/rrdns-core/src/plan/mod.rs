//! Plan loader
//!
//! Parses a bulk plan into a sequence of [`RecordIntent`]s. Two input shapes
//! are accepted:
//!
//! - **CSV**: one row per record, `IPv4`/`IPv6` semicolon-joined
//!   (commas also work)
//! - **JSON**: an array of objects (or a single object) with the same fields;
//!   `IPv4`/`IPv6` may be lists or delimited strings
//!
//! ```text
//! ZoneName,RecordName,IPv4,IPv6,TTL,ReplaceExisting,HealthProbe,ProbeType,ProbePort,ProbePath
//! contoso.com,web,10.0.1.10;10.0.1.11,,300,true,true,HTTP,8080,/healthz
//! ```
//!
//! Every row goes through one typed parsing step: values are parsed
//! strictly, and a malformed value fails the whole load with an error naming
//! the row and field. Global [`PlanOverrides`] win over row values, which win
//! over the built-in defaults.

use serde::Deserialize;
use std::collections::{BTreeSet, HashSet};
use std::net::IpAddr;
use std::path::Path;
use std::str::FromStr;
use tracing::{debug, info, warn};

use crate::config::PlanOverrides;
use crate::error::{Error, Result};
use crate::record::{ProbeConfig, ProbeType, RecordFamily, RecordIntent, DEFAULT_TTL};
use crate::traits::ZoneBackend;

/// Input shape of a plan
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlanFormat {
    /// Tabular, header row required
    Csv,
    /// Structured document
    Json,
}

impl PlanFormat {
    /// Pick the format from a file extension
    pub fn from_path(path: &Path) -> Result<Self> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase);
        match ext.as_deref() {
            Some("csv") => Ok(PlanFormat::Csv),
            Some("json") => Ok(PlanFormat::Json),
            _ => Err(Error::config(format!(
                "Cannot infer plan format from {}; use a .csv or .json file or pass the format explicitly",
                path.display()
            ))),
        }
    }
}

impl FromStr for PlanFormat {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "csv" => Ok(PlanFormat::Csv),
            "json" => Ok(PlanFormat::Json),
            other => Err(Error::config(format!(
                "Unknown plan format '{other}' (expected csv or json)"
            ))),
        }
    }
}

/// A raw field value before typed parsing
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum FieldValue {
    Bool(bool),
    Number(serde_json::Number),
    Text(String),
    List(Vec<String>),
}

/// One plan row as read, before typing
#[derive(Debug, Clone, Default, Deserialize)]
struct PlanRow {
    #[serde(rename = "ZoneName", alias = "zone_name", alias = "zone", default)]
    zone_name: Option<FieldValue>,
    #[serde(rename = "RecordName", alias = "record_name", alias = "name", default)]
    record_name: Option<FieldValue>,
    #[serde(rename = "IPv4", alias = "ipv4", default)]
    ipv4: Option<FieldValue>,
    #[serde(rename = "IPv6", alias = "ipv6", default)]
    ipv6: Option<FieldValue>,
    #[serde(rename = "TTL", alias = "ttl", default)]
    ttl: Option<FieldValue>,
    #[serde(rename = "ReplaceExisting", alias = "replace_existing", default)]
    replace_existing: Option<FieldValue>,
    #[serde(rename = "HealthProbe", alias = "health_probe", default)]
    health_probe: Option<FieldValue>,
    #[serde(rename = "ProbeType", alias = "probe_type", default)]
    probe_type: Option<FieldValue>,
    #[serde(rename = "ProbePort", alias = "probe_port", default)]
    probe_port: Option<FieldValue>,
    #[serde(rename = "ProbePath", alias = "probe_path", default)]
    probe_path: Option<FieldValue>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum JsonPlan {
    Many(Vec<PlanRow>),
    One(Box<PlanRow>),
}

impl PlanRow {
    /// Build a row from a CSV record, matching headers case-insensitively
    fn from_csv(headers: &csv::StringRecord, record: &csv::StringRecord) -> Self {
        let mut row = PlanRow::default();
        for (header, value) in headers.iter().zip(record.iter()) {
            let value = value.trim();
            if value.is_empty() {
                continue;
            }
            let value = Some(FieldValue::Text(value.to_string()));
            match header.trim().to_ascii_lowercase().as_str() {
                "zonename" | "zone_name" | "zone" => row.zone_name = value,
                "recordname" | "record_name" | "name" => row.record_name = value,
                "ipv4" => row.ipv4 = value,
                "ipv6" => row.ipv6 = value,
                "ttl" => row.ttl = value,
                "replaceexisting" | "replace_existing" => row.replace_existing = value,
                "healthprobe" | "health_probe" => row.health_probe = value,
                "probetype" | "probe_type" => row.probe_type = value,
                "probeport" | "probe_port" => row.probe_port = value,
                "probepath" | "probe_path" => row.probe_path = value,
                other => debug!("Ignoring unknown plan column '{}'", other),
            }
        }
        row
    }

    /// Typed parsing and override merge
    fn into_intent(self, row: usize, overrides: &PlanOverrides) -> Result<RecordIntent> {
        let zone = text(row, "ZoneName", self.zone_name)?
            .ok_or_else(|| Error::plan(row, "ZoneName is required"))?;
        let name = text(row, "RecordName", self.record_name)?
            .ok_or_else(|| Error::plan(row, "RecordName is required"))?;

        let desired_v4 = addresses(row, "IPv4", self.ipv4, RecordFamily::A)?;
        let desired_v6 = addresses(row, "IPv6", self.ipv6, RecordFamily::Aaaa)?;

        let ttl = number::<u32>(row, "TTL", self.ttl)?;
        let replace_existing = boolean(row, "ReplaceExisting", self.replace_existing)?;
        let health_probe = boolean(row, "HealthProbe", self.health_probe)?;
        let probe_type = text(row, "ProbeType", self.probe_type)?
            .map(|s| ProbeType::from_str(&s).map_err(|e| Error::plan(row, e.to_string())))
            .transpose()?;
        let probe_port = number::<u16>(row, "ProbePort", self.probe_port)?;
        if probe_port == Some(0) {
            return Err(Error::plan(row, "ProbePort must be between 1 and 65535. Got: 0"));
        }
        let probe_path = text(row, "ProbePath", self.probe_path)?;

        let mut intent = RecordIntent::new(&zone, &name);
        intent.desired_v4 = desired_v4;
        intent.desired_v6 = desired_v6;
        intent.ttl = overrides.ttl.or(ttl).unwrap_or(DEFAULT_TTL);
        intent.replace_existing = overrides
            .replace_existing
            .or(replace_existing)
            .unwrap_or(false);
        intent.probe = ProbeConfig {
            enabled: overrides.health_probe.or(health_probe).unwrap_or(false),
            probe_type: overrides.probe_type.or(probe_type).unwrap_or_default(),
            port: overrides.probe_port.or(probe_port),
            path: overrides
                .probe_path
                .clone()
                .or(probe_path)
                .unwrap_or_else(|| "/".to_string()),
        };

        intent.validate().map_err(|e| match e {
            Error::InvalidInput(message) => Error::plan(row, message),
            other => other,
        })?;

        Ok(intent)
    }
}

fn text(row: usize, field: &str, value: Option<FieldValue>) -> Result<Option<String>> {
    match value {
        None => Ok(None),
        Some(FieldValue::Text(s)) => {
            let s = s.trim();
            Ok((!s.is_empty()).then(|| s.to_string()))
        }
        Some(FieldValue::Number(n)) => Ok(Some(n.to_string())),
        Some(FieldValue::Bool(b)) => Ok(Some(b.to_string())),
        Some(FieldValue::List(_)) => Err(Error::plan(row, format!("{field} must be a single value"))),
    }
}

fn boolean(row: usize, field: &str, value: Option<FieldValue>) -> Result<Option<bool>> {
    match value {
        None => Ok(None),
        Some(FieldValue::Bool(b)) => Ok(Some(b)),
        Some(FieldValue::Number(n)) => match n.as_u64() {
            Some(0) => Ok(Some(false)),
            Some(1) => Ok(Some(true)),
            _ => Err(Error::plan(row, format!("{field} must be a boolean. Got: {n}"))),
        },
        Some(FieldValue::Text(s)) => {
            let s = s.trim();
            if s.is_empty() {
                return Ok(None);
            }
            parse_bool(s)
                .map(Some)
                .ok_or_else(|| Error::plan(row, format!("{field} must be a boolean. Got: '{s}'")))
        }
        Some(FieldValue::List(_)) => Err(Error::plan(row, format!("{field} must be a boolean"))),
    }
}

fn number<T>(row: usize, field: &str, value: Option<FieldValue>) -> Result<Option<T>>
where
    T: FromStr,
{
    let raw = match value {
        None => return Ok(None),
        Some(FieldValue::Number(n)) => n.to_string(),
        Some(FieldValue::Text(s)) if s.trim().is_empty() => return Ok(None),
        Some(FieldValue::Text(s)) => s.trim().to_string(),
        Some(FieldValue::Bool(_)) | Some(FieldValue::List(_)) => {
            return Err(Error::plan(row, format!("{field} must be a number")));
        }
    };

    raw.parse::<T>()
        .map(Some)
        .map_err(|_| Error::plan(row, format!("{field} must be a non-negative integer in range. Got: '{raw}'")))
}

fn addresses(
    row: usize,
    field: &str,
    value: Option<FieldValue>,
    family: RecordFamily,
) -> Result<BTreeSet<IpAddr>> {
    let items: Vec<String> = match value {
        None => Vec::new(),
        Some(FieldValue::List(items)) => items,
        Some(FieldValue::Text(s)) => split_addresses(&s),
        Some(FieldValue::Number(_)) | Some(FieldValue::Bool(_)) => {
            return Err(Error::plan(row, format!("{field} must be a list or a delimited string")));
        }
    };

    let mut set = BTreeSet::new();
    for item in items {
        let item = item.trim();
        if item.is_empty() {
            continue;
        }
        let address: IpAddr = item
            .parse()
            .map_err(|_| Error::plan(row, format!("{field} contains an invalid address: '{item}'")))?;
        if !family.matches(&address) {
            return Err(Error::plan(
                row,
                format!("{field} contains {address}, which is not an {family} address"),
            ));
        }
        set.insert(address);
    }
    Ok(set)
}

/// Split a delimited address list (`;` or `,`)
pub fn split_addresses(s: &str) -> Vec<String> {
    s.split([';', ','])
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Parse a boolean the way plan files and flags spell it
pub fn parse_bool(s: &str) -> Option<bool> {
    match s.trim().to_ascii_lowercase().as_str() {
        "true" | "yes" | "y" | "1" => Some(true),
        "false" | "no" | "n" | "0" => Some(false),
        _ => None,
    }
}

/// Parse a CSV plan
pub fn parse_csv<R: std::io::Read>(reader: R, overrides: &PlanOverrides) -> Result<Vec<RecordIntent>> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .flexible(true)
        .from_reader(reader);
    let headers = reader
        .headers()
        .map_err(|e| Error::config(format!("Malformed CSV plan header: {e}")))?
        .clone();

    let mut intents = Vec::new();
    for (index, record) in reader.records().enumerate() {
        let record = record.map_err(|e| Error::plan(index + 1, format!("Malformed CSV row: {e}")))?;
        if record.iter().all(|field| field.trim().is_empty()) {
            continue;
        }
        intents.push(PlanRow::from_csv(&headers, &record).into_intent(index + 1, overrides)?);
    }
    finish(intents)
}

/// Parse a JSON plan (array of objects or a single object)
pub fn parse_json(input: &str, overrides: &PlanOverrides) -> Result<Vec<RecordIntent>> {
    let plan = serde_json::from_str::<JsonPlan>(input)
        .map_err(|e| Error::config(format!("Malformed JSON plan: {e}")))?;
    let rows = match plan {
        JsonPlan::Many(rows) => rows,
        JsonPlan::One(row) => vec![*row],
    };

    let intents = rows
        .into_iter()
        .enumerate()
        .map(|(index, row)| row.into_intent(index + 1, overrides))
        .collect::<Result<Vec<_>>>()?;
    finish(intents)
}

/// Parse plan text in the given format
pub fn parse_plan(input: &str, format: PlanFormat, overrides: &PlanOverrides) -> Result<Vec<RecordIntent>> {
    overrides.validate()?;
    match format {
        PlanFormat::Csv => parse_csv(input.as_bytes(), overrides),
        PlanFormat::Json => parse_json(input, overrides),
    }
}

/// Read and parse a plan file
///
/// The format is inferred from the extension unless given.
pub async fn load_plan(
    path: impl AsRef<Path>,
    format: Option<PlanFormat>,
    overrides: &PlanOverrides,
) -> Result<Vec<RecordIntent>> {
    let path = path.as_ref();
    let format = match format {
        Some(format) => format,
        None => PlanFormat::from_path(path)?,
    };

    let content = tokio::fs::read_to_string(path).await.map_err(|e| {
        Error::config(format!("Failed to read plan file {}: {}", path.display(), e))
    })?;

    let intents = parse_plan(&content, format, overrides)?;
    info!("Loaded {} record(s) from {}", intents.len(), path.display());
    Ok(intents)
}

fn finish(intents: Vec<RecordIntent>) -> Result<Vec<RecordIntent>> {
    if intents.is_empty() {
        return Err(Error::config("Plan contains no records"));
    }

    let mut seen = HashSet::new();
    for intent in &intents {
        if !seen.insert((intent.zone.clone(), intent.name.to_ascii_lowercase())) {
            warn!("Plan lists {} more than once; entries are applied in order", intent.fqdn());
        }
    }

    Ok(intents)
}

/// Check that every zone referenced by the plan exists on the backend
///
/// Each distinct zone is checked once, up front. The first absent zone fails
/// the whole plan with [`Error::ZoneNotFound`].
pub async fn verify_zones(intents: &[RecordIntent], backend: &dyn ZoneBackend) -> Result<()> {
    let zones: BTreeSet<&str> = intents.iter().map(|i| i.zone.as_str()).collect();

    for zone in zones {
        if !backend.zone_exists(zone).await? {
            return Err(Error::zone_not_found(zone));
        }
        debug!("Zone {} found on {}", zone, backend.backend_name());
    }

    Ok(())
}
