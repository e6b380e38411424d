//! Run reporter
//!
//! Aggregates a [`PlanRun`] into a [`Report`]: one row per record sorted by
//! zone then name, per-family totals, and every failure and probe rejection
//! enumerated by address and reason. Aggregation is pure; renderers turn the
//! report into a text table, JSON, or CSV.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeSet;
use std::fmt::Write as _;
use std::net::IpAddr;
use std::str::FromStr;

use crate::error::{Error, Result};
use crate::outcome::{PlanRun, ReconciliationOutcome};
use crate::record::fqdn;

/// Report rendering
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OutputFormat {
    /// Fixed-width text table
    #[default]
    Table,
    /// Pretty JSON document
    Json,
    /// One CSV row per record
    Csv,
}

impl FromStr for OutputFormat {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "table" => Ok(OutputFormat::Table),
            "json" => Ok(OutputFormat::Json),
            "csv" => Ok(OutputFormat::Csv),
            other => Err(Error::config(format!(
                "Unknown output format '{other}' (expected table, json or csv)"
            ))),
        }
    }
}

/// Per-record status in a report
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum RowStatus {
    /// Nothing to change
    Unchanged,
    /// Changes applied
    Changed,
    /// Dry run with pending changes
    WouldChange,
    /// Some add/remove operations failed
    Partial,
    /// The record could not be reconciled
    Failed,
}

impl RowStatus {
    fn as_str(&self) -> &'static str {
        match self {
            RowStatus::Unchanged => "unchanged",
            RowStatus::Changed => "changed",
            RowStatus::WouldChange => "would-change",
            RowStatus::Partial => "partial",
            RowStatus::Failed => "failed",
        }
    }
}

/// One record in the report
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReportRow {
    pub zone: String,
    pub name: String,
    pub ttl: Option<u32>,
    pub status: RowStatus,
    pub added4: Vec<IpAddr>,
    pub kept4: Vec<IpAddr>,
    pub removed4: Vec<IpAddr>,
    pub final4: Option<Vec<IpAddr>>,
    pub added6: Vec<IpAddr>,
    pub kept6: Vec<IpAddr>,
    pub removed6: Vec<IpAddr>,
    pub final6: Option<Vec<IpAddr>>,
    pub rejected: usize,
    pub failed: usize,
}

/// Counts across the whole run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReportTotals {
    pub records: usize,
    pub added4: usize,
    pub kept4: usize,
    pub removed4: usize,
    pub added6: usize,
    pub kept6: usize,
    pub removed6: usize,
    pub rejected: usize,
    pub address_failures: usize,
    pub record_failures: usize,
}

/// A failure, enumerated by address (when there is one) and reason
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailureLine {
    pub record: String,
    pub address: Option<IpAddr>,
    pub reason: String,
}

/// Summary of a run
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Report {
    pub generated_at: DateTime<Utc>,
    pub dry_run: bool,
    pub halted: bool,
    pub not_processed: usize,
    pub rows: Vec<ReportRow>,
    pub totals: ReportTotals,
    pub failures: Vec<FailureLine>,
    pub rejections: Vec<FailureLine>,
}

fn list(set: &BTreeSet<IpAddr>) -> Vec<IpAddr> {
    set.iter().copied().collect()
}

fn row_for(outcome: &ReconciliationOutcome) -> ReportRow {
    let status = if outcome.has_failures() {
        RowStatus::Partial
    } else if outcome.change_count() == 0 {
        RowStatus::Unchanged
    } else if outcome.dry_run {
        RowStatus::WouldChange
    } else {
        RowStatus::Changed
    };

    ReportRow {
        zone: outcome.zone.clone(),
        name: outcome.name.clone(),
        ttl: Some(outcome.ttl),
        status,
        added4: list(outcome.added4()),
        kept4: list(outcome.kept4()),
        removed4: list(outcome.removed4()),
        final4: outcome.final4().map(list),
        added6: list(outcome.added6()),
        kept6: list(outcome.kept6()),
        removed6: list(outcome.removed6()),
        final6: outcome.final6().map(list),
        rejected: outcome.rejections().count(),
        failed: outcome.failures().count() + outcome.family_errors().count(),
    }
}

/// Summarize a run, stamped with the current time
pub fn summarize(run: &PlanRun) -> Report {
    summarize_at(run, Utc::now())
}

/// Summarize a run with an explicit timestamp
pub fn summarize_at(run: &PlanRun, generated_at: DateTime<Utc>) -> Report {
    let mut rows: Vec<ReportRow> = run.outcomes.iter().map(row_for).collect();
    rows.extend(run.failures.iter().map(|failure| ReportRow {
        zone: failure.zone.clone(),
        name: failure.name.clone(),
        ttl: None,
        status: RowStatus::Failed,
        added4: Vec::new(),
        kept4: Vec::new(),
        removed4: Vec::new(),
        final4: None,
        added6: Vec::new(),
        kept6: Vec::new(),
        removed6: Vec::new(),
        final6: None,
        rejected: 0,
        failed: 0,
    }));
    rows.sort_by(|a, b| (&a.zone, &a.name).cmp(&(&b.zone, &b.name)));

    let mut totals = ReportTotals {
        records: rows.len(),
        record_failures: run.failures.len(),
        ..ReportTotals::default()
    };
    for row in &rows {
        totals.added4 += row.added4.len();
        totals.kept4 += row.kept4.len();
        totals.removed4 += row.removed4.len();
        totals.added6 += row.added6.len();
        totals.kept6 += row.kept6.len();
        totals.removed6 += row.removed6.len();
        totals.rejected += row.rejected;
        totals.address_failures += row.failed;
    }

    let mut outcomes: Vec<&ReconciliationOutcome> = run.outcomes.iter().collect();
    outcomes.sort_by(|a, b| (&a.zone, &a.name).cmp(&(&b.zone, &b.name)));

    let mut failures = Vec::new();
    let mut rejections = Vec::new();
    for outcome in &outcomes {
        for failure in outcome.failures() {
            failures.push(FailureLine {
                record: outcome.fqdn(),
                address: Some(failure.address),
                reason: format!("{} {} failed: {}", failure.family, failure.operation, failure.error),
            });
        }
        for (family, error) in outcome.family_errors() {
            failures.push(FailureLine {
                record: outcome.fqdn(),
                address: None,
                reason: format!("{family} not completed: {error}"),
            });
        }
        for rejection in outcome.rejections() {
            rejections.push(FailureLine {
                record: outcome.fqdn(),
                address: Some(rejection.address),
                reason: rejection.to_string(),
            });
        }
    }
    let mut record_failures: Vec<FailureLine> = run
        .failures
        .iter()
        .map(|failure| FailureLine {
            record: fqdn(&failure.zone, &failure.name),
            address: None,
            reason: failure.error.clone(),
        })
        .collect();
    record_failures.sort_by(|a, b| a.record.cmp(&b.record));
    failures.extend(record_failures);

    Report {
        generated_at,
        dry_run: run.dry_run,
        halted: run.halted,
        not_processed: run.not_processed,
        rows,
        totals,
        failures,
        rejections,
    }
}

fn join(addresses: &[IpAddr], sep: &str) -> String {
    addresses
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(sep)
}

fn join_final(addresses: &Option<Vec<IpAddr>>, sep: &str) -> String {
    match addresses {
        Some(addresses) => join(addresses, sep),
        None => "-".to_string(),
    }
}

impl Report {
    /// Render in the requested format
    pub fn render(&self, format: OutputFormat) -> Result<String> {
        match format {
            OutputFormat::Table => Ok(self.to_table()),
            OutputFormat::Json => self.to_json(),
            OutputFormat::Csv => self.to_csv(),
        }
    }

    /// Pretty JSON
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// One CSV row per record; address lists are semicolon-joined
    pub fn to_csv(&self) -> Result<String> {
        let mut writer = csv::Writer::from_writer(Vec::new());
        writer.write_record([
            "ZoneName", "RecordName", "TTL", "Status", "Added4", "Kept4", "Removed4", "Final4",
            "Added6", "Kept6", "Removed6", "Final6", "Rejected", "Failed",
        ])?;
        for row in &self.rows {
            writer.write_record([
                row.zone.clone(),
                row.name.clone(),
                row.ttl.map(|t| t.to_string()).unwrap_or_default(),
                row.status.as_str().to_string(),
                join(&row.added4, ";"),
                join(&row.kept4, ";"),
                join(&row.removed4, ";"),
                row.final4.as_deref().map(|a| join(a, ";")).unwrap_or_default(),
                join(&row.added6, ";"),
                join(&row.kept6, ";"),
                join(&row.removed6, ";"),
                row.final6.as_deref().map(|a| join(a, ";")).unwrap_or_default(),
                row.rejected.to_string(),
                row.failed.to_string(),
            ])?;
        }
        let bytes = writer
            .into_inner()
            .map_err(|e| Error::Other(format!("Failed to flush CSV report: {e}")))?;
        String::from_utf8(bytes).map_err(|e| Error::Other(format!("CSV report is not UTF-8: {e}")))
    }

    /// Fixed-width text table followed by totals and enumerated problems
    pub fn to_table(&self) -> String {
        let header = [
            "ZONE", "NAME", "TTL", "STATUS", "+A", "=A", "-A", "FINAL A", "+AAAA", "=AAAA",
            "-AAAA", "FINAL AAAA",
        ];
        let cells: Vec<[String; 12]> = self
            .rows
            .iter()
            .map(|row| {
                [
                    row.zone.clone(),
                    row.name.clone(),
                    row.ttl.map(|t| t.to_string()).unwrap_or_else(|| "-".to_string()),
                    row.status.as_str().to_string(),
                    join(&row.added4, ","),
                    join(&row.kept4, ","),
                    join(&row.removed4, ","),
                    join_final(&row.final4, ","),
                    join(&row.added6, ","),
                    join(&row.kept6, ","),
                    join(&row.removed6, ","),
                    join_final(&row.final6, ","),
                ]
            })
            .collect();

        let mut widths: Vec<usize> = header.iter().map(|h| h.len()).collect();
        for row in &cells {
            for (width, cell) in widths.iter_mut().zip(row.iter()) {
                *width = (*width).max(cell.len());
            }
        }

        let mut out = String::new();
        let line = |out: &mut String, values: &mut dyn Iterator<Item = &str>| {
            let rendered: Vec<String> = values
                .zip(widths.iter())
                .map(|(value, width)| format!("{value:<width$}"))
                .collect();
            let _ = writeln!(out, "{}", rendered.join("  ").trim_end());
        };

        line(&mut out, &mut header.iter().copied());
        for row in &cells {
            line(&mut out, &mut row.iter().map(String::as_str));
        }

        let t = &self.totals;
        let _ = writeln!(
            out,
            "\n{} record(s){}: A +{} ={} -{}, AAAA +{} ={} -{}, {} rejected, {} address failure(s), {} record failure(s)",
            t.records,
            if self.dry_run { " [dry run]" } else { "" },
            t.added4,
            t.kept4,
            t.removed4,
            t.added6,
            t.kept6,
            t.removed6,
            t.rejected,
            t.address_failures,
            t.record_failures
        );
        if self.halted {
            let _ = writeln!(out, "Halted on error; {} record(s) not processed", self.not_processed);
        }

        if !self.failures.is_empty() {
            let _ = writeln!(out, "\nFailures:");
            for failure in &self.failures {
                match failure.address {
                    Some(address) => {
                        let _ = writeln!(out, "  {} {}: {}", failure.record, address, failure.reason);
                    }
                    None => {
                        let _ = writeln!(out, "  {}: {}", failure.record, failure.reason);
                    }
                }
            }
        }

        if !self.rejections.is_empty() {
            let _ = writeln!(out, "\nExcluded by health probe:");
            for rejection in &self.rejections {
                let _ = writeln!(out, "  {}: {}", rejection.record, rejection.reason);
            }
        }

        out
    }
}
