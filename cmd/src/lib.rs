use color_eyre::eyre::{Result, WrapErr};
use model::{CowMetric, Fingerprint, LabelName, LabelValue, Metric};
use rustc_hash::FxHashMap;
use serde::Deserialize;
use std::{
    fs,
    io::{self, Read},
    path::Path,
};

/// Prometheus HTTP API response
///
/// See https://prometheus.io/docs/prometheus/latest/querying/api/
#[derive(Debug, Deserialize)]
struct Response {
    status: String,
    data: ResponseData,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ResponseData {
    result_type: String,
    result: Vec<TimeSeries>,
}

/// Only the label set is read; samples are ignored.
#[derive(Debug, Deserialize)]
struct TimeSeries {
    metric: Metric,
}

/// Reads series from `path`, or from stdin if `path` is `-`.
pub fn load_series(path: impl AsRef<Path>) -> Result<Vec<Metric>> {
    let path = path.as_ref();
    let input = if path == Path::new("-") {
        let mut buf = String::new();
        io::stdin()
            .read_to_string(&mut buf)
            .wrap_err("failed to read stdin")?;
        buf
    } else {
        fs::read_to_string(path).wrap_err_with(|| format!("{}", path.display()))?
    };
    parse_series(&input).wrap_err_with(|| format!("failed to parse {}", path.display()))
}

/// Parses either a Prometheus API response (`/api/v1/query`,
/// `/api/v1/series`-like `data.result[].metric`), a single JSON label set,
/// or JSON lines with one label set per line.
pub fn parse_series(input: &str) -> Result<Vec<Metric>> {
    if input.trim().is_empty() {
        return Ok(Vec::new());
    }
    if let Ok(value) = serde_json::from_str::<serde_json::Value>(input) {
        if value.get("data").map_or(false, serde_json::Value::is_object) {
            let resp: Response =
                serde_json::from_value(value).wrap_err("invalid Prometheus API response")?;
            tracing::debug!(
                status = %resp.status,
                result_type = %resp.data.result_type,
                series = resp.data.result.len(),
                "parsed API response"
            );
            return Ok(resp.data.result.into_iter().map(|ts| ts.metric).collect());
        }
        if value.is_object() {
            let metric = serde_json::from_value(value).wrap_err("invalid label set")?;
            return Ok(vec![metric]);
        }
    }
    input
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(i, line)| {
            serde_json::from_str::<Metric>(line)
                .wrap_err_with(|| format!("line {}: invalid label set", i + 1))
        })
        .collect()
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum FingerprintKind {
    #[default]
    Strong,
    Fast,
}

impl FingerprintKind {
    pub fn fingerprint(self, metric: &Metric) -> Fingerprint {
        match self {
            FingerprintKind::Strong => metric.fingerprint(),
            FingerprintKind::Fast => metric.fast_fingerprint(),
        }
    }
}

#[derive(Debug, Default)]
pub struct Dedup {
    /// First occurrence of every distinct series, in input order.
    pub unique: Vec<Metric>,
    /// Number of dropped series equal to an earlier one.
    pub duplicates: usize,
    /// Number of distinct series whose fingerprint was already taken.
    pub collisions: usize,
}

pub fn dedup(series: &[Metric], kind: FingerprintKind) -> Dedup {
    dedup_by(series, |metric| kind.fingerprint(metric))
}

/// Drops repeated series. Series are bucketed by fingerprint; within a bucket
/// they are compared in full, so fingerprint collisions never merge distinct
/// series.
pub fn dedup_by<F>(series: &[Metric], fingerprint: F) -> Dedup
where
    F: Fn(&Metric) -> Fingerprint,
{
    let mut buckets = FxHashMap::<Fingerprint, Vec<usize>>::default();
    let mut dedup = Dedup::default();
    for metric in series {
        let fp = fingerprint(metric);
        let bucket = buckets.entry(fp).or_default();
        if bucket.iter().any(|&i| dedup.unique[i].equal(metric)) {
            dedup.duplicates += 1;
            continue;
        }
        if !bucket.is_empty() {
            tracing::warn!(fingerprint = %fp, %metric, "fingerprint collision");
            dedup.collisions += 1;
        }
        bucket.push(dedup.unique.len());
        dedup.unique.push(metric.clone());
    }
    dedup
}

/// A single label edit applied by [`relabel`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Edit {
    Set(LabelName, LabelValue),
    Del(LabelName),
}

impl Edit {
    /// Parses `NAME=VALUE`. The value may be empty or contain `=`.
    pub fn parse_set(s: &str) -> std::result::Result<Self, String> {
        let (name, value) = s
            .split_once('=')
            .ok_or_else(|| format!("expected NAME=VALUE, got {s:?}"))?;
        Ok(Edit::Set(valid_name(name)?, value.into()))
    }

    pub fn parse_del(s: &str) -> std::result::Result<Self, String> {
        Ok(Edit::Del(valid_name(s)?))
    }
}

fn valid_name(name: &str) -> std::result::Result<LabelName, String> {
    let name = LabelName::from(name);
    if name.is_valid() {
        Ok(name)
    } else {
        Err(model::Error::InvalidLabelName(name.into()).to_string())
    }
}

/// Applies `edits` in order to a copy-on-write view of `metric`. The metric
/// itself is never modified; it is cloned once if any edit is given.
pub fn relabel<'a>(metric: &'a Metric, edits: &[Edit]) -> CowMetric<'a> {
    let mut cow = CowMetric::borrowed(metric);
    for edit in edits {
        match edit {
            Edit::Set(name, value) => cow.set(name.clone(), value.clone()),
            Edit::Del(name) => cow.del(name.as_str()),
        }
    }
    cow
}
