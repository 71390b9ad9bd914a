use std::{borrow::Cow, fmt, ops::Deref};

use serde::{Deserialize, Serialize, Serializer};

use crate::labels::{
    write_labels, Fingerprint, LabelName, LabelSet, LabelValue, METRIC_NAME_LABEL,
};

/// A `Metric` is a `LabelSet` that identifies one and only one stream of
/// samples.
///
/// Equality, ordering and hashing are those of the underlying label set.
/// A `Metric` hands out read-only access only; to edit labels of a metric
/// you may share, go through [`CowMetric`].
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Metric(LabelSet);

impl Metric {
    pub fn new<I, K, V>(labels: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<LabelName>,
        V: Into<LabelValue>,
    {
        Self(LabelSet::new(labels))
    }

    /// Value of the `__name__` label, if any.
    pub fn name(&self) -> Option<&LabelValue> {
        self.0.get(METRIC_NAME_LABEL)
    }

    pub fn equal(&self, other: &Metric) -> bool {
        self.0.equal(&other.0)
    }

    pub fn before(&self, other: &Metric) -> bool {
        self.0.before(&other.0)
    }

    pub fn fingerprint(&self) -> Fingerprint {
        self.0.fingerprint()
    }

    /// See [`LabelSet::fast_fingerprint`]. Callers that must tell distinct
    /// metrics apart have to confirm a match with [`Metric::equal`].
    pub fn fast_fingerprint(&self) -> Fingerprint {
        self.0.fast_fingerprint()
    }

    pub fn into_label_set(self) -> LabelSet {
        self.0
    }
}

impl Deref for Metric {
    type Target = LabelSet;

    fn deref(&self) -> &LabelSet {
        &self.0
    }
}

impl From<LabelSet> for Metric {
    fn from(labels: LabelSet) -> Self {
        Self(labels)
    }
}

impl From<Metric> for LabelSet {
    fn from(metric: Metric) -> Self {
        metric.0
    }
}

impl<K, V> FromIterator<(K, V)> for Metric
where
    K: Into<LabelName>,
    V: Into<LabelValue>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_labels(f, &self.0, Some(METRIC_NAME_LABEL))
    }
}

/// `CowMetric` wraps a [`Metric`] for copy-on-write access.
///
/// A borrowed metric is cloned once, on the first [`set`](Self::set) or
/// [`del`](Self::del); all later edits go to that copy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CowMetric<'a>(Cow<'a, Metric>);

impl<'a> CowMetric<'a> {
    /// Wraps a metric shared with other holders.
    pub fn borrowed(metric: &'a Metric) -> Self {
        Self(Cow::Borrowed(metric))
    }

    /// Wraps a metric owned exclusively by this holder.
    pub fn owned(metric: Metric) -> Self {
        Self(Cow::Owned(metric))
    }

    /// Returns true once this holder owns its own copy.
    pub fn is_copied(&self) -> bool {
        matches!(self.0, Cow::Owned(_))
    }

    pub fn metric(&self) -> &Metric {
        &self.0
    }

    /// Sets label `name` to `value`.
    pub fn set(&mut self, name: impl Into<LabelName>, value: impl Into<LabelValue>) {
        self.labels_mut().insert(name, value);
    }

    /// Deletes label `name`; deleting an absent label is a no-op.
    pub fn del(&mut self, name: &str) {
        self.labels_mut().remove(name);
    }

    pub fn into_owned(self) -> Metric {
        self.0.into_owned()
    }

    fn labels_mut(&mut self) -> &mut LabelSet {
        if let Cow::Borrowed(metric) = &self.0 {
            tracing::debug!(%metric, "copying metric on first write");
        }
        &mut self.0.to_mut().0
    }
}

impl From<Metric> for CowMetric<'static> {
    fn from(metric: Metric) -> Self {
        Self::owned(metric)
    }
}

impl<'a> From<&'a Metric> for CowMetric<'a> {
    fn from(metric: &'a Metric) -> Self {
        Self::borrowed(metric)
    }
}

impl AsRef<Metric> for CowMetric<'_> {
    fn as_ref(&self) -> &Metric {
        &self.0
    }
}

impl fmt::Display for CowMetric<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self.metric(), f)
    }
}

impl Serialize for CowMetric<'_> {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        self.metric().serialize(serializer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use expect_test::expect;

    fn http_requests() -> Metric {
        Metric::new([
            ("__name__", "http_requests_total"),
            ("method", "GET"),
            ("code", "200"),
        ])
    }

    #[test]
    fn test_metric_display() {
        expect![[r#"http_requests_total{code="200", method="GET"}"#]]
            .assert_eq(&http_requests().to_string());
        expect!["up"].assert_eq(&Metric::new([("__name__", "up")]).to_string());
        expect!["{}"].assert_eq(&Metric::default().to_string());
        expect![[r#"{foo="bar"}"#]].assert_eq(&Metric::new([("foo", "bar")]).to_string());
        expect![[r#"up{path="C:\\tmp", quote="say \"hi\"", tab="\t"}"#]].assert_eq(
            &Metric::new([
                ("__name__", "up"),
                ("quote", "say \"hi\""),
                ("path", "C:\\tmp"),
                ("tab", "\t"),
            ])
            .to_string(),
        );
        // present but empty name
        expect![[r#"{a="1"}"#]].assert_eq(&Metric::new([("__name__", ""), ("a", "1")]).to_string());
    }

    #[test]
    fn test_metric_display_deterministic() {
        let names = ["e", "d", "c", "b", "a", "f", "g", "h"];
        let forward = Metric::new(names.iter().map(|n| (*n, *n)));
        let backward = Metric::new(names.iter().rev().map(|n| (*n, *n)));
        assert_eq!(forward, backward);
        assert_eq!(forward.to_string(), backward.to_string());
        expect![[r#"{a="a", b="b", c="c", d="d", e="e", f="f", g="g", h="h"}"#]]
            .assert_eq(&forward.to_string());
    }

    #[test]
    fn test_metric_identity_delegates() {
        let a = http_requests();
        let b = Metric::from(LabelSet::new([
            ("code", "200"),
            ("method", "GET"),
            ("__name__", "http_requests_total"),
        ]));
        let c = Metric::new([("__name__", "http_requests_total"), ("method", "GET")]);

        assert!(a.equal(&a));
        assert!(a.equal(&b) && b.equal(&a));
        assert!(!a.equal(&c));
        assert_eq!(a.before(&c), a.deref().before(&c));
        assert!(c.before(&a));
        assert!(!a.before(&b) && !b.before(&a));

        assert_eq!(a.fingerprint(), a.fingerprint());
        assert_eq!(a.fingerprint(), b.fingerprint());
        assert_eq!(a.fast_fingerprint(), b.fast_fingerprint());
        assert_eq!(a.fingerprint(), a.deref().fingerprint());
        assert_eq!(a.fast_fingerprint(), a.deref().fast_fingerprint());

        let empty = Metric::default();
        assert!(empty.equal(&Metric::default()));
        assert!(empty.before(&a));
        assert_eq!(empty.fingerprint(), LabelSet::default().fingerprint());
    }

    #[test]
    fn test_metric_sort() {
        let mut metrics = vec![
            Metric::new([("__name__", "b"), ("x", "1")]),
            Metric::new([("__name__", "a")]),
            Metric::new([("__name__", "a"), ("x", "1")]),
            Metric::default(),
        ];
        metrics.sort();
        let rendered = metrics.iter().map(ToString::to_string).collect::<Vec<_>>();
        expect![[r#"
            [
                "{}",
                "a",
                "a{x=\"1\"}",
                "b{x=\"1\"}",
            ]
        "#]]
        .assert_debug_eq(&rendered);
    }

    #[test]
    fn test_metric_clone_isolated() {
        let original = http_requests();
        let mut clone = original.clone().into_label_set();
        clone.insert("method", "POST");
        clone.remove("code");
        assert_eq!(original, http_requests());
        assert_eq!(original.get("method").map(LabelValue::as_str), Some("GET"));
    }

    #[test]
    fn test_cow_metric_borrowed_copies_once() {
        let shared = http_requests();
        let reader = &shared;

        let mut cow = CowMetric::borrowed(&shared);
        assert!(!cow.is_copied());
        assert!(std::ptr::eq(cow.metric(), &shared));

        cow.set("a", "b");
        assert!(cow.is_copied());
        assert!(!std::ptr::eq(cow.metric(), &shared));
        assert_eq!(*reader, http_requests());
        assert_eq!(cow.metric().get("a").map(LabelValue::as_str), Some("b"));

        let copy = cow.metric() as *const Metric;
        cow.set("a", "c");
        cow.del("method");
        assert!(std::ptr::eq(cow.metric(), copy));
        assert_eq!(*reader, http_requests());
        expect![[r#"http_requests_total{a="c", code="200"}"#]].assert_eq(&cow.to_string());
    }

    #[test]
    fn test_cow_metric_del() {
        let shared = http_requests();

        let mut cow = CowMetric::borrowed(&shared);
        cow.del("missing");
        assert!(cow.is_copied());
        assert_eq!(*cow.metric(), shared);

        cow.del("__name__");
        expect![[r#"{code="200", method="GET"}"#]].assert_eq(&cow.to_string());
        assert_eq!(shared.name().map(LabelValue::as_str), Some("http_requests_total"));
    }

    #[test]
    fn test_cow_metric_reads_do_not_copy() {
        let shared = http_requests();
        let cow = CowMetric::from(&shared);
        let _ = cow.to_string();
        let _ = serde_json::to_string(&cow).unwrap();
        assert!(!cow.is_copied());
        assert!(std::ptr::eq(cow.as_ref(), &shared));
    }

    #[test]
    fn test_cow_metric_owned() {
        let mut cow = CowMetric::owned(Metric::new([("__name__", "up")]));
        assert!(cow.is_copied());
        let before = cow.metric() as *const Metric;
        cow.set("job", "node");
        assert!(std::ptr::eq(cow.metric(), before));
        assert_eq!(
            cow.into_owned(),
            Metric::new([("__name__", "up"), ("job", "node")])
        );

        let shared = Metric::new([("a", "1")]);
        let untouched = CowMetric::borrowed(&shared).into_owned();
        assert_eq!(untouched, shared);
    }

    #[test]
    fn test_cow_metric_serialize() {
        let shared = http_requests();
        let mut cow = CowMetric::borrowed(&shared);
        let fresh = serde_json::to_string(&shared).unwrap();
        assert_eq!(serde_json::to_string(&cow).unwrap(), fresh);

        cow.set("method", "GET");
        assert!(cow.is_copied());
        assert_eq!(serde_json::to_string(&cow).unwrap(), fresh);
        expect![[r#"{"__name__":"http_requests_total","code":"200","method":"GET"}"#]]
            .assert_eq(&fresh);
    }

    #[test]
    fn test_metric_deserialize() {
        let metric: Metric =
            serde_json::from_str(r#"{"method":"GET","__name__":"http_requests_total","code":"200"}"#)
                .unwrap();
        assert_eq!(metric, http_requests());
    }
}
