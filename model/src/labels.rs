use std::{
    borrow::Borrow,
    cmp::Ordering,
    fmt,
    hash::{Hash, Hasher},
    str::FromStr,
};

use itertools::Itertools;
use once_cell::sync::Lazy;
use regex::Regex;
use rustc_hash::{FxHashMap, FxHasher};
use serde::{
    ser::{SerializeMap, Serializer},
    Deserialize, Serialize,
};

use crate::{Error, Result};

/// Name of the label holding the metric name.
pub const METRIC_NAME_LABEL: &str = "__name__";

/// Label names starting with this prefix are reserved for internal use.
pub const RESERVED_LABEL_PREFIX: &str = "__";

/// Byte that never occurs in valid UTF-8; separates names and values when
/// hashing a label set.
pub const SEPARATOR_BYTE: u8 = 0xff;

/// Fingerprint of the empty label set (FNV-64 offset basis).
pub const EMPTY_LABEL_SIGNATURE: u64 = 0xcbf29ce484222325;

static LABEL_NAME_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-zA-Z_][a-zA-Z0-9_]*$").expect("valid regex"));

macro_rules! label_string {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                fmt::Debug::fmt(&self.0, f)
            }
        }

        impl Borrow<str> for $name {
            fn borrow(&self) -> &str {
                &self.0
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_owned())
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl From<$name> for String {
            fn from(s: $name) -> Self {
                s.0
            }
        }
    };
}

label_string!(
    /// Name of a label. Valid names match `[a-zA-Z_][a-zA-Z0-9_]*`.
    LabelName
);

label_string!(
    /// Value of a label; any UTF-8 string.
    LabelValue
);

impl LabelName {
    pub fn is_valid(&self) -> bool {
        LABEL_NAME_RE.is_match(&self.0)
    }

    pub fn is_reserved(&self) -> bool {
        self.0.starts_with(RESERVED_LABEL_PREFIX)
    }
}

impl LabelValue {
    /// Always true: a `String` cannot hold invalid UTF-8.
    pub fn is_valid(&self) -> bool {
        true
    }
}

/// `LabelSet` is an unordered collection of labels with unique names.
#[derive(Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(transparent)]
pub struct LabelSet(FxHashMap<LabelName, LabelValue>);

impl LabelSet {
    /// Builds a label set; a later duplicate name overwrites an earlier one.
    pub fn new<I, K, V>(labels: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<LabelName>,
        V: Into<LabelValue>,
    {
        labels.into_iter().collect()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Returns the value of the label with given name.
    pub fn get(&self, name: &str) -> Option<&LabelValue> {
        self.0.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }

    /// Iterates over the labels in arbitrary order.
    pub fn iter(&self) -> impl Iterator<Item = (&LabelName, &LabelValue)> {
        self.0.iter()
    }

    /// Returns the label names in lexicographic byte order.
    pub fn names(&self) -> Vec<&LabelName> {
        self.0.keys().sorted().collect()
    }

    pub fn insert(
        &mut self,
        name: impl Into<LabelName>,
        value: impl Into<LabelValue>,
    ) -> Option<LabelValue> {
        self.0.insert(name.into(), value.into())
    }

    pub fn remove(&mut self, name: &str) -> Option<LabelValue> {
        self.0.remove(name)
    }

    /// Returns a new set holding the labels of both sets. Labels of `other`
    /// win on name conflicts.
    pub fn merge(&self, other: &LabelSet) -> LabelSet {
        let mut merged = self.clone();
        merged
            .0
            .extend(other.iter().map(|(k, v)| (k.clone(), v.clone())));
        merged
    }

    /// Checks that every label name is valid. Names are checked in sorted
    /// order, so the reported name is deterministic.
    pub fn validate(&self) -> Result<()> {
        for name in self.names() {
            if !name.is_valid() {
                tracing::trace!(%name, "invalid label name");
                return Err(Error::InvalidLabelName(name.to_string()));
            }
        }
        Ok(())
    }

    pub fn equal(&self, other: &LabelSet) -> bool {
        self == other
    }

    /// Returns true if `self` sorts strictly before `other`.
    pub fn before(&self, other: &LabelSet) -> bool {
        self.cmp(other) == Ordering::Less
    }

    /// Collision-resistant identity of the label set: blake3 over the labels
    /// in sorted name order.
    pub fn fingerprint(&self) -> Fingerprint {
        if self.is_empty() {
            return Fingerprint(EMPTY_LABEL_SIGNATURE);
        }
        let mut hasher = blake3::Hasher::new();
        self.0
            .iter()
            .sorted_by(|a, b| a.0.cmp(b.0))
            .for_each(|(name, value)| {
                hasher.update(name.as_str().as_bytes());
                hasher.update(&[SEPARATOR_BYTE]);
                hasher.update(value.as_str().as_bytes());
                hasher.update(&[SEPARATOR_BYTE]);
            });
        let mut buf = [0u8; 8];
        buf.copy_from_slice(&hasher.finalize().as_bytes()[..8]);
        Fingerprint(u64::from_le_bytes(buf))
    }

    /// Cheaper identity of the label set. Labels are hashed one by one and
    /// XOR-ed together, so no sorting is needed; the price is a much higher
    /// chance that distinct sets collide.
    pub fn fast_fingerprint(&self) -> Fingerprint {
        if self.is_empty() {
            return Fingerprint(EMPTY_LABEL_SIGNATURE);
        }
        let sum = self.0.iter().fold(0u64, |acc, (name, value)| {
            let mut hasher = FxHasher::default();
            hasher.write(name.as_str().as_bytes());
            hasher.write_u8(SEPARATOR_BYTE);
            hasher.write(value.as_str().as_bytes());
            acc ^ hasher.finish()
        });
        Fingerprint(sum)
    }
}

impl Ord for LabelSet {
    /// Smaller sets sort first. Sets of equal size are compared at the first
    /// label name (in sorted order) where they differ: a missing label sorts
    /// before a present one, otherwise values are compared.
    fn cmp(&self, other: &Self) -> Ordering {
        self.len().cmp(&other.len()).then_with(|| {
            for name in self.0.keys().chain(other.0.keys()).sorted().dedup() {
                match (self.0.get(name), other.0.get(name)) {
                    (Some(a), Some(b)) => match a.cmp(b) {
                        Ordering::Equal => continue,
                        ord => return ord,
                    },
                    (None, _) => return Ordering::Less,
                    (_, None) => return Ordering::Greater,
                }
            }
            Ordering::Equal
        })
    }
}

impl PartialOrd for LabelSet {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Hash for LabelSet {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_u64(self.fast_fingerprint().0);
    }
}

impl<K, V> FromIterator<(K, V)> for LabelSet
where
    K: Into<LabelName>,
    V: Into<LabelValue>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

impl fmt::Debug for LabelSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map()
            .entries(self.0.iter().sorted_by(|a, b| a.0.cmp(b.0)))
            .finish()
    }
}

impl fmt::Display for LabelSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_labels(f, self, None)
    }
}

impl Serialize for LabelSet {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (name, value) in self.0.iter().sorted_by(|a, b| a.0.cmp(b.0)) {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }
}

/// Renders `labels` as `name{a="1", b="2"}`.
///
/// When `name_label` is given, that label is taken out of the braces and
/// written in front of them; with no other labels only the name is written.
/// Without a name and without labels the result is `{}`.
pub(crate) fn write_labels(
    f: &mut fmt::Formatter<'_>,
    labels: &LabelSet,
    name_label: Option<&str>,
) -> fmt::Result {
    let name = name_label.and_then(|n| labels.get(n));
    let pairs = labels
        .iter()
        .filter(|(k, _)| Some(k.as_str()) != name_label)
        .sorted_by(|a, b| a.0.cmp(b.0))
        .collect::<Vec<_>>();

    if let Some(name) = name {
        f.write_str(name.as_str())?;
        if pairs.is_empty() {
            return Ok(());
        }
    }
    f.write_str("{")?;
    for (i, (k, v)) in pairs.into_iter().enumerate() {
        if i > 0 {
            f.write_str(", ")?;
        }
        write!(f, "{k}={:?}", v.as_str())?;
    }
    f.write_str("}")
}

/// Numeric identity of a label set.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Fingerprint(pub u64);

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0.to_be_bytes()))
    }
}

impl FromStr for Fingerprint {
    type Err = Error;

    /// Parses exactly 16 hex digits, as produced by `Display`.
    fn from_str(s: &str) -> Result<Self> {
        let mut buf = [0u8; 8];
        hex::decode_to_slice(s, &mut buf).map_err(|_| Error::InvalidFingerprint(s.to_owned()))?;
        Ok(Self(u64::from_be_bytes(buf)))
    }
}

impl From<Fingerprint> for String {
    fn from(fp: Fingerprint) -> Self {
        fp.to_string()
    }
}
