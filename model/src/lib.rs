mod error;
mod labels;
mod metric;

pub use {
    error::{Error, Result},
    labels::{
        Fingerprint, LabelName, LabelSet, LabelValue, EMPTY_LABEL_SIGNATURE, METRIC_NAME_LABEL,
        RESERVED_LABEL_PREFIX, SEPARATOR_BYTE,
    },
    metric::{CowMetric, Metric},
};
