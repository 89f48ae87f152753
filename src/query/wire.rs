//! JSON shape of a Loki `query_range` response

use crate::labels::LabelSet;
use crate::matrix::{Matrix, Sample, TimeSeries};
use crate::{Error, Result};
use serde::Deserialize;

const STATUS_SUCCESS: &str = "success";
const RESULT_TYPE_MATRIX: &str = "matrix";

#[derive(Debug, Deserialize)]
pub struct QueryRangeResponse {
    pub status: String,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub data: QueryRangeData,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryRangeData {
    #[serde(default)]
    pub result_type: String,
    #[serde(default)]
    pub result: Vec<MatrixElement>,
}

#[derive(Debug, Deserialize)]
pub struct MatrixElement {
    #[serde(default)]
    pub metric: LabelSet,
    #[serde(default)]
    pub values: Vec<Vec<WireScalar>>,
}

/// A timestamp or value as it appears on the wire: Loki sends timestamps as
/// numbers and values as strings, but either may show up as both.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum WireScalar {
    Number(f64),
    Text(String),
    Other(serde_json::Value),
}

impl WireScalar {
    /// Numeric value, if this scalar holds or spells one.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            WireScalar::Number(n) => Some(*n),
            WireScalar::Text(s) => s.trim().parse().ok(),
            WireScalar::Other(_) => None,
        }
    }
}

impl QueryRangeResponse {
    /// Convert to a matrix. Entries that are not `[timestamp, value]` pairs,
    /// or whose fields are not numeric, are dropped.
    pub fn into_matrix(self) -> Result<Matrix> {
        if self.status != STATUS_SUCCESS {
            let mut msg = format!("loki query failed: {}", self.status);
            if let Some(detail) = self.error.filter(|e| !e.is_empty()) {
                msg.push_str(": ");
                msg.push_str(&detail);
            }
            return Err(Error::Query(msg));
        }
        if self.data.result_type != RESULT_TYPE_MATRIX {
            return Err(Error::Query(format!(
                "unexpected result type: {}",
                self.data.result_type
            )));
        }

        Ok(self
            .data
            .result
            .into_iter()
            .map(MatrixElement::into_series)
            .collect())
    }
}

impl MatrixElement {
    fn into_series(self) -> TimeSeries {
        let samples = self.values.iter().filter_map(|pair| decode_pair(pair)).collect();
        TimeSeries::new(self.metric, samples)
    }
}

fn decode_pair(pair: &[WireScalar]) -> Option<Sample> {
    let [ts, value] = pair else {
        return None;
    };
    let seconds = ts.as_f64()?;
    let value = value.as_f64()?;
    Some(Sample::new((seconds * 1000.0) as i64, value))
}
