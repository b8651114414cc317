use serde::{Deserialize, Serialize};

/// Where a live board is read from and which clinics on it we track.
#[derive(Clone, Debug)]
pub struct BoardSourceSpec {
    pub uri: String,
    pub department_keywords: Vec<String>,
    pub doctor_keyword: Option<String>,
}

impl BoardSourceSpec {
    /// True when the block belongs to a tracked clinic. An empty keyword list
    /// tracks every clinic on the board.
    pub fn tracks(&self, block: &BoardBlock) -> bool {
        let department_ok = self.department_keywords.is_empty()
            || self.department_keywords.iter().any(|kw| block.display_name.contains(kw.as_str()));
        let doctor_ok = match &self.doctor_keyword {
            Some(kw) => block.text.contains(kw.as_str()),
            None => true,
        };
        department_ok && doctor_ok
    }
}

/// One clinic's raw text as scraped from the board, before any parsing.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct BoardBlock {
    pub display_name: String,
    pub text: String,
    // text of the header status indicator, present when the board shows one
    #[serde(default)]
    pub status_text: Option<String>,
}

// Object style note:
// An Estimator is a pure function over an already aligned vector. It does not
// know column names; the caller owns the schema and guarantees that
// `features[i]` is the value of the i-th schema column.

pub trait Estimator: Send + Sync {
    fn estimator_name(&self) -> &str;
    fn predict(&self, features: &[f64]) -> anyhow::Result<f64>;
}
