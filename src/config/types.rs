use datamosh_h264::TruncationPolicy;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub mosh: MoshConfig,

    #[serde(default)]
    pub probe: ProbeConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MoshConfig {
    /// Ask before nullifying each I-frame
    #[serde(default)]
    pub interactive: bool,

    /// Report every I-frame as it is visited
    #[serde(default)]
    pub debug: bool,

    /// Classify slices (and check their headers) while moshing
    #[serde(default = "default_classify")]
    pub classify: bool,

    /// Appended to the input file stem to name the output
    #[serde(default = "default_output_suffix")]
    pub output_suffix: String,

    /// What to do with NAL records that overrun their sample
    #[serde(default)]
    pub truncated_records: TruncationPolicy,
}

fn default_classify() -> bool {
    true
}

fn default_output_suffix() -> String {
    "-iframoshed".to_string()
}

impl Default for MoshConfig {
    fn default() -> Self {
        Self {
            interactive: false,
            debug: false,
            classify: default_classify(),
            output_suffix: default_output_suffix(),
            truncated_records: TruncationPolicy::default(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ProbeConfig {
    /// List every NAL unit, not just the per-track summary
    #[serde(default)]
    pub show_units: bool,
}
