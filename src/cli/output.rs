use anyhow::Result;
use clap::ValueEnum;
use quota_gate::BucketState;
use serde::Serialize;

#[derive(Clone, Copy, Debug, ValueEnum)]
pub enum OutputFormat {
    Human,
    Json,
    Yaml,
}

/// Serializable view of a bucket snapshot.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct StateView {
    pub capacity: u64,
    pub remaining: u64,
    pub reset_secs: u64,
}

impl From<&BucketState> for StateView {
    fn from(state: &BucketState) -> Self {
        Self {
            capacity: state.capacity,
            remaining: state.space,
            reset_secs: state.reset_secs(),
        }
    }
}

impl StateView {
    pub fn human(&self) -> String {
        format!(
            "capacity={} remaining={} reset={}s",
            self.capacity, self.remaining, self.reset_secs
        )
    }
}

/// Renders `value` in the machine formats, or with `human` otherwise.
pub fn render<T, F>(format: OutputFormat, value: &T, human: F) -> Result<String>
where
    T: Serialize,
    F: FnOnce(&T) -> String,
{
    Ok(match format {
        OutputFormat::Human => human(value),
        OutputFormat::Json => serde_json::to_string_pretty(value)?,
        OutputFormat::Yaml => serde_yaml::to_string(value)?,
    })
}
