// src/types.rs

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Identifier of a pipeline stage.
///
/// The seven working stages run in declaration order; `Done`, `Failed` and
/// `Cancelled` are terminal and have no outgoing transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum StageId {
    Mkdir,
    ObtainRnaseq,
    TrxIndex,
    Kallisto,
    Sleuth,
    Bowtie2,
    Blast,
    Done,
    Failed,
    Cancelled,
}

impl StageId {
    /// The working stages, in execution order.
    pub const PIPELINE: [StageId; 7] = [
        StageId::Mkdir,
        StageId::ObtainRnaseq,
        StageId::TrxIndex,
        StageId::Kallisto,
        StageId::Sleuth,
        StageId::Bowtie2,
        StageId::Blast,
    ];

    /// Stable numeric identifier, as reported to listeners.
    pub fn code(self) -> u8 {
        match self {
            StageId::Mkdir => 0,
            StageId::ObtainRnaseq => 1,
            StageId::TrxIndex => 2,
            StageId::Kallisto => 3,
            StageId::Sleuth => 4,
            StageId::Bowtie2 => 5,
            StageId::Blast => 6,
            StageId::Done => 7,
            StageId::Failed => 8,
            StageId::Cancelled => 9,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            StageId::Mkdir => "mkdir",
            StageId::ObtainRnaseq => "obtain-rnaseq",
            StageId::TrxIndex => "trx-index",
            StageId::Kallisto => "kallisto",
            StageId::Sleuth => "sleuth",
            StageId::Bowtie2 => "bowtie2",
            StageId::Blast => "blast",
            StageId::Done => "done",
            StageId::Failed => "failed",
            StageId::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, StageId::Done | StageId::Failed | StageId::Cancelled)
    }

    /// 1-based position among the working stages (`None` for terminals).
    pub fn position(self) -> Option<usize> {
        Self::PIPELINE.iter().position(|s| *s == self).map(|i| i + 1)
    }

    /// Transition table: the stage entered when this one exits successfully.
    ///
    /// Terminal stages map to themselves.
    pub fn next_on_success(self) -> StageId {
        match self {
            StageId::Mkdir => StageId::ObtainRnaseq,
            StageId::ObtainRnaseq => StageId::TrxIndex,
            StageId::TrxIndex => StageId::Kallisto,
            StageId::Kallisto => StageId::Sleuth,
            StageId::Sleuth => StageId::Bowtie2,
            StageId::Bowtie2 => StageId::Blast,
            StageId::Blast => StageId::Done,
            StageId::Done | StageId::Failed | StageId::Cancelled => self,
        }
    }

    /// Whether `self -> to` is a legal edge: forward along the table, or
    /// into `Failed` / `Cancelled` from any working stage.
    pub fn can_transition_to(self, to: StageId) -> bool {
        if self.is_terminal() {
            return false;
        }
        to == self.next_on_success() || matches!(to, StageId::Failed | StageId::Cancelled)
    }
}

impl fmt::Display for StageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for StageId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('_', "-").as_str() {
            "mkdir" => Ok(StageId::Mkdir),
            "obtain-rnaseq" => Ok(StageId::ObtainRnaseq),
            "trx-index" => Ok(StageId::TrxIndex),
            "kallisto" => Ok(StageId::Kallisto),
            "sleuth" => Ok(StageId::Sleuth),
            "bowtie2" => Ok(StageId::Bowtie2),
            "blast" => Ok(StageId::Blast),
            "done" => Ok(StageId::Done),
            "failed" => Ok(StageId::Failed),
            "cancelled" => Ok(StageId::Cancelled),
            other => Err(format!(
                "unknown stage: {other} (expected one of mkdir, obtain-rnaseq, trx-index, kallisto, sleuth, bowtie2, blast)"
            )),
        }
    }
}

/// Parse a simple duration string like `"5s"`, `"250ms"`, `"1m"`, `"2h"`.
pub fn parse_duration(s: &str) -> Result<Duration, String> {
    let s = s.trim();
    if s.is_empty() {
        return Err("empty duration string".to_string());
    }

    let idx = s
        .chars()
        .position(|c| !c.is_ascii_digit())
        .ok_or_else(|| format!("duration '{s}' is missing a unit suffix"))?;

    let (num_part, unit_part) = s.split_at(idx);
    let value: u64 = num_part
        .parse()
        .map_err(|e| format!("invalid duration number '{num_part}': {e}"))?;
    let unit = unit_part.trim().to_lowercase();

    let secs_per_unit = match unit.as_str() {
        "ms" => return Ok(Duration::from_millis(value)),
        "s" => 1,
        "m" => 60,
        "h" => 60 * 60,
        _ => {
            return Err(format!(
                "unsupported duration unit '{unit}'; expected ms, s, m, or h"
            ));
        }
    };
    value
        .checked_mul(secs_per_unit)
        .map(Duration::from_secs)
        .ok_or_else(|| format!("duration '{s}' is too large"))
}

/// Render a duration as `1h 02m 03s`, `4m 05s` or `6.2s`.
pub fn format_elapsed(d: Duration) -> String {
    let secs = d.as_secs();
    let (h, m, s) = (secs / 3600, (secs / 60) % 60, secs % 60);
    if h > 0 {
        format!("{h}h {m:02}m {s:02}s")
    } else if m > 0 {
        format!("{m}m {s:02}s")
    } else {
        format!("{:.1}s", d.as_secs_f64())
    }
}
