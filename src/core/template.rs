/// Slot templates for generated flavor text: `{npc} was seen near {region}`.

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TemplateError {
    #[error("template parse error in `{template}`: {reason}")]
    Parse { template: String, reason: String },
    #[error("unknown slot `{slot}` in `{template}`")]
    UnknownSlot { template: String, slot: String },
}

/// A named hole in a template, filled from the settlement's context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Slot {
    Npc,
    Faction,
    Region,
    Settlement,
    Destination,
    Site,
    Place,
    Reward,
}

impl Slot {
    fn from_name(name: &str) -> Option<Self> {
        let slot = match name {
            "npc" => Self::Npc,
            "faction" => Self::Faction,
            "region" => Self::Region,
            "settlement" => Self::Settlement,
            "destination" | "dest" => Self::Destination,
            "site" => Self::Site,
            "place" => Self::Place,
            "reward" => Self::Reward,
            _ => return None,
        };
        Some(slot)
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Npc => "npc",
            Self::Faction => "faction",
            Self::Region => "region",
            Self::Settlement => "settlement",
            Self::Destination => "destination",
            Self::Site => "site",
            Self::Place => "place",
            Self::Reward => "reward",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TemplateSegment {
    Literal(String),
    Slot(Slot),
}

/// A parsed template: a sequence of literal text and slots.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Template {
    pub segments: Vec<TemplateSegment>,
}

impl Template {
    /// Parse a template string.
    ///
    /// Syntax:
    /// - `{slot}` → `Slot`, where slot is one of the `Slot` names
    /// - `{{` / `}}` → literal brace
    /// - everything else → `Literal`
    pub fn parse(input: &str) -> Result<Template, TemplateError> {
        let parse_err = |reason: &str| TemplateError::Parse {
            template: input.to_string(),
            reason: reason.to_string(),
        };
        let mut segments = Vec::new();
        let mut literal_buf = String::new();
        let chars: Vec<char> = input.chars().collect();
        let len = chars.len();
        let mut i = 0;

        while i < len {
            match chars[i] {
                '{' if i + 1 < len && chars[i + 1] == '{' => {
                    literal_buf.push('{');
                    i += 2;
                }
                '{' => {
                    if !literal_buf.is_empty() {
                        segments.push(TemplateSegment::Literal(std::mem::take(&mut literal_buf)));
                    }
                    let start = i + 1;
                    let mut end = start;
                    while end < len && chars[end] != '}' {
                        if chars[end] == '{' {
                            return Err(parse_err("nested braces are not allowed"));
                        }
                        end += 1;
                    }
                    if end == len {
                        return Err(parse_err("unclosed brace"));
                    }
                    let name: String = chars[start..end].iter().collect();
                    if name.is_empty() {
                        return Err(parse_err("empty braces"));
                    }
                    let slot = Slot::from_name(&name).ok_or_else(|| TemplateError::UnknownSlot {
                        template: input.to_string(),
                        slot: name.clone(),
                    })?;
                    segments.push(TemplateSegment::Slot(slot));
                    i = end + 1;
                }
                '}' if i + 1 < len && chars[i + 1] == '}' => {
                    literal_buf.push('}');
                    i += 2;
                }
                '}' => return Err(parse_err("unmatched closing brace")),
                c => {
                    literal_buf.push(c);
                    i += 1;
                }
            }
        }

        if !literal_buf.is_empty() {
            segments.push(TemplateSegment::Literal(literal_buf));
        }
        Ok(Template { segments })
    }

    pub fn parse_all<S: AsRef<str>>(inputs: &[S]) -> Result<Vec<Template>, TemplateError> {
        inputs.iter().map(|s| Self::parse(s.as_ref())).collect()
    }

    /// Distinct slots in order of first appearance.
    pub fn slots(&self) -> Vec<Slot> {
        let mut out = Vec::new();
        for segment in &self.segments {
            if let TemplateSegment::Slot(slot) = segment {
                if !out.contains(slot) {
                    out.push(*slot);
                }
            }
        }
        out
    }

    pub fn uses(&self, slot: Slot) -> bool {
        self.segments
            .iter()
            .any(|s| matches!(s, TemplateSegment::Slot(x) if *x == slot))
    }

    /// Render with one value per slot. A slot without a value renders as
    /// its bare name so a gap is visible rather than silent.
    pub fn render(&self, values: &FxHashMap<Slot, String>) -> String {
        let mut out = String::new();
        for segment in &self.segments {
            match segment {
                TemplateSegment::Literal(text) => out.push_str(text),
                TemplateSegment::Slot(slot) => match values.get(slot) {
                    Some(value) => out.push_str(value),
                    None => out.push_str(slot.name()),
                },
            }
        }
        out
    }
}

impl fmt::Display for Template {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for segment in &self.segments {
            match segment {
                TemplateSegment::Literal(text) => {
                    write!(f, "{}", text.replace('{', "{{").replace('}', "}}"))?
                }
                TemplateSegment::Slot(slot) => write!(f, "{{{}}}", slot.name())?,
            }
        }
        Ok(())
    }
}
