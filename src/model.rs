use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::{
    collections::BTreeMap,
    fmt::{Display, Formatter},
};

/// The wire and storage representation of a constraint: its name and its still undecoded
/// parameters.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RawConstraint {
    pub name: String,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub parameters: Value,
}

impl RawConstraint {
    pub fn new(name: &str, parameters: Value) -> Self {
        Self {
            name: name.to_owned(),
            parameters,
        }
    }
}

impl Display for RawConstraint {
    fn fmt(&self, formatter: &mut Formatter) -> std::fmt::Result {
        if self.parameters.is_null() {
            write!(formatter, "{}", self.name)
        } else {
            write!(formatter, "{}{}", self.name, self.parameters)
        }
    }
}

/// The outcome returned when a segment matches (e.g. control/treatment, green/yellow/red).
///
/// The attachment carries the dynamic configuration of the variant, for example
/// `{"hex_color": "#42b983"}` for a green button.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Variant {
    #[serde(rename = "variant_key")]
    pub key: String,
    #[serde(
        rename = "variant_attachment",
        default,
        skip_serializing_if = "Value::is_null"
    )]
    pub attachment: Value,
}

impl Variant {
    pub fn new(key: &str) -> Self {
        Self {
            key: key.to_owned(),
            attachment: Value::Null,
        }
    }

    pub fn with_attachment(mut self, attachment: Value) -> Self {
        self.attachment = attachment;
        self
    }
}

/// One rule of a flag: the named operands, the expression combining them and the variant
/// assigned to the entities it matches.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub constraints: BTreeMap<String, RawConstraint>,
    #[serde(default)]
    pub expression: String,
    #[serde(default)]
    pub variant: Variant,
}

/// A stored flag.
///
/// The segments are kept serialized, exactly as the flag repository returns them, and are
/// only decoded when the engine builds its cache.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Flag {
    pub id: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<String>,
    #[serde(default)]
    pub description: String,
    pub flag: String,
    pub segments: String,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Flag {
    /// Decode the serialized segments in their authored order.
    pub fn decode_segments(&self) -> Result<Vec<Segment>, serde_json::Error> {
        serde_json::from_str(&self.segments)
    }

    /// Decode the serialized tags, if any.
    pub fn decode_tags(&self) -> Result<Vec<String>, serde_json::Error> {
        match &self.tags {
            Some(tags) => serde_json::from_str(tags),
            None => Ok(Vec::new()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const SEGMENTS: &str = r##"
    [
        {
            "description": "segment 1",
            "constraints": {
                "A": {"name": "<", "parameters": {"value": 10}},
                "B": {"name": ">", "parameters": {"value": 5}}
            },
            "expression": "A ∩ B",
            "variant": {"variant_key": "on1", "variant_attachment": {"hex_color": "#42b983"}}
        },
        {
            "description": "segment 2",
            "constraints": {"A": {"name": "always"}},
            "expression": "A",
            "variant": {"variant_key": "on2"}
        }
    ]
    "##;

    fn a_flag(segments: &str) -> Flag {
        Flag {
            id: 10,
            tags: Some(r#"["checkout", "web"]"#.to_owned()),
            description: "a flag".to_owned(),
            flag: "flag1".to_owned(),
            segments: segments.to_owned(),
            created_at: Utc::now(),
            deleted_at: None,
        }
    }

    #[test]
    fn can_decode_segments_in_their_authored_order() {
        let segments = a_flag(SEGMENTS).decode_segments().unwrap();

        assert_eq!(2, segments.len());
        assert_eq!("on1", segments[0].variant.key);
        assert_eq!(json!({"hex_color": "#42b983"}), segments[0].variant.attachment);
        assert_eq!("A ∩ B", segments[0].expression);
        assert_eq!(
            RawConstraint::new("<", json!({"value": 10})),
            segments[0].constraints["A"]
        );
        assert_eq!("on2", segments[1].variant.key);
        assert_eq!(Value::Null, segments[1].variant.attachment);
    }

    #[test]
    fn leave_missing_parameters_null() {
        let segments = a_flag(SEGMENTS).decode_segments().unwrap();

        assert_eq!(Value::Null, segments[1].constraints["A"].parameters);
    }

    #[test]
    fn return_an_error_on_invalid_segments() {
        assert!(a_flag("{not json").decode_segments().is_err());
    }

    #[test]
    fn can_decode_tags() {
        let tags = a_flag(SEGMENTS).decode_tags().unwrap();

        assert_eq!(vec!["checkout".to_owned(), "web".to_owned()], tags);
    }

    #[test]
    fn decode_missing_tags_as_empty() {
        let mut flag = a_flag(SEGMENTS);
        flag.tags = None;

        assert!(flag.decode_tags().unwrap().is_empty());
    }

    #[test]
    fn skip_null_parameters_when_serializing() {
        let serialized = serde_json::to_string(&RawConstraint::new("always", Value::Null)).unwrap();

        assert_eq!(r#"{"name":"always"}"#, serialized);
    }

    #[test]
    fn can_display_a_raw_constraint() {
        assert_eq!("always", RawConstraint::new("always", Value::Null).to_string());
        assert_eq!(
            r#"<{"value":10}"#,
            RawConstraint::new("<", json!({"value": 10})).to_string()
        );
    }
}
