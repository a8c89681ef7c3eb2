use crate::{
    error::DefinitionError,
    model::{Flag, Segment, Variant},
    parser,
    registry::ConstraintRegistry,
};
use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

static NAME_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z0-9]+(?:\.[a-z0-9]+)*$").expect("invalid name regex"));

/// A flag as it is authored, before being stored.
///
/// Unlike the stored [`Flag`], the tags and the segments are structured values so that the
/// whole definition can be validated before it reaches the flag repository.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct FlagDefinition {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub flag: String,
    #[serde(default)]
    pub segments: Vec<Segment>,
}

impl FlagDefinition {
    /// Validate the definition the same way the engine will build it.
    ///
    /// Named constraints must be leaf constraints and the expression combining them must
    /// produce a valid constraint tree. Flag keys, tags and variant keys are lowercase
    /// alphanumeric words separated by dots (e.g. `checkout.button.color`).
    pub fn validate(&self, registry: &ConstraintRegistry) -> Result<(), DefinitionError> {
        if self.description.is_empty() {
            return Err(DefinitionError::Required("description"));
        }
        validate_name("flag", &self.flag)?;
        if self.segments.is_empty() {
            return Err(DefinitionError::Required("segments"));
        }
        for (index, segment) in self.segments.iter().enumerate() {
            validate_segment(segment, registry).map_err(|error| DefinitionError::Segment {
                index,
                source: Box::new(error),
            })?;
        }
        for tag in &self.tags {
            validate_name("tag", tag)?;
        }
        Ok(())
    }

    /// Convert the definition into its stored representation.
    pub fn into_flag(self, id: i64, created_at: DateTime<Utc>) -> Result<Flag, DefinitionError> {
        let tags = if self.tags.is_empty() {
            None
        } else {
            Some(serde_json::to_string(&self.tags)?)
        };

        Ok(Flag {
            id,
            tags,
            description: self.description,
            flag: self.flag,
            segments: serde_json::to_string(&self.segments)?,
            created_at,
            deleted_at: None,
        })
    }
}

fn validate_segment(segment: &Segment, registry: &ConstraintRegistry) -> Result<(), DefinitionError> {
    if segment.description.is_empty() {
        return Err(DefinitionError::Required("description"));
    }
    if segment.constraints.is_empty() {
        return Err(DefinitionError::Required("constraints"));
    }
    for (operand, raw) in &segment.constraints {
        registry
            .validate_basic(raw)
            .map_err(|source| DefinitionError::Operand {
                operand: operand.clone(),
                source,
            })?;
    }
    if segment.expression.is_empty() {
        return Err(DefinitionError::Required("expression"));
    }
    let parsed = parser::parse(&segment.expression, &segment.constraints)?;
    registry.validate(&parsed)?;
    validate_variant(&segment.variant)
}

fn validate_variant(variant: &Variant) -> Result<(), DefinitionError> {
    if variant.key.is_empty() {
        return Err(DefinitionError::Required("variant"));
    }
    validate_name("variant key", &variant.key)
}

fn validate_name(field: &'static str, value: &str) -> Result<(), DefinitionError> {
    if value.is_empty() {
        return Err(DefinitionError::Required(field));
    }

    if NAME_REGEX.is_match(value) {
        Ok(())
    } else {
        Err(DefinitionError::InvalidName {
            field,
            value: value.to_owned(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{error::ConstraintError, error::ExpressionError, test_utils::constraints::raw};
    use chrono::TimeZone;
    use serde_json::json;

    fn a_definition() -> FlagDefinition {
        serde_json::from_value(json!({
            "tags": ["checkout", "web.v2"],
            "description": "checkout button color",
            "flag": "checkout.button.color",
            "segments": [
                {
                    "description": "early adopters",
                    "constraints": {
                        "A": {"name": "<", "parameters": {"value": 10}},
                        "B": {"name": "rollout", "parameters": {"lower_bound": 0, "upper_bound": 49}}
                    },
                    "expression": "A ∪ B",
                    "variant": {"variant_key": "green", "variant_attachment": {"hex_color": "#42b983"}}
                }
            ]
        }))
        .unwrap()
    }

    #[test]
    fn can_validate_a_definition() {
        assert!(a_definition().validate(&ConstraintRegistry::default()).is_ok());
    }

    #[test]
    fn return_an_error_when_the_description_is_missing() {
        let mut definition = a_definition();
        definition.description.clear();

        assert!(matches!(
            definition.validate(&ConstraintRegistry::default()),
            Err(DefinitionError::Required("description"))
        ));
    }

    #[test]
    fn can_validate_dotted_flag_keys() {
        let registry = ConstraintRegistry::default();

        for key in ["checkout", "checkout.v2", "checkout.button.color", "2024.q3"] {
            let mut definition = a_definition();
            definition.flag = key.to_owned();

            assert!(definition.validate(&registry).is_ok(), "{key}");
        }
    }

    #[test]
    fn return_an_error_on_invalid_flag_keys() {
        let registry = ConstraintRegistry::default();

        for key in ["Checkout", "checkout..button", ".checkout", "checkout.", "check out"] {
            let mut definition = a_definition();
            definition.flag = key.to_owned();

            assert!(matches!(
                definition.validate(&registry),
                Err(DefinitionError::InvalidName { field: "flag", .. })
            ));
        }
    }

    #[test]
    fn return_an_error_on_invalid_tags() {
        let mut definition = a_definition();
        definition.tags.push("Web".to_owned());

        assert!(matches!(
            definition.validate(&ConstraintRegistry::default()),
            Err(DefinitionError::InvalidName { field: "tag", .. })
        ));
    }

    #[test]
    fn return_an_error_when_there_is_no_segment() {
        let mut definition = a_definition();
        definition.segments.clear();

        assert!(matches!(
            definition.validate(&ConstraintRegistry::default()),
            Err(DefinitionError::Required("segments"))
        ));
    }

    #[test]
    fn return_an_error_on_composite_operands() {
        let mut definition = a_definition();
        definition.segments[0].constraints.insert(
            "C".to_owned(),
            raw!("!", {"constraint": {"name": "always"}}),
        );

        let error = definition.validate(&ConstraintRegistry::default()).unwrap_err();

        assert!(matches!(
            error,
            DefinitionError::Segment { index: 0, source }
                if matches!(*source, DefinitionError::Operand { ref operand, .. } if operand == "C")
        ));
    }

    #[test]
    fn return_an_error_on_invalid_operands() {
        let mut definition = a_definition();
        definition.segments[0]
            .constraints
            .insert("A".to_owned(), raw!("%", {"value": 1}));

        let error = definition.validate(&ConstraintRegistry::default()).unwrap_err();

        assert!(matches!(
            error,
            DefinitionError::Segment { source, .. }
                if matches!(*source, DefinitionError::Operand { source: ConstraintError::Validation { .. }, .. })
        ));
    }

    #[test]
    fn return_an_error_on_undefined_operands_in_the_expression() {
        let mut definition = a_definition();
        definition.segments[0].expression = "A ∩ C".to_owned();

        let error = definition.validate(&ConstraintRegistry::default()).unwrap_err();

        assert!(matches!(
            error,
            DefinitionError::Segment { source, .. }
                if matches!(*source, DefinitionError::Expression(ExpressionError::UndefinedOperand('C')))
        ));
    }

    #[test]
    fn return_an_error_on_invalid_variant_keys() {
        let mut definition = a_definition();
        definition.segments[0].variant = Variant::new("Green");

        let error = definition.validate(&ConstraintRegistry::default()).unwrap_err();

        assert!(matches!(
            error,
            DefinitionError::Segment { source, .. }
                if matches!(*source, DefinitionError::InvalidName { field: "variant key", .. })
        ));
    }

    #[test]
    fn can_convert_into_a_stored_flag() {
        let created_at = Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap();
        let definition = a_definition();
        let segments = definition.segments.clone();

        let flag = definition.into_flag(7, created_at).unwrap();

        assert_eq!(7, flag.id);
        assert_eq!("checkout.button.color", flag.flag);
        assert_eq!(created_at, flag.created_at);
        assert_eq!(None, flag.deleted_at);
        assert_eq!(vec!["checkout", "web.v2"], flag.decode_tags().unwrap());
        assert_eq!(segments, flag.decode_segments().unwrap());
    }

    #[test]
    fn store_no_tags_when_there_is_none() {
        let mut definition = a_definition();
        definition.tags.clear();

        let flag = definition.into_flag(7, Utc::now()).unwrap();

        assert_eq!(None, flag.tags);
    }
}
