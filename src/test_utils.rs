pub mod constraints {
    use crate::{constraints::Constraint, model::RawConstraint, registry::ConstraintRegistry};

    macro_rules! raw {
        ($name:expr) => {
            $crate::model::RawConstraint::new($name, serde_json::Value::Null)
        };
        ($name:expr, $($parameters:tt)+) => {
            $crate::model::RawConstraint::new($name, serde_json::json!($($parameters)+))
        };
    }

    pub fn build(raw: RawConstraint) -> Constraint {
        ConstraintRegistry::default().new_constraint(&raw).unwrap()
    }

    pub(crate) use raw;
}

pub mod entities {
    macro_rules! entity {
        ($id:expr) => {
            $crate::entity::Entity::new($id, "user")
        };
        ($id:expr, $kind:expr) => {
            $crate::entity::Entity::new($id, $kind)
        };
        ($id:expr, $kind:expr, { $($key:expr => $value:expr),* $(,)? }) => {
            $crate::entity::Entity::new($id, $kind)$(.with_context($key, $value))*
        };
    }

    pub(crate) use entity;
}

pub mod flags {
    use crate::model::Flag;
    use chrono::{TimeZone, Utc};
    use serde_json::Value;

    pub fn flag(id: i64, name: &str, segments: Value) -> Flag {
        Flag {
            id,
            tags: None,
            description: format!("{name} description"),
            flag: name.to_owned(),
            segments: segments.to_string(),
            created_at: Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap(),
            deleted_at: None,
        }
    }

    pub fn undecodable_flag(id: i64, name: &str) -> Flag {
        Flag {
            segments: "{not json".to_owned(),
            ..flag(id, name, Value::Null)
        }
    }
}
