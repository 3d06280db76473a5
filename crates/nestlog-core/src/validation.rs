//! Event payload validation.
//!
//! The sync engine only depends on the [`SchemaValidator`] contract; the
//! default [`SchemaRules`] encode the field rules of each event kind.

use std::fmt;

use chrono::NaiveDate;
use regex::Regex;
use serde_json::{Map, Value};

use crate::models::EventKind;

/// Messages describing why a payload was rejected
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationErrors(Vec<String>);

impl ValidationErrors {
    pub fn new(messages: Vec<String>) -> Self {
        Self(messages)
    }

    pub fn messages(&self) -> &[String] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    fn push(&mut self, path: &str, message: impl fmt::Display) {
        self.0.push(format!("{path}: {message}"));
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.join("; "))
    }
}

/// Schema collaborator consulted before anything reaches the local store
pub trait SchemaValidator: Send + Sync {
    /// Accept the payload, or describe every problem found.
    fn validate(&self, kind: EventKind, payload: &Value) -> Result<(), ValidationErrors>;
}

#[derive(Debug, Clone, Copy)]
enum Rule {
    Date,
    Time,
    OneOf(&'static [&'static str]),
    Integer { min: i64, max: i64 },
    Number { min: f64, max: f64 },
    Text { min_len: usize, max_len: usize },
    Bool,
}

#[derive(Debug, Clone, Copy)]
struct Field {
    name: &'static str,
    rule: Rule,
    required: bool,
    nullable: bool,
}

const fn required(name: &'static str, rule: Rule) -> Field {
    Field {
        name,
        rule,
        required: true,
        nullable: false,
    }
}

const fn optional(name: &'static str, rule: Rule) -> Field {
    Field {
        name,
        rule,
        required: false,
        nullable: true,
    }
}

const ANY_TEXT: Rule = Rule::Text {
    min_len: 0,
    max_len: usize::MAX,
};

const BASE_FIELDS: &[Field] = &[
    optional("id", ANY_TEXT),
    optional("user_id", ANY_TEXT),
    required("date", Rule::Date),
    optional("created_at", ANY_TEXT),
    optional("updated_at", ANY_TEXT),
];

const FEED_FIELDS: &[Field] = &[
    required("time", Rule::Time),
    required("method", Rule::OneOf(&["breast", "bottle"])),
    optional("amount", Rule::Integer { min: 1, max: 1000 }),
    optional("unit", Rule::OneOf(&["ml", "oz"])),
    optional("side", Rule::OneOf(&["left", "right"])),
    optional("duration_sec", Rule::Integer { min: 1, max: 7200 }),
    optional("milk_type", ANY_TEXT),
    optional("note", ANY_TEXT),
];

const DIAPER_FIELDS: &[Field] = &[
    required("time", Rule::Time),
    required("pee", Rule::Bool),
    required("poop", Rule::Bool),
    optional("note", ANY_TEXT),
];

const SLEEP_FIELDS: &[Field] = &[
    required("start", Rule::Time),
    required("end", Rule::Time),
    optional("note", ANY_TEXT),
];

const VITAMIN_FIELDS: &[Field] = &[
    required("time", Rule::Time),
    required(
        "name",
        Rule::Text {
            min_len: 1,
            max_len: 100,
        },
    ),
    optional("dose", ANY_TEXT),
    optional("note", ANY_TEXT),
];

const WEIGHT_FIELDS: &[Field] = &[
    required("time", Rule::Time),
    required("kg", Rule::Number { min: 0.5, max: 50.0 }),
    optional("note", ANY_TEXT),
];

const HEIGHT_FIELDS: &[Field] = &[
    required("time", Rule::Time),
    required(
        "cm",
        Rule::Number {
            min: 30.0,
            max: 150.0,
        },
    ),
    optional("note", ANY_TEXT),
];

const OTHER_FIELDS: &[Field] = &[
    required("time", Rule::Time),
    required(
        "note",
        Rule::Text {
            min_len: 1,
            max_len: usize::MAX,
        },
    ),
];

const fn kind_fields(kind: EventKind) -> &'static [Field] {
    match kind {
        EventKind::Feed => FEED_FIELDS,
        EventKind::Diaper => DIAPER_FIELDS,
        EventKind::Sleep => SLEEP_FIELDS,
        EventKind::Vitamin => VITAMIN_FIELDS,
        EventKind::Weight => WEIGHT_FIELDS,
        EventKind::Height => HEIGHT_FIELDS,
        EventKind::Other => OTHER_FIELDS,
    }
}

/// Built-in field rules for every event kind
#[derive(Debug, Clone)]
pub struct SchemaRules {
    date: Regex,
    time: Regex,
}

impl SchemaRules {
    pub fn new() -> Self {
        Self {
            date: Regex::new(r"^\d{4}-\d{2}-\d{2}$").expect("Invalid regex"),
            time: Regex::new(r"^\d{2}:\d{2}$").expect("Invalid regex"),
        }
    }

    fn check_field(&self, field: &Field, value: &Value, errors: &mut ValidationErrors) {
        let path = format!("/{}", field.name);
        if value.is_null() {
            if !field.nullable {
                errors.push(&path, "must not be null");
            }
            return;
        }

        match field.rule {
            Rule::Date => {
                let before = errors.0.len();
                self.check_pattern(&self.date, "YYYY-MM-DD", &path, value, errors);
                if errors.0.len() == before {
                    check_calendar_date(&path, value, errors);
                }
            }
            Rule::Time => self.check_pattern(&self.time, "HH:MM", &path, value, errors),
            Rule::OneOf(allowed) => match value.as_str() {
                Some(text) if allowed.contains(&text) => {}
                _ => errors.push(
                    &path,
                    format!("must be equal to one of the allowed values: {}", allowed.join(", ")),
                ),
            },
            Rule::Integer { min, max } => match value.as_i64() {
                Some(number) if number < min => errors.push(&path, format!("must be >= {min}")),
                Some(number) if number > max => errors.push(&path, format!("must be <= {max}")),
                Some(_) => {}
                None => errors.push(&path, "must be integer"),
            },
            Rule::Number { min, max } => match value.as_f64() {
                Some(number) if number < min => errors.push(&path, format!("must be >= {min}")),
                Some(number) if number > max => errors.push(&path, format!("must be <= {max}")),
                Some(_) => {}
                None => errors.push(&path, "must be number"),
            },
            Rule::Text { min_len, max_len } => match value.as_str() {
                Some(text) if text.chars().count() < min_len => errors.push(
                    &path,
                    format!("must NOT have fewer than {min_len} characters"),
                ),
                Some(text) if text.chars().count() > max_len => errors.push(
                    &path,
                    format!("must NOT have more than {max_len} characters"),
                ),
                Some(_) => {}
                None => errors.push(&path, "must be string"),
            },
            Rule::Bool => {
                if !value.is_boolean() {
                    errors.push(&path, "must be boolean");
                }
            }
        }
    }

    #[allow(clippy::unused_self)]
    fn check_pattern(
        &self,
        pattern: &Regex,
        label: &str,
        path: &str,
        value: &Value,
        errors: &mut ValidationErrors,
    ) {
        match value.as_str() {
            Some(text) if pattern.is_match(text) => {}
            Some(_) => errors.push(path, format!("must match format {label}")),
            None => errors.push(path, "must be string"),
        }
    }

    fn check_object(&self, kind: EventKind, object: &Map<String, Value>) -> ValidationErrors {
        let mut errors = ValidationErrors::default();
        let fields = BASE_FIELDS.iter().chain(kind_fields(kind));

        for field in fields.clone() {
            match object.get(field.name) {
                Some(value) => self.check_field(field, value, &mut errors),
                None if field.required => errors.push(
                    "root",
                    format!("must have required property '{}'", field.name),
                ),
                None => {}
            }
        }

        for key in object.keys() {
            if !fields.clone().any(|field| field.name == key.as_str()) {
                errors.push("root", format!("must NOT have additional property '{key}'"));
            }
        }

        errors
    }
}

fn check_calendar_date(path: &str, value: &Value, errors: &mut ValidationErrors) {
    if let Some(text) = value.as_str() {
        if NaiveDate::parse_from_str(text, "%Y-%m-%d").is_err() {
            errors.push(path, "must be a valid calendar date");
        }
    }
}

impl Default for SchemaRules {
    fn default() -> Self {
        Self::new()
    }
}

impl SchemaValidator for SchemaRules {
    fn validate(&self, kind: EventKind, payload: &Value) -> Result<(), ValidationErrors> {
        let Some(object) = payload.as_object() else {
            return Err(ValidationErrors::new(vec!["root: must be object".to_string()]));
        };

        let errors = self.check_object(kind, object);
        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}
