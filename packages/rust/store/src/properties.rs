//! Document properties: the typed metadata columns of a collection entry.

use std::collections::BTreeMap;

use lingoflow_blocks::{TextSpan, parse_rich_text, spans_to_json};
use lingoflow_shared::{LingoflowError, Result};
use serde_json::{Value, json};
use tracing::debug;

/// Property name → value, ordered by name for stable request bodies.
pub type Properties = BTreeMap<String, PropertyValue>;

/// One property value. Types outside this set are skipped when reading.
#[derive(Debug, Clone, PartialEq)]
pub enum PropertyValue {
    Title(Vec<TextSpan>),
    RichText(Vec<TextSpan>),
    Select(Option<String>),
    MultiSelect(Vec<String>),
    Url(Option<String>),
    Checkbox(bool),
    /// ISO-8601 start date.
    Date(Option<String>),
}

impl PropertyValue {
    /// A title holding one plain span.
    pub fn title(text: impl Into<String>) -> Self {
        Self::Title(vec![TextSpan::plain(text)])
    }

    /// A rich-text value holding one plain span.
    pub fn text(text: impl Into<String>) -> Self {
        Self::RichText(vec![TextSpan::plain(text)])
    }

    pub fn select(name: impl Into<String>) -> Self {
        Self::Select(Some(name.into()))
    }

    pub fn multi_select<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::MultiSelect(names.into_iter().map(Into::into).collect())
    }

    /// Text form of the value: concatenated spans, the select name, or the URL.
    pub fn plain_text(&self) -> Option<String> {
        match self {
            Self::Title(spans) | Self::RichText(spans) => {
                Some(spans.iter().map(|s| s.content.as_str()).collect())
            }
            Self::Select(name) => name.clone(),
            Self::Url(url) => url.clone(),
            Self::Date(start) => start.clone(),
            Self::MultiSelect(_) | Self::Checkbox(_) => None,
        }
    }

    /// Option names of a multi-select; empty for every other type.
    pub fn names(&self) -> &[String] {
        match self {
            Self::MultiSelect(names) => names,
            _ => &[],
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Checkbox(b) => Some(*b),
            _ => None,
        }
    }

    /// Encode for a create/update request.
    pub fn to_json(&self) -> Value {
        match self {
            Self::Title(spans) => json!({ "title": spans_to_json(spans) }),
            Self::RichText(spans) => json!({ "rich_text": spans_to_json(spans) }),
            Self::Select(name) => json!({ "select": name.as_ref().map(|n| json!({ "name": n })) }),
            Self::MultiSelect(names) => json!({
                "multi_select": names.iter().map(|n| json!({ "name": n })).collect::<Vec<_>>()
            }),
            Self::Url(url) => json!({ "url": url }),
            Self::Checkbox(b) => json!({ "checkbox": b }),
            Self::Date(start) => json!({ "date": start.as_ref().map(|s| json!({ "start": s })) }),
        }
    }

    /// Decode one property object. Returns `Ok(None)` for unsupported types.
    pub fn from_json(value: &Value) -> Result<Option<Self>> {
        let kind = value
            .get("type")
            .and_then(Value::as_str)
            .ok_or_else(|| LingoflowError::parse("property without type"))?;
        let payload = value.get(kind).unwrap_or(&Value::Null);

        let parsed = match kind {
            "title" => Self::Title(parse_rich_text(as_array(payload))?),
            "rich_text" => Self::RichText(parse_rich_text(as_array(payload))?),
            "select" => Self::Select(option_name(payload)),
            "multi_select" => Self::MultiSelect(
                as_array(payload)
                    .iter()
                    .filter_map(option_name)
                    .collect(),
            ),
            "url" => Self::Url(payload.as_str().map(str::to_string)),
            "checkbox" => Self::Checkbox(payload.as_bool().unwrap_or(false)),
            "date" => Self::Date(
                payload
                    .get("start")
                    .and_then(Value::as_str)
                    .map(str::to_string),
            ),
            other => {
                debug!(property_type = other, "skipping unsupported property type");
                return Ok(None);
            }
        };
        Ok(Some(parsed))
    }
}

fn as_array(value: &Value) -> &[Value] {
    value.as_array().map(Vec::as_slice).unwrap_or(&[])
}

fn option_name(value: &Value) -> Option<String> {
    value.get("name").and_then(Value::as_str).map(str::to_string)
}

/// Decode a page's `properties` object.
pub fn parse_properties(value: &Value) -> Result<Properties> {
    let object = value
        .as_object()
        .ok_or_else(|| LingoflowError::parse("properties is not an object"))?;

    let mut props = Properties::new();
    for (name, raw) in object {
        if let Some(parsed) = PropertyValue::from_json(raw)? {
            props.insert(name.clone(), parsed);
        }
    }
    Ok(props)
}

/// Encode properties for a create/update request body.
pub fn properties_to_json(props: &Properties) -> Value {
    Value::Object(
        props
            .iter()
            .map(|(name, value)| (name.clone(), value.to_json()))
            .collect(),
    )
}

/// Text of property `name`, if present and non-empty.
pub fn text_of(props: &Properties, name: &str) -> Option<String> {
    props
        .get(name)
        .and_then(PropertyValue::plain_text)
        .filter(|s| !s.trim().is_empty())
}
