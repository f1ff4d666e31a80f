//! Tool-use plans and their parser.

use std::sync::LazyLock;

use regex::Regex;
use serde::Deserialize;
use serde_json::{Map, Value};

static FENCED_BLOCK_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"```(?i:json)?\s*([\s\S]+?)\s*```").unwrap());
static PLACEHOLDER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\{\{([^{}]+)\}\}$").unwrap());

/// An argument value of a plan step.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ArgValue {
    /// A value passed to the tool as is.
    Literal(Value),
    /// A reference to the output of an earlier step, written `{{name}}`.
    Placeholder(String),
}

impl ArgValue {
    /// Classifies a raw JSON argument.
    ///
    /// Only a string consisting of exactly `{{name}}` is a placeholder.
    /// Whitespace around the name is ignored.
    pub fn from_value(value: Value) -> Self {
        if let Value::String(s) = &value {
            if let Some(caps) = PLACEHOLDER_RE.captures(s) {
                let name = caps[1].trim();
                if !name.is_empty() {
                    return ArgValue::Placeholder(name.to_owned());
                }
            }
        }
        ArgValue::Literal(value)
    }

    /// Returns the value as it was written in the plan.
    pub fn to_value(&self) -> Value {
        match self {
            ArgValue::Literal(value) => value.clone(),
            ArgValue::Placeholder(name) => {
                Value::String(format!("{{{{{name}}}}}"))
            }
        }
    }
}

/// One tool invocation of a plan.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PlanStep {
    /// Name of the tool to call.
    pub name: String,
    /// Arguments in the order the model wrote them.
    pub arguments: Vec<(String, ArgValue)>,
}

impl PlanStep {
    /// Returns the argument named `key`, if any.
    pub fn argument(&self, key: &str) -> Option<&ArgValue> {
        self.arguments
            .iter()
            .find_map(|(k, v)| (k == key).then_some(v))
    }
}

/// An ordered list of tool invocations.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Plan {
    steps: Vec<PlanStep>,
}

impl Plan {
    /// Creates a plan from steps.
    #[inline]
    pub fn new(steps: Vec<PlanStep>) -> Self {
        Self { steps }
    }

    /// Returns the steps in execution order.
    #[inline]
    pub fn steps(&self) -> &[PlanStep] {
        &self.steps
    }

    /// Returns `true` if there is nothing to execute.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Parses the text of a planning completion.
    ///
    /// A fenced block, optionally tagged `json`, is preferred, otherwise the
    /// whole trimmed text is decoded. The payload must be a JSON array of
    /// `{"name": .., "arguments": {..}}` objects. Anything else yields an
    /// empty plan.
    pub fn parse(content: &str) -> Self {
        let content = content.trim();
        let payload = FENCED_BLOCK_RE
            .captures(content)
            .and_then(|caps| caps.get(1))
            .map_or(content, |m| m.as_str());

        let value: Value = match serde_json::from_str(payload) {
            Ok(value) => value,
            Err(err) => {
                warn!("failed to decode plan: {err}");
                return Self::default();
            }
        };
        if !value.is_array() {
            warn!("plan is not an array, ignoring it");
            return Self::default();
        }
        let raw_steps: Vec<RawStep> = match serde_json::from_value(value) {
            Ok(raw_steps) => raw_steps,
            Err(err) => {
                warn!("failed to decode plan steps: {err}");
                return Self::default();
            }
        };

        let steps = raw_steps
            .into_iter()
            .map(|raw| PlanStep {
                name: raw.name,
                arguments: raw
                    .arguments
                    .unwrap_or_default()
                    .into_iter()
                    .map(|(k, v)| (k, ArgValue::from_value(v)))
                    .collect(),
            })
            .collect();
        Self { steps }
    }
}

#[derive(Deserialize)]
struct RawStep {
    name: String,
    #[serde(default)]
    arguments: Option<Map<String, Value>>,
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    const PLAN_JSON: &str = r#"[
        {"name": "search_google", "arguments": {"query": "流感", "num": 5}},
        {"name": "analyze_sentiment", "arguments": {"text": "{{search_google}}"}}
    ]"#;

    #[test]
    fn test_parse_plain() {
        let plan = Plan::parse(PLAN_JSON);
        assert_eq!(
            plan.steps(),
            [
                PlanStep {
                    name: "search_google".to_owned(),
                    arguments: vec![
                        (
                            "query".to_owned(),
                            ArgValue::Literal(json!("流感"))
                        ),
                        ("num".to_owned(), ArgValue::Literal(json!(5))),
                    ],
                },
                PlanStep {
                    name: "analyze_sentiment".to_owned(),
                    arguments: vec![(
                        "text".to_owned(),
                        ArgValue::Placeholder("search_google".to_owned())
                    )],
                },
            ]
        );
    }

    #[test]
    fn test_parse_fenced() {
        let plain = Plan::parse(PLAN_JSON);
        let tagged = Plan::parse(&format!(
            "Here is the plan:\n```json\n{PLAN_JSON}\n```\nDone."
        ));
        let untagged = Plan::parse(&format!("```\n{PLAN_JSON}\n```"));
        assert_eq!(plain, tagged);
        assert_eq!(plain, untagged);
        assert_eq!(plain.steps().len(), 2);
    }

    #[test]
    fn test_parse_fence_tag_case() {
        let plan = Plan::parse("```JSON\n[{\"name\":\"A\"}]\n```");
        assert_eq!(plan.steps().len(), 1);
        assert_eq!(plan.steps()[0].name, "A");
    }

    #[test]
    fn test_placeholder_whitespace() {
        let plan = Plan::parse(
            r#"[{"name":"A"},{"name":"B","arguments":{"x":"{{ A }}","y":"{{A }}","z":"{{  }}"}}]"#,
        );
        let step = &plan.steps()[1];
        assert_eq!(
            step.argument("x"),
            Some(&ArgValue::Placeholder("A".to_owned()))
        );
        assert_eq!(
            step.argument("y"),
            Some(&ArgValue::Placeholder("A".to_owned()))
        );
        assert_eq!(
            step.argument("z"),
            Some(&ArgValue::Literal(json!("{{  }}")))
        );
    }

    #[test]
    fn test_parse_invalid() {
        assert!(Plan::parse("I cannot help with that.").is_empty());
        assert!(Plan::parse("```json\n[{\"name\": \n```").is_empty());
        assert!(Plan::parse("").is_empty());
    }

    #[test]
    fn test_parse_non_array() {
        assert!(Plan::parse(r#"{"name": "search_google"}"#).is_empty());
        assert!(Plan::parse("42").is_empty());
    }

    #[test]
    fn test_parse_malformed_steps() {
        assert!(Plan::parse(r#"[{"name": "a"}, "b"]"#).is_empty());
        assert!(Plan::parse(r#"[{"arguments": {}}]"#).is_empty());
        assert!(Plan::parse(r#"[{"name": "a", "arguments": []}]"#).is_empty());
    }

    #[test]
    fn test_missing_arguments() {
        let plan = Plan::parse(r#"[{"name": "a"}, {"name": "b", "arguments": null}]"#);
        assert_eq!(plan.steps().len(), 2);
        assert!(plan.steps().iter().all(|step| step.arguments.is_empty()));
    }

    #[test]
    fn test_placeholder_form() {
        assert_eq!(
            ArgValue::from_value(json!("{{A}}")),
            ArgValue::Placeholder("A".to_owned())
        );
        for literal in [
            json!(" {{A}}"),
            json!("{{A}} and more"),
            json!("{{}}"),
            json!("{A}"),
            json!(["{{A}}"]),
        ] {
            assert_eq!(
                ArgValue::from_value(literal.clone()),
                ArgValue::Literal(literal)
            );
        }
        assert_eq!(
            ArgValue::Placeholder("A".to_owned()).to_value(),
            json!("{{A}}")
        );
    }
}
