//! # Process Rules
//!
//! Conditional field derivation applied to every record before rendering.
//!
//! A rule reads: *if the value in `key` `comparator` `value`, set `new_key`
//! to `content`*. Rules run in list order against a working copy of each
//! record, so later rules see fields added by earlier ones. The rule list is
//! always applied to the pristine original records; nothing from a previous
//! application carries over.
//!
//! ## Comparators
//!
//! | Token | Meaning |
//! |-------|---------|
//! | `=` / `!=` | loose (in)equality; numeric when both sides are numbers |
//! | `~` / `!~` | substring (not) contained in the field's text |
//! | `>` `<` `>=` `<=` | numeric when both sides parse as numbers, lexical otherwise |
//! | `null` / `not null` | field absent, `null`, or empty string (or not) |
//! | `custom` | `content` is an [`expr`] expression of `value`; its result is stored |
//!
//! A missing or `null` field never satisfies `=` or a relational comparator.

pub mod expr;

use log::{debug, warn};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::cmp::Ordering;

use crate::binding::lookup;
use crate::record::Record;
use expr::{Expr, loose_cmp, loose_eq};

/// How a rule compares the source field against its operand.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Comparator {
    #[default]
    #[serde(rename = "=")]
    Eq,
    #[serde(rename = "!=")]
    Ne,
    #[serde(rename = "~")]
    Contains,
    #[serde(rename = "!~")]
    NotContains,
    #[serde(rename = ">")]
    Gt,
    #[serde(rename = "<")]
    Lt,
    #[serde(rename = ">=")]
    Ge,
    #[serde(rename = "<=")]
    Le,
    #[serde(rename = "null")]
    Null,
    #[serde(rename = "not null")]
    NotNull,
    #[serde(rename = "custom")]
    Custom,
}

impl Comparator {
    /// Every comparator in editor display order.
    pub const ALL: [Comparator; 11] = [
        Comparator::Eq,
        Comparator::Ne,
        Comparator::Contains,
        Comparator::NotContains,
        Comparator::Gt,
        Comparator::Lt,
        Comparator::Ge,
        Comparator::Le,
        Comparator::Null,
        Comparator::NotNull,
        Comparator::Custom,
    ];

    /// The token used in template files.
    pub fn token(self) -> &'static str {
        match self {
            Comparator::Eq => "=",
            Comparator::Ne => "!=",
            Comparator::Contains => "~",
            Comparator::NotContains => "!~",
            Comparator::Gt => ">",
            Comparator::Lt => "<",
            Comparator::Ge => ">=",
            Comparator::Le => "<=",
            Comparator::Null => "null",
            Comparator::NotNull => "not null",
            Comparator::Custom => "custom",
        }
    }

    /// Parse a comparator token.
    pub fn from_token(token: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.token() == token.trim())
    }

    /// Evaluate a standard comparator. `source` is `None` for a missing field.
    ///
    /// `Custom` never matches here; it is applied through [`expr`].
    pub fn matches(self, source: Option<&Value>, operand: &str) -> bool {
        let source = source.filter(|v| !v.is_null());
        let operand_value = Value::String(operand.to_string());
        let text = || source.map(crate::record::value_to_string).unwrap_or_default();
        let ordering = || source.and_then(|v| loose_cmp(v, &operand_value));

        match self {
            Comparator::Eq => source.is_some_and(|v| loose_eq(v, &operand_value)),
            Comparator::Ne => !source.is_some_and(|v| loose_eq(v, &operand_value)),
            Comparator::Contains => text().contains(operand),
            Comparator::NotContains => !text().contains(operand),
            Comparator::Gt => ordering() == Some(Ordering::Greater),
            Comparator::Lt => ordering() == Some(Ordering::Less),
            Comparator::Ge => matches!(ordering(), Some(Ordering::Greater | Ordering::Equal)),
            Comparator::Le => matches!(ordering(), Some(Ordering::Less | Ordering::Equal)),
            Comparator::Null => is_nullish(source),
            Comparator::NotNull => !is_nullish(source),
            Comparator::Custom => false,
        }
    }
}

fn is_nullish(source: Option<&Value>) -> bool {
    match source {
        None | Some(Value::Null) => true,
        Some(Value::String(s)) => s.is_empty(),
        Some(_) => false,
    }
}

/// One conditional field-derivation rule.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ProcessRule {
    /// Source field.
    pub key: String,
    pub comparator: Comparator,
    /// Comparison operand.
    pub value: String,
    /// Field to set when the rule matches.
    pub new_key: String,
    /// Literal to assign, or the expression for `custom`.
    pub content: String,
}

impl ProcessRule {
    /// Human-readable sentence, as shown in the rules editor.
    pub fn describe(&self) -> String {
        let or = |s: &str, placeholder: &str| {
            if s.is_empty() { placeholder.to_string() } else { s.to_string() }
        };
        let mut content = self.content.clone();
        if content.chars().count() > 20 {
            let chars: Vec<char> = content.chars().collect();
            let head: String = chars[..10].iter().collect();
            let tail: String = chars[chars.len() - 10..].iter().collect();
            content = format!("{}..{}", head, tail);
        }
        format!(
            "If the value contained in the key {} {} {}, add a new key named {} with the following content {}",
            or(&self.key, "<key>"),
            self.comparator.token(),
            or(&self.value, "<value>"),
            or(&self.new_key, "<new_key>"),
            or(&content, "<content>"),
        )
    }

    /// Apply this rule to one working record.
    ///
    /// `compiled` is the pre-parsed expression for custom rules (or the parse
    /// error). Returns whether the record changed.
    fn apply(&self, record: &mut Record, compiled: Option<&Result<Expr, expr::ExprError>>) -> bool {
        if self.new_key.is_empty() {
            debug!("[rules] skipping rule on '{}' with no target field", self.key);
            return false;
        }

        let source = record.get(&self.key);

        if self.comparator == Comparator::Custom {
            let param = source.cloned().unwrap_or(Value::Null);
            let result = match compiled {
                Some(Ok(expr)) => expr.eval(&param),
                Some(Err(e)) => Err(e.clone()),
                None => expr::evaluate(&self.content, &param),
            };
            return match result {
                Ok(derived) => {
                    record.insert(self.new_key.clone(), derived);
                    true
                }
                Err(e) => {
                    warn!(
                        "[rules] custom rule '{}' -> '{}' failed for value {:?}: {}",
                        self.key,
                        self.new_key,
                        lookup(record, &self.key),
                        e
                    );
                    false
                }
            };
        }

        if self.comparator.matches(source, &self.value) {
            record.insert(self.new_key.clone(), Value::String(self.content.clone()));
            true
        } else {
            false
        }
    }
}

/// Derive working records from the originals.
///
/// Pure: the output depends only on `original` and `rules`, so calling it
/// twice with the same inputs yields identical records.
pub fn apply_rules(original: &[Record], rules: &[ProcessRule]) -> Vec<Record> {
    // Parse each custom expression once for the whole batch.
    let compiled: Vec<Option<Result<Expr, expr::ExprError>>> = rules
        .iter()
        .map(|r| (r.comparator == Comparator::Custom).then(|| Expr::parse(&r.content)))
        .collect();

    original
        .iter()
        .map(|record| {
            let mut working = record.clone();
            for (rule, compiled) in rules.iter().zip(&compiled) {
                rule.apply(&mut working, compiled.as_ref());
            }
            working
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn records(value: Value) -> Vec<Record> {
        crate::record::records_from_value(value).unwrap()
    }

    fn rule(key: &str, comparator: Comparator, value: &str, new_key: &str, content: &str) -> ProcessRule {
        ProcessRule {
            key: key.into(),
            comparator,
            value: value.into(),
            new_key: new_key.into(),
            content: content.into(),
        }
    }

    #[test]
    fn greater_than_tags_strong_cards() {
        let original = records(json!([{"hp": "80"}, {"hp": "20"}]));
        let rules = vec![rule("hp", Comparator::Gt, "50", "tier", "strong")];
        let derived = apply_rules(&original, &rules);
        assert_eq!(Value::Array(derived.into_iter().map(Value::Object).collect()),
            json!([{"hp": "80", "tier": "strong"}, {"hp": "20"}]));
    }

    #[test]
    fn relational_is_numeric_when_both_parse() {
        // lexically "9" > "10", numerically it is not
        assert!(!Comparator::Gt.matches(Some(&json!("9")), "10"));
        assert!(Comparator::Lt.matches(Some(&json!(9)), "10"));
        assert!(Comparator::Ge.matches(Some(&json!("10")), "10.0"));
        assert!(Comparator::Le.matches(Some(&json!("apple")), "banana"));
        assert!(!Comparator::Gt.matches(None, "0"));
        assert!(!Comparator::Lt.matches(Some(&Value::Null), "0"));
    }

    #[test]
    fn equality_and_containment() {
        assert!(Comparator::Eq.matches(Some(&json!(5)), "5"));
        assert!(Comparator::Eq.matches(Some(&json!("fire")), "fire"));
        assert!(!Comparator::Eq.matches(None, ""));
        assert!(Comparator::Ne.matches(None, "x"));
        assert!(Comparator::Contains.matches(Some(&json!(["fire", "air"])), "air"));
        assert!(Comparator::NotContains.matches(Some(&json!("water")), "fire"));
        assert!(Comparator::NotContains.matches(None, "fire"));
    }

    #[test]
    fn null_checks() {
        assert!(Comparator::Null.matches(None, ""));
        assert!(Comparator::Null.matches(Some(&json!("")), ""));
        assert!(Comparator::Null.matches(Some(&Value::Null), ""));
        assert!(!Comparator::Null.matches(Some(&json!(0)), ""));
        assert!(Comparator::NotNull.matches(Some(&json!("x")), ""));
    }

    #[test]
    fn later_rules_see_earlier_additions() {
        let original = records(json!([{"hp": "80"}]));
        let rules = vec![
            rule("hp", Comparator::Gt, "50", "tier", "strong"),
            rule("tier", Comparator::Eq, "strong", "frame", "gold.png"),
        ];
        let derived = apply_rules(&original, &rules);
        assert_eq!(derived[0]["frame"], "gold.png");
    }

    #[test]
    fn each_matching_rule_overwrites() {
        let original = records(json!([{"hp": "80"}]));
        let rules = vec![
            rule("hp", Comparator::NotNull, "", "tier", "any"),
            rule("hp", Comparator::Gt, "50", "tier", "strong"),
        ];
        assert_eq!(apply_rules(&original, &rules)[0]["tier"], "strong");
    }

    #[test]
    fn deterministic_and_recomputed_from_originals() {
        let original = records(json!([{"hp": "80"}, {"hp": "20"}]));
        let rules = vec![rule("hp", Comparator::Gt, "50", "tier", "strong")];
        let first = apply_rules(&original, &rules);
        assert_eq!(apply_rules(&original, &rules), first);

        // Editing the rule's target field leaves no trace of the old one
        let edited = vec![rule("hp", Comparator::Gt, "50", "rank", "strong")];
        let second = apply_rules(&original, &edited);
        assert!(second.iter().all(|r| !r.contains_key("tier")));
        assert_eq!(second[0]["rank"], "strong");
        // Originals are untouched
        assert!(!original[0].contains_key("tier"));
    }

    #[test]
    fn custom_rule_assigns_expression_result() {
        let original = records(json!([{"hp": "80"}, {"hp": "20"}]));
        let rules = vec![rule("hp", Comparator::Custom, "", "double", "value * 2")];
        let derived = apply_rules(&original, &rules);
        assert_eq!(derived[0]["double"], json!(160));
        assert_eq!(derived[1]["double"], json!(40));
    }

    #[test_log::test]
    fn failing_custom_rule_leaves_record_unchanged() {
        let original = records(json!([{"hp": "lots"}, {"hp": "3"}]));
        let rules = vec![rule("hp", Comparator::Custom, "", "double", "value * 2")];
        let derived = apply_rules(&original, &rules);
        assert_eq!(derived[0], original[0]);
        assert_eq!(derived[1]["double"], json!(6));

        let broken = vec![rule("hp", Comparator::Custom, "", "x", "value +")];
        assert_eq!(apply_rules(&original, &broken), original);
    }

    #[test_log::test]
    fn runaway_custom_rule_is_rejected() {
        let original = records(json!([{"name": "a"}]));
        let content = (0..24).fold("value".to_string(), |inner, _| format!("replace({}, 'a', 'aa')", inner));
        let rules = vec![rule("name", Comparator::Custom, "", "name", &content)];
        assert_eq!(apply_rules(&original, &rules), original);
    }

    #[test]
    fn rules_without_target_are_skipped() {
        let original = records(json!([{"hp": "80"}]));
        let rules = vec![rule("", Comparator::Null, "", "", "")];
        assert_eq!(apply_rules(&original, &rules), original);
    }

    #[test]
    fn comparator_tokens_round_trip() {
        for c in Comparator::ALL {
            assert_eq!(Comparator::from_token(c.token()), Some(c));
            let json = serde_json::to_string(&c).unwrap();
            assert_eq!(json, format!("\"{}\"", c.token()));
        }
        assert_eq!(Comparator::from_token("=="), None);
    }

    #[test]
    fn describe_truncates_long_content() {
        let r = rule("hp", Comparator::Gt, "50", "tier", "abcdefghijklmnopqrstuvwxyz");
        assert_eq!(
            r.describe(),
            "If the value contained in the key hp > 50, add a new key named tier with the following content abcdefghij..qrstuvwxyz"
        );
        assert!(ProcessRule::default().describe().contains("<key> = <value>"));
    }
}
