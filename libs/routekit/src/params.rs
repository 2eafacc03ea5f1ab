//! Parameter validation and type coercion.

use chrono::{DateTime, NaiveDate, NaiveDateTime, SecondsFormat, Utc};
use regex::Regex;
use serde_json::{Number, Value};
use thiserror::Error;

use crate::error::{ConfigError, ValidationError};
use crate::schema::{Message, ParamDef, ParamEntry, ParamSchema, ParamType, SharedDefines};

/// Value stored for `date` parameters that cannot be parsed.
pub const INVALID_DATE: &str = "Invalid Date";

/// A declared parameter with its alias resolved and pattern compiled.
#[derive(Debug, Clone)]
pub struct ResolvedParam {
    pub name: String,
    pub def: ParamDef,
    pattern: Option<Regex>,
}

impl ResolvedParam {
    #[must_use]
    pub fn kind(&self) -> Option<&ParamType> {
        self.def.kind.as_ref()
    }

    #[must_use]
    pub fn pattern(&self) -> Option<&Regex> {
        self.pattern.as_ref()
    }
}

/// Parameter schema ready for validation.
#[derive(Debug, Clone, Default)]
pub struct ResolvedSchema {
    params: Vec<ResolvedParam>,
}

impl ParamSchema {
    /// Resolve `$alias` entries against `defines` and compile patterns.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::UnresolvedAlias`] for aliases missing from the
    /// defines block and [`ConfigError::InvalidPattern`] for bad regexes.
    pub fn resolve(&self, defines: &SharedDefines, route: &str) -> Result<ResolvedSchema, ConfigError> {
        let mut params = Vec::with_capacity(self.len());
        for slot in self.iter() {
            let def = match &slot.entry {
                ParamEntry::Inline(def) => def.clone(),
                ParamEntry::Alias(alias) => defines.params.get(alias).cloned().ok_or_else(|| {
                    ConfigError::UnresolvedAlias {
                        route: route.to_owned(),
                        param: alias.clone(),
                    }
                })?,
            };
            let pattern = def
                .validation
                .as_deref()
                .map(Regex::new)
                .transpose()
                .map_err(|source| ConfigError::InvalidPattern {
                    route: route.to_owned(),
                    param: slot.name.clone(),
                    source,
                })?;
            params.push(ResolvedParam {
                name: slot.name.clone(),
                def,
                pattern,
            });
        }
        Ok(ResolvedSchema { params })
    }
}

impl ResolvedSchema {
    pub fn iter(&self) -> impl Iterator<Item = &ResolvedParam> {
        self.params.iter()
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&ResolvedParam> {
        self.params.iter().find(|p| p.name == name)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.params.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }

    /// Check `message` against the schema, writing trimmed and coerced values
    /// back in place. Stops at the first failing parameter.
    ///
    /// # Errors
    ///
    /// Returns the [`ValidationError`] of the first failing parameter.
    pub fn validate(&self, message: &mut Message) -> Result<(), ValidationError> {
        for param in &self.params {
            let Some(raw) = message.get(&param.name) else {
                if param.def.required {
                    return Err(ValidationError::EmptyRequired {
                        param: param.name.clone(),
                    });
                }
                continue;
            };

            let value = trimmed(raw);
            if is_empty(&value) {
                if param.def.required {
                    return Err(ValidationError::EmptyRequired {
                        param: param.name.clone(),
                    });
                }
                continue;
            }

            if let Some(pattern) = &param.pattern {
                let text = text_of(&value);
                if !pattern.is_match(&text) {
                    return Err(ValidationError::PatternMismatch {
                        param: param.name.clone(),
                        value: text,
                    });
                }
            }

            let value = coerce(&param.name, param.kind(), value)?;
            message.insert(param.name.clone(), value);
        }
        Ok(())
    }
}

/// Failure of [`validate`].
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ParamError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Validation(#[from] ValidationError),
}

/// Resolve `schema` and validate `message` against it in one step.
///
/// # Errors
///
/// Returns [`ParamError::Config`] if the schema does not resolve and
/// [`ParamError::Validation`] if the message is invalid.
pub fn validate(
    message: &mut Message,
    schema: &ParamSchema,
    defines: &SharedDefines,
) -> Result<(), ParamError> {
    schema.resolve(defines, "<inline>")?.validate(message)?;
    Ok(())
}

fn trimmed(value: &Value) -> Value {
    match value {
        Value::String(s) => Value::String(s.trim().to_owned()),
        other => other.clone(),
    }
}

fn is_empty(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.is_empty(),
        _ => false,
    }
}

/// String form used for pattern checks, error messages and query or form
/// values. Whole-valued floats print without a fraction (`7.0` as `7`).
#[must_use]
pub fn text_of(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) if n.is_f64() => n
            .as_f64()
            .filter(|f| f.fract() == 0.0 && f.abs() < 1e15)
            .and_then(truncate)
            .map_or_else(|| n.to_string(), |i| i.to_string()),
        other => other.to_string(),
    }
}

fn coerce(name: &str, kind: Option<&ParamType>, value: Value) -> Result<Value, ValidationError> {
    let not_a_number = |value: &Value| ValidationError::NotANumber {
        param: name.to_owned(),
        value: text_of(value),
    };

    match kind {
        Some(ParamType::Number) => to_integer(&value).ok_or_else(|| not_a_number(&value)),
        Some(ParamType::Float) => to_float(&value).ok_or_else(|| not_a_number(&value)),
        Some(ParamType::Json) => {
            if let Value::String(s) = &value {
                return serde_json::from_str(s).map_err(|_| ValidationError::InvalidJson {
                    param: name.to_owned(),
                    value: s.clone(),
                });
            }
            Ok(value)
        }
        Some(ParamType::Date) => Ok(to_date(&value)),
        _ => Ok(value),
    }
}

fn to_integer(value: &Value) -> Option<Value> {
    match value {
        Value::String(s) => integer_prefix(s).map(Value::from),
        Value::Number(n) if n.is_i64() || n.is_u64() => Some(value.clone()),
        Value::Number(n) => n.as_f64().and_then(truncate).map(Value::from),
        _ => None,
    }
}

#[allow(clippy::cast_possible_truncation, clippy::cast_precision_loss)]
fn truncate(f: f64) -> Option<i64> {
    let t = f.trunc();
    (t.is_finite() && t >= i64::MIN as f64 && t <= i64::MAX as f64).then_some(t as i64)
}

fn to_float(value: &Value) -> Option<Value> {
    let f = match value {
        Value::String(s) => float_prefix(s)?,
        Value::Number(n) => n.as_f64()?,
        _ => return None,
    };
    Number::from_f64(f).map(Value::Number)
}

/// Leading `[+-]digits` of `s`.
fn integer_prefix(s: &str) -> Option<i64> {
    let bytes = s.as_bytes();
    let start = usize::from(matches!(bytes.first(), Some(b'+' | b'-')));
    let end = start + digits_at(bytes, start);
    if end == start {
        return None;
    }
    s[..end].parse().ok()
}

/// Leading `[+-]digits[.digits][e[+-]digits]` of `s`.
fn float_prefix(s: &str) -> Option<f64> {
    let bytes = s.as_bytes();
    let mut end = usize::from(matches!(bytes.first(), Some(b'+' | b'-')));
    let int_digits = digits_at(bytes, end);
    end += int_digits;

    let mut frac_digits = 0;
    if bytes.get(end) == Some(&b'.') {
        frac_digits = digits_at(bytes, end + 1);
        if int_digits + frac_digits > 0 {
            end += 1 + frac_digits;
        }
    }
    if int_digits + frac_digits == 0 {
        return None;
    }

    if matches!(bytes.get(end), Some(b'e' | b'E')) {
        let mut exp = end + 1;
        if matches!(bytes.get(exp), Some(b'+' | b'-')) {
            exp += 1;
        }
        let exp_digits = digits_at(bytes, exp);
        if exp_digits > 0 {
            end = exp + exp_digits;
        }
    }

    s[..end].parse::<f64>().ok().filter(|f| f.is_finite())
}

fn digits_at(bytes: &[u8], from: usize) -> usize {
    bytes
        .get(from..)
        .map_or(0, |rest| rest.iter().take_while(|b| b.is_ascii_digit()).count())
}

fn to_date(value: &Value) -> Value {
    let parsed = match value {
        Value::String(s) => parse_date(s),
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().and_then(truncate))
            .and_then(DateTime::from_timestamp_millis),
        _ => None,
    };
    Value::String(parsed.map_or_else(
        || INVALID_DATE.to_owned(),
        |d| d.to_rfc3339_opts(SecondsFormat::Millis, true),
    ))
}

fn parse_date(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(d) = DateTime::parse_from_rfc3339(s) {
        return Some(d.with_timezone(&Utc));
    }
    if let Ok(d) = DateTime::parse_from_rfc2822(s) {
        return Some(d.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%dT%H:%M"] {
        if let Ok(d) = NaiveDateTime::parse_from_str(s, format) {
            return Some(d.and_utc());
        }
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|d| d.and_utc())
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use serde_json::json;

    fn message(value: Value) -> Message {
        match value {
            Value::Object(map) => map,
            _ => unreachable!(),
        }
    }

    fn schema(name: &str, def: ParamDef) -> ResolvedSchema {
        ParamSchema::new()
            .with(name, def)
            .resolve(&SharedDefines::default(), "test")
            .unwrap()
    }

    #[test]
    fn number_parses_integer_prefix() {
        let s = schema("page", ParamDef::of_type(ParamType::Number));
        for (input, expected) in [(json!("42"), 42), (json!(" 42px "), 42), (json!(-7), -7), (json!(3.9), 3)] {
            let mut msg = message(json!({ "page": input }));
            s.validate(&mut msg).unwrap();
            assert_eq!(msg["page"], json!(expected));
        }
    }

    #[test]
    fn number_rejects_non_numeric() {
        let s = schema("page", ParamDef::of_type(ParamType::Number));
        let mut msg = message(json!({ "page": "abc" }));
        let err = s.validate(&mut msg).unwrap_err();
        assert_eq!(
            err,
            ValidationError::NotANumber {
                param: "page".into(),
                value: "abc".into()
            }
        );
        assert_eq!(msg["page"], json!("abc"));
    }

    #[test]
    fn float_parses_decimal_prefix() {
        let s = schema("ratio", ParamDef::of_type(ParamType::Float));
        for (input, expected) in [
            (json!("1.5"), 1.5),
            (json!("2.5e2x"), 250.0),
            (json!(".25"), 0.25),
            (json!("7."), 7.0),
            (json!(0.5), 0.5),
        ] {
            let mut msg = message(json!({ "ratio": input }));
            s.validate(&mut msg).unwrap();
            assert_eq!(msg["ratio"], json!(expected));
        }

        let mut msg = message(json!({ "ratio": "." }));
        assert!(matches!(s.validate(&mut msg), Err(ValidationError::NotANumber { .. })));
    }

    #[test]
    fn whole_floats_print_without_fraction() {
        let s = schema("ratio", ParamDef::of_type(ParamType::Float));
        let mut msg = message(json!({ "ratio": "7" }));
        s.validate(&mut msg).unwrap();
        assert_eq!(text_of(&msg["ratio"]), "7");

        assert_eq!(text_of(&json!(-3.0)), "-3");
        assert_eq!(text_of(&json!(1.5)), "1.5");
        assert_eq!(text_of(&json!(42)), "42");
    }

    #[test]
    fn json_strings_are_parsed() {
        let s = schema("filter", ParamDef::of_type(ParamType::Json));
        let mut msg = message(json!({ "filter": "{\"a\": [1, 2]}" }));
        s.validate(&mut msg).unwrap();
        assert_eq!(msg["filter"], json!({"a": [1, 2]}));

        let mut msg = message(json!({ "filter": "{oops" }));
        assert!(matches!(s.validate(&mut msg), Err(ValidationError::InvalidJson { .. })));
    }

    #[test]
    fn dates_normalize_or_become_sentinel() {
        let s = schema("since", ParamDef::of_type(ParamType::Date));
        for (input, expected) in [
            (json!("2024-01-02"), "2024-01-02T00:00:00.000Z"),
            (json!("2024-01-02T03:04:05+02:00"), "2024-01-02T01:04:05.000Z"),
            (json!("Tue, 2 Jan 2024 03:04:05 GMT"), "2024-01-02T03:04:05.000Z"),
            (json!(0), "1970-01-01T00:00:00.000Z"),
            (json!("yesterday"), INVALID_DATE),
        ] {
            let mut msg = message(json!({ "since": input }));
            s.validate(&mut msg).unwrap();
            assert_eq!(msg["since"], json!(expected));
        }
    }

    #[test]
    fn required_empty_values_fail_with_param_name() {
        let s = schema("user", ParamDef::default().required());
        for msg in [json!({}), json!({ "user": null }), json!({ "user": "   " })] {
            let err = s.validate(&mut message(msg)).unwrap_err();
            assert_eq!(err.param(), "user");
            assert!(matches!(err, ValidationError::EmptyRequired { .. }));
        }
    }

    #[test]
    fn zero_and_false_are_not_empty() {
        let s = ParamSchema::new()
            .with("n", ParamDef::of_type(ParamType::Number).required())
            .with("flag", ParamDef::default().required())
            .resolve(&SharedDefines::default(), "test")
            .unwrap();
        let mut msg = message(json!({ "n": 0, "flag": false }));
        s.validate(&mut msg).unwrap();
        assert_eq!(msg["n"], json!(0));
        assert_eq!(msg["flag"], json!(false));
    }

    #[test]
    fn optional_blank_values_are_left_alone() {
        let s = schema("q", ParamDef::of_type(ParamType::Number));
        let mut msg = message(json!({ "q": "" }));
        s.validate(&mut msg).unwrap();
        assert_eq!(msg["q"], json!(""));
    }

    #[test]
    fn strings_are_trimmed_before_pattern_check() {
        let s = schema("sort", ParamDef::default().with_validation("^(created|updated)$"));
        let mut msg = message(json!({ "sort": "  created\n" }));
        s.validate(&mut msg).unwrap();
        assert_eq!(msg["sort"], json!("created"));

        let mut msg = message(json!({ "sort": "pushed" }));
        assert_eq!(
            s.validate(&mut msg).unwrap_err(),
            ValidationError::PatternMismatch {
                param: "sort".into(),
                value: "pushed".into()
            }
        );
    }

    #[test]
    fn aliases_resolve_against_defines() {
        let defines: SharedDefines = serde_json::from_value(json!({
            "params": { "per_page": { "type": "Number", "validation": "^[0-9]+$" } }
        }))
        .unwrap();
        let resolved = ParamSchema::new()
            .with_alias("per_page")
            .resolve(&defines, "repos/list")
            .unwrap();
        assert_eq!(resolved.get("per_page").and_then(ResolvedParam::kind), Some(&ParamType::Number));
        assert!(resolved.get("per_page").unwrap().pattern().is_some());
    }

    #[test]
    fn unresolved_alias_and_bad_pattern_are_config_errors() {
        let err = ParamSchema::new()
            .with_alias("missing")
            .resolve(&SharedDefines::default(), "repos/get")
            .unwrap_err();
        assert!(matches!(err, ConfigError::UnresolvedAlias { ref param, .. } if param == "missing"));

        let err = ParamSchema::new()
            .with("x", ParamDef::default().with_validation("("))
            .resolve(&SharedDefines::default(), "repos/get")
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidPattern { .. }));
    }

    #[test]
    fn one_step_validate_reports_both_error_classes() {
        let schema = ParamSchema::new().with("id", ParamDef::of_type(ParamType::Number).required());
        let mut msg = message(json!({ "id": "17" }));
        validate(&mut msg, &schema, &SharedDefines::default()).unwrap();
        assert_eq!(msg["id"], json!(17));

        let err = validate(&mut message(json!({})), &schema, &SharedDefines::default()).unwrap_err();
        assert!(matches!(err, ParamError::Validation(_)));

        let aliased = ParamSchema::new().with_alias("nope");
        let err = validate(&mut message(json!({})), &aliased, &SharedDefines::default()).unwrap_err();
        assert!(matches!(err, ParamError::Config(_)));
    }

    #[test]
    fn undeclared_fields_are_untouched() {
        let s = schema("a", ParamDef::default());
        let mut msg = message(json!({ "a": " x ", "other": " y " }));
        s.validate(&mut msg).unwrap();
        assert_eq!(msg["a"], json!("x"));
        assert_eq!(msg["other"], json!(" y "));
    }
}
