//! JSON-schema validation for operation, client, and credential configuration.
//!
//! Validating keywords: `type`, `enum`, `const`, `properties`, `required`,
//! `additionalProperties`, `minProperties`, `maxProperties`, `items`, `minItems`, `maxItems`,
//! `uniqueItems`, `minimum`, `maximum`, `exclusiveMinimum`, `exclusiveMaximum`, `minLength`,
//! `maxLength`, `pattern`, `allOf`, `anyOf`, `oneOf`, and `not`.
//!
//! Annotation keywords (`title`, `description`, `default`, `examples`, and friends) are accepted
//! and have no effect. Any other keyword rejects the schema with
//! [`OperationError::InvalidConfig`] before the config is looked at, so a schema can never pass
//! a value it was written to refuse.

// crates.io
use regex::Regex;
// self
use crate::{_prelude::*, error::OperationError, operation::ConfigMap};

const VALIDATING_KEYWORDS: &[&str] = &[
	"type",
	"enum",
	"const",
	"properties",
	"required",
	"additionalProperties",
	"minProperties",
	"maxProperties",
	"items",
	"minItems",
	"maxItems",
	"uniqueItems",
	"minimum",
	"maximum",
	"exclusiveMinimum",
	"exclusiveMaximum",
	"minLength",
	"maxLength",
	"pattern",
	"allOf",
	"anyOf",
	"oneOf",
	"not",
];
const ANNOTATION_KEYWORDS: &[&str] = &[
	"$schema",
	"$id",
	"$comment",
	"title",
	"description",
	"default",
	"examples",
	"deprecated",
	"readOnly",
	"writeOnly",
];

/// Validates `config` against `schema`.
///
/// The schema itself is checked first; unsupported keywords and malformed `pattern`s are
/// reported at their schema location (e.g. `#/properties/region`).
pub fn validate_config(schema: &Value, config: &ConfigMap) -> Result<(), OperationError> {
	check_schema(schema, &Path::schema_root())?;

	match schema {
		Value::Bool(false) => Err(invalid("$", "no configuration is accepted")),
		_ => check_value(schema, &Value::Object(config.clone()), &Path::root()),
	}
}

/// Deserializes `config` into `T`, reporting the failing path.
pub fn decode_config<T>(config: &ConfigMap) -> Result<T, OperationError>
where
	T: DeserializeOwned,
{
	serde_path_to_error::deserialize(Value::Object(config.clone())).map_err(|e| {
		OperationError::InvalidConfig { path: e.path().to_string(), message: e.inner().to_string() }
	})
}

#[derive(Clone)]
struct Path(String);
impl Path {
	fn root() -> Self {
		Self("$".into())
	}

	fn schema_root() -> Self {
		Self("#".into())
	}

	fn key(&self, key: &str) -> Self {
		Self(format!("{}.{key}", self.0))
	}

	fn index(&self, index: usize) -> Self {
		Self(format!("{}[{index}]", self.0))
	}

	fn pointer(&self, segment: impl Display) -> Self {
		Self(format!("{}/{segment}", self.0))
	}
}

fn invalid(path: impl Into<String>, message: impl Into<String>) -> OperationError {
	OperationError::InvalidConfig { path: path.into(), message: message.into() }
}

fn check_schema(schema: &Value, path: &Path) -> Result<(), OperationError> {
	let rules = match schema {
		Value::Bool(_) => return Ok(()),
		Value::Object(rules) => rules,
		_ => return Err(invalid(&path.0, "schema must be an object or boolean")),
	};

	for (keyword, value) in rules {
		let at = path.pointer(keyword);

		match keyword.as_str() {
			"properties" => {
				let Value::Object(properties) = value else {
					return Err(invalid(&at.0, "`properties` must be an object"));
				};

				for (name, child) in properties {
					check_schema(child, &at.pointer(name))?;
				}
			},
			"additionalProperties" | "items" | "not" => check_schema(value, &at)?,
			"allOf" | "anyOf" | "oneOf" => {
				let Value::Array(branches) = value else {
					return Err(invalid(&at.0, format!("`{keyword}` must be an array")));
				};

				for (i, child) in branches.iter().enumerate() {
					check_schema(child, &at.pointer(i))?;
				}
			},
			"pattern" => {
				compile_pattern(value, &at)?;
			},
			k if VALIDATING_KEYWORDS.contains(&k) || ANNOTATION_KEYWORDS.contains(&k) => (),
			k => return Err(invalid(&path.0, format!("schema uses unsupported keyword `{k}`"))),
		}
	}

	Ok(())
}

fn compile_pattern(pattern: &Value, path: &Path) -> Result<Regex, OperationError> {
	let Value::String(pattern) = pattern else {
		return Err(invalid(&path.0, "`pattern` must be a string"));
	};

	Regex::new(pattern).map_err(|e| invalid(&path.0, format!("`pattern` is invalid: {e}")))
}

fn check_value(schema: &Value, value: &Value, path: &Path) -> Result<(), OperationError> {
	let rules = match schema {
		Value::Bool(true) => return Ok(()),
		Value::Bool(false) => return Err(invalid(&path.0, "value is not allowed")),
		Value::Object(rules) => rules,
		_ => return Ok(()),
	};

	check_type(rules, type_name(value), path, |ty| matches_type(ty, value))?;

	if let Some(Value::Array(allowed)) = rules.get("enum")
		&& !allowed.contains(value)
	{
		return Err(invalid(&path.0, format!("value must be one of {}", Value::Array(allowed.clone()))));
	}
	if let Some(expected) = rules.get("const")
		&& expected != value
	{
		return Err(invalid(&path.0, format!("value must equal {expected}")));
	}

	check_combinators(rules, value, path)?;

	match value {
		Value::Object(map) => check_object(rules, map, path),
		Value::Array(items) => check_array(rules, items, path),
		Value::Number(n) => check_number(rules, n.as_f64().unwrap_or_default(), path),
		Value::String(s) => check_string(rules, s, path),
		_ => Ok(()),
	}
}

fn check_combinators(
	rules: &Map<String, Value>,
	value: &Value,
	path: &Path,
) -> Result<(), OperationError> {
	for branch in branches(rules, "allOf") {
		check_value(branch, value, path)?;
	}

	let any_of = branches(rules, "anyOf");

	if !any_of.is_empty() && !any_of.iter().any(|branch| check_value(branch, value, path).is_ok()) {
		return Err(invalid(&path.0, "value must match at least one `anyOf` schema"));
	}

	let one_of = branches(rules, "oneOf");

	if !one_of.is_empty() {
		let matched = one_of.iter().filter(|branch| check_value(branch, value, path).is_ok()).count();

		if matched != 1 {
			return Err(invalid(
				&path.0,
				format!("value must match exactly one `oneOf` schema, matched {matched}"),
			));
		}
	}
	if let Some(negated) = rules.get("not")
		&& check_value(negated, value, path).is_ok()
	{
		return Err(invalid(&path.0, "value must not match the `not` schema"));
	}

	Ok(())
}

fn branches<'a>(rules: &'a Map<String, Value>, keyword: &str) -> &'a [Value] {
	match rules.get(keyword) {
		Some(Value::Array(branches)) => branches.as_slice(),
		_ => &[],
	}
}

fn check_object(
	rules: &Map<String, Value>,
	map: &Map<String, Value>,
	path: &Path,
) -> Result<(), OperationError> {
	if let Some(Value::Array(required)) = rules.get("required") {
		for key in required.iter().filter_map(Value::as_str) {
			if !map.contains_key(key) {
				return Err(invalid(&path.key(key).0, "required property is missing"));
			}
		}
	}

	let len = map.len() as u64;

	if let Some(min) = rules.get("minProperties").and_then(Value::as_u64)
		&& len < min
	{
		return Err(invalid(&path.0, format!("object must have at least {min} properties")));
	}
	if let Some(max) = rules.get("maxProperties").and_then(Value::as_u64)
		&& len > max
	{
		return Err(invalid(&path.0, format!("object must have at most {max} properties")));
	}

	let properties = rules.get("properties").and_then(Value::as_object);

	for (key, value) in map {
		let child = path.key(key);

		match properties.and_then(|p| p.get(key)) {
			Some(schema) => check_value(schema, value, &child)?,
			None => match rules.get("additionalProperties") {
				Some(Value::Bool(false)) =>
					return Err(invalid(&child.0, "additional properties are not allowed")),
				Some(schema @ Value::Object(_)) => check_value(schema, value, &child)?,
				_ => (),
			},
		}
	}

	Ok(())
}

fn check_array(rules: &Map<String, Value>, items: &[Value], path: &Path) -> Result<(), OperationError> {
	let len = items.len() as u64;

	if let Some(min) = rules.get("minItems").and_then(Value::as_u64)
		&& len < min
	{
		return Err(invalid(&path.0, format!("array must have at least {min} items")));
	}
	if let Some(max) = rules.get("maxItems").and_then(Value::as_u64)
		&& len > max
	{
		return Err(invalid(&path.0, format!("array must have at most {max} items")));
	}
	if rules.get("uniqueItems").and_then(Value::as_bool).unwrap_or_default() {
		for (i, item) in items.iter().enumerate() {
			if items[..i].contains(item) {
				return Err(invalid(&path.index(i).0, "array items must be unique"));
			}
		}
	}
	if let Some(item_schema) = rules.get("items") {
		for (i, item) in items.iter().enumerate() {
			check_value(item_schema, item, &path.index(i))?;
		}
	}

	Ok(())
}

fn check_number(rules: &Map<String, Value>, n: f64, path: &Path) -> Result<(), OperationError> {
	let bound = |keyword: &str| rules.get(keyword).and_then(Value::as_f64);

	if let Some(min) = bound("minimum")
		&& n < min
	{
		return Err(invalid(&path.0, format!("value must be at least {min}")));
	}
	if let Some(max) = bound("maximum")
		&& n > max
	{
		return Err(invalid(&path.0, format!("value must be at most {max}")));
	}
	if let Some(min) = bound("exclusiveMinimum")
		&& n <= min
	{
		return Err(invalid(&path.0, format!("value must be greater than {min}")));
	}
	if let Some(max) = bound("exclusiveMaximum")
		&& n >= max
	{
		return Err(invalid(&path.0, format!("value must be less than {max}")));
	}

	Ok(())
}

fn check_string(rules: &Map<String, Value>, s: &str, path: &Path) -> Result<(), OperationError> {
	let len = s.chars().count() as u64;

	if let Some(min) = rules.get("minLength").and_then(Value::as_u64)
		&& len < min
	{
		return Err(invalid(&path.0, format!("value must have at least {min} characters")));
	}
	if let Some(max) = rules.get("maxLength").and_then(Value::as_u64)
		&& len > max
	{
		return Err(invalid(&path.0, format!("value must have at most {max} characters")));
	}
	if let Some(pattern) = rules.get("pattern") {
		let regex = compile_pattern(pattern, path)?;

		if !regex.is_match(s) {
			return Err(invalid(&path.0, format!("value must match pattern `{}`", regex.as_str())));
		}
	}

	Ok(())
}

fn check_type(
	rules: &Map<String, Value>,
	found: &str,
	path: &Path,
	matches: impl Fn(&str) -> bool,
) -> Result<(), OperationError> {
	let allowed = match rules.get("type") {
		Some(Value::String(ty)) => vec![ty.as_str()],
		Some(Value::Array(types)) => types.iter().filter_map(Value::as_str).collect(),
		_ => return Ok(()),
	};

	if allowed.iter().any(|ty| matches(ty)) {
		Ok(())
	} else {
		Err(invalid(&path.0, format!("expected {}, found {found}", allowed.join(" or "))))
	}
}

fn matches_type(ty: &str, value: &Value) -> bool {
	match ty {
		"object" => value.is_object(),
		"array" => value.is_array(),
		"string" => value.is_string(),
		"boolean" => value.is_boolean(),
		"null" => value.is_null(),
		"number" => value.is_number(),
		"integer" =>
			value.is_i64() || value.is_u64() || value.as_f64().is_some_and(|n| n.fract() == 0.0),
		_ => false,
	}
}

fn type_name(value: &Value) -> &'static str {
	match value {
		Value::Null => "null",
		Value::Bool(_) => "boolean",
		Value::Number(_) => "number",
		Value::String(_) => "string",
		Value::Array(_) => "array",
		Value::Object(_) => "object",
	}
}

#[cfg(test)]
mod tests {
	// crates.io
	use serde_json::json;
	// self
	use super::*;

	fn config(value: Value) -> ConfigMap {
		match value {
			Value::Object(map) => map,
			_ => panic!("Fixture should be an object."),
		}
	}

	fn path_of(err: OperationError) -> String {
		match err {
			OperationError::InvalidConfig { path, .. } => path,
			other => panic!("Unexpected error: {other:?}."),
		}
	}

	fn message_schema() -> Value {
		json!({
			"type": "object",
			"required": ["channel", "text"],
			"properties": {
				"channel": { "type": "string", "minLength": 1 },
				"text": { "type": "string" },
				"priority": { "type": "integer", "minimum": 1, "maximum": 5 },
				"format": { "enum": ["plain", "markdown"] },
				"tags": { "type": "array", "items": { "type": "string" } }
			},
			"additionalProperties": false
		})
	}

	#[test]
	fn accepts_conforming_config() {
		let cfg = config(json!({
			"channel": "C1",
			"text": "hi",
			"priority": 3,
			"format": "markdown",
			"tags": ["a", "b"]
		}));

		validate_config(&message_schema(), &cfg).expect("Config should validate.");
		validate_config(&Value::Bool(true), &cfg).expect("True schema should accept anything.");
	}

	#[test]
	fn reports_the_failing_path() {
		let schema = message_schema();
		let cases = [
			(json!({ "text": "hi" }), "$.channel"),
			(json!({ "channel": 7, "text": "hi" }), "$.channel"),
			(json!({ "channel": "", "text": "hi" }), "$.channel"),
			(json!({ "channel": "C1", "text": "hi", "priority": 9 }), "$.priority"),
			(json!({ "channel": "C1", "text": "hi", "priority": 1.5 }), "$.priority"),
			(json!({ "channel": "C1", "text": "hi", "format": "html" }), "$.format"),
			(json!({ "channel": "C1", "text": "hi", "tags": ["a", 2] }), "$.tags[1]"),
			(json!({ "channel": "C1", "text": "hi", "extra": true }), "$.extra"),
		];

		for (cfg, expected) in cases {
			let err = validate_config(&schema, &config(cfg)).expect_err("Config should be rejected.");

			assert_eq!(path_of(err), expected);
		}
	}

	#[test]
	fn false_schema_rejects_everything() {
		assert!(validate_config(&Value::Bool(false), &ConfigMap::new()).is_err());
	}

	#[test]
	fn unsupported_keywords_reject_the_schema() {
		let cases = [
			(json!({ "type": "object", "patternProperties": { "^x": {} } }), "#"),
			(
				json!({ "properties": { "email": { "type": "string", "format": "email" } } }),
				"#/properties/email",
			),
			(json!({ "properties": { "tags": { "items": { "$ref": "#/defs/tag" } } } }), "#/properties/tags/items"),
			(json!({ "anyOf": [{ "if": { "const": 1 } }] }), "#/anyOf/0"),
		];

		for (schema, expected) in cases {
			let err = validate_config(&schema, &ConfigMap::new()).expect_err("Schema should be rejected.");

			match err {
				OperationError::InvalidConfig { path, message } => {
					assert_eq!(path, expected);
					assert!(message.contains("unsupported keyword"));
				},
				other => panic!("Unexpected error: {other:?}."),
			}
		}

		let annotated = json!({
			"$schema": "https://json-schema.org/draft/2020-12/schema",
			"title": "Options",
			"type": "object",
			"properties": { "limit": { "type": "integer", "description": "Page size.", "default": 10 } }
		});

		validate_config(&annotated, &config(json!({ "limit": 5 }))).expect("Annotations should be accepted.");
	}

	#[test]
	fn pattern_and_combinators_are_enforced() {
		let schema = json!({
			"type": "object",
			"properties": {
				"region": { "type": "string", "pattern": "^us-" },
				"mode": { "oneOf": [{ "const": "a" }, { "const": "b" }] },
				"level": { "anyOf": [{ "type": "integer" }, { "enum": ["low", "high"] }] },
				"name": { "allOf": [{ "minLength": 2 }, { "maxLength": 4 }], "not": { "const": "root" } }
			}
		});

		validate_config(
			&schema,
			&config(json!({ "region": "us-east-1", "mode": "a", "level": "low", "name": "ops" })),
		)
		.expect("Config should validate.");

		let cases = [
			(json!({ "region": "eu-west-1" }), "$.region"),
			(json!({ "mode": "zzz" }), "$.mode"),
			(json!({ "level": "medium" }), "$.level"),
			(json!({ "name": "x" }), "$.name"),
			(json!({ "name": "root" }), "$.name"),
		];

		for (cfg, expected) in cases {
			let err = validate_config(&schema, &config(cfg)).expect_err("Config should be rejected.");

			assert_eq!(path_of(err), expected);
		}

		let ambiguous = json!({ "properties": { "n": { "oneOf": [{ "type": "integer" }, { "type": "number" }] } } });

		assert!(validate_config(&ambiguous, &config(json!({ "n": 3 }))).is_err());
		assert!(validate_config(&ambiguous, &config(json!({ "n": 3.5 }))).is_ok());
	}

	#[test]
	fn array_and_object_bounds_are_enforced() {
		let schema = json!({
			"type": "object",
			"minProperties": 1,
			"properties": {
				"scopes": { "type": "array", "minItems": 1, "maxItems": 2, "uniqueItems": true },
				"ratio": { "exclusiveMinimum": 0, "exclusiveMaximum": 1 }
			}
		});
		let cases = [
			(json!({}), "$"),
			(json!({ "scopes": [] }), "$.scopes"),
			(json!({ "scopes": ["a", "b", "c"] }), "$.scopes"),
			(json!({ "scopes": ["a", "a"] }), "$.scopes[1]"),
			(json!({ "ratio": 0 }), "$.ratio"),
			(json!({ "ratio": 1 }), "$.ratio"),
		];

		for (cfg, expected) in cases {
			let err = validate_config(&schema, &config(cfg)).expect_err("Config should be rejected.");

			assert_eq!(path_of(err), expected);
		}

		validate_config(&schema, &config(json!({ "scopes": ["a"], "ratio": 0.5 })))
			.expect("Config should validate.");
	}

	#[test]
	fn malformed_patterns_reject_the_schema() {
		let schema = json!({ "properties": { "region": { "pattern": "([" } } });
		let err = validate_config(&schema, &ConfigMap::new()).expect_err("Schema should be rejected.");

		assert_eq!(path_of(err), "#/properties/region/pattern");
	}

	#[test]
	fn decode_reports_serde_path() {
		#[derive(Debug, Deserialize)]
		struct Options {
			#[allow(dead_code)]
			limit: u32,
		}

		let err = decode_config::<Options>(&config(json!({ "limit": "ten" })))
			.expect_err("Decode should fail.");

		assert_eq!(path_of(err), "limit");
	}
}
