//! YANG data type definitions and typed leaf values
//!
//! A [`TypeSpec`] is a base [`YangType`] plus its declared [`Restrictions`],
//! loaded once from a schema descriptor. A [`TypedValue`] pairs a parsed
//! [`Value`] with the spec it was checked against; every construction path
//! runs the same lexical parse and restriction check, so an invalid value is
//! never observable.

use std::num::IntErrorKind;
use std::sync::{Arc, LazyLock};

use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use regex::Regex;
use serde_json::Value as JsonValue;

use crate::error::{NetconfError, Result};

/// A named enumeration literal and its assigned value
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnumMember {
    pub name: String,
    pub value: i32,
}

/// Represents YANG base types
#[derive(Debug, Clone, PartialEq)]
pub enum YangType {
    String,
    Boolean,
    Int8,
    Int16,
    Int32,
    Int64,
    Uint8,
    Uint16,
    Uint32,
    Uint64,
    Decimal64 { fraction_digits: u8 },
    Binary,
    Empty,
    /// Enumeration with its literal set in declaration order
    Enumeration(Vec<EnumMember>),
    /// Bits with bit names in position order
    Bits(Vec<String>),
    /// Union of member types, tried in declaration order
    Union(Vec<TypeSpec>),
    /// Identity reference; an empty set accepts any identity name
    Identityref(Vec<String>),
    /// Leafref, typed as its target leaf when known
    Leafref(Option<Box<TypeSpec>>),
    InstanceIdentifier,
}

impl YangType {
    /// Map a builtin or well-known typedef name to its base type
    pub fn from_name(name: &str) -> Option<Self> {
        let t = match name {
            "string" => YangType::String,
            "boolean" => YangType::Boolean,
            "int8" => YangType::Int8,
            "int16" => YangType::Int16,
            "int32" => YangType::Int32,
            "int64" => YangType::Int64,
            "uint8" => YangType::Uint8,
            "uint16" => YangType::Uint16,
            "uint32" => YangType::Uint32,
            "uint64" => YangType::Uint64,
            "binary" => YangType::Binary,
            "empty" => YangType::Empty,
            "identityref" => YangType::Identityref(Vec::new()),
            "leafref" => YangType::Leafref(None),
            "instance-identifier" => YangType::InstanceIdentifier,
            "yang:counter32" | "yang:zero-based-counter32" | "yang:gauge32" => YangType::Uint32,
            "yang:counter64" | "yang:zero-based-counter64" | "yang:gauge64" => YangType::Uint64,
            "yang:timeticks" | "yang:timestamp" => YangType::Uint32,
            "inet:uri" | "inet:host" | "inet:domain-name" | "inet:ip-address"
            | "inet:ipv4-address" | "inet:ipv6-address" | "inet:ip-prefix"
            | "yang:date-and-time" | "yang:mac-address" | "yang:phys-address" => YangType::String,
            "inet:port-number" => YangType::Uint16,
            _ => return None,
        };
        Some(t)
    }

    /// The YANG keyword for this type
    pub fn name(&self) -> &'static str {
        match self {
            YangType::String => "string",
            YangType::Boolean => "boolean",
            YangType::Int8 => "int8",
            YangType::Int16 => "int16",
            YangType::Int32 => "int32",
            YangType::Int64 => "int64",
            YangType::Uint8 => "uint8",
            YangType::Uint16 => "uint16",
            YangType::Uint32 => "uint32",
            YangType::Uint64 => "uint64",
            YangType::Decimal64 { .. } => "decimal64",
            YangType::Binary => "binary",
            YangType::Empty => "empty",
            YangType::Enumeration(_) => "enumeration",
            YangType::Bits(_) => "bits",
            YangType::Union(_) => "union",
            YangType::Identityref(_) => "identityref",
            YangType::Leafref(_) => "leafref",
            YangType::InstanceIdentifier => "instance-identifier",
        }
    }

    /// Inclusive value bounds of numeric types, decimal64 in scaled units
    fn numeric_bounds(&self) -> Option<(i128, i128)> {
        let bounds = match self {
            YangType::Int8 => (i8::MIN.into(), i8::MAX.into()),
            YangType::Int16 => (i16::MIN.into(), i16::MAX.into()),
            YangType::Int32 => (i32::MIN.into(), i32::MAX.into()),
            YangType::Int64 | YangType::Decimal64 { .. } => (i64::MIN.into(), i64::MAX.into()),
            YangType::Uint8 => (0, u8::MAX.into()),
            YangType::Uint16 => (0, u16::MAX.into()),
            YangType::Uint32 => (0, u32::MAX.into()),
            YangType::Uint64 => (0, u64::MAX.into()),
            _ => return None,
        };
        Some(bounds)
    }

    fn is_integer(&self) -> bool {
        self.numeric_bounds().is_some() && !matches!(self, YangType::Decimal64 { .. })
    }
}

/// A resolved YANG range or length expression such as `1..10 | 20..max`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RangeSet {
    /// The expression as written in the descriptor
    pub expression: String,
    intervals: Vec<(i128, i128)>,
}

impl RangeSet {
    /// Parse an expression against the bounds of the restricted type.
    ///
    /// `parse_bound` converts one literal to the scaled integer domain.
    fn parse(
        expression: &str,
        (lower, upper): (i128, i128),
        parse_bound: &dyn Fn(&str) -> Option<i128>,
    ) -> Result<Self> {
        let mut intervals = Vec::new();
        for part in expression.split('|') {
            let part = part.trim();
            let (lo, hi) = part.split_once("..").unwrap_or((part, part));
            let resolve = |s: &str| -> Result<i128> {
                match s.trim() {
                    "min" => Ok(lower),
                    "max" => Ok(upper),
                    lit => parse_bound(lit).ok_or_else(|| {
                        NetconfError::SchemaLoad(format!("invalid bound '{lit}' in '{expression}'"))
                    }),
                }
            };
            let (lo, hi) = (resolve(lo)?, resolve(hi)?);
            if lo > hi || lo < lower || hi > upper {
                return Err(NetconfError::SchemaLoad(format!(
                    "range '{expression}' is empty or exceeds its base type"
                )));
            }
            intervals.push((lo, hi));
        }
        Ok(Self {
            expression: expression.to_string(),
            intervals,
        })
    }

    /// True when `v` falls in any interval
    pub fn contains(&self, v: i128) -> bool {
        self.intervals.iter().any(|&(lo, hi)| lo <= v && v <= hi)
    }
}

/// A compiled `pattern` restriction
#[derive(Debug, Clone)]
pub struct Pattern {
    /// The pattern source text
    pub source: String,
    /// YANG 1.1 `invert-match`
    pub inverted: bool,
    regex: Regex,
}

impl Pattern {
    /// Compile a pattern; YANG patterns are implicitly anchored
    pub fn new(source: &str, inverted: bool) -> Result<Self> {
        let regex = Regex::new(&format!("^(?:{source})$"))
            .map_err(|e| NetconfError::SchemaLoad(format!("invalid pattern '{source}': {e}")))?;
        Ok(Self {
            source: source.to_string(),
            inverted,
            regex,
        })
    }

    /// True when `text` satisfies this restriction
    pub fn accepts(&self, text: &str) -> bool {
        self.regex.is_match(text) != self.inverted
    }
}

impl PartialEq for Pattern {
    fn eq(&self, other: &Self) -> bool {
        self.source == other.source && self.inverted == other.inverted
    }
}

/// Declared restrictions on a type
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Restrictions {
    pub range: Option<RangeSet>,
    pub length: Option<RangeSet>,
    pub patterns: Vec<Pattern>,
}

/// A base type together with its restrictions
#[derive(Debug, Clone, PartialEq)]
pub struct TypeSpec {
    pub base: YangType,
    pub restrictions: Restrictions,
}

static UNTYPED: LazyLock<Arc<TypeSpec>> = LazyLock::new(|| Arc::new(TypeSpec::new(YangType::String)));

impl TypeSpec {
    /// An unrestricted spec of the given base type
    pub fn new(base: YangType) -> Self {
        Self {
            base,
            restrictions: Restrictions::default(),
        }
    }

    /// The shared unrestricted string spec used for schema-less leaves
    pub fn untyped() -> Arc<TypeSpec> {
        UNTYPED.clone()
    }

    /// Add a range restriction (numeric types only)
    pub fn with_range(mut self, expression: &str) -> Result<Self> {
        let bounds = self.base.numeric_bounds().ok_or_else(|| {
            NetconfError::SchemaLoad(format!("range not allowed on {}", self.base.name()))
        })?;
        let range = match self.base {
            YangType::Decimal64 { fraction_digits } => RangeSet::parse(expression, bounds, &|s| {
                parse_decimal(s, fraction_digits)
            })?,
            _ => RangeSet::parse(expression, bounds, &|s| s.parse::<i128>().ok())?,
        };
        self.restrictions.range = Some(range);
        Ok(self)
    }

    /// Add a length restriction (string and binary only)
    pub fn with_length(mut self, expression: &str) -> Result<Self> {
        if !matches!(self.base, YangType::String | YangType::Binary) {
            return Err(NetconfError::SchemaLoad(format!(
                "length not allowed on {}",
                self.base.name()
            )));
        }
        let length = RangeSet::parse(expression, (0, u64::MAX.into()), &|s| {
            s.parse::<u64>().ok().map(i128::from)
        })?;
        self.restrictions.length = Some(length);
        Ok(self)
    }

    /// Add a pattern restriction (string only)
    pub fn with_pattern(mut self, source: &str, inverted: bool) -> Result<Self> {
        if self.base != YangType::String {
            return Err(NetconfError::SchemaLoad(format!(
                "pattern not allowed on {}",
                self.base.name()
            )));
        }
        self.restrictions.patterns.push(Pattern::new(source, inverted)?);
        Ok(self)
    }

    /// Parse a type from a descriptor `type` field.
    ///
    /// Accepts a type name, an array (union), an object with `base` and
    /// restriction keys, or a bare `{"value": "name"}` enumeration map.
    pub fn from_descriptor(type_value: &JsonValue) -> Result<Self> {
        match type_value {
            JsonValue::String(s) => YangType::from_name(s)
                .map(Self::new)
                .ok_or_else(|| NetconfError::SchemaLoad(format!("unknown type '{s}'"))),
            JsonValue::Array(members) => {
                let types = members
                    .iter()
                    .map(Self::from_descriptor)
                    .collect::<Result<Vec<_>>>()?;
                Ok(Self::new(YangType::Union(types)))
            }
            JsonValue::Object(map) if map.contains_key("base") => Self::from_object(map),
            JsonValue::Object(map) => {
                let mut members = Vec::with_capacity(map.len());
                for (value, name) in map {
                    let name = name.as_str().ok_or_else(|| {
                        NetconfError::SchemaLoad(format!("enum name for {value} must be a string"))
                    })?;
                    let value = value.parse().map_err(|_| {
                        NetconfError::SchemaLoad(format!("enum value '{value}' is not an int32"))
                    })?;
                    members.push(EnumMember {
                        name: name.to_string(),
                        value,
                    });
                }
                Ok(Self::new(YangType::Enumeration(members)))
            }
            other => Err(NetconfError::SchemaLoad(format!("invalid type field: {other}"))),
        }
    }

    fn from_object(map: &serde_json::Map<String, JsonValue>) -> Result<Self> {
        let base_name = map.get("base").and_then(JsonValue::as_str).ok_or_else(|| {
            NetconfError::SchemaLoad("type 'base' must be a string".into())
        })?;

        let base = match base_name {
            "decimal64" => {
                let digits = map
                    .get("fraction-digits")
                    .and_then(JsonValue::as_u64)
                    .filter(|d| (1..=18).contains(d))
                    .ok_or_else(|| {
                        NetconfError::SchemaLoad("decimal64 requires fraction-digits 1..18".into())
                    })?;
                YangType::Decimal64 {
                    fraction_digits: digits as u8,
                }
            }
            "enumeration" => YangType::Enumeration(enum_members(map.get("enums"))?),
            "bits" => YangType::Bits(string_list(map.get("bits"), "bits")?),
            "identityref" => YangType::Identityref(string_list(map.get("identities"), "identities")?),
            "union" => {
                let members = map.get("types").and_then(JsonValue::as_array).ok_or_else(|| {
                    NetconfError::SchemaLoad("union requires a 'types' array".into())
                })?;
                YangType::Union(
                    members
                        .iter()
                        .map(Self::from_descriptor)
                        .collect::<Result<Vec<_>>>()?,
                )
            }
            "leafref" => YangType::Leafref(
                map.get("target-type")
                    .map(Self::from_descriptor)
                    .transpose()?
                    .map(Box::new),
            ),
            name => YangType::from_name(name)
                .ok_or_else(|| NetconfError::SchemaLoad(format!("unknown type '{name}'")))?,
        };

        let mut spec = Self::new(base);
        if let Some(range) = map.get("range") {
            spec = spec.with_range(expression(range, "range")?)?;
        }
        if let Some(length) = map.get("length") {
            spec = spec.with_length(expression(length, "length")?)?;
        }
        let inverted = map
            .get("invert-match")
            .and_then(JsonValue::as_bool)
            .unwrap_or(false);
        match map.get("pattern") {
            Some(JsonValue::String(p)) => spec = spec.with_pattern(p, inverted)?,
            Some(JsonValue::Array(ps)) => {
                for p in ps {
                    let p = p.as_str().ok_or_else(|| {
                        NetconfError::SchemaLoad("pattern entries must be strings".into())
                    })?;
                    spec = spec.with_pattern(p, inverted)?;
                }
            }
            Some(other) => {
                return Err(NetconfError::SchemaLoad(format!("invalid pattern: {other}")));
            }
            None => {}
        }
        Ok(spec)
    }

    /// Lexically parse `text` and check it against this spec's restrictions
    pub fn parse_value(&self, text: &str) -> Result<Value> {
        match &self.base {
            YangType::Union(members) => {
                for member in members {
                    if let Ok(v) = member.parse_value(text) {
                        return Ok(v);
                    }
                }
                Err(NetconfError::InvalidValue(format!(
                    "'{text}' matches no member of union"
                )))
            }
            YangType::Leafref(Some(target)) => target.parse_value(text),
            _ => {
                let value = self.lexical(text)?;
                self.check_value(&value)?;
                Ok(value)
            }
        }
    }

    fn lexical(&self, text: &str) -> Result<Value> {
        let trimmed = text.trim();
        let value = match &self.base {
            YangType::String | YangType::Leafref(None) => Value::String(text.to_string()),
            YangType::Boolean => match trimmed {
                "true" => Value::Boolean(true),
                "false" => Value::Boolean(false),
                _ => {
                    return Err(NetconfError::InvalidValue(format!(
                        "'{text}' is not a boolean"
                    )));
                }
            },
            t if t.is_integer() => {
                let n = parse_integer(trimmed, t.name())?;
                integer_value(t, n).ok_or_else(|| {
                    NetconfError::RestrictionViolation(format!(
                        "{n} is out of range for {}",
                        t.name()
                    ))
                })?
            }
            YangType::Decimal64 { fraction_digits } => {
                let digits = parse_decimal(trimmed, *fraction_digits).ok_or_else(|| {
                    NetconfError::InvalidValue(format!(
                        "'{text}' is not a decimal64 with {fraction_digits} fraction digits"
                    ))
                })?;
                let digits = i64::try_from(digits).map_err(|_| {
                    NetconfError::RestrictionViolation(format!("'{text}' is out of range for decimal64"))
                })?;
                Value::Decimal64 {
                    digits,
                    fraction_digits: *fraction_digits,
                }
            }
            YangType::Binary => {
                let compact: String = text.chars().filter(|c| !c.is_whitespace()).collect();
                let bytes = BASE64
                    .decode(compact.as_bytes())
                    .map_err(|e| NetconfError::InvalidValue(format!("base64 decode: {e}")))?;
                Value::Binary(bytes)
            }
            YangType::Empty => {
                if !trimmed.is_empty() {
                    return Err(NetconfError::InvalidValue(format!(
                        "empty leaf carries a value: '{text}'"
                    )));
                }
                Value::Empty
            }
            YangType::Enumeration(members) => {
                let member = members.iter().find(|m| m.name == trimmed).ok_or_else(|| {
                    NetconfError::InvalidValue(format!("enumeration value not found: {trimmed}"))
                })?;
                Value::Enumeration {
                    name: member.name.clone(),
                    value: member.value,
                }
            }
            YangType::Bits(names) => {
                let mut set: Vec<&str> = Vec::new();
                for bit in trimmed.split_whitespace() {
                    if !names.iter().any(|n| n == bit) {
                        return Err(NetconfError::InvalidValue(format!("unknown bit '{bit}'")));
                    }
                    if set.contains(&bit) {
                        return Err(NetconfError::InvalidValue(format!("duplicate bit '{bit}'")));
                    }
                    set.push(bit);
                }
                Value::Bits(
                    names
                        .iter()
                        .filter(|n| set.contains(&n.as_str()))
                        .cloned()
                        .collect(),
                )
            }
            YangType::Identityref(allowed) => {
                if !is_identity_name(trimmed) {
                    return Err(NetconfError::InvalidValue(format!(
                        "'{trimmed}' is not an identity name"
                    )));
                }
                let local = trimmed.rsplit(':').next().unwrap_or(trimmed);
                if !allowed.is_empty() && !allowed.iter().any(|a| a == trimmed || a == local) {
                    return Err(NetconfError::InvalidValue(format!(
                        "identity '{trimmed}' is not derived from the declared base"
                    )));
                }
                Value::Identityref(trimmed.to_string())
            }
            YangType::InstanceIdentifier => {
                if !trimmed.starts_with('/') {
                    return Err(NetconfError::InvalidValue(format!(
                        "'{trimmed}' is not an absolute instance identifier"
                    )));
                }
                Value::InstanceIdentifier(trimmed.to_string())
            }
            other => {
                return Err(NetconfError::InvalidValue(format!(
                    "cannot parse values of type {}",
                    other.name()
                )));
            }
        };
        Ok(value)
    }

    /// Check an already parsed value against this spec.
    ///
    /// Pure and idempotent; fails if the value's kind does not belong to the
    /// base type or any restriction is violated.
    pub fn check_value(&self, value: &Value) -> Result<()> {
        match (&self.base, value) {
            (YangType::Union(members), v) => {
                if members.iter().any(|m| m.check_value(v).is_ok()) {
                    Ok(())
                } else {
                    Err(NetconfError::RestrictionViolation(format!(
                        "'{}' satisfies no member of union",
                        v.canonical_string()
                    )))
                }
            }
            (YangType::Leafref(Some(target)), v) => target.check_value(v),
            (YangType::String | YangType::Leafref(None), Value::String(s)) => {
                self.check_length(s.chars().count(), s)?;
                for pattern in &self.restrictions.patterns {
                    if !pattern.accepts(s) {
                        return Err(NetconfError::RestrictionViolation(format!(
                            "'{s}' does not match pattern '{}'",
                            pattern.source
                        )));
                    }
                }
                Ok(())
            }
            (YangType::Binary, Value::Binary(bytes)) => {
                self.check_length(bytes.len(), "binary value")
            }
            (YangType::Decimal64 { fraction_digits }, Value::Decimal64 { digits, fraction_digits: fd })
                if fraction_digits == fd =>
            {
                self.check_range(i128::from(*digits), value)
            }
            (t, v) if t.is_integer() => match v.as_integer() {
                Some(n) if integer_value(t, n).as_ref() == Some(v) => self.check_range(n, v),
                _ => Err(self.mismatch(v)),
            },
            (YangType::Boolean, Value::Boolean(_))
            | (YangType::Empty, Value::Empty)
            | (YangType::InstanceIdentifier, Value::InstanceIdentifier(_)) => Ok(()),
            (YangType::Enumeration(members), Value::Enumeration { name, value: n }) => {
                if members.iter().any(|m| &m.name == name && m.value == *n) {
                    Ok(())
                } else {
                    Err(NetconfError::RestrictionViolation(format!(
                        "'{name}' is not a member of the enumeration"
                    )))
                }
            }
            (YangType::Bits(names), Value::Bits(set)) => {
                if set.iter().all(|b| names.contains(b)) {
                    Ok(())
                } else {
                    Err(NetconfError::RestrictionViolation("undeclared bit in value".into()))
                }
            }
            (YangType::Identityref(allowed), Value::Identityref(id)) => {
                let local = id.rsplit(':').next().unwrap_or(id);
                if allowed.is_empty() || allowed.iter().any(|a| a == id || a == local) {
                    Ok(())
                } else {
                    Err(NetconfError::RestrictionViolation(format!(
                        "identity '{id}' is not allowed"
                    )))
                }
            }
            (_, v) => Err(self.mismatch(v)),
        }
    }

    fn check_range(&self, n: i128, value: &Value) -> Result<()> {
        match &self.restrictions.range {
            Some(range) if !range.contains(n) => Err(NetconfError::RestrictionViolation(format!(
                "{} is outside range '{}'",
                value.canonical_string(),
                range.expression
            ))),
            _ => Ok(()),
        }
    }

    fn check_length(&self, len: usize, what: &str) -> Result<()> {
        match &self.restrictions.length {
            Some(length) if !length.contains(len as i128) => {
                Err(NetconfError::RestrictionViolation(format!(
                    "length {len} of '{what}' is outside '{}'",
                    length.expression
                )))
            }
            _ => Ok(()),
        }
    }

    fn mismatch(&self, value: &Value) -> NetconfError {
        NetconfError::InvalidValue(format!(
            "value '{}' is not of type {}",
            value.canonical_string(),
            self.base.name()
        ))
    }
}

fn expression<'a>(value: &'a JsonValue, what: &str) -> Result<&'a str> {
    value
        .as_str()
        .ok_or_else(|| NetconfError::SchemaLoad(format!("{what} must be a string")))
}

fn string_list(value: Option<&JsonValue>, what: &str) -> Result<Vec<String>> {
    let Some(value) = value else {
        return Ok(Vec::new());
    };
    value
        .as_array()
        .and_then(|arr| {
            arr.iter()
                .map(|v| v.as_str().map(str::to_string))
                .collect::<Option<Vec<_>>>()
        })
        .ok_or_else(|| NetconfError::SchemaLoad(format!("'{what}' must be an array of strings")))
}

/// Enumeration members from `{"name": value}` or `["name", ...]`
fn enum_members(value: Option<&JsonValue>) -> Result<Vec<EnumMember>> {
    let mut members = Vec::new();
    let mut next = 0i32;
    match value {
        Some(JsonValue::Object(map)) => {
            for (name, v) in map {
                let value = v
                    .as_i64()
                    .and_then(|n| i32::try_from(n).ok())
                    .ok_or_else(|| {
                        NetconfError::SchemaLoad(format!("enum '{name}' needs an int32 value"))
                    })?;
                members.push(EnumMember {
                    name: name.clone(),
                    value,
                });
            }
        }
        Some(JsonValue::Array(names)) => {
            for name in names {
                let name = name.as_str().ok_or_else(|| {
                    NetconfError::SchemaLoad("enum names must be strings".into())
                })?;
                members.push(EnumMember {
                    name: name.to_string(),
                    value: next,
                });
                next = next.saturating_add(1);
            }
        }
        _ => return Err(NetconfError::SchemaLoad("enumeration requires 'enums'".into())),
    }
    if members.is_empty() {
        return Err(NetconfError::SchemaLoad("enumeration has no members".into()));
    }
    Ok(members)
}

fn parse_integer(text: &str, type_name: &str) -> Result<i128> {
    text.parse::<i128>().map_err(|e| match e.kind() {
        IntErrorKind::PosOverflow | IntErrorKind::NegOverflow => {
            NetconfError::RestrictionViolation(format!("'{text}' is out of range for {type_name}"))
        }
        _ => NetconfError::InvalidValue(format!("'{text}' is not a valid {type_name}")),
    })
}

fn integer_value(t: &YangType, n: i128) -> Option<Value> {
    let v = match t {
        YangType::Int8 => Value::Int8(i8::try_from(n).ok()?),
        YangType::Int16 => Value::Int16(i16::try_from(n).ok()?),
        YangType::Int32 => Value::Int32(i32::try_from(n).ok()?),
        YangType::Int64 => Value::Int64(i64::try_from(n).ok()?),
        YangType::Uint8 => Value::Uint8(u8::try_from(n).ok()?),
        YangType::Uint16 => Value::Uint16(u16::try_from(n).ok()?),
        YangType::Uint32 => Value::Uint32(u32::try_from(n).ok()?),
        YangType::Uint64 => Value::Uint64(u64::try_from(n).ok()?),
        _ => return None,
    };
    Some(v)
}

/// Parse a decimal literal into units of 10^-fraction_digits
fn parse_decimal(text: &str, fraction_digits: u8) -> Option<i128> {
    let (negative, body) = match text.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, text.strip_prefix('+').unwrap_or(text)),
    };
    let (int_part, frac_part) = body.split_once('.').unwrap_or((body, ""));
    if int_part.is_empty()
        || !int_part.bytes().all(|b| b.is_ascii_digit())
        || !frac_part.bytes().all(|b| b.is_ascii_digit())
        || frac_part.len() > usize::from(fraction_digits)
        || (body.contains('.') && frac_part.is_empty())
    {
        return None;
    }
    let scale = 10i128.checked_pow(u32::from(fraction_digits))?;
    let int: i128 = int_part.parse().ok()?;
    let mut frac: i128 = if frac_part.is_empty() { 0 } else { frac_part.parse().ok()? };
    for _ in frac_part.len()..usize::from(fraction_digits) {
        frac *= 10;
    }
    let magnitude = int.checked_mul(scale)?.checked_add(frac)?;
    Some(if negative { -magnitude } else { magnitude })
}

fn is_identity_name(text: &str) -> bool {
    let valid = |s: &str| {
        let mut chars = s.chars();
        matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
            && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'))
    };
    match text.split_once(':') {
        Some((prefix, name)) => valid(prefix) && valid(name),
        None => valid(text),
    }
}

/// A parsed leaf value
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    String(String),
    Boolean(bool),
    Int8(i8),
    Int16(i16),
    Int32(i32),
    Int64(i64),
    Uint8(u8),
    Uint16(u16),
    Uint32(u32),
    Uint64(u64),
    /// Fixed-point value `digits * 10^-fraction_digits`
    Decimal64 { digits: i64, fraction_digits: u8 },
    Binary(Vec<u8>),
    Empty,
    Enumeration { name: String, value: i32 },
    /// Set bits in declared position order
    Bits(Vec<String>),
    Identityref(String),
    InstanceIdentifier(String),
}

impl Value {
    /// Canonical lexical representation
    pub fn canonical_string(&self) -> String {
        match self {
            Value::String(s) | Value::Identityref(s) | Value::InstanceIdentifier(s) => s.clone(),
            Value::Boolean(b) => b.to_string(),
            Value::Int8(n) => n.to_string(),
            Value::Int16(n) => n.to_string(),
            Value::Int32(n) => n.to_string(),
            Value::Int64(n) => n.to_string(),
            Value::Uint8(n) => n.to_string(),
            Value::Uint16(n) => n.to_string(),
            Value::Uint32(n) => n.to_string(),
            Value::Uint64(n) => n.to_string(),
            Value::Decimal64 {
                digits,
                fraction_digits,
            } => {
                let scale = 10u128.pow(u32::from(*fraction_digits));
                let magnitude = i128::from(*digits).unsigned_abs();
                let sign = if *digits < 0 { "-" } else { "" };
                let frac = format!(
                    "{:0width$}",
                    magnitude % scale,
                    width = usize::from(*fraction_digits)
                );
                let frac = frac.trim_end_matches('0');
                let frac = if frac.is_empty() { "0" } else { frac };
                format!("{sign}{}.{frac}", magnitude / scale)
            }
            Value::Binary(bytes) => BASE64.encode(bytes),
            Value::Empty => String::new(),
            Value::Enumeration { name, .. } => name.clone(),
            Value::Bits(bits) => bits.join(" "),
        }
    }

    /// The value of an integer kind widened to i128
    pub fn as_integer(&self) -> Option<i128> {
        let n = match self {
            Value::Int8(n) => i128::from(*n),
            Value::Int16(n) => i128::from(*n),
            Value::Int32(n) => i128::from(*n),
            Value::Int64(n) => i128::from(*n),
            Value::Uint8(n) => i128::from(*n),
            Value::Uint16(n) => i128::from(*n),
            Value::Uint32(n) => i128::from(*n),
            Value::Uint64(n) => i128::from(*n),
            _ => return None,
        };
        Some(n)
    }
}

/// A leaf value checked against its type
#[derive(Debug, Clone)]
pub struct TypedValue {
    spec: Arc<TypeSpec>,
    value: Value,
    original: String,
}

impl TypedValue {
    /// Parse `text` against `spec`; fails without constructing anything
    pub fn parse(spec: Arc<TypeSpec>, text: &str) -> Result<Self> {
        let value = spec.parse_value(text)?;
        Ok(Self {
            spec,
            value,
            original: text.to_string(),
        })
    }

    /// A schema-less string value
    pub fn untyped(text: impl Into<String>) -> Self {
        let text = text.into();
        Self {
            spec: TypeSpec::untyped(),
            value: Value::String(text.clone()),
            original: text,
        }
    }

    /// Replace the value in place; on failure the old value is kept
    pub fn set_value(&mut self, text: &str) -> Result<()> {
        let value = self.spec.parse_value(text)?;
        self.value = value;
        self.original = text.to_string();
        Ok(())
    }

    /// Re-run the restriction check of this value's type
    pub fn check(&self) -> Result<()> {
        self.spec.check_value(&self.value)
    }

    /// Re-type this value's original text against another spec
    pub fn retype(&self, spec: Arc<TypeSpec>) -> Result<Self> {
        Self::parse(spec, &self.original)
    }

    pub fn value(&self) -> &Value {
        &self.value
    }

    pub fn spec(&self) -> &Arc<TypeSpec> {
        &self.spec
    }

    /// The string this value was constructed from
    pub fn original(&self) -> &str {
        &self.original
    }

    /// True for values created without a schema
    pub fn is_untyped(&self) -> bool {
        Arc::ptr_eq(&self.spec, &*UNTYPED)
    }

    pub fn to_canonical_string(&self) -> String {
        self.value.canonical_string()
    }

    /// Binary form: raw bytes for `binary`, big-endian two's complement for
    /// integers, and the scaled int64 for `decimal64`
    pub fn to_binary(&self) -> Result<Vec<u8>> {
        let bytes = match &self.value {
            Value::Binary(bytes) => bytes.clone(),
            Value::Decimal64 { digits, .. } => digits.to_be_bytes().to_vec(),
            Value::Int8(n) => n.to_be_bytes().to_vec(),
            Value::Int16(n) => n.to_be_bytes().to_vec(),
            Value::Int32(n) => n.to_be_bytes().to_vec(),
            Value::Int64(n) => n.to_be_bytes().to_vec(),
            Value::Uint8(n) => n.to_be_bytes().to_vec(),
            Value::Uint16(n) => n.to_be_bytes().to_vec(),
            Value::Uint32(n) => n.to_be_bytes().to_vec(),
            Value::Uint64(n) => n.to_be_bytes().to_vec(),
            other => {
                return Err(NetconfError::InvalidValue(format!(
                    "'{}' has no binary representation",
                    other.canonical_string()
                )));
            }
        };
        Ok(bytes)
    }

    pub fn as_str(&self) -> Option<&str> {
        match &self.value {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_u64(&self) -> Option<u64> {
        self.value.as_integer().and_then(|n| u64::try_from(n).ok())
    }

    pub fn as_i64(&self) -> Option<i64> {
        self.value.as_integer().and_then(|n| i64::try_from(n).ok())
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self.value {
            Value::Boolean(b) => Some(b),
            _ => None,
        }
    }
}

impl PartialEq for TypedValue {
    fn eq(&self, other: &Self) -> bool {
        self.value == other.value
    }
}

impl std::fmt::Display for TypedValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.to_canonical_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn spec(t: YangType) -> Arc<TypeSpec> {
        Arc::new(TypeSpec::new(t))
    }

    #[test]
    fn test_yang_type_from_name() {
        assert_eq!(YangType::from_name("string"), Some(YangType::String));
        assert_eq!(YangType::from_name("uint8"), Some(YangType::Uint8));
        assert_eq!(YangType::from_name("yang:counter64"), Some(YangType::Uint64));
        assert_eq!(YangType::from_name("inet:uri"), Some(YangType::String));
        assert_eq!(YangType::from_name("frobnicate"), None);
    }

    #[test]
    fn test_integer_roundtrip_at_bounds() {
        let cases = [
            (YangType::Int8, "-128", "127"),
            (YangType::Int16, "-32768", "32767"),
            (YangType::Int32, "-2147483648", "2147483647"),
            (YangType::Int64, "-9223372036854775808", "9223372036854775807"),
            (YangType::Uint8, "0", "255"),
            (YangType::Uint16, "0", "65535"),
            (YangType::Uint32, "0", "4294967295"),
            (YangType::Uint64, "0", "18446744073709551615"),
        ];
        for (t, lo, hi) in cases {
            let s = spec(t);
            for text in [lo, hi, "+7", "007"] {
                let v = TypedValue::parse(Arc::clone(&s), text).unwrap();
                let again = TypedValue::parse(Arc::clone(&s), &v.to_canonical_string()).unwrap();
                assert_eq!(v, again);
            }
        }
        let v = TypedValue::parse(spec(YangType::Uint16), "+007").unwrap();
        assert_eq!(v.to_canonical_string(), "7");
        assert_eq!(v.original(), "+007");
    }

    #[test]
    fn test_integer_out_of_range() {
        let err = TypedValue::parse(spec(YangType::Uint32), "4294967296").unwrap_err();
        assert!(matches!(err, NetconfError::RestrictionViolation(_)));

        let err = TypedValue::parse(spec(YangType::Uint32), "-1").unwrap_err();
        assert!(matches!(err, NetconfError::RestrictionViolation(_)));

        let err = TypedValue::parse(spec(YangType::Int8), "99999999999999999999999999999999999999999")
            .unwrap_err();
        assert!(matches!(err, NetconfError::RestrictionViolation(_)));

        for bad in ["", "abc", "1.5", "0x10", "1 2"] {
            let err = TypedValue::parse(spec(YangType::Uint32), bad).unwrap_err();
            assert!(matches!(err, NetconfError::InvalidValue(_)), "{bad}");
        }
    }

    #[test]
    fn test_range_restriction() {
        let s = Arc::new(
            TypeSpec::new(YangType::Uint16)
                .with_range("68..1500 | 9000..max")
                .unwrap(),
        );
        assert!(TypedValue::parse(Arc::clone(&s), "1500").is_ok());
        assert!(TypedValue::parse(Arc::clone(&s), "65535").is_ok());
        assert!(matches!(
            TypedValue::parse(Arc::clone(&s), "2000"),
            Err(NetconfError::RestrictionViolation(_))
        ));
        assert!(TypeSpec::new(YangType::Uint8).with_range("0..300").is_err());
        assert!(TypeSpec::new(YangType::String).with_range("1..2").is_err());
    }

    #[test]
    fn test_decimal64() {
        let s = Arc::new(
            TypeSpec::new(YangType::Decimal64 { fraction_digits: 2 })
                .with_range("-10.5..10.5")
                .unwrap(),
        );
        let v = TypedValue::parse(Arc::clone(&s), "01.50").unwrap();
        assert_eq!(v.to_canonical_string(), "1.5");
        assert_eq!(v.to_binary().unwrap(), 150i64.to_be_bytes().to_vec());

        let v = TypedValue::parse(Arc::clone(&s), "-0.05").unwrap();
        assert_eq!(v.to_canonical_string(), "-0.05");
        assert_eq!(TypedValue::parse(Arc::clone(&s), "3").unwrap().to_canonical_string(), "3.0");

        assert!(matches!(
            TypedValue::parse(Arc::clone(&s), "1.234"),
            Err(NetconfError::InvalidValue(_))
        ));
        assert!(matches!(
            TypedValue::parse(Arc::clone(&s), "10.51"),
            Err(NetconfError::RestrictionViolation(_))
        ));
        assert!(TypedValue::parse(s, "1.").is_err());
    }

    #[test]
    fn test_string_length_and_pattern() {
        let s = Arc::new(
            TypeSpec::new(YangType::String)
                .with_length("1..15")
                .unwrap()
                .with_pattern("[a-z][a-z0-9-]*", false)
                .unwrap(),
        );
        assert!(TypedValue::parse(Arc::clone(&s), "vxlan-tunnel2").is_ok());
        assert!(matches!(
            TypedValue::parse(Arc::clone(&s), "Eth0"),
            Err(NetconfError::RestrictionViolation(_))
        ));
        assert!(matches!(
            TypedValue::parse(Arc::clone(&s), "a-very-long-interface-name"),
            Err(NetconfError::RestrictionViolation(_))
        ));

        let inverted = Arc::new(TypeSpec::new(YangType::String).with_pattern("xml.*", true).unwrap());
        assert!(TypedValue::parse(Arc::clone(&inverted), "data").is_ok());
        assert!(TypedValue::parse(inverted, "xmlfoo").is_err());
    }

    #[test]
    fn test_enumeration_membership() {
        let s = Arc::new(TypeSpec::from_descriptor(&json!({"1": "up", "2": "down"})).unwrap());
        let v = TypedValue::parse(Arc::clone(&s), "down").unwrap();
        assert_eq!(
            v.value(),
            &Value::Enumeration {
                name: "down".into(),
                value: 2
            }
        );
        assert!(matches!(
            TypedValue::parse(s, "testing"),
            Err(NetconfError::InvalidValue(_))
        ));
    }

    #[test]
    fn test_union_declaration_order() {
        // "5" is valid for both members; the first declared member wins
        let s = Arc::new(
            TypeSpec::from_descriptor(&json!({
                "base": "union",
                "types": [{"base": "enumeration", "enums": ["unbounded"]}, "uint8", "string"]
            }))
            .unwrap(),
        );
        assert_eq!(
            TypedValue::parse(Arc::clone(&s), "5").unwrap().value(),
            &Value::Uint8(5)
        );
        assert!(matches!(
            TypedValue::parse(Arc::clone(&s), "unbounded").unwrap().value(),
            Value::Enumeration { .. }
        ));
        assert_eq!(
            TypedValue::parse(Arc::clone(&s), "300").unwrap().value(),
            &Value::String("300".into())
        );

        let reversed = Arc::new(TypeSpec::from_descriptor(&json!(["string", "uint8"])).unwrap());
        assert_eq!(
            TypedValue::parse(reversed, "5").unwrap().value(),
            &Value::String("5".into())
        );
    }

    #[test]
    fn test_binary_lossless() {
        let s = spec(YangType::Binary);
        let v = TypedValue::parse(Arc::clone(&s), "3q2+7w==\n").unwrap();
        assert_eq!(hex::encode(v.to_binary().unwrap()), "deadbeef");
        assert_eq!(v.to_canonical_string(), "3q2+7w==");
        assert!(matches!(
            TypedValue::parse(s, "not base64!"),
            Err(NetconfError::InvalidValue(_))
        ));

        let limited = Arc::new(TypeSpec::new(YangType::Binary).with_length("2").unwrap());
        assert!(TypedValue::parse(limited, "3q2+7w==").is_err());
    }

    #[test]
    fn test_bits_canonical_order() {
        let s = Arc::new(
            TypeSpec::from_descriptor(&json!({"base": "bits", "bits": ["a", "b", "c"]})).unwrap(),
        );
        let v = TypedValue::parse(Arc::clone(&s), " c  a ").unwrap();
        assert_eq!(v.to_canonical_string(), "a c");
        assert!(TypedValue::parse(Arc::clone(&s), "a a").is_err());
        assert!(TypedValue::parse(s, "d").is_err());
    }

    #[test]
    fn test_identityref_and_empty() {
        let s = Arc::new(
            TypeSpec::from_descriptor(&json!({"base": "identityref", "identities": ["ethernetCsmacd"]}))
                .unwrap(),
        );
        assert!(TypedValue::parse(Arc::clone(&s), "ianaift:ethernetCsmacd").is_ok());
        assert!(TypedValue::parse(Arc::clone(&s), "ianaift:softwareLoopback").is_err());
        assert!(TypedValue::parse(s, "bad name").is_err());

        assert!(TypedValue::parse(spec(YangType::Empty), "").is_ok());
        assert!(TypedValue::parse(spec(YangType::Empty), "x").is_err());
    }

    #[test]
    fn test_set_value_rechecks_atomically() {
        let s = Arc::new(TypeSpec::new(YangType::Uint8).with_range("1..10").unwrap());
        let mut v = TypedValue::parse(s, "5").unwrap();

        assert!(v.set_value("11").is_err());
        assert_eq!(v.value(), &Value::Uint8(5));
        assert_eq!(v.original(), "5");

        v.set_value("10").unwrap();
        assert_eq!(v.value(), &Value::Uint8(10));
        assert!(v.check().is_ok());
        assert!(v.check().is_ok());
    }

    #[test]
    fn test_check_rejects_foreign_value_kind() {
        let s = TypeSpec::new(YangType::Uint8);
        assert!(s.check_value(&Value::Uint8(1)).is_ok());
        assert!(s.check_value(&Value::Uint16(1)).is_err());
        assert!(s.check_value(&Value::String("1".into())).is_err());
    }

    #[test]
    fn test_descriptor_errors() {
        assert!(TypeSpec::from_descriptor(&json!("bogus")).is_err());
        assert!(TypeSpec::from_descriptor(&json!({"base": "decimal64"})).is_err());
        assert!(TypeSpec::from_descriptor(&json!({"base": "string", "pattern": "("})).is_err());
        assert!(TypeSpec::from_descriptor(&json!({"base": "enumeration", "enums": []})).is_err());
        assert!(TypeSpec::from_descriptor(&json!(42)).is_err());
    }

    #[test]
    fn test_leafref_target_type() {
        let s = Arc::new(
            TypeSpec::from_descriptor(&json!({"base": "leafref", "target-type": "uint32"})).unwrap(),
        );
        assert_eq!(TypedValue::parse(Arc::clone(&s), "12").unwrap().as_u64(), Some(12));
        assert!(TypedValue::parse(s, "x").is_err());
        assert_eq!(
            TypedValue::parse(spec(YangType::Leafref(None)), "eth0").unwrap().as_str(),
            Some("eth0")
        );
    }
}
