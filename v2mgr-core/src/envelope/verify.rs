//! Structural verification of plain JSON values against a message descriptor.
//!
//! Mirrors what a protobuf runtime's `verify` reports: wrong kinds, out of range integers,
//! unknown enum values, and oneofs with more than one member set. Unknown keys are reported
//! too, since construction silently drops them.
use prost_reflect::{EnumDescriptor, FieldDescriptor, Kind, MessageDescriptor};
use serde_json::Value;
use std::collections::HashSet;

/// Well-known types have their own JSON mappings (`Any`, `Timestamp`, wrappers...).
const WELL_KNOWN_PACKAGE: &str = "google.protobuf.";

/// Returns the first problem found, prefixed with the dotted path of the offending field.
pub(super) fn verify(descriptor: &MessageDescriptor, value: &Value) -> Result<(), String> {
    verify_message(descriptor, value, "")
}

fn verify_message(descriptor: &MessageDescriptor, value: &Value, path: &str) -> Result<(), String> {
    if descriptor.full_name().starts_with(WELL_KNOWN_PACKAGE) {
        return Ok(());
    }

    let object = value
        .as_object()
        .ok_or_else(|| problem(path, "object expected"))?;

    let mut oneofs = HashSet::new();

    for (key, item) in object {
        let field = descriptor
            .get_field_by_name(key)
            .or_else(|| descriptor.get_field_by_json_name(key))
            .ok_or_else(|| problem(&join(path, key), "unknown field"))?;

        if item.is_null() {
            continue;
        }

        if let Some(oneof) = field.containing_oneof()
            && !oneof.is_synthetic()
            && !oneofs.insert(oneof.name().to_string())
        {
            return Err(problem(&join(path, oneof.name()), "multiple values"));
        }

        verify_field(&field, item, &join(path, field.name()))?;
    }

    Ok(())
}

fn verify_field(field: &FieldDescriptor, value: &Value, path: &str) -> Result<(), String> {
    if field.is_map() {
        let entries = value
            .as_object()
            .ok_or_else(|| problem(path, "object expected"))?;
        let Kind::Message(entry) = field.kind() else {
            return Ok(());
        };
        let value_kind = entry.map_entry_value_field().kind();
        for (key, item) in entries {
            verify_singular(&value_kind, item, &join(path, key))?;
        }
        return Ok(());
    }

    if field.is_list() {
        let items = value
            .as_array()
            .ok_or_else(|| problem(path, "array expected"))?;
        let kind = field.kind();
        for (index, item) in items.iter().enumerate() {
            verify_singular(&kind, item, &format!("{path}[{index}]"))?;
        }
        return Ok(());
    }

    verify_singular(&field.kind(), value, path)
}

fn verify_singular(kind: &Kind, value: &Value, path: &str) -> Result<(), String> {
    let valid = match kind {
        Kind::Int32 | Kind::Sint32 | Kind::Sfixed32 => {
            integer::<i64>(value).is_some_and(|v| i32::try_from(v).is_ok())
        }
        Kind::Uint32 | Kind::Fixed32 => {
            integer::<u64>(value).is_some_and(|v| u32::try_from(v).is_ok())
        }
        Kind::Int64 | Kind::Sint64 | Kind::Sfixed64 => integer::<i64>(value).is_some(),
        Kind::Uint64 | Kind::Fixed64 => integer::<u64>(value).is_some(),
        Kind::Float | Kind::Double => {
            value.is_number()
                || matches!(value.as_str(), Some("NaN" | "Infinity" | "-Infinity"))
        }
        Kind::Bool => value.is_boolean(),
        Kind::String => value.is_string(),
        Kind::Bytes => value.is_string(),
        Kind::Enum(descriptor) => is_enum_value(descriptor, value),
        Kind::Message(descriptor) => return verify_message(descriptor, value, path),
    };

    if valid {
        Ok(())
    } else {
        Err(problem(path, expectation(kind)))
    }
}

/// Integers may be given as JSON numbers or as decimal strings.
fn integer<T>(value: &Value) -> Option<T>
where
    T: TryFrom<i64> + TryFrom<u64> + std::str::FromStr,
{
    match value {
        Value::Number(n) => n
            .as_i64()
            .and_then(|v| T::try_from(v).ok())
            .or_else(|| n.as_u64().and_then(|v| T::try_from(v).ok())),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

fn is_enum_value(descriptor: &EnumDescriptor, value: &Value) -> bool {
    match value {
        Value::String(name) => descriptor.get_value_by_name(name).is_some(),
        Value::Number(n) => n
            .as_i64()
            .and_then(|v| i32::try_from(v).ok())
            .is_some_and(|v| descriptor.get_value(v).is_some()),
        _ => false,
    }
}

fn expectation(kind: &Kind) -> &'static str {
    match kind {
        Kind::Int32 | Kind::Sint32 | Kind::Sfixed32 | Kind::Uint32 | Kind::Fixed32 => {
            "integer expected"
        }
        Kind::Int64 | Kind::Sint64 | Kind::Sfixed64 | Kind::Uint64 | Kind::Fixed64 => {
            "integer|Long expected"
        }
        Kind::Float | Kind::Double => "number expected",
        Kind::Bool => "boolean expected",
        Kind::String => "string expected",
        Kind::Bytes => "buffer expected",
        Kind::Enum(_) => "enum value expected",
        Kind::Message(_) => "object expected",
    }
}

fn join(path: &str, segment: &str) -> String {
    if path.is_empty() {
        segment.to_string()
    } else {
        format!("{path}.{segment}")
    }
}

fn problem(path: &str, message: &str) -> String {
    if path.is_empty() {
        message.to_string()
    } else {
        format!("{path}: {message}")
    }
}
