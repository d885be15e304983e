//! Storage of observation results
//!
//! A result is stored across five columns with a discriminator:
//!
//! | RESULT_TYPE | kind       | columns written                                |
//! |-------------|------------|------------------------------------------------|
//! | 0           | number     | RESULT_NUMBER, RESULT_STRING (exact text)      |
//! | 1           | boolean    | RESULT_BOOLEAN                                 |
//! | 2           | string     | RESULT_STRING                                  |
//! | 3           | structured | RESULT_JSON (objects, arrays and null)         |
//!
//! RESULT_NUMBER serves numeric filters and ordering. The decimal text next to it is
//! what reads return, so exact decimals survive the binary column.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use sea_orm::{QueryResult, Value};
use std::str::FromStr;

use crate::contract::{Entity, EntityProperty, PersistenceError, PersistenceResult, PropertyValue, ResultValue};

use super::fields::{ChangeRecord, ColumnValues, DataSize, FieldShape, PropertyConverter};

pub const RESULT_TYPE: &str = "RESULT_TYPE";
pub const RESULT_NUMBER: &str = "RESULT_NUMBER";
pub const RESULT_STRING: &str = "RESULT_STRING";
pub const RESULT_BOOLEAN: &str = "RESULT_BOOLEAN";
pub const RESULT_JSON: &str = "RESULT_JSON";

/// Discriminator stored in RESULT_TYPE
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ResultKind {
    Number = 0,
    Boolean = 1,
    String = 2,
    Structured = 3,
}

impl ResultKind {
    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            0 => Some(Self::Number),
            1 => Some(Self::Boolean),
            2 => Some(Self::String),
            3 => Some(Self::Structured),
            _ => None,
        }
    }

    pub fn code(self) -> i32 {
        self as i32
    }
}

/// Column values of one encoded result
#[derive(Debug, Clone, PartialEq)]
pub struct EncodedResult {
    pub kind: ResultKind,
    pub number: Option<f64>,
    pub string: Option<String>,
    pub boolean: Option<bool>,
    pub json: Option<String>,
}

impl EncodedResult {
    fn empty(kind: ResultKind) -> Self {
        Self {
            kind,
            number: None,
            string: None,
            boolean: None,
            json: None,
        }
    }

    fn write(self, row: &mut ColumnValues) {
        row.insert(RESULT_TYPE.into(), Value::Int(Some(self.kind.code())));
        row.insert(RESULT_NUMBER.into(), Value::Double(self.number));
        row.insert(RESULT_STRING.into(), self.string.map(Value::from).unwrap_or(Value::String(None)));
        row.insert(RESULT_BOOLEAN.into(), Value::Bool(self.boolean));
        row.insert(RESULT_JSON.into(), self.json.map(Value::from).unwrap_or(Value::String(None)));
    }
}

pub fn encode(result: &ResultValue) -> PersistenceResult<EncodedResult> {
    Ok(match result {
        ResultValue::Number(d) => EncodedResult {
            number: d.to_f64(),
            string: Some(d.to_string()),
            ..EncodedResult::empty(ResultKind::Number)
        },
        ResultValue::Float(f) => EncodedResult {
            number: Some(*f),
            ..EncodedResult::empty(ResultKind::Number)
        },
        ResultValue::Boolean(b) => EncodedResult {
            boolean: Some(*b),
            ..EncodedResult::empty(ResultKind::Boolean)
        },
        ResultValue::String(s) => EncodedResult {
            string: Some(s.clone()),
            ..EncodedResult::empty(ResultKind::String)
        },
        ResultValue::Structured(json) => EncodedResult {
            json: Some(
                serde_json::to_string(json)
                    .map_err(|e| PersistenceError::invalid(format!("result is not serialisable: {e}")))?,
            ),
            ..EncodedResult::empty(ResultKind::Structured)
        },
    })
}

pub fn decode(encoded: &EncodedResult) -> PersistenceResult<ResultValue> {
    let missing = |column: &str| {
        PersistenceError::internal(format!("result of kind {:?} has no {column}", encoded.kind))
    };
    Ok(match encoded.kind {
        ResultKind::Number => match encoded.string.as_deref().map(Decimal::from_str) {
            Some(Ok(d)) => ResultValue::Number(d),
            _ => ResultValue::Float(encoded.number.ok_or_else(|| missing(RESULT_NUMBER))?),
        },
        ResultKind::Boolean => ResultValue::Boolean(encoded.boolean.ok_or_else(|| missing(RESULT_BOOLEAN))?),
        ResultKind::String => ResultValue::String(encoded.string.clone().ok_or_else(|| missing(RESULT_STRING))?),
        ResultKind::Structured => {
            let text = encoded.json.as_deref().ok_or_else(|| missing(RESULT_JSON))?;
            let json = serde_json::from_str(text)
                .map_err(|e| PersistenceError::internal(format!("{RESULT_JSON} holds invalid JSON: {e}")))?;
            ResultValue::Structured(json)
        }
    })
}

/// Converter of the Observation `result` property
pub struct ResultConverter;

impl PropertyConverter for ResultConverter {
    fn read(&self, row: &QueryResult, entity: &mut Entity, size: &mut DataSize) -> PersistenceResult<()> {
        let Some(code) = row.try_get::<Option<i32>>("", RESULT_TYPE)? else {
            entity.set(EntityProperty::Result, PropertyValue::Null);
            return Ok(());
        };
        let kind = ResultKind::from_code(code)
            .ok_or_else(|| PersistenceError::internal(format!("unknown {RESULT_TYPE} {code}")))?;
        let encoded = EncodedResult {
            kind,
            number: row.try_get("", RESULT_NUMBER)?,
            string: row.try_get("", RESULT_STRING)?,
            boolean: row.try_get("", RESULT_BOOLEAN)?,
            json: row.try_get("", RESULT_JSON)?,
        };
        size.add(encoded.string.as_ref().map_or(0, String::len) + encoded.json.as_ref().map_or(0, String::len));
        entity.set(EntityProperty::Result, decode(&encoded)?);
        Ok(())
    }

    fn to_insert(&self, entity: &Entity, row: &mut ColumnValues) -> PersistenceResult<()> {
        let result = match entity.get(EntityProperty::Result) {
            None => return Ok(()),
            Some(PropertyValue::Null) => ResultValue::Structured(serde_json::Value::Null),
            Some(PropertyValue::Result(result)) => result.clone(),
            Some(PropertyValue::Json(json)) => ResultValue::from_json(json.clone()),
            Some(PropertyValue::Text(text)) => ResultValue::String(text.clone()),
            Some(PropertyValue::Time(_)) => {
                return Err(PersistenceError::invalid("result can not be a time value"));
            }
        };
        encode(&result)?.write(row);
        Ok(())
    }

    fn to_update(&self, entity: &Entity, row: &mut ColumnValues, changes: &mut ChangeRecord) -> PersistenceResult<()> {
        if entity.is_set(EntityProperty::Result) {
            self.to_insert(entity, row)?;
            changes.record(EntityProperty::Result);
        }
        Ok(())
    }

    fn shape(&self) -> FieldShape {
        FieldShape::Result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn round_trip(value: ResultValue) -> (ResultKind, ResultValue) {
        let encoded = encode(&value).unwrap();
        (encoded.kind, decode(&encoded).unwrap())
    }

    #[test]
    fn every_kind_comes_back_unchanged() {
        for (value, kind) in [
            (ResultValue::from(42), ResultKind::Number),
            (ResultValue::Number(Decimal::new(2150, 2)), ResultKind::Number),
            (ResultValue::from(true), ResultKind::Boolean),
            (ResultValue::from("hello"), ResultKind::String),
            (ResultValue::Structured(json!([1, 2, 3])), ResultKind::Structured),
            (ResultValue::Structured(json!({"a": {"b": 1}})), ResultKind::Structured),
            (ResultValue::Structured(serde_json::Value::Null), ResultKind::Structured),
        ] {
            assert_eq!(round_trip(value.clone()), (kind, value));
        }
    }

    #[test]
    fn exact_decimal_text_shadows_the_number_column() {
        let encoded = encode(&ResultValue::Number(Decimal::new(10, 1))).unwrap();
        assert_eq!(encoded.number, Some(1.0));
        assert_eq!(encoded.string.as_deref(), Some("1.0"));
    }

    #[test]
    fn floats_without_text_decode_as_floats() {
        let (_, value) = round_trip(ResultValue::Float(1.0e300));
        assert_eq!(value, ResultValue::Float(1.0e300));
    }

    #[test]
    fn unknown_discriminator_is_an_internal_error() {
        assert!(ResultKind::from_code(7).is_none());
        let broken = EncodedResult::empty(ResultKind::Boolean);
        assert!(matches!(decode(&broken), Err(PersistenceError::InternalConsistency(_))));
    }
}
