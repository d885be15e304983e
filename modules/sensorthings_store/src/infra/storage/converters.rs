//! Converters for the common property kinds

use chrono::{DateTime, Utc};
use sea_orm::{QueryResult, Value};

use crate::contract::{Entity, EntityProperty, PersistenceError, PersistenceResult, PropertyValue, TimeValue};

use super::fields::{ChangeRecord, ColumnValues, DataSize, FieldShape, PropertyConverter};

fn put(row: &mut ColumnValues, column: &str, value: Value) {
    row.insert(column.to_string(), value);
}

fn wrong_kind(property: EntityProperty, expected: &str) -> PersistenceError {
    PersistenceError::invalid(format!("property {property} expects {expected}"))
}

fn read_text(row: &QueryResult, column: &str) -> PersistenceResult<Option<String>> {
    Ok(row.try_get::<Option<String>>("", column)?)
}

pub(crate) fn time_value(time: Option<DateTime<Utc>>) -> Value {
    time.map(Value::from).unwrap_or(Value::ChronoDateTimeUtc(None))
}

fn read_time(row: &QueryResult, column: &str) -> PersistenceResult<Option<DateTime<Utc>>> {
    Ok(row.try_get::<Option<DateTime<Utc>>>("", column)?)
}

/// Shared update path: insert values, then record the change.
fn update_with<C: PropertyConverter + ?Sized>(
    converter: &C,
    property: EntityProperty,
    entity: &Entity,
    row: &mut ColumnValues,
    changes: &mut ChangeRecord,
) -> PersistenceResult<()> {
    if entity.is_set(property) {
        converter.to_insert(entity, row)?;
        changes.record(property);
    }
    Ok(())
}

/// Plain text column
pub struct TextConverter {
    property: EntityProperty,
    column: &'static str,
    unbounded: bool,
}

impl TextConverter {
    pub fn new(property: EntityProperty, column: &'static str) -> Self {
        Self {
            property,
            column,
            unbounded: false,
        }
    }

    /// Text whose size counts against the per-request data limit
    pub fn unbounded(property: EntityProperty, column: &'static str) -> Self {
        Self {
            property,
            column,
            unbounded: true,
        }
    }
}

impl PropertyConverter for TextConverter {
    fn read(&self, row: &QueryResult, entity: &mut Entity, size: &mut DataSize) -> PersistenceResult<()> {
        match read_text(row, self.column)? {
            Some(text) => {
                if self.unbounded {
                    size.add(text.len());
                }
                entity.set(self.property, text);
            }
            None => entity.set(self.property, PropertyValue::Null),
        }
        Ok(())
    }

    fn to_insert(&self, entity: &Entity, row: &mut ColumnValues) -> PersistenceResult<()> {
        let value = match entity.get(self.property) {
            None => return Ok(()),
            Some(PropertyValue::Null) => Value::String(None),
            Some(PropertyValue::Text(text)) => Value::from(text.clone()),
            Some(PropertyValue::Json(serde_json::Value::String(text))) => Value::from(text.clone()),
            Some(_) => return Err(wrong_kind(self.property, "text")),
        };
        put(row, self.column, value);
        Ok(())
    }

    fn to_update(&self, entity: &Entity, row: &mut ColumnValues, changes: &mut ChangeRecord) -> PersistenceResult<()> {
        update_with(self, self.property, entity, row, changes)
    }
}

/// JSON document stored as text
pub struct JsonConverter {
    property: EntityProperty,
    column: &'static str,
}

impl JsonConverter {
    pub fn new(property: EntityProperty, column: &'static str) -> Self {
        Self { property, column }
    }
}

fn json_bind(property: EntityProperty, value: Option<&PropertyValue>) -> PersistenceResult<Option<Value>> {
    let json = match value {
        None => return Ok(None),
        Some(PropertyValue::Null) => return Ok(Some(Value::String(None))),
        Some(PropertyValue::Json(json)) => json.clone(),
        Some(PropertyValue::Text(text)) => serde_json::Value::String(text.clone()),
        Some(_) => return Err(wrong_kind(property, "a JSON value")),
    };
    let text = serde_json::to_string(&json)
        .map_err(|e| PersistenceError::invalid(format!("property {property} is not serialisable: {e}")))?;
    Ok(Some(Value::from(text)))
}

fn json_read(
    property: EntityProperty,
    column: &str,
    row: &QueryResult,
    entity: &mut Entity,
    size: &mut DataSize,
) -> PersistenceResult<()> {
    match read_text(row, column)? {
        Some(text) => {
            size.add(text.len());
            let json: serde_json::Value = serde_json::from_str(&text).map_err(|e| {
                PersistenceError::internal(format!("column {column} holds invalid JSON: {e}"))
            })?;
            entity.set(property, json);
        }
        None => entity.set(property, PropertyValue::Null),
    }
    Ok(())
}

impl PropertyConverter for JsonConverter {
    fn read(&self, row: &QueryResult, entity: &mut Entity, size: &mut DataSize) -> PersistenceResult<()> {
        json_read(self.property, self.column, row, entity, size)
    }

    fn to_insert(&self, entity: &Entity, row: &mut ColumnValues) -> PersistenceResult<()> {
        if let Some(value) = json_bind(self.property, entity.get(self.property))? {
            put(row, self.column, value);
        }
        Ok(())
    }

    fn to_update(&self, entity: &Entity, row: &mut ColumnValues, changes: &mut ChangeRecord) -> PersistenceResult<()> {
        update_with(self, self.property, entity, row, changes)
    }

    fn shape(&self) -> FieldShape {
        FieldShape::Json
    }
}

/// GeoJSON document plus a write-only geometry column
///
/// The geometry column holds the bare geometry of a `Feature`, or the document itself.
pub struct GeoJsonConverter {
    property: EntityProperty,
    column: &'static str,
    geometry_column: &'static str,
}

impl GeoJsonConverter {
    pub fn new(property: EntityProperty, column: &'static str, geometry_column: &'static str) -> Self {
        Self {
            property,
            column,
            geometry_column,
        }
    }
}

fn geometry_of(document: &serde_json::Value) -> Option<&serde_json::Value> {
    match document.get("type").and_then(serde_json::Value::as_str) {
        Some("Feature") => document.get("geometry"),
        Some(_) => Some(document),
        None => None,
    }
}

impl PropertyConverter for GeoJsonConverter {
    fn read(&self, row: &QueryResult, entity: &mut Entity, size: &mut DataSize) -> PersistenceResult<()> {
        json_read(self.property, self.column, row, entity, size)
    }

    fn to_insert(&self, entity: &Entity, row: &mut ColumnValues) -> PersistenceResult<()> {
        let value = entity.get(self.property);
        let Some(bind) = json_bind(self.property, value)? else {
            return Ok(());
        };
        put(row, self.column, bind);
        let geometry = value
            .and_then(PropertyValue::as_json)
            .and_then(geometry_of)
            .map(|g| Value::from(g.to_string()))
            .unwrap_or(Value::String(None));
        put(row, self.geometry_column, geometry);
        Ok(())
    }

    fn to_update(&self, entity: &Entity, row: &mut ColumnValues, changes: &mut ChangeRecord) -> PersistenceResult<()> {
        update_with(self, self.property, entity, row, changes)
    }

    fn shape(&self) -> FieldShape {
        FieldShape::Json
    }
}

/// Single timestamp column
pub struct InstantConverter {
    property: EntityProperty,
    column: &'static str,
}

impl InstantConverter {
    pub fn new(property: EntityProperty, column: &'static str) -> Self {
        Self { property, column }
    }
}

impl PropertyConverter for InstantConverter {
    fn read(&self, row: &QueryResult, entity: &mut Entity, _size: &mut DataSize) -> PersistenceResult<()> {
        match read_time(row, self.column)? {
            Some(time) => entity.set(self.property, time),
            None => entity.set(self.property, PropertyValue::Null),
        }
        Ok(())
    }

    fn to_insert(&self, entity: &Entity, row: &mut ColumnValues) -> PersistenceResult<()> {
        let value = match entity.get(self.property) {
            None => return Ok(()),
            Some(PropertyValue::Null) => Value::ChronoDateTimeUtc(None),
            Some(PropertyValue::Time(TimeValue::Instant(t))) => Value::from(*t),
            Some(_) => return Err(wrong_kind(self.property, "a time instant")),
        };
        put(row, self.column, value);
        Ok(())
    }

    fn to_update(&self, entity: &Entity, row: &mut ColumnValues, changes: &mut ChangeRecord) -> PersistenceResult<()> {
        update_with(self, self.property, entity, row, changes)
    }
}

/// Start/end column pair; an instant is stored with a NULL end
pub struct IntervalConverter {
    property: EntityProperty,
    start: &'static str,
    end: &'static str,
}

impl IntervalConverter {
    pub fn new(property: EntityProperty, start: &'static str, end: &'static str) -> Self {
        Self { property, start, end }
    }
}

impl PropertyConverter for IntervalConverter {
    fn read(&self, row: &QueryResult, entity: &mut Entity, _size: &mut DataSize) -> PersistenceResult<()> {
        let value = match (read_time(row, self.start)?, read_time(row, self.end)?) {
            (None, _) => PropertyValue::Null,
            (Some(start), None) => TimeValue::Instant(start).into(),
            (Some(start), Some(end)) => TimeValue::interval(start, end).into(),
        };
        entity.set(self.property, value);
        Ok(())
    }

    fn to_insert(&self, entity: &Entity, row: &mut ColumnValues) -> PersistenceResult<()> {
        let (start, end) = match entity.get(self.property) {
            None => return Ok(()),
            Some(PropertyValue::Null) => (None, None),
            Some(PropertyValue::Time(time)) => (Some(time.start()), time.end()),
            Some(_) => return Err(wrong_kind(self.property, "a time instant or interval")),
        };
        if let (Some(start), Some(end)) = (start, end) {
            if end < start {
                return Err(PersistenceError::invalid(format!(
                    "interval of {} ends before it starts",
                    self.property
                )));
            }
        }
        put(row, self.start, time_value(start));
        put(row, self.end, time_value(end));
        Ok(())
    }

    fn to_update(&self, entity: &Entity, row: &mut ColumnValues, changes: &mut ChangeRecord) -> PersistenceResult<()> {
        update_with(self, self.property, entity, row, changes)
    }

    fn shape(&self) -> FieldShape {
        FieldShape::Interval
    }
}

/// Unit of measurement spread over name/symbol/definition columns
pub struct UnitOfMeasurementConverter {
    property: EntityProperty,
    columns: [(&'static str, &'static str); 3],
}

impl UnitOfMeasurementConverter {
    pub fn new(property: EntityProperty, name: &'static str, symbol: &'static str, definition: &'static str) -> Self {
        Self {
            property,
            columns: [("name", name), ("symbol", symbol), ("definition", definition)],
        }
    }
}

impl PropertyConverter for UnitOfMeasurementConverter {
    fn read(&self, row: &QueryResult, entity: &mut Entity, _size: &mut DataSize) -> PersistenceResult<()> {
        let mut unit = serde_json::Map::new();
        for (key, column) in self.columns {
            if let Some(text) = read_text(row, column)? {
                unit.insert(key.to_string(), serde_json::Value::String(text));
            }
        }
        if unit.is_empty() {
            entity.set(self.property, PropertyValue::Null);
        } else {
            entity.set(self.property, serde_json::Value::Object(unit));
        }
        Ok(())
    }

    fn to_insert(&self, entity: &Entity, row: &mut ColumnValues) -> PersistenceResult<()> {
        let unit = match entity.get(self.property) {
            None => return Ok(()),
            Some(PropertyValue::Null) => None,
            Some(PropertyValue::Json(serde_json::Value::Object(unit))) => Some(unit),
            Some(_) => return Err(wrong_kind(self.property, "an object")),
        };
        for (key, column) in self.columns {
            let value = unit
                .and_then(|u| u.get(key))
                .and_then(serde_json::Value::as_str)
                .map(|s| Value::from(s.to_string()))
                .unwrap_or(Value::String(None));
            put(row, column, value);
        }
        Ok(())
    }

    fn to_update(&self, entity: &Entity, row: &mut ColumnValues, changes: &mut ChangeRecord) -> PersistenceResult<()> {
        update_with(self, self.property, entity, row, changes)
    }

    fn shape(&self) -> FieldShape {
        FieldShape::Composite
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contract::EntityType;
    use chrono::TimeZone;
    use serde_json::json;

    #[test]
    fn instants_leave_the_end_column_null() {
        let t = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let obs = Entity::new(EntityType::Observation).with(EntityProperty::PhenomenonTime, t);
        let mut row = ColumnValues::new();
        IntervalConverter::new(EntityProperty::PhenomenonTime, "S", "E")
            .to_insert(&obs, &mut row)
            .unwrap();
        assert_eq!(row.get("S"), Some(&Value::from(t)));
        assert_eq!(row.get("E"), Some(&Value::ChronoDateTimeUtc(None)));
    }

    #[test]
    fn reversed_interval_is_rejected() {
        let start = Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let ds = Entity::new(EntityType::Datastream)
            .with(EntityProperty::PhenomenonTime, TimeValue::interval(start, end));
        let err = IntervalConverter::new(EntityProperty::PhenomenonTime, "S", "E")
            .to_insert(&ds, &mut ColumnValues::new())
            .unwrap_err();
        assert!(matches!(err, PersistenceError::InvalidArgument(_)));
    }

    #[test]
    fn geometry_is_taken_from_features() {
        let feature = json!({"type": "Feature", "geometry": {"type": "Point", "coordinates": [1, 2]}});
        let loc = Entity::new(EntityType::Location).with(EntityProperty::Location, feature);
        let mut row = ColumnValues::new();
        GeoJsonConverter::new(EntityProperty::Location, "LOCATION", "GEOM")
            .to_insert(&loc, &mut row)
            .unwrap();
        let geom = row.get("GEOM").cloned();
        assert_eq!(geom, Some(Value::from(json!({"type": "Point", "coordinates": [1, 2]}).to_string())));
    }

    #[test]
    fn unset_properties_write_nothing() {
        let thing = Entity::new(EntityType::Thing);
        let mut row = ColumnValues::new();
        let mut changes = ChangeRecord::default();
        TextConverter::new(EntityProperty::Name, "NAME")
            .to_update(&thing, &mut row, &mut changes)
            .unwrap();
        assert!(row.is_empty());
        assert!(changes.is_empty());
    }

    #[test]
    fn unit_of_measurement_splits_into_columns() {
        let ds = Entity::new(EntityType::Datastream).with(
            EntityProperty::UnitOfMeasurement,
            json!({"name": "degree Celsius", "symbol": "°C"}),
        );
        let mut row = ColumnValues::new();
        UnitOfMeasurementConverter::new(EntityProperty::UnitOfMeasurement, "N", "S", "D")
            .to_insert(&ds, &mut row)
            .unwrap();
        assert_eq!(row.get("N"), Some(&Value::from("degree Celsius".to_string())));
        assert_eq!(row.get("D"), Some(&Value::String(None)));
    }
}
