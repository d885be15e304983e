//! Table definitions: property fields and relations of every table

use crate::contract::{EntityProperty as P, EntityType as T, NavProperty as N};

use super::converters::{
    GeoJsonConverter, InstantConverter, IntervalConverter, JsonConverter, TextConverter,
    UnitOfMeasurementConverter,
};
use super::fields::{NamedField, PropertyFieldRegistry};
use super::registry::TableRegistry;
use super::relation::{HistorySide, ManyToMany, OneToMany, RankSide};
use super::result_codec::{self, ResultConverter};
use super::table::TableKind;

/// Column names shared with hooks and migrations
pub mod col {
    pub const ID: &str = "ID";
    pub const NAME: &str = "NAME";
    pub const DESCRIPTION: &str = "DESCRIPTION";
    pub const DEFINITION: &str = "DEFINITION";
    pub const PROPERTIES: &str = "PROPERTIES";
    pub const ENCODING_TYPE: &str = "ENCODING_TYPE";
    pub const METADATA: &str = "METADATA";
    pub const LOCATION: &str = "LOCATION";
    pub const FEATURE: &str = "FEATURE";
    pub const GEOM: &str = "GEOM";
    pub const GEN_FOI_ID: &str = "GEN_FOI_ID";
    pub const TIME: &str = "TIME";
    pub const OBSERVATION_TYPE: &str = "OBSERVATION_TYPE";
    pub const MULTI_OBSERVATION_DATA_TYPES: &str = "MULTI_OBSERVATION_DATA_TYPES";
    pub const UNIT_NAME: &str = "UNIT_NAME";
    pub const UNIT_SYMBOL: &str = "UNIT_SYMBOL";
    pub const UNIT_DEFINITION: &str = "UNIT_DEFINITION";
    pub const UNIT_OF_MEASUREMENTS: &str = "UNIT_OF_MEASUREMENTS";
    pub const OBSERVED_AREA: &str = "OBSERVED_AREA";
    pub const PHENOMENON_TIME_START: &str = "PHENOMENON_TIME_START";
    pub const PHENOMENON_TIME_END: &str = "PHENOMENON_TIME_END";
    pub const RESULT_TIME: &str = "RESULT_TIME";
    pub const RESULT_TIME_START: &str = "RESULT_TIME_START";
    pub const RESULT_TIME_END: &str = "RESULT_TIME_END";
    pub const RESULT_QUALITY: &str = "RESULT_QUALITY";
    pub const VALID_TIME_START: &str = "VALID_TIME_START";
    pub const VALID_TIME_END: &str = "VALID_TIME_END";
    pub const PARAMETERS: &str = "PARAMETERS";
    pub const TASKING_PARAMETERS: &str = "TASKING_PARAMETERS";
    pub const CREATION_TIME: &str = "CREATION_TIME";
    pub const RANK: &str = "RANK";

    pub const THING_ID: &str = "THING_ID";
    pub const LOCATION_ID: &str = "LOCATION_ID";
    pub const HIST_LOCATION_ID: &str = "HIST_LOCATION_ID";
    pub const SENSOR_ID: &str = "SENSOR_ID";
    pub const OBS_PROPERTY_ID: &str = "OBS_PROPERTY_ID";
    pub const DATASTREAM_ID: &str = "DATASTREAM_ID";
    pub const MULTI_DATASTREAM_ID: &str = "MULTI_DATASTREAM_ID";
    pub const FEATURE_ID: &str = "FEATURE_ID";
    pub const ACTUATOR_ID: &str = "ACTUATOR_ID";
    pub const TASKINGCAPABILITY_ID: &str = "TASKINGCAPABILITY_ID";
}

/// Fill every descriptor with its fields and relations.
pub(crate) fn define_all(registry: &mut TableRegistry) {
    for entity_type in T::ALL {
        let table = registry.main_mut(entity_type);
        define_fields(entity_type, table.fields_mut());
        for relation in relations(entity_type) {
            table.add_relation(relation);
        }
    }
}

fn text(fields: &mut PropertyFieldRegistry, property: P, column: &'static str) {
    fields.add_entry(property, TextConverter::new(property, column), vec![NamedField::single(column)]);
}

fn json(fields: &mut PropertyFieldRegistry, property: P, column: &'static str) {
    fields.add_entry(property, JsonConverter::new(property, column), vec![NamedField::single(column)]);
}

fn geojson(fields: &mut PropertyFieldRegistry, property: P, column: &'static str) {
    fields.add_entry(
        property,
        GeoJsonConverter::new(property, column, col::GEOM),
        vec![NamedField::single(column), NamedField::no_select("geometry", col::GEOM)],
    );
}

fn instant(fields: &mut PropertyFieldRegistry, property: P, column: &'static str) {
    fields.add_entry(property, InstantConverter::new(property, column), vec![NamedField::single(column)]);
}

fn interval(fields: &mut PropertyFieldRegistry, property: P, start: &'static str, end: &'static str) {
    fields.add_entry(
        property,
        IntervalConverter::new(property, start, end),
        vec![NamedField::new("start", start), NamedField::new("end", end)],
    );
}

fn named(fields: &mut PropertyFieldRegistry) {
    text(fields, P::Name, col::NAME);
    text(fields, P::Description, col::DESCRIPTION);
}

fn define_fields(entity_type: T, fields: &mut PropertyFieldRegistry) {
    match entity_type {
        T::Thing => {
            named(fields);
            json(fields, P::Properties, col::PROPERTIES);
        }
        T::Location => {
            named(fields);
            text(fields, P::EncodingType, col::ENCODING_TYPE);
            geojson(fields, P::Location, col::LOCATION);
            json(fields, P::Properties, col::PROPERTIES);
        }
        T::HistoricalLocation => {
            instant(fields, P::Time, col::TIME);
        }
        T::Datastream | T::MultiDatastream => {
            named(fields);
            text(fields, P::ObservationType, col::OBSERVATION_TYPE);
            json(fields, P::ObservedArea, col::OBSERVED_AREA);
            interval(fields, P::PhenomenonTime, col::PHENOMENON_TIME_START, col::PHENOMENON_TIME_END);
            interval(fields, P::ResultTime, col::RESULT_TIME_START, col::RESULT_TIME_END);
            json(fields, P::Properties, col::PROPERTIES);
            if entity_type == T::Datastream {
                fields.add_entry(
                    P::UnitOfMeasurement,
                    UnitOfMeasurementConverter::new(
                        P::UnitOfMeasurement,
                        col::UNIT_NAME,
                        col::UNIT_SYMBOL,
                        col::UNIT_DEFINITION,
                    ),
                    vec![
                        NamedField::new("name", col::UNIT_NAME),
                        NamedField::new("symbol", col::UNIT_SYMBOL),
                        NamedField::new("definition", col::UNIT_DEFINITION),
                    ],
                );
            } else {
                json(fields, P::MultiObservationDataTypes, col::MULTI_OBSERVATION_DATA_TYPES);
                json(fields, P::UnitOfMeasurements, col::UNIT_OF_MEASUREMENTS);
            }
        }
        T::Observation => {
            interval(fields, P::PhenomenonTime, col::PHENOMENON_TIME_START, col::PHENOMENON_TIME_END);
            instant(fields, P::ResultTime, col::RESULT_TIME);
            interval(fields, P::ValidTime, col::VALID_TIME_START, col::VALID_TIME_END);
            json(fields, P::ResultQuality, col::RESULT_QUALITY);
            json(fields, P::Parameters, col::PARAMETERS);
            fields.add_entry(
                P::Result,
                ResultConverter,
                vec![
                    NamedField::new("number", result_codec::RESULT_NUMBER),
                    NamedField::new("string", result_codec::RESULT_STRING),
                    NamedField::new("boolean", result_codec::RESULT_BOOLEAN),
                    NamedField::new("json", result_codec::RESULT_JSON),
                    NamedField::new("type", result_codec::RESULT_TYPE),
                ],
            );
        }
        T::ObservedProperty => {
            named(fields);
            text(fields, P::Definition, col::DEFINITION);
            json(fields, P::Properties, col::PROPERTIES);
        }
        T::Sensor | T::Actuator => {
            named(fields);
            text(fields, P::EncodingType, col::ENCODING_TYPE);
            fields.add_entry(
                P::Metadata,
                TextConverter::unbounded(P::Metadata, col::METADATA),
                vec![NamedField::single(col::METADATA)],
            );
            json(fields, P::Properties, col::PROPERTIES);
        }
        T::FeatureOfInterest => {
            named(fields);
            text(fields, P::EncodingType, col::ENCODING_TYPE);
            geojson(fields, P::Feature, col::FEATURE);
            json(fields, P::Properties, col::PROPERTIES);
        }
        T::TaskingCapability => {
            named(fields);
            json(fields, P::TaskingParameters, col::TASKING_PARAMETERS);
            json(fields, P::Properties, col::PROPERTIES);
        }
        T::Task => {
            instant(fields, P::CreationTime, col::CREATION_TIME);
            json(fields, P::TaskingParameters, col::TASKING_PARAMETERS);
        }
    }
}

fn relations(entity_type: T) -> Vec<super::relation::Relation> {
    let things_locations = |name, source, from, to, target| {
        ManyToMany::new(name, source, TableKind::ThingsLocations, from, to, target)
    };
    let locations_hist = |name, source, from, to, target| {
        ManyToMany::new(name, source, TableKind::LocationsHistLocations, from, to, target)
    };
    match entity_type {
        T::Thing => vec![
            OneToMany::to_many(N::Datastreams, T::Thing, T::Datastream, col::THING_ID).into(),
            OneToMany::to_many(N::MultiDatastreams, T::Thing, T::MultiDatastream, col::THING_ID).into(),
            OneToMany::to_many(N::HistoricalLocations, T::Thing, T::HistoricalLocation, col::THING_ID).into(),
            OneToMany::to_many(N::TaskingCapabilities, T::Thing, T::TaskingCapability, col::THING_ID).into(),
            things_locations(N::Locations, T::Thing, col::THING_ID, col::LOCATION_ID, T::Location)
                .with_history(HistorySide::Thing)
                .into(),
        ],
        T::Location => vec![
            things_locations(N::Things, T::Location, col::LOCATION_ID, col::THING_ID, T::Thing)
                .with_history(HistorySide::Location)
                .into(),
            locations_hist(
                N::HistoricalLocations,
                T::Location,
                col::LOCATION_ID,
                col::HIST_LOCATION_ID,
                T::HistoricalLocation,
            )
            .into(),
        ],
        T::HistoricalLocation => vec![
            OneToMany::to_one(N::Thing, T::HistoricalLocation, col::THING_ID, T::Thing).into(),
            locations_hist(
                N::Locations,
                T::HistoricalLocation,
                col::HIST_LOCATION_ID,
                col::LOCATION_ID,
                T::Location,
            )
            .into(),
        ],
        T::Datastream => vec![
            OneToMany::to_one(N::Thing, T::Datastream, col::THING_ID, T::Thing).into(),
            OneToMany::to_one(N::Sensor, T::Datastream, col::SENSOR_ID, T::Sensor).into(),
            OneToMany::to_one(N::ObservedProperty, T::Datastream, col::OBS_PROPERTY_ID, T::ObservedProperty).into(),
            OneToMany::to_many(N::Observations, T::Datastream, T::Observation, col::DATASTREAM_ID).into(),
        ],
        T::MultiDatastream => vec![
            OneToMany::to_one(N::Thing, T::MultiDatastream, col::THING_ID, T::Thing).into(),
            OneToMany::to_one(N::Sensor, T::MultiDatastream, col::SENSOR_ID, T::Sensor).into(),
            ManyToMany::new(
                N::ObservedProperties,
                T::MultiDatastream,
                TableKind::MultiDatastreamsObsProperties,
                col::MULTI_DATASTREAM_ID,
                col::OBS_PROPERTY_ID,
                T::ObservedProperty,
            )
            .with_rank(col::RANK, RankSide::Source)
            .into(),
            OneToMany::to_many(N::Observations, T::MultiDatastream, T::Observation, col::MULTI_DATASTREAM_ID).into(),
        ],
        T::Observation => vec![
            OneToMany::to_one(N::Datastream, T::Observation, col::DATASTREAM_ID, T::Datastream).into(),
            OneToMany::to_one(N::MultiDatastream, T::Observation, col::MULTI_DATASTREAM_ID, T::MultiDatastream).into(),
            OneToMany::to_one(N::FeatureOfInterest, T::Observation, col::FEATURE_ID, T::FeatureOfInterest).into(),
        ],
        T::ObservedProperty => vec![
            OneToMany::to_many(N::Datastreams, T::ObservedProperty, T::Datastream, col::OBS_PROPERTY_ID).into(),
            ManyToMany::new(
                N::MultiDatastreams,
                T::ObservedProperty,
                TableKind::MultiDatastreamsObsProperties,
                col::OBS_PROPERTY_ID,
                col::MULTI_DATASTREAM_ID,
                T::MultiDatastream,
            )
            .with_rank(col::RANK, RankSide::Target)
            .into(),
        ],
        T::Sensor => vec![
            OneToMany::to_many(N::Datastreams, T::Sensor, T::Datastream, col::SENSOR_ID).into(),
            OneToMany::to_many(N::MultiDatastreams, T::Sensor, T::MultiDatastream, col::SENSOR_ID).into(),
        ],
        T::FeatureOfInterest => vec![
            OneToMany::to_many(N::Observations, T::FeatureOfInterest, T::Observation, col::FEATURE_ID).into(),
        ],
        T::Actuator => vec![
            OneToMany::to_many(N::TaskingCapabilities, T::Actuator, T::TaskingCapability, col::ACTUATOR_ID).into(),
        ],
        T::TaskingCapability => vec![
            OneToMany::to_one(N::Thing, T::TaskingCapability, col::THING_ID, T::Thing).into(),
            OneToMany::to_one(N::Actuator, T::TaskingCapability, col::ACTUATOR_ID, T::Actuator).into(),
            OneToMany::to_many(N::Tasks, T::TaskingCapability, T::Task, col::TASKINGCAPABILITY_ID).into(),
        ],
        T::Task => vec![
            OneToMany::to_one(N::TaskingCapability, T::Task, col::TASKINGCAPABILITY_ID, T::TaskingCapability).into(),
        ],
    }
}
