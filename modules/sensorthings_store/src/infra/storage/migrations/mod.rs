//! Database migrations for the SensorThings schema
//!
//! The identifier column type depends on the configured [`IdType`], so the migrator
//! is parameterised over it. [`install_schema`] runs the migration directly, which is
//! what tests and embedded deployments use.

use std::marker::PhantomData;

use sea_orm::{DatabaseConnection, DbBackend};
use sea_orm_migration::prelude::*;

use crate::contract::EntityType as T;
use crate::contract::IdType;
use crate::infra::storage::result_codec::{
    RESULT_BOOLEAN, RESULT_JSON, RESULT_NUMBER, RESULT_STRING, RESULT_TYPE,
};
use crate::infra::storage::table::TableKind;
use crate::infra::storage::tables::col;

/// Fixes the identifier type of a [`Migrator`]
pub trait IdFlavour: Send + Sync + 'static {
    const ID_TYPE: IdType;
}

pub struct LongIds;
pub struct StringIds;
pub struct UuidIds;

impl IdFlavour for LongIds {
    const ID_TYPE: IdType = IdType::Long;
}

impl IdFlavour for StringIds {
    const ID_TYPE: IdType = IdType::String;
}

impl IdFlavour for UuidIds {
    const ID_TYPE: IdType = IdType::Uuid;
}

pub struct Migrator<I: IdFlavour = LongIds>(PhantomData<I>);

#[async_trait::async_trait]
impl<I: IdFlavour> MigratorTrait for Migrator<I> {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![Box::new(m20250101_000001_create_sensorthings::Migration {
            id_type: I::ID_TYPE,
        })]
    }
}

/// Create all tables on `conn` (idempotent).
pub async fn install_schema(conn: &DatabaseConnection, id_type: IdType) -> Result<(), DbErr> {
    let manager = SchemaManager::new(conn);
    m20250101_000001_create_sensorthings::Migration { id_type }
        .up(&manager)
        .await
}

mod m20250101_000001_create_sensorthings {
    use super::*;

    #[derive(DeriveMigrationName)]
    pub struct Migration {
        pub id_type: IdType,
    }

    /// Column content kinds
    #[derive(Clone, Copy)]
    enum Kind {
        Text,
        Time,
        Double,
        Boolean,
        Integer,
        /// Foreign key, nullable
        Ref(T),
        /// Foreign key, mandatory
        RefRequired(T),
        /// Link table key, part of the primary key
        LinkKey(T),
    }

    fn t(kind: TableKind) -> Alias {
        Alias::new(kind.name())
    }

    impl Migration {
        fn id_def(&self, backend: DbBackend, column: &str) -> ColumnDef {
            let mut def = ColumnDef::new(Alias::new(column));
            match self.id_type {
                IdType::Long if backend == DbBackend::Sqlite => def.integer().auto_increment(),
                IdType::Long => def.big_integer().auto_increment(),
                IdType::String => def.string_len(255),
                IdType::Uuid => def.uuid(),
            };
            def.not_null().primary_key();
            def
        }

        fn key_def(&self, column: &str) -> ColumnDef {
            let mut def = ColumnDef::new(Alias::new(column));
            match self.id_type {
                IdType::Long => def.big_integer(),
                IdType::String => def.string_len(255),
                IdType::Uuid => def.uuid(),
            };
            def
        }

        async fn create(
            &self,
            manager: &SchemaManager<'_>,
            kind: TableKind,
            columns: &[(&str, Kind)],
        ) -> Result<(), DbErr> {
            let backend = manager.get_database_backend();
            let mut table = Table::create();
            table.table(t(kind)).if_not_exists();
            let mut link_keys = Vec::new();
            if kind.entity_type().is_some() {
                table.col(&mut self.id_def(backend, col::ID));
            }
            for (name, column_kind) in columns {
                let mut def = match column_kind {
                    Kind::Ref(_) | Kind::RefRequired(_) | Kind::LinkKey(_) => self.key_def(name),
                    _ => ColumnDef::new(Alias::new(*name)),
                };
                match column_kind {
                    Kind::Text => def.text(),
                    Kind::Time => def.timestamp_with_time_zone(),
                    Kind::Double => def.double(),
                    Kind::Boolean => def.boolean(),
                    Kind::Integer => def.integer(),
                    Kind::Ref(_) => &mut def,
                    Kind::RefRequired(_) | Kind::LinkKey(_) => def.not_null(),
                };
                table.col(&mut def);

                let (target, on_delete) = match column_kind {
                    Kind::Ref(target) if *name == col::GEN_FOI_ID => (*target, ForeignKeyAction::SetNull),
                    Kind::Ref(target) | Kind::RefRequired(target) => (*target, ForeignKeyAction::Cascade),
                    Kind::LinkKey(target) => {
                        link_keys.push(Alias::new(*name));
                        (*target, ForeignKeyAction::Cascade)
                    }
                    _ => continue,
                };
                table.foreign_key(
                    ForeignKey::create()
                        .name(format!("fk_{}_{}", kind.name(), name).to_lowercase())
                        .from(t(kind), Alias::new(*name))
                        .to(t(TableKind::Main(target)), Alias::new(col::ID))
                        .on_delete(on_delete),
                );
            }
            if !link_keys.is_empty() {
                let mut pk = Index::create();
                for key in link_keys {
                    pk.col(key);
                }
                table.primary_key(&mut pk);
            }
            manager.create_table(table.to_owned()).await?;

            for (name, column_kind) in columns {
                if matches!(column_kind, Kind::Ref(_) | Kind::RefRequired(_) | Kind::LinkKey(_)) {
                    manager
                        .create_index(
                            Index::create()
                                .if_not_exists()
                                .name(format!("idx_{}_{}", kind.name(), name).to_lowercase())
                                .table(t(kind))
                                .col(Alias::new(*name))
                                .to_owned(),
                        )
                        .await?;
                }
            }
            Ok(())
        }
    }

    const NAMED: [(&str, Kind); 2] = [(col::NAME, Kind::Text), (col::DESCRIPTION, Kind::Text)];

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            use Kind::*;
            let main = TableKind::Main;

            self.create(manager, main(T::Thing), &[NAMED[0], NAMED[1], (col::PROPERTIES, Text)])
                .await?;
            for sensor_like in [T::Sensor, T::Actuator] {
                self.create(
                    manager,
                    main(sensor_like),
                    &[
                        NAMED[0],
                        NAMED[1],
                        (col::ENCODING_TYPE, Text),
                        (col::METADATA, Text),
                        (col::PROPERTIES, Text),
                    ],
                )
                .await?;
            }
            self.create(
                manager,
                main(T::ObservedProperty),
                &[NAMED[0], (col::DEFINITION, Text), NAMED[1], (col::PROPERTIES, Text)],
            )
            .await?;
            self.create(
                manager,
                main(T::FeatureOfInterest),
                &[
                    NAMED[0],
                    NAMED[1],
                    (col::ENCODING_TYPE, Text),
                    (col::FEATURE, Text),
                    (col::GEOM, Text),
                    (col::PROPERTIES, Text),
                ],
            )
            .await?;
            self.create(
                manager,
                main(T::Location),
                &[
                    NAMED[0],
                    NAMED[1],
                    (col::ENCODING_TYPE, Text),
                    (col::LOCATION, Text),
                    (col::GEOM, Text),
                    (col::GEN_FOI_ID, Ref(T::FeatureOfInterest)),
                    (col::PROPERTIES, Text),
                ],
            )
            .await?;
            self.create(
                manager,
                main(T::HistoricalLocation),
                &[(col::TIME, Time), (col::THING_ID, RefRequired(T::Thing))],
            )
            .await?;
            self.create(
                manager,
                TableKind::ThingsLocations,
                &[(col::THING_ID, LinkKey(T::Thing)), (col::LOCATION_ID, LinkKey(T::Location))],
            )
            .await?;
            self.create(
                manager,
                TableKind::LocationsHistLocations,
                &[
                    (col::LOCATION_ID, LinkKey(T::Location)),
                    (col::HIST_LOCATION_ID, LinkKey(T::HistoricalLocation)),
                ],
            )
            .await?;

            let stream_common = [
                NAMED[0],
                NAMED[1],
                (col::OBSERVATION_TYPE, Text),
                (col::OBSERVED_AREA, Text),
                (col::PHENOMENON_TIME_START, Time),
                (col::PHENOMENON_TIME_END, Time),
                (col::RESULT_TIME_START, Time),
                (col::RESULT_TIME_END, Time),
                (col::PROPERTIES, Text),
                (col::THING_ID, RefRequired(T::Thing)),
                (col::SENSOR_ID, RefRequired(T::Sensor)),
            ];
            let mut datastream = stream_common.to_vec();
            datastream.extend([
                (col::UNIT_NAME, Text),
                (col::UNIT_SYMBOL, Text),
                (col::UNIT_DEFINITION, Text),
                (col::OBS_PROPERTY_ID, RefRequired(T::ObservedProperty)),
            ]);
            self.create(manager, main(T::Datastream), &datastream).await?;

            let mut multi = stream_common.to_vec();
            multi.extend([
                (col::MULTI_OBSERVATION_DATA_TYPES, Text),
                (col::UNIT_OF_MEASUREMENTS, Text),
            ]);
            self.create(manager, main(T::MultiDatastream), &multi).await?;
            self.create(
                manager,
                TableKind::MultiDatastreamsObsProperties,
                &[
                    (col::MULTI_DATASTREAM_ID, LinkKey(T::MultiDatastream)),
                    (col::OBS_PROPERTY_ID, LinkKey(T::ObservedProperty)),
                    (col::RANK, Integer),
                ],
            )
            .await?;

            self.create(
                manager,
                main(T::Observation),
                &[
                    (col::PHENOMENON_TIME_START, Time),
                    (col::PHENOMENON_TIME_END, Time),
                    (col::RESULT_TIME, Time),
                    (RESULT_TYPE, Integer),
                    (RESULT_NUMBER, Double),
                    (RESULT_STRING, Text),
                    (RESULT_BOOLEAN, Boolean),
                    (RESULT_JSON, Text),
                    (col::RESULT_QUALITY, Text),
                    (col::VALID_TIME_START, Time),
                    (col::VALID_TIME_END, Time),
                    (col::PARAMETERS, Text),
                    (col::DATASTREAM_ID, Ref(T::Datastream)),
                    (col::MULTI_DATASTREAM_ID, Ref(T::MultiDatastream)),
                    (col::FEATURE_ID, RefRequired(T::FeatureOfInterest)),
                ],
            )
            .await?;

            self.create(
                manager,
                main(T::TaskingCapability),
                &[
                    NAMED[0],
                    NAMED[1],
                    (col::TASKING_PARAMETERS, Text),
                    (col::PROPERTIES, Text),
                    (col::THING_ID, RefRequired(T::Thing)),
                    (col::ACTUATOR_ID, RefRequired(T::Actuator)),
                ],
            )
            .await?;
            self.create(
                manager,
                main(T::Task),
                &[
                    (col::CREATION_TIME, Time),
                    (col::TASKING_PARAMETERS, Text),
                    (col::TASKINGCAPABILITY_ID, RefRequired(T::TaskingCapability)),
                ],
            )
            .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_observations_phenomenon_time")
                        .table(t(main(T::Observation)))
                        .col(Alias::new(col::PHENOMENON_TIME_START))
                        .to_owned(),
                )
                .await?;
            Ok(())
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            let order = [
                TableKind::Main(T::Task),
                TableKind::Main(T::TaskingCapability),
                TableKind::Main(T::Observation),
                TableKind::MultiDatastreamsObsProperties,
                TableKind::Main(T::MultiDatastream),
                TableKind::Main(T::Datastream),
                TableKind::LocationsHistLocations,
                TableKind::ThingsLocations,
                TableKind::Main(T::HistoricalLocation),
                TableKind::Main(T::Location),
                TableKind::Main(T::FeatureOfInterest),
                TableKind::Main(T::ObservedProperty),
                TableKind::Main(T::Actuator),
                TableKind::Main(T::Sensor),
                TableKind::Main(T::Thing),
            ];
            for kind in order {
                manager
                    .drop_table(Table::drop().table(t(kind)).if_exists().to_owned())
                    .await?;
            }
            Ok(())
        }
    }
}
